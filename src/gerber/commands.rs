//! Typed Gerber commands: one variant per recognized command. Each parses
//! from a framed record and applies its effect to the interpreter state,
//! emitting draws through the current graphics consumer.
//!
//! The dispatch in [`parse_extended`]/[`parse_word`] is ordered most specific
//! first; reordering it changes which rule claims overlapping prefixes.

use std::rc::Rc;

use crate::error::ArtworkError;
use crate::geometry::{Mirroring, Point};

use super::apertures::{Aperture, StandardTemplate};
use super::coord::{CoordinateFormat, Notation, Units, ZeroMode};
use super::macros::ApertureMacro;
use super::primitives::{Block, GraphicsObject, GraphicsPrimitive, Polarity};
use super::state::{
    BlockCollector, GerberState, GraphicsConsumer, InterpolationMode, QuadrantMode,
    RegionCollector, StepRepeat,
};
use super::tokenizer::RawCommand;

const EPS: f64 = 1e-9;

/// Aperture template reference in an %AD command.
#[derive(Debug, Clone, PartialEq)]
pub enum AdTemplate {
    Standard(StandardTemplate),
    Macro(String),
}

/// A parsed Gerber command.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberCommand {
    /// %FS: coordinate format, set once per file.
    FormatSpec(CoordinateFormat),
    /// %MO: unit mode.
    UnitMode(Units),
    /// %AD: aperture definition. Macro references resolve at execution.
    ApertureDefine {
        code: u32,
        template: AdTemplate,
        modifiers: Vec<f64>,
    },
    /// %AM: aperture macro definition.
    MacroDefine(ApertureMacro),
    /// %AB with an aperture id; opens a block aperture scope.
    BlockOpen { code: u32 },
    /// Bare %AB: closes the innermost block aperture scope.
    BlockClose,
    /// %SR with parameters; closes any open scope, then opens a new one
    /// when the repeat counts exceed 1×1.
    StepRepeatOpen {
        x_repeat: u32,
        y_repeat: u32,
        x_delta: f64,
        y_delta: f64,
    },
    /// Bare %SR: closes the open step-and-repeat scope.
    StepRepeatClose,
    /// %LP: polarity for subsequent objects.
    LoadPolarity(Polarity),
    /// %LM: mirroring for subsequent objects.
    LoadMirroring(Mirroring),
    /// %LR: rotation in degrees for subsequent objects.
    LoadRotation(f64),
    /// %LS: scale for subsequent objects.
    LoadScale(f64),
    /// %TF/%TA/%TO: attribute record, no geometric effect.
    Attribute(String),
    /// %TD: attribute delete record.
    AttributeDelete(String),
    /// Dnn with nn ≥ 10: select the current aperture.
    SelectAperture(u32),
    /// D01: interpolate to the target, stroking with the current aperture.
    /// Coordinate strings are decoded against the format at execution time.
    Interpolate {
        x: Option<String>,
        y: Option<String>,
        i: Option<String>,
        j: Option<String>,
    },
    /// D02: move; closes the open contour inside a region.
    Move {
        x: Option<String>,
        y: Option<String>,
    },
    /// D03: flash the current aperture.
    Flash {
        x: Option<String>,
        y: Option<String>,
    },
    /// G01/G02/G03 and the scaled-linear G10/G11/G12.
    SetInterpolation(InterpolationMode),
    /// G36.
    RegionBegin,
    /// G37.
    RegionEnd,
    /// G70/G71 legacy unit selection.
    SetUnitsLegacy(Units),
    /// G74/G75.
    SetQuadrant(QuadrantMode),
    /// G90/G91.
    SetNotation(Notation),
    /// G04 comment.
    Comment(String),
    /// Recognized but deliberately ignored commands.
    Ignored(String),
    /// M02 (or M00).
    EndOfFile,
}

/// A command with the source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedCommand {
    pub command: GerberCommand,
    pub line: u32,
}

/// Parse a framed command stream into typed commands.
pub fn parse_commands(records: &[RawCommand]) -> Result<Vec<SpannedCommand>, ArtworkError> {
    records
        .iter()
        .map(|record| {
            let command = if record.advanced {
                parse_extended(&record.text, record.line)
            } else {
                parse_word(&record.text, record.line)
            }?;
            Ok(SpannedCommand {
                command,
                line: record.line,
            })
        })
        .collect()
}

const IGNORED_EXTENDED: [&str; 11] = [
    "IP", "LN", "IJ", "IO", "IR", "AS", "KO", "MI", "OF", "RO", "SF",
];

/// Parse an extended (%-framed) command. Ordered most specific first.
fn parse_extended(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    if text.starts_with("FS") {
        return parse_format_spec(text, line);
    }
    if let Some(units) = text.strip_prefix("MO") {
        return Ok(match units {
            "MM" => GerberCommand::UnitMode(Units::Millimeters),
            // Anything else, IN included, selects inches; legacy writers
            // were never rejected here.
            _ => GerberCommand::UnitMode(Units::Inches),
        });
    }
    if text.starts_with("AM") {
        return parse_macro_define(text, line);
    }
    if text.starts_with("AD") {
        return parse_aperture_define(text, line);
    }
    if let Some(rest) = text.strip_prefix("AB") {
        return parse_block(rest, line);
    }
    if let Some(rest) = text.strip_prefix("SR") {
        return parse_step_repeat(rest, line);
    }
    if let Some(rest) = text.strip_prefix("LP") {
        return match rest {
            "D" => Ok(GerberCommand::LoadPolarity(Polarity::Dark)),
            "C" => Ok(GerberCommand::LoadPolarity(Polarity::Clear)),
            _ => Err(ArtworkError::parse(line, format!("bad polarity: LP{rest}"))),
        };
    }
    if let Some(rest) = text.strip_prefix("LM") {
        return match rest {
            "N" => Ok(GerberCommand::LoadMirroring(Mirroring::None)),
            "X" => Ok(GerberCommand::LoadMirroring(Mirroring::X)),
            "Y" => Ok(GerberCommand::LoadMirroring(Mirroring::Y)),
            "XY" => Ok(GerberCommand::LoadMirroring(Mirroring::XY)),
            _ => Err(ArtworkError::parse(line, format!("bad mirroring: LM{rest}"))),
        };
    }
    if let Some(rest) = text.strip_prefix("LR") {
        let degrees: f64 = rest
            .parse()
            .map_err(|_| ArtworkError::parse(line, format!("bad rotation: LR{rest}")))?;
        return Ok(GerberCommand::LoadRotation(degrees));
    }
    if let Some(rest) = text.strip_prefix("LS") {
        let scale: f64 = rest
            .parse()
            .map_err(|_| ArtworkError::parse(line, format!("bad scale: LS{rest}")))?;
        return Ok(GerberCommand::LoadScale(scale));
    }
    if let Some(rest) = text.strip_prefix("TD") {
        return Ok(GerberCommand::AttributeDelete(rest.to_string()));
    }
    if text.starts_with("TF") || text.starts_with("TA") || text.starts_with("TO") {
        return Ok(GerberCommand::Attribute(text.to_string()));
    }
    if IGNORED_EXTENDED.iter().any(|p| text.starts_with(p)) {
        return Ok(GerberCommand::Ignored(text.to_string()));
    }
    Err(ArtworkError::parse(
        line,
        format!("unknown extended command: {text}"),
    ))
}

/// Parse %FS. Example: `FSLAX24Y24`.
fn parse_format_spec(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    let mut s = &text[2..];

    let zero_mode = match s.as_bytes().first() {
        Some(b'L') => {
            s = &s[1..];
            ZeroMode::SkipLeading
        }
        Some(b'T') => {
            s = &s[1..];
            ZeroMode::SkipTrailing
        }
        Some(b'D') => {
            s = &s[1..];
            ZeroMode::Direct
        }
        _ => ZeroMode::None,
    };
    let notation = match s.as_bytes().first() {
        Some(b'A') => {
            s = &s[1..];
            Notation::Absolute
        }
        Some(b'I') => {
            s = &s[1..];
            Notation::Incremental
        }
        _ => Notation::Absolute,
    };

    let x_pos = s
        .find('X')
        .ok_or_else(|| ArtworkError::parse(line, "format spec missing X digits"))?;
    let y_pos = s
        .find('Y')
        .ok_or_else(|| ArtworkError::parse(line, "format spec missing Y digits"))?;
    let x_part = &s[x_pos + 1..y_pos];
    let y_part = &s[y_pos + 1..];
    if x_part.len() < 2 || y_part.len() < 2 {
        return Err(ArtworkError::parse(
            line,
            format!("bad format digits: X={x_part} Y={y_part}"),
        ));
    }

    let digit = |part: &str, which: &str| -> Result<u8, ArtworkError> {
        part.parse::<u8>()
            .map_err(|_| ArtworkError::parse(line, format!("bad {which} digits: {part}")))
    };

    Ok(GerberCommand::FormatSpec(CoordinateFormat {
        x_integer: digit(&x_part[..x_part.len() - 1], "X integer")?,
        x_decimal: digit(&x_part[x_part.len() - 1..], "X decimal")?,
        y_integer: digit(&y_part[..y_part.len() - 1], "Y integer")?,
        y_decimal: digit(&y_part[y_part.len() - 1..], "Y decimal")?,
        zero_mode,
        notation,
    }))
}

/// Parse %AM. The record still carries its `*` separators:
/// `AMOC8*5,1,8,0,0,1.08239X$1,22.5`.
fn parse_macro_define(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    let mut parts = text.split('*');
    let header = parts.next().unwrap_or("");
    let name = &header[2..];
    if name.is_empty() {
        return Err(ArtworkError::parse(line, "macro definition without a name"));
    }
    let body: Vec<&str> = parts.collect();
    let definition = ApertureMacro::parse(name, &body)
        .map_err(|e| ArtworkError::parse(line, format!("macro {name}: {e}")))?;
    Ok(GerberCommand::MacroDefine(definition))
}

/// Parse %AD. Example: `ADD10C,0.020` or `ADD22OC8,0.1`.
fn parse_aperture_define(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    let s = &text[2..];
    let s = s
        .strip_prefix('D')
        .ok_or_else(|| ArtworkError::parse(line, format!("aperture definition without D: {s}")))?;

    let type_pos = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| ArtworkError::parse(line, format!("no aperture template in: {s}")))?;
    let code: u32 = s[..type_pos]
        .parse()
        .map_err(|_| ArtworkError::parse(line, format!("bad aperture number: {s}")))?;
    if code < 10 {
        return Err(ArtworkError::parse(
            line,
            format!("aperture number D{code} is reserved (must be 10 or greater)"),
        ));
    }

    let rest = &s[type_pos..];
    let (name, modifier_text) = match rest.find(',') {
        Some(comma) => (&rest[..comma], &rest[comma + 1..]),
        None => (rest, ""),
    };

    let modifiers: Vec<f64> = if modifier_text.is_empty() {
        Vec::new()
    } else {
        modifier_text
            .split('X')
            .map(|m| {
                m.parse::<f64>()
                    .map_err(|_| ArtworkError::parse(line, format!("bad aperture modifier: {m}")))
            })
            .collect::<Result<_, _>>()?
    };

    let template = match name {
        "C" => AdTemplate::Standard(StandardTemplate::Circle),
        "R" => AdTemplate::Standard(StandardTemplate::Rectangle),
        "O" => AdTemplate::Standard(StandardTemplate::Obround),
        "P" => AdTemplate::Standard(StandardTemplate::Polygon),
        other => AdTemplate::Macro(other.to_string()),
    };

    Ok(GerberCommand::ApertureDefine {
        code,
        template,
        modifiers,
    })
}

/// Parse the tail of %AB: empty closes, `D<code>` opens.
fn parse_block(rest: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    if rest.is_empty() {
        return Ok(GerberCommand::BlockClose);
    }
    let code: u32 = rest
        .strip_prefix('D')
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| ArtworkError::parse(line, format!("bad block aperture: AB{rest}")))?;
    if code < 10 {
        return Err(ArtworkError::parse(
            line,
            format!("aperture number D{code} is reserved (must be 10 or greater)"),
        ));
    }
    Ok(GerberCommand::BlockOpen { code })
}

/// Parse the tail of %SR: empty closes, otherwise `X<n>Y<n>I<f>J<f>`.
fn parse_step_repeat(rest: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    if rest.is_empty() {
        return Ok(GerberCommand::StepRepeatClose);
    }
    let field = |key: char| -> Option<&str> {
        let pos = rest.find(key)?;
        let after = &rest[pos + 1..];
        let end = after
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(after.len());
        Some(&after[..end])
    };
    let uint = |key: char, default: u32| -> Result<u32, ArtworkError> {
        match field(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                ArtworkError::parse(line, format!("bad step-repeat field {key}: {v}"))
            }),
        }
    };
    let float = |key: char| -> Result<f64, ArtworkError> {
        match field(key) {
            None => Ok(0.0),
            Some(v) => v.parse().map_err(|_| {
                ArtworkError::parse(line, format!("bad step-repeat field {key}: {v}"))
            }),
        }
    };
    Ok(GerberCommand::StepRepeatOpen {
        x_repeat: uint('X', 1)?,
        y_repeat: uint('Y', 1)?,
        x_delta: float('I')?,
        y_delta: float('J')?,
    })
}

/// Parse a word (`*`-terminated) command. The tokenizer has already split
/// compound words and canonicalized axis order.
fn parse_word(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    if text.starts_with("G04") || (text.starts_with("G4") && !starts_with_digit(&text[2..])) {
        let comment = text
            .trim_start_matches("G04")
            .trim_start_matches("G4")
            .trim()
            .to_string();
        return Ok(GerberCommand::Comment(comment));
    }

    if let Some(rest) = text.strip_prefix('M') {
        return match rest {
            "02" | "2" | "00" | "0" => Ok(GerberCommand::EndOfFile),
            "01" | "1" => Ok(GerberCommand::Ignored(text.to_string())),
            _ => Err(ArtworkError::parse(line, format!("unknown M code: {text}"))),
        };
    }

    if let Some(rest) = text.strip_prefix('G') {
        let code: u32 = rest
            .parse()
            .map_err(|_| ArtworkError::parse(line, format!("bad G code: {text}")))?;
        return match code {
            1 => Ok(GerberCommand::SetInterpolation(InterpolationMode::Linear)),
            2 => Ok(GerberCommand::SetInterpolation(InterpolationMode::Clockwise)),
            3 => Ok(GerberCommand::SetInterpolation(
                InterpolationMode::CounterClockwise,
            )),
            10 | 11 | 12 => Ok(GerberCommand::SetInterpolation(
                InterpolationMode::LinearScaled,
            )),
            36 => Ok(GerberCommand::RegionBegin),
            37 => Ok(GerberCommand::RegionEnd),
            54 => Ok(GerberCommand::Ignored(text.to_string())),
            70 => Ok(GerberCommand::SetUnitsLegacy(Units::Inches)),
            71 => Ok(GerberCommand::SetUnitsLegacy(Units::Millimeters)),
            74 => Ok(GerberCommand::SetQuadrant(QuadrantMode::Single)),
            75 => Ok(GerberCommand::SetQuadrant(QuadrantMode::Multi)),
            90 => Ok(GerberCommand::SetNotation(Notation::Absolute)),
            91 => Ok(GerberCommand::SetNotation(Notation::Incremental)),
            _ => Err(ArtworkError::parse(line, format!("unknown G code: {text}"))),
        };
    }

    parse_operation_word(text, line)
}

fn starts_with_digit(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
}

/// Parse a canonicalized coordinate/operation word: `X..Y..I..J..D..`.
fn parse_operation_word(text: &str, line: u32) -> Result<GerberCommand, ArtworkError> {
    let mut x = None;
    let mut y = None;
    let mut i = None;
    let mut j = None;
    let mut d: Option<u32> = None;

    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let key = bytes[pos].to_ascii_uppercase();
        pos += 1;
        let start = pos;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
            pos += 1;
        }
        let value = &text[start..pos];
        if value.is_empty() {
            return Err(ArtworkError::parse(
                line,
                format!("empty coordinate value in: {text}"),
            ));
        }
        match key {
            b'X' => x = Some(value.to_string()),
            b'Y' => y = Some(value.to_string()),
            b'I' => i = Some(value.to_string()),
            b'J' => j = Some(value.to_string()),
            b'D' => {
                d = Some(value.parse().map_err(|_| {
                    ArtworkError::parse(line, format!("bad operation code in: {text}"))
                })?)
            }
            other => {
                return Err(ArtworkError::parse(
                    line,
                    format!("unknown command letter '{}' in: {text}", other as char),
                ))
            }
        }
    }

    match d {
        Some(1) => Ok(GerberCommand::Interpolate { x, y, i, j }),
        Some(2) => Ok(GerberCommand::Move { x, y }),
        Some(3) => Ok(GerberCommand::Flash { x, y }),
        Some(code) if code >= 10 => Ok(GerberCommand::SelectAperture(code)),
        Some(code) => Err(ArtworkError::parse(
            line,
            format!("aperture number D{code} is reserved (must be 10 or greater)"),
        )),
        // Bare coordinates continue the previous interpolation per the
        // legacy modal convention.
        None if x.is_some() || y.is_some() => Ok(GerberCommand::Interpolate { x, y, i, j }),
        None => Err(ArtworkError::parse(line, format!("unknown command: {text}"))),
    }
}

impl GerberCommand {
    /// Apply this command's effect to the interpreter state.
    pub fn execute(&self, state: &mut GerberState, line: u32) -> Result<(), ArtworkError> {
        match self {
            GerberCommand::FormatSpec(format) => {
                state.set_format(format.clone());
                Ok(())
            }
            GerberCommand::UnitMode(units) => {
                state.set_units(*units);
                Ok(())
            }
            GerberCommand::SetUnitsLegacy(units) => {
                state.set_units(*units);
                Ok(())
            }
            GerberCommand::MacroDefine(definition) => {
                if state.macros.contains_key(&definition.name) {
                    state.warn(format!("macro {} redefined", definition.name));
                }
                state
                    .macros
                    .insert(definition.name.clone(), Rc::new(definition.clone()));
                Ok(())
            }
            GerberCommand::ApertureDefine {
                code,
                template,
                modifiers,
            } => execute_aperture_define(state, *code, template, modifiers, line),
            GerberCommand::SelectAperture(code) => {
                state.set_aperture(*code);
                Ok(())
            }
            GerberCommand::SetInterpolation(mode) => {
                state.set_interpolation(*mode);
                Ok(())
            }
            GerberCommand::SetQuadrant(mode) => {
                state.set_quadrant(*mode);
                Ok(())
            }
            GerberCommand::SetNotation(notation) => {
                state.notation = *notation;
                Ok(())
            }
            GerberCommand::LoadPolarity(polarity) => {
                state.polarity = *polarity;
                Ok(())
            }
            GerberCommand::LoadMirroring(mirroring) => {
                state.mirroring = *mirroring;
                Ok(())
            }
            GerberCommand::LoadRotation(degrees) => {
                state.rotation = *degrees;
                Ok(())
            }
            GerberCommand::LoadScale(scale) => {
                state.scale = *scale;
                Ok(())
            }
            GerberCommand::Interpolate { x, y, i, j } => {
                execute_interpolate(state, x, y, i, j, line)
            }
            GerberCommand::Move { x, y } => {
                let target = decode_target(state, x, y, line)?;
                state.consumer().close_contour();
                state.current_point = target;
                Ok(())
            }
            GerberCommand::Flash { x, y } => {
                let target = decode_target(state, x, y, line)?;
                state.current_point = target;
                let aperture = state.aperture()?;
                let object_state = state.object_state();
                state.consumer().flash(target, &aperture, object_state)
            }
            GerberCommand::RegionBegin => {
                state.push_consumer(GraphicsConsumer::Region(RegionCollector::default()));
                Ok(())
            }
            GerberCommand::RegionEnd => execute_region_end(state),
            GerberCommand::BlockOpen { code } => {
                state.open_blocks.push(*code);
                state.push_consumer(GraphicsConsumer::Block(BlockCollector::default()));
                Ok(())
            }
            GerberCommand::BlockClose => execute_block_close(state),
            GerberCommand::StepRepeatOpen {
                x_repeat,
                y_repeat,
                x_delta,
                y_delta,
            } => {
                close_step_repeat(state)?;
                if *x_repeat > 1 || *y_repeat > 1 {
                    let scale = state.unit_scale()?;
                    state.step_repeats.push(StepRepeat {
                        x_repeat: *x_repeat,
                        y_repeat: *y_repeat,
                        x_delta: x_delta * scale,
                        y_delta: y_delta * scale,
                    });
                    state.push_consumer(GraphicsConsumer::Block(BlockCollector::default()));
                }
                Ok(())
            }
            GerberCommand::StepRepeatClose => close_step_repeat(state),
            GerberCommand::Attribute(record) => {
                state.attributes.push(record.clone());
                Ok(())
            }
            GerberCommand::AttributeDelete(record) => {
                state.attributes.push(format!("TD{record}"));
                Ok(())
            }
            GerberCommand::Comment(text) => {
                // X2-style attributes smuggled through comments.
                if let Some(attr) = text.strip_prefix("#@!") {
                    state.attributes.push(attr.trim().to_string());
                }
                Ok(())
            }
            GerberCommand::Ignored(_) => Ok(()),
            GerberCommand::EndOfFile => {
                close_step_repeat(state)?;
                state.objects = state.take_base_objects()?;
                state.done = true;
                Ok(())
            }
        }
    }
}

/// Decode an absolute target point from optional coordinate strings,
/// honoring notation and falling back to the current point.
fn decode_target(
    state: &GerberState,
    x: &Option<String>,
    y: &Option<String>,
    line: u32,
) -> Result<Point, ArtworkError> {
    let format = state.format()?;
    let units = state.units()?;

    let decode = |value: &Option<String>, is_x: bool| -> Result<Option<f64>, ArtworkError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let parsed = if is_x {
            format.parse_x(value)
        } else {
            format.parse_y(value)
        }
        .map_err(|e| ArtworkError::parse(line, e))?;
        Ok(Some(units.to_mm(parsed)))
    };

    let x_mm = decode(x, true)?;
    let y_mm = decode(y, false)?;

    Ok(match state.notation {
        Notation::Absolute => Point::new(
            x_mm.unwrap_or(state.current_point.x),
            y_mm.unwrap_or(state.current_point.y),
        ),
        Notation::Incremental => Point::new(
            state.current_point.x + x_mm.unwrap_or(0.0),
            state.current_point.y + y_mm.unwrap_or(0.0),
        ),
    })
}

/// Decode I/J arc offsets; missing components reuse the previous offsets.
fn decode_offsets(
    state: &GerberState,
    i: &Option<String>,
    j: &Option<String>,
    line: u32,
) -> Result<Point, ArtworkError> {
    let format = state.format()?;
    let units = state.units()?;
    let i_mm = match i {
        None => state.arc_offset.x,
        Some(v) => units.to_mm(
            format
                .parse_x(v)
                .map_err(|e| ArtworkError::parse(line, e))?,
        ),
    };
    let j_mm = match j {
        None => state.arc_offset.y,
        Some(v) => units.to_mm(
            format
                .parse_y(v)
                .map_err(|e| ArtworkError::parse(line, e))?,
        ),
    };
    Ok(Point::new(i_mm, j_mm))
}

fn execute_aperture_define(
    state: &mut GerberState,
    code: u32,
    template: &AdTemplate,
    modifiers: &[f64],
    line: u32,
) -> Result<(), ArtworkError> {
    let scale = state.unit_scale()?;

    let aperture = match template {
        AdTemplate::Standard(standard) => {
            let scaled = scale_standard_modifiers(*standard, modifiers, scale);
            Aperture::standard(code, *standard, scaled)
                .map_err(|e| ArtworkError::parse(line, format!("aperture D{code}: {e}")))?
        }
        AdTemplate::Macro(name) => {
            let def = state.macros.get(name).cloned().ok_or_else(|| {
                ArtworkError::parse(line, format!("aperture D{code} references unknown macro {name}"))
            })?;
            Aperture::macro_backed(code, def, modifiers.to_vec(), scale)
        }
    };

    if state.apertures.insert(code, Rc::new(aperture)).is_some() {
        state.warn(format!("aperture D{code} redefined"));
    }
    Ok(())
}

/// Convert dimension modifiers to mm, leaving counts and angles alone.
fn scale_standard_modifiers(
    template: StandardTemplate,
    modifiers: &[f64],
    scale: f64,
) -> Vec<f64> {
    modifiers
        .iter()
        .enumerate()
        .map(|(index, &value)| match template {
            StandardTemplate::Circle | StandardTemplate::Rectangle | StandardTemplate::Obround => {
                value * scale
            }
            // Polygon: diameter and hole scale; vertex count and rotation
            // do not.
            StandardTemplate::Polygon if index == 0 || index == 3 => value * scale,
            StandardTemplate::Polygon => value,
        })
        .collect()
}

fn execute_interpolate(
    state: &mut GerberState,
    x: &Option<String>,
    y: &Option<String>,
    i: &Option<String>,
    j: &Option<String>,
    line: u32,
) -> Result<(), ArtworkError> {
    let start = state.current_point;
    let target = decode_target(state, x, y, line)?;
    let in_region = state.in_region();
    let aperture = if in_region {
        None
    } else {
        Some(state.aperture()?)
    };
    let object_state = state.object_state();
    let mode = state.interpolation()?;

    match mode {
        InterpolationMode::Linear | InterpolationMode::LinearScaled => {
            if x.is_none() && y.is_none() {
                state.warn(format!("empty draw at line {line}"));
            }
            state
                .consumer()
                .line(start, target, aperture, object_state);
            state.current_point = target;
            Ok(())
        }
        InterpolationMode::Clockwise | InterpolationMode::CounterClockwise => {
            let offsets = decode_offsets(state, i, j, line)?;
            state.arc_offset = offsets;
            let ccw = mode == InterpolationMode::CounterClockwise;
            execute_arc(state, start, target, offsets, ccw, aperture, line)?;
            state.current_point = target;
            Ok(())
        }
    }
}

/// Resolve a circular interpolation into an arc (or full circle) primitive.
///
/// The center is reconstructed from the chord's perpendicular bisector; the
/// I/J offsets disambiguate between the two candidates in multi-quadrant
/// mode, while in single-quadrant mode the turn direction does.
fn execute_arc(
    state: &mut GerberState,
    start: Point,
    target: Point,
    offsets: Point,
    ccw: bool,
    aperture: Option<Rc<Aperture>>,
    line: u32,
) -> Result<(), ArtworkError> {
    let quadrant = state.quadrant()?;
    let radius = (offsets.x * offsets.x + offsets.y * offsets.y).sqrt();
    let chord = start.distance(&target);
    let object_state = state.object_state();

    if chord < EPS {
        match quadrant {
            QuadrantMode::Single => {
                return Err(ArtworkError::Geometry(format!(
                    "zero-length arc in single-quadrant mode at line {line}"
                )));
            }
            QuadrantMode::Multi => {
                if radius > EPS {
                    let center = start + offsets;
                    state
                        .consumer()
                        .circle(center, radius, aperture, object_state);
                } else {
                    state.warn(format!("empty arc at line {line}"));
                }
                return Ok(());
            }
        }
    }

    let mid = start.midpoint(&target);
    let chord_dir = (target - start).scale(1.0 / chord);
    // Unit normal to the left of the chord direction.
    let normal = Point::new(-chord_dir.y, chord_dir.x);
    let half = chord / 2.0;

    let mut offset_sq = radius * radius - half * half;
    if offset_sq < 0.0 {
        if offset_sq > -EPS {
            state.warn(format!("arc radius rounds below the chord at line {line}"));
        } else {
            state.warn(format!("arc radius too small for its chord at line {line}"));
        }
        offset_sq = 0.0;
    }
    let offset = offset_sq.sqrt();

    let left = mid + normal.scale(offset);
    let right = mid - normal.scale(offset);

    let center = match quadrant {
        QuadrantMode::Multi => {
            let hint = start + offsets;
            if left.distance_squared(&hint) <= right.distance_squared(&hint) {
                left
            } else {
                right
            }
        }
        QuadrantMode::Single => {
            if ccw {
                left
            } else {
                right
            }
        }
    };

    state
        .consumer()
        .arc(start, target, center, radius, ccw, aperture, object_state);
    Ok(())
}

fn execute_region_end(state: &mut GerberState) -> Result<(), ArtworkError> {
    let consumer = state.pop_consumer()?;
    let GraphicsConsumer::Region(mut region) = consumer else {
        return Err(ArtworkError::Geometry(
            "region end without an open region".into(),
        ));
    };
    region.close_contour();
    if !region.contours.is_empty() {
        let object = GraphicsObject::new(
            GraphicsPrimitive::Region {
                contours: region.contours,
            },
            None,
            state.object_state(),
        );
        state.consumer().push_object(object);
    }
    Ok(())
}

fn execute_block_close(state: &mut GerberState) -> Result<(), ArtworkError> {
    let code = state.open_blocks.pop().ok_or_else(|| {
        ArtworkError::Geometry("block aperture close without an open block".into())
    })?;
    let consumer = state.pop_consumer()?;
    let GraphicsConsumer::Block(collector) = consumer else {
        return Err(ArtworkError::Geometry(
            "block aperture scope interleaved with another scope".into(),
        ));
    };
    let aperture = Aperture::block(code, collector.objects);
    if state.apertures.insert(code, Rc::new(aperture)).is_some() {
        state.warn(format!("aperture D{code} redefined"));
    }
    Ok(())
}

/// Close the innermost open step-and-repeat scope, emitting the collected
/// block as a repeat object. A no-op when no scope is open.
fn close_step_repeat(state: &mut GerberState) -> Result<(), ArtworkError> {
    let Some(params) = state.step_repeats.pop() else {
        return Ok(());
    };
    let consumer = state.pop_consumer()?;
    let GraphicsConsumer::Block(collector) = consumer else {
        return Err(ArtworkError::Geometry(
            "step-and-repeat scope interleaved with another scope".into(),
        ));
    };
    let block = Rc::new(Block {
        x_repeat: params.x_repeat,
        y_repeat: params.y_repeat,
        x_delta: params.x_delta,
        y_delta: params.y_delta,
        objects: collector.objects,
    });
    let object = GraphicsObject::new(
        GraphicsPrimitive::Repeat {
            block,
            origin: Point::new(0.0, 0.0),
        },
        None,
        state.object_state(),
    );
    state.consumer().push_object(object);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerber::tokenizer::tokenize;
    use approx::assert_relative_eq;

    fn parse(input: &str) -> Vec<GerberCommand> {
        parse_commands(&tokenize(input))
            .unwrap()
            .into_iter()
            .map(|s| s.command)
            .collect()
    }

    fn run(input: &str) -> GerberState {
        let mut state = GerberState::new();
        for spanned in parse_commands(&tokenize(input)).unwrap() {
            spanned.command.execute(&mut state, spanned.line).unwrap();
        }
        state
    }

    const HEADER: &str = "%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nG01*\n";

    #[test]
    fn test_parse_format_spec() {
        let cmds = parse("%FSLAX24Y24*%\n");
        match &cmds[0] {
            GerberCommand::FormatSpec(fmt) => {
                assert_eq!(fmt.x_integer, 2);
                assert_eq!(fmt.x_decimal, 4);
                assert_eq!(fmt.zero_mode, ZeroMode::SkipLeading);
                assert_eq!(fmt.notation, Notation::Absolute);
            }
            other => panic!("expected FormatSpec, got: {other:?}"),
        }

        let cmds = parse("%FSTIX35Y35*%\n");
        match &cmds[0] {
            GerberCommand::FormatSpec(fmt) => {
                assert_eq!(fmt.zero_mode, ZeroMode::SkipTrailing);
                assert_eq!(fmt.notation, Notation::Incremental);
                assert_eq!(fmt.x_integer, 3);
                assert_eq!(fmt.x_decimal, 5);
            }
            other => panic!("expected FormatSpec, got: {other:?}"),
        }
    }

    #[test]
    fn test_parse_units_permissive() {
        assert_eq!(
            parse("%MOMM*%\n"),
            vec![GerberCommand::UnitMode(Units::Millimeters)]
        );
        assert_eq!(
            parse("%MOIN*%\n"),
            vec![GerberCommand::UnitMode(Units::Inches)]
        );
        // Garbled unit strings still select inches
        assert_eq!(
            parse("%MOI*%\n"),
            vec![GerberCommand::UnitMode(Units::Inches)]
        );
    }

    #[test]
    fn test_parse_aperture_defines() {
        assert_eq!(
            parse("%ADD10C,0.020*%\n"),
            vec![GerberCommand::ApertureDefine {
                code: 10,
                template: AdTemplate::Standard(StandardTemplate::Circle),
                modifiers: vec![0.020],
            }]
        );
        assert_eq!(
            parse("%ADD11R,0.040X0.020*%\n"),
            vec![GerberCommand::ApertureDefine {
                code: 11,
                template: AdTemplate::Standard(StandardTemplate::Rectangle),
                modifiers: vec![0.040, 0.020],
            }]
        );
        assert_eq!(
            parse("%ADD22OC8,0.1*%\n"),
            vec![GerberCommand::ApertureDefine {
                code: 22,
                template: AdTemplate::Macro("OC8".into()),
                modifiers: vec![0.1],
            }]
        );
    }

    #[test]
    fn test_parse_rejects_reserved_aperture() {
        let records = tokenize("%ADD05C,0.020*%\n");
        assert!(parse_commands(&records).is_err());
        let records = tokenize("D5*\n");
        assert!(parse_commands(&records).is_err());
    }

    #[test]
    fn test_parse_macro_define() {
        let cmds = parse("%AMOC8*5,1,8,0,0,1.08239X$1,22.5*%\n");
        match &cmds[0] {
            GerberCommand::MacroDefine(mac) => {
                assert_eq!(mac.name, "OC8");
                assert_eq!(mac.content.len(), 1);
            }
            other => panic!("expected MacroDefine, got: {other:?}"),
        }
    }

    #[test]
    fn test_parse_operations() {
        assert_eq!(
            parse("X100Y-200D01*\n"),
            vec![GerberCommand::Interpolate {
                x: Some("100".into()),
                y: Some("-200".into()),
                i: None,
                j: None,
            }]
        );
        assert_eq!(
            parse("X100Y200D02*\n"),
            vec![GerberCommand::Move {
                x: Some("100".into()),
                y: Some("200".into()),
            }]
        );
        assert_eq!(
            parse("X100Y200D03*\n"),
            vec![GerberCommand::Flash {
                x: Some("100".into()),
                y: Some("200".into()),
            }]
        );
        assert_eq!(parse("D10*\n"), vec![GerberCommand::SelectAperture(10)]);
    }

    #[test]
    fn test_parse_bare_coordinates_interpolate() {
        assert_eq!(
            parse("X500*\n"),
            vec![GerberCommand::Interpolate {
                x: Some("500".into()),
                y: None,
                i: None,
                j: None,
            }]
        );
    }

    #[test]
    fn test_parse_g_codes() {
        assert_eq!(
            parse("G01*G02*G03*G74*G75*G90*G91*"),
            vec![
                GerberCommand::SetInterpolation(InterpolationMode::Linear),
                GerberCommand::SetInterpolation(InterpolationMode::Clockwise),
                GerberCommand::SetInterpolation(InterpolationMode::CounterClockwise),
                GerberCommand::SetQuadrant(QuadrantMode::Single),
                GerberCommand::SetQuadrant(QuadrantMode::Multi),
                GerberCommand::SetNotation(Notation::Absolute),
                GerberCommand::SetNotation(Notation::Incremental),
            ]
        );
        assert_eq!(
            parse("G36*G37*"),
            vec![GerberCommand::RegionBegin, GerberCommand::RegionEnd]
        );
    }

    #[test]
    fn test_parse_ignored_commands() {
        for input in ["%IPPOS*%", "%LNcopper*%", "%SFA1.0B1.0*%", "G54*", "M01*"] {
            let cmds = parse(&format!("{input}\n"));
            assert!(
                matches!(cmds[0], GerberCommand::Ignored(_)),
                "{input} should be ignored"
            );
        }
    }

    #[test]
    fn test_parse_unknown_is_error() {
        assert!(parse_commands(&tokenize("%QQ1*%\n")).is_err());
        assert!(parse_commands(&tokenize("G99*\n")).is_err());
    }

    #[test]
    fn test_parse_attributes() {
        let cmds = parse("%TF.FileFunction,Copper,L1,Top*%\n%TD.AperFunction*%\n");
        assert_eq!(
            cmds,
            vec![
                GerberCommand::Attribute("TF.FileFunction,Copper,L1,Top".into()),
                GerberCommand::AttributeDelete(".AperFunction".into()),
            ]
        );
    }

    #[test]
    fn test_execute_flash_records_object() {
        let state = run(&format!("{HEADER}X10000Y20000D03*M02*"));
        assert!(state.done);
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Flash { center } => {
                assert_relative_eq!(center.x, 1.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 2.0, epsilon = 1e-9);
            }
            other => panic!("expected Flash, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_inches_convert_to_mm() {
        let state = run(
            "%FSLAX24Y24*%\n%MOIN*%\n%ADD10C,0.01*%\nD10*\nX10000Y0D03*\nM02*",
        );
        match &state.objects[0].primitive {
            GraphicsPrimitive::Flash { center } => {
                assert_relative_eq!(center.x, 25.4, epsilon = 1e-9);
            }
            other => panic!("expected Flash, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_line_and_modal_coordinates() {
        let state = run(&format!(
            "{HEADER}X10000Y20000D02*X30000D01*M02*"
        ));
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Line { start, end } => {
                assert_relative_eq!(start.x, 1.0, epsilon = 1e-9);
                assert_relative_eq!(start.y, 2.0, epsilon = 1e-9);
                assert_relative_eq!(end.x, 3.0, epsilon = 1e-9);
                // Y persisted from the move
                assert_relative_eq!(end.y, 2.0, epsilon = 1e-9);
            }
            other => panic!("expected Line, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_incremental_notation() {
        let state = run(&format!(
            "{HEADER}G91*X10000Y0D02*X10000Y10000D01*M02*"
        ));
        match &state.objects[0].primitive {
            GraphicsPrimitive::Line { start, end } => {
                assert_relative_eq!(start.x, 1.0, epsilon = 1e-9);
                assert_relative_eq!(end.x, 2.0, epsilon = 1e-9);
                assert_relative_eq!(end.y, 1.0, epsilon = 1e-9);
            }
            other => panic!("expected Line, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_requires_format() {
        let mut state = GerberState::new();
        let cmds = parse_commands(&tokenize("X100Y200D03*")).unwrap();
        let err = cmds[0].command.execute(&mut state, 1).unwrap_err();
        assert!(matches!(err, ArtworkError::StateNotSet("coordinate format")));
    }

    #[test]
    fn test_execute_requires_interpolation_mode() {
        let mut state = GerberState::new();
        for spanned in
            parse_commands(&tokenize("%FSLAX24Y24*%%MOMM*%%ADD10C,0.1*%D10*")).unwrap()
        {
            spanned.command.execute(&mut state, spanned.line).unwrap();
        }
        let cmds = parse_commands(&tokenize("X100Y200D01*")).unwrap();
        let err = cmds[0].command.execute(&mut state, 1).unwrap_err();
        assert!(matches!(err, ArtworkError::StateNotSet("interpolation mode")));
    }

    #[test]
    fn test_execute_arc_multi_quadrant_half_circle() {
        let state = run(
            "%FSLAX23Y23*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nG75*\nX10000Y0D02*\nG03*\nX-10000Y0I-10000J0D01*\nM02*",
        );
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Arc {
                start,
                end,
                center,
                radius,
                ccw,
            } => {
                assert!(ccw);
                assert_relative_eq!(*radius, 10.0, epsilon = 1e-9);
                assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
                assert_relative_eq!(start.x, 10.0, epsilon = 1e-9);
                assert_relative_eq!(end.x, -10.0, epsilon = 1e-9);
            }
            other => panic!("expected Arc, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_arc_center_near_offset_hint() {
        // Quarter arc: center disambiguated by the I/J hint
        let state = run(&format!(
            "{HEADER}G75*X10000Y0D02*G03*X0Y10000I-10000J0D01*M02*"
        ));
        match &state.objects[0].primitive {
            GraphicsPrimitive::Arc { center, .. } => {
                assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
            }
            other => panic!("expected Arc, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_arc_single_quadrant_direction() {
        // Same unsigned offsets; direction picks the center side.
        let base = "%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,0.1*%\nD10*\nG74*\nX10000Y0D02*\n";
        let cw = run(&format!("{base}G02*X0Y-10000I10000J0D01*M02*"));
        match &cw.objects[0].primitive {
            GraphicsPrimitive::Arc { center, ccw, .. } => {
                assert!(!ccw);
                // Right of the chord from (1,0) to (0,-1): the origin
                assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
            }
            other => panic!("expected Arc, got: {other:?}"),
        }

        let ccw = run(&format!("{base}G03*X0Y10000I10000J0D01*M02*"));
        match &ccw.objects[0].primitive {
            GraphicsPrimitive::Arc { center, ccw, .. } => {
                assert!(ccw);
                assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
            }
            other => panic!("expected Arc, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_arc_zero_chord_multi_quadrant_full_circle() {
        let state = run(&format!(
            "{HEADER}G75*X10000Y0D02*G03*X10000Y0I-10000J0D01*M02*"
        ));
        match &state.objects[0].primitive {
            GraphicsPrimitive::Circle { center, radius } => {
                assert_relative_eq!(center.x, 0.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 0.0, epsilon = 1e-9);
                assert_relative_eq!(*radius, 1.0, epsilon = 1e-9);
            }
            other => panic!("expected Circle, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_arc_zero_chord_single_quadrant_fails() {
        let mut state = GerberState::new();
        let input = format!("{HEADER}G74*X10000Y0D02*G02*X10000Y0I-10000J0D01*");
        let mut result = Ok(());
        for spanned in parse_commands(&tokenize(&input)).unwrap() {
            result = spanned.command.execute(&mut state, spanned.line);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ArtworkError::Geometry(_))));
    }

    #[test]
    fn test_execute_arc_radius_too_small_warns() {
        let state = run(&format!(
            "{HEADER}G75*X0Y0D02*G03*X20000Y0I1000J0D01*M02*"
        ));
        assert!(state
            .warnings
            .iter()
            .any(|w| w.contains("radius too small")));
        assert_eq!(state.objects.len(), 1);
    }

    #[test]
    fn test_execute_region_with_hole_contours() {
        let state = run(&format!(
            "{HEADER}G36*X0Y0D02*X100000Y0D01*X100000Y100000D01*X0Y100000D01*X0Y0D01*\
             X20000Y20000D02*X80000Y20000D01*X80000Y80000D01*X20000Y80000D01*X20000Y20000D01*G37*M02*"
        ));
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Region { contours } => {
                assert_eq!(contours.len(), 2);
                assert_eq!(contours[0].segments.len(), 4);
            }
            other => panic!("expected Region, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_region_flash_is_error() {
        let mut state = GerberState::new();
        let input = format!("{HEADER}G36*X0Y0D02*X100Y0D03*");
        let mut result = Ok(());
        for spanned in parse_commands(&tokenize(&input)).unwrap() {
            result = spanned.command.execute(&mut state, spanned.line);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ArtworkError::Geometry(_))));
    }

    #[test]
    fn test_execute_step_repeat_emits_repeat() {
        let state = run(&format!(
            "{HEADER}%SRX2Y3I5J4*%X0Y0D03*%SR*%M02*"
        ));
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Repeat { block, .. } => {
                assert_eq!(block.x_repeat, 2);
                assert_eq!(block.y_repeat, 3);
                assert_relative_eq!(block.x_delta, 5.0, epsilon = 1e-9);
                assert_relative_eq!(block.y_delta, 4.0, epsilon = 1e-9);
                assert_eq!(block.objects.len(), 1);
            }
            other => panic!("expected Repeat, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_step_repeat_closed_by_eof() {
        let state = run(&format!("{HEADER}%SRX2Y1I3J0*%X0Y0D03*M02*"));
        assert_eq!(state.objects.len(), 1);
        assert!(matches!(
            state.objects[0].primitive,
            GraphicsPrimitive::Repeat { .. }
        ));
    }

    #[test]
    fn test_execute_block_aperture_flash() {
        let state = run(&format!(
            "{HEADER}%ABD100*%X10000Y10000D03*%AB*%D100*X50000Y0D03*M02*"
        ));
        // The block flash expands to its nested flash, translated
        assert_eq!(state.objects.len(), 1);
        match &state.objects[0].primitive {
            GraphicsPrimitive::Flash { center } => {
                assert_relative_eq!(center.x, 6.0, epsilon = 1e-9);
                assert_relative_eq!(center.y, 1.0, epsilon = 1e-9);
            }
            other => panic!("expected Flash, got: {other:?}"),
        }
    }

    #[test]
    fn test_execute_load_transforms_snapshot() {
        let state = run(&format!(
            "{HEADER}%LPC*%%LMXY*%%LR45*%%LS2*%X0Y0D03*M02*"
        ));
        let snapshot = state.objects[0].state;
        assert_eq!(snapshot.polarity, Polarity::Clear);
        assert_eq!(snapshot.mirroring, Mirroring::XY);
        assert_relative_eq!(snapshot.rotation, 45.0);
        assert_relative_eq!(snapshot.scale, 2.0);
    }

    #[test]
    fn test_execute_macro_aperture_flash() {
        let state = run(
            "%FSLAX24Y24*%\n%MOMM*%\n%AMDONUT*1,1,$1,0,0*1,0,$2,0,0*%\n%ADD30DONUT,1X0.5*%\nD30*\nX0Y0D03*\nM02*",
        );
        assert_eq!(state.objects.len(), 1);
        let polygons = state.objects[0].polygons().unwrap();
        // Disc with a punched hole: outline + hole ring
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn test_execute_aperture_redefine_warns() {
        let state = run(&format!("{HEADER}%ADD10C,0.2*%M02*"));
        assert!(state.warnings.iter().any(|w| w.contains("redefined")));
    }

    #[test]
    fn test_attributes_recorded() {
        let state = run(&format!(
            "{HEADER}%TF.FileFunction,Copper,L1,Top*%G04 #@! TA.AperFunction,Conductor*M02*"
        ));
        assert_eq!(state.attributes.len(), 2);
        assert!(state.attributes[1].starts_with("TA."));
    }
}
