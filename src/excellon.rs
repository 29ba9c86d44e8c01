//! Excellon drill file parser.
//!
//! Line-framed: the header runs until a bare `%`, comments start with `;`.
//! Header comments of the `FORMAT={…}` / `FILE_FORMAT=n:m` families set the
//! coordinate format; tool definitions establish diameters; coordinate
//! records emit drill hits. All output is in mm.

use std::collections::HashMap;

use log::warn;
use serde::Serialize;

use crate::error::ArtworkError;
use crate::geometry::polygon::Bounds;
use crate::geometry::Point;
use crate::gerber::coord::{parse_fixed, Units, ZeroMode};

/// One drill hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillHole {
    pub center: Point,
    pub diameter: f64,
}

/// Parsed drill file: the hit list plus bounds grown by the hole diameters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrillFile {
    pub holes: Vec<DrillHole>,
    pub bounds: Bounds,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct DrillFormat {
    integer: u8,
    decimal: u8,
    zero_mode: ZeroMode,
}

struct DrillParser {
    units: Units,
    format: DrillFormat,
    /// Set once a FORMAT/FILE_FORMAT comment pins the format; later unit
    /// directives then keep their hands off it.
    format_explicit: bool,
    relative: bool,
    drill_mode: bool,
    in_header: bool,
    tools: HashMap<u32, f64>,
    current_tool: Option<u32>,
    position: Point,
    output: DrillFile,
}

const METRIC_FORMAT: DrillFormat = DrillFormat {
    integer: 3,
    decimal: 3,
    zero_mode: ZeroMode::SkipLeading,
};

const INCH_FORMAT: DrillFormat = DrillFormat {
    integer: 2,
    decimal: 4,
    zero_mode: ZeroMode::SkipLeading,
};

/// Parse an Excellon drill file.
pub fn parse_excellon(content: &str) -> Result<DrillFile, ArtworkError> {
    let mut parser = DrillParser {
        units: Units::Millimeters,
        format: METRIC_FORMAT,
        format_explicit: false,
        relative: false,
        drill_mode: true,
        in_header: false,
        tools: HashMap::new(),
        current_tool: None,
        position: Point::new(0.0, 0.0),
        output: DrillFile::default(),
    };

    for (index, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        let line_no = index as u32 + 1;
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix(';') {
            parser.comment(comment.trim());
            continue;
        }
        if parser.directive(line, line_no)? {
            continue;
        }
        if line.starts_with("M30") || line == "M00" {
            break;
        }
    }

    parser.output.bounds = bounds_of(&parser.output.holes);
    Ok(parser.output)
}

fn bounds_of(holes: &[DrillHole]) -> Bounds {
    let mut bounds = Bounds::empty();
    for hole in holes {
        bounds.expand_point(hole.center.x - hole.diameter, hole.center.y - hole.diameter);
        bounds.expand_point(hole.center.x + hole.diameter, hole.center.y + hole.diameter);
    }
    bounds
}

impl DrillParser {
    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.output.warnings.push(message);
    }

    /// Header comments may carry format directives.
    fn comment(&mut self, comment: &str) {
        if let Some(spec) = comment.strip_prefix("FORMAT=") {
            self.apply_format_comment(spec);
        } else if let Some(spec) = comment.strip_prefix("FILE_FORMAT=") {
            if let Some((int_digits, dec_digits)) = parse_digit_pair(spec) {
                self.format.integer = int_digits;
                self.format.decimal = dec_digits;
                self.format_explicit = true;
            }
        }
    }

    /// `FORMAT={3:3/ absolute / metric / suppress leading zeros}`
    fn apply_format_comment(&mut self, spec: &str) {
        let spec = spec.trim_start_matches('{').trim_end_matches('}');
        for part in spec.split('/') {
            let part = part.trim();
            if let Some((int_digits, dec_digits)) = parse_digit_pair(part) {
                self.format.integer = int_digits;
                self.format.decimal = dec_digits;
                self.format_explicit = true;
            } else if part.eq_ignore_ascii_case("absolute") {
                self.relative = false;
            } else if part.eq_ignore_ascii_case("incremental") {
                self.relative = true;
            } else if part.eq_ignore_ascii_case("metric") {
                self.units = Units::Millimeters;
            } else if part.eq_ignore_ascii_case("inch") {
                self.units = Units::Inches;
            } else if part.eq_ignore_ascii_case("decimal") {
                self.format.zero_mode = ZeroMode::Direct;
                self.format_explicit = true;
            } else if part.eq_ignore_ascii_case("suppress leading zeros") {
                self.format.zero_mode = ZeroMode::SkipLeading;
                self.format_explicit = true;
            } else if part.eq_ignore_ascii_case("suppress trailing zeros") {
                self.format.zero_mode = ZeroMode::SkipTrailing;
                self.format_explicit = true;
            } else if part.eq_ignore_ascii_case("keep zeros") {
                self.format.zero_mode = ZeroMode::None;
                self.format_explicit = true;
            }
        }
    }

    /// Handle one non-comment line. Returns false only for end-of-file marks.
    fn directive(&mut self, line: &str, line_no: u32) -> Result<bool, ArtworkError> {
        let upper = line.to_ascii_uppercase();

        match upper.as_str() {
            "M48" => {
                self.in_header = true;
                return Ok(true);
            }
            "%" | "M95" => {
                self.in_header = false;
                return Ok(true);
            }
            "G90" => {
                self.relative = false;
                return Ok(true);
            }
            "G91" => {
                self.relative = true;
                return Ok(true);
            }
            "G05" => {
                self.drill_mode = true;
                return Ok(true);
            }
            "G00" => {
                self.drill_mode = false;
                return Ok(true);
            }
            "M71" => {
                self.set_units(Units::Millimeters);
                return Ok(true);
            }
            "M72" => {
                self.set_units(Units::Inches);
                return Ok(true);
            }
            "M30" | "M00" => return Ok(false),
            _ => {}
        }

        if upper.starts_with("METRIC") {
            self.set_units(Units::Millimeters);
            self.apply_zero_options(&upper);
            return Ok(true);
        }
        if upper.starts_with("INCH") {
            self.set_units(Units::Inches);
            self.apply_zero_options(&upper);
            return Ok(true);
        }

        if let Some(rest) = upper.strip_prefix('T') {
            self.tool_line(rest, line_no)?;
            return Ok(true);
        }

        if upper.starts_with('X') || upper.starts_with('Y') {
            self.coordinate_line(&upper, line_no)?;
            return Ok(true);
        }

        // Feed rates, spindle commands and other directives have no
        // geometric meaning here.
        Ok(true)
    }

    fn set_units(&mut self, units: Units) {
        self.units = units;
        if !self.format_explicit {
            let zero_mode = self.format.zero_mode;
            self.format = match units {
                Units::Millimeters => METRIC_FORMAT,
                Units::Inches => INCH_FORMAT,
            };
            self.format.zero_mode = zero_mode;
        }
    }

    /// `METRIC,TZ,000.000` style trailers.
    fn apply_zero_options(&mut self, line: &str) {
        for part in line.split(',').skip(1) {
            let part = part.trim();
            match part {
                // LZ means "leading zeros kept" (trailing suppressed);
                // TZ means "trailing zeros kept".
                "LZ" => self.format.zero_mode = ZeroMode::SkipTrailing,
                "TZ" => self.format.zero_mode = ZeroMode::SkipLeading,
                _ => {
                    // A 000.000 template pins the digit counts.
                    if part.contains('.') && part.chars().all(|c| c == '0' || c == '.') {
                        if let Some(dot) = part.find('.') {
                            let int_digits = dot as u8;
                            let dec_digits = (part.len() - dot - 1) as u8;
                            if int_digits > 0 && dec_digits > 0 {
                                self.format.integer = int_digits;
                                self.format.decimal = dec_digits;
                                self.format_explicit = true;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Tool definition (`T1C0.300F200S65`), tool range (`T1,4C0.300`) or
    /// tool change (`T1`).
    fn tool_line(&mut self, rest: &str, line_no: u32) -> Result<(), ArtworkError> {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(ArtworkError::parse(
                line_no,
                format!("bad tool number: T{rest}"),
            ));
        }
        let first: u32 = rest[..digits_end]
            .parse()
            .map_err(|_| ArtworkError::parse(line_no, format!("bad tool number: T{rest}")))?;

        let mut last = first;
        let mut modifier_text = &rest[digits_end..];
        if let Some(range_rest) = modifier_text.strip_prefix(',') {
            let end = range_rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(range_rest.len());
            last = range_rest[..end].parse().map_err(|_| {
                ArtworkError::parse(line_no, format!("bad tool range: T{rest}"))
            })?;
            modifier_text = &range_rest[end..];
        }

        if modifier_text.is_empty() {
            // Tool change.
            self.current_tool = Some(first);
            return Ok(());
        }

        let modifiers = parse_tool_modifiers(modifier_text, line_no)?;
        let Some(&diameter) = modifiers.get(&'C') else {
            // A definition without a C modifier (plated/feed info only) still
            // acts as a tool change.
            self.current_tool = Some(first);
            return Ok(());
        };

        let diameter_mm = self.units.to_mm(diameter);
        for tool in first..=last.max(first) {
            self.tools.insert(tool, diameter_mm);
        }
        Ok(())
    }

    fn coordinate_line(&mut self, line: &str, line_no: u32) -> Result<(), ArtworkError> {
        if !self.drill_mode {
            return Ok(());
        }
        let Some(tool) = self.current_tool else {
            self.warn(format!("drill hit before any tool selection at line {line_no}"));
            return Ok(());
        };
        let Some(diameter) = self.tools.get(&tool).copied() else {
            self.warn(format!("drill hit with undefined tool T{tool} at line {line_no}"));
            return Ok(());
        };

        let mut x = None;
        let mut y = None;
        let bytes = line.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let key = bytes[pos];
            pos += 1;
            let start = pos;
            if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                pos += 1;
            }
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let value = &line[start..pos];
            match key {
                b'X' => x = Some(self.decode(value, line_no)?),
                b'Y' => y = Some(self.decode(value, line_no)?),
                // G85 slot separators and repeat counts are not drills.
                _ => return Ok(()),
            }
        }

        let target = if self.relative {
            Point::new(
                self.position.x + x.unwrap_or(0.0),
                self.position.y + y.unwrap_or(0.0),
            )
        } else {
            Point::new(
                x.unwrap_or(self.position.x),
                y.unwrap_or(self.position.y),
            )
        };
        self.position = target;
        self.output.holes.push(DrillHole {
            center: target,
            diameter,
        });
        Ok(())
    }

    fn decode(&self, value: &str, line_no: u32) -> Result<f64, ArtworkError> {
        let parsed = parse_fixed(
            value,
            self.format.integer,
            self.format.decimal,
            self.format.zero_mode,
        )
        .map_err(|e| ArtworkError::parse(line_no, e))?;
        Ok(self.units.to_mm(parsed))
    }
}

/// `3:3` / `2:4` digit pair.
fn parse_digit_pair(s: &str) -> Option<(u8, u8)> {
    let (a, b) = s.trim().split_once(':')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

fn parse_tool_modifiers(
    text: &str,
    line_no: u32,
) -> Result<HashMap<char, f64>, ArtworkError> {
    let mut modifiers = HashMap::new();
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let key = bytes[pos] as char;
        pos += 1;
        let start = pos;
        if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
            pos += 1;
        }
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
            pos += 1;
        }
        if !matches!(key, 'C' | 'F' | 'S' | 'H' | 'B' | 'Z') {
            return Err(ArtworkError::parse(
                line_no,
                format!("unknown tool modifier '{key}' in: {text}"),
            ));
        }
        let value: f64 = text[start..pos].parse().map_err(|_| {
            ArtworkError::parse(line_no, format!("bad tool modifier value in: {text}"))
        })?;
        modifiers.insert(key, value);
    }
    Ok(modifiers)
}
