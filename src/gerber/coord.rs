use serde::Serialize;

/// Zero-suppression mode from the %FS command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ZeroMode {
    /// Full-width integers, no suppression.
    None,
    /// Leading zeros omitted; the digits present are the low-order ones.
    #[default]
    SkipLeading,
    /// Trailing zeros omitted; the digits present are the high-order ones.
    SkipTrailing,
    /// The string already carries an explicit decimal point.
    Direct,
}

/// Coordinate notation from %FS (or G90/G91).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Notation {
    #[default]
    Absolute,
    Incremental,
}

/// Unit system from the %MO command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Units {
    #[default]
    Millimeters,
    Inches,
}

impl Units {
    /// Scale factor from file units to mm.
    pub fn to_mm(&self, value: f64) -> f64 {
        match self {
            Units::Millimeters => value,
            Units::Inches => value * 25.4,
        }
    }

    pub fn scale(&self) -> f64 {
        match self {
            Units::Millimeters => 1.0,
            Units::Inches => 25.4,
        }
    }
}

/// Fixed-decimal coordinate format from the %FS command.
///
/// Example: `%FSLAX24Y24*%` means leading-zero suppression, absolute
/// notation, 2 integer digits + 4 decimal digits for both axes. The format
/// is set once per file and every subsequent coordinate integer in the file
/// is decoded against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateFormat {
    pub x_integer: u8,
    pub x_decimal: u8,
    pub y_integer: u8,
    pub y_decimal: u8,
    pub zero_mode: ZeroMode,
    pub notation: Notation,
}

impl Default for CoordinateFormat {
    fn default() -> Self {
        // Common default: 2.4 format (FSLAX24Y24)
        Self {
            x_integer: 2,
            x_decimal: 4,
            y_integer: 2,
            y_decimal: 4,
            zero_mode: ZeroMode::SkipLeading,
            notation: Notation::Absolute,
        }
    }
}

impl CoordinateFormat {
    /// Decode an X-axis coordinate string to file units.
    pub fn parse_x(&self, s: &str) -> Result<f64, String> {
        parse_fixed(s, self.x_integer, self.x_decimal, self.zero_mode)
    }

    /// Decode a Y-axis coordinate string to file units.
    pub fn parse_y(&self, s: &str) -> Result<f64, String> {
        parse_fixed(s, self.y_integer, self.y_decimal, self.zero_mode)
    }

    /// Encode an X-axis value back to a coordinate string.
    pub fn format_x(&self, value: f64) -> String {
        format_fixed(value, self.x_integer, self.x_decimal, self.zero_mode)
    }

    /// Encode a Y-axis value back to a coordinate string.
    pub fn format_y(&self, value: f64) -> String {
        format_fixed(value, self.y_integer, self.y_decimal, self.zero_mode)
    }
}

/// Decode a signed fixed-decimal string under the given digit counts and
/// zero-suppression mode. The result is in file units.
pub fn parse_fixed(s: &str, int_pos: u8, dec_pos: u8, zero_mode: ZeroMode) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty coordinate".into());
    }

    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if zero_mode == ZeroMode::Direct || digits.contains('.') {
        let v: f64 = digits
            .parse()
            .map_err(|_| format!("bad decimal coordinate: {s}"))?;
        return Ok(if negative { -v } else { v });
    }

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad coordinate digits: {s}"));
    }

    let width = (int_pos + dec_pos) as usize;
    let raw: i64 = match zero_mode {
        // Digits are the low-order part; missing leading zeros change nothing.
        ZeroMode::None | ZeroMode::SkipLeading => {
            digits.parse().map_err(|_| format!("coordinate overflow: {s}"))?
        }
        // Digits are the high-order part; restore the suppressed tail.
        ZeroMode::SkipTrailing => {
            let mut padded = digits.to_string();
            while padded.len() < width {
                padded.push('0');
            }
            padded.parse().map_err(|_| format!("coordinate overflow: {s}"))?
        }
        ZeroMode::Direct => unreachable!(),
    };

    let value = raw as f64 / 10f64.powi(dec_pos as i32);
    Ok(if negative { -value } else { value })
}

/// Encode a value as a fixed-decimal coordinate string. Falls back to a
/// plain decimal rendering when the value does not fit the format without
/// losing precision.
pub fn format_fixed(value: f64, int_pos: u8, dec_pos: u8, zero_mode: ZeroMode) -> String {
    if zero_mode == ZeroMode::Direct {
        return trim_decimal(value);
    }

    let factor = 10f64.powi(dec_pos as i32);
    let scaled = value * factor;
    let rounded = scaled.round();
    let width = (int_pos + dec_pos) as usize;

    // Representability: the scaled value must be integral and fit the width.
    if (scaled - rounded).abs() > 1e-6 || rounded.abs() >= 10f64.powi((int_pos + dec_pos) as i32) {
        return trim_decimal(value);
    }

    let raw = rounded as i64;
    let sign = if raw < 0 { "-" } else { "" };
    let digits = format!("{:0width$}", raw.abs(), width = width);

    let body = match zero_mode {
        ZeroMode::None => digits,
        ZeroMode::SkipLeading => {
            let trimmed = digits.trim_start_matches('0');
            if trimmed.is_empty() { "0" } else { trimmed }.to_string()
        }
        ZeroMode::SkipTrailing => {
            let trimmed = digits.trim_end_matches('0');
            if trimmed.is_empty() { "0" } else { trimmed }.to_string()
        }
        ZeroMode::Direct => unreachable!(),
    };

    format!("{sign}{body}")
}

fn trim_decimal(value: f64) -> String {
    let s = format!("{value}");
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{s}.0")
    }
}
