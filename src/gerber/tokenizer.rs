//! Command framing for the Gerber byte stream.
//!
//! Splits input into discrete command records without validating grammar.
//! `*` terminates ordinary word commands; `%` brackets extended blocks, which
//! may legally chain several `*`-separated sub-commands; each is re-emitted
//! as its own record, except `AM` macro definitions whose body lines stay
//! together as one record. `\uXXXX` escapes are expanded inline, and a
//! partial escape at the end of a chunk is held over until the next feed.

/// One framed command, with the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub text: String,
    pub line: u32,
    /// True when the command came from a `%…%` extended block.
    pub advanced: bool,
}

/// Incremental tokenizer; callers may feed the input in arbitrary chunks.
#[derive(Debug)]
pub struct GerberTokenizer {
    buf: String,
    line: u32,
    cmd_line: u32,
    in_advanced: bool,
    block_line: u32,
    parts: Vec<String>,
    escape: Vec<char>,
}

impl Default for GerberTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GerberTokenizer {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            line: 1,
            cmd_line: 1,
            in_advanced: false,
            block_line: 1,
            parts: Vec::new(),
            escape: Vec::new(),
        }
    }

    /// Consume a chunk of input, emitting each completed command to `sink`.
    pub fn feed(&mut self, chunk: &str, sink: &mut impl FnMut(RawCommand)) {
        for ch in chunk.chars() {
            if !self.escape.is_empty() {
                self.escape.push(ch);
                if self.escape.len() == 2 && ch != 'u' {
                    self.flush_escape(sink);
                } else if self.escape.len() == 6 {
                    let hex: String = self.escape[2..].iter().collect();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(c) => {
                            self.escape.clear();
                            self.consume(c, sink);
                        }
                        None => self.flush_escape(sink),
                    }
                }
                continue;
            }
            if ch == '\\' {
                self.escape.push(ch);
                continue;
            }
            self.consume(ch, sink);
        }
    }

    /// Flush any trailing state at end of input. Unterminated commands are
    /// dropped; a dangling escape is emitted literally first.
    pub fn finish(mut self, sink: &mut impl FnMut(RawCommand)) {
        self.flush_escape(sink);
        if self.in_advanced {
            if !self.buf.trim().is_empty() {
                let part = std::mem::take(&mut self.buf);
                self.parts.push(part.trim().to_string());
            }
            self.flush_advanced(sink);
        }
    }

    /// A held escape turned out not to be one: replay its characters.
    fn flush_escape(&mut self, sink: &mut impl FnMut(RawCommand)) {
        let pending = std::mem::take(&mut self.escape);
        for c in pending {
            self.consume(c, sink);
        }
    }

    fn consume(&mut self, ch: char, sink: &mut impl FnMut(RawCommand)) {
        match ch {
            '\n' => self.line += 1,
            '\r' | '\t' => {}
            '%' => {
                if self.in_advanced {
                    if !self.buf.trim().is_empty() {
                        let part = std::mem::take(&mut self.buf);
                        self.parts.push(part.trim().to_string());
                    }
                    self.buf.clear();
                    self.flush_advanced(sink);
                    self.in_advanced = false;
                } else {
                    self.in_advanced = true;
                    self.block_line = self.line;
                    self.parts.clear();
                    self.buf.clear();
                }
            }
            '*' => {
                let text = std::mem::take(&mut self.buf);
                let text = text.trim();
                if self.in_advanced {
                    if !text.is_empty() {
                        self.parts.push(text.to_string());
                    }
                } else if !text.is_empty() {
                    emit_word(text, self.cmd_line, sink);
                }
            }
            c => {
                if self.buf.is_empty() {
                    self.cmd_line = self.line;
                }
                self.buf.push(c);
            }
        }
    }

    fn flush_advanced(&mut self, sink: &mut impl FnMut(RawCommand)) {
        let parts = std::mem::take(&mut self.parts);
        if parts.is_empty() {
            return;
        }
        if parts[0].starts_with("AM") {
            // A macro definition owns every sub-command in its block.
            sink(RawCommand {
                text: parts.join("*"),
                line: self.block_line,
                advanced: true,
            });
        } else {
            for part in parts {
                sink(RawCommand {
                    text: part,
                    line: self.block_line,
                    advanced: true,
                });
            }
        }
    }
}

/// Tokenize a complete input string.
pub fn tokenize(content: &str) -> Vec<RawCommand> {
    let mut out = Vec::new();
    let mut tokenizer = GerberTokenizer::new();
    tokenizer.feed(content, &mut |cmd| out.push(cmd));
    tokenizer.finish(&mut |cmd| out.push(cmd));
    out
}

/// Emit a word command, splitting a compound `G..` + operation word and
/// canonicalizing coordinate order.
fn emit_word(text: &str, line: u32, sink: &mut impl FnMut(RawCommand)) {
    // G04 comment text may legitimately contain a D; never split it.
    if is_comment(text) {
        sink(RawCommand {
            text: text.to_string(),
            line,
            advanced: false,
        });
        return;
    }

    let mut rest = text;
    if let Some(stripped) = rest.strip_prefix('G') {
        let digits = stripped
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 && digits < stripped.len() {
            sink(RawCommand {
                text: format!("G{}", &stripped[..digits]),
                line,
                advanced: false,
            });
            rest = &stripped[digits..];
        }
    }

    let canonical = canonicalize_axes(rest).unwrap_or_else(|| rest.to_string());
    sink(RawCommand {
        text: canonical,
        line,
        advanced: false,
    });
}

fn is_comment(s: &str) -> bool {
    if let Some(rest) = s.strip_prefix("G0") {
        return rest.starts_with('4');
    }
    s.strip_prefix("G4")
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Rewrite a coordinate word into X,Y,I,J,D order, keeping the original
/// digit strings intact. Returns None when the word is not a plain
/// coordinate/operation word.
fn canonicalize_axes(s: &str) -> Option<String> {
    let mut x = None;
    let mut y = None;
    let mut i = None;
    let mut j = None;
    let mut d = None;

    let bytes = s.as_bytes();
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
        let value = &s[start..pos];
        let slot = match key {
            b'X' => &mut x,
            b'Y' => &mut y,
            b'I' => &mut i,
            b'J' => &mut j,
            b'D' => &mut d,
            _ => return None,
        };
        if slot.is_some() || value.is_empty() {
            return None;
        }
        *slot = Some(value);
    }

    if x.is_none() && y.is_none() && i.is_none() && j.is_none() && d.is_none() {
        return None;
    }

    let mut out = String::with_capacity(s.len());
    for (key, value) in [("X", x), ("Y", y), ("I", i), ("J", j), ("D", d)] {
        if let Some(v) = value {
            out.push_str(key);
            out.push_str(v);
        }
    }
    Some(out)
}
