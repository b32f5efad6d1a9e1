//! Incremental tool-marker scanner.
//!
//! Recognizes `<tool name="NAME">BODY</tool>` inside streamed model output.
//! Text that cannot start a marker is released immediately; only a candidate
//! marker (starting at `<`) is held back, and it is bounded by `max_bytes`.
//! Each character is examined once, so cost per increment is proportional to
//! the increment, not to the output so far.

use std::mem;

const OPEN: &str = "<tool name=\"";
const CLOSE: &str = "</tool>";

/// A complete marker found in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    /// Marker body with surrounding whitespace trimmed.
    pub body: String,
    /// Byte offset of the opening `<` within the scanned text.
    pub offset: usize,
    /// The marker exactly as generated.
    pub raw: String,
}

/// Output of one `push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutput {
    /// Plain text, safe to emit.
    Text(String),
    /// A complete marker. Always the last item of a `push`.
    Tool(ToolInvocation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    /// Matched this many bytes of `OPEN`.
    Open(usize),
    Name,
    /// Saw the closing quote, expecting `>`.
    NameEnd,
    /// Inside the body, matched this many bytes of `CLOSE`.
    Body(usize),
}

#[derive(Debug)]
pub struct MarkerScanner {
    state: State,
    held: String,
    name: String,
    held_start: usize,
    position: usize,
    max_bytes: usize,
}

impl MarkerScanner {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            state: State::Text,
            held: String::new(),
            name: String::new(),
            held_start: 0,
            position: 0,
            max_bytes,
        }
    }

    /// Feed the next increment.
    ///
    /// Scanning stops at the first complete marker; the rest of `chunk` is
    /// not consumed.
    pub fn push(&mut self, chunk: &str) -> Vec<ScanOutput> {
        let mut out = Vec::new();
        let mut text = String::new();

        for c in chunk.chars() {
            if let Some(invocation) = self.step(c, &mut text) {
                if !text.is_empty() {
                    out.push(ScanOutput::Text(text));
                }
                out.push(ScanOutput::Tool(invocation));
                return out;
            }
        }

        if !text.is_empty() {
            out.push(ScanOutput::Text(text));
        }
        out
    }

    /// Release any held candidate as plain text at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.state = State::Text;
        self.name.clear();
        let held = mem::take(&mut self.held);
        (!held.is_empty()).then_some(held)
    }

    /// True while a candidate marker is being held back.
    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    fn step(&mut self, c: char, text: &mut String) -> Option<ToolInvocation> {
        let at = self.position;
        self.position += c.len_utf8();

        match self.state {
            State::Text => self.start_or_emit(c, at, text),
            State::Open(matched) => {
                if OPEN[matched..].starts_with(c) {
                    self.held.push(c);
                    let matched = matched + c.len_utf8();
                    self.state = if matched == OPEN.len() {
                        State::Name
                    } else {
                        State::Open(matched)
                    };
                } else {
                    self.reject(c, at, text);
                }
            }
            State::Name => {
                if is_name_char(c) {
                    self.held.push(c);
                    self.name.push(c);
                } else if c == '"' && !self.name.is_empty() {
                    self.held.push(c);
                    self.state = State::NameEnd;
                } else {
                    self.reject(c, at, text);
                }
            }
            State::NameEnd => {
                if c == '>' {
                    self.held.push(c);
                    self.state = State::Body(0);
                } else {
                    self.reject(c, at, text);
                }
            }
            State::Body(matched) => {
                self.held.push(c);
                let matched = if CLOSE[matched..].starts_with(c) {
                    matched + c.len_utf8()
                } else if c == '<' {
                    1
                } else {
                    0
                };
                if matched == CLOSE.len() {
                    return Some(self.complete());
                }
                self.state = State::Body(matched);
            }
        }

        if self.held.len() > self.max_bytes {
            text.push_str(&mem::take(&mut self.held));
            self.name.clear();
            self.state = State::Text;
        }
        None
    }

    fn start_or_emit(&mut self, c: char, at: usize, text: &mut String) {
        if c == '<' {
            self.held.push(c);
            self.held_start = at;
            self.state = State::Open(1);
        } else {
            text.push(c);
        }
    }

    /// Give up on the candidate and rescan `c` as ordinary text.
    fn reject(&mut self, c: char, at: usize, text: &mut String) {
        text.push_str(&mem::take(&mut self.held));
        self.name.clear();
        self.state = State::Text;
        self.start_or_emit(c, at, text);
    }

    fn complete(&mut self) -> ToolInvocation {
        let raw = mem::take(&mut self.held);
        let name = mem::take(&mut self.name);
        let body_start = OPEN.len() + name.len() + "\">".len();
        let body_end = raw.len() - CLOSE.len();
        let body = raw[body_start..body_end].trim().to_string();
        self.state = State::Text;

        ToolInvocation {
            name,
            body,
            offset: self.held_start,
            raw,
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}
