//! # Row interpretation
//!
//! A [`RowInterpreter`] turns one raw input line into an [`InputRow`]. It never
//! type-converts: tokens are passed through unchanged and the conversion
//! functions do the parsing.
//!
//! Strategies
//! -----------------
//! * [`Delimiter::Comma`]: split on `,`, empty tokens are kept.
//! * [`Delimiter::Whitespace`]: split on runs of whitespace.
//! * [`GluedField`]: some simulation outputs print two fixed-width columns
//!   without a separator. When a whitespace-split line is exactly one token
//!   short, the token at the glued position is cut at the known width into two
//!   fields.
use std::ops::Range;
use std::sync::Arc;

use smallvec::SmallVec;

use super::input_row::{InputRow, InputSchema};

pub trait RowInterpreter: Send + Sync {
    /// The declared field names rows are zipped against.
    fn input_schema(&self) -> &Arc<InputSchema>;

    /// Interpret one line, already stripped of its terminator.
    fn interpret(&self, line: String) -> InputRow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Whitespace,
}

/// Two fields printed back to back at a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GluedField {
    /// Position of the first of the two fields in the input schema.
    pub index: usize,
    /// Byte width of the first field.
    pub width: usize,
}

/// Positional interpreter for delimiter-separated lines.
#[derive(Debug, Clone)]
pub struct DelimitedInterpreter {
    schema: Arc<InputSchema>,
    delimiter: Delimiter,
    glued: Option<GluedField>,
}

impl DelimitedInterpreter {
    pub fn new(fields: &[&str], delimiter: Delimiter) -> Self {
        DelimitedInterpreter {
            schema: InputSchema::new(fields),
            delimiter,
            glued: None,
        }
    }

    /// Whitespace-split lines whose fields at `index` and `index + 1` may be glued.
    pub fn with_glued_field(mut self, glued: GluedField) -> Self {
        self.glued = Some(glued);
        self
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    fn spans(&self, line: &str) -> SmallVec<[Range<usize>; 24]> {
        let mut spans: SmallVec<[Range<usize>; 24]> = match self.delimiter {
            Delimiter::Comma => comma_spans(line),
            Delimiter::Whitespace => whitespace_spans(line),
        };

        if let Some(glued) = self.glued {
            if spans.len() + 1 == self.schema.len() {
                split_glued(line, &mut spans, glued);
            }
        }
        spans
    }
}

impl RowInterpreter for DelimitedInterpreter {
    fn input_schema(&self) -> &Arc<InputSchema> {
        &self.schema
    }

    fn interpret(&self, line: String) -> InputRow {
        let spans = self.spans(&line);
        InputRow::from_spans(self.schema.clone(), line, spans)
    }
}

fn comma_spans(line: &str) -> SmallVec<[Range<usize>; 24]> {
    let mut spans = SmallVec::new();
    let mut start = 0;
    for (pos, _) in line.match_indices(',') {
        spans.push(start..pos);
        start = pos + 1;
    }
    spans.push(start..line.len());
    spans
}

fn whitespace_spans(line: &str) -> SmallVec<[Range<usize>; 24]> {
    let mut spans = SmallVec::new();
    let mut start: Option<usize> = None;
    for (pos, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..pos);
                start = None;
            }
            (false, None) => start = Some(pos),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..line.len());
    }
    spans
}

fn split_glued(line: &str, spans: &mut SmallVec<[Range<usize>; 24]>, glued: GluedField) {
    let Some(token) = spans.get(glued.index).cloned() else {
        return;
    };
    let cut = token.start + glued.width;
    if cut >= token.end || !line.is_char_boundary(cut) {
        return;
    }
    spans[glued.index] = token.start..cut;
    spans.insert(glued.index + 1, cut..token.end);
}
