//! # Streaming row builder
//!
//! Drives interpretation and conversion over a window of input rows.
//!
//! The builder yields one [`LazyRow`] per accepted input row, and a
//! [`LazyRow`] yields its cells one at a time in schema order. Nothing is
//! computed before it is pulled: a consumer that stops after the index columns
//! never runs the conversions of the remaining columns.
//!
//! Termination
//! -----------------
//! The sequence ends at the end of input, after `skip_rows + stop_after`
//! lines, or at the first line that is exactly `"\n"`, whichever comes first.
//! The window is applied before the newline check, so a skipped bare newline
//! does not stop the run. An undecodable line yields one
//! [`SsTableError::InvalidEncoding`] naming the file and line, then the
//! sequence ends.
//!
//! The builder is not rewindable: restarting means supplying a fresh line
//! iterator.
use std::iter::{Skip, Take};
use std::sync::Arc;

use camino::Utf8Path;

use super::input_row::InputRow;
use super::interpreter::RowInterpreter;
use crate::schema::{Cell, ResolvedRegistry};
use crate::ssfiletable_errors::SsTableError;

/// `skip_rows` / `stop_after` window over an input sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowWindow {
    pub skip_rows: usize,
    pub stop_after: Option<usize>,
}

impl RowWindow {
    pub fn new(skip_rows: usize, stop_after: Option<usize>) -> Self {
        RowWindow {
            skip_rows,
            stop_after,
        }
    }

    pub fn apply<I: Iterator>(&self, iter: I) -> Take<Skip<I>> {
        iter.skip(self.skip_rows)
            .take(self.stop_after.unwrap_or(usize::MAX))
    }
}

/// One raw line of an input file, terminator included.
#[derive(Debug, Clone, Copy)]
pub struct SourceLine<'a> {
    pub source: &'a Utf8Path,
    /// 1-based line number within `source`.
    pub number: usize,
    pub bytes: &'a [u8],
}

/// Splits a byte buffer into lines by scanning for `\n`. No copy is made.
pub struct MappedLines<'a> {
    source: &'a Utf8Path,
    data: &'a [u8],
    pos: usize,
    number: usize,
}

impl<'a> MappedLines<'a> {
    pub fn new(source: &'a Utf8Path, data: &'a [u8]) -> Self {
        MappedLines {
            source,
            data,
            pos: 0,
            number: 0,
        }
    }
}

impl<'a> Iterator for MappedLines<'a> {
    type Item = SourceLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        self.pos += len;
        self.number += 1;
        Some(SourceLine {
            source: self.source,
            number: self.number,
            bytes: &rest[..len],
        })
    }
}

/// The cells of one output row, computed on demand in schema order.
pub struct LazyRow<R> {
    registry: Arc<ResolvedRegistry<R>>,
    input: R,
    next: usize,
}

impl<R> LazyRow<R> {
    pub fn new(registry: Arc<ResolvedRegistry<R>>, input: R) -> Self {
        LazyRow {
            registry,
            input,
            next: 0,
        }
    }

    pub fn input(&self) -> &R {
        &self.input
    }
}

impl<R> Iterator for LazyRow<R> {
    type Item = Result<Cell<String>, SsTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.registry.len() {
            return None;
        }
        let cell = self.registry.convert(self.next, &self.input);
        self.next += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.registry.len() - self.next;
        (left, Some(left))
    }
}

impl<R> ExactSizeIterator for LazyRow<R> {}

/// Rows built from raw input lines. See [`RowBuilder::build_lines`].
pub struct LineRows<'a, I: Iterator<Item = SourceLine<'a>>> {
    interpreter: &'a dyn RowInterpreter,
    registry: Arc<ResolvedRegistry<InputRow>>,
    lines: Take<Skip<I>>,
    done: bool,
}

impl<'a, I: Iterator<Item = SourceLine<'a>>> Iterator for LineRows<'a, I> {
    type Item = Result<LazyRow<InputRow>, SsTableError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let line = self.lines.next()?;
        if line.bytes == b"\n" {
            self.done = true;
            return None;
        }

        let text = match std::str::from_utf8(line.bytes) {
            Ok(text) => text,
            Err(_) => {
                self.done = true;
                return Some(Err(SsTableError::InvalidEncoding {
                    path: line.source.to_owned(),
                    line: line.number,
                }));
            }
        };
        let text = text.strip_suffix('\n').unwrap_or(text);
        let text = text.strip_suffix('\r').unwrap_or(text);

        let row = self.interpreter.interpret(text.to_string());
        Some(Ok(LazyRow::new(self.registry.clone(), row)))
    }
}

/// Pairs a resolved registry with a row window.
pub struct RowBuilder<R> {
    registry: Arc<ResolvedRegistry<R>>,
    window: RowWindow,
}

impl<R> RowBuilder<R> {
    pub fn new(registry: ResolvedRegistry<R>, window: RowWindow) -> Self {
        RowBuilder {
            registry: Arc::new(registry),
            window,
        }
    }

    pub fn registry(&self) -> &Arc<ResolvedRegistry<R>> {
        &self.registry
    }

    /// Rows from already-interpreted inputs, windowed.
    ///
    /// Skipped inputs are still pulled from `inputs`; callers with expensive
    /// inputs should window the cheap upstream sequence instead.
    pub fn build<I>(&self, inputs: I) -> impl Iterator<Item = Result<LazyRow<R>, SsTableError>>
    where
        I: Iterator<Item = Result<R, SsTableError>>,
    {
        let registry = self.registry.clone();
        self.window
            .apply(inputs)
            .map(move |input| input.map(|input| LazyRow::new(registry.clone(), input)))
    }
}

impl RowBuilder<InputRow> {
    /// Rows from raw lines, interpreted with `interpreter`.
    pub fn build_lines<'a, I>(&self, interpreter: &'a dyn RowInterpreter, lines: I) -> LineRows<'a, I>
    where
        I: Iterator<Item = SourceLine<'a>>,
    {
        LineRows {
            interpreter,
            registry: self.registry.clone(),
            lines: self.window.apply(lines),
            done: false,
        }
    }
}

/// Convenience over [`RowBuilder::build_lines`].
pub fn build_rows<'a, I>(
    interpreter: &'a dyn RowInterpreter,
    registry: ResolvedRegistry<InputRow>,
    lines: I,
    window: RowWindow,
) -> LineRows<'a, I>
where
    I: Iterator<Item = SourceLine<'a>>,
{
    RowBuilder::new(registry, window).build_lines(interpreter, lines)
}
