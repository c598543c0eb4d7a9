use std::ops::Range;
use std::sync::Arc;

use ahash::RandomState;
use smallvec::SmallVec;
use std::collections::HashMap;
use thiserror::Error;

use crate::constants::FieldName;

/// Inline capacity of the token spans of a row. Covers every input layout in
/// the catalog without spilling to the heap.
const INLINE_FIELDS: usize = 24;

/// Failure reported by a conversion function.
///
/// `MissingField` and `EmptyField` describe an absent input value and are
/// turned into the null sentinel by the row builder. `Malformed` aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("input field {0} is missing")]
    MissingField(FieldName),

    #[error("input field {0} is empty")]
    EmptyField(FieldName),

    #[error("input field {field} holds {value:?}: {reason}")]
    Malformed {
        field: FieldName,
        value: String,
        reason: String,
    },
}

impl ConversionError {
    /// Whether this failure stands for a null cell rather than bad data.
    pub fn yields_null(&self) -> bool {
        matches!(
            self,
            ConversionError::MissingField(_) | ConversionError::EmptyField(_)
        )
    }
}

/// Declared, positional field names of an input file.
#[derive(Debug)]
pub struct InputSchema {
    fields: Vec<FieldName>,
    positions: HashMap<FieldName, usize, RandomState>,
}

impl InputSchema {
    pub fn new(fields: &[&str]) -> Arc<Self> {
        let positions = fields
            .iter()
            .enumerate()
            .map(|(pos, name)| (name.to_string(), pos))
            .collect();
        Arc::new(InputSchema {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldName] {
        &self.fields
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One interpreted input line.
///
/// The line is kept as a single owned string and each field is a byte span
/// into it, so interpreting a row costs one allocation whatever the field
/// count. Spans are zipped positionally against the [`InputSchema`]: a line
/// with fewer tokens than declared fields leaves the trailing fields missing,
/// extra tokens are ignored.
#[derive(Debug, Clone)]
pub struct InputRow {
    schema: Arc<InputSchema>,
    line: String,
    spans: SmallVec<[Range<usize>; INLINE_FIELDS]>,
}

impl InputRow {
    pub(crate) fn from_spans(
        schema: Arc<InputSchema>,
        line: String,
        spans: SmallVec<[Range<usize>; INLINE_FIELDS]>,
    ) -> Self {
        InputRow {
            schema,
            line,
            spans,
        }
    }

    pub fn schema(&self) -> &Arc<InputSchema> {
        &self.schema
    }

    /// The raw line the row was interpreted from, without terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Number of fields actually present on the line.
    pub fn present(&self) -> usize {
        self.spans.len().min(self.schema.len())
    }

    /// Raw token of `name`, if the field is declared and present.
    pub fn get(&self, name: &str) -> Option<&str> {
        let pos = self.schema.position(name)?;
        self.spans.get(pos).map(|span| &self.line[span.clone()])
    }

    /// Raw token of `name`; a missing field is a [`ConversionError::MissingField`].
    pub fn field(&self, name: &str) -> Result<&str, ConversionError> {
        self.get(name)
            .ok_or_else(|| ConversionError::MissingField(name.to_string()))
    }

    /// Like [`Self::field`] but an empty token is a [`ConversionError::EmptyField`].
    pub fn non_empty(&self, name: &str) -> Result<&str, ConversionError> {
        let raw = self.field(name)?;
        if raw.trim().is_empty() {
            return Err(ConversionError::EmptyField(name.to_string()));
        }
        Ok(raw)
    }

    /// Parse the token of `name` as a float.
    pub fn parse_f64(&self, name: &str) -> Result<f64, ConversionError> {
        let raw = self.non_empty(name)?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| ConversionError::Malformed {
                field: name.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Iterate over `(field name, raw token)` pairs of the present fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .fields()
            .iter()
            .zip(self.spans.iter())
            .map(|(name, span)| (name.as_str(), &self.line[span.clone()]))
    }
}

#[cfg(test)]
mod input_row_test {
    use super::*;
    use smallvec::smallvec;

    fn row(line: &str, spans: SmallVec<[Range<usize>; INLINE_FIELDS]>) -> InputRow {
        InputRow::from_spans(
            InputSchema::new(&["ObjID", "AstRA(deg)", "AstDec(deg)"]),
            line.to_string(),
            spans,
        )
    }

    #[test]
    fn test_field_lookup() {
        let r = row("S1,50.0,", smallvec![0..2, 3..7, 8..8]);
        assert_eq!(r.field("ObjID"), Ok("S1"));
        assert_eq!(r.get("AstRA(deg)"), Some("50.0"));
        assert_eq!(
            r.non_empty("AstDec(deg)"),
            Err(ConversionError::EmptyField("AstDec(deg)".into()))
        );
        assert_eq!(
            r.field("V"),
            Err(ConversionError::MissingField("V".into()))
        );
    }

    #[test]
    fn test_short_line_leaves_trailing_fields_missing() {
        let r = row("S1", smallvec![0..2]);
        assert_eq!(r.present(), 1);
        assert!(matches!(
            r.parse_f64("AstRA(deg)"),
            Err(ConversionError::MissingField(_))
        ));
    }

    #[test]
    fn test_parse_f64_malformed() {
        let r = row("S1,abc,1", smallvec![0..2, 3..6, 7..8]);
        let err = r.parse_f64("AstRA(deg)").unwrap_err();
        assert!(!err.yields_null());
        assert_eq!(r.parse_f64("AstDec(deg)"), Ok(1.0));
    }
}
