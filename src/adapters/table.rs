//! Tab-separated table access shared by the tracker adapters
//!
//! Every tracker export is a headed TSV table. [`TsvReader`] resolves column
//! names once and hands out [`Row`]s whose typed getters turn malformed cells
//! into [`GazeError::ParseError`]s carrying the line number.

use crate::error::GazeError;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;

/// Layout options of a tracker table
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TableFormat {
    /// Lines starting with `#` are ignored
    pub comments: bool,
    /// Lines to drop before the header line
    pub preamble_lines: usize,
}

/// Resolved position of a named column
#[derive(Debug, Clone)]
pub(crate) struct Column {
    name: String,
    index: usize,
}

pub(crate) struct TsvReader<'a> {
    source_name: &'a str,
    line_offset: u64,
    columns: HashMap<String, usize>,
    reader: csv::Reader<&'a [u8]>,
}

impl<'a> TsvReader<'a> {
    pub fn new(source_name: &'a str, raw: &'a str, format: TableFormat) -> Result<Self, GazeError> {
        let body = skip_lines(raw, format.preamble_lines);
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .comment(format.comments.then_some(b'#'))
            .from_reader(body.as_bytes());

        let columns = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect();

        Ok(Self {
            source_name,
            line_offset: format.preamble_lines as u64,
            columns,
            reader,
        })
    }

    /// Resolve a column the table must carry
    pub fn column(&self, name: &str) -> Result<Column, GazeError> {
        self.optional_column(name)
            .ok_or_else(|| GazeError::MissingColumn {
                source_name: self.source_name.to_string(),
                column: name.to_string(),
            })
    }

    pub fn optional_column(&self, name: &str) -> Option<Column> {
        self.columns.get(name).map(|&index| Column {
            name: name.to_string(),
            index,
        })
    }

    pub fn rows(&mut self) -> impl Iterator<Item = Result<Row<'a>, GazeError>> + '_ {
        let source_name = self.source_name;
        let line_offset = self.line_offset;
        self.reader.records().map(move |record| {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line()) + line_offset;
            Ok(Row {
                source_name,
                line,
                record,
            })
        })
    }
}

/// One data row of a tracker table
#[derive(Debug)]
pub(crate) struct Row<'a> {
    source_name: &'a str,
    line: u64,
    record: StringRecord,
}

impl<'a> Row<'a> {
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Non-empty cell text
    pub fn text(&self, column: &Column) -> Option<&str> {
        self.record
            .get(column.index)
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
    }

    pub fn text_or_empty(&self, column: Option<&Column>) -> String {
        column
            .and_then(|c| self.text(c))
            .unwrap_or_default()
            .to_string()
    }

    pub fn float(&self, column: &Column) -> Result<Option<f64>, GazeError> {
        match self.text(column) {
            None => Ok(None),
            Some(cell) => match cell.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Some(value)),
                _ => Err(self.invalid(column, "number", cell)),
            },
        }
    }

    /// Integer cell; float cells are truncated toward zero
    pub fn int(&self, column: &Column) -> Result<Option<i64>, GazeError> {
        match self.text(column) {
            None => Ok(None),
            Some(cell) => {
                if let Ok(value) = cell.parse::<i64>() {
                    return Ok(Some(value));
                }
                match cell.parse::<f64>() {
                    Ok(value) if value.is_finite() => Ok(Some(value.trunc() as i64)),
                    _ => Err(self.invalid(column, "integer", cell)),
                }
            }
        }
    }

    pub fn require_float(&self, column: &Column) -> Result<f64, GazeError> {
        self.float(column)?.ok_or_else(|| self.missing(column))
    }

    pub fn require_int(&self, column: &Column) -> Result<i64, GazeError> {
        self.int(column)?.ok_or_else(|| self.missing(column))
    }

    pub fn optional_float(&self, column: Option<&Column>) -> Result<Option<f64>, GazeError> {
        column.map_or(Ok(None), |c| self.float(c))
    }

    pub fn optional_int(&self, column: Option<&Column>) -> Result<Option<i64>, GazeError> {
        column.map_or(Ok(None), |c| self.int(c))
    }

    fn invalid(&self, column: &Column, expected: &str, cell: &str) -> GazeError {
        GazeError::parse(
            self.source_name,
            self.line,
            format!("invalid {} '{}' in column '{}'", expected, cell, column.name),
        )
    }

    fn missing(&self, column: &Column) -> GazeError {
        GazeError::parse(
            self.source_name,
            self.line,
            format!("missing value in column '{}'", column.name),
        )
    }
}

/// Drop the first `count` lines of a text
pub(crate) fn skip_lines(raw: &str, count: usize) -> &str {
    let mut rest = raw;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Guard for sample streams whose timestamps must never go backwards
#[derive(Debug, Default)]
pub(crate) struct MonotonicClock {
    last: Option<i64>,
}

impl MonotonicClock {
    pub fn check(&mut self, row: &Row<'_>, timestamp: i64) -> Result<(), GazeError> {
        if let Some(last) = self.last {
            if timestamp < last {
                return Err(GazeError::parse(
                    row.source_name,
                    row.line,
                    format!("timestamp {} decreases (previous {})", timestamp, last),
                ));
            }
        }
        self.last = Some(timestamp);
        Ok(())
    }
}
