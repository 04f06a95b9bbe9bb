//! Header-addressed CSV reading shared by the file formats.

use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::{ParseError, ParsedFile, ParsedRow};

/// One data row, addressed by lower-cased header name.
pub(crate) struct CsvRow<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a StringRecord,
}

impl CsvRow<'_> {
    /// Trimmed cell value; blank cells and absent columns are `None`.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = *self.columns.get(column)?;
        self.record.get(idx).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn required(&self, column: &str) -> Result<&str, String> {
        self.get(column).ok_or_else(|| format!("{column} is required"))
    }

    pub fn integer(&self, column: &str) -> Result<Option<i64>, String> {
        self.get(column)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| format!("{column} must be an integer, got {v:?}"))
            })
            .transpose()
    }

    pub fn non_negative(&self, column: &str) -> Result<Option<i64>, String> {
        match self.integer(column)? {
            Some(v) if v < 0 => Err(format!("{column} cannot be negative")),
            other => Ok(other),
        }
    }
}

/// Parse `data` as headed CSV and run `parse_row` over every data row.
///
/// A header lacking any of `required` fails every row with the same message
/// instead of aborting the file.
pub(crate) fn parse_csv<R>(
    data: &[u8],
    required: &[&str],
    mut parse_row: impl FnMut(&CsvRow<'_>) -> Result<R, String>,
) -> ParsedFile<R> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let mut out = ParsedFile {
        rows: Vec::new(),
        errors: Vec::new(),
    };

    let columns: HashMap<String, usize> = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), i))
            .collect(),
        Err(e) => {
            out.errors.push(ParseError::new(0, format!("unreadable header: {e}")));
            return out;
        }
    };

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|c| !columns.contains_key(*c))
        .collect();
    let missing_message = (!missing.is_empty())
        .then(|| format!("missing required column(s): {}", missing.join(", ")));

    let mut record = StringRecord::new();
    let mut row = 0u32;
    loop {
        row += 1;
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => {
                out.errors.push(ParseError::new(row, format!("malformed row: {e}")));
                // A non-recoverable reader state (e.g. I/O) would loop forever.
                if !matches!(e.kind(), csv::ErrorKind::Utf8 { .. } | csv::ErrorKind::UnequalLengths { .. }) {
                    break;
                }
                continue;
            }
        }

        if let Some(message) = &missing_message {
            out.errors.push(ParseError::new(row, message.clone()));
            continue;
        }

        let view = CsvRow {
            columns: &columns,
            record: &record,
        };
        match parse_row(&view) {
            Ok(value) => out.rows.push(ParsedRow { row, value }),
            Err(message) => out.errors.push(ParseError::new(row, message)),
        }
    }

    out
}
