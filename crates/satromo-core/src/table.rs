//! Line-oriented record files with a header row.
//!
//! Every durable store in this crate (running jobs, completed jobs, product
//! status, empty-date markers) is a small comma-separated file that is read
//! whole, changed in memory and rewritten atomically. Fields containing a
//! comma, a double quote or a line break are quoted, with inner quotes
//! doubled. Columns are matched by header name, so files written by older
//! tooling with extra or reordered columns still load.

use crate::error::{Result, SatromoError};
use std::borrow::Cow;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RecordTable {
    /// An empty table with the given columns.
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Load `path` and project its rows onto `header`.
    ///
    /// A missing or empty file yields an empty table. A file lacking one of
    /// the requested columns, or holding a row shorter than its own header,
    /// is rejected rather than silently truncated.
    pub fn load(path: &Path, header: &[&str]) -> Result<Self> {
        let mut table = Self::new(header);
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(table),
            Err(e) => return Err(e.into()),
        };

        let records = parse_records(&text).map_err(|(line, reason)| {
            SatromoError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                reason,
            }
        })?;

        let mut records = records.into_iter();
        let Some((_, file_header)) = records.next() else {
            return Ok(table);
        };

        let mut projection = Vec::with_capacity(header.len());
        for column in header {
            let idx = file_header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| SatromoError::MalformedRecord {
                    path: path.to_path_buf(),
                    line: 1,
                    reason: format!("missing column '{column}'"),
                })?;
            projection.push(idx);
        }

        for (line, fields) in records {
            if fields.len() < file_header.len() {
                return Err(SatromoError::MalformedRecord {
                    path: path.to_path_buf(),
                    line,
                    reason: format!(
                        "expected {} fields, found {}",
                        file_header.len(),
                        fields.len()
                    ),
                });
            }
            table.rows.push(
                projection
                    .iter()
                    .map(|&i| fields[i].clone())
                    .collect(),
            );
        }
        Ok(table)
    }

    /// Rewrite the whole file atomically, header first.
    pub fn save(&self, path: &Path) -> Result<()> {
        crate::io::atomic_write(path, self.render().as_bytes())
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        push_row(&mut out, &self.header);
        for row in &self.rows {
            push_row(&mut out, row);
        }
        out
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Vec<String>> {
        &mut self.rows
    }

    pub fn push(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn push_row(out: &mut String, fields: &[String]) {
    let line: Vec<Cow<'_, str>> = fields.iter().map(|f| quote_field(f)).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) || field.trim() != field {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split `text` into records, returning each with its 1-based starting line.
/// Blank lines outside quotes are skipped. Unquoted fields are trimmed;
/// quoted fields are kept verbatim.
fn parse_records(text: &str) -> std::result::Result<Vec<(usize, Vec<String>)>, (usize, String)> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let mut record_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quoted = true;
                record_started = true;
            }
            '"' if quoted => return Err((line, "unexpected quote after closing quote".into())),
            '"' => return Err((line, "unexpected quote inside unquoted field".into())),
            ',' => {
                fields.push(finish_field(&mut field, &mut quoted));
                record_started = true;
            }
            '\r' => {}
            '\n' => {
                if record_started || !field.trim().is_empty() {
                    fields.push(finish_field(&mut field, &mut quoted));
                    records.push((record_line, std::mem::take(&mut fields)));
                }
                field.clear();
                quoted = false;
                record_started = false;
                line += 1;
                record_line = line;
            }
            c if quoted => {
                if !c.is_whitespace() {
                    return Err((line, "unexpected text after closing quote".into()));
                }
            }
            _ => {
                field.push(c);
                if !c.is_whitespace() {
                    record_started = true;
                }
            }
        }
    }

    if in_quotes {
        return Err((record_line, "unterminated quoted field".into()));
    }
    if record_started || !field.trim().is_empty() {
        fields.push(finish_field(&mut field, &mut quoted));
        records.push((record_line, fields));
    }
    Ok(records)
}

fn finish_field(field: &mut String, quoted: &mut bool) -> String {
    let text = std::mem::take(field);
    if std::mem::replace(quoted, false) {
        text
    } else {
        text.trim().to_string()
    }
}
