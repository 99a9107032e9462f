//! CSV file source.
//!
//! The first row is the header; every value is text. A row is kept when the
//! first whitespace-separated token of its date column equals the execution
//! date, so `2024-12-01 10:00:00` and `2024-12-01` both match `2024-12-01`.

use super::{RecordStream, Source};
use async_trait::async_trait;
use csv::{ByteRecord, ReaderBuilder};
use ingest2parquet_core::{ExecutionDate, IngestError, Record, Result, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const UTF8_BOM: char = '\u{feff}';

/// Supported input encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Resolve an encoding name as written in config files.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" | "utf-8-sig" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            _ => Err(IngestError::config(format!(
                "Unsupported encoding: {}. Supported: utf-8, latin-1, ascii",
                name
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }

    /// Decode one field. The error is a human-readable reason.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<String, String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| e.to_string()),
            // Latin-1 maps every byte to the code point of the same value.
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
                Some(offset) => Err(format!(
                    "byte 0x{:02x} at offset {} is not ASCII",
                    bytes[offset], offset
                )),
            },
        }
    }
}

/// Reads one CSV file and filters its rows by execution date.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    date_column: String,
    encoding: Encoding,
}

impl CsvSource {
    pub fn new(path: impl AsRef<Path>, date_column: &str, encoding: &str) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            date_column: date_column.to_string(),
            encoding: Encoding::from_name(encoding)?,
        })
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(IngestError::not_found("CSV file", self.display_path()))
        }
    }

    fn decode_error(&self, line: Option<u64>, reason: impl std::fmt::Display) -> IngestError {
        let reason = match line {
            Some(line) => format!("line {}: {}", line, reason),
            None => reason.to_string(),
        };
        IngestError::decode(self.display_path(), self.encoding.as_str(), reason)
    }

    /// Open the file and decode its header row.
    fn rows(&self, date: &ExecutionDate) -> Result<CsvRows> {
        self.ensure_exists()?;

        let file = File::open(&self.path).map_err(|e| {
            IngestError::not_found("CSV file", format!("{} ({})", self.display_path(), e))
        })?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let raw_headers = reader
            .byte_headers()
            .map_err(|e| self.decode_error(e.position().map(|p| p.line()), &e))?
            .clone();

        let mut headers = Vec::with_capacity(raw_headers.len());
        for (idx, field) in raw_headers.iter().enumerate() {
            let mut name = self
                .encoding
                .decode(field)
                .map_err(|reason| self.decode_error(Some(1), reason))?;
            if idx == 0 {
                if let Some(stripped) = name.strip_prefix(UTF8_BOM) {
                    name = stripped.to_string();
                }
            }
            headers.push(name);
        }

        let date_column = headers
            .iter()
            .any(|h| h == &self.date_column)
            .then(|| self.date_column.clone());
        if date_column.is_none() {
            debug!(
                column = %self.date_column,
                "Date column missing from CSV header; no rows will match"
            );
        }

        Ok(CsvRows {
            source_path: self.display_path(),
            encoding: self.encoding,
            reader,
            headers,
            date_column,
            date: date.as_str().to_string(),
            record: ByteRecord::new(),
            kept: 0,
            skipped: 0,
            done: false,
        })
    }
}

#[async_trait]
impl Source for CsvSource {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    async fn open(&mut self) -> Result<()> {
        self.ensure_exists()
    }

    async fn extract<'a>(&'a mut self, date: &ExecutionDate) -> Result<RecordStream<'a>> {
        info!(
            "Reading CSV file {} for {} (encoding: {})",
            self.path.display(),
            date,
            self.encoding.as_str()
        );
        let rows = self.rows(date)?;
        Ok(Box::pin(futures::stream::iter(rows)))
    }
}

/// Lazy row iterator over an open CSV reader.
struct CsvRows {
    source_path: String,
    encoding: Encoding,
    reader: csv::Reader<File>,
    headers: Vec<String>,
    /// `None` when the header lacks the date column
    date_column: Option<String>,
    date: String,
    record: ByteRecord,
    kept: usize,
    skipped: usize,
    done: bool,
}

impl CsvRows {
    fn fail(&mut self, line: Option<u64>, reason: impl std::fmt::Display) -> IngestError {
        self.done = true;
        let reason = match line {
            Some(line) => format!("line {}: {}", line, reason),
            None => reason.to_string(),
        };
        IngestError::decode(self.source_path.clone(), self.encoding.as_str(), reason)
    }

    /// First whitespace token of the row's date value equals the execution date.
    fn matches_date(&self, row: &Record) -> bool {
        let Some(column) = self.date_column.as_deref() else {
            return false;
        };
        match row.get(column) {
            Some(Value::Text(text)) => text.split_whitespace().next() == Some(self.date.as_str()),
            _ => false,
        }
    }

    fn decode_row(&self, line: Option<u64>) -> std::result::Result<Record, (Option<u64>, String)> {
        let mut row = Record::with_capacity(self.headers.len());
        for (idx, header) in self.headers.iter().enumerate() {
            let value = match self.record.get(idx) {
                Some(raw) => Value::Text(self.encoding.decode(raw).map_err(|reason| (line, reason))?),
                None => Value::Null,
            };
            row.insert(header.as_str(), value);
        }
        Ok(row)
    }
}

impl Iterator for CsvRows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    debug!(
                        kept = self.kept,
                        skipped = self.skipped,
                        "Finished reading {}",
                        self.source_path
                    );
                    return None;
                }
                Err(e) => {
                    let line = e.position().map(|p| p.line());
                    return Some(Err(self.fail(line, e)));
                }
            }

            // Decode before filtering; bad bytes fail on any row
            let line = self.record.position().map(|p| p.line());
            let row = match self.decode_row(line) {
                Ok(row) => row,
                Err((line, reason)) => return Some(Err(self.fail(line, reason))),
            };

            if self.matches_date(&row) {
                self.kept += 1;
                return Some(Ok(row));
            }
            self.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;

    fn write_csv(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    async fn extract(file: &tempfile::NamedTempFile, date: &str, encoding: &str) -> Result<Vec<Record>> {
        let mut source = CsvSource::new(file.path(), "created_at", encoding)?;
        let date = ingest2parquet_core::validate_date(date)?;
        let stream = source.extract(&date).await?;
        stream.try_collect().await
    }

    #[test]
    fn encoding_names_and_aliases() {
        assert_eq!(Encoding::from_name("UTF-8").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_name("utf-8-sig").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_name("ISO-8859-1").unwrap(), Encoding::Latin1);
        assert_eq!(Encoding::from_name("latin1").unwrap(), Encoding::Latin1);
        assert_eq!(Encoding::from_name("ascii").unwrap(), Encoding::Ascii);
        assert!(matches!(
            Encoding::from_name("cp1252"),
            Err(IngestError::Config { .. })
        ));
    }

    #[test]
    fn latin1_decodes_every_byte() {
        assert_eq!(Encoding::Latin1.decode(b"caf\xe9").unwrap(), "café");
        assert!(Encoding::Utf8.decode(b"caf\xe9").is_err());
        assert!(Encoding::Ascii.decode(b"caf\xe9").unwrap_err().contains("offset 3"));
    }

    #[tokio::test]
    async fn filters_rows_by_date_prefix() {
        let file = write_csv(
            b"id,name,created_at\n\
              1,alice,2024-12-01 10:00:00\n\
              2,bob,2024-12-02 09:00:00\n\
              3,carol,2024-12-01\n",
        );

        let rows = extract(&file, "2024-12-01", "utf-8").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::from("alice")));
        assert_eq!(rows[1].get("id"), Some(&Value::from("3")));

        let rows = extract(&file, "2024-12-02", "utf-8").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("bob")));
    }

    #[tokio::test]
    async fn skips_rows_without_date_and_pads_short_rows() {
        let file = write_csv(
            b"id,created_at,note\n\
              1,,empty date\n\
              2\n\
              3,2024-12-01 08:00:00\n\
              4,2024-12-01,extra,ignored\n",
        );

        let rows = extract(&file, "2024-12-01", "utf-8").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&Value::from("3")));
        assert_eq!(rows[0].get("note"), Some(&Value::Null));
        assert_eq!(rows[1].len(), 3);
    }

    #[tokio::test]
    async fn strips_utf8_bom_from_header() {
        let file = write_csv(b"\xef\xbb\xbfcreated_at,id\n2024-12-01,1\n");
        let rows = extract(&file, "2024-12-01", "utf-8-sig").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns().next(), Some("created_at"));
    }

    #[tokio::test]
    async fn missing_date_column_yields_nothing() {
        let file = write_csv(b"id,updated_at\n1,2024-12-01\n");
        let rows = extract(&file, "2024-12-01", "utf-8").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn invalid_bytes_report_line() {
        let file = write_csv(b"id,created_at,name\n1,2024-12-01,ok\n2,2024-12-01,caf\xe9\n");

        let err = extract(&file, "2024-12-01", "utf-8").await.unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
        assert!(err.to_string().contains("line 3"), "{}", err);

        let rows = extract(&file, "2024-12-01", "latin-1").await.unwrap();
        assert_eq!(rows[1].get("name"), Some(&Value::from("café")));
    }

    #[tokio::test]
    async fn invalid_bytes_fail_on_rows_for_other_dates() {
        let file = write_csv(b"id,created_at,name\n1,2024-12-01,ok\n2,2024-12-02,caf\xe9\n");

        let err = extract(&file, "2024-12-01", "utf-8").await.unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let mut source = CsvSource::new("/nonexistent/users.csv", "created_at", "utf-8").unwrap();
        assert!(matches!(
            source.open().await,
            Err(IngestError::NotFound { .. })
        ));
        let date = ingest2parquet_core::validate_date("2024-12-01").unwrap();
        assert!(matches!(
            source.extract(&date).await.map(|_| ()),
            Err(IngestError::NotFound { .. })
        ));
    }
}
