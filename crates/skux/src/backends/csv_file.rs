// ai
//! 📂 Previously, on "Things That Could Go Wrong With A CSV"...
//!
//! The file was quiet. Too quiet. It had a header row, which was promising.
//! It also had a UTF-8 BOM glued to the first column name, a row with one
//! cell too few, and a stock count of `"5.0"` because someone opened it in a
//! spreadsheet and saved it with feeling.
//!
//! This module reads that file. Header row → column names. Every following
//! record → one [`RawRow`], cells as strings, empty cells as `null`, short
//! rows padded with `null`, long rows trimmed to the header. Pages are capped
//! at `page_size` rows so a big file does not arrive as one giant Vec.
//!
//! 🚰 File → csv::Reader → Vec<RawRow> → Supervisor(normalize) → Collection
//! 🦆 (mandatory, no notes)

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::app_config::lenient;
use crate::backends::Source;
use crate::common::RawRow;

// -- 📂 CsvSourceConfig: "It's just a CSV", said no data engineer ever.
#[derive(Debug, Deserialize, Clone)]
pub struct CsvSourceConfig {
    /// 📍 Where the catalogue lives on disk
    #[serde(default = "default_csv_path", deserialize_with = "lenient::path")]
    pub path: PathBuf,
    /// ✂️ Field delimiter. One ASCII char. Tabs welcome, emoji not.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// 📦 Max rows per page handed out by `next_page`
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("data/sample_products.csv")
}

fn default_delimiter() -> char {
    ','
}

fn default_page_size() -> usize {
    1000
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            path: default_csv_path(),
            delimiter: default_delimiter(),
            page_size: default_page_size(),
        }
    }
}

/// 📂 CsvSource: a header-aware, page-at-a-time CSV reader.
pub(crate) struct CsvSource {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    config: CsvSourceConfig,
    record: csv::StringRecord,
    rows_read: u64,
}

// 🐛 csv::Reader doesn't impl Debug, and nobody wants to see its internals anyway.
impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("config", &self.config)
            .field("headers", &self.headers)
            .field("rows_read", &self.rows_read)
            .finish()
    }
}

impl CsvSource {
    /// 🚀 Open the file and read the header row.
    ///
    /// 💀 Fails if the delimiter is not ASCII, the file cannot be opened, or
    /// the header row is unreadable.
    pub(crate) fn open(config: CsvSourceConfig) -> Result<Self> {
        if !config.delimiter.is_ascii() {
            bail!(
                "💀 CSV delimiter '{}' is not a single ASCII character. The csv crate speaks bytes, not vibes.",
                config.delimiter
            );
        }
        if config.page_size == 0 {
            bail!("💀 csv.page_size must be at least 1. A page of zero rows is just a very sad page.");
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter as u8)
            .flexible(true)
            .has_headers(true)
            .from_path(&config.path)
            .context(format!(
                "💀 Could not open CSV '{}'. It was here a second ago. Probably.",
                config.path.display()
            ))?;

        let headers = reader
            .headers()
            .context(format!(
                "💀 Could not read the header row of '{}'. A CSV without headers is just commas with ambition.",
                config.path.display()
            ))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // -- 🧹 spreadsheets love a BOM on the first column. we do not.
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect::<Vec<_>>();

        trace!("📂 opened '{}' with columns {:?}", config.path.display(), headers);

        Ok(Self {
            reader,
            headers,
            config,
            record: csv::StringRecord::new(),
            rows_read: 0,
        })
    }

    fn to_row(&self) -> RawRow {
        let mut row = RawRow::new();
        for (i, header) in self.headers.iter().enumerate() {
            let cell = match self.record.get(i) {
                Some(c) if !c.is_empty() => Value::String(c.to_string()),
                // -- 🕳️ empty or missing cell → null → "missing" to the normalizer
                _ => Value::Null,
            };
            row.insert(header.clone(), cell);
        }
        row
    }
}

#[async_trait]
impl Source for CsvSource {
    /// 📄 Read up to `page_size` records. `None` once the file is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<RawRow>>> {
        let mut page = Vec::with_capacity(self.config.page_size.min(4096));
        while page.len() < self.config.page_size {
            let got_one = self.reader.read_record(&mut self.record).context(format!(
                "💀 CSV record {} of '{}' is malformed. The commas have unionized.",
                self.rows_read + 1,
                self.config.path.display()
            ))?;
            if !got_one {
                break;
            }
            page.push(self.to_row());
            self.rows_read += 1;
        }

        trace!(
            "📄 paged {} rows out of '{}' ({} so far)",
            page.len(),
            self.config.path.display(),
            self.rows_read
        );

        if page.is_empty() { Ok(None) } else { Ok(Some(page)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut the_file = tempfile::NamedTempFile::new()
            .expect("💀 tempfile said no. The filesystem is having a day.");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 couldn't write the fixture CSV");
        the_file
    }

    fn config_for(file: &tempfile::NamedTempFile, page_size: usize) -> CsvSourceConfig {
        CsvSourceConfig {
            path: file.path().to_path_buf(),
            page_size,
            ..CsvSourceConfig::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_rows_come_out_in_file_order_across_pages() -> Result<()> {
        let the_file = write_csv("product_id,price\nA,1\nB,2\nC,3\n");
        let mut the_source = CsvSource::open(config_for(&the_file, 2))?;

        let first = the_source.next_page().await?.expect("first page");
        let second = the_source.next_page().await?.expect("second page");
        assert!(the_source.next_page().await?.is_none());

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0]["product_id"], "A");
        assert_eq!(first[1]["product_id"], "B");
        assert_eq!(second[0]["product_id"], "C");
        assert_eq!(second[0]["price"], "3");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bom_blanks_and_ragged_rows_are_tamed() -> Result<()> {
        let the_file = write_csv("\u{feff}product_id, name ,stock\nA,,5\nB\nC,Cog,1,extra\n");
        let mut the_source = CsvSource::open(config_for(&the_file, 100))?;

        let the_rows = the_source.next_page().await?.expect("one page");
        assert_eq!(the_rows.len(), 3);
        assert_eq!(the_rows[0]["product_id"], "A");
        assert_eq!(the_rows[0]["name"], Value::Null);
        assert_eq!(the_rows[0]["stock"], "5");
        assert_eq!(the_rows[1]["stock"], Value::Null);
        assert_eq!(the_rows[2]["name"], "Cog");
        assert_eq!(the_rows[2].len(), 3, "extra cells past the header are dropped");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_header_only_file_is_just_empty() -> Result<()> {
        let the_file = write_csv("product_id,price\n");
        let mut the_source = CsvSource::open(config_for(&the_file, 10))?;
        assert!(the_source.next_page().await?.is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_semicolons_and_missing_files_are_handled() {
        let the_file = write_csv("product_id;price\nA;1\n");
        let the_config = CsvSourceConfig {
            delimiter: ';',
            ..config_for(&the_file, 10)
        };
        assert!(CsvSource::open(the_config).is_ok());

        let the_ghost = CsvSourceConfig {
            path: PathBuf::from("/definitely/not/here.csv"),
            ..CsvSourceConfig::default()
        };
        assert!(CsvSource::open(the_ghost).is_err());

        let the_emoji = CsvSourceConfig {
            delimiter: '🦆',
            ..config_for(&the_file, 10)
        };
        assert!(CsvSource::open(the_emoji).is_err());
    }
}
