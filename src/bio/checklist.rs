/// Streaming reader for delimited checklist exports (names, distributions or joined rows)
use crate::Result;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One raw row: column name to cell text (empty string when absent)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based position in the input, header excluded
    pub number: u64,
    pub fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            fields: HashMap::new(),
        }
    }

    /// Build a row from column/value pairs
    pub fn from_pairs<I, K, V>(number: u64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            number,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Trimmed cell value, `None` when missing or blank
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
    }
}

/// Iterator over the rows of a delimited file
pub struct RowReader {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<Box<dyn Read>>,
    next_number: u64,
}

impl RowReader {
    /// Open a file; `.gz` files are decompressed on the fly
    pub fn open<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, delimiter)
    }

    pub fn from_reader(reader: Box<dyn Read>, delimiter: u8) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .quoting(delimiter != b'|')
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        Ok(Self {
            headers,
            records: csv_reader.into_records(),
            next_number: 1,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Iterator for RowReader {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };

        let number = self.next_number;
        self.next_number += 1;

        let fields = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();

        Some(Ok(RawRow { number, fields }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn reader_for(text: &str, delimiter: u8) -> RowReader {
        RowReader::from_reader(Box::new(Cursor::new(text.as_bytes().to_vec())), delimiter).unwrap()
    }

    #[test]
    fn test_pipe_delimited_rows() {
        let text = "plant_name_id|family|genus\n2549024|Picramniaceae|Picramnia\n7|Oxalidaceae|\n";
        let rows: Vec<RawRow> = reader_for(text, b'|').map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 1);
        assert_eq!(rows[0].get("family"), Some("Picramniaceae"));
        assert_eq!(rows[1].get("genus"), None);
        assert_eq!(rows[1].get("not_a_column"), None);
    }

    #[test]
    fn test_short_records_pad_with_empty() {
        let text = "a,b,c\n1,2\n";
        let rows: Vec<RawRow> = reader_for(text, b',').map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].get("b"), Some("2"));
        assert_eq!(rows[0].get("c"), None);
    }

    #[test]
    fn test_gzip_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("names.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(encoder, "plant_name_id|genus").unwrap();
        writeln!(encoder, "1|Oxalis").unwrap();
        encoder.finish().unwrap();

        let reader = RowReader::open(&path, b'|').unwrap();
        assert_eq!(reader.headers(), &["plant_name_id".to_string(), "genus".to_string()]);
        let rows: Vec<RawRow> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].get("genus"), Some("Oxalis"));
    }
}
