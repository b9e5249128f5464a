//! Headerless `;`-separated extract reader with legacy-encoding decoding

use crate::domain::{DeltaError, IngestionError, Result};
use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::{Encoding, WINDOWS_1252};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Decodes raw field bytes with a primary encoding and a total fallback
///
/// Decoding never truncates: bytes the primary encoding rejects are decoded
/// again as Windows-1252, which maps every byte to a character.
#[derive(Debug, Clone, Copy)]
pub struct FieldDecoder {
    primary: &'static Encoding,
}

impl FieldDecoder {
    pub fn for_label(label: &str) -> Result<Self> {
        let primary = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| DeltaError::Configuration(format!("Unknown encoding '{label}'")))?;
        Ok(Self { primary })
    }

    /// Returns the decoded text and whether the fallback was needed
    pub fn decode(&self, bytes: &[u8]) -> (String, bool) {
        match self
            .primary
            .decode_without_bom_handling_and_without_replacement(bytes)
        {
            Some(text) => (text.into_owned(), false),
            None => {
                let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
                (text.into_owned(), true)
            }
        }
    }
}

/// One decoded row
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based record number within the file
    pub line: u64,
    pub fields: Vec<String>,
    /// At least one field needed the fallback decoder
    pub fallback_decoded: bool,
}

/// Streaming reader over one extract file
pub struct ExtractReader {
    path: PathBuf,
    inner: csv::Reader<BufReader<File>>,
    decoder: FieldDecoder,
    record: ByteRecord,
    line: u64,
}

impl ExtractReader {
    pub fn open(path: &Path, decoder: FieldDecoder) -> Result<Self> {
        let file = File::open(path).map_err(|e| IngestionError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let inner = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            decoder,
            record: ByteRecord::new(),
            line: 0,
        })
    }

    /// Next decoded row, `None` at end of file
    pub fn next_row(&mut self) -> Result<Option<RawRow>> {
        let more = self
            .inner
            .read_byte_record(&mut self.record)
            .map_err(|e| IngestionError::Unreadable {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        if !more {
            return Ok(None);
        }

        self.line += 1;
        let mut fallback_decoded = false;
        let fields = self
            .record
            .iter()
            .map(|raw| {
                let (text, fallback) = self.decoder.decode(raw);
                fallback_decoded |= fallback;
                text
            })
            .collect();

        Ok(Some(RawRow {
            line: self.line,
            fields,
            fallback_decoded,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
