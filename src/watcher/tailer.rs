//! Incremental JSONL source tail.
//!
//! Tracks how many bytes of a source's log have been consumed and decodes
//! whatever was appended since.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Records decoded from one read of a source log.
#[derive(Debug, Default)]
pub struct TailBatch {
    /// Lines that decoded as JSON, in file order.
    pub records: Vec<Value>,
    /// Raw lines that failed to decode.
    pub malformed: Vec<String>,
}

impl TailBatch {
    /// True if the read produced neither records nor malformed lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.malformed.is_empty()
    }
}

/// Byte-offset reader over one append-only JSONL file.
#[derive(Debug)]
pub struct SourceTail {
    /// Path to the JSONL file.
    path: PathBuf,
    /// Bytes already consumed.
    offset: u64,
}

impl SourceTail {
    /// Create a tail that treats the whole file as unread.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Create a tail starting at a specific offset.
    #[must_use]
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self { path, offset }
    }

    /// Create a tail positioned at the current end of the file.
    ///
    /// Content already present is never surfaced. If the length cannot be
    /// read the offset falls back to 0, so the first read treats the entire
    /// file as new.
    #[must_use]
    pub fn at_end(path: PathBuf) -> Self {
        let offset = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "Could not read initial length, tailing from start"
                );
                0
            }
        };
        Self { path, offset }
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode everything appended since the last read.
    ///
    /// The offset moves to the end of the content that was read, whether or
    /// not any of it decoded. Each non-blank line is decoded on its own; a
    /// malformed line is reported in [`TailBatch::malformed`] and does not
    /// affect the rest of the batch.
    ///
    /// If the file is now shorter than the offset, nothing is decoded and the
    /// offset is set to the current length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read. The offset is
    /// left untouched in that case.
    pub fn read_new_lines(&mut self) -> std::io::Result<TailBatch> {
        let mut file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();

        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "Log shrank below consumed offset, skipping to end"
            );
            self.offset = file_len;
            return Ok(TailBatch::default());
        }

        if file_len == self.offset {
            return Ok(TailBatch::default());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended)?;
        self.offset += appended.len() as u64;

        Ok(decode_lines(&String::from_utf8_lossy(&appended)))
    }
}

/// Decode newline-delimited JSON, keeping malformed lines aside.
#[must_use]
pub fn decode_lines(chunk: &str) -> TailBatch {
    let mut batch = TailBatch::default();
    if chunk.trim().is_empty() {
        return batch;
    }

    for line in chunk.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => batch.records.push(value),
            Err(_) => batch.malformed.push(trimmed.to_string()),
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn status_line(model: &str) -> String {
        format!(r#"{{"model":{{"display_name":"{model}"}},"cost":{{"total_cost_usd":0.01}}}}"#)
    }

    #[test]
    fn test_at_end_skips_existing_content() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", status_line("Opus")).unwrap();
        file.flush().unwrap();

        let mut tail = SourceTail::at_end(file.path().to_path_buf());
        let len = std::fs::metadata(file.path()).unwrap().len();
        assert_eq!(tail.offset(), len);

        let batch = tail.read_new_lines().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_at_end_missing_file_falls_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghost.jsonl");

        let mut tail = SourceTail::at_end(path.clone());
        assert_eq!(tail.offset(), 0);

        // File shows up later with content: all of it is new.
        std::fs::write(
            &path,
            format!("{}\n{}\n", status_line("Sonnet"), status_line("Haiku")),
        )
        .unwrap();

        let batch = tail.read_new_lines().unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0]["model"]["display_name"], "Sonnet");
        assert_eq!(batch.records[1]["model"]["display_name"], "Haiku");
        assert_eq!(tail.offset(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_reads_only_appended_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", status_line("Opus")).unwrap();
        file.flush().unwrap();

        let mut tail = SourceTail::at_end(file.path().to_path_buf());
        let start = tail.offset();

        writeln!(file, "{}", status_line("Sonnet")).unwrap();
        file.flush().unwrap();

        let batch = tail.read_new_lines().unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0]["model"]["display_name"], "Sonnet");
        assert!(tail.offset() > start);
    }

    #[test]
    fn test_offset_tracks_file_length_monotonically() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tail = SourceTail::new(file.path().to_path_buf());
        let mut previous = tail.offset();

        for model in ["Opus", "Sonnet", "Haiku"] {
            writeln!(file, "{}", status_line(model)).unwrap();
            file.flush().unwrap();

            let batch = tail.read_new_lines().unwrap();
            assert_eq!(batch.records.len(), 1);

            let len = std::fs::metadata(file.path()).unwrap().len();
            assert_eq!(tail.offset(), len);
            assert!(tail.offset() >= previous);
            previous = tail.offset();
        }

        // Nothing new: offset unchanged.
        assert!(tail.read_new_lines().unwrap().is_empty());
        assert_eq!(tail.offset(), previous);
    }

    #[test]
    fn test_malformed_line_does_not_drop_batch() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tail = SourceTail::at_end(file.path().to_path_buf());

        writeln!(file, "{}", status_line("Opus")).unwrap();
        writeln!(file, "{{\"incomplete\": true").unwrap();
        writeln!(file, "{}", status_line("Haiku")).unwrap();
        file.flush().unwrap();

        let batch = tail.read_new_lines().unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.malformed, vec!["{\"incomplete\": true".to_string()]);
        assert_eq!(
            tail.offset(),
            std::fs::metadata(file.path()).unwrap().len()
        );
    }

    #[test]
    fn test_whitespace_only_append_advances_offset() {
        let mut file = NamedTempFile::new().unwrap();
        let mut tail = SourceTail::at_end(file.path().to_path_buf());

        write!(file, "\n  \n").unwrap();
        file.flush().unwrap();

        let batch = tail.read_new_lines().unwrap();
        assert!(batch.is_empty());
        assert_eq!(tail.offset(), 4);
    }

    #[test]
    fn test_missing_file_is_error_and_keeps_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut tail = SourceTail::with_offset(dir.path().join("gone.jsonl"), 42);

        let err = tail.read_new_lines().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(tail.offset(), 42);
    }

    #[test]
    fn test_shrunk_file_moves_offset_to_end() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{\"a\":1}\n").unwrap();
        let mut tail = SourceTail::with_offset(file.path().to_path_buf(), 1024);

        let batch = tail.read_new_lines().unwrap();
        assert!(batch.is_empty());
        assert_eq!(tail.offset(), 8);
    }

    #[test]
    fn test_decode_lines_skips_blank_lines() {
        let batch = decode_lines("{\"a\":1}\n\n   \n[1,2]\n\"text\"\n");
        assert_eq!(batch.records.len(), 3);
        assert!(batch.malformed.is_empty());
    }

    #[test]
    fn test_decode_lines_handles_crlf() {
        let batch = decode_lines("{\"a\":1}\r\n{\"b\":2}\r\n");
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[1]["b"], 2);
    }
}
