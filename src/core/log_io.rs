use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::model::FrameRecord;

/// Reads a JSON-lines perception log, one `FrameRecord` per line.
/// Blank lines are ignored; lines that fail to parse are logged and skipped.
pub struct FrameReader<R> {
    reader: R,
    line_no: usize,
    skipped: usize,
}

impl FrameReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines dropped so far because they were not valid frame records.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = io::Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buffer = String::new();
        loop {
            buffer.clear();
            match self.reader.read_line(&mut buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameRecord>(line) {
                Ok(frame) => return Some(Ok(frame)),
                Err(e) => {
                    log::warn!("Skipping malformed frame on line {}: {}", self.line_no, e);
                    self.skipped += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    const GOOD: &str = r#"{"timestamp":"2025-01-01T12:00:00Z","detections":[]}"#;

    #[test]
    fn test_skips_blank_and_malformed_lines() {
        let input = format!("{}\n\n{{not json\n{}\n", GOOD, GOOD);
        let mut reader = FrameReader::new(Cursor::new(input));
        let frames: Vec<_> = reader.by_ref().collect::<io::Result<_>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(reader.skipped(), 1);
    }

    #[test]
    fn test_open_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", GOOD).unwrap();
        writeln!(file, r#"{{"timestamp":"2025-01-01T12:00:01Z","skipped":true}}"#).unwrap();

        let frames: Vec<_> = FrameReader::open(&path)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].skipped);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(FrameReader::open(dir.path().join("nope.jsonl")).is_err());
    }
}
