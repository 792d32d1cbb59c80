//! Opening the record stream: stdin, a plain file, or a gzipped file.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;

/// Buffer size for file input (256KB)
const INPUT_BUF_SIZE: usize = 256 * 1024;

/// Open `path` for line reading, or stdin when `None`.
///
/// Files ending in `.gz` are decompressed on the fly.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    let Some(path) = path else {
        return Ok(Box::new(io::stdin().lock()));
    };

    let file =
        File::open(path).with_context(|| format!("Cannot open input {}", path.display()))?;
    if is_gzip(path) {
        log::debug!("Reading gzip input {}", path.display());
        Ok(Box::new(BufReader::with_capacity(
            INPUT_BUF_SIZE,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(INPUT_BUF_SIZE, file)))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn read_all(mut reader: Box<dyn BufRead>) -> String {
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn gzip_detected_by_extension() {
        assert!(is_gzip(Path::new("dump.tsv.gz")));
        assert!(!is_gzip(Path::new("dump.tsv")));
        assert!(!is_gzip(Path::new("gz")));
    }

    #[test]
    fn plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.tsv");
        std::fs::write(&path, "a\t1\nb\t2\n").unwrap();

        assert_eq!(read_all(open_input(Some(&path)).unwrap()), "a\t1\nb\t2\n");
    }

    #[test]
    fn gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.tsv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"id\t0\tq\thello\n").unwrap();
        enc.finish().unwrap();

        assert_eq!(
            read_all(open_input(Some(&path)).unwrap()),
            "id\t0\tq\thello\n"
        );
    }

    #[test]
    fn missing_file_names_path() {
        let err = open_input(Some(Path::new("/nonexistent/records.tsv"))).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/records.tsv"));
    }
}
