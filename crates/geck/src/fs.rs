//! File helpers that keep the failing path in the error.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("failed to read {}", path.display())]
pub struct FileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

pub fn read_binary(path: impl AsRef<Path>) -> Result<Vec<u8>, FileError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| FileError {
        path: path.to_owned(),
        source,
    })
}

pub fn read_text(path: impl AsRef<Path>) -> Result<String, FileError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| FileError {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_keeps_path() {
        let path = std::env::temp_dir().join("geck-no-such-file.spv");
        let err = read_binary(&path).unwrap_err();
        assert_eq!(err.path, path);
        assert_eq!(err.source.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("geck-no-such-file.spv"));

        assert!(read_text(&path).is_err());
    }

    #[test]
    fn reads_back_written_bytes() {
        let path = std::env::temp_dir().join(format!("geck-fs-test-{}.txt", std::process::id()));
        std::fs::write(&path, "@vertex fn main() {}").unwrap();

        assert_eq!(read_text(&path).unwrap(), "@vertex fn main() {}");
        assert_eq!(read_binary(&path).unwrap(), b"@vertex fn main() {}");

        std::fs::remove_file(&path).unwrap();
    }
}
