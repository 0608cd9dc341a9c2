//! Reading and writing document files.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::ConfigError;

/// A document file that may or may not be required to exist.
#[derive(Debug, Clone)]
pub(crate) struct DocumentFile {
    path: PathBuf,
    required: bool,
}

impl DocumentFile {
    pub fn new(path: impl AsRef<Path>, required: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            required,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file contents.
    ///
    /// Returns `Ok(None)` if the file doesn't exist and is not required.
    pub fn read(&self) -> Result<Option<String>, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                debug!(path = %self.path.display(), "loaded document");
                Ok(Some(contents))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.required {
                    Err(ConfigError::FileNotFound(self.path.clone()))
                } else {
                    debug!(path = %self.path.display(), "optional document not found");
                    Ok(None)
                }
            }
            Err(e) => Err(ConfigError::ReadError {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

pub(crate) fn write_document(path: &Path, contents: &str) -> Result<(), ConfigError> {
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key: value").unwrap();

        let contents = DocumentFile::new(file.path(), true).read().unwrap();
        assert_eq!(contents.as_deref(), Some("key: value\n"));
    }

    #[test]
    fn test_required_missing() {
        let result = DocumentFile::new("/nonexistent/path/vars.yaml", true).read();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_optional_missing() {
        let contents = DocumentFile::new("/nonexistent/path/vars.yaml", false)
            .read()
            .unwrap();
        assert!(contents.is_none());
    }

    #[test]
    fn test_write_to_missing_directory() {
        let result = write_document(Path::new("/nonexistent/dir/out.yaml"), "a: 1\n");
        assert!(matches!(result, Err(ConfigError::WriteError { .. })));
    }
}
