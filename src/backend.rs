//! Page and lyrics resolution behind the admission gate.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors a page backend can report.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Nothing is known about the requested recognition
    #[error("Recognition {0} not found")]
    NotFound(String),

    /// The backend cannot serve requests right now
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves the protected content once a request has been admitted.
///
/// Implementations own history lookups, templating and lyrics retrieval; the
/// HTTP layer only calls them for admitted requests.
#[async_trait]
pub trait PageBackend: Send + Sync {
    /// Render the HTML page for a recognition.
    async fn recognition_page(&self, id: &str) -> Result<String, BackendError>;

    /// Look up the lyrics text for a recognition.
    async fn lyrics(&self, id: &str) -> Result<String, BackendError>;
}

/// Serves a static `index.html` from a template directory.
///
/// Lyrics are not available from files and always report not found.
#[derive(Debug, Clone)]
pub struct FileBackend {
    template_dir: Option<PathBuf>,
}

impl FileBackend {
    /// Create a backend reading from `template_dir`.
    pub fn new(template_dir: Option<PathBuf>) -> Self {
        Self { template_dir }
    }

    fn index_path(&self) -> Option<PathBuf> {
        self.template_dir.as_ref().map(|dir| dir.join("index.html"))
    }
}

#[async_trait]
impl PageBackend for FileBackend {
    async fn recognition_page(&self, id: &str) -> Result<String, BackendError> {
        let path = self
            .index_path()
            .ok_or_else(|| BackendError::Unavailable("no template directory configured".into()))?;

        debug!(id = %id, path = %path.display(), "Serving recognition page");
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    async fn lyrics(&self, id: &str) -> Result<String, BackendError> {
        Err(BackendError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backend_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>hit</html>").unwrap();

        let backend = FileBackend::new(Some(dir.path().to_path_buf()));
        let page = backend.recognition_page("abc").await.unwrap();

        assert_eq!(page, "<html>hit</html>");
    }

    #[tokio::test]
    async fn test_file_backend_without_templates() {
        let backend = FileBackend::new(None);

        let err = backend.recognition_page("abc").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_file_backend_has_no_lyrics() {
        let backend = FileBackend::new(None);

        let err = backend.lyrics("abc").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(id) if id == "abc"));
    }
}
