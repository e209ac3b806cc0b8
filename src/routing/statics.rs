//! Static file lookup under a configured root.

use std::path::{Path, PathBuf};

use axum::http::{header, HeaderValue};
use futures_util::StreamExt;
use percent_encoding::percent_decode_str;
use tokio_util::io::ReaderStream;

use crate::http::body::Body;
use crate::http::error::HttpError;
use crate::http::response::Response;

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_files: Vec<String>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, index_files: Vec<String>) -> Self {
        Self {
            root: root.into(),
            index_files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL pathname to an existing file, resolving directories to their index file.
    ///
    /// Returns `None` for anything outside the root or not on disk.
    pub async fn resolve(&self, pathname: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in pathname.split('/').filter(|s| !s.is_empty()) {
            let segment = percent_decode_str(segment).decode_utf8().ok()?;
            if segment == "." || segment == ".." || segment.contains(['/', '\\', '\0']) {
                return None;
            }
            path.push(segment.as_ref());
        }

        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if metadata.is_file() {
            return Some(path);
        }
        if metadata.is_dir() {
            for index in &self.index_files {
                let candidate = path.join(index);
                if tokio::fs::metadata(&candidate)
                    .await
                    .is_ok_and(|m| m.is_file())
                {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Stream the file for `pathname`, or `None` if there is no such file.
    pub async fn serve(&self, pathname: &str) -> Result<Option<Response>, HttpError> {
        let Some(path) = self.resolve(pathname).await else {
            return Ok(None);
        };
        let file = tokio::fs::File::open(&path).await?;
        let length = file.metadata().await?.len();
        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(HttpError::from));

        let mut response = Response::new(Body::from_stream(stream));
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        tracing::debug!(path = %path.display(), "Serving static file");
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statics(dir: &tempfile::TempDir) -> StaticFiles {
        StaticFiles::new(dir.path(), vec!["index.html".into(), "index.htm".into()])
    }

    #[tokio::test]
    async fn directories_resolve_to_index_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.htm"), "<h1>docs</h1>").unwrap();

        let found = statics(&dir).resolve("/docs/").await.unwrap();
        assert_eq!(found, dir.path().join("docs/index.htm"));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        assert!(statics(&dir).resolve("/../a.txt").await.is_none());
        assert!(statics(&dir).resolve("/%2e%2e/a.txt").await.is_none());
        assert!(statics(&dir).resolve("/a.txt").await.is_some());
    }

    #[tokio::test]
    async fn serves_with_inferred_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();

        let mut response = statics(&dir).serve("/style.css").await.unwrap().unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(response.take_body().collect().await.unwrap(), "body{}");
        assert!(statics(&dir).serve("/missing.css").await.unwrap().is_none());
    }
}
