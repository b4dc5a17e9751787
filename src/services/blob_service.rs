use crate::utils::error::{AppError, AppResult};
use crate::utils::http::HTTP_CLIENT;
use async_trait::async_trait;
use serde::Deserialize;

const BLOB_API_VERSION: &str = "7";

#[derive(Debug, Clone, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub pathname: String,
}

/// File storage for uploaded papers
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, pathname: &str, content_type: &str, bytes: Vec<u8>) -> AppResult<StoredBlob>;
    async fn delete(&self, url: &str) -> AppResult<()>;
}

/// Vercel Blob REST client
pub struct VercelBlob {
    base_url: String,
    token: Option<String>,
}

impl VercelBlob {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn token(&self) -> AppResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| AppError::ExternalError("Blob storage is not configured".into()))
    }
}

#[async_trait]
impl BlobStore for VercelBlob {
    async fn put(&self, pathname: &str, content_type: &str, bytes: Vec<u8>) -> AppResult<StoredBlob> {
        let token = self.token()?;
        let size = bytes.len();
        log::info!("📤 Uploading blob {} ({} bytes)", pathname, size);

        let response = HTTP_CLIENT
            .put(format!("{}/{}", self.base_url, pathname))
            .bearer_auth(token)
            .header("x-api-version", BLOB_API_VERSION)
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "1")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!(
                "Blob upload failed ({}): {}",
                status, body
            )));
        }

        let stored: StoredBlob = response.json().await?;
        log::info!("   ✅ Blob stored at {}", stored.url);
        Ok(stored)
    }

    async fn delete(&self, url: &str) -> AppResult<()> {
        let token = self.token()?;
        log::info!("🗑️ Deleting blob {}", url);

        let response = HTTP_CLIENT
            .post(format!("{}/delete", self.base_url))
            .bearer_auth(token)
            .header("x-api-version", BLOB_API_VERSION)
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalError(format!(
                "Blob delete failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// `papers/{author_id}/{uuid}-{encoded file name}`; directory parts of the
/// client-supplied name are dropped.
pub fn paper_pathname(author_id: &str, file_name: &str) -> String {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    let base = if base.is_empty() { "paper" } else { base };
    format!(
        "papers/{}/{}-{}",
        author_id,
        uuid::Uuid::new_v4().simple(),
        urlencoding::encode(base)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pathname_strips_directories_and_encodes() {
        let path = paper_pathname("u1", "../../etc/My Paper (final).pdf");
        assert!(path.starts_with("papers/u1/"));
        assert!(path.ends_with("-My%20Paper%20%28final%29.pdf"));
        assert!(!path.contains(".."));

        let windows = paper_pathname("u1", "C:\\docs\\thesis.pdf");
        assert!(windows.ends_with("-thesis.pdf"));
    }

    #[test]
    fn test_pathname_defaults_empty_name() {
        assert!(paper_pathname("u1", "dir/").ends_with("-paper"));
    }

    #[tokio::test]
    async fn test_unconfigured_store_fails_fast() {
        let store = VercelBlob::new("http://127.0.0.1:9/", None);
        let result = store.put("papers/x.pdf", "application/pdf", vec![1, 2, 3]).await;
        assert!(matches!(result, Err(AppError::ExternalError(_))));
    }
}
