use crate::error::{ReportError, Result};
use std::path::{Component, Path, PathBuf};

/// Flat directory holding uploads and generated reports.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

/// Final path component of `name`, with anything outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Saves an upload as `{uuid}_{sanitized name}` and returns the stored name.
    pub async fn store_upload(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let stored = format!("{}_{}", uuid::Uuid::new_v4(), sanitize_file_name(original_name));
        tokio::fs::write(self.root.join(&stored), bytes).await?;
        tracing::debug!(file = %stored, size = bytes.len(), "upload stored");
        Ok(stored)
    }

    /// Path for a stored name. Anything but a single plain component is "not found".
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None)
                if !name.contains(['/', '\\']) && part.to_str() == Some(name) =>
            {
                Ok(self.root.join(name))
            }
            _ => Err(ReportError::NotFound(name.to_string())),
        }
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(tokio::fs::read(&path).await?),
            Ok(_) => Err(ReportError::NotFound(name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReportError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_file_name("sales.xlsx"), "sales.xlsx");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\Q1 data.xlsx"), "Q1_data.xlsx");
        assert_eq!(sanitize_file_name("résumé.xlsx"), "r_sum_.xlsx");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn test_resolve_rejects_paths() {
        let store = ReportStore::new("/srv/reports");
        assert_eq!(
            store.resolve("report.xlsx").unwrap(),
            PathBuf::from("/srv/reports/report.xlsx")
        );
        for bad in ["", ".", "..", "../secret", "a/b.xlsx", "/etc/passwd", "a\\b"] {
            assert!(matches!(store.resolve(bad), Err(ReportError::NotFound(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_store_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("uploads"));
        store.ensure_dir().await.unwrap();

        let first = store.store_upload("data.xlsx", b"abc").await.unwrap();
        let second = store.store_upload("data.xlsx", b"abc").await.unwrap();
        assert_ne!(first, second);
        assert!(first.ends_with("_data.xlsx"));
        assert_eq!(store.read(&first).await.unwrap(), b"abc");

        assert!(matches!(
            store.read("never-stored.xlsx").await,
            Err(ReportError::NotFound(_))
        ));
    }
}
