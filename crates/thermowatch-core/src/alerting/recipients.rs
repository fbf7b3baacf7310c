//! Warning recipient list

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// Source of the distribution list, read fresh for every notification
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// Current recipients, in file order
    async fn load(&self) -> Result<Vec<String>>;
}

/// Plain-text file, one address per line, blank lines skipped
#[derive(Debug, Clone)]
pub struct FileRecipientStore {
    path: PathBuf,
}

impl FileRecipientStore {
    /// Read recipients from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecipientStore for FileRecipientStore {
    async fn load(&self) -> Result<Vec<String>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_recipients(&contents))
    }
}

/// Fixed recipient list
#[async_trait]
impl RecipientStore for Vec<String> {
    async fn load(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

fn parse_recipients(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_skips_blank_lines() {
        let parsed = parse_recipients("a@x.com\n\n  b@x.com  \r\n\n\na@x.com\n");
        assert_eq!(parsed, vec!["a@x.com", "b@x.com", "a@x.com"]);
    }

    #[tokio::test]
    async fn test_file_store() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "ops@example.com\nfacilities@example.com\n").unwrap();

        let store = FileRecipientStore::new(file.path());
        assert_eq!(
            store.load().await.unwrap(),
            vec!["ops@example.com", "facilities@example.com"]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let store = FileRecipientStore::new("/nonexistent/thermowatch/emails");
        assert!(store.load().await.is_err());
    }
}
