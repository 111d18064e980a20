//! Append-only JSON-lines result store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::persistence::{Result, ResultStore};
use crate::translation::TranslationResult;

/// Appends one JSON object per result to a file.
#[derive(Debug)]
pub struct JsonLinesResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesResultStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultStore for JsonLinesResultStore {
    async fn save(&self, result: &TranslationResult) -> Result<()> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{Failure, FailureReason, TranslationRequest};

    #[tokio::test]
    async fn test_appends_one_line_per_result() {
        let path = std::env::temp_dir().join(format!("results-{}.jsonl", uuid::Uuid::new_v4()));
        let store = JsonLinesResultStore::new(&path);

        for id in ["a", "b"] {
            let request = TranslationRequest::new("Hello", "en", "de").with_id(id);
            let result = TranslationResult::failed(&request, Failure::new(FailureReason::Internal, "x"));
            store.save(&result).await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let ids: Vec<String> = contents
            .lines()
            .map(|line| {
                serde_json::from_str::<TranslationResult>(line)
                    .unwrap()
                    .request_id
                    .to_string()
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
