use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{PlainSecret, Secret, SecretEngine, SecretError};

/// Secrets loaded once from a dotenv file.
pub struct FileEngine {
    secrets: HashMap<String, String>,
}

impl FileEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SecretError> {
        let path = path.as_ref();
        let storage = |source: dotenvy::Error| SecretError::Storage {
            scheme: "file".into(),
            source: Box::new(source),
        };

        let mut secrets = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(storage)? {
            let (key, value) = item.map_err(storage)?;
            secrets.insert(key, value);
        }
        debug!(path = %path.display(), count = secrets.len(), "Loaded secrets file");
        Ok(Self { secrets })
    }

    pub fn from_map(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }
}

impl fmt::Debug for FileEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEngine")
            .field("count", &self.secrets.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretEngine for FileEngine {
    async fn get_secret(
        &self,
        _ctx: &CancellationToken,
        key: &str,
    ) -> Result<Box<dyn Secret>, SecretError> {
        match self.secrets.get(key) {
            Some(value) => Ok(Box::new(PlainSecret::new(value.as_bytes()))),
            None => Err(SecretError::NotFound),
        }
    }
}
