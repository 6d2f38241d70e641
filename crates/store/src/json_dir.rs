use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orchestration::{DomainValue, EntityName, EntityStore, StorageError};
use tracing::{debug, warn};

/// Stores each entity collection as `<dir>/<entity>.json`.
///
/// Writes go to a uniquely named temporary file in the same directory that
/// is then renamed over the target, so a reader never observes a partially
/// written collection. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file holding `entity`'s collection.
    pub fn path_for(&self, entity: &EntityName) -> Result<PathBuf, StorageError> {
        let name = entity.as_str();
        if name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StorageError::Io {
                entity: name.to_string(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "entity name is not a valid file name",
                ),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

fn io_error(entity: &EntityName) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        entity: entity.to_string(),
        source,
    }
}

#[async_trait]
impl EntityStore for JsonDirStore {
    async fn write_entity_collection(
        &self,
        entity: &EntityName,
        objects: Vec<DomainValue>,
    ) -> Result<(), StorageError> {
        let path = self.path_for(entity)?;
        let mut bytes = serde_json::to_vec_pretty(&objects).map_err(|source| {
            StorageError::Format {
                entity: entity.to_string(),
                source,
            }
        })?;
        bytes.push(b'\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(entity))?;
        let temp = self
            .dir
            .join(format!(".{entity}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(io_error(entity))?;
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(entity)(source));
        }

        debug!(%entity, path = %path.display(), count = objects.len(), "collection written");
        Ok(())
    }

    async fn read_entity_collection(
        &self,
        entity: &EntityName,
    ) -> Result<Vec<DomainValue>, StorageError> {
        let path = self.path_for(entity)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(%entity, path = %path.display(), "no stored collection, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(entity)(e)),
        };

        let objects: Vec<DomainValue> =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::Format {
                entity: entity.to_string(),
                source,
            })?;
        debug!(%entity, path = %path.display(), count = objects.len(), "collection read");
        Ok(objects)
    }
}
