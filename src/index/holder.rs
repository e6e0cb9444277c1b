//! Holder - the store root owning every index under a data directory

use crate::index::catalog::Index;
use crate::index::error::{IndexError, IndexResult};
use crate::schema::{validate_name, FrameOptions, IndexOptions};
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Serializable description of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub options: IndexOptions,
    pub frames: Vec<FrameInfo>,
}

/// Serializable description of one frame and its realized views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub name: String,
    pub options: FrameOptions,
    pub views: Vec<String>,
}

pub struct Holder {
    config: StorageConfig,
    indexes: RwLock<BTreeMap<String, Arc<Index>>>,
}

impl Holder {
    /// Open every index found under `config.data_dir`
    pub fn open(config: StorageConfig) -> IndexResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let mut indexes = BTreeMap::new();
        for entry in std::fs::read_dir(&config.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_name(&name).is_err() {
                tracing::warn!("Skipping directory with invalid index name {:?}", entry.path());
                continue;
            }
            let index = Index::open(entry.path(), &name, &config)?;
            indexes.insert(name, Arc::new(index));
        }

        tracing::info!(
            "Opened holder at {:?} ({} indexes)",
            config.data_dir,
            indexes.len()
        );
        Ok(Self {
            config,
            indexes: RwLock::new(indexes),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn index(&self, name: &str) -> IndexResult<Option<Arc<Index>>> {
        Ok(self.indexes.read()?.get(name).cloned())
    }

    /// All indexes, ordered by name
    pub fn indexes(&self) -> IndexResult<Vec<Arc<Index>>> {
        Ok(self.indexes.read()?.values().cloned().collect())
    }

    pub fn create_index(&self, name: &str, options: IndexOptions) -> IndexResult<Arc<Index>> {
        let mut indexes = self.indexes.write()?;
        if indexes.contains_key(name) {
            return Err(IndexError::IndexExists(name.to_string()));
        }
        let index = Arc::new(Index::create(
            self.config.index_path(name),
            name,
            options,
            &self.config,
        )?);
        indexes.insert(name.to_string(), index.clone());
        tracing::info!("Created index {}", name);
        Ok(index)
    }

    pub fn create_index_if_not_exists(
        &self,
        name: &str,
        options: IndexOptions,
    ) -> IndexResult<Arc<Index>> {
        if let Some(index) = self.index(name)? {
            return Ok(index);
        }
        match self.create_index(name, options) {
            Err(IndexError::IndexExists(_)) => self
                .index(name)?
                .ok_or_else(|| IndexError::IndexNotFound(name.to_string())),
            result => result,
        }
    }

    /// Remove an index and its directory; absent indexes are not an error
    pub fn delete_index(&self, name: &str) -> IndexResult<()> {
        let mut indexes = self.indexes.write()?;
        let Some(index) = indexes.remove(name) else {
            return Ok(());
        };
        index.close()?;
        if index.path().exists() {
            std::fs::remove_dir_all(index.path())?;
        }
        tracing::info!("Deleted index {}", name);
        Ok(())
    }

    /// Describe every index, frame and view
    pub fn schema(&self) -> IndexResult<Vec<IndexInfo>> {
        let mut infos = Vec::new();
        for index in self.indexes()? {
            let mut frames = Vec::new();
            for frame in index.frames()? {
                let views = frame
                    .views()?
                    .iter()
                    .map(|v| v.name().to_string())
                    .collect();
                frames.push(FrameInfo {
                    name: frame.name().to_string(),
                    options: frame.options().clone(),
                    views,
                });
            }
            infos.push(IndexInfo {
                name: index.name().to_string(),
                options: index.options()?,
                frames,
            });
        }
        Ok(infos)
    }

    pub fn close(&self) -> IndexResult<()> {
        for index in self.indexes()? {
            index.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TimeQuantum;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen_indexes() {
        let dir = tempdir().unwrap();
        {
            let holder = Holder::open(StorageConfig::new(dir.path())).unwrap();
            let index = holder.create_index("users", IndexOptions::default()).unwrap();
            let frame = index.create_frame("f", FrameOptions::default()).unwrap();
            frame.set_bit("standard", 1, 100, None).unwrap();
            holder.create_index("events", IndexOptions::default()).unwrap();
            holder.close().unwrap();
        }

        std::fs::create_dir_all(dir.path().join("Not_Valid")).unwrap();
        let holder = Holder::open(StorageConfig::new(dir.path())).unwrap();
        let names: Vec<String> = holder
            .indexes()
            .unwrap()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["events", "users"]);

        let frame = holder.index("users").unwrap().unwrap().frame("f").unwrap().unwrap();
        assert_eq!(frame.row("standard", 1).unwrap().bits(), vec![100]);
    }

    #[test]
    fn test_create_index_errors() {
        let dir = tempdir().unwrap();
        let holder = Holder::open(StorageConfig::new(dir.path())).unwrap();
        let index = holder.create_index("i", IndexOptions::default()).unwrap();

        assert!(matches!(
            holder.create_index("i", IndexOptions::default()),
            Err(IndexError::IndexExists(_))
        ));
        assert!(matches!(
            holder.create_index("-bad", IndexOptions::default()),
            Err(IndexError::NameInvalid(_))
        ));

        let same = holder.create_index_if_not_exists("i", IndexOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&index, &same));
    }

    #[test]
    fn test_delete_index_is_idempotent() {
        let dir = tempdir().unwrap();
        let holder = Holder::open(StorageConfig::new(dir.path())).unwrap();
        holder.create_index("i", IndexOptions::default()).unwrap();

        holder.delete_index("i").unwrap();
        assert!(holder.index("i").unwrap().is_none());
        assert!(!dir.path().join("i").exists());
        holder.delete_index("i").unwrap();
    }

    #[test]
    fn test_schema() {
        let dir = tempdir().unwrap();
        let holder = Holder::open(StorageConfig::new(dir.path())).unwrap();
        let index = holder
            .create_index(
                "i",
                IndexOptions {
                    time_quantum: TimeQuantum::new("Y").unwrap(),
                    ..Default::default()
                },
            )
            .unwrap();
        index
            .create_frame(
                "f",
                FrameOptions {
                    inverse_enabled: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let schema = holder.schema().unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].options.time_quantum.as_str(), "Y");
        assert_eq!(schema[0].frames[0].views, vec!["inverse", "standard"]);
        assert_eq!(schema[0].frames[0].options.time_quantum.as_str(), "Y");

        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Vec<IndexInfo> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, schema);
    }
}
