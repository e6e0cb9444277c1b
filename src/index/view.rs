//! View - one partition of a frame's fragments, keyed by shard
//!
//! Fragments are created on first touch and live at
//! `<view>/fragments/<shard>` (snapshot) and `<shard>.ops` (op log).

use crate::storage::{shard_of, BitContainer, Fragment, FragmentConfig, StorageResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Name of the row-major view
pub const VIEW_STANDARD: &str = "standard";

/// Name of the transposed view
pub const VIEW_INVERSE: &str = "inverse";

/// A named set of fragments within a frame
pub struct View {
    name: String,
    index: String,
    frame: String,
    path: PathBuf,
    config: FragmentConfig,
    fragments: RwLock<BTreeMap<u64, Arc<Fragment>>>,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("frame", &self.frame)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl View {
    /// Open a view directory, loading every fragment found on disk
    pub fn open(
        path: impl AsRef<Path>,
        index: &str,
        frame: &str,
        name: &str,
        config: FragmentConfig,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let fragments_dir = path.join("fragments");
        std::fs::create_dir_all(&fragments_dir)?;

        let mut fragments = BTreeMap::new();
        for shard in Self::scan_shards(&fragments_dir)? {
            let fragment = Fragment::open(
                fragments_dir.join(shard.to_string()),
                index,
                frame,
                name,
                shard,
                config,
            )?;
            fragments.insert(shard, Arc::new(fragment));
        }

        Ok(Self {
            name: name.to_string(),
            index: index.to_string(),
            frame: frame.to_string(),
            path,
            config,
            fragments: RwLock::new(fragments),
        })
    }

    /// Shards with a snapshot or op log on disk
    fn scan_shards(dir: &Path) -> StorageResult<BTreeSet<u64>> {
        let mut shards = BTreeSet::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let stem = file_name.strip_suffix(".ops").unwrap_or(file_name);
            match stem.parse::<u64>() {
                Ok(shard) => {
                    shards.insert(shard);
                }
                Err(_) => {
                    tracing::debug!("Ignoring non-fragment file {:?}", entry.path());
                }
            }
        }
        Ok(shards)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fragment_path(&self, shard: u64) -> PathBuf {
        self.path.join("fragments").join(shard.to_string())
    }

    /// Fragment for a shard, if it has been realized
    pub fn fragment(&self, shard: u64) -> StorageResult<Option<Arc<Fragment>>> {
        let fragments = self.fragments.read()?;
        Ok(fragments.get(&shard).cloned())
    }

    pub fn create_fragment_if_not_exists(&self, shard: u64) -> StorageResult<Arc<Fragment>> {
        if let Some(fragment) = self.fragment(shard)? {
            return Ok(fragment);
        }

        let mut fragments = self.fragments.write()?;
        if let Some(fragment) = fragments.get(&shard) {
            return Ok(fragment.clone());
        }

        let fragment = Arc::new(Fragment::open(
            self.fragment_path(shard),
            &self.index,
            &self.frame,
            &self.name,
            shard,
            self.config,
        )?);
        fragments.insert(shard, fragment.clone());
        tracing::debug!(
            "Created fragment {}/{}/{} shard {}",
            self.index,
            self.frame,
            self.name,
            shard
        );
        Ok(fragment)
    }

    /// All realized fragments, ordered by shard
    pub fn fragments(&self) -> StorageResult<Vec<Arc<Fragment>>> {
        Ok(self.fragments.read()?.values().cloned().collect())
    }

    pub fn set_bit(&self, row_id: u64, column_id: u64) -> StorageResult<bool> {
        self.create_fragment_if_not_exists(shard_of(column_id))?
            .set_bit(row_id, column_id)
    }

    /// Clear a bit; a shard that was never written has nothing to clear
    pub fn clear_bit(&self, row_id: u64, column_id: u64) -> StorageResult<bool> {
        match self.fragment(shard_of(column_id))? {
            Some(fragment) => fragment.clear_bit(row_id, column_id),
            None => Ok(false),
        }
    }

    /// A row unioned across every shard
    pub fn row(&self, row_id: u64) -> StorageResult<BitContainer> {
        let mut row = BitContainer::new();
        for fragment in self.fragments()? {
            row.union_in_place(&fragment.row(row_id)?);
        }
        Ok(row)
    }

    /// Highest realized shard, 0 when empty
    pub fn max_shard(&self) -> StorageResult<u64> {
        Ok(self.fragments.read()?.keys().next_back().copied().unwrap_or(0))
    }

    /// Sync every fragment's op log
    pub fn flush(&self) -> StorageResult<()> {
        for fragment in self.fragments()? {
            fragment.flush()?;
        }
        Ok(())
    }

    pub fn close(&self) -> StorageResult<()> {
        for fragment in self.fragments()? {
            fragment.close()?;
        }
        Ok(())
    }
}
