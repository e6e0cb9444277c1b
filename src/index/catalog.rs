//! Index - namespace of frames and input definitions
//!
//! Layout under the index directory:
//! ```text
//! <index>/.meta                        IndexOptions (JSON)
//! <index>/.input-definitions/<name>    InputDefinitionInfo (JSON)
//! <index>/<frame>/...                  one directory per frame
//! ```
//!
//! Structural changes take the index write lock. Bit input holds the read
//! lock until every bit is applied, so `reopen` never runs mid-write.

use crate::index::error::{IndexError, IndexResult};
use crate::index::frame::{Bit, Frame, META_FILE};
use crate::index::input::{InputDefinition, InputDefinitionInfo, InputFrame};
use crate::index::view::{VIEW_INVERSE, VIEW_STANDARD};
use crate::schema::{validate_name, FrameOptions, IndexOptions, TimeQuantum};
use crate::storage::StorageConfig;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Directory holding persisted input definitions
const INPUT_DEFINITIONS_DIR: &str = ".input-definitions";

struct IndexState {
    options: IndexOptions,
    frames: BTreeMap<String, Arc<Frame>>,
    input_definitions: BTreeMap<String, Arc<InputDefinition>>,
}

impl IndexState {
    fn require_frame(&self, name: &str) -> IndexResult<&Frame> {
        self.frames
            .get(name)
            .map(|frame| frame.as_ref())
            .ok_or_else(|| IndexError::FrameNotFound(name.to_string()))
    }
}

pub struct Index {
    name: String,
    path: PathBuf,
    storage: StorageConfig,
    state: RwLock<IndexState>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Index {
    /// Open (or initialize) the index stored at `path`
    ///
    /// Rejects invalid names before touching the filesystem.
    pub fn open(path: impl AsRef<Path>, name: &str, storage: &StorageConfig) -> IndexResult<Self> {
        validate_name(name)?;
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let state = load_state(&path, name, storage)?;
        tracing::info!(
            "Opened index {} ({} frames, {} input definitions)",
            name,
            state.frames.len(),
            state.input_definitions.len()
        );

        Ok(Self {
            name: name.to_string(),
            path,
            storage: storage.clone(),
            state: RwLock::new(state),
        })
    }

    /// Create a new index directory with the given options
    pub fn create(
        path: impl AsRef<Path>,
        name: &str,
        options: IndexOptions,
        storage: &StorageConfig,
    ) -> IndexResult<Self> {
        validate_name(name)?;
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        save_options(&path, &options)?;
        Self::open(path, name, storage)
    }

    fn read(&self) -> IndexResult<RwLockReadGuard<'_, IndexState>> {
        Ok(self.state.read()?)
    }

    fn write(&self) -> IndexResult<RwLockWriteGuard<'_, IndexState>> {
        Ok(self.state.write()?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> IndexResult<IndexOptions> {
        Ok(self.read()?.options.clone())
    }

    pub fn column_label(&self) -> IndexResult<String> {
        Ok(self.read()?.options.column_label.clone())
    }

    pub fn time_quantum(&self) -> IndexResult<TimeQuantum> {
        Ok(self.read()?.options.time_quantum.clone())
    }

    fn frame_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    // ==================== Frames ====================

    pub fn frame(&self, name: &str) -> IndexResult<Option<Arc<Frame>>> {
        Ok(self.read()?.frames.get(name).cloned())
    }

    /// All frames, ordered by name
    pub fn frames(&self) -> IndexResult<Vec<Arc<Frame>>> {
        Ok(self.read()?.frames.values().cloned().collect())
    }

    pub fn create_frame(&self, name: &str, options: FrameOptions) -> IndexResult<Arc<Frame>> {
        validate_name(name)?;
        let mut state = self.write()?;
        if state.frames.contains_key(name) {
            return Err(IndexError::FrameExists(name.to_string()));
        }
        self.create_frame_locked(&mut state, name, options)
    }

    /// Existing frames are returned as-is; `options` only apply to new ones
    pub fn create_frame_if_not_exists(
        &self,
        name: &str,
        options: FrameOptions,
    ) -> IndexResult<Arc<Frame>> {
        let mut state = self.write()?;
        if let Some(frame) = state.frames.get(name) {
            return Ok(frame.clone());
        }
        self.create_frame_locked(&mut state, name, options)
    }

    fn create_frame_locked(
        &self,
        state: &mut IndexState,
        name: &str,
        options: FrameOptions,
    ) -> IndexResult<Arc<Frame>> {
        validate_name(name)?;
        options.validate()?;

        let options = FrameOptions {
            time_quantum: if options.time_quantum.is_empty() {
                state.options.time_quantum.clone()
            } else {
                options.time_quantum
            },
            ..options
        };

        let frame = Arc::new(Frame::create(
            self.frame_path(name),
            &self.name,
            name,
            options,
            &self.storage,
        )?);
        state.frames.insert(name.to_string(), frame.clone());
        tracing::info!("Created frame {}/{}", self.name, name);
        Ok(frame)
    }

    /// Remove a frame and all of its data; absent frames are not an error
    pub fn delete_frame(&self, name: &str) -> IndexResult<()> {
        let mut state = self.write()?;
        let Some(frame) = state.frames.remove(name) else {
            return Ok(());
        };

        frame.close()?;
        let path = self.frame_path(name);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        tracing::info!("Deleted frame {}/{}", self.name, name);
        Ok(())
    }

    // ==================== Bits ====================

    /// Set every bit on a frame; `None` entries are skipped
    ///
    /// Each bit lands in `standard` and, for inverse frames, transposed in
    /// `inverse`, along with the time views of its timestamp.
    pub fn input_bits(&self, frame: &str, bits: &[Option<Bit>]) -> IndexResult<()> {
        let state = self.read()?;
        let frame = state.require_frame(frame)?;
        for bit in bits.iter().flatten() {
            apply_bit(frame, bit)?;
        }
        Ok(())
    }

    /// Expand records through an input definition and apply the bits
    ///
    /// Nothing is written unless every record expands and every target
    /// frame exists.
    pub fn input(&self, definition: &str, records: &[Value]) -> IndexResult<usize> {
        let state = self.read()?;
        let definition = state
            .input_definitions
            .get(definition)
            .ok_or_else(|| IndexError::InputDefinitionNotFound(definition.to_string()))?;
        let bits = definition.expand(records)?;

        let mut frames: BTreeMap<&str, &Frame> = BTreeMap::new();
        for frame_bit in &bits {
            if !frames.contains_key(frame_bit.frame.as_str()) {
                let frame = state.require_frame(&frame_bit.frame)?;
                frames.insert(frame_bit.frame.as_str(), frame);
            }
        }

        for frame_bit in &bits {
            if let Some(frame) = frames.get(frame_bit.frame.as_str()) {
                apply_bit(frame, &frame_bit.bit)?;
            }
        }

        tracing::debug!(
            "Input {} records through {}: {} bits",
            records.len(),
            definition.name(),
            bits.len()
        );
        Ok(bits.len())
    }

    // ==================== Input definitions ====================

    fn input_definition_path(&self, name: &str) -> PathBuf {
        self.path.join(INPUT_DEFINITIONS_DIR).join(name)
    }

    pub fn create_input_definition(
        &self,
        info: InputDefinitionInfo,
    ) -> IndexResult<Arc<InputDefinition>> {
        if info.name.is_empty() {
            return Err(IndexError::InputDefinitionNameRequired);
        }

        let mut state = self.write()?;
        if state.input_definitions.contains_key(&info.name) {
            return Err(IndexError::InputDefinitionExists(info.name));
        }
        validate_name(&info.name)?;
        info.validate()?;

        for frame in &info.frames {
            if !state.frames.contains_key(&frame.name) {
                self.create_frame_locked(&mut state, &frame.name, frame.options.clone())?;
            }
        }

        let definition = Arc::new(InputDefinition::create(
            self.input_definition_path(&info.name),
            info,
        )?);

        state
            .input_definitions
            .insert(definition.name().to_string(), definition.clone());
        tracing::info!("Created input definition {}/{}", self.name, definition.name());
        Ok(definition)
    }

    pub fn input_definition(&self, name: &str) -> IndexResult<Arc<InputDefinition>> {
        self.read()?
            .input_definitions
            .get(name)
            .cloned()
            .ok_or_else(|| IndexError::InputDefinitionNotFound(name.to_string()))
    }

    pub fn input_definitions(&self) -> IndexResult<Vec<Arc<InputDefinition>>> {
        Ok(self.read()?.input_definitions.values().cloned().collect())
    }

    /// Remove a definition; absent definitions are not an error
    pub fn delete_input_definition(&self, name: &str) -> IndexResult<()> {
        let mut state = self.write()?;
        if let Some(definition) = state.input_definitions.remove(name) {
            definition.delete()?;
            tracing::info!("Deleted input definition {}/{}", self.name, name);
        }
        Ok(())
    }

    // ==================== Lifecycle ====================

    /// Drop all in-memory state and rebuild it from disk
    ///
    /// Handles obtained before the reopen keep pointing at the old state.
    pub fn reopen(&self) -> IndexResult<()> {
        let mut state = self.write()?;
        for frame in state.frames.values() {
            frame.close()?;
        }
        *state = load_state(&self.path, &self.name, &self.storage)?;
        tracing::info!("Reopened index {}", self.name);
        Ok(())
    }

    /// Highest shard realized in any frame
    pub fn max_shard(&self) -> IndexResult<u64> {
        let mut max = 0;
        for frame in self.frames()? {
            max = max.max(frame.max_shard()?);
        }
        Ok(max)
    }

    /// Sync every fragment's op log
    pub fn close(&self) -> IndexResult<()> {
        for frame in self.frames()? {
            frame.close()?;
        }
        Ok(())
    }
}

fn apply_bit(frame: &Frame, bit: &Bit) -> IndexResult<()> {
    let t = bit.datetime();
    frame.set_bit(VIEW_STANDARD, bit.row_id, bit.column_id, t)?;
    if frame.inverse_enabled() {
        frame.set_bit(VIEW_INVERSE, bit.column_id, bit.row_id, t)?;
    }
    Ok(())
}

fn save_options(dir: &Path, options: &IndexOptions) -> IndexResult<()> {
    let content = serde_json::to_string_pretty(options)?;
    std::fs::write(dir.join(META_FILE), content)?;
    Ok(())
}

fn load_options(dir: &Path) -> IndexResult<IndexOptions> {
    let path = dir.join(META_FILE);
    if !path.exists() {
        let options = IndexOptions::default();
        save_options(dir, &options)?;
        return Ok(options);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Rebuild an index's in-memory state from its directory
fn load_state(path: &Path, name: &str, storage: &StorageConfig) -> IndexResult<IndexState> {
    let options = load_options(path)?;

    let mut frames = BTreeMap::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(frame_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if frame_name.starts_with('.') {
            continue;
        }
        if validate_name(&frame_name).is_err() || !entry.path().join(META_FILE).exists() {
            tracing::warn!("Skipping unrecognized directory {:?}", entry.path());
            continue;
        }
        let frame = Frame::open(entry.path(), name, &frame_name, storage)?;
        frames.insert(frame_name, Arc::new(frame));
    }

    let mut input_definitions = BTreeMap::new();
    let defs_dir = path.join(INPUT_DEFINITIONS_DIR);
    if defs_dir.exists() {
        for entry in std::fs::read_dir(&defs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let definition = InputDefinition::open(entry.path())?;
            input_definitions.insert(definition.name().to_string(), Arc::new(definition));
        }
    }

    let mut state = IndexState {
        options,
        frames,
        input_definitions,
    };

    // Frames declared by input definitions survive even if never created
    let declared: Vec<InputFrame> = state
        .input_definitions
        .values()
        .map(|d| d.frames())
        .collect::<IndexResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    for frame in declared {
        if state.frames.contains_key(&frame.name) {
            continue;
        }
        frame.options.validate()?;
        let options = FrameOptions {
            time_quantum: if frame.options.time_quantum.is_empty() {
                state.options.time_quantum.clone()
            } else {
                frame.options.time_quantum.clone()
            },
            ..frame.options.clone()
        };
        let created = Frame::create(path.join(&frame.name), name, &frame.name, options, storage)?;
        tracing::info!("Created declared frame {}/{}", name, frame.name);
        state.frames.insert(frame.name.clone(), Arc::new(created));
    }

    Ok(state)
}
