//! Fragment - all rows of one (frame, view, shard)
//!
//! Write path:
//! ```text
//!   set_bit → OpLog (append) → rows (apply) → RowCache (update)
//!                                   ↓ every max_op_n ops
//!                              snapshot + truncate OpLog
//! ```
//!
//! Read path: rows are served from memory. Reads clone the requested row
//! under a shared lock, so callers always hold a stable snapshot.
//!
//! Bit-sliced integer fields are stored as `bit_depth` value rows plus an
//! exists row at `bit_depth`. The slice primitives below work on base
//! values (value - min); the frame handles the offset.

use crate::storage::bitmap::BitContainer;
use crate::storage::cache::{sort_pairs, CacheType, Pair, RowCache};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::oplog::{Op, OpLog, SyncMode};
use crate::storage::snapshot::{read_snapshot, write_snapshot, CompressionType};
use crate::storage::{shard_of, SHARD_WIDTH};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default number of logged ops before a snapshot is taken
pub const DEFAULT_MAX_OP_N: usize = 2000;

/// Per-fragment settings handed down from the frame and storage config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentConfig {
    pub cache_type: CacheType,
    pub cache_size: u32,
    pub max_op_n: usize,
    pub sync_mode: SyncMode,
    pub compression: CompressionType,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Ranked,
            cache_size: crate::storage::cache::DEFAULT_CACHE_SIZE,
            max_op_n: DEFAULT_MAX_OP_N,
            sync_mode: SyncMode::Batched,
            compression: CompressionType::Lz4,
        }
    }
}

/// Comparison used by bit-sliced range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl std::str::FromStr for RangeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" | "eq" => Ok(RangeOp::Eq),
            "!=" | "neq" => Ok(RangeOp::Neq),
            "<" | "lt" => Ok(RangeOp::Lt),
            "<=" | "lte" => Ok(RangeOp::Lte),
            ">" | "gt" => Ok(RangeOp::Gt),
            ">=" | "gte" => Ok(RangeOp::Gte),
            other => Err(format!("unknown range operator: {}", other)),
        }
    }
}

/// Options for ranking rows in a fragment
#[derive(Debug, Clone, Default)]
pub struct TopOptions {
    /// Maximum number of pairs returned (0 = all)
    pub n: usize,
    /// Only rank these rows (counted directly, bypassing the cache)
    pub row_ids: Vec<u64>,
    /// Count only columns present in this row
    pub filter: Option<BitContainer>,
    /// Drop rows whose count is below this value
    pub min_threshold: u64,
}

struct FragmentState {
    rows: BTreeMap<u64, BitContainer>,
    cache: RowCache,
    oplog: OpLog,
}

impl FragmentState {
    fn row(&self, row_id: u64) -> Option<&BitContainer> {
        self.rows.get(&row_id)
    }

    fn contains(&self, row_id: u64, column_id: u64) -> bool {
        self.rows
            .get(&row_id)
            .map(|r| r.contains(column_id))
            .unwrap_or(false)
    }

    /// Apply an op to the rows and refresh the row's cache entry
    fn apply(&mut self, op: Op) -> bool {
        let (row_id, changed) = apply_to_rows(&mut self.rows, op);
        if changed {
            let count = self.rows.get(&row_id).map(|r| r.count()).unwrap_or(0);
            self.cache.update(row_id, count);
        }
        changed
    }

    fn rebuild_cache(&mut self) {
        self.cache.clear();
        for (row_id, row) in &self.rows {
            self.cache.update(*row_id, row.count());
        }
    }
}

fn apply_to_rows(rows: &mut BTreeMap<u64, BitContainer>, op: Op) -> (u64, bool) {
    match op {
        Op::Set { row_id, column_id } => {
            (row_id, rows.entry(row_id).or_default().set(column_id))
        }
        Op::Clear { row_id, column_id } => {
            let changed = match rows.get_mut(&row_id) {
                Some(row) => row.clear(column_id),
                None => false,
            };
            if rows.get(&row_id).map(|r| r.is_empty()).unwrap_or(false) {
                rows.remove(&row_id);
            }
            (row_id, changed)
        }
    }
}

/// Physical bitmap storage for one (frame, view, shard)
pub struct Fragment {
    path: PathBuf,
    index: String,
    frame: String,
    view: String,
    shard: u64,
    config: FragmentConfig,
    state: RwLock<FragmentState>,
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("path", &self.path)
            .field("index", &self.index)
            .field("frame", &self.frame)
            .field("view", &self.view)
            .field("shard", &self.shard)
            .finish_non_exhaustive()
    }
}

impl Fragment {
    /// Open a fragment, replaying its op log on top of the last snapshot
    pub fn open(
        path: impl AsRef<Path>,
        index: &str,
        frame: &str,
        view: &str,
        shard: u64,
        config: FragmentConfig,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut rows = read_snapshot(&path)?;
        let oplog = OpLog::open(ops_path(&path), config.sync_mode)?;

        let ops = oplog.replay()?;
        for op in &ops {
            apply_to_rows(&mut rows, *op);
        }
        if !ops.is_empty() {
            tracing::debug!(
                "Replayed {} ops for {}/{}/{} shard {}",
                ops.len(),
                index,
                frame,
                view,
                shard
            );
        }

        let mut state = FragmentState {
            rows,
            cache: RowCache::new(config.cache_type, config.cache_size),
            oplog,
        };
        state.rebuild_cache();

        let fragment = Self {
            path,
            index: index.to_string(),
            frame: frame.to_string(),
            view: view.to_string(),
            shard,
            config,
            state: RwLock::new(state),
        };

        {
            let mut state = fragment.write()?;
            fragment.maybe_snapshot(&mut state);
        }

        Ok(fragment)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, FragmentState>> {
        self.state
            .read()
            .map_err(|e| StorageError::Lock(format!("Failed to acquire fragment lock: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, FragmentState>> {
        self.state
            .write()
            .map_err(|e| StorageError::Lock(format!("Failed to acquire fragment lock: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn frame(&self) -> &str {
        &self.frame
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn shard(&self) -> u64 {
        self.shard
    }

    pub fn cache_type(&self) -> CacheType {
        self.config.cache_type
    }

    fn check_column(&self, column_id: u64) -> StorageResult<()> {
        if shard_of(column_id) != self.shard {
            return Err(StorageError::ColumnOutOfShard {
                column_id,
                shard: self.shard,
            });
        }
        Ok(())
    }

    /// Set a bit, returning true if it transitioned 0 → 1
    pub fn set_bit(&self, row_id: u64, column_id: u64) -> StorageResult<bool> {
        self.check_column(column_id)?;
        let mut state = self.write()?;

        if state.contains(row_id, column_id) {
            return Ok(false);
        }

        let op = Op::Set { row_id, column_id };
        state.oplog.append(&op)?;
        state.apply(op);
        self.maybe_snapshot(&mut state);

        Ok(true)
    }

    /// Clear a bit, returning true if it transitioned 1 → 0
    pub fn clear_bit(&self, row_id: u64, column_id: u64) -> StorageResult<bool> {
        self.check_column(column_id)?;
        let mut state = self.write()?;

        if !state.contains(row_id, column_id) {
            return Ok(false);
        }

        let op = Op::Clear { row_id, column_id };
        state.oplog.append(&op)?;
        state.apply(op);
        self.maybe_snapshot(&mut state);

        Ok(true)
    }

    pub fn contains(&self, row_id: u64, column_id: u64) -> StorageResult<bool> {
        Ok(self.read()?.contains(row_id, column_id))
    }

    /// Snapshot of a row; absent rows are empty
    pub fn row(&self, row_id: u64) -> StorageResult<BitContainer> {
        Ok(self.read()?.row(row_id).cloned().unwrap_or_default())
    }

    /// Ids of all non-empty rows, ascending
    pub fn rows(&self) -> StorageResult<Vec<u64>> {
        Ok(self.read()?.rows.keys().copied().collect())
    }

    /// Total number of set bits in the fragment
    pub fn bit_count(&self) -> StorageResult<u64> {
        Ok(self.read()?.rows.values().map(|r| r.count()).sum())
    }

    /// Contents of the row cache, ranked
    pub fn cache_top(&self) -> StorageResult<Vec<Pair>> {
        Ok(self.read()?.cache.top())
    }

    /// Cached cardinality of a row, if the cache tracks it
    pub fn cached_count(&self, row_id: u64) -> StorageResult<Option<u64>> {
        Ok(self.read()?.cache.get(row_id))
    }

    /// Rank rows by cardinality
    ///
    /// Candidates come from the row cache unless `row_ids` is given. With
    /// `CacheType::None` and no explicit rows the result is empty.
    pub fn top(&self, opts: &TopOptions) -> StorageResult<Vec<Pair>> {
        let state = self.read()?;

        let candidates: Vec<Pair> = if opts.row_ids.is_empty() {
            state.cache.top()
        } else {
            opts.row_ids
                .iter()
                .map(|&id| Pair::new(id, state.row(id).map(|r| r.count()).unwrap_or(0)))
                .collect()
        };

        let mut pairs: Vec<Pair> = candidates
            .into_iter()
            .filter_map(|pair| {
                let count = match &opts.filter {
                    Some(filter) => state
                        .row(pair.id)
                        .map(|r| r.intersection_count(filter))
                        .unwrap_or(0),
                    None => pair.count,
                };
                if count == 0 || count < opts.min_threshold {
                    None
                } else {
                    Some(Pair::new(pair.id, count))
                }
            })
            .collect();

        sort_pairs(&mut pairs);
        if opts.n > 0 {
            pairs.truncate(opts.n);
        }
        Ok(pairs)
    }

    /// Bulk-set bits without logging each one, then snapshot once
    pub fn import(&self, bits: &[(u64, u64)]) -> StorageResult<u64> {
        for &(_, column_id) in bits {
            self.check_column(column_id)?;
        }

        let mut state = self.write()?;
        let mut touched = HashSet::new();
        let mut changed = 0u64;

        for &(row_id, column_id) in bits {
            let (_, set) = apply_to_rows(&mut state.rows, Op::Set { row_id, column_id });
            if set {
                changed += 1;
                touched.insert(row_id);
            }
        }

        for row_id in &touched {
            let count = state.rows.get(row_id).map(|r| r.count()).unwrap_or(0);
            state.cache.update(*row_id, count);
        }

        self.snapshot_locked(&mut state)?;
        tracing::debug!(
            "Imported {} new bits into {}/{}/{} shard {}",
            changed,
            self.index,
            self.frame,
            self.view,
            self.shard
        );
        Ok(changed)
    }

    // ==================== Bit-sliced values ====================

    /// Write `value` into the slice rows and set the exists bit
    pub fn set_value(&self, column_id: u64, bit_depth: u32, value: u64) -> StorageResult<bool> {
        self.check_column(column_id)?;
        let mut state = self.write()?;

        let mut ops = Vec::with_capacity(bit_depth as usize + 1);
        for i in 0..bit_depth {
            let row_id = i as u64;
            let want = (value >> i) & 1 == 1;
            let has = state.contains(row_id, column_id);
            if want && !has {
                ops.push(Op::Set { row_id, column_id });
            } else if !want && has {
                ops.push(Op::Clear { row_id, column_id });
            }
        }
        if !state.contains(bit_depth as u64, column_id) {
            ops.push(Op::Set {
                row_id: bit_depth as u64,
                column_id,
            });
        }

        if ops.is_empty() {
            return Ok(false);
        }

        state.oplog.append_batch(&ops)?;
        for op in &ops {
            state.apply(*op);
        }
        self.maybe_snapshot(&mut state);

        Ok(true)
    }

    /// Read a base value; None when the exists bit is unset
    pub fn value(&self, column_id: u64, bit_depth: u32) -> StorageResult<Option<u64>> {
        let state = self.read()?;

        if !state.contains(bit_depth as u64, column_id) {
            return Ok(None);
        }

        let mut value = 0u64;
        for i in 0..bit_depth {
            if state.contains(i as u64, column_id) {
                value |= 1 << i;
            }
        }
        Ok(Some(value))
    }

    /// Sum of base values and number of columns with a value
    pub fn sum(&self, filter: Option<&BitContainer>, bit_depth: u32) -> StorageResult<(u128, u64)> {
        let state = self.read()?;

        let mut exists = state.row(bit_depth as u64).cloned().unwrap_or_default();
        if let Some(filter) = filter {
            exists = exists.intersect(filter);
        }
        let count = exists.count();

        let mut sum = 0u128;
        for i in 0..bit_depth {
            if let Some(row) = state.row(i as u64) {
                sum += (row.intersection_count(&exists) as u128) << i;
            }
        }
        Ok((sum, count))
    }

    /// Columns whose base value satisfies `op predicate`
    pub fn range_op(&self, op: RangeOp, bit_depth: u32, predicate: u64) -> StorageResult<BitContainer> {
        let state = self.read()?;
        let exists = state.row(bit_depth as u64).cloned().unwrap_or_default();

        // Predicates wider than the slices compare above every stored value
        if bit_depth < 64 && predicate >> bit_depth != 0 {
            return Ok(match op {
                RangeOp::Lt | RangeOp::Lte | RangeOp::Neq => exists,
                RangeOp::Gt | RangeOp::Gte | RangeOp::Eq => BitContainer::new(),
            });
        }

        Ok(match op {
            RangeOp::Eq => range_eq(&state, &exists, bit_depth, predicate),
            RangeOp::Neq => exists.difference(&range_eq(&state, &exists, bit_depth, predicate)),
            RangeOp::Lt => range_lt(&state, &exists, bit_depth, predicate, false),
            RangeOp::Lte => range_lt(&state, &exists, bit_depth, predicate, true),
            RangeOp::Gt => range_gt(&state, &exists, bit_depth, predicate, false),
            RangeOp::Gte => range_gt(&state, &exists, bit_depth, predicate, true),
        })
    }

    /// Columns whose base value lies in `[lo, hi]`
    pub fn range_between(&self, bit_depth: u32, lo: u64, hi: u64) -> StorageResult<BitContainer> {
        if lo > hi {
            return Ok(BitContainer::new());
        }
        let low = self.range_op(RangeOp::Gte, bit_depth, lo)?;
        let high = self.range_op(RangeOp::Lte, bit_depth, hi)?;
        Ok(low.intersect(&high))
    }

    // ==================== Persistence ====================

    /// Snapshot once the op log reaches `max_op_n`. The op is already logged
    /// and applied, so a failed snapshot only leaves the log untruncated.
    fn maybe_snapshot(&self, state: &mut FragmentState) {
        if (state.oplog.entry_count() as usize) < self.config.max_op_n {
            return;
        }
        if let Err(e) = self.snapshot_locked(state) {
            tracing::warn!(
                "Snapshot of {}/{}/{} shard {} failed, op log retained: {}",
                self.index,
                self.frame,
                self.view,
                self.shard,
                e
            );
        }
    }

    fn snapshot_locked(&self, state: &mut FragmentState) -> StorageResult<()> {
        let rows = write_snapshot(&self.path, &state.rows, self.config.compression)?;
        state.oplog.truncate()?;
        tracing::debug!(
            "Snapshot {}/{}/{} shard {}: {} rows",
            self.index,
            self.frame,
            self.view,
            self.shard,
            rows
        );
        Ok(())
    }

    /// Write a snapshot and truncate the op log
    pub fn snapshot(&self) -> StorageResult<()> {
        let mut state = self.write()?;
        self.snapshot_locked(&mut state)
    }

    /// Number of ops logged since the last snapshot
    pub fn pending_ops(&self) -> StorageResult<u64> {
        Ok(self.read()?.oplog.entry_count())
    }

    /// Sync the op log to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.write()?.oplog.sync()
    }

    pub fn close(&self) -> StorageResult<()> {
        self.flush()
    }

    /// First column id owned by this fragment
    pub fn min_column(&self) -> u64 {
        self.shard * SHARD_WIDTH
    }
}

/// Path of the op log belonging to a snapshot path
pub fn ops_path(path: &Path) -> PathBuf {
    path.with_extension("ops")
}

fn slice<'a>(state: &'a FragmentState, i: u32, empty: &'a BitContainer) -> &'a BitContainer {
    state.row(i as u64).unwrap_or(empty)
}

fn range_eq(state: &FragmentState, exists: &BitContainer, bit_depth: u32, predicate: u64) -> BitContainer {
    let empty = BitContainer::new();
    let mut b = exists.clone();
    for i in (0..bit_depth).rev() {
        let row = slice(state, i, &empty);
        if (predicate >> i) & 1 == 1 {
            b = b.intersect(row);
        } else {
            b = b.difference(row);
        }
    }
    b
}

fn range_lt(
    state: &FragmentState,
    exists: &BitContainer,
    bit_depth: u32,
    predicate: u64,
    allow_equality: bool,
) -> BitContainer {
    let empty = BitContainer::new();
    let mut result = BitContainer::new();
    // Columns whose higher slices all equal the predicate's
    let mut eq = exists.clone();
    for i in (0..bit_depth).rev() {
        let row = slice(state, i, &empty);
        if (predicate >> i) & 1 == 1 {
            result.union_in_place(&eq.difference(row));
            eq = eq.intersect(row);
        } else {
            eq = eq.difference(row);
        }
    }
    if allow_equality {
        result.union_in_place(&eq);
    }
    result
}

fn range_gt(
    state: &FragmentState,
    exists: &BitContainer,
    bit_depth: u32,
    predicate: u64,
    allow_equality: bool,
) -> BitContainer {
    let empty = BitContainer::new();
    let mut result = BitContainer::new();
    let mut eq = exists.clone();
    for i in (0..bit_depth).rev() {
        let row = slice(state, i, &empty);
        if (predicate >> i) & 1 == 0 {
            result.union_in_place(&eq.intersect(row));
            eq = eq.difference(row);
        } else {
            eq = eq.intersect(row);
        }
    }
    if allow_equality {
        result.union_in_place(&eq);
    }
    result
}
