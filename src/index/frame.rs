//! Frame - a named bitmap table within an index
//!
//! Layout under the frame directory:
//! ```text
//! <frame>/.meta                                FrameOptions (JSON)
//! <frame>/views/<view>/fragments/<shard>       snapshot
//! <frame>/views/<view>/fragments/<shard>.ops   op log
//! ```
//!
//! The schema is fixed at creation. Views are realized on first write,
//! except `standard` (and `inverse` when enabled) which exist from the start.

use crate::index::error::{IndexError, IndexResult};
use crate::index::view::{View, VIEW_INVERSE, VIEW_STANDARD};
use crate::schema::{
    timestamp_to_datetime, views_by_time, views_by_time_range, Field, FrameOptions, TimeQuantum,
    FIELD_VIEW_PREFIX,
};
use crate::storage::{
    shard_of, sort_pairs, BitContainer, CacheType, Pair, RangeOp, StorageConfig, TopOptions,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// File holding a frame's options
pub(crate) const META_FILE: &str = ".meta";

/// A single bit to set, with an optional timestamp in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    pub row_id: u64,
    pub column_id: u64,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Bit {
    pub fn new(row_id: u64, column_id: u64) -> Self {
        Self {
            row_id,
            column_id,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, nanos: i64) -> Self {
        self.timestamp = Some(nanos);
        self
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.timestamp.map(timestamp_to_datetime)
    }
}

/// Sum of a field over a set of columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSum {
    pub sum: i128,
    pub count: u64,
}

pub struct Frame {
    name: String,
    index: String,
    path: PathBuf,
    options: FrameOptions,
    storage: StorageConfig,
    views: RwLock<BTreeMap<String, Arc<View>>>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Frame {
    /// Create a frame directory with already-validated options
    pub(crate) fn create(
        path: impl AsRef<Path>,
        index: &str,
        name: &str,
        options: FrameOptions,
        storage: &StorageConfig,
    ) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        save_options(&path, &options)?;

        let frame = Self::new(path, index, name, options, storage);
        frame.create_view_if_not_exists(VIEW_STANDARD)?;
        if frame.options.inverse_enabled {
            frame.create_view_if_not_exists(VIEW_INVERSE)?;
        }
        Ok(frame)
    }

    /// Open an existing frame directory
    pub(crate) fn open(
        path: impl AsRef<Path>,
        index: &str,
        name: &str,
        storage: &StorageConfig,
    ) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        let options = load_options(&path)?;
        let frame = Self::new(path, index, name, options, storage);

        let views_dir = frame.path.join("views");
        if views_dir.exists() {
            for entry in std::fs::read_dir(&views_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(view) = entry.file_name().to_str() {
                    frame.create_view_if_not_exists(view)?;
                }
            }
        }

        Ok(frame)
    }

    fn new(path: PathBuf, index: &str, name: &str, options: FrameOptions, storage: &StorageConfig) -> Self {
        Self {
            name: name.to_string(),
            index: index.to_string(),
            path,
            options,
            storage: storage.clone(),
            views: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    pub fn time_quantum(&self) -> &TimeQuantum {
        &self.options.time_quantum
    }

    pub fn inverse_enabled(&self) -> bool {
        self.options.inverse_enabled
    }

    pub fn range_enabled(&self) -> bool {
        self.options.range_enabled()
    }

    pub fn cache_type(&self) -> CacheType {
        self.options.cache_type
    }

    pub fn cache_size(&self) -> u32 {
        self.options.cache_size
    }

    pub fn row_label(&self) -> &str {
        &self.options.row_label
    }

    /// Field definitions in creation order
    pub fn fields(&self) -> Vec<Field> {
        self.options.fields.clone()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.options.field(name)
    }

    fn require_field(&self, name: &str) -> IndexResult<&Field> {
        self.field(name)
            .ok_or_else(|| IndexError::FieldNotFound(name.to_string()))
    }

    // ==================== Views ====================

    pub fn view(&self, name: &str) -> IndexResult<Option<Arc<View>>> {
        Ok(self.views.read()?.get(name).cloned())
    }

    /// Every realized view, ordered by name
    pub fn views(&self) -> IndexResult<Vec<Arc<View>>> {
        Ok(self.views.read()?.values().cloned().collect())
    }

    pub fn create_view_if_not_exists(&self, name: &str) -> IndexResult<Arc<View>> {
        if let Some(view) = self.view(name)? {
            return Ok(view);
        }

        let mut views = self.views.write()?;
        if let Some(view) = views.get(name) {
            return Ok(view.clone());
        }

        // Field views rank nothing
        let config = if name.starts_with(FIELD_VIEW_PREFIX) {
            self.storage.fragment_config(CacheType::None, 0)
        } else {
            self.storage
                .fragment_config(self.options.cache_type, self.options.cache_size)
        };

        let view = Arc::new(View::open(
            self.path.join("views").join(name),
            &self.index,
            &self.name,
            name,
            config,
        )?);
        views.insert(name.to_string(), view.clone());
        Ok(view)
    }

    /// Only the base views accept direct bit writes
    fn check_base_view(&self, view: &str) -> IndexResult<()> {
        match view {
            VIEW_STANDARD => Ok(()),
            VIEW_INVERSE if self.options.inverse_enabled => Ok(()),
            _ => Err(IndexError::InvalidView(view.to_string())),
        }
    }

    // ==================== Bits ====================

    /// Set a bit on a base view and every time view of its timestamp
    pub fn set_bit(
        &self,
        view: &str,
        row_id: u64,
        column_id: u64,
        timestamp: Option<DateTime<Utc>>,
    ) -> IndexResult<bool> {
        self.check_base_view(view)?;

        let changed = self
            .create_view_if_not_exists(view)?
            .set_bit(row_id, column_id)?;

        if let Some(t) = timestamp {
            for name in views_by_time(view, t, &self.options.time_quantum) {
                self.create_view_if_not_exists(&name)?
                    .set_bit(row_id, column_id)?;
            }
        }

        Ok(changed)
    }

    /// Clear a bit on a base view
    pub fn clear_bit(&self, view: &str, row_id: u64, column_id: u64) -> IndexResult<bool> {
        self.check_base_view(view)?;
        match self.view(view)? {
            Some(v) => Ok(v.clear_bit(row_id, column_id)?),
            None => Ok(false),
        }
    }

    /// Row unioned across shards; unrealized views are empty
    pub fn row(&self, view: &str, row_id: u64) -> IndexResult<BitContainer> {
        match self.view(view)? {
            Some(v) => Ok(v.row(row_id)?),
            None => Ok(BitContainer::new()),
        }
    }

    /// Row restricted to `[start, end)` through the time views
    pub fn range(
        &self,
        view: &str,
        row_id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> IndexResult<BitContainer> {
        let mut row = BitContainer::new();
        for name in views_by_time_range(view, start, end, &self.options.time_quantum) {
            row.union_in_place(&self.row(&name, row_id)?);
        }
        Ok(row)
    }

    /// Rank rows of a view across all shards
    pub fn top_n(&self, view: &str, opts: &TopOptions) -> IndexResult<Vec<Pair>> {
        let Some(v) = self.view(view)? else {
            return Ok(Vec::new());
        };

        let shard_opts = TopOptions {
            n: 0,
            min_threshold: 0,
            ..opts.clone()
        };
        let mut counts: HashMap<u64, u64> = HashMap::new();
        for fragment in v.fragments()? {
            for pair in fragment.top(&shard_opts)? {
                *counts.entry(pair.id).or_insert(0) += pair.count;
            }
        }

        let mut pairs: Vec<Pair> = counts
            .into_iter()
            .filter(|(_, count)| *count >= opts.min_threshold)
            .map(|(id, count)| Pair::new(id, count))
            .collect();
        sort_pairs(&mut pairs);
        if opts.n > 0 {
            pairs.truncate(opts.n);
        }
        Ok(pairs)
    }

    /// Bulk-set bits, snapshotting each touched fragment once
    ///
    /// Inverse and time views are filled the same way `set_bit` would.
    pub fn import(&self, bits: &[Bit]) -> IndexResult<u64> {
        let mut batches: BTreeMap<(String, u64), Vec<(u64, u64)>> = BTreeMap::new();
        let quantum = &self.options.time_quantum;

        let mut push = |view: &str, row_id: u64, column_id: u64, t: Option<DateTime<Utc>>| {
            batches
                .entry((view.to_string(), shard_of(column_id)))
                .or_default()
                .push((row_id, column_id));
            if let Some(t) = t {
                for name in views_by_time(view, t, quantum) {
                    batches
                        .entry((name, shard_of(column_id)))
                        .or_default()
                        .push((row_id, column_id));
                }
            }
        };

        for bit in bits {
            let t = bit.datetime();
            push(VIEW_STANDARD, bit.row_id, bit.column_id, t);
            if self.options.inverse_enabled {
                push(VIEW_INVERSE, bit.column_id, bit.row_id, t);
            }
        }

        let mut changed = 0;
        for ((view, shard), pairs) in batches {
            let fragment = self
                .create_view_if_not_exists(&view)?
                .create_fragment_if_not_exists(shard)?;
            changed += fragment.import(&pairs)?;
        }
        Ok(changed)
    }

    // ==================== Fields ====================

    /// Encode a field value into its slice rows
    pub fn set_field_value(&self, column_id: u64, field: &str, value: i64) -> IndexResult<bool> {
        let field = self.require_field(field)?;
        let base = field.base_value(value)?;

        let view = self.create_view_if_not_exists(&field.view_name())?;
        let fragment = view.create_fragment_if_not_exists(shard_of(column_id))?;
        Ok(fragment.set_value(column_id, field.bit_depth(), base)?)
    }

    pub fn field_value(&self, column_id: u64, field: &str) -> IndexResult<Option<i64>> {
        let field = self.require_field(field)?;
        let Some(view) = self.view(&field.view_name())? else {
            return Ok(None);
        };
        let Some(fragment) = view.fragment(shard_of(column_id))? else {
            return Ok(None);
        };
        Ok(fragment
            .value(column_id, field.bit_depth())?
            .map(|base| field.value_from_base(base)))
    }

    /// Sum of a field, optionally restricted to the columns of `filter`
    pub fn field_sum(&self, filter: Option<&BitContainer>, field: &str) -> IndexResult<FieldSum> {
        let field = self.require_field(field)?;
        let Some(view) = self.view(&field.view_name())? else {
            return Ok(FieldSum::default());
        };

        let mut total = FieldSum::default();
        for fragment in view.fragments()? {
            let (sum, count) = fragment.sum(filter, field.bit_depth())?;
            total.sum += sum as i128 + count as i128 * field.min as i128;
            total.count += count;
        }
        Ok(total)
    }

    /// Columns whose field value satisfies `op value`
    pub fn field_range(&self, field: &str, op: RangeOp, value: i64) -> IndexResult<BitContainer> {
        let field = self.require_field(field)?;
        let depth = field.bit_depth();

        #[derive(Clone, Copy)]
        enum Plan {
            Empty,
            All,
            Slices(RangeOp, u64),
        }

        let in_range = value >= field.min && value <= field.max;
        let plan = match op {
            RangeOp::Eq if !in_range => Plan::Empty,
            RangeOp::Neq if !in_range => Plan::All,
            RangeOp::Lt if value <= field.min => Plan::Empty,
            RangeOp::Lt if value > field.max => Plan::All,
            RangeOp::Lte if value < field.min => Plan::Empty,
            RangeOp::Lte if value >= field.max => Plan::All,
            RangeOp::Gt if value >= field.max => Plan::Empty,
            RangeOp::Gt if value < field.min => Plan::All,
            RangeOp::Gte if value > field.max => Plan::Empty,
            RangeOp::Gte if value <= field.min => Plan::All,
            _ => Plan::Slices(op, field.base_value(value)?),
        };

        let Some(view) = self.view(&field.view_name())? else {
            return Ok(BitContainer::new());
        };

        let mut result = BitContainer::new();
        for fragment in view.fragments()? {
            let part = match plan {
                Plan::Empty => return Ok(BitContainer::new()),
                Plan::All => fragment.row(depth as u64)?,
                Plan::Slices(op, base) => fragment.range_op(op, depth, base)?,
            };
            result.union_in_place(&part);
        }
        Ok(result)
    }

    /// Columns whose field value lies in `[lo, hi]`
    pub fn field_range_between(&self, field: &str, lo: i64, hi: i64) -> IndexResult<BitContainer> {
        let field = self.require_field(field)?;
        if lo > hi || hi < field.min || lo > field.max {
            return Ok(BitContainer::new());
        }

        let lo = field.base_value(lo.max(field.min))?;
        let hi = field.base_value(hi.min(field.max))?;

        let Some(view) = self.view(&field.view_name())? else {
            return Ok(BitContainer::new());
        };

        let mut result = BitContainer::new();
        for fragment in view.fragments()? {
            result.union_in_place(&fragment.range_between(field.bit_depth(), lo, hi)?);
        }
        Ok(result)
    }

    // ==================== Lifecycle ====================

    /// Highest shard realized in any view
    pub fn max_shard(&self) -> IndexResult<u64> {
        let mut max = 0;
        for view in self.views()? {
            max = max.max(view.max_shard()?);
        }
        Ok(max)
    }

    pub fn flush(&self) -> IndexResult<()> {
        for view in self.views()? {
            view.flush()?;
        }
        Ok(())
    }

    pub fn close(&self) -> IndexResult<()> {
        for view in self.views()? {
            view.close()?;
        }
        Ok(())
    }
}

pub(crate) fn save_options(dir: &Path, options: &FrameOptions) -> IndexResult<()> {
    let content = serde_json::to_string_pretty(options)?;
    std::fs::write(dir.join(META_FILE), content)?;
    Ok(())
}

fn load_options(dir: &Path) -> IndexResult<FrameOptions> {
    let content = std::fs::read_to_string(dir.join(META_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SHARD_WIDTH;
    use chrono::TimeZone;
    use tempfile::{tempdir, TempDir};

    fn create_frame(options: FrameOptions) -> (TempDir, Frame) {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::new(dir.path());
        let frame = Frame::create(dir.path().join("f"), "i", "f", options, &storage).unwrap();
        (dir, frame)
    }

    fn view_names(frame: &Frame) -> Vec<String> {
        frame
            .views()
            .unwrap()
            .iter()
            .map(|v| v.name().to_string())
            .collect()
    }

    #[test]
    fn test_default_views() {
        let (_dir, frame) = create_frame(FrameOptions::default());
        assert_eq!(view_names(&frame), vec!["standard"]);

        let (_dir, frame) = create_frame(FrameOptions {
            inverse_enabled: true,
            ..Default::default()
        });
        assert_eq!(view_names(&frame), vec!["inverse", "standard"]);
    }

    #[test]
    fn test_invalid_views_rejected() {
        let (_dir, frame) = create_frame(FrameOptions::default());
        assert!(matches!(
            frame.set_bit("inverse", 1, 1, None),
            Err(IndexError::InvalidView(_))
        ));
        assert!(matches!(
            frame.set_bit("field_x", 1, 1, None),
            Err(IndexError::InvalidView(_))
        ));
        assert!(matches!(
            frame.clear_bit("other", 1, 1),
            Err(IndexError::InvalidView(_))
        ));
    }

    #[test]
    fn test_set_and_clear() {
        let (_dir, frame) = create_frame(FrameOptions::default());
        assert!(frame.set_bit("standard", 3, 10, None).unwrap());
        assert!(!frame.set_bit("standard", 3, 10, None).unwrap());
        assert!(frame.set_bit("standard", 3, SHARD_WIDTH * 2, None).unwrap());
        assert_eq!(frame.row("standard", 3).unwrap().bits(), vec![10, SHARD_WIDTH * 2]);
        assert_eq!(frame.max_shard().unwrap(), 2);

        assert!(frame.clear_bit("standard", 3, 10).unwrap());
        assert!(!frame.clear_bit("standard", 3, 10).unwrap());
        assert_eq!(frame.row("standard", 3).unwrap().count(), 1);
        assert!(frame.row("standard_2017", 3).unwrap().is_empty());
    }

    #[test]
    fn test_time_views() {
        let (_dir, frame) = create_frame(FrameOptions {
            time_quantum: TimeQuantum::new("YMDH").unwrap(),
            ..Default::default()
        });
        let t = Utc.with_ymd_and_hms(2017, 3, 2, 4, 0, 0).unwrap();
        frame.set_bit("standard", 1, 100, Some(t)).unwrap();

        assert_eq!(
            view_names(&frame),
            vec![
                "standard",
                "standard_2017",
                "standard_201703",
                "standard_20170302",
                "standard_2017030204"
            ]
        );
        assert_eq!(frame.row("standard_201703", 1).unwrap().bits(), vec![100]);

        let start = Utc.with_ymd_and_hms(2017, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2017, 3, 3, 0, 0, 0).unwrap();
        assert_eq!(frame.range("standard", 1, start, end).unwrap().bits(), vec![100]);

        let later = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let much_later = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert!(frame.range("standard", 1, later, much_later).unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_ignored_without_quantum() {
        let (_dir, frame) = create_frame(FrameOptions::default());
        let t = Utc.with_ymd_and_hms(2017, 3, 2, 4, 0, 0).unwrap();
        frame.set_bit("standard", 1, 100, Some(t)).unwrap();
        assert_eq!(view_names(&frame), vec!["standard"]);
    }

    #[test]
    fn test_inverse_range_and_field_views() {
        let (_dir, frame) = create_frame(FrameOptions {
            inverse_enabled: true,
            range_enabled: true,
            fields: vec![Field::int("myfield", -20, 100)],
            ..Default::default()
        });

        assert!(frame.set_bit("standard", 1, 2, None).unwrap());
        assert!(frame.set_bit("inverse", 1, 2, None).unwrap());
        assert!(frame.set_field_value(1, "myfield", 87).unwrap());
        assert_eq!(frame.views().unwrap().len(), 3);
        assert_eq!(frame.field_value(1, "myfield").unwrap(), Some(87));

        // Field views do not rank
        let view = frame.view("field_myfield").unwrap().unwrap();
        assert_eq!(view.fragments().unwrap()[0].cache_type(), CacheType::None);
    }

    #[test]
    fn test_field_value_errors() {
        let (_dir, frame) = create_frame(FrameOptions {
            fields: vec![Field::int("f", 10, 20)],
            ..Default::default()
        });
        assert!(matches!(
            frame.set_field_value(1, "nope", 15),
            Err(IndexError::FieldNotFound(_))
        ));
        assert!(matches!(
            frame.set_field_value(1, "f", 9),
            Err(IndexError::FieldValueTooLow { .. })
        ));
        assert!(matches!(
            frame.set_field_value(1, "f", 21),
            Err(IndexError::FieldValueTooHigh { .. })
        ));
        // Failed writes do not realize the field view
        assert!(frame.view("field_f").unwrap().is_none());
        assert_eq!(frame.field_value(1, "f").unwrap(), None);
    }

    #[test]
    fn test_field_sum_and_ranges() {
        let (_dir, frame) = create_frame(FrameOptions {
            fields: vec![Field::int("temp", -50, 50)],
            ..Default::default()
        });

        let values: Vec<(u64, i64)> = vec![
            (1, -50),
            (2, -7),
            (3, 0),
            (4, 12),
            (SHARD_WIDTH + 5, 50),
            (SHARD_WIDTH + 6, 12),
        ];
        for (col, v) in &values {
            frame.set_field_value(*col, "temp", *v).unwrap();
        }

        let sum = frame.field_sum(None, "temp").unwrap();
        assert_eq!(sum, FieldSum { sum: 17, count: 6 });

        let filter = BitContainer::from_bits([2, 3, SHARD_WIDTH + 6]);
        let sum = frame.field_sum(Some(&filter), "temp").unwrap();
        assert_eq!(sum, FieldSum { sum: 5, count: 3 });

        let check = |op: RangeOp, value: i64, pred: fn(i64, i64) -> bool| {
            let expected: Vec<u64> = values
                .iter()
                .filter(|(_, v)| pred(*v, value))
                .map(|(c, _)| *c)
                .collect();
            assert_eq!(
                frame.field_range("temp", op, value).unwrap().bits(),
                expected,
                "{:?} {}",
                op,
                value
            );
        };
        for value in [-100, -50, -7, 0, 12, 50, 100] {
            check(RangeOp::Eq, value, |v, p| v == p);
            check(RangeOp::Neq, value, |v, p| v != p);
            check(RangeOp::Lt, value, |v, p| v < p);
            check(RangeOp::Lte, value, |v, p| v <= p);
            check(RangeOp::Gt, value, |v, p| v > p);
            check(RangeOp::Gte, value, |v, p| v >= p);
        }

        assert_eq!(
            frame.field_range_between("temp", -10, 12).unwrap().bits(),
            vec![2, 3, 4, SHARD_WIDTH + 6]
        );
        assert_eq!(
            frame.field_range_between("temp", -1000, 1000).unwrap().count(),
            6
        );
        assert!(frame.field_range_between("temp", 60, 70).unwrap().is_empty());
    }

    #[test]
    fn test_top_n_merges_shards() {
        let (_dir, frame) = create_frame(FrameOptions::default());
        for col in 0..3 {
            frame.set_bit("standard", 1, col, None).unwrap();
        }
        for col in 0..2 {
            frame.set_bit("standard", 2, col, None).unwrap();
            frame.set_bit("standard", 2, SHARD_WIDTH + col, None).unwrap();
        }
        frame.set_bit("standard", 3, SHARD_WIDTH, None).unwrap();

        let top = frame.top_n("standard", &TopOptions { n: 2, ..Default::default() }).unwrap();
        assert_eq!(top, vec![Pair::new(2, 4), Pair::new(1, 3)]);

        let top = frame
            .top_n(
                "standard",
                &TopOptions {
                    min_threshold: 2,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(top, vec![Pair::new(2, 4), Pair::new(1, 3)]);
        assert!(frame.top_n("inverse", &TopOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_import_fills_inverse_and_time_views() {
        let (_dir, frame) = create_frame(FrameOptions {
            inverse_enabled: true,
            time_quantum: TimeQuantum::new("Y").unwrap(),
            ..Default::default()
        });
        let ts = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap().timestamp_nanos_opt().unwrap();

        let bits = vec![
            Bit::new(1, 10),
            Bit::new(1, 11).with_timestamp(ts),
            Bit::new(2, SHARD_WIDTH + 1),
        ];
        assert_eq!(frame.import(&bits).unwrap(), 8);

        assert_eq!(frame.row("standard", 1).unwrap().bits(), vec![10, 11]);
        assert_eq!(frame.row("standard_2020", 1).unwrap().bits(), vec![11]);
        assert_eq!(frame.row("inverse", 11).unwrap().bits(), vec![1]);
        assert_eq!(frame.row("inverse_2020", 11).unwrap().bits(), vec![1]);
        assert_eq!(frame.row("standard", 2).unwrap().bits(), vec![SHARD_WIDTH + 1]);
    }

    #[test]
    fn test_reopen_restores_schema_and_data() {
        let dir = tempdir().unwrap();
        let storage = StorageConfig::new(dir.path());
        let options = FrameOptions {
            cache_type: CacheType::Lru,
            cache_size: 10,
            fields: vec![Field::int("field0", 10, 20), Field::int("field1", 11, 21)],
            ..Default::default()
        };
        {
            let frame = Frame::create(dir.path().join("f"), "i", "f", options.clone(), &storage).unwrap();
            frame.set_bit("standard", 5, 6, None).unwrap();
            frame.set_field_value(6, "field1", 19).unwrap();
            frame.close().unwrap();
        }

        let frame = Frame::open(dir.path().join("f"), "i", "f", &storage).unwrap();
        assert_eq!(frame.options(), &options);
        assert_eq!(frame.fields(), options.fields);
        assert_eq!(frame.row("standard", 5).unwrap().bits(), vec![6]);
        assert_eq!(frame.field_value(6, "field1").unwrap(), Some(19));
        assert_eq!(view_names(&frame), vec!["field_field1", "standard"]);
    }
}
