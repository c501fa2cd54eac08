use super::{read_result, single_value, Backend, Field, Status};
use crate::error::BackendError;
use crate::registry::Properties;
use crate::utils::{fast_map, FastMap, RandomState};

use crossbeam_utils::CachePadded;
use std::hash::BuildHasher;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const DEFAULT_SEGMENTS: usize = 16;

type Segment = CachePadded<RwLock<FastMap<String, String>>>;

/// A hash map split into independently locked segments. Keys are routed to
/// a segment by hash, so operations on different segments never contend.
pub struct SegmentedBackend {
    segments: Box<[Segment]>,
    build_hasher: RandomState,
}

impl Default for SegmentedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentedBackend {
    /// The registry name of this backend.
    pub const NAME: &'static str = "segmented";

    /// Create a backend with the default number of segments.
    pub fn new() -> Self {
        Self::with_segments(DEFAULT_SEGMENTS, 0)
    }

    /// Create a backend with `segments` segments, rounded up to a power of
    /// two, sharing `capacity` preallocated slots between them.
    pub fn with_segments(segments: usize, capacity: usize) -> Self {
        let segments = segments.max(1).next_power_of_two();
        let per_segment = capacity.div_ceil(segments);
        SegmentedBackend {
            segments: (0..segments)
                .map(|_| CachePadded::new(RwLock::new(fast_map(per_segment))))
                .collect(),
            build_hasher: RandomState::default(),
        }
    }

    /// Configure from harness properties. Reads `segmented.segments` and
    /// `capacity`.
    pub fn from_properties(props: &Properties) -> Result<Self, BackendError> {
        let segments = props
            .parse::<usize>("segmented.segments")?
            .unwrap_or(DEFAULT_SEGMENTS);
        let capacity = props.parse::<usize>("capacity")?.unwrap_or(0);
        debug!(segments, capacity, "creating segmented backend");
        Ok(Self::with_segments(segments, capacity))
    }

    /// The number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_of(&self, key: &str) -> &Segment {
        let hash = self.build_hasher.hash_one(key);
        // The count is a power of two.
        &self.segments[(hash as usize) & (self.segments.len() - 1)]
    }

    fn read_segment(&self, key: &str) -> RwLockReadGuard<'_, FastMap<String, String>> {
        self.segment_of(key)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_segment(&self, key: &str) -> RwLockWriteGuard<'_, FastMap<String, String>> {
        self.segment_of(key)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for SegmentedBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn read(
        &self,
        _table: &str,
        key: &str,
        _fields: Option<&[String]>,
        result: &mut Vec<Field>,
    ) -> Result<Status, BackendError> {
        let value = self.read_segment(key).get(key).cloned();
        Ok(read_result(key, value, result))
    }

    fn update(&self, table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        self.insert(table, key, values)
    }

    fn insert(&self, _table: &str, key: &str, values: &[Field]) -> Result<Status, BackendError> {
        let value = single_value(key, values)?;
        self.write_segment(key)
            .insert(key.to_string(), value.to_string());
        Ok(Status::Ok)
    }

    fn delete(&self, _table: &str, key: &str) -> Result<Status, BackendError> {
        self.write_segment(key).remove(key);
        Ok(Status::Ok)
    }
}
