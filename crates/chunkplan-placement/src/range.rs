//! Object byte ranges and consecutive part lookups for the read path.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::types::{ObjectId, Part};

/// Non-empty byte range `[start, end)` within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRange {
    /// First byte offset.
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ObjectRange {
    /// Number of bytes in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always false; empty ranges are never constructed.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Clamps a requested range to `[0, obj_size]`.
///
/// A missing start reads from 0; a missing or oversized end reads to the end
/// of the object; a negative start clamps to 0. Returns `None` when nothing
/// is left to read.
pub fn sanitize_object_range(obj_size: u64, start: Option<i64>, end: Option<i64>) -> Option<ObjectRange> {
    let start = start.unwrap_or(0).max(0) as u64;
    let end = match end {
        Some(e) if e < 0 => 0,
        Some(e) => (e as u64).min(obj_size),
        None => obj_size,
    };

    if end <= start {
        return None;
    }
    Some(ObjectRange { start, end })
}

/// Part query handed to a [`PartStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRangeQuery {
    /// Object the parts belong to.
    pub obj: ObjectId,
    /// Upload part number the parts must carry.
    pub upload_part_number: u32,
    /// Parts must start at or after this offset.
    pub start: u64,
    /// Parts must end at or before this offset.
    pub end: u64,
}

impl PartRangeQuery {
    /// Returns true if `part` is a live part matching the query.
    pub fn matches(&self, part: &Part) -> bool {
        !part.deleted
            && part.obj == self.obj
            && part.upload_part_number == self.upload_part_number
            && part.start >= self.start
            && part.start <= self.end
            && part.end <= self.end
    }
}

/// Metadata store queries needed by the read path.
pub trait PartStore: Send + Sync {
    /// Live parts matching `query`, sorted by `start`.
    fn find_parts(&self, query: &PartRangeQuery) -> PlacementResult<Vec<Part>>;
}

/// In-memory part store. Thread-safe via RwLock.
#[derive(Debug, Clone, Default)]
pub struct MemoryPartStore {
    parts: Arc<RwLock<Vec<Part>>>,
}

impl MemoryPartStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a part record.
    pub fn insert(&self, part: Part) -> PlacementResult<()> {
        let mut parts = self.parts.write().map_err(|e| PlacementError::Store {
            reason: e.to_string(),
        })?;
        parts.push(part);
        Ok(())
    }

    /// Number of stored part records, deleted ones included.
    pub fn len(&self) -> usize {
        self.parts.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Returns true if no part was inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartStore for MemoryPartStore {
    fn find_parts(&self, query: &PartRangeQuery) -> PlacementResult<Vec<Part>> {
        let parts = self.parts.read().map_err(|e| PlacementError::Store {
            reason: e.to_string(),
        })?;
        let mut found: Vec<Part> = parts.iter().filter(|p| query.matches(p)).cloned().collect();
        found.sort_by_key(|p| p.start);
        Ok(found)
    }
}

/// Fetches every stored part of `obj` covering the span of `parts`.
///
/// `parts` must be contiguous and share one upload part number.
pub fn find_consecutive_parts(store: &dyn PartStore, obj: &ObjectId, parts: &[Part]) -> PlacementResult<Vec<Part>> {
    let (first, last) = match (parts.first(), parts.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(PlacementError::EmptyPartList),
    };

    let mut pos = first.start;
    for part in parts {
        if part.start != pos {
            return Err(PlacementError::NonConsecutiveParts {
                expected: pos,
                found: part.start,
            });
        }
        if part.upload_part_number != first.upload_part_number {
            return Err(PlacementError::MixedUploadPartNumber {
                expected: first.upload_part_number,
                found: part.upload_part_number,
            });
        }
        pos = part.end;
    }

    let query = PartRangeQuery {
        obj: obj.clone(),
        upload_part_number: first.upload_part_number,
        start: first.start,
        end: last.end,
    };
    let found = store.find_parts(&query)?;
    debug!(
        obj = %obj,
        start = query.start,
        end = query.end,
        found = found.len(),
        "Found consecutive parts"
    );
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkId;

    fn part(obj: &str, start: u64, end: u64, upload_part_number: u32) -> Part {
        Part {
            obj: ObjectId(obj.to_string()),
            chunk: ChunkId(format!("chunk-{}", start)),
            start,
            end,
            part_sequence_number: 0,
            upload_part_number,
            chunk_offset: 0,
            deleted: false,
        }
    }

    #[test]
    fn test_sanitize_defaults_to_whole_object() {
        assert_eq!(
            sanitize_object_range(100, None, None),
            Some(ObjectRange { start: 0, end: 100 })
        );
    }

    #[test]
    fn test_sanitize_clamps() {
        assert_eq!(
            sanitize_object_range(100, Some(-5), Some(500)),
            Some(ObjectRange { start: 0, end: 100 })
        );
        let r = sanitize_object_range(100, Some(10), Some(20)).unwrap();
        assert_eq!(r.len(), 10);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_sanitize_empty_range() {
        assert_eq!(sanitize_object_range(100, Some(50), Some(50)), None);
        assert_eq!(sanitize_object_range(100, Some(60), Some(10)), None);
        assert_eq!(sanitize_object_range(100, Some(200), None), None);
        assert_eq!(sanitize_object_range(0, None, None), None);
        assert_eq!(sanitize_object_range(100, None, Some(-1)), None);
    }

    #[test]
    fn test_find_consecutive_parts() {
        let store = MemoryPartStore::new();
        store.insert(part("o1", 20, 30, 1)).unwrap();
        store.insert(part("o1", 0, 10, 1)).unwrap();
        store.insert(part("o1", 10, 20, 1)).unwrap();
        store.insert(part("o1", 30, 40, 1)).unwrap();
        store.insert(part("o1", 10, 20, 2)).unwrap();
        store.insert(part("o2", 10, 20, 1)).unwrap();
        let mut gone = part("o1", 10, 20, 1);
        gone.deleted = true;
        store.insert(gone).unwrap();
        assert_eq!(store.len(), 7);

        let obj = ObjectId("o1".to_string());
        let found = find_consecutive_parts(&store, &obj, &[part("o1", 0, 10, 1), part("o1", 10, 30, 1)]).unwrap();
        let starts: Vec<u64> = found.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![0, 10, 20]);
    }

    #[test]
    fn test_find_consecutive_parts_rejects_gap() {
        let store = MemoryPartStore::new();
        let obj = ObjectId("o1".to_string());
        let err = find_consecutive_parts(&store, &obj, &[part("o1", 0, 10, 1), part("o1", 15, 20, 1)]).unwrap_err();
        assert!(matches!(err, PlacementError::NonConsecutiveParts { expected: 10, found: 15 }));
    }

    #[test]
    fn test_find_consecutive_parts_rejects_mixed_upload() {
        let store = MemoryPartStore::new();
        let obj = ObjectId("o1".to_string());
        let err = find_consecutive_parts(&store, &obj, &[part("o1", 0, 10, 1), part("o1", 10, 20, 2)]).unwrap_err();
        assert!(matches!(err, PlacementError::MixedUploadPartNumber { expected: 1, found: 2 }));
    }

    #[test]
    fn test_find_consecutive_parts_rejects_empty() {
        let store = MemoryPartStore::new();
        assert!(store.is_empty());
        let obj = ObjectId("o1".to_string());
        assert!(matches!(
            find_consecutive_parts(&store, &obj, &[]),
            Err(PlacementError::EmptyPartList)
        ));
    }
}
