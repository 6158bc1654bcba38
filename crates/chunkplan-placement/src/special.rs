//! Special-content classification.
//!
//! A chunk is special when it holds the first or last bytes of an object whose
//! content type is streamable. Losing such a block breaks seek and playback, so
//! special chunks are evaluated with a higher replica target.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::config::PlacementConfig;
use crate::types::{Chunk, ChunkId, ObjectId, ObjectMd, Part};

/// Ids of the chunks classified as special.
pub type SpecialChunks = BTreeSet<ChunkId>;

/// Marks boundary chunks of streamable objects.
#[derive(Debug, Clone)]
pub struct SpecialContentClassifier {
    content_types: HashSet<String>,
}

impl SpecialContentClassifier {
    /// Classifier for the content types configured in `config`.
    pub fn new(config: &PlacementConfig) -> Self {
        Self {
            content_types: config.special_content_types.iter().cloned().collect(),
        }
    }

    /// Returns true if objects of `content_type` get special boundary chunks.
    pub fn is_special_content_type(&self, content_type: &str) -> bool {
        self.content_types.contains(content_type)
    }

    /// Returns true if `part` touches the first or last byte of `obj`.
    pub fn is_boundary_part(part: &Part, obj: &ObjectMd) -> bool {
        part.start == 0 || part.end == obj.size
    }

    /// Classifies a batch. Only chunks present in `chunks` can come back special.
    ///
    /// The result depends only on the chunk, part and object relationships,
    /// never on a chunk's current `is_special` flag.
    pub fn classify(&self, chunks: &[Chunk], parts: &[Part], objects: &[ObjectMd]) -> SpecialChunks {
        let objects_by_id: HashMap<&ObjectId, &ObjectMd> = objects.iter().map(|o| (&o.id, o)).collect();
        let wanted: HashSet<&ChunkId> = chunks.iter().map(|c| &c.id).collect();

        let special: SpecialChunks = parts
            .iter()
            .filter(|part| wanted.contains(&part.chunk))
            .filter(|part| {
                objects_by_id.get(&part.obj).is_some_and(|obj| {
                    self.is_special_content_type(&obj.content_type) && Self::is_boundary_part(part, obj)
                })
            })
            .map(|part| part.chunk.clone())
            .collect();

        debug!(
            chunks = chunks.len(),
            parts = parts.len(),
            special = special.len(),
            "Classified special chunks"
        );
        special
    }

    /// Derived copies of `chunks` with `is_special` set from [`Self::classify`].
    pub fn apply(&self, chunks: &[Chunk], parts: &[Part], objects: &[ObjectMd]) -> Vec<Chunk> {
        let special = self.classify(chunks, parts, objects);
        chunks
            .iter()
            .map(|c| c.with_special(special.contains(&c.id)))
            .collect()
    }
}

impl Default for SpecialContentClassifier {
    fn default() -> Self {
        Self::new(&PlacementConfig::default())
    }
}
