//! Pending paths per render-target list
//!
//! Everything recorded for a render-target list waits here until the flush
//! that covers the list. The map is owned by the renderer and entries live
//! exactly from first use until `post_flush` erases them.

use rustc_hash::FxHashMap;

use crate::clip_cache::ClipPathMap;
use crate::draw_batch::BatchId;

/// Opaque identity of a render-target list (the draws bound for one target)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetListId(pub u32);

#[derive(Debug, Default)]
pub(crate) struct PendingPaths {
    /// Recorded batches in registration order
    pub draw_batches: Vec<BatchId>,
    pub clip_paths: ClipPathMap,
}

#[derive(Debug, Default)]
pub(crate) struct PendingPathRegistry {
    lists: FxHashMap<RenderTargetListId, PendingPaths>,
}

impl PendingPathRegistry {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn get(&self, list: RenderTargetListId) -> Option<&PendingPaths> {
        self.lists.get(&list)
    }

    pub fn get_mut(&mut self, list: RenderTargetListId) -> Option<&mut PendingPaths> {
        self.lists.get_mut(&list)
    }

    /// The list's pending paths, created on first use.
    pub fn entry(&mut self, list: RenderTargetListId) -> &mut PendingPaths {
        self.lists.entry(list).or_default()
    }

    pub fn remove(&mut self, list: RenderTargetListId) -> Option<PendingPaths> {
        self.lists.remove(&list)
    }

    pub fn record_batch(&mut self, list: RenderTargetListId, batch: BatchId) {
        self.entry(list).draw_batches.push(batch);
    }

    /// Drop `batch` from its list; order of the others is kept.
    pub fn unrecord_batch(&mut self, list: RenderTargetListId, batch: BatchId) {
        if let Some(pending) = self.lists.get_mut(&list) {
            pending.draw_batches.retain(|&b| b != batch);
        }
    }
}
