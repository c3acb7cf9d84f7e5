//! Holding area for planner output awaiting confirmation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::PlanningResult;

/// A stored planner run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningPreview {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub payload: PlanningResult,
}

/// Token-addressed storage for previews.
///
/// Implementations decide where previews live; callers only rely on a saved
/// payload being readable by its token until it is deleted.
pub trait PreviewStore: Send + Sync {
    /// Stores the payload and returns its opaque token.
    fn save(&self, payload: PlanningResult) -> String;
    fn get(&self, id: &str) -> Option<PlanningPreview>;
    fn delete(&self, id: &str);
    /// Drops previews created before `cutoff`; returns how many went.
    fn purge_created_before(&self, cutoff: DateTime<Utc>) -> usize;
}

/// In-memory preview store.
#[derive(Clone, Default)]
pub struct InMemoryPreviewStore {
    previews: Arc<RwLock<HashMap<String, PlanningPreview>>>,
}

impl InMemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewStore for InMemoryPreviewStore {
    fn save(&self, payload: PlanningResult) -> String {
        let id = Uuid::new_v4().to_string();
        let preview = PlanningPreview {
            id: id.clone(),
            created_at: Utc::now(),
            payload,
        };
        self.previews.write().insert(id.clone(), preview);
        id
    }

    fn get(&self, id: &str) -> Option<PlanningPreview> {
        self.previews.read().get(id).cloned()
    }

    fn delete(&self, id: &str) {
        self.previews.write().remove(id);
    }

    fn purge_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut previews = self.previews.write();
        let before = previews.len();
        previews.retain(|_, p| p.created_at >= cutoff);
        before - previews.len()
    }
}
