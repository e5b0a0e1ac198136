//! Lightweight placements of pooled resources.
//!
//! An instance is a transform plus a key: it shares the pooled geometry and
//! never owns resource lifetime. Creation and disposal bump the pool's ref
//! count through the server, which is what keeps shared data alive while
//! any placement still references it.

use std::collections::HashMap;

use atrium_core::{EntityId, Transform};
use uuid::Uuid;

use crate::handle::AssetId;
use crate::key::CacheKey;

/// Unique identifier for a placed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A placement sharing a pooled resource: relation and lookup only, no
/// ownership of the underlying data.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: InstanceId,
    pub base_key: CacheKey,
    pub transform: Transform,
    pub owner_scene: EntityId,
    /// Pool entry this placement's reference was taken on, so disposal
    /// releases exactly that entry and never a successor under the same
    /// key.
    pub(crate) entry_id: AssetId,
}

/// Placement bookkeeping. Ref counting itself lives in the pool; the table
/// only tracks which placements exist so bulk teardown can release each
/// exactly once.
#[derive(Default)]
pub(crate) struct InstanceTable {
    instances: HashMap<InstanceId, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        base_key: CacheKey,
        entry_id: AssetId,
        transform: Transform,
        owner_scene: EntityId,
    ) -> InstanceId {
        let id = InstanceId::new();
        self.instances.insert(
            id,
            Instance {
                id,
                base_key,
                transform,
                owner_scene,
                entry_id,
            },
        );
        id
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<Instance> {
        self.instances.remove(&id)
    }

    /// Remove every placement referencing `base_key` (bulk teardown).
    pub fn remove_all_for(&mut self, base_key: &CacheKey) -> Vec<Instance> {
        let ids: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|inst| &inst.base_key == base_key)
            .map(|inst| inst.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.instances.remove(&id))
            .collect()
    }

    /// Remove every placement owned by `scene` (scene teardown).
    pub fn remove_all_for_scene(&mut self, scene: EntityId) -> Vec<Instance> {
        let ids: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|inst| inst.owner_scene == scene)
            .map(|inst| inst.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.instances.remove(&id))
            .collect()
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}
