//! Federated collection across object-manager shards.
//!
//! [`ShardRouter`] is an explicit routing table from disjoint identifier
//! ranges to the port that owns them. It is itself an [`ObjectAccessPort`],
//! so the mark phase follows cross-shard references without knowing about
//! shards: every lookup and release is delegated to the owning shard.
//!
//! Assembly is fail-closed. If any shard cannot report its roots or
//! candidates the whole cycle fails and nothing is deleted.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::GcError;
use crate::filter::TraversalFilter;
use crate::gc::hook::{read_candidates, CandidateSet, CollectionHook};
use crate::gc::tracing::log_shard_failure;
use crate::generation::GenerationMark;
use crate::id::{ObjectId, ObjectIdSet, ShardId};
use crate::metrics::CollectionType;
use crate::pins::ClientPinRegistry;
use crate::port::ObjectAccessPort;

struct Shard {
    range: Range<u64>,
    port: Arc<dyn ObjectAccessPort>,
}

/// Routing table of identifier ranges to shard ports.
///
/// Shards are numbered in the order they are added.
#[derive(Default)]
pub struct ShardRouter {
    shards: Vec<Shard>,
    /// Shard indices sorted by range start.
    by_start: Vec<usize>,
}

impl std::fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.shards.iter().map(|s| &s.range))
            .finish()
    }
}

impl ShardRouter {
    /// An empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route identifiers in `range` to `port`.
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidConfig`] if the range is empty or overlaps a range
    /// already in the table.
    pub fn add_shard(
        &mut self,
        range: Range<u64>,
        port: Arc<dyn ObjectAccessPort>,
    ) -> Result<ShardId, GcError> {
        if range.is_empty() {
            return Err(GcError::InvalidConfig(format!(
                "shard range {range:?} is empty"
            )));
        }
        if let Some(existing) = self
            .shards
            .iter()
            .find(|s| s.range.start < range.end && range.start < s.range.end)
        {
            return Err(GcError::InvalidConfig(format!(
                "shard range {range:?} overlaps {:?}",
                existing.range
            )));
        }

        let index = self.shards.len();
        let pos = self
            .by_start
            .partition_point(|&i| self.shards[i].range.start < range.start);
        self.shards.push(Shard { range, port });
        self.by_start.insert(pos, index);
        Ok(ShardId(index))
    }

    /// Builder form of [`add_shard`](Self::add_shard).
    ///
    /// # Errors
    ///
    /// Same as [`add_shard`](Self::add_shard).
    pub fn with_shard(
        mut self,
        range: Range<u64>,
        port: Arc<dyn ObjectAccessPort>,
    ) -> Result<Self, GcError> {
        self.add_shard(range, port)?;
        Ok(self)
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard identifiers in routing-table order.
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> {
        (0..self.shards.len()).map(ShardId)
    }

    /// Identifier range owned by `shard`.
    #[must_use]
    pub fn range_of(&self, shard: ShardId) -> Option<Range<u64>> {
        self.shards.get(shard.0).map(|s| s.range.clone())
    }

    /// Port of `shard`.
    #[must_use]
    pub fn port(&self, shard: ShardId) -> Option<&Arc<dyn ObjectAccessPort>> {
        self.shards.get(shard.0).map(|s| &s.port)
    }

    /// The shard owning `id`, if any.
    #[must_use]
    pub fn owner_of(&self, id: ObjectId) -> Option<ShardId> {
        let raw = id.raw();
        let pos = self
            .by_start
            .partition_point(|&i| self.shards[i].range.start <= raw);
        let index = *self.by_start.get(pos.checked_sub(1)?)?;
        self.shards[index].range.contains(&raw).then_some(ShardId(index))
    }

    /// Split `ids` by owning shard. Identifiers no shard owns are returned
    /// separately.
    #[must_use]
    pub fn partition(&self, ids: &ObjectIdSet) -> (BTreeMap<ShardId, ObjectIdSet>, ObjectIdSet) {
        let mut owned: BTreeMap<ShardId, ObjectIdSet> = BTreeMap::new();
        let mut unowned = ObjectIdSet::new();
        for &id in ids {
            match self.owner_of(id) {
                Some(shard) => {
                    owned.entry(shard).or_default().insert(id);
                }
                None => {
                    unowned.insert(id);
                }
            }
        }
        (owned, unowned)
    }

    fn route(&self, id: ObjectId) -> Result<(ShardId, &dyn ObjectAccessPort), GcError> {
        let shard = self.owner_of(id).ok_or(GcError::NotFound(id))?;
        Ok((shard, self.shards[shard.0].port.as_ref()))
    }

    fn union(
        &self,
        read: impl Fn(&dyn ObjectAccessPort) -> Result<ObjectIdSet, GcError>,
    ) -> Result<ObjectIdSet, GcError> {
        let mut all = ObjectIdSet::new();
        for (index, shard) in self.shards.iter().enumerate() {
            let ids = read(shard.port.as_ref()).map_err(|e| shard_error(ShardId(index), e))?;
            all.extend(ids);
        }
        Ok(all)
    }
}

fn shard_error(shard: ShardId, error: GcError) -> GcError {
    log_shard_failure(shard, &error);
    match error {
        GcError::ShardUnavailable { .. } => error,
        other => GcError::ShardUnavailable {
            shard,
            reason: other.to_string(),
        },
    }
}

impl ObjectAccessPort for ShardRouter {
    fn lookup_references(&self, id: ObjectId) -> Result<Vec<ObjectId>, GcError> {
        let (shard, port) = self.route(id)?;
        port.lookup_references(id).map_err(|e| match e {
            GcError::NotFound(_) => e,
            other => shard_error(shard, other),
        })
    }

    fn release(&self, id: ObjectId) {
        if let Ok((_, port)) = self.route(id) {
            port.release(id);
        }
    }

    fn root_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.union(|port| port.root_ids())
    }

    fn all_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.union(|port| port.all_ids())
    }

    fn young_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.union(|port| port.young_ids())
    }

    fn generation_mark(&self) -> Result<GenerationMark, GcError> {
        let mut epochs = Vec::with_capacity(self.shards.len());
        for (index, shard) in self.shards.iter().enumerate() {
            let shard_id = ShardId(index);
            let mark = shard
                .port
                .generation_mark()
                .map_err(|e| shard_error(shard_id, e))?;
            let epoch = mark.as_single().ok_or_else(|| {
                shard_error(
                    shard_id,
                    GcError::InvalidConfig("nested shard routers are not supported".to_string()),
                )
            })?;
            epochs.push(epoch);
        }
        Ok(GenerationMark::from_epochs(epochs))
    }

    fn clear_young_generation(&self, mark: &GenerationMark) -> Result<(), GcError> {
        if mark.epochs().len() != self.shards.len() {
            return Err(GcError::InvalidConfig(format!(
                "generation mark has {} epochs for {} shards",
                mark.epochs().len(),
                self.shards.len()
            )));
        }
        for (index, (shard, &epoch)) in self.shards.iter().zip(mark.epochs()).enumerate() {
            shard
                .port
                .clear_young_generation(&GenerationMark::single(epoch))
                .map_err(|e| shard_error(ShardId(index), e))?;
        }
        Ok(())
    }

    fn create_root(&self, name: &str, id: ObjectId) -> Result<(), GcError> {
        let (shard, port) = self.route(id)?;
        port.create_root(name, id).map_err(|e| shard_error(shard, e))
    }

    fn create_object(&self, id: ObjectId, references: Vec<ObjectId>) -> Result<(), GcError> {
        let (shard, port) = self.route(id)?;
        port.create_object(id, references)
            .map_err(|e| shard_error(shard, e))
    }

    fn evict(&self, id: ObjectId) {
        if let Ok((_, port)) = self.route(id) {
            port.evict(id);
        }
    }

    fn delete_all(&self, garbage: &ObjectIdSet) -> Result<(), GcError> {
        let (owned, _unowned) = self.partition(garbage);
        for (shard, ids) in owned {
            self.shards[shard.0]
                .port
                .delete_all(&ids)
                .map_err(|e| shard_error(shard, e))?;
        }
        Ok(())
    }
}

/// Accepts only identifiers inside one shard's range.
#[derive(Debug, Clone)]
pub struct PartitionFilter {
    shard: ShardId,
    range: Range<u64>,
}

impl PartitionFilter {
    /// Filter for `shard` of `router`, or `None` if the shard is unknown.
    #[must_use]
    pub fn new(router: &ShardRouter, shard: ShardId) -> Option<Self> {
        let range = router.range_of(shard)?;
        Some(Self { shard, range })
    }

    /// The shard this filter admits.
    #[must_use]
    pub const fn shard(&self) -> ShardId {
        self.shard
    }
}

impl TraversalFilter for PartitionFilter {
    fn should_visit(&self, id: ObjectId) -> bool {
        self.range.contains(&id.raw())
    }
}

/// Hook unioning roots, candidates and pins across every shard.
pub struct ActiveActiveGcHook {
    router: Arc<ShardRouter>,
    pins: Arc<ClientPinRegistry>,
    partition: Option<PartitionFilter>,
}

impl ActiveActiveGcHook {
    /// Collect across every shard of `router`.
    #[must_use]
    pub fn new(router: Arc<ShardRouter>, pins: Arc<ClientPinRegistry>) -> Self {
        Self {
            router,
            pins,
            partition: None,
        }
    }

    /// Restrict roots, candidates and traversal to one shard.
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidConfig`] if the router has no such shard.
    pub fn with_partition(mut self, shard: ShardId) -> Result<Self, GcError> {
        let filter = PartitionFilter::new(&self.router, shard)
            .ok_or_else(|| GcError::InvalidConfig(format!("unknown {shard}")))?;
        self.partition = Some(filter);
        Ok(self)
    }

    /// The routing table.
    #[must_use]
    pub const fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }

    fn restrict(&self, mut ids: ObjectIdSet) -> ObjectIdSet {
        if let Some(partition) = &self.partition {
            ids.retain(|&id| partition.should_visit(id));
        }
        ids
    }
}

impl CollectionHook for ActiveActiveGcHook {
    fn description(&self) -> &str {
        "active-active"
    }

    fn port(&self) -> &dyn ObjectAccessPort {
        self.router.as_ref()
    }

    fn root_ids(&self) -> Result<ObjectIdSet, GcError> {
        let mut roots = self.router.root_ids()?;
        self.pins.add_referenced_ids_to(&mut roots);
        Ok(self.restrict(roots))
    }

    fn candidates(&self, collection_type: CollectionType) -> Result<CandidateSet, GcError> {
        let mut candidates = read_candidates(self.router.as_ref(), collection_type)?;
        candidates.ids = self.restrict(candidates.ids);
        Ok(candidates)
    }

    fn partition_filter(&self) -> Option<&dyn TraversalFilter> {
        self.partition
            .as_ref()
            .map(|p| p as &dyn TraversalFilter)
    }
}
