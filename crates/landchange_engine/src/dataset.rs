//! Lazy partitioned datasets.
//!
//! A [`Dataset`] is a handle to an immutable lineage node. Transformations
//! build new nodes and compute nothing; actions (`collect`, `count`) hand the
//! node to the [`Context`] which schedules one task per partition. Any
//! partition can be recomputed from its declared parents, which is how cached
//! or shuffled data that has been dropped is recovered.

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::Data;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

// ============================================================================
// Lineage nodes
// ============================================================================

/// Identity, display name and work counter of a lineage node.
pub(crate) struct NodeMeta {
    id: u64,
    op: &'static str,
    name: RwLock<String>,
    computations: AtomicU64,
}

impl NodeMeta {
    fn new(ctx: &Context, op: &'static str) -> Self {
        Self {
            id: ctx.next_node_id(),
            op,
            name: RwLock::new(op.to_string()),
            computations: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    fn record_computation(&self, ctx: &Context) {
        self.computations.fetch_add(1, Ordering::Relaxed);
        ctx.counters().inc_partitions_computed();
    }
}

/// Type-erased view of a node, used for scheduling and lineage rendering.
pub(crate) trait Lineage: Send + Sync {
    fn meta(&self) -> &NodeMeta;

    fn num_partitions(&self) -> usize;

    fn parents(&self) -> Vec<Arc<dyn Lineage>>;

    /// Parents that still need preparing before this node's tasks run.
    fn pending_parents(&self) -> Vec<Arc<dyn Lineage>> {
        self.parents()
    }

    /// Materialise job-level state (shuffle map outputs) ahead of result tasks.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn is_persisted(&self) -> bool {
        false
    }
}

pub(crate) trait Node<T>: Lineage {
    fn compute(&self, partition: usize) -> Result<Vec<T>>;

    /// Drop one cached partition. Returns whether anything was dropped.
    fn evict(&self, _partition: usize) -> bool {
        false
    }

    /// Drop every cached partition.
    fn clear(&self) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SourceNode<T> {
    meta: NodeMeta,
    ctx: Context,
    slices: Vec<Arc<Vec<T>>>,
}

impl<T: Data> Lineage for SourceNode<T> {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn num_partitions(&self) -> usize {
        self.slices.len()
    }

    fn parents(&self) -> Vec<Arc<dyn Lineage>> {
        Vec::new()
    }
}

impl<T: Data> Node<T> for SourceNode<T> {
    fn compute(&self, partition: usize) -> Result<Vec<T>> {
        self.meta.record_computation(&self.ctx);
        Ok(self.slices[partition].as_ref().clone())
    }
}

type PartitionFn<T, U> = dyn Fn(usize, Vec<T>) -> Vec<U> + Send + Sync;

struct MapPartitionsNode<T, U> {
    meta: NodeMeta,
    ctx: Context,
    parent: Dataset<T>,
    f: Arc<PartitionFn<T, U>>,
}

impl<T: Data, U: Data> Lineage for MapPartitionsNode<T, U> {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn num_partitions(&self) -> usize {
        self.parent.num_partitions()
    }

    fn parents(&self) -> Vec<Arc<dyn Lineage>> {
        vec![self.parent.lineage.clone()]
    }
}

impl<T: Data, U: Data> Node<U> for MapPartitionsNode<T, U> {
    fn compute(&self, partition: usize) -> Result<Vec<U>> {
        let items = self.parent.compute_partition(partition)?;
        self.meta.record_computation(&self.ctx);
        Ok((self.f)(partition, items))
    }
}

/// Round-robin repartition. Element `j` of parent partition `i` lands in
/// output partition `(i + j) % n`, so reruns place every record identically.
struct ShuffleNode<T> {
    meta: NodeMeta,
    ctx: Context,
    parent: Dataset<T>,
    partitions: usize,
    buckets: Mutex<Option<Arc<Vec<Vec<T>>>>>,
}

impl<T: Data> ShuffleNode<T> {
    fn distribute(&self, parts: Vec<Vec<T>>) -> Arc<Vec<Vec<T>>> {
        let mut buckets: Vec<Vec<T>> = (0..self.partitions).map(|_| Vec::new()).collect();
        for (i, part) in parts.into_iter().enumerate() {
            for (j, item) in part.into_iter().enumerate() {
                buckets[(i + j) % self.partitions].push(item);
            }
        }
        self.ctx.counters().inc_shuffles();
        debug!(
            "Shuffled '{}' into {} partitions",
            self.meta.name(),
            self.partitions
        );
        Arc::new(buckets)
    }
}

impl<T: Data> Lineage for ShuffleNode<T> {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn parents(&self) -> Vec<Arc<dyn Lineage>> {
        vec![self.parent.lineage.clone()]
    }

    fn pending_parents(&self) -> Vec<Arc<dyn Lineage>> {
        if lock(&self.buckets).is_some() {
            Vec::new()
        } else {
            self.parents()
        }
    }

    fn prepare(&self) -> Result<()> {
        if lock(&self.buckets).is_some() {
            return Ok(());
        }
        // Map side runs in parallel outside the bucket lock.
        let parts = self.ctx.run_tasks(&self.parent)?;
        let buckets = self.distribute(parts);
        lock(&self.buckets).get_or_insert(buckets);
        Ok(())
    }
}

impl<T: Data> Node<T> for ShuffleNode<T> {
    fn compute(&self, partition: usize) -> Result<Vec<T>> {
        let mut guard = lock(&self.buckets);
        let existing = guard.clone();
        let buckets = match existing {
            Some(buckets) => buckets,
            None => {
                // Map output lost: replay the parent sequentially inside this task.
                let parts = (0..self.parent.num_partitions())
                    .map(|p| self.parent.compute_partition(p))
                    .collect::<Result<Vec<_>>>()?;
                let buckets = self.distribute(parts);
                *guard = Some(buckets.clone());
                buckets
            }
        };
        drop(guard);
        self.meta.record_computation(&self.ctx);
        Ok(buckets[partition].clone())
    }

    fn clear(&self) {
        *lock(&self.buckets) = None;
    }
}

/// Combinatorial product. Partition `k` pairs left partition `k / m` with
/// right partition `k % m`, where `m` is the right side's partition count.
struct CartesianNode<A, B> {
    meta: NodeMeta,
    ctx: Context,
    left: Dataset<A>,
    right: Dataset<B>,
}

impl<A: Data, B: Data> Lineage for CartesianNode<A, B> {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn num_partitions(&self) -> usize {
        self.left.num_partitions() * self.right.num_partitions()
    }

    fn parents(&self) -> Vec<Arc<dyn Lineage>> {
        vec![self.left.lineage.clone(), self.right.lineage.clone()]
    }
}

impl<A: Data, B: Data> Node<(A, B)> for CartesianNode<A, B> {
    fn compute(&self, partition: usize) -> Result<Vec<(A, B)>> {
        let width = self.right.num_partitions();
        let left = self.left.compute_partition(partition / width)?;
        let right = self.right.compute_partition(partition % width)?;
        self.meta.record_computation(&self.ctx);

        let mut pairs = Vec::with_capacity(left.len() * right.len());
        for a in &left {
            for b in &right {
                pairs.push((a.clone(), b.clone()));
            }
        }
        Ok(pairs)
    }
}

/// Per-partition cache. Concurrent tasks asking for the same missing
/// partition wait on its slot, so the parent computes it once.
struct CachedNode<T> {
    meta: NodeMeta,
    ctx: Context,
    parent: Dataset<T>,
    slots: Vec<Mutex<Option<Arc<Vec<T>>>>>,
}

impl<T: Data> CachedNode<T> {
    fn fully_cached(&self) -> bool {
        self.slots.iter().all(|slot| lock(slot).is_some())
    }
}

impl<T: Data> Lineage for CachedNode<T> {
    fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    fn num_partitions(&self) -> usize {
        self.slots.len()
    }

    fn parents(&self) -> Vec<Arc<dyn Lineage>> {
        vec![self.parent.lineage.clone()]
    }

    fn pending_parents(&self) -> Vec<Arc<dyn Lineage>> {
        if self.fully_cached() {
            Vec::new()
        } else {
            self.parents()
        }
    }

    fn is_persisted(&self) -> bool {
        true
    }
}

impl<T: Data> Node<T> for CachedNode<T> {
    fn compute(&self, partition: usize) -> Result<Vec<T>> {
        let mut slot = lock(&self.slots[partition]);
        if let Some(items) = slot.as_ref() {
            self.ctx.counters().inc_cache_hits();
            return Ok(items.as_ref().clone());
        }
        let items = Arc::new(self.parent.compute_partition(partition)?);
        self.meta.record_computation(&self.ctx);
        *slot = Some(items.clone());
        Ok(items.as_ref().clone())
    }

    fn evict(&self, partition: usize) -> bool {
        self.slots
            .get(partition)
            .map(|slot| lock(slot).take().is_some())
            .unwrap_or(false)
    }

    fn clear(&self) {
        for slot in &self.slots {
            lock(slot).take();
        }
    }
}

// ============================================================================
// Dataset handle
// ============================================================================

/// Lazy, partitioned, immutable collection. Clone is cheap and shares lineage.
pub struct Dataset<T> {
    ctx: Context,
    node: Arc<dyn Node<T>>,
    lineage: Arc<dyn Lineage>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            node: self.node.clone(),
            lineage: self.lineage.clone(),
        }
    }
}

impl<T: Data> Dataset<T> {
    fn from_node<N: Node<T> + 'static>(ctx: Context, node: N) -> Self {
        let node = Arc::new(node);
        Self {
            ctx,
            node: node.clone(),
            lineage: node,
        }
    }

    pub(crate) fn from_source(ctx: Context, items: Vec<T>, partitions: usize) -> Self {
        let len = items.len();
        let mut items = items.into_iter();
        let slices = (0..partitions)
            .map(|i| {
                let start = i * len / partitions;
                let end = (i + 1) * len / partitions;
                Arc::new(items.by_ref().take(end - start).collect::<Vec<_>>())
            })
            .collect();
        let meta = NodeMeta::new(&ctx, "parallelize");
        let node = SourceNode {
            meta,
            ctx: ctx.clone(),
            slices,
        };
        Self::from_node(ctx, node)
    }

    pub(crate) fn lineage(&self) -> &Arc<dyn Lineage> {
        &self.lineage
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn id(&self) -> u64 {
        self.lineage.meta().id()
    }

    pub fn name(&self) -> String {
        self.lineage.meta().name()
    }

    /// Set the display name used in logs and lineage output.
    pub fn with_name(self, name: &str) -> Self {
        self.lineage.meta().set_name(name);
        self
    }

    pub fn num_partitions(&self) -> usize {
        self.lineage.num_partitions()
    }

    /// How many times this node has computed a partition (cache hits excluded).
    pub fn computations(&self) -> u64 {
        self.lineage.meta().computations.load(Ordering::Relaxed)
    }

    pub fn is_persisted(&self) -> bool {
        self.lineage.is_persisted()
    }

    pub(crate) fn compute_partition(&self, partition: usize) -> Result<Vec<T>> {
        let partitions = self.num_partitions();
        if partition >= partitions {
            return Err(EngineError::PartitionOutOfRange {
                dataset: self.name(),
                partition,
                partitions,
            });
        }
        self.node.compute(partition)
    }

    // ------------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------------

    pub fn map_partitions<U, F>(&self, f: F) -> Dataset<U>
    where
        U: Data,
        F: Fn(usize, Vec<T>) -> Vec<U> + Send + Sync + 'static,
    {
        self.derive("map_partitions", f)
    }

    pub fn map<U, F>(&self, f: F) -> Dataset<U>
    where
        U: Data,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.derive("map", move |_, items| items.into_iter().map(&f).collect())
    }

    pub fn filter<F>(&self, f: F) -> Dataset<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.derive("filter", move |_, items| {
            items.into_iter().filter(|item| f(item)).collect()
        })
    }

    pub fn flat_map<U, I, F>(&self, f: F) -> Dataset<U>
    where
        U: Data,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        self.derive("flat_map", move |_, items| {
            items.into_iter().flat_map(&f).collect()
        })
    }

    fn derive<U, F>(&self, op: &'static str, f: F) -> Dataset<U>
    where
        U: Data,
        F: Fn(usize, Vec<T>) -> Vec<U> + Send + Sync + 'static,
    {
        let node = MapPartitionsNode {
            meta: NodeMeta::new(&self.ctx, op),
            ctx: self.ctx.clone(),
            parent: self.clone(),
            f: Arc::new(f),
        };
        Dataset::from_node(self.ctx.clone(), node)
    }

    /// Redistribute records over `partitions` partitions (a shuffle).
    pub fn repartition(&self, partitions: usize) -> Dataset<T> {
        let node = ShuffleNode {
            meta: NodeMeta::new(&self.ctx, "repartition"),
            ctx: self.ctx.clone(),
            parent: self.clone(),
            partitions: partitions.max(1),
            buckets: Mutex::new(None),
        };
        Dataset::from_node(self.ctx.clone(), node)
    }

    /// Pair every record with every record of `other`.
    ///
    /// Output size is `self.count() * other.count()` and the partition count is
    /// the product of both sides' counts.
    pub fn cartesian<U: Data>(&self, other: &Dataset<U>) -> Dataset<(T, U)> {
        let node = CartesianNode {
            meta: NodeMeta::new(&self.ctx, "cartesian"),
            ctx: self.ctx.clone(),
            left: self.clone(),
            right: other.clone(),
        };
        Dataset::from_node(self.ctx.clone(), node)
    }

    /// Cache each partition after its first computation.
    ///
    /// Returns a new handle; the receiver itself stays uncached.
    pub fn persist(&self) -> Dataset<T> {
        let node = CachedNode {
            meta: NodeMeta::new(&self.ctx, "persist"),
            ctx: self.ctx.clone(),
            parent: self.clone(),
            slots: (0..self.num_partitions()).map(|_| Mutex::new(None)).collect(),
        };
        let cached = Dataset::from_node(self.ctx.clone(), node);
        cached.lineage.meta().set_name(&self.name());
        cached
    }

    /// Drop one cached partition; the next action recomputes it from lineage.
    pub fn evict_partition(&self, partition: usize) -> bool {
        self.node.evict(partition)
    }

    /// Drop all cached data held by this node.
    pub fn unpersist(&self) {
        self.node.clear();
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    pub fn collect_partitions(&self) -> Result<Vec<Vec<T>>> {
        self.ctx.run_job(self)
    }

    pub fn collect(&self) -> Result<Vec<T>> {
        Ok(self.collect_partitions()?.into_iter().flatten().collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self
            .collect_partitions()?
            .iter()
            .map(Vec::len)
            .sum())
    }

    /// Render the lineage tree, one node per line.
    pub fn to_debug_string(&self) -> String {
        let mut out = String::new();
        render(&self.lineage, 0, &mut out);
        out
    }
}

fn render(node: &Arc<dyn Lineage>, depth: usize, out: &mut String) {
    let indent = " |  ".repeat(depth);
    let marker = if node.is_persisted() { ", persisted" } else { "" };
    let _ = writeln!(
        out,
        "{}({}) {} [{}{}]",
        indent,
        node.num_partitions(),
        node.meta().name(),
        node.meta().op,
        marker
    );
    for parent in node.parents() {
        render(&parent, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;

    fn ctx() -> Context {
        Context::new(EngineConfig::with_threads(4)).unwrap()
    }

    #[test]
    fn source_slices_are_contiguous() {
        let ds = ctx().parallelize((0..10).collect::<Vec<_>>(), 3);
        let parts = ds.collect_partitions().unwrap();
        assert_eq!(parts, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8, 9]]);
    }

    #[test]
    fn more_partitions_than_items_leaves_empty_partitions() {
        let ds = ctx().parallelize(vec!['a', 'b'], 4);
        let parts = ds.collect_partitions().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 2);
    }

    #[test]
    fn map_filter_flat_map_chain() {
        let ds = ctx()
            .parallelize((1..=6).collect::<Vec<i32>>(), 2)
            .map(|x| x * 10)
            .filter(|x| *x != 30)
            .flat_map(|x| vec![x, x + 1]);
        assert_eq!(
            ds.collect().unwrap(),
            vec![10, 11, 20, 21, 40, 41, 50, 51, 60, 61]
        );
    }

    #[test]
    fn repartition_is_round_robin_and_deterministic() {
        let ds = ctx().parallelize((0..6).collect::<Vec<_>>(), 2).repartition(3);
        // parent partitions [0,1,2] and [3,4,5]
        let parts = ds.collect_partitions().unwrap();
        assert_eq!(parts, vec![vec![0, 5], vec![1, 3], vec![2, 4]]);
        assert_eq!(ds.collect_partitions().unwrap(), parts);
    }

    #[test]
    fn shuffle_map_side_runs_once_per_job() {
        let source = ctx().parallelize((0..8).collect::<Vec<_>>(), 4);
        let mapped = source.map(|x| x + 1);
        let shuffled = mapped.repartition(2);
        assert_eq!(shuffled.count().unwrap(), 8);
        assert_eq!(mapped.computations(), 4);
        assert_eq!(shuffled.context().metrics().shuffles, 1);
    }

    #[test]
    fn cartesian_pairs_every_record() {
        let c = ctx();
        let left = c.parallelize(vec![1, 2, 3], 2);
        let right = c.parallelize(vec!["a", "b"], 2);
        let product = left.cartesian(&right);
        assert_eq!(product.num_partitions(), 4);
        let mut pairs = product.collect().unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![(1, "a"), (1, "b"), (2, "a"), (2, "b"), (3, "a"), (3, "b")]
        );
    }

    #[test]
    fn persisted_partitions_compute_once() {
        let base = ctx().parallelize((0..4).collect::<Vec<_>>(), 2).map(|x| x * 2);
        let cached = base.persist();
        assert_eq!(cached.collect().unwrap(), vec![0, 2, 4, 6]);
        assert_eq!(cached.collect().unwrap(), vec![0, 2, 4, 6]);
        assert_eq!(base.computations(), 2);
        assert!(cached.is_persisted());
        assert!(!base.is_persisted());
    }

    #[test]
    fn evicted_partition_is_recomputed_from_lineage() {
        let base = ctx().parallelize((0..4).collect::<Vec<_>>(), 2).map(|x| x + 100);
        let cached = base.persist();
        let first = cached.collect().unwrap();
        assert!(cached.evict_partition(1));
        assert!(!cached.evict_partition(1));
        assert!(!cached.evict_partition(7));
        let second = cached.collect().unwrap();
        assert_eq!(first, second);
        assert_eq!(base.computations(), 3);
    }

    #[test]
    fn unpersist_drops_everything() {
        let base = ctx().parallelize(vec![1, 2, 3], 3).map(|x| x);
        let cached = base.persist();
        cached.count().unwrap();
        cached.unpersist();
        cached.count().unwrap();
        assert_eq!(base.computations(), 6);
    }

    #[test]
    fn names_and_debug_string() {
        let c = ctx();
        let ids = c.parallelize(vec![1, 2], 1).with_name("chip ids");
        let ccd = ids.map(|x| x).with_name("ccd").persist();
        let joined = ccd.cartesian(&c.parallelize(vec!["2014-12-12"], 1));
        let text = joined.to_debug_string();
        assert!(text.starts_with("(1) cartesian [cartesian]"));
        assert!(text.contains("ccd [persist, persisted]"));
        assert!(text.contains("chip ids [parallelize]"));
        assert_eq!(ccd.name(), "ccd");
    }

    #[test]
    fn out_of_range_partition_is_an_error() {
        let ds = ctx().parallelize(vec![1], 1);
        assert!(matches!(
            ds.compute_partition(3),
            Err(EngineError::PartitionOutOfRange { partition: 3, .. })
        ));
    }
}
