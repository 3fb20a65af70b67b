//! Arena of aggregator nodes.
//!
//! Nodes are addressed by [`AggregatorId`]. A child always gets a larger id
//! than its parent, which lets a node lend out its whole subtree with
//! `split_at_mut` while it is being collected or materialized.

use crate::aggregations::agg_trait::{Agg, Aggregator, SubCollector};
use crate::aggregations::result::InternalAggregation;
use crate::collector::{
    BucketCollector, BucketOrd, LeafBucketCollector, MultiBucketCollector, NoOpLeafCollector,
    ScoreMode, SegmentCollection,
};
use crate::context::{SearchContext, SegmentContext};
use crate::error::{Error, Result};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::mem;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregatorId(usize);

impl AggregatorId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct AggregatorNode {
    name: String,
    parent: Option<AggregatorId>,
    children: Vec<AggregatorId>,
    by_name: OnceCell<HashMap<String, AggregatorId>>,
    collected: bool,
    aggregator: Aggregator,
}

impl AggregatorNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<AggregatorId> {
        self.parent
    }

    pub fn children(&self) -> &[AggregatorId] {
        &self.children
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Set once a result was materialized from this node.
    pub fn is_collected(&self) -> bool {
        self.collected
    }
}

#[derive(Default)]
pub struct AggregatorTree {
    nodes: Vec<AggregatorNode>,
    roots: Vec<AggregatorId>,
}

impl AggregatorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_root(&mut self, name: impl Into<String>, aggregator: impl Into<Aggregator>) -> Result<AggregatorId> {
        let name = name.into();
        if self.root(&name).is_some() {
            return Err(Error::Configuration(format!(
                "duplicate aggregation name '{}'",
                name
            )));
        }
        let id = self.push(name, None, aggregator.into());
        self.roots.push(id);
        Ok(id)
    }

    pub fn add_child(
        &mut self,
        parent: AggregatorId,
        name: impl Into<String>,
        aggregator: impl Into<Aggregator>,
    ) -> Result<AggregatorId> {
        let name = name.into();
        let parent_node = self.node(parent)?;
        if !parent_node.aggregator.accepts_sub_aggregations() {
            return Err(Error::Configuration(format!(
                "{} aggregation '{}' cannot have sub-aggregations",
                parent_node.aggregator.kind(),
                parent_node.name
            )));
        }
        if self.sub_aggregator(parent, &name)?.is_some() {
            return Err(Error::Configuration(format!(
                "duplicate aggregation name '{}' under '{}'",
                name, parent_node.name
            )));
        }
        let id = self.push(name, Some(parent), aggregator.into());
        let parent_node = &mut self.nodes[parent.0];
        parent_node.children.push(id);
        parent_node.by_name = OnceCell::new();
        Ok(id)
    }

    fn push(&mut self, name: String, parent: Option<AggregatorId>, aggregator: Aggregator) -> AggregatorId {
        let id = AggregatorId(self.nodes.len());
        self.nodes.push(AggregatorNode {
            name,
            parent,
            children: Vec::new(),
            by_name: OnceCell::new(),
            collected: false,
            aggregator,
        });
        id
    }

    pub fn node(&self, id: AggregatorId) -> Result<&AggregatorNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::Configuration(format!("unknown aggregator id {}", id.0)))
    }

    pub fn parent(&self, id: AggregatorId) -> Result<Option<AggregatorId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn roots(&self) -> &[AggregatorId] {
        &self.roots
    }

    pub fn root(&self, name: &str) -> Option<AggregatorId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name == name)
    }

    pub fn sub_aggregators(&self, id: AggregatorId) -> Result<&[AggregatorId]> {
        Ok(&self.node(id)?.children)
    }

    /// Looks up a direct child by name.
    pub fn sub_aggregator(&self, id: AggregatorId, name: &str) -> Result<Option<AggregatorId>> {
        let node = self.node(id)?;
        let by_name = node.by_name.get_or_init(|| {
            node.children
                .iter()
                .map(|child| (self.nodes[child.0].name.clone(), *child))
                .collect()
        });
        Ok(by_name.get(name).copied())
    }

    /// One collector per root, each borrowing its whole subtree.
    pub fn collectors(&mut self) -> Result<Vec<NodeCollector<'_>>> {
        let roots = self.roots.clone();
        let mut slots: Vec<Option<&mut AggregatorNode>> = self.nodes.iter_mut().map(Some).collect();
        roots
            .into_iter()
            .map(|root| node_collector(&mut slots, root))
            .collect()
    }

    /// Materializes `id` for one owning bucket. A node can only be built once.
    pub fn build_aggregation(&mut self, id: AggregatorId, owning_bucket: BucketOrd) -> Result<InternalAggregation> {
        self.check_not_collected(id)?;
        materialize(&mut self.nodes, 0, id, Some(owning_bucket))
    }

    /// Materializes `id` as if it never saw a document. A node can only be built once.
    pub fn build_empty_aggregation(&mut self, id: AggregatorId) -> Result<InternalAggregation> {
        self.check_not_collected(id)?;
        materialize(&mut self.nodes, 0, id, None)
    }

    /// Builds every root for owning bucket 0, in registration order.
    pub fn build_roots(&mut self) -> Result<Vec<InternalAggregation>> {
        let roots = self.roots.clone();
        roots
            .into_iter()
            .map(|root| self.build_aggregation(root, 0))
            .collect()
    }

    fn check_not_collected(&self, id: AggregatorId) -> Result<()> {
        let node = self.node(id)?;
        if node.collected {
            return Err(Error::Reuse(node.name.clone()));
        }
        Ok(())
    }
}

fn node_collector<'t>(
    slots: &mut [Option<&'t mut AggregatorNode>],
    id: AggregatorId,
) -> Result<NodeCollector<'t>> {
    let node = slots
        .get_mut(id.0)
        .and_then(Option::take)
        .ok_or_else(|| Error::Configuration(format!("aggregator {} is reachable twice", id.0)))?;
    let mut pending: Vec<Box<dyn BucketCollector + 't>> = Vec::with_capacity(node.children.len());
    for child in node.children.clone() {
        pending.push(Box::new(node_collector(slots, child)?));
    }
    Ok(NodeCollector {
        node,
        pending,
        sub: None,
    })
}

fn materialize(
    nodes: &mut [AggregatorNode],
    base: usize,
    id: AggregatorId,
    owning_bucket: Option<BucketOrd>,
) -> Result<InternalAggregation> {
    let local = id
        .0
        .checked_sub(base)
        .filter(|local| *local < nodes.len())
        .ok_or_else(|| Error::Configuration(format!("aggregator {} is outside its subtree", id.0)))?;
    let (head, tail) = nodes.split_at_mut(local + 1);
    let node = &mut head[local];
    node.collected = true;
    let mut subs = SubAggregations {
        children: &node.children,
        nodes: tail,
        base: id.0 + 1,
    };
    match owning_bucket {
        Some(owning) => node.aggregator.build(&node.name, owning, &mut subs),
        None => node.aggregator.build_empty(&node.name, &mut subs),
    }
}

/// The children of a node being materialized.
pub struct SubAggregations<'a> {
    children: &'a [AggregatorId],
    nodes: &'a mut [AggregatorNode],
    base: usize,
}

impl SubAggregations<'_> {
    /// Every child's result for `bucket`, in registration order.
    pub fn bucket_aggregations(&mut self, bucket: BucketOrd) -> Result<Vec<InternalAggregation>> {
        let mut results = Vec::with_capacity(self.children.len());
        for child in self.children {
            results.push(materialize(self.nodes, self.base, *child, Some(bucket))?);
        }
        Ok(results)
    }

    pub fn empty_aggregations(&mut self) -> Result<Vec<InternalAggregation>> {
        let mut results = Vec::with_capacity(self.children.len());
        for child in self.children {
            results.push(materialize(self.nodes, self.base, *child, None)?);
        }
        Ok(results)
    }
}

/// Collector for one node and, through its lazily combined children, its subtree.
pub struct NodeCollector<'t> {
    node: &'t mut AggregatorNode,
    pending: Vec<Box<dyn BucketCollector + 't>>,
    sub: Option<Box<dyn BucketCollector + 't>>,
}

impl<'t> NodeCollector<'t> {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    fn sub_collector(&mut self) -> &mut Box<dyn BucketCollector + 't> {
        let pending = &mut self.pending;
        self.sub
            .get_or_insert_with(|| MultiBucketCollector::wrap(mem::take(pending)))
    }
}

impl<'t> BucketCollector for NodeCollector<'t> {
    fn score_mode(&self) -> ScoreMode {
        let own = self.node.aggregator.score_mode();
        match &self.sub {
            Some(sub) => own.combine(sub.score_mode()),
            None => self
                .pending
                .iter()
                .fold(own, |mode, child| mode.combine(child.score_mode())),
        }
    }

    fn pre_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        if self.node.collected {
            return Err(Error::Reuse(self.node.name.clone()));
        }
        debug!(aggregation = %self.node.name, kind = self.node.aggregator.kind(), "pre-collection");
        self.node.aggregator.pre_collection(&self.node.name, ctx)?;
        self.sub_collector().pre_collection(ctx)
    }

    fn post_collection(&mut self, ctx: &SearchContext<'_>) -> Result<()> {
        debug!(aggregation = %self.node.name, "post-collection");
        self.node.aggregator.post_collection(&self.node.name, ctx)?;
        self.sub_collector().post_collection(ctx)
    }

    fn leaf_collector<'s>(
        &'s mut self,
        segment: &SegmentContext<'_>,
    ) -> Result<SegmentCollection<'s>> {
        let Self { node, pending, sub } = self;
        let sub = sub.get_or_insert_with(|| MultiBucketCollector::wrap(mem::take(pending)));
        let sub_leaf: Box<dyn LeafBucketCollector + 's> = match sub.leaf_collector(segment)? {
            SegmentCollection::Collect(leaf) => leaf,
            SegmentCollection::Terminated => Box::new(NoOpLeafCollector),
        };
        let leaf = node
            .aggregator
            .leaf_collector(segment, SubCollector::new(sub_leaf))?;
        Ok(SegmentCollection::Collect(leaf))
    }
}
