// src/model/network.rs

use crate::error::{Result, SimError, TopologyError};
use crate::model::node::Node;
use crate::model::product::{BomEntry, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Unique index of a node within a [`Network`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction in which a pass walks the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Sinks first; every node comes after all of its successors.
    DownstreamToUpstream,
    /// Sources first; every node comes after all of its predecessors.
    UpstreamToDownstream,
}

/// Collects nodes and edges, then validates them into a [`Network`].
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    nodes: Vec<Node>,
    edges: Vec<(NodeId, NodeId)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Adds a `predecessor -> successor` edge (goods flow downstream along it).
    pub fn add_edge(&mut self, predecessor: NodeId, successor: NodeId) -> &mut Self {
        self.edges.push((predecessor, successor));
        self
    }

    /// Validates the topology, resolves bills of materials and checks every
    /// parameter. Nothing is checked later at run time except numeric blow-ups.
    pub fn build(self) -> Result<Network> {
        let NetworkBuilder { mut nodes, edges } = self;

        if nodes.is_empty() {
            return Err(TopologyError::Empty.into());
        }

        nodes.sort_by_key(|n| n.id);
        for pair in nodes.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(TopologyError::DuplicateNode(pair[0].id).into());
            }
        }

        let positions: BTreeMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        for node in nodes.iter_mut() {
            node.clear_edges();
        }
        for &(from, to) in &edges {
            if from == to {
                return Err(TopologyError::SelfLoop(from).into());
            }
            let from_pos = *positions
                .get(&from)
                .ok_or(TopologyError::UnknownNode(from))?;
            let to_pos = *positions.get(&to).ok_or(TopologyError::UnknownNode(to))?;
            nodes[from_pos].insert_successor(to);
            nodes[to_pos].insert_predecessor(from);
        }

        let successors: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| n.successors().map(|id| positions[&id]).collect())
            .collect();
        let predecessors: Vec<Vec<usize>> = nodes
            .iter()
            .map(|n| n.predecessors().map(|id| positions[&id]).collect())
            .collect();

        let topo = topological_sort(&nodes, &predecessors, &successors)?;

        for node in nodes.iter_mut() {
            node.resolve_external_supply();
        }

        let descendants = closure(&topo, &successors, true);
        let ancestors = closure(&topo, &predecessors, false);
        check_reachability(&nodes, &descendants, &ancestors)?;

        for pos in 0..nodes.len() {
            resolve_bills_of_materials(&mut nodes, pos, &positions)?;
        }
        for node in &nodes {
            node.validate()?;
        }
        check_echelon_scope(&nodes, &descendants)?;

        let downstream_first = group_levels(&topo, &successors, true);
        let upstream_first = group_levels(&topo, &predecessors, false);

        Ok(Network {
            nodes,
            positions,
            topo,
            downstream_first,
            upstream_first,
            descendants,
            ancestors,
        })
    }
}

/// A validated, acyclic supply-chain network.
///
/// Nodes live in an arena sorted by id; edges are stored as id sets on each
/// node record, never as references between nodes.
#[derive(Debug, Clone)]
pub struct Network {
    nodes: Vec<Node>,
    positions: BTreeMap<NodeId, usize>,
    topo: Vec<usize>,
    downstream_first: Vec<Vec<usize>>,
    upstream_first: Vec<Vec<usize>>,
    descendants: Vec<Vec<usize>>,
    ancestors: Vec<Vec<usize>>,
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::new()
    }

    /// Builds a serial chain. `nodes` is the ordering list, upstream-most first;
    /// each node supplies the next one.
    pub fn serial(nodes: Vec<Node>) -> Result<Self> {
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let mut builder = NetworkBuilder::new();
        for node in nodes {
            builder.add_node(node);
        }
        for pair in ids.windows(2) {
            builder.add_edge(pair[0], pair[1]);
        }
        builder.build()
    }

    /// Builds a tree from `(node, parent)` entries. Each parent must appear
    /// earlier in the list than its children; the parent supplies the child.
    pub fn tree(entries: Vec<(Node, Option<NodeId>)>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut builder = NetworkBuilder::new();
        for (node, parent) in entries {
            if let Some(parent) = parent {
                if !seen.contains(&parent) {
                    return Err(TopologyError::UnknownNode(parent).into());
                }
                builder.add_edge(parent, node.id);
            }
            seen.insert(node.id);
            builder.add_node(node);
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.positions.get(&id).map(|&p| &self.nodes[p])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn topological_order(&self) -> Vec<NodeId> {
        self.topo.iter().map(|&p| self.nodes[p].id).collect()
    }

    /// Nodes grouped by depth in the given direction. Nodes in the same group
    /// never depend on each other within a pass.
    pub fn levels(&self, traversal: Traversal) -> Vec<Vec<NodeId>> {
        self.level_positions(traversal)
            .iter()
            .map(|level| level.iter().map(|&p| self.nodes[p].id).collect())
            .collect()
    }

    /// All nodes strictly downstream of `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.positions
            .get(&id)
            .map(|&p| self.descendants[p].iter().map(|&d| self.nodes[d].id).collect())
            .unwrap_or_default()
    }

    /// All nodes strictly upstream of `id`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.positions
            .get(&id)
            .map(|&p| self.ancestors[p].iter().map(|&a| self.nodes[a].id).collect())
            .unwrap_or_default()
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_source())
            .map(|n| n.id)
            .collect()
    }

    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_sink())
            .map(|n| n.id)
            .collect()
    }

    pub fn demand_facing(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.faces_external_demand())
            .map(|n| n.id)
            .collect()
    }

    pub(crate) fn position(&self, id: NodeId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub(crate) fn level_positions(&self, traversal: Traversal) -> &[Vec<usize>] {
        match traversal {
            Traversal::DownstreamToUpstream => &self.downstream_first,
            Traversal::UpstreamToDownstream => &self.upstream_first,
        }
    }

    pub(crate) fn descendant_positions(&self, pos: usize) -> &[usize] {
        &self.descendants[pos]
    }
}

/// Kahn's algorithm, smallest id first among ready nodes.
fn topological_sort(
    nodes: &[Node],
    predecessors: &[Vec<usize>],
    successors: &[Vec<usize>],
) -> Result<Vec<usize>> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&p| in_degree[p] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(pos) = ready.pop_first() {
        order.push(pos);
        for &succ in &successors[pos] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = (0..nodes.len())
            .find(|&p| in_degree[p] > 0)
            .map(|p| nodes[p].id)
            .unwrap_or(nodes[0].id);
        return Err(TopologyError::Cycle(stuck).into());
    }
    Ok(order)
}

/// Transitive closure along `edges`. `forward` walks the topological order
/// backwards so that every neighbour is finished before the node itself.
fn closure(topo: &[usize], edges: &[Vec<usize>], forward: bool) -> Vec<Vec<usize>> {
    let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); edges.len()];
    let order: Vec<usize> = if forward {
        topo.iter().rev().copied().collect()
    } else {
        topo.to_vec()
    };
    for pos in order {
        let mut set = BTreeSet::new();
        for &next in &edges[pos] {
            set.insert(next);
            set.extend(reach[next].iter().copied());
        }
        reach[pos] = set;
    }
    reach.into_iter().map(|s| s.into_iter().collect()).collect()
}

fn group_levels(topo: &[usize], edges: &[Vec<usize>], downstream_first: bool) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; edges.len()];
    let order: Vec<usize> = if downstream_first {
        topo.iter().rev().copied().collect()
    } else {
        topo.to_vec()
    };
    for &pos in &order {
        depth[pos] = edges[pos]
            .iter()
            .map(|&n| depth[n] + 1)
            .max()
            .unwrap_or(0);
    }
    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut levels = vec![Vec::new(); max_depth + 1];
    for (pos, &d) in depth.iter().enumerate() {
        levels[d].push(pos);
    }
    levels
}

fn check_reachability(
    nodes: &[Node],
    descendants: &[Vec<usize>],
    ancestors: &[Vec<usize>],
) -> Result<()> {
    for (pos, node) in nodes.iter().enumerate() {
        let reaches_demand = node.faces_external_demand()
            || descendants[pos]
                .iter()
                .any(|&d| nodes[d].faces_external_demand());
        if !reaches_demand {
            return Err(TopologyError::NoDemandPath(node.id).into());
        }

        if node.faces_external_demand() {
            let supplied = node.receives_external_supply()
                || ancestors[pos]
                    .iter()
                    .any(|&a| nodes[a].receives_external_supply());
            if !supplied {
                return Err(TopologyError::NoSupplyPath(node.id).into());
            }
        }
    }
    Ok(())
}

/// Turns each product's declared bill of materials into concrete supply
/// lines: predecessor products plus, for supplied nodes, one unit of an
/// external raw material identified by the product's own id.
fn resolve_bills_of_materials(
    nodes: &mut [Node],
    pos: usize,
    positions: &BTreeMap<NodeId, usize>,
) -> Result<()> {
    let node = &nodes[pos];
    let node_id = node.id;
    let mut resolved = Vec::with_capacity(node.products.len());

    for product in &node.products {
        let id = ProductId::new(node_id, product.index);
        let mut lines = Vec::new();

        if product.bill_of_materials.is_empty() {
            for pred in node.predecessors() {
                let pred_node = &nodes[positions[&pred]];
                if pred_node.products.len() != 1 {
                    return Err(TopologyError::AmbiguousBillOfMaterials {
                        node: node_id,
                        predecessor: pred,
                    }
                    .into());
                }
                lines.push(BomEntry::new(
                    ProductId::new(pred, pred_node.products[0].index),
                    1.0,
                ));
            }
        } else {
            for entry in &product.bill_of_materials {
                if !entry.ratio.is_finite() || entry.ratio < 0.0 {
                    return Err(SimError::InvalidParameter(format!(
                        "product {id}: consumption ratio {} for {} must be non-negative",
                        entry.ratio, entry.raw_material
                    )));
                }
                let supplier = entry.raw_material.node;
                let hosted = node.has_predecessor(supplier)
                    && positions
                        .get(&supplier)
                        .map(|&p| nodes[p].product_position(entry.raw_material.index).is_some())
                        .unwrap_or(false);
                if !hosted {
                    return Err(TopologyError::InvalidRawMaterial {
                        product: id,
                        raw_material: entry.raw_material,
                    }
                    .into());
                }
                if entry.ratio > 0.0 {
                    lines.push(entry.clone());
                }
            }
        }

        if node.receives_external_supply() {
            lines.push(BomEntry::new(id, 1.0));
        }
        if lines.is_empty() {
            return Err(TopologyError::NoRawMaterial { product: id }.into());
        }
        resolved.push(lines);
    }

    for (product, lines) in nodes[pos].products.iter_mut().zip(resolved) {
        product.set_supply(lines);
    }
    Ok(())
}

fn check_echelon_scope(nodes: &[Node], descendants: &[Vec<usize>]) -> Result<()> {
    for (pos, node) in nodes.iter().enumerate() {
        for product in &node.products {
            if !product.uses_echelon_quantities() {
                continue;
            }
            let single = node.products.len() == 1
                && descendants[pos]
                    .iter()
                    .all(|&d| nodes[d].products.len() == 1);
            if !single {
                return Err(SimError::PolicyParameter {
                    product: ProductId::new(node.id, product.index),
                    reason: "echelon policies and echelon costing need a single-product echelon"
                        .to_string(),
                });
            }
        }
    }
    Ok(())
}
