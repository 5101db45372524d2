// src/model/node.rs

use crate::error::{Result, SimError, TopologyError};
use crate::model::demand::DemandSource;
use crate::model::disruption::DisruptionProcess;
use crate::model::network::NodeId;
use crate::model::product::{CostAccounting, Product, ProductId};
use crate::strategy::policy::Policy;
use rand::Rng;
use std::collections::BTreeSet;

/// Shipment lead time into a node, in periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadTime {
    Fixed(u32),
    /// Drawn uniformly from `min..=max` once per period.
    DiscreteUniform { min: u32, max: u32 },
}

impl Default for LeadTime {
    fn default() -> Self {
        LeadTime::Fixed(0)
    }
}

impl LeadTime {
    pub fn is_stochastic(&self) -> bool {
        matches!(self, LeadTime::DiscreteUniform { min, max } if min != max)
    }

    /// Shortest lead time the node can realize.
    pub fn shortest(&self) -> u32 {
        match *self {
            LeadTime::Fixed(l) => l,
            LeadTime::DiscreteUniform { min, .. } => min,
        }
    }

    /// Realized lead time for one period. Fixed lead times never touch the RNG.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            LeadTime::Fixed(l) => l,
            LeadTime::DiscreteUniform { min, max } if min == max => min,
            LeadTime::DiscreteUniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

/// A stocking location: its products, lead time and disruption process.
///
/// Edges are kept as id sets and filled in by the network builder.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub products: Vec<Product>,
    pub disruption: DisruptionProcess,
    pub lead_time: LeadTime,
    external_supply: Option<bool>,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeSet<NodeId>,
}

impl Node {
    /// A node with a single implicit product (index 0) that holds continuous
    /// quantities.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            name: None,
            products: vec![Product::new(0).with_whole_units(false)],
            disruption: DisruptionProcess::none(),
            lead_time: LeadTime::default(),
            external_supply: None,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = products;
        self
    }

    pub fn with_lead_time(mut self, periods: u32) -> Self {
        self.lead_time = LeadTime::Fixed(periods);
        self
    }

    pub fn with_stochastic_lead_time(mut self, min: u32, max: u32) -> Self {
        self.lead_time = LeadTime::DiscreteUniform { min, max };
        self
    }

    pub fn with_disruption(mut self, disruption: DisruptionProcess) -> Self {
        self.disruption = disruption;
        self
    }

    /// Overrides the default rule that exactly the source nodes are supplied
    /// from outside the network.
    pub fn with_external_supply(mut self, supplied: bool) -> Self {
        self.external_supply = Some(supplied);
        self
    }

    // Single-product shortcuts. They act on the first product.

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.primary_product_mut().policy = policy;
        self
    }

    pub fn with_demand(mut self, demand: DemandSource) -> Self {
        self.primary_product_mut().demand = demand;
        self
    }

    pub fn with_holding_cost(mut self, rate: f64) -> Self {
        self.primary_product_mut().holding_cost = rate;
        self
    }

    pub fn with_stockout_cost(mut self, rate: f64) -> Self {
        self.primary_product_mut().stockout_cost = rate;
        self
    }

    pub fn with_in_transit_holding_cost(mut self, rate: f64) -> Self {
        self.primary_product_mut().in_transit_holding_cost = Some(rate);
        self
    }

    pub fn with_echelon_holding_cost(mut self, rate: f64) -> Self {
        self.primary_product_mut().cost_accounting = CostAccounting::Echelon {
            echelon_holding_cost: rate,
        };
        self
    }

    pub fn with_initial_inventory(mut self, quantity: f64) -> Self {
        self.primary_product_mut().initial_inventory = quantity;
        self
    }

    pub fn with_initial_orders(mut self, quantity: f64) -> Self {
        self.primary_product_mut().initial_orders = quantity;
        self
    }

    pub fn with_initial_shipments(mut self, quantity: f64) -> Self {
        self.primary_product_mut().initial_shipments = quantity;
        self
    }

    pub fn with_order_capacity(mut self, capacity: f64) -> Self {
        self.primary_product_mut().order_capacity = Some(capacity);
        self
    }

    fn primary_product_mut(&mut self) -> &mut Product {
        if self.products.is_empty() {
            self.products.push(Product::new(0).with_whole_units(false));
        }
        &mut self.products[0]
    }

    pub fn predecessors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors.iter().copied()
    }

    pub fn successors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.iter().copied()
    }

    pub fn has_predecessor(&self, id: NodeId) -> bool {
        self.predecessors.contains(&id)
    }

    pub fn is_source(&self) -> bool {
        self.predecessors.is_empty()
    }

    pub fn is_sink(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn receives_external_supply(&self) -> bool {
        self.external_supply.unwrap_or(self.predecessors.is_empty())
    }

    pub fn faces_external_demand(&self) -> bool {
        self.products.iter().any(|p| !p.demand.is_none())
    }

    pub fn is_single_product(&self) -> bool {
        self.products.len() == 1
    }

    pub fn product_id(&self, position: usize) -> ProductId {
        ProductId::new(self.id, self.products[position].index)
    }

    /// Position of the product with the given index in `products`.
    pub fn product_position(&self, index: u32) -> Option<usize> {
        self.products.iter().position(|p| p.index == index)
    }

    pub(crate) fn clear_edges(&mut self) {
        self.predecessors.clear();
        self.successors.clear();
    }

    pub(crate) fn insert_predecessor(&mut self, id: NodeId) {
        self.predecessors.insert(id);
    }

    pub(crate) fn insert_successor(&mut self, id: NodeId) {
        self.successors.insert(id);
    }

    /// Pins the supply flag once edges are known.
    pub(crate) fn resolve_external_supply(&mut self) {
        self.external_supply = Some(self.receives_external_supply());
    }

    /// Checks per-node parameters. Runs after bills of materials are resolved.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            return Err(SimError::InvalidParameter(format!(
                "node {} hosts no products",
                self.id
            )));
        }
        let mut seen = BTreeSet::new();
        for product in &self.products {
            let id = ProductId::new(self.id, product.index);
            if !seen.insert(product.index) {
                return Err(TopologyError::DuplicateProduct(id).into());
            }
            product.validate(id)?;
        }
        if let LeadTime::DiscreteUniform { min, max } = self.lead_time {
            if min > max {
                return Err(SimError::InvalidParameter(format!(
                    "node {}: lead time range {min}..={max} is empty",
                    self.id
                )));
            }
        }
        self.disruption.validate(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn fixed_lead_time_ignores_rng() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(1);
        assert_eq!(LeadTime::Fixed(3).sample(&mut a), 3);
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn uniform_lead_time_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let lead = LeadTime::DiscreteUniform { min: 1, max: 4 };
        for _ in 0..200 {
            let l = lead.sample(&mut rng);
            assert!((1..=4).contains(&l));
        }
        assert!(lead.is_stochastic());
    }

    #[test]
    fn shortcuts_write_the_implicit_product() {
        let node = Node::new(NodeId(4))
            .with_holding_cost(2.5)
            .with_stockout_cost(9.0)
            .with_initial_inventory(12.0);

        assert!(node.is_single_product());
        assert_eq!(node.products[0].holding_cost, 2.5);
        assert_eq!(node.products[0].stockout_cost, 9.0);
        assert_eq!(node.products[0].initial_inventory, 12.0);
        assert!(!node.products[0].whole_units);
        assert_eq!(node.product_id(0), ProductId::new(NodeId(4), 0));
    }

    #[test]
    fn supply_flag_defaults_to_source() {
        let mut node = Node::new(NodeId(1));
        assert!(node.receives_external_supply());
        node.insert_predecessor(NodeId(0));
        assert!(!node.receives_external_supply());
        let node = node.with_external_supply(true);
        assert!(node.receives_external_supply());
    }

    #[test]
    fn inverted_lead_time_range_is_invalid() {
        let node = Node::new(NodeId(0)).with_stochastic_lead_time(3, 1);
        assert!(matches!(node.validate(), Err(SimError::InvalidParameter(_))));
    }
}
