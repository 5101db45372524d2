// src/model/state.rs

use crate::model::disruption::DisruptionState;
use crate::model::network::{Network, NodeId};
use crate::model::node::Node;
use crate::model::pipeline::{Pipeline, Shipment};
use crate::model::product::{Product, ProductId};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Who a backorder is owed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Customer {
    External,
    Node(NodeId),
}

/// Unfilled demand, kept in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backorder {
    /// Period the demand arrived in; `None` for orders outstanding before
    /// the run started.
    pub period: Option<usize>,
    pub customer: Customer,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostComponents {
    pub holding: f64,
    pub stockout: f64,
    pub in_transit_holding: f64,
}

impl CostComponents {
    pub fn total(&self) -> f64 {
        self.holding + self.stockout + self.in_transit_holding
    }
}

/// State of one product at one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductState {
    pub product: ProductId,
    pub on_hand: f64,
    backlog: VecDeque<Backorder>,
    /// Finished units ordered but not yet produced.
    pub pending_production: f64,

    // Flows of the current period
    pub external_demand: f64,
    pub demand_clipped: bool,
    /// External demand plus successor orders registered this period.
    pub demand: f64,
    pub order_quantity: f64,
    pub shipped: f64,
    /// Finished units added to on-hand by production.
    pub received: f64,
    pub demand_met_from_stock: f64,
    pub inventory_position: f64,
    pub costs: CostComponents,
}

impl ProductState {
    pub fn new(product: ProductId, initial_inventory: f64) -> Self {
        Self {
            product,
            on_hand: initial_inventory,
            backlog: VecDeque::new(),
            pending_production: 0.0,
            external_demand: 0.0,
            demand_clipped: false,
            demand: 0.0,
            order_quantity: 0.0,
            shipped: 0.0,
            received: 0.0,
            demand_met_from_stock: 0.0,
            inventory_position: initial_inventory,
            costs: CostComponents::default(),
        }
    }

    pub fn backorders(&self) -> f64 {
        self.backlog.iter().fold(0.0, |total, b| total + b.quantity)
    }

    /// On-hand minus backorders.
    pub fn inventory_level(&self) -> f64 {
        self.on_hand - self.backorders()
    }

    pub fn backlog(&self) -> impl Iterator<Item = &Backorder> {
        self.backlog.iter()
    }

    pub(crate) fn begin_period(&mut self) {
        self.external_demand = 0.0;
        self.demand_clipped = false;
        self.demand = 0.0;
        self.order_quantity = 0.0;
        self.shipped = 0.0;
        self.received = 0.0;
        self.demand_met_from_stock = 0.0;
        self.costs = CostComponents::default();
    }

    /// Queues demand behind everything already owed.
    pub(crate) fn register_demand(&mut self, period: usize, customer: Customer, quantity: f64) {
        self.demand += quantity;
        if quantity > 0.0 {
            self.backlog.push_back(Backorder {
                period: Some(period),
                customer,
                quantity,
            });
        }
    }

    /// Queues an order placed before period 0.
    pub(crate) fn register_opening_order(&mut self, customer: Customer, quantity: f64) {
        if quantity > 0.0 {
            self.backlog.push_back(Backorder {
                period: None,
                customer,
                quantity,
            });
        }
    }

    /// Ships on-hand against the queue, oldest first. Returns the quantity
    /// allocated to each customer, merged for consecutive entries.
    pub(crate) fn fill_backorders(&mut self, period: usize) -> Vec<(Customer, f64)> {
        let mut allocations: Vec<(Customer, f64)> = Vec::new();

        while self.on_hand > 0.0 {
            let Some(front) = self.backlog.front_mut() else {
                break;
            };
            let quantity = front.quantity.min(self.on_hand);
            front.quantity -= quantity;
            self.on_hand -= quantity;
            self.shipped += quantity;
            if front.period == Some(period) {
                self.demand_met_from_stock += quantity;
            }

            match allocations.last_mut() {
                Some((customer, total)) if *customer == front.customer => *total += quantity,
                _ => allocations.push((front.customer, quantity)),
            }

            if front.quantity <= 0.0 {
                self.backlog.pop_front();
            }
        }

        allocations
    }
}

/// Everything a node carries from one period to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub node: NodeId,
    pub disruption: DisruptionState,
    /// Lead time realized this period for shipments into this node.
    pub lead_time: u32,
    pub products: Vec<ProductState>,
    /// Usable raw materials, keyed by material.
    pub raw_materials: BTreeMap<ProductId, f64>,
    /// Material ordered and not yet arrived.
    pub on_order: BTreeMap<ProductId, f64>,
    /// Arrived material blocked by a receipt disruption.
    pub held_receipts: BTreeMap<ProductId, f64>,
    /// Inbound shipments.
    pub pipeline: Pipeline,
    pub(crate) external_orders: Vec<(ProductId, f64)>,
}

impl NodeState {
    pub fn new(node: &Node) -> Self {
        let products = node
            .products
            .iter()
            .enumerate()
            .map(|(i, p)| ProductState::new(node.product_id(i), p.initial_inventory))
            .collect();

        let materials: BTreeMap<ProductId, f64> = node
            .products
            .iter()
            .flat_map(|p| p.supply().iter().map(|line| (line.raw_material, 0.0)))
            .collect();

        let mut state = Self {
            node: node.id,
            disruption: DisruptionState::Up,
            lead_time: 0,
            products,
            raw_materials: materials.clone(),
            on_order: materials.clone(),
            held_receipts: materials,
            pipeline: Pipeline::new(),
            external_orders: Vec::new(),
        };
        state.prime_pipeline(node);
        state
    }

    /// Puts each product's initial shipments into the pipeline, one batch
    /// due in each of the first `shortest lead time` periods.
    fn prime_pipeline(&mut self, node: &Node) {
        let lead_time = node.lead_time.shortest();
        for (position, product) in node.products.iter().enumerate() {
            let quantity = product.initial_shipments;
            if quantity <= 0.0 || lead_time == 0 {
                continue;
            }
            for line in product.supply() {
                let material = line.raw_material;
                let source = (material.node != node.id).then_some(material.node);
                for remaining in 0..lead_time {
                    self.pipeline.push(Shipment {
                        material,
                        source,
                        quantity: quantity * line.ratio,
                        remaining,
                    });
                }
                *self.on_order.entry(material).or_insert(0.0) +=
                    quantity * line.ratio * f64::from(lead_time);
            }
            self.products[position].pending_production += quantity * f64::from(lead_time);
        }
    }

    /// Initial state of every node, ascending by id. Initial orders are
    /// queued at the suppliers, or shipped by the external supplier to
    /// arrive after the shortest lead time.
    pub fn initial_states(network: &Network) -> Vec<NodeState> {
        let mut states: Vec<NodeState> = network.nodes().iter().map(NodeState::new).collect();

        for (pos, node) in network.nodes().iter().enumerate() {
            for (position, product) in node.products.iter().enumerate() {
                let quantity = product.initial_orders;
                if quantity <= 0.0 {
                    continue;
                }
                states[pos].products[position].pending_production += quantity;

                for line in product.supply() {
                    let material = line.raw_material;
                    let amount = quantity * line.ratio;
                    *states[pos].on_order.entry(material).or_insert(0.0) += amount;

                    if material.node == node.id {
                        states[pos].pipeline.push(Shipment {
                            material,
                            source: None,
                            quantity: amount,
                            remaining: node.lead_time.shortest(),
                        });
                        continue;
                    }
                    let supplier = network.position(material.node).and_then(|sp| {
                        network.nodes()[sp]
                            .product_position(material.index)
                            .map(|pp| (sp, pp))
                    });
                    if let Some((sp, pp)) = supplier {
                        states[sp].products[pp]
                            .register_opening_order(Customer::Node(node.id), amount);
                    }
                }
            }
        }
        states
    }

    pub fn is_down(&self) -> bool {
        self.disruption == DisruptionState::Down
    }

    pub(crate) fn begin_period(&mut self) {
        for product in &mut self.products {
            product.begin_period();
        }
        self.external_orders.clear();
    }

    /// Local inventory position of the product at `position`: inventory
    /// level plus the finished units that the material already on order or
    /// on hand can make. Material earmarked for the pending production of
    /// sibling products is not counted.
    pub fn local_inventory_position(&self, position: usize, products: &[Product]) -> f64 {
        let inbound = products[position]
            .supply()
            .iter()
            .map(|line| {
                let m = line.raw_material;
                let pool = self.on_order.get(&m).copied().unwrap_or(0.0)
                    + self.raw_materials.get(&m).copied().unwrap_or(0.0)
                    + self.held_receipts.get(&m).copied().unwrap_or(0.0);
                ((pool - self.earmarked(m, position, products)) / line.ratio).max(0.0)
            })
            .fold(f64::INFINITY, f64::min);
        let inbound = if inbound.is_finite() { inbound } else { 0.0 };
        self.products[position].inventory_level() + inbound
    }

    /// Units of `material` needed by the pending production of every product
    /// except the one at `position`.
    fn earmarked(&self, material: ProductId, position: usize, products: &[Product]) -> f64 {
        products
            .iter()
            .enumerate()
            .filter(|&(other, _)| other != position)
            .flat_map(|(other, product)| {
                let pending = self.products[other].pending_production;
                product
                    .supply()
                    .iter()
                    .filter(move |line| line.raw_material == material)
                    .map(move |line| pending * line.ratio)
            })
            .fold(0.0, |total, amount| total + amount)
    }

    /// Material of `product` that is in transit into this node or held at receipt.
    pub fn inbound_in_transit(&self, material: ProductId) -> f64 {
        self.pipeline.quantity_of(material)
            + self.held_receipts.get(&material).copied().unwrap_or(0.0)
    }

    /// All inbound material in transit or held.
    pub fn total_inbound_in_transit(&self) -> f64 {
        self.held_receipts
            .values()
            .fold(self.pipeline.total(), |total, held| total + held)
    }

    /// Records an order of `quantity` finished units and explodes it through
    /// the bill of materials. Returns the per-material quantities owed by
    /// upstream nodes; external material is queued for the external supplier.
    pub(crate) fn place_order(
        &mut self,
        position: usize,
        product: &Product,
        quantity: f64,
    ) -> Vec<(ProductId, f64)> {
        let state = &mut self.products[position];
        state.order_quantity = quantity;
        if quantity <= 0.0 {
            return Vec::new();
        }
        state.pending_production += quantity;

        let mut upstream = Vec::new();
        for line in product.supply() {
            let amount = quantity * line.ratio;
            *self.on_order.entry(line.raw_material).or_insert(0.0) += amount;
            if line.raw_material.node == self.node {
                self.external_orders.push((line.raw_material, amount));
            } else {
                upstream.push((line.raw_material, amount));
            }
        }
        upstream
    }

    /// Takes arrived shipments off order and makes them usable, or holds
    /// them when `hold` is set.
    pub(crate) fn receive(&mut self, shipments: Vec<Shipment>, hold: bool) {
        for shipment in shipments {
            let on_order = self.on_order.entry(shipment.material).or_insert(0.0);
            *on_order = (*on_order - shipment.quantity).max(0.0);
            let target = if hold {
                &mut self.held_receipts
            } else {
                &mut self.raw_materials
            };
            *target.entry(shipment.material).or_insert(0.0) += shipment.quantity;
        }
    }

    pub(crate) fn release_held_receipts(&mut self) {
        for (material, held) in self.held_receipts.iter_mut() {
            if *held > 0.0 {
                *self.raw_materials.entry(*material).or_insert(0.0) += *held;
                *held = 0.0;
            }
        }
    }

    /// Converts raw materials into finished goods, up to each product's
    /// pending production and limited by its scarcest material.
    pub(crate) fn produce(&mut self, node: &Node) {
        for (position, product) in node.products.iter().enumerate() {
            let pending = self.products[position].pending_production;
            if pending <= 0.0 {
                continue;
            }

            let mut quantity = product
                .supply()
                .iter()
                .map(|line| {
                    self.raw_materials
                        .get(&line.raw_material)
                        .copied()
                        .unwrap_or(0.0)
                        / line.ratio
                })
                .fold(pending, f64::min);
            if product.whole_units {
                quantity = quantity.floor();
            }
            if quantity <= 0.0 {
                continue;
            }

            for line in product.supply() {
                let raw = self.raw_materials.entry(line.raw_material).or_insert(0.0);
                *raw = (*raw - quantity * line.ratio).max(0.0);
            }
            let state = &mut self.products[position];
            state.on_hand += quantity;
            state.received += quantity;
            state.pending_production = (state.pending_production - quantity).max(0.0);
        }
    }
}
