// src/simulation/engine.rs

use crate::error::{Result, SimError, TopologyError};
use crate::model::network::{Network, NodeId, Traversal};
use crate::model::node::Node;
use crate::model::pipeline::Shipment;
use crate::model::product::{CostAccounting, ProductId};
use crate::model::state::{CostComponents, Customer, NodeState};
use crate::simulation::config::{ConcurrencyMode, SimulationConfig};
use crate::simulation::results::{PeriodRecord, SimulationResults};
use crate::strategy::policy::OrderContext;
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    NotStarted,
    Running,
    Complete,
    /// A period failed; only `reset()` leaves this phase.
    Aborted,
}

/// An order travelling upstream, delivered to the supplier within the same pass.
#[derive(Debug, Clone, Copy)]
struct OrderMessage {
    material: ProductId,
    customer: NodeId,
    quantity: f64,
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    recipient: usize,
    shipment: Shipment,
}

/// Runs a network period by period.
pub struct Simulation {
    network: Network,
    config: SimulationConfig,
    phase: SimulationPhase,
    period: usize,
    rng: StdRng,
    states: Vec<NodeState>,
    results: SimulationResults,
}

impl Simulation {
    pub fn new(network: Network, config: SimulationConfig) -> Self {
        let states = NodeState::initial_states(&network);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            network,
            config,
            phase: SimulationPhase::NotStarted,
            period: 0,
            rng,
            states,
            results: SimulationResults::default(),
        }
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    /// Next period to be simulated.
    pub fn period(&self) -> usize {
        self.period
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn results(&self) -> &SimulationResults {
        &self.results
    }

    /// Current state of every node, ascending by id.
    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    pub fn node_state(&self, id: NodeId) -> Option<&NodeState> {
        self.network.position(id).map(|p| &self.states[p])
    }

    /// Runs every remaining period.
    pub fn run(&mut self) -> Result<&SimulationResults> {
        loop {
            self.step()?;
            if self.phase == SimulationPhase::Complete {
                return Ok(&self.results);
            }
        }
    }

    /// Simulates one period. The first call starts the run; once the last
    /// period is done the phase becomes `Complete`.
    pub fn step(&mut self) -> Result<()> {
        match self.phase {
            SimulationPhase::Complete => return Err(SimError::AlreadyComplete),
            SimulationPhase::Aborted => return Err(SimError::RunAborted),
            SimulationPhase::NotStarted => {
                info!(
                    "Starting simulation: {} nodes, {} periods, seed {}, {:?}",
                    self.network.len(),
                    self.config.num_periods,
                    self.config.seed,
                    self.config.concurrency
                );
                self.phase = SimulationPhase::Running;
            }
            SimulationPhase::Running => {}
        }

        if self.period < self.config.num_periods {
            if let Err(e) = self.execute_period() {
                warn!("Simulation aborted in period {}: {}", self.period, e);
                self.phase = SimulationPhase::Aborted;
                return Err(e);
            }
            self.period += 1;
        }

        if self.period >= self.config.num_periods {
            self.phase = SimulationPhase::Complete;
            info!(
                "Simulation complete after {} periods: total cost {:.2}, average {:.2} per period",
                self.results.num_periods(),
                self.results.total_cost(),
                self.results.average_cost_per_period()
            );
        }
        Ok(())
    }

    /// Back to period 0 with the initial state and a freshly seeded RNG.
    pub fn reset(&mut self) {
        self.states = NodeState::initial_states(&self.network);
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.results.clear();
        self.period = 0;
        self.phase = SimulationPhase::NotStarted;
    }

    fn execute_period(&mut self) -> Result<()> {
        debug!("=== Period {} ===", self.period);

        for state in &mut self.states {
            state.begin_period();
        }

        // =================================================================
        // EVENTS 1-2: EXOGENOUS RANDOMNESS
        // The only place the RNG is touched, always in node-id order.
        // =================================================================
        self.advance_disruptions();
        self.draw_exogenous()?;

        // =================================================================
        // EVENT 3: DEMAND AND ORDERS (downstream -> upstream)
        // =================================================================
        self.place_orders()?;

        // =================================================================
        // EVENT 4: SHIPMENTS FROM STOCK (upstream -> downstream)
        // =================================================================
        self.ship_from_stock()?;

        // =================================================================
        // EVENT 5: RECEIPTS, PRODUCTION, BACKORDERS (upstream -> downstream)
        // =================================================================
        self.receive_and_produce()?;

        // =================================================================
        // EVENT 6: COSTS AND RECORDS
        // =================================================================
        let cost = self.record_period()?;
        debug!("Period {} network cost {:.2}", self.period, cost);

        let done = self.period + 1;
        if self.config.progress_interval > 0 && done % self.config.progress_interval == 0 {
            info!(
                "Period {}/{}: average cost {:.2}",
                done,
                self.config.num_periods,
                self.results.average_cost_per_period()
            );
        }
        Ok(())
    }

    fn advance_disruptions(&mut self) {
        for (node, state) in self.network.nodes().iter().zip(self.states.iter_mut()) {
            state.disruption = node
                .disruption
                .next_state(self.period, state.disruption, &mut self.rng);
        }
    }

    fn draw_exogenous(&mut self) -> Result<()> {
        for (node, state) in self.network.nodes().iter().zip(self.states.iter_mut()) {
            state.lead_time = node.lead_time.sample(&mut self.rng);
            for (position, product) in node.products.iter().enumerate() {
                if product.demand.is_none() {
                    continue;
                }
                let id = node.product_id(position);
                let draw = product.demand.draw(self.period, id, &mut self.rng)?;
                if draw.clipped {
                    trace!("Period {}: negative demand for {} clipped to zero", self.period, id);
                }
                let product_state = &mut state.products[position];
                product_state.external_demand = draw.quantity;
                product_state.demand_clipped = draw.clipped;
            }
        }
        Ok(())
    }

    fn place_orders(&mut self) -> Result<()> {
        let mut inbox: Vec<Vec<OrderMessage>> = vec![Vec::new(); self.network.len()];

        for level in self.network.level_positions(Traversal::DownstreamToUpstream) {
            let outcomes = {
                let view = PeriodView::new(&self.network, &self.states, self.period);
                let inbox = &inbox;
                evaluate_level(self.config.concurrency, level, |pos| {
                    view.place_orders(pos, &inbox[pos])
                })?
            };

            for (&pos, (state, orders)) in level.iter().zip(outcomes) {
                self.states[pos] = state;
                for order in orders {
                    let supplier = self
                        .network
                        .position(order.material.node)
                        .ok_or(TopologyError::UnknownNode(order.material.node))?;
                    inbox[supplier].push(order);
                }
            }
        }
        Ok(())
    }

    fn ship_from_stock(&mut self) -> Result<()> {
        for level in self.network.level_positions(Traversal::UpstreamToDownstream) {
            let outcomes = {
                let view = PeriodView::new(&self.network, &self.states, self.period);
                evaluate_level(self.config.concurrency, level, |pos| view.ship_from_stock(pos))?
            };
            apply_deliveries(&mut self.states, level, outcomes);
        }
        Ok(())
    }

    fn receive_and_produce(&mut self) -> Result<()> {
        for level in self.network.level_positions(Traversal::UpstreamToDownstream) {
            let outcomes = {
                let view = PeriodView::new(&self.network, &self.states, self.period);
                evaluate_level(self.config.concurrency, level, |pos| view.receive_and_produce(pos))?
            };
            apply_deliveries(&mut self.states, level, outcomes);
        }
        Ok(())
    }

    fn record_period(&mut self) -> Result<f64> {
        let period = self.period;
        let mut records = Vec::new();
        let mut updates = Vec::new();

        for (pos, node) in self.network.nodes().iter().enumerate() {
            let state = &self.states[pos];
            for (position, product) in node.products.iter().enumerate() {
                let id = node.product_id(position);
                let ps = &state.products[position];
                let backorders = ps.backorders();
                let inventory_level = ps.on_hand - backorders;

                let costs = match product.cost_accounting {
                    CostAccounting::Local => CostComponents {
                        holding: product.local_holding_cost(ps.on_hand, inventory_level),
                        stockout: product.period_stockout_cost(backorders, inventory_level),
                        in_transit_holding: product.effective_in_transit_holding_cost()
                            * self.outbound_in_transit(node, id)?,
                    },
                    CostAccounting::Echelon {
                        echelon_holding_cost,
                    } => CostComponents {
                        holding: echelon_holding_cost * self.echelon_inventory_level(pos),
                        stockout: product.period_stockout_cost(backorders, inventory_level),
                        in_transit_holding: 0.0,
                    },
                };
                let inventory_position = state.local_inventory_position(position, &node.products);

                ensure_finite(period, node.id, "on_hand", ps.on_hand)?;
                ensure_finite(period, node.id, "inventory_position", inventory_position)?;
                ensure_finite(period, node.id, "cost", costs.total())?;

                let materials: Vec<ProductId> =
                    product.supply().iter().map(|l| l.raw_material).collect();
                records.push(PeriodRecord {
                    period,
                    node: node.id,
                    product: id.index,
                    disrupted: state.is_down(),
                    lead_time: state.lead_time,
                    external_demand: ps.external_demand,
                    demand_clipped: ps.demand_clipped,
                    demand: ps.demand,
                    order_quantity: ps.order_quantity,
                    shipped: ps.shipped,
                    received: ps.received,
                    demand_met_from_stock: ps.demand_met_from_stock,
                    on_hand: ps.on_hand,
                    backorders,
                    inventory_level,
                    inventory_position,
                    raw_material: materials.iter().fold(0.0, |total, m| {
                        total + state.raw_materials.get(m).copied().unwrap_or(0.0)
                    }),
                    in_transit: materials
                        .iter()
                        .fold(0.0, |total, m| total + state.inbound_in_transit(*m)),
                    holding_cost: costs.holding,
                    stockout_cost: costs.stockout,
                    in_transit_holding_cost: costs.in_transit_holding,
                    total_cost: costs.total(),
                    pipeline: state
                        .pipeline
                        .iter()
                        .filter(|s| materials.contains(&s.material))
                        .copied()
                        .collect(),
                });
                updates.push((pos, position, inventory_position, costs));
            }
        }

        for (pos, position, inventory_position, costs) in updates {
            let ps = &mut self.states[pos].products[position];
            ps.inventory_position = inventory_position;
            ps.costs = costs;
        }
        Ok(self.results.push_period(records))
    }

    /// Units of `product` shipped by `node` that its successors cannot use yet.
    fn outbound_in_transit(&self, node: &Node, product: ProductId) -> Result<f64> {
        let mut total = 0.0;
        for successor in node.successors() {
            let pos = self
                .network
                .position(successor)
                .ok_or(TopologyError::UnknownNode(successor))?;
            total += self.states[pos].inbound_in_transit(product);
        }
        Ok(total)
    }

    /// Echelon inventory level of a single-product echelon: local inventory
    /// level plus, for every downstream node, its inventory level and the
    /// material in transit to it.
    fn echelon_inventory_level(&self, pos: usize) -> f64 {
        let own = self.states[pos]
            .products
            .first()
            .map(|p| p.inventory_level())
            .unwrap_or(0.0);
        self.network
            .descendant_positions(pos)
            .iter()
            .map(|&d| {
                let state = &self.states[d];
                let level = state
                    .products
                    .first()
                    .map(|p| p.inventory_level())
                    .unwrap_or(0.0);
                level + state.total_inbound_in_transit()
            })
            .sum::<f64>()
            + own
    }
}

/// Read-only view of the network state that one level is evaluated against.
struct PeriodView<'a> {
    network: &'a Network,
    states: &'a [NodeState],
    period: usize,
}

impl<'a> PeriodView<'a> {
    fn new(network: &'a Network, states: &'a [NodeState], period: usize) -> Self {
        Self {
            network,
            states,
            period,
        }
    }

    /// Registers this period's demand, asks each product's policy for an
    /// order and explodes it into upstream orders.
    fn place_orders(
        &self,
        pos: usize,
        incoming: &[OrderMessage],
    ) -> Result<(NodeState, Vec<OrderMessage>)> {
        let node = &self.network.nodes()[pos];
        let mut state = self.states[pos].clone();
        let mut outgoing = Vec::new();
        let ordering_blocked = state.is_down() && node.disruption.kind.blocks_ordering();

        for (position, product) in node.products.iter().enumerate() {
            let id = node.product_id(position);

            if !product.demand.is_none() {
                let external = state.products[position].external_demand;
                state.products[position].register_demand(self.period, Customer::External, external);
            }
            let mut orders: Vec<&OrderMessage> =
                incoming.iter().filter(|o| o.material == id).collect();
            orders.sort_by_key(|o| o.customer);
            for order in orders {
                state.products[position].register_demand(
                    self.period,
                    Customer::Node(order.customer),
                    order.quantity,
                );
            }

            let inventory_position = ensure_finite(
                self.period,
                node.id,
                "inventory_position",
                state.local_inventory_position(position, &node.products),
            )?;
            let echelon_inventory_position = if product.policy.is_echelon() {
                Some(ensure_finite(
                    self.period,
                    node.id,
                    "echelon_inventory_position",
                    self.echelon_inventory_position(pos, inventory_position),
                )?)
            } else {
                None
            };

            let context = OrderContext {
                period: self.period,
                inventory_position,
                echelon_inventory_position,
                incoming_demand: state.products[position].demand,
            };
            let mut quantity = if ordering_blocked {
                0.0
            } else {
                product.policy.order_quantity(&context)
            };
            if let Some(capacity) = product.order_capacity {
                quantity = quantity.min(capacity);
            }
            let quantity = ensure_finite(self.period, node.id, "order_quantity", quantity)?;

            for (material, amount) in state.place_order(position, product, quantity) {
                outgoing.push(OrderMessage {
                    material,
                    customer: node.id,
                    quantity: amount,
                });
            }
        }

        Ok((state, outgoing))
    }

    /// Local position of this node plus the local positions of every node
    /// downstream of it. Downstream nodes were already updated in this pass.
    fn echelon_inventory_position(&self, pos: usize, own: f64) -> f64 {
        let nodes = self.network.nodes();
        own + self
            .network
            .descendant_positions(pos)
            .iter()
            .filter_map(|&d| {
                let products = &nodes[d].products;
                (!products.is_empty())
                    .then(|| self.states[d].local_inventory_position(0, products))
            })
            .sum::<f64>()
    }

    /// The external supplier ships what supplied nodes ordered, then the
    /// node ships on-hand against its queue.
    fn ship_from_stock(&self, pos: usize) -> Result<(NodeState, Vec<Delivery>)> {
        let node = &self.network.nodes()[pos];
        let mut state = self.states[pos].clone();

        for (material, quantity) in std::mem::take(&mut state.external_orders) {
            state.pipeline.push(Shipment {
                material,
                source: None,
                quantity,
                remaining: state.lead_time,
            });
        }

        let mut deliveries = Vec::new();
        if !(state.is_down() && node.disruption.kind.blocks_shipping()) {
            self.serve_backorders(node, &mut state, &mut deliveries)?;
        }
        Ok((state, deliveries))
    }

    /// Releases due shipments, produces, serves backorders from what was
    /// produced and moves the rest of the pipeline one period closer.
    fn receive_and_produce(&self, pos: usize) -> Result<(NodeState, Vec<Delivery>)> {
        let node = &self.network.nodes()[pos];
        let mut state = self.states[pos].clone();
        let down = state.is_down();
        let kind = node.disruption.kind;
        let transit_blocked = down && kind.blocks_transit();

        if !transit_blocked {
            let due = state.pipeline.release_due();
            if down && kind.blocks_receipt() {
                state.receive(due, true);
            } else {
                state.release_held_receipts();
                state.receive(due, false);
            }
        }

        state.produce(node);

        let mut deliveries = Vec::new();
        if !(down && kind.blocks_shipping()) {
            self.serve_backorders(node, &mut state, &mut deliveries)?;
        }

        if !transit_blocked {
            state.pipeline.advance();
        }
        Ok((state, deliveries))
    }

    fn serve_backorders(
        &self,
        node: &Node,
        state: &mut NodeState,
        deliveries: &mut Vec<Delivery>,
    ) -> Result<()> {
        for position in 0..node.products.len() {
            let id = node.product_id(position);
            for (customer, quantity) in state.products[position].fill_backorders(self.period) {
                let Customer::Node(successor) = customer else {
                    continue;
                };
                let recipient = self
                    .network
                    .position(successor)
                    .ok_or(TopologyError::UnknownNode(successor))?;
                deliveries.push(Delivery {
                    recipient,
                    shipment: Shipment {
                        material: id,
                        source: Some(node.id),
                        quantity,
                        remaining: self.states[recipient].lead_time,
                    },
                });
            }
        }
        Ok(())
    }
}

/// Installs a level's new states, then hands its shipments to the recipients.
fn apply_deliveries(
    states: &mut [NodeState],
    level: &[usize],
    outcomes: Vec<(NodeState, Vec<Delivery>)>,
) {
    for (&pos, (state, deliveries)) in level.iter().zip(outcomes) {
        states[pos] = state;
        for delivery in deliveries {
            states[delivery.recipient].pipeline.push(delivery.shipment);
        }
    }
}

/// Evaluates `f` for every node of a level. Results come back in level order
/// whatever the mode; with several failures the first in that order wins.
fn evaluate_level<T, F>(mode: ConcurrencyMode, level: &[usize], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    match mode {
        ConcurrencyMode::Sequential => level.iter().map(|&pos| f(pos)).collect(),
        ConcurrencyMode::Rayon => {
            let outcomes: Vec<Result<T>> = level.par_iter().map(|&pos| f(pos)).collect();
            outcomes.into_iter().collect()
        }
    }
}

fn ensure_finite(period: usize, node: NodeId, quantity: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::NumericInstability {
            period,
            node,
            quantity,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::demand::DemandSource;
    use crate::strategy::policy::Policy;

    fn two_stage(lead_time: u32, base_stock: f64) -> Network {
        Network::serial(vec![
            Node::new(NodeId(2)).with_policy(Policy::BaseStock { level: base_stock }),
            Node::new(NodeId(1))
                .with_lead_time(lead_time)
                .with_policy(Policy::BaseStock { level: base_stock })
                .with_demand(DemandSource::constant(4.0))
                .with_holding_cost(1.0)
                .with_stockout_cost(10.0),
        ])
        .unwrap()
    }

    #[test]
    fn phases_move_forward_and_reset() {
        let mut sim = Simulation::new(
            two_stage(1, 10.0),
            SimulationConfig::default().with_periods(2),
        );
        assert_eq!(sim.phase(), SimulationPhase::NotStarted);
        sim.step().unwrap();
        assert_eq!(sim.phase(), SimulationPhase::Running);
        sim.step().unwrap();
        assert_eq!(sim.phase(), SimulationPhase::Complete);
        assert!(matches!(sim.step(), Err(SimError::AlreadyComplete)));
        assert!(matches!(sim.run(), Err(SimError::AlreadyComplete)));

        sim.reset();
        assert_eq!(sim.phase(), SimulationPhase::NotStarted);
        assert_eq!(sim.results().num_periods(), 0);
        assert_eq!(sim.run().unwrap().num_periods(), 2);
    }

    #[test]
    fn zero_periods_completes_immediately() {
        let mut sim = Simulation::new(two_stage(1, 10.0), SimulationConfig::default().with_periods(0));
        let results = sim.run().unwrap();
        assert_eq!(results.num_periods(), 0);
        assert_eq!(sim.phase(), SimulationPhase::Complete);
    }

    #[test]
    fn shipment_with_lead_time_two_arrives_two_periods_later() {
        // The retailer starts empty and orders 4 + 10 in period 0.
        let mut sim = Simulation::new(
            Network::serial(vec![
                Node::new(NodeId(2)).with_initial_inventory(100.0),
                Node::new(NodeId(1))
                    .with_lead_time(2)
                    .with_policy(Policy::BaseStock { level: 10.0 })
                    .with_demand(DemandSource::constant(4.0)),
            ])
            .unwrap(),
            SimulationConfig::default().with_periods(3),
        );
        let results = sim.run().unwrap();
        let retailer: Vec<&PeriodRecord> =
            results.history(ProductId::new(NodeId(1), 0)).collect();

        assert_eq!(retailer[0].order_quantity, 14.0);
        assert_eq!(retailer[0].received, 0.0);
        assert_eq!(retailer[1].received, 0.0);
        assert_eq!(retailer[2].received, 14.0);
        assert_eq!(retailer[2].backorders, 0.0);
    }

    #[test]
    fn nodes_are_recorded_in_id_order() {
        let mut sim = Simulation::new(two_stage(0, 10.0), SimulationConfig::default().with_periods(1));
        let results = sim.run().unwrap();
        let nodes: Vec<NodeId> = results.records().iter().map(|r| r.node).collect();
        assert_eq!(nodes, vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn evaluate_level_keeps_the_first_error_in_level_order() {
        let f = |pos: usize| -> Result<usize> {
            if pos >= 2 {
                Err(SimError::InvalidParameter(format!("node {pos}")))
            } else {
                Ok(pos)
            }
        };
        for mode in [ConcurrencyMode::Sequential, ConcurrencyMode::Rayon] {
            match evaluate_level(mode, &[0, 1, 2, 3], f) {
                Err(SimError::InvalidParameter(msg)) => assert_eq!(msg, "node 2"),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(evaluate_level(mode, &[0, 1], f).unwrap(), vec![0, 1]);
        }
    }
}
