//! Shared fixtures for integration tests.

#![allow(dead_code)]

use echelon_sim::model::demand::DemandSource;
use echelon_sim::model::disruption::{DisruptionProcess, DisruptionType};
use echelon_sim::model::network::{Network, NodeId};
use echelon_sim::model::node::Node;
use echelon_sim::model::product::ProductId;
use echelon_sim::simulation::config::SimulationConfig;
use echelon_sim::simulation::engine::Simulation;
use echelon_sim::simulation::results::{PeriodRecord, SimulationResults};
use echelon_sim::strategy::policy::Policy;

/// Clark-Scarf optimal expected cost per period of [`reference_serial`].
pub const REFERENCE_COST: f64 = 227.1;

pub fn pid(node: u32) -> ProductId {
    ProductId::new(NodeId(node), 0)
}

/// Config with progress logging off.
pub fn config(periods: usize, seed: u64) -> SimulationConfig {
    SimulationConfig::default()
        .with_periods(periods)
        .with_seed(seed)
        .with_progress_interval(0)
}

/// Three-stage serial chain 3 -> 2 -> 1 under echelon base-stock
/// (44.1, 34.9, 25.7), lead times (1, 1, 2), local holding (4, 7, 8),
/// stockout 40 and N(10, 2) demand at node 1.
pub fn reference_serial() -> Network {
    Network::serial(vec![
        Node::new(NodeId(3))
            .with_lead_time(1)
            .with_holding_cost(4.0)
            .with_policy(Policy::EchelonBaseStock { level: 44.1 })
            .with_initial_inventory(9.2),
        Node::new(NodeId(2))
            .with_lead_time(1)
            .with_holding_cost(7.0)
            .with_policy(Policy::EchelonBaseStock { level: 34.9 })
            .with_initial_inventory(9.2),
        Node::new(NodeId(1))
            .with_lead_time(2)
            .with_holding_cost(8.0)
            .with_stockout_cost(40.0)
            .with_policy(Policy::EchelonBaseStock { level: 25.7 })
            .with_initial_inventory(25.7)
            .with_demand(DemandSource::Normal {
                mean: 10.0,
                std_dev: 2.0,
            }),
    ])
    .expect("reference network is valid")
}

/// A warehouse (0) feeding two retailers (1, 2) and, through a
/// distributor (3), a third retailer (4). Stochastic lead times and Markov
/// disruptions everywhere.
pub fn noisy_tree() -> Network {
    let markov = |kind| DisruptionProcess::markov(kind, 0.05, 0.5);
    Network::tree(vec![
        (
            Node::new(NodeId(0))
                .with_stochastic_lead_time(0, 2)
                .with_policy(Policy::BaseStock { level: 60.0 })
                .with_holding_cost(1.0)
                .with_initial_inventory(30.0)
                .with_disruption(markov(DisruptionType::Shipping)),
            None,
        ),
        (
            Node::new(NodeId(1))
                .with_stochastic_lead_time(1, 3)
                .with_policy(Policy::ReorderPointQuantity {
                    reorder_point: 10.0,
                    quantity: 25.0,
                })
                .with_holding_cost(2.0)
                .with_stockout_cost(20.0)
                .with_demand(DemandSource::Poisson { mean: 6.0 })
                .with_disruption(markov(DisruptionType::Receipt)),
            Some(NodeId(0)),
        ),
        (
            Node::new(NodeId(2))
                .with_lead_time(1)
                .with_policy(Policy::MinMax {
                    reorder_point: 8.0,
                    order_up_to: 30.0,
                })
                .with_holding_cost(2.0)
                .with_stockout_cost(20.0)
                .with_demand(DemandSource::Normal {
                    mean: 5.0,
                    std_dev: 3.0,
                })
                .with_disruption(markov(DisruptionType::Ordering)),
            Some(NodeId(0)),
        ),
        (
            Node::new(NodeId(3))
                .with_lead_time(1)
                .with_policy(Policy::BaseStock { level: 20.0 })
                .with_holding_cost(1.5)
                .with_order_capacity(12.0)
                .with_disruption(markov(DisruptionType::Transit)),
            Some(NodeId(0)),
        ),
        (
            Node::new(NodeId(4))
                .with_stochastic_lead_time(0, 1)
                .with_policy(Policy::BaseStock { level: 15.0 })
                .with_holding_cost(3.0)
                .with_stockout_cost(30.0)
                .with_demand(DemandSource::Uniform {
                    low: 0.0,
                    high: 8.0,
                })
                .with_disruption(markov(DisruptionType::Both)),
            Some(NodeId(3)),
        ),
    ])
    .expect("tree network is valid")
}

pub fn run(network: Network, config: SimulationConfig) -> SimulationResults {
    let mut sim = Simulation::new(network, config);
    sim.run().expect("run succeeds").clone()
}

pub fn history(results: &SimulationResults, node: u32) -> Vec<PeriodRecord> {
    results.history(pid(node)).cloned().collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-9 * (1.0 + expected.abs());
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}
