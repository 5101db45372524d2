// src/main.rs

use echelon_sim::io::reporting;
use echelon_sim::model::demand::DemandSource;
use echelon_sim::model::network::{Network, NodeId};
use echelon_sim::model::node::Node;
use echelon_sim::simulation::config::SimulationConfig;
use echelon_sim::simulation::engine::Simulation;
use echelon_sim::strategy::policy::Policy;
use echelon_sim::Result;
use log::{error, info};
use std::env;
use std::process;

/// Three-stage serial system, upstream-most first: lead times 1, 1, 2,
/// local holding 4, 7, 8, stockout 40 at the retailer, N(10, 2) demand and
/// echelon base-stock levels 44.1, 34.9, 25.7.
fn reference_network() -> Result<Network> {
    let stages = [
        (3, 1, 4.0, 0.0, 44.1, 9.2),
        (2, 1, 7.0, 0.0, 34.9, 9.2),
        (1, 2, 8.0, 40.0, 25.7, 25.7),
    ];

    let nodes = stages
        .iter()
        .map(|&(id, lead_time, holding, stockout, level, initial)| {
            let node = Node::new(NodeId(id))
                .with_lead_time(lead_time)
                .with_holding_cost(holding)
                .with_stockout_cost(stockout)
                .with_policy(Policy::EchelonBaseStock { level })
                .with_initial_inventory(initial);
            if id == 1 {
                node.with_name("retailer").with_demand(DemandSource::Normal {
                    mean: 10.0,
                    std_dev: 2.0,
                })
            } else {
                node
            }
        })
        .collect();

    Network::serial(nodes)
}

fn run() -> Result<()> {
    // Usage: echelon-sim [config.toml] [output.csv]
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => SimulationConfig::from_toml_file(path)?,
        None => SimulationConfig::default().with_periods(1000),
    };
    let output_file = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "simulation_results.csv".to_string());

    let mut sim = Simulation::new(reference_network()?, config);
    let results = sim.run()?;

    reporting::write_simulation_log(&output_file, results.records())?;

    info!("=== Cost Analysis ===");
    for (node, cost) in results.cost_breakdown() {
        info!("Node {}: {:.2}", node, cost);
    }
    info!("Total cost: {:.2}", results.total_cost());
    info!("Average cost per period: {:.2}", results.average_cost_per_period());
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp(None)
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}
