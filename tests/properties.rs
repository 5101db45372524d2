mod common;

use common::{assert_close, config, history, noisy_tree, reference_serial, run};
use echelon_sim::model::network::Network;
use echelon_sim::simulation::config::ConcurrencyMode;
use rstest::rstest;

fn networks() -> Vec<(&'static str, Network)> {
    vec![("serial", reference_serial()), ("tree", noisy_tree())]
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(2024)]
fn inventory_is_conserved_period_to_period(#[case] seed: u64) {
    for (name, network) in networks() {
        let initial: Vec<(u32, f64)> = network
            .nodes()
            .iter()
            .map(|n| (n.id.0, n.products[0].initial_inventory))
            .collect();
        let results = run(network, config(300, seed));

        for (node, initial_on_hand) in initial {
            let mut on_hand = initial_on_hand;
            let mut backorders = 0.0;
            for record in history(&results, node) {
                assert_close(record.on_hand, on_hand + record.received - record.shipped);
                assert_close(record.backorders, backorders + record.demand - record.shipped);
                on_hand = record.on_hand;
                backorders = record.backorders;
            }
            assert_eq!(history(&results, node).len(), 300, "{name} node {node}");
        }
    }
}

#[rstest]
#[case(3)]
#[case(99)]
fn quantities_never_go_negative(#[case] seed: u64) {
    for (name, network) in networks() {
        let results = run(network, config(400, seed));
        for r in results.records() {
            assert!(r.on_hand >= 0.0, "{name}: on-hand {} at {:?}", r.on_hand, r.node);
            assert!(r.backorders >= 0.0, "{name}: backorders {}", r.backorders);
            assert!(r.raw_material >= 0.0, "{name}: raw material {}", r.raw_material);
            assert!(r.in_transit >= 0.0, "{name}: in transit {}", r.in_transit);
            assert!(r.order_quantity >= 0.0, "{name}: order {}", r.order_quantity);
            assert!(r.demand >= 0.0 && r.external_demand >= 0.0);
            assert!(r.pipeline.iter().all(|s| s.quantity >= 0.0));
        }
    }
}

#[test]
fn same_seed_gives_identical_trajectories() {
    for (_, network) in networks() {
        let a = run(network.clone(), config(250, 17));
        let b = run(network.clone(), config(250, 17));
        assert_eq!(a.records(), b.records());
        assert_eq!(a.period_costs(), b.period_costs());

        let c = run(network, config(250, 18));
        assert_ne!(a.period_costs(), c.period_costs());
    }
}

#[test]
fn rayon_matches_sequential() {
    for (_, network) in networks() {
        let sequential = run(network.clone(), config(200, 5));
        let parallel = run(
            network,
            config(200, 5).with_concurrency(ConcurrencyMode::Rayon),
        );
        assert_eq!(sequential.records(), parallel.records());
    }
}

#[test]
fn reset_replays_the_same_run() {
    let mut sim = echelon_sim::simulation::engine::Simulation::new(noisy_tree(), config(120, 11));
    let first = sim.run().unwrap().clone();
    sim.reset();
    let second = sim.run().unwrap();
    assert_eq!(first.records(), second.records());
}

#[test]
fn stepping_matches_running() {
    let mut stepped = echelon_sim::simulation::engine::Simulation::new(noisy_tree(), config(60, 4));
    for _ in 0..60 {
        stepped.step().unwrap();
    }
    let ran = run(noisy_tree(), config(60, 4));
    assert_eq!(stepped.results().records(), ran.records());
}
