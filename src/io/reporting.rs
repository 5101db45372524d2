// src/io/reporting.rs

use crate::error::Result;
use crate::simulation::results::PeriodRecord;
use log::info;
use std::io::Write;
use std::path::Path;

/// Writes the period records to a CSV file, one row per node, product and
/// period. Pipeline snapshots are not part of the CSV.
pub fn write_simulation_log(file_path: impl AsRef<Path>, records: &[PeriodRecord]) -> Result<()> {
    let path = file_path.as_ref();
    let wtr = csv::Writer::from_path(path)?;
    write_records(wtr, records)?;
    info!("Exported {} rows to '{}'", records.len(), path.display());
    Ok(())
}

/// Same as [`write_simulation_log`] for any writer.
pub fn write_records<W: Write>(mut wtr: csv::Writer<W>, records: &[PeriodRecord]) -> Result<()> {
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::demand::DemandSource;
    use crate::model::network::{Network, NodeId};
    use crate::model::node::Node;
    use crate::simulation::config::SimulationConfig;
    use crate::simulation::engine::Simulation;

    #[test]
    fn csv_has_a_header_and_one_row_per_record() {
        let net = Network::serial(vec![
            Node::new(NodeId(2)),
            Node::new(NodeId(1)).with_demand(DemandSource::constant(3.0)),
        ])
        .unwrap();
        let mut sim = Simulation::new(net, SimulationConfig::default().with_periods(3));
        let records = sim.run().unwrap().records().to_vec();

        let mut buffer = Vec::new();
        write_records(csv::Writer::from_writer(&mut buffer), &records).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 1 + records.len());
        assert!(lines[0].starts_with("period,node,product,disrupted"));
        assert!(!lines[0].contains("pipeline"));
        // Empty backlogs are written as 0, never -0.
        for line in &lines[1..] {
            assert!(line.split(',').all(|field| field != "-0"), "{line}");
        }
    }

    #[test]
    fn writes_to_a_file() {
        let path = std::env::temp_dir().join("echelon_sim_reporting_test.csv");
        let net = Network::serial(vec![Node::new(NodeId(1)).with_demand(DemandSource::constant(1.0))])
            .unwrap();
        let mut sim = Simulation::new(net, SimulationConfig::default().with_periods(2));
        let records = sim.run().unwrap().records().to_vec();

        write_simulation_log(&path, &records).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        let _ = std::fs::remove_file(&path);
    }
}
