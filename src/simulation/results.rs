// src/simulation/results.rs

use crate::model::network::NodeId;
use crate::model::pipeline::Shipment;
use crate::model::product::ProductId;
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of history: a product at a node at the end of a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRecord {
    pub period: usize,
    pub node: NodeId,
    pub product: u32,
    pub disrupted: bool,
    pub lead_time: u32,
    pub external_demand: f64,
    pub demand_clipped: bool,
    /// External demand plus successor orders.
    pub demand: f64,
    pub order_quantity: f64,
    pub shipped: f64,
    pub received: f64,
    pub demand_met_from_stock: f64,
    pub on_hand: f64,
    pub backorders: f64,
    pub inventory_level: f64,
    pub inventory_position: f64,
    pub raw_material: f64,
    /// Inbound material in transit or held at receipt.
    pub in_transit: f64,
    pub holding_cost: f64,
    pub stockout_cost: f64,
    pub in_transit_holding_cost: f64,
    pub total_cost: f64,
    #[serde(skip)]
    pub pipeline: Vec<Shipment>,
}

impl PeriodRecord {
    pub fn product_id(&self) -> ProductId {
        ProductId::new(self.node, self.product)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct SimulationResults {
    records: Vec<PeriodRecord>,
    period_costs: Vec<f64>,
}

impl SimulationResults {
    pub fn records(&self) -> &[PeriodRecord] {
        &self.records
    }

    /// Network total cost per period.
    pub fn period_costs(&self) -> &[f64] {
        &self.period_costs
    }

    pub fn num_periods(&self) -> usize {
        self.period_costs.len()
    }

    pub fn total_cost(&self) -> f64 {
        self.period_costs.iter().fold(0.0, |total, c| total + c)
    }

    pub fn average_cost_per_period(&self) -> f64 {
        if self.period_costs.is_empty() {
            0.0
        } else {
            self.total_cost() / self.period_costs.len() as f64
        }
    }

    pub fn node_cost(&self, node: NodeId) -> f64 {
        self.records
            .iter()
            .filter(|r| r.node == node)
            .fold(0.0, |total, r| total + r.total_cost)
    }

    /// Total cost per node, ascending by id.
    pub fn cost_breakdown(&self) -> Vec<(NodeId, f64)> {
        let mut totals: BTreeMap<NodeId, f64> = BTreeMap::new();
        for record in &self.records {
            *totals.entry(record.node).or_insert(0.0) += record.total_cost;
        }
        totals.into_iter().collect()
    }

    /// Fraction of demand met from stock in the period it arrived.
    /// `None` when the product saw no demand.
    pub fn fill_rate(&self, product: ProductId) -> Option<f64> {
        let (met, demand) = self
            .history(product)
            .fold((0.0, 0.0), |(met, demand), r| {
                (met + r.demand_met_from_stock, demand + r.demand)
            });
        (demand > 0.0).then(|| met / demand)
    }

    /// Records of one product, in period order.
    pub fn history(&self, product: ProductId) -> impl Iterator<Item = &PeriodRecord> {
        self.records
            .iter()
            .filter(move |r| r.product_id() == product)
    }

    pub fn period(&self, period: usize) -> impl Iterator<Item = &PeriodRecord> {
        self.records.iter().filter(move |r| r.period == period)
    }

    pub(crate) fn push_period(&mut self, records: Vec<PeriodRecord>) -> f64 {
        let cost = records.iter().fold(0.0, |total, r| total + r.total_cost);
        self.records.extend(records);
        self.period_costs.push(cost);
        cost
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.period_costs.clear();
    }
}
