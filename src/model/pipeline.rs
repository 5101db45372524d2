// src/model/pipeline.rs

use crate::model::network::NodeId;
use crate::model::product::ProductId;
use serde::Serialize;

/// A quantity of material travelling into a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Shipment {
    pub material: ProductId,
    /// Shipping node, or `None` for the external supplier.
    pub source: Option<NodeId>,
    pub quantity: f64,
    /// Periods left before the shipment can be released.
    pub remaining: u32,
}

/// Inbound shipments of one node, in creation order.
///
/// Entries are released when `remaining` reaches zero, and every remaining
/// entry moves one period closer at the end of each period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    shipments: Vec<Shipment>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, shipment: Shipment) {
        self.shipments.push(shipment);
    }

    /// Removes and returns every shipment due now, oldest first.
    pub fn release_due(&mut self) -> Vec<Shipment> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.shipments.drain(..).partition(|s| s.remaining == 0);
        self.shipments = waiting;
        due
    }

    /// Moves every shipment one period closer.
    pub fn advance(&mut self) {
        for shipment in &mut self.shipments {
            shipment.remaining = shipment.remaining.saturating_sub(1);
        }
    }

    pub fn total(&self) -> f64 {
        self.shipments.iter().fold(0.0, |total, s| total + s.quantity)
    }

    /// Units of `material` still in transit.
    pub fn quantity_of(&self, material: ProductId) -> f64 {
        self.shipments
            .iter()
            .filter(|s| s.material == material)
            .fold(0.0, |total, s| total + s.quantity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.iter()
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }
}
