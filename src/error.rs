// src/error.rs

use crate::model::network::NodeId;
use crate::model::product::ProductId;
use thiserror::Error;

/// Structural problems detected while building a [`Network`](crate::model::network::Network).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("edge references unknown node {0}")]
    UnknownNode(NodeId),

    #[error("self-loop on node {0}")]
    SelfLoop(NodeId),

    #[error("cycle detected through node {0}")]
    Cycle(NodeId),

    #[error("network has no nodes")]
    Empty,

    #[error("node {0} cannot reach any demand-facing node")]
    NoDemandPath(NodeId),

    #[error("demand-facing node {0} is not reachable from any supply source")]
    NoSupplyPath(NodeId),

    #[error("product {product} uses raw material {raw_material}, which is not hosted by a predecessor")]
    InvalidRawMaterial {
        product: ProductId,
        raw_material: ProductId,
    },

    #[error("product {product} has no raw-material supply (no predecessors and no external supply)")]
    NoRawMaterial { product: ProductId },

    #[error("predecessor {predecessor} of node {node} hosts several products; an explicit bill of materials is required")]
    AmbiguousBillOfMaterials { node: NodeId, predecessor: NodeId },

    #[error("duplicate product index {0}")]
    DuplicateProduct(ProductId),
}

/// Every failure the simulator can report.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("invalid policy parameter for product {product}: {reason}")]
    PolicyParameter { product: ProductId, reason: String },

    #[error("demand series for product {product} exhausted in period {period} (length {len})")]
    ExhaustedDemandSeries {
        product: ProductId,
        period: usize,
        len: usize,
    },

    #[error("numeric instability at node {node} in period {period}: {quantity} = {value}")]
    NumericInstability {
        period: usize,
        node: NodeId,
        quantity: &'static str,
        value: f64,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("simulation already complete; call reset() before running again")]
    AlreadyComplete,

    #[error("simulation was aborted by an earlier error; call reset() before running again")]
    RunAborted,

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
