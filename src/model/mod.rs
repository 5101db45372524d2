// src/model/mod.rs

pub mod demand;
pub mod disruption;
pub mod network;
pub mod node;
pub mod pipeline;
pub mod product;
pub mod state;
