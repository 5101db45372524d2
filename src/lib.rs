// src/lib.rs

//! Discrete-time simulation of multi-echelon inventory networks.
//!
//! Build a [`Network`](model::network::Network) of nodes and products, hand it
//! to a [`Simulation`](simulation::engine::Simulation) together with a
//! [`SimulationConfig`](simulation::config::SimulationConfig) and run it.

pub mod error;
pub mod io;
pub mod model;
pub mod simulation;
pub mod strategy;

pub use error::{Result, SimError, TopologyError};
