// src/strategy/mod.rs

pub mod policy;
