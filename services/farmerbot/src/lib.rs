//! farmerbot: power and allocation controller for a farm of nodes.
//!
//! The crate ships a `farmerbot` binary and exposes its library surface for
//! integration testing and reuse.

pub mod agent;
pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod managers;
pub mod models;
pub mod scheduler;
pub mod state;
