//! # farmerbot-id
//!
//! Typed identifiers for the entities farmerbot manages.
//!
//! ## Design Principles
//!
//! - IDs are assigned by the chain; farmerbot never mints them
//! - IDs are typed to prevent mixing a node ID with the twin that addresses it
//! - Zero is reserved and never a valid ID
//!
//! ## ID Format
//!
//! IDs are `u32` values. The canonical string form is `{prefix}-{number}`:
//!
//! - `farm-1`
//! - `node-12`
//! - `twin-40`
//!
//! Parsing also accepts the bare number, which is what configuration
//! documents and the chain use. On the wire (JSON) IDs are plain numbers.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
