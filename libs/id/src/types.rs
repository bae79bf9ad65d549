//! Typed ID definitions for farm resources.
//!
//! All three are chain-assigned `u32` values. A node and the twin that
//! addresses it usually carry different numbers, which is why they get
//! distinct types.

use crate::define_id;

define_id!(FarmId, "farm");
define_id!(NodeId, "node");
define_id!(TwinId, "twin");
