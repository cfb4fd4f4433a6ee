//! Wire types for the browsergate HTTP API.
//!
//! This crate contains the serde-serializable types exchanged between the
//! gateway's HTTP dispatcher and its callers. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * Permissive: opaque caller payloads stay `serde_json::Value`
//! * Stable: Changes only when the wire protocol changes
//!
//! The dispatcher, registry, and engine layers are built on top of these
//! types in `bg-gateway` and `bg-engine`.

pub mod body;
pub mod options;
pub mod reply;

pub use body::*;
pub use options::*;
pub use reply::*;
