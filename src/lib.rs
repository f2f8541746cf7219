//! Governance vote alerter.
//!
//! Polls Cosmos gov REST endpoints for proposals in their voting period,
//! tracks them in a JSON vote store and pages / pings when a vote opens
//! or closes. `main.rs` wires these modules together.

pub mod alert;
pub mod config;
pub mod http;
pub mod metrics;
pub mod pagination;
pub mod proposal;
pub mod reconciler;
pub mod scheduler;
pub mod store;
