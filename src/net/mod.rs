//! Network resilience: wireless association and broker connectivity.
//!
//! Both are ordinary scheduled tasks.  They talk to each other only
//! through `Wifi*` events, and neither ever gives up: every failure ends
//! in a scheduled retry.

pub mod association;
pub mod broker;

pub use association::{AssociationState, AssociationTask, Backoff};
pub use broker::{BrokerHandle, BrokerState, BrokerTask};
