//! The Deliverable Execution Engine (§3, §4.4): generates and delivers one
//! versioned artifact per run, driven by the strategy matching the
//! deliverable's `Binding` and a bounded agentic tool loop over cached
//! platform content.

pub mod agent;
pub mod db;
pub mod engine;
pub mod error;
pub mod store;
pub mod strategy;
pub mod tools;
pub mod types;

pub use engine::{CredentialsResolver, DeliverableEngine};
pub use error::{DeliverableError, Result};
pub use store::DeliverableStore;
pub use strategy::{ExecutionStrategy, StrategyRegistry};
pub use types::{
    Deliverable, DeliverableStatus, DeliverableVersion, DeliveryStatus, DestinationOutcome,
    GatheredContext, Origin, SourceSnapshot, TicketStatus, TriggerContext, TriggerType,
    VersionStatus, WorkTicket,
};
