pub mod error;
pub mod extraction;
pub mod filter;
pub mod history;
pub mod reasoning;
pub mod types;

pub use error::{Result, SignalError};
pub use extraction::extract_signal_summary;
pub use filter::filter_actions;
pub use history::SignalHistory;
pub use reasoning::process_signal;
pub use types::{
    ActivityLine, ContextLine, ExistingDeliverableRef, PlatformDigest, SignalAction,
    SignalProcessingResult, SignalSummary, CONFIDENCE_THRESHOLD,
};
