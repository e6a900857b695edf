//! UserContext store and working-memory assembly (§3, §4.5): priority-
//! ordered profile/fact/instruction/preference storage, rendered into the
//! compact block that seeds signal reasoning and deliverable generation
//! prompts.

pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{MemoryError, Result};
pub use manager::{render_working_memory, MemoryStore};
pub use types::{
    ContextKey, ContextSource, DeliverableSummary, SyncFreshness, SystemStateSummary,
    UserContextEntry, WorkingMemoryInputs,
};
