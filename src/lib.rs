pub mod adapters;
pub mod classifier;
pub mod config;
pub mod dictionary;
pub mod domain;
pub mod equipment;
pub mod error;
pub mod moderator;
pub mod monitoring;
pub mod retrieval_provider;
pub mod selector;
pub mod session_store;
pub mod workflow;

pub use config::Settings;
pub use monitoring::Monitoring;
pub use session_store::{CompositeSessionStore, SessionBackend};
pub use workflow::{TurnOutcome, WorkflowEngine};
