//! same-orchestrator
//!
//! Runs one retarget per request: load the target skeleton and source motion,
//! encode both as graph batches, call the model, decode and write a BVH file.
//! [`RetargetServer`] exposes this over a single-request TCP protocol.

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod protocol;
pub mod server;
pub mod state;

pub use crate::adapters::{load_model, NameMatchAdapter, NAME_MATCH};
pub use crate::config::{ModelConfig, OutputNaming, ServerConfig};
pub use crate::context::{HandledRequest, RetargetContext, RetargetOutcome};
pub use crate::error::RetargetError;
pub use crate::protocol::{error_reply, success_reply, Reply, RetargetRequest};
pub use crate::server::RetargetServer;
pub use crate::state::{RequestState, StateTracker};
