//! Core types for the troupe actor facade.
//!
//! This crate contains the runtime-independent vocabulary shared by all packages:
//! - `ActorError` and `ActorResult` for every fallible facade operation
//! - `SupervisorDecision` and `PolicyKind` for supervision
//! - `RouterConfig` for router-backed props
//! - `SystemConfig` for loading system settings from JSON

mod config;
pub mod duration;
mod decision;
mod error;
mod router;

pub use config::{CONFIG_ENV_VAR, GuardianConfig, SystemConfig};
pub use decision::{PolicyKind, SupervisorDecision};
pub use duration::parse_duration;
pub use error::{ActorError, ActorResult};
pub use router::{DEFAULT_VIRTUAL_NODES, RouterConfig};
