//! Actor facade over ractor.
//!
//! This crate makes actor definition, supervision configuration,
//! implicit-sender addressing and router construction ergonomic without
//! reimplementing the runtime: mailboxes, scheduling, spawning, linking and
//! the global name registry all stay with ractor.
//!
//! # Architecture
//!
//! - `Props` - Immutable recipe for creating an actor, resolved by `PropsResolver`
//! - `Actor` - The user-facing actor trait with optional lifecycle hooks
//! - `SenderContext` - Task-local "actor currently running a hook"
//! - `SupervisorStrategy` - Policy, retry budget and decision function for children
//! - `Props::with_router` - Router-backed props (round robin, broadcast, ...)
//! - `ActorHandle::ask` / `PipeTo` - Request/reply and completion forwarding
//! - `ActorSystem` - Names, the user guardian and top-level actors
//!
//! # Usage
//!
//! ```ignore
//! use troupe::{Actor, ActorContext, ActorSystem, Props};
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! impl Actor for Echo {
//!     type Msg = String;
//!
//!     async fn receive(&mut self, ctx: &ActorContext, message: String) -> Result<(), ActorProcessingErr> {
//!         ctx.reply(message)?;
//!         Ok(())
//!     }
//! }
//!
//! let system = ActorSystem::create("demo")?;
//! let echo = system.actor_of(&Props::<Echo>::of(), "echo").await?;
//! let reply: String = echo.ask("hello".to_string(), Duration::from_secs(1)).await?;
//! system.shutdown().await;
//! ```

mod actor;
mod ask;
mod handle;
mod host;
mod messages;
mod props;
pub mod registry;
mod router;
mod sender;
mod supervision;
mod system;

pub use actor::{Actor, ActorContext, Construct};
pub use ask::{PipeTo, await_result};
pub use handle::ActorHandle;
pub use messages::{Payload, StatusFailure};
pub use props::{Creator, CreatorSource, Props, PropsOptions, PropsResolver};
pub use registry::{SystemRegistry, global_registry};
pub use sender::SenderContext;
pub use supervision::{
    DecisionFn, FailureCause, FaultHandler, PanicError, StrategyKind, SupervisorStrategy,
};
pub use system::ActorSystem;

pub use troupe_core::{
    ActorError, ActorResult, GuardianConfig, PolicyKind, RouterConfig, SupervisorDecision,
    SystemConfig, parse_duration,
};

/// Re-export ractor types for convenience.
pub use ractor::{ActorId, ActorProcessingErr, concurrency};
