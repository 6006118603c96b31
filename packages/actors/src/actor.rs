//! The user-facing actor trait and the context its hooks receive.

use std::future::Future;

use ractor::{ActorProcessingErr, ActorRef};
use troupe_core::ActorResult;

use crate::handle::ActorHandle;
use crate::messages::Envelope;
use crate::props::Props;
use crate::supervision::{FailureCause, SupervisorStrategy};
use crate::system::{ActorSystem, Parent, spawn_actor};

/// An actor defined through the facade.
///
/// Only `receive` is required. Every hook runs with the actor registered as
/// the task's current actor, so plain `tell` calls made inside a hook carry
/// this actor as their sender. An error or panic from any hook is reported to
/// the supervisor unchanged.
pub trait Actor: Send + Sized + 'static {
    /// Messages this actor handles. Anything else is logged as unhandled.
    type Msg: Clone + Send + Sync + 'static;

    fn receive(
        &mut self,
        ctx: &ActorContext,
        message: Self::Msg,
    ) -> impl Future<Output = Result<(), ActorProcessingErr>> + Send;

    /// Runs after creation, and on the fresh instance after a restart.
    fn pre_start(
        &mut self,
        _ctx: &ActorContext,
    ) -> impl Future<Output = Result<(), ActorProcessingErr>> + Send {
        async { Ok(()) }
    }

    /// Runs when the actor stops, and on the old instance before a restart.
    fn post_stop(
        &mut self,
        _ctx: &ActorContext,
    ) -> impl Future<Output = Result<(), ActorProcessingErr>> + Send {
        async { Ok(()) }
    }

    /// Runs on the old instance before it is replaced.
    fn pre_restart(
        &mut self,
        _ctx: &ActorContext,
        _cause: &FailureCause,
        _message: Option<Self::Msg>,
    ) -> impl Future<Output = Result<(), ActorProcessingErr>> + Send {
        async { Ok(()) }
    }

    /// Runs on the new instance after it replaced a failed one.
    fn post_restart(
        &mut self,
        _ctx: &ActorContext,
        _cause: &FailureCause,
    ) -> impl Future<Output = Result<(), ActorProcessingErr>> + Send {
        async { Ok(()) }
    }

    /// Strategy applied to children of this actor type.
    fn supervisor_strategy() -> SupervisorStrategy {
        SupervisorStrategy::default()
    }
}

/// Actors built from a type plus constructor arguments.
///
/// `Props::with_args` keeps the arguments and calls `construct` with a clone
/// of them on every instantiation.
pub trait Construct: Actor {
    type Args: Clone + Send + Sync + 'static;

    fn construct(args: Self::Args) -> Result<Self, ActorProcessingErr>;
}

/// What a hook can see and do.
pub struct ActorContext {
    myself: ActorHandle,
    actor: ActorRef<Envelope>,
    path: String,
    sender: Option<ActorHandle>,
    system: ActorSystem,
    strategy: SupervisorStrategy,
}

impl ActorContext {
    pub(crate) fn new(
        myself: ActorHandle,
        actor: ActorRef<Envelope>,
        system: ActorSystem,
        strategy: SupervisorStrategy,
    ) -> Self {
        Self {
            path: myself.path(),
            myself,
            actor,
            sender: None,
            system,
            strategy,
        }
    }

    /// Handle of the actor running this hook.
    pub fn myself(&self) -> &ActorHandle {
        &self.myself
    }

    /// Sender of the message being processed, if it had one.
    pub fn sender(&self) -> Option<&ActorHandle> {
        self.sender.as_ref()
    }

    pub(crate) fn set_sender(&mut self, sender: Option<ActorHandle>) {
        self.sender = sender;
    }

    /// Reply to the sender of the current message.
    ///
    /// Without a sender the reply is dropped and logged.
    pub fn reply<M: Clone + Send + Sync + 'static>(&self, message: M) -> ActorResult<()> {
        match &self.sender {
            Some(sender) => sender.tell_from(message, Some(self.myself.clone())),
            None => {
                tracing::debug!(path = %self.path, "reply without sender dropped");
                Ok(())
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Strategy this actor applies to its children.
    pub fn supervisor_strategy(&self) -> &SupervisorStrategy {
        &self.strategy
    }

    /// Spawn a child supervised by this actor.
    pub async fn actor_of<C: Actor>(&self, props: &Props<C>, name: &str) -> ActorResult<ActorHandle> {
        spawn_actor(&self.system, props, Some(name), Some(self.as_parent())).await
    }

    /// Spawn a child with a generated name.
    pub async fn spawn_anonymous<C: Actor>(&self, props: &Props<C>) -> ActorResult<ActorHandle> {
        spawn_actor(&self.system, props, None, Some(self.as_parent())).await
    }

    /// Current children, in no particular order.
    pub fn children(&self) -> Vec<ActorHandle> {
        self.actor
            .get_children()
            .into_iter()
            .map(|cell| {
                let path = cell.get_name().unwrap_or_default();
                ActorHandle::local(ActorRef::from(cell), path)
            })
            .collect()
    }

    /// Stop this actor once the current hook returns.
    pub fn stop(&self) {
        self.actor.stop(None);
    }

    fn as_parent(&self) -> Parent {
        Parent {
            actor: self.actor.clone(),
            path: self.path.clone(),
            strategy: self.strategy.clone(),
        }
    }
}
