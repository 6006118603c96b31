//! Runtime binding: the ractor actor that hosts a facade actor.
//!
//! `Host<A>` owns the user instance, sets the current actor around every
//! hook, and applies its supervisor's strategy when a hook fails. ractor
//! reports failures but never restarts anything, so restart, retry budgets
//! and sibling directives all live here.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use ractor::{ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use troupe_core::{PolicyKind, SupervisorDecision};

use crate::actor::{Actor, ActorContext};
use crate::handle::ActorHandle;
use crate::messages::{Directive, Envelope, Payload};
use crate::props::Props;
use crate::sender::SenderContext;
use crate::supervision::{Escalated, FailureCause, PanicError, RestartStats, SupervisorLink};
use crate::system::ActorSystem;

/// How long a restarting actor waits for each child to stop.
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one user hook with `ctx`'s actor as the current actor.
///
/// Panics are caught and reported as [`PanicError`], so they reach the
/// supervisor like any other failure.
pub(crate) async fn invoke<F>(ctx: &ActorContext, hook: F) -> Result<(), ActorProcessingErr>
where
    F: Future<Output = Result<(), ActorProcessingErr>> + Send,
{
    let guarded = AssertUnwindSafe(hook).catch_unwind();
    match SenderContext::scope(ctx.myself().clone(), guarded).await {
        Ok(result) => result,
        Err(panic) => Err(Box::new(PanicError::from_payload(panic))),
    }
}

/// Send `directive` to every child of `myself` except `origin`.
pub(crate) fn forward_to_siblings(myself: &ActorRef<Envelope>, origin: ActorId, directive: &Directive) {
    for child in myself.get_children() {
        if child.get_id() == origin {
            continue;
        }
        let child: ActorRef<Envelope> = ActorRef::from(child);
        if child
            .send_message(Envelope::Directive(directive.clone()))
            .is_err()
        {
            tracing::debug!(child = %child.get_id(), "sibling gone, directive dropped");
        }
    }
}

/// Stop every child of `myself` and wait for them to finish.
pub(crate) async fn stop_children_and_wait(myself: &ActorRef<Envelope>, reason: &str) {
    let children = myself.get_children();
    if children.is_empty() {
        return;
    }
    let stops = children
        .iter()
        .map(|child| child.stop_and_wait(Some(reason.to_string()), Some(CHILD_STOP_TIMEOUT)));
    for result in join_all(stops).await {
        if let Err(e) = result {
            tracing::debug!(error = %e, "child did not stop cleanly");
        }
    }
}

/// ractor actor hosting a facade actor of type `A`.
pub(crate) struct Host<A: Actor> {
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> Host<A> {
    pub(crate) fn new() -> Self {
        Self {
            _actor: PhantomData,
        }
    }
}

/// Startup arguments for [`Host`].
pub(crate) struct HostArgs<A: Actor> {
    pub(crate) props: Props<A>,
    pub(crate) path: String,
    pub(crate) system: ActorSystem,
    pub(crate) link: SupervisorLink,
    /// Pending-message gauge shared with a smallest-mailbox router.
    pub(crate) load: Option<Arc<AtomicUsize>>,
}

/// Per-actor state: the live user instance and its bookkeeping.
pub(crate) struct HostState<A: Actor> {
    instance: A,
    ctx: ActorContext,
    props: Props<A>,
    link: SupervisorLink,
    restarts: RestartStats,
    load: Option<Arc<AtomicUsize>>,
}

impl<A: Actor> HostState<A> {
    async fn deliver(
        &mut self,
        myself: &ActorRef<Envelope>,
        payload: Payload,
        sender: Option<ActorHandle>,
    ) -> Result<(), ActorProcessingErr> {
        let outcome = match payload.downcast::<A::Msg>() {
            Ok(message) => {
                self.ctx.set_sender(sender);
                let result = invoke(&self.ctx, self.instance.receive(&self.ctx, message.clone())).await;
                self.ctx.set_sender(None);
                result.map_err(|err| (err, message))
            }
            Err(payload) => {
                tracing::warn!(
                    path = %self.ctx.path(),
                    message = payload.type_name(),
                    "unhandled message dropped"
                );
                Ok(())
            }
        };

        if let Some(load) = &self.load {
            let _ = load.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }

        match outcome {
            Ok(()) => Ok(()),
            Err((err, message)) => {
                let cause = FailureCause::new(err, Some(self.ctx.myself().clone()));
                self.handle_failure(myself, cause, Some(message)).await
            }
        }
    }

    /// Apply the supervisor's decision for a failure of this actor.
    async fn handle_failure(
        &mut self,
        myself: &ActorRef<Envelope>,
        cause: FailureCause,
        message: Option<A::Msg>,
    ) -> Result<(), ActorProcessingErr> {
        let strategy = self.link.strategy.clone();
        let decision = strategy.decide(&cause);
        tracing::warn!(
            path = %self.ctx.path(),
            error = %cause,
            decision = %decision,
            "actor failed"
        );

        match decision {
            SupervisorDecision::Resume => Ok(()),
            SupervisorDecision::Restart => {
                if !self
                    .restarts
                    .request_restart(strategy.max_retries(), strategy.window())
                {
                    tracing::error!(
                        path = %self.ctx.path(),
                        max_retries = strategy.max_retries(),
                        "restart budget exhausted, stopping actor"
                    );
                    self.stop_with_siblings(myself, "restart budget exhausted");
                    return Ok(());
                }
                if strategy.policy() == PolicyKind::AllForOne {
                    self.link
                        .notify_siblings(myself, Directive::Restart(cause.clone()));
                }
                self.restart(myself, cause, message).await;
                Ok(())
            }
            SupervisorDecision::Stop => {
                self.stop_with_siblings(myself, "stopped by supervisor");
                Ok(())
            }
            SupervisorDecision::Escalate => {
                if self.link.parent.is_none() {
                    tracing::error!(
                        path = %self.ctx.path(),
                        error = %cause,
                        "failure escalated past the guardian, stopping actor"
                    );
                    myself.stop(Some(format!("escalated: {cause}")));
                    return Ok(());
                }
                // ractor skips post_stop when handle fails.
                stop_children_and_wait(myself, "parent escalated").await;
                if let Err(e) = invoke(&self.ctx, self.instance.post_stop(&self.ctx)).await {
                    tracing::warn!(path = %self.ctx.path(), error = %e, "post_stop failed");
                }
                Err(Box::new(Escalated(cause)))
            }
        }
    }

    fn stop_with_siblings(&self, myself: &ActorRef<Envelope>, reason: &str) {
        if self.link.strategy.policy() == PolicyKind::AllForOne {
            self.link.notify_siblings(myself, Directive::Stop);
        }
        myself.stop(Some(reason.to_string()));
    }

    /// Replace the instance with a fresh one from the props.
    ///
    /// Order: stop children, old `post_stop`, old `pre_restart`, create,
    /// new `pre_start`, new `post_restart`. Hook failures on the old instance
    /// are logged; a failing creator or new instance stops the actor.
    async fn restart(&mut self, myself: &ActorRef<Envelope>, cause: FailureCause, message: Option<A::Msg>) {
        tracing::info!(path = %self.ctx.path(), error = %cause, "restarting actor");

        stop_children_and_wait(myself, "supervisor restarting").await;
        if let Err(e) = invoke(&self.ctx, self.instance.post_stop(&self.ctx)).await {
            tracing::warn!(path = %self.ctx.path(), error = %e, "post_stop failed during restart");
        }
        if let Err(e) = invoke(
            &self.ctx,
            self.instance.pre_restart(&self.ctx, &cause, message),
        )
        .await
        {
            tracing::warn!(path = %self.ctx.path(), error = %e, "pre_restart failed");
        }

        let mut fresh = match self.props.instantiate() {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::error!(path = %self.ctx.path(), error = %e, "creator failed during restart, stopping actor");
                myself.stop(Some(format!("restart failed: {e}")));
                return;
            }
        };

        let started = match invoke(&self.ctx, fresh.pre_start(&self.ctx)).await {
            Ok(()) => invoke(&self.ctx, fresh.post_restart(&self.ctx, &cause)).await,
            Err(e) => Err(e),
        };
        self.instance = fresh;
        tracing::debug!(path = %self.ctx.path(), "actor restarted");

        if let Err(e) = started {
            tracing::error!(path = %self.ctx.path(), error = %e, "restarted actor failed to start, stopping actor");
            myself.stop(Some(format!("restart failed: {e}")));
        }
    }

    async fn apply_directive(&mut self, myself: &ActorRef<Envelope>, directive: Directive) {
        match directive {
            Directive::Restart(cause) => self.restart(myself, cause, None).await,
            Directive::Stop => myself.stop(Some("stopped with failing sibling".to_string())),
        }
    }
}

/// Handle a supervision event on behalf of a facade actor.
///
/// An escalated child failure is handled as a failure of this actor.
async fn on_child_event<A: Actor>(
    myself: &ActorRef<Envelope>,
    event: SupervisionEvent,
    state: &mut HostState<A>,
) -> Result<(), ActorProcessingErr> {
    match event {
        SupervisionEvent::ActorFailed(cell, err) => match err.downcast::<Escalated>() {
            Ok(escalated) => {
                let Escalated(cause) = *escalated;
                tracing::warn!(
                    path = %state.ctx.path(),
                    child = %cell.get_name().unwrap_or_default(),
                    "child escalated failure"
                );
                let cause = cause.with_actor(state.ctx.myself().clone());
                state.handle_failure(myself, cause, None).await
            }
            Err(err) => {
                tracing::warn!(
                    path = %state.ctx.path(),
                    child = %cell.get_name().unwrap_or_default(),
                    error = %err,
                    "child failed outside supervision"
                );
                Ok(())
            }
        },
        SupervisionEvent::ActorTerminated(cell, _, reason) => {
            tracing::debug!(
                path = %state.ctx.path(),
                child = %cell.get_name().unwrap_or_default(),
                reason = reason.as_deref().unwrap_or("normal"),
                "child terminated"
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

impl<A: Actor> ractor::Actor for Host<A> {
    type Msg = Envelope;
    type State = HostState<A>;
    type Arguments = HostArgs<A>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let HostArgs {
            props,
            path,
            system,
            link,
            load,
        } = args;

        if let Some(dispatcher) = props.dispatcher() {
            tracing::debug!(%path, dispatcher, "dispatcher override is advisory");
        }

        let handle = ActorHandle::local(myself.clone(), path);
        let ctx = ActorContext::new(handle, myself.clone(), system, A::supervisor_strategy());
        let mut instance = props.instantiate()?;
        invoke(&ctx, instance.pre_start(&ctx)).await?;
        tracing::debug!(path = %ctx.path(), "actor started");

        Ok(HostState {
            instance,
            ctx,
            props,
            link,
            restarts: RestartStats::default(),
            load,
        })
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // ractor kills leftover children on exit, skipping their post_stop.
        stop_children_and_wait(&myself, "parent stopped").await;
        if let Err(e) = invoke(&state.ctx, state.instance.post_stop(&state.ctx)).await {
            tracing::warn!(path = %state.ctx.path(), error = %e, "post_stop failed");
        }
        tracing::debug!(path = %state.ctx.path(), "actor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Envelope::Deliver { payload, sender } | Envelope::Broadcast { payload, sender } => {
                state.deliver(&myself, payload, sender).await
            }
            Envelope::GetRoutees { reply } => {
                tracing::debug!(path = %state.ctx.path(), "routee query on a plain actor");
                drop(reply);
                Ok(())
            }
            Envelope::Directive(directive) => {
                state.apply_directive(&myself, directive).await;
                Ok(())
            }
            Envelope::SiblingDirective { origin, directive } => {
                forward_to_siblings(&myself, origin, &directive);
                Ok(())
            }
        }
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        on_child_event(&myself, message, state).await
    }
}
