//! Request/reply and completion forwarding.

use std::any::type_name;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use troupe_core::{ActorError, ActorResult};

use crate::actor::ActorContext;
use crate::handle::ActorHandle;
use crate::messages::{Payload, StatusFailure};
use crate::registry::global_registry;
use crate::sender::SenderContext;
use crate::system::ActorSystem;

/// How often an abandoned ask checks whether its target has stopped.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl ActorHandle {
    /// Send `message` and wait up to `timeout` for a reply of type `R`.
    ///
    /// The target sees a temporary reply handle as the sender, so a plain
    /// `ctx.reply(..)` answers the ask. Asking a router reaches one routee.
    pub async fn ask<M, R>(&self, message: M, timeout: Duration) -> ActorResult<R>
    where
        M: Clone + Send + Sync + 'static,
        R: 'static,
    {
        let reply = self.ask_payload(Payload::new(message), timeout).await?;
        interpret(reply)
    }

    pub(crate) async fn ask_payload(&self, payload: Payload, timeout: Duration) -> ActorResult<Payload> {
        let deadline = Instant::now() + timeout;
        let (promise, reply) = ActorHandle::promise();
        self.deliver(payload, Some(promise))?;

        match tokio::time::timeout_at(deadline, reply).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => self.await_stop_until(deadline, timeout).await,
            Err(_) => Err(ActorError::Timeout(timeout)),
        }
    }

    /// The reply handle was dropped unanswered.
    ///
    /// A failing target drops it before its supervisor stops it, so watch for
    /// the stop until the deadline: Terminated once it is gone, Timeout if it
    /// is still alive at the deadline.
    async fn await_stop_until(&self, deadline: Instant, timeout: Duration) -> ActorResult<Payload> {
        loop {
            if !self.is_alive() {
                return Err(ActorError::Terminated(self.path()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ActorError::Timeout(timeout));
            }
            tokio::time::sleep_until(deadline.min(now + STOP_POLL_INTERVAL)).await;
        }
    }

    /// Blocking [`ActorHandle::ask`].
    ///
    /// Fails with `WouldDeadlock` when called from the target's own hook.
    /// Needs a multi-thread runtime when called from inside tokio.
    pub fn ask_and_wait<M, R>(&self, message: M, timeout: Duration) -> ActorResult<R>
    where
        M: Clone + Send + Sync + 'static,
        R: 'static,
    {
        let target = self.id();
        if SenderContext::current()
            .is_some_and(|current| current == *self || (target.is_some() && current.id() == target))
        {
            return Err(ActorError::WouldDeadlock(self.path()));
        }
        await_result(self.ask::<M, R>(message, timeout), timeout)?
    }
}

impl ActorSystem {
    /// [`ActorHandle::ask`] with the configured `ask_timeout`.
    pub async fn ask<M, R>(&self, target: &ActorHandle, message: M) -> ActorResult<R>
    where
        M: Clone + Send + Sync + 'static,
        R: 'static,
    {
        target.ask(message, self.config().ask_timeout).await
    }
}

impl ActorContext {
    /// Ask another actor with the system's `ask_timeout`.
    pub async fn ask<M, R>(&self, target: &ActorHandle, message: M) -> ActorResult<R>
    where
        M: Clone + Send + Sync + 'static,
        R: 'static,
    {
        self.system().ask(target, message).await
    }
}

fn interpret<R: 'static>(reply: Payload) -> ActorResult<R> {
    match reply.downcast::<R>() {
        Ok(value) => Ok(value),
        Err(reply) => match reply.downcast_ref::<StatusFailure>() {
            Some(failure) => Err(ActorError::Failed(failure.to_string())),
            None => Err(ActorError::UnexpectedReply {
                expected: type_name::<R>(),
                actual: reply.type_name(),
            }),
        },
    }
}

/// Block the calling thread until `future` completes or `timeout` passes.
pub fn await_result<F: Future>(future: F, timeout: Duration) -> ActorResult<F::Output> {
    let bounded = async move {
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| ActorError::Timeout(timeout))
    };

    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Err(ActorError::Configuration(
                "blocking wait on a current-thread runtime".into(),
            )),
            _ => tokio::task::block_in_place(|| handle.block_on(bounded)),
        },
        Err(_) => match global_registry().runtime() {
            Some(handle) => handle.block_on(bounded),
            None => Err(ActorError::Configuration(
                "no tokio runtime available for a blocking wait".into(),
            )),
        },
    }
}

/// Forward the outcome of a future to an actor.
pub trait PipeTo: Sized {
    /// Deliver `Ok(v)` as `v` and `Err(e)` as a [`StatusFailure`] wrapping `e`.
    ///
    /// The sender of the delivery is the actor that called `pipe_to`, if any.
    fn pipe_to(self, target: &ActorHandle) -> JoinHandle<()>;
}

impl<F, T, E> PipeTo for F
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn pipe_to(self, target: &ActorHandle) -> JoinHandle<()> {
        let target = target.clone();
        let sender = SenderContext::current();
        tokio::spawn(async move {
            let delivered = match self.await {
                Ok(value) => target.tell_from(value, sender),
                Err(error) => target.tell_from(StatusFailure::new(error), sender),
            };
            if let Err(e) = delivered {
                tracing::warn!(%target, error = %e, "piped result undeliverable");
            }
        })
    }
}
