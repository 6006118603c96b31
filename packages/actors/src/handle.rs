//! Handles for addressing actors.

use std::hash::Hash;
use std::sync::{Arc, Mutex};

use ractor::{ActorId, ActorRef};
use tokio::sync::oneshot;
use troupe_core::{ActorError, ActorResult};
use ulid::Ulid;

use crate::messages::{Envelope, Payload};
use crate::sender::SenderContext;

/// Reference to a facade actor.
///
/// A handle points at a live actor, at a selection path that is looked up on
/// every send, or at the one-shot reply slot of an `ask`. It wraps ractor's
/// `ActorRef` and adds the facade's operations without touching ractor's own
/// types.
#[derive(Clone)]
pub struct ActorHandle {
    target: Target,
}

#[derive(Clone)]
enum Target {
    Local { actor: ActorRef<Envelope>, path: Arc<str> },
    Selection { path: Arc<str> },
    Promise(Arc<Promise>),
}

struct Promise {
    id: Ulid,
    slot: Mutex<Option<oneshot::Sender<Payload>>>,
}

impl ActorHandle {
    pub(crate) fn local(actor: ActorRef<Envelope>, path: impl Into<Arc<str>>) -> Self {
        Self {
            target: Target::Local {
                actor,
                path: path.into(),
            },
        }
    }

    pub(crate) fn selection(path: impl Into<Arc<str>>) -> Self {
        Self {
            target: Target::Selection { path: path.into() },
        }
    }

    /// A handle that completes `reply` with the first message told to it.
    pub(crate) fn promise() -> (Self, oneshot::Receiver<Payload>) {
        let (tx, rx) = oneshot::channel();
        let promise = Promise {
            id: Ulid::new(),
            slot: Mutex::new(Some(tx)),
        };
        (
            Self {
                target: Target::Promise(Arc::new(promise)),
            },
            rx,
        )
    }

    /// Registered path of the actor, or the selection path.
    pub fn path(&self) -> String {
        match &self.target {
            Target::Local { path, .. } | Target::Selection { path } => path.to_string(),
            Target::Promise(promise) => format!("temp/$ask-{}", promise.id),
        }
    }

    /// Runtime id of the actor, for live handles and resolvable selections.
    pub fn id(&self) -> Option<ActorId> {
        self.resolve().map(|actor| actor.get_id())
    }

    /// Whether the actor behind this handle is still reachable.
    pub fn is_alive(&self) -> bool {
        match &self.target {
            Target::Promise(promise) => promise
                .slot
                .lock()
                .map(|slot| slot.as_ref().is_some_and(|tx| !tx.is_closed()))
                .unwrap_or(false),
            _ => self.resolve().is_some_and(|actor| {
                !matches!(
                    actor.get_status(),
                    ractor::ActorStatus::Stopping | ractor::ActorStatus::Stopped
                )
            }),
        }
    }

    /// The ractor reference behind this handle, looked up now for selections.
    pub(crate) fn resolve(&self) -> Option<ActorRef<Envelope>> {
        match &self.target {
            Target::Local { actor, .. } => Some(actor.clone()),
            Target::Selection { path } => {
                ractor::registry::where_is(path.to_string()).map(ActorRef::from)
            }
            Target::Promise(_) => None,
        }
    }

    /// Send `message`; the sender is the actor whose callback is running, if any.
    pub fn tell<M: Clone + Send + Sync + 'static>(&self, message: M) -> ActorResult<()> {
        self.tell_from(message, SenderContext::current())
    }

    /// Send `message` with an explicit sender.
    pub fn tell_from<M: Clone + Send + Sync + 'static>(
        &self,
        message: M,
        sender: Option<ActorHandle>,
    ) -> ActorResult<()> {
        self.deliver(Payload::new(message), sender)
    }

    /// Send `message` with a consistent-hashing key for hashing routers.
    pub fn tell_hashed<K, M>(&self, key: &K, message: M) -> ActorResult<()>
    where
        K: Hash + ?Sized,
        M: Clone + Send + Sync + 'static,
    {
        self.deliver(
            Payload::new(message).with_hash_key(key),
            SenderContext::current(),
        )
    }

    pub(crate) fn deliver(&self, payload: Payload, sender: Option<ActorHandle>) -> ActorResult<()> {
        match &self.target {
            Target::Promise(promise) => {
                let tx = promise.slot.lock().ok().and_then(|mut slot| slot.take());
                match tx {
                    Some(tx) => tx
                        .send(payload)
                        .map_err(|_| ActorError::Terminated(self.path())),
                    None => {
                        tracing::trace!(path = %self.path(), "reply to completed ask dropped");
                        Ok(())
                    }
                }
            }
            _ => self.send_envelope(Envelope::Deliver { payload, sender }),
        }
    }

    pub(crate) fn send_envelope(&self, envelope: Envelope) -> ActorResult<()> {
        let actor = self
            .resolve()
            .ok_or_else(|| ActorError::Terminated(self.path()))?;
        actor
            .send_message(envelope)
            .map_err(|_| ActorError::Terminated(self.path()))
    }

    /// Stop the actor after the message it is processing.
    pub fn stop(&self) {
        if let Some(actor) = self.resolve() {
            actor.stop(None);
        }
    }
}

impl PartialEq for ActorHandle {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (Target::Local { actor: a, .. }, Target::Local { actor: b, .. }) => {
                a.get_id() == b.get_id()
            }
            (Target::Selection { path: a }, Target::Selection { path: b }) => a == b,
            (Target::Promise(a), Target::Promise(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ActorHandle {}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Target::Local { actor, path } => f
                .debug_struct("ActorHandle")
                .field("path", path)
                .field("id", &actor.get_id())
                .finish(),
            Target::Selection { path } => f.debug_tuple("ActorSelection").field(path).finish(),
            Target::Promise(promise) => f.debug_tuple("AskPromise").field(&promise.id).finish(),
        }
    }
}

impl std::fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}
