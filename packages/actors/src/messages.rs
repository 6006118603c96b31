//! Message types for actor communication.
//!
//! Every facade actor, plain or router, runs on ractor with the same message
//! type, [`Envelope`]. User messages travel inside it as a type-erased
//! [`Payload`], which is what lets one untyped [`ActorHandle`] address any
//! facade actor and lets replies flow back without naming a reply type.

use std::any::{Any, type_name};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use ractor::RpcReplyPort;
use ractor::ActorId;

use crate::handle::ActorHandle;
use crate::supervision::FailureCause;

trait CloneMessage: Any + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn CloneMessage>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Clone + Send + Sync + 'static> CloneMessage for T {
    fn clone_boxed(&self) -> Box<dyn CloneMessage> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A type-erased user message.
///
/// Any `Clone + Send + Sync + 'static` value can be a message. Cloneability is
/// required so broadcasts and scatter-gather routers can fan a message out.
pub struct Payload {
    value: Box<dyn CloneMessage>,
    hash_key: Option<u64>,
}

impl Payload {
    pub fn new<M: Clone + Send + Sync + 'static>(message: M) -> Self {
        Self {
            value: Box::new(message),
            hash_key: None,
        }
    }

    /// Attach a consistent-hashing key.
    pub fn with_hash_key<K: Hash + ?Sized>(mut self, key: &K) -> Self {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.hash_key = Some(hasher.finish());
        self
    }

    pub fn hash_key(&self) -> Option<u64> {
        self.hash_key
    }

    pub fn is<M: 'static>(&self) -> bool {
        self.value.as_any().is::<M>()
    }

    pub fn downcast_ref<M: 'static>(&self) -> Option<&M> {
        self.value.as_any().downcast_ref::<M>()
    }

    /// Take the message out as `M`, or get the payload back untouched.
    pub fn downcast<M: 'static>(self) -> Result<M, Payload> {
        if !self.is::<M>() {
            return Err(self);
        }
        match self.value.into_any().downcast::<M>() {
            Ok(message) => Ok(*message),
            Err(_) => unreachable!("type checked by `is` above"),
        }
    }

    /// Rust type name of the carried message, for logs and errors.
    pub fn type_name(&self) -> &'static str {
        self.value.type_name()
    }
}

impl Clone for Payload {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone_boxed(),
            hash_key: self.hash_key,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("type", &self.type_name())
            .field("hash_key", &self.hash_key)
            .finish()
    }
}

/// Failure notification delivered in place of a value.
///
/// `pipe_to` sends this when the piped future fails; `ask` turns it into
/// `ActorError::Failed`. The original error is kept and can be downcast.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{error}")]
pub struct StatusFailure {
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

impl StatusFailure {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self {
            error: Arc::new(error),
        }
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

/// Supervisor instruction sent to a child.
#[derive(Debug, Clone)]
pub enum Directive {
    Restart(FailureCause),
    Stop,
}

/// Messages understood by every facade actor.
#[derive(Debug)]
pub enum Envelope {
    /// A user message and its implicit sender.
    Deliver {
        payload: Payload,
        sender: Option<ActorHandle>,
    },

    /// A message for every routee of a router.
    Broadcast {
        payload: Payload,
        sender: Option<ActorHandle>,
    },

    /// Ask a router for its current routees.
    GetRoutees { reply: RpcReplyPort<Vec<ActorHandle>> },

    /// Apply a supervisor decision taken elsewhere.
    Directive(Directive),

    /// From a failing child: apply `directive` to all of its siblings.
    SiblingDirective { origin: ActorId, directive: Directive },
}
