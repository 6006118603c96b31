//! Supervision strategies and the bridge from user decision functions to the runtime.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ractor::{ActorProcessingErr, ActorRef};
use tokio::time::Instant;
use troupe_core::{ActorError, ActorResult, GuardianConfig, PolicyKind, SupervisorDecision};

use crate::handle::ActorHandle;
use crate::messages::{Directive, Envelope};

/// Why an actor failed.
///
/// Handed to decision functions and to the restart hooks. The underlying
/// error is shared, so every consumer can downcast it to the concrete type
/// the actor returned.
#[derive(Clone)]
pub struct FailureCause {
    error: Arc<dyn std::error::Error + Send + Sync>,
    actor: Option<ActorHandle>,
    occurred_at: DateTime<Utc>,
}

impl FailureCause {
    pub fn new(error: ActorProcessingErr, actor: Option<ActorHandle>) -> Self {
        Self {
            error: Arc::from(error),
            actor,
            occurred_at: Utc::now(),
        }
    }

    /// Build a cause from a concrete error value.
    pub fn from_error<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::new(Box::new(error), None)
    }

    pub fn error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn is<E: std::error::Error + 'static>(&self) -> bool {
        self.error.is::<E>()
    }

    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// The actor that failed, when known.
    pub fn actor(&self) -> Option<&ActorHandle> {
        self.actor.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub(crate) fn with_actor(mut self, actor: ActorHandle) -> Self {
        self.actor = Some(actor);
        self
    }
}

impl std::fmt::Debug for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureCause")
            .field("error", &self.error.to_string())
            .field("actor", &self.actor)
            .field("occurred_at", &self.occurred_at)
            .finish()
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// A user hook panicked.
#[derive(Debug, thiserror::Error)]
#[error("actor panicked: {0}")]
pub struct PanicError(pub String);

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        PanicError(message)
    }
}

/// Carrier for a failure a child handed up to its parent.
#[derive(Debug, thiserror::Error)]
#[error("escalated: {0}")]
pub(crate) struct Escalated(pub FailureCause);

/// The fault-decision shape the runtime binding consults when a child fails.
///
/// [`SupervisorStrategy`] builds one from a plain decision function; implement
/// it directly to pass a fully custom strategy through unchanged.
pub trait FaultHandler: Send + Sync + 'static {
    fn policy(&self) -> PolicyKind;

    /// Restarts allowed within [`FaultHandler::window`] before the child is stopped.
    fn max_retries(&self) -> u32;

    /// Zero means the restart count never resets.
    fn window(&self) -> Duration;

    fn decide(&self, cause: &FailureCause) -> SupervisorDecision;
}

/// Decision function over failure causes.
///
/// `None` means the function has no answer for this cause; the strategy's
/// fallback decision applies.
pub type DecisionFn = Arc<dyn Fn(&FailureCause) -> Option<SupervisorDecision> + Send + Sync>;

/// Policy input to [`SupervisorStrategy::build`].
#[derive(Clone)]
pub enum StrategyKind {
    Policy(PolicyKind),
    /// An already-native strategy, used as is.
    Native(Arc<dyn FaultHandler>),
}

impl From<PolicyKind> for StrategyKind {
    fn from(policy: PolicyKind) -> Self {
        StrategyKind::Policy(policy)
    }
}

impl FromStr for StrategyKind {
    type Err = ActorError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        token.parse::<PolicyKind>().map(StrategyKind::Policy)
    }
}

/// Adapts a user decision function to [`FaultHandler`].
struct DeciderAdapter {
    policy: PolicyKind,
    max_retries: u32,
    window: Duration,
    decide: DecisionFn,
    fallback: SupervisorDecision,
}

impl DeciderAdapter {
    fn try_decide(&self, cause: &FailureCause) -> ActorResult<SupervisorDecision> {
        (self.decide)(cause).ok_or_else(|| ActorError::UnknownDecision(cause.to_string()))
    }
}

impl FaultHandler for DeciderAdapter {
    fn policy(&self) -> PolicyKind {
        self.policy
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn decide(&self, cause: &FailureCause) -> SupervisorDecision {
        self.try_decide(cause).unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                fallback = %self.fallback,
                "decision function has no answer for failure, applying fallback"
            );
            self.fallback
        })
    }
}

/// Supervisor strategy attached to an actor type and applied to its children.
#[derive(Clone)]
pub struct SupervisorStrategy {
    handler: Arc<dyn FaultHandler>,
    adapter: Option<Arc<DeciderAdapter>>,
}

impl SupervisorStrategy {
    /// Build a strategy.
    ///
    /// For [`StrategyKind::Native`] the handler is used unchanged and the
    /// remaining arguments are ignored.
    pub fn build<F>(
        kind: impl Into<StrategyKind>,
        max_retries: u32,
        window: Duration,
        decide: F,
    ) -> Self
    where
        F: Fn(&FailureCause) -> Option<SupervisorDecision> + Send + Sync + 'static,
    {
        match kind.into() {
            StrategyKind::Native(handler) => Self::native(handler),
            StrategyKind::Policy(policy) => {
                let adapter = Arc::new(DeciderAdapter {
                    policy,
                    max_retries,
                    window,
                    decide: Arc::new(decide),
                    fallback: SupervisorDecision::Escalate,
                });
                Self {
                    handler: adapter.clone(),
                    adapter: Some(adapter),
                }
            }
        }
    }

    /// Build a strategy from a policy token such as `"one_for_one"`.
    pub fn from_token<F>(token: &str, max_retries: u32, window: Duration, decide: F) -> ActorResult<Self>
    where
        F: Fn(&FailureCause) -> Option<SupervisorDecision> + Send + Sync + 'static,
    {
        let kind: StrategyKind = token.parse()?;
        Ok(Self::build(kind, max_retries, window, decide))
    }

    pub fn one_for_one<F>(max_retries: u32, window: Duration, decide: F) -> Self
    where
        F: Fn(&FailureCause) -> Option<SupervisorDecision> + Send + Sync + 'static,
    {
        Self::build(PolicyKind::OneForOne, max_retries, window, decide)
    }

    pub fn all_for_one<F>(max_retries: u32, window: Duration, decide: F) -> Self
    where
        F: Fn(&FailureCause) -> Option<SupervisorDecision> + Send + Sync + 'static,
    {
        Self::build(PolicyKind::AllForOne, max_retries, window, decide)
    }

    /// Wrap a native handler without adapting it.
    pub fn native(handler: Arc<dyn FaultHandler>) -> Self {
        Self {
            handler,
            adapter: None,
        }
    }

    /// Strategy of the user guardian, from system config.
    pub fn guardian(config: &GuardianConfig) -> Self {
        let decision = config.decision;
        Self::build(config.policy, config.max_retries, config.within, move |_| {
            Some(decision)
        })
    }

    /// Decision applied when the decision function returns `None`.
    ///
    /// Defaults to [`SupervisorDecision::Escalate`]. Has no effect on native strategies.
    pub fn with_fallback(self, fallback: SupervisorDecision) -> Self {
        match self.adapter {
            Some(adapter) => {
                let adapter = Arc::new(DeciderAdapter {
                    policy: adapter.policy,
                    max_retries: adapter.max_retries,
                    window: adapter.window,
                    decide: adapter.decide.clone(),
                    fallback,
                });
                Self {
                    handler: adapter.clone(),
                    adapter: Some(adapter),
                }
            }
            None => self,
        }
    }

    pub fn policy(&self) -> PolicyKind {
        self.handler.policy()
    }

    pub fn max_retries(&self) -> u32 {
        self.handler.max_retries()
    }

    pub fn window(&self) -> Duration {
        self.handler.window()
    }

    /// The decision the runtime binding applies for `cause`.
    pub fn decide(&self, cause: &FailureCause) -> SupervisorDecision {
        self.handler.decide(cause)
    }

    /// Like [`SupervisorStrategy::decide`], but reports a missing answer as
    /// `UnknownDecision` instead of applying the fallback.
    pub fn try_decide(&self, cause: &FailureCause) -> ActorResult<SupervisorDecision> {
        match &self.adapter {
            Some(adapter) => adapter.try_decide(cause),
            None => Ok(self.handler.decide(cause)),
        }
    }
}

impl Default for SupervisorStrategy {
    /// One-for-one, restart on any failure, at most 10 restarts a minute.
    fn default() -> Self {
        Self::one_for_one(10, Duration::from_secs(60), |_| {
            Some(SupervisorDecision::Restart)
        })
    }
}

impl std::fmt::Debug for SupervisorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorStrategy")
            .field("policy", &self.policy())
            .field("max_retries", &self.max_retries())
            .field("window", &self.window())
            .field("native", &self.adapter.is_none())
            .finish()
    }
}

/// Restart bookkeeping for one child.
#[derive(Debug, Default)]
pub(crate) struct RestartStats {
    count: u32,
    window_start: Option<Instant>,
}

impl RestartStats {
    /// Record a restart request; `false` once the budget for the window is spent.
    pub(crate) fn request_restart(&mut self, max_retries: u32, window: Duration) -> bool {
        let now = Instant::now();
        match self.window_start {
            Some(start) if window.is_zero() || now.duration_since(start) <= window => {}
            _ => {
                self.window_start = Some(now);
                self.count = 0;
            }
        }
        self.count += 1;
        self.count <= max_retries
    }
}

/// A child's view of its supervisor: the strategy to consult and who to tell.
#[derive(Clone)]
pub(crate) struct SupervisorLink {
    pub(crate) strategy: SupervisorStrategy,
    /// `None` for top-level actors, supervised by the guardian.
    pub(crate) parent: Option<ActorRef<Envelope>>,
}

impl SupervisorLink {
    /// Ask the parent to apply `directive` to every other child.
    pub(crate) fn notify_siblings(&self, origin: &ActorRef<Envelope>, directive: Directive) {
        if let Some(parent) = &self.parent {
            let message = Envelope::SiblingDirective {
                origin: origin.get_id(),
                directive,
            };
            if parent.send_message(message).is_err() {
                tracing::debug!("supervisor gone, sibling directive dropped");
            }
        }
    }
}
