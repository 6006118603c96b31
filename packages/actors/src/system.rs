//! The actor system: naming, the user guardian, and top-level actors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use ractor::{ActorRef, SpawnErr};
use tokio::task::JoinHandle;
use troupe_core::{ActorError, ActorResult, RouterConfig, SystemConfig};
use ulid::Ulid;

use crate::actor::Actor;
use crate::handle::ActorHandle;
use crate::host::{Host, HostArgs};
use crate::messages::Envelope;
use crate::props::Props;
use crate::registry::global_registry;
use crate::router::{RouterArgs, RouterHost};
use crate::supervision::{SupervisorLink, SupervisorStrategy};

/// A running actor system.
///
/// Cheap to clone; every clone refers to the same system. Top-level actors
/// live under `"{name}/user/"` and are supervised by the user guardian, whose
/// strategy comes from [`SystemConfig::guardian`].
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

struct SystemInner {
    name: String,
    config: SystemConfig,
    guardian: SupervisorStrategy,
    top_level: Mutex<Vec<(ActorRef<Envelope>, JoinHandle<()>)>>,
    terminated: AtomicBool,
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        if !self.terminated.load(Ordering::Acquire) {
            global_registry().unregister(&self.name);
        }
    }
}

impl ActorSystem {
    /// Create a system with the default configuration.
    pub fn create(name: impl Into<String>) -> ActorResult<Self> {
        Self::with_config(name, SystemConfig::default())
    }

    /// Create a system with `config`.
    ///
    /// Fails with `NameConflict` while another system with the same name is running.
    pub fn with_config(name: impl Into<String>, config: SystemConfig) -> ActorResult<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(ActorError::Configuration(format!(
                "invalid system name {name:?}"
            )));
        }

        global_registry().register(&name)?;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            global_registry().remember_runtime(handle);
        }

        tracing::info!(system = %name, "actor system started");
        Ok(Self {
            inner: Arc::new(SystemInner {
                guardian: SupervisorStrategy::guardian(&config.guardian),
                name,
                config,
                top_level: Mutex::new(Vec::new()),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Strategy of the user guardian, applied to top-level actors.
    pub fn guardian(&self) -> &SupervisorStrategy {
        &self.inner.guardian
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Spawn a top-level actor at `"{system}/user/{name}"`.
    pub async fn actor_of<A: Actor>(&self, props: &Props<A>, name: &str) -> ActorResult<ActorHandle> {
        spawn_actor(self, props, Some(name), None).await
    }

    /// Spawn a top-level actor with a generated name.
    pub async fn spawn_anonymous<A: Actor>(&self, props: &Props<A>) -> ActorResult<ActorHandle> {
        spawn_actor(self, props, None, None).await
    }

    /// Handle to whatever actor is registered at `path` when a message is sent.
    ///
    /// A path starting with `/` is taken relative to this system, so
    /// `"/user/echo"` and `"{system}/user/echo"` select the same actor.
    pub fn actor_selection(&self, path: &str) -> ActorHandle {
        if path.starts_with('/') {
            ActorHandle::selection(format!("{}{path}", self.name()))
        } else {
            ActorHandle::selection(path)
        }
    }

    /// Stop every top-level actor and wait for them to finish.
    ///
    /// Waits at most [`SystemConfig::shutdown_timeout`]. The system name is
    /// free again afterwards. Calling it twice is harmless.
    pub async fn shutdown(&self) {
        if self.inner.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(system = %self.name(), "shutting down actor system");

        let top_level = match self.inner.top_level.lock() {
            Ok(mut top_level) => std::mem::take(&mut *top_level),
            Err(_) => {
                tracing::warn!(system = %self.name(), "top-level actor list poisoned");
                Vec::new()
            }
        };

        let mut handles = Vec::with_capacity(top_level.len());
        for (actor, handle) in top_level {
            actor.stop(Some("system shutdown".to_string()));
            handles.push(handle);
        }

        let timeout = self.inner.config.shutdown_timeout;
        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            tracing::warn!(system = %self.name(), ?timeout, "shutdown timed out, actors still stopping");
        }

        global_registry().unregister(self.name());
        tracing::info!(system = %self.name(), "actor system stopped");
    }

    fn track(&self, actor: ActorRef<Envelope>, handle: JoinHandle<()>) {
        match self.inner.top_level.lock() {
            Ok(mut top_level) => {
                top_level.retain(|(_, handle)| !handle.is_finished());
                top_level.push((actor, handle));
            }
            Err(_) => tracing::warn!(system = %self.name(), "top-level actor list poisoned"),
        }
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.inner.name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// The actor a new child is linked to.
pub(crate) struct Parent {
    pub(crate) actor: ActorRef<Envelope>,
    pub(crate) path: String,
    /// The parent type's strategy for its children.
    pub(crate) strategy: SupervisorStrategy,
}

fn validate_name(name: &str) -> ActorResult<()> {
    if name.is_empty() || name.contains('/') || name.starts_with('$') {
        return Err(ActorError::Configuration(format!(
            "invalid actor name {name:?}: must be non-empty, without '/', not starting with '$'"
        )));
    }
    Ok(())
}

/// Spawn `props` as a top-level actor (`parent == None`) or as a child.
pub(crate) async fn spawn_actor<A: Actor>(
    system: &ActorSystem,
    props: &Props<A>,
    name: Option<&str>,
    parent: Option<Parent>,
) -> ActorResult<ActorHandle> {
    if system.is_terminated() {
        return Err(ActorError::Terminated(system.name().to_string()));
    }

    let segment = match name {
        Some(name) => {
            validate_name(name)?;
            name.to_string()
        }
        None => format!("${}", Ulid::new()),
    };
    let (path, link) = match parent {
        Some(parent) => (
            format!("{}/{segment}", parent.path),
            SupervisorLink {
                strategy: parent.strategy,
                parent: Some(parent.actor),
            },
        ),
        None => (
            format!("{}/user/{segment}", system.name()),
            SupervisorLink {
                strategy: system.guardian().clone(),
                parent: None,
            },
        ),
    };
    let supervisor = link.parent.clone();

    let (actor, handle) = match props.router() {
        Some(config) => {
            let config = match config {
                RouterConfig::FromConfig { name } => system.config().deployment(name)?,
                other => other.clone(),
            };
            let args = RouterArgs {
                props: props.without_router(),
                config,
                path: path.clone(),
                system: system.clone(),
                link,
            };
            start(RouterHost::<A>::new(), args, &path, supervisor.as_ref()).await?
        }
        None => {
            let args = HostArgs {
                props: props.clone(),
                path: path.clone(),
                system: system.clone(),
                link,
                load: None,
            };
            start(Host::<A>::new(), args, &path, supervisor.as_ref()).await?
        }
    };

    if supervisor.is_none() {
        tracing::info!(%path, "top-level actor started");
        system.track(actor.clone(), handle);
    }
    Ok(ActorHandle::local(actor, path))
}

/// Spawn a ractor actor registered under `path`, linked to `supervisor` if given.
pub(crate) async fn start<H>(
    handler: H,
    args: H::Arguments,
    path: &str,
    supervisor: Option<&ActorRef<Envelope>>,
) -> ActorResult<(ActorRef<Envelope>, JoinHandle<()>)>
where
    H: ractor::Actor<Msg = Envelope>,
{
    let name = Some(path.to_string());
    let spawned = match supervisor {
        Some(supervisor) => H::spawn_linked(name, handler, args, supervisor.get_cell()).await,
        None => H::spawn(name, handler, args).await,
    };
    spawned.map_err(|e| match e {
        SpawnErr::ActorAlreadyRegistered(name) => ActorError::NameConflict(name),
        SpawnErr::StartupFailed(err) => ActorError::ActorInitialization {
            path: path.to_string(),
            reason: err.to_string(),
        },
        other => ActorError::ActorInitialization {
            path: path.to_string(),
            reason: other.to_string(),
        },
    })
}
