//! Router-backed actors.
//!
//! A router is a ractor actor that owns `n` routees, spawned as its linked
//! children from the same props, and forwards each message to one or all of
//! them according to its [`RouterConfig`].

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::select_ok;
use ractor::rpc::CallResult;
use ractor::{ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use troupe_core::{ActorError, ActorResult, RouterConfig};

use crate::actor::Actor;
use crate::handle::ActorHandle;
use crate::host::{Host, HostArgs, forward_to_siblings, stop_children_and_wait};
use crate::messages::{Directive, Envelope, Payload, StatusFailure};
use crate::props::Props;
use crate::sender::SenderContext;
use crate::supervision::{Escalated, SupervisorLink};
use crate::system::{ActorSystem, start};

impl<A: Actor> Props<A> {
    /// New props whose instances are routers over `n` routees built from these props.
    ///
    /// The original props are unchanged. Fails with `Configuration` for zero
    /// routees or a zero scatter-gather window.
    pub fn with_router(&self, router: RouterConfig) -> ActorResult<Props<A>> {
        router.validate()?;
        let mut props = self.clone();
        props.router = Some(router);
        Ok(props)
    }
}

impl ActorHandle {
    /// Send `message` to every current routee of a router.
    ///
    /// On a plain actor this is an ordinary tell.
    pub fn broadcast<M: Clone + Send + Sync + 'static>(&self, message: M) -> ActorResult<()> {
        self.send_envelope(Envelope::Broadcast {
            payload: Payload::new(message),
            sender: SenderContext::current(),
        })
    }

    /// Ask a router for its current routees, in routing order.
    pub async fn current_routees(&self, timeout: Duration) -> ActorResult<Vec<ActorHandle>> {
        let actor = self
            .resolve()
            .ok_or_else(|| ActorError::Terminated(self.path()))?;
        let result = ractor::rpc::call(
            &actor,
            |reply| Envelope::GetRoutees { reply },
            Some(timeout),
        )
        .await;
        match result {
            Ok(CallResult::Success(routees)) => Ok(routees),
            Ok(CallResult::Timeout) => Err(ActorError::Timeout(timeout)),
            Ok(CallResult::SenderError) => Err(ActorError::Configuration(format!(
                "{} is not a router",
                self.path()
            ))),
            Err(_) => Err(ActorError::Terminated(self.path())),
        }
    }
}

/// ractor actor running the routing logic for routees of type `A`.
pub(crate) struct RouterHost<A: Actor> {
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> RouterHost<A> {
    pub(crate) fn new() -> Self {
        Self {
            _actor: PhantomData,
        }
    }
}

pub(crate) struct RouterArgs<A: Actor> {
    /// Routee props, without the router.
    pub(crate) props: Props<A>,
    /// Already resolved, never `FromConfig`.
    pub(crate) config: RouterConfig,
    pub(crate) path: String,
    pub(crate) system: ActorSystem,
    pub(crate) link: SupervisorLink,
}

struct Routee {
    handle: ActorHandle,
    id: ActorId,
    load: Option<Arc<AtomicUsize>>,
}

impl Routee {
    fn send(&self, payload: Payload, sender: Option<ActorHandle>) {
        if let Some(load) = &self.load {
            load.fetch_add(1, Ordering::AcqRel);
        }
        if let Err(e) = self.handle.deliver(payload, sender) {
            if let Some(load) = &self.load {
                let _ = load.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            }
            tracing::debug!(routee = %self.handle, error = %e, "routee unreachable, message dropped");
        }
    }

    fn pending(&self) -> usize {
        self.load.as_ref().map_or(0, |load| load.load(Ordering::Acquire))
    }
}

enum Logic {
    RoundRobin { next: usize },
    Random,
    SmallestMailbox,
    Broadcast,
    ScatterGather { within: Duration },
    ConsistentHashing { virtual_nodes: usize, ring: BTreeMap<u64, ActorId> },
}

impl Logic {
    fn from_config(config: &RouterConfig) -> ActorResult<Self> {
        Ok(match config {
            RouterConfig::RoundRobin { .. } => Logic::RoundRobin { next: 0 },
            RouterConfig::Random { .. } => Logic::Random,
            RouterConfig::SmallestMailbox { .. } => Logic::SmallestMailbox,
            RouterConfig::Broadcast { .. } => Logic::Broadcast,
            RouterConfig::ScatterGatherFirstCompleted { within, .. } => {
                Logic::ScatterGather { within: *within }
            }
            RouterConfig::ConsistentHashing {
                virtual_nodes_factor,
                ..
            } => Logic::ConsistentHashing {
                virtual_nodes: (*virtual_nodes_factor).max(1),
                ring: BTreeMap::new(),
            },
            RouterConfig::FromConfig { name } => {
                return Err(ActorError::Configuration(format!(
                    "router deployment {name:?} was not resolved"
                )));
            }
        })
    }
}

fn ring_point(path: &str, replica: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    replica.hash(&mut hasher);
    hasher.finish()
}

pub(crate) struct RouterState {
    handle: ActorHandle,
    routees: Vec<Routee>,
    logic: Logic,
    link: SupervisorLink,
}

impl RouterState {
    fn rebuild_ring(&mut self) {
        if let Logic::ConsistentHashing {
            virtual_nodes,
            ring,
        } = &mut self.logic
        {
            ring.clear();
            for routee in &self.routees {
                let path = routee.handle.path();
                for replica in 0..*virtual_nodes {
                    ring.insert(ring_point(&path, replica), routee.id.clone());
                }
            }
        }
    }

    fn route(&mut self, payload: Payload, sender: Option<ActorHandle>) {
        if self.routees.is_empty() {
            tracing::debug!(router = %self.handle, "no routees, message dropped");
            return;
        }

        let index = match &mut self.logic {
            Logic::RoundRobin { next } => {
                let index = *next % self.routees.len();
                *next = next.wrapping_add(1);
                index
            }
            Logic::Random => fastrand::usize(..self.routees.len()),
            Logic::SmallestMailbox => self
                .routees
                .iter()
                .enumerate()
                .min_by_key(|(_, routee)| routee.pending())
                .map_or(0, |(index, _)| index),
            Logic::Broadcast => {
                self.broadcast(payload, sender);
                return;
            }
            Logic::ScatterGather { within } => {
                let within = *within;
                self.scatter_gather(payload, sender, within);
                return;
            }
            Logic::ConsistentHashing { ring, .. } => {
                let Some(key) = payload.hash_key() else {
                    tracing::warn!(
                        router = %self.handle,
                        message = payload.type_name(),
                        "message without hash key dropped by consistent-hashing router"
                    );
                    return;
                };
                let owner = ring
                    .range(key..)
                    .next()
                    .or_else(|| ring.iter().next())
                    .map(|(_, id)| id.clone());
                match owner.and_then(|id| self.routees.iter().position(|r| r.id == id)) {
                    Some(index) => index,
                    None => return,
                }
            }
        };

        self.routees[index].send(payload, sender);
    }

    fn broadcast(&self, payload: Payload, sender: Option<ActorHandle>) {
        for routee in &self.routees {
            routee.send(payload.clone(), sender.clone());
        }
    }

    /// Ask every routee; the first reply goes to `sender`.
    fn scatter_gather(&self, payload: Payload, sender: Option<ActorHandle>, within: Duration) {
        let Some(sender) = sender else {
            tracing::debug!(router = %self.handle, "scatter-gather without sender, message dropped");
            return;
        };
        let router = self.handle.clone();
        let targets: Vec<ActorHandle> = self.routees.iter().map(|r| r.handle.clone()).collect();

        tokio::spawn(async move {
            let asks = targets
                .iter()
                .map(|target| Box::pin(target.ask_payload(payload.clone(), within)));
            let delivered = match select_ok(asks).await {
                Ok((reply, _)) => sender.deliver(reply, Some(router.clone())),
                Err(e) => {
                    tracing::debug!(%router, error = %e, "no routee answered in time");
                    sender.tell_from(StatusFailure::new(e), Some(router.clone()))
                }
            };
            if let Err(e) = delivered {
                tracing::debug!(%router, error = %e, "scatter-gather reply dropped");
            }
        });
    }

    fn remove(&mut self, id: &ActorId) -> bool {
        let before = self.routees.len();
        self.routees.retain(|routee| &routee.id != id);
        let removed = self.routees.len() != before;
        if removed {
            self.rebuild_ring();
        }
        removed
    }
}

impl<A: Actor> ractor::Actor for RouterHost<A> {
    type Msg = Envelope;
    type State = RouterState;
    type Arguments = RouterArgs<A>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let RouterArgs {
            props,
            config,
            path,
            system,
            link,
        } = args;

        let logic = Logic::from_config(&config)?;
        let count = config.nr_of_instances().unwrap_or(0);
        let routee_link = SupervisorLink {
            strategy: link.strategy.clone(),
            parent: Some(myself.clone()),
        };

        let mut routees = Vec::with_capacity(count);
        for index in 0..count {
            let load = matches!(logic, Logic::SmallestMailbox).then(|| Arc::new(AtomicUsize::new(0)));
            let routee_path = format!("{path}/$routee-{index}");
            let args = HostArgs {
                props: props.clone(),
                path: routee_path.clone(),
                system: system.clone(),
                link: routee_link.clone(),
                load: load.clone(),
            };
            let actor = match start(Host::<A>::new(), args, &routee_path, Some(&myself)).await {
                Ok((actor, _)) => actor,
                Err(e) => {
                    stop_children_and_wait(&myself, "router failed to start").await;
                    return Err(e.into());
                }
            };
            routees.push(Routee {
                id: actor.get_id(),
                handle: ActorHandle::local(actor, routee_path),
                load,
            });
        }

        tracing::debug!(%path, router = config.kind(), routees = count, "router started");

        let mut state = RouterState {
            handle: ActorHandle::local(myself, path),
            routees,
            logic,
            link,
        };
        state.rebuild_ring();
        Ok(state)
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        stop_children_and_wait(&myself, "router stopped").await;
        tracing::debug!(router = %state.handle, "router stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            Envelope::Deliver { payload, sender } => state.route(payload, sender),
            Envelope::Broadcast { payload, sender } => state.broadcast(payload, sender),
            Envelope::GetRoutees { reply } => {
                let routees = state.routees.iter().map(|r| r.handle.clone()).collect();
                if reply.send(routees).is_err() {
                    tracing::debug!(router = %state.handle, "routee query abandoned");
                }
            }
            Envelope::Directive(Directive::Stop) => {
                myself.stop(Some("stopped with failing sibling".to_string()));
            }
            Envelope::Directive(directive @ Directive::Restart(_)) => {
                for routee in &state.routees {
                    if let Err(e) = routee.handle.send_envelope(Envelope::Directive(directive.clone())) {
                        tracing::debug!(routee = %routee.handle, error = %e, "restart directive dropped");
                    }
                }
            }
            Envelope::SiblingDirective { origin, directive } => {
                forward_to_siblings(&myself, origin, &directive);
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let id = match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                if let Ok(escalated) = err.downcast::<Escalated>() {
                    if state.link.parent.is_some() {
                        return Err(escalated as ActorProcessingErr);
                    }
                    tracing::error!(
                        router = %state.handle,
                        error = %escalated.0,
                        "routee failure escalated past the guardian, stopping router"
                    );
                    myself.stop(Some(format!("escalated: {}", escalated.0)));
                }
                cell.get_id()
            }
            SupervisionEvent::ActorTerminated(cell, _, _) => cell.get_id(),
            _ => return Ok(()),
        };

        if state.remove(&id) {
            tracing::debug!(router = %state.handle, routee = %id, "routee removed");
            if state.routees.is_empty() {
                tracing::info!(router = %state.handle, "last routee gone, stopping router");
                myself.stop(Some("no routees left".to_string()));
            }
        }
        Ok(())
    }
}
