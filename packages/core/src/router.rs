//! Router configurations that can be attached to props or deployed by name.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ActorError, ActorResult};

/// Virtual nodes per routee on the consistent-hashing ring, unless configured.
pub const DEFAULT_VIRTUAL_NODES: usize = 10;

fn default_virtual_nodes() -> usize {
    DEFAULT_VIRTUAL_NODES
}

/// How a router distributes messages over its routees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "router", rename_all = "kebab-case")]
pub enum RouterConfig {
    /// Cycle through routees in order.
    RoundRobin { nr_of_instances: usize },

    /// Pick a routee uniformly at random.
    Random { nr_of_instances: usize },

    /// Pick the routee with the fewest router-delivered messages still pending.
    SmallestMailbox { nr_of_instances: usize },

    /// Deliver every message to every routee.
    Broadcast { nr_of_instances: usize },

    /// Ask every routee and forward the first reply.
    ScatterGatherFirstCompleted {
        nr_of_instances: usize,
        #[serde(with = "crate::duration::serde_str")]
        within: Duration,
    },

    /// Map each message's hash key onto a ring of routees.
    ConsistentHashing {
        nr_of_instances: usize,
        #[serde(default = "default_virtual_nodes")]
        virtual_nodes_factor: usize,
    },

    /// Look the configuration up in the system's deployment table at spawn time.
    FromConfig { name: String },
}

impl RouterConfig {
    pub fn round_robin(nr_of_instances: usize) -> Self {
        RouterConfig::RoundRobin { nr_of_instances }
    }

    pub fn random(nr_of_instances: usize) -> Self {
        RouterConfig::Random { nr_of_instances }
    }

    pub fn smallest_mailbox(nr_of_instances: usize) -> Self {
        RouterConfig::SmallestMailbox { nr_of_instances }
    }

    pub fn broadcast(nr_of_instances: usize) -> Self {
        RouterConfig::Broadcast { nr_of_instances }
    }

    pub fn scatter_gather(nr_of_instances: usize, within: Duration) -> Self {
        RouterConfig::ScatterGatherFirstCompleted {
            nr_of_instances,
            within,
        }
    }

    pub fn consistent_hashing(nr_of_instances: usize) -> Self {
        RouterConfig::ConsistentHashing {
            nr_of_instances,
            virtual_nodes_factor: DEFAULT_VIRTUAL_NODES,
        }
    }

    pub fn from_config(name: impl Into<String>) -> Self {
        RouterConfig::FromConfig { name: name.into() }
    }

    /// Number of routees the router creates, or `None` when deferred to config.
    pub fn nr_of_instances(&self) -> Option<usize> {
        match self {
            RouterConfig::RoundRobin { nr_of_instances }
            | RouterConfig::Random { nr_of_instances }
            | RouterConfig::SmallestMailbox { nr_of_instances }
            | RouterConfig::Broadcast { nr_of_instances }
            | RouterConfig::ScatterGatherFirstCompleted {
                nr_of_instances, ..
            }
            | RouterConfig::ConsistentHashing {
                nr_of_instances, ..
            } => Some(*nr_of_instances),
            RouterConfig::FromConfig { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RouterConfig::RoundRobin { .. } => "round-robin",
            RouterConfig::Random { .. } => "random",
            RouterConfig::SmallestMailbox { .. } => "smallest-mailbox",
            RouterConfig::Broadcast { .. } => "broadcast",
            RouterConfig::ScatterGatherFirstCompleted { .. } => "scatter-gather-first-completed",
            RouterConfig::ConsistentHashing { .. } => "consistent-hashing",
            RouterConfig::FromConfig { .. } => "from-config",
        }
    }

    /// Check the parameters without touching the runtime.
    pub fn validate(&self) -> ActorResult<()> {
        match self {
            RouterConfig::FromConfig { name } if name.trim().is_empty() => Err(
                ActorError::Configuration("router deployment name must not be empty".into()),
            ),
            RouterConfig::FromConfig { .. } => Ok(()),
            RouterConfig::ScatterGatherFirstCompleted { within, .. } if within.is_zero() => {
                Err(ActorError::Configuration(
                    "scatter-gather router needs a non-zero `within`".into(),
                ))
            }
            RouterConfig::ConsistentHashing {
                virtual_nodes_factor: 0,
                ..
            } => Err(ActorError::Configuration(
                "consistent-hashing router needs at least one virtual node per routee".into(),
            )),
            other => match other.nr_of_instances() {
                Some(0) => Err(ActorError::Configuration(format!(
                    "{} router needs at least one routee",
                    other.kind()
                ))),
                _ => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_routees_is_rejected() {
        assert!(RouterConfig::round_robin(0).validate().is_err());
        assert!(RouterConfig::round_robin(3).validate().is_ok());
        assert!(
            RouterConfig::scatter_gather(2, Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(RouterConfig::from_config(" ").validate().is_err());
    }

    #[test]
    fn deployment_entries_deserialize() -> Result<(), serde_json::Error> {
        let parsed: RouterConfig = serde_json::from_str(
            r#"{"router":"scatter-gather-first-completed","nr_of_instances":4,"within":"250ms"}"#,
        )?;
        assert_eq!(
            parsed,
            RouterConfig::scatter_gather(4, Duration::from_millis(250))
        );

        let hashing: RouterConfig =
            serde_json::from_str(r#"{"router":"consistent-hashing","nr_of_instances":2}"#)?;
        assert_eq!(hashing, RouterConfig::consistent_hashing(2));
        Ok(())
    }
}
