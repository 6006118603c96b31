//! Actor system configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::{PolicyKind, SupervisorDecision};
use crate::duration::serde_str;
use crate::error::{ActorError, ActorResult};
use crate::router::RouterConfig;

/// Environment variable naming a JSON config file for [`SystemConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "TROUPE_CONFIG";

/// Supervision applied by the user guardian to top-level actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    pub policy: PolicyKind,
    pub max_retries: u32,
    #[serde(with = "serde_str")]
    pub within: Duration,
    /// Decision applied to every failure of a top-level actor.
    pub decision: SupervisorDecision,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::OneForOne,
            max_retries: 10,
            within: Duration::from_secs(60),
            decision: SupervisorDecision::Restart,
        }
    }
}

/// Actor system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Timeout of `ActorSystem::ask` and `ActorContext::ask`.
    #[serde(with = "serde_str")]
    pub ask_timeout: Duration,
    /// How long shutdown waits for top-level actors to stop.
    #[serde(with = "serde_str")]
    pub shutdown_timeout: Duration,
    pub guardian: GuardianConfig,
    /// Named router configurations for `RouterConfig::FromConfig`.
    pub deployment: HashMap<String, RouterConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            guardian: GuardianConfig::default(),
            deployment: HashMap::new(),
        }
    }
}

impl SystemConfig {
    /// Parse a JSON document. Missing fields fall back to defaults.
    pub fn from_json_str(json: &str) -> ActorResult<Self> {
        let config: SystemConfig = serde_json::from_str(json)
            .map_err(|e| ActorError::Configuration(format!("invalid system config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> ActorResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ActorError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Build a config from the environment.
    ///
    /// If `TROUPE_CONFIG` is set it must name a readable JSON file;
    /// otherwise the defaults are used.
    pub fn from_env() -> ActorResult<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Set the default ask timeout.
    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout = timeout;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the guardian supervision settings.
    pub fn with_guardian(mut self, guardian: GuardianConfig) -> Self {
        self.guardian = guardian;
        self
    }

    /// Add a named router deployment.
    pub fn with_deployment(mut self, name: impl Into<String>, router: RouterConfig) -> Self {
        self.deployment.insert(name.into(), router);
        self
    }

    /// Resolve a named router deployment.
    pub fn deployment(&self, name: &str) -> ActorResult<RouterConfig> {
        match self.deployment.get(name) {
            Some(RouterConfig::FromConfig { .. }) => Err(ActorError::Configuration(format!(
                "router deployment {name:?} refers to another deployment"
            ))),
            Some(router) => Ok(router.clone()),
            None => Err(ActorError::Configuration(format!(
                "no router deployment named {name:?}"
            ))),
        }
    }

    fn validate(&self) -> ActorResult<()> {
        for (name, router) in &self.deployment {
            router.validate().map_err(|e| {
                ActorError::Configuration(format!("deployment {name:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() -> ActorResult<()> {
        let config = SystemConfig::from_json_str("{}")?;
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.ask_timeout, Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn parses_guardian_and_deployment() -> ActorResult<()> {
        let config = SystemConfig::from_json_str(
            r#"{
                "ask_timeout": "250ms",
                "guardian": { "policy": "all_for_one", "max_retries": 3, "within": "10s", "decision": "stop" },
                "deployment": {
                    "workers": { "router": "round-robin", "nr_of_instances": 5 }
                }
            }"#,
        )?;
        assert_eq!(config.ask_timeout, Duration::from_millis(250));
        assert_eq!(config.guardian.policy, PolicyKind::AllForOne);
        assert_eq!(config.guardian.decision, SupervisorDecision::Stop);
        assert_eq!(config.deployment("workers")?, RouterConfig::round_robin(5));
        Ok(())
    }

    #[test]
    fn rejects_unknown_decision_tokens() {
        let result = SystemConfig::from_json_str(r#"{ "guardian": { "decision": "shrug" } }"#);
        match result {
            Err(ActorError::Configuration(message)) => assert!(message.contains("shrug")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_deployments() {
        let result = SystemConfig::from_json_str(
            r#"{ "deployment": { "empty": { "router": "broadcast", "nr_of_instances": 0 } } }"#,
        );
        assert!(matches!(result, Err(ActorError::Configuration(_))));
    }

    #[test]
    fn deployment_lookup_does_not_chain() {
        let config = SystemConfig::default()
            .with_deployment("alias", RouterConfig::from_config("workers"))
            .with_deployment("workers", RouterConfig::random(2));
        assert_eq!(config.deployment("workers"), Ok(RouterConfig::random(2)));
        assert!(config.deployment("alias").is_err());
        assert!(config.deployment("missing").is_err());
    }
}
