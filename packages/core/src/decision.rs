//! Supervision vocabulary: what a supervisor may decide and how widely it applies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ActorError;

/// Outcome of a supervisor's decision function for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SupervisorDecision {
    /// Fail the supervisor itself with the same cause.
    Escalate,
    /// Stop the failing actor permanently.
    Stop,
    /// Replace the failing instance with a fresh one from its props.
    Restart,
    /// Keep the instance and its state, drop the failing message.
    Resume,
}

impl SupervisorDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            SupervisorDecision::Escalate => "escalate",
            SupervisorDecision::Stop => "stop",
            SupervisorDecision::Restart => "restart",
            SupervisorDecision::Resume => "resume",
        }
    }
}

impl std::fmt::Display for SupervisorDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupervisorDecision {
    type Err = ActorError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "escalate" => Ok(SupervisorDecision::Escalate),
            "stop" => Ok(SupervisorDecision::Stop),
            "restart" => Ok(SupervisorDecision::Restart),
            "resume" => Ok(SupervisorDecision::Resume),
            _ => Err(ActorError::UnknownDecision(token.to_string())),
        }
    }
}

impl TryFrom<String> for SupervisorDecision {
    type Error = ActorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SupervisorDecision> for String {
    fn from(value: SupervisorDecision) -> Self {
        value.as_str().to_string()
    }
}

/// Which children a decision applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PolicyKind {
    /// The decision applies to every child of the supervisor.
    AllForOne,
    /// The decision applies to the failing child only.
    #[default]
    OneForOne,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::AllForOne => "all_for_one",
            PolicyKind::OneForOne => "one_for_one",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ActorError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all_for_one" => Ok(PolicyKind::AllForOne),
            "one_for_one" => Ok(PolicyKind::OneForOne),
            _ => Err(ActorError::Configuration(format!(
                "unknown supervisor strategy {token:?}"
            ))),
        }
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = ActorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PolicyKind> for String {
    fn from(value: PolicyKind) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_tokens_are_closed() {
        assert_eq!("restart".parse::<SupervisorDecision>(), Ok(SupervisorDecision::Restart));
        assert_eq!(" Resume ".parse::<SupervisorDecision>(), Ok(SupervisorDecision::Resume));
        assert_eq!(
            "explode".parse::<SupervisorDecision>(),
            Err(ActorError::UnknownDecision("explode".into()))
        );
    }

    #[test]
    fn policy_tokens_accept_both_spellings() {
        assert_eq!("one_for_one".parse::<PolicyKind>(), Ok(PolicyKind::OneForOne));
        assert_eq!("all-for-one".parse::<PolicyKind>(), Ok(PolicyKind::AllForOne));
        assert!(matches!(
            "some_for_some".parse::<PolicyKind>(),
            Err(ActorError::Configuration(_))
        ));
    }

    #[test]
    fn decisions_serialize_as_tokens() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&SupervisorDecision::Stop)?;
        assert_eq!(json, "\"stop\"");
        let parsed: SupervisorDecision = serde_json::from_str("\"escalate\"")?;
        assert_eq!(parsed, SupervisorDecision::Escalate);
        assert!(serde_json::from_str::<SupervisorDecision>("\"maybe\"").is_err());
        Ok(())
    }
}
