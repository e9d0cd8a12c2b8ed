//! Settings applied to every request created by a `MockEnvironment`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XhrError;
use crate::xhr::ReadyState;

/// How strictly the request object checks the order of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Accept every call in any state, like the browser object being mocked
    /// is commonly assumed to.
    #[default]
    Permissive,
    /// Reject `set_request_header` and `send` outside OPENED, and a second
    /// `send` while one is in flight.
    Strict,
}

impl ValidationPolicy {
    pub(crate) fn check_set_header(
        self,
        state: ReadyState,
        send_in_flight: bool,
    ) -> Result<(), XhrError> {
        self.require_opened("set a request header", state, send_in_flight)
    }

    pub(crate) fn check_send(self, state: ReadyState, send_in_flight: bool) -> Result<(), XhrError> {
        self.require_opened("send", state, send_in_flight)
    }

    fn require_opened(
        self,
        operation: &'static str,
        state: ReadyState,
        send_in_flight: bool,
    ) -> Result<(), XhrError> {
        match self {
            ValidationPolicy::Permissive => Ok(()),
            ValidationPolicy::Strict if state == ReadyState::Opened && !send_in_flight => Ok(()),
            ValidationPolicy::Strict => Err(XhrError::InvalidState { operation, state }),
        }
    }
}

/// Which ready states a request walks through while it is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyStateMode {
    /// `send` jumps to LOADING and a response lands directly in DONE.
    #[default]
    Shortcut,
    /// `send` stays in OPENED; a response walks HEADERS_RECEIVED, LOADING
    /// and DONE, with a ready-state notification at each step.
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XhrConfig {
    /// Initial value of the request's `timeout` property, in milliseconds.
    pub timeout_ms: u64,
    pub with_credentials: bool,
    pub policy: ValidationPolicy,
    pub ready_state_mode: ReadyStateMode,
}

impl XhrConfig {
    pub fn from_json(raw: &str) -> Result<Self, XhrError> {
        serde_json::from_str(raw).map_err(|e| XhrError::Config(e.to_string()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ready_state_mode(mut self, mode: ReadyStateMode) -> Self {
        self.ready_state_mode = mode;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = XhrConfig::from_json("{}").unwrap();
        assert_eq!(config, XhrConfig::default());
        assert_eq!(config.policy, ValidationPolicy::Permissive);
        assert_eq!(config.ready_state_mode, ReadyStateMode::Shortcut);
        assert_eq!(config.timeout(), Duration::ZERO);
    }

    #[test]
    fn every_field_parses() {
        let config = XhrConfig::from_json(
            r#"{"timeout_ms":1500,"with_credentials":true,"policy":"strict","ready_state_mode":"standard"}"#,
        )
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(1500));
        assert!(config.with_credentials);
        assert_eq!(config.policy, ValidationPolicy::Strict);
        assert_eq!(config.ready_state_mode, ReadyStateMode::Standard);
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        let err = XhrConfig::from_json(r#"{"policy":"lenient"}"#).unwrap_err();
        assert!(matches!(err, XhrError::Config(_)));
    }

    #[test]
    fn builders_override_fields() {
        let config = XhrConfig::default()
            .with_timeout(Duration::from_secs(2))
            .with_credentials(true)
            .with_policy(ValidationPolicy::Strict)
            .with_ready_state_mode(ReadyStateMode::Standard);
        assert_eq!(config.timeout_ms, 2000);
        assert!(config.with_credentials);
    }

    #[test]
    fn oversized_timeout_clamps_to_max_millis() {
        let config = XhrConfig::default().with_timeout(Duration::MAX);
        assert_eq!(config.timeout_ms, u64::MAX);
    }

    #[test]
    fn permissive_policy_accepts_any_state() {
        let policy = ValidationPolicy::Permissive;
        assert!(policy.check_send(ReadyState::Unsent, false).is_ok());
        assert!(policy.check_set_header(ReadyState::Done, true).is_ok());
    }

    #[test]
    fn strict_policy_requires_opened_without_send() {
        let policy = ValidationPolicy::Strict;
        assert!(policy.check_send(ReadyState::Opened, false).is_ok());
        assert!(policy.check_send(ReadyState::Opened, true).is_err());
        let err = policy.check_set_header(ReadyState::Unsent, false).unwrap_err();
        assert!(matches!(
            err,
            XhrError::InvalidState {
                state: ReadyState::Unsent,
                ..
            }
        ));
    }
}
