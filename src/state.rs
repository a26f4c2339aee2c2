//! Connection state and its reconciliation against what the transport observes.

use crate::connector::ReturnCode;
use std::fmt::Formatter;

/// Inconsistencies detected while validating a reported state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ErrorCode {
    Success,
    /// The reported `connected` flag disagrees with the prior state or the transport.
    ConnectedMismatchReported,
    /// The prior `connected` flag disagrees with the transport.
    ConnectedMismatchTransport,
    /// The reported `discovered` flag disagrees with the prior state.
    DiscoveredMismatch,
    /// Discovered while the transport is down.
    DiscoveredWithoutConnection,
}

impl ErrorCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ConnectedMismatchReported => 1,
            Self::ConnectedMismatchTransport => 2,
            Self::DiscoveredMismatch => 3,
            Self::DiscoveredWithoutConnection => 4,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ConnectedMismatchReported => {
                "reported connected state does not match the client state or the transport"
            }
            Self::ConnectedMismatchTransport => {
                "client connected state does not match the transport"
            }
            Self::DiscoveredMismatch => "reported discovered state does not match the client state",
            Self::DiscoveredWithoutConnection => {
                "client cannot be discovered unless it is connected"
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<ErrorCode> for u8 {
    fn from(value: ErrorCode) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Success,
            1 => Self::ConnectedMismatchReported,
            2 => Self::ConnectedMismatchTransport,
            3 => Self::DiscoveredMismatch,
            4 => Self::DiscoveredWithoutConnection,
            other => return Err(format!("unknown error code: {other}")),
        })
    }
}

/// Connection and discovery state, as tracked by the client and shown to the user.
///
/// The serialized form uses the keys `Connected`, `Discovered`, `rc`, `Errorcode` and `Error`.
/// All keys are optional when deserializing a reported state.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConnectionState {
    #[serde(rename = "Connected")]
    pub connected: bool,
    #[serde(rename = "Discovered")]
    pub discovered: bool,
    #[serde(rename = "rc")]
    pub return_code: Option<ReturnCode>,
    #[serde(rename = "Errorcode")]
    pub error_codes: Vec<ErrorCode>,
    #[serde(rename = "Error")]
    pub errors: Vec<String>,
}

impl ConnectionState {
    /// Record an error code, unless already present, along with its message.
    pub fn add_error_code(&mut self, code: ErrorCode) {
        if !self.error_codes.contains(&code) {
            self.error_codes.push(code);
            self.push_error(code.message());
        }
    }

    /// Record a human readable error, unless already present.
    pub fn push_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The state as JSON, ready to be rendered by a control surface.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "Connected": self.connected,
            "Discovered": self.discovered,
            "rc": self.return_code.map(|rc| rc.code()),
            "Errorcode": self.error_codes.iter().map(ErrorCode::code).collect::<Vec<_>>(),
            "Error": self.errors,
        })
    }
}

/// Validate a `reported` state against the `prior` state and what the transport observes.
///
/// All checks run, so every inconsistency is reported. The corrected state starts from the
/// reported one with a clean error list and a successful return code.
pub fn reconcile(
    prior: &ConnectionState,
    reported: &ConnectionState,
    transport_connected: bool,
) -> (ConnectionState, Vec<ErrorCode>) {
    let mut corrected = ConnectionState {
        connected: reported.connected,
        discovered: reported.discovered,
        return_code: Some(ReturnCode::SUCCESS),
        error_codes: vec![],
        errors: vec![],
    };

    if reported.connected != prior.connected || reported.connected != transport_connected {
        corrected.add_error_code(ErrorCode::ConnectedMismatchReported);
        if reported.connected != transport_connected {
            corrected.connected = transport_connected;
        }
    }

    if prior.connected != transport_connected {
        corrected.add_error_code(ErrorCode::ConnectedMismatchTransport);
        corrected.connected = transport_connected;
    }

    if reported.discovered != prior.discovered {
        corrected.add_error_code(ErrorCode::DiscoveredMismatch);
        corrected.discovered = prior.discovered;
    }

    if prior.discovered && !transport_connected {
        corrected.add_error_code(ErrorCode::DiscoveredWithoutConnection);
        corrected.discovered = false;
    }

    if corrected.has_errors() {
        log::warn!("State inconsistencies detected: {:?}", corrected.error_codes);
    }

    let errors = corrected.error_codes.clone();
    (corrected, errors)
}
