//! Operations offered to a user facing control surface (like a web UI).
//!
//! Nothing in here speaks HTTP. A front end reports the state it currently shows, calls one of
//! the toggles and renders the state it gets back with [`ConnectionState::to_value`].

use crate::connector::{BrokerTransport, ConnectionStateMachine, ReturnCode};
use crate::physical::PhysicalDevice;
use crate::state::{ConnectionState, ErrorCode};
use std::future::Future;
use std::time::Duration;

/// How often to check for an established connection after connecting.
pub const CONNECT_POLL_ATTEMPTS: usize = 20;
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a control surface may do with the bridge.
pub trait ControlSurface: Send + Sync {
    fn connect(&self) -> impl Future<Output = ReturnCode> + Send;

    fn disconnect(&self) -> impl Future<Output = ReturnCode> + Send;

    /// Announce the device and mark its sensors available.
    fn publish_discovery(&self) -> impl Future<Output = ReturnCode> + Send;

    fn clear_discovery(&self) -> impl Future<Output = ReturnCode> + Send;

    fn validate(
        &self,
        reported: &ConnectionState,
        transport_connected: bool,
    ) -> (ConnectionState, Vec<ErrorCode>);

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> Option<bool>;

    fn transport_connected(&self) -> bool;
}

impl<T, P> ControlSurface for ConnectionStateMachine<T, P>
where
    T: BrokerTransport,
    P: PhysicalDevice,
{
    async fn connect(&self) -> ReturnCode {
        ConnectionStateMachine::connect(self).await
    }

    async fn disconnect(&self) -> ReturnCode {
        ConnectionStateMachine::disconnect(self).await
    }

    async fn publish_discovery(&self) -> ReturnCode {
        match ConnectionStateMachine::publish_discovery(self).await {
            rc if rc.is_success() => self.publish_available().await,
            rc => rc,
        }
    }

    async fn clear_discovery(&self) -> ReturnCode {
        ConnectionStateMachine::clear_discovery(self).await
    }

    fn validate(
        &self,
        reported: &ConnectionState,
        transport_connected: bool,
    ) -> (ConnectionState, Vec<ErrorCode>) {
        ConnectionStateMachine::validate(self, reported, transport_connected)
    }

    fn state(&self) -> ConnectionState {
        ConnectionStateMachine::state(self)
    }

    fn is_connected(&self) -> Option<bool> {
        ConnectionStateMachine::is_connected(self)
    }

    fn transport_connected(&self) -> bool {
        ConnectionStateMachine::transport_connected(self)
    }
}

/// Wait until the surface reports `expected`, for at most [`CONNECT_POLL_ATTEMPTS`] polls.
async fn await_connected<S: ControlSurface>(surface: &S, expected: bool) -> bool {
    for _ in 0..CONNECT_POLL_ATTEMPTS {
        if surface.is_connected() == Some(expected) {
            return true;
        }
        tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
    }
    surface.is_connected() == Some(expected)
}

/// Connect if the (corrected) reported state is disconnected, otherwise clear discovery and
/// disconnect. Returns the resulting state.
pub async fn toggle_connection<S: ControlSurface>(
    surface: &S,
    reported: &ConnectionState,
) -> ConnectionState {
    let (checked, errors) = surface.validate(reported, surface.transport_connected());
    if !errors.is_empty() {
        log::warn!("Reported state was out of date, continuing with the corrected one");
    }

    if !checked.connected {
        if surface.connect().await.is_success() && !await_connected(surface, true).await {
            log::warn!("Connection not established after connecting");
        }
    } else {
        if surface.state().discovered {
            surface.clear_discovery().await;
        }
        if surface.disconnect().await.is_success() && !await_connected(surface, false).await {
            log::warn!("Connection still up after disconnecting");
        }
    }

    surface.state()
}

/// Enable discovery, or clear it if already discovered. Returns the resulting state.
pub async fn toggle_discovery<S: ControlSurface>(surface: &S) -> ConnectionState {
    if surface.state().discovered {
        surface.clear_discovery().await;
    } else {
        surface.publish_discovery().await;
    }
    surface.state()
}
