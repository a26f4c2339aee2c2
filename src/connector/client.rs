use crate::connector::{BrokerTransport, Phase, ReturnCode};
use crate::state::ConnectionState;
use bytes::Bytes;
use rumqttc::QoS;
use std::sync::{Mutex, MutexGuard};

/// QoS and retain flag for state, availability and diagnostic messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublishPolicy {
    pub qos: QoS,
    pub retain: bool,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tracked {
    pub state: ConnectionState,
    pub phase: Phase,
}

impl Tracked {
    /// Derive the phase from the state flags, after an operation settled.
    pub fn settle(&mut self) {
        self.phase = if !self.state.connected {
            Phase::Disconnected
        } else if self.state.discovered {
            Phase::Discovered
        } else {
            Phase::Connected
        };
    }
}

/// A transport together with the state tracked for it.
///
/// All changes to the [`ConnectionState`] go through [`Connection::update`], whichever task
/// they come from.
pub struct Connection<T> {
    transport: T,
    policy: PublishPolicy,
    tracked: Mutex<Tracked>,
}

impl<T: BrokerTransport> Connection<T> {
    pub fn new(transport: T, policy: PublishPolicy) -> Self {
        Self {
            transport,
            policy,
            tracked: Default::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Tracked) -> R) -> R {
        f(&mut self.lock())
    }

    /// A copy of the current state.
    pub fn state(&self) -> ConnectionState {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_discovered(&self) -> bool {
        self.lock().state.discovered
    }

    /// Record a failed operation in the state's error list.
    pub(crate) fn record_error(&self, rc: ReturnCode) {
        self.update(|tracked| tracked.state.push_error(rc.to_string()));
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> ReturnCode {
        log::info!("Publishing to topic: {topic}");

        let rc = self
            .transport
            .publish(topic, payload.into(), qos, retain)
            .await;
        if !rc.is_success() {
            log::warn!("Failed to send message to topic {topic}: {rc}");
        }
        rc
    }

    pub async fn publish_json<S>(&self, topic: &str, payload: &S, qos: QoS, retain: bool) -> ReturnCode
    where
        S: serde::Serialize + ?Sized,
    {
        match serde_json::to_vec(payload) {
            Ok(payload) => self.publish(topic, payload, qos, retain).await,
            Err(err) => {
                log::warn!("Failed to encode payload for {topic}: {err}");
                ReturnCode::INVALID_PAYLOAD
            }
        }
    }

    /// Publish state, availability or diagnostics, using the configured policy.
    pub async fn update_state<S>(&self, topic: &str, payload: &S) -> ReturnCode
    where
        S: serde::Serialize + ?Sized,
    {
        self.publish_json(topic, payload, self.policy.qos, self.policy.retain)
            .await
    }

    /// Publish a (un)discovery message. These are always sent with QoS 2 and retained.
    pub async fn announce<S>(&self, topic: &str, payload: &S) -> ReturnCode
    where
        S: serde::Serialize + ?Sized,
    {
        log::info!("Announce on {topic}");
        self.publish_json(topic, payload, QoS::ExactlyOnce, true)
            .await
    }

    pub async fn subscribe(&self, topic: &str, qos: QoS) -> ReturnCode {
        log::info!("Subscribing to: {topic}");
        let rc = self.transport.subscribe(topic, qos).await;
        if !rc.is_success() {
            log::warn!("Failed to subscribe to {topic}: {rc}");
        }
        rc
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn announce_is_durable() {
        let connection = Connection::new(MockTransport::default(), PublishPolicy::default());

        connection.announce("ha/device/x/config", &json!({"a": 1})).await;
        connection.update_state("state", &json!({"b": 2})).await;

        let published = connection.transport().published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].qos, QoS::ExactlyOnce);
        assert!(published[0].retain);
        assert_eq!(published[1].qos, QoS::AtMostOnce);
        assert!(!published[1].retain);
        assert_eq!(published[1].json(), json!({"b": 2}));
    }

    #[tokio::test]
    async fn failed_publish_is_reported() {
        let transport = MockTransport::default();
        transport.fail_publish(ReturnCode::NO_CONNECTION);
        let connection = Connection::new(transport, PublishPolicy::default());

        assert_eq!(
            connection.update_state("state", &json!({})).await,
            ReturnCode::NO_CONNECTION
        );
    }
}
