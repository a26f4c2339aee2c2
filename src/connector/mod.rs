mod client;
mod error;
mod mqtt;
mod options;
mod publisher;
mod transport;

pub use client::*;
pub use error::*;
pub use mqtt::*;
pub use options::*;
pub use publisher::*;
pub use transport::*;

use crate::environment::{DiagnosticFacts, HardwareEnvironment};
use crate::model::{DeviceAggregate, SensorDescriptor, SensorKind};
use crate::physical::PhysicalDevice;
use crate::state::{reconcile, ConnectionState, ErrorCode};
use rumqttc::QoS;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Payload Home Assistant publishes on its status topic when it (re)starts.
pub const STATUS_ONLINE: &str = "online";
/// Payload Home Assistant publishes on its status topic when it shuts down.
pub const STATUS_OFFLINE: &str = "offline";

/// Where a [`ConnectionStateMachine`] currently is.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Discovering,
    Discovered,
}

/// Drives one device through connecting, discovery, telemetry and teardown.
///
/// Transport events are fed in through [`Self::dispatch`] (or [`Self::process_events`]). While
/// the device is discovered, exactly one [`PublisherLoop`] forwards its readings.
pub struct ConnectionStateMachine<T, P> {
    connection: Arc<Connection<T>>,
    device: Arc<DeviceAggregate>,
    physical: Arc<P>,
    environment: Arc<dyn HardwareEnvironment>,
    endpoint: Endpoint,
    status_topic: String,
    auto_discover: bool,
    publisher: Mutex<Option<PublisherLoop>>,
}

impl<T, P> ConnectionStateMachine<T, P>
where
    T: BrokerTransport,
    P: PhysicalDevice,
{
    pub fn new(
        transport: T,
        device: Arc<DeviceAggregate>,
        physical: Arc<P>,
        environment: Arc<dyn HardwareEnvironment>,
        options: &BridgeOptions,
    ) -> Result<Self, ConfigError> {
        let policy = PublishPolicy {
            qos: options.telemetry_qos()?,
            retain: options.retain,
        };

        Ok(Self {
            connection: Arc::new(Connection::new(transport, policy)),
            device,
            physical,
            environment,
            endpoint: options.endpoint(),
            status_topic: options.status_topic(),
            auto_discover: options.auto_discover,
            publisher: Mutex::new(None),
        })
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn device(&self) -> &DeviceAggregate {
        &self.device
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn phase(&self) -> Phase {
        self.connection.phase()
    }

    /// What the transport observes, if that agrees with the tracked state. `None` means the two
    /// disagree and the state needs to be reconciled.
    pub fn is_connected(&self) -> Option<bool> {
        let observed = self.transport_connected();
        (observed == self.state().connected).then_some(observed)
    }

    /// What the transport itself reports.
    pub fn transport_connected(&self) -> bool {
        self.connection.transport().is_connected()
    }

    /// Whether a publisher loop is currently attached.
    pub async fn is_publishing(&self) -> bool {
        self.publisher.lock().await.is_some()
    }

    /// Check a reported state against the tracked one and the transport. Doesn't change anything.
    pub fn validate(
        &self,
        reported: &ConnectionState,
        transport_connected: bool,
    ) -> (ConnectionState, Vec<ErrorCode>) {
        reconcile(&self.state(), reported, transport_connected)
    }

    pub async fn connect(&self) -> ReturnCode {
        if let Some(mut stale) = self.publisher.lock().await.take() {
            log::warn!("Stopping publisher left over from a previous connection");
            stale.stop().await;
        }

        self.connection.update(|tracked| {
            tracked.state = ConnectionState::default();
            tracked.phase = Phase::Connecting;
        });

        log::info!(
            "Connecting to {}:{}",
            self.endpoint.host,
            self.endpoint.port
        );
        let rc = self.connection.transport().connect(&self.endpoint).await;

        if !rc.is_success() {
            log::error!(
                "Critical: failed to connect to {}:{}: {rc}",
                self.endpoint.host,
                self.endpoint.port
            );
            self.connection.update(|tracked| {
                tracked.state.return_code = Some(rc);
                tracked.state.connected = false;
                tracked.state.push_error(rc.to_string());
                tracked.settle();
            });
        }

        rc
    }

    pub async fn disconnect(&self) -> ReturnCode {
        let rc = self.connection.transport().disconnect().await;
        if rc == ReturnCode::NO_CONNECTION {
            log::info!("Already disconnected");
            self.connection.update(|tracked| {
                tracked.state.connected = false;
                tracked.settle();
            });
        } else if !rc.is_success() {
            log::error!("Critical: failed to disconnect: {rc}");
            self.connection.record_error(rc);
        }
        rc
    }

    /// Handle the broker's answer to a connect attempt.
    pub async fn on_connect(&self, rc: ReturnCode) {
        let connected = self.connection.update(|tracked| {
            tracked.state.return_code = Some(rc);
            tracked.state.connected = rc.is_success();
            if !rc.is_success() {
                tracked.state.push_error(rc.to_string());
            }
            tracked.settle();
            tracked.state.connected
        });

        if !connected {
            log::error!("Connection refused: {rc}");
            return;
        }

        log::info!("Connected to broker");
        let rc = self
            .connection
            .subscribe(&self.status_topic, QoS::AtLeastOnce)
            .await;
        if !rc.is_success() {
            self.connection.record_error(rc);
        }
    }

    pub async fn on_disconnect(&self, rc: ReturnCode) {
        if rc.is_success() {
            log::info!("Disconnected from broker");
        } else {
            log::warn!("Connection lost: {rc}");
        }

        self.connection.update(|tracked| {
            tracked.state.connected = false;
            tracked.state.return_code = Some(rc);
            if !rc.is_success() {
                tracked.state.push_error(rc.to_string());
            }
            tracked.settle();
        });
    }

    /// Handle a message on a subscribed topic.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        if topic != self.status_topic {
            log::debug!("Ignoring message on {topic}");
            return;
        }

        let payload = String::from_utf8_lossy(payload);
        match payload.trim() {
            STATUS_ONLINE => {
                log::info!("Home Assistant is online");
                if !self.auto_discover {
                    return;
                }
                if self.publish_discovery().await.is_success() {
                    self.publish_available().await;
                }
            }
            STATUS_OFFLINE => {
                log::info!("Home Assistant is offline");
                self.withdraw().await;
            }
            other => log::debug!("Ignoring status '{other}'"),
        }
    }

    pub async fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(rc) => self.on_connect(rc).await,
            TransportEvent::Disconnected(rc) => self.on_disconnect(rc).await,
            TransportEvent::Message { topic, payload } => self.on_message(&topic, &payload).await,
        }
    }

    /// Dispatch transport events until the sending side is gone.
    pub async fn process_events(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        log::debug!("Transport event stream ended");
    }

    /// Announce the device and start publishing its readings.
    pub async fn publish_discovery(&self) -> ReturnCode {
        let mut publisher = self.publisher.lock().await;
        self.connection
            .update(|tracked| tracked.phase = Phase::Discovering);

        let rc = self
            .connection
            .announce(
                self.device.discovery_topic(),
                self.device.discovery_payload(),
            )
            .await;

        if !rc.is_success() {
            log::error!("Failed to announce {}: {rc}", self.device.name());
            self.connection.update(|tracked| {
                tracked.state.push_error(rc.to_string());
                tracked.settle();
            });
            return rc;
        }

        if publisher.is_none() {
            *publisher = Some(PublisherLoop::start(
                self.connection.clone(),
                self.device.state_topic(),
                self.physical.clone(),
            ));
        }

        self.connection.update(|tracked| {
            tracked.state.discovered = true;
            tracked.settle();
        });
        log::info!("Discovered {}", self.device.name());

        rc
    }

    /// Mark all sensors as available. Returns the first failure, if any.
    pub async fn publish_available(&self) -> ReturnCode {
        let mut result = ReturnCode::SUCCESS;
        for sensor in self.device.sensors() {
            let rc = self.publish_sensor_available(sensor).await;
            if result.is_success() {
                result = rc;
            }
        }
        result
    }

    /// Mark a single sensor as available. Diagnostic sensors first get their facts published.
    pub async fn publish_sensor_available(&self, sensor: &SensorDescriptor) -> ReturnCode {
        let mut result = ReturnCode::SUCCESS;

        if let SensorKind::Diagnostic {
            attributes_topic, ..
        } = sensor.kind()
        {
            let facts = DiagnosticFacts::gather(self.environment.as_ref(), "OK");
            result = self.connection.update_state(attributes_topic, &facts).await;
        }

        let rc = self
            .connection
            .update_state(
                sensor.availability_topic(),
                &sensor.availability().available(),
            )
            .await;
        if result.is_success() {
            result = rc;
        }

        if !result.is_success() {
            self.connection.record_error(result);
        }
        result
    }

    /// Withdraw the device from Home Assistant and stop publishing. Safe to call repeatedly.
    pub async fn clear_discovery(&self) -> ReturnCode {
        let mut publisher = self.publisher.lock().await;
        let mut result = ReturnCode::SUCCESS;

        for sensor in self.device.sensors() {
            let rc = self
                .connection
                .update_state(
                    sensor.availability_topic(),
                    &sensor.availability().not_available(),
                )
                .await;
            if result.is_success() {
                result = rc;
            }
        }

        let rc = self
            .connection
            .announce(
                self.device.discovery_topic(),
                self.device.device_undiscovery_payload(),
            )
            .await;
        if result.is_success() {
            result = rc;
        }

        self.connection.update(|tracked| {
            tracked.state.discovered = false;
            if !result.is_success() {
                tracked.state.push_error(result.to_string());
            }
            tracked.settle();
        });

        if let Some(mut publisher) = publisher.take() {
            publisher.stop().await;
        }
        log::info!("Cleared discovery of {}", self.device.name());

        result
    }

    /// Stop publishing without telling Home Assistant, which went away.
    async fn withdraw(&self) {
        let mut publisher = self.publisher.lock().await;
        self.connection.update(|tracked| {
            tracked.state.discovered = false;
            tracked.settle();
        });
        if let Some(mut publisher) = publisher.take() {
            publisher.stop().await;
        }
    }

    /// Clear discovery and disconnect, as far as applicable.
    pub async fn shutdown(&self) {
        let state = self.state();
        if state.discovered || self.is_publishing().await {
            self.clear_discovery().await;
        }
        if state.connected || self.transport_connected() {
            self.disconnect().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{DeviceOptions, Reading};
    use crate::testing::{at, FakeDevice, MockTransport, StaticEnvironment};
    use crate::worker::LoopState;
    use serde_json::json;
    use std::time::Duration;

    type Machine = ConnectionStateMachine<MockTransport, FakeDevice>;

    fn machine_with(transport: MockTransport, options: BridgeOptions) -> Machine {
        let environment = Arc::new(StaticEnvironment::default());
        let sensors = vec![
            SensorDescriptor::new("°C", "temperature", "homeassistant", "temperature", 120)
                .unwrap(),
            SensorDescriptor::new("%", "humidity", "homeassistant", "humidity", 120).unwrap(),
        ];
        let device = DeviceAggregate::new(
            sensors,
            "lvr280",
            "lvr280/state",
            "Bosch",
            "BME280",
            DeviceOptions::default(),
            environment.as_ref(),
        )
        .unwrap();

        ConnectionStateMachine::new(
            transport,
            Arc::new(device),
            Arc::new(FakeDevice::default()),
            environment,
            &options,
        )
        .unwrap()
    }

    fn machine() -> Machine {
        machine_with(MockTransport::default(), BridgeOptions::new("localhost"))
    }

    async fn connected_machine() -> Machine {
        let machine = machine();
        assert_eq!(machine.connect().await, ReturnCode::SUCCESS);
        machine.on_connect(ReturnCode::SUCCESS).await;
        machine
    }

    #[tokio::test]
    async fn connect_and_subscribe() {
        let machine = machine();
        assert_eq!(machine.is_connected(), Some(false));
        assert_eq!(machine.phase(), Phase::Disconnected);

        machine.connect().await;
        assert_eq!(machine.phase(), Phase::Connecting);

        machine.on_connect(ReturnCode::SUCCESS).await;
        assert_eq!(machine.phase(), Phase::Connected);
        assert_eq!(machine.is_connected(), Some(true));
        assert_eq!(
            machine.connection().transport().subscriptions(),
            vec!["homeassistant/status".to_string()]
        );
    }

    #[tokio::test]
    async fn connect_failure_is_recorded() {
        let transport = MockTransport::default();
        transport.refuse_connect(ReturnCode::BAD_CREDENTIALS);
        let machine = machine_with(transport, BridgeOptions::new("localhost"));

        assert_eq!(machine.connect().await, ReturnCode::BAD_CREDENTIALS);

        let state = machine.state();
        assert!(!state.connected);
        assert_eq!(state.return_code, Some(ReturnCode::BAD_CREDENTIALS));
        assert_eq!(
            state.errors,
            vec!["Connection Refused: bad user name or password. (rc 4)".to_string()]
        );
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert_eq!(machine.is_connected(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn online_announces_and_marks_available() {
        let machine = connected_machine().await;

        machine
            .on_message("homeassistant/status", b"online")
            .await;

        assert!(machine.state().discovered);
        assert_eq!(machine.phase(), Phase::Discovered);
        assert!(machine.is_publishing().await);

        let transport = machine.connection().transport();
        let discovery = transport.published_to("homeassistant/device/b827ebc1f24d/config");
        assert_eq!(discovery.len(), 1);
        assert!(discovery[0].retain);
        assert_eq!(discovery[0].qos, QoS::ExactlyOnce);
        assert_eq!(
            discovery[0].json()["components"]
                .as_object()
                .unwrap()
                .len(),
            7
        );

        assert_eq!(
            transport.published_to("homeassistant/temperature/availability")[0].json(),
            json!({"availability": "Available"})
        );
        let facts = transport.published_to("homeassistant/lvr280/diagnostics/state");
        // one message per diagnostic sensor
        assert_eq!(facts.len(), 5);
        assert_eq!(facts[0].json()["status"], json!("OK"));

        // a second announcement doesn't start another publisher
        machine
            .on_message("homeassistant/status", b"online")
            .await;
        assert!(machine.is_publishing().await);
        assert_eq!(
            transport
                .published_to("homeassistant/device/b827ebc1f24d/config")
                .len(),
            2
        );

        machine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn telemetry_flows_once_discovered() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        machine.physical.push(Ok(Reading::new(at(10)).with("temperature", 21.5)));
        machine.physical.sample_now().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let state = machine
            .connection()
            .transport()
            .published_to("lvr280/state");
        assert_eq!(state.len(), 1);
        assert_eq!(
            state[0].json(),
            json!({"status": "OK", "last_update": "1970-01-01T00:00:10Z", "temperature": 21.5})
        );

        machine.shutdown().await;
    }

    #[tokio::test]
    async fn auto_discover_disabled() {
        let options = BridgeOptions {
            auto_discover: false,
            ..BridgeOptions::new("localhost")
        };
        let machine = machine_with(MockTransport::default(), options);
        machine.on_connect(ReturnCode::SUCCESS).await;

        machine
            .on_message("homeassistant/status", b"online")
            .await;
        assert!(!machine.state().discovered);
        assert!(machine.connection().transport().published().is_empty());
    }

    #[tokio::test]
    async fn unrelated_messages_are_ignored() {
        let machine = connected_machine().await;
        machine.on_message("some/other/topic", b"online").await;
        machine
            .on_message("homeassistant/status", b"restarting")
            .await;
        assert!(!machine.state().discovered);
        assert!(machine.connection().transport().published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_stops_publishing() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;
        assert!(machine.is_publishing().await);

        machine
            .on_message("homeassistant/status", b"offline")
            .await;
        assert!(!machine.state().discovered);
        assert!(!machine.is_publishing().await);
        assert_eq!(machine.phase(), Phase::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_discovery_twice() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;

        assert_eq!(machine.clear_discovery().await, ReturnCode::SUCCESS);
        assert_eq!(machine.clear_discovery().await, ReturnCode::SUCCESS);

        let state = machine.state();
        assert!(!state.discovered);
        assert!(state.errors.is_empty());
        assert!(!machine.is_publishing().await);

        let transport = machine.connection().transport();
        let undiscovery = transport.published_to("homeassistant/device/b827ebc1f24d/config");
        // one discovery, two undiscoveries
        assert_eq!(undiscovery.len(), 3);
        assert!(undiscovery[2].json().get("components").is_none());
        assert_eq!(
            transport.published_to("homeassistant/humidity/availability")[0].json(),
            json!({"availability": "Unavailable"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_discovery_keeps_publisher_off() {
        let machine = connected_machine().await;
        machine
            .connection()
            .transport()
            .fail_publish(ReturnCode::NO_CONNECTION);

        assert_eq!(machine.publish_discovery().await, ReturnCode::NO_CONNECTION);
        assert!(!machine.state().discovered);
        assert!(!machine.is_publishing().await);
        assert_eq!(machine.phase(), Phase::Connected);
        assert_eq!(
            machine.state().errors,
            vec!["The client is not currently connected. (rc 128)".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;

        machine.connection().transport().set_connected(false);
        assert_eq!(machine.is_connected(), None);
        machine.dispatch(TransportEvent::Disconnected(ReturnCode::NETWORK)).await;

        let state = machine.state();
        assert!(!state.connected);
        assert_eq!(state.return_code, Some(ReturnCode::NETWORK));

        assert_eq!(machine.is_connected(), Some(false));

        let (corrected, errors) = machine.validate(&state, machine.transport_connected());
        assert_eq!(errors, vec![ErrorCode::DiscoveredWithoutConnection]);
        assert!(!corrected.discovered);

        // reconnecting drops the old publisher
        machine.connect().await;
        assert!(!machine.is_publishing().await);
        assert!(!machine.state().discovered);
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_only_while_discovered() {
        let machine = connected_machine().await;

        for _ in 0..3 {
            assert_eq!(machine.is_publishing().await, machine.state().discovered);
            machine.publish_discovery().await;
            assert_eq!(machine.is_publishing().await, machine.state().discovered);
            machine.clear_discovery().await;
        }
        assert!(!machine.is_publishing().await);
    }

    #[tokio::test]
    async fn shutdown_after_silent_connection_loss() {
        let machine = connected_machine().await;
        // the transport dropped, but the event didn't arrive yet
        machine.connection().transport().set_connected(false);

        machine.shutdown().await;

        let state = machine.state();
        assert!(!state.connected);
        assert!(state.errors.is_empty());
        assert_eq!(machine.phase(), Phase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disconnects() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;

        machine.shutdown().await;
        assert!(!machine.state().discovered);
        assert_eq!(machine.connection().transport().disconnects(), 1);
        assert!(!machine.transport_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_runs_while_discovered() {
        let machine = connected_machine().await;
        machine.publish_discovery().await;

        let mut publisher = machine.publisher.lock().await.take().unwrap();
        assert_eq!(publisher.state(), LoopState::Running);
        publisher.stop().await;
        assert_eq!(publisher.state(), LoopState::Stopped);
    }
}
