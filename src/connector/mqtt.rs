use crate::connector::{BridgeOptions, BrokerTransport, Endpoint, ReturnCode, TransportEvent};
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, QoS, TlsConfiguration, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A [`BrokerTransport`] backed by `rumqttc`.
///
/// `connect` performs the whole handshake. Afterwards the event loop is polled on its own task,
/// which forwards [`TransportEvent`]s until the connection ends. There is no automatic reconnect.
pub struct MqttTransport {
    client_id: String,
    keep_alive: Duration,
    connect_timeout: Duration,
    disable_tls: bool,

    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    client: Mutex<Option<AsyncClient>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    pub fn new(
        options: &BridgeOptions,
        client_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client_id: client_id.into(),
                keep_alive: options.keep_alive,
                connect_timeout: options.connect_timeout,
                disable_tls: options.disable_tls,
                events: tx,
                connected: Default::default(),
                client: Default::default(),
                poller: Default::default(),
            },
            rx,
        )
    }

    fn client(&self) -> Option<AsyncClient> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The client, as long as the connection is up. A client outliving its event loop is dropped.
    fn live_client(&self) -> Option<AsyncClient> {
        if !self.is_connected() {
            self.set_client(None);
            return None;
        }
        self.client()
    }

    fn set_client(&self, client: Option<AsyncClient>) {
        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = client;
    }

    fn set_poller(&self, poller: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self
                .poller
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            poller,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn mqtt_options(&self, endpoint: &Endpoint) -> MqttOptions {
        let mut mqttoptions = MqttOptions::new(&self.client_id, &endpoint.host, endpoint.port);
        mqttoptions.set_keep_alive(self.keep_alive);
        mqttoptions.set_clean_session(true);

        if !self.disable_tls {
            mqttoptions.set_transport(Transport::Tls(TlsConfiguration::Native));
        }

        if let Some(credentials) = &endpoint.credentials {
            mqttoptions.set_credentials(&credentials.username, &credentials.password);
        }

        mqttoptions
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Nobody is listening for transport events");
        }
    }
}

impl BrokerTransport for MqttTransport {
    async fn connect(&self, endpoint: &Endpoint) -> ReturnCode {
        self.set_poller(None);
        self.set_client(None);
        self.connected.store(false, Ordering::SeqCst);

        let mqttoptions = self.mqtt_options(endpoint);
        log::debug!("Options: {mqttoptions:#?}");

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let rc = match tokio::time::timeout(self.connect_timeout, handshake(&mut eventloop)).await
        {
            Ok(rc) => rc,
            Err(_) => ReturnCode::TIMEOUT,
        };

        match rc {
            ReturnCode::SUCCESS => {
                log::info!("Connected");
                self.set_client(Some(client));
                self.connected.store(true, Ordering::SeqCst);
                self.emit(TransportEvent::Connected(rc));
                self.set_poller(Some(tokio::spawn(poll(
                    eventloop,
                    self.connected.clone(),
                    self.events.clone(),
                ))));
            }
            ReturnCode::NETWORK | ReturnCode::TIMEOUT => {
                log::warn!("Connection failed: {rc}");
            }
            refused => {
                log::warn!("Connection refused: {refused}");
                self.emit(TransportEvent::Connected(refused));
            }
        }

        rc
    }

    async fn disconnect(&self) -> ReturnCode {
        let Some(client) = self.live_client() else {
            return ReturnCode::NO_CONNECTION;
        };
        self.set_client(None);

        match client.disconnect().await {
            Ok(()) => ReturnCode::SUCCESS,
            Err(err) => {
                log::warn!("Failed to disconnect: {err}");
                ReturnCode::REQUEST_QUEUE
            }
        }
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> ReturnCode {
        let Some(client) = self.live_client() else {
            return ReturnCode::NO_CONNECTION;
        };

        match client.subscribe(topic, qos).await {
            Ok(()) => ReturnCode::SUCCESS,
            Err(err) => {
                log::warn!("Failed to subscribe to {topic}: {err}");
                ReturnCode::REQUEST_QUEUE
            }
        }
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> ReturnCode {
        let Some(client) = self.live_client() else {
            return ReturnCode::NO_CONNECTION;
        };

        match client.publish_bytes(topic, qos, retain, payload).await {
            Ok(()) => ReturnCode::SUCCESS,
            Err(err) => {
                log::warn!("Failed to publish to {topic}: {err}");
                ReturnCode::REQUEST_QUEUE
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.set_poller(None);
    }
}

/// Poll until the broker acknowledged (or refused) the connection.
async fn handshake(eventloop: &mut EventLoop) -> ReturnCode {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => return connack_code(ack.code),
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => return connack_code(code),
            Err(err) => {
                log::warn!("Connection failed: {err}");
                return ReturnCode::NETWORK;
            }
        }
    }
}

async fn poll(
    mut eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let rc = loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                log::debug!("Received: {publish:?}");
                let _ = events.send(TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload,
                });
            }
            Ok(Event::Incoming(Incoming::Disconnect)) => {
                log::info!("Disconnected by broker");
                break ReturnCode::NETWORK;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                log::info!("Disconnected");
                break ReturnCode::SUCCESS;
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("Connection failed: {err}");
                break ReturnCode::NETWORK;
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Disconnected(rc));
    log::info!("MQTT event loop exited");
}

fn connack_code(code: ConnectReturnCode) -> ReturnCode {
    match code {
        ConnectReturnCode::Success => ReturnCode::SUCCESS,
        ConnectReturnCode::RefusedProtocolVersion => ReturnCode::UNACCEPTABLE_PROTOCOL_VERSION,
        ConnectReturnCode::BadClientId => ReturnCode::IDENTIFIER_REJECTED,
        ConnectReturnCode::ServiceUnavailable => ReturnCode::BROKER_UNAVAILABLE,
        ConnectReturnCode::BadUserNamePassword => ReturnCode::BAD_CREDENTIALS,
        ConnectReturnCode::NotAuthorized => ReturnCode::NOT_AUTHORIZED,
    }
}
