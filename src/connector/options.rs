use crate::connector::{ConfigError, Credentials, Endpoint};
use rand::Rng;
use rumqttc::QoS;
use std::time::Duration;

/// Settings of the bridge: broker connection and publishing policy.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[cfg_attr(feature = "clap", derive(clap::Parser))]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub struct BridgeOptions {
    /// The MQTT client id, defaults to `{prefix}-{object id}-{random number}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub client_id: Option<String>,

    /// Base (discovery prefix) topic, defaults to `homeassistant`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub topic_base: Option<String>,

    /// The MQTT's servers/brokers hostname
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub host: String,

    /// The MQTT's server/brokers port, defaults to 1883 without TLS and 8883 with TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub port: Option<u16>,

    /// TLS is used by default, you can disable it here.
    #[serde(default, skip_serializing_if = "is_default")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub disable_tls: bool,

    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    #[cfg_attr(feature = "clap", arg(long, env, value_parser = DurationValueParser, default_value = "5s"))]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub keep_alive: Duration,

    /// How long to wait for the broker to accept a connection
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    #[cfg_attr(feature = "clap", arg(long, env, value_parser = DurationValueParser, default_value = "10s"))]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub connect_timeout: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub password: Option<String>,

    /// QoS of state, availability and diagnostic messages (0, 1 or 2)
    #[serde(default, skip_serializing_if = "is_default")]
    #[cfg_attr(feature = "clap", arg(long, env, default_value_t = 0))]
    pub qos: u8,

    /// Retain state, availability and diagnostic messages
    #[serde(default, skip_serializing_if = "is_default")]
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub retain: bool,

    /// Interval between two samples of the physical device
    #[serde(default = "default_polling_interval", with = "humantime_serde")]
    #[cfg_attr(feature = "clap", arg(long, env, value_parser = DurationValueParser, default_value = "3s"))]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub polling_interval: Duration,

    /// Delay before the first sample is taken
    #[serde(default = "default_warm_up", with = "humantime_serde")]
    #[cfg_attr(feature = "clap", arg(long, env, value_parser = DurationValueParser, default_value = "10s"))]
    #[cfg_attr(feature = "schemars", schemars(schema_with = "humantime_duration"))]
    pub warm_up: Duration,

    /// Seconds after which Home Assistant considers a sensor value stale
    #[serde(default = "default_expire_after")]
    #[cfg_attr(feature = "clap", arg(long, env, default_value_t = 120))]
    pub expire_after: u64,

    /// Announce the device again when Home Assistant comes online
    #[serde(default = "default_auto_discover")]
    #[cfg_attr(feature = "clap", arg(long, env, default_value_t = true, action = clap::ArgAction::Set))]
    pub auto_discover: bool,
}

impl BridgeOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client_id: None,
            topic_base: None,
            host: host.into(),
            port: None,
            disable_tls: false,
            keep_alive: default_keep_alive(),
            connect_timeout: default_connect_timeout(),
            username: None,
            password: None,
            qos: 0,
            retain: false,
            polling_interval: default_polling_interval(),
            warm_up: default_warm_up(),
            expire_after: default_expire_after(),
            auto_discover: default_auto_discover(),
        }
    }

    pub fn topic_base(&self) -> &str {
        self.topic_base.as_deref().unwrap_or("homeassistant")
    }

    /// The topic Home Assistant announces its own status on.
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.topic_base())
    }

    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.disable_tls { 1883 } else { 8883 })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port(),
            credentials: self.username.as_ref().map(|username| Credentials {
                username: username.clone(),
                password: self.password.clone().unwrap_or_default(),
            }),
        }
    }

    /// QoS used for telemetry, availability and diagnostics.
    pub fn telemetry_qos(&self) -> Result<QoS, ConfigError> {
        qos(self.qos)
    }

    /// The configured client id, or one made from `prefix`, the object id and a random suffix.
    pub fn client_id(&self, prefix: &str, object_id: &str) -> String {
        self.client_id.clone().unwrap_or_else(|| {
            let suffix = rand::thread_rng().gen_range(0..1000);
            format!("{prefix}-{object_id}-{suffix:03}")
        })
    }
}

/// Convert a numeric QoS level.
pub fn qos(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

#[cfg(feature = "schemars")]
fn humantime_duration(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::*;
    use schemars::JsonSchema;
    use serde_json::json;

    let mut schema: SchemaObject = <String>::json_schema(gen).into();
    schema.metadata = Some(Box::new(Metadata {
        description: Some(r#"A duration in the humantime format. For example: '30s' for 30 seconds. '5m' for 5 minutes."#.to_string()),
        examples: vec![json!("3s"), json!("1m")],
        ..Default::default()
    }));
    schema.into()
}

#[cfg(feature = "clap")]
#[derive(Clone)]
pub struct DurationValueParser;

#[cfg(feature = "clap")]
impl clap::builder::TypedValueParser for DurationValueParser {
    type Value = Duration;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        use std::str::FromStr;
        Ok(humantime::Duration::from_str(&value.to_string_lossy())
            .map_err(|_err| clap::Error::new(clap::error::ErrorKind::Format).with_cmd(cmd))?
            .into())
    }
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_polling_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_warm_up() -> Duration {
    Duration::from_secs(10)
}

fn default_expire_after() -> u64 {
    120
}

fn default_auto_discover() -> bool {
    true
}

fn is_default<D: Default + Eq>(value: &D) -> bool {
    value == &D::default()
}
