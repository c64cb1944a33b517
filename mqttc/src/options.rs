use std::time::Duration;

use bytes::Bytes;
use config::{Config, ConfigError, File};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use mqttc_codec::{Connect, LastWill, QoS};
use mqttc_net::DialOptions;
use mqttc_utils::{deserialize_duration, serialize_duration, Bytesize};

use crate::topic::validate_topic_name;
use crate::{ClientError, Result};

/// Connection options.
///
/// ```
/// use std::time::Duration;
/// use mqttc::Options;
///
/// let opts = Options::new("sensor-1").keepalive(Duration::from_secs(30)).credentials("user", "secret");
/// assert_eq!(opts.keepalive_secs(), 30);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Options {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "Options::clean_session_default")]
    pub clean_session: bool,
    #[serde(
        default = "Options::keepalive_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub keepalive: Duration,
    #[serde(
        default = "Options::connect_timeout_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub connect_timeout: Duration,
    #[serde(
        default = "Options::send_timeout_default",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub send_timeout: Duration,
    /// Largest inbound packet accepted, 0 is unlimited
    #[serde(default)]
    pub max_packet_size: Bytesize,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub last_will: Option<Will>,
    /// Path to an extra PEM root certificate for `mqtts://` and `wss://`
    #[serde(default)]
    pub root_cert: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            client_id: String::new(),
            clean_session: Self::clean_session_default(),
            keepalive: Self::keepalive_default(),
            connect_timeout: Self::connect_timeout_default(),
            send_timeout: Self::send_timeout_default(),
            max_packet_size: Bytesize::default(),
            username: None,
            password: None,
            last_will: None,
            root_cert: None,
        }
    }
}

impl Options {
    fn clean_session_default() -> bool {
        true
    }

    fn keepalive_default() -> Duration {
        Duration::from_secs(60)
    }

    fn connect_timeout_default() -> Duration {
        Duration::from_secs(20)
    }

    fn send_timeout_default() -> Duration {
        Duration::from_secs(10)
    }

    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Options { client_id: client_id.into(), ..Default::default() }
    }

    /// Load options from a config file (any format the `config` crate knows by extension),
    /// overridden by `MQTTC_*` environment variables.
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path))
            .add_source(config::Environment::with_prefix("mqttc").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn credentials<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn username<U: Into<String>>(mut self, username: U) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn last_will(mut self, will: Will) -> Self {
        self.last_will = Some(will);
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = Bytesize(max_packet_size);
        self
    }

    pub fn root_cert<C: Into<String>>(mut self, root_cert: C) -> Self {
        self.root_cert = Some(root_cert.into());
        self
    }

    /// Keepalive in whole seconds, clamped to what the CONNECT field can hold.
    #[inline]
    pub fn keepalive_secs(&self) -> u16 {
        u16::try_from(self.keepalive.as_secs()).unwrap_or(u16::MAX)
    }

    /// Checks that need no network round trip.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(ClientError::MissingClientId);
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ClientError::InvalidOptions("password requires a username".into()));
        }
        if let Some(will) = &self.last_will {
            validate_topic_name(&will.topic)?;
        }
        Ok(())
    }

    pub(crate) fn dial_options(&self) -> DialOptions {
        DialOptions { connect_timeout: self.connect_timeout, root_cert: self.root_cert.clone() }
    }

    pub(crate) fn to_connect(&self) -> Connect {
        Connect {
            clean_session: self.clean_session,
            keep_alive: self.keepalive_secs(),
            last_will: self.last_will.as_ref().map(Will::to_last_will),
            client_id: self.client_id.as_str().into(),
            username: self.username.as_deref().map(Into::into),
            password: self.password.as_ref().map(|p| Bytes::from(p.clone())),
        }
    }
}

/// Message the broker publishes on our behalf if the connection drops uncleanly.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Will {
    pub topic: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        default = "Will::qos_default",
        deserialize_with = "Will::deserialize_qos",
        serialize_with = "Will::serialize_qos"
    )]
    pub qos: QoS,
    #[serde(default)]
    pub retain: bool,
}

impl Will {
    pub fn new<T: Into<String>, M: Into<String>>(topic: T, message: M, qos: QoS, retain: bool) -> Self {
        Will { topic: topic.into(), message: message.into(), qos, retain }
    }

    fn qos_default() -> QoS {
        QoS::AtMostOnce
    }

    #[inline]
    pub fn deserialize_qos<'de, D>(deserializer: D) -> std::result::Result<QoS, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        QoS::try_from(v).map_err(|_| de::Error::custom(format!("invalid qos, {v}")))
    }

    #[inline]
    pub fn serialize_qos<S>(qos: &QoS, s: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u8(qos.value())
    }

    fn to_last_will(&self) -> LastWill {
        LastWill {
            qos: self.qos,
            retain: self.retain,
            topic: self.topic.as_str().into(),
            message: Bytes::from(self.message.clone()),
        }
    }
}
