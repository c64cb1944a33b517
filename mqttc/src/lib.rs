#![deny(unsafe_code)]

//! # Example
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use mqttc::{Client, Options, QoS, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::new();
//!     client.on_message(|topic, payload| println!("{topic}: {}", String::from_utf8_lossy(payload)));
//!
//!     let opts = Options::new("example-client").keepalive(Duration::from_secs(30));
//!     client.connect("mqtt://127.0.0.1:1883", opts).await?.wait(Duration::ZERO).await?;
//!
//!     client.subscribe("sensors/#", QoS::AtLeastOnce).await?.wait(Duration::ZERO).await?;
//!     client.publish("sensors/1", "21.5", QoS::ExactlyOnce, false).await?.wait(Duration::ZERO).await?;
//!
//!     client.disconnect().await
//! }
//! ```

pub mod client; // Public handle and connection state
pub mod error;
pub mod future; // Completion handles for acknowledged operations
pub mod inflight; // Packet id allocation and handshake tracking
pub mod options;
mod session; // One live connection: reader, keepalive, routing
pub mod topic;

pub use client::{Client, OnLogFn, OnMessageFn, State};
pub use error::ClientError;
pub use future::{AckFuture, ConnectFuture, PublishFuture, SubscribeFuture, UnsubscribeFuture};
pub use inflight::{InInflightMessage, InflightTable, MomentStatus, OutInflightMessage, PacketId, Waiter};
pub use options::{Options, Will};
pub use topic::{validate_topic_filter, validate_topic_name, Level, Topic};

pub use mqttc_codec as codec;
pub use mqttc_codec::{ConnectAck, ConnectAckReason, QoS, SubscribeReturnCode};
pub use mqttc_net as net;

pub type Result<T> = std::result::Result<T, ClientError>;
