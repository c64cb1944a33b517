use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use bytestring::ByteString;
use parking_lot::{Mutex, RwLock};

use mqttc_codec::QoS;
use mqttc_net::{dial, BoxedTransport, ServerAddr, Transport};

use crate::future::{ConnectFuture, PublishFuture, SubscribeFuture, UnsubscribeFuture};
use crate::session::Session;
use crate::topic::{validate_topic_filter, validate_topic_name};
use crate::{ClientError, Options, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// The last session ended on a transport or protocol failure.
    Errored,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Disconnected => "disconnected",
            State::Connecting => "connecting",
            State::Connected => "connected",
            State::Disconnecting => "disconnecting",
            State::Errored => "errored",
        })
    }
}

pub type OnMessageFn = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;
pub type OnLogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// State and callbacks that outlive any single session.
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    on_message: RwLock<Option<OnMessageFn>>,
    on_log: RwLock<Option<OnLogFn>>,
}

impl Shared {
    #[inline]
    pub(crate) fn state(&self) -> State {
        *self.state.lock()
    }

    #[inline]
    pub(crate) fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    #[inline]
    pub(crate) fn deliver(&self, topic: &str, payload: &[u8]) {
        let f = self.on_message.read().clone();
        if let Some(f) = f {
            f(topic, payload);
        }
    }

    #[inline]
    pub(crate) fn log(&self, msg: &str) {
        let f = self.on_log.read().clone();
        if let Some(f) = f {
            f(msg);
        }
    }
}

/// MQTT v3.1.1 client.
///
/// Cheap to clone; clones drive the same connection. Operations return an
/// [`AckFuture`](crate::AckFuture) that resolves when the broker acknowledges them.
/// Checks that need no network round trip fail right away with an `Err` instead.
///
/// Callbacks run inline on the task that reads from the broker and should return quickly.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    session: Arc<Mutex<Option<Arc<Session>>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("state", &self.state()).finish()
    }
}

impl Client {
    pub fn new() -> Self {
        Client {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Disconnected),
                on_message: RwLock::new(None),
                on_log: RwLock::new(None),
            }),
            session: Arc::new(Mutex::new(None)),
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Called with `(topic, payload)` for every inbound application message.
    pub fn on_message<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        *self.shared.on_message.write() = Some(Arc::new(f));
    }

    /// Called with a short line per packet sent or received, e.g. `sent <PINGREQ>`.
    pub fn on_log<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.shared.on_log.write() = Some(Arc::new(f));
    }

    /// Dial `url` and send CONNECT. The returned future resolves on CONNACK.
    pub async fn connect(&self, url: &str, options: Options) -> Result<ConnectFuture> {
        options.validate()?;
        let addr = ServerAddr::parse(url)?;
        self.begin_connect()?;

        log::info!("{} connecting to {}", options.client_id, addr);
        match dial(&addr, &options.dial_options()).await {
            Ok(io) => Ok(self.start(io, options).await),
            Err(e) => {
                log::warn!("{} connect to {} fail, {}", options.client_id, addr, e);
                self.shared.set_state(State::Errored);
                Err(e.into())
            }
        }
    }

    /// Like [`connect`](Client::connect) over a byte stream the caller already opened.
    pub async fn connect_with<T: Transport>(&self, io: T, options: Options) -> Result<ConnectFuture> {
        options.validate()?;
        self.begin_connect()?;
        Ok(self.start(Box::new(io), options).await)
    }

    fn begin_connect(&self) -> Result<()> {
        let mut st = self.shared.state.lock();
        match *st {
            State::Disconnected | State::Errored => {
                *st = State::Connecting;
                Ok(())
            }
            _ => Err(ClientError::AlreadyConnecting),
        }
    }

    async fn start(&self, io: BoxedTransport, options: Options) -> ConnectFuture {
        let session = {
            // disconnect() takes this lock after leaving Connecting
            let mut slot = self.session.lock();
            if self.state() != State::Connecting {
                return ConnectFuture::ready(Err(ClientError::SessionClosed));
            }
            let session = Session::start(self.shared.clone(), io, &options);
            *slot = Some(session.clone());
            session
        };
        session.send_connect(options.to_connect()).await;
        session.connect_future()
    }

    /// Send DISCONNECT and close the connection. Pending futures fail with
    /// [`ClientError::SessionClosed`].
    pub async fn disconnect(&self) -> Result<()> {
        let prev = {
            let mut st = self.shared.state.lock();
            let prev = *st;
            match prev {
                State::Connected | State::Connecting => *st = State::Disconnecting,
                _ => return Err(ClientError::NotConnected),
            }
            prev
        };

        let session = self.session.lock().clone();
        match session {
            Some(session) => {
                if prev == State::Connected {
                    if let Err(e) = session.send(mqttc_codec::Packet::Disconnect).await {
                        log::debug!("send DISCONNECT, {}", e);
                    }
                }
                session.teardown(ClientError::SessionClosed, State::Disconnected).await;
            }
            None => self.shared.set_state(State::Disconnected),
        }
        Ok(())
    }

    pub async fn publish<P>(&self, topic: &str, payload: P, qos: QoS, retain: bool) -> Result<PublishFuture>
    where
        P: Into<Bytes>,
    {
        validate_topic_name(topic)?;
        self.connected()?.publish(topic, payload.into(), qos, retain).await
    }

    #[inline]
    pub async fn subscribe(&self, filter: &str, qos: QoS) -> Result<SubscribeFuture> {
        self.subscribe_many(&[(filter, qos)]).await
    }

    /// The future resolves to one return code per filter, in request order.
    pub async fn subscribe_many(&self, filters: &[(&str, QoS)]) -> Result<SubscribeFuture> {
        if filters.is_empty() {
            return Err(ClientError::InvalidTopic("no topic filters".into()));
        }
        let topic_filters = filters
            .iter()
            .map(|(f, qos)| validate_topic_filter(f).map(|_| (ByteString::from(*f), *qos)))
            .collect::<Result<Vec<_>>>()?;
        self.connected()?.subscribe(topic_filters).await
    }

    pub async fn unsubscribe(&self, filters: &[&str]) -> Result<UnsubscribeFuture> {
        if filters.is_empty() {
            return Err(ClientError::InvalidTopic("no topic filters".into()));
        }
        let topic_filters = filters
            .iter()
            .map(|f| validate_topic_filter(f).map(|_| ByteString::from(*f)))
            .collect::<Result<Vec<_>>>()?;
        self.connected()?.unsubscribe(topic_filters).await
    }

    fn connected(&self) -> Result<Arc<Session>> {
        if self.state() != State::Connected {
            return Err(ClientError::NotConnected);
        }
        self.session.lock().clone().filter(|s| !s.is_closed()).ok_or(ClientError::NotConnected)
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU16;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    use mqttc_codec::{ConnectAck, ConnectAckReason, Packet, Publish, SubscribeReturnCode};
    use mqttc_net::{MqttError, PacketSink, PacketStream};

    use super::*;
    use crate::inflight::{InInflightMessage, MomentStatus};

    const WAIT: Duration = Duration::from_secs(3);

    struct Broker {
        rx: PacketStream<ReadHalf<DuplexStream>>,
        tx: PacketSink<WriteHalf<DuplexStream>>,
    }

    impl Broker {
        fn new(io: DuplexStream) -> Self {
            let (rx, tx) = mqttc_net::split(io, 0, Duration::ZERO);
            Broker { rx, tx }
        }

        async fn recv(&mut self) -> Packet {
            self.rx.recv().await.unwrap().unwrap()
        }

        async fn send(&mut self, packet: Packet) {
            self.tx.send(packet).await.unwrap()
        }

        async fn connack(&mut self, return_code: ConnectAckReason) {
            match self.recv().await {
                Packet::Connect(c) => assert_eq!(c.client_id, "c1"),
                p => panic!("expected CONNECT, got {p:?}"),
            }
            self.send(Packet::ConnectAck(ConnectAck { return_code, session_present: false })).await;
        }

        /// Wait for the client to close its side.
        async fn closed(&mut self) {
            loop {
                match self.rx.recv().await {
                    Ok(Some(_)) => continue,
                    _ => return,
                }
            }
        }
    }

    fn pid(v: u16) -> NonZeroU16 {
        NonZeroU16::new(v).unwrap()
    }

    fn options() -> Options {
        Options::new("c1").keepalive(Duration::ZERO)
    }

    async fn connected(options: Options) -> (Client, Broker) {
        let _ = simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Debug).init();
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = Client::new();
        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, options).await.unwrap();
        assert_eq!(client.state(), State::Connecting);

        broker.connack(ConnectAckReason::ConnectionAccepted).await;
        let ack = fut.wait(WAIT).await.unwrap();
        assert!(!ack.session_present);
        assert_eq!(ack.return_code, ConnectAckReason::ConnectionAccepted);
        assert_eq!(client.state(), State::Connected);
        (client, broker)
    }

    fn collect_messages(client: &Client) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let m = messages.clone();
        client.on_message(move |topic, payload| m.lock().push((topic.to_string(), payload.to_vec())));
        messages
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (client, _broker) = connected(options()).await;

        let e = client.connect("mqtt://127.0.0.1:1", options()).await.unwrap_err();
        assert!(matches!(e, ClientError::AlreadyConnecting));
        assert!(e.is_rejected());

        let (a, _b) = tokio::io::duplex(1024);
        assert!(matches!(client.connect_with(a, options()).await, Err(ClientError::AlreadyConnecting)));
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let client = Client::new();
        let (a, _b) = tokio::io::duplex(1024);
        let e = client.connect_with(a, Options::default()).await.unwrap_err();
        assert!(matches!(e, ClientError::MissingClientId));
        assert_eq!(client.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (a, b) = tokio::io::duplex(1024);
        let client = Client::new();
        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, options()).await.unwrap();
        broker.connack(ConnectAckReason::NotAuthorized).await;

        let e = fut.wait(WAIT).await.unwrap_err();
        assert!(matches!(e, ClientError::ConnectionRefused(ConnectAckReason::NotAuthorized)));
        broker.closed().await;
        assert_eq!(client.state(), State::Errored);

        // a fresh attempt is allowed after a failure
        let (a, b) = tokio::io::duplex(1024);
        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, options()).await.unwrap();
        broker.connack(ConnectAckReason::ConnectionAccepted).await;
        assert!(fut.wait(WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn test_packet_before_connack() {
        let (a, b) = tokio::io::duplex(1024);
        let client = Client::new();
        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, options()).await.unwrap();
        assert!(matches!(broker.recv().await, Packet::Connect(_)));
        broker.send(Packet::PingResponse).await;

        assert!(matches!(fut.wait(WAIT).await, Err(ClientError::ProtocolViolation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let (a, b) = tokio::io::duplex(1024);
        let client = Client::new();
        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, options().connect_timeout(Duration::from_secs(5))).await.unwrap();
        assert!(matches!(broker.recv().await, Packet::Connect(_)));

        assert!(matches!(fut.wait(Duration::ZERO).await, Err(ClientError::Timeout)));
        broker.closed().await;
        assert_eq!(client.state(), State::Errored);
    }

    #[tokio::test]
    async fn test_publish_qos0() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.publish("test", "hello", QoS::AtMostOnce, false).await.unwrap();
        assert!(fut.is_done());
        assert!(fut.wait(WAIT).await.is_ok());

        match broker.recv().await {
            Packet::Publish(p) => {
                assert_eq!(p.packet_id, None);
                assert_eq!(p.payload, Bytes::from_static(b"hello"));
            }
            p => panic!("unexpected {p:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_qos1() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.publish("test", "hello", QoS::AtLeastOnce, false).await.unwrap();

        let session = client.session().unwrap();
        {
            let out = session.outbound.lock();
            assert_eq!(out.len(), 1);
            assert!(out.exist(&pid(1)));
        }

        match broker.recv().await {
            Packet::Publish(p) => {
                assert_eq!(p.packet_id, Some(pid(1)));
                assert_eq!(p.qos, QoS::AtLeastOnce);
                assert_eq!(&p.topic[..], "test");
            }
            p => panic!("unexpected {p:?}"),
        }
        assert!(!fut.is_done());

        broker.send(Packet::PublishAck { packet_id: pid(1) }).await;
        assert!(fut.wait(WAIT).await.is_ok());
        assert!(session.outbound.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_qos2() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.publish("test", "hello", QoS::ExactlyOnce, true).await.unwrap();

        let packet_id = match broker.recv().await {
            Packet::Publish(p) => {
                assert!(p.retain);
                p.packet_id.unwrap()
            }
            p => panic!("unexpected {p:?}"),
        };
        broker.send(Packet::PublishReceived { packet_id }).await;
        assert_eq!(broker.recv().await, Packet::PublishRelease { packet_id });
        assert!(!fut.is_done());
        assert_eq!(
            client.session().unwrap().outbound.lock().get(&packet_id).map(|m| m.status),
            Some(MomentStatus::UnComplete)
        );

        broker.send(Packet::PublishComplete { packet_id }).await;
        assert!(fut.wait(WAIT).await.is_ok());
        assert!(client.session().unwrap().outbound.lock().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_delivery() {
        let (client, mut broker) = connected(options()).await;
        let messages = collect_messages(&client);

        let publish = |qos, packet_id: Option<NonZeroU16>, payload: &'static [u8]| {
            Packet::Publish(Publish {
                dup: false,
                retain: false,
                qos,
                topic: "a/b".into(),
                packet_id,
                payload: Bytes::from_static(payload),
            })
        };

        broker.send(publish(QoS::AtLeastOnce, Some(pid(5)), b"one")).await;
        assert_eq!(broker.recv().await, Packet::PublishAck { packet_id: pid(5) });

        broker.send(publish(QoS::ExactlyOnce, Some(pid(6)), b"two")).await;
        assert_eq!(broker.recv().await, Packet::PublishReceived { packet_id: pid(6) });
        assert_eq!(messages.lock().len(), 1);
        assert_eq!(
            client.session().unwrap().inbound.lock().get(&pid(6)).map(|m| m.status),
            Some(MomentStatus::UnRelease)
        );

        broker.send(Packet::PublishRelease { packet_id: pid(6) }).await;
        assert_eq!(broker.recv().await, Packet::PublishComplete { packet_id: pid(6) });
        assert_eq!(messages.lock().len(), 2);

        // a repeated PUBREL is acknowledged again but not delivered again
        broker.send(Packet::PublishRelease { packet_id: pid(6) }).await;
        assert_eq!(broker.recv().await, Packet::PublishComplete { packet_id: pid(6) });

        broker.send(publish(QoS::AtMostOnce, None, b"three")).await;
        broker.send(publish(QoS::ExactlyOnce, Some(pid(7)), b"four")).await;
        assert_eq!(broker.recv().await, Packet::PublishReceived { packet_id: pid(7) });

        let messages = messages.lock();
        assert_eq!(
            *messages,
            vec![
                ("a/b".to_string(), b"one".to_vec()),
                ("a/b".to_string(), b"two".to_vec()),
                ("a/b".to_string(), b"three".to_vec()),
            ]
        );
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_inbound_qos2_id_reuse() {
        let (client, mut broker) = connected(options()).await;
        let publish = Publish {
            dup: false,
            retain: false,
            qos: QoS::ExactlyOnce,
            topic: "a".into(),
            packet_id: Some(pid(9)),
            payload: Bytes::new(),
        };
        broker.send(Packet::Publish(publish.clone())).await;
        assert_eq!(broker.recv().await, Packet::PublishReceived { packet_id: pid(9) });

        // a redelivery is fine
        broker.send(Packet::Publish(Publish { dup: true, ..publish.clone() })).await;
        assert_eq!(broker.recv().await, Packet::PublishReceived { packet_id: pid(9) });

        // a new message under an id still in flight is not
        broker.send(Packet::Publish(publish)).await;
        broker.closed().await;
        assert_eq!(client.state(), State::Errored);
    }

    #[tokio::test]
    async fn test_pubrel_delivers_only_released() {
        let (client, mut broker) = connected(options()).await;
        let messages = collect_messages(&client);
        let publish = Publish {
            dup: false,
            retain: false,
            qos: QoS::ExactlyOnce,
            topic: "a".into(),
            packet_id: Some(pid(4)),
            payload: Bytes::from_static(b"x"),
        };
        client
            .session()
            .unwrap()
            .inbound
            .lock()
            .put(pid(4), InInflightMessage { publish, status: MomentStatus::UnAck });

        broker.send(Packet::PublishRelease { packet_id: pid(4) }).await;
        assert_eq!(broker.recv().await, Packet::PublishComplete { packet_id: pid(4) });
        assert!(messages.lock().is_empty());
        assert!(!client.session().unwrap().inbound.lock().exist(&pid(4)));
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_callback_holds_next_packet() {
        let (client, mut broker) = connected(options()).await;
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        client.on_message(move |_, _| {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = gate.lock().recv();
            }
        });

        let publish = |packet_id| {
            Packet::Publish(Publish {
                dup: false,
                retain: false,
                qos: QoS::AtLeastOnce,
                topic: "slow".into(),
                packet_id: Some(pid(packet_id)),
                payload: Bytes::from_static(b"x"),
            })
        };
        broker.send(publish(1)).await;
        assert_eq!(broker.recv().await, Packet::PublishAck { packet_id: pid(1) });

        // nothing more is read while the first callback runs
        broker.send(publish(2)).await;
        assert!(matches!(
            broker.rx.recv_timeout(Duration::from_millis(300)).await,
            Err(MqttError::ReadTimeout)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.send(()).unwrap();
        assert_eq!(broker.recv().await, Packet::PublishAck { packet_id: pid(2) });
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.subscribe_many(&[("a/+", QoS::AtLeastOnce), ("b/#", QoS::ExactlyOnce)]).await.unwrap();

        let packet_id = match broker.recv().await {
            Packet::Subscribe { packet_id, topic_filters } => {
                assert_eq!(topic_filters.len(), 2);
                assert_eq!(topic_filters[1], (ByteString::from("b/#"), QoS::ExactlyOnce));
                packet_id
            }
            p => panic!("unexpected {p:?}"),
        };
        let codes = vec![SubscribeReturnCode::Success(QoS::AtLeastOnce), SubscribeReturnCode::Failure];
        broker.send(Packet::SubscribeAck { packet_id, status: codes.clone() }).await;
        assert_eq!(fut.wait(WAIT).await.unwrap(), codes);

        let fut = client.unsubscribe(&["a/+"]).await.unwrap();
        let packet_id = match broker.recv().await {
            Packet::Unsubscribe { packet_id, topic_filters } => {
                assert_eq!(topic_filters, vec![ByteString::from("a/+")]);
                packet_id
            }
            p => panic!("unexpected {p:?}"),
        };
        broker.send(Packet::UnsubscribeAck { packet_id }).await;
        assert!(fut.wait(WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_before_send() {
        let (client, _broker) = connected(options()).await;
        assert!(matches!(client.publish("a/#", "x", QoS::AtMostOnce, false).await, Err(ClientError::InvalidTopic(_))));
        assert!(matches!(client.publish("", "x", QoS::AtMostOnce, false).await, Err(ClientError::InvalidTopic(_))));
        assert!(matches!(client.subscribe_many(&[]).await, Err(ClientError::InvalidTopic(_))));
        assert!(matches!(client.subscribe("", QoS::AtMostOnce).await, Err(ClientError::InvalidTopic(_))));
        assert!(matches!(client.unsubscribe(&[]).await, Err(ClientError::InvalidTopic(_))));

        let idle = Client::new();
        assert!(matches!(idle.publish("a", "x", QoS::AtMostOnce, false).await, Err(ClientError::NotConnected)));
        assert!(matches!(idle.disconnect().await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_suback_count_mismatch() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.subscribe_many(&[("a", QoS::AtMostOnce), ("b", QoS::AtMostOnce)]).await.unwrap();
        let packet_id = match broker.recv().await {
            Packet::Subscribe { packet_id, .. } => packet_id,
            p => panic!("unexpected {p:?}"),
        };
        broker.send(Packet::SubscribeAck { packet_id, status: vec![SubscribeReturnCode::Failure] }).await;

        assert!(matches!(fut.wait(WAIT).await, Err(ClientError::ProtocolViolation(_))));
        broker.closed().await;
        assert_eq!(client.state(), State::Errored);
    }

    #[tokio::test]
    async fn test_unexpected_ack_tears_down() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.publish("test", "x", QoS::AtLeastOnce, false).await.unwrap();
        assert!(matches!(broker.recv().await, Packet::Publish(_)));

        broker.send(Packet::PublishAck { packet_id: pid(99) }).await;
        assert!(matches!(fut.wait(WAIT).await, Err(ClientError::ProtocolViolation(_))));
        broker.closed().await;
        assert_eq!(client.state(), State::Errored);
        assert!(client.session().unwrap().outbound.lock().is_empty());
        assert!(matches!(client.publish("test", "x", QoS::AtMostOnce, false).await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_broker_hangup_fails_pending() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.subscribe("a", QoS::AtLeastOnce).await.unwrap();
        assert!(matches!(broker.recv().await, Packet::Subscribe { .. }));
        drop(broker);

        let e = fut.wait(WAIT).await.unwrap_err();
        assert!(matches!(e, ClientError::Net(MqttError::Closed)));
        assert!(e.is_transport());
        assert_eq!(client.state(), State::Errored);
    }

    #[tokio::test]
    async fn test_connect_refused_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = Client::new();
        let e = client.connect(&format!("mqtt://127.0.0.1:{port}"), options()).await.unwrap_err();
        assert!(matches!(e, ClientError::Net(_)));
        assert!(e.is_transport());
        assert_eq!(client.state(), State::Errored);
        assert!(client.session().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_while_dialing() {
        let (a, _b) = tokio::io::duplex(1024);
        let client = Client::new();
        client.begin_connect().unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(client.state(), State::Disconnected);

        let fut = client.start(Box::new(a), options()).await;
        assert!(matches!(fut.result(), Some(Err(ClientError::SessionClosed))));
        assert!(client.session().is_none());
        assert_eq!(client.state(), State::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_races_connect() {
        for _ in 0..200 {
            let (a, _b) = tokio::io::duplex(1024);
            let client = Client::new();
            let c = client.clone();
            let connecting = tokio::spawn(async move { c.connect_with(a, options()).await });
            let disconnected = client.disconnect().await;
            let fut = connecting.await.unwrap().unwrap();
            if disconnected.is_ok() {
                assert!(client.session().map_or(true, |s| s.is_closed()));
                assert!(matches!(fut.wait(WAIT).await, Err(ClientError::SessionClosed)));
                assert_eq!(client.state(), State::Disconnected);
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (client, mut broker) = connected(options()).await;
        let fut = client.publish("test", "x", QoS::AtLeastOnce, false).await.unwrap();
        assert!(matches!(broker.recv().await, Packet::Publish(_)));

        client.disconnect().await.unwrap();
        assert_eq!(client.state(), State::Disconnected);
        assert!(matches!(fut.wait(WAIT).await, Err(ClientError::SessionClosed)));

        assert_eq!(broker.recv().await, Packet::Disconnect);
        assert_eq!(broker.rx.recv().await.unwrap(), None);
        assert!(matches!(client.disconnect().await, Err(ClientError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings() {
        let (a, b) = tokio::io::duplex(1024);
        let client = Client::new();
        let logs = Arc::new(Mutex::new(Vec::new()));
        let l = logs.clone();
        client.on_log(move |msg| l.lock().push(msg.to_string()));

        let mut broker = Broker::new(b);
        let fut = client.connect_with(a, Options::new("c1").keepalive(Duration::from_secs(2))).await.unwrap();
        broker.connack(ConnectAckReason::ConnectionAccepted).await;
        fut.wait(WAIT).await.unwrap();

        let pings = Arc::new(AtomicUsize::new(0));
        let p = pings.clone();
        let responder = tokio::spawn(async move {
            while let Ok(Some(packet)) = broker.rx.recv().await {
                if packet == Packet::PingRequest {
                    p.fetch_add(1, Ordering::SeqCst);
                    broker.send(Packet::PingResponse).await;
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(pings.load(Ordering::SeqCst), 3);
        assert_eq!(client.state(), State::Connected);

        let logs = logs.lock().clone();
        assert!(logs.contains(&"sent <PINGREQ>".to_string()));
        assert!(logs.contains(&"received <PINGRESP>".to_string()));

        client.disconnect().await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_timeout() {
        let (client, mut broker) = connected(options().keepalive(Duration::from_secs(2))).await;
        let fut = client.publish("test", "x", QoS::AtLeastOnce, false).await.unwrap();

        let mut pings = 0;
        loop {
            match broker.rx.recv().await {
                Ok(Some(Packet::PingRequest)) => pings += 1,
                Ok(Some(_)) => {}
                _ => break,
            }
        }
        assert_eq!(pings, 1);
        assert!(matches!(fut.wait(WAIT).await, Err(ClientError::KeepAliveTimeout)));
        assert_eq!(client.state(), State::Errored);
    }
}
