use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use bytestring::ByteString;
use parking_lot::Mutex;
use tokio::io::WriteHalf;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mqttc_codec::{
    Connect, ConnectAck, ConnectAckReason, Packet, PacketType, Publish, QoS, SubscribeReturnCode,
};
use mqttc_net::{BoxedTransport, MqttError, PacketSink, PacketStream};

use crate::client::{Shared, State};
use crate::future::{ConnectFuture, PublishFuture, SubscribeFuture, UnsubscribeFuture};
use crate::inflight::{
    InInflightMessage, InflightTable, MomentStatus, OutInflightMessage, PacketId, Waiter,
};
use crate::{ClientError, Options, Result};

type Reader = PacketStream<tokio::io::ReadHalf<BoxedTransport>>;
type Writer = PacketSink<WriteHalf<BoxedTransport>>;

/// One network connection and everything tracked on it.
///
/// Reading, inbound routing and future completion happen on the reader task. Writes from
/// any task go through `sink`, one packet at a time.
pub(crate) struct Session {
    shared: Arc<Shared>,
    client_id: String,
    sink: tokio::sync::Mutex<Writer>,
    pub(crate) outbound: Mutex<InflightTable<OutInflightMessage>>,
    pub(crate) inbound: Mutex<InflightTable<InInflightMessage>>,
    connect: ConnectFuture,
    keepalive: Duration,
    connect_timeout: Duration,
    last_activity: Mutex<Instant>,
    ping_deadline: Mutex<Option<Instant>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn start(shared: Arc<Shared>, io: BoxedTransport, options: &Options) -> Arc<Session> {
        let (stream, sink) =
            mqttc_net::split(io, options.max_packet_size.as_u32(), options.send_timeout);
        let session = Arc::new(Session {
            shared,
            client_id: options.client_id.clone(),
            sink: tokio::sync::Mutex::new(sink),
            outbound: Mutex::new(InflightTable::new()),
            inbound: Mutex::new(InflightTable::new()),
            connect: ConnectFuture::new(),
            keepalive: Duration::from_secs(options.keepalive_secs() as u64),
            connect_timeout: options.connect_timeout,
            last_activity: Mutex::new(Instant::now()),
            ping_deadline: Mutex::new(None),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(session.clone().read_loop(stream));
        session
    }

    #[inline]
    pub(crate) fn connect_future(&self) -> ConnectFuture {
        self.connect.clone()
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) async fn send_connect(&self, connect: Connect) {
        if let Err(e) = self.send(Packet::Connect(Box::new(connect))).await {
            self.teardown(e, State::Errored).await;
        }
    }

    pub(crate) async fn send(&self, packet: Packet) -> Result<()> {
        let kind = packet.packet_type();
        log::debug!("{} send {:?}", self.client_id, packet);
        self.sink.lock().await.send(packet).await?;
        self.touch();
        self.shared.log(&format!("sent <{kind}>"));
        Ok(())
    }

    pub(crate) async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<PublishFuture> {
        let mut publish =
            Publish { dup: false, retain, qos, topic: ByteString::from(topic), packet_id: None, payload };
        if qos == QoS::AtMostOnce {
            if self.is_closed() {
                return Err(ClientError::NotConnected);
            }
            return Ok(match self.send(Packet::Publish(publish)).await {
                Ok(()) => PublishFuture::ready(Ok(())),
                Err(e) => {
                    self.teardown(e.clone(), State::Errored).await;
                    PublishFuture::ready(Err(e))
                }
            });
        }

        let future = PublishFuture::new();
        let status = if qos == QoS::AtLeastOnce { MomentStatus::UnAck } else { MomentStatus::UnReceived };
        self.track_and_send(status, Waiter::Publish(future.clone()), move |packet_id| {
            publish.packet_id = Some(packet_id);
            Packet::Publish(publish)
        })
        .await?;
        Ok(future)
    }

    pub(crate) async fn subscribe(&self, topic_filters: Vec<(ByteString, QoS)>) -> Result<SubscribeFuture> {
        let future = SubscribeFuture::new();
        self.track_and_send(MomentStatus::UnSubAck, Waiter::Subscribe(future.clone()), move |packet_id| {
            Packet::Subscribe { packet_id, topic_filters }
        })
        .await?;
        Ok(future)
    }

    pub(crate) async fn unsubscribe(&self, topic_filters: Vec<ByteString>) -> Result<UnsubscribeFuture> {
        let future = UnsubscribeFuture::new();
        self.track_and_send(MomentStatus::UnUnsubAck, Waiter::Unsubscribe(future.clone()), move |packet_id| {
            Packet::Unsubscribe { packet_id, topic_filters }
        })
        .await?;
        Ok(future)
    }

    /// Allocate an id, record the packet and send it. A failed write ends the session and
    /// reaches the caller through the waiter.
    async fn track_and_send<F>(&self, status: MomentStatus, waiter: Waiter, build: F) -> Result<()>
    where
        F: FnOnce(PacketId) -> Packet,
    {
        let packet = {
            let mut out = self.outbound.lock();
            if self.is_closed() {
                return Err(ClientError::NotConnected);
            }
            let packet_id = out.next_id()?;
            let packet = build(packet_id);
            out.put(packet_id, OutInflightMessage::new(status, packet.clone(), waiter));
            packet
        };
        if let Err(e) = self.send(packet).await {
            self.teardown(e, State::Errored).await;
        }
        Ok(())
    }

    /// Ends the session exactly once: stops the reader and keepalive, fails every pending
    /// future and closes the transport.
    pub(crate) async fn teardown(&self, err: ClientError, state: State) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let state = {
            let mut st = self.shared.state.lock();
            if *st == State::Disconnecting {
                *st = State::Disconnected;
            } else {
                *st = state;
            }
            *st
        };
        let err = if state == State::Disconnected { ClientError::SessionClosed } else { err };
        if state == State::Errored {
            log::warn!("{} session closed, {}", self.client_id, err);
        } else {
            log::info!("{} session closed", self.client_id);
        }
        self.shared.log(&format!("closed <{err}>"));

        let _ = self.connect.complete(Err(err.clone()));
        let outbound = self.outbound.lock().drain().collect::<Vec<_>>();
        for (_, m) in outbound {
            m.waiter.fail(err.clone());
        }
        self.inbound.lock().clear();
        *self.ping_deadline.lock() = None;

        if let Err(e) = self.sink.lock().await.close().await {
            log::debug!("{} close transport, {}", self.client_id, e);
        }
    }

    #[inline]
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    async fn read_loop(self: Arc<Self>, mut stream: Reader) {
        let err = loop {
            let recv = async {
                if self.connect.is_done() || self.connect_timeout.is_zero() {
                    stream.recv().await
                } else {
                    stream.recv_timeout(self.connect_timeout).await
                }
            };
            let res = tokio::select! {
                _ = self.cancel.cancelled() => return,
                res = recv => res,
            };
            match res {
                Ok(Some(packet)) => {
                    self.touch();
                    log::debug!("{} recv {:?}", self.client_id, packet);
                    self.shared.log(&format!("received <{}>", packet.packet_type()));
                    if let Err(e) = self.handle(packet).await {
                        break e;
                    }
                }
                Ok(None) => break ClientError::Net(MqttError::Closed),
                Err(MqttError::ReadTimeout) => break ClientError::Timeout,
                Err(e) => break ClientError::Net(e),
            }
        };
        self.teardown(err, State::Errored).await;
    }

    async fn handle(self: &Arc<Self>, packet: Packet) -> Result<()> {
        if !self.connect.is_done() {
            return match packet {
                Packet::ConnectAck(ack) => self.handle_connack(ack),
                p => Err(ClientError::ProtocolViolation(format!("{} before CONNACK", p.packet_type()))),
            };
        }

        match packet {
            Packet::Publish(publish) => self.handle_publish(publish).await,
            Packet::PublishAck { packet_id } => {
                let m = self.take_outbound(packet_id, MomentStatus::UnAck, PacketType::PubAck)?;
                m.waiter.complete_unit();
                Ok(())
            }
            Packet::PublishReceived { packet_id } => {
                {
                    let mut out = self.outbound.lock();
                    match out.get_mut(&packet_id) {
                        // a repeated PUBREC gets its PUBREL again
                        Some(m) if matches!(m.status, MomentStatus::UnReceived | MomentStatus::UnComplete) => {
                            m.status = MomentStatus::UnComplete
                        }
                        _ => return Err(unexpected(PacketType::PubRec, packet_id)),
                    }
                }
                self.send(Packet::PublishRelease { packet_id }).await
            }
            Packet::PublishComplete { packet_id } => {
                let m = self.take_outbound(packet_id, MomentStatus::UnComplete, PacketType::PubComp)?;
                m.waiter.complete_unit();
                Ok(())
            }
            Packet::PublishRelease { packet_id } => {
                let msg = self.inbound.lock().delete(&packet_id);
                match msg {
                    Some(msg) if msg.status == MomentStatus::UnRelease => self.deliver(&msg.publish),
                    Some(msg) => log::warn!(
                        "{} PUBREL for packet id {} in state {:?}, dropped",
                        self.client_id,
                        packet_id,
                        msg.status
                    ),
                    None => log::debug!("{} duplicate PUBREL, packet id {}", self.client_id, packet_id),
                }
                self.send(Packet::PublishComplete { packet_id }).await
            }
            Packet::SubscribeAck { packet_id, status } => {
                let m = self.take_outbound(packet_id, MomentStatus::UnSubAck, PacketType::SubAck)?;
                self.handle_suback(m, status)
            }
            Packet::UnsubscribeAck { packet_id } => {
                let m = self.take_outbound(packet_id, MomentStatus::UnUnsubAck, PacketType::UnsubAck)?;
                m.waiter.complete_unit();
                Ok(())
            }
            Packet::PingResponse => {
                *self.ping_deadline.lock() = None;
                Ok(())
            }
            p => Err(ClientError::ProtocolViolation(format!("unexpected {}", p.packet_type()))),
        }
    }

    fn handle_connack(self: &Arc<Self>, ack: ConnectAck) -> Result<()> {
        if ack.return_code != ConnectAckReason::ConnectionAccepted {
            let e = ClientError::ConnectionRefused(ack.return_code);
            let _ = self.connect.complete(Err(e.clone()));
            return Err(e);
        }

        {
            let mut st = self.shared.state.lock();
            if *st == State::Connecting {
                *st = State::Connected;
            }
        }
        log::info!("{} connected, session present: {}", self.client_id, ack.session_present);
        let _ = self.connect.complete(Ok(ack));
        if !self.keepalive.is_zero() {
            tokio::spawn(self.clone().keepalive_loop());
        }
        Ok(())
    }

    async fn handle_publish(&self, publish: Publish) -> Result<()> {
        match publish.qos {
            QoS::AtMostOnce => {
                self.deliver(&publish);
                Ok(())
            }
            QoS::AtLeastOnce => {
                let packet_id = required_id(&publish)?;
                self.send(Packet::PublishAck { packet_id }).await?;
                self.deliver(&publish);
                Ok(())
            }
            QoS::ExactlyOnce => {
                let packet_id = required_id(&publish)?;
                let dup = publish.dup;
                let prev = self
                    .inbound
                    .lock()
                    .put(packet_id, InInflightMessage { publish, status: MomentStatus::UnRelease });
                if prev.is_some() && !dup {
                    return Err(ClientError::ProtocolViolation(format!(
                        "packet id {packet_id} is still in use"
                    )));
                }
                self.send(Packet::PublishReceived { packet_id }).await
            }
        }
    }

    fn handle_suback(&self, m: OutInflightMessage, status: Vec<SubscribeReturnCode>) -> Result<()> {
        let requested = match &m.packet {
            Packet::Subscribe { topic_filters, .. } => topic_filters.len(),
            _ => 0,
        };
        let Waiter::Subscribe(f) = &m.waiter else {
            return Ok(());
        };
        if requested != status.len() {
            let e = ClientError::ProtocolViolation(format!(
                "SUBACK carries {} return codes for {} topic filters",
                status.len(),
                requested
            ));
            let _ = f.complete(Err(e.clone()));
            return Err(e);
        }
        let _ = f.complete(Ok(status));
        Ok(())
    }

    fn take_outbound(
        &self,
        packet_id: PacketId,
        expected: MomentStatus,
        kind: PacketType,
    ) -> Result<OutInflightMessage> {
        let mut out = self.outbound.lock();
        match out.get(&packet_id).map(|m| m.status) {
            Some(status) if status == expected => {
                out.delete(&packet_id).ok_or_else(|| unexpected(kind, packet_id))
            }
            _ => Err(unexpected(kind, packet_id)),
        }
    }

    #[inline]
    fn deliver(&self, publish: &Publish) {
        self.shared.deliver(&publish.topic, &publish.payload);
    }

    /// Sends PINGREQ once a full interval passes without traffic in either direction. A
    /// PINGRESP must arrive within the following interval.
    async fn keepalive_loop(self: Arc<Self>) {
        let interval = self.keepalive;
        loop {
            let pending = *self.ping_deadline.lock();
            let wake = match pending {
                Some(deadline) => deadline,
                None => *self.last_activity.lock() + interval,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(wake) => {}
            }

            let now = Instant::now();
            let pending = *self.ping_deadline.lock();
            match pending {
                Some(deadline) if now >= deadline => {
                    self.teardown(ClientError::KeepAliveTimeout, State::Errored).await;
                    return;
                }
                Some(_) => continue,
                None => {}
            }
            let last = *self.last_activity.lock();
            if now < last + interval {
                continue;
            }

            *self.ping_deadline.lock() = Some(now + interval);
            if let Err(e) = self.send(Packet::PingRequest).await {
                self.teardown(e, State::Errored).await;
                return;
            }
        }
    }
}

#[inline]
fn required_id(publish: &Publish) -> Result<PacketId> {
    publish
        .packet_id
        .ok_or_else(|| ClientError::ProtocolViolation(format!("QoS {} PUBLISH without packet id", publish.qos.value())))
}

#[inline]
fn unexpected(kind: PacketType, packet_id: PacketId) -> ClientError {
    ClientError::ProtocolViolation(format!("unexpected {kind}, packet id {packet_id}"))
}
