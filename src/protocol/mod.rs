//! Protocol (C7) — the driver tying framing, the pending-ops table, and a
//! transport together: handshake, ping/pong liveness, request/response
//! dispatch, event fan-out, and the shared-memory fast path.
//!
//! Grounded on the teacher's `manager::core::SharedFileManager`: a
//! `DashMap` keyed by a monotonically-increasing `Atomic*` id
//! (`active_files`/`next_file_id` there, `pending`/`next_sequence` here)
//! plus a `tokio::sync::broadcast::Sender` for fanning out events to
//! however many listeners have subscribed.

mod operation;
pub mod transport;

pub use operation::{Operation, OperationState};
pub use transport::{IoTransport, Role, Transport};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::error::{IncError, IncResult};
use crate::framing::{PollOutcome, Receiver, Sender as FrameSender};
use crate::message::{Message, MessageFlags, MessageType};
use crate::shm::{SharedMemoryBlock, ShmTable};
use crate::tagstruct::{TagStructWriter, Value};

/// Events a `Protocol` fans out to subscribers, mirroring the teacher's
/// `ManagerEvent` broadcast pattern.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    Connected,
    Disconnected,
    /// An inbound message that isn't a reply to a pending operation —
    /// EVENT/SUBSCRIBE traffic and unsolicited METHOD_CALLs.
    Message(Message),
}

/// Multiplexed request/response + pub/sub driver over one connection.
pub struct Protocol<T: Transport> {
    transport: T,
    config: ServerConfig,
    channel_id: u16,
    role: Role,
    next_sequence: AtomicU32,
    pending: Arc<DashMap<u32, Operation>>,
    shm: ShmTable,
    events: broadcast::Sender<ProtocolEvent>,
    receiver: Receiver,
    sender: FrameSender,
    read_buf: Vec<u8>,
}

impl<T: Transport> Protocol<T> {
    pub fn new(transport: T, config: ServerConfig, channel_id: u16, role: Role) -> Self {
        let (events, _) = broadcast::channel(1024);
        let max_message_size = config.max_message_size;
        Protocol {
            transport,
            config,
            channel_id,
            role,
            next_sequence: AtomicU32::new(1),
            pending: Arc::new(DashMap::new()),
            shm: ShmTable::new(),
            events,
            receiver: Receiver::new(max_message_size),
            sender: FrameSender::new(),
            read_buf: vec![0u8; 64 * 1024],
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }

    fn next_sequence(&self) -> u32 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Perform the HANDSHAKE / HANDSHAKE_ACK exchange. Until it completes,
    /// no other send operation should be issued (spec.md §4.7: "until
    /// HANDSHAKE_ACK is received, all other send operations are queued").
    /// Which side speaks first depends on `self.role`.
    pub async fn handshake(&mut self) -> IncResult<()> {
        match self.role {
            Role::Client => self.handshake_as_client().await,
            Role::Server => self.handshake_as_server().await,
        }
    }

    async fn handshake_as_client(&mut self) -> IncResult<()> {
        let mut payload = TagStructWriter::new();
        payload.append_u32(self.config.max_version as u32);
        let msg = Message::new(
            MessageType::Handshake,
            self.channel_id,
            self.next_sequence(),
            payload.into_bytes(),
        );
        self.write_message(&msg).await?;

        let reply = self.read_one_message().await?;
        if reply.header.message_type != MessageType::HandshakeAck {
            return Err(IncError::VersionUnsupported {
                offered: 0,
                min: self.config.min_version,
                max: self.config.max_version,
            });
        }
        let mut reader = crate::tagstruct::TagStructReader::new(&reply.payload);
        if let Ok(Value::U32(selected)) = reader.read_value() {
            if !self.config.accepts_version(selected as u16) {
                return Err(IncError::VersionUnsupported {
                    offered: selected as u16,
                    min: self.config.min_version,
                    max: self.config.max_version,
                });
            }
        }
        let _ = self.events.send(ProtocolEvent::Connected);
        debug!(channel_id = self.channel_id, "handshake complete (client)");
        Ok(())
    }

    async fn handshake_as_server(&mut self) -> IncResult<()> {
        let request = self.read_one_message().await?;
        if request.header.message_type != MessageType::Handshake {
            return Err(IncError::VersionUnsupported {
                offered: 0,
                min: self.config.min_version,
                max: self.config.max_version,
            });
        }
        let mut reader = crate::tagstruct::TagStructReader::new(&request.payload);
        let offered = match reader.read_value() {
            Ok(Value::U32(v)) => v as u16,
            _ => {
                return Err(IncError::VersionUnsupported {
                    offered: 0,
                    min: self.config.min_version,
                    max: self.config.max_version,
                })
            }
        };

        if !self.config.accepts_version(offered) {
            warn!(offered, "rejecting handshake: version not accepted");
            return Err(IncError::VersionUnsupported {
                offered,
                min: self.config.min_version,
                max: self.config.max_version,
            });
        }
        let selected = offered.min(self.config.max_version);

        let mut ack_payload = TagStructWriter::new();
        ack_payload.append_u32(selected as u32);
        let ack = Message::new(
            MessageType::HandshakeAck,
            self.channel_id,
            request.header.sequence_number,
            ack_payload.into_bytes(),
        );
        self.write_message(&ack).await?;

        let _ = self.events.send(ProtocolEvent::Connected);
        debug!(channel_id = self.channel_id, selected, "handshake complete (server)");
        Ok(())
    }

    /// Send a request and await its reply, registering a pending operation
    /// keyed by the assigned sequence number.
    pub async fn send(&mut self, message_type: MessageType, payload: Vec<u8>) -> IncResult<Message> {
        let sequence = self.next_sequence();
        let msg = Message::new(message_type, self.channel_id, sequence, payload);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(sequence, Operation::new(tx));

        self.write_message(&msg).await?;
        trace!(sequence, "request sent, awaiting reply");

        loop {
            let inbound = self.read_one_message().await?;
            if inbound.header.sequence_number == sequence
                && matches!(
                    inbound.header.message_type,
                    MessageType::MethodReply | MessageType::SubscribeAck | MessageType::UnsubscribeAck
                )
            {
                if let Some((_, op)) = self.pending.remove(&sequence) {
                    op.complete(inbound.clone());
                }
                return rx.await.map_err(|_| IncError::TransportClosed)?;
            }
            self.dispatch_unmatched(inbound);
        }
    }

    /// Send a payload via the shared-memory fast path when it's large
    /// enough to be worth it: the bytes are written into an anonymous
    /// block and only a packed `{id,offset,length}` reference travels on
    /// the wire as a header-only `BINARY_DATA` message with `SHM_DATA` set
    /// (spec.md §4.5/§4.7); smaller payloads go inline.
    pub async fn send_binary(&mut self, bytes: &[u8]) -> IncResult<()> {
        if !self.config.shared_memory_enabled
            || (bytes.len() as u32) < self.config.shared_memory_threshold
        {
            let msg = Message::new(
                MessageType::BinaryData,
                self.channel_id,
                self.next_sequence(),
                bytes.to_vec(),
            );
            return self.write_message(&msg).await;
        }

        let block = SharedMemoryBlock::create(bytes.len() as u32)?;
        block.write_at(0, bytes)?;
        let msg = Message::new_shm_ref(
            MessageType::BinaryData,
            self.channel_id,
            self.next_sequence(),
            block.id(),
            0,
            bytes.len() as u64,
        );
        self.shm.insert(block);
        self.write_message(&msg).await
    }

    pub async fn ping(&mut self) -> IncResult<()> {
        let msg = Message::new(MessageType::Ping, self.channel_id, self.next_sequence(), vec![]);
        self.write_message(&msg).await
    }

    /// Reply to an inbound request, addressed by the request's own channel
    /// and sequence number (spec.md §4.7's `METHOD_CALL`/`METHOD_REPLY`
    /// pairing). Used by the receiving side of `send()`, which has no
    /// corresponding pending-ops entry to resolve.
    pub async fn reply(
        &mut self,
        request: &Message,
        message_type: MessageType,
        payload: Vec<u8>,
    ) -> IncResult<()> {
        let msg = Message::new(
            message_type,
            request.header.channel_id,
            request.header.sequence_number,
            payload,
        );
        self.write_message(&msg).await
    }

    /// Pump one inbound message: complete a matching pending operation,
    /// echo `PONG` for an inbound `PING` (spec.md §4.7 liveness contract),
    /// or fan it out as a `ProtocolEvent::Message` for the caller's own
    /// dispatch loop to handle (e.g. an inbound `METHOD_CALL` needing a
    /// `reply()`).
    pub async fn poll_once(&mut self) -> IncResult<()> {
        let inbound = self.read_one_message().await?;
        match inbound.header.message_type {
            MessageType::MethodReply | MessageType::SubscribeAck | MessageType::UnsubscribeAck => {
                if let Some((_, op)) = self.pending.remove(&inbound.header.sequence_number) {
                    op.complete(inbound);
                } else {
                    warn!(
                        sequence = inbound.header.sequence_number,
                        "dropped unmatched reply"
                    );
                }
                Ok(())
            }
            MessageType::Ping => {
                let pong = Message::new(
                    MessageType::Pong,
                    inbound.header.channel_id,
                    inbound.header.sequence_number,
                    vec![],
                );
                self.write_message(&pong).await
            }
            _ => {
                self.dispatch_unmatched(inbound);
                Ok(())
            }
        }
    }

    async fn write_message(&mut self, msg: &Message) -> IncResult<()> {
        self.sender.enqueue(msg);
        while let Some(chunk) = self.sender.next_chunk() {
            let chunk = chunk.to_vec();
            self.transport.write_all(&chunk).await?;
            self.sender.advance(chunk.len());
        }
        Ok(())
    }

    /// Read and return the next complete message, pumping the transport
    /// until the framing state machine has one ready.
    async fn read_one_message(&mut self) -> IncResult<Message> {
        loop {
            match self.receiver.poll()? {
                PollOutcome::MessageReady(msg) => return Ok(msg),
                PollOutcome::NeedMoreData => {
                    let n = self.transport.read(&mut self.read_buf).await?;
                    self.receiver.push_bytes(&self.read_buf[..n]);
                }
            }
        }
    }

    fn dispatch_unmatched(&self, msg: Message) {
        match msg.header.message_type {
            MessageType::Ping => {
                trace!("received ping, pong handling left to caller's event loop");
            }
            MessageType::Pong => {}
            _ => {
                if self.events.send(ProtocolEvent::Message(msg)).is_err() {
                    warn!("dropped inbound message: no event subscribers");
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
