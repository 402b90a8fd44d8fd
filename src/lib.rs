//! INC — an asynchronous, multiplexed request/response and pub/sub
//! transport over length-prefixed framed messages, with a shared-memory
//! fast path for large payloads.
//!
//! # Architecture
//!
//! - [`buffer`] — `ByteBuffer`, the reference-counted, copy-on-write byte
//!   container every other layer passes around instead of raw `Vec<u8>`.
//! - [`shm`] — `SharedMemoryBlock`, anonymous OS-backed memory regions for
//!   the shared-memory fast path.
//! - [`codec`] — stateless and stateful UTF-8 ⇄ UTF-16 conversion.
//! - [`tagstruct`] — the self-describing tagged key/value wire payload.
//! - [`message`] — the 24-byte fixed header and full wire message.
//! - [`framing`] — byte-stream reassembly into messages, and back.
//! - [`protocol`] — the driver: handshake, pending-ops, send/recv, events.
//! - [`config`] — `ServerConfig`: version policy, encryption, resource caps.
//! - [`error`] — the crate's unified error type.
//!
//! # Quick start
//!
//! ```no_run
//! use inc_transport::config::ServerConfig;
//! use inc_transport::protocol::{IoTransport, Protocol, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let (a, _b) = tokio::io::duplex(4096);
//!     let (r, w) = tokio::io::split(a);
//!     let mut protocol = Protocol::new(IoTransport::new(r, w), config, 1, Role::Client);
//!     protocol.handshake().await?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod framing;
pub mod message;
pub mod protocol;
pub mod shm;
pub mod tagstruct;

pub use buffer::ByteBuffer;
pub use config::{EncryptionRequirement, ServerConfig, VersionPolicy};
pub use error::{ErrorContext, IncError, IncResult};
pub use message::{Message, MessageFlags, MessageHeader, MessageType};
pub use protocol::{Protocol, ProtocolEvent, Role, Transport};
pub use shm::SharedMemoryBlock;
