//! Message (C5) — the 24-byte fixed header every INC frame carries.
//!
//! Field layout and magic are taken directly from `iincmessage.h`'s
//! `iINCMessageHeader` struct and `iINCMessageType`/`iINCMessageFlags`
//! enums; the struct-of-atomics encode/decode style follows the teacher's
//! `manager::protocol::ProtocolMessage`.

use crate::error::{IncError, IncResult};

/// `"INC\0"` as a big-endian u32, the first four header bytes on the wire.
pub const MAGIC: u32 = 0x494E_4300;

/// Size in bytes of the fixed header.
pub const HEADER_LEN: usize = 24;

/// Message type codes, per `iINCMessageType` in `iincmessage.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Invalid = 0,
    Handshake = 1,
    HandshakeAck = 2,
    Auth = 3,
    AuthAck = 4,
    MethodCall = 10,
    MethodReply = 11,
    Event = 20,
    Subscribe = 21,
    Unsubscribe = 22,
    SubscribeAck = 23,
    UnsubscribeAck = 24,
    StreamOpen = 30,
    StreamClose = 31,
    StreamData = 32,
    BinaryData = 33,
    MemfdAttach = 34,
    Ping = 40,
    Pong = 41,
}

impl MessageType {
    pub fn from_u16(v: u16) -> IncResult<Self> {
        Ok(match v {
            0 => MessageType::Invalid,
            1 => MessageType::Handshake,
            2 => MessageType::HandshakeAck,
            3 => MessageType::Auth,
            4 => MessageType::AuthAck,
            10 => MessageType::MethodCall,
            11 => MessageType::MethodReply,
            20 => MessageType::Event,
            21 => MessageType::Subscribe,
            22 => MessageType::Unsubscribe,
            23 => MessageType::SubscribeAck,
            24 => MessageType::UnsubscribeAck,
            30 => MessageType::StreamOpen,
            31 => MessageType::StreamClose,
            32 => MessageType::StreamData,
            33 => MessageType::BinaryData,
            34 => MessageType::MemfdAttach,
            40 => MessageType::Ping,
            41 => MessageType::Pong,
            other => {
                return Err(IncError::TypeMismatch {
                    expected: "known MessageType",
                    found: (other & 0xff) as u8,
                })
            }
        })
    }
}

bitflags::bitflags! {
    /// Header flag bits, per `iINCMessageFlags`. Reserved bits beyond
    /// `COMPRESSED` are kept for forward compatibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u32 {
        /// Payload is not a TagStruct but a packed `{id,offset,length}`
        /// referencing a previously-attached SHM block.
        const SHM_DATA = 1 << 0;
        /// Payload bytes are compressed (unsupported — see SPEC_FULL.md §9).
        const COMPRESSED = 1 << 1;
    }
}

/// The 24-byte fixed header preceding every message's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub protocol_version: u16,
    pub payload_version: u16,
    pub payload_length: u32,
    pub message_type: MessageType,
    pub channel_id: u16,
    pub sequence_number: u32,
    pub flags: MessageFlags,
}

impl MessageHeader {
    pub fn new(
        message_type: MessageType,
        channel_id: u16,
        sequence_number: u32,
        payload_length: u32,
    ) -> Self {
        MessageHeader {
            protocol_version: 1,
            payload_version: 1,
            payload_length,
            message_type,
            channel_id,
            sequence_number,
            flags: MessageFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Encode into the wire's big-endian 24-byte layout:
    /// magic(4) | protocol_version(2) | payload_version(2) | payload_length(4)
    /// | type(2) | channel_id(2) | sequence_number(4) | flags(4)
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        out[4..6].copy_from_slice(&self.protocol_version.to_be_bytes());
        out[6..8].copy_from_slice(&self.payload_version.to_be_bytes());
        out[8..12].copy_from_slice(&self.payload_length.to_be_bytes());
        out[12..14].copy_from_slice(&(self.message_type as u16).to_be_bytes());
        out[14..16].copy_from_slice(&self.channel_id.to_be_bytes());
        out[16..20].copy_from_slice(&self.sequence_number.to_be_bytes());
        out[20..24].copy_from_slice(&self.flags.bits().to_be_bytes());
        out
    }

    /// Decode a 24-byte big-endian header, validating the magic number.
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> IncResult<Self> {
        let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(IncError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }
        let protocol_version = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
        let payload_version = u16::from_be_bytes(bytes[6..8].try_into().unwrap());
        let payload_length = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let type_raw = u16::from_be_bytes(bytes[12..14].try_into().unwrap());
        let channel_id = u16::from_be_bytes(bytes[14..16].try_into().unwrap());
        let sequence_number = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let flags_raw = u32::from_be_bytes(bytes[20..24].try_into().unwrap());

        let message_type = MessageType::from_u16(type_raw)?;
        if message_type == MessageType::Invalid {
            return Err(IncError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }
        let flags = MessageFlags::from_bits_truncate(flags_raw);

        Ok(MessageHeader {
            protocol_version,
            payload_version,
            payload_length,
            message_type,
            channel_id,
            sequence_number,
            flags,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.message_type != MessageType::Invalid
    }
}

/// A full message: header plus its payload bytes (a TagStruct encoding,
/// unless `flags` has `SHM_DATA` set, in which case the payload is a
/// packed `{id:u32, offset:u64, length:u64}` SHM reference).
#[derive(Debug, Clone)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        message_type: MessageType,
        channel_id: u16,
        sequence_number: u32,
        payload: Vec<u8>,
    ) -> Self {
        let header = MessageHeader::new(
            message_type,
            channel_id,
            sequence_number,
            payload.len() as u32,
        );
        Message { header, payload }
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Full wire bytes: header followed by payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Pack a `{id, offset, length}` SHM reference as this message's
    /// payload, with `SHM_DATA` set — the 20-byte body spec.md §8's SHM
    /// fast-path scenario describes.
    pub fn new_shm_ref(
        message_type: MessageType,
        channel_id: u16,
        sequence_number: u32,
        id: u32,
        offset: u64,
        length: u64,
    ) -> Self {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&offset.to_be_bytes());
        payload.extend_from_slice(&length.to_be_bytes());
        Message::new(message_type, channel_id, sequence_number, payload)
            .with_flags(MessageFlags::SHM_DATA)
    }

    /// Decode this message's payload as a `{id, offset, length}` SHM
    /// reference. Caller must check `header.flags.contains(SHM_DATA)` first.
    pub fn shm_ref(&self) -> IncResult<(u32, u64, u64)> {
        if self.payload.len() != 20 {
            return Err(IncError::Truncated {
                expected: 20,
                available: self.payload.len(),
            });
        }
        let id = u32::from_be_bytes(self.payload[0..4].try_into().unwrap());
        let offset = u64::from_be_bytes(self.payload[4..12].try_into().unwrap());
        let length = u64::from_be_bytes(self.payload[12..20].try_into().unwrap());
        Ok((id, offset, length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips_through_bytes() {
        let header = MessageHeader::new(MessageType::MethodCall, 7, 42, 10)
            .with_flags(MessageFlags::SHM_DATA);
        let bytes = header.to_bytes();
        let decoded = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn matches_spec_example_header_bytes() {
        let header = MessageHeader::new(MessageType::MethodCall, 7, 0x1234_5678, 0);
        let bytes = header.to_bytes();
        let expected: [u8; HEADER_LEN] = [
            0x49, 0x4E, 0x43, 0x00, // magic
            0x00, 0x01, // protocol_version
            0x00, 0x01, // payload_version
            0x00, 0x00, 0x00, 0x00, // payload_length
            0x00, 0x0A, // type = METHOD_CALL (10)
            0x00, 0x07, // channel_id
            0x12, 0x34, 0x56, 0x78, // sequence_number
            0x00, 0x00, 0x00, 0x00, // flags
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = MessageHeader::new(MessageType::Ping, 0, 0, 0).to_bytes();
        bytes[0] = 0;
        assert!(matches!(
            MessageHeader::from_bytes(&bytes),
            Err(IncError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_invalid_type() {
        let mut bytes = MessageHeader::new(MessageType::Ping, 0, 0, 0).to_bytes();
        bytes[12..14].copy_from_slice(&0u16.to_be_bytes());
        assert!(matches!(
            MessageHeader::from_bytes(&bytes),
            Err(IncError::BadMagic { .. })
        ));
    }

    #[test]
    fn message_to_bytes_includes_header_and_payload() {
        let msg = Message::new(MessageType::Event, 3, 9, vec![1, 2, 3]);
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        assert_eq!(&bytes[HEADER_LEN..], &[1, 2, 3]);
    }

    #[test]
    fn shm_ref_payload_is_20_bytes_and_roundtrips() {
        let msg = Message::new_shm_ref(MessageType::BinaryData, 1, 1, 99, 0, 1_048_576);
        assert_eq!(msg.payload.len(), 20);
        assert!(msg.header.flags.contains(MessageFlags::SHM_DATA));
        assert_eq!(msg.shm_ref().unwrap(), (99, 0, 1_048_576));
    }

    proptest::proptest! {
        #[test]
        fn header_roundtrips_for_any_field_combination(
            channel_id: u16,
            sequence_number: u32,
            payload_length: u32,
            flags_bits in 0u32..4,
        ) {
            let header = MessageHeader::new(MessageType::Event, channel_id, sequence_number, payload_length)
                .with_flags(MessageFlags::from_bits_truncate(flags_bits));
            let decoded = MessageHeader::from_bytes(&header.to_bytes()).unwrap();
            prop_assert_eq!(decoded, header);
        }
    }
}
