//! # Packet Header
//!
//! Fixed-size header preceding every payload. Two layouts exist in the field
//! and a deployment speaks exactly one of them:
//!
//! ```text
//! Embedded (version 12, little-endian, 144 bytes)
//!   0  magic         i64
//!   8  command       u32
//!  12  payload_type  u32
//!  16  payload_len   u32
//!  20  session_token [u8; 32]
//!  52  reserved      u32
//!  56  nonce         i64
//!  64  digest        [u8; 64]   first 32 bytes meaningful, rest zero
//! 128  iv            [u8; 12]
//! 140  reserved      u32
//!
//! Trailing (version 13, big-endian, 80 bytes)
//!   0  magic         i64
//!   8  command       i32
//!  12  payload_type  i32
//!  16  payload_len   u32
//!  20  session_token [u8; 32]
//!  52  nonce         u64
//!  60  iv            [u8; 12]
//!  72  reserved      [u8; 8]
//!  -- 32-byte HMAC follows the payload
//! ```
//!
//! `payload_len` always counts the bytes actually on the wire after the header
//! (ciphertext plus tag when encrypted), never the plaintext length.

use crate::config::{MAGIC_VALUE_BASE, MAX_PAYLOAD_SIZE};
use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::core::serialization::PayloadType;

/// Session token length, which is also the AES-256 / HMAC key length
pub const SESSION_TOKEN_LEN: usize = 32;

/// AES-GCM nonce length
pub const IV_LEN: usize = 12;

/// Meaningful bytes of an HMAC-SHA256 digest
pub const DIGEST_LEN: usize = 32;

/// Width of the digest field reserved inside the embedded header
pub const DIGEST_FIELD_LEN: usize = 64;

const EMBEDDED_DIGEST_OFFSET: usize = 64;

/// Commands understood by the bot socket service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    WriteMsgToChatId = 1,
    CtrlSpamBlock = 2,
    ObserveChatId = 3,
    SendFileToChatId = 4,
    ObserveAllChats = 5,
    GetUptime = 6,
    TransferFile = 7,
    TransferFileRequest = 8,
    GetUptimeCallback = 100,
    GenericAck = 101,
    OpenSession = 102,
    OpenSessionAck = 103,
    CloseSession = 104,
}

impl Command {
    /// Numeric id written into the header
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Look up a command by its wire id
    pub fn from_id(id: u32) -> Result<Self> {
        Ok(match id {
            1 => Command::WriteMsgToChatId,
            2 => Command::CtrlSpamBlock,
            3 => Command::ObserveChatId,
            4 => Command::SendFileToChatId,
            5 => Command::ObserveAllChats,
            6 => Command::GetUptime,
            7 => Command::TransferFile,
            8 => Command::TransferFileRequest,
            100 => Command::GetUptimeCallback,
            101 => Command::GenericAck,
            102 => Command::OpenSession,
            103 => Command::OpenSessionAck,
            104 => Command::CloseSession,
            other => {
                return Err(ProtocolError::InvalidEnum {
                    field: "command",
                    value: other as i64,
                })
            }
        })
    }

    /// Name as it appears in server logs
    pub fn name(self) -> &'static str {
        match self {
            Command::WriteMsgToChatId => "CMD_WRITE_MSG_TO_CHAT_ID",
            Command::CtrlSpamBlock => "CMD_CTRL_SPAMBLOCK",
            Command::ObserveChatId => "CMD_OBSERVE_CHAT_ID",
            Command::SendFileToChatId => "CMD_SEND_FILE_TO_CHAT_ID",
            Command::ObserveAllChats => "CMD_OBSERVE_ALL_CHATS",
            Command::GetUptime => "CMD_GET_UPTIME",
            Command::TransferFile => "CMD_TRANSFER_FILE",
            Command::TransferFileRequest => "CMD_TRANSFER_FILE_REQUEST",
            Command::GetUptimeCallback => "CMD_GET_UPTIME_CALLBACK",
            Command::GenericAck => "CMD_GENERIC_ACK",
            Command::OpenSession => "CMD_OPEN_SESSION",
            Command::OpenSessionAck => "CMD_OPEN_SESSION_ACK",
            Command::CloseSession => "CMD_CLOSE_SESSION",
        }
    }
}

impl TryFrom<u32> for Command {
    type Error = ProtocolError;

    fn try_from(id: u32) -> Result<Self> {
        Command::from_id(id)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header layout variant spoken by a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireLayout {
    /// Version 12: digest embedded in the header, little-endian
    #[default]
    Embedded,
    /// Version 13: digest trails the payload, big-endian
    Trailing,
}

impl WireLayout {
    /// Protocol version folded into the magic value
    pub const fn version(self) -> i64 {
        match self {
            WireLayout::Embedded => 12,
            WireLayout::Trailing => 13,
        }
    }

    /// Magic value both sides must agree on
    pub const fn magic(self) -> i64 {
        MAGIC_VALUE_BASE + self.version()
    }

    /// Serialized header size in bytes
    pub const fn header_size(self) -> usize {
        match self {
            WireLayout::Embedded => 144,
            WireLayout::Trailing => 80,
        }
    }

    /// Bytes of digest that follow the payload on the wire
    pub const fn trailing_digest_len(self) -> usize {
        match self {
            WireLayout::Embedded => 0,
            WireLayout::Trailing => DIGEST_LEN,
        }
    }
}

impl fmt::Display for WireLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireLayout::Embedded => write!(f, "embedded(v{})", self.version()),
            WireLayout::Trailing => write!(f, "trailing(v{})", self.version()),
        }
    }
}

/// 64-byte digest slot of the embedded layout; only the first 32 bytes carry
/// the HMAC, the remainder stays zero.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DigestField {
    bytes: [u8; DIGEST_FIELD_LEN],
}

impl DigestField {
    /// All-zero field, used when no session key is present
    pub const fn zero() -> Self {
        Self {
            bytes: [0u8; DIGEST_FIELD_LEN],
        }
    }

    /// Place a 32-byte digest in the meaningful half
    pub fn from_digest(digest: &[u8; DIGEST_LEN]) -> Self {
        let mut field = Self::zero();
        field.bytes[..DIGEST_LEN].copy_from_slice(digest);
        field
    }

    /// Meaningful 32 bytes
    pub fn digest(&self) -> &[u8] {
        &self.bytes[..DIGEST_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_FIELD_LEN] {
        &self.bytes
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Whether the unused upper half is still zero
    pub fn reserved_is_zero(&self) -> bool {
        self.bytes[DIGEST_LEN..].iter().all(|&b| b == 0)
    }
}

impl Default for DigestField {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for DigestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestField(")?;
        for b in self.digest() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Parsed or to-be-serialized packet header
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub layout: WireLayout,
    pub command: Command,
    pub payload_type: PayloadType,
    pub payload_length: u32,
    /// All-zero when no session is active
    pub session_token: [u8; SESSION_TOKEN_LEN],
    pub nonce: i64,
    /// Embedded layout only; trailing packets keep this zero
    pub digest: DigestField,
    pub iv: [u8; IV_LEN],
    /// Exact bytes this header was decoded from, if any
    raw: Option<Vec<u8>>,
}

impl Header {
    /// Header with zeroed token, digest and iv
    pub fn new(layout: WireLayout, command: Command, payload_type: PayloadType) -> Self {
        Self {
            layout,
            command,
            payload_type,
            payload_length: 0,
            session_token: [0u8; SESSION_TOKEN_LEN],
            nonce: 0,
            digest: DigestField::zero(),
            iv: [0u8; IV_LEN],
            raw: None,
        }
    }

    /// Whether the packet carries a session token
    pub fn has_session(&self) -> bool {
        self.session_token.iter().any(|&b| b != 0)
    }

    /// Serialize per the header's layout
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self.layout.header_size();
        let mut buf = BytesMut::with_capacity(size);

        match self.layout {
            WireLayout::Embedded => {
                buf.put_i64_le(self.layout.magic());
                buf.put_u32_le(self.command.id());
                buf.put_u32_le(self.payload_type.wire_value());
                buf.put_u32_le(self.payload_length);
                buf.put_slice(&self.session_token);
                buf.put_u32_le(0);
                buf.put_i64_le(self.nonce);
                buf.put_slice(self.digest.as_bytes());
                buf.put_slice(&self.iv);
                buf.put_u32_le(0);
            }
            WireLayout::Trailing => {
                buf.put_i64(self.layout.magic());
                buf.put_i32(self.command.id() as i32);
                buf.put_i32(self.payload_type.wire_value() as i32);
                buf.put_u32(self.payload_length);
                buf.put_slice(&self.session_token);
                buf.put_u64(self.nonce as u64);
                buf.put_slice(&self.iv);
                buf.put_bytes(0, 8);
            }
        }

        if buf.len() != size {
            return Err(ProtocolError::MalformedHeader(
                constants::ERR_HEADER_SIZE_DRIFT,
            ));
        }
        Ok(buf.to_vec())
    }

    /// Parse the first `layout.header_size()` bytes of `data`.
    ///
    /// The magic value is checked before any other field is interpreted.
    pub fn decode(layout: WireLayout, data: &[u8]) -> Result<Self> {
        let size = layout.header_size();
        if data.len() < size {
            return Err(ProtocolError::MalformedHeader(
                constants::ERR_TRUNCATED_HEADER,
            ));
        }
        let raw = &data[..size];
        let mut buf = raw;

        let header = match layout {
            WireLayout::Embedded => {
                if buf.get_i64_le() != layout.magic() {
                    return Err(ProtocolError::MalformedHeader(constants::ERR_BAD_MAGIC));
                }
                let command = Command::from_id(buf.get_u32_le())?;
                let payload_type = PayloadType::from_wire(buf.get_u32_le())?;
                let payload_length = buf.get_u32_le();
                let mut session_token = [0u8; SESSION_TOKEN_LEN];
                buf.copy_to_slice(&mut session_token);
                let _reserved = buf.get_u32_le();
                let nonce = buf.get_i64_le();
                let mut digest = DigestField::zero();
                buf.copy_to_slice(&mut digest.bytes);
                let mut iv = [0u8; IV_LEN];
                buf.copy_to_slice(&mut iv);

                Header {
                    layout,
                    command,
                    payload_type,
                    payload_length,
                    session_token,
                    nonce,
                    digest,
                    iv,
                    raw: Some(raw.to_vec()),
                }
            }
            WireLayout::Trailing => {
                if buf.get_i64() != layout.magic() {
                    return Err(ProtocolError::MalformedHeader(constants::ERR_BAD_MAGIC));
                }
                let command = Command::from_id(buf.get_i32() as u32)?;
                let payload_type = PayloadType::from_wire(buf.get_i32() as u32)?;
                let payload_length = buf.get_u32();
                let mut session_token = [0u8; SESSION_TOKEN_LEN];
                buf.copy_to_slice(&mut session_token);
                let nonce = buf.get_u64() as i64;
                let mut iv = [0u8; IV_LEN];
                buf.copy_to_slice(&mut iv);

                Header {
                    layout,
                    command,
                    payload_type,
                    payload_length,
                    session_token,
                    nonce,
                    digest: DigestField::zero(),
                    iv,
                    raw: Some(raw.to_vec()),
                }
            }
        };

        if header.payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(header.payload_length as usize));
        }

        Ok(header)
    }

    /// Header bytes covered by the HMAC.
    ///
    /// Embedded headers exclude their own digest field; trailing headers are
    /// covered whole. Decoded headers authenticate the bytes that arrived.
    pub fn authenticated_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = match &self.raw {
            Some(raw) => raw.clone(),
            None => self.encode()?,
        };
        if self.layout == WireLayout::Embedded {
            bytes.drain(EMBEDDED_DIGEST_OFFSET..EMBEDDED_DIGEST_OFFSET + DIGEST_FIELD_LEN);
        }
        Ok(bytes)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("layout", &self.layout)
            .field("command", &self.command)
            .field("payload_type", &self.payload_type)
            .field("payload_length", &self.payload_length)
            .field("has_session", &self.has_session())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Serialize a default header in every layout and compare against the
/// declared sizes. Run once before any packet is built.
pub fn verify_layouts() -> Result<()> {
    for layout in [WireLayout::Embedded, WireLayout::Trailing] {
        let encoded = Header::new(layout, Command::OpenSession, PayloadType::Binary).encode()?;
        if encoded.len() != layout.header_size() {
            return Err(ProtocolError::MalformedHeader(
                constants::ERR_HEADER_SIZE_DRIFT,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn sample(layout: WireLayout) -> Header {
        let mut header = Header::new(layout, Command::WriteMsgToChatId, PayloadType::Json);
        header.payload_length = 280;
        header.session_token = [0xAB; SESSION_TOKEN_LEN];
        header.nonce = 1_700_000_000_123;
        header.iv = [7; IV_LEN];
        if layout == WireLayout::Embedded {
            header.digest = DigestField::from_digest(&[0x11; DIGEST_LEN]);
        }
        header
    }

    #[test]
    fn test_layout_sizes() {
        verify_layouts().unwrap();
        assert_eq!(WireLayout::Embedded.header_size(), 144);
        assert_eq!(WireLayout::Trailing.header_size(), 80);
    }

    #[test]
    fn test_magic_includes_version() {
        assert_eq!(WireLayout::Embedded.magic(), 0xDEAD_FACE + 12);
        assert_eq!(WireLayout::Trailing.magic(), 0xDEAD_FACE + 13);
    }

    #[test]
    fn test_embedded_field_offsets() {
        let bytes = sample(WireLayout::Embedded).encode().unwrap();
        assert_eq!(bytes.len(), 144);
        assert_eq!(&bytes[0..8], &(0xDEAD_FACEi64 + 12).to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &280u32.to_le_bytes());
        assert_eq!(&bytes[20..52], &[0xAB; 32]);
        assert_eq!(&bytes[56..64], &1_700_000_000_123i64.to_le_bytes());
        assert_eq!(&bytes[64..96], &[0x11; 32]);
        assert_eq!(&bytes[96..128], &[0u8; 32]);
        assert_eq!(&bytes[128..140], &[7; 12]);
    }

    #[test]
    fn test_trailing_is_big_endian() {
        let bytes = sample(WireLayout::Trailing).encode().unwrap();
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[0..8], &(0xDEAD_FACEi64 + 13).to_be_bytes());
        assert_eq!(&bytes[16..20], &280u32.to_be_bytes());
        assert_eq!(&bytes[60..72], &[7; 12]);
        assert_eq!(&bytes[72..80], &[0u8; 8]);
    }

    #[test]
    fn test_decode_recovers_fields() {
        for layout in [WireLayout::Embedded, WireLayout::Trailing] {
            let original = sample(layout);
            let decoded = Header::decode(layout, &original.encode().unwrap()).unwrap();
            assert_eq!(decoded.command, original.command);
            assert_eq!(decoded.payload_type, original.payload_type);
            assert_eq!(decoded.payload_length, original.payload_length);
            assert_eq!(decoded.session_token, original.session_token);
            assert_eq!(decoded.nonce, original.nonce);
            assert_eq!(decoded.digest, original.digest);
            assert_eq!(decoded.iv, original.iv);
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample(WireLayout::Embedded).encode().unwrap();
        bytes[0] ^= 0xFF;
        let result = Header::decode(WireLayout::Embedded, &bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_layouts_do_not_cross_decode() {
        let bytes = sample(WireLayout::Embedded).encode().unwrap();
        let result = Header::decode(WireLayout::Trailing, &bytes);
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(_))));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample(WireLayout::Trailing).encode().unwrap();
        let result = Header::decode(WireLayout::Trailing, &bytes[..79]);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedHeader(constants::ERR_TRUNCATED_HEADER))
        ));
    }

    #[test]
    fn test_unknown_command_id() {
        let mut bytes = sample(WireLayout::Embedded).encode().unwrap();
        bytes[8..12].copy_from_slice(&9999u32.to_le_bytes());
        let result = Header::decode(WireLayout::Embedded, &bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidEnum {
                field: "command",
                value: 9999
            })
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut header = sample(WireLayout::Embedded);
        header.payload_length = (MAX_PAYLOAD_SIZE + 1) as u32;
        let result = Header::decode(WireLayout::Embedded, &header.encode().unwrap());
        assert!(matches!(result, Err(ProtocolError::OversizedPacket(_))));
    }

    #[test]
    fn test_authenticated_bytes_skip_embedded_digest() {
        let header = sample(WireLayout::Embedded);
        let covered = header.authenticated_bytes().unwrap();
        assert_eq!(covered.len(), 144 - DIGEST_FIELD_LEN);

        let trailing = sample(WireLayout::Trailing);
        assert_eq!(trailing.authenticated_bytes().unwrap().len(), 80);
    }

    #[test]
    fn test_command_ids() {
        for id in [1u32, 2, 3, 4, 5, 6, 7, 8, 100, 101, 102, 103, 104] {
            assert_eq!(Command::try_from(id).unwrap().id(), id);
        }
        assert_eq!(Command::OpenSession.to_string(), "CMD_OPEN_SESSION");
    }
}
