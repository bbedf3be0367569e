//! # Message Schemas
//!
//! One fixed-shape record per command, plus the JSON objects used in text mode.
//!
//! Binary records are packed little-endian structs whose sizes are checked at
//! compile time. Text fields have a fixed capacity; an oversized value is
//! truncated to `capacity - 1` bytes (leaving room for the terminator the
//! server expects) and zero-padded, with a warning.
//!
//! | Record              | Size | Layout                                               |
//! |---------------------|------|------------------------------------------------------|
//! | `WriteMsgToChatId`  | 264  | chat i64, message [256]                              |
//! | `ObserveChatId`     | 16   | chat i64, observe u8, pad [7]                        |
//! | `SendFileToChatId`  | 272  | chat i64, file_type u32, pad u32, path [256]         |
//! | `ObserveAllChats`   | 8    | observe u8, pad [7]                                  |
//! | `CtrlSpamBlock`     | 4    | mode u32                                             |
//! | `TransferFile`      | 552  | dest [256], src [256], sha256 [32], 3 flags, pad [5] |
//! | `GenericAck`        | 264  | result u32, pad u32, error_msg [256]                 |
//! | `UptimeCallback`    | 24   | uptime [24]                                          |

use crate::config::{MAX_MSG_SIZE, MAX_PATH_SIZE};
use crate::core::serialization::{FromWirePayload, WirePayload};
use crate::core::header::PayloadType;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::warn;

/// Capacity of the uptime text field
pub const UPTIME_STR_SIZE: usize = 24;

/// SHA-256 digest length carried in transfer descriptors
pub const SHA256_LEN: usize = 32;

/// Fixed-width little-endian record
pub trait BinaryRecord: Sized {
    /// Size on the wire
    const SIZE: usize;

    fn write_to(&self, buf: &mut BytesMut);

    /// Parse from the first `SIZE` bytes of `data`
    fn read_from(data: &[u8]) -> Result<Self>;

    fn to_record(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.write_to(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.to_vec()
    }
}

fn ensure_record(data: &[u8], size: usize, record: &'static str) -> Result<()> {
    if data.len() < size {
        return Err(ProtocolError::MalformedBody(format!(
            "{record} needs {size} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

/// Write `value` into a zero-padded field of `capacity` bytes.
///
/// Values longer than the field are cut to `capacity - 1` bytes.
pub fn put_fixed_str(buf: &mut BytesMut, value: &str, capacity: usize, field: &'static str) {
    let bytes = value.as_bytes();
    let kept = if bytes.len() > capacity {
        warn!(
            field,
            len = bytes.len(),
            capacity,
            "Text exceeds field capacity, truncating"
        );
        &bytes[..capacity - 1]
    } else {
        bytes
    };
    buf.put_slice(kept);
    buf.put_bytes(0, capacity - kept.len());
}

/// Read a zero-terminated text field
pub fn get_fixed_str(buf: &mut &[u8], capacity: usize) -> String {
    let field = &buf[..capacity];
    let end = field.iter().position(|&b| b == 0).unwrap_or(capacity);
    let text = String::from_utf8_lossy(&field[..end]).into_owned();
    buf.advance(capacity);
    text
}

/// Parse a chat id typed by a user
pub fn parse_chat_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| ProtocolError::Validation(format!("invalid chat id '{raw}': {e}")))
}

// ============================================================================
// Enumerations
// ============================================================================

/// Media kind for [`SendFileToChatId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Photo = 0,
    Video = 1,
    Gif = 2,
    Document = 3,
    Dice = 4,
    Sticker = 5,
}

impl FileType {
    pub fn wire_value(self) -> u32 {
        self as u32
    }

    pub fn from_wire(value: u32) -> Result<Self> {
        Ok(match value {
            0 => FileType::Photo,
            1 => FileType::Video,
            2 => FileType::Gif,
            3 => FileType::Document,
            4 => FileType::Dice,
            5 => FileType::Sticker,
            other => {
                return Err(ProtocolError::InvalidEnum {
                    field: "file_type",
                    value: other as i64,
                })
            }
        })
    }
}

/// Spam filter mode for [`CtrlSpamBlock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpamBlockMode {
    Off = 0,
    LoggingOnly = 1,
    Purge = 2,
    PurgeAndMute = 3,
}

impl SpamBlockMode {
    pub fn wire_value(self) -> u32 {
        self as u32
    }

    pub fn from_wire(value: u32) -> Result<Self> {
        Ok(match value {
            0 => SpamBlockMode::Off,
            1 => SpamBlockMode::LoggingOnly,
            2 => SpamBlockMode::Purge,
            3 => SpamBlockMode::PurgeAndMute,
            other => {
                return Err(ProtocolError::InvalidEnum {
                    field: "spamblock_mode",
                    value: other as i64,
                })
            }
        })
    }
}

/// Result code of a [`GenericAck`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckType {
    Success = 0,
    TgApiException = 1,
    InvalidArgument = 2,
    CommandIgnored = 3,
    RuntimeError = 4,
    ClientError = 5,
}

impl AckType {
    pub fn wire_value(self) -> u32 {
        self as u32
    }

    pub fn from_wire(value: u32) -> Result<Self> {
        Ok(match value {
            0 => AckType::Success,
            1 => AckType::TgApiException,
            2 => AckType::InvalidArgument,
            3 => AckType::CommandIgnored,
            4 => AckType::RuntimeError,
            5 => AckType::ClientError,
            other => {
                return Err(ProtocolError::InvalidEnum {
                    field: "ack_type",
                    value: other as i64,
                })
            }
        })
    }

    /// Map the `error_type` string of a JSON acknowledgement
    pub fn from_json_name(name: &str) -> Result<Self> {
        Ok(match name {
            "TGAPI_EXCEPTION" => AckType::TgApiException,
            "INVALID_ARGUMENT" => AckType::InvalidArgument,
            "COMMAND_IGNORED" => AckType::CommandIgnored,
            "RUNTIME_ERROR" => AckType::RuntimeError,
            "CLIENT_ERROR" => AckType::ClientError,
            other => {
                return Err(ProtocolError::MalformedBody(format!(
                    "unknown error_type '{other}'"
                )))
            }
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AckType::Success => "SUCCESS",
            AckType::TgApiException => "ERROR_TGAPI_EXCEPTION",
            AckType::InvalidArgument => "ERROR_INVALID_ARGUMENT",
            AckType::CommandIgnored => "ERROR_COMMAND_IGNORED",
            AckType::RuntimeError => "ERROR_RUNTIME_ERROR",
            AckType::ClientError => "ERROR_CLIENT_ERROR",
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// CMD_WRITE_MSG_TO_CHAT_ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMsgToChatId {
    pub chat: i64,
    pub message: String,
}

impl BinaryRecord for WriteMsgToChatId {
    const SIZE: usize = 264;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.chat);
        put_fixed_str(buf, &self.message, MAX_MSG_SIZE, "message");
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "WriteMsgToChatId")?;
        let mut buf = data;
        let chat = buf.get_i64_le();
        let message = get_fixed_str(&mut buf, MAX_MSG_SIZE);
        Ok(Self { chat, message })
    }
}

const _: () = assert!(WriteMsgToChatId::SIZE == 8 + MAX_MSG_SIZE);

impl WirePayload for WriteMsgToChatId {
    fn to_binary(&self) -> Vec<u8> {
        self.to_record()
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&json!({
            "chat": self.chat,
            "message": self.message,
        }))?)
    }
}

/// CMD_OBSERVE_CHAT_ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveChatId {
    pub chat: i64,
    pub observe: bool,
}

impl BinaryRecord for ObserveChatId {
    const SIZE: usize = 16;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.chat);
        buf.put_u8(self.observe as u8);
        buf.put_bytes(0, 7);
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "ObserveChatId")?;
        let mut buf = data;
        let chat = buf.get_i64_le();
        let observe = buf.get_u8() != 0;
        Ok(Self { chat, observe })
    }
}

const _: () = assert!(ObserveChatId::SIZE == 8 + 1 + 7);

impl WirePayload for ObserveChatId {
    fn to_binary(&self) -> Vec<u8> {
        self.to_record()
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&json!({
            "chat": self.chat,
            "observe": self.observe,
        }))?)
    }
}

/// CMD_SEND_FILE_TO_CHAT_ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFileToChatId {
    pub chat: i64,
    pub file_type: FileType,
    pub file_path: String,
}

impl BinaryRecord for SendFileToChatId {
    const SIZE: usize = 272;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.chat);
        buf.put_u32_le(self.file_type.wire_value());
        buf.put_u32_le(0);
        put_fixed_str(buf, &self.file_path, MAX_PATH_SIZE, "file_path");
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "SendFileToChatId")?;
        let mut buf = data;
        let chat = buf.get_i64_le();
        let file_type = FileType::from_wire(buf.get_u32_le())?;
        let _pad = buf.get_u32_le();
        let file_path = get_fixed_str(&mut buf, MAX_PATH_SIZE);
        Ok(Self {
            chat,
            file_type,
            file_path,
        })
    }
}

const _: () = assert!(SendFileToChatId::SIZE == 8 + 4 + 4 + MAX_PATH_SIZE);

impl WirePayload for SendFileToChatId {
    fn to_binary(&self) -> Vec<u8> {
        self.to_record()
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&json!({
            "chat": self.chat,
            "fileType": self.file_type.wire_value(),
            "filePath": self.file_path,
        }))?)
    }
}

/// CMD_OBSERVE_ALL_CHATS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveAllChats {
    pub observe: bool,
}

impl BinaryRecord for ObserveAllChats {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.observe as u8);
        buf.put_bytes(0, 7);
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "ObserveAllChats")?;
        Ok(Self {
            observe: data[0] != 0,
        })
    }
}

const _: () = assert!(ObserveAllChats::SIZE == 1 + 7);

impl WirePayload for ObserveAllChats {
    fn to_binary(&self) -> Vec<u8> {
        self.to_record()
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&json!({ "observe": self.observe }))?)
    }
}

/// CMD_CTRL_SPAMBLOCK. Binary only, and the one record exempt from alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlSpamBlock {
    pub mode: SpamBlockMode,
}

impl BinaryRecord for CtrlSpamBlock {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.mode.wire_value());
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "CtrlSpamBlock")?;
        let mut buf = data;
        Ok(Self {
            mode: SpamBlockMode::from_wire(buf.get_u32_le())?,
        })
    }
}

const _: () = assert!(CtrlSpamBlock::SIZE == 4);

/// Flags of a [`TransferFile`] descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferOptions {
    /// Replace an existing destination file
    pub overwrite: bool,
    /// Skip the receiver's hash comparison
    pub hash_ignore: bool,
    /// Validate only; no data follows and nothing is written
    pub dry_run: bool,
}

/// Descriptor for CMD_TRANSFER_FILE and CMD_TRANSFER_FILE_REQUEST.
///
/// On the wire it is optionally followed by the raw file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFile {
    pub dest_path: String,
    pub src_path: String,
    /// All-zero when not known
    pub sha256: [u8; SHA256_LEN],
    pub options: TransferOptions,
}

impl TransferFile {
    pub fn has_hash(&self) -> bool {
        self.sha256.iter().any(|&b| b != 0)
    }
}

impl BinaryRecord for TransferFile {
    const SIZE: usize = 552;

    fn write_to(&self, buf: &mut BytesMut) {
        put_fixed_str(buf, &self.dest_path, MAX_PATH_SIZE, "dest_path");
        put_fixed_str(buf, &self.src_path, MAX_PATH_SIZE, "src_path");
        buf.put_slice(&self.sha256);
        buf.put_u8(self.options.overwrite as u8);
        buf.put_u8(self.options.hash_ignore as u8);
        buf.put_u8(self.options.dry_run as u8);
        buf.put_u8(0);
        buf.put_u32_le(0);
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "TransferFile")?;
        let mut buf = data;
        let dest_path = get_fixed_str(&mut buf, MAX_PATH_SIZE);
        let src_path = get_fixed_str(&mut buf, MAX_PATH_SIZE);
        let mut sha256 = [0u8; SHA256_LEN];
        buf.copy_to_slice(&mut sha256);
        let options = TransferOptions {
            overwrite: buf.get_u8() != 0,
            hash_ignore: buf.get_u8() != 0,
            dry_run: buf.get_u8() != 0,
        };
        Ok(Self {
            dest_path,
            src_path,
            sha256,
            options,
        })
    }
}

const _: () = assert!(TransferFile::SIZE == 2 * MAX_PATH_SIZE + SHA256_LEN + 4 + 4);

// ============================================================================
// Responses
// ============================================================================

/// Binary form of CMD_GENERIC_ACK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryAck {
    pub result: u32,
    pub error_msg: String,
}

impl BinaryRecord for BinaryAck {
    const SIZE: usize = 264;

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.result);
        buf.put_u32_le(0);
        put_fixed_str(buf, &self.error_msg, MAX_MSG_SIZE, "error_msg");
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "GenericAck")?;
        let mut buf = data;
        let result = buf.get_u32_le();
        let _pad = buf.get_u32_le();
        let error_msg = get_fixed_str(&mut buf, MAX_MSG_SIZE);
        Ok(Self { result, error_msg })
    }
}

const _: () = assert!(BinaryAck::SIZE == 4 + 4 + MAX_MSG_SIZE);

/// JSON form of CMD_GENERIC_ACK
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JsonAck {
    pub result: bool,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

/// Acknowledgement as it arrived, keyed on the header's payload type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPayload {
    Binary(BinaryAck),
    Json(JsonAck),
}

impl AckPayload {
    pub fn parse(payload_type: PayloadType, data: &[u8]) -> Result<Self> {
        match payload_type {
            PayloadType::Binary => Ok(AckPayload::Binary(BinaryAck::read_from(data)?)),
            PayloadType::Json => Ok(AckPayload::Json(serde_json::from_slice(data)?)),
        }
    }
}

/// Outcome reported by the server for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericAck {
    pub result: AckType,
    pub error_msg: String,
}

impl GenericAck {
    pub fn success() -> Self {
        Self {
            result: AckType::Success,
            error_msg: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == AckType::Success
    }

    /// Turn a negative acknowledgement into [`ProtocolError::Rejected`]
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProtocolError::Rejected {
                ack: self.result.name().to_string(),
                message: self.error_msg,
            })
        }
    }
}

impl TryFrom<AckPayload> for GenericAck {
    type Error = ProtocolError;

    fn try_from(payload: AckPayload) -> Result<Self> {
        match payload {
            AckPayload::Binary(ack) => Ok(Self {
                result: AckType::from_wire(ack.result)?,
                error_msg: ack.error_msg,
            }),
            AckPayload::Json(ack) if ack.result => Ok(Self::success()),
            AckPayload::Json(ack) => {
                let result = match ack.error_type.as_deref() {
                    Some(name) => AckType::from_json_name(name)?,
                    None => AckType::RuntimeError,
                };
                Ok(Self {
                    result,
                    error_msg: ack.error_msg.unwrap_or_default(),
                })
            }
        }
    }
}

impl FromWirePayload for GenericAck {
    fn from_binary(data: &[u8]) -> Result<Self> {
        AckPayload::parse(PayloadType::Binary, data)?.try_into()
    }

    fn from_json(data: &[u8]) -> Result<Self> {
        AckPayload::parse(PayloadType::Json, data)?.try_into()
    }
}

/// CMD_GET_UPTIME_CALLBACK
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UptimeCallback {
    pub uptime: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub current_time: Option<String>,
}

impl BinaryRecord for UptimeCallback {
    const SIZE: usize = UPTIME_STR_SIZE;

    fn write_to(&self, buf: &mut BytesMut) {
        put_fixed_str(buf, &self.uptime, UPTIME_STR_SIZE, "uptime");
    }

    fn read_from(data: &[u8]) -> Result<Self> {
        ensure_record(data, Self::SIZE, "UptimeCallback")?;
        let mut buf = data;
        Ok(Self {
            uptime: get_fixed_str(&mut buf, UPTIME_STR_SIZE),
            start_time: None,
            current_time: None,
        })
    }
}

const _: () = assert!(UptimeCallback::SIZE == 24);

impl FromWirePayload for UptimeCallback {
    fn from_binary(data: &[u8]) -> Result<Self> {
        Self::read_from(data)
    }

    fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
