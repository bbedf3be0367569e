//! # Packet Sealing
//!
//! Builds complete wire packets and takes them apart again.
//!
//! ## Outbound (`pack`)
//! 1. Zero-pad binary payloads up to the requested record size
//! 2. Encrypt with AES-256-GCM when a key is present and the payload is non-empty
//! 3. Fill the header: length of what follows, token, nonce, fresh IV
//! 4. HMAC-SHA256 over header (digest slot excluded) ‖ body when a key is present
//! 5. Place the digest in the header slot or after the body, depending on layout
//!
//! ## Inbound (`unpack_header` then `unpack_body`)
//! Digest is verified before decryption. A packet with no session token must
//! carry an all-zero digest; its payload is returned as-is. The unused half of
//! the embedded digest slot must be zero.

use crate::config::{ALIGNMENT, MAX_PAYLOAD_SIZE};
use crate::core::header::{Command, DigestField, Header, PayloadType, WireLayout, DIGEST_LEN};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{self, SessionKey};
use crate::utils::time::packet_nonce;
use tracing::trace;

/// The one binary command whose record is not a multiple of [`ALIGNMENT`].
pub const ALIGNMENT_EXEMPT_COMMAND: Command = Command::CtrlSpamBlock;

/// What the caller decides about an outbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFields {
    pub layout: WireLayout,
    pub command: Command,
    pub payload_type: PayloadType,
}

impl PacketFields {
    pub fn new(layout: WireLayout, command: Command, payload_type: PayloadType) -> Self {
        Self {
            layout,
            command,
            payload_type,
        }
    }
}

/// Reject binary records whose length is not a multiple of [`ALIGNMENT`].
///
/// JSON payloads and [`ALIGNMENT_EXEMPT_COMMAND`] are never checked.
pub fn check_alignment(command: Command, payload_type: PayloadType, len: usize) -> Result<()> {
    if payload_type == PayloadType::Binary
        && command != ALIGNMENT_EXEMPT_COMMAND
        && len % ALIGNMENT != 0
    {
        return Err(ProtocolError::Validation(format!(
            "{command} binary payload of {len} bytes is not {ALIGNMENT}-byte aligned"
        )));
    }
    Ok(())
}

/// Build a complete packet ready to be written to the transport.
///
/// `pad_to` zero-extends a binary payload shorter than the record size; it has
/// no effect on JSON payloads or on payloads already at least that long.
pub fn pack(
    fields: PacketFields,
    payload: &[u8],
    key: Option<&SessionKey>,
    pad_to: Option<usize>,
) -> Result<Vec<u8>> {
    let mut plaintext = payload.to_vec();
    if let (PayloadType::Binary, Some(size)) = (fields.payload_type, pad_to) {
        if plaintext.len() < size {
            plaintext.resize(size, 0);
        }
    }

    let iv = crypto::random_iv()?;
    let body = match key {
        Some(key) if !plaintext.is_empty() => {
            let (mut ciphertext, tag) = crypto::encrypt(&plaintext, key, &iv)?;
            ciphertext.extend_from_slice(&tag);
            ciphertext
        }
        _ => plaintext,
    };

    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(body.len()));
    }

    let mut header = Header::new(fields.layout, fields.command, fields.payload_type);
    header.payload_length = body.len() as u32;
    header.nonce = packet_nonce()?;
    header.iv = iv;
    if let Some(key) = key {
        header.session_token = *key.as_bytes();
    }

    let digest = match key {
        Some(key) => crypto::hmac(
            &[header.authenticated_bytes()?.as_slice(), body.as_slice()],
            key,
        )?,
        None => [0u8; DIGEST_LEN],
    };

    let trailing = fields.layout.trailing_digest_len();
    if trailing == 0 {
        header.digest = DigestField::from_digest(&digest);
    }

    let header_bytes = header.encode()?;
    let mut packet = Vec::with_capacity(header_bytes.len() + body.len() + trailing);
    packet.extend_from_slice(&header_bytes);
    packet.extend_from_slice(&body);
    if trailing > 0 {
        packet.extend_from_slice(&digest);
    }

    trace!(
        command = %fields.command,
        payload_type = %fields.payload_type,
        body_len = body.len(),
        encrypted = key.is_some() && !body.is_empty(),
        "Packed packet"
    );
    Ok(packet)
}

/// Parse and validate the fixed header at the start of `data`.
pub fn unpack_header(layout: WireLayout, data: &[u8]) -> Result<Header> {
    Header::decode(layout, data)
}

/// Bytes that follow a header on the wire: body plus any trailing digest.
pub fn body_wire_len(header: &Header) -> usize {
    header.payload_length as usize + header.layout.trailing_digest_len()
}

/// Verify and decrypt the bytes following `header`.
///
/// `data` must hold at least [`body_wire_len`] bytes. Nothing is returned for
/// a packet that fails any check.
pub fn unpack_body(header: &Header, data: &[u8]) -> Result<Vec<u8>> {
    let len = header.payload_length as usize;
    if data.len() < body_wire_len(header) {
        return Err(ProtocolError::MalformedBody(
            constants::ERR_TRUNCATED_BODY.to_string(),
        ));
    }
    let body = &data[..len];
    if !header.digest.reserved_is_zero() {
        return Err(ProtocolError::Integrity(constants::ERR_HMAC_MISMATCH));
    }
    let digest: &[u8] = match header.layout {
        WireLayout::Embedded => header.digest.digest(),
        WireLayout::Trailing => &data[len..len + DIGEST_LEN],
    };

    if !header.has_session() {
        if digest.iter().any(|&b| b != 0) {
            return Err(ProtocolError::Integrity(constants::ERR_UNEXPECTED_DIGEST));
        }
        return Ok(body.to_vec());
    }

    let key = SessionKey::from_bytes(header.session_token);
    crypto::verify_hmac(&[header.authenticated_bytes()?.as_slice(), body], &key, digest)?;

    if body.is_empty() {
        return Ok(Vec::new());
    }
    crypto::decrypt_sealed(body, &key, &header.iv)
}

/// Unpack a complete packet held in one buffer.
pub fn unpack(layout: WireLayout, data: &[u8]) -> Result<(Header, Vec<u8>)> {
    let header = unpack_header(layout, data)?;
    let payload = unpack_body(&header, &data[layout.header_size()..])?;
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::header::SESSION_TOKEN_LEN;
    use crate::utils::crypto::TAG_LEN;

    const LAYOUTS: [WireLayout; 2] = [WireLayout::Embedded, WireLayout::Trailing];

    fn key() -> SessionKey {
        SessionKey::from_bytes([0x5A; SESSION_TOKEN_LEN])
    }

    fn fields(layout: WireLayout, command: Command) -> PacketFields {
        PacketFields::new(layout, command, PayloadType::Binary)
    }

    #[test]
    fn test_plain_packet_has_zero_digest() {
        for layout in LAYOUTS {
            let packet = pack(fields(layout, Command::OpenSession), &[], None, None).unwrap();
            assert_eq!(packet.len(), layout.header_size() + layout.trailing_digest_len());

            let (header, payload) = unpack(layout, &packet).unwrap();
            assert!(!header.has_session());
            assert!(header.digest.is_zero());
            assert!(payload.is_empty());
        }
    }

    #[test]
    fn test_sealed_roundtrip() {
        for layout in LAYOUTS {
            let record = [3u8; 264];
            let packet = pack(
                fields(layout, Command::WriteMsgToChatId),
                &record,
                Some(&key()),
                None,
            )
            .unwrap();
            let (header, payload) = unpack(layout, &packet).unwrap();
            assert_eq!(header.payload_length as usize, 264 + TAG_LEN);
            assert_eq!(payload, record);
        }
    }

    #[test]
    fn test_padding_applied_before_sealing() {
        let packet = pack(
            fields(WireLayout::Embedded, Command::WriteMsgToChatId),
            b"short",
            Some(&key()),
            Some(264),
        )
        .unwrap();
        let (_, payload) = unpack(WireLayout::Embedded, &packet).unwrap();
        assert_eq!(payload.len(), 264);
        assert_eq!(&payload[..5], b"short");
        assert!(payload[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_json_is_never_padded() {
        let packet = pack(
            PacketFields::new(WireLayout::Embedded, Command::WriteMsgToChatId, PayloadType::Json),
            b"{}",
            None,
            Some(264),
        )
        .unwrap();
        let (_, payload) = unpack(WireLayout::Embedded, &packet).unwrap();
        assert_eq!(payload, b"{}");
    }

    #[test]
    fn test_empty_payload_with_key_is_not_encrypted() {
        for layout in LAYOUTS {
            let packet =
                pack(fields(layout, Command::CloseSession), &[], Some(&key()), None).unwrap();
            let (header, payload) = unpack(layout, &packet).unwrap();
            assert_eq!(header.payload_length, 0);
            assert!(header.has_session());
            assert!(payload.is_empty());
        }
    }

    #[test]
    fn test_flipped_body_bit_fails_integrity() {
        for layout in LAYOUTS {
            let mut packet = pack(
                fields(layout, Command::WriteMsgToChatId),
                &[9u8; 16],
                Some(&key()),
                None,
            )
            .unwrap();
            packet[layout.header_size() + 2] ^= 0x01;
            let result = unpack(layout, &packet);
            assert!(matches!(result, Err(ProtocolError::Integrity(_))));
        }
    }

    #[test]
    fn test_flipped_nonce_fails_integrity() {
        let mut packet = pack(
            fields(WireLayout::Embedded, Command::WriteMsgToChatId),
            &[9u8; 16],
            Some(&key()),
            None,
        )
        .unwrap();
        packet[57] ^= 0x01;
        let result = unpack(WireLayout::Embedded, &packet);
        assert!(matches!(result, Err(ProtocolError::Integrity(_))));
    }

    #[test]
    fn test_digest_without_token_rejected() {
        let mut packet =
            pack(fields(WireLayout::Trailing, Command::GenericAck), &[1u8; 8], None, None).unwrap();
        let last = packet.len() - 1;
        packet[last] = 0xFF;
        let result = unpack(WireLayout::Trailing, &packet);
        assert!(matches!(
            result,
            Err(ProtocolError::Integrity(constants::ERR_UNEXPECTED_DIGEST))
        ));
    }

    #[test]
    fn test_truncated_body() {
        let packet = pack(
            fields(WireLayout::Embedded, Command::WriteMsgToChatId),
            &[1u8; 8],
            Some(&key()),
            None,
        )
        .unwrap();
        let result = unpack(WireLayout::Embedded, &packet[..packet.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::MalformedBody(_))));
    }

    #[test]
    fn test_alignment_rules() {
        check_alignment(Command::WriteMsgToChatId, PayloadType::Binary, 264).unwrap();
        check_alignment(Command::CtrlSpamBlock, PayloadType::Binary, 4).unwrap();
        check_alignment(Command::WriteMsgToChatId, PayloadType::Json, 13).unwrap();
        assert!(matches!(
            check_alignment(Command::WriteMsgToChatId, PayloadType::Binary, 260),
            Err(ProtocolError::Validation(_))
        ));
    }

    #[test]
    fn test_ivs_differ_between_packets() {
        let a = pack(fields(WireLayout::Embedded, Command::GetUptime), &[], None, None).unwrap();
        let b = pack(fields(WireLayout::Embedded, Command::GetUptime), &[], None, None).unwrap();
        assert_ne!(a[128..140], b[128..140]);
    }
}
