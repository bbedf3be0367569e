//! Session establishment and teardown.
//!
//! A session is opened by sending CMD_OPEN_SESSION without a key. The server
//! answers with CMD_OPEN_SESSION_ACK carrying a JSON object with the new
//! 32-byte token, which then serves as both AES-GCM and HMAC key until
//! CMD_CLOSE_SESSION is sent.
//!
//! **Per-session state**: the token lives only inside a [`Session`] owned by
//! one sender. It is wiped when the session is dropped, so closing, failing or
//! abandoning a session all destroy the key.

use crate::core::header::{Command, Header, PayloadType, WireLayout};
use crate::core::packet::{pack, PacketFields};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::SessionKey;
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Body of CMD_OPEN_SESSION_ACK
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OpenSessionAck {
    pub session_token: String,
    /// `%Y-%m-%d %H:%M:%S` in server local time
    #[serde(default)]
    pub expiration_time: Option<String>,
}

impl fmt::Debug for OpenSessionAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSessionAck")
            .field("session_token", &"[REDACTED]")
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

/// An open session: the key plus bookkeeping
#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    expiration_time: Option<String>,
    opened_at: Instant,
}

impl Session {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Expiry as reported by the server, verbatim
    pub fn expiration_time(&self) -> Option<&str> {
        self.expiration_time.as_deref()
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// CMD_OPEN_SESSION packet: no key, no payload
pub fn open_session_request(layout: WireLayout) -> Result<Vec<u8>> {
    pack(
        PacketFields::new(layout, Command::OpenSession, PayloadType::Binary),
        &[],
        None,
        None,
    )
}

/// Build a [`Session`] from a verified CMD_OPEN_SESSION_ACK.
///
/// `payload` must already have passed `unpack_body`.
pub fn accept_open_session_ack(header: &Header, payload: &[u8]) -> Result<Session> {
    if header.command != Command::OpenSessionAck {
        return Err(ProtocolError::UnexpectedCommand {
            expected: Command::OpenSessionAck.to_string(),
            actual: header.command.to_string(),
        });
    }

    let ack: OpenSessionAck = serde_json::from_slice(payload)?;
    let key = SessionKey::try_from_slice(ack.session_token.as_bytes())?;

    if header.has_session() && header.session_token != *key.as_bytes() {
        return Err(ProtocolError::Session(constants::ERR_TOKEN_MISMATCH));
    }

    debug!(
        expiration_time = ack.expiration_time.as_deref().unwrap_or("unknown"),
        "Session token accepted"
    );

    Ok(Session {
        key,
        expiration_time: ack.expiration_time.clone(),
        opened_at: Instant::now(),
    })
}

/// CMD_CLOSE_SESSION packet: authenticated, empty payload
pub fn close_session_request(layout: WireLayout, session: &Session) -> Result<Vec<u8>> {
    pack(
        PacketFields::new(layout, Command::CloseSession, PayloadType::Binary),
        &[],
        Some(session.key()),
        None,
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::packet::unpack;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn ack_header(token: Option<&[u8]>) -> Header {
        let mut header = Header::new(
            WireLayout::Embedded,
            Command::OpenSessionAck,
            PayloadType::Json,
        );
        if let Some(token) = token {
            header.session_token.copy_from_slice(token);
        }
        header
    }

    #[test]
    fn test_accept_ack() {
        let body = format!(
            r#"{{"session_token":"{TOKEN}","expiration_time":"2025-01-01 12:00:00"}}"#
        );
        let session =
            accept_open_session_ack(&ack_header(Some(TOKEN.as_bytes())), body.as_bytes()).unwrap();
        assert_eq!(session.key().as_bytes(), TOKEN.as_bytes());
        assert_eq!(session.expiration_time(), Some("2025-01-01 12:00:00"));
    }

    #[test]
    fn test_short_token_rejected() {
        let result =
            accept_open_session_ack(&ack_header(None), br#"{"session_token":"too-short"}"#);
        assert!(matches!(
            result,
            Err(ProtocolError::Session(constants::ERR_BAD_TOKEN_LENGTH))
        ));
    }

    #[test]
    fn test_malformed_json() {
        let result = accept_open_session_ack(&ack_header(None), b"not json");
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_header_token_must_match() {
        let body = format!(r#"{{"session_token":"{TOKEN}"}}"#);
        let result = accept_open_session_ack(&ack_header(Some(&[0x01; 32])), body.as_bytes());
        assert!(matches!(
            result,
            Err(ProtocolError::Session(constants::ERR_TOKEN_MISMATCH))
        ));
    }

    #[test]
    fn test_wrong_command() {
        let header = Header::new(WireLayout::Embedded, Command::GenericAck, PayloadType::Json);
        let result = accept_open_session_ack(&header, b"{}");
        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedCommand { .. })
        ));
    }

    #[test]
    fn test_close_request_is_authenticated() {
        let body = format!(r#"{{"session_token":"{TOKEN}"}}"#);
        let session = accept_open_session_ack(&ack_header(None), body.as_bytes()).unwrap();

        for layout in [WireLayout::Embedded, WireLayout::Trailing] {
            let packet = close_session_request(layout, &session).unwrap();
            let (header, payload) = unpack(layout, &packet).unwrap();
            assert_eq!(header.command, Command::CloseSession);
            assert_eq!(&header.session_token[..], TOKEN.as_bytes());
            assert!(payload.is_empty());
        }
    }

    #[test]
    fn test_open_request_has_no_token() {
        let packet = open_session_request(WireLayout::Trailing).unwrap();
        let (header, _) = unpack(WireLayout::Trailing, &packet).unwrap();
        assert_eq!(header.command, Command::OpenSession);
        assert!(!header.has_session());
    }

    #[test]
    fn test_ack_debug_redacts_token() {
        let ack: OpenSessionAck =
            serde_json::from_str(&format!(r#"{{"session_token":"{TOKEN}"}}"#)).unwrap();
        assert!(!format!("{ack:?}").contains(TOKEN));
    }
}
