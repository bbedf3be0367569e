//! # Command Sender
//!
//! The client engine: opens a session, frames commands, reads exactly one
//! response per request and closes the session again.
//!
//! ## Lifecycle
//! ```text
//! Disconnected -> Connected -> SessionOpen <-> AwaitingResponse
//!                                   |
//!                                   v
//!                                 Closed
//! ```
//! Every top-level operation runs inside [`Sender::with_session`]: a fresh
//! connection and session are opened, the commands run, and CLOSE_SESSION is
//! attempted on every exit path.
//!
//! ## Failure handling
//! Any failure aborts the call and is returned; nothing is retried. When the
//! byte stream can no longer be trusted (transport error, bad magic, anything
//! that leaves unread bytes behind) the connection is dropped together with
//! the session key.

use crate::config::ClientConfig;
use crate::core::header::{verify_layouts, Command, Header, PayloadType};
use crate::core::packet::{
    body_wire_len, check_alignment, pack, unpack_body, unpack_header, PacketFields,
};
use crate::core::serialization::{FromWirePayload, WirePayload};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::schema::{
    BinaryRecord, CtrlSpamBlock, FileType, GenericAck, ObserveAllChats, ObserveChatId,
    SendFileToChatId, SpamBlockMode, UptimeCallback, WriteMsgToChatId,
};
use crate::protocol::session::{self, Session};
use crate::transport::Connection;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::with_timeout_error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, debug_span, info, info_span, warn, Instrument, Span};

/// Future returned by the closure given to [`Sender::with_session`]
pub type SessionFuture<'s, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 's>>;

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    SessionOpen,
    AwaitingResponse,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::SessionOpen => "session_open",
            SessionState::AwaitingResponse => "awaiting_response",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One command to send inside an open session
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub payload_type: PayloadType,
    /// Typed record; subject to the alignment rule
    pub record: Vec<u8>,
    /// Raw bytes sent after the record (file contents), never aligned
    pub bulk: Vec<u8>,
    pub expect: Command,
    /// Zero-pad a binary record up to this size
    pub pad_to: Option<usize>,
}

impl Request {
    /// Empty binary request
    pub fn new(command: Command, expect: Command) -> Self {
        Self {
            command,
            payload_type: PayloadType::Binary,
            record: Vec::new(),
            bulk: Vec::new(),
            expect,
            pad_to: None,
        }
    }

    /// Binary request carrying one fixed-size record
    pub fn binary<R: BinaryRecord>(command: Command, record: &R, expect: Command) -> Self {
        Self::new(command, expect)
            .payload(PayloadType::Binary, record.to_record())
            .pad_to(R::SIZE)
    }

    pub fn payload(mut self, payload_type: PayloadType, bytes: Vec<u8>) -> Self {
        self.payload_type = payload_type;
        self.record = bytes;
        self
    }

    pub fn with_bulk(mut self, bulk: Vec<u8>) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn pad_to(mut self, size: usize) -> Self {
        self.pad_to = Some(size);
        self
    }

    /// Record padded as it will be sealed, followed by any bulk bytes
    fn into_plaintext(self) -> Result<(Vec<u8>, Option<usize>)> {
        let binary = self.payload_type == PayloadType::Binary;
        let padded_len = match self.pad_to {
            Some(size) if binary => size.max(self.record.len()),
            _ => self.record.len(),
        };
        check_alignment(self.command, self.payload_type, padded_len)?;

        if self.bulk.is_empty() {
            return Ok((self.record, self.pad_to));
        }
        let mut plaintext = self.record;
        plaintext.resize(padded_len, 0);
        plaintext.extend_from_slice(&self.bulk);
        Ok((plaintext, None))
    }
}

/// A verified response
#[derive(Debug, Clone)]
pub struct Response {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn command(&self) -> Command {
        self.header.command
    }

    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type
    }

    /// Decode by the payload type the server declared
    pub fn decode<T: FromWirePayload>(&self) -> Result<T> {
        T::decode(self.header.payload_type, &self.payload)
    }
}

/// Client engine for the bot socket service.
///
/// Operations take `&mut self`, so one sender has at most one request in
/// flight. Use separate senders for concurrent work.
pub struct Sender {
    config: ClientConfig,
    connection: Option<Connection>,
    session: Option<Session>,
    state: SessionState,
    span: Span,
    metrics: Arc<Metrics>,
}

impl Sender {
    /// Create a sender; fails if the header layouts do not serialize to
    /// their declared sizes.
    pub fn new(config: ClientConfig) -> Result<Self> {
        verify_layouts()?;
        let span = info_span!(
            "bot_socket",
            endpoint = %config.endpoint,
            layout = %config.layout
        );
        Ok(Self {
            config,
            connection: None,
            session: None,
            state: SessionState::Disconnected,
            span,
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Attach all events of this sender to `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Share a metrics collector with other senders
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Encoding used for commands that have a JSON variant
    pub fn payload_mode(&self) -> PayloadType {
        self.config.payload_mode
    }

    pub fn set_payload_mode(&mut self, mode: PayloadType) {
        self.config.payload_mode = mode;
    }

    // ========================================================================
    // Session engine
    // ========================================================================

    /// Connect and obtain a session token.
    pub async fn open_session(&mut self) -> Result<()> {
        let span = debug_span!(parent: &self.span, "open_session");
        async {
            if self.session.is_some() {
                return Err(ProtocolError::Session(constants::ERR_SESSION_EXISTS));
            }

            let result = self.establish_session().await;
            match &result {
                Ok(()) => self.metrics.session_opened(),
                Err(e) => {
                    self.metrics.session_failed();
                    self.metrics.record_error(e.kind());
                    warn!(error = %e, "Failed to open session");
                    self.drop_transport();
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn establish_session(&mut self) -> Result<()> {
        let connection =
            Connection::connect(&self.config.endpoint, self.config.connect_timeout).await?;
        self.metrics.connection_established();
        self.connection = Some(connection);
        self.state = SessionState::Connected;

        let request = session::open_session_request(self.config.layout)?;
        let response = self.exchange(&request, Command::OpenSessionAck).await?;
        let session = session::accept_open_session_ack(&response.header, &response.payload)?;

        info!(
            expiration_time = session.expiration_time().unwrap_or("unknown"),
            "Session opened"
        );
        self.session = Some(session);
        self.state = SessionState::SessionOpen;
        Ok(())
    }

    /// Send one command in the open session and return its verified response.
    pub async fn invoke(&mut self, request: Request) -> Result<Response> {
        let span = debug_span!(parent: &self.span, "invoke", command = %request.command);
        async {
            let result = self.invoke_in_session(request).await;
            if let Err(e) = &result {
                self.metrics.record_error(e.kind());
                warn!(error = %e, "Command failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn invoke_in_session(&mut self, request: Request) -> Result<Response> {
        let session = self
            .session
            .as_ref()
            .ok_or(ProtocolError::Session(constants::ERR_NO_SESSION))?;

        let fields = PacketFields::new(self.config.layout, request.command, request.payload_type);
        let expect = request.expect;
        let (plaintext, pad_to) = request.into_plaintext()?;
        let packet = pack(fields, &plaintext, Some(session.key()), pad_to)?;

        let response = self.exchange(&packet, expect).await?;
        let signed = self
            .session
            .as_ref()
            .is_some_and(|s| s.key().as_bytes() == &response.header.session_token);
        if !signed {
            let reason = if response.header.has_session() {
                constants::ERR_FOREIGN_TOKEN
            } else {
                constants::ERR_UNSIGNED_RESPONSE
            };
            return Err(ProtocolError::Integrity(reason));
        }
        Ok(response)
    }

    /// Write one packet and read exactly one framed response.
    async fn exchange(&mut self, packet: &[u8], expect: Command) -> Result<Response> {
        let layout = self.config.layout;
        let limit = self.config.response_timeout;
        let metrics = Arc::clone(&self.metrics);
        let Some(connection) = self.connection.as_mut() else {
            return Err(ProtocolError::Connection(
                constants::ERR_NOT_CONNECTED.to_string(),
            ));
        };
        self.state = SessionState::AwaitingResponse;

        let framed = async {
            connection.send_all(packet).await?;
            metrics.packet_sent(packet.len() as u64);

            let head = with_timeout_error(connection.recv_exact(layout.header_size()), limit).await?;
            let header = unpack_header(layout, &head)?;
            let body = with_timeout_error(connection.recv_exact(body_wire_len(&header)), limit).await?;
            Ok::<_, ProtocolError>((header, head.len() + body.len(), body))
        };

        let (header, wire_len, body) = match framed.await {
            Ok(framed) => framed,
            Err(e) => {
                self.drop_transport();
                return Err(e);
            }
        };
        self.state = if self.session.is_some() {
            SessionState::SessionOpen
        } else {
            SessionState::Connected
        };

        if header.command != expect {
            return Err(ProtocolError::UnexpectedCommand {
                expected: expect.to_string(),
                actual: header.command.to_string(),
            });
        }

        let payload = unpack_body(&header, &body)?;
        self.metrics.packet_received(wire_len as u64);
        debug!(
            command = %header.command,
            payload_type = %header.payload_type,
            len = payload.len(),
            "Response verified"
        );
        Ok(Response { header, payload })
    }

    /// Send CLOSE_SESSION without waiting for a reply, then drop the key and
    /// the connection. Failures are logged only.
    pub async fn close_session(&mut self) {
        let span = debug_span!(parent: &self.span, "close_session");
        async {
            let Some(session) = self.session.take() else {
                debug!("No session to close");
                self.drop_transport();
                return;
            };

            match self.connection.as_mut() {
                Some(connection) => {
                    match session::close_session_request(self.config.layout, &session) {
                        Ok(packet) => match connection.send_all(&packet).await {
                            Ok(()) => self.metrics.packet_sent(packet.len() as u64),
                            Err(e) => warn!(error = %e, "Failed to send close-session"),
                        },
                        Err(e) => warn!(error = %e, "Failed to build close-session"),
                    }
                    connection.shutdown().await;
                }
                None => warn!("Connection already lost; skipping close-session"),
            }

            self.metrics.session_closed();
            debug!(age_ms = session.age().as_millis() as u64, "Session closed");
            self.metrics.log_metrics();
            drop(session);
            self.connection = None;
            self.state = SessionState::Closed;
        }
        .instrument(span)
        .await
    }

    /// Open a session, run `op`, and close the session on every exit path.
    ///
    /// ```no_run
    /// # use bot_socket_client::service::sender::{Request, Sender};
    /// # use bot_socket_client::core::header::Command;
    /// # async fn demo(sender: &mut Sender) -> bot_socket_client::error::Result<()> {
    /// let response = sender
    ///     .with_session(|s| {
    ///         Box::pin(async move {
    ///             s.invoke(Request::new(Command::GetUptime, Command::GetUptimeCallback))
    ///                 .await
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = response;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_session<T, F>(&mut self, op: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Sender) -> SessionFuture<'s, T>,
    {
        self.open_session().await?;
        let outcome = op(self).await;
        self.close_session().await;
        outcome
    }

    fn drop_transport(&mut self) {
        if self.connection.take().is_some() || self.session.is_some() {
            debug!("Dropping connection and session key");
        }
        self.session = None;
        self.state = SessionState::Disconnected;
    }

    /// Run one acknowledged command in its own session.
    pub(crate) async fn run_acked(&mut self, request: Request) -> Result<()> {
        let response = self
            .with_session(move |s| Box::pin(async move { s.invoke(request).await }))
            .await?;
        response.decode::<GenericAck>()?.into_result()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Post `text` to `chat_id`. Oversized text is truncated in binary mode.
    pub async fn send_message(&mut self, chat_id: i64, text: &str) -> Result<()> {
        let _timer = Timer::start("send_message");
        let mode = self.payload_mode();
        let record = WriteMsgToChatId {
            chat: chat_id,
            message: text.to_string(),
        };
        let request = Request::new(Command::WriteMsgToChatId, Command::GenericAck)
            .payload(mode, record.encode(mode)?)
            .pad_to(WriteMsgToChatId::SIZE);
        self.run_acked(request).await?;
        info!(chat = chat_id, mode = %mode, "Message delivered");
        Ok(())
    }

    /// Ask the bot how long it has been running
    pub async fn get_uptime(&mut self) -> Result<UptimeCallback> {
        let _timer = Timer::start("get_uptime");
        let request = Request::new(Command::GetUptime, Command::GetUptimeCallback)
            .payload(self.payload_mode(), Vec::new());
        let response = self
            .with_session(move |s| Box::pin(async move { s.invoke(request).await }))
            .await?;
        response.decode()
    }

    /// Switch the spam filter mode. Always binary.
    pub async fn control_spamblock(&mut self, mode: SpamBlockMode) -> Result<()> {
        let _timer = Timer::start("control_spamblock");
        let request = Request::binary(
            Command::CtrlSpamBlock,
            &CtrlSpamBlock { mode },
            Command::GenericAck,
        );
        self.run_acked(request).await
    }

    /// Have the bot send a file it can reach to `chat_id`
    pub async fn send_file(&mut self, chat_id: i64, path: &str, file_type: FileType) -> Result<()> {
        let _timer = Timer::start("send_file");
        let mode = self.payload_mode();
        let record = SendFileToChatId {
            chat: chat_id,
            file_type,
            file_path: path.to_string(),
        };
        let request = Request::new(Command::SendFileToChatId, Command::GenericAck)
            .payload(mode, record.encode(mode)?)
            .pad_to(SendFileToChatId::SIZE);
        self.run_acked(request).await
    }

    /// Start or stop observing one chat
    pub async fn observe_chat(&mut self, chat_id: i64, observe: bool) -> Result<()> {
        let mode = self.payload_mode();
        let record = ObserveChatId {
            chat: chat_id,
            observe,
        };
        let request = Request::new(Command::ObserveChatId, Command::GenericAck)
            .payload(mode, record.encode(mode)?)
            .pad_to(ObserveChatId::SIZE);
        self.run_acked(request).await
    }

    /// Start or stop observing every chat
    pub async fn observe_all_chats(&mut self, observe: bool) -> Result<()> {
        let mode = self.payload_mode();
        let record = ObserveAllChats { observe };
        let request = Request::new(Command::ObserveAllChats, Command::GenericAck)
            .payload(mode, record.encode(mode)?)
            .pad_to(ObserveAllChats::SIZE);
        self.run_acked(request).await
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("endpoint", &self.config.endpoint)
            .field("layout", &self.config.layout)
            .field("state", &self.state)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_new_sender_is_disconnected() {
        let sender = Sender::new(ClientConfig::default()).unwrap();
        assert_eq!(sender.state(), SessionState::Disconnected);
        assert!(sender.session().is_none());
    }

    #[test]
    fn test_request_padding_precedes_bulk() {
        let request = Request::new(Command::TransferFile, Command::GenericAck)
            .payload(PayloadType::Binary, vec![1u8; 5])
            .pad_to(8)
            .with_bulk(vec![9u8; 3]);
        let (plaintext, pad_to) = request.into_plaintext().unwrap();
        assert_eq!(plaintext, vec![1, 1, 1, 1, 1, 0, 0, 0, 9, 9, 9]);
        assert_eq!(pad_to, None);
    }

    #[test]
    fn test_unaligned_record_rejected_before_io() {
        let request = Request::new(Command::WriteMsgToChatId, Command::GenericAck)
            .payload(PayloadType::Binary, vec![0u8; 12]);
        assert!(matches!(
            request.into_plaintext(),
            Err(ProtocolError::Validation(_))
        ));
    }

    #[test]
    fn test_spamblock_request_is_exempt() {
        let request = Request::binary(
            Command::CtrlSpamBlock,
            &CtrlSpamBlock {
                mode: SpamBlockMode::Purge,
            },
            Command::GenericAck,
        );
        let (plaintext, _) = request.into_plaintext().unwrap();
        assert_eq!(plaintext.len(), 4);
    }

    #[tokio::test]
    async fn test_invoke_without_session() {
        let mut sender = Sender::new(ClientConfig::default()).unwrap();
        let result = sender
            .invoke(Request::new(Command::GetUptime, Command::GetUptimeCallback))
            .await;
        assert!(matches!(
            result,
            Err(ProtocolError::Session(constants::ERR_NO_SESSION))
        ));
    }

    #[tokio::test]
    async fn test_close_without_session_is_quiet() {
        let mut sender = Sender::new(ClientConfig::default()).unwrap();
        sender.close_session().await;
        assert_eq!(sender.state(), SessionState::Disconnected);
    }
}
