//! # File Transfer
//!
//! Moving whole files between this host and the bot host.
//!
//! ## Upload (two-phase)
//! 1. CMD_TRANSFER_FILE with only the descriptor and `dry_run` set; the server
//!    checks destination, overwrite policy and hash without writing anything
//! 2. Only on an explicit SUCCESS acknowledgement: the same descriptor with
//!    `dry_run` cleared, followed by the raw file bytes
//!
//! ## Download
//! CMD_TRANSFER_FILE_REQUEST carries a descriptor naming the remote source.
//! The server replies with CMD_TRANSFER_FILE: descriptor followed by the file.
//!
//! Both directions run inside one session on one connection.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::header::{Command, PayloadType};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::schema::{BinaryRecord, GenericAck, TransferFile, TransferOptions};
use crate::service::sender::{Request, Sender};
use crate::utils::crypto::{sha256, TAG_LEN};
use crate::utils::metrics::Timer;
use std::path::Path;
use tracing::{debug, info, warn};

/// Policy for an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadOptions {
    /// Replace the destination if it already exists
    pub overwrite: bool,
    /// Ask the server not to compare hashes
    pub hash_ignore: bool,
}

impl Sender {
    /// Upload `local_src` to `remote_dest` on the bot host.
    ///
    /// A dry run is always performed first. If the server rejects it the
    /// file bytes are never sent and the rejection is returned.
    pub async fn upload_file(
        &mut self,
        local_src: &Path,
        remote_dest: &str,
        options: UploadOptions,
    ) -> Result<()> {
        let _timer = Timer::start("upload_file");

        let metadata = tokio::fs::metadata(local_src).await.map_err(|e| {
            ProtocolError::Validation(format!("source {}: {e}", local_src.display()))
        })?;
        if !metadata.is_file() {
            return Err(ProtocolError::Validation(format!(
                "source {} is not a regular file",
                local_src.display()
            )));
        }
        check_upload_size(local_src, metadata.len())?;
        let data = tokio::fs::read(local_src).await.map_err(|e| {
            ProtocolError::Validation(format!("cannot read {}: {e}", local_src.display()))
        })?;
        check_upload_size(local_src, data.len() as u64)?;

        let mut descriptor = TransferFile {
            dest_path: remote_dest.to_string(),
            src_path: local_src.display().to_string(),
            sha256: sha256(&data),
            options: TransferOptions {
                overwrite: options.overwrite,
                hash_ignore: options.hash_ignore,
                dry_run: true,
            },
        };
        let dry_run = Request::binary(Command::TransferFile, &descriptor, Command::GenericAck);
        descriptor.options.dry_run = false;
        let size = data.len();
        let commit = Request::binary(Command::TransferFile, &descriptor, Command::GenericAck)
            .with_bulk(data);

        self.with_session(move |s| {
            Box::pin(async move {
                let verdict: GenericAck = s.invoke(dry_run).await?.decode()?;
                if !verdict.is_success() {
                    warn!(
                        ack = %verdict.result,
                        reason = %verdict.error_msg,
                        "Upload rejected by dry run"
                    );
                    return verdict.into_result();
                }
                debug!("Dry run accepted, sending file");
                s.invoke(commit).await?.decode::<GenericAck>()?.into_result()
            })
        })
        .await?;

        info!(dest = remote_dest, bytes = size, "File uploaded");
        Ok(())
    }

    /// Fetch `remote_src` from the bot host and write it to `local_dest`.
    ///
    /// Returns the descriptor the server sent. When it carries a hash and
    /// `hash_ignore` is not set, the received bytes must match it.
    pub async fn download_file(
        &mut self,
        remote_src: &str,
        local_dest: &Path,
    ) -> Result<TransferFile> {
        let _timer = Timer::start("download_file");

        let descriptor = TransferFile {
            dest_path: local_dest.display().to_string(),
            src_path: remote_src.to_string(),
            sha256: [0u8; 32],
            options: TransferOptions::default(),
        };
        let request = Request::binary(
            Command::TransferFileRequest,
            &descriptor,
            Command::TransferFile,
        );

        let response = self
            .with_session(move |s| Box::pin(async move { s.invoke(request).await }))
            .await?;

        if response.payload_type() != PayloadType::Binary {
            return Err(ProtocolError::MalformedBody(
                "transfer descriptor must be binary".to_string(),
            ));
        }
        let returned = TransferFile::read_from(&response.payload)?;
        let data = &response.payload[TransferFile::SIZE..];

        if returned.has_hash() && !returned.options.hash_ignore && sha256(data) != returned.sha256 {
            return Err(ProtocolError::Integrity(constants::ERR_FILE_HASH_MISMATCH));
        }

        if let Err(e) = tokio::fs::write(local_dest, data).await {
            warn!(dest = %local_dest.display(), error = %e, "Cannot write downloaded file");
            return Err(ProtocolError::Io(e));
        }

        info!(src = remote_src, bytes = data.len(), "File downloaded");
        Ok(returned)
    }
}

/// Reject a source whose sealed commit packet (descriptor, file, tag) would
/// exceed the payload limit. Runs before any connection is made.
fn check_upload_size(local_src: &Path, file_len: u64) -> Result<()> {
    let sealed = file_len.saturating_add((TransferFile::SIZE + TAG_LEN) as u64);
    if sealed > MAX_PAYLOAD_SIZE as u64 {
        return Err(ProtocolError::Validation(format!(
            "source {} is {file_len} bytes; packets carry at most {MAX_PAYLOAD_SIZE}",
            local_src.display()
        )));
    }
    Ok(())
}
