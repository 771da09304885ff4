//! Resumable upload and single-shot download.
//!
//! Uploads go to a pre-authorized resumable-upload URL in fixed-size chunks.
//! Each chunk response reports progress through `x-goog-upload-status`; a
//! chunk is re-sent, with exponential delay, only while that header is
//! missing. The upload succeeds only when the last status is `final`.

mod download;
mod upload;

pub use download::{download, download_blocking};
pub use upload::{upload, upload_blocking};

use bytes::Bytes;
use std::time::Duration;

use crate::config::{populate_server_timeout_header, timeout_in_seconds, Headers};
use crate::error::{GenAiResult, UploadError};
use crate::transport::{HttpMethod, HttpRequest, RequestBody};

/// Chunk size for uploads.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Attempts per chunk while the status header is missing.
pub const MAX_RETRY_COUNT: u32 = 3;
/// Delay before the first chunk re-send.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Multiplier applied to the chunk re-send delay.
pub const DELAY_MULTIPLIER: u32 = 2;

/// Request header naming the upload command.
pub const UPLOAD_COMMAND_HEADER: &str = "X-Goog-Upload-Command";
/// Request header carrying the chunk offset.
pub const UPLOAD_OFFSET_HEADER: &str = "X-Goog-Upload-Offset";
/// Response header carrying the upload status.
pub const UPLOAD_STATUS_HEADER: &str = "x-goog-upload-status";

/// Upload tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per chunk.
    pub chunk_size: usize,
    /// Attempts per chunk while the status header is missing.
    pub max_retry_count: u32,
    /// Delay before the first re-send.
    pub initial_retry_delay: Duration,
    /// Delay multiplier between re-sends.
    pub delay_multiplier: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            max_retry_count: MAX_RETRY_COUNT,
            initial_retry_delay: INITIAL_RETRY_DELAY,
            delay_multiplier: DELAY_MULTIPLIER,
        }
    }
}

impl UploadConfig {
    /// Delay after the zero-based re-send attempt.
    pub fn retry_delay(&self, retry: u32) -> Duration {
        self.initial_retry_delay
            .saturating_mul(self.delay_multiplier.saturating_pow(retry))
    }
}

/// Command sent with a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCommand {
    Upload,
    UploadAndFinalize,
}

impl UploadCommand {
    /// Header value.
    pub fn as_str(self) -> &'static str {
        match self {
            UploadCommand::Upload => "upload",
            UploadCommand::UploadAndFinalize => "upload, finalize",
        }
    }
}

/// Upload status reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// More chunks expected.
    Active,
    /// Upload complete.
    Final,
    /// No status header.
    Absent,
    /// Any other value, such as `cancelled`.
    Other(String),
}

impl UploadStatus {
    /// Reads the status from response headers.
    pub fn from_headers(headers: &Headers) -> Self {
        match headers.get_ignore_case(UPLOAD_STATUS_HEADER) {
            None | Some("") => UploadStatus::Absent,
            Some("active") => UploadStatus::Active,
            Some("final") => UploadStatus::Final,
            Some(other) => UploadStatus::Other(other.to_string()),
        }
    }

    fn label(&self) -> Option<String> {
        match self {
            UploadStatus::Active => Some("active".to_string()),
            UploadStatus::Final => Some("final".to_string()),
            UploadStatus::Absent => None,
            UploadStatus::Other(s) => Some(s.clone()),
        }
    }
}

/// Progress of one upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    /// Bytes acknowledged so far.
    pub offset: u64,
    /// Declared total size.
    pub upload_size: u64,
    /// Command of the last chunk sent.
    pub command: UploadCommand,
    /// Status of the last chunk response.
    pub last_status: UploadStatus,
}

impl UploadState {
    /// Initial state.
    pub fn new(upload_size: u64) -> Self {
        Self {
            offset: 0,
            upload_size,
            command: UploadCommand::Upload,
            last_status: UploadStatus::Absent,
        }
    }

    /// Picks the command for a chunk of `chunk_len` bytes at the current offset.
    pub fn begin_chunk(&mut self, chunk_len: u64) -> UploadCommand {
        self.command = if self.offset + chunk_len >= self.upload_size {
            UploadCommand::UploadAndFinalize
        } else {
            UploadCommand::Upload
        };
        self.command
    }

    /// Records a chunk response. Returns whether another chunk should follow.
    pub fn advance(&mut self, chunk_len: u64, status: UploadStatus) -> Result<bool, UploadError> {
        self.offset += chunk_len;
        self.last_status = status;
        if self.last_status != UploadStatus::Active {
            return Ok(false);
        }
        if self.upload_size <= self.offset {
            return Err(UploadError::NotFinalized {
                offset: self.offset,
                upload_size: self.upload_size,
            });
        }
        Ok(true)
    }

    /// Checks the terminal status.
    pub fn finish(&self) -> Result<(), UploadError> {
        if self.last_status == UploadStatus::Final {
            Ok(())
        } else {
            Err(UploadError::UnexpectedStatus {
                status: self.last_status.label(),
            })
        }
    }
}

pub(crate) fn chunk_request(
    upload_url: &str,
    state: &UploadState,
    chunk: Bytes,
    timeout_ms: Option<u64>,
) -> HttpRequest {
    let timeout_secs = timeout_in_seconds(timeout_ms);
    let mut headers = Headers::new()
        .with(UPLOAD_COMMAND_HEADER, state.command.as_str())
        .with(UPLOAD_OFFSET_HEADER, state.offset.to_string())
        .with("Content-Length", chunk.len().to_string());
    populate_server_timeout_header(&mut headers, timeout_secs);
    HttpRequest {
        method: HttpMethod::Post,
        url: upload_url.to_string(),
        headers,
        body: RequestBody::Raw(chunk),
        timeout: timeout_secs.map(Duration::from_secs_f64),
    }
}

pub(crate) fn source_error(e: &std::io::Error) -> crate::error::GenAiError {
    UploadError::Source {
        message: e.to_string(),
    }
    .into()
}

/// Fails when the source ran dry before `upload_size` bytes were read.
pub(crate) fn ensure_progress(state: &UploadState, chunk_len: u64) -> GenAiResult<()> {
    if chunk_len == 0 && state.offset < state.upload_size {
        return Err(UploadError::Source {
            message: format!(
                "source ended at {} of {} bytes",
                state.offset, state.upload_size
            ),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn finish(state: &UploadState) -> GenAiResult<()> {
    state.finish().map_err(Into::into)
}
