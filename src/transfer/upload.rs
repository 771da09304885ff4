//! Chunked resumable upload, blocking and async.

use bytes::Bytes;
use std::io::Read;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{
    chunk_request, ensure_progress, finish, source_error, UploadConfig, UploadState, UploadStatus,
};
use crate::config::Headers;
use crate::error::GenAiResult;
use crate::transport::{BlockingHttpTransport, HttpTransport};
use crate::types::ApiResponse;

fn read_chunk<R: Read>(source: &mut R, chunk_size: usize) -> GenAiResult<Bytes> {
    let mut buf = Vec::with_capacity(chunk_size);
    source
        .take(chunk_size as u64)
        .read_to_end(&mut buf)
        .map_err(|e| source_error(&e))?;
    Ok(Bytes::from(buf))
}

async fn read_chunk_async<R: AsyncRead + Unpin>(source: &mut R, chunk_size: usize) -> GenAiResult<Bytes> {
    let mut buf = Vec::with_capacity(chunk_size);
    source
        .take(chunk_size as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| source_error(&e))?;
    Ok(Bytes::from(buf))
}

/// Uploads `source` to `upload_url`, blocking the current thread.
///
/// Returns the finalize response.
pub fn upload_blocking<R: Read>(
    transport: &dyn BlockingHttpTransport,
    config: &UploadConfig,
    source: &mut R,
    upload_url: &str,
    upload_size: u64,
    timeout_ms: Option<u64>,
) -> GenAiResult<ApiResponse> {
    let mut state = UploadState::new(upload_size);
    loop {
        let chunk = read_chunk(source, config.chunk_size)?;
        let chunk_len = chunk.len() as u64;
        ensure_progress(&state, chunk_len)?;
        state.begin_chunk(chunk_len);
        tracing::debug!(offset = state.offset, chunk_len, command = state.command.as_str(), "Uploading chunk");

        let mut retry = 0;
        let response = loop {
            let request = chunk_request(upload_url, &state, chunk.clone(), timeout_ms);
            let response = transport.send(request, false)?;
            if UploadStatus::from_headers(&response.headers) != UploadStatus::Absent {
                break response;
            }
            retry += 1;
            if retry >= config.max_retry_count {
                break response;
            }
            let delay = config.retry_delay(retry - 1);
            tracing::warn!(offset = state.offset, retry, ?delay, "Upload status header missing, resending chunk");
            std::thread::sleep(delay);
        };

        let status = UploadStatus::from_headers(&response.headers);
        if !state.advance(chunk_len, status)? {
            finish(&state)?;
            return into_api_response(response.headers.clone(), response.into_bytes()?);
        }
    }
}

/// Uploads `source` to `upload_url` without blocking the runtime.
///
/// Returns the finalize response.
pub async fn upload<R: AsyncRead + Unpin>(
    transport: &dyn HttpTransport,
    config: &UploadConfig,
    source: &mut R,
    upload_url: &str,
    upload_size: u64,
    timeout_ms: Option<u64>,
) -> GenAiResult<ApiResponse> {
    let mut state = UploadState::new(upload_size);
    loop {
        let chunk = read_chunk_async(source, config.chunk_size).await?;
        let chunk_len = chunk.len() as u64;
        ensure_progress(&state, chunk_len)?;
        state.begin_chunk(chunk_len);
        tracing::debug!(offset = state.offset, chunk_len, command = state.command.as_str(), "Uploading chunk");

        let mut retry = 0;
        let response = loop {
            let request = chunk_request(upload_url, &state, chunk.clone(), timeout_ms);
            let response = transport.send(request, false).await?;
            if UploadStatus::from_headers(&response.headers) != UploadStatus::Absent {
                break response;
            }
            retry += 1;
            if retry >= config.max_retry_count {
                break response;
            }
            let delay = config.retry_delay(retry - 1);
            tracing::warn!(offset = state.offset, retry, ?delay, "Upload status header missing, resending chunk");
            tokio::time::sleep(delay).await;
        };

        let status = UploadStatus::from_headers(&response.headers);
        if !state.advance(chunk_len, status)? {
            finish(&state)?;
            let headers = response.headers.clone();
            return into_api_response(headers, response.into_bytes().await?);
        }
    }
}

fn into_api_response(headers: Headers, body: Bytes) -> GenAiResult<ApiResponse> {
    Ok(ApiResponse::new(headers, String::from_utf8_lossy(&body).into_owned()))
}
