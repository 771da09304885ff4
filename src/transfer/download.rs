//! Single-shot download of raw bytes.

use bytes::Bytes;

use crate::error::{raise_for_status, GenAiResult};
use crate::transport::{BlockingHttpTransport, HttpRequest, HttpTransport};

/// Sends `request` unstreamed and returns the body, blocking the thread.
pub fn download_blocking(transport: &dyn BlockingHttpTransport, request: HttpRequest) -> GenAiResult<Bytes> {
    let response = transport.send(request, false)?;
    let status = response.status;
    let body = response.into_bytes()?;
    raise_for_status(status, &body)?;
    Ok(body)
}

/// Sends `request` unstreamed and returns the body.
pub async fn download(transport: &dyn HttpTransport, request: HttpRequest) -> GenAiResult<Bytes> {
    let response = transport.send(request, false).await?;
    let status = response.status;
    let body = response.into_bytes().await?;
    raise_for_status(status, &body)?;
    Ok(body)
}
