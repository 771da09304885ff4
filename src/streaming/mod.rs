//! Response stream decoding.
//!
//! A response body becomes a lazy, single-pass sequence of JSON records:
//!
//! - a buffered body yields one record per chunk, and an empty chunk yields
//!   an empty object
//! - a live body is split into lines; empty lines are skipped and a leading
//!   `data: ` is stripped before decoding
//!
//! [`Segments`] is the blocking iterator and [`SegmentStream`] the async
//! stream. Both stop after the first error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use integrations_genai::streaming::SegmentStream;
//! use integrations_genai::transport::AsyncResponse;
//! use futures::StreamExt;
//!
//! async fn print_records(response: AsyncResponse) {
//!     let mut records = SegmentStream::new(response.body);
//!     while let Some(record) = records.next().await {
//!         match record {
//!             Ok(value) => println!("{value}"),
//!             Err(e) => eprintln!("stream failed: {e}"),
//!         }
//!     }
//! }
//! ```

mod lines;

pub use lines::{SegmentStream, Segments};

use serde_json::Value;

use crate::error::{GenAiError, GenAiResult, ResponseError};

/// Longest line accepted from a live body, in bytes.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Line prefix used by server-sent streaming responses.
pub const DATA_PREFIX: &str = "data: ";

/// Decodes one buffered chunk. An empty chunk is an empty object.
pub fn decode_chunk(chunk: &[u8]) -> GenAiResult<Value> {
    if chunk.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(chunk).map_err(malformed)
}

/// Decodes one line of a live stream. Empty lines yield nothing.
pub fn decode_line(line: &str) -> Option<GenAiResult<Value>> {
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    Some(serde_json::from_str(payload).map_err(malformed))
}

fn malformed(e: serde_json::Error) -> GenAiError {
    GenAiError::Response(ResponseError::MalformedChunk {
        message: e.to_string(),
    })
}
