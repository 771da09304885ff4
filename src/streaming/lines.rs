//! Blocking and async record sequences over a response body.

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::io::{BufRead, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use super::{decode_chunk, decode_line, MAX_LINE_LENGTH};
use crate::error::{GenAiError, GenAiResult, ResponseError};
use crate::transport::{BlockingBody, BodySource, ByteStream};

fn interrupted(message: impl ToString) -> GenAiError {
    GenAiError::Response(ResponseError::StreamInterrupted {
        message: message.to_string(),
    })
}

enum Source {
    Buffered(std::vec::IntoIter<Bytes>),
    Live(BlockingBody, usize),
    Done,
}

/// Blocking iterator of decoded records.
///
/// Dropping the iterator releases the underlying connection.
pub struct Segments {
    source: Source,
}

impl Segments {
    /// Creates an iterator over a blocking response body.
    pub fn new(body: BodySource<BlockingBody>) -> Self {
        Self::with_max_line_length(body, MAX_LINE_LENGTH)
    }

    /// Like [`new`](Self::new), failing on lines longer than `max_line_length`.
    pub fn with_max_line_length(body: BodySource<BlockingBody>, max_line_length: usize) -> Self {
        let source = match body {
            BodySource::Buffered(chunks) => Source::Buffered(chunks.into_iter()),
            BodySource::Live(reader) => Source::Live(reader, max_line_length),
            BodySource::Empty => Source::Done,
        };
        Self { source }
    }

    fn next_line(reader: &mut BlockingBody, max_line_length: usize) -> Option<GenAiResult<Value>> {
        let mut line = String::new();
        loop {
            line.clear();
            let mut bounded = reader.take(max_line_length as u64 + 1);
            match bounded.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.len() > max_line_length && !line.ends_with('\n') => {
                    return Some(Err(interrupted(format!(
                        "line exceeds {max_line_length} bytes"
                    ))));
                }
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if let Some(record) = decode_line(trimmed) {
                        return Some(record);
                    }
                }
                Err(e) => return Some(Err(interrupted(e))),
            }
        }
    }
}

impl Iterator for Segments {
    type Item = GenAiResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.source {
            Source::Buffered(chunks) => chunks.next().map(|chunk| decode_chunk(&chunk)),
            Source::Live(reader, max_line_length) => Self::next_line(reader, *max_line_length),
            Source::Done => None,
        };
        if matches!(item, None | Some(Err(_))) {
            self.source = Source::Done;
        }
        item
    }
}

type RecordStream = Pin<Box<dyn Stream<Item = GenAiResult<Value>> + Send>>;

/// Async stream of decoded records.
///
/// Dropping the stream releases the underlying connection.
pub struct SegmentStream {
    inner: RecordStream,
    finished: bool,
}

impl SegmentStream {
    /// Creates a stream over an async response body.
    pub fn new(body: BodySource<ByteStream>) -> Self {
        Self::with_max_line_length(body, MAX_LINE_LENGTH)
    }

    /// Like [`new`](Self::new), failing on lines longer than `max_line_length`.
    pub fn with_max_line_length(body: BodySource<ByteStream>, max_line_length: usize) -> Self {
        let inner: RecordStream = match body {
            BodySource::Buffered(chunks) => {
                Box::pin(futures::stream::iter(chunks).map(|chunk| decode_chunk(&chunk)))
            }
            BodySource::Live(bytes) => {
                let reader = StreamReader::new(
                    bytes.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                );
                let codec = LinesCodec::new_with_max_length(max_line_length);
                Box::pin(FramedRead::new(reader, codec).filter_map(|line| async move {
                    match line {
                        Ok(line) => decode_line(&line),
                        Err(e) => Some(Err(interrupted(e))),
                    }
                }))
            }
            BodySource::Empty => Box::pin(futures::stream::empty()),
        };
        Self {
            inner,
            finished: false,
        }
    }
}

impl Stream for SegmentStream {
    type Item = GenAiResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Cursor;

    fn blocking_live(text: &str) -> BodySource<BlockingBody> {
        BodySource::Live(Box::new(Cursor::new(text.as_bytes().to_vec())))
    }

    fn async_live(chunks: Vec<&'static str>) -> BodySource<ByteStream> {
        let items: Vec<Result<Bytes, TransportError>> =
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        BodySource::Live(Box::pin(futures::stream::iter(items)))
    }

    #[test]
    fn test_blocking_lines_strip_prefix_and_skip_empty() {
        let records: Vec<Value> = Segments::new(blocking_live("data: {\"a\":1}\n\ndata: {\"a\":2}\n"))
            .collect::<GenAiResult<_>>()
            .unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[test]
    fn test_blocking_crlf_lines() {
        let records: Vec<Value> = Segments::new(blocking_live("data: {\"a\":1}\r\n\r\n"))
            .collect::<GenAiResult<_>>()
            .unwrap();
        assert_eq!(records, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_blocking_buffered_chunks() {
        let body = BodySource::Buffered(vec![Bytes::from_static(b"{\"a\":1}"), Bytes::new()]);
        let records: Vec<Value> = Segments::new(body).collect::<GenAiResult<_>>().unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({})]);
    }

    #[test]
    fn test_blocking_stops_after_malformed_line() {
        let mut segments = Segments::new(blocking_live("data: {\"a\":1}\ndata: oops\ndata: {\"a\":3}\n"));
        assert!(segments.next().unwrap().is_ok());
        assert!(segments.next().unwrap().is_err());
        assert!(segments.next().is_none());
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        assert_eq!(Segments::new(BodySource::Empty).count(), 0);
    }

    #[tokio::test]
    async fn test_async_lines_across_chunk_boundaries() {
        let body = async_live(vec!["data: {\"a\"", ":1}\n\ndata: {\"a\":2}\n"]);
        let records: Vec<Value> = SegmentStream::new(body).try_collect().await.unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn test_async_transport_error_ends_stream() {
        let items: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n")),
            Err(TransportError::Body("reset".to_string())),
        ];
        let mut stream = SegmentStream::new(BodySource::Live(Box::pin(futures::stream::iter(items))));
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await,
            Some(Err(GenAiError::Response(ResponseError::StreamInterrupted { .. })))
        ));
        assert!(stream.next().await.is_none());
    }
}
