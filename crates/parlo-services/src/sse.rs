//! SSE-style `data:` frame parser.
//!
//! The translation endpoint streams frames of the form `data: <payload>\n`.
//! This converts a byte stream into a stream of payload strings: lines
//! without the `data:` prefix are ignored, partial lines are buffered across
//! chunks, and a trailing unterminated line is flushed at end of stream.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

use parlo_core::Result;

const DATA_PREFIX: &str = "data:";

/// Parse a byte stream into `data:` payloads.
///
/// Generic over the byte-stream error so tests can drive it with
/// `futures::stream::iter` instead of a live response body.
pub fn data_frames<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    struct State<S> {
        byte_stream: Pin<Box<S>>,
        buffer: String,
        done: bool,
    }

    futures::stream::unfold(
        State {
            byte_stream: Box::pin(byte_stream),
            buffer: String::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                // Drain complete lines from the buffer first.
                while let Some(newline_pos) = state.buffer.find('\n') {
                    let line = state.buffer[..newline_pos]
                        .trim_end_matches('\r')
                        .to_string();
                    state.buffer = state.buffer[newline_pos + 1..].to_string();

                    if let Some(payload) = frame_payload(&line) {
                        return Some((Ok(payload), state));
                    }
                }

                if state.done {
                    // Flush a trailing line that never got its newline.
                    if !state.buffer.is_empty() {
                        let line = std::mem::take(&mut state.buffer);
                        if let Some(payload) = frame_payload(line.trim_end_matches('\r')) {
                            return Some((Ok(payload), state));
                        }
                    }
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(anyhow::anyhow!("stream error: {e}").into()),
                            state,
                        ));
                    }
                    None => {
                        state.done = true;
                    }
                }
            }
        },
    )
}

/// Payload of a `data:` line, or `None` for any other line. At most one
/// space after the colon is separator; the rest of the line is payload.
fn frame_payload(line: &str) -> Option<String> {
    line.strip_prefix(DATA_PREFIX)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest).to_string())
}
