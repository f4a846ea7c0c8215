//! Turns a raw byte stream into delimiter-separated messages.
//!
//! [`Framer`] is the synchronous state machine: it owns the pending buffer
//! and splits incoming chunks on the configured delimiter. [`FramedReader`]
//! drives a `Framer` from any [`AsyncRead`], bounding every read with the idle
//! timeout so that bytes sent without a delimiter still surface after a short
//! silence.

use std::{borrow::Cow, collections::VecDeque, io, mem, time::Duration};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::timeout,
};

use crate::config::{Delimiter, RelayConfig};

/// Shortest idle window accepted; a zero window would spin on reads.
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(1);

/// Why a message was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// The delimiter byte was seen.
    Delimiter,
    /// The peer went quiet for longer than the idle timeout.
    Idle,
    /// The stream ended or failed with bytes still pending.
    Closed,
}

/// One framed message. Never empty and never contains the delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Bytes,
    flush: Flush,
}

impl Message {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn flush(&self) -> Flush {
        self.flush
    }

    /// Lossy UTF-8 view for display.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Per-connection accumulator splitting bytes on a single delimiter.
#[derive(Debug)]
pub struct Framer {
    delimiter: u8,
    pending: BytesMut,
}

impl Framer {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            delimiter: delimiter.byte(),
            pending: BytesMut::new(),
        }
    }

    /// Bytes received since the last emitted message.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Consumes one chunk and returns the messages it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Message> {
        let mut out = VecDeque::new();
        self.feed_into(chunk, &mut out);
        out.into()
    }

    fn feed_into(&mut self, chunk: &[u8], out: &mut VecDeque<Message>) {
        let mut rest = chunk;
        while let Some(at) = rest.iter().position(|&byte| byte == self.delimiter) {
            self.pending.extend_from_slice(&rest[..at]);
            out.extend(self.flush(Flush::Delimiter));
            rest = &rest[at + 1..];
        }
        self.pending.extend_from_slice(rest);
    }

    /// Emits whatever is pending, if anything, and clears the buffer.
    pub fn flush(&mut self, reason: Flush) -> Option<Message> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Message {
            bytes: self.pending.split().freeze(),
            flush: reason,
        })
    }
}

#[derive(Debug)]
enum ReadState {
    Open,
    /// A read failed after a final message was handed out; report it next.
    Failed(io::Error),
    Done,
}

/// Lazily yields the messages arriving on `inner`.
///
/// Each read asks for at most `buffer_size` bytes and waits at most
/// `idle_timeout`. A read that times out with bytes pending flushes them as a
/// [`Flush::Idle`] message; otherwise the reader keeps waiting. A zero-byte
/// read is an orderly close. On close or error the pending bytes come out as a
/// final [`Flush::Closed`] message, and an error is returned on the call after
/// that.
///
/// `next_message` is cancel safe: dropping its future loses no bytes, so it
/// can sit in a `select!` next to a shutdown signal.
#[derive(Debug)]
pub struct FramedReader<R> {
    inner: R,
    framer: Framer,
    chunk: Vec<u8>,
    idle_timeout: Duration,
    ready: VecDeque<Message>,
    state: ReadState,
}

impl<R> FramedReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R, config: &RelayConfig) -> Self {
        Self {
            inner,
            framer: Framer::new(config.delimiter),
            chunk: vec![0; config.buffer_size.get()],
            idle_timeout: config.idle_timeout.max(MIN_IDLE_TIMEOUT),
            ready: VecDeque::new(),
            state: ReadState::Open,
        }
    }

    /// Returns the next message, `Ok(None)` once the stream has ended.
    pub async fn next_message(&mut self) -> io::Result<Option<Message>> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(Some(message));
            }

            match self.state {
                ReadState::Open => {}
                ReadState::Done => return Ok(None),
                ReadState::Failed(_) => {
                    if let ReadState::Failed(err) = mem::replace(&mut self.state, ReadState::Done) {
                        return Err(err);
                    }
                }
            }

            match timeout(self.idle_timeout, self.inner.read(&mut self.chunk)).await {
                Err(_elapsed) => {
                    if let Some(message) = self.framer.flush(Flush::Idle) {
                        return Ok(Some(message));
                    }
                }
                Ok(Ok(0)) => {
                    self.state = ReadState::Done;
                    return Ok(self.framer.flush(Flush::Closed));
                }
                Ok(Ok(n)) => {
                    self.framer.feed_into(&self.chunk[..n], &mut self.ready);
                }
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(err)) => {
                    return match self.framer.flush(Flush::Closed) {
                        Some(message) => {
                            self.state = ReadState::Failed(err);
                            Ok(Some(message))
                        }
                        None => {
                            self.state = ReadState::Done;
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Ends the stream from our side, returning any bytes still pending.
    ///
    /// Messages already split off but not yet returned come first.
    pub fn finish(&mut self) -> Vec<Message> {
        self.state = ReadState::Done;
        let mut rest: Vec<Message> = self.ready.drain(..).collect();
        rest.extend(self.framer.flush(Flush::Closed));
        rest
    }
}
