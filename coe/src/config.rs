//! Run configuration shared read-only by every connection.

use std::{fmt, num::NonZeroUsize, time::Duration};

use clap::ValueEnum;

/// Silence window after which undelimited bytes are flushed as a message.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes requested from the socket per read.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// The single byte that ends a message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum Delimiter {
    /// Line feed, 0x0A.
    #[default]
    Lf,
    /// Carriage return, 0x0D.
    Cr,
}

impl Delimiter {
    pub const fn byte(self) -> u8 {
        match self {
            Delimiter::Lf => 0x0A,
            Delimiter::Cr => 0x0D,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Delimiter::Lf => "LF",
            Delimiter::Cr => "CR",
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.byte())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub delimiter: Delimiter,
    /// Send each delimited message back to the peer it came from.
    pub echo: bool,
    pub buffer_size: NonZeroUsize,
    pub idle_timeout: Duration,
}

impl RelayConfig {
    /// Appends the delimiter to `payload`, producing the bytes that go on the wire.
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.extend_from_slice(payload);
        framed.push(self.delimiter.byte());
        framed
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            echo: true,
            buffer_size: NonZeroUsize::new(DEFAULT_BUFFER_SIZE).unwrap_or(NonZeroUsize::MIN),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}
