//! Operator-facing output.
//!
//! Every traffic event becomes one line carrying who it concerns, a
//! millisecond timestamp, the direction, the text, the byte count and a hex
//! dump of the bytes on the wire. Lines are written whole under a lock so
//! concurrent sessions never interleave mid-line.

use std::{
    fmt::{self, Write as _},
    io::{self, Write},
    sync::Arc,
};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::debug;

use crate::peer::PeerId;

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const PURPLE: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";

/// Moves to column 0 and clears the line, wiping a half-drawn prompt.
const CLEAR_LINE: &str = "\r\x1b[K";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub color: bool,
}

impl Style {
    fn paint(self, color: &'static str, text: impl fmt::Display) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

/// Whose traffic a record describes.
#[derive(Debug, Clone, Copy)]
pub enum Tag<'a> {
    /// One of the listening side's peers.
    Peer(&'a PeerId),
    /// The single connection of the connecting side.
    Link,
}

#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub tag: Tag<'a>,
    pub direction: Direction,
    /// What to show as the message text.
    pub text: &'a str,
    /// The exact bytes that crossed the socket.
    pub wire: &'a [u8],
}

impl Record<'_> {
    pub fn render(&self, style: Style, at: DateTime<Local>) -> String {
        let timestamp = style.paint(YELLOW, at.format(TIMESTAMP_FORMAT));
        let bytes = style.paint(CYAN, self.wire.len());
        let hex = style.paint(PURPLE, hex_dump(self.wire));

        match self.tag {
            Tag::Peer(peer) => {
                let (color, label) = match self.direction {
                    Direction::Received => (GREEN, "Received:"),
                    Direction::Sent => (RED, "Sent:"),
                };
                format!(
                    "{} {timestamp} | {} {} (Bytes: {bytes}, HEX: {hex})",
                    style.paint(BLUE, format_args!("[{peer}]")),
                    style.paint(color, label),
                    self.text,
                )
            }
            Tag::Link => {
                let label = match self.direction {
                    Direction::Received => style.paint(GREEN, "[Recv]"),
                    Direction::Sent => style.paint(CYAN, "[Send]"),
                };
                format!(
                    "{label} {timestamp} | {} (Bytes: {bytes}, HEX: {hex})",
                    self.text
                )
            }
        }
    }
}

/// Lowercase hex without separators.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

type Sink = Box<dyn Write + Send>;

/// Shared line writer for traffic records and status lines.
#[derive(Clone)]
pub struct Console {
    style: Style,
    prompt: Option<&'static str>,
    sink: Arc<Mutex<Sink>>,
}

impl Console {
    pub fn stdout(style: Style) -> Self {
        Self::with_writer(style, io::stdout())
    }

    pub fn with_writer<W>(style: Style, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            style,
            prompt: None,
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Redraws `prompt` after every line; meant for interactive terminals.
    pub fn with_prompt(mut self, prompt: &'static str) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn record(&self, record: Record<'_>) {
        self.line(record.render(self.style, Local::now()));
    }

    pub fn received(&self, tag: Tag<'_>, text: &str, wire: &[u8]) {
        self.record(Record {
            tag,
            direction: Direction::Received,
            text,
            wire,
        });
    }

    pub fn sent(&self, tag: Tag<'_>, text: &str, wire: &[u8]) {
        self.record(Record {
            tag,
            direction: Direction::Sent,
            text,
            wire,
        });
    }

    /// Writes one line, keeping the prompt (if any) below it.
    pub fn line(&self, line: impl fmt::Display) {
        let mut out = String::new();
        if self.prompt.is_some() {
            out.push_str(CLEAR_LINE);
        }
        let _ = writeln!(out, "{line}");
        if let Some(prompt) = self.prompt {
            out.push_str(prompt);
        }
        self.write(&out);
    }

    /// Writes a block of lines without redrawing the prompt in between.
    pub fn block<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        let mut out = String::new();
        if self.prompt.is_some() {
            out.push_str(CLEAR_LINE);
        }
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        if let Some(prompt) = self.prompt {
            out.push_str(prompt);
        }
        self.write(&out);
    }

    /// Draws the prompt on its own, e.g. before the first input line.
    pub fn prompt(&self) {
        if let Some(prompt) = self.prompt {
            self.write(prompt);
        }
    }

    fn write(&self, text: &str) {
        let mut sink = self.sink.lock();
        if let Err(error) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
            debug!(?error, "failed to write console output");
        }
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("style", &self.style)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

/// In-memory sink, used to capture console output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const PLAIN: Style = Style { color: false };

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn listening_side_records_name_the_peer() {
        let peer = PeerId::from("10.0.0.2:51000");
        let record = Record {
            tag: Tag::Peer(&peer),
            direction: Direction::Received,
            text: "hello",
            wire: b"hello",
        };
        assert_eq!(
            record.render(PLAIN, fixed_time()),
            "[10.0.0.2:51000] 2024-03-09 14:05:07.000 | Received: hello (Bytes: 5, HEX: 68656c6c6f)"
        );

        let sent = Record {
            direction: Direction::Sent,
            wire: b"hello\n",
            ..record
        };
        assert_eq!(
            sent.render(PLAIN, fixed_time()),
            "[10.0.0.2:51000] 2024-03-09 14:05:07.000 | Sent: hello (Bytes: 6, HEX: 68656c6c6f0a)"
        );
    }

    #[test]
    fn connecting_side_records_use_fixed_labels() {
        let received = Record {
            tag: Tag::Link,
            direction: Direction::Received,
            text: "pong",
            wire: b"pong",
        };
        assert_eq!(
            received.render(PLAIN, fixed_time()),
            "[Recv] 2024-03-09 14:05:07.000 | pong (Bytes: 4, HEX: 706f6e67)"
        );

        let sent = Record {
            direction: Direction::Sent,
            text: r"ping\r",
            wire: b"ping\r\n",
            ..received
        };
        assert_eq!(
            sent.render(PLAIN, fixed_time()),
            r"[Send] 2024-03-09 14:05:07.000 | ping\r (Bytes: 6, HEX: 70696e670d0a)"
        );
    }

    #[test]
    fn color_wraps_fields_in_ansi_codes() {
        let record = Record {
            tag: Tag::Link,
            direction: Direction::Received,
            text: "x",
            wire: b"x",
        };
        let rendered = record.render(Style { color: true }, fixed_time());
        assert!(rendered.starts_with("\x1b[32m[Recv]\x1b[0m"));
        assert!(rendered.contains("\x1b[35m78\x1b[0m"));
    }

    #[test]
    fn hex_dump_is_lowercase_and_unseparated() {
        assert_eq!(hex_dump(&[0x00, 0xAB, 0x1f]), "00ab1f");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn prompt_is_cleared_and_redrawn_around_lines() {
        let buffer = SharedBuffer::new();
        let console = Console::with_writer(PLAIN, buffer.clone()).with_prompt("Send> ");

        console.prompt();
        console.line("hello");

        assert_eq!(buffer.contents(), "Send> \r\x1b[Khello\nSend> ");
    }

    #[test]
    fn lines_without_prompt_are_plain() {
        let buffer = SharedBuffer::new();
        let console = Console::with_writer(PLAIN, buffer.clone());

        console.line("one");
        console.block(["two", "three"]);

        assert_eq!(buffer.lines(), vec!["one", "two", "three"]);
    }
}
