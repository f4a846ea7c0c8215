//! Delimiter-framed TCP text relay.
//!
//! `coe` runs either as a server that accepts many peers or as a client that
//! talks to one server. Free-form text is split into messages on a single
//! delimiter byte (LF or CR), timestamped, shown with a hex dump, and
//! optionally echoed back. The server operator can address one peer with
//! `#send` or all of them with `#broadcast`. Each module focuses on a
//! concrete responsibility:
//!
//! - [`framer`] turns a raw byte stream into messages, flushing undelimited
//!   bytes after a short silence.
//! - [`registry`] keeps the table of connected peers safe to use from many
//!   tasks at once.
//! - [`escape`] decodes `\r`, `\n`, `\t`, `\\` and `\xHH` in operator input.
//! - [`session`] drives one accepted connection end to end.
//! - [`admin`] parses and executes the server operator's commands.
//! - [`server`] and [`client`] wire the pieces to real sockets.
//! - [`console`] renders traffic records without interleaving lines.
//! - [`cli`], [`config`] and [`input`] cover argument parsing, run settings
//!   and reading operator lines.

pub mod admin;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod escape;
pub mod framer;
pub mod input;
pub mod peer;
pub mod registry;
pub mod server;
pub mod session;
