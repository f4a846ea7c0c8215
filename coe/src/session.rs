//! One accepted connection, from registration to teardown.

use std::{io, sync::Arc};

use thiserror::Error;
use tokio::{io::AsyncRead, select};
use tracing::debug;

use crate::{
    config::RelayConfig,
    console::{Console, Tag},
    framer::{FramedReader, Flush, Message},
    peer::{PeerHandle, PeerId},
    registry::{PeerRegistry, RegistryError},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Duplicate(#[from] RegistryError),
    #[error("receive error: {0}")]
    Receive(#[source] io::Error),
    #[error("send error: {0}")]
    Send(#[source] io::Error),
}

/// How the read loop stopped when no error was involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// The peer closed its side.
    PeerClosed,
    /// Our side asked the connection to close.
    LocalClose,
}

/// Drives a single peer: frames its traffic, displays it, and echoes
/// delimited messages back when echo is enabled.
pub struct Session<R> {
    id: PeerId,
    reader: FramedReader<R>,
    handle: PeerHandle,
    config: RelayConfig,
    console: Console,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        id: PeerId,
        reader: R,
        handle: PeerHandle,
        config: RelayConfig,
        console: Console,
    ) -> Self {
        Self {
            reader: FramedReader::new(reader, &config),
            id,
            handle,
            config,
            console,
        }
    }

    /// Adds the peer to `registry`, rejecting an id that is already present.
    ///
    /// Must succeed before [`Session::run`] is spawned: `close_all` only
    /// reaches peers that are registered when it runs.
    pub fn register(&self, registry: &PeerRegistry) -> Result<(), SessionError> {
        if let Err(err) = registry.register(self.id.clone(), self.handle.clone()) {
            self.console
                .line(format_args!("Rejected duplicate connection: {}", self.id));
            return Err(err.into());
        }
        self.console.line(format_args!("Client connected: {}", self.id));
        Ok(())
    }

    /// Pumps messages until the connection ends, then deregisters. Errors are
    /// reported on the console before being returned.
    pub async fn run(mut self, registry: Arc<PeerRegistry>) -> Result<(), SessionError> {
        let outcome = self.pump().await;
        for message in self.reader.finish() {
            self.show(&message);
        }

        registry.deregister(&self.id);
        if let Err(error) = self.handle.shutdown().await {
            debug!(peer = %self.id, ?error, "shutdown after session end failed");
        }

        match &outcome {
            Ok(ending) => debug!(peer = %self.id, ?ending, "session finished"),
            Err(SessionError::Receive(err)) => {
                self.console
                    .line(format_args!("[{}] Receive error: {err}", self.id));
            }
            Err(SessionError::Send(err)) => {
                self.console
                    .line(format_args!("[{}] Send error: {err}", self.id));
            }
            Err(SessionError::Duplicate(_)) => {}
        }
        self.console
            .line(format_args!("Client disconnected: {}", self.id));

        outcome.map(|_| ())
    }

    async fn pump(&mut self) -> Result<Ending, SessionError> {
        loop {
            let next = select! {
                biased;
                _ = self.handle.closed() => return Ok(Ending::LocalClose),
                next = self.reader.next_message() => next.map_err(SessionError::Receive)?,
            };
            let Some(message) = next else {
                return Ok(Ending::PeerClosed);
            };

            self.show(&message);
            if self.config.echo && message.flush() == Flush::Delimiter {
                self.echo(&message).await?;
            }
        }
    }

    fn show(&self, message: &Message) {
        self.console
            .received(Tag::Peer(&self.id), &message.text(), message.bytes());
    }

    async fn echo(&self, message: &Message) -> Result<(), SessionError> {
        let wire = self.config.frame(message.bytes());
        self.handle.send(&wire).await.map_err(SessionError::Send)?;
        self.console
            .sent(Tag::Peer(&self.id), &message.text(), &wire);
        Ok(())
    }
}
