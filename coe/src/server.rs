use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    config::RelayConfig,
    console::Console,
    peer::{PeerHandle, PeerId},
    registry::PeerRegistry,
    session::Session,
};

/// The listening side: accepts peers and runs one session task per peer.
pub struct Server {
    listener: TcpListener,
    registry: Arc<PeerRegistry>,
    config: RelayConfig,
    console: Console,
}

impl Server {
    pub fn new(listener: TcpListener, config: RelayConfig, console: Console) -> Self {
        Self {
            listener,
            registry: Arc::new(PeerRegistry::new()),
            config,
            console,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry sessions register into; shared with the operator loop.
    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Startup summary shown before the first connection.
    pub fn banner(&self) -> std::io::Result<Vec<String>> {
        let echo = if self.config.echo { "Enabled" } else { "Disabled" };
        Ok(vec![
            format!("Server started on {}", self.local_addr()?),
            format!("Terminator: {}", self.config.delimiter),
            format!("Buffer size: {} bytes", self.config.buffer_size),
            format!("Echo back: {echo}"),
            "Waiting for client connections...".to_string(),
            "Commands: '#send <clientIP> <message>' to send to specific client".to_string(),
            "Commands: '#broadcast <message>' to send to all clients".to_string(),
            "Commands: '#list' to show connected clients".to_string(),
            "Commands: '#help' to show available commands".to_string(),
            "Commands: '#quit', '#exit' to shut down the server".to_string(),
            "----------------------------------------".to_string(),
        ])
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// session and waits for them to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            registry,
            config,
            console,
        } = self;
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry, config, &console, &mut sessions);
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(error) = joined {
                        warn!(?error, "session task failed");
                    }
                }
            }
        }

        drop(listener);
        handle_shutdown(&registry, &console, &mut sessions).await;
        Ok(())
    }
}

async fn handle_shutdown(
    registry: &PeerRegistry,
    console: &Console,
    sessions: &mut JoinSet<()>,
) {
    let open = registry.close_all();
    info!(open, "server shutting down");
    if open > 0 {
        console.line(format_args!("Closing {open} client connection(s)..."));
    }
    while let Some(joined) = sessions.join_next().await {
        if let Err(error) = joined {
            warn!(?error, "session task failed during shutdown");
        }
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<PeerRegistry>,
    config: RelayConfig,
    console: &Console,
    sessions: &mut JoinSet<()>,
) {
    match result {
        Ok((stream, addr)) => spawn_session(stream, addr, registry, config, console, sessions),
        Err(error) => {
            warn!(?error, "failed to accept connection");
            console.line(format_args!("Connection error: {error}"));
        }
    }
}

fn spawn_session(
    stream: TcpStream,
    addr: SocketAddr,
    registry: &Arc<PeerRegistry>,
    config: RelayConfig,
    console: &Console,
    sessions: &mut JoinSet<()>,
) {
    let id = PeerId::from(addr);
    let (reader, writer) = stream.into_split();
    let session = Session::new(
        id.clone(),
        reader,
        PeerHandle::new(writer),
        config,
        console.clone(),
    );

    // Registered here, in the accept loop, so a shutdown that follows can
    // always reach the new peer.
    if let Err(error) = session.register(registry) {
        warn!(peer = %id, %error, "rejecting duplicate connection");
        return;
    }

    let registry = Arc::clone(registry);
    sessions.spawn(async move {
        match session.run(registry).await {
            Ok(()) => debug!(peer = %id, "client session closed"),
            Err(error) => warn!(peer = %id, %error, "client connection closed with error"),
        }
    });
}
