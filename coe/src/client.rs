use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{net::TcpStream, select, sync::mpsc};
use tracing::{debug, info};

use crate::{
    config::RelayConfig,
    console::{Console, Tag},
    escape,
    framer::FramedReader,
    peer::PeerHandle,
};

/// The connecting side: one connection, operator lines out, framed
/// messages in.
pub struct Client {
    stream: TcpStream,
    server: SocketAddr,
    config: RelayConfig,
    console: Console,
}

impl Client {
    pub async fn connect(host: &str, port: u16, config: RelayConfig, console: Console) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("failed to connect to {host}:{port}"))?;
        let server = stream.peer_addr()?;
        info!(%server, "connected");

        Ok(Self {
            stream,
            server,
            config,
            console,
        })
    }

    pub fn banner(&self) -> Vec<String> {
        vec![
            format!("Connection successful: {}", self.server),
            format!("Terminator: {}", self.config.delimiter),
            format!("Buffer size: {} bytes", self.config.buffer_size),
            "Chat started. Enter messages:".to_string(),
            "----------------------------------------".to_string(),
        ]
    }

    /// Sends each operator line until `shutdown` resolves, a send fails, or
    /// the server closes the connection.
    ///
    /// When operator input ends, the write side is shut down and the client
    /// keeps displaying traffic until the server closes its side.
    pub async fn run_until<F>(self, mut input: mpsc::Receiver<String>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Client {
            stream,
            config,
            console,
            ..
        } = self;
        let (reader, writer) = stream.into_split();
        let link = PeerHandle::new(writer);
        let receiver = tokio::spawn(receive_loop(
            FramedReader::new(reader, &config),
            link.clone(),
            console.clone(),
        ));

        tokio::pin!(shutdown);
        let mut input_open = true;
        console.prompt();

        loop {
            select! {
                line = input.recv(), if input_open => match line {
                    Some(line) => {
                        if !handle_input_line(&line, &link, &config, &console).await {
                            break;
                        }
                    }
                    None => {
                        input_open = false;
                        half_close(&link).await;
                    }
                },
                _ = link.closed() => break,
                _ = &mut shutdown => {
                    console.line("Disconnecting...");
                    break;
                }
            }
        }

        link.close();
        half_close(&link).await;
        receiver.await.context("receive task failed")?;
        Ok(())
    }
}

async fn handle_input_line(
    line: &str,
    link: &PeerHandle,
    config: &RelayConfig,
    console: &Console,
) -> bool {
    if line.is_empty() {
        console.prompt();
        return true;
    }

    let wire = config.frame(&escape::decode(line));
    match link.send(&wire).await {
        Ok(()) => {
            console.sent(Tag::Link, line, &wire);
            true
        }
        Err(err) => {
            console.line(format_args!("Send error: {err}"));
            false
        }
    }
}

async fn half_close(link: &PeerHandle) {
    if let Err(error) = link.shutdown().await {
        debug!(?error, "failed to shut down client writer cleanly");
    }
}

async fn receive_loop<R>(mut framed: FramedReader<R>, link: PeerHandle, console: Console)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let result = loop {
        let next = select! {
            biased;
            _ = link.closed() => break Ok(()),
            next = framed.next_message() => next,
        };
        match next {
            Ok(Some(message)) => console.received(Tag::Link, &message.text(), message.bytes()),
            Ok(None) => {
                console.line("Connection closed by server");
                break Ok(());
            }
            Err(err) => break Err(err),
        }
    };

    for message in framed.finish() {
        console.received(Tag::Link, &message.text(), message.bytes());
    }
    if let Err(err) = result {
        console.line(format_args!("Receive error: {err}"));
    }
    link.close();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        time::timeout,
    };

    use super::*;
    use crate::{
        config::Delimiter,
        console::{SharedBuffer, Style},
    };

    const WAIT: Duration = Duration::from_secs(2);

    async fn client_against(
        listener: &TcpListener,
        config: RelayConfig,
    ) -> Result<(Client, TcpStream, SharedBuffer)> {
        let addr = listener.local_addr()?;
        let output = SharedBuffer::new();
        let console = Console::with_writer(Style { color: false }, output.clone());
        let client = Client::connect("127.0.0.1", addr.port(), config, console).await?;
        let (server_side, _) = listener.accept().await?;
        Ok((client, server_side, output))
    }

    #[tokio::test]
    async fn sends_decoded_lines_and_displays_replies() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let config = RelayConfig {
            delimiter: Delimiter::Cr,
            ..RelayConfig::default()
        };
        let (client, mut server_side, output) = client_against(&listener, config).await?;
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(client.run_until(rx, std::future::pending()));

        tx.send(r"AT\x2b".to_string()).await?;
        let mut sent = [0u8; 4];
        timeout(WAIT, server_side.read_exact(&mut sent)).await??;
        assert_eq!(&sent, b"AT+\r");

        server_side.write_all(b"OK\r").await?;
        drop(tx);
        let mut rest = Vec::new();
        timeout(WAIT, server_side.read_to_end(&mut rest)).await??;
        drop(server_side);

        timeout(WAIT, task).await???;
        let lines = output.lines();
        assert!(lines
            .iter()
            .any(|line| line.starts_with("[Send] ") && line.ends_with(r"| AT\x2b (Bytes: 4, HEX: 41542b0d)")));
        assert!(lines.iter().any(|line| line.ends_with("| OK (Bytes: 2, HEX: 4f4b)")));
        assert_eq!(lines.last().map(String::as_str), Some("Connection closed by server"));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_flushes_undelimited_bytes() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let config = RelayConfig {
            idle_timeout: Duration::from_secs(30),
            ..RelayConfig::default()
        };
        let (client, mut server_side, output) = client_against(&listener, config).await?;
        let (_tx, rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(client.run_until(rx, async move {
            let _ = stop_rx.await;
        }));

        server_side.write_all(b"prompt> ").await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = stop_tx.send(());
        timeout(WAIT, task).await???;

        let contents = output.contents();
        assert!(contents.contains("Disconnecting..."));
        assert!(contents.contains("| prompt>  (Bytes: 8, HEX: 70726f6d70743e20)"));
        Ok(())
    }
}
