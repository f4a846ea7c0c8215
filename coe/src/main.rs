use std::{io::IsTerminal, net::SocketAddr};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio::{net::TcpListener, select};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coe::{
    admin::Dispatcher,
    cli::{Cli, ClientArgs, Command, ServerArgs},
    client::Client,
    console::Console,
    input,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Console for this run; prompts are only drawn for a human at a terminal.
fn console(style: coe::console::Style, prompt: &'static str) -> Console {
    let console = Console::stdout(style);
    if std::io::stdin().is_terminal() {
        console.with_prompt(prompt)
    } else {
        console
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(?error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let config = args.relay_config();
    let console = console(args.output.style(), "Command> ");

    let addr = SocketAddr::new(args.host, args.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    let server = Server::new(listener, config, console.clone());
    info!("server listening on {}", server.local_addr()?);
    console.block(server.banner()?);

    let dispatcher = Dispatcher::new(server.registry(), config, console.clone())
        .with_program_usage(Cli::command().render_long_help().to_string());
    let operator_input = input::stdin_lines().context("failed to read operator input")?;

    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn({
        let shutdown = shutdown.clone();
        server.run_until(async move { shutdown.cancelled().await })
    });

    select! {
        _ = dispatcher.run(operator_input) => {}
        _ = shutdown_signal() => console.line("Shutting down server..."),
    }

    shutdown.cancel();
    server_task.await.context("server task failed")??;
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<()> {
    let config = args.relay_config();
    let console = console(args.output.style(), "Send> ");

    let client = Client::connect(&args.host, args.port, config, console.clone()).await?;
    console.block(client.banner());

    let operator_input = input::stdin_lines().context("failed to read operator input")?;
    client
        .run_until(operator_input, shutdown_signal())
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}
