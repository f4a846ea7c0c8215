use std::{net::IpAddr, num::NonZeroUsize, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{Delimiter, RelayConfig},
    console::Style,
};

const AFTER_HELP: &str = r"Escape sequences (in messages):
  \r    CR (0x0D)
  \n    LF (0x0A)
  \t    TAB (0x09)
  \\    Backslash (0x5C)
  \xHH  Arbitrary byte in hex (e.g. \x1B for ESC)

Examples:
  coe -s 8080
  coe -s 8080 CR --no-echo
  coe -s 8080 --buffer-size 2048 --no-color
  coe -c 127.0.0.1 8080 LF
  coe --client 192.168.1.100 8080 CR --buffer-size 512";

const LOGO: &str = concat!(
    " ██████╗ ██████╗ ███████╗\n",
    "██╔════╝██╔═══██╗██╔════╝\n",
    "██║     ██║   ██║█████╗\n",
    "██║     ██║   ██║██╔══╝\n",
    "╚██████╗╚██████╔╝███████╗\n",
    " ╚═════╝ ╚═════╝ ╚══════╝\n",
    "\n",
    " coe - Communicate and echo through sockets.\n",
    " Version ",
    env!("CARGO_PKG_VERSION"),
);

#[derive(Parser, Debug)]
#[command(
    name = "coe",
    author,
    version,
    about = "coe - Communicate and echo through sockets.",
    long_about = None,
    before_long_help = LOGO,
    after_long_help = AFTER_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Listen for clients, show their traffic and relay operator commands.
    #[command(short_flag = 's', long_flag = "server")]
    Server(ServerArgs),
    /// Connect to a server and exchange messages with it.
    #[command(short_flag = 'c', long_flag = "client")]
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Use 0 for an ephemeral port.
    pub port: u16,

    /// Message terminator.
    #[arg(value_enum, ignore_case = true, default_value = "LF")]
    pub delimiter: Delimiter,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Do not echo received messages back to the sender.
    #[arg(long)]
    pub no_echo: bool,

    #[command(flatten)]
    pub io: IoArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Server host name or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Message terminator.
    #[arg(value_enum, ignore_case = true, default_value = "LF")]
    pub delimiter: Delimiter,

    #[command(flatten)]
    pub io: IoArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct IoArgs {
    /// Bytes requested per socket read.
    #[arg(long, value_name = "SIZE", default_value = "1024")]
    pub buffer_size: NonZeroUsize,

    /// Milliseconds of silence before undelimited bytes are shown.
    #[arg(
        long = "idle-timeout",
        value_name = "MS",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub idle_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Colored output (default).
    #[arg(long, overrides_with = "no_color")]
    pub color: bool,

    /// Plain output.
    #[arg(long, overrides_with = "color")]
    pub no_color: bool,
}

impl OutputArgs {
    pub fn style(&self) -> Style {
        Style {
            color: !self.no_color,
        }
    }
}

impl ServerArgs {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            delimiter: self.delimiter,
            echo: !self.no_echo,
            buffer_size: self.io.buffer_size,
            idle_timeout: Duration::from_millis(self.io.idle_timeout_ms),
        }
    }
}

impl ClientArgs {
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            delimiter: self.delimiter,
            echo: false,
            buffer_size: self.io.buffer_size,
            idle_timeout: Duration::from_millis(self.io.idle_timeout_ms),
        }
    }
}
