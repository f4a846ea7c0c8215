use std::{
    io::{self, BufRead},
    thread,
};

use tokio::sync::mpsc;
use tracing::warn;

/// Reads operator lines from stdin on a dedicated thread.
///
/// A blocking read stuck on a plain thread does not keep the process alive
/// once `main` returns, which a pending `tokio::io::stdin` read would.
/// The channel closes when stdin reaches EOF.
pub fn stdin_lines() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(?error, "failed to read operator input");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}
