//! Operator console input
//!
//! The coordinator gates the run on the operator typing `START`. Stdin is
//! read on a dedicated std thread because console reads block; the signal
//! crosses into the async driver over a oneshot channel. The same module
//! hosts the interactive prompts used when integration parameters are not
//! given on the command line.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Spawns the stdin reader that waits for the operator's `START`.
///
/// The returned receiver resolves when the command arrives. If stdin closes
/// first, the sender is dropped and the coordinator treats the run as
/// cancelled.
pub fn spawn_start_listener() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    std::thread::spawn(move || {
        info!("type START and press Enter to begin integration");

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("START") {
                info!("START command received");
                let _ = tx.send(());
                return;
            }
            warn!(input = line.trim(), "unrecognized command, type START to begin");
        }
        // stdin closed without a START; dropping tx cancels the run.
    });

    rx
}

/// Prompts for one numeric value, re-prompting until the input parses.
pub fn prompt_f64(prompt: &str) -> Result<f64> {
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("{prompt}: ");
        io::stdout().flush().context("failed to flush stdout")?;

        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("failed to read from console")?;
        if read == 0 {
            anyhow::bail!("console closed while waiting for input");
        }

        match line.trim().parse::<f64>() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Invalid input. Please enter a number."),
        }
    }
}
