use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::time::{timeout_at, Instant};

/// Environment variable re-injected into every spawned server process.
pub const TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// The single fixed argument: tells the server to speak over stdio.
const SERVER_ARG: &str = "stdio";

/// Immutable settings shared by every bridge invocation.
pub struct BridgeConfig {
    pub server_path: PathBuf,
    pub token: String,
    pub timeout: Duration,
}

/// What one bridge invocation produced.
///
/// `error` is kept even when the outcome is non-fatal so callers can log it;
/// only [`Outcome::is_fatal`] decides the response status.
pub struct Outcome {
    pub stdout: Vec<u8>,
    pub error: Option<BridgeError>,
}

impl Outcome {
    fn fatal(error: BridgeError) -> Self {
        Outcome {
            stdout: Vec::new(),
            error: Some(error),
        }
    }

    /// A process error only poisons the response when nothing was captured.
    pub fn is_fatal(&self) -> bool {
        self.error.is_some() && self.stdout.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn server: {0}")]
    Spawn(io::Error),
    #[error("failed to acquire {0} pipe")]
    Pipe(&'static str),
    #[error("server exited with {0}")]
    Exit(ExitStatus),
    #[error("failed to await server exit: {0}")]
    Wait(io::Error),
    #[error("server timed out")]
    Timeout,
}

/// Runs one request payload through a fresh server process.
///
/// Never fails as such; every failure mode folds into the returned outcome.
/// One deadline bounds the whole write-read-wait sequence, and the child is
/// killed once it elapses. `kill_on_drop` covers the remaining exits: early
/// pipe failures and the caller dropping this future on client disconnect.
pub async fn run(config: &BridgeConfig, payload: &[u8], id: u64) -> Outcome {
    let deadline = Instant::now() + config.timeout;

    let mut command = Command::new(&config.server_path);
    command
        .arg(SERVER_ARG)
        .env(TOKEN_ENV, &config.token)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::error!(id; "failed to spawn {}: {e}", config.server_path.display());
            return Outcome::fatal(BridgeError::Spawn(e));
        }
    };

    let Some(mut stdin) = child.stdin.take() else {
        return Outcome::fatal(BridgeError::Pipe("stdin"));
    };
    let Some(mut stdout) = child.stdout.take() else {
        return Outcome::fatal(BridgeError::Pipe("stdout"));
    };
    let Some(mut stderr) = child.stderr.take() else {
        return Outcome::fatal(BridgeError::Pipe("stderr"));
    };

    // Detached drain; observed only through the log, never joined.
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if stderr.read_to_end(&mut buf).await.is_ok() && !buf.is_empty() {
            log::warn!(id; "server stderr: {}", String::from_utf8_lossy(&buf).trim_end());
        }
    });

    // A short write may still have delivered a usable request, so delivery
    // failures don't abort the bridge.
    match timeout_at(deadline, deliver(&mut stdin, payload)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!(id; "failed writing to server stdin: {e}"),
        Err(_) => log::warn!(id; "deadline hit while writing to server stdin"),
    }
    // Dropping the handle closes the pipe: end-of-input for the child.
    drop(stdin);

    let mut output = Vec::new();
    loop {
        match timeout_at(deadline, stdout.read_buf(&mut output)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                log::warn!(id; "failed reading server stdout: {e}");
                break;
            }
            Err(_) => {
                log::warn!(id; "deadline hit while reading server stdout");
                break;
            }
        }
    }

    let error = match timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) if status.success() => None,
        Ok(Ok(status)) => Some(BridgeError::Exit(status)),
        Ok(Err(e)) => Some(BridgeError::Wait(e)),
        Err(_) => {
            // kill() also reaps, so no zombie is left behind.
            if let Err(e) = child.kill().await {
                log::warn!(id; "failed to kill timed-out server: {e}");
            }
            Some(BridgeError::Timeout)
        }
    };

    if let Some(e) = &error {
        log::warn!(id; "server finished with error: {e}");
    }

    Outcome {
        stdout: output,
        error,
    }
}

async fn deliver(stdin: &mut ChildStdin, payload: &[u8]) -> io::Result<()> {
    stdin.write_all(payload).await?;
    stdin.shutdown().await
}
