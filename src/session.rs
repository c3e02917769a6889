//! The Command Session contract: one remote CLI session per logical
//! operation, acquired and released inside a single call.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ssh::SshError;

/// An established interactive CLI session on one device. Implemented by
/// [`crate::ssh::SshClient`] for real devices and by in-memory mocks in
/// tests; the core never depends on a specific transport.
#[async_trait]
pub trait CliSession: Send {
    /// Run one command in exec mode and return its raw output.
    async fn send_exec(&mut self, command: &str) -> Result<String, SshError>;

    /// Apply an ordered batch of lines as one configuration transaction:
    /// enter configuration mode, apply every line in order, exit. Per-line
    /// echo verification is disabled so slow administrative commands
    /// (shutdown toggles) do not stall the session.
    async fn send_config_set(&mut self, lines: &[String]) -> Result<String, SshError>;

    /// Elevate to privileged mode.
    async fn elevate(&mut self) -> Result<(), SshError>;

    /// Tear the session down cleanly.
    async fn disconnect(&mut self) -> Result<(), SshError>;
}

/// Opens sessions against one configured device.
#[async_trait]
pub trait CliConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CliSession>, SshError>;
}

/// Run read-only commands in exec mode over one freshly opened session.
///
/// Outputs are concatenated in command order, each followed by a newline
/// separator. Any command failing aborts the whole call with no partial
/// output. The session is released whether the commands succeed or not.
pub async fn run_exec_commands(
    connector: &dyn CliConnector,
    commands: &[String],
) -> Result<String, SshError> {
    let mut session = connector.connect().await?;

    let mut combined = String::new();
    let mut result = Ok(());
    for command in commands {
        match session.send_exec(command).await {
            Ok(output) => {
                combined.push_str(&output);
                combined.push('\n');
            }
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }

    release(session).await;
    result.map(|()| combined)
}

/// Apply one configuration transaction over one freshly opened, elevated
/// session. The session is released whether the transaction succeeds or
/// not; on failure no output is returned.
pub async fn run_config_transaction(
    connector: &dyn CliConnector,
    lines: &[String],
) -> Result<String, SshError> {
    let mut session = connector.connect().await?;

    let result = match session.elevate().await {
        Ok(()) => session.send_config_set(lines).await,
        Err(err) => Err(err),
    };

    release(session).await;
    result
}

async fn release(mut session: Box<dyn CliSession>) {
    debug!("Releasing CLI session");
    if let Err(err) = session.disconnect().await {
        // the operation outcome is already decided; a failed teardown is
        // only worth a log line
        warn!("Failed to disconnect CLI session cleanly: {err}");
    }
}
