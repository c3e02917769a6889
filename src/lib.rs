#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use crate::ssh::SshError;

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod mutate;
pub mod reports;
pub mod session;
pub mod ssh;
pub mod state;
#[cfg(test)]
mod tests;

#[derive(Debug)]
pub enum SwitchHandError {
    Config(String),
    Generic(String),
    Io(std::io::Error),
    NoTargetsSpecified,
    NotFound(String),
    Parse(String),
    Serde(String),
    Ssh(SshError),
}

impl PartialEq for SwitchHandError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl From<SshError> for SwitchHandError {
    fn from(err: SshError) -> Self {
        SwitchHandError::Ssh(err)
    }
}

impl From<std::io::Error> for SwitchHandError {
    fn from(err: std::io::Error) -> Self {
        SwitchHandError::Io(err)
    }
}

impl From<serde_json::Error> for SwitchHandError {
    fn from(err: serde_json::Error) -> Self {
        SwitchHandError::Serde(err.to_string())
    }
}

impl std::fmt::Display for SwitchHandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchHandError::Config(error) => write!(f, "Config error: {error}"),
            SwitchHandError::Generic(error) => write!(f, "Generic error: {error}"),
            SwitchHandError::Io(error) => write!(f, "IO error: {error}"),
            SwitchHandError::NoTargetsSpecified => {
                write!(f, "No target interfaces specified")
            }
            SwitchHandError::NotFound(error) => write!(f, "Not found error: {error}"),
            SwitchHandError::Parse(error) => write!(f, "Parse error: {error}"),
            SwitchHandError::Serde(error) => write!(f, "Serde error: {error}"),
            SwitchHandError::Ssh(error) => write!(f, "SSH error: {error}"),
        }
    }
}

impl std::error::Error for SwitchHandError {}

#[cfg(test)]
pub(crate) fn setup_test_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_test_writer()
                .with_level(true),
        )
        .with(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}
