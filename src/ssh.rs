use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key};
use russh::{Channel, ChannelMsg, Disconnect, client, keys::ssh_key};
use tracing::{debug, trace, warn};

use crate::config::DeviceConfig;
use crate::session::{CliConnector, CliSession};

#[derive(Debug, Clone)]
pub enum AuthMethod {
    KeyFile {
        path: String,
        passphrase: Option<String>,
    },
    Password(String),
}

#[derive(Debug)]
pub enum SshError {
    Connection(String),
    Authentication(String),
    Command(String),
    Timeout,
}

impl std::fmt::Display for SshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshError::Connection(msg) => write!(f, "Connection error: {}", msg),
            SshError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            SshError::Command(msg) => write!(f, "Command error: {}", msg),
            SshError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for SshError {}

// Handler for russh client
#[derive(Clone)]
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;
    #[allow(unused_variables)]
    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Which shell prompts terminate a read.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PromptWait {
    /// Any exec or config prompt (`>`, `#`, `(config)#`, ...)
    Any,
    /// Only a top-level privileged prompt - used after `end` so a read does
    /// not stop early on an intermediate `(config-if)#` prompt
    NonConfig,
    /// Any prompt, or a `Password:` challenge (privilege elevation)
    AnyOrPassword,
}

pub struct SshClient {
    username: String,
    command_timeout: Duration,
    enable_password: Option<String>,
    handle: client::Handle<ClientHandler>,
    shell: Option<Channel<client::Msg>>,
    privileged: bool,
}

impl SshClient {
    pub async fn connect(
        device: &DeviceConfig,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, SshError> {
        let username = device.ssh_username.clone().ok_or_else(|| {
            SshError::Authentication(format!("No SSH username configured for {}", device.hostname))
        })?;

        let address = Self::resolve_address(device).await?;

        let mut config = client::Config::default();

        // Add legacy algorithms for compatibility with older Cisco devices
        config.preferred.kex = vec![
            // Modern algorithms first
            russh::kex::CURVE25519,
            russh::kex::DH_G14_SHA256,
            russh::kex::DH_G16_SHA512,
            // Legacy algorithms for Cisco compatibility
            russh::kex::ECDH_SHA2_NISTP256,
            russh::kex::ECDH_SHA2_NISTP384,
            russh::kex::ECDH_SHA2_NISTP521,
            russh::kex::DH_G14_SHA1,
        ]
        .into();

        let handle = tokio::time::timeout(
            connect_timeout,
            client::connect(Arc::new(config), address, ClientHandler),
        )
        .await
        .map_err(|_| SshError::Timeout)?
        .map_err(|e| SshError::Connection(e.to_string()))?;

        let mut client = Self {
            username,
            command_timeout,
            enable_password: device.enable_password.clone(),
            handle,
            shell: None,
            privileged: false,
        };

        client.authenticate(device).await?;
        Ok(client)
    }

    async fn resolve_address(device: &DeviceConfig) -> Result<SocketAddr, SshError> {
        if let Some(ip) = device.ip_address {
            return Ok(SocketAddr::new(ip, device.ssh_port));
        }

        let mut addrs = tokio::net::lookup_host((device.hostname.as_str(), device.ssh_port))
            .await
            .map_err(|e| {
                SshError::Connection(format!("Failed to resolve {}: {}", device.hostname, e))
            })?;
        addrs.next().ok_or_else(|| {
            SshError::Connection(format!("{} resolved to no addresses", device.hostname))
        })
    }

    async fn authenticate(&mut self, device: &DeviceConfig) -> Result<(), SshError> {
        let auth_methods = vec![
            device.ssh_key_path.as_ref().map(|path| AuthMethod::KeyFile {
                path: path.clone(),
                passphrase: device.ssh_key_passphrase.clone(),
            }),
            device.ssh_password.as_ref().map(|pwd| AuthMethod::Password(pwd.clone())),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        if auth_methods.is_empty() {
            return Err(SshError::Authentication(format!(
                "No SSH credentials configured for {}",
                device.hostname
            )));
        }

        for auth_method in auth_methods {
            if self.try_auth_method(&auth_method).await? {
                return Ok(());
            }
        }

        Err(SshError::Authentication(
            "All authentication methods failed".to_string(),
        ))
    }

    async fn try_auth_method(&mut self, auth_method: &AuthMethod) -> Result<bool, SshError> {
        match auth_method {
            AuthMethod::KeyFile { path, passphrase } => {
                let expanded_path = shellexpand::tilde(path);
                let key_path = std::path::Path::new(expanded_path.as_ref());

                if !key_path.exists() {
                    debug!("SSH key file does not exist: {}", expanded_path);
                    return Ok(false);
                }

                let key_data = match std::fs::read_to_string(key_path) {
                    Ok(data) => data,
                    Err(e) => {
                        debug!("Failed to read key file {}: {}", expanded_path, e);
                        return Ok(false);
                    }
                };

                let private_key = match decode_secret_key(&key_data, passphrase.as_deref()) {
                    Ok(key) => key,
                    Err(e) => {
                        debug!("Failed to decode key file {}: {}", expanded_path, e);
                        return Ok(false);
                    }
                };

                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(private_key), None);

                match self
                    .handle
                    .authenticate_publickey(&self.username, key_with_hash)
                    .await
                {
                    Ok(result) => {
                        let success = matches!(result, client::AuthResult::Success);
                        if success {
                            debug!("Authenticated via key file: {}", expanded_path);
                        } else {
                            warn!("Key file authentication failed: {}", expanded_path);
                        }
                        Ok(success)
                    }
                    Err(e) => {
                        debug!("Key file authentication error: {}", e);
                        Ok(false)
                    }
                }
            }
            AuthMethod::Password(password) => {
                match self
                    .handle
                    .authenticate_password(&self.username, password)
                    .await
                {
                    Ok(result) => {
                        let success = matches!(result, client::AuthResult::Success);
                        if success {
                            debug!("Authenticated via password");
                        } else {
                            debug!("Password authentication failed");
                        }
                        Ok(success)
                    }
                    Err(e) => {
                        debug!("Password authentication error: {}", e);
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Last non-empty line of the accumulated output, used for prompt
    /// detection.
    fn tail_line(output: &str) -> &str {
        output
            .lines()
            .rev()
            .map(str::trim_end)
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }

    fn prompt_reached(output: &str, wait: PromptWait) -> bool {
        let tail = Self::tail_line(output);
        let trimmed = tail.trim();
        match wait {
            PromptWait::Any => trimmed.ends_with('#') || trimmed.ends_with('>'),
            PromptWait::NonConfig => trimmed.ends_with('#') && !trimmed.contains("(config"),
            PromptWait::AnyOrPassword => {
                trimmed.ends_with('#')
                    || trimmed.ends_with('>')
                    || trimmed.ends_with("Password:")
                    || trimmed.ends_with("assword:")
            }
        }
    }

    /// Read channel output until a prompt of the requested kind appears or
    /// the command timeout elapses.
    async fn read_shell(
        channel: &mut Channel<client::Msg>,
        timeout: Duration,
        wait: PromptWait,
    ) -> Result<String, SshError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(SshError::Timeout);
            }

            match tokio::time::timeout(deadline - now, channel.wait()).await {
                Err(_) => return Err(SshError::Timeout),
                Ok(None) => break,
                Ok(Some(ChannelMsg::Data { data })) => {
                    buffer.extend_from_slice(&data);
                    let text = String::from_utf8_lossy(&buffer);
                    if Self::prompt_reached(&text, wait) {
                        break;
                    }
                }
                Ok(Some(ChannelMsg::ExtendedData { data, ext: 1 })) => {
                    buffer.extend_from_slice(&data);
                }
                Ok(Some(ChannelMsg::Eof))
                | Ok(Some(ChannelMsg::Close))
                | Ok(Some(ChannelMsg::ExitStatus { .. })) => break,
                Ok(Some(other)) => {
                    trace!("Ignoring channel message: {:?}", other);
                }
            }
        }

        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    async fn send_line(channel: &mut Channel<client::Msg>, line: &str) -> Result<(), SshError> {
        trace!("Sending line: {}", line);
        let data = format!("{line}\n");
        channel
            .data(data.as_bytes())
            .await
            .map_err(|e| SshError::Command(format!("Failed to send '{line}': {e}")))
    }

    /// Open the interactive shell channel on first use: pty + shell, wait
    /// out the banner, disable paging so reports arrive whole.
    async fn shell(&mut self) -> Result<&mut Channel<client::Msg>, SshError> {
        if self.shell.is_none() {
            debug!("Opening interactive shell channel");
            let mut channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|e| SshError::Command(format!("Failed to create channel: {e}")))?;

            channel
                .request_pty(true, "vt100", 200, 50, 0, 0, &[])
                .await
                .map_err(|e| SshError::Command(format!("Failed to request pty: {e}")))?;
            channel
                .request_shell(true)
                .await
                .map_err(|e| SshError::Command(format!("Failed to request shell: {e}")))?;

            let banner =
                Self::read_shell(&mut channel, self.command_timeout, PromptWait::Any).await?;
            self.privileged = Self::tail_line(&banner).trim().ends_with('#');

            Self::send_line(&mut channel, "terminal length 0").await?;
            Self::read_shell(&mut channel, self.command_timeout, PromptWait::Any).await?;

            self.shell = Some(channel);
        }

        // the Option is guaranteed filled above
        self.shell
            .as_mut()
            .ok_or_else(|| SshError::Command("Shell channel unavailable".to_string()))
    }

    /// Lines starting with `%` are how IOS reports a rejected or
    /// unparseable command.
    fn device_error(output: &str) -> Option<String> {
        output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with('%'))
            .map(String::from)
    }
}

#[async_trait]
impl CliSession for SshClient {
    async fn send_exec(&mut self, command: &str) -> Result<String, SshError> {
        debug!("Executing command: {}", command);

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Command(format!("Failed to create channel: {e}")))?;

        channel.exec(true, command).await.map_err(|e| {
            debug!("Failed to execute command '{}': {}", command, e);
            SshError::Command(format!("Failed to execute '{command}': {e}"))
        })?;

        let deadline = tokio::time::Instant::now() + self.command_timeout;
        let mut stdout_buffer = Vec::new();
        let mut stderr_buffer = Vec::new();

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(SshError::Timeout);
            }

            match tokio::time::timeout(deadline - now, channel.wait()).await {
                Err(_) => return Err(SshError::Timeout),
                Ok(None) => break,
                Ok(Some(ChannelMsg::Data { data })) => {
                    stdout_buffer.extend_from_slice(&data);
                    trace!(
                        "Read {} bytes from stdout (total: {})",
                        data.len(),
                        stdout_buffer.len()
                    );
                }
                Ok(Some(ChannelMsg::ExtendedData { data, ext: 1 })) => {
                    stderr_buffer.extend_from_slice(&data);
                }
                Ok(Some(ChannelMsg::Eof))
                | Ok(Some(ChannelMsg::Close))
                | Ok(Some(ChannelMsg::ExitStatus { .. })) => break,
                Ok(Some(other)) => {
                    trace!("Ignoring channel message: {:?}", other);
                }
            }
        }

        let output = String::from_utf8_lossy(&stdout_buffer).to_string();

        if let Some(error_line) = Self::device_error(&output) {
            return Err(SshError::Command(error_line));
        }

        debug!(
            "Command '{}' completed with {} bytes output",
            command,
            output.len()
        );
        Ok(output)
    }

    async fn send_config_set(&mut self, lines: &[String]) -> Result<String, SshError> {
        let timeout = self.command_timeout;
        let channel = self.shell().await?;

        Self::send_line(channel, "configure terminal").await?;
        // apply the whole batch without waiting for per-line echo; slow
        // administrative commands (shutdown toggles) would otherwise stall
        // the prompt match
        for line in lines {
            Self::send_line(channel, line).await?;
        }
        Self::send_line(channel, "end").await?;

        let output = Self::read_shell(channel, timeout, PromptWait::NonConfig).await?;

        if let Some(error_line) = Self::device_error(&output) {
            debug!("Device rejected configuration: {}", error_line);
            return Err(SshError::Command(error_line));
        }

        Ok(output)
    }

    async fn elevate(&mut self) -> Result<(), SshError> {
        let timeout = self.command_timeout;
        let enable_password = self.enable_password.clone();

        self.shell().await?;
        if self.privileged {
            return Ok(());
        }

        let channel = self.shell().await?;
        Self::send_line(channel, "enable").await?;
        let response = Self::read_shell(channel, timeout, PromptWait::AnyOrPassword).await?;

        if Self::tail_line(&response).trim().ends_with("assword:") {
            let Some(password) = enable_password else {
                return Err(SshError::Authentication(
                    "Device requires an enable password but none is configured".to_string(),
                ));
            };
            Self::send_line(channel, &password).await?;
            let response = Self::read_shell(channel, timeout, PromptWait::Any).await?;
            if !Self::tail_line(&response).trim().ends_with('#') {
                return Err(SshError::Authentication(
                    "Privilege elevation rejected".to_string(),
                ));
            }
        } else if !Self::tail_line(&response).trim().ends_with('#') {
            return Err(SshError::Authentication(
                "Privilege elevation rejected".to_string(),
            ));
        }

        self.privileged = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SshError> {
        if let Some(mut channel) = self.shell.take() {
            let _ = Self::send_line(&mut channel, "exit").await;
            let _ = channel.eof().await;
        }

        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| SshError::Connection(e.to_string()))
    }
}

/// Opens one [`SshClient`] session per call against a configured device.
pub struct SshConnector {
    device: DeviceConfig,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(device: DeviceConfig, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            device,
            connect_timeout,
            command_timeout,
        }
    }
}

#[async_trait]
impl CliConnector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn CliSession>, SshError> {
        let client =
            SshClient::connect(&self.device, self.connect_timeout, self.command_timeout).await?;
        Ok(Box::new(client))
    }
}
