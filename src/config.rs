use std::{collections::HashMap, fs, net::IpAddr, path::Path};

use serde::{Deserialize, Serialize};

use crate::SwitchHandError;

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub hostname: String,
    pub ip_address: Option<IpAddr>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    pub ssh_username: Option<String>,
    pub ssh_password: Option<String>,
    pub ssh_key_path: Option<String>,
    pub ssh_key_passphrase: Option<String>,
    /// Password for privilege elevation (`enable`), if the device asks for one
    pub enable_password: Option<String>,
    pub notes: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            ip_address: None,
            ssh_port: default_ssh_port(),
            ssh_username: None,
            ssh_password: None,
            ssh_key_path: None,
            ssh_key_passphrase: None,
            enable_password: None,
            notes: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub devices: HashMap<String, DeviceConfig>, // hostname -> config
    pub ssh_timeout_seconds: u64,
    /// Upper bound on a single remote command round trip. Set once, not
    /// adjustable at runtime.
    pub command_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            devices: HashMap::new(),
            ssh_timeout_seconds: 30,
            command_timeout_seconds: 20,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SwitchHandError> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SwitchHandError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn add_device(&mut self, hostname: String, device: DeviceConfig) {
        self.devices.insert(hostname, device);
    }

    pub fn get_device(&self, hostname: &str) -> Option<&DeviceConfig> {
        self.devices.get(hostname)
    }

    pub fn get_device_mut(&mut self, hostname: &str) -> Option<&mut DeviceConfig> {
        self.devices.get_mut(hostname)
    }
}
