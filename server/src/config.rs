//! Server configuration loaded from TOML, with command-line overrides.
//!
//! Every key is optional; a missing file section falls back to the
//! defaults below.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared::{MapId, Position, MAP_HEIGHT, MAP_WIDTH};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    pub maps: MapsConfig,
    pub timeouts: TimeoutsConfig,
    pub world: WorldConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7666,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub max_players: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            max_connections_per_ip: 10,
            max_players: 500,
        }
    }
}

/// When map tile data is read from disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MapLoading {
    /// On first use, off the event loop; empty maps may be evicted.
    Lazy,
    /// Every map at startup; nothing is ever evicted.
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapsConfig {
    pub path: PathBuf,
    pub count: MapId,
    pub loading: MapLoading,
    /// Upper bound on loaded maps in lazy mode; 0 means unlimited.
    pub max_active: usize,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("maps"),
            count: 290,
            loading: MapLoading::Lazy,
            max_active: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub unauthenticated_secs: u64,
    pub authenticated_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            unauthenticated_secs: 15,
            authenticated_secs: 300,
        }
    }
}

impl TimeoutsConfig {
    pub fn limit(&self, authenticated: bool) -> Duration {
        if authenticated {
            Duration::from_secs(self.authenticated_secs)
        } else {
            Duration::from_secs(self.unauthenticated_secs)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    pub start_map: MapId,
    pub start_x: u8,
    pub start_y: u8,
    pub welcome_message: String,
    pub forbidden_names_file: Option<PathBuf>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            start_map: 1,
            start_x: 50,
            start_y: 50,
            welcome_message: "Welcome to tileworld!".to_string(),
            forbidden_names_file: None,
        }
    }
}

impl WorldConfig {
    pub fn start_position(&self) -> Option<Position> {
        Position::new(self.start_x, self.start_y)
    }
}

impl ServerConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.limits.max_connections == 0 {
            return invalid("limits.max_connections must be at least 1".into());
        }
        if self.limits.max_connections_per_ip == 0 {
            return invalid("limits.max_connections_per_ip must be at least 1".into());
        }
        if self.limits.max_players == 0 {
            return invalid("limits.max_players must be at least 1".into());
        }
        if self.maps.count == 0 {
            return invalid("maps.count must be at least 1".into());
        }
        if self.world.start_map == 0 || self.world.start_map > self.maps.count {
            return invalid(format!(
                "world.start_map {} is outside 1..={}",
                self.world.start_map, self.maps.count
            ));
        }
        if self.world.start_position().is_none() {
            return invalid(format!(
                "world start position ({}, {}) is outside the {}x{} map",
                self.world.start_x, self.world.start_y, MAP_WIDTH, MAP_HEIGHT
            ));
        }
        if self.timeouts.unauthenticated_secs == 0 || self.timeouts.authenticated_secs == 0 {
            return invalid("timeouts must be at least one second".into());
        }
        Ok(())
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}
