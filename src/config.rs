// serialctl - interactive serial number lookup against the ConfigMgr AdminService
// Copyright (C) 2025
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: Option<String>,
    pub site_code: Option<String>,
    pub verify_tls: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error("AdminService server is required; set it with `serialctl configure --server <host>`")]
    MissingServer,
}

#[derive(Debug)]
pub struct EffectiveConfig {
    pub server: String,
    pub site_code: Option<String>,
    pub verify_tls: bool,
}

impl EffectiveConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}/AdminService/wmi", self.server)
    }
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".serialctl.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("SERIALCTL_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("serialctl").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let serialized = serde_yaml::to_string(config).context("serializing config")?;
    fs::write(&path, serialized).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

/// Merge user and local config files with CLI overrides on top; the server
/// is the only mandatory value.
pub fn resolve(
    cwd: &Path,
    server_override: Option<String>,
    site_code_override: Option<String>,
    insecure: bool,
) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    if let Some(server) = server_override {
        merged.server = Some(server);
    }
    if let Some(code) = site_code_override {
        merged.site_code = Some(code);
    }

    let server = merged
        .server
        .ok_or(ConfigError::MissingServer)
        .map(|s| s.trim().to_string())?;

    let verify_tls = if insecure {
        false
    } else {
        merged.verify_tls.unwrap_or(true)
    };

    Ok(EffectiveConfig {
        server,
        site_code: merged.site_code,
        verify_tls,
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        server: local.server.or(user.server),
        site_code: local.site_code.or(user.site_code),
        verify_tls: local.verify_tls.or(user.verify_tls),
    }
}
