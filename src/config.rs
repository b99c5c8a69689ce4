#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://apizell.web.id/download/tiktok";
pub const DEFAULT_PROXY_BASE_URL: &str = "http://127.0.0.1:5000";

/// Settings used by the proxy binary.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub port: u16,
    pub host: String,
    pub upstream_base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProxyOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub upstream_base_url: Option<String>,
    pub env_path: Option<PathBuf>,
}

/// Settings used by the lookup client.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub proxy_base_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClientOverrides {
    pub proxy_base_url: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_proxy_settings(overrides: ProxyOverrides) -> Result<ProxySettings> {
    let file_vars = read_env_file(env_path_or_default(overrides.env_path.as_deref()))?;
    Ok(build_proxy_settings(&file_vars, env_var_string, overrides))
}

pub fn resolve_client_settings(overrides: ClientOverrides) -> Result<ClientSettings> {
    let file_vars = read_env_file(env_path_or_default(overrides.env_path.as_deref()))?;
    Ok(build_client_settings(&file_vars, env_var_string, overrides))
}

fn env_path_or_default(path: Option<&Path>) -> &Path {
    path.unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH))
}

fn build_proxy_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ProxyOverrides,
) -> ProxySettings {
    // An unparsable PORT is treated like a missing one.
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = non_blank(overrides.host)
        .or_else(|| lookup_value("HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let upstream_base_url = non_blank(overrides.upstream_base_url)
        .or_else(|| lookup_value("UPSTREAM_BASE_URL", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE_URL.to_string());

    ProxySettings {
        port,
        host,
        upstream_base_url,
    }
}

fn build_client_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ClientOverrides,
) -> ClientSettings {
    let proxy_base_url = non_blank(overrides.proxy_base_url)
        .or_else(|| lookup_value("PROXY_BASE_URL", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_PROXY_BASE_URL.to_string());
    ClientSettings { proxy_base_url }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
