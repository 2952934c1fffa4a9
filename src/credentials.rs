//! RPC credential discovery.
//!
//! The node keeps `rpcuser`, `rpcpassword` and `rpcport` in its own config
//! file. We look in the standard locations for Linux, macOS and Windows (or
//! an explicit path from `config.toml`), then let the `VLOTTO_RPC_*`
//! environment variables override whatever was found.

use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config::{env_nonempty, NodeConfig, RPC_PASSWORD_ENV, RPC_URL_ENV, RPC_USER_ENV};

/// Complete credentials for `HttpLedger`.
#[derive(Debug, Clone)]
pub struct RpcCredentials {
    pub url: String,
    pub user: String,
    pub password: SecretString,
}

/// What discovery found; user or password may still be missing.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    /// Config file the credentials came from.
    pub source: Option<PathBuf>,
    pub searched: Vec<PathBuf>,
}

impl Discovered {
    /// `Some` once both user and password are known.
    pub fn complete(&self) -> Option<RpcCredentials> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some(RpcCredentials {
                url: self.url.clone(),
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Fill in credentials obtained elsewhere (e.g. prompted). `None` if
    /// either part is blank.
    pub fn with_login(&self, user: &str, password: String) -> Option<RpcCredentials> {
        let user = user.trim();
        if user.is_empty() || password.trim().is_empty() {
            return None;
        }
        Some(RpcCredentials {
            url: self.url.clone(),
            user: user.to_string(),
            password: SecretString::new(password),
        })
    }
}

// ---------------------------------------------------------------------------
// Node config file
// ---------------------------------------------------------------------------

/// The `rpc*` entries of a node config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfEntries {
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<String>,
}

impl ConfEntries {
    fn has_login(&self) -> bool {
        self.user.is_some() && self.password.is_some()
    }

    /// Later entries override earlier ones.
    fn merge(&mut self, other: ConfEntries) {
        if other.user.is_some() {
            self.user = other.user;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
    }

    /// `http://127.0.0.1:<port>/` for a numeric port.
    pub fn port_url(&self) -> Option<String> {
        let port = self.port.as_deref()?;
        (!port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
            .then(|| format!("http://127.0.0.1:{port}/"))
    }
}

/// Parse `key=value` lines; blank lines and `#` comments are skipped.
pub fn parse_conf(text: &str) -> ConfEntries {
    let mut entries = ConfEntries::default();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "rpcuser" => entries.user = Some(value.to_string()),
            "rpcpassword" => entries.password = Some(value.to_string()),
            "rpcport" => entries.port = Some(value.to_string()),
            _ => {}
        }
    }
    entries
}

/// Standard node config locations, in search order.
pub fn default_conf_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".komodo").join("VRSC").join("VRSC.conf"));
        paths.push(
            home.join("Library")
                .join("Application Support")
                .join("Komodo")
                .join("VRSC")
                .join("VRSC.conf"),
        );
    }
    if let Some(appdata) = std::env::var_os("APPDATA") {
        paths.push(PathBuf::from(appdata).join("Komodo").join("VRSC").join("VRSC.conf"));
    }
    paths
}

/// Read the given files in order until one supplies both user and password.
/// Unreadable files are skipped.
pub fn read_conf_files(paths: &[PathBuf]) -> (ConfEntries, Option<PathBuf>) {
    let mut found = ConfEntries::default();
    for path in paths {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Node config not readable");
                continue;
            }
        };
        found.merge(parse_conf(&text));
        if found.has_login() {
            return (found, Some(path.clone()));
        }
    }
    (found, None)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Resolve URL and login from config files and the environment.
///
/// URL precedence: `VLOTTO_RPC_URL`, then a numeric `rpcport` from the node
/// config, then `node.rpc_url`.
pub fn discover(node: &NodeConfig) -> Discovered {
    let searched = match &node.conf_path {
        Some(p) => vec![PathBuf::from(p)],
        None => default_conf_paths(),
    };
    discover_in(node, &searched, env_nonempty)
}

fn discover_in(
    node: &NodeConfig,
    paths: &[PathBuf],
    env: impl Fn(&str) -> Option<String>,
) -> Discovered {
    let (entries, source) = read_conf_files(paths);
    match &source {
        Some(path) => info!(path = %path.display(), "RPC credentials loaded from node config"),
        None => warn!(searched = paths.len(), "No node config with RPC credentials found"),
    }

    let url = env(RPC_URL_ENV)
        .or_else(|| entries.port_url())
        .unwrap_or_else(|| node.rpc_url.clone());
    let user = env(RPC_USER_ENV).or(entries.user);
    let password = env(RPC_PASSWORD_ENV)
        .or(entries.password)
        .map(SecretString::new);

    Discovered {
        url,
        user,
        password,
        source,
        searched: paths.to_vec(),
    }
}
