//! Server configuration: TOML file + CLI overrides.

use bdr_core::{BdrError, BdrResult, PeerOs, PeerProfile};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub peer: PeerSection,
    #[serde(default)]
    pub templates: TemplatesSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cert_path")]
    pub cert: String,
    /// Defaults to `cert` (a single PEM holding certificate and key).
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub require_client_cert: bool,
    #[serde(default)]
    pub serial: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_port(),
            cert: default_cert_path(),
            key: None,
            require_client_cert: false,
            serial: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// `[peer]` section: the gateway that receives asynchronous replies.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub os: Option<String>,
    /// Trust anchor bundle for the peer's certificate (and for client
    /// certificates when they are required).
    #[serde(default = "default_ca_path")]
    pub ca: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Replaces the OS family's default reply headers when present.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            os: None,
            ca: default_ca_path(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            headers: None,
        }
    }
}

/// `[templates]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesSection {
    #[serde(default = "default_templates_dir")]
    pub dir: String,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8443
}
fn default_cert_path() -> String {
    "~/.bdr-mock/server.pem".to_string()
}
fn default_ca_path() -> String {
    "~/.bdr-mock/cacert.pem".to_string()
}
fn default_max_body_bytes() -> usize {
    1_048_576
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_templates_dir() -> String {
    "templates".to_string()
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen_address: Option<String>,
    pub server_port: Option<u16>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub ca: Option<String>,
    pub templates: Option<String>,
    pub client_address: Option<String>,
    pub client_port: Option<u16>,
    pub client_os: Option<PeerOs>,
    pub require_client_cert: bool,
    pub serial: bool,
}

/// Resolved server configuration (all paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
    pub require_client_cert: bool,
    pub serial: bool,
    pub max_body_bytes: usize,
    pub templates_dir: PathBuf,
    pub peer: PeerProfile,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    ///
    /// A missing file means defaults. The peer host, port and OS must end up
    /// set from one source or the other.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> BdrResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| BdrError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::merge(file_config, cli)
    }

    fn merge(file: ConfigFile, cli: &CliOverrides) -> BdrResult<Self> {
        let ConfigFile {
            server,
            peer,
            templates,
        } = file;

        let cert_str = cli.cert.clone().unwrap_or(server.cert);
        let key_str = cli
            .key
            .clone()
            .or(server.key)
            .unwrap_or_else(|| cert_str.clone());

        let host = cli
            .client_address
            .clone()
            .or(peer.host)
            .ok_or_else(|| BdrError::Config("peer host is required (--client-address)".into()))?;
        let port = cli
            .client_port
            .or(peer.port)
            .ok_or_else(|| BdrError::Config("peer port is required (--client-port)".into()))?;
        let os = match (cli.client_os, peer.os) {
            (Some(os), _) => os,
            (None, Some(s)) => s.parse()?,
            (None, None) => {
                return Err(BdrError::Config("peer os is required (--client-os)".into()))
            }
        };

        let mut profile = PeerProfile::new(host, port, os);
        if let Some(headers) = peer.headers {
            profile = profile.with_headers(headers.into_iter().collect());
        }

        if server.max_body_bytes == 0 {
            return Err(BdrError::Config("max_body_bytes must be positive".into()));
        }

        Ok(Self {
            listen_address: cli.listen_address.clone().unwrap_or(server.listen_address),
            port: cli.server_port.unwrap_or(server.port),
            cert_path: expand_tilde_str(&cert_str),
            key_path: expand_tilde_str(&key_str),
            ca_path: expand_tilde_str(&cli.ca.clone().unwrap_or(peer.ca)),
            require_client_cert: cli.require_client_cert || server.require_client_cert,
            serial: cli.serial || server.serial,
            max_body_bytes: server.max_body_bytes,
            templates_dir: expand_tilde_str(&cli.templates.clone().unwrap_or(templates.dir)),
            peer: profile,
            connect_timeout: Duration::from_secs(peer.connect_timeout_secs),
            request_timeout: Duration::from_secs(peer.request_timeout_secs),
        })
    }

    /// Socket address the listener binds.
    pub fn bind_addr(&self) -> BdrResult<SocketAddr> {
        format!("{}:{}", self.listen_address, self.port)
            .parse()
            .map_err(|e| BdrError::Config(format!("invalid listen address: {e}")))
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

pub(crate) fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
