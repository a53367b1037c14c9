//! Configuration: command line, environment credentials and the optional
//! config file.
//!
//! Credentials are read from the standard `OS_*` environment variables
//! (with the `ST_*` aliases of the classic swift client) and can be
//! overridden by flags. Local tunables that rarely change — the scratch
//! directory and the listing page size — live in an optional `config.toml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use log::warn;
use serde::Deserialize;

pub const APP_NAME: &str = "objectfs";

/// Credentials for the v1 token handshake against the auth endpoint.
#[derive(Debug, Clone)]
pub struct SwiftCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about = "Mount an object-storage container via FUSE")]
pub struct Args {
    /// Container to mount
    pub container: String,

    /// Mount point
    pub mountpoint: PathBuf,

    /// Output debug information (implies --no-daemon)
    #[arg(long)]
    pub debug: bool,

    /// Stay in the foreground instead of daemonising
    #[arg(long)]
    pub no_daemon: bool,

    /// Append log output to this file instead of stderr
    #[arg(long, short = 'l')]
    pub logfile: Option<PathBuf>,

    /// Create the container when it does not exist yet
    #[arg(long, short = 'c')]
    pub create_container: bool,

    /// Seconds the container statistics stay cached; non-positive disables
    #[arg(long, default_value_t = -1)]
    pub object_cache_time: i64,

    /// Alternative config file location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Auth endpoint (default: $OS_AUTH_URL or $ST_AUTH)
    #[arg(long)]
    pub os_auth_url: Option<String>,

    /// User name (default: $OS_USERNAME or $ST_USER)
    #[arg(long)]
    pub os_username: Option<String>,

    /// Password or API key (default: $OS_PASSWORD or $ST_KEY)
    #[arg(long)]
    pub os_password: Option<String>,
}

/// Tunables from `config.toml`; everything has a sensible default.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FileConfig {
    pub scratch_dir: PathBuf,
    pub object_list_size: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            scratch_dir: PathBuf::from("/tmp").join(APP_NAME),
            object_list_size: 1000,
        }
    }
}

/// The fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub container: String,
    pub mountpoint: PathBuf,
    pub debug: bool,
    pub no_daemon: bool,
    pub logfile: Option<PathBuf>,
    pub create_container: bool,
    pub stats_cache_ttl: Option<Duration>,
    pub scratch_dir: PathBuf,
    pub object_list_size: usize,
    pub credentials: SwiftCredentials,
}

impl Config {
    pub fn load() -> anyhow::Result<Config> {
        Config::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> anyhow::Result<Config> {
        let file = load_file_config(args.config.as_deref());

        let Some(auth_url) = value_or_env(args.os_auth_url, &["OS_AUTH_URL", "ST_AUTH"]) else {
            bail!("auth endpoint missing: pass --os-auth-url or set OS_AUTH_URL");
        };
        let username =
            value_or_env(args.os_username, &["OS_USERNAME", "ST_USER"]).unwrap_or_default();
        let password =
            value_or_env(args.os_password, &["OS_PASSWORD", "ST_KEY"]).unwrap_or_default();

        Ok(Config {
            container: args.container,
            mountpoint: args.mountpoint,
            debug: args.debug,
            // Debug output is useless in a detached process.
            no_daemon: args.no_daemon || args.debug,
            logfile: args.logfile,
            create_container: args.create_container,
            stats_cache_ttl: (args.object_cache_time > 0)
                .then(|| Duration::from_secs(args.object_cache_time as u64)),
            scratch_dir: file.scratch_dir,
            object_list_size: file.object_list_size,
            credentials: SwiftCredentials { auth_url, username, password },
        })
    }
}

fn value_or_env(flag: Option<String>, names: &[&str]) -> Option<String> {
    if let Some(value) = flag.filter(|v| !v.is_empty()) {
        return Some(value);
    }
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
}

/// Load `config.toml` (or the file given with `--config`). Missing file
/// means defaults; a malformed file is reported and ignored.
fn load_file_config(path: Option<&Path>) -> FileConfig {
    let path = path.unwrap_or_else(|| Path::new("config.toml"));
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return FileConfig::default(),
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!("cannot parse {}: {err}, using defaults", path.display());
            FileConfig::default()
        }
    }
}
