//! Command-line and environment configuration.

use clap::Parser;
use std::path::PathBuf;
use url::Url;

use crate::error::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Headless dashboard for hosted game servers", long_about = None)]
pub struct Args {
    /// Base URL of the hub API (accounts and file listings)
    #[arg(long, env = "HEARTHHUB_API_URL", default_value = "https://api.hearthhub.example")]
    pub api_url: String,

    /// Base URL of the cluster API (servers, installs, uploads)
    #[arg(long, env = "HEARTHHUB_KUBE_URL", default_value = "https://kube.hearthhub.example")]
    pub kube_url: String,

    /// Push channel endpoint
    #[arg(long, env = "HEARTHHUB_WS_URL", default_value = "wss://ws.hearthhub.example/ws")]
    pub ws_url: String,

    /// Base URL of the identity provider API
    #[arg(long, env = "HEARTHHUB_IDENTITY_URL", default_value = "https://discord.com/api/")]
    pub identity_url: String,

    /// Where the signed-in session is kept between runs
    #[arg(long, env = "HEARTHHUB_SESSION_FILE", default_value = ".hearthhub/session.bin")]
    pub session_file: PathBuf,

    /// Install destination for mods on the game server
    #[arg(long, default_value = "/root/.config/unity3d/IronGate/Valheim/BepInEx/plugins")]
    pub mods_dir: String,

    /// Install destination for config files on the game server
    #[arg(long, default_value = "/root/.config/unity3d/IronGate/Valheim/BepInEx/config")]
    pub configs_dir: String,

    /// Install destination for world saves on the game server
    #[arg(long, default_value = "/root/.config/unity3d/IronGate/Valheim/worlds_local")]
    pub worlds_dir: String,

    /// Authorization code to exchange for a new session before starting
    #[arg(long)]
    pub login_code: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub kube_url: Url,
    pub ws_url: Url,
    pub identity_url: Url,
    pub session_file: PathBuf,
    pub mods_dir: String,
    pub configs_dir: String,
    pub worlds_dir: String,
}

fn parse_url(name: &str, value: &str) -> Result<Url, Error> {
    Url::parse(value).map_err(|e| Error::Config(format!("{} {:?}: {}", name, value, e)))
}

impl TryFrom<&Args> for Config {
    type Error = Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let ws_url = parse_url("--ws-url", &args.ws_url)?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "--ws-url must use ws:// or wss://, got {}",
                ws_url.scheme()
            )));
        }

        // Relative joins drop the last path segment unless it ends with '/'.
        let mut identity_url = parse_url("--identity-url", &args.identity_url)?;
        if !identity_url.path().ends_with('/') {
            let path = format!("{}/", identity_url.path());
            identity_url.set_path(&path);
        }

        Ok(Self {
            api_url: parse_url("--api-url", &args.api_url)?,
            kube_url: parse_url("--kube-url", &args.kube_url)?,
            ws_url,
            identity_url,
            session_file: args.session_file.clone(),
            mods_dir: args.mods_dir.clone(),
            configs_dir: args.configs_dir.clone(),
            worlds_dir: args.worlds_dir.clone(),
        })
    }
}

impl Config {
    /// Push endpoint for one user: the channel is keyed by the `id` query parameter.
    pub fn push_url(&self, user_id: &str) -> Url {
        let mut url = self.ws_url.clone();
        url.query_pairs_mut().append_pair("id", user_id);
        url
    }
}
