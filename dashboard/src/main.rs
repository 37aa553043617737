use clap::Parser;
use dashboard::api::{HubApi, IdentityApi};
use dashboard::commands::{self, Action};
use dashboard::config::{Args, Config};
use dashboard::network::Client;
use dashboard::session::{self, SessionError, SessionStore};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Forwards parsed prompt lines to the event loop until stdin closes.
async fn read_commands(actions: mpsc::Sender<Action>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match commands::parse(&line) {
                Ok(action) => {
                    if actions.send(action).await.is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
            Ok(None) => break,
            Err(e) => {
                error!("Error reading commands: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = Config::try_from(&args)?;
    let store = SessionStore::new(config.session_file.clone());

    let session = match args.login_code.as_deref() {
        Some(code) => {
            let http = reqwest::Client::new();
            let hub = HubApi::new(http.clone(), config.api_url.clone());
            let identity = IdentityApi::new(http, config.identity_url.clone());

            let session = session::login(&hub, &identity, code).await?;
            store.save(&session)?;
            session
        }
        None => store.load()?.ok_or(SessionError::NotLoggedIn)?,
    };

    info!("Signed in as {} ({})", session.username, session.user_id);
    info!("Hub API: {}", config.api_url);
    info!("Cluster API: {}", config.kube_url);

    let mut client = Client::new(config, session);
    client.load_initial().await;

    let (sender, receiver) = mpsc::channel(16);
    tokio::spawn(read_commands(sender));
    println!("Type `help` for commands, `status` for an overview.");

    client.run(receiver).await;

    Ok(())
}
