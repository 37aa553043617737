use futures_util::StreamExt;
use log::{debug, error, info, warn};
use shared::PushEvent;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::api::{FileInstallRequest, FilePrefix, HubApi, KubeApi};
use crate::commands::{Action, UploadTarget, HELP};
use crate::config::Config;
use crate::listing::{backups_from_listing, configs_from_listing, mods_from_listing};
use crate::rendering::Renderer;
use crate::session::{self, Session, SessionStore};
use crate::state::{Dashboard, FileRef, PendingOperation};
use crate::upload::{LocalFile, Uploader, MOD_ROOT};

/// Whether the event loop keeps running after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// One signed-in user's dashboard: REST clients, the push channel and the
/// reconciled state they feed.
pub struct Client {
    config: Config,
    session: Session,
    store: SessionStore,

    hub: HubApi,
    kube: KubeApi,
    uploader: Uploader,

    dashboard: Dashboard,
    renderer: Renderer,
}

impl Client {
    pub fn new(config: Config, session: Session) -> Self {
        let http = reqwest::Client::new();
        let hub = HubApi::new(http.clone(), config.api_url.clone());
        let kube = KubeApi::new(http.clone(), config.kube_url.clone());
        let uploader = Uploader::new(kube.clone(), http);
        let store = SessionStore::new(config.session_file.clone());

        Client {
            config,
            session,
            store,
            hub,
            kube,
            uploader,
            dashboard: Dashboard::new(),
            renderer: Renderer::default(),
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn dashboard_mut(&mut self) -> &mut Dashboard {
        &mut self.dashboard
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Populates every collection from the REST listings. A failed listing
    /// raises an alert and leaves that collection as it was.
    pub async fn load_initial(&mut self) {
        match self.kube.servers(&self.session).await {
            Ok(servers) => self.dashboard.load_servers(servers),
            Err(e) => {
                self.dashboard.push_alert(format!("Failed to load servers: {}", e));
            }
        }

        match self.hub.list_files(&self.session, FilePrefix::Mods).await {
            Ok(entries) => {
                let own_prefix = self.session.object_prefix(MOD_ROOT);
                self.dashboard.load_mods(mods_from_listing(&entries, &own_prefix));
            }
            Err(e) => {
                self.dashboard.push_alert(format!("Failed to load mods: {}", e));
            }
        }

        match self.hub.list_files(&self.session, FilePrefix::Configs).await {
            Ok(entries) => self.dashboard.load_configs(configs_from_listing(&entries)),
            Err(e) => {
                self.dashboard.push_alert(format!("Failed to load config files: {}", e));
            }
        }

        match self.hub.list_files(&self.session, FilePrefix::Backups).await {
            Ok(entries) => self.dashboard.load_backups(backups_from_listing(&entries)),
            Err(e) => {
                self.dashboard.push_alert(format!("Failed to load backups: {}", e));
            }
        }

        info!(
            "Loaded {} mods, {} configs, {} worlds, {} automatic backups",
            self.dashboard.mods().len(),
            self.dashboard.configs().len(),
            self.dashboard.backups().len(),
            self.dashboard.replicas().len()
        );
    }

    /// Decodes and applies one text frame. Bad frames are logged and dropped.
    pub fn handle_frame(&mut self, frame: &str) -> bool {
        match PushEvent::decode(frame) {
            Ok(event) => {
                debug!("Push event {}", event.kind());
                self.dashboard.apply(event)
            }
            Err(e) => {
                warn!("Dropping push frame: {}", e);
                false
            }
        }
    }

    fn destination(&self, file: &FileRef) -> &str {
        match file {
            FileRef::Mod(_) => &self.config.mods_dir,
            FileRef::Config(_) => &self.config.configs_dir,
            FileRef::Backup(_) | FileRef::Replica(_) => &self.config.worlds_dir,
        }
    }

    async fn file_operation(&mut self, file: FileRef, install: bool) {
        let pending = match self.dashboard.begin_file_operation(&file, install) {
            Ok(pending) => pending,
            Err(e) => {
                self.dashboard.push_alert(e.to_string());
                return;
            }
        };

        let PendingOperation {
            request_id,
            object_key,
            operation,
            ..
        } = pending;
        let request = FileInstallRequest {
            prefix: object_key,
            destination: self.destination(&file).to_string(),
            is_archive: matches!(file, FileRef::Mod(_)),
            operation,
            request_id: Some(request_id),
        };

        if let Err(e) = self.kube.install_file(&self.session, &request).await {
            error!("Install request {} failed: {}", request_id, e);
            self.dashboard.abort_file_operation(request_id);
            let verb = if install { "install" } else { "uninstall" };
            self.dashboard.push_alert(format!(
                "Failed to {} {} {}: {}",
                verb,
                file.kind(),
                file.key(),
                e
            ));
        }
    }

    async fn scale(&mut self, name: String, start: bool) {
        let marked = if start {
            self.dashboard.mark_starting(&name)
        } else {
            self.dashboard.mark_stopping(&name)
        };
        let previous = match marked {
            Ok(previous) => previous,
            Err(e) => {
                self.dashboard.push_alert(e.to_string());
                return;
            }
        };

        let replicas = if start { 1 } else { 0 };
        if let Err(e) = self.kube.scale_server(&self.session, replicas).await {
            self.dashboard.restore_state(&name, previous);
            let verb = if start { "start" } else { "stop" };
            self.dashboard
                .push_alert(format!("Failed to {} server {}: {}", verb, name, e));
        }
    }

    async fn upload(&mut self, target: UploadTarget) {
        let result = match target {
            UploadTarget::Mod(path) => match LocalFile::from_path(&path) {
                Ok(file) => self
                    .uploader
                    .upload_mod(&self.session, &file)
                    .await
                    .map(|m| self.dashboard.add_mod(m)),
                Err(e) => Err(e),
            },
            UploadTarget::Config(path) => match LocalFile::from_path(&path) {
                Ok(file) => self
                    .uploader
                    .upload_config(&self.session, &file)
                    .await
                    .map(|c| self.dashboard.add_config(c)),
                Err(e) => Err(e),
            },
            UploadTarget::World { seed, world } => {
                match (LocalFile::from_path(&seed), LocalFile::from_path(&world)) {
                    (Ok(seed), Ok(world)) => self
                        .uploader
                        .upload_world(&self.session, &seed, &world)
                        .await
                        .map(|b| self.dashboard.add_backup(b)),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
        };

        match result {
            Ok(()) => info!("Upload complete"),
            Err(e) => {
                self.dashboard.push_alert(e.to_string());
            }
        }
    }

    async fn refresh(&mut self) {
        match session::refresh(&self.hub, &mut self.session).await {
            Ok(()) => {
                if let Err(e) = self.store.save(&self.session) {
                    error!("Failed to save refreshed session: {}", e);
                }
            }
            Err(e) => {
                self.dashboard
                    .push_alert(format!("Failed to refresh session: {}", e));
            }
        }
        self.load_initial().await;
    }

    /// Runs one user action. REST failures become alerts; nothing here is fatal.
    pub async fn perform(&mut self, action: Action) -> Flow {
        match action {
            Action::Install(file) => self.file_operation(file, true).await,
            Action::Uninstall(file) => self.file_operation(file, false).await,
            Action::Start(name) => self.scale(name, true).await,
            Action::Stop(name) => self.scale(name, false).await,

            Action::Delete(name) => {
                if self.dashboard.server(&name).is_none() {
                    self.dashboard.push_alert(format!("no server named {}", name));
                } else if let Err(e) = self.kube.delete_server(&self.session).await {
                    self.dashboard
                        .push_alert(format!("Failed to delete server {}: {}", name, e));
                } else {
                    self.dashboard.remove_server(&name);
                }
            }

            Action::Create(form) => {
                let request = form.into_request();
                match self.kube.create_server(&self.session, &request).await {
                    Ok(server) => {
                        info!("Created server {}", server.deployment_name);
                        self.dashboard.upsert_server(server);
                    }
                    Err(e) => {
                        self.dashboard
                            .push_alert(format!("Failed to create server: {}", e));
                    }
                }
            }

            Action::Update(form) => {
                let details = form.into_request();
                match self.kube.patch_server(&self.session, &details).await {
                    Ok(server) => {
                        info!("Updated server {}", server.deployment_name);
                        self.dashboard.upsert_server(server);
                    }
                    Err(e) => {
                        self.dashboard
                            .push_alert(format!("Failed to update server: {}", e));
                    }
                }
            }

            Action::Upload(target) => self.upload(target).await,
            Action::Refresh => self.refresh().await,
            Action::Status => println!("{}", self.renderer.render(&self.dashboard)),
            Action::Logs(count) => {
                print!("{}", self.renderer.render_logs(&self.dashboard, count))
            }
            Action::Metrics => {
                print!("{}", self.renderer.render_metrics(self.dashboard.metrics()))
            }

            Action::Dismiss(id) => {
                if !self.dashboard.dismiss_alert(id) {
                    warn!("No alert with id {}", id);
                }
            }

            Action::Logout => {
                if let Err(e) = self.store.clear() {
                    error!("Failed to clear session: {}", e);
                }
                info!("Logged out {}", self.session.username);
                return Flow::Exit;
            }

            Action::Help => println!("{}", HELP),
            Action::Quit => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Connects the push channel and processes events and user actions until
    /// the user quits. Losing the channel raises an alert and leaves the
    /// actions running; there is no reconnect. The loop also ends once the
    /// channel is gone and the action sender has been dropped.
    pub async fn run(&mut self, mut actions: mpsc::Receiver<Action>) {
        let url = self.config.push_url(&self.session.user_id);
        info!("Connecting to push channel {}", self.config.ws_url);

        let mut push = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Push channel connected for {}", self.session.user_id);
                Some(ws_stream)
            }
            Err(e) => {
                error!("Push channel connect failed: {}", e);
                self.dashboard
                    .push_alert(format!("Could not connect to the server: {}", e));
                None
            }
        };
        let mut actions_open = true;

        while push.is_some() || actions_open {
            let step = tokio::select! {
                frame = next_frame(&mut push) => Step::Frame(frame),
                action = actions.recv(), if actions_open => Step::Action(action),
            };

            match step {
                Step::Frame(Some(Ok(Message::Text(text)))) => {
                    self.handle_frame(text.as_str());
                }
                Step::Frame(Some(Ok(Message::Close(_))) | None) => {
                    info!("Push channel closed");
                    self.dashboard.push_alert("Lost connection to the server");
                    push = None;
                }
                Step::Frame(Some(Ok(_))) => {}
                Step::Frame(Some(Err(e))) => {
                    error!("Push channel error: {}", e);
                    self.dashboard
                        .push_alert(format!("Lost connection to the server: {}", e));
                    push = None;
                }

                Step::Action(Some(action)) => {
                    if self.perform(action).await == Flow::Exit {
                        break;
                    }
                }
                Step::Action(None) => actions_open = false,
            }
        }

        if let Some(mut ws_stream) = push {
            let _ = ws_stream.close(None).await;
        }
    }
}

type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PushFrame = Option<Result<Message, WsError>>;

enum Step {
    Frame(PushFrame),
    Action(Option<Action>),
}

/// Next frame from the push channel, or never once it is gone.
async fn next_frame(push: &mut Option<PushStream>) -> PushFrame {
    match push {
        Some(ws_stream) => ws_stream.next().await,
        None => std::future::pending().await,
    }
}
