//! Dashboard state and its reconciliation with push events.
//!
//! Collections are filled once from the REST listings and then mutated in
//! place: push events resolve lifecycle transitions, user actions set
//! optimistic flags that a later event (or a failed request) clears.

use log::{debug, info, warn};
use shared::{
    Backup, ConfigFile, ContainerType, FileOperation, Mod, PushEvent, Server, ServerState,
};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::listing::BackupListing;
use crate::metrics::MetricsBuffer;

/// Identifies one installable entity: mods by id, everything else by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileRef {
    Mod(String),
    Config(String),
    Backup(String),
    Replica(String),
}

impl FileRef {
    pub fn kind(&self) -> &'static str {
        match self {
            FileRef::Mod(_) => "mod",
            FileRef::Config(_) => "config",
            FileRef::Backup(_) => "backup",
            FileRef::Replica(_) => "replica backup",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            FileRef::Mod(key)
            | FileRef::Config(key)
            | FileRef::Backup(key)
            | FileRef::Replica(key) => key,
        }
    }

    fn unknown(&self) -> Error {
        Error::UnknownFile {
            kind: self.kind(),
            key: self.key().to_string(),
        }
    }
}

/// An install or uninstall the user started and the backend has not finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub request_id: u64,
    pub file: FileRef,
    /// Object-store key handed to the install endpoint.
    pub object_key: String,
    pub operation: FileOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: u64,
    pub message: String,
}

pub struct Dashboard {
    servers: BTreeMap<String, Server>,
    mods: Vec<Mod>,
    configs: Vec<ConfigFile>,
    backups: Vec<Backup>,
    replicas: Vec<Backup>,
    logs: Vec<String>,
    metrics: MetricsBuffer,
    alerts: Vec<Alert>,

    pending: HashMap<u64, FileRef>,
    next_request_id: u64,
    next_alert_id: u64,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            servers: BTreeMap::new(),
            mods: Vec::new(),
            configs: Vec::new(),
            backups: Vec::new(),
            replicas: Vec::new(),
            logs: Vec::new(),
            metrics: MetricsBuffer::new(),
            alerts: Vec::new(),
            pending: HashMap::new(),
            next_request_id: 1,
            next_alert_id: 1,
        }
    }

    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    pub fn server(&self, deployment_name: &str) -> Option<&Server> {
        self.servers.get(deployment_name)
    }

    pub fn mods(&self) -> &[Mod] {
        &self.mods
    }

    pub fn configs(&self) -> &[ConfigFile] {
        &self.configs
    }

    pub fn backups(&self) -> &[Backup] {
        &self.backups
    }

    pub fn replicas(&self) -> &[Backup] {
        &self.replicas
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn metrics(&self) -> &MetricsBuffer {
        &self.metrics
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn pending_operations(&self) -> usize {
        self.pending.len()
    }

    // Initial load

    /// Replaces the server collection; a repeated deployment name keeps the last entry.
    pub fn load_servers(&mut self, servers: Vec<Server>) {
        self.servers = servers
            .into_iter()
            .map(|server| (server.deployment_name.clone(), server))
            .collect();
        debug!("Loaded {} servers", self.servers.len());
    }

    pub fn load_mods(&mut self, mods: Vec<Mod>) {
        self.mods = mods;
    }

    pub fn load_configs(&mut self, configs: Vec<ConfigFile>) {
        self.configs = configs;
    }

    pub fn load_backups(&mut self, listing: BackupListing) {
        self.backups = listing.primary;
        self.replicas = listing.replica;
    }

    // Push events

    /// Applies one push event. Returns whether any state changed.
    pub fn apply(&mut self, event: PushEvent) -> bool {
        match event {
            PushEvent::Logs { logs } => {
                let changed = !logs.is_empty();
                self.logs.extend(logs);
                changed
            }

            PushEvent::JoinCode {
                join_code,
                container_name,
            } => self.set_join_code(&container_name, join_code),

            PushEvent::Metrics { cpu, memory } => {
                self.metrics.record(cpu, memory);
                true
            }

            PushEvent::PostStart { container_name } => {
                self.set_server_state(&container_name, ServerState::Loading)
            }

            PushEvent::ContainerReady {
                container_name,
                container_type,
            } => match container_type {
                ContainerType::Server => {
                    self.set_server_state(&container_name, ServerState::Running)
                }
                _ => false,
            },

            PushEvent::PreStop {
                container_name,
                container_type,
                operation,
                request_id,
            } => match container_type {
                ContainerType::FileInstall => match request_id {
                    Some(id) => self.resolve_request(id, operation),
                    None => self.resolve_file_operations(operation),
                },
                ContainerType::Server => {
                    self.set_server_state(&container_name, ServerState::Stopped)
                }
                ContainerType::Other => {
                    warn!("PreStop for unrecognized container type on {}", container_name);
                    false
                }
            },
        }
    }

    fn set_join_code(&mut self, deployment_name: &str, join_code: String) -> bool {
        match self.servers.get_mut(deployment_name) {
            Some(server) if server.join_code.as_deref() != Some(join_code.as_str()) => {
                info!("Join code for {}: {}", deployment_name, join_code);
                server.join_code = Some(join_code);
                true
            }
            Some(_) => false,
            None => {
                debug!("Join code for unknown server {}", deployment_name);
                false
            }
        }
    }

    fn set_server_state(&mut self, deployment_name: &str, state: ServerState) -> bool {
        match self.servers.get_mut(deployment_name) {
            Some(server) if server.state != state => {
                debug!("{}: {} -> {}", deployment_name, server.state, state);
                server.state = state;
                true
            }
            Some(_) => false,
            None => {
                debug!("State {} for unknown server {}", state, deployment_name);
                false
            }
        }
    }

    /// Resolves every in-flight install: the event does not say which file it
    /// belongs to, so all `installing` entities take the outcome of `operation`.
    fn resolve_file_operations(&mut self, operation: FileOperation) -> bool {
        let installed = operation.leaves_installed();
        let mut resolved = 0;

        let flags = self
            .mods
            .iter_mut()
            .map(|m| (&mut m.installed, &mut m.installing))
            .chain(self.configs.iter_mut().map(|c| (&mut c.installed, &mut c.installing)))
            .chain(self.backups.iter_mut().map(|b| (&mut b.installed, &mut b.installing)));
        for (is_installed, installing) in flags {
            if *installing {
                *installing = false;
                *is_installed = installed;
                resolved += 1;
            }
        }

        for replica in self.replicas.iter_mut().filter(|r| r.installing) {
            replica.installing = false;
            resolved += 1;
        }

        self.pending.clear();
        debug!("File operation {:?} resolved {} entities", operation, resolved);
        resolved > 0
    }

    fn resolve_request(&mut self, request_id: u64, operation: FileOperation) -> bool {
        let Some(file) = self.pending.remove(&request_id) else {
            debug!("No pending file operation with request id {}", request_id);
            return false;
        };

        let replica = matches!(file, FileRef::Replica(_));
        match self.flags_mut(&file) {
            Some((installed, installing)) => {
                *installing = false;
                if !replica {
                    *installed = operation.leaves_installed();
                }
                debug!("Request {} resolved {} {}", request_id, file.kind(), file.key());
                true
            }
            None => false,
        }
    }

    fn flags_mut(&mut self, file: &FileRef) -> Option<(&mut bool, &mut bool)> {
        match file {
            FileRef::Mod(id) => self
                .mods
                .iter_mut()
                .find(|m| &m.id == id)
                .map(|m| (&mut m.installed, &mut m.installing)),
            FileRef::Config(key) => self
                .configs
                .iter_mut()
                .find(|c| &c.key == key)
                .map(|c| (&mut c.installed, &mut c.installing)),
            FileRef::Backup(key) => self
                .backups
                .iter_mut()
                .find(|b| &b.key == key)
                .map(|b| (&mut b.installed, &mut b.installing)),
            FileRef::Replica(key) => self
                .replicas
                .iter_mut()
                .find(|b| &b.key == key)
                .map(|b| (&mut b.installed, &mut b.installing)),
        }
    }

    fn object_key(&self, file: &FileRef) -> Option<String> {
        match file {
            FileRef::Mod(id) => self.mods.iter().find(|m| &m.id == id).map(|m| m.key.clone()),
            other => Some(other.key().to_string()),
        }
    }

    // User actions

    /// Optimistically marks `file` as installing and allocates a request id.
    ///
    /// `install` chooses between a write and a delete; the returned operation
    /// is what the install endpoint must be asked to do.
    pub fn begin_file_operation(
        &mut self,
        file: &FileRef,
        install: bool,
    ) -> Result<PendingOperation> {
        let object_key = self.object_key(file).ok_or_else(|| file.unknown())?;
        let (_, installing) = self.flags_mut(file).ok_or_else(|| file.unknown())?;
        if *installing {
            return Err(Error::OperationInFlight(file.key().to_string()));
        }
        *installing = true;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(request_id, file.clone());

        let operation = if install {
            FileOperation::Write
        } else {
            FileOperation::Delete
        };
        debug!("Request {}: {:?} {} {}", request_id, operation, file.kind(), file.key());

        Ok(PendingOperation {
            request_id,
            file: file.clone(),
            object_key,
            operation,
        })
    }

    /// Rolls back the optimistic flag of a request the API rejected.
    pub fn abort_file_operation(&mut self, request_id: u64) {
        if let Some(file) = self.pending.remove(&request_id) {
            if let Some((_, installing)) = self.flags_mut(&file) {
                *installing = false;
            }
            debug!("Request {} rolled back", request_id);
        }
    }

    /// Optimistic start: returns the state to restore if the API call fails.
    pub fn mark_starting(&mut self, deployment_name: &str) -> Result<ServerState> {
        self.transition(deployment_name, "started", ServerState::can_start, ServerState::Scheduling)
    }

    /// Optimistic stop: returns the state to restore if the API call fails.
    pub fn mark_stopping(&mut self, deployment_name: &str) -> Result<ServerState> {
        self.transition(deployment_name, "stopped", ServerState::can_stop, ServerState::Terminating)
    }

    fn transition(
        &mut self,
        deployment_name: &str,
        action: &'static str,
        allowed: fn(ServerState) -> bool,
        next: ServerState,
    ) -> Result<ServerState> {
        let server = self
            .servers
            .get_mut(deployment_name)
            .ok_or_else(|| Error::UnknownServer(deployment_name.to_string()))?;
        if !allowed(server.state) {
            return Err(Error::InvalidTransition {
                name: deployment_name.to_string(),
                action,
                state: server.state,
            });
        }

        let previous = server.state;
        server.state = next;
        debug!("{}: {} -> {} (optimistic)", deployment_name, previous, next);
        Ok(previous)
    }

    pub fn restore_state(&mut self, deployment_name: &str, state: ServerState) {
        if let Some(server) = self.servers.get_mut(deployment_name) {
            server.state = state;
        }
    }

    /// Inserts a newly created server, or replaces one with the same name.
    pub fn upsert_server(&mut self, server: Server) {
        self.servers.insert(server.deployment_name.clone(), server);
    }

    /// Removes a deleted server. No world is installed anywhere afterwards,
    /// so every backup flag is reset.
    pub fn remove_server(&mut self, deployment_name: &str) -> Option<Server> {
        let removed = self.servers.remove(deployment_name)?;
        for backup in self.backups.iter_mut().chain(self.replicas.iter_mut()) {
            backup.reset();
        }
        self.pending
            .retain(|_, file| !matches!(file, FileRef::Backup(_) | FileRef::Replica(_)));
        info!("Removed server {}", deployment_name);
        Some(removed)
    }

    pub fn add_mod(&mut self, new_mod: Mod) {
        self.mods.retain(|m| m.id != new_mod.id);
        self.mods.push(new_mod);
    }

    pub fn add_config(&mut self, config: ConfigFile) {
        self.configs.retain(|c| c.key != config.key);
        self.configs.push(config);
    }

    pub fn add_backup(&mut self, backup: Backup) {
        self.backups.retain(|b| b.key != backup.key);
        self.backups.push(backup);
    }

    pub fn set_config_content(&mut self, key: &str, content: String) -> Result<()> {
        let config = self
            .configs
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| Error::UnknownFile {
                kind: "config",
                key: key.to_string(),
            })?;
        config.content = Some(content);
        Ok(())
    }

    // Alerts

    pub fn push_alert(&mut self, message: impl Into<String>) -> u64 {
        let id = self.next_alert_id;
        self.next_alert_id += 1;
        let message = message.into();
        warn!("{}", message);
        self.alerts.push(Alert { id, message });
        id
    }

    pub fn dismiss_alert(&mut self, id: u64) -> bool {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.id != id);
        self.alerts.len() != before
    }
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}
