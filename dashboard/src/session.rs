//! Signed-in user context and its on-disk persistence.
//!
//! The session is an explicit value handed to the API clients by reference;
//! nothing reads tokens from ambient storage. `SessionStore` is the only place
//! a session is loaded from or written to.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::api::{HubApi, IdentityApi};
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt session file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("no saved session, log in first")]
    NotLoggedIn,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    /// Identity-provider user id; also keys the push channel and object prefixes.
    pub user_id: String,
    pub username: String,
    pub avatar_id: Option<String>,
    pub credentials: Credentials,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            avatar_id: None,
            credentials,
        }
    }

    /// Object-store prefix owned by this user under `root` (e.g. `mods`).
    pub fn object_prefix(&self, root: &str) -> String {
        format!("{}/{}/", root.trim_end_matches('/'), self.user_id)
    }
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved session, `Ok(None)` when nobody is logged in.
    pub fn load(&self) -> Result<Option<Session>, SessionError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let session = bincode::deserialize(&bytes).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!("Loaded session from {}", self.path.display());
        Ok(Some(session))
    }

    /// Writes through a temporary sibling file so a crash never leaves half a session.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };

        let bytes = bincode::serialize(session).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!("Saved session for {} to {}", session.user_id, self.path.display());
        Ok(())
    }

    /// Logout: forget the saved session. Missing files are not an error.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Completes the authorization-code flow and builds a session.
///
/// The code is exchanged for provider tokens, the provider identity is
/// fetched with the access token, and the hub account is created (or
/// returned if it already exists) to obtain the hub credentials.
pub async fn login(hub: &HubApi, identity: &IdentityApi, code: &str) -> Result<Session, ApiError> {
    let tokens = hub.exchange_code(code).await?;
    let user = identity.current_user(&tokens.access_token).await?;
    info!("Authenticated as {} ({})", user.username, user.id);

    let account = hub.create_user(&user).await?;
    let credentials = Credentials {
        access_token: tokens.access_token,
        refresh_token: account.credentials.refresh_token,
        id_token: account.credentials.id_token,
    };

    Ok(Session {
        user_id: user.id,
        username: user.username,
        avatar_id: user.avatar,
        credentials,
    })
}

/// Replaces the hub credentials of `session` with refreshed ones.
pub async fn refresh(hub: &HubApi, session: &mut Session) -> Result<(), ApiError> {
    let fresh = hub.refresh_session(session).await?;
    session.credentials.id_token = fresh.id_token;
    if !fresh.refresh_token.is_empty() {
        session.credentials.refresh_token = fresh.refresh_token;
    }
    if !fresh.access_token.is_empty() {
        session.credentials.access_token = fresh.access_token;
    }
    info!("Refreshed credentials for {}", session.user_id);
    Ok(())
}
