//! REST clients for the hub API, the cluster API and the identity provider.
//!
//! Every call takes the [`Session`] it acts for by reference. Non-2xx answers
//! become [`ApiError::Status`] carrying the server's `message` when it sends
//! one, so callers can surface it to the user unchanged.

use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{FileOperation, Modifier, Server, WorldDetails};
use std::collections::HashMap;
use url::Url;

use crate::error::ApiError;
use crate::session::{Credentials, Session};

/// Object-store listings the hub API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePrefix {
    Mods,
    Configs,
    Backups,
}

impl FilePrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            FilePrefix::Mods => "mods",
            FilePrefix::Configs => "configs",
            FilePrefix::Backups => "backups",
        }
    }

    /// Accepts each prefix with or without a trailing slash.
    pub fn parse(value: &str) -> Option<Self> {
        match value.strip_suffix('/').unwrap_or(value) {
            "mods" => Some(FilePrefix::Mods),
            "configs" => Some(FilePrefix::Configs),
            "backups" => Some(FilePrefix::Backups),
            _ => None,
        }
    }
}

/// One object of a listing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    #[serde(rename = "fileSize", alias = "size", default)]
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerListing {
    Wrapped { servers: Vec<Server> },
    Bare(Vec<Server>),
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

/// Identity returned by the provider's current-user endpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    discord_id: &'a str,
    discord_username: &'a str,
    discord_email: &'a str,
    avatar_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct HubAccount {
    #[serde(default)]
    pub discord_id: String,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    discord_id: &'a str,
    refresh_token: &'a str,
}

/// Body of a file install/uninstall request.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FileInstallRequest {
    /// Object-store key of the file.
    pub prefix: String,
    /// Directory on the game server the file is written to or deleted from.
    pub destination: String,
    pub is_archive: bool,
    pub operation: FileOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PresignFile {
    pub name: String,
    pub size: u64,
    pub prefix: String,
}

#[derive(Debug, Serialize)]
struct PresignRequest<'a> {
    files: &'a [PresignFile],
}

#[derive(Debug, Deserialize)]
pub struct PresignedUrls {
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ScaleRequest {
    replicas: u32,
}

/// Keys offered by the create form; `standard` means "leave the game default".
pub const MODIFIER_KEYS: [&str; 5] = ["combat", "deathpenalty", "resources", "raids", "portals"];

/// What the user filled into the create-server form.
#[derive(Debug, Clone, Default)]
pub struct CreateServerForm {
    pub name: String,
    pub world: String,
    pub password: String,
    pub is_public: bool,
    pub is_crossplay: bool,
    /// Modifier key to chosen value, e.g. `combat -> hard`.
    pub modifiers: HashMap<String, String>,
    pub save_interval_seconds: u64,
    pub backup_count: u32,
    pub initial_backup_seconds: u64,
    pub backup_interval_seconds: u64,
}

pub type CreateServerRequest = WorldDetails;

impl CreateServerForm {
    pub fn into_request(self) -> CreateServerRequest {
        let mut modifiers = Vec::new();
        for key in MODIFIER_KEYS {
            if let Some(value) = self.modifiers.get(key) {
                if value != "standard" {
                    modifiers.push(Modifier {
                        key: key.to_string(),
                        value: value.clone(),
                    });
                }
            }
        }

        WorldDetails {
            name: self.name,
            world: self.world,
            password: self.password,
            enable_crossplay: self.is_crossplay,
            public: self.is_public,
            modifiers,
            save_interval_seconds: self.save_interval_seconds,
            backup_count: self.backup_count,
            initial_backup_seconds: self.initial_backup_seconds,
            backup_interval_seconds: self.backup_interval_seconds,
        }
    }
}

async fn execute(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} from API: {}", status, body);
    Err(ApiError::from_status(status, &body))
}

async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let text = execute(request).await?.text().await?;
    Ok(serde_json::from_str(&text)?)
}

async fn unit(request: RequestBuilder) -> Result<(), ApiError> {
    execute(request).await.map(|_| ())
}

/// Appends a relative endpoint to `base`, keeping any path the base carries.
fn endpoint(base: &Url, path: &str) -> Result<Url, ApiError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Lambda-backed API: sign-up, login, and object-store listings.
#[derive(Clone)]
pub struct HubApi {
    http: Client,
    base: Url,
}

impl HubApi {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        endpoint(&self.base, path)
    }

    pub async fn list_files(
        &self,
        session: &Session,
        prefix: FilePrefix,
    ) -> Result<Vec<ObjectEntry>, ApiError> {
        debug!("Listing {} for {}", prefix.as_str(), session.user_id);
        let request = self
            .http
            .get(self.url("prod/api/v1/file")?)
            .bearer_auth(&session.credentials.id_token)
            .query(&[
                ("discordId", session.user_id.as_str()),
                ("prefix", prefix.as_str()),
                ("refreshToken", session.credentials.refresh_token.as_str()),
            ]);
        let listing: FileListing = json(request).await?;
        Ok(listing.files)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, ApiError> {
        let request = self
            .http
            .post(self.url("prod/api/v1/discord/oauth")?)
            .json(&serde_json::json!({ "code": code }));
        json(request).await
    }

    /// Creates the hub account for `user`, or returns it if it already exists.
    pub async fn create_user(&self, user: &IdentityUser) -> Result<HubAccount, ApiError> {
        let body = CreateUserRequest {
            discord_id: &user.id,
            discord_username: &user.username,
            discord_email: user.email.as_deref().unwrap_or_default(),
            avatar_id: user.avatar.as_deref().unwrap_or_default(),
        };
        let request = self
            .http
            .post(self.url("prod/api/v1/cognito/create-user")?)
            .json(&body);
        json(request).await
    }

    pub async fn refresh_session(&self, session: &Session) -> Result<Credentials, ApiError> {
        let body = RefreshRequest {
            discord_id: &session.user_id,
            refresh_token: &session.credentials.refresh_token,
        };
        let request = self
            .http
            .post(self.url("prod/api/v1/cognito/refresh-session")?)
            .json(&body);
        json(request).await
    }
}

/// Cluster API: servers, file installs and upload URLs.
#[derive(Clone)]
pub struct KubeApi {
    http: Client,
    base: Url,
}

impl KubeApi {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        session: &Session,
    ) -> Result<RequestBuilder, ApiError> {
        let url = endpoint(&self.base, path)?;
        Ok(self
            .http
            .request(method, url)
            .basic_auth(&session.user_id, Some(&session.credentials.refresh_token)))
    }

    pub async fn servers(&self, session: &Session) -> Result<Vec<Server>, ApiError> {
        let request = self.request(reqwest::Method::GET, "api/v1/server/", session)?;
        let listing: ServerListing = json(request).await?;
        Ok(match listing {
            ServerListing::Wrapped { servers } => servers,
            ServerListing::Bare(servers) => servers,
        })
    }

    pub async fn create_server(
        &self,
        session: &Session,
        details: &CreateServerRequest,
    ) -> Result<Server, ApiError> {
        let request = self
            .request(reqwest::Method::POST, "api/v1/server/create", session)?
            .json(details);
        json(request).await
    }

    pub async fn patch_server(
        &self,
        session: &Session,
        details: &WorldDetails,
    ) -> Result<Server, ApiError> {
        let request = self
            .request(reqwest::Method::PUT, "api/v1/server/update", session)?
            .json(details);
        json(request).await
    }

    pub async fn delete_server(&self, session: &Session) -> Result<(), ApiError> {
        let request = self.request(reqwest::Method::DELETE, "api/v1/server/delete", session)?;
        unit(request).await
    }

    /// Scales the user's server deployment; 0 stops it, 1 starts it.
    pub async fn scale_server(&self, session: &Session, replicas: u32) -> Result<(), ApiError> {
        let request = self
            .request(reqwest::Method::PUT, "api/v1/server/scale", session)?
            .json(&ScaleRequest { replicas });
        unit(request).await
    }

    pub async fn install_file(
        &self,
        session: &Session,
        install: &FileInstallRequest,
    ) -> Result<(), ApiError> {
        let request = self
            .request(reqwest::Method::POST, "api/v1/file/install", session)?
            .json(install);
        unit(request).await
    }

    pub async fn generate_presigned_urls(
        &self,
        session: &Session,
        files: &[PresignFile],
    ) -> Result<PresignedUrls, ApiError> {
        let request = self
            .request(reqwest::Method::POST, "api/v1/file/generate-signed-url", session)?
            .json(&PresignRequest { files });
        json(request).await
    }
}

/// OAuth identity provider.
#[derive(Clone)]
pub struct IdentityApi {
    http: Client,
    base: Url,
}

impl IdentityApi {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    pub async fn current_user(&self, access_token: &str) -> Result<IdentityUser, ApiError> {
        let request = self
            .http
            .get(endpoint(&self.base, "users/@me")?)
            .bearer_auth(access_token);
        json(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_prefix_parse() {
        assert_eq!(FilePrefix::parse("mods"), Some(FilePrefix::Mods));
        assert_eq!(FilePrefix::parse("configs/"), Some(FilePrefix::Configs));
        assert_eq!(FilePrefix::parse("backups/"), Some(FilePrefix::Backups));
        assert_eq!(FilePrefix::parse("worlds"), None);
        assert_eq!(FilePrefix::parse("mods//"), None);
    }

    #[test]
    fn test_create_form_skips_standard_modifiers() {
        let mut form = CreateServerForm {
            name: "my-server".into(),
            world: "midgard".into(),
            backup_count: 3,
            ..Default::default()
        };
        form.modifiers.insert("combat".into(), "hard".into());
        form.modifiers.insert("raids".into(), "standard".into());
        form.modifiers.insert("portals".into(), "casual".into());
        form.modifiers.insert("unrelated".into(), "x".into());

        let request = form.into_request();
        let keys: Vec<&str> = request.modifiers.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["combat", "portals"]);
        assert_eq!(request.name, "my-server");
        assert_eq!(request.backup_count, 3);
    }

    #[test]
    fn test_install_request_body() {
        let body = FileInstallRequest {
            prefix: "mods/1/EpicLoot.zip".into(),
            destination: "/valheim/BepInEx/plugins".into(),
            is_archive: true,
            operation: FileOperation::Write,
            request_id: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["operation"], "write");
        assert!(value.get("request_id").is_none());
    }

    #[test]
    fn test_server_listing_shapes() {
        let bare: ServerListing = serde_json::from_str("[]").unwrap();
        assert!(matches!(bare, ServerListing::Bare(ref s) if s.is_empty()));
        let wrapped: ServerListing = serde_json::from_str(r#"{"servers": []}"#).unwrap();
        assert!(matches!(wrapped, ServerListing::Wrapped { .. }));
    }

    #[test]
    fn test_object_entry_accepts_size_alias() {
        let entry: ObjectEntry =
            serde_json::from_str(r#"{"key": "mods/1/a.zip", "size": 12}"#).unwrap();
        assert_eq!(entry.file_size, 12);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let staged = Url::parse("https://hub.example/stage").unwrap();
        assert_eq!(
            endpoint(&staged, "prod/api/v1/file").unwrap().as_str(),
            "https://hub.example/stage/prod/api/v1/file"
        );

        let rooted = Url::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            endpoint(&rooted, "/api/v1/server/").unwrap().as_str(),
            "http://127.0.0.1:8080/api/v1/server/"
        );

        let identity = Url::parse("https://discord.com/api/").unwrap();
        assert_eq!(
            endpoint(&identity, "users/@me").unwrap().as_str(),
            "https://discord.com/api/users/@me"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        let api = KubeApi::new(Client::new(), Url::parse("http://127.0.0.1:9").unwrap());
        let session = Session::new("1", "viking", Credentials::default());
        let err = api.servers(&session).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
