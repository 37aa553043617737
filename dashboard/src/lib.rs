//! # Dashboard Library
//!
//! Client-side state for one signed-in user of a hosted game-server service.
//! The library keeps a local picture of the user's servers, mods, config
//! files, world saves and automatic backups, and keeps it current from two
//! sources: REST listings at startup and a push channel afterwards.
//!
//! ## Architecture Overview
//!
//! ### Push-driven reconciliation
//! A single WebSocket connection delivers log lines, utilization samples and
//! container lifecycle events. Each frame is decoded by [`shared::protocol`]
//! and applied to the [`state::Dashboard`] in receipt order. Server lifecycle
//! events move a server through its state machine; file-install events
//! resolve the install or uninstall of mods, configs and world saves.
//!
//! ### Optimistic user actions
//! Starting, stopping, installing and uninstalling all update the local state
//! before the backend confirms. Install requests carry a request id; when the
//! completion event echoes it, only that file is resolved. If the REST call
//! itself fails the optimistic change is rolled back and an alert is raised.
//!
//! ## Module Organization
//!
//! ### State (`state`)
//! The reconciled collections, event application and optimistic transitions.
//!
//! ### Network (`network`)
//! The event loop: push channel, user actions and the REST calls they make.
//!
//! ### API (`api`)
//! Typed clients for the hub API, the cluster API and the identity provider.
//!
//! ### Listing (`listing`)
//! Classifies object-store listings into mods, configs and backups.
//!
//! ### Upload (`upload`)
//! Validates files locally and uploads them through presigned URLs.
//!
//! ### Session (`session`)
//! Explicit user context and its persistence between runs.
//!
//! ### Commands, Config, Rendering
//! Prompt parsing, command-line configuration and the text view.
//!
//! ## Usage Example
//!
//! ```no_run
//! use dashboard::config::Config;
//! use dashboard::network::Client;
//! use dashboard::session::SessionStore;
//! # async fn demo(config: Config) -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionStore::new(config.session_file.clone())
//!     .load()?
//!     .ok_or(dashboard::session::SessionError::NotLoggedIn)?;
//!
//! let mut client = Client::new(config, session);
//! client.load_initial().await;
//!
//! let (_actions, receiver) = tokio::sync::mpsc::channel(16);
//! client.run(receiver).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod network;
pub mod rendering;
pub mod session;
pub mod state;
pub mod upload;

pub use error::{ApiError, Error, Result};
pub use network::Client;
pub use state::Dashboard;
