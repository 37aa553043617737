//! Integration tests for the dashboard client
//!
//! These tests drive the push channel through a real local WebSocket server
//! and check how state, REST failure handling and uploads fit together.

use clap::Parser;
use dashboard::commands::Action;
use dashboard::config::{Args, Config};
use dashboard::listing::BackupListing;
use dashboard::network::Client;
use dashboard::session::{Credentials, Session};
use dashboard::state::FileRef;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use shared::{Backup, Envelope, Mod, Server, ServerState, WorldDetails};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;

/// PUSH CHANNEL TESTS
mod push_channel_tests {
    use super::*;

    /// Frames from the push server reach the dashboard in order; bad frames are skipped
    #[tokio::test]
    async fn push_frames_update_dashboard() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let frames = vec![
            "not json at all".to_string(),
            frame("Unknown", json!({ "foo": "bar" })),
            frame("PostStart", json!({ "containerName": "valheim" })),
            frame(
                "ContainerReady",
                json!({ "containerName": "valheim", "containerType": "server" }),
            ),
            frame(
                "JoinCode",
                json!({ "joinCode": "123456", "containerName": "valheim" }),
            ),
            frame("Logs", json!({ "logs": ["Game server started", "World loaded"] })),
            frame(
                "Metrics",
                json!({ "cpuUtilization": "42.4567", "memoryUtilization": "61.019" }),
            ),
            frame(
                "PreStop",
                json!({
                    "containerName": "file-install-1",
                    "containerType": "file-install",
                    "operation": "write"
                }),
            ),
        ];

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut path = String::new();
            let callback = |req: &Request, resp: Response| {
                path = req.uri().to_string();
                Ok::<Response, ErrorResponse>(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            for text in frames {
                ws.send(Message::Text(text.into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
            path
        });

        let mut client = Client::new(config_for(&format!("ws://{}", addr)), session());
        client
            .dashboard_mut()
            .load_servers(vec![server_entry("valheim", ServerState::Scheduling)]);
        client.dashboard_mut().load_mods(vec![mod_entry("a"), mod_entry("b")]);
        client
            .dashboard_mut()
            .begin_file_operation(&FileRef::Mod("a".into()), true)
            .unwrap();

        // No user input: the loop ends once the push channel is gone.
        let (actions, receiver) = mpsc::channel(4);
        drop(actions);
        timeout(Duration::from_secs(5), client.run(receiver))
            .await
            .expect("push loop should end when the server closes");

        let path = server.await.unwrap();
        assert_eq!(path, "/?id=215299779352068097");

        let dashboard = client.dashboard();
        let server = dashboard.server("valheim").unwrap();
        assert_eq!(server.state, ServerState::Running);
        assert_eq!(server.join_code.as_deref(), Some("123456"));
        assert_eq!(dashboard.logs(), ["Game server started", "World loaded"]);

        let sample = dashboard.metrics().latest().unwrap();
        assert_approx_eq::assert_approx_eq!(sample.cpu, 42.45, 1e-9);
        assert_approx_eq::assert_approx_eq!(sample.memory, 61.01, 1e-9);

        assert!(dashboard.mods()[0].installed && !dashboard.mods()[0].installing);
        assert!(!dashboard.mods()[1].installed && !dashboard.mods()[1].installing);
        assert_eq!(dashboard.alerts().len(), 1);
        assert!(dashboard.alerts()[0]
            .message
            .starts_with("Lost connection to the server"));
    }

    /// A quit action ends the loop while the connection is still open
    #[tokio::test]
    async fn quit_action_ends_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Hold the connection open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut client = Client::new(config_for(&format!("ws://{}", addr)), session());
        let (actions, receiver) = mpsc::channel(4);
        actions.send(Action::Quit).await.unwrap();

        timeout(Duration::from_secs(5), client.run(receiver))
            .await
            .expect("quit should end the loop");
        assert!(client.dashboard().alerts().is_empty());
    }

    /// No push server: the failure becomes an alert and actions still run
    #[tokio::test]
    async fn connection_refused_keeps_actions_running() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = Client::new(config_for(&format!("ws://{}", addr)), session());
        client
            .dashboard_mut()
            .load_servers(vec![server_entry("valheim", ServerState::Stopped)]);

        let (actions, receiver) = mpsc::channel(4);
        actions.send(Action::Start("valheim".into())).await.unwrap();
        actions.send(Action::Quit).await.unwrap();

        timeout(Duration::from_secs(5), client.run(receiver))
            .await
            .expect("a refused connection should not block the loop");

        let alerts = client.dashboard().alerts();
        let connect = alerts
            .iter()
            .filter(|a| a.message.starts_with("Could not connect to the server"))
            .count();
        assert_eq!(connect, 1);
        // The start reached the (unreachable) REST API and was rolled back.
        assert!(alerts
            .iter()
            .any(|a| a.message.starts_with("Failed to start server valheim")));
        assert_eq!(
            client.dashboard().server("valheim").unwrap().state,
            ServerState::Stopped
        );
    }

    /// A dropped connection leaves the dashboard interactive
    #[tokio::test]
    async fn actions_run_after_push_channel_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            let _ = closed_tx.send(());
        });

        let mut client = Client::new(config_for(&format!("ws://{}", addr)), session());
        client
            .dashboard_mut()
            .load_servers(vec![server_entry("valheim", ServerState::Stopped)]);

        let (actions, receiver) = mpsc::channel(4);
        let driver = tokio::spawn(async move {
            closed_rx.await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            actions.send(Action::Start("valheim".into())).await.unwrap();
        });

        timeout(Duration::from_secs(5), client.run(receiver))
            .await
            .expect("loop should end once the channel is gone and input closes");
        driver.await.unwrap();

        let messages: Vec<&str> = client
            .dashboard()
            .alerts()
            .iter()
            .map(|a| a.message.as_str())
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Lost connection to the server"));
        assert!(messages[1].starts_with("Failed to start server valheim"));
    }
}

/// REST FAILURE TESTS
mod rest_failure_tests {
    use super::*;

    /// A rejected install rolls the optimistic flag back and raises an alert
    #[tokio::test]
    async fn failed_install_rolls_back() {
        let mut client = Client::new(config_for("ws://127.0.0.1:9"), session());
        client.dashboard_mut().load_mods(vec![mod_entry("a")]);

        client
            .perform(Action::Install(FileRef::Mod("a".into())))
            .await;

        let dashboard = client.dashboard();
        assert!(!dashboard.mods()[0].installing);
        assert!(!dashboard.mods()[0].installed);
        assert_eq!(dashboard.pending_operations(), 0);
        assert_eq!(dashboard.alerts().len(), 1);
        assert!(dashboard.alerts()[0].message.starts_with("Failed to install mod a"));
    }

    /// A rejected start restores the previous server state
    #[tokio::test]
    async fn failed_start_restores_state() {
        let mut client = Client::new(config_for("ws://127.0.0.1:9"), session());
        client
            .dashboard_mut()
            .load_servers(vec![server_entry("valheim", ServerState::Stopped)]);

        client.perform(Action::Start("valheim".into())).await;

        let dashboard = client.dashboard();
        assert_eq!(dashboard.server("valheim").unwrap().state, ServerState::Stopped);
        assert_eq!(dashboard.alerts().len(), 1);
    }

    /// A rejected delete keeps the server and its backup flags
    #[tokio::test]
    async fn failed_delete_keeps_server() {
        let mut client = Client::new(config_for("ws://127.0.0.1:9"), session());
        client
            .dashboard_mut()
            .load_servers(vec![server_entry("valheim", ServerState::Running)]);
        client.dashboard_mut().load_backups(BackupListing {
            primary: vec![Backup {
                key: "valheim-backups-auto/1/midgard.db".into(),
                file_size: 1,
                installed: true,
                installing: false,
            }],
            replica: Vec::new(),
        });

        client.perform(Action::Delete("valheim".into())).await;

        let dashboard = client.dashboard();
        assert!(dashboard.server("valheim").is_some());
        assert!(dashboard.backups()[0].installed);
        assert_eq!(dashboard.alerts().len(), 1);
    }

    /// Listing failures leave collections empty and surface one alert per listing
    #[tokio::test]
    async fn failed_initial_load_raises_alerts() {
        let mut client = Client::new(config_for("ws://127.0.0.1:9"), session());
        client.load_initial().await;

        let dashboard = client.dashboard();
        assert_eq!(dashboard.servers().count(), 0);
        assert!(dashboard.mods().is_empty());
        assert_eq!(dashboard.alerts().len(), 4);
    }

    /// Upload validation runs before any request
    #[test]
    fn invalid_upload_is_rejected_locally() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("foo.fwl");
        let world = dir.path().join("bar.db");
        std::fs::write(&seed, b"seed").unwrap();
        std::fs::write(&world, b"world").unwrap();

        let mut client = Client::new(config_for("ws://127.0.0.1:9"), session());
        let target = dashboard::commands::UploadTarget::World { seed, world };
        tokio_test::block_on(client.perform(Action::Upload(target)));

        let dashboard = client.dashboard();
        assert!(dashboard.backups().is_empty());
        assert_eq!(
            dashboard.alerts()[0].message,
            "File names must match (excluding extensions)"
        );
    }
}

/// STATE PROPERTY TESTS
mod state_tests {
    use super::*;
    use dashboard::state::Dashboard;
    use shared::{ContainerType, FileOperation, PushEvent};

    /// Replaying a decoded lifecycle frame leaves the state unchanged
    #[test]
    fn replayed_frames_are_idempotent() {
        let mut dashboard = Dashboard::new();
        dashboard.load_servers(vec![server_entry("valheim", ServerState::Loading)]);
        let ready = PushEvent::decode(&frame(
            "ContainerReady",
            json!({ "containerName": "valheim", "containerType": "server" }),
        ))
        .unwrap();

        assert!(dashboard.apply(ready.clone()));
        assert!(!dashboard.apply(ready));
    }

    /// A late uncorrelated completion resolves a newer optimistic flag
    #[test]
    fn stale_broadcast_resolves_newer_flag() {
        let mut dashboard = Dashboard::new();
        dashboard.load_mods(vec![mod_entry("a"), mod_entry("b")]);
        dashboard
            .begin_file_operation(&FileRef::Mod("a".into()), true)
            .unwrap();
        dashboard.apply(PushEvent::PreStop {
            container_name: "file-install-1".into(),
            container_type: ContainerType::FileInstall,
            operation: FileOperation::Write,
            request_id: None,
        });
        dashboard
            .begin_file_operation(&FileRef::Mod("b".into()), true)
            .unwrap();

        // A duplicate of the first completion arrives after the second install started.
        dashboard.apply(PushEvent::PreStop {
            container_name: "file-install-1".into(),
            container_type: ContainerType::FileInstall,
            operation: FileOperation::Write,
            request_id: None,
        });
        assert!(dashboard.mods()[1].installed);
        assert!(!dashboard.mods()[1].installing);
    }
}

// HELPER FUNCTIONS

fn frame(kind: &str, content: serde_json::Value) -> String {
    Envelope::wrap(kind, &content).unwrap().to_json().unwrap()
}

fn config_for(ws_url: &str) -> Config {
    let args = Args::parse_from([
        "dashboard",
        "--ws-url",
        ws_url,
        "--api-url",
        "http://127.0.0.1:9",
        "--kube-url",
        "http://127.0.0.1:9",
        "--session-file",
        "target/test-session.bin",
    ]);
    Config::try_from(&args).unwrap()
}

fn session() -> Session {
    Session::new(
        "215299779352068097",
        "viking",
        Credentials {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            id_token: "id".into(),
        },
    )
}

fn server_entry(name: &str, state: ServerState) -> Server {
    Server {
        deployment_name: name.to_string(),
        server_ip: "127.0.0.1".into(),
        server_port: 2456,
        state,
        world_details: WorldDetails {
            name: name.to_string(),
            world: "midgard".into(),
            password: "password1234".into(),
            enable_crossplay: false,
            public: false,
            modifiers: Vec::new(),
            save_interval_seconds: 1800,
            backup_count: 3,
            initial_backup_seconds: 7200,
            backup_interval_seconds: 43200,
        },
        join_code: None,
        mod_pvc_name: None,
    }
}

fn mod_entry(id: &str) -> Mod {
    Mod {
        id: id.to_string(),
        key: format!("mods/215299779352068097/{}.zip", id),
        name: id.to_string(),
        size: 100,
        is_default: false,
        installed: false,
        installing: false,
    }
}
