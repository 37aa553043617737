//! User commands typed at the dashboard prompt.

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::api::{CreateServerForm, MODIFIER_KEYS};
use crate::state::FileRef;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadTarget {
    Mod(PathBuf),
    Config(PathBuf),
    World { seed: PathBuf, world: PathBuf },
}

#[derive(Debug, Clone)]
pub enum Action {
    Install(FileRef),
    Uninstall(FileRef),
    Start(String),
    Stop(String),
    Delete(String),
    Create(CreateServerForm),
    Update(CreateServerForm),
    Upload(UploadTarget),
    Refresh,
    Status,
    Logs(usize),
    Metrics,
    Dismiss(u64),
    Logout,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  install|uninstall mod|config|backup|replica <id-or-key>
  start|stop|delete <server>
  create|update <name> <world> [password=..] [public=true] [crossplay=true]
         [save_interval=..] [backup_count=..] [initial_backup=..]
         [backup_interval=..] [combat|deathpenalty|resources|raids|portals=..]
  upload mod <file.zip> | upload config <file> | upload world <seed.fwl> <world.db>
  refresh | status | logs [n] | metrics | dismiss <alert-id>
  logout | help | quit";

const FILE_USAGE: &str = "install|uninstall mod|config|backup|replica <id-or-key>";
const CREATE_USAGE: &str = "create|update <name> <world> [key=value ...]";
const UPLOAD_USAGE: &str = "upload mod <file> | upload config <file> | upload world <seed> <world>";

fn file_ref(words: &[&str]) -> Result<FileRef, CommandError> {
    match words {
        ["mod", id] => Ok(FileRef::Mod(id.to_string())),
        ["config", key] => Ok(FileRef::Config(key.to_string())),
        ["backup", key] => Ok(FileRef::Backup(key.to_string())),
        ["replica", key] => Ok(FileRef::Replica(key.to_string())),
        _ => Err(CommandError::Usage(FILE_USAGE)),
    }
}

fn server_name(words: &[&str], usage: &'static str) -> Result<String, CommandError> {
    match words {
        [name] => Ok(name.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn create_form(words: &[&str]) -> Result<CreateServerForm, CommandError> {
    let [name, world, options @ ..] = words else {
        return Err(CommandError::Usage(CREATE_USAGE));
    };

    let mut form = CreateServerForm {
        name: name.to_string(),
        world: world.to_string(),
        modifiers: HashMap::new(),
        save_interval_seconds: 1800,
        backup_count: 3,
        initial_backup_seconds: 7200,
        backup_interval_seconds: 43200,
        ..Default::default()
    };

    for option in options {
        let (key, value) = option
            .split_once('=')
            .ok_or(CommandError::Usage(CREATE_USAGE))?;
        match key {
            "password" => form.password = value.to_string(),
            "public" => form.is_public = parse_value(key, value)?,
            "crossplay" => form.is_crossplay = parse_value(key, value)?,
            "save_interval" => form.save_interval_seconds = parse_value(key, value)?,
            "backup_count" => form.backup_count = parse_value(key, value)?,
            "initial_backup" => form.initial_backup_seconds = parse_value(key, value)?,
            "backup_interval" => form.backup_interval_seconds = parse_value(key, value)?,
            modifier if MODIFIER_KEYS.contains(&modifier) => {
                form.modifiers.insert(modifier.to_string(), value.to_string());
            }
            _ => {
                return Err(CommandError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        }
    }
    Ok(form)
}

fn upload_target(words: &[&str]) -> Result<UploadTarget, CommandError> {
    match words {
        ["mod", path] => Ok(UploadTarget::Mod(PathBuf::from(path))),
        ["config", path] => Ok(UploadTarget::Config(PathBuf::from(path))),
        ["world", seed, world] => Ok(UploadTarget::World {
            seed: PathBuf::from(seed),
            world: PathBuf::from(world),
        }),
        _ => Err(CommandError::Usage(UPLOAD_USAGE)),
    }
}

/// Parses one prompt line. Words are separated by whitespace.
pub fn parse(line: &str) -> Result<Action, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, rest)) = words.split_first() else {
        return Err(CommandError::Empty);
    };

    match command {
        "install" => Ok(Action::Install(file_ref(rest)?)),
        "uninstall" => Ok(Action::Uninstall(file_ref(rest)?)),
        "start" => Ok(Action::Start(server_name(rest, "start <server>")?)),
        "stop" => Ok(Action::Stop(server_name(rest, "stop <server>")?)),
        "delete" => Ok(Action::Delete(server_name(rest, "delete <server>")?)),
        "create" => Ok(Action::Create(create_form(rest)?)),
        "update" => Ok(Action::Update(create_form(rest)?)),
        "upload" => Ok(Action::Upload(upload_target(rest)?)),
        "refresh" => Ok(Action::Refresh),
        "status" => Ok(Action::Status),
        "logs" => match rest {
            [] => Ok(Action::Logs(20)),
            [n] => Ok(Action::Logs(parse_value("logs", n)?)),
            _ => Err(CommandError::Usage("logs [n]")),
        },
        "metrics" => Ok(Action::Metrics),
        "dismiss" => match rest {
            [id] => Ok(Action::Dismiss(parse_value("dismiss", id)?)),
            _ => Err(CommandError::Usage("dismiss <alert-id>")),
        },
        "logout" => Ok(Action::Logout),
        "help" => Ok(Action::Help),
        "quit" | "exit" => Ok(Action::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_actions() {
        assert!(matches!(
            parse("install mod EpicLoot.zip_1000"),
            Ok(Action::Install(FileRef::Mod(id))) if id == "EpicLoot.zip_1000"
        ));
        assert!(matches!(
            parse("  uninstall   backup valheim-backups-auto/1/midgard.db "),
            Ok(Action::Uninstall(FileRef::Backup(key)))
                if key == "valheim-backups-auto/1/midgard.db"
        ));
        assert_eq!(
            parse("install world x").unwrap_err(),
            CommandError::Usage(FILE_USAGE)
        );
    }

    #[test]
    fn test_parse_server_actions() {
        assert!(matches!(parse("start valheim"), Ok(Action::Start(n)) if n == "valheim"));
        assert!(matches!(parse("stop valheim"), Ok(Action::Stop(_))));
        assert!(matches!(parse("delete valheim"), Ok(Action::Delete(_))));
        assert!(parse("start").is_err());
    }

    #[test]
    fn test_parse_create() {
        let Ok(Action::Create(form)) =
            parse("create my-server midgard password=secret public=true combat=hard backup_count=5")
        else {
            panic!("expected a create action");
        };
        assert_eq!(form.name, "my-server");
        assert_eq!(form.world, "midgard");
        assert_eq!(form.password, "secret");
        assert!(form.is_public);
        assert!(!form.is_crossplay);
        assert_eq!(form.backup_count, 5);
        assert_eq!(form.save_interval_seconds, 1800);
        assert_eq!(form.modifiers.get("combat").map(String::as_str), Some("hard"));

        assert!(matches!(
            parse("create my-server midgard public=maybe"),
            Err(CommandError::InvalidValue { .. })
        ));
        assert!(matches!(parse("create my-server"), Err(CommandError::Usage(_))));
        assert!(matches!(
            parse("update my-server midgard raids=none"),
            Ok(Action::Update(form)) if form.modifiers.len() == 1
        ));
    }

    #[test]
    fn test_parse_upload() {
        assert!(matches!(
            parse("upload world midgard.fwl midgard.db"),
            Ok(Action::Upload(UploadTarget::World { .. }))
        ));
        assert!(matches!(
            parse("upload mod EpicLoot.zip"),
            Ok(Action::Upload(UploadTarget::Mod(_)))
        ));
        assert!(parse("upload world midgard.fwl").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse("").unwrap_err(), CommandError::Empty);
        assert!(matches!(parse("logs"), Ok(Action::Logs(20))));
        assert!(matches!(parse("logs 5"), Ok(Action::Logs(5))));
        assert!(matches!(parse("dismiss 3"), Ok(Action::Dismiss(3))));
        assert!(matches!(parse("quit"), Ok(Action::Quit)));
        assert!(matches!(parse("frobnicate"), Err(CommandError::Unknown(_))));
    }
}
