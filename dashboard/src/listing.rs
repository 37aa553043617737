//! Turns raw object-store listings into dashboard entities.

use shared::{
    base_name, file_name, Backup, ConfigFile, Mod, BACKUP_AUTO_MARKER, SEED_EXTENSION,
    WORLD_EXTENSION,
};
use std::collections::HashSet;
use std::fmt;

use crate::api::ObjectEntry;

/// Backups split by kind, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupListing {
    pub primary: Vec<Backup>,
    pub replica: Vec<Backup>,
}

pub fn mod_id(name: &str, size: u64) -> String {
    format!("{}_{}", name, size)
}

/// Mods are the `.zip` objects; anything outside `own_prefix` ships by default.
pub fn mods_from_listing(entries: &[ObjectEntry], own_prefix: &str) -> Vec<Mod> {
    entries
        .iter()
        .filter(|e| e.key.ends_with(".zip"))
        .map(|e| {
            let file = file_name(&e.key);
            Mod {
                id: mod_id(file, e.file_size),
                key: e.key.clone(),
                name: file.trim_end_matches(".zip").to_string(),
                size: e.file_size,
                is_default: !e.key.starts_with(own_prefix),
                installed: false,
                installing: false,
            }
        })
        .collect()
}

pub fn configs_from_listing(entries: &[ObjectEntry]) -> Vec<ConfigFile> {
    entries
        .iter()
        .filter(|e| !e.key.ends_with('/'))
        .map(|e| ConfigFile {
            key: e.key.clone(),
            name: file_name(&e.key).to_string(),
            size: e.file_size,
            installed: false,
            installing: false,
            content: None,
        })
        .collect()
}

pub fn is_replica_key(key: &str) -> bool {
    key.contains(BACKUP_AUTO_MARKER)
}

/// Splits `.db` objects into primary and replica backups.
///
/// A replica is only kept when the same listing holds a `.fwl` seed file with
/// the same directory and base name.
pub fn backups_from_listing(entries: &[ObjectEntry]) -> BackupListing {
    let seeds: HashSet<String> = entries
        .iter()
        .filter(|e| e.key.ends_with(SEED_EXTENSION))
        .map(|e| stem_key(&e.key))
        .collect();

    let mut listing = BackupListing::default();
    for entry in entries.iter().filter(|e| e.key.ends_with(WORLD_EXTENSION)) {
        let backup = Backup::new(entry.key.clone(), entry.file_size);
        if !is_replica_key(&entry.key) {
            listing.primary.push(backup);
        } else if seeds.contains(&stem_key(&entry.key)) {
            listing.replica.push(backup);
        }
    }
    listing
}

/// Object key with the file name reduced to its base name.
fn stem_key(key: &str) -> String {
    let file = file_name(key);
    let dir = &key[..key.len() - file.len()];
    format!("{}{}", dir, base_name(file))
}

/// `YYYY-MM-DD HH:MM` from a `<world>_backup_auto-<14 digits>.<ext>` key.
pub fn replica_timestamp(key: &str) -> Option<String> {
    let start = key.find(BACKUP_AUTO_MARKER)? + BACKUP_AUTO_MARKER.len();
    let digits = key.get(start..start + 14)?;
    if !digits.bytes().all(|b| b.is_ascii_digit())
        || key.as_bytes().get(start + 14) != Some(&b'.')
    {
        return None;
    }

    Some(format!(
        "{}-{}-{} {}:{}",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8],
        &digits[8..10],
        &digits[10..12]
    ))
}

/// Human-readable size in binary units, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Byte count that displays through [`format_file_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_file_size(self.0))
    }
}

/// Status label shown next to an installable entity.
pub fn install_label(installed: bool, installing: bool) -> &'static str {
    match (installing, installed) {
        (true, true) => "Uninstalling",
        (true, false) => "Installing",
        (false, true) => "Installed",
        (false, false) => "Not Installed",
    }
}
