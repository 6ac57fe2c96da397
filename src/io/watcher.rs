use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

use crate::core::state::{Settings, SettingsStore};
use crate::io::console::line;

/// Watches the settings file and republishes it on every change. The parent
/// directory is watched so that editors which replace the file are seen too.
/// Keep the returned watcher alive for as long as reloads are wanted.
pub fn watch_settings(path: &Path, store: SettingsStore) -> Result<RecommendedWatcher> {
    let target: PathBuf = path.to_path_buf();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = target.file_name().map(|n| n.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                let touches_settings = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if touches_settings {
                    reload(&target, &store);
                }
            }
            Err(e) => line(&format!("⚠️ Settings watch error: {:?}", e)),
        }
    })?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;
    Ok(watcher)
}

/// A file that fails to parse keeps the previous snapshot live.
pub fn reload(path: &Path, store: &SettingsStore) -> bool {
    match Settings::load_file(path) {
        Ok(mut settings) => {
            settings.apply_env();
            for warning in settings.sanitize() {
                line(&format!("⚠️ {}", warning));
            }
            if *store.current() != settings {
                store.replace(settings);
                line(&format!("🔄 Settings reloaded from {}", path.display()));
            }
            true
        }
        Err(e) => {
            line(&format!("⚠️ Keeping previous settings: {:#}", e));
            false
        }
    }
}
