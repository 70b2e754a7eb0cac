//! Fixed-path JSON configuration, watched for changes and swapped in
//! atomically. Reload polling reuses the `modified_since` mtime-check idiom
//! the `shaders` build crate uses for its spirv cache.

use notify::{Config, PollWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

fn default_threshold() -> f32 {
    0.5
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mirror_window: bool,
    #[serde(default)]
    pub quirk_disable_running_start: bool,
    #[serde(default)]
    pub quirk_sync_gpu_work_in_end_frame: bool,
    #[serde(default)]
    pub quirk_disable_async_submission: bool,

    #[serde(default)]
    pub aim_pose_offset_x: f32,
    #[serde(default)]
    pub aim_pose_offset_y: f32,
    #[serde(default)]
    pub aim_pose_offset_z: f32,
    #[serde(default)]
    pub aim_pose_rot_x: f32,
    #[serde(default)]
    pub aim_pose_rot_y: f32,
    #[serde(default)]
    pub aim_pose_rot_z: f32,

    #[serde(default)]
    pub grip_pose_offset_x: f32,
    #[serde(default)]
    pub grip_pose_offset_y: f32,
    #[serde(default)]
    pub grip_pose_offset_z: f32,
    #[serde(default)]
    pub grip_pose_rot_x: f32,
    #[serde(default)]
    pub grip_pose_rot_y: f32,
    #[serde(default)]
    pub grip_pose_rot_z: f32,

    #[serde(default)]
    pub palm_pose_offset_x: f32,
    #[serde(default)]
    pub palm_pose_offset_y: f32,
    #[serde(default)]
    pub palm_pose_offset_z: f32,
    #[serde(default)]
    pub palm_pose_rot_x: f32,
    #[serde(default)]
    pub palm_pose_rot_y: f32,
    #[serde(default)]
    pub palm_pose_rot_z: f32,

    #[serde(default)]
    pub async_submission_priority: AsyncSubmissionPriority,

    /// `floatValue > threshold` derives a bool from a float-typed binding;
    /// OpenXR leaves the threshold runtime-defined (design note #3).
    #[serde(default = "default_threshold")]
    pub bool_from_float_threshold: f32,

    /// Anything else in the file -- unknown keys are ignored rather than
    /// rejected, for forward compatibility with newer config versions.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AsyncSubmissionPriority {
    Lowest,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    Highest,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirror_window: false,
            quirk_disable_running_start: false,
            quirk_sync_gpu_work_in_end_frame: false,
            quirk_disable_async_submission: false,
            aim_pose_offset_x: 0.0,
            aim_pose_offset_y: 0.0,
            aim_pose_offset_z: 0.0,
            aim_pose_rot_x: 0.0,
            aim_pose_rot_y: 0.0,
            aim_pose_rot_z: 0.0,
            grip_pose_offset_x: 0.0,
            grip_pose_offset_y: 0.0,
            grip_pose_offset_z: 0.0,
            grip_pose_rot_x: 0.0,
            grip_pose_rot_y: 0.0,
            grip_pose_rot_z: 0.0,
            palm_pose_offset_x: 0.0,
            palm_pose_offset_y: 0.0,
            palm_pose_offset_z: 0.0,
            palm_pose_rot_x: 0.0,
            palm_pose_rot_y: 0.0,
            palm_pose_rot_z: 0.0,
            async_submission_priority: AsyncSubmissionPriority::Normal,
            bool_from_float_threshold: default_threshold(),
            extra: serde_json::Map::new(),
        }
    }
}

fn config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("novaxr.json");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/novaxr.json");
    }
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata).join("NovaXR/novaxr.json");
    }
    PathBuf::from("novaxr.json")
}

fn load_from(path: &std::path::Path) -> Settings {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            log::warn!("failed to parse {}: {e}, using defaults", path.display());
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

fn modified_since(path: &std::path::Path, since: SystemTime) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|mtime| mtime > since)
        .unwrap_or(false)
}

/// Owns the live settings snapshot and, once [`SettingsWatcher::spawn`] is
/// called, a background thread that reloads it on file change.
pub struct SettingsWatcher {
    path: PathBuf,
    current: Arc<RwLock<Arc<Settings>>>,
    stop: Arc<AtomicBool>,
}

impl SettingsWatcher {
    pub fn load() -> Self {
        let path = config_path();
        let settings = Arc::new(load_from(&path));
        log::info!("loaded settings from {}", path.display());
        Self {
            path,
            current: Arc::new(RwLock::new(settings)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.current.read().unwrap().clone()
    }

    /// Spawns the reload thread. Takes no lock shared with the frame/
    /// swapchain/action-and-space mutexes -- it only ever swaps a fresh
    /// `Arc<Settings>` into `self.current`. Uses `notify`'s poll-based
    /// watcher (mtime polling, same idiom the `shaders` build crate's
    /// `modified_since` uses) rather than inotify, since the config file
    /// may live on a network or overlay filesystem that doesn't deliver
    /// native change events.
    pub fn spawn(&self) {
        let path = self.path.clone();
        let current = Arc::clone(&self.current);
        let stop = Arc::clone(&self.stop);
        std::thread::Builder::new()
            .name("novaxr-settings-watch".into())
            .spawn(move || {
                let (tx, rx) = std::sync::mpsc::channel();
                let mut watcher = match PollWatcher::new(
                    tx,
                    Config::default().with_poll_interval(Duration::from_millis(500)),
                ) {
                    Ok(w) => w,
                    Err(e) => {
                        log::warn!("failed to start settings watcher: {e}");
                        return;
                    }
                };
                if let Some(parent) = path.parent() {
                    if watcher.watch(parent, RecursiveMode::NonRecursive).is_err() {
                        log::warn!("settings directory {} does not exist yet", parent.display());
                    }
                }
                let mut last_checked = SystemTime::now();
                while !stop.load(Ordering::Relaxed) {
                    match rx.recv_timeout(Duration::from_millis(500)) {
                        Ok(Ok(_event)) => {
                            if modified_since(&path, last_checked) {
                                last_checked = SystemTime::now();
                                log::info!("settings file changed, reloading");
                                *current.write().unwrap() = Arc::new(load_from(&path));
                            }
                        }
                        Ok(Err(e)) => log::warn!("settings watcher error: {e}"),
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn settings watch thread");
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_do_not_fail_parsing() {
        let json = br#"{"mirror_window": true, "some_future_key": 42}"#;
        let settings: Settings = serde_json::from_slice(json).unwrap();
        assert!(settings.mirror_window);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = load_from(std::path::Path::new("/nonexistent/novaxr.json"));
        assert_eq!(settings.bool_from_float_threshold, 0.5);
    }
}
