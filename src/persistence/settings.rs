use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assistant::panel::PanelTimings;
use crate::scene::layout::{RadialLayout, DEFAULT_JITTER, DEFAULT_RADIUS};
use crate::scene::manager::SceneConfig;
use crate::scene::particles::DEFAULT_COUNT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    // Base URL the schema is fetched from (GET {endpoint}/api/schema)
    #[serde(default = "AppSettings::default_endpoint")]
    pub schema_endpoint: String,
    // Embedded API service configuration (actix)
    #[serde(default)]
    pub api_enabled: bool,
    #[serde(default = "AppSettings::default_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "AppSettings::default_port")]
    pub api_port: u16,
    #[serde(default)]
    pub api_key: Option<String>,
    // SQL dump or JSON document served by the embedded API
    #[serde(default)]
    pub schema_source: Option<PathBuf>,
    // If None, server traffic logs go to OS temp dir
    #[serde(default)]
    pub api_log_override: Option<PathBuf>,
    // Scene layout
    #[serde(default = "AppSettings::default_radius")]
    pub layout_radius: f32,
    #[serde(default = "AppSettings::default_jitter")]
    pub layout_jitter: f32,
    #[serde(default)]
    pub layout_seed: Option<u64>,
    #[serde(default = "AppSettings::default_particle_count")]
    pub particle_count: usize,
    // Assistant panel transitions
    #[serde(default = "AppSettings::default_open_delay")]
    pub panel_open_delay_ms: u64,
    #[serde(default = "AppSettings::default_close_delay")]
    pub panel_close_delay_ms: u64,
    #[serde(default = "AppSettings::default_call_bar_shift")]
    pub call_bar_shift: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_endpoint: Self::default_endpoint(),
            api_enabled: false,
            api_bind_addr: Self::default_bind_addr(),
            api_port: Self::default_port(),
            api_key: None,
            schema_source: None,
            api_log_override: None,
            layout_radius: Self::default_radius(),
            layout_jitter: Self::default_jitter(),
            layout_seed: None,
            particle_count: Self::default_particle_count(),
            panel_open_delay_ms: Self::default_open_delay(),
            panel_close_delay_ms: Self::default_close_delay(),
            call_bar_shift: Self::default_call_bar_shift(),
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Schema-Loom
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join("Schema-Loom");
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Schema-Loom
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join("Schema-Loom");
            }
            return PathBuf::from("Schema-Loom");
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Schema-Loom or ~/.config/Schema-Loom
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join("Schema-Loom");
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join("Schema-Loom");
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        let json_path = Self::config_dir().join("settings.json");
        if json_path.exists() {
            let mut f = std::fs::File::open(json_path)?;
            let mut s = String::new();
            f.read_to_string(&mut s)?;
            let v: Self = serde_json::from_str(&s)?;
            return Ok(v);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        let s = serde_json::to_string_pretty(self)?;
        let mut f = std::fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Return the directory where the settings file (settings.json) is stored.
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    pub(crate) fn default_endpoint() -> String { "http://127.0.0.1:5000".to_string() }
    pub(crate) fn default_bind_addr() -> String { "127.0.0.1".to_string() }
    pub(crate) fn default_port() -> u16 { 5000 }
    fn default_radius() -> f32 { DEFAULT_RADIUS }
    fn default_jitter() -> f32 { DEFAULT_JITTER }
    fn default_particle_count() -> usize { DEFAULT_COUNT }
    fn default_open_delay() -> u64 { 10 }
    fn default_close_delay() -> u64 { 300 }
    fn default_call_bar_shift() -> f32 { 20.0 }

    pub fn api_endpoint(&self) -> String {
        format!("{}:{}", self.api_bind_addr, self.api_port)
    }

    /// Default API log directory when no override is set: OS temporary directory.
    /// Example: {temp_dir}/Schema-Loom/api-logs
    pub fn api_log_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push("Schema-Loom");
        p.push("api-logs");
        p
    }

    pub fn api_log_dir(&self) -> PathBuf {
        if let Some(p) = &self.api_log_override { return p.clone(); }
        Self::api_log_default_dir()
    }

    pub fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            layout: RadialLayout { radius: self.layout_radius, jitter: self.layout_jitter },
            seed: self.layout_seed,
            particle_count: self.particle_count,
        }
    }

    pub fn panel_timings(&self) -> PanelTimings {
        PanelTimings {
            open_delay: Duration::from_millis(self.panel_open_delay_ms),
            close_delay: Duration::from_millis(self.panel_close_delay_ms),
            call_bar_shift: self.call_bar_shift,
        }
    }
}
