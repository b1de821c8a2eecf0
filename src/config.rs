use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::platform::{AnimationStyle, BackendMode};
use crate::services::hotkey::HotkeySpec;

/// Windows reserves hotkey ids above this for shared DLLs.
const MAX_HOTKEY_ID: i64 = 0xBFFF;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailsConfig,
    #[serde(default)]
    pub hotkeys: HotkeysConfig,
    #[serde(default)]
    pub groups: Vec<ClientGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

impl LoggingConfig {
    /// `EnvFilter` directive: `level` for every target, then the per-target `filter`.
    pub fn directive(&self) -> String {
        let filter = self.filter.trim();
        if filter.is_empty() {
            self.level.clone()
        } else {
            format!("{},{}", self.level, filter)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub mode: BackendMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    pub poll_interval_ms: u64,
    /// Watched process names; case-insensitive, `.exe` optional.
    pub processes: Vec<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            processes: vec!["exefile.exe".to_string()],
        }
    }
}

/// Per-window thumbnail geometry and appearance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub opacity: f32,
    pub focus_border_color: String,
    pub focus_border_thickness: u32,
    pub show_title_overlay: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 384,
            height: 216,
            x: 100,
            y: 100,
            opacity: 1.0,
            focus_border_color: "#FF8C00".to_string(),
            focus_border_thickness: 2,
            show_title_overlay: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ThumbnailsConfig {
    #[serde(default)]
    pub default: ThumbnailConfig,
    /// Overrides keyed by window title.
    #[serde(default)]
    pub per_title: HashMap<String, ThumbnailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HotkeysConfig {
    pub id_base: i32,
    pub max_ids: usize,
    #[serde(default)]
    pub animation: AnimationStyle,
}

impl Default for HotkeysConfig {
    fn default() -> Self {
        Self {
            id_base: 9000,
            max_ids: 100,
            animation: AnimationStyle::Animated,
        }
    }
}

/// Ordered set of windows cycled by a pair of hotkeys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientGroup {
    pub id: String,
    /// Member window titles, in cycle order.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub forward_hotkey: Option<String>,
    #[serde(default)]
    pub backward_hotkey: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                filter: "eve_glance=info".to_string(),
            },
            backend: BackendConfig::default(),
            reconciler: ReconcilerConfig::default(),
            thumbnails: ThumbnailsConfig::default(),
            hotkeys: HotkeysConfig::default(),
            groups: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `GLANCE_*` variables.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("GLANCE_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

        config.validate()?;
        Ok(config)
    }

    /// Thumbnail settings for `title`, falling back to the default record.
    pub fn thumbnail_for(&self, title: &str) -> ThumbnailConfig {
        self.thumbnails
            .per_title
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(title))
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| self.thumbnails.default.clone())
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        if self.reconciler.poll_interval_ms < 100 {
            anyhow::bail!("poll_interval_ms must be at least 100");
        }

        for (i, process) in self.reconciler.processes.iter().enumerate() {
            if process.trim().is_empty() {
                anyhow::bail!("Empty process name in reconciler.processes #{}", i + 1);
            }
        }

        validate_thumbnail("thumbnails.default", &self.thumbnails.default)?;
        for (title, thumbnail) in &self.thumbnails.per_title {
            validate_thumbnail(&format!("thumbnails.per_title.\"{}\"", title), thumbnail)?;
        }

        if self.hotkeys.id_base < 0 || self.hotkeys.max_ids == 0 {
            anyhow::bail!("hotkeys.id_base must be >= 0 and hotkeys.max_ids > 0");
        }
        if self.hotkeys.id_base as i64 + self.hotkeys.max_ids as i64 - 1 > MAX_HOTKEY_ID {
            anyhow::bail!("hotkey id range exceeds {:#x}", MAX_HOTKEY_ID);
        }

        let mut ids = HashSet::new();
        for group in &self.groups {
            if group.id.trim().is_empty() {
                anyhow::bail!("Group with an empty id");
            }
            if !ids.insert(group.id.to_lowercase()) {
                anyhow::bail!("Duplicate group id '{}'", group.id);
            }
            for hotkey in [&group.forward_hotkey, &group.backward_hotkey].into_iter().flatten() {
                HotkeySpec::parse(hotkey).with_context(|| format!("Group '{}'", group.id))?;
            }
        }

        Ok(())
    }
}

fn validate_thumbnail(name: &str, thumbnail: &ThumbnailConfig) -> Result<()> {
    if thumbnail.width == 0 || thumbnail.height == 0 {
        anyhow::bail!("{}: width and height must be positive", name);
    }
    if !(0.0..=1.0).contains(&thumbnail.opacity) {
        anyhow::bail!("{}: opacity must be within [0, 1], got {}", name, thumbnail.opacity);
    }
    if !is_hex_color(&thumbnail.focus_border_color) {
        anyhow::bail!("{}: invalid focus_border_color '{}'", name, thumbnail.focus_border_color);
    }
    Ok(())
}

/// `#RRGGBB` or `#AARRGGBB`.
fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_logging_level_is_the_default_directive() {
        let mut config = Config::default();
        config.logging.level = "warn".to_string();
        assert_eq!(config.logging.directive(), "warn,eve_glance=info");

        config.logging.filter = "  ".to_string();
        assert_eq!(config.logging.directive(), "warn");
    }

    #[test]
    fn test_poll_interval_lower_bound() {
        let mut config = Config::default();
        config.reconciler.poll_interval_ms = 99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thumbnail_validation() {
        let mut config = Config::default();
        config.thumbnails.default.opacity = 1.2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thumbnails.default.focus_border_color = "orange".to_string();
        assert!(config.validate().is_err());

        assert!(is_hex_color("#80FF8C00"));
        assert!(!is_hex_color("#FFF"));
    }

    #[test]
    fn test_group_hotkeys_must_parse() {
        let mut config = Config::default();
        config.groups = vec![ClientGroup {
            id: "main".to_string(),
            members: vec!["EVE - Alice".to_string()],
            forward_hotkey: Some("Ctrl+Tab".to_string()),
            backward_hotkey: Some("Ctrl+Foo".to_string()),
        }];
        assert!(config.validate().is_err());

        config.groups[0].backward_hotkey = Some("Ctrl+Shift+Tab".to_string());
        assert!(config.validate().is_ok());

        config.groups.push(config.groups[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hotkey_id_range() {
        let mut config = Config::default();
        config.hotkeys.id_base = 0xBF00;
        config.hotkeys.max_ids = 0x100;
        assert!(config.validate().is_ok());
        config.hotkeys.max_ids = 0x101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_per_title_lookup_is_case_insensitive() {
        let mut config = Config::default();
        let custom = ThumbnailConfig {
            x: 900,
            ..ThumbnailConfig::default()
        };
        config.thumbnails.per_title.insert("EVE - Alice".to_string(), custom.clone());

        assert_eq!(config.thumbnail_for("eve - alice"), custom);
        assert_eq!(config.thumbnail_for("EVE - Bob"), config.thumbnails.default);
    }

    #[test]
    fn test_load_from_toml() {
        let path = std::env::temp_dir().join(format!("eve-glance-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r##"
[logging]
level = "debug"
format = "compact"
filter = "eve_glance=debug"

[backend]
mode = "dry-run"

[reconciler]
poll_interval_ms = 500
processes = ["game.exe"]

[thumbnails.default]
width = 320
height = 180

[thumbnails.per_title."EVE - Alice"]
x = 10
y = 20
opacity = 0.5

[[groups]]
id = "main"
members = ["EVE - Alice", "EVE - Bob"]
forward_hotkey = "F13"
"##,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.backend.mode, BackendMode::DryRun);
        assert_eq!(config.reconciler.poll_interval_ms, 500);
        assert_eq!(config.thumbnails.default.width, 320);
        assert_eq!(config.thumbnails.default.x, 100);
        assert_eq!(config.thumbnail_for("EVE - Alice").opacity, 0.5);
        assert_eq!(config.hotkeys.id_base, 9000);
        assert_eq!(config.groups[0].backward_hotkey, None);
    }
}
