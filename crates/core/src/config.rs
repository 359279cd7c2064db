use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};
use crate::palette::{PaletteMode, is_hex_color};

/// Default categorical palette, in the order series are colored.
pub const DEFAULT_PALETTE: [&str; 9] = [
    "#5470c6", "#91cc75", "#fac858", "#ee6666", "#73c0de", "#3ba272", "#fc8452", "#9a60b4",
    "#ea7ccc",
];

/// Theme and defaults shared by every panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub palette: Vec<String>,
    pub fallback_color: String,
    pub error_color: String,
    pub scatter_default_color: String,
    pub size_range: (f64, f64),
    pub chart_id: String,
    pub gantt_palette_mode: PaletteMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            fallback_color: "#1976d2".to_string(),
            error_color: "red".to_string(),
            scatter_default_color: "blue".to_string(),
            size_range: (6.0, 20.0),
            chart_id: "otpanel".to_string(),
            gantt_palette_mode: PaletteMode::Auto,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Defaults, then the TOML file at `path` if it exists, then environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(file_overrides) = load_file_overrides(path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides();
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    palette: Option<ListSetting<String>>,
    fallback_color: Option<String>,
    error_color: Option<String>,
    scatter_default_color: Option<String>,
    size_range: Option<ListSetting<f64>>,
    chart_id: Option<String>,
    gantt_palette_mode: Option<String>,
}

/// List-valued setting: a TOML array in the file, a comma string in the
/// environment (or in older config files).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListSetting<T> {
    Items(Vec<T>),
    Joined(String),
}

impl<T: fmt::Display> fmt::Display for ListSetting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Items(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Joined(raw) => f.write_str(raw),
        }
    }
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("OTPANEL_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("otpanel/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| PanelError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| PanelError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> ConfigOverrides {
    ConfigOverrides {
        palette: env::var("OTPANEL_PALETTE").ok().map(ListSetting::Joined),
        fallback_color: env::var("OTPANEL_FALLBACK_COLOR").ok(),
        error_color: env::var("OTPANEL_ERROR_COLOR").ok(),
        scatter_default_color: env::var("OTPANEL_SCATTER_COLOR").ok(),
        size_range: env::var("OTPANEL_SIZE_RANGE").ok().map(ListSetting::Joined),
        chart_id: None,
        gantt_palette_mode: env::var("OTPANEL_GANTT_PALETTE_MODE").ok(),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.palette {
        let parsed = match &v {
            ListSetting::Items(items) => palette_from_entries(items.iter().map(String::as_str)),
            ListSetting::Joined(raw) => parse_palette(raw),
        };
        cfg.palette = parsed.map_err(|e| {
            PanelError::Config(format!("bad palette in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.fallback_color {
        cfg.fallback_color = v;
    }
    if let Some(v) = overrides.error_color {
        cfg.error_color = v;
    }
    if let Some(v) = overrides.scatter_default_color {
        cfg.scatter_default_color = v;
    }
    if let Some(v) = overrides.size_range {
        let parsed = match &v {
            ListSetting::Items(items) => match items.as_slice() {
                [min, max] => check_size_range(*min, *max),
                _ => Err(PanelError::Config(
                    "size range must have exactly two entries".to_string(),
                )),
            },
            ListSetting::Joined(raw) => parse_size_range(raw),
        };
        cfg.size_range = parsed.map_err(|e| {
            PanelError::Config(format!("bad size_range in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.chart_id {
        cfg.chart_id = v;
    }
    if let Some(v) = overrides.gantt_palette_mode {
        cfg.gantt_palette_mode = v.parse().map_err(|e| {
            PanelError::Config(format!("bad gantt_palette_mode in {source}: {e}"))
        })?;
    }
    Ok(())
}

fn parse_palette(raw: &str) -> Result<Vec<String>> {
    palette_from_entries(raw.split(','))
}

fn palette_from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in entries {
        let color = entry.trim();
        if color.is_empty() {
            continue;
        }
        if !is_hex_color(color) {
            return Err(PanelError::Config(format!(
                "palette entries must be #rgb or #rrggbb, got {color}"
            )));
        }
        out.push(color.to_string());
    }
    Ok(out)
}

pub fn parse_size_range(raw: &str) -> Result<(f64, f64)> {
    let Some((min, max)) = raw.split_once(',') else {
        return Err(PanelError::Config(
            "size range must use min,max syntax".to_string(),
        ));
    };
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| PanelError::Config(format!("bad size {v}: {e}")))
    };
    check_size_range(parse(min)?, parse(max)?)
}

fn check_size_range(min: f64, max: f64) -> Result<(f64, f64)> {
    if min < 0.0 || max < min {
        return Err(PanelError::Config(format!(
            "size range must satisfy 0 <= min <= max, got {min},{max}"
        )));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_palette_and_sizes() {
        let cfg = Config::default();
        assert_eq!(cfg.palette.len(), DEFAULT_PALETTE.len());
        assert_eq!(cfg.size_range, (6.0, 20.0));
        assert_eq!(cfg.gantt_palette_mode, PaletteMode::Auto);
    }

    #[test]
    fn parse_palette_accepts_list() {
        let palette = parse_palette("#fff, #000000,,#123").unwrap();
        assert_eq!(palette, vec!["#fff", "#000000", "#123"]);
    }

    #[test]
    fn parse_palette_rejects_bad_entries() {
        assert!(parse_palette("#fff,blue").is_err());
    }

    #[test]
    fn parse_size_range_checks_order() {
        assert_eq!(parse_size_range("4, 12").unwrap(), (4.0, 12.0));
        assert!(parse_size_range("12,4").is_err());
        assert!(parse_size_range("12").is_err());
        assert!(parse_size_range("a,b").is_err());
    }

    #[test]
    fn apply_file_overrides_updates_theme() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r##"
palette = "#111111,#222222"
error_color = "#ff0000"
size_range = "2,8"
gantt_palette_mode = "categorical"
"##,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.palette, vec!["#111111", "#222222"]);
        assert_eq!(cfg.error_color, "#ff0000");
        assert_eq!(cfg.size_range, (2.0, 8.0));
        assert_eq!(cfg.gantt_palette_mode, PaletteMode::Categorical);
        assert_eq!(cfg.fallback_color, "#1976d2");
    }

    #[test]
    fn file_accepts_toml_arrays() {
        let mut cfg = Config::default();
        let file: ConfigOverrides = toml::from_str(
            r##"
palette = ["#aaa", "#bbbbbb"]
size_range = [3, 9.5]
"##,
        )
        .unwrap();

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.palette, vec!["#aaa", "#bbbbbb"]);
        assert_eq!(cfg.size_range, (3.0, 9.5));

        let file: ConfigOverrides = toml::from_str(r#"size_range = [1, 2, 3]"#).unwrap();
        let err = apply_overrides(&mut Config::default(), file, "config file").unwrap_err();
        assert!(err.to_string().contains("bad size_range in config file"), "{err}");

        let file: ConfigOverrides = toml::from_str(r#"palette = ["blue"]"#).unwrap();
        assert!(apply_overrides(&mut Config::default(), file, "config file").is_err());
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let cfg = Config::load_from(Path::new("/nonexistent/otpanel.toml")).unwrap();
        assert_eq!(cfg.chart_id, "otpanel");
    }
}
