use serde::{Deserialize, Serialize};

/// How Gantt rows pick a color for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteMode {
    /// Hash the service name into the palette.
    #[default]
    Auto,
    /// Assign palette entries in order of first appearance.
    Categorical,
}

impl std::str::FromStr for PaletteMode {
    type Err = crate::error::PanelError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "categorical" => Ok(Self::Categorical),
            _ => Err(crate::error::PanelError::Parse(format!(
                "unknown palette mode: {s}"
            ))),
        }
    }
}

/// `palette[index % len]`, or `fallback` when the palette is empty.
pub fn categorical_palette_color<'a>(palette: &'a [String], index: usize, fallback: &'a str) -> &'a str {
    if palette.is_empty() {
        return fallback;
    }
    &palette[index % palette.len()]
}

/// Stable color for a key (usually a service name).
pub fn consistent_color<'a>(palette: &'a [String], key: &str, fallback: &'a str) -> &'a str {
    let hash = key
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)));
    categorical_palette_color(palette, hash as usize, fallback)
}

/// Darkens a `#rrggbb` color by `0.3 + 0.7 * factor`, so factor 0 is the
/// darkest shade and factor 1 the base color. Colors that are not six-digit
/// hex are returned unchanged.
pub fn gradient_color(base: &str, factor: f64) -> String {
    let Some([r, g, b]) = parse_rgb(base) else {
        return base.to_string();
    };
    let scale = 0.3 + factor.clamp(0.0, 1.0) * 0.7;
    let channel = |c: u8| (f64::from(c) * scale).round() as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_rgb(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Vec<String> {
        ["#fff", "#000", "#111", "#222", "#333"]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    const FALLBACK: &str = "#ff0000";

    #[test]
    fn picks_palette_entry_by_index() {
        let palette = palette();
        assert_eq!(categorical_palette_color(&palette, 0, FALLBACK), "#fff");
        assert_eq!(categorical_palette_color(&palette, 2, FALLBACK), "#111");
    }

    #[test]
    fn cycles_through_palette() {
        let palette = palette();
        assert_eq!(categorical_palette_color(&palette, 5, FALLBACK), "#fff");
        for i in 0..20 {
            assert_eq!(
                categorical_palette_color(&palette, i, FALLBACK),
                categorical_palette_color(&palette, i + palette.len(), FALLBACK)
            );
        }
    }

    #[test]
    fn empty_palette_uses_fallback() {
        assert_eq!(categorical_palette_color(&[], 0, FALLBACK), FALLBACK);
        assert_eq!(consistent_color(&[], "api", FALLBACK), FALLBACK);
    }

    #[test]
    fn consistent_color_is_stable_per_key() {
        let palette = palette();
        let first = consistent_color(&palette, "checkout", FALLBACK);
        for _ in 0..3 {
            assert_eq!(consistent_color(&palette, "checkout", FALLBACK), first);
        }
    }

    #[test]
    fn gradient_scales_channels() {
        assert_eq!(gradient_color("#ffffff", 1.0), "#ffffff");
        assert_eq!(gradient_color("#ffffff", 0.0), "#4d4d4d");
        assert_eq!(gradient_color("#64c800", 0.5), "#418200");
        assert_eq!(gradient_color("red", 0.5), "red");
    }

    #[test]
    fn validates_hex_colors() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#1a2B3c"));
        assert!(!is_hex_color("fff"));
        assert!(!is_hex_color("#ggg"));
        assert!(!is_hex_color("#ffff"));
    }
}
