use crate::domain::models::ColorEntry;
use serde::Serialize;

pub const DEFAULT_COLOR_HEX: &str = "#616161";
pub const CALENDAR_COLOR_ID: &str = "0";

const LEGACY_GRAPHITE_HEX: &str = "#e1e1e1";

/// Event color names by calendar color id; "0" is the calendar's own color.
const COLOR_NAMES: [(&str, &str); 12] = [
    ("1", "Lavender"),
    ("2", "Sage"),
    ("3", "Grape"),
    ("4", "Flamingo"),
    ("5", "Banana"),
    ("6", "Tangerine"),
    ("7", "Peacock"),
    ("8", "Graphite"),
    ("9", "Blueberry"),
    ("10", "Basil"),
    ("11", "Tomato"),
    (CALENDAR_COLOR_ID, "Calendar Color"),
];

const BUILTIN_BACKGROUNDS: [(&str, &str, &str); 11] = [
    ("1", "#7986cb", "#1d1d1d"),
    ("2", "#33b679", "#1d1d1d"),
    ("3", "#8e24aa", "#1d1d1d"),
    ("4", "#e67c73", "#1d1d1d"),
    ("5", "#f6bf26", "#1d1d1d"),
    ("6", "#f4511e", "#1d1d1d"),
    ("7", "#039be5", "#1d1d1d"),
    ("8", "#616161", "#1d1d1d"),
    ("9", "#3f51b5", "#1d1d1d"),
    ("10", "#0b8043", "#1d1d1d"),
    ("11", "#d50000", "#1d1d1d"),
];

pub fn color_name_for_id(id: &str) -> Option<&'static str> {
    COLOR_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ColorPalette {
    entries: Vec<ColorEntry>,
}

impl ColorPalette {
    /// Builds a palette from raw `(id, background, foreground)` triples:
    /// names come from the fixed id table, the legacy graphite background is
    /// normalized, and the synthetic calendar color entry is appended.
    pub fn from_event_colors<I>(colors: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String)>,
    {
        let mut entries: Vec<ColorEntry> = colors
            .into_iter()
            .filter(|(id, _, _)| id != CALENDAR_COLOR_ID)
            .map(|(id, background, foreground)| {
                let background_hex = if background.eq_ignore_ascii_case(LEGACY_GRAPHITE_HEX) {
                    DEFAULT_COLOR_HEX.to_string()
                } else {
                    background
                };
                ColorEntry {
                    name: color_name_for_id(&id).unwrap_or(id.as_str()).to_string(),
                    id,
                    background_hex,
                    foreground_hex: foreground,
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.id.parse::<u32>().unwrap_or(u32::MAX));
        entries.push(ColorEntry {
            id: CALENDAR_COLOR_ID.to_string(),
            name: "Calendar Color".to_string(),
            background_hex: "#4285f4".to_string(),
            foreground_hex: "#1d1d1d".to_string(),
        });
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::from_event_colors(BUILTIN_BACKGROUNDS.iter().map(|(id, bg, fg)| {
            (id.to_string(), bg.to_string(), fg.to_string())
        }))
    }

    pub fn entries(&self) -> &[ColorEntry] {
        &self.entries
    }

    pub fn by_id(&self, id: &str) -> Option<&ColorEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&ColorEntry> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    pub fn default_hex(&self) -> &'static str {
        DEFAULT_COLOR_HEX
    }

    /// Background for a color name, falling back to the default when the
    /// name is absent or unknown.
    pub fn resolve_name(&self, name: Option<&str>) -> String {
        name.and_then(|name| self.by_name(name))
            .map(|entry| entry.background_hex.clone())
            .unwrap_or_else(|| DEFAULT_COLOR_HEX.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_palette_has_synthetic_calendar_color_last() {
        let palette = ColorPalette::builtin();
        assert_eq!(palette.entries().len(), 12);
        let last = palette.entries().last().expect("calendar color entry");
        assert_eq!(last.id, "0");
        assert_eq!(last.name, "Calendar Color");
        assert_eq!(last.background_hex, "#4285f4");
    }

    #[test]
    fn legacy_graphite_background_is_normalized() {
        let palette = ColorPalette::from_event_colors(vec![(
            "8".to_string(),
            "#e1e1e1".to_string(),
            "#1d1d1d".to_string(),
        )]);
        let graphite = palette.by_name("Graphite").expect("graphite");
        assert_eq!(graphite.background_hex, "#616161");
    }

    #[test]
    fn lookup_by_name_ignores_case_and_falls_back_to_default() {
        let palette = ColorPalette::builtin();
        assert_eq!(palette.resolve_name(Some("basil")), "#0b8043");
        assert_eq!(palette.resolve_name(Some("Mauve")), DEFAULT_COLOR_HEX);
        assert_eq!(palette.resolve_name(None), DEFAULT_COLOR_HEX);
    }

    #[test]
    fn lookup_by_id_uses_raw_identifier() {
        let palette = ColorPalette::builtin();
        assert_eq!(palette.by_id("11").map(|entry| entry.name.as_str()), Some("Tomato"));
        assert!(palette.by_id("42").is_none());
    }
}
