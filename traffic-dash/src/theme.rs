//! Theme selection and its persisted preference.
//!
//! One key (`light`/`dark`), read at startup and written on toggle. Affects
//! presentation colors only, never data semantics.

use crate::error::DashError;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Parse a persisted value; anything unrecognised falls back to dark.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// File-backed theme preference.
#[derive(Debug, Clone)]
pub struct ThemePreference {
    path: PathBuf,
}

impl ThemePreference {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path from `TRAFFIC_DASH_THEME_FILE`, defaulting to
    /// `~/.config/traffic-dash/theme`.
    pub fn from_env() -> Self {
        let path = std::env::var("TRAFFIC_DASH_THEME_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".config/traffic-dash/theme")
            });
        Self::at(path)
    }

    /// Load the saved theme; a missing or unreadable file defaults to dark.
    pub fn load(&self) -> Theme {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Theme::parse(&raw),
            Err(_) => Theme::default(),
        }
    }

    /// Persist the theme. Failure is non-fatal and only logged by callers.
    pub fn store(&self, theme: Theme) -> Result<(), DashError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, theme.as_str())?;
        Ok(())
    }

    /// Toggle, persist, and return the new theme. A persistence failure
    /// still toggles for the current session.
    pub fn toggle(&self, current: Theme) -> Theme {
        let next = current.toggled();
        if let Err(error) = self.store(next) {
            warn!(%error, path = %self.path.display(), "theme preference not saved");
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_toggle() {
        assert_eq!(Theme::parse("light"), Theme::Light);
        assert_eq!(Theme::parse("dark"), Theme::Dark);
        assert_eq!(Theme::parse("solarized"), Theme::Dark);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }

    #[test]
    fn test_missing_file_defaults_to_dark() {
        let dir = tempfile::tempdir().unwrap();
        let preference = ThemePreference::at(dir.path().join("theme"));
        assert_eq!(preference.load(), Theme::Dark);
    }

    #[test]
    fn test_store_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let preference = ThemePreference::at(dir.path().join("nested/theme"));

        preference.store(Theme::Light).unwrap();
        assert_eq!(preference.load(), Theme::Light);

        let next = preference.toggle(Theme::Light);
        assert_eq!(next, Theme::Dark);
        assert_eq!(preference.load(), Theme::Dark);
    }
}
