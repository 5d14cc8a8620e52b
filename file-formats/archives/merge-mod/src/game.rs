//! Target games, localizations and container file naming

use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;

/// Extension of the game's native container files
pub const PACKAGE_EXTENSION: &str = ".pcc";

/// Games that accept merge mods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Game {
    /// Mass Effect 3 (original release)
    #[serde(rename = "ME3")]
    Me3,
    /// Legendary Edition, first game
    #[serde(rename = "LE1")]
    Le1,
    /// Legendary Edition, second game
    #[serde(rename = "LE2")]
    Le2,
    /// Legendary Edition, third game
    #[serde(rename = "LE3")]
    Le3,
}

impl Game {
    /// All supported games
    pub const ALL: [Game; 4] = [Game::Me3, Game::Le1, Game::Le2, Game::Le3];

    const IDS: &'static [&'static str] = &["ME3", "LE1", "LE2", "LE3"];

    /// Short identifier used in manifests
    pub fn id(self) -> &'static str {
        match self {
            Game::Me3 => "ME3",
            Game::Le1 => "LE1",
            Game::Le2 => "LE2",
            Game::Le3 => "LE3",
        }
    }

    /// Parse a short identifier, case-insensitively
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|game| game.id().eq_ignore_ascii_case(id))
    }
}

// Manifests name games case-insensitively, matching the schema check.
impl<'de> Deserialize<'de> for Game {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Game::from_id(&id).ok_or_else(|| de::Error::unknown_variant(&id, Game::IDS))
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Localization enumeration service: game → ordered language codes
pub trait LocalizationProvider: Send + Sync {
    /// Language codes for the game, in resolution order
    fn localizations(&self, game: Game) -> Vec<String>;
}

/// Built-in language lists for the supported games
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLocalizations;

impl LocalizationProvider for StaticLocalizations {
    fn localizations(&self, game: Game) -> Vec<String> {
        let codes: &[&str] = match game {
            Game::Le1 => &["INT", "DE", "ES", "FR", "IT", "JA", "PLPC", "RU"],
            Game::Me3 | Game::Le2 | Game::Le3 => {
                &["INT", "DEU", "ESN", "FRA", "ITA", "JPN", "POL", "RUS"]
            }
        };
        codes.iter().map(|code| (*code).to_string()).collect()
    }
}

/// Fixed language list, mostly useful for tests and constrained installs
#[derive(Debug, Clone, Default)]
pub struct FixedLocalizations(pub Vec<String>);

impl LocalizationProvider for FixedLocalizations {
    fn localizations(&self, _game: Game) -> Vec<String> {
        self.0.clone()
    }
}

/// Append the container extension when a target name has none
pub fn with_package_extension(name: &str) -> String {
    if has_package_extension(name) {
        name.to_string()
    } else {
        format!("{name}{PACKAGE_EXTENSION}")
    }
}

fn has_package_extension(name: &str) -> bool {
    name.len()
        .checked_sub(PACKAGE_EXTENSION.len())
        .and_then(|start| name.get(start..))
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// File name without the container extension
pub fn package_stem(name: &str) -> &str {
    if has_package_extension(name) {
        &name[..name.len() - PACKAGE_EXTENSION.len()]
    } else {
        name
    }
}

/// Localized file name: `Startup` + `INT` → `Startup_INT.pcc`
pub fn localized_file_name(name: &str, language: &str) -> String {
    format!("{}_{language}{PACKAGE_EXTENSION}", package_stem(name))
}

/// Strip a trailing `_<LANG>` suffix when `LANG` is a known localization
pub fn strip_localization<'a>(stem: &'a str, languages: &[String]) -> &'a str {
    if let Some((base, suffix)) = stem.rsplit_once('_') {
        if languages.iter().any(|lang| lang.eq_ignore_ascii_case(suffix)) {
            return base;
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_ids() {
        assert_eq!(Game::from_id("le1"), Some(Game::Le1));
        assert_eq!(Game::from_id("ME3"), Some(Game::Me3));
        assert_eq!(Game::from_id("ME1"), None);
        assert_eq!(Game::Le3.to_string(), "LE3");
        assert_eq!(serde_json::to_string(&Game::Le2).unwrap(), "\"LE2\"");
    }

    #[test]
    fn test_deserialize_matches_from_id() {
        for id in ["le1", "Le1", "LE1", "me3", "lE3", "ME1", ""] {
            let parsed = serde_json::from_str::<Game>(&format!("\"{id}\"")).ok();
            assert_eq!(parsed, Game::from_id(id), "{id}");
        }
        assert!(serde_json::from_str::<Game>("3").is_err());
    }

    #[test]
    fn test_localized_names() {
        assert_eq!(with_package_extension("Startup"), "Startup.pcc");
        assert_eq!(with_package_extension("Startup.PCC"), "Startup.PCC");
        assert_eq!(localized_file_name("Startup", "INT"), "Startup_INT.pcc");
        assert_eq!(localized_file_name("Startup.pcc", "DEU"), "Startup_DEU.pcc");
    }

    #[test]
    fn test_strip_localization() {
        let languages = StaticLocalizations.localizations(Game::Le3);
        assert_eq!(strip_localization("Startup_INT", &languages), "Startup");
        assert_eq!(strip_localization("Startup_fra", &languages), "Startup");
        assert_eq!(strip_localization("BioD_Cit001", &languages), "BioD_Cit001");
        assert_eq!(strip_localization("SFXGame", &languages), "SFXGame");
    }

    #[test]
    fn test_static_localizations_start_with_int() {
        for game in Game::ALL {
            let languages = StaticLocalizations.localizations(game);
            assert_eq!(languages.first().map(String::as_str), Some("INT"));
        }
    }
}
