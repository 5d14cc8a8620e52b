//! Lookup table of classes shipped with each game
//!
//! Injected classes must not reuse a vanilla class name. The table is stored
//! as LZMA-compressed text, one class per line:
//!
//! ```text
//! SFXPawn_Player<TAB>LE1,LE2,LE3
//! ```
//!
//! The compressed form is an i32 decompressed length followed by the LZMA
//! stream.

use crate::compression;
use crate::game::Game;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Class name → games that ship a class of that name
#[derive(Debug, Clone, Default)]
pub struct VanillaClassTable {
    classes: HashMap<String, Vec<Game>>,
}

impl VanillaClassTable {
    /// Empty table; every class name is allowed
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit entries
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Game>)>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (name, games) in entries {
            table
                .classes
                .entry(name.as_ref().to_ascii_lowercase())
                .or_default()
                .extend(games);
        }
        table
    }

    /// Parse the tab-separated text form
    pub fn from_text(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, games) = line.split_once('\t').ok_or_else(|| {
                Error::invalid_format(format!(
                    "Vanilla class table line {} has no game list",
                    number + 1
                ))
            })?;
            let games = games
                .split(',')
                .map(|id| {
                    Game::from_id(id.trim()).ok_or_else(|| {
                        Error::invalid_format(format!(
                            "Vanilla class table line {}: unknown game '{}'",
                            number + 1,
                            id.trim()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            entries.push((name.trim().to_string(), games));
        }
        Ok(Self::from_entries(entries))
    }

    /// Load the compressed form
    pub fn from_compressed(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let text_len = cursor.read_i32::<LittleEndian>()?;
        let text_len = usize::try_from(text_len).map_err(|_| {
            Error::invalid_format(format!("Negative vanilla table length {text_len}"))
        })?;
        let text = compression::decompress(&data[4..], text_len)?;
        let text = String::from_utf8(text)
            .map_err(|_| Error::invalid_format("Vanilla class table is not valid UTF-8"))?;
        let table = Self::from_text(&text)?;
        log::debug!("Loaded vanilla class table with {} classes", table.len());
        Ok(table)
    }

    /// Text form, sorted by class name
    pub fn to_text(&self) -> String {
        let mut names: Vec<_> = self.classes.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        let mut text = String::new();
        for (name, games) in names {
            let ids: Vec<&str> = games.iter().map(|g| g.id()).collect();
            text.push_str(name);
            text.push('\t');
            text.push_str(&ids.join(","));
            text.push('\n');
        }
        text
    }

    /// Compressed form readable by [`VanillaClassTable::from_compressed`]
    pub fn to_compressed(&self) -> Result<Vec<u8>> {
        let text = self.to_text();
        let mut out = Vec::new();
        out.write_i32::<LittleEndian>(text.len() as i32)?;
        out.extend(compression::compress(text.as_bytes())?);
        Ok(out)
    }

    /// Whether `game` ships a class named `name` (case-insensitive)
    pub fn contains(&self, name: &str, game: Game) -> bool {
        self.classes
            .get(&name.to_ascii_lowercase())
            .is_some_and(|games| games.contains(&game))
    }

    /// Number of class names
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_parsing() {
        let table = VanillaClassTable::from_text(
            "# class\tgames\nSFXPawn_Player\tLE1,LE2, LE3\n\nBioPawn\tME3\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.contains("sfxpawn_player", Game::Le2));
        assert!(!table.contains("SFXPawn_Player", Game::Me3));
        assert!(table.contains("BioPawn", Game::Me3));

        assert!(VanillaClassTable::from_text("NoTab").is_err());
        assert!(VanillaClassTable::from_text("X\tME9").is_err());
    }

    #[test]
    fn test_compressed_round_trip() {
        let table = VanillaClassTable::from_entries([
            ("SFXGameModeBase", vec![Game::Le3]),
            ("SFXWeapon", vec![Game::Le2, Game::Le3]),
        ]);
        let bytes = table.to_compressed().unwrap();
        let back = VanillaClassTable::from_compressed(&bytes).unwrap();
        assert_eq!(back.to_text(), table.to_text());
        assert!(back.contains("SFXWeapon", Game::Le2));
    }

    #[test]
    fn test_truncated_compressed_table() {
        assert!(VanillaClassTable::from_compressed(&[1, 0]).is_err());
    }
}
