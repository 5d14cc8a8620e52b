//! Container writing from loose authored files

use super::schema::{SchemaViolation, check_manifest};
use super::{ASSET_MAGIC, FormatVersion, LoadOptions, MERGE_MOD_MAGIC, is_text_asset};
use crate::compression;
use crate::document::{Document, Manifest};
use crate::io::{validate_file_name, write_len, write_str};
use crate::validate::Validator;
use crate::vanilla::VanillaClassTable;
use crate::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

/// Result of serializing a loose manifest
#[derive(Debug)]
pub enum SerializeOutcome {
    /// Container bytes, already verified by reading them back
    Written(Vec<u8>),
    /// The manifest did not pass the schema; nothing was written
    Violations(Vec<SchemaViolation>),
}

impl SerializeOutcome {
    /// Container bytes, or a validation error listing every violation
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            SerializeOutcome::Written(bytes) => Ok(bytes),
            SerializeOutcome::Violations(violations) => Err(Error::Validation(
                violations.iter().map(ToString::to_string).collect(),
            )),
        }
    }
}

/// Build a container from a manifest file and the assets next to it
///
/// Schema problems, missing assets, unsafe asset names and allow-list
/// failures are returned as [`SerializeOutcome::Violations`]. I/O and
/// compression failures are errors. Targets are checked against the built-in
/// allow-lists with an empty vanilla class table; use [`serialize_with`] to
/// supply one.
pub fn serialize<P: AsRef<Path>>(manifest_path: P, version: FormatVersion) -> Result<SerializeOutcome> {
    let validator = Validator::new(Arc::new(VanillaClassTable::new()));
    serialize_with(manifest_path, version, &validator)
}

/// Build a container, approving the result with `validator` before returning it
pub fn serialize_with<P: AsRef<Path>>(
    manifest_path: P,
    version: FormatVersion,
    validator: &Validator,
) -> Result<SerializeOutcome> {
    let manifest_path = manifest_path.as_ref();
    let asset_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let manifest_text = fs::read_to_string(manifest_path)?;

    let value: serde_json::Value = match serde_json::from_str(&manifest_text) {
        Ok(value) => value,
        Err(e) => {
            return Ok(SerializeOutcome::Violations(vec![SchemaViolation::new(
                "",
                format!("not valid JSON: {e}"),
            )]));
        }
    };
    let mut violations = check_manifest(&value, version);
    if !violations.is_empty() {
        return Ok(SerializeOutcome::Violations(violations));
    }

    let manifest: Manifest = match serde_json::from_value(value) {
        Ok(manifest) => manifest,
        Err(e) => {
            return Ok(SerializeOutcome::Violations(vec![SchemaViolation::new(
                "",
                e.to_string(),
            )]));
        }
    };

    for (i, file) in manifest.files.iter().enumerate() {
        for (j, change) in file.changes.iter().enumerate() {
            for (k, update) in change.updates.iter().enumerate() {
                let pointer = format!("/files/{i}/changes/{j}/updates/{k}");
                for issue in update.structural_issues(&change.entry) {
                    violations.push(SchemaViolation::new(pointer.clone(), issue));
                }
                for asset in update.referenced_assets() {
                    if let Err(e) = validate_file_name(asset) {
                        violations.push(SchemaViolation::new(pointer.clone(), e.to_string()));
                    } else if !asset_dir.join(asset).is_file() {
                        violations.push(SchemaViolation::new(
                            pointer.clone(),
                            format!("asset {asset} not found next to the manifest"),
                        ));
                    }
                }
            }
        }
    }
    if !violations.is_empty() {
        return Ok(SerializeOutcome::Violations(violations));
    }

    let mut assets = Vec::new();
    for name in manifest.referenced_assets() {
        assets.push((name.to_string(), fs::read(asset_dir.join(name))?));
    }

    let bytes = write_document(version, &manifest_text, &assets)?;
    let document = verify(&bytes, &manifest_text, &assets)?;
    let issues = validator.issues(&document);
    if !issues.is_empty() {
        log::debug!(
            "{} failed validation with {} issues",
            manifest_path.display(),
            issues.len()
        );
        return Ok(SerializeOutcome::Violations(
            issues
                .into_iter()
                .map(|issue| SchemaViolation::new("", issue))
                .collect(),
        ));
    }
    log::info!(
        "Serialized {} ({} assets) into a {} container of {} bytes",
        manifest_path.display(),
        assets.len(),
        version,
        bytes.len()
    );
    Ok(SerializeOutcome::Written(bytes))
}

/// Encode a container from manifest text and named asset payloads
///
/// Assets are written in the order given.
pub fn write_document(
    version: FormatVersion,
    manifest_text: &str,
    assets: &[(String, Vec<u8>)],
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_all(&MERGE_MOD_MAGIC)?;
    out.write_u8(version.as_raw())?;

    if version.compresses() {
        let compressed = compression::compress(manifest_text.as_bytes())?;
        write_len(&mut out, compressed.len())?;
        write_len(&mut out, manifest_text.len())?;
        out.write_all(&compressed)?;
    } else {
        write_str(&mut out, manifest_text)?;
    }

    write_len(&mut out, assets.len())?;
    for (name, payload) in assets {
        validate_file_name(name)?;
        out.write_all(&ASSET_MAGIC)?;
        write_str(&mut out, name)?;
        write_len(&mut out, payload.len())?;
        if !version.compresses() {
            out.write_all(payload)?;
        } else if is_text_asset(name) {
            let compressed = compression::compress(payload)?;
            out.write_u8(1)?;
            write_len(&mut out, compressed.len())?;
            out.write_all(&compressed)?;
        } else {
            out.write_u8(0)?;
            out.write_all(payload)?;
        }
    }
    out.flush()?;
    Ok(out)
}

fn verify(bytes: &[u8], manifest_text: &str, assets: &[(String, Vec<u8>)]) -> Result<Document> {
    let document = LoadOptions::new()
        .eager_assets(true)
        .load(&mut Cursor::new(bytes))?;
    if document.manifest_text() != manifest_text {
        return Err(Error::invalid_format(
            "Written container does not read back the same manifest",
        ));
    }
    for (name, payload) in assets {
        let stored = document.assets().ensure_loaded(name)?;
        if stored.as_ref() != payload.as_slice() {
            return Err(Error::invalid_format(format!(
                "Written container does not read back asset {name} unchanged"
            )));
        }
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_loose(dir: &Path, manifest: &str, assets: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("manifest.json");
        fs::write(&path, manifest).unwrap();
        for (name, payload) in assets {
            fs::write(dir.join(name), payload).unwrap();
        }
        path
    }

    const MANIFEST: &str = r#"{
  "game": "LE3",
  "files": [
    {
      "file": "SFXGame",
      "changes": [
        {
          "entry": "SFXPawn",
          "updates": [
            { "type": "script_compile", "scripts": ["Tick.uc"] },
            { "type": "asset_port", "asset": "Donor.pcc", "entry": "Mesh", "add_as_new": true }
          ]
        }
      ]
    }
  ]
}
"#;

    #[test]
    fn test_serialize_v1_and_v2() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_loose(
            dir.path(),
            MANIFEST,
            &[("Tick.uc", b"function Tick() {}"), ("Donor.pcc", &[1, 2, 3])],
        );

        for version in [FormatVersion::V1, FormatVersion::V2] {
            let bytes = serialize(&path, version).unwrap().into_bytes().unwrap();
            assert_eq!(&bytes[..4], b"MGMD");
            assert_eq!(bytes[4], version.as_raw());
        }
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_loose(
            dir.path(),
            MANIFEST,
            &[("Tick.uc", b"function Tick() {}"), ("Donor.pcc", &[1, 2, 3])],
        );
        let first = serialize(&path, FormatVersion::V2).unwrap().into_bytes().unwrap();
        let second = serialize(&path, FormatVersion::V2).unwrap().into_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_asset_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_loose(dir.path(), MANIFEST, &[("Tick.uc", b"x")]);
        match serialize(&path, FormatVersion::V2).unwrap() {
            SerializeOutcome::Violations(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].pointer, "/files/0/changes/0/updates/1");
                assert!(violations[0].message.contains("Donor.pcc"));
            }
            SerializeOutcome::Written(_) => panic!("expected violations"),
        }
    }

    #[test]
    fn test_schema_violations_are_data() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"game":"LE1","files":[{"file":"Startup","apply_to_all_localizations":true,
            "changes":[{"entry":"X","updates":[{"type":"config_flag_clear","property":"P"}]}]}]}"#;
        let path = write_loose(dir.path(), manifest, &[]);

        let SerializeOutcome::Violations(violations) = serialize(&path, FormatVersion::V1).unwrap()
        else {
            panic!("expected violations");
        };
        assert_eq!(violations.len(), 2);

        let outcome = serialize(&path, FormatVersion::V2).unwrap();
        assert!(matches!(outcome, SerializeOutcome::Written(_)));
    }

    #[test]
    fn test_unsafe_asset_name() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"game":"LE1","files":[{"file":"Startup","changes":[{"entry":"X",
            "updates":[{"type":"script_compile","scripts":["../escape.uc"]}]}]}]}"#;
        let path = write_loose(dir.path(), manifest, &[]);
        let err = serialize(&path, FormatVersion::V2)
            .unwrap()
            .into_bytes()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref issues) if issues[0].contains("plain file name")));
    }

    #[test]
    fn test_target_outside_allow_list_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"game":"LE1","files":[{"file":"Coalesced_INT","changes":[{"entry":"X",
            "updates":[{"type":"property","property":"bFlag","value_type":"BoolProperty","value":"true"}]}]}]}"#;
        let path = write_loose(dir.path(), manifest, &[]);

        let SerializeOutcome::Violations(violations) = serialize(&path, FormatVersion::V2).unwrap()
        else {
            panic!("a target outside the allow-list was written");
        };
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("not a patchable file"));
    }

    #[test]
    fn test_vanilla_class_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = r#"{"game":"LE3","files":[{"file":"SFXGame","changes":[{"entry":"SFXGame.SFXPawn_Player",
            "updates":[{"type":"class_inject","asset":"SFXPawn_Player.uc"}]}]}]}"#;
        let path = write_loose(
            dir.path(),
            manifest,
            &[("SFXPawn_Player.uc", b"class SFXPawn_Player;")],
        );

        assert!(matches!(
            serialize(&path, FormatVersion::V2).unwrap(),
            SerializeOutcome::Written(_)
        ));

        let vanilla = VanillaClassTable::from_entries([("SFXPawn_Player", vec![crate::Game::Le3])]);
        let validator = Validator::new(Arc::new(vanilla));
        let SerializeOutcome::Violations(violations) =
            serialize_with(&path, FormatVersion::V2, &validator).unwrap()
        else {
            panic!("a vanilla class was injected");
        };
        assert!(violations[0].message.contains("vanilla class SFXPawn_Player"));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_loose(dir.path(), "{ not json", &[]);
        let outcome = serialize(&path, FormatVersion::V2).unwrap();
        assert!(matches!(outcome, SerializeOutcome::Violations(ref v) if v.len() == 1));
    }
}
