//! Version limits, feature gating and allow-list enforcement at load time

mod common;

use common::container;
use merge_mod::vanilla::VanillaClassTable;
use merge_mod::{Error, FormatVersion, Game, LoadOptions, Validator};
use std::io::Cursor;
use std::sync::Arc;
use test_case::test_case;

const PROPERTY: &str =
    r#"{"type":"property","property":"bFlag","value_type":"BoolProperty","value":"true"}"#;

fn single(game: &str, file: &str, entry: &str, update: &str) -> String {
    format!(
        r#"{{"game":"{game}","files":[{{"file":"{file}","changes":[{{"entry":"{entry}","updates":[{update}]}}]}}]}}"#
    )
}

fn validator() -> Validator {
    Validator::new(Arc::new(VanillaClassTable::from_entries([(
        "SFXPawn_Player",
        vec![Game::Le2, Game::Le3],
    )])))
}

fn load(bytes: Vec<u8>, options: LoadOptions<'_>) -> merge_mod::Result<merge_mod::Document> {
    options.load(&mut Cursor::new(bytes))
}

#[test]
fn test_version_2_needs_a_version_2_reader() {
    let manifest = single("LE1", "SFXGame", "SFXGame.Default__SFXGame", PROPERTY);
    let bytes = container(FormatVersion::V2, &manifest, &[]);

    let err = load(bytes.clone(), LoadOptions::new().max_version(FormatVersion::V1)).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedVersion {
            found: 2,
            supported: 1
        }
    ));
    assert!(err.is_format_error());

    let document = load(bytes, LoadOptions::new()).unwrap();
    assert_eq!(document.version(), FormatVersion::V2);

    let v1 = container(FormatVersion::V1, &manifest, &[]);
    let document = load(v1, LoadOptions::new().max_version(FormatVersion::V1)).unwrap();
    assert_eq!(document.version(), FormatVersion::V1);
}

#[test]
fn test_version_1_rejects_version_2_features() {
    let validator = validator();
    let manifest = r#"{"game":"ME3","files":[{"file":"SFXGame","apply_to_all_localizations":true,"changes":[
        {"entry":"SFXGame.SFXPawn","updates":[{"type":"class_extend","scripts":["Jump.uc"]}]}
    ]}]}"#;
    let bytes = container(FormatVersion::V1, manifest, &[("Jump.uc", b"function Jump() {}")]);

    let err = load(bytes.clone(), LoadOptions::new().validator(&validator)).unwrap_err();
    let Error::Validation(issues) = err else {
        panic!("expected a validation error, got {err}");
    };
    assert_eq!(issues.len(), 2, "{issues:?}");
    assert!(issues.iter().any(|i| i.contains("apply_to_all_localizations")));
    assert!(issues.iter().any(|i| i.contains("class_extend")));

    // Inspection without a validator still works
    assert!(load(bytes, LoadOptions::new()).is_ok());
}

#[test]
fn test_multi_fragment_compile_needs_version_2() {
    let validator = validator();
    let update = r#"{"type":"script_compile","scripts":["A.uc","B.uc"]}"#;
    let manifest = single("ME3", "SFXGame", "SFXGame.SFXPawn.Tick", update);
    let assets: &[(&str, &[u8])] = &[("A.uc", b"a"), ("B.uc", b"b")];

    let v1 = container(FormatVersion::V1, &manifest, assets);
    assert!(matches!(
        load(v1, LoadOptions::new().validator(&validator)),
        Err(Error::Validation(_))
    ));
    let v2 = container(FormatVersion::V2, &manifest, assets);
    assert!(load(v2, LoadOptions::new().validator(&validator)).is_ok());
}

#[test_case(FormatVersion::V1, "ME3", "BioD_Nor_100", true ; "legacy prefix match")]
#[test_case(FormatVersion::V1, "ME3", "Coalesced", false ; "legacy prefix miss")]
#[test_case(FormatVersion::V2, "LE1", "Startup_INT", true ; "localized name match")]
#[test_case(FormatVersion::V2, "LE1", "BIOA_NOR10", false ; "localized rule has no prefixes")]
#[test_case(FormatVersion::V2, "LE1", "Coalesced_INT.pcc", false ; "localized miss")]
fn test_allow_list(version: FormatVersion, game: &str, file: &str, allowed: bool) {
    let validator = validator();
    let manifest = single(game, file, "SFXGame.Default__SFXGame", PROPERTY);
    let bytes = container(version, &manifest, &[]);
    let result = load(bytes, LoadOptions::new().validator(&validator));
    if allowed {
        assert!(result.is_ok(), "{result:?}");
    } else {
        let Err(Error::Validation(issues)) = result else {
            panic!("{file} was not rejected");
        };
        assert!(issues[0].contains("not a patchable file"));
    }
}

#[test]
fn test_injecting_a_vanilla_class_is_rejected() {
    let validator = validator();
    let inject = r#"{"type":"class_inject","asset":"SFXPawn_Player.uc"}"#;
    let assets: &[(&str, &[u8])] = &[("SFXPawn_Player.uc", b"class SFXPawn_Player;")];

    let le3 = single("LE3", "SFXGame", "SFXGame.SFXPawn_Player", inject);
    let err = load(
        container(FormatVersion::V2, &le3, assets),
        LoadOptions::new().validator(&validator),
    )
    .unwrap_err();
    assert!(err.to_string().contains("vanilla class SFXPawn_Player"));

    let le1 = single("LE1", "SFXGame", "SFXGame.SFXPawn_Player", inject);
    assert!(load(
        container(FormatVersion::V2, &le1, assets),
        LoadOptions::new().validator(&validator)
    )
    .is_ok());
}

#[test]
fn test_missing_asset_fails_validation() {
    let validator = validator();
    let update = r#"{"type":"script_compile","scripts":["Gone.uc"]}"#;
    let manifest = single("LE1", "SFXGame", "SFXGame.SFXPawn.Tick", update);
    let err = load(
        container(FormatVersion::V2, &manifest, &[]),
        LoadOptions::new().validator(&validator),
    )
    .unwrap_err();
    assert!(err.to_string().contains("Gone.uc"));
}
