//! Concurrent fan-out against a shared container cache

mod common;

use common::*;
use merge_mod::package::PropertyValue;
use merge_mod::{ApplyContext, FileOutcome, FormatVersion, MergeServices};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const LANGUAGES: [&str; 8] = ["INT", "DEU", "ESN", "FRA", "ITA", "JPN", "POL", "RUS"];

fn slow_services(io: Arc<SlowPackageIo>) -> MergeServices {
    let languages = LANGUAGES.iter().map(|l| (*l).to_string()).collect();
    services_with(Arc::new(RecordingCompiler::default()), languages).with_package_io(io)
}

fn startup_document() -> merge_mod::Document {
    document(
        FormatVersion::V2,
        &manifest(
            "Startup",
            true,
            "SFXGame.Default__SFXGame",
            r#"{"type":"property","property":"bFlag","value_type":"BoolProperty","value":"true"},
               {"type":"script_compile","scripts":["A.uc","B.uc"]}"#,
        ),
        &[("A.uc", b"function A() {}"), ("B.uc", b"function B() {}")],
    )
}

fn install_all(dir: &TempDir) {
    for language in LANGUAGES {
        install(dir.path(), &format!("CookedPCConsole/Startup_{language}.pcc"));
    }
}

#[test]
fn test_fan_out_saves_every_localization_once() {
    let dir = TempDir::new().unwrap();
    install_all(&dir);
    let io = Arc::new(SlowPackageIo::new(Duration::from_millis(40)));
    let context = ApplyContext::new(dir.path(), slow_services(Arc::clone(&io)));

    let document = startup_document();
    let report = context.apply(&document).unwrap();

    assert_eq!(report.files.len(), LANGUAGES.len());
    assert_eq!(report.saved(), LANGUAGES.len());
    let targets: HashSet<_> = report.files.iter().map(|f| f.target.clone()).collect();
    assert_eq!(targets.len(), LANGUAGES.len());
    assert!(io.peak() <= merge_mod::apply::MAX_PARALLEL_FILES);
    assert_eq!(context.completed_weight(), (2 + 30) * LANGUAGES.len() as u64);

    for file in &report.files {
        let package = read_installed(file.path.as_ref().unwrap());
        let entry = package
            .entry(package.find("SFXGame.Default__SFXGame").unwrap())
            .unwrap();
        assert_eq!(
            entry.properties.get("bFlag", 0).unwrap().value,
            PropertyValue::Bool(true)
        );
    }
}

#[test]
fn test_verbose_apply_runs_one_file_at_a_time() {
    let dir = TempDir::new().unwrap();
    install_all(&dir);
    let io = Arc::new(SlowPackageIo::new(Duration::from_millis(5)));
    let context = ApplyContext::new(dir.path(), slow_services(Arc::clone(&io))).verbose(true);

    let report = context.apply(&startup_document()).unwrap();
    assert_eq!(report.saved(), LANGUAGES.len());
    assert_eq!(io.peak(), 1);
}

#[test]
fn test_documents_applied_from_several_threads() {
    let dir = TempDir::new().unwrap();
    install_all(&dir);
    let io = Arc::new(SlowPackageIo::new(Duration::from_millis(10)));
    let context = Arc::new(ApplyContext::new(dir.path(), slow_services(io)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let context = Arc::clone(&context);
            thread::spawn(move || context.apply(&startup_document()).unwrap())
        })
        .collect();
    for handle in handles {
        let report = handle.join().unwrap();
        assert!(report.is_success());
        assert!(
            report
                .files
                .iter()
                .all(|f| matches!(f.outcome, FileOutcome::Saved))
        );
    }

    assert_eq!(context.completed_weight(), 4 * 32 * LANGUAGES.len() as u64);
    assert!(context.cached_paths().is_empty());
    for language in LANGUAGES {
        let path = dir
            .path()
            .join(format!("CookedPCConsole/Startup_{language}.pcc"));
        read_installed(&path);
    }
}
