//! Shared collaborators and fixtures for integration tests

#![allow(dead_code)]

use merge_mod::package::{
    Entry, EntryBinary, EntryIndex, JsonPackageIo, PackageIo, Property, PropertyCollection,
    PropertyFlags, PropertyValue,
};
use merge_mod::services::{CompilationContext, MessageLog, ObjectPorter, PortRequest};
use merge_mod::codec::write_document;
use merge_mod::game::FixedLocalizations;
use merge_mod::{Document, FormatVersion, LoadOptions, MergeServices, Package, ScriptCompiler};
use parking_lot::Mutex;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Compiler that stores sources as bytecode and records what it compiled
#[derive(Debug, Default)]
pub struct RecordingCompiler {
    compiled: Mutex<Vec<String>>,
}

impl RecordingCompiler {
    pub fn compiled(&self) -> Vec<String> {
        self.compiled.lock().clone()
    }

    fn check(&self, source: &str, context: &CompilationContext, package: &Package) -> Result<(), MessageLog> {
        if !context.is_current(package) {
            return Err(MessageLog::error("stale compilation context"));
        }
        if source.contains("#error") {
            return Err(MessageLog::error(format!("cannot compile: {source}")));
        }
        self.compiled.lock().push(source.to_string());
        Ok(())
    }
}

fn member_name(source: &str) -> String {
    source
        .split_whitespace()
        .nth(1)
        .unwrap_or("Member")
        .trim_end_matches("()")
        .to_string()
}

impl ScriptCompiler for RecordingCompiler {
    fn compile_property(
        &self,
        package: &mut Package,
        _entry: EntryIndex,
        _property: &str,
        source: &str,
        context: &CompilationContext,
    ) -> Result<PropertyValue, MessageLog> {
        self.check(source, context, package)?;
        Ok(PropertyValue::Array(
            source
                .trim_matches(|c| c == '(' || c == ')')
                .split(',')
                .filter_map(|item| item.trim().parse().ok())
                .map(PropertyValue::Int)
                .collect(),
        ))
    }

    fn compile_function(
        &self,
        package: &mut Package,
        function: EntryIndex,
        source: &str,
        context: &CompilationContext,
    ) -> Result<(), MessageLog> {
        self.check(source, context, package)?;
        let entry = package
            .entry_mut(function)
            .ok_or_else(|| MessageLog::error("no such function"))?;
        entry.binary = EntryBinary::Function {
            bytecode: source.as_bytes().to_vec(),
        };
        Ok(())
    }

    fn compile_class(
        &self,
        package: &mut Package,
        source: &str,
        file_name: &str,
        outer: Option<EntryIndex>,
        existing: Option<EntryIndex>,
        context: &CompilationContext,
    ) -> Result<EntryIndex, MessageLog> {
        self.check(source, context, package)?;
        let binary = EntryBinary::Class {
            bytecode: source.as_bytes().to_vec(),
        };
        if let Some(existing) = existing {
            if let Some(entry) = package.entry_mut(existing) {
                entry.binary = binary;
            }
            return Ok(existing);
        }
        let name = file_name.trim_end_matches(".uc");
        package
            .add_entry(Entry::new(name, "Class", outer).with_binary(binary))
            .map_err(|e| MessageLog::error(e.to_string()))
    }

    fn add_or_replace_in_class(
        &self,
        package: &mut Package,
        class: EntryIndex,
        source: &str,
        context: &CompilationContext,
    ) -> Result<(), MessageLog> {
        self.check(source, context, package)?;
        let name = member_name(source);
        let bytecode = source.as_bytes().to_vec();
        match package.find_child(Some(class), &name) {
            Some(existing) => {
                if let Some(entry) = package.entry_mut(existing) {
                    entry.binary = EntryBinary::Function { bytecode };
                }
            }
            None => {
                package
                    .add_entry(
                        Entry::new(name, "Function", Some(class))
                            .with_binary(EntryBinary::Function { bytecode }),
                    )
                    .map_err(|e| MessageLog::error(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Porter that copies single entries without relinking
#[derive(Debug, Default)]
pub struct CopyPorter;

impl ObjectPorter for CopyPorter {
    fn port(
        &self,
        source: &Package,
        target: &mut Package,
        request: PortRequest,
    ) -> Result<EntryIndex, Vec<String>> {
        let entry = source
            .entry(request.source)
            .ok_or_else(|| vec![format!("no source entry {}", request.source)])?;
        match request.replace {
            Some(existing) => {
                let slot = target
                    .entry_mut(existing)
                    .ok_or_else(|| vec![format!("no target entry {existing}")])?;
                slot.class_name = entry.class_name.clone();
                slot.properties = entry.properties.clone();
                slot.binary = entry.binary.clone();
                Ok(existing)
            }
            None => {
                let mut copy = entry.clone();
                copy.outer = request.target_outer;
                target.add_entry(copy).map_err(|e| vec![e.to_string()])
            }
        }
    }
}

/// JSON backend that sleeps on every read and records peak concurrency
#[derive(Debug)]
pub struct SlowPackageIo {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowPackageIo {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl PackageIo for SlowPackageIo {
    fn read(&self, data: &[u8], file_name: &str) -> merge_mod::Result<Package> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        let package = JsonPackageIo.read(data, file_name);
        self.active.fetch_sub(1, Ordering::SeqCst);
        package
    }

    fn write(&self, package: &Package) -> merge_mod::Result<Vec<u8>> {
        JsonPackageIo.write(package)
    }
}

pub fn languages() -> Vec<String> {
    vec!["INT".to_string(), "DE".to_string()]
}

pub fn services_with(compiler: Arc<RecordingCompiler>, languages: Vec<String>) -> MergeServices {
    MergeServices::new(compiler, Arc::new(CopyPorter))
        .with_localizations(Arc::new(FixedLocalizations(languages)))
}

pub fn services() -> MergeServices {
    services_with(Arc::new(RecordingCompiler::default()), languages())
}

fn link(op: EntryIndex) -> PropertyValue {
    PropertyValue::Struct {
        struct_type: "SeqOpOutputInputLink".to_string(),
        properties: PropertyCollection::from_iter([
            Property::new("LinkedOp", PropertyValue::Object(op.uindex())),
            Property::new("InputLinkIdx", PropertyValue::Int(0)),
        ]),
    }
}

fn outputs(links: Vec<PropertyValue>) -> Property {
    Property::new(
        "OutputLinks",
        PropertyValue::Array(vec![PropertyValue::Struct {
            struct_type: "SeqOpOutputLink".to_string(),
            properties: PropertyCollection::from_iter([
                Property::new("LinkDesc", PropertyValue::Str("Out".to_string())),
                Property::new("Links", PropertyValue::Array(links)),
            ]),
        }]),
    )
}

/// Container every fixture target starts from
pub fn sample_package(file_name: &str) -> Package {
    let config = PropertyFlags::CONFIG | PropertyFlags::EDIT;
    Package::from_entries(
        file_name,
        vec![
            Entry::new("SFXGame", "Package", None),
            Entry::new("Default__SFXGame", "SFXGame", Some(EntryIndex(0)))
                .with_property(Property::new("bFlag", PropertyValue::Bool(false))),
            Entry::new("SFXPawn", "Class", Some(EntryIndex(0))),
            Entry::new("Tick", "Function", Some(EntryIndex(2))),
            Entry::new("FOV", "FloatProperty", Some(EntryIndex(2)))
                .with_binary(EntryBinary::Property {
                    flags: config.bits(),
                }),
            Entry::new("Main_Sequence", "Sequence", None),
            Entry::new("SeqAct_A", "SeqAct_Log", Some(EntryIndex(5)))
                .with_property(outputs(vec![link(EntryIndex(7))])),
            Entry::new("SeqAct_Skip", "SeqAct_Delay", Some(EntryIndex(5)))
                .with_property(outputs(vec![link(EntryIndex(8))])),
            Entry::new("SeqAct_C", "SeqAct_Log", Some(EntryIndex(5))),
        ],
    )
    .unwrap()
}

/// Fingerprint of the skippable sequence op in [`sample_package`]
pub fn skip_fingerprint() -> String {
    let package = sample_package("Any.pcc");
    let op = package.find("Main_Sequence.SeqAct_Skip").unwrap();
    package.fingerprint(op).unwrap()
}

/// Write a fixture container under `root`
pub fn install(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, JsonPackageIo.write(&sample_package(&file_name)).unwrap()).unwrap();
    path
}

/// Read an installed container back
pub fn read_installed(path: &Path) -> Package {
    let name = path.file_name().unwrap().to_str().unwrap();
    JsonPackageIo.read(&fs::read(path).unwrap(), name).unwrap()
}

/// Serialized container from manifest text and assets
pub fn container(version: FormatVersion, manifest: &str, assets: &[(&str, &[u8])]) -> Vec<u8> {
    let assets: Vec<(String, Vec<u8>)> = assets
        .iter()
        .map(|(name, data)| ((*name).to_string(), data.to_vec()))
        .collect();
    write_document(version, manifest, &assets).unwrap()
}

/// Eagerly loaded document from manifest text and assets
pub fn document(version: FormatVersion, manifest: &str, assets: &[(&str, &[u8])]) -> Document {
    let bytes = container(version, manifest, assets);
    LoadOptions::new()
        .eager_assets(true)
        .load(&mut Cursor::new(bytes))
        .unwrap()
}

/// Manifest with one directive holding one change set
pub fn manifest(file: &str, fan_out: bool, entry: &str, updates: &str) -> String {
    format!(
        r#"{{"game":"LE1","files":[{{"file":"{file}","apply_to_all_localizations":{fan_out},"changes":[{{"entry":"{entry}","updates":[{updates}]}}]}}]}}"#
    )
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
