//! Applying documents to a game installation
//!
//! An [`ApplyContext`] lives for one install session. It resolves target
//! names against the installation once, shares opened containers between the
//! documents applied through it, and records the MD5 of every container the
//! first time the session reads it.
//!
//! ```no_run
//! use merge_mod::apply::ApplyContext;
//! use merge_mod::{Document, MergeServices};
//! # fn run(services: MergeServices, first: Document, last: Document) -> merge_mod::Result<()> {
//! let context = ApplyContext::new("/games/LE1/BioGame", services)
//!     .final_writer("SFXGame.pcc", last.id())
//!     .on_progress(|weight| println!("+{weight}"));
//!
//! context.apply(&first)?; // SFXGame.pcc stays open, unsaved
//! context.apply(&last)?; // SFXGame.pcc is saved here
//! # Ok(())
//! # }
//! ```

mod cache;
mod loaded_files;

pub use cache::{CachedPackage, PackageCache, PackageHandle};
pub use loaded_files::LoadedFiles;

use crate::document::{Document, DocumentId, FileDirective};
use crate::package::Package;
use crate::update::UpdateTarget;
use crate::{Error, MergeServices, Result, io};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on files of one localization fan-out processed at once
pub const MAX_PARALLEL_FILES: usize = 4;

type ProgressSink = Box<dyn Fn(u64) + Send + Sync>;

/// Content hashes of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    /// MD5 of the bytes first read this session
    pub original: String,
    /// MD5 of the bytes last written, if the container was saved
    pub patched: Option<String>,
}

/// What happened to one resolved target
#[derive(Debug)]
pub enum FileOutcome {
    /// Changes applied and the container written
    Saved,
    /// Changes applied but nothing was modified
    Unchanged,
    /// Changes applied; another document persists the container
    Deferred,
    /// Localized target absent from the installation
    Skipped,
    /// Changes aborted; the container was not written
    Failed(Error),
}

/// Outcome for one target file
#[derive(Debug)]
pub struct FileReport {
    /// Concrete target file name
    pub target: String,
    /// Resolved path, when the target exists
    pub path: Option<PathBuf>,
    /// Outcome
    pub outcome: FileOutcome,
}

/// Per-file outcomes of one apply call, in directive order
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// One report per resolved target
    pub files: Vec<FileReport>,
}

impl ApplyReport {
    /// Whether no target failed
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Failed targets and their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.files.iter().filter_map(|file| match &file.outcome {
            FileOutcome::Failed(error) => Some((file.target.as_str(), error)),
            _ => None,
        })
    }

    /// Number of containers written
    pub fn saved(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.outcome, FileOutcome::Saved))
            .count()
    }

    /// Outcome of a target by file name (case-insensitive)
    pub fn outcome(&self, target: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|file| file.target.eq_ignore_ascii_case(target))
            .map(|file| &file.outcome)
    }
}

/// Session state for applying documents to one installation
pub struct ApplyContext {
    root: PathBuf,
    services: MergeServices,
    loaded_files: OnceLock<LoadedFiles>,
    cache: PackageCache,
    hashes: Mutex<HashMap<PathBuf, FileHashes>>,
    final_writers: HashMap<String, DocumentId>,
    progress: Option<ProgressSink>,
    completed: AtomicU64,
    verbose: bool,
    max_threads: usize,
}

impl ApplyContext {
    /// Session over the installation rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P, services: MergeServices) -> Self {
        Self {
            root: root.into(),
            services,
            loaded_files: OnceLock::new(),
            cache: PackageCache::new(),
            hashes: Mutex::new(HashMap::new()),
            final_writers: HashMap::new(),
            progress: None,
            completed: AtomicU64::new(0),
            verbose: false,
            max_threads: MAX_PARALLEL_FILES,
        }
    }

    /// Log every change at info level; forces sequential file processing
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Further limit the number of files processed at once
    pub fn max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads.max(1);
        self
    }

    /// Only `document` may save the container named `file_name`
    pub fn final_writer(mut self, file_name: &str, document: DocumentId) -> Self {
        self.final_writers
            .insert(file_name.to_ascii_lowercase(), document);
        self
    }

    /// Receive each completed weight as it is reported
    pub fn on_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Use a prebuilt index instead of scanning the installation
    pub fn with_loaded_files(self, files: LoadedFiles) -> Self {
        let _ = self.loaded_files.set(files);
        self
    }

    /// Installation root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sum of every weight reported so far
    pub fn completed_weight(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Hashes of every container read this session
    pub fn file_hashes(&self) -> HashMap<PathBuf, FileHashes> {
        self.hashes.lock().clone()
    }

    /// Containers left open by deferred saves
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        self.cache.paths()
    }

    /// Index of loaded containers, scanned on first use
    pub fn loaded_files(&self) -> Result<&LoadedFiles> {
        if let Some(files) = self.loaded_files.get() {
            return Ok(files);
        }
        let files = LoadedFiles::scan(&self.root)?;
        // Another thread may have finished its scan first; either result is valid.
        let _ = self.loaded_files.set(files);
        self.loaded_files
            .get()
            .ok_or_else(|| Error::invalid_format("loaded-files index missing after scan"))
    }

    /// Apply every directive of a document
    ///
    /// Only errors that stop the whole document are returned as `Err`; a
    /// failing target is reported in the [`ApplyReport`] and does not stop the
    /// other targets.
    pub fn apply(&self, document: &Document) -> Result<ApplyReport> {
        log::info!(
            "Applying {} ({} directives, weight {})",
            document.id(),
            document.files().len(),
            document.merge_weight(&*self.services.localizations)
        );
        self.loaded_files()?;

        let mut report = ApplyReport::default();
        for directive in document.files() {
            let targets = directive.target_names(document.game(), &*self.services.localizations);
            if directive.apply_to_all_localizations && targets.len() > 1 {
                let threads = self.parallelism();
                log::debug!(
                    "Fanning {} out to {} localizations on {threads} threads",
                    directive.file,
                    targets.len()
                );
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| {
                        Error::Io(std::io::Error::other(format!(
                            "Failed to create thread pool: {e}"
                        )))
                    })?;
                let files: Vec<FileReport> = pool.install(|| {
                    targets
                        .par_iter()
                        .map(|target| self.apply_file(document, directive, target))
                        .collect()
                });
                report.files.extend(files);
            } else {
                for target in &targets {
                    report
                        .files
                        .push(self.apply_file(document, directive, target));
                }
            }
        }

        if report.is_success() {
            document.release_assets();
        }
        Ok(report)
    }

    /// Save containers left in the cache for which `document` is the final writer
    pub fn flush_deferred(&self, document: &Document) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for path in self.cache.paths() {
            let target = file_name_of(&path).to_string();
            if self.final_writers.get(&target.to_ascii_lowercase()) != Some(&document.id()) {
                continue;
            }
            let Some(handle) = self.cache.get(&path) else {
                continue;
            };
            let outcome = {
                let mut cached = handle.lock();
                self.persist(&path, &mut cached.package)
            };
            let outcome = outcome.unwrap_or_else(|error| {
                log::error!("Failed to save {}: {error}", path.display());
                self.cache.evict(&path);
                FileOutcome::Failed(error)
            });
            report.files.push(FileReport {
                target,
                path: Some(path),
                outcome,
            });
        }
        Ok(report)
    }

    fn parallelism(&self) -> usize {
        if self.verbose {
            return 1;
        }
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        MAX_PARALLEL_FILES.min(cores).min(self.max_threads).max(1)
    }

    fn report_weight(&self, weight: u64) {
        self.completed.fetch_add(weight, Ordering::Relaxed);
        if let Some(sink) = &self.progress {
            sink(weight);
        }
    }

    fn apply_file(
        &self,
        document: &Document,
        directive: &FileDirective,
        target: &str,
    ) -> FileReport {
        let resolved = self
            .loaded_files
            .get()
            .and_then(|files| files.get(target))
            .map(Path::to_path_buf);

        let Some(path) = resolved else {
            let outcome = if directive.apply_to_all_localizations {
                log::warn!("Localized target {target} is not installed, skipping");
                self.report_weight(directive.weight());
                FileOutcome::Skipped
            } else {
                log::error!("Target {target} is not installed");
                FileOutcome::Failed(Error::TargetNotFound(target.to_string()))
            };
            return FileReport {
                target: target.to_string(),
                path: None,
                outcome,
            };
        };

        let outcome = self
            .merge_into(document, directive, &path)
            .unwrap_or_else(|error| {
                log::error!("Failed to apply {} to {target}: {error}", document.id());
                self.cache.evict(&path);
                FileOutcome::Failed(error)
            });
        FileReport {
            target: target.to_string(),
            path: Some(path),
            outcome,
        }
    }

    fn merge_into(
        &self,
        document: &Document,
        directive: &FileDirective,
        path: &Path,
    ) -> Result<FileOutcome> {
        let handle = self.cache.get_or_open(path, || self.open(path))?;
        let mut cached = handle.lock();
        let CachedPackage { package, scripts } = &mut *cached;
        let file_name = file_name_of(path);

        for change in &directive.changes {
            let mut target = UpdateTarget {
                package: &mut *package,
                entry_path: &change.entry,
                assets: document.assets(),
                services: &self.services,
                scripts: &mut *scripts,
            };
            for update in &change.updates {
                if self.verbose {
                    log::info!("{file_name}: {} on {}", update.kind(), change.entry);
                }
                update.apply(&mut target, &mut |weight| self.report_weight(weight))?;
            }
        }

        match self.final_writers.get(&file_name.to_ascii_lowercase()) {
            Some(owner) if *owner != document.id() => {
                log::info!("Leaving {file_name} open for final writer {owner}");
                Ok(FileOutcome::Deferred)
            }
            _ => self.persist(path, package),
        }
    }

    fn open(&self, path: &Path) -> Result<Package> {
        let data = std::fs::read(path)?;
        let original = content_hash(&data);
        self.hashes
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| FileHashes {
                original,
                patched: None,
            });
        self.services.package_io.read(&data, file_name_of(path))
    }

    fn persist(&self, path: &Path, package: &mut Package) -> Result<FileOutcome> {
        if !package.is_modified() {
            log::debug!("{} was not modified", path.display());
            self.cache.evict(path);
            return Ok(FileOutcome::Unchanged);
        }

        let data = self.services.package_io.write(package)?;
        io::write_atomic(path, &data)?;
        let patched = content_hash(&data);

        let original = {
            let mut hashes = self.hashes.lock();
            let hashes = hashes
                .entry(path.to_path_buf())
                .or_insert_with(|| FileHashes {
                    original: String::new(),
                    patched: None,
                });
            hashes.patched = Some(patched.clone());
            hashes.original.clone()
        };
        log::info!("Saved {} (md5 {original} -> {patched})", path.display());
        self.cache.evict(path);
        Ok(FileOutcome::Saved)
    }
}

impl fmt::Debug for ApplyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyContext")
            .field("root", &self.root)
            .field("cached", &self.cache.len())
            .field("final_writers", &self.final_writers)
            .field("completed", &self.completed_weight())
            .field("verbose", &self.verbose)
            .field("max_threads", &self.max_threads)
            .finish_non_exhaustive()
    }
}

fn file_name_of(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}

/// Lowercase hex MD5 of a byte buffer
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}
