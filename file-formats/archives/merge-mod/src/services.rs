//! External services consumed by the change executors
//!
//! The patch engine does not compile scripts or port objects itself. It drives
//! a [`ScriptCompiler`] and an [`ObjectPorter`] supplied by the host, and reads
//! and writes containers through a [`PackageIo`].

use crate::game::{LocalizationProvider, StaticLocalizations};
use crate::package::{EntryIndex, JsonPackageIo, Package, PackageIo, PropertyValue};
use std::fmt;
use std::sync::Arc;

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational
    Info,
    /// Warning; compilation continues
    Warning,
    /// Error; compilation failed
    Error,
}

/// One compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Source line, when known
    pub line: Option<u32>,
    /// Message text
    pub message: String,
}

/// Structured diagnostic log returned by the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    /// Diagnostics in emission order
    pub diagnostics: Vec<Diagnostic>,
}

impl MessageLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log holding a single error
    pub fn error<S: Into<String>>(message: S) -> Self {
        let mut log = Self::new();
        log.push(Severity::Error, None, message);
        log
    }

    /// Append a diagnostic
    pub fn push<S: Into<String>>(&mut self, severity: Severity, line: Option<u32>, message: S) {
        self.diagnostics.push(Diagnostic {
            severity,
            line,
            message: message.into(),
        });
    }

    /// Whether any error was logged
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

impl fmt::Display for MessageLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for diagnostic in &self.diagnostics {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            match diagnostic.line {
                Some(line) => write!(f, "line {line}: {}", diagnostic.message)?,
                None => f.write_str(&diagnostic.message)?,
            }
        }
        if first {
            f.write_str("no diagnostics")?;
        }
        Ok(())
    }
}

/// Per-container symbol context for the compiler
///
/// A context is pinned to the package revision it was built from. After any
/// edit the revision moves on and the context must be re-initialized before
/// the next compile so later fragments see the updated state.
#[derive(Debug, Clone, Default)]
pub struct CompilationContext {
    revision: u64,
    symbols: Vec<String>,
}

impl CompilationContext {
    /// Context built from the current state of a package
    pub fn for_package(package: &Package) -> Self {
        let symbols = (0..package.len())
            .map(|i| package.full_path(EntryIndex(i)))
            .collect();
        Self {
            revision: package.revision(),
            symbols,
        }
    }

    /// Revision this context was built from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the context still reflects the package
    pub fn is_current(&self, package: &Package) -> bool {
        self.revision == package.revision()
    }

    /// Entry paths known when the context was built
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Whether a full path was known when the context was built
    pub fn knows(&self, path: &str) -> bool {
        self.symbols.iter().any(|s| s.eq_ignore_ascii_case(path))
    }
}

/// Bytecode compiler service
pub trait ScriptCompiler: Send + Sync {
    /// Build a compilation context for a package
    fn initialize(&self, package: &Package) -> Result<CompilationContext, MessageLog> {
        Ok(CompilationContext::for_package(package))
    }

    /// Compile the source text of a property value (used for array literals)
    fn compile_property(
        &self,
        package: &mut Package,
        entry: EntryIndex,
        property: &str,
        source: &str,
        context: &CompilationContext,
    ) -> Result<PropertyValue, MessageLog>;

    /// Compile a function body into an existing function or state entry
    fn compile_function(
        &self,
        package: &mut Package,
        function: EntryIndex,
        source: &str,
        context: &CompilationContext,
    ) -> Result<(), MessageLog>;

    /// Compile a full class, creating it under `outer` or replacing `existing`
    fn compile_class(
        &self,
        package: &mut Package,
        source: &str,
        file_name: &str,
        outer: Option<EntryIndex>,
        existing: Option<EntryIndex>,
        context: &CompilationContext,
    ) -> Result<EntryIndex, MessageLog>;

    /// Add members to a class or replace members that already exist
    fn add_or_replace_in_class(
        &self,
        package: &mut Package,
        class: EntryIndex,
        source: &str,
        context: &CompilationContext,
    ) -> Result<(), MessageLog>;
}

/// How much of the source object graph a port carries along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    /// Clone only the entry itself
    EntryOnly,
    /// Clone the entry and everything it references, relinking references
    WithDependencies,
}

/// One porting request
#[derive(Debug, Clone, Copy)]
pub struct PortRequest {
    /// Entry in the source package
    pub source: EntryIndex,
    /// Parent for newly created entries in the target
    pub target_outer: Option<EntryIndex>,
    /// Existing target entry to overwrite in place
    pub replace: Option<EntryIndex>,
    /// Dependency handling
    pub mode: PortMode,
}

/// Object-porting service: clones entries between packages
pub trait ObjectPorter: Send + Sync {
    /// Port an entry, returning its index in the target or the porter's diagnostics
    fn port(
        &self,
        source: &Package,
        target: &mut Package,
        request: PortRequest,
    ) -> Result<EntryIndex, Vec<String>>;
}

/// Collaborators handed to every apply call
#[derive(Clone)]
pub struct MergeServices {
    /// Container read/write service
    pub package_io: Arc<dyn PackageIo>,
    /// Bytecode compiler
    pub compiler: Arc<dyn ScriptCompiler>,
    /// Object porter
    pub porter: Arc<dyn ObjectPorter>,
    /// Localization enumeration
    pub localizations: Arc<dyn LocalizationProvider>,
}

impl MergeServices {
    /// Services using the JSON container backend and built-in language lists
    pub fn new(compiler: Arc<dyn ScriptCompiler>, porter: Arc<dyn ObjectPorter>) -> Self {
        Self {
            package_io: Arc::new(JsonPackageIo),
            compiler,
            porter,
            localizations: Arc::new(StaticLocalizations),
        }
    }

    /// Replace the container backend
    pub fn with_package_io(mut self, package_io: Arc<dyn PackageIo>) -> Self {
        self.package_io = package_io;
        self
    }

    /// Replace the localization provider
    pub fn with_localizations(mut self, localizations: Arc<dyn LocalizationProvider>) -> Self {
        self.localizations = localizations;
        self
    }
}

impl fmt::Debug for MergeServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeServices").finish_non_exhaustive()
    }
}
