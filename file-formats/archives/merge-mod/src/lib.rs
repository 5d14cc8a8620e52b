//! # merge_mod - Merge Mod Patch Containers
//!
//! Reader, writer and apply engine for merge mods: small binary containers
//! that carry a JSON patch manifest plus the assets it needs, and that patch
//! compiled game containers in place instead of shipping whole replacement
//! files.
//!
//! ## Features
//!
//! - Versioned container codec (v1 raw, v2 LZMA manifest and text assets)
//! - Lazy asset loading from the container file, with release and reload
//! - Seven patch operations: typed properties, asset ports, class injection,
//!   function compiles, class extension, sequence skips and config flag clears
//! - Load-time validation against per-game allow-lists and a vanilla class table
//! - Session-wide container cache with final-writer deferral, per-file failure
//!   isolation and MD5 provenance hashes
//! - Compressed string-table bundles filtered by install options
//!
//! ## Examples
//!
//! ### Inspecting a container
//!
//! ```no_run
//! use merge_mod::{Document, game::StaticLocalizations};
//!
//! # fn main() -> Result<(), merge_mod::Error> {
//! let document = Document::open("MyMod.m3m")?;
//! println!("{} mod, format {}", document.game(), document.version());
//! for directive in document.files() {
//!     println!("{}: {} changes", directive.file, directive.changes.len());
//! }
//! println!("weight {}", document.merge_weight(&StaticLocalizations));
//! # Ok(())
//! # }
//! ```
//!
//! ### Compiling loose files
//!
//! ```no_run
//! use merge_mod::codec::{self, SerializeOutcome};
//! use merge_mod::FormatVersion;
//!
//! # fn main() -> Result<(), merge_mod::Error> {
//! match codec::serialize("mod/manifest.json", FormatVersion::V2)? {
//!     SerializeOutcome::Written(bytes) => std::fs::write("MyMod.m3m", bytes)?,
//!     SerializeOutcome::Violations(violations) => {
//!         for violation in violations {
//!             eprintln!("{violation}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod apply;
pub mod assets;
pub mod codec;
pub mod compression;
pub mod document;
pub mod error;
pub mod game;
pub mod io;
pub mod package;
pub mod services;
pub mod string_table;
pub mod update;
pub mod validate;
pub mod vanilla;

pub use apply::{ApplyContext, ApplyReport, FileHashes, FileOutcome, FileReport};
pub use assets::{AssetRecord, AssetStore};
pub use codec::{FormatVersion, LoadOptions};
pub use document::{Document, DocumentId, EntryChangeSet, FileDirective, Manifest};
pub use error::{Error, Result};
pub use game::Game;
pub use package::{Package, PackageIo};
pub use services::{MergeServices, MessageLog, ObjectPorter, ScriptCompiler};
pub use string_table::{StringTable, StringTableBuilder, StringTableEntry};
pub use update::Update;
pub use validate::Validator;
pub use vanilla::VanillaClassTable;
