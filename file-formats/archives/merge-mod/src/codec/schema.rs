//! Version-specific manifest schema
//!
//! The manifest is checked as a JSON value before it is turned into typed
//! directives, so every problem can be reported at once with a JSON pointer
//! to where it was found.

use super::FormatVersion;
use crate::game::Game;
use serde_json::{Map, Value};
use std::fmt;

/// One schema problem in a loose manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON pointer to the offending value (`/files/0/changes/1`)
    pub pointer: String,
    /// What is wrong
    pub message: String,
}

impl SchemaViolation {
    pub(crate) fn new<P: Into<String>, M: Into<String>>(pointer: P, message: M) -> Self {
        Self {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pointer = if self.pointer.is_empty() { "/" } else { &self.pointer };
        write!(f, "{pointer}: {}", self.message)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Str,
    Text,
    Bool,
    StrList,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Str => value.as_str().is_some_and(|s| !s.is_empty()),
            FieldKind::Text => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::StrList => value.as_array().is_some_and(|items| {
                !items.is_empty() && items.iter().all(|i| i.as_str().is_some_and(|s| !s.is_empty()))
            }),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Str => "a non-empty string",
            FieldKind::Text => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::StrList => "a non-empty array of non-empty strings",
        }
    }
}

struct UpdateSchema {
    kind: &'static str,
    since: FormatVersion,
    fields: &'static [(&'static str, FieldKind, bool)],
}

const UPDATE_SCHEMAS: &[UpdateSchema] = &[
    UpdateSchema {
        kind: "property",
        since: FormatVersion::V1,
        fields: &[
            ("property", FieldKind::Str, true),
            ("value_type", FieldKind::Str, true),
            ("value", FieldKind::Text, true),
        ],
    },
    UpdateSchema {
        kind: "asset_port",
        since: FormatVersion::V1,
        fields: &[
            ("asset", FieldKind::Str, true),
            ("entry", FieldKind::Str, true),
            ("add_as_new", FieldKind::Bool, false),
        ],
    },
    UpdateSchema {
        kind: "script_compile",
        since: FormatVersion::V1,
        fields: &[("scripts", FieldKind::StrList, true)],
    },
    UpdateSchema {
        kind: "class_inject",
        since: FormatVersion::V2,
        fields: &[("asset", FieldKind::Str, true)],
    },
    UpdateSchema {
        kind: "class_extend",
        since: FormatVersion::V2,
        fields: &[("scripts", FieldKind::StrList, true)],
    },
    UpdateSchema {
        kind: "sequence_skip",
        since: FormatVersion::V2,
        fields: &[
            ("md5", FieldKind::Str, true),
            ("outbound_link", FieldKind::Str, true),
        ],
    },
    UpdateSchema {
        kind: "config_flag_clear",
        since: FormatVersion::V2,
        fields: &[("property", FieldKind::Str, true)],
    },
];

/// Check a manifest value against the schema of a container version
pub fn check_manifest(manifest: &Value, version: FormatVersion) -> Vec<SchemaViolation> {
    let mut violations = Vec::new();
    let Some(root) = object(manifest, "", "manifest", &mut violations) else {
        return violations;
    };
    unknown_keys(root, "", &["game", "files"], &mut violations);

    match root.get("game").and_then(Value::as_str) {
        Some(id) if Game::from_id(id).is_some() => {}
        Some(id) => violations.push(SchemaViolation::new("/game", format!("unknown game '{id}'"))),
        None => violations.push(SchemaViolation::new("/game", "required string is missing")),
    }

    let Some(files) = array(root, "", "files", &mut violations) else {
        return violations;
    };
    if files.is_empty() {
        violations.push(SchemaViolation::new("/files", "at least one file is required"));
    }
    for (i, file) in files.iter().enumerate() {
        check_file(file, &format!("/files/{i}"), version, &mut violations);
    }
    violations
}

fn check_file(file: &Value, pointer: &str, version: FormatVersion, out: &mut Vec<SchemaViolation>) {
    let Some(file) = object(file, pointer, "file directive", out) else {
        return;
    };
    unknown_keys(file, pointer, &["file", "apply_to_all_localizations", "changes"], out);
    field(file, pointer, "file", FieldKind::Str, true, out);
    if file.contains_key("apply_to_all_localizations") {
        if version < FormatVersion::V2 {
            out.push(SchemaViolation::new(
                format!("{pointer}/apply_to_all_localizations"),
                format!("not supported in format version {}", version.as_raw()),
            ));
        } else {
            field(file, pointer, "apply_to_all_localizations", FieldKind::Bool, false, out);
        }
    }

    let Some(changes) = array(file, pointer, "changes", out) else {
        return;
    };
    if changes.is_empty() {
        out.push(SchemaViolation::new(
            format!("{pointer}/changes"),
            "at least one change set is required",
        ));
    }
    for (j, change) in changes.iter().enumerate() {
        let pointer = format!("{pointer}/changes/{j}");
        let Some(change) = object(change, &pointer, "change set", out) else {
            continue;
        };
        unknown_keys(change, &pointer, &["entry", "updates"], out);
        field(change, &pointer, "entry", FieldKind::Str, true, out);
        let Some(updates) = array(change, &pointer, "updates", out) else {
            continue;
        };
        if updates.is_empty() {
            out.push(SchemaViolation::new(
                format!("{pointer}/updates"),
                "at least one update is required",
            ));
        }
        for (k, update) in updates.iter().enumerate() {
            check_update(update, &format!("{pointer}/updates/{k}"), version, out);
        }
    }
}

fn check_update(update: &Value, pointer: &str, version: FormatVersion, out: &mut Vec<SchemaViolation>) {
    let Some(update) = object(update, pointer, "update", out) else {
        return;
    };
    let Some(kind) = update.get("type").and_then(Value::as_str) else {
        out.push(SchemaViolation::new(
            format!("{pointer}/type"),
            "required string is missing",
        ));
        return;
    };
    let Some(schema) = UPDATE_SCHEMAS.iter().find(|s| s.kind == kind) else {
        out.push(SchemaViolation::new(
            format!("{pointer}/type"),
            format!("unknown update type '{kind}'"),
        ));
        return;
    };
    if version < schema.since {
        out.push(SchemaViolation::new(
            format!("{pointer}/type"),
            format!(
                "'{kind}' requires format version {}, manifest targets {}",
                schema.since.as_raw(),
                version.as_raw()
            ),
        ));
    }

    let mut allowed = vec!["type"];
    for &(name, field_kind, required) in schema.fields {
        allowed.push(name);
        field(update, pointer, name, field_kind, required, out);
    }
    unknown_keys(update, pointer, &allowed, out);

    if kind == "script_compile" && version < FormatVersion::V2 {
        let count = update.get("scripts").and_then(Value::as_array).map_or(0, Vec::len);
        if count > 1 {
            out.push(SchemaViolation::new(
                format!("{pointer}/scripts"),
                format!(
                    "format version {} allows exactly one script, found {count}",
                    version.as_raw()
                ),
            ));
        }
    }
}

fn object<'v>(
    value: &'v Value,
    pointer: &str,
    what: &str,
    out: &mut Vec<SchemaViolation>,
) -> Option<&'v Map<String, Value>> {
    let object = value.as_object();
    if object.is_none() {
        out.push(SchemaViolation::new(pointer, format!("{what} must be an object")));
    }
    object
}

fn array<'v>(
    parent: &'v Map<String, Value>,
    pointer: &str,
    name: &str,
    out: &mut Vec<SchemaViolation>,
) -> Option<&'v Vec<Value>> {
    match parent.get(name) {
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            out.push(SchemaViolation::new(
                format!("{pointer}/{name}"),
                "must be an array",
            ));
            None
        }
        None => {
            out.push(SchemaViolation::new(
                format!("{pointer}/{name}"),
                "required array is missing",
            ));
            None
        }
    }
}

fn field(
    parent: &Map<String, Value>,
    pointer: &str,
    name: &str,
    kind: FieldKind,
    required: bool,
    out: &mut Vec<SchemaViolation>,
) {
    match parent.get(name) {
        Some(value) if kind.matches(value) => {}
        Some(_) => out.push(SchemaViolation::new(
            format!("{pointer}/{name}"),
            format!("must be {}", kind.describe()),
        )),
        None if required => out.push(SchemaViolation::new(
            format!("{pointer}/{name}"),
            format!("required field is missing, expected {}", kind.describe()),
        )),
        None => {}
    }
}

fn unknown_keys(
    object: &Map<String, Value>,
    pointer: &str,
    allowed: &[&str],
    out: &mut Vec<SchemaViolation>,
) {
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            out.push(SchemaViolation::new(
                format!("{pointer}/{key}"),
                "unknown field",
            ));
        }
    }
}
