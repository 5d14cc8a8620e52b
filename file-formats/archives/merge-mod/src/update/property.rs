//! Typed property assignment

use super::UpdateTarget;
use crate::package::{EntryIndex, Package, Property, PropertyCollection, PropertyValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Set one property on the change set's entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    /// Dotted path, optionally static-array indexed: `Camera.Offsets[2].X`
    pub property: String,
    /// Type tag such as `IntProperty`
    pub value_type: String,
    /// Literal value, or source text for arrays
    pub value: String,
}

/// Type tags accepted by property updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// `IntProperty`
    Int,
    /// `FloatProperty`
    Float,
    /// `BoolProperty`
    Bool,
    /// `ByteProperty`
    Byte,
    /// `NameProperty`
    Name,
    /// `ObjectProperty`
    Object,
    /// `EnumProperty`
    Enum,
    /// `StrProperty`
    Str,
    /// `StringRefProperty`
    StringRef,
    /// `ArrayProperty`
    Array,
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(tag: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match tag {
            "IntProperty" => PropertyType::Int,
            "FloatProperty" => PropertyType::Float,
            "BoolProperty" => PropertyType::Bool,
            "ByteProperty" => PropertyType::Byte,
            "NameProperty" => PropertyType::Name,
            "ObjectProperty" => PropertyType::Object,
            "EnumProperty" => PropertyType::Enum,
            "StrProperty" => PropertyType::Str,
            "StringRefProperty" => PropertyType::StringRef,
            "ArrayProperty" => PropertyType::Array,
            other => return Err(format!("unknown property type {other}")),
        })
    }
}

/// One step of a property path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySegment {
    /// Property name
    pub name: String,
    /// Static array index
    pub index: u32,
}

/// Parsed dotted property path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath(pub Vec<PropertySegment>);

impl FromStr for PropertyPath {
    type Err = String;

    fn from_str(path: &str) -> std::result::Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for token in path.split('.') {
            let (name, index) = match token.split_once('[') {
                Some((name, rest)) => {
                    let digits = rest
                        .strip_suffix(']')
                        .ok_or_else(|| format!("unterminated index in '{token}'"))?;
                    let index = digits
                        .parse::<u32>()
                        .map_err(|_| format!("bad static array index in '{token}'"))?;
                    (name, index)
                }
                None => (token, 0),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!("bad property name '{token}' in '{path}'"));
            }
            segments.push(PropertySegment {
                name: name.to_string(),
                index,
            });
        }
        Ok(PropertyPath(segments))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            if segment.index > 0 {
                write!(f, "[{}]", segment.index)?;
            }
        }
        Ok(())
    }
}

fn parse_literal(kind: PropertyType, value: &str) -> std::result::Result<PropertyValue, String> {
    let value = value.trim();
    let bad = |what: &str| format!("'{value}' is not a valid {what}");
    Ok(match kind {
        PropertyType::Int => PropertyValue::Int(value.parse().map_err(|_| bad("integer"))?),
        PropertyType::Float => PropertyValue::Float(value.parse().map_err(|_| bad("float"))?),
        PropertyType::Bool => match value.to_ascii_lowercase().as_str() {
            "true" => PropertyValue::Bool(true),
            "false" => PropertyValue::Bool(false),
            _ => return Err(bad("bool")),
        },
        PropertyType::Byte => PropertyValue::Byte(value.parse().map_err(|_| bad("byte"))?),
        PropertyType::Name => {
            if value.is_empty() {
                return Err(bad("name"));
            }
            PropertyValue::Name(value.to_string())
        }
        PropertyType::Enum => {
            let tokens: Vec<&str> = value.split('.').collect();
            match tokens.as_slice() {
                [enum_type, enum_value] if !enum_type.is_empty() && !enum_value.is_empty() => {
                    PropertyValue::Enum {
                        enum_type: (*enum_type).to_string(),
                        value: (*enum_value).to_string(),
                    }
                }
                _ => return Err(format!("enum value '{value}' must be EnumType.Value")),
            }
        }
        PropertyType::Str => PropertyValue::Str(value.to_string()),
        PropertyType::StringRef => PropertyValue::StringRef(
            value
                .trim_start_matches('$')
                .parse()
                .map_err(|_| bad("string reference"))?,
        ),
        // Resolved against the target package during apply
        PropertyType::Object | PropertyType::Array => PropertyValue::Str(value.to_string()),
    })
}

fn is_null_reference(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case("null") || value.eq_ignore_ascii_case("none")
}

impl PropertyUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if let Err(e) = self.property.parse::<PropertyPath>() {
            issues.push(e);
        }
        match self.value_type.parse::<PropertyType>() {
            Err(e) => issues.push(e),
            Ok(kind) => {
                if let Err(e) = parse_literal(kind, &self.value) {
                    issues.push(format!("{}: {e}", self.property));
                }
            }
        }
        issues
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let entry = target.require_entry()?;
        let path: PropertyPath = self.property.parse().map_err(|message| Error::Path {
            entry: target.entry_path.to_string(),
            message,
        })?;
        let kind: PropertyType = self.value_type.parse().map_err(|message| Error::Type {
            entry: target.entry_path.to_string(),
            message,
        })?;

        let value = match kind {
            PropertyType::Object => self.resolve_object(target.package, target.entry_path)?,
            PropertyType::Array => self.compile_array(target, entry, &path)?,
            _ => parse_literal(kind, &self.value).map_err(|message| Error::Type {
                entry: target.entry_path.to_string(),
                message,
            })?,
        };

        let (leaf, parents) = path.0.split_last().ok_or_else(|| Error::Path {
            entry: target.entry_path.to_string(),
            message: "empty property path".to_string(),
        })?;

        let property = Property::indexed(leaf.name.clone(), leaf.index, value);
        let entry_path = target.entry_path;
        let unchanged = target
            .package
            .entry(entry)
            .and_then(|record| lookup(&record.properties, parents))
            .and_then(|collection| collection.get(&leaf.name, leaf.index))
            .is_some_and(|existing| *existing == property);
        if unchanged {
            log::debug!("{entry_path}: {} already holds the requested value", self.property);
            return Ok(());
        }

        let record = target
            .package
            .entry_mut(entry)
            .ok_or_else(|| Error::invalid_format(format!("entry {entry} vanished")))?;
        let collection = walk(&mut record.properties, parents, entry_path)?;
        collection.set(property);
        Ok(())
    }

    fn resolve_object(&self, package: &Package, entry_path: &str) -> Result<PropertyValue> {
        let reference = self.value.trim();
        if is_null_reference(reference) {
            return Ok(PropertyValue::Object(0));
        }
        package
            .find(reference)
            .map(|idx| PropertyValue::Object(idx.uindex()))
            .ok_or_else(|| Error::Reference {
                entry: entry_path.to_string(),
                target: reference.to_string(),
            })
    }

    fn compile_array(
        &self,
        target: &mut UpdateTarget<'_>,
        entry: EntryIndex,
        path: &PropertyPath,
    ) -> Result<PropertyValue> {
        let compiler = target.services.compiler.as_ref();
        let context = target
            .scripts
            .refresh(compiler, target.package, target.entry_path)?;
        let result = compiler.compile_property(
            target.package,
            entry,
            &path.to_string(),
            &self.value,
            context,
        );
        target.scripts.invalidate();
        result.map_err(|log| target.compile_error(log))
    }
}

fn lookup<'a>(
    mut collection: &'a PropertyCollection,
    parents: &[PropertySegment],
) -> Option<&'a PropertyCollection> {
    for segment in parents {
        collection = collection
            .get(&segment.name, segment.index)?
            .value
            .as_struct()?;
    }
    Some(collection)
}

fn walk<'a>(
    mut collection: &'a mut PropertyCollection,
    parents: &[PropertySegment],
    entry_path: &str,
) -> Result<&'a mut PropertyCollection> {
    for segment in parents {
        let property = collection
            .get_mut(&segment.name, segment.index)
            .ok_or_else(|| Error::Path {
                entry: entry_path.to_string(),
                message: format!("property {} not found", segment.name),
            })?;
        let label = property.value.type_label();
        collection = property.value.as_struct_mut().ok_or_else(|| Error::Path {
            entry: entry_path.to_string(),
            message: format!(
                "{} is a {label}, not a struct, and cannot contain properties",
                segment.name
            ),
        })?;
    }
    Ok(collection)
}
