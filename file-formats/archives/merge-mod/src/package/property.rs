//! Typed properties attached to package entries

use serde::{Deserialize, Serialize};

/// A single named, typed field on an entry or inside a struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name
    pub name: String,
    /// Static array index (0 for scalar properties)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub static_index: u32,
    /// Property value
    pub value: PropertyValue,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl Property {
    /// Create a scalar property
    pub fn new<S: Into<String>>(name: S, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            static_index: 0,
            value,
        }
    }

    /// Create a property at a static array index
    pub fn indexed<S: Into<String>>(name: S, static_index: u32, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            static_index,
            value,
        }
    }
}

/// Property values understood by the patch engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit float
    Float(f32),
    /// Boolean
    Bool(bool),
    /// Single byte
    Byte(u8),
    /// Name-table reference
    Name(String),
    /// Object reference by 1-based entry index; 0 is null
    Object(i32),
    /// Enum value (`EnumType.Value`)
    Enum {
        /// Enum type name
        enum_type: String,
        /// Enum value name
        value: String,
    },
    /// String
    Str(String),
    /// Localized string-table reference id
    StringRef(i32),
    /// Nested struct
    Struct {
        /// Struct type name
        struct_type: String,
        /// Fields of the struct
        properties: PropertyCollection,
    },
    /// Dynamic array
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Nested collection when this value is a struct
    pub fn as_struct(&self) -> Option<&PropertyCollection> {
        match self {
            PropertyValue::Struct { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Mutable nested collection when this value is a struct
    pub fn as_struct_mut(&mut self) -> Option<&mut PropertyCollection> {
        match self {
            PropertyValue::Struct { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Short type label for diagnostics
    pub fn type_label(&self) -> &'static str {
        match self {
            PropertyValue::Int(_) => "IntProperty",
            PropertyValue::Float(_) => "FloatProperty",
            PropertyValue::Bool(_) => "BoolProperty",
            PropertyValue::Byte(_) => "ByteProperty",
            PropertyValue::Name(_) => "NameProperty",
            PropertyValue::Object(_) => "ObjectProperty",
            PropertyValue::Enum { .. } => "EnumProperty",
            PropertyValue::Str(_) => "StrProperty",
            PropertyValue::StringRef(_) => "StringRefProperty",
            PropertyValue::Struct { .. } => "StructProperty",
            PropertyValue::Array(_) => "ArrayProperty",
        }
    }
}

/// Ordered list of properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyCollection(Vec<Property>);

impl PropertyCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a property by name (case-insensitive) and static index
    pub fn get(&self, name: &str, static_index: u32) -> Option<&Property> {
        self.0
            .iter()
            .find(|p| p.static_index == static_index && p.name.eq_ignore_ascii_case(name))
    }

    /// Mutable lookup by name and static index
    pub fn get_mut(&mut self, name: &str, static_index: u32) -> Option<&mut Property> {
        self.0
            .iter_mut()
            .find(|p| p.static_index == static_index && p.name.eq_ignore_ascii_case(name))
    }

    /// Replace a property with the same name and index, or append it
    pub fn set(&mut self, property: Property) {
        match self.get_mut(&property.name, property.static_index) {
            Some(existing) => *existing = property,
            None => self.0.push(property),
        }
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no properties
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in order
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    /// Iterate mutably in order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Property> {
        self.0.iter_mut()
    }
}

impl FromIterator<Property> for PropertyCollection {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PropertyCollection {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
