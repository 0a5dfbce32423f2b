//! Dynamic values and declared value types.
//!
//! Descriptors are loosely typed strings; node properties are strongly typed.
//! [`Value`] is the tagged variant that bridges the two, and [`ValueType`]
//! is what a property declares it wants.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local};

/// Literal text used when a `Null` value is rendered into a template.
pub const NULL_TOKEN: &str = "null";

/// Format accepted when parsing date-time text without an offset.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named values keyed by property or variable name.
pub type ValueMap = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(DateTime<Local>),
    Enum { type_name: String, variant: String },
    List(Vec<Value>),
}

impl Value {
    /// The kind of this value, or `None` for `Null`.
    pub fn kind(&self) -> Option<TypeKind> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(TypeKind::String),
            Value::Bool(_) => Some(TypeKind::Bool),
            Value::Int(_) => Some(TypeKind::Int),
            Value::Float(_) => Some(TypeKind::Float),
            Value::DateTime(_) => Some(TypeKind::DateTime),
            Value::Enum { .. } => Some(TypeKind::Enum),
            Value::List(_) => Some(TypeKind::List),
        }
    }

    /// Human-readable type name used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "Null".to_string(),
            Value::Enum { type_name, .. } => format!("Enum({type_name})"),
            other => other
                .kind()
                .map(|k| k.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_enum_variant(&self) -> Option<&str> {
        match self {
            Value::Enum { variant, .. } => Some(variant),
            _ => None,
        }
    }

    /// Render the value as template text. Lists join with `;` and dates use
    /// RFC 3339, keeping sub-second precision and the offset.
    pub fn render(&self) -> String {
        match self {
            Value::Null => NULL_TOKEN.to_string(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::DateTime(d) => d.to_rfc3339(),
            Value::Enum { variant, .. } => variant.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    /// Convert to JSON for reporting.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(*i),
            Value::Float(f) => serde_json::json!(*f),
            Value::DateTime(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Enum { variant, .. } => serde_json::Value::String(variant.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ---------------------------------------------------------------------------
// TypeKind: coarse type hierarchy used for assignability
// ---------------------------------------------------------------------------

/// Coarse classification of value types.
///
/// ```text
/// Any
/// ├── Convertible
/// │   ├── String, Bool, Int, Float, DateTime, Enum
/// └── List
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Any,
    Convertible,
    String,
    Bool,
    Int,
    Float,
    DateTime,
    Enum,
    List,
}

impl TypeKind {
    /// Whether a value of kind `other` may be stored where `self` is expected.
    pub fn is_assignable_from(self, other: TypeKind) -> bool {
        if self == other || self == TypeKind::Any {
            return true;
        }
        self == TypeKind::Convertible && other.is_convertible()
    }

    pub fn is_convertible(self) -> bool {
        matches!(
            self,
            TypeKind::String
                | TypeKind::Bool
                | TypeKind::Int
                | TypeKind::Float
                | TypeKind::DateTime
                | TypeKind::Enum
        )
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Any => "Any",
            TypeKind::Convertible => "Convertible",
            TypeKind::String => "String",
            TypeKind::Bool => "Bool",
            TypeKind::Int => "Int",
            TypeKind::Float => "Float",
            TypeKind::DateTime => "DateTime",
            TypeKind::Enum => "Enum",
            TypeKind::List => "List",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// EnumDef
// ---------------------------------------------------------------------------

/// A named set of variants a property may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    name: String,
    variants: Vec<String>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, variants: &[&str]) -> Self {
        Self {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Case-insensitive lookup returning the canonical variant spelling.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn variant_at(&self, index: usize) -> Option<&str> {
        self.variants.get(index).map(String::as_str)
    }

    /// Build a value of this enum, if `variant` belongs to it.
    pub fn value(&self, variant: &str) -> Option<Value> {
        self.find(variant).map(|v| Value::Enum {
            type_name: self.name.clone(),
            variant: v.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// The declared type of a node property.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    /// No typing: values pass through untouched.
    Any,
    String,
    Bool,
    Int,
    Float,
    DateTime,
    Enum(EnumDef),
    List(Box<ValueType>),
    /// A value type that additionally admits `Null`.
    Nullable(Box<ValueType>),
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn nullable(inner: ValueType) -> Self {
        ValueType::Nullable(Box::new(inner))
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            ValueType::Any => TypeKind::Any,
            ValueType::String => TypeKind::String,
            ValueType::Bool => TypeKind::Bool,
            ValueType::Int => TypeKind::Int,
            ValueType::Float => TypeKind::Float,
            ValueType::DateTime => TypeKind::DateTime,
            ValueType::Enum(_) => TypeKind::Enum,
            ValueType::List(_) => TypeKind::List,
            ValueType::Nullable(inner) => inner.kind(),
        }
    }

    /// The type with any `Nullable` wrapper removed.
    pub fn underlying(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner.underlying(),
            other => other,
        }
    }

    /// Reference-like types admit `Null`; value types only when nullable.
    pub fn accepts_null(&self) -> bool {
        matches!(
            self,
            ValueType::Any | ValueType::String | ValueType::List(_) | ValueType::Nullable(_)
        )
    }

    pub fn is_any(&self) -> bool {
        matches!(self.underlying(), ValueType::Any)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Enum(def) => write!(f, "Enum({})", def.name()),
            ValueType::List(element) => write!(f, "List<{element}>"),
            ValueType::Nullable(inner) => write!(f, "{inner}?"),
            other => write!(f, "{}", other.kind()),
        }
    }
}
