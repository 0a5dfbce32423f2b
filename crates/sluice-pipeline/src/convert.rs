//! Text-to-value conversion.
//!
//! Conversion goes through a [`TypeParserChain`]: every parser eligible for the
//! target type is tried in descending priority and the first success wins. A
//! parser that fails passes the text on to the next one.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use sluice_types::{
    Result, SluiceError, TypeKind, Value, ValueType, DATE_TIME_FORMAT, NULL_TOKEN,
};

/// Separator between list elements in descriptor text.
pub const LIST_SEPARATOR: char = ';';

/// A plugin converting descriptor text into a typed [`Value`].
pub trait TypeParser: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priorities are tried first.
    fn priority(&self) -> i32;

    fn target_kind(&self) -> TypeKind;

    /// Whether the parser also handles every kind assignable to its target.
    fn processes_children(&self) -> bool {
        false
    }

    /// Attempt a conversion. `target` never carries a `Nullable` wrapper.
    /// The chain is passed in so composite parsers can convert elements.
    fn try_parse(&self, text: &str, target: &ValueType, chain: &TypeParserChain) -> Option<Value>;

    fn can_parse(&self, target: TypeKind) -> bool {
        let own = self.target_kind();
        own == target || (self.processes_children() && own.is_assignable_from(target))
    }
}

/// Ordered collection of [`TypeParser`]s.
pub struct TypeParserChain {
    parsers: Vec<Box<dyn TypeParser>>,
}

impl TypeParserChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// A chain with the built-in enum, scalar and list parsers.
    pub fn with_builtins() -> Self {
        let mut chain = Self::new();
        chain.register(EnumNameParser);
        chain.register(ConvertibleParser);
        chain.register(DelimitedListParser);
        chain
    }

    /// Add a parser. Parsers of equal priority keep registration order.
    pub fn register(&mut self, parser: impl TypeParser + 'static) {
        self.parsers.push(Box::new(parser));
        self.parsers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Parser names in the order they would be tried.
    pub fn names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Convert `text` to `target`.
    pub fn try_parse(&self, text: &str, target: &ValueType) -> Result<Value> {
        if target.is_any() {
            return Ok(Value::String(text.to_string()));
        }
        if let ValueType::Nullable(_) = target {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == NULL_TOKEN {
                return Ok(Value::Null);
            }
        }

        let target = target.underlying();
        for parser in self.parsers.iter().filter(|p| p.can_parse(target.kind())) {
            if let Some(value) = parser.try_parse(text, target, self) {
                tracing::trace!(parser = parser.name(), %target, "Converted descriptor text");
                return Ok(value);
            }
            tracing::debug!(parser = parser.name(), %target, text, "Parser declined, trying next");
        }

        Err(SluiceError::Conversion {
            text: text.to_string(),
            target: target.to_string(),
        })
    }
}

impl Default for TypeParserChain {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for TypeParserChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeParserChain")
            .field("parsers", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in parsers
// ---------------------------------------------------------------------------

/// Matches enum variants by name, ignoring case.
pub struct EnumNameParser;

impl TypeParser for EnumNameParser {
    fn name(&self) -> &str {
        "enum-name"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn target_kind(&self) -> TypeKind {
        TypeKind::Enum
    }

    fn try_parse(&self, text: &str, target: &ValueType, _chain: &TypeParserChain) -> Option<Value> {
        match target {
            ValueType::Enum(def) => def.value(text.trim()),
            _ => None,
        }
    }
}

/// General-purpose conversion for every scalar type.
pub struct ConvertibleParser;

impl TypeParser for ConvertibleParser {
    fn name(&self) -> &str {
        "convertible"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn target_kind(&self) -> TypeKind {
        TypeKind::Convertible
    }

    fn processes_children(&self) -> bool {
        true
    }

    fn try_parse(&self, text: &str, target: &ValueType, _chain: &TypeParserChain) -> Option<Value> {
        let trimmed = text.trim();
        match target {
            ValueType::String => Some(Value::String(text.to_string())),
            ValueType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ValueType::Int => trimmed.parse::<i64>().ok().map(Value::Int),
            ValueType::Float => trimmed.parse::<f64>().ok().map(Value::Float),
            ValueType::DateTime => parse_date_time(trimmed).map(Value::DateTime),
            ValueType::Enum(def) => trimmed
                .parse::<usize>()
                .ok()
                .and_then(|index| def.variant_at(index))
                .and_then(|variant| def.value(variant)),
            _ => None,
        }
    }
}

/// Splits `a;b;c` and converts each element with the element type.
pub struct DelimitedListParser;

impl TypeParser for DelimitedListParser {
    fn name(&self) -> &str {
        "delimited-list"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn target_kind(&self) -> TypeKind {
        TypeKind::List
    }

    fn try_parse(&self, text: &str, target: &ValueType, chain: &TypeParserChain) -> Option<Value> {
        let ValueType::List(element) = target else {
            return None;
        };
        if text.trim().is_empty() {
            return Some(Value::List(Vec::new()));
        }
        text.split(LIST_SEPARATOR)
            .map(|part| chain.try_parse(part.trim(), element).ok())
            .collect::<Option<Vec<_>>>()
            .map(Value::List)
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD` (local time).
pub fn parse_date_time(text: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local.from_local_datetime(&naive).earliest()
}
