//! Property descriptors: the named, typed values a node consumes or produces.

use sluice_types::{Value, ValueType};

/// Default value of a property, either fixed or computed on every lookup.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(fn() -> Value),
}

impl DefaultValue {
    pub fn value(&self) -> Value {
        match self {
            DefaultValue::Static(v) => v.clone(),
            DefaultValue::Computed(f) => f(),
        }
    }
}

/// Describes one named input or output of a node.
///
/// Built once with the consuming builder methods and never mutated after.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    description: String,
    value_type: ValueType,
    required: bool,
    default: Option<DefaultValue>,
    example: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            value_type,
            required: false,
            default: None,
            example: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Default computed lazily each time it is needed (e.g. "now").
    pub fn default_with(mut self, compute: fn() -> Value) -> Self {
        self.default = Some(DefaultValue::Computed(compute));
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default(&self) -> Option<Value> {
        self.default.as_ref().map(DefaultValue::value)
    }

    pub fn usage_example(&self) -> Option<&str> {
        self.example.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let prop = Property::new("Source", ValueType::String)
            .describe("File to copy")
            .required()
            .example("{Item}");
        assert_eq!(prop.name(), "Source");
        assert_eq!(prop.description(), "File to copy");
        assert!(prop.is_required());
        assert!(!prop.has_default());
        assert_eq!(prop.usage_example(), Some("{Item}"));
    }

    #[test]
    fn computed_default_runs_on_each_lookup() {
        fn answer() -> Value {
            Value::Int(42)
        }
        let prop = Property::new("Answer", ValueType::Int).default_with(answer);
        assert_eq!(prop.default(), Some(Value::Int(42)));
        assert!(prop.has_default());
    }
}
