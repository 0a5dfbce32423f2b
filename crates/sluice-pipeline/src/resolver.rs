//! Resolution of node inputs from descriptors, runtime variables and the
//! environment.

use sluice_types::{Result, SluiceError, TypeKind, Value, ValueMap, ValueType};

use crate::convert::TypeParserChain;
use crate::descriptor::{self, Shape, Token};
use crate::environment::EnvMap;
use crate::property::Property;

/// Turns descriptor strings into typed values for a given [`Property`].
///
/// Runtime variables take precedence over environment entries, which take
/// precedence over the property default. Runtime values keep their type;
/// environment text and literal text go through the conversion chain.
#[derive(Debug, Default)]
pub struct Resolver {
    chain: TypeParserChain,
}

impl Resolver {
    pub fn new(chain: TypeParserChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &TypeParserChain {
        &self.chain
    }

    /// Resolve a property by its own name from the environment alone.
    pub fn resolve_from_environment(&self, property: &Property, env: &EnvMap) -> Result<Value> {
        match env.get(property.name()) {
            Some(text) => self.chain.try_parse(text, property.value_type()),
            None => default_for(property),
        }
    }

    /// Resolve `descriptor` for `property`.
    pub fn resolve_descriptor(
        &self,
        descriptor: &str,
        property: &Property,
        env: &EnvMap,
        runtime: &ValueMap,
    ) -> Result<Value> {
        let tokens = descriptor::tokenize(descriptor)?;
        match (descriptor::shape(&tokens), tokens.as_slice()) {
            (Shape { variables: 0, literals: 0 }, _) => default_for(property),
            (Shape { variables: 1, literals: 0 }, [Token::Variable(name)]) => {
                self.resolve_variable(name, property, env, runtime)
            }
            (Shape { variables: 0, literals: 1 }, [Token::Literal(text)]) => {
                self.chain.try_parse(text, property.value_type())
            }
            _ => {
                let text = compose(&tokens, property, env, runtime)?;
                self.chain.try_parse(&text, property.value_type())
            }
        }
    }

    fn resolve_variable(
        &self,
        name: &str,
        property: &Property,
        env: &EnvMap,
        runtime: &ValueMap,
    ) -> Result<Value> {
        if let Some(value) = runtime.get(name) {
            return check_compatible(property, value.clone());
        }
        if let Some(text) = env.get(name) {
            return self.chain.try_parse(text, property.value_type());
        }
        if !property.is_required() {
            if let Some(default) = property.default() {
                tracing::debug!(property = property.name(), variable = name, "Variable unset, using default");
                return Ok(default);
            }
        }
        Err(SluiceError::UnresolvedVariable {
            property: property.name().to_string(),
            name: name.to_string(),
        })
    }
}

/// Render every placeholder and concatenate with the literal text.
fn compose(tokens: &[Token], property: &Property, env: &EnvMap, runtime: &ValueMap) -> Result<String> {
    let mut text = String::new();
    for token in tokens {
        match token {
            Token::Literal(literal) => text.push_str(literal),
            Token::Variable(name) => {
                if let Some(value) = runtime.get(name) {
                    text.push_str(&value.render());
                } else if let Some(raw) = env.get(name) {
                    text.push_str(raw);
                } else {
                    return Err(SluiceError::UnresolvedVariable {
                        property: property.name().to_string(),
                        name: name.clone(),
                    });
                }
            }
        }
    }
    Ok(text)
}

fn default_for(property: &Property) -> Result<Value> {
    if property.is_required() {
        return Err(SluiceError::MissingRequired {
            property: property.name().to_string(),
        });
    }
    Ok(property.default().unwrap_or(Value::Null))
}

/// Check that a runtime value may be stored in `property`. An `Int` widens
/// into a `Float` property; enums must belong to the declared enum; list
/// elements are checked against the element type.
pub fn check_compatible(property: &Property, value: Value) -> Result<Value> {
    let declared = property.value_type();
    coerce(declared, value).map_err(|offending| SluiceError::TypeMismatch {
        property: property.name().to_string(),
        expected: declared.to_string(),
        actual: offending.type_name(),
    })
}

/// `Err` carries the value that did not fit, which for lists is the first
/// mismatched element.
fn coerce(declared: &ValueType, value: Value) -> std::result::Result<Value, Value> {
    let Some(kind) = value.kind() else {
        return if declared.accepts_null() {
            Ok(Value::Null)
        } else {
            Err(value)
        };
    };

    let target = declared.underlying();
    if !target.kind().is_assignable_from(kind) {
        return match (target.kind(), value) {
            (TypeKind::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (_, value) => Err(value),
        };
    }
    match (target, value) {
        (ValueType::Enum(def), Value::Enum { type_name, variant }) => {
            if def.name() == type_name {
                Ok(Value::Enum { type_name, variant })
            } else {
                Err(Value::Enum { type_name, variant })
            }
        }
        (ValueType::List(element), Value::List(items)) => items
            .into_iter()
            .map(|item| coerce(element, item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::List),
        (_, value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_types::codes;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn runtime(pairs: Vec<(&str, Value)>) -> ValueMap {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn empty_descriptor_uses_default() {
        let resolver = Resolver::default();
        let prop = Property::new("Count", ValueType::Int).default_value(Value::Int(3));
        let value = resolver
            .resolve_descriptor("", &prop, &EnvMap::new(), &ValueMap::new())
            .unwrap();
        assert_eq!(value, Value::Int(3));
    }

    #[test]
    fn empty_descriptor_for_required_fails() {
        let resolver = Resolver::default();
        let prop = Property::new("Source", ValueType::String).required();
        let err = resolver
            .resolve_descriptor("", &prop, &EnvMap::new(), &ValueMap::new())
            .unwrap_err();
        assert!(matches!(err, SluiceError::MissingRequired { .. }));
    }

    #[test]
    fn optional_without_default_is_null() {
        let resolver = Resolver::default();
        let prop = Property::new("Note", ValueType::String);
        let value = resolver
            .resolve_descriptor("", &prop, &EnvMap::new(), &ValueMap::new())
            .unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn bare_variable_keeps_runtime_type() {
        let resolver = Resolver::default();
        let prop = Property::new("Files", ValueType::list_of(ValueType::String));
        let files = Value::List(vec![Value::from("a"), Value::from("b")]);
        let rt = runtime(vec![("found", files.clone())]);
        let value = resolver
            .resolve_descriptor("{found}", &prop, &EnvMap::new(), &rt)
            .unwrap();
        assert_eq!(value, files);
    }

    #[test]
    fn bare_variable_from_env_is_converted() {
        let resolver = Resolver::default();
        let prop = Property::new("Count", ValueType::Int);
        let value = resolver
            .resolve_descriptor("{n}", &prop, &env(&[("n", "12")]), &ValueMap::new())
            .unwrap();
        assert_eq!(value, Value::Int(12));
    }

    #[test]
    fn incompatible_runtime_value_is_rejected() {
        let resolver = Resolver::default();
        let prop = Property::new("Count", ValueType::Int);
        let rt = runtime(vec![("n", Value::from("12"))]);
        let err = resolver
            .resolve_descriptor("{n}", &prop, &EnvMap::new(), &rt)
            .unwrap_err();
        assert!(matches!(err, SluiceError::TypeMismatch { .. }));
        assert_eq!(err.result_code(), codes::UNRESOLVABLE);
    }

    #[test]
    fn int_widens_to_float() {
        let prop = Property::new("Ratio", ValueType::Float);
        assert_eq!(check_compatible(&prop, Value::Int(2)).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn null_only_for_nullable_targets() {
        let int = Property::new("N", ValueType::Int);
        assert!(check_compatible(&int, Value::Null).is_err());
        let nullable = Property::new("N", ValueType::nullable(ValueType::Int));
        assert_eq!(check_compatible(&nullable, Value::Null).unwrap(), Value::Null);
        let text = Property::new("T", ValueType::String);
        assert!(check_compatible(&text, Value::Null).is_ok());
    }

    #[test]
    fn list_elements_are_checked() {
        let resolver = Resolver::default();
        let prop = Property::new("Sizes", ValueType::list_of(ValueType::Int));
        let rt = runtime(vec![("xs", Value::List(vec![Value::from("not-a-number")]))]);
        let err = resolver
            .resolve_descriptor("{xs}", &prop, &EnvMap::new(), &rt)
            .unwrap_err();
        assert!(matches!(err, SluiceError::TypeMismatch { .. }));

        let ratios = Property::new("Ratios", ValueType::list_of(ValueType::Float));
        assert_eq!(
            check_compatible(&ratios, Value::List(vec![Value::Int(1), Value::Float(0.5)])).unwrap(),
            Value::List(vec![Value::Float(1.0), Value::Float(0.5)])
        );
        assert!(check_compatible(&prop, Value::List(vec![Value::Int(1), Value::Null])).is_err());
    }

    #[test]
    fn enum_must_match_declared_enum() {
        let def = sluice_types::EnumDef::new("Level", &["Info"]);
        let prop = Property::new("Level", ValueType::Enum(def));
        let other = Value::Enum {
            type_name: "Color".into(),
            variant: "Info".into(),
        };
        assert!(check_compatible(&prop, other).is_err());
    }

    #[test]
    fn any_property_takes_runtime_value_unchanged() {
        let prop = Property::new("Value", ValueType::Any);
        assert_eq!(check_compatible(&prop, Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn literal_is_converted() {
        let resolver = Resolver::default();
        let prop = Property::new("Overwrite", ValueType::Bool);
        let value = resolver
            .resolve_descriptor("true", &prop, &EnvMap::new(), &ValueMap::new())
            .unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn composite_renders_null_as_token() {
        let resolver = Resolver::default();
        let prop = Property::new("Text", ValueType::String);
        let rt = runtime(vec![("x", Value::Null)]);
        let value = resolver
            .resolve_descriptor("value={x}", &prop, &EnvMap::new(), &rt)
            .unwrap();
        assert_eq!(value, Value::from("value=null"));
    }

    #[test]
    fn composite_with_missing_variable_fails() {
        let resolver = Resolver::default();
        let prop = Property::new("Text", ValueType::String).default_value("fallback");
        let err = resolver
            .resolve_descriptor("{a}/{b}", &prop, &env(&[("a", "x")]), &ValueMap::new())
            .unwrap_err();
        assert!(matches!(err, SluiceError::UnresolvedVariable { ref name, .. } if name == "b"));
    }

    #[test]
    fn environment_only_resolution() {
        let resolver = Resolver::default();
        let depth = Property::new("MaxDepth", ValueType::Int).default_value(Value::Int(1000));
        assert_eq!(
            resolver.resolve_from_environment(&depth, &EnvMap::new()).unwrap(),
            Value::Int(1000)
        );
        assert_eq!(
            resolver
                .resolve_from_environment(&depth, &env(&[("MaxDepth", "7")]))
                .unwrap(),
            Value::Int(7)
        );
        let required = Property::new("Root", ValueType::String).required();
        assert!(resolver.resolve_from_environment(&required, &EnvMap::new()).is_err());
    }
}
