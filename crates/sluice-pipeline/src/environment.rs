//! Layered string environment.
//!
//! Layers, lowest precedence first: process environment, document
//! `Environment`, phase and graph `Environment` sections, command-line
//! overrides.

use std::collections::HashMap;

use sluice_document::KeyValues;

/// Flattened environment seen by the resolver.
pub type EnvMap = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct EnvironmentLayers {
    base: EnvMap,
    overrides: EnvMap,
}

impl EnvironmentLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the variables of the current process. Variables that are
    /// not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self {
            base: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            overrides: EnvMap::new(),
        }
    }

    /// Add a layer above the existing base layers.
    pub fn with_layer<K, V>(mut self, layer: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.base
            .extend(layer.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Values that win over every layer, including scoped sections.
    pub fn with_overrides<K, V>(mut self, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The base layers with `sections` applied in order, then the overrides.
    pub fn scoped(&self, sections: &[&KeyValues]) -> EnvMap {
        let mut env = self.base.clone();
        for section in sections {
            env.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env.extend(self.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    pub fn resolve(&self) -> EnvMap {
        self.scoped(&[])
    }

    pub fn overrides(&self) -> &EnvMap {
        &self.overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win() {
        let mut section = KeyValues::new();
        section.insert("Root".into(), "/section".into());
        section.insert("Only".into(), "section".into());

        let layers = EnvironmentLayers::new()
            .with_layer([("Root", "/base"), ("Keep", "base")])
            .with_overrides([("Only", "cli")]);

        let env = layers.scoped(&[&section]);
        assert_eq!(env["Root"], "/section");
        assert_eq!(env["Keep"], "base");
        assert_eq!(env["Only"], "cli");
    }

    #[test]
    fn resolve_without_sections() {
        let layers = EnvironmentLayers::new()
            .with_layer([("a", "1")])
            .with_overrides([("a", "2")]);
        assert_eq!(layers.resolve()["a"], "2");
    }

    #[test]
    fn process_layer_sees_path() {
        let layers = EnvironmentLayers::from_process();
        assert_eq!(layers.resolve().get("PATH").is_some(), std::env::var("PATH").is_ok());
    }
}
