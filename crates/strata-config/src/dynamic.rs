//! The dynamic option bag.

use std::collections::BTreeMap;

use crate::def::print_config_def;
use crate::error::{ConfigError, Result};
use crate::legacy;
use crate::option::OptionValue;

/// A mapping from option key to typed value, validated against the schema.
///
/// Used for user overrides and per-volume/per-material configs; static views
/// are produced by applying a `DynamicConfig` onto a typed struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicConfig {
    values: BTreeMap<String, OptionValue>,
}

impl DynamicConfig {
    /// An empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of options set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Keys set in this config, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    /// True when `key` is set.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.values.remove(key)
    }

    /// Set a typed value, validating key and value against the schema.
    pub fn set(&mut self, key: &str, value: OptionValue) -> Result<()> {
        let def = print_config_def()
            .resolve(key)
            .ok_or_else(|| ConfigError::UnknownOption(key.to_string()))?;
        def.validate_value(&value)?;
        self.values.insert(def.key.to_string(), value);
        Ok(())
    }

    /// Parse and set a textual value.
    ///
    /// The input first runs through the legacy table (renamed keys, retyped
    /// values, retired keys become silent no-ops), then through alias
    /// resolution and schema validation. Shortcut options write through to
    /// their target keys and are never stored themselves.
    pub fn set_deserialize(&mut self, key: &str, value: &str) -> Result<()> {
        let Some((key, value)) = legacy::rewrite(key.trim(), value.trim()) else {
            log::debug!(target: "config", "ignoring retired option '{}'", key.trim());
            return Ok(());
        };
        let def = print_config_def()
            .resolve(&key)
            .ok_or_else(|| ConfigError::UnknownOption(key.clone()))?;

        if !def.shortcut.is_empty() && !def.deferred_shortcut {
            for target in def.shortcut {
                self.set_deserialize(target, &value)?;
            }
            return Ok(());
        }

        let parsed = def.deserialize(&value)?;
        self.values.insert(def.key.to_string(), parsed);
        Ok(())
    }

    /// Copy every option of `other` into `self`.
    ///
    /// Unknown keys error unless `ignore_nonexistent` is set.
    pub fn apply(&mut self, other: &DynamicConfig, ignore_nonexistent: bool) -> Result<()> {
        for (key, value) in &other.values {
            match print_config_def().resolve(key) {
                Some(def) => {
                    self.values.insert(def.key.to_string(), value.clone());
                }
                None if ignore_nonexistent => {}
                None => return Err(ConfigError::UnknownOption(key.clone())),
            }
        }
        Ok(())
    }

    /// Keys whose value in `other` differs from (or is missing in) `self`.
    pub fn diff(&self, other: &DynamicConfig) -> Vec<String> {
        other
            .values
            .iter()
            .filter(|(key, value)| self.values.get(*key) != Some(value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// True when both configs hold the same options and values.
    pub fn equals(&self, other: &DynamicConfig) -> bool {
        self.values == other.values
    }

    /// Resolve a float-or-percent option against `ratio_over`.
    pub fn get_abs_value(&self, key: &str, ratio_over: f64) -> Result<f64> {
        match self.values.get(key) {
            Some(value) => Ok(value.get_float_or_percent()?.get_abs_value(ratio_over)),
            None => Err(ConfigError::UnknownOption(key.to_string())),
        }
    }

    /// Propagate deferred shortcuts and enforce cross-option constraints.
    ///
    /// The `extruder` shortcut writes each role extruder that is still
    /// unset. Enabling `spiral_vase` forces the option combination the mode
    /// requires.
    pub fn normalize(&mut self) {
        if let Some(extruder) = self.values.remove("extruder") {
            if let Some(def) = print_config_def().get("extruder") {
                for target in def.shortcut {
                    if !self.values.contains_key(*target) {
                        self.values.insert((*target).to_string(), extruder.clone());
                    }
                }
            }
        }

        let spiral_vase = self
            .values
            .get("spiral_vase")
            .and_then(|v| v.get_bool().ok())
            .unwrap_or(false);
        if spiral_vase {
            self.values
                .insert("retract_layer_change".into(), OptionValue::Bools(vec![false]));
            self.values.insert("perimeters".into(), OptionValue::Int(1));
            self.values.insert("top_solid_layers".into(), OptionValue::Int(0));
            self.values
                .insert("fill_density".into(), OptionValue::Percent(0.0));
        }
    }

    /// Parse a `key = value` config file body.
    ///
    /// Lines starting with `#` are comments; blank lines are skipped.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::InvalidOptionValue {
                    key: line.to_string(),
                    value: String::new(),
                });
            };
            self.set_deserialize(key, value)?;
        }
        Ok(())
    }

    /// Serialize to the `key = value` file format.
    pub fn save_str(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.serialize_str());
            out.push('\n');
        }
        out
    }

    /// Seed a config from `<prefix>_<KEY>` environment variables.
    ///
    /// Malformed variables are logged and skipped rather than failing
    /// startup.
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::new();
        for (name, value) in std::env::vars() {
            let Some(key) = name.strip_prefix(prefix) else {
                continue;
            };
            let key = key.trim_start_matches('_').to_lowercase();
            if let Err(err) = config.set_deserialize(&key, &value) {
                log::warn!(target: "config", "ignoring environment override {}: {}", name, err);
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::FloatOrPercent;

    #[test]
    fn test_set_deserialize_and_get() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("layer_height", "0.2").unwrap();
        assert_eq!(config.get("layer_height"), Some(&OptionValue::Float(0.2)));
    }

    #[test]
    fn test_unknown_option() {
        let mut config = DynamicConfig::new();
        assert!(matches!(
            config.set_deserialize("no_such_thing", "1"),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_alias_sets_canonical_key() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("infill_density", "35%").unwrap();
        assert_eq!(config.get("fill_density"), Some(&OptionValue::Percent(35.0)));
        assert!(!config.has("infill_density"));
    }

    #[test]
    fn test_shortcut_is_not_stored() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("solid_layers", "5").unwrap();
        assert!(!config.has("solid_layers"));
        assert_eq!(config.get("top_solid_layers"), Some(&OptionValue::Int(5)));
        assert_eq!(config.get("bottom_solid_layers"), Some(&OptionValue::Int(5)));
    }

    #[test]
    fn test_deferred_extruder_shortcut() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("perimeter_extruder", "2").unwrap();
        config.set_deserialize("extruder", "3").unwrap();
        config.normalize();
        assert!(!config.has("extruder"));
        // already set keys keep their value
        assert_eq!(config.get("perimeter_extruder"), Some(&OptionValue::Int(2)));
        assert_eq!(config.get("infill_extruder"), Some(&OptionValue::Int(3)));
        assert_eq!(
            config.get("support_material_extruder"),
            Some(&OptionValue::Int(3))
        );
    }

    #[test]
    fn test_spiral_vase_normalization() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("spiral_vase", "1").unwrap();
        config.normalize();
        assert_eq!(config.get("perimeters"), Some(&OptionValue::Int(1)));
        assert_eq!(config.get("top_solid_layers"), Some(&OptionValue::Int(0)));
        assert_eq!(config.get("fill_density"), Some(&OptionValue::Percent(0.0)));
        assert_eq!(
            config.get("retract_layer_change"),
            Some(&OptionValue::Bools(vec![false]))
        );
    }

    #[test]
    fn test_diff_and_apply() {
        let mut a = DynamicConfig::new();
        a.set_deserialize("layer_height", "0.2").unwrap();
        let mut b = DynamicConfig::new();
        b.set_deserialize("layer_height", "0.3").unwrap();
        b.set_deserialize("perimeters", "2").unwrap();
        assert_eq!(a.diff(&b), vec!["layer_height", "perimeters"]);
        a.apply(&b, false).unwrap();
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_load_and_save() {
        let mut config = DynamicConfig::new();
        config
            .load_str("# comment\nlayer_height = 0.25\nfirst_layer_height = 60%\n")
            .unwrap();
        assert_eq!(config.get("layer_height"), Some(&OptionValue::Float(0.25)));
        assert_eq!(
            config.get("first_layer_height"),
            Some(&OptionValue::FloatOrPercent(FloatOrPercent::percent(60.0)))
        );
        let saved = config.save_str();
        let mut reloaded = DynamicConfig::new();
        reloaded.load_str(&saved).unwrap();
        assert!(config.equals(&reloaded));
    }

    #[test]
    fn test_legacy_value_through_set_deserialize() {
        let mut config = DynamicConfig::new();
        config.set_deserialize("fill_density", "0.4").unwrap();
        assert_eq!(config.get("fill_density"), Some(&OptionValue::Percent(40.0)));
        // retired keys are silent no-ops
        config.set_deserialize("duplicate_grid", "2x2").unwrap();
        assert!(config.is_empty() == false);
        assert_eq!(config.len(), 1);
    }
}
