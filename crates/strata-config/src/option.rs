//! Typed option values.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A value that is either an absolute amount or a percentage of some other
/// option (the schema's `ratio_over` key).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloatOrPercent {
    /// The raw number; a percentage when `percent` is set.
    pub value: f64,
    /// Interpret `value` as percent of the reference amount.
    pub percent: bool,
}

impl FloatOrPercent {
    /// An absolute value.
    pub const fn absolute(value: f64) -> Self {
        Self {
            value,
            percent: false,
        }
    }

    /// A percent value (`value` is in percent units, e.g. `150.0` for 150%).
    pub const fn percent(value: f64) -> Self {
        Self {
            value,
            percent: true,
        }
    }

    /// Resolve against the reference amount.
    pub fn get_abs_value(&self, ratio_over: f64) -> f64 {
        if self.percent {
            self.value / 100.0 * ratio_over
        } else {
            self.value
        }
    }

    /// True when the option is zero (treated as "auto" by flow math).
    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }
}

/// The closed sum of configuration value shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer amount.
    Int(i64),
    /// Floating-point amount.
    Float(f64),
    /// Percentage, stored in percent units.
    Percent(f64),
    /// Absolute-or-percent amount.
    FloatOrPercent(FloatOrPercent),
    /// Free-form text.
    String(String),
    /// 2D point in millimeters.
    Point((f64, f64)),
    /// 3D point in millimeters.
    Point3((f64, f64, f64)),
    /// Enumeration tag; the schema's enum table maps it to strings.
    Enum(u32),
    /// Per-extruder floats.
    Floats(Vec<f64>),
    /// Per-extruder integers.
    Ints(Vec<i64>),
    /// Multiple strings.
    Strings(Vec<String>),
    /// Per-extruder flags.
    Bools(Vec<bool>),
    /// Multiple 2D points.
    Points(Vec<(f64, f64)>),
}

impl OptionValue {
    /// Get a boolean, failing on any other variant.
    pub fn get_bool(&self) -> Result<bool> {
        match self {
            OptionValue::Bool(v) => Ok(*v),
            _ => Err(ConfigError::BadOptionType("bool")),
        }
    }

    /// Get an integer, failing on any other variant.
    pub fn get_int(&self) -> Result<i64> {
        match self {
            OptionValue::Int(v) => Ok(*v),
            _ => Err(ConfigError::BadOptionType("int")),
        }
    }

    /// Get a float; integers and percents also answer.
    pub fn get_float(&self) -> Result<f64> {
        match self {
            OptionValue::Float(v) | OptionValue::Percent(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v as f64),
            _ => Err(ConfigError::BadOptionType("float")),
        }
    }

    /// Get a string, failing on any other variant.
    pub fn get_string(&self) -> Result<&str> {
        match self {
            OptionValue::String(v) => Ok(v),
            _ => Err(ConfigError::BadOptionType("string")),
        }
    }

    /// Get a float-or-percent; plain floats are promoted.
    pub fn get_float_or_percent(&self) -> Result<FloatOrPercent> {
        match self {
            OptionValue::FloatOrPercent(v) => Ok(*v),
            OptionValue::Float(v) => Ok(FloatOrPercent::absolute(*v)),
            OptionValue::Percent(v) => Ok(FloatOrPercent::percent(*v)),
            _ => Err(ConfigError::BadOptionType("float or percent")),
        }
    }

    /// Get an enum tag, failing on any other variant.
    pub fn get_enum(&self) -> Result<u32> {
        match self {
            OptionValue::Enum(v) => Ok(*v),
            _ => Err(ConfigError::BadOptionType("enum")),
        }
    }

    /// Get per-extruder floats, failing on any other variant.
    pub fn get_floats(&self) -> Result<&[f64]> {
        match self {
            OptionValue::Floats(v) => Ok(v),
            _ => Err(ConfigError::BadOptionType("floats")),
        }
    }

    /// Get per-extruder bools, failing on any other variant.
    pub fn get_bools(&self) -> Result<&[bool]> {
        match self {
            OptionValue::Bools(v) => Ok(v),
            _ => Err(ConfigError::BadOptionType("bools")),
        }
    }

    /// Serialize in the `key = value` file syntax.
    pub fn serialize_str(&self) -> String {
        match self {
            OptionValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            OptionValue::Int(v) => v.to_string(),
            OptionValue::Float(v) => format_float(*v),
            OptionValue::Percent(v) => format!("{}%", format_float(*v)),
            OptionValue::FloatOrPercent(v) => {
                if v.percent {
                    format!("{}%", format_float(v.value))
                } else {
                    format_float(v.value)
                }
            }
            OptionValue::String(v) => v.clone(),
            OptionValue::Point((x, y)) => format!("{}x{}", format_float(*x), format_float(*y)),
            OptionValue::Point3((x, y, z)) => format!(
                "{}x{}x{}",
                format_float(*x),
                format_float(*y),
                format_float(*z)
            ),
            OptionValue::Enum(v) => v.to_string(),
            OptionValue::Floats(v) => join(v.iter().map(|f| format_float(*f))),
            OptionValue::Ints(v) => join(v.iter().map(i64::to_string)),
            OptionValue::Strings(v) => v.join(";"),
            OptionValue::Bools(v) => join(v.iter().map(|b| (if *b { "1" } else { "0" }).to_string())),
            OptionValue::Points(v) => join(
                v.iter()
                    .map(|(x, y)| format!("{}x{}", format_float(*x), format_float(*y))),
            ),
        }
    }
}

fn format_float(v: f64) -> String {
    // trim trailing zeros the way config files are usually written
    let s = format!("{v}");
    s
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        assert_eq!(OptionValue::Bool(true).get_bool().unwrap(), true);
        assert!(OptionValue::Bool(true).get_float().is_err());
        assert_eq!(OptionValue::Int(3).get_float().unwrap(), 3.0);
        assert!(matches!(
            OptionValue::Float(1.0).get_bool(),
            Err(ConfigError::BadOptionType("bool"))
        ));
    }

    #[test]
    fn test_float_or_percent() {
        let p = FloatOrPercent::percent(150.0);
        assert_eq!(p.get_abs_value(0.4), 0.6000000000000001);
        let a = FloatOrPercent::absolute(0.3);
        assert_eq!(a.get_abs_value(123.0), 0.3);
    }

    #[test]
    fn test_serialize_str() {
        assert_eq!(OptionValue::Bool(false).serialize_str(), "0");
        assert_eq!(
            OptionValue::FloatOrPercent(FloatOrPercent::percent(33.0)).serialize_str(),
            "33%"
        );
        assert_eq!(
            OptionValue::Floats(vec![0.4, 0.35]).serialize_str(),
            "0.4,0.35"
        );
        assert_eq!(OptionValue::Point((100.0, 200.0)).serialize_str(), "100x200");
    }
}
