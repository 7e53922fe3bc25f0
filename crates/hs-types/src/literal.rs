//! Literal scalar values that can appear as tuning candidates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal scalar taken from an annotation's argument list.
///
/// Rendering follows Python literal conventions (`True`, `None`, `1.0`) so
/// trial names match what users see in their YAML files and job logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    /// Convert into a config tree scalar.
    pub fn to_node(&self) -> serde_json::Value {
        match self {
            Self::None => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Build a literal from a config tree scalar. Returns `None` for
    /// mappings and sequences.
    pub fn from_node(node: &serde_json::Value) -> Option<Self> {
        match node {
            serde_json::Value::Null => Some(Self::None),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Shortest round-trip float rendering with a trailing `.0` for integral
/// values and exponent notation outside `[1e-4, 1e16)`.
fn format_float(v: f64) -> String {
    if !v.is_finite() {
        return if v.is_nan() {
            "nan".to_string()
        } else if v > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }

    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let rendered = format!("{v:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) => {
                let exp: i32 = exponent.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            None => rendered,
        };
    }

    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_python_style() {
        assert_eq!(Literal::Float(0.1).to_string(), "0.1");
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::Float(1e-5).to_string(), "1e-05");
        assert_eq!(Literal::Float(0.0001).to_string(), "0.0001");
        assert_eq!(Literal::Float(2.5e17).to_string(), "2.5e+17");
        assert_eq!(Literal::Int(32).to_string(), "32");
        assert_eq!(Literal::Bool(true).to_string(), "True");
        assert_eq!(Literal::None.to_string(), "None");
        assert_eq!(Literal::from("relu").to_string(), "relu");
    }

    #[test]
    fn node_conversion() {
        assert_eq!(Literal::Int(4).to_node(), serde_json::json!(4));
        assert_eq!(Literal::Float(0.5).to_node(), serde_json::json!(0.5));
        assert_eq!(Literal::None.to_node(), serde_json::Value::Null);
        assert_eq!(
            Literal::from_node(&serde_json::json!(0.25)),
            Some(Literal::Float(0.25))
        );
        assert_eq!(Literal::from_node(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn untagged_serialization() {
        let values = vec![
            Literal::Int(1),
            Literal::Float(0.5),
            Literal::Str("adam".into()),
            Literal::None,
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[1,0.5,"adam",null]"#);
        let back: Vec<Literal> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
