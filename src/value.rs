//! Typed attribute values
//!
//! Declared resource attributes are stored as [`Value`]s. Markup carries every
//! attribute as a string, so each [`ValueType`] knows how to parse its markup
//! spelling and [`Value::to_markup`] renders it back.

use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::color::{format_color, parse_color};

/// The declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    Color,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Color => "color",
        };
        f.write_str(name)
    }
}

/// A declared attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Color([u8; 4]),
}

/// Error when a markup string does not parse as the declared type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("'{input}' is not a valid {expected}: {reason}")]
pub struct ValueError {
    pub input: String,
    pub expected: ValueType,
    pub reason: String,
}

impl ValueType {
    /// Parse the markup spelling of a value of this type.
    pub fn parse(self, input: &str) -> Result<Value, ValueError> {
        let fail = |reason: String| ValueError { input: input.to_string(), expected: self, reason };
        let trimmed = input.trim();

        match self {
            ValueType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail("expected true or false".to_string())),
            },
            ValueType::Int => trimmed.parse().map(Value::Int).map_err(|e| fail(e.to_string())),
            ValueType::Float => trimmed.parse().map(Value::Float).map_err(|e| fail(e.to_string())),
            ValueType::Text => Ok(Value::Text(input.to_string())),
            ValueType::Color => {
                parse_color(trimmed).map(|c| Value::Color(c.0)).map_err(|e| fail(e.to_string()))
            }
        }
    }
}

impl Value {
    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Color(_) => ValueType::Color,
        }
    }

    /// Render the value the way markup spells it.
    pub fn to_markup(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Color(c) => format_color(Rgba(*c)),
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

    /// Floats also accept integer values.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgba<u8>> {
        match self {
            Value::Color(c) => Some(Rgba(*c)),
            _ => None,
        }
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Rgba<u8>> for Value {
    fn from(c: Rgba<u8>) -> Self {
        Value::Color(c.0)
    }
}
