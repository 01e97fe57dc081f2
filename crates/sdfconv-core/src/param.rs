//! Typed parameters used for element attributes and element values

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::pose::{format_vector3, parse_pose_string, parse_vector3, Pose};

/// Declared type of a parameter slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Bool,
    Int,
    #[serde(alias = "unsigned int")]
    UnsignedInt,
    Float,
    Double,
    #[serde(alias = "vector3d")]
    Vector3,
    Pose,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::UnsignedInt => "unsigned_int",
            ParamType::Float => "float",
            ParamType::Double => "double",
            ParamType::Vector3 => "vector3",
            ParamType::Pose => "pose",
        };
        f.write_str(s)
    }
}

/// A concrete parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    Vector3(Vector3<f64>),
    Pose(Pose),
}

impl Value {
    /// Parse text as the given type; `None` when the text does not fit
    pub fn parse(ty: ParamType, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        match ty {
            ParamType::String => Some(Value::String(text.to_string())),
            ParamType::Bool => parse_bool(trimmed).map(Value::Bool),
            ParamType::Int => trimmed.parse().ok().map(Value::Int),
            ParamType::UnsignedInt => trimmed.parse().ok().map(Value::UnsignedInt),
            ParamType::Float => trimmed.parse().ok().map(Value::Float),
            ParamType::Double => trimmed.parse().ok().map(Value::Double),
            ParamType::Vector3 => parse_vector3(trimmed).map(Value::Vector3),
            ParamType::Pose => parse_pose_string(trimmed).map(Value::Pose),
        }
    }

    /// The zero value of a type
    pub fn zero(ty: ParamType) -> Value {
        match ty {
            ParamType::String => Value::String(String::new()),
            ParamType::Bool => Value::Bool(false),
            ParamType::Int => Value::Int(0),
            ParamType::UnsignedInt => Value::UnsignedInt(0),
            ParamType::Float => Value::Float(0.0),
            ParamType::Double => Value::Double(0.0),
            ParamType::Vector3 => Value::Vector3(Vector3::zeros()),
            ParamType::Pose => Value::Pose(Pose::identity()),
        }
    }

    pub fn ty(&self) -> ParamType {
        match self {
            Value::String(_) => ParamType::String,
            Value::Bool(_) => ParamType::Bool,
            Value::Int(_) => ParamType::Int,
            Value::UnsignedInt(_) => ParamType::UnsignedInt,
            Value::Float(_) => ParamType::Float,
            Value::Double(_) => ParamType::Double,
            Value::Vector3(_) => ParamType::Vector3,
            Value::Pose(_) => ParamType::Pose,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::UnsignedInt(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Int(v) => write!(f, "{}", v),
            Value::UnsignedInt(v) => write!(f, "{}", v),
            Value::Float(v) => f.write_str(&format_number(f64::from(*v))),
            Value::Double(v) => f.write_str(&format_number(*v)),
            Value::Vector3(v) => f.write_str(&format_vector3(v)),
            Value::Pose(p) => write!(f, "{}", p),
        }
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Print a double the way C's `%g` does: six significant digits, scientific
/// notation for very large or small magnitudes, no trailing zeros.
pub fn format_number(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    if v.abs() < 1e-15 {
        return "0".to_string();
    }
    let exp = v.abs().log10().floor() as i32;
    if (-5..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        let s = trim_fraction(format!("{:.*}", decimals, v));
        if s == "-0" {
            "0".to_string()
        } else {
            s
        }
    } else {
        let s = format!("{:.5e}", v);
        match s.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or(0);
                format!(
                    "{}e{}{:02}",
                    trim_fraction(mantissa.to_string()),
                    if exponent < 0 { '-' } else { '+' },
                    exponent.abs()
                )
            }
            None => s,
        }
    }
}

fn trim_fraction(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Conversion between Rust types and [`Value`]
pub trait ParamValue: Sized + Default {
    fn from_value(value: &Value) -> Option<Self>;
    fn into_value(self) -> Value;
}

impl ParamValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_string())
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl ParamValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_bool(s),
            Value::Int(v) => Some(*v != 0),
            Value::UnsignedInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl ParamValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl ParamValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl ParamValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            Value::UnsignedInt(v) => i64::try_from(*v).ok(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl ParamValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| i32::try_from(v).ok())
    }

    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl ParamValue for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UnsignedInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::UnsignedInt(self)
    }
}

impl ParamValue for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        u64::from_value(value).and_then(|v| u32::try_from(v).ok())
    }

    fn into_value(self) -> Value {
        Value::UnsignedInt(u64::from(self))
    }
}

impl ParamValue for Vector3<f64> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Vector3(v) => Some(*v),
            Value::String(s) => parse_vector3(s),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Vector3(self)
    }
}

impl ParamValue for Pose {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Pose(p) => Some(*p),
            Value::String(s) => parse_pose_string(s),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Pose(self)
    }
}

/// A named, typed slot with a default and a current value
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    key: String,
    ty: ParamType,
    default: Value,
    value: Value,
    required: bool,
    set: bool,
    description: String,
}

impl Param {
    /// Create a slot; the default text must parse as `ty`
    pub fn new(
        key: &str,
        ty: ParamType,
        default: &str,
        required: bool,
        description: &str,
    ) -> Result<Self, ParamError> {
        let default_value = if default.trim().is_empty() && ty != ParamType::String {
            Value::zero(ty)
        } else {
            Value::parse(ty, default).ok_or_else(|| ParamError::InvalidValue {
                key: key.to_string(),
                ty,
                value: default.to_string(),
            })?
        };
        Ok(Self {
            key: key.to_string(),
            ty,
            value: default_value.clone(),
            default: default_value,
            required,
            set: false,
            description: description.to_string(),
        })
    }

    /// A string slot already holding `value`
    pub fn string(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            ty: ParamType::String,
            default: Value::String(String::new()),
            value: Value::String(value.to_string()),
            required: false,
            set: true,
            description: String::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ty(&self) -> ParamType {
        self.ty
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn get<T: ParamValue>(&self) -> Option<T> {
        T::from_value(&self.value)
    }

    /// Store a typed value, converting it to the declared type
    pub fn set<T: ParamValue>(&mut self, value: T) -> Result<(), ParamError> {
        let value = value.into_value();
        if value.ty() == self.ty {
            self.value = value;
            self.set = true;
            Ok(())
        } else {
            self.set_from_str(&value.to_string())
        }
    }

    pub fn set_from_str(&mut self, text: &str) -> Result<(), ParamError> {
        let value = Value::parse(self.ty, text).ok_or_else(|| ParamError::InvalidValue {
            key: self.key.clone(),
            ty: self.ty,
            value: text.to_string(),
        })?;
        self.value = value;
        self.set = true;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
        self.set = false;
    }

    pub fn as_string(&self) -> String {
        self.value.to_string()
    }

    pub fn default_as_string(&self) -> String {
        self.default.to_string()
    }
}
