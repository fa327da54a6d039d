//! Host value coercion
//!
//! [`TypeConverter`] turns a host value into the form a native parameter
//! expects, rejecting lossy conversions. Integer bounds follow the native
//! width of the raw type.

use crate::types::{strip_qualifiers, HostType, TypeMapper};
use crate::params::normalize_type;
use ffiwrap_core::Value;
use thiserror::Error;

/// A value could not be converted to the requested native type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    pub message: String,
}

impl ConversionError {
    /// Create a new conversion error
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self { message: message.into() }
    }
}

/// Bit width and signedness of a native integer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntegerWidth {
    /// Width of a raw native integer type, if it is one
    pub fn of(raw_type: &str) -> Option<Self> {
        let normalized = strip_qualifiers(&normalize_type(raw_type));
        let width = match normalized.as_str() {
            "char" | "signed char" | "int8_t" | "int_fast8_t" | "int_least8_t" => IntegerWidth::I8,
            "unsigned char" | "uint8_t" | "uint_fast8_t" | "uint_least8_t" => IntegerWidth::U8,
            "short" | "short int" | "signed short" | "int16_t" => IntegerWidth::I16,
            "unsigned short" | "unsigned short int" | "uint16_t" => IntegerWidth::U16,
            "int" | "signed" | "signed int" | "int32_t" | "wchar_t" => IntegerWidth::I32,
            "unsigned" | "unsigned int" | "uint32_t" => IntegerWidth::U32,
            "long" | "long int" | "signed long" | "long long" | "long long int" | "signed long long" | "int64_t"
            | "ssize_t" | "ptrdiff_t" | "intptr_t" | "off_t" => IntegerWidth::I64,
            "unsigned long" | "unsigned long int" | "unsigned long long" | "unsigned long long int" | "uint64_t"
            | "size_t" | "uintptr_t" => IntegerWidth::U64,
            _ => return None,
        };
        Some(width)
    }

    pub fn min(self) -> i128 {
        match self {
            IntegerWidth::I8 => i8::MIN as i128,
            IntegerWidth::I16 => i16::MIN as i128,
            IntegerWidth::I32 => i32::MIN as i128,
            IntegerWidth::I64 => i64::MIN as i128,
            IntegerWidth::U8 | IntegerWidth::U16 | IntegerWidth::U32 | IntegerWidth::U64 => 0,
        }
    }

    pub fn max(self) -> i128 {
        match self {
            IntegerWidth::I8 => i8::MAX as i128,
            IntegerWidth::U8 => u8::MAX as i128,
            IntegerWidth::I16 => i16::MAX as i128,
            IntegerWidth::U16 => u16::MAX as i128,
            IntegerWidth::I32 => i32::MAX as i128,
            IntegerWidth::U32 => u32::MAX as i128,
            IntegerWidth::I64 => i64::MAX as i128,
            IntegerWidth::U64 => u64::MAX as i128,
        }
    }

    /// Whether the bounds are narrower than a host integer
    pub fn is_narrower_than_host(self) -> bool {
        self.min() > i64::MIN as i128 || self.max() < i64::MAX as i128
    }
}

/// Converts host values to the form a native type expects
#[derive(Debug, Clone, Default)]
pub struct TypeConverter {
    mapper: TypeMapper,
}

impl TypeConverter {
    /// Create a new type converter
    pub fn new(mapper: TypeMapper) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    /// Convert `value` to the host type of `raw_type`, enforcing integer width
    pub fn convert(&self, value: &Value, raw_type: &str) -> Result<Value, ConversionError> {
        let converted = self.coerce(value, raw_type)?;
        if let (Value::Int(i), Some(width)) = (&converted, IntegerWidth::of(raw_type)) {
            check_width(*i, width, raw_type)?;
        }
        Ok(converted)
    }

    /// Convert `value` to the host type of `raw_type` without width checks
    pub fn coerce(&self, value: &Value, raw_type: &str) -> Result<Value, ConversionError> {
        let host = self.mapper.map_native_type_to_host(raw_type, false);
        self.coerce_to(value, &host, raw_type)
    }

    fn coerce_to(&self, value: &Value, host: &HostType, raw_type: &str) -> Result<Value, ConversionError> {
        match host {
            HostType::Mixed => Ok(value.clone()),
            HostType::Nullable(inner) => {
                if value.is_null() {
                    Ok(Value::Null)
                } else {
                    self.coerce_to(value, inner, raw_type)
                }
            }
            _ if value.is_null() => Err(ConversionError::new(format!(
                "Null given for non-nullable {}",
                raw_type
            ))),
            HostType::Int => to_int(value),
            HostType::Float => to_float(value),
            HostType::Bool => to_bool(value),
            HostType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Int(i) => Ok(Value::String(i.to_string())),
                Value::Float(f) => Ok(Value::String(f.to_string())),
                other => Err(mismatch(other, "string")),
            },
            HostType::Array(element) => self.to_array(value, element, raw_type),
            HostType::Handle(_) => match value {
                Value::Handle { .. } => Ok(value.clone()),
                other => Err(mismatch(other, "handle")),
            },
            HostType::Callable => match value {
                Value::String(_) | Value::Handle { .. } => Ok(value.clone()),
                other => Err(mismatch(other, "callable")),
            },
            HostType::Void => Err(ConversionError::new("Cannot pass a value for a void parameter")),
        }
    }

    fn to_array(&self, value: &Value, element: &HostType, raw_type: &str) -> Result<Value, ConversionError> {
        let Value::Array(items) = value else {
            return Err(mismatch(value, "array"));
        };

        if let Some(size) = fixed_size(raw_type) {
            if items.len() > size {
                return Err(ConversionError::new(format!(
                    "Array of {} elements exceeds fixed size {}",
                    items.len(),
                    size
                )));
            }
        }

        let element_raw = raw_type.split('[').next().unwrap_or(raw_type).trim();
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.coerce_to(item, element, element_raw)
                    .map_err(|e| ConversionError::new(format!("Element {}: {}", index, e.message)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

fn mismatch(value: &Value, expected: &str) -> ConversionError {
    ConversionError::new(format!("Cannot convert {} to {}", describe(value), expected))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Handle { .. } | Value::Null => value.type_name().to_string(),
        scalar => format!("{} {}", scalar.type_name(), scalar),
    }
}

fn to_int(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Int(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => float_to_int(*f).ok_or_else(|| mismatch(value, "int")),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(float_to_int)
                .ok_or_else(|| mismatch(value, "int"))
        }
        other => Err(mismatch(other, "int")),
    }
}

fn float_to_int(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::Int(f as i64))
    } else {
        None
    }
}

fn to_float(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Float(_) => Ok(value.clone()),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| mismatch(value, "float")),
        other => Err(mismatch(other, "float")),
    }
}

fn to_bool(value: &Value) -> Result<Value, ConversionError> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err(mismatch(value, "bool")),
        },
        other => Err(mismatch(other, "bool")),
    }
}

fn check_width(value: i64, width: IntegerWidth, raw_type: &str) -> Result<(), ConversionError> {
    let v = value as i128;
    if v < width.min() {
        return Err(ConversionError::new(format!(
            "Value {} is below minimum {} for {}",
            value,
            width.min(),
            raw_type
        )));
    }
    if v > width.max() {
        return Err(ConversionError::new(format!(
            "Value {} is above maximum {} for {}",
            value,
            width.max(),
            raw_type
        )));
    }
    Ok(())
}

fn fixed_size(raw_type: &str) -> Option<usize> {
    let open = raw_type.find('[')?;
    let close = raw_type[open..].find(']')? + open;
    raw_type[open + 1..close].trim().parse().ok()
}
