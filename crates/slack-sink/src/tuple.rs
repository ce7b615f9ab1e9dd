use std::collections::VecDeque;

use serde_json::Value as Json;
use thiserror::Error;

use crate::schema::{AttrType, Schema};

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("record is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("attribute {attribute} expects {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },
}

/// A single attribute value inside a [`Tuple`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Tuple(Tuple),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

/// One record from the upstream, positionally aligned with the input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Build a tuple from a JSON object, matching attributes by name.
    ///
    /// Absent attributes take the zero value of their type.
    pub fn from_json(schema: &Schema, json: &Json) -> Result<Self, RecordError> {
        let object = json.as_object().ok_or(RecordError::NotAnObject)?;
        let values = schema
            .attributes()
            .iter()
            .map(|attr| match object.get(&attr.name) {
                Some(v) if !v.is_null() => value_from_json(&attr.name, &attr.ty, v),
                _ => Ok(zero_value(&attr.ty)),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { values })
    }
}

fn value_from_json(name: &str, ty: &AttrType, json: &Json) -> Result<Value, RecordError> {
    let mismatch = || RecordError::TypeMismatch {
        attribute: name.to_owned(),
        expected: ty.to_string(),
        found: json.to_string(),
    };

    match ty {
        AttrType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        AttrType::Int8 => signed(json, i8::MIN.into(), i8::MAX.into()).ok_or_else(mismatch),
        AttrType::Int16 => signed(json, i16::MIN.into(), i16::MAX.into()).ok_or_else(mismatch),
        AttrType::Int32 => signed(json, i32::MIN.into(), i32::MAX.into()).ok_or_else(mismatch),
        AttrType::Int64 => signed(json, i64::MIN, i64::MAX).ok_or_else(mismatch),
        AttrType::UInt8 => unsigned(json, u8::MAX.into()).ok_or_else(mismatch),
        AttrType::UInt16 => unsigned(json, u16::MAX.into()).ok_or_else(mismatch),
        AttrType::UInt32 => unsigned(json, u32::MAX.into()).ok_or_else(mismatch),
        AttrType::UInt64 => unsigned(json, u64::MAX).ok_or_else(mismatch),
        AttrType::Float32 | AttrType::Float64 => json.as_f64().map(Value::Float).ok_or_else(mismatch),
        AttrType::RString | AttrType::UString => json
            .as_str()
            .map(|s| Value::String(s.to_owned()))
            .ok_or_else(mismatch),
        AttrType::List(inner) => json
            .as_array()
            .ok_or_else(mismatch)?
            .iter()
            .map(|item| value_from_json(name, inner, item))
            .collect::<Result<_, _>>()
            .map(Value::List),
        AttrType::Tuple(schema) => Tuple::from_json(schema, json).map(Value::Tuple),
    }
}

fn signed(json: &Json, min: i64, max: i64) -> Option<Value> {
    json.as_i64()
        .filter(|n| (min..=max).contains(n))
        .map(Value::Int)
}

fn unsigned(json: &Json, max: u64) -> Option<Value> {
    json.as_u64().filter(|n| *n <= max).map(Value::UInt)
}

fn zero_value(ty: &AttrType) -> Value {
    match ty {
        AttrType::Boolean => Value::Boolean(false),
        AttrType::Int8 | AttrType::Int16 | AttrType::Int32 | AttrType::Int64 => Value::Int(0),
        AttrType::UInt8 | AttrType::UInt16 | AttrType::UInt32 | AttrType::UInt64 => Value::UInt(0),
        AttrType::Float32 | AttrType::Float64 => Value::Float(0.0),
        AttrType::RString | AttrType::UString => Value::String(String::new()),
        AttrType::List(_) => Value::List(Vec::new()),
        AttrType::Tuple(schema) => Value::Tuple(Tuple::new(
            schema.attributes().iter().map(|a| zero_value(&a.ty)).collect(),
        )),
    }
}

/// Queue entry owned by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedTuple {
    tuple: Tuple,
}

impl BatchedTuple {
    pub fn new(tuple: Tuple) -> Self {
        Self { tuple }
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }
}

/// FIFO handed to the stage on every delivery. The stage only ever looks at
/// and removes the head; it never enqueues.
pub trait BatchQueue {
    fn peek(&self) -> Option<&BatchedTuple>;
    fn remove(&mut self) -> Option<BatchedTuple>;
}

impl BatchQueue for VecDeque<BatchedTuple> {
    fn peek(&self) -> Option<&BatchedTuple> {
        self.front()
    }

    fn remove(&mut self) -> Option<BatchedTuple> {
        self.pop_front()
    }
}
