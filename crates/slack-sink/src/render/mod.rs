use bytes::Bytes;
use serde_json::{Map, Number, Value as Json, json};
use thiserror::Error;

use crate::schema::{AttrType, Schema, SchemaError};
use crate::tuple::{Tuple, Value};

/// Attribute name that marks a tuple as carrying a ready-made JSON body.
pub const JSON_STRING_ATTRIBUTE: &str = "jsonString";

/// Slack message text field, both as attribute name and as JSON key.
pub const TEXT_ATTRIBUTE: &str = "text";

const USERNAME_FIELD: &str = "username";
const ICON_URL_FIELD: &str = "icon_url";

/// Input attributes whose values are copied into Slack's `text`, `username`
/// and `icon_url` fields when tuples are encoded field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFields {
    pub text: Option<String>,
    pub username: Option<String>,
    pub icon_url: Option<String>,
}

impl MessageFields {
    /// `(slack field, attribute)` for every mapping that is set.
    fn mappings(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (TEXT_ATTRIBUTE, &self.text),
            (USERNAME_FIELD, &self.username),
            (ICON_URL_FIELD, &self.icon_url),
        ]
        .into_iter()
        .filter_map(|(field, attr)| attr.as_deref().map(|attr| (field, attr)))
    }

    fn overrides_sender(&self) -> bool {
        self.username.is_some() || self.icon_url.is_some()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("tuple has no value for attribute {0}")]
    MissingAttribute(String),

    #[error("attribute {attribute} does not hold a {expected} value")]
    TypeMismatch { attribute: String, expected: String },

    #[error("JSON serialization failed: {0}")]
    Serialize(String),
}

/// How tuples are turned into web-hook bodies. Chosen once from the input
/// schema and never changed afterwards.
#[derive(Debug)]
pub enum RenderMode {
    /// Attribute 0 already holds the complete JSON body.
    JsonPassthrough,
    /// Attribute 0 becomes the `text` field of a one-field object.
    SingleStringAsText,
    /// Every attribute becomes a field of the same name.
    TupleToJson(TupleEncoder),
}

impl RenderMode {
    /// Pick the rendering mode for `schema`. First matching rule wins:
    ///
    /// 1. a single `jsonString` attribute of type rstring is passed through;
    /// 2. a single string attribute not named `text` is wrapped as `{"text": ...}`;
    /// 3. a schema with a string `text` attribute, or with a `fields.text`
    ///    mapping, is encoded field by field.
    ///
    /// Anything else is rejected with [`SchemaError::MissingTextAttribute`].
    /// Rules 1 and 2 are skipped when `fields` overrides the username or icon,
    /// and every mapped attribute must exist in `schema` as a string.
    pub fn classify(schema: &Schema, fields: &MessageFields) -> Result<Self, SchemaError> {
        for (field, attr) in fields.mappings() {
            if !is_string_attribute(schema, attr) {
                return Err(SchemaError::UnmappableAttribute {
                    field: field.to_owned(),
                    attribute: attr.to_owned(),
                });
            }
        }

        if let [only] = schema.attributes()
            && !fields.overrides_sender()
        {
            if only.name == JSON_STRING_ATTRIBUTE && only.ty == AttrType::RString {
                return Ok(RenderMode::JsonPassthrough);
            }
            if only.name != TEXT_ATTRIBUTE && only.ty.is_string() {
                return Ok(RenderMode::SingleStringAsText);
            }
        }

        if fields.text.is_some() || is_string_attribute(schema, TEXT_ATTRIBUTE) {
            Ok(RenderMode::TupleToJson(TupleEncoder::new(
                schema.clone(),
                fields.clone(),
            )))
        } else {
            Err(SchemaError::MissingTextAttribute)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RenderMode::JsonPassthrough => "json_passthrough",
            RenderMode::SingleStringAsText => "single_string_as_text",
            RenderMode::TupleToJson(_) => "tuple_to_json",
        }
    }

    /// Render `tuple` as a UTF-8 JSON body.
    pub fn render(&self, tuple: &Tuple) -> Result<Bytes, RenderError> {
        match self {
            RenderMode::JsonPassthrough => {
                let body = first_string(tuple, JSON_STRING_ATTRIBUTE)?;
                Ok(Bytes::copy_from_slice(body.as_bytes()))
            }
            RenderMode::SingleStringAsText => {
                let text = first_string(tuple, TEXT_ATTRIBUTE)?;
                to_bytes(&json!({ TEXT_ATTRIBUTE: text }))
            }
            RenderMode::TupleToJson(encoder) => to_bytes(&Json::Object(encoder.encode(tuple)?)),
        }
    }
}

fn is_string_attribute(schema: &Schema, name: &str) -> bool {
    schema
        .position(name)
        .and_then(|i| schema.attribute(i))
        .is_some_and(|a| a.ty.is_string())
}

fn first_string<'t>(tuple: &'t Tuple, label: &str) -> Result<&'t str, RenderError> {
    match tuple.get(0) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(RenderError::TypeMismatch {
            attribute: label.to_owned(),
            expected: "string".to_owned(),
        }),
        None => Err(RenderError::MissingAttribute(label.to_owned())),
    }
}

fn to_bytes(json: &Json) -> Result<Bytes, RenderError> {
    serde_json::to_vec(json)
        .map(Bytes::from)
        .map_err(|e| RenderError::Serialize(e.to_string()))
}

/// Encodes tuples of one schema as JSON objects keyed by attribute name,
/// then copies mapped attributes into the Slack message fields.
#[derive(Debug)]
pub struct TupleEncoder {
    schema: Schema,
    fields: MessageFields,
}

impl TupleEncoder {
    pub fn new(schema: Schema, fields: MessageFields) -> Self {
        Self { schema, fields }
    }

    pub fn encode(&self, tuple: &Tuple) -> Result<Map<String, Json>, RenderError> {
        let mut object = encode_tuple(&self.schema, tuple)?;
        for (field, attr) in self.fields.mappings() {
            if let Some(value) = object.get(attr).cloned() {
                object.insert(field.to_owned(), value);
            }
        }
        Ok(object)
    }
}

fn encode_tuple(schema: &Schema, tuple: &Tuple) -> Result<Map<String, Json>, RenderError> {
    let values = tuple.values();
    if let Some(missing) = schema.attributes().get(values.len()) {
        return Err(RenderError::MissingAttribute(missing.name.clone()));
    }
    let mut object = Map::with_capacity(schema.len());
    for (attr, value) in schema.attributes().iter().zip(values) {
        object.insert(attr.name.clone(), encode_value(&attr.name, &attr.ty, value)?);
    }
    Ok(object)
}

fn encode_value(name: &str, ty: &AttrType, value: &Value) -> Result<Json, RenderError> {
    let json = match (ty, value) {
        (AttrType::Boolean, Value::Boolean(b)) => Json::Bool(*b),
        (
            AttrType::Int8 | AttrType::Int16 | AttrType::Int32 | AttrType::Int64,
            Value::Int(n),
        ) => Json::from(*n),
        (
            AttrType::UInt8 | AttrType::UInt16 | AttrType::UInt32 | AttrType::UInt64,
            Value::UInt(n),
        ) => Json::from(*n),
        // JSON has no NaN or infinity
        (AttrType::Float32 | AttrType::Float64, Value::Float(f)) => {
            Number::from_f64(*f).map_or(Json::Null, Json::Number)
        }
        (AttrType::RString | AttrType::UString, Value::String(s)) => Json::String(s.clone()),
        (AttrType::List(inner), Value::List(items)) => Json::Array(
            items
                .iter()
                .map(|item| encode_value(name, inner, item))
                .collect::<Result<_, _>>()?,
        ),
        (AttrType::Tuple(schema), Value::Tuple(nested)) => {
            Json::Object(encode_tuple(schema, nested)?)
        }
        _ => {
            return Err(RenderError::TypeMismatch {
                attribute: name.to_owned(),
                expected: ty.to_string(),
            });
        }
    };
    Ok(json)
}
