use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("schema has no attributes")]
    Empty,

    #[error("attribute definition {0:?} is not of the form name:type")]
    MalformedAttribute(String),

    #[error("attribute name is empty in {0:?}")]
    EmptyName(String),

    #[error("duplicate attribute name: {0}")]
    DuplicateName(String),

    #[error("unknown attribute type: {0}")]
    UnknownType(String),

    #[error("unbalanced brackets in {0:?}")]
    Unbalanced(String),

    #[error("schema requires an attribute named 'text' of type rstring or ustring")]
    MissingTextAttribute,

    #[error("{field} is mapped to {attribute:?}, which is not a string attribute of the schema")]
    UnmappableAttribute { field: String, attribute: String },
}

/// Primitive and composite attribute types understood by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Short string.
    RString,
    /// Wide string.
    UString,
    List(Box<AttrType>),
    Tuple(Schema),
}

impl AttrType {
    pub fn is_string(&self) -> bool {
        matches!(self, AttrType::RString | AttrType::UString)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Boolean => write!(f, "boolean"),
            AttrType::Int8 => write!(f, "int8"),
            AttrType::Int16 => write!(f, "int16"),
            AttrType::Int32 => write!(f, "int32"),
            AttrType::Int64 => write!(f, "int64"),
            AttrType::UInt8 => write!(f, "uint8"),
            AttrType::UInt16 => write!(f, "uint16"),
            AttrType::UInt32 => write!(f, "uint32"),
            AttrType::UInt64 => write!(f, "uint64"),
            AttrType::Float32 => write!(f, "float32"),
            AttrType::Float64 => write!(f, "float64"),
            AttrType::RString => write!(f, "rstring"),
            AttrType::UString => write!(f, "ustring"),
            AttrType::List(inner) => write!(f, "list<{inner}>"),
            AttrType::Tuple(schema) => write!(f, "tuple<{schema}>"),
        }
    }
}

impl FromStr for AttrType {
    type Err = SchemaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(inner) = bracketed(raw, "list")? {
            return Ok(AttrType::List(Box::new(inner.parse()?)));
        }
        if let Some(inner) = bracketed(raw, "tuple")? {
            return Ok(AttrType::Tuple(inner.parse()?));
        }
        match raw {
            "boolean" => Ok(AttrType::Boolean),
            "int8" => Ok(AttrType::Int8),
            "int16" => Ok(AttrType::Int16),
            "int32" => Ok(AttrType::Int32),
            "int64" => Ok(AttrType::Int64),
            "uint8" => Ok(AttrType::UInt8),
            "uint16" => Ok(AttrType::UInt16),
            "uint32" => Ok(AttrType::UInt32),
            "uint64" => Ok(AttrType::UInt64),
            "float32" => Ok(AttrType::Float32),
            "float64" => Ok(AttrType::Float64),
            "rstring" => Ok(AttrType::RString),
            "ustring" => Ok(AttrType::UString),
            other => Err(SchemaError::UnknownType(other.to_owned())),
        }
    }
}

/// Returns the text between `<` and the final `>` when `raw` starts with `keyword<`.
fn bracketed<'a>(raw: &'a str, keyword: &str) -> Result<Option<&'a str>, SchemaError> {
    let Some(rest) = raw.strip_prefix(keyword).and_then(|r| r.strip_prefix('<')) else {
        return Ok(None);
    };
    rest.strip_suffix('>')
        .map(Some)
        .ok_or_else(|| SchemaError::Unbalanced(raw.to_owned()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: AttrType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttrType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered attribute list describing every tuple on the input port.
///
/// Fixed for the lifetime of a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Result<Self, SchemaError> {
        if attributes.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (i, attr) in attributes.iter().enumerate() {
            if attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(SchemaError::DuplicateName(attr.name.clone()));
            }
        }
        Ok(Self { attributes })
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", attr.name, attr.ty)?;
        }
        Ok(())
    }
}

impl FromStr for Schema {
    type Err = SchemaError;

    /// Parses `name:type` pairs separated by top-level commas,
    /// e.g. `text:rstring,tags:list<rstring>,origin:tuple<host:rstring,pid:int32>`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut attributes = Vec::new();
        for part in split_top_level(raw)? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, ty) = part
                .split_once(':')
                .ok_or_else(|| SchemaError::MalformedAttribute(part.to_owned()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(SchemaError::EmptyName(part.to_owned()));
            }
            attributes.push(Attribute::new(name, ty.parse()?));
        }
        Self::new(attributes)
    }
}

fn split_top_level(raw: &str) -> Result<Vec<&str>, SchemaError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SchemaError::Unbalanced(raw.to_owned()))?;
            }
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SchemaError::Unbalanced(raw.to_owned()));
    }
    parts.push(&raw[start..]);
    Ok(parts)
}
