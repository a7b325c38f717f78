use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ParseError, UnsupportedTypeError};

/// A type that can be read back from the text it renders with `Display`.
///
/// This is the extension point for cell types: anything implementing it can
/// be used as a row key, column key or value when loading a table from text.
pub trait Parsable: Sized + fmt::Display {
    /// Tag naming the type in parser registries and error messages.
    const TYPE_TAG: &'static str;

    fn parse_text(text: &str) -> Result<Self, ParseError>;
}

impl Parsable for i32 {
    const TYPE_TAG: &'static str = "int";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        text.parse().map_err(|err| ParseError::new(Self::TYPE_TAG, text, err))
    }
}

impl Parsable for i64 {
    const TYPE_TAG: &'static str = "long";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        text.parse().map_err(|err| ParseError::new(Self::TYPE_TAG, text, err))
    }
}

impl Parsable for f64 {
    const TYPE_TAG: &'static str = "double";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        text.parse().map_err(|err| ParseError::new(Self::TYPE_TAG, text, err))
    }
}

impl Parsable for String {
    const TYPE_TAG: &'static str = "string";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        Ok(text.to_string())
    }
}

/// A JSON object cell, rendered as compact JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonObject(pub Map<String, Value>);

/// A JSON array cell, rendered as compact JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonArray(pub Vec<Value>);

impl Parsable for JsonObject {
    const TYPE_TAG: &'static str = "json-object";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        serde_json::from_str(text)
            .map(JsonObject)
            .map_err(|err| ParseError::new(Self::TYPE_TAG, text, err))
    }
}

impl Parsable for JsonArray {
    const TYPE_TAG: &'static str = "json-array";

    fn parse_text(text: &str) -> Result<Self, ParseError> {
        serde_json::from_str(text)
            .map(JsonArray)
            .map_err(|err| ParseError::new(Self::TYPE_TAG, text, err))
    }
}

impl fmt::Display for JsonObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl fmt::Display for JsonArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

// Object equality ignores key order, so hashing visits keys sorted.
impl Hash for JsonObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_object(&self.0, state)
    }
}

impl Hash for JsonArray {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_array(&self.0, state)
    }
}

fn hash_object<H: Hasher>(map: &Map<String, Value>, state: &mut H) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries.len().hash(state);
    for (key, value) in entries {
        key.hash(state);
        hash_value(value, state);
    }
}

fn hash_array<H: Hasher>(items: &[Value], state: &mut H) {
    items.len().hash(state);
    for item in items {
        hash_value(item, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => match n.as_f64().filter(|_| n.is_f64()) {
            // 0.0 and -0.0 compare equal
            Some(f) if f == 0.0 => 0.0f64.to_bits().hash(state),
            Some(f) => f.to_bits().hash(state),
            None => n.to_string().hash(state),
        },
        Value::String(text) => text.hash(state),
        Value::Array(items) => hash_array(items, state),
        Value::Object(map) => hash_object(map, state),
    }
}

// JSON cells serialize as their compact text.
macro_rules! serde_as_text {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                <$ty>::parse_text(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_as_text!(JsonObject);
serde_as_text!(JsonArray);

pub type ParseFn<T> = Arc<dyn Fn(&str) -> Result<T, ParseError> + Send + Sync>;

/// A named text -> value conversion.
pub struct TypedParser<T> {
    type_tag: String,
    parse: ParseFn<T>,
}

impl<T> TypedParser<T> {
    pub fn new<F>(type_tag: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> Result<T, ParseError> + Send + Sync + 'static,
    {
        TypedParser {
            type_tag: type_tag.into(),
            parse: Arc::new(parse),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn parse(&self, text: &str) -> Result<T, ParseError> {
        (self.parse)(text)
    }
}

impl<T: Parsable + 'static> TypedParser<T> {
    /// The type's own `Parsable` implementation.
    pub fn parsable() -> Self {
        TypedParser::new(T::TYPE_TAG, T::parse_text)
    }
}

impl<T> Clone for TypedParser<T> {
    fn clone(&self) -> Self {
        TypedParser {
            type_tag: self.type_tag.clone(),
            parse: Arc::clone(&self.parse),
        }
    }
}

impl<T> fmt::Debug for TypedParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedParser")
            .field("type_tag", &self.type_tag)
            .finish()
    }
}

/// Parsers for the three axes of a table, chosen when a codec is built.
pub struct TableParsers<R, C, V> {
    pub row: TypedParser<R>,
    pub column: TypedParser<C>,
    pub value: TypedParser<V>,
}

impl<R, C, V> TableParsers<R, C, V> {
    pub fn new(row: TypedParser<R>, column: TypedParser<C>, value: TypedParser<V>) -> Self {
        TableParsers { row, column, value }
    }
}

impl<R, C, V> TableParsers<R, C, V>
where
    R: Parsable + 'static,
    C: Parsable + 'static,
    V: Parsable + 'static,
{
    pub fn parsable() -> Self {
        TableParsers::new(
            TypedParser::parsable(),
            TypedParser::parsable(),
            TypedParser::parsable(),
        )
    }
}

impl<R, C, V> fmt::Debug for TableParsers<R, C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableParsers")
            .field("row", &self.row)
            .field("column", &self.column)
            .field("value", &self.value)
            .finish()
    }
}

impl<R, C, V> Clone for TableParsers<R, C, V> {
    fn clone(&self) -> Self {
        TableParsers {
            row: self.row.clone(),
            column: self.column.clone(),
            value: self.value.clone(),
        }
    }
}

/// A dynamically typed cell, for tables whose types are picked at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cell {
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Object(JsonObject),
    Array(JsonArray),
    /// A value of a registered `Parsable` type, kept in its normalized text.
    Custom { tag: String, text: String },
}

impl Cell {
    pub fn type_tag(&self) -> &str {
        match self {
            Cell::Int(_) => i32::TYPE_TAG,
            Cell::Long(_) => i64::TYPE_TAG,
            Cell::Double(_) => f64::TYPE_TAG,
            Cell::Text(_) => String::TYPE_TAG,
            Cell::Object(_) => JsonObject::TYPE_TAG,
            Cell::Array(_) => JsonArray::TYPE_TAG,
            Cell::Custom { tag, .. } => tag,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Long(v) => write!(f, "{v}"),
            Cell::Double(v) => write!(f, "{v}"),
            Cell::Text(v) => f.write_str(v),
            Cell::Object(v) => write!(f, "{v}"),
            Cell::Array(v) => write!(f, "{v}"),
            Cell::Custom { text, .. } => f.write_str(text),
        }
    }
}

// Doubles compare by bit pattern so cells can serve as map keys.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Long(a), Cell::Long(b)) => a == b,
            (Cell::Double(a), Cell::Double(b)) => a.to_bits() == b.to_bits(),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Object(a), Cell::Object(b)) => a == b,
            (Cell::Array(a), Cell::Array(b)) => a == b,
            (
                Cell::Custom { tag: ta, text: a },
                Cell::Custom { tag: tb, text: b },
            ) => ta == tb && a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Int(v) => v.hash(state),
            Cell::Long(v) => v.hash(state),
            Cell::Double(v) => v.to_bits().hash(state),
            Cell::Text(v) => v.hash(state),
            Cell::Object(v) => v.hash(state),
            Cell::Array(v) => v.hash(state),
            Cell::Custom { tag, text } => {
                tag.hash(state);
                text.hash(state);
            }
        }
    }
}

/// Type tag -> cell parser lookup for runtime-selected column types.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, ParseFn<Cell>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        ParserRegistry {
            parsers: HashMap::new(),
        }
    }

    /// `int`, `long`, `double`, `string`, `json-object` and `json-array`.
    pub fn builtin() -> Self {
        let mut registry = ParserRegistry::empty();
        registry
            .register(i32::TYPE_TAG, |text| i32::parse_text(text).map(Cell::Int))
            .register(i64::TYPE_TAG, |text| i64::parse_text(text).map(Cell::Long))
            .register(f64::TYPE_TAG, |text| f64::parse_text(text).map(Cell::Double))
            .register(String::TYPE_TAG, |text| Ok(Cell::Text(text.to_string())))
            .register(JsonObject::TYPE_TAG, |text| {
                JsonObject::parse_text(text).map(Cell::Object)
            })
            .register(JsonArray::TYPE_TAG, |text| {
                JsonArray::parse_text(text).map(Cell::Array)
            });
        registry
    }

    pub fn register<F>(&mut self, type_tag: impl Into<String>, parse: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Cell, ParseError> + Send + Sync + 'static,
    {
        self.parsers.insert(type_tag.into(), Arc::new(parse));
        self
    }

    /// Registers `T` under its own tag; parsed values are stored as
    /// [`Cell::Custom`] holding the value's rendered text.
    pub fn register_parsable<T: Parsable + 'static>(&mut self) -> &mut Self {
        self.register(T::TYPE_TAG, |text| {
            let value = T::parse_text(text)?;
            Ok(Cell::Custom {
                tag: T::TYPE_TAG.to_string(),
                text: value.to_string(),
            })
        })
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.parsers.contains_key(type_tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn parser(&self, type_tag: &str) -> Result<TypedParser<Cell>, UnsupportedTypeError> {
        self.parsers
            .get(type_tag)
            .map(|parse| TypedParser {
                type_tag: type_tag.to_string(),
                parse: Arc::clone(parse),
            })
            .ok_or_else(|| UnsupportedTypeError {
                type_tag: type_tag.to_string(),
            })
    }

    pub fn table_parsers(
        &self,
        row: &str,
        column: &str,
        value: &str,
    ) -> Result<TableParsers<Cell, Cell, Cell>, UnsupportedTypeError> {
        Ok(TableParsers::new(
            self.parser(row)?,
            self.parser(column)?,
            self.parser(value)?,
        ))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry::builtin()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
