//! Raw document values and the structured-document parser/serializer.
//!
//! Every parsed document is converted once into [`RawValue`], so the rest of
//! the engine never inspects format-specific value types.

use std::hash::{Hash, Hasher};
use std::path::Path;

use indexmap::{Equivalent, IndexMap};
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::error::DocumentError;

/// A leaf value or mapping key.
///
/// Floats compare and hash by their bit pattern so that any scalar can key a
/// [`Mapping`].
#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Unsigned(a), Scalar::Unsigned(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

const STRING_DISCRIMINANT: u8 = 5;

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Scalar::Null => 0u8.hash(state),
            Scalar::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Scalar::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Scalar::Unsigned(u) => {
                3u8.hash(state);
                u.hash(state);
            }
            Scalar::Float(f) => {
                4u8.hash(state);
                f.to_bits().hash(state);
            }
            Scalar::String(s) => {
                STRING_DISCRIMINANT.hash(state);
                s.as_str().hash(state);
            }
        }
    }
}

/// Borrowed lookup key matching `Scalar::String` without allocating.
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        STRING_DISCRIMINANT.hash(state);
        self.0.hash(state);
    }
}

impl Equivalent<Scalar> for StrKey<'_> {
    fn equivalent(&self, key: &Scalar) -> bool {
        key.as_str() == Some(self.0)
    }
}

/// An unresolved value as parsed from a source document.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Vec<RawValue>),
}

impl RawValue {
    pub fn string(s: impl Into<String>) -> Self {
        RawValue::Scalar(Scalar::String(s.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            RawValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Scalar(Scalar::Null))
    }
}

impl From<Scalar> for RawValue {
    fn from(scalar: Scalar) -> Self {
        RawValue::Scalar(scalar)
    }
}

/// Insertion-ordered mapping. Keys are scalars so that non-string keys
/// survive parsing and can be detected later.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: IndexMap<Scalar, RawValue>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a string key.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.entries.get(&StrKey(key))
    }

    pub fn get_mut(&mut self, key: &Scalar) -> Option<&mut RawValue> {
        self.entries.get_mut(key)
    }

    /// Inserts a value, replacing any existing entry with the same key in place.
    pub fn insert(&mut self, key: Scalar, value: RawValue) {
        self.entries.insert(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Scalar, &RawValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Order matters: two mappings with the same entries in another order
// serialize differently.
impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl IntoIterator for Mapping {
    type Item = (Scalar, RawValue);
    type IntoIter = indexmap::map::IntoIter<Scalar, RawValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Scalar, RawValue)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (Scalar, RawValue)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Unsigned(u) => serializer.serialize_u64(*u),
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for RawValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Scalar(s) => s.serialize(serializer),
            RawValue::Mapping(m) => m.serialize(serializer),
            RawValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

const TEMPLATE_SUFFIXES: [&str; 2] = ["tpl", "tmpl"];

/// Grammar of a structured document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Yaml,
    Toml,
}

impl Format {
    /// Infers the format from a file extension; anything but `.toml` is YAML.
    ///
    /// A template suffix (`.tpl`, `.tmpl`) is skipped, so `app.toml.tpl` is TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut ext = path.extension().and_then(|e| e.to_str());
        if ext.is_some_and(|e| TEMPLATE_SUFFIXES.iter().any(|s| e.eq_ignore_ascii_case(s))) {
            ext = path
                .file_stem()
                .map(Path::new)
                .and_then(Path::extension)
                .and_then(|e| e.to_str());
        }

        match ext {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Yaml,
        }
    }

    /// Parses a document whose root must be a mapping.
    ///
    /// An empty YAML document parses as an empty mapping.
    pub fn parse(self, text: &str) -> Result<Mapping, DocumentError> {
        match self {
            Format::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(text)?;
                match from_yaml(value)? {
                    RawValue::Mapping(m) => Ok(m),
                    RawValue::Scalar(Scalar::Null) => Ok(Mapping::new()),
                    _ => Err(DocumentError::NotAMapping),
                }
            }
            Format::Toml => {
                let table: toml::Table = toml::from_str(text)?;
                Ok(from_toml_table(table))
            }
        }
    }

    /// Serializes a value back into this grammar.
    ///
    /// Output is deterministic: mapping entries keep their parsed order.
    pub fn serialize(self, value: &RawValue) -> Result<String, DocumentError> {
        match self {
            Format::Yaml => Ok(serde_yaml::to_string(value)?),
            // TOML documents must be tables; anything else is rendered inline.
            Format::Toml => match value {
                RawValue::Mapping(m) => Ok(toml::to_string(m)?),
                other => Ok(toml::Value::try_from(other)?.to_string()),
            },
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self, text: &str) -> Result<T, DocumentError> {
        match self {
            Format::Yaml => Ok(serde_yaml::from_str(text)?),
            Format::Toml => Ok(toml::from_str(text)?),
        }
    }
}

fn from_yaml(value: serde_yaml::Value) -> Result<RawValue, DocumentError> {
    use serde_yaml::Value;

    let raw = match value {
        Value::Null => RawValue::Scalar(Scalar::Null),
        Value::Bool(b) => RawValue::Scalar(Scalar::Bool(b)),
        Value::Number(n) => RawValue::Scalar(yaml_number(&n)),
        Value::String(s) => RawValue::Scalar(Scalar::String(s)),
        Value::Sequence(items) => RawValue::Sequence(
            items
                .into_iter()
                .map(from_yaml)
                .collect::<Result<_, _>>()?,
        ),
        Value::Mapping(m) => {
            let mut mapping = Mapping::new();
            for (k, v) in m {
                mapping.insert(yaml_key(k)?, from_yaml(v)?);
            }
            RawValue::Mapping(mapping)
        }
        Value::Tagged(tagged) => from_yaml(tagged.value)?,
    };
    Ok(raw)
}

fn yaml_number(n: &serde_yaml::Number) -> Scalar {
    if let Some(i) = n.as_i64() {
        Scalar::Integer(i)
    } else if let Some(u) = n.as_u64() {
        Scalar::Unsigned(u)
    } else {
        Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn yaml_key(key: serde_yaml::Value) -> Result<Scalar, DocumentError> {
    match from_yaml(key)? {
        RawValue::Scalar(s) => Ok(s),
        // Complex keys are kept as their text; they can never be variant tags.
        complex => Ok(Scalar::String(
            serde_yaml::to_string(&complex)?.trim().to_string(),
        )),
    }
}

fn from_toml(value: toml::Value) -> RawValue {
    use toml::Value;

    match value {
        Value::String(s) => RawValue::Scalar(Scalar::String(s)),
        Value::Integer(i) => RawValue::Scalar(Scalar::Integer(i)),
        Value::Float(f) => RawValue::Scalar(Scalar::Float(f)),
        Value::Boolean(b) => RawValue::Scalar(Scalar::Bool(b)),
        Value::Datetime(dt) => RawValue::Scalar(Scalar::String(dt.to_string())),
        Value::Array(items) => RawValue::Sequence(items.into_iter().map(from_toml).collect()),
        Value::Table(t) => RawValue::Mapping(from_toml_table(t)),
    }
}

fn from_toml_table(table: toml::Table) -> Mapping {
    table
        .into_iter()
        .map(|(k, v)| (Scalar::String(k), from_toml(v)))
        .collect()
}
