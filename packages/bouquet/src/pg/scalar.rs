use std::fmt;

use serde_json::Value;

/// A value that can be stored in a Postgres session setting.
///
/// Numbers and booleans keep their native type so callers can tell `0` from `"0"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    /// Converts an arbitrary JSON value the way session settings expect it:
    /// `null` becomes `''`, objects and arrays become their compact JSON text,
    /// everything else keeps its type.
    pub fn sanitize(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Text(String::new()),
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Scalar::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Scalar::Text(value.to_string()),
        }
    }

    /// Text form as Postgres reports it back through `current_setting`.
    pub fn to_setting_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Insertion-ordered mapping from setting name to value.
///
/// Re-inserting an existing name replaces its value but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsMap {
    entries: Vec<(String, Scalar)>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn extend(&mut self, other: &SettingsMap) {
        for (name, value) in other.iter() {
            self.insert(name.clone(), value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Scalar)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<(String, Scalar)> {
        self.entries
    }
}

impl<K, V> FromIterator<(K, V)> for SettingsMap
where
    K: Into<String>,
    V: Into<Scalar>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = SettingsMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
