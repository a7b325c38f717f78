use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::Table;

/// Ordered key -> JSON value map collecting the results of a run.
///
/// Keys are free-form but usually dotted (`load.rows`, `load.seconds`) so
/// [`ExecutionReport::category`] can pick out a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionReport {
    entries: IndexMap<String, Value>,
}

impl ExecutionReport {
    pub fn new() -> Self {
        ExecutionReport::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Deserializes the entry into `T`; `None` when it is missing or has
    /// another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Entries whose key matches `pattern` as a whole.
    pub fn search(&self, pattern: &str) -> Result<ExecutionReport, regex::Error> {
        let pattern = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| pattern.is_match(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    /// `name` itself and every key below it (`name.*`).
    pub fn category(&self, name: &str) -> ExecutionReport {
        let prefix = format!("{name}.");
        self.entries
            .iter()
            .filter(|(key, _)| key.as_str() == name || key.starts_with(&prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Copies every entry of `other` in; `other` wins on shared keys.
    pub fn merge(&mut self, other: &ExecutionReport) -> &mut Self {
        self.extend(
            other
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        self
    }

    pub fn sorted_by<F>(&self, mut compare: F) -> ExecutionReport
    where
        F: FnMut(&str, &str) -> Ordering,
    {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, _, b, _| compare(a.as_str(), b.as_str()));
        ExecutionReport { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The report as a `key | value` table.
    pub fn to_table(&self) -> Table<String, String, String> {
        let mut table = Table::new("key");
        for (key, value) in &self.entries {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            table.push(key.clone(), "value".to_string(), text);
        }
        table
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ExecutionReport {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        ExecutionReport {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }
}

impl<K: Into<String>> Extend<(K, Value)> for ExecutionReport {
    fn extend<I: IntoIterator<Item = (K, Value)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.entries.insert(key.into(), value);
        }
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_table(), f)
    }
}
