// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::schema::{MergePolicy, StateSchema};

/// Channel name to value
pub type Values = Map<String, Value>;

/// The partial set of channel writes produced by one node invocation.
///
/// Writes are applied in insertion order. Channels the delta does not
/// mention are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    writes: Vec<(String, Value)>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write (builder style)
    pub fn set(mut self, channel: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(channel, value);
        self
    }

    pub fn insert(&mut self, channel: impl Into<String>, value: impl Into<Value>) {
        self.writes.push((channel.into(), value.into()));
    }

    /// Append all writes of `other` after ours
    pub fn extend(&mut self, other: StateDelta) {
        self.writes.extend(other.writes);
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.writes
            .iter()
            .rev()
            .find(|(k, _)| k == channel)
            .map(|(_, v)| v)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StateDelta {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            writes: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl IntoIterator for StateDelta {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Immutable view of the state at the moment a node or router executes
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    values: Arc<Values>,
}

impl Snapshot {
    pub fn new(values: Values) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a nested value using dot notation (e.g., "video_results.query")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        get_path(&self.values, path)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Items of an array channel; empty when absent or not an array
    pub fn items(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[])
    }

    /// String items of an array channel, skipping non-strings
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.items(key)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.as_ref().clone())
    }
}

/// Runtime workflow state with per-channel merge policies
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    /// Current channel values
    values: Values,
    /// Merge policy for each declared channel
    policies: HashMap<String, MergePolicy>,
}

impl StateStore {
    /// Create a store from a schema: defaults first, then the run input on top.
    ///
    /// Input values initialize channels verbatim rather than going through
    /// the merge policy, so an append channel can be seeded with a sequence.
    pub fn new(schema: &StateSchema, input: Values) -> Self {
        let mut values = Values::new();
        let mut policies = HashMap::new();

        for (name, def) in &schema.channels {
            if let Some(default) = &def.default {
                values.insert(name.clone(), default.clone());
            }
            policies.insert(name.clone(), def.reducer);
        }

        for (name, value) in input {
            if policies.get(&name) == Some(&MergePolicy::Append) && !value.is_array() {
                values.insert(name, Value::Array(vec![value]));
            } else {
                values.insert(name, value);
            }
        }

        Self { values, policies }
    }

    /// Create an empty store where every channel is last-writer-wins
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn policy(&self, key: &str) -> MergePolicy {
        self.policies
            .get(key)
            .copied()
            .unwrap_or(MergePolicy::Replace)
    }

    /// Full snapshot of every channel
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.values.clone())
    }

    /// Snapshot restricted to `channels`
    pub fn read<S: AsRef<str>>(&self, channels: &[S]) -> Snapshot {
        let values = channels
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.values.get(name).map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        Snapshot::new(values)
    }

    /// Merge a delta into state. This is the only mutator of the store.
    pub fn merge(&mut self, delta: StateDelta) {
        for (key, value) in delta {
            self.update(&key, value);
        }
    }

    /// Merge deltas from one barrier in ascending index order, whatever
    /// order they completed in.
    pub fn merge_ordered(&mut self, mut deltas: Vec<(usize, StateDelta)>) {
        deltas.sort_by_key(|(index, _)| *index);
        for (_, delta) in deltas {
            self.merge(delta);
        }
    }

    /// Apply a single write using the channel's merge policy
    fn update(&mut self, key: &str, value: Value) {
        match self.policy(key) {
            MergePolicy::Replace => {
                self.values.insert(key.to_string(), value);
            }
            MergePolicy::Append => {
                if value.is_null() {
                    return;
                }
                let slot = self
                    .values
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if !slot.is_array() {
                    let previous = slot.take();
                    *slot = Value::Array(if previous.is_null() {
                        vec![]
                    } else {
                        vec![previous]
                    });
                }
                if let Value::Array(items) = slot {
                    match value {
                        Value::Array(new_items) => items.extend(new_items),
                        other => items.push(other),
                    }
                }
            }
            MergePolicy::Max => {
                let Some(new) = value.as_f64() else {
                    log::warn!("Ignoring non-numeric write to max channel '{}'", key);
                    return;
                };
                let current = self.values.get(key).and_then(|v| v.as_f64());
                if current.map_or(true, |c| new > c) {
                    self.values.insert(key.to_string(), value);
                }
            }
            MergePolicy::Merge => {
                let slot = self
                    .values
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (slot, value) {
                    (Value::Object(current), Value::Object(new)) => {
                        for (k, v) in new {
                            current.insert(k, v);
                        }
                    }
                    (slot, value) => {
                        log::warn!("Merge channel '{}' received a non-object, replacing", key);
                        *slot = value;
                    }
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a nested value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        get_path(&self.values, path)
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_values(self) -> Values {
        self.values
    }

    /// Get all channel names that currently hold a value
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

fn get_path<'a>(values: &'a Values, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = values.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(current)
}
