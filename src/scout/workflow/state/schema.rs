// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::adk::error::ScoutError;

/// Schema defining the workflow state channels
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    /// Channel definitions
    #[serde(flatten)]
    pub channels: HashMap<String, ChannelDef>,
}

/// Definition of a single state channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelDef {
    /// Type of the channel value
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Policy for merging writes into the channel
    #[serde(default, alias = "policy")]
    pub reducer: MergePolicy,
    /// Default value
    pub default: Option<Value>,
}

/// Supported channel types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Opaque record, never checked
    Any,
}

impl FieldType {
    /// Whether `value` fits this type. `null` fits every type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Merge policies for writing values into state
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Last writer wins (default)
    #[default]
    #[serde(alias = "overwrite")]
    Replace,
    /// Append to the channel's sequence
    Append,
    /// Keep the numerically larger value
    Max,
    /// Shallow key-wise merge of objects
    Merge,
}

impl ChannelDef {
    pub fn new(field_type: FieldType, reducer: MergePolicy) -> Self {
        Self {
            field_type,
            reducer,
            default: None,
        }
    }

    /// A last-writer-wins channel
    pub fn replace(field_type: FieldType) -> Self {
        Self::new(field_type, MergePolicy::Replace)
    }

    /// An ordered sequence channel, starting empty
    pub fn append() -> Self {
        Self::new(FieldType::Array, MergePolicy::Append).with_default(Value::Array(vec![]))
    }

    /// A monotonic counter channel, starting at zero
    pub fn counter() -> Self {
        Self::new(FieldType::Number, MergePolicy::Max).with_default(Value::from(0))
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a schema from YAML (`name: { type: array, reducer: append }`)
    pub fn from_yaml(content: &str) -> Result<Self, ScoutError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Declare a channel (builder style)
    pub fn channel(mut self, name: impl Into<String>, def: ChannelDef) -> Self {
        self.channels.insert(name.into(), def);
        self
    }

    /// Merge policy for `name`; undeclared channels are last-writer-wins
    pub fn policy(&self, name: &str) -> MergePolicy {
        self.channels
            .get(name)
            .map(|c| c.reducer)
            .unwrap_or(MergePolicy::Replace)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Channels whose default value does not fit their declared type
    pub fn invalid_defaults(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .iter()
            .filter(|(_, def)| {
                def.default
                    .as_ref()
                    .is_some_and(|d| !def.field_type.accepts(d))
            })
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_schema_deserialize() {
        let yaml = r#"
            intent_type:
              type: string
            confidence:
              type: number
              default: 0.0
            web_research_result:
              type: array
              reducer: append
        "#;
        let schema = StateSchema::from_yaml(yaml).unwrap();

        assert_eq!(schema.channels.len(), 3);
        assert_eq!(schema.channels["intent_type"].field_type, FieldType::String);
        assert_eq!(schema.channels["confidence"].default, Some(json!(0.0)));
        assert_eq!(schema.policy("web_research_result"), MergePolicy::Append);
        assert_eq!(schema.policy("intent_type"), MergePolicy::Replace);
    }

    #[test]
    fn test_all_policies() {
        let yaml = r#"
            f1: { type: string, reducer: replace }
            f2: { type: string, reducer: overwrite }
            f3: { type: array, reducer: append }
            f4: { type: number, reducer: max }
            f5: { type: object, policy: merge }
        "#;
        let schema = StateSchema::from_yaml(yaml).unwrap();

        assert_eq!(schema.policy("f1"), MergePolicy::Replace);
        assert_eq!(schema.policy("f2"), MergePolicy::Replace);
        assert_eq!(schema.policy("f3"), MergePolicy::Append);
        assert_eq!(schema.policy("f4"), MergePolicy::Max);
        assert_eq!(schema.policy("f5"), MergePolicy::Merge);
    }

    #[test]
    fn test_undeclared_channel_replaces() {
        assert_eq!(StateSchema::new().policy("anything"), MergePolicy::Replace);
    }

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::String.accepts(&json!("x")));
        assert!(!FieldType::String.accepts(&json!(1)));
        assert!(FieldType::Array.accepts(&json!([])));
        assert!(FieldType::Any.accepts(&json!({"a": 1})));
        assert!(FieldType::Number.accepts(&Value::Null));
    }

    #[test]
    fn test_invalid_defaults() {
        let schema = StateSchema::new()
            .channel("ok", ChannelDef::counter())
            .channel(
                "bad",
                ChannelDef::replace(FieldType::Boolean).with_default(json!("yes")),
            );
        assert_eq!(schema.invalid_defaults(), vec!["bad"]);
    }
}
