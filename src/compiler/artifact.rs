//! Compiled engine artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved state entry holding the raw engine payload.
pub const ENGINE_KEY: &str = "engine";

/// One entry of an engine's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Bytes(Vec<u8>),
    Strings(Vec<String>),
    Shape(Vec<usize>),
    Text(String),
}

/// Full state of a compiled engine.
///
/// The state is everything needed to reconstruct the wrapped inference module:
/// the serialized engine under [`ENGINE_KEY`] plus the binding names and the
/// profile it was built for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineArtifact {
    state: BTreeMap<String, StateValue>,
}

impl EngineArtifact {
    pub fn new(state: BTreeMap<String, StateValue>) -> Self {
        Self { state }
    }

    /// Build the conventional state of a single-input engine.
    pub fn from_engine(engine: Vec<u8>, input_names: Vec<String>, output_names: Vec<String>) -> Self {
        Self::default()
            .with_entry(ENGINE_KEY, StateValue::Bytes(engine))
            .with_entry("input_names", StateValue::Strings(input_names))
            .with_entry("output_names", StateValue::Strings(output_names))
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: StateValue) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn state(&self) -> &BTreeMap<String, StateValue> {
        &self.state
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }

    /// Raw engine payload, if the reserved entry is present and holds bytes.
    pub fn engine_bytes(&self) -> Option<&[u8]> {
        match self.state.get(ENGINE_KEY) {
            Some(StateValue::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn output_names(&self) -> Option<&[String]> {
        match self.state.get("output_names") {
            Some(StateValue::Strings(names)) => Some(names),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_engine() {
        let artifact = EngineArtifact::from_engine(
            vec![1, 2, 3],
            vec!["input".into()],
            vec!["num_detections".into(), "boxes".into()],
        );

        assert_eq!(artifact.engine_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(artifact.output_names().map(<[String]>::len), Some(2));
        assert_eq!(artifact.state().len(), 3);
    }

    #[test]
    fn test_engine_entry_must_be_bytes() {
        let artifact = EngineArtifact::default().with_entry(ENGINE_KEY, StateValue::Text("x".into()));
        assert!(artifact.engine_bytes().is_none());
    }
}
