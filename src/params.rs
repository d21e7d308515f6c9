//! Parameter lookup for template evaluation.

use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied template parameters.
pub type Params = HashMap<String, Value>;

static NULL: Value = Value::Null;

/// Read-only view over [`Params`] in which every key is present.
///
/// Templates routinely reference optional parameters inside conditional
/// clauses; a key the caller did not supply reads as `null` instead of
/// failing the render. The caller's map is never modified.
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    params: &'a Params,
}

impl<'a> ParamView<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    pub fn get(&self, key: &str) -> &'a Value {
        self.params.get(key).unwrap_or(&NULL)
    }
}
