//! JSON-Patch-style state mutation.
//!
//! Operations follow RFC 6902 (`add`, `remove`, `replace`, `move`, `copy`,
//! `test`) over RFC 6901 pointers, with two local rules:
//! - an empty path or `/` addresses the whole document;
//! - `move` into the source's own subtree is rejected.
//!
//! [`apply_patch_in_place`] stops at the first failing operation and leaves
//! earlier operations applied. [`StateStore`] wraps it with all-or-nothing
//! application and an optional bounded history.

use crate::error::{AgentError, AgentResult};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use tracing::debug;

/// Default number of snapshots kept when history is enabled.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// A parsed JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse `/a/b~1c` style paths. `""` and `"/"` are the root.
    pub fn parse(path: &str) -> AgentResult<Self> {
        if path.is_empty() || path == "/" {
            return Ok(Self::root());
        }

        let rest = path.strip_prefix('/').ok_or_else(|| {
            AgentError::validation(format!("path must start with '/': {path}"))
        })?;

        let segments = rest
            .split('/')
            .map(|raw| unescape(raw, path))
            .collect::<AgentResult<Vec<_>>>()?;
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when `other` lies strictly below this pointer.
    pub fn is_proper_prefix_of(&self, other: &JsonPointer) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    fn split_last(&self) -> Option<(&[String], &String)> {
        self.segments
            .split_last()
            .map(|(last, parents)| (parents, last))
    }
}

impl std::fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

fn unescape(raw: &str, path: &str) -> AgentResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(AgentError::validation(format!(
                    "invalid escape in path: {path}"
                )))
            }
        }
    }
    Ok(out)
}

/// One patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Add { path: JsonPointer, value: Value },
    Remove { path: JsonPointer },
    Replace { path: JsonPointer, value: Value },
    Move { from: JsonPointer, path: JsonPointer },
    Copy { from: JsonPointer, path: JsonPointer },
    Test { path: JsonPointer, value: Value },
}

impl PatchOp {
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Remove { .. } => "remove",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Move { .. } => "move",
            PatchOp::Copy { .. } => "copy",
            PatchOp::Test { .. } => "test",
        }
    }

    /// Parse one `{op, path, value?, from?}` document.
    pub fn from_value(doc: &Value) -> AgentResult<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| AgentError::validation("patch operation must be an object"))?;

        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::validation("patch operation has no \"op\""))?;
        let path = pointer_field(obj, "path")?;

        let value = || {
            obj.get("value")
                .cloned()
                .ok_or_else(|| AgentError::validation(format!("\"{op}\" requires a value")))
        };

        Ok(match op {
            "add" => PatchOp::Add {
                path,
                value: value()?,
            },
            "remove" => PatchOp::Remove { path },
            "replace" => PatchOp::Replace {
                path,
                value: value()?,
            },
            "move" => PatchOp::Move {
                from: pointer_field(obj, "from")?,
                path,
            },
            "copy" => PatchOp::Copy {
                from: pointer_field(obj, "from")?,
                path,
            },
            "test" => PatchOp::Test {
                path,
                value: value()?,
            },
            other => {
                return Err(AgentError::validation(format!(
                    "unknown patch operation: {other}"
                )))
            }
        })
    }

    /// Parse a whole patch document, which must be an array.
    pub fn parse_patch(patch: &Value) -> AgentResult<Vec<Self>> {
        patch
            .as_array()
            .ok_or_else(|| AgentError::validation("patch must be an array of operations"))?
            .iter()
            .map(Self::from_value)
            .collect()
    }

    pub fn to_value(&self) -> Value {
        match self {
            PatchOp::Add { path, value }
            | PatchOp::Replace { path, value }
            | PatchOp::Test { path, value } => {
                json!({ "op": self.name(), "path": path.to_string(), "value": value })
            }
            PatchOp::Remove { path } => json!({ "op": "remove", "path": path.to_string() }),
            PatchOp::Move { from, path } | PatchOp::Copy { from, path } => json!({
                "op": self.name(),
                "from": from.to_string(),
                "path": path.to_string(),
            }),
        }
    }
}

fn pointer_field(obj: &Map<String, Value>, key: &str) -> AgentResult<JsonPointer> {
    let raw = obj
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::validation(format!("patch operation has no \"{key}\"")))?;
    JsonPointer::parse(raw)
}

/// Tuning for patch application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Let `add` create missing intermediate objects.
    pub create_missing_parents: bool,
}

/// Apply `ops` to `doc` in order, stopping at the first failure.
///
/// Operations before the failing one stay applied.
pub fn apply_patch_in_place(
    doc: &mut Value,
    ops: &[PatchOp],
    options: PatchOptions,
) -> AgentResult<()> {
    for (index, op) in ops.iter().enumerate() {
        apply_op(doc, op, options).map_err(|e| match e {
            AgentError::Validation { message } => {
                AgentError::validation(format!("operation {index} ({}): {message}", op.name()))
            }
            other => other,
        })?;
    }
    Ok(())
}

/// Apply a single operation.
pub fn apply_op(doc: &mut Value, op: &PatchOp, options: PatchOptions) -> AgentResult<()> {
    match op {
        PatchOp::Add { path, value } => add(doc, path, value.clone(), options),
        PatchOp::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOp::Replace { path, value } => replace(doc, path, value.clone()),
        PatchOp::Move { from, path } => {
            if from == path {
                return get(doc, from).map(|_| ());
            }
            if from.is_proper_prefix_of(path) {
                return Err(AgentError::validation(format!(
                    "cannot move {from} into its own child {path}"
                )));
            }
            let value = remove(doc, from)?;
            add(doc, path, value, options)
        }
        PatchOp::Copy { from, path } => {
            let value = get(doc, from)?.clone();
            add(doc, path, value, options)
        }
        PatchOp::Test { path, value } => {
            let actual = get(doc, path)?;
            if actual == value {
                Ok(())
            } else {
                Err(AgentError::validation(format!(
                    "test failed at {path}: expected {value}, found {actual}"
                )))
            }
        }
    }
}

/// Resolve a pointer to a value.
pub fn get<'a>(doc: &'a Value, path: &JsonPointer) -> AgentResult<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(array_index(segment, items.len(), false, path)?),
            _ => None,
        }
        .ok_or_else(|| not_found(path))?;
    }
    Ok(current)
}

fn add(doc: &mut Value, path: &JsonPointer, value: Value, options: PatchOptions) -> AgentResult<()> {
    let Some((parents, last)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };

    match container_mut(doc, parents, path, options.create_missing_parents)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last, items.len(), true, path)?;
            items.insert(index, value);
            Ok(())
        }
        _ => Err(AgentError::validation(format!(
            "cannot add below a scalar at {path}"
        ))),
    }
}

fn remove(doc: &mut Value, path: &JsonPointer) -> AgentResult<Value> {
    let Some((parents, last)) = path.split_last() else {
        return Err(AgentError::validation("cannot remove the root document"));
    };

    match container_mut(doc, parents, path, false)? {
        Value::Object(map) => map.remove(last).ok_or_else(|| not_found(path)),
        Value::Array(items) => {
            let index = array_index(last, items.len(), false, path)?;
            Ok(items.remove(index))
        }
        _ => Err(not_found(path)),
    }
}

fn replace(doc: &mut Value, path: &JsonPointer, value: Value) -> AgentResult<()> {
    let Some((parents, last)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };

    let slot = match container_mut(doc, parents, path, false)? {
        Value::Object(map) => map.get_mut(last),
        Value::Array(items) => {
            let index = array_index(last, items.len(), false, path)?;
            items.get_mut(index)
        }
        _ => None,
    }
    .ok_or_else(|| not_found(path))?;

    *slot = value;
    Ok(())
}

/// Walk to the container holding the pointer's final segment.
fn container_mut<'a>(
    doc: &'a mut Value,
    parents: &[String],
    path: &JsonPointer,
    create: bool,
) -> AgentResult<&'a mut Value> {
    let mut current = doc;
    for segment in parents {
        current = match current {
            Value::Object(map) => {
                if create {
                    map.entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(segment).ok_or_else(|| not_found(path))?
                }
            }
            Value::Array(items) => {
                let index = array_index(segment, items.len(), false, path)?;
                items.get_mut(index).ok_or_else(|| not_found(path))?
            }
            _ => {
                return Err(AgentError::validation(format!(
                    "cannot traverse a scalar at {path}"
                )))
            }
        };
    }
    Ok(current)
}

/// Parse an array index. `-` means one past the end and only counts when
/// `allow_end` is set; so does an index equal to `len`.
fn array_index(segment: &str, len: usize, allow_end: bool, path: &JsonPointer) -> AgentResult<usize> {
    let index = if segment == "-" {
        len
    } else {
        let well_formed = !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && (segment == "0" || !segment.starts_with('0'));
        if !well_formed {
            return Err(AgentError::validation(format!(
                "invalid array index {segment:?} in {path}"
            )));
        }
        segment.parse::<usize>().map_err(|_| {
            AgentError::validation(format!("array index out of range in {path}"))
        })?
    };

    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if (len == 0 && !allow_end) || index > limit {
        return Err(AgentError::validation(format!(
            "array index {segment} out of bounds (len {len}) in {path}"
        )));
    }
    Ok(index)
}

fn not_found(path: &JsonPointer) -> AgentError {
    AgentError::validation(format!("path not found: {path}"))
}

/// The session's state document with all-or-nothing patching and optional
/// rollback history.
#[derive(Debug, Clone)]
pub struct StateStore {
    state: Value,
    history: VecDeque<Value>,
    /// `None` while history is disabled.
    history_limit: Option<usize>,
    options: PatchOptions,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl StateStore {
    pub fn new(initial: Value) -> Self {
        Self {
            state: initial,
            history: VecDeque::new(),
            history_limit: None,
            options: PatchOptions::default(),
        }
    }

    pub fn with_history(mut self, max_entries: usize) -> Self {
        self.enable_history(max_entries);
        self
    }

    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// Replace the whole document.
    pub fn set_state(&mut self, state: Value) {
        let previous = std::mem::replace(&mut self.state, state);
        self.record(previous);
    }

    /// Parse and apply a patch document. On failure the state is unchanged.
    pub fn apply_patch(&mut self, patch: &Value) -> AgentResult<()> {
        let ops = PatchOp::parse_patch(patch)?;
        self.apply_ops(&ops)
    }

    /// Apply parsed operations. On failure the state is unchanged.
    pub fn apply_ops(&mut self, ops: &[PatchOp]) -> AgentResult<()> {
        let mut working = self.state.clone();
        apply_patch_in_place(&mut working, ops, self.options)?;
        self.set_state(working);
        debug!(operations = ops.len(), "Applied state patch");
        Ok(())
    }

    /// Keep up to `max_entries` pre-mutation snapshots (at least one).
    pub fn enable_history(&mut self, max_entries: usize) {
        let limit = max_entries.max(1);
        self.history_limit = Some(limit);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }

    /// Stop recording and drop all snapshots.
    pub fn disable_history(&mut self) {
        self.history_limit = None;
        self.history.clear();
    }

    pub fn history_enabled(&self) -> bool {
        self.history_limit.is_some()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Snapshot at `index`, oldest first.
    pub fn history_at(&self, index: usize) -> Option<&Value> {
        self.history.get(index)
    }

    /// Restore the most recent snapshot.
    pub fn rollback(&mut self) -> AgentResult<()> {
        let previous = self
            .history
            .pop_back()
            .ok_or_else(|| AgentError::state("no state history to roll back to"))?;
        self.state = previous;
        debug!(remaining = self.history.len(), "Rolled back state");
        Ok(())
    }

    /// Replace the document without recording history.
    pub fn restore(&mut self, snapshot: Value) {
        self.state = snapshot;
    }

    /// Reset to `null` and drop history.
    pub fn clear(&mut self) {
        self.state = Value::Null;
        self.history.clear();
    }

    fn record(&mut self, previous: Value) {
        let Some(limit) = self.history_limit else {
            return;
        };
        if self.history.len() == limit {
            self.history.pop_front();
        }
        self.history.push_back(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(doc: &mut Value, ops: Value) -> AgentResult<()> {
        let ops = PatchOp::parse_patch(&ops)?;
        apply_patch_in_place(doc, &ops, PatchOptions::default())
    }

    #[test]
    fn test_pointer_parsing() {
        assert!(JsonPointer::parse("").unwrap().is_root());
        assert!(JsonPointer::parse("/").unwrap().is_root());
        assert_eq!(
            JsonPointer::parse("/a~1b/c~0d/0").unwrap().segments(),
            &["a/b", "c~d", "0"]
        );
        assert!(JsonPointer::parse("a/b").is_err());
        assert!(JsonPointer::parse("/bad~2").is_err());
    }

    #[test]
    fn test_pointer_display_escapes() {
        let pointer = JsonPointer::parse("/a~1b/c~0d").unwrap();
        assert_eq!(pointer.to_string(), "/a~1b/c~0d");
    }

    #[test]
    fn test_add_object_key() {
        let mut doc = json!({"a": {"b": 1}});
        patch(&mut doc, json!([{"op": "add", "path": "/a/c", "value": 2}])).unwrap();
        patch(&mut doc, json!([{"op": "add", "path": "/a/b", "value": 3}])).unwrap();
        assert_eq!(doc, json!({"a": {"b": 3, "c": 2}}));
    }

    #[test]
    fn test_add_missing_parent_fails_without_create_mode() {
        let mut doc = json!({});
        let err = patch(&mut doc, json!([{"op": "add", "path": "/x/y", "value": 1}])).unwrap_err();
        assert!(matches!(err, AgentError::Validation { .. }));

        let ops = PatchOp::parse_patch(&json!([{"op": "add", "path": "/x/y", "value": 1}])).unwrap();
        let options = PatchOptions {
            create_missing_parents: true,
        };
        apply_patch_in_place(&mut doc, &ops, options).unwrap();
        assert_eq!(doc, json!({"x": {"y": 1}}));
    }

    #[test]
    fn test_nested_object_walk_in_both_modes() {
        let mut doc = json!({"a": {"b": {"c": 1}}});
        patch(&mut doc, json!([{"op": "replace", "path": "/a/b/c", "value": 2}])).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 2}}}));

        let options = PatchOptions {
            create_missing_parents: true,
        };
        let ops = PatchOp::parse_patch(&json!([
            {"op": "add", "path": "/a/b/d", "value": 3},
            {"op": "add", "path": "/a/x/y/z", "value": 4}
        ]))
        .unwrap();
        apply_patch_in_place(&mut doc, &ops, options).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 2, "d": 3}, "x": {"y": {"z": 4}}}}));
    }

    #[test]
    fn test_add_array_positions() {
        let mut doc = json!({"list": [1, 3]});
        patch(
            &mut doc,
            json!([
                {"op": "add", "path": "/list/1", "value": 2},
                {"op": "add", "path": "/list/-", "value": 4},
                {"op": "add", "path": "/list/0", "value": 0},
                {"op": "add", "path": "/list/5", "value": 5}
            ]),
        )
        .unwrap();
        assert_eq!(doc, json!({"list": [0, 1, 2, 3, 4, 5]}));

        assert!(patch(&mut doc, json!([{"op": "add", "path": "/list/9", "value": 9}])).is_err());
        assert!(patch(&mut doc, json!([{"op": "add", "path": "/list/01", "value": 9}])).is_err());
    }

    #[test]
    fn test_add_then_remove_restores_document() {
        let original = json!({"a": 1, "nested": {"b": [1, 2]}});
        let mut doc = original.clone();
        patch(&mut doc, json!([{"op": "add", "path": "/nested/new", "value": {"deep": true}}])).unwrap();
        assert_ne!(doc, original);
        patch(&mut doc, json!([{"op": "remove", "path": "/nested/new"}])).unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn test_remove_failures() {
        let mut doc = json!({"a": [1]});
        assert!(patch(&mut doc, json!([{"op": "remove", "path": "/missing"}])).is_err());
        assert!(patch(&mut doc, json!([{"op": "remove", "path": "/a/1"}])).is_err());
        assert!(patch(&mut doc, json!([{"op": "remove", "path": "/a/-"}])).is_err());
        assert!(patch(&mut doc, json!([{"op": "remove", "path": ""}])).is_err());
        patch(&mut doc, json!([{"op": "remove", "path": "/a/0"}])).unwrap();
        assert_eq!(doc, json!({"a": []}));
    }

    #[test]
    fn test_replace_requires_existing_path() {
        let mut doc = json!({"count": 1});
        patch(&mut doc, json!([{"op": "replace", "path": "/count", "value": 5}])).unwrap();
        assert_eq!(doc, json!({"count": 5}));

        let err = patch(&mut doc, json!([{"op": "replace", "path": "/other", "value": 5}])).unwrap_err();
        assert!(matches!(err, AgentError::Validation { .. }));
    }

    #[test]
    fn test_replace_root() {
        let mut doc = json!({"a": 1});
        patch(&mut doc, json!([{"op": "replace", "path": "", "value": [1, 2]}])).unwrap();
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn test_move_and_copy() {
        let mut doc = json!({"a": {"x": 1}, "b": {}});
        patch(
            &mut doc,
            json!([
                {"op": "copy", "from": "/a/x", "path": "/b/y"},
                {"op": "move", "from": "/a", "path": "/c"}
            ]),
        )
        .unwrap();
        assert_eq!(doc, json!({"b": {"y": 1}, "c": {"x": 1}}));
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let mut doc = json!({"a": {"b": {}}});
        let err = patch(&mut doc, json!([{"op": "move", "from": "/a", "path": "/a/b/c"}])).unwrap_err();
        assert!(err.to_string().contains("own child"));
        assert_eq!(doc, json!({"a": {"b": {}}}));
    }

    #[test]
    fn test_move_to_same_path_is_noop() {
        let mut doc = json!({"a": 1});
        patch(&mut doc, json!([{"op": "move", "from": "/a", "path": "/a"}])).unwrap();
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_test_op() {
        let mut doc = json!({"a": {"b": [1, {"c": true}]}});
        patch(&mut doc, json!([{"op": "test", "path": "/a/b/1", "value": {"c": true}}])).unwrap();
        let err = patch(
            &mut doc,
            json!([
                {"op": "test", "path": "/a/b/0", "value": 2},
                {"op": "add", "path": "/never", "value": 1}
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("test failed"));
        assert!(doc.get("never").is_none());
    }

    #[test]
    fn test_in_place_failure_keeps_earlier_ops() {
        let mut doc = json!({});
        let result = patch(
            &mut doc,
            json!([
                {"op": "add", "path": "/a", "value": 1},
                {"op": "remove", "path": "/missing"}
            ]),
        );
        assert!(result.is_err());
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_malformed_patches() {
        let mut doc = json!({});
        for bad in [
            json!({"op": "add"}),
            json!([{"path": "/a"}]),
            json!([{"op": "frobnicate", "path": "/a"}]),
            json!([{"op": "add", "path": "/a"}]),
            json!([{"op": "move", "path": "/a"}]),
            json!(["add"]),
        ] {
            let err = patch(&mut doc, bad.clone()).unwrap_err();
            assert!(matches!(err, AgentError::Validation { .. }), "{bad}");
        }
    }

    #[test]
    fn test_op_to_value() {
        let op = PatchOp::from_value(&json!({"op": "move", "from": "/a~1b", "path": "/c"})).unwrap();
        assert_eq!(op.to_value(), json!({"op": "move", "from": "/a~1b", "path": "/c"}));
    }

    #[test]
    fn test_store_patch_is_atomic() {
        let mut store = StateStore::new(json!({"other": 1}));
        let err = store
            .apply_patch(&json!([
                {"op": "add", "path": "/a", "value": 1},
                {"op": "replace", "path": "/count", "value": 5}
            ]))
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation { .. }));
        assert_eq!(store.state(), &json!({"other": 1}));
    }

    #[test]
    fn test_store_history_and_rollback() {
        let mut store = StateStore::new(json!({"v": 0})).with_history(DEFAULT_HISTORY_LIMIT);
        store
            .apply_patch(&json!([{"op": "replace", "path": "/v", "value": 1}]))
            .unwrap();
        store.set_state(json!({"v": 2}));
        assert_eq!(store.history_len(), 2);
        assert_eq!(store.history_at(0), Some(&json!({"v": 0})));

        store.rollback().unwrap();
        assert_eq!(store.state(), &json!({"v": 1}));
        store.rollback().unwrap();
        assert_eq!(store.state(), &json!({"v": 0}));

        let err = store.rollback().unwrap_err();
        assert!(matches!(err, AgentError::State { .. }));
    }

    #[test]
    fn test_store_history_evicts_oldest() {
        let mut store = StateStore::new(json!(0)).with_history(2);
        for v in 1..=4 {
            store.set_state(json!(v));
        }
        assert_eq!(store.history_len(), 2);
        assert_eq!(store.history_at(0), Some(&json!(2)));
        assert_eq!(store.history_at(1), Some(&json!(3)));
    }

    #[test]
    fn test_store_without_history() {
        let mut store = StateStore::default();
        store.set_state(json!({"a": 1}));
        assert!(!store.history_enabled());
        assert_eq!(store.history_len(), 0);
        assert!(store.rollback().is_err());
    }

    #[test]
    fn test_disable_history_clears_snapshots() {
        let mut store = StateStore::default().with_history(5);
        store.set_state(json!(1));
        store.disable_history();
        assert_eq!(store.history_len(), 0);
        store.set_state(json!(2));
        assert_eq!(store.history_len(), 0);
    }

    #[test]
    fn test_failed_patch_records_no_history() {
        let mut store = StateStore::new(json!({})).with_history(3);
        assert!(store
            .apply_patch(&json!([{"op": "remove", "path": "/nope"}]))
            .is_err());
        assert_eq!(store.history_len(), 0);
    }

    #[test]
    fn test_clear_and_restore() {
        let mut store = StateStore::new(json!({"a": 1})).with_history(3);
        store.set_state(json!({"a": 2}));
        store.clear();
        assert!(store.state().is_null());
        assert_eq!(store.history_len(), 0);

        store.restore(json!({"a": 3}));
        assert_eq!(store.state(), &json!({"a": 3}));
        assert_eq!(store.history_len(), 0);
    }
}
