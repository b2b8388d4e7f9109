//! Dotted path accessors over `serde_json` trees
//!
//! Reads never fail: a path that runs through a missing key or a scalar
//! simply yields `None`. Writes are sparse: assigning `None` leaves the tree
//! untouched, including any intermediate containers that would have been
//! created on the way to the leaf.

use serde_json::{Map, Value};

/// Separator between the segments of a path.
pub const SEPARATOR: char = '.';

/// Get the value at `path`, or `None` if any segment is absent.
///
/// Object members are addressed by key, array items by numeric segment.
pub fn get<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(SEPARATOR).try_fold(tree, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Assign `value` at `path`, creating intermediate containers as needed.
///
/// Assigning `None` is a no-op. A missing or scalar intermediate becomes an
/// array when the next segment is an index and an object otherwise. Arrays
/// grow to fit the index, padded with nulls.
pub fn set(tree: &mut Value, path: &str, value: Option<Value>) {
    let Some(value) = value else {
        return;
    };
    *slot_at(tree, path) = value;
}

/// Shallow-merge the members of `value` into the object at `path`.
///
/// The object at `path` (or `tree` itself when `path` is `None`) is created
/// if absent. Non-object values are ignored.
pub fn merge(tree: &mut Value, path: Option<&str>, value: Value) {
    let Value::Object(members) = value else {
        return;
    };
    let container = match path {
        Some(path) => slot_at(tree, path),
        None => tree,
    };
    if !container.is_object() {
        *container = Value::Object(Map::new());
    }
    if let Value::Object(map) = container {
        map.extend(members);
    }
}

/// Prefix `path` with an optional root path.
pub fn join(root: Option<&str>, path: &str) -> String {
    match root {
        Some(root) => format!("{root}{SEPARATOR}{path}"),
        None => path.to_string(),
    }
}

fn slot_at<'a>(tree: &'a mut Value, path: &str) -> &'a mut Value {
    path.split(SEPARATOR).fold(tree, slot)
}

fn slot<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = segment.parse::<usize>().ok();
    let fits = matches!(
        (&*node, index),
        (Value::Array(_), Some(_)) | (Value::Object(_), _)
    );
    if !fits {
        *node = match index {
            Some(_) => Value::Array(Vec::new()),
            None => Value::Object(Map::new()),
        };
    }
    match (node, index) {
        (Value::Array(items), Some(index)) => {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        // Indexing an object by key inserts a null member when absent.
        (node, _) => &mut node[segment],
    }
}
