//! Generic traversal of free-form node parameter trees.
//!
//! Extraction and rewriting never hardcode where a field lives; they walk
//! the whole tree and decide per visited key.

use serde_json::{Map, Value};

/// One visited entry of a parameter tree.
#[derive(Debug, Clone, Copy)]
pub struct ParamVisit<'a> {
    /// Nearest object key. For array items this is the key holding the array.
    pub key: &'a str,
    /// Dotted/indexed path from the parameters root, e.g. `options.items[2].url`.
    pub path: &'a str,
    pub value: &'a Value,
    /// Object that holds `key`.
    pub parent: &'a Map<String, Value>,
}

/// Visit every key of `params` depth-first, descending into objects and
/// arrays. Non-object roots are ignored.
pub fn walk_parameters<F>(params: &Value, visit: &mut F)
where
    F: FnMut(&ParamVisit<'_>),
{
    if let Value::Object(map) = params {
        walk_object(map, "", visit);
    }
}

fn walk_object<F>(map: &Map<String, Value>, prefix: &str, visit: &mut F)
where
    F: FnMut(&ParamVisit<'_>),
{
    for (key, value) in map {
        let path = join_key(prefix, key);
        visit(&ParamVisit {
            key,
            path: &path,
            value,
            parent: map,
        });
        walk_children(key, value, &path, map, visit);
    }
}

fn walk_children<F>(key: &str, value: &Value, path: &str, parent: &Map<String, Value>, visit: &mut F)
where
    F: FnMut(&ParamVisit<'_>),
{
    match value {
        Value::Object(child) => walk_object(child, path, visit),
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, idx);
                match item {
                    Value::Object(child) => walk_object(child, &item_path, visit),
                    Value::Array(_) => walk_children(key, item, &item_path, parent, visit),
                    _ => visit(&ParamVisit {
                        key,
                        path: &item_path,
                        value: item,
                        parent,
                    }),
                }
            }
        }
        _ => {}
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Call `f` on every object in the tree, parents before children, including
/// objects nested in arrays.
pub fn visit_objects_mut<F>(value: &mut Value, f: &mut F)
where
    F: FnMut(&mut Map<String, Value>),
{
    match value {
        Value::Object(map) => {
            f(map);
            for child in map.values_mut() {
                visit_objects_mut(child, f);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                visit_objects_mut(item, f);
            }
        }
        _ => {}
    }
}

/// Every string leaf of the tree, in traversal order.
pub fn string_leaves(params: &Value) -> Vec<(String, String)> {
    let mut leaves = Vec::new();
    walk_parameters(params, &mut |visit| {
        if let Value::String(s) = visit.value {
            leaves.push((visit.path.to_string(), s.clone()));
        }
    });
    leaves
}
