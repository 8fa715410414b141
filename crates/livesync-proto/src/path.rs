//! Dot-path access into field mappings.
//!
//! A path such as `address.city` addresses the `city` key of the object stored
//! under `address`. Writing through a path creates missing intermediate
//! objects and replaces intermediate values that are not objects.

use serde_json::{Map, Value};

use crate::error::Error;
use crate::FieldMap;

fn segments(path: &str) -> Result<Vec<&str>, Error> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// First segment of a path (`address` for `address.city`).
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Read the value at `path`.
pub fn get_path<'a>(map: &'a FieldMap, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Write `value` at `path`.
pub fn set_path(map: &mut FieldMap, path: &str, value: Value) -> Result<(), Error> {
    let parts = segments(path)?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| Error::InvalidPath(path.to_string()))?;

    let mut current = map;
    for part in parents {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(inner) => inner,
            _ => return Err(Error::InvalidPath(path.to_string())),
        };
    }

    current.insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FieldMap {
        json!({ "name": "Alice", "address": { "city": "Oslo" } })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_get_path() {
        let map = sample();
        assert_eq!(get_path(&map, "name"), Some(&json!("Alice")));
        assert_eq!(get_path(&map, "address.city"), Some(&json!("Oslo")));
        assert_eq!(get_path(&map, "address.zip"), None);
        assert_eq!(get_path(&map, "name.first"), None);
    }

    #[test]
    fn test_set_path_nested() {
        let mut map = sample();
        set_path(&mut map, "address.zip", json!("0150")).unwrap();
        set_path(&mut map, "meta.tags.primary", json!("x")).unwrap();

        assert_eq!(get_path(&map, "address.zip"), Some(&json!("0150")));
        assert_eq!(get_path(&map, "address.city"), Some(&json!("Oslo")));
        assert_eq!(get_path(&map, "meta.tags.primary"), Some(&json!("x")));
    }

    #[test]
    fn test_set_path_replaces_scalar_parent() {
        let mut map = sample();
        set_path(&mut map, "name.first", json!("Al")).unwrap();
        assert_eq!(map.get("name"), Some(&json!({ "first": "Al" })));
    }

    #[test]
    fn test_set_path_rejects_empty_segments() {
        let mut map = sample();
        assert!(set_path(&mut map, "", json!(1)).is_err());
        assert!(set_path(&mut map, "a..b", json!(1)).is_err());
    }

    #[test]
    fn test_root_segment() {
        assert_eq!(root_segment("address.city"), "address");
        assert_eq!(root_segment("name"), "name");
    }
}
