use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Result of reading one path. `exists` is false for absent paths and for
/// paths holding JSON `null`; `value` is then `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRead {
    pub exists: bool,
    pub value: Value,
}

impl StoreRead {
    pub fn absent() -> Self {
        Self {
            exists: false,
            value: Value::Null,
        }
    }

    pub fn found(value: Value) -> Self {
        if value.is_null() {
            return Self::absent();
        }
        Self {
            exists: true,
            value,
        }
    }
}

/// A key-value document store addressed by `/`-separated paths.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<StoreRead, StoreError>;

    /// Read several paths concurrently; results line up with `paths`.
    async fn read_many(&self, paths: &[String]) -> Result<Vec<StoreRead>, StoreError> {
        futures::future::try_join_all(paths.iter().map(|p| self.read(p))).await
    }

    /// Replace the value at `path`. Writing `null` deletes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Append `value` under a freshly generated child key and return the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = Uuid::new_v4().simple().to_string();
        self.set(&child_path(path, &key), value).await?;
        Ok(key)
    }

    /// Merge top-level `fields` into the object at `path`.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;
}

pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn child_path(path: &str, key: &str) -> String {
    let mut parts = segments(path);
    parts.push(key);
    parts.join("/")
}

pub(crate) fn get_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = match node {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Write `value` at `segments`, creating intermediate objects. `null`
/// removes the key. Writing through a scalar is rejected.
pub(crate) fn put_at(root: &mut Value, segments: &[&str], value: Value) -> Result<(), StoreError> {
    let Some((last, parents)) = segments.split_last() else {
        *root = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value
        };
        return Ok(());
    };

    let mut node = root;
    for segment in parents {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return Err(StoreError::InvalidPath(segments.join("/"))),
        };
    }
    if node.is_null() {
        *node = Value::Object(Map::new());
    }

    let Value::Object(map) = node else {
        return Err(StoreError::InvalidPath(segments.join("/")));
    };
    if value.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), value);
    }
    Ok(())
}

pub(crate) fn merge_at(
    root: &mut Value,
    segments: &[&str],
    fields: Map<String, Value>,
) -> Result<(), StoreError> {
    let mut current = match get_at(root, segments) {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(StoreError::InvalidPath(segments.join("/"))),
    };
    for (key, value) in fields {
        if value.is_null() {
            current.remove(&key);
        } else {
            current.insert(key, value);
        }
    }
    put_at(root, segments, Value::Object(current))
}

/// Whole document tree held in memory; optionally backed by a JSON file
/// (a database export).
#[derive(Debug, Default)]
pub struct SnapshotStore {
    root: RwLock<Value>,
}

impl SnapshotStore {
    pub fn new(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    /// Load a snapshot file. A missing file yields an empty tree.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let root = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::unavailable(&location, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(StoreError::unavailable(&location, e)),
        };
        Ok(Self::new(root))
    }

    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let location = path.display().to_string();
        let root = self.root.read().await;
        let text = serde_json::to_string_pretty(&*root)
            .map_err(|e| StoreError::unavailable(&location, e))?;
        std::fs::write(path, text).map_err(|e| StoreError::unavailable(&location, e))
    }
}

#[async_trait]
impl DocumentStore for SnapshotStore {
    async fn read(&self, path: &str) -> Result<StoreRead, StoreError> {
        let root = self.root.read().await;
        Ok(get_at(&root, &segments(path))
            .cloned()
            .map(StoreRead::found)
            .unwrap_or_else(StoreRead::absent))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut root = self.root.write().await;
        put_at(&mut root, &segments(path), value)
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut root = self.root.write().await;
        merge_at(&mut root, &segments(path), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SnapshotStore {
        SnapshotStore::new(json!({
            "users": { "u1": { "name": "Asha", "department": "CSE" } },
            "fees": { "R100": { "total": 50000, "paid": 50000 }, "R101": null },
            "list": [ { "a": 1 }, null ]
        }))
    }

    #[tokio::test]
    async fn read_nested_path() {
        let read = store().read("users/u1/name").await.unwrap();
        assert!(read.exists);
        assert_eq!(read.value, json!("Asha"));
    }

    #[tokio::test]
    async fn absent_and_null_paths_do_not_exist() {
        let store = store();
        assert_eq!(store.read("nope").await.unwrap(), StoreRead::absent());
        assert_eq!(store.read("fees/R101").await.unwrap(), StoreRead::absent());
        assert!(!store.read("users/u1/name/deeper").await.unwrap().exists);
    }

    #[tokio::test]
    async fn array_segments_are_indexes() {
        let store = store();
        assert_eq!(store.read("list/0/a").await.unwrap().value, json!(1));
        assert!(!store.read("list/1").await.unwrap().exists);
    }

    #[tokio::test]
    async fn empty_segments_are_ignored() {
        let read = store().read("/users//u1/").await.unwrap();
        assert_eq!(read.value["department"], json!("CSE"));
    }

    #[tokio::test]
    async fn read_many_keeps_order() {
        let reads = store()
            .read_many(&["fees/R100".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(reads.len(), 2);
        assert!(reads[0].exists);
        assert!(!reads[1].exists);
    }

    #[tokio::test]
    async fn set_creates_intermediate_objects_and_null_deletes() {
        let store = SnapshotStore::default();
        store
            .set("finance/studentFees/R7", json!({ "totalFees": 10 }))
            .await
            .unwrap();
        assert_eq!(
            store.read("finance/studentFees/R7/totalFees").await.unwrap().value,
            json!(10)
        );
        store.set("finance/studentFees/R7", Value::Null).await.unwrap();
        assert!(!store.read("finance/studentFees/R7").await.unwrap().exists);
    }

    #[tokio::test]
    async fn set_through_scalar_is_rejected() {
        let err = store().set("users/u1/name/first", json!("A")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn push_generates_distinct_keys() {
        let store = SnapshotStore::default();
        let a = store.push("achievements", json!({ "title": "A" })).await.unwrap();
        let b = store.push("achievements", json!({ "title": "B" })).await.unwrap();
        assert_ne!(a, b);
        let all = store.read("achievements").await.unwrap().value;
        assert_eq!(all.as_object().map(|m| m.len()), Some(2));
        assert_eq!(all[&a]["title"], json!("A"));
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = store();
        let mut fields = Map::new();
        fields.insert("attendance".into(), json!(81));
        fields.insert("department".into(), Value::Null);
        store.update("users/u1", fields).await.unwrap();
        let user = store.read("users/u1").await.unwrap().value;
        assert_eq!(user, json!({ "name": "Asha", "attendance": 81 }));
    }

    #[tokio::test]
    async fn snapshot_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("college.json");

        let store = SnapshotStore::open(&path).unwrap();
        assert!(!store.read("users").await.unwrap().exists);
        store.set("users/u9", json!({ "name": "Ravi" })).await.unwrap();
        store.save(&path).await.unwrap();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(
            reopened.read("users/u9/name").await.unwrap().value,
            json!("Ravi")
        );
    }

    #[test]
    fn malformed_snapshot_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = SnapshotStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
