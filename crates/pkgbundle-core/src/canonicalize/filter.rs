//! Path-deletion filter over generic documents.

use serde_json::Value;

use super::selector::{FieldPath, PathSegment};

/// Fields assigned by the API server, never part of a digest.
pub const ALWAYS_EXCLUDED: [&str; 6] = [
    ".status",
    ".metadata.creationTimestamp",
    ".metadata.generation",
    ".metadata.managedFields",
    ".metadata.uid",
    ".metadata.resourceVersion",
];

pub(crate) fn always_excluded_paths() -> Vec<FieldPath> {
    vec![
        FieldPath::keys(&["status"]),
        FieldPath::keys(&["metadata", "creationTimestamp"]),
        FieldPath::keys(&["metadata", "generation"]),
        FieldPath::keys(&["metadata", "managedFields"]),
        FieldPath::keys(&["metadata", "uid"]),
        FieldPath::keys(&["metadata", "resourceVersion"]),
    ]
}

/// Deletes a set of field paths from a document and optionally narrows
/// `metadata.annotations` to an allow-list of keys.
///
/// Missing paths are skipped. Deletions run in descending path order so
/// removing an array element never shifts an index that is still pending.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    deletions: Vec<FieldPath>,
    retained_annotations: Option<Vec<String>>,
}

impl DocumentFilter {
    /// Filter removing only [`ALWAYS_EXCLUDED`].
    pub fn always_excluded() -> Self {
        Self {
            deletions: always_excluded_paths(),
            retained_annotations: None,
        }
    }

    pub fn with_excludes(mut self, paths: impl IntoIterator<Item = FieldPath>) -> Self {
        self.deletions.extend(paths);
        self
    }

    /// Keep only the listed keys of `metadata.annotations`. The map itself
    /// is removed once nothing is left in it.
    pub fn retaining_annotations<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retained_annotations
            .get_or_insert_with(Vec::new)
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn apply(&self, doc: &mut Value) {
        let mut deletions: Vec<&FieldPath> = self.deletions.iter().collect();
        deletions.sort_unstable_by(|a, b| b.cmp(a));
        deletions.dedup();
        for path in deletions {
            delete_path(doc, path.segments());
        }

        let Some(retained) = &self.retained_annotations else {
            return;
        };
        let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) else {
            return;
        };
        if let Some(Value::Object(annotations)) = metadata.get_mut("annotations") {
            annotations.retain(|key, _| retained.contains(key));
        }
        let empty = match metadata.get("annotations") {
            Some(Value::Object(annotations)) => annotations.is_empty(),
            Some(Value::Null) => true,
            _ => false,
        };
        if empty {
            metadata.remove("annotations");
        }
    }
}

/// Delete the value at `path`, doing nothing if any step is missing or has
/// the wrong shape.
pub(crate) fn delete_path(doc: &mut Value, path: &[PathSegment]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        let next = match (segment, current) {
            (PathSegment::Key(k), Value::Object(map)) => map.get_mut(k),
            (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return,
        }
    }

    match (last, current) {
        (PathSegment::Key(k), Value::Object(map)) => {
            map.remove(k);
        }
        (PathSegment::Index(i), Value::Array(items)) if *i < items.len() => {
            items.remove(*i);
        }
        _ => {}
    }
}
