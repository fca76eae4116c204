//! Lazy wrapper over the filesystem: resolved once by stat at
//! creation, cached for the lifetime of the process.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::system::fs as sysfs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Regular,
    Folder,
    Missing,
}

#[derive(Debug)]
struct FileHandleData {
    path: PathBuf,
    kind: Kind,
    parent: Option<FileHandle>,
    children: HashMap<String, FileHandle>,
    lines: Option<Vec<String>>,
    attributes: HashMap<String, serde_json::Value>,
}

/// A handle to a path. Cheaply cloneable; clones share the same
/// underlying cached state.
#[derive(Debug, Clone)]
pub struct FileHandle(Rc<RefCell<FileHandleData>>);

impl FileHandle {
    /// Stat `path` once and wrap the result. ENOENT and any other stat
    /// failure both yield `Kind::Missing`.
    pub fn at(path: impl AsRef<Path>, parent: Option<FileHandle>) -> Self {
        let path = path.as_ref().to_path_buf();
        let kind = match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Kind::Folder,
            Ok(_) => Kind::Regular,
            Err(_) => Kind::Missing,
        };
        Self(Rc::new(RefCell::new(FileHandleData {
            path,
            kind,
            parent,
            children: HashMap::new(),
            lines: None,
            attributes: HashMap::new(),
        })))
    }

    pub fn path(&self) -> PathBuf {
        self.0.borrow().path.clone()
    }

    pub fn kind(&self) -> Kind {
        self.0.borrow().kind
    }

    pub fn exists(&self) -> bool {
        self.kind() != Kind::Missing
    }

    pub fn parent(&self) -> Option<FileHandle> {
        self.0.borrow().parent.clone()
    }

    /// The unique child handle for `segment`, re-statting only the
    /// first time it is requested.
    pub fn get_child(&self, segment: &str) -> FileHandle {
        if let Some(existing) = self.0.borrow().children.get(segment) {
            return existing.clone();
        }
        let child_path = self.0.borrow().path.join(segment);
        let child = FileHandle::at(child_path, Some(self.clone()));
        self.0
            .borrow_mut()
            .children
            .insert(segment.to_string(), child.clone());
        child
    }

    pub fn get_descendant<'a, I>(&self, segments: I) -> FileHandle
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = self.clone();
        for segment in segments {
            current = current.get_child(segment);
        }
        current
    }

    /// Read and memoize the file's lines (regular files only).
    pub fn read_lines(&self) -> Result<Vec<String>, Error> {
        if let Some(lines) = self.0.borrow().lines.clone() {
            return Ok(lines);
        }
        let path = self.0.borrow().path.clone();
        let content = sysfs::read_file(&path)?;
        let lines: Vec<String> = content.lines().map(String::from).collect();
        self.0.borrow_mut().lines = Some(lines.clone());
        Ok(lines)
    }

    pub fn mtime_millis(&self) -> Result<i64, Error> {
        sysfs::mtime_millis(&self.0.borrow().path)
    }

    /// Return a cached attribute if present in memory; otherwise
    /// compute it via `compute`. When `sticky`, consult and update the
    /// persistent cache keyed by `(path, mtime)` first.
    pub fn get_attribute<F>(
        &self,
        name: &str,
        sticky: bool,
        cache: &mut StickyCache,
        compute: F,
    ) -> Result<serde_json::Value, Error>
    where
        F: FnOnce() -> Result<serde_json::Value, Error>,
    {
        if let Some(value) = self.0.borrow().attributes.get(name) {
            return Ok(value.clone());
        }

        let path_key = self.0.borrow().path.display().to_string();

        if sticky {
            let mtime = self.mtime_millis()?;
            if let Some(cached) = cache.lookup(&path_key, mtime, name) {
                self.0
                    .borrow_mut()
                    .attributes
                    .insert(name.to_string(), cached.clone());
                return Ok(cached);
            }
        }

        let value = compute()?;
        self.0
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value.clone());

        if sticky {
            let mtime = self.mtime_millis()?;
            cache.store(path_key, mtime, name, value.clone());
        }

        Ok(value)
    }
}

/// Persistent cache mapping file path -> `{mtime, attr: value, ...}`.
/// Loaded from a Makefile's trailing `# META:` line and rewritten on
/// each successful emit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StickyCache {
    #[serde(flatten)]
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheEntry {
    mtime: i64,
    #[serde(flatten)]
    attributes: HashMap<String, serde_json::Value>,
}

impl StickyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::ParseConfig("META cache".to_string(), e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // BTreeMap ensures canonical-sorted key order for deterministic output.
        let sorted: std::collections::BTreeMap<_, _> = self.entries.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
    }

    fn lookup(&self, path: &str, mtime: i64, attr: &str) -> Option<serde_json::Value> {
        let entry = self.entries.get(path)?;
        if entry.mtime != mtime {
            return None;
        }
        entry.attributes.get(attr).cloned()
    }

    fn store(&mut self, path: String, mtime: i64, attr: &str, value: serde_json::Value) {
        let entry = self.entries.entry(path).or_insert_with(|| CacheEntry {
            mtime,
            attributes: HashMap::new(),
        });
        entry.mtime = mtime;
        entry.attributes.insert(attr.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_has_missing_kind() {
        let handle = FileHandle::at("/nonexistent/path/for/mkmk/tests", None);
        assert_eq!(handle.kind(), Kind::Missing);
        assert!(!handle.exists());
    }

    #[test]
    fn child_lookup_is_memoized() {
        let dir = std::env::temp_dir();
        let handle = FileHandle::at(&dir, None);
        let a = handle.get_child("some-child-name");
        let b = handle.get_child("some-child-name");
        assert!(Rc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn meta_round_trips_through_json() {
        let mut cache = StickyCache::new();
        cache.store("a.c".to_string(), 123, "includes", serde_json::json!(["b.h"]));
        let json = cache.to_json();
        let reloaded = StickyCache::from_json(&json).unwrap();
        assert_eq!(reloaded.lookup("a.c", 123, "includes"), Some(serde_json::json!(["b.h"])));
        assert_eq!(reloaded.lookup("a.c", 124, "includes"), None);
    }
}
