use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Context;
use dashmap::DashMap;
use tracing::{debug, info};

use super::build::{build_routes, BuildOptions};
use super::load::load_schema;
use crate::output::OutputRegistry;
use crate::router::RouteTable;

#[derive(Clone)]
struct CachedTable {
    modified: Option<SystemTime>,
    table: Arc<RouteTable>,
}

/// Route tables derived from schema files, keyed by path and invalidated
/// when the file's modification time changes.
#[derive(Default)]
pub struct RouteCache {
    entries: DashMap<PathBuf, CachedTable>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table for `path`, rebuilding it if the file changed.
    pub fn get_or_load(
        &self,
        path: impl AsRef<Path>,
        options: &BuildOptions,
        outputs: &OutputRegistry,
    ) -> anyhow::Result<Arc<RouteTable>> {
        let path = path.as_ref();
        let modified = std::fs::metadata(path)
            .with_context(|| format!("reading schema metadata {}", path.display()))?
            .modified()
            .ok();

        if let Some(entry) = self.entries.get(path) {
            if entry.modified.is_some() && entry.modified == modified {
                debug!(schema = %path.display(), "Route cache hit");
                return Ok(Arc::clone(&entry.table));
            }
        }

        let document = load_schema(path)?;
        let table = Arc::new(
            build_routes(&document, options, outputs)
                .with_context(|| format!("building routes from {}", path.display()))?,
        );
        info!(schema = %path.display(), routes_count = table.len(), "Route cache refreshed");
        self.entries.insert(
            path.to_path_buf(),
            CachedTable {
                modified,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    pub fn invalidate(&self, path: impl AsRef<Path>) {
        self.entries.remove(path.as_ref());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SCHEMA: &str = r#"
openapi: 3.0.0
paths:
  /items/{id}:
    get:
      operationId: Items::show
"#;

    #[test]
    fn reuses_table_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.yaml");
        std::fs::write(&path, SCHEMA).unwrap();

        let cache = RouteCache::new();
        let outputs = OutputRegistry::with_defaults();
        let first = cache.get_or_load(&path, &BuildOptions::default(), &outputs).unwrap();
        let second = cache.get_or_load(&path, &BuildOptions::default(), &outputs).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let later = SystemTime::now() + Duration::from_secs(5);
        std::fs::write(&path, format!("{SCHEMA}  /health:\n    get:\n      operationId: Health::check\n")).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();

        let third = cache.get_or_load(&path, &BuildOptions::default(), &outputs).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.len(), 2);
        assert_eq!(cache.len(), 1);
    }
}
