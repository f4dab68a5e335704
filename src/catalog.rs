//! Named handle table: the sole cross-database shared resource
//! (spec.md §5, "A 'handle table' (hash map name→handle)"), surfaced
//! from the original's `lookup_db_name`/`add_db`/`del_db` (SPEC_FULL.md
//! §2).

use ffcat_error::{CatalogError, Result};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::database::Database;

/// Registry of open databases, keyed by name.
#[derive(Default)]
pub struct Catalog {
    databases: FxHashMap<String, Database>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh, empty database under `name`. `DuplicateError` if
    /// the name is already registered.
    pub fn add_db(&mut self, name: impl Into<String>) -> Result<&mut Database> {
        let name = name.into();
        if self.databases.contains_key(&name) {
            return Err(CatalogError::DuplicateError);
        }
        debug!(db = %name, "registering new database");
        let db = Database::new(name.clone());
        Ok(self.databases.entry(name).or_insert(db))
    }

    /// Look up an open database by name.
    pub fn lookup_db_name(&self, name: &str) -> Option<&Database> {
        trace!(db = %name, "handle table lookup");
        self.databases.get(name)
    }

    pub fn lookup_db_name_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.get_mut(name)
    }

    /// Remove a database from the table, returning it to the caller
    /// (e.g. to drop it, or to `save` it one last time).
    pub fn del_db(&mut self, name: &str) -> Result<Database> {
        self.databases.remove(name).ok_or(CatalogError::FindFail)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }
}
