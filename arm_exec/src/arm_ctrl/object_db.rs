//! # Object database
//!
//! Maps the integer IDs used in action requests to human readable object
//! names.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{collections::BTreeMap, fmt};

use log::warn;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDb {
    objects: BTreeMap<i32, String>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ObjectDbError {
    #[error("Object ID {0} is already in the database as {1:?}")]
    Duplicate(i32, String),

    #[error("Object ID {0} is not in the database")]
    NotInDb(i32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ObjectDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the database from a parameter table of `name = id` entries.
    ///
    /// Entries whose value is not an integer, or whose ID is already taken,
    /// are skipped with a warning.
    pub fn from_table(table: &toml::value::Table) -> Self {
        let mut db = Self::new();

        for (name, value) in table.iter() {
            let id = match value.as_integer() {
                Some(i) if i >= i32::MIN as i64 && i <= i32::MAX as i64 => i as i32,
                _ => {
                    warn!("Object {:?} has an invalid ID ({}), skipping", name, value);
                    continue;
                }
            };

            if let Err(e) = db.insert(id, name) {
                warn!("{}, skipping {:?}", e, name);
            }
        }

        db
    }

    pub fn insert(&mut self, id: i32, name: &str) -> Result<(), ObjectDbError> {
        if let Some(existing) = self.objects.get(&id) {
            return Err(ObjectDbError::Duplicate(id, existing.clone()));
        }

        self.objects.insert(id, name.to_string());
        Ok(())
    }

    pub fn remove(&mut self, id: i32) -> Result<String, ObjectDbError> {
        self.objects.remove(&id).ok_or(ObjectDbError::NotInDb(id))
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.objects.get(&id).map(|n| n.as_str())
    }

    /// ID of the first object with the given name.
    pub fn id(&self, name: &str) -> Option<i32> {
        self.objects
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.objects.contains_key(&id)
    }

    /// The requested IDs which are in the database, in request order.
    pub fn filter(&self, ids: &[i32]) -> Vec<i32> {
        ids.iter().copied().filter(|id| self.contains(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Display for ObjectDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .objects
            .iter()
            .map(|(id, name)| format!("[{}] {}", id, name))
            .collect();

        write!(f, "{}", entries.join(", "))
    }
}
