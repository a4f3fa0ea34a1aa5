//! # Action database
//!
//! Maps action names to the handlers which perform them. Handlers are
//! reference counted so they can be called without holding the database lock.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{collections::BTreeMap, fmt, sync::Arc};

use comms_if::tc::arm_ctrl::{LIST_ACTIONS, LIST_OBJECTS};
use log::warn;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An action handler, returns `true` if the action succeeded.
pub type Handler<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

pub struct ActionDb<C> {
    actions: BTreeMap<String, Handler<C>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActionDbError {
    #[error("{0:?} is a reserved name and cannot be used as an action")]
    ProtectedKey(String),

    #[error("Action {0:?} is not in the database")]
    NotInDb(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<C> ActionDb<C> {
    pub fn new() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Insert a handler, replacing any handler already registered under the
    /// same name.
    pub fn insert<F>(&mut self, name: &str, handler: F) -> Result<(), ActionDbError>
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        if name == LIST_ACTIONS || name == LIST_OBJECTS {
            return Err(ActionDbError::ProtectedKey(name.to_string()));
        }

        if self
            .actions
            .insert(name.to_string(), Arc::new(handler))
            .is_some()
        {
            warn!("Overwriting existing action {:?}", name);
        }

        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), ActionDbError> {
        self.actions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ActionDbError::NotInDb(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Handler<C>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Call the handler registered under `name`.
    pub fn call(&self, name: &str, ctx: &C) -> Result<bool, ActionDbError> {
        match self.actions.get(name) {
            Some(h) => Ok(h(ctx)),
            None => Err(ActionDbError::NotInDb(name.to_string())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(|k| k.as_str())
    }
}

impl<C> Default for ActionDb<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Display for ActionDb<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_insert_call() {
        let mut db: ActionDb<Cell<u32>> = ActionDb::new();

        db.insert("count", |c| {
            c.set(c.get() + 1);
            true
        })
        .unwrap();
        db.insert("fail", |_| false).unwrap();

        let ctx = Cell::new(0);
        assert_eq!(db.call("count", &ctx), Ok(true));
        assert_eq!(db.call("count", &ctx), Ok(true));
        assert_eq!(ctx.get(), 2);
        assert_eq!(db.call("fail", &ctx), Ok(false));
        assert_eq!(
            db.call("fly", &ctx),
            Err(ActionDbError::NotInDb("fly".into()))
        );

        assert_eq!(db.to_string(), "count, fail");
    }

    #[test]
    fn test_protected_and_overwrite() {
        let mut db: ActionDb<()> = ActionDb::new();

        assert_eq!(
            db.insert(LIST_ACTIONS, |_| true),
            Err(ActionDbError::ProtectedKey(LIST_ACTIONS.into()))
        );
        assert!(db.insert(LIST_OBJECTS, |_| true).is_err());

        db.insert("home", |_| false).unwrap();
        db.insert("home", |_| true).unwrap();
        assert_eq!(db.call("home", &()), Ok(true));

        db.remove("home").unwrap();
        assert!(!db.contains("home"));
        assert!(db.remove("home").is_err());
    }
}
