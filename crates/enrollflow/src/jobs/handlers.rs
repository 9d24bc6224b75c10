// crates/enrollflow/src/jobs/handlers.rs
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::jobs::model::EnrollmentItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// The item is recorded in the job's `errors` list; the batch continues.
    Rejected(String),
    /// The whole job is marked failed with this message.
    Fatal(String),
}

impl ItemError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }
}

#[async_trait]
pub trait EnrollmentHandler: Send + Sync {
    async fn enroll(&self, item: &EnrollmentItem) -> Result<(), ItemError>;
}

/// In-memory group rosters. A student code can be enrolled once per group.
#[derive(Default)]
pub struct RosterHandler {
    groups: Mutex<HashMap<String, HashSet<String>>>,
}

impl RosterHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enrolled(&self, grupo: &str, codigo: &str) -> bool {
        self.groups
            .lock()
            .map(|g| g.get(grupo).is_some_and(|members| members.contains(codigo)))
            .unwrap_or(false)
    }

    pub fn group_size(&self, grupo: &str) -> usize {
        self.groups
            .lock()
            .map(|g| g.get(grupo).map_or(0, HashSet::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl EnrollmentHandler for RosterHandler {
    async fn enroll(&self, item: &EnrollmentItem) -> Result<(), ItemError> {
        let codigo = item.codigo.trim();
        let grupo = item.grupo.trim();

        if codigo.is_empty() {
            return Err(ItemError::rejected("codigo is required"));
        }
        if grupo.is_empty() {
            return Err(ItemError::rejected("grupo is required"));
        }

        let mut groups = self
            .groups
            .lock()
            .map_err(|_| ItemError::fatal("roster lock poisoned"))?;

        let members = groups.entry(grupo.to_string()).or_default();
        if !members.insert(codigo.to_string()) {
            return Err(ItemError::rejected("duplicate"));
        }
        Ok(())
    }
}
