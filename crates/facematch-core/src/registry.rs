//! In-memory face registry.
//!
//! Records keep their insertion order for their whole lifetime. The registry
//! only grows by [`FaceRegistry::register`] and only shrinks by
//! [`FaceRegistry::delete`]; nothing reorders it.

use crate::types::{EncodedImage, FaceRecord};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name required")]
    NameRequired,
}

/// Ordered collection of registered faces with unique ids.
#[derive(Debug, Default, Clone)]
pub struct FaceRegistry {
    records: Vec<FaceRecord>,
}

impl FaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new face under a trimmed, non-empty name.
    pub fn register(
        &mut self,
        name: &str,
        image: EncodedImage,
    ) -> Result<FaceRecord, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::NameRequired);
        }

        let record = FaceRecord {
            id: self.fresh_id(),
            name: name.to_string(),
            image,
            registered_at: Utc::now(),
        };
        self.records.push(record.clone());

        tracing::info!(id = %record.id, name = %record.name, total = self.records.len(), "face registered");
        Ok(record)
    }

    /// Remove a face by id. Unknown ids are a no-op; returns whether a record was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before;
        if removed {
            tracing::info!(id, total = self.records.len(), "face deleted");
        }
        removed
    }

    pub fn list(&self) -> &[FaceRecord] {
        &self.records
    }

    /// Owned copy for a recognition attempt; later mutations don't affect it.
    pub fn snapshot(&self) -> Vec<FaceRecord> {
        self.records.clone()
    }

    pub fn get(&self, id: &str) -> Option<&FaceRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}
