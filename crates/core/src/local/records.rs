//! Waste-diary records and chunked filtering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// One diary entry as kept in the `waste-entries` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteEntry {
    pub id: String,
    pub category: String,
    pub weight_kg: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// What a client supplies when logging waste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWasteEntry {
    pub category: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewWasteEntry {
    pub fn new(category: impl Into<String>, weight_kg: f64) -> Self {
        Self { category: category.into(), weight_kg, note: None }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.category.trim().is_empty() {
            return Err(Error::InvalidInput("category cannot be empty".into()));
        }
        if !self.weight_kg.is_finite() || self.weight_kg <= 0.0 {
            return Err(Error::InvalidInput(format!("weight must be positive, got {}", self.weight_kg)));
        }
        Ok(())
    }
}

impl WasteEntry {
    /// Build a stored entry with a client-generated id.
    pub fn create(new: NewWasteEntry, now: DateTime<Utc>) -> Result<Self, Error> {
        new.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            category: new.category.trim().to_string(),
            weight_kg: new.weight_kg,
            created_at: now,
            note: new.note,
        })
    }
}

/// Filter `items`, at most `chunk_size` per scheduling slice.
///
/// Yields to the runtime between chunks so a large collection never holds the
/// executor for longer than one chunk.
pub async fn filter_chunked<T, F>(items: Vec<T>, chunk_size: usize, mut keep: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    let chunk_size = chunk_size.max(1);
    let mut kept = Vec::new();
    let mut iter = items.into_iter().peekable();

    while iter.peek().is_some() {
        kept.extend(iter.by_ref().take(chunk_size).filter(|item| keep(item)));
        if iter.peek().is_some() {
            tokio::task::yield_now().await;
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_validate() {
        assert!(NewWasteEntry::new("plastic_bottles", 0.5).validate().is_ok());
        assert!(NewWasteEntry::new(" ", 0.5).validate().is_err());
        assert!(NewWasteEntry::new("glass", 0.0).validate().is_err());
        assert!(NewWasteEntry::new("glass", f64::NAN).validate().is_err());
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let now = Utc::now();
        let a = WasteEntry::create(NewWasteEntry::new("paper", 1.0), now).unwrap();
        let b = WasteEntry::create(NewWasteEntry::new("paper", 1.0), now).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, now);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let entry = WasteEntry::create(NewWasteEntry::new("cans", 0.2), Utc::now()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("weightKg").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("note").is_none());
    }

    #[tokio::test]
    async fn test_filter_chunked_keeps_order() {
        let items: Vec<u32> = (0..10).collect();
        let evens = filter_chunked(items, 3, |n| n % 2 == 0).await;
        assert_eq!(evens, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn test_first_chunk_runs_before_other_tasks() {
        let other_ran = Arc::new(AtomicBool::new(false));
        let flag = other_ran.clone();
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let mut flags = Vec::new();
        filter_chunked((0..6).collect::<Vec<u32>>(), 3, |_| {
            flags.push(other_ran.load(Ordering::SeqCst));
            true
        })
        .await;

        assert_eq!(flags, vec![false, false, false, true, true, true]);
    }
}
