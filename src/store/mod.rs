//! Read-only boundary to the record store holding uploaded contacts.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::channel::Channel;
use crate::error::StoreError;
use crate::models::{ContactRecord, Dataset};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Most recently created first.
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// Largest offset the store accepts (Postgres `OFFSET` is a bigint).
pub const MAX_OFFSET: usize = i64::MAX as usize;

impl Page {
    /// Zero-based page index of fixed size. `None` when the offset would
    /// overflow or exceed [`MAX_OFFSET`].
    pub fn number(index: usize, size: usize) -> Option<Self> {
        index
            .checked_mul(size)
            .filter(|offset| *offset <= MAX_OFFSET)
            .map(|offset| Self {
                offset,
                limit: size,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Inclusive on both ends, applied to the channel's date column.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub dataset_id: Option<Uuid>,
    pub page: Option<Page>,
    pub order: Order,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            date_range: Some((start, end)),
            ..Self::default()
        }
    }

    pub fn dataset(dataset_id: Uuid, page: Page) -> Self {
        Self {
            dataset_id: Some(dataset_id),
            page: Some(page),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query_records(
        &self,
        channel: Channel,
        query: &RecordQuery,
    ) -> Result<Vec<ContactRecord>, StoreError>;

    /// All datasets, newest first.
    async fn query_datasets(&self) -> Result<Vec<Dataset>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_multiplies_index_by_size() {
        assert_eq!(
            Page::number(2, 50),
            Some(Page {
                offset: 100,
                limit: 50
            })
        );
        assert_eq!(Page::number(0, 50).map(|p| p.offset), Some(0));
    }

    #[test]
    fn huge_page_index_is_rejected_instead_of_overflowing() {
        assert_eq!(Page::number(usize::MAX.saturating_sub(1), 50), None);
        assert_eq!(Page::number(MAX_OFFSET / 50 + 1, 50), None);
        assert!(Page::number(MAX_OFFSET / 50, 50).is_some());
    }
}
