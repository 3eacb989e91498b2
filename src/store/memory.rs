use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;

use super::{Order, RecordQuery, RecordStore};
use crate::channel::Channel;
use crate::error::StoreError;
use crate::models::{ContactRecord, Dataset};

/// In-process store with the same filter, order and paging rules as the
/// Postgres adapter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<Channel, Vec<ContactRecord>>,
    datasets: Vec<Dataset>,
    outages: AtomicUsize,
    broken: HashSet<Channel>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, records: impl IntoIterator<Item = ContactRecord>) -> Self {
        for record in records {
            self.records.entry(record.channel).or_default().push(record);
        }
        self
    }

    pub fn with_datasets(mut self, datasets: impl IntoIterator<Item = Dataset>) -> Self {
        self.datasets.extend(datasets);
        self
    }

    /// The next `count` record queries fail as if the store were unreachable.
    pub fn with_outages(self, count: usize) -> Self {
        self.outages.store(count, AtomicOrdering::SeqCst);
        self
    }

    /// Every query for `channel` fails with a non-transient error.
    pub fn with_broken_channel(mut self, channel: Channel) -> Self {
        self.broken.insert(channel);
        self
    }

    pub fn record_calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    fn take_outage(&self) -> bool {
        self.outages
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn query_records(
        &self,
        channel: Channel,
        query: &RecordQuery,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);

        if self.take_outage() {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        if self.broken.contains(&channel) {
            return Err(StoreError::Query(format!(
                "relation {} does not exist",
                channel.config().table
            )));
        }

        let mut matched: Vec<ContactRecord> = self
            .records
            .get(&channel)
            .map(|records| records.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|record| match query.date_range {
                Some((start, end)) => record.occurred_on >= start && record.occurred_on <= end,
                None => true,
            })
            .filter(|record| query.dataset_id.map_or(true, |id| record.dataset_id == id))
            .cloned()
            .collect();

        match query.order {
            Order::NewestFirst => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Order::OldestFirst => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }

        if let Some(page) = query.page {
            matched = matched
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .collect();
        }

        Ok(matched)
    }

    async fn query_datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        let mut datasets = self.datasets.clone();
        datasets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(datasets)
    }
}
