//! Latest-result-wins publication of dashboard snapshots.
//!
//! Each refresh takes a ticket before it starts querying. A finished refresh
//! only replaces the published snapshot if no newer ticket has published in
//! the meantime, so a slow early fetch can never overwrite a later one.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::aggregate::{Aggregator, Snapshot};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub ticket: Ticket,
    pub snapshot: Snapshot,
}

pub struct MetricsBoard {
    next: AtomicU64,
    tx: watch::Sender<Option<Published>>,
}

impl Default for MetricsBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            next: AtomicU64::new(1),
            tx,
        }
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns `false` when a newer refresh already published.
    pub fn publish(&self, ticket: Ticket, snapshot: Snapshot) -> bool {
        let accepted = self.tx.send_if_modified(|current| match current {
            Some(published) if published.ticket >= ticket => false,
            _ => {
                *current = Some(Published { ticket, snapshot });
                true
            }
        });
        if !accepted {
            tracing::debug!(ticket = ticket.0, "discarding stale metrics snapshot");
        }
        accepted
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.tx
            .borrow()
            .as_ref()
            .map(|published| published.snapshot.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Published>> {
        self.tx.subscribe()
    }

    /// Fetches a fresh snapshot and publishes it unless a newer one landed first.
    pub async fn refresh<S: RecordStore>(&self, aggregator: &Aggregator<S>) -> Option<Snapshot> {
        let ticket = self.begin();
        let snapshot = aggregator.snapshot().await;
        self.publish(ticket, snapshot.clone()).then_some(snapshot)
    }
}
