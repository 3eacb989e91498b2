//! Channel KPIs computed from raw contact records.
//!
//! The pure functions here never fail. [`Aggregator`] wraps them around a
//! [`RecordStore`] and turns store failures into zeroed metrics plus a
//! notice, so callers always get something to render.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::channel::{Channel, ChannelConfig};
use crate::error::StoreError;
use crate::models::{
    ChannelMetrics, ContactRecord, Dataset, DatasetStats, FacetCount, RateValue, Report,
    StatusCount, TrendPoint,
};
use crate::report;
use crate::store::{Page, RecordQuery, RecordStore};
use crate::trend::{self, TrendWindow};

pub const RECENT_ACTIVITY: usize = 5;
pub const BROWSE_PAGE_SIZE: usize = 50;
/// Highest one-based page the record browser accepts.
pub const MAX_BROWSE_PAGE: u64 = 1_000_000;

/// `matching / total * 100`, or `0` when there is nothing to divide by.
pub fn rate(matching: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matching as f64 / total as f64 * 100.0
    }
}

pub fn aggregate_channel(config: &ChannelConfig, records: &[ContactRecord]) -> ChannelMetrics {
    let total = records.len();

    let counts: Vec<StatusCount> = config
        .counters
        .iter()
        .map(|counter| StatusCount {
            label: counter.label.to_string(),
            count: records
                .iter()
                .filter(|record| counter.matches(record.outcome(counter.field)))
                .count(),
        })
        .collect();

    let rates = config
        .rates
        .iter()
        .map(|rule| {
            let matching = counts
                .iter()
                .find(|count| count.label == rule.counter)
                .map(|count| count.count)
                .unwrap_or(0);
            RateValue {
                name: rule.name.to_string(),
                value: rate(matching, total),
            }
        })
        .collect();

    let facet_counts = facet_distribution(records);

    ChannelMetrics {
        channel: config.channel,
        total,
        counts,
        rates,
        facets: facet_counts.iter().map(|facet| facet.value.clone()).collect(),
        facet_counts,
        recent_activity: records.iter().take(RECENT_ACTIVITY).cloned().collect(),
    }
}

/// Record count per facet value, in first-seen order. Records without a
/// facet value are left out.
pub fn facet_distribution(records: &[ContactRecord]) -> Vec<FacetCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<FacetCount> = Vec::new();

    for facet in records
        .iter()
        .filter_map(|record| record.facet.as_deref())
        .filter(|facet| !facet.trim().is_empty())
    {
        match index.get(facet) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                index.insert(facet, counts.len());
                counts.push(FacetCount {
                    value: facet.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts
}

pub fn dataset_stats(datasets: &[Dataset]) -> DatasetStats {
    let mut stats = DatasetStats::default();
    for dataset in datasets {
        stats.total_rows += dataset.row_count;
        *stats.by_type.entry(dataset.channel).or_insert(0) += 1;
    }
    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Everything the dashboard shows for one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// One entry per channel, in [`Channel::ALL`] order.
    pub metrics: Vec<ChannelMetrics>,
    pub datasets: Vec<Dataset>,
    pub stats: DatasetStats,
    /// User-facing messages about data that could not be loaded.
    pub notices: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelMetrics> {
        self.metrics.iter().find(|metrics| metrics.channel == channel)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub points: Vec<TrendPoint>,
    pub notices: Vec<String>,
}

pub struct Aggregator<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: RecordStore> Aggregator<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::info!(what, attempt, ?delay, error = %err, "retrying store query");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch(
        &self,
        channel: Channel,
        query: &RecordQuery,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        self.with_retry(channel.as_str(), || self.store.query_records(channel, query))
            .await
    }

    /// Metrics for one channel; a store failure yields zeroed metrics and a notice.
    pub async fn channel_metrics(&self, channel: Channel) -> (ChannelMetrics, Option<String>) {
        match self.fetch(channel, &RecordQuery::all()).await {
            Ok(records) => (aggregate_channel(channel.config(), &records), None),
            Err(err) => {
                tracing::warn!(%channel, error = %err, "falling back to empty metrics");
                (
                    ChannelMetrics::empty(channel),
                    Some(format!(
                        "{} data could not be loaded ({err}); showing zeros.",
                        channel.display_name()
                    )),
                )
            }
        }
    }

    /// Dataset list only, without touching contact records.
    pub async fn datasets(&self) -> (Vec<Dataset>, Option<String>) {
        match self
            .with_retry("datasets", || self.store.query_datasets())
            .await
        {
            Ok(datasets) => (datasets, None),
            Err(err) => {
                tracing::warn!(error = %err, "falling back to empty dataset list");
                (
                    Vec::new(),
                    Some(format!("Datasets could not be loaded ({err}).")),
                )
            }
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let (linkedin, email, webinar, datasets) = tokio::join!(
            self.channel_metrics(Channel::Linkedin),
            self.channel_metrics(Channel::Email),
            self.channel_metrics(Channel::Webinar),
            self.datasets(),
        );

        let mut metrics = Vec::with_capacity(Channel::ALL.len());
        let mut notices = Vec::new();
        for (channel_metrics, notice) in [linkedin, email, webinar] {
            metrics.push(channel_metrics);
            notices.extend(notice);
        }
        let (datasets, notice) = datasets;
        notices.extend(notice);

        tracing::info!(
            contacts = metrics.iter().map(|m| m.total).sum::<usize>(),
            datasets = datasets.len(),
            degraded = notices.len(),
            "metrics snapshot ready"
        );

        Snapshot {
            stats: dataset_stats(&datasets),
            metrics,
            datasets,
            notices,
            fetched_at: Utc::now(),
        }
    }

    /// Weekly trend over the four buckets ending at `today`.
    pub async fn trends(&self, today: NaiveDate) -> TrendSeries {
        let window = TrendWindow::ending(today);
        let (start, end) = window.span();
        let query = RecordQuery::between(start, end);

        let (linkedin, email, webinar) = tokio::join!(
            self.fetch(Channel::Linkedin, &query),
            self.fetch(Channel::Email, &query),
            self.fetch(Channel::Webinar, &query),
        );

        let mut notices = Vec::new();
        let mut by_channel = Vec::with_capacity(Channel::ALL.len());
        for (channel, fetched) in Channel::ALL.into_iter().zip([linkedin, email, webinar]) {
            let records = fetched.unwrap_or_else(|err| {
                tracing::warn!(%channel, error = %err, "trend data unavailable");
                notices.push(format!(
                    "{} trend data could not be loaded ({err}).",
                    channel.display_name()
                ));
                Vec::new()
            });
            by_channel.push((channel, records));
        }

        TrendSeries {
            points: trend::build_trends(&window, &by_channel),
            notices,
        }
    }

    pub async fn report(&self, generated_at: DateTime<Utc>) -> (Report, Snapshot) {
        let snapshot = self.snapshot().await;
        let report = report::build_report(&snapshot.metrics, generated_at);
        (report, snapshot)
    }

    /// One page of a dataset's records, newest first. Page indexes are zero-based.
    pub async fn browse(
        &self,
        dataset: &Dataset,
        page: usize,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        let page = Page::number(page, BROWSE_PAGE_SIZE)
            .ok_or_else(|| StoreError::Query(format!("page {page} is out of range")))?;
        let query = RecordQuery::dataset(dataset.id, page);
        self.fetch(dataset.channel, &query).await
    }

    pub async fn find_dataset(&self, id: Uuid) -> Result<Option<Dataset>, StoreError> {
        let datasets = self
            .with_retry("datasets", || self.store.query_datasets())
            .await?;
        Ok(datasets.into_iter().find(|dataset| dataset.id == id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;
    use crate::channel::{EMAIL, LINKEDIN, WEBINAR};
    use crate::store::MemoryStore;

    pub(crate) fn contact(
        channel: Channel,
        n: u128,
        occurred_on: NaiveDate,
        facet: &str,
        outcomes: &[(&str, &str)],
    ) -> ContactRecord {
        ContactRecord {
            id: Uuid::from_u128(n),
            dataset_id: Uuid::from_u128(1_000 + channel as u128),
            channel,
            contact: format!("contact-{n}"),
            facet: Some(facet.to_string()),
            occurred_on,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + ChronoDuration::seconds(n as i64),
            outcomes: outcomes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
    }

    fn linkedin(n: u128, status: &str, company: &str) -> ContactRecord {
        contact(Channel::Linkedin, n, day(), company, &[("status", status)])
    }

    fn instant_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn rate_is_zero_without_records() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(25, 100), 25.0);
        assert!((rate(1, 3) - 33.333_333).abs() < 0.001);
    }

    #[test]
    fn rate_stays_within_percent_bounds() {
        for total in 0..=60 {
            for matching in 0..=total {
                let value = rate(matching, total);
                assert!((0.0..=100.0).contains(&value), "{matching}/{total} gave {value}");
            }
        }
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(7, 7), 100.0);
    }

    #[test]
    fn quarter_of_linkedin_requests_accepted() {
        let records: Vec<ContactRecord> = (0..100)
            .map(|n| linkedin(n, if n < 25 { "accepted" } else { "pending" }, "Acme"))
            .collect();
        let metrics = aggregate_channel(&LINKEDIN, &records);
        assert_eq!(metrics.total, 100);
        assert_eq!(metrics.count("accepted"), Some(25));
        assert_eq!(metrics.count("pending"), Some(75));
        assert_eq!(metrics.count("declined"), Some(0));
        assert_eq!(metrics.rate("acceptance"), Some(25.0));
        assert_eq!(metrics.primary_rate(), 25.0);
    }

    #[test]
    fn empty_channel_has_zero_rate() {
        let metrics = aggregate_channel(&LINKEDIN, &[]);
        assert_eq!(metrics, ChannelMetrics::empty(Channel::Linkedin));
        assert_eq!(metrics.primary_rate(), 0.0);
    }

    #[test]
    fn email_tracks_open_and_reply_rates() {
        let records = vec![
            contact(Channel::Email, 1, day(), "Launch", &[("opened", "true"), ("replied", "true")]),
            contact(Channel::Email, 2, day(), "Launch", &[("opened", "true"), ("replied", "false")]),
            contact(Channel::Email, 3, day(), "Renewal", &[("opened", "false"), ("replied", "false")]),
            contact(Channel::Email, 4, day(), "Renewal", &[("opened", "false"), ("replied", "false")]),
        ];
        let metrics = aggregate_channel(&EMAIL, &records);
        assert_eq!(metrics.rate("open"), Some(50.0));
        assert_eq!(metrics.rate("reply"), Some(25.0));
        assert_eq!(metrics.primary_rate(), 50.0);
        assert_eq!(metrics.facets, vec!["Launch", "Renewal"]);
    }

    #[test]
    fn webinar_partitions_rsvp_status() {
        let records = vec![
            contact(Channel::Webinar, 1, day(), "Fintech", &[("rsvp_status", "confirmed")]),
            contact(Channel::Webinar, 2, day(), "Fintech", &[("rsvp_status", "declined")]),
            contact(Channel::Webinar, 3, day(), "Retail", &[("rsvp_status", "pending")]),
            contact(Channel::Webinar, 4, day(), "Retail", &[("rsvp_status", "pending")]),
        ];
        let metrics = aggregate_channel(&WEBINAR, &records);
        assert_eq!(metrics.count("confirmed"), Some(1));
        assert_eq!(metrics.count("pending"), Some(2));
        assert_eq!(metrics.count("declined"), Some(1));
        assert_eq!(metrics.rate("rsvp"), Some(25.0));
    }

    #[test]
    fn facets_keep_first_seen_order_and_real_counts() {
        let records = vec![
            linkedin(1, "pending", "Globex"),
            linkedin(2, "pending", "Acme"),
            linkedin(3, "pending", "Globex"),
            linkedin(4, "pending", " "),
            linkedin(5, "pending", "Initech"),
        ];
        let metrics = aggregate_channel(&LINKEDIN, &records);
        assert_eq!(metrics.facets, vec!["Globex", "Acme", "Initech"]);
        let distribution = metrics.facet_counts;
        assert_eq!(distribution[0].count, 2);
        assert_eq!(distribution[1].count, 1);
        assert_eq!(distribution.len(), 3);
    }

    #[test]
    fn recent_activity_is_first_five_in_store_order() {
        let records: Vec<ContactRecord> = (0..8).map(|n| linkedin(n, "pending", "Acme")).collect();
        let metrics = aggregate_channel(&LINKEDIN, &records);
        let ids: Vec<Uuid> = metrics.recent_activity.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..5).map(Uuid::from_u128).collect::<Vec<_>>());
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn snapshot_uses_newest_records_for_recent_activity() {
        let store = MemoryStore::new().with_records((0..8).map(|n| linkedin(n, "accepted", "Acme")));
        let aggregator = Aggregator::new(store, instant_retry());
        let snapshot = aggregator.snapshot().await;
        let linkedin = snapshot.channel(Channel::Linkedin).unwrap();
        assert_eq!(linkedin.recent_activity.len(), RECENT_ACTIVITY);
        assert_eq!(linkedin.recent_activity[0].id, Uuid::from_u128(7));
        assert_eq!(linkedin.primary_rate(), 100.0);
        assert!(snapshot.notices.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_idempotent() {
        let store = MemoryStore::new().with_records(vec![
            linkedin(1, "accepted", "Acme"),
            linkedin(2, "declined", "Globex"),
            contact(Channel::Webinar, 3, day(), "Fintech", &[("rsvp_status", "confirmed")]),
        ]);
        let aggregator = Aggregator::new(store, instant_retry());
        let first = aggregator.snapshot().await;
        let second = aggregator.snapshot().await;
        assert_eq!(first.metrics, second.metrics);
    }

    #[tokio::test]
    async fn transient_outage_is_retried() {
        let store = MemoryStore::new()
            .with_records(vec![linkedin(1, "accepted", "Acme")])
            .with_outages(2);
        let aggregator = Aggregator::new(store, instant_retry());
        let (metrics, notice) = aggregator.channel_metrics(Channel::Linkedin).await;
        assert!(notice.is_none());
        assert_eq!(metrics.total, 1);
        assert_eq!(aggregator.store().record_calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_zeroes() {
        let store = MemoryStore::new()
            .with_records(vec![linkedin(1, "accepted", "Acme")])
            .with_outages(5);
        let aggregator = Aggregator::new(store, instant_retry());
        let (metrics, notice) = aggregator.channel_metrics(Channel::Linkedin).await;
        assert_eq!(metrics, ChannelMetrics::empty(Channel::Linkedin));
        assert!(notice.unwrap().starts_with("LinkedIn data could not be loaded"));
        assert_eq!(aggregator.store().record_calls(), 3);
    }

    #[tokio::test]
    async fn broken_channel_is_not_retried_and_others_still_load() {
        let store = MemoryStore::new()
            .with_records(vec![
                linkedin(1, "accepted", "Acme"),
                contact(Channel::Email, 2, day(), "Launch", &[("opened", "true")]),
            ])
            .with_broken_channel(Channel::Email);
        let aggregator = Aggregator::new(store, instant_retry());
        let snapshot = aggregator.snapshot().await;

        assert_eq!(snapshot.metrics.len(), 3);
        assert_eq!(snapshot.channel(Channel::Linkedin).unwrap().total, 1);
        assert_eq!(snapshot.channel(Channel::Email).unwrap().total, 0);
        assert_eq!(snapshot.notices.len(), 1);
        assert_eq!(aggregator.store().record_calls(), 3);
    }

    #[tokio::test]
    async fn dataset_stats_sum_rows_and_count_types() {
        let created = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let dataset = |n: u128, channel: Channel, rows: i64| Dataset {
            id: Uuid::from_u128(n),
            name: format!("dataset {n}"),
            channel,
            row_count: rows,
            upload_date: created,
            tags: vec![],
            campaign_summary: None,
            created_at: created + ChronoDuration::hours(n as i64),
        };
        let store = MemoryStore::new().with_datasets(vec![
            dataset(1, Channel::Linkedin, 120),
            dataset(2, Channel::Email, 300),
            dataset(3, Channel::Linkedin, 80),
        ]);
        let aggregator = Aggregator::new(store, instant_retry());
        let snapshot = aggregator.snapshot().await;

        assert_eq!(snapshot.datasets[0].id, Uuid::from_u128(3));
        assert_eq!(snapshot.stats.total_rows, 500);
        assert_eq!(snapshot.stats.by_type.get(&Channel::Linkedin), Some(&2));
        assert_eq!(snapshot.stats.by_type.get(&Channel::Webinar), None);

        let found = aggregator.find_dataset(Uuid::from_u128(2)).await.unwrap();
        assert_eq!(found.map(|d| d.channel), Some(Channel::Email));
    }

    #[tokio::test]
    async fn browse_pages_through_one_dataset() {
        let created = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let records: Vec<ContactRecord> = (0..60).map(|n| linkedin(n, "pending", "Acme")).collect();
        let dataset = Dataset {
            id: records[0].dataset_id,
            name: "outreach".to_string(),
            channel: Channel::Linkedin,
            row_count: 60,
            upload_date: created,
            tags: vec![],
            campaign_summary: None,
            created_at: created,
        };
        let aggregator = Aggregator::new(MemoryStore::new().with_records(records), instant_retry());

        let first = aggregator.browse(&dataset, 0).await.unwrap();
        let second = aggregator.browse(&dataset, 1).await.unwrap();
        assert_eq!(first.len(), BROWSE_PAGE_SIZE);
        assert_eq!(second.len(), 10);
        assert_eq!(second.last().map(|r| r.id), Some(Uuid::from_u128(0)));
    }

    #[tokio::test]
    async fn empty_store_report_flags_every_channel() {
        let aggregator = Aggregator::new(MemoryStore::new(), instant_retry());
        let generated = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let (report, snapshot) = aggregator.report(generated).await;

        assert!(snapshot.notices.is_empty());
        assert_eq!(report.total_contacts, 0);
        assert_eq!(report.overall_performance, 0.0);
        assert_eq!(report.top_channel, Channel::Linkedin);
        assert_eq!(
            report.recommendations,
            vec![
                LINKEDIN.recommendation.message.to_string(),
                EMAIL.recommendation.message.to_string(),
                WEBINAR.recommendation.message.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn dataset_listing_skips_contact_queries() {
        let created = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let store = MemoryStore::new()
            .with_records(vec![linkedin(1, "accepted", "Acme")])
            .with_datasets(vec![Dataset {
                id: Uuid::from_u128(1),
                name: "outreach".to_string(),
                channel: Channel::Linkedin,
                row_count: 1,
                upload_date: created,
                tags: vec![],
                campaign_summary: None,
                created_at: created,
            }]);
        let aggregator = Aggregator::new(store, instant_retry());

        let (datasets, notice) = aggregator.datasets().await;
        assert!(notice.is_none());
        assert_eq!(datasets.len(), 1);
        assert_eq!(dataset_stats(&datasets).total_rows, 1);
        assert_eq!(aggregator.store().record_calls(), 0);
    }

    #[tokio::test]
    async fn browse_rejects_page_beyond_offset_range() {
        let created = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let dataset = Dataset {
            id: Uuid::from_u128(1_000),
            name: "outreach".to_string(),
            channel: Channel::Linkedin,
            row_count: 1,
            upload_date: created,
            tags: vec![],
            campaign_summary: None,
            created_at: created,
        };
        let aggregator = Aggregator::new(
            MemoryStore::new().with_records(vec![linkedin(1, "pending", "Acme")]),
            instant_retry(),
        );

        let result = aggregator.browse(&dataset, usize::MAX - 1).await;
        assert!(matches!(result, Err(StoreError::Query(_))));
        assert_eq!(aggregator.store().record_calls(), 0);
    }
}
