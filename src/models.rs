use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::Channel;

/// One uploaded contact row, normalized across channels.
///
/// `outcomes` holds the channel's outcome columns as text (`status`,
/// `opened`, `rsvp_status`, ...) keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub channel: Channel,
    pub contact: String,
    pub facet: Option<String>,
    pub occurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub outcomes: BTreeMap<String, String>,
}

impl ContactRecord {
    pub fn outcome(&self, field: &str) -> Option<&str> {
        self.outcomes.get(field).map(String::as_str)
    }
}

/// Campaign annotation attached to a dataset after upload. Display only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignSummary {
    pub title: String,
    pub description: String,
    pub objectives: String,
    pub target_audience: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: String,
    pub expected_outcomes: String,
    pub kpis: Vec<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub channel: Channel,
    pub row_count: i64,
    pub upload_date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub campaign_summary: Option<CampaignSummary>,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    /// Number of pages of `page_size` records, at least one.
    pub fn page_count(&self, page_size: usize) -> usize {
        let rows = usize::try_from(self.row_count).unwrap_or(0);
        rows.div_ceil(page_size.max(1)).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: usize,
}

/// Per-channel KPIs, recomputed on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMetrics {
    pub channel: Channel,
    pub total: usize,
    pub counts: Vec<StatusCount>,
    /// Primary rate first.
    pub rates: Vec<RateValue>,
    pub facets: Vec<String>,
    /// Record count per facet value, same order as `facets`.
    pub facet_counts: Vec<FacetCount>,
    pub recent_activity: Vec<ContactRecord>,
}

impl ChannelMetrics {
    /// Zeroed metrics for a channel, used when the store cannot be read.
    pub fn empty(channel: Channel) -> Self {
        let config = channel.config();
        Self {
            channel,
            total: 0,
            counts: config
                .counters
                .iter()
                .map(|counter| StatusCount {
                    label: counter.label.to_string(),
                    count: 0,
                })
                .collect(),
            rates: config
                .rates
                .iter()
                .map(|rate| RateValue {
                    name: rate.name.to_string(),
                    value: 0.0,
                })
                .collect(),
            facets: Vec::new(),
            facet_counts: Vec::new(),
            recent_activity: Vec::new(),
        }
    }

    pub fn primary_rate(&self) -> f64 {
        self.rates.first().map(|rate| rate.value).unwrap_or(0.0)
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.rates
            .iter()
            .find(|rate| rate.name == name)
            .map(|rate| rate.value)
    }

    pub fn count(&self, label: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|count| count.label == label)
            .map(|count| count.count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendValue {
    pub channel: Channel,
    pub rate: String,
    pub value: f64,
}

/// One weekly bucket of the trend series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub values: Vec<TrendValue>,
}

impl TrendPoint {
    pub fn value(&self, channel: Channel, rate: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|value| value.channel == channel && value.rate == rate)
            .map(|value| value.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total_contacts: usize,
    pub overall_performance: f64,
    pub top_channel: Channel,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn overall_performance_display(&self) -> String {
        format!("{:.1}", self.overall_performance)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_rows: i64,
    pub by_type: BTreeMap<Channel, usize>,
}
