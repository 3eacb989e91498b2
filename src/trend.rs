use chrono::{Duration, NaiveDate};

use crate::aggregate::aggregate_channel;
use crate::channel::Channel;
use crate::models::{ContactRecord, TrendPoint, TrendValue};

pub const WEEKS: usize = 4;
const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
}

impl Bucket {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Four consecutive 7-day buckets, oldest first. Bucket `i` starts
/// `(3 - i) * 7` days before `today`, so the last bucket starts today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendWindow {
    buckets: [Bucket; WEEKS],
}

impl TrendWindow {
    pub fn ending(today: NaiveDate) -> Self {
        let buckets = std::array::from_fn(|i| {
            let start = today - Duration::days((WEEKS - 1 - i) as i64 * WEEK_DAYS);
            Bucket {
                start,
                end: start + Duration::days(WEEK_DAYS - 1),
            }
        });
        Self { buckets }
    }

    pub fn buckets(&self) -> &[Bucket; WEEKS] {
        &self.buckets
    }

    /// First and last day covered, inclusive.
    pub fn span(&self) -> (NaiveDate, NaiveDate) {
        (self.buckets[0].start, self.buckets[WEEKS - 1].end)
    }

    pub fn bucket_of(&self, date: NaiveDate) -> Option<usize> {
        self.buckets.iter().position(|bucket| bucket.contains(date))
    }
}

/// One point per bucket, each carrying every configured rate of every
/// channel. Empty buckets still produce a point with zero rates.
pub fn build_trends(
    window: &TrendWindow,
    records: &[(Channel, Vec<ContactRecord>)],
) -> Vec<TrendPoint> {
    window
        .buckets()
        .iter()
        .enumerate()
        .map(|(i, bucket)| {
            let mut values = Vec::new();
            for (channel, channel_records) in records {
                let in_bucket: Vec<ContactRecord> = channel_records
                    .iter()
                    .filter(|record| bucket.contains(record.occurred_on))
                    .cloned()
                    .collect();
                let metrics = aggregate_channel(channel.config(), &in_bucket);
                values.extend(metrics.rates.into_iter().map(|rate| TrendValue {
                    channel: *channel,
                    rate: rate.name,
                    value: rate.value,
                }));
            }

            TrendPoint {
                label: format!("Week {}", i + 1),
                week_start: bucket.start,
                week_end: bucket.end,
                values,
            }
        })
        .collect()
}
