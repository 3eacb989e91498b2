use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Order, RecordQuery, RecordStore};
use crate::channel::{Channel, ChannelConfig};
use crate::error::StoreError;
use crate::models::{CampaignSummary, ContactRecord, Dataset};

const SCHEMA: &str = "campaign_metrics";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Loads three demo datasets with records spread over the last five weeks.
    pub async fn seed(&self, today: NaiveDate) -> anyhow::Result<usize> {
        let datasets = [
            (
                Uuid::parse_str("6f1c2a8e-4b1d-4c55-9a4e-2f0d7b1c9e01")?,
                "Q3 founder outreach",
                Channel::Linkedin,
                vec!["outbound", "founders"],
            ),
            (
                Uuid::parse_str("9a3e7d40-1c6b-4f8e-b2d5-7e9c0a4f1b02")?,
                "September newsletter",
                Channel::Email,
                vec!["newsletter"],
            ),
            (
                Uuid::parse_str("c47b9e15-8d2a-4e3f-a6c1-0b5d8f2e7a03")?,
                "Scaling ops webinar",
                Channel::Webinar,
                vec!["webinar", "ops"],
            ),
        ];

        let mut inserted = 0usize;

        for (dataset_id, name, channel, tags) in datasets {
            let rows = seed_rows(channel, today);
            let tags: Vec<String> = tags.into_iter().map(str::to_string).collect();

            sqlx::query(
                r#"
                INSERT INTO campaign_metrics.datasets (id, name, type, row_count, tags)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, row_count = EXCLUDED.row_count, tags = EXCLUDED.tags
                "#,
            )
            .bind(dataset_id)
            .bind(name)
            .bind(channel.as_str())
            .bind(rows.len() as i64)
            .bind(&tags)
            .execute(&self.pool)
            .await?;

            for (index, row) in rows.into_iter().enumerate() {
                let id = Uuid::from_u128(dataset_id.as_u128() ^ (index as u128 + 1));
                let result = match channel {
                    Channel::Linkedin => {
                        sqlx::query(
                            r#"
                            INSERT INTO campaign_metrics.linkedin_contacts
                            (id, dataset_id, name, company, position, status, date_sent)
                            VALUES ($1, $2, $3, $4, $5, $6, $7)
                            ON CONFLICT (id) DO NOTHING
                            "#,
                        )
                        .bind(id)
                        .bind(dataset_id)
                        .bind(&row.contact)
                        .bind(row.facet)
                        .bind("Head of Growth")
                        .bind(row.outcome)
                        .bind(row.date)
                        .execute(&self.pool)
                        .await?
                    }
                    Channel::Email => {
                        sqlx::query(
                            r#"
                            INSERT INTO campaign_metrics.email_contacts
                            (id, dataset_id, email, campaign_name, opened, replied, date_sent)
                            VALUES ($1, $2, $3, $4, $5, $6, $7)
                            ON CONFLICT (id) DO NOTHING
                            "#,
                        )
                        .bind(id)
                        .bind(dataset_id)
                        .bind(&row.contact)
                        .bind(row.facet)
                        .bind(row.outcome != "unopened")
                        .bind(row.outcome == "replied")
                        .bind(row.date)
                        .execute(&self.pool)
                        .await?
                    }
                    Channel::Webinar => {
                        sqlx::query(
                            r#"
                            INSERT INTO campaign_metrics.webinar_attendees
                            (id, dataset_id, name, email, industry, rsvp_status, invited_date)
                            VALUES ($1, $2, $3, $4, $5, $6, $7)
                            ON CONFLICT (id) DO NOTHING
                            "#,
                        )
                        .bind(id)
                        .bind(dataset_id)
                        .bind(&row.contact)
                        .bind(format!("{}@example.com", row.contact.to_lowercase().replace(' ', ".")))
                        .bind(row.facet)
                        .bind(row.outcome)
                        .bind(row.date)
                        .execute(&self.pool)
                        .await?
                    }
                };

                if result.rows_affected() > 0 {
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }
}

struct SeedRow {
    contact: String,
    facet: &'static str,
    outcome: &'static str,
    date: NaiveDate,
}

fn seed_rows(channel: Channel, today: NaiveDate) -> Vec<SeedRow> {
    const NAMES: [&str; 6] = [
        "Avery Lee",
        "Jules Moreno",
        "Kiara Patel",
        "Noah Brandt",
        "Sofia Reyes",
        "Malik Osei",
    ];
    let (facets, outcomes): (&[&str], &[&str]) = match channel {
        Channel::Linkedin => (
            &["Northwind", "Globex", "Initech"],
            &["accepted", "pending", "declined", "pending", "accepted"],
        ),
        Channel::Email => (
            &["Autumn launch", "Renewal nudge"],
            &["opened", "unopened", "replied", "unopened"],
        ),
        Channel::Webinar => (
            &["Fintech", "Logistics", "Healthcare"],
            &["confirmed", "pending", "declined", "pending", "pending", "confirmed"],
        ),
    };

    (0..30)
        .map(|i| SeedRow {
            contact: format!("{} {}", NAMES[i % NAMES.len()], i / NAMES.len() + 1),
            facet: facets[i % facets.len()],
            outcome: outcomes[i % outcomes.len()],
            date: today - Duration::days((i as i64 * 5) % 35),
        })
        .collect()
}

fn record_sql(config: &ChannelConfig, query: &RecordQuery) -> String {
    let mut sql = format!(
        "SELECT id, dataset_id, {contact}::text AS contact, {facet}::text AS facet, \
         {date} AS occurred_on, created_at",
        contact = config.contact_field,
        facet = config.facet_field,
        date = config.date_field,
    );
    for field in config.outcome_fields() {
        sql.push_str(&format!(", {field}::text AS {field}"));
    }
    sql.push_str(&format!(" FROM {SCHEMA}.{} WHERE TRUE", config.table));

    let mut param = 0;
    if query.date_range.is_some() {
        sql.push_str(&format!(
            " AND {date} >= ${} AND {date} <= ${}",
            param + 1,
            param + 2,
            date = config.date_field
        ));
        param += 2;
    }
    if query.dataset_id.is_some() {
        param += 1;
        sql.push_str(&format!(" AND dataset_id = ${param}"));
    }

    sql.push_str(match query.order {
        Order::NewestFirst => " ORDER BY created_at DESC, id",
        Order::OldestFirst => " ORDER BY created_at ASC, id",
    });

    if let Some(page) = query.page {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
    }

    sql
}

fn decode_record(config: &ChannelConfig, row: &PgRow) -> Result<ContactRecord, StoreError> {
    let mut outcomes = BTreeMap::new();
    for field in config.outcome_fields() {
        let value: Option<String> = row.try_get(field)?;
        if let Some(value) = value {
            outcomes.insert(field.to_string(), value);
        }
    }

    Ok(ContactRecord {
        id: row.try_get("id")?,
        dataset_id: row.try_get("dataset_id")?,
        channel: config.channel,
        contact: row
            .try_get::<Option<String>, _>("contact")?
            .unwrap_or_default(),
        facet: row.try_get("facet")?,
        occurred_on: row.try_get("occurred_on")?,
        created_at: row.try_get("created_at")?,
        outcomes,
    })
}

fn decode_dataset(row: &PgRow) -> Result<Dataset, StoreError> {
    let kind: String = row.try_get("type")?;
    let channel = Channel::parse(&kind).ok_or_else(|| StoreError::Decode {
        field: "type".to_string(),
        reason: format!("unknown dataset type {kind:?}"),
    })?;
    let summary: Option<Json<CampaignSummary>> = row.try_get("campaign_summary")?;

    Ok(Dataset {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        channel,
        row_count: row.try_get("row_count")?,
        upload_date: row.try_get::<DateTime<Utc>, _>("upload_date")?,
        tags: row.try_get("tags")?,
        campaign_summary: summary.map(|Json(summary)| summary),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn query_records(
        &self,
        channel: Channel,
        query: &RecordQuery,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        let config = channel.config();
        let sql = record_sql(config, query);
        tracing::debug!(%channel, %sql, "querying records");

        let mut rows = sqlx::query(&sql);
        if let Some((start, end)) = query.date_range {
            rows = rows.bind(start).bind(end);
        }
        if let Some(dataset_id) = query.dataset_id {
            rows = rows.bind(dataset_id);
        }

        let fetched = rows.fetch_all(&self.pool).await?;
        fetched.iter().map(|row| decode_record(config, row)).collect()
    }

    async fn query_datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, type, row_count, upload_date, tags, campaign_summary, created_at
            FROM campaign_metrics.datasets
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_dataset).collect()
    }
}
