//! Campaign metrics: channel KPIs, weekly trends and performance reports
//! computed from uploaded LinkedIn, email and webinar contact records.

pub mod aggregate;
pub mod board;
pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod store;
pub mod trend;

pub use aggregate::{Aggregator, RetryPolicy, Snapshot};
pub use channel::Channel;
pub use error::StoreError;
