use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{rate, Snapshot};
use crate::channel::{Channel, ALL_PERFORMING_WELL};
use crate::models::{ChannelMetrics, Report, TrendPoint};

/// Builds the report from per-channel metrics.
///
/// `metrics` order is the tie-break order for the top channel: a later
/// channel only takes over with a strictly higher primary rate.
pub fn build_report(metrics: &[ChannelMetrics], generated_at: DateTime<Utc>) -> Report {
    let total_contacts = metrics.iter().map(|m| m.total).sum();
    let overall_performance = if metrics.is_empty() {
        0.0
    } else {
        metrics.iter().map(ChannelMetrics::primary_rate).sum::<f64>() / metrics.len() as f64
    };

    let mut top: Option<&ChannelMetrics> = None;
    for candidate in metrics {
        match top {
            Some(best) if candidate.primary_rate() > best.primary_rate() => top = Some(candidate),
            None => top = Some(candidate),
            _ => {}
        }
    }

    Report {
        total_contacts,
        overall_performance,
        top_channel: top.map(|m| m.channel).unwrap_or(Channel::Linkedin),
        recommendations: recommendations(metrics),
        generated_at,
    }
}

/// Every channel whose primary rate is under its threshold contributes its
/// advice; when none do, a single all-clear message is returned.
pub fn recommendations(metrics: &[ChannelMetrics]) -> Vec<String> {
    let mut advice: Vec<String> = metrics
        .iter()
        .filter_map(|m| {
            let threshold = &m.channel.config().recommendation;
            (m.primary_rate() < threshold.below).then(|| threshold.message.to_string())
        })
        .collect();

    if advice.is_empty() {
        advice.push(ALL_PERFORMING_WELL.to_string());
    }
    advice
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDocument<'a> {
    total_contacts: usize,
    overall_performance: String,
    top_performing_channel: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument<'a> {
    summary: SummaryDocument<'a>,
    recommendations: &'a [String],
    generated_at: String,
}

/// Downloadable JSON form: `summary`, `recommendations`, `generatedAt`.
pub fn render_json(report: &Report) -> serde_json::Result<String> {
    let document = ReportDocument {
        summary: SummaryDocument {
            total_contacts: report.total_contacts,
            overall_performance: report.overall_performance_display(),
            top_performing_channel: report.top_channel.display_name(),
        },
        recommendations: &report.recommendations,
        generated_at: report.generated_at.to_rfc3339(),
    };
    serde_json::to_string_pretty(&document)
}

pub fn render_markdown(report: &Report, snapshot: &Snapshot, trends: &[TrendPoint]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Campaign Performance Report");
    let _ = writeln!(output, "Generated at {}", report.generated_at.to_rfc3339());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Total contacts: {}", report.total_contacts);
    let _ = writeln!(
        output,
        "- Overall performance: {}%",
        report.overall_performance_display()
    );
    let _ = writeln!(
        output,
        "- Top performing channel: {}",
        report.top_channel.display_name()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Channels");
    for metrics in &snapshot.metrics {
        let config = metrics.channel.config();
        let counts: Vec<String> = metrics
            .counts
            .iter()
            .map(|count| format!("{} {}", count.count, count.label))
            .collect();
        let rates: Vec<String> = metrics
            .rates
            .iter()
            .map(|rate| format!("{} {:.1}%", rate.name, rate.value))
            .collect();
        let _ = writeln!(
            output,
            "- {}: {} {} ({}); {}; {} {}",
            metrics.channel.display_name(),
            metrics.total,
            config.total_label,
            counts.join(", "),
            rates.join(", "),
            metrics.facets.len(),
            config.facet_label
        );
    }

    for metrics in snapshot.metrics.iter().filter(|m| !m.facet_counts.is_empty()) {
        let config = metrics.channel.config();
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "## {} {}",
            metrics.channel.display_name(),
            capitalize(config.facet_label)
        );
        for facet in &metrics.facet_counts {
            let _ = writeln!(
                output,
                "- {}: {} ({:.1}%)",
                facet.value,
                facet.count,
                rate(facet.count, metrics.total)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");
    if trends.is_empty() {
        let _ = writeln!(output, "No trend data for this window.");
    } else {
        for point in trends {
            let values: Vec<String> = point
                .values
                .iter()
                .map(|v| format!("{} {} {:.1}%", v.channel.display_name(), v.rate, v.value))
                .collect();
            let _ = writeln!(
                output,
                "- {} ({} to {}): {}",
                point.label,
                point.week_start,
                point.week_end,
                values.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for recommendation in &report.recommendations {
        let _ = writeln!(output, "- {recommendation}");
    }

    let annotated: Vec<_> = snapshot
        .datasets
        .iter()
        .filter_map(|dataset| dataset.campaign_summary.as_ref().map(|s| (dataset, s)))
        .collect();
    if !annotated.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Campaigns");
        for (dataset, summary) in annotated {
            let title = if summary.title.is_empty() {
                dataset.name.as_str()
            } else {
                summary.title.as_str()
            };
            let _ = writeln!(output, "### {} ({})", title, dataset.channel.display_name());
            if !summary.description.is_empty() {
                let _ = writeln!(output, "{}", summary.description);
            }
            if !summary.objectives.is_empty() {
                let _ = writeln!(output, "- Objectives: {}", summary.objectives);
            }
            if !summary.target_audience.is_empty() {
                let _ = writeln!(output, "- Audience: {}", summary.target_audience);
            }
            if !summary.start_date.is_empty() || !summary.end_date.is_empty() {
                let _ = writeln!(
                    output,
                    "- Runs: {} to {}",
                    summary.start_date, summary.end_date
                );
            }
            if !summary.budget.is_empty() {
                let _ = writeln!(output, "- Budget: {}", summary.budget);
            }
            if !summary.expected_outcomes.is_empty() {
                let _ = writeln!(output, "- Expected outcomes: {}", summary.expected_outcomes);
            }
            if !summary.kpis.is_empty() {
                let _ = writeln!(output, "- KPIs: {}", summary.kpis.join(", "));
            }
            if !summary.notes.is_empty() {
                let _ = writeln!(output, "- Notes: {}", summary.notes);
            }
        }
    }

    if !snapshot.notices.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Data Notices");
        for notice in &snapshot.notices {
            let _ = writeln!(output, "- {notice}");
        }
    }

    output
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
