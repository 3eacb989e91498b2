use std::fmt;

use serde::{Deserialize, Serialize};

/// Outreach channel a contact record belongs to.
///
/// The declaration order is also the tie-break order used when ranking
/// channels: LinkedIn before email before webinar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Linkedin,
    Email,
    Webinar,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Linkedin, Channel::Email, Channel::Webinar];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Linkedin => "linkedin",
            Channel::Email => "email",
            Channel::Webinar => "webinar",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Channel::Linkedin => "LinkedIn",
            Channel::Email => "Email",
            Channel::Webinar => "Webinar",
        }
    }

    pub fn parse(value: &str) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn config(self) -> &'static ChannelConfig {
        match self {
            Channel::Linkedin => &LINKEDIN,
            Channel::Email => &EMAIL,
            Channel::Webinar => &WEBINAR,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts records whose `field` holds one of `values`.
#[derive(Debug)]
pub struct Counter {
    pub label: &'static str,
    pub field: &'static str,
    pub values: &'static [&'static str],
}

impl Counter {
    /// Exact, case-sensitive match against the stored value.
    pub fn matches(&self, value: Option<&str>) -> bool {
        value.is_some_and(|value| self.values.contains(&value))
    }
}

/// A percentage derived from one counter over the channel total.
#[derive(Debug)]
pub struct RateRule {
    pub name: &'static str,
    pub counter: &'static str,
}

#[derive(Debug)]
pub struct Threshold {
    pub below: f64,
    pub message: &'static str,
}

/// Everything the aggregation code needs to know about a channel's schema.
#[derive(Debug)]
pub struct ChannelConfig {
    pub channel: Channel,
    pub table: &'static str,
    pub contact_field: &'static str,
    pub date_field: &'static str,
    pub facet_field: &'static str,
    pub facet_label: &'static str,
    pub total_label: &'static str,
    pub counters: &'static [Counter],
    /// First entry is the channel's primary rate.
    pub rates: &'static [RateRule],
    pub recommendation: Threshold,
}

impl ChannelConfig {
    pub fn counter(&self, label: &str) -> Option<&Counter> {
        self.counters.iter().find(|counter| counter.label == label)
    }

    pub fn primary_rate(&self) -> &RateRule {
        &self.rates[0]
    }

    /// Distinct outcome columns read from the store, in declaration order.
    pub fn outcome_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = Vec::new();
        for counter in self.counters {
            if !fields.contains(&counter.field) {
                fields.push(counter.field);
            }
        }
        fields
    }
}

pub static LINKEDIN: ChannelConfig = ChannelConfig {
    channel: Channel::Linkedin,
    table: "linkedin_contacts",
    contact_field: "name",
    date_field: "date_sent",
    facet_field: "company",
    facet_label: "companies",
    total_label: "sent",
    counters: &[
        Counter {
            label: "accepted",
            field: "status",
            values: &["accepted"],
        },
        Counter {
            label: "pending",
            field: "status",
            values: &["pending"],
        },
        Counter {
            label: "declined",
            field: "status",
            values: &["declined"],
        },
    ],
    rates: &[RateRule {
        name: "acceptance",
        counter: "accepted",
    }],
    recommendation: Threshold {
        below: 20.0,
        message: "LinkedIn acceptance rate is below average. Consider personalizing connection requests more.",
    },
};

pub static EMAIL: ChannelConfig = ChannelConfig {
    channel: Channel::Email,
    table: "email_contacts",
    contact_field: "email",
    date_field: "date_sent",
    facet_field: "campaign_name",
    facet_label: "campaigns",
    total_label: "sent",
    counters: &[
        Counter {
            label: "opened",
            field: "opened",
            values: &["true"],
        },
        Counter {
            label: "replied",
            field: "replied",
            values: &["true"],
        },
    ],
    rates: &[
        RateRule {
            name: "open",
            counter: "opened",
        },
        RateRule {
            name: "reply",
            counter: "replied",
        },
    ],
    recommendation: Threshold {
        below: 25.0,
        message: "Email open rates could be improved. Try A/B testing subject lines.",
    },
};

pub static WEBINAR: ChannelConfig = ChannelConfig {
    channel: Channel::Webinar,
    table: "webinar_attendees",
    contact_field: "name",
    date_field: "invited_date",
    facet_field: "industry",
    facet_label: "industries",
    total_label: "invited",
    counters: &[
        Counter {
            label: "confirmed",
            field: "rsvp_status",
            values: &["confirmed"],
        },
        Counter {
            label: "pending",
            field: "rsvp_status",
            values: &["pending"],
        },
        Counter {
            label: "declined",
            field: "rsvp_status",
            values: &["declined"],
        },
    ],
    rates: &[RateRule {
        name: "rsvp",
        counter: "confirmed",
    }],
    recommendation: Threshold {
        below: 15.0,
        message: "Webinar RSVP rates are low. Consider offering more compelling topics or incentives.",
    },
};

pub const ALL_PERFORMING_WELL: &str =
    "All channels are performing well! Continue current strategies.";
