// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! CRM change-event envelope and kind enumeration.
//!
//! The wire form is JSON with camelCase keys (see the external contract);
//! binary-schema records decode into the same envelope after registry
//! validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated CRM event kinds.
///
/// The dotted wire names (`lead.created`, `opportunity.won`, …) are the
/// serde representation; unknown kinds fail deserialization and are treated
/// as permanent decode errors by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "lead.created")]
    LeadCreated,
    #[serde(rename = "lead.updated")]
    LeadUpdated,
    #[serde(rename = "lead.converted")]
    LeadConverted,
    #[serde(rename = "contact.created")]
    ContactCreated,
    #[serde(rename = "contact.updated")]
    ContactUpdated,
    #[serde(rename = "account.created")]
    AccountCreated,
    #[serde(rename = "account.updated")]
    AccountUpdated,
    #[serde(rename = "opportunity.created")]
    OpportunityCreated,
    #[serde(rename = "opportunity.updated")]
    OpportunityUpdated,
    #[serde(rename = "opportunity.won")]
    OpportunityWon,
    #[serde(rename = "opportunity.lost")]
    OpportunityLost,
    #[serde(rename = "activity.logged")]
    ActivityLogged,
}

impl EventKind {
    /// The staging table family this kind lands in.
    pub fn staging_kind(&self) -> StagingKind {
        match self {
            EventKind::LeadCreated | EventKind::LeadUpdated | EventKind::LeadConverted => {
                StagingKind::Lead
            }
            EventKind::ContactCreated | EventKind::ContactUpdated => StagingKind::Contact,
            EventKind::AccountCreated | EventKind::AccountUpdated => StagingKind::Account,
            EventKind::OpportunityCreated
            | EventKind::OpportunityUpdated
            | EventKind::OpportunityWon
            | EventKind::OpportunityLost => StagingKind::Opportunity,
            EventKind::ActivityLogged => StagingKind::Activity,
        }
    }

    /// Wire name (`lead.created`, …).
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::LeadCreated => "lead.created",
            EventKind::LeadUpdated => "lead.updated",
            EventKind::LeadConverted => "lead.converted",
            EventKind::ContactCreated => "contact.created",
            EventKind::ContactUpdated => "contact.updated",
            EventKind::AccountCreated => "account.created",
            EventKind::AccountUpdated => "account.updated",
            EventKind::OpportunityCreated => "opportunity.created",
            EventKind::OpportunityUpdated => "opportunity.updated",
            EventKind::OpportunityWon => "opportunity.won",
            EventKind::OpportunityLost => "opportunity.lost",
            EventKind::ActivityLogged => "activity.logged",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Staging table family, one per CRM entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingKind {
    Lead,
    Contact,
    Account,
    Opportunity,
    Activity,
}

crate::label_enum! {
    StagingKind {
        Lead => "lead",
        Contact => "contact",
        Account => "account",
        Opportunity => "opportunity",
        Activity => "activity",
    }
}

impl StagingKind {
    pub const ALL: [StagingKind; 5] = [
        StagingKind::Lead,
        StagingKind::Contact,
        StagingKind::Account,
        StagingKind::Opportunity,
        StagingKind::Activity,
    ];
}

/// Source metadata carried on every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub source: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// A CRM change event as produced externally.
///
/// Accepted once by the ingestion handler and never mutated thereafter.
/// `tenant_id` defaults to empty on the wire so a missing field surfaces as
/// a permanent ingestion failure rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: EventKind,
    #[serde(default)]
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
}

impl EventEnvelope {
    /// Millisecond epoch of the event's occurrence time.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.timestamp_millis().max(0) as u64
    }

    /// Correlation id, if the producer supplied one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata.correlation_id.as_deref()
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
