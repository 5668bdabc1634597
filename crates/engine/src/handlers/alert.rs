// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `alert_evaluate`: evaluate a registered alert rule and dispatch to its
//! channels, recording a notification row per channel.

use crate::error::HandlerError;
use crate::handlers::seams::{AlertChannel, AlertFiring, Warehouse};
use crate::registry::{JobContext, JobHandler};
use async_trait::async_trait;
use serde::Deserialize;
use sift_core::Clock;
use sift_storage::{Notification, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Comparison operator for threshold rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Above,
    Below,
}

/// Rule semantics.
#[derive(Debug, Clone)]
pub enum AlertRuleKind {
    /// Trigger when the current value crosses a fixed threshold.
    Threshold { op: ThresholdOp, value: f64 },
    /// Trigger when the relative change against baseline exceeds `percent`.
    PercentChange { percent: f64 },
    /// Trigger when the current value deviates from the baseline mean by
    /// more than `sigma` standard deviations.
    Anomaly { sigma: f64 },
}

/// A registered alert definition.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub alert_id: String,
    pub name: String,
    pub current_statement: String,
    pub baseline_statement: Option<String>,
    pub stddev_statement: Option<String>,
    pub kind: AlertRuleKind,
    pub channels: Vec<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlertPayload {
    alert_id: String,
}

pub struct AlertEvaluateHandler<C: Clock> {
    store: Arc<Store>,
    warehouse: Arc<dyn Warehouse>,
    clock: C,
    rules: HashMap<String, AlertRule>,
    channels: HashMap<String, Arc<dyn AlertChannel>>,
}

impl<C: Clock> AlertEvaluateHandler<C> {
    pub fn new(
        store: Arc<Store>,
        warehouse: Arc<dyn Warehouse>,
        clock: C,
        rules: HashMap<String, AlertRule>,
        channels: HashMap<String, Arc<dyn AlertChannel>>,
    ) -> Self {
        Self { store, warehouse, clock, rules, channels }
    }

    async fn evaluate(&self, rule: &AlertRule) -> Result<(bool, f64, Option<f64>), HandlerError> {
        let current =
            self.warehouse.query_scalar(&rule.current_statement).await.map_err(HandlerError::from)?;

        let baseline = match &rule.baseline_statement {
            Some(statement) => {
                Some(self.warehouse.query_scalar(statement).await.map_err(HandlerError::from)?)
            }
            None => None,
        };

        let triggered = match &rule.kind {
            AlertRuleKind::Threshold { op, value } => match op {
                ThresholdOp::Above => current > *value,
                ThresholdOp::Below => current < *value,
            },
            AlertRuleKind::PercentChange { percent } => {
                let baseline = baseline.ok_or_else(|| {
                    HandlerError::Permanent("percent-change rule needs a baseline".to_string())
                })?;
                if baseline == 0.0 {
                    current != 0.0
                } else {
                    ((current - baseline) / baseline).abs() * 100.0 >= *percent
                }
            }
            AlertRuleKind::Anomaly { sigma } => {
                let mean = baseline.ok_or_else(|| {
                    HandlerError::Permanent("anomaly rule needs a baseline".to_string())
                })?;
                let stddev_statement = rule.stddev_statement.as_ref().ok_or_else(|| {
                    HandlerError::Permanent("anomaly rule needs a stddev statement".to_string())
                })?;
                let stddev = self
                    .warehouse
                    .query_scalar(stddev_statement)
                    .await
                    .map_err(HandlerError::from)?;
                stddev > 0.0 && (current - mean).abs() > sigma * stddev
            }
        };

        Ok((triggered, current, baseline))
    }
}

#[async_trait]
impl<C: Clock> JobHandler for AlertEvaluateHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let AlertPayload { alert_id } = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Permanent(format!("bad alert payload: {e}")))?;

        let rule = self
            .rules
            .get(&alert_id)
            .ok_or_else(|| HandlerError::Permanent(format!("unknown alert '{alert_id}'")))?;

        let (triggered, current, baseline) = self.evaluate(rule).await?;
        if !triggered {
            return Ok(serde_json::json!({ "alert_id": alert_id, "triggered": false }));
        }

        let firing = AlertFiring {
            alert_id: alert_id.clone(),
            name: rule.name.clone(),
            current,
            baseline,
            rule: format!("{:?}", rule.kind),
            tenant_id: rule.tenant_id.clone(),
        };

        let mut notified = 0usize;
        for channel_name in &rule.channels {
            let (delivered, detail) = match self.channels.get(channel_name) {
                Some(channel) => match channel.dispatch(&firing).await {
                    Ok(()) => (true, None),
                    Err(e) => {
                        warn!(alert = alert_id.as_str(), channel = channel_name.as_str(),
                              error = %e, "alert dispatch failed");
                        (false, Some(e.to_string()))
                    }
                },
                None => (false, Some(format!("channel '{channel_name}' not configured"))),
            };
            if delivered {
                notified += 1;
            }
            self.store
                .record_notification(Notification {
                    alert_id: alert_id.clone(),
                    channel: channel_name.clone(),
                    delivered,
                    dispatched_at_ms: self.clock.epoch_ms(),
                    detail,
                })
                .map_err(HandlerError::from)?;
        }

        info!(alert = %alert_id, current, notified, "alert triggered");
        Ok(serde_json::json!({
            "alert_id": alert_id,
            "triggered": true,
            "current": current,
            "notified": notified,
        }))
    }
}

#[cfg(test)]
#[path = "alert_tests.rs"]
mod tests;
