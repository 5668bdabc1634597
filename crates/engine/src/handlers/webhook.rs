// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Webhook notification channel.

use crate::handlers::seams::{AlertChannel, AlertFiring};
use async_trait::async_trait;
use sift_core::CoreError;
use std::time::Duration;

/// Posts alert firings as JSON to a configured URL.
pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self { name: name.into(), url: url.into(), client }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, firing: &AlertFiring) -> Result<(), CoreError> {
        let response = self
            .client
            .post(&self.url)
            .json(firing)
            .send()
            .await
            .map_err(|e| CoreError::transport(format!("webhook send: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::transport(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
