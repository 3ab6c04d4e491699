//! Webhook alert transport. Posts the alert JSON to the ops channel bridge;
//! selected at boot when `ALERT_WEBHOOK_URL` is set.

use std::time::Duration;

use crate::error::DispatchError;

use super::{AlertDispatcher, SecurityAlert};

pub struct WebhookDispatcher {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self { client, url }
    }
}

impl AlertDispatcher for WebhookDispatcher {
    fn send(&self, alert: &SecurityAlert) -> Result<(), DispatchError> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map(|_| ())
            .map_err(DispatchError::Webhook)
    }
}
