//! Threshold alerts on reachable measurements
//!
//! A rule is breached when the measured value is strictly greater than its limit. The alert
//! condition key is the metric name, so a device has at most one open alert per metric no
//! matter how often or how far the value keeps exceeding the limit. Severity is decided once,
//! at creation, and is never changed afterwards.

use serde::{Deserialize, Serialize};
use tracing::{error, instrument, trace};

use crate::Measurement;
use crate::events::AlertLedger;
use crate::storage::schema::{AlertSeverity, Device, NewAlert};

/// Values at or above this are critical, below are warnings
pub const CRITICAL_AT: f64 = 95.0;

pub fn severity_for(value: f64) -> AlertSeverity {
    if value < CRITICAL_AT {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub limit: f64,
}

impl ThresholdRule {
    pub fn new(metric: impl Into<String>, limit: f64) -> Self {
        Self {
            metric: metric.into(),
            limit,
        }
    }

    /// `cpu_usage` reads as `cpu usage`
    pub fn label(&self) -> String {
        self.metric.replace('_', " ")
    }

    pub fn breached_by(&self, value: f64) -> bool {
        value > self.limit
    }

    pub fn alert_for(&self, device: &Device, value: f64) -> NewAlert {
        let label = self.label();
        NewAlert {
            device_id: device.id,
            condition: self.metric.clone(),
            title: format!("High {label} on {}", device.name),
            description: format!("{label} is at {value:.1}% (threshold: {}%)", self.limit),
            severity: severity_for(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub rules: Vec<ThresholdRule>,
    /// Resolve an open threshold alert once the metric is back at or under its limit
    pub auto_resolve: bool,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                ThresholdRule::new("cpu_usage", 80.0),
                ThresholdRule::new("memory_usage", 85.0),
            ],
            auto_resolve: false,
        }
    }
}

/// What one evaluation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdOutcome {
    pub created: usize,
    pub resolved: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ThresholdEvaluator {
    policy: ThresholdPolicy,
    ledger: AlertLedger,
}

impl ThresholdEvaluator {
    pub fn new(policy: ThresholdPolicy, ledger: AlertLedger) -> Self {
        Self { policy, ledger }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Check every rule against a reachable measurement.
    ///
    /// Storage failures are logged per rule and do not stop the remaining rules.
    #[instrument(skip_all, fields(device = %device.name))]
    pub async fn evaluate(&self, device: &Device, measurement: &Measurement) -> ThresholdOutcome {
        let mut outcome = ThresholdOutcome::default();

        for rule in &self.policy.rules {
            let Some(value) = measurement.value_of(&rule.metric) else {
                trace!("no {} reading", rule.metric);
                continue;
            };

            if rule.breached_by(value) {
                match self
                    .ledger
                    .get_or_create(rule.alert_for(device, value), &device.name)
                    .await
                {
                    Ok((_, true)) => outcome.created += 1,
                    Ok((_, false)) => trace!("{} alert already open", rule.metric),
                    Err(e) => {
                        error!("failed to create {} alert: {e}", rule.metric);
                        outcome.failed += 1;
                    }
                }
            } else if self.policy.auto_resolve {
                match self.ledger.resolve(device.id, &rule.metric).await {
                    Ok(Some(_)) => outcome.resolved += 1,
                    Ok(None) => {}
                    Err(e) => {
                        error!("failed to resolve {} alert: {e}", rule.metric);
                        outcome.failed += 1;
                    }
                }
            }
        }

        outcome
    }
}
