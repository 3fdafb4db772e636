use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::{Serialize, Deserialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::providers::{ProviderMap, ProviderType};

use super::budget::{AlertLevel, BudgetAlert, BudgetLimits, BudgetStatus, BudgetWindow, WindowStatus};

/// One billed call. Entries are never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderType,
    pub model: String,
    pub cost: f64,
    pub tokens: u32,
    pub request_id: String,
    pub user_id: Option<String>,
}

/// Aggregated spend for one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderCostSummary {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub request_count: u64,
    pub avg_cost_per_request: f64,
    pub avg_cost_per_token: f64,
}

impl ProviderCostSummary {
    fn add(&mut self, entry: &CostEntry) {
        self.total_cost += entry.cost;
        self.total_tokens += entry.tokens as u64;
        self.request_count += 1;
    }

    fn finish(&mut self) {
        if self.request_count > 0 {
            self.avg_cost_per_request = self.total_cost / self.request_count as f64;
        }
        if self.total_tokens > 0 {
            self.avg_cost_per_token = self.total_cost / self.total_tokens as f64;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CostConfig {
    /// Entries older than this are dropped by the sweep
    pub retention: Duration,
    pub sweep_interval: StdDuration,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            retention: Duration::days(constants::COST_RETENTION_DAYS),
            sweep_interval: constants::COST_SWEEP_INTERVAL,
        }
    }
}

#[derive(Default)]
struct LedgerInner {
    entries: Vec<CostEntry>,
    budgets: ProviderMap<BudgetLimits>,
    alerts: Vec<BudgetAlert>,
    /// Thresholds already reported and not yet re-armed
    fired: HashSet<(ProviderType, BudgetWindow, AlertLevel)>,
}

impl LedgerInner {
    fn spent_since(&self, provider: ProviderType, since: DateTime<Utc>) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.provider == provider && e.timestamp > since)
            .map(|e| e.cost)
            .sum()
    }

    fn window_status(&self, provider: ProviderType, window: BudgetWindow, now: DateTime<Utc>) -> WindowStatus {
        let budget = self.budgets.get(provider).and_then(|b| b.limit(window));
        WindowStatus::new(self.spent_since(provider, window.start(now)), budget)
    }

    /// Emit an alert for every threshold newly crossed, re-arming those spend fell back under
    fn check_budgets(&mut self, provider: ProviderType, now: DateTime<Utc>) -> Vec<BudgetAlert> {
        let mut raised = Vec::new();
        for window in BudgetWindow::ALL {
            let status = self.window_status(provider, window, now);
            let (Some(budget), Some(percentage)) = (status.budget, status.percentage) else {
                continue;
            };

            for level in AlertLevel::ALL {
                let key = (provider, window, level);
                if percentage < level.threshold_percent() {
                    self.fired.remove(&key);
                    continue;
                }
                if !self.fired.insert(key) {
                    continue;
                }
                raised.push(BudgetAlert {
                    provider,
                    window,
                    level,
                    spent: status.spent,
                    budget,
                    percentage,
                    at: now,
                });
            }
        }
        self.alerts.extend(raised.iter().cloned());
        raised
    }
}

/// Append-only log of billed calls with per-provider budgets
pub struct CostLedger {
    config: CostConfig,
    inner: Mutex<LedgerInner>,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new(CostConfig::default())
    }
}

impl CostLedger {
    pub fn new(config: CostConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    pub async fn set_budget(&self, provider: ProviderType, limits: BudgetLimits) {
        info!("Budget set for {}: {:?}", provider, limits);
        self.inner.lock().await.budgets.insert(provider, limits);
    }

    /// Append a cost entry stamped now
    ///
    /// # Returns
    /// Alerts raised by this entry, already logged and stored
    pub async fn record(
        &self,
        provider: ProviderType,
        model: &str,
        cost: f64,
        tokens: u32,
        request_id: &str,
        user_id: Option<&str>,
    ) -> Vec<BudgetAlert> {
        self.record_entry(CostEntry {
            timestamp: Utc::now(),
            provider,
            model: model.to_string(),
            cost,
            tokens,
            request_id: request_id.to_string(),
            user_id: user_id.map(str::to_string),
        })
        .await
    }

    pub async fn record_entry(&self, entry: CostEntry) -> Vec<BudgetAlert> {
        let provider = entry.provider;
        debug!(
            "Recording cost ${:.6} for {} ({} tokens, request {})",
            entry.cost, provider, entry.tokens, entry.request_id
        );

        let mut inner = self.inner.lock().await;
        inner.entries.push(entry);
        let alerts = inner.check_budgets(provider, Utc::now());
        drop(inner);

        for alert in &alerts {
            match alert.level {
                AlertLevel::Warning => warn!("Budget alert: {}", alert),
                AlertLevel::Critical => error!("Budget alert: {}", alert),
            }
        }
        alerts
    }

    /// Per-provider totals over every retained entry
    pub async fn summary(&self) -> HashMap<ProviderType, ProviderCostSummary> {
        let inner = self.inner.lock().await;
        let mut summary: HashMap<ProviderType, ProviderCostSummary> = HashMap::new();
        for entry in &inner.entries {
            summary.entry(entry.provider).or_default().add(entry);
        }
        summary.values_mut().for_each(ProviderCostSummary::finish);
        summary
    }

    /// Total spend across every provider
    pub async fn total_cost(&self) -> f64 {
        self.inner.lock().await.entries.iter().map(|e| e.cost).sum()
    }

    pub async fn budget_status(&self, provider: ProviderType) -> BudgetStatus {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        BudgetStatus {
            provider,
            daily: inner.window_status(provider, BudgetWindow::Daily, now),
            weekly: inner.window_status(provider, BudgetWindow::Weekly, now),
            monthly: inner.window_status(provider, BudgetWindow::Monthly, now),
        }
    }

    /// Every alert raised so far, oldest first
    pub async fn alerts(&self) -> Vec<BudgetAlert> {
        self.inner.lock().await.alerts.clone()
    }

    pub async fn entries(&self) -> Vec<CostEntry> {
        self.inner.lock().await.entries.clone()
    }

    /// Spend attributed to `user_id`
    pub async fn user_cost(&self, user_id: &str) -> f64 {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .map(|e| e.cost)
            .sum()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop entries and alerts older than `cutoff`, returning how many entries were removed
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.timestamp >= cutoff);
        inner.alerts.retain(|a| a.at >= cutoff);
        before - inner.entries.len()
    }

    /// Drop entries past the retention period
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_before(Utc::now() - self.config.retention).await
    }
}

/// Periodically apply the retention policy until `shutdown` fires
pub fn spawn_cost_sweeper(ledger: Arc<CostLedger>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = ledger.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = ledger.sweep_expired().await;
                    if removed > 0 {
                        debug!("Cost retention sweep removed {} entries", removed);
                    }
                }
            }
        }
    })
}
