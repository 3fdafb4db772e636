use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use crate::constants;
use crate::providers::ProviderType;

/// Spend ceilings for one provider. Windows are rolling, not calendar aligned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
}

impl BudgetLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn daily(mut self, amount: f64) -> Self {
        self.daily = Some(amount);
        self
    }

    pub fn weekly(mut self, amount: f64) -> Self {
        self.weekly = Some(amount);
        self
    }

    pub fn monthly(mut self, amount: f64) -> Self {
        self.monthly = Some(amount);
        self
    }

    pub fn limit(&self, window: BudgetWindow) -> Option<f64> {
        match window {
            BudgetWindow::Daily => self.daily,
            BudgetWindow::Weekly => self.weekly,
            BudgetWindow::Monthly => self.monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_none() && self.weekly.is_none() && self.monthly.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    Daily,
    Weekly,
    Monthly,
}

impl BudgetWindow {
    pub const ALL: [BudgetWindow; 3] = [BudgetWindow::Daily, BudgetWindow::Weekly, BudgetWindow::Monthly];

    pub fn span(self) -> Duration {
        match self {
            BudgetWindow::Daily => Duration::days(1),
            BudgetWindow::Weekly => Duration::days(7),
            BudgetWindow::Monthly => Duration::days(30),
        }
    }

    /// Earliest timestamp that still counts toward this window
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.span()
    }
}

impl fmt::Display for BudgetWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetWindow::Daily => write!(f, "daily"),
            BudgetWindow::Weekly => write!(f, "weekly"),
            BudgetWindow::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 2] = [AlertLevel::Warning, AlertLevel::Critical];

    /// Percentage of the budget at which this level fires
    pub fn threshold_percent(self) -> f64 {
        match self {
            AlertLevel::Warning => constants::BUDGET_WARNING_PERCENT,
            AlertLevel::Critical => constants::BUDGET_CRITICAL_PERCENT,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Raised when spend in a window crosses a threshold. Alerts never block calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub provider: ProviderType,
    pub window: BudgetWindow,
    pub level: AlertLevel,
    pub spent: f64,
    pub budget: f64,
    pub percentage: f64,
    pub at: DateTime<Utc>,
}

impl fmt::Display for BudgetAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} budget {}: spent ${:.4} of ${:.4} ({:.1}%)",
            self.provider, self.window, self.level, self.spent, self.budget, self.percentage
        )
    }
}

/// Spend in one window against its ceiling, if any
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub spent: f64,
    pub budget: Option<f64>,
    pub percentage: Option<f64>,
}

impl WindowStatus {
    pub fn new(spent: f64, budget: Option<f64>) -> Self {
        let percentage = budget.map(|b| if b > 0.0 { spent * 100.0 / b } else if spent > 0.0 { f64::INFINITY } else { 0.0 });
        Self { spent, budget, percentage }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub provider: ProviderType,
    pub daily: WindowStatus,
    pub weekly: WindowStatus,
    pub monthly: WindowStatus,
}

impl BudgetStatus {
    pub fn window(&self, window: BudgetWindow) -> &WindowStatus {
        match window {
            BudgetWindow::Daily => &self.daily,
            BudgetWindow::Weekly => &self.weekly,
            BudgetWindow::Monthly => &self.monthly,
        }
    }
}
