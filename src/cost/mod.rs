//! Spend tracking: an append-only ledger of billed calls, per-provider
//! summaries, and rolling budget windows that raise alerts at 80% and 95%.

pub mod budget;
pub mod ledger;

pub use budget::{AlertLevel, BudgetAlert, BudgetLimits, BudgetStatus, BudgetWindow, WindowStatus};
pub use ledger::{CostConfig, CostEntry, CostLedger, ProviderCostSummary, spawn_cost_sweeper};
