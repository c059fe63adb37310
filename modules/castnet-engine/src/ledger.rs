//! Cross-run cost ledger.
//!
//! Each run seeds a ledger from the job-level total persisted in
//! search_params, appends entries as external calls complete, and folds the
//! result back via `record_benchmark` — totals only ever grow.

use castnet_common::CostEntry;

#[derive(Debug)]
pub struct CostLedger {
    entries: Vec<CostEntry>,
    run_total_usd: f64,
    job_total_usd: f64,
}

impl CostLedger {
    /// Start a run-scoped ledger from the previously persisted job total.
    pub fn seeded(job_total_usd: f64) -> Self {
        Self {
            entries: Vec::new(),
            run_total_usd: 0.0,
            job_total_usd,
        }
    }

    /// Append a cost entry. The total is quantity x unit_cost unless the
    /// vendor reported an explicit total (discounts, minimum charges).
    pub fn add_cost(
        &mut self,
        provider: &str,
        unit: &str,
        quantity: f64,
        unit_cost: f64,
        explicit_total: Option<f64>,
        note: Option<String>,
    ) {
        let total_cost = explicit_total.unwrap_or(quantity * unit_cost);
        self.run_total_usd += total_cost;
        self.job_total_usd += total_cost;
        self.entries.push(CostEntry {
            provider: provider.to_string(),
            unit: unit.to_string(),
            quantity,
            unit_cost,
            total_cost,
            note,
        });
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Spend accrued during this run only.
    pub fn run_total_usd(&self) -> f64 {
        self.run_total_usd
    }

    /// Lifetime job spend including previous runs.
    pub fn job_total_usd(&self) -> f64 {
        self.job_total_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_total_from_quantity_and_unit_cost() {
        let mut ledger = CostLedger::seeded(0.0);
        ledger.add_cost("scrapedeck", "compute_unit", 4.0, 0.05, None, None);
        assert_eq!(ledger.entries().len(), 1);
        assert!((ledger.run_total_usd() - 0.20).abs() < 1e-9);
    }

    #[test]
    fn explicit_total_overrides_unit_math() {
        let mut ledger = CostLedger::seeded(0.0);
        ledger.add_cost(
            "scrapedeck",
            "compute_unit",
            4.0,
            0.05,
            Some(0.15),
            Some("volume discount".to_string()),
        );
        assert!((ledger.entries()[0].total_cost - 0.15).abs() < 1e-9);
        assert!((ledger.run_total_usd() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn seeded_total_is_additive_across_runs() {
        let mut ledger = CostLedger::seeded(1.25);
        ledger.add_cost("scrapedeck", "compute_unit", 1.0, 0.10, None, None);
        assert!((ledger.job_total_usd() - 1.35).abs() < 1e-9);
        assert!((ledger.run_total_usd() - 0.10).abs() < 1e-9);
    }
}
