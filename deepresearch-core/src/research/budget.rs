//! Budget tracking: consumed units, step count, and a per-category breakdown.
//!
//! All counters only ever grow. Each step costs at least one unit, so a run
//! with ceiling `B` takes at most `B` steps.

use crate::brain::ModelRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which collaborator consumed the units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostCategory {
    Decision,
    Evaluator,
    Search,
    Read,
    QueryRewriter,
    Dedup,
    ErrorAnalyzer,
    BeastMode,
    /// Floor charge for steps whose collaborators reported no usage.
    Overhead,
}

impl From<ModelRole> for CostCategory {
    fn from(role: ModelRole) -> Self {
        match role {
            ModelRole::Decision => CostCategory::Decision,
            ModelRole::Evaluator => CostCategory::Evaluator,
            ModelRole::QueryRewriter => CostCategory::QueryRewriter,
            ModelRole::Dedup => CostCategory::Dedup,
            ModelRole::ErrorAnalyzer => CostCategory::ErrorAnalyzer,
            ModelRole::BeastMode => CostCategory::BeastMode,
        }
    }
}

/// Read-only copy of the budget for progress reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
    pub steps: u64,
    pub breakdown: BTreeMap<CostCategory, u64>,
}

#[derive(Debug, Clone)]
pub struct BudgetTracker {
    ceiling: u64,
    consumed: u64,
    steps: u64,
    breakdown: BTreeMap<CostCategory, u64>,
}

impl BudgetTracker {
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            consumed: 0,
            steps: 0,
            breakdown: BTreeMap::new(),
        }
    }

    pub fn charge(&mut self, category: CostCategory, units: u64) {
        if units == 0 {
            return;
        }
        self.consumed = self.consumed.saturating_add(units);
        let slot = self.breakdown.entry(category).or_insert(0);
        *slot = slot.saturating_add(units);
    }

    /// Start a step and return its 1-based number.
    pub fn begin_step(&mut self) -> u64 {
        self.steps += 1;
        self.steps
    }

    /// Close a step that began when `consumed_at_start` units were used,
    /// topping it up to the one-unit minimum.
    pub fn finish_step(&mut self, consumed_at_start: u64) {
        if self.consumed <= consumed_at_start {
            self.charge(CostCategory::Overhead, 1);
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.ceiling
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.consumed)
    }

    pub fn spent_on(&self, category: CostCategory) -> u64 {
        self.breakdown.get(&category).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let percentage = if self.ceiling == 0 {
            100.0
        } else {
            (self.consumed as f64 / self.ceiling as f64 * 10_000.0).round() / 100.0
        };
        BudgetSnapshot {
            used: self.consumed,
            total: self.ceiling,
            percentage,
            steps: self.steps,
            breakdown: self.breakdown.clone(),
        }
    }
}
