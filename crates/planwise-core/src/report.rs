//! # Cost Report
//!
//! Yearly cost of each plan given the household's expected expenses.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Per Plan, Month by Month                        │
//! │                                                                         │
//! │   for month in 1..=12:                                                  │
//! │     for each expense active in month (id order):                        │
//! │        coverage = best match for (plan, expense.category)               │
//! │        term     = paid < deductible ? beforeDeductible                  │
//! │                                     : afterDeductible                   │
//! │        paid    += min(term.member_share(amount), oopMax - paid)         │
//! │                                                                         │
//! │   total = premium × 12 + paid - discount                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Coverage Precedence
//! 1. same plan and same category
//! 2. same plan, any category (`categoryId: null`)
//! 3. any plan, same category (`planId: null`)
//! 4. global (`planId: null`, `categoryId: null`)
//!
//! Coverages marked out-of-network are ignored and in-network limits apply.
//! Without a matching coverage the member pays the full amount. Family
//! plans use the family deductible and family out-of-pocket maximum.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Coverage, CoverageTerm, Entity, Expense, Plan, Record};

// =============================================================================
// Report Types
// =============================================================================

/// One row of the cost report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReportPlan {
    pub plan_id: String,
    pub name: String,
    /// Member's share of expenses after coverage and limits.
    pub expenses: Money,
    pub discount: Money,
    /// Premium × 12.
    pub premiums: Money,
    /// `premiums + expenses - discount`.
    pub total: Money,
}

// =============================================================================
// Report
// =============================================================================

/// Builds the cost report from any mix of records.
///
/// Tombstones are ignored. Rows are sorted cheapest first, ties by plan id.
pub fn cost_report<'a, I>(records: I) -> Vec<ReportPlan>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut plans: Vec<(&str, &Plan)> = Vec::new();
    let mut expenses: Vec<(&str, &Expense)> = Vec::new();
    let mut coverages: Vec<(&str, &Coverage)> = Vec::new();

    for record in records.into_iter().filter(|r| !r.is_deleted()) {
        match &record.entity {
            Entity::Plan(p) => plans.push((record.id(), p)),
            Entity::Expense(e) => expenses.push((record.id(), e)),
            Entity::Coverage(c) if c.is_in_network != Some(false) => {
                coverages.push((record.id(), c))
            }
            _ => {}
        }
    }

    expenses.sort_by(|a, b| a.0.cmp(b.0));
    coverages.sort_by(|a, b| a.0.cmp(b.0));
    let coverages: Vec<&Coverage> = coverages.into_iter().map(|(_, c)| c).collect();

    let mut rows: Vec<ReportPlan> = plans
        .into_iter()
        .map(|(plan_id, plan)| plan_row(plan_id, plan, &expenses, &coverages))
        .collect();

    rows.sort_by(|a, b| a.total.cmp(&b.total).then_with(|| a.plan_id.cmp(&b.plan_id)));
    rows
}

fn plan_row(
    plan_id: &str,
    plan: &Plan,
    expenses: &[(&str, &Expense)],
    coverages: &[&Coverage],
) -> ReportPlan {
    let family = plan.is_family_plan;
    let deductible = plan.in_network_limit.effective_deductible(family);
    let out_of_pocket_max = plan.in_network_limit.effective_out_of_pocket_max(family);

    let mut paid = Money::zero();
    for month in 1..=12u8 {
        for (_, expense) in expenses.iter().filter(|(_, e)| e.months.contains(&month)) {
            let coverage = best_coverage(coverages, plan_id, &expense.category_id);
            let term = match coverage {
                Some(c) if paid < deductible => c.before_deductible,
                Some(c) => c.after_deductible,
                None => CoverageTerm::default(),
            };

            let share = term.member_share(Money::from_dollars(expense.amount));
            let room = (out_of_pocket_max - paid).non_negative();
            paid += share.min(room);
        }
    }

    let premiums = plan.annual_premium();
    let discount = plan.discount();

    ReportPlan {
        plan_id: plan_id.to_string(),
        name: plan.name.clone(),
        expenses: paid,
        discount,
        premiums,
        total: premiums + paid - discount,
    }
}

/// Picks the most specific coverage for a plan/category pair.
fn best_coverage<'a>(
    coverages: &[&'a Coverage],
    plan_id: &str,
    category_id: &str,
) -> Option<&'a Coverage> {
    let rank = |c: &Coverage| -> Option<u8> {
        let plan = c.plan_id.as_deref();
        let category = c.category_id.as_deref();
        match (plan, category) {
            (Some(p), Some(cat)) if p == plan_id && cat == category_id => Some(0),
            (Some(p), None) if p == plan_id => Some(1),
            (None, Some(cat)) if cat == category_id => Some(2),
            (None, None) => Some(3),
            _ => None,
        }
    };

    coverages
        .iter()
        .filter_map(|c| rank(*c).map(|r| (r, *c)))
        .min_by_key(|(r, _)| *r)
        .map(|(_, c)| c)
}

// =============================================================================
// Unit Tests
// =============================================================================
