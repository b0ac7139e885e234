//! Sorting of the actions into q-tile categories.
//!
//! The category limits are the empirical quantiles of each criterion. An
//! action belongs to a category when it outranks the lower limit and is not
//! outranked by the upper limit (or the converse in the upper-closed case).

use std::collections::HashMap;

use log::{debug, info, warn};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;
use crate::digraph::ActionId;
use crate::outranking::Comparator;
use crate::tableau::*;
use crate::valuation::{Valuation, ValuationDomain};

/// A q-tile category. `index` starts at 1.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct Category {
    pub index: usize,
    pub low_quantile: Decimal,
    pub high_quantile: Decimal,
}

/// How far an action fits in one category.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CategoryMembership {
    pub low: Valuation,
    pub not_high: Valuation,
    /// `min(low, not_high)`
    pub membership: Valuation,
}

/// The categories of one action: `[low_category, high_category]`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ActionSorting {
    pub action: ActionId,
    pub low_category: usize,
    pub high_category: usize,
    pub credibility: Valuation,
    pub low_limit: Valuation,
    pub not_high_limit: Valuation,
}

/// The result of a quantiles sorting. Valuations are normalized.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuantilesSorting {
    quantiles: usize,
    lower_closed: bool,
    actions: Vec<ActionId>,
    positions: HashMap<ActionId, usize>,
    // [k][criterion], k = 0..=q
    limits: Vec<Vec<Evaluation>>,
    // [action][category - 1]
    memberships: Vec<Vec<CategoryMembership>>,
    sortings: Vec<ActionSorting>,
}

impl QuantilesSorting {
    pub fn quantiles(&self) -> usize {
        self.quantiles
    }

    pub fn lower_closed(&self) -> bool {
        self.lower_closed
    }

    pub fn valuation_domain(&self) -> ValuationDomain {
        ValuationDomain::NORMALIZED
    }

    pub fn categories(&self) -> Vec<Category> {
        let q = Decimal::from(self.quantiles);
        (1..=self.quantiles)
            .map(|k| Category {
                index: k,
                low_quantile: Decimal::from(k - 1) / q,
                high_quantile: Decimal::from(k) / q,
            })
            .collect()
    }

    /// The limit profiles `L_0..L_q`, in criterion order.
    pub fn limits(&self) -> &[Vec<Evaluation>] {
        &self.limits
    }

    /// The sorted actions, in tableau order.
    pub fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    /// The sortings of all the actions, in tableau order.
    pub fn sortings(&self) -> &[ActionSorting] {
        &self.sortings
    }

    pub fn action_sorting(&self, action: &str) -> Option<&ActionSorting> {
        let x = self.positions.get(action)?;
        self.sortings.get(*x)
    }

    pub fn memberships(&self, action: &str) -> Option<&[CategoryMembership]> {
        let x = self.positions.get(action)?;
        self.memberships.get(*x).map(|m| m.as_slice())
    }

    /// The actions sorted into each category. An action spanning several
    /// categories appears in each of them.
    pub fn category_contents(&self) -> Vec<(Category, Vec<ActionId>)> {
        self.categories()
            .into_iter()
            .map(|c| {
                let members = self
                    .sortings
                    .iter()
                    .filter(|s| s.low_category <= c.index && c.index <= s.high_category)
                    .map(|s| s.action.clone())
                    .collect();
                (c, members)
            })
            .collect()
    }
}

/// The R type 7 quantile of sorted values: linear interpolation between the
/// order statistics at `(n - 1) p`.
pub fn r7_quantile(sorted: &[Decimal], p: Decimal) -> Option<Decimal> {
    let last = sorted.len().checked_sub(1)?;
    let h = Decimal::from(last) * p;
    let lo = h.floor().to_usize().unwrap_or(0).min(last);
    let frac = h - Decimal::from(lo);
    match sorted.get(lo + 1) {
        Some(next) if !frac.is_zero() => Some(sorted[lo] + frac * (*next - sorted[lo])),
        _ => Some(sorted[lo]),
    }
}

/// The limit profiles `L_0..L_q` of a tableau.
///
/// Quantiles are taken on the oriented values, so that `L_k` is always at
/// least as good as `L_{k-1}`. Criteria without any evaluation get missing
/// limits.
pub fn quantile_limits(tableau: &PerformanceTableau, quantiles: usize) -> Vec<Vec<Evaluation>> {
    let columns: Vec<Vec<Decimal>> = tableau
        .criteria()
        .iter()
        .enumerate()
        .map(|(g, c)| {
            let mut column: Vec<Decimal> = (0..tableau.order())
                .filter_map(|x| tableau.row(x)[g].value())
                .map(|v| c.orient(v))
                .collect();
            column.sort();
            column
        })
        .collect();
    let q = Decimal::from(quantiles);
    (0..=quantiles)
        .map(|k| {
            let p = Decimal::from(k) / q;
            tableau
                .criteria()
                .iter()
                .zip(columns.iter())
                .map(|(c, column)| match r7_quantile(column, p) {
                    Some(v) => Evaluation::Value(c.orient(v)),
                    None => Evaluation::Missing,
                })
                .collect()
        })
        .collect()
}

/// Sorts the actions of a tableau into q-tile categories.
#[derive(Debug, Clone)]
pub struct QuantilesSorter {
    sorting: SortingOptions,
    outranking: OutrankingOptions,
}

impl QuantilesSorter {
    pub fn new(
        sorting: &SortingOptions,
        outranking: &OutrankingOptions,
    ) -> OutrankingResult<QuantilesSorter> {
        ensure!(
            sorting.quantiles >= 2,
            InvalidQuantilesSnafu {
                quantiles: sorting.quantiles
            }
        );
        Ok(QuantilesSorter {
            sorting: *sorting,
            outranking: OutrankingOptions {
                normalized: true,
                ..outranking.clone()
            },
        })
    }

    pub fn sort(&self, tableau: &PerformanceTableau) -> OutrankingResult<QuantilesSorting> {
        info!(
            "sort: {} actions into {} categories, lower closed: {}",
            tableau.order(),
            self.sorting.quantiles,
            self.sorting.lower_closed
        );
        run_in_pool(self.outranking.threads, || self.sort_in_current_pool(tableau))
    }

    pub(crate) fn sort_in_current_pool(
        &self,
        tableau: &PerformanceTableau,
    ) -> OutrankingResult<QuantilesSorting> {
        let q = self.sorting.quantiles;
        let limits = quantile_limits(tableau, q);
        debug!("sort: limits: {:?}", limits);
        let coalition: Vec<usize> = (0..tableau.criteria().len()).collect();
        let comparator = Comparator::new(tableau, &coalition, &self.outranking)?;
        let domain = comparator.domain();

        let memberships: Vec<Vec<CategoryMembership>> = (0..tableau.order())
            .into_par_iter()
            .map(|x| -> OutrankingResult<Vec<CategoryMembership>> {
                check_cancel(&self.outranking.cancel)
                    .map_err(in_task(format!("action {}", tableau.actions()[x].id)))?;
                let row = tableau.row(x);
                let outranks = |k: usize| comparator.compare(row, &limits[k]).value;
                let outranked = |k: usize| comparator.compare(&limits[k], row).value;
                Ok((1..=q)
                    .map(|k| {
                        let (low, not_high) = if self.sorting.lower_closed {
                            let not_high = if k == q {
                                domain.max()
                            } else {
                                domain.negate(outranks(k))
                            };
                            (outranks(k - 1), not_high)
                        } else {
                            let low = if k == 1 {
                                domain.max()
                            } else {
                                domain.negate(outranked(k - 1))
                            };
                            (low, outranked(k))
                        };
                        CategoryMembership {
                            low,
                            not_high,
                            membership: low.min(not_high),
                        }
                    })
                    .collect())
            })
            .collect::<OutrankingResult<_>>()?;

        let sortings = tableau
            .actions()
            .iter()
            .zip(memberships.iter())
            .map(|(a, m)| assign(&a.id, m, &domain))
            .collect();
        let actions = tableau.action_ids();
        let positions = actions
            .iter()
            .enumerate()
            .map(|(x, a)| (a.clone(), x))
            .collect();
        Ok(QuantilesSorting {
            quantiles: q,
            lower_closed: self.sorting.lower_closed,
            actions,
            positions,
            limits,
            memberships,
            sortings,
        })
    }
}

fn assign(
    action: &str,
    memberships: &[CategoryMembership],
    domain: &ValuationDomain,
) -> ActionSorting {
    let members: Vec<usize> = memberships
        .iter()
        .enumerate()
        .filter(|(_, m)| m.membership >= domain.med())
        .map(|(i, _)| i)
        .collect();
    let (lo, hi) = match (members.first(), members.last()) {
        (Some(lo), Some(hi)) => (*lo, *hi),
        _ => {
            // Highest membership, lowest category on ties.
            let mut best = 0;
            for (i, m) in memberships.iter().enumerate() {
                if m.membership > memberships[best].membership {
                    best = i;
                }
            }
            warn!(
                "assign: action {} fits no category, assigned to category {}",
                action,
                best + 1
            );
            (best, best)
        }
    };
    let low_limit = memberships[lo].low;
    let not_high_limit = memberships[hi].not_high;
    ActionSorting {
        action: action.to_string(),
        low_category: lo + 1,
        high_category: hi + 1,
        credibility: low_limit.min(not_high_limit),
        low_limit,
        not_high_limit,
    }
}
