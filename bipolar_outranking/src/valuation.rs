//! The bipolar valuation domain `[Min, Med, Max]` and its epistemic operators.
//!
//! A value above `Med` validates a statement, a value below invalidates it and
//! `Med` itself is the indeterminate value. The operators below are n-ary:
//! they look at all the terms at once and must not be folded pairwise.

use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;

/// A characteristic value of the outranking relation.
pub type Valuation = Decimal;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Polarity {
    Validated,
    Indeterminate,
    Invalidated,
}

/// A closed interval `[min, max]` with its median.
///
/// Invariant: `min < max` and `med = (min + max) / 2` exactly.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct ValuationDomain {
    min: Valuation,
    med: Valuation,
    max: Valuation,
}

impl ValuationDomain {
    /// The normalized domain `[-1, 0, 1]`.
    pub const NORMALIZED: ValuationDomain = ValuationDomain {
        min: Decimal::NEGATIVE_ONE,
        med: Decimal::ZERO,
        max: Decimal::ONE,
    };

    pub fn new(min: Valuation, max: Valuation) -> OutrankingResult<ValuationDomain> {
        ensure!(min < max, InvalidDomainSnafu { min, max });
        Ok(ValuationDomain {
            min,
            med: (min + max) / Decimal::TWO,
            max,
        })
    }

    pub fn normalized() -> ValuationDomain {
        ValuationDomain::NORMALIZED
    }

    pub fn min(&self) -> Valuation {
        self.min
    }

    pub fn med(&self) -> Valuation {
        self.med
    }

    pub fn max(&self) -> Valuation {
        self.max
    }

    pub fn amplitude(&self) -> Valuation {
        self.max - self.min
    }

    pub fn is_normalized(&self) -> bool {
        *self == ValuationDomain::NORMALIZED
    }

    pub fn contains(&self, value: Valuation) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_median(&self, value: Valuation) -> bool {
        value == self.med
    }

    pub fn polarity(&self, value: Valuation) -> Polarity {
        if value > self.med {
            Polarity::Validated
        } else if value < self.med {
            Polarity::Invalidated
        } else {
            Polarity::Indeterminate
        }
    }

    /// The bipolar negation `Max + Min - value`.
    pub fn negate(&self, value: Valuation) -> Valuation {
        self.max + self.min - value
    }

    /// Affine recoding of `value` into the domain `to`.
    /// The bounds and the median are mapped exactly.
    pub fn recode(&self, value: Valuation, to: &ValuationDomain) -> Valuation {
        if self == to {
            value
        } else if value == self.max {
            to.max
        } else if value == self.min {
            to.min
        } else if value == self.med {
            to.med
        } else {
            to.min + (value - self.min) * to.amplitude() / self.amplitude()
        }
    }

    pub fn omax(&self, terms: &[Valuation]) -> Valuation {
        omax(self.med, terms)
    }

    pub fn omin(&self, terms: &[Valuation]) -> Valuation {
        omin(self.med, terms)
    }

    pub fn symmetric_average(&self, terms: &[Valuation], weights: Option<&[Valuation]>) -> Valuation {
        symmetric_average(self.med, terms, weights)
    }
}

/// Epistemic disjunction.
///
/// Terms equal to `med` are ignored. If only positive terms remain, the result
/// is their maximum; if only negative terms remain, their minimum. Any
/// conflict (or no term at all) is indeterminate.
pub fn omax(med: Valuation, terms: &[Valuation]) -> Valuation {
    let mut positive: Option<Valuation> = None;
    let mut negative: Option<Valuation> = None;
    for &t in terms {
        if t > med {
            positive = Some(positive.map_or(t, |p| p.max(t)));
        } else if t < med {
            negative = Some(negative.map_or(t, |n| n.min(t)));
        }
    }
    match (positive, negative) {
        (Some(p), None) => p,
        (None, Some(n)) => n,
        _ => med,
    }
}

/// Epistemic conjunction.
///
/// Any conflict between positive and negative terms, or any indeterminate
/// term, gives `med`. Otherwise only positive terms give their minimum and
/// only negative terms their maximum.
pub fn omin(med: Valuation, terms: &[Valuation]) -> Valuation {
    let mut positive: Option<Valuation> = None;
    let mut negative: Option<Valuation> = None;
    let mut indeterminate = false;
    for &t in terms {
        if t > med {
            positive = Some(positive.map_or(t, |p| p.min(t)));
        } else if t < med {
            negative = Some(negative.map_or(t, |n| n.max(t)));
        } else {
            indeterminate = true;
        }
    }
    match (positive, negative) {
        _ if indeterminate => med,
        (Some(p), None) => p,
        (None, Some(n)) => n,
        _ => med,
    }
}

/// Weighted mean of the terms, provided they all lie on the same side of `med`.
///
/// The mean is taken over the total weight: terms equal to `med` still count
/// in the denominator. Without weights, every term weighs one.
pub fn symmetric_average(
    med: Valuation,
    terms: &[Valuation],
    weights: Option<&[Valuation]>,
) -> Valuation {
    let weight = |i: usize| {
        weights
            .and_then(|w| w.get(i).copied())
            .unwrap_or(Decimal::ONE)
    };
    let mut total = Decimal::ZERO;
    let mut sum = Decimal::ZERO;
    let mut has_positive = false;
    let mut has_negative = false;
    for (i, &t) in terms.iter().enumerate() {
        let w = weight(i);
        total += w;
        sum += w * (t - med);
        has_positive |= t > med;
        has_negative |= t < med;
    }
    if total.is_zero() || has_positive == has_negative {
        return med;
    }
    med + sum / total
}
