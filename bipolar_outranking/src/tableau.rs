// ********* Input data structures ***********

use std::collections::HashMap;
use std::fmt::Display;

use log::{debug, warn};
use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;

/// The numeric symbol that stands for a missing evaluation in the wire formats.
pub const DEFAULT_NA: Decimal = Decimal::from_parts(999, 0, 0, true, 0);

/// A decision alternative.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Action {
    pub id: String,
    pub name: Option<String>,
    pub comment: Option<String>,
}

impl Action {
    pub fn new(id: &str) -> Action {
        Action {
            id: id.to_string(),
            name: None,
            comment: None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PreferenceDirection {
    Max,
    Min,
}

impl PreferenceDirection {
    pub fn reversed(&self) -> PreferenceDirection {
        match self {
            PreferenceDirection::Max => PreferenceDirection::Min,
            PreferenceDirection::Min => PreferenceDirection::Max,
        }
    }
}

/// A threshold that depends on the magnitude of the evaluation:
/// `intercept + slope * |x|`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct AffineThreshold {
    pub intercept: Decimal,
    pub slope: Decimal,
}

impl AffineThreshold {
    pub fn new(intercept: Decimal, slope: Decimal) -> AffineThreshold {
        AffineThreshold { intercept, slope }
    }

    pub fn constant(intercept: Decimal) -> AffineThreshold {
        AffineThreshold::new(intercept, Decimal::ZERO)
    }

    pub fn at(&self, x: Decimal) -> Decimal {
        self.intercept + self.slope * x.abs()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ThresholdKind {
    Indifference,
    Preference,
    WeakPreference,
    Veto,
    WeakVeto,
}

impl ThresholdKind {
    pub const ALL: [ThresholdKind; 5] = [
        ThresholdKind::Indifference,
        ThresholdKind::Preference,
        ThresholdKind::WeakPreference,
        ThresholdKind::Veto,
        ThresholdKind::WeakVeto,
    ];
}

impl Display for ThresholdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ThresholdKind::Indifference => "ind",
            ThresholdKind::Preference => "pref",
            ThresholdKind::WeakPreference => "weakPreference",
            ThresholdKind::Veto => "veto",
            ThresholdKind::WeakVeto => "weakVeto",
        };
        write!(f, "{}", name)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Hash)]
pub struct Thresholds {
    pub ind: Option<AffineThreshold>,
    pub pref: Option<AffineThreshold>,
    /// Checked to lie between `ind` and `pref`. It does not enter the
    /// concordance computation.
    pub weak_preference: Option<AffineThreshold>,
    pub veto: Option<AffineThreshold>,
    pub weak_veto: Option<AffineThreshold>,
}

impl Thresholds {
    pub fn get(&self, kind: ThresholdKind) -> Option<AffineThreshold> {
        match kind {
            ThresholdKind::Indifference => self.ind,
            ThresholdKind::Preference => self.pref,
            ThresholdKind::WeakPreference => self.weak_preference,
            ThresholdKind::Veto => self.veto,
            ThresholdKind::WeakVeto => self.weak_veto,
        }
    }

    pub fn set(&mut self, kind: ThresholdKind, threshold: Option<AffineThreshold>) {
        match kind {
            ThresholdKind::Indifference => self.ind = threshold,
            ThresholdKind::Preference => self.pref = threshold,
            ThresholdKind::WeakPreference => self.weak_preference = threshold,
            ThresholdKind::Veto => self.veto = threshold,
            ThresholdKind::WeakVeto => self.weak_veto = threshold,
        }
    }
}

/// A point of view on the actions.
///
/// A negative weight reverses the preference direction when the tableau is
/// built: weights are non-negative inside a tableau.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Criterion {
    pub id: String,
    pub name: Option<String>,
    pub weight: Decimal,
    pub direction: PreferenceDirection,
    /// (low, high), low < high
    pub scale: (Decimal, Decimal),
    pub thresholds: Thresholds,
}

impl Criterion {
    pub fn new(id: &str, weight: Decimal, scale: (Decimal, Decimal)) -> Criterion {
        Criterion {
            id: id.to_string(),
            name: None,
            weight,
            direction: PreferenceDirection::Max,
            scale,
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_name(self, name: &str) -> Criterion {
        Criterion {
            name: Some(name.to_string()),
            ..self
        }
    }

    pub fn with_direction(self, direction: PreferenceDirection) -> Criterion {
        Criterion { direction, ..self }
    }

    pub fn with_threshold(mut self, kind: ThresholdKind, threshold: AffineThreshold) -> Criterion {
        self.thresholds.set(kind, Some(threshold));
        self
    }

    /// The value as seen by a maximizing decision maker.
    pub fn orient(&self, value: Decimal) -> Decimal {
        match self.direction {
            PreferenceDirection::Max => value,
            PreferenceDirection::Min => -value,
        }
    }

    fn threshold_at(&self, kind: ThresholdKind, x: Decimal) -> Option<Decimal> {
        self.thresholds.get(kind).map(|t| t.at(x))
    }

    // The smallest and largest |x| for x on the scale.
    fn magnitude_range(&self) -> [Decimal; 2] {
        let (low, high) = self.scale;
        let largest = low.abs().max(high.abs());
        if low <= Decimal::ZERO && high >= Decimal::ZERO {
            [Decimal::ZERO, largest]
        } else {
            [low.abs().min(high.abs()), largest]
        }
    }

    fn validated(mut self, na: Decimal) -> OutrankingResult<Criterion> {
        let (low, high) = self.scale;
        ensure!(
            low < high,
            MalformedScaleSnafu {
                criterion: &self.id,
                low,
                high
            }
        );
        ensure!(
            na < low || na > high,
            NaInsideScaleSnafu {
                criterion: &self.id,
                na
            }
        );
        if self.weight < Decimal::ZERO {
            debug!(
                "criterion {}: negative weight {}, reversing the preference direction",
                self.id, self.weight
            );
            self.weight = -self.weight;
            self.direction = self.direction.reversed();
        }

        let magnitudes = self.magnitude_range();
        for kind in ThresholdKind::ALL {
            for m in magnitudes {
                if let Some(value) = self.threshold_at(kind, m) {
                    ensure!(
                        value >= Decimal::ZERO,
                        NegativeThresholdSnafu {
                            criterion: &self.id,
                            threshold: kind,
                            value
                        }
                    );
                }
            }
        }
        for m in magnitudes {
            let ind = self.threshold_at(ThresholdKind::Indifference, m);
            let pref = self.threshold_at(ThresholdKind::Preference, m);
            let weak = self.threshold_at(ThresholdKind::WeakPreference, m);
            if let (Some(i), Some(p)) = (ind, pref) {
                ensure!(
                    i <= p,
                    ContradictoryThresholdsSnafu {
                        criterion: &self.id,
                        detail: format!("ind {} > pref {} at |x| = {}", i, p, m)
                    }
                );
            }
            if let Some(w) = weak {
                let below = ind.map_or(false, |i| w < i);
                let above = pref.map_or(false, |p| w > p);
                ensure!(
                    !below && !above,
                    ContradictoryThresholdsSnafu {
                        criterion: &self.id,
                        detail: format!("weakPreference {} outside [ind, pref] at |x| = {}", w, m)
                    }
                );
            }
        }

        let veto_below_pref = magnitudes.iter().any(|m| {
            match (
                self.threshold_at(ThresholdKind::Veto, *m),
                self.threshold_at(ThresholdKind::Preference, *m),
            ) {
                (Some(v), Some(p)) => v < p,
                _ => false,
            }
        });
        if veto_below_pref {
            warn!(
                "criterion {}: veto threshold below the preference threshold, the veto is disabled",
                self.id
            );
            self.thresholds.veto = None;
        }
        let weak_veto_above_veto = magnitudes.iter().any(|m| {
            match (
                self.threshold_at(ThresholdKind::WeakVeto, *m),
                self.threshold_at(ThresholdKind::Veto, *m),
            ) {
                (Some(w), Some(v)) => w > v,
                _ => false,
            }
        });
        if weak_veto_above_veto {
            warn!(
                "criterion {}: weak veto threshold above the veto threshold, the weak veto is disabled",
                self.id
            );
            self.thresholds.weak_veto = None;
        }

        match (self.thresholds.ind, self.thresholds.pref) {
            (Some(_), Some(_)) => {}
            (None, None) => debug!("criterion {}: no discrimination thresholds, crisp comparisons", self.id),
            _ => warn!(
                "criterion {}: only one of ind/pref is given, falling back to crisp comparisons",
                self.id
            ),
        }
        Ok(self)
    }
}

/// The evaluation of an action on a criterion.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Evaluation {
    Value(Decimal),
    Missing,
}

impl Evaluation {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Evaluation::Value(v) => Some(*v),
            Evaluation::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Evaluation::Missing)
    }
}

/// An immutable performance tableau.
///
/// Invariants: action and criterion identifiers are unique, every action has
/// exactly one evaluation per criterion, weights are non-negative and sum up
/// to a positive number.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PerformanceTableau {
    name: String,
    actions: Vec<Action>,
    criteria: Vec<Criterion>,
    // [action][criterion]
    evaluations: Vec<Vec<Evaluation>>,
    na: Decimal,
    action_positions: HashMap<String, usize>,
    criterion_positions: HashMap<String, usize>,
}

impl PerformanceTableau {
    /// Validates and builds a tableau.
    ///
    /// `evaluations[x][g]` is the evaluation of the action `x` on the criterion `g`,
    /// both in declaration order.
    pub fn new(
        name: &str,
        actions: Vec<Action>,
        criteria: Vec<Criterion>,
        evaluations: Vec<Vec<Evaluation>>,
        na: Decimal,
    ) -> OutrankingResult<PerformanceTableau> {
        let mut action_positions: HashMap<String, usize> = HashMap::new();
        for (idx, a) in actions.iter().enumerate() {
            let previous = action_positions.insert(a.id.clone(), idx);
            ensure!(previous.is_none(), DuplicateActionSnafu { action: &a.id });
        }
        let mut criterion_positions: HashMap<String, usize> = HashMap::new();
        for (idx, c) in criteria.iter().enumerate() {
            let previous = criterion_positions.insert(c.id.clone(), idx);
            ensure!(
                previous.is_none(),
                DuplicateCriterionSnafu { criterion: &c.id }
            );
        }
        let criteria: Vec<Criterion> = criteria
            .into_iter()
            .map(|c| c.validated(na))
            .collect::<OutrankingResult<_>>()?;
        let weight_sum: Decimal = criteria.iter().map(|c| c.weight).sum();
        ensure!(weight_sum > Decimal::ZERO, NullWeightsSnafu {});

        for (idx, a) in actions.iter().enumerate() {
            let row_len = evaluations.get(idx).map_or(0, |row| row.len());
            if row_len < criteria.len() {
                return MissingEvaluationSnafu {
                    criterion: &criteria[row_len].id,
                    action: &a.id,
                }
                .fail();
            }
            ensure!(
                row_len == criteria.len(),
                UnknownCriterionSnafu {
                    criterion: format!("#{} (row of {})", criteria.len(), a.id)
                }
            );
        }
        ensure!(
            evaluations.len() == actions.len(),
            UnknownActionSnafu {
                action: format!("#{}", actions.len())
            }
        );

        debug!(
            "PerformanceTableau::new: {}: {} actions, {} criteria",
            name,
            actions.len(),
            criteria.len()
        );
        Ok(PerformanceTableau {
            name: name.to_string(),
            actions,
            criteria,
            evaluations,
            na,
            action_positions,
            criterion_positions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn na(&self) -> Decimal {
        self.na
    }

    /// The number of actions.
    pub fn order(&self) -> usize {
        self.actions.len()
    }

    pub fn action_ids(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.id.clone()).collect()
    }

    pub fn action_position(&self, action: &str) -> Option<usize> {
        self.action_positions.get(action).copied()
    }

    pub fn criterion_position(&self, criterion: &str) -> Option<usize> {
        self.criterion_positions.get(criterion).copied()
    }

    pub fn evaluation(&self, action: &str, criterion: &str) -> OutrankingResult<Evaluation> {
        let x = self
            .action_position(action)
            .context(UnknownActionSnafu { action })?;
        let g = self
            .criterion_position(criterion)
            .context(UnknownCriterionSnafu { criterion })?;
        Ok(self.evaluations[x][g])
    }

    /// The evaluations of the action at position `x`, in criterion order.
    pub fn row(&self, x: usize) -> &[Evaluation] {
        &self.evaluations[x]
    }

    pub fn weight_sum(&self) -> Decimal {
        self.criteria.iter().map(|c| c.weight).sum()
    }

    /// The share of missing evaluations, in [0, 1].
    pub fn missing_data_proportion(&self) -> Decimal {
        let total = self.actions.len() * self.criteria.len();
        if total == 0 {
            return Decimal::ZERO;
        }
        let missing = self
            .evaluations
            .iter()
            .flatten()
            .filter(|e| e.is_missing())
            .count();
        Decimal::from(missing) / Decimal::from(total)
    }

    /// Logs a warning if the share of missing evaluations exceeds the threshold.
    /// Returns true in that case.
    pub fn check_missing_data(&self, threshold: Decimal) -> bool {
        let proportion = self.missing_data_proportion();
        if proportion > threshold {
            warn!(
                "tableau {}: {} of the evaluations are missing (threshold {})",
                self.name,
                proportion.round_dp(4),
                threshold
            );
            true
        } else {
            false
        }
    }

    /// Per criterion, the smallest and largest observed evaluations.
    /// None if the criterion has no evaluation at all.
    pub fn min_max_evaluations(&self) -> Vec<Option<(Decimal, Decimal)>> {
        (0..self.criteria.len())
            .map(|g| {
                self.evaluations
                    .iter()
                    .filter_map(|row| row[g].value())
                    .fold(None, |acc: Option<(Decimal, Decimal)>, v| match acc {
                        None => Some((v, v)),
                        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    })
            })
            .collect()
    }

    /// A view on all the actions and all the criteria.
    pub fn full_view(&self) -> TableauView<'_> {
        TableauView {
            tableau: self,
            members: (0..self.actions.len()).collect(),
            criteria: (0..self.criteria.len()).collect(),
        }
    }

    /// A view restricted to some actions, in the given order.
    pub fn view(&self, members: &[String]) -> OutrankingResult<TableauView<'_>> {
        let positions = members
            .iter()
            .map(|a| {
                self.action_position(a)
                    .context(UnknownActionSnafu { action: a })
            })
            .collect::<OutrankingResult<Vec<usize>>>()?;
        Ok(TableauView {
            tableau: self,
            members: positions,
            criteria: (0..self.criteria.len()).collect(),
        })
    }

    pub(crate) fn view_of_positions(&self, members: Vec<usize>) -> TableauView<'_> {
        TableauView {
            tableau: self,
            members,
            criteria: (0..self.criteria.len()).collect(),
        }
    }
}

/// A subset of the actions and of the criteria of a tableau.
/// No evaluation is copied.
#[derive(Debug, Clone)]
pub struct TableauView<'a> {
    tableau: &'a PerformanceTableau,
    members: Vec<usize>,
    criteria: Vec<usize>,
}

impl<'a> TableauView<'a> {
    pub fn tableau(&self) -> &'a PerformanceTableau {
        self.tableau
    }

    /// Positions of the actions in the tableau.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Positions of the criteria in the tableau.
    pub fn criteria(&self) -> &[usize] {
        &self.criteria
    }

    pub fn action_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|x| self.tableau.actions[*x].id.clone())
            .collect()
    }

    /// Restricts the view to a coalition of criteria.
    pub fn with_criteria(self, criteria: &[&str]) -> OutrankingResult<TableauView<'a>> {
        let positions = criteria
            .iter()
            .map(|g| {
                self.tableau
                    .criterion_position(g)
                    .context(UnknownCriterionSnafu { criterion: *g })
            })
            .collect::<OutrankingResult<Vec<usize>>>()?;
        Ok(TableauView {
            criteria: positions,
            ..self
        })
    }

    pub fn weight_sum(&self) -> Decimal {
        self.criteria
            .iter()
            .map(|g| self.tableau.criteria[*g].weight)
            .sum()
    }
}
