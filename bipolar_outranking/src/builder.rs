use std::collections::HashMap;

use rust_decimal::Decimal;
use snafu::prelude::*;

pub use crate::config::*;
use crate::tableau::*;

/// A builder for performance tableaux.
///
/// Evaluations can be added in any order. Every (criterion, action) pair must
/// be filled before building.
///
/// ```
/// use bipolar_outranking::builder::TableauBuilder;
/// use bipolar_outranking::{Criterion, Evaluation, OutrankingError};
/// use rust_decimal::Decimal;
///
/// let mut builder = TableauBuilder::new("cars")
///     .actions(&["a1".to_string(), "a2".to_string()])?;
/// builder.add_criterion(Criterion::new("speed", Decimal::ONE, (Decimal::ZERO, Decimal::ONE_HUNDRED)))?;
///
/// builder.set_evaluation("speed", "a1", Evaluation::Value(Decimal::TEN))?;
/// builder.set_evaluation("speed", "a2", Evaluation::Missing)?;
///
/// let tableau = builder.build()?;
/// assert_eq!(tableau.order(), 2);
/// # Ok::<(), OutrankingError>(())
/// ```
pub struct TableauBuilder {
    pub(crate) _name: String,
    pub(crate) _na: Decimal,
    pub(crate) _actions: Vec<Action>,
    pub(crate) _criteria: Vec<Criterion>,
    // Identifier -> declaration position
    pub(crate) _action_index: HashMap<String, usize>,
    pub(crate) _criterion_index: HashMap<String, usize>,
    // (criterion position, action position) -> evaluation
    pub(crate) _evaluations: HashMap<(usize, usize), Evaluation>,
    pub(crate) _na_warning_threshold: Option<Decimal>,
}

impl TableauBuilder {
    pub fn new(name: &str) -> TableauBuilder {
        TableauBuilder {
            _name: name.to_string(),
            _na: DEFAULT_NA,
            _actions: Vec::new(),
            _criteria: Vec::new(),
            _action_index: HashMap::new(),
            _criterion_index: HashMap::new(),
            _evaluations: HashMap::new(),
            _na_warning_threshold: None,
        }
    }

    /// The numeric symbol of missing data. It must lie outside every scale.
    pub fn na(self, na: Decimal) -> TableauBuilder {
        TableauBuilder { _na: na, ..self }
    }

    /// Above this share of missing evaluations, building logs a warning.
    pub fn na_warning_threshold(self, threshold: Decimal) -> TableauBuilder {
        TableauBuilder {
            _na_warning_threshold: Some(threshold),
            ..self
        }
    }

    /// Declares actions that only carry an identifier.
    pub fn actions(mut self, ids: &[String]) -> OutrankingResult<TableauBuilder> {
        for id in ids {
            self.add_action(Action::new(id))?;
        }
        Ok(self)
    }

    pub fn add_action(&mut self, action: Action) -> OutrankingResult<()> {
        ensure!(
            !self._action_index.contains_key(&action.id),
            DuplicateActionSnafu { action: &action.id }
        );
        self._action_index
            .insert(action.id.clone(), self._actions.len());
        self._actions.push(action);
        Ok(())
    }

    pub fn add_criterion(&mut self, criterion: Criterion) -> OutrankingResult<()> {
        ensure!(
            !self._criterion_index.contains_key(&criterion.id),
            DuplicateCriterionSnafu {
                criterion: &criterion.id
            }
        );
        self._criterion_index
            .insert(criterion.id.clone(), self._criteria.len());
        self._criteria.push(criterion);
        Ok(())
    }

    /// Records the evaluation of an already declared action on an already
    /// declared criterion. A later call overrides an earlier one.
    pub fn set_evaluation(
        &mut self,
        criterion: &str,
        action: &str,
        evaluation: Evaluation,
    ) -> OutrankingResult<()> {
        let g = *self
            ._criterion_index
            .get(criterion)
            .context(UnknownCriterionSnafu { criterion })?;
        let x = *self
            ._action_index
            .get(action)
            .context(UnknownActionSnafu { action })?;
        let evaluation = match evaluation {
            Evaluation::Value(v) if v == self._na => Evaluation::Missing,
            e => e,
        };
        self._evaluations.insert((g, x), evaluation);
        Ok(())
    }

    pub fn build(self) -> OutrankingResult<PerformanceTableau> {
        let mut evaluations: Vec<Vec<Evaluation>> = Vec::with_capacity(self._actions.len());
        for (x, a) in self._actions.iter().enumerate() {
            let mut row = Vec::with_capacity(self._criteria.len());
            for (g, c) in self._criteria.iter().enumerate() {
                let e = self
                    ._evaluations
                    .get(&(g, x))
                    .context(MissingEvaluationSnafu {
                        criterion: &c.id,
                        action: &a.id,
                    })?;
                row.push(*e);
            }
            evaluations.push(row);
        }
        let tableau = PerformanceTableau::new(
            &self._name,
            self._actions,
            self._criteria,
            evaluations,
            self._na,
        )?;
        if let Some(threshold) = self._na_warning_threshold {
            tableau.check_missing_data(threshold);
        }
        Ok(tableau)
    }
}
