//! Construction of the bipolar-valued outranking relation.
//!
//! For each ordered pair `(x, y)`, every criterion votes for or against
//! "x is at least as good as y" with its weight, and the votes are summed up.
//! Considerable performance differences (vetoes) may then polarize the result.

use log::{debug, info};
use rayon::prelude::*;
use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;
use crate::digraph::DenseDigraph;
use crate::tableau::*;
use crate::valuation::{Valuation, ValuationDomain};

/// The considerable performance differences recorded for one ordered pair.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Hash)]
pub struct PolarisationCounts {
    pub positive: u32,
    pub negative: u32,
    pub weak_positive: u32,
    pub weak_negative: u32,
}

impl PolarisationCounts {
    pub const EMPTY: PolarisationCounts = PolarisationCounts {
        positive: 0,
        negative: 0,
        weak_positive: 0,
        weak_negative: 0,
    };
}

/// The characteristic value of one ordered pair, in the engine's domain.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct PairwiseOutcome {
    pub value: Valuation,
    pub counts: PolarisationCounts,
}

// Compares evaluation rows on a fixed coalition of criteria.
pub(crate) struct Comparator<'a> {
    criteria: Vec<(usize, &'a Criterion)>,
    weight_sum: Decimal,
    symmetric: bool,
    // [-weight_sum, weight_sum]
    margins: ValuationDomain,
    domain: ValuationDomain,
}

impl<'a> Comparator<'a> {
    pub(crate) fn new(
        tableau: &'a PerformanceTableau,
        coalition: &[usize],
        options: &OutrankingOptions,
    ) -> OutrankingResult<Comparator<'a>> {
        let criteria: Vec<(usize, &Criterion)> = coalition
            .iter()
            .map(|g| (*g, &tableau.criteria()[*g]))
            .collect();
        let weight_sum: Decimal = criteria.iter().map(|(_, c)| c.weight).sum();
        ensure!(weight_sum > Decimal::ZERO, NullWeightsSnafu {});
        let margins = ValuationDomain::new(-weight_sum, weight_sum)?;
        let domain = if options.normalized {
            ValuationDomain::NORMALIZED
        } else {
            margins
        };
        Ok(Comparator {
            criteria,
            weight_sum,
            symmetric: options.symmetric_thresholds,
            margins,
            domain,
        })
    }

    pub(crate) fn domain(&self) -> ValuationDomain {
        self.domain
    }

    /// The polarized characteristic value of `x S y`.
    pub(crate) fn compare(&self, x: &[Evaluation], y: &[Evaluation]) -> PairwiseOutcome {
        let mut counts = PolarisationCounts::EMPTY;
        let mut margin = Decimal::ZERO;
        for (g, criterion) in self.criteria.iter() {
            margin += self.marginal(criterion, x[*g], y[*g], &mut counts);
        }
        let polarized = polarize(margin, &counts, &self.margins);
        let value = if self.domain.is_normalized() {
            polarized / self.weight_sum
        } else {
            polarized
        };
        PairwiseOutcome { value, counts }
    }

    // Weighted vote of one criterion. Missing data votes 0.
    fn marginal(
        &self,
        criterion: &Criterion,
        x: Evaluation,
        y: Evaluation,
        counts: &mut PolarisationCounts,
    ) -> Decimal {
        let (xv, yv) = match (x, y) {
            (Evaluation::Value(xv), Evaluation::Value(yv)) => (xv, yv),
            _ => return Decimal::ZERO,
        };
        let d = criterion.orient(xv) - criterion.orient(yv);
        let w = criterion.weight;
        let magnitude = xv.abs().max(yv.abs());
        let reference = if self.symmetric { magnitude } else { xv };

        let thresholds = &criterion.thresholds;
        let concordance = match (thresholds.ind, thresholds.pref) {
            (Some(ind), Some(pref)) => {
                let i = ind.at(reference);
                let p = pref.at(reference);
                if d >= -i {
                    w
                } else if d <= -p {
                    -w
                } else {
                    // Line through (-p, -w) and (-i, w).
                    w * (d + d + p + i) / (p - i)
                }
            }
            _ if d >= Decimal::ZERO => w,
            _ => -w,
        };

        let beyond = |t: Option<AffineThreshold>| -> Option<bool> {
            let v = t?.at(magnitude);
            if d >= v {
                Some(true)
            } else if d <= -v {
                Some(false)
            } else {
                None
            }
        };
        match beyond(thresholds.veto) {
            Some(true) => counts.positive += 1,
            Some(false) => counts.negative += 1,
            None => match beyond(thresholds.weak_veto) {
                Some(true) => counts.weak_positive += 1,
                Some(false) => counts.weak_negative += 1,
                None => {}
            },
        }
        concordance
    }
}

/// Applies the considerable performance differences to an aggregated margin.
///
/// Conflicting vetoes give `Med`. A positive veto alone gives `Max` unless the
/// margin is negative; a negative veto alone gives `Min` unless the margin is
/// non-negative. Weak vetoes only bring a contradicted margin back to `Med`.
pub fn polarize(
    margin: Valuation,
    counts: &PolarisationCounts,
    domain: &ValuationDomain,
) -> Valuation {
    let med = domain.med();
    match (counts.positive > 0, counts.negative > 0) {
        (true, true) => med,
        (true, false) if margin >= med => domain.max(),
        (false, true) if margin < med => domain.min(),
        (true, false) | (false, true) => med,
        (false, false) => {
            if (margin > med && counts.weak_negative > 0)
                || (margin < med && counts.weak_positive > 0)
            {
                med
            } else {
                margin
            }
        }
    }
}

/// Builds dense bipolar-valued outranking digraphs.
///
/// ```
/// use bipolar_outranking::builder::TableauBuilder;
/// use bipolar_outranking::*;
/// use rust_decimal::Decimal;
///
/// let mut builder = TableauBuilder::new("t").actions(&["a".to_string(), "b".to_string()])?;
/// builder.add_criterion(Criterion::new("g", Decimal::ONE, (Decimal::ZERO, Decimal::TEN)))?;
/// builder.set_evaluation("g", "a", Evaluation::Value(Decimal::TEN))?;
/// builder.set_evaluation("g", "b", Evaluation::Value(Decimal::ONE))?;
/// let tableau = builder.build()?;
///
/// let digraph = OutrankingEngine::new(&OutrankingOptions::DEFAULT).outrank(&tableau)?;
/// assert_eq!(digraph.relation_between("a", "b")?, Decimal::ONE);
/// # Ok::<(), OutrankingError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OutrankingEngine {
    options: OutrankingOptions,
}

impl OutrankingEngine {
    pub fn new(options: &OutrankingOptions) -> OutrankingEngine {
        OutrankingEngine {
            options: options.clone(),
        }
    }

    pub fn options(&self) -> &OutrankingOptions {
        &self.options
    }

    /// The outranking digraph over all the actions and criteria of the tableau.
    pub fn outrank(&self, tableau: &PerformanceTableau) -> OutrankingResult<DenseDigraph> {
        self.outrank_view(&tableau.full_view())
    }

    /// The outranking digraph over the actions and criteria of a view.
    /// Rows are computed in parallel.
    pub fn outrank_view(&self, view: &TableauView) -> OutrankingResult<DenseDigraph> {
        info!(
            "outrank_view: {} actions, {} criteria, threads: {:?}",
            view.members().len(),
            view.criteria().len(),
            self.options.threads
        );
        run_in_pool(self.options.threads, || self.build(view, true))
    }

    /// The characteristic value of `x S y` for two arbitrary evaluation rows
    /// over all the criteria of the tableau (profiles, fictitious actions, ...).
    pub fn pairwise(
        &self,
        tableau: &PerformanceTableau,
        x: &[Evaluation],
        y: &[Evaluation],
    ) -> OutrankingResult<PairwiseOutcome> {
        let n = tableau.criteria().len();
        ensure!(
            x.len() == n && y.len() == n,
            MismatchedActionsSnafu {
                detail: format!("evaluation rows must have {} entries", n)
            }
        );
        let coalition: Vec<usize> = (0..n).collect();
        let comparator = Comparator::new(tableau, &coalition, &self.options)?;
        Ok(comparator.compare(x, y))
    }

    // Runs in the current rayon pool.
    pub(crate) fn build(&self, view: &TableauView, parallel: bool) -> OutrankingResult<DenseDigraph> {
        let tableau = view.tableau();
        let comparator = Comparator::new(tableau, view.criteria(), &self.options)?;
        let members = view.members();
        let med = comparator.domain().med();

        let row = |(ix, x): (usize, &usize)| -> OutrankingResult<Vec<PairwiseOutcome>> {
            check_cancel(&self.options.cancel)?;
            let x_row = tableau.row(*x);
            Ok(members
                .iter()
                .enumerate()
                .map(|(iy, y)| {
                    if ix == iy {
                        PairwiseOutcome {
                            value: med,
                            counts: PolarisationCounts::EMPTY,
                        }
                    } else {
                        comparator.compare(x_row, tableau.row(*y))
                    }
                })
                .collect())
        };
        let rows: Vec<Vec<PairwiseOutcome>> = if parallel {
            members
                .par_iter()
                .enumerate()
                .map(|(ix, x)| row((ix, x)).map_err(in_task(format!("row {}", tableau.actions()[*x].id))))
                .collect::<OutrankingResult<_>>()?
        } else {
            members
                .iter()
                .enumerate()
                .map(row)
                .collect::<OutrankingResult<_>>()?
        };

        let relation = rows
            .iter()
            .map(|r| r.iter().map(|o| o.value).collect())
            .collect();
        let polarisations = rows
            .iter()
            .map(|r| r.iter().map(|o| o.counts).collect())
            .collect();
        debug!(
            "build: {} x {} relation in {:?}",
            members.len(),
            members.len(),
            comparator.domain()
        );
        Ok(DenseDigraph::from_rows(
            view.action_ids(),
            comparator.domain(),
            relation,
            Some(polarisations),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableauBuilder;
    use crate::digraph::BipolarDigraph;
    use rust_decimal_macros::dec;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tableau(criteria: Vec<Criterion>, evals: &[(&str, &str, Decimal)]) -> PerformanceTableau {
        let mut actions: Vec<String> = Vec::new();
        for (_, a, _) in evals {
            if !actions.iter().any(|x| x == a) {
                actions.push(a.to_string());
            }
        }
        let mut b = TableauBuilder::new("test").actions(&actions).unwrap();
        for c in criteria {
            b.add_criterion(c).unwrap();
        }
        for (g, a, v) in evals {
            b.set_evaluation(g, a, Evaluation::Value(*v)).unwrap();
        }
        b.build().unwrap()
    }

    fn with_ind_pref(c: Criterion, ind: Decimal, pref: Decimal) -> Criterion {
        c.with_threshold(ThresholdKind::Indifference, AffineThreshold::constant(ind))
            .with_threshold(ThresholdKind::Preference, AffineThreshold::constant(pref))
    }

    fn scale() -> (Decimal, Decimal) {
        (dec!(0), dec!(200))
    }

    #[test]
    fn tie_outranks_both_ways() {
        init();
        let g = with_ind_pref(Criterion::new("g", dec!(1), scale()), dec!(0), dec!(1));
        let t = tableau(vec![g], &[("g", "a", dec!(5)), ("g", "b", dec!(5))]);
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT)
            .outrank(&t)
            .unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(1));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(1));
        assert_eq!(d.relation_between("a", "a").unwrap(), dec!(0));
    }

    #[test]
    fn strict_preference() {
        init();
        let g = with_ind_pref(Criterion::new("g", dec!(1), scale()), dec!(0), dec!(2));
        let t = tableau(vec![g], &[("g", "a", dec!(10)), ("g", "b", dec!(5))]);
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT)
            .outrank(&t)
            .unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(1));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(-1));
    }

    #[test]
    fn veto_polarizes() {
        init();
        let g1 = Criterion::new("g1", dec!(1), scale());
        let g2 = Criterion::new("g2", dec!(1), scale())
            .with_threshold(ThresholdKind::Veto, AffineThreshold::constant(dec!(50)));
        let t = tableau(
            vec![g1, g2],
            &[
                ("g1", "a", dec!(20)),
                ("g1", "b", dec!(10)),
                ("g2", "a", dec!(10)),
                ("g2", "b", dec!(100)),
            ],
        );
        let options = OutrankingOptions {
            normalized: false,
            ..OutrankingOptions::DEFAULT
        };
        let d = OutrankingEngine::new(&options).outrank(&t).unwrap();
        assert_eq!(d.valuation_domain().max(), dec!(2));
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(0));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(2));
        let counts = d.polarisation(1, 0).unwrap();
        assert_eq!(counts.positive, 1);
        assert_eq!(counts.negative, 0);
        assert_eq!(d.polarisation(0, 1).unwrap().negative, 1);
    }

    #[test]
    fn indifference_zone() {
        let g = with_ind_pref(Criterion::new("g", dec!(3), scale()), dec!(5), dec!(10));
        let t = tableau(vec![g], &[("g", "a", dec!(100)), ("g", "b", dec!(101))]);
        let engine = OutrankingEngine::new(&OutrankingOptions {
            normalized: false,
            ..OutrankingOptions::DEFAULT
        });
        let outcome = engine.pairwise(&t, t.row(0), t.row(1)).unwrap();
        assert_eq!(outcome.value, dec!(3));
    }

    #[test]
    fn interpolates_between_thresholds() {
        let g = with_ind_pref(Criterion::new("g", dec!(2), scale()), dec!(2), dec!(6));
        let t = tableau(
            vec![g],
            &[("g", "a", dec!(100)), ("g", "b", dec!(104)), ("g", "c", dec!(105))],
        );
        let engine = OutrankingEngine::new(&OutrankingOptions {
            normalized: false,
            ..OutrankingOptions::DEFAULT
        });
        // d = -4, halfway between -6 and -2.
        assert_eq!(engine.pairwise(&t, t.row(0), t.row(1)).unwrap().value, dec!(0));
        // d = -5: 2 * (-10 + 8) / 4
        assert_eq!(engine.pairwise(&t, t.row(0), t.row(2)).unwrap().value, dec!(-1));
    }

    #[test]
    fn missing_data_keeps_the_full_denominator() {
        let mut b = TableauBuilder::new("t")
            .actions(&["a".to_string(), "b".to_string()])
            .unwrap();
        b.add_criterion(Criterion::new("g1", dec!(1), scale())).unwrap();
        b.add_criterion(Criterion::new("g2", dec!(3), scale())).unwrap();
        b.set_evaluation("g1", "a", Evaluation::Value(dec!(5))).unwrap();
        b.set_evaluation("g1", "b", Evaluation::Value(dec!(4))).unwrap();
        b.set_evaluation("g2", "a", Evaluation::Missing).unwrap();
        b.set_evaluation("g2", "b", Evaluation::Value(dec!(4))).unwrap();
        let t = b.build().unwrap();
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT)
            .outrank(&t)
            .unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(0.25));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(-0.25));
    }

    #[test]
    fn min_direction_and_coalitions() {
        let cost = Criterion::new("cost", dec!(1), scale()).with_direction(PreferenceDirection::Min);
        let g = Criterion::new("g", dec!(1), scale());
        let t = tableau(
            vec![cost, g],
            &[
                ("cost", "a", dec!(10)),
                ("cost", "b", dec!(20)),
                ("g", "a", dec!(10)),
                ("g", "b", dec!(20)),
            ],
        );
        let engine = OutrankingEngine::new(&OutrankingOptions::DEFAULT.with_threads(2));
        let d = engine.outrank(&t).unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(0));
        let only_cost = t.full_view().with_criteria(&["cost"]).unwrap();
        let d = engine.outrank_view(&only_cost).unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(1));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(-1));
    }

    #[test]
    fn polarization_is_consistent() {
        let domain = ValuationDomain::NORMALIZED;
        let pos = PolarisationCounts {
            positive: 1,
            ..PolarisationCounts::EMPTY
        };
        let neg = PolarisationCounts {
            negative: 1,
            ..PolarisationCounts::EMPTY
        };
        let weak_neg = PolarisationCounts {
            weak_negative: 1,
            ..PolarisationCounts::EMPTY
        };
        for r in [dec!(-0.5), dec!(0), dec!(0.5)] {
            assert!([dec!(1), dec!(0)].contains(&polarize(r, &pos, &domain)));
            assert!([dec!(-1), dec!(0)].contains(&polarize(r, &neg, &domain)));
        }
        assert_eq!(polarize(dec!(0.5), &weak_neg, &domain), dec!(0));
        assert_eq!(polarize(dec!(-0.5), &weak_neg, &domain), dec!(-0.5));
    }

    #[test]
    fn weak_veto_brings_the_majority_back_to_med() {
        init();
        let g1 = Criterion::new("g1", dec!(2), scale());
        let g2 = Criterion::new("g2", dec!(1), scale())
            .with_threshold(ThresholdKind::WeakVeto, AffineThreshold::constant(dec!(30)))
            .with_threshold(ThresholdKind::Veto, AffineThreshold::constant(dec!(80)));
        let t = tableau(
            vec![g1, g2],
            &[
                ("g1", "a", dec!(60)),
                ("g1", "b", dec!(10)),
                ("g2", "a", dec!(10)),
                ("g2", "b", dec!(50)),
            ],
        );
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT)
            .outrank(&t)
            .unwrap();
        // The weighted margin is 1/3 both ways round, before the weak vetoes.
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(0));
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(0));
        let counts = d.polarisation(0, 1).unwrap();
        assert_eq!(counts.weak_negative, 1);
        assert_eq!(counts.negative, 0);
        assert_eq!(d.polarisation(1, 0).unwrap().weak_positive, 1);
    }

    #[test]
    fn symmetric_thresholds_use_the_larger_magnitude() {
        init();
        let g = Criterion::new("g", dec!(1), (dec!(0), dec!(100)))
            .with_threshold(
                ThresholdKind::Indifference,
                AffineThreshold::new(dec!(0), dec!(0.1)),
            )
            .with_threshold(
                ThresholdKind::Preference,
                AffineThreshold::new(dec!(0), dec!(0.2)),
            );
        let t = tableau(vec![g], &[("g", "a", dec!(10)), ("g", "b", dec!(11.5))]);

        // Thresholds at 10: ind = 1, pref = 2, d = -1.5 sits halfway.
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT)
            .outrank(&t)
            .unwrap();
        assert_eq!(d.relation_between("a", "b").unwrap(), dec!(0));

        // Thresholds at 11.5: ind = 1.15, pref = 2.3, so r = 0.45 / 1.15.
        let options = OutrankingOptions {
            symmetric_thresholds: true,
            ..OutrankingOptions::DEFAULT
        };
        let d = OutrankingEngine::new(&options).outrank(&t).unwrap();
        let r = d.relation_between("a", "b").unwrap();
        assert!((r - dec!(0.45) / dec!(1.15)).abs() < dec!(0.000001), "{}", r);
        assert_eq!(d.relation_between("b", "a").unwrap(), dec!(1));
    }

    #[test]
    fn values_stay_bounded_and_follow_the_vetoes() {
        init();
        let g1 = with_ind_pref(Criterion::new("g1", dec!(3), (dec!(0), dec!(100))), dec!(5), dec!(15))
            .with_threshold(ThresholdKind::Veto, AffineThreshold::constant(dec!(60)));
        let g2 = Criterion::new("g2", dec!(2), (dec!(0), dec!(100)))
            .with_direction(PreferenceDirection::Min)
            .with_threshold(
                ThresholdKind::Indifference,
                AffineThreshold::new(dec!(1), dec!(0.05)),
            )
            .with_threshold(
                ThresholdKind::Preference,
                AffineThreshold::new(dec!(2), dec!(0.1)),
            )
            .with_threshold(ThresholdKind::WeakVeto, AffineThreshold::constant(dec!(40)))
            .with_threshold(ThresholdKind::Veto, AffineThreshold::constant(dec!(70)));
        let g3 = Criterion::new("g3", dec!(1), (dec!(0), dec!(100)));
        let names: Vec<String> = (0..8).map(|i| format!("a{}", i)).collect();
        let mut evals: Vec<(&str, &str, Decimal)> = Vec::new();
        for (i, a) in names.iter().enumerate() {
            let i = i as i64;
            evals.push(("g1", a.as_str(), Decimal::from(i * 37 % 100)));
            evals.push(("g2", a.as_str(), Decimal::from((i * 53 + 11) % 100)));
            evals.push(("g3", a.as_str(), Decimal::from((i * 17 + 5) % 100)));
        }
        let t = tableau(vec![g1, g2, g3], &evals);
        let d = OutrankingEngine::new(&OutrankingOptions::DEFAULT.with_threads(2))
            .outrank(&t)
            .unwrap();

        let (mut positive_only, mut negative_only, mut fractional) = (0, 0, 0);
        for (x, a) in names.iter().enumerate() {
            for (y, b) in names.iter().enumerate() {
                if x == y {
                    continue;
                }
                let r = d.relation_between(a, b).unwrap();
                assert!(r >= dec!(-1) && r <= dec!(1), "r({}, {}) = {}", a, b, r);
                if r.fract() != Decimal::ZERO {
                    fractional += 1;
                }
                let counts = d.polarisation(x, y).unwrap();
                match (counts.positive > 0, counts.negative > 0) {
                    (true, false) => {
                        positive_only += 1;
                        assert!([dec!(1), dec!(0)].contains(&r), "r({}, {}) = {}", a, b, r);
                    }
                    (false, true) => {
                        negative_only += 1;
                        assert!([dec!(-1), dec!(0)].contains(&r), "r({}, {}) = {}", a, b, r);
                    }
                    (true, true) => assert_eq!(r, dec!(0)),
                    (false, false) => {}
                }
            }
        }
        assert!(positive_only > 0);
        assert!(negative_only > 0);
        assert!(fractional > 0);
    }

    #[test]
    fn cancelled_runs_return_no_digraph() {
        let g = Criterion::new("g", dec!(1), scale());
        let t = tableau(vec![g], &[("g", "a", dec!(1)), ("g", "b", dec!(2))]);
        let flag = CancelFlag::new();
        flag.cancel();
        let engine = OutrankingEngine::new(&OutrankingOptions::DEFAULT.with_cancel(&flag));
        let err = engine.outrank(&t).unwrap_err();
        assert!(matches!(err, OutrankingError::Cancelled {}));
    }
}
