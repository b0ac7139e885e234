use std::cmp::Ordering;

use log::{debug, info, warn};
use rayon::prelude::*;
use rust_decimal::{Decimal, MathematicalOps};
use snafu::prelude::*;

use crate::config::*;
use crate::digraph::{preorder_relation, BipolarDigraph};
use crate::outranking::OutrankingEngine;
use crate::ranking::ranking_to_preorder;
use crate::tableau::PerformanceTableau;
use crate::valuation::ValuationDomain;

/// The ordinal correlation between two relations on the same actions.
///
/// Both relations are read on the normalized domain. The actions of `b` are
/// matched with the actions of `a` by identifier, in any order.
pub fn ordinal_correlation<A, B>(a: &A, b: &B) -> OutrankingResult<OrdinalCorrelation>
where
    A: BipolarDigraph + ?Sized,
    B: BipolarDigraph + ?Sized,
{
    let n = a.order();
    ensure!(
        b.order() == n,
        MismatchedActionsSnafu {
            detail: format!("{} actions against {}", n, b.order())
        }
    );
    let matching = a
        .actions()
        .iter()
        .map(|id| {
            b.position(id).context(MismatchedActionsSnafu {
                detail: format!("action {} is missing", id),
            })
        })
        .collect::<OutrankingResult<Vec<usize>>>()?;

    let to = ValuationDomain::NORMALIZED;
    let (da, db) = (a.valuation_domain(), b.valuation_domain());
    let mut k = Decimal::ZERO;
    let mut d = Decimal::ZERO;
    for x in 0..n {
        for y in 0..n {
            if x == y {
                continue;
            }
            let va = da.recode(a.relation(x, y), &to);
            let vb = db.recode(b.relation(matching[x], matching[y]), &to);
            k += (-va).max(vb).min(va.max(-vb));
            d += va.abs().min(vb.abs());
        }
    }
    if d.is_zero() {
        warn!("ordinal_correlation: the relations share no determinateness, the correlation is indeterminate");
        return Ok(OrdinalCorrelation {
            correlation: Decimal::ZERO,
            determination: Decimal::ZERO,
        });
    }
    Ok(OrdinalCorrelation {
        correlation: k / d,
        determination: d / Decimal::from(n * (n - 1)),
    })
}

/// Correlations between each single-criterion outranking digraph and the
/// weak order of a ranking.
///
/// Sorted by decreasing correlation (valued correlation if `valued`), then by
/// criterion identifier. Criteria with a null weight are skipped.
pub fn marginal_vs_global(
    tableau: &PerformanceTableau,
    ranking: &[String],
    options: &OutrankingOptions,
    valued: bool,
) -> OutrankingResult<Vec<CriterionCorrelation>> {
    let actions = tableau.action_ids();
    let global = preorder_relation(&actions, &ranking_to_preorder(ranking))?;
    let engine = OutrankingEngine::new(&OutrankingOptions {
        normalized: true,
        ..options.clone()
    });
    info!(
        "marginal_vs_global: {} criteria, {} actions",
        tableau.criteria().len(),
        actions.len()
    );

    let mut correlations: Vec<CriterionCorrelation> = run_in_pool(options.threads, || {
        tableau
            .criteria()
            .par_iter()
            .filter(|c| c.weight > Decimal::ZERO)
            .map(|c| {
                let task = || -> OutrankingResult<CriterionCorrelation> {
                    check_cancel(&options.cancel)?;
                    let view = tableau.full_view().with_criteria(&[c.id.as_str()])?;
                    let marginal = engine.build(&view, false)?;
                    Ok(CriterionCorrelation {
                        criterion: c.id.clone(),
                        correlation: ordinal_correlation(&marginal, &global)?,
                    })
                };
                task().map_err(in_task(format!("criterion {}", c.id)))
            })
            .collect::<OutrankingResult<Vec<_>>>()
    })?;

    let key = |c: &CriterionCorrelation| {
        if valued {
            c.correlation.valued()
        } else {
            c.correlation.correlation
        }
    };
    correlations.sort_by(|a, b| match key(b).cmp(&key(a)) {
        Ordering::Equal => a.criterion.cmp(&b.criterion),
        other => other,
    });
    debug!("marginal_vs_global: {:?}", correlations);
    Ok(correlations)
}

/// Weighted mean and population standard deviation of the correlations
/// between the criteria and a ranking.
pub fn ranking_consensus_quality(
    tableau: &PerformanceTableau,
    ranking: &[String],
    options: &OutrankingOptions,
) -> OutrankingResult<ConsensusQuality> {
    let correlations = marginal_vs_global(tableau, ranking, options, false)?;
    let weighted: Vec<(Decimal, Decimal)> = correlations
        .iter()
        .filter_map(|c| {
            let g = tableau.criterion_position(&c.criterion)?;
            Some((tableau.criteria()[g].weight, c.correlation.correlation))
        })
        .collect();
    let total: Decimal = weighted.iter().map(|(w, _)| *w).sum();
    ensure!(total > Decimal::ZERO, NullWeightsSnafu {});
    let mean = weighted.iter().map(|(w, c)| *w * *c).sum::<Decimal>() / total;
    let variance = weighted
        .iter()
        .map(|(w, c)| *w * (*c - mean) * (*c - mean))
        .sum::<Decimal>()
        / total;
    let stdev = variance.sqrt().unwrap_or(Decimal::ZERO);
    Ok(ConsensusQuality { mean, stdev })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableauBuilder;
    use crate::digraph::DenseDigraph;
    use crate::tableau::{Criterion, Evaluation};
    use rust_decimal_macros::dec;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn constant(names: &[&str], v: Decimal) -> DenseDigraph {
        let n = names.len();
        DenseDigraph::new(ids(names), ValuationDomain::NORMALIZED, vec![vec![v; n]; n]).unwrap()
    }

    #[test]
    fn self_correlation() {
        let d = DenseDigraph::new(
            ids(&["a", "b", "c"]),
            ValuationDomain::NORMALIZED,
            vec![
                vec![dec!(0), dec!(0.5), dec!(1)],
                vec![dec!(-0.5), dec!(0), dec!(0.3)],
                vec![dec!(-1), dec!(0), dec!(0)],
            ],
        )
        .unwrap();
        let c = ordinal_correlation(&d, &d).unwrap();
        assert_eq!(c.correlation, dec!(1));
        // mean |r| = (0.5 + 1 + 0.5 + 0.3 + 1 + 0) / 6
        assert_eq!(c.determination, dec!(3.3) / dec!(6));
        assert_eq!(c.determination, d.determinateness());
        let same = ordinal_correlation(&d, &d.codual().codual()).unwrap();
        assert_eq!(same.correlation, dec!(1));
    }

    #[test]
    fn indeterminate_correlation() {
        let a = constant(&["a", "b"], dec!(1));
        let b = constant(&["a", "b"], dec!(0));
        let c = ordinal_correlation(&a, &b).unwrap();
        assert_eq!(c.correlation, dec!(0));
        assert_eq!(c.determination, dec!(0));
        assert_eq!(c.valued(), dec!(0));
    }

    #[test]
    fn matches_actions_by_identifier() {
        let a = DenseDigraph::new(
            ids(&["a", "b"]),
            ValuationDomain::NORMALIZED,
            vec![vec![dec!(0), dec!(1)], vec![dec!(-1), dec!(0)]],
        )
        .unwrap();
        let wide = ValuationDomain::new(dec!(0), dec!(100)).unwrap();
        let b = DenseDigraph::new(
            ids(&["b", "a"]),
            wide,
            vec![vec![dec!(50), dec!(0)], vec![dec!(100), dec!(50)]],
        )
        .unwrap();
        assert_eq!(ordinal_correlation(&a, &b).unwrap().correlation, dec!(1));
        let other = constant(&["a", "z"], dec!(1));
        let err = ordinal_correlation(&a, &other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(ordinal_correlation(&a, &constant(&["a"], dec!(1))).is_err());
    }

    fn opposed_tableau() -> PerformanceTableau {
        let mut b = TableauBuilder::new("t")
            .actions(&ids(&["a", "b", "c"]))
            .unwrap();
        b.add_criterion(Criterion::new("g1", dec!(3), (dec!(0), dec!(10))))
            .unwrap();
        b.add_criterion(Criterion::new("g2", dec!(1), (dec!(0), dec!(10))))
            .unwrap();
        b.add_criterion(Criterion::new("g3", dec!(0), (dec!(0), dec!(10))))
            .unwrap();
        for (a, v) in [("a", dec!(3)), ("b", dec!(2)), ("c", dec!(1))] {
            b.set_evaluation("g1", a, Evaluation::Value(v)).unwrap();
            b.set_evaluation("g2", a, Evaluation::Value(dec!(4) - v))
                .unwrap();
            b.set_evaluation("g3", a, Evaluation::Value(v)).unwrap();
        }
        b.build().unwrap()
    }

    #[test]
    fn marginal_correlations() {
        let t = opposed_tableau();
        let ranking = ids(&["a", "b", "c"]);
        let options = OutrankingOptions::DEFAULT.with_threads(2);
        let corr = marginal_vs_global(&t, &ranking, &options, false).unwrap();
        assert_eq!(corr.len(), 2);
        assert_eq!(corr[0].criterion, "g1");
        assert_eq!(corr[0].correlation.correlation, dec!(1));
        assert_eq!(corr[0].correlation.determination, dec!(1));
        assert_eq!(corr[1].criterion, "g2");
        assert_eq!(corr[1].correlation.correlation, dec!(-1));
    }

    #[test]
    fn consensus_quality() {
        let t = opposed_tableau();
        let q = ranking_consensus_quality(&t, &ids(&["a", "b", "c"]), &OutrankingOptions::DEFAULT)
            .unwrap();
        assert_eq!(q.mean, dec!(0.5));
        assert!(q.stdev > dec!(0.866) && q.stdev < dec!(0.867));
    }
}
