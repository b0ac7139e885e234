//! Sparse pre-ranked outranking digraphs.
//!
//! The actions are first sorted into q-tile categories. Actions with the same
//! sorting form ordered components: only the relation inside a component is
//! computed, and an earlier component outranks every later one.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use rayon::prelude::*;
use rust_decimal::{Decimal, MathematicalOps};
use snafu::prelude::*;

use crate::config::*;
use crate::digraph::{ActionId, BipolarDigraph, DenseDigraph, OutrankingRelation};
use crate::outranking::OutrankingEngine;
use crate::quantiles::{ActionSorting, QuantilesSorter, QuantilesSorting};
use crate::ranking::Ranking;
use crate::tableau::PerformanceTableau;
use crate::valuation::{Valuation, ValuationDomain};

/// An ordered block of actions with the same (merged) quantile sorting.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Component {
    /// 1 is the best component.
    pub rank: usize,
    pub low_qtile_limit: Decimal,
    pub high_qtile_limit: Decimal,
    /// In tableau order.
    pub members: Vec<ActionId>,
    pub local_digraph: DenseDigraph,
    pub local_ranking: Ranking,
}

/// A digraph given by ordered components.
///
/// `r(x, y)` is the local relation if `x` and `y` share a component, `Max` if
/// the component of `x` comes first and `Min` otherwise.
#[derive(Debug, Clone)]
pub struct SparseDigraph {
    actions: Vec<ActionId>,
    positions: HashMap<ActionId, usize>,
    components: Vec<Component>,
    // Per action: (component index, position in the component)
    placement: Vec<(usize, usize)>,
    ranking_rule: RankingRule,
    strategy: OrderingStrategy,
    sorting: QuantilesSorting,
    boosted_ranking: Ranking,
    // Per action: 1-based position in the boosted ranking
    ranks: Vec<usize>,
    fill_rate: Decimal,
}

impl SparseDigraph {
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn sorting(&self) -> &QuantilesSorting {
        &self.sorting
    }

    pub fn ranking_rule(&self) -> RankingRule {
        self.ranking_rule
    }

    pub fn strategy(&self) -> OrderingStrategy {
        self.strategy
    }

    /// The concatenation of the local rankings, best component first.
    pub fn boosted_ranking(&self) -> &Ranking {
        &self.boosted_ranking
    }

    /// Share of the ordered pairs whose relation is actually computed.
    pub fn fill_rate(&self) -> Decimal {
        self.fill_rate
    }

    pub fn component_of(&self, action: &str) -> Option<&Component> {
        let x = self.position(action)?;
        Some(&self.components[self.placement[x].0])
    }

    /// The 1-based position of the action in the boosted ranking.
    pub fn action_rank(&self, action: &str) -> Option<usize> {
        let x = self.position(action)?;
        self.ranks.get(x).copied()
    }

    pub fn summary(&self) -> DecompositionSummary {
        let mut sizes: Vec<usize> = self.components.iter().map(|c| c.members.len()).collect();
        sizes.sort_unstable();
        let count = sizes.len();
        if count == 0 {
            return DecompositionSummary {
                components: 0,
                min: 0,
                max: 0,
                median: Decimal::ZERO,
                mean: Decimal::ZERO,
                stdev: Decimal::ZERO,
                fill_rate: self.fill_rate,
            };
        }
        let median = if count % 2 == 1 {
            Decimal::from(sizes[count / 2])
        } else {
            Decimal::from(sizes[count / 2 - 1] + sizes[count / 2]) / Decimal::TWO
        };
        let n = Decimal::from(count);
        let mean = Decimal::from(sizes.iter().sum::<usize>()) / n;
        let variance = sizes
            .iter()
            .map(|s| (Decimal::from(*s) - mean) * (Decimal::from(*s) - mean))
            .sum::<Decimal>()
            / n;
        DecompositionSummary {
            components: count,
            min: sizes[0],
            max: sizes[count - 1],
            median,
            mean,
            stdev: variance.sqrt().unwrap_or(Decimal::ZERO),
            fill_rate: self.fill_rate,
        }
    }
}

impl OutrankingRelation for SparseDigraph {
    fn relation(&self, x: usize, y: usize) -> Valuation {
        let domain = ValuationDomain::NORMALIZED;
        if x == y {
            return domain.med();
        }
        let (cx, lx) = self.placement[x];
        let (cy, ly) = self.placement[y];
        if cx == cy {
            self.components[cx].local_digraph.relation(lx, ly)
        } else if cx < cy {
            domain.max()
        } else {
            domain.min()
        }
    }
}

impl BipolarDigraph for SparseDigraph {
    fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    fn valuation_domain(&self) -> ValuationDomain {
        ValuationDomain::NORMALIZED
    }

    fn position(&self, action: &str) -> Option<usize> {
        self.positions.get(action).copied()
    }
}

// Larger is better.
type ScoreKey = [Decimal; 4];

/// The ordering key of a sorted action for a strategy.
pub fn score_key(strategy: OrderingStrategy, sorting: &ActionSorting) -> [Decimal; 4] {
    let lo = Decimal::from(sorting.low_category);
    let hi = Decimal::from(sorting.high_category);
    match strategy {
        OrderingStrategy::Average => [lo + hi, hi, lo + hi, hi],
        OrderingStrategy::Optimistic => [hi, lo, hi, lo],
        OrderingStrategy::Pessimistic => [lo, hi, lo, hi],
        OrderingStrategy::Optimal => [
            (lo + hi) / Decimal::TWO,
            hi,
            sorting.low_limit - sorting.not_high_limit,
            -sorting.not_high_limit,
        ],
    }
}

// A block of action positions with its quantile range.
struct Group {
    members: Vec<usize>,
    low: Decimal,
    high: Decimal,
}

impl Group {
    fn absorb(self, other: Group) -> Group {
        let mut members = self.members;
        members.extend(other.members);
        members.sort_unstable();
        Group {
            members,
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

/// Builds sparse pre-ranked digraphs.
#[derive(Debug, Clone)]
pub struct PreRankedDecomposer {
    options: PreRankingOptions,
}

impl PreRankedDecomposer {
    pub fn new(options: &PreRankingOptions) -> OutrankingResult<PreRankedDecomposer> {
        ensure!(
            options.min_component_size >= 1,
            InvalidComponentSizeSnafu {
                size: options.min_component_size
            }
        );
        if let Some(q) = options.quantiles {
            ensure!(q >= 2, InvalidQuantilesSnafu { quantiles: q });
        }
        Ok(PreRankedDecomposer {
            options: options.clone(),
        })
    }

    fn outranking_options(&self) -> OutrankingOptions {
        OutrankingOptions {
            normalized: true,
            symmetric_thresholds: self.options.symmetric_thresholds,
            threads: self.options.threads,
            cancel: self.options.cancel.clone(),
        }
    }

    /// Sorts the tableau into quantiles, then decomposes it.
    pub fn decompose(&self, tableau: &PerformanceTableau) -> OutrankingResult<SparseDigraph> {
        let n = tableau.order();
        ensure!(n > 0, EmptyActionSetSnafu {});
        let sorting_options = SortingOptions {
            quantiles: self.options.quantiles_for(n),
            lower_closed: self.options.lower_closed,
        };
        info!(
            "decompose: {} actions, {} quantiles, strategy {}, rule {}",
            n, sorting_options.quantiles, self.options.strategy, self.options.ranking_rule
        );
        let sorter = QuantilesSorter::new(&sorting_options, &self.outranking_options())?;
        run_in_pool(self.options.threads, || {
            let sorting = sorter.sort_in_current_pool(tableau)?;
            self.decompose_in_current_pool(tableau, sorting)
        })
    }

    /// Decomposes a tableau along an existing quantiles sorting of it.
    pub fn decompose_sorted(
        &self,
        tableau: &PerformanceTableau,
        sorting: QuantilesSorting,
    ) -> OutrankingResult<SparseDigraph> {
        ensure!(tableau.order() > 0, EmptyActionSetSnafu {});
        run_in_pool(self.options.threads, || {
            self.decompose_in_current_pool(tableau, sorting)
        })
    }

    fn groups(&self, tableau: &PerformanceTableau, sorting: &QuantilesSorting) -> OutrankingResult<Vec<Group>> {
        let q = Decimal::from(sorting.quantiles());
        let mut by_key: BTreeMap<ScoreKey, Group> = BTreeMap::new();
        for (x, a) in tableau.actions().iter().enumerate() {
            let s = sorting.action_sorting(&a.id).context(MismatchedActionsSnafu {
                detail: format!("action {} is not sorted", a.id),
            })?;
            let group = Group {
                members: vec![x],
                low: Decimal::from(s.low_category - 1) / q,
                high: Decimal::from(s.high_category) / q,
            };
            let key = score_key(self.options.strategy, s);
            let merged = match by_key.remove(&key) {
                Some(existing) => existing.absorb(group),
                None => group,
            };
            by_key.insert(key, merged);
        }

        // Best first, undersized groups absorb the following ones.
        let mut groups: Vec<Group> = Vec::new();
        let mut pending: Option<Group> = None;
        for (_, group) in by_key.into_iter().rev() {
            let current = match pending.take() {
                Some(p) => p.absorb(group),
                None => group,
            };
            if current.members.len() >= self.options.min_component_size {
                groups.push(current);
            } else {
                pending = Some(current);
            }
        }
        if let Some(tail) = pending {
            debug!("groups: undersized last component of {} actions", tail.members.len());
            groups.push(tail);
        }
        Ok(groups)
    }

    fn decompose_in_current_pool(
        &self,
        tableau: &PerformanceTableau,
        sorting: QuantilesSorting,
    ) -> OutrankingResult<SparseDigraph> {
        let n = tableau.order();
        let groups = self.groups(tableau, &sorting)?;
        let engine = OutrankingEngine::new(&self.outranking_options());
        let rule = self.options.ranking_rule;

        let components: Vec<Component> = groups
            .par_iter()
            .enumerate()
            .map(|(i, group)| {
                let rank = i + 1;
                let task = || -> OutrankingResult<Component> {
                    check_cancel(&self.options.cancel)?;
                    let view = tableau.view_of_positions(group.members.clone());
                    let local_digraph = engine.build(&view, false)?;
                    let local_ranking = rule.apply(&local_digraph)?;
                    Ok(Component {
                        rank,
                        low_qtile_limit: group.low,
                        high_qtile_limit: group.high,
                        members: view.action_ids(),
                        local_digraph,
                        local_ranking,
                    })
                };
                task().map_err(in_task(format!("component {}", rank)))
            })
            .collect::<OutrankingResult<_>>()?;

        let singletons = components.iter().filter(|c| c.members.len() == 1).count();
        if singletons > 0 {
            warn!(
                "decompose: {} of {} components are singletons",
                singletons,
                components.len()
            );
        }

        let mut placement = vec![(0, 0); n];
        for (c, group) in groups.iter().enumerate() {
            for (l, x) in group.members.iter().enumerate() {
                placement[*x] = (c, l);
            }
        }
        let boosted_ranking: Ranking = components
            .iter()
            .flat_map(|c| c.local_ranking.iter().cloned())
            .collect();
        let fill_rate = if n < 2 {
            Decimal::ZERO
        } else {
            let filled: usize = components
                .iter()
                .map(|c| c.members.len() * (c.members.len() - 1))
                .sum();
            Decimal::from(filled) / Decimal::from(n * (n - 1))
        };
        info!(
            "decompose: {} components, fill rate {}",
            components.len(),
            fill_rate.round_dp(4)
        );

        let actions = tableau.action_ids();
        let positions: HashMap<ActionId, usize> = actions
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.clone(), idx))
            .collect();
        let mut ranks = vec![0; n];
        for (r, a) in boosted_ranking.iter().enumerate() {
            if let Some(x) = positions.get(a) {
                ranks[*x] = r + 1;
            }
        }
        Ok(SparseDigraph {
            actions,
            positions,
            components,
            placement,
            ranking_rule: rule,
            strategy: self.options.strategy,
            sorting,
            boosted_ranking,
            ranks,
            fill_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableauBuilder;
    use crate::ranking::copeland_ranking;
    use crate::tableau::{AffineThreshold, Criterion, Evaluation, ThresholdKind};
    use rust_decimal_macros::dec;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tableau(values: &[(&str, Decimal, Decimal)]) -> PerformanceTableau {
        let ids: Vec<String> = values.iter().map(|(a, _, _)| a.to_string()).collect();
        let mut b = TableauBuilder::new("t").actions(&ids).unwrap();
        b.add_criterion(Criterion::new("g1", dec!(1), (dec!(0), dec!(100))))
            .unwrap();
        b.add_criterion(Criterion::new("g2", dec!(1), (dec!(0), dec!(100))))
            .unwrap();
        for (a, v1, v2) in values {
            b.set_evaluation("g1", a, Evaluation::Value(*v1)).unwrap();
            b.set_evaluation("g2", a, Evaluation::Value(*v2)).unwrap();
        }
        b.build().unwrap()
    }

    fn spread() -> PerformanceTableau {
        tableau(&[
            ("a0", dec!(0), dec!(0)),
            ("a25", dec!(25), dec!(25)),
            ("a50", dec!(50), dec!(50)),
            ("a75", dec!(75), dec!(75)),
            ("a100", dec!(100), dec!(100)),
        ])
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equivalent_actions_form_one_component() {
        init();
        let t = tableau(&[
            ("c", dec!(5), dec!(7)),
            ("a", dec!(5), dec!(7)),
            ("b", dec!(5), dec!(7)),
        ]);
        let options = PreRankingOptions {
            quantiles: Some(3),
            ..PreRankingOptions::DEFAULT
        };
        let sparse = PreRankedDecomposer::new(&options)
            .unwrap()
            .decompose(&t)
            .unwrap();
        assert_eq!(sparse.components().len(), 1);
        let component = &sparse.components()[0];
        assert_eq!(component.rank, 1);
        assert_eq!(
            sparse.boosted_ranking(),
            &copeland_ranking(&component.local_digraph).unwrap()
        );
        assert_eq!(sparse.boosted_ranking(), &ids(&["a", "b", "c"]));
        assert_eq!(sparse.fill_rate(), dec!(1));
    }

    #[test]
    fn distinct_actions_form_ordered_components() {
        init();
        let options = PreRankingOptions {
            threads: Some(2),
            ..PreRankingOptions::DEFAULT
        };
        let sparse = PreRankedDecomposer::new(&options)
            .unwrap()
            .decompose(&spread())
            .unwrap();
        assert_eq!(sparse.sorting().quantiles(), 5);
        assert_eq!(sparse.components().len(), 5);
        assert_eq!(
            sparse.boosted_ranking(),
            &ids(&["a100", "a75", "a50", "a25", "a0"])
        );
        assert_eq!(sparse.fill_rate(), dec!(0));
        assert_eq!(sparse.relation_between("a100", "a0").unwrap(), dec!(1));
        assert_eq!(sparse.relation_between("a0", "a100").unwrap(), dec!(-1));
        assert_eq!(sparse.relation_between("a0", "a0").unwrap(), dec!(0));
        assert_eq!(sparse.action_rank("a50"), Some(3));
        assert_eq!(sparse.component_of("a75").unwrap().rank, 2);
        let top = &sparse.components()[0];
        assert_eq!(top.high_qtile_limit, dec!(1));
        assert_eq!(top.low_qtile_limit, dec!(0.8));
    }

    #[test]
    fn small_groups_are_merged() {
        let options = PreRankingOptions {
            min_component_size: 2,
            ..PreRankingOptions::DEFAULT
        };
        let sparse = PreRankedDecomposer::new(&options)
            .unwrap()
            .decompose(&spread())
            .unwrap();
        let members: Vec<Vec<String>> = sparse
            .components()
            .iter()
            .map(|c| c.members.clone())
            .collect();
        assert_eq!(
            members,
            vec![ids(&["a75", "a100"]), ids(&["a25", "a50"]), ids(&["a0"])]
        );
        assert_eq!(
            sparse.boosted_ranking(),
            &ids(&["a100", "a75", "a50", "a25", "a0"])
        );
        assert_eq!(sparse.fill_rate(), dec!(0.2));
        assert_eq!(sparse.relation_between("a100", "a75").unwrap(), dec!(1));
        assert_eq!(sparse.relation_between("a75", "a100").unwrap(), dec!(-1));

        let summary = sparse.summary();
        assert_eq!(summary.components, 3);
        assert_eq!(summary.min, 1);
        assert_eq!(summary.max, 2);
        assert_eq!(summary.median, dec!(2));
        assert!(summary.stdev > dec!(0.471) && summary.stdev < dec!(0.472));

        // Every action in exactly one component.
        let mut all: Vec<String> = members.into_iter().flatten().collect();
        all.sort();
        let mut expected = spread().action_ids();
        expected.sort();
        assert_eq!(all, expected);
    }

    #[test]
    fn local_relations_use_symmetric_thresholds() {
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
        let mut b = TableauBuilder::new("t")
            .actions(&ids(&["a", "b"]))
            .unwrap();
        b.add_criterion(g).unwrap();
        b.set_evaluation("g", "a", Evaluation::Value(dec!(10))).unwrap();
        b.set_evaluation("g", "b", Evaluation::Value(dec!(11.5))).unwrap();
        let t = b.build().unwrap();

        let options = PreRankingOptions {
            quantiles: Some(2),
            min_component_size: 2,
            symmetric_thresholds: true,
            ..PreRankingOptions::DEFAULT
        };
        let sparse = PreRankedDecomposer::new(&options)
            .unwrap()
            .decompose(&t)
            .unwrap();
        assert_eq!(sparse.components().len(), 1);
        let dense = OutrankingEngine::new(&OutrankingOptions {
            symmetric_thresholds: true,
            ..OutrankingOptions::DEFAULT
        })
        .outrank(&t)
        .unwrap();
        let r = sparse.relation_between("a", "b").unwrap();
        assert_eq!(r, dense.relation_between("a", "b").unwrap());
        // 0.45 / 1.15 with the thresholds taken at 11.5, 0 at 10.
        assert!(r > dec!(0.39) && r < dec!(0.392), "{}", r);

        let sparse = PreRankedDecomposer::new(&PreRankingOptions {
            symmetric_thresholds: false,
            ..options
        })
        .unwrap()
        .decompose(&t)
        .unwrap();
        assert_eq!(sparse.relation_between("a", "b").unwrap(), dec!(0));
    }

    #[test]
    fn lookups_by_identifier() {
        let values: Vec<(String, Decimal, Decimal)> = (0..600)
            .map(|i| {
                (
                    format!("x{}", i),
                    Decimal::from(i * 7 % 100),
                    Decimal::from(i * 13 % 100),
                )
            })
            .collect();
        let refs: Vec<(&str, Decimal, Decimal)> = values
            .iter()
            .map(|(a, v1, v2)| (a.as_str(), *v1, *v2))
            .collect();
        let t = tableau(&refs);
        let sparse = PreRankedDecomposer::new(&PreRankingOptions::DEFAULT)
            .unwrap()
            .decompose(&t)
            .unwrap();
        for (position, action) in sparse.boosted_ranking().iter().enumerate() {
            assert_eq!(sparse.action_rank(action), Some(position + 1));
        }
        let sorting = sparse.sorting();
        for action in t.action_ids() {
            assert_eq!(sorting.action_sorting(&action).unwrap().action, action);
            assert_eq!(
                sorting.memberships(&action).unwrap().len(),
                sorting.quantiles()
            );
        }
        assert_eq!(sparse.action_rank("nope"), None);
        assert!(sorting.action_sorting("nope").is_none());
        assert!(sorting.memberships("nope").is_none());
    }

    #[test]
    fn score_keys() {
        let s = ActionSorting {
            action: "a".to_string(),
            low_category: 2,
            high_category: 4,
            credibility: dec!(0.2),
            low_limit: dec!(0.6),
            not_high_limit: dec!(0.2),
        };
        assert_eq!(
            score_key(OrderingStrategy::Average, &s),
            [dec!(6), dec!(4), dec!(6), dec!(4)]
        );
        assert_eq!(
            score_key(OrderingStrategy::Optimistic, &s),
            [dec!(4), dec!(2), dec!(4), dec!(2)]
        );
        assert_eq!(
            score_key(OrderingStrategy::Pessimistic, &s),
            [dec!(2), dec!(4), dec!(2), dec!(4)]
        );
        assert_eq!(
            score_key(OrderingStrategy::Optimal, &s),
            [dec!(3), dec!(4), dec!(0.4), dec!(-0.2)]
        );
    }

    #[test]
    fn invalid_options() {
        let options = PreRankingOptions {
            min_component_size: 0,
            ..PreRankingOptions::DEFAULT
        };
        assert!(PreRankedDecomposer::new(&options).is_err());
        let options = PreRankingOptions {
            quantiles: Some(1),
            ..PreRankingOptions::DEFAULT
        };
        assert!(PreRankedDecomposer::new(&options).is_err());
    }

    #[test]
    fn cancellation() {
        let flag = CancelFlag::new();
        flag.cancel();
        let options = PreRankingOptions {
            cancel: Some(flag),
            ..PreRankingOptions::DEFAULT
        };
        let err = PreRankedDecomposer::new(&options)
            .unwrap()
            .decompose(&spread())
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
