//! Ranking rules on bipolar-valued digraphs.
//!
//! All the rankings are linear orders, best action first. Equal scores are
//! resolved by increasing action identifier.

use std::cmp::Ordering;

use log::debug;
use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;
use crate::digraph::{preorder_relation, ActionId, BipolarDigraph, DenseDigraph};
use crate::valuation::{omax, omin, Valuation, ValuationDomain};

/// A linear order of actions, best first.
pub type Ranking = Vec<ActionId>;

/// How several rankings are fused into one relation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum FusionOperator {
    /// Epistemic disjunction (`omax`).
    Disjunctive,
    /// Epistemic conjunction (`omin`).
    Conjunctive,
}

impl RankingRule {
    /// Ranks the actions of the digraph with this rule.
    pub fn apply<D: BipolarDigraph + ?Sized>(&self, digraph: &D) -> OutrankingResult<Ranking> {
        match self {
            RankingRule::Copeland => copeland_ranking(digraph),
            RankingRule::NetFlows => net_flows_ranking(digraph),
            RankingRule::Kohler => kohler_ranking(digraph),
            RankingRule::ArrowRaynaud => arrow_raynaud_ranking(digraph),
        }
    }
}

fn ensure_not_empty<D: BipolarDigraph + ?Sized>(digraph: &D) -> OutrankingResult<()> {
    ensure!(digraph.order() > 0, EmptyActionSetSnafu {});
    Ok(())
}

// Descending score, then ascending identifier.
fn by_score(a: &(ActionId, Decimal), b: &(ActionId, Decimal)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn scored<D, F>(digraph: &D, score: F) -> Vec<(ActionId, Decimal)>
where
    D: BipolarDigraph + ?Sized,
    F: Fn(usize) -> Decimal,
{
    let mut scores: Vec<(ActionId, Decimal)> = digraph
        .actions()
        .iter()
        .enumerate()
        .map(|(x, a)| (a.clone(), score(x)))
        .collect();
    scores.sort_by(by_score);
    scores
}

/// Copeland scores: for every other action, +1 for each strict polarized win
/// and -1 for each strict polarized loss, in both directions.
pub fn copeland_scores<D: BipolarDigraph + ?Sized>(
    digraph: &D,
) -> OutrankingResult<Vec<(ActionId, Decimal)>> {
    ensure_not_empty(digraph)?;
    let med = digraph.valuation_domain().med();
    let n = digraph.order();
    let sign = |v: Valuation| -> i64 {
        match v.cmp(&med) {
            Ordering::Greater => 1,
            Ordering::Less => -1,
            Ordering::Equal => 0,
        }
    };
    Ok(scored(digraph, |x| {
        let total: i64 = (0..n)
            .filter(|y| *y != x)
            .map(|y| sign(digraph.relation(x, y)) - sign(digraph.relation(y, x)))
            .sum();
        Decimal::from(total)
    }))
}

pub fn copeland_ranking<D: BipolarDigraph + ?Sized>(digraph: &D) -> OutrankingResult<Ranking> {
    Ok(copeland_scores(digraph)?.into_iter().map(|(a, _)| a).collect())
}

/// Net flows: `sum_y r(x, y) - r(y, x)`.
pub fn net_flows_scores<D: BipolarDigraph + ?Sized>(
    digraph: &D,
) -> OutrankingResult<Vec<(ActionId, Decimal)>> {
    ensure_not_empty(digraph)?;
    let n = digraph.order();
    Ok(scored(digraph, |x| {
        (0..n)
            .filter(|y| *y != x)
            .map(|y| digraph.relation(x, y) - digraph.relation(y, x))
            .sum()
    }))
}

pub fn net_flows_ranking<D: BipolarDigraph + ?Sized>(digraph: &D) -> OutrankingResult<Ranking> {
    Ok(net_flows_scores(digraph)?.into_iter().map(|(a, _)| a).collect())
}

/// Kohler's rule: repeatedly rank first the remaining action with the
/// largest minimal outranking value against the other remaining actions.
pub fn kohler_ranking<D: BipolarDigraph + ?Sized>(digraph: &D) -> OutrankingResult<Ranking> {
    ensure_not_empty(digraph)?;
    let domain = digraph.valuation_domain();
    let actions = digraph.actions();
    let mut remaining: Vec<usize> = (0..digraph.order()).collect();
    let mut ranking: Ranking = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut best: Option<(usize, Valuation)> = None;
        for &x in remaining.iter() {
            let score = remaining
                .iter()
                .filter(|y| **y != x)
                .map(|y| digraph.relation(x, *y))
                .min()
                .unwrap_or_else(|| domain.max());
            best = match best {
                Some((b, s)) if s > score || (s == score && actions[b] < actions[x]) => {
                    Some((b, s))
                }
                _ => Some((x, score)),
            };
        }
        if let Some((b, s)) = best {
            debug!("kohler_ranking: rank {}: {} ({})", ranking.len() + 1, actions[b], s);
            ranking.push(actions[b].clone());
            remaining.retain(|x| *x != b);
        }
    }
    Ok(ranking)
}

/// Arrow-Raynaud's rule: repeatedly rank last the remaining action with the
/// smallest maximal outranking value against the other remaining actions.
///
/// Among tied candidates, the greatest identifier is ranked last first.
pub fn arrow_raynaud_ranking<D: BipolarDigraph + ?Sized>(
    digraph: &D,
) -> OutrankingResult<Ranking> {
    ensure_not_empty(digraph)?;
    let domain = digraph.valuation_domain();
    let actions = digraph.actions();
    let mut remaining: Vec<usize> = (0..digraph.order()).collect();
    let mut worst_first: Ranking = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut worst: Option<(usize, Valuation)> = None;
        for &x in remaining.iter() {
            let score = remaining
                .iter()
                .filter(|y| **y != x)
                .map(|y| digraph.relation(x, *y))
                .max()
                .unwrap_or_else(|| domain.min());
            worst = match worst {
                Some((w, s)) if s < score || (s == score && actions[w] > actions[x]) => {
                    Some((w, s))
                }
                _ => Some((x, score)),
            };
        }
        if let Some((w, _)) = worst {
            worst_first.push(actions[w].clone());
            remaining.retain(|x| *x != w);
        }
    }
    worst_first.reverse();
    Ok(worst_first)
}

/// A linear ranking as a weak order of singleton classes.
pub fn ranking_to_preorder(ranking: &[ActionId]) -> Vec<Vec<ActionId>> {
    ranking.iter().map(|a| vec![a.clone()]).collect()
}

/// Fuses rankings of (subsets of) the actions into one normalized relation.
///
/// Each ranking becomes its preorder relation, then the relations are
/// combined element-wise with `omax` or `omin`.
pub fn fuse_rankings(
    actions: &[ActionId],
    rankings: &[Ranking],
    operator: FusionOperator,
) -> OutrankingResult<DenseDigraph> {
    ensure!(!actions.is_empty(), EmptyActionSetSnafu {});
    let relations = rankings
        .iter()
        .map(|r| preorder_relation(actions, &ranking_to_preorder(r)))
        .collect::<OutrankingResult<Vec<DenseDigraph>>>()?;
    let domain = ValuationDomain::NORMALIZED;
    let n = actions.len();
    let relation = (0..n)
        .map(|x| {
            (0..n)
                .map(|y| {
                    let terms: Vec<Valuation> =
                        relations.iter().map(|r| r.relation_matrix()[x][y]).collect();
                    match operator {
                        FusionOperator::Disjunctive => omax(domain.med(), &terms),
                        FusionOperator::Conjunctive => omin(domain.med(), &terms),
                    }
                })
                .collect()
        })
        .collect();
    DenseDigraph::new(actions.to_vec(), domain, relation)
}
