use std::collections::HashMap;

use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::config::*;
use crate::outranking::PolarisationCounts;
use crate::sparse::SparseDigraph;
use crate::valuation::{Valuation, ValuationDomain};

pub type ActionId = String;

/// The characteristic function of a bipolar-valued relation.
pub trait OutrankingRelation {
    /// `r(x S y)` for the actions at positions `x` and `y`.
    fn relation(&self, x: usize, y: usize) -> Valuation;
}

/// A bipolar-valued relation over a known set of actions.
pub trait BipolarDigraph: OutrankingRelation {
    fn actions(&self) -> &[ActionId];

    fn valuation_domain(&self) -> ValuationDomain;

    fn position(&self, action: &str) -> Option<usize>;

    fn order(&self) -> usize {
        self.actions().len()
    }

    fn relation_between(&self, x: &str, y: &str) -> OutrankingResult<Valuation> {
        let px = self.position(x).context(UnknownActionSnafu { action: x })?;
        let py = self.position(y).context(UnknownActionSnafu { action: y })?;
        Ok(self.relation(px, py))
    }

    /// Mean of `|r - Med| / (Max - Med)` over the distinct ordered pairs.
    fn determinateness(&self) -> Valuation {
        let n = self.order();
        if n < 2 {
            return Decimal::ZERO;
        }
        let domain = self.valuation_domain();
        let half = domain.max() - domain.med();
        let mut total = Decimal::ZERO;
        for x in 0..n {
            for y in 0..n {
                if x != y {
                    total += (self.relation(x, y) - domain.med()).abs();
                }
            }
        }
        total / half / Decimal::from(n * (n - 1))
    }
}

fn positions_of(actions: &[ActionId]) -> OutrankingResult<HashMap<ActionId, usize>> {
    let mut positions = HashMap::with_capacity(actions.len());
    for (idx, a) in actions.iter().enumerate() {
        let previous = positions.insert(a.clone(), idx);
        ensure!(previous.is_none(), DuplicateActionSnafu { action: a });
    }
    Ok(positions)
}

/// A digraph that stores every characteristic value.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DenseDigraph {
    actions: Vec<ActionId>,
    positions: HashMap<ActionId, usize>,
    domain: ValuationDomain,
    // [x][y]
    relation: Vec<Vec<Valuation>>,
    polarisations: Option<Vec<Vec<PolarisationCounts>>>,
}

impl DenseDigraph {
    /// Builds a digraph from a full relation matrix.
    ///
    /// The matrix must be square, of the size of the action set, with values in
    /// the domain. The diagonal is reset to `Med`.
    pub fn new(
        actions: Vec<ActionId>,
        domain: ValuationDomain,
        mut relation: Vec<Vec<Valuation>>,
    ) -> OutrankingResult<DenseDigraph> {
        let positions = positions_of(&actions)?;
        let n = actions.len();
        ensure!(
            relation.len() == n && relation.iter().all(|row| row.len() == n),
            MismatchedActionsSnafu {
                detail: format!("the relation matrix is not {}x{}", n, n)
            }
        );
        for (x, row) in relation.iter_mut().enumerate() {
            if let Some(v) = row.iter().find(|v| !domain.contains(**v)) {
                return InvalidDomainSnafu {
                    min: domain.min().min(*v),
                    max: domain.max().max(*v),
                }
                .fail();
            }
            row[x] = domain.med();
        }
        Ok(DenseDigraph {
            actions,
            positions,
            domain,
            relation,
            polarisations: None,
        })
    }

    /// Assembles an already checked relation.
    pub(crate) fn from_rows(
        actions: Vec<ActionId>,
        domain: ValuationDomain,
        relation: Vec<Vec<Valuation>>,
        polarisations: Option<Vec<Vec<PolarisationCounts>>>,
    ) -> DenseDigraph {
        let positions = actions
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.clone(), idx))
            .collect();
        DenseDigraph {
            actions,
            positions,
            domain,
            relation,
            polarisations,
        }
    }

    /// A digraph with every value indeterminate.
    pub fn indeterminate(
        actions: Vec<ActionId>,
        domain: ValuationDomain,
    ) -> OutrankingResult<DenseDigraph> {
        let n = actions.len();
        DenseDigraph::new(actions, domain, vec![vec![domain.med(); n]; n])
    }

    pub fn relation_matrix(&self) -> &[Vec<Valuation>] {
        &self.relation
    }

    /// The considerable performance differences recorded for `(x, y)`,
    /// if the digraph comes from the outranking engine.
    pub fn polarisation(&self, x: usize, y: usize) -> Option<PolarisationCounts> {
        self.polarisations.as_ref().map(|p| p[x][y])
    }

    /// The converse of the negation: `r'(x, y) = Max + Min - r(y, x)`.
    pub fn codual(&self) -> DenseDigraph {
        let n = self.actions.len();
        let relation = (0..n)
            .map(|x| {
                (0..n)
                    .map(|y| {
                        if x == y {
                            self.domain.med()
                        } else {
                            self.domain.negate(self.relation[y][x])
                        }
                    })
                    .collect()
            })
            .collect();
        DenseDigraph::from_rows(self.actions.clone(), self.domain, relation, None)
    }

    pub fn recoded(&self, to: &ValuationDomain) -> DenseDigraph {
        let relation = self
            .relation
            .iter()
            .map(|row| row.iter().map(|v| self.domain.recode(*v, to)).collect())
            .collect();
        DenseDigraph::from_rows(
            self.actions.clone(),
            *to,
            relation,
            self.polarisations.clone(),
        )
    }

    pub fn normalized(&self) -> DenseDigraph {
        self.recoded(&ValuationDomain::NORMALIZED)
    }
}

impl OutrankingRelation for DenseDigraph {
    fn relation(&self, x: usize, y: usize) -> Valuation {
        self.relation[x][y]
    }
}

impl BipolarDigraph for DenseDigraph {
    fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    fn valuation_domain(&self) -> ValuationDomain {
        self.domain
    }

    fn position(&self, action: &str) -> Option<usize> {
        self.positions.get(action).copied()
    }
}

/// Either representation of an outranking digraph.
#[derive(Debug, Clone)]
pub enum Digraph {
    Dense(DenseDigraph),
    Sparse(SparseDigraph),
}

impl From<DenseDigraph> for Digraph {
    fn from(d: DenseDigraph) -> Self {
        Digraph::Dense(d)
    }
}

impl From<SparseDigraph> for Digraph {
    fn from(d: SparseDigraph) -> Self {
        Digraph::Sparse(d)
    }
}

impl Digraph {
    /// The dense version of this digraph. Sparse digraphs are materialized.
    pub fn to_dense(&self) -> DenseDigraph {
        match self {
            Digraph::Dense(d) => d.clone(),
            Digraph::Sparse(s) => materialize(s),
        }
    }
}

impl OutrankingRelation for Digraph {
    fn relation(&self, x: usize, y: usize) -> Valuation {
        match self {
            Digraph::Dense(d) => d.relation(x, y),
            Digraph::Sparse(s) => s.relation(x, y),
        }
    }
}

impl BipolarDigraph for Digraph {
    fn actions(&self) -> &[ActionId] {
        match self {
            Digraph::Dense(d) => d.actions(),
            Digraph::Sparse(s) => s.actions(),
        }
    }

    fn valuation_domain(&self) -> ValuationDomain {
        match self {
            Digraph::Dense(d) => d.valuation_domain(),
            Digraph::Sparse(s) => s.valuation_domain(),
        }
    }

    fn position(&self, action: &str) -> Option<usize> {
        match self {
            Digraph::Dense(d) => d.position(action),
            Digraph::Sparse(s) => s.position(action),
        }
    }
}

/// Stores every characteristic value of a digraph.
pub fn materialize<D: BipolarDigraph + ?Sized>(digraph: &D) -> DenseDigraph {
    let n = digraph.order();
    let relation = (0..n)
        .map(|x| (0..n).map(|y| digraph.relation(x, y)).collect())
        .collect();
    DenseDigraph::from_rows(
        digraph.actions().to_vec(),
        digraph.valuation_domain(),
        relation,
        None,
    )
}

/// The normalized relation of a weak order.
///
/// `preorder` lists equivalence classes from best to worst. An action placed
/// in an earlier class outranks (`Max`) the actions of the later classes; two
/// actions of the same class, or an action absent from the preorder, compare
/// as `Med`.
pub fn preorder_relation(
    actions: &[ActionId],
    preorder: &[Vec<ActionId>],
) -> OutrankingResult<DenseDigraph> {
    let positions = positions_of(actions)?;
    let mut class_of: Vec<Option<usize>> = vec![None; actions.len()];
    for (class, members) in preorder.iter().enumerate() {
        for a in members {
            let x = positions
                .get(a)
                .context(UnknownActionSnafu { action: a })?;
            class_of[*x] = Some(class);
        }
    }
    let domain = ValuationDomain::NORMALIZED;
    let n = actions.len();
    let relation = (0..n)
        .map(|x| {
            (0..n)
                .map(|y| match (class_of[x], class_of[y]) {
                    (Some(cx), Some(cy)) if cx < cy => domain.max(),
                    (Some(cx), Some(cy)) if cx > cy => domain.min(),
                    _ => domain.med(),
                })
                .collect()
        })
        .collect();
    Ok(DenseDigraph::from_rows(actions.to_vec(), domain, relation, None))
}
