// ********* Errors ***********

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use snafu::prelude::*;

use crate::tableau::ThresholdKind;

/// The broad families of failures.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ErrorKind {
    /// The tableau or the options are not acceptable.
    Configuration,
    /// The data refers to unknown or duplicate objects, or some data is missing.
    Data,
    /// The requested operation makes no sense on this input (empty set of actions).
    Domain,
    /// A parallel task failed or the run was cancelled.
    Concurrency,
}

/// Errors that prevent a computation from completing.
///
/// Degenerate results (an indeterminate correlation, a singleton component, ...)
/// are not errors: they are reported through the `log` facade.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OutrankingError {
    #[snafu(display("criterion {criterion}: malformed scale [{low}, {high}]"))]
    MalformedScale {
        criterion: String,
        low: Decimal,
        high: Decimal,
    },
    #[snafu(display("criterion {criterion}: negative {threshold} threshold {value}"))]
    NegativeThreshold {
        criterion: String,
        threshold: ThresholdKind,
        value: Decimal,
    },
    #[snafu(display("criterion {criterion}: contradictory thresholds: {detail}"))]
    ContradictoryThresholds { criterion: String, detail: String },
    #[snafu(display("the criteria weights sum up to zero"))]
    NullWeights {},
    #[snafu(display("at least 2 quantiles are required, got {quantiles}"))]
    InvalidQuantiles { quantiles: usize },
    #[snafu(display("the minimal component size must be at least 1, got {size}"))]
    InvalidComponentSize { size: usize },
    #[snafu(display("invalid valuation domain [{min}, {max}]"))]
    InvalidDomain { min: Decimal, max: Decimal },
    #[snafu(display("could not build the thread pool"))]
    ThreadPool { source: rayon::ThreadPoolBuildError },

    #[snafu(display("criterion {criterion}: the missing data symbol {na} lies inside the scale"))]
    NaInsideScale { criterion: String, na: Decimal },
    #[snafu(display("unknown action {action}"))]
    UnknownAction { action: String },
    #[snafu(display("unknown criterion {criterion}"))]
    UnknownCriterion { criterion: String },
    #[snafu(display("no evaluation of action {action} on criterion {criterion}"))]
    MissingEvaluation { criterion: String, action: String },
    #[snafu(display("action {action} is declared twice"))]
    DuplicateAction { action: String },
    #[snafu(display("criterion {criterion} is declared twice"))]
    DuplicateCriterion { criterion: String },
    #[snafu(display("the relations are not defined on the same actions: {detail}"))]
    MismatchedActions { detail: String },

    #[snafu(display("the set of actions is empty"))]
    EmptyActionSet {},

    #[snafu(display("{context}: {source}"))]
    Task {
        context: String,
        source: Box<OutrankingError>,
    },
    #[snafu(display("the computation was cancelled"))]
    Cancelled {},
}

impl OutrankingError {
    pub fn kind(&self) -> ErrorKind {
        use OutrankingError::*;
        match self {
            MalformedScale { .. }
            | NegativeThreshold { .. }
            | ContradictoryThresholds { .. }
            | NullWeights {}
            | InvalidQuantiles { .. }
            | InvalidComponentSize { .. }
            | InvalidDomain { .. }
            | ThreadPool { .. } => ErrorKind::Configuration,
            NaInsideScale { .. }
            | UnknownAction { .. }
            | UnknownCriterion { .. }
            | MissingEvaluation { .. }
            | DuplicateAction { .. }
            | DuplicateCriterion { .. }
            | MismatchedActions { .. } => ErrorKind::Data,
            EmptyActionSet {} => ErrorKind::Domain,
            Task { .. } | Cancelled {} => ErrorKind::Concurrency,
        }
    }

    /// True if this error, or the error wrapped by a task, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            OutrankingError::Cancelled {} => true,
            OutrankingError::Task { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub type OutrankingResult<T> = Result<T, OutrankingError>;

/// Wraps the error of a parallel task with the task context.
/// Cancellations are passed through unchanged.
pub(crate) fn in_task(context: impl Display) -> impl FnOnce(OutrankingError) -> OutrankingError {
    let context = context.to_string();
    move |err| match err {
        OutrankingError::Cancelled {} => err,
        source => OutrankingError::Task {
            context,
            source: Box::new(source),
        },
    }
}

// ********* Concurrency **********

/// A shared flag for cooperative cancellation.
///
/// Cloning the flag shares it: cancelling any clone cancels all the runs
/// that hold one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> OutrankingResult<()> {
        ensure!(!self.is_cancelled(), CancelledSnafu {});
        Ok(())
    }
}

pub(crate) fn check_cancel(cancel: &Option<CancelFlag>) -> OutrankingResult<()> {
    match cancel {
        Some(flag) => flag.check(),
        None => Ok(()),
    }
}

/// Runs the closure inside a dedicated rayon pool.
/// `None` uses the rayon default number of threads.
pub(crate) fn run_in_pool<T, F>(threads: Option<usize>, f: F) -> OutrankingResult<T>
where
    F: FnOnce() -> OutrankingResult<T> + Send,
    T: Send,
{
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    let pool = builder.build().context(ThreadPoolSnafu {})?;
    pool.install(f)
}

// ********* Configuration **********

/// The rules that turn a bipolar-valued digraph into a linear ranking.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RankingRule {
    /// Net count of polarized wins and losses.
    Copeland,
    /// Sum of the valued net flows.
    NetFlows,
    /// Iterated maximin choice of the best remaining action.
    Kohler,
    /// Iterated minimax choice of the worst remaining action.
    ArrowRaynaud,
}

impl Display for RankingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RankingRule::Copeland => "Copeland",
            RankingRule::NetFlows => "NetFlows",
            RankingRule::Kohler => "Kohler",
            RankingRule::ArrowRaynaud => "ArrowRaynaud",
        };
        write!(f, "{}", name)
    }
}

/// How the quantile sorting of an action is turned into a score for the
/// pre-ranking of the components.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum OrderingStrategy {
    Average,
    Optimistic,
    Pessimistic,
    Optimal,
}

impl Display for OrderingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderingStrategy::Average => "average",
            OrderingStrategy::Optimistic => "optimistic",
            OrderingStrategy::Pessimistic => "pessimistic",
            OrderingStrategy::Optimal => "optimal",
        };
        write!(f, "{}", name)
    }
}

/// Options of the outranking construction.
#[derive(Debug, Clone)]
pub struct OutrankingOptions {
    /// Divide the characteristic values by the weight sum (domain `[-1, 1]`).
    pub normalized: bool,
    /// Evaluate the indifference and preference thresholds at
    /// `max(|x|, |y|)` instead of `|x|`.
    pub symmetric_thresholds: bool,
    /// Number of threads of the rayon pool. `None` is the rayon default.
    pub threads: Option<usize>,
    pub cancel: Option<CancelFlag>,
}

impl OutrankingOptions {
    pub const DEFAULT: OutrankingOptions = OutrankingOptions {
        normalized: true,
        symmetric_thresholds: false,
        threads: None,
        cancel: None,
    };

    pub fn with_threads(self, threads: usize) -> OutrankingOptions {
        OutrankingOptions {
            threads: Some(threads),
            ..self
        }
    }

    pub fn with_cancel(self, cancel: &CancelFlag) -> OutrankingOptions {
        OutrankingOptions {
            cancel: Some(cancel.clone()),
            ..self
        }
    }
}

impl Default for OutrankingOptions {
    fn default() -> Self {
        OutrankingOptions::DEFAULT
    }
}

/// Options of the quantiles sorting.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SortingOptions {
    /// Number of categories. Must be at least 2.
    pub quantiles: usize,
    /// Categories are `[L_{k-1}, L_k)` if true, `(L_{k-1}, L_k]` otherwise.
    pub lower_closed: bool,
}

impl SortingOptions {
    pub const DEFAULT: SortingOptions = SortingOptions {
        quantiles: 5,
        lower_closed: false,
    };
}

impl Default for SortingOptions {
    fn default() -> Self {
        SortingOptions::DEFAULT
    }
}

/// Options of the sparse pre-ranked decomposition.
#[derive(Debug, Clone)]
pub struct PreRankingOptions {
    /// The number of quantiles. If not provided, it is derived from the
    /// number of actions.
    pub quantiles: Option<usize>,
    pub strategy: OrderingStrategy,
    pub lower_closed: bool,
    /// The rule used for ranking each component.
    pub ranking_rule: RankingRule,
    /// Undersized groups of equivalent actions are merged with the following
    /// ones until they reach this size.
    pub min_component_size: usize,
    /// Same as [`OutrankingOptions::symmetric_thresholds`], for the sorting
    /// and the component digraphs.
    pub symmetric_thresholds: bool,
    pub threads: Option<usize>,
    pub cancel: Option<CancelFlag>,
}

impl PreRankingOptions {
    pub const DEFAULT: PreRankingOptions = PreRankingOptions {
        quantiles: None,
        strategy: OrderingStrategy::Average,
        lower_closed: false,
        ranking_rule: RankingRule::Copeland,
        min_component_size: 1,
        symmetric_thresholds: false,
        threads: None,
        cancel: None,
    };

    /// The number of quantiles used for `n` actions.
    ///
    /// Above 1000 actions the count is `n / 200`, so it drops from 10 back to 5
    /// at 1000 and only exceeds 10 from 2200 actions on.
    pub fn quantiles_for(&self, n: usize) -> usize {
        match self.quantiles {
            Some(q) => q,
            None if n < 200 => 5,
            None if n < 1000 => 10,
            None => n / 200,
        }
    }
}

impl Default for PreRankingOptions {
    fn default() -> Self {
        PreRankingOptions::DEFAULT
    }
}

// ******** Output data structures *********

/// Ordinal correlation between two bipolar-valued relations.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct OrdinalCorrelation {
    /// `K / D` in `[-1, 1]`, zero when the relations share no determinateness.
    pub correlation: Decimal,
    /// `D / (n (n - 1))` in `[0, 1]`.
    pub determination: Decimal,
}

impl OrdinalCorrelation {
    pub fn valued(&self) -> Decimal {
        self.correlation * self.determination
    }
}

/// The correlation of one criterion with a global ranking.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CriterionCorrelation {
    pub criterion: String,
    pub correlation: OrdinalCorrelation,
}

/// How well a ranking is supported by the criteria, weighted by their significance.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ConsensusQuality {
    pub mean: Decimal,
    pub stdev: Decimal,
}

/// Statistics of the component sizes of a sparse decomposition.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DecompositionSummary {
    pub components: usize,
    pub min: usize,
    pub max: usize,
    pub median: Decimal,
    pub mean: Decimal,
    pub stdev: Decimal,
    pub fill_rate: Decimal,
}
