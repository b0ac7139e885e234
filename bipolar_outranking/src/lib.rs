/*!
Bipolar-valued outranking digraphs for multiple criteria decision aid.

A [`PerformanceTableau`] evaluates decision actions on weighted criteria. From it:
* [`OutrankingEngine`] builds the dense bipolar-valued outranking digraph;
* [`QuantilesSorter`] sorts the actions into q-tile categories;
* [`PreRankedDecomposer`] builds a sparse digraph of ordered components, suitable for large sets of actions;
* the [`ranking`] rules turn any digraph into a linear ranking;
* [`correlation`] measures how well two relations, or a ranking and the criteria, agree.

See the [`manual`] for the tableau format and the conventions.
*/

mod config;
mod digraph;
mod outranking;
mod quantiles;
mod sparse;
mod tableau;
mod valuation;

pub mod builder;
pub mod correlation;
pub mod manual;
pub mod ranking;

pub use crate::config::*;
pub use crate::digraph::*;
pub use crate::outranking::*;
pub use crate::quantiles::*;
pub use crate::ranking::{FusionOperator, Ranking};
pub use crate::sparse::*;
pub use crate::tableau::*;
pub use crate::valuation::*;
