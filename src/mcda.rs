use log::{debug, info, warn};

use bipolar_outranking::correlation::{
    marginal_vs_global, ordinal_correlation, ranking_consensus_quality,
};
use bipolar_outranking::ranking::ranking_to_preorder;
use bipolar_outranking::*;
use rust_decimal::Decimal;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::mcda::config_reader::*;

mod io_json;

#[derive(Debug, Snafu)]
pub enum McdaError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("{source}"))]
    Outranking { source: OutrankingError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type McdaResult<T> = Result<T, McdaError>;

pub mod config_reader {
    use crate::mcda::*;

    /// The analysis configuration file. Every key is optional.
    #[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
    pub struct AnalysisConfig {
        pub tableau: Option<String>,
        pub mode: Option<String>,
        #[serde(rename = "rankingRule")]
        pub ranking_rule: Option<String>,
        pub quantiles: Option<usize>,
        pub strategy: Option<String>,
        #[serde(rename = "lowerClosed")]
        pub lower_closed: Option<bool>,
        #[serde(rename = "minComponentSize")]
        pub min_component_size: Option<usize>,
        pub threads: Option<usize>,
        pub normalized: Option<bool>,
        #[serde(rename = "symmetricThresholds")]
        pub symmetric_thresholds: Option<bool>,
        #[serde(rename = "naWarningThreshold")]
        pub na_warning_threshold: Option<serde_json::Number>,
        #[serde(rename = "marginalCorrelations")]
        pub marginal_correlations: Option<bool>,
    }

    pub fn read_config(path: &str) -> McdaResult<AnalysisConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
        let config: AnalysisConfig =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(config)
    }

    pub fn read_summary(path: &str) -> McdaResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Mode {
    Dense,
    Sparse,
}

// The settings of one run, once the command line and the configuration file are merged.
#[derive(Debug, Clone)]
struct Analysis {
    tableau: String,
    mode: Mode,
    rule: RankingRule,
    quantiles: Option<usize>,
    strategy: OrderingStrategy,
    lower_closed: bool,
    min_component_size: usize,
    threads: Option<usize>,
    normalized: bool,
    symmetric_thresholds: bool,
    na_warning_threshold: Option<Decimal>,
    marginal_correlations: bool,
}

fn parse_mode(s: &str) -> McdaResult<Mode> {
    match s {
        "dense" => Ok(Mode::Dense),
        "sparse" => Ok(Mode::Sparse),
        x => whatever!("Unknown mode {:?} (expected dense or sparse)", x),
    }
}

fn parse_rule(s: &str) -> McdaResult<RankingRule> {
    match s {
        "Copeland" => Ok(RankingRule::Copeland),
        "NetFlows" => Ok(RankingRule::NetFlows),
        "Kohler" => Ok(RankingRule::Kohler),
        "ArrowRaynaud" => Ok(RankingRule::ArrowRaynaud),
        x => whatever!("Unknown ranking rule {:?}", x),
    }
}

fn parse_strategy(s: &str) -> McdaResult<OrderingStrategy> {
    match s {
        "average" => Ok(OrderingStrategy::Average),
        "optimistic" => Ok(OrderingStrategy::Optimistic),
        "pessimistic" => Ok(OrderingStrategy::Pessimistic),
        "optimal" => Ok(OrderingStrategy::Optimal),
        x => whatever!("Unknown ordering strategy {:?}", x),
    }
}

// Command line arguments take precedence over the configuration file.
fn resolve(args: &Args) -> McdaResult<Analysis> {
    let (config, root): (AnalysisConfig, Option<PathBuf>) = match args.config.clone() {
        Some(p) => {
            let config = read_config(&p)?;
            info!("config: {:?}", config);
            let root = Path::new(p.as_str())
                .parent()
                .context(MissingParentDirSnafu {})?
                .to_path_buf();
            (config, Some(root))
        }
        None => (AnalysisConfig::default(), None),
    };

    let tableau = match (args.tableau.clone(), config.tableau.clone(), root) {
        (Some(p), _, _) => p,
        (None, Some(p), Some(root)) => root.join(p).display().to_string(),
        (None, Some(p), None) => p,
        (None, None, _) => {
            whatever!("No performance tableau: use --tableau or the tableau key of the configuration")
        }
    };

    let na_warning_threshold = match &config.na_warning_threshold {
        Some(n) => Some(io_json::decimal_of_number(n)?),
        None => None,
    };
    let pick = |a: &Option<String>, c: &Option<String>| a.clone().or_else(|| c.clone());

    Ok(Analysis {
        tableau,
        mode: match pick(&args.mode, &config.mode) {
            Some(m) => parse_mode(&m)?,
            None => Mode::Dense,
        },
        rule: match pick(&args.rule, &config.ranking_rule) {
            Some(r) => parse_rule(&r)?,
            None => RankingRule::Copeland,
        },
        quantiles: args.quantiles.or(config.quantiles),
        strategy: match pick(&args.strategy, &config.strategy) {
            Some(s) => parse_strategy(&s)?,
            None => PreRankingOptions::DEFAULT.strategy,
        },
        lower_closed: args.lower_closed || config.lower_closed.unwrap_or(false),
        min_component_size: args
            .min_component_size
            .or(config.min_component_size)
            .unwrap_or(PreRankingOptions::DEFAULT.min_component_size),
        threads: args.threads.or(config.threads),
        normalized: config
            .normalized
            .unwrap_or(OutrankingOptions::DEFAULT.normalized),
        symmetric_thresholds: config
            .symmetric_thresholds
            .unwrap_or(OutrankingOptions::DEFAULT.symmetric_thresholds),
        na_warning_threshold,
        marginal_correlations: config.marginal_correlations.unwrap_or(false),
    })
}

fn decimal_js(d: Decimal) -> JSValue {
    json!(d.round_dp(4).normalize().to_string())
}

fn domain_js(domain: &ValuationDomain) -> JSValue {
    json!({
        "min": decimal_js(domain.min()),
        "med": decimal_js(domain.med()),
        "max": decimal_js(domain.max()),
    })
}

fn correlation_js(c: &OrdinalCorrelation) -> JSValue {
    json!({
        "correlation": decimal_js(c.correlation),
        "determination": decimal_js(c.determination),
    })
}

fn sorting_js(sorting: &QuantilesSorting) -> Vec<JSValue> {
    sorting
        .sortings()
        .iter()
        .map(|s| {
            json!({
                "action": s.action,
                "lowCategory": s.low_category,
                "highCategory": s.high_category,
                "credibility": decimal_js(s.credibility),
            })
        })
        .collect()
}

fn components_js(sparse: &SparseDigraph) -> Vec<JSValue> {
    sparse
        .components()
        .iter()
        .map(|c| {
            json!({
                "rank": c.rank,
                "lowQuantile": decimal_js(c.low_qtile_limit),
                "highQuantile": decimal_js(c.high_qtile_limit),
                "members": c.members,
                "ranking": c.local_ranking,
            })
        })
        .collect()
}

fn build_summary_js(tableau: &PerformanceTableau, analysis: &Analysis) -> McdaResult<JSValue> {
    let options = OutrankingOptions {
        normalized: analysis.normalized,
        symmetric_thresholds: analysis.symmetric_thresholds,
        threads: analysis.threads,
        cancel: None,
    };

    let mut summary: JSMap<String, JSValue> = JSMap::new();
    summary.insert(
        "tableau".to_string(),
        json!({
            "name": tableau.name(),
            "actions": tableau.order(),
            "criteria": tableau.criteria().len(),
            "missingData": decimal_js(tableau.missing_data_proportion()),
        }),
    );

    let mut details: JSMap<String, JSValue> = JSMap::new();
    let (digraph, ranking): (Digraph, Ranking) = match analysis.mode {
        Mode::Dense => {
            let dense = OutrankingEngine::new(&options)
                .outrank(tableau)
                .context(OutrankingSnafu {})?;
            let ranking = analysis.rule.apply(&dense).context(OutrankingSnafu {})?;
            (dense.into(), ranking)
        }
        Mode::Sparse => {
            let pre_ranking = PreRankingOptions {
                quantiles: analysis.quantiles,
                strategy: analysis.strategy,
                lower_closed: analysis.lower_closed,
                ranking_rule: analysis.rule,
                min_component_size: analysis.min_component_size,
                symmetric_thresholds: analysis.symmetric_thresholds,
                threads: analysis.threads,
                cancel: None,
            };
            let sparse = PreRankedDecomposer::new(&pre_ranking)
                .and_then(|d| d.decompose(tableau))
                .context(OutrankingSnafu {})?;
            let stats = sparse.summary();
            info!("decomposition: {:?}", stats);
            details.insert("sorting".to_string(), json!(sorting_js(sparse.sorting())));
            details.insert("components".to_string(), json!(components_js(&sparse)));
            details.insert("fillRate".to_string(), decimal_js(stats.fill_rate));
            let ranking = sparse.boosted_ranking().clone();
            (sparse.into(), ranking)
        }
    };
    info!("ranking: {:?}", ranking);

    let weak_order = preorder_relation(tableau.action_ids().as_slice(), &ranking_to_preorder(&ranking))
        .context(OutrankingSnafu {})?;
    let quality = ordinal_correlation(&digraph, &weak_order).context(OutrankingSnafu {})?;

    summary.insert(
        "valuationDomain".to_string(),
        domain_js(&digraph.valuation_domain()),
    );
    summary.insert("ranking".to_string(), json!(ranking));
    summary.insert(
        "rankingRule".to_string(),
        json!(analysis.rule.to_string()),
    );
    summary.insert("quality".to_string(), correlation_js(&quality));
    summary.extend(details);

    if analysis.marginal_correlations {
        let marginals = marginal_vs_global(tableau, &ranking, &options, false)
            .context(OutrankingSnafu {})?;
        let marginals_js: Vec<JSValue> = marginals
            .iter()
            .map(|c| {
                json!({
                    "criterion": c.criterion,
                    "correlation": decimal_js(c.correlation.correlation),
                    "determination": decimal_js(c.correlation.determination),
                })
            })
            .collect();
        let consensus =
            ranking_consensus_quality(tableau, &ranking, &options).context(OutrankingSnafu {})?;
        summary.insert("marginalCorrelations".to_string(), json!(marginals_js));
        summary.insert(
            "consensus".to_string(),
            json!({
                "mean": decimal_js(consensus.mean),
                "stdev": decimal_js(consensus.stdev),
            }),
        );
    }

    Ok(JSValue::Object(summary))
}

/// Reads the tableau, runs the analysis and returns the JSON summary.
pub fn analyze(args: &Args) -> McdaResult<JSValue> {
    let analysis = resolve(args)?;
    debug!("analysis: {:?}", analysis);
    let tableau = io_json::read_tableau(&analysis.tableau, analysis.na_warning_threshold)?;
    build_summary_js(&tableau, &analysis)
}

pub fn run_analysis(args: &Args) -> McdaResult<()> {
    let result_js = analyze(args)?;
    let pretty_js_summary =
        serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_summary),
        Some(path) => {
            info!("Writing summary to {:?}", path);
            fs::write(path, pretty_js_summary.as_bytes()).context(WritingOutputSnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = args.reference.clone() {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_path(name: &str) -> String {
        format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn args() -> Args {
        Args {
            config: None,
            tableau: None,
            reference: None,
            out: None,
            mode: None,
            rule: None,
            quantiles: None,
            strategy: None,
            min_component_size: None,
            threads: None,
            lower_closed: false,
            verbose: false,
        }
    }

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn demo_matches_reference() {
        init();
        let res = run_analysis(&Args {
            config: Some(data_path("demo_config.json")),
            reference: Some(data_path("demo_expected_summary.json")),
            out: Some(
                std::env::temp_dir()
                    .join("outrank_demo_summary.json")
                    .display()
                    .to_string(),
            ),
            ..args()
        });
        assert!(res.is_ok(), "{:?}", res);
    }

    #[test]
    fn arguments_override_the_configuration() {
        init();
        let js = analyze(&Args {
            config: Some(data_path("demo_config.json")),
            rule: Some("Kohler".to_string()),
            ..args()
        })
        .unwrap();
        assert_eq!(js["rankingRule"], json!("Kohler"));
        assert_eq!(js["ranking"], json!(["a1", "a2", "a3"]));
        assert!(js.get("marginalCorrelations").is_some());
        assert!(js.get("components").is_none());
    }

    #[test]
    fn sparse_summary() {
        init();
        let js = analyze(&Args {
            tableau: Some(data_path("demo_tableau.json")),
            mode: Some("sparse".to_string()),
            quantiles: Some(3),
            threads: Some(2),
            ..args()
        })
        .unwrap();
        let ranking = js["ranking"].as_array().unwrap();
        assert_eq!(ranking.len(), 3);
        let components = js["components"].as_array().unwrap();
        let members: usize = components
            .iter()
            .map(|c| c["members"].as_array().unwrap().len())
            .sum();
        assert_eq!(members, 3);
        assert_eq!(js["sorting"].as_array().unwrap().len(), 3);
        assert!(js.get("fillRate").is_some());
        assert!(js.get("marginalCorrelations").is_none());
    }

    #[test]
    fn sparse_mode_reads_symmetric_thresholds() {
        init();
        let dir = std::env::temp_dir();
        let tableau_path = dir.join("outrank_symmetric_tableau.json");
        let tableau = json!({
            "actions": {"a": {}, "b": {}},
            "criteria": {
                "g": {"weight": 1, "scale": [0, 100], "preferenceDirection": "max",
                      "thresholds": {"ind": [0, 0.1], "pref": [0, 0.2]}}
            },
            "evaluation": {"g": {"a": 10, "b": 11.5}}
        });
        fs::write(&tableau_path, tableau.to_string()).unwrap();
        let summary = |symmetric: bool| {
            let config_path = dir.join(format!("outrank_symmetric_{}_config.json", symmetric));
            let config = json!({
                "tableau": tableau_path.display().to_string(),
                "mode": "sparse",
                "quantiles": 2,
                "minComponentSize": 2,
                "symmetricThresholds": symmetric,
            });
            fs::write(&config_path, config.to_string()).unwrap();
            analyze(&Args {
                config: Some(config_path.display().to_string()),
                ..args()
            })
            .unwrap()
        };
        let plain = summary(false);
        let symmetric = summary(true);
        assert_eq!(plain["components"].as_array().unwrap().len(), 1);
        assert_eq!(plain["quality"]["correlation"], json!("1"));
        // r(a, b) becomes positive, so a and b outrank each other.
        assert_ne!(symmetric["quality"], plain["quality"]);
    }

    #[test]
    fn bad_settings() {
        init();
        assert!(analyze(&args()).is_err());
        let res = analyze(&Args {
            tableau: Some(data_path("demo_tableau.json")),
            rule: Some("Borda".to_string()),
            ..args()
        });
        assert!(res.is_err());
        let res = analyze(&Args {
            tableau: Some(data_path("no_such_tableau.json")),
            ..args()
        });
        assert!(matches!(res, Err(McdaError::OpeningJson { .. })));
    }
}
