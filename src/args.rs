use clap::Parser;

/// This is a multiple criteria decision aid program based on bipolar-valued outranking digraphs.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The file containing the analysis configuration in JSON format.
    /// The paths it contains are relative to its location.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The performance tableau in JSON format. Setting this option overrides the
    /// tableau that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub tableau: Option<String>,

    /// (file path) A reference file containing the summary of an analysis in JSON format. If provided,
    /// outrank will check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the analysis will be written in JSON
    /// format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (default dense) 'dense' computes the full outranking digraph, 'sparse' the pre-ranked
    /// decomposition.
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    /// (default Copeland) The ranking rule: Copeland, NetFlows, Kohler or ArrowRaynaud.
    #[clap(long, value_parser)]
    pub rule: Option<String>,

    /// (sparse mode only) The number of quantiles. By default, it depends on the number of actions.
    #[clap(short, long, value_parser)]
    pub quantiles: Option<usize>,

    /// (sparse mode only, default average) The ordering of the components: average, optimistic,
    /// pessimistic or optimal.
    #[clap(long, value_parser)]
    pub strategy: Option<String>,

    /// (sparse mode only, default 1) The minimal size of the components.
    #[clap(long, value_parser)]
    pub min_component_size: Option<usize>,

    /// (default: all the cores) The number of worker threads.
    #[clap(long, value_parser)]
    pub threads: Option<usize>,

    /// If passed as an argument, the quantile categories are closed on their lower limit.
    #[clap(long, takes_value = false)]
    pub lower_closed: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
