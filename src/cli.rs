// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

/// Demand-driven points-to analysis over program fact files
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Context depth
    #[arg(long, default_value_t = 1)]
    pub contexts: u8,

    /// Print stats and equations to stderr after querying
    #[arg(long)]
    pub debug: bool,

    /// Print the set equations after querying
    #[arg(long)]
    pub equations: bool,

    /// Write a Graphviz rendering of the computed sets
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// JSON fact file
    #[arg()]
    pub facts: PathBuf,

    /// Longest chain of trivial subsets to inline
    #[arg(long, default_value_t = 8)]
    pub inline_depth: usize,

    /// Only query values whose names match one of these regexes
    #[arg(short, long)]
    pub query: Vec<String>,

    /// Quiet
    #[arg(long)]
    pub quiet: bool,

    /// Report engine statistics
    #[arg(long)]
    pub stats: bool,

    /// Tracing
    #[arg(long)]
    pub tracing: bool,

    /// Query under this call stack (outermost call site first)
    #[arg(long, value_delimiter = ',')]
    pub via: Vec<String>,
}
