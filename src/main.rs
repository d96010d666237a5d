// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use regex::RegexSet;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt, prelude::*};

use lazypt::{
    analysis::{Data, Options},
    facts::Facts,
    layers::{SpanTimeLayer, SpanTimes},
    Constraints, ValueId,
};

mod cli;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn setup_global_subscriber() -> Result<(impl Drop, SpanTimes)> {
    let filter_layer = tracing::level_filters::LevelFilter::TRACE;
    let fmt_layer = fmt::Layer::default().with_writer(io::stderr);
    let (flame_layer, guard) =
        FlameLayer::with_file("./tracing.folded").context("Couldn't create ./tracing.folded")?;
    let (time_layer, times) = SpanTimeLayer::new();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .with(time_layer)
        .init();
    Ok((guard, times))
}

fn context(data: &Data, via: &[String]) -> Result<Constraints> {
    let sites = via
        .iter()
        .map(|name| {
            data.algorithms()
                .find_site(name)
                .ok_or_else(|| anyhow!("Unknown call site {}", name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(data.context(&sites))
}

fn main() -> Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = cli::Args::parse();

    let tracing = if args.tracing {
        Some(setup_global_subscriber()?)
    } else {
        None
    };

    let facts = Facts::load(&args.facts)
        .with_context(|| format!("Couldn't load facts from {}", args.facts.display()))?;
    let opts = Options {
        contexts: args.contexts,
        inline_depth: args.inline_depth,
        debug: args.debug,
    };
    let mut data = facts.build(&opts).context("Malformed fact file")?;
    let filter = RegexSet::new(&args.query).context("Invalid query pattern")?;
    let constraints = context(&data, &args.via)?;

    let queried: Vec<ValueId> = data
        .values()
        .filter(|v| match data.value_info(*v).source() {
            Some(name) => args.query.is_empty() || filter.is_match(name),
            None => false,
        })
        .collect();

    let mut stdout = io::stdout().lock();
    if !args.quiet {
        writeln!(stdout, "points_to")?;
        writeln!(stdout, "---------")?;
        for v in queried {
            let set = data.points_to_set_in(v, &constraints);
            let names: Vec<String> = data
                .elements(set)
                .into_iter()
                .map(|r| data.value_name(r))
                .collect();
            writeln!(stdout, "{} --> {{{}}}", data.value_name(v), names.join(", "))?;
        }
    } else {
        // Still run the queries, e.g. for profiling.
        for v in queried {
            let set = data.points_to_set_in(v, &constraints);
            data.elements(set);
        }
    }

    if args.equations {
        let mut equations = String::new();
        data.write_equations(&mut equations)?;
        writeln!(stdout)?;
        writeln!(stdout, "equations")?;
        writeln!(stdout, "---------")?;
        write!(stdout, "{}", equations)?;
    }

    if let Some(path) = &args.dot {
        let mut dot = String::new();
        data.write_dot(&mut dot)?;
        std::fs::write(path, dot)
            .with_context(|| format!("Couldn't write {}", path.display()))?;
    }

    if args.stats {
        writeln!(stdout)?;
        writeln!(stdout, "stats")?;
        writeln!(stdout, "-----")?;
        writeln!(stdout, "{}", data.stats())?;
    }

    if data.options().debug {
        let mut equations = String::new();
        data.write_equations(&mut equations)?;
        eprintln!("{}", data.stats());
        eprint!("{}", equations);
    }

    if let Some((_guard, times)) = tracing {
        times.report(&mut io::stderr().lock())?;
    }

    Ok(())
}
