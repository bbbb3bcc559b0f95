//! Entrypoint glue: load the inputs, run the parallel pass and the trace
//! search, print the diagnostics.
//!
//! Diagnostics are a plain-line contract on stdout:
//!
//! ```text
//! BUG: unconstrained MAV frame used in: <function>
//! BUG: f1 -> f2 -> f3
//! Inconsistent store: f1 -> f2
//! ```
//!
//! Progress and informational output goes to stderr.

use std::collections::BTreeSet;

use anyhow::Context;

use crate::analyzer::driver::run_analysis;
use crate::analyzer::trace::{TraceReport, TraceSearch, render_trace};
use crate::args::Args;
use crate::ast::clang_json::ClangJsonProvider;
use crate::compiledb::CompilationDatabase;
use crate::prior::{load_prior, prior_types};
use crate::protocol::ProtocolSpec;

pub fn entrypoint(args: Args) -> anyhow::Result<()> {
    init_tracing(args.verbose);

    let spec = ProtocolSpec::load(&args.mavlink_definitions)
        .context("cannot load MAVLink definitions")?;
    tracing::info!(
        messages = spec.type_to_field_units.len(),
        units = spec.num_units,
        "loaded protocol definitions"
    );

    let entries = load_prior(&args.prior_types).context("cannot load prior types")?;
    let prior = prior_types(&entries, &spec);
    let interesting_writes: BTreeSet<String> =
        entries.iter().map(|e| e.variable_name.clone()).collect();

    let database = CompilationDatabase::from_directory(&args.compilation_database)
        .context("cannot load compilation database")?;
    tracing::info!(units = database.len(), "loaded compilation database");

    let provider = ClangJsonProvider::new();
    let indices = run_analysis(&database, &spec, &interesting_writes, &provider);

    for function in &indices.unconstrained {
        println!("BUG: unconstrained MAV frame used in: {function}");
    }

    let report = TraceSearch::new(&indices, &prior, spec.num_units).run();
    print_report(&report);

    tracing::info!(
        unconstrained = indices.unconstrained.len(),
        bug_traces = report.bug_traces.len(),
        inconsistent = report.inconsistent_traces.len(),
        "analysis complete"
    );
    Ok(())
}

fn print_report(report: &TraceReport) {
    for trace in &report.bug_traces {
        println!("BUG: {}", render_trace(trace));
    }
    for trace in &report.inconsistent_traces {
        println!("Inconsistent store: {}", render_trace(trace));
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
