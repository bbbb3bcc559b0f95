//! Parallel translation-unit pass.
//!
//! Translation units are distributed round-robin over a fixed-size worker
//! pool (hardware parallelism, minimum one). Each worker parses its units
//! through the provider and walks them; every write to the shared indices
//! goes through one coarse mutex. A failed parse never stops the run: the
//! unit is logged and skipped.
//!
//! All workers are joined before the function returns, so trace search
//! always sees the complete summaries.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};

use crate::analyzer::Indices;
use crate::analyzer::walker::TuWalker;
use crate::ast::AstProvider;
use crate::compiledb::CompilationDatabase;
use crate::protocol::ProtocolSpec;

/// Number of workers: hardware parallelism, at least one.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

/// Walks every translation unit of the database and returns the populated
/// indices.
pub fn run_analysis(
    database: &CompilationDatabase,
    spec: &ProtocolSpec,
    interesting_writes: &BTreeSet<String>,
    provider: &dyn AstProvider,
) -> Indices {
    run_analysis_with_workers(
        database,
        spec,
        interesting_writes,
        provider,
        default_worker_count(),
    )
}

pub fn run_analysis_with_workers(
    database: &CompilationDatabase,
    spec: &ProtocolSpec,
    interesting_writes: &BTreeSet<String>,
    provider: &dyn AstProvider,
    workers: usize,
) -> Indices {
    let num_tus = database.len();
    let indices = Mutex::new(Indices::new(num_tus));
    let workers = workers.max(1);

    let progress = ProgressBar::new(num_tus as u64);
    progress.set_style(
        ProgressStyle::with_template("{pos}/{len} {msg}")
            .expect("static progress template is valid"),
    );

    thread::scope(|scope| {
        for worker in 0..workers {
            let indices = &indices;
            let progress = &progress;
            scope.spawn(move || {
                for tu_index in (worker..num_tus).step_by(workers) {
                    let command = &database.commands[tu_index];
                    progress.set_message(command.file.display().to_string());
                    match provider.translation_unit(command) {
                        Ok(unit) => {
                            TuWalker::new(spec, interesting_writes, indices, tu_index).walk(&unit);
                        }
                        Err(err) => {
                            tracing::warn!(
                                file = %command.full_path().display(),
                                "skipping translation unit: {err}"
                            );
                        }
                    }
                    progress.inc(1);
                }
            });
        }
    });

    progress.finish_and_clear();
    indices.into_inner().expect("no walker panicked holding the index lock")
}
