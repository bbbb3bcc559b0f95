//! Interprocedural trace search.
//!
//! Seeded by every function that touched an intrinsically typed value, the
//! search explores the call graph through summaries: at each function it
//! checks the recorded stores against the prior and against the first type
//! ever seen flowing into each variable, then recurses into callees with the
//! argument types observed at their call sites.
//!
//! Termination: a `visited` set breaks cycles, a fixed depth cap bounds
//! fan-out, and results are memoized by `(function, argument types)`.
//! Reported traces are deduplicated by their rendered form; seeds iterate in
//! sorted order, so the reported set is independent of worker count.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::analyzer::Indices;
use crate::types::{FunctionSummary, SemType, TypeSource};

/// Recursion cap for the callee exploration. Deep enough for the dispatch
/// chains in flight-controller code, small enough to bound virtual-call
/// fan-out.
pub const MAX_DEPTH: usize = 8;

/// A witness: the chain of functions from an intrinsic source to a
/// violating store.
pub type Trace = Vec<String>;

/// Renders a trace the way it is reported: `f1 -> f2 -> f3`.
pub fn render_trace(trace: &[String]) -> String {
    trace.join(" -> ")
}

/// The two defect classes the search reports.
#[derive(Debug, Default)]
pub struct TraceReport {
    /// Stores whose incoming type disagrees with the prior.
    pub bug_traces: Vec<Trace>,
    /// Stores whose type disagrees with an earlier store into the same
    /// variable.
    pub inconsistent_traces: Vec<Trace>,
}

pub struct TraceSearch<'a> {
    indices: &'a Indices,
    prior_types: &'a BTreeMap<String, SemType>,
    num_units: i32,
    memo: HashMap<(String, Vec<SemType>), Vec<Trace>>,
    /// First type seen flowing into each variable, shared across seeds for
    /// the lifetime of one search.
    first_seen: HashMap<String, SemType>,
}

impl<'a> TraceSearch<'a> {
    pub fn new(
        indices: &'a Indices,
        prior_types: &'a BTreeMap<String, SemType>,
        num_units: i32,
    ) -> TraceSearch<'a> {
        TraceSearch {
            indices,
            prior_types,
            num_units,
            memo: HashMap::new(),
            first_seen: HashMap::new(),
        }
    }

    /// Explores from every seed and returns the deduplicated traces.
    pub fn run(&mut self) -> TraceReport {
        let mut report = TraceReport::default();
        let mut seen_bugs = BTreeSet::new();
        let mut seen_inconsistent = BTreeSet::new();
        let indices = self.indices;
        let total = indices.functions_with_intrinsic_vars.len();

        for (i, seed) in indices.functions_with_intrinsic_vars.iter().enumerate() {
            tracing::info!("seed {}/{}: {}", i + 1, total, seed);
            let Some(args) = self.initial_arg_types(seed) else {
                // A prototype-only seed: no summary anywhere, nothing to do.
                tracing::debug!(function = %seed, "seed has no summary");
                continue;
            };
            let mut visited = HashSet::new();
            let mut inconsistent = Vec::new();
            let traces = self.explore(seed, &mut visited, &mut inconsistent, &args, 0);
            for trace in traces {
                if seen_bugs.insert(render_trace(&trace)) {
                    report.bug_traces.push(trace);
                }
            }
            for trace in inconsistent {
                if seen_inconsistent.insert(render_trace(&trace)) {
                    report.inconsistent_traces.push(trace);
                }
            }
        }
        report
    }

    /// Argument types a seed starts with: universal in frames and units,
    /// tagged with the provenance kind its summary recorded per ordinal.
    /// Uses the first summary of the seed.
    fn initial_arg_types(&self, function: &str) -> Option<Vec<SemType>> {
        let tus = self.indices.name_to_tus.get(function)?;
        let &tu = tus.iter().next()?;
        let summary = self.indices.summaries_by_tu.get(tu)?.get(function)?;
        Some(
            summary
                .param_to_source_kind
                .iter()
                .map(|(&ordinal, &kind)| {
                    SemType::universal_with_source(self.num_units, kind.as_source(ordinal))
                })
                .collect(),
        )
    }

    fn explore(
        &mut self,
        function: &str,
        visited: &mut HashSet<String>,
        inconsistent: &mut Vec<Trace>,
        args: &[SemType],
        depth: usize,
    ) -> Vec<Trace> {
        let memo_key = (function.to_string(), args.to_vec());
        if let Some(cached) = self.memo.get(&memo_key) {
            return cached.clone();
        }
        if depth > MAX_DEPTH {
            return Vec::new();
        }

        let indices = self.indices;
        let summaries: Vec<&'a FunctionSummary> = indices.summaries_of(function);
        let mut results: Vec<Trace> = Vec::new();
        visited.insert(function.to_string());

        for summary in summaries {
            for (qname, stored) in &summary.store_to_type {
                for source in &stored.sources {
                    if let TypeSource::Param(ordinal) = source {
                        if *ordinal >= args.len() {
                            // A summary from another overload; ordinals do
                            // not line up with these call arguments.
                            continue;
                        }
                        let incoming = &args[*ordinal];
                        if let Some(prior) = self.prior_types.get(qname)
                            && !prior.same_type(incoming)
                        {
                            results.push(vec![function.to_string()]);
                        }
                    }
                    // Every store, whatever its provenance, participates in
                    // the consistency check against the first type seen for
                    // this variable.
                    let previous = self.first_seen.get(qname).map(|p| p.same_type(stored));
                    match previous {
                        Some(false) => inconsistent.push(vec![function.to_string()]),
                        Some(true) => {}
                        None => {
                            self.first_seen.insert(qname.clone(), stored.clone());
                        }
                    }
                }
            }

            for (callee, call_sites) in &summary.calling_context {
                if visited.contains(callee) {
                    continue;
                }
                // One exploration per callee per summary: the first call
                // site stands in for all of them to bound the work.
                let Some(site) = call_sites.first() else {
                    continue;
                };
                let mut callee_inconsistent = Vec::new();
                let sub = self.explore(
                    callee,
                    visited,
                    &mut callee_inconsistent,
                    &site.args,
                    depth + 1,
                );
                for trace in sub {
                    let mut extended = vec![function.to_string()];
                    extended.extend(trace);
                    results.push(extended);
                }
                for trace in callee_inconsistent {
                    let mut extended = vec![function.to_string()];
                    extended.extend(trace);
                    inconsistent.push(extended);
                }
            }
        }

        visited.remove(function);
        self.memo.insert(memo_key, results.clone());
        results
    }
}
