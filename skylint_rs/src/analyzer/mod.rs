//! The analysis core: per-function abstract interpretation over translation
//! units, shared indices, and the interprocedural trace search.

pub mod driver;
pub mod scope;
pub mod trace;
pub mod walker;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::types::FunctionSummary;

/// Shared indices built during the parallel pass and read by the trace
/// search. All mutation goes through one coarse mutex in the driver; walk
/// time dominates lock-hold time.
#[derive(Debug, Default)]
pub struct Indices {
    /// Per translation unit: function name to its summary.
    pub summaries_by_tu: Vec<BTreeMap<String, FunctionSummary>>,
    /// Function name to every translation unit defining it.
    pub name_to_tus: HashMap<String, BTreeSet<usize>>,
    /// Functions that declared a local or parameter of an intrinsically
    /// typed message struct. These seed the trace search.
    pub functions_with_intrinsic_vars: BTreeSet<String>,
    /// Stable symbol ids whose definitions have already been claimed; the
    /// first walker to claim an id owns its summary.
    pub seen_definitions: HashSet<String>,
    /// Functions flagged for using message fields without a frame check.
    pub unconstrained: BTreeSet<String>,
}

impl Indices {
    pub fn new(num_tus: usize) -> Indices {
        Indices {
            summaries_by_tu: (0..num_tus).map(|_| BTreeMap::new()).collect(),
            ..Indices::default()
        }
    }

    /// Every summary recorded for a function, across translation units, in
    /// translation-unit order.
    pub fn summaries_of(&self, name: &str) -> Vec<&FunctionSummary> {
        let Some(tus) = self.name_to_tus.get(name) else {
            return Vec::new();
        };
        tus.iter()
            .filter_map(|&tu| self.summaries_by_tu.get(tu).and_then(|m| m.get(name)))
            .collect()
    }
}
