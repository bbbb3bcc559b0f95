//! # skylint
//!
//! Whole-program static analysis for unit-of-measure and coordinate-frame
//! bugs in UAV flight software.
//!
//! skylint consumes a compilation database, a MAVLink-style protocol
//! definition, and a JSON prior of known variable types, then reports:
//!
//! - **unconstrained frame uses** - a function reaches into a
//!   frame-carrying message without first checking the message's `frame`
//!   discriminator,
//! - **type-inconsistent stores** - a value whose semantic type
//!   (coordinate frame x physical unit x SI dimension) disagrees with what
//!   is already known about the variable it flows into, found along
//!   interprocedural call traces.
//!
//! ## Pipeline
//!
//! 1. [`protocol`] and [`prior`] build the read-only spec indices.
//! 2. [`analyzer::driver`] walks every translation unit in parallel with
//!    [`analyzer::walker`], producing per-function summaries in shared
//!    [`analyzer::Indices`].
//! 3. [`analyzer::trace`] explores the call graph through the summaries and
//!    reports violating traces.
//!
//! The AST comes from an [`ast::AstProvider`]; the default implementation
//! drives clang's JSON AST dump ([`ast::clang_json`]).
//!
//! ## Library usage
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//! use skylint::analyzer::driver::run_analysis;
//! use skylint::analyzer::trace::TraceSearch;
//! use skylint::ast::clang_json::ClangJsonProvider;
//! use skylint::compiledb::CompilationDatabase;
//! use skylint::protocol::ProtocolSpec;
//!
//! let spec = ProtocolSpec::load("common.xml".as_ref()).unwrap();
//! let db = CompilationDatabase::from_directory("build".as_ref()).unwrap();
//! let provider = ClangJsonProvider::new();
//! let indices = run_analysis(&db, &spec, &BTreeSet::new(), &provider);
//! let report = TraceSearch::new(&indices, &Default::default(), spec.num_units).run();
//! ```

pub mod analyzer;
pub mod args;
pub mod ast;
pub mod cli;
pub mod compiledb;
pub mod prior;
pub mod protocol;
pub mod types;
pub mod units;
