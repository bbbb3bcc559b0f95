//! End-to-end analysis scenarios over in-memory ASTs.
//!
//! Each test builds the cursor tree a frontend would produce for a small
//! C++ source, runs the full pipeline (parallel walk, then trace search),
//! and checks the reported defects.

use std::collections::BTreeSet;

use skylint::analyzer::driver::run_analysis_with_workers;
use skylint::analyzer::trace::{TraceReport, TraceSearch, render_trace};
use skylint::analyzer::Indices;
use skylint::ast::{AstProvider, Cursor, CursorKind, Linkage, ProviderError};
use skylint::compiledb::{CompilationDatabase, CompileCommand};
use skylint::prior::{VariableEntry, prior_types};
use skylint::protocol::ProtocolSpec;

// ============================================
// Fixture plumbing
// ============================================

/// Serves prebuilt cursor trees; the compiled file name selects the unit.
struct FixedProvider {
    units: Vec<Cursor>,
}

impl AstProvider for FixedProvider {
    fn translation_unit(&self, command: &CompileCommand) -> Result<Cursor, ProviderError> {
        let index: usize = command
            .file
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        self.units
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::Parse {
                file: command.file.display().to_string(),
                detail: "no such unit".to_string(),
            })
    }
}

fn database(n: usize) -> CompilationDatabase {
    CompilationDatabase {
        commands: (0..n)
            .map(|i| CompileCommand {
                directory: "/build".into(),
                file: format!("{i}.cpp").into(),
                arguments: vec!["c++".into(), format!("{i}.cpp")],
                command: None,
            })
            .collect(),
    }
}

fn spec() -> ProtocolSpec {
    ProtocolSpec::parse(
        r#"<mavlink>
             <messages>
               <message id="330" name="OBSTACLE_DISTANCE">
                 <field type="uint8_t" name="frame" enum="MAV_FRAME">Frame.</field>
                 <field type="uint16_t" name="min_distance" units="cm">Minimum distance.</field>
               </message>
               <message id="141" name="ALTITUDE">
                 <field type="float" name="altitude_monotonic" units="m">Monotonic altitude.</field>
               </message>
             </messages>
           </mavlink>"#,
    )
    .unwrap()
}

const PRIOR: &str = r#"[
  { "VariableName": "alt_in_cm",
    "SemanticInfo": { "CoordinateFrames": ["MAV_FRAME_GLOBAL"], "Units": ["cm"] } },
  { "VariableName": "Ns::C::x",
    "SemanticInfo": { "CoordinateFrames": ["MAV_FRAME_GLOBAL"], "Units": ["cm"] } }
]"#;

fn analyze(units: Vec<Cursor>, workers: usize) -> (Indices, TraceReport) {
    let spec = spec();
    let entries: Vec<VariableEntry> = serde_json::from_str(PRIOR).unwrap();
    let prior = prior_types(&entries, &spec);
    let interesting: BTreeSet<String> = entries.iter().map(|e| e.variable_name.clone()).collect();

    let db = database(units.len());
    let provider = FixedProvider { units };
    let indices = run_analysis_with_workers(&db, &spec, &interesting, &provider, workers);
    let report = TraceSearch::new(&indices, &prior, spec.num_units).run();
    (indices, report)
}

fn rendered(traces: &[Vec<String>]) -> BTreeSet<String> {
    traces.iter().map(|t| render_trace(t)).collect()
}

// ============================================
// Cursor builders
// ============================================

fn tu(decls: Vec<Cursor>) -> Cursor {
    Cursor::new(CursorKind::TranslationUnit, "").with_children(decls)
}

fn function(name: &str, children: Vec<Cursor>) -> Cursor {
    Cursor::new(CursorKind::FunctionDecl, name)
        .with_symbol_id(format!("c:@F@{name}"))
        .with_children(children)
}

fn body(stmts: Vec<Cursor>) -> Cursor {
    Cursor::new(CursorKind::CompoundStmt, "").with_children(stmts)
}

fn decl_ref(name: &str) -> Cursor {
    Cursor::new(CursorKind::DeclRefExpr, name)
}

fn global_ref(name: &str) -> Cursor {
    Cursor::new(CursorKind::DeclRefExpr, name).with_reference(name, Linkage::External)
}

fn local_ref(name: &str, type_spelling: &str) -> Cursor {
    Cursor::new(CursorKind::DeclRefExpr, name)
        .with_type(type_spelling)
        .with_reference(name, Linkage::None)
}

fn member(field: &str, base: Cursor) -> Cursor {
    Cursor::new(CursorKind::MemberRefExpr, field).with_children(vec![base])
}

fn assign(lhs: Cursor, rhs: Cursor) -> Cursor {
    Cursor::new(CursorKind::BinaryOperator, "")
        .with_opcode("=")
        .with_children(vec![lhs, rhs])
}

fn var_decl(name: &str, type_spelling: &str) -> Cursor {
    Cursor::new(CursorKind::VarDecl, name).with_type(type_spelling)
}

fn parm(name: &str, type_spelling: &str) -> Cursor {
    Cursor::new(CursorKind::ParmDecl, name).with_type(type_spelling)
}

fn obstacle_ref() -> Cursor {
    local_ref("dist", "mavlink_obstacle_distance_t")
}

fn frame_guard() -> Cursor {
    Cursor::new(CursorKind::BinaryOperator, "")
        .with_opcode("==")
        .with_children(vec![
            member("frame", obstacle_ref()),
            Cursor::new(CursorKind::Unexposed, "0"),
        ])
}

// ============================================
// Seed scenarios
// ============================================

/// Scenario: an intrinsic field is read and stored without any frame check.
///
/// ```cpp
/// void f() {
///   mavlink_obstacle_distance_t dist;
///   alt_in_cm = dist.min_distance;
/// }
/// ```
#[test]
fn unconstrained_use_names_the_function() {
    let unit = tu(vec![function(
        "f",
        vec![body(vec![
            var_decl("dist", "mavlink_obstacle_distance_t"),
            assign(
                global_ref("alt_in_cm"),
                member("min_distance", obstacle_ref()),
            ),
        ])],
    )]);
    let (indices, report) = analyze(vec![unit], 1);

    assert_eq!(
        indices.unconstrained,
        BTreeSet::from(["f".to_string()]),
        "f reads message fields without a frame check"
    );
    // The store's provenance is intrinsic, not a parameter: no call trace.
    assert!(report.bug_traces.is_empty());
    assert!(report.inconsistent_traces.is_empty());
}

/// Scenario: the same store guarded by a frame check is clean.
///
/// ```cpp
/// void f() {
///   mavlink_obstacle_distance_t dist;
///   if (dist.frame == 0) { alt_in_cm = dist.min_distance; }
/// }
/// ```
#[test]
fn frame_constraint_suppresses_the_bug() {
    let unit = tu(vec![function(
        "f",
        vec![body(vec![
            var_decl("dist", "mavlink_obstacle_distance_t"),
            Cursor::new(CursorKind::IfStmt, "").with_children(vec![
                frame_guard(),
                body(vec![assign(
                    global_ref("alt_in_cm"),
                    member("min_distance", obstacle_ref()),
                )]),
            ]),
        ])],
    )]);
    let (indices, report) = analyze(vec![unit], 1);

    assert!(indices.unconstrained.is_empty());
    assert!(report.bug_traces.is_empty());
}

/// Scenario: the typed value flows through a call into a violating store.
///
/// ```cpp
/// void g(int x) { alt_in_cm = x; }
/// void f() {
///   mavlink_obstacle_distance_t dist;
///   g(dist.min_distance);
/// }
/// ```
#[test]
fn interprocedural_flow_reports_the_call_chain() {
    let g = function(
        "g",
        vec![
            parm("x", "int"),
            body(vec![assign(global_ref("alt_in_cm"), local_ref("x", "int"))]),
        ],
    );
    let f = function(
        "f",
        vec![body(vec![
            var_decl("dist", "mavlink_obstacle_distance_t"),
            Cursor::new(CursorKind::CallExpr, "g")
                .with_children(vec![decl_ref("g"), member("min_distance", obstacle_ref())]),
        ])],
    );
    let (indices, report) = analyze(vec![tu(vec![g, f])], 1);

    assert_eq!(rendered(&report.bug_traces), BTreeSet::from(["f -> g".to_string()]));
    // The walker also flags f itself: it touches message fields unguarded.
    assert!(indices.unconstrained.contains("f"));
}

/// Scenario: the same flow guarded at the call site still reports the
/// trace-level bug only when the prior disagrees; a guarded read of an
/// agreeing unit is silent end to end.
///
/// ```cpp
/// void g(int x) { alt_in_cm = x; }
/// void f() {
///   mavlink_obstacle_distance_t dist;
///   if (dist.frame == 0) { g(dist.min_distance); }
/// }
/// ```
#[test]
fn guarded_interprocedural_flow_still_checks_the_prior() {
    let g = function(
        "g",
        vec![
            parm("x", "int"),
            body(vec![assign(global_ref("alt_in_cm"), local_ref("x", "int"))]),
        ],
    );
    let f = function(
        "f",
        vec![body(vec![
            var_decl("dist", "mavlink_obstacle_distance_t"),
            Cursor::new(CursorKind::IfStmt, "").with_children(vec![
                frame_guard(),
                body(vec![Cursor::new(CursorKind::CallExpr, "g").with_children(vec![
                    decl_ref("g"),
                    member("min_distance", obstacle_ref()),
                ])]),
            ]),
        ])],
    );
    let (indices, report) = analyze(vec![tu(vec![g, f])], 1);

    // No unconstrained diagnostic: the read is guarded.
    assert!(indices.unconstrained.is_empty());
    // The incoming unit set disagrees with the prior's frame set, so the
    // interprocedural check still fires.
    assert_eq!(rendered(&report.bug_traces), BTreeSet::from(["f -> g".to_string()]));
}

/// Scenario: two call paths store disagreeing dimensions into the same
/// member; the second path reports an inconsistent store.
///
/// ```cpp
/// namespace Ns {
/// struct C {
///   void from_altitude(mavlink_altitude_t alt) { x = alt.altitude_monotonic; }
///   void from_obstacle(mavlink_obstacle_distance_t obs) { x = obs.min_distance; }
/// };
/// }
/// ```
#[test]
fn inconsistent_store_reports_the_second_path() {
    let from_altitude = Cursor::new(CursorKind::Method, "from_altitude")
        .with_symbol_id("c:@N@Ns@S@C@F@from_altitude")
        .with_children(vec![
            parm("alt", "mavlink_altitude_t"),
            body(vec![assign(
                member("x", Cursor::new(CursorKind::ThisExpr, "")),
                member(
                    "altitude_monotonic",
                    local_ref("alt", "mavlink_altitude_t"),
                ),
            )]),
        ]);
    let from_obstacle = Cursor::new(CursorKind::Method, "from_obstacle")
        .with_symbol_id("c:@N@Ns@S@C@F@from_obstacle")
        .with_children(vec![
            parm("obs", "mavlink_obstacle_distance_t"),
            body(vec![assign(
                member("x", Cursor::new(CursorKind::ThisExpr, "")),
                member(
                    "min_distance",
                    local_ref("obs", "mavlink_obstacle_distance_t"),
                ),
            )]),
        ]);
    let unit = tu(vec![Cursor::new(CursorKind::Namespace, "Ns").with_children(vec![
        Cursor::new(CursorKind::StructDecl, "C")
            .with_children(vec![from_altitude, from_obstacle]),
    ])]);
    let (_, report) = analyze(vec![unit], 1);

    // Seeds iterate in sorted order: from_altitude stores meters first,
    // from_obstacle's centimeters disagree.
    assert_eq!(
        rendered(&report.inconsistent_traces),
        BTreeSet::from(["from_obstacle".to_string()])
    );
    assert!(report.bug_traces.is_empty());
}

/// Scenario: repeated runs and different worker counts report the same
/// deduplicated trace sets.
#[test]
fn reported_sets_are_deterministic() {
    let build = || {
        let g = function(
            "g",
            vec![
                parm("x", "int"),
                body(vec![assign(global_ref("alt_in_cm"), local_ref("x", "int"))]),
            ],
        );
        let h = function(
            "h",
            vec![
                parm("y", "int"),
                body(vec![assign(global_ref("alt_in_cm"), local_ref("y", "int"))]),
            ],
        );
        let f = function(
            "f",
            vec![body(vec![
                var_decl("dist", "mavlink_obstacle_distance_t"),
                Cursor::new(CursorKind::CallExpr, "g")
                    .with_children(vec![decl_ref("g"), member("min_distance", obstacle_ref())]),
                Cursor::new(CursorKind::CallExpr, "h")
                    .with_children(vec![decl_ref("h"), member("min_distance", obstacle_ref())]),
            ])],
        );
        vec![tu(vec![g]), tu(vec![h]), tu(vec![f])]
    };

    let (_, first) = analyze(build(), 1);
    let (_, second) = analyze(build(), 4);
    let (_, third) = analyze(build(), 2);

    assert_eq!(rendered(&first.bug_traces), rendered(&second.bug_traces));
    assert_eq!(rendered(&first.bug_traces), rendered(&third.bug_traces));
    assert_eq!(
        rendered(&first.inconsistent_traces),
        rendered(&second.inconsistent_traces)
    );
    assert!(!first.bug_traces.is_empty());
}

/// Summaries are committed once per symbol even when the same header
/// definition is seen by several translation units.
#[test]
fn duplicate_definitions_produce_one_summary() {
    let make_unit = || {
        tu(vec![function(
            "shared",
            vec![body(vec![var_decl("dist", "mavlink_obstacle_distance_t")])],
        )])
    };
    let (indices, _) = analyze(vec![make_unit(), make_unit()], 2);

    let total: usize = indices
        .summaries_by_tu
        .iter()
        .map(|m| m.contains_key("shared") as usize)
        .sum();
    assert_eq!(total, 1, "one summary per stable symbol id");
}
