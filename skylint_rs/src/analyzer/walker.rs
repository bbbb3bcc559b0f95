//! Per-function AST abstract interpretation.
//!
//! [`TuWalker`] descends a translation unit, maintaining the enclosing
//! namespace/class chain, and hands every function or method definition to a
//! fresh [`FunctionWalker`]. The function walker owns the scope stack, tracks
//! frame-check constraints, expands intrinsically typed message structs,
//! types assignments and call arguments, and commits a [`FunctionSummary`]
//! into the shared indices when the function had a body.
//!
//! Definitions are claimed through `seen_definitions` by stable symbol id:
//! the first walker to claim an id owns the summary, so a function defined in
//! a header produces one summary no matter how many translation units include
//! it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use crate::analyzer::Indices;
use crate::analyzer::scope::Env;
use crate::ast::{Cursor, CursorKind, Linkage, Visit, visit_children};
use crate::protocol::ProtocolSpec;
use crate::types::{CallSite, FrameId, SemType, TypeSource, TypeSourceKind};

/// Walks one translation unit's declarations.
pub struct TuWalker<'a> {
    spec: &'a ProtocolSpec,
    interesting_writes: &'a BTreeSet<String>,
    indices: &'a Mutex<Indices>,
    tu_index: usize,
    context: Vec<String>,
}

impl<'a> TuWalker<'a> {
    pub fn new(
        spec: &'a ProtocolSpec,
        interesting_writes: &'a BTreeSet<String>,
        indices: &'a Mutex<Indices>,
        tu_index: usize,
    ) -> TuWalker<'a> {
        TuWalker {
            spec,
            interesting_writes,
            indices,
            tu_index,
            context: Vec::new(),
        }
    }

    pub fn walk(&mut self, translation_unit: &Cursor) {
        self.walk_decls(translation_unit);
    }

    fn walk_decls(&mut self, node: &Cursor) {
        for child in &node.children {
            match child.kind {
                CursorKind::Namespace | CursorKind::ClassDecl | CursorKind::StructDecl => {
                    let named = !child.spelling.is_empty();
                    if named {
                        self.context.push(child.spelling.clone());
                    }
                    self.walk_decls(child);
                    if named {
                        self.context.pop();
                    }
                }
                CursorKind::FunctionDecl | CursorKind::Method => self.analyze_function(child),
                _ => self.walk_decls(child),
            }
        }
    }

    fn analyze_function(&mut self, cursor: &Cursor) {
        let symbol_id = stable_symbol_id(cursor, &self.context);
        {
            let indices = self.indices.lock().expect("analyzer index lock poisoned");
            if indices.seen_definitions.contains(&symbol_id) {
                return;
            }
        }
        tracing::debug!(function = %cursor.spelling, "analyzing");
        let mut walker = FunctionWalker {
            spec: self.spec,
            interesting_writes: self.interesting_writes,
            indices: self.indices,
            tu_index: self.tu_index,
            fn_name: cursor.spelling.clone(),
            symbol_id,
            semantic_context: self.context.join("::"),
            env: Env::new(),
            had_frame_constraint: false,
            had_taint: false,
            had_definition: false,
            fn_params: HashSet::new(),
            param_no: HashMap::new(),
            param_to_source_kind: BTreeMap::new(),
            total_params: 0,
            callees: BTreeSet::new(),
            calling_context: BTreeMap::new(),
            store_to_type: BTreeMap::new(),
        };
        walker.run(cursor);
    }
}

/// Falls back to the qualified name when a provider produced no stable id.
fn stable_symbol_id(cursor: &Cursor, context: &[String]) -> String {
    if !cursor.symbol_id.is_empty() {
        return cursor.symbol_id.clone();
    }
    if context.is_empty() {
        cursor.spelling.clone()
    } else {
        format!("{}::{}", context.join("::"), cursor.spelling)
    }
}

/// State for one function's walk.
struct FunctionWalker<'a> {
    spec: &'a ProtocolSpec,
    interesting_writes: &'a BTreeSet<String>,
    indices: &'a Mutex<Indices>,
    tu_index: usize,

    fn_name: String,
    symbol_id: String,
    semantic_context: String,

    env: Env,
    had_frame_constraint: bool,
    had_taint: bool,
    had_definition: bool,

    fn_params: HashSet<String>,
    param_no: HashMap<String, usize>,
    param_to_source_kind: BTreeMap<usize, TypeSourceKind>,
    total_params: usize,

    callees: BTreeSet<String>,
    calling_context: BTreeMap<String, Vec<CallSite>>,
    store_to_type: BTreeMap<String, SemType>,
}

impl FunctionWalker<'_> {
    fn run(&mut self, function: &Cursor) {
        self.env.push();
        for child in &function.children {
            self.walk_node(child);
        }
        debug_assert_eq!(self.env.depth(), 1, "scope stack unbalanced after walk");

        let mut indices = self.indices.lock().expect("analyzer index lock poisoned");
        if self.had_taint && self.had_definition && !self.had_frame_constraint {
            indices.unconstrained.insert(self.fn_name.clone());
        }
        if self.had_definition {
            let summaries = indices
                .summaries_by_tu
                .get_mut(self.tu_index)
                .expect("translation-unit index within bounds");
            let entry = summaries.entry(self.fn_name.clone()).or_default();
            entry.callees.extend(std::mem::take(&mut self.callees));
            for (callee, sites) in std::mem::take(&mut self.calling_context) {
                entry.calling_context.entry(callee).or_default().extend(sites);
            }
            entry.num_params = self.total_params;
            entry.param_to_source_kind = std::mem::take(&mut self.param_to_source_kind);
            entry.store_to_type = std::mem::take(&mut self.store_to_type);
            indices
                .name_to_tus
                .entry(self.fn_name.clone())
                .or_default()
                .insert(self.tu_index);
        }
    }

    fn walk_node(&mut self, node: &Cursor) {
        match node.kind {
            CursorKind::IfStmt => {
                self.env.push();
                let mut children = node.children.iter();
                if let Some(condition) = children.next()
                    && condition.kind == CursorKind::BinaryOperator
                    && condition.operator() == "=="
                {
                    self.check_frame_guard(condition);
                }
                for child in children {
                    self.walk_node(child);
                }
                self.env.unify_and_pop();
            }
            CursorKind::ForStmt | CursorKind::WhileStmt => {
                self.env.push();
                self.walk_children(node);
                self.env.unify_and_pop();
            }
            CursorKind::SwitchStmt => {
                if let Some(control) = node.children.first()
                    && self.check_frame_guard(control)
                {
                    tracing::debug!(function = %self.fn_name, "frame-discriminator switch");
                }
                self.env.push();
                self.walk_children(node);
                self.env.unify_and_pop();
            }
            CursorKind::BreakStmt => self.env.unify_parent(),
            CursorKind::VarDecl => {
                self.handle_var_decl(node);
                self.walk_children(node);
            }
            CursorKind::ParmDecl => {
                self.handle_parm_decl(node);
                self.walk_children(node);
            }
            CursorKind::BinaryOperator => {
                if node.operator() == "=" {
                    self.handle_store(node);
                }
                self.walk_children(node);
            }
            CursorKind::CallExpr => {
                if node.spelling == "operator=" {
                    self.handle_store(node);
                } else if !node.spelling.is_empty() {
                    self.handle_call(node);
                }
                self.walk_children(node);
            }
            CursorKind::CompoundStmt => {
                self.claim_definition();
                self.walk_children(node);
            }
            _ => self.walk_children(node),
        }
    }

    fn walk_children(&mut self, node: &Cursor) {
        for child in &node.children {
            self.walk_node(child);
        }
    }

    /// The first compound statement of a definition claims the symbol id.
    /// Losing the claim means another translation unit already produced the
    /// summary; the walk continues but commits nothing.
    fn claim_definition(&mut self) {
        if self.had_definition {
            return;
        }
        let mut indices = self.indices.lock().expect("analyzer index lock poisoned");
        if indices.seen_definitions.insert(self.symbol_id.clone()) {
            self.had_definition = true;
        }
    }

    /// Detects `<msg>.<frame-field> == <literal>` style guards inside an `if`
    /// condition or a `switch` control expression.
    fn check_frame_guard(&mut self, condition: &Cursor) -> bool {
        let spec = self.spec;
        let mut found = false;
        visit_children(condition, &mut |c, parent| {
            if c.kind == CursorKind::DeclRefExpr && parent.kind == CursorKind::MemberRefExpr {
                let object_type = c.object_type_name();
                found = spec.type_to_frame_field.get(&object_type) == Some(&parent.spelling);
                return Visit::Break;
            }
            Visit::Recurse
        });
        if found {
            self.had_frame_constraint = true;
        }
        found
    }

    fn handle_var_decl(&mut self, node: &Cursor) {
        let type_name = node.object_type_name();
        if self.spec.is_message_type(&type_name) {
            self.expand_intrinsic_fields(&type_name, &node.spelling);
            self.mark_intrinsic_bearing();
            if self.spec.has_frame_field(&type_name) {
                self.had_taint = true;
            }
            return;
        }

        // Not a message type: check for a tainted initializer. If any name
        // referenced on the RHS already has a type, the declaration inherits
        // it.
        let mut inherited: Option<SemType> = None;
        {
            let env = &self.env;
            visit_children(node, &mut |c, _| match c.kind {
                CursorKind::DeclRefExpr => {
                    if let Some(ty) = env.lookup(&c.spelling) {
                        inherited = Some(ty.clone());
                        Visit::Break
                    } else {
                        Visit::Recurse
                    }
                }
                CursorKind::MemberRefExpr => {
                    if let Some(ty) = env.lookup(&pretty_member_access(c)) {
                        inherited = Some(ty.clone());
                        Visit::Break
                    } else {
                        Visit::Recurse
                    }
                }
                _ => Visit::Recurse,
            });
        }
        if let Some(ty) = inherited {
            self.env.bind(node.spelling.clone(), ty);
        }
    }

    fn handle_parm_decl(&mut self, node: &Cursor) {
        let type_name = node.object_type_name();
        let name = node.spelling.clone();
        self.param_no.insert(name.clone(), self.total_params);
        if self.spec.is_message_type(&type_name) {
            self.expand_intrinsic_fields(&type_name, &name);
            self.param_to_source_kind
                .insert(self.total_params, TypeSourceKind::Intrinsic);
            self.mark_intrinsic_bearing();
        } else {
            self.param_to_source_kind
                .insert(self.total_params, TypeSourceKind::Unknown);
            self.fn_params.insert(name.clone());
            let ty = SemType::universal_with_source(
                self.spec.num_units,
                TypeSource::Param(self.total_params),
            );
            self.env.bind(name, ty);
        }
        self.total_params += 1;
    }

    /// Binds `<var>.<field>` for every unit-bearing field of a message
    /// struct: the unit is known exactly, the frame could be anything.
    fn expand_intrinsic_fields(&mut self, type_name: &str, var_name: &str) {
        let Some(fields) = self.spec.type_to_field_units.get(type_name) else {
            return;
        };
        let bindings: Vec<(String, SemType)> = fields
            .iter()
            .map(|(field, &unit)| {
                let ty = SemType::intrinsic_from_field(
                    self.spec.unit_dimensions.get(&unit).copied(),
                    FrameId::universe(),
                    unit,
                    TypeSource::Intrinsic,
                );
                (format!("{var_name}.{field}"), ty)
            })
            .collect();
        for (name, ty) in bindings {
            self.env.bind(name, ty);
        }
    }

    fn mark_intrinsic_bearing(&self) {
        let mut indices = self.indices.lock().expect("analyzer index lock poisoned");
        indices
            .functions_with_intrinsic_vars
            .insert(self.fn_name.clone());
    }

    /// Assignment via `=` or `operator=`: type the RHS, record the store if
    /// the target resolves to an interesting qualified name, and rebind the
    /// target in the innermost scope.
    fn handle_store(&mut self, node: &Cursor) {
        let Some(rhs_type) = self.assignment_rhs_type(node) else {
            return;
        };
        if let Some(qname) = self.qualified_store_name(node)
            && self.interesting_writes.contains(&qname)
        {
            tracing::info!(function = %self.fn_name, variable = %qname, "interesting store");
            self.store_to_type
                .entry(qname)
                .or_default()
                .merge(&rhs_type);
        }
        let target = pretty_store_target(node);
        if !target.is_empty() {
            self.env.bind(target, rhs_type);
        }
    }

    /// Types the RHS of an assignment. First pass: any referenced name with
    /// a type in the environment. Second pass: a bare parameter reference
    /// yields the universal type tagged with the parameter's ordinal.
    fn assignment_rhs_type(&self, node: &Cursor) -> Option<SemType> {
        let mut result: Option<SemType> = None;
        let env = &self.env;
        let mut skipped_lhs = false;
        visit_children(node, &mut |c, _| {
            if !skipped_lhs {
                skipped_lhs = true;
                return Visit::Continue;
            }
            match c.kind {
                CursorKind::MemberRefExpr => {
                    if let Some(ty) = env.lookup(&pretty_member_access(c)) {
                        result = Some(ty.clone());
                        Visit::Break
                    } else {
                        Visit::Recurse
                    }
                }
                CursorKind::DeclRefExpr => {
                    if let Some(ty) = env.lookup(&c.spelling) {
                        result = Some(ty.clone());
                        Visit::Break
                    } else {
                        Visit::Recurse
                    }
                }
                _ => Visit::Recurse,
            }
        });
        if result.is_some() {
            return result;
        }

        let mut skipped_lhs = false;
        visit_children(node, &mut |c, _| {
            if !skipped_lhs {
                skipped_lhs = true;
                return Visit::Continue;
            }
            if c.kind == CursorKind::DeclRefExpr
                && self.fn_params.contains(&c.spelling)
                && let Some(&no) = self.param_no.get(&c.spelling)
            {
                result = Some(SemType::universal_with_source(
                    self.spec.num_units,
                    TypeSource::Param(no),
                ));
                return Visit::Break;
            }
            Visit::Recurse
        });
        result
    }

    /// Renders the assignment target into a stable qualified name when it
    /// resolves outside the function: a member access with no local base
    /// object, or a reference to a variable with linkage. Local targets
    /// return `None`.
    fn qualified_store_name(&self, node: &Cursor) -> Option<String> {
        let lhs = node.children.first()?;
        match lhs.kind {
            CursorKind::MemberRefExpr | CursorKind::ThisExpr => {
                if contains_local_decl_ref(lhs) {
                    return None;
                }
                Some(self.member_access_qname(lhs))
            }
            CursorKind::DeclRefExpr => {
                let is_global = lhs
                    .referenced
                    .as_ref()
                    .is_some_and(|r| r.linkage != Linkage::None);
                is_global.then(|| lhs.spelling.clone())
            }
            _ => None,
        }
    }

    /// `Scope::Field` rendering of a member access: the scope-resolution
    /// prefix when the access resolves a global, the enclosing semantic
    /// context otherwise.
    fn member_access_qname(&self, access: &Cursor) -> String {
        let scope_ops = scope_resolution_ops(access);
        if scope_ops.is_empty() {
            join_scoped(&[&self.semantic_context, &access.spelling])
        } else if is_global_access(access) {
            join_scoped(&[&scope_ops, &access.spelling])
        } else {
            join_scoped(&[&self.semantic_context, &scope_ops, &access.spelling])
        }
    }

    /// Every call that is not `operator=`: type each argument and append a
    /// call site to the calling context.
    fn handle_call(&mut self, node: &Cursor) {
        let args: Vec<SemType> = node
            .call_args()
            .iter()
            .map(|arg| self.type_of_expr(arg))
            .collect();
        self.callees.insert(node.spelling.clone());
        self.calling_context
            .entry(node.spelling.clone())
            .or_default()
            .push(CallSite { args });
    }

    /// Types an arbitrary expression: the first referenced variable with a
    /// known type wins; a reference to anything untyped yields the universal
    /// type with unknown provenance; expressions without references (e.g.
    /// literals) yield the empty type.
    fn type_of_expr(&self, expr: &Cursor) -> SemType {
        let mut result = SemType::default();
        let mut classify = |c: &Cursor| -> Visit {
            match c.kind {
                CursorKind::DeclRefExpr => {
                    result = self.env.lookup(&c.spelling).cloned().unwrap_or_else(|| {
                        SemType::universal_with_source(self.spec.num_units, TypeSource::Unknown)
                    });
                    Visit::Break
                }
                CursorKind::MemberRefExpr => {
                    if let Some(ty) = self.env.lookup(&pretty_member_access(c)) {
                        result = ty.clone();
                        Visit::Break
                    } else {
                        Visit::Recurse
                    }
                }
                _ => Visit::Recurse,
            }
        };
        if classify(expr) != Visit::Break {
            visit_children(expr, &mut |c, _| classify(c));
        }
        result
    }
}

/// Pretty-prints a member access chain: `dist.min_distance`, `gcs.pos.alt`.
pub(crate) fn pretty_member_access(access: &Cursor) -> String {
    let mut prefix = String::new();
    visit_children(access, &mut |c, _| {
        match c.kind {
            CursorKind::DeclRefExpr => prefix = format!("{}{}", c.spelling, prefix),
            CursorKind::MemberRefExpr => prefix = format!(".{}{}", c.spelling, prefix),
            _ => {}
        }
        Visit::Recurse
    });
    format!("{}.{}", prefix, access.spelling)
}

/// Pretty-prints the target of a store: member accesses by their chain,
/// array subscripts by their base, anything else by its spelling.
pub(crate) fn pretty_store_target(node: &Cursor) -> String {
    let mut result = String::new();
    visit_children(node, &mut |c, _| match c.kind {
        CursorKind::MemberRefExpr => {
            result = pretty_member_access(c);
            Visit::Break
        }
        CursorKind::ArraySubscriptExpr => Visit::Recurse,
        _ => {
            result = c.spelling.clone();
            Visit::Break
        }
    });
    result
}

/// The scope-resolution prefix of a member access: for `gcs.pos.alt` seen at
/// the `alt` cursor, `gcs::pos`.
fn scope_resolution_ops(access: &Cursor) -> String {
    let mut ops = String::new();
    visit_children(access, &mut |c, _| match c.kind {
        CursorKind::DeclRefExpr => {
            ops = if ops.is_empty() {
                c.spelling.clone()
            } else {
                format!("{}::{}", c.spelling, ops)
            };
            Visit::Break
        }
        CursorKind::MemberRefExpr => {
            ops = if ops.is_empty() {
                c.spelling.clone()
            } else {
                format!("{}::{}", c.spelling, ops)
            };
            Visit::Recurse
        }
        _ => Visit::Recurse,
    });
    ops
}

/// Whether the base object of an access is a global (the first reference
/// found has linkage).
fn is_global_access(access: &Cursor) -> bool {
    let mut global = false;
    visit_children(access, &mut |c, _| {
        if c.kind == CursorKind::DeclRefExpr {
            global = c
                .referenced
                .as_ref()
                .is_some_and(|r| r.linkage != Linkage::None);
            return Visit::Break;
        }
        Visit::Recurse
    });
    global
}

/// Whether the subtree references any automatic (function-local) variable.
fn contains_local_decl_ref(node: &Cursor) -> bool {
    let mut local = false;
    visit_children(node, &mut |c, _| {
        if c.kind == CursorKind::DeclRefExpr {
            let is_local = c
                .referenced
                .as_ref()
                .is_none_or(|r| r.linkage == Linkage::None);
            if is_local {
                local = true;
                return Visit::Break;
            }
        }
        Visit::Recurse
    });
    local
}

fn join_scoped(parts: &[&str]) -> String {
    parts
        .iter()
        .copied()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("::")
}
