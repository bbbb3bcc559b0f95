//! AST provider backed by clang's JSON AST dump.
//!
//! Runs the clang frontend with `-fsyntax-only -Xclang -ast-dump=json` for
//! each compilation-database entry, in the entry's own working directory (so
//! relative include and source paths resolve without touching the analyzer
//! process's cwd), and maps the JSON into the [`Cursor`] model.
//!
//! The mapping is best-effort by design: only the node kinds the walker
//! interprets are distinguished, transparent wrappers (implicit casts,
//! parens, cleanups) are spliced out, and anything else becomes an
//! [`CursorKind::Unexposed`] node the walker recurses through. Stable symbol
//! ids prefer the mangled name and fall back to the qualified name.

use std::collections::HashSet;
use std::process::Command;

use serde_json::Value;

use crate::ast::{AstProvider, Cursor, CursorKind, Linkage, ProviderError, RefInfo, SourceLocation};
use crate::compiledb::CompileCommand;

/// Environment variable overriding the frontend binary (default `clang`).
pub const FRONTEND_ENV: &str = "SKYLINT_CLANG";

pub struct ClangJsonProvider {
    frontend: String,
}

impl ClangJsonProvider {
    pub fn new() -> ClangJsonProvider {
        ClangJsonProvider {
            frontend: std::env::var(FRONTEND_ENV).unwrap_or_else(|_| "clang".to_string()),
        }
    }

    pub fn with_frontend(frontend: impl Into<String>) -> ClangJsonProvider {
        ClangJsonProvider {
            frontend: frontend.into(),
        }
    }

    /// Whether the configured frontend can be spawned at all.
    pub fn available(&self) -> bool {
        Command::new(&self.frontend)
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }
}

impl Default for ClangJsonProvider {
    fn default() -> Self {
        ClangJsonProvider::new()
    }
}

impl AstProvider for ClangJsonProvider {
    fn translation_unit(&self, command: &CompileCommand) -> Result<Cursor, ProviderError> {
        let file = command.file.display().to_string();
        let argv = command.argv();
        if argv.is_empty() {
            return Err(ProviderError::Parse {
                file,
                detail: "empty compile command".to_string(),
            });
        }

        let output = Command::new(&self.frontend)
            .args(frontend_args(&argv))
            .args(["-fsyntax-only", "-Xclang", "-ast-dump=json"])
            .current_dir(&command.directory)
            .output()
            .map_err(|source| ProviderError::Frontend {
                directory: command.directory.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(ProviderError::Parse {
                file,
                detail: truncate(&String::from_utf8_lossy(&output.stderr), 400),
            });
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .map_err(|source| ProviderError::Dump { file, source })?;
        let mut converter = Converter::default();
        Ok(converter
            .convert(&value)
            .unwrap_or_else(|| Cursor::new(CursorKind::TranslationUnit, "")))
    }
}

/// The original invocation without its compiler name, output-producing and
/// dependency-tracking flags.
fn frontend_args(argv: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    let mut it = argv.iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" | "-MD" | "-MMD" | "-MP" => {}
            "-o" | "-MF" | "-MT" | "-MQ" => {
                it.next();
            }
            _ => args.push(arg.clone()),
        }
    }
    args
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

/// Wrapper kinds spliced out of the tree when they carry exactly one child.
const WRAPPERS: &[&str] = &[
    "ImplicitCastExpr",
    "ParenExpr",
    "ExprWithCleanups",
    "MaterializeTemporaryExpr",
    "CXXBindTemporaryExpr",
    "ConstantExpr",
    "FullExpr",
    "CStyleCastExpr",
    "CXXStaticCastExpr",
    "CXXFunctionalCastExpr",
];

#[derive(Default)]
struct Converter {
    /// Declaration ids of automatic locals seen so far, for the linkage
    /// heuristic on references.
    local_ids: HashSet<String>,
    /// Depth of function bodies currently being converted.
    function_depth: usize,
    /// Enclosing namespace/class names.
    context: Vec<String>,
}

impl Converter {
    fn convert(&mut self, v: &Value) -> Option<Cursor> {
        let kind = v.get("kind")?.as_str()?;
        if v.get("isImplicit").and_then(Value::as_bool).unwrap_or(false) {
            return None;
        }

        if WRAPPERS.contains(&kind) {
            let inner = self.convert_inner(v);
            return match inner.len() {
                0 => None,
                1 => inner.into_iter().next(),
                _ => Some(Cursor::new(CursorKind::Unexposed, "").with_children(inner)),
            };
        }

        let name = str_field(v, "name");
        let mut cursor = match kind {
            "TranslationUnitDecl" => Cursor::new(CursorKind::TranslationUnit, ""),
            "NamespaceDecl" => Cursor::new(CursorKind::Namespace, name),
            "CXXRecordDecl" => {
                let record_kind = if str_field(v, "tagUsed") == "class" {
                    CursorKind::ClassDecl
                } else {
                    CursorKind::StructDecl
                };
                Cursor::new(record_kind, name)
            }
            "FieldDecl" => Cursor::new(CursorKind::FieldDecl, name),
            "FunctionDecl" | "CXXMethodDecl" => return Some(self.convert_function(v, kind)),
            "ParmVarDecl" | "VarDecl" => {
                self.record_decl_id(v);
                let decl_kind = if kind == "ParmVarDecl" {
                    CursorKind::ParmDecl
                } else {
                    CursorKind::VarDecl
                };
                Cursor::new(decl_kind, name)
            }
            "CompoundStmt" => Cursor::new(CursorKind::CompoundStmt, ""),
            "IfStmt" => Cursor::new(CursorKind::IfStmt, ""),
            "ForStmt" => Cursor::new(CursorKind::ForStmt, ""),
            "WhileStmt" => Cursor::new(CursorKind::WhileStmt, ""),
            "SwitchStmt" => Cursor::new(CursorKind::SwitchStmt, ""),
            "BreakStmt" => Cursor::new(CursorKind::BreakStmt, ""),
            "ReturnStmt" => Cursor::new(CursorKind::ReturnStmt, ""),
            "BinaryOperator" | "CompoundAssignOperator" => {
                Cursor::new(CursorKind::BinaryOperator, "").with_opcode(str_field(v, "opcode"))
            }
            "UnaryOperator" => {
                Cursor::new(CursorKind::UnaryOperator, "").with_opcode(str_field(v, "opcode"))
            }
            "CallExpr" | "CXXMemberCallExpr" | "CXXOperatorCallExpr" => {
                return Some(self.convert_call(v, kind));
            }
            "MemberExpr" => Cursor::new(CursorKind::MemberRefExpr, name),
            "DeclRefExpr" => return Some(self.convert_decl_ref(v)),
            "CXXThisExpr" => Cursor::new(CursorKind::ThisExpr, ""),
            "ArraySubscriptExpr" => Cursor::new(CursorKind::ArraySubscriptExpr, ""),
            _ => Cursor::new(CursorKind::Unexposed, name),
        };

        cursor.type_spelling = qual_type(v);
        cursor.location = location(v);

        let scoped = matches!(
            cursor.kind,
            CursorKind::Namespace | CursorKind::ClassDecl | CursorKind::StructDecl
        ) && !cursor.spelling.is_empty();
        if scoped {
            self.context.push(cursor.spelling.clone());
        }
        cursor.children = self.convert_inner(v);
        if scoped {
            self.context.pop();
        }
        Some(cursor)
    }

    fn convert_inner(&mut self, v: &Value) -> Vec<Cursor> {
        v.get("inner")
            .and_then(Value::as_array)
            .map(|inner| inner.iter().filter_map(|c| self.convert(c)).collect())
            .unwrap_or_default()
    }

    fn convert_function(&mut self, v: &Value, kind: &str) -> Cursor {
        let name = str_field(v, "name");
        let symbol_id = match str_field(v, "mangledName") {
            m if m.is_empty() => qualified(&self.context, &name),
            m => m,
        };
        let cursor_kind = if kind == "CXXMethodDecl" {
            CursorKind::Method
        } else {
            CursorKind::FunctionDecl
        };
        let mut cursor = Cursor::new(cursor_kind, name).with_symbol_id(symbol_id);
        cursor.type_spelling = qual_type(v);
        cursor.location = location(v);
        self.function_depth += 1;
        cursor.children = self.convert_inner(v);
        self.function_depth -= 1;
        cursor
    }

    fn convert_call(&mut self, v: &Value, kind: &str) -> Cursor {
        let children = self.convert_inner(v);
        let callee = children
            .first()
            .filter(|c| matches!(c.kind, CursorKind::DeclRefExpr | CursorKind::MemberRefExpr))
            .map(|c| c.spelling.clone())
            .unwrap_or_default();

        // Normalize assignment-operator calls to the binary-assignment
        // shape: children [lhs, rhs], callee reference dropped.
        if kind == "CXXOperatorCallExpr" && callee == "operator=" {
            let operands = children.into_iter().skip(1).collect();
            let mut cursor = Cursor::new(CursorKind::CallExpr, "operator=").with_children(operands);
            cursor.location = location(v);
            return cursor;
        }

        let mut cursor = Cursor::new(CursorKind::CallExpr, callee).with_children(children);
        cursor.type_spelling = qual_type(v);
        cursor.location = location(v);
        cursor
    }

    fn convert_decl_ref(&mut self, v: &Value) -> Cursor {
        let referenced = v.get("referencedDecl");
        let name = referenced.map(|r| str_field(r, "name")).unwrap_or_default();
        let linkage = referenced.map(|r| self.referenced_linkage(r));
        let mut cursor = Cursor::new(CursorKind::DeclRefExpr, name.clone());
        cursor.type_spelling = qual_type(v);
        cursor.location = location(v);
        if let Some(linkage) = linkage {
            cursor.referenced = Some(RefInfo {
                spelling: name,
                linkage,
            });
        }
        cursor
    }

    /// Automatic locals have no linkage; parameters never do; everything
    /// else (file-scope variables, functions, enum constants, static locals)
    /// is treated as a global access.
    fn referenced_linkage(&self, referenced: &Value) -> Linkage {
        match str_field(referenced, "kind").as_str() {
            "ParmVarDecl" => Linkage::None,
            "VarDecl" => {
                let id = str_field(referenced, "id");
                if self.local_ids.contains(&id) {
                    Linkage::None
                } else {
                    Linkage::External
                }
            }
            _ => Linkage::External,
        }
    }

    fn record_decl_id(&mut self, v: &Value) {
        if self.function_depth == 0 {
            return;
        }
        // Static locals keep their linkage.
        if str_field(v, "storageClass") == "static" {
            return;
        }
        let id = str_field(v, "id");
        if !id.is_empty() {
            self.local_ids.insert(id);
        }
    }
}

fn qualified(context: &[String], name: &str) -> String {
    if context.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", context.join("::"), name)
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn qual_type(v: &Value) -> String {
    v.get("type")
        .and_then(|t| t.get("qualType"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn location(v: &Value) -> SourceLocation {
    let loc = v.get("loc");
    SourceLocation {
        file: loc
            .and_then(|l| l.get("file"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        line: loc
            .and_then(|l| l.get("line"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_a_minimal_dump() {
        let dump = serde_json::json!({
            "kind": "TranslationUnitDecl",
            "inner": [{
                "kind": "FunctionDecl",
                "name": "f",
                "mangledName": "_Z1fv",
                "inner": [{
                    "kind": "CompoundStmt",
                    "inner": [{
                        "kind": "DeclStmt",
                        "inner": [{
                            "kind": "VarDecl",
                            "id": "0x1",
                            "name": "dist",
                            "type": { "qualType": "mavlink_obstacle_distance_t" }
                        }]
                    }]
                }]
            }]
        });
        let mut converter = Converter::default();
        let tu = converter.convert(&dump).unwrap();
        assert_eq!(tu.kind, CursorKind::TranslationUnit);
        let f = &tu.children[0];
        assert_eq!(f.kind, CursorKind::FunctionDecl);
        assert_eq!(f.symbol_id, "_Z1fv");
        let body = &f.children[0];
        assert_eq!(body.kind, CursorKind::CompoundStmt);
        // DeclStmt is unexposed but recursed through.
        let decl = &body.children[0].children[0];
        assert_eq!(decl.kind, CursorKind::VarDecl);
        assert_eq!(decl.object_type_name(), "mavlink_obstacle_distance_t");
    }

    #[test]
    fn splices_implicit_casts() {
        let dump = serde_json::json!({
            "kind": "BinaryOperator",
            "opcode": "=",
            "inner": [
                { "kind": "DeclRefExpr",
                  "referencedDecl": { "kind": "VarDecl", "id": "0x9", "name": "alt_in_cm" } },
                { "kind": "ImplicitCastExpr",
                  "inner": [{ "kind": "DeclRefExpr",
                              "referencedDecl": { "kind": "ParmVarDecl", "id": "0x2", "name": "x" } }] }
            ]
        });
        let mut converter = Converter::default();
        let binop = converter.convert(&dump).unwrap();
        assert_eq!(binop.operator(), "=");
        assert_eq!(binop.children.len(), 2);
        // The cast is gone; the RHS is the bare reference.
        assert_eq!(binop.children[1].kind, CursorKind::DeclRefExpr);
        assert_eq!(binop.children[1].spelling, "x");
        assert_eq!(
            binop.children[1].referenced.as_ref().unwrap().linkage,
            Linkage::None
        );
        // alt_in_cm was never recorded as a local, so it reads as global.
        assert_eq!(
            binop.children[0].referenced.as_ref().unwrap().linkage,
            Linkage::External
        );
    }

    #[test]
    fn normalizes_assignment_operator_calls() {
        let dump = serde_json::json!({
            "kind": "CXXOperatorCallExpr",
            "inner": [
                { "kind": "ImplicitCastExpr",
                  "inner": [{ "kind": "DeclRefExpr",
                              "referencedDecl": { "kind": "CXXMethodDecl", "name": "operator=" } }] },
                { "kind": "DeclRefExpr",
                  "referencedDecl": { "kind": "VarDecl", "id": "0x3", "name": "lhs" } },
                { "kind": "DeclRefExpr",
                  "referencedDecl": { "kind": "VarDecl", "id": "0x4", "name": "rhs" } }
            ]
        });
        let mut converter = Converter::default();
        let call = converter.convert(&dump).unwrap();
        assert_eq!(call.kind, CursorKind::CallExpr);
        assert_eq!(call.spelling, "operator=");
        assert_eq!(call.call_args().len(), 2);
        assert_eq!(call.children[0].spelling, "lhs");
    }

    #[test]
    fn drops_output_flags_from_the_invocation() {
        let argv: Vec<String> = ["g++", "-Iinclude", "-c", "x.cpp", "-o", "x.o", "-MMD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(frontend_args(&argv), vec!["-Iinclude", "x.cpp"]);
    }
}
