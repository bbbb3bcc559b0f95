//! The AST surface the analyzer walks.
//!
//! The core never talks to a compiler frontend directly. A provider builds an
//! owned [`Cursor`] tree per translation unit; the walker drives traversal
//! itself and uses [`visit_children`] with a [`Visit`] outcome wherever it
//! needs a scoped search inside a subtree.
//!
//! Model conventions providers must uphold:
//! - `BinaryOperator` nodes carry their operator in `opcode` and have
//!   children `[lhs, rhs]`.
//! - `CallExpr` nodes have the callee expression as their first child and the
//!   arguments after it, except calls spelled `operator=`, which are
//!   normalized to children `[lhs, rhs]` so assignment handling is uniform.
//! - Transparent wrapper nodes (implicit casts, parens) are spliced out.

pub mod clang_json;

use std::fmt;

use crate::compiledb::CompileCommand;

/// Kind of a cursor. A deliberately small set: everything the walker does
/// not interpret maps to [`CursorKind::Unexposed`] and is recursed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    TranslationUnit,
    Namespace,
    ClassDecl,
    StructDecl,
    FieldDecl,
    FunctionDecl,
    Method,
    ParmDecl,
    VarDecl,
    CompoundStmt,
    IfStmt,
    ForStmt,
    WhileStmt,
    SwitchStmt,
    BreakStmt,
    ReturnStmt,
    BinaryOperator,
    UnaryOperator,
    CallExpr,
    MemberRefExpr,
    DeclRefExpr,
    ThisExpr,
    ArraySubscriptExpr,
    Unexposed,
}

/// Linkage of a referenced declaration. `None` means an automatic local
/// variable; anything else is treated as a global access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    None,
    Internal,
    External,
}

/// What a reference expression resolves to.
#[derive(Debug, Clone, Default)]
pub struct RefInfo {
    pub spelling: String,
    pub linkage: Linkage,
}

/// Location of a cursor in the original source, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One node of a translation unit's AST.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    pub kind: CursorKind,
    pub spelling: String,
    /// Spelling of the node's type, qualifiers included.
    pub type_spelling: String,
    /// Operator spelling for `BinaryOperator` / `UnaryOperator`.
    pub opcode: Option<String>,
    /// Stable symbol identifier for declarations; identical across
    /// translation units for the same entity.
    pub symbol_id: String,
    /// For reference expressions, the declaration referred to.
    pub referenced: Option<RefInfo>,
    pub location: SourceLocation,
    pub children: Vec<Cursor>,
}

impl Default for CursorKind {
    fn default() -> Self {
        CursorKind::Unexposed
    }
}

impl Cursor {
    pub fn new(kind: CursorKind, spelling: impl Into<String>) -> Cursor {
        Cursor {
            kind,
            spelling: spelling.into(),
            ..Cursor::default()
        }
    }

    pub fn with_type(mut self, type_spelling: impl Into<String>) -> Cursor {
        self.type_spelling = type_spelling.into();
        self
    }

    pub fn with_opcode(mut self, opcode: impl Into<String>) -> Cursor {
        self.opcode = Some(opcode.into());
        self
    }

    pub fn with_symbol_id(mut self, symbol_id: impl Into<String>) -> Cursor {
        self.symbol_id = symbol_id.into();
        self
    }

    pub fn with_reference(mut self, spelling: impl Into<String>, linkage: Linkage) -> Cursor {
        self.referenced = Some(RefInfo {
            spelling: spelling.into(),
            linkage,
        });
        self
    }

    pub fn with_children(mut self, children: Vec<Cursor>) -> Cursor {
        self.children = children;
        self
    }

    /// The operator of a binary operator node, or `""`.
    pub fn operator(&self) -> &str {
        self.opcode.as_deref().unwrap_or("")
    }

    /// The underlying object type name: qualifiers and reference/pointer
    /// sigils stripped. `const mavlink_gps_raw_int_t &` and
    /// `mavlink_gps_raw_int_t *` both resolve to `mavlink_gps_raw_int_t`.
    pub fn object_type_name(&self) -> String {
        let mut name = self.type_spelling.replace("const ", "");
        name.retain(|c| c != '&' && c != '*');
        name.trim().to_string()
    }

    /// Call arguments, per the model convention: everything after the callee
    /// expression, or both children for a normalized `operator=`.
    pub fn call_args(&self) -> &[Cursor] {
        if self.spelling == "operator=" {
            &self.children
        } else if self.children.is_empty() {
            &[]
        } else {
            &self.children[1..]
        }
    }
}

/// Outcome of visiting one child during a scoped subtree search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into this child's children.
    Recurse,
    /// Skip this child's subtree, continue with its siblings.
    Continue,
    /// Stop the whole search.
    Break,
}

/// Depth-first search over `cursor`'s descendants. The callback receives each
/// node and its parent and steers via [`Visit`]. Returns `true` when the
/// search was stopped by [`Visit::Break`].
pub fn visit_children<F>(cursor: &Cursor, f: &mut F) -> bool
where
    F: FnMut(&Cursor, &Cursor) -> Visit,
{
    for child in &cursor.children {
        match f(child, cursor) {
            Visit::Break => return true,
            Visit::Continue => {}
            Visit::Recurse => {
                if visit_children(child, f) {
                    return true;
                }
            }
        }
    }
    false
}

/// Errors a provider can produce for one translation unit. All of them are
/// recoverable from the driver's point of view: log and skip the unit.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("cannot run compiler frontend in {directory}: {source}")]
    Frontend {
        directory: String,
        source: std::io::Error,
    },
    #[error("frontend failed for {file}: {detail}")]
    Parse { file: String, detail: String },
    #[error("malformed AST dump for {file}: {source}")]
    Dump {
        file: String,
        source: serde_json::Error,
    },
}

/// Builds a traversable AST for one entry of the compilation database.
pub trait AstProvider: Send + Sync {
    fn translation_unit(&self, command: &CompileCommand) -> Result<Cursor, ProviderError>;
}
