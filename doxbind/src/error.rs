//! Error taxonomy for the parsing and resolution core.
//!
//! Per-symbol failures ([`TypeSyntaxError`]) degrade the symbol into a
//! placeholder; [`Error`] variants other than `TypeSyntax` abort the run.

use thiserror::Error;

/// A C++ type string could not be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeSyntaxError {
    #[error("empty type string")]
    Empty,

    #[error("unbalanced brackets in `{0}`")]
    Unbalanced(String),

    #[error("expected a single type but found {count} top-level segments in `{ty}`")]
    MultipleRoots { ty: String, count: usize },

    #[error("unexpected text `{trailing}` after closing bracket in `{ty}`")]
    TrailingText { ty: String, trailing: String },

    #[error("function type `{0}` has no return type")]
    MissingReturnType(String),

    #[error("cannot separate type from name in function argument `{0}`")]
    AmbiguousArgument(String),
}

/// Errors raised by the core passes.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    TypeSyntax(#[from] TypeSyntaxError),

    /// Type-reference repair found more than one fully-qualified candidate.
    #[error("ambiguous type `{name}` in `{context}`, candidates: {}", candidates.join(", "))]
    AmbiguousSymbol {
        name: String,
        context: String,
        candidates: Vec<String>,
    },

    /// A node the builder cannot do without is absent.
    #[error("missing <{node}> in {context}")]
    MissingNode { node: String, context: String },

    #[error("invalid xml: {0}")]
    Xml(#[from] roxmltree::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
