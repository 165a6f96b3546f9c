use std::error::Error;
use std::fmt::Display;

use crate::ast::{SourceOrigin, Type};

/// Everything a semantic phase can complain about. Each variant carries
/// enough of the offending construct to render a message without chasing
/// the tree again.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SemanticErrorKind {
    UndefinedRef {
        name: String,
        member: String,
    },
    UndefinedTypeRef {
        name: String,
        member: String,
    },
    AmbiguousTypeRef {
        name: String,
        member: String,
    },
    DuplicateName {
        name: String,
        count: usize,
    },
    DuplicateParamName {
        param: String,
        decl: String,
    },
    FunctionOperatorNameClash {
        name: String,
    },
    MissingParameterType {
        param: String,
        decl: String,
    },
    MissingOperatorParameterType {
        param: String,
        op: String,
    },
    TypeMismatch {
        expected: Type,
        actual: Type,
    },
    InvalidApplication {
        fn_type: Option<Type>,
        arg_type: Option<Type>,
    },
    UnresolvableType {
        node: String,
    },
    UntypedHoleInBinding {
        binding: String,
    },
    ConditionalBranchTypeMismatch {
        true_type: Type,
        false_type: Type,
    },
    ConditionalBranchTypeUnknown,
    UseAfterMove {
        name: String,
        moved_at: SourceOrigin,
    },
    MoveOfBorrowed {
        name: String,
    },
    ConsumingParamNotLastUse {
        param: String,
        name: String,
    },
    PartialApplicationWithConsuming {
        param: String,
    },
    ConditionalOwnershipMismatch,
    InvalidEntryPoint {
        reason: String,
    },
    DanglingTerms {
        reason: String,
    },
    InvalidExpression {
        reason: String,
    },
    MemberErrorFound {
        message: String,
    },
    ParsingIdErrorFound {
        name: String,
        message: String,
    },
    InvalidExpressionFound {
        reason: String,
    },
}

impl Display for SemanticErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticErrorKind::UndefinedRef { name, member } => {
                write!(f, "undefined reference '{name}' in '{member}'")
            }
            SemanticErrorKind::UndefinedTypeRef { name, member } => {
                write!(f, "undefined type '{name}' in '{member}'")
            }
            SemanticErrorKind::AmbiguousTypeRef { name, member } => {
                write!(f, "type '{name}' in '{member}' matches more than one declaration")
            }
            SemanticErrorKind::DuplicateName { name, count } => {
                write!(f, "name '{name}' is declared {count} times")
            }
            SemanticErrorKind::DuplicateParamName { param, decl } => {
                write!(f, "parameter '{param}' is declared twice in '{decl}'")
            }
            SemanticErrorKind::FunctionOperatorNameClash { name } => {
                write!(f, "'{name}' is declared both as a function and as an operator")
            }
            SemanticErrorKind::MissingParameterType { param, decl } => {
                write!(f, "parameter '{param}' of '{decl}' has no type ascription")
            }
            SemanticErrorKind::MissingOperatorParameterType { param, op } => {
                write!(f, "parameter '{param}' of operator '{op}' has no type ascription")
            }
            SemanticErrorKind::TypeMismatch { expected, actual } => {
                write!(f, "expected type '{expected}' but got '{actual}'")
            }
            SemanticErrorKind::InvalidApplication { fn_type, .. } => match fn_type {
                Some(ty) => write!(f, "value of type '{ty}' is not applicable"),
                None => write!(f, "application of a value with unknown type"),
            },
            SemanticErrorKind::UnresolvableType { node } => {
                write!(f, "could not determine the type of '{node}'")
            }
            SemanticErrorKind::UntypedHoleInBinding { binding } => {
                write!(f, "hole in '{binding}' has no inferable type")
            }
            SemanticErrorKind::ConditionalBranchTypeMismatch {
                true_type,
                false_type,
            } => write!(
                f,
                "conditional branches disagree: '{true_type}' vs '{false_type}'"
            ),
            SemanticErrorKind::ConditionalBranchTypeUnknown => {
                write!(f, "conditional branches have unknown types")
            }
            SemanticErrorKind::UseAfterMove { name, .. } => {
                write!(f, "'{name}' is used after its ownership was moved")
            }
            SemanticErrorKind::MoveOfBorrowed { name } => {
                write!(f, "'{name}' is borrowed and cannot be moved out of this scope")
            }
            SemanticErrorKind::ConsumingParamNotLastUse { param, name } => {
                write!(
                    f,
                    "'{name}' is passed to consuming parameter '{param}' but used again afterwards"
                )
            }
            SemanticErrorKind::PartialApplicationWithConsuming { param } => {
                write!(
                    f,
                    "partial application would capture consuming parameter '{param}'"
                )
            }
            SemanticErrorKind::ConditionalOwnershipMismatch => {
                write!(f, "conditional branches produce incompatible ownership")
            }
            SemanticErrorKind::InvalidEntryPoint { reason } => {
                write!(f, "invalid entry point: {reason}")
            }
            SemanticErrorKind::DanglingTerms { reason } => {
                write!(f, "dangling terms: {reason}")
            }
            SemanticErrorKind::InvalidExpression { reason } => {
                write!(f, "invalid expression: {reason}")
            }
            SemanticErrorKind::MemberErrorFound { message } => {
                write!(f, "parser error: {message}")
            }
            SemanticErrorKind::ParsingIdErrorFound { name, message } => {
                write!(f, "parser error on '{name}': {message}")
            }
            SemanticErrorKind::InvalidExpressionFound { reason } => {
                write!(f, "invalid expression from parser: {reason}")
            }
        }
    }
}

/// A semantic error: the kind, the phase that emitted it, the origin of
/// the offending node, and an optional cause when this error is a
/// downstream consequence of an earlier one.
///
/// Serialize-only: errors flow out to drivers and tooling, never back
/// in, and the phase name is a static string.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub phase: &'static str,
    pub origin: SourceOrigin,
    pub cause: Option<Box<SemanticError>>,
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, phase: &'static str, origin: SourceOrigin) -> SemanticError {
        SemanticError {
            kind,
            phase,
            origin,
            cause: None,
        }
    }

    pub fn caused_by(self, cause: SemanticError) -> SemanticError {
        SemanticError {
            cause: Some(Box::new(cause)),
            ..self
        }
    }

    /// A primary error is a direct root cause; secondaries are downstream
    /// consequences and may be suppressed in user-facing reports.
    pub fn is_primary(&self) -> bool {
        self.cause.is_none()
    }

    /// Render against source text, using the span excerpt printer for
    /// source-backed origins.
    pub fn render(&self, source: &str) -> String {
        self.origin.render(source, format!("{} [{}]", self.kind, self.phase))
    }
}

impl Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.origin {
            SourceOrigin::Loc { start, .. } => write!(
                f,
                "{}:{}: {} [{}]",
                start.line, start.col, self.kind, self.phase
            ),
            SourceOrigin::Synth => write!(f, "{} [{}]", self.kind, self.phase),
        }
    }
}

impl Error for SemanticError {}
