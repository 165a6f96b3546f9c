use super::resolvable::DeclId;
use super::source::SourceOrigin;
use super::term::{Expr, FnParam, Lambda, Term};
use super::types::Type;
use super::Visibility;

/// How a binding came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BindingOrigin {
    /// Plain user `let`
    User,
    /// Synthesized `__mk_T`
    Constructor,
    /// Synthesized `__free_T`
    Destructor,
    /// User function definition
    Function,
    /// User or stdlib operator definition
    Operator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Associativity {
    Left,
    Right,
}

/// Syntactic role of an operator binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Fixity {
    Infix,
    Prefix,
    Postfix,
}

/// Metadata carried by every binding: how it was born, how many
/// parameters it takes, and (for operators) how it parses.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BindingMeta {
    pub origin: BindingOrigin,
    pub arity: usize,
    pub fixity: Option<Fixity>,
    pub precedence: Option<u32>,
    pub associativity: Option<Associativity>,
    pub original_name: String,
    pub mangled_name: Option<String>,
    /// For constructors and memory functions: the type they were
    /// generated for.
    pub generated_for: Option<String>,
}

impl BindingMeta {
    pub fn value(name: impl ToString) -> BindingMeta {
        BindingMeta {
            origin: BindingOrigin::User,
            arity: 0,
            fixity: None,
            precedence: None,
            associativity: None,
            original_name: name.to_string(),
            mangled_name: None,
            generated_for: None,
        }
    }

    pub fn function(name: impl ToString, arity: usize) -> BindingMeta {
        BindingMeta {
            origin: BindingOrigin::Function,
            arity,
            ..BindingMeta::value(name)
        }
    }

    pub fn operator(
        name: impl ToString,
        arity: usize,
        fixity: Fixity,
        precedence: u32,
        associativity: Associativity,
    ) -> BindingMeta {
        BindingMeta {
            origin: BindingOrigin::Operator,
            arity,
            fixity: Some(fixity),
            precedence: Some(precedence),
            associativity: Some(associativity),
            ..BindingMeta::value(name)
        }
    }

    pub fn is_operator(&self) -> bool {
        self.origin == BindingOrigin::Operator
    }

    pub fn is_binary_operator(&self) -> bool {
        self.is_operator() && self.fixity == Some(Fixity::Infix)
    }

    pub fn is_prefix_operator(&self) -> bool {
        self.is_operator() && self.fixity == Some(Fixity::Prefix)
    }

    pub fn is_postfix_operator(&self) -> bool {
        self.is_operator() && self.fixity == Some(Fixity::Postfix)
    }
}

/// A named value. Functions and operators are bindings too: their body's
/// first term is a `Lambda`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Binding {
    pub name: String,
    pub visibility: Visibility,
    pub meta: BindingMeta,
    /// Declared return-type ascription, when the source carries one.
    pub type_asc: Option<Type>,
    /// Full computed type, filled by the type checker.
    pub type_spec: Option<Type>,
    pub body: Expr,
    pub id: Option<DeclId>,
    pub origin: SourceOrigin,
}

impl Binding {
    /// The binding's lambda when it is function-shaped (the body's first
    /// term is a `Lambda`).
    pub fn lambda(&self) -> Option<&Lambda> {
        match self.body.terms.first() {
            Some(Term::Lambda(lambda)) => Some(lambda),
            _ => None,
        }
    }

    pub fn lambda_mut(&mut self) -> Option<&mut Lambda> {
        match self.body.terms.first_mut() {
            Some(Term::Lambda(lambda)) => Some(lambda),
            _ => None,
        }
    }

    pub fn params(&self) -> &[FnParam] {
        self.lambda().map(|l| l.params.as_slice()).unwrap_or(&[])
    }

    /// Whether the binding is implemented natively (its innermost body is
    /// a `NativeImpl`).
    pub fn is_native(&self) -> bool {
        fn bottoms_out_native(term: &Term) -> bool {
            match term {
                Term::NativeImpl(_) => true,
                Term::Lambda(lambda) => bottoms_out_native(&lambda.body),
                Term::Expr(expr) => expr.terms.iter().any(bottoms_out_native),
                Term::Group(inner) => bottoms_out_native(inner),
                _ => false,
            }
        }
        self.body.terms.iter().any(bottoms_out_native)
    }

    /// The declared return type: the ascription for function-shaped
    /// bindings, otherwise the full ascription.
    pub fn declared_return_type(&self) -> Option<&Type> {
        self.type_asc.as_ref()
    }

    /// The memory effect of the native implementation, when the binding
    /// is native-backed.
    pub fn native_mem_effect(&self) -> Option<crate::ast::MemEffect> {
        fn effect_of(term: &Term) -> Option<crate::ast::MemEffect> {
            match term {
                Term::NativeImpl(native) => native.mem_effect,
                Term::Lambda(lambda) => effect_of(&lambda.body),
                Term::Expr(expr) => expr.terms.iter().find_map(effect_of),
                Term::Group(inner) => effect_of(inner),
                _ => None,
            }
        }
        self.body.terms.iter().find_map(effect_of)
    }
}
