//! Concrete-syntax projection of a (possibly rewritten) module: prints
//! MML-flavoured source back out of the tree. Operator applications are
//! re-infixed from their `App` spines and let chains re-sugared from
//! `App(Lambda, arg)` shapes. A debugging and tooling aid, not a
//! parser-grade round-trip.

mod context;

pub use self::context::FormatterContext;

use crate::ast::{
    Binding, BindingOrigin, Field, Fixity, Member, Module, Term, TypeAlias, TypeDef, TypeStruct,
};

pub trait Format {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error>;
}

/// Render a whole module.
pub fn format_module(module: &Module) -> Result<String, std::fmt::Error> {
    let mut ctx = FormatterContext::new();
    ctx.write(&format!("module {};\n", module.name))?;

    for member in &module.members {
        // synthesized members are compiler detail, not source
        if member.origin().is_synth() {
            continue;
        }
        ctx.write_newline()?;
        member.format(&mut ctx)?;
        ctx.write_newline()?;
    }

    Ok(ctx.output)
}

impl Format for Member {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        match self {
            Member::Binding(binding) => binding.format(ctx),
            Member::TypeDef(def) => def.format(ctx),
            Member::TypeAlias(alias) => alias.format(ctx),
            Member::TypeStruct(ts) => ts.format(ctx),
            Member::ParsingMemberError(err) => {
                ctx.write(&format!("# parse error: {}", err.message))
            }
            Member::ParsingIdError(err) => {
                ctx.write(&format!("# parse error on '{}': {}", err.name, err.message))
            }
            Member::DuplicateMember(dup) => {
                ctx.write(&format!("# duplicate of '{}'", dup.original_name))
            }
            Member::InvalidMember(invalid) => {
                ctx.write(&format!("# invalid member: {}", invalid.reason))
            }
        }
    }
}

impl Format for TypeDef {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        ctx.write(&format!("type {}", self.name))?;
        if let Some(spec) = &self.spec {
            ctx.write(&format!(" = {spec}"))?;
        }
        ctx.write(";")
    }
}

impl Format for TypeAlias {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        ctx.write(&format!("type {} = {};", self.name, self.referenced))
    }
}

impl Format for TypeStruct {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        ctx.write(&format!("struct {} {{", self.name))?;
        ctx.write_newline()?;
        ctx.with_indent(|ctx| {
            for Field { name, ty, .. } in &self.fields {
                ctx.write_indented_line(&format!("{name}: {ty};"))?;
            }
            Ok(())
        })?;
        ctx.write("}")
    }
}

impl Format for Binding {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        match self.lambda() {
            Some(lambda) => {
                let keyword = match self.meta.origin {
                    BindingOrigin::Operator => "op",
                    _ => "fn",
                };
                ctx.write(&format!("{keyword} {}", self.name))?;
                ctx.write("(")?;
                ctx.write_separated(&lambda.params, ", ", |ctx, param| {
                    if param.consuming {
                        ctx.write("~")?;
                    }
                    ctx.write(&param.name)?;
                    if let Some(ty) = param.ty() {
                        ctx.write(&format!(": {ty}"))?;
                    }
                    Ok(())
                })?;
                ctx.write(")")?;
                if let Some(ret) = &self.type_asc {
                    ctx.write(&format!(": {ret}"))?;
                }
                ctx.write(" = ")?;
                lambda.body.format(ctx)?;
                ctx.write(";")
            }
            None => {
                ctx.write(&format!("let {}", self.name))?;
                if let Some(ty) = &self.type_asc {
                    ctx.write(&format!(": {ty}"))?;
                }
                ctx.write(" = ")?;
                for term in &self.body.terms {
                    term.format(ctx)?;
                }
                ctx.write(";")
            }
        }
    }
}

/// Whether an application spine is an infix operator use.
fn as_operator_spine(term: &Term) -> Option<(&str, Fixity, Vec<&Term>)> {
    let Term::App(_) = term else { return None };
    let (head, args) = term.app_spine();
    let Term::Ref(reference) = head else {
        return None;
    };
    let looks_operator = !reference
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_');
    let word_op = matches!(reference.name.as_str(), "and" | "or" | "not");
    if !looks_operator && !word_op {
        return None;
    }
    let fixity = match args.len() {
        1 => Fixity::Prefix,
        2 => Fixity::Infix,
        _ => return None,
    };
    Some((&reference.name, fixity, args))
}

/// `App(Lambda([x], body), value)` prints as `let x = value; body`.
fn as_let_form(term: &Term) -> Option<(&crate::ast::FnParam, &Term, &Term)> {
    let Term::App(app) = term else { return None };
    let Term::Lambda(lambda) = &app.fun else {
        return None;
    };
    if lambda.params.len() != 1 {
        return None;
    }
    Some((&lambda.params[0], &app.arg, &lambda.body))
}

fn atomic(term: &Term) -> bool {
    matches!(
        term,
        Term::LiteralInt { .. }
            | Term::LiteralFloat { .. }
            | Term::LiteralBool { .. }
            | Term::LiteralString { .. }
            | Term::LiteralUnit { .. }
            | Term::Ref(_)
            | Term::Hole { .. }
            | Term::Placeholder { .. }
            | Term::Tuple { .. }
    )
}

fn format_operand(term: &Term, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
    if atomic(term) {
        term.format(ctx)
    } else {
        ctx.write("(")?;
        term.format(ctx)?;
        ctx.write(")")
    }
}

impl Format for Term {
    fn format(&self, ctx: &mut FormatterContext) -> Result<(), std::fmt::Error> {
        match self {
            Term::LiteralInt { value, .. } => ctx.write(&value.to_string()),
            Term::LiteralFloat { value, .. } => ctx.write(&value.to_string()),
            Term::LiteralBool { value, .. } => ctx.write(&value.to_string()),
            Term::LiteralString { value, .. } => ctx.write(&format!("{value:?}")),
            Term::LiteralUnit { .. } => ctx.write("()"),
            Term::Ref(reference) => {
                if let Some(qualifier) = &reference.qualifier {
                    ctx.write(&format!("{qualifier}.{}", reference.name))
                } else {
                    ctx.write(&reference.name)
                }
            }
            Term::App(_) => {
                if let Some((param, value, body)) = as_let_form(self) {
                    ctx.write(&format!("let {} = ", param.name))?;
                    value.format(ctx)?;
                    ctx.write("; ")?;
                    return body.format(ctx);
                }
                if let Some((name, fixity, args)) = as_operator_spine(self) {
                    return match fixity {
                        Fixity::Prefix => {
                            ctx.write(name)?;
                            ctx.write(" ")?;
                            format_operand(args[0], ctx)
                        }
                        _ => {
                            format_operand(args[0], ctx)?;
                            ctx.write(&format!(" {name} "))?;
                            format_operand(args[1], ctx)
                        }
                    };
                }
                let (head, args) = self.app_spine();
                format_operand(head, ctx)?;
                for arg in args {
                    ctx.write(" ")?;
                    format_operand(arg, ctx)?;
                }
                Ok(())
            }
            Term::Lambda(lambda) => {
                ctx.write("\\")?;
                ctx.write_separated(&lambda.params, ", ", |ctx, param| {
                    ctx.write(&param.name)?;
                    if let Some(ty) = param.ty() {
                        ctx.write(&format!(": {ty}"))?;
                    }
                    Ok(())
                })?;
                ctx.write(" -> ")?;
                lambda.body.format(ctx)
            }
            Term::Cond(cond) => {
                ctx.write("if ")?;
                cond.cond.format(ctx)?;
                ctx.write(" then ")?;
                cond.if_true.format(ctx)?;
                ctx.write(" else ")?;
                cond.if_false.format(ctx)?;
                ctx.write(" end")
            }
            Term::Group(inner) => {
                ctx.write("(")?;
                inner.format(ctx)?;
                ctx.write(")")
            }
            Term::Tuple { elements, .. } => {
                ctx.write("(")?;
                ctx.write_separated(elements, ", ", |ctx, e| e.format(ctx))?;
                ctx.write(")")
            }
            Term::NativeImpl(_) => ctx.write("@native"),
            Term::DataConstructor(ctor) => ctx.write(&format!("@construct {}", ctor.type_ref.name)),
            Term::Hole { .. } => ctx.write("?"),
            Term::Placeholder { .. } => ctx.write("_"),
            Term::Expr(expr) => {
                ctx.write_separated(&expr.terms, " ", |ctx, t| t.format(ctx))
            }
            Term::TermError(err) => ctx.write(&format!("<error: {}>", err.reason)),
        }
    }
}
