use std::collections::BTreeMap;

use super::{functions, ResolutionContext, ScopeId};
use crate::model::{Resolution, Unknown, Value};
use crate::syntax::{Expr, TemplatePart};

/// Evaluate `expr` in `scope`. A collection or template with any unknown
/// part is unknown as a whole.
pub(super) fn evaluate(ctx: &ResolutionContext<'_>, expr: &Expr, scope: ScopeId) -> Resolution {
    match expr {
        Expr::Null => Resolution::Known(Value::Null),
        Expr::Bool(b) => Resolution::Known(Value::Bool(*b)),
        Expr::Number(n) => Resolution::Known(Value::Number(*n)),
        Expr::String(s) => Resolution::Known(Value::String(s.clone())),
        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Literal(s) => out.push_str(s),
                    TemplatePart::Interpolation(inner) => match evaluate(ctx, inner, scope) {
                        Resolution::Known(value) => match value.interpolate() {
                            Some(s) => out.push_str(&s),
                            None => return unsupported(expr),
                        },
                        unknown => return unknown,
                    },
                }
            }
            Resolution::Known(Value::String(out))
        }
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match evaluate(ctx, item, scope) {
                    Resolution::Known(v) => values.push(v),
                    unknown => return unknown,
                }
            }
            Resolution::Known(Value::List(values))
        }
        Expr::Object(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                match evaluate(ctx, value, scope) {
                    Resolution::Known(v) => {
                        map.insert(key.clone(), v);
                    }
                    unknown => return unknown,
                }
            }
            Resolution::Known(Value::Map(map))
        }
        Expr::Reference(reference) => ctx.resolve(reference, scope),
        Expr::FuncCall { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                match evaluate(ctx, arg, scope) {
                    Resolution::Known(v) => values.push(v),
                    unknown => return unknown,
                }
            }
            match functions::call(name, values) {
                Some(value) => Resolution::Known(value),
                None => unsupported(expr),
            }
        }
        Expr::Conditional {
            cond,
            true_expr,
            false_expr,
        } => match evaluate(ctx, cond, scope) {
            Resolution::Known(Value::Bool(true)) => evaluate(ctx, true_expr, scope),
            Resolution::Known(Value::Bool(false)) => evaluate(ctx, false_expr, scope),
            Resolution::Known(_) => unsupported(expr),
            unknown => unknown,
        },
        Expr::Unsupported(_) => unsupported(expr),
    }
}

fn unsupported(expr: &Expr) -> Resolution {
    Resolution::Unknown(Unknown::Unsupported {
        expression: expr.to_string(),
    })
}
