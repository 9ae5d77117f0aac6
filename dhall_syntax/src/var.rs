use crate::expr::{rc, Expr, SubExpr};
use crate::label::Label;

/// A de Bruijn reference: a name and the number of enclosing binders of
/// that same name to skip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct V(pub Label, pub usize);

impl V {
    /// The same reference seen from under one more binder named `x`.
    pub fn under_binder(&self, x: &Label) -> V {
        if &self.0 == x {
            V(self.0.clone(), self.1 + 1)
        } else {
            self.clone()
        }
    }
}

fn add_ui(n: usize, delta: isize) -> usize {
    // Inputs are well-scoped when they reach us, so this cannot go
    // negative; clamp rather than wrap if they are not.
    (n as isize + delta).max(0) as usize
}

/// `shift(delta, V(x, m), e)` adds `delta` to the index of every free
/// occurrence of `x` in `e` whose index is at least `m`.
pub fn shift(delta: isize, var: &V, expr: &SubExpr) -> SubExpr {
    let V(name, min_index) = var;
    match expr.as_ref() {
        Expr::Var(V(x, n)) if x == name && n >= min_index => {
            rc(Expr::Var(V(x.clone(), add_ui(*n, delta))))
        }
        Expr::Var(_) => expr.clone(),
        e => rc(e.map_subexprs_with_binders(
            |sub| shift(delta, var, sub),
            |l, sub| shift(delta, &var.under_binder(l), sub),
        )),
    }
}

/// Capture-avoiding substitution: replace every free occurrence of `var`
/// in `expr` with `value`. Under a binder the target index grows when the
/// names collide, and the replacement is shifted over the bound name.
pub fn subst_shift(var: &V, value: &SubExpr, expr: &SubExpr) -> SubExpr {
    match expr.as_ref() {
        Expr::Var(v) if v == var => value.clone(),
        Expr::Var(_) => expr.clone(),
        e => rc(e.map_subexprs_with_binders(
            |sub| subst_shift(var, value, sub),
            |l, sub| {
                subst_shift(
                    &var.under_binder(l),
                    &shift(1, &V(l.clone(), 0), value),
                    sub,
                )
            },
        )),
    }
}

/// Rename every bound variable to `_`, adjusting indices. Two
/// α-equivalent expressions become structurally identical, which is what
/// the semantic hash and assertion equality rely on.
pub fn alpha_normalize(expr: &SubExpr) -> SubExpr {
    match expr.as_ref() {
        Expr::Lam(x, t, b) => rc(Expr::Lam(
            "_".into(),
            alpha_normalize(t),
            alpha_normalize(&rename_to_underscore(x, b)),
        )),
        Expr::Pi(x, t, b) => rc(Expr::Pi(
            "_".into(),
            alpha_normalize(t),
            alpha_normalize(&rename_to_underscore(x, b)),
        )),
        Expr::Let(x, t, a, b) => rc(Expr::Let(
            "_".into(),
            t.as_ref().map(|t| alpha_normalize(t)),
            alpha_normalize(a),
            alpha_normalize(&rename_to_underscore(x, b)),
        )),
        e => rc(e.map_subexprs_with_binders(
            |sub| alpha_normalize(sub),
            |_, sub| alpha_normalize(sub),
        )),
    }
}

/// Rewrite the body of a binder named `x` as if the binder were named `_`.
fn rename_to_underscore(x: &Label, body: &SubExpr) -> SubExpr {
    if x.as_ref() == "_" {
        return body.clone();
    }
    let x_var = V(x.clone(), 0);
    let under: Label = "_".into();
    let body = shift(1, &V(under.clone(), 0), body);
    let body = subst_shift(&x_var, &rc(Expr::Var(V(under, 0))), &body);
    shift(-1, &x_var, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(x: &str, n: usize) -> SubExpr {
        rc(Expr::Var(V(x.into(), n)))
    }

    fn lam(x: &str, t: SubExpr, b: SubExpr) -> SubExpr {
        rc(Expr::Lam(x.into(), t, b))
    }

    fn nat_type() -> SubExpr {
        Expr::from_builtin(crate::expr::Builtin::Natural)
    }

    #[test]
    fn shift_skips_bound_occurrences() {
        // λ(x : Natural) -> x  has no free `x`
        let e = lam("x", nat_type(), var("x", 0));
        assert_eq!(shift(1, &V("x".into(), 0), &e), e);
    }

    #[test]
    fn shift_moves_free_occurrences() {
        // λ(x : Natural) -> x@1  references an outer `x`
        let e = lam("x", nat_type(), var("x", 1));
        let shifted = lam("x", nat_type(), var("x", 2));
        assert_eq!(shift(1, &V("x".into(), 0), &e), shifted);
    }

    #[test]
    fn shift_is_invertible() {
        let e = lam("x", nat_type(), rc(Expr::App(var("f", 0), var("x", 3))));
        let v = V("x".into(), 0);
        assert_eq!(shift(-1, &v, &shift(1, &v, &e)), e);
    }

    #[test]
    fn subst_avoids_capture() {
        // (λ(y : Natural) -> x)[x := y]  must not capture the bound y
        let e = lam("y", nat_type(), var("x", 0));
        let substituted = subst_shift(&V("x".into(), 0), &var("y", 0), &e);
        assert_eq!(substituted, lam("y", nat_type(), var("y", 1)));
    }

    #[test]
    fn alpha_renames_binders() {
        let e = lam("x", nat_type(), var("x", 0));
        let expected = lam("_", nat_type(), var("_", 0));
        assert_eq!(alpha_normalize(&e), expected);
    }

    #[test]
    fn alpha_keeps_free_variables() {
        // λ(x : Natural) -> _  where `_` is free under one `_`-binder
        let e = lam("x", nat_type(), var("_", 0));
        let expected = lam("_", nat_type(), var("_", 1));
        assert_eq!(alpha_normalize(&e), expected);
    }

    #[test]
    fn alpha_normalize_nested() {
        // λ(a : Natural) -> λ(b : Natural) -> a b
        let e = lam(
            "a",
            nat_type(),
            lam("b", nat_type(), rc(Expr::App(var("a", 0), var("b", 0)))),
        );
        let expected = lam(
            "_",
            nat_type(),
            lam("_", nat_type(), rc(Expr::App(var("_", 1), var("_", 0)))),
        );
        assert_eq!(alpha_normalize(&e), expected);
    }
}
