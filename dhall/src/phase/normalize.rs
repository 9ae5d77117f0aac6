//! β-normalization and the builtin δ-rules. Expressions reaching this
//! module are expected to be well-typed; normalization of an ill-typed
//! expression does not fail, it leaves the offending subtree alone.

use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

use dhall_syntax::*;

/// Reduce an expression to its β-normal form.
///
/// `normalize` does not type-check the expression. You may want to
/// type-check expressions before normalizing them since normalization
/// can convert an ill-typed expression into a well-typed expression.
pub fn normalize(expr: &SubExpr) -> SubExpr {
    normalize_ref(expr)
}

/// Judgmental equality: α-equivalence of β-normal forms.
pub fn judgmentally_equal(a: &SubExpr, b: &SubExpr) -> bool {
    alpha_normalize(&normalize(a)) == alpha_normalize(&normalize(b))
}

// Small enum to help with being DRY
enum WhatNext {
    // Recurse on this expression
    Continue(SubExpr),
    // The following expression is the normal form
    Done(SubExpr),
    // The current expression is already in normal form
    DoneAsIs,
}

fn app(f: SubExpr, a: SubExpr) -> SubExpr {
    rc(Expr::App(f, a))
}

fn app_chain(
    f: SubExpr,
    args: impl IntoIterator<Item = SubExpr>,
) -> SubExpr {
    args.into_iter().fold(f, app)
}

/// β-reduce one application of a lambda.
fn beta_reduce(x: &Label, body: &SubExpr, arg: &SubExpr) -> SubExpr {
    let v = V(x.clone(), 0);
    let arg = shift(1, &v, arg);
    let body = subst_shift(&v, &arg, body);
    shift(-1, &v, &body)
}

fn app_spine(expr: &SubExpr) -> (&SubExpr, Vec<&SubExpr>) {
    let mut args = Vec::new();
    let mut f = expr;
    while let Expr::App(g, a) = f.as_ref() {
        args.push(a);
        f = g;
    }
    args.reverse();
    (f, args)
}

fn normalize_ref(expr: &SubExpr) -> SubExpr {
    use WhatNext::*;

    // Recursively normalize all subexpressions
    let expr: Expr = expr.as_ref().map_subexprs_with_binders(
        |e| normalize_ref(e),
        |_, e| normalize_ref(e),
    );

    let what_next = match &expr {
        Expr::Let(x, _, a, b) => Continue(beta_reduce(x, b, a)),
        Expr::Annot(x, _) => Done(x.clone()),
        Expr::App(_, _) => {
            // The spine is fully normalized; try to consume it
            let whole = rc(expr.clone());
            let (f, args) = app_spine(&whole);
            match f.as_ref() {
                Expr::Lam(x, _, b) => {
                    let reduced = beta_reduce(x, b, args[0]);
                    Continue(app_chain(
                        reduced,
                        args[1..].iter().map(|a| (*a).clone()),
                    ))
                }
                Expr::Builtin(b) => apply_builtin(*b, &args),
                // Saturating a union constructor builds the union value
                Expr::Field(u, k) => match u.as_ref() {
                    Expr::UnionType(kts) if kts.contains_key(k) => {
                        let mut alts = kts.clone();
                        alts.remove(k);
                        let lit = rc(Expr::UnionLit(
                            k.clone(),
                            Some(args[0].clone()),
                            alts,
                        ));
                        Continue(app_chain(
                            lit,
                            args[1..].iter().map(|a| (*a).clone()),
                        ))
                    }
                    _ => DoneAsIs,
                },
                _ => DoneAsIs,
            }
        }
        Expr::BoolIf(p, t, e) => normalize_if(p, t, e),
        Expr::BinOp(op, l, r) => normalize_binop(*op, l, r),
        Expr::TextLit(t) => normalize_text(t),
        Expr::Merge(record, input, _) => normalize_merge(record, input),
        Expr::ToMap(record, annot) => normalize_tomap(record, annot),
        Expr::Field(r, x) => normalize_field(r, x),
        Expr::Projection(_, ls) if ls.is_empty() => {
            Done(rc(Expr::RecordLit(BTreeMap::new())))
        }
        Expr::Projection(r, ls) => match r.as_ref() {
            Expr::RecordLit(kvs) => Done(rc(Expr::RecordLit(
                ls.iter()
                    .filter_map(|l| {
                        kvs.get(l).map(|v| (l.clone(), v.clone()))
                    })
                    .collect(),
            ))),
            _ => {
                // Canonical form: selectors sorted and deduplicated
                let mut sorted = ls.clone();
                sorted.sort();
                sorted.dedup();
                if &sorted == ls {
                    DoneAsIs
                } else {
                    Done(rc(Expr::Projection(r.clone(), sorted)))
                }
            }
        },
        Expr::ProjectionByExpr(r, t) => match t.as_ref() {
            Expr::RecordType(kts) => Continue(rc(Expr::Projection(
                r.clone(),
                kts.keys().cloned().collect(),
            ))),
            _ => DoneAsIs,
        },
        _ => DoneAsIs,
    };

    match what_next {
        Continue(e) => normalize_ref(&e),
        Done(e) => e,
        DoneAsIs => rc(expr),
    }
}

fn normalize_if(p: &SubExpr, t: &SubExpr, e: &SubExpr) -> WhatNext {
    use WhatNext::*;
    match p.as_ref() {
        Expr::BoolLit(true) => return Done(t.clone()),
        Expr::BoolLit(false) => return Done(e.clone()),
        _ => {}
    }
    match (t.as_ref(), e.as_ref()) {
        (Expr::BoolLit(true), Expr::BoolLit(false)) => Done(p.clone()),
        _ if alpha_normalize(t) == alpha_normalize(e) => Done(t.clone()),
        _ => DoneAsIs,
    }
}

/// Merge two record maps, resolving collisions with `combine`.
fn merge_maps<T: Clone>(
    map1: &BTreeMap<Label, T>,
    map2: &BTreeMap<Label, T>,
    combine: impl Fn(&T, &T) -> T,
) -> BTreeMap<Label, T> {
    let mut out = map1.clone();
    for (k, v2) in map2 {
        let v = match map1.get(k) {
            Some(v1) => combine(v1, v2),
            None => v2.clone(),
        };
        out.insert(k.clone(), v);
    }
    out
}

fn normalize_binop(op: BinOp, l: &SubExpr, r: &SubExpr) -> WhatNext {
    use self::BinOp::*;
    use Expr::*;
    use WhatNext::*;
    match (op, l.as_ref(), r.as_ref()) {
        (BoolAnd, BoolLit(true), _) => Done(r.clone()),
        (BoolAnd, _, BoolLit(true)) => Done(l.clone()),
        (BoolAnd, BoolLit(false), _) => Done(rc(BoolLit(false))),
        (BoolAnd, _, BoolLit(false)) => Done(rc(BoolLit(false))),
        (BoolOr, BoolLit(false), _) => Done(r.clone()),
        (BoolOr, _, BoolLit(false)) => Done(l.clone()),
        (BoolOr, BoolLit(true), _) => Done(rc(BoolLit(true))),
        (BoolOr, _, BoolLit(true)) => Done(rc(BoolLit(true))),
        (BoolEQ, BoolLit(x), BoolLit(y)) => Done(rc(BoolLit(x == y))),
        (BoolEQ, BoolLit(true), _) => Done(r.clone()),
        (BoolEQ, _, BoolLit(true)) => Done(l.clone()),
        (BoolNE, BoolLit(x), BoolLit(y)) => Done(rc(BoolLit(x != y))),
        (BoolNE, BoolLit(false), _) => Done(r.clone()),
        (BoolNE, _, BoolLit(false)) => Done(l.clone()),
        (NaturalPlus, NaturalLit(x), NaturalLit(y)) => {
            Done(rc(NaturalLit(x + y)))
        }
        (NaturalPlus, NaturalLit(x), _) if x.is_zero() => Done(r.clone()),
        (NaturalPlus, _, NaturalLit(y)) if y.is_zero() => Done(l.clone()),
        (NaturalTimes, NaturalLit(x), NaturalLit(y)) => {
            Done(rc(NaturalLit(x * y)))
        }
        (NaturalTimes, NaturalLit(x), _) if x.is_zero() => Done(l.clone()),
        (NaturalTimes, _, NaturalLit(y)) if y.is_zero() => Done(r.clone()),
        (NaturalTimes, NaturalLit(x), _) if *x == BigUint::from(1u8) => {
            Done(r.clone())
        }
        (NaturalTimes, _, NaturalLit(y)) if *y == BigUint::from(1u8) => {
            Done(l.clone())
        }
        (TextAppend, TextLit(x), TextLit(y)) => {
            let mut out = x.clone();
            out.append(y);
            Continue(rc(TextLit(out)))
        }
        (TextAppend, TextLit(x), _) if x.as_plain_text() == Some("") => {
            Done(r.clone())
        }
        (TextAppend, _, TextLit(y)) if y.as_plain_text() == Some("") => {
            Done(l.clone())
        }
        (ListAppend, EmptyListLit(_), _) => Done(r.clone()),
        (ListAppend, _, EmptyListLit(_)) => Done(l.clone()),
        (ListAppend, NEListLit(xs), NEListLit(ys)) => {
            let elems = xs.iter().chain(ys.iter()).cloned().collect();
            Done(rc(NEListLit(elems)))
        }
        (RecursiveRecordMerge, RecordLit(kvs), _) if kvs.is_empty() => {
            Done(r.clone())
        }
        (RecursiveRecordMerge, _, RecordLit(kvs)) if kvs.is_empty() => {
            Done(l.clone())
        }
        (RecursiveRecordMerge, RecordLit(kvs1), RecordLit(kvs2)) => {
            let merged = merge_maps(kvs1, kvs2, |v1, v2| {
                rc(BinOp(RecursiveRecordMerge, v1.clone(), v2.clone()))
            });
            Continue(rc(RecordLit(merged)))
        }
        (RightBiasedRecordMerge, RecordLit(kvs), _) if kvs.is_empty() => {
            Done(r.clone())
        }
        (RightBiasedRecordMerge, _, RecordLit(kvs)) if kvs.is_empty() => {
            Done(l.clone())
        }
        (RightBiasedRecordMerge, RecordLit(kvs1), RecordLit(kvs2)) => {
            let merged = merge_maps(kvs1, kvs2, |_, v2| v2.clone());
            Done(rc(RecordLit(merged)))
        }
        (RecursiveRecordTypeMerge, RecordType(kts), _) if kts.is_empty() => {
            Done(r.clone())
        }
        (RecursiveRecordTypeMerge, _, RecordType(kts)) if kts.is_empty() => {
            Done(l.clone())
        }
        (RecursiveRecordTypeMerge, RecordType(kts1), RecordType(kts2)) => {
            let merged = merge_maps(kts1, kts2, |t1, t2| {
                rc(BinOp(RecursiveRecordTypeMerge, t1.clone(), t2.clone()))
            });
            Continue(rc(RecordType(merged)))
        }
        // After resolution only the left operand remains relevant
        (ImportAlt, _, _) => Done(l.clone()),
        _ => DoneAsIs,
    }
}

fn normalize_text(t: &InterpolatedText) -> WhatNext {
    use WhatNext::*;
    // Splice the chunks of any interpolated literal into this one
    let mut out = InterpolatedText::from(String::new());
    for chunk in t.iter() {
        match chunk {
            InterpolatedTextContents::Text(s) => out.push_text(s),
            InterpolatedTextContents::Expr(e) => match e.as_ref() {
                Expr::TextLit(inner) => out.append(inner),
                _ => out.push_expr(e.clone()),
            },
        }
    }
    if let Some(e) = out.as_single_expr() {
        Done(e.clone())
    } else {
        Done(rc(Expr::TextLit(out)))
    }
}

fn normalize_merge(record: &SubExpr, input: &SubExpr) -> WhatNext {
    use WhatNext::*;
    let handlers = match record.as_ref() {
        Expr::RecordLit(kvs) => kvs,
        _ => return DoneAsIs,
    };
    match input.as_ref() {
        Expr::UnionLit(k, v, _) => match (handlers.get(k), v) {
            (Some(h), Some(v)) => Continue(app(h.clone(), v.clone())),
            (Some(h), None) => Done(h.clone()),
            (None, _) => DoneAsIs,
        },
        // A payload-less alternative is its constructor selection
        Expr::Field(u, k) => match u.as_ref() {
            Expr::UnionType(_) => match handlers.get(k) {
                Some(h) => Done(h.clone()),
                None => DoneAsIs,
            },
            _ => DoneAsIs,
        },
        _ => DoneAsIs,
    }
}

fn normalize_tomap(record: &SubExpr, annot: &Option<SubExpr>) -> WhatNext {
    use WhatNext::*;
    let kvs = match record.as_ref() {
        Expr::RecordLit(kvs) => kvs,
        _ => return DoneAsIs,
    };
    if kvs.is_empty() {
        // `toMap {=} : List { mapKey : Text, mapValue : T }`
        let elem = match annot.as_ref().map(|t| app_spine(t)) {
            Some((f, args))
                if f.as_ref() == &Expr::Builtin(Builtin::List)
                    && args.len() == 1 =>
            {
                args[0].clone()
            }
            _ => return DoneAsIs,
        };
        return Done(rc(Expr::EmptyListLit(elem)));
    }
    let entries = kvs
        .iter()
        .map(|(k, v)| {
            let mut entry = BTreeMap::new();
            entry.insert(
                Label::from("mapKey"),
                rc(Expr::TextLit(k.as_ref().into())),
            );
            entry.insert(Label::from("mapValue"), v.clone());
            rc(Expr::RecordLit(entry))
        })
        .collect();
    Done(rc(Expr::NEListLit(entries)))
}

fn normalize_field(r: &SubExpr, x: &Label) -> WhatNext {
    use WhatNext::*;
    match r.as_ref() {
        Expr::RecordLit(kvs) => match kvs.get(x) {
            Some(v) => Done(v.clone()),
            None => DoneAsIs,
        },
        // Push the selection through record merges when one side decides
        Expr::BinOp(BinOp::RightBiasedRecordMerge, l, rr) => {
            match rr.as_ref() {
                Expr::RecordLit(kvs) => match kvs.get(x) {
                    Some(v) => Done(v.clone()),
                    None => Continue(rc(Expr::Field(l.clone(), x.clone()))),
                },
                _ => DoneAsIs,
            }
        }
        Expr::BinOp(BinOp::RecursiveRecordMerge, l, rr) => {
            match (l.as_ref(), rr.as_ref()) {
                (Expr::RecordLit(kvs), _) if !kvs.contains_key(x) => {
                    Continue(rc(Expr::Field(rr.clone(), x.clone())))
                }
                (_, Expr::RecordLit(kvs)) if !kvs.contains_key(x) => {
                    Continue(rc(Expr::Field(l.clone(), x.clone())))
                }
                _ => DoneAsIs,
            }
        }
        _ => DoneAsIs,
    }
}

fn apply_builtin(b: Builtin, args: &[&SubExpr]) -> WhatNext {
    use self::Builtin::*;
    use Expr::*;
    use WhatNext::*;

    let text = |s: String| rc(TextLit(s.into()));
    let two = BigUint::from(2u8);

    let (ret, rest): (SubExpr, &[&SubExpr]) = match (b, args) {
        (OptionalNone, [t, rest @ ..]) => {
            (rc(EmptyOptionalLit((*t).clone())), rest)
        }
        (NaturalIsZero, [n, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => (rc(BoolLit(n.is_zero())), rest),
            _ => return DoneAsIs,
        },
        (NaturalEven, [n, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => (rc(BoolLit((n % &two).is_zero())), rest),
            _ => return DoneAsIs,
        },
        (NaturalOdd, [n, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => (rc(BoolLit(!(n % &two).is_zero())), rest),
            _ => return DoneAsIs,
        },
        (NaturalToInteger, [n, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => (rc(IntegerLit(BigInt::from(n.clone()))), rest),
            _ => return DoneAsIs,
        },
        (NaturalShow, [n, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => (text(n.to_string()), rest),
            _ => return DoneAsIs,
        },
        (NaturalSubtract, [x, y, rest @ ..]) => {
            match (x.as_ref(), y.as_ref()) {
                (NaturalLit(x), NaturalLit(y)) => {
                    let difference = if y > x {
                        y - x
                    } else {
                        BigUint::zero()
                    };
                    (rc(NaturalLit(difference)), rest)
                }
                (NaturalLit(x), _) if x.is_zero() => ((*y).clone(), rest),
                (_, NaturalLit(y)) if y.is_zero() => {
                    (rc(NaturalLit(BigUint::zero())), rest)
                }
                _ => return DoneAsIs,
            }
        }
        (NaturalFold, [n, _t, succ, zero, rest @ ..]) => match n.as_ref() {
            NaturalLit(n) => {
                let mut acc = (*zero).clone();
                let mut remaining = n.clone();
                let one = BigUint::from(1u8);
                while !remaining.is_zero() {
                    acc = app((*succ).clone(), acc);
                    remaining = &remaining - &one;
                }
                (acc, rest)
            }
            _ => return DoneAsIs,
        },
        (NaturalBuild, [g, rest @ ..]) => {
            // fold/build fusion: Natural/build (Natural/fold n ...) = n ...
            let (f, inner) = app_spine(g);
            if let (Builtin(NaturalFold), [x, inner_rest @ ..]) =
                (f.as_ref(), inner.as_slice())
            {
                let fused = app_chain(
                    (*x).clone(),
                    inner_rest.iter().map(|a| (*a).clone()),
                );
                (fused, rest)
            } else {
                let succ = rc(Lam(
                    "x".into(),
                    Expr::from_builtin(Natural),
                    rc(BinOp(
                        dhall_syntax::BinOp::NaturalPlus,
                        rc(Var(V("x".into(), 0))),
                        rc(NaturalLit(BigUint::from(1u8))),
                    )),
                ));
                let applied = app_chain(
                    (*g).clone(),
                    vec![
                        Expr::from_builtin(Natural),
                        succ,
                        rc(NaturalLit(BigUint::zero())),
                    ],
                );
                (applied, rest)
            }
        }
        (IntegerShow, [n, rest @ ..]) => match n.as_ref() {
            IntegerLit(n) => {
                let sign = if n.sign() == num_bigint::Sign::Minus {
                    ""
                } else {
                    "+"
                };
                (text(format!("{}{}", sign, n)), rest)
            }
            _ => return DoneAsIs,
        },
        (IntegerToDouble, [n, rest @ ..]) => match n.as_ref() {
            IntegerLit(n) => {
                use num_traits::ToPrimitive;
                let d = n.to_f64().unwrap_or(f64::NAN);
                (rc(DoubleLit(d.into())), rest)
            }
            _ => return DoneAsIs,
        },
        (DoubleShow, [d, rest @ ..]) => match d.as_ref() {
            DoubleLit(d) => (text(d.to_string()), rest),
            _ => return DoneAsIs,
        },
        (TextShow, [t, rest @ ..]) => match t.as_ref() {
            TextLit(txt) => match txt.as_plain_text() {
                Some(s) => (text(text_show(s)), rest),
                None => return DoneAsIs,
            },
            _ => return DoneAsIs,
        },
        (ListLength, [_, l, rest @ ..]) => match l.as_ref() {
            EmptyListLit(_) => (rc(NaturalLit(BigUint::zero())), rest),
            NEListLit(xs) => (rc(NaturalLit(BigUint::from(xs.len()))), rest),
            _ => return DoneAsIs,
        },
        (ListHead, [_, l, rest @ ..]) => match l.as_ref() {
            EmptyListLit(t) => (rc(EmptyOptionalLit(t.clone())), rest),
            NEListLit(xs) => {
                (rc(SomeLit(xs.first().cloned().unwrap())), rest)
            }
            _ => return DoneAsIs,
        },
        (ListLast, [_, l, rest @ ..]) => match l.as_ref() {
            EmptyListLit(t) => (rc(EmptyOptionalLit(t.clone())), rest),
            NEListLit(xs) => (rc(SomeLit(xs.last().cloned().unwrap())), rest),
            _ => return DoneAsIs,
        },
        (ListReverse, [_, l, rest @ ..]) => match l.as_ref() {
            EmptyListLit(t) => (rc(EmptyListLit(t.clone())), rest),
            NEListLit(xs) => {
                (rc(NEListLit(xs.iter().rev().cloned().collect())), rest)
            }
            _ => return DoneAsIs,
        },
        (ListIndexed, [_t, l, rest @ ..]) => {
            let entry_type = |t: &SubExpr| {
                let mut kts = BTreeMap::new();
                kts.insert(
                    Label::from("index"),
                    Expr::from_builtin(Natural),
                );
                kts.insert(Label::from("value"), t.clone());
                rc(RecordType(kts))
            };
            match l.as_ref() {
                EmptyListLit(t) => (rc(EmptyListLit(entry_type(t))), rest),
                NEListLit(xs) => {
                    let xs = xs
                        .iter()
                        .enumerate()
                        .map(|(i, e)| {
                            let mut kvs = BTreeMap::new();
                            kvs.insert(
                                Label::from("index"),
                                rc(NaturalLit(BigUint::from(i))),
                            );
                            kvs.insert(Label::from("value"), e.clone());
                            rc(RecordLit(kvs))
                        })
                        .collect();
                    (rc(NEListLit(xs)), rest)
                }
                _ => return DoneAsIs,
            }
        }
        (ListFold, [_, l, _, cons, nil, rest @ ..]) => match l.as_ref() {
            EmptyListLit(_) => ((*nil).clone(), rest),
            NEListLit(xs) => {
                let folded = xs.iter().rev().fold(
                    (*nil).clone(),
                    |acc, x| app(app((*cons).clone(), x.clone()), acc),
                );
                (folded, rest)
            }
            _ => return DoneAsIs,
        },
        (ListBuild, [a0, g, rest @ ..]) => {
            // fold/build fusion: List/build a (List/fold a xs) = xs
            let (f, inner) = app_spine(g);
            if let (Builtin(ListFold), [_, x, inner_rest @ ..]) =
                (f.as_ref(), inner.as_slice())
            {
                let fused = app_chain(
                    (*x).clone(),
                    inner_rest.iter().map(|a| (*a).clone()),
                );
                (fused, rest)
            } else {
                let a1 = shift(1, &V("x".into(), 0), a0);
                let list_a0 =
                    app(Expr::from_builtin(List), (*a0).clone());
                let list_a1 = app(Expr::from_builtin(List), a1);
                // λ(x : a0) -> λ(xs : List a1) -> [x] # xs
                let cons = rc(Lam(
                    "x".into(),
                    (*a0).clone(),
                    rc(Lam(
                        "xs".into(),
                        list_a1,
                        rc(BinOp(
                            dhall_syntax::BinOp::ListAppend,
                            rc(NEListLit(vec![rc(Var(V("x".into(), 0)))])),
                            rc(Var(V("xs".into(), 0))),
                        )),
                    )),
                ));
                let nil = rc(EmptyListLit((*a0).clone()));
                let applied = app_chain(
                    (*g).clone(),
                    vec![list_a0, cons, nil],
                );
                (applied, rest)
            }
        }
        (OptionalFold, [_, o, _, just, nothing, rest @ ..]) => {
            match o.as_ref() {
                SomeLit(x) => (app((*just).clone(), x.clone()), rest),
                EmptyOptionalLit(_) => ((*nothing).clone(), rest),
                _ => return DoneAsIs,
            }
        }
        (OptionalBuild, [a0, g, rest @ ..]) => {
            // fold/build fusion: Optional/build a (Optional/fold a ox) = ox
            let (f, inner) = app_spine(g);
            if let (Builtin(OptionalFold), [_, x, inner_rest @ ..]) =
                (f.as_ref(), inner.as_slice())
            {
                let fused = app_chain(
                    (*x).clone(),
                    inner_rest.iter().map(|a| (*a).clone()),
                );
                (fused, rest)
            } else {
                let optional_a0 =
                    app(Expr::from_builtin(Optional), (*a0).clone());
                // λ(x : a0) -> Some x
                let just = rc(Lam(
                    "x".into(),
                    (*a0).clone(),
                    rc(SomeLit(rc(Var(V("x".into(), 0))))),
                ));
                let nothing = rc(EmptyOptionalLit((*a0).clone()));
                let applied = app_chain(
                    (*g).clone(),
                    vec![optional_a0, just, nothing],
                );
                (applied, rest)
            }
        }
        _ => return DoneAsIs,
    };
    // Put the remaining arguments back and evaluate again. In most cases
    // there are none and this just returns `ret`.
    Continue(app_chain(ret, rest.iter().map(|a| (*a).clone())))
}

/// The `Text/show` escaping: the result is a quoted literal that would
/// parse back to the input.
fn text_show(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\u0024"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn nat(n: u64) -> SubExpr {
        rc(Expr::NaturalLit(BigUint::from(n)))
    }

    fn var(x: &str, n: usize) -> SubExpr {
        rc(Expr::Var(V(x.into(), n)))
    }

    fn lam(x: &str, t: SubExpr, b: SubExpr) -> SubExpr {
        rc(Expr::Lam(x.into(), t, b))
    }

    fn binop(op: BinOp, l: SubExpr, r: SubExpr) -> SubExpr {
        rc(Expr::BinOp(op, l, r))
    }

    fn natural() -> SubExpr {
        Expr::from_builtin(Builtin::Natural)
    }

    fn builtin(b: Builtin) -> SubExpr {
        Expr::from_builtin(b)
    }

    #[test]
    fn one_plus_one() {
        let e = binop(BinOp::NaturalPlus, nat(1), nat(1));
        assert_eq!(normalize(&e), nat(2));
    }

    #[test]
    fn beta_reduction() {
        // (λ(x : Natural) -> x + 1) 1
        let f = lam(
            "x",
            natural(),
            binop(BinOp::NaturalPlus, var("x", 0), nat(1)),
        );
        assert_eq!(normalize(&app(f.clone(), nat(1))), nat(2));
        // the unapplied lambda is already normal
        assert_eq!(normalize(&f), f);
    }

    #[test]
    fn list_concatenation() {
        let e = binop(
            BinOp::ListAppend,
            rc(Expr::NEListLit(vec![nat(1), nat(2)])),
            rc(Expr::NEListLit(vec![nat(3)])),
        );
        assert_eq!(
            normalize(&e),
            rc(Expr::NEListLit(vec![nat(1), nat(2), nat(3)]))
        );
    }

    #[test]
    fn merge_applies_the_matching_handler() {
        let mut handlers = std::collections::BTreeMap::new();
        handlers.insert(Label::from("Left"), lam("x", natural(), var("x", 0)));
        handlers.insert(
            Label::from("Right"),
            lam("t", builtin(Builtin::Text), nat(0)),
        );
        let mut alts = std::collections::BTreeMap::new();
        alts.insert(Label::from("Left"), Some(natural()));
        alts.insert(Label::from("Right"), Some(builtin(Builtin::Text)));
        let union_type = rc(Expr::UnionType(alts));
        // < Left : Natural | Right : Text >.Left 5
        let input =
            app(rc(Expr::Field(union_type, "Left".into())), nat(5));
        let e = rc(Expr::Merge(rc(Expr::RecordLit(handlers)), input, None));
        assert_eq!(normalize(&e), nat(5));
    }

    #[test]
    fn merge_payload_free_alternative() {
        let mut handlers = std::collections::BTreeMap::new();
        handlers.insert(Label::from("Nothing"), nat(42));
        let mut alts = std::collections::BTreeMap::new();
        alts.insert(Label::from("Nothing"), None);
        let input =
            rc(Expr::Field(rc(Expr::UnionType(alts)), "Nothing".into()));
        let e = rc(Expr::Merge(rc(Expr::RecordLit(handlers)), input, None));
        assert_eq!(normalize(&e), nat(42));
    }

    #[test]
    fn let_is_beta_reduction() {
        // let x = 1 in x + x
        let e = rc(Expr::Let(
            "x".into(),
            None,
            nat(1),
            binop(BinOp::NaturalPlus, var("x", 0), var("x", 0)),
        ));
        assert_eq!(normalize(&e), nat(2));
    }

    #[test]
    fn if_reductions() {
        let e = rc(Expr::BoolIf(
            rc(Expr::BoolLit(true)),
            nat(1),
            nat(2),
        ));
        assert_eq!(normalize(&e), nat(1));
        // if p then True else False  ->  p
        let e = rc(Expr::BoolIf(
            var("p", 0),
            rc(Expr::BoolLit(true)),
            rc(Expr::BoolLit(false)),
        ));
        assert_eq!(normalize(&e), var("p", 0));
        // both branches identical
        let e = rc(Expr::BoolIf(var("p", 0), nat(7), nat(7)));
        assert_eq!(normalize(&e), nat(7));
    }

    #[test]
    fn operator_identities() {
        let x = var("x", 0);
        let cases = vec![
            (binop(BinOp::NaturalPlus, nat(0), x.clone()), x.clone()),
            (binop(BinOp::NaturalPlus, x.clone(), nat(0)), x.clone()),
            (binop(BinOp::NaturalTimes, nat(1), x.clone()), x.clone()),
            (binop(BinOp::NaturalTimes, nat(0), x.clone()), nat(0)),
            (
                binop(BinOp::BoolAnd, rc(Expr::BoolLit(true)), x.clone()),
                x.clone(),
            ),
            (
                binop(BinOp::BoolAnd, rc(Expr::BoolLit(false)), x.clone()),
                rc(Expr::BoolLit(false)),
            ),
            (
                binop(BinOp::BoolOr, rc(Expr::BoolLit(false)), x.clone()),
                x.clone(),
            ),
            (
                binop(
                    BinOp::TextAppend,
                    rc(Expr::TextLit("".into())),
                    x.clone(),
                ),
                x.clone(),
            ),
            (binop(BinOp::ImportAlt, nat(1), nat(2)), nat(1)),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(&input), expected);
        }
    }

    #[test]
    fn record_merges() {
        let mk = |pairs: Vec<(&str, SubExpr)>| {
            rc(Expr::RecordLit(
                pairs
                    .into_iter()
                    .map(|(k, v)| (Label::from(k), v))
                    .collect(),
            ))
        };
        let l = mk(vec![("a", nat(1)), ("c", mk(vec![("x", nat(2))]))]);
        let r = mk(vec![("b", nat(3)), ("c", mk(vec![("y", nat(4))]))]);

        let deep = normalize(&binop(
            BinOp::RecursiveRecordMerge,
            l.clone(),
            r.clone(),
        ));
        let expected = mk(vec![
            ("a", nat(1)),
            ("b", nat(3)),
            ("c", mk(vec![("x", nat(2)), ("y", nat(4))])),
        ]);
        assert_eq!(deep, expected);

        let shallow = normalize(&binop(
            BinOp::RightBiasedRecordMerge,
            l,
            mk(vec![("a", nat(9))]),
        ));
        let expected = mk(vec![
            ("a", nat(9)),
            ("c", mk(vec![("x", nat(2))])),
        ]);
        assert_eq!(shallow, expected);
    }

    #[test]
    fn selection_and_projection() {
        let mut kvs = std::collections::BTreeMap::new();
        kvs.insert(Label::from("a"), nat(1));
        kvs.insert(Label::from("b"), nat(2));
        let record = rc(Expr::RecordLit(kvs.clone()));

        let e = rc(Expr::Field(record.clone(), "b".into()));
        assert_eq!(normalize(&e), nat(2));

        let e = rc(Expr::Projection(record.clone(), vec!["a".into()]));
        let mut expected = std::collections::BTreeMap::new();
        expected.insert(Label::from("a"), nat(1));
        assert_eq!(normalize(&e), rc(Expr::RecordLit(expected)));

        let e = rc(Expr::Projection(record.clone(), vec![]));
        assert_eq!(normalize(&e), rc(Expr::RecordLit(Default::default())));

        // projection through a record type
        let mut kts = std::collections::BTreeMap::new();
        kts.insert(Label::from("b"), natural());
        let e = rc(Expr::ProjectionByExpr(
            record,
            rc(Expr::RecordType(kts)),
        ));
        let mut expected = std::collections::BTreeMap::new();
        expected.insert(Label::from("b"), nat(2));
        assert_eq!(normalize(&e), rc(Expr::RecordLit(expected)));
    }

    #[test]
    fn selection_reaches_through_merges() {
        let mut kvs = std::collections::BTreeMap::new();
        kvs.insert(Label::from("a"), nat(1));
        let known = rc(Expr::RecordLit(kvs));
        // (r ⫽ { a = 1 }).a  ->  1
        let e = rc(Expr::Field(
            binop(BinOp::RightBiasedRecordMerge, var("r", 0), known.clone()),
            "a".into(),
        ));
        assert_eq!(normalize(&e), nat(1));
        // (r ⫽ { a = 1 }).b  ->  r.b
        let e = rc(Expr::Field(
            binop(BinOp::RightBiasedRecordMerge, var("r", 0), known),
            "b".into(),
        ));
        assert_eq!(normalize(&e), rc(Expr::Field(var("r", 0), "b".into())));
    }

    #[test]
    fn tomap_of_a_literal_record() {
        let mut kvs = std::collections::BTreeMap::new();
        kvs.insert(Label::from("b"), nat(2));
        kvs.insert(Label::from("a"), nat(1));
        let e = rc(Expr::ToMap(rc(Expr::RecordLit(kvs)), None));
        let entry = |k: &str, v: SubExpr| {
            let mut kvs = std::collections::BTreeMap::new();
            kvs.insert(Label::from("mapKey"), rc(Expr::TextLit(k.into())));
            kvs.insert(Label::from("mapValue"), v);
            rc(Expr::RecordLit(kvs))
        };
        // entries come out in key order
        assert_eq!(
            normalize(&e),
            rc(Expr::NEListLit(vec![
                entry("a", nat(1)),
                entry("b", nat(2))
            ]))
        );
    }

    #[test]
    fn text_interpolation_flattens() {
        let mut inner = InterpolatedText::from("b");
        inner.push_expr(var("x", 0));
        let mut outer = InterpolatedText::from("a");
        outer.push_expr(rc(Expr::TextLit(inner)));
        outer.push_text("c");

        let mut expected = InterpolatedText::from("ab");
        expected.push_expr(var("x", 0));
        expected.push_text("c");
        assert_eq!(
            normalize(&rc(Expr::TextLit(outer))),
            rc(Expr::TextLit(expected))
        );

        // "${e}" collapses to e
        let mut single = InterpolatedText::from("");
        single.push_expr(var("x", 0));
        assert_eq!(normalize(&rc(Expr::TextLit(single))), var("x", 0));
    }

    #[test]
    fn natural_builtins() {
        let cases: Vec<(SubExpr, SubExpr)> = vec![
            (
                app(builtin(Builtin::NaturalIsZero), nat(0)),
                rc(Expr::BoolLit(true)),
            ),
            (
                app(builtin(Builtin::NaturalEven), nat(3)),
                rc(Expr::BoolLit(false)),
            ),
            (
                app(builtin(Builtin::NaturalOdd), nat(3)),
                rc(Expr::BoolLit(true)),
            ),
            (
                app(builtin(Builtin::NaturalShow), nat(42)),
                rc(Expr::TextLit("42".into())),
            ),
            (
                app(builtin(Builtin::NaturalToInteger), nat(2)),
                rc(Expr::IntegerLit(BigInt::from(2))),
            ),
            (
                app(
                    app(builtin(Builtin::NaturalSubtract), nat(2)),
                    nat(5),
                ),
                nat(3),
            ),
            (
                app(
                    app(builtin(Builtin::NaturalSubtract), nat(5)),
                    nat(2),
                ),
                nat(0),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(&input), expected);
        }
    }

    #[test]
    fn natural_fold_is_iteration() {
        // Natural/fold 3 Natural (λ(x : Natural) -> x + 2) 1 = 7
        let e = app_chain(
            builtin(Builtin::NaturalFold),
            vec![
                nat(3),
                natural(),
                lam(
                    "x",
                    natural(),
                    binop(BinOp::NaturalPlus, var("x", 0), nat(2)),
                ),
                nat(1),
            ],
        );
        assert_eq!(normalize(&e), nat(7));
    }

    #[test]
    fn natural_build_implementation() {
        // Natural/build (λ(natural : Type) -> λ(succ : natural -> natural)
        //   -> λ(zero : natural) -> succ (succ zero)) = 2
        let g = lam(
            "natural",
            rc(Expr::Const(Const::Type)),
            lam(
                "succ",
                rc(Expr::Pi(
                    "_".into(),
                    var("natural", 0),
                    var("natural", 0),
                )),
                lam(
                    "zero",
                    var("natural", 0),
                    app(var("succ", 0), app(var("succ", 0), var("zero", 0))),
                ),
            ),
        );
        let e = app(builtin(Builtin::NaturalBuild), g);
        assert_eq!(normalize(&e), nat(2));
    }

    #[test]
    fn fold_build_fusion() {
        // Natural/build (Natural/fold n) = n
        let e = app(
            builtin(Builtin::NaturalBuild),
            app(builtin(Builtin::NaturalFold), nat(5)),
        );
        assert_eq!(normalize(&e), nat(5));

        // List/build a (List/fold a xs) = xs
        let xs = rc(Expr::NEListLit(vec![nat(1), nat(2)]));
        let e = app(
            app(builtin(Builtin::ListBuild), natural()),
            app(app(builtin(Builtin::ListFold), natural()), xs.clone()),
        );
        assert_eq!(normalize(&e), xs);

        // Optional/build a (Optional/fold a ox) = ox
        let ox = rc(Expr::SomeLit(nat(1)));
        let e = app(
            app(builtin(Builtin::OptionalBuild), natural()),
            app(
                app(builtin(Builtin::OptionalFold), natural()),
                ox.clone(),
            ),
        );
        assert_eq!(normalize(&e), ox);
    }

    #[test]
    fn list_builtins() {
        let xs = rc(Expr::NEListLit(vec![nat(5), nat(6)]));
        let empty = rc(Expr::EmptyListLit(natural()));
        let cases: Vec<(SubExpr, SubExpr)> = vec![
            (
                app_chain(
                    builtin(Builtin::ListLength),
                    vec![natural(), xs.clone()],
                ),
                nat(2),
            ),
            (
                app_chain(
                    builtin(Builtin::ListLength),
                    vec![natural(), empty.clone()],
                ),
                nat(0),
            ),
            (
                app_chain(
                    builtin(Builtin::ListHead),
                    vec![natural(), xs.clone()],
                ),
                rc(Expr::SomeLit(nat(5))),
            ),
            (
                app_chain(
                    builtin(Builtin::ListLast),
                    vec![natural(), xs.clone()],
                ),
                rc(Expr::SomeLit(nat(6))),
            ),
            (
                app_chain(
                    builtin(Builtin::ListHead),
                    vec![natural(), empty.clone()],
                ),
                rc(Expr::EmptyOptionalLit(natural())),
            ),
            (
                app_chain(
                    builtin(Builtin::ListReverse),
                    vec![natural(), xs.clone()],
                ),
                rc(Expr::NEListLit(vec![nat(6), nat(5)])),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize(&input), expected);
        }
    }

    #[test]
    fn list_indexed_builds_records() {
        let xs = rc(Expr::NEListLit(vec![nat(7)]));
        let e = app_chain(
            builtin(Builtin::ListIndexed),
            vec![natural(), xs],
        );
        let mut kvs = std::collections::BTreeMap::new();
        kvs.insert(Label::from("index"), nat(0));
        kvs.insert(Label::from("value"), nat(7));
        assert_eq!(
            normalize(&e),
            rc(Expr::NEListLit(vec![rc(Expr::RecordLit(kvs))]))
        );
    }

    #[test]
    fn list_fold_folds_right() {
        // List/fold Natural [1, 2] Natural (λ(x) -> λ(acc) -> x + acc) 0
        let cons = lam(
            "x",
            natural(),
            lam(
                "acc",
                natural(),
                binop(BinOp::NaturalPlus, var("x", 1), var("acc", 0)),
            ),
        );
        let e = app_chain(
            builtin(Builtin::ListFold),
            vec![
                natural(),
                rc(Expr::NEListLit(vec![nat(1), nat(2)])),
                natural(),
                cons,
                nat(0),
            ],
        );
        assert_eq!(normalize(&e), nat(3));
    }

    #[test]
    fn optional_builtins() {
        let just = lam("x", natural(), var("x", 0));
        let e = app_chain(
            builtin(Builtin::OptionalFold),
            vec![
                natural(),
                rc(Expr::SomeLit(nat(3))),
                natural(),
                just.clone(),
                nat(0),
            ],
        );
        assert_eq!(normalize(&e), nat(3));
        let e = app_chain(
            builtin(Builtin::OptionalFold),
            vec![
                natural(),
                rc(Expr::EmptyOptionalLit(natural())),
                natural(),
                just,
                nat(0),
            ],
        );
        assert_eq!(normalize(&e), nat(0));
        // None Natural
        let e = app(builtin(Builtin::OptionalNone), natural());
        assert_eq!(normalize(&e), rc(Expr::EmptyOptionalLit(natural())));
    }

    #[test]
    fn show_builtins() {
        let cases: Vec<(SubExpr, &str)> = vec![
            (
                app(
                    builtin(Builtin::IntegerShow),
                    rc(Expr::IntegerLit(BigInt::from(-3))),
                ),
                "-3",
            ),
            (
                app(
                    builtin(Builtin::IntegerShow),
                    rc(Expr::IntegerLit(BigInt::from(3))),
                ),
                "+3",
            ),
            (
                app(
                    builtin(Builtin::DoubleShow),
                    rc(Expr::DoubleLit(1.5.into())),
                ),
                "1.5",
            ),
            (
                app(
                    builtin(Builtin::TextShow),
                    rc(Expr::TextLit("a\"b".into())),
                ),
                "\"a\\\"b\"",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(
                normalize(&input),
                rc(Expr::TextLit(expected.into()))
            );
        }
    }

    #[test]
    fn integer_to_double() {
        let e = app(
            builtin(Builtin::IntegerToDouble),
            rc(Expr::IntegerLit(BigInt::from(-2))),
        );
        assert_eq!(normalize(&e), rc(Expr::DoubleLit((-2.0).into())));
    }

    #[test]
    fn annotations_are_dropped() {
        let e = rc(Expr::Annot(nat(1), natural()));
        assert_eq!(normalize(&e), nat(1));
    }

    #[test]
    fn normalization_is_idempotent() {
        let exprs: Vec<SubExpr> = vec![
            binop(BinOp::NaturalPlus, nat(1), var("x", 0)),
            lam("x", natural(), binop(BinOp::NaturalPlus, var("x", 0), nat(1))),
            app(var("f", 0), nat(1)),
            rc(Expr::BoolIf(var("p", 0), nat(1), nat(2))),
            rc(Expr::ToMap(var("r", 0), None)),
            app_chain(
                builtin(Builtin::ListFold),
                vec![natural(), var("xs", 0)],
            ),
        ];
        for e in exprs {
            let once = normalize(&e);
            assert_eq!(normalize(&once), once);
        }
    }
}
