//! The bidirectional type checker. `type_with` synthesizes the type of an
//! expression under a context; the returned type is always in normal
//! form, so callers can compare types with plain α-equivalence.

use std::cell::Cell;
use std::collections::BTreeMap;

use dhall_syntax::context::Context;
use dhall_syntax::*;

use crate::error::{TypeError, TypeMessage};
use crate::phase::binary;
use crate::phase::normalize::normalize;

type TyCtx = Context<Label, SubExpr>;

/// Equality up to α-equivalence, on β-normal forms.
fn prop_equal(a: &SubExpr, b: &SubExpr) -> bool {
    alpha_normalize(a) == alpha_normalize(b)
}

/// The universe of a function type, from the universes of its input and
/// output: term-level functions live in `Type` no matter what they take.
fn function_check(ka: Const, kb: Const) -> Const {
    if kb == Const::Type {
        Const::Type
    } else {
        ka.max(kb)
    }
}

fn const_expr(c: Const) -> SubExpr {
    rc(Expr::Const(c))
}

fn app(f: SubExpr, a: SubExpr) -> SubExpr {
    rc(Expr::App(f, a))
}

/// β-reduce one substitution, the same dance the normalizer performs.
fn beta_reduce(x: &Label, body: &SubExpr, arg: &SubExpr) -> SubExpr {
    let v = V(x.clone(), 0);
    let arg = shift(1, &v, arg);
    let body = subst_shift(&v, &arg, body);
    shift(-1, &v, &body)
}

/// Whether `var` occurs free in `expr`.
fn mentions_var(expr: &SubExpr, var: &V) -> bool {
    match expr.as_ref() {
        Expr::Var(v) => v == var,
        e => {
            let found = Cell::new(false);
            e.foreach_subexpr_with_binders(
                &mut |sub| found.set(found.get() || mentions_var(sub, var)),
                &mut |l, sub| {
                    found.set(
                        found.get() || mentions_var(sub, &var.under_binder(l)),
                    )
                },
            );
            found.get()
        }
    }
}

// Ad-hoc macro to help construct the types of builtins
macro_rules! make_type {
    (Type) => { Expr::Const(Const::Type) };
    (Bool) => { Expr::Builtin(Builtin::Bool) };
    (Natural) => { Expr::Builtin(Builtin::Natural) };
    (Integer) => { Expr::Builtin(Builtin::Integer) };
    (Double) => { Expr::Builtin(Builtin::Double) };
    (Text) => { Expr::Builtin(Builtin::Text) };
    ($var:ident) => {
        Expr::Var(V(stringify!($var).into(), 0))
    };
    (Optional $ty:ident) => {
        Expr::App(
            rc(Expr::Builtin(Builtin::Optional)),
            rc(make_type!($ty)),
        )
    };
    (List $($rest:tt)*) => {
        Expr::App(
            rc(Expr::Builtin(Builtin::List)),
            rc(make_type!($($rest)*)),
        )
    };
    ({ $($label:ident : $ty:ident),* }) => {{
        let mut kts = BTreeMap::new();
        $(
            kts.insert(
                Label::from(stringify!($label)),
                rc(make_type!($ty)),
            );
        )*
        Expr::RecordType(kts)
    }};
    ($ty:ident -> $($rest:tt)*) => {
        Expr::Pi(
            "_".into(),
            rc(make_type!($ty)),
            rc(make_type!($($rest)*)),
        )
    };
    (($($arg:tt)*) -> $($rest:tt)*) => {
        Expr::Pi(
            "_".into(),
            rc(make_type!($($arg)*)),
            rc(make_type!($($rest)*)),
        )
    };
    (forall ($var:ident : $($ty:tt)*) -> $($rest:tt)*) => {
        Expr::Pi(
            stringify!($var).into(),
            rc(make_type!($($ty)*)),
            rc(make_type!($($rest)*)),
        )
    };
}

fn type_of_builtin(b: Builtin) -> Expr {
    use dhall_syntax::Builtin::*;
    match b {
        Bool | Natural | Integer | Double | Text => make_type!(Type),
        List | Optional => make_type!(
            Type -> Type
        ),

        NaturalFold => make_type!(
            Natural ->
            forall (natural: Type) ->
            forall (succ: natural -> natural) ->
            forall (zero: natural) ->
            natural
        ),
        NaturalBuild => make_type!(
            (forall (natural: Type) ->
                forall (succ: natural -> natural) ->
                forall (zero: natural) ->
                natural) ->
            Natural
        ),
        NaturalIsZero | NaturalEven | NaturalOdd => make_type!(
            Natural -> Bool
        ),
        NaturalToInteger => make_type!(Natural -> Integer),
        NaturalShow => make_type!(Natural -> Text),
        NaturalSubtract => make_type!(Natural -> Natural -> Natural),

        IntegerToDouble => make_type!(Integer -> Double),
        IntegerShow => make_type!(Integer -> Text),
        DoubleShow => make_type!(Double -> Text),
        TextShow => make_type!(Text -> Text),

        ListBuild => make_type!(
            forall (a: Type) ->
            (forall (list: Type) ->
                forall (cons: a -> list -> list) ->
                forall (nil: list) ->
                list) ->
            List a
        ),
        ListFold => make_type!(
            forall (a: Type) ->
            (List a) ->
            forall (list: Type) ->
            forall (cons: a -> list -> list) ->
            forall (nil: list) ->
            list
        ),
        ListLength => make_type!(forall (a: Type) -> (List a) -> Natural),
        ListHead | ListLast => {
            make_type!(forall (a: Type) -> (List a) -> Optional a)
        }
        ListIndexed => make_type!(
            forall (a: Type) ->
            (List a) ->
            List { index: Natural, value: a }
        ),
        ListReverse => make_type!(
            forall (a: Type) -> (List a) -> List a
        ),

        OptionalFold => make_type!(
            forall (a: Type) ->
            (Optional a) ->
            forall (optional: Type) ->
            forall (just: a -> optional) ->
            forall (nothing: optional) ->
            optional
        ),
        OptionalBuild => make_type!(
            forall (a: Type) ->
            (forall (optional: Type) ->
                forall (just: a -> optional) ->
                forall (nothing: optional) ->
                optional) ->
            Optional a
        ),
        OptionalNone => make_type!(
            forall (a: Type) -> Optional a
        ),
    }
}

/// `type_of` is the same as `type_with` with an empty context, meaning
/// that the expression must be closed (no free variables) or
/// type-checking will fail.
pub fn type_of(e: &SubExpr) -> Result<SubExpr, TypeError> {
    type_with(&Context::new(), e)
}

/// Type-check an expression and return its type, which is always in
/// β-normal form.
pub fn type_with(ctx: &TyCtx, e: &SubExpr) -> Result<SubExpr, TypeError> {
    use Expr::*;
    use TypeMessage::*;

    let mkerr = |msg: TypeMessage| TypeError::new(ctx, e, msg);

    // The universe a (normalized) type lives in
    let kind_of = |ctx: &TyCtx,
                   t: &SubExpr|
     -> Result<Option<dhall_syntax::Const>, TypeError> {
        match type_with(ctx, t)?.as_ref() {
            Const(k) => Ok(Some(*k)),
            _ => Ok(None),
        }
    };

    Ok(match e.as_ref() {
        Const(dhall_syntax::Const::Type) => {
            const_expr(dhall_syntax::Const::Kind)
        }
        Const(dhall_syntax::Const::Kind) => {
            const_expr(dhall_syntax::Const::Sort)
        }
        Const(dhall_syntax::Const::Sort) => {
            return Err(mkerr(SortHasNoType))
        }
        Var(v @ V(x, n)) => match ctx.lookup(x, *n) {
            Some(t) => t.clone(),
            None => return Err(mkerr(FreeVariable(v.clone()))),
        },
        Builtin(b) => normalize(&rc(type_of_builtin(*b))),
        Lam(x, t, b) => {
            type_with(ctx, t)?;
            let t = normalize(t);
            let ctx2 = ctx
                .insert(x.clone(), t.clone())
                .map(|ty| shift(1, &V(x.clone(), 0), ty));
            let tb = type_with(&ctx2, b)?;
            let pi = rc(Pi(x.clone(), t, tb));
            // The Pi itself must be well-formed
            type_with(ctx, &pi)?;
            normalize(&pi)
        }
        Pi(x, ta, tb) => {
            let ka = match kind_of(ctx, ta)? {
                Some(k) => k,
                None => {
                    return Err(mkerr(InvalidInputType(normalize(ta))))
                }
            };
            let ta_nf = normalize(ta);
            let ctx2 = ctx
                .insert(x.clone(), ta_nf)
                .map(|ty| shift(1, &V(x.clone(), 0), ty));
            let kb = match type_with(&ctx2, tb)?.as_ref() {
                Const(k) => *k,
                _ => {
                    return Err(mkerr(InvalidOutputType(normalize(tb))))
                }
            };
            const_expr(function_check(ka, kb))
        }
        Let(x, ann, a, b) => {
            let a = match ann {
                Some(t) => rc(Annot(a.clone(), t.clone())),
                None => a.clone(),
            };
            type_with(ctx, &a)?;
            // let x = a in b  types as  b[x := a]
            type_with(ctx, &beta_reduce(x, b, &a))?
        }
        App(f, a) => {
            let tf = type_with(ctx, f)?;
            let (x, tx, tb) = match tf.as_ref() {
                Pi(x, tx, tb) => (x, tx, tb),
                _ => return Err(mkerr(ApplicationNotFunction(f.clone()))),
            };
            let ta = type_with(ctx, a)?;
            if !prop_equal(tx, &ta) {
                return Err(mkerr(ApplicationTypeMismatch {
                    expected: tx.clone(),
                    actual: ta,
                }));
            }
            normalize(&beta_reduce(x, tb, a))
        }
        Annot(x, t) => {
            let tx = type_with(ctx, x)?;
            let t = normalize(t);
            if !prop_equal(&t, &tx) {
                return Err(mkerr(AnnotationMismatch {
                    annotated: t,
                    inferred: tx,
                }));
            }
            tx
        }
        Assert(t) => {
            type_with(ctx, t)?;
            let t = normalize(t);
            match t.as_ref() {
                BinOp(dhall_syntax::BinOp::Equivalence, x, y) => {
                    let x_bytes = binary::encode(&alpha_normalize(x));
                    let y_bytes = binary::encode(&alpha_normalize(y));
                    if x_bytes != y_bytes {
                        return Err(mkerr(AssertionNotEquivalent(
                            x.clone(),
                            y.clone(),
                        )));
                    }
                    t.clone()
                }
                _ => return Err(mkerr(AssertMustTakeEquivalence(t.clone()))),
            }
        }
        BoolLit(_) => Expr::from_builtin(dhall_syntax::Builtin::Bool),
        NaturalLit(_) => Expr::from_builtin(dhall_syntax::Builtin::Natural),
        IntegerLit(_) => Expr::from_builtin(dhall_syntax::Builtin::Integer),
        DoubleLit(_) => Expr::from_builtin(dhall_syntax::Builtin::Double),
        TextLit(chunks) => {
            let text = Expr::from_builtin(dhall_syntax::Builtin::Text);
            for x in chunks.exprs() {
                let tx = type_with(ctx, x)?;
                if !prop_equal(&tx, &text) {
                    return Err(mkerr(InvalidTextInterpolation(tx)));
                }
            }
            text
        }
        BoolIf(p, t, el) => {
            let tp = type_with(ctx, p)?;
            let bool_type = Expr::from_builtin(dhall_syntax::Builtin::Bool);
            if !prop_equal(&tp, &bool_type) {
                return Err(mkerr(NonBoolPredicate(tp)));
            }
            let tt = type_with(ctx, t)?;
            let te = type_with(ctx, el)?;
            if kind_of(ctx, &tt)? != Some(dhall_syntax::Const::Type) {
                return Err(mkerr(IfBranchMustBeTerm(t.clone())));
            }
            if !prop_equal(&tt, &te) {
                return Err(mkerr(MismatchedIf(tt, te)));
            }
            tt
        }
        EmptyListLit(t) => {
            if kind_of(ctx, t)? != Some(dhall_syntax::Const::Type) {
                return Err(mkerr(NonTypeListElement(normalize(t))));
            }
            let list = Expr::from_builtin(dhall_syntax::Builtin::List);
            normalize(&app(list, t.clone()))
        }
        NEListLit(xs) => {
            let mut iter = xs.iter();
            let t0 = type_with(ctx, iter.next().unwrap())?;
            if kind_of(ctx, &t0)? != Some(dhall_syntax::Const::Type) {
                return Err(mkerr(NonTypeListElement(t0)));
            }
            for x in iter {
                let tx = type_with(ctx, x)?;
                if !prop_equal(&t0, &tx) {
                    return Err(mkerr(HeterogeneousList(t0, tx)));
                }
            }
            let list = Expr::from_builtin(dhall_syntax::Builtin::List);
            app(list, t0)
        }
        SomeLit(x) => {
            let tx = type_with(ctx, x)?;
            if kind_of(ctx, &tx)? != Some(dhall_syntax::Const::Type) {
                return Err(mkerr(InvalidOptionalType(tx)));
            }
            let optional =
                Expr::from_builtin(dhall_syntax::Builtin::Optional);
            app(optional, tx)
        }
        EmptyOptionalLit(t) => {
            if kind_of(ctx, t)? != Some(dhall_syntax::Const::Type) {
                return Err(mkerr(InvalidOptionalType(normalize(t))));
            }
            let optional =
                Expr::from_builtin(dhall_syntax::Builtin::Optional);
            normalize(&app(optional, t.clone()))
        }
        RecordType(kts) => {
            let mut k = None;
            for (x, t) in kts {
                match (k, kind_of(ctx, t)?) {
                    (None, Some(k2)) => k = Some(k2),
                    (Some(k1), Some(k2)) if k1 == k2 => {}
                    _ => {
                        return Err(
                            mkerr(RecordFieldKindMismatch(x.clone())),
                        )
                    }
                }
            }
            // An empty record type is a Type
            const_expr(k.unwrap_or(dhall_syntax::Const::Type))
        }
        RecordLit(kvs) => {
            let mut kts = BTreeMap::new();
            for (x, v) in kvs {
                let tv = type_with(ctx, v)?;
                kts.insert(x.clone(), tv);
            }
            let record_type = rc(RecordType(kts));
            // Kind homogeneity is enforced by checking the synthesized type
            type_with(ctx, &record_type)?;
            record_type
        }
        UnionType(kts) => {
            let mut k = None;
            for (x, t) in kts {
                let t = match t {
                    Some(t) => t,
                    None => continue,
                };
                match (k, kind_of(ctx, t)?) {
                    (None, Some(k2)) => k = Some(k2),
                    (Some(k1), Some(k2)) if k1 == k2 => {}
                    _ => {
                        return Err(mkerr(UnionAlternativeKindMismatch(
                            x.clone(),
                        )))
                    }
                }
            }
            const_expr(k.unwrap_or(dhall_syntax::Const::Type))
        }
        UnionLit(k, v, alts) => {
            let mut kts = alts.clone();
            match v {
                Some(v) => {
                    let tv = type_with(ctx, v)?;
                    kts.insert(k.clone(), Some(tv));
                }
                None => {
                    kts.insert(k.clone(), None);
                }
            }
            let union_type = rc(UnionType(kts));
            type_with(ctx, &union_type)?;
            normalize(&union_type)
        }
        Field(r, x) => {
            let tr = type_with(ctx, r)?;
            match tr.as_ref() {
                RecordType(kts) => match kts.get(x) {
                    Some(t) => t.clone(),
                    None => {
                        return Err(mkerr(MissingRecordField(
                            x.clone(),
                            r.clone(),
                        )))
                    }
                },
                // Selecting from a union type yields a constructor
                _ => {
                    let r_nf = normalize(r);
                    match r_nf.as_ref() {
                        UnionType(kts) => match kts.get(x) {
                            Some(Some(t)) => normalize(&rc(Pi(
                                "_".into(),
                                t.clone(),
                                shift(1, &V("_".into(), 0), &r_nf),
                            ))),
                            Some(None) => r_nf.clone(),
                            None => {
                                return Err(mkerr(MissingRecordField(
                                    x.clone(),
                                    r.clone(),
                                )))
                            }
                        },
                        _ => {
                            return Err(mkerr(NonRecordProjection(tr)))
                        }
                    }
                }
            }
        }
        Projection(r, ls) => {
            let tr = type_with(ctx, r)?;
            let kts = match tr.as_ref() {
                RecordType(kts) => kts,
                _ => return Err(mkerr(NonRecordProjection(tr))),
            };
            let mut out = BTreeMap::new();
            for l in ls {
                match kts.get(l) {
                    Some(t) => {
                        if out.insert(l.clone(), t.clone()).is_some() {
                            return Err(
                                mkerr(DuplicateRecordField(l.clone())),
                            );
                        }
                    }
                    None => {
                        return Err(mkerr(MissingRecordField(
                            l.clone(),
                            r.clone(),
                        )))
                    }
                }
            }
            rc(RecordType(out))
        }
        ProjectionByExpr(r, t) => {
            type_with(ctx, t)?;
            let sel = normalize(t);
            let sel_kts = match sel.as_ref() {
                RecordType(kts) => kts,
                _ => return Err(mkerr(NonRecordProjection(sel.clone()))),
            };
            let tr = type_with(ctx, r)?;
            let kts = match tr.as_ref() {
                RecordType(kts) => kts,
                _ => return Err(mkerr(NonRecordProjection(tr))),
            };
            for (l, want) in sel_kts {
                match kts.get(l) {
                    Some(have) if prop_equal(have, want) => {}
                    Some(have) => {
                        return Err(mkerr(AnnotationMismatch {
                            annotated: want.clone(),
                            inferred: have.clone(),
                        }))
                    }
                    None => {
                        return Err(mkerr(MissingRecordField(
                            l.clone(),
                            r.clone(),
                        )))
                    }
                }
            }
            sel
        }
        BinOp(op, l, r) => type_binop(ctx, e, *op, l, r)?,
        Merge(record, union, annot) => {
            type_merge(ctx, e, record, union, annot)?
        }
        ToMap(record, annot) => type_tomap(ctx, e, record, annot)?,
        Import(_) => unreachable!(
            "there should remain no imports in a resolved expression"
        ),
    })
}

fn type_binop(
    ctx: &TyCtx,
    e: &SubExpr,
    op: BinOp,
    l: &SubExpr,
    r: &SubExpr,
) -> Result<SubExpr, TypeError> {
    use dhall_syntax::BinOp::*;
    use Expr::RecordType;
    use TypeMessage::*;

    let mkerr = |msg: TypeMessage| TypeError::new(ctx, e, msg);

    Ok(match op {
        BoolAnd | BoolOr | BoolEQ | BoolNE => binop_operands(
            ctx,
            e,
            op,
            l,
            r,
            Expr::from_builtin(Builtin::Bool),
        )?,
        NaturalPlus | NaturalTimes => binop_operands(
            ctx,
            e,
            op,
            l,
            r,
            Expr::from_builtin(Builtin::Natural),
        )?,
        TextAppend => binop_operands(
            ctx,
            e,
            op,
            l,
            r,
            Expr::from_builtin(Builtin::Text),
        )?,
        ListAppend => {
            let tl = type_with(ctx, l)?;
            match tl.as_ref() {
                Expr::App(f, _)
                    if f.as_ref() == &Expr::Builtin(Builtin::List) => {}
                _ => return Err(mkerr(BinOpTypeMismatch(op, l.clone()))),
            }
            let tr = type_with(ctx, r)?;
            if !prop_equal(&tl, &tr) {
                return Err(mkerr(BinOpTypeMismatch(op, r.clone())));
            }
            tl
        }
        RightBiasedRecordMerge => {
            let tl = type_with(ctx, l)?;
            let tr = type_with(ctx, r)?;
            let kts_l = match tl.as_ref() {
                RecordType(kts) => kts,
                _ => return Err(mkerr(BinOpTypeMismatch(op, l.clone()))),
            };
            let kts_r = match tr.as_ref() {
                RecordType(kts) => kts,
                _ => return Err(mkerr(BinOpTypeMismatch(op, r.clone()))),
            };
            // Both records must live in the same universe
            if type_with(ctx, &tl)? != type_with(ctx, &tr)? {
                return Err(mkerr(RecordFieldKindMismatch(
                    kts_r
                        .keys()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| Label::from("_")),
                )));
            }
            let mut kts = kts_l.clone();
            for (k, t) in kts_r {
                kts.insert(k.clone(), t.clone());
            }
            rc(RecordType(kts))
        }
        RecursiveRecordMerge => {
            let tl = type_with(ctx, l)?;
            let tr = type_with(ctx, r)?;
            let merged = combine_record_types(ctx, e, &tl, &tr)?;
            type_with(ctx, &merged)?;
            merged
        }
        RecursiveRecordTypeMerge => {
            let kl = match type_with(ctx, l)?.as_ref() {
                Expr::Const(k) => *k,
                _ => return Err(mkerr(BinOpTypeMismatch(op, l.clone()))),
            };
            let kr = match type_with(ctx, r)?.as_ref() {
                Expr::Const(k) => *k,
                _ => return Err(mkerr(BinOpTypeMismatch(op, r.clone()))),
            };
            if kl != kr {
                return Err(mkerr(BinOpTypeMismatch(op, r.clone())));
            }
            // The merge must be well-formed even though it happens lazily
            combine_record_types(ctx, e, &normalize(l), &normalize(r))?;
            const_expr(kl)
        }
        // Both operands resolve to the same expression or resolution
        // would already have failed; the left one decides
        ImportAlt => type_with(ctx, l)?,
        Equivalence => {
            let tl = type_with(ctx, l)?;
            let tr = type_with(ctx, r)?;
            if !prop_equal(&tl, &tr) {
                return Err(mkerr(EquivalenceTypeMismatch(tl, tr)));
            }
            match type_with(ctx, &tl)?.as_ref() {
                Expr::Const(Const::Type) => {}
                _ => {
                    return Err(mkerr(EquivalenceArgumentMustBeTerm(
                        l.clone(),
                    )))
                }
            }
            const_expr(Const::Type)
        }
    })
}

fn binop_operands(
    ctx: &TyCtx,
    e: &SubExpr,
    op: BinOp,
    l: &SubExpr,
    r: &SubExpr,
    expected: SubExpr,
) -> Result<SubExpr, TypeError> {
    let tl = type_with(ctx, l)?;
    if !prop_equal(&tl, &expected) {
        return Err(TypeError::new(
            ctx,
            e,
            TypeMessage::BinOpTypeMismatch(op, l.clone()),
        ));
    }
    let tr = type_with(ctx, r)?;
    if !prop_equal(&tr, &expected) {
        return Err(TypeError::new(
            ctx,
            e,
            TypeMessage::BinOpTypeMismatch(op, r.clone()),
        ));
    }
    Ok(expected)
}

/// The type of `l ∧ r`: the recursive union of the two record types,
/// where common fields must themselves merge recursively.
fn combine_record_types(
    ctx: &TyCtx,
    e: &SubExpr,
    tl: &SubExpr,
    tr: &SubExpr,
) -> Result<SubExpr, TypeError> {
    use Expr::RecordType;
    use TypeMessage::*;

    let kts_l = match tl.as_ref() {
        RecordType(kts) => kts,
        _ => {
            return Err(TypeError::new(
                ctx,
                e,
                MergeOnNonRecord(tl.clone()),
            ))
        }
    };
    let kts_r = match tr.as_ref() {
        RecordType(kts) => kts,
        _ => {
            return Err(TypeError::new(
                ctx,
                e,
                MergeOnNonRecord(tr.clone()),
            ))
        }
    };
    let mut out = kts_l.clone();
    for (k, t_r) in kts_r {
        let combined = match kts_l.get(k) {
            Some(t_l) => {
                match (t_l.as_ref(), t_r.as_ref()) {
                    (RecordType(_), RecordType(_)) => {
                        combine_record_types(ctx, e, t_l, t_r)?
                    }
                    _ => {
                        return Err(TypeError::new(
                            ctx,
                            e,
                            DuplicateRecordField(k.clone()),
                        ))
                    }
                }
            }
            None => t_r.clone(),
        };
        out.insert(k.clone(), combined);
    }
    Ok(rc(RecordType(out)))
}

fn type_merge(
    ctx: &TyCtx,
    e: &SubExpr,
    record: &SubExpr,
    union: &SubExpr,
    annot: &Option<SubExpr>,
) -> Result<SubExpr, TypeError> {
    use Expr::{Pi, RecordType, UnionType};
    use TypeMessage::*;

    let mkerr = |msg: TypeMessage| TypeError::new(ctx, e, msg);

    let tr = type_with(ctx, record)?;
    let handlers = match tr.as_ref() {
        RecordType(kts) => kts,
        _ => return Err(mkerr(MergeOnNonRecord(tr.clone()))),
    };
    let tu = type_with(ctx, union)?;
    let variants = match tu.as_ref() {
        UnionType(kts) => kts,
        _ => return Err(mkerr(MergeOnNonUnion(tu.clone()))),
    };

    let mut inferred: Option<SubExpr> = None;
    for (x, handler_type) in handlers {
        let output = match variants.get(x) {
            // Alternative with a payload: the handler is a function
            Some(Some(variant_type)) => {
                let (y, ty, tb) = match handler_type.as_ref() {
                    Pi(y, ty, tb) => (y, ty, tb),
                    _ => return Err(mkerr(HandlerNotFunction(x.clone()))),
                };
                if !prop_equal(ty, variant_type) {
                    return Err(mkerr(ApplicationTypeMismatch {
                        expected: variant_type.clone(),
                        actual: ty.clone(),
                    }));
                }
                let v = V(y.clone(), 0);
                if mentions_var(tb, &v) {
                    return Err(mkerr(HandlerOutputMismatch(
                        handler_type.clone(),
                        tb.clone(),
                    )));
                }
                shift(-1, &v, tb)
            }
            // Alternative without a payload: the handler is the result
            Some(None) => handler_type.clone(),
            None => return Err(mkerr(ExtraneousHandler(x.clone()))),
        };
        match &inferred {
            None => inferred = Some(output),
            Some(t) => {
                if !prop_equal(t, &output) {
                    return Err(mkerr(HandlerOutputMismatch(
                        t.clone(),
                        output,
                    )));
                }
            }
        }
    }
    for x in variants.keys() {
        if !handlers.contains_key(x) {
            return Err(mkerr(HandlerMissing(x.clone())));
        }
    }

    match (inferred, annot) {
        (Some(t), Some(a)) => {
            let a = normalize(a);
            if !prop_equal(&t, &a) {
                return Err(mkerr(AnnotationMismatch {
                    annotated: a,
                    inferred: t,
                }));
            }
            Ok(t)
        }
        (Some(t), None) => Ok(t),
        (None, Some(a)) => Ok(normalize(a)),
        (None, None) => Err(mkerr(MergeEmptyNeedsAnnotation)),
    }
}

fn type_tomap(
    ctx: &TyCtx,
    e: &SubExpr,
    record: &SubExpr,
    annot: &Option<SubExpr>,
) -> Result<SubExpr, TypeError> {
    use Expr::RecordType;
    use TypeMessage::*;

    let mkerr = |msg: TypeMessage| TypeError::new(ctx, e, msg);

    let tr = type_with(ctx, record)?;
    let kts = match tr.as_ref() {
        RecordType(kts) => kts,
        _ => return Err(mkerr(MergeOnNonRecord(tr.clone()))),
    };

    let entry_list_type = |value_type: SubExpr| {
        let mut entry = BTreeMap::new();
        entry.insert(
            Label::from("mapKey"),
            Expr::from_builtin(Builtin::Text),
        );
        entry.insert(Label::from("mapValue"), value_type);
        app(
            Expr::from_builtin(Builtin::List),
            rc(RecordType(entry)),
        )
    };

    if kts.is_empty() {
        let a = match annot {
            Some(a) => normalize(a),
            None => return Err(mkerr(ToMapEmptyNeedsAnnotation)),
        };
        // The annotation must be `List { mapKey : Text, mapValue : T }`
        let valid = match a.as_ref() {
            Expr::App(f, arg)
                if f.as_ref() == &Expr::Builtin(Builtin::List) =>
            {
                match arg.as_ref() {
                    RecordType(kts) => {
                        kts.len() == 2
                            && kts
                                .get(&Label::from("mapKey"))
                                .map(|t| {
                                    prop_equal(
                                        t,
                                        &Expr::from_builtin(Builtin::Text),
                                    )
                                })
                                .unwrap_or(false)
                            && kts.contains_key(&Label::from("mapValue"))
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        if !valid {
            return Err(mkerr(InvalidListType(a)));
        }
        return Ok(a);
    }

    let mut iter = kts.iter();
    let (_, t0) = iter.next().unwrap();
    if type_with(ctx, t0)?.as_ref() != &Expr::Const(Const::Type) {
        return Err(mkerr(NonTypeListElement(t0.clone())));
    }
    for (x, t) in iter {
        if !prop_equal(t0, t) {
            return Err(mkerr(ToMapFieldTypeMismatch(x.clone())));
        }
    }
    let inferred = entry_list_type(t0.clone());
    if let Some(a) = annot {
        let a = normalize(a);
        if !prop_equal(&inferred, &a) {
            return Err(mkerr(AnnotationMismatch {
                annotated: a,
                inferred,
            }));
        }
    }
    Ok(inferred)
}
