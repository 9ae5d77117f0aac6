//! Property tests for the structural invariants: shift is invertible,
//! substitution after weakening is vacuous, normalization is idempotent,
//! and the binary codec round-trips.

use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};
use proptest::prelude::*;

use dhall::phase::binary;
use dhall::phase::normalize::normalize;
use dhall_syntax::*;

fn arb_label() -> impl Strategy<Value = Label> {
    "[a-z]{1,3}".prop_map(|s| Label::from(s.as_str()))
}

fn arb_builtin() -> impl Strategy<Value = Builtin> {
    prop_oneof![
        Just(Builtin::Bool),
        Just(Builtin::Natural),
        Just(Builtin::Text),
        Just(Builtin::List),
        Just(Builtin::Optional),
        Just(Builtin::NaturalIsZero),
        Just(Builtin::NaturalFold),
        Just(Builtin::ListLength),
        Just(Builtin::TextShow),
    ]
}

fn arb_leaf() -> impl Strategy<Value = SubExpr> {
    prop_oneof![
        any::<bool>().prop_map(|b| rc(Expr::BoolLit(b))),
        // small, so that the recursion builtins stay cheap
        (0u64..8)
            .prop_map(|n| rc(Expr::NaturalLit(BigUint::from(n)))),
        any::<i16>()
            .prop_map(|n| rc(Expr::IntegerLit(BigInt::from(n)))),
        any::<f32>().prop_map(|f| {
            rc(Expr::DoubleLit(f64::from(f).into()))
        }),
        (arb_label(), 0..3usize)
            .prop_map(|(x, n)| rc(Expr::Var(V(x, n)))),
        arb_builtin().prop_map(|b| rc(Expr::Builtin(b))),
        Just(rc(Expr::Const(Const::Type))),
        "[ -~]{0,6}".prop_map(|s| rc(Expr::TextLit(s.as_str().into()))),
    ]
}

fn arb_binop() -> impl Strategy<Value = BinOp> {
    (0u64..13).prop_map(|code| BinOp::from_op_code(code).unwrap())
}

fn arb_expr() -> impl Strategy<Value = SubExpr> {
    arb_leaf().prop_recursive(4, 24, 3, |inner| {
        let binders_and_control = prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(f, a)| rc(Expr::App(f, a))),
            (arb_label(), inner.clone(), inner.clone())
                .prop_map(|(x, t, b)| rc(Expr::Lam(x, t, b))),
            (arb_label(), inner.clone(), inner.clone())
                .prop_map(|(x, t, b)| rc(Expr::Pi(x, t, b))),
            (
                arb_label(),
                proptest::option::of(inner.clone()),
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(x, t, a, b)| rc(Expr::Let(x, t, a, b))),
            (arb_binop(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| rc(Expr::BinOp(op, l, r))),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(p, t, e)| rc(Expr::BoolIf(p, t, e))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, t)| rc(Expr::Annot(x, t))),
        ];
        let containers_and_accessors = prop_oneof![
            prop::collection::vec(inner.clone(), 1..3)
                .prop_map(|xs| rc(Expr::NEListLit(xs))),
            inner.clone().prop_map(|t| rc(Expr::EmptyListLit(t))),
            inner.clone().prop_map(|x| rc(Expr::SomeLit(x))),
            prop::collection::btree_map(arb_label(), inner.clone(), 0..3)
                .prop_map(|kvs| rc(Expr::RecordLit(kvs))),
            prop::collection::btree_map(arb_label(), inner.clone(), 0..3)
                .prop_map(|kts| rc(Expr::RecordType(kts))),
            (inner.clone(), arb_label())
                .prop_map(|(r, l)| rc(Expr::Field(r, l))),
            (inner.clone(), "[ -~]{0,4}", inner.clone()).prop_map(
                |(e1, s, e2)| {
                    let mut t = InterpolatedText::from("pre");
                    t.push_expr(e1);
                    t.push_text(&s);
                    t.push_expr(e2);
                    rc(Expr::TextLit(t))
                }
            ),
        ];
        prop_oneof![binders_and_control, containers_and_accessors]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn binary_roundtrip(e in arb_expr()) {
        let bytes = binary::encode(&e);
        let back = binary::decode(&bytes).unwrap();
        prop_assert_eq!(back, e);
    }

    #[test]
    fn shift_is_invertible(e in arb_expr(), x in arb_label()) {
        let v = V(x, 0);
        let shifted = shift(1, &v, &e);
        prop_assert_eq!(shift(-1, &v, &shifted), e);
    }

    #[test]
    fn substitution_after_weakening_is_vacuous(
        e in arb_expr(),
        value in arb_leaf(),
        x in arb_label(),
    ) {
        // shifting introduces a gap at index 0, so substituting there
        // changes nothing and unshifting recovers the original
        let v = V(x, 0);
        let weakened = shift(1, &v, &e);
        let substituted = subst_shift(&v, &value, &weakened);
        prop_assert_eq!(&substituted, &weakened);
        prop_assert_eq!(shift(-1, &v, &substituted), e);
    }

    #[test]
    fn alpha_normalization_is_idempotent(e in arb_expr()) {
        let once = alpha_normalize(&e);
        prop_assert_eq!(alpha_normalize(&once), once);
    }

    #[test]
    fn normalization_is_idempotent(e in arb_expr()) {
        let once = normalize(&e);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalization_preserves_alpha_equivalence(e in arb_expr()) {
        // normalizing the α-normal form gives the α-normal form of the
        // normal form
        let a = alpha_normalize(&normalize(&alpha_normalize(&e)));
        let b = alpha_normalize(&normalize(&e));
        prop_assert_eq!(a, b);
    }
}
