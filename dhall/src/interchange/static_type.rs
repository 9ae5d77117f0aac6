use std::collections::BTreeMap;

use dhall_syntax::*;

/// Rust types that are represented by a single Dhall type, independent
/// of the value. A typical example is `Option<bool>`, represented by
/// `Optional Bool`. A typical counterexample is `HashMap<String, bool>`
/// because Dhall cannot represent records with a variable number of
/// fields.
pub trait StaticType {
    fn static_type() -> SubExpr;
}

fn builtin(b: Builtin) -> SubExpr {
    Expr::from_builtin(b)
}

impl StaticType for bool {
    fn static_type() -> SubExpr {
        builtin(Builtin::Bool)
    }
}

impl StaticType for u32 {
    fn static_type() -> SubExpr {
        builtin(Builtin::Natural)
    }
}

impl StaticType for u64 {
    fn static_type() -> SubExpr {
        builtin(Builtin::Natural)
    }
}

impl StaticType for i32 {
    fn static_type() -> SubExpr {
        builtin(Builtin::Integer)
    }
}

impl StaticType for i64 {
    fn static_type() -> SubExpr {
        builtin(Builtin::Integer)
    }
}

impl StaticType for f64 {
    fn static_type() -> SubExpr {
        builtin(Builtin::Double)
    }
}

impl StaticType for String {
    fn static_type() -> SubExpr {
        builtin(Builtin::Text)
    }
}

impl<A: StaticType, B: StaticType> StaticType for (A, B) {
    fn static_type() -> SubExpr {
        let mut kts = BTreeMap::new();
        kts.insert(Label::from("_1"), A::static_type());
        kts.insert(Label::from("_2"), B::static_type());
        rc(Expr::RecordType(kts))
    }
}

impl<T: StaticType> StaticType for Option<T> {
    fn static_type() -> SubExpr {
        rc(Expr::App(builtin(Builtin::Optional), T::static_type()))
    }
}

impl<T: StaticType> StaticType for Vec<T> {
    fn static_type() -> SubExpr {
        rc(Expr::App(builtin(Builtin::List), T::static_type()))
    }
}

impl<'a, T: StaticType> StaticType for &'a T {
    fn static_type() -> SubExpr {
        T::static_type()
    }
}
