use std::collections::BTreeMap;
use std::rc::Rc;

use num_bigint::{BigInt, BigUint};

use crate::import::Import;
use crate::label::Label;
use crate::text::InterpolatedText;
use crate::var::V;

pub type Natural = BigUint;
pub type Integer = BigInt;

/// A reference-counted subtree. Expressions are immutable; transformations
/// build new trees and share unchanged subtrees.
pub type SubExpr = Rc<Expr>;

pub fn rc(x: Expr) -> SubExpr {
    Rc::new(x)
}

/// Double with bitwise equality, so that normal forms compare and hash the
/// way the binary encoding does (NaN is not equal to NaN).
#[derive(Debug, Copy, Clone)]
pub struct NaiveDouble(f64);

impl PartialEq for NaiveDouble {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for NaiveDouble {}

impl std::hash::Hash for NaiveDouble {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state)
    }
}

impl From<f64> for NaiveDouble {
    fn from(x: f64) -> Self {
        NaiveDouble(x)
    }
}

impl From<NaiveDouble> for f64 {
    fn from(x: NaiveDouble) -> f64 {
        x.0
    }
}

/// The sort constants. There is nothing above `Sort`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Const {
    Type,
    Kind,
    Sort,
}

/// The binary operators, in binary-encoding opcode order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `||`
    BoolOr,
    /// `&&`
    BoolAnd,
    /// `==`
    BoolEQ,
    /// `!=`
    BoolNE,
    /// `+`
    NaturalPlus,
    /// `*`
    NaturalTimes,
    /// `++`
    TextAppend,
    /// `#`
    ListAppend,
    /// `∧`
    RecursiveRecordMerge,
    /// `⫽`
    RightBiasedRecordMerge,
    /// `⩓`
    RecursiveRecordTypeMerge,
    /// `?`
    ImportAlt,
    /// `≡`
    Equivalence,
}

impl BinOp {
    pub fn op_code(self) -> u64 {
        use BinOp::*;
        match self {
            BoolOr => 0,
            BoolAnd => 1,
            BoolEQ => 2,
            BoolNE => 3,
            NaturalPlus => 4,
            NaturalTimes => 5,
            TextAppend => 6,
            ListAppend => 7,
            RecursiveRecordMerge => 8,
            RightBiasedRecordMerge => 9,
            RecursiveRecordTypeMerge => 10,
            ImportAlt => 11,
            Equivalence => 12,
        }
    }

    pub fn from_op_code(code: u64) -> Option<BinOp> {
        use BinOp::*;
        Some(match code {
            0 => BoolOr,
            1 => BoolAnd,
            2 => BoolEQ,
            3 => BoolNE,
            4 => NaturalPlus,
            5 => NaturalTimes,
            6 => TextAppend,
            7 => ListAppend,
            8 => RecursiveRecordMerge,
            9 => RightBiasedRecordMerge,
            10 => RecursiveRecordTypeMerge,
            11 => ImportAlt,
            12 => Equivalence,
            _ => return None,
        })
    }
}

/// The reserved builtin identifiers. `True`/`False` are `BoolLit` and the
/// sorts are `Const`; everything else reserved lives here.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Builtin {
    Bool,
    Natural,
    Integer,
    Double,
    Text,
    List,
    Optional,
    OptionalNone,
    NaturalBuild,
    NaturalFold,
    NaturalIsZero,
    NaturalEven,
    NaturalOdd,
    NaturalToInteger,
    NaturalShow,
    NaturalSubtract,
    IntegerToDouble,
    IntegerShow,
    DoubleShow,
    TextShow,
    ListBuild,
    ListFold,
    ListLength,
    ListHead,
    ListLast,
    ListIndexed,
    ListReverse,
    OptionalFold,
    OptionalBuild,
}

impl Builtin {
    pub fn parse(s: &str) -> Option<Builtin> {
        use Builtin::*;
        Some(match s {
            "Bool" => Bool,
            "Natural" => Natural,
            "Integer" => Integer,
            "Double" => Double,
            "Text" => Text,
            "List" => List,
            "Optional" => Optional,
            "None" => OptionalNone,
            "Natural/build" => NaturalBuild,
            "Natural/fold" => NaturalFold,
            "Natural/isZero" => NaturalIsZero,
            "Natural/even" => NaturalEven,
            "Natural/odd" => NaturalOdd,
            "Natural/toInteger" => NaturalToInteger,
            "Natural/show" => NaturalShow,
            "Natural/subtract" => NaturalSubtract,
            "Integer/toDouble" => IntegerToDouble,
            "Integer/show" => IntegerShow,
            "Double/show" => DoubleShow,
            "Text/show" => TextShow,
            "List/build" => ListBuild,
            "List/fold" => ListFold,
            "List/length" => ListLength,
            "List/head" => ListHead,
            "List/last" => ListLast,
            "List/indexed" => ListIndexed,
            "List/reverse" => ListReverse,
            "Optional/fold" => OptionalFold,
            "Optional/build" => OptionalBuild,
            _ => return None,
        })
    }
}

/// A Dhall expression. Tagged union over every syntactic form the engine
/// evaluates; identity is structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// `Type`, `Kind`, `Sort`
    Const(Const),
    /// `x`, `x@n`
    Var(V),
    /// `λ(x : A) -> b`
    Lam(Label, SubExpr, SubExpr),
    /// `∀(x : A) -> B`
    Pi(Label, SubExpr, SubExpr),
    /// `f a`; n-ary application is left-nested
    App(SubExpr, SubExpr),
    /// `let x : t = a in b`
    Let(Label, Option<SubExpr>, SubExpr, SubExpr),
    /// `x : t`
    Annot(SubExpr, SubExpr),
    /// `assert : t`
    Assert(SubExpr),
    Builtin(Builtin),
    BoolLit(bool),
    NaturalLit(Natural),
    IntegerLit(Integer),
    DoubleLit(NaiveDouble),
    /// `"literal ${interpolated} text"`
    TextLit(InterpolatedText),
    BinOp(BinOp, SubExpr, SubExpr),
    /// `if p then t else e`
    BoolIf(SubExpr, SubExpr, SubExpr),
    /// `[] : List t`; carries the element type
    EmptyListLit(SubExpr),
    NEListLit(Vec<SubExpr>),
    /// `Some x`
    SomeLit(SubExpr),
    /// `None t` in normal form
    EmptyOptionalLit(SubExpr),
    /// `{ k : t, ... }`
    RecordType(BTreeMap<Label, SubExpr>),
    /// `{ k = v, ... }`
    RecordLit(BTreeMap<Label, SubExpr>),
    /// `< k : t | ... >`; an alternative without payload has no type
    UnionType(BTreeMap<Label, Option<SubExpr>>),
    /// `< k = v | ... >`; the alternatives exclude `k`
    UnionLit(Label, Option<SubExpr>, BTreeMap<Label, Option<SubExpr>>),
    /// `merge handlers union : t`
    Merge(SubExpr, SubExpr, Option<SubExpr>),
    /// `toMap record : t`
    ToMap(SubExpr, Option<SubExpr>),
    /// `r.x`
    Field(SubExpr, Label),
    /// `r.{ a, b }`
    Projection(SubExpr, Vec<Label>),
    /// `r.(t)`
    ProjectionByExpr(SubExpr, SubExpr),
    Import(Import),
}

impl Expr {
    /// Rebuild this node, mapping each direct subexpression through `map`,
    /// except subexpressions under a binder which go through `map_under`.
    /// Binder type annotations are not under the binder; only bodies are.
    pub fn map_subexprs_with_binders(
        &self,
        mut map: impl FnMut(&SubExpr) -> SubExpr,
        mut map_under: impl FnMut(&Label, &SubExpr) -> SubExpr,
    ) -> Expr {
        use Expr::*;
        match self {
            Const(_) | Var(_) | Builtin(_) | BoolLit(_) | NaturalLit(_)
            | IntegerLit(_) | DoubleLit(_) => self.clone(),
            Lam(x, t, b) => Lam(x.clone(), map(t), map_under(x, b)),
            Pi(x, t, b) => Pi(x.clone(), map(t), map_under(x, b)),
            App(f, a) => App(map(f), map(a)),
            Let(x, t, a, b) => Let(
                x.clone(),
                t.as_ref().map(&mut map),
                map(a),
                map_under(x, b),
            ),
            Annot(x, t) => Annot(map(x), map(t)),
            Assert(t) => Assert(map(t)),
            TextLit(txt) => TextLit(txt.map_exprs(&mut map)),
            BinOp(o, l, r) => BinOp(*o, map(l), map(r)),
            BoolIf(p, t, e) => BoolIf(map(p), map(t), map(e)),
            EmptyListLit(t) => EmptyListLit(map(t)),
            NEListLit(xs) => NEListLit(xs.iter().map(&mut map).collect()),
            SomeLit(x) => SomeLit(map(x)),
            EmptyOptionalLit(t) => EmptyOptionalLit(map(t)),
            RecordType(kts) => RecordType(
                kts.iter().map(|(k, t)| (k.clone(), map(t))).collect(),
            ),
            RecordLit(kvs) => RecordLit(
                kvs.iter().map(|(k, v)| (k.clone(), map(v))).collect(),
            ),
            UnionType(kts) => UnionType(
                kts.iter()
                    .map(|(k, t)| (k.clone(), t.as_ref().map(&mut map)))
                    .collect(),
            ),
            UnionLit(k, v, alts) => UnionLit(
                k.clone(),
                v.as_ref().map(&mut map),
                alts.iter()
                    .map(|(k, t)| (k.clone(), t.as_ref().map(&mut map)))
                    .collect(),
            ),
            Merge(r, u, t) => {
                Merge(map(r), map(u), t.as_ref().map(&mut map))
            }
            ToMap(r, t) => ToMap(map(r), t.as_ref().map(&mut map)),
            Field(r, l) => Field(map(r), l.clone()),
            Projection(r, ls) => Projection(map(r), ls.clone()),
            ProjectionByExpr(r, t) => ProjectionByExpr(map(r), map(t)),
            Import(i) => Import(i.map_headers(&mut map)),
        }
    }

    /// Visit each direct subexpression; those under a binder are reported
    /// with the binder's label.
    pub fn foreach_subexpr_with_binders<'a>(
        &'a self,
        on_subexpr: &mut impl FnMut(&'a SubExpr),
        on_subexpr_under: &mut impl FnMut(&Label, &'a SubExpr),
    ) {
        use Expr::*;
        match self {
            Const(_) | Var(_) | Builtin(_) | BoolLit(_) | NaturalLit(_)
            | IntegerLit(_) | DoubleLit(_) => {}
            Lam(x, t, b) | Pi(x, t, b) => {
                on_subexpr(t);
                on_subexpr_under(x, b);
            }
            App(f, a) => {
                on_subexpr(f);
                on_subexpr(a);
            }
            Let(x, t, a, b) => {
                if let Some(t) = t {
                    on_subexpr(t);
                }
                on_subexpr(a);
                on_subexpr_under(x, b);
            }
            Annot(x, t) => {
                on_subexpr(x);
                on_subexpr(t);
            }
            Assert(t) => on_subexpr(t),
            TextLit(txt) => txt.exprs().for_each(on_subexpr),
            BinOp(_, l, r) => {
                on_subexpr(l);
                on_subexpr(r);
            }
            BoolIf(p, t, e) => {
                on_subexpr(p);
                on_subexpr(t);
                on_subexpr(e);
            }
            EmptyListLit(t) => on_subexpr(t),
            NEListLit(xs) => xs.iter().for_each(on_subexpr),
            SomeLit(x) => on_subexpr(x),
            EmptyOptionalLit(t) => on_subexpr(t),
            RecordType(kts) => kts.values().for_each(on_subexpr),
            RecordLit(kvs) => kvs.values().for_each(on_subexpr),
            UnionType(kts) => {
                kts.values().flatten().for_each(on_subexpr)
            }
            UnionLit(_, v, alts) => {
                v.iter().for_each(&mut *on_subexpr);
                alts.values().flatten().for_each(on_subexpr);
            }
            Merge(r, u, t) => {
                on_subexpr(r);
                on_subexpr(u);
                t.iter().for_each(on_subexpr);
            }
            ToMap(r, t) => {
                on_subexpr(r);
                t.iter().for_each(on_subexpr);
            }
            Field(r, _) => on_subexpr(r),
            Projection(r, _) => on_subexpr(r),
            ProjectionByExpr(r, t) => {
                on_subexpr(r);
                on_subexpr(t);
            }
            Import(i) => {
                if let crate::import::ImportLocation::Remote(url) =
                    &i.location
                {
                    url.headers.iter().for_each(on_subexpr);
                }
            }
        }
    }

    pub fn from_builtin(b: Builtin) -> SubExpr {
        rc(Expr::Builtin(b))
    }
}
