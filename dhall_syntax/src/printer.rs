use std::fmt::{self, Display};

use itertools::Itertools;

use crate::expr::*;
use crate::import::*;
use crate::label::Label;
use crate::text::{InterpolatedText, InterpolatedTextContents};
use crate::var::V;

/// Where in the grammar a subexpression is being printed; anything looser
/// than the slot allows gets parenthesized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PrintPhase {
    Base,
    Operator,
    App,
    Primitive,
}

impl Expr {
    fn natural_phase(&self) -> PrintPhase {
        use Expr::*;
        match self {
            Lam(_, _, _) | Let(_, _, _, _) | BoolIf(_, _, _) | Annot(_, _)
            | Assert(_) | EmptyListLit(_) => PrintPhase::Base,
            Pi(_, _, _) => PrintPhase::Base,
            Merge(_, _, Some(_)) | ToMap(_, Some(_)) => PrintPhase::Base,
            BinOp(_, _, _) => PrintPhase::Operator,
            App(_, _)
            | SomeLit(_)
            | EmptyOptionalLit(_)
            | Merge(_, _, None)
            | ToMap(_, None) => PrintPhase::App,
            _ => PrintPhase::Primitive,
        }
    }

    fn fmt_phase(
        &self,
        f: &mut fmt::Formatter,
        phase: PrintPhase,
    ) -> fmt::Result {
        use Expr::*;
        use PrintPhase::{App as PhaseApp, Base, Operator, Primitive};

        if phase > self.natural_phase() {
            write!(f, "(")?;
            self.fmt_phase(f, Base)?;
            return write!(f, ")");
        }

        match self {
            Const(c) => write!(f, "{}", c),
            Var(v) => write!(f, "{}", v),
            Builtin(b) => write!(f, "{}", b),
            BoolLit(true) => write!(f, "True"),
            BoolLit(false) => write!(f, "False"),
            NaturalLit(n) => write!(f, "{}", n),
            IntegerLit(n) => {
                if n.sign() == num_bigint::Sign::Minus {
                    write!(f, "{}", n)
                } else {
                    write!(f, "+{}", n)
                }
            }
            DoubleLit(d) => write!(f, "{}", d),
            TextLit(t) => write!(f, "{}", t),
            Lam(x, t, b) => {
                write!(f, "λ({} : ", x)?;
                t.fmt_phase(f, Base)?;
                write!(f, ") → ")?;
                b.fmt_phase(f, Base)
            }
            Pi(x, t, b) if x.as_ref() == "_" => {
                t.fmt_phase(f, Operator)?;
                write!(f, " → ")?;
                b.fmt_phase(f, Base)
            }
            Pi(x, t, b) => {
                write!(f, "∀({} : ", x)?;
                t.fmt_phase(f, Base)?;
                write!(f, ") → ")?;
                b.fmt_phase(f, Base)
            }
            App(func, a) => {
                func.fmt_phase(f, PhaseApp)?;
                write!(f, " ")?;
                a.fmt_phase(f, Primitive)
            }
            Let(x, t, a, b) => {
                write!(f, "let {}", x)?;
                if let Some(t) = t {
                    write!(f, " : ")?;
                    t.fmt_phase(f, Base)?;
                }
                write!(f, " = ")?;
                a.fmt_phase(f, Base)?;
                write!(f, " in ")?;
                b.fmt_phase(f, Base)
            }
            Annot(x, t) => {
                x.fmt_phase(f, Operator)?;
                write!(f, " : ")?;
                t.fmt_phase(f, Base)
            }
            Assert(t) => {
                write!(f, "assert : ")?;
                t.fmt_phase(f, Base)
            }
            BinOp(op, l, r) => {
                l.fmt_phase(f, PhaseApp)?;
                write!(f, " {} ", op)?;
                r.fmt_phase(f, PhaseApp)
            }
            BoolIf(p, t, e) => {
                write!(f, "if ")?;
                p.fmt_phase(f, Base)?;
                write!(f, " then ")?;
                t.fmt_phase(f, Base)?;
                write!(f, " else ")?;
                e.fmt_phase(f, Base)
            }
            EmptyListLit(t) => {
                write!(f, "[] : List ")?;
                t.fmt_phase(f, Primitive)
            }
            NEListLit(xs) => {
                write!(f, "[")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    x.fmt_phase(f, Base)?;
                }
                write!(f, "]")
            }
            SomeLit(x) => {
                write!(f, "Some ")?;
                x.fmt_phase(f, Primitive)
            }
            EmptyOptionalLit(t) => {
                write!(f, "None ")?;
                t.fmt_phase(f, Primitive)
            }
            RecordType(kts) if kts.is_empty() => write!(f, "{{}}"),
            RecordType(kts) => {
                write!(f, "{{ ")?;
                for (i, (k, t)) in kts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : ", k)?;
                    t.fmt_phase(f, Base)?;
                }
                write!(f, " }}")
            }
            RecordLit(kvs) if kvs.is_empty() => write!(f, "{{=}}"),
            RecordLit(kvs) => {
                write!(f, "{{ ")?;
                for (i, (k, v)) in kvs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = ", k)?;
                    v.fmt_phase(f, Base)?;
                }
                write!(f, " }}")
            }
            UnionType(kts) => {
                write!(f, "<")?;
                for (i, (k, t)) in kts.iter().enumerate() {
                    write!(f, "{}", if i == 0 { " " } else { " | " })?;
                    write!(f, "{}", k)?;
                    if let Some(t) = t {
                        write!(f, " : ")?;
                        t.fmt_phase(f, Base)?;
                    }
                }
                write!(f, " >")
            }
            UnionLit(k, v, alts) => {
                write!(f, "< {}", k)?;
                if let Some(v) = v {
                    write!(f, " = ")?;
                    v.fmt_phase(f, Base)?;
                }
                for (k, t) in alts {
                    write!(f, " | {}", k)?;
                    if let Some(t) = t {
                        write!(f, " : ")?;
                        t.fmt_phase(f, Base)?;
                    }
                }
                write!(f, " >")
            }
            Merge(r, u, t) => {
                write!(f, "merge ")?;
                r.fmt_phase(f, Primitive)?;
                write!(f, " ")?;
                u.fmt_phase(f, Primitive)?;
                if let Some(t) = t {
                    write!(f, " : ")?;
                    t.fmt_phase(f, PhaseApp)?;
                }
                Ok(())
            }
            ToMap(r, t) => {
                write!(f, "toMap ")?;
                r.fmt_phase(f, Primitive)?;
                if let Some(t) = t {
                    write!(f, " : ")?;
                    t.fmt_phase(f, PhaseApp)?;
                }
                Ok(())
            }
            Field(r, l) => {
                r.fmt_phase(f, Primitive)?;
                write!(f, ".{}", l)
            }
            Projection(r, ls) => {
                r.fmt_phase(f, Primitive)?;
                write!(f, ".{{ {} }}", ls.iter().join(", "))
            }
            ProjectionByExpr(r, t) => {
                r.fmt_phase(f, Primitive)?;
                write!(f, ".(")?;
                t.fmt_phase(f, Base)?;
                write!(f, ")")
            }
            Import(i) => write!(f, "{}", i),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_phase(f, PrintPhase::Base)
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Const::Type => write!(f, "Type"),
            Const::Kind => write!(f, "Kind"),
            Const::Sort => write!(f, "Sort"),
        }
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Builtin::*;
        let s = match self {
            Bool => "Bool",
            Natural => "Natural",
            Integer => "Integer",
            Double => "Double",
            Text => "Text",
            List => "List",
            Optional => "Optional",
            OptionalNone => "None",
            NaturalBuild => "Natural/build",
            NaturalFold => "Natural/fold",
            NaturalIsZero => "Natural/isZero",
            NaturalEven => "Natural/even",
            NaturalOdd => "Natural/odd",
            NaturalToInteger => "Natural/toInteger",
            NaturalShow => "Natural/show",
            NaturalSubtract => "Natural/subtract",
            IntegerToDouble => "Integer/toDouble",
            IntegerShow => "Integer/show",
            DoubleShow => "Double/show",
            TextShow => "Text/show",
            ListBuild => "List/build",
            ListFold => "List/fold",
            ListLength => "List/length",
            ListHead => "List/head",
            ListLast => "List/last",
            ListIndexed => "List/indexed",
            ListReverse => "List/reverse",
            OptionalFold => "Optional/fold",
            OptionalBuild => "Optional/build",
        };
        f.write_str(s)
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BinOp::*;
        f.write_str(match self {
            BoolOr => "||",
            BoolAnd => "&&",
            BoolEQ => "==",
            BoolNE => "!=",
            NaturalPlus => "+",
            NaturalTimes => "*",
            TextAppend => "++",
            ListAppend => "#",
            RecursiveRecordMerge => "∧",
            RightBiasedRecordMerge => "⫽",
            RecursiveRecordTypeMerge => "⩓",
            ImportAlt => "?",
            Equivalence => "≡",
        })
    }
}

impl Display for NaiveDouble {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let v = f64::from(*self);
        if v == f64::INFINITY {
            f.write_str("Infinity")
        } else if v == f64::NEG_INFINITY {
            f.write_str("-Infinity")
        } else if v.is_nan() {
            f.write_str("NaN")
        } else if v == v.trunc() && v.abs() < 1e15 {
            write!(f, "{:.1}", v)
        } else {
            write!(f, "{}", v)
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = self.as_ref();
        let simple = !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !s.starts_with(|c: char| c.is_ascii_digit())
            && !is_keyword(s);
        if simple {
            f.write_str(s)
        } else {
            write!(f, "`{}`", s)
        }
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "let"
            | "in"
            | "if"
            | "then"
            | "else"
            | "merge"
            | "toMap"
            | "assert"
            | "using"
            | "missing"
            | "as"
            | "Some"
            | "forall"
            | "with"
    )
}

impl Display for V {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let V(x, n) = self;
        if *n == 0 {
            write!(f, "{}", x)
        } else {
            write!(f, "{}@{}", x, n)
        }
    }
}

fn fmt_text_chunk(s: &str, f: &mut fmt::Formatter) -> fmt::Result {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '$' if chars.peek() == Some(&'{') => f.write_str("\\u0024")?,
            '\u{0008}' => f.write_str("\\b")?,
            '\u{000C}' => f.write_str("\\f")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl Display for InterpolatedText {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"")?;
        for chunk in self.iter() {
            match chunk {
                InterpolatedTextContents::Text(s) => fmt_text_chunk(s, f)?,
                InterpolatedTextContents::Expr(e) => {
                    write!(f, "${{ {} }}", e)?;
                }
            }
        }
        write!(f, "\"")
    }
}

impl Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if let Some(hash) = &self.hash {
            write!(f, " {}", hash.to_hash_string())?;
        }
        match self.mode {
            ImportMode::Code => Ok(()),
            ImportMode::RawText => write!(f, " as Text"),
            ImportMode::Location => write!(f, " as Location"),
        }
    }
}

impl Display for ImportLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportLocation::Local(prefix, components) => {
                let prefix = match prefix {
                    FilePrefix::Absolute => "",
                    FilePrefix::Here => ".",
                    FilePrefix::Parent => "..",
                    FilePrefix::Home => "~",
                };
                write!(f, "{}/{}", prefix, components.iter().join("/"))
            }
            ImportLocation::Remote(url) => write!(f, "{}", url),
            ImportLocation::Env(name) => {
                write!(f, "env:{}", render_env_name(name))
            }
            ImportLocation::Missing => write!(f, "missing"),
        }
    }
}

impl Display for URL {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::HTTP => "http",
            Scheme::HTTPS => "https",
        };
        write!(f, "{}://{}/{}", scheme, self.authority, self.path.iter().join("/"))?;
        if let Some(q) = &self.query {
            write!(f, "?{}", q)?;
        }
        if let Some(headers) = &self.headers {
            write!(f, " using {}", headers)?;
        }
        Ok(())
    }
}
