//! The pipeline, with one wrapper type per phase so that the order
//! `parse → resolve → typecheck → normalize` is enforced by the types:
//! there is no way to obtain a `Normalized` without going through the
//! checks in between.

use sha2::{Digest, Sha256};
use tracing::trace;

use dhall_syntax::*;

use crate::error::{Error, ImportError, TypeError};

pub mod binary;
pub mod normalize;
pub mod resolve;
pub mod typecheck;

use resolve::Resolver;

/// An expression straight out of the parser or the binary decoder,
/// anchored at the location it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed(SubExpr, ImportLocation);

/// An expression with no `Import` nodes left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved(SubExpr);

/// A type-checked expression, carrying its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typed {
    expr: SubExpr,
    ty: SubExpr,
}

/// An expression in β-normal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized(SubExpr);

/// Run the whole pipeline on an already-parsed expression.
pub async fn load(
    expr: SubExpr,
    root: ImportLocation,
    resolver: &Resolver,
) -> Result<Normalized, Error> {
    Ok(Parsed::from_expr(expr, root)
        .resolve(resolver)
        .await?
        .typecheck()?
        .normalize())
}

impl Parsed {
    pub fn from_expr(expr: SubExpr, location: ImportLocation) -> Self {
        Parsed(expr, location)
    }

    /// Read a binary (`.dhallb`) expression.
    pub fn decode(
        bytes: &[u8],
        location: ImportLocation,
    ) -> Result<Self, Error> {
        Ok(Parsed(binary::decode(bytes)?, location))
    }

    pub fn encode(&self) -> Vec<u8> {
        binary::encode(&self.0)
    }

    pub async fn resolve(
        self,
        resolver: &Resolver,
    ) -> Result<Resolved, Error> {
        trace!(root = %self.1, "resolving");
        Ok(Resolved(resolver.resolve_expr(&self.0, &self.1).await?))
    }

    /// For import-free expressions; fails on the first import found
    /// instead of fetching anything.
    pub fn skip_resolve(self) -> Result<Resolved, Error> {
        if let Some(import) = find_import(&self.0) {
            return Err(Error::Resolve(ImportError::UnexpectedImport(
                import.location,
            )));
        }
        Ok(Resolved(self.0))
    }

    pub fn as_expr(&self) -> &SubExpr {
        &self.0
    }
}

impl Resolved {
    pub fn typecheck(self) -> Result<Typed, TypeError> {
        trace!("typechecking");
        let ty = typecheck::type_of(&self.0)?;
        Ok(Typed { expr: self.0, ty })
    }

    pub fn as_expr(&self) -> &SubExpr {
        &self.0
    }
}

impl Typed {
    pub fn normalize(self) -> Normalized {
        trace!("normalizing");
        Normalized(normalize::normalize(&self.expr))
    }

    pub fn get_type(&self) -> &SubExpr {
        &self.ty
    }

    pub fn as_expr(&self) -> &SubExpr {
        &self.expr
    }
}

impl Normalized {
    pub fn as_expr(&self) -> &SubExpr {
        &self.0
    }

    pub fn into_expr(self) -> SubExpr {
        self.0
    }

    /// The canonical binary form, as written to `.dhallb` files.
    pub fn encode(&self) -> Vec<u8> {
        binary::encode(&self.0)
    }

    pub fn to_expr_alpha(&self) -> SubExpr {
        alpha_normalize(&self.0)
    }

    /// The semantic hash: two sources with the same normal form have the
    /// same hash, whatever their spelling.
    pub fn semantic_hash(&self) -> String {
        let digest =
            Sha256::digest(&binary::encode(&self.to_expr_alpha()));
        format!("sha256:{}", hex::encode(digest))
    }

    /// The content-addressed file name used by the on-disk cache.
    pub fn cache_file_name(&self) -> String {
        let digest =
            Sha256::digest(&binary::encode(&self.to_expr_alpha()));
        format!("1220{}", hex::encode(digest))
    }

    /// Apply a normalized function to an argument and renormalize. This
    /// is how hosts call Dhall functions.
    pub fn apply(&self, arg: &Normalized) -> Normalized {
        Normalized(normalize::normalize(&rc(Expr::App(
            self.0.clone(),
            arg.0.clone(),
        ))))
    }
}

fn find_import(expr: &SubExpr) -> Option<Import> {
    match expr.as_ref() {
        Expr::Import(i) => Some(i.clone()),
        e => {
            let found = std::cell::RefCell::new(None);
            e.foreach_subexpr_with_binders(
                &mut |s| {
                    if found.borrow().is_none() {
                        *found.borrow_mut() = find_import(s);
                    }
                },
                &mut |_, s| {
                    if found.borrow().is_none() {
                        *found.borrow_mut() = find_import(s);
                    }
                },
            );
            found.into_inner()
        }
    }
}

macro_rules! derive_display_via_expr {
    ($ty:ident) => {
        impl std::fmt::Display for $ty {
            fn fmt(
                &self,
                f: &mut std::fmt::Formatter,
            ) -> Result<(), std::fmt::Error> {
                self.as_expr().fmt(f)
            }
        }
    };
}

derive_display_via_expr!(Parsed);
derive_display_via_expr!(Resolved);
derive_display_via_expr!(Typed);
derive_display_via_expr!(Normalized);

impl std::hash::Hash for Normalized {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        self.encode().hash(state)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use pretty_assertions::assert_eq;

    use super::*;

    fn nat(n: u64) -> SubExpr {
        rc(Expr::NaturalLit(BigUint::from(n)))
    }

    fn pipeline(e: SubExpr) -> Normalized {
        Parsed::from_expr(
            e,
            ImportLocation::Local(
                FilePrefix::Here,
                vec!["test.dhall".to_owned()],
            ),
        )
        .skip_resolve()
        .unwrap()
        .typecheck()
        .unwrap()
        .normalize()
    }

    #[test]
    fn the_hash_of_two_is_the_golden_value() {
        let n = pipeline(rc(Expr::BinOp(
            BinOp::NaturalPlus,
            nat(1),
            nat(1),
        )));
        assert_eq!(n.encode(), vec![0x82, 0x0f, 0x02]);
        assert_eq!(
            n.semantic_hash(),
            "sha256:4caf97e8c445d4d4b5c5b992973e098ed4ae88a355915f5a59db640a589bc9cb"
        );
        assert_eq!(
            n.cache_file_name(),
            "12204caf97e8c445d4d4b5c5b992973e098ed4ae88a355915f5a59db640a589bc9cb"
        );
    }

    #[test]
    fn the_hash_ignores_let_names_and_spelling() {
        let with_x = rc(Expr::Let(
            "x".into(),
            None,
            nat(1),
            rc(Expr::BinOp(
                BinOp::NaturalPlus,
                rc(Expr::Var(V("x".into(), 0))),
                rc(Expr::Var(V("x".into(), 0))),
            )),
        ));
        let with_y = rc(Expr::Let(
            "y".into(),
            None,
            nat(1),
            rc(Expr::BinOp(
                BinOp::NaturalPlus,
                rc(Expr::Var(V("y".into(), 0))),
                rc(Expr::Var(V("y".into(), 0))),
            )),
        ));
        let literal = nat(2);
        let h = pipeline(literal).semantic_hash();
        assert_eq!(pipeline(with_x).semantic_hash(), h);
        assert_eq!(pipeline(with_y).semantic_hash(), h);
    }

    #[test]
    fn the_hash_ignores_bound_variable_names() {
        let natural = Expr::from_builtin(Builtin::Natural);
        let id_x = rc(Expr::Lam(
            "x".into(),
            natural.clone(),
            rc(Expr::Var(V("x".into(), 0))),
        ));
        let id_y = rc(Expr::Lam(
            "y".into(),
            natural,
            rc(Expr::Var(V("y".into(), 0))),
        ));
        assert_eq!(
            pipeline(id_x).semantic_hash(),
            pipeline(id_y).semantic_hash()
        );
    }

    #[test]
    fn skip_resolve_rejects_imports() {
        let e = rc(Expr::Import(Import {
            mode: ImportMode::Code,
            location: ImportLocation::Missing,
            hash: None,
        }));
        let err = Parsed::from_expr(e, ImportLocation::Missing)
            .skip_resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Resolve(ImportError::UnexpectedImport(_))
        ));
    }

    #[test]
    fn normalized_functions_are_callable() {
        let natural = Expr::from_builtin(Builtin::Natural);
        let f = pipeline(rc(Expr::Lam(
            "x".into(),
            natural,
            rc(Expr::BinOp(
                BinOp::NaturalPlus,
                rc(Expr::Var(V("x".into(), 0))),
                nat(1),
            )),
        )));
        let result = f.apply(&pipeline(nat(41)));
        assert_eq!(result.as_expr(), &nat(42));
    }

    #[test]
    fn decode_encode_through_the_wrapper() {
        let p = Parsed::decode(
            &[0x82, 0x0f, 0x02],
            ImportLocation::Missing,
        )
        .unwrap();
        assert_eq!(p.encode(), vec![0x82, 0x0f, 0x02]);
    }
}
