use thiserror::Error;

use dhall_syntax::context::Context;
use dhall_syntax::{BinOp, ImportLocation, Label, SubExpr, V};

pub type Result<T> = std::result::Result<T, Error>;

/// The umbrella over everything the pipeline can fail with. No other
/// error type crosses the public API boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Resolve(#[from] ImportError),
    #[error("{0}")]
    Typecheck(#[from] TypeError),
}

/// Produced by the external parser and surfaced verbatim.
#[derive(Debug, Clone, Error)]
#[error("parse error at offset {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

/// A malformed binary expression.
#[derive(Debug, Clone, Error)]
#[error("decode error at byte {position}: {message}")]
pub struct DecodeError {
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("the import is `missing`")]
    Missing,
    #[error("environment read {0} is not allowed under a remote parent")]
    Banned(ImportLocation),
    #[error("import cycle through {0}")]
    Loop(ImportLocation),
    #[error("import graph exceeds the depth limit of {limit}")]
    DepthExceeded { limit: usize },
    #[error("integrity check failure: declared {expected}, computed {actual}")]
    IntegrityFailure { expected: String, actual: String },
    #[error("failed to fetch {location}: {cause}")]
    FetchFailed {
        location: ImportLocation,
        status: Option<u16>,
        cause: String,
    },
    #[error("deadline expired while resolving imports")]
    Timeout,
    #[error("fetched bytes are neither valid binary nor UTF-8 source")]
    InvalidEncoding(ImportLocation),
    #[error("remote import {parent} may not reach local {child}")]
    RemoteImportsLocal {
        parent: ImportLocation,
        child: ImportLocation,
    },
    #[error("unexpected import in an import-free load: {0}")]
    UnexpectedImport(ImportLocation),
}

/// A structured type error: the specific message plus the subtree it
/// applies to and the context it happened in.
#[derive(Debug, Error)]
#[error("{message}\n  in expression: {current}")]
pub struct TypeError {
    pub context: Context<Label, SubExpr>,
    pub current: SubExpr,
    pub message: TypeMessage,
}

impl TypeError {
    pub fn new(
        context: &Context<Label, SubExpr>,
        current: &SubExpr,
        message: TypeMessage,
    ) -> Self {
        TypeError {
            context: context.clone(),
            current: current.clone(),
            message,
        }
    }
}

/// The specific type error.
#[derive(Debug, Error)]
pub enum TypeMessage {
    #[error("unbound variable {0}")]
    FreeVariable(V),
    #[error("the `then` branch has type {0} but the `else` branch has type {1}")]
    MismatchedIf(SubExpr, SubExpr),
    #[error("the predicate of `if` has type {0}, not Bool")]
    NonBoolPredicate(SubExpr),
    #[error("list elements have type {0}, but one has type {1}")]
    HeterogeneousList(SubExpr, SubExpr),
    #[error("a list element type must be a Type, not {0}")]
    NonTypeListElement(SubExpr),
    #[error("record field {0} lives in a different universe than its siblings")]
    RecordFieldKindMismatch(Label),
    #[error("union alternative {0} lives in a different universe than its siblings")]
    UnionAlternativeKindMismatch(Label),
    #[error("`merge` is missing a handler for alternative {0}")]
    HandlerMissing(Label),
    #[error("`merge` has a handler {0} but no alternative of that name")]
    ExtraneousHandler(Label),
    #[error("`merge` handlers disagree on their output: {0} versus {1}")]
    HandlerOutputMismatch(SubExpr, SubExpr),
    #[error("the handler for {0} must be a function")]
    HandlerNotFunction(Label),
    #[error("the second argument of `merge` has type {0}, not a union")]
    MergeOnNonUnion(SubExpr),
    #[error("the first argument of `merge` has type {0}, not a record")]
    MergeOnNonRecord(SubExpr),
    #[error("only a record can be projected, not a value of type {0}")]
    NonRecordProjection(SubExpr),
    #[error("record has no field named {0}")]
    MissingRecordField(Label, SubExpr),
    #[error("{0} is not a function and cannot be applied")]
    ApplicationNotFunction(SubExpr),
    #[error("the function expects an argument of type {expected} but got {actual}")]
    ApplicationTypeMismatch { expected: SubExpr, actual: SubExpr },
    #[error("annotated with {annotated} but the inferred type is {inferred}")]
    AnnotationMismatch { annotated: SubExpr, inferred: SubExpr },
    #[error("assertion failed: {0} is not equivalent to {1}")]
    AssertionNotEquivalent(SubExpr, SubExpr),
    #[error("Sort has no type")]
    SortHasNoType,
    #[error("unknown builtin {0}")]
    UnknownBuiltin(String),
    #[error("record has a duplicate field {0}")]
    DuplicateRecordField(Label),
    #[error("a function input cannot have type {0}")]
    InvalidInputType(SubExpr),
    #[error("a function output cannot have type {0}")]
    InvalidOutputType(SubExpr),
    #[error("a list must be annotated with a `List` type, not {0}")]
    InvalidListType(SubExpr),
    #[error("an Optional payload must be a term, but its type is {0}")]
    InvalidOptionalType(SubExpr),
    #[error("wrong operand type for `{0}`: {1}")]
    BinOpTypeMismatch(BinOp, SubExpr),
    #[error("`assert` must be given an equivalence, not {0}")]
    AssertMustTakeEquivalence(SubExpr),
    #[error("the two sides of `≡` have different types: {0} versus {1}")]
    EquivalenceTypeMismatch(SubExpr, SubExpr),
    #[error("an equivalence can only relate terms")]
    EquivalenceArgumentMustBeTerm(SubExpr),
    #[error("a `merge` of an empty union needs a type annotation")]
    MergeEmptyNeedsAnnotation,
    #[error("`toMap` of an empty record needs a type annotation")]
    ToMapEmptyNeedsAnnotation,
    #[error("`toMap` field {0} does not have the same type as its siblings")]
    ToMapFieldTypeMismatch(Label),
    #[error("`if` branches must be terms, not types or kinds")]
    IfBranchMustBeTerm(SubExpr),
    #[error("interpolated expressions must have type Text, not {0}")]
    InvalidTextInterpolation(SubExpr),
}
