#![allow(non_snake_case)]

pub mod context;
mod expr;
mod import;
mod label;
mod printer;
mod text;
mod var;

pub use crate::expr::*;
pub use crate::import::*;
pub use crate::label::*;
pub use crate::printer::*;
pub use crate::text::*;
pub use crate::var::*;
