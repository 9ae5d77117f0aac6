//! Conversion between host values and expressions, built on serde:
//! anything `Serialize` can become an expression and any normal form in
//! the value sub-grammar can be read back into a `Deserialize` type.
//! Functions are not data; they are applied through
//! [`crate::phase::Normalized::apply`].

mod de;
mod ser;
mod static_type;

pub use de::{from_dhall, from_dhall_typed};
pub use ser::to_dhall;
pub use static_type::StaticType;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("{0}")]
    Custom(String),
    #[error("this host value has no Dhall representation: {0}")]
    Unsupported(&'static str),
    #[error("expected {expected}, found {found}")]
    WrongShape {
        expected: &'static str,
        found: String,
    },
    #[error("the Dhall value does not fit the host type: {0}")]
    OutOfRange(String),
}

impl serde::ser::Error for InterchangeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        InterchangeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for InterchangeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        InterchangeError::Custom(msg.to_string())
    }
}
