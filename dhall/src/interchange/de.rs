use std::collections::btree_map;

use num_traits::ToPrimitive;
use serde::de::{self, DeserializeOwned, IntoDeserializer};

use dhall_syntax::*;

use super::{InterchangeError, StaticType};
use crate::phase::normalize::normalize;
use crate::phase::typecheck::type_of;
use crate::phase::Normalized;

type Result<T> = std::result::Result<T, InterchangeError>;

/// Read a host value back out of a normal form.
pub fn from_dhall<T: DeserializeOwned>(value: &Normalized) -> Result<T> {
    T::deserialize(ExprDeserializer(value.as_expr()))
}

/// Like [`from_dhall`], but first checks the expression against the
/// host type's Dhall type.
pub fn from_dhall_typed<T: DeserializeOwned + StaticType>(
    value: &Normalized,
) -> Result<T> {
    let expected = normalize(&T::static_type());
    let actual = type_of(value.as_expr())
        .map_err(|e| InterchangeError::Custom(e.to_string()))?;
    if alpha_normalize(&expected) != alpha_normalize(&actual) {
        return Err(InterchangeError::WrongShape {
            expected: "a value of the host type",
            found: actual.to_string(),
        });
    }
    from_dhall(value)
}

struct ExprDeserializer<'de>(&'de SubExpr);

fn wrong_shape<T>(expected: &'static str, e: &SubExpr) -> Result<T> {
    Err(InterchangeError::WrongShape {
        expected,
        found: e.to_string(),
    })
}

impl<'de> de::Deserializer<'de> for ExprDeserializer<'de> {
    type Error = InterchangeError;

    fn deserialize_any<V: de::Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value> {
        match self.0.as_ref() {
            Expr::BoolLit(b) => visitor.visit_bool(*b),
            Expr::NaturalLit(n) => match n.to_u64() {
                Some(n) => visitor.visit_u64(n),
                None => Err(InterchangeError::OutOfRange(n.to_string())),
            },
            Expr::IntegerLit(n) => match n.to_i64() {
                Some(n) => visitor.visit_i64(n),
                None => Err(InterchangeError::OutOfRange(n.to_string())),
            },
            Expr::DoubleLit(d) => visitor.visit_f64(f64::from(*d)),
            Expr::TextLit(t) => match t.as_plain_text() {
                Some(s) => visitor.visit_str(s),
                None => wrong_shape("an interpolation-free text", self.0),
            },
            Expr::NEListLit(xs) => {
                visitor.visit_seq(SeqDeserializer(xs.iter()))
            }
            Expr::EmptyListLit(_) => {
                let empty: &'de [SubExpr] = &[];
                visitor.visit_seq(SeqDeserializer(empty.iter()))
            }
            Expr::SomeLit(x) => visitor.visit_some(ExprDeserializer(x)),
            Expr::EmptyOptionalLit(_) => visitor.visit_none(),
            Expr::RecordLit(kvs) => {
                visitor.visit_map(MapDeserializer {
                    iter: kvs.iter(),
                    value: None,
                })
            }
            Expr::UnionLit(_, _, _) | Expr::Field(_, _) => {
                visitor.visit_enum(EnumDeserializer(self.0))
            }
            _ => wrong_shape("a normal-form value", self.0),
        }
    }

    fn deserialize_option<V: de::Visitor<'de>>(
        self,
        visitor: V,
    ) -> Result<V::Value> {
        match self.0.as_ref() {
            Expr::SomeLit(x) => visitor.visit_some(ExprDeserializer(x)),
            Expr::EmptyOptionalLit(_) => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.0.as_ref() {
            Expr::UnionLit(_, _, _) | Expr::Field(_, _) => {
                visitor.visit_enum(EnumDeserializer(self.0))
            }
            _ => wrong_shape("a union value", self.0),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

struct SeqDeserializer<'de>(std::slice::Iter<'de, SubExpr>);

impl<'de> de::SeqAccess<'de> for SeqDeserializer<'de> {
    type Error = InterchangeError;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>> {
        match self.0.next() {
            Some(e) => seed.deserialize(ExprDeserializer(e)).map(Some),
            None => Ok(None),
        }
    }
}

struct MapDeserializer<'de> {
    iter: btree_map::Iter<'de, Label, SubExpr>,
    value: Option<&'de SubExpr>,
}

impl<'de> de::MapAccess<'de> for MapDeserializer<'de> {
    type Error = InterchangeError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>> {
        match self.iter.next() {
            Some((k, v)) => {
                self.value = Some(v);
                seed.deserialize(k.as_ref().into_deserializer())
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value> {
        let value =
            self.value.take().expect("next_value follows next_key");
        seed.deserialize(ExprDeserializer(value))
    }
}

/// Union values: either the literal form or a payload-free constructor
/// selection `< A | ... >.A`.
struct EnumDeserializer<'de>(&'de SubExpr);

impl<'de> EnumDeserializer<'de> {
    fn parts(&self) -> Result<(&'de Label, Option<&'de SubExpr>)> {
        match self.0.as_ref() {
            Expr::UnionLit(tag, payload, _) => {
                Ok((tag, payload.as_ref()))
            }
            Expr::Field(u, tag) => match u.as_ref() {
                Expr::UnionType(_) => Ok((tag, None)),
                _ => wrong_shape("a union value", self.0),
            },
            _ => wrong_shape("a union value", self.0),
        }
    }
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer<'de> {
    type Error = InterchangeError;
    type Variant = VariantDeserializer<'de>;

    fn variant_seed<V: de::DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant)> {
        let (tag, payload) = self.parts()?;
        let value = seed.deserialize(tag.as_ref().into_deserializer())?;
        Ok((value, VariantDeserializer(payload)))
    }
}

struct VariantDeserializer<'de>(Option<&'de SubExpr>);

impl<'de> de::VariantAccess<'de> for VariantDeserializer<'de> {
    type Error = InterchangeError;

    fn unit_variant(self) -> Result<()> {
        match self.0 {
            None => Ok(()),
            Some(e) => wrong_shape("an alternative without payload", e),
        }
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value> {
        match self.0 {
            Some(e) => seed.deserialize(ExprDeserializer(e)),
            None => Err(InterchangeError::WrongShape {
                expected: "an alternative with a payload",
                found: "a bare alternative".to_owned(),
            }),
        }
    }

    fn tuple_variant<V: de::Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        match self.0 {
            Some(e) => {
                de::Deserializer::deserialize_any(
                    ExprDeserializer(e),
                    visitor,
                )
            }
            None => Err(InterchangeError::WrongShape {
                expected: "an alternative with a payload",
                found: "a bare alternative".to_owned(),
            }),
        }
    }

    fn struct_variant<V: de::Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        self.tuple_variant(0, visitor)
    }
}
