use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};
use serde::ser::{self, Serialize};
use sha2::{Digest, Sha256};

use dhall_syntax::*;

use super::InterchangeError;
use crate::phase::binary;
use crate::phase::typecheck::type_of;

type Result<T> = std::result::Result<T, InterchangeError>;

/// Build the expression representing a host value.
pub fn to_dhall<T: Serialize>(value: &T) -> Result<SubExpr> {
    value.serialize(Serializer)
}

struct Serializer;

fn text_lit(s: &str) -> SubExpr {
    rc(Expr::TextLit(s.into()))
}

impl ser::Serializer for Serializer {
    type Ok = SubExpr;
    type Error = InterchangeError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = TupleBuilder;
    type SerializeTupleStruct = TupleBuilder;
    type SerializeTupleVariant = TupleVariantBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = StructVariantBuilder;

    fn serialize_bool(self, v: bool) -> Result<SubExpr> {
        Ok(rc(Expr::BoolLit(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<SubExpr> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<SubExpr> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<SubExpr> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<SubExpr> {
        Ok(rc(Expr::IntegerLit(BigInt::from(v))))
    }

    fn serialize_u8(self, v: u8) -> Result<SubExpr> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<SubExpr> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<SubExpr> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<SubExpr> {
        Ok(rc(Expr::NaturalLit(BigUint::from(v))))
    }

    fn serialize_f32(self, v: f32) -> Result<SubExpr> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<SubExpr> {
        Ok(rc(Expr::DoubleLit(v.into())))
    }

    fn serialize_char(self, v: char) -> Result<SubExpr> {
        Ok(text_lit(&v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<SubExpr> {
        Ok(text_lit(v))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<SubExpr> {
        Err(InterchangeError::Unsupported("raw byte strings"))
    }

    fn serialize_none(self) -> Result<SubExpr> {
        Err(InterchangeError::Unsupported(
            "a bare None carries no element type; annotate the value",
        ))
    }

    fn serialize_some<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<SubExpr> {
        Ok(rc(Expr::SomeLit(value.serialize(Serializer)?)))
    }

    fn serialize_unit(self) -> Result<SubExpr> {
        Ok(rc(Expr::RecordLit(BTreeMap::new())))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<SubExpr> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<SubExpr> {
        Ok(rc(Expr::UnionLit(variant.into(), None, BTreeMap::new())))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<SubExpr> {
        value.serialize(Serializer)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<SubExpr> {
        Ok(rc(Expr::UnionLit(
            variant.into(),
            Some(value.serialize(Serializer)?),
            BTreeMap::new(),
        )))
    }

    fn serialize_seq(
        self,
        _len: Option<usize>,
    ) -> Result<Self::SerializeSeq> {
        Ok(SeqBuilder {
            elements: Vec::new(),
        })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(TupleBuilder {
            elements: Vec::new(),
        })
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(TupleBuilder {
            elements: Vec::new(),
        })
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Ok(TupleVariantBuilder {
            variant,
            inner: TupleBuilder {
                elements: Vec::new(),
            },
        })
    }

    fn serialize_map(
        self,
        _len: Option<usize>,
    ) -> Result<Self::SerializeMap> {
        Ok(MapBuilder {
            fields: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct> {
        self.serialize_map(None)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Ok(StructVariantBuilder {
            variant,
            fields: BTreeMap::new(),
        })
    }
}

struct SeqBuilder {
    elements: Vec<SubExpr>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        self.elements.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        list_of(self.elements)
    }
}

/// Build a list; a mixed-type sequence synthesizes an anonymous union
/// and injects every element into it.
fn list_of(elements: Vec<SubExpr>) -> Result<SubExpr> {
    if elements.is_empty() {
        return Err(InterchangeError::Unsupported(
            "an empty list carries no element type; annotate the value",
        ));
    }
    let types = elements
        .iter()
        .map(|e| {
            type_of(e).map_err(|err| {
                InterchangeError::Custom(err.to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let homogeneous = types
        .iter()
        .all(|t| alpha_normalize(t) == alpha_normalize(&types[0]));
    if homogeneous {
        return Ok(rc(Expr::NEListLit(elements)));
    }

    // One alternative per distinct element type
    let mut alts: BTreeMap<Label, Option<SubExpr>> = BTreeMap::new();
    let mut tags: Vec<Label> = Vec::new();
    for t in &types {
        let tag = tag_for_type(t);
        if !alts.contains_key(&tag) {
            alts.insert(tag.clone(), Some(t.clone()));
        }
        tags.push(tag);
    }
    let wrapped = elements
        .into_iter()
        .zip(tags)
        .map(|(e, tag)| {
            let mut rest = alts.clone();
            rest.remove(&tag);
            rc(Expr::UnionLit(tag, Some(e), rest))
        })
        .collect();
    Ok(rc(Expr::NEListLit(wrapped)))
}

/// The union tag for an element of a mixed list: the builtin's own name
/// for scalars, otherwise the shape plus a fingerprint of the type so
/// that distinct compound types cannot collide.
fn tag_for_type(t: &SubExpr) -> Label {
    match t.as_ref() {
        Expr::Builtin(b) if matches!(
            *b,
            Builtin::Bool
                | Builtin::Natural
                | Builtin::Integer
                | Builtin::Double
                | Builtin::Text
        ) =>
        {
            b.to_string().as_str().into()
        }
        Expr::App(f, _)
            if f.as_ref() == &Expr::Builtin(Builtin::List) =>
        {
            format!("List_{}", short_hash(t)).as_str().into()
        }
        Expr::App(f, _)
            if f.as_ref() == &Expr::Builtin(Builtin::Optional) =>
        {
            format!("Optional_{}", short_hash(t)).as_str().into()
        }
        Expr::RecordType(_) => {
            format!("Record_{}", short_hash(t)).as_str().into()
        }
        Expr::UnionType(_) => {
            format!("Union_{}", short_hash(t)).as_str().into()
        }
        _ => format!("Value_{}", short_hash(t)).as_str().into(),
    }
}

fn short_hash(t: &SubExpr) -> String {
    let digest = Sha256::digest(&binary::encode(&alpha_normalize(t)));
    hex::encode(&digest[..4])
}

struct TupleBuilder {
    elements: Vec<SubExpr>,
}

impl TupleBuilder {
    fn into_record(self) -> SubExpr {
        let fields = self
            .elements
            .into_iter()
            .enumerate()
            .map(|(i, e)| (Label::from(format!("_{}", i + 1)), e))
            .collect();
        rc(Expr::RecordLit(fields))
    }
}

impl ser::SerializeTuple for TupleBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_element<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        self.elements.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(self.into_record())
    }
}

impl ser::SerializeTupleStruct for TupleBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        self.elements.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(self.into_record())
    }
}

struct TupleVariantBuilder {
    variant: &'static str,
    inner: TupleBuilder,
}

impl ser::SerializeTupleVariant for TupleVariantBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        self.inner.elements.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(rc(Expr::UnionLit(
            self.variant.into(),
            Some(self.inner.into_record()),
            BTreeMap::new(),
        )))
    }
}

struct MapBuilder {
    fields: BTreeMap<Label, SubExpr>,
    pending_key: Option<Label>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_key<T: Serialize + ?Sized>(
        &mut self,
        key: &T,
    ) -> Result<()> {
        let key = key.serialize(Serializer)?;
        match key.as_ref() {
            Expr::TextLit(t) => match t.as_plain_text() {
                Some(s) => {
                    self.pending_key = Some(s.into());
                    Ok(())
                }
                None => Err(InterchangeError::Unsupported(
                    "map keys must be plain strings",
                )),
            },
            _ => Err(InterchangeError::Unsupported(
                "map keys must be strings",
            )),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .expect("serialize_value follows serialize_key");
        self.fields.insert(key, value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(rc(Expr::RecordLit(self.fields)))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.fields
            .insert(key.into(), value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(rc(Expr::RecordLit(self.fields)))
    }
}

struct StructVariantBuilder {
    variant: &'static str,
    fields: BTreeMap<Label, SubExpr>,
}

impl ser::SerializeStructVariant for StructVariantBuilder {
    type Ok = SubExpr;
    type Error = InterchangeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<()> {
        self.fields
            .insert(key.into(), value.serialize(Serializer)?);
        Ok(())
    }

    fn end(self) -> Result<SubExpr> {
        Ok(rc(Expr::UnionLit(
            self.variant.into(),
            Some(rc(Expr::RecordLit(self.fields))),
            BTreeMap::new(),
        )))
    }
}
