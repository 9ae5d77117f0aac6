//! The binary wire format. Encoding is canonical: minimal-width heads,
//! definite lengths, record keys in map order, doubles in the smallest
//! IEEE width that preserves the bits (half is never produced). The
//! semantic hash is computed over these bytes, so the encoder must never
//! have two ways to spell the same normal form.

use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;

use dhall_syntax::*;

use crate::error::DecodeError;

/// Multihash prefix for a sha256 digest: code 0x12, length 0x20.
const MULTIHASH_SHA256: [u8; 2] = [0x12, 0x20];

/// Self-describe tag accepted (and ignored) at the top of a decode.
const SELF_DESCRIBE_TAG: u64 = 55799;

const TAG_POSITIVE_BIGNUM: u64 = 2;
const TAG_NEGATIVE_BIGNUM: u64 = 3;

pub fn encode(expr: &SubExpr) -> Vec<u8> {
    let mut out = Vec::new();
    enc(expr, &mut out);
    out
}

pub fn decode(bytes: &[u8]) -> Result<SubExpr, DecodeError> {
    let mut r = Reader::new(bytes);
    if let Ok((6, SELF_DESCRIBE_TAG)) = r.peek_head() {
        r.read_head()?;
    }
    let expr = dec(&mut r)?;
    if r.pos != bytes.len() {
        return r.fail("trailing bytes after the expression");
    }
    Ok(expr)
}

/// Quick sniff used by the import resolver: imported bytes that look like
/// CBOR are decoded, anything else is handed to the source parser.
pub fn is_binary(bytes: &[u8]) -> bool {
    match bytes {
        [0xd9, 0xd9, 0xf7, ..] => true,
        [b, ..] => matches!(b >> 5, 4 | 6),
        [] => false,
    }
}

//
// Encoding
//

fn write_head(out: &mut Vec<u8>, major: u8, value: u64) {
    let major = major << 5;
    if value < 24 {
        out.push(major | value as u8);
    } else if value <= 0xff {
        out.push(major | 24);
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(major | 25);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= 0xffff_ffff {
        out.push(major | 26);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn write_array_head(out: &mut Vec<u8>, len: usize) {
    write_head(out, 4, len as u64);
}

fn write_text(out: &mut Vec<u8>, s: &str) {
    write_head(out, 3, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_head(out, 2, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn write_null(out: &mut Vec<u8>) {
    out.push(0xf6);
}

fn write_bool(out: &mut Vec<u8>, b: bool) {
    out.push(if b { 0xf5 } else { 0xf4 });
}

fn write_double(out: &mut Vec<u8>, v: f64) {
    let single = v as f32;
    if f64::from(single).to_bits() == v.to_bits() {
        out.push(0xfa);
        out.extend_from_slice(&single.to_bits().to_be_bytes());
    } else {
        out.push(0xfb);
        out.extend_from_slice(&v.to_bits().to_be_bytes());
    }
}

fn write_biguint(out: &mut Vec<u8>, major: u8, n: &BigUint) {
    match n.to_u64() {
        Some(small) => write_head(out, major, small),
        None => {
            let tag = if major == 0 {
                TAG_POSITIVE_BIGNUM
            } else {
                TAG_NEGATIVE_BIGNUM
            };
            write_head(out, 6, tag);
            write_bytes(out, &n.to_bytes_be());
        }
    }
}

fn write_natural(out: &mut Vec<u8>, n: &BigUint) {
    write_biguint(out, 0, n);
}

fn write_integer(out: &mut Vec<u8>, n: &BigInt) {
    if n.sign() == Sign::Minus {
        // major 1 encodes -1 - m
        let m = (-n) - BigInt::from(1u8);
        write_biguint(out, 1, m.magnitude());
    } else {
        write_biguint(out, 0, n.magnitude());
    }
}

fn write_label(out: &mut Vec<u8>, l: &Label) {
    write_text(out, l.as_ref());
}

fn write_record_map(out: &mut Vec<u8>, kvs: &BTreeMap<Label, SubExpr>) {
    write_head(out, 5, kvs.len() as u64);
    for (k, v) in kvs {
        write_label(out, k);
        enc(v, out);
    }
}

fn write_union_map(
    out: &mut Vec<u8>,
    kts: &BTreeMap<Label, Option<SubExpr>>,
) {
    write_head(out, 5, kts.len() as u64);
    for (k, t) in kts {
        write_label(out, k);
        match t {
            Some(t) => enc(t, out),
            None => write_null(out),
        }
    }
}

/// Unfold a left-nested application into its spine.
fn app_spine(expr: &SubExpr) -> (&SubExpr, Vec<&SubExpr>) {
    let mut args = Vec::new();
    let mut f = expr;
    while let Expr::App(g, a) = f.as_ref() {
        args.push(a);
        f = g;
    }
    args.reverse();
    (f, args)
}

fn enc(expr: &SubExpr, out: &mut Vec<u8>) {
    use Expr::*;
    match expr.as_ref() {
        Const(c) => write_text(out, &c.to_string()),
        Builtin(b) => write_text(out, &b.to_string()),
        BoolLit(b) => write_bool(out, *b),
        Var(V(x, n)) if x.as_ref() == "_" => write_head(out, 0, *n as u64),
        Var(V(x, n)) => {
            write_array_head(out, 2);
            write_label(out, x);
            write_head(out, 0, *n as u64);
        }
        App(_, _) => {
            let (f, args) = app_spine(expr);
            write_array_head(out, 2 + args.len());
            write_head(out, 0, 0);
            enc(f, out);
            for a in args {
                enc(a, out);
            }
        }
        Lam(x, t, b) => {
            if x.as_ref() == "_" {
                write_array_head(out, 3);
                write_head(out, 0, 1);
            } else {
                write_array_head(out, 4);
                write_head(out, 0, 1);
                write_label(out, x);
            }
            enc(t, out);
            enc(b, out);
        }
        Pi(x, t, b) => {
            if x.as_ref() == "_" {
                write_array_head(out, 3);
                write_head(out, 0, 2);
            } else {
                write_array_head(out, 4);
                write_head(out, 0, 2);
                write_label(out, x);
            }
            enc(t, out);
            enc(b, out);
        }
        BinOp(op, l, r) => {
            write_array_head(out, 4);
            write_head(out, 0, 3);
            write_head(out, 0, op.op_code());
            enc(l, out);
            enc(r, out);
        }
        EmptyListLit(t) => {
            write_array_head(out, 2);
            write_head(out, 0, 4);
            enc(t, out);
        }
        NEListLit(xs) => {
            write_array_head(out, 2 + xs.len());
            write_head(out, 0, 4);
            write_null(out);
            for x in xs {
                enc(x, out);
            }
        }
        SomeLit(x) => {
            write_array_head(out, 3);
            write_head(out, 0, 5);
            write_null(out);
            enc(x, out);
        }
        // `None t` is the application of the `None` builtin
        EmptyOptionalLit(t) => {
            write_array_head(out, 3);
            write_head(out, 0, 0);
            write_text(out, "None");
            enc(t, out);
        }
        Merge(r, u, t) => {
            write_array_head(out, 3 + t.iter().count());
            write_head(out, 0, 6);
            enc(r, out);
            enc(u, out);
            if let Some(t) = t {
                enc(t, out);
            }
        }
        RecordType(kts) => {
            write_array_head(out, 2);
            write_head(out, 0, 7);
            write_record_map(out, kts);
        }
        RecordLit(kvs) => {
            write_array_head(out, 2);
            write_head(out, 0, 8);
            write_record_map(out, kvs);
        }
        Field(r, l) => {
            write_array_head(out, 3);
            write_head(out, 0, 9);
            enc(r, out);
            write_label(out, l);
        }
        Projection(r, ls) => {
            write_array_head(out, 2 + ls.len());
            write_head(out, 0, 10);
            enc(r, out);
            for l in ls {
                write_label(out, l);
            }
        }
        ProjectionByExpr(r, t) => {
            write_array_head(out, 3);
            write_head(out, 0, 10);
            enc(r, out);
            write_array_head(out, 1);
            enc(t, out);
        }
        UnionType(kts) => {
            write_array_head(out, 2);
            write_head(out, 0, 11);
            write_union_map(out, kts);
        }
        UnionLit(k, Some(v), alts) => {
            write_array_head(out, 4);
            write_head(out, 0, 12);
            write_label(out, k);
            enc(v, out);
            write_union_map(out, alts);
        }
        // A payload-less union value is its constructor selection
        UnionLit(k, None, alts) => {
            let mut full = alts.clone();
            full.insert(k.clone(), None);
            write_array_head(out, 3);
            write_head(out, 0, 9);
            write_array_head(out, 2);
            write_head(out, 0, 11);
            write_union_map(out, &full);
            write_label(out, k);
        }
        BoolIf(p, t, e) => {
            write_array_head(out, 4);
            write_head(out, 0, 14);
            enc(p, out);
            enc(t, out);
            enc(e, out);
        }
        NaturalLit(n) => {
            write_array_head(out, 2);
            write_head(out, 0, 15);
            write_natural(out, n);
        }
        IntegerLit(n) => {
            write_array_head(out, 2);
            write_head(out, 0, 16);
            write_integer(out, n);
        }
        DoubleLit(d) => write_double(out, f64::from(*d)),
        TextLit(txt) => {
            let chunks: Vec<_> = txt.iter().collect();
            write_array_head(out, 1 + chunks.len());
            write_head(out, 0, 18);
            for chunk in chunks {
                match chunk {
                    InterpolatedTextContents::Text(s) => write_text(out, s),
                    InterpolatedTextContents::Expr(e) => enc(e, out),
                }
            }
        }
        Assert(t) => {
            write_array_head(out, 2);
            write_head(out, 0, 19);
            enc(t, out);
        }
        Import(import) => enc_import(import, out),
        Let(_, _, _, _) => {
            // Flatten consecutive bindings into one let block
            let mut bindings = Vec::new();
            let mut body = expr;
            while let Expr::Let(x, t, a, b) = body.as_ref() {
                bindings.push((x, t, a));
                body = b;
            }
            write_array_head(out, 2 + 3 * bindings.len());
            write_head(out, 0, 25);
            for (x, t, a) in bindings {
                write_label(out, x);
                match t {
                    Some(t) => enc(t, out),
                    None => write_null(out),
                }
                enc(a, out);
            }
            enc(body, out);
        }
        Annot(x, t) => {
            write_array_head(out, 3);
            write_head(out, 0, 26);
            enc(x, out);
            enc(t, out);
        }
        ToMap(r, t) => {
            write_array_head(out, 2 + t.iter().count());
            write_head(out, 0, 27);
            enc(r, out);
            if let Some(t) = t {
                enc(t, out);
            }
        }
    }
}

fn enc_import(import: &Import, out: &mut Vec<u8>) {
    use ImportLocation::*;
    let (scheme, extra) = match &import.location {
        Remote(url) => {
            let scheme = match url.scheme {
                Scheme::HTTP => 0,
                Scheme::HTTPS => 1,
            };
            // headers, authority, path..., query
            (scheme, 3 + url.path.len())
        }
        Local(prefix, components) => {
            let scheme = match prefix {
                FilePrefix::Absolute => 2,
                FilePrefix::Here => 3,
                FilePrefix::Parent => 4,
                FilePrefix::Home => 5,
            };
            (scheme, components.len())
        }
        Env(_) => (6, 1),
        Missing => (7, 0),
    };

    write_array_head(out, 4 + extra);
    write_head(out, 0, 24);
    match &import.hash {
        Some(Hash::SHA256(digest)) => {
            let mut multihash = MULTIHASH_SHA256.to_vec();
            multihash.extend_from_slice(digest);
            write_bytes(out, &multihash);
        }
        None => write_null(out),
    }
    let mode = match import.mode {
        ImportMode::Code => 0,
        ImportMode::RawText => 1,
        ImportMode::Location => 2,
    };
    write_head(out, 0, mode);
    write_head(out, 0, scheme);
    match &import.location {
        Remote(url) => {
            match &url.headers {
                Some(h) => enc(h, out),
                None => write_null(out),
            }
            write_text(out, &url.authority);
            for c in &url.path {
                write_text(out, c);
            }
            match &url.query {
                Some(q) => write_text(out, q),
                None => write_null(out),
            }
        }
        Local(_, components) => {
            for c in components {
                write_text(out, c);
            }
        }
        Env(name) => write_text(out, name),
        Missing => {}
    }
}

//
// Decoding
//

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn fail<T>(&self, message: &str) -> Result<T, DecodeError> {
        Err(DecodeError {
            position: self.pos,
            message: message.to_owned(),
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return self.fail("unexpected end of input");
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a head: (major type, argument value). Indefinite lengths are
    /// not part of the format.
    fn read_head(&mut self) -> Result<(u8, u64), DecodeError> {
        let b = self.take(1)?[0];
        let major = b >> 5;
        let info = b & 0x1f;
        let value = match info {
            n if n < 24 => u64::from(n),
            24 => u64::from(self.take(1)?[0]),
            25 => {
                let b = self.take(2)?;
                u64::from(u16::from_be_bytes([b[0], b[1]]))
            }
            26 => {
                let b = self.take(4)?;
                u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            27 => {
                let b = self.take(8)?;
                u64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ])
            }
            _ => return self.fail("indefinite lengths are not supported"),
        };
        Ok((major, value))
    }

    fn peek_head(&self) -> Result<(u8, u64), DecodeError> {
        let mut probe = Reader {
            bytes: self.bytes,
            pos: self.pos,
        };
        probe.read_head()
    }

    fn read_text(&mut self) -> Result<String, DecodeError> {
        match self.read_head()? {
            (3, len) => {
                let bytes = self.take(len as usize)?;
                match std::str::from_utf8(bytes) {
                    Ok(s) => Ok(s.to_owned()),
                    Err(_) => self.fail("text is not valid UTF-8"),
                }
            }
            _ => self.fail("expected a text string"),
        }
    }

    fn read_byte_string(&mut self) -> Result<&'a [u8], DecodeError> {
        match self.read_head()? {
            (2, len) => self.take(len as usize),
            _ => self.fail("expected a byte string"),
        }
    }

    fn read_array_len(&mut self) -> Result<usize, DecodeError> {
        match self.read_head()? {
            (4, len) => Ok(len as usize),
            _ => self.fail("expected an array"),
        }
    }

    /// Consume a null, reporting whether one was present.
    fn try_read_null(&mut self) -> bool {
        if self.bytes.get(self.pos) == Some(&0xf6) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn read_natural(&mut self) -> Result<BigUint, DecodeError> {
        match self.read_head()? {
            (0, n) => Ok(BigUint::from(n)),
            (6, TAG_POSITIVE_BIGNUM) => {
                let bytes = self.read_byte_string()?;
                Ok(BigUint::from_bytes_be(bytes))
            }
            _ => self.fail("expected a natural number"),
        }
    }

    fn read_integer(&mut self) -> Result<BigInt, DecodeError> {
        match self.read_head()? {
            (0, n) => Ok(BigInt::from(n)),
            (1, n) => Ok(-BigInt::from(n) - BigInt::from(1u8)),
            (6, TAG_POSITIVE_BIGNUM) => {
                let bytes = self.read_byte_string()?;
                Ok(BigInt::from_biguint(
                    Sign::Plus,
                    BigUint::from_bytes_be(bytes),
                ))
            }
            (6, TAG_NEGATIVE_BIGNUM) => {
                let bytes = self.read_byte_string()?;
                let m = BigInt::from_biguint(
                    Sign::Plus,
                    BigUint::from_bytes_be(bytes),
                );
                Ok(-m - BigInt::from(1u8))
            }
            _ => self.fail("expected an integer"),
        }
    }
}

fn half_to_f64(h: u16) -> f64 {
    let sign = (h >> 15) as u64;
    let exp = ((h >> 10) & 0x1f) as i32;
    let frac = (h & 0x3ff) as f64;
    let magnitude = match exp {
        0 => frac * 2f64.powi(-24),
        0x1f if frac == 0.0 => f64::INFINITY,
        0x1f => f64::NAN,
        e => (1.0 + frac * 2f64.powi(-10)) * 2f64.powi(e - 15),
    };
    if sign == 1 {
        -magnitude
    } else {
        magnitude
    }
}

fn dec(r: &mut Reader) -> Result<SubExpr, DecodeError> {
    match r.peek_head()? {
        (0, _) => {
            let (_, n) = r.read_head()?;
            Ok(rc(Expr::Var(V("_".into(), n as usize))))
        }
        (3, _) => {
            let s = r.read_text()?;
            Ok(decode_name(&s))
        }
        (4, _) => dec_array(r),
        (7, _) => {
            // For floats the head argument carries the raw payload bits.
            let info = r.bytes[r.pos] & 0x1f;
            let (_, value) = r.read_head()?;
            match info {
                20 => Ok(rc(Expr::BoolLit(false))),
                21 => Ok(rc(Expr::BoolLit(true))),
                25 => Ok(rc(Expr::DoubleLit(
                    half_to_f64(value as u16).into(),
                ))),
                26 => Ok(rc(Expr::DoubleLit(
                    f64::from(f32::from_bits(value as u32)).into(),
                ))),
                27 => Ok(rc(Expr::DoubleLit(f64::from_bits(value).into()))),
                _ => r.fail("unexpected simple value"),
            }
        }
        _ => r.fail("unexpected item at expression position"),
    }
}

fn decode_name(s: &str) -> SubExpr {
    match s {
        "Type" => rc(Expr::Const(Const::Type)),
        "Kind" => rc(Expr::Const(Const::Kind)),
        "Sort" => rc(Expr::Const(Const::Sort)),
        "True" => rc(Expr::BoolLit(true)),
        "False" => rc(Expr::BoolLit(false)),
        _ => match Builtin::parse(s) {
            Some(b) => rc(Expr::Builtin(b)),
            // a bare string is a variable at index 0
            None => rc(Expr::Var(V(s.into(), 0))),
        },
    }
}

fn dec_array(r: &mut Reader) -> Result<SubExpr, DecodeError> {
    let len = r.read_array_len()?;
    if len < 2 {
        return r.fail("expression arrays have at least two elements");
    }
    // A leading string means a variable with an explicit index
    if let (3, _) = r.peek_head()? {
        let name = r.read_text()?;
        if len != 2 {
            return r.fail("a variable is encoded as [name, index]");
        }
        let (major, n) = r.read_head()?;
        if major != 0 {
            return r.fail("variable index must be a natural");
        }
        return Ok(rc(Expr::Var(V(name.as_str().into(), n as usize))));
    }

    let (major, tag) = r.read_head()?;
    if major != 0 {
        return r.fail("expected an expression tag");
    }
    match tag {
        0 => {
            // [0, f, args...]
            if len < 3 {
                return r.fail("application needs at least one argument");
            }
            let mut e = dec(r)?;
            for _ in 0..len - 2 {
                let a = dec(r)?;
                e = rc(Expr::App(e, a));
            }
            Ok(e)
        }
        1 | 2 => {
            let (x, t, b) = match len {
                3 => {
                    let t = dec(r)?;
                    let b = dec(r)?;
                    (Label::from("_"), t, b)
                }
                4 => {
                    let x = r.read_text()?;
                    if x == "_" {
                        return r.fail("`_` binders omit the name");
                    }
                    let t = dec(r)?;
                    let b = dec(r)?;
                    (x.as_str().into(), t, b)
                }
                _ => return r.fail("malformed binder"),
            };
            Ok(rc(if tag == 1 {
                Expr::Lam(x, t, b)
            } else {
                Expr::Pi(x, t, b)
            }))
        }
        3 => {
            if len != 4 {
                return r.fail("operator application has two operands");
            }
            let (major, code) = r.read_head()?;
            if major != 0 {
                return r.fail("expected an operator code");
            }
            let op = match BinOp::from_op_code(code) {
                Some(op) => op,
                None => return r.fail("unknown operator code"),
            };
            let l = dec(r)?;
            let rhs = dec(r)?;
            Ok(rc(Expr::BinOp(op, l, rhs)))
        }
        4 => {
            if len == 2 {
                // [4, t]: an empty list with its element type
                let t = dec(r)?;
                return Ok(rc(Expr::EmptyListLit(t)));
            }
            if !r.try_read_null() {
                return r.fail("a non-empty list carries no element type");
            }
            let xs = (0..len - 2).map(|_| dec(r)).collect::<Result<_, _>>()?;
            Ok(rc(Expr::NEListLit(xs)))
        }
        5 => match len {
            // legacy empty optional: decoded to the `None t` application
            // so that re-encoding round-trips
            2 => {
                let t = dec(r)?;
                Ok(rc(Expr::App(
                    Expr::from_builtin(Builtin::OptionalNone),
                    t,
                )))
            }
            3 => {
                if r.try_read_null() {
                    let v = dec(r)?;
                    Ok(rc(Expr::SomeLit(v)))
                } else {
                    // legacy annotated form; the annotation is recomputed
                    let _t = dec(r)?;
                    let v = dec(r)?;
                    Ok(rc(Expr::SomeLit(v)))
                }
            }
            _ => r.fail("malformed optional"),
        },
        6 => {
            let record = dec(r)?;
            let input = dec(r)?;
            let t = match len {
                3 => None,
                4 => Some(dec(r)?),
                _ => return r.fail("malformed merge"),
            };
            Ok(rc(Expr::Merge(record, input, t)))
        }
        7 | 8 => {
            if len != 2 {
                return r.fail("malformed record");
            }
            let kvs = dec_record_map(r)?;
            Ok(rc(if tag == 7 {
                Expr::RecordType(kvs)
            } else {
                Expr::RecordLit(kvs)
            }))
        }
        9 => {
            if len != 3 {
                return r.fail("malformed selection");
            }
            let e = dec(r)?;
            let l = r.read_text()?;
            Ok(rc(Expr::Field(e, l.as_str().into())))
        }
        10 => {
            let e = dec(r)?;
            if len == 3 {
                if let (4, _) = r.peek_head()? {
                    let inner = r.read_array_len()?;
                    if inner != 1 {
                        return r.fail("projection by type wraps one type");
                    }
                    let t = dec(r)?;
                    return Ok(rc(Expr::ProjectionByExpr(e, t)));
                }
            }
            let ls = (0..len - 2)
                .map(|_| Ok(r.read_text()?.as_str().into()))
                .collect::<Result<_, DecodeError>>()?;
            Ok(rc(Expr::Projection(e, ls)))
        }
        11 => {
            if len != 2 {
                return r.fail("malformed union type");
            }
            let kts = dec_union_map(r)?;
            Ok(rc(Expr::UnionType(kts)))
        }
        12 => {
            if len != 4 {
                return r.fail("malformed union literal");
            }
            let k = r.read_text()?;
            let v = dec(r)?;
            let alts = dec_union_map(r)?;
            Ok(rc(Expr::UnionLit(k.as_str().into(), Some(v), alts)))
        }
        14 => {
            if len != 4 {
                return r.fail("malformed if");
            }
            let p = dec(r)?;
            let t = dec(r)?;
            let e = dec(r)?;
            Ok(rc(Expr::BoolIf(p, t, e)))
        }
        15 => {
            if len != 2 {
                return r.fail("malformed natural literal");
            }
            Ok(rc(Expr::NaturalLit(r.read_natural()?)))
        }
        16 => {
            if len != 2 {
                return r.fail("malformed integer literal");
            }
            Ok(rc(Expr::IntegerLit(r.read_integer()?)))
        }
        18 => {
            if len % 2 != 0 {
                return r.fail("text chunks must end with a string");
            }
            let head = r.read_text()?;
            let mut tail = Vec::new();
            for _ in 0..(len - 2) / 2 {
                let e = dec(r)?;
                let s = r.read_text()?;
                tail.push((e, s));
            }
            Ok(rc(Expr::TextLit(InterpolatedText::new(head, tail))))
        }
        19 => {
            if len != 2 {
                return r.fail("malformed assert");
            }
            Ok(rc(Expr::Assert(dec(r)?)))
        }
        24 => dec_import(r, len),
        25 => {
            if len < 5 || (len - 2) % 3 != 0 {
                return r.fail("malformed let block");
            }
            let mut bindings = Vec::new();
            for _ in 0..(len - 2) / 3 {
                let x: Label = r.read_text()?.as_str().into();
                let t = if r.try_read_null() {
                    None
                } else {
                    Some(dec(r)?)
                };
                let a = dec(r)?;
                bindings.push((x, t, a));
            }
            let mut e = dec(r)?;
            for (x, t, a) in bindings.into_iter().rev() {
                e = rc(Expr::Let(x, t, a, e));
            }
            Ok(e)
        }
        26 => {
            if len != 3 {
                return r.fail("malformed annotation");
            }
            let x = dec(r)?;
            let t = dec(r)?;
            Ok(rc(Expr::Annot(x, t)))
        }
        27 => {
            let e = dec(r)?;
            let t = match len {
                2 => None,
                3 => Some(dec(r)?),
                _ => return r.fail("malformed toMap"),
            };
            Ok(rc(Expr::ToMap(e, t)))
        }
        28 => {
            if len != 2 {
                return r.fail("malformed empty list");
            }
            let t = dec(r)?;
            match t.as_ref() {
                Expr::App(f, a)
                    if f.as_ref() == &Expr::Builtin(Builtin::List) =>
                {
                    Ok(rc(Expr::EmptyListLit(a.clone())))
                }
                _ => r.fail("the annotation of an empty list must be a List"),
            }
        }
        _ => r.fail("unknown expression tag"),
    }
}

fn dec_record_map(
    r: &mut Reader,
) -> Result<BTreeMap<Label, SubExpr>, DecodeError> {
    let len = match r.read_head()? {
        (5, len) => len as usize,
        _ => return r.fail("expected a map"),
    };
    let mut out = BTreeMap::new();
    for _ in 0..len {
        let k: Label = r.read_text()?.as_str().into();
        let v = dec(r)?;
        if out.insert(k, v).is_some() {
            return r.fail("duplicate field in record");
        }
    }
    Ok(out)
}

fn dec_union_map(
    r: &mut Reader,
) -> Result<BTreeMap<Label, Option<SubExpr>>, DecodeError> {
    let len = match r.read_head()? {
        (5, len) => len as usize,
        _ => return r.fail("expected a map"),
    };
    let mut out = BTreeMap::new();
    for _ in 0..len {
        let k: Label = r.read_text()?.as_str().into();
        let t = if r.try_read_null() {
            None
        } else {
            Some(dec(r)?)
        };
        if out.insert(k, t).is_some() {
            return r.fail("duplicate alternative in union");
        }
    }
    Ok(out)
}

fn dec_import(r: &mut Reader, len: usize) -> Result<SubExpr, DecodeError> {
    if len < 4 {
        return r.fail("malformed import");
    }
    let hash = if r.try_read_null() {
        None
    } else {
        let bytes = r.read_byte_string()?;
        if bytes.len() != 34 || bytes[..2] != MULTIHASH_SHA256 {
            return r.fail("integrity check must be a sha256 multihash");
        }
        Some(Hash::SHA256(bytes[2..].to_vec()))
    };
    let mode = match r.read_head()? {
        (0, 0) => ImportMode::Code,
        (0, 1) => ImportMode::RawText,
        (0, 2) => ImportMode::Location,
        _ => return r.fail("unknown import mode"),
    };
    let (major, scheme) = r.read_head()?;
    if major != 0 {
        return r.fail("expected an import scheme");
    }
    let location = match scheme {
        0 | 1 => {
            if len < 7 {
                return r.fail("malformed remote import");
            }
            let headers = if r.try_read_null() {
                None
            } else {
                Some(dec(r)?)
            };
            let authority = r.read_text()?;
            let path = (0..len - 7)
                .map(|_| r.read_text())
                .collect::<Result<_, _>>()?;
            let query = if r.try_read_null() {
                None
            } else {
                Some(r.read_text()?)
            };
            ImportLocation::Remote(URL {
                scheme: if scheme == 0 {
                    Scheme::HTTP
                } else {
                    Scheme::HTTPS
                },
                authority,
                path,
                query,
                headers,
            })
        }
        2..=5 => {
            let prefix = match scheme {
                2 => FilePrefix::Absolute,
                3 => FilePrefix::Here,
                4 => FilePrefix::Parent,
                _ => FilePrefix::Home,
            };
            let components = (0..len - 4)
                .map(|_| r.read_text())
                .collect::<Result<_, _>>()?;
            ImportLocation::Local(prefix, components)
        }
        6 => {
            if len != 5 {
                return r.fail("malformed environment import");
            }
            ImportLocation::Env(r.read_text()?)
        }
        7 => {
            if len != 4 {
                return r.fail("malformed missing import");
            }
            ImportLocation::Missing
        }
        _ => return r.fail("unknown import scheme"),
    };
    Ok(rc(Expr::Import(Import {
        mode,
        location,
        hash,
    })))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn nat(n: u64) -> SubExpr {
        rc(Expr::NaturalLit(BigUint::from(n)))
    }

    fn int(n: i64) -> SubExpr {
        rc(Expr::IntegerLit(BigInt::from(n)))
    }

    fn var(x: &str, n: usize) -> SubExpr {
        rc(Expr::Var(V(x.into(), n)))
    }

    fn app(f: SubExpr, a: SubExpr) -> SubExpr {
        rc(Expr::App(f, a))
    }

    fn builtin(b: Builtin) -> SubExpr {
        Expr::from_builtin(b)
    }

    fn assert_roundtrip(e: &SubExpr) {
        let bytes = encode(e);
        let back = decode(&bytes).expect("decoding what we encoded");
        assert_eq!(&back, e);
    }

    #[test]
    fn natural_two_is_the_golden_bytes() {
        assert_eq!(encode(&nat(2)), vec![0x82, 0x0f, 0x02]);
    }

    #[test]
    fn anonymous_variable_is_a_bare_integer() {
        assert_eq!(encode(&var("_", 3)), vec![0x03]);
        assert_eq!(decode(&[0x03]).unwrap(), var("_", 3));
    }

    #[test]
    fn named_variable_is_a_pair() {
        assert_eq!(encode(&var("x", 0)), vec![0x82, 0x61, 0x78, 0x00]);
        assert_eq!(decode(&[0x82, 0x61, 0x78, 0x00]).unwrap(), var("x", 0));
    }

    #[test]
    fn bare_string_decodes_to_builtin_or_variable() {
        // "Natural" is reserved, "foo" is not
        assert_eq!(
            decode(&encode(&builtin(Builtin::Natural))).unwrap(),
            builtin(Builtin::Natural)
        );
        assert_eq!(decode(&[0x63, 0x66, 0x6f, 0x6f]).unwrap(), var("foo", 0));
    }

    #[test]
    fn self_describe_tag_is_accepted() {
        assert_eq!(
            decode(&[0xd9, 0xd9, 0xf7, 0x82, 0x0f, 0x02]).unwrap(),
            nat(2)
        );
    }

    #[test]
    fn application_spine_is_flattened() {
        let e = app(app(var("f", 0), nat(1)), nat(2));
        let bytes = encode(&e);
        // [0, f, 1, 2]: one array, not two
        assert_eq!(bytes[0], 0x84);
        assert_roundtrip(&e);
    }

    #[test]
    fn doubles_use_the_smallest_exact_width() {
        let single = rc(Expr::DoubleLit(1.5.into()));
        assert_eq!(encode(&single)[0], 0xfa);
        let double = rc(Expr::DoubleLit(1.1.into()));
        assert_eq!(encode(&double)[0], 0xfb);
        assert_roundtrip(&single);
        assert_roundtrip(&double);
    }

    #[test]
    fn half_precision_is_read_but_never_written() {
        // 1.0 as a half-precision float
        let e = decode(&[0xf9, 0x3c, 0x00]).unwrap();
        assert_eq!(e, rc(Expr::DoubleLit(1.0.into())));
        assert_eq!(encode(&e)[0], 0xfa);
    }

    #[test]
    fn naturals_beyond_u64_use_bignum_tags() {
        let huge = BigUint::from(u64::max_value()) + BigUint::from(1u8);
        let e = rc(Expr::NaturalLit(huge));
        let bytes = encode(&e);
        // [15, tag 2 bignum]
        assert_eq!(&bytes[..3], &[0x82, 0x0f, 0xc2]);
        assert_roundtrip(&e);
    }

    #[test]
    fn negative_integers_roundtrip() {
        assert_roundtrip(&int(-3));
        assert_roundtrip(&int(3));
        let very_negative = rc(Expr::IntegerLit(
            -(BigInt::from(u64::max_value()) + BigInt::from(2u8)),
        ));
        assert_roundtrip(&very_negative);
    }

    #[test]
    fn legacy_empty_optional_decodes_to_none_application() {
        // [5, "Natural"]
        let bytes = [
            0x82, 0x05, 0x67, 0x4e, 0x61, 0x74, 0x75, 0x72, 0x61, 0x6c,
        ];
        let e = decode(&bytes).unwrap();
        assert_eq!(
            e,
            app(builtin(Builtin::OptionalNone), builtin(Builtin::Natural))
        );
        assert_roundtrip(&e);
    }

    #[test]
    fn empty_list_annotation_forms() {
        let e = rc(Expr::EmptyListLit(builtin(Builtin::Natural)));
        assert_roundtrip(&e);
        // [28, App(List, Natural)] decodes to the same expression
        let mut bytes = vec![0x82, 0x18, 0x1c];
        bytes.extend_from_slice(&encode(&app(
            builtin(Builtin::List),
            builtin(Builtin::Natural),
        )));
        assert_eq!(decode(&bytes).unwrap(), e);
    }

    #[test]
    fn duplicate_record_fields_are_rejected() {
        // [8, {"a": 1, "a": 1}]
        let mut bytes = vec![0x82, 0x08, 0xa2];
        for _ in 0..2 {
            bytes.extend_from_slice(&[0x61, 0x61]);
            bytes.extend_from_slice(&encode(&nat(1)));
        }
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(decode(&[0x82, 0x0f, 0x02, 0x00]).is_err());
    }

    #[test]
    fn expression_catalog_roundtrips() {
        use std::collections::BTreeMap;

        let natural = builtin(Builtin::Natural);
        let mut kts = BTreeMap::new();
        kts.insert(Label::from("mapKey"), builtin(Builtin::Text));
        kts.insert(Label::from("mapValue"), natural.clone());
        let mut alts: BTreeMap<Label, Option<SubExpr>> = BTreeMap::new();
        alts.insert("Left".into(), Some(natural.clone()));
        alts.insert("Right".into(), None);

        let mut text = InterpolatedText::from("a");
        text.push_expr(var("x", 0));
        text.push_text("b");

        let exprs: Vec<SubExpr> = vec![
            rc(Expr::Const(Const::Type)),
            rc(Expr::Const(Const::Sort)),
            rc(Expr::BoolLit(true)),
            rc(Expr::Lam("x".into(), natural.clone(), var("x", 0))),
            rc(Expr::Lam("_".into(), natural.clone(), var("_", 0))),
            rc(Expr::Pi("a".into(), rc(Expr::Const(Const::Type)), var("a", 0))),
            rc(Expr::Pi("_".into(), natural.clone(), natural.clone())),
            rc(Expr::Let(
                "x".into(),
                Some(natural.clone()),
                nat(1),
                var("x", 0),
            )),
            rc(Expr::Let(
                "x".into(),
                None,
                nat(1),
                rc(Expr::Let("y".into(), None, nat(2), var("x", 0))),
            )),
            rc(Expr::Annot(nat(1), natural.clone())),
            rc(Expr::Assert(rc(Expr::BinOp(
                BinOp::Equivalence,
                nat(1),
                nat(1),
            )))),
            rc(Expr::BoolIf(
                rc(Expr::BoolLit(true)),
                nat(1),
                nat(2),
            )),
            rc(Expr::BinOp(BinOp::NaturalPlus, nat(1), nat(2))),
            rc(Expr::BinOp(BinOp::ImportAlt, nat(1), nat(2))),
            rc(Expr::EmptyListLit(natural.clone())),
            rc(Expr::NEListLit(vec![nat(1), nat(2)])),
            rc(Expr::SomeLit(nat(1))),
            rc(Expr::TextLit(text)),
            rc(Expr::TextLit("plain".into())),
            rc(Expr::RecordType(kts.clone())),
            rc(Expr::RecordLit(BTreeMap::new())),
            rc(Expr::UnionType(alts.clone())),
            rc(Expr::UnionLit("Left".into(), Some(nat(5)), {
                let mut rest = alts.clone();
                rest.remove(&Label::from("Left"));
                rest
            })),
            rc(Expr::Merge(var("h", 0), var("u", 0), None)),
            rc(Expr::Merge(var("h", 0), var("u", 0), Some(natural.clone()))),
            rc(Expr::ToMap(var("r", 0), None)),
            rc(Expr::ToMap(
                var("r", 0),
                Some(app(builtin(Builtin::List), rc(Expr::RecordType(kts)))),
            )),
            rc(Expr::Field(var("r", 0), "a".into())),
            rc(Expr::Projection(var("r", 0), vec!["a".into(), "b".into()])),
            rc(Expr::Projection(var("r", 0), vec![])),
            rc(Expr::ProjectionByExpr(
                var("r", 0),
                rc(Expr::RecordType(BTreeMap::new())),
            )),
            rc(Expr::DoubleLit(f64::NAN.into())),
            rc(Expr::DoubleLit(f64::NEG_INFINITY.into())),
        ];
        for e in &exprs {
            assert_roundtrip(e);
        }
    }

    #[test]
    fn import_catalog_roundtrips() {
        let imports: Vec<Import> = vec![
            Import {
                mode: ImportMode::Code,
                location: ImportLocation::Local(
                    FilePrefix::Here,
                    vec!["pkg".into(), "default.dhall".into()],
                ),
                hash: None,
            },
            Import {
                mode: ImportMode::RawText,
                location: ImportLocation::Local(
                    FilePrefix::Absolute,
                    vec!["etc".into(), "motd".into()],
                ),
                hash: Some(Hash::SHA256(vec![0xab; 32])),
            },
            Import {
                mode: ImportMode::Code,
                location: ImportLocation::Remote(URL {
                    scheme: Scheme::HTTPS,
                    authority: "example.com".into(),
                    path: vec!["a".into(), "b.dhall".into()],
                    query: Some("x=1".into()),
                    headers: None,
                }),
                hash: None,
            },
            Import {
                mode: ImportMode::Code,
                location: ImportLocation::Remote(URL {
                    scheme: Scheme::HTTP,
                    authority: "example.com".into(),
                    path: vec!["b.dhall".into()],
                    query: None,
                    headers: Some(rc(Expr::EmptyListLit(rc(
                        Expr::RecordType(Default::default()),
                    )))),
                }),
                hash: None,
            },
            Import {
                mode: ImportMode::Location,
                location: ImportLocation::Env("HOME".into()),
                hash: None,
            },
            Import {
                mode: ImportMode::Code,
                location: ImportLocation::Missing,
                hash: None,
            },
        ];
        for i in imports {
            assert_roundtrip(&rc(Expr::Import(i)));
        }
    }
}
