use crate::expr::SubExpr;

/// How the fetched content is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ImportMode {
    /// Parse the bytes as an expression (source text or binary).
    Code,
    /// Keep the bytes as a `Text` literal.
    RawText,
    /// Do not fetch; the import itself becomes a value.
    Location,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilePrefix {
    /// `/`
    Absolute,
    /// `./`
    Here,
    /// `../`
    Parent,
    /// `~/`
    Home,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    HTTP,
    HTTPS,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct URL {
    pub scheme: Scheme,
    pub authority: String,
    pub path: Vec<String>,
    pub query: Option<String>,
    /// Optional headers expression of type `List { mapKey : Text, mapValue : Text }`.
    pub headers: Option<SubExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportLocation {
    Local(FilePrefix, Vec<String>),
    Remote(URL),
    Env(String),
    Missing,
}

/// A sha256 integrity check attached to an import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Hash {
    SHA256(Vec<u8>),
}

impl Hash {
    /// The canonical string form, `sha256:<64 lowercase hex>`.
    pub fn to_hash_string(&self) -> String {
        let Hash::SHA256(bytes) = self;
        format!("sha256:{}", hex::encode(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    pub mode: ImportMode,
    pub location: ImportLocation,
    pub hash: Option<Hash>,
}

impl Import {
    pub fn map_headers(
        &self,
        f: impl FnOnce(&SubExpr) -> SubExpr,
    ) -> Import {
        let location = match &self.location {
            ImportLocation::Remote(url) => ImportLocation::Remote(URL {
                headers: url.headers.as_ref().map(f),
                ..url.clone()
            }),
            loc => loc.clone(),
        };
        Import {
            mode: self.mode,
            location,
            hash: self.hash.clone(),
        }
    }
}

/// An environment variable name needs quoting unless it is a POSIX
/// identifier.
fn is_posix_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Render an environment variable name, escaping
/// `" \ BEL BS FF LF CR TAB VT` in the quoted form.
pub fn render_env_name(name: &str) -> String {
    if is_posix_name(name) {
        return name.to_owned();
    }
    let mut out = String::from("\"");
    for c in name.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0007}' => out.push_str("\\a"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{000B}' => out.push_str("\\v"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
