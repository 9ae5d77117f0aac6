use crate::expr::SubExpr;

/// A text literal: a leading string chunk followed by interpolated
/// expressions, each with its trailing string chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterpolatedText {
    head: String,
    tail: Vec<(SubExpr, String)>,
}

/// One chunk of an interpolated text, as seen by iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpolatedTextContents<'a> {
    Text(&'a str),
    Expr(&'a SubExpr),
}

impl InterpolatedText {
    pub fn new(head: String, tail: Vec<(SubExpr, String)>) -> Self {
        InterpolatedText { head, tail }
    }

    /// The literal string when there is no interpolation left.
    pub fn as_plain_text(&self) -> Option<&str> {
        if self.tail.is_empty() {
            Some(&self.head)
        } else {
            None
        }
    }

    /// The single interpolated expression when both surrounding chunks are
    /// empty, i.e. `"${e}"`.
    pub fn as_single_expr(&self) -> Option<&SubExpr> {
        match self.tail.as_slice() {
            [(e, trailing)] if self.head.is_empty() && trailing.is_empty() => {
                Some(e)
            }
            _ => None,
        }
    }

    pub fn push_text(&mut self, s: &str) {
        match self.tail.last_mut() {
            Some((_, trailing)) => trailing.push_str(s),
            None => self.head.push_str(s),
        }
    }

    pub fn push_expr(&mut self, e: SubExpr) {
        self.tail.push((e, String::new()));
    }

    /// Append another literal, fusing the adjacent string chunks.
    pub fn append(&mut self, other: &InterpolatedText) {
        self.push_text(&other.head);
        self.tail.extend(other.tail.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = InterpolatedTextContents<'_>> {
        use InterpolatedTextContents::{Expr, Text};
        std::iter::once(Text(self.head.as_str())).chain(
            self.tail
                .iter()
                .flat_map(|(e, s)| vec![Expr(e), Text(s.as_str())]),
        )
    }

    pub fn exprs(&self) -> impl Iterator<Item = &SubExpr> {
        self.tail.iter().map(|(e, _)| e)
    }

    pub fn map_exprs(
        &self,
        mut f: impl FnMut(&SubExpr) -> SubExpr,
    ) -> InterpolatedText {
        InterpolatedText {
            head: self.head.clone(),
            tail: self.tail.iter().map(|(e, s)| (f(e), s.clone())).collect(),
        }
    }
}

impl From<String> for InterpolatedText {
    fn from(head: String) -> Self {
        InterpolatedText { head, tail: vec![] }
    }
}

impl<'a> From<&'a str> for InterpolatedText {
    fn from(head: &'a str) -> Self {
        head.to_owned().into()
    }
}
