/// An ordered typing environment. Lookup by `(name, index)` skips `index`
/// shadowing entries of the same name, innermost first.
#[derive(Debug, Clone)]
pub struct Context<K, T>(Vec<(K, T)>);

impl<K: PartialEq + Clone, T: Clone> Context<K, T> {
    pub fn new() -> Self {
        Context(Vec::new())
    }

    /// A copy of this context with one more binding, shadowing any
    /// previous binding for the same key.
    pub fn insert(&self, k: K, v: T) -> Self {
        let mut vec = self.0.clone();
        vec.push((k, v));
        Context(vec)
    }

    pub fn lookup(&self, k: &K, n: usize) -> Option<&T> {
        self.0
            .iter()
            .rev()
            .filter(|(k2, _)| k == k2)
            .nth(n)
            .map(|(_, v)| v)
    }

    pub fn map<U: Clone>(&self, f: impl Fn(&T) -> U) -> Context<K, U> {
        Context(self.0.iter().map(|(k, v)| (k.clone(), f(v))).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl<K: PartialEq + Clone, T: Clone> Default for Context<K, T> {
    fn default() -> Self {
        Context::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_counts_shadowings_per_name() {
        let ctx = Context::new()
            .insert("x", 1)
            .insert("y", 2)
            .insert("x", 3);
        assert_eq!(ctx.lookup(&"x", 0), Some(&3));
        assert_eq!(ctx.lookup(&"x", 1), Some(&1));
        assert_eq!(ctx.lookup(&"y", 0), Some(&2));
        assert_eq!(ctx.lookup(&"x", 2), None);
        assert_eq!(ctx.lookup(&"z", 0), None);
    }
}
