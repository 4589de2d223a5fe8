use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use std::fmt;

/// Interned name of a type or member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Unchecked: the symbol is not validated against any table
    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }
}

/// Interns type and member names for the whole program.
///
/// Symbols are dense indices into the table, so resolving one is a plain
/// slice lookup. The table is filled while the hierarchy is built and is
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct NameTable {
    names: IndexSet<Box<str>, FxBuildHasher>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(index) = self.names.get_index_of(name) {
            return Symbol(index as u32);
        }
        let (index, _) = self.names.insert_full(name.into());
        Symbol(index as u32)
    }

    /// Look up a name without interning it
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.names.get_index_of(name).map(|index| Symbol(index as u32))
    }

    /// Panics if the symbol was not produced by this table
    pub fn resolve(&self, symbol: Symbol) -> &str {
        &self.names[symbol.0 as usize]
    }

    pub fn try_resolve(&self, symbol: Symbol) -> Option<&str> {
        self.names.get_index(symbol.0 as usize).map(|name| &**name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Package prefix of a dotted name: `a.b.C` -> `a.b`, `C` -> ``
    pub fn package_of(name: &str) -> &str {
        name.rfind('.').map_or("", |dot| &name[..dot])
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut names = NameTable::new();

        let a = names.intern("com.example.A");
        let b = names.intern("com.example.B");
        let again = names.intern("com.example.A");

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(names.len(), 2);
        assert_eq!(names.resolve(b), "com.example.B");
    }

    #[test]
    fn test_get_does_not_intern() {
        let mut names = NameTable::new();
        names.intern("foo");

        assert!(names.get("foo").is_some());
        assert!(names.get("bar").is_none());
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_try_resolve_unknown() {
        let names = NameTable::new();
        assert_eq!(names.try_resolve(Symbol::from_u32(42)), None);
    }

    #[test]
    fn test_package_of() {
        assert_eq!(NameTable::package_of("a.b.C"), "a.b");
        assert_eq!(NameTable::package_of("C"), "");
    }
}
