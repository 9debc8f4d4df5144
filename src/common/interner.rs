use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexSet;

/// An interned identifier string. Equal identifiers produced by the same
/// interner share their backing allocation, so equality is cheap in the
/// common case and falls back to a content comparison otherwise.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Identifier) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// Table of all identifier strings that have been interned for a context.
///
/// The generator never creates identifier strings itself - it receives this
/// table through its context so that every compilation unit in a context
/// shares one set of identifiers.
pub struct InternedStrings {
    strings: IndexSet<Rc<str>>,
}

impl InternedStrings {
    pub fn new() -> Self {
        Self { strings: IndexSet::new() }
    }

    pub fn get(&mut self, value: &str) -> Identifier {
        match self.strings.get(value) {
            Some(existing) => Identifier(existing.clone()),
            None => {
                let interned: Rc<str> = Rc::from(value);
                self.strings.insert(interned.clone());
                Identifier(interned)
            }
        }
    }

    pub fn num_strings(&self) -> usize {
        self.strings.len()
    }
}
