use bitflags::bitflags;
use indexmap::IndexMap;

use crate::common::interner::Identifier;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct VariableEntryFlags: u8 {
        /// Variable is captured by a nested closure and must live in a heap scope.
        const CAPTURED = 1 << 0;
        /// Declared with `const`.
        const CONST = 1 << 1;
        /// Declared with `let`.
        const LET = 1 << 2;
        /// Declared with `var`.
        const VAR = 1 << 3;
    }
}

/// One declared variable in a static environment.
#[derive(Clone, Copy)]
pub struct VariableEntry {
    flags: VariableEntryFlags,
}

impl VariableEntry {
    pub fn new() -> VariableEntry {
        VariableEntry { flags: VariableEntryFlags::empty() }
    }

    pub fn is_captured(&self) -> bool {
        self.flags.contains(VariableEntryFlags::CAPTURED)
    }

    pub fn is_const(&self) -> bool {
        self.flags.contains(VariableEntryFlags::CONST)
    }

    pub fn is_let(&self) -> bool {
        self.flags.contains(VariableEntryFlags::LET)
    }

    pub fn is_var(&self) -> bool {
        self.flags.contains(VariableEntryFlags::VAR)
    }

    pub fn set_is_captured(&mut self) {
        self.flags |= VariableEntryFlags::CAPTURED;
    }

    pub fn set_is_const(&mut self) {
        self.flags |= VariableEntryFlags::CONST;
    }

    pub fn set_is_let(&mut self) {
        self.flags |= VariableEntryFlags::LET;
    }

    pub fn set_is_var(&mut self) {
        self.flags |= VariableEntryFlags::VAR;
    }
}

/// The statically known set of variables declared by one scope, with the
/// captured/const flags computed by the parser's analysis pass. Iteration
/// order is declaration order, which fixes the layout of heap scopes.
#[derive(Clone)]
pub struct VariableEnvironment {
    entries: IndexMap<Identifier, VariableEntry>,
}

impl VariableEnvironment {
    pub fn new() -> VariableEnvironment {
        VariableEnvironment { entries: IndexMap::new() }
    }

    /// Add a variable, returning its (possibly preexisting) entry.
    pub fn add(&mut self, name: Identifier) -> &mut VariableEntry {
        self.entries.entry(name).or_insert_with(VariableEntry::new)
    }

    pub fn contains(&self, name: &Identifier) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &Identifier) -> Option<&VariableEntry> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &Identifier) -> bool {
        self.entries.shift_remove(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &VariableEntry)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &Identifier> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark_all_variables_as_captured(&mut self) {
        for (_, entry) in self.entries.iter_mut() {
            entry.set_is_captured();
        }
    }

    pub fn has_captured_variables(&self) -> bool {
        self.entries.values().any(|entry| entry.is_captured())
    }
}
