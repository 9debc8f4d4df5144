use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::common::interner::Identifier;

use super::operand::VirtualRegister;

/// What kind of scope a symbol table describes.
#[derive(Clone, Copy, PartialEq)]
pub enum ScopeType {
    /// A function or program's var scope.
    VarScope,
    /// An ordinary let/const block scope.
    LexicalScope,
    /// The scope binding a catch parameter.
    CatchScope,
    /// The scope binding a function expression's own name.
    FunctionNameScope,
}

/// Where a variable's storage lives.
#[derive(Clone, Copy, PartialEq)]
pub enum VarOffset {
    /// A stack register.
    Stack(VirtualRegister),
    /// An offset into the heap scope the symbol table describes.
    Scope(u32),
    /// An offset into the function's arguments object.
    DirectArgument(u32),
}

impl VarOffset {
    pub fn is_stack(&self) -> bool {
        matches!(self, VarOffset::Stack(_))
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, VarOffset::Scope(_))
    }

    /// Whether two offsets have the same storage kind.
    pub fn same_kind(&self, other: &VarOffset) -> bool {
        matches!(
            (self, other),
            (VarOffset::Stack(_), VarOffset::Stack(_))
                | (VarOffset::Scope(_), VarOffset::Scope(_))
                | (VarOffset::DirectArgument(_), VarOffset::DirectArgument(_))
        )
    }
}

/// Whether stores to a binding take effect, and what happens when they don't.
///
/// `SilentlyIgnored` models a non-strict function expression's self binding:
/// writes to it evaluate their right hand side and are then dropped without
/// throwing.
#[derive(Clone, Copy, PartialEq)]
pub enum Writable {
    Yes,
    /// Assignment throws a TypeError (const bindings, strict self bindings).
    No,
    /// Assignment is a silent no-op.
    SilentlyIgnored,
}

#[derive(Clone, Copy)]
pub struct SymbolTableEntry {
    pub offset: VarOffset,
    pub writable: Writable,
}

impl SymbolTableEntry {
    pub fn new(offset: VarOffset) -> SymbolTableEntry {
        SymbolTableEntry { offset, writable: Writable::Yes }
    }

    pub fn new_read_only(offset: VarOffset, writable: Writable) -> SymbolTableEntry {
        SymbolTableEntry { offset, writable }
    }
}

/// The name to storage mapping of one scope. Shared between the generator's
/// scope stack and the constant pool, where it becomes the runtime metadata
/// of the heap scope it describes.
pub struct SymbolTable {
    entries: IndexMap<Identifier, SymbolTableEntry>,
    scope_type: ScopeType,
    /// Next offset to hand out in the described heap scope.
    next_scope_offset: u32,
    /// For scoped arguments: the number of arguments and the scope offset
    /// each argument was lifted to.
    arguments_length: Option<u32>,
    argument_offsets: Vec<u32>,
}

impl SymbolTable {
    pub fn new(scope_type: ScopeType) -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            entries: IndexMap::new(),
            scope_type,
            next_scope_offset: 0,
            arguments_length: None,
            argument_offsets: vec![],
        }))
    }

    pub fn scope_type(&self) -> ScopeType {
        self.scope_type
    }

    pub fn get(&self, name: &Identifier) -> Option<SymbolTableEntry> {
        self.entries.get(name).copied()
    }

    pub fn set(&mut self, name: Identifier, entry: SymbolTableEntry) {
        self.entries.insert(name, entry);
    }

    pub fn contains(&self, name: &Identifier) -> bool {
        self.entries.contains_key(name)
    }

    /// Assign the next sequential offset in the described heap scope.
    pub fn take_next_scope_offset(&mut self) -> u32 {
        let offset = self.next_scope_offset;
        self.next_scope_offset += 1;
        offset
    }

    /// Number of slots in the described heap scope.
    pub fn scope_size(&self) -> u32 {
        self.next_scope_offset
    }

    pub fn set_arguments_length(&mut self, length: u32) {
        self.arguments_length = Some(length);
    }

    pub fn arguments_length(&self) -> Option<u32> {
        self.arguments_length
    }

    pub fn set_argument_offset(&mut self, argument_index: usize, offset: u32) {
        if self.argument_offsets.len() <= argument_index {
            self.argument_offsets.resize(argument_index + 1, 0);
        }
        self.argument_offsets[argument_index] = offset;
    }

    pub fn argument_offsets(&self) -> &[u32] {
        &self.argument_offsets
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &SymbolTableEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One active scope on the generator's symbol table stack.
#[derive(Clone)]
pub struct SymbolTableStackEntry {
    /// The scope's symbol table. With scopes have none: their bindings are
    /// only knowable at runtime.
    pub symbol_table: Option<Rc<RefCell<SymbolTable>>>,
    /// The register holding the materialized heap scope, if any variable of
    /// the scope is captured.
    pub scope_register: Option<VirtualRegister>,
    pub is_with_scope: bool,
    /// Constant pool index of the symbol table, present when the scope was
    /// materialized.
    pub symbol_table_constant_index: Option<u32>,
}

/// How a variable reference was resolved, fixing how reads and writes of it
/// compile. An unresolved variable must use the dynamic scope chain lookup.
#[derive(Clone)]
pub struct Variable {
    ident: Identifier,
    offset: Option<VarOffset>,
    writable: Writable,
    /// Constant pool index of the owning scope's symbol table.
    symbol_table_constant_index: Option<u32>,
    /// Whether the binding is lexically scoped, i.e. writes to a read-only
    /// binding must throw even outside strict mode.
    is_lexically_scoped: bool,
}

impl Variable {
    pub fn resolved(
        ident: Identifier,
        offset: VarOffset,
        writable: Writable,
        symbol_table_constant_index: Option<u32>,
        is_lexically_scoped: bool,
    ) -> Variable {
        Variable {
            ident,
            offset: Some(offset),
            writable,
            symbol_table_constant_index,
            is_lexically_scoped,
        }
    }

    pub fn unresolved(ident: Identifier) -> Variable {
        Variable {
            ident,
            offset: None,
            writable: Writable::Yes,
            symbol_table_constant_index: None,
            is_lexically_scoped: false,
        }
    }

    pub fn ident(&self) -> &Identifier {
        &self.ident
    }

    pub fn offset(&self) -> Option<VarOffset> {
        self.offset
    }

    pub fn is_resolved(&self) -> bool {
        self.offset.is_some()
    }

    /// The stack register the variable lives in, if it is stack resident.
    pub fn local(&self) -> Option<VirtualRegister> {
        match self.offset {
            Some(VarOffset::Stack(register)) => Some(register),
            _ => None,
        }
    }

    pub fn writable(&self) -> Writable {
        self.writable
    }

    pub fn is_read_only(&self) -> bool {
        self.writable != Writable::Yes
    }

    pub fn symbol_table_constant_index(&self) -> Option<u32> {
        self.symbol_table_constant_index
    }

    pub fn is_lexically_scoped(&self) -> bool {
        self.is_lexically_scoped
    }
}
