use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use indexmap::IndexSet;
use num_bigint::BigInt;

use crate::common::interner::Identifier;

use super::generator::{EmitError, EmitResult};
use super::operand::VirtualRegister;
use super::symbol_table::SymbolTable;

/// The raw and cooked strings of a template literal, used to deduplicate
/// template objects across evaluations of the same call site.
#[derive(PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub raw: Vec<Identifier>,
    pub cooked: Vec<Identifier>,
}

/// A value stored in the constant pool.
#[derive(Clone)]
pub enum ConstantValue {
    Undefined,
    Null,
    /// The sentinel value a TDZ binding holds before its initialization.
    Empty,
    Bool(bool),
    Number(f64),
    /// Interned string, also used for identifier-valued constants.
    String(Identifier),
    BigInt(Rc<BigInt>),
    TemplateKey(Rc<TemplateKey>),
    /// Metadata for a heap scope allocated by this function.
    SymbolTable(Rc<RefCell<SymbolTable>>),
}

impl ConstantValue {
    pub fn as_string(&self) -> Option<&Identifier> {
        match self {
            ConstantValue::String(string) => Some(string),
            _ => None,
        }
    }
}

/// Deduplication key for pool entries. Numbers are keyed on their raw bits so
/// that +0 and -0 stay distinct. Symbol tables are never deduplicated and get
/// a unique counter key instead.
#[derive(PartialEq, Eq, Hash)]
enum ConstantKey {
    Undefined,
    Null,
    Empty,
    Bool(bool),
    NumberBits(u64),
    String(Identifier),
    BigInt(Rc<BigInt>),
    TemplateKey(Rc<TemplateKey>),
    SymbolTable(u32),
}

pub struct ConstantTableBuilder {
    constants: Vec<ConstantValue>,
    /// Cache of constants that have already been added, mapped to their index.
    cache: HashMap<ConstantKey, u32>,
    /// Unique keys for symbol table entries.
    num_symbol_tables: u32,
}

impl ConstantTableBuilder {
    pub fn new() -> Self {
        Self { constants: vec![], cache: HashMap::new(), num_symbol_tables: 0 }
    }

    fn insert_if_missing(
        &mut self,
        key: ConstantKey,
        value: ConstantValue,
    ) -> EmitResult<u32> {
        if let Some(index) = self.cache.get(&key) {
            return Ok(*index);
        }

        if self.constants.len() > VirtualRegister::MAX_CONSTANT_INDEX {
            return Err(EmitError::ConstantTableTooLarge);
        }

        let index = self.constants.len() as u32;
        self.constants.push(value);
        self.cache.insert(key, index);

        Ok(index)
    }

    pub fn add_undefined(&mut self) -> EmitResult<u32> {
        self.insert_if_missing(ConstantKey::Undefined, ConstantValue::Undefined)
    }

    pub fn add_null(&mut self) -> EmitResult<u32> {
        self.insert_if_missing(ConstantKey::Null, ConstantValue::Null)
    }

    pub fn add_empty(&mut self) -> EmitResult<u32> {
        self.insert_if_missing(ConstantKey::Empty, ConstantValue::Empty)
    }

    pub fn add_bool(&mut self, value: bool) -> EmitResult<u32> {
        self.insert_if_missing(ConstantKey::Bool(value), ConstantValue::Bool(value))
    }

    pub fn add_number(&mut self, value: f64) -> EmitResult<u32> {
        self.insert_if_missing(
            ConstantKey::NumberBits(value.to_bits()),
            ConstantValue::Number(value),
        )
    }

    /// Add a string to the constant table. The string must be interned.
    pub fn add_string(&mut self, value: &Identifier) -> EmitResult<u32> {
        self.insert_if_missing(
            ConstantKey::String(value.clone()),
            ConstantValue::String(value.clone()),
        )
    }

    pub fn add_bigint(&mut self, value: Rc<BigInt>) -> EmitResult<u32> {
        self.insert_if_missing(
            ConstantKey::BigInt(value.clone()),
            ConstantValue::BigInt(value),
        )
    }

    pub fn add_template_key(&mut self, key: Rc<TemplateKey>) -> EmitResult<u32> {
        self.insert_if_missing(
            ConstantKey::TemplateKey(key.clone()),
            ConstantValue::TemplateKey(key),
        )
    }

    pub fn add_symbol_table(
        &mut self,
        symbol_table: Rc<RefCell<SymbolTable>>,
    ) -> EmitResult<u32> {
        let key = self.num_symbol_tables;
        self.num_symbol_tables += 1;
        self.insert_if_missing(
            ConstantKey::SymbolTable(key),
            ConstantValue::SymbolTable(symbol_table),
        )
    }

    /// The register operand referring to the pool entry at `index`.
    pub fn register_for(&self, index: u32) -> VirtualRegister {
        VirtualRegister::constant(index as usize)
    }

    pub fn get(&self, index: u32) -> &ConstantValue {
        &self.constants[index as usize]
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn finish(self) -> Vec<ConstantValue> {
        self.constants
    }
}

/// Deduplicated table of identifiers referenced by name-carrying instructions
/// (scope accesses, property accesses). Distinct from the constant pool: these
/// operands are names, not values.
pub struct IdentifierTable {
    identifiers: IndexSet<Identifier>,
}

/// Identifier operand denoting an unnamed entry, e.g. a parameter lifted into
/// a scope without a visible name.
pub const NO_IDENTIFIER: u32 = u32::MAX;

impl IdentifierTable {
    pub fn new() -> Self {
        Self { identifiers: IndexSet::new() }
    }

    pub fn add(&mut self, identifier: &Identifier) -> u32 {
        match self.identifiers.get_index_of(identifier) {
            Some(index) => index as u32,
            None => {
                let index = self.identifiers.len() as u32;
                self.identifiers.insert(identifier.clone());
                index
            }
        }
    }

    pub fn finish(self) -> Vec<Identifier> {
        self.identifiers.into_iter().collect()
    }
}
