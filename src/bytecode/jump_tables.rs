use hashbrown::HashMap;

use crate::common::interner::Identifier;

/// Dense jump table for switches over small integers or single characters.
/// Branch offsets are relative to the switch instruction's own index; an
/// offset of 0 means "fall through to the default target".
pub struct SimpleJumpTable {
    pub min: i32,
    pub branch_offsets: Vec<i32>,
}

impl SimpleJumpTable {
    pub fn new(min: i32, max: i32) -> SimpleJumpTable {
        debug_assert!(min <= max);
        SimpleJumpTable { min, branch_offsets: vec![0; (max - min + 1) as usize] }
    }

    pub fn add(&mut self, key: i32, offset: i32) {
        let index = (key - self.min) as usize;
        // First matching clause wins for duplicated case values.
        if self.branch_offsets[index] == 0 {
            self.branch_offsets[index] = offset;
        }
    }

    pub fn offset_for_key(&self, key: i32) -> Option<i32> {
        if key < self.min {
            return None;
        }

        match self.branch_offsets.get((key - self.min) as usize) {
            Some(offset) if *offset != 0 => Some(*offset),
            _ => None,
        }
    }
}

/// Hash table for switches over strings. Offsets are relative to the switch
/// instruction's own index.
pub struct StringJumpTable {
    pub offsets: HashMap<Identifier, i32>,
}

impl StringJumpTable {
    pub fn new() -> StringJumpTable {
        StringJumpTable { offsets: HashMap::new() }
    }

    pub fn add(&mut self, key: Identifier, offset: i32) {
        // First matching clause wins for duplicated case values.
        self.offsets.entry(key).or_insert(offset);
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum SwitchKind {
    Immediate,
    Character,
    String,
}

/// An in-progress switch: the index of its instruction, so the table index
/// and default offset operands can be patched when the switch ends.
#[derive(Clone, Copy)]
pub struct SwitchInfo {
    pub instruction_index: usize,
    pub kind: SwitchKind,
}
