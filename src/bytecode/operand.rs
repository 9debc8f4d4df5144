use std::fmt;

/// A virtual register operand. Registers are encoded as a single i32 word:
/// local (callee) slots are negative (`-1 - index`), argument slots are
/// non-negative starting with the receiver at slot 0, and constant pool slots
/// start at `FIRST_CONSTANT_INDEX`. The encoding is what is written into the
/// instruction stream, so a register operand and a pooled constant operand
/// are interchangeable wherever a value is read.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualRegister(i32);

/// Argument slot of the receiver.
const RECEIVER_SLOT_INDEX: i32 = 0;

/// Encoding of the frame's callee slot, below the lowest local slot.
const CALLEE_SLOT: i32 = -0x4000_0000;

/// Argument slot of the first declared parameter.
pub const FIRST_PARAMETER_SLOT_INDEX: usize = 1;

impl VirtualRegister {
    /// First register index that refers to the constant pool.
    pub const FIRST_CONSTANT_INDEX: i32 = 0x4000_0000;

    pub const MAX_LOCAL_INDEX: usize = 0x3FFF_FFFE;
    pub const MAX_ARGUMENT_INDEX: usize = Self::FIRST_CONSTANT_INDEX as usize - 1;
    pub const MAX_CONSTANT_INDEX: usize = (i32::MAX - Self::FIRST_CONSTANT_INDEX) as usize;

    /// Construct a register for the local (callee) slot with the given index.
    #[inline]
    pub fn local(index: usize) -> VirtualRegister {
        debug_assert!(index <= Self::MAX_LOCAL_INDEX);
        VirtualRegister(-1 - (index as i32))
    }

    /// Construct a register for an argument slot. Slot 0 is the receiver, so
    /// the i'th declared parameter lives at slot `FIRST_PARAMETER_SLOT_INDEX + i`.
    #[inline]
    pub fn argument(index: usize) -> VirtualRegister {
        debug_assert!(index <= Self::MAX_ARGUMENT_INDEX);
        VirtualRegister(index as i32)
    }

    /// Construct a register for the i'th declared parameter.
    #[inline]
    pub fn parameter(index: usize) -> VirtualRegister {
        Self::argument(FIRST_PARAMETER_SLOT_INDEX + index)
    }

    /// Construct a register referencing the receiver (`this`) slot.
    #[inline]
    pub fn this() -> VirtualRegister {
        VirtualRegister(RECEIVER_SLOT_INDEX)
    }

    /// Construct a register referencing the frame's callee slot.
    #[inline]
    pub fn callee() -> VirtualRegister {
        VirtualRegister(CALLEE_SLOT)
    }

    /// Construct a register referencing the constant pool slot with the given
    /// index.
    #[inline]
    pub fn constant(index: usize) -> VirtualRegister {
        debug_assert!(index <= Self::MAX_CONSTANT_INDEX);
        VirtualRegister(Self::FIRST_CONSTANT_INDEX + index as i32)
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.0 < 0 && self.0 != CALLEE_SLOT
    }

    #[inline]
    pub fn is_callee(&self) -> bool {
        self.0 == CALLEE_SLOT
    }

    #[inline]
    pub fn is_argument(&self) -> bool {
        self.0 >= 0 && self.0 < Self::FIRST_CONSTANT_INDEX
    }

    #[inline]
    pub fn is_this(&self) -> bool {
        self.0 == RECEIVER_SLOT_INDEX
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.0 >= Self::FIRST_CONSTANT_INDEX
    }

    #[inline]
    pub fn local_index(&self) -> usize {
        debug_assert!(self.is_local());
        (-1 - self.0) as usize
    }

    #[inline]
    pub fn argument_index(&self) -> usize {
        debug_assert!(self.is_argument());
        self.0 as usize
    }

    #[inline]
    pub fn constant_index(&self) -> usize {
        debug_assert!(self.is_constant());
        (self.0 - Self::FIRST_CONSTANT_INDEX) as usize
    }

    /// The raw i32 word written into the instruction stream.
    #[inline]
    pub fn encode(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn decode(word: i32) -> VirtualRegister {
        VirtualRegister(word)
    }
}

impl fmt::Display for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_callee() {
            write!(f, "<callee>")
        } else if self.is_local() {
            write!(f, "r{}", self.local_index())
        } else if self.is_this() {
            write!(f, "<this>")
        } else if self.is_argument() {
            write!(f, "a{}", self.argument_index())
        } else {
            write!(f, "c{}", self.constant_index())
        }
    }
}

impl fmt::Debug for VirtualRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
