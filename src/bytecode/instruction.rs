use std::collections::{HashMap, HashSet};

use crate::count;
use crate::debug_print::DebugPrinter;

use super::operand::VirtualRegister;
use super::writer::BytecodeWriter;

/// Kinds of operand words an instruction may carry.
#[derive(Clone, Copy, PartialEq)]
pub enum OperandType {
    /// A register operand (local, argument, or constant pool slot).
    Register,
    /// An unsigned index (constant index, identifier index, count, profile).
    UInt,
    /// A signed value, e.g. a jump displacement in words.
    SInt,
}

macro_rules! operand_rust_type {
    (Register) => { VirtualRegister };
    (UInt) => { u32 };
    (SInt) => { i32 };
}

macro_rules! operand_to_word {
    (Register, $value:expr) => {
        $value.encode()
    };
    (UInt, $value:expr) => {
        $value as i32
    };
    (SInt, $value:expr) => {
        $value
    };
}

macro_rules! define_instructions {
    ($(
        $(#[$($attrs:tt)*])* $opcode:ident ($snake:ident) {
            $([$operand_idx:expr] $operand_name:ident: $operand_type:ident,)*
        })
    *) => {
        #[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
        #[repr(u8)]
        pub enum OpCode {
            $($(#[$($attrs)*])* $opcode,)*
        }

        impl OpCode {
            pub fn operand_types(self) -> &'static [OperandType] {
                match self {
                    $(OpCode::$opcode => &[$(OperandType::$operand_type,)*],)*
                }
            }

            pub fn num_operands(self) -> usize {
                match self {
                    $(OpCode::$opcode => count!($($operand_name)*),)*
                }
            }

            /// Total length of the instruction in words, including the opcode
            /// word.
            pub fn length(self) -> usize {
                1 + self.num_operands()
            }

            #[inline]
            pub fn from_word(word: i32) -> OpCode {
                unsafe { std::mem::transmute(word as u8) }
            }
        }

        /// Instruction writing methods, one per opcode.
        impl BytecodeWriter {
            $(
                pub fn $snake(&mut self, $($operand_name: operand_rust_type!($operand_type),)*) {
                    self.start_instruction(OpCode::$opcode);
                    $(self.push_word(operand_to_word!($operand_type, $operand_name));)*
                }
            )*
        }
    };
}

define_instructions!(
    /// Function prologue.
    Enter (enter) {}

    /// Load the scope the function was closed over into a register.
    GetScope (get_scope) {
        [0] dest: Register,
    }

    /// Copy a value between registers.
    Mov (mov) {
        [0] dest: Register,
        [1] src: Register,
    }

    /// Convert the receiver to the `this` value seen by the function body.
    ToThis (to_this) {
        [0] src_dest: Register,
    }

    /// Allocate the `this` object for a constructor call.
    CreateThis (create_this) {
        [0] dest: Register,
    }

    /// Logical negation.
    Not (not) {
        [0] dest: Register,
        [1] src: Register,
    }

    /// Numeric negation.
    Negate (negate) {
        [0] dest: Register,
        [1] src: Register,
    }

    /// Convert a value to a number.
    ToNumber (to_number) {
        [0] dest: Register,
        [1] src: Register,
    }

    /// The `typeof` operator.
    TypeOf (type_of) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsUndefined (is_undefined) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsBoolean (is_boolean) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsNumber (is_number) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsString (is_string) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsObject (is_object) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsObjectOrNull (is_object_or_null) {
        [0] dest: Register,
        [1] src: Register,
    }

    IsFunction (is_function) {
        [0] dest: Register,
        [1] src: Register,
    }

    /// Loose equality against null or undefined.
    EqNull (eq_null) {
        [0] dest: Register,
        [1] src: Register,
    }

    NeqNull (neq_null) {
        [0] dest: Register,
        [1] src: Register,
    }

    Eq (eq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Neq (neq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    StrictEq (strict_eq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    NStrictEq (nstrict_eq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Less (less) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    LessEq (less_eq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Greater (greater) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    GreaterEq (greater_eq) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Add (add) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Sub (sub) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Mul (mul) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Div (div) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    Mod (mod_) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    BitOr (bit_or) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    BitAnd (bit_and) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    BitXor (bit_xor) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    LeftShift (left_shift) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    RightShift (right_shift) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    UnsignedRightShift (unsigned_right_shift) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    In (in_) {
        [0] dest: Register,
        [1] left: Register,
        [2] right: Register,
    }

    InstanceOf (instance_of) {
        [0] dest: Register,
        [1] value: Register,
        [2] prototype: Register,
    }

    /// Increment in place.
    Inc (inc) {
        [0] src_dest: Register,
    }

    /// Decrement in place.
    Dec (dec) {
        [0] src_dest: Register,
    }

    /// Allocate an empty object.
    NewObject (new_object) {
        [0] dest: Register,
        [1] allocation_profile: UInt,
    }

    /// Allocate an array from a contiguous run of `argc` registers starting
    /// at `argv`.
    NewArray (new_array) {
        [0] dest: Register,
        [1] argv: Register,
        [2] argc: UInt,
        [3] allocation_profile: UInt,
    }

    /// Create a closure from the function at the given index in the function
    /// table, closed over the current scope.
    NewFunction (new_function) {
        [0] dest: Register,
        [1] function_index: UInt,
    }

    /// Load the template object for a tagged template, identified by its
    /// template key in the constant pool.
    GetTemplateObject (get_template_object) {
        [0] dest: Register,
        [1] template_key: UInt,
    }

    /// Concatenate `count` strings starting at `src`.
    StrCat (str_cat) {
        [0] dest: Register,
        [1] src: Register,
        [2] count: UInt,
    }

    GetById (get_by_id) {
        [0] dest: Register,
        [1] base: Register,
        [2] identifier: UInt,
        [3] profile: UInt,
    }

    PutById (put_by_id) {
        [0] base: Register,
        [1] identifier: UInt,
        [2] value: Register,
    }

    GetByVal (get_by_val) {
        [0] dest: Register,
        [1] base: Register,
        [2] property: Register,
        [3] profile: UInt,
    }

    PutByVal (put_by_val) {
        [0] base: Register,
        [1] property: Register,
        [2] value: Register,
    }

    /// Direct load of a structure property during for-in enumeration.
    GetDirectPname (get_direct_pname) {
        [0] dest: Register,
        [1] base: Register,
        [2] property: Register,
        [3] index: Register,
        [4] enumerator: Register,
    }

    /// Call a function. Arguments are a contiguous run of `argc` registers
    /// starting at `argv`, receiver first.
    Call (call) {
        [0] dest: Register,
        [1] function: Register,
        [2] argv: Register,
        [3] argc: UInt,
        [4] profile: UInt,
    }

    /// Call that may be a direct eval.
    CallEval (call_eval) {
        [0] dest: Register,
        [1] function: Register,
        [2] argv: Register,
        [3] argc: UInt,
        [4] profile: UInt,
    }

    Construct (construct) {
        [0] dest: Register,
        [1] function: Register,
        [2] argv: Register,
        [3] argc: UInt,
        [4] profile: UInt,
    }

    /// Return from a function.
    Ret (ret) {
        [0] src: Register,
    }

    /// Terminate a program or eval unit, producing its completion value. Also
    /// used as the "no previous instruction" sentinel for peephole fusion.
    End (end) {
        [0] src: Register,
    }

    /// Unconditional jump, displacement in words from the instruction start.
    Jmp (jmp) {
        [0] offset: SInt,
    }

    JTrue (jtrue) {
        [0] condition: Register,
        [1] offset: SInt,
    }

    JFalse (jfalse) {
        [0] condition: Register,
        [1] offset: SInt,
    }

    /// Fused compare-and-branch forms.
    JLess (jless) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JLessEq (jless_eq) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JGreater (jgreater) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JGreaterEq (jgreater_eq) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JNLess (jnless) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JNLessEq (jnless_eq) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JNGreater (jngreater) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JNGreaterEq (jngreater_eq) {
        [0] left: Register,
        [1] right: Register,
        [2] offset: SInt,
    }

    JEqNull (jeq_null) {
        [0] src: Register,
        [1] offset: SInt,
    }

    JNeqNull (jneq_null) {
        [0] src: Register,
        [1] offset: SInt,
    }

    /// Dense jump table switch over small integers.
    SwitchImm (switch_imm) {
        [0] table_index: UInt,
        [1] default_offset: SInt,
        [2] scrutinee: Register,
    }

    /// Dense jump table switch over single character strings.
    SwitchChar (switch_char) {
        [0] table_index: UInt,
        [1] default_offset: SInt,
        [2] scrutinee: Register,
    }

    /// Hash table switch over strings.
    SwitchString (switch_string) {
        [0] table_index: UInt,
        [1] default_offset: SInt,
        [2] scrutinee: Register,
    }

    Throw (throw) {
        [0] src: Register,
    }

    /// Throw a TypeError or ReferenceError with a message from the constant
    /// pool.
    ThrowStaticError (throw_static_error) {
        [0] message: UInt,
        [1] is_reference_error: UInt,
    }

    /// Landing pad of an exception handler. Receives the exception object and
    /// the thrown value.
    Catch (catch) {
        [0] exception: Register,
        [1] thrown_value: Register,
    }

    /// Throw a ReferenceError if the value is the empty TDZ sentinel.
    CheckTdz (check_tdz) {
        [0] src: Register,
    }

    /// Allocate a lexical environment from a symbol table in the constant
    /// pool, parented to the given scope. Slots start out holding
    /// `initial_value` (undefined, or the TDZ sentinel).
    CreateLexicalEnvironment (create_lexical_environment) {
        [0] dest: Register,
        [1] parent: Register,
        [2] symbol_table: UInt,
        [3] initial_value: Register,
    }

    GetParentScope (get_parent_scope) {
        [0] dest: Register,
        [1] scope: Register,
    }

    /// Push a `with` scope wrapping the given object.
    PushWithScope (push_with_scope) {
        [0] dest: Register,
        [1] object: Register,
        [2] parent: Register,
    }

    /// Walk the scope chain at runtime to find the scope holding a name.
    ResolveScope (resolve_scope) {
        [0] dest: Register,
        [1] scope: Register,
        [2] identifier: UInt,
        [3] resolve_type: UInt,
        [4] depth: UInt,
    }

    GetFromScope (get_from_scope) {
        [0] dest: Register,
        [1] scope: Register,
        [2] identifier: UInt,
        [3] resolve_mode_and_type: UInt,
        [4] symbol_table_or_depth: UInt,
        [5] scope_offset: UInt,
        [6] profile: UInt,
    }

    PutToScope (put_to_scope) {
        [0] scope: Register,
        [1] identifier: UInt,
        [2] value: Register,
        [3] resolve_mode_and_type: UInt,
        [4] symbol_table_or_depth: UInt,
        [5] scope_offset: UInt,
    }

    GetFromArguments (get_from_arguments) {
        [0] dest: Register,
        [1] arguments: Register,
        [2] index: UInt,
        [3] profile: UInt,
    }

    PutToArguments (put_to_arguments) {
        [0] arguments: Register,
        [1] index: UInt,
        [2] value: Register,
    }

    /// Allocate an arguments object aliasing the raw argument registers.
    CreateDirectArguments (create_direct_arguments) {
        [0] dest: Register,
    }

    /// Allocate an arguments object whose slots live in the given scope.
    CreateScopedArguments (create_scoped_arguments) {
        [0] dest: Register,
        [1] scope: Register,
    }

    /// Allocate an unmapped arguments object by copying the actuals.
    CreateOutOfBandArguments (create_out_of_band_arguments) {
        [0] dest: Register,
    }

    GetEnumerableLength (get_enumerable_length) {
        [0] dest: Register,
        [1] base: Register,
    }

    GetPropertyEnumerator (get_property_enumerator) {
        [0] dest: Register,
        [1] base: Register,
    }

    HasGenericProperty (has_generic_property) {
        [0] dest: Register,
        [1] base: Register,
        [2] property: Register,
    }

    HasIndexedProperty (has_indexed_property) {
        [0] dest: Register,
        [1] base: Register,
        [2] property: Register,
    }

    HasStructureProperty (has_structure_property) {
        [0] dest: Register,
        [1] base: Register,
        [2] property: Register,
        [3] enumerator: Register,
    }

    EnumeratorStructurePname (enumerator_structure_pname) {
        [0] dest: Register,
        [1] enumerator: Register,
        [2] index: Register,
    }

    EnumeratorGenericPname (enumerator_generic_pname) {
        [0] dest: Register,
        [1] enumerator: Register,
        [2] index: Register,
    }

    ToIndexString (to_index_string) {
        [0] dest: Register,
        [1] index: Register,
    }

    /// Marks the back edge of a loop for the tiering heuristics.
    LoopHint (loop_hint) {}

    /// Debugger hook.
    Debug (debug) {
        [0] hook: UInt,
    }

    ProfileWillCall (profile_will_call) {
        [0] callee: Register,
    }

    ProfileDidCall (profile_did_call) {
        [0] callee: Register,
    }
);

/// Index of a jump instruction's displacement operand, if it has one.
pub fn jump_offset_operand_index(opcode: OpCode) -> Option<usize> {
    match opcode {
        OpCode::Jmp => Some(0),
        OpCode::JTrue
        | OpCode::JFalse
        | OpCode::JEqNull
        | OpCode::JNeqNull
        | OpCode::SwitchImm
        | OpCode::SwitchChar
        | OpCode::SwitchString => Some(1),
        OpCode::JLess
        | OpCode::JLessEq
        | OpCode::JGreater
        | OpCode::JGreaterEq
        | OpCode::JNLess
        | OpCode::JNLessEq
        | OpCode::JNGreater
        | OpCode::JNGreaterEq => Some(2),
        _ => None,
    }
}

/// How a dynamic scope access reports missing bindings.
#[derive(Clone, Copy, PartialEq)]
pub enum ResolveMode {
    ThrowIfNotFound,
    DoNotThrowIfNotFound,
}

/// Least upper bound of how far up the scope chain a dynamic lookup must
/// search. The linker may tighten this, never loosen it.
#[derive(Clone, Copy, PartialEq, Debug)]
#[repr(u8)]
pub enum ResolveType {
    GlobalProperty,
    GlobalPropertyWithVarInjectionChecks,
    Dynamic,
    /// The binding is a known closure variable of a known scope.
    LocalClosureVar,
}

/// Packed resolve mode + type operand.
#[derive(Clone, Copy)]
pub struct ResolveModeAndType {
    mode: ResolveMode,
    resolve_type: ResolveType,
}

impl ResolveModeAndType {
    pub fn new(mode: ResolveMode, resolve_type: ResolveType) -> Self {
        Self { mode, resolve_type }
    }

    pub fn operand(self) -> u32 {
        ((self.mode as u32) << 8) | self.resolve_type as u32
    }
}

/// Debugger hook kinds.
#[derive(Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum DebugHook {
    WillExecuteProgram,
    DidExecuteProgram,
    WillExecuteStatement,
}

/// Iterator over the instructions in a word stream. Yields the opcode and the
/// index of the instruction's first word.
pub struct InstructionIterator<'a> {
    pos: usize,
    words: &'a [i32],
}

impl<'a> InstructionIterator<'a> {
    pub fn new(words: &'a [i32]) -> Self {
        Self { pos: 0, words }
    }
}

impl<'a> Iterator for InstructionIterator<'a> {
    type Item = (OpCode, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.words.len() {
            return None;
        }

        let start = self.pos;
        let opcode = OpCode::from_word(self.words[start]);
        self.pos = start + opcode.length();

        Some((opcode, start))
    }
}

pub fn debug_format_instructions(words: &[i32], printer: &mut DebugPrinter) {
    // Initial pass to find the jump targets so that they can be labeled.
    let mut jump_targets = HashSet::new();
    let mut max_offset = 0;

    for (opcode, offset) in InstructionIterator::new(words) {
        max_offset = offset;

        if let Some(operand_index) = jump_offset_operand_index(opcode) {
            let jump_offset = words[offset + 1 + operand_index] as isize;
            jump_targets.insert((offset as isize + jump_offset) as usize);
        }
    }

    let offset_width = if max_offset == 0 { 1 } else { max_offset.ilog10() as usize + 1 };

    // Sort jump targets so that the label index is known
    let mut jump_targets: Vec<usize> = jump_targets.into_iter().collect();
    jump_targets.sort();
    let jump_targets: HashMap<usize, usize> = jump_targets
        .into_iter()
        .enumerate()
        .map(|(i, offset)| (offset, i))
        .collect();

    // Second pass through instructions, this time actually writing them
    for (opcode, offset) in InstructionIterator::new(words) {
        // Print the label on its own line if this is a jump target
        if let Some(label_index) = jump_targets.get(&offset) {
            printer.dec_indent();
            printer.write_indent();
            printer.inc_indent();

            printer.write(&format!(".L{}:\n", label_index));
        }

        // First print the padded instruction offset
        printer.write_indent();
        printer.write(&format!("{:>width$}: ", offset, width = offset_width));

        // Then print the raw words of the instruction
        if !printer.ignore_raw_words() {
            for word in &words[offset..offset + opcode.length()] {
                printer.write(&format!("{:08x} ", *word as u32));
            }
        }

        // Then print the instruction in a readable form
        printer.write(&format!("  {:?}", opcode));

        let operand_types = opcode.operand_types();
        for (i, operand_type) in operand_types.iter().enumerate() {
            let word = words[offset + 1 + i];

            printer.write(if i == 0 { " " } else { ", " });

            match operand_type {
                OperandType::Register => {
                    printer.write(&VirtualRegister::decode(word).to_string())
                }
                OperandType::UInt => printer.write(&format!("{}", word as u32)),
                OperandType::SInt => printer.write(&format!("{}", word)),
            }
        }

        // If this is a jump instruction, print the target label following the
        // jump offset
        if let Some(operand_index) = jump_offset_operand_index(opcode) {
            let jump_offset = words[offset + 1 + operand_index] as isize;
            let target_offset = (offset as isize + jump_offset) as usize;
            let target_label = jump_targets[&target_offset];

            printer.write(&format!(" (.L{})", target_label));
        }

        printer.write("\n");
    }
}
