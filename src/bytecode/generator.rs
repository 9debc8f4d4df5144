use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexSet;

use crate::common::context::Context;
use crate::common::interner::Identifier;
use crate::parser::ast::{self, ConstructorKind, FunctionMode};
use crate::parser::environment::VariableEnvironment;

use super::constant_table::{ConstantTableBuilder, IdentifierTable, TemplateKey, NO_IDENTIFIER};
use super::exception_handlers::{ExceptionHandler, ExceptionHandlersBuilder, HandlerKind};
use super::function::{dump_code_block, CodeBlock, CodeType};
use super::instruction::{
    DebugHook, OpCode, ResolveMode, ResolveModeAndType, ResolveType,
};
use super::jump_tables::{SimpleJumpTable, StringJumpTable, SwitchInfo, SwitchKind};
use super::label::{Label, LabelId, LabelScope, LabelScopeType};
use super::operand::VirtualRegister;
use super::register_allocator::RegisterAllocator;
use super::symbol_table::{
    ScopeType, SymbolTable, SymbolTableEntry, SymbolTableStackEntry, VarOffset, Variable,
    Writable,
};
use super::writer::BytecodeWriter;

pub type EmitResult<T> = Result<T, EmitError>;

#[derive(Debug, PartialEq)]
pub enum EmitError {
    /// AST nesting exceeded the depth budget. The walk still completes, but
    /// the produced code block is garbage and must be discarded.
    ExpressionTooDeep,
    TooManyRegisters,
    TooManyFunctionParameters,
    ConstantTableTooLarge,
}

impl Error for EmitError {}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::ExpressionTooDeep => write!(f, "Expression too deep"),
            EmitError::TooManyRegisters => write!(f, "Too many registers"),
            EmitError::TooManyFunctionParameters => write!(f, "Too many function parameters"),
            EmitError::ConstantTableTooLarge => write!(f, "Constant table too large"),
        }
    }
}

/// Nesting budget for the AST walk.
const EXPRESSION_DEPTH_LIMIT: u32 = 4096;

const READONLY_WRITE_ERROR: &str = "Attempted to assign to readonly property.";
const NOT_OBJECT_ITERATOR_RESULT_ERROR: &str = "Iterator result interface is not an object.";
const CALL_CLASS_CONSTRUCTOR_ERROR: &str = "Cannot call a class constructor";
const DERIVED_NON_OBJECT_RETURN_ERROR: &str =
    "Cannot return a non-object type in the constructor of a derived class.";

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct StoreFlags: u8 {
        /// The store is the binding's initialization: read-only and TDZ
        /// checks do not apply.
        const INITIALIZATION = 1 << 0;
    }
}

/// Destination requested for an expression's value.
#[derive(Clone, Copy)]
enum ExprDest {
    /// Any register, including a reused local holding the variable itself.
    Any,
    /// The value must end up in this register.
    Fixed(VirtualRegister),
}

/// Whether a statement's control flow can reach the next statement.
#[derive(Clone, Copy, PartialEq)]
enum StmtCompletion {
    Normal,
    /// Control does not implicitly continue, e.g. return/throw/break.
    Abrupt,
}

impl StmtCompletion {
    fn is_abrupt(&self) -> bool {
        *self == StmtCompletion::Abrupt
    }

    fn combine(&self, other: StmtCompletion) -> StmtCompletion {
        if self.is_abrupt() || other.is_abrupt() {
            StmtCompletion::Abrupt
        } else {
            StmtCompletion::Normal
        }
    }
}

/// One identifier set of the TDZ stack: the variables whose reads need a
/// check, and whether statically proven initializations may lift checks.
#[derive(Clone)]
struct TdzStackEntry {
    variables: IndexSet<Identifier>,
    can_optimize: bool,
}

/// An active try whose handler has not been emitted yet.
#[derive(Clone, Copy)]
struct TryContext {
    start: LabelId,
    try_data: usize,
}

/// A `[start, end)` range covered by a handler. Compiled into the exception
/// handler table once all labels are resolved; degenerate ranges are dropped.
struct TryRange {
    start: LabelId,
    end: LabelId,
    try_data: usize,
}

/// One handler target. The kind is filled in when the handler is emitted.
struct TryData {
    target: LabelId,
    handler_kind: Option<HandlerKind>,
}

/// Snapshot of the control-flow machinery at the point a finally (or
/// synthesized iterator close) was entered. Non-local exits truncate every
/// stack back to these sizes, replay the cleanup code, and then restore.
#[derive(Clone)]
struct FinallyContext<'a> {
    /// The finally block to replay, or None for an iterator close context.
    finally_block: Option<&'a ast::Block>,
    /// The iterator to close, for iterator close contexts.
    iterator: Option<VirtualRegister>,
    scope_context_stack_size: usize,
    switch_context_stack_size: usize,
    for_in_context_stack_size: usize,
    try_context_stack_size: usize,
    label_scopes_size: usize,
    symbol_table_stack_size: usize,
    finally_depth: u32,
    local_scope_depth: u32,
}

#[derive(Clone)]
enum ControlFlowContext<'a> {
    /// A dynamic scope with no cleanup code, popped with a single scope
    /// chain step.
    Scope,
    Finally(FinallyContext<'a>),
}

impl<'a> ControlFlowContext<'a> {
    fn is_finally_block(&self) -> bool {
        matches!(self, ControlFlowContext::Finally(_))
    }
}

/// Associates a for-in loop variable with its enumeration registers so
/// property accesses keyed on the loop variable can compile to cheaper forms.
/// Invalidated in place when the loop variable may have been reassigned.
#[derive(Clone)]
enum ForInContext {
    Indexed {
        local: VirtualRegister,
        index: VirtualRegister,
        is_valid: bool,
    },
    Structure {
        local: VirtualRegister,
        index: VirtualRegister,
        property: VirtualRegister,
        enumerator: VirtualRegister,
        is_valid: bool,
    },
}

impl ForInContext {
    fn local(&self) -> VirtualRegister {
        match self {
            ForInContext::Indexed { local, .. } => *local,
            ForInContext::Structure { local, .. } => *local,
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            ForInContext::Indexed { is_valid, .. } => *is_valid,
            ForInContext::Structure { is_valid, .. } => *is_valid,
        }
    }

    fn invalidate(&mut self) {
        match self {
            ForInContext::Indexed { is_valid, .. } => *is_valid = false,
            ForInContext::Structure { is_valid, .. } => *is_valid = false,
        }
    }
}

/// How a hoisted function declaration is bound at entry.
#[derive(Clone, Copy, PartialEq)]
enum FunctionVariableType {
    /// Bound through the function or eval symbol table.
    NormalFunctionVariable,
    /// Stored as a property of the global object.
    GlobalFunctionVariable,
}

/// A nested function discovered during emission, generated later by the
/// program generator.
pub struct PendingFunctionNode<'a> {
    func: &'a ast::Function,
    /// Names under TDZ at the creation site, threaded into the nested unit.
    parent_scope_tdz: IndexSet<Identifier>,
    /// Slot in the parent's function table to patch.
    index: usize,
}

pub struct EmitFunctionResult<'a> {
    pub code_block: Rc<CodeBlock>,
    pub pending_functions: Vec<PendingFunctionNode<'a>>,
}

/// Bytecode generator for one compilation unit: a program, function, or eval.
///
/// Walks the AST and drives the register allocator, symbol table stack, TDZ
/// stack, and control-flow context stack to produce a finished CodeBlock.
pub struct BytecodeFunctionGenerator<'a> {
    cx: &'a Context,
    writer: BytecodeWriter,
    code_block: CodeBlock,

    registers: RegisterAllocator,
    labels: Vec<Label>,
    label_scopes: Vec<LabelScope>,

    symbol_table_stack: Vec<SymbolTableStackEntry>,
    tdz_stack: Vec<TdzStackEntry>,
    scope_context_stack: Vec<ControlFlowContext<'a>>,
    switch_context_stack: Vec<SwitchInfo>,
    for_in_context_stack: Vec<ForInContext>,
    try_context_stack: Vec<TryContext>,
    try_ranges: Vec<TryRange>,
    try_datas: Vec<TryData>,
    finally_depth: u32,
    local_scope_depth: u32,

    constant_table: ConstantTableBuilder,
    identifier_table: IdentifierTable,

    /// Register holding the innermost scope of the scope chain.
    scope_register: VirtualRegister,
    /// Register pinning the scope the unit was entered with.
    top_most_scope: VirtualRegister,
    this_register: VirtualRegister,
    callee_register: VirtualRegister,
    lexical_environment_register: Option<VirtualRegister>,
    arguments_register: Option<VirtualRegister>,

    is_strict: bool,
    is_constructor: bool,
    constructor_kind: ConstructorKind,
    is_builtin: bool,
    uses_non_strict_eval: bool,
    should_emit_debug_hooks: bool,
    should_emit_profile_hooks: bool,

    /// Hoisted functions bound during `generate`, after the callee and
    /// arguments bindings so that functions override both.
    functions_to_initialize: Vec<(&'a ast::Function, FunctionVariableType)>,
    /// Names of the unit's hoisted function declarations.
    functions: IndexSet<Identifier>,
    /// Whether `generate` must store the arguments object into the declared
    /// `arguments` variable.
    need_to_initialize_arguments: bool,

    /// Register receiving each completed statement's value, for program and
    /// eval units.
    statement_completion_dest: Option<VirtualRegister>,

    expression_depth: u32,
    expression_too_deep: bool,

    pending_functions: Vec<PendingFunctionNode<'a>>,
}

impl<'a> BytecodeFunctionGenerator<'a> {
    fn new(cx: &'a Context, name: Option<Identifier>, code_type: CodeType) -> Self {
        let options = &cx.options;
        Self {
            cx,
            writer: BytecodeWriter::new(),
            code_block: CodeBlock::new(name, code_type),
            registers: RegisterAllocator::new(),
            labels: vec![],
            label_scopes: vec![],
            symbol_table_stack: vec![],
            tdz_stack: vec![],
            scope_context_stack: vec![],
            switch_context_stack: vec![],
            for_in_context_stack: vec![],
            try_context_stack: vec![],
            try_ranges: vec![],
            try_datas: vec![],
            finally_depth: 0,
            local_scope_depth: 0,
            constant_table: ConstantTableBuilder::new(),
            identifier_table: IdentifierTable::new(),
            scope_register: VirtualRegister::this(),
            top_most_scope: VirtualRegister::this(),
            this_register: VirtualRegister::this(),
            callee_register: VirtualRegister::callee(),
            lexical_environment_register: None,
            arguments_register: None,
            is_strict: false,
            is_constructor: false,
            constructor_kind: ConstructorKind::None,
            is_builtin: false,
            uses_non_strict_eval: false,
            should_emit_debug_hooks: options.emit_debug_hooks,
            should_emit_profile_hooks: options.emit_profile_hooks,
            functions_to_initialize: vec![],
            functions: IndexSet::new(),
            need_to_initialize_arguments: false,
            statement_completion_dest: None,
            expression_depth: 0,
            expression_too_deep: false,
            pending_functions: vec![],
        }
    }

    pub fn new_for_program(cx: &'a Context, program: &'a ast::Program) -> Self {
        let name = cx.intern("<global>");
        let mut generator = Self::new(cx, Some(name), CodeType::Program);
        generator.is_strict = program.is_strict;
        generator
    }

    /// Create a generator for a function unit. `is_constructor` selects
    /// construct-mode code for class constructors; compiling a class
    /// constructor with it unset produces the call-mode block that throws.
    pub fn new_for_function(
        cx: &'a Context,
        func: &'a ast::Function,
        is_constructor: bool,
    ) -> EmitResult<Self> {
        if func.parameters.size() > VirtualRegister::MAX_ARGUMENT_INDEX {
            return Err(EmitError::TooManyFunctionParameters);
        }

        let mut generator = Self::new(cx, func.name.clone(), CodeType::Function);
        generator.is_strict = func.is_strict;
        generator.is_constructor = is_constructor;
        generator.constructor_kind = func.constructor_kind;
        generator.is_builtin = func.is_builtin;
        generator.uses_non_strict_eval = func.uses_eval && !func.is_strict;

        if func.is_builtin {
            generator.should_emit_debug_hooks = false;
        }

        Ok(generator)
    }

    pub fn new_for_eval(cx: &'a Context, eval: &'a ast::EvalNode) -> Self {
        let name = cx.intern("<eval>");
        let mut generator = Self::new(cx, Some(name), CodeType::Eval);
        generator.is_strict = eval.is_strict;
        generator.uses_non_strict_eval = eval.uses_eval && !eval.is_strict;
        generator
    }

    fn is_derived_constructor(&self) -> bool {
        self.is_constructor && self.constructor_kind == ConstructorKind::Derived
    }

    /*
     * Register primitives
     */

    fn new_temporary(&mut self) -> EmitResult<VirtualRegister> {
        self.registers.new_temporary()
    }

    fn new_block_scope_variable(&mut self) -> EmitResult<VirtualRegister> {
        self.registers.new_block_scope_variable()
    }

    fn add_var(&mut self) -> EmitResult<VirtualRegister> {
        self.code_block.num_vars += 1;
        self.registers.add_var()
    }

    /*
     * Label primitives
     */

    /// Allocate a new label, first reclaiming any dead labels from the tail
    /// of the arena. The label is returned retained; the creator releases it
    /// after its last use.
    fn new_label(&mut self) -> LabelId {
        while let Some(last) = self.labels.last() {
            if last.ref_count() != 0 {
                break;
            }
            self.labels.pop();
        }

        self.labels.push(Label::new());
        LabelId((self.labels.len() - 1) as u32)
    }

    fn release_label(&mut self, label: LabelId) {
        self.labels[label.0 as usize].release();
    }

    fn label_is_forward(&self, label: LabelId) -> bool {
        self.labels[label.0 as usize].is_forward()
    }

    fn label_location(&self, label: LabelId) -> usize {
        self.labels[label.0 as usize].location().unwrap()
    }

    /// Bind a jump at instruction index `from` to `label`, returning the
    /// displacement to encode. Forward jumps record `patch_index` and are
    /// patched when the label is emitted.
    fn bind_label(&mut self, label: LabelId, from: usize, patch_index: usize) -> i32 {
        self.labels[label.0 as usize].bind(from, patch_index)
    }

    /// Resolve a label to the current position, backpatching all recorded
    /// jumps to it.
    fn emit_label(&mut self, label: LabelId) {
        let location = self.writer.current_index();
        let patches = self.labels[label.0 as usize].set_location(location);

        for (from, patch_index) in patches {
            self.writer
                .set_word(patch_index, location as i32 - from as i32);
        }

        if let Some(last_target) = self.code_block.jump_targets.last() {
            debug_assert!(*last_target <= location);
            if *last_target == location {
                // Peephole fusion was already disabled by the last label.
                return;
            }
        }

        self.code_block.jump_targets.push(location);

        // A jump target must not be folded into the previous instruction.
        self.writer.kill_last_opcode();
    }

    fn new_label_scope(
        &mut self,
        scope_type: LabelScopeType,
        name: Option<Identifier>,
    ) -> usize {
        // Reclaim free label scopes.
        while let Some(last) = self.label_scopes.last() {
            if last.ref_count() != 0 {
                break;
            }
            self.label_scopes.pop();
        }

        let break_target = self.new_label();
        let continue_target = if scope_type == LabelScopeType::Loop {
            Some(self.new_label())
        } else {
            None
        };

        let scope = LabelScope::new(
            scope_type,
            name,
            self.label_scope_depth(),
            break_target,
            continue_target,
        );
        self.label_scopes.push(scope);
        self.label_scopes.len() - 1
    }

    fn release_label_scope(&mut self, index: usize) {
        self.label_scopes[index].release();
    }

    /// Find the target of a break statement.
    fn break_target(&mut self, name: Option<&Identifier>) -> Option<LabelScope> {
        // Reclaim free label scopes.
        while let Some(last) = self.label_scopes.last() {
            if last.ref_count() != 0 {
                break;
            }
            self.label_scopes.pop();
        }

        match name {
            None => self
                .label_scopes
                .iter()
                .rev()
                .find(|scope| scope.scope_type != LabelScopeType::NamedLabel)
                .cloned(),
            Some(name) => self
                .label_scopes
                .iter()
                .rev()
                .find(|scope| scope.name.as_ref() == Some(name))
                .cloned(),
        }
    }

    /// Find the target of a continue statement: the loop nested nearest to
    /// the matching label.
    fn continue_target(&mut self, name: Option<&Identifier>) -> Option<LabelScope> {
        while let Some(last) = self.label_scopes.last() {
            if last.ref_count() != 0 {
                break;
            }
            self.label_scopes.pop();
        }

        match name {
            None => self
                .label_scopes
                .iter()
                .rev()
                .find(|scope| scope.scope_type == LabelScopeType::Loop)
                .cloned(),
            Some(name) => {
                let mut result = None;
                for scope in self.label_scopes.iter().rev() {
                    if scope.scope_type == LabelScopeType::Loop {
                        result = Some(scope.clone());
                    }
                    if scope.name.as_ref() == Some(name) {
                        return result;
                    }
                }
                None
            }
        }
    }

    fn local_scope_depth(&self) -> u32 {
        self.local_scope_depth
    }

    fn label_scope_depth(&self) -> u32 {
        self.local_scope_depth() + self.finally_depth
    }

    /*
     * Constants and loads
     */

    fn add_identifier(&mut self, name: &Identifier) -> u32 {
        self.identifier_table.add(name)
    }

    fn undefined_constant(&mut self) -> EmitResult<VirtualRegister> {
        let index = self.constant_table.add_undefined()?;
        Ok(self.constant_table.register_for(index))
    }

    fn empty_constant(&mut self) -> EmitResult<VirtualRegister> {
        let index = self.constant_table.add_empty()?;
        Ok(self.constant_table.register_for(index))
    }

    fn string_constant(&mut self, value: &Identifier) -> EmitResult<VirtualRegister> {
        let index = self.constant_table.add_string(value)?;
        Ok(self.constant_table.register_for(index))
    }

    /// Load a pooled constant: returns the pool slot itself when no explicit
    /// destination is required.
    fn emit_load(
        &mut self,
        dest: ExprDest,
        constant: VirtualRegister,
    ) -> EmitResult<VirtualRegister> {
        match dest {
            ExprDest::Any => Ok(constant),
            ExprDest::Fixed(register) => {
                self.emit_move(register, constant);
                Ok(register)
            }
        }
    }

    fn emit_move(&mut self, dest: VirtualRegister, src: VirtualRegister) {
        debug_assert!(!dest.is_constant());
        if dest != src {
            self.writer.mov(dest, src);
        }
    }

    /// Store the distinguished TDZ sentinel into a register.
    fn emit_move_empty_value(&mut self, dest: VirtualRegister) -> EmitResult<()> {
        let empty = self.empty_constant()?;
        self.writer.mov(dest, empty);
        Ok(())
    }

    fn new_value_profile(&mut self) -> u32 {
        let index = self.code_block.num_value_profiles;
        self.code_block.num_value_profiles += 1;
        index
    }

    fn new_object_allocation_profile(&mut self) -> u32 {
        let index = self.code_block.num_object_allocation_profiles;
        self.code_block.num_object_allocation_profiles += 1;
        index
    }

    fn new_array_allocation_profile(&mut self) -> u32 {
        let index = self.code_block.num_array_allocation_profiles;
        self.code_block.num_array_allocation_profiles += 1;
        index
    }

    fn emit_debug_hook(&mut self, hook: DebugHook) {
        if !self.should_emit_debug_hooks {
            return;
        }
        self.writer.debug(hook as u32);
    }

    fn emit_throw_static_error(
        &mut self,
        message: &str,
        is_reference_error: bool,
    ) -> EmitResult<()> {
        let message = self.cx.intern(message);
        let message_index = self.constant_table.add_string(&message)?;
        self.writer
            .throw_static_error(message_index, is_reference_error as u32);
        Ok(())
    }

    fn emit_throw_type_error(&mut self, message: &str) -> EmitResult<()> {
        self.emit_throw_static_error(message, false)
    }

    /// Flag resource exhaustion from AST nesting. Emission continues so the
    /// caller sees a well-formed (but garbage) unit, and the error is
    /// reported once generation finishes.
    fn emit_throw_expression_too_deep_exception(&mut self) -> EmitResult<VirtualRegister> {
        self.expression_too_deep = true;
        self.new_temporary()
    }

    /*
     * Jumps and peephole fusion
     */

    fn emit_jump(&mut self, target: LabelId) {
        let begin = self.writer.current_index();
        let offset = self.bind_label(target, begin, begin + 1);
        self.writer.jmp(offset);
    }

    /// Emit a branch taken when `cond` is true. If the previous instruction
    /// is a comparison into a dead temporary equal to `cond`, the comparison
    /// is retracted and a single fused compare-and-branch is emitted instead.
    fn emit_jump_if_true(&mut self, cond: VirtualRegister, target: LabelId) {
        let fused_binary = match self.writer.last_opcode() {
            OpCode::Less => Some(OpCode::JLess),
            OpCode::LessEq => Some(OpCode::JLessEq),
            OpCode::Greater => Some(OpCode::JGreater),
            OpCode::GreaterEq => Some(OpCode::JGreaterEq),
            _ => None,
        };

        if let Some(fused) = fused_binary {
            let (dst, src1, src2) = self.writer.retrieve_last_binary_op();
            if cond.encode() == dst
                && self.registers.is_temporary(cond)
                && self.registers.ref_count(cond) == 0
            {
                self.writer.rewind_binary_op();
                self.write_fused_binary_jump(fused, src1, src2, target);
                return;
            }
        }

        let fused_unary = match self.writer.last_opcode() {
            // Null compare fusions only apply to forward branches.
            OpCode::EqNull if self.label_is_forward(target) => Some(OpCode::JEqNull),
            OpCode::NeqNull if self.label_is_forward(target) => Some(OpCode::JNeqNull),
            _ => None,
        };

        if let Some(fused) = fused_unary {
            let (dst, src) = self.writer.retrieve_last_unary_op();
            if cond.encode() == dst
                && self.registers.is_temporary(cond)
                && self.registers.ref_count(cond) == 0
            {
                self.writer.rewind_unary_op();
                self.write_fused_unary_jump(fused, src, target);
                return;
            }
        }

        let begin = self.writer.current_index();
        let offset = self.bind_label(target, begin, begin + 2);
        self.writer.jtrue(cond, offset);
    }

    /// Emit a branch taken when `cond` is false. The fused relational forms
    /// require a forward target here, unlike `emit_jump_if_true`; the
    /// asymmetry is deliberate and preserved.
    fn emit_jump_if_false(&mut self, cond: VirtualRegister, target: LabelId) {
        let fused_binary = match self.writer.last_opcode() {
            OpCode::Less if self.label_is_forward(target) => Some(OpCode::JNLess),
            OpCode::LessEq if self.label_is_forward(target) => Some(OpCode::JNLessEq),
            OpCode::Greater if self.label_is_forward(target) => Some(OpCode::JNGreater),
            OpCode::GreaterEq if self.label_is_forward(target) => Some(OpCode::JNGreaterEq),
            _ => None,
        };

        if let Some(fused) = fused_binary {
            let (dst, src1, src2) = self.writer.retrieve_last_binary_op();
            if cond.encode() == dst
                && self.registers.is_temporary(cond)
                && self.registers.ref_count(cond) == 0
            {
                self.writer.rewind_binary_op();
                self.write_fused_binary_jump(fused, src1, src2, target);
                return;
            }
        }

        if self.writer.last_opcode() == OpCode::Not {
            let (dst, src) = self.writer.retrieve_last_unary_op();
            if cond.encode() == dst
                && self.registers.is_temporary(cond)
                && self.registers.ref_count(cond) == 0
            {
                self.writer.rewind_unary_op();
                let src = VirtualRegister::decode(src);
                let begin = self.writer.current_index();
                let offset = self.bind_label(target, begin, begin + 2);
                self.writer.jtrue(src, offset);
                return;
            }
        }

        let fused_unary = match self.writer.last_opcode() {
            OpCode::EqNull if self.label_is_forward(target) => Some(OpCode::JNeqNull),
            OpCode::NeqNull if self.label_is_forward(target) => Some(OpCode::JEqNull),
            _ => None,
        };

        if let Some(fused) = fused_unary {
            let (dst, src) = self.writer.retrieve_last_unary_op();
            if cond.encode() == dst
                && self.registers.is_temporary(cond)
                && self.registers.ref_count(cond) == 0
            {
                self.writer.rewind_unary_op();
                self.write_fused_unary_jump(fused, src, target);
                return;
            }
        }

        let begin = self.writer.current_index();
        let offset = self.bind_label(target, begin, begin + 2);
        self.writer.jfalse(cond, offset);
    }

    fn write_fused_binary_jump(&mut self, opcode: OpCode, src1: i32, src2: i32, target: LabelId) {
        let src1 = VirtualRegister::decode(src1);
        let src2 = VirtualRegister::decode(src2);
        let begin = self.writer.current_index();
        let offset = self.bind_label(target, begin, begin + 3);

        match opcode {
            OpCode::JLess => self.writer.jless(src1, src2, offset),
            OpCode::JLessEq => self.writer.jless_eq(src1, src2, offset),
            OpCode::JGreater => self.writer.jgreater(src1, src2, offset),
            OpCode::JGreaterEq => self.writer.jgreater_eq(src1, src2, offset),
            OpCode::JNLess => self.writer.jnless(src1, src2, offset),
            OpCode::JNLessEq => self.writer.jnless_eq(src1, src2, offset),
            OpCode::JNGreater => self.writer.jngreater(src1, src2, offset),
            OpCode::JNGreaterEq => self.writer.jngreater_eq(src1, src2, offset),
            _ => unreachable!("not a fused binary jump"),
        }
    }

    fn write_fused_unary_jump(&mut self, opcode: OpCode, src: i32, target: LabelId) {
        let src = VirtualRegister::decode(src);
        let begin = self.writer.current_index();
        let offset = self.bind_label(target, begin, begin + 2);

        match opcode {
            OpCode::JEqNull => self.writer.jeq_null(src, offset),
            OpCode::JNeqNull => self.writer.jneq_null(src, offset),
            _ => unreachable!("not a fused unary jump"),
        }
    }

    /// Emit an equality comparison, rewriting `typeof x == "..."` patterns
    /// into the dedicated type predicate opcodes.
    fn emit_equality_op(
        &mut self,
        opcode: OpCode,
        dest: VirtualRegister,
        src1: VirtualRegister,
        src2: VirtualRegister,
    ) {
        if self.writer.last_opcode() == OpCode::TypeOf
            && (opcode == OpCode::Eq || opcode == OpCode::StrictEq)
        {
            let (dst, src) = self.writer.retrieve_last_unary_op();

            let type_string = if src2.is_constant() {
                self.constant_table
                    .get(src2.constant_index() as u32)
                    .as_string()
                    .map(|string| string.as_str().to_string())
            } else {
                None
            };

            if src1.encode() == dst && self.registers.is_temporary(src1) {
                if let Some(value) = type_string {
                    let src = VirtualRegister::decode(src);
                    let predicate = match value.as_str() {
                        "undefined" => Some(OpCode::IsUndefined),
                        "boolean" => Some(OpCode::IsBoolean),
                        "number" => Some(OpCode::IsNumber),
                        "string" => Some(OpCode::IsString),
                        "object" => Some(OpCode::IsObjectOrNull),
                        "function" => Some(OpCode::IsFunction),
                        _ => None,
                    };

                    if let Some(predicate) = predicate {
                        self.writer.rewind_unary_op();
                        match predicate {
                            OpCode::IsUndefined => self.writer.is_undefined(dest, src),
                            OpCode::IsBoolean => self.writer.is_boolean(dest, src),
                            OpCode::IsNumber => self.writer.is_number(dest, src),
                            OpCode::IsString => self.writer.is_string(dest, src),
                            OpCode::IsObjectOrNull => self.writer.is_object_or_null(dest, src),
                            OpCode::IsFunction => self.writer.is_function(dest, src),
                            _ => unreachable!(),
                        }
                        return;
                    }
                }
            }
        }

        match opcode {
            OpCode::Eq => self.writer.eq(dest, src1, src2),
            OpCode::Neq => self.writer.neq(dest, src1, src2),
            OpCode::StrictEq => self.writer.strict_eq(dest, src1, src2),
            OpCode::NStrictEq => self.writer.nstrict_eq(dest, src1, src2),
            _ => unreachable!("not an equality opcode"),
        }
    }

    /*
     * Scope machinery
     */

    fn allocate_and_emit_scope(&mut self) -> EmitResult<()> {
        self.scope_register = self.add_var()?;
        self.code_block.scope_register = Some(self.scope_register);
        self.writer.get_scope(self.scope_register);

        self.top_most_scope = self.add_var()?;
        self.emit_move(self.top_most_scope, self.scope_register);
        Ok(())
    }

    fn push_scoped_control_flow_context(&mut self) {
        self.scope_context_stack.push(ControlFlowContext::Scope);
        self.local_scope_depth += 1;
    }

    fn pop_scoped_control_flow_context(&mut self) {
        debug_assert!(!self
            .scope_context_stack
            .last()
            .unwrap()
            .is_finally_block());
        self.scope_context_stack.pop();
        self.local_scope_depth -= 1;
    }

    /// Whether a binding is treated as captured, folding in the debug-hooks
    /// override that forces every variable into a heap scope.
    fn effectively_captured(&self, entry_captured: bool) -> bool {
        entry_captured || self.should_emit_debug_hooks
    }

    fn push_lexical_scope(
        &mut self,
        environment: &VariableEnvironment,
        can_optimize_tdz_checks: bool,
    ) -> EmitResult<Option<u32>> {
        self.push_lexical_scope_internal(
            environment,
            can_optimize_tdz_checks,
            TdzRequirement::UnderTdz,
            ScopeType::LexicalScope,
            ScopeRegisterType::Block,
        )
    }

    /// Materialize a static environment: uncaptured bindings get stack
    /// registers, captured bindings share one heap scope allocated with a
    /// single create_lexical_environment. Returns the constant pool index of
    /// the scope's symbol table if one was materialized.
    fn push_lexical_scope_internal(
        &mut self,
        environment: &VariableEnvironment,
        can_optimize_tdz_checks: bool,
        tdz_requirement: TdzRequirement,
        scope_type: ScopeType,
        scope_register_type: ScopeRegisterType,
    ) -> EmitResult<Option<u32>> {
        if environment.is_empty() {
            return Ok(None);
        }

        let symbol_table = SymbolTable::new(scope_type);
        let mut has_captured_variables = false;

        for (name, entry) in environment.iter() {
            debug_assert!(entry.is_let() || entry.is_const());

            let offset = if self.effectively_captured(entry.is_captured()) {
                has_captured_variables = true;
                VarOffset::Scope(symbol_table.borrow_mut().take_next_scope_offset())
            } else {
                let local = self.new_block_scope_variable()?;
                self.registers.retain(local);
                VarOffset::Stack(local)
            };

            let writable = if entry.is_const() { Writable::No } else { Writable::Yes };
            symbol_table
                .borrow_mut()
                .set(name.clone(), SymbolTableEntry::new_read_only(offset, writable));
        }

        let mut new_scope = None;
        let mut symbol_table_constant_index = None;

        if has_captured_variables {
            let scope_register = match scope_register_type {
                ScopeRegisterType::Block => {
                    let register = self.new_block_scope_variable()?;
                    self.registers.retain(register);
                    register
                }
                ScopeRegisterType::Var => self.add_var()?,
            };

            let constant_index = self.constant_table.add_symbol_table(symbol_table.clone())?;
            symbol_table_constant_index = Some(constant_index);

            let initial_value = if tdz_requirement == TdzRequirement::UnderTdz {
                self.empty_constant()?
            } else {
                self.undefined_constant()?
            };

            self.writer.create_lexical_environment(
                scope_register,
                self.scope_register,
                constant_index,
                initial_value,
            );
            self.emit_move(self.scope_register, scope_register);

            self.push_scoped_control_flow_context();
            new_scope = Some(scope_register);
        }

        self.code_block.symbol_tables.push(symbol_table.clone());
        self.symbol_table_stack.push(SymbolTableStackEntry {
            symbol_table: Some(symbol_table.clone()),
            scope_register: new_scope,
            is_with_scope: false,
            symbol_table_constant_index,
        });

        if tdz_requirement == TdzRequirement::UnderTdz {
            self.tdz_stack.push(TdzStackEntry {
                variables: environment.names().cloned().collect(),
                can_optimize: can_optimize_tdz_checks,
            });

            // Prefill stack variables with the TDZ sentinel. Scope variables
            // get it for free when the environment object is allocated.
            let stack_registers: Vec<VirtualRegister> = symbol_table
                .borrow()
                .iter()
                .filter_map(|(_, entry)| match entry.offset {
                    VarOffset::Stack(register) => Some(register),
                    _ => None,
                })
                .collect();
            for register in stack_registers {
                self.emit_move_empty_value(register)?;
            }
        }

        Ok(symbol_table_constant_index)
    }

    fn pop_lexical_scope(&mut self, environment: &VariableEnvironment) -> EmitResult<()> {
        self.pop_lexical_scope_internal(environment, TdzRequirement::UnderTdz)
    }

    fn pop_lexical_scope_internal(
        &mut self,
        environment: &VariableEnvironment,
        tdz_requirement: TdzRequirement,
    ) -> EmitResult<()> {
        if environment.is_empty() {
            return Ok(());
        }

        let stack_entry = self.symbol_table_stack.pop().unwrap();
        let symbol_table = stack_entry.symbol_table.as_ref().unwrap();
        let mut has_captured_variables = false;

        let mut stack_registers = vec![];
        for (name, entry) in environment.iter() {
            if self.effectively_captured(entry.is_captured()) {
                has_captured_variables = true;
                continue;
            }

            match symbol_table.borrow().get(name).unwrap().offset {
                VarOffset::Stack(register) => stack_registers.push(register),
                _ => unreachable!("uncaptured binding must be stack resident"),
            }
        }

        for register in stack_registers {
            self.registers.release(register);
        }

        if has_captured_variables {
            let scope_register = stack_entry.scope_register.unwrap();
            self.emit_pop_scope(self.scope_register)?;
            self.pop_scoped_control_flow_context();
            self.registers.release(scope_register);
        }

        if tdz_requirement == TdzRequirement::UnderTdz {
            self.tdz_stack.pop();
        }

        Ok(())
    }

    /// Set up the next iteration of a for loop whose header bindings are
    /// captured: each iteration gets a fresh heap environment initialized
    /// from the previous one, in the same register.
    fn prepare_lexical_scope_for_next_for_loop_iteration(
        &mut self,
        environment: &VariableEnvironment,
        loop_symbol_table_constant_index: Option<u32>,
    ) -> EmitResult<()> {
        if environment.is_empty() {
            return Ok(());
        }

        let captured = environment.has_captured_variables() || self.should_emit_debug_hooks;
        if !captured {
            return Ok(());
        }

        let constant_index = loop_symbol_table_constant_index.unwrap();
        let stack_entry = self.symbol_table_stack.last().unwrap().clone();
        let symbol_table = stack_entry.symbol_table.clone().unwrap();
        let loop_scope = stack_entry.scope_register.unwrap();

        // Copy the captured values out of the current iteration's scope.
        let mut values_to_copy = vec![];
        let scope_entries: Vec<(Identifier, SymbolTableEntry)> = symbol_table
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.offset.is_scope())
            .map(|(name, entry)| (name.clone(), *entry))
            .collect();

        for (name, entry) in &scope_entries {
            let transition_value = self.new_block_scope_variable()?;
            self.registers.retain(transition_value);

            let variable = self.variable_for_local_entry(
                name,
                *entry,
                stack_entry.symbol_table_constant_index,
                true,
            );
            self.emit_get_from_scope(
                transition_value,
                Some(loop_scope),
                &variable,
                ResolveMode::DoNotThrowIfNotFound,
            )?;
            values_to_copy.push((transition_value, variable));
        }

        // The new environment must land in the same register as the old one:
        // the loop body was compiled assuming a fixed scope register.
        let parent_scope = self.new_temporary()?;
        self.writer.get_parent_scope(parent_scope, loop_scope);
        self.emit_move(self.scope_register, parent_scope);

        let initial_value = self.empty_constant()?;
        self.writer.create_lexical_environment(
            loop_scope,
            self.scope_register,
            constant_index,
            initial_value,
        );
        self.emit_move(self.scope_register, loop_scope);

        for (transition_value, variable) in values_to_copy {
            self.emit_put_to_scope(
                Some(loop_scope),
                &variable,
                transition_value,
                ResolveMode::DoNotThrowIfNotFound,
            )?;
            self.registers.release(transition_value);
        }

        Ok(())
    }

    /// Bind a function expression's own name. In strict mode the binding
    /// behaves like a const; otherwise writes to it are silently ignored.
    fn emit_push_function_name_scope(&mut self, name: &Identifier) -> EmitResult<()> {
        let mut environment = VariableEnvironment::new();
        let entry = environment.add(name.clone());
        entry.set_is_captured();
        entry.set_is_const();

        self.push_lexical_scope_internal(
            &environment,
            true,
            TdzRequirement::NotUnderTdz,
            ScopeType::FunctionNameScope,
            ScopeRegisterType::Var,
        )?;

        let stack_entry = self.symbol_table_stack.last().unwrap().clone();
        let symbol_table = stack_entry.symbol_table.clone().unwrap();

        // Model the silent write semantics explicitly on the binding instead
        // of leaving the scope unmarked as lexical.
        let writable = if self.is_strict { Writable::No } else { Writable::SilentlyIgnored };
        let mut entry = symbol_table.borrow().get(name).unwrap();
        entry.writable = writable;
        symbol_table.borrow_mut().set(name.clone(), entry);

        let variable = self.variable_for_local_entry(
            name,
            entry,
            stack_entry.symbol_table_constant_index,
            self.is_strict,
        );
        self.emit_put_to_scope(
            stack_entry.scope_register,
            &variable,
            self.callee_register,
            ResolveMode::ThrowIfNotFound,
        )
    }

    /// Bind a catch parameter for the duration of a catch block. Catch
    /// scopes are never under TDZ.
    fn emit_push_catch_scope(
        &mut self,
        name: &Identifier,
        thrown_value: VirtualRegister,
        environment: &VariableEnvironment,
    ) -> EmitResult<()> {
        debug_assert!(environment.contains(name));

        self.push_lexical_scope_internal(
            environment,
            true,
            TdzRequirement::NotUnderTdz,
            ScopeType::CatchScope,
            ScopeRegisterType::Block,
        )?;

        let variable = self.variable(name);
        debug_assert!(variable.is_resolved());

        let scope = self.emit_resolve_scope(None, &variable)?;
        self.emit_put_to_scope(scope, &variable, thrown_value, ResolveMode::ThrowIfNotFound)
    }

    fn emit_pop_catch_scope(&mut self, environment: &VariableEnvironment) -> EmitResult<()> {
        self.pop_lexical_scope_internal(environment, TdzRequirement::NotUnderTdz)
    }

    fn emit_push_with_scope(&mut self, object: VirtualRegister) -> EmitResult<VirtualRegister> {
        self.push_scoped_control_flow_context();

        let new_scope = self.new_block_scope_variable()?;
        self.registers.retain(new_scope);

        self.writer
            .push_with_scope(new_scope, object, self.scope_register);
        self.emit_move(self.scope_register, new_scope);

        self.symbol_table_stack.push(SymbolTableStackEntry {
            symbol_table: None,
            scope_register: Some(new_scope),
            is_with_scope: true,
            symbol_table_constant_index: None,
        });

        Ok(new_scope)
    }

    fn emit_pop_with_scope(&mut self) -> EmitResult<()> {
        self.emit_pop_scope(self.scope_register)?;
        self.pop_scoped_control_flow_context();

        let stack_entry = self.symbol_table_stack.pop().unwrap();
        debug_assert!(stack_entry.is_with_scope);
        self.registers.release(stack_entry.scope_register.unwrap());
        Ok(())
    }

    fn emit_get_parent_scope(
        &mut self,
        dest: VirtualRegister,
        scope: VirtualRegister,
    ) -> VirtualRegister {
        self.writer.get_parent_scope(dest, scope);
        dest
    }

    /// Replace `dest` with the parent of `scope`.
    fn emit_pop_scope(&mut self, dest: VirtualRegister) -> EmitResult<()> {
        let parent_scope = self.new_temporary()?;
        self.emit_get_parent_scope(parent_scope, self.scope_register);
        self.emit_move(dest, parent_scope);
        Ok(())
    }

    /*
     * Variable resolution
     */

    /// Resolve an identifier against the active symbol table stack, from the
    /// innermost scope outward. Resolution gives up and falls back to a
    /// dynamic scope chain lookup as soon as a `with` scope is crossed, or
    /// when the match is a function name scope and a non-strict eval may have
    /// introduced a shadowing var.
    fn variable(&mut self, name: &Identifier) -> Variable {
        if name == &self.cx.names.this {
            return Variable::resolved(
                name.clone(),
                VarOffset::Stack(self.this_register),
                Writable::No,
                None,
                false,
            );
        }

        for stack_entry in self.symbol_table_stack.iter().rev() {
            if stack_entry.is_with_scope {
                return Variable::unresolved(name.clone());
            }

            let symbol_table = stack_entry.symbol_table.as_ref().unwrap();
            let (entry, scope_type) = {
                let table = symbol_table.borrow();
                (table.get(name), table.scope_type())
            };

            let entry = match entry {
                Some(entry) => entry,
                None => continue,
            };

            if scope_type == ScopeType::FunctionNameScope && self.uses_non_strict_eval {
                // An eval may have introduced a var with the same name as the
                // function name binding, so only a runtime lookup can decide.
                return Variable::unresolved(name.clone());
            }

            return self.variable_for_local_entry(
                name,
                entry,
                stack_entry.symbol_table_constant_index,
                scope_type == ScopeType::LexicalScope,
            );
        }

        Variable::unresolved(name.clone())
    }

    fn variable_for_local_entry(
        &self,
        name: &Identifier,
        entry: SymbolTableEntry,
        symbol_table_constant_index: Option<u32>,
        is_lexically_scoped: bool,
    ) -> Variable {
        Variable::resolved(
            name.clone(),
            entry.offset,
            entry.writable,
            symbol_table_constant_index,
            is_lexically_scoped,
        )
    }

    /// Declare a variable in a symbol table, allocating its storage. A
    /// redeclaration must agree on the storage kind; disagreement is a
    /// generator bug, not a user error.
    fn create_variable(
        &mut self,
        name: &Identifier,
        captured: bool,
        symbol_table: &Rc<RefCell<SymbolTable>>,
        ignore_existing: bool,
    ) -> EmitResult<()> {
        if let Some(entry) = symbol_table.borrow().get(name) {
            if ignore_existing {
                return Ok(());
            }

            let kind_matches = if captured {
                entry.offset.is_scope()
            } else {
                entry.offset.is_stack()
            };
            assert!(kind_matches, "redeclaration changed capture kind of {}", name);

            return Ok(());
        }

        let offset = if captured {
            VarOffset::Scope(symbol_table.borrow_mut().take_next_scope_offset())
        } else {
            VarOffset::Stack(self.add_var()?)
        };

        symbol_table
            .borrow_mut()
            .set(name.clone(), SymbolTableEntry::new(offset));
        Ok(())
    }

    /// Least upper bound of how far a dynamic lookup must search, given the
    /// scopes currently active.
    fn resolve_type(&self) -> ResolveType {
        for stack_entry in self.symbol_table_stack.iter().rev() {
            if stack_entry.is_with_scope {
                return ResolveType::Dynamic;
            }

            if self.uses_non_strict_eval {
                if let Some(symbol_table) = &stack_entry.symbol_table {
                    if symbol_table.borrow().scope_type() == ScopeType::FunctionNameScope {
                        return ResolveType::Dynamic;
                    }
                }
            }
        }

        if self.uses_non_strict_eval {
            ResolveType::GlobalPropertyWithVarInjectionChecks
        } else {
            ResolveType::GlobalProperty
        }
    }

    /// Produce the scope register a variable's storage lives in. Stack
    /// variables need none; unresolved variables compile a runtime
    /// resolve_scope into `dest` (or a fresh temporary).
    fn emit_resolve_scope(
        &mut self,
        dest: Option<VirtualRegister>,
        variable: &Variable,
    ) -> EmitResult<Option<VirtualRegister>> {
        match variable.offset() {
            Some(VarOffset::Stack(_)) => Ok(None),
            Some(VarOffset::DirectArgument(_)) => Ok(self.arguments_register),
            Some(VarOffset::Scope(_)) => {
                // This must find the scope that allocated the binding, never
                // crossing a with scope on the way.
                for stack_entry in self.symbol_table_stack.iter().rev() {
                    assert!(!stack_entry.is_with_scope);

                    let symbol_table = stack_entry.symbol_table.as_ref().unwrap();
                    if !symbol_table.borrow().contains(variable.ident()) {
                        continue;
                    }

                    let scope = stack_entry.scope_register;
                    assert!(scope.is_some(), "scope binding without materialized scope");
                    return Ok(scope);
                }

                unreachable!("resolved scope variable not on symbol table stack");
            }
            None => {
                let dest = match dest {
                    Some(dest) => dest,
                    None => self.new_temporary()?,
                };
                let identifier = self.add_identifier(variable.ident());
                let resolve_type = self.resolve_type();
                let depth = self.local_scope_depth();
                self.writer.resolve_scope(
                    dest,
                    self.scope_register,
                    identifier,
                    resolve_type as u32,
                    depth,
                );
                Ok(Some(dest))
            }
        }
    }

    fn emit_get_from_scope(
        &mut self,
        dest: VirtualRegister,
        scope: Option<VirtualRegister>,
        variable: &Variable,
        resolve_mode: ResolveMode,
    ) -> EmitResult<()> {
        match variable.offset() {
            Some(VarOffset::Stack(local)) => {
                self.emit_move(dest, local);
                Ok(())
            }
            Some(VarOffset::DirectArgument(index)) => {
                let profile = self.new_value_profile();
                self.writer
                    .get_from_arguments(dest, scope.unwrap(), index, profile);
                Ok(())
            }
            Some(VarOffset::Scope(offset)) => {
                let identifier = self.add_identifier(variable.ident());
                let mode_and_type =
                    ResolveModeAndType::new(resolve_mode, ResolveType::LocalClosureVar);
                let depth = self.local_scope_depth();
                let profile = self.new_value_profile();
                self.writer.get_from_scope(
                    dest,
                    scope.unwrap(),
                    identifier,
                    mode_and_type.operand(),
                    depth,
                    offset,
                    profile,
                );
                Ok(())
            }
            None => {
                let identifier = self.add_identifier(variable.ident());
                let mode_and_type = ResolveModeAndType::new(resolve_mode, self.resolve_type());
                let depth = self.local_scope_depth();
                let profile = self.new_value_profile();
                self.writer.get_from_scope(
                    dest,
                    scope.unwrap(),
                    identifier,
                    mode_and_type.operand(),
                    depth,
                    0,
                    profile,
                );
                Ok(())
            }
        }
    }

    fn emit_put_to_scope(
        &mut self,
        scope: Option<VirtualRegister>,
        variable: &Variable,
        value: VirtualRegister,
        resolve_mode: ResolveMode,
    ) -> EmitResult<()> {
        match variable.offset() {
            Some(VarOffset::Stack(local)) => {
                self.emit_move(local, value);
                Ok(())
            }
            Some(VarOffset::DirectArgument(index)) => {
                self.writer.put_to_arguments(scope.unwrap(), index, value);
                Ok(())
            }
            Some(VarOffset::Scope(offset)) => {
                let identifier = self.add_identifier(variable.ident());
                let mode_and_type =
                    ResolveModeAndType::new(resolve_mode, ResolveType::LocalClosureVar);
                let symbol_table = variable.symbol_table_constant_index().unwrap_or(0);
                self.writer.put_to_scope(
                    scope.unwrap(),
                    identifier,
                    value,
                    mode_and_type.operand(),
                    symbol_table,
                    offset,
                );
                Ok(())
            }
            None => {
                let identifier = self.add_identifier(variable.ident());
                let mode_and_type = ResolveModeAndType::new(resolve_mode, self.resolve_type());
                let depth = self.local_scope_depth();
                self.writer.put_to_scope(
                    scope.unwrap(),
                    identifier,
                    value,
                    mode_and_type.operand(),
                    depth,
                    0,
                );
                Ok(())
            }
        }
    }

    /// Store a binding's initializing value, bypassing read-only and TDZ
    /// checks.
    fn initialize_variable(
        &mut self,
        variable: &Variable,
        value: VirtualRegister,
    ) -> EmitResult<()> {
        let scope = self.emit_resolve_scope(None, variable)?;
        self.emit_put_to_scope(scope, variable, value, ResolveMode::ThrowIfNotFound)
    }

    /// Compile the statically-known failure for writes to a read-only
    /// binding. Returns whether a throw was emitted; silently-ignored
    /// bindings produce neither a throw nor a store.
    fn emit_read_only_exception_if_needed(&mut self, variable: &Variable) -> EmitResult<bool> {
        if self.is_strict || variable.writable() == Writable::No {
            self.emit_throw_type_error(READONLY_WRITE_ERROR)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /*
     * TDZ tracking
     */

    fn emit_tdz_check(&mut self, target: VirtualRegister) {
        self.writer.check_tdz(target);
    }

    fn needs_tdz_check(&self, variable: &Variable) -> bool {
        self.tdz_stack
            .iter()
            .rev()
            .any(|entry| entry.variables.contains(variable.ident()))
    }

    fn emit_tdz_check_if_necessary(
        &mut self,
        variable: &Variable,
        target: Option<VirtualRegister>,
        scope: Option<VirtualRegister>,
    ) -> EmitResult<()> {
        if !self.needs_tdz_check(variable) {
            return Ok(());
        }

        match target {
            Some(target) => self.emit_tdz_check(target),
            None => {
                assert!(variable.local().is_none() && scope.is_some());
                let result = self.new_temporary()?;
                self.emit_get_from_scope(
                    result,
                    scope,
                    variable,
                    ResolveMode::DoNotThrowIfNotFound,
                )?;
                self.emit_tdz_check(result);
            }
        }

        Ok(())
    }

    /// After a statically proven initialization, stop TDZ-checking the
    /// binding. Only applies when the owning scope allowed the optimization
    /// at push time.
    fn lift_tdz_check_if_possible(&mut self, variable: &Variable) {
        for entry in self.tdz_stack.iter_mut().rev() {
            if entry.variables.contains(variable.ident()) {
                if entry.can_optimize {
                    let was_removed = entry.variables.shift_remove(variable.ident());
                    assert!(was_removed);
                }
                break;
            }
        }
    }

    /// All names currently under TDZ, threaded into nested function units.
    fn get_variables_under_tdz(&self) -> IndexSet<Identifier> {
        let mut result = IndexSet::new();
        for entry in &self.tdz_stack {
            for name in &entry.variables {
                result.insert(name.clone());
            }
        }
        result
    }

    /*
     * Control flow contexts, try/finally, non-local exits
     */

    fn push_finally_context(&mut self, finally_block: &'a ast::Block) {
        self.push_finally_like_context(Some(finally_block), None);
    }

    fn push_iterator_close_context(&mut self, iterator: VirtualRegister) {
        self.push_finally_like_context(None, Some(iterator));
    }

    fn push_finally_like_context(
        &mut self,
        finally_block: Option<&'a ast::Block>,
        iterator: Option<VirtualRegister>,
    ) {
        let context = FinallyContext {
            finally_block,
            iterator,
            scope_context_stack_size: self.scope_context_stack.len(),
            switch_context_stack_size: self.switch_context_stack.len(),
            for_in_context_stack_size: self.for_in_context_stack.len(),
            try_context_stack_size: self.try_context_stack.len(),
            label_scopes_size: self.label_scopes.len(),
            symbol_table_stack_size: self.symbol_table_stack.len(),
            finally_depth: self.finally_depth,
            local_scope_depth: self.local_scope_depth,
        };

        self.scope_context_stack
            .push(ControlFlowContext::Finally(context));
        self.finally_depth += 1;
    }

    fn pop_finally_context(&mut self) {
        let context = self.scope_context_stack.pop().unwrap();
        match context {
            ControlFlowContext::Finally(context) => {
                debug_assert!(context.finally_block.is_some() && context.iterator.is_none())
            }
            _ => unreachable!("expected finally context"),
        }
        debug_assert!(self.finally_depth > 0);
        self.finally_depth -= 1;
    }

    fn pop_iterator_close_context(&mut self) {
        let context = self.scope_context_stack.pop().unwrap();
        match context {
            ControlFlowContext::Finally(context) => {
                debug_assert!(context.finally_block.is_none() && context.iterator.is_some())
            }
            _ => unreachable!("expected iterator close context"),
        }
        debug_assert!(self.finally_depth > 0);
        self.finally_depth -= 1;
    }

    /// Open a try covered from `start`. The handler target label is created
    /// now so that nested emission can register ranges against it.
    fn push_try(&mut self, start: LabelId) -> usize {
        let target = self.new_label();
        self.try_datas
            .push(TryData { target, handler_kind: None });
        let try_data = self.try_datas.len() - 1;

        self.try_context_stack.push(TryContext { start, try_data });
        try_data
    }

    /// Close the innermost try and emit its handler landing pad: the handler
    /// label, the catch instruction, and the scope register restoration.
    fn pop_try_and_emit_catch(
        &mut self,
        try_data: usize,
        exception: VirtualRegister,
        thrown_value: VirtualRegister,
        end: LabelId,
        handler_kind: HandlerKind,
    ) -> EmitResult<()> {
        let context = *self.try_context_stack.last().unwrap();
        debug_assert!(context.try_data == try_data);

        self.try_ranges.push(TryRange {
            start: context.start,
            end,
            try_data: context.try_data,
        });
        self.try_context_stack.pop();

        let target = self.try_datas[try_data].target;
        self.emit_label(target);
        self.try_datas[try_data].handler_kind = Some(handler_kind);

        self.writer.catch(exception, thrown_value);

        // The interpreter does not restore the scope register while
        // unwinding, so reload it from the innermost materialized scope.
        let mut found_local_scope = None;
        for stack_entry in self.symbol_table_stack.iter().rev() {
            if let Some(scope) = stack_entry.scope_register {
                found_local_scope = Some(scope);
                break;
            }
        }

        match found_local_scope {
            Some(scope) => self.emit_move(self.scope_register, scope),
            None => self.emit_move(self.scope_register, self.top_most_scope),
        }

        Ok(())
    }

    /// Pop dynamic scopes down to `target_depth`, replaying any intervening
    /// finally and iterator close blocks.
    fn emit_pop_scopes(&mut self, target_depth: u32) -> EmitResult<()> {
        debug_assert!(self.label_scope_depth() >= target_depth);

        let scope_delta = (self.label_scope_depth() - target_depth) as usize;
        debug_assert!(scope_delta <= self.scope_context_stack.len());
        if scope_delta == 0 {
            return Ok(());
        }

        if self.finally_depth == 0 {
            let parent_scope = self.new_temporary()?;
            for _ in 0..scope_delta {
                self.emit_get_parent_scope(parent_scope, self.scope_register);
                self.emit_move(self.scope_register, parent_scope);
            }
            return Ok(());
        }

        let bottom = self.scope_context_stack.len() - scope_delta;
        self.emit_complex_pop_scopes(bottom)
    }

    /// Walk the control-flow context stack from the top down to `bottom`,
    /// popping runs of plain scopes with scope chain steps and replaying each
    /// finally/iterator-close encountered. Around each replay every auxiliary
    /// stack is truncated to its size at context push time and restored
    /// afterwards, with temporarily-removed try contexts re-registered with
    /// start labels just after the replayed cleanup.
    fn emit_complex_pop_scopes(&mut self, bottom: usize) -> EmitResult<()> {
        let mut top = self.scope_context_stack.len();

        while top > bottom {
            // First count the run of plain dynamic scopes before the next
            // finally block.
            let mut num_normal_scopes = 0;
            while top > bottom {
                if self.scope_context_stack[top - 1].is_finally_block() {
                    break;
                }
                num_normal_scopes += 1;
                top -= 1;
            }

            if num_normal_scopes != 0 {
                let parent_scope = self.new_temporary()?;
                for _ in 0..num_normal_scopes {
                    self.emit_get_parent_scope(parent_scope, self.scope_register);
                    self.emit_move(self.scope_register, parent_scope);
                }

                // No finally block left to emit.
                if top == bottom {
                    return Ok(());
                }
            }

            while top > bottom && self.scope_context_stack[top - 1].is_finally_block() {
                let before_finally = self.new_label();
                self.emit_label(before_finally);

                let finally_context = match &self.scope_context_stack[top - 1] {
                    ControlFlowContext::Finally(context) => context.clone(),
                    _ => unreachable!(),
                };

                // Save the current state of the world while instating the
                // state the finally block was compiled under.
                let flip_scopes =
                    finally_context.scope_context_stack_size != self.scope_context_stack.len();
                let flip_switches =
                    finally_context.switch_context_stack_size != self.switch_context_stack.len();
                let flip_for_ins =
                    finally_context.for_in_context_stack_size != self.for_in_context_stack.len();
                let flip_tries =
                    finally_context.try_context_stack_size != self.try_context_stack.len();
                let flip_label_scopes =
                    finally_context.label_scopes_size != self.label_scopes.len();
                let flip_symbol_tables =
                    finally_context.symbol_table_stack_size != self.symbol_table_stack.len();

                let mut saved_scope_context_stack = vec![];
                let mut saved_switch_context_stack = vec![];
                let mut saved_for_in_context_stack = vec![];
                let mut saved_label_scopes = vec![];
                let mut saved_symbol_table_stack = vec![];
                let mut popped_try_contexts = vec![];

                if flip_scopes {
                    saved_scope_context_stack = self.scope_context_stack.clone();
                    self.scope_context_stack
                        .truncate(finally_context.scope_context_stack_size);
                }
                if flip_switches {
                    saved_switch_context_stack = self.switch_context_stack.clone();
                    self.switch_context_stack
                        .truncate(finally_context.switch_context_stack_size);
                }
                if flip_for_ins {
                    saved_for_in_context_stack = self.for_in_context_stack.clone();
                    self.for_in_context_stack
                        .truncate(finally_context.for_in_context_stack_size);
                }
                if flip_tries {
                    while self.try_context_stack.len() != finally_context.try_context_stack_size {
                        debug_assert!(
                            self.try_context_stack.len()
                                > finally_context.try_context_stack_size
                        );
                        let context = self.try_context_stack.pop().unwrap();
                        self.try_ranges.push(TryRange {
                            start: context.start,
                            end: before_finally,
                            try_data: context.try_data,
                        });
                        popped_try_contexts.push(context);
                    }
                }
                if flip_label_scopes {
                    saved_label_scopes = self.label_scopes.clone();
                    self.label_scopes.truncate(finally_context.label_scopes_size);
                }
                if flip_symbol_tables {
                    saved_symbol_table_stack = self.symbol_table_stack.clone();
                    self.symbol_table_stack
                        .truncate(finally_context.symbol_table_stack_size);
                }

                let saved_finally_depth = self.finally_depth;
                self.finally_depth = finally_context.finally_depth;
                let saved_local_scope_depth = self.local_scope_depth;
                self.local_scope_depth = finally_context.local_scope_depth;

                // Replay the cleanup code under the restored state.
                match finally_context.finally_block {
                    Some(block) => {
                        self.gen_block_statements(block)?;
                    }
                    None => {
                        let iterator = finally_context.iterator.unwrap();
                        self.emit_iterator_close(iterator)?;
                    }
                }

                let after_finally = self.new_label();
                self.emit_label(after_finally);

                // Restore the state of the world.
                if flip_scopes {
                    self.scope_context_stack = saved_scope_context_stack;
                }
                if flip_switches {
                    self.switch_context_stack = saved_switch_context_stack;
                }
                if flip_for_ins {
                    self.for_in_context_stack = saved_for_in_context_stack;
                }
                if flip_tries {
                    debug_assert!(
                        self.try_context_stack.len() == finally_context.try_context_stack_size
                    );
                    for context in popped_try_contexts.into_iter().rev() {
                        self.try_context_stack.push(TryContext {
                            start: after_finally,
                            try_data: context.try_data,
                        });
                    }
                }
                if flip_label_scopes {
                    self.label_scopes = saved_label_scopes;
                }
                if flip_symbol_tables {
                    self.symbol_table_stack = saved_symbol_table_stack;
                }
                self.finally_depth = saved_finally_depth;
                self.local_scope_depth = saved_local_scope_depth;

                top -= 1;
            }
        }

        Ok(())
    }

    /*
     * Switch jump tables
     */

    fn begin_switch(&mut self, scrutinee: VirtualRegister, kind: SwitchKind) {
        let instruction_index = self.writer.current_index();

        // Table index and default target are placeholders patched by
        // end_switch.
        match kind {
            SwitchKind::Immediate => self.writer.switch_imm(0, 0, scrutinee),
            SwitchKind::Character => self.writer.switch_char(0, 0, scrutinee),
            SwitchKind::String => self.writer.switch_string(0, 0, scrutinee),
        }

        self.switch_context_stack
            .push(SwitchInfo { instruction_index, kind });
    }

    fn end_switch(
        &mut self,
        case_labels: &[LabelId],
        case_keys: &[SwitchCaseKey],
        default_label: LabelId,
        min: i32,
        max: i32,
    ) {
        let info = self.switch_context_stack.pop().unwrap();
        let switch_index = info.instruction_index;

        let default_offset =
            self.label_location(default_label) as i32 - switch_index as i32;
        self.writer.set_word(switch_index + 2, default_offset);

        match info.kind {
            SwitchKind::Immediate | SwitchKind::Character => {
                let table_index = self.code_block.switch_jump_tables.len() as u32;
                self.writer.set_word(switch_index + 1, table_index as i32);

                let mut table = SimpleJumpTable::new(min, max);
                for (label, key) in case_labels.iter().zip(case_keys.iter()) {
                    // Clause labels were bound while emitting the bodies, so
                    // they cannot be forward references here.
                    debug_assert!(!self.label_is_forward(*label));
                    let offset = self.label_location(*label) as i32 - switch_index as i32;

                    let key = match key {
                        SwitchCaseKey::Immediate(value) => *value,
                        SwitchCaseKey::Character(value) => *value,
                        SwitchCaseKey::String(_) => unreachable!("string key in simple table"),
                    };
                    table.add(key, offset);
                }

                self.code_block.switch_jump_tables.push(table);
            }
            SwitchKind::String => {
                let table_index = self.code_block.string_switch_jump_tables.len() as u32;
                self.writer.set_word(switch_index + 1, table_index as i32);

                let mut table = StringJumpTable::new();
                for (label, key) in case_labels.iter().zip(case_keys.iter()) {
                    debug_assert!(!self.label_is_forward(*label));
                    let offset = self.label_location(*label) as i32 - switch_index as i32;

                    match key {
                        SwitchCaseKey::String(value) => table.add(value.clone(), offset),
                        _ => unreachable!("non-string key in string table"),
                    }
                }

                self.code_block.string_switch_jump_tables.push(table);
            }
        }
    }

    /*
     * For-in contexts
     */

    fn push_indexed_for_in_scope(
        &mut self,
        local: Option<VirtualRegister>,
        index: VirtualRegister,
    ) {
        if let Some(local) = local {
            self.for_in_context_stack
                .push(ForInContext::Indexed { local, index, is_valid: true });
        }
    }

    fn pop_indexed_for_in_scope(&mut self, local: Option<VirtualRegister>) {
        if local.is_some() {
            self.for_in_context_stack.pop();
        }
    }

    fn push_structure_for_in_scope(
        &mut self,
        local: Option<VirtualRegister>,
        index: VirtualRegister,
        property: VirtualRegister,
        enumerator: VirtualRegister,
    ) {
        if let Some(local) = local {
            self.for_in_context_stack.push(ForInContext::Structure {
                local,
                index,
                property,
                enumerator,
                is_valid: true,
            });
        }
    }

    fn pop_structure_for_in_scope(&mut self, local: Option<VirtualRegister>) {
        if local.is_some() {
            self.for_in_context_stack.pop();
        }
    }

    /// Invalidate the innermost for-in context whose loop variable is
    /// `local`. The context stays on the stack but no longer rewrites
    /// accesses: the variable may no longer hold the enumerated name.
    fn invalidate_for_in_context_for_local(&mut self, local: VirtualRegister) {
        for context in self.for_in_context_stack.iter_mut().rev() {
            if context.local() == local {
                context.invalidate();
                break;
            }
        }
    }

    /*
     * Property access and calls
     */

    fn emit_get_by_id(
        &mut self,
        dest: VirtualRegister,
        base: VirtualRegister,
        name: &Identifier,
    ) -> VirtualRegister {
        let identifier = self.add_identifier(name);
        let profile = self.new_value_profile();
        self.writer.get_by_id(dest, base, identifier, profile);
        dest
    }

    fn emit_put_by_id(&mut self, base: VirtualRegister, name: &Identifier, value: VirtualRegister) {
        let identifier = self.add_identifier(name);
        self.writer.put_by_id(base, identifier, value);
    }

    /// Indexed load, rewritten through any valid for-in context whose loop
    /// variable is the property: the raw index register replaces the property
    /// for indexed contexts, and structure contexts compile to a direct
    /// enumerated-name load.
    fn emit_get_by_val(
        &mut self,
        dest: VirtualRegister,
        base: VirtualRegister,
        property: VirtualRegister,
    ) -> VirtualRegister {
        let mut property = property;
        let mut structure_context = None;

        for context in self.for_in_context_stack.iter().rev() {
            if context.local() != property {
                continue;
            }

            if !context.is_valid() {
                break;
            }

            match context {
                ForInContext::Indexed { index, .. } => {
                    property = *index;
                }
                ForInContext::Structure { index, enumerator, .. } => {
                    structure_context = Some((*index, *enumerator));
                }
            }
            break;
        }

        if let Some((index, enumerator)) = structure_context {
            self.writer
                .get_direct_pname(dest, base, property, index, enumerator);
            return dest;
        }

        let profile = self.new_value_profile();
        self.writer.get_by_val(dest, base, property, profile);
        dest
    }

    fn emit_put_by_val(
        &mut self,
        base: VirtualRegister,
        property: VirtualRegister,
        value: VirtualRegister,
    ) {
        self.writer.put_by_val(base, property, value);
    }

    fn are_registers_contiguous(registers: &[VirtualRegister]) -> bool {
        registers
            .windows(2)
            .all(|pair| pair[0].is_local() && pair[1].is_local()
                && pair[1].local_index() == pair[0].local_index() + 1)
    }

    /// Allocate the contiguous receiver+argument run for a call. All
    /// registers are retained; the caller releases them after the call.
    fn allocate_call_arguments(&mut self, argc: usize) -> EmitResult<Vec<VirtualRegister>> {
        let mut registers = Vec::with_capacity(argc + 1);
        for _ in 0..argc + 1 {
            let register = self.new_temporary()?;
            self.registers.retain(register);
            registers.push(register);
        }

        debug_assert!(Self::are_registers_contiguous(&registers));
        Ok(registers)
    }

    fn release_call_arguments(&mut self, registers: &[VirtualRegister]) {
        // Release in reverse so the whole run becomes a reclaimable tail.
        for register in registers.iter().rev() {
            self.registers.release(*register);
        }
    }

    fn emit_call(
        &mut self,
        dest: VirtualRegister,
        function: VirtualRegister,
        args: &[VirtualRegister],
    ) {
        if self.should_emit_profile_hooks {
            self.writer.profile_will_call(function);
        }

        let profile = self.new_value_profile();
        self.writer
            .call(dest, function, args[0], args.len() as u32, profile);

        if self.should_emit_profile_hooks {
            self.writer.profile_did_call(function);
        }
    }

    fn emit_construct(
        &mut self,
        dest: VirtualRegister,
        function: VirtualRegister,
        args: &[VirtualRegister],
    ) {
        if self.should_emit_profile_hooks {
            self.writer.profile_will_call(function);
        }

        let profile = self.new_value_profile();
        self.writer
            .construct(dest, function, args[0], args.len() as u32, profile);

        if self.should_emit_profile_hooks {
            self.writer.profile_did_call(function);
        }
    }

    /*
     * Iterator protocol
     */

    /// Call `iterator.next()` into `dest` and throw a TypeError unless the
    /// result is an object.
    fn emit_iterator_next(
        &mut self,
        dest: VirtualRegister,
        iterator: VirtualRegister,
    ) -> EmitResult<()> {
        let next = self.new_temporary()?;
        self.registers.retain(next);
        let next_name = self.cx.names.next.clone();
        self.emit_get_by_id(next, iterator, &next_name);

        let args = self.allocate_call_arguments(0)?;
        self.emit_move(args[0], iterator);
        self.emit_call(dest, next, &args);
        self.release_call_arguments(&args);
        self.registers.release(next);

        let type_is_object = self.new_label();
        let is_object = self.new_temporary()?;
        self.writer.is_object(is_object, dest);
        self.emit_jump_if_true(is_object, type_is_object);
        self.emit_throw_type_error(NOT_OBJECT_ITERATOR_RESULT_ERROR)?;
        self.emit_label(type_is_object);
        self.release_label(type_is_object);

        Ok(())
    }

    /// Call `iterator.return()` if present, throwing a TypeError unless its
    /// result is an object.
    fn emit_iterator_close(&mut self, iterator: VirtualRegister) -> EmitResult<()> {
        let done = self.new_label();

        let return_method = self.new_temporary()?;
        self.registers.retain(return_method);
        let return_name = self.cx.names.return_.clone();
        self.emit_get_by_id(return_method, iterator, &return_name);

        let is_undefined = self.new_temporary()?;
        self.writer.is_undefined(is_undefined, return_method);
        self.emit_jump_if_true(is_undefined, done);

        let value = self.new_temporary()?;
        self.registers.retain(value);
        let args = self.allocate_call_arguments(0)?;
        self.emit_move(args[0], iterator);
        self.emit_call(value, return_method, &args);
        self.release_call_arguments(&args);

        let is_object = self.new_temporary()?;
        self.writer.is_object(is_object, value);
        self.emit_jump_if_true(is_object, done);
        self.emit_throw_type_error(NOT_OBJECT_ITERATOR_RESULT_ERROR)?;

        self.emit_label(done);
        self.release_label(done);
        self.registers.release(value);
        self.registers.release(return_method);

        Ok(())
    }

    /*
     * Returns
     */

    fn emit_throw(&mut self, src: VirtualRegister) {
        self.writer.throw(src);
    }

    /// Return from the function. Constructors return `this` unless an object
    /// was produced, and derived constructors additionally validate the
    /// returned value and a possibly-uninitialized `this`.
    fn emit_return(&mut self, src: VirtualRegister) -> EmitResult<()> {
        if self.is_constructor {
            let derived = self.is_derived_constructor();
            if derived && src == self.this_register {
                self.emit_tdz_check(src);
            }

            let is_object_label = self.new_label();
            let is_object = self.new_temporary()?;
            self.writer.is_object(is_object, src);
            self.emit_jump_if_true(is_object, is_object_label);

            if derived {
                let is_undefined_label = self.new_label();
                let is_undefined = self.new_temporary()?;
                self.writer.is_undefined(is_undefined, src);
                self.emit_jump_if_true(is_undefined, is_undefined_label);
                self.emit_throw_type_error(DERIVED_NON_OBJECT_RETURN_ERROR)?;
                self.emit_label(is_undefined_label);
                self.release_label(is_undefined_label);
                self.emit_tdz_check(self.this_register);
            }

            self.writer.ret(self.this_register);

            self.emit_label(is_object_label);
            self.release_label(is_object_label);
        }

        self.writer.ret(src);
        Ok(())
    }

    /*
     * Expressions
     */

    fn allocate_destination(&mut self, dest: ExprDest) -> EmitResult<VirtualRegister> {
        match dest {
            ExprDest::Any => self.new_temporary(),
            ExprDest::Fixed(register) => Ok(register),
        }
    }

    fn gen_mov_reg_to_dest(
        &mut self,
        src: VirtualRegister,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        match dest {
            ExprDest::Any => Ok(src),
            ExprDest::Fixed(register) => {
                self.emit_move(register, src);
                Ok(register)
            }
        }
    }

    fn gen_expression(&mut self, expr: &'a ast::Expression) -> EmitResult<VirtualRegister> {
        self.gen_expression_with_dest(expr, ExprDest::Any)
    }

    fn gen_expression_with_dest(
        &mut self,
        expr: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        if self.expression_depth >= EXPRESSION_DEPTH_LIMIT {
            return self.emit_throw_expression_too_deep_exception();
        }

        self.expression_depth += 1;
        let result = self.gen_expression_impl(expr, dest);
        self.expression_depth -= 1;

        result
    }

    fn gen_expression_impl(
        &mut self,
        expr: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        match expr {
            ast::Expression::Null => {
                let index = self.constant_table.add_null()?;
                let constant = self.constant_table.register_for(index);
                self.emit_load(dest, constant)
            }
            ast::Expression::Boolean(value) => {
                let index = self.constant_table.add_bool(*value)?;
                let constant = self.constant_table.register_for(index);
                self.emit_load(dest, constant)
            }
            ast::Expression::Number(value) => {
                let index = self.constant_table.add_number(*value)?;
                let constant = self.constant_table.register_for(index);
                self.emit_load(dest, constant)
            }
            ast::Expression::String(value) => {
                let constant = self.string_constant(value)?;
                self.emit_load(dest, constant)
            }
            ast::Expression::BigInt(value) => {
                let index = self.constant_table.add_bigint(Rc::new((**value).clone()))?;
                let constant = self.constant_table.register_for(index);
                self.emit_load(dest, constant)
            }
            ast::Expression::Template(template) => self.gen_template_literal(template, dest),
            ast::Expression::TaggedTemplate { tag, quasi } => {
                self.gen_tagged_template(tag, quasi, dest)
            }
            ast::Expression::Id(name) => self.gen_load_identifier(name, dest),
            ast::Expression::This => self.gen_mov_reg_to_dest(self.this_register, dest),
            ast::Expression::Array(elements) => self.gen_array_literal(elements, dest),
            ast::Expression::Object(properties) => self.gen_object_literal(properties, dest),
            ast::Expression::Function(func) => self.gen_function_expression(func, dest),
            ast::Expression::Unary { op, operand } => self.gen_unary_expression(*op, operand, dest),
            ast::Expression::Update { op, is_prefix, target } => {
                self.gen_update_expression(*op, *is_prefix, target, dest)
            }
            ast::Expression::Binary { op, left, right } => {
                self.gen_binary_expression(*op, left, right, dest)
            }
            ast::Expression::Logical { op, left, right } => {
                self.gen_logical_expression(*op, left, right, dest)
            }
            ast::Expression::Conditional { test, consequent, alternate } => {
                self.gen_conditional_expression(test, consequent, alternate, dest)
            }
            ast::Expression::Assign { op, target, value } => {
                self.gen_assignment_expression(*op, target, value, dest)
            }
            ast::Expression::Sequence(expressions) => {
                debug_assert!(!expressions.is_empty());
                for expr in &expressions[..expressions.len() - 1] {
                    self.gen_expression(expr)?;
                }
                self.gen_expression_with_dest(&expressions[expressions.len() - 1], dest)
            }
            ast::Expression::Member { object, property } => {
                self.gen_member_expression(object, property, dest)
            }
            ast::Expression::Call { callee, arguments } => {
                self.gen_call_expression(callee, arguments, dest)
            }
            ast::Expression::New { callee, arguments } => {
                self.gen_new_expression(callee, arguments, dest)
            }
        }
    }

    /// Load an identifier. Stack variables resolve to their register with no
    /// code when any destination is acceptable.
    fn gen_load_identifier(
        &mut self,
        name: &Identifier,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let variable = self.variable(name);

        match variable.offset() {
            Some(VarOffset::Stack(local)) => {
                self.emit_tdz_check_if_necessary(&variable, Some(local), None)?;
                self.gen_mov_reg_to_dest(local, dest)
            }
            Some(_) => {
                let scope = self.emit_resolve_scope(None, &variable)?;
                let result = self.allocate_destination(dest)?;
                self.emit_get_from_scope(result, scope, &variable, ResolveMode::ThrowIfNotFound)?;
                self.emit_tdz_check_if_necessary(&variable, Some(result), scope)?;
                Ok(result)
            }
            None => {
                let scope = self.new_temporary()?;
                self.registers.retain(scope);
                self.emit_resolve_scope(Some(scope), &variable)?;
                let result = self.allocate_destination(dest)?;
                self.emit_get_from_scope(
                    result,
                    Some(scope),
                    &variable,
                    ResolveMode::ThrowIfNotFound,
                )?;
                self.registers.release(scope);
                Ok(result)
            }
        }
    }

    /// Store a value to an identifier with full assignment semantics:
    /// TDZ checks, read-only checks, and for-in context invalidation.
    fn gen_store_identifier(
        &mut self,
        name: &Identifier,
        value: VirtualRegister,
        flags: StoreFlags,
    ) -> EmitResult<()> {
        let variable = self.variable(name);
        let is_initialization = flags.contains(StoreFlags::INITIALIZATION);

        if !is_initialization && variable.is_read_only() {
            // The right hand side was already evaluated; compile the failure
            // (or, for silently-ignored bindings, nothing) instead of a store.
            self.emit_read_only_exception_if_needed(&variable)?;
            return Ok(());
        }

        match variable.offset() {
            Some(VarOffset::Stack(local)) => {
                if !is_initialization {
                    self.emit_tdz_check_if_necessary(&variable, Some(local), None)?;
                }
                self.emit_move(local, value);
                self.invalidate_for_in_context_for_local(local);
            }
            Some(_) => {
                let scope = self.emit_resolve_scope(None, &variable)?;
                if !is_initialization {
                    self.emit_tdz_check_if_necessary(&variable, None, scope)?;
                }
                self.emit_put_to_scope(scope, &variable, value, ResolveMode::ThrowIfNotFound)?;
            }
            None => {
                let scope = self.new_temporary()?;
                self.registers.retain(scope);
                self.emit_resolve_scope(Some(scope), &variable)?;
                self.emit_put_to_scope(
                    Some(scope),
                    &variable,
                    value,
                    ResolveMode::ThrowIfNotFound,
                )?;
                self.registers.release(scope);
            }
        }

        if is_initialization {
            self.lift_tdz_check_if_possible(&variable);
        }

        Ok(())
    }

    fn gen_template_literal(
        &mut self,
        template: &'a ast::TemplateLiteral,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        // A template with no substitutions is just its cooked string.
        if template.expressions.is_empty() {
            debug_assert!(template.quasis.len() == 1);
            let constant = self.string_constant(&template.quasis[0].cooked)?;
            return self.emit_load(dest, constant);
        }

        // Evaluate all pieces into a contiguous run for strcat.
        let num_pieces = template.quasis.len() + template.expressions.len();
        let mut pieces = Vec::with_capacity(num_pieces);
        for _ in 0..num_pieces {
            let register = self.new_temporary()?;
            self.registers.retain(register);
            pieces.push(register);
        }
        debug_assert!(Self::are_registers_contiguous(&pieces));

        let mut piece_index = 0;
        for (i, quasi) in template.quasis.iter().enumerate() {
            let cooked = self.string_constant(&quasi.cooked)?;
            self.emit_move(pieces[piece_index], cooked);
            piece_index += 1;

            if i < template.expressions.len() {
                self.gen_expression_with_dest(
                    &template.expressions[i],
                    ExprDest::Fixed(pieces[piece_index]),
                )?;
                piece_index += 1;
            }
        }

        let result = self.allocate_destination(dest)?;
        self.writer.str_cat(result, pieces[0], pieces.len() as u32);

        for register in pieces.iter().rev() {
            self.registers.release(*register);
        }

        Ok(result)
    }

    fn gen_tagged_template(
        &mut self,
        tag: &'a ast::Expression,
        quasi: &'a ast::TemplateLiteral,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let raw = quasi.quasis.iter().map(|q| q.raw.clone()).collect();
        let cooked = quasi.quasis.iter().map(|q| q.cooked.clone()).collect();
        let key_index = self
            .constant_table
            .add_template_key(Rc::new(TemplateKey { raw, cooked }))?;

        let function = self.gen_expression(tag)?;
        self.registers.retain(function);

        // Receiver, template object, then one argument per substitution.
        let args = self.allocate_call_arguments(1 + quasi.expressions.len())?;
        let undefined = self.undefined_constant()?;
        self.emit_move(args[0], undefined);
        self.writer.get_template_object(args[1], key_index);
        for (i, expr) in quasi.expressions.iter().enumerate() {
            self.gen_expression_with_dest(expr, ExprDest::Fixed(args[2 + i]))?;
        }

        let result = self.allocate_destination(dest)?;
        self.emit_call(result, function, &args);

        self.release_call_arguments(&args);
        self.registers.release(function);
        Ok(result)
    }

    fn gen_array_literal(
        &mut self,
        elements: &'a [Option<ast::Expression>],
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let mut registers = Vec::with_capacity(elements.len());
        for _ in 0..elements.len() {
            let register = self.new_temporary()?;
            self.registers.retain(register);
            registers.push(register);
        }
        debug_assert!(Self::are_registers_contiguous(&registers));

        for (element, register) in elements.iter().zip(registers.iter()) {
            match element {
                Some(expr) => {
                    self.gen_expression_with_dest(expr, ExprDest::Fixed(*register))?;
                }
                None => {
                    let undefined = self.undefined_constant()?;
                    self.emit_move(*register, undefined);
                }
            }
        }

        let result = self.allocate_destination(dest)?;
        let profile = self.new_array_allocation_profile();
        let argv = registers.first().copied().unwrap_or(result);
        self.writer
            .new_array(result, argv, registers.len() as u32, profile);

        for register in registers.iter().rev() {
            self.registers.release(*register);
        }

        Ok(result)
    }

    fn gen_object_literal(
        &mut self,
        properties: &'a [ast::ObjectProperty],
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let object = self.allocate_destination(dest)?;
        self.registers.retain(object);

        let profile = self.new_object_allocation_profile();
        self.writer.new_object(object, profile);

        for property in properties {
            match &property.key {
                ast::PropertyKey::Id(name) => {
                    let value = self.gen_expression(&property.value)?;
                    let name = name.clone();
                    self.emit_put_by_id(object, &name, value);
                }
                ast::PropertyKey::Computed(key) => {
                    let key_register = self.gen_expression(key)?;
                    self.registers.retain(key_register);
                    let value = self.gen_expression(&property.value)?;
                    self.emit_put_by_val(object, key_register, value);
                    self.registers.release(key_register);
                }
            }
        }

        self.registers.release(object);
        Ok(object)
    }

    fn gen_function_expression(
        &mut self,
        func: &'a Rc<ast::Function>,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let index = self.make_function(func);
        let result = self.allocate_destination(dest)?;
        self.writer.new_function(result, index);
        Ok(result)
    }

    fn gen_unary_expression(
        &mut self,
        op: ast::UnaryOperator,
        operand: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        match op {
            ast::UnaryOperator::TypeOf => return self.gen_typeof_expression(operand, dest),
            ast::UnaryOperator::Void => {
                self.gen_expression(operand)?;
                let undefined = self.undefined_constant()?;
                return self.emit_load(dest, undefined);
            }
            _ => {}
        }

        let src = self.gen_expression(operand)?;
        let result = self.allocate_destination(dest)?;

        match op {
            ast::UnaryOperator::Minus => self.writer.negate(result, src),
            ast::UnaryOperator::Plus => self.writer.to_number(result, src),
            ast::UnaryOperator::LogicalNot => self.writer.not(result, src),
            _ => unreachable!(),
        }

        Ok(result)
    }

    /// `typeof` never throws on unresolvable names, so dynamic lookups use
    /// the non-throwing resolve mode.
    fn gen_typeof_expression(
        &mut self,
        operand: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let value = if let ast::Expression::Id(name) = operand {
            let variable = self.variable(name);
            if variable.is_resolved() {
                self.gen_load_identifier(name, ExprDest::Any)?
            } else {
                let scope = self.new_temporary()?;
                self.registers.retain(scope);
                self.emit_resolve_scope(Some(scope), &variable)?;
                let value = self.new_temporary()?;
                self.emit_get_from_scope(
                    value,
                    Some(scope),
                    &variable,
                    ResolveMode::DoNotThrowIfNotFound,
                )?;
                self.registers.release(scope);
                value
            }
        } else {
            self.gen_expression(operand)?
        };

        let result = self.allocate_destination(dest)?;
        self.writer.type_of(result, value);
        Ok(result)
    }

    fn gen_update_expression(
        &mut self,
        op: ast::UpdateOperator,
        is_prefix: bool,
        target: &'a ast::AssignTarget,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        match target {
            ast::AssignTarget::Id(name) => {
                // Load the old value into a mutable temporary.
                let value = self.new_temporary()?;
                self.registers.retain(value);
                self.gen_load_identifier(name, ExprDest::Fixed(value))?;

                let result = if is_prefix {
                    self.write_inc_or_dec(op, value);
                    let name = name.clone();
                    self.gen_store_identifier(&name, value, StoreFlags::empty())?;
                    self.registers.release(value);
                    self.gen_mov_reg_to_dest(value, dest)?
                } else {
                    let old_value = self.allocate_destination(dest)?;
                    self.writer.to_number(old_value, value);
                    self.emit_move(value, old_value);
                    self.write_inc_or_dec(op, value);
                    let name = name.clone();
                    self.gen_store_identifier(&name, value, StoreFlags::empty())?;
                    self.registers.release(value);
                    old_value
                };

                Ok(result)
            }
            ast::AssignTarget::Member { object, property } => {
                let base = self.gen_expression(object)?;
                self.registers.retain(base);

                let property_register = match property {
                    ast::MemberProperty::Id(_) => None,
                    ast::MemberProperty::Computed(expr) => {
                        let register = self.gen_expression(expr)?;
                        self.registers.retain(register);
                        Some(register)
                    }
                };

                let value = self.new_temporary()?;
                self.registers.retain(value);
                match (property, property_register) {
                    (ast::MemberProperty::Id(name), _) => {
                        let name = name.clone();
                        self.emit_get_by_id(value, base, &name);
                    }
                    (_, Some(register)) => {
                        self.emit_get_by_val(value, base, register);
                    }
                    _ => unreachable!(),
                }

                let result = if is_prefix {
                    self.write_inc_or_dec(op, value);
                    value
                } else {
                    let old_value = self.allocate_destination(dest)?;
                    self.writer.to_number(old_value, value);
                    self.emit_move(value, old_value);
                    self.write_inc_or_dec(op, value);
                    old_value
                };

                match (property, property_register) {
                    (ast::MemberProperty::Id(name), _) => {
                        let name = name.clone();
                        self.emit_put_by_id(base, &name, value);
                    }
                    (_, Some(register)) => {
                        self.emit_put_by_val(base, register, value);
                    }
                    _ => unreachable!(),
                }

                self.registers.release(value);
                if let Some(register) = property_register {
                    self.registers.release(register);
                }
                self.registers.release(base);

                if is_prefix {
                    self.gen_mov_reg_to_dest(value, dest)
                } else {
                    Ok(result)
                }
            }
        }
    }

    fn write_inc_or_dec(&mut self, op: ast::UpdateOperator, value: VirtualRegister) {
        match op {
            ast::UpdateOperator::Increment => self.writer.inc(value),
            ast::UpdateOperator::Decrement => self.writer.dec(value),
        }
    }

    fn gen_binary_expression(
        &mut self,
        op: ast::BinaryOperator,
        left: &'a ast::Expression,
        right: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        use ast::BinaryOperator::*;

        // Loose comparison against a literal null compiles to the dedicated
        // null-compare opcodes, which also feed the fused branches.
        if op == Eq || op == NotEq {
            let null_compare_operand = match (left, right) {
                (ast::Expression::Null, other) => Some(other),
                (other, ast::Expression::Null) => Some(other),
                _ => None,
            };

            if let Some(operand) = null_compare_operand {
                let src = self.gen_expression(operand)?;
                let result = self.allocate_destination(dest)?;
                if op == Eq {
                    self.writer.eq_null(result, src);
                } else {
                    self.writer.neq_null(result, src);
                }
                return Ok(result);
            }
        }

        let src1 = self.gen_expression(left)?;
        self.registers.retain(src1);
        let src2 = self.gen_expression(right)?;
        self.registers.release(src1);
        let result = self.allocate_destination(dest)?;

        match op {
            Eq => self.emit_equality_op(OpCode::Eq, result, src1, src2),
            NotEq => self.emit_equality_op(OpCode::Neq, result, src1, src2),
            StrictEq => self.emit_equality_op(OpCode::StrictEq, result, src1, src2),
            StrictNotEq => self.emit_equality_op(OpCode::NStrictEq, result, src1, src2),
            Less => self.writer.less(result, src1, src2),
            LessEq => self.writer.less_eq(result, src1, src2),
            Greater => self.writer.greater(result, src1, src2),
            GreaterEq => self.writer.greater_eq(result, src1, src2),
            Add => self.writer.add(result, src1, src2),
            Subtract => self.writer.sub(result, src1, src2),
            Multiply => self.writer.mul(result, src1, src2),
            Divide => self.writer.div(result, src1, src2),
            Remainder => self.writer.mod_(result, src1, src2),
            BitOr => self.writer.bit_or(result, src1, src2),
            BitAnd => self.writer.bit_and(result, src1, src2),
            BitXor => self.writer.bit_xor(result, src1, src2),
            LeftShift => self.writer.left_shift(result, src1, src2),
            RightShift => self.writer.right_shift(result, src1, src2),
            UnsignedRightShift => self.writer.unsigned_right_shift(result, src1, src2),
            In => self.writer.in_(result, src1, src2),
            InstanceOf => self.writer.instance_of(result, src1, src2),
        }

        Ok(result)
    }

    fn gen_logical_expression(
        &mut self,
        op: ast::LogicalOperator,
        left: &'a ast::Expression,
        right: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let result = self.allocate_destination(dest)?;
        self.registers.retain(result);

        let done = self.new_label();
        self.gen_expression_with_dest(left, ExprDest::Fixed(result))?;
        match op {
            ast::LogicalOperator::And => self.emit_jump_if_false(result, done),
            ast::LogicalOperator::Or => self.emit_jump_if_true(result, done),
        }
        self.gen_expression_with_dest(right, ExprDest::Fixed(result))?;
        self.emit_label(done);
        self.release_label(done);

        self.registers.release(result);
        Ok(result)
    }

    fn gen_conditional_expression(
        &mut self,
        test: &'a ast::Expression,
        consequent: &'a ast::Expression,
        alternate: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let result = self.allocate_destination(dest)?;
        self.registers.retain(result);

        let else_label = self.new_label();
        let done = self.new_label();

        let condition = self.gen_expression(test)?;
        self.emit_jump_if_false(condition, else_label);

        self.gen_expression_with_dest(consequent, ExprDest::Fixed(result))?;
        self.emit_jump(done);

        self.emit_label(else_label);
        self.release_label(else_label);
        self.gen_expression_with_dest(alternate, ExprDest::Fixed(result))?;

        self.emit_label(done);
        self.release_label(done);

        self.registers.release(result);
        Ok(result)
    }

    fn gen_assignment_expression(
        &mut self,
        op: Option<ast::BinaryOperator>,
        target: &'a ast::AssignTarget,
        value: &'a ast::Expression,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        match target {
            ast::AssignTarget::Id(name) => {
                let result = match op {
                    None => {
                        let value = self.gen_expression_with_dest(value, dest)?;
                        value
                    }
                    Some(op) => {
                        // Compound assignment reads the old value first, with
                        // the usual TDZ check.
                        let old_value = self.new_temporary()?;
                        self.registers.retain(old_value);
                        self.gen_load_identifier(name, ExprDest::Fixed(old_value))?;
                        let rhs = self.gen_expression(value)?;
                        let result = self.allocate_destination(dest)?;
                        self.write_compound_op(op, result, old_value, rhs);
                        self.registers.release(old_value);
                        result
                    }
                };

                self.registers.retain(result);
                self.gen_store_identifier(name, result, StoreFlags::empty())?;
                self.registers.release(result);
                Ok(result)
            }
            ast::AssignTarget::Member { object, property } => {
                let base = self.gen_expression(object)?;
                self.registers.retain(base);

                let property_register = match property {
                    ast::MemberProperty::Id(_) => None,
                    ast::MemberProperty::Computed(expr) => {
                        let register = self.gen_expression(expr)?;
                        self.registers.retain(register);
                        Some(register)
                    }
                };

                let result = match op {
                    None => self.gen_expression_with_dest(value, dest)?,
                    Some(op) => {
                        let old_value = self.new_temporary()?;
                        self.registers.retain(old_value);
                        match (property, property_register) {
                            (ast::MemberProperty::Id(name), _) => {
                                self.emit_get_by_id(old_value, base, name);
                            }
                            (_, Some(register)) => {
                                self.emit_get_by_val(old_value, base, register);
                            }
                            _ => unreachable!(),
                        }
                        let rhs = self.gen_expression(value)?;
                        let result = self.allocate_destination(dest)?;
                        self.write_compound_op(op, result, old_value, rhs);
                        self.registers.release(old_value);
                        result
                    }
                };

                self.registers.retain(result);
                match (property, property_register) {
                    (ast::MemberProperty::Id(name), _) => {
                        self.emit_put_by_id(base, name, result);
                    }
                    (_, Some(register)) => {
                        self.emit_put_by_val(base, register, result);
                    }
                    _ => unreachable!(),
                }
                self.registers.release(result);

                if let Some(register) = property_register {
                    self.registers.release(register);
                }
                self.registers.release(base);

                Ok(result)
            }
        }
    }

    fn write_compound_op(
        &mut self,
        op: ast::BinaryOperator,
        result: VirtualRegister,
        left: VirtualRegister,
        right: VirtualRegister,
    ) {
        use ast::BinaryOperator::*;
        match op {
            Add => self.writer.add(result, left, right),
            Subtract => self.writer.sub(result, left, right),
            Multiply => self.writer.mul(result, left, right),
            Divide => self.writer.div(result, left, right),
            Remainder => self.writer.mod_(result, left, right),
            BitOr => self.writer.bit_or(result, left, right),
            BitAnd => self.writer.bit_and(result, left, right),
            BitXor => self.writer.bit_xor(result, left, right),
            LeftShift => self.writer.left_shift(result, left, right),
            RightShift => self.writer.right_shift(result, left, right),
            UnsignedRightShift => self.writer.unsigned_right_shift(result, left, right),
            _ => unreachable!("not a compound assignment operator"),
        }
    }

    fn gen_member_expression(
        &mut self,
        object: &'a ast::Expression,
        property: &'a ast::MemberProperty,
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let base = self.gen_expression(object)?;
        self.registers.retain(base);

        let result = match property {
            ast::MemberProperty::Id(name) => {
                let result = self.allocate_destination(dest)?;
                self.emit_get_by_id(result, base, name);
                result
            }
            ast::MemberProperty::Computed(expr) => {
                let property = self.gen_expression(expr)?;
                let result = self.allocate_destination(dest)?;
                self.emit_get_by_val(result, base, property);
                result
            }
        };

        self.registers.release(base);
        Ok(result)
    }

    fn gen_call_expression(
        &mut self,
        callee: &'a ast::Expression,
        arguments: &'a [ast::Expression],
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        // Member callees pass their base as the receiver; everything else
        // gets undefined.
        let (function, receiver, is_eval) = match callee {
            ast::Expression::Member { object, property } => {
                let base = self.gen_expression(object)?;
                self.registers.retain(base);

                let function = match property {
                    ast::MemberProperty::Id(name) => {
                        let function = self.new_temporary()?;
                        self.emit_get_by_id(function, base, name);
                        function
                    }
                    ast::MemberProperty::Computed(expr) => {
                        let property = self.gen_expression(expr)?;
                        let function = self.new_temporary()?;
                        self.emit_get_by_val(function, base, property);
                        function
                    }
                };

                (function, Some(base), false)
            }
            ast::Expression::Id(name) => {
                let is_eval = name.as_str() == "eval";
                let function = self.gen_load_identifier(name, ExprDest::Any)?;
                (function, None, is_eval)
            }
            other => (self.gen_expression(other)?, None, false),
        };

        self.registers.retain(function);

        let args = self.allocate_call_arguments(arguments.len())?;
        match receiver {
            Some(base) => self.emit_move(args[0], base),
            None => {
                let undefined = self.undefined_constant()?;
                self.emit_move(args[0], undefined);
            }
        }
        for (i, argument) in arguments.iter().enumerate() {
            self.gen_expression_with_dest(argument, ExprDest::Fixed(args[1 + i]))?;
        }

        let result = self.allocate_destination(dest)?;
        if is_eval {
            if self.should_emit_profile_hooks {
                self.writer.profile_will_call(function);
            }
            let profile = self.new_value_profile();
            self.writer
                .call_eval(result, function, args[0], args.len() as u32, profile);
            if self.should_emit_profile_hooks {
                self.writer.profile_did_call(function);
            }
        } else {
            self.emit_call(result, function, &args);
        }

        self.release_call_arguments(&args);
        self.registers.release(function);
        if let Some(base) = receiver {
            self.registers.release(base);
        }

        Ok(result)
    }

    fn gen_new_expression(
        &mut self,
        callee: &'a ast::Expression,
        arguments: &'a [ast::Expression],
        dest: ExprDest,
    ) -> EmitResult<VirtualRegister> {
        let function = self.gen_expression(callee)?;
        self.registers.retain(function);

        let args = self.allocate_call_arguments(arguments.len())?;
        // The receiver slot is filled by the constructor itself.
        let undefined = self.undefined_constant()?;
        self.emit_move(args[0], undefined);
        for (i, argument) in arguments.iter().enumerate() {
            self.gen_expression_with_dest(argument, ExprDest::Fixed(args[1 + i]))?;
        }

        let result = self.allocate_destination(dest)?;
        self.emit_construct(result, function, &args);

        self.release_call_arguments(&args);
        self.registers.release(function);
        Ok(result)
    }

    /// Record a nested function for later generation, returning its index in
    /// the function table. The names under TDZ at the creation site are
    /// snapshotted now.
    fn make_function(&mut self, func: &'a Rc<ast::Function>) -> u32 {
        let index = self.code_block.functions.borrow().len();
        self.code_block.functions.borrow_mut().push(None);

        self.pending_functions.push(PendingFunctionNode {
            func: func.as_ref(),
            parent_scope_tdz: self.get_variables_under_tdz(),
            index,
        });

        index as u32
    }

    /*
     * Statements
     */

    fn gen_statement(&mut self, stmt: &'a ast::Statement) -> EmitResult<StmtCompletion> {
        self.emit_debug_hook(DebugHook::WillExecuteStatement);

        match stmt {
            ast::Statement::Block(block) => self.gen_block_statements(block),
            ast::Statement::VariableDeclaration(decl) => self.gen_variable_declaration(decl),
            // Hoisted function declarations were bound at function entry.
            ast::Statement::FunctionDeclaration(_) => Ok(StmtCompletion::Normal),
            ast::Statement::Expression(expr) => self.gen_expression_statement(expr),
            ast::Statement::If(stmt) => self.gen_if_statement(stmt),
            ast::Statement::While(stmt) => self.gen_while_statement(stmt),
            ast::Statement::DoWhile(stmt) => self.gen_do_while_statement(stmt),
            ast::Statement::For(stmt) => self.gen_for_statement(stmt),
            ast::Statement::ForIn(stmt) => self.gen_for_in_statement(stmt),
            ast::Statement::ForOf(stmt) => self.gen_for_of_statement(stmt),
            ast::Statement::Switch(stmt) => self.gen_switch_statement(stmt),
            ast::Statement::Break(label) => self.gen_break_statement(label.as_ref()),
            ast::Statement::Continue(label) => self.gen_continue_statement(label.as_ref()),
            ast::Statement::Return(argument) => self.gen_return_statement(argument.as_ref()),
            ast::Statement::Throw(argument) => self.gen_throw_statement(argument),
            ast::Statement::Try(stmt) => self.gen_try_statement(stmt),
            ast::Statement::Labeled(stmt) => self.gen_labeled_statement(stmt),
            ast::Statement::With(stmt) => self.gen_with_statement(stmt),
            ast::Statement::Debugger => Ok(StmtCompletion::Normal),
            ast::Statement::Empty => Ok(StmtCompletion::Normal),
        }
    }

    fn gen_statement_list(&mut self, stmts: &'a [ast::Statement]) -> EmitResult<StmtCompletion> {
        let mut completion = StmtCompletion::Normal;
        for stmt in stmts {
            completion = completion.combine(self.gen_statement(stmt)?);
        }
        Ok(completion)
    }

    fn gen_block_statements(&mut self, block: &'a ast::Block) -> EmitResult<StmtCompletion> {
        self.push_lexical_scope(&block.lexical_variables, true)?;
        let completion = self.gen_statement_list(&block.body)?;
        self.pop_lexical_scope(&block.lexical_variables)?;
        Ok(completion)
    }

    fn gen_expression_statement(
        &mut self,
        expr: &'a ast::Expression,
    ) -> EmitResult<StmtCompletion> {
        match self.statement_completion_dest {
            Some(dest) => {
                self.gen_expression_with_dest(expr, ExprDest::Fixed(dest))?;
            }
            None => {
                self.gen_expression(expr)?;
            }
        }
        Ok(StmtCompletion::Normal)
    }

    fn gen_variable_declaration(
        &mut self,
        decl: &'a ast::VariableDeclaration,
    ) -> EmitResult<StmtCompletion> {
        for declarator in &decl.declarations {
            match &declarator.init {
                Some(init) => {
                    let value = self.gen_expression(init)?;
                    self.registers.retain(value);
                    self.gen_bind_pattern(&declarator.pattern, value)?;
                    self.registers.release(value);
                }
                None => {
                    // A let without an initializer initializes to undefined;
                    // a var declaration alone emits nothing.
                    if decl.kind == ast::DeclarationKind::Let {
                        let undefined = self.undefined_constant()?;
                        self.gen_bind_pattern(&declarator.pattern, undefined)?;
                    }
                }
            }
        }
        Ok(StmtCompletion::Normal)
    }

    /// Bind a value to a declaration pattern, initializing each bound name.
    fn gen_bind_pattern(
        &mut self,
        pattern: &'a ast::Pattern,
        value: VirtualRegister,
    ) -> EmitResult<()> {
        match pattern {
            ast::Pattern::Id(name) => {
                self.gen_store_identifier(name, value, StoreFlags::INITIALIZATION)
            }
            ast::Pattern::Array(elements) => self.gen_array_pattern(elements, value),
        }
    }

    /// Destructure a value through the iterator protocol. Elements past
    /// iterator exhaustion bind undefined; elisions still advance the
    /// iterator.
    fn gen_array_pattern(
        &mut self,
        elements: &'a [Option<ast::Pattern>],
        value: VirtualRegister,
    ) -> EmitResult<()> {
        let iterator = self.new_temporary()?;
        self.registers.retain(iterator);
        let iterator_name = self.cx.names.iterator.clone();
        self.emit_get_by_id(iterator, value, &iterator_name);

        let args = self.allocate_call_arguments(0)?;
        self.emit_move(args[0], value);
        self.emit_call(iterator, iterator, &args);
        self.release_call_arguments(&args);

        // Once done becomes true every later element binds undefined.
        let done = self.new_temporary()?;
        self.registers.retain(done);
        let false_index = self.constant_table.add_bool(false)?;
        let false_constant = self.constant_table.register_for(false_index);
        self.emit_move(done, false_constant);

        let next_result = self.new_temporary()?;
        self.registers.retain(next_result);
        let element_value = self.new_temporary()?;
        self.registers.retain(element_value);

        for element in elements {
            let use_undefined = self.new_label();
            let element_done = self.new_label();

            self.emit_jump_if_true(done, use_undefined);
            self.emit_iterator_next(next_result, iterator)?;

            let done_name = self.cx.names.done.clone();
            self.emit_get_by_id(done, next_result, &done_name);
            self.emit_jump_if_true(done, use_undefined);

            let value_name = self.cx.names.value.clone();
            self.emit_get_by_id(element_value, next_result, &value_name);
            self.emit_jump(element_done);

            self.emit_label(use_undefined);
            self.release_label(use_undefined);
            let undefined = self.undefined_constant()?;
            self.emit_move(element_value, undefined);

            self.emit_label(element_done);
            self.release_label(element_done);

            if let Some(element) = element {
                self.gen_bind_pattern(element, element_value)?;
            }
        }

        self.registers.release(element_value);
        self.registers.release(next_result);
        self.registers.release(done);
        self.registers.release(iterator);
        Ok(())
    }

    fn gen_if_statement(&mut self, stmt: &'a ast::IfStatement) -> EmitResult<StmtCompletion> {
        match &stmt.alternate {
            None => {
                let after_if = self.new_label();
                let condition = self.gen_expression(&stmt.test)?;
                self.emit_jump_if_false(condition, after_if);

                self.gen_statement(&stmt.consequent)?;

                self.emit_label(after_if);
                self.release_label(after_if);
                Ok(StmtCompletion::Normal)
            }
            Some(alternate) => {
                let else_label = self.new_label();
                let after_if = self.new_label();

                let condition = self.gen_expression(&stmt.test)?;
                self.emit_jump_if_false(condition, else_label);

                let consequent_completion = self.gen_statement(&stmt.consequent)?;
                if !consequent_completion.is_abrupt() {
                    self.emit_jump(after_if);
                }

                self.emit_label(else_label);
                self.release_label(else_label);
                let alternate_completion = self.gen_statement(alternate)?;

                self.emit_label(after_if);
                self.release_label(after_if);

                Ok(consequent_completion.combine(alternate_completion))
            }
        }
    }

    fn gen_while_statement(&mut self, stmt: &'a ast::WhileStatement) -> EmitResult<StmtCompletion> {
        let scope = self.new_label_scope(LabelScopeType::Loop, None);
        let break_target = self.label_scopes[scope].break_target;
        let continue_target = self.label_scopes[scope].continue_target.unwrap();

        // Test at the bottom of the loop so each iteration takes one branch.
        self.emit_jump(continue_target);

        let top_of_loop = self.new_label();
        self.emit_label(top_of_loop);
        self.writer.loop_hint();

        self.gen_statement(&stmt.body)?;

        self.emit_label(continue_target);
        let condition = self.gen_expression(&stmt.test)?;
        self.emit_jump_if_true(condition, top_of_loop);

        self.emit_label(break_target);
        self.release_label(top_of_loop);
        self.release_label_scope(scope);
        Ok(StmtCompletion::Normal)
    }

    fn gen_do_while_statement(
        &mut self,
        stmt: &'a ast::DoWhileStatement,
    ) -> EmitResult<StmtCompletion> {
        let scope = self.new_label_scope(LabelScopeType::Loop, None);
        let break_target = self.label_scopes[scope].break_target;
        let continue_target = self.label_scopes[scope].continue_target.unwrap();

        let top_of_loop = self.new_label();
        self.emit_label(top_of_loop);
        self.writer.loop_hint();

        self.gen_statement(&stmt.body)?;

        self.emit_label(continue_target);
        let condition = self.gen_expression(&stmt.test)?;
        self.emit_jump_if_true(condition, top_of_loop);

        self.emit_label(break_target);
        self.release_label(top_of_loop);
        self.release_label_scope(scope);
        Ok(StmtCompletion::Normal)
    }

    fn gen_for_statement(&mut self, stmt: &'a ast::ForStatement) -> EmitResult<StmtCompletion> {
        // Loop header let/const bindings live in their own scope, refreshed
        // per iteration when captured.
        let loop_symbol_table = self.push_lexical_scope(&stmt.lexical_variables, true)?;

        match &stmt.init {
            Some(ast::ForInit::Declaration(decl)) => {
                self.gen_variable_declaration(decl)?;
            }
            Some(ast::ForInit::Expression(expr)) => {
                self.gen_expression(expr)?;
            }
            None => {}
        }

        let scope = self.new_label_scope(LabelScopeType::Loop, None);
        let break_target = self.label_scopes[scope].break_target;
        let continue_target = self.label_scopes[scope].continue_target.unwrap();
        let test_label = self.new_label();

        self.emit_jump(test_label);

        let top_of_loop = self.new_label();
        self.emit_label(top_of_loop);
        self.writer.loop_hint();

        self.gen_statement(&stmt.body)?;

        self.emit_label(continue_target);
        self.prepare_lexical_scope_for_next_for_loop_iteration(
            &stmt.lexical_variables,
            loop_symbol_table,
        )?;
        if let Some(update) = &stmt.update {
            self.gen_expression(update)?;
        }

        self.emit_label(test_label);
        self.release_label(test_label);
        match &stmt.test {
            Some(test) => {
                let condition = self.gen_expression(test)?;
                self.emit_jump_if_true(condition, top_of_loop);
            }
            None => self.emit_jump(top_of_loop),
        }

        self.emit_label(break_target);
        self.release_label(top_of_loop);
        self.release_label_scope(scope);

        self.pop_lexical_scope(&stmt.lexical_variables)?;
        Ok(StmtCompletion::Normal)
    }

    /// Store this iteration's key or value into the loop target.
    fn gen_store_for_target(
        &mut self,
        target: &'a ast::ForTarget,
        value: VirtualRegister,
    ) -> EmitResult<()> {
        match target {
            ast::ForTarget::Declaration(_, name) => {
                self.gen_store_identifier(name, value, StoreFlags::INITIALIZATION)
            }
            ast::ForTarget::Identifier(name) => {
                self.gen_store_identifier(name, value, StoreFlags::empty())
            }
        }
    }

    /// The loop target's stack register, for for-in context tracking. A
    /// captured or dynamically resolved target disables the fast paths.
    fn for_target_local(&mut self, target: &'a ast::ForTarget) -> Option<VirtualRegister> {
        self.variable(target.name()).local()
    }

    fn gen_for_of_statement(
        &mut self,
        stmt: &'a ast::ForEachStatement,
    ) -> EmitResult<StmtCompletion> {
        let loop_symbol_table = self.push_lexical_scope(&stmt.lexical_variables, true)?;
        self.emit_enumeration(stmt, loop_symbol_table)?;
        self.pop_lexical_scope(&stmt.lexical_variables)?;
        Ok(StmtCompletion::Normal)
    }

    /// Lower a for-of loop over the iterator protocol. The body runs inside
    /// a synthesized-finally try so a throw closes the iterator before
    /// rethrowing, and a break closes it on the way out; the two close paths
    /// stay separate so `return()` is never observably called twice.
    fn emit_enumeration(
        &mut self,
        stmt: &'a ast::ForEachStatement,
        loop_symbol_table: Option<u32>,
    ) -> EmitResult<()> {
        let subject = self.new_temporary()?;
        self.registers.retain(subject);
        self.gen_expression_with_dest(&stmt.right, ExprDest::Fixed(subject))?;

        // iterator = subject[Symbol.iterator]()
        let iterator = self.new_temporary()?;
        self.registers.retain(iterator);
        let iterator_name = self.cx.names.iterator.clone();
        self.emit_get_by_id(iterator, subject, &iterator_name);
        {
            let args = self.allocate_call_arguments(0)?;
            self.emit_move(args[0], subject);
            self.emit_call(iterator, iterator, &args);
            self.release_call_arguments(&args);
        }
        self.registers.release(subject);

        let loop_done = self.new_label();

        // The iterator register must outlive the iterator close context.
        self.push_iterator_close_context(iterator);
        {
            let scope = self.new_label_scope(LabelScopeType::Loop, None);
            let break_target = self.label_scopes[scope].break_target;
            let continue_target = self.label_scopes[scope].continue_target.unwrap();

            let value = self.new_temporary()?;
            self.registers.retain(value);
            let undefined = self.undefined_constant()?;
            self.emit_move(value, undefined);

            self.emit_jump(continue_target);

            let loop_start = self.new_label();
            self.emit_label(loop_start);
            self.writer.loop_hint();

            let try_start = self.new_label();
            self.emit_label(try_start);
            let try_data = self.push_try(try_start);

            self.gen_store_for_target(&stmt.left, value)?;
            self.gen_statement(&stmt.body)?;
            self.emit_jump(continue_target);

            // Iterator close sequence for thrown control flow.
            {
                let catch_here = self.new_label();
                self.emit_label(catch_here);
                let exception = self.new_temporary()?;
                self.registers.retain(exception);
                let thrown_value = self.new_temporary()?;
                self.registers.retain(thrown_value);
                self.pop_try_and_emit_catch(
                    try_data,
                    exception,
                    thrown_value,
                    catch_here,
                    HandlerKind::SynthesizedFinally,
                )?;

                let catch_done = self.new_label();

                let return_method = self.new_temporary()?;
                self.registers.retain(return_method);
                let return_name = self.cx.names.return_.clone();
                self.emit_get_by_id(return_method, iterator, &return_name);
                let is_undefined = self.new_temporary()?;
                self.writer.is_undefined(is_undefined, return_method);
                self.emit_jump_if_true(is_undefined, catch_done);

                // The return() call is itself wrapped so its exception is
                // absorbed and the original exception wins.
                let return_call_try_start = self.new_label();
                self.emit_label(return_call_try_start);
                let return_call_try_data = self.push_try(return_call_try_start);

                let args = self.allocate_call_arguments(0)?;
                self.emit_move(args[0], iterator);
                self.emit_call(value, return_method, &args);
                self.release_call_arguments(&args);

                self.emit_label(catch_done);
                self.emit_throw(thrown_value);

                let absorb_exception = self.new_temporary()?;
                let absorb_thrown = self.new_temporary()?;
                self.pop_try_and_emit_catch(
                    return_call_try_data,
                    absorb_exception,
                    absorb_thrown,
                    catch_done,
                    HandlerKind::SynthesizedFinally,
                )?;
                self.emit_throw(thrown_value);

                self.release_label(catch_done);
                self.registers.release(return_method);
                self.registers.release(thrown_value);
                self.registers.release(exception);
            }

            self.emit_label(continue_target);
            self.prepare_lexical_scope_for_next_for_loop_iteration(
                &stmt.lexical_variables,
                loop_symbol_table,
            )?;

            // value = next(); loop unless done.
            self.emit_iterator_next(value, iterator)?;
            let done_register = self.new_temporary()?;
            let done_name = self.cx.names.done.clone();
            self.emit_get_by_id(done_register, value, &done_name);
            self.emit_jump_if_true(done_register, loop_done);
            let value_name = self.cx.names.value.clone();
            self.emit_get_by_id(value, value, &value_name);
            self.emit_jump(loop_start);

            self.emit_label(break_target);
            self.release_label(loop_start);
            // try_start stays retained: its location feeds the handler table.
            self.registers.release(value);
            self.release_label_scope(scope);
        }

        // Iterator close sequence for break control flow.
        self.pop_iterator_close_context();
        self.emit_iterator_close(iterator)?;
        self.emit_label(loop_done);
        self.release_label(loop_done);
        self.registers.release(iterator);

        Ok(())
    }

    /// Lower a for-in loop in three phases: an indexed fast path over the
    /// enumerable length, a structure-enumerator fast path over shape
    /// properties, and a generic path over the rest. The first two register
    /// for-in contexts so body accesses keyed on the loop variable compile to
    /// cheaper forms.
    fn gen_for_in_statement(
        &mut self,
        stmt: &'a ast::ForEachStatement,
    ) -> EmitResult<StmtCompletion> {
        self.push_lexical_scope(&stmt.lexical_variables, true)?;

        let loop_done = self.new_label();

        let base = self.new_temporary()?;
        self.registers.retain(base);
        self.gen_expression_with_dest(&stmt.right, ExprDest::Fixed(base))?;

        // Skip the loop entirely for null and undefined subjects.
        let is_nullish = self.new_temporary()?;
        self.writer.eq_null(is_nullish, base);
        self.emit_jump_if_true(is_nullish, loop_done);

        let length = self.new_temporary()?;
        self.registers.retain(length);
        self.writer.get_enumerable_length(length, base);

        let enumerator = self.new_temporary()?;
        self.registers.retain(enumerator);
        self.writer.get_property_enumerator(enumerator, base);

        let index = self.new_temporary()?;
        self.registers.retain(index);
        let property_name = self.new_temporary()?;
        self.registers.retain(property_name);

        let local = self.for_target_local(&stmt.left);
        let zero_index = self.constant_table.add_number(0.0)?;
        let zero = self.constant_table.register_for(zero_index);

        // Phase 1: indexed properties.
        {
            let scope = self.new_label_scope(LabelScopeType::Loop, None);
            let break_target = self.label_scopes[scope].break_target;
            let continue_target = self.label_scopes[scope].continue_target.unwrap();
            let test_label = self.new_label();

            self.emit_move(index, zero);
            self.emit_jump(test_label);

            let top_of_loop = self.new_label();
            self.emit_label(top_of_loop);
            self.writer.loop_hint();

            let has_property = self.new_temporary()?;
            self.writer.has_indexed_property(has_property, base, index);
            self.emit_jump_if_false(has_property, continue_target);

            self.writer.to_index_string(property_name, index);
            self.gen_store_for_target(&stmt.left, property_name)?;

            self.push_indexed_for_in_scope(local, index);
            self.gen_statement(&stmt.body)?;
            self.pop_indexed_for_in_scope(local);

            self.emit_label(continue_target);
            self.writer.inc(index);

            self.emit_label(test_label);
            self.release_label(test_label);
            let in_bounds = self.new_temporary()?;
            self.writer.less(in_bounds, index, length);
            self.emit_jump_if_true(in_bounds, top_of_loop);

            self.emit_label(break_target);
            self.release_label(top_of_loop);
            self.release_label_scope(scope);
        }

        // Phase 2: structure properties.
        {
            let scope = self.new_label_scope(LabelScopeType::Loop, None);
            let break_target = self.label_scopes[scope].break_target;
            let continue_target = self.label_scopes[scope].continue_target.unwrap();

            self.emit_move(index, zero);

            let top_of_loop = self.new_label();
            self.emit_label(top_of_loop);
            self.writer.loop_hint();

            // A null property name means the structure names are exhausted.
            self.writer
                .enumerator_structure_pname(property_name, enumerator, index);
            let exhausted = self.new_temporary()?;
            self.writer.eq_null(exhausted, property_name);
            self.emit_jump_if_true(exhausted, break_target);

            let has_property = self.new_temporary()?;
            self.writer
                .has_structure_property(has_property, base, property_name, enumerator);
            self.emit_jump_if_false(has_property, continue_target);

            self.gen_store_for_target(&stmt.left, property_name)?;

            self.push_structure_for_in_scope(local, index, property_name, enumerator);
            self.gen_statement(&stmt.body)?;
            self.pop_structure_for_in_scope(local);

            self.emit_label(continue_target);
            self.writer.inc(index);
            self.emit_jump(top_of_loop);

            self.emit_label(break_target);
            self.release_label(top_of_loop);
            self.release_label_scope(scope);
        }

        // Phase 3: remaining generic properties.
        {
            let scope = self.new_label_scope(LabelScopeType::Loop, None);
            let break_target = self.label_scopes[scope].break_target;
            let continue_target = self.label_scopes[scope].continue_target.unwrap();

            self.emit_move(index, zero);

            let top_of_loop = self.new_label();
            self.emit_label(top_of_loop);
            self.writer.loop_hint();

            self.writer
                .enumerator_generic_pname(property_name, enumerator, index);
            let exhausted = self.new_temporary()?;
            self.writer.eq_null(exhausted, property_name);
            self.emit_jump_if_true(exhausted, break_target);

            let has_property = self.new_temporary()?;
            self.writer
                .has_generic_property(has_property, base, property_name);
            self.emit_jump_if_false(has_property, continue_target);

            self.gen_store_for_target(&stmt.left, property_name)?;
            self.gen_statement(&stmt.body)?;

            self.emit_label(continue_target);
            self.writer.inc(index);
            self.emit_jump(top_of_loop);

            self.emit_label(break_target);
            self.release_label(top_of_loop);
            self.release_label_scope(scope);
        }

        self.emit_label(loop_done);
        self.release_label(loop_done);

        self.registers.release(property_name);
        self.registers.release(index);
        self.registers.release(enumerator);
        self.registers.release(length);
        self.registers.release(base);

        self.pop_lexical_scope(&stmt.lexical_variables)?;
        Ok(StmtCompletion::Normal)
    }

    /// Pick the jump table kind that covers every non-default case, if any.
    fn switch_kind_for_cases(cases: &[ast::SwitchCase]) -> Option<SwitchKind> {
        let mut num_clauses = 0;
        let mut all_int = true;
        let mut all_char = true;
        let mut all_string = true;
        let mut min = i32::MAX;
        let mut max = i32::MIN;

        for case in cases {
            let test = match &case.test {
                Some(test) => test,
                None => continue,
            };
            num_clauses += 1;

            match test {
                ast::Expression::Number(value) => {
                    all_char = false;
                    all_string = false;
                    let as_int = *value as i32;
                    if as_int as f64 != *value {
                        all_int = false;
                    } else {
                        min = min.min(as_int);
                        max = max.max(as_int);
                    }
                }
                ast::Expression::String(value) => {
                    all_int = false;
                    let mut chars = value.as_str().chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) if (c as u32) <= 0xFFFF => {
                            min = min.min(c as i32);
                            max = max.max(c as i32);
                        }
                        _ => all_char = false,
                    }
                }
                _ => {
                    all_int = false;
                    all_char = false;
                    all_string = false;
                }
            }
        }

        // Small or sparse switches fall back to a compare chain.
        if num_clauses < 3 {
            return None;
        }

        if all_int && (max as i64 - min as i64 + 1) <= 3 * num_clauses as i64 {
            Some(SwitchKind::Immediate)
        } else if all_char && (max as i64 - min as i64 + 1) <= 3 * num_clauses as i64 {
            Some(SwitchKind::Character)
        } else if all_string {
            Some(SwitchKind::String)
        } else {
            None
        }
    }

    fn switch_case_key(kind: SwitchKind, test: &ast::Expression) -> SwitchCaseKey {
        match (kind, test) {
            (SwitchKind::Immediate, ast::Expression::Number(value)) => {
                SwitchCaseKey::Immediate(*value as i32)
            }
            (SwitchKind::Character, ast::Expression::String(value)) => {
                let c = value.as_str().chars().next().unwrap();
                SwitchCaseKey::Character(c as i32)
            }
            (SwitchKind::String, ast::Expression::String(value)) => {
                SwitchCaseKey::String(value.clone())
            }
            _ => unreachable!("case does not match switch kind"),
        }
    }

    fn gen_switch_statement(
        &mut self,
        stmt: &'a ast::SwitchStatement,
    ) -> EmitResult<StmtCompletion> {
        self.push_lexical_scope(&stmt.lexical_variables, true)?;

        let scope = self.new_label_scope(LabelScopeType::Switch, None);
        let break_target = self.label_scopes[scope].break_target;

        let scrutinee = self.new_temporary()?;
        self.registers.retain(scrutinee);
        self.gen_expression_with_dest(&stmt.discriminant, ExprDest::Fixed(scrutinee))?;

        let kind = Self::switch_kind_for_cases(&stmt.cases);

        // One label per case body, bound as the bodies are emitted.
        let mut case_labels = vec![];
        for _ in 0..stmt.cases.len() {
            case_labels.push(self.new_label());
        }

        let default_index = stmt.cases.iter().position(|case| case.test.is_none());

        match kind {
            Some(kind) => {
                let mut min = i32::MAX;
                let mut max = i32::MIN;
                let mut table_labels = vec![];
                let mut table_keys = vec![];

                for (case, label) in stmt.cases.iter().zip(case_labels.iter()) {
                    let test = match &case.test {
                        Some(test) => test,
                        None => continue,
                    };
                    let key = Self::switch_case_key(kind, test);
                    if let SwitchCaseKey::Immediate(value) | SwitchCaseKey::Character(value) = &key
                    {
                        min = min.min(*value);
                        max = max.max(*value);
                    }
                    table_keys.push(key);
                    table_labels.push(*label);
                }

                self.begin_switch(scrutinee, kind);

                for (case, label) in stmt.cases.iter().zip(case_labels.iter()) {
                    self.emit_label(*label);
                    self.gen_statement_list(&case.body)?;
                }

                let default_label = match default_index {
                    Some(index) => case_labels[index],
                    None => break_target,
                };

                self.emit_label(break_target);
                self.end_switch(&table_labels, &table_keys, default_label, min, max);
            }
            None => {
                // Sequential strict-equality compare chain.
                for (case, label) in stmt.cases.iter().zip(case_labels.iter()) {
                    let test = match &case.test {
                        Some(test) => test,
                        None => continue,
                    };

                    let case_value = self.gen_expression(test)?;
                    let matches = self.new_temporary()?;
                    self.emit_equality_op(OpCode::StrictEq, matches, scrutinee, case_value);
                    self.emit_jump_if_true(matches, *label);
                }

                match default_index {
                    Some(index) => self.emit_jump(case_labels[index]),
                    None => self.emit_jump(break_target),
                }

                for (case, label) in stmt.cases.iter().zip(case_labels.iter()) {
                    self.emit_label(*label);
                    self.gen_statement_list(&case.body)?;
                }

                self.emit_label(break_target);
            }
        }

        for label in case_labels {
            self.release_label(label);
        }
        self.release_label_scope(scope);

        self.registers.release(scrutinee);
        self.pop_lexical_scope(&stmt.lexical_variables)?;
        Ok(StmtCompletion::Normal)
    }

    fn gen_break_statement(
        &mut self,
        label: Option<&'a Identifier>,
    ) -> EmitResult<StmtCompletion> {
        let scope = self
            .break_target(label)
            .expect("break target must exist after parsing");

        self.emit_pop_scopes(scope.scope_depth)?;
        self.emit_jump(scope.break_target);
        Ok(StmtCompletion::Abrupt)
    }

    fn gen_continue_statement(
        &mut self,
        label: Option<&'a Identifier>,
    ) -> EmitResult<StmtCompletion> {
        let scope = self
            .continue_target(label)
            .expect("continue target must exist after parsing");

        self.emit_pop_scopes(scope.scope_depth)?;
        self.emit_jump(scope.continue_target.unwrap());
        Ok(StmtCompletion::Abrupt)
    }

    fn gen_return_statement(
        &mut self,
        argument: Option<&'a ast::Expression>,
    ) -> EmitResult<StmtCompletion> {
        let value = match argument {
            Some(argument) => {
                let value = self.gen_expression(argument)?;
                self.registers.retain(value);
                value
            }
            None => {
                let undefined = self.undefined_constant()?;
                self.registers.retain(undefined);
                undefined
            }
        };

        // Returning from inside try/finally or with scopes replays the
        // pending cleanup code first.
        if self.label_scope_depth() != 0 {
            self.emit_pop_scopes(0)?;
        }

        self.emit_return(value)?;
        self.registers.release(value);
        Ok(StmtCompletion::Abrupt)
    }

    fn gen_throw_statement(&mut self, argument: &'a ast::Expression) -> EmitResult<StmtCompletion> {
        let value = self.gen_expression(argument)?;
        self.emit_throw(value);
        Ok(StmtCompletion::Abrupt)
    }

    fn gen_try_statement(&mut self, stmt: &'a ast::TryStatement) -> EmitResult<StmtCompletion> {
        if let Some(finalizer) = &stmt.finalizer {
            self.push_finally_context(finalizer);
        }

        let try_start = self.new_label();
        self.emit_label(try_start);
        let mut try_data = self.push_try(try_start);

        let try_completion = self.gen_block_statements(&stmt.block)?;

        if let Some(handler) = &stmt.handler {
            let after_catch = self.new_label();
            if !try_completion.is_abrupt() {
                self.emit_jump(after_catch);
            }

            let here = self.new_label();
            self.emit_label(here);

            let exception = self.new_temporary()?;
            self.registers.retain(exception);
            let thrown_value = self.new_temporary()?;
            self.registers.retain(thrown_value);
            self.pop_try_and_emit_catch(
                try_data,
                exception,
                thrown_value,
                here,
                HandlerKind::Catch,
            )?;

            // When a finally exists the catch block gets its own try, so its
            // exceptions still reach the finally handler.
            if stmt.finalizer.is_some() {
                try_data = self.push_try(here);
            }

            self.emit_push_catch_scope(&handler.param, thrown_value, &handler.environment)?;
            self.registers.release(thrown_value);
            self.registers.release(exception);

            self.gen_block_statements(&handler.body)?;
            self.emit_pop_catch_scope(&handler.environment)?;

            self.emit_label(after_catch);
            self.release_label(after_catch);
        }

        if let Some(finalizer) = &stmt.finalizer {
            self.pop_finally_context();

            // Normal completion path: run the finally code and jump over the
            // exception path.
            self.gen_block_statements(finalizer)?;
            let finally_end = self.new_label();
            self.emit_jump(finally_end);

            // Uncaught exception path: run the finally code again, then
            // rethrow.
            let here = self.new_label();
            self.emit_label(here);
            let exception = self.new_temporary()?;
            self.registers.retain(exception);
            let thrown_value = self.new_temporary()?;
            self.registers.retain(thrown_value);
            self.pop_try_and_emit_catch(
                try_data,
                exception,
                thrown_value,
                here,
                HandlerKind::SynthesizedFinally,
            )?;
            self.gen_block_statements(finalizer)?;
            self.emit_throw(exception);
            self.registers.release(thrown_value);
            self.registers.release(exception);

            self.emit_label(finally_end);
            self.release_label(finally_end);
        } else {
            debug_assert!(stmt.handler.is_some(), "try requires a catch or finally");
        }

        Ok(StmtCompletion::Normal)
    }

    fn gen_labeled_statement(
        &mut self,
        stmt: &'a ast::LabeledStatement,
    ) -> EmitResult<StmtCompletion> {
        let scope = self.new_label_scope(LabelScopeType::NamedLabel, Some(stmt.label.clone()));
        let break_target = self.label_scopes[scope].break_target;

        let completion = self.gen_statement(&stmt.body)?;

        self.emit_label(break_target);
        self.release_label_scope(scope);
        Ok(completion)
    }

    fn gen_with_statement(&mut self, stmt: &'a ast::WithStatement) -> EmitResult<StmtCompletion> {
        let object = self.gen_expression(&stmt.object)?;
        self.emit_push_with_scope(object)?;
        let completion = self.gen_statement(&stmt.body)?;
        self.emit_pop_with_scope()?;
        Ok(completion)
    }

    /*
     * Function, program, and eval entry points
     */

    /// Generate a function unit. Reproduces the ECMA-262
    /// FunctionDeclarationInstantiation binding order using only forward
    /// allocation: callee self-binding first, then `arguments`, then every
    /// hoisted function declaration last.
    pub fn generate(
        mut self,
        func: &'a ast::Function,
        parent_scope_tdz: &IndexSet<Identifier>,
    ) -> EmitResult<EmitFunctionResult<'a>> {
        self.gen_function_preamble(func, parent_scope_tdz)?;

        // If we declared a variable named "arguments" and we are using
        // arguments then perform that assignment now.
        if self.need_to_initialize_arguments {
            let arguments_name = self.cx.names.arguments.clone();
            let variable = self.variable(&arguments_name);
            let arguments_register = self.arguments_register.unwrap();
            self.initialize_variable(&variable, arguments_register)?;
        }

        self.push_lexical_scope(&func.lexical_variables, true)?;

        // Hoisted functions are initialized after everything else so that
        // they override parameters, the callee, and arguments.
        self.gen_initialize_functions()?;

        // A class constructor invoked as a plain call only throws.
        let calling_class_constructor =
            self.constructor_kind != ConstructorKind::None && !self.is_constructor;
        if !calling_class_constructor {
            let body_completion = self.gen_statement_list(&func.body)?;

            if !body_completion.is_abrupt() {
                let undefined = self.undefined_constant()?;
                self.emit_return(undefined)?;
            }
        } else {
            self.emit_throw_type_error(CALL_CLASS_CONSTRUCTOR_ERROR)?;
            let undefined = self.undefined_constant()?;
            self.writer.ret(undefined);
        }

        self.gen_exception_handler_table();
        self.finish()
    }

    /// Port of the function-entry setup: parameter layout, the arguments
    /// object decision table, the callee self-binding, and declaration of
    /// every var and hoisted function.
    fn gen_function_preamble(
        &mut self,
        func: &'a ast::Function,
        parent_scope_tdz: &IndexSet<Identifier>,
    ) -> EmitResult<()> {
        let parameters = &func.parameters;

        let function_symbol_table = SymbolTable::new(ScopeType::VarScope);
        let symbol_table_constant_index = self
            .constant_table
            .add_symbol_table(function_symbol_table.clone())?;
        self.code_block.symbol_tables.push(function_symbol_table.clone());

        // Destructured parameter names, unless default values force them into
        // their own parameter environment.
        let mut bound_parameter_properties = vec![];
        if !parameters.has_default_parameter_values() {
            for param in &parameters.params {
                if param.pattern.is_binding() {
                    continue;
                }
                param.pattern.collect_bound_identifiers(&mut bound_parameter_properties);
            }
        }

        let should_capture_some_of_the_things =
            self.should_emit_debug_hooks || func.has_captured_variables() || func.uses_eval;
        let should_capture_all_of_the_things = self.should_emit_debug_hooks || func.uses_eval;
        let needs_arguments = func.uses_arguments || func.uses_eval;

        let arguments_name = self.cx.names.arguments.clone();
        let captures = |name: &Identifier| -> bool {
            if !should_capture_some_of_the_things {
                return false;
            }
            if should_capture_all_of_the_things {
                return true;
            }
            if needs_arguments && name == &arguments_name {
                // The arguments object is only truly forced into the scope by
                // name scopes, but the simple rule is kept.
                return true;
            }
            func.captures(name)
        };

        self.writer.enter();
        self.allocate_and_emit_scope()?;

        // Bind the function expression's own name dynamically when a
        // non-strict eval could shadow it.
        let function_name_is_in_scope =
            func.name.is_some() && func.function_mode == FunctionMode::Expression;
        let function_name_scope_is_dynamic = func.uses_eval && !func.is_strict;

        if function_name_is_in_scope && function_name_scope_is_dynamic {
            let name = func.name.clone().unwrap();
            self.emit_push_function_name_scope(&name)?;
        }

        if should_capture_some_of_the_things {
            let register = self.add_var()?;
            self.lexical_environment_register = Some(register);

            // The var environment cannot be allocated yet if there are
            // default parameter expressions: its parent must be the parameter
            // environment.
            if !parameters.has_default_parameter_values() {
                self.initialize_var_lexical_environment(symbol_table_constant_index)?;
            }
        }

        self.code_block.num_parameters = parameters.size() as u32 + 1;

        // Figure out which parameters are captured by name.
        let mut captures_any_argument_by_name = false;
        if func.has_captured_variables() {
            for param in &parameters.params {
                if let Some(name) = param.pattern.bound_name() {
                    captures_any_argument_by_name |= captures(name);
                }
            }
        }

        if captures_any_argument_by_name {
            debug_assert!(self.lexical_environment_register.is_some());
        }

        // Parameters have some goofy behaviors when it comes to functions of
        // the same name, so know what our functions are called.
        for function in &func.function_stack {
            self.functions.insert(function.name.clone().unwrap());
        }

        if needs_arguments {
            let register = self.add_var()?;
            self.arguments_register = Some(register);
            self.code_block.arguments_register = Some(register);
        }

        if needs_arguments && !func.is_strict && !parameters.has_default_parameter_values() {
            // If any formal parameter is captured by name use ScopedArguments
            // and lift every argument into the activation; otherwise alias
            // the raw argument registers with DirectArguments.
            if captures_any_argument_by_name {
                function_symbol_table
                    .borrow_mut()
                    .set_arguments_length(parameters.size() as u32);

                for i in 0..parameters.size() {
                    let offset = function_symbol_table.borrow_mut().take_next_scope_offset();
                    function_symbol_table
                        .borrow_mut()
                        .set_argument_offset(i, offset);

                    let identifier = match self.visible_name_for_parameter(func, i) {
                        Some(name) => {
                            function_symbol_table.borrow_mut().set(
                                name.clone(),
                                SymbolTableEntry::new(VarOffset::Scope(offset)),
                            );
                            self.add_identifier(&name)
                        }
                        None => NO_IDENTIFIER,
                    };

                    let mode_and_type = ResolveModeAndType::new(
                        ResolveMode::ThrowIfNotFound,
                        ResolveType::LocalClosureVar,
                    );
                    self.writer.put_to_scope(
                        self.lexical_environment_register.unwrap(),
                        identifier,
                        VirtualRegister::parameter(i),
                        mode_and_type.operand(),
                        symbol_table_constant_index,
                        offset,
                    );
                }

                let arguments_register = self.arguments_register.unwrap();
                self.writer.create_scoped_arguments(
                    arguments_register,
                    self.lexical_environment_register.unwrap(),
                );
            } else {
                for i in 0..parameters.size() {
                    if let Some(name) = self.visible_name_for_parameter(func, i) {
                        function_symbol_table.borrow_mut().set(
                            name,
                            SymbolTableEntry::new(VarOffset::DirectArgument(i as u32)),
                        );
                    }
                }

                let arguments_register = self.arguments_register.unwrap();
                self.writer.create_direct_arguments(arguments_register);
            }
        } else if !parameters.has_default_parameter_values() {
            // Create the formal parameters the normal way: uncaptured simple
            // parameters are accessed directly in their argument registers,
            // captured ones are lifted into the scope.
            for i in 0..parameters.size() {
                let name = match self.visible_name_for_parameter(func, i) {
                    Some(name) => name,
                    None => continue,
                };

                if !captures(&name) {
                    function_symbol_table.borrow_mut().set(
                        name,
                        SymbolTableEntry::new(VarOffset::Stack(VirtualRegister::parameter(i))),
                    );
                    continue;
                }

                let offset = function_symbol_table.borrow_mut().take_next_scope_offset();
                function_symbol_table
                    .borrow_mut()
                    .set(name.clone(), SymbolTableEntry::new(VarOffset::Scope(offset)));

                let identifier = self.add_identifier(&name);
                let mode_and_type = ResolveModeAndType::new(
                    ResolveMode::ThrowIfNotFound,
                    ResolveType::LocalClosureVar,
                );
                self.writer.put_to_scope(
                    self.lexical_environment_register.unwrap(),
                    identifier,
                    VirtualRegister::parameter(i),
                    mode_and_type.operand(),
                    symbol_table_constant_index,
                    offset,
                );
            }
        }

        if needs_arguments && (func.is_strict || parameters.has_default_parameter_values()) {
            // Allocate an out-of-band arguments object.
            let arguments_register = self.arguments_register.unwrap();
            self.writer.create_out_of_band_arguments(arguments_register);
        }

        // Now declare all variables.
        for name in &bound_parameter_properties {
            debug_assert!(!parameters.has_default_parameter_values());
            self.create_variable(name, captures(name), &function_symbol_table, false)?;
        }

        for function in &func.function_stack {
            let name = function.name.clone().unwrap();
            self.create_variable(&name, captures(&name), &function_symbol_table, false)?;
            self.functions_to_initialize
                .push((function.as_ref(), FunctionVariableType::NormalFunctionVariable));
        }

        for (name, entry) in func.var_declarations.iter() {
            debug_assert!(entry.is_var());
            self.create_variable(name, captures(name), &function_symbol_table, true)?;
        }

        // Bind the callee's own name, unless a non-strict eval made the
        // binding dynamic (handled by the function name scope above).
        if function_name_is_in_scope && !function_name_scope_is_dynamic {
            let name = func.name.clone().unwrap();
            if function_symbol_table.borrow().get(&name).is_none() {
                let writable = if self.is_strict {
                    Writable::No
                } else {
                    Writable::SilentlyIgnored
                };

                if captures(&name) {
                    let offset = function_symbol_table.borrow_mut().take_next_scope_offset();
                    function_symbol_table.borrow_mut().set(
                        name.clone(),
                        SymbolTableEntry::new_read_only(VarOffset::Scope(offset), writable),
                    );

                    let identifier = self.add_identifier(&name);
                    let mode_and_type = ResolveModeAndType::new(
                        ResolveMode::ThrowIfNotFound,
                        ResolveType::LocalClosureVar,
                    );
                    self.writer.put_to_scope(
                        self.lexical_environment_register.unwrap(),
                        identifier,
                        self.callee_register,
                        mode_and_type.operand(),
                        symbol_table_constant_index,
                        offset,
                    );
                } else {
                    function_symbol_table.borrow_mut().set(
                        name.clone(),
                        SymbolTableEntry::new_read_only(
                            VarOffset::Stack(self.callee_register),
                            writable,
                        ),
                    );
                }
            }
        }

        // "arguments" is overridden by everything except the callee. Add it
        // unless a simple parameter of the same name already owns the slot.
        if needs_arguments {
            let have_parameter_named_arguments = (0..parameters.size()).any(|i| {
                self.visible_name_for_parameter(func, i).as_ref() == Some(&arguments_name)
            });

            if !have_parameter_named_arguments {
                self.create_variable(
                    &arguments_name,
                    captures(&arguments_name),
                    &function_symbol_table,
                    false,
                )?;
                self.need_to_initialize_arguments = true;
            }
        }

        let new_target_register = self.add_var()?;
        self.code_block.new_target_register = Some(new_target_register);

        if self.is_constructor {
            self.emit_move(new_target_register, self.this_register);
            if self.is_derived_constructor() {
                // `this` starts uninitialized in derived constructors.
                self.emit_move_empty_value(self.this_register)?;
            } else {
                self.writer.create_this(self.this_register);
            }
        } else if self.constructor_kind != ConstructorKind::None {
            self.emit_throw_type_error(CALL_CLASS_CONSTRUCTOR_ERROR)?;
        } else if func.uses_this || func.uses_eval {
            self.writer.to_this(self.this_register);
        }

        // All vars are allocated before default parameter expressions run,
        // because those expressions use temporary registers.
        self.tdz_stack.push(TdzStackEntry {
            variables: parent_scope_tdz.clone(),
            can_optimize: false,
        });

        self.initialize_default_parameter_values_and_setup_function_scope_stack(
            func,
            &function_symbol_table,
            symbol_table_constant_index,
            &captures,
        )?;

        Ok(())
    }

    /// A simple parameter's visible name, hidden when a hoisted function
    /// shares it.
    fn visible_name_for_parameter(
        &self,
        func: &ast::Function,
        index: usize,
    ) -> Option<Identifier> {
        match func.parameters.at(index).pattern.bound_name() {
            Some(name) if !self.functions.contains(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn initialize_var_lexical_environment(
        &mut self,
        symbol_table_constant_index: u32,
    ) -> EmitResult<()> {
        let register = self.lexical_environment_register.unwrap();
        self.code_block.activation_register = Some(register);

        let initial_value = self.undefined_constant()?;

        self.writer.create_lexical_environment(
            register,
            self.scope_register,
            symbol_table_constant_index,
            initial_value,
        );
        self.emit_move(self.scope_register, register);
        Ok(())
    }

    /// Set up the parameter environment and push the function scope onto the
    /// symbol table stack. With default parameter values present, parameters
    /// act like let bindings in their own TDZ scope, each default guarded by
    /// an is_undefined check, and same-named vars start out as the parameter
    /// value (FunctionDeclarationInstantiation step 28).
    fn initialize_default_parameter_values_and_setup_function_scope_stack(
        &mut self,
        func: &'a ast::Function,
        function_symbol_table: &Rc<RefCell<SymbolTable>>,
        symbol_table_constant_index: u32,
        captures: &dyn Fn(&Identifier) -> bool,
    ) -> EmitResult<()> {
        let parameters = &func.parameters;
        let mut values_to_move_into_vars: Vec<(Identifier, VirtualRegister)> = vec![];

        if parameters.has_default_parameter_values() {
            let mut environment = VariableEnvironment::new();
            let mut all_parameter_names = vec![];
            for param in &parameters.params {
                param.pattern.collect_bound_identifiers(&mut all_parameter_names);
            }
            for name in &all_parameter_names {
                let entry = environment.add(name.clone());
                entry.set_is_let();
                if captures(name) {
                    entry.set_is_captured();
                }
            }

            self.push_lexical_scope_internal(
                &environment,
                true,
                TdzRequirement::UnderTdz,
                ScopeType::LexicalScope,
                ScopeRegisterType::Block,
            )?;

            let temp = self.new_temporary()?;
            self.registers.retain(temp);
            for (i, param) in parameters.params.iter().enumerate() {
                let parameter_value = VirtualRegister::parameter(i);
                self.emit_move(temp, parameter_value);

                if let Some(default_value) = &param.default_value {
                    // An explicitly passed undefined triggers the default
                    // too, so test the value rather than the argument count.
                    let skip_default = self.new_label();
                    let condition = self.new_temporary()?;
                    self.writer.is_undefined(condition, parameter_value);
                    self.emit_jump_if_false(condition, skip_default);
                    self.gen_expression_with_dest(default_value, ExprDest::Fixed(temp))?;
                    self.emit_label(skip_default);
                    self.release_label(skip_default);
                }

                self.gen_bind_pattern(&param.pattern, temp)?;
            }
            self.registers.release(temp);

            // If a var has the same name as a parameter it starts out as the
            // value of that parameter, though they are distinct bindings.
            let parameter_set: IndexSet<&Identifier> = all_parameter_names.iter().collect();
            for (name, entry) in func.var_declarations.iter() {
                if !entry.is_var() {
                    continue;
                }

                if parameter_set.contains(name) {
                    let variable = self.variable(name);
                    let scope = self.emit_resolve_scope(None, &variable)?;
                    let value = self.new_temporary()?;
                    self.registers.retain(value);
                    self.emit_get_from_scope(
                        value,
                        scope,
                        &variable,
                        ResolveMode::DoNotThrowIfNotFound,
                    )?;
                    values_to_move_into_vars.push((name.clone(), value));
                }
            }

            // The var environment record gets the parameter environment
            // record as its parent.
            if self.lexical_environment_register.is_some() {
                self.initialize_var_lexical_environment(symbol_table_constant_index)?;
            }
        }

        if self.lexical_environment_register.is_some() {
            self.push_scoped_control_flow_context();
        }
        self.symbol_table_stack.push(SymbolTableStackEntry {
            symbol_table: Some(function_symbol_table.clone()),
            scope_register: self.lexical_environment_register,
            is_with_scope: false,
            symbol_table_constant_index: Some(symbol_table_constant_index),
        });

        // This completes FunctionDeclarationInstantiation step 28.
        for (name, value) in &values_to_move_into_vars {
            debug_assert!(parameters.has_default_parameter_values());
            let variable = self.variable(name);
            let scope = self.emit_resolve_scope(None, &variable)?;
            self.emit_put_to_scope(scope, &variable, *value, ResolveMode::DoNotThrowIfNotFound)?;
            self.registers.release(*value);
        }

        if !parameters.has_default_parameter_values() {
            debug_assert!(values_to_move_into_vars.is_empty());
            // Initialize destructuring parameters directly from their
            // argument registers.
            for (i, param) in parameters.params.iter().enumerate() {
                if !param.pattern.is_binding() {
                    let parameter_value = VirtualRegister::parameter(i);
                    self.gen_bind_pattern(&param.pattern, parameter_value)?;
                }
            }
        }

        Ok(())
    }

    /// Create closures for hoisted function declarations and bind them.
    fn gen_initialize_functions(&mut self) -> EmitResult<()> {
        if self.functions_to_initialize.is_empty() {
            return Ok(());
        }

        let temp = self.new_temporary()?;
        self.registers.retain(temp);

        let functions = std::mem::take(&mut self.functions_to_initialize);
        for (function, function_type) in functions {
            let name = function.name.clone().unwrap();

            let index = {
                let func_index = self.code_block.functions.borrow().len();
                self.code_block.functions.borrow_mut().push(None);
                self.pending_functions.push(PendingFunctionNode {
                    func: function,
                    parent_scope_tdz: self.get_variables_under_tdz(),
                    index: func_index,
                });
                func_index as u32
            };
            self.writer.new_function(temp, index);

            match function_type {
                FunctionVariableType::NormalFunctionVariable => {
                    let variable = self.variable(&name);
                    self.initialize_variable(&variable, temp)?;
                }
                FunctionVariableType::GlobalFunctionVariable => {
                    let variable = Variable::unresolved(name.clone());
                    self.emit_put_to_scope(
                        Some(self.top_most_scope),
                        &variable,
                        temp,
                        ResolveMode::ThrowIfNotFound,
                    )?;
                }
            }
        }

        self.registers.release(temp);
        Ok(())
    }

    /// Generate a toplevel program unit. Hoisted functions become properties
    /// of the global object, and the completion value of the last statement
    /// becomes the program's result.
    pub fn generate_program(mut self, program: &'a ast::Program) -> EmitResult<EmitFunctionResult<'a>> {
        self.code_block.num_parameters = 1;

        self.writer.enter();
        self.allocate_and_emit_scope()?;

        for function in &program.function_stack {
            self.functions_to_initialize
                .push((function.as_ref(), FunctionVariableType::GlobalFunctionVariable));
        }

        for (name, entry) in program.var_declarations.iter() {
            debug_assert!(entry.is_var());
            self.code_block.variable_declarations.push(name.clone());
        }

        let completion_dest = self.add_var()?;
        self.statement_completion_dest = Some(completion_dest);
        let undefined = self.undefined_constant()?;
        self.emit_move(completion_dest, undefined);

        self.push_lexical_scope(&program.lexical_variables, true)?;

        self.gen_initialize_functions()?;

        self.emit_debug_hook(DebugHook::WillExecuteProgram);
        self.gen_statement_list(&program.toplevels)?;
        self.emit_debug_hook(DebugHook::DidExecuteProgram);

        self.writer.end(completion_dest);

        self.gen_exception_handler_table();
        self.finish()
    }

    /// Generate an eval unit. Toplevel vars and function declarations are
    /// recorded for the runtime to hoist into the variable environment, so
    /// every access to them resolves dynamically.
    pub fn generate_eval(
        mut self,
        eval: &'a ast::EvalNode,
        parent_scope_tdz: &IndexSet<Identifier>,
    ) -> EmitResult<EmitFunctionResult<'a>> {
        self.code_block.num_parameters = 1;

        self.writer.enter();
        self.allocate_and_emit_scope()?;

        for (name, entry) in eval.var_declarations.iter() {
            debug_assert!(entry.is_var());
            self.code_block.variable_declarations.push(name.clone());
        }

        self.tdz_stack.push(TdzStackEntry {
            variables: parent_scope_tdz.clone(),
            can_optimize: false,
        });

        for function in &eval.function_stack {
            let index = self.code_block.functions.borrow().len();
            self.code_block.functions.borrow_mut().push(None);
            self.pending_functions.push(PendingFunctionNode {
                func: function.as_ref(),
                parent_scope_tdz: self.get_variables_under_tdz(),
                index,
            });
            self.code_block.function_decls.push(index as u32);
        }

        let completion_dest = self.add_var()?;
        self.statement_completion_dest = Some(completion_dest);
        let undefined = self.undefined_constant()?;
        self.emit_move(completion_dest, undefined);

        self.push_lexical_scope(&eval.lexical_variables, true)?;

        self.gen_statement_list(&eval.toplevels)?;

        self.writer.end(completion_dest);

        self.gen_exception_handler_table();
        self.finish()
    }

    /// Compile the recorded try ranges into the exception handler table.
    /// Replay of finally blocks can leave ranges whose effective end precedes
    /// their start; such a handler could never match, so it is dropped.
    fn gen_exception_handler_table(&mut self) {
        debug_assert!(self.try_context_stack.is_empty());

        let mut builder = ExceptionHandlersBuilder::new();

        for range in &self.try_ranges {
            let start = self.labels[range.start.0 as usize].location().unwrap();
            let end = self.labels[range.end.0 as usize].location().unwrap();

            if end <= start {
                continue;
            }

            let try_data = &self.try_datas[range.try_data];
            let handler = self.labels[try_data.target.0 as usize].location().unwrap();
            let kind = try_data.handler_kind.unwrap();

            builder.add(ExceptionHandler { start, end, handler, kind });
        }

        self.code_block.exception_handlers = builder.finish();
    }

    fn finish(mut self) -> EmitResult<EmitFunctionResult<'a>> {
        debug_assert!(self
            .labels
            .iter()
            .all(|label| !label.has_unresolved_jumps()));

        if self.expression_too_deep {
            return Err(EmitError::ExpressionTooDeep);
        }

        self.code_block.is_strict = self.is_strict;
        self.code_block.is_builtin = self.is_builtin;
        self.code_block.is_constructor = self.is_constructor;
        self.code_block.constructor_kind = self.constructor_kind;
        self.code_block.num_vars = self.registers.num_vars();
        self.code_block.num_callee_registers = self.registers.num_callee_registers();
        self.code_block.instructions = self.writer.finish();
        self.code_block.constants = self.constant_table.finish();
        self.code_block.identifiers = self.identifier_table.finish();

        Ok(EmitFunctionResult {
            code_block: Rc::new(self.code_block),
            pending_functions: self.pending_functions,
        })
    }
}

#[derive(Clone, Copy, PartialEq)]
enum TdzRequirement {
    UnderTdz,
    NotUnderTdz,
}

#[derive(Clone, Copy, PartialEq)]
enum ScopeRegisterType {
    /// The scope register is a reclaimable block register.
    Block,
    /// The scope register is a permanent var.
    Var,
}

/// A switch case's table key.
enum SwitchCaseKey {
    Immediate(i32),
    Character(i32),
    String(Identifier),
}

/// Drives bytecode generation for a whole program: generates the root unit,
/// then works through the queue of nested functions it produced, patching
/// each finished code block into its parent's function table.
pub struct BytecodeProgramGenerator<'a> {
    cx: &'a Context,
    pending_functions_queue: VecDeque<PendingFunction<'a>>,
    /// All generated functions, collected when bytecode dumping is on.
    all_functions: Vec<Rc<CodeBlock>>,
}

struct PendingFunction<'a> {
    func: &'a ast::Function,
    parent_scope_tdz: IndexSet<Identifier>,
    parent: Rc<CodeBlock>,
    index: usize,
}

impl<'a> BytecodeProgramGenerator<'a> {
    pub fn new(cx: &'a Context) -> Self {
        Self {
            cx,
            pending_functions_queue: VecDeque::new(),
            all_functions: vec![],
        }
    }

    /// Generate bytecode for a parsed program. Returns the toplevel code
    /// block, with every nested function generated and linked in.
    pub fn generate_from_program(
        cx: &'a Context,
        program: &'a ast::Program,
    ) -> EmitResult<Rc<CodeBlock>> {
        let mut generator = Self::new(cx);

        let unit = BytecodeFunctionGenerator::new_for_program(cx, program);
        let result = unit.generate_program(program)?;
        let script_function = result.code_block.clone();

        generator.process_generated_unit(result);
        generator.generate_enqueued_functions()?;
        generator.dump_functions();

        Ok(script_function)
    }

    /// Generate bytecode for an eval unit, with the names under TDZ at the
    /// eval site.
    pub fn generate_from_eval(
        cx: &'a Context,
        eval: &'a ast::EvalNode,
        parent_scope_tdz: &IndexSet<Identifier>,
    ) -> EmitResult<Rc<CodeBlock>> {
        let mut generator = Self::new(cx);

        let unit = BytecodeFunctionGenerator::new_for_eval(cx, eval);
        let result = unit.generate_eval(eval, parent_scope_tdz)?;
        let eval_function = result.code_block.clone();

        generator.process_generated_unit(result);
        generator.generate_enqueued_functions()?;
        generator.dump_functions();

        Ok(eval_function)
    }

    /// Generate bytecode for a single function, e.g. from a lazily compiled
    /// function executable.
    pub fn generate_from_function(
        cx: &'a Context,
        func: &'a ast::Function,
    ) -> EmitResult<Rc<CodeBlock>> {
        Self::generate_from_function_with_tdz(cx, func, &IndexSet::new())
    }

    pub fn generate_from_function_with_tdz(
        cx: &'a Context,
        func: &'a ast::Function,
        parent_scope_tdz: &IndexSet<Identifier>,
    ) -> EmitResult<Rc<CodeBlock>> {
        let mut generator = Self::new(cx);

        let is_constructor = func.constructor_kind != ConstructorKind::None;
        let unit = BytecodeFunctionGenerator::new_for_function(cx, func, is_constructor)?;
        let result = unit.generate(func, parent_scope_tdz)?;
        let function = result.code_block.clone();

        generator.process_generated_unit(result);
        generator.generate_enqueued_functions()?;
        generator.dump_functions();

        Ok(function)
    }

    fn process_generated_unit(&mut self, result: EmitFunctionResult<'a>) {
        if self.cx.options.print_bytecode {
            self.all_functions.push(result.code_block.clone());
        }

        for pending in result.pending_functions {
            self.pending_functions_queue.push_back(PendingFunction {
                func: pending.func,
                parent_scope_tdz: pending.parent_scope_tdz,
                parent: result.code_block.clone(),
                index: pending.index,
            });
        }
    }

    fn generate_enqueued_functions(&mut self) -> EmitResult<()> {
        while let Some(pending) = self.pending_functions_queue.pop_front() {
            let is_constructor = pending.func.constructor_kind != ConstructorKind::None;
            let unit =
                BytecodeFunctionGenerator::new_for_function(self.cx, pending.func, is_constructor)?;
            let result = unit.generate(pending.func, &pending.parent_scope_tdz)?;

            pending.parent.functions.borrow_mut()[pending.index] =
                Some(result.code_block.clone());

            self.process_generated_unit(result);
        }

        Ok(())
    }

    fn dump_functions(&self) {
        for code_block in &self.all_functions {
            dump_code_block(code_block);
        }
    }
}
