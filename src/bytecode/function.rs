use std::cell::RefCell;
use std::rc::Rc;

use crate::common::interner::Identifier;
use crate::debug_print::{DebugPrint, DebugPrinter};
use crate::parser::ast::ConstructorKind;

use super::constant_table::ConstantValue;
use super::exception_handlers::ExceptionHandlers;
use super::instruction::debug_format_instructions;
use super::jump_tables::{SimpleJumpTable, StringJumpTable};
use super::operand::VirtualRegister;
use super::symbol_table::SymbolTable;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum CodeType {
    Program,
    Function,
    Eval,
}

/// The compiled form of one program, function, or eval unit: the instruction
/// stream plus every metadata table the interpreter needs to link and run it.
pub struct CodeBlock {
    pub(crate) name: Option<Identifier>,
    pub(crate) code_type: CodeType,
    pub(crate) is_strict: bool,
    pub(crate) is_builtin: bool,
    pub(crate) is_constructor: bool,
    pub(crate) constructor_kind: ConstructorKind,

    /// Number of parameter slots, including the receiver.
    pub(crate) num_parameters: u32,
    /// Number of non-temporary local registers allocated at entry.
    pub(crate) num_vars: u32,
    /// High water mark of local registers, aligned for the stack frame.
    pub(crate) num_callee_registers: u32,

    pub(crate) this_register: VirtualRegister,
    pub(crate) scope_register: Option<VirtualRegister>,
    /// Register of the function's heap activation, if one is allocated.
    pub(crate) activation_register: Option<VirtualRegister>,
    pub(crate) arguments_register: Option<VirtualRegister>,
    pub(crate) new_target_register: Option<VirtualRegister>,

    pub(crate) instructions: Vec<i32>,
    pub(crate) constants: Vec<ConstantValue>,
    pub(crate) identifiers: Vec<Identifier>,
    pub(crate) exception_handlers: Option<ExceptionHandlers>,
    pub(crate) switch_jump_tables: Vec<SimpleJumpTable>,
    pub(crate) string_switch_jump_tables: Vec<StringJumpTable>,
    /// Instruction indices that are jump targets, in ascending order.
    pub(crate) jump_targets: Vec<usize>,

    /// Per-scope symbol tables for runtime scope chain resolution. Shared
    /// with the constant pool entries that reference them.
    pub(crate) symbol_tables: Vec<Rc<RefCell<SymbolTable>>>,

    /// Nested functions, in the order their creation sites were reached.
    /// Slots are filled by the program generator after this unit finishes.
    pub(crate) functions: RefCell<Vec<Option<Rc<CodeBlock>>>>,
    /// For eval units: function table indices of toplevel declarations that
    /// the runtime hoists into the variable environment.
    pub(crate) function_decls: Vec<u32>,
    /// For program and eval units: the var declarations the runtime hoists.
    pub(crate) variable_declarations: Vec<Identifier>,

    pub(crate) num_value_profiles: u32,
    pub(crate) num_object_allocation_profiles: u32,
    pub(crate) num_array_allocation_profiles: u32,
}

impl CodeBlock {
    pub(crate) fn new(name: Option<Identifier>, code_type: CodeType) -> CodeBlock {
        CodeBlock {
            name,
            code_type,
            is_strict: false,
            is_builtin: false,
            is_constructor: false,
            constructor_kind: ConstructorKind::None,
            num_parameters: 0,
            num_vars: 0,
            num_callee_registers: 0,
            this_register: VirtualRegister::this(),
            scope_register: None,
            activation_register: None,
            arguments_register: None,
            new_target_register: None,
            instructions: vec![],
            constants: vec![],
            identifiers: vec![],
            exception_handlers: None,
            switch_jump_tables: vec![],
            string_switch_jump_tables: vec![],
            jump_targets: vec![],
            symbol_tables: vec![],
            functions: RefCell::new(vec![]),
            function_decls: vec![],
            variable_declarations: vec![],
            num_value_profiles: 0,
            num_object_allocation_profiles: 0,
            num_array_allocation_profiles: 0,
        }
    }

    pub fn name(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }

    pub fn code_type(&self) -> CodeType {
        self.code_type
    }

    pub fn is_strict(&self) -> bool {
        self.is_strict
    }

    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    pub fn constructor_kind(&self) -> ConstructorKind {
        self.constructor_kind
    }

    pub fn num_parameters(&self) -> u32 {
        self.num_parameters
    }

    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }

    pub fn num_callee_registers(&self) -> u32 {
        self.num_callee_registers
    }

    pub fn scope_register(&self) -> Option<VirtualRegister> {
        self.scope_register
    }

    pub fn activation_register(&self) -> Option<VirtualRegister> {
        self.activation_register
    }

    pub fn arguments_register(&self) -> Option<VirtualRegister> {
        self.arguments_register
    }

    pub fn instructions(&self) -> &[i32] {
        &self.instructions
    }

    pub fn constants(&self) -> &[ConstantValue] {
        &self.constants
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    pub fn identifier(&self, index: u32) -> &Identifier {
        &self.identifiers[index as usize]
    }

    pub fn exception_handlers(&self) -> Option<&ExceptionHandlers> {
        self.exception_handlers.as_ref()
    }

    pub fn switch_jump_tables(&self) -> &[SimpleJumpTable] {
        &self.switch_jump_tables
    }

    pub fn string_switch_jump_tables(&self) -> &[StringJumpTable] {
        &self.string_switch_jump_tables
    }

    pub fn jump_targets(&self) -> &[usize] {
        &self.jump_targets
    }

    pub fn symbol_tables(&self) -> &[Rc<RefCell<SymbolTable>>] {
        &self.symbol_tables
    }

    pub fn num_functions(&self) -> usize {
        self.functions.borrow().len()
    }

    pub fn function(&self, index: usize) -> Option<Rc<CodeBlock>> {
        self.functions.borrow()[index].clone()
    }

    pub fn function_decls(&self) -> &[u32] {
        &self.function_decls
    }

    pub fn variable_declarations(&self) -> &[Identifier] {
        &self.variable_declarations
    }

    pub fn num_value_profiles(&self) -> u32 {
        self.num_value_profiles
    }
}

impl DebugPrint for CodeBlock {
    fn debug_format(&self, printer: &mut DebugPrinter) {
        let name = match &self.name {
            Some(name) => name.as_str(),
            None => "<anonymous>",
        };

        printer.write(&format!("{:?} {}(", self.code_type, name));
        printer.write(&format!(
            "params: {}, vars: {}, registers: {})\n",
            self.num_parameters, self.num_vars, self.num_callee_registers
        ));

        printer.inc_indent();
        debug_format_instructions(&self.instructions, printer);

        if !self.constants.is_empty() {
            printer.write_indent();
            printer.write("Constants:\n");
            printer.inc_indent();
            for (i, constant) in self.constants.iter().enumerate() {
                printer.write_indent();
                let value = match constant {
                    ConstantValue::Undefined => "undefined".to_string(),
                    ConstantValue::Null => "null".to_string(),
                    ConstantValue::Empty => "<empty>".to_string(),
                    ConstantValue::Bool(value) => value.to_string(),
                    ConstantValue::Number(value) => value.to_string(),
                    ConstantValue::String(value) => format!("{:?}", value.as_str()),
                    ConstantValue::BigInt(value) => format!("{}n", value),
                    ConstantValue::TemplateKey(_) => "<template key>".to_string(),
                    ConstantValue::SymbolTable(_) => "<symbol table>".to_string(),
                };
                printer.write(&format!("c{}: {}\n", i, value));
            }
            printer.dec_indent();
        }

        if let Some(handlers) = &self.exception_handlers {
            printer.write_indent();
            handlers.debug_format(printer);
        }

        printer.dec_indent();
    }
}

/// Dump a compiled code block to stdout.
pub fn dump_code_block(code_block: &CodeBlock) {
    let mut printer = DebugPrinter::new();
    code_block.debug_format(&mut printer);
    println!("{}", printer.finish());
}
