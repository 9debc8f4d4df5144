//! Helpers for constructing analyzed AST fragments by hand and inspecting
//! generated bytecode in tests.

use std::rc::Rc;

use indexmap::IndexSet;

use pyrite::bytecode::function::CodeBlock;
use pyrite::bytecode::generator::BytecodeProgramGenerator;
use pyrite::bytecode::instruction::{InstructionIterator, OpCode};
use pyrite::common::context::{Context, ContextBuilder};
use pyrite::common::interner::Identifier;
use pyrite::parser::ast::*;
use pyrite::parser::environment::VariableEnvironment;

pub fn new_context() -> Context {
    ContextBuilder::new().build()
}

/*
 * Expression builders
 */

pub fn num(value: f64) -> Expression {
    Expression::Number(value)
}

pub fn string(cx: &Context, value: &str) -> Expression {
    Expression::String(cx.intern(value))
}

pub fn id(cx: &Context, name: &str) -> Expression {
    Expression::Id(cx.intern(name))
}

pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary { op, left: Box::new(left), right: Box::new(right) }
}

pub fn unary(op: UnaryOperator, operand: Expression) -> Expression {
    Expression::Unary { op, operand: Box::new(operand) }
}

pub fn assign(cx: &Context, name: &str, value: Expression) -> Expression {
    Expression::Assign {
        op: None,
        target: AssignTarget::Id(cx.intern(name)),
        value: Box::new(value),
    }
}

pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call { callee: Box::new(callee), arguments }
}

pub fn member(object: Expression, cx: &Context, property: &str) -> Expression {
    Expression::Member {
        object: Box::new(object),
        property: MemberProperty::Id(cx.intern(property)),
    }
}

pub fn index(object: Expression, property: Expression) -> Expression {
    Expression::Member {
        object: Box::new(object),
        property: MemberProperty::Computed(Box::new(property)),
    }
}

/*
 * Statement builders
 */

pub fn expr_stmt(expr: Expression) -> Statement {
    Statement::Expression(expr)
}

pub fn return_stmt(expr: Expression) -> Statement {
    Statement::Return(Some(expr))
}

pub fn if_stmt(test: Expression, consequent: Statement) -> Statement {
    Statement::If(IfStatement {
        test,
        consequent: Box::new(consequent),
        alternate: None,
    })
}

pub fn while_stmt(test: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement { test, body: Box::new(body) })
}

pub fn block(lexical_variables: VariableEnvironment, body: Vec<Statement>) -> Statement {
    Statement::Block(Block { body, lexical_variables })
}

pub fn decl_stmt(kind: DeclarationKind, cx: &Context, name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration {
        kind,
        declarations: vec![VariableDeclarator { pattern: Pattern::Id(cx.intern(name)), init }],
    })
}

/*
 * Environment builders
 */

pub fn empty_env() -> VariableEnvironment {
    VariableEnvironment::new()
}

/// Build an environment of let bindings, optionally captured.
pub fn let_env(cx: &Context, names: &[(&str, bool)]) -> VariableEnvironment {
    let mut environment = VariableEnvironment::new();
    for (name, captured) in names {
        let entry = environment.add(cx.intern(name));
        entry.set_is_let();
        if *captured {
            entry.set_is_captured();
        }
    }
    environment
}

pub fn const_env(cx: &Context, names: &[(&str, bool)]) -> VariableEnvironment {
    let mut environment = VariableEnvironment::new();
    for (name, captured) in names {
        let entry = environment.add(cx.intern(name));
        entry.set_is_const();
        if *captured {
            entry.set_is_captured();
        }
    }
    environment
}

/*
 * Function builder
 */

pub struct FunctionBuilder {
    name: Option<Identifier>,
    parameters: Vec<FunctionParameter>,
    body: Vec<Statement>,
    var_declarations: VariableEnvironment,
    lexical_variables: VariableEnvironment,
    function_stack: Vec<Rc<Function>>,
    captured_variables: IndexSet<Identifier>,
    function_mode: FunctionMode,
    constructor_kind: ConstructorKind,
    is_strict: bool,
    uses_arguments: bool,
    uses_eval: bool,
    uses_this: bool,
}

impl FunctionBuilder {
    pub fn new(cx: &Context, name: &str) -> FunctionBuilder {
        FunctionBuilder {
            name: Some(cx.intern(name)),
            parameters: vec![],
            body: vec![],
            var_declarations: VariableEnvironment::new(),
            lexical_variables: VariableEnvironment::new(),
            function_stack: vec![],
            captured_variables: IndexSet::new(),
            function_mode: FunctionMode::Declaration,
            constructor_kind: ConstructorKind::None,
            is_strict: false,
            uses_arguments: false,
            uses_eval: false,
            uses_this: false,
        }
    }

    pub fn param(mut self, cx: &Context, name: &str) -> Self {
        self.parameters.push(FunctionParameter {
            pattern: Pattern::Id(cx.intern(name)),
            default_value: None,
        });
        self
    }

    pub fn param_with_default(mut self, cx: &Context, name: &str, default_value: Expression) -> Self {
        self.parameters.push(FunctionParameter {
            pattern: Pattern::Id(cx.intern(name)),
            default_value: Some(default_value),
        });
        self
    }

    pub fn body(mut self, body: Vec<Statement>) -> Self {
        self.body = body;
        self
    }

    pub fn var(mut self, cx: &Context, name: &str) -> Self {
        self.var_declarations.add(cx.intern(name)).set_is_var();
        self
    }

    pub fn lexical(mut self, environment: VariableEnvironment) -> Self {
        self.lexical_variables = environment;
        self
    }

    /// Mark a name as captured by a nested closure.
    pub fn captures(mut self, cx: &Context, name: &str) -> Self {
        self.captured_variables.insert(cx.intern(name));
        self
    }

    pub fn inner_function(mut self, func: Rc<Function>) -> Self {
        self.function_stack.push(func);
        self
    }

    pub fn expression_mode(mut self) -> Self {
        self.function_mode = FunctionMode::Expression;
        self
    }

    pub fn strict(mut self) -> Self {
        self.is_strict = true;
        self
    }

    pub fn uses_arguments(mut self) -> Self {
        self.uses_arguments = true;
        self
    }

    pub fn uses_eval(mut self) -> Self {
        self.uses_eval = true;
        self
    }

    pub fn uses_this(mut self) -> Self {
        self.uses_this = true;
        self
    }

    pub fn constructor_kind(mut self, kind: ConstructorKind) -> Self {
        self.constructor_kind = kind;
        self
    }

    pub fn build(self) -> Rc<Function> {
        Rc::new(Function {
            name: self.name,
            parameters: FunctionParameters { params: self.parameters },
            body: self.body,
            var_declarations: self.var_declarations,
            lexical_variables: self.lexical_variables,
            function_stack: self.function_stack,
            captured_variables: self.captured_variables,
            function_mode: self.function_mode,
            constructor_kind: self.constructor_kind,
            is_strict: self.is_strict,
            is_builtin: false,
            uses_arguments: self.uses_arguments,
            uses_eval: self.uses_eval,
            uses_this: self.uses_this,
        })
    }
}

/// An inner function with the given name and no body, for capture tests.
pub fn stub_function(cx: &Context, name: &str) -> Rc<Function> {
    FunctionBuilder::new(cx, name).build()
}

/*
 * Compilation and inspection
 */

pub fn compile_function(cx: &Context, func: &Rc<Function>) -> Rc<CodeBlock> {
    BytecodeProgramGenerator::generate_from_function(cx, func).unwrap()
}

pub fn compile_program(cx: &Context, program: &Program) -> Rc<CodeBlock> {
    BytecodeProgramGenerator::generate_from_program(cx, program).unwrap()
}

pub fn simple_program(toplevels: Vec<Statement>) -> Program {
    Program {
        toplevels,
        var_declarations: VariableEnvironment::new(),
        lexical_variables: VariableEnvironment::new(),
        function_stack: vec![],
        is_strict: false,
    }
}

/// All opcodes of a code block in stream order, with their instruction start
/// indices.
pub fn instructions(code_block: &CodeBlock) -> Vec<(OpCode, usize)> {
    InstructionIterator::new(code_block.instructions()).collect()
}

pub fn opcodes(code_block: &CodeBlock) -> Vec<OpCode> {
    instructions(code_block).into_iter().map(|(opcode, _)| opcode).collect()
}

pub fn count_opcode(code_block: &CodeBlock, opcode: OpCode) -> usize {
    opcodes(code_block).into_iter().filter(|op| *op == opcode).count()
}

/// Instruction start index of the nth occurrence of an opcode.
pub fn find_opcode(code_block: &CodeBlock, opcode: OpCode, n: usize) -> Option<usize> {
    instructions(code_block)
        .into_iter()
        .filter(|(op, _)| *op == opcode)
        .map(|(_, index)| index)
        .nth(n)
}

/// Raw operand word of the instruction starting at `instruction_index`.
pub fn operand(code_block: &CodeBlock, instruction_index: usize, operand_index: usize) -> i32 {
    code_block.instructions()[instruction_index + 1 + operand_index]
}
