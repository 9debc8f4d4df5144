//! AST node types consumed by the bytecode generator.
//!
//! These nodes are the output contract of an out of scope parser and analysis
//! pass: all identifiers are interned, and every scope-introducing node
//! carries the `VariableEnvironment` describing its statically known
//! declarations, with captured/const flags already computed.

use std::rc::Rc;

use indexmap::IndexSet;
use num_bigint::BigInt;

use crate::common::interner::Identifier;

use super::environment::VariableEnvironment;

/// A toplevel script.
pub struct Program {
    pub toplevels: Vec<Statement>,
    /// All `var` declarations in the program (hoisted functions excluded).
    pub var_declarations: VariableEnvironment,
    /// Toplevel `let`/`const` declarations.
    pub lexical_variables: VariableEnvironment,
    /// Hoisted toplevel function declarations, in source order.
    pub function_stack: Vec<Rc<Function>>,
    pub is_strict: bool,
}

/// The body of an `eval`.
pub struct EvalNode {
    pub toplevels: Vec<Statement>,
    pub var_declarations: VariableEnvironment,
    pub lexical_variables: VariableEnvironment,
    pub function_stack: Vec<Rc<Function>>,
    pub is_strict: bool,
    /// Whether the eval body itself contains a direct eval.
    pub uses_eval: bool,
}

#[derive(Clone, Copy, PartialEq)]
pub enum FunctionMode {
    Expression,
    Declaration,
}

#[derive(Clone, Copy, PartialEq)]
pub enum ConstructorKind {
    None,
    Base,
    Derived,
}

pub struct Function {
    pub name: Option<Identifier>,
    pub parameters: FunctionParameters,
    pub body: Vec<Statement>,
    /// `var` declarations in the body. Parameters and the callee name are not
    /// included.
    pub var_declarations: VariableEnvironment,
    /// Body-level `let`/`const` declarations.
    pub lexical_variables: VariableEnvironment,
    /// Hoisted function declarations in the body, in source order.
    pub function_stack: Vec<Rc<Function>>,
    /// Names referenced by nested closures.
    pub captured_variables: IndexSet<Identifier>,
    pub function_mode: FunctionMode,
    pub constructor_kind: ConstructorKind,
    pub is_strict: bool,
    pub is_builtin: bool,
    /// Whether the body references `arguments`.
    pub uses_arguments: bool,
    /// Whether the body contains a direct eval.
    pub uses_eval: bool,
    pub uses_this: bool,
}

impl Function {
    pub fn captures(&self, name: &Identifier) -> bool {
        self.captured_variables.contains(name)
    }

    pub fn has_captured_variables(&self) -> bool {
        !self.captured_variables.is_empty()
    }
}

pub struct FunctionParameters {
    pub params: Vec<FunctionParameter>,
}

pub struct FunctionParameter {
    pub pattern: Pattern,
    pub default_value: Option<Expression>,
}

impl FunctionParameters {
    pub fn empty() -> FunctionParameters {
        FunctionParameters { params: vec![] }
    }

    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn at(&self, i: usize) -> &FunctionParameter {
        &self.params[i]
    }

    pub fn has_default_parameter_values(&self) -> bool {
        self.params.iter().any(|param| param.default_value.is_some())
    }
}

pub enum Pattern {
    Id(Identifier),
    /// Array destructuring. `None` elements are elisions.
    Array(Vec<Option<Pattern>>),
}

impl Pattern {
    pub fn is_binding(&self) -> bool {
        matches!(self, Pattern::Id(_))
    }

    pub fn bound_name(&self) -> Option<&Identifier> {
        match self {
            Pattern::Id(name) => Some(name),
            Pattern::Array(_) => None,
        }
    }

    pub fn collect_bound_identifiers(&self, result: &mut Vec<Identifier>) {
        match self {
            Pattern::Id(name) => result.push(name.clone()),
            Pattern::Array(elements) => {
                for element in elements.iter().flatten() {
                    element.collect_bound_identifiers(result);
                }
            }
        }
    }
}

pub enum Statement {
    Block(Block),
    VariableDeclaration(VariableDeclaration),
    /// Hoisted function declarations are initialized at function entry; the
    /// statement itself emits nothing.
    FunctionDeclaration(Rc<Function>),
    Expression(Expression),
    If(IfStatement),
    While(WhileStatement),
    DoWhile(DoWhileStatement),
    For(ForStatement),
    ForIn(ForEachStatement),
    ForOf(ForEachStatement),
    Switch(SwitchStatement),
    Break(Option<Identifier>),
    Continue(Option<Identifier>),
    Return(Option<Expression>),
    Throw(Expression),
    Try(TryStatement),
    Labeled(LabeledStatement),
    With(WithStatement),
    Debugger,
    Empty,
}

pub struct Block {
    pub body: Vec<Statement>,
    pub lexical_variables: VariableEnvironment,
}

#[derive(Clone, Copy, PartialEq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

pub struct VariableDeclaration {
    pub kind: DeclarationKind,
    pub declarations: Vec<VariableDeclarator>,
}

pub struct VariableDeclarator {
    pub pattern: Pattern,
    pub init: Option<Expression>,
}

pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
}

pub struct DoWhileStatement {
    pub body: Box<Statement>,
    pub test: Expression,
}

pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
    /// `let`/`const` declared in the loop header.
    pub lexical_variables: VariableEnvironment,
}

pub enum ForInit {
    Declaration(VariableDeclaration),
    Expression(Expression),
}

/// Shared shape of for-in and for-of statements.
pub struct ForEachStatement {
    pub left: ForTarget,
    pub right: Expression,
    pub body: Box<Statement>,
    /// The loop variable's environment when declared with `let`/`const`.
    pub lexical_variables: VariableEnvironment,
}

pub enum ForTarget {
    /// `for (var/let/const x of ...)`
    Declaration(DeclarationKind, Identifier),
    /// `for (x of ...)` assigning to an existing binding.
    Identifier(Identifier),
}

impl ForTarget {
    pub fn name(&self) -> &Identifier {
        match self {
            ForTarget::Declaration(_, name) => name,
            ForTarget::Identifier(name) => name,
        }
    }
}

pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    pub lexical_variables: VariableEnvironment,
}

pub struct SwitchCase {
    /// `None` marks the default case.
    pub test: Option<Expression>,
    pub body: Vec<Statement>,
}

pub struct TryStatement {
    pub block: Block,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Block>,
}

pub struct CatchClause {
    pub param: Identifier,
    /// The catch scope's environment, containing exactly the parameter,
    /// marked as a let binding.
    pub environment: VariableEnvironment,
    pub body: Block,
}

pub struct LabeledStatement {
    pub label: Identifier,
    pub body: Box<Statement>,
}

pub struct WithStatement {
    pub object: Expression,
    pub body: Box<Statement>,
}

pub enum Expression {
    Null,
    Boolean(bool),
    Number(f64),
    String(Identifier),
    BigInt(Box<BigInt>),
    Template(TemplateLiteral),
    TaggedTemplate {
        tag: Box<Expression>,
        quasi: TemplateLiteral,
    },
    Id(Identifier),
    This,
    Array(Vec<Option<Expression>>),
    Object(Vec<ObjectProperty>),
    Function(Rc<Function>),
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Update {
        op: UpdateOperator,
        is_prefix: bool,
        target: AssignTarget,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Assign {
        /// Operator of a compound assignment, None for plain `=`.
        op: Option<BinaryOperator>,
        target: AssignTarget,
        value: Box<Expression>,
    },
    Sequence(Vec<Expression>),
    Member {
        object: Box<Expression>,
        property: MemberProperty,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    New {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
}

pub struct TemplateLiteral {
    pub quasis: Vec<TemplateElement>,
    pub expressions: Vec<Expression>,
}

pub struct TemplateElement {
    pub raw: Identifier,
    pub cooked: Identifier,
}

pub enum AssignTarget {
    Id(Identifier),
    Member {
        object: Box<Expression>,
        property: MemberProperty,
    },
}

pub enum MemberProperty {
    Id(Identifier),
    Computed(Box<Expression>),
}

pub struct ObjectProperty {
    pub key: PropertyKey,
    pub value: Expression,
}

pub enum PropertyKey {
    Id(Identifier),
    Computed(Box<Expression>),
}

#[derive(Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    LogicalNot,
    TypeOf,
    Void,
}

#[derive(Clone, Copy, PartialEq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

#[derive(Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    BitOr,
    BitAnd,
    BitXor,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    In,
    InstanceOf,
}

#[derive(Clone, Copy, PartialEq)]
pub enum LogicalOperator {
    And,
    Or,
}
