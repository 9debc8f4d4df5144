use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use pyrite::bytecode::generator::BytecodeProgramGenerator;
use pyrite::common::context::{Context, ContextBuilder};
use pyrite::parser::ast::*;
use pyrite::parser::environment::VariableEnvironment;

fn id(cx: &Context, name: &str) -> Expression {
    Expression::Id(cx.intern(name))
}

fn add(left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op: BinaryOperator::Add,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// A function with a loop, comparisons, calls, and a try/finally: enough to
/// exercise registers, labels, peephole fusion, and the handler table.
fn build_function(cx: &Context) -> Rc<Function> {
    let mut var_declarations = VariableEnvironment::new();
    var_declarations.add(cx.intern("total")).set_is_var();
    var_declarations.add(cx.intern("i")).set_is_var();

    let loop_body = Statement::Block(Block {
        body: vec![
            Statement::Expression(Expression::Assign {
                op: None,
                target: AssignTarget::Id(cx.intern("total")),
                value: Box::new(add(id(cx, "total"), id(cx, "i"))),
            }),
            Statement::Expression(Expression::Assign {
                op: None,
                target: AssignTarget::Id(cx.intern("i")),
                value: Box::new(add(id(cx, "i"), Expression::Number(1.0))),
            }),
        ],
        lexical_variables: VariableEnvironment::new(),
    });

    let loop_stmt = Statement::While(WhileStatement {
        test: Expression::Binary {
            op: BinaryOperator::Less,
            left: Box::new(id(cx, "i")),
            right: Box::new(id(cx, "n")),
        },
        body: Box::new(loop_body),
    });

    let try_stmt = Statement::Try(TryStatement {
        block: Block { body: vec![loop_stmt], lexical_variables: VariableEnvironment::new() },
        handler: None,
        finalizer: Some(Block {
            body: vec![Statement::Expression(Expression::Call {
                callee: Box::new(id(cx, "report")),
                arguments: vec![id(cx, "total")],
            })],
            lexical_variables: VariableEnvironment::new(),
        }),
    });

    Rc::new(Function {
        name: Some(cx.intern("sum")),
        parameters: FunctionParameters {
            params: vec![
                FunctionParameter { pattern: Pattern::Id(cx.intern("n")), default_value: None },
                FunctionParameter {
                    pattern: Pattern::Id(cx.intern("report")),
                    default_value: None,
                },
            ],
        },
        body: vec![try_stmt, Statement::Return(Some(id(cx, "total")))],
        var_declarations,
        lexical_variables: VariableEnvironment::new(),
        function_stack: vec![],
        captured_variables: indexmap::IndexSet::new(),
        function_mode: FunctionMode::Declaration,
        constructor_kind: ConstructorKind::None,
        is_strict: false,
        is_builtin: false,
        uses_arguments: false,
        uses_eval: false,
        uses_this: false,
    })
}

fn generate_benchmarks(criterion: &mut Criterion) {
    let cx = ContextBuilder::new().build();
    let func = build_function(&cx);

    criterion.bench_function("generate_function", |bencher| {
        bencher.iter_batched(
            || (),
            |_| BytecodeProgramGenerator::generate_from_function(&cx, &func).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, generate_benchmarks);
criterion_main!(benches);
