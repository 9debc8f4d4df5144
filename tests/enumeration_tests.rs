use pyrite::bytecode::instruction::OpCode;
use pyrite::parser::ast::{DeclarationKind, ForEachStatement, ForTarget, Statement};
use pyrite_harness::*;

fn for_of(cx: &pyrite::common::context::Context, name: &str, body: Statement) -> Statement {
    Statement::ForOf(ForEachStatement {
        left: ForTarget::Declaration(DeclarationKind::Let, cx.intern(name)),
        right: id(cx, "o"),
        body: Box::new(body),
        lexical_variables: let_env(cx, &[(name, false)]),
    })
}

fn for_in(cx: &pyrite::common::context::Context, name: &str, body: Statement) -> Statement {
    Statement::ForIn(ForEachStatement {
        left: ForTarget::Identifier(cx.intern(name)),
        right: id(cx, "o"),
        body: Box::new(body),
        lexical_variables: empty_env(),
    })
}

#[test]
fn for_of_lowers_to_the_iterator_protocol() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .param(&cx, "g")
        .body(vec![for_of(
            &cx,
            "v",
            block(empty_env(), vec![expr_stmt(call(id(&cx, "g"), vec![id(&cx, "v")]))]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    // Loads of Symbol.iterator, next, done, value, and two separate loads of
    // the return method: one for the throw path, one for the break path.
    let get_name = |n: usize| {
        let index = find_opcode(&code, OpCode::GetById, n).unwrap();
        code.identifier(operand(&code, index, 2) as u32).as_str().to_string()
    };

    let mut names = vec![];
    for n in 0..count_opcode(&code, OpCode::GetById) {
        names.push(get_name(n));
    }

    assert_eq!(names.iter().filter(|n| n.as_str() == "Symbol.iterator").count(), 1);
    assert_eq!(names.iter().filter(|n| n.as_str() == "next").count(), 1);
    assert_eq!(names.iter().filter(|n| n.as_str() == "done").count(), 1);
    assert_eq!(names.iter().filter(|n| n.as_str() == "value").count(), 1);

    // The close-on-throw and close-on-break sequences stay separate so that
    // return() is never observably called twice.
    assert_eq!(names.iter().filter(|n| n.as_str() == "return").count(), 2);

    // The body runs under a synthesized-finally handler, plus the handler
    // absorbing exceptions from the return() call itself.
    let handlers = code.exception_handlers().unwrap();
    assert!(handlers.len() >= 2);

    // The loop body rethrows the original exception on both close paths.
    assert_eq!(count_opcode(&code, OpCode::Throw), 2);
    assert_eq!(count_opcode(&code, OpCode::LoopHint), 1);

    // Iterator results are validated as objects: once for next() and once in
    // the break-path close. The throw path rethrows without the check.
    assert_eq!(count_opcode(&code, OpCode::IsObject), 2);
}

#[test]
fn for_in_lowers_to_enumerator_fast_paths() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .param(&cx, "g")
        .var(&cx, "k")
        .body(vec![for_in(
            &cx,
            "k",
            block(empty_env(), vec![expr_stmt(call(id(&cx, "g"), vec![id(&cx, "k")]))]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::GetEnumerableLength), 1);
    assert_eq!(count_opcode(&code, OpCode::GetPropertyEnumerator), 1);
    assert_eq!(count_opcode(&code, OpCode::HasIndexedProperty), 1);
    assert_eq!(count_opcode(&code, OpCode::HasStructureProperty), 1);
    assert_eq!(count_opcode(&code, OpCode::HasGenericProperty), 1);
    assert_eq!(count_opcode(&code, OpCode::EnumeratorStructurePname), 1);
    assert_eq!(count_opcode(&code, OpCode::EnumeratorGenericPname), 1);
    assert_eq!(count_opcode(&code, OpCode::ToIndexString), 1);

    // The body is emitted once per phase.
    assert_eq!(count_opcode(&code, OpCode::Call), 3);
    assert_eq!(count_opcode(&code, OpCode::LoopHint), 3);

    // Null and undefined subjects skip the whole loop.
    assert!(count_opcode(&code, OpCode::JEqNull) >= 1);
}

#[test]
fn for_in_body_accesses_rewrite_through_the_context() {
    let cx = new_context();

    // for (k in o) { y = o[k]; } - accesses keyed on the loop variable use
    // the raw index in the indexed phase and a direct pname load in the
    // structure phase.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .var(&cx, "k")
        .var(&cx, "y")
        .body(vec![for_in(
            &cx,
            "k",
            block(
                empty_env(),
                vec![expr_stmt(assign(&cx, "y", index(id(&cx, "o"), id(&cx, "k"))))],
            ),
        )])
        .build();
    let code = compile_function(&cx, &func);

    // Structure phase: direct pname load. Indexed phase: get_by_val against
    // the index register. Generic phase: plain get_by_val on the key.
    assert_eq!(count_opcode(&code, OpCode::GetDirectPname), 1);
    assert_eq!(count_opcode(&code, OpCode::GetByVal), 2);
}

#[test]
fn reassigning_the_loop_variable_invalidates_the_context() {
    let cx = new_context();

    // for (k in o) { k = 1; y = o[k]; } - after the reassignment the fast
    // paths no longer apply.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .var(&cx, "k")
        .var(&cx, "y")
        .body(vec![for_in(
            &cx,
            "k",
            block(
                empty_env(),
                vec![
                    expr_stmt(assign(&cx, "k", num(1.0))),
                    expr_stmt(assign(&cx, "y", index(id(&cx, "o"), id(&cx, "k")))),
                ],
            ),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::GetDirectPname), 0);
    assert_eq!(count_opcode(&code, OpCode::GetByVal), 3);
}

#[test]
fn break_reaches_the_close_without_a_replay() {
    let cx = new_context();

    // A break targeting the for-of itself falls through to the loop footer's
    // close sequence; no replay is needed, so `return` is loaded exactly
    // twice (throw path and footer).
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .body(vec![for_of(
            &cx,
            "v",
            block(empty_env(), vec![Statement::Break(None)]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_return_loads(&code), 2);
}

#[test]
fn return_from_the_body_replays_the_iterator_close() {
    let cx = new_context();

    // A return inside the body must close the iterator on the way out,
    // adding a third close sequence beyond the throw path and the footer.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .body(vec![for_of(
            &cx,
            "v",
            block(empty_env(), vec![Statement::Return(None)]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_return_loads(&code), 3);
}

fn count_return_loads(code: &pyrite::bytecode::function::CodeBlock) -> usize {
    let mut return_loads = 0;
    for n in 0..count_opcode(code, OpCode::GetById) {
        let index = find_opcode(code, OpCode::GetById, n).unwrap();
        if code.identifier(operand(code, index, 2) as u32).as_str() == "return" {
            return_loads += 1;
        }
    }
    return_loads
}

#[test]
fn captured_loop_bindings_get_a_fresh_environment_per_iteration() {
    let cx = new_context();

    // for (let i = 0; i < n; i = i + 1) { capture i } - each iteration
    // copies the captured header binding into a fresh environment.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "n")
        .captures(&cx, "i")
        .inner_function(stub_function(&cx, "g"))
        .body(vec![Statement::For(pyrite::parser::ast::ForStatement {
            init: Some(pyrite::parser::ast::ForInit::Declaration(
                pyrite::parser::ast::VariableDeclaration {
                    kind: DeclarationKind::Let,
                    declarations: vec![pyrite::parser::ast::VariableDeclarator {
                        pattern: pyrite::parser::ast::Pattern::Id(cx.intern("i")),
                        init: Some(num(0.0)),
                    }],
                },
            )),
            test: Some(binary(
                pyrite::parser::ast::BinaryOperator::Less,
                id(&cx, "i"),
                id(&cx, "n"),
            )),
            update: Some(assign(
                &cx,
                "i",
                binary(pyrite::parser::ast::BinaryOperator::Add, id(&cx, "i"), num(1.0)),
            )),
            body: Box::new(block(empty_env(), vec![])),
            lexical_variables: let_env(&cx, &[("i", true)]),
        })])
        .build();
    let code = compile_function(&cx, &func);

    // One environment for the function's activation, one for the loop header
    // at entry, and one allocated per iteration at the continue point.
    assert_eq!(count_opcode(&code, OpCode::CreateLexicalEnvironment), 3);
    assert_eq!(count_opcode(&code, OpCode::GetParentScope), 2);
    assert!(count_opcode(&code, OpCode::GetFromScope) >= 2);
}
