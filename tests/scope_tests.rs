use pyrite::bytecode::instruction::{OpCode, ResolveType};
use pyrite::parser::ast::{DeclarationKind, Statement, WithStatement};
use pyrite_harness::*;

#[test]
fn uncaptured_block_bindings_live_on_the_stack() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .body(vec![block(
            let_env(&cx, &[("x", false)]),
            vec![
                decl_stmt(DeclarationKind::Let, &cx, "x", Some(num(1.0))),
                expr_stmt(id(&cx, "x")),
            ],
        )])
        .build();
    let code = compile_function(&cx, &func);

    // No heap scope is allocated and no scope loads are needed.
    assert_eq!(count_opcode(&code, OpCode::CreateLexicalEnvironment), 0);
    assert_eq!(count_opcode(&code, OpCode::GetFromScope), 0);
    assert_eq!(count_opcode(&code, OpCode::PutToScope), 0);
}

#[test]
fn captured_block_bindings_share_one_heap_scope() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .captures(&cx, "x")
        .captures(&cx, "y")
        .inner_function(stub_function(&cx, "g"))
        .body(vec![block(
            let_env(&cx, &[("x", true), ("y", true)]),
            vec![
                decl_stmt(DeclarationKind::Let, &cx, "x", Some(num(1.0))),
                decl_stmt(DeclarationKind::Let, &cx, "y", Some(num(2.0))),
                expr_stmt(id(&cx, "x")),
            ],
        )])
        .build();
    let code = compile_function(&cx, &func);

    // One environment allocation covers both captured bindings (the other
    // allocation is the function's own activation), and reads compile to
    // scope loads.
    assert_eq!(count_opcode(&code, OpCode::CreateLexicalEnvironment), 2);
    assert!(count_opcode(&code, OpCode::GetFromScope) >= 1);
    assert!(count_opcode(&code, OpCode::PutToScope) >= 2);
    assert_eq!(code.symbol_tables().last().unwrap().borrow().scope_size(), 2);
}

#[test]
fn tdz_check_before_initialization_only() {
    let cx = new_context();

    // Reading x before its initialization needs a TDZ check; after the
    // statically-proven initialization the check is lifted.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "y")
        .body(vec![block(
            let_env(&cx, &[("x", false)]),
            vec![
                expr_stmt(assign(&cx, "y", id(&cx, "x"))),
                decl_stmt(DeclarationKind::Let, &cx, "x", Some(num(1.0))),
                expr_stmt(assign(&cx, "y", id(&cx, "x"))),
            ],
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::CheckTdz), 1);

    // The check precedes the initializing store.
    let check = find_opcode(&code, OpCode::CheckTdz, 0).unwrap();
    let last_mov = find_opcode(&code, OpCode::Mov, count_opcode(&code, OpCode::Mov) - 1).unwrap();
    assert!(check < last_mov);
}

#[test]
fn stack_tdz_bindings_are_prefilled_with_the_sentinel() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .body(vec![block(
            let_env(&cx, &[("x", false)]),
            vec![decl_stmt(DeclarationKind::Let, &cx, "x", Some(num(1.0)))],
        )])
        .build();
    let code = compile_function(&cx, &func);

    // Some mov stores the empty sentinel constant into the binding's
    // register before its initialization.
    let has_sentinel_store = (0..count_opcode(&code, OpCode::Mov)).any(|n| {
        let mov = find_opcode(&code, OpCode::Mov, n).unwrap();
        let src = pyrite::bytecode::operand::VirtualRegister::decode(operand(&code, mov, 1));
        src.is_constant()
            && matches!(
                code.constants()[src.constant_index()],
                pyrite::bytecode::constant_table::ConstantValue::Empty
            )
    });
    assert!(has_sentinel_store);
}

#[test]
fn const_assignment_compiles_to_a_throw() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .body(vec![block(
            const_env(&cx, &[("x", false)]),
            vec![
                decl_stmt(DeclarationKind::Const, &cx, "x", Some(num(1.0))),
                expr_stmt(assign(&cx, "x", num(2.0))),
            ],
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::ThrowStaticError), 1);
}

#[test]
fn with_scope_forces_dynamic_resolution() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "o")
        .param(&cx, "x")
        .body(vec![Statement::With(WithStatement {
            object: id(&cx, "o"),
            body: Box::new(expr_stmt(id(&cx, "x"))),
        })])
        .build();
    let code = compile_function(&cx, &func);

    // Even though x is a parameter, the read inside the with block must go
    // through a fully dynamic scope walk.
    assert_eq!(count_opcode(&code, OpCode::PushWithScope), 1);
    let resolve = find_opcode(&code, OpCode::ResolveScope, 0).unwrap();
    assert_eq!(operand(&code, resolve, 3) as u32, ResolveType::Dynamic as u32);
    assert_eq!(count_opcode(&code, OpCode::GetFromScope), 1);
}

#[test]
fn unresolved_names_use_the_global_resolve_type() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .body(vec![expr_stmt(id(&cx, "g"))])
        .build();
    let code = compile_function(&cx, &func);

    let resolve = find_opcode(&code, OpCode::ResolveScope, 0).unwrap();
    assert_eq!(
        operand(&code, resolve, 3) as u32,
        ResolveType::GlobalProperty as u32
    );
}

#[test]
fn non_strict_eval_escalates_the_resolve_type() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .uses_eval()
        .body(vec![expr_stmt(id(&cx, "g"))])
        .build();
    let code = compile_function(&cx, &func);

    let resolve = find_opcode(&code, OpCode::ResolveScope, 0).unwrap();
    assert_eq!(
        operand(&code, resolve, 3) as u32,
        ResolveType::GlobalPropertyWithVarInjectionChecks as u32
    );
}

#[test]
fn non_strict_function_name_writes_are_silently_dropped() {
    let cx = new_context();

    // A named function expression's self binding: non-strict writes evaluate
    // the right hand side but store nothing and throw nothing.
    let func = FunctionBuilder::new(&cx, "f")
        .expression_mode()
        .captures(&cx, "f")
        .inner_function(stub_function(&cx, "g"))
        .body(vec![expr_stmt(assign(&cx, "f", num(1.0)))])
        .build();
    let code = compile_function(&cx, &func);

    // Exactly one put_to_scope: the entry self binding store.
    assert_eq!(count_opcode(&code, OpCode::PutToScope), 1);
    assert_eq!(count_opcode(&code, OpCode::ThrowStaticError), 0);
}

#[test]
fn strict_function_name_writes_throw() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .expression_mode()
        .strict()
        .captures(&cx, "f")
        .inner_function(stub_function(&cx, "g"))
        .body(vec![expr_stmt(assign(&cx, "f", num(1.0)))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::PutToScope), 1);
    assert_eq!(count_opcode(&code, OpCode::ThrowStaticError), 1);
}

#[test]
fn catch_parameter_gets_its_own_scope() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "g")
        .body(vec![Statement::Try(pyrite::parser::ast::TryStatement {
            block: pyrite::parser::ast::Block {
                body: vec![expr_stmt(call(id(&cx, "g"), vec![]))],
                lexical_variables: empty_env(),
            },
            handler: Some(pyrite::parser::ast::CatchClause {
                param: cx.intern("e"),
                environment: let_env(&cx, &[("e", true)]),
                body: pyrite::parser::ast::Block {
                    body: vec![expr_stmt(id(&cx, "e"))],
                    lexical_variables: empty_env(),
                },
            }),
            finalizer: None,
        })])
        .build();
    let code = compile_function(&cx, &func);

    // The catch scope is materialized, the parameter stored into it, and the
    // handler table records the catch range.
    assert_eq!(count_opcode(&code, OpCode::Catch), 1);
    assert_eq!(count_opcode(&code, OpCode::CreateLexicalEnvironment), 1);
    let handlers = code.exception_handlers().unwrap();
    assert_eq!(handlers.len(), 1);
    let handler = handlers.iter().next().unwrap();
    assert!(handler.start < handler.end);
    assert!(handler.handler >= handler.end);
}
