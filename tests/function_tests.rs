use pyrite::bytecode::instruction::OpCode;
use pyrite::bytecode::operand::VirtualRegister;
use pyrite::parser::ast::ConstructorKind;
use pyrite_harness::*;

#[test]
fn plain_arguments_use_direct_arguments() {
    let cx = new_context();

    // function f(a, b) { return arguments; } with nothing captured.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "a")
        .param(&cx, "b")
        .uses_arguments()
        .body(vec![return_stmt(id(&cx, "arguments"))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::CreateDirectArguments), 1);
    assert_eq!(count_opcode(&code, OpCode::CreateScopedArguments), 0);
    assert_eq!(count_opcode(&code, OpCode::CreateOutOfBandArguments), 0);
    assert!(code.arguments_register().is_some());
}

#[test]
fn captured_parameter_forces_scoped_arguments() {
    let cx = new_context();

    // function f(a) { function g() { return a; } return arguments; }
    let inner = FunctionBuilder::new(&cx, "g")
        .body(vec![return_stmt(id(&cx, "a"))])
        .build();
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "a")
        .uses_arguments()
        .captures(&cx, "a")
        .inner_function(inner)
        .body(vec![return_stmt(id(&cx, "arguments"))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::CreateScopedArguments), 1);
    assert_eq!(count_opcode(&code, OpCode::CreateDirectArguments), 0);

    // The parameter is lifted into the heap scope before the arguments
    // object is created.
    let lift = find_opcode(&code, OpCode::PutToScope, 0).unwrap();
    let scoped = find_opcode(&code, OpCode::CreateScopedArguments, 0).unwrap();
    assert!(lift < scoped);
    assert_eq!(
        VirtualRegister::decode(operand(&code, lift, 2)),
        VirtualRegister::parameter(0)
    );

    // The symbol table records the argument-to-scope-offset mapping.
    let function_table = &code.symbol_tables()[0];
    assert_eq!(function_table.borrow().arguments_length(), Some(1));
    assert_eq!(function_table.borrow().argument_offsets(), &[0]);
}

#[test]
fn strict_mode_uses_out_of_band_arguments() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "a")
        .strict()
        .uses_arguments()
        .body(vec![return_stmt(id(&cx, "arguments"))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::CreateOutOfBandArguments), 1);
    assert_eq!(count_opcode(&code, OpCode::CreateDirectArguments), 0);
    assert_eq!(count_opcode(&code, OpCode::CreateScopedArguments), 0);
}

#[test]
fn default_parameters_use_out_of_band_arguments() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "f")
        .param_with_default(&cx, "a", num(1.0))
        .uses_arguments()
        .body(vec![return_stmt(id(&cx, "arguments"))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::CreateOutOfBandArguments), 1);
    assert_eq!(count_opcode(&code, OpCode::CreateDirectArguments), 0);
}

#[test]
fn hoisted_function_overrides_arguments() {
    let cx = new_context();

    // function f(arguments) { function arguments() {} return arguments; }
    // The hoisted function must win: it is initialized after the arguments
    // object.
    let inner = FunctionBuilder::new(&cx, "arguments").build();
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "arguments")
        .uses_arguments()
        .inner_function(inner)
        .body(vec![return_stmt(id(&cx, "arguments"))])
        .build();
    let code = compile_function(&cx, &func);

    let create_arguments = find_opcode(&code, OpCode::CreateDirectArguments, 0).unwrap();
    let new_function = find_opcode(&code, OpCode::NewFunction, 0).unwrap();
    assert!(create_arguments < new_function);

    // The binding finally holds the closure, stored after both.
    let movs = count_opcode(&code, OpCode::Mov);
    let last_mov = find_opcode(&code, OpCode::Mov, movs - 1).unwrap();
    assert!(new_function < last_mov);
}

#[test]
fn default_parameter_tests_undefined_not_argument_count() {
    let cx = new_context();

    // function f(a = g()) {} guards the default expression with an
    // is_undefined check on the passed value.
    let func = FunctionBuilder::new(&cx, "f")
        .param_with_default(&cx, "a", call(id(&cx, "g"), vec![]))
        .body(vec![])
        .build();
    let code = compile_function(&cx, &func);

    let is_undefined = find_opcode(&code, OpCode::IsUndefined, 0).unwrap();
    assert_eq!(
        VirtualRegister::decode(operand(&code, is_undefined, 1)),
        VirtualRegister::parameter(0)
    );
    assert_eq!(count_opcode(&code, OpCode::JFalse), 1);
    assert_eq!(count_opcode(&code, OpCode::Call), 1);
}

#[test]
fn var_shadowing_default_parameter_copies_its_value() {
    let cx = new_context();

    // function f(a = 1) { var a; } - the var starts out as the parameter's
    // value, in a distinct binding (FunctionDeclarationInstantiation step 28).
    let func = FunctionBuilder::new(&cx, "f")
        .param_with_default(&cx, "a", num(1.0))
        .var(&cx, "a")
        .body(vec![])
        .build();
    let code = compile_function(&cx, &func);

    // Parameter environment plus a copy into the var binding: the generator
    // reads the parameter binding and stores the var binding after the var
    // environment is set up.
    assert!(count_opcode(&code, OpCode::Mov) >= 2);

    // Two distinct symbol tables: the function's var scope and the parameter
    // scope.
    assert!(code.symbol_tables().len() >= 2);
}

#[test]
fn class_constructor_preamble() {
    let cx = new_context();

    let func = FunctionBuilder::new(&cx, "C")
        .strict()
        .constructor_kind(ConstructorKind::Base)
        .body(vec![])
        .build();
    let code = compile_function(&cx, &func);

    assert!(code.is_constructor());
    assert_eq!(count_opcode(&code, OpCode::CreateThis), 1);

    let derived = FunctionBuilder::new(&cx, "D")
        .strict()
        .constructor_kind(ConstructorKind::Derived)
        .body(vec![])
        .build();
    let code = compile_function(&cx, &derived);

    // Derived constructors start with an uninitialized `this` and TDZ-check
    // it on the implicit return.
    assert_eq!(count_opcode(&code, OpCode::CreateThis), 0);
    assert!(count_opcode(&code, OpCode::CheckTdz) >= 1);
    assert!(count_opcode(&code, OpCode::IsObject) >= 1);
}

#[test]
fn nested_functions_are_generated_and_linked() {
    let cx = new_context();

    let inner = FunctionBuilder::new(&cx, "g")
        .body(vec![return_stmt(num(1.0))])
        .build();
    let func = FunctionBuilder::new(&cx, "f")
        .inner_function(inner)
        .body(vec![return_stmt(id(&cx, "g"))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(code.num_functions(), 1);
    let inner_code = code.function(0).unwrap();
    assert_eq!(inner_code.name().unwrap().as_str(), "g");
    assert_eq!(count_opcode(&inner_code, OpCode::Ret), 1);
}

#[test]
fn expression_depth_limit_reports_resource_exhaustion() {
    let cx = new_context();

    // Build a pathologically deep unary chain.
    let mut expr = num(1.0);
    for _ in 0..5000 {
        expr = pyrite::parser::ast::Expression::Unary {
            op: pyrite::parser::ast::UnaryOperator::Minus,
            operand: Box::new(expr),
        };
    }

    let func = FunctionBuilder::new(&cx, "f").body(vec![expr_stmt(expr)]).build();

    let result = pyrite::bytecode::generator::BytecodeProgramGenerator::generate_from_function(
        &cx, &func,
    );
    assert!(matches!(
        result,
        Err(pyrite::bytecode::generator::EmitError::ExpressionTooDeep)
    ));
}
