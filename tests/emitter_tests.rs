use pyrite::bytecode::instruction::OpCode;
use pyrite::bytecode::label::Label;
use pyrite::parser::ast::{BinaryOperator, Expression, LogicalOperator, UnaryOperator};
use pyrite_harness::*;

#[test]
fn labels_record_patch_sites_until_resolved() {
    let mut label = Label::new();
    assert!(label.is_forward());

    // Forward jumps return a placeholder and record their patch site.
    assert_eq!(label.bind(10, 11), 0);
    assert_eq!(label.bind(14, 16), 0);
    assert!(label.has_unresolved_jumps());

    let patches = label.set_location(20);
    assert_eq!(patches, vec![(10, 11), (14, 16)]);
    assert!(!label.is_forward());

    // Jumps to a resolved label compute their displacement directly and
    // record nothing.
    assert_eq!(label.bind(30, 31), -10);
    assert!(!label.has_unresolved_jumps());
}

#[test]
fn forward_jumps_are_backpatched() {
    let cx = new_context();

    // if (x) { y; } compiles to a jfalse over the consequent.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .body(vec![if_stmt(id(&cx, "x"), expr_stmt(id(&cx, "y")))])
        .build();
    let code = compile_function(&cx, &func);

    let jfalse = find_opcode(&code, OpCode::JFalse, 0).unwrap();
    let offset = operand(&code, jfalse, 1) as isize;
    assert!(offset > 0);

    // The displacement must land exactly on an instruction boundary.
    let target = (jfalse as isize + offset) as usize;
    assert!(instructions(&code).iter().any(|(_, index)| *index == target));
    assert!(code.jump_targets().contains(&target));
}

#[test]
fn backward_jump_displacement_is_negative() {
    let cx = new_context();

    // while (x) {} tests at the bottom and branches backwards to the top.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .body(vec![while_stmt(id(&cx, "x"), block(empty_env(), vec![]))])
        .build();
    let code = compile_function(&cx, &func);

    let jtrue = find_opcode(&code, OpCode::JTrue, 0).unwrap();
    let offset = operand(&code, jtrue, 1) as isize;
    assert!(offset < 0);

    let target = (jtrue as isize + offset) as usize;
    let loop_hint = find_opcode(&code, OpCode::LoopHint, 0).unwrap();
    assert_eq!(target, loop_hint);
}

#[test]
fn comparison_fuses_into_branch() {
    let cx = new_context();

    // if (x < y) { x; } must compile to a single jnless, never materializing
    // the boolean.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .body(vec![if_stmt(
            binary(BinaryOperator::Less, id(&cx, "x"), id(&cx, "y")),
            expr_stmt(id(&cx, "x")),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::Less), 0);
    assert_eq!(count_opcode(&code, OpCode::JNLess), 1);
    assert_eq!(count_opcode(&code, OpCode::JFalse), 0);
}

#[test]
fn fusion_only_cares_about_the_compare_destination() {
    let cx = new_context();

    // The left operand is a call, but the compare's destination is still a
    // dead temporary, so fusion applies.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .body(vec![if_stmt(
            binary(
                BinaryOperator::Less,
                call(id(&cx, "f"), vec![id(&cx, "x")]),
                id(&cx, "y"),
            ),
            expr_stmt(id(&cx, "x")),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::Less), 0);
    assert_eq!(count_opcode(&code, OpCode::JNLess), 1);
}

#[test]
fn backward_branch_fuses_for_jump_if_true() {
    let cx = new_context();

    // while (x < y) {} branches backwards; jless fusion applies on the
    // branch-if-true side even for backward targets.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .body(vec![while_stmt(
            binary(BinaryOperator::Less, id(&cx, "x"), id(&cx, "y")),
            block(empty_env(), vec![]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::Less), 0);
    assert_eq!(count_opcode(&code, OpCode::JLess), 1);
}

#[test]
fn null_compare_fuses_only_forward() {
    let cx = new_context();

    // if (x == null) fuses to jneq_null over the consequent.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .body(vec![if_stmt(
            binary(BinaryOperator::Eq, id(&cx, "x"), Expression::Null),
            expr_stmt(id(&cx, "x")),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::EqNull), 0);
    assert_eq!(count_opcode(&code, OpCode::JNeqNull), 1);

    // while (x == null) branches backwards: the null-compare fusion does not
    // apply, leaving the compare plus a generic branch.
    let func = FunctionBuilder::new(&cx, "g")
        .param(&cx, "x")
        .body(vec![while_stmt(
            binary(BinaryOperator::Eq, id(&cx, "x"), Expression::Null),
            block(empty_env(), vec![]),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::EqNull), 1);
    assert_eq!(count_opcode(&code, OpCode::JTrue), 1);
}

#[test]
fn not_fuses_with_jump_if_false() {
    let cx = new_context();

    // if (!x) inverts the branch instead of materializing the negation.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .body(vec![if_stmt(
            unary(UnaryOperator::LogicalNot, id(&cx, "x")),
            expr_stmt(id(&cx, "x")),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::Not), 0);
    assert_eq!(count_opcode(&code, OpCode::JTrue), 1);
    assert_eq!(count_opcode(&code, OpCode::JFalse), 0);
}

#[test]
fn fusion_is_disabled_across_jump_targets() {
    let cx = new_context();

    // In (x && (y < z)), the short-circuit label lands directly after the
    // compare, so the branch on the overall result must not retract it.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .param(&cx, "z")
        .body(vec![if_stmt(
            Expression::Logical {
                op: LogicalOperator::And,
                left: Box::new(id(&cx, "x")),
                right: Box::new(binary(BinaryOperator::Less, id(&cx, "y"), id(&cx, "z"))),
            },
            expr_stmt(id(&cx, "x")),
        )])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::Less), 1);
    assert_eq!(count_opcode(&code, OpCode::JLess), 0);
    assert_eq!(count_opcode(&code, OpCode::JNLess), 0);
}

#[test]
fn typeof_compare_rewrites_to_type_predicate() {
    let cx = new_context();

    // typeof x == "number" compiles to is_number without a typeof.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "x")
        .param(&cx, "y")
        .body(vec![expr_stmt(assign(
            &cx,
            "y",
            binary(
                BinaryOperator::Eq,
                unary(UnaryOperator::TypeOf, id(&cx, "x")),
                string(&cx, "number"),
            ),
        ))])
        .build();
    let code = compile_function(&cx, &func);

    assert_eq!(count_opcode(&code, OpCode::TypeOf), 0);
    assert_eq!(count_opcode(&code, OpCode::Eq), 0);
    assert_eq!(count_opcode(&code, OpCode::IsNumber), 1);
}

#[test]
fn temporaries_are_reused_across_statements() {
    let cx = new_context();

    // Two independent additions land in the same reclaimed temporary.
    let func = FunctionBuilder::new(&cx, "f")
        .param(&cx, "a")
        .param(&cx, "b")
        .body(vec![
            expr_stmt(binary(BinaryOperator::Add, id(&cx, "a"), id(&cx, "b"))),
            expr_stmt(binary(BinaryOperator::Subtract, id(&cx, "a"), id(&cx, "b"))),
        ])
        .build();
    let code = compile_function(&cx, &func);

    let add = find_opcode(&code, OpCode::Add, 0).unwrap();
    let sub = find_opcode(&code, OpCode::Sub, 0).unwrap();
    assert_eq!(operand(&code, add, 0), operand(&code, sub, 0));
}
