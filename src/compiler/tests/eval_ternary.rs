use super::*;

#[test]
fn conditional_code_shape() {
    Tester::new("shape")
        .with_local("x", "")
        .compile("x ? 2 : 3")
        .expect_clean()
        .expect_not_const()
        .for_code(|name, code| match code.instrs.as_slice() {
            [Instr::LoadSym(Reg::Pri, _), Instr::JumpEq0(false1),
             Instr::Const(Reg::Pri, 2), Instr::Jump(end1),
             Instr::SetLabel(false2), Instr::Const(Reg::Pri, 3),
             Instr::SetLabel(end2)] => {
                assert_eq!(false1, false2, "[{}]", name);
                assert_eq!(end1, end2, "[{}]", name);
            }
            other => panic!("[{}] unexpected code shape: {:?}", name, other),
        });
}

#[test]
fn constant_conditions_are_flagged_as_redundant() {
    Tester::new("always true")
        .with_local("x", "")
        .compile("1 ? 2 : 3")
        .expect_warning(ErrorCode::RedundantTestAlwaysTrue);
    Tester::new("always false")
        .with_local("x", "")
        .compile("0 ? 2 : 3")
        .expect_warning(ErrorCode::RedundantTestAlwaysFalse);
}

#[test]
fn both_branches_are_parsed_even_under_a_constant_condition() {
    Tester::new("validated branches")
        .compile("1 ? 2 : nosuch")
        .expect_warning(ErrorCode::RedundantTestAlwaysTrue)
        .expect_error(ErrorCode::UndefinedSymbol);
}

#[test]
fn branch_heap_usage_is_equilibrated() {
    // the branches transiently allocate 3 and 5 cells for their array
    // results; compensation at branch entry makes the net movement equal
    let result = Tester::new("equilibrated")
        .setup(|c| {
            c.declare_array_function("mk3", "", vec![], &[3]);
            c.declare_array_function("mk5", "", vec![], &[5]);
        })
        .with_local("x", "")
        .compile("x ? mk3() : mk5()")
        .expect_no_errors();
    let code = &result.compilation.code;
    let (true_branch, false_branch) = branch_heap(code);
    assert_eq!(true_branch, false_branch, "heap movement must not depend on the branch taken");
    assert_eq!(true_branch, 5 * CELL_SIZE);
    assert!(
        heap_paths(code).iter().all(|sum| *sum == 0),
        "the statement layer sees a balanced heap on every path: {:?}",
        heap_paths(code)
    );
}

#[test]
fn equal_branches_need_no_compensation() {
    let result = Tester::new("no compensation")
        .setup(|c| {
            c.declare_array_function("mk3", "", vec![], &[3]);
        })
        .with_local("x", "")
        .compile("x ? mk3() : mk3()")
        .expect_no_errors();
    let (true_branch, false_branch) = branch_heap(&result.compilation.code);
    assert_eq!(true_branch, 3 * CELL_SIZE);
    assert_eq!(false_branch, 3 * CELL_SIZE);
}

#[test]
fn mixing_an_array_branch_with_a_scalar_branch_is_an_error() {
    Tester::new("array scalar mix")
        .with_local("x", "")
        .with_array("a", &[3])
        .compile("x ? a : 1")
        .expect_error(ErrorCode::ArrayMustBeIndexed);
}

#[test]
fn branch_tags_must_match() {
    Tester::new("branch tags")
        .with_local("x", "")
        .with_local("fx", "fixed")
        .compile("x ? fx : 1")
        .expect_error(ErrorCode::TagMismatch);
}

#[test]
fn conditionals_nest() {
    Tester::new("nested")
        .with_local("x", "")
        .with_local("y", "")
        .compile("x ? y ? 1 : 2 : 3")
        .expect_clean()
        .expect_not_const();
}

#[test]
fn nested_conditionals_equilibrate_in_declaration_order() {
    // the outer conditional's heap node is recorded before the inner
    // one's; the write pass must drain them in the same order
    let result = Tester::new("nested heap")
        .setup(|c| {
            c.declare_array_function("mk3", "", vec![], &[3]);
            c.declare_array_function("mk5", "", vec![], &[5]);
        })
        .with_local("x", "")
        .with_local("y", "")
        .compile("x ? (y ? mk3() : mk5()) : mk5()")
        .expect_no_errors();
    assert!(
        heap_paths(&result.compilation.code).iter().all(|sum| *sum == 0),
        "all paths balance: {:?}",
        heap_paths(&result.compilation.code)
    );
}

#[test]
fn assignment_in_test_position_warns() {
    Tester::new("test assignment")
        .with_local("x", "")
        .compile_test_expr("x = 1")
        .expect_warning(ErrorCode::PossiblyUnintendedAssignment);

    // comparison in test position is the intended form
    Tester::new("test comparison")
        .with_local("x", "")
        .compile_test_expr("x == 1")
        .expect_clean();
}
