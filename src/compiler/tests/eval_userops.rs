use super::*;

fn fixed_pair_args(c: &mut crate::compiler::Compiler) -> Vec<ArgInfo> {
    let fixed = c.tag("fixed");
    vec![
        ArgInfo::value("a", vec![fixed]),
        ArgInfo::value("b", vec![fixed]),
    ]
}

#[test]
fn matching_overload_replaces_the_builtin() {
    Tester::new("overload add")
        .setup(|c| {
            let args = fixed_pair_args(c);
            c.declare_operator("+", "fixed", Some("fixed"), "fixed", args);
        })
        .with_local("fx", "fixed")
        .with_local("fy", "fixed")
        .compile("fx + fy")
        .expect_no_errors()
        .expect_not_const()
        .expect_tag("fixed")
        .expect_instr("overload call", |i| matches!(i, Instr::Call(_)))
        .expect_no_instr("built-in add", |i| *i == Instr::Binary(Op::Add));
}

#[test]
fn overload_pre_empts_constant_folding() {
    Tester::new("no fold")
        .setup(|c| {
            let args = fixed_pair_args(c);
            c.declare_operator("+", "fixed", Some("fixed"), "fixed", args);
            c.declare_constant("FA", 100, "fixed");
            c.declare_constant("FB", 200, "fixed");
        })
        .compile("FA + FB")
        .expect_no_errors()
        .expect_not_const()
        .expect_instr("overload call", |i| matches!(i, Instr::Call(_)));
}

#[test]
fn commutative_operators_retry_with_swapped_tags() {
    // only (untagged, fixed) is declared; fixed + untagged resolves
    // through the swapped lookup, pushing the operands reversed
    Tester::new("swapped")
        .setup(|c| {
            let fixed = c.tag("fixed");
            let args = vec![ArgInfo::value("a", vec![0]), ArgInfo::value("b", vec![fixed])];
            c.declare_operator("+", "_", Some("fixed"), "fixed", args);
        })
        .with_local("fx", "fixed")
        .with_local("x", "")
        .compile("fx + x")
        .expect_no_errors()
        .expect_instr("overload call", |i| matches!(i, Instr::Call(_)))
        .for_code(|name, code| {
            // swapped resolution pushes ALT before PRI, right before the
            // argument-count push
            let at = code
                .instrs
                .iter()
                .position(|i| matches!(i, Instr::PushVal(_)))
                .expect("argument count push");
            assert_eq!(
                &code.instrs[at - 2..at],
                &[Instr::Push(Reg::Alt), Instr::Push(Reg::Pri)],
                "[{}] got {:?}", name, code.instrs
            );
        });
}

#[test]
fn non_commutative_swap_is_never_attempted() {
    Tester::new("sub not swapped")
        .setup(|c| {
            let fixed = c.tag("fixed");
            let args = vec![ArgInfo::value("a", vec![0]), ArgInfo::value("b", vec![fixed])];
            c.declare_operator("-", "_", Some("fixed"), "fixed", args);
        })
        .with_local("fx", "fixed")
        .with_local("x", "")
        .compile("fx - x")
        // the declared (untagged, fixed) orientation does not apply
        .expect_error(ErrorCode::TagMismatch)
        .expect_no_instr("overload call", |i| matches!(i, Instr::Call(_)));
}

#[test]
fn without_an_overload_the_builtin_applies_with_a_diagnostic() {
    Tester::new("fallback")
        .with_local("fx", "fixed")
        .with_local("x", "")
        .compile("fx + x")
        .expect_error(ErrorCode::TagMismatch)
        .expect_instr("built-in add", |i| *i == Instr::Binary(Op::Add));
}

#[test]
fn unary_minus_overload() {
    Tester::new("unary overload")
        .setup(|c| {
            let fixed = c.tag("fixed");
            let args = vec![ArgInfo::value("a", vec![fixed])];
            c.declare_operator("-", "fixed", None, "fixed", args);
        })
        .with_local("fx", "fixed")
        .compile("-fx")
        .expect_no_errors()
        .expect_tag("fixed")
        .expect_instr("overload call", |i| matches!(i, Instr::Call(_)))
        .expect_no_instr("built-in negate", |i| *i == Instr::Neg);
}

#[test]
fn an_operator_does_not_resolve_inside_its_own_body() {
    Tester::new("recursion guard")
        .setup(|c| {
            let args = fixed_pair_args(c);
            let name = c.declare_operator("+", "fixed", Some("fixed"), "fixed", args);
            c.set_current_function(&name);
        })
        .with_local("fx", "fixed")
        .with_local("fy", "fixed")
        .compile("fx + fy")
        .expect_no_errors()
        .expect_no_instr("recursive overload call", |i| matches!(i, Instr::Call(_)))
        .expect_instr("built-in add", |i| *i == Instr::Binary(Op::Add));
}

#[test]
fn increment_overload_loads_calls_and_stores_back() {
    Tester::new("increment overload")
        .setup(|c| {
            let fixed = c.tag("fixed");
            let args = vec![ArgInfo::value("a", vec![fixed])];
            c.declare_operator("++", "fixed", None, "fixed", args);
        })
        .with_local("fx", "fixed")
        .compile("fx++")
        .expect_no_errors()
        .expect_instr("overload call", |i| matches!(i, Instr::Call(_)))
        .expect_instr("store back", |i| matches!(i, Instr::StoreSym(_)))
        .expect_instr("result restore", |i| *i == Instr::Swap)
        .expect_no_instr("built-in increment", |i| matches!(i, Instr::IncSym(_)));
}

#[test]
fn assignment_overload_acts_as_a_conversion() {
    Tester::new("conversion")
        .setup(|c| {
            let fixed = c.tag("fixed");
            let args = vec![ArgInfo::value("a", vec![fixed])];
            c.declare_operator("=", "fixed", Some("_"), "_", args);
        })
        .with_local("x", "")
        .with_local("fx", "fixed")
        .compile("x = fx")
        .expect_no_errors()
        .expect_instr("conversion call", |i| matches!(i, Instr::Call(_)));
}

#[test]
fn undeclared_operand_tags_use_the_builtin_silently() {
    // untagged operands never resolve an overload, and match without one
    Tester::new("untagged")
        .with_local("x", "")
        .with_local("y", "")
        .compile("x * y")
        .expect_clean()
        .expect_instr("built-in multiply", |i| *i == Instr::Binary(Op::Mult));
}
