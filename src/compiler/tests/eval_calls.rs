use super::*;

fn two_arg_tester(test_name: &str) -> Tester {
    Tester::new(test_name).with_function(
        "foo", "",
        vec![
            ArgInfo::value("a", vec![0]),
            ArgInfo::value("b", vec![0]).with_default(7, 0),
        ],
    )
}

#[test]
fn arguments_are_pushed_right_to_left() {
    two_arg_tester("push order")
        .compile("foo(1, 2)")
        .expect_clean()
        .for_code(|name, code| match code.instrs.as_slice() {
            [Instr::Const(Reg::Pri, 2), Instr::Push(Reg::Pri),
             Instr::Const(Reg::Pri, 1), Instr::Push(Reg::Pri),
             Instr::PushVal(16), Instr::Call(_)] => {}
            other => panic!("[{}] unexpected code shape: {:?}", name, other),
        });
}

#[test]
fn named_arguments_bind_by_position() {
    let positional = two_arg_tester("positional").compile("foo(1, 2)").expect_clean();
    let named = two_arg_tester("named").compile("foo(.b = 2, .a = 1)").expect_clean();
    assert_eq!(positional.compilation.code, named.compilation.code);
}

#[test]
fn omitted_arguments_take_their_default() {
    let explicit = two_arg_tester("explicit").compile("foo(1, 7)").expect_clean();
    let defaulted = two_arg_tester("defaulted").compile("foo(1)").expect_clean();
    let skipped = two_arg_tester("skipped").compile("foo(1, _)").expect_clean();
    assert_eq!(explicit.compilation.code, defaulted.compilation.code);
    assert_eq!(explicit.compilation.code, skipped.compilation.code);
}

#[test]
fn argument_binding_errors() {
    Tester::new("missing required")
        .with_function("req", "", vec![ArgInfo::value("a", vec![0]), ArgInfo::value("b", vec![0])])
        .compile("req(1)")
        .expect_error(ErrorCode::ArgumentCountMismatch);

    two_arg_tester("too many")
        .compile("foo(1, 2, 3)")
        .expect_error(ErrorCode::ArgumentCountMismatch);

    two_arg_tester("duplicate")
        .compile("foo(1, .a = 2)")
        .expect_error(ErrorCode::ArgumentAlreadySet);

    two_arg_tester("named before positional")
        .compile("foo(.b = 1, 2)")
        .expect_error(ErrorCode::NamedParamsPrecedePositional);

    Tester::new("skip without default")
        .with_function("req", "", vec![ArgInfo::value("a", vec![0])])
        .compile("req(_)")
        .expect_error(ErrorCode::ArgumentHasNoDefault);
}

#[test]
fn unknown_named_argument_suggests_the_nearest_name() {
    let result = two_arg_tester("unknown name")
        .compile("foo(.c = 1)")
        .expect_error(ErrorCode::UndefinedSymbol);
    assert!(
        result.compilation.diagnostics.reports()[0].message.contains("did you mean"),
        "expected a nearest-match suggestion"
    );
}

#[test]
fn reference_arguments_take_an_address() {
    Tester::new("ref ok")
        .with_function("bar", "", vec![ArgInfo::reference("r", vec![0])])
        .with_local("x", "")
        .compile("bar(x)")
        .expect_clean()
        .expect_instr("address of the operand", |i| matches!(i, Instr::Address(Reg::Pri, _)));

    Tester::new("ref needs lvalue")
        .with_function("bar", "", vec![ArgInfo::reference("r", vec![0])])
        .with_local("x", "")
        .compile("bar(x + 1)")
        .expect_error(ErrorCode::ArgumentTypeMismatch);

    Tester::new("const to mutable ref")
        .with_function("bar", "", vec![ArgInfo::reference("r", vec![0])])
        .with_const_local("cx", "")
        .compile("bar(cx)")
        .expect_error(ErrorCode::ArgumentTypeMismatch);
}

#[test]
fn computed_vararg_operands_spill_to_the_heap() {
    Tester::new("vararg spill")
        .with_function("sum", "", vec![ArgInfo::varargs(vec![0])])
        .with_local("x", "")
        .compile("sum(1, x, x + 2)")
        .expect_clean()
        .for_code(|name, code| {
            let spills =
                code.instrs.iter().filter(|i| **i == Instr::SetHeapPri).count();
            assert_eq!(spills, 2, "[{}] the constant and the computed operand spill", name);
            assert_eq!(net_heap(code), 0, "[{}] transient heap fully unwound", name);
        });
}

#[test]
fn array_arguments_match_shapes() {
    let tester = |name: &str| {
        Tester::new(name)
            .with_function("baz", "", vec![ArgInfo::array("v", vec![0], vec![3])])
            .with_array("a", &[3])
            .with_array("b", &[5])
    };
    tester("exact array").compile("baz(a)").expect_clean();
    tester("wrong size").compile("baz(b)").expect_error(ErrorCode::ArraySizeMismatch);
    // a literal string may be smaller than the declared size
    tester("short string").compile("baz(\"ab\")").expect_clean();
    tester("long string").compile("baz(\"abcd\")").expect_error(ErrorCode::ArraySizeMismatch);

    Tester::new("open size")
        .with_function("qux", "", vec![ArgInfo::array("v", vec![0], vec![0])])
        .with_array("b", &[5])
        .compile("qux(b)")
        .expect_clean();
}

#[test]
fn sizeof_defaults_resolve_from_the_bound_argument() {
    Tester::new("sizeof default")
        .with_function(
            "fill", "",
            vec![
                ArgInfo::array("v", vec![0], vec![0]),
                ArgInfo::value("n", vec![0]).with_default_sizeof("v", 0),
            ],
        )
        .with_array("a", &[3])
        .compile("fill(a)")
        .expect_clean()
        .for_code(|name, code| match code.instrs.as_slice() {
            [Instr::Const(Reg::Pri, 3), Instr::Push(Reg::Pri),
             Instr::Address(Reg::Pri, _), Instr::Push(Reg::Pri),
             Instr::PushVal(16), Instr::Call(_)] => {}
            other => panic!("[{}] unexpected code shape: {:?}", name, other),
        });
}

#[test]
fn tagof_defaults_resolve_from_the_bound_argument() {
    Tester::new("tagof default")
        .setup(|c| {
            let fixed = c.tag("fixed");
            c.declare_function(
                "tg", "",
                vec![
                    ArgInfo::value("x", vec![fixed]),
                    ArgInfo::value("t", vec![0]).with_default_tagof("x"),
                ],
            );
        })
        .with_local("fx", "fixed")
        .compile("tg(fx)")
        .expect_clean()
        .expect_instr("resolved tag constant", |i| {
            *i == Instr::Const(Reg::Pri, (2 | PUBLIC_TAG) as Cell)
        });
}

#[test]
fn array_results_get_a_hidden_return_slot() {
    Tester::new("array result")
        .setup(|c| c.declare_array_function("mk", "", vec![], &[4]))
        .compile("mk()")
        .expect_clean()
        .for_code(|name, code| match code.instrs.as_slice() {
            [Instr::ModHeap(32), Instr::Push(Reg::Alt), Instr::PushVal(0),
             Instr::Call(_), Instr::Pop(Reg::Pri), Instr::ModHeap(-32)] => {}
            other => panic!("[{}] unexpected code shape: {:?}", name, other),
        });
}

#[test]
fn array_results_can_be_assigned() {
    Tester::new("assign result")
        .setup(|c| c.declare_array_function("mk", "", vec![], &[4]))
        .with_array("r", &[4])
        .compile("r = mk()")
        .expect_no_errors()
        .expect_instr("result copy", |i| *i == Instr::MemCopy(4 * CELL_SIZE))
        .for_code(|name, code| {
            assert_eq!(net_heap(code), 0, "[{}]", name);
        });
}

#[test]
fn default_arrays_are_shared_when_const_and_copied_otherwise() {
    let args = || {
        vec![ArgInfo::array("v", vec![0], vec![3])
            .const_qualified()
            .with_default_array(vec![1, 2, 3], 3)]
    };
    // a const default array is passed by its static address: no heap
    Tester::new("const default array")
        .with_function("rd", "", args())
        .compile("rd()")
        .expect_clean()
        .expect_no_instr("heap copy", |i| matches!(i, Instr::MemCopy(_)));

    // a mutable default array is copied onto the heap per call
    Tester::new("mutable default array")
        .with_function(
            "wr", "",
            vec![ArgInfo::array("v", vec![0], vec![3]).with_default_array(vec![1, 2, 3], 3)],
        )
        .compile("wr()")
        .expect_clean()
        .expect_instr("heap copy", |i| *i == Instr::MemCopy(3 * CELL_SIZE))
        .for_code(|name, code| {
            assert_eq!(net_heap(code), 0, "[{}]", name);
        });
}

#[test]
fn deprecated_functions_warn_at_the_call_site() {
    two_arg_tester("deprecated")
        .setup(|c| c.mark_deprecated("foo", "use newfoo"))
        .compile("foo(1, 2)")
        .expect_warning(ErrorCode::DeprecatedFunction);
}

#[test]
fn calling_an_undeclared_function_reports_but_parses_the_arguments() {
    Tester::new("forward reference")
        .compile("mystery(1, 2)")
        .expect_error(ErrorCode::UndefinedSymbol);
}

#[test]
fn calls_raise_the_enclosing_functions_stack_watermark() {
    let result = two_arg_tester("watermark")
        .setup(|c| {
            c.declare_function("outer", "", vec![]);
            c.set_current_function("outer");
        })
        .compile("foo(1, 2)")
        .expect_clean();
    let outer = result.compiler.symbols.find_global("outer").unwrap();
    assert!(result.compiler.symbols.get(outer).stacksize > 0);
}
