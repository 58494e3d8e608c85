use super::*;

#[test]
fn same_size_arrays_copy_wholesale() {
    Tester::new("copy")
        .with_array("a", &[5])
        .with_array("b", &[5])
        .compile("a = b")
        .expect_no_errors()
        .expect_not_const()
        .expect_instr("block copy", |i| *i == Instr::MemCopy(5 * CELL_SIZE));
}

#[test]
fn larger_source_is_rejected() {
    Tester::new("too large")
        .with_array("a", &[3])
        .with_array("b", &[5])
        .compile("a = b")
        .expect_error(ErrorCode::ArraySizeMismatch);
}

#[test]
fn smaller_source_into_larger_destination_is_allowed() {
    // the shrink-only exception for single-dimensional arrays
    Tester::new("shrink")
        .with_array("a", &[5])
        .with_array("b", &[3])
        .compile("a = b")
        .expect_no_errors()
        .expect_instr("short copy", |i| *i == Instr::MemCopy(3 * CELL_SIZE));
}

#[test]
fn string_literal_into_larger_buffer() {
    // "ab" occupies three cells including the terminator
    let result = Tester::new("string shrink")
        .with_array("s", &[5])
        .compile("s = \"ab\"")
        .expect_no_errors()
        .expect_instr("string copy", |i| *i == Instr::MemCopy(3 * CELL_SIZE));
    // the literal was flushed into the data segment
    assert_eq!(result.compiler.data_segment(), &[97, 98, 0]);
}

#[test]
fn string_literal_longer_than_the_buffer_is_rejected() {
    Tester::new("string too long")
        .with_array("s", &[3])
        .compile("s = \"abcdef\"")
        .expect_error(ErrorCode::ArraySizeMismatch);
}

#[test]
fn literal_arrays_must_match_exactly() {
    Tester::new("literal exact")
        .with_array("a", &[3])
        .compile("a = [1, 2, 3]")
        .expect_no_errors()
        .expect_instr("copy", |i| *i == Instr::MemCopy(3 * CELL_SIZE));

    // unlike literal strings, short literal arrays do not shrink-assign
    Tester::new("literal short")
        .with_array("a", &[3])
        .compile("a = [1, 2]")
        .expect_error(ErrorCode::ArraySizeMismatch);
}

#[test]
fn multi_dimensional_assignment_requires_exact_shape() {
    Tester::new("matrix copy")
        .with_array("m1", &[2, 4])
        .with_array("m2", &[2, 4])
        .compile("m1 = m2")
        .expect_no_errors()
        // 2 indirection cells + 2*4 data cells
        .expect_instr("full copy", |i| *i == Instr::MemCopy(10 * CELL_SIZE));

    Tester::new("matrix sublevel")
        .with_array("m1", &[2, 4])
        .with_array("m3", &[2, 5])
        .compile("m1 = m3")
        .expect_error(ErrorCode::ArraySizeMismatch);

    Tester::new("matrix dims")
        .with_array("m1", &[2, 4])
        .with_array("v", &[8])
        .compile("m1 = v")
        .expect_error(ErrorCode::ArrayDimensionMismatch);
}

#[test]
fn named_index_tables_must_match_on_every_sublevel() {
    let named = |fields: &[(&str, Cell)]| Some(field_table(fields));
    Tester::new("field tables differ")
        .setup(|c| {
            c.declare_array_full("m1", "", &[2, 4], &[None, named(&[("x", 1), ("y", 3)])], false, false);
            c.declare_array_full("m2", "", &[2, 4], &[None, named(&[("x", 2), ("y", 2)])], false, false);
            c.declare_array_full("m3", "", &[2, 4], &[None, named(&[("x", 1), ("y", 3)])], false, false);
        })
        .compile("m1 = m2")
        .expect_error(ErrorCode::ArraySizeMismatch)
        .and_compile("m1 = m3")
        .expect_no_errors();
}

#[test]
fn self_assignment_with_identical_constant_indices_warns() {
    Tester::new("self cell")
        .with_array("a", &[3])
        .compile("a[2] = a[2]")
        .expect_warning(ErrorCode::SelfAssignment);

    Tester::new("different cells")
        .with_array("a", &[3])
        .compile("a[2] = a[1]")
        .expect_no_report(ErrorCode::SelfAssignment);
}

#[test]
fn runtime_indices_are_never_reported_as_self_assignment() {
    Tester::new("runtime self")
        .with_array("a", &[3])
        .with_local("i", "")
        .with_local("j", "")
        .compile("a[i] = a[j]")
        .expect_no_report(ErrorCode::SelfAssignment)
        .expect_no_errors();
}

#[test]
fn constant_indices_are_checked_at_compile_time() {
    Tester::new("in bounds")
        .with_array("a", &[3])
        .compile("a[2]")
        .expect_no_errors()
        .expect_no_instr("run-time check", |i| matches!(i, Instr::Bounds(_)));

    Tester::new("out of bounds")
        .with_array("a", &[3])
        .compile("a[5]")
        .expect_error(ErrorCode::IndexOutOfBounds);

    Tester::new("negative")
        .with_array("a", &[3])
        .compile("a[-1]")
        .expect_error(ErrorCode::IndexOutOfBounds);
}

#[test]
fn runtime_indices_get_a_bounds_instruction() {
    Tester::new("bounds")
        .with_array("a", &[3])
        .with_local("i", "")
        .compile("a[i]")
        .expect_no_errors()
        .expect_instr("bounds check", |i| *i == Instr::Bounds(2));
}

#[test]
fn packed_arrays_use_braced_subscripts() {
    Tester::new("packed store")
        .with_packed_array("p", &[4])
        .compile("p{1} = 65")
        .expect_no_errors()
        .expect_instr("character store", |i| *i == Instr::StoreCharInd)
        .expect_instr("character alignment", |i| *i == Instr::CharAlign);

    Tester::new("packed with brackets")
        .with_packed_array("p", &[4])
        .compile("p[1]")
        .expect_warning(ErrorCode::PackedUnpackedMix);

    Tester::new("unpacked with braces")
        .with_array("a", &[4])
        .compile("a{1}")
        .expect_warning(ErrorCode::PackedUnpackedMix);
}

#[test]
fn multi_dimensional_subscripts_chain_indirection() {
    Tester::new("matrix cell")
        .with_array("m", &[2, 4])
        .compile("m[1][2]")
        .expect_no_errors()
        .expect_instr("indirection fetch", |i| *i == Instr::LoadInd);
}

#[test]
fn whole_arrays_compare_with_a_block_comparison() {
    Tester::new("array compare")
        .with_array("a", &[3])
        .with_array("b", &[3])
        .compile("a == b")
        .expect_no_errors()
        .expect_tag("bool")
        .expect_instr("block compare", |i| *i == Instr::CmpArray(Op::Eq, 3 * CELL_SIZE));
}

#[test]
fn scalar_into_array_is_rejected() {
    Tester::new("scalar into array")
        .with_array("a", &[3])
        .compile("a = 1")
        .expect_error(ErrorCode::ArrayMustBeIndexed);
}
