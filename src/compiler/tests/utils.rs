use crate::common::*;
use crate::compiler::codegen::{CodeImage, Instr, Label};
use crate::compiler::inputsource::{ErrorCode, Severity};
use crate::compiler::symbols::{ArgInfo, FieldEntry};
use crate::compiler::{Compilation, Compiler};

//------------------------------------------------------------------------------
// Interface for declaring symbols and compiling a single expression
//------------------------------------------------------------------------------

pub(crate) struct Tester {
    test_name: String,
    pub(crate) compiler: Compiler,
}

impl Tester {
    /// Constructs a new tester; symbols are declared before compiling.
    pub(crate) fn new<S: ToString>(test_name: S) -> Self {
        Self { test_name: test_name.to_string(), compiler: Compiler::new() }
    }

    pub(crate) fn with_global(mut self, name: &str, tag: &str) -> Self {
        self.compiler.declare_global(name, tag);
        self
    }

    pub(crate) fn with_local(mut self, name: &str, tag: &str) -> Self {
        self.compiler.declare_local(name, tag);
        self
    }

    pub(crate) fn with_const_local(mut self, name: &str, tag: &str) -> Self {
        self.compiler.declare_const_local(name, tag);
        self
    }

    pub(crate) fn with_constant(mut self, name: &str, value: Cell) -> Self {
        self.compiler.declare_constant(name, value, "");
        self
    }

    pub(crate) fn with_array(mut self, name: &str, dims: &[Cell]) -> Self {
        self.compiler.declare_array(name, "", dims);
        self
    }

    pub(crate) fn with_packed_array(mut self, name: &str, dims: &[Cell]) -> Self {
        self.compiler.declare_packed_array(name, "", dims);
        self
    }

    pub(crate) fn with_function(mut self, name: &str, tag: &str, args: Vec<ArgInfo>) -> Self {
        self.compiler.declare_function(name, tag, args);
        self
    }

    /// Escape hatch for declarations without a dedicated builder.
    pub(crate) fn setup<F: FnOnce(&mut Compiler)>(mut self, f: F) -> Self {
        f(&mut self.compiler);
        self
    }

    pub(crate) fn compile(self, expression: &str) -> CompileTester {
        let Tester { test_name, mut compiler } = self;
        match compiler.compile_expression(expression) {
            Ok(compilation) => CompileTester { test_name, compiler, compilation },
            Err(fatal) => panic!("[{}] unexpected fatal error: {}", test_name, fatal),
        }
    }

    /// Compiles in test position (`if (...)`), where assignments warn.
    pub(crate) fn compile_test_expr(self, expression: &str) -> CompileTester {
        let Tester { test_name, mut compiler } = self;
        match compiler.compile_test_expression(expression) {
            Ok(compilation) => CompileTester { test_name, compiler, compilation },
            Err(fatal) => panic!("[{}] unexpected fatal error: {}", test_name, fatal),
        }
    }
}

//------------------------------------------------------------------------------
// Interface for checking the compilation result
//------------------------------------------------------------------------------

pub(crate) struct CompileTester {
    test_name: String,
    pub(crate) compiler: Compiler,
    pub(crate) compilation: Compilation,
}

impl CompileTester {
    /// The whole expression folded to this compile-time constant.
    pub(crate) fn expect_const(self, value: Cell) -> Self {
        assert_eq!(
            self.compilation.constant_value(),
            Some(value),
            "[{}] expected the expression to fold to {}, got {:?} ({:?})\n{}",
            self.test_name, value, self.compilation.constant_value(), self.compilation.ident,
            self.compilation.diagnostics
        );
        self
    }

    pub(crate) fn expect_not_const(self) -> Self {
        assert!(
            self.compilation.constant_value().is_none(),
            "[{}] expected a non-constant result, but the expression folded to {}",
            self.test_name,
            self.compilation.constval
        );
        self
    }

    /// No diagnostics at all, not even warnings.
    pub(crate) fn expect_clean(self) -> Self {
        assert!(
            self.compilation.diagnostics.reports().is_empty(),
            "[{}] expected no diagnostics, got:\n{}",
            self.test_name, self.compilation.diagnostics
        );
        self
    }

    pub(crate) fn expect_no_errors(self) -> Self {
        assert_eq!(
            self.compilation.diagnostics.num_errors(), 0,
            "[{}] expected no errors, got:\n{}",
            self.test_name, self.compilation.diagnostics
        );
        self
    }

    pub(crate) fn expect_report(self, code: ErrorCode) -> Self {
        assert!(
            self.compilation.diagnostics.has_code(code),
            "[{}] expected a {:?} report, got:\n{}",
            self.test_name, code, self.compilation.diagnostics
        );
        self
    }

    pub(crate) fn expect_error(self, code: ErrorCode) -> Self {
        debug_assert_eq!(code.severity(), Severity::Error);
        self.expect_report(code)
    }

    pub(crate) fn expect_warning(self, code: ErrorCode) -> Self {
        debug_assert_eq!(code.severity(), Severity::Warning);
        self.expect_report(code)
    }

    /// The result tag is the named tag.
    pub(crate) fn expect_tag(mut self, name: &str) -> Self {
        let expected = self.compiler.tag(name);
        assert_eq!(
            self.compilation.tag, expected,
            "[{}] expected tag \"{}\" ({}), got {}",
            self.test_name, name, expected, self.compilation.tag
        );
        self
    }

    /// The exact emitted instruction stream.
    pub(crate) fn expect_code(self, expected: &[Instr]) -> Self {
        assert_eq!(
            self.compilation.code.instrs, expected,
            "[{}] emitted code differs",
            self.test_name
        );
        self
    }

    /// Free-form inspection of the emitted code.
    pub(crate) fn for_code<F: FnOnce(&str, &CodeImage)>(self, f: F) -> Self {
        f(&self.test_name, &self.compilation.code);
        self
    }

    pub(crate) fn expect_instr<F: Fn(&Instr) -> bool>(self, what: &str, pred: F) -> Self {
        assert!(
            self.compilation.code.instrs.iter().any(|i| pred(i)),
            "[{}] expected {} in the emitted code, got {:?}",
            self.test_name, what, self.compilation.code.instrs
        );
        self
    }

    pub(crate) fn expect_no_instr<F: Fn(&Instr) -> bool>(self, what: &str, pred: F) -> Self {
        assert!(
            !self.compilation.code.instrs.iter().any(|i| pred(i)),
            "[{}] expected no {} in the emitted code, got {:?}",
            self.test_name, what, self.compilation.code.instrs
        );
        self
    }

    pub(crate) fn expect_no_report(self, code: ErrorCode) -> Self {
        assert!(
            !self.compilation.diagnostics.has_code(code),
            "[{}] expected no {:?} report, got:\n{}",
            self.test_name, code, self.compilation.diagnostics
        );
        self
    }

    /// Compiles a further expression with the same declarations (and any
    /// state the previous compilation left behind).
    pub(crate) fn and_compile(self, expression: &str) -> CompileTester {
        let CompileTester { test_name, mut compiler, .. } = self;
        match compiler.compile_expression(expression) {
            Ok(compilation) => CompileTester { test_name, compiler, compilation },
            Err(fatal) => panic!("[{}] unexpected fatal error: {}", test_name, fatal),
        }
    }
}

//------------------------------------------------------------------------------
// Code-shape helpers
//------------------------------------------------------------------------------

/// Heap movement along every control-flow path through the stream. A
/// finished expression balances to zero on all of them, no matter which
/// conditional branches run.
pub(crate) fn heap_paths(code: &CodeImage) -> Vec<Cell> {
    fn find_label(instrs: &[Instr], label: Label) -> usize {
        instrs
            .iter()
            .position(|i| *i == Instr::SetLabel(label))
            .expect("jump target is defined")
    }
    fn walk(instrs: &[Instr], start: usize, mut acc: Cell, out: &mut Vec<Cell>) {
        let mut idx = start;
        while idx < instrs.len() {
            match &instrs[idx] {
                Instr::ModHeap(bytes) => acc += *bytes,
                Instr::SetHeapPri | Instr::SetHeap(_) => acc += CELL_SIZE,
                Instr::Jump(label) => {
                    idx = find_label(instrs, *label);
                    continue;
                }
                Instr::JumpEq0(label) | Instr::JumpNe0(label) => {
                    // fork: taken branch explored recursively
                    walk(instrs, find_label(instrs, *label), acc, out);
                }
                _ => {}
            }
            idx += 1;
        }
        out.push(acc);
    }
    let mut out = Vec::new();
    walk(&code.instrs, 0, 0, &mut out);
    out
}

/// Net heap movement over the whole instruction stream; valid for
/// straight-line code (use `heap_paths` when conditionals are involved).
pub(crate) fn net_heap(code: &CodeImage) -> Cell {
    code.instrs
        .iter()
        .map(|instr| match instr {
            Instr::ModHeap(bytes) => *bytes,
            Instr::SetHeapPri | Instr::SetHeap(_) => CELL_SIZE,
            _ => 0,
        })
        .sum()
}

/// Heap movement of the two branches of the first conditional in the
/// stream: (true branch, false branch). Branch boundaries are recovered
/// from the conditional's jump/label shape.
pub(crate) fn branch_heap(code: &CodeImage) -> (Cell, Cell) {
    let mut iter = code.instrs.iter();
    let false_label = loop {
        match iter.next() {
            Some(Instr::JumpEq0(label)) => break *label,
            Some(_) => continue,
            None => panic!("no conditional jump in {:?}", code.instrs),
        }
    };
    let mut sum_true: Cell = 0;
    let end_label = loop {
        match iter.next() {
            Some(Instr::Jump(label)) => break *label,
            Some(Instr::ModHeap(bytes)) => sum_true += *bytes,
            Some(Instr::SetHeapPri) | Some(Instr::SetHeap(_)) => sum_true += CELL_SIZE,
            Some(_) => continue,
            None => panic!("true branch does not end in a jump"),
        }
    };
    // skip to the false branch
    loop {
        match iter.next() {
            Some(Instr::SetLabel(label)) if *label == false_label => break,
            Some(_) => continue,
            None => panic!("false branch label not found"),
        }
    }
    let mut sum_false: Cell = 0;
    loop {
        match iter.next() {
            Some(Instr::SetLabel(label)) if *label == end_label => break,
            Some(Instr::ModHeap(bytes)) => sum_false += *bytes,
            Some(Instr::SetHeapPri) | Some(Instr::SetHeap(_)) => sum_false += CELL_SIZE,
            Some(_) => continue,
            None => panic!("conditional end label not found"),
        }
    }
    (sum_true, sum_false)
}

/// Builds a named-index table from (name, size) pairs, closing it with the
/// customary sentinel row.
pub(crate) fn field_table(fields: &[(&str, Cell)]) -> Vec<FieldEntry> {
    let mut entries = Vec::with_capacity(fields.len() + 1);
    let mut offset: Cell = 0;
    for (name, size) in fields {
        entries.push(FieldEntry { name: name.to_string(), value: offset, tag: 0, packed: false });
        offset += size;
    }
    entries.push(FieldEntry { name: String::new(), value: offset, tag: 0, packed: false });
    entries
}
