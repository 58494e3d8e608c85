pub(crate) mod arena;
pub mod codegen;
pub(crate) mod eval;
pub mod inputsource;
pub(crate) mod lexer;
pub(crate) mod symbols;

#[cfg(test)]
mod tests;

use crate::common::*;
use codegen::{CodeGen, CodeImage};
use eval::{operator_symname, ExprEval};
use inputsource::{CompileError, Diagnostics, InputSource};
use lexer::Lexer;
use symbols::{
    ArgInfo, FieldEntry, Ident, SymbolId, SymbolTable, USAGE_CONST, USAGE_DEPRECATED,
    USAGE_NATIVE, USAGE_PACKED,
};

/// Compilation pass. The browse pass measures (forward references, branch
/// heap usage, function usage) with discardable code generation; the write
/// pass emits authoritative code using the recorded facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Browse,
    Write,
}

/// Heap compensation for the two branches of one conditional expression,
/// measured in the browse pass and injected in the write pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BranchHeap {
    pub first: Cell,
    pub second: Cell,
}

/// Result of compiling one expression.
pub struct Compilation {
    pub code: CodeImage,
    pub diagnostics: Diagnostics,
    pub ident: Ident,
    pub constval: Cell,
    pub tag: Tag,
    /// Whether the expression had an observable effect; the statement
    /// layer warns about expression statements without one.
    pub side_effect: bool,
}

impl Compilation {
    /// The folded value, when the whole expression was a compile-time
    /// constant.
    pub fn constant_value(&self) -> Option<Cell> {
        if self.ident == Ident::Constant {
            Some(self.constval)
        } else {
            None
        }
    }
}

/// The expression compiler for one compilation unit. The statement layer
/// (or a test) first registers the symbols in scope, then compiles
/// expressions one at a time; each compilation runs the browse pass and
/// the write pass over the same source.
pub struct Compiler {
    symbols: SymbolTable,
    heaplist: VecDeque<BranchHeap>,
    defarray_addrs: HashMap<(SymbolId, usize), Cell>,
    literals: Vec<Cell>,
    /// Data segment accumulated by previous compilations (literal queues
    /// are flushed into it).
    data: Vec<Cell>,
    glb_declared: Cell,
    rational_tag: Tag,
    cur_func: Option<SymbolId>,
    next_local_addr: Cell,
    next_global_addr: Cell,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            heaplist: VecDeque::new(),
            defarray_addrs: HashMap::new(),
            literals: Vec::new(),
            data: Vec::new(),
            glb_declared: 0,
            rational_tag: 0,
            cur_func: None,
            next_local_addr: 0,
            next_global_addr: 0,
        }
    }

    //--------------------------------------------------------------------------
    // Symbol registration (the statement layer's side of the contract)
    //--------------------------------------------------------------------------

    pub fn tag(&mut self, name: &str) -> Tag {
        self.symbols.add_tag(name)
    }

    /// Registers the tag carried by rational literals.
    pub fn set_rational_tag(&mut self, name: &str) {
        self.rational_tag = self.symbols.add_tag(name);
    }

    pub fn declare_constant(&mut self, name: &str, value: Cell, tag_name: &str) {
        let tag = self.symbols.add_tag(tag_name);
        self.symbols.add_constant(name, value, tag);
    }

    pub fn declare_global(&mut self, name: &str, tag_name: &str) {
        let tag = self.symbols.add_tag(tag_name);
        let addr = self.alloc_global(1);
        self.symbols.add_variable(name, false, tag, addr, 0);
    }

    pub fn declare_local(&mut self, name: &str, tag_name: &str) {
        let tag = self.symbols.add_tag(tag_name);
        let addr = self.alloc_local(1);
        self.symbols.add_variable(name, true, tag, addr, 0);
    }

    /// A `const`-qualified variable: readable, never assignable.
    pub fn declare_const_local(&mut self, name: &str, tag_name: &str) {
        let tag = self.symbols.add_tag(tag_name);
        let addr = self.alloc_local(1);
        self.symbols.add_variable(name, true, tag, addr, USAGE_CONST);
    }

    /// A reference parameter of the function under compilation.
    pub fn declare_reference(&mut self, name: &str, tag_name: &str) {
        let tag = self.symbols.add_tag(tag_name);
        let addr = self.alloc_local(1);
        self.symbols.add_reference(name, tag, addr);
    }

    pub fn declare_array(&mut self, name: &str, tag_name: &str, dims: &[Cell]) {
        self.declare_array_full(name, tag_name, dims, &vec![None; dims.len()], false, false);
    }

    pub fn declare_packed_array(&mut self, name: &str, tag_name: &str, dims: &[Cell]) {
        self.declare_array_full(name, tag_name, dims, &vec![None; dims.len()], true, false);
    }

    /// Registers an array whose dimensions may carry named-index tables;
    /// each table is closed with a sentinel row holding the total length.
    pub fn declare_array_full(
        &mut self, name: &str, tag_name: &str, dims: &[Cell],
        names: &[Option<Vec<FieldEntry>>], packed: bool, by_ref: bool,
    ) {
        let tag = self.symbols.add_tag(tag_name);
        let total: Cell = dims.iter().product::<Cell>().max(1);
        let addr = self.alloc_global(total);
        let usage = if packed { USAGE_PACKED } else { 0 };
        self.symbols.add_array(name, false, by_ref, tag, addr, usage, dims, names);
    }

    pub fn declare_function(&mut self, name: &str, tag_name: &str, args: Vec<ArgInfo>) {
        let tag = self.symbols.add_tag(tag_name);
        self.symbols.add_function(name, tag, args, 0, &[]);
    }

    pub fn declare_native(&mut self, name: &str, tag_name: &str, args: Vec<ArgInfo>) {
        let tag = self.symbols.add_tag(tag_name);
        self.symbols.add_function(name, tag, args, USAGE_NATIVE, &[]);
    }

    /// A function whose result is an array of the given shape; calls to it
    /// reserve a hidden heap slot for the result.
    pub fn declare_array_function(
        &mut self, name: &str, tag_name: &str, args: Vec<ArgInfo>, ret_dims: &[Cell],
    ) {
        let tag = self.symbols.add_tag(tag_name);
        self.symbols.add_function(name, tag, args, 0, ret_dims);
    }

    pub fn mark_deprecated(&mut self, name: &str, note: &str) {
        if let Some(id) = self.symbols.find_global(name) {
            let sym = self.symbols.get_mut(id);
            sym.usage |= USAGE_DEPRECATED;
            sym.deprecation = Some(note.to_string());
        }
    }

    /// Registers a user-defined operator. `tag2_name` is `None` for unary
    /// operators. The operator body is an ordinary function; only the
    /// mangled name, which is returned, makes it an operator.
    pub fn declare_operator(
        &mut self, oper: &str, tag1_name: &str, tag2_name: Option<&str>, result_tag_name: &str,
        args: Vec<ArgInfo>,
    ) -> String {
        let tag1 = self.symbols.add_tag(tag1_name);
        let result_tag = self.symbols.add_tag(result_tag_name);
        let name = match tag2_name {
            Some(tag2_name) => {
                let tag2 = self.symbols.add_tag(tag2_name);
                operator_symname(oper, tag1, tag2, 2)
            }
            None => operator_symname(oper, tag1, 0, 1),
        };
        self.symbols.add_function(&name, result_tag, args, 0, &[]);
        name
    }

    /// Marks the function whose body the following expressions belong to
    /// (enables the operator-recursion guard and stack watermarking).
    pub fn set_current_function(&mut self, name: &str) {
        self.cur_func = self.symbols.find_global(name);
    }

    pub fn declare_automaton(&mut self, name: &str) -> usize {
        self.symbols.add_automaton(name)
    }

    pub fn declare_state(&mut self, name: &str, automaton: usize, value: Cell) {
        self.symbols.add_state(name, automaton, value);
    }

    /// The data segment built up so far: literal queues flushed after each
    /// compiled expression (string/array literals, dumped default arrays).
    pub fn data_segment(&self) -> &[Cell] {
        &self.data
    }

    fn alloc_local(&mut self, cells: Cell) -> Cell {
        let addr = self.next_local_addr;
        self.next_local_addr += cells * CELL_SIZE;
        addr
    }

    fn alloc_global(&mut self, cells: Cell) -> Cell {
        let addr = self.next_global_addr;
        self.next_global_addr += cells * CELL_SIZE;
        addr
    }

    //--------------------------------------------------------------------------
    // Compilation
    //--------------------------------------------------------------------------

    /// Compiles one expression: the browse pass measures, the write pass
    /// emits. Only the write pass's diagnostics are kept (the browse pass
    /// would repeat every one of them).
    pub fn compile_expression(&mut self, source_text: &str) -> Result<Compilation, CompileError> {
        self.compile_inner(source_text, false)
    }

    /// Like `compile_expression`, but for an expression in test position
    /// (`if`/`while` conditions), where a plain assignment is suspicious.
    pub fn compile_test_expression(&mut self, source_text: &str) -> Result<Compilation, CompileError> {
        self.compile_inner(source_text, true)
    }

    fn compile_inner(&mut self, source_text: &str, in_test: bool) -> Result<Compilation, CompileError> {
        let source = InputSource::from_string(source_text);
        let mut cg = CodeGen::new();
        let mut diags = Diagnostics::new();

        self.heaplist.clear();
        self.run_pass(&source, &mut cg, &mut diags, Status::Browse, in_test)?;

        cg.reset();
        diags.clear(); // the write pass re-reports everything
        let result = self.run_pass(&source, &mut cg, &mut diags, Status::Write, in_test)?;
        debug_assert!(self.heaplist.is_empty(), "write pass drained the branch-heap table");

        // flush the literal queue into the data segment
        self.glb_declared += self.literals.len() as Cell;
        self.data.append(&mut self.literals);

        Ok(Compilation {
            code: cg.take_image(),
            diagnostics: diags,
            ident: result.ident,
            constval: result.constval,
            tag: result.tag,
            side_effect: result.side_effect,
        })
    }

    fn run_pass(
        &mut self, source: &InputSource, cg: &mut CodeGen, diags: &mut Diagnostics,
        status: Status, in_test: bool,
    ) -> Result<eval::ExprResult, CompileError> {
        self.literals.clear();
        let mut eval = ExprEval {
            lex: Lexer::new(source),
            source,
            symbols: &mut self.symbols,
            cg,
            diags,
            heaplist: &mut self.heaplist,
            defarray_addrs: &mut self.defarray_addrs,
            literals: &mut self.literals,
            status,
            glb_declared: self.glb_declared,
            rational_tag: self.rational_tag,
            cur_func: self.cur_func,
            decl_heap: 0,
            bitwise_opercount: 0,
            in_test,
            side_effect: false,
            fatal: None,
            last_symbol: String::new(),
            nest_stkusage: 0,
            nesting: 0,
        };
        let result = eval.expression(true);
        match eval.fatal.take() {
            Some(fatal) => Err(fatal),
            None => Ok(result),
        }
    }
}
