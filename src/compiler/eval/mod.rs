mod arrays;
mod binary;
mod call;
mod ops;
mod primary;
mod userop;
pub(crate) mod value;

pub(crate) use self::arrays::{array_levelsize, array_totalsize};
pub(crate) use self::ops::OperId;
pub(crate) use self::userop::{matchtag, operator_symname};

use crate::common::*;
use super::codegen::{CodeGen, Instr, Op, Reg};
use super::inputsource::{CompileError, Diagnostics, ErrorCode, InputSource};
use super::lexer::{Lexer, Token};
use super::symbols::{
    FieldEntry, Ident, SymbolId, SymbolTable, USAGE_CONST, USAGE_DEFINED, USAGE_READ,
    USAGE_RETVALUE, USAGE_WRITTEN,
};
use super::{BranchHeap, Status};
use self::ops::{LIST10, LIST3, LIST4, LIST5, LIST6, LIST7, LIST8, LIST9};
use self::value::{Value, UNTRACKED_IDX};

/// Signature of one hierarchy level; each level takes the next-lower one
/// as a plain function so the plunge helpers stay generic.
pub(crate) type HierFn<'a> = fn(&mut ExprEval<'a>, &mut Value) -> bool;

/// Result of a fully evaluated expression, for the statement layer.
#[derive(Debug, Clone)]
pub(crate) struct ExprResult {
    pub ident: Ident,
    pub constval: Cell,
    pub tag: Tag,
    pub sym: Option<SymbolId>,
    /// Whether evaluation had an observable effect; an expression
    /// statement without one deserves a diagnostic from the caller.
    pub side_effect: bool,
}

/// The expression evaluator: recursive descent through the fourteen
/// hierarchy levels, with semantic analysis and code emission interleaved.
/// All the state the original kept in file-scope globals lives here and is
/// saved/restored explicitly at every entry that can nest.
pub(crate) struct ExprEval<'a> {
    pub(crate) lex: Lexer<'a>,
    pub(crate) source: &'a InputSource,
    pub(crate) symbols: &'a mut SymbolTable,
    pub(crate) cg: &'a mut CodeGen,
    pub(crate) diags: &'a mut Diagnostics,
    /// FIFO side-table of per-branch heap compensations, filled by the
    /// browse pass and drained by the write pass.
    pub(crate) heaplist: &'a mut VecDeque<BranchHeap>,
    /// First-use static addresses of default array arguments.
    pub(crate) defarray_addrs: &'a mut HashMap<(SymbolId, usize), Cell>,
    /// The literal queue: string and array literals of this expression.
    pub(crate) literals: &'a mut Vec<Cell>,
    pub(crate) status: Status,
    /// Size in cells of the data segment preceding the literal queue.
    pub(crate) glb_declared: Cell,
    pub(crate) rational_tag: Tag,
    /// The function whose body is being compiled, if any.
    pub(crate) cur_func: Option<SymbolId>,
    /// Net heap cells speculatively reserved by the current expression;
    /// restored to its entry value by every component that allocates.
    pub(crate) decl_heap: Cell,
    pub(crate) bitwise_opercount: u32,
    /// Inside a test expression (`if (...)` etc.); assignments there are
    /// suspicious.
    pub(crate) in_test: bool,
    pub(crate) side_effect: bool,
    /// Set when symbol-arena exhaustion hits; the driver turns it into the
    /// fatal result after the pass completes.
    pub(crate) fatal: Option<CompileError>,
    /// Name of the last symbol read by `primary`, for subscript/call
    /// diagnostics on unresolved names.
    pub(crate) last_symbol: String,
    /// Worst-case stack usage of the call nest being compiled.
    pub(crate) nest_stkusage: Cell,
    pub(crate) nesting: u32,
}

impl<'a> ExprEval<'a> {
    //--------------------------------------------------------------------------
    // Diagnostics and emission helpers
    //--------------------------------------------------------------------------

    pub(crate) fn error(&mut self, code: ErrorCode) {
        self.diags.report(self.source, self.lex.token_pos(), code, &[]);
    }

    pub(crate) fn error_args(&mut self, code: ErrorCode, args: &[&str]) {
        self.diags.report(self.source, self.lex.token_pos(), code, args);
    }

    /// Reports with a nearest-match suggestion when one exists.
    pub(crate) fn error_suggest(&mut self, code: ErrorCode, name: &str) {
        match self.symbols.closest_symbol(name) {
            Some(suggestion) => self.diags.report_suggest(
                self.source, self.lex.token_pos(), code, &[name], &suggestion,
            ),
            None => self.diags.report(self.source, self.lex.token_pos(), code, &[name]),
        }
    }

    pub(crate) fn need_token(&mut self, expected: &Token) -> bool {
        self.lex.need_token(self.diags, expected)
    }

    /// Reads the value denoted by an lvalue descriptor into the primary
    /// register (for array elements, through the address already there).
    pub(crate) fn rvalue(&mut self, lval: &mut Value) {
        match lval.ident {
            Ident::ArrayCell => self.cg.emit(Instr::LoadInd),
            Ident::ArrayChar => self.cg.emit(Instr::LoadCharInd),
            Ident::Reference => {
                let id = lval.sym.expect("reference descriptor has a symbol");
                self.cg.emit(Instr::LoadRef(Reg::Pri, id));
            }
            Ident::Variable => {
                let id = lval.sym.expect("variable descriptor has a symbol");
                self.cg.emit(Instr::LoadSym(Reg::Pri, id));
            }
            other => debug_assert!(false, "rvalue on {:?}", other),
        }
        if let Some(id) = lval.sym {
            self.symbols.mark_usage(id, USAGE_READ);
        }
    }

    /// Stores the primary register into the location an lvalue descriptor
    /// denotes (for array elements, the address is in the secondary
    /// register).
    pub(crate) fn store(&mut self, lval: &Value) {
        match lval.ident {
            Ident::ArrayCell => self.cg.emit(Instr::StoreInd),
            Ident::ArrayChar => self.cg.emit(Instr::StoreCharInd),
            Ident::Reference => {
                let id = lval.sym.expect("reference descriptor has a symbol");
                self.cg.emit(Instr::StoreRef(id));
            }
            Ident::Variable => {
                let id = lval.sym.expect("variable descriptor has a symbol");
                self.cg.emit(Instr::StoreSym(id));
            }
            other => debug_assert!(false, "store on {:?}", other),
        }
        if let Some(id) = lval.sym {
            self.symbols.mark_usage(id, USAGE_WRITTEN);
        }
    }

    pub(crate) fn address(&mut self, id: SymbolId, reg: Reg) {
        self.cg.emit(Instr::Address(reg, id));
        self.symbols.mark_usage(id, USAGE_READ);
    }

    /// In-place increment of an lvalue.
    fn inc(&mut self, lval: &Value) {
        match lval.ident {
            Ident::Variable => self.cg.emit(Instr::IncSym(lval.sym.unwrap())),
            Ident::Reference => self.cg.emit(Instr::IncRef(lval.sym.unwrap())),
            Ident::ArrayCell => self.cg.emit(Instr::IncInd),
            Ident::ArrayChar => self.cg.emit(Instr::IncChar),
            other => debug_assert!(false, "inc on {:?}", other),
        }
    }

    fn dec(&mut self, lval: &Value) {
        match lval.ident {
            Ident::Variable => self.cg.emit(Instr::DecSym(lval.sym.unwrap())),
            Ident::Reference => self.cg.emit(Instr::DecRef(lval.sym.unwrap())),
            Ident::ArrayCell => self.cg.emit(Instr::DecInd),
            Ident::ArrayChar => self.cg.emit(Instr::DecChar),
            other => debug_assert!(false, "dec on {:?}", other),
        }
    }

    /// Emits a heap adjustment unless it is a no-op.
    pub(crate) fn modheap(&mut self, bytes: Cell) {
        if bytes != 0 {
            self.cg.emit(Instr::ModHeap(bytes));
        }
    }

    pub(crate) fn value_symbol_name(&self, lval: &Value) -> String {
        match lval.sym {
            Some(id) if !self.symbols.get(id).name.is_empty() => self.symbols.get(id).name.clone(),
            _ => "-unknown-".to_string(),
        }
    }

    pub(crate) fn value_is_function(&self, lval: &Value) -> bool {
        match lval.sym {
            Some(id) => {
                let ident = self.symbols.get(id).ident;
                ident == Ident::Function || ident == Ident::RefFunc
            }
            None => false,
        }
    }

    /// A function used in an expression should return a value. For a
    /// defined function this is checked now (directly recursive calls
    /// excepted); for a forward reference the requirement is recorded so
    /// the eventual definition can check it.
    pub(crate) fn checkfunction(&mut self, lval: &Value) {
        let id = match lval.sym {
            Some(id) => id,
            None => return,
        };
        let (ident, usage, name) = {
            let sym = self.symbols.get(id);
            (sym.ident, sym.usage, sym.name.clone())
        };
        if ident != Ident::Function && ident != Ident::RefFunc {
            return; // no known symbol, or not a function result
        }
        if (usage & USAGE_DEFINED) != 0 {
            if Some(id) != self.cur_func && (usage & USAGE_RETVALUE) == 0 {
                self.error_args(ErrorCode::ShouldReturnValue, &[&name]);
            }
        } else {
            self.symbols.mark_usage(id, USAGE_RETVALUE);
        }
    }

    //--------------------------------------------------------------------------
    // Entry point
    //--------------------------------------------------------------------------

    /// Evaluates one full expression: the statement layer's entry. Any
    /// heap space transiently reserved by the expression is unwound here.
    pub(crate) fn expression(&mut self, chkfuncresult: bool) -> ExprResult {
        let locheap = self.decl_heap;
        let mut lval = Value::new();

        if self.hier14(&mut lval) {
            self.rvalue(&mut lval);
        }
        // scrap any arrays left on the heap
        debug_assert!(self.decl_heap >= locheap);
        self.modheap((locheap - self.decl_heap) * CELL_SIZE);
        self.decl_heap = locheap;

        if chkfuncresult {
            self.checkfunction(&lval);
        }
        ExprResult {
            ident: lval.ident,
            constval: lval.constval,
            tag: lval.tag,
            sym: lval.sym,
            side_effect: self.side_effect,
        }
    }

    //--------------------------------------------------------------------------
    // The hierarchy
    //--------------------------------------------------------------------------

    /// Lowest hierarchy level: assignment (simple and compound), including
    /// array assignment and the self-assignment check through the
    /// constant-index traces.
    pub(crate) fn hier14(&mut self, lval1: &mut Value) -> bool {
        let bwcount = self.bitwise_opercount;
        self.bitwise_opercount = 0;

        // give this level its own constant-index trace unless an enclosing
        // assignment already tracks one
        let had_trace = lval1.arrayidx.is_some();
        if !had_trace {
            lval1.arrayidx = Some([UNTRACKED_IDX; DIMEN_MAX]);
        }

        let mut lvalue = self.plnge1(Self::hier13, lval1);
        if lval1.ident != Ident::ArrayCell && lval1.ident != Ident::ArrayChar {
            lval1.arrayidx = None;
        }
        if lval1.ident == Ident::Constant {
            // load constant here
            self.cg.ldconst(lval1.constval, Reg::Pri);
        }

        let tok = self.lex.lex();
        let oper: Option<Op> = match tok {
            Token::AssignOr => Some(Op::Or),
            Token::AssignXor => Some(Op::Xor),
            Token::AssignAnd => Some(Op::And),
            Token::AssignAdd => Some(Op::Add),
            Token::AssignSub => Some(Op::Sub),
            Token::AssignMul => Some(Op::Mult),
            Token::AssignDiv => Some(Op::Div),
            Token::AssignMod => Some(Op::Mod),
            Token::AssignShru => Some(Op::Shru),
            Token::AssignShr => Some(Op::Shr),
            Token::AssignShl => Some(Op::Shl),
            Token::Assign => {
                if self.in_test {
                    self.error(ErrorCode::PossiblyUnintendedAssignment);
                }
                None // simple assignment
            }
            _ => {
                self.lex.lex_push();
                self.bitwise_opercount = bwcount;
                if !had_trace {
                    lval1.arrayidx = None;
                }
                return lvalue;
            }
        };

        // it was an assignment; first a few special cases, then the general
        if lval1.ident == Ident::ArrayChar {
            // assignment to a packed character in a cell is permitted
            lvalue = true;
        } else if lval1.ident == Ident::Array || lval1.ident == Ident::RefArray {
            // array assignment is permitted too (with restrictions)
            if oper.is_some() {
                self.error(ErrorCode::ArrayAssignmentMustBeSimple);
                if !had_trace {
                    lval1.arrayidx = None;
                }
                return false;
            }
            if lval1.sym.is_none() {
                self.error(ErrorCode::MustBeLvalue);
                if !had_trace {
                    lval1.arrayidx = None;
                }
                return false;
            }
            lvalue = true;
        }

        // the operand on the left side of an assignment must be an lvalue,
        // and may not be "const"; gobble up the right side regardless so
        // the parse continues on well-formed input
        let left_is_const = lval1
            .sym
            .map(|id| (self.symbols.get(id).usage & USAGE_CONST) != 0)
            .unwrap_or(false);
        if !lvalue || left_is_const {
            let mut lval2 = Value::new();
            self.hier14(&mut lval2);
            self.error(ErrorCode::MustBeLvalue);
            if !had_trace {
                lval1.arrayidx = None;
            }
            return false;
        }

        let lval3 = lval1.clone(); // save the target for the actual store
        let mut lval2 = Value::new();
        if lval1.ident == Ident::ArrayCell
            || lval1.ident == Ident::ArrayChar
            || lval1.ident == Ident::Array
            || lval1.ident == Ident::RefArray
        {
            // if indirect fetch: save the cell address
            if oper.is_some() {
                self.cg.emit(Instr::Push(Reg::Pri));
                self.rvalue(lval1);
            }
            lval2.arrayidx = Some([UNTRACKED_IDX; DIMEN_MAX]);
            self.plnge2(oper, false, Self::hier14, lval1, &mut lval2);
            if lval2.ident != Ident::ArrayCell && lval2.ident != Ident::ArrayChar {
                lval2.arrayidx = None;
            }
            if oper.is_some() {
                self.cg.emit(Instr::Pop(Reg::Alt));
            }
            if oper.is_none()
                && lval3.arrayidx.is_some()
                && lval2.arrayidx.is_some()
                && lval3.ident == lval2.ident
                && lval3.sym == lval2.sym
                && lval3.arrayidx == lval2.arrayidx
            {
                let name = self.value_symbol_name(&lval3);
                self.error_args(ErrorCode::SelfAssignment, &[&name]);
            }
        } else {
            if oper.is_some() {
                self.rvalue(lval1);
                self.plnge2(oper, false, Self::hier14, lval1, &mut lval2);
            } else {
                // a direct fetch and a simple assignment need no push/pop
                // pair around the right side
                if self.hier14(&mut lval2) {
                    self.rvalue(&mut lval2);
                } else if lval2.ident == Ident::Variable {
                    lval2.ident = Ident::Expression; // mark as "rvalue"
                }
                self.checkfunction(&lval2);
                // do lval2 and lval3 refer to the same variable?
                if lval2.ident == Ident::Variable
                    && lval3.ident == lval2.ident
                    && lval3.sym == lval2.sym
                {
                    let name = self.value_symbol_name(&lval3);
                    self.error_args(ErrorCode::SelfAssignment, &[&name]);
                }
            }
        }

        // an array element spanning several cells through a named field is
        // itself assignable as a sub-array, but only under a simple
        // assignment from an array
        let leftarray = lval3.is_array()
            || (self.is_pseudo_array(&lval3) && oper.is_none() && lval2.is_array());
        let mut copylength: Cell = 0;
        if leftarray {
            copylength = self.checkarrays(&lval3, &lval2);
        } else if lval2.is_array() {
            self.error(ErrorCode::MustBeAssignedToArray);
        }

        if leftarray {
            // single-dimensional data (or two root arrays) can be copied
            // wholesale; copying into a sub-array must preserve the
            // destination's indirection vectors
            let sym3 = lval3.sym.expect("array assignment target has a symbol");
            let (level3, length3, parent3) = {
                let sym = self.symbols.get(sym3);
                (sym.array().level, sym.array().length, sym.parent)
            };
            let parent2 = lval2.sym.map(|id| self.symbols.get(id).parent);
            if level3 == 0 || (lval2.sym.is_some() && parent3.is_none() && parent2 == Some(None)) {
                self.cg.emit(Instr::MemCopy(copylength * CELL_SIZE));
            } else {
                let subsym = self.symbols.find_dependent(sym3).expect("sub-dimension exists");
                let sublength = self.symbols.get(subsym).array().length;
                self.cg.emit(Instr::Copy2d { major: length3, minor: sublength });
            }
        } else {
            let mut newtag = lval2.tag;
            let mut lval3_store = lval3.clone();
            self.check_userop(OperId::Assign, lval2.tag, lval3.tag, 2, Some(&mut lval3_store), &mut newtag);
            lval2.tag = newtag;
            self.store(&lval3); // now store the expression result
        }
        if oper.is_none() && !matchtag(lval3.tag, lval2.tag, true) {
            self.error(ErrorCode::TagMismatch); // (with an operation, plnge2 already checked)
        }
        if let Some(id) = lval3.sym {
            self.symbols.mark_usage(id, USAGE_WRITTEN);
        }
        self.side_effect = true;
        self.bitwise_opercount = bwcount;
        lval1.ident = Ident::Expression;
        if !had_trace {
            lval1.arrayidx = None;
        }
        false // the result of an assignment is no lvalue
    }

    /// Conditional (ternary) expression, with the two-pass heap
    /// equilibration: the browse pass measures each branch's transient
    /// heap usage and records the compensation either branch needs; the
    /// write pass injects those compensations at branch entry so the heap
    /// pointer ends identically no matter which branch ran.
    pub(crate) fn hier13(&mut self, lval: &mut Value) -> bool {
        let lvalue = self.plnge1(Self::hier12, lval);
        if !self.lex.match_token(&Token::Question) {
            return lvalue;
        }

        let locheap = self.decl_heap; // save the current heap delta
        let flab1 = self.cg.get_label();
        let flab2 = self.cg.get_label();
        let mut lval2 = Value::new();

        if lvalue {
            self.rvalue(lval);
        } else if lval.ident == Ident::Constant {
            self.cg.ldconst(lval.constval, Reg::Pri);
            self.error(if lval.constval != 0 {
                ErrorCode::RedundantTestAlwaysTrue
            } else {
                ErrorCode::RedundantTestAlwaysFalse
            });
        } else {
            self.checkfunction(lval);
        }

        // max. heap compensation of either branch, from the browse pass
        let mut heap1: Cell = 0;
        let mut heap2: Cell = 0;
        let node_idx = match self.status {
            Status::Browse => {
                // push the node right now, otherwise nested conditionals
                // would pop in the wrong order during the write pass
                self.heaplist.push_back(BranchHeap { first: 0, second: 0 });
                Some(self.heaplist.len() - 1)
            }
            Status::Write => {
                let node = self.heaplist.pop_front().expect("browse pass pushed a heap node");
                heap1 = node.first;
                heap2 = node.second;
                None
            }
        };

        self.cg.emit(Instr::JumpEq0(flab1));
        let save_allowtags = self.lex.allow_tags;
        self.lex.allow_tags = false; // the colon is a special token here
        if self.status == Status::Write {
            self.modheap(heap1 * CELL_SIZE);
            self.decl_heap += heap1; // equilibrate the heap (see below)
        }
        if self.hier13(lval) {
            self.rvalue(lval);
        }
        if lval.ident == Ident::Constant {
            self.cg.ldconst(lval.constval, Reg::Pri);
        }
        self.lex.allow_tags = save_allowtags;
        heap1 = self.decl_heap - locheap; // heap space used in the true branch
        debug_assert!(heap1 >= 0);
        self.decl_heap = locheap;
        self.cg.emit(Instr::Jump(flab2));
        self.cg.set_label(flab1);
        self.need_token(&Token::Colon);
        if self.status == Status::Write {
            self.modheap(heap2 * CELL_SIZE);
            self.decl_heap += heap2;
        }
        let save_allowtags = self.lex.allow_tags;
        self.lex.allow_tags = false;
        if self.hier13(&mut lval2) {
            self.rvalue(&mut lval2);
        }
        if lval2.ident == Ident::Constant {
            self.cg.ldconst(lval2.constval, Reg::Pri);
        }
        self.lex.allow_tags = save_allowtags;
        heap2 = self.decl_heap - locheap; // heap space used in the false branch
        debug_assert!(heap2 >= 0);

        let array1 = lval.is_array();
        let array2 = lval2.is_array();
        if array1 && !array2 {
            let name = self.value_symbol_name(lval);
            self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
        } else if !array1 && array2 {
            let name = self.value_symbol_name(&lval2);
            self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
        } else if array1 && array2 {
            let (length1, level1, names1) = self.branch_array_shape(lval);
            let (length2, level2, names2) = self.branch_array_shape(&lval2);
            if level1 != level2 {
                self.error(ErrorCode::ArrayDimensionMismatch);
            } else if names1.is_some()
                && (lval2.sym.is_none() || names2.is_none() || names1 != names2)
            {
                self.error(ErrorCode::ArraySizeMismatch);
            }
            if level1 == 0 && level2 == 0 {
                // for single-dimensional arrays, keep the larger length
                if length1.abs() < length2.abs() {
                    lval.constval = length2;
                }
            } else if level1 > 0 && level2 > 0 {
                // multi-dimensional arrays must match exactly
                debug_assert!(lval.sym.is_some() && lval2.sym.is_some());
                let left = lval.clone();
                self.checkarrays(&left, &lval2);
            }
        }
        if !matchtag(lval.tag, lval2.tag, false) {
            self.error(ErrorCode::TagMismatch); // between the two branches
        }
        self.cg.set_label(flab2);
        if let Some(idx) = node_idx {
            // record max-heap1 and max-heap2: the write pass injects these
            // compensations because only one branch executes at run time,
            // yet the heap result may be consumed by the enclosing
            // expression and so cannot be unwound per branch
            let max = heap1.max(heap2);
            self.heaplist[idx] = BranchHeap { first: max - heap1, second: max - heap2 };
            self.decl_heap = locheap + max;
        }
        debug_assert!(self.status != Status::Write || heap1 == heap2);
        if lval.ident == Ident::Array {
            lval.ident = Ident::RefArray;
        } else if lval.ident != Ident::RefArray {
            lval.ident = Ident::Expression;
        }
        // a warning is due if the result of the conditional goes unused
        self.side_effect = false;
        false
    }

    /// Length/level/named-table triple of a conditional branch's array
    /// result.
    fn branch_array_shape(&self, lval: &Value) -> (Cell, u16, Option<Vec<FieldEntry>>) {
        match lval.sym {
            Some(id) => {
                let sym = self.symbols.get(id);
                let info = sym.array();
                let length = if lval.constval == 0 { info.length } else { lval.constval };
                (length, info.level, info.names.clone())
            }
            None => (lval.constval, 0, None),
        }
    }

    pub(crate) fn hier12(&mut self, lval: &mut Value) -> bool {
        self.skim(&Token::LogicalOr, true, 1, 0, Self::hier11, lval)
    }

    pub(crate) fn hier11(&mut self, lval: &mut Value) -> bool {
        self.skim(&Token::LogicalAnd, false, 0, 1, Self::hier10, lval)
    }

    pub(crate) fn hier10(&mut self, lval: &mut Value) -> bool {
        // ==, !=
        self.plnge(&LIST10, Self::hier9, lval, Some("bool"), true)
    }

    pub(crate) fn hier9(&mut self, lval: &mut Value) -> bool {
        // <=, >=, <, >
        self.plnge_rel(&LIST9, Self::hier8, lval)
    }

    pub(crate) fn hier8(&mut self, lval: &mut Value) -> bool {
        // |
        self.plnge(&LIST8, Self::hier7, lval, None, false)
    }

    pub(crate) fn hier7(&mut self, lval: &mut Value) -> bool {
        // ^
        self.plnge(&LIST7, Self::hier6, lval, None, false)
    }

    pub(crate) fn hier6(&mut self, lval: &mut Value) -> bool {
        // &
        self.plnge(&LIST6, Self::hier5, lval, None, false)
    }

    pub(crate) fn hier5(&mut self, lval: &mut Value) -> bool {
        // <<, >>, >>>
        self.plnge(&LIST5, Self::hier4, lval, None, false)
    }

    pub(crate) fn hier4(&mut self, lval: &mut Value) -> bool {
        // +, -
        self.plnge(&LIST4, Self::hier3, lval, None, false)
    }

    pub(crate) fn hier3(&mut self, lval: &mut Value) -> bool {
        // *, /, %
        self.plnge(&LIST3, Self::hier2, lval, None, false)
    }

    /// Prefix and postfix operators, `sizeof`/`tagof`/`defined`/`state`
    /// and tag overrides.
    pub(crate) fn hier2(&mut self, lval: &mut Value) -> bool {
        let tok = self.lex.lex();
        match tok {
            Token::Increment => {
                // ++lval
                if !self.hier2(lval) {
                    self.error(ErrorCode::MustBeLvalue);
                    return false;
                }
                if self.lvalue_is_const(lval) {
                    self.error(ErrorCode::MustBeLvalue); // assignment to const
                    return false;
                }
                let mut newtag = lval.tag;
                if !self.check_userop(OperId::Inc, lval.tag, 0, 1, Some(&mut *lval), &mut newtag) {
                    let target = lval.clone();
                    self.inc(&target); // increase the variable first
                }
                lval.tag = newtag;
                self.rvalue(lval); // and read the result
                self.side_effect = true;
                false
            }
            Token::Decrement => {
                // --lval
                if !self.hier2(lval) {
                    self.error(ErrorCode::MustBeLvalue);
                    return false;
                }
                if self.lvalue_is_const(lval) {
                    self.error(ErrorCode::MustBeLvalue);
                    return false;
                }
                let mut newtag = lval.tag;
                if !self.check_userop(OperId::Dec, lval.tag, 0, 1, Some(&mut *lval), &mut newtag) {
                    let target = lval.clone();
                    self.dec(&target);
                }
                lval.tag = newtag;
                self.rvalue(lval);
                self.side_effect = true;
                false
            }
            Token::Tilde => {
                // one's complement
                if self.hier2(lval) {
                    self.rvalue(lval);
                } else if lval.is_array() {
                    let name = self.value_symbol_name(lval);
                    self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
                }
                self.cg.emit(Instr::Invert);
                lval.constval = !lval.constval;
                if lval.ident != Ident::Constant {
                    lval.ident = Ident::Expression;
                }
                false
            }
            Token::Bang => {
                // logical negation
                if self.hier2(lval) {
                    self.rvalue(lval);
                } else if lval.is_array() {
                    let name = self.value_symbol_name(lval);
                    self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
                }
                let mut newtag = lval.tag;
                if self.check_userop(OperId::Not, lval.tag, 0, 1, None, &mut newtag) {
                    lval.tag = newtag;
                    lval.ident = Ident::Expression;
                    lval.constval = 0;
                } else {
                    self.cg.emit(Instr::LogicNot);
                    lval.constval = (lval.constval == 0) as Cell;
                    lval.tag = self.symbols.add_tag("bool");
                    if lval.ident != Ident::Constant {
                        lval.ident = Ident::Expression;
                    }
                }
                false
            }
            Token::Minus => {
                // unary minus (two's complement)
                if self.hier2(lval) {
                    self.rvalue(lval);
                } else if lval.is_array() {
                    let name = self.value_symbol_name(lval);
                    self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
                }
                if lval.ident == Ident::Constant && lval.tag == self.rational_tag && self.rational_tag != 0 {
                    // a rational constant negates by flipping the sign of
                    // the stored IEEE value
                    let value = f64::from_bits(lval.constval as u64);
                    lval.constval = (-value).to_bits() as Cell;
                } else {
                    let mut newtag = lval.tag;
                    if self.check_userop(OperId::Neg, lval.tag, 0, 1, None, &mut newtag) {
                        lval.tag = newtag;
                        lval.ident = Ident::Expression;
                        lval.constval = 0;
                    } else {
                        self.cg.emit(Instr::Neg);
                        lval.constval = lval.constval.wrapping_neg();
                        if lval.ident != Ident::Constant {
                            lval.ident = Ident::Expression;
                        }
                    }
                }
                false
            }
            Token::Label(name) => {
                // tag override
                let tag = self.symbols.add_tag(&name);
                let lvalue = self.hier2(lval);
                lval.tag = tag;
                lvalue
            }
            Token::Defined => self.hier2_defined(lval),
            Token::Sizeof => self.hier2_sizeof(lval),
            Token::Tagof => self.hier2_tagof(lval),
            Token::State => self.hier2_state(lval),
            _ => {
                self.lex.lex_push();
                let lvalue = self.hier1(lval);
                // check for postfix operators; a statement terminator ends
                // the search
                if self.lex.match_token(&Token::Semicolon) {
                    self.lex.lex_push();
                    return lvalue;
                } else if self.lex.match_token(&Token::End) {
                    return lvalue;
                }
                let tok = self.lex.lex();
                match tok {
                    Token::Increment => {
                        // lval++
                        if !lvalue {
                            self.error(ErrorCode::MustBeLvalue);
                            return false;
                        }
                        if self.lvalue_is_const(lval) {
                            self.error(ErrorCode::MustBeLvalue);
                            return false;
                        }
                        // on incrementing array cells the address must be
                        // saved while the old value ends up in the primary
                        // register
                        let saveresult =
                            lval.ident == Ident::ArrayCell || lval.ident == Ident::ArrayChar;
                        if saveresult {
                            self.cg.emit(Instr::Push(Reg::Pri)); // save address
                        }
                        self.rvalue(lval); // read the current value
                        if saveresult {
                            self.cg.emit(Instr::SwapStack); // restore address
                        }
                        let mut newtag = lval.tag;
                        if !self.check_userop(OperId::Inc, lval.tag, 0, 1, Some(&mut *lval), &mut newtag) {
                            let target = lval.clone();
                            self.inc(&target); // increase variable afterwards
                        }
                        lval.tag = newtag;
                        if saveresult {
                            self.cg.emit(Instr::Pop(Reg::Pri)); // restore old value
                        }
                        self.side_effect = true;
                        false
                    }
                    Token::Decrement => {
                        // lval--
                        if !lvalue {
                            self.error(ErrorCode::MustBeLvalue);
                            return false;
                        }
                        if self.lvalue_is_const(lval) {
                            self.error(ErrorCode::MustBeLvalue);
                            return false;
                        }
                        let saveresult =
                            lval.ident == Ident::ArrayCell || lval.ident == Ident::ArrayChar;
                        if saveresult {
                            self.cg.emit(Instr::Push(Reg::Pri));
                        }
                        self.rvalue(lval);
                        if saveresult {
                            self.cg.emit(Instr::SwapStack);
                        }
                        let mut newtag = lval.tag;
                        if !self.check_userop(OperId::Dec, lval.tag, 0, 1, Some(&mut *lval), &mut newtag) {
                            let target = lval.clone();
                            self.dec(&target);
                        }
                        lval.tag = newtag;
                        if saveresult {
                            self.cg.emit(Instr::Pop(Reg::Pri));
                        }
                        self.side_effect = true;
                        false
                    }
                    _ => {
                        self.lex.lex_push();
                        lvalue
                    }
                }
            }
        }
    }

    fn lvalue_is_const(&self, lval: &Value) -> bool {
        lval.sym
            .map(|id| (self.symbols.get(id).usage & USAGE_CONST) != 0)
            .unwrap_or(false)
    }
}
