use crate::common::*;
use crate::compiler::codegen::{Instr, Reg};
use crate::compiler::inputsource::ErrorCode;
use crate::compiler::lexer::Token;
use crate::compiler::symbols::{
    compare_field_tables, levenshtein, ArgInfo, DefaultValue, Ident, SymbolId, MAX_EDIT_DIST,
    USAGE_CONST, USAGE_DEPRECATED, USAGE_NATIVE, USAGE_READ, USAGE_WRITTEN,
};
use crate::compiler::Status;
use super::arrays::array_totalsize;
use super::ops::OperId;
use super::value::Value;
use super::ExprEval;

const ARG_UNHANDLED: u8 = 0;
const ARG_IGNORED: u8 = 1;
const ARG_DONE: u8 = 2;

/// Positional index of a named argument, or the nearest-match suggestion
/// when the name does not exist.
fn find_named_arg(args: &[ArgInfo], name: &str) -> Result<usize, Option<String>> {
    let mut closest: Option<(usize, String)> = None;
    for (idx, arg) in args.iter().enumerate() {
        if arg.ident == Ident::Varargs {
            break;
        }
        if arg.name == name {
            return Ok(idx);
        }
        let dist = levenshtein(&arg.name, name);
        if dist <= MAX_EDIT_DIST && closest.as_ref().map(|(d, _)| dist < *d).unwrap_or(true) {
            closest = Some((dist, arg.name.clone()));
        }
    }
    Err(closest.map(|(_, name)| name))
}

fn lookup_sized(list: &[(String, Cell, u16)], name: &str, level: u16) -> Option<Cell> {
    list.iter().find(|(n, _, l)| n == name && *l == level).map(|(_, v, _)| *v)
}

impl<'a> ExprEval<'a> {
    /// Generates code to call a function: binds positional, named, skipped
    /// and defaulted arguments against the declaration, spills computed
    /// operands bound to reference parameters onto the heap, reserves the
    /// hidden return slot of array-returning functions, and unwinds every
    /// transient heap byte the argument expressions used. The argument
    /// expressions are staged in source order and re-emitted right-to-left
    /// for the actual push sequence.
    pub(crate) fn callfunction(&mut self, sym_id: SymbolId, lval_result: &mut Value) {
        let (ftag, is_native, deprecated) = {
            let sym = self.symbols.get(sym_id);
            (sym.tag, (sym.usage & USAGE_NATIVE) != 0, (sym.usage & USAGE_DEPRECATED) != 0)
        };
        lval_result.ident = Ident::Expression; // preset, may be changed below
        lval_result.constval = 0;
        lval_result.tag = ftag;

        // a function that returns an array receives heap space for the
        // result, with its address as a hidden trailing parameter; the
        // address is also what the caller consumes afterwards
        let symret = self.symbols.find_dependent(sym_id);
        if let Some(ret) = symret {
            debug_assert_eq!(self.symbols.get(ret).ident, Ident::RefArray);
            let retsize = array_totalsize(self.symbols, ret);
            debug_assert!(retsize > 0);
            self.modheap(retsize * CELL_SIZE); // address in ALT
            self.cg.emit(Instr::Push(Reg::Alt)); // the hidden parameter
            if is_native {
                // a native function needs the relocated address, the
                // assignment after the return needs the raw one: push both
                self.cg.emit(Instr::Swap);
                self.cg.emit(Instr::PushReloc);
            }
            self.decl_heap += retsize;
            lval_result.ident = Ident::RefArray;
            lval_result.sym = Some(ret);
        }
        let locheap = self.decl_heap;

        self.nesting += 1;
        debug_assert!(self.nesting > 1 || self.nest_stkusage == 0);

        if deprecated {
            let (name, note) = {
                let sym = self.symbols.get(sym_id);
                (sym.name.clone(), sym.deprecation.clone().unwrap_or_default())
            };
            self.error_args(ErrorCode::DeprecatedFunction, &[&name, &note]);
        }

        // run through the arguments
        let args: Vec<ArgInfo> = self.symbols.get(sym_id).args.clone().unwrap_or_default();
        let mut arglist = [ARG_UNHANDLED; MAX_ARGS];
        let mut arrayszlst: Vec<(String, Cell, u16)> = Vec::new();
        let mut taglst: Vec<(String, Cell, u16)> = Vec::new();
        let mut namedparams = false;
        let mut nargs: usize = 0;
        let mut heapalloc: Cell = 0;
        let mut argidx: usize = 0;

        self.cg.start_reorder();
        if !self.lex.match_token(&Token::CloseParen) {
            loop {
                let argpos;
                if let Some(pname) = self.lex.match_symlabel() {
                    namedparams = true;
                    match find_named_arg(&args, &pname) {
                        Ok(pos) => {
                            self.need_token(&Token::Assign);
                            argpos = pos;
                            argidx = pos;
                        }
                        Err(suggestion) => {
                            // "undefined symbol" here means an unknown
                            // argument name
                            match suggestion {
                                Some(sug) => self.diags.report_suggest(
                                    self.source, self.lex.token_pos(),
                                    ErrorCode::UndefinedSymbol, &[&pname], &sug,
                                ),
                                None => {
                                    self.error_args(ErrorCode::UndefinedSymbol, &[&pname])
                                }
                            }
                            break; // exit the loop, argpos is invalid
                        }
                    }
                } else {
                    if namedparams {
                        self.error(ErrorCode::NamedParamsPrecedePositional);
                    }
                    argpos = nargs;
                }
                // the argument count was already checked at the function's
                // declaration; check again for variable argument lists
                if argpos >= MAX_ARGS {
                    self.error(ErrorCode::TooManyArguments);
                }
                self.cg.mark_arg(argpos); // new expression in the stage
                if argpos < MAX_ARGS && arglist[argpos] != ARG_UNHANDLED {
                    let num = (argpos + 1).to_string();
                    self.error_args(ErrorCode::ArgumentAlreadySet, &[&num]);
                }
                if self.lex.match_token(&Token::Underscore) {
                    // "present, but ignored": the default value applies;
                    // it is filled in with the unspecified arguments below
                    if argpos < MAX_ARGS {
                        arglist[argpos] = ARG_IGNORED;
                    }
                    if argidx >= args.len() || args[argidx].ident == Ident::Varargs {
                        self.error(ErrorCode::ArgumentCountMismatch);
                    } else if args[argidx].default.is_none() {
                        let num = (nargs + 1).to_string();
                        self.error_args(ErrorCode::ArgumentHasNoDefault, &[&num]);
                    }
                    if argidx < args.len() && args[argidx].ident != Ident::Varargs {
                        argidx += 1;
                    }
                } else {
                    if argpos < MAX_ARGS {
                        arglist[argpos] = ARG_DONE;
                    }
                    let mut lval = Value::new();
                    let lvalue = self.hier14(&mut lval);
                    let reloc = self.bind_argument(
                        &args, &mut argidx, &mut lval, lvalue, is_native,
                        &mut arrayszlst, &mut taglst, &mut heapalloc,
                    );
                    if reloc {
                        self.cg.emit(Instr::PushReloc);
                    } else {
                        self.cg.emit(Instr::Push(Reg::Pri));
                    }
                    self.nest_stkusage += 1;
                }
                nargs += 1;
                if self.lex.match_token(&Token::CloseParen) {
                    break;
                }
                if !self.need_token(&Token::Comma) {
                    break; // neither a closing parenthesis nor a comma
                }
                if self.lex.lex_peek() == Token::End {
                    break;
                }
            }
        }

        // check the remaining arguments; they may have default values. The
        // "sizeof"/"tagof" defaults are skipped here and resolved last,
        // from the sizes and tags recorded while binding the others
        for idx in 0..args.len() {
            let arg = args[idx].clone();
            if arg.ident == Ident::Varargs {
                break;
            }
            if arglist[idx] == ARG_DONE {
                continue;
            }
            if matches!(arg.default, Some(DefaultValue::SizeOf { .. }) | Some(DefaultValue::TagOf { .. })) {
                debug_assert_eq!(arg.ident, Ident::Variable);
                continue;
            }
            self.cg.mark_arg(idx);
            match &arg.default {
                Some(default) => {
                    let mut reloc = false;
                    match default {
                        DefaultValue::Array { data, arraysize } => {
                            if is_native {
                                reloc = true;
                            }
                            self.setdefarray(sym_id, idx, data, *arraysize, arg.is_const);
                            if !arg.is_const {
                                heapalloc += *arraysize;
                                self.nest_stkusage += *arraysize;
                            }
                            // keep the lengths of all dimensions
                            debug_assert!(!arg.dim.is_empty());
                            if arg.dim.len() == 1 {
                                arrayszlst.push((arg.name.clone(), *arraysize, 0));
                            } else {
                                for level in 0..arg.dim.len() {
                                    arrayszlst.push((arg.name.clone(), arg.dim[level], level as u16));
                                }
                            }
                        }
                        DefaultValue::Value { value, tag } => {
                            if arg.ident == Ident::Reference {
                                if is_native {
                                    reloc = true;
                                }
                                // the default goes onto the heap; its
                                // address is the argument
                                self.cg.emit(Instr::SetHeap(*value));
                                heapalloc += 1;
                                self.nest_stkusage += 1;
                            } else {
                                self.cg.ldconst(*value, Reg::Pri);
                                let mut dummytag = arg.tags[0];
                                self.check_userop(OperId::Assign, *tag, arg.tags[0], 2, None, &mut dummytag);
                                debug_assert_eq!(dummytag, arg.tags[0]);
                            }
                        }
                        DefaultValue::SizeOf { .. } | DefaultValue::TagOf { .. } => unreachable!(),
                    }
                    if reloc {
                        self.cg.emit(Instr::PushReloc);
                    } else {
                        self.cg.emit(Instr::Push(Reg::Pri));
                    }
                    self.nest_stkusage += 1;
                    if arglist[idx] == ARG_UNHANDLED {
                        nargs += 1;
                    }
                    arglist[idx] = ARG_DONE;
                }
                None => {
                    self.error(ErrorCode::ArgumentCountMismatch);
                    arglist[idx] = ARG_DONE; // do not process it again
                }
            }
        }

        // a second loop for arguments whose default is the "sizeof" or
        // "tagof" of another argument
        for idx in 0..args.len() {
            let arg = &args[idx];
            if arg.ident == Ident::Varargs {
                break;
            }
            if arglist[idx] == ARG_DONE {
                continue;
            }
            self.cg.mark_arg(idx);
            debug_assert_eq!(arg.ident, Ident::Variable); // single cell
            let value = match &arg.default {
                Some(DefaultValue::SizeOf { arg: refname, level }) => {
                    // if the referenced argument was not an array, the
                    // declaration already warned; fall back to 1
                    match lookup_sized(&arrayszlst, refname, *level) {
                        Some(size) => {
                            if size == 0 {
                                let name = arg.name.clone();
                                self.error_args(ErrorCode::IndeterminateArraySize, &[&name]);
                            }
                            size
                        }
                        None => 1,
                    }
                }
                Some(DefaultValue::TagOf { arg: refname }) => {
                    match lookup_sized(&taglst, refname, 0) {
                        Some(tag) => {
                            self.symbols.export_tag(tag as Tag);
                            (tag as Tag | PUBLIC_TAG) as Cell
                        }
                        None => 0,
                    }
                }
                _ => unreachable!("first default pass left only sizeof/tagof"),
            };
            self.cg.ldconst(value, Reg::Pri);
            self.cg.emit(Instr::Push(Reg::Pri)); // never relocated
            self.nest_stkusage += 1;
            if arglist[idx] == ARG_UNHANDLED {
                nargs += 1;
            }
            arglist[idx] = ARG_DONE;
        }

        self.cg.end_reorder(); // arguments are pushed right-to-left
        self.cg.emit(Instr::PushVal(nargs as Cell * CELL_SIZE));
        self.nest_stkusage += 1;
        self.cg.emit(Instr::Call(sym_id));
        self.symbols.mark_usage(sym_id, USAGE_READ);
        self.modheap(-heapalloc * CELL_SIZE);
        if symret.is_some() {
            if is_native {
                self.cg.emit(Instr::StackAdjust(CELL_SIZE)); // drop the relocated copy
            }
            self.cg.emit(Instr::Pop(Reg::Pri)); // hidden parameter = result
        }
        self.side_effect = true; // assume functions carry out side effects

        // maintain the worst-case stack/heap usage of the function being
        // compiled; syntax errors can reach this point without one
        if let Some(curfunc) = self.cur_func {
            let mut totalsize = self.decl_heap + 1; // +1 for the frame opcode
            if lval_result.ident == Ident::RefArray {
                totalsize += 1; // the hidden parameter on the stack
            }
            if !is_native {
                totalsize += 1; // the call opcode
            }
            totalsize += self.nest_stkusage;
            let sym = self.symbols.get_mut(curfunc);
            if sym.stacksize < totalsize {
                sym.stacksize = totalsize;
            }
        }
        self.nest_stkusage -= nargs as Cell + heapalloc + 1; // +1: argument count
        // after a syntax error the bookkeeping may be off, but it must
        // never drop below zero
        if self.nest_stkusage < 0 {
            self.nest_stkusage = 0;
        }

        // scrap the transient heap space of the argument expressions; the
        // call's own array result (below `locheap`) stays
        debug_assert!(self.decl_heap >= locheap);
        self.modheap((locheap - self.decl_heap) * CELL_SIZE);
        self.decl_heap = locheap;
        self.nesting -= 1;
    }

    /// Validates one supplied argument against its declaration and leaves
    /// the value (or address) to push in the primary register. Returns
    /// whether the push must be relocated.
    fn bind_argument(
        &mut self, args: &[ArgInfo], argidx: &mut usize, lval: &mut Value, lvalue: bool,
        is_native: bool, arrayszlst: &mut Vec<(String, Cell, u16)>,
        taglst: &mut Vec<(String, Cell, u16)>, heapalloc: &mut Cell,
    ) -> bool {
        let arg = match args.get(*argidx) {
            Some(arg) => arg.clone(),
            None => {
                self.error(ErrorCode::ArgumentCountMismatch);
                return false;
            }
        };
        let argnum = (*argidx + 1).to_string();
        let mut reloc = false;
        let lval_is_const_sym = lval
            .sym
            .map(|id| (self.symbols.get(id).usage & USAGE_CONST) != 0)
            .unwrap_or(false);
        match arg.ident {
            Ident::Varargs => {
                // the variable-arity tail always passes by reference
                if is_native {
                    reloc = true;
                }
                if lval.ident == Ident::Variable || lval.ident == Ident::Reference {
                    if lval_is_const_sym && !arg.is_const {
                        // a "const" variable passed into a non-const
                        // variable argument list is treated as a constant:
                        // its value is copied to a heap temporary
                        if !lvalue {
                            self.error(ErrorCode::MustBeLvalue);
                        } else {
                            self.rvalue(lval);
                            self.cg.emit(Instr::SetHeapPri);
                            *heapalloc += 1;
                            self.nest_stkusage += 1;
                        }
                    } else if lvalue {
                        let id = lval.sym.expect("variable operand has a symbol");
                        self.address(id, Reg::Pri);
                    } else {
                        self.cg.emit(Instr::SetHeapPri);
                        *heapalloc += 1;
                        self.nest_stkusage += 1;
                    }
                } else if lval.ident == Ident::Constant
                    || lval.ident == Ident::Expression
                    || lval.ident == Ident::ArrayChar
                {
                    // a computed value is spilled into a fresh heap cell
                    // whose address becomes the argument
                    if lval.ident == Ident::ArrayChar {
                        self.rvalue(lval);
                    }
                    self.cg.emit(Instr::SetHeapPri);
                    *heapalloc += 1;
                    self.nest_stkusage += 1;
                }
                // otherwise the address is already in the primary register
                if let Some(id) = lval.sym {
                    self.symbols.mark_usage(id, USAGE_WRITTEN);
                }
                if !self.checktag(&arg.tags, lval.tag) {
                    self.error(ErrorCode::TagMismatch);
                }
                if lval.tag != 0 {
                    taglst.push((arg.name.clone(), lval.tag as Cell, 0));
                }
                // a vararg slot binds any number of arguments: stay put
            }
            Ident::Variable => {
                if lval.ident == Ident::Label
                    || lval.ident == Ident::Function
                    || lval.ident == Ident::RefFunc
                    || lval.ident == Ident::Array
                    || lval.ident == Ident::RefArray
                {
                    self.error_args(ErrorCode::ArgumentTypeMismatch, &[&argnum]);
                }
                if lvalue {
                    self.rvalue(lval); // get the value (direct or indirect)
                }
                // otherwise the expression result is already in place
                debug_assert!(!arg.tags.is_empty());
                let mut newtag = lval.tag;
                self.check_userop(OperId::Assign, lval.tag, arg.tags[0], 2, None, &mut newtag);
                lval.tag = newtag;
                if !self.checktag(&arg.tags, lval.tag) {
                    self.error(ErrorCode::TagMismatch);
                }
                if lval.tag != 0 {
                    taglst.push((arg.name.clone(), lval.tag as Cell, 0));
                }
                *argidx += 1; // argument done
            }
            Ident::Reference => {
                if is_native {
                    reloc = true;
                }
                if !lvalue || lval.ident == Ident::ArrayChar {
                    self.error_args(ErrorCode::ArgumentTypeMismatch, &[&argnum]);
                }
                if lval_is_const_sym && !arg.is_const {
                    self.error_args(ErrorCode::ArgumentTypeMismatch, &[&argnum]);
                }
                if lval.ident == Ident::Variable || lval.ident == Ident::Reference {
                    if lvalue {
                        let id = lval.sym.expect("variable operand has a symbol");
                        self.address(id, Reg::Pri);
                    } else {
                        // spilled to the heap, the temporary is the target
                        self.cg.emit(Instr::SetHeapPri);
                        *heapalloc += 1;
                        self.nest_stkusage += 1;
                    }
                }
                // otherwise the address is already in the primary register
                if !self.checktag(&arg.tags, lval.tag) {
                    self.error(ErrorCode::TagMismatch);
                }
                if lval.tag != 0 {
                    taglst.push((arg.name.clone(), lval.tag as Cell, 0));
                }
                *argidx += 1;
                if let Some(id) = lval.sym {
                    self.symbols.mark_usage(id, USAGE_WRITTEN);
                }
            }
            Ident::RefArray => {
                if is_native {
                    reloc = true;
                }
                if lval.ident != Ident::Array
                    && lval.ident != Ident::RefArray
                    && lval.ident != Ident::ArrayCell
                {
                    self.error_args(ErrorCode::ArgumentTypeMismatch, &[&argnum]);
                    *argidx += 1;
                    return reloc;
                }
                if lval_is_const_sym && !arg.is_const {
                    self.error_args(ErrorCode::ArgumentTypeMismatch, &[&argnum]);
                }
                // the dimensions and sizes must match the declaration; a
                // literal array always has a single dimension, and an
                // array-element operand counts as one-dimensional with the
                // span of its named field
                if lval.sym.is_none() || lval.ident == Ident::ArrayCell {
                    if arg.dim.len() != 1 {
                        self.error(ErrorCode::ArrayDimensionMismatch);
                    } else if arg.dim[0] != 0 {
                        debug_assert!(arg.dim[0] > 0);
                        if lval.ident == Ident::ArrayCell {
                            if lval.constval == 0 || arg.dim[0] != lval.constval {
                                self.error(ErrorCode::ArraySizeMismatch);
                            }
                        } else {
                            debug_assert!(lval.constval != 0); // literals have a size
                            // a literal array must match the declared size
                            // exactly; a literal string may be smaller
                            if lval.constval > 0 && arg.dim[0] != lval.constval
                                || lval.constval < 0 && arg.dim[0] < -lval.constval
                            {
                                self.error(ErrorCode::ArraySizeMismatch);
                            }
                        }
                    }
                    if arg.packed && !lval.ispacked {
                        self.error(ErrorCode::PackedUnpackedMix);
                    }
                    if lval.ident != Ident::ArrayCell || lval.constval > 0 {
                        // record the array size for defaults with "sizeof"
                        let mut array_sz = lval.constval;
                        debug_assert!(array_sz != 0);
                        if array_sz < 0 {
                            array_sz = -array_sz;
                        }
                        arrayszlst.push((arg.name.clone(), array_sz, 0));
                    }
                } else {
                    let mut rsym = lval.sym.unwrap();
                    let mut level: u16 = 0;
                    if self.symbols.get(rsym).array().level + 1 != arg.dim.len() as u16 {
                        self.error(ErrorCode::ArrayDimensionMismatch);
                    }
                    // the lengths of all dimensions must match, except
                    // those declared with length zero ("unspecified")
                    loop {
                        debug_assert!((level as usize) < DIMEN_MAX);
                        let (rlength, rnames, rlevel) = {
                            let info = self.symbols.get(rsym).array();
                            (info.length, info.names.clone(), info.level)
                        };
                        if arg.dim.get(level as usize).copied().unwrap_or(0) != 0
                            && rlength != arg.dim[level as usize]
                        {
                            self.error(ErrorCode::ArraySizeMismatch);
                        }
                        let declared_names =
                            arg.dimnames.get(level as usize).cloned().unwrap_or(None);
                        if !compare_field_tables(&declared_names, &rnames) {
                            self.error(ErrorCode::ArraySizeMismatch);
                        }
                        arrayszlst.push((arg.name.clone(), rlength, level));
                        if rlevel == 0 {
                            break;
                        }
                        rsym = self.symbols.find_dependent(rsym).expect("sub-dimension exists");
                        level += 1;
                    }
                }
                // the address is already in the primary register
                if !self.checktag(&arg.tags, lval.tag) {
                    self.error(ErrorCode::TagMismatch);
                }
                if lval.tag != 0 {
                    taglst.push((arg.name.clone(), lval.tag as Cell, 0));
                }
                *argidx += 1;
            }
            other => debug_assert!(false, "argument declared as {:?}", other),
        }
        reloc
    }

    /// Emits the default value of an array argument: the data is dumped
    /// into static storage once (on first use, write pass only) and from
    /// there either passed directly (const parameters share the static
    /// copy) or copied onto the heap for the callee to scribble on.
    fn setdefarray(
        &mut self, func: SymbolId, argidx: usize, data: &[Cell], array_sz: Cell, fconst: bool,
    ) {
        debug_assert!(!data.is_empty());
        let key = (func, argidx);
        let addr = match self.defarray_addrs.get(&key) {
            Some(addr) => *addr,
            None if self.status == Status::Write => {
                let addr = (self.literals.len() as Cell + self.glb_declared) * CELL_SIZE;
                self.literals.extend_from_slice(data);
                self.defarray_addrs.insert(key, addr);
                addr
            }
            // the browse pass emits discardable code; the address is not
            // known yet
            None => 0,
        };

        if fconst {
            // the function does not modify the array, so it cannot modify
            // the default value either: pass the static address directly
            self.cg.ldconst(addr, Reg::Pri);
        } else {
            self.cg.ldconst(addr, Reg::Pri);
            debug_assert!(array_sz >= data.len() as Cell);
            self.modheap(array_sz * CELL_SIZE);
            self.cg.emit(Instr::MemCopy(data.len() as Cell * CELL_SIZE));
            self.cg.emit(Instr::Swap); // the heap address is the argument
            // the heap cells are tracked by callfunction, not `decl_heap`
        }
    }
}
