use crate::common::*;
use crate::compiler::codegen::{Instr, Op, Reg};
use crate::compiler::inputsource::ErrorCode;
use crate::compiler::lexer::Token;
use crate::compiler::symbols::{
    find_field, FieldEntry, Ident, SymbolId, USAGE_DEFINED, USAGE_MISSING, USAGE_PROTOTYPED,
    USAGE_READ,
};
use crate::compiler::Status;
use super::arrays::array_levelsize;
use super::userop::matchtag;
use super::value::Value;
use super::ExprEval;

/// Snapshot of the array level currently being subscripted. Plunging into
/// a named field that spans several cells continues on a synthesized
/// ("dummy") shape that is not backed by a symbol of its own.
#[derive(Clone)]
struct SubShape {
    id: Option<SymbolId>,
    name: String,
    is_array: bool,
    is_function: bool,
    missing: bool,
    level: u16,
    length: Cell,
    names: Option<Vec<FieldEntry>>,
    packed: bool,
    tag: Tag,
    dummy: bool,
}

enum Open {
    Square,
    Curly,
    Paren,
    Field(String),
}

enum SubOutcome {
    /// Another subscript may follow (multi-dimensional or pseudo-array).
    Restart,
    Done(bool),
}

impl<'a> ExprEval<'a> {
    fn shape_of(&self, id: SymbolId) -> SubShape {
        let sym = self.symbols.get(id);
        let (level, length, names) = match &sym.array {
            Some(info) => (info.level, info.length, info.names.clone()),
            None => (0, 0, None),
        };
        SubShape {
            id: Some(id),
            name: sym.name.clone(),
            is_array: sym.is_array(),
            is_function: sym.ident == Ident::Function || sym.ident == Ident::RefFunc,
            missing: (sym.usage & USAGE_MISSING) != 0,
            level,
            length,
            names,
            packed: sym.is_packed(),
            tag: sym.tag,
            dummy: false,
        }
    }

    /// The highest hierarchy level: array subscripts (cell, character and
    /// named-field form) and function calls, applied postfix to whatever
    /// `primary` resolved. Subscripting generates the address arithmetic
    /// on the base address already in the primary register.
    pub(crate) fn hier1(&mut self, lval1: &mut Value) -> bool {
        let (mut lvalue, symtok) = self.primary(lval1);
        let mut cursym: Option<SubShape> = lval1.sym.map(|id| self.shape_of(id));

        loop {
            let open = if self.lex.match_token(&Token::OpenSquare) {
                Open::Square
            } else if self.lex.match_token(&Token::OpenCurly) {
                Open::Curly
            } else if self.lex.match_token(&Token::OpenParen) {
                Open::Paren
            } else if let Some(name) = self.lex.match_symlabel() {
                Open::Field(name)
            } else {
                break;
            };

            if cursym.is_none() && !symtok || lval1.ident == Ident::Expression {
                // no valid symbol, and apparently no name of a possibly
                // undeclared symbol was read either
                if lval1.ident != Ident::Expression || !matches!(open, Open::Curly) {
                    self.error(ErrorCode::InvalidExpression);
                }
                self.lex.lex_push(); // analyze the bracket again later
                return false;
            }

            let optbrackets = cursym.as_ref().map(|s| s.is_array).unwrap_or(false);
            match open {
                Open::Square | Open::Curly => {
                    match self.hier1_subscript(lval1, &mut cursym, open) {
                        SubOutcome::Restart => lvalue = false,
                        SubOutcome::Done(result) => return result,
                    }
                }
                Open::Field(_) if optbrackets => {
                    match self.hier1_subscript(lval1, &mut cursym, open) {
                        SubOutcome::Restart => lvalue = false,
                        SubOutcome::Done(result) => return result,
                    }
                }
                Open::Field(_) => {
                    // a named argument without parentheses; the
                    // parenthesis-free call syntax is not supported, so
                    // leave the label and fall out to the tail check
                    self.lex.lex_push();
                    break;
                }
                Open::Paren => {
                    // function call
                    let sym_id = match &cursym {
                        Some(shape) if shape.is_function => shape.id.unwrap(),
                        None if self.status == Status::Browse => {
                            // possibly "use before declaration": create a
                            // stub so the usage can be marked
                            let name = self.last_symbol.clone();
                            match self.symbols.fetch_func(&name) {
                                Ok(id) => {
                                    self.symbols.mark_usage(id, USAGE_READ);
                                    cursym = Some(self.shape_of(id));
                                    id
                                }
                                Err(fatal) => {
                                    self.fatal = Some(fatal);
                                    self.error(ErrorCode::InvalidFunctionCall);
                                    return false;
                                }
                            }
                        }
                        _ => {
                            self.error(ErrorCode::InvalidFunctionCall);
                            return false;
                        }
                    };
                    if cursym.as_ref().map(|s| s.is_function && s.missing).unwrap_or(false) {
                        let name = cursym.as_ref().unwrap().name.clone();
                        self.error_args(ErrorCode::FunctionNotDefined, &[&name]);
                    }
                    self.callfunction(sym_id, lval1);
                    return false; // the result of a call is no lvalue
                }
            }
        }

        if cursym.is_some() && lval1.ident == Ident::Function {
            // a function name by itself is not a valid expression
            lval1.sym = None;
            lval1.ident = Ident::Expression;
            lval1.constval = 0;
            lval1.tag = 0;
            self.error(ErrorCode::InvalidCallSyntax);
            return false;
        }
        lvalue
    }

    fn hier1_subscript(
        &mut self, lval1: &mut Value, cursym: &mut Option<SubShape>, open: Open,
    ) -> SubOutcome {
        let close: Option<Token> = match &open {
            Open::Square => Some(Token::CloseSquare),
            Open::Curly => Some(Token::CloseCurly),
            Open::Field(_) => None,
            Open::Paren => unreachable!(),
        };

        let shape = match cursym {
            None => {
                // a constant, a literal, or an unknown variable
                if !self.last_symbol.is_empty() {
                    let name = self.last_symbol.clone();
                    self.error_suggest(ErrorCode::InvalidSubscript, &name);
                } else {
                    self.error_args(ErrorCode::InvalidSubscript, &["<unknown>"]);
                }
                if let Some(close) = &close {
                    self.lex.skip_to_token(close);
                }
                return SubOutcome::Done(false);
            }
            Some(shape) => shape.clone(),
        };
        if !shape.is_array {
            self.error_suggest(ErrorCode::InvalidSubscript, &shape.name);
            if let Some(close) = &close {
                self.lex.skip_to_token(close);
            }
            return SubOutcome::Done(false);
        }
        if shape.level > 0 && close == Some(Token::CloseCurly) {
            self.error(ErrorCode::BracedSubscriptOnMajorDim);
        }

        let mark = self.cg.mark();
        self.cg.emit(Instr::Push(Reg::Pri)); // save the array base address
        let mut lval2 = Value::new();

        // field data of a named index: value, tag, packedness and the span
        // in cells up to the next field
        let mut field: Option<(Tag, bool, Cell)> = None;
        let field_name = match &open {
            Open::Field(name) => Some(name.clone()),
            _ => self.lex.match_symlabel(),
        };
        if let Some(fname) = field_name {
            let entry = shape.names.as_ref().and_then(|names| {
                find_field(names, &fname)
                    .map(|(idx, e)| (e.clone(), names.get(idx + 1).map(|n| n.value)))
            });
            match entry {
                None => {
                    let path = format!("{}.{}", shape.name, fname);
                    self.error_args(ErrorCode::NamedIndexExpected, &[&path]);
                }
                Some((e, next_value)) => {
                    if close == Some(Token::CloseCurly) {
                        self.error(ErrorCode::BracedSubscriptOnMajorDim);
                    } else {
                        // the constant-fetch code is not generated here; we
                        // drop into the general constant-index case below
                        let span = next_value.expect("field tables carry a sentinel row") - e.value;
                        lval2.ident = Ident::Constant;
                        lval2.constval = e.value;
                        lval2.tag = e.tag;
                        lval2.sym = None;
                        lval2.ispacked = e.packed;
                        field = Some((e.tag, e.packed, span));
                    }
                }
            }
        } else {
            if shape.names.is_some() && !self.is_pseudo_array(lval1) {
                self.error_args(ErrorCode::NamedIndexExpected, &[&shape.name]);
            }
            if !shape.packed && close == Some(Token::CloseCurly)
                || shape.packed && close != Some(Token::CloseCurly)
            {
                self.error(ErrorCode::PackedUnpackedMix);
            }
            if self.hier14(&mut lval2) {
                // create the expression for the array index
                self.rvalue(&mut lval2);
            }
            if lval2.is_array() {
                let name = self.value_symbol_name(&lval2);
                self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
            }
        }
        if let Some(close) = &close {
            self.need_token(close);
        }

        let chars_per_cell = CELL_SIZE * 8 / CHAR_BITS;
        if lval2.ident == Ident::Constant {
            // constant index: fold the address arithmetic
            self.cg.scrap_to(mark);
            if let Some(trace) = &mut lval1.arrayidx {
                // keep the constant index for the self-assignment check
                debug_assert!((shape.level as usize) < DIMEN_MAX);
                trace[shape.level as usize] = lval2.constval;
            }
            if close != Some(Token::CloseCurly) {
                // normal array index (or named field)
                if lval2.constval < 0
                    || shape.length != 0 && shape.length <= lval2.constval
                {
                    self.error_args(ErrorCode::IndexOutOfBounds, &[&shape.name]);
                }
                if lval2.constval != 0 {
                    // no offsets for zero subscripts
                    self.cg.ldconst(lval2.constval * CELL_SIZE, Reg::Alt);
                    self.cg.emit(Instr::Binary(Op::Add));
                }
            } else {
                // character index
                if lval2.constval < 0
                    || shape.length != 0 && shape.length * chars_per_cell <= lval2.constval
                {
                    self.error_args(ErrorCode::IndexOutOfBounds, &[&shape.name]);
                }
                if lval2.constval != 0 {
                    self.cg.ldconst(lval2.constval, Reg::Alt);
                    self.cg.emit(Instr::Binary(Op::Add));
                }
                self.cg.emit(Instr::CharAlign); // align into the array
            }
        } else {
            // the array index is not constant (so brackets are never
            // optional), and gets a run-time bounds check instead
            lval1.arrayidx = None;
            if close == Some(Token::CloseSquare) {
                if shape.length != 0 {
                    self.cg.emit(Instr::Bounds(shape.length - 1));
                }
                self.cg.emit(Instr::Cell2Addr);
            } else {
                if shape.length != 0 {
                    self.cg.emit(Instr::Bounds(shape.length * chars_per_cell - 1));
                }
                self.cg.emit(Instr::Char2Addr);
            }
            self.cg.emit(Instr::Pop(Reg::Alt));
            self.cg.emit(Instr::Binary(Op::Add)); // base was popped into ALT
            if close != Some(Token::CloseSquare) {
                self.cg.emit(Instr::CharAlign);
            }
        }

        // the indexed item may be another array (multi-dimensional)
        if shape.level > 0 {
            debug_assert!(close == Some(Token::CloseSquare)); // checked earlier
            // read the offset to the sub-array and add it to the address
            self.cg.emit(Instr::Push(Reg::Pri));
            self.cg.emit(Instr::LoadInd);
            self.cg.emit(Instr::Pop(Reg::Alt));
            self.cg.emit(Instr::Binary(Op::Add));
            lval1.ident = Ident::RefArray;
            let real = shape.id.expect("multi-dimensional arrays are backed by symbols");
            let child = self.symbols.find_dependent(real).expect("sub-dimension exists");
            debug_assert_eq!(
                self.symbols.get(child).array().level + 1,
                shape.level
            );
            lval1.sym = Some(child);
            *cursym = Some(self.shape_of(child));
            return SubOutcome::Restart; // try subsequent indices
        }

        // the fetch is now indirect
        lval1.ident =
            if close == Some(Token::CloseCurly) { Ident::ArrayChar } else { Ident::ArrayCell };
        if let Some((ftag, fpacked, span)) = field {
            // with a named index the tag and the element span come from
            // the field, not the array symbol
            lval1.tag = ftag;
            lval1.constval = span;
            if span > 1 {
                lval1.ispacked = fpacked;
            }
            let next_is_subscript = {
                if self.lex.match_token(&Token::OpenSquare) {
                    self.lex.lex_push();
                    true
                } else if self.lex.match_token(&Token::OpenCurly) {
                    self.lex.lex_push();
                    true
                } else {
                    false
                }
            };
            if span > 1 && next_is_subscript {
                // a multi-cell field indexed again is a sub-array; plunge
                // into it through a synthesized shape with the adjusted
                // length and no named indices of its own
                lval1.ident = Ident::RefArray;
                *cursym = Some(SubShape {
                    id: shape.id,
                    name: shape.name.clone(),
                    is_array: true,
                    is_function: false,
                    missing: false,
                    level: 0,
                    length: span,
                    names: None,
                    packed: fpacked,
                    tag: shape.tag,
                    dummy: true,
                });
                return SubOutcome::Restart;
            }
        } else {
            if !shape.dummy {
                lval1.tag = shape.tag;
            }
            lval1.constval = 0;
        }
        // a cell in an array is an lvalue; a character in an array is not
        // always a *valid* lvalue
        SubOutcome::Done(true)
    }

    /// Resolves identifiers, literals and parenthesized groups. Returns
    /// (is-lvalue, read-a-symbol-token); the latter lets `hier1` recognize
    /// a call to a yet-undeclared function.
    pub(crate) fn primary(&mut self, lval: &mut Value) -> (bool, bool) {
        if self.lex.match_token(&Token::OpenParen) {
            // sub-expression: (expression,...)
            let save_intest = self.in_test;
            let save_allowtags = self.lex.allow_tags;
            self.in_test = false; // no longer in a "test" expression
            self.lex.allow_tags = true;
            let mut lvalue;
            loop {
                lvalue = self.hier14(lval);
                if !self.lex.match_token(&Token::Comma) {
                    break;
                }
            }
            self.need_token(&Token::CloseParen);
            self.lex.lex_clear();
            self.lex.allow_tags = save_allowtags;
            self.in_test = save_intest;
            return (lvalue, false);
        }

        lval.clear();
        let tok = self.lex.lex();
        let symtok = matches!(tok, Token::Symbol(_));
        if let Token::Symbol(name) = &tok {
            self.last_symbol = name.clone();
            if self.symbols.find_const(name).is_none() {
                let name = name.clone();
                return (self.primary_symbol(lval, &name), true);
            }
        }
        self.lex.lex_push(); // the token is analyzed by constant()
        if !self.constant(lval) {
            self.error(ErrorCode::InvalidExpression);
            self.cg.ldconst(0, Reg::Pri);
            // gobble up the unrecognized token, but make an exception for
            // '}' because it closes compound statements
            if tok == Token::CloseCurly {
                self.lex.lex_push();
            }
        }
        (false, symtok) // constants (and errors) are not lvalues
    }

    fn primary_symbol(&mut self, lval: &mut Value, name: &str) -> bool {
        // first look for a local variable
        if let Some(id) = self.symbols.find_local(name) {
            let (ident, tag) = {
                let sym = self.symbols.get(id);
                (sym.ident, sym.tag)
            };
            if ident == Ident::Label {
                self.error(ErrorCode::InvalidExpression);
                self.cg.ldconst(0, Reg::Pri);
                return false; // labels are not valid in expressions
            }
            lval.sym = Some(id);
            lval.ident = ident;
            lval.tag = tag;
            if ident == Ident::Array || ident == Ident::RefArray {
                self.address(id, Reg::Pri); // starting address
                return false; // an array is not an lvalue
            }
            return true;
        }

        // now try a global variable
        if let Some(id) = self.symbols.find_global(name) {
            let (ident, tag, usage) = {
                let sym = self.symbols.get(id);
                (sym.ident, sym.tag, sym.usage)
            };
            if ident == Ident::Function || ident == Ident::RefFunc {
                if (usage & USAGE_PROTOTYPED) == 0 {
                    // only in the table because a stub was inserted on a
                    // prior use; it was never declared or implemented
                    self.error_suggest(ErrorCode::UndefinedSymbol, name);
                    if !self.lex.match_token(&Token::OpenParen) {
                        return false; // no indication of a function call
                    }
                    self.lex.lex_push(); // restore the '('
                }
                lval.sym = Some(id);
                lval.ident = ident;
                lval.tag = tag;
                return false; // a function is not an lvalue
            }
            if (usage & USAGE_DEFINED) == 0 {
                self.error_suggest(ErrorCode::UndefinedSymbol, name);
            }
            lval.sym = Some(id);
            lval.ident = ident;
            lval.tag = tag;
            if ident == Ident::Array || ident == Ident::RefArray {
                self.address(id, Reg::Pri);
                return false;
            }
            return true;
        }

        // unknown symbol
        self.lex.lex_clear();
        self.error_suggest(ErrorCode::UndefinedSymbol, name);
        false
    }

    /// Fetches a number, a named constant, a literal string, or a literal
    /// array; strings and arrays go into the literal queue. Returns
    /// whether the token could be interpreted as a constant.
    pub(crate) fn constant(&mut self, lval: &mut Value) -> bool {
        let tok = self.lex.lex();
        match tok {
            Token::Symbol(name) => match self.symbols.find_const(&name) {
                Some(id) => {
                    let (value, tag) = {
                        let sym = self.symbols.get(id);
                        (sym.addr, sym.tag)
                    };
                    lval.constval = value;
                    self.cg.ldconst(value, Reg::Pri);
                    lval.ident = Ident::Constant;
                    lval.tag = tag;
                    lval.sym = Some(id);
                    self.symbols.mark_usage(id, USAGE_READ);
                    true
                }
                None => false,
            },
            Token::Number(value) => {
                lval.constval = value;
                self.cg.ldconst(value, Reg::Pri);
                lval.ident = Ident::Constant;
                self.last_symbol.clear();
                true
            }
            Token::Rational(value) => {
                lval.constval = value;
                self.cg.ldconst(value, Reg::Pri);
                lval.ident = Ident::Constant;
                lval.tag = self.rational_tag;
                self.last_symbol.clear();
                true
            }
            Token::StringLit { cells, packed } => {
                let start = self.literals.len() as Cell;
                let count = cells.len() as Cell;
                self.literals.extend(cells);
                self.cg.ldconst((start + self.glb_declared) * CELL_SIZE, Reg::Pri);
                lval.ident = Ident::Array; // pretend this is a global array
                // the negative size distinguishes a literal string from a
                // literal array (for the shrinkable-assignment rule)
                lval.constval = -count;
                lval.ispacked = packed;
                self.last_symbol.clear();
                true
            }
            Token::OpenCurly | Token::OpenSquare => {
                // literal array; braces hold packed characters
                let packed = tok == Token::OpenCurly;
                let close = if packed { Token::CloseCurly } else { Token::CloseSquare };
                let chars_per_cell = CELL_SIZE * 8 / CHAR_BITS;
                let start = self.literals.len() as Cell;
                let mut packitem: Cell = 0;
                let mut packcount: Cell = 0;
                let mut lasttag: Option<Tag> = None;
                loop {
                    let mark = self.cg.mark();
                    let item = self.expression(false);
                    self.cg.scrap_to(mark); // scratch generated code
                    if item.ident != Ident::Constant {
                        self.error(ErrorCode::MustBeConstantExpression);
                    }
                    match lasttag {
                        None => lasttag = Some(item.tag),
                        Some(tag) => {
                            if !matchtag(tag, item.tag, false) {
                                self.error(ErrorCode::TagMismatch);
                            }
                        }
                    }
                    if packed {
                        if (item.constval as UCell) >= (1 << CHAR_BITS) {
                            self.error(ErrorCode::ConstantExceedsRange);
                        }
                        packcount += 1;
                        packitem |= (item.constval & 0xff) << ((chars_per_cell - packcount) * CHAR_BITS);
                        if packcount == chars_per_cell {
                            self.literals.push(packitem); // flush the cell
                            packitem = 0;
                            packcount = 0;
                        }
                    } else {
                        self.literals.push(item.constval);
                    }
                    if !self.lex.match_token(&Token::Comma) {
                        break;
                    }
                }
                if packcount != 0 && packed {
                    self.literals.push(packitem); // final collected values
                }
                if !self.need_token(&close) {
                    self.lex.lex_clear();
                }
                self.cg.ldconst((start + self.glb_declared) * CELL_SIZE, Reg::Pri);
                lval.ident = Ident::Array; // pretend this is a global array
                lval.constval = self.literals.len() as Cell - start;
                lval.ispacked = packed;
                self.last_symbol.clear();
                true
            }
            _ => {
                false // cannot be interpreted as a constant
            }
        }
    }

    //--------------------------------------------------------------------------
    // sizeof / tagof / defined / state
    //--------------------------------------------------------------------------

    pub(crate) fn hier2_defined(&mut self, lval: &mut Value) -> bool {
        let mut paranthese = 0;
        while self.lex.match_token(&Token::OpenParen) {
            paranthese += 1;
        }
        let name = match self.lex.match_symbol() {
            Some(name) => name,
            None => {
                let tok = self.lex.lex_peek();
                self.error_args(ErrorCode::IllegalSymbolName, &[tok.name()]);
                return false;
            }
        };
        let defined = match self
            .symbols
            .find_local(&name)
            .or_else(|| self.symbols.find_global(&name))
        {
            Some(id) => {
                let sym = self.symbols.get(id);
                // present in the table, but only as "used": does not count
                let func = sym.ident == Ident::Function || sym.ident == Ident::RefFunc;
                if func {
                    (sym.usage & USAGE_PROTOTYPED) != 0
                } else {
                    (sym.usage & USAGE_DEFINED) != 0
                }
            }
            None => self.symbols.find_const(&name).is_some(),
        };
        lval.clear();
        lval.ident = Ident::Constant;
        lval.constval = defined as Cell;
        lval.tag = self.symbols.add_tag("bool");
        self.cg.ldconst(lval.constval, Reg::Pri);
        while paranthese > 0 {
            self.need_token(&Token::CloseParen);
            paranthese -= 1;
        }
        false
    }

    /// Walks the subscript/field suffix of a `sizeof`/`tagof` operand:
    /// `a[]` descends one dimension, `a.field` selects a named field.
    /// Returns the levels descended and, at the deepest level, the selected
    /// field name with the table it came from.
    fn sizeof_suffix(
        &mut self, id: SymbolId,
    ) -> (u16, Option<(String, Vec<FieldEntry>)>) {
        let mut level: u16 = 0;
        let mut subsym = Some(id);
        let mut selected: Option<(String, Vec<FieldEntry>)> = None;
        loop {
            let outer_label = self.lex.match_symlabel();
            let bracket = outer_label.is_none() && self.lex.match_token(&Token::OpenSquare);
            if outer_label.is_none() && !bracket {
                break;
            }
            selected = None;
            let label = outer_label.clone().or_else(|| self.lex.match_symlabel());
            if let Some(fname) = label {
                if let Some(sub) = subsym {
                    match self.symbols.get(sub).array.as_ref().and_then(|a| a.names.clone()) {
                        Some(names) => selected = Some((fname, names)),
                        None => {
                            let name = self.symbols.get(id).name.clone();
                            self.error_args(ErrorCode::NamedIndexExpected, &[&name]);
                        }
                    }
                }
            }
            if outer_label.is_none() {
                self.need_token(&Token::CloseSquare);
            }
            if let Some(sub) = subsym {
                subsym = self.symbols.find_dependent(sub);
            }
            level += 1;
        }
        (level, selected)
    }

    pub(crate) fn hier2_sizeof(&mut self, lval: &mut Value) -> bool {
        let mut paranthese = 0;
        while self.lex.match_token(&Token::OpenParen) {
            paranthese += 1;
        }
        let name = match self.lex.match_symbol() {
            Some(name) => name,
            None => {
                let tok = self.lex.lex_peek();
                self.error_args(ErrorCode::IllegalSymbolName, &[tok.name()]);
                return false;
            }
        };
        let id = match self
            .symbols
            .find_local(&name)
            .or_else(|| self.symbols.find_global(&name))
        {
            Some(id) => id,
            None => {
                self.error_suggest(ErrorCode::UndefinedSymbol, &name);
                return false;
            }
        };
        let (ident, usage, is_array, sym_level) = {
            let sym = self.symbols.get(id);
            let level = sym.array.as_ref().map(|a| a.level).unwrap_or(0);
            (sym.ident, sym.usage, sym.is_array(), level)
        };
        if ident == Ident::Constant {
            self.error(ErrorCode::ConstantSymbolHasNoSize);
        } else if ident == Ident::Function || ident == Ident::RefFunc {
            self.error(ErrorCode::FunctionSymbolHasNoSize);
        } else if (usage & USAGE_DEFINED) == 0 {
            self.error_suggest(ErrorCode::UndefinedSymbol, &name);
            return false;
        }
        lval.clear();
        lval.ident = Ident::Constant;
        lval.constval = 1; // preset
        if is_array {
            let (level, selected) = self.sizeof_suffix(id);
            if level > sym_level + 1 {
                self.error_args(ErrorCode::InvalidSubscript, &[&name]);
            } else if level == sym_level + 1 {
                match selected {
                    Some((fname, names)) => match find_field(&names, &fname) {
                        None => self.error_args(ErrorCode::UnknownField, &[&fname]),
                        Some((idx, entry)) => {
                            if let Some(next) = names.get(idx + 1) {
                                lval.constval = next.value - entry.value;
                            }
                        }
                    },
                    None => self.error_args(ErrorCode::InvalidSubscript, &[&name]),
                }
            } else {
                lval.constval = array_levelsize(self.symbols, id, level);
            }
            if lval.constval == 0 {
                self.error_args(ErrorCode::IndeterminateArraySize, &[&name]);
            }
        }
        self.cg.ldconst(lval.constval, Reg::Pri);
        while paranthese > 0 {
            self.need_token(&Token::CloseParen);
            paranthese -= 1;
        }
        false
    }

    pub(crate) fn hier2_tagof(&mut self, lval: &mut Value) -> bool {
        let save_allowtags = self.lex.allow_tags;
        let mut paranthese = 0;
        while self.lex.match_token(&Token::OpenParen) {
            paranthese += 1;
            self.lex.allow_tags = true; // tag names are expected here
        }
        let tok = self.lex.lex();
        let (mut tag, sym_id) = match tok {
            Token::Label(name) => (self.symbols.find_tag(&name).unwrap_or(0), None),
            Token::Symbol(name) => {
                let id = match self
                    .symbols
                    .find_local(&name)
                    .or_else(|| self.symbols.find_global(&name))
                    .or_else(|| self.symbols.find_const(&name))
                {
                    Some(id) => id,
                    None => {
                        self.error_suggest(ErrorCode::UndefinedSymbol, &name);
                        self.lex.allow_tags = save_allowtags;
                        return false;
                    }
                };
                if (self.symbols.get(id).usage & USAGE_DEFINED) == 0 {
                    self.error_suggest(ErrorCode::UndefinedSymbol, &name);
                    self.lex.allow_tags = save_allowtags;
                    return false;
                }
                (self.symbols.get(id).tag, Some(id))
            }
            _ => {
                self.lex.lex_push();
                let tokname = self.lex.lex_peek();
                self.error_args(ErrorCode::IllegalSymbolName, &[tokname.name()]);
                self.lex.allow_tags = save_allowtags;
                return false;
            }
        };
        if let Some(id) = sym_id {
            if self.symbols.get(id).is_array() {
                let sym_level = self.symbols.get(id).array().level;
                let name = self.symbols.get(id).name.clone();
                let (level, selected) = self.sizeof_suffix(id);
                if level > sym_level + 1 {
                    self.error_args(ErrorCode::InvalidSubscript, &[&name]);
                } else if level == sym_level + 1 {
                    if let Some((fname, names)) = selected {
                        match find_field(&names, &fname) {
                            None => self.error_args(ErrorCode::UnknownField, &[&fname]),
                            Some((_, entry)) => {
                                if entry.tag != 0 {
                                    tag = entry.tag;
                                }
                            }
                        }
                    }
                }
            }
        }
        if tag != 0 {
            self.symbols.export_tag(tag);
        }
        lval.clear();
        lval.ident = Ident::Constant;
        lval.constval = if tag == 0 { 0 } else { (tag | PUBLIC_TAG) as Cell };
        self.cg.ldconst(lval.constval, Reg::Pri);
        while paranthese > 0 {
            self.need_token(&Token::CloseParen);
            paranthese -= 1;
        }
        self.lex.allow_tags = save_allowtags;
        false
    }

    /// A `state` expression compares an automaton's hidden state cell
    /// against a declared state: `state stname` or `state aut:stname`.
    pub(crate) fn hier2_state(&mut self, lval: &mut Value) -> bool {
        let tok = self.lex.lex();
        let (automaton_name, state_name) = match tok {
            Token::Label(name) => {
                // the token is an automaton name; read the state name
                // before checking the automaton, to keep the parser going
                match self.lex.match_symbol() {
                    Some(state) => (Some(name), state),
                    None => {
                        self.error_args(ErrorCode::ExpectedToken, &["-identifier-"]);
                        return false;
                    }
                }
            }
            Token::Symbol(name) => (None, name),
            _ => {
                self.lex.lex_push();
                self.error_args(ErrorCode::ExpectedToken, &["-identifier-"]);
                return false;
            }
        };
        let automaton = match &automaton_name {
            Some(name) => match self.symbols.automaton_find(name) {
                Some(automaton) => (automaton.index, automaton.name.clone()),
                None => {
                    match self.symbols.automaton_closest(name) {
                        Some(suggestion) => self.diags.report_suggest(
                            self.source, self.lex.token_pos(),
                            ErrorCode::UnknownAutomaton, &[name], &suggestion,
                        ),
                        None => self.error_args(ErrorCode::UnknownAutomaton, &[name]),
                    }
                    return false;
                }
            },
            None => match self.symbols.automaton_find("") {
                Some(automaton) => (automaton.index, automaton.name.clone()),
                None => {
                    self.error_args(ErrorCode::UnknownAutomaton, &["<main>"]);
                    return false;
                }
            },
        };
        let state_value = match self.symbols.state_find(&state_name, automaton.0) {
            Some(state) => state.value,
            None => {
                let fsaname = if automaton.1.is_empty() { "<main>" } else { &automaton.1 };
                self.error_args(ErrorCode::UnknownState, &[&state_name, fsaname]);
                return false;
            }
        };
        self.cg.emit(Instr::LoadAutomaton(Reg::Alt, automaton.0 as u32));
        self.cg.ldconst(state_value, Reg::Pri);
        self.cg.emit(Instr::Binary(Op::Eq));
        lval.clear();
        lval.ident = Ident::Expression;
        lval.tag = self.symbols.add_tag("bool");
        false
    }
}
