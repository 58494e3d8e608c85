use crate::common::*;
use crate::compiler::codegen::{Instr, Label, Op, Reg};
use crate::compiler::inputsource::ErrorCode;
use crate::compiler::lexer::Token;
use crate::compiler::symbols::Ident;
use super::ops::{calc, dbltest, OperId};
use super::userop::matchtag;
use super::value::Value;
use super::{ExprEval, HierFn};

/// Scaling factor for one operand; `None` stands for "no operator"
/// (plain assignment), which never scales.
fn scale(oper: Option<Op>, lval1: &Value, lval2: &Value) -> Cell {
    match oper {
        Some(op) => dbltest(op, lval1, lval2),
        None => 1,
    }
}

impl<'a> ExprEval<'a> {
    /// Searches the level's operator list at the current token. The token
    /// is consumed on a hit.
    pub(crate) fn next_op(&mut self, list: &[(Token, Op)]) -> Option<Op> {
        for (token, op) in list {
            if self.lex.match_token(token) {
                return Some(*op);
            }
        }
        None
    }

    /// Plunge to a lower level: the generic left-associative binary level.
    /// Without an operator from `list` the left operand passes through
    /// untouched (and unloaded). `forcetag` pins the result tag of every
    /// combination on this level; `chkbitwise` flags uninterrupted chains
    /// that mix bitwise and other operators without parentheses.
    pub(crate) fn plnge(
        &mut self, list: &[(Token, Op)], next: HierFn<'a>, lval: &mut Value,
        forcetag: Option<&str>, chkbitwise: bool,
    ) -> bool {
        let lvalue = self.plnge1(next, lval);
        let mut op = match self.next_op(list) {
            Some(op) => op,
            None => return lvalue, // no operator in the list found
        };
        if lvalue {
            self.rvalue(lval);
        }
        let mut count = 0;
        loop {
            if chkbitwise && count > 0 && self.bitwise_opercount != 0 {
                self.error(ErrorCode::PossiblyUnintendedBitwise);
            }
            count += 1;
            let mut lval2 = Value::new();
            self.plnge2(Some(op), op.has_array_form(), next, lval, &mut lval2);
            if op.is_bitwise_and_or() {
                self.bitwise_opercount += 1;
            }
            if let Some(tagname) = forcetag {
                lval.tag = self.symbols.add_tag(tagname);
            }
            match self.next_op(list) {
                Some(next_op) => op = next_op, // left-associative chaining
                None => break,
            }
        }
        false // the result of an operation is never an lvalue
    }

    /// Unary plunge to a lower level. A constant result has its staged
    /// load scrapped; it is re-materialized only where actually needed.
    pub(crate) fn plnge1(&mut self, next: HierFn<'a>, lval: &mut Value) -> bool {
        let mark = self.cg.mark();
        let lvalue = next(self, lval);
        if lval.ident == Ident::Constant {
            self.cg.scrap_to(mark); // load constant later
        }
        lvalue
    }

    /// The fundamental binary combine: evaluates the right operand,
    /// arranges both operands into the register convention (left in the
    /// secondary register, right in the primary), then folds, applies a
    /// user operator, or emits the built-in operation.
    pub(crate) fn plnge2(
        &mut self, oper: Option<Op>, has_array_oper: bool, next: HierFn<'a>,
        lval1: &mut Value, lval2: &mut Value,
    ) {
        let mark = self.cg.mark();
        if lval1.ident == Ident::Constant {
            // constant on the left side; it is not yet loaded
            if self.plnge1(next, lval2) {
                self.rvalue(lval2); // load lvalue now
            } else if lval2.ident == Ident::Constant {
                self.cg.ldconst(lval2.constval.wrapping_mul(scale(oper, lval2, lval1)), Reg::Pri);
            }
            // converting constant indices to addresses is restricted to
            // "add" and "subtract" operators on array elements
            self.cg.ldconst(lval1.constval.wrapping_mul(scale(oper, lval2, lval1)), Reg::Alt);
        } else {
            // non-constant on the left side
            self.cg.emit(Instr::Push(Reg::Pri));
            if self.plnge1(next, lval2) {
                self.rvalue(lval2);
            }
            if lval2.ident == Ident::Constant {
                // constant on the right side
                if oper.map(|op| op.commutative()).unwrap_or(false) {
                    // scrap the push and load the constant into the
                    // secondary register directly; swap the descriptors so
                    // lval1 stays associated with the secondary register
                    self.cg.scrap_to(mark);
                    self.cg.ldconst(lval2.constval.wrapping_mul(scale(oper, lval1, lval2)), Reg::Alt);
                    std::mem::swap(lval1, lval2);
                } else {
                    self.cg.ldconst(lval2.constval.wrapping_mul(scale(oper, lval1, lval2)), Reg::Pri);
                    self.cg.emit(Instr::Pop(Reg::Alt));
                }
            } else {
                // non-constants on both sides
                self.cg.emit(Instr::Pop(Reg::Alt));
                if scale(oper, lval1, lval2) > 1 {
                    self.cg.emit(Instr::Cell2Addr);
                }
                if scale(oper, lval2, lval1) > 1 {
                    self.cg.emit(Instr::Cell2AddrAlt);
                }
            }
        }

        let op = match oper {
            Some(op) => op,
            None => return, // plain assignment: nothing to combine
        };

        // a function used in an expression should return a value, and its
        // result is assumed to carry no side effects
        self.checkfunction(lval1);
        self.checkfunction(lval2);
        if self.value_is_function(lval1) || self.value_is_function(lval2) {
            self.side_effect = false;
        }

        let mut arraylength: Cell = 0;
        let arrayish1 = lval1.is_array() || self.is_pseudo_array(lval1);
        let arrayish2 = lval2.is_array() || self.is_pseudo_array(lval2);
        if has_array_oper && arrayish1 && arrayish2 {
            // both sides are arrays under an array-capable operator; the
            // dimensions must agree
            arraylength = self.checkarrays(lval1, lval2);
        } else if lval1.is_array() {
            let name = self.value_symbol_name(lval1);
            self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
        } else if lval2.is_array() {
            let name = self.value_symbol_name(lval2);
            self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
        }

        // a user-defined operator pre-empts folding and the built-in
        let mut resulttag = lval1.tag;
        if self.check_userop(OperId::Binary(op), lval1.tag, lval2.tag, 2, None, &mut resulttag) {
            lval1.tag = resulttag;
            lval1.ident = Ident::Expression;
            lval1.constval = 0;
        } else if lval1.is_constant() && lval2.is_constant() {
            // only constant expression if both constant
            self.cg.scrap_to(mark); // scratch generated code and calculate
            if !matchtag(lval1.tag, lval2.tag, false) {
                self.error(ErrorCode::TagMismatch);
            }
            let mut boolresult = lval1.boolresult;
            match calc(lval1.constval, op, lval2.constval, &mut boolresult) {
                Some(value) => lval1.constval = value,
                None => {
                    self.error(ErrorCode::DivisionByZero);
                    lval1.constval = 0;
                }
            }
            lval1.boolresult = boolresult;
        } else {
            if !matchtag(lval1.tag, lval2.tag, false) {
                self.error(ErrorCode::TagMismatch);
            }
            if arraylength > 0 {
                self.cg.emit(Instr::CmpArray(op, arraylength * CELL_SIZE));
            } else {
                self.cg.emit(Instr::Binary(op));
            }
            lval1.ident = Ident::Expression;
        }
    }

    /// Binary plunge with the special code shapes for chained relational
    /// operators: `a <= b <= c` evaluates `b` once and ANDs the pairwise
    /// comparisons.
    pub(crate) fn plnge_rel(&mut self, list: &[(Token, Op)], next: HierFn<'a>, lval: &mut Value) -> bool {
        let lvalue = self.plnge1(next, lval);
        let mut op = match self.next_op(list) {
            Some(op) => op,
            None => return lvalue,
        };
        if lvalue {
            self.rvalue(lval);
        }
        let mut count = 0;
        lval.boolresult = true;
        let mut lval2 = Value::new();
        loop {
            // same check as in plnge(), but the bitwise check is always on
            if count > 0 && self.bitwise_opercount != 0 {
                self.error(ErrorCode::PossiblyUnintendedBitwise);
            }
            if count > 0 {
                self.cg.emit(Instr::RelPrefix);
                // the previous right-hand operand becomes the new left
                // operand without re-evaluation; only the accumulated
                // boolean survives from the previous link
                let boolresult = lval.boolresult;
                *lval = lval2.clone();
                lval.boolresult = boolresult;
            }
            lval2 = Value::new();
            self.plnge2(Some(op), false, next, lval, &mut lval2);
            if count > 0 {
                self.cg.emit(Instr::RelSuffix);
            }
            count += 1;
            match self.next_op(list) {
                Some(next_op) => op = next_op,
                None => break,
            }
        }
        lval.constval = lval.boolresult as Cell;
        if lval.ident != Ident::Constant || lval2.ident != Ident::Constant {
            lval.ident = Ident::Expression;
        }
        lval.tag = self.symbols.add_tag("bool");
        false
    }

    /// Skims over the terms adjoining `&&` or `||`: the early drop-out
    /// evaluation. `dropval` is the expression value when a term drops out
    /// (1 for "or", 0 for "and"), `endval` the value when none does. A
    /// chain of compile-time constants accumulates its result at compile
    /// time and scraps the generated code entirely.
    pub(crate) fn skim(
        &mut self, operator: &Token, jump_on_ne0: bool, dropval: Cell, endval: Cell,
        next: HierFn<'a>, lval: &mut Value,
    ) -> bool {
        let mark = self.cg.mark();
        let mut hits = false; // no logical operators "hit" yet
        let mut allconst = true;
        let mut constval: Cell = 0;
        let mut droplab = Label(0); // assigned at the first hit
        loop {
            let lvalue = self.plnge1(next, lval); // evaluate left expression

            allconst = allconst && lval.ident == Ident::Constant;
            if allconst {
                if hits {
                    // one operator was already found
                    lval.constval = if jump_on_ne0 {
                        (lval.constval != 0 || constval != 0) as Cell
                    } else {
                        (lval.constval != 0 && constval != 0) as Cell
                    };
                }
                constval = lval.constval; // result accumulated so far
            }

            let foundop = self.lex.match_token(operator);
            if (foundop || hits) && lval.is_array() {
                let name = self.value_symbol_name(lval);
                self.error_args(ErrorCode::ArrayMustBeIndexed, &[&name]);
            }
            if foundop {
                if !hits {
                    // this is the first operator in the list
                    hits = true;
                    droplab = self.cg.get_label();
                }
                self.dropout(lvalue, jump_on_ne0, droplab, lval);
            } else if hits {
                // no (more) identical operators
                self.dropout(lvalue, jump_on_ne0, droplab, lval);
                self.cg.ldconst(endval, Reg::Pri);
                let endlab = self.cg.get_label();
                self.cg.emit(Instr::Jump(endlab));
                self.cg.set_label(droplab);
                self.cg.ldconst(dropval, Reg::Pri);
                self.cg.set_label(endlab);
                lval.sym = None;
                lval.tag = self.symbols.add_tag("bool");
                if allconst {
                    lval.ident = Ident::Constant;
                    lval.constval = constval;
                    self.cg.scrap_to(mark); // scratch generated code
                } else {
                    lval.ident = Ident::Expression;
                    lval.constval = 0;
                }
                return false;
            } else {
                return lvalue; // no operator from the list was found
            }
        }
    }

    /// Materializes the operand into the primary register (lvalues are
    /// dereferenced, constants loaded) and emits the early drop-out jump.
    fn dropout(&mut self, lvalue: bool, jump_on_ne0: bool, exit: Label, lval: &mut Value) {
        if lvalue {
            self.rvalue(lval);
        } else if lval.ident == Ident::Constant {
            self.cg.ldconst(lval.constval, Reg::Pri);
        }
        self.cg.emit(if jump_on_ne0 { Instr::JumpNe0(exit) } else { Instr::JumpEq0(exit) });
    }
}
