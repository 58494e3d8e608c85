use crate::common::*;
use crate::compiler::codegen::{Instr, Reg};
use crate::compiler::inputsource::ErrorCode;
use crate::compiler::symbols::{Ident, USAGE_MISSING, USAGE_PROTOTYPED, USAGE_READ};
use super::ops::OperId;
use super::value::Value;
use super::ExprEval;

/// Builds the symbol name under which an operator overload is registered,
/// from the operator text and the operand tags. The same function serves
/// declaration and lookup, so the exact shape only has to be deterministic.
pub(crate) fn operator_symname(opername: &str, tag1: Tag, tag2: Tag, numparam: u32) -> String {
    debug_assert!(numparam == 1 || numparam == 2);
    if numparam == 1 {
        format!("operator{}({})", opername, tag1)
    } else {
        format!("operator{}({},{})", opername, tag1, tag2)
    }
}

/// Tag compatibility. A zero formal tag accepts any non-fixed actual tag
/// when coercion is allowed; fixed tags never coerce.
pub(crate) fn matchtag(formal: Tag, actual: Tag, allowcoerce: bool) -> bool {
    if formal != actual {
        if !allowcoerce || formal != 0 || (actual & FIXED_TAG) != 0 {
            return false;
        }
    }
    true
}

impl<'a> ExprEval<'a> {
    /// Attempts to replace the built-in operation with a user-defined
    /// operator function for the given operand tag pair. Returns whether an
    /// overload was applied; "not applied" means "use the built-in".
    ///
    /// On success the overload call has been emitted: operands pushed in
    /// call-ready order (reversed when the commutative swapped-tag lookup
    /// resolved), any register whose contents must survive the call saved
    /// and restored (the chained-relational continuation operand, or a
    /// pending indirect-store address), and for `++`/`--` the value loaded
    /// before and stored back after the call.
    pub(crate) fn check_userop(
        &mut self, oper: OperId, tag1: Tag, tag2: Tag, numparam: u32,
        mut lval: Option<&mut Value>, resulttag: &mut Tag,
    ) -> bool {
        debug_assert!(numparam == 1 || numparam == 2);
        // user-defined operators on untagged operands do not exist, so
        // there is a quick exit
        if tag1 == 0 && (numparam == 1 || tag2 == 0) {
            return false;
        }

        let opername = match oper.name() {
            Some(name) => name,
            None => return false, // operator cannot be overloaded
        };

        let mut savepri = false;
        let mut savealt = false;
        match oper {
            OperId::Assign => {
                // for the assignment operator, ALT may contain the address
                // at which the result must be stored
                if let Some(lv) = lval.as_deref() {
                    if lv.ident == Ident::ArrayCell || lv.ident == Ident::ArrayChar {
                        savealt = true;
                    }
                }
            }
            OperId::Binary(op) => savepri = op.saves_pri(),
            _ => {}
        }

        // find the function with the constructed name; for commutative
        // operators with distinct tags, retry with the tags swapped
        let symname = operator_symname(opername, tag1, tag2, numparam);
        let mut swapparams = false;
        let mut sym_id = self.symbols.find_global(&symname);
        if sym_id.is_none() {
            let commutative = match oper {
                OperId::Binary(op) => op.commutative(),
                _ => false,
            };
            if tag1 == tag2 || oper == OperId::Assign || !commutative {
                return false; // not commutative, cannot swap operands
            }
            debug_assert!(numparam == 2);
            let swapped = operator_symname(opername, tag2, tag1, numparam);
            sym_id = self.symbols.find_global(&swapped);
            if sym_id.is_none() {
                return false;
            }
            swapparams = true;
        }
        let sym_id = sym_id.unwrap();

        // check existence and the proper declaration of this function
        let (usage, sym_tag, sym_name) = {
            let sym = self.symbols.get(sym_id);
            (sym.usage, sym.tag, sym.name.clone())
        };
        if (usage & USAGE_MISSING) != 0 {
            self.error_args(ErrorCode::FunctionNotDefined, &[&sym_name]);
        }
        if (usage & USAGE_PROTOTYPED) == 0 {
            self.error_args(ErrorCode::OperatorNotDeclared, &[&sym_name]);
        }

        // using a redefined operator inside the function that redefines it
        // would recurse into itself; fall back to the built-in there
        if Some(sym_id) == self.cur_func {
            return false;
        }

        // increment/decrement must load the current value first (and store
        // the result back afterwards)
        let incdec = oper == OperId::Inc || oper == OperId::Dec;
        if incdec {
            debug_assert!(!savepri);
            let lv = lval.as_deref_mut().expect("increment target descriptor");
            if lv.ident == Ident::ArrayCell || lv.ident == Ident::ArrayChar {
                self.cg.emit(Instr::Push(Reg::Pri)); // save current address
            }
            let mut target = lv.clone();
            self.rvalue(&mut target);
        }

        debug_assert!(!savepri || !savealt); // either one may be set, not both
        if savepri {
            // the chained comparison operators require that the secondary
            // register survives; the normal instruction sequence (without a
            // user operator) swaps the registers, so the primary is saved
            self.cg.emit(Instr::Push(Reg::Pri));
        } else if savealt {
            self.cg.emit(Instr::Push(Reg::Alt));
        }

        // push parameters and call; a function expects its parameters
        // pushed in reversed order, with the left operand in the secondary
        // register and the right operand in the primary register
        let paramspassed = if oper == OperId::Assign { 1 } else { numparam };
        match paramspassed {
            1 => self.cg.emit(Instr::Push(Reg::Pri)),
            2 => {
                if swapparams {
                    self.cg.emit(Instr::Push(Reg::Alt));
                    self.cg.emit(Instr::Push(Reg::Pri));
                } else {
                    self.cg.emit(Instr::Push(Reg::Pri));
                    self.cg.emit(Instr::Push(Reg::Alt));
                }
            }
            _ => unreachable!(),
        }
        self.cg.emit(Instr::PushVal(paramspassed as Cell * CELL_SIZE));
        self.cg.emit(Instr::Call(sym_id));
        self.symbols.mark_usage(sym_id, USAGE_READ);
        *resulttag = sym_tag; // tag of the called function

        if savepri || savealt {
            self.cg.emit(Instr::Pop(Reg::Alt)); // restore into ALT
        }
        if incdec {
            let lv = lval.as_deref().expect("increment target descriptor");
            if lv.ident == Ident::ArrayCell || lv.ident == Ident::ArrayChar {
                self.cg.emit(Instr::Pop(Reg::Alt)); // restore address
            }
            let target = lv.clone();
            self.store(&target); // store the overload's result
            self.cg.emit(Instr::Swap); // the value stays in the primary register
        }
        true
    }

    /// Tests whether the expression's tag matches one of the tags accepted
    /// by a declaration.
    pub(crate) fn checktag(&self, tags: &[Tag], exprtag: Tag) -> bool {
        debug_assert!(!tags.is_empty());
        tags.iter().any(|formal| matchtag(*formal, exprtag, true))
    }
}
