use crate::common::*;
use crate::compiler::inputsource::ErrorCode;
use crate::compiler::symbols::{compare_field_tables, Ident, SymbolId, SymbolTable};
use super::value::Value;
use super::ExprEval;

/// Total size in cells of an array including all sub-dimensions and their
/// indirection vectors; 0 when any dimension is still unknown (forward
/// reference).
pub(crate) fn array_totalsize(symbols: &SymbolTable, id: SymbolId) -> Cell {
    let sym = symbols.get(id);
    debug_assert!(sym.is_array());
    let length = sym.array().length;
    if sym.array().level > 0 {
        let dependent = symbols.find_dependent(id).expect("sub-dimension of multi-dimensional array");
        let sublength = array_totalsize(symbols, dependent);
        if sublength > 0 {
            return length + length * sublength;
        }
        return 0;
    }
    length
}

/// Length of the dimension `level` dimensions below the given array symbol.
pub(crate) fn array_levelsize(symbols: &SymbolTable, id: SymbolId, level: u16) -> Cell {
    let mut id = id;
    debug_assert!(symbols.get(id).is_array());
    debug_assert!(level <= symbols.get(id).array().level);
    for _ in 0..level {
        id = symbols.find_dependent(id).expect("sub-dimension of multi-dimensional array");
    }
    symbols.get(id).array().length
}

impl<'a> ExprEval<'a> {
    /// Validates assignment/comparison compatibility of two array-typed
    /// values and returns the number of cells to copy (0 after a reported
    /// shape error).
    ///
    /// The right side must be an array variable of the same dimensions, an
    /// array literal, or a literal string. Single-dimensional arrays accept
    /// a *smaller* right side when it is a literal string and the
    /// destination has no named-index table; this shrink-only exception is
    /// what makes string handling bearable and is deliberately one-way.
    /// Symbolic (named-index) arrays always match exactly, and every
    /// sub-level of a multi-dimensional array must match exactly in length,
    /// named-index table and packedness.
    pub(crate) fn checkarrays(&mut self, lval1: &Value, lval2: &Value) -> Cell {
        let sym1 = lval1.sym.expect("left side of array check has a symbol");
        debug_assert!(lval1.is_array() || self.is_pseudo_array(lval1));

        let mut exactmatch = true;
        let (mut ltlength, mut ispacked1, level1, names1) = {
            let sym = self.symbols.get(sym1);
            let info = sym.array();
            (info.length, sym.is_packed(), info.level, info.names.clone())
        };
        if self.is_pseudo_array(lval1) {
            ltlength = lval1.constval;
            ispacked1 = lval1.ispacked;
        }
        let sym1_name = self.symbols.get(sym1).name.clone();
        let totalsize1 = array_totalsize(self.symbols, sym1);

        if !lval2.is_array() && !self.is_pseudo_array(lval2) {
            self.error_args(ErrorCode::ArrayMustBeIndexed, &[&sym1_name]);
            return 0;
        }

        let mut length;
        let level;
        let ispacked2;
        if let Some(sym2) = lval2.sym {
            if totalsize1 == 0 {
                self.error_args(ErrorCode::UnknownArraySize, &[&sym1_name]);
                return 0;
            }
            let (length2, level2, packed2, names2) = {
                let sym = self.symbols.get(sym2);
                let info = sym.array();
                (info.length, info.level, sym.is_packed(), info.names.clone())
            };
            if lval2.constval == 0 {
                // array variable
                length = length2;
                if names1.is_some()
                    && !self.is_pseudo_array(lval1)
                    && !compare_field_tables(&names1, &names2)
                {
                    self.error(ErrorCode::ArraySizeMismatch);
                }
                ispacked2 = packed2;
            } else {
                // pseudo-array (sub-array via a named field)
                length = lval2.constval;
                if level2 != 0 {
                    let name2 = self.symbols.get(sym2).name.clone();
                    self.error_args(ErrorCode::InvalidSubscript, &[&name2]);
                }
                ispacked2 = lval2.ispacked;
            }
            level = level2;
            if level == 0 && names1.is_none() {
                exactmatch = false;
            }
        } else {
            // literal array or literal string
            length = lval2.constval;
            level = 0;
            ispacked2 = lval2.ispacked;
            if names1.is_some() {
                self.error(ErrorCode::ArraySizeMismatch);
            }
            // the destination may have unknown size only for an empty
            // literal string (just the terminator)
            if totalsize1 == 0 {
                if length == -1 {
                    ltlength = 1;
                } else {
                    self.error_args(ErrorCode::UnknownArraySize, &[&sym1_name]);
                }
            }
            // a negative length marks a literal string: the source may be
            // smaller than the destination (shrink-only, never the
            // reverse; symbolic destinations were rejected above)
            if length < 0 {
                length = -length;
                exactmatch = false;
            }
        }

        if level1 != level {
            self.error(ErrorCode::ArrayDimensionMismatch);
            return 0;
        } else if ltlength < length || exactmatch && ltlength > length || length == 0 {
            self.error(ErrorCode::ArraySizeMismatch);
            return 0;
        }
        if ispacked1 != ispacked2 {
            self.error(ErrorCode::PackedUnpackedMix);
        }
        if level > 0 {
            // check the sizes of all sublevels too; sym2 must be valid
            // because only variables can be multi-dimensional (there are
            // no multi-dimensional literals)
            debug_assert!(exactmatch);
            let mut sub1 = sym1;
            let mut sub2 = lval2.sym.expect("multi-dimensional right side has a symbol");
            for _ in 0..level {
                sub1 = self.symbols.find_dependent(sub1).expect("dimensions were checked equal");
                sub2 = self.symbols.find_dependent(sub2).expect("dimensions were checked equal");
                let (len1, packed1, subnames1) = {
                    let sym = self.symbols.get(sub1);
                    (sym.array().length, sym.is_packed(), sym.array().names.clone())
                };
                let (len2, packed2, subnames2) = {
                    let sym = self.symbols.get(sub2);
                    (sym.array().length, sym.is_packed(), sym.array().names.clone())
                };
                if len1 != len2 {
                    self.error(ErrorCode::ArraySizeMismatch);
                }
                if subnames1.is_some() && !compare_field_tables(&subnames1, &subnames2) {
                    self.error(ErrorCode::ArraySizeMismatch);
                }
                if packed1 != packed2 {
                    self.error(ErrorCode::ArraySizeMismatch);
                }
            }
            // total size in cells of the multi-dimensional array
            length = array_totalsize(self.symbols, sym1);
            debug_assert!(length > 0);
        }

        length
    }

    /// A single array element counts as a sub-array when its named-index
    /// field spans more than one storage cell.
    pub(crate) fn is_pseudo_array(&self, lval: &Value) -> bool {
        if lval.ident != Ident::ArrayCell && lval.ident != Ident::ArrayChar {
            return false;
        }
        if lval.constval <= 1 {
            return false;
        }
        match lval.sym {
            Some(sym) => {
                let sym = self.symbols.get(sym);
                sym.is_array() && sym.array().level == 0
            }
            None => false,
        }
    }
}
