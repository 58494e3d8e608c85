use crate::common::*;
use crate::compiler::symbols::{Ident, SymbolId};

/// The semantic state of one (sub-)expression, threaded by mutable
/// reference through every hierarchy level. A descriptor is cleared at the
/// start of each grammar-level invocation, mutated in place as operations
/// combine, and dies with the enclosing call; it never outlives the
/// statement being parsed.
///
/// Which fields are meaningful is decided entirely by `ident`:
/// `constval` is authoritative only for `Ident::Constant` (it is retained
/// opportunistically for array/field bookkeeping), and `sym` is set
/// whenever the identity denotes a variable, array or function.
#[derive(Debug, Clone)]
pub(crate) struct Value {
    pub ident: Ident,
    pub sym: Option<SymbolId>,
    pub constval: Cell,
    pub tag: Tag,
    /// Value is drawn from a packed array (or is a packed literal).
    pub ispacked: bool,
    /// Running conjunction used by the chained-relational evaluator.
    pub boolresult: bool,
    /// Last constant index observed per dimension; drives self-assignment
    /// detection. `None` while no assignment target is being tracked.
    pub arrayidx: Option<[Cell; DIMEN_MAX]>,
}

/// Initializer for the constant-index trace: an index no real subscript
/// can produce (negative indices are always invalid).
pub(crate) const UNTRACKED_IDX: Cell = Cell::MIN;

impl Value {
    pub(crate) fn new() -> Self {
        Self {
            ident: Ident::Unknown,
            sym: None,
            constval: 0,
            tag: 0,
            ispacked: false,
            boolresult: false,
            arrayidx: None,
        }
    }

    /// Resets every field except the index trace, which the assignment
    /// level manages explicitly.
    pub(crate) fn clear(&mut self) {
        self.ident = Ident::Unknown;
        self.sym = None;
        self.constval = 0;
        self.tag = 0;
        self.ispacked = false;
        self.boolresult = false;
    }

    pub(crate) fn is_array(&self) -> bool {
        self.ident == Ident::Array || self.ident == Ident::RefArray
    }

    pub(crate) fn is_constant(&self) -> bool {
        self.ident == Ident::Constant
    }
}
