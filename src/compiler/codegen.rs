use crate::common::*;
use super::symbols::SymbolId;

/// The two VM work registers. Binary operations combine ALT (left) with
/// PRI (right) and leave the result in PRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Reg {
    Pri,
    Alt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Label(pub u32);

/// Binary operator kinds, one per entry of the precedence tables. This is
/// the single identity every per-operator lookup (name, commutativity,
/// register-preservation) is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Op {
    Mult, Div, Mod,
    Add, Sub,
    Shl, Shr, Shru,
    And, Xor, Or,
    Le, Ge, Lt, Gt,
    Eq, Ne,
}

/// One staged VM instruction. These are abstract: encoding them into a
/// particular VM's opcodes is the backend's concern, the contract here is
/// only what each instruction must do to the registers, stack and heap.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Instr {
    Const(Reg, Cell),
    /// Load the value of a directly addressed variable.
    LoadSym(Reg, SymbolId),
    /// Load the value of the cell a reference variable points at.
    LoadRef(Reg, SymbolId),
    /// PRI = cell at address PRI.
    LoadInd,
    /// PRI = packed character at character-address PRI.
    LoadCharInd,
    /// Load the address of a variable or array.
    Address(Reg, SymbolId),
    /// Read an automaton's hidden state cell.
    LoadAutomaton(Reg, u32),
    StoreSym(SymbolId),
    StoreRef(SymbolId),
    /// Cell at address ALT = PRI.
    StoreInd,
    /// Packed character at character-address ALT = PRI.
    StoreCharInd,
    IncSym(SymbolId),
    IncRef(SymbolId),
    /// Increment the cell addressed by PRI.
    IncInd,
    /// Increment the packed character addressed by PRI.
    IncChar,
    DecSym(SymbolId),
    DecRef(SymbolId),
    DecInd,
    DecChar,
    Push(Reg),
    Pop(Reg),
    PushVal(Cell),
    /// Push PRI marked for run-time relocation (native calls).
    PushReloc,
    /// PRI <-> ALT.
    Swap,
    /// PRI <-> top of stack.
    SwapStack,
    /// Adjust the stack pointer by the given number of bytes.
    StackAdjust(Cell),
    /// PRI = ALT op PRI; comparisons yield 0/1. The relational operators
    /// additionally leave their right operand in ALT (their sequence ends
    /// in a register swap), which is what a chained comparison reuses.
    Binary(Op),
    /// Compare the arrays at [ALT] and [PRI] over the given number of
    /// bytes; PRI becomes 0/1. Only equality and inequality exist in
    /// array form.
    CmpArray(Op, Cell),
    /// Opens the next link of a relational chain: pushes the running
    /// result and moves the shared operand from ALT back into PRI.
    RelPrefix,
    /// Closes a link: pops the running result and ANDs it into PRI.
    RelSuffix,
    Neg,
    Invert,
    LogicNot,
    Jump(Label),
    JumpEq0(Label),
    JumpNe0(Label),
    SetLabel(Label),
    /// Abort at run time unless 0 <= PRI <= limit.
    Bounds(Cell),
    /// Scale the cell index in PRI (resp. ALT) to a byte offset.
    Cell2Addr,
    Cell2AddrAlt,
    /// Scale the character index in PRI to a byte offset.
    Char2Addr,
    /// Split the character address in PRI into cell address and intra-cell
    /// position (after the base address was added).
    CharAlign,
    /// Grow (positive) or shrink (negative) the heap by bytes; on growth
    /// ALT receives the address of the new block.
    ModHeap(Cell),
    /// Allocate one heap cell, store PRI there, PRI = its address.
    SetHeapPri,
    /// Allocate one heap cell, store a constant there, PRI = its address.
    SetHeap(Cell),
    /// Copy bytes from [PRI] to [ALT].
    MemCopy(Cell),
    /// Copy a 2-dimensional array including its indirection vectors.
    Copy2d { major: Cell, minor: Cell },
    Call(SymbolId),
}

/// Checkpoint into the staging buffer. Everything emitted after a mark can
/// be scrapped wholesale; this is how constant folding, short-circuit
/// folding and branch measurement discard speculative code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StageMark(usize);

#[derive(Debug, Clone, PartialEq)]
enum Staged {
    Op(Instr),
    StartReorder,
    /// Start of the staged expression for the argument at this position.
    ArgStart(usize),
}

/// The staging buffer. Instructions pile up here while an expression is
/// being parsed; they become final only when the image is taken at the end
/// of the write pass. Until then any suffix can be deleted through a
/// `StageMark`, and argument segments between `start_reorder` and
/// `end_reorder` are re-emitted in reverse positional order, which is how
/// the right-to-left push order of call arguments comes about even though
/// they are parsed left to right.
pub(crate) struct CodeGen {
    staged: Vec<Staged>,
    next_label: u32,
    reorder_starts: Vec<usize>,
}

impl CodeGen {
    pub(crate) fn new() -> Self {
        Self { staged: Vec::with_capacity(128), next_label: 0, reorder_starts: Vec::new() }
    }

    pub(crate) fn reset(&mut self) {
        self.staged.clear();
        self.next_label = 0;
        self.reorder_starts.clear();
    }

    pub(crate) fn emit(&mut self, instr: Instr) {
        self.staged.push(Staged::Op(instr));
    }

    pub(crate) fn ldconst(&mut self, value: Cell, reg: Reg) {
        self.emit(Instr::Const(reg, value));
    }

    pub(crate) fn get_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub(crate) fn set_label(&mut self, label: Label) {
        self.emit(Instr::SetLabel(label));
    }

    //--------------------------------------------------------------------------
    // Checkpoints
    //--------------------------------------------------------------------------

    pub(crate) fn mark(&self) -> StageMark {
        StageMark(self.staged.len())
    }

    /// Deletes everything staged since the mark.
    pub(crate) fn scrap_to(&mut self, mark: StageMark) {
        debug_assert!(mark.0 <= self.staged.len(), "stage mark outlived a reorder");
        self.staged.truncate(mark.0);
    }

    //--------------------------------------------------------------------------
    // Argument reordering
    //--------------------------------------------------------------------------

    pub(crate) fn start_reorder(&mut self) {
        self.reorder_starts.push(self.staged.len());
        self.staged.push(Staged::StartReorder);
    }

    /// Marks the start of the staged expression for the argument at
    /// `position` (positions need not arrive in order: named arguments).
    pub(crate) fn mark_arg(&mut self, position: usize) {
        debug_assert!(!self.reorder_starts.is_empty());
        self.staged.push(Staged::ArgStart(position));
    }

    /// Closes the current reorder frame: the argument segments inside it
    /// are re-emitted in descending position order. Nested frames have
    /// already collapsed to plain instructions by the time the outer one
    /// closes, so a flat scan sees only this frame's markers.
    pub(crate) fn end_reorder(&mut self) {
        let start = self.reorder_starts.pop().expect("unbalanced reorder");
        debug_assert_eq!(self.staged[start], Staged::StartReorder);

        let tail: Vec<Staged> = self.staged.split_off(start + 1);
        self.staged.pop(); // the StartReorder marker

        let mut segments: Vec<(usize, Vec<Staged>)> = Vec::new();
        for staged in tail.into_iter() {
            match staged {
                Staged::ArgStart(position) => segments.push((position, Vec::new())),
                other => match segments.last_mut() {
                    Some((_, segment)) => segment.push(other),
                    None => self.staged.push(other), // before any argument
                },
            }
        }
        segments.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, segment) in segments.into_iter() {
            self.staged.extend(segment.into_iter());
        }
    }

    /// Takes the finished instruction stream. Only valid outside reorder
    /// frames.
    pub(crate) fn take_image(&mut self) -> CodeImage {
        debug_assert!(self.reorder_starts.is_empty(), "taking image inside a reorder frame");
        let staged = std::mem::replace(&mut self.staged, Vec::new());
        let instrs = staged
            .into_iter()
            .map(|staged| match staged {
                Staged::Op(instr) => instr,
                other => unreachable!("marker {:?} left in finished stage", other),
            })
            .collect();
        CodeImage { instrs }
    }
}

/// The finished instruction stream of one compiled expression.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeImage {
    pub instrs: Vec<Instr>,
}

impl CodeImage {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("code image serialization")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }
}
