mod common;
mod compiler;

pub use common::{Cell, Tag, UCell, CELL_SIZE, CHAR_BITS, DIMEN_MAX, FIXED_TAG, PUBLIC_TAG};
pub use compiler::codegen::{CodeImage, Instr, Label, Op, Reg};
pub use compiler::inputsource::{
    CompileError, Diagnostics, ErrorCode, InputPosition, InputSource, Severity,
};
pub use compiler::symbols::{ArgInfo, DefaultValue, FieldEntry, Ident};
pub use compiler::{Compilation, Compiler};
