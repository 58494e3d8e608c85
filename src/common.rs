///////////////////// PRELUDE /////////////////////

pub(crate) use maplit::hashmap;
pub(crate) use std::collections::{HashMap, VecDeque};

/// The VM's machine word. Everything the compiled program touches is a
/// cell: integers, characters, tags, addresses.
pub type Cell = i64;
pub type UCell = u64;

/// Size of a cell in bytes. The expression core scales constant array
/// indices by this value when folding address arithmetic.
pub const CELL_SIZE: Cell = 8;

/// Bits per packed character; `CELL_SIZE * 8 / CHAR_BITS` characters fit
/// in one cell.
pub const CHAR_BITS: Cell = 8;

/// Maximum number of array dimensions.
pub const DIMEN_MAX: usize = 3;

/// Maximum number of arguments to a single function call.
pub const MAX_ARGS: usize = 64;

/// Tags are nominal type identifiers; 0 is the untyped ("any") tag.
pub type Tag = i32;

/// Set on tags whose name starts with an uppercase letter: such tags are
/// never silently coerced to the untyped tag.
pub const FIXED_TAG: Tag = 0x4000_0000;
/// Set on tags that have been exported (returned by `tagof`).
pub const PUBLIC_TAG: Tag = 0x2000_0000;
