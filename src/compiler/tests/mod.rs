/**
 * compiler/tests
 *
 * Exercises the expression evaluator end to end: declare the symbols a
 * statement layer would have declared, compile one expression, and check
 * the folded result, the diagnostics and the emitted instruction stream.
 */

mod utils;

mod lexer;
mod eval_fold;
mod eval_arrays;
mod eval_userops;
mod eval_calls;
mod eval_ternary;
mod codegen_image;

pub(crate) use utils::{branch_heap, field_table, heap_paths, net_heap, Tester};

pub(crate) use crate::common::*;
pub(crate) use crate::compiler::codegen::{Instr, Op, Reg};
pub(crate) use crate::compiler::inputsource::ErrorCode;
pub(crate) use crate::compiler::symbols::ArgInfo;
