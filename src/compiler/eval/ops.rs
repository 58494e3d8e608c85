use crate::common::*;
use crate::compiler::codegen::Op;
use crate::compiler::lexer::Token;
use crate::compiler::symbols::Ident;
use super::value::Value;

impl Op {
    /// Operator text used to build user-defined operator names. Shift and
    /// bitwise operators cannot be overloaded and have no name.
    pub(crate) fn user_name(self) -> Option<&'static str> {
        match self {
            Op::Mult => Some("*"),
            Op::Div => Some("/"),
            Op::Mod => Some("%"),
            Op::Add => Some("+"),
            Op::Sub => Some("-"),
            Op::Le => Some("<="),
            Op::Ge => Some(">="),
            Op::Lt => Some("<"),
            Op::Gt => Some(">"),
            Op::Eq => Some("=="),
            Op::Ne => Some("!="),
            Op::Shl | Op::Shr | Op::Shru | Op::And | Op::Xor | Op::Or => None,
        }
    }

    /// Whether `x op y == y op x`. When the right operand of a commutative
    /// operator turns out constant, the staged "push left, load right"
    /// sequence is scrapped and the constant goes straight into the
    /// secondary register.
    pub(crate) fn commutative(self) -> bool {
        match self {
            Op::Add | Op::Mult | Op::Eq | Op::Ne | Op::And | Op::Xor | Op::Or => true,
            _ => false,
        }
    }

    /// The chained-relational operators need the secondary register to
    /// survive a user-operator call; the resolver saves it around the call.
    pub(crate) fn saves_pri(self) -> bool {
        match self {
            Op::Le | Op::Ge | Op::Lt | Op::Gt => true,
            _ => false,
        }
    }

    pub(crate) fn is_bitwise_and_or(self) -> bool {
        self == Op::And || self == Op::Or
    }

    /// Array operands are permitted only under the (in)equality operators.
    pub(crate) fn has_array_form(self) -> bool {
        self == Op::Eq || self == Op::Ne
    }
}

/// Operator identity for user-operator resolution: the built-in operation
/// a user-defined function may replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperId {
    /// Simple assignment (`=`); overloads act as conversion functions.
    Assign,
    Binary(Op),
    Not,
    Neg,
    Inc,
    Dec,
}

impl OperId {
    pub(crate) fn name(self) -> Option<&'static str> {
        match self {
            OperId::Assign => Some("="),
            OperId::Binary(op) => op.user_name(),
            OperId::Not => Some("!"),
            OperId::Neg => Some("-"),
            OperId::Inc => Some("++"),
            OperId::Dec => Some("--"),
        }
    }
}

lazy_static::lazy_static! {
    // per-level operator lists; the token drives matching, the op drives
    // folding and emission
    pub(crate) static ref LIST3: Vec<(Token, Op)> = vec![
        (Token::Star, Op::Mult), (Token::Slash, Op::Div), (Token::Percent, Op::Mod),
    ];
    pub(crate) static ref LIST4: Vec<(Token, Op)> = vec![
        (Token::Plus, Op::Add), (Token::Minus, Op::Sub),
    ];
    pub(crate) static ref LIST5: Vec<(Token, Op)> = vec![
        (Token::Shl, Op::Shl), (Token::Shr, Op::Shr), (Token::Shru, Op::Shru),
    ];
    pub(crate) static ref LIST6: Vec<(Token, Op)> = vec![(Token::Amp, Op::And)];
    pub(crate) static ref LIST7: Vec<(Token, Op)> = vec![(Token::Caret, Op::Xor)];
    pub(crate) static ref LIST8: Vec<(Token, Op)> = vec![(Token::Pipe, Op::Or)];
    pub(crate) static ref LIST9: Vec<(Token, Op)> = vec![
        (Token::Le, Op::Le), (Token::Ge, Op::Ge), (Token::Lt, Op::Lt), (Token::Gt, Op::Gt),
    ];
    pub(crate) static ref LIST10: Vec<(Token, Op)> = vec![
        (Token::Eq, Op::Eq), (Token::Ne, Op::Ne),
    ];
}

/// Floored division: quotient and remainder both round toward negative
/// infinity, so a non-zero remainder always carries the divisor's sign.
/// Returns `None` on division by zero; the caller reports and folds to 0.
pub(crate) fn floored_div(a: Cell, b: Cell, return_remainder: bool) -> Option<Cell> {
    if b == 0 {
        return None;
    }
    // first truncated division, then fiddle the values into floored form
    let mut q = (a.wrapping_abs() as UCell / b.wrapping_abs() as UCell) as Cell;
    if (a ^ b) < 0 {
        q = q.wrapping_neg();
    }
    let mut r = a.wrapping_sub(q.wrapping_mul(b));
    if r != 0 && (r ^ b) < 0 {
        q -= 1;
        r += b;
    }
    Some(if return_remainder { r } else { q })
}

/// Pure constant-folding table. Arithmetic wraps at machine-word width
/// (no overflow trap); the relational operators AND into the running
/// `boolresult` and yield the *right* operand, which is what lets a
/// relational chain reuse it as the next left operand.
pub(crate) fn calc(left: Cell, op: Op, right: Cell, boolresult: &mut bool) -> Option<Cell> {
    let result = match op {
        Op::Or => left | right,
        Op::Xor => left ^ right,
        Op::And => left & right,
        Op::Eq => (left == right) as Cell,
        Op::Ne => (left != right) as Cell,
        Op::Le => {
            *boolresult &= left <= right;
            right
        }
        Op::Ge => {
            *boolresult &= left >= right;
            right
        }
        Op::Lt => {
            *boolresult &= left < right;
            right
        }
        Op::Gt => {
            *boolresult &= left > right;
            right
        }
        Op::Shr => left >> (right as u32 & 63),
        Op::Shru => ((left as UCell) >> (right as u32 & 63)) as Cell,
        Op::Shl => ((left as UCell) << (right as u32 & 63)) as Cell,
        Op::Add => left.wrapping_add(right),
        Op::Sub => left.wrapping_sub(right),
        Op::Mult => left.wrapping_mul(right),
        Op::Div => return floored_div(left, right, false),
        Op::Mod => return floored_div(left, right, true),
    };
    Some(result)
}

/// Returns the factor by which the *other* operand's value must be scaled
/// when `lval1` is an array combined under `+`/`-`: constant cell indices
/// become byte offsets. In every other situation the factor is 1. The
/// rule is applied to both operand orders in turn, so it holds
/// symmetrically.
pub(crate) fn dbltest(op: Op, lval1: &Value, lval2: &Value) -> Cell {
    if op != Op::Add && op != Op::Sub {
        return 1;
    }
    if lval1.ident != Ident::Array {
        return 1;
    }
    if lval2.ident == Ident::Array {
        return 1;
    }
    CELL_SIZE
}
