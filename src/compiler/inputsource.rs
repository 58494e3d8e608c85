use std::fmt;
use std::io;

use backtrace::Backtrace;

/// An in-memory source buffer with line/column tracking. The lexer reads
/// bytes through an immutable borrow and keeps its own cursor, so several
/// passes may scan the same source without rewinding shared state.
#[derive(Debug, Clone)]
pub struct InputSource {
    pub(crate) filename: String,
    pub(crate) input: Vec<u8>,
}

impl InputSource {
    pub fn new<R: io::Read, S: ToString>(filename: S, reader: &mut R) -> io::Result<InputSource> {
        let mut vec = Vec::new();
        reader.read_to_end(&mut vec)?;
        Ok(InputSource { filename: filename.to_string(), input: vec })
    }

    pub fn from_string(string: &str) -> InputSource {
        InputSource { filename: String::new(), input: string.as_bytes().to_vec() }
    }

    pub fn from_buffer(buffer: &[u8]) -> InputSource {
        InputSource { filename: String::new(), input: buffer.to_vec() }
    }

    pub(crate) fn at(&self, offset: usize) -> Option<u8> {
        if offset < self.input.len() {
            Some(self.input[offset])
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPosition {
    pub(crate) line: usize,
    pub(crate) column: usize,
    pub(crate) offset: usize,
}

impl Default for InputPosition {
    fn default() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }
}

impl fmt::Display for InputPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every semantic violation the evaluator can detect. Codes at `Warning`
/// severity are advisory: the emitted code is still well-formed. All
/// reports are non-fatal; the evaluator substitutes a safe default and
/// keeps parsing so a single run surfaces as many diagnostics as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // syntax/structural
    ExpectedToken,          // "expected '{}'"
    InvalidExpression,      // "invalid expression, assumed zero"
    IllegalSymbolName,      // "invalid symbol name \"{}\""
    // lvalue errors
    MustBeLvalue,           // "must be an lvalue (non-constant)"
    ArrayAssignmentMustBeSimple, // "array assignment must be simple assignment"
    MustBeAssignedToArray,  // "must be assigned to an array"
    // type/tag errors
    TagMismatch,            // "tag mismatch"
    UndefinedSymbol,        // "undefined symbol \"{}\""
    FunctionNotDefined,     // "function \"{}\" is not implemented"
    OperatorNotDeclared,    // "user-defined operator \"{}\" must be declared before use"
    MustBeConstantExpression, // "must be a constant expression"
    ConstantSymbolHasNoSize, // "constant symbol has no size"
    FunctionSymbolHasNoSize, // "function symbol has no size"
    ConstantExceedsRange,   // "character constant exceeds range for packed string"
    DivisionByZero,         // "division by zero"
    // arrays
    InvalidSubscript,       // "invalid subscript (not an array or too many subscripts): \"{}\""
    ArrayMustBeIndexed,     // "array must be indexed (variable \"{}\")"
    ArraySizeMismatch,      // "array sizes do not match, or destination array is too small"
    ArrayDimensionMismatch, // "array dimensions do not match"
    UnknownArraySize,       // "unknown array size (variable \"{}\")"
    BracedSubscriptOnMajorDim, // "invalid subscript, use \"[ ]\" operators on major dimensions"
    NamedIndexExpected,     // "invalid subscript, symbolic name expected: \"{}\""
    UnknownField,           // "unknown symbol, or symbol is not a constant: \"{}\""
    IndexOutOfBounds,       // "array index out of bounds (variable \"{}\")"
    IndeterminateArraySize, // "indeterminate array size in \"sizeof\" expression (symbol \"{}\")"
    // call binding
    InvalidFunctionCall,    // "invalid function or declaration"
    InvalidCallSyntax,      // "syntax error in the expression, or invalid function call"
    ArgumentCountMismatch,  // "number of arguments does not match definition"
    TooManyArguments,       // "too many function arguments"
    ArgumentAlreadySet,     // "argument already has a value (argument {})"
    ArgumentHasNoDefault,   // "argument does not have a default value (argument {})"
    ArgumentTypeMismatch,   // "argument type mismatch (argument {})"
    NamedParamsPrecedePositional, // "positional parameters must precede all named parameters"
    // state machine
    UnknownAutomaton,       // "unknown automaton \"{}\""
    UnknownState,           // "unknown state \"{}\" for automaton \"{}\""
    // warnings
    PossiblyUnintendedAssignment, // "possibly unintended assignment"
    PossiblyUnintendedBitwise,    // "possibly unintended bitwise operation"
    RedundantTestAlwaysTrue,      // "redundant test: expression is always true"
    RedundantTestAlwaysFalse,     // "redundant test: expression is always false"
    SelfAssignment,               // "self-assignment (variable \"{}\")"
    PackedUnpackedMix,            // "mixing packed and unpacked arrays"
    ShouldReturnValue,            // "function \"{}\" should return a value"
    DeprecatedFunction,           // "function \"{}\" is deprecated: {}"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl ErrorCode {
    pub fn severity(self) -> Severity {
        use ErrorCode::*;
        match self {
            PossiblyUnintendedAssignment | PossiblyUnintendedBitwise
            | RedundantTestAlwaysTrue | RedundantTestAlwaysFalse
            | SelfAssignment | PackedUnpackedMix | ShouldReturnValue
            | DeprecatedFunction => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Message template; each `{}` is replaced by the next report argument.
    fn template(self) -> &'static str {
        use ErrorCode::*;
        match self {
            ExpectedToken => "expected '{}'",
            InvalidExpression => "invalid expression, assumed zero",
            IllegalSymbolName => "invalid symbol name \"{}\"",
            MustBeLvalue => "must be an lvalue (non-constant)",
            ArrayAssignmentMustBeSimple => "array assignment must be simple assignment",
            MustBeAssignedToArray => "must be assigned to an array",
            TagMismatch => "tag mismatch",
            UndefinedSymbol => "undefined symbol \"{}\"",
            FunctionNotDefined => "function \"{}\" is not implemented",
            OperatorNotDeclared => "user-defined operator \"{}\" must be declared before use",
            MustBeConstantExpression => "must be a constant expression",
            ConstantSymbolHasNoSize => "constant symbol has no size",
            FunctionSymbolHasNoSize => "function symbol has no size",
            ConstantExceedsRange => "character constant exceeds range for packed string",
            DivisionByZero => "division by zero",
            InvalidSubscript => "invalid subscript (not an array or too many subscripts): \"{}\"",
            ArrayMustBeIndexed => "array must be indexed (variable \"{}\")",
            ArraySizeMismatch => "array sizes do not match, or destination array is too small",
            ArrayDimensionMismatch => "array dimensions do not match",
            UnknownArraySize => "unknown array size (variable \"{}\")",
            BracedSubscriptOnMajorDim => "invalid subscript, use \"[ ]\" operators on major dimensions",
            NamedIndexExpected => "invalid subscript, symbolic name expected: \"{}\"",
            UnknownField => "unknown symbol, or symbol is not a constant: \"{}\"",
            IndexOutOfBounds => "array index out of bounds (variable \"{}\")",
            IndeterminateArraySize => "indeterminate array size in \"sizeof\" expression (symbol \"{}\")",
            InvalidFunctionCall => "invalid function or declaration",
            InvalidCallSyntax => "syntax error in the expression, or invalid function call",
            ArgumentCountMismatch => "number of arguments does not match definition",
            TooManyArguments => "too many function arguments",
            ArgumentAlreadySet => "argument already has a value (argument {})",
            ArgumentHasNoDefault => "argument does not have a default value (argument {})",
            ArgumentTypeMismatch => "argument type mismatch (argument {})",
            NamedParamsPrecedePositional => "positional parameters must precede all named parameters",
            UnknownAutomaton => "unknown automaton \"{}\"",
            UnknownState => "unknown state \"{}\" for automaton \"{}\"",
            PossiblyUnintendedAssignment => "possibly unintended assignment",
            PossiblyUnintendedBitwise => "possibly unintended bitwise operation",
            RedundantTestAlwaysTrue => "redundant test: expression is always true",
            RedundantTestAlwaysFalse => "redundant test: expression is always false",
            SelfAssignment => "self-assignment (variable \"{}\")",
            PackedUnpackedMix => "mixing packed and unpacked arrays",
            ShouldReturnValue => "function \"{}\" should return a value",
            DeprecatedFunction => "function \"{}\" is deprecated: {}",
        }
    }

    fn render(self, args: &[&str]) -> String {
        let mut message = String::with_capacity(64);
        let mut args = args.iter();
        let mut rest = self.template();
        while let Some(idx) = rest.find("{}") {
            message.push_str(&rest[..idx]);
            message.push_str(args.next().map(|a| *a).unwrap_or(""));
            rest = &rest[idx + 2..];
        }
        message.push_str(rest);
        message
    }
}

/// A single rendered diagnostic, pinned to its source line.
#[derive(Debug, Clone)]
pub struct Report {
    pub code: ErrorCode,
    pub position: InputPosition,
    pub(crate) filename: String,
    pub(crate) context: String,
    pub message: String,
}

impl Report {
    fn from_source(source: &InputSource, position: InputPosition, code: ErrorCode, message: String) -> Self {
        // Seek line start and end
        let line_start = position.offset - (position.column - 1);
        let mut line_end = position.offset;
        while line_end < source.input.len() && source.input[line_end] != b'\n' {
            line_end += 1;
        }

        // Compensate for '\r\n'
        if line_end > line_start && source.input[line_end - 1] == b'\r' {
            line_end -= 1;
        }

        Self {
            code,
            position,
            filename: source.filename.clone(),
            context: String::from_utf8_lossy(&source.input[line_start..line_end]).to_string(),
            message,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code.severity() {
            Severity::Warning => write!(f, " WARN: ")?,
            Severity::Error => write!(f, "ERROR: ")?,
        }
        writeln!(f, "{}", &self.message)?;

        if self.filename.is_empty() {
            writeln!(f, " +- at {}:{}", self.position.line, self.position.column)?;
        } else {
            writeln!(f, " +- at {}:{}:{}", self.filename, self.position.line, self.position.column)?;
        }

        writeln!(f, " | ")?;
        writeln!(f, " | {}", self.context)?;

        // Write underline indicating where the error occurred
        let mut arrow = String::with_capacity(self.context.len() + 3);
        arrow.push_str(" | ");
        let mut char_col = 1;
        for ch in self.context.chars() {
            if char_col == self.position.column {
                break;
            }
            if ch == '\t' {
                arrow.push('\t');
            } else {
                arrow.push(' ');
            }
            char_col += 1;
        }
        arrow.push('^');
        writeln!(f, "{}", arrow)?;

        Ok(())
    }
}

/// Collector for non-fatal reports. Reporting never interrupts the parse;
/// callers substitute the documented safe default and continue.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reports: Vec<Report>,
}

impl Diagnostics {
    pub(crate) fn new() -> Self {
        Self { reports: Vec::new() }
    }

    pub(crate) fn report(&mut self, source: &InputSource, position: InputPosition, code: ErrorCode, args: &[&str]) {
        let message = code.render(args);
        self.reports.push(Report::from_source(source, position, code, message));
    }

    /// Like `report`, with a nearest-match suggestion appended.
    pub(crate) fn report_suggest(
        &mut self, source: &InputSource, position: InputPosition, code: ErrorCode,
        args: &[&str], suggestion: &str,
    ) {
        let mut message = code.render(args);
        message.push_str(&format!("; did you mean \"{}\"?", suggestion));
        self.reports.push(Report::from_source(source, position, code, message));
    }

    pub(crate) fn clear(&mut self) {
        self.reports.clear();
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn num_errors(&self) -> usize {
        self.reports.iter().filter(|r| r.code.severity() == Severity::Error).count()
    }

    pub fn num_warnings(&self) -> usize {
        self.reports.iter().filter(|r| r.code.severity() == Severity::Warning).count()
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.reports.iter().any(|r| r.code == code)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return Ok(());
        }
        self.reports[0].fmt(f)?;
        for report in self.reports.iter().skip(1) {
            writeln!(f)?;
            report.fmt(f)?;
        }
        Ok(())
    }
}

/// The only fatal condition in the expression core: exhausting the symbol
/// arena while synthesizing a forward-reference function stub. Everything
/// else is a collected `Report`.
pub struct CompileError {
    pub message: String,
    backtrace: Backtrace,
}

impl CompileError {
    pub(crate) fn new<S: ToString>(message: S) -> Self {
        Self { message: message.to_string(), backtrace: Backtrace::new() }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.message)
    }
}

impl fmt::Debug for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fatal: {}", self.message)?;
        write!(f, "{:?}", self.backtrace)
    }
}
