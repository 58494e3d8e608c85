use crate::common::*;
use super::arena::{Arena, Id};
use super::inputsource::CompileError;

pub type SymbolId = Id<Symbol>;

/// Ceiling on the number of symbols a single compilation unit may hold.
/// Running into it while synthesizing a forward-reference function stub is
/// the one condition that aborts compilation.
const MAX_SYMBOLS: usize = 4096;

/// Identity class of a value or symbol. For a value descriptor the identity
/// decides which other fields are meaningful; for a symbol it is the
/// storage class. `Varargs` only ever appears in argument descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ident {
    /// Descriptor without a resolved identity yet (freshly cleared).
    Unknown,
    /// Compile-time constant; `constval` is authoritative.
    Constant,
    /// Mutable variable addressed directly.
    Variable,
    /// Variable holding the address of a cell (reference parameter).
    Reference,
    /// Array addressed directly; the primary register holds its base.
    Array,
    /// Array addressed through a reference (parameter or sub-dimension).
    RefArray,
    /// Single cell of an array; the primary register holds its address.
    ArrayCell,
    /// Packed character within an array cell.
    ArrayChar,
    /// Declared function.
    Function,
    /// Forward-referenced function (synthesized stub).
    RefFunc,
    /// Generic expression result held in the primary register.
    Expression,
    /// Code label; never a valid operand.
    Label,
    /// Variable-arity argument tail (argument descriptors only).
    Varargs,
}

impl Default for Ident {
    fn default() -> Self {
        Ident::Unknown
    }
}

// usage bit flags, kept as a plain mask like the original's
pub(crate) const USAGE_CONST: u16 = 0x0001;
pub(crate) const USAGE_DEFINED: u16 = 0x0002;
pub(crate) const USAGE_PROTOTYPED: u16 = 0x0004;
pub(crate) const USAGE_MISSING: u16 = 0x0008;
pub(crate) const USAGE_NATIVE: u16 = 0x0010;
pub(crate) const USAGE_PACKED: u16 = 0x0020;
pub(crate) const USAGE_READ: u16 = 0x0040;
pub(crate) const USAGE_WRITTEN: u16 = 0x0080;
pub(crate) const USAGE_RETVALUE: u16 = 0x0100;
pub(crate) const USAGE_DEPRECATED: u16 = 0x0200;

/// One row of a named-index table. Tables are kept sorted by `value` and
/// closed by a sentinel row (empty name, value = total length) so a field's
/// cell span is `next.value - value`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    pub value: Cell,
    pub tag: Tag,
    pub packed: bool,
}

/// Array dimension data. Multi-dimensional arrays chain their dimensions
/// through `Symbol::child`: this struct describes the major dimension and
/// `level` counts the dimensions below it.
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    pub length: Cell,
    pub level: u16,
    pub names: Option<Vec<FieldEntry>>,
}

/// Default value of a function argument.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Value { value: Cell, tag: Tag },
    /// Array data, dumped into static storage on first use and copied onto
    /// the heap per call (unless the argument is const).
    Array { data: Vec<Cell>, arraysize: Cell },
    /// The size of another argument's array, resolved after binding.
    SizeOf { arg: String, level: u16 },
    /// The tag of another argument, resolved after binding.
    TagOf { arg: String },
}

/// Declared function argument.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub name: String,
    pub ident: Ident, // Variable | Reference | RefArray | Varargs
    pub is_const: bool,
    pub packed: bool,
    pub tags: Vec<Tag>,
    /// Declared dimension sizes; 0 means "unspecified".
    pub dim: Vec<Cell>,
    pub dimnames: Vec<Option<Vec<FieldEntry>>>,
    pub default: Option<DefaultValue>,
}

impl ArgInfo {
    fn new(name: &str, ident: Ident, tags: Vec<Tag>) -> Self {
        Self {
            name: name.to_string(),
            ident,
            is_const: false,
            packed: false,
            tags: if tags.is_empty() { vec![0] } else { tags },
            dim: Vec::new(),
            dimnames: Vec::new(),
            default: None,
        }
    }

    /// A by-value (single cell) parameter.
    pub fn value(name: &str, tags: Vec<Tag>) -> Self {
        Self::new(name, Ident::Variable, tags)
    }

    /// A by-reference (single cell) parameter.
    pub fn reference(name: &str, tags: Vec<Tag>) -> Self {
        Self::new(name, Ident::Reference, tags)
    }

    /// An array parameter with the declared dimension sizes (0 means
    /// "any size").
    pub fn array(name: &str, tags: Vec<Tag>, dim: Vec<Cell>) -> Self {
        let mut arg = Self::new(name, Ident::RefArray, tags);
        arg.dimnames = vec![None; dim.len()];
        arg.dim = dim;
        arg
    }

    /// The variable-arity tail; at most one, always last.
    pub fn varargs(tags: Vec<Tag>) -> Self {
        Self::new("...", Ident::Varargs, tags)
    }

    pub fn const_qualified(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn packed(mut self) -> Self {
        self.packed = true;
        self
    }

    pub fn with_dimnames(mut self, dimnames: Vec<Option<Vec<FieldEntry>>>) -> Self {
        debug_assert_eq!(dimnames.len(), self.dim.len());
        self.dimnames = dimnames;
        self
    }

    pub fn with_default(mut self, value: Cell, tag: Tag) -> Self {
        self.default = Some(DefaultValue::Value { value, tag });
        self
    }

    pub fn with_default_array(mut self, data: Vec<Cell>, arraysize: Cell) -> Self {
        debug_assert!(arraysize >= data.len() as Cell);
        self.default = Some(DefaultValue::Array { data, arraysize });
        self
    }

    /// Defaults to `sizeof` of another parameter (at the given dimension
    /// level), resolved per call from the argument actually bound there.
    pub fn with_default_sizeof(mut self, arg: &str, level: u16) -> Self {
        self.default = Some(DefaultValue::SizeOf { arg: arg.to_string(), level });
        self
    }

    pub fn with_default_tagof(mut self, arg: &str) -> Self {
        self.default = Some(DefaultValue::TagOf { arg: arg.to_string() });
        self
    }
}

#[derive(Debug)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub ident: Ident,
    pub tag: Tag,
    /// Address for variables/arrays, value for constants.
    pub addr: Cell,
    pub usage: u16,
    pub array: Option<ArrayInfo>,
    pub args: Option<Vec<ArgInfo>>,
    /// Sub-dimension of an array, or the array-return symbol of a function.
    pub child: Option<SymbolId>,
    pub parent: Option<SymbolId>,
    /// Worst-case stack/heap usage of calls made while compiling this
    /// function's body (functions only).
    pub stacksize: Cell,
    /// Deprecation note, if the function was declared deprecated.
    pub deprecation: Option<String>,
}

impl Symbol {
    pub(crate) fn is_array(&self) -> bool {
        self.ident == Ident::Array || self.ident == Ident::RefArray
    }

    pub(crate) fn array(&self) -> &ArrayInfo {
        debug_assert!(self.is_array());
        self.array.as_ref().unwrap()
    }

    pub(crate) fn is_packed(&self) -> bool {
        (self.usage & USAGE_PACKED) != 0
    }
}

pub(crate) struct Automaton {
    pub name: String,
    pub index: usize,
}

pub(crate) struct AutomatonState {
    pub name: String,
    pub automaton: usize,
    pub value: Cell,
}

/// Edit distance below which a near-miss name is offered as a suggestion.
pub(crate) const MAX_EDIT_DIST: usize = 2;

pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Symbol storage and lookup for one compilation unit: constants, local
/// and global scope, tag registry and the automaton/state tables. The
/// evaluator only reads symbols through ids; ownership stays here.
pub(crate) struct SymbolTable {
    arena: Arena<Symbol>,
    locals: Vec<SymbolId>,
    globals: HashMap<String, SymbolId>,
    constants: HashMap<String, SymbolId>,
    tags: Vec<String>,
    exported_tags: Vec<Tag>,
    automatons: Vec<Automaton>,
    states: Vec<AutomatonState>,
}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        Self {
            arena: Arena::with_limit(MAX_SYMBOLS),
            locals: Vec::new(),
            globals: HashMap::new(),
            constants: HashMap::new(),
            tags: vec!["_".to_string(), "bool".to_string()],
            exported_tags: Vec::new(),
            automatons: Vec::new(),
            states: Vec::new(),
        }
    }

    //--------------------------------------------------------------------------
    // Tags
    //--------------------------------------------------------------------------

    /// Returns the tag for `name`, registering it on first use. Tag names
    /// starting with an uppercase letter are "fixed": they refuse silent
    /// coercion to the untyped tag.
    pub(crate) fn add_tag(&mut self, name: &str) -> Tag {
        if name.is_empty() || name == "_" {
            return 0;
        }
        let fixed = if name.chars().next().unwrap().is_ascii_uppercase() { FIXED_TAG } else { 0 };
        for (index, tag_name) in self.tags.iter().enumerate() {
            if tag_name == name {
                return index as Tag | fixed;
            }
        }
        self.tags.push(name.to_string());
        (self.tags.len() - 1) as Tag | fixed
    }

    pub(crate) fn find_tag(&self, name: &str) -> Option<Tag> {
        if name.is_empty() || name == "_" {
            return Some(0);
        }
        let fixed = if name.chars().next().unwrap().is_ascii_uppercase() { FIXED_TAG } else { 0 };
        self.tags
            .iter()
            .position(|tag_name| tag_name == name)
            .map(|index| index as Tag | fixed)
    }

    pub(crate) fn export_tag(&mut self, tag: Tag) {
        if !self.exported_tags.contains(&tag) {
            self.exported_tags.push(tag);
        }
    }

    /// Tags that escaped into compiled code through `tagof`; the output
    /// writer must publish these.
    pub(crate) fn exported_tags(&self) -> &[Tag] {
        &self.exported_tags
    }

    //--------------------------------------------------------------------------
    // Lookup
    //--------------------------------------------------------------------------

    pub(crate) fn get(&self, id: SymbolId) -> &Symbol {
        &self.arena[id]
    }

    pub(crate) fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.arena[id]
    }

    pub(crate) fn find_local(&self, name: &str) -> Option<SymbolId> {
        // innermost declaration wins
        self.locals.iter().rev().find(|id| self.arena[**id].name == name).copied()
    }

    pub(crate) fn find_global(&self, name: &str) -> Option<SymbolId> {
        self.globals.get(name).copied()
    }

    pub(crate) fn find_const(&self, name: &str) -> Option<SymbolId> {
        self.constants.get(name).copied()
    }

    /// Walks one array dimension down (or from a function to its
    /// array-return symbol).
    pub(crate) fn find_dependent(&self, id: SymbolId) -> Option<SymbolId> {
        self.arena[id].child
    }

    /// Nearest existing symbol name, for "did you mean" suggestions. An
    /// exact match is no suggestion (the name resolved, just not to what
    /// the context needed).
    pub(crate) fn closest_symbol(&self, name: &str) -> Option<String> {
        let mut best: Option<(usize, &str)> = None;
        for sym in self.arena.iter() {
            if sym.parent.is_some() {
                continue; // sub-dimensions are not addressable by name
            }
            let dist = levenshtein(&sym.name, name);
            if dist == 0 {
                continue;
            }
            if dist <= MAX_EDIT_DIST && best.map(|(d, _)| dist < d).unwrap_or(true) {
                best = Some((dist, &sym.name));
            }
        }
        best.map(|(_, n)| n.to_string())
    }

    pub(crate) fn mark_usage(&mut self, id: SymbolId, usage: u16) {
        self.arena[id].usage |= usage;
    }

    //--------------------------------------------------------------------------
    // Registration
    //--------------------------------------------------------------------------

    fn alloc(&mut self, f: impl FnOnce(SymbolId) -> Symbol) -> Result<SymbolId, CompileError> {
        self.arena.try_alloc(f).ok_or_else(|| CompileError::new("symbol table exhausted"))
    }

    pub(crate) fn add_constant(&mut self, name: &str, value: Cell, tag: Tag) -> SymbolId {
        let id = self
            .alloc(|id| Symbol {
                id,
                name: name.to_string(),
                ident: Ident::Constant,
                tag,
                addr: value,
                usage: USAGE_DEFINED,
                array: None,
                args: None,
                child: None,
                parent: None,
                stacksize: 0,
                deprecation: None,
            })
            .expect("constant registration precedes expression parsing");
        self.constants.insert(name.to_string(), id);
        id
    }

    pub(crate) fn add_variable(&mut self, name: &str, local: bool, tag: Tag, addr: Cell, usage: u16) -> SymbolId {
        let id = self
            .alloc(|id| Symbol {
                id,
                name: name.to_string(),
                ident: Ident::Variable,
                tag,
                addr,
                usage: usage | USAGE_DEFINED,
                array: None,
                args: None,
                child: None,
                parent: None,
                stacksize: 0,
                deprecation: None,
            })
            .expect("variable registration precedes expression parsing");
        if local {
            self.locals.push(id);
        } else {
            self.globals.insert(name.to_string(), id);
        }
        id
    }

    pub(crate) fn add_reference(&mut self, name: &str, tag: Tag, addr: Cell) -> SymbolId {
        let id = self
            .alloc(|id| Symbol {
                id,
                name: name.to_string(),
                ident: Ident::Reference,
                tag,
                addr,
                usage: USAGE_DEFINED,
                array: None,
                args: None,
                child: None,
                parent: None,
                stacksize: 0,
                deprecation: None,
            })
            .expect("variable registration precedes expression parsing");
        self.locals.push(id);
        id
    }

    /// Registers an array with the given per-dimension lengths and optional
    /// per-dimension named-index tables; dimensions below the major one
    /// become chained child symbols. Array parameters are addressed through
    /// a reference (`by_ref`), declared arrays directly.
    pub(crate) fn add_array(
        &mut self, name: &str, local: bool, by_ref: bool, tag: Tag, addr: Cell, usage: u16,
        dims: &[Cell], names: &[Option<Vec<FieldEntry>>],
    ) -> SymbolId {
        debug_assert!(!dims.is_empty() && dims.len() <= DIMEN_MAX);
        let ident = if by_ref { Ident::RefArray } else { Ident::Array };
        let mut ids = Vec::with_capacity(dims.len());
        for (level, length) in dims.iter().enumerate() {
            let dim_names = names.get(level).cloned().unwrap_or(None);
            let sub_levels = (dims.len() - level - 1) as u16;
            let id = self
                .alloc(|id| Symbol {
                    id,
                    name: name.to_string(),
                    ident,
                    tag,
                    addr,
                    usage: usage | USAGE_DEFINED,
                    array: Some(ArrayInfo { length: *length, level: sub_levels, names: dim_names }),
                    args: None,
                    child: None,
                    parent: None,
                    stacksize: 0,
                    deprecation: None,
                })
                .expect("array registration precedes expression parsing");
            if let Some(prev) = ids.last() {
                self.arena[*prev].child = Some(id);
                self.arena[id].parent = Some(*prev);
            }
            ids.push(id);
        }

        let root = ids[0];
        if local {
            self.locals.push(root);
        } else {
            self.globals.insert(name.to_string(), root);
        }
        root
    }

    /// Registers a declared (prototyped) function. When `ret_dims` is
    /// non-empty the function returns an array and gets a hidden
    /// array-return sub-symbol.
    pub(crate) fn add_function(
        &mut self, name: &str, tag: Tag, args: Vec<ArgInfo>, usage: u16, ret_dims: &[Cell],
    ) -> SymbolId {
        let id = self
            .alloc(|id| Symbol {
                id,
                name: name.to_string(),
                ident: Ident::Function,
                tag,
                addr: 0,
                usage: usage | USAGE_DEFINED | USAGE_PROTOTYPED,
                array: None,
                args: Some(args),
                child: None,
                parent: None,
                stacksize: 0,
                deprecation: None,
            })
            .expect("function registration precedes expression parsing");
        if !ret_dims.is_empty() {
            let empty_names = vec![None; ret_dims.len()];
            let ret = self.add_array(
                &format!("{}:ret", name), true, true, tag, 0, 0, ret_dims, &empty_names,
            );
            // the return symbol is reachable only through the function
            self.locals.pop();
            self.arena[id].child = Some(ret);
            self.arena[ret].parent = Some(id);
        }
        self.globals.insert(name.to_string(), id);
        id
    }

    /// Synthesizes a stub for a function that is referenced before any
    /// declaration has been seen (first pass only). The stub is marked
    /// missing and un-prototyped; a later declaration upgrades it.
    pub(crate) fn fetch_func(&mut self, name: &str) -> Result<SymbolId, CompileError> {
        if let Some(id) = self.globals.get(name) {
            return Ok(*id);
        }
        let id = self.alloc(|id| Symbol {
            id,
            name: name.to_string(),
            ident: Ident::Function,
            tag: 0,
            addr: 0,
            usage: USAGE_MISSING,
            array: None,
            args: Some(Vec::new()),
            child: None,
            parent: None,
            stacksize: 0,
            deprecation: None,
        })?;
        self.globals.insert(name.to_string(), id);
        Ok(id)
    }

    //--------------------------------------------------------------------------
    // Automatons
    //--------------------------------------------------------------------------

    pub(crate) fn add_automaton(&mut self, name: &str) -> usize {
        let index = self.automatons.len();
        self.automatons.push(Automaton { name: name.to_string(), index });
        index
    }

    pub(crate) fn add_state(&mut self, name: &str, automaton: usize, value: Cell) {
        debug_assert!(automaton < self.automatons.len());
        self.states.push(AutomatonState { name: name.to_string(), automaton, value });
    }

    pub(crate) fn automaton_find(&self, name: &str) -> Option<&Automaton> {
        self.automatons.iter().find(|a| a.name == name)
    }

    pub(crate) fn automaton_closest(&self, name: &str) -> Option<String> {
        self.automatons
            .iter()
            .map(|a| (levenshtein(&a.name, name), &a.name))
            .filter(|(d, _)| *d <= MAX_EDIT_DIST)
            .min_by_key(|(d, _)| *d)
            .map(|(_, n)| n.to_string())
    }

    pub(crate) fn state_find(&self, name: &str, automaton: usize) -> Option<&AutomatonState> {
        self.states.iter().find(|s| s.automaton == automaton && s.name == name)
    }
}

/// Finds a named-index field; tables are small, linear scan suffices.
pub(crate) fn find_field<'a>(names: &'a [FieldEntry], name: &str) -> Option<(usize, &'a FieldEntry)> {
    names.iter().enumerate().find(|(_, entry)| entry.name == name)
}

/// Compares two named-index tables for layout equality: same fields, same
/// offsets, same packedness. `None` tables only match `None`.
pub(crate) fn compare_field_tables(a: &Option<Vec<FieldEntry>>, b: &Option<Vec<FieldEntry>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
