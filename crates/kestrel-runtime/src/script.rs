//! Compiled scripts and functions.
//!
//! A [`Script`] owns its source text and line table. Every function literal
//! in a script becomes a [`SharedFunction`] carrying an immutable table of
//! break locations computed when the script is compiled. Closures created at
//! runtime share their function's code and locations.

use crate::ast::{Expr, ForInit, FunctionLiteral, Name, Program, Stmt};
use crate::heap::{Code, Heap, Tier};
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Stable script identity; never reused within an isolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub u32);

/// Stable function identity; survives code replacement and relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a script came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOrigin {
    pub name: Option<String>,
    /// Line number of the script's first line in the enclosing document.
    pub line_offset: u32,
}

impl ScriptOrigin {
    /// Origin with a name and no line offset.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            line_offset: 0,
        }
    }

    /// Set the line offset.
    pub fn with_line_offset(mut self, line_offset: u32) -> Self {
        self.line_offset = line_offset;
        self
    }
}

// ── Script ───────────────────────────────────────────────────────────────────

/// Source text plus line table.
#[derive(Debug)]
pub struct Script {
    id: ScriptId,
    name: Option<Rc<str>>,
    source: Rc<str>,
    line_offset: u32,
    /// Character offset of every line terminator, plus the source length
    /// when the last line is unterminated.
    line_ends: Vec<u32>,
    length: u32,
}

impl Script {
    pub(crate) fn new(id: ScriptId, source: &str, origin: &ScriptOrigin) -> Self {
        let mut line_ends = Vec::new();
        let mut length = 0u32;
        for (index, ch) in source.chars().enumerate() {
            if ch == '\n' {
                line_ends.push(index as u32);
            }
            length = index as u32 + 1;
        }
        if line_ends.last().map_or(true, |&end| end + 1 < length) {
            line_ends.push(length);
        }

        Self {
            id,
            name: origin.name.as_deref().map(Rc::from),
            source: Rc::from(source),
            line_offset: origin.line_offset,
            line_ends,
            length,
        }
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_offset(&self) -> u32 {
        self.line_offset
    }

    /// Number of lines in the source.
    pub fn line_count(&self) -> u32 {
        self.line_ends.len() as u32
    }

    /// Length of the source in characters.
    pub fn len(&self) -> u32 {
        self.length
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Script-relative 0-based line and column of a character offset.
    pub fn position_to_line_column(&self, position: u32) -> (u32, u32) {
        let line = self.line_ends.partition_point(|&end| end < position);
        let line = line.min(self.line_ends.len().saturating_sub(1));
        let start = self.line_start(line as u32).unwrap_or(0);
        (line as u32, position.saturating_sub(start))
    }

    /// Character offset of a script-relative line and column.
    pub fn line_column_to_position(&self, line: u32, column: u32) -> Option<u32> {
        let start = self.line_start(line)?;
        let end = self.line_ends[line as usize];
        let position = start.checked_add(column)?;
        (position <= end).then_some(position)
    }

    /// Offset of the first character of a script-relative line.
    pub fn line_start(&self, line: u32) -> Option<u32> {
        if line >= self.line_count() {
            return None;
        }
        match line {
            0 => Some(0),
            n => self.line_ends.get(n as usize - 1).map(|&prev| prev + 1),
        }
    }

    /// Text of a script-relative line without its terminator.
    pub fn line_text(&self, line: u32) -> Option<String> {
        let start = self.line_start(line)? as usize;
        let end = self.line_ends[line as usize] as usize;
        Some(
            self.source
                .chars()
                .skip(start)
                .take(end.saturating_sub(start))
                .filter(|&ch| ch != '\r')
                .collect(),
        )
    }

    /// Offset of the first character on a line that is neither whitespace
    /// nor part of a block comment. Stops at the line terminator.
    pub fn first_code_position(&self, line: u32) -> Option<u32> {
        let start = self.line_start(line)?;
        let chars: Vec<char> = self.source.chars().skip(start as usize).collect();
        let mut index = 0;
        while index < chars.len() {
            match chars[index] {
                ' ' | '\t' | '\r' => index += 1,
                '/' if chars.get(index + 1) == Some(&'*') => {
                    index += 2;
                    while index < chars.len()
                        && !(chars[index] == '*' && chars.get(index + 1) == Some(&'/'))
                    {
                        index += 1;
                    }
                    index += 2;
                }
                _ => break,
            }
        }
        Some(start + index.min(chars.len()) as u32)
    }
}

// ── Break locations ──────────────────────────────────────────────────────────

/// What kind of code a break location marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakLocationKind {
    /// Start of an executable statement or loop clause.
    Statement,
    /// A call site, after the arguments are evaluated.
    Call,
    /// A `return` statement or a function's implicit return.
    Return,
    /// A `debugger` statement.
    DebuggerStatement,
}

/// A position inside a function at which execution can pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakLocation {
    pub position: u32,
    pub kind: BreakLocationKind,
    /// Position of the enclosing statement's location.
    pub statement: u32,
}

impl BreakLocation {
    fn new(position: u32, kind: BreakLocationKind, statement: u32) -> Self {
        Self {
            position,
            kind,
            statement,
        }
    }
}

// ── SharedFunction ───────────────────────────────────────────────────────────

/// Compiled function shared by all closures created from one literal.
pub struct SharedFunction {
    id: FunctionId,
    name: Name,
    literal: Rc<FunctionLiteral>,
    script: Rc<Script>,
    is_toplevel: bool,
    inner: Vec<Rc<SharedFunction>>,
    locations: Vec<BreakLocation>,
    var_names: Vec<Name>,
    declarations: Vec<(Name, usize)>,
    call_count: Cell<u32>,
    code: RefCell<Rc<Code>>,
}

impl fmt::Debug for SharedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFunction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("script", &self.script.id)
            .field("locations", &self.locations.len())
            .finish()
    }
}

impl SharedFunction {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Declared name, empty for anonymous functions and top-level code.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &Rc<Script> {
        &self.script
    }

    pub fn is_toplevel(&self) -> bool {
        self.is_toplevel
    }

    pub fn params(&self) -> &[Name] {
        &self.literal.params
    }

    pub fn body(&self) -> &[Stmt] {
        &self.literal.body
    }

    /// Position of the `function` keyword; 0 for top-level code.
    pub fn start_position(&self) -> u32 {
        self.literal.span.start
    }

    /// Position just past the function's closing brace.
    pub fn end_position(&self) -> u32 {
        self.literal.span.end
    }

    /// Position of the implicit return.
    pub fn body_end(&self) -> u32 {
        self.literal.body_end
    }

    /// Whether `position` lies within this function's source range.
    pub fn contains(&self, position: u32) -> bool {
        self.is_toplevel
            || (self.literal.span.start <= position && position < self.literal.span.end)
    }

    /// Break locations in position order.
    pub fn locations(&self) -> &[BreakLocation] {
        &self.locations
    }

    /// The location exactly at `position`.
    pub fn location_at(&self, position: u32) -> Option<&BreakLocation> {
        self.locations
            .binary_search_by_key(&position, |location| location.position)
            .ok()
            .map(|index| &self.locations[index])
    }

    /// The first location at or after `position`.
    pub fn location_at_or_after(&self, position: u32) -> Option<&BreakLocation> {
        let index = self
            .locations
            .partition_point(|location| location.position < position);
        self.locations.get(index)
    }

    /// The compiled function for the literal at `index` in this function.
    pub fn inner(&self, index: usize) -> Option<&Rc<SharedFunction>> {
        self.inner.get(index)
    }

    /// Directly nested functions.
    pub fn inner_functions(&self) -> &[Rc<SharedFunction>] {
        &self.inner
    }

    /// Names declared with `var` anywhere in the body.
    pub fn var_names(&self) -> &[Name] {
        &self.var_names
    }

    /// Function declarations hoisted to the top of the body.
    pub fn declarations(&self) -> &[(Name, usize)] {
        &self.declarations
    }

    /// Current code object.
    pub fn code(&self) -> Rc<Code> {
        Rc::clone(&self.code.borrow())
    }

    pub(crate) fn replace_code(&self, code: Rc<Code>) {
        *self.code.borrow_mut() = code;
    }

    /// Count an invocation, returning the new total.
    pub(crate) fn record_call(&self) -> u32 {
        let count = self.call_count.get().saturating_add(1);
        self.call_count.set(count);
        count
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.get()
    }
}

/// The innermost function containing `position`.
pub fn innermost_function(
    candidates: &[Rc<SharedFunction>],
    position: u32,
) -> Option<Rc<SharedFunction>> {
    candidates
        .iter()
        .filter(|function| function.contains(position))
        .max_by_key(|function| (!function.is_toplevel, function.start_position()))
        .cloned()
}

// ── Compilation ──────────────────────────────────────────────────────────────

/// Build the function tree for a parsed script and register it with the heap.
pub(crate) fn compile_script(
    program: Program,
    script: &Rc<Script>,
    heap: &mut Heap,
) -> Rc<SharedFunction> {
    let literal = Rc::new(FunctionLiteral {
        name: None,
        params: Vec::new(),
        body: program.body,
        span: Span::new(0, program.end),
        body_end: program.end,
        is_expression: false,
    });
    compile_function(literal, script, true, heap)
}

fn compile_function(
    literal: Rc<FunctionLiteral>,
    script: &Rc<Script>,
    is_toplevel: bool,
    heap: &mut Heap,
) -> Rc<SharedFunction> {
    let id = heap.next_function_id();

    let mut analysis = FunctionAnalysis::default();
    for stmt in &literal.body {
        analysis.visit_stmt(stmt);
    }
    analysis.push(literal.body_end, BreakLocationKind::Return, literal.body_end);
    analysis.locations.sort_by_key(|location| location.position);
    analysis.locations.dedup_by_key(|location| location.position);

    let inner = analysis
        .inner
        .into_iter()
        .flatten()
        .map(|nested| compile_function(nested, script, false, heap))
        .collect();

    let function = Rc::new(SharedFunction {
        id,
        name: literal.name.clone().unwrap_or_else(|| Rc::from("")),
        literal,
        script: Rc::clone(script),
        is_toplevel,
        inner,
        locations: analysis.locations,
        var_names: analysis.var_names,
        declarations: analysis.declarations,
        call_count: Cell::new(0),
        code: RefCell::new(heap.new_code(Tier::Baseline)),
    });
    heap.register_function(&function);
    function
}

/// Collects locations, hoisted names and nested literals of one function body.
#[derive(Default)]
struct FunctionAnalysis {
    locations: Vec<BreakLocation>,
    inner: Vec<Option<Rc<FunctionLiteral>>>,
    var_names: Vec<Name>,
    declarations: Vec<(Name, usize)>,
}

impl FunctionAnalysis {
    fn push(&mut self, position: u32, kind: BreakLocationKind, statement: u32) {
        self.locations
            .push(BreakLocation::new(position, kind, statement));
    }

    fn statement(&mut self, position: u32) {
        self.push(position, BreakLocationKind::Statement, position);
    }

    fn add_inner(&mut self, index: usize, literal: &Rc<FunctionLiteral>) {
        if self.inner.len() <= index {
            self.inner.resize(index + 1, None);
        }
        self.inner[index] = Some(Rc::clone(literal));
    }

    fn add_var(&mut self, name: &Name) {
        if !self.var_names.contains(name) {
            self.var_names.push(Rc::clone(name));
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr, span) => {
                self.statement(span.start);
                self.visit_expr(expr, span.start);
            }
            Stmt::Var(decls, span) => {
                if decls.iter().any(|decl| decl.init.is_some()) {
                    self.statement(span.start);
                }
                for decl in decls {
                    self.add_var(&decl.name);
                    if let Some(init) = &decl.init {
                        self.visit_expr(init, span.start);
                    }
                }
            }
            Stmt::FunctionDecl { literal, index } => {
                self.add_inner(*index, literal);
                if let Some(name) = &literal.name {
                    self.declarations.push((Rc::clone(name), *index));
                }
            }
            Stmt::Return(value, span) => {
                self.push(span.start, BreakLocationKind::Return, span.start);
                if let Some(value) = value {
                    self.visit_expr(value, span.start);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                self.statement(span.start);
                self.visit_expr(cond, span.start);
                self.visit_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(else_branch);
                }
            }
            Stmt::While { cond, body, span } => {
                self.statement(span.start);
                self.visit_expr(cond, span.start);
                self.visit_stmt(body);
            }
            Stmt::DoWhile { body, cond, .. } => {
                self.visit_stmt(body);
                let position = cond.span().start;
                self.statement(position);
                self.visit_expr(cond, position);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                if let Some(init) = init {
                    let position = init.start();
                    match init {
                        ForInit::Var(decls, _) => {
                            if decls.iter().any(|decl| decl.init.is_some()) {
                                self.statement(position);
                            }
                            for decl in decls {
                                self.add_var(&decl.name);
                                if let Some(value) = &decl.init {
                                    self.visit_expr(value, position);
                                }
                            }
                        }
                        ForInit::Expr(expr) => {
                            self.statement(position);
                            self.visit_expr(expr, position);
                        }
                    }
                }
                if let Some(cond) = cond {
                    let position = cond.span().start;
                    self.statement(position);
                    self.visit_expr(cond, position);
                }
                if let Some(update) = update {
                    let position = update.span().start;
                    self.statement(position);
                    self.visit_expr(update, position);
                }
                self.visit_stmt(body);
            }
            Stmt::Block(stmts, _) => {
                for stmt in stmts {
                    self.visit_stmt(stmt);
                }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                for stmt in block {
                    self.visit_stmt(stmt);
                }
                if let Some(handler) = handler {
                    for stmt in &handler.body {
                        self.visit_stmt(stmt);
                    }
                }
                if let Some(finalizer) = finalizer {
                    for stmt in finalizer {
                        self.visit_stmt(stmt);
                    }
                }
            }
            Stmt::Throw(value, span) => {
                self.statement(span.start);
                self.visit_expr(value, span.start);
            }
            Stmt::Break(_, span) | Stmt::Continue(_, span) => self.statement(span.start),
            Stmt::Labeled { body, .. } => self.visit_stmt(body),
            Stmt::Debugger(span) => {
                self.push(span.start, BreakLocationKind::DebuggerStatement, span.start)
            }
            Stmt::Empty(_) => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr, statement: u32) {
        match expr {
            Expr::Number(..)
            | Expr::String(..)
            | Expr::Bool(..)
            | Expr::Null(_)
            | Expr::Undefined(_)
            | Expr::Identifier(..) => {}
            Expr::Unary { operand, .. } => self.visit_expr(operand, statement),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.visit_expr(left, statement);
                self.visit_expr(right, statement);
            }
            Expr::Assign { target, value, .. } => {
                if let crate::ast::AssignTarget::Member { object, .. } = target {
                    self.visit_expr(object, statement);
                }
                self.visit_expr(value, statement);
            }
            Expr::Update { target, .. } => {
                if let crate::ast::AssignTarget::Member { object, .. } = target {
                    self.visit_expr(object, statement);
                }
            }
            Expr::Call {
                callee,
                args,
                paren,
                ..
            } => {
                self.visit_expr(callee, statement);
                for arg in args {
                    self.visit_expr(arg, statement);
                }
                self.push(*paren, BreakLocationKind::Call, statement);
            }
            Expr::Member { object, .. } => self.visit_expr(object, statement),
            Expr::Object(properties, _) => {
                for (_, value) in properties {
                    self.visit_expr(value, statement);
                }
            }
            Expr::Function { literal, index } => self.add_inner(*index, literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use pretty_assertions::assert_eq;
    use BreakLocationKind::*;

    fn compile(source: &str) -> (Rc<SharedFunction>, Heap) {
        let mut heap = Heap::new();
        let script = Rc::new(Script::new(
            heap.next_script_id(),
            source,
            &ScriptOrigin::named("test"),
        ));
        let program = parse_program(source).unwrap();
        (compile_script(program, &script, &mut heap), heap)
    }

    fn kinds(function: &SharedFunction) -> Vec<(u32, BreakLocationKind)> {
        function
            .locations()
            .iter()
            .map(|location| (location.position, location.kind))
            .collect()
    }

    #[test]
    fn test_line_table() {
        let script = Script::new(ScriptId(1), "a\nbc\n\nd", &ScriptOrigin::default());
        assert_eq!(script.line_count(), 4);
        assert_eq!(script.position_to_line_column(0), (0, 0));
        assert_eq!(script.position_to_line_column(3), (1, 1));
        assert_eq!(script.position_to_line_column(6), (3, 0));
        assert_eq!(script.line_column_to_position(1, 1), Some(3));
        assert_eq!(script.line_column_to_position(1, 5), None);
        assert_eq!(script.line_text(1).as_deref(), Some("bc"));
        assert_eq!(script.line_start(4), None);
    }

    #[test]
    fn test_first_code_position_skips_comments() {
        let script = Script::new(
            ScriptId(1),
            "x = 1\n  /* note */ y = 2\n",
            &ScriptOrigin::default(),
        );
        assert_eq!(script.first_code_position(1), Some(19));
        assert_eq!(script.first_code_position(0), Some(0));
    }

    #[test]
    fn test_call_locations_are_tagged_with_statement() {
        let (top, _heap) = compile("function a() {b(c(d()),d());c(d());d()}");
        let a = top.inner(0).unwrap();
        assert_eq!(a.name(), "a");
        assert_eq!(
            kinds(a),
            vec![
                (14, Statement),
                (15, Call),
                (17, Call),
                (19, Call),
                (24, Call),
                (28, Statement),
                (29, Call),
                (31, Call),
                (35, Statement),
                (36, Call),
                (38, Return),
            ]
        );
        assert!(a.locations()[1..5].iter().all(|location| location.statement == 14));
    }

    #[test]
    fn test_toplevel_implicit_return_at_end_of_source() {
        let (top, _heap) = compile("var x;\nfunction f() {}\ndebugger;");
        assert_eq!(kinds(&top), vec![(23, DebuggerStatement), (32, Return)]);
        assert_eq!(top.var_names().len(), 1);
        assert_eq!(top.declarations().len(), 1);
    }

    #[test]
    fn test_loop_clauses_are_locations() {
        let (top, _heap) = compile("for (var i = 0; i < 3; i++) {}");
        assert_eq!(
            kinds(&top),
            vec![(5, Statement), (16, Statement), (23, Statement), (30, Return)]
        );
    }

    #[test]
    fn test_location_lookup() {
        let (top, _heap) = compile("function foo(){bar=0;}");
        let foo = top.inner(0).unwrap();
        assert_eq!(foo.start_position(), 0);
        assert_eq!(foo.location_at_or_after(0).unwrap().position, 15);
        assert_eq!(foo.location_at(21).unwrap().kind, Return);
        assert!(foo.location_at(16).is_none());
    }

    #[test]
    fn test_innermost_function() {
        let (top, heap) = compile("function f() {\n  function g() { x = 1; }\n}\ny = 2;");
        let live = heap.live_functions();
        let g = innermost_function(&live, 31).unwrap();
        assert_eq!(g.name(), "g");
        let outer = innermost_function(&live, 44).unwrap();
        assert!(outer.is_toplevel());
        assert_eq!(outer.id(), top.id());
    }
}
