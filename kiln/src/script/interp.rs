//! Tree-walking interpreter for the script subset.
//!
//! Bare names resolve through the lexical scopes first, then the keys of the
//! render data, then `locals` (the data object itself), then the built-in
//! globals. Assigning to a name nothing declares writes the data key if one
//! exists and otherwise creates a global.
//!
//! Values are reference counted, so the interpreter remembers every scope a
//! closure captured and every container that had another container stored
//! into it. Dropping the interpreter empties those, which is enough to break
//! any cycle a script can build.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::Limits;
use super::ast::*;
use super::builtins;
use super::lexer::Loc;
use super::value::{Function, Props, Value, array_index, to_int32, to_uint32};
use crate::compiler::CompiledProgram;
use crate::context::RenderContext;
use crate::executor::{EvalError, OutputBuffer};

/// A lexical environment.
pub struct Scope {
    vars: RefCell<HashMap<Rc<str>, Binding>>,
    parent: Option<Rc<Scope>>,
    /// `var` declarations land in the nearest function scope
    function: bool,
    cleared: Cell<bool>,
}

struct Binding {
    value: Value,
    mutable: bool,
}

enum Assigned {
    Done,
    Constant,
    Missing(Value),
}

impl Scope {
    fn new(parent: Option<Rc<Scope>>, function: bool) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent,
            function,
            cleared: Cell::new(false),
        })
    }

    fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.vars.borrow().get(name) {
                return Some(binding.value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    fn get_own(&self, name: &str) -> Option<(Value, bool)> {
        self.vars
            .borrow()
            .get(name)
            .map(|binding| (binding.value.clone(), binding.mutable))
    }

    fn declare(&self, name: Rc<str>, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name, Binding { value, mutable });
    }

    fn assign(&self, name: &str, value: Value) -> Assigned {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.vars.borrow_mut().get_mut(name) {
                if !binding.mutable {
                    return Assigned::Constant;
                }
                binding.value = value;
                return Assigned::Done;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => return Assigned::Missing(value),
            }
        }
    }

    fn function_scope(self: &Rc<Self>) -> Rc<Scope> {
        let mut scope = self;
        while !scope.function {
            match &scope.parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope.clone()
    }

    /// Empty this scope and its ancestors.
    fn clear_chain(&self) {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.cleared.replace(true) {
                break;
            }
            if let Ok(mut vars) = current.vars.try_borrow_mut() {
                let taken = std::mem::take(&mut *vars);
                drop(vars);
                drop(taken);
            }
            scope = current.parent.as_deref();
        }
    }
}

/// How a statement finished.
pub(crate) enum Completion {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Why evaluation stopped early.
pub(crate) enum Abrupt {
    /// A script exception; `try` can catch it
    Throw { value: Value, loc: Loc, stack: String },
    /// A resource limit was hit; nothing catches it
    Fatal(Box<EvalError>),
}

pub(crate) type Flow<T> = Result<T, Abrupt>;

struct Frame {
    name: Rc<str>,
    call: Loc,
}

pub(crate) struct Interp<'a> {
    context: &'a RenderContext,
    limits: &'a Limits,
    program: Option<&'a CompiledProgram>,
    out: Option<&'a mut OutputBuffer>,
    root: Rc<Scope>,
    locals: Option<Value>,
    globals: HashMap<Rc<str>, Value>,
    steps: u64,
    frames: Vec<Frame>,
    captured: Vec<Rc<Scope>>,
    captured_ids: HashSet<*const Scope>,
    mutated: Vec<Value>,
    mutated_ids: HashSet<*const ()>,
}

impl<'a> Interp<'a> {
    pub fn new(context: &'a RenderContext, limits: &'a Limits) -> Self {
        Self {
            context,
            limits,
            program: None,
            out: None,
            root: Scope::new(None, true),
            locals: None,
            globals: HashMap::new(),
            steps: 0,
            frames: Vec::new(),
            captured: Vec::new(),
            captured_ids: HashSet::new(),
            mutated: Vec::new(),
            mutated_ids: HashSet::new(),
        }
    }

    /// Attach the program whose literals `EmitLiteral` refers to, and the
    /// buffer output statements write into.
    pub fn with_output(mut self, program: &'a CompiledProgram, out: &'a mut OutputBuffer) -> Self {
        self.program = Some(program);
        self.out = Some(out);
        self
    }

    pub fn run_program(&mut self, body: &[Stmt]) -> Result<(), EvalError> {
        let root = self.root.clone();
        self.hoist(body, &root);
        match self.exec_list(body, &root) {
            // a top-level `return` ends the render early
            Ok(_) => Ok(()),
            Err(abrupt) => Err(into_eval_error(abrupt)),
        }
    }

    pub fn eval_expression(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        let root = self.root.clone();
        self.eval(expr, &root).map_err(into_eval_error)
    }

    // --- bookkeeping ---

    fn new_scope(&self, parent: &Rc<Scope>) -> Rc<Scope> {
        Scope::new(Some(parent.clone()), false)
    }

    fn closure(&mut self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> Value {
        if self.captured_ids.insert(Rc::as_ptr(scope)) {
            self.captured.push(scope.clone());
        }
        Value::Function(Rc::new(Function::Closure {
            def: def.clone(),
            scope: scope.clone(),
        }))
    }

    /// Remember `target` when `stored` could close a reference cycle through it.
    pub(crate) fn note_store(&mut self, target: &Value, stored: &Value) {
        if !stored.is_container() {
            return;
        }
        let id = match target {
            Value::Array(items) => Rc::as_ptr(items) as *const (),
            Value::Object(object) => Rc::as_ptr(object) as *const (),
            _ => return,
        };
        if self.mutated_ids.insert(id) {
            self.mutated.push(target.clone());
        }
    }

    fn tick(&mut self, loc: Loc) -> Flow<()> {
        self.charge(1, loc)
    }

    fn charge(&mut self, cost: u64, loc: Loc) -> Flow<()> {
        self.steps = self.steps.saturating_add(cost);
        if self.steps > self.limits.max_steps {
            return Err(self.fatal("Script exceeded its step budget", loc));
        }
        Ok(())
    }

    /// Fail when a string of `len` bytes would be too long. Building long
    /// strings also costs steps.
    pub(crate) fn check_length(&mut self, len: usize, loc: Loc) -> Flow<()> {
        if len > self.limits.max_length {
            return Err(self.fatal("Invalid string length", loc));
        }
        self.charge(len as u64 / 1024, loc)
    }

    pub(crate) fn check_items(&mut self, len: usize, loc: Loc) -> Flow<()> {
        if len > self.limits.max_length {
            return Err(self.fatal("Invalid array length", loc));
        }
        self.charge(len as u64 / 1024, loc)
    }

    // --- errors ---

    pub(crate) fn throw_error(&self, name: &str, message: &str, loc: Loc) -> Abrupt {
        self.throw_value(Value::new_error(name, message), loc)
    }

    pub(crate) fn type_error(&self, message: &str, loc: Loc) -> Abrupt {
        self.throw_error("TypeError", message, loc)
    }

    pub(crate) fn range_error(&self, message: &str, loc: Loc) -> Abrupt {
        self.throw_error("RangeError", message, loc)
    }

    pub(crate) fn throw_value(&self, value: Value, loc: Loc) -> Abrupt {
        let stack = self.stack_trace(&thrown_message(&value), loc);
        Abrupt::Throw { value, loc, stack }
    }

    fn fatal(&self, message: &str, loc: Loc) -> Abrupt {
        let message = format!("RangeError: {message}");
        let stack = self.stack_trace(&message, loc);
        Abrupt::Fatal(Box::new(
            EvalError::runtime(message)
                .at(loc.line, loc.column)
                .with_stack(stack),
        ))
    }

    fn stack_trace(&self, message: &str, loc: Loc) -> String {
        let mut out = message.to_string();
        let mut at = loc;
        for frame in self.frames.iter().rev() {
            out.push_str(&format!(
                "\n    at {} (template:{}:{})",
                frame.name, at.line, at.column
            ));
            at = frame.call;
        }
        out.push_str(&format!(
            "\n    at template (template:{}:{})",
            at.line, at.column
        ));
        out
    }

    // --- names ---

    fn locals(&mut self) -> Value {
        self.locals
            .get_or_insert_with(|| Value::from_json(self.context.data()))
            .clone()
    }

    fn data_binding(&mut self, name: &str) -> Option<Value> {
        let locals = self.locals();
        if let Value::Object(object) = &locals {
            if let Some(value) = object.borrow().props.get(name) {
                return Some(value.clone());
            }
        }
        (name == "locals").then_some(locals)
    }

    fn global(&mut self, name: &str) -> Option<Value> {
        if let Some(value) = self.globals.get(name) {
            return Some(value.clone());
        }
        let value = builtins::global(name)?;
        self.globals.insert(name.into(), value.clone());
        Some(value)
    }

    fn resolve(&mut self, name: &str, scope: &Rc<Scope>) -> Option<Value> {
        if let Some(value) = scope.get(name) {
            return Some(value);
        }
        if let Some(value) = self.data_binding(name) {
            return Some(value);
        }
        self.global(name)
    }

    fn lookup(&mut self, name: &str, scope: &Rc<Scope>, loc: Loc) -> Flow<Value> {
        match self.resolve(name, scope) {
            Some(value) => Ok(value),
            None => Err(self.throw_error("ReferenceError", &format!("{name} is not defined"), loc)),
        }
    }

    fn set_name(&mut self, name: &Rc<str>, value: Value, scope: &Rc<Scope>, loc: Loc) -> Flow<()> {
        let value = match scope.assign(name, value) {
            Assigned::Done => return Ok(()),
            Assigned::Constant => {
                return Err(self.type_error("Assignment to constant variable.", loc));
            }
            Assigned::Missing(value) => value,
        };
        let locals = self.locals();
        let is_data_key = match &locals {
            Value::Object(object) => object.borrow().props.contains_key(&**name),
            _ => false,
        };
        if is_data_key {
            self.set_member(&locals, name, value, loc)
        } else {
            self.root.declare(name.clone(), value, true);
            Ok(())
        }
    }

    // --- statements ---

    fn hoist(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for name in names {
            if scope.get_own(&name).is_none() {
                scope.declare(name, Value::Undefined, true);
            }
        }
        self.hoist_functions(body, scope);
    }

    fn hoist_functions(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        for stmt in body {
            if let StmtKind::FunctionDecl(def) = &stmt.kind {
                let function = self.closure(def, scope);
                if let Some(name) = &def.name {
                    scope.declare(name.clone(), function, true);
                }
            }
        }
    }

    fn exec_list(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Flow<Completion> {
        self.hoist_functions(body, scope);
        for stmt in body {
            match self.exec(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Flow<Completion> {
        if declares_lexically(body) {
            let inner = self.new_scope(scope);
            self.exec_list(body, &inner)
        } else {
            self.exec_list(body, scope)
        }
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Flow<Completion> {
        self.tick(stmt.loc)?;
        match &stmt.kind {
            StmtKind::VarDecl(kind, decls) => {
                self.exec_declaration(*kind, decls, scope, stmt.loc)?;
            }
            StmtKind::FunctionDecl(_) | StmtKind::Empty => {}
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    return self.exec(then, scope);
                }
                if let Some(otherwise) = otherwise {
                    return self.exec(otherwise, scope);
                }
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => return self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope),
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                let source = self.eval(iterable, scope)?;
                let items = match self.iterate(&source, iterable.loc) {
                    Ok(items) => items,
                    Err(_) => {
                        let message = format!("{} is not iterable", describe(iterable));
                        return Err(self.type_error(&message, iterable.loc));
                    }
                };
                return self.exec_for_each(binding, items, body, scope, stmt.loc);
            }
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                let source = self.eval(object, scope)?;
                let keys = enumerable_keys(&source);
                return self.exec_for_each(binding, keys, body, scope, stmt.loc);
            }
            StmtKind::While { test, body } => {
                while self.eval(test, scope)?.truthy() {
                    let completion = self.exec(body, scope)?;
                    if let Some(done) = loop_exit(completion) {
                        return Ok(done);
                    }
                }
            }
            StmtKind::DoWhile { body, test } => loop {
                let completion = self.exec(body, scope)?;
                if let Some(done) = loop_exit(completion) {
                    return Ok(done);
                }
                if !self.eval(test, scope)?.truthy() {
                    break;
                }
            },
            StmtKind::Switch {
                discriminant,
                cases,
            } => return self.exec_switch(discriminant, cases, scope),
            StmtKind::Break => return Ok(Completion::Break),
            StmtKind::Continue => return Ok(Completion::Continue),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                return Ok(Completion::Return(value));
            }
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                return Err(self.throw_value(value, stmt.loc));
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                return self.exec_try(
                    block,
                    param.as_ref(),
                    handler.as_deref(),
                    finalizer.as_deref(),
                    scope,
                    stmt.loc,
                );
            }
            StmtKind::Block(body) => return self.exec_block(body, scope),
            StmtKind::EmitLiteral(index) => {
                let text = self
                    .program
                    .and_then(|program| program.literal(*index))
                    .unwrap_or_default();
                self.emit(text, None, stmt.loc)?;
            }
            StmtKind::EmitValue { value, escape } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                self.emit(&value.to_output_string(), Some(*escape), stmt.loc)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn emit(&mut self, text: &str, escape: Option<bool>, loc: Loc) -> Flow<()> {
        let max = self.limits.max_length;
        let Some(out) = self.out.as_deref_mut() else {
            return Ok(());
        };
        match escape {
            Some(escape) => out.push_value(text, escape),
            None => out.push_literal(text),
        }
        if out.as_str().len() > max {
            return Err(self.fatal("Invalid string length", loc));
        }
        Ok(())
    }

    fn exec_declaration(
        &mut self,
        kind: DeclKind,
        decls: &[Declarator],
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<()> {
        let target = match kind {
            DeclKind::Var => scope.function_scope(),
            DeclKind::Let | DeclKind::Const => scope.clone(),
        };
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval(init, scope)?,
                // hoisted already
                None if kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&decl.pattern, value, &target, kind != DeclKind::Const, loc)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> Flow<Completion> {
        // each iteration gets its own copy of `let` bindings
        let mut names = Vec::new();
        if let Some(Stmt {
            kind: StmtKind::VarDecl(DeclKind::Let | DeclKind::Const, decls),
            ..
        }) = init
        {
            for decl in decls {
                decl.pattern.names(&mut names);
            }
        }
        let mut iteration = if names.is_empty() {
            scope.clone()
        } else {
            self.new_scope(scope)
        };
        if let Some(init) = init {
            self.exec(init, &iteration)?;
        }
        loop {
            if let Some(test) = test {
                if !self.eval(test, &iteration)?.truthy() {
                    break;
                }
            }
            let completion = self.exec(body, &iteration)?;
            if let Some(done) = loop_exit(completion) {
                return Ok(done);
            }
            if !names.is_empty() {
                let next = self.new_scope(scope);
                for name in &names {
                    if let Some((value, mutable)) = iteration.get_own(name) {
                        next.declare(name.clone(), value, mutable);
                    }
                }
                iteration = next;
            }
            if let Some(update) = update {
                self.eval(update, &iteration)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_each(
        &mut self,
        binding: &ForBinding,
        items: Vec<Value>,
        body: &Stmt,
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Completion> {
        for item in items {
            let iteration = match binding {
                ForBinding::Decl(kind, pattern) => {
                    let iteration = self.new_scope(scope);
                    let target = match kind {
                        DeclKind::Var => scope.function_scope(),
                        DeclKind::Let | DeclKind::Const => iteration.clone(),
                    };
                    self.bind_pattern(pattern, item, &target, *kind != DeclKind::Const, loc)?;
                    iteration
                }
                ForBinding::Target(target) => {
                    self.assign_to(target, item, scope)?;
                    scope.clone()
                }
            };
            let completion = self.exec(body, &iteration)?;
            if let Some(done) = loop_exit(completion) {
                return Ok(done);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &Rc<Scope>,
    ) -> Flow<Completion> {
        let value = self.eval(discriminant, scope)?;
        let inner = self.new_scope(scope);
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, &inner)?.strict_equals(&value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|case| case.test.is_none()))
        else {
            return Ok(Completion::Normal);
        };
        for case in &cases[start..] {
            match self.exec_list(&case.body, &inner)? {
                Completion::Normal => {}
                Completion::Break => return Ok(Completion::Normal),
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&Pattern>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Completion> {
        let result = self.exec_block(block, scope);
        let result = match (result, handler) {
            (Err(Abrupt::Throw { value, .. }), Some(handler)) => {
                let inner = self.new_scope(scope);
                match param {
                    Some(param) => self
                        .bind_pattern(param, value, &inner, true, loc)
                        .and_then(|()| self.exec_list(handler, &inner)),
                    None => self.exec_list(handler, &inner),
                }
            }
            (result, _) => result,
        };
        if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    // --- binding ---

    fn bind_item(
        &mut self,
        item: &PatternItem,
        value: Value,
        scope: &Rc<Scope>,
        mutable: bool,
        loc: Loc,
    ) -> Flow<()> {
        let value = match (&item.default, value) {
            (Some(default), Value::Undefined) => self.eval(default, scope)?,
            (_, value) => value,
        };
        self.bind_pattern(&item.pattern, value, scope, mutable, loc)
    }

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &Rc<Scope>,
        mutable: bool,
        loc: Loc,
    ) -> Flow<()> {
        match pattern {
            Pattern::Ident(name) => {
                scope.declare(name.clone(), value, mutable);
                Ok(())
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    let text = value.to_js_string();
                    let message = format!("Cannot destructure '{text}' as it is {text}.");
                    return Err(self.type_error(&message, loc));
                }
                let mut used = Vec::with_capacity(props.len());
                for prop in props {
                    let key = match &prop.key {
                        PropertyKey::Static(key) => key.clone(),
                        PropertyKey::Computed(expr) => self.eval(expr, scope)?.to_property_key(),
                    };
                    let item = self.get_member(&value, &key, loc)?;
                    used.push(key);
                    self.bind_item(&prop.item, item, scope, mutable, loc)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = Props::new();
                    if let Value::Object(object) = &value {
                        for (key, item) in object.borrow().props.iter() {
                            if !used.contains(key) {
                                remaining.insert(key.clone(), item.clone());
                            }
                        }
                    }
                    scope.declare(rest.clone(), Value::new_object(remaining), mutable);
                }
                Ok(())
            }
            Pattern::Array { items, rest } => {
                let values = self.iterate(&value, loc)?;
                for (index, item) in items.iter().enumerate() {
                    if let Some(item) = item {
                        let value = values.get(index).cloned().unwrap_or_default();
                        self.bind_item(item, value, scope, mutable, loc)?;
                    }
                }
                if let Some(rest) = rest {
                    let extra = values.get(items.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::new_array(extra), scope, mutable, loc)?;
                }
                Ok(())
            }
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> Flow<()> {
        match &target.kind {
            ExprKind::Ident(name) => self.set_name(name, value, scope, target.loc),
            ExprKind::Member {
                object, property, ..
            } => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                self.set_member(&object, &key, value, target.loc)
            }
            _ => Err(self.throw_error(
                "SyntaxError",
                "Invalid left-hand side in assignment",
                target.loc,
            )),
        }
    }

    // --- expressions ---

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Flow<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::String(s.clone())),
            ExprKind::Template(pieces) => self.eval_template(pieces, scope, expr.loc),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Ident(name) => self.lookup(name, scope, expr.loc),
            ExprKind::This => Ok(scope.get("this").unwrap_or_default()),
            ExprKind::Array(items) => self.eval_array(items, scope, expr.loc),
            ExprKind::Object(props) => self.eval_object(props, scope, expr.loc),
            ExprKind::Function(def) => Ok(self.closure(def, scope)),
            ExprKind::Member { .. } | ExprKind::Call { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or_default())
            }
            ExprKind::OptionalChain(inner) => {
                Ok(self.eval_chain(inner, scope)?.unwrap_or_default())
            }
            ExprKind::New { callee, args } => self.eval_new(callee, args, scope, expr.loc),
            ExprKind::Unary { op, arg } => self.eval_unary(*op, arg, scope, expr.loc),
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => self.eval_update(*increment, *prefix, target, scope, expr.loc),
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, left, right, expr.loc)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                if continues(*op, &left) {
                    self.eval(right, scope)
                } else {
                    Ok(left)
                }
            }
            ExprKind::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            ExprKind::Assign { op, target, value } => {
                self.eval_assign(*op, target, value, scope, expr.loc)
            }
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Evaluate a member/call chain. `None` means an optional link
    /// short-circuited.
    fn eval_chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Flow<Option<Value>> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                self.get_member(&target, &key, expr.loc).map(Some)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional, scope, expr.loc),
            _ => self.eval(expr, scope).map(Some),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Argument],
        optional: bool,
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Option<Value>> {
        let (this, function) = match &callee.kind {
            ExprKind::Member {
                object,
                property,
                optional: member_optional,
            } => {
                let Some(target) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *member_optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property, scope)?;
                let function = self.get_member(&target, &key, callee.loc)?;
                (target, function)
            }
            _ => match self.eval_chain(callee, scope)? {
                Some(function) => (Value::Undefined, function),
                None => return Ok(None),
            },
        };
        if optional && function.is_nullish() {
            return Ok(None);
        }
        if !matches!(function, Value::Function(_)) {
            let message = format!("{} is not a function", describe(callee));
            return Err(self.type_error(&message, loc));
        }
        let args = self.eval_args(args, scope, loc)?;
        self.call(&function, this, args, loc).map(Some)
    }

    fn eval_args(&mut self, args: &[Argument], scope: &Rc<Scope>, loc: Loc) -> Flow<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Plain(expr) => values.push(self.eval(expr, scope)?),
                Argument::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    values.extend(self.iterate(&source, expr.loc)?);
                    self.check_items(values.len(), loc)?;
                }
            }
        }
        Ok(values)
    }

    /// Call any function value.
    pub(crate) fn call(
        &mut self,
        function: &Value,
        this: Value,
        args: Vec<Value>,
        loc: Loc,
    ) -> Flow<Value> {
        let Value::Function(function) = function else {
            let message = format!("{} is not a function", describe_value(function));
            return Err(self.type_error(&message, loc));
        };
        let function = function.clone();
        match &*function {
            Function::Closure { def, scope } => self.call_closure(def, scope, this, args, loc),
            Function::Native(name) => builtins::call_native(self, name, this, args, loc),
            Function::Method { receiver, name } => {
                builtins::call_method(self, receiver, name, args, loc)
            }
        }
    }

    fn call_closure(
        &mut self,
        def: &Rc<FunctionDef>,
        captured: &Rc<Scope>,
        this: Value,
        args: Vec<Value>,
        loc: Loc,
    ) -> Flow<Value> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(self.fatal("Maximum call stack size exceeded", loc));
        }
        self.tick(loc)?;
        let scope = Scope::new(Some(captured.clone()), true);
        self.frames.push(Frame {
            name: def.name.clone().unwrap_or_else(|| "<anonymous>".into()),
            call: loc,
        });
        let result = self.invoke(def, &scope, this, args);
        self.frames.pop();
        result
    }

    fn invoke(
        &mut self,
        def: &FunctionDef,
        scope: &Rc<Scope>,
        this: Value,
        args: Vec<Value>,
    ) -> Flow<Value> {
        if !def.arrow {
            scope.declare("this".into(), this, true);
            scope.declare("arguments".into(), Value::new_array(args.clone()), true);
        }
        for (index, param) in def.params.iter().enumerate() {
            let arg = args.get(index).cloned().unwrap_or_default();
            self.bind_item(param, arg, scope, true, def.loc)?;
        }
        if let Some(rest) = &def.rest {
            let extra = args.get(def.params.len()..).unwrap_or_default().to_vec();
            self.bind_pattern(rest, Value::new_array(extra), scope, true, def.loc)?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, scope),
            FunctionBody::Block(body) => {
                self.hoist(body, scope);
                match self.exec_list(body, scope)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    fn eval_new(
        &mut self,
        callee: &Expr,
        args: &[Argument],
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Value> {
        let constructor = self.eval(callee, scope)?;
        let args = self.eval_args(args, scope, loc)?;
        if let Value::Function(function) = &constructor {
            match &**function {
                Function::Native(name) => return builtins::construct(self, name, args, loc),
                Function::Closure { def, scope } if !def.arrow => {
                    let instance = Value::new_object(Props::new());
                    let result = self.call_closure(def, scope, instance.clone(), args, loc)?;
                    return Ok(match result {
                        Value::Object(_) | Value::Array(_) => result,
                        _ => instance,
                    });
                }
                _ => {}
            }
        }
        let message = format!("{} is not a constructor", describe(callee));
        Err(self.type_error(&message, loc))
    }

    fn member_key(&mut self, property: &MemberKey, scope: &Rc<Scope>) -> Flow<Rc<str>> {
        match property {
            MemberKey::Static(key) => Ok(key.clone()),
            MemberKey::Computed(expr) => Ok(self.eval(expr, scope)?.to_property_key()),
        }
    }

    /// Property read, including the built-in methods of each value type.
    pub(crate) fn get_member(&mut self, target: &Value, key: &Rc<str>, loc: Loc) -> Flow<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot read properties of {} (reading '{key}')",
                    target.to_js_string()
                );
                Err(self.type_error(&message, loc))
            }
            Value::Object(object) => {
                if let Some(value) = object.borrow().props.get(&**key) {
                    return Ok(value.clone());
                }
                Ok(builtins::method(target, key).unwrap_or_default())
            }
            Value::Array(items) => {
                if let Some(index) = array_index(key) {
                    return Ok(items.borrow().get(index).cloned().unwrap_or_default());
                }
                if &**key == "length" {
                    return Ok(Value::Number(items.borrow().len() as f64));
                }
                Ok(builtins::method(target, key).unwrap_or_default())
            }
            Value::String(s) => {
                if let Some(index) = array_index(key) {
                    return Ok(builtins::char_at(s, index).unwrap_or_default());
                }
                if &**key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                Ok(builtins::method(target, key).unwrap_or_default())
            }
            Value::Function(function) => Ok(builtins::function_member(target, function, key)),
            Value::Bool(_) | Value::Number(_) => {
                Ok(builtins::method(target, key).unwrap_or_default())
            }
        }
    }

    pub(crate) fn set_member(
        &mut self,
        target: &Value,
        key: &Rc<str>,
        value: Value,
        loc: Loc,
    ) -> Flow<()> {
        match target {
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot set properties of {} (setting '{key}')",
                    target.to_js_string()
                );
                Err(self.type_error(&message, loc))
            }
            Value::Object(object) => {
                self.note_store(target, &value);
                object.borrow_mut().props.insert(key.clone(), value);
                Ok(())
            }
            Value::Array(items) => {
                if let Some(index) = array_index(key) {
                    self.check_items(index + 1, loc)?;
                    self.note_store(target, &value);
                    let mut items = items.borrow_mut();
                    if index >= items.len() {
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                } else if &**key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 || len > f64::from(u32::MAX) {
                        return Err(self.range_error("Invalid array length", loc));
                    }
                    self.check_items(len as usize, loc)?;
                    items.borrow_mut().resize(len as usize, Value::Undefined);
                }
                Ok(())
            }
            // primitives and functions silently drop the write
            _ => Ok(()),
        }
    }

    /// The items `for…of`, spread and array destructuring see.
    pub(crate) fn iterate(&mut self, value: &Value, loc: Loc) -> Flow<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().to_vec()),
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            other => {
                let message = format!("{} is not iterable", describe_value(other));
                Err(self.type_error(&message, loc))
            }
        }
    }

    fn eval_template(
        &mut self,
        pieces: &[TemplatePiece],
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Value> {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                TemplatePiece::Text(text) => out.push_str(text),
                TemplatePiece::Expr(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.push_str(&value.to_js_string());
                }
            }
            self.check_length(out.len(), loc)?;
        }
        Ok(Value::from(out))
    }

    fn eval_array(&mut self, items: &[ArrayItem], scope: &Rc<Scope>, loc: Loc) -> Flow<Value> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => values.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    values.extend(self.iterate(&source, expr.loc)?);
                    self.check_items(values.len(), loc)?;
                }
                ArrayItem::Hole => values.push(Value::Undefined),
            }
        }
        Ok(Value::new_array(values))
    }

    fn eval_object(&mut self, props: &[Property], scope: &Rc<Scope>, loc: Loc) -> Flow<Value> {
        let mut out = Props::new();
        for prop in props {
            match prop {
                Property::Entry { key, value } => {
                    let key = match key {
                        PropertyKey::Static(key) => key.clone(),
                        PropertyKey::Computed(expr) => self.eval(expr, scope)?.to_property_key(),
                    };
                    let value = self.eval(value, scope)?;
                    out.insert(key, value);
                }
                Property::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    own_entries(&source, &mut out);
                    self.check_items(out.len(), loc)?;
                }
            }
        }
        Ok(Value::new_object(out))
    }

    fn eval_unary(&mut self, op: UnaryOp, arg: &Expr, scope: &Rc<Scope>, loc: Loc) -> Flow<Value> {
        let value = match op {
            UnaryOp::TypeOf => {
                let value = match &arg.kind {
                    // an undeclared name is "undefined", not an error
                    ExprKind::Ident(name) => self.resolve(name, scope).unwrap_or_default(),
                    _ => self.eval(arg, scope)?,
                };
                Value::from(value.type_of())
            }
            UnaryOp::Delete => return self.eval_delete(arg, scope, loc),
            UnaryOp::Not => Value::Bool(!self.eval(arg, scope)?.truthy()),
            UnaryOp::Minus => Value::Number(-self.eval(arg, scope)?.to_number()),
            UnaryOp::Plus => Value::Number(self.eval(arg, scope)?.to_number()),
            UnaryOp::BitNot => {
                Value::Number(f64::from(!to_int32(self.eval(arg, scope)?.to_number())))
            }
            UnaryOp::Void => {
                self.eval(arg, scope)?;
                Value::Undefined
            }
        };
        Ok(value)
    }

    fn eval_delete(&mut self, arg: &Expr, scope: &Rc<Scope>, loc: Loc) -> Flow<Value> {
        let ExprKind::Member {
            object, property, ..
        } = &arg.kind
        else {
            return Ok(Value::Bool(!matches!(arg.kind, ExprKind::Ident(_))));
        };
        let target = self.eval(object, scope)?;
        let key = self.member_key(property, scope)?;
        match &target {
            Value::Undefined | Value::Null => {
                let message = format!(
                    "Cannot convert undefined or null to object (deleting '{key}')"
                );
                return Err(self.type_error(&message, loc));
            }
            Value::Object(object) => {
                object.borrow_mut().props.shift_remove(&*key);
            }
            Value::Array(items) => {
                if let Some(index) = array_index(&key) {
                    if let Some(slot) = items.borrow_mut().get_mut(index) {
                        *slot = Value::Undefined;
                    }
                }
            }
            _ => {}
        }
        Ok(Value::Bool(true))
    }

    fn eval_update(
        &mut self,
        increment: bool,
        prefix: bool,
        target: &Expr,
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Value> {
        let delta = if increment { 1.0 } else { -1.0 };
        let (old, new) = match &target.kind {
            ExprKind::Ident(name) => {
                let old = self.lookup(name, scope, target.loc)?.to_number();
                self.set_name(name, Value::Number(old + delta), scope, loc)?;
                (old, old + delta)
            }
            ExprKind::Member {
                object, property, ..
            } => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                let old = self.get_member(&object, &key, loc)?.to_number();
                self.set_member(&object, &key, Value::Number(old + delta), loc)?;
                (old, old + delta)
            }
            _ => {
                return Err(self.throw_error(
                    "SyntaxError",
                    "Invalid left-hand side expression in update operation",
                    loc,
                ));
            }
        };
        Ok(Value::Number(if prefix { new } else { old }))
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        scope: &Rc<Scope>,
        loc: Loc,
    ) -> Flow<Value> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let result = match op {
                    AssignOp::Assign => self.eval(value, scope)?,
                    AssignOp::Compound(op) => {
                        let old = self.lookup(name, scope, target.loc)?;
                        let right = self.eval(value, scope)?;
                        self.binary(op, old, right, loc)?
                    }
                    AssignOp::Logical(op) => {
                        let old = self.lookup(name, scope, target.loc)?;
                        if !continues(op, &old) {
                            return Ok(old);
                        }
                        self.eval(value, scope)?
                    }
                };
                self.set_name(name, result.clone(), scope, loc)?;
                Ok(result)
            }
            ExprKind::Member {
                object, property, ..
            } => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                let result = match op {
                    AssignOp::Assign => self.eval(value, scope)?,
                    AssignOp::Compound(op) => {
                        let old = self.get_member(&object, &key, target.loc)?;
                        let right = self.eval(value, scope)?;
                        self.binary(op, old, right, loc)?
                    }
                    AssignOp::Logical(op) => {
                        let old = self.get_member(&object, &key, target.loc)?;
                        if !continues(op, &old) {
                            return Ok(old);
                        }
                        self.eval(value, scope)?
                    }
                };
                self.set_member(&object, &key, result.clone(), loc)?;
                Ok(result)
            }
            _ => Err(self.throw_error(
                "SyntaxError",
                "Invalid left-hand side in assignment",
                loc,
            )),
        }
    }

    pub(crate) fn binary(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        loc: Loc,
    ) -> Flow<Value> {
        let number = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        let int = |f: fn(i32, i32) -> i32| {
            Value::Number(f64::from(f(
                to_int32(left.to_number()),
                to_int32(right.to_number()),
            )))
        };
        let shift = to_uint32(right.to_number()) & 31;
        let value = match op {
            BinaryOp::Add => return self.add(&left, &right, loc),
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Rem => number(|a, b| a % b),
            BinaryOp::Exp => number(power),
            BinaryOp::Eq => Value::Bool(left.loose_equals(&right)),
            BinaryOp::NotEq => Value::Bool(!left.loose_equals(&right)),
            BinaryOp::StrictEq => Value::Bool(left.strict_equals(&right)),
            BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(&right)),
            BinaryOp::Lt => Value::Bool(compare(&left, &right) == Some(Ordering::Less)),
            BinaryOp::LtEq => Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(compare(&left, &right) == Some(Ordering::Greater)),
            BinaryOp::GtEq => Value::Bool(matches!(
                compare(&left, &right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::BitAnd => int(|a, b| a & b),
            BinaryOp::BitOr => int(|a, b| a | b),
            BinaryOp::BitXor => int(|a, b| a ^ b),
            BinaryOp::Shl => Value::Number(f64::from(
                to_int32(left.to_number()).wrapping_shl(shift),
            )),
            BinaryOp::Shr => Value::Number(f64::from(to_int32(left.to_number()) >> shift)),
            BinaryOp::UShr => Value::Number(f64::from(to_uint32(left.to_number()) >> shift)),
            BinaryOp::In => return self.has_property(&right, &left, loc).map(Value::Bool),
            BinaryOp::InstanceOf => {
                let Value::Function(function) = &right else {
                    return Err(self.type_error(
                        "Right-hand side of 'instanceof' is not callable",
                        loc,
                    ));
                };
                Value::Bool(builtins::instance_of(&left, function))
            }
        };
        Ok(value)
    }

    fn add(&mut self, left: &Value, right: &Value, loc: Loc) -> Flow<Value> {
        let (left, right) = (left.to_primitive(), right.to_primitive());
        if !matches!(left, Value::String(_)) && !matches!(right, Value::String(_)) {
            return Ok(Value::Number(left.to_number() + right.to_number()));
        }
        let (left, right) = (left.to_js_string(), right.to_js_string());
        self.check_length(left.len() + right.len(), loc)?;
        let mut out = String::with_capacity(left.len() + right.len());
        out.push_str(&left);
        out.push_str(&right);
        Ok(Value::from(out))
    }

    fn has_property(&mut self, object: &Value, key: &Value, loc: Loc) -> Flow<bool> {
        let key = key.to_property_key();
        match object {
            Value::Object(object) => Ok(object.borrow().props.contains_key(&*key)),
            Value::Array(items) => Ok(&*key == "length"
                || array_index(&key).is_some_and(|index| index < items.borrow().len())),
            Value::Function(_) => Ok(false),
            other => {
                let message = format!(
                    "Cannot use 'in' operator to search for '{key}' in {}",
                    other.to_js_string()
                );
                Err(self.type_error(&message, loc))
            }
        }
    }
}

impl Drop for Interp<'_> {
    fn drop(&mut self) {
        self.root.clear_chain();
        for scope in &self.captured {
            scope.clear_chain();
        }
        for value in self.mutated.drain(..) {
            match &value {
                Value::Array(items) => {
                    if let Ok(mut items) = items.try_borrow_mut() {
                        let taken = std::mem::take(&mut items.0);
                        drop(items);
                        drop(taken);
                    }
                }
                Value::Object(object) => {
                    if let Ok(mut object) = object.try_borrow_mut() {
                        let taken = std::mem::take(&mut object.props);
                        drop(object);
                        drop(taken);
                    }
                }
                _ => {}
            }
        }
    }
}

pub(crate) fn into_eval_error(abrupt: Abrupt) -> EvalError {
    match abrupt {
        Abrupt::Fatal(err) => *err,
        Abrupt::Throw { value, loc, stack } => EvalError::runtime(thrown_message(&value))
            .at(loc.line, loc.column)
            .with_stack(stack),
    }
}

fn thrown_message(value: &Value) -> String {
    match value {
        Value::Object(object) if object.borrow().class == super::value::Class::Error => {
            value.to_js_string().to_string()
        }
        other => format!("Uncaught {}", other.to_js_string()),
    }
}

/// Whether a logical operator goes on to evaluate its right side.
fn continues(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => left.truthy(),
        LogicalOp::Or => !left.truthy(),
        LogicalOp::Nullish => left.is_nullish(),
    }
}

fn loop_exit(completion: Completion) -> Option<Completion> {
    match completion {
        Completion::Normal | Completion::Continue => None,
        Completion::Break => Some(Completion::Normal),
        Completion::Return(value) => Some(Completion::Return(value)),
    }
}

fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let (left, right) = (left.to_primitive(), right.to_primitive());
    match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

/// Own enumerable entries, as object spread copies them.
pub(crate) fn own_entries(source: &Value, out: &mut Props) {
    match source {
        Value::Object(object) => {
            for (key, value) in object.borrow().props.iter() {
                out.insert(key.clone(), value.clone());
            }
        }
        Value::Array(items) => {
            for (index, value) in items.borrow().iter().enumerate() {
                out.insert(index.to_string().into(), value.clone());
            }
        }
        Value::String(s) => {
            for (index, c) in s.chars().enumerate() {
                out.insert(index.to_string().into(), Value::from(c.to_string()));
            }
        }
        _ => {}
    }
}

/// Keys `for…in` visits.
pub(crate) fn enumerable_keys(source: &Value) -> Vec<Value> {
    match source {
        Value::Object(object) => object
            .borrow()
            .props
            .keys()
            .map(|key| Value::String(key.clone()))
            .collect(),
        Value::Array(items) => (0..items.borrow().len())
            .map(|index| Value::from(index.to_string()))
            .collect(),
        Value::String(s) => (0..s.encode_utf16().count())
            .map(|index| Value::from(index.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn declares_lexically(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| {
        matches!(
            stmt.kind,
            StmtKind::VarDecl(DeclKind::Let | DeclKind::Const, _) | StmtKind::FunctionDecl(_)
        )
    })
}

fn collect_var_names(body: &[Stmt], out: &mut Vec<Rc<str>>) {
    for stmt in body {
        collect_stmt_var_names(stmt, out);
    }
}

fn collect_stmt_var_names(stmt: &Stmt, out: &mut Vec<Rc<str>>) {
    match &stmt.kind {
        StmtKind::VarDecl(DeclKind::Var, decls) => {
            for decl in decls {
                decl.pattern.names(out);
            }
        }
        StmtKind::If {
            then, otherwise, ..
        } => {
            collect_stmt_var_names(then, out);
            if let Some(otherwise) = otherwise {
                collect_stmt_var_names(otherwise, out);
            }
        }
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init {
                collect_stmt_var_names(init, out);
            }
            collect_stmt_var_names(body, out);
        }
        StmtKind::ForOf { binding, body, .. } | StmtKind::ForIn { binding, body, .. } => {
            if let ForBinding::Decl(DeclKind::Var, pattern) = binding {
                pattern.names(out);
            }
            collect_stmt_var_names(body, out);
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => {
            collect_stmt_var_names(body, out);
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_var_names(block, out);
            for body in handler.iter().chain(finalizer) {
                collect_var_names(body, out);
            }
        }
        StmtKind::Block(body) => collect_var_names(body, out),
        _ => {}
    }
}

/// Source-ish text for an expression in error messages.
pub(crate) fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.to_string(),
        ExprKind::This => "this".to_string(),
        ExprKind::Member {
            object,
            property: MemberKey::Static(key),
            ..
        } => format!("{}.{key}", describe(object)),
        ExprKind::Member {
            object,
            property: MemberKey::Computed(_),
            ..
        } => format!("{}[...]", describe(object)),
        ExprKind::Call { callee, .. } => format!("{}(...)", describe(callee)),
        ExprKind::OptionalChain(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        Value::Array(_) | Value::Object(_) => "object".to_string(),
        Value::Function(function) => format!("function {}", function.name()),
        other => other.to_js_string().to_string(),
    }
}
