//! The classic tree-walking back-end
//!
//! Duplicates the VM's observable semantics over the AST directly, with an
//! environment chain instead of stack slots and explicit control-flow
//! results instead of unwinding. Selected with `--classic`; each backend
//! keeps its own value representation and they never mix.

mod environment;

pub use environment::{Env, Environment};

use crate::ast::{ClassDecl, Expr, ExprKind, FunctionDecl, Stmt, StmtKind};
use crate::console::Console;
use crate::diagnostic::DiagnosticSink;
use crate::resolver::Analysis;
use crate::symbol::{Binding, CallBindingKind, FunctionId, SymbolKind};
use crate::token::{Literal, TokenKind};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A classic-backend value
#[derive(Debug, Clone)]
pub enum CValue {
    /// `nil`
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating
    Float(f64),
    /// String
    Str(Rc<str>),
    /// Mutable list
    List(Rc<RefCell<Vec<CValue>>>),
    /// Mutable pair map
    Map(Rc<RefCell<Vec<(CValue, CValue)>>>),
    /// A user function closed over its environment
    Function(Rc<CFunction>),
    /// All overloads sharing one name
    Overloads(Rc<RefCell<Vec<Rc<CFunction>>>>),
    /// A class
    Class(Rc<CClass>),
    /// An instance
    Instance(Rc<RefCell<CInstance>>),
    /// Receiver-bound method
    BoundMethod(Box<CValue>, Rc<CFunction>),
    /// Host function (dispatched by name)
    Native(Rc<str>),
}

/// A user function: declaration + defining environment
#[derive(Debug)]
pub struct CFunction {
    /// The declaration (shared with the parser output)
    pub decl: Rc<FunctionDecl>,
    /// Defining environment, captured at declaration time
    pub closure: Env,
    /// Dispatch id from the resolver
    pub function_id: FunctionId,
    /// Constructors return their receiver
    pub is_initializer: bool,
}

/// A class: method table by dispatch id, fields stored by name
#[derive(Debug)]
pub struct CClass {
    /// Class name
    pub name: String,
    /// Direct base
    pub base: Option<Rc<CClass>>,
    /// Methods, inherited entries included (overrides replace them)
    pub methods: HashMap<FunctionId, Rc<CFunction>>,
    /// Constructors in declaration order
    pub initializers: Vec<(FunctionId, usize)>,
    /// All field names, base fields first
    pub field_names: Vec<String>,
}

/// An instance with by-name field storage
#[derive(Debug)]
pub struct CInstance {
    /// The class
    pub class: Rc<CClass>,
    /// Field values
    pub fields: HashMap<String, CValue>,
}

impl CValue {
    fn is_truthy(&self) -> bool {
        !matches!(self, CValue::Nil | CValue::Bool(false))
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            CValue::Int(v) => Some(*v as f64),
            CValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Same equality rules as the VM: never cross-kinds, strings by
    /// content, containers and instances by identity
    fn equals(&self, other: &CValue) -> bool {
        match (self, other) {
            (CValue::Nil, CValue::Nil) => true,
            (CValue::Bool(a), CValue::Bool(b)) => a == b,
            (CValue::Int(a), CValue::Int(b)) => a == b,
            (CValue::Float(a), CValue::Float(b)) => a == b,
            (CValue::Str(a), CValue::Str(b)) => a == b,
            (CValue::List(a), CValue::List(b)) => Rc::ptr_eq(a, b),
            (CValue::Map(a), CValue::Map(b)) => Rc::ptr_eq(a, b),
            (CValue::Instance(a), CValue::Instance(b)) => Rc::ptr_eq(a, b),
            (CValue::Class(a), CValue::Class(b)) => Rc::ptr_eq(a, b),
            (CValue::Function(a), CValue::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for CValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CValue::Nil => write!(f, "nil"),
            CValue::Bool(b) => write!(f, "{}", b),
            CValue::Int(v) => write!(f, "{}", v),
            CValue::Float(v) => write!(f, "{}", v),
            CValue::Str(s) => write!(f, "{}", s),
            CValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            CValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            CValue::Function(func) => write!(f, "<fn {}>", func.decl.name.lexeme),
            CValue::Overloads(set) => {
                let set = set.borrow();
                match set.first() {
                    Some(first) => write!(f, "<fn {}>", first.decl.name.lexeme),
                    None => write!(f, "<fn>"),
                }
            }
            CValue::Class(class) => write!(f, "<class {}>", class.name),
            CValue::Instance(instance) => {
                write!(f, "<{} instance>", instance.borrow().class.name)
            }
            CValue::BoundMethod(_, method) => write!(f, "<fn {}>", method.decl.name.lexeme),
            CValue::Native(name) => write!(f, "<native fn {}>", name),
        }
    }
}

/// Explicit control-flow result: no unwinding for `return`
enum Flow {
    Normal,
    Return(CValue),
}

/// A runtime failure in the classic back-end
struct CError {
    message: String,
    line: u32,
}

fn cerr(line: u32, message: impl Into<String>) -> CError {
    CError {
        message: message.into(),
        line,
    }
}

type EvalResult = Result<CValue, CError>;
type ExecResult = Result<Flow, CError>;

/// The tree-walking interpreter; environment state persists across REPL
/// lines
pub struct Interpreter {
    globals: Env,
    env: Env,
    filename: String,
}

impl Interpreter {
    /// Create an interpreter with natives pre-defined in the global
    /// environment
    pub fn new(filename: &str) -> Self {
        let globals = Environment::global();
        globals
            .borrow_mut()
            .define("clock", CValue::Native(Rc::from("clock")));
        globals
            .borrow_mut()
            .define("len", CValue::Native(Rc::from("len")));
        Self {
            env: Rc::clone(&globals),
            globals,
            filename: filename.to_string(),
        }
    }

    /// Execute a resolved program; reports runtime errors and returns
    /// false when one occurred
    pub fn interpret(
        &mut self,
        program: &[Stmt],
        analysis: &Analysis,
        console: &mut dyn Console,
        diags: &mut DiagnosticSink,
    ) -> bool {
        // Each top-level program starts from the global environment, even
        // if a previous run aborted mid-block.
        self.env = Rc::clone(&self.globals);
        let mut ctx = Ctx {
            analysis,
            console,
            interpreter: self,
        };
        for stmt in program {
            match ctx.execute(stmt) {
                Ok(_) => {}
                Err(error) => {
                    let filename = ctx.interpreter.filename.clone();
                    ctx.console.error(&format!(
                        "[Line {} in file {}]: {}\n",
                        error.line, filename, error.message
                    ));
                    diags.runtime_error(error.line, error.message);
                    return false;
                }
            }
        }
        true
    }
}

/// Per-run context: the interpreter plus the borrowed analysis and console
struct Ctx<'a, 'i> {
    analysis: &'a Analysis,
    console: &'a mut dyn Console,
    interpreter: &'i mut Interpreter,
}

impl Ctx<'_, '_> {
    fn env(&self) -> Env {
        Rc::clone(&self.interpreter.env)
    }

    // ---- statements ----

    fn execute(&mut self, stmt: &Stmt) -> ExecResult {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Print(expr) => {
                let value = self.evaluate(expr)?;
                self.console.out(&format!("{}\n", value));
                Ok(Flow::Normal)
            }
            StmtKind::Var(decl) => {
                let value = match &decl.initializer {
                    Some(init) => self.evaluate(init)?,
                    None => CValue::Nil,
                };
                self.env()
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), value);
                Ok(Flow::Normal)
            }
            StmtKind::Block(stmts) => {
                let previous = self.env();
                self.interpreter.env = Environment::child(&previous);
                let result = self.execute_all(stmts);
                self.interpreter.env = previous;
                result
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(cond)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                while self.evaluate(cond)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let previous = self.env();
                self.interpreter.env = Environment::child(&previous);
                let result = (|| {
                    if let Some(init) = init {
                        self.execute(init)?;
                    }
                    loop {
                        if let Some(cond) = cond {
                            if !self.evaluate(cond)?.is_truthy() {
                                break;
                            }
                        }
                        if let Flow::Return(value) = self.execute(body)? {
                            return Ok(Flow::Return(value));
                        }
                        if let Some(step) = step {
                            self.evaluate(step)?;
                        }
                    }
                    Ok(Flow::Normal)
                })();
                self.interpreter.env = previous;
                result
            }
            StmtKind::Foreach {
                name,
                iterable,
                body,
            } => {
                let value = self.evaluate(iterable)?;
                let elements: Vec<CValue> = match &value {
                    CValue::List(items) => items.borrow().clone(),
                    CValue::Map(entries) => {
                        entries.borrow().iter().map(|(k, _)| k.clone()).collect()
                    }
                    CValue::Str(s) => s
                        .chars()
                        .map(|c| CValue::Str(Rc::from(c.to_string())))
                        .collect(),
                    _ => {
                        return Err(cerr(
                            stmt.line,
                            format!("( cannot do operator in for {} )", value),
                        ))
                    }
                };

                let previous = self.env();
                self.interpreter.env = Environment::child(&previous);
                self.interpreter
                    .env
                    .borrow_mut()
                    .define(name.lexeme.clone(), CValue::Nil);
                let result = (|| {
                    for element in elements {
                        Environment::assign(&self.env(), &name.lexeme, element);
                        if let Flow::Return(value) = self.execute(body)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                    Ok(Flow::Normal)
                })();
                self.interpreter.env = previous;
                result
            }
            StmtKind::Function(decl) => {
                self.define_function(decl);
                Ok(Flow::Normal)
            }
            StmtKind::Return { value, .. } => {
                let result = match value {
                    Some(value) => self.evaluate(value)?,
                    None => CValue::Nil,
                };
                Ok(Flow::Return(result))
            }
            StmtKind::Class(decl) => self.execute_class(stmt, decl),
        }
    }

    fn execute_all(&mut self, stmts: &[Stmt]) -> ExecResult {
        for stmt in stmts {
            if let Flow::Return(value) = self.execute(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn define_function(&mut self, decl: &Rc<FunctionDecl>) {
        let info = self.analysis.functions.get(&decl.id);
        let function_id = info.map(|i| i.id).unwrap_or(FunctionId::INVALID);
        let function = Rc::new(CFunction {
            decl: Rc::clone(decl),
            closure: self.env(),
            function_id,
            is_initializer: false,
        });

        let env = self.env();
        let mut env = env.borrow_mut();
        match env.get_here(&decl.name.lexeme) {
            Some(CValue::Overloads(set)) => {
                set.borrow_mut().push(function);
            }
            Some(CValue::Function(existing)) => {
                env.define(
                    decl.name.lexeme.clone(),
                    CValue::Overloads(Rc::new(RefCell::new(vec![existing, function]))),
                );
            }
            _ => {
                env.define(
                    decl.name.lexeme.clone(),
                    CValue::Overloads(Rc::new(RefCell::new(vec![function]))),
                );
            }
        }
    }

    fn execute_class(&mut self, stmt: &Stmt, decl: &Rc<ClassDecl>) -> ExecResult {
        let base = match &decl.base {
            Some(base_name) => {
                match Environment::get(&self.env(), &base_name.lexeme) {
                    Some(CValue::Class(base)) => Some(base),
                    _ => {
                        return Err(cerr(
                            stmt.line,
                            format!("{} is not a class.", base_name.lexeme),
                        ))
                    }
                }
            }
            None => None,
        };

        let mut field_names: Vec<String> = base
            .as_ref()
            .map(|b| b.field_names.clone())
            .unwrap_or_default();
        field_names.extend(decl.fields.iter().map(|f| f.name.lexeme.clone()));

        let mut methods: HashMap<FunctionId, Rc<CFunction>> = base
            .as_ref()
            .map(|b| b.methods.clone())
            .unwrap_or_default();
        let mut initializers = Vec::new();

        for method in &decl.methods {
            let info = match self.analysis.functions.get(&method.id) {
                Some(info) => info,
                None => continue,
            };
            let function = Rc::new(CFunction {
                decl: Rc::clone(method),
                closure: self.env(),
                function_id: info.dispatch_id,
                is_initializer: info.is_initializer,
            });
            if info.is_initializer {
                initializers.push((info.dispatch_id, info.arity));
            }
            methods.insert(info.dispatch_id, function);
        }

        let class = Rc::new(CClass {
            name: decl.name.lexeme.clone(),
            base,
            methods,
            initializers,
            field_names,
        });
        self.env()
            .borrow_mut()
            .define(decl.name.lexeme.clone(), CValue::Class(class));
        Ok(Flow::Normal)
    }

    // ---- expressions ----

    fn evaluate(&mut self, expr: &Expr) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Integer(v) => CValue::Int(*v),
                Literal::Floating(v) => CValue::Float(*v),
                Literal::String(s) => CValue::Str(Rc::from(s.as_str())),
                Literal::Boolean(b) => CValue::Bool(*b),
                Literal::Nil => CValue::Nil,
            }),
            ExprKind::Grouping(inner) => self.evaluate(inner),
            ExprKind::Variable { name } => self.lookup(expr, &name.lexeme),
            ExprKind::This { .. } => Environment::get(&self.env(), "this")
                .ok_or_else(|| cerr(expr.line, "Cannot use 'this' here.")),
            ExprKind::Base { member, .. } => self.base_method_value(expr, &member.lexeme),
            ExprKind::Assign { target, value } => self.assign(target, value),
            ExprKind::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                match op.kind {
                    TokenKind::Minus => match value {
                        CValue::Int(v) => Ok(CValue::Int(-v)),
                        CValue::Float(v) => Ok(CValue::Float(-v)),
                        _ => Err(cerr(expr.line, "Operand must be a number.")),
                    },
                    _ => Ok(CValue::Bool(!value.is_truthy())),
                }
            }
            ExprKind::Prefix { op, target } => self.step(expr, op.kind, target, true),
            ExprKind::Postfix { op, target } => self.step(expr, op.kind, target, false),
            ExprKind::Binary { left, op, right } => self.binary(expr, left, op.kind, right),
            ExprKind::Logical { left, op, right } => {
                let lhs = self.evaluate(left)?;
                if op.kind == TokenKind::Or {
                    if lhs.is_truthy() {
                        return Ok(lhs);
                    }
                } else if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                self.evaluate(right)
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(cond)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            ExprKind::Comma { left, right } => {
                self.evaluate(left)?;
                self.evaluate(right)
            }
            ExprKind::Call { callee, args, .. } => self.call(expr, callee, args),
            ExprKind::Get { object, name } => {
                let receiver = self.evaluate(object)?;
                self.get_member(expr, receiver, &name.lexeme)
            }
            ExprKind::Index { object, index, .. } => {
                let container = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                self.index_get(expr, container, index)
            }
            ExprKind::Slice { object, lo, hi, .. } => {
                let container = self.evaluate(object)?;
                let lo = self.evaluate(lo)?;
                let hi = self.evaluate(hi)?;
                self.slice(expr, container, lo, hi)
            }
            ExprKind::List { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element)?);
                }
                Ok(CValue::List(Rc::new(RefCell::new(items))))
            }
            ExprKind::Map { entries, .. } => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push((self.evaluate(k)?, self.evaluate(v)?));
                }
                Ok(CValue::Map(Rc::new(RefCell::new(pairs))))
            }
        }
    }

    /// A name in value position; bare fields and methods reach through the
    /// implicit receiver
    fn lookup(&mut self, expr: &Expr, name: &str) -> EvalResult {
        if let Some(Binding::Variable(binding)) = self.analysis.bindings.get(expr.id) {
            if binding.symbol.kind == SymbolKind::Field {
                let this = Environment::get(&self.env(), "this")
                    .ok_or_else(|| cerr(expr.line, "Cannot use 'this' here."))?;
                return self.get_member(expr, this, name);
            }
        }
        if let Some(Binding::Function(_)) = self.analysis.bindings.get(expr.id) {
            let this = Environment::get(&self.env(), "this")
                .ok_or_else(|| cerr(expr.line, "Cannot use 'this' here."))?;
            return self.get_member(expr, this, name);
        }
        Environment::get(&self.env(), name)
            .ok_or_else(|| cerr(expr.line, format!("Undefined variable '{}'.", name)))
    }

    fn base_method_value(&mut self, expr: &Expr, member: &str) -> EvalResult {
        let this = Environment::get(&self.env(), "this")
            .ok_or_else(|| cerr(expr.line, "Cannot use 'base' here."))?;
        let binding = self
            .analysis
            .bindings
            .function(expr.id)
            .cloned()
            .ok_or_else(|| cerr(expr.line, format!("Undefined member '{}'.", member)))?;
        if let CallBindingKind::Super { class_symbol } = &binding.kind {
            let class = match Environment::get(&self.env(), &class_symbol.name) {
                Some(CValue::Class(class)) => class,
                _ => return Err(cerr(expr.line, "Base class is not defined.")),
            };
            let method = class
                .methods
                .get(&binding.function_id)
                .ok_or_else(|| cerr(expr.line, format!("Undefined member '{}'.", member)))?;
            return Ok(CValue::BoundMethod(Box::new(this), Rc::clone(method)));
        }
        Err(cerr(expr.line, format!("Undefined member '{}'.", member)))
    }

    fn assign(&mut self, target: &Expr, value_expr: &Expr) -> EvalResult {
        let value = self.evaluate(value_expr)?;
        match &target.kind {
            ExprKind::Variable { name } => {
                // Bare fields write through the implicit receiver.
                if let Some(Binding::Variable(binding)) = self.analysis.bindings.get(target.id) {
                    if binding.symbol.kind == SymbolKind::Field {
                        let this = Environment::get(&self.env(), "this")
                            .ok_or_else(|| cerr(target.line, "Cannot use 'this' here."))?;
                        return self.set_member(target, this, &name.lexeme, value);
                    }
                }
                if Environment::assign(&self.env(), &name.lexeme, value.clone()) {
                    Ok(value)
                } else {
                    Err(cerr(
                        target.line,
                        format!("Undefined variable '{}'.", name.lexeme),
                    ))
                }
            }
            ExprKind::Get { object, name } => {
                let receiver = self.evaluate(object)?;
                self.set_member(target, receiver, &name.lexeme, value)
            }
            ExprKind::Index { object, index, .. } => {
                let container = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                self.index_set(target, container, index, value)
            }
            _ => Err(cerr(target.line, "Invalid assignment target.")),
        }
    }

    fn step(
        &mut self,
        expr: &Expr,
        op: TokenKind,
        target: &Expr,
        prefix: bool,
    ) -> EvalResult {
        let name = match &target.kind {
            ExprKind::Variable { name } => name.lexeme.clone(),
            _ => return Err(cerr(expr.line, "Operand of ++/-- must be a variable.")),
        };
        let old = Environment::get(&self.env(), &name)
            .ok_or_else(|| cerr(expr.line, format!("Undefined variable '{}'.", name)))?;
        let delta: i64 = if op == TokenKind::PlusPlus { 1 } else { -1 };
        let new = match &old {
            CValue::Int(v) => CValue::Int(
                v.checked_add(delta)
                    .ok_or_else(|| cerr(expr.line, "Integer overflow."))?,
            ),
            CValue::Float(v) => CValue::Float(v + delta as f64),
            _ => return Err(cerr(expr.line, "Operand must be a number.")),
        };
        Environment::assign(&self.env(), &name, new.clone());
        Ok(if prefix { new } else { old })
    }

    fn binary(&mut self, expr: &Expr, left: &Expr, op: TokenKind, right: &Expr) -> EvalResult {
        let lhs = self.evaluate(left)?;
        let rhs = self.evaluate(right)?;

        // Overloaded operators were rewritten to method calls at resolution.
        if let Some(binding) = self.analysis.bindings.operator(expr.id).cloned() {
            if let CValue::Instance(instance) = &lhs {
                let class = Rc::clone(&instance.borrow().class);
                let method = class.methods.get(&binding.function_id).cloned();
                if let Some(method) = method {
                    return self.call_function(&method, Some(lhs.clone()), vec![rhs], expr.line);
                }
            }
        }

        let line = expr.line;
        match op {
            TokenKind::EqualEqual => Ok(CValue::Bool(lhs.equals(&rhs))),
            TokenKind::BangEqual => Ok(CValue::Bool(!lhs.equals(&rhs))),
            TokenKind::Plus => match (&lhs, &rhs) {
                (CValue::Str(a), CValue::Str(b)) => {
                    Ok(CValue::Str(Rc::from(format!("{}{}", a, b))))
                }
                (CValue::Int(a), CValue::Int(b)) => a
                    .checked_add(*b)
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => self.numeric(line, &lhs, &rhs, |a, b| a + b),
            },
            TokenKind::Minus => match (&lhs, &rhs) {
                (CValue::Int(a), CValue::Int(b)) => a
                    .checked_sub(*b)
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => self.numeric(line, &lhs, &rhs, |a, b| a - b),
            },
            TokenKind::Star => match (&lhs, &rhs) {
                (CValue::Int(a), CValue::Int(b)) => a
                    .checked_mul(*b)
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => self.numeric(line, &lhs, &rhs, |a, b| a * b),
            },
            TokenKind::Slash => match (&lhs, &rhs) {
                (CValue::Int(_), CValue::Int(0)) => Err(cerr(line, "Divide by zero.")),
                (CValue::Int(a), CValue::Int(b)) => a
                    .checked_div(*b)
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => {
                    if rhs.as_number() == Some(0.0) {
                        return Err(cerr(line, "Divide by zero."));
                    }
                    self.numeric(line, &lhs, &rhs, |a, b| a / b)
                }
            },
            TokenKind::Percent => match (&lhs, &rhs) {
                (CValue::Int(_), CValue::Int(0)) => Err(cerr(line, "Divide by zero.")),
                (CValue::Int(a), CValue::Int(b)) => a
                    .checked_rem(*b)
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => {
                    if rhs.as_number() == Some(0.0) {
                        return Err(cerr(line, "Divide by zero."));
                    }
                    self.numeric(line, &lhs, &rhs, |a, b| a % b)
                }
            },
            TokenKind::StarStar => match (&lhs, &rhs) {
                (CValue::Int(a), CValue::Int(b)) if *b >= 0 => u32::try_from(*b)
                    .ok()
                    .and_then(|exp| a.checked_pow(exp))
                    .map(CValue::Int)
                    .ok_or_else(|| cerr(line, "Integer overflow.")),
                _ => self.numeric(line, &lhs, &rhs, |a, b| a.powf(b)),
            },
            TokenKind::Less => self.compare(line, &lhs, &rhs, |o| o == std::cmp::Ordering::Less),
            TokenKind::LessEqual => {
                self.compare(line, &lhs, &rhs, |o| o != std::cmp::Ordering::Greater)
            }
            TokenKind::Greater => {
                self.compare(line, &lhs, &rhs, |o| o == std::cmp::Ordering::Greater)
            }
            TokenKind::GreaterEqual => {
                self.compare(line, &lhs, &rhs, |o| o != std::cmp::Ordering::Less)
            }
            _ => Err(cerr(line, "Unknown binary operator.")),
        }
    }

    fn numeric(
        &self,
        line: u32,
        lhs: &CValue,
        rhs: &CValue,
        op: fn(f64, f64) -> f64,
    ) -> EvalResult {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Ok(CValue::Float(op(a, b))),
            _ => Err(cerr(
                line,
                "Invalid operands for binary operator: operands must be numbers.",
            )),
        }
    }

    fn compare(
        &self,
        line: u32,
        lhs: &CValue,
        rhs: &CValue,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> EvalResult {
        if let (CValue::Str(a), CValue::Str(b)) = (lhs, rhs) {
            return Ok(CValue::Bool(accept(a.cmp(b))));
        }
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => {
                let ordering = a
                    .partial_cmp(&b)
                    .ok_or_else(|| cerr(line, "Cannot compare NaN."))?;
                Ok(CValue::Bool(accept(ordering)))
            }
            _ => Err(cerr(
                line,
                "Invalid operands for binary operator: operands must be numbers.",
            )),
        }
    }

    // ---- calls ----

    fn call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> EvalResult {
        // The callee (or receiver) evaluates before the arguments, matching
        // the VM's left-to-right effect order.

        if let Some(binding) = self.analysis.bindings.function(expr.id).cloned() {
            match &binding.kind {
                CallBindingKind::Method => {
                    let receiver = match &callee.kind {
                        ExprKind::Get { object, .. } => self.evaluate(object)?,
                        _ => Environment::get(&self.env(), "this")
                            .ok_or_else(|| cerr(expr.line, "Cannot use 'this' here."))?,
                    };
                    let arg_values = self.evaluate_args(args)?;
                    let class = match &receiver {
                        CValue::Instance(instance) => Rc::clone(&instance.borrow().class),
                        _ => return Err(cerr(expr.line, "Only instances have methods.")),
                    };
                    let method = class
                        .methods
                        .get(&binding.function_id)
                        .cloned()
                        .ok_or_else(|| cerr(expr.line, "Undefined method."))?;
                    return self.call_function(&method, Some(receiver), arg_values, expr.line);
                }
                CallBindingKind::Super { class_symbol } => {
                    let receiver = Environment::get(&self.env(), "this")
                        .ok_or_else(|| cerr(expr.line, "Cannot use 'this' here."))?;
                    let arg_values = self.evaluate_args(args)?;
                    let class = match Environment::get(&self.env(), &class_symbol.name) {
                        Some(CValue::Class(class)) => class,
                        _ => return Err(cerr(expr.line, "Base class is not defined.")),
                    };
                    let method = class
                        .methods
                        .get(&binding.function_id)
                        .cloned()
                        .ok_or_else(|| cerr(expr.line, "Undefined method."))?;
                    return self.call_function(&method, Some(receiver), arg_values, expr.line);
                }
                CallBindingKind::Native(_) => {
                    let name = match &callee.kind {
                        ExprKind::Variable { name } => name.lexeme.clone(),
                        _ => return Err(cerr(expr.line, "Can only call functions and classes.")),
                    };
                    let arg_values = self.evaluate_args(args)?;
                    return self.call_native(&name, arg_values, expr.line);
                }
                _ => {}
            }
        }

        // Constructor calls: the callee carries a class binding.
        if let Some(class_binding) = self.analysis.bindings.class_expression(callee.id).cloned() {
            let class = match Environment::get(&self.env(), &class_binding.symbol.name) {
                Some(CValue::Class(class)) => class,
                _ => {
                    return Err(cerr(
                        expr.line,
                        format!("Undefined variable '{}'.", class_binding.symbol.name),
                    ))
                }
            };
            let arg_values = self.evaluate_args(args)?;
            return self.instantiate(&class, class_binding.constructor, arg_values, expr.line);
        }

        let callee_value = self.evaluate(callee)?;
        let arg_values = self.evaluate_args(args)?;
        self.call_dynamic(expr, callee_value, arg_values)
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<CValue>, CError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg)?);
        }
        Ok(values)
    }

    fn call_dynamic(
        &mut self,
        expr: &Expr,
        callee: CValue,
        args: Vec<CValue>,
    ) -> EvalResult {
        match callee {
            CValue::Function(function) => self.call_function(&function, None, args, expr.line),
            CValue::Overloads(set) => {
                // Pick the overload the resolver chose; fall back to the
                // only one when the set is unambiguous.
                let chosen = match self.analysis.bindings.function(expr.id) {
                    Some(binding) => set
                        .borrow()
                        .iter()
                        .find(|f| f.function_id == binding.function_id)
                        .cloned(),
                    None if set.borrow().len() == 1 => Some(set.borrow()[0].clone()),
                    None => set
                        .borrow()
                        .iter()
                        .find(|f| f.decl.params.len() == args.len())
                        .cloned(),
                };
                match chosen {
                    Some(function) => self.call_function(&function, None, args, expr.line),
                    None => Err(cerr(expr.line, "No matching overload for this call.")),
                }
            }
            CValue::BoundMethod(receiver, method) => {
                self.call_function(&method, Some(*receiver), args, expr.line)
            }
            CValue::Class(class) => {
                let ctor = class
                    .initializers
                    .iter()
                    .find(|(_, arity)| *arity == args.len())
                    .map(|(id, _)| *id);
                self.instantiate(&class, ctor, args, expr.line)
            }
            CValue::Native(name) => self.call_native(&name, args, expr.line),
            _ => Err(cerr(expr.line, "Can only call functions and classes.")),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<CFunction>,
        this: Option<CValue>,
        args: Vec<CValue>,
        line: u32,
    ) -> EvalResult {
        if function.decl.params.len() != args.len() {
            return Err(cerr(
                line,
                format!(
                    "Expected {} arguments but got {}.",
                    function.decl.params.len(),
                    args.len()
                ),
            ));
        }

        let call_env = Environment::child(&function.closure);
        if let Some(this_value) = &this {
            call_env.borrow_mut().define("this", this_value.clone());
        }
        for (param, arg) in function.decl.params.iter().zip(args) {
            call_env.borrow_mut().define(param.name.lexeme.clone(), arg);
        }

        let previous = self.env();
        self.interpreter.env = call_env;
        let result = self.execute_all(&function.decl.body);
        self.interpreter.env = previous;

        let flow = result?;
        if function.is_initializer {
            return Ok(this.unwrap_or(CValue::Nil));
        }
        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => CValue::Nil,
        })
    }

    fn instantiate(
        &mut self,
        class: &Rc<CClass>,
        ctor: Option<FunctionId>,
        args: Vec<CValue>,
        line: u32,
    ) -> EvalResult {
        let mut fields = HashMap::new();
        for name in &class.field_names {
            fields.insert(name.clone(), CValue::Nil);
        }
        let instance = CValue::Instance(Rc::new(RefCell::new(CInstance {
            class: Rc::clone(class),
            fields,
        })));

        match ctor {
            Some(id) => {
                let method = class
                    .methods
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| cerr(line, "Undefined constructor."))?;
                self.call_function(&method, Some(instance), args, line)
            }
            None if args.is_empty() => Ok(instance),
            None => Err(cerr(
                line,
                format!("Expected 0 arguments but got {}.", args.len()),
            )),
        }
    }

    fn call_native(&mut self, name: &str, args: Vec<CValue>, line: u32) -> EvalResult {
        match name {
            "clock" => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| cerr(line, format!("clock() failed: {}", e)))?;
                Ok(CValue::Float(now.as_secs_f64()))
            }
            "len" => match args.first() {
                Some(CValue::Str(s)) => Ok(CValue::Int(s.chars().count() as i64)),
                Some(CValue::List(items)) => Ok(CValue::Int(items.borrow().len() as i64)),
                Some(CValue::Map(entries)) => Ok(CValue::Int(entries.borrow().len() as i64)),
                _ => Err(cerr(line, "len() requires a string, list or map.")),
            },
            _ => Err(cerr(line, format!("Unknown native function '{}'.", name))),
        }
    }

    // ---- members & containers ----

    fn get_member(&mut self, expr: &Expr, receiver: CValue, name: &str) -> EvalResult {
        let instance = match &receiver {
            CValue::Instance(instance) => Rc::clone(instance),
            _ => return Err(cerr(expr.line, "Only instances have properties.")),
        };

        if let Some(value) = instance.borrow().fields.get(name) {
            return Ok(value.clone());
        }

        // A method read produces a bound method; prefer the binding's
        // dispatch id, falling back to a by-name search.
        let class = Rc::clone(&instance.borrow().class);
        if let Some(Binding::Function(binding)) = self.analysis.bindings.get(expr.id) {
            if let Some(method) = class.methods.get(&binding.function_id) {
                return Ok(CValue::BoundMethod(Box::new(receiver), Rc::clone(method)));
            }
        }
        let named: Vec<&Rc<CFunction>> = class
            .methods
            .values()
            .filter(|m| m.decl.name.lexeme == name)
            .collect();
        if let [method] = named.as_slice() {
            return Ok(CValue::BoundMethod(Box::new(receiver), Rc::clone(method)));
        }

        Err(cerr(
            expr.line,
            format!("Undefined member '{}'.", name),
        ))
    }

    fn set_member(
        &mut self,
        target: &Expr,
        receiver: CValue,
        name: &str,
        value: CValue,
    ) -> EvalResult {
        match receiver {
            CValue::Instance(instance) => {
                instance
                    .borrow_mut()
                    .fields
                    .insert(name.to_string(), value.clone());
                Ok(value)
            }
            _ => Err(cerr(target.line, "Only instances have fields.")),
        }
    }

    fn index_get(&mut self, expr: &Expr, container: CValue, index: CValue) -> EvalResult {
        match (&container, &index) {
            (CValue::List(items), CValue::Int(i)) => {
                let items = items.borrow();
                let i = check_index(expr.line, *i, items.len())?;
                Ok(items[i].clone())
            }
            (CValue::Map(entries), key) => Ok(entries
                .borrow()
                .iter()
                .find(|(k, _)| k.equals(key))
                .map(|(_, v)| v.clone())
                .unwrap_or(CValue::Nil)),
            (CValue::Str(s), CValue::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let i = check_index(expr.line, *i, chars.len())?;
                Ok(CValue::Str(Rc::from(chars[i].to_string())))
            }
            _ => Err(cerr(
                expr.line,
                "Only lists, maps and strings can be indexed.",
            )),
        }
    }

    fn index_set(
        &mut self,
        target: &Expr,
        container: CValue,
        index: CValue,
        value: CValue,
    ) -> EvalResult {
        match (&container, &index) {
            (CValue::List(items), CValue::Int(i)) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let i = check_index(target.line, *i, len)?;
                items[i] = value.clone();
                Ok(value)
            }
            (CValue::Map(entries), key) => {
                let mut entries = entries.borrow_mut();
                match entries.iter_mut().find(|(k, _)| k.equals(key)) {
                    Some(entry) => entry.1 = value.clone(),
                    None => entries.push((index.clone(), value.clone())),
                }
                Ok(value)
            }
            _ => Err(cerr(
                target.line,
                "Only lists and maps support index assignment.",
            )),
        }
    }

    fn slice(&mut self, expr: &Expr, container: CValue, lo: CValue, hi: CValue) -> EvalResult {
        let (lo, hi) = match (lo, hi) {
            (CValue::Int(lo), CValue::Int(hi)) => (lo, hi),
            _ => return Err(cerr(expr.line, "Slice bounds must be integers.")),
        };
        match container {
            CValue::List(items) => {
                let items = items.borrow();
                let (lo, hi) = check_range(expr.line, lo, hi, items.len())?;
                Ok(CValue::List(Rc::new(RefCell::new(items[lo..hi].to_vec()))))
            }
            CValue::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (lo, hi) = check_range(expr.line, lo, hi, chars.len())?;
                let text: String = chars[lo..hi].iter().collect();
                Ok(CValue::Str(Rc::from(text)))
            }
            _ => Err(cerr(expr.line, "Only lists and strings can be sliced.")),
        }
    }
}

fn check_index(line: u32, index: i64, len: usize) -> Result<usize, CError> {
    if index >= 0 && (index as usize) < len {
        Ok(index as usize)
    } else {
        Err(cerr(
            line,
            format!("Index {} out of range for container of size {}.", index, len),
        ))
    }
}

fn check_range(line: u32, lo: i64, hi: i64, len: usize) -> Result<(usize, usize), CError> {
    if lo < 0 || hi < lo || (hi as usize) > len {
        return Err(cerr(
            line,
            format!("Slice {}:{} out of range for container of size {}.", lo, hi, len),
        ));
    }
    Ok((lo as usize, hi as usize))
}
