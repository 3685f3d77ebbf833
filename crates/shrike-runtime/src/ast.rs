//! AST node model
//!
//! Tagged-variant nodes for expressions, statements and type expressions.
//! Every node carries a [`NodeId`], a dense arena index assigned by the
//! parser, which the resolver uses as the key of the binding table, and a
//! 1-based source line for error reporting and the chunk line table.

use crate::token::{Literal, Token};
use std::fmt::Write;
use std::rc::Rc;

/// Dense id of an AST node, unique within one parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// An expression node
#[derive(Debug, Clone)]
pub struct Expr {
    /// Binding-table key
    pub id: NodeId,
    /// Source line
    pub line: u32,
    /// The variant payload
    pub kind: ExprKind,
}

/// Expression variants
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A literal constant
    Literal(Literal),
    /// Parenthesized expression
    Grouping(Box<Expr>),
    /// A name reference
    Variable { name: Token },
    /// `this`
    This { keyword: Token },
    /// `base.member`
    Base { keyword: Token, member: Token },
    /// `target = value`
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `- ! `
    Unary { op: Token, operand: Box<Expr> },
    /// `++x` / `--x`
    Prefix { op: Token, target: Box<Expr> },
    /// `x++` / `x--`
    Postfix { op: Token, target: Box<Expr> },
    /// Arithmetic and comparison operators
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    /// `and` / `or`, short-circuiting
    Logical {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    /// `cond ? then : else`
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// `left, right`: evaluates both, yields right
    Comma { left: Box<Expr>, right: Box<Expr> },
    /// `callee(args)`
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    /// `object.name`
    Get { object: Box<Expr>, name: Token },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
    },
    /// `object[lo:hi]`
    Slice {
        object: Box<Expr>,
        bracket: Token,
        lo: Box<Expr>,
        hi: Box<Expr>,
    },
    /// `[a, b, c]`
    List { bracket: Token, elements: Vec<Expr> },
    /// `{k: v, ...}`
    Map {
        brace: Token,
        entries: Vec<(Expr, Expr)>,
    },
}

/// A statement node
#[derive(Debug, Clone)]
pub struct Stmt {
    /// Binding-table key
    pub id: NodeId,
    /// Source line
    pub line: u32,
    /// The variant payload
    pub kind: StmtKind,
}

/// Statement variants
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Expression evaluated for side effects
    Expression(Expr),
    /// `print expr;`
    Print(Expr),
    /// `var` / `const` declaration
    Var(VarDecl),
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `if (cond) then else`
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// `while (cond) body`
    While { cond: Expr, body: Box<Stmt> },
    /// `for (init; cond; step) body`
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (name in iterable) body`
    Foreach {
        name: Token,
        iterable: Expr,
        body: Box<Stmt>,
    },
    /// Function, method, constructor or operator declaration
    Function(Rc<FunctionDecl>),
    /// `return [expr];`
    Return { keyword: Token, value: Option<Expr> },
    /// Class declaration
    Class(Rc<ClassDecl>),
}

/// `var name [: type] [= init];`
#[derive(Debug, Clone)]
pub struct VarDecl {
    /// Declared name
    pub name: Token,
    /// Declared type annotation, if present
    pub ty: Option<TypeExpr>,
    /// Initializer, if present
    pub initializer: Option<Expr>,
    /// `const` rather than `var`
    pub constant: bool,
}

/// What position a callable declaration appears in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Free function
    Function,
    /// Method inside a class
    Method,
    /// `constructor(...)`
    Constructor,
    /// `operator <tok>(...)`
    Operator,
}

/// A callable declaration; shared between the backends via `Rc`
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// Binding key of the declaration itself
    pub id: NodeId,
    /// Source line of the header
    pub line: u32,
    /// Declared name (`constructor` for constructors, `operator+` etc. for operators)
    pub name: Token,
    /// Parameter list
    pub params: Vec<Param>,
    /// `-> type`, if declared
    pub return_type: Option<TypeExpr>,
    /// Body statements (no implicit extra block scope)
    pub body: Vec<Stmt>,
    /// Declaration position
    pub kind: FunctionKind,
}

/// One parameter of a callable
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name
    pub name: Token,
    /// Declared type, if present
    pub ty: Option<TypeExpr>,
}

/// A class declaration
#[derive(Debug, Clone)]
pub struct ClassDecl {
    /// Binding key of the declaration
    pub id: NodeId,
    /// Source line of the header
    pub line: u32,
    /// Class name
    pub name: Token,
    /// Direct base class name, if any
    pub base: Option<Token>,
    /// Field declarations, in declaration order (their order fixes field slots)
    pub fields: Vec<VarDecl>,
    /// Methods, constructors and operators
    pub methods: Vec<Rc<FunctionDecl>>,
}

/// A type annotation
#[derive(Debug, Clone)]
pub struct TypeExpr {
    /// Source line
    pub line: u32,
    /// The variant payload
    pub kind: TypeExprKind,
}

/// Type-expression variants
#[derive(Debug, Clone)]
pub enum TypeExprKind {
    /// A named type: `integer`, `string`, a class name, ...
    Named(Token),
    /// `list<T>`
    List(Box<TypeExpr>),
    /// `map<K, V>`
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// `A | B`
    Union(Vec<TypeExpr>),
}

/// Render a statement forest as a parenthesized tree, one statement per line.
///
/// Used by `--show-ast`.
pub fn print_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        print_stmt(stmt, &mut out);
        out.push('\n');
    }
    out
}

fn print_stmt(stmt: &Stmt, out: &mut String) {
    match &stmt.kind {
        StmtKind::Expression(e) => {
            out.push_str("(expr ");
            print_expr(e, out);
            out.push(')');
        }
        StmtKind::Print(e) => {
            out.push_str("(print ");
            print_expr(e, out);
            out.push(')');
        }
        StmtKind::Var(decl) => {
            let _ = write!(out, "({} {}", if decl.constant { "const" } else { "var" }, decl.name.lexeme);
            if let Some(init) = &decl.initializer {
                out.push(' ');
                print_expr(init, out);
            }
            out.push(')');
        }
        StmtKind::Block(stmts) => {
            out.push_str("(block");
            for s in stmts {
                out.push(' ');
                print_stmt(s, out);
            }
            out.push(')');
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("(if ");
            print_expr(cond, out);
            out.push(' ');
            print_stmt(then_branch, out);
            if let Some(e) = else_branch {
                out.push(' ');
                print_stmt(e, out);
            }
            out.push(')');
        }
        StmtKind::While { cond, body } => {
            out.push_str("(while ");
            print_expr(cond, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            out.push_str("(for");
            if let Some(i) = init {
                out.push(' ');
                print_stmt(i, out);
            }
            if let Some(c) = cond {
                out.push(' ');
                print_expr(c, out);
            }
            if let Some(s) = step {
                out.push(' ');
                print_expr(s, out);
            }
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        StmtKind::Foreach {
            name,
            iterable,
            body,
        } => {
            let _ = write!(out, "(foreach {} ", name.lexeme);
            print_expr(iterable, out);
            out.push(' ');
            print_stmt(body, out);
            out.push(')');
        }
        StmtKind::Function(decl) => {
            let _ = write!(out, "(fun {} (", decl.name.lexeme);
            for (i, p) in decl.params.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&p.name.lexeme);
            }
            out.push(')');
            for s in &decl.body {
                out.push(' ');
                print_stmt(s, out);
            }
            out.push(')');
        }
        StmtKind::Return { value, .. } => {
            out.push_str("(return");
            if let Some(v) = value {
                out.push(' ');
                print_expr(v, out);
            }
            out.push(')');
        }
        StmtKind::Class(decl) => {
            let _ = write!(out, "(class {}", decl.name.lexeme);
            if let Some(base) = &decl.base {
                let _ = write!(out, " : {}", base.lexeme);
            }
            for f in &decl.fields {
                let _ = write!(out, " (field {})", f.name.lexeme);
            }
            for m in &decl.methods {
                out.push(' ');
                let method = Stmt {
                    id: m.id,
                    line: m.line,
                    kind: StmtKind::Function(Rc::clone(m)),
                };
                print_stmt(&method, out);
            }
            out.push(')');
        }
    }
}

fn print_expr(expr: &Expr, out: &mut String) {
    match &expr.kind {
        ExprKind::Literal(lit) => match lit {
            Literal::Integer(v) => {
                let _ = write!(out, "{}", v);
            }
            Literal::Floating(v) => {
                let _ = write!(out, "{}", v);
            }
            Literal::String(s) => {
                let _ = write!(out, "\"{}\"", s);
            }
            Literal::Boolean(b) => {
                let _ = write!(out, "{}", b);
            }
            Literal::Nil => out.push_str("nil"),
        },
        ExprKind::Grouping(inner) => {
            out.push_str("(group ");
            print_expr(inner, out);
            out.push(')');
        }
        ExprKind::Variable { name } => out.push_str(&name.lexeme),
        ExprKind::This { .. } => out.push_str("this"),
        ExprKind::Base { member, .. } => {
            let _ = write!(out, "(base {})", member.lexeme);
        }
        ExprKind::Assign { target, value } => {
            out.push_str("(= ");
            print_expr(target, out);
            out.push(' ');
            print_expr(value, out);
            out.push(')');
        }
        ExprKind::Unary { op, operand } => {
            let _ = write!(out, "({} ", op.lexeme);
            print_expr(operand, out);
            out.push(')');
        }
        ExprKind::Prefix { op, target } => {
            let _ = write!(out, "(prefix{} ", op.lexeme);
            print_expr(target, out);
            out.push(')');
        }
        ExprKind::Postfix { op, target } => {
            let _ = write!(out, "(postfix{} ", op.lexeme);
            print_expr(target, out);
            out.push(')');
        }
        ExprKind::Binary { left, op, right } | ExprKind::Logical { left, op, right } => {
            let _ = write!(out, "({} ", op.lexeme);
            print_expr(left, out);
            out.push(' ');
            print_expr(right, out);
            out.push(')');
        }
        ExprKind::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("(?: ");
            print_expr(cond, out);
            out.push(' ');
            print_expr(then_branch, out);
            out.push(' ');
            print_expr(else_branch, out);
            out.push(')');
        }
        ExprKind::Comma { left, right } => {
            out.push_str("(, ");
            print_expr(left, out);
            out.push(' ');
            print_expr(right, out);
            out.push(')');
        }
        ExprKind::Call { callee, args, .. } => {
            out.push_str("(call ");
            print_expr(callee, out);
            for arg in args {
                out.push(' ');
                print_expr(arg, out);
            }
            out.push(')');
        }
        ExprKind::Get { object, name } => {
            out.push_str("(. ");
            print_expr(object, out);
            let _ = write!(out, " {})", name.lexeme);
        }
        ExprKind::Index { object, index, .. } => {
            out.push_str("([] ");
            print_expr(object, out);
            out.push(' ');
            print_expr(index, out);
            out.push(')');
        }
        ExprKind::Slice { object, lo, hi, .. } => {
            out.push_str("([:] ");
            print_expr(object, out);
            out.push(' ');
            print_expr(lo, out);
            out.push(' ');
            print_expr(hi, out);
            out.push(')');
        }
        ExprKind::List { elements, .. } => {
            out.push_str("(list");
            for e in elements {
                out.push(' ');
                print_expr(e, out);
            }
            out.push(')');
        }
        ExprKind::Map { entries, .. } => {
            out.push_str("(map");
            for (k, v) in entries {
                out.push(' ');
                print_expr(k, out);
                out.push(':');
                print_expr(v, out);
            }
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn test_print_simple_expression() {
        let expr = Expr {
            id: NodeId(0),
            line: 1,
            kind: ExprKind::Binary {
                left: Box::new(Expr {
                    id: NodeId(1),
                    line: 1,
                    kind: ExprKind::Literal(Literal::Integer(1)),
                }),
                op: Token::new(TokenKind::Plus, "+", 1),
                right: Box::new(Expr {
                    id: NodeId(2),
                    line: 1,
                    kind: ExprKind::Literal(Literal::Integer(2)),
                }),
            },
        };
        let stmt = Stmt {
            id: NodeId(3),
            line: 1,
            kind: StmtKind::Print(expr),
        };
        assert_eq!(print_program(&[stmt]), "(print (+ 1 2))\n");
    }
}
