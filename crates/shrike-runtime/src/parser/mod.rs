//! Recursive-descent parser
//!
//! Consumes the token stream and produces a statement forest. Errors are
//! logged and parsing re-synchronizes at statement boundaries so one bad
//! statement does not hide the rest of the file.
//!
//! Precedence, loosest first: comma, assignment, ternary, or, and, equality,
//! comparison, term, factor, power, unary, prefix/postfix, call, primary.

use crate::ast::*;
use crate::diagnostic::DiagnosticSink;
use crate::token::{Literal, Token, TokenKind};
use std::rc::Rc;

/// The parser state
pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    next_node: u32,
    diags: &'a mut DiagnosticSink,
}

/// Internal marker for statement-level synchronization
struct ParseError;

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    /// Create a parser over a scanned token stream
    pub fn new(tokens: Vec<Token>, diags: &'a mut DiagnosticSink) -> Self {
        Self::with_offset(tokens, diags, 0)
    }

    /// Create a parser whose node ids start at `first_node`.
    ///
    /// The REPL threads the counter through so ids stay unique across
    /// lines (they key the persistent binding state).
    pub fn with_offset(tokens: Vec<Token>, diags: &'a mut DiagnosticSink, first_node: u32) -> Self {
        Self {
            tokens,
            current: 0,
            next_node: first_node,
            diags,
        }
    }

    /// Parse the whole input
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(ParseError) => self.synchronize(),
            }
        }
        stmts
    }

    /// The next unassigned node id (for the REPL's continuation)
    pub fn next_node_id(&self) -> u32 {
        self.next_node
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    // ---- statements ----

    fn declaration(&mut self) -> PResult<Stmt> {
        if self.match_kind(TokenKind::Var) {
            return self.var_declaration(false);
        }
        if self.match_kind(TokenKind::Const) {
            return self.var_declaration(true);
        }
        if self.match_kind(TokenKind::Fun) {
            return self.function_declaration(FunctionKind::Function);
        }
        if self.match_kind(TokenKind::Class) {
            return self.class_declaration();
        }
        self.statement()
    }

    fn var_declaration(&mut self, constant: bool) -> PResult<Stmt> {
        let id = self.node_id();
        let name = self
            .consume(TokenKind::Identifier, "Expect variable name.")?
            .clone();
        let line = name.line;

        let ty = if self.match_kind(TokenKind::Colon) {
            Some(self.type_expression()?)
        } else {
            None
        };

        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.assignment()?)
        } else {
            None
        };

        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Var(VarDecl {
                name,
                ty,
                initializer,
                constant,
            }),
        })
    }

    fn function_declaration(&mut self, kind: FunctionKind) -> PResult<Stmt> {
        let decl = self.function_body(kind)?;
        Ok(Stmt {
            id: decl.id,
            line: decl.line,
            kind: StmtKind::Function(decl),
        })
    }

    fn function_body(&mut self, kind: FunctionKind) -> PResult<Rc<FunctionDecl>> {
        let id = self.node_id();
        let name = match kind {
            FunctionKind::Constructor => self.previous().clone(),
            FunctionKind::Operator => {
                // `operator` keyword already consumed; the operator token follows
                let op = self.advance().clone();
                Token::new(
                    TokenKind::Identifier,
                    format!("operator{}", op.lexeme),
                    op.line,
                )
            }
            _ => self
                .consume(TokenKind::Identifier, "Expect function name.")?
                .clone(),
        };
        let line = name.line;

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let pname = self
                    .consume(TokenKind::Identifier, "Expect parameter name.")?
                    .clone();
                let pty = if self.match_kind(TokenKind::Colon) {
                    Some(self.type_expression()?)
                } else {
                    None
                };
                params.push(Param { name: pname, ty: pty });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;

        let return_type = if self.match_kind(TokenKind::Arrow) {
            Some(self.type_expression()?)
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.")?;
        let body = self.block_statements()?;

        Ok(Rc::new(FunctionDecl {
            id,
            line,
            name,
            params,
            return_type,
            body,
            kind,
        }))
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let name = self
            .consume(TokenKind::Identifier, "Expect class name.")?
            .clone();
        let line = name.line;

        let base = if self.match_kind(TokenKind::Colon) {
            Some(
                self.consume(TokenKind::Identifier, "Expect base class name.")?
                    .clone(),
            )
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if self.match_kind(TokenKind::Var) || self.match_kind(TokenKind::Const) {
                let constant = self.previous().kind == TokenKind::Const;
                let fname = self
                    .consume(TokenKind::Identifier, "Expect field name.")?
                    .clone();
                let fty = if self.match_kind(TokenKind::Colon) {
                    Some(self.type_expression()?)
                } else {
                    None
                };
                // Fields declare storage only; constructors assign values.
                if self.check(TokenKind::Equal) {
                    let tok = self.peek().clone();
                    self.diags.parse_error(
                        tok.line,
                        tok.lexeme,
                        "Fields cannot have initializers; assign in a constructor.",
                    );
                    return Err(ParseError);
                }
                self.consume(TokenKind::Semicolon, "Expect ';' after field declaration.")?;
                fields.push(VarDecl {
                    name: fname,
                    ty: fty,
                    initializer: None,
                    constant,
                });
            } else if self.match_kind(TokenKind::Constructor) {
                methods.push(self.function_body(FunctionKind::Constructor)?);
            } else if self.match_kind(TokenKind::Operator) {
                methods.push(self.function_body(FunctionKind::Operator)?);
            } else {
                methods.push(self.function_body(FunctionKind::Method)?);
            }
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after class body.")?;
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Class(Rc::new(ClassDecl {
                id,
                line,
                name,
                base,
                fields,
                methods,
            })),
        })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_kind(TokenKind::Print) {
            return self.print_statement();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::Foreach) {
            return self.foreach_statement();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            let id = self.node_id();
            let line = self.previous().line;
            let stmts = self.block_statements()?;
            return Ok(Stmt {
                id,
                line,
                kind: StmtKind::Block(stmts),
            });
        }
        self.expression_statement()
    }

    fn block_statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(ParseError) => self.synchronize(),
            }
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")?;
        Ok(stmts)
    }

    fn print_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let line = self.previous().line;
        let value = self.expression()?;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Print(value),
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let keyword = self.previous().clone();
        let line = keyword.line;
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Return { keyword, value },
        })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        let cond = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::While { cond, body },
        })
    }

    /// Parses both `for (init; cond; step)` and `for (name in iterable)`
    fn for_statement(&mut self) -> PResult<Stmt> {
        // Distinguish the foreach form by looking ahead for `identifier in`.
        if self.check(TokenKind::LeftParen)
            && self.check_at(1, TokenKind::Identifier)
            && self.check_at(2, TokenKind::In)
        {
            return self.foreach_statement();
        }

        let id = self.node_id();
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        let init = if self.match_kind(TokenKind::Semicolon) {
            None
        } else if self.match_kind(TokenKind::Var) {
            Some(Box::new(self.var_declaration(false)?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };

        let cond = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;

        let step = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::For {
                init,
                cond,
                step,
                body,
            },
        })
    }

    fn foreach_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let line = self.previous().line;
        self.consume(TokenKind::LeftParen, "Expect '(' after loop keyword.")?;
        let name = self
            .consume(TokenKind::Identifier, "Expect loop variable name.")?
            .clone();
        self.consume(TokenKind::In, "Expect 'in' after loop variable.")?;
        let iterable = self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after iterable.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Foreach {
                name,
                iterable,
                body,
            },
        })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let id = self.node_id();
        let expr = self.expression()?;
        let line = expr.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt {
            id,
            line,
            kind: StmtKind::Expression(expr),
        })
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        self.comma()
    }

    fn comma(&mut self) -> PResult<Expr> {
        let mut expr = self.assignment()?;
        while self.match_kind(TokenKind::Comma) {
            let id = self.node_id();
            let line = self.previous().line;
            let right = self.assignment()?;
            expr = Expr {
                id,
                line,
                kind: ExprKind::Comma {
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.ternary()?;

        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;

            match &expr.kind {
                ExprKind::Variable { .. }
                | ExprKind::Get { .. }
                | ExprKind::Index { .. } => {
                    let id = self.node_id();
                    return Ok(Expr {
                        id,
                        line: equals.line,
                        kind: ExprKind::Assign {
                            target: Box::new(expr),
                            value: Box::new(value),
                        },
                    });
                }
                _ => {
                    self.diags
                        .parse_error(equals.line, equals.lexeme, "Invalid assignment target.");
                }
            }
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let cond = self.or()?;
        if self.match_kind(TokenKind::Question) {
            let id = self.node_id();
            let line = self.previous().line;
            let then_branch = self.assignment()?;
            self.consume(TokenKind::Colon, "Expect ':' in ternary expression.")?;
            let else_branch = self.assignment()?;
            return Ok(Expr {
                id,
                line,
                kind: ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
            });
        }
        Ok(cond)
    }

    fn or(&mut self) -> PResult<Expr> {
        let mut expr = self.and()?;
        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.and()?;
            expr = Expr {
                id,
                line: op.line,
                kind: ExprKind::Logical {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.equality()?;
            expr = Expr {
                id,
                line: op.line,
                kind: ExprKind::Logical {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_any(&[TokenKind::EqualEqual, TokenKind::BangEqual]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.comparison()?;
            expr = self.binary(id, expr, op, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenKind::Less,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
        ]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.term()?;
            expr = self.binary(id, expr, op, right);
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.factor()?;
            expr = self.binary(id, expr, op, right);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.power()?;
        while self.match_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.power()?;
            expr = self.binary(id, expr, op, right);
        }
        Ok(expr)
    }

    fn power(&mut self) -> PResult<Expr> {
        let expr = self.unary()?;
        // Right-associative
        if self.match_kind(TokenKind::StarStar) {
            let op = self.previous().clone();
            let id = self.node_id();
            let right = self.power()?;
            return Ok(self.binary(id, expr, op, right));
        }
        Ok(expr)
    }

    fn binary(&mut self, id: NodeId, left: Expr, op: Token, right: Expr) -> Expr {
        Expr {
            id,
            line: op.line,
            kind: ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.match_any(&[TokenKind::Minus, TokenKind::Bang]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let operand = self.unary()?;
            return Ok(Expr {
                id,
                line: op.line,
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            });
        }
        if self.match_any(&[TokenKind::PlusPlus, TokenKind::MinusMinus]) {
            let op = self.previous().clone();
            let id = self.node_id();
            let target = self.unary()?;
            return Ok(Expr {
                id,
                line: op.line,
                kind: ExprKind::Prefix {
                    op,
                    target: Box::new(target),
                },
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.call()?;
        while self.match_any(&[TokenKind::PlusPlus, TokenKind::MinusMinus]) {
            let op = self.previous().clone();
            let id = self.node_id();
            expr = Expr {
                id,
                line: op.line,
                kind: ExprKind::Postfix {
                    op,
                    target: Box::new(expr),
                },
            };
        }
        Ok(expr)
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::Dot) {
                let name = self
                    .consume(TokenKind::Identifier, "Expect property name after '.'.")?
                    .clone();
                let id = self.node_id();
                expr = Expr {
                    id,
                    line: name.line,
                    kind: ExprKind::Get {
                        object: Box::new(expr),
                        name,
                    },
                };
            } else if self.match_kind(TokenKind::LeftBracket) {
                let bracket = self.previous().clone();
                let id = self.node_id();
                let index = self.assignment()?;
                if self.match_kind(TokenKind::Colon) {
                    let hi = self.assignment()?;
                    self.consume(TokenKind::RightBracket, "Expect ']' after slice.")?;
                    expr = Expr {
                        id,
                        line: bracket.line,
                        kind: ExprKind::Slice {
                            object: Box::new(expr),
                            bracket,
                            lo: Box::new(index),
                            hi: Box::new(hi),
                        },
                    };
                } else {
                    self.consume(TokenKind::RightBracket, "Expect ']' after index.")?;
                    expr = Expr {
                        id,
                        line: bracket.line,
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            bracket,
                            index: Box::new(index),
                        },
                    };
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let paren = self.previous().clone();
        let id = self.node_id();
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() >= 255 {
                    let tok = self.peek().clone();
                    self.diags.parse_error(
                        tok.line,
                        tok.lexeme,
                        "Can't have more than 255 arguments.",
                    );
                }
                args.push(self.assignment()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr {
            id,
            line: paren.line,
            kind: ExprKind::Call {
                callee: Box::new(callee),
                paren,
                args,
            },
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let id = self.node_id();

        if self.match_any(&[
            TokenKind::IntegerLiteral,
            TokenKind::FloatingLiteral,
            TokenKind::StringLiteral,
            TokenKind::True,
            TokenKind::False,
            TokenKind::Nil,
        ]) {
            let token = self.previous().clone();
            let literal = token.literal.clone().unwrap_or(Literal::Nil);
            return Ok(Expr {
                id,
                line: token.line,
                kind: ExprKind::Literal(literal),
            });
        }

        if self.match_kind(TokenKind::This) {
            let keyword = self.previous().clone();
            return Ok(Expr {
                id,
                line: keyword.line,
                kind: ExprKind::This { keyword },
            });
        }

        if self.match_kind(TokenKind::Base) {
            let keyword = self.previous().clone();
            self.consume(TokenKind::Dot, "Expect '.' after 'base'.")?;
            let member = self
                .consume(TokenKind::Identifier, "Expect member name after 'base.'.")?
                .clone();
            return Ok(Expr {
                id,
                line: keyword.line,
                kind: ExprKind::Base { keyword, member },
            });
        }

        if self.match_kind(TokenKind::Identifier) {
            let name = self.previous().clone();
            return Ok(Expr {
                id,
                line: name.line,
                kind: ExprKind::Variable { name },
            });
        }

        if self.match_kind(TokenKind::LeftParen) {
            let line = self.previous().line;
            let inner = self.expression()?;
            self.consume(TokenKind::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr {
                id,
                line,
                kind: ExprKind::Grouping(Box::new(inner)),
            });
        }

        if self.match_kind(TokenKind::LeftBracket) {
            let bracket = self.previous().clone();
            let mut elements = Vec::new();
            if !self.check(TokenKind::RightBracket) {
                loop {
                    elements.push(self.assignment()?);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBracket, "Expect ']' after list elements.")?;
            return Ok(Expr {
                id,
                line: bracket.line,
                kind: ExprKind::List { bracket, elements },
            });
        }

        if self.match_kind(TokenKind::LeftBrace) {
            let brace = self.previous().clone();
            let mut entries = Vec::new();
            if !self.check(TokenKind::RightBrace) {
                loop {
                    let key = self.assignment()?;
                    self.consume(TokenKind::Colon, "Expect ':' after map key.")?;
                    let value = self.assignment()?;
                    entries.push((key, value));
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenKind::RightBrace, "Expect '}' after map entries.")?;
            return Ok(Expr {
                id,
                line: brace.line,
                kind: ExprKind::Map { brace, entries },
            });
        }

        let tok = self.peek().clone();
        self.diags
            .parse_error(tok.line, tok.lexeme, "Expect expression.");
        Err(ParseError)
    }

    // ---- type expressions ----

    fn type_expression(&mut self) -> PResult<TypeExpr> {
        // Union alternatives are separated by `or` in type position.
        let mut first = self.type_atom()?;
        if self.check(TokenKind::Or) {
            let mut variants = vec![first];
            while self.match_kind(TokenKind::Or) {
                variants.push(self.type_atom()?);
            }
            let line = variants[0].line;
            first = TypeExpr {
                line,
                kind: TypeExprKind::Union(variants),
            };
        }
        Ok(first)
    }

    fn type_atom(&mut self) -> PResult<TypeExpr> {
        let name = self
            .consume(TokenKind::Identifier, "Expect type name.")?
            .clone();
        let line = name.line;

        if name.lexeme == "list" && self.match_kind(TokenKind::Less) {
            let element = self.type_expression()?;
            self.consume(TokenKind::Greater, "Expect '>' after list element type.")?;
            return Ok(TypeExpr {
                line,
                kind: TypeExprKind::List(Box::new(element)),
            });
        }
        if name.lexeme == "map" && self.match_kind(TokenKind::Less) {
            let key = self.type_expression()?;
            self.consume(TokenKind::Comma, "Expect ',' between map key and value types.")?;
            let value = self.type_expression()?;
            self.consume(TokenKind::Greater, "Expect '>' after map value type.")?;
            return Ok(TypeExpr {
                line,
                kind: TypeExprKind::Map(Box::new(key), Box::new(value)),
            });
        }

        Ok(TypeExpr {
            line,
            kind: TypeExprKind::Named(name),
        })
    }

    // ---- plumbing ----

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::Foreach
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<&Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let tok = self.peek().clone();
        self.diags.parse_error(tok.line, tok.lexeme, message);
        Err(ParseError)
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.check(kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_at(&self, offset: usize, kind: TokenKind) -> bool {
        self.tokens
            .get(self.current + offset)
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::print_program;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> (Vec<Stmt>, DiagnosticSink) {
        let mut diags = DiagnosticSink::new();
        let tokens = Lexer::new(source).scan_tokens(&mut diags);
        let stmts = Parser::new(tokens, &mut diags).parse();
        (stmts, diags)
    }

    fn printed(source: &str) -> String {
        let (stmts, diags) = parse(source);
        assert!(!diags.had_error(), "{:?}", diags.diagnostics());
        print_program(&stmts)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(printed("print 1 + 2 * 3;"), "(print (+ 1 (* 2 3)))\n");
        assert_eq!(printed("print 2 ** 3 ** 2;"), "(print (** 2 (** 3 2)))\n");
        assert_eq!(printed("print 1 + 2, 3;"), "(print (, (+ 1 2) 3))\n");
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            printed("print a ? 1 : 2;"),
            "(print (?: a 1 2))\n"
        );
    }

    #[test]
    fn test_prefix_postfix() {
        assert_eq!(printed("a++;"), "(expr (postfix++ a))\n");
        assert_eq!(printed("++a;"), "(expr (prefix++ a))\n");
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            printed("var xs = [1, 2, 3];"),
            "(var xs (list 1 2 3))\n"
        );
        assert_eq!(
            printed("var m = {\"k\": 1};"),
            "(var m (map \"k\":1))\n"
        );
        assert_eq!(printed("xs[0] = 1;"), "(expr (= ([] xs 0) 1))\n");
        assert_eq!(printed("print xs[1:2];"), "(print ([:] xs 1 2))\n");
    }

    #[test]
    fn test_foreach_both_spellings() {
        assert_eq!(
            printed("for (x in xs) print x;"),
            "(foreach x xs (print x))\n"
        );
        assert_eq!(
            printed("foreach (x in xs) print x;"),
            "(foreach x xs (print x))\n"
        );
    }

    #[test]
    fn test_class_with_base_and_operator() {
        let out = printed("class B : A { var x; constructor(v) { } operator+(o) { } say() { } }");
        assert!(out.contains("(class B : A"));
        assert!(out.contains("(field x)"));
        assert!(out.contains("(fun constructor"));
        assert!(out.contains("(fun operator+"));
        assert!(out.contains("(fun say"));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let (_, diags) = parse("1 = 2;");
        assert!(diags.had_error());
    }

    #[test]
    fn test_synchronization_surfaces_later_errors() {
        let (_, diags) = parse("var ; print 1;\nvar ;");
        let count = diags.diagnostics().len();
        assert!(count >= 2, "expected both errors, got {}", count);
    }
}
