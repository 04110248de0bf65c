#![forbid(unsafe_code)]

use std::mem;

use labelflow_ast::{
    join, span_between, AssignOp, BinOp, Binding, BindingMeta, Block, CatchClause, DoWhileStmt,
    Expr, ExprKind, ExprStmt, ForInStmt, ForInTarget, ForInit, ForStmt, Function, FunctionBody,
    Ident, IfStmt, MemberProp, Pattern, PatternProp, Program, PropKey, Property, ReturnSite,
    ReturnStmt, Span, Stmt, SwitchCase, SwitchStmt, ThrowStmt, TryStmt, UnaryOp, UpdateOp,
    VarDecl, VarDeclarator, VarKind, WhileStmt,
};
use labelflow_lex::{Token, TokenKind};

use crate::error::ParseError;
use crate::grammar::Grammar;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    grammar: &'a dyn Grammar,
    next_site: u32,
    /// Inside a `for (...)` head, where `in` ends an expression.
    no_in: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], grammar: &'a dyn Grammar) -> Self {
        Self {
            tokens,
            idx: 0,
            grammar,
            next_site: 0,
            no_in: false,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at(TokenKind::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program {
            body,
            comments: Vec::new(),
        })
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(TokenKind::Eof) {
            return Err(self.error_here("unexpected trailing input"));
        }
        Ok(expr)
    }

    // --- Hook dispatch ---------------------------------------------------------

    pub fn statement(&mut self) -> Result<Stmt, ParseError> {
        let grammar = self.grammar;
        grammar.parse_statement(self)
    }

    pub fn binding_atom(&mut self) -> Result<Pattern, ParseError> {
        let grammar = self.grammar;
        grammar.parse_binding_atom(self)
    }

    pub fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let grammar = self.grammar;
        grammar.parse_expr_atom(self)
    }

    pub fn postfix(&mut self, expr: Expr) -> Result<Expr, ParseError> {
        let grammar = self.grammar;
        grammar.parse_postfix(self, expr)
    }

    pub fn function_params(&mut self, func: &mut Function) -> Result<(), ParseError> {
        let grammar = self.grammar;
        grammar.parse_function_params(self, func)
    }

    pub fn function_body(&mut self, func: &mut Function) -> Result<(), ParseError> {
        let grammar = self.grammar;
        grammar.parse_function_body(self, func)
    }

    // --- Statements -------------------------------------------------------------

    pub fn base_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.here();
        let Some(kind) = self.peek_kind() else {
            return Err(self.error_here("unexpected end of input"));
        };

        match kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semi => {
                self.expect_any()?;
                Ok(Stmt::Empty(start))
            }
            TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst => {
                let mut decl = self.parse_var_decl()?;
                self.consume_semicolon()?;
                decl.span = join(start, self.prev_span());
                Ok(Stmt::Var(decl))
            }
            TokenKind::KwFunction => {
                self.expect_any()?;
                let name = self.expect_ident()?;
                let func = self.parse_function_rest(start, Some(name), false)?;
                Ok(Stmt::Function(func))
            }
            TokenKind::KwReturn => {
                self.expect_any()?;
                let argument = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(ReturnStmt {
                    span: join(start, self.prev_span()),
                    argument,
                    site: self.fresh_return_site(),
                }))
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwWhile => {
                self.expect_any()?;
                let test = self.parse_paren_expr()?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While(WhileStmt {
                    span: join(start, body.span()),
                    test,
                    body,
                }))
            }
            TokenKind::KwDo => {
                self.expect_any()?;
                let body = Box::new(self.statement()?);
                self.expect(TokenKind::KwWhile)?;
                let test = self.parse_paren_expr()?;
                self.eat(TokenKind::Semi);
                Ok(Stmt::DoWhile(DoWhileStmt {
                    span: join(start, self.prev_span()),
                    body,
                    test,
                }))
            }
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwThrow => {
                self.expect_any()?;
                if self.newline_before() {
                    return Err(self.error_here("illegal line break after 'throw'"));
                }
                let argument = self.parse_expr()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(ThrowStmt {
                    span: join(start, self.prev_span()),
                    argument,
                }))
            }
            TokenKind::KwBreak | TokenKind::KwContinue => {
                let tok = self.expect_any()?;
                self.consume_semicolon()?;
                let span = join(start, self.prev_span());
                Ok(if tok.kind == TokenKind::KwBreak {
                    Stmt::Break(span)
                } else {
                    Stmt::Continue(span)
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(ExprStmt {
                    span: join(expr.span, self.prev_span()),
                    expr,
                }))
            }
        }
    }

    pub fn parse_block(&mut self) -> Result<Block, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.error_here("unexpected end of input; expected '}'"));
            }
            stmts.push(self.statement()?);
        }
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Block {
            span: join(open.span, close.span),
            stmts,
        })
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let kw = self.expect_any()?;
        let kind = match kw.kind {
            TokenKind::KwLet => VarKind::Let,
            TokenKind::KwConst => VarKind::Const,
            _ => VarKind::Var,
        };

        let mut decls = Vec::new();
        loop {
            let target = self.binding_atom()?;
            if let Some(this) = target.find_this() {
                return Err(ParseError {
                    message: "a 'this' annotation is only allowed in a parameter list".to_string(),
                    span: this.span,
                });
            }
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            let span = match &init {
                Some(e) => join(target.span(), e.span),
                None => target.span(),
            };
            decls.push(VarDeclarator { span, target, init });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(VarDecl {
            span: join(kw.span, self.prev_span()),
            kind,
            decls,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwIf)?;
        let test = self.parse_paren_expr()?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat(TokenKind::KwElse) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        let end = alternate.as_ref().map_or(consequent.span(), |a| a.span());
        Ok(Stmt::If(IfStmt {
            span: join(kw.span, end),
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwFor)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.at(TokenKind::Semi) {
            None
        } else if matches!(
            self.peek_kind(),
            Some(TokenKind::KwVar | TokenKind::KwLet | TokenKind::KwConst)
        ) {
            let saved = mem::replace(&mut self.no_in, true);
            let decl = self.parse_var_decl();
            self.no_in = saved;
            let mut decl = decl?;

            if self.at_for_in() && decl.decls.len() == 1 && decl.decls[0].init.is_none() {
                let target = ForInTarget::Var {
                    kind: decl.kind,
                    target: decl.decls.remove(0).target,
                };
                return self.parse_for_in_rest(kw.span, target);
            }
            Some(ForInit::Var(decl))
        } else {
            let saved = mem::replace(&mut self.no_in, true);
            let expr = self.parse_expr();
            self.no_in = saved;
            let expr = expr?;

            if self.at_for_in() {
                if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
                    return Err(ParseError {
                        message: "invalid left-hand side in for-in loop".to_string(),
                        span: expr.span,
                    });
                }
                return self.parse_for_in_rest(kw.span, ForInTarget::Expr(expr));
            }
            Some(ForInit::Expr(expr))
        };

        self.expect(TokenKind::Semi)?;
        let test = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;
        let update = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::For(ForStmt {
            span: join(kw.span, body.span()),
            init,
            test,
            update,
            body,
        }))
    }

    fn at_for_in(&self) -> bool {
        self.at(TokenKind::KwIn) || matches!(self.peek_kind(), Some(TokenKind::Ident(n)) if n == "of")
    }

    fn parse_for_in_rest(&mut self, start: Span, target: ForInTarget) -> Result<Stmt, ParseError> {
        let of = !self.at(TokenKind::KwIn);
        self.expect_any()?;
        let object = if of {
            self.parse_assign_expr()?
        } else {
            self.parse_expr()?
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::ForIn(ForInStmt {
            span: join(start, body.span()),
            target,
            of,
            object,
            body,
        }))
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwSwitch)?;
        let discriminant = self.parse_paren_expr()?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.at(TokenKind::RBrace) {
            let start = self.here();
            let test = if self.eat(TokenKind::KwCase) {
                Some(self.parse_expr()?)
            } else if self.at(TokenKind::KwDefault) {
                let tok = self.expect_any()?;
                if seen_default {
                    return Err(ParseError {
                        message: "more than one 'default' clause in switch".to_string(),
                        span: tok.span,
                    });
                }
                seen_default = true;
                None
            } else {
                return Err(self.error_here("expected 'case' or 'default'"));
            };
            self.expect(TokenKind::Colon)?;

            let mut body = Vec::new();
            while !matches!(
                self.peek_kind(),
                Some(TokenKind::KwCase | TokenKind::KwDefault | TokenKind::RBrace | TokenKind::Eof)
            ) {
                body.push(self.statement()?);
            }
            cases.push(SwitchCase {
                span: join(start, self.prev_span()),
                test,
                body,
            });
        }
        let close = self.expect(TokenKind::RBrace)?;

        Ok(Stmt::Switch(SwitchStmt {
            span: join(kw.span, close.span),
            discriminant,
            cases,
        }))
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect(TokenKind::KwTry)?;
        let block = self.parse_block()?;

        let handler = if self.at(TokenKind::KwCatch) {
            let catch_kw = self.expect_any()?;
            let param = if self.eat(TokenKind::LParen) {
                let param = self.binding_atom()?;
                if let Some(this) = param.find_this() {
                    return Err(ParseError {
                        message: "a 'this' annotation is only allowed in a parameter list".to_string(),
                        span: this.span,
                    });
                }
                self.expect(TokenKind::RParen)?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause {
                span: join(catch_kw.span, body.span),
                param,
                body,
            })
        } else {
            None
        };

        let finalizer = if self.eat(TokenKind::KwFinally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("missing 'catch' or 'finally' after 'try' block"));
        }

        Ok(Stmt::Try(TryStmt {
            span: join(kw.span, self.prev_span()),
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    // --- Bindings and functions ------------------------------------------------

    pub fn base_binding_atom(&mut self) -> Result<Pattern, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) => self.parse_array_pattern(),
            Some(TokenKind::LBrace) => self.parse_object_pattern(),
            _ => {
                let name = self.expect_ident()?;
                Ok(Pattern::Ident(Binding {
                    span: name.span,
                    name,
                    meta: BindingMeta::default(),
                }))
            }
        }
    }

    /// A binding target with an optional `= default`.
    pub fn parse_binding_element(&mut self) -> Result<Pattern, ParseError> {
        let target = self.binding_atom()?;
        if !self.eat(TokenKind::Eq) {
            return Ok(target);
        }
        let default = self.parse_assign_expr()?;
        Ok(Pattern::Assign {
            span: join(target.span(), default.span),
            target: Box::new(target),
            default,
        })
    }

    fn parse_rest_element(&mut self) -> Result<Pattern, ParseError> {
        let dots = self.expect(TokenKind::Ellipsis)?;
        let target = self.binding_atom()?;
        Ok(Pattern::Rest {
            span: join(dots.span, target.span()),
            target: Box::new(target),
        })
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, ParseError> {
        let open = self.expect(TokenKind::LBracket)?;
        let mut elems = Vec::new();
        while !self.at(TokenKind::RBracket) {
            if self.eat(TokenKind::Comma) {
                elems.push(None);
                continue;
            }
            if self.at(TokenKind::Ellipsis) {
                elems.push(Some(self.parse_rest_element()?));
            } else {
                elems.push(Some(self.parse_binding_element()?));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(TokenKind::RBracket)?;
        Ok(Pattern::Array {
            span: join(open.span, close.span),
            elems,
        })
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut props = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Ellipsis) {
                props.push(PatternProp::Rest(self.parse_rest_element()?));
            } else {
                let key = self.parse_prop_key()?;
                if self.eat(TokenKind::Colon) {
                    let value = self.parse_binding_element()?;
                    props.push(PatternProp::KeyValue { key, value });
                } else {
                    let PropKey::Ident(name) = key else {
                        return Err(self.error_here("expected ':' after property key in pattern"));
                    };
                    let default = if self.eat(TokenKind::Eq) {
                        Some(self.parse_assign_expr()?)
                    } else {
                        None
                    };
                    props.push(PatternProp::Shorthand {
                        binding: Binding {
                            span: name.span,
                            name,
                            meta: BindingMeta::default(),
                        },
                        default,
                    });
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Pattern::Object {
            span: join(open.span, close.span),
            props,
        })
    }

    pub fn base_function_params(&mut self, func: &mut Function) -> Result<(), ParseError> {
        self.expect(TokenKind::LParen)?;
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Ellipsis) {
                func.params.push(self.parse_rest_element()?);
            } else {
                func.params.push(self.parse_binding_element()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(())
    }

    pub fn base_function_body(&mut self, func: &mut Function) -> Result<(), ParseError> {
        func.body = if func.is_arrow && !self.at(TokenKind::LBrace) {
            FunctionBody::Expr(Box::new(self.parse_assign_expr()?))
        } else {
            FunctionBody::Block(self.parse_block()?)
        };
        Ok(())
    }

    /// Parses a function from its parameter list onward; `start` is where the function began.
    pub fn parse_function_rest(
        &mut self,
        start: Span,
        name: Option<Ident>,
        is_arrow: bool,
    ) -> Result<Function, ParseError> {
        let saved = mem::replace(&mut self.no_in, false);
        let mut func = Function::new(start, name, is_arrow);
        let result = self.parse_function_parts(&mut func);
        self.no_in = saved;
        result?;
        func.span = join(start, self.prev_span());
        Ok(func)
    }

    fn parse_function_parts(&mut self, func: &mut Function) -> Result<(), ParseError> {
        self.function_params(func)?;
        if func.is_arrow {
            if self.newline_before() && self.at(TokenKind::Arrow) {
                return Err(self.error_here("line break before '=>'"));
            }
            self.expect(TokenKind::Arrow)?;
        }
        self.function_body(func)
    }

    /// `x => body`, with the cursor on `x`.
    fn parse_ident_arrow(&mut self) -> Result<Expr, ParseError> {
        let start = self.here();
        let name = self.expect_ident()?;
        let saved = mem::replace(&mut self.no_in, false);
        let mut func = Function::new(start, None, true);
        func.params.push(Pattern::Ident(Binding {
            span: name.span,
            name,
            meta: BindingMeta::default(),
        }));
        let result = self
            .expect(TokenKind::Arrow)
            .and_then(|_| self.function_body(&mut func));
        self.no_in = saved;
        result?;
        func.span = join(start, self.prev_span());
        Ok(Expr::new(func.span, ExprKind::Function(Box::new(func))))
    }

    /// Whether the `(` under the cursor opens an arrow function parameter list.
    fn at_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        for (i, tok) in self.tokens[self.idx..].iter().enumerate() {
            match tok.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(self.idx + i + 1)
                            .is_some_and(|t| t.kind == TokenKind::Arrow && !t.newline_before);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    // --- Expressions ------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_assign_expr()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_assign_expr()?);
        }
        let span = join(items[0].span, items[items.len() - 1].span);
        Ok(Expr::new(span, ExprKind::Sequence(items)))
    }

    pub fn parse_assign_expr(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_conditional_expr()?;
        let Some(op) = self.peek_kind().and_then(assign_op) else {
            return Ok(target);
        };
        if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
            return Err(ParseError {
                message: "invalid assignment target".to_string(),
                span: target.span,
            });
        }
        self.expect_any()?;
        let value = self.parse_assign_expr()?;
        Ok(Expr::new(
            join(target.span, value.span),
            ExprKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
        ))
    }

    pub fn parse_conditional_expr(&mut self) -> Result<Expr, ParseError> {
        let test = self.parse_binary_expr(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(test);
        }
        let saved = mem::replace(&mut self.no_in, false);
        let consequent = self.parse_assign_expr();
        self.no_in = saved;
        let consequent = consequent?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assign_expr()?;
        Ok(Expr::new(
            join(test.span, alternate.span),
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        ))
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let Some((op, prec)) = self.peek_binop() else { break };
            if prec < min_prec {
                break;
            }
            self.expect_any()?;
            // `**` is right-associative.
            let next_min = if op == BinOp::Pow { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min)?;
            left = Expr::new(
                join(left.span, right.span),
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn peek_binop(&self) -> Option<(BinOp, u8)> {
        Some(match self.peek_kind()? {
            TokenKind::OrOr => (BinOp::Or, 1),
            TokenKind::AndAnd => (BinOp::And, 2),
            TokenKind::Pipe => (BinOp::BitOr, 3),
            TokenKind::Caret => (BinOp::BitXor, 4),
            TokenKind::Amp => (BinOp::BitAnd, 5),
            TokenKind::EqEq => (BinOp::Eq, 6),
            TokenKind::Neq => (BinOp::Ne, 6),
            TokenKind::EqEqEq => (BinOp::StrictEq, 6),
            TokenKind::NeqEq => (BinOp::StrictNe, 6),
            TokenKind::Lt => (BinOp::Lt, 7),
            TokenKind::Gt => (BinOp::Gt, 7),
            TokenKind::Le => (BinOp::Le, 7),
            TokenKind::Ge => (BinOp::Ge, 7),
            TokenKind::KwInstanceof => (BinOp::Instanceof, 7),
            TokenKind::KwIn if !self.no_in => (BinOp::In, 7),
            TokenKind::Shl => (BinOp::Shl, 8),
            TokenKind::Shr => (BinOp::Shr, 8),
            TokenKind::UShr => (BinOp::UShr, 8),
            TokenKind::Plus => (BinOp::Add, 9),
            TokenKind::Minus => (BinOp::Sub, 9),
            TokenKind::Star => (BinOp::Mul, 10),
            TokenKind::Slash => (BinOp::Div, 10),
            TokenKind::Percent => (BinOp::Rem, 10),
            TokenKind::StarStar => (BinOp::Pow, 11),
            _ => return None,
        })
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Tilde) => Some(UnaryOp::BitNot),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Plus) => Some(UnaryOp::Plus),
            Some(TokenKind::KwTypeof) => Some(UnaryOp::Typeof),
            Some(TokenKind::KwVoid) => Some(UnaryOp::Void),
            Some(TokenKind::KwDelete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            let t = self.expect_any()?;
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::new(
                join(t.span, expr.span),
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            ));
        }

        if let Some(op) = self.peek_kind().and_then(update_op) {
            let t = self.expect_any()?;
            let expr = self.parse_unary_expr()?;
            check_update_target(&expr)?;
            return Ok(Expr::new(
                join(t.span, expr.span),
                ExprKind::Update {
                    op,
                    prefix: true,
                    expr: Box::new(expr),
                },
            ));
        }

        let expr = self.parse_lhs_expr()?;
        self.postfix(expr)
    }

    pub fn base_postfix(&mut self, expr: Expr) -> Result<Expr, ParseError> {
        let Some(op) = self.peek_kind().and_then(update_op) else {
            return Ok(expr);
        };
        if self.newline_before() {
            return Ok(expr);
        }
        check_update_target(&expr)?;
        let t = self.expect_any()?;
        Ok(Expr::new(
            join(expr.span, t.span),
            ExprKind::Update {
                op,
                prefix: false,
                expr: Box::new(expr),
            },
        ))
    }

    fn parse_lhs_expr(&mut self) -> Result<Expr, ParseError> {
        let expr = if self.at(TokenKind::KwNew) {
            self.parse_new_expr()?
        } else {
            self.parse_primary_expr()?
        };
        self.parse_member_tail(expr, true)
    }

    fn parse_new_expr(&mut self) -> Result<Expr, ParseError> {
        let kw = self.expect(TokenKind::KwNew)?;
        let callee = if self.at(TokenKind::KwNew) {
            self.parse_new_expr()?
        } else {
            self.parse_primary_expr()?
        };
        let callee = self.parse_member_tail(callee, false)?;
        let args = if self.eat(TokenKind::LParen) {
            self.parse_expr_list(TokenKind::RParen)?
        } else {
            Vec::new()
        };
        Ok(Expr::new(
            join(kw.span, self.prev_span()),
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        ))
    }

    /// Member accesses (and calls when `allow_call`) following `expr`.
    pub fn parse_member_tail(&mut self, mut expr: Expr, allow_call: bool) -> Result<Expr, ParseError> {
        loop {
            if self.eat(TokenKind::Dot) {
                let name = self.expect_property_name()?;
                expr = Expr::new(
                    join(expr.span, name.span),
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: MemberProp::Named(name),
                    },
                );
            } else if self.eat(TokenKind::LBracket) {
                let saved = mem::replace(&mut self.no_in, false);
                let prop = self.parse_expr();
                self.no_in = saved;
                let prop = prop?;
                let close = self.expect(TokenKind::RBracket)?;
                expr = Expr::new(
                    join(expr.span, close.span),
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(prop)),
                    },
                );
            } else if allow_call && self.eat(TokenKind::LParen) {
                let args = self.parse_expr_list(TokenKind::RParen)?;
                expr = Expr::new(
                    join(expr.span, self.prev_span()),
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions (with spread and a trailing comma) up to and including `close`.
    pub fn parse_expr_list(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let saved = mem::replace(&mut self.no_in, false);
        let result = self.parse_expr_list_inner(close);
        self.no_in = saved;
        result
    }

    fn parse_expr_list_inner(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.at(close.clone()) {
            items.push(self.parse_spread_or_assign()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_spread_or_assign(&mut self) -> Result<Expr, ParseError> {
        if !self.at(TokenKind::Ellipsis) {
            return self.parse_assign_expr();
        }
        let dots = self.expect_any()?;
        let expr = self.parse_assign_expr()?;
        Ok(Expr::new(join(dots.span, expr.span), ExprKind::Spread(Box::new(expr))))
    }

    pub fn base_expr_atom(&mut self) -> Result<Expr, ParseError> {
        let tok = self.peek().cloned().ok_or_else(|| self.error_here("unexpected end of input"))?;

        let ident_like = match &tok.kind {
            TokenKind::Ident(name) => Some(name.clone()),
            other => other.contextual_name().map(str::to_string),
        };
        if let Some(name) = ident_like {
            if self
                .peek_token_n(1)
                .is_some_and(|t| t.kind == TokenKind::Arrow && !t.newline_before)
            {
                return self.parse_ident_arrow();
            }
            self.expect_any()?;
            return Ok(Expr::new(tok.span, ExprKind::Ident(Ident::new(tok.span, name))));
        }

        let simple = match &tok.kind {
            TokenKind::KwThis => Some(ExprKind::This),
            TokenKind::KwNull => Some(ExprKind::Null),
            TokenKind::KwTrue => Some(ExprKind::Bool(true)),
            TokenKind::KwFalse => Some(ExprKind::Bool(false)),
            TokenKind::Number(n) => Some(ExprKind::Number(n.clone())),
            TokenKind::String(s) => Some(ExprKind::Str(s.clone())),
            TokenKind::Regex { pattern, flags } => Some(ExprKind::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            }),
            _ => None,
        };
        if let Some(kind) = simple {
            self.expect_any()?;
            return Ok(Expr::new(tok.span, kind));
        }

        match tok.kind {
            TokenKind::LParen => {
                if self.at_arrow_params() {
                    let func = self.parse_function_rest(tok.span, None, true)?;
                    return Ok(Expr::new(func.span, ExprKind::Function(Box::new(func))));
                }
                self.expect_any()?;
                let saved = mem::replace(&mut self.no_in, false);
                let inner = self.parse_expr();
                self.no_in = saved;
                let inner = inner?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::KwFunction => {
                self.expect_any()?;
                let name = if self.at_ident() {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                let func = self.parse_function_rest(tok.span, name, false)?;
                Ok(Expr::new(func.span, ExprKind::Function(Box::new(func))))
            }
            _ => Err(ParseError {
                message: format!("unexpected {}", describe(&tok.kind)),
                span: tok.span,
            }),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(TokenKind::LBracket)?;
        let saved = mem::replace(&mut self.no_in, false);
        let elems = self.parse_array_elems();
        self.no_in = saved;
        let elems = elems?;
        let close = self.expect(TokenKind::RBracket)?;
        Ok(Expr::new(join(open.span, close.span), ExprKind::Array(elems)))
    }

    fn parse_array_elems(&mut self) -> Result<Vec<Option<Expr>>, ParseError> {
        let mut elems = Vec::new();
        while !self.at(TokenKind::RBracket) {
            if self.eat(TokenKind::Comma) {
                elems.push(None);
                continue;
            }
            elems.push(Some(self.parse_spread_or_assign()?));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(elems)
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        let saved = mem::replace(&mut self.no_in, false);
        let props = self.parse_object_props();
        self.no_in = saved;
        let props = props?;
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Expr::new(join(open.span, close.span), ExprKind::Object(props)))
    }

    fn parse_object_props(&mut self) -> Result<Vec<Property>, ParseError> {
        let mut props = Vec::new();
        while !self.at(TokenKind::RBrace) {
            if self.eat(TokenKind::Ellipsis) {
                props.push(Property::Spread(self.parse_assign_expr()?));
            } else {
                let key_span = self.here();
                let key = self.parse_prop_key()?;
                if self.eat(TokenKind::Colon) {
                    let value = self.parse_assign_expr()?;
                    props.push(Property::KeyValue { key, value });
                } else if self.at(TokenKind::LParen) {
                    let func = self.parse_function_rest(key_span, None, false)?;
                    props.push(Property::Method {
                        key,
                        func: Box::new(func),
                    });
                } else if let PropKey::Ident(name) = key {
                    props.push(Property::Shorthand(name));
                } else {
                    return Err(self.error_here("expected ':' after property key"));
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(props)
    }

    fn parse_prop_key(&mut self) -> Result<PropKey, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::String(s) => Ok(PropKey::Str(s)),
            TokenKind::Number(n) => Ok(PropKey::Number(n)),
            TokenKind::LBracket => {
                let expr = self.parse_assign_expr()?;
                self.expect(TokenKind::RBracket)?;
                Ok(PropKey::Computed(expr))
            }
            TokenKind::Ident(name) => Ok(PropKey::Ident(Ident::new(tok.span, name))),
            other => match other.keyword_text() {
                Some(text) => Ok(PropKey::Ident(Ident::new(tok.span, text.to_string()))),
                None => Err(ParseError {
                    message: format!("expected property key, found {}", describe(&other)),
                    span: tok.span,
                }),
            },
        }
    }

    // --- Token cursor -----------------------------------------------------------

    pub fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Semi) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.error_here("expected ';'"))
        }
    }

    /// Automatic semicolon insertion point: `}`, end of input, or a preceding line break.
    pub fn at_statement_end(&self) -> bool {
        self.at(TokenKind::Semi)
            || self.at(TokenKind::RBrace)
            || self.at(TokenKind::Eof)
            || self.newline_before()
    }

    pub fn fresh_return_site(&mut self) -> ReturnSite {
        let site = ReturnSite(self.next_site);
        self.next_site += 1;
        site
    }

    pub fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.here(),
        }
    }

    pub fn at_ident(&self) -> bool {
        self.peek_kind()
            .is_some_and(|k| matches!(k, TokenKind::Ident(_)) || k.contextual_name().is_some())
    }

    /// An identifier; annotation keywords count as identifiers here.
    pub fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident::new(tok.span, name)),
            other => match other.contextual_name() {
                Some(name) => Ok(Ident::new(tok.span, name.to_string())),
                None => Err(ParseError {
                    message: format!("expected identifier, found {}", describe(&other)),
                    span: tok.span,
                }),
            },
        }
    }

    /// A property name after `.`, where reserved words are allowed.
    pub fn expect_property_name(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident::new(tok.span, name)),
            other => match other.keyword_text() {
                Some(text) => Ok(Ident::new(tok.span, text.to_string())),
                None => Err(ParseError {
                    message: format!("expected property name, found {}", describe(&other)),
                    span: tok.span,
                }),
            },
        }
    }

    pub fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {}, found {}", describe(&expected), describe(&tok.kind)),
                span: tok.span,
            })
        }
    }

    pub fn expect_any(&mut self) -> Result<Token, ParseError> {
        let Some(tok) = self.tokens.get(self.idx) else {
            return Err(ParseError {
                message: "unexpected end of input".to_string(),
                span: self.prev_span(),
            });
        };
        if tok.kind == TokenKind::Eof {
            return Err(ParseError {
                message: "unexpected end of input".to_string(),
                span: tok.span,
            });
        }
        self.idx += 1;
        Ok(tok.clone())
    }

    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    pub fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    pub fn peek(&self) -> Option<&'a Token> {
        let tokens: &'a [Token] = self.tokens;
        tokens.get(self.idx)
    }

    pub fn peek_token_n(&self, n: usize) -> Option<&'a Token> {
        let tokens: &'a [Token] = self.tokens;
        tokens.get(self.idx + n)
    }

    pub fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub fn peek_kind_n(&self, n: usize) -> Option<&'a TokenKind> {
        self.peek_token_n(n).map(|t| &t.kind)
    }

    pub fn peek_span(&self) -> Option<Span> {
        self.tokens.get(self.idx).map(|t| t.span)
    }

    /// A line break separates the current token from the previous one.
    pub fn newline_before(&self) -> bool {
        self.peek().is_some_and(|t| t.newline_before)
    }

    /// Span of the current token (end of input when exhausted).
    pub fn here(&self) -> Span {
        self.peek_span().unwrap_or_else(|| self.prev_span())
    }

    /// Span of the most recently consumed token.
    pub fn prev_span(&self) -> Span {
        self.idx
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| span_between(0, 0), |t| t.span)
    }
}

fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        TokenKind::PercentEq => AssignOp::Rem,
        TokenKind::ShlEq => AssignOp::Shl,
        TokenKind::ShrEq => AssignOp::Shr,
        TokenKind::UShrEq => AssignOp::UShr,
        TokenKind::AmpEq => AssignOp::BitAnd,
        TokenKind::PipeEq => AssignOp::BitOr,
        TokenKind::CaretEq => AssignOp::BitXor,
        _ => return None,
    })
}

fn update_op(kind: &TokenKind) -> Option<UpdateOp> {
    match kind {
        TokenKind::PlusPlus => Some(UpdateOp::Incr),
        TokenKind::MinusMinus => Some(UpdateOp::Decr),
        _ => None,
    }
}

fn check_update_target(expr: &Expr) -> Result<(), ParseError> {
    if matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
        Ok(())
    } else {
        Err(ParseError {
            message: "invalid increment/decrement operand".to_string(),
            span: expr.span,
        })
    }
}

/// Human-readable token name for diagnostics.
fn describe(kind: &TokenKind) -> String {
    let text = match kind {
        TokenKind::Ident(name) => return format!("identifier '{name}'"),
        TokenKind::Number(n) => return format!("number '{n}'"),
        TokenKind::String(_) => return "string literal".to_string(),
        TokenKind::Regex { .. } => return "regular expression".to_string(),
        TokenKind::Eof => return "end of input".to_string(),
        TokenKind::LabelOpen => "<!",
        TokenKind::LabelClose => "!>",
        TokenKind::ShapeSpecified => ":S",
        TokenKind::ShapeAll => ":A",
        TokenKind::ShapeNum => ":E",
        TokenKind::ThisAnnot => ":this",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::Semi => ";",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Ellipsis => "...",
        TokenKind::Question => "?",
        TokenKind::Colon => ":",
        TokenKind::Arrow => "=>",
        TokenKind::Eq => "=",
        TokenKind::Star => "*",
        other => match other.keyword_text() {
            Some(text) => text,
            None => return format!("operator {other:?}"),
        },
    };
    format!("'{text}'")
}
