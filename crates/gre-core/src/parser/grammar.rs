//! Recursive-descent parser over the token stream produced by [`super::lexer`].
//! One function per grammar production, no backtracking. The parser performs
//! no semantic validation (entity types, property names) — only structure.

use std::collections::BTreeMap;

use gre_ast::{
    ActionDef, CompareOp, EdgeDirection, EffectBlock, Expr, ForClause, Parameter, ParsedItem, Pattern, PatternEdge,
    Precondition, RuleDef, SetStatement, Statement, Trigger, TriggerStatement, TriggerType, Value,
};

use super::error::ParseError;
use super::lexer::{lex, Spanned, Token};

pub fn parse(text: &str) -> Result<Vec<ParsedItem>, ParseError> {
    let tokens = lex(text)?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_file()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur().token, Token::Eof)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        let s = self.cur();
        ParseError::new(s.line, s.column, message.into())
    }

    fn advance(&mut self) -> Spanned {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn ident_text(&self) -> Option<&str> {
        match &self.cur().token {
            Token::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn peek_kw(&self, kw: &str) -> bool {
        self.ident_text() == Some(kw)
    }

    fn eat_kw(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.peek_kw(kw) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{kw}', found {:?}", self.cur().token)))
        }
    }

    fn eat_token(&mut self, tok: Token) -> Result<(), ParseError> {
        if self.cur().token == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {tok:?}, found {:?}", self.cur().token)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match &self.cur().token {
            Token::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match &self.cur().token {
            Token::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(self.err(format!("expected string literal, found {other:?}"))),
        }
    }

    fn expect_int(&mut self) -> Result<i64, ParseError> {
        match &self.cur().token {
            Token::Int(n) => {
                let n = *n;
                self.advance();
                Ok(n)
            }
            other => Err(self.err(format!("expected integer literal, found {other:?}"))),
        }
    }

    // ---- file ----

    fn parse_file(&mut self) -> Result<Vec<ParsedItem>, ParseError> {
        let mut items = Vec::new();
        while !self.at_eof() {
            if self.peek_kw("ACTION") {
                items.push(ParsedItem::Action(self.parse_action_def()?));
            } else if self.peek_kw("RULE") {
                items.push(ParsedItem::Rule(self.parse_rule_def()?));
            } else {
                return Err(self.err(format!("expected ACTION or RULE, found {:?}", self.cur().token)));
            }
        }
        Ok(items)
    }

    // ---- action_def ----

    fn parse_action_def(&mut self) -> Result<ActionDef, ParseError> {
        self.eat_kw("ACTION")?;
        let entity_type = self.expect_ident()?;
        self.eat_token(Token::Dot)?;
        let action_name = self.expect_ident()?;

        let parameters = if self.cur().token == Token::LParen {
            self.parse_param_list()?
        } else {
            Vec::new()
        };

        self.eat_token(Token::LBrace)?;

        let mut preconditions = Vec::new();
        while self.peek_kw("PRECONDITION") {
            preconditions.push(self.parse_precondition()?);
        }

        let effect = if self.peek_kw("EFFECT") { Some(self.parse_effect()?) } else { None };

        self.eat_token(Token::RBrace)?;

        Ok(ActionDef { entity_type, action_name, parameters, preconditions, effect, description: None })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Parameter>, ParseError> {
        self.eat_token(Token::LParen)?;
        let mut params = Vec::new();
        if self.cur().token != Token::RParen {
            loop {
                let name = self.expect_ident()?;
                self.eat_token(Token::Colon)?;
                let param_type = self.expect_ident()?;
                let optional = if self.cur().token == Token::Question {
                    self.advance();
                    true
                } else {
                    false
                };
                params.push(Parameter { name, param_type, optional });
                if self.cur().token == Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.eat_token(Token::RParen)?;
        Ok(params)
    }

    fn parse_precondition(&mut self) -> Result<Precondition, ParseError> {
        self.eat_kw("PRECONDITION")?;
        let name = if self.cur().token == Token::Colon { None } else { Some(self.expect_ident()?) };
        self.eat_token(Token::Colon)?;
        let condition = self.parse_expression()?;
        self.eat_kw("ON_FAILURE")?;
        self.eat_token(Token::Colon)?;
        let on_failure = self.expect_str()?;
        Ok(Precondition { name, condition, on_failure })
    }

    fn parse_effect(&mut self) -> Result<EffectBlock, ParseError> {
        self.eat_kw("EFFECT")?;
        self.eat_token(Token::LBrace)?;
        let mut sets = Vec::new();
        while self.cur().token != Token::RBrace {
            self.eat_kw("SET")?;
            let target_path = self.parse_path()?;
            self.eat_token(Token::Assign)?;
            let value = self.parse_expression()?;
            self.eat_token(Token::Semicolon)?;
            sets.push(SetStatement { target_path, value });
        }
        self.eat_token(Token::RBrace)?;
        Ok(EffectBlock { sets })
    }

    // ---- rule_def ----

    fn parse_rule_def(&mut self) -> Result<RuleDef, ParseError> {
        self.eat_kw("RULE")?;
        let name = self.expect_ident()?;
        let priority = if self.peek_kw("PRIORITY") {
            self.advance();
            self.expect_int()? as i32
        } else {
            0
        };
        self.eat_token(Token::LBrace)?;
        self.eat_kw("ON")?;
        let trigger = self.parse_trigger()?;
        let body = self.parse_for_clause()?;
        self.eat_token(Token::RBrace)?;
        Ok(RuleDef { name, priority, trigger, body })
    }

    fn parse_trigger(&mut self) -> Result<Trigger, ParseError> {
        let kw = self.expect_ident()?;
        let trigger_type = match kw.as_str() {
            "UPDATE" => TriggerType::Update,
            "CREATE" => TriggerType::Create,
            "DELETE" => TriggerType::Delete,
            "LINK" => TriggerType::Link,
            "SCAN" => TriggerType::Scan,
            other => return Err(self.err(format!("unknown trigger type '{other}'"))),
        };
        self.eat_token(Token::LParen)?;
        let entity_type = self.expect_ident()?;
        let property = if self.cur().token == Token::Dot {
            self.advance();
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.eat_token(Token::RParen)?;
        Ok(Trigger { trigger_type, entity_type, property })
    }

    fn parse_for_clause(&mut self) -> Result<ForClause, ParseError> {
        self.eat_kw("FOR")?;
        self.eat_token(Token::LParen)?;
        let variable = self.expect_ident()?;
        self.eat_token(Token::Colon)?;
        let entity_type = self.expect_ident()?;
        let condition = if self.peek_kw("WHERE") {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.eat_token(Token::RParen)?;
        self.eat_token(Token::LBrace)?;
        let mut statements = Vec::new();
        while self.cur().token != Token::RBrace {
            statements.push(self.parse_statement()?);
            self.eat_token(Token::Semicolon)?;
        }
        self.eat_token(Token::RBrace)?;
        Ok(ForClause { variable, entity_type, condition, statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.peek_kw("SET") {
            self.advance();
            let target_path = self.parse_path()?;
            self.eat_token(Token::Assign)?;
            let value = self.parse_expression()?;
            Ok(Statement::Set { target_path, value })
        } else if self.peek_kw("TRIGGER") {
            self.advance();
            let entity_type = self.expect_ident()?;
            self.eat_token(Token::Dot)?;
            let action_name = self.expect_ident()?;
            self.eat_kw("FOR")?;
            let target_var = self.expect_ident()?;
            let params = if self.peek_kw("WITH") {
                self.advance();
                self.parse_object_literal()?
            } else {
                BTreeMap::new()
            };
            Ok(Statement::Trigger(TriggerStatement { entity_type, action_name, target_var, params }))
        } else if self.peek_kw("FOR") {
            Ok(Statement::For(Box::new(self.parse_for_clause()?)))
        } else {
            Err(self.err(format!("expected SET, TRIGGER or FOR, found {:?}", self.cur().token)))
        }
    }

    fn parse_object_literal(&mut self) -> Result<BTreeMap<String, Expr>, ParseError> {
        self.eat_token(Token::LBrace)?;
        let mut members = BTreeMap::new();
        if self.cur().token != Token::RBrace {
            loop {
                let key = self.expect_ident()?;
                self.eat_token(Token::Colon)?;
                let value = self.parse_expression()?;
                members.insert(key, value);
                if self.cur().token == Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.eat_token(Token::RBrace)?;
        Ok(members)
    }

    fn parse_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut segments = vec![self.expect_ident()?];
        while self.cur().token == Token::Dot {
            self.advance();
            segments.push(self.expect_ident()?);
        }
        Ok(segments)
    }

    // ---- expression ----

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.peek_kw("OR") {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expr()?;
        while self.peek_kw("AND") {
            self.advance();
            let right = self.parse_not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kw("NOT") {
            self.advance();
            let inner = self.parse_comparison()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        if self.peek_kw("EXISTS") {
            self.advance();
            self.eat_token(Token::LParen)?;
            let pattern = self.parse_pattern()?;
            self.eat_token(Token::RParen)?;
            return Ok(Expr::Exists(pattern));
        }

        let left = self.parse_term()?;

        // A bare `a -[rel]-> b` used directly as a boolean term (the literal
        // worked example in the DSL surface has no EXISTS(...) wrapper): a
        // single-segment path immediately followed by an edge is a pattern,
        // not a path read.
        if self.cur().token == Token::Minus {
            let Expr::Path(segments) = &left else {
                return Err(self.err("unexpected '-' after expression"));
            };
            if segments.len() != 1 {
                return Err(self.err("relationship pattern root must be a single bound variable"));
            }
            let root_var = segments[0].clone();
            let edges = self.parse_pattern_edges()?;
            return Ok(Expr::Exists(Pattern { root_var, edges, condition: None }));
        }

        let op = match &self.cur().token {
            Token::EqEq => Some(CompareOp::Eq),
            Token::NotEq => Some(CompareOp::Ne),
            Token::Lt => Some(CompareOp::Lt),
            Token::Gt => Some(CompareOp::Gt),
            Token::Le => Some(CompareOp::Le),
            Token::Ge => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_term()?;
            return Ok(Expr::Compare { op, left: Box::new(left), right: Box::new(right) });
        }

        if self.peek_kw("IN") {
            self.advance();
            self.eat_token(Token::LBracket)?;
            let list = self.parse_value_list()?;
            self.eat_token(Token::RBracket)?;
            return Ok(Expr::In { left: Box::new(left), list });
        }

        if self.peek_kw("IS") {
            self.advance();
            let negated = if self.peek_kw("NOT") {
                self.advance();
                true
            } else {
                false
            };
            self.eat_kw("NULL")?;
            return Ok(Expr::IsNull { expr: Box::new(left), negated });
        }

        // Grammar-accepted comparators with no runtime semantics (§C.1 of the
        // expanded spec): parse and discard so the parser stays total.
        if self.peek_kw("MATCHES") || self.peek_kw("CHANGED") {
            let op_name = self.expect_ident()?;
            let _rhs = self.parse_term()?;
            return Ok(Expr::Unsupported(op_name));
        }

        Ok(left)
    }

    fn parse_value_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut list = Vec::new();
        if self.cur().token != Token::RBracket {
            loop {
                list.push(self.parse_expression()?);
                if self.cur().token == Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        Ok(list)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        match self.cur().token.clone() {
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(n)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(f)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.eat_token(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if name == "true" {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(true)));
                }
                if name == "false" {
                    self.advance();
                    return Ok(Expr::Literal(Value::Bool(false)));
                }
                if name == "NULL" {
                    self.advance();
                    return Ok(Expr::Literal(Value::Null));
                }
                self.advance();
                if self.cur().token == Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if self.cur().token != Token::RParen {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.cur().token == Token::Comma {
                                self.advance();
                                continue;
                            }
                            break;
                        }
                    }
                    self.eat_token(Token::RParen)?;
                    return Ok(Expr::Call { name, args });
                }
                let mut segments = vec![name];
                while self.cur().token == Token::Dot {
                    self.advance();
                    segments.push(self.expect_ident()?);
                }
                Ok(Expr::Path(segments))
            }
            other => Err(self.err(format!("unexpected token {other:?} in expression"))),
        }
    }

    // ---- pattern ----

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let root_var = self.expect_ident()?;
        let edges = self.parse_pattern_edges()?;
        let condition = if self.peek_kw("WHERE") {
            self.advance();
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Pattern { root_var, edges, condition })
    }

    fn parse_pattern_edges(&mut self) -> Result<Vec<PatternEdge>, ParseError> {
        let mut edges = Vec::new();
        while self.cur().token == Token::Minus {
            self.advance();
            self.eat_token(Token::LBracket)?;
            let relationship_type = self.expect_ident()?;
            self.eat_token(Token::RBracket)?;
            let direction = match self.cur().token {
                Token::Arrow => {
                    self.advance();
                    EdgeDirection::Forward
                }
                Token::BackArrow => {
                    self.advance();
                    EdgeDirection::Backward
                }
                Token::Minus => {
                    self.advance();
                    EdgeDirection::Either
                }
                ref other => return Err(self.err(format!("expected edge direction, found {other:?}"))),
            };
            let target_var = self.expect_ident()?;
            edges.push(PatternEdge { relationship_type, direction, target_var });
        }
        Ok(edges)
    }
}
