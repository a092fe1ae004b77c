use std::rc::Rc;

use crate::error::{parser_error, Error};
use crate::syntax::{Expr, FunctionDecl, LiteralValue, NodeId, Stmt};
use crate::token::{Token, TokenType};

pub struct Parser<'t> {
    tokens: &'t Vec<Token>,
    current: usize,
    next_id: NodeId,
    had_error: bool,
}

macro_rules! matches {
    ( $sel:ident, $( $x:expr ),* ) => {
        {
            if $( $sel.check($x) )||* {
                $sel.advance();
                true
            } else {
                false
            }
        }
    };
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_id: 0,
            had_error: false,
        }
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    // Every Assign/Variable/This/Super node gets its own identity here, at
    // construction time, so the resolver can key its distance map on it
    // instead of on the node's (textual, ambiguous) name.
    fn next_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // program        → declaration* EOF ;
    pub fn parse(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut statements: Vec<Stmt> = Vec::new();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                // Already reported at the point it was raised; synchronize
                // and keep parsing so later declarations still surface
                // their own diagnostics.
                Err(Error::Parse) => self.synchronize(),
                Err(other) => return Err(other),
            }
        }
        Ok(statements)
    }

    // declaration    → classDecl | funDecl | varDecl | statement ;
    fn declaration(&mut self) -> Result<Stmt, Error> {
        if matches!(self, TokenType::Var) {
            self.var_declaration()
        } else if matches!(self, TokenType::Class) {
            self.class_declaration()
        } else if matches!(self, TokenType::Fun) {
            self.function("function")
        } else {
            self.statement()
        }
    }

    // classDecl      → "class" IDENTIFIER ( "<" IDENTIFIER )? "{" function* "}" ;
    fn class_declaration(&mut self) -> Result<Stmt, Error> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;
        let superclass = if matches!(self, TokenType::Less) {
            self.consume(TokenType::Identifier, "Expect superclass name.")?;
            let name = self.previous().clone();
            Some(Expr::Variable {
                id: self.next_id(),
                name,
            })
        } else {
            None
        };
        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.function_decl("method")?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    // Fields are not declared up front. Instances are loose bags of data
    // and code can add fields to them freely.

    // funDecl        → "fun" function ;
    // function       → IDENTIFIER "(" parameters? ")" block ;
    // parameters     → IDENTIFIER ( "," IDENTIFIER )* ;
    fn function(&mut self, kind: &str) -> Result<Stmt, Error> {
        let declaration = self.function_decl(kind)?;
        Ok(Stmt::Function { declaration })
    }

    // Shared by top-level functions and methods so class bodies can reuse it.
    fn function_decl(&mut self, kind: &str) -> Result<Rc<FunctionDecl>, Error> {
        let name = self.consume(
            TokenType::Identifier,
            format!("Expect {kind} name.").as_str(),
        )?;

        self.consume(
            TokenType::LeftParen,
            format!("Expect '(' after {kind} name.").as_str(),
        )?;
        let mut params: Vec<Token> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    self.error(self.peek(), "Can't have more than 255 parameters.");
                }

                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);

                if !matches!(self, TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;

        self.consume(
            TokenType::LeftBrace,
            format!("Expect '{{' before {kind} body.").as_str(),
        )?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    // statement      → exprStmt | printStmt | ifStmt | block | returnStmt | whileStmt | forStmt ;
    fn statement(&mut self) -> Result<Stmt, Error> {
        if matches!(self, TokenType::For) {
            self.for_statement()
        } else if matches!(self, TokenType::If) {
            self.if_statement()
        } else if matches!(self, TokenType::Print) {
            self.print_statement()
        } else if matches!(self, TokenType::Return) {
            self.return_statement()
        } else if matches!(self, TokenType::While) {
            self.while_statement()
        } else if matches!(self, TokenType::LeftBrace) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    // returnStmt     → "return" expression? ";" ;
    fn return_statement(&mut self) -> Result<Stmt, Error> {
        let keyword = self.previous().clone();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    // The else binds to the nearest preceding if.
    // ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
    fn if_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);

        let else_branch = if matches!(self, TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    // block          → "{" declaration* "}" ;
    fn block(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(Error::Parse) => self.synchronize(),
                Err(other) => return Err(other),
            }
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    // whileStmt      → "while" "(" expression ")" statement ;
    fn while_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = self.statement()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
        })
    }

    // forStmt        → "for" "(" ( varDecl | exprStmt | ";" ) expression? ";" expression? ")" statement ;
    // Desugared straight into while/block: no dedicated Stmt variant for it.
    fn for_statement(&mut self) -> Result<Stmt, Error> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if matches!(self, TokenType::Semicolon) {
            None
        } else if matches!(self, TokenType::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(incr) = increment {
            body = Stmt::Block {
                statements: vec![body, Stmt::Expression { expression: incr }],
            };
        }

        body = Stmt::While {
            condition: condition.unwrap_or(Expr::Literal {
                value: LiteralValue::Boolean(true),
            }),
            body: Box::new(body),
        };

        if let Some(init) = initializer {
            body = Stmt::Block {
                statements: vec![init, body],
            };
        }

        Ok(body)
    }

    // varDecl        → "var" IDENTIFIER ( "=" expression )? ";" ;
    fn var_declaration(&mut self) -> Result<Stmt, Error> {
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;
        let initializer = if matches!(self, TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // expression     → assignment ;
    fn expression(&mut self) -> Result<Expr, Error> {
        self.assignment()
    }

    // The left side is parsed as an ordinary expression first and converted
    // to an assignment target only if '=' follows - every valid target also
    // happens to parse as a valid expression.
    // assignment     → ( call "." )? IDENTIFIER "=" assignment | logic_or ;
    fn assignment(&mut self) -> Result<Expr, Error> {
        let expr = self.logic_or()?;

        if matches!(self, TokenType::Equal) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            if let Expr::Variable { name, .. } = expr {
                return Ok(Expr::Assign {
                    id: self.next_id(),
                    name,
                    value,
                });
            } else if let Expr::Get { object, name } = expr {
                return Ok(Expr::Set {
                    object,
                    name,
                    value,
                });
            }

            // Reported, not thrown: the parser isn't confused, the target
            // is just invalid.
            self.error(&equals, "Invalid assignment target.");
        }

        Ok(expr)
    }

    // logic_or       → logic_and ( "or" logic_and )* ;
    fn logic_or(&mut self) -> Result<Expr, Error> {
        let mut expr = self.logic_and()?;

        while matches!(self, TokenType::Or) {
            let operator = self.previous().clone();
            let right = self.logic_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // logic_and      → equality ( "and" equality )* ;
    fn logic_and(&mut self) -> Result<Expr, Error> {
        let mut expr = self.equality()?;

        while matches!(self, TokenType::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // equality       → comparison ( ( "!=" | "==" ) comparison )* ;
    fn equality(&mut self) -> Result<Expr, Error> {
        let mut expr = self.comparison()?;

        while matches!(self, TokenType::BangEqual, TokenType::EqualEqual) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }
        Ok(expr)
    }

    // comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
    fn comparison(&mut self) -> Result<Expr, Error> {
        let mut expr = self.term()?;

        while matches!(
            self,
            TokenType::GreaterEqual,
            TokenType::Greater,
            TokenType::LessEqual,
            TokenType::Less
        ) {
            let operator = self.previous().clone();
            let right = self.term()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // term           → factor ( ( "-" | "+" ) factor )* ;
    fn term(&mut self) -> Result<Expr, Error> {
        let mut expr = self.factor()?;

        while matches!(self, TokenType::Minus, TokenType::Plus) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }
        Ok(expr)
    }

    // factor         → unary ( ( "/" | "*" ) unary )* ;
    fn factor(&mut self) -> Result<Expr, Error> {
        let mut expr = self.unary()?;

        while matches!(self, TokenType::Slash, TokenType::Star) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            }
        }

        Ok(expr)
    }

    // unary          → ( "!" | "-" ) unary | call ;
    fn unary(&mut self) -> Result<Expr, Error> {
        if matches!(self, TokenType::Bang, TokenType::Minus) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    // call           → primary ( "(" arguments? ")" | "." IDENTIFIER )* ;
    fn call(&mut self) -> Result<Expr, Error> {
        let mut expr = self.primary()?;

        loop {
            if matches!(self, TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if matches!(self, TokenType::Dot) {
                let name =
                    self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                }
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, Error> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() >= 255 {
                    // Reported, not thrown: too many arguments doesn't put
                    // the parser in a confused state.
                    self.error(self.peek(), "Can't have more than 255 arguments.");
                }

                arguments.push(self.expression()?);

                if !matches!(self, TokenType::Comma) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    // primary        → NUMBER | STRING | "true" | "false" | "nil" | "this"
    //                | "super" "." IDENTIFIER | IDENTIFIER | "(" expression ")" ;
    fn primary(&mut self) -> Result<Expr, Error> {
        if matches!(self, TokenType::False) {
            return Ok(Expr::Literal {
                value: LiteralValue::Boolean(false),
            });
        }
        if matches!(self, TokenType::True) {
            return Ok(Expr::Literal {
                value: LiteralValue::Boolean(true),
            });
        }
        if matches!(self, TokenType::Nil) {
            return Ok(Expr::Literal {
                value: LiteralValue::Null,
            });
        }
        if let TokenType::Number { literal } = &self.peek().token_type {
            let literal = *literal;
            self.advance();
            return Ok(Expr::Literal {
                value: LiteralValue::Number(literal),
            });
        }
        if let TokenType::String { literal } = &self.peek().token_type {
            let literal = literal.clone();
            self.advance();
            return Ok(Expr::Literal {
                value: LiteralValue::String(literal),
            });
        }
        if matches!(self, TokenType::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super {
                id: self.next_id(),
                keyword,
                method,
            });
        }
        if matches!(self, TokenType::This) {
            let keyword = self.previous().clone();
            return Ok(Expr::This {
                id: self.next_id(),
                keyword,
            });
        }
        if matches!(self, TokenType::Identifier) {
            let name = self.previous().clone();
            return Ok(Expr::Variable {
                id: self.next_id(),
                name,
            });
        }
        if matches!(self, TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping {
                expression: Box::new(expr),
            });
        }

        Err(self.error(self.peek(), "Expect expression."))
    }

    // printStmt      → "print" expression ";" ;
    fn print_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expression: value })
    }

    // exprStmt       → expression ";" ;
    fn expression_statement(&mut self) -> Result<Stmt, Error> {
        let value = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Stmt::Expression { expression: value })
    }

    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Class
                | TokenType::Return => return,
                _ => {
                    self.advance();
                }
            };
        }
    }

    // Checks the current token's type without consuming it.
    fn check(&self, token_type: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().token_type == token_type
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.current)
            .expect("peek into end of token stream")
    }

    fn previous(&self) -> &Token {
        self.tokens
            .get(self.current - 1)
            .expect("previous was empty")
    }

    fn consume(&mut self, token_type: TokenType, msg: &str) -> Result<Token, Error> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            let peeked = self.peek().clone();
            Err(self.error(&peeked, msg))
        }
    }

    fn error(&mut self, token: &Token, msg: &str) -> Error {
        self.had_error = true;
        parser_error(token, msg);
        Error::Parse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(source: &str) -> (Vec<Stmt>, bool) {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let stmts = parser.parse().unwrap();
        (stmts, parser.had_error())
    }

    #[test]
    fn for_statement_desugars_to_a_while_block() {
        let (stmts, had_error) = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert!(!had_error);
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Block { statements } => {
                assert_eq!(statements.len(), 2);
                assert!(matches!(statements[0], Stmt::Var { .. }));
                assert!(matches!(statements[1], Stmt::While { .. }));
            }
            other => panic!("expected a desugared block, got {other:?}"),
        }
    }

    #[test]
    fn invalid_assignment_target_is_reported_but_does_not_abort_parsing() {
        let (stmts, had_error) = parse("1 = 2;\nprint 1;");
        assert!(had_error);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn arity_above_255_is_reported_but_parsing_continues() {
        let args = (0..256)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let source = format!("f({args});");
        let (stmts, had_error) = parse(&source);
        assert!(had_error);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn missing_semicolon_is_a_parse_error() {
        let mut scanner = Scanner::new("var a = 1".to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        parser.parse().unwrap();
        assert!(parser.had_error());
    }

    #[test]
    fn class_with_superclass_parses_variable_expression() {
        let (stmts, had_error) = parse("class B < A { f() { return 1; } }");
        assert!(!had_error);
        match &stmts[0] {
            Stmt::Class {
                superclass: Some(Expr::Variable { name, .. }),
                ..
            } => assert_eq!(name.lexeme, "A"),
            other => panic!("expected a class with a superclass variable, got {other:?}"),
        }
    }
}
