mod expr;
mod stmt;

use std::{fmt::Display, iter::Peekable, rc::Rc, vec};

use cursor::Line;
use itertools::Itertools;
pub use expr::{Expr, LiteralValue};
use scanner::{Token, TokenData, TokenType};
pub use stmt::{FunctionDecl, Stmt};

use TokenType::*;

const MAX_ARGUMENTS: usize = 255;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {}] error{}: {}", .token.line(), .token.location(), .error)]
pub struct ParseError {
    pub error: ParseErrorType,
    pub token: Token,
}

impl ParseError {
    pub fn new(error: ParseErrorType, token: Token) -> Self {
        Self { error, token }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParseError>);

impl Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("\n"))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseErrorType {
    #[error("expected expression")]
    ExpectedExpression,
    #[error("expected ; after statement")]
    ExpectedSemicolon,
    #[error("expected ( after {0}")]
    ExpectedLeftParen(&'static str),
    #[error("expected ) after {0}")]
    ExpectedRightParen(&'static str),
    #[error("expected {{ before function body")]
    ExpectedLeftBrace,
    #[error("expected }} after block")]
    ExpectedRightBrace,
    #[error("expected variable name")]
    ExpectedVariableName,
    #[error("expected function name")]
    ExpectedFunctionName,
    #[error("expected parameter name")]
    ExpectedParameterName,
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("can't have more than 255 arguments")]
    TooManyArguments,
    #[error("can't have more than 255 parameters")]
    TooManyParameters,
    #[error("can't return from top-level code")]
    ReturnOutsideFunction,
}

impl ParseErrorType {
    fn at(self, token: Token) -> ParseError {
        ParseError::new(self, token)
    }
}

#[derive(Debug)]
pub struct Parser {
    tokens: Peekable<vec::IntoIter<Token>>,
    eof: Token,
    function_depth: usize,
    // Errors that don't put the parser into panic mode.
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = match tokens.last() {
            Some(last) if last.ty() == Eof => last.clone(),
            last => Token::new(TokenData::Eof, "", last.map_or(Line(1), Token::line)),
        };

        Self { tokens: tokens.into_iter().peekable(), eof, function_depth: 0, errors: Vec::new() }
    }

    pub fn parse(mut self) -> std::result::Result<Vec<Stmt>, ParseErrors> {
        let mut stmts = Vec::new();

        while !self.check(Eof) {
            match self.declaration() {
                Ok(stmt) => {
                    log::debug!("Parsed statement: {}", stmt);
                    stmts.push(stmt)
                }
                Err(e) => {
                    log::trace!("Hit error: {:?}, syncing...", e);
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(stmts)
        } else {
            Err(ParseErrors(self.errors))
        }
    }

    fn declaration(&mut self) -> Result<Stmt> {
        if self.consume(Var).is_some() {
            self.var_declaration()
        } else if self.consume(Fun).is_some() {
            self.function()
        } else {
            self.statement()
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let name = self.consume_or_error(Identifier, ParseErrorType::ExpectedVariableName)?;

        let initializer = match self.consume(Equal) {
            Some(_) => Some(self.expression()?),
            None => None,
        };

        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolon)?;

        Ok(Stmt::Var { name, initializer })
    }

    fn function(&mut self) -> Result<Stmt> {
        let name = self.consume_or_error(Identifier, ParseErrorType::ExpectedFunctionName)?;
        self.consume_or_error(LeftParen, ParseErrorType::ExpectedLeftParen("function name"))?;

        let mut params = Vec::new();
        if !self.check(RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    let token = self.peek_token();
                    self.errors.push(ParseErrorType::TooManyParameters.at(token));
                }

                params.push(
                    self.consume_or_error(Identifier, ParseErrorType::ExpectedParameterName)?,
                );

                if self.consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume_or_error(RightParen, ParseErrorType::ExpectedRightParen("parameters"))?;
        self.consume_or_error(LeftBrace, ParseErrorType::ExpectedLeftBrace)?;

        self.function_depth += 1;
        let body = self.block_statements();
        self.function_depth -= 1;

        Ok(Stmt::Function(Rc::new(FunctionDecl { name, params, body: body? })))
    }

    fn statement(&mut self) -> Result<Stmt> {
        if self.consume(Print).is_some() {
            return self.print_statement();
        }

        if self.consume(LeftBrace).is_some() {
            return Ok(Stmt::Block(self.block_statements()?));
        }

        if self.consume(If).is_some() {
            return self.if_statement();
        }

        if self.consume(While).is_some() {
            return self.while_statement();
        }

        if self.consume(For).is_some() {
            return self.for_statement();
        }

        if let Some(keyword) = self.consume(Return) {
            return self.return_statement(keyword);
        }

        self.expression_statement()
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.consume_or_error(LeftParen, ParseErrorType::ExpectedLeftParen("'for'"))?;

        let initializer = if self.consume(Semicolon).is_some() {
            None
        } else if self.consume(Var).is_some() {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if self.check(Semicolon) {
            Expr::Literal(LiteralValue::Boolean(true))
        } else {
            self.expression()?
        };
        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolon)?;

        let increment = if self.check(RightParen) { None } else { Some(self.expression()?) };
        self.consume_or_error(RightParen, ParseErrorType::ExpectedRightParen("for clauses"))?;

        let body = self.statement()?;

        let while_stmt = Stmt::While {
            condition,
            body: Box::new(Stmt::Block(
                [Some(body), increment.map(Stmt::Expression)].into_iter().flatten().collect(),
            )),
        };

        Ok(Stmt::Block([initializer, Some(while_stmt)].into_iter().flatten().collect()))
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.consume_or_error(LeftParen, ParseErrorType::ExpectedLeftParen("'while'"))?;
        let condition = self.expression()?;
        self.consume_or_error(RightParen, ParseErrorType::ExpectedRightParen("condition"))?;

        let body = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.consume_or_error(LeftParen, ParseErrorType::ExpectedLeftParen("'if'"))?;
        let condition = self.expression()?;
        self.consume_or_error(RightParen, ParseErrorType::ExpectedRightParen("condition"))?;

        let then_branch = Box::new(self.statement()?);

        let else_branch = match self.consume(Else) {
            Some(_) => Some(Box::new(self.statement()?)),
            None => None,
        };

        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn return_statement(&mut self, keyword: Token) -> Result<Stmt> {
        if self.function_depth == 0 {
            self.errors.push(ParseErrorType::ReturnOutsideFunction.at(keyword.clone()));
        }

        let value = if self.check(Semicolon) { None } else { Some(self.expression()?) };
        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolon)?;

        Ok(Stmt::Return { keyword, value })
    }

    /// Parses the declarations of a block whose `{` has already been consumed. Errors in
    /// the block's declarations are recorded and recovered from inside the block.
    fn block_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();

        while !self.check(RightBrace) && !self.check(Eof) {
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    log::trace!("Hit error in block: {:?}, syncing...", e);
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        self.consume_or_error(RightBrace, ParseErrorType::ExpectedRightBrace)?;
        Ok(stmts)
    }

    fn print_statement(&mut self) -> Result<Stmt> {
        let value = self.expression()?;

        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolon)?;

        Ok(Stmt::Print(value))
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let value = self.expression()?;

        self.consume_or_error(Semicolon, ParseErrorType::ExpectedSemicolon)?;

        Ok(Stmt::Expression(value))
    }

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr = self.or()?;

        if let Some(equal) = self.consume(Equal) {
            let value = Box::new(self.assignment()?);

            if let Expr::Variable(name) = expr {
                return Ok(Expr::Assign { name, value });
            }

            return Err(ParseErrorType::InvalidAssignmentTarget.at(equal));
        }

        Ok(expr)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;

        while let Some(operator) = self.consume(Or) {
            let right = Box::new(self.and()?);
            expr = Expr::Logical { left: Box::new(expr), operator, right };
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;

        while let Some(operator) = self.consume(And) {
            let right = Box::new(self.equality()?);
            expr = Expr::Logical { left: Box::new(expr), operator, right };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.comparison()?;

        while let BangEqual | EqualEqual = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.comparison()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;

        while let Greater | GreaterEqual | Less | LessEqual = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.term()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr = self.factor()?;

        while let Plus | Minus = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.factor()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;

        while let Star | Slash = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.unary()?);
            expr = Expr::Binary { left: Box::new(expr), operator, right }
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        if let Minus | Bang = self.peek() {
            let operator = self.advance();
            let right = Box::new(self.unary()?);
            return Ok(Expr::Unary { operator, right });
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;

        while self.consume(LeftParen).is_some() {
            expr = self.finish_call(expr)?;
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments = Vec::new();

        if !self.check(RightParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    let token = self.peek_token();
                    self.errors.push(ParseErrorType::TooManyArguments.at(token));
                }

                arguments.push(self.expression()?);

                if self.consume(Comma).is_none() {
                    break;
                }
            }
        }

        let closing_paren =
            self.consume_or_error(RightParen, ParseErrorType::ExpectedRightParen("arguments"))?;

        Ok(Expr::Call { callee: Box::new(callee), closing_paren, arguments })
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        let literal = match token.data {
            TokenData::False => LiteralValue::Boolean(false),
            TokenData::True => LiteralValue::Boolean(true),
            TokenData::Nil => LiteralValue::Nil,
            TokenData::Number(n) => LiteralValue::Number(n),
            TokenData::Str(s) => LiteralValue::Str(s),
            TokenData::LeftParen => {
                let expr = self.expression()?;

                self.consume_or_error(
                    RightParen,
                    ParseErrorType::ExpectedRightParen("expression"),
                )?;

                return Ok(Expr::Grouping(Box::new(expr)));
            }
            TokenData::Identifier => return Ok(Expr::Variable(token)),

            _ => return Err(ParseErrorType::ExpectedExpression.at(token)),
        };
        Ok(Expr::Literal(literal))
    }

    /// Discards tokens until just after a `;` or right before a token that starts a new
    /// statement or closes the enclosing block.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                Class | Fun | Var | For | If | While | Print | Return | RightBrace | Eof => return,
                Semicolon => {
                    self.advance();
                    return;
                }
                _ => {
                    log::trace!("Syncing... {:?}", self.peek_token());
                    self.advance();
                }
            }
        }
    }
}

// Helpers
impl Parser {
    fn peek(&mut self) -> TokenType {
        self.tokens.peek().map_or(Eof, Token::ty)
    }

    fn peek_token(&mut self) -> Token {
        self.tokens.peek().cloned().unwrap_or_else(|| self.eof.clone())
    }

    fn check(&mut self, ty: TokenType) -> bool {
        self.peek() == ty
    }

    fn advance(&mut self) -> Token {
        self.tokens.next().unwrap_or_else(|| self.eof.clone())
    }

    fn consume(&mut self, ty: TokenType) -> Option<Token> {
        self.check(ty).then(|| self.advance())
    }

    fn consume_or_error(&mut self, ty: TokenType, error: ParseErrorType) -> Result<Token> {
        match self.consume(ty) {
            Some(token) => Ok(token),
            None => Err(error.at(self.peek_token())),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(source: &str) -> std::result::Result<Vec<Stmt>, ParseErrors> {
        Parser::new(scanner::scan(source).unwrap()).parse()
    }

    fn print_expression(source: &str) -> String {
        match parse(source).unwrap().as_slice() {
            [Stmt::Expression(expr)] => expr.to_string(),
            other => panic!("Expected a single expression statement, got {:?}", other),
        }
    }

    fn error_messages(source: &str) -> Vec<String> {
        parse(source).unwrap_err().0.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn precedence() {
        assert_eq!(print_expression("1 + 2 * 3;"), "(+ 1 (* 2 3))");
        assert_eq!(print_expression("(1 + 2) * 3;"), "(* (group (+ 1 2)) 3)");
        assert_eq!(print_expression("1 + 2 == 3 > 2;"), "(== (+ 1 2) (> 3 2))");
        assert_eq!(print_expression("a or b and c;"), "(or a (and b c))");
        assert_eq!(print_expression("!!true;"), "(! (! true))");
        assert_eq!(print_expression("-a * -b;"), "(* (- a) (- b))");
    }

    #[test]
    fn left_associativity() {
        assert_eq!(print_expression("1 - 2 - 3;"), "(- (- 1 2) 3)");
        assert_eq!(print_expression("8 / 4 / 2;"), "(/ (/ 8 4) 2)");
        assert_eq!(print_expression("a == b != c;"), "(!= (== a b) c)");
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(print_expression("a = b = \"x\";"), "(assign a (assign b \"x\"))");
    }

    #[test]
    fn calls() {
        assert_eq!(print_expression("f();"), "(call f)");
        assert_eq!(print_expression("f(1, g(2))(nil);"), "(call (call f 1 (call g 2)) nil)");
    }

    #[test]
    fn statements_display() {
        let stmts = parse(
            "var a; var b = 1; { print a; } if (a) print 1; else print 2; while (b) b = nil;\n\
             fun add(x, y) { return x + y; }",
        )
        .unwrap();
        assert_eq!(
            stmts.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "(var a)",
                "(var b 1)",
                "(block (print a))",
                "(if a (print 1) (print 2))",
                "(while b (; (assign b nil)))",
                "(fun add (x y) (return (+ x y)))",
            ]
        );
    }

    #[test]
    fn for_desugars_to_while() {
        assert_eq!(
            parse("for (var i = 0; i < 3; i = i + 1) print i;").unwrap(),
            parse("{ var i = 0; while (i < 3) { print i; i = i + 1; } }").unwrap()
        );

        assert_eq!(
            parse("for (;;) print 1;")
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["(block (while true (block (print 1))))"]
        );
    }

    #[test]
    fn print_without_semicolon() {
        assert_eq!(
            error_messages("print 1"),
            vec!["[line 1] error at end: expected ; after statement"]
        );
    }

    #[test]
    fn missing_right_paren() {
        assert_eq!(
            error_messages("print (1 + 2;"),
            vec!["[line 1] error at ';': expected ) after expression"]
        );
    }

    #[test]
    fn missing_expression() {
        assert_eq!(error_messages("print;"), vec!["[line 1] error at ';': expected expression"]);
    }

    #[test]
    fn invalid_assignment_target() {
        let errors = parse("1 = 2;").unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert_eq!(errors.0[0].error, ParseErrorType::InvalidAssignmentTarget);
        assert_eq!(errors.0[0].token.ty(), Equal);

        assert_eq!(
            error_messages("a + b = c;"),
            vec!["[line 1] error at '=': invalid assignment target"]
        );
    }

    #[test]
    fn synchronize_after_error() {
        assert_eq!(
            error_messages("var a = 1 var b = 2;\nvar c = 3"),
            vec![
                "[line 1] error at 'var': expected ; after statement",
                "[line 2] error at end: expected ; after statement",
            ]
        );
    }

    #[test]
    fn recovers_and_keeps_parsing() {
        assert_eq!(
            parse("print 1 +;\nprint 2;\nvar = 3;\nprint 4;").unwrap_err().to_string(),
            "[line 1] error at ';': expected expression\n\
             [line 3] error at '=': expected variable name"
        );
    }

    #[test]
    fn recovers_inside_blocks() {
        assert_eq!(
            error_messages("{ print 1 +; print 2; }\nprint 3;"),
            vec!["[line 1] error at ';': expected expression"]
        );
        assert_eq!(
            error_messages("{\n  var = 1;\n  { print (; }\n  print 2;\n}"),
            vec![
                "[line 2] error at '=': expected variable name",
                "[line 3] error at ';': expected expression",
            ]
        );
    }

    #[test]
    fn recovers_inside_function_bodies() {
        assert_eq!(
            error_messages("fun f() {\n  print 1 +;\n  return 2;\n}\nprint f();"),
            vec!["[line 2] error at ';': expected expression"]
        );
        assert_eq!(
            error_messages("fun f() {\n  var a = 1 print a;\n  return a;\n}\nreturn;"),
            vec![
                "[line 2] error at 'print': expected ; after statement",
                "[line 5] error at 'return': can't return from top-level code",
            ]
        );
    }

    #[test]
    fn return_outside_function() {
        assert_eq!(
            error_messages("return 1;"),
            vec!["[line 1] error at 'return': can't return from top-level code"]
        );
        assert!(
            parse("fun f() { { return; } }\nfun g() { fun h() { return 1; } return h; }").is_ok()
        );
        assert_eq!(
            error_messages("fun f() {}\nreturn;"),
            vec!["[line 2] error at 'return': can't return from top-level code"]
        );
    }

    #[test]
    fn function_declaration_errors() {
        assert_eq!(
            error_messages("fun () {}"),
            vec!["[line 1] error at '(': expected function name"]
        );
        assert_eq!(
            error_messages("fun f(a, 1) {}"),
            vec!["[line 1] error at '1': expected parameter name"]
        );
        assert_eq!(
            error_messages("fun f(a) print a;"),
            vec!["[line 1] error at 'print': expected { before function body"]
        );
        assert_eq!(
            error_messages("fun f() { print 1;"),
            vec!["[line 1] error at end: expected } after block"]
        );
    }

    #[test]
    fn too_many_arguments() {
        let arguments = (0..256).map(|i| i.to_string()).join(", ");
        let errors = parse(&format!("f({});\nprint 1;", arguments)).unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert_eq!(errors.0[0].error, ParseErrorType::TooManyArguments);
        assert_eq!(errors.0[0].token.lexeme(), "255");
    }

    #[test]
    fn missing_eof_token_is_tolerated() {
        let mut tokens = scanner::scan("print 1").unwrap();
        tokens.pop();
        assert_eq!(
            Parser::new(tokens).parse().unwrap_err().to_string(),
            "[line 1] error at end: expected ; after statement"
        );
    }
}
