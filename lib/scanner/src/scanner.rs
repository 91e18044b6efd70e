use cursor::{Cursor, Line};

pub mod token;
pub use token::{Token, TokenData, TokenType};
use TokenData::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScanErrorType {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {line}] error: {error}")]
pub struct ScanError {
    pub error: ScanErrorType,
    pub line: Line,
}

/// Scans the whole source, stopping at the first error.
pub fn scan(source: &str) -> Result<Vec<Token>, ScanError> {
    TokenStream::new(source).collect()
}

/// Lazily yields tokens, always terminated by exactly one `Eof` token. After an error or the
/// `Eof` token, the stream is exhausted.
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    cursor: Cursor<'a>,
    done: bool,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { cursor: Cursor::new(source), done: false }
    }

    fn make_token(&self, data: TokenData, start: &Cursor<'a>) -> Token {
        let token = Token::new(data, start.slice_until(&self.cursor), self.cursor.line());
        log::trace!("Scanned {:?}", token);
        token
    }

    fn error(&mut self, error: ScanErrorType) -> ScanError {
        self.done = true;
        ScanError { error, line: self.cursor.line() }
    }

    fn one_or_two(&mut self, second: char, two: TokenData, one: TokenData) -> TokenData {
        if self.cursor.next_if_eq(second) {
            two
        } else {
            one
        }
    }

    fn string(&mut self, start: &Cursor<'a>) -> Result<TokenData, ScanErrorType> {
        self.cursor.advance_while(|c| c != '"');
        if !self.cursor.next_if_eq('"') {
            return Err(ScanErrorType::UnterminatedString);
        }

        let lexeme = start.slice_until(&self.cursor);
        Ok(Str(lexeme[1..lexeme.len() - 1].to_string()))
    }

    fn number(&mut self, start: &Cursor<'a>) -> Result<TokenData, ScanErrorType> {
        self.cursor.advance_while(|c| c.is_ascii_digit());

        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.next();
            self.cursor.advance_while(|c| c.is_ascii_digit());
        }

        let lexeme = start.slice_until(&self.cursor);
        lexeme
            .parse()
            .map(Number)
            .map_err(|_| ScanErrorType::InvalidNumber(lexeme.to_string()))
    }

    fn identifier(&mut self, start: &Cursor<'a>) -> TokenData {
        self.cursor.advance_while(|c| c.is_alphabetic() || c.is_ascii_digit());
        TokenData::keyword(start.slice_until(&self.cursor)).unwrap_or(Identifier)
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<Token, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let start = self.cursor.clone();

            let Some(c) = self.cursor.next() else {
                self.done = true;
                return Some(Ok(Token::new(Eof, "", self.cursor.line())));
            };

            let data = match c {
                '(' => LeftParen,
                ')' => RightParen,
                '{' => LeftBrace,
                '}' => RightBrace,
                ',' => Comma,
                '.' => Dot,
                '-' => Minus,
                '+' => Plus,
                ';' => Semicolon,
                '*' => Star,

                '!' => self.one_or_two('=', BangEqual, Bang),
                '=' => self.one_or_two('=', EqualEqual, Equal),
                '<' => self.one_or_two('=', LessEqual, Less),
                '>' => self.one_or_two('=', GreaterEqual, Greater),

                '/' => {
                    if self.cursor.next_if_eq('/') {
                        // Comment
                        self.cursor.advance_while(|c| c != '\n');
                        continue;
                    }
                    Slash
                }

                ' ' | '\r' | '\t' | '\n' => continue,

                '"' => match self.string(&start) {
                    Ok(data) => data,
                    Err(e) => return Some(Err(self.error(e))),
                },

                d if d.is_ascii_digit() => match self.number(&start) {
                    Ok(data) => data,
                    Err(e) => return Some(Err(self.error(e))),
                },

                a if a.is_alphabetic() => self.identifier(&start),

                c => return Some(Err(self.error(ScanErrorType::UnexpectedCharacter(c)))),
            };

            return Some(Ok(self.make_token(data, &start)));
        }
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use pretty_assertions::assert_eq;

    use super::*;

    fn token(data: TokenData, lexeme: &str, line: usize) -> Token {
        Token::new(data, lexeme, Line(line))
    }

    fn eof(line: usize) -> Token {
        token(Eof, "", line)
    }

    fn types(source: &str) -> Vec<TokenType> {
        scan(source).unwrap().iter().map(Token::ty).collect()
    }

    #[test]
    fn string_literals() {
        assert_eq!(
            scan("\"hello world\"").unwrap(),
            vec![token(Str("hello world".to_string()), "\"hello world\"", 1), eof(1)]
        );

        assert_eq!(
            scan("\"hello\nworld\"").unwrap(),
            vec![token(Str("hello\nworld".to_string()), "\"hello\nworld\"", 2), eof(2)]
        );

        assert_eq!(
            scan("\"hello world").unwrap_err(),
            ScanError { error: ScanErrorType::UnterminatedString, line: Line(1) }
        );

        assert_eq!(
            scan("\"hello\nworld\n").unwrap_err(),
            ScanError { error: ScanErrorType::UnterminatedString, line: Line(3) }
        );
    }

    #[test]
    fn two_char_tokens() {
        assert_eq!(
            scan("! != = == < <= > >=").unwrap(),
            vec![
                token(Bang, "!", 1),
                token(BangEqual, "!=", 1),
                token(Equal, "=", 1),
                token(EqualEqual, "==", 1),
                token(Less, "<", 1),
                token(LessEqual, "<=", 1),
                token(Greater, ">", 1),
                token(GreaterEqual, ">=", 1),
                eof(1),
            ]
        );
    }

    #[test]
    fn single_char_tokens() {
        assert_eq!(
            types("=(){},.-+;*/!<>"),
            vec![
                TokenType::Equal,
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::Comma,
                TokenType::Dot,
                TokenType::Minus,
                TokenType::Plus,
                TokenType::Semicolon,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Bang,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments() {
        assert_eq!(
            scan("a // comment\nb").unwrap(),
            vec![token(Identifier, "a", 1), token(Identifier, "b", 2), eof(2)]
        );
        assert_eq!(scan("// only a comment").unwrap(), vec![eof(1)]);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            scan("12 3.25 4. .5").unwrap(),
            vec![
                token(Number(12.0), "12", 1),
                token(Number(3.25), "3.25", 1),
                token(Number(4.0), "4", 1),
                token(Dot, ".", 1),
                token(Dot, ".", 1),
                token(Number(5.0), "5", 1),
                eof(1),
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            types("and class else false for fun if nil or print return super this true var while"),
            vec![
                TokenType::And,
                TokenType::Class,
                TokenType::Else,
                TokenType::False,
                TokenType::For,
                TokenType::Fun,
                TokenType::If,
                TokenType::Nil,
                TokenType::Or,
                TokenType::Print,
                TokenType::Return,
                TokenType::Super,
                TokenType::This,
                TokenType::True,
                TokenType::Var,
                TokenType::While,
                TokenType::Eof,
            ]
        );

        assert_eq!(
            scan("variable or2 orchid").unwrap(),
            vec![
                token(Identifier, "variable", 1),
                token(Identifier, "or2", 1),
                token(Identifier, "orchid", 1),
                eof(1),
            ]
        );
    }

    #[test]
    fn unexpected_character_reports_line() {
        assert_eq!(
            scan("var a = 1;\nvar b @ 2;").unwrap_err(),
            ScanError { error: ScanErrorType::UnexpectedCharacter('@'), line: Line(2) }
        );
        assert_eq!(
            scan("my_var").unwrap_err().to_string(),
            "[line 1] error: unexpected character '_'"
        );
    }

    #[test]
    fn stream_stops_after_first_error() {
        let results = TokenStream::new("a @ b $").collect_vec();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].clone().unwrap_err().error,
            ScanErrorType::UnexpectedCharacter('@')
        );
    }

    #[test]
    fn exactly_one_eof() {
        for source in ["", "   \n\t", "print 1;", "{ var a = \"x\"; }\n// trailing"] {
            let tokens = scan(source).unwrap();
            assert_eq!(tokens.iter().filter(|t| t.ty() == TokenType::Eof).count(), 1);
            assert_eq!(tokens.last().map(Token::ty), Some(TokenType::Eof));
        }
    }

    #[test]
    fn lexemes_reassemble_source() {
        let source = "fun add(a, b) {\n  return a + b >= 2.5 != !\"str\";\n}";
        let tokens = scan(source).unwrap();
        let without_whitespace: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(tokens.iter().map(Token::lexeme).join(""), without_whitespace);
    }
}
