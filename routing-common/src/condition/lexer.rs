use super::error::{CompilationError, Position, Span};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),
    /// `$name`, without the `$`.
    SystemProperty(String),
    /// `{any name}`, without the braces.
    BracedProperty(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    LeftParen,
    RightParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Coalesce,
    /// Input which was reported as an error already.
    Invalid,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub struct Lexer<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    position: Position,
    tokens: Vec<Token>,
    errors: Vec<CompilationError>,
}

fn is_property_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.')
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            index: 0,
            position: Position::default(),
            tokens: vec![],
            errors: vec![],
        }
    }

    /// Split the text into tokens. Invalid input is reported and becomes a
    /// [`TokenKind::Invalid`] token, the token list always ends with [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<CompilationError>) {
        while let Some(c) = self.peek() {
            let start = self.mark();
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '0'..='9' => self.number(start),
                '.' if self.peek_at(1).map_or(false, |c| c.is_ascii_digit()) => self.number(start),
                '\'' | '"' => self.string(start, c),
                '$' => self.system_property(start),
                '{' => self.braced_property(start),
                c if c.is_alphabetic() || c == '_' => self.identifier(start),
                _ => self.operator(start, c),
            }
        }

        let end = self.mark();
        self.push(TokenKind::Eof, end);

        (self.tokens, self.errors)
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.index + n).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map_or(self.text.len(), |(offset, _)| *offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    fn bump_while<F: Fn(char) -> bool>(&mut self, f: F) {
        while self.peek().map_or(false, &f) {
            self.bump();
        }
    }

    fn mark(&self) -> (Position, usize) {
        (self.position, self.offset())
    }

    fn span(&self, (start, offset): (Position, usize)) -> Span {
        Span {
            start,
            end: self.position,
            offset,
            len: self.offset() - offset,
        }
    }

    fn push(&mut self, kind: TokenKind, start: (Position, usize)) {
        let span = self.span(start);
        self.tokens.push(Token { kind, span });
    }

    fn error<S: Into<String>>(&mut self, message: S, start: (Position, usize)) {
        let span = self.span(start);
        self.errors.push(CompilationError::new(message, span));
        self.tokens.push(Token {
            kind: TokenKind::Invalid,
            span,
        });
    }

    fn slice(&self, (_, offset): (Position, usize)) -> &'a str {
        &self.text[offset..self.offset()]
    }

    fn number(&mut self, start: (Position, usize)) {
        self.bump_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.bump();
            self.bump_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).map_or(false, |c| c.is_ascii_digit()) {
                for _ in 0..=sign {
                    self.bump();
                }
                self.bump_while(|c| c.is_ascii_digit());
            }
        }

        match self.slice(start).parse::<f64>() {
            Ok(value) => self.push(TokenKind::Number(value), start),
            Err(_) => {
                let text = self.slice(start);
                self.error(format!("Invalid number: {text}"), start);
            }
        }
    }

    /// Quotes inside the string are escaped by doubling them.
    fn string(&mut self, start: (Position, usize), quote: char) {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        value.push(quote);
                    } else {
                        self.push(TokenKind::String(value), start);
                        return;
                    }
                }
                Some(c) => value.push(c),
                None => {
                    self.error("Unterminated string literal", start);
                    return;
                }
            }
        }
    }

    fn system_property(&mut self, start: (Position, usize)) {
        self.bump();
        let name_start = self.mark();
        while let Some(c) = self.peek() {
            if c == '[' {
                // brackets may contain quoted names
                self.bump_while(|c| c != ']');
                self.bump();
            } else if is_property_char(c) {
                self.bump();
            } else {
                break;
            }
        }
        let name = self.slice(name_start);
        if name.is_empty() {
            self.error("Missing system property name after '$'", start);
        } else {
            self.push(TokenKind::SystemProperty(name.to_string()), start);
        }
    }

    fn braced_property(&mut self, start: (Position, usize)) {
        self.bump();
        let name_start = self.mark();
        self.bump_while(|c| c != '}');
        let name = self.slice(name_start).trim().to_string();
        if self.bump().is_none() {
            self.error("Unterminated property name, missing '}'", start);
        } else if name.is_empty() {
            self.error("Empty property name", start);
        } else {
            self.push(TokenKind::BracedProperty(name), start);
        }
    }

    /// Identifiers may be dotted paths, like `properties.desired`.
    fn identifier(&mut self, start: (Position, usize)) {
        self.bump_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
        let name = self.slice(start);
        let kind = match name.to_ascii_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier(name.to_string()),
        };
        self.push(kind, start);
    }

    fn operator(&mut self, start: (Position, usize), c: char) {
        self.bump();
        let next = self.peek();

        let (kind, second) = match (c, next) {
            ('(', _) => (TokenKind::LeftParen, false),
            (')', _) => (TokenKind::RightParen, false),
            (',', _) => (TokenKind::Comma, false),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('*', _) => (TokenKind::Star, false),
            ('/', _) => (TokenKind::Slash, false),
            ('%', _) => (TokenKind::Percent, false),
            ('=', _) => (TokenKind::Equal, false),
            ('!', Some('=')) => (TokenKind::NotEqual, true),
            ('!', _) => (TokenKind::Not, false),
            ('<', Some('>')) => (TokenKind::NotEqual, true),
            ('<', Some('=')) => (TokenKind::LessOrEqual, true),
            ('<', _) => (TokenKind::Less, false),
            ('>', Some('=')) => (TokenKind::GreaterOrEqual, true),
            ('>', _) => (TokenKind::Greater, false),
            ('&', Some('&')) => (TokenKind::And, true),
            ('|', Some('|')) => (TokenKind::Or, true),
            ('?', Some('?')) => (TokenKind::Coalesce, true),
            _ => {
                self.error(format!("Unexpected character: '{c}'"), start);
                return;
            }
        };

        if second {
            self.bump();
        }
        self.push(kind, start);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(text).tokenize();
        assert_eq!(errors, vec![]);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokens() {
        assert_eq!(
            kinds("temperature > 50 and $body.unit <> 'F'"),
            vec![
                TokenKind::Identifier("temperature".into()),
                TokenKind::Greater,
                TokenKind::Number(50.0),
                TokenKind::And,
                TokenKind::SystemProperty("body.unit".into()),
                TokenKind::NotEqual,
                TokenKind::String("F".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"1.5e3 .5 'it''s' "a" {my prop} NULL ?? ! $body['a b']"#),
            vec![
                TokenKind::Number(1500.0),
                TokenKind::Number(0.5),
                TokenKind::String("it's".into()),
                TokenKind::String("a".into()),
                TokenKind::BracedProperty("my prop".into()),
                TokenKind::Null,
                TokenKind::Coalesce,
                TokenKind::Not,
                TokenKind::SystemProperty("body['a b']".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let (tokens, _) = Lexer::new("a\n  >= 1").tokenize();
        assert_eq!(tokens[1].span.start, Position::new(2, 3));
        assert_eq!(tokens[1].span.end, Position::new(2, 5));
        assert_eq!(tokens[1].span.offset, 4);
        assert_eq!(tokens[1].span.len, 2);
    }

    #[test]
    fn test_errors() {
        let (tokens, errors) = Lexer::new("a = 'open & b").tokenize();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unterminated string literal");
        assert_eq!(errors[0].start, Position::new(1, 5));
        assert_eq!(errors[0].end, Position::new(1, 14));
        assert_eq!(tokens[2].kind, TokenKind::Invalid);
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));

        let (tokens, errors) = Lexer::new("a & b # c").tokenize();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Unexpected character: '&'");
        assert_eq!(tokens.len(), 6);
    }
}
