use super::{
    builtins,
    error::{CompilationError, Span},
    lexer::{Token, TokenKind},
    value::{ArithmeticOp, ComparisonOp, Value},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Coalesce,
    Or,
    And,
    Comparison(ComparisonOp),
    Arithmetic(ArithmeticOp),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Literal(Value),
    /// An application property.
    Property(String),
    /// `$name`, resolved by the compiler.
    SystemProperty(String),
    Unary(UnaryOp, Box<Ast>),
    Binary(BinaryOp, Box<Ast>, Box<Ast>),
    Call { name: String, args: Vec<Ast> },
    /// A call passing its arguments as unparsed text.
    RawCall { name: String, raw: String },
    /// Input which failed to parse, with the valid parts found around it.
    Error(Vec<Ast>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ast {
    pub node: Node,
    pub span: Span,
}

impl Ast {
    fn new(node: Node, span: Span) -> Self {
        Self { node, span }
    }
}

/// Operators which can't start an expression.
fn is_infix(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Coalesce
            | TokenKind::Or
            | TokenKind::And
            | TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::LessOrEqual
            | TokenKind::Greater
            | TokenKind::GreaterOrEqual
            | TokenKind::Plus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
    )
}

/// Recursive descent parser, operators from lowest to highest precedence:
/// `??`, `OR`, `AND`, `NOT`, equality, ordering, additive, multiplicative, unary minus.
///
/// Errors don't stop the parser. It records them, and continues after the offending token, so
/// that a single pass reports everything wrong with a condition.
pub struct Parser<'a> {
    text: &'a str,
    tokens: &'a [Token],
    index: usize,
    errors: Vec<CompilationError>,
}

impl<'a> Parser<'a> {
    /// Create a new parser, the tokens must end with [`TokenKind::Eof`].
    pub fn new(text: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            text,
            tokens,
            index: 0,
            errors: vec![],
        }
    }

    /// Parse the tokens into a tree, which contains [`Node::Error`] where the input was
    /// invalid. Errors of [`TokenKind::Invalid`] tokens are left to the lexer.
    pub fn parse(mut self) -> (Ast, Vec<CompilationError>) {
        let mut ast = self.coalesce();

        while self.peek().kind != TokenKind::Eof {
            match self.peek().kind {
                TokenKind::RightParen => {
                    let err = self.unexpected("Unmatched parenthesis ')'");
                    self.errors.push(err);
                }
                _ => self.reject(),
            }
            self.advance();

            while is_infix(&self.peek().kind) {
                self.advance();
            }
            if self.peek().kind == TokenKind::Eof {
                break;
            }

            let rest = self.coalesce();
            let span = ast.span.to(rest.span);
            ast = Ast::new(Node::Error(vec![ast, rest]), span);
        }

        (ast, self.errors)
    }

    fn peek(&self) -> &'a Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn unexpected<S: Into<String>>(&self, message: S) -> CompilationError {
        CompilationError::new(message, self.peek().span)
    }

    /// Report the current token as unexpected.
    fn reject(&mut self) {
        let err = match &self.peek().kind {
            TokenKind::Invalid => return,
            TokenKind::Eof => self.unexpected("Unexpected end of condition"),
            _ => {
                let span = self.peek().span;
                let text = &self.text[span.offset..span.offset + span.len];
                self.unexpected(format!("Unexpected token: '{text}'"))
            }
        };
        self.errors.push(err);
    }

    /// Skip ahead to the parenthesis closing the current group, or the end.
    fn skip_group(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::RightParen if depth == 0 => return,
                TokenKind::RightParen => depth -= 1,
                TokenKind::LeftParen => depth += 1,
                _ => {}
            }
            self.advance();
        }
    }

    /// Consume the parenthesis closing the group opened at `open`, returns its span.
    fn close(&mut self, open: Span) -> Span {
        if self.peek().kind != TokenKind::RightParen {
            self.errors.push(CompilationError::new(
                "Unmatched parenthesis '('",
                open.to(self.peek().span),
            ));
            return self.peek().span;
        }
        self.advance().span
    }

    fn binary<F, M>(&mut self, next: F, matcher: M) -> Ast
    where
        F: Fn(&mut Self) -> Ast,
        M: Fn(&TokenKind) -> Option<BinaryOp>,
    {
        let mut lhs = next(self);
        while let Some(op) = matcher(&self.peek().kind) {
            self.advance();
            let rhs = next(self);
            let span = lhs.span.to(rhs.span);
            lhs = Ast::new(Node::Binary(op, Box::new(lhs), Box::new(rhs)), span);
        }
        lhs
    }

    fn coalesce(&mut self) -> Ast {
        self.binary(Self::or, |kind| match kind {
            TokenKind::Coalesce => Some(BinaryOp::Coalesce),
            _ => None,
        })
    }

    fn or(&mut self) -> Ast {
        self.binary(Self::and, |kind| match kind {
            TokenKind::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn and(&mut self) -> Ast {
        self.binary(Self::not, |kind| match kind {
            TokenKind::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn not(&mut self) -> Ast {
        if self.peek().kind == TokenKind::Not {
            let start = self.advance().span;
            let operand = self.not();
            let span = start.to(operand.span);
            return Ast::new(Node::Unary(UnaryOp::Not, Box::new(operand)), span);
        }
        self.equality()
    }

    fn equality(&mut self) -> Ast {
        self.binary(Self::ordering, |kind| match kind {
            TokenKind::Equal => Some(BinaryOp::Comparison(ComparisonOp::Equal)),
            TokenKind::NotEqual => Some(BinaryOp::Comparison(ComparisonOp::NotEqual)),
            _ => None,
        })
    }

    fn ordering(&mut self) -> Ast {
        self.binary(Self::additive, |kind| match kind {
            TokenKind::Less => Some(BinaryOp::Comparison(ComparisonOp::Less)),
            TokenKind::LessOrEqual => Some(BinaryOp::Comparison(ComparisonOp::LessOrEqual)),
            TokenKind::Greater => Some(BinaryOp::Comparison(ComparisonOp::Greater)),
            TokenKind::GreaterOrEqual => Some(BinaryOp::Comparison(ComparisonOp::GreaterOrEqual)),
            _ => None,
        })
    }

    fn additive(&mut self) -> Ast {
        self.binary(Self::multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Arithmetic(ArithmeticOp::Add)),
            TokenKind::Minus => Some(BinaryOp::Arithmetic(ArithmeticOp::Subtract)),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Ast {
        self.binary(Self::unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Arithmetic(ArithmeticOp::Multiply)),
            TokenKind::Slash => Some(BinaryOp::Arithmetic(ArithmeticOp::Divide)),
            TokenKind::Percent => Some(BinaryOp::Arithmetic(ArithmeticOp::Modulo)),
            _ => None,
        })
    }

    fn unary(&mut self) -> Ast {
        if self.peek().kind == TokenKind::Minus {
            let start = self.advance().span;
            let operand = self.unary();
            let span = start.to(operand.span);
            return Ast::new(Node::Unary(UnaryOp::Negate, Box::new(operand)), span);
        }
        self.primary()
    }

    fn primary(&mut self) -> Ast {
        let token = self.peek();
        let node = match &token.kind {
            TokenKind::LeftParen => return self.parenthesized(),
            TokenKind::Identifier(name) if self.lookahead_is(TokenKind::LeftParen) => {
                return self.call(name)
            }
            TokenKind::Number(value) => Node::Literal(Value::Number(*value)),
            TokenKind::String(value) => Node::Literal(Value::String(value.clone())),
            TokenKind::True => Node::Literal(true.into()),
            TokenKind::False => Node::Literal(false.into()),
            TokenKind::Null => Node::Literal(Value::Null),
            TokenKind::Identifier(name) | TokenKind::BracedProperty(name) => {
                Node::Property(name.clone())
            }
            TokenKind::SystemProperty(name) => Node::SystemProperty(name.clone()),
            // left for the enclosing group or list
            TokenKind::RightParen | TokenKind::Comma | TokenKind::Eof => {
                self.reject();
                return Ast::new(Node::Error(vec![]), token.span);
            }
            _ => {
                self.reject();
                Node::Error(vec![])
            }
        };

        self.advance();
        Ast::new(node, token.span)
    }

    fn lookahead_is(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.index + 1)
            .map_or(false, |token| token.kind == kind)
    }

    fn parenthesized(&mut self) -> Ast {
        let open = self.advance().span;
        let inner = self.coalesce();
        if !matches!(self.peek().kind, TokenKind::RightParen | TokenKind::Eof) {
            self.reject();
            self.skip_group();
        }
        let close = self.close(open);
        Ast::new(inner.node, open.to(close))
    }

    fn call(&mut self, name: &str) -> Ast {
        let start = self.advance().span;
        let open = self.advance().span;

        if builtins::lookup(name).map_or(false, |builtin| builtin.takes_raw_args()) {
            return self.raw_call(name, start, open);
        }

        let mut args = vec![];
        if self.peek().kind != TokenKind::RightParen {
            loop {
                args.push(self.coalesce());
                match self.peek().kind {
                    TokenKind::Comma => {
                        self.advance();
                    }
                    TokenKind::RightParen | TokenKind::Eof => break,
                    _ => {
                        self.reject();
                        self.skip_group();
                        break;
                    }
                }
            }
        }

        let close = self.close(open);
        Ast::new(
            Node::Call {
                name: name.to_string(),
                args,
            },
            start.to(close),
        )
    }

    /// Take everything up to the matching parenthesis as is.
    fn raw_call(&mut self, name: &str, start: Span, open: Span) -> Ast {
        self.skip_group();
        let end = self.peek().span.offset;
        let close = self.close(open);
        let raw = self.text[open.offset + open.len..end].trim();

        Ast::new(
            Node::RawCall {
                name: name.to_string(),
                raw: raw.to_string(),
            },
            start.to(close),
        )
    }
}
