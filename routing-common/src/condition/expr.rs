use super::{
    builtins::{self, Builtin, Segment},
    error::{CompilationError, Span},
    parser::{Ast, BinaryOp, Node, UnaryOp},
    value::{ArithmeticOp, Bool, ComparisonOp, QueryType, Value},
    CompilerFlags,
};
use crate::message::Message;

const BODY: &str = "body";

/// A type checked expression, ready for evaluation.
#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Value),
    Property(String),
    /// A system property, unless an application property with the literal `$name` exists.
    SystemProperty {
        name: String,
        literal: String,
    },
    /// A query on the JSON body, unless an application property named `fallback` exists.
    BodyQuery {
        path: Vec<Segment>,
        fallback: Option<String>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    Comparison(ComparisonOp, Box<Expr>, Box<Expr>),
    Arithmetic(ArithmeticOp, Box<Expr>, Box<Expr>),
    Call {
        builtin: &'static Builtin,
        args: Vec<Expr>,
    },
    RawCall {
        builtin: &'static Builtin,
        raw: String,
    },
}

impl Expr {
    pub fn evaluate(&self, message: &Message) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Property(name) => message.properties.get(name).into(),
            Self::SystemProperty { name, literal } => message
                .properties
                .get(literal)
                .or_else(|| message.system_properties.get(name))
                .into(),
            Self::BodyQuery { path, fallback } => {
                match fallback
                    .as_ref()
                    .and_then(|fallback| message.properties.get(fallback))
                {
                    Some(value) => Value::String(value.clone()),
                    None => builtins::body_query(path, message),
                }
            }
            Self::Not(operand) => (!operand.evaluate(message).to_bool()).into(),
            Self::Negate(operand) => match operand.evaluate(message).to_number() {
                Value::Number(n) => Value::Number(-n),
                other => other,
            },
            Self::And(lhs, rhs) => match lhs.evaluate(message).to_bool() {
                Bool::False => Bool::False.into(),
                lhs => (lhs & rhs.evaluate(message).to_bool()).into(),
            },
            Self::Or(lhs, rhs) => match lhs.evaluate(message).to_bool() {
                Bool::True => Bool::True.into(),
                lhs => (lhs | rhs.evaluate(message).to_bool()).into(),
            },
            Self::Coalesce(lhs, rhs) => {
                let value = lhs.evaluate(message);
                if value.is_defined() {
                    value
                } else {
                    rhs.evaluate(message)
                }
            }
            Self::Comparison(op, lhs, rhs) => op
                .evaluate(&lhs.evaluate(message), &rhs.evaluate(message))
                .into(),
            Self::Arithmetic(op, lhs, rhs) => {
                op.evaluate(&lhs.evaluate(message), &rhs.evaluate(message))
            }
            Self::Call { builtin, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(message))
                    .collect::<Vec<_>>();
                builtin.call(&args, message, "")
            }
            Self::RawCall { builtin, raw } => builtin.call(&[], message, raw),
        }
    }

    /// Number of leaves of the tree.
    pub fn complexity(&self) -> usize {
        match self {
            Self::Literal(_)
            | Self::Property(_)
            | Self::SystemProperty { .. }
            | Self::BodyQuery { .. }
            | Self::RawCall { .. } => 1,
            Self::Not(operand) | Self::Negate(operand) => operand.complexity(),
            Self::And(lhs, rhs)
            | Self::Or(lhs, rhs)
            | Self::Coalesce(lhs, rhs)
            | Self::Comparison(_, lhs, rhs)
            | Self::Arithmetic(_, lhs, rhs) => lhs.complexity() + rhs.complexity(),
            Self::Call { args, .. } if args.is_empty() => 1,
            Self::Call { args, .. } => args.iter().map(Expr::complexity).sum(),
        }
    }
}

/// Turns the syntax tree into an [`Expr`], collecting all type errors on the way.
pub struct Compiler {
    flags: CompilerFlags,
    errors: Vec<CompilationError>,
}

impl Compiler {
    pub fn new(flags: CompilerFlags) -> Self {
        Self {
            flags,
            errors: vec![],
        }
    }

    pub fn into_errors(self) -> Vec<CompilationError> {
        self.errors
    }

    pub fn error<S: Into<String>>(&mut self, message: S, span: Span) {
        self.errors.push(CompilationError::new(message, span));
    }

    /// Check the operand against the expected type, reporting a mismatch.
    fn expect(&mut self, what: &str, expected: QueryType, actual: QueryType, span: Span) {
        if !expected.accepts(actual) {
            self.error(
                format!("{what} requires {expected}, found {actual}"),
                span,
            );
        }
    }

    pub fn compile(&mut self, ast: &Ast) -> (Expr, QueryType) {
        match &ast.node {
            Node::Literal(value) => (Expr::Literal(value.clone()), value.query_type()),
            Node::Property(name) => (Expr::Property(name.clone()), QueryType::Any),
            Node::SystemProperty(name) => (self.system_property(name, ast.span), QueryType::Any),
            Node::Unary(op, operand) => self.unary(*op, operand),
            Node::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, ast.span),
            Node::Call { name, args } => self.call(name, args, ast.span),
            Node::RawCall { name, raw } => self.raw_call(name, raw, ast.span),
            // only compiled for their errors
            Node::Error(parts) => {
                for part in parts {
                    self.compile(part);
                }
                (Expr::Literal(Value::Undefined), QueryType::Any)
            }
        }
    }

    /// Resolve `$name`: a bracketed body query always queries the body, a plain one only
    /// when there is no application property `$name`, anything else is a system property.
    fn system_property(&mut self, name: &str, span: Span) -> Expr {
        let path = match name.strip_prefix(BODY) {
            Some(path) if path.starts_with('.') || path.starts_with('[') => path,
            _ => {
                return Expr::SystemProperty {
                    name: name.to_string(),
                    literal: format!("${name}"),
                }
            }
        };

        if !self.flags.contains(CompilerFlags::BODY_QUERY) {
            self.error("Body queries are not enabled", span);
            return Expr::Literal(Value::Undefined);
        }

        let path = path.strip_prefix('.').unwrap_or(path);
        match builtins::parse_path(path) {
            Ok(segments) => Expr::BodyQuery {
                path: segments,
                fallback: (!name.contains('[')).then(|| format!("${name}")),
            },
            Err(err) => {
                self.error(format!("Invalid body query: {err}"), span);
                Expr::Literal(Value::Undefined)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Ast) -> (Expr, QueryType) {
        let (expr, actual) = self.compile(operand);
        match op {
            UnaryOp::Not => {
                self.expect("NOT", QueryType::Bool, actual, operand.span);
                (Expr::Not(Box::new(expr)), QueryType::Bool)
            }
            UnaryOp::Negate => {
                self.expect("Unary '-'", QueryType::Number, actual, operand.span);
                (Expr::Negate(Box::new(expr)), QueryType::Number)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Ast, rhs: &Ast, span: Span) -> (Expr, QueryType) {
        let (left, left_type) = self.compile(lhs);
        let (right, right_type) = self.compile(rhs);
        let (left, right) = (Box::new(left), Box::new(right));

        match op {
            BinaryOp::And | BinaryOp::Or => {
                let what = if op == BinaryOp::And { "AND" } else { "OR" };
                self.expect(what, QueryType::Bool, left_type, lhs.span);
                self.expect(what, QueryType::Bool, right_type, rhs.span);
                let expr = if op == BinaryOp::And {
                    Expr::And(left, right)
                } else {
                    Expr::Or(left, right)
                };
                (expr, QueryType::Bool)
            }
            BinaryOp::Coalesce => {
                let result = match left_type.unify(right_type) {
                    Some(result) => result,
                    None => {
                        self.error(
                            format!("Operator '??' can't combine {left_type} and {right_type}"),
                            span,
                        );
                        QueryType::Any
                    }
                };
                (Expr::Coalesce(left, right), result)
            }
            BinaryOp::Comparison(op) => {
                match left_type.unify(right_type) {
                    Some(QueryType::Bool) if !op.is_equality() => self.error(
                        format!("Operator '{op}' can't order bool values"),
                        span,
                    ),
                    Some(_) => {}
                    None => self.error(
                        format!("Operator '{op}' can't compare {left_type} and {right_type}"),
                        span,
                    ),
                }
                (Expr::Comparison(op, left, right), QueryType::Bool)
            }
            BinaryOp::Arithmetic(op) => {
                let what = format!("Operator '{op}'");
                self.expect(&what, QueryType::Number, left_type, lhs.span);
                self.expect(&what, QueryType::Number, right_type, rhs.span);
                (Expr::Arithmetic(op, left, right), QueryType::Number)
            }
        }
    }

    fn lookup(&mut self, name: &str, span: Span) -> Option<&'static Builtin> {
        let builtin = match builtins::lookup(name) {
            Some(builtin) => builtin,
            None => {
                self.error(format!("Unknown function: {name}"), span);
                return None;
            }
        };

        if !self.flags.contains(builtin.requires) {
            self.error(
                format!("Function {} is not enabled", builtin.name),
                span,
            );
            return None;
        }

        Some(builtin)
    }

    fn call(&mut self, name: &str, args: &[Ast], span: Span) -> (Expr, QueryType) {
        // compile the arguments anyway, to report their errors too
        let compiled = args
            .iter()
            .map(|arg| self.compile(arg))
            .collect::<Vec<_>>();

        let builtin = match self.lookup(name, span) {
            Some(builtin) => builtin,
            None => return (Expr::Literal(Value::Undefined), QueryType::Any),
        };

        let arity_ok = args.len() >= builtin.min_args()
            && builtin.max_args().map_or(true, |max| args.len() <= max);
        if !arity_ok {
            let expected = match builtin.max_args() {
                Some(max) if max == builtin.min_args() => max.to_string(),
                Some(max) => format!("{} to {max}", builtin.min_args()),
                None => format!("at least {}", builtin.min_args()),
            };
            self.error(
                format!(
                    "Function {} expects {expected} arguments, found {}",
                    builtin.name,
                    args.len()
                ),
                span,
            );
        }

        let mut exprs = Vec::with_capacity(compiled.len());
        for (n, ((expr, actual), arg)) in compiled.into_iter().zip(args).enumerate() {
            if arity_ok {
                let what = format!("Argument {} of {}", n + 1, builtin.name);
                self.expect(&what, builtin.param(n), actual, arg.span);
            }
            exprs.push(expr);
        }

        (
            Expr::Call {
                builtin,
                args: exprs,
            },
            builtin.returns,
        )
    }

    fn raw_call(&mut self, name: &str, raw: &str, span: Span) -> (Expr, QueryType) {
        let builtin = match self.lookup(name, span) {
            Some(builtin) => builtin,
            None => return (Expr::Literal(Value::Undefined), QueryType::Any),
        };

        if let Err(err) = builtins::parse_path(raw) {
            self.error(
                format!("Function {} expects a property path: {err}", builtin.name),
                span,
            );
        }

        (
            Expr::RawCall {
                builtin,
                raw: raw.to_string(),
            },
            builtin.returns,
        )
    }
}
