//! Route conditions.
//!
//! A condition is compiled once, from its text, into a type checked expression. Evaluating it
//! against a message yields a three-valued [`Bool`], only [`Bool::True`] lets a message pass.

pub mod builtins;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::{CompilationError, CompilationErrors, Position};
pub use value::{Bool, QueryType, Value};

use crate::message::Message;
use expr::{Compiler, Expr};
use lexer::Lexer;
use parser::Parser;
use std::{fmt, ops::BitOr, sync::Arc};

/// Features of the condition language which depend on the route source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilerFlags(u8);

impl CompilerFlags {
    pub const NONE: Self = Self(0);
    /// Allow `$body.<path>` queries.
    pub const BODY_QUERY: Self = Self(1);
    /// Allow `twin_change_includes(<path>)`.
    pub const TWIN_CHANGE_INCLUDES: Self = Self(2);
    pub const ALL: Self = Self(3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CompilerFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A compiled condition.
#[derive(Clone)]
pub struct Condition {
    text: String,
    expr: Arc<Expr>,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.text).finish()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Condition {
    /// A condition which always passes.
    pub fn always() -> Self {
        Self {
            text: "true".into(),
            expr: Arc::new(Expr::Literal(Bool::True.into())),
        }
    }

    /// Compile the condition text.
    ///
    /// Either all errors, sorted by position, are reported, or a fully valid condition is
    /// returned. Parsing continues after errors, so the errors of all stages are reported
    /// together.
    pub fn compile(text: &str, flags: CompilerFlags) -> Result<Self, CompilationErrors> {
        let (tokens, mut errors) = Lexer::new(text).tokenize();
        let (ast, parse_errors) = Parser::new(text, &tokens).parse();
        errors.extend(parse_errors);

        let mut compiler = Compiler::new(flags);
        let (expr, result) = compiler.compile(&ast);
        if !QueryType::Bool.accepts(result) {
            compiler.error(format!("Condition must be bool, found {result}"), ast.span);
        }
        errors.extend(compiler.into_errors());

        if !errors.is_empty() {
            errors.sort_by_key(|err| (err.start, err.end));
            return Err(CompilationErrors(errors));
        }

        Ok(Self {
            text: text.to_string(),
            expr: Arc::new(expr),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn evaluate(&self, message: &Message) -> Bool {
        self.expr.evaluate(message).to_bool()
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.evaluate(message).is_true()
    }

    /// The number of leaves of the expression.
    pub fn complexity(&self) -> usize {
        self.expr.complexity()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::SYSTEM_PROPERTY_CONNECTION_DEVICE_ID;
    use serde_json::json;

    fn compile(text: &str) -> Condition {
        Condition::compile(text, CompilerFlags::ALL)
            .unwrap_or_else(|err| panic!("{text}: {err}"))
    }

    fn errors(text: &str, flags: CompilerFlags) -> Vec<String> {
        Condition::compile(text, flags)
            .expect_err(text)
            .errors()
            .iter()
            .map(|err| err.message.clone())
            .collect()
    }

    #[test]
    fn test_telemetry_condition() {
        let condition = compile("temperature > 50 AND $body.unit = 'F'");
        let message = Message::telemetry(json!({"unit": "F"}).to_string())
            .json()
            .property("temperature", "72");
        assert_eq!(condition.evaluate(&message), Bool::True);

        let message = Message::telemetry(json!({"unit": "F"}).to_string()).json();
        assert_eq!(condition.evaluate(&message), Bool::Undefined);
        assert!(!condition.matches(&message));

        let message = Message::telemetry(json!({"unit": "C"}).to_string())
            .json()
            .property("temperature", "72");
        assert_eq!(condition.evaluate(&message), Bool::False);
    }

    #[test]
    fn test_three_valued_logic() {
        let message = Message::telemetry("");
        for (text, expected) in [
            ("missing = 1", Bool::Undefined),
            ("missing = 1 AND false", Bool::False),
            ("missing = 1 OR true", Bool::True),
            ("missing = 1 OR false", Bool::Undefined),
            ("NOT (missing = 1)", Bool::Undefined),
            ("missing <> 1", Bool::Undefined),
            ("is_defined(missing)", Bool::False),
            ("(missing ?? 'x') = 'x'", Bool::True),
            ("null = null", Bool::True),
            ("1 + null = null", Bool::True),
            ("missing + 1 = 1", Bool::Undefined),
        ] {
            assert_eq!(compile(text).evaluate(&message), expected, "{text}");
        }
    }

    #[test]
    fn test_properties() {
        let message = Message::telemetry("")
            .property("a", "1")
            .property("$connectionDeviceId", "app")
            .property("my prop", "x")
            .system_property(SYSTEM_PROPERTY_CONNECTION_DEVICE_ID, "device1")
            .system_property("contentType", "text/plain");

        for (text, expected) in [
            ("a = 1", Bool::True),
            ("a = '1'", Bool::True),
            ("{my prop} = 'x'", Bool::True),
            // an application property with the literal name wins
            ("$connectionDeviceId = 'app'", Bool::True),
            ("$contentType = 'text/plain'", Bool::True),
            ("upper($contentType) = 'TEXT/PLAIN'", Bool::True),
            ("$missing = 'x'", Bool::Undefined),
        ] {
            assert_eq!(compile(text).evaluate(&message), expected, "{text}");
        }
    }

    #[test]
    fn test_body_query() {
        let message = Message::telemetry(json!({"a": {"b": [1, 2]}, "s": "x"}).to_string())
            .json()
            .property("$body.s", "shadowed");

        for (text, expected) in [
            ("$body.a.b[1] = 2", Bool::True),
            ("$body.a.c = 2", Bool::Undefined),
            ("$body.s = 'shadowed'", Bool::True),
            ("$body.a.b[0] = 1", Bool::True),
        ] {
            assert_eq!(compile(text).evaluate(&message), expected, "{text}");
        }

        // not a json body
        let message = Message::telemetry("{}").system_property("contentType", "text/plain");
        assert_eq!(
            compile("is_defined($body.a)").evaluate(&message),
            Bool::False
        );
    }

    #[test]
    fn test_disabled_features() {
        assert_eq!(
            errors("$body.a = 1", CompilerFlags::NONE),
            vec!["Body queries are not enabled"]
        );
        assert_eq!(
            errors("twin_change_includes(properties.desired)", CompilerFlags::BODY_QUERY),
            vec!["Function twin_change_includes is not enabled"]
        );
        assert!(Condition::compile(
            "twin_change_includes(properties.desired)",
            CompilerFlags::BODY_QUERY | CompilerFlags::TWIN_CHANGE_INCLUDES
        )
        .is_ok());
    }

    #[test]
    fn test_type_errors() {
        let err = Condition::compile("a + 'x' > 1 AND 'y'", CompilerFlags::ALL).unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(
            err.errors()[0].message,
            "Operator '+' requires number, found string"
        );
        assert_eq!(err.errors()[0].start, Position::new(1, 5));
        assert_eq!(err.errors()[1].message, "AND requires bool, found string");
        assert_eq!(err.errors()[1].start, Position::new(1, 17));

        assert_eq!(
            errors("length(1, 2) = 1", CompilerFlags::ALL),
            vec!["Function length expects 1 arguments, found 2"]
        );
        assert_eq!(
            errors("length(1) = 1", CompilerFlags::ALL),
            vec!["Argument 1 of length requires string, found number"]
        );
        assert_eq!(
            errors("nope(a)", CompilerFlags::ALL),
            vec!["Unknown function: nope"]
        );
        assert_eq!(
            errors("1 + 2", CompilerFlags::ALL),
            vec!["Condition must be bool, found number"]
        );
        assert_eq!(
            errors("'a' = 1", CompilerFlags::ALL),
            vec!["Operator '=' can't compare string and number"]
        );
    }

    #[test]
    fn test_lexer_errors_are_reported() {
        let err = Condition::compile("a = 1 & b = #", CompilerFlags::ALL).unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(err.errors()[0].start, Position::new(1, 7));
        assert_eq!(err.errors()[1].start, Position::new(1, 13));
    }

    #[test]
    fn test_all_stages_are_reported() {
        assert_eq!(
            errors("nosuch(1) AND (a = 1", CompilerFlags::ALL),
            vec!["Unknown function: nosuch", "Unmatched parenthesis '('"]
        );
        assert_eq!(
            errors("nosuch(1) AND 'abc", CompilerFlags::ALL),
            vec!["Unknown function: nosuch", "Unterminated string literal"]
        );
        assert_eq!(
            errors("a + 'x' > 1) OR $body.a = 1", CompilerFlags::NONE),
            vec![
                "Operator '+' requires number, found string",
                "Unmatched parenthesis ')'",
                "Body queries are not enabled",
            ]
        );
    }

    #[test]
    fn test_complexity() {
        assert_eq!(compile("true").complexity(), 1);
        assert_eq!(compile("a = 1 AND NOT (b > 2 OR c < 3)").complexity(), 6);
        assert_eq!(compile("concat(a, b, 'c') = 'x'").complexity(), 4);
    }
}
