use std::{
    cmp::Ordering,
    fmt,
    ops::{BitAnd, BitOr, Not},
};

/// Three-valued boolean.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Bool {
    False = 0,
    True = 1,
    Undefined = -1,
}

impl Bool {
    pub fn is_true(self) -> bool {
        self == Self::True
    }

    pub fn is_defined(self) -> bool {
        self != Self::Undefined
    }
}

impl From<bool> for Bool {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl Not for Bool {
    type Output = Bool;

    fn not(self) -> Self::Output {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Undefined => Self::Undefined,
        }
    }
}

impl BitAnd for Bool {
    type Output = Bool;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::True, Self::True) => Self::True,
            _ => Self::Undefined,
        }
    }
}

impl BitOr for Bool {
    type Output = Bool;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::False, Self::False) => Self::False,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

/// The result of evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(Bool),
    /// An explicit `null`.
    Null,
    /// Something which isn't there, like a missing property.
    Undefined,
}

impl From<Bool> for Value {
    fn from(value: Bool) -> Self {
        match value {
            Bool::Undefined => Self::Undefined,
            value => Self::Bool(value),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Option<&String>> for Value {
    fn from(value: Option<&String>) -> Self {
        value.map_or(Self::Undefined, |value| Self::String(value.clone()))
    }
}

impl From<&serde_json::Value> for Value {
    /// Objects and arrays have no scalar representation, so they are undefined.
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => (*value).into(),
            serde_json::Value::Number(value) => value.as_f64().map_or(Self::Undefined, Self::Number),
            serde_json::Value::String(value) => Self::String(value.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Self::Undefined,
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl Value {
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::Number(_) => QueryType::Number,
            Self::String(_) => QueryType::String,
            Self::Bool(_) => QueryType::Bool,
            Self::Null => QueryType::Null,
            Self::Undefined => QueryType::Undefined,
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined | Self::Bool(Bool::Undefined))
    }

    /// The value in a logical context. `null` is unknown, as is anything not boolean.
    pub fn to_bool(&self) -> Bool {
        match self {
            Self::Bool(value) => *value,
            Self::String(value) => parse_bool(value).map_or(Bool::Undefined, Bool::from),
            _ => Bool::Undefined,
        }
    }

    /// The value in a numeric context. Strings get parsed, `null` stays `null`.
    pub fn to_number(&self) -> Value {
        match self {
            Self::Number(value) => Self::Number(*value),
            Self::String(value) => parse_number(value).map_or(Self::Undefined, Self::Number),
            Self::Null => Self::Null,
            Self::Bool(_) | Self::Undefined => Self::Undefined,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.to_number() {
            Self::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// The static type of an expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryType {
    Number,
    String,
    Bool,
    Null,
    Undefined,
    /// Only known at runtime, like properties or body queries.
    Any,
}

impl QueryType {
    /// Check if a value of type `actual` may be used where `self` is expected.
    pub fn accepts(self, actual: QueryType) -> bool {
        match (self, actual) {
            (Self::Any, _) | (_, Self::Any) | (_, Self::Null) | (_, Self::Undefined) => true,
            (expected, actual) => expected == actual,
        }
    }

    /// The common type of two branches, if they have one.
    pub fn unify(self, other: QueryType) -> Option<QueryType> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Self::Null | Self::Undefined, t) | (t, Self::Null | Self::Undefined) => Some(t),
            (Self::Any, _) | (_, Self::Any) => Some(Self::Any),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Any => "any",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl ArithmeticOp {
    pub fn evaluate(self, lhs: &Value, rhs: &Value) -> Value {
        match (lhs.to_number(), rhs.to_number()) {
            (Value::Undefined, _) | (_, Value::Undefined) => Value::Undefined,
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (Value::Number(a), Value::Number(b)) => Value::Number(match self {
                Self::Add => a + b,
                Self::Subtract => a - b,
                Self::Multiply => a * b,
                Self::Divide => a / b,
                Self::Modulo => a % b,
            }),
            _ => Value::Undefined,
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    pub fn evaluate(self, lhs: &Value, rhs: &Value) -> Bool {
        match self {
            Self::Equal => equals(lhs, rhs),
            Self::NotEqual => match (lhs, rhs) {
                (Value::Undefined, _) | (_, Value::Undefined) => Bool::Undefined,
                _ => !equals(lhs, rhs),
            },
            _ => match order(lhs, rhs) {
                Some(ordering) => Bool::from(match self {
                    Self::Less => ordering == Ordering::Less,
                    Self::LessOrEqual => ordering != Ordering::Greater,
                    Self::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }),
                None => Bool::Undefined,
            },
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        })
    }
}

fn equals(lhs: &Value, rhs: &Value) -> Bool {
    match (lhs, rhs) {
        (Value::Undefined, _) | (_, Value::Undefined) => Bool::Undefined,
        (Value::Null, Value::Null) => Bool::True,
        (Value::Null, _) | (_, Value::Null) => Bool::False,
        (Value::Number(a), Value::Number(b)) => (a == b).into(),
        (Value::String(a), Value::String(b)) => (a == b).into(),
        (Value::Bool(a), Value::Bool(b)) if a.is_defined() && b.is_defined() => (a == b).into(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            parse_number(s).map_or(Bool::Undefined, |s| (s == *n).into())
        }
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s))
            if b.is_defined() =>
        {
            parse_bool(s).map_or(Bool::Undefined, |s| (Bool::from(s) == *b).into())
        }
        _ => Bool::Undefined,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::Number(b)) => parse_number(a).and_then(|a| a.partial_cmp(b)),
        (Value::Number(a), Value::String(b)) => parse_number(b).and_then(|b| a.partial_cmp(&b)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_repr() {
        assert_eq!(Bool::False as i8, 0);
        assert_eq!(Bool::True as i8, 1);
        assert_eq!(Bool::Undefined as i8, -1);
    }

    #[test]
    fn test_logic_laws() {
        use Bool::*;

        assert_eq!(Undefined & False, False);
        assert_eq!(False & Undefined, False);
        assert_eq!(Undefined & True, Undefined);
        assert_eq!(Undefined | True, True);
        assert_eq!(True | Undefined, True);
        assert_eq!(Undefined | False, Undefined);
        assert_eq!(!Undefined, Undefined);
        assert_eq!(!True, False);
        assert_eq!(True & True, True);
        assert_eq!(False | False, False);
    }

    #[test]
    fn test_equality() {
        let op = ComparisonOp::Equal;
        assert_eq!(op.evaluate(&Value::Null, &Value::Null), Bool::True);
        assert_eq!(op.evaluate(&Value::Null, &1.0.into()), Bool::False);
        assert_eq!(op.evaluate(&Value::Undefined, &Value::Null), Bool::Undefined);
        assert_eq!(op.evaluate(&"72".into(), &72.0.into()), Bool::True);
        assert_eq!(op.evaluate(&"abc".into(), &72.0.into()), Bool::Undefined);
        assert_eq!(op.evaluate(&"TRUE".into(), &true.into()), Bool::True);

        let op = ComparisonOp::NotEqual;
        assert_eq!(op.evaluate(&Value::Null, &1.0.into()), Bool::True);
        assert_eq!(op.evaluate(&Value::Null, &Value::Null), Bool::False);
        assert_eq!(op.evaluate(&Value::Undefined, &1.0.into()), Bool::Undefined);
    }

    #[test]
    fn test_ordering() {
        let op = ComparisonOp::Greater;
        assert_eq!(op.evaluate(&"72".into(), &50.0.into()), Bool::True);
        assert_eq!(op.evaluate(&"b".into(), &"a".into()), Bool::True);
        assert_eq!(op.evaluate(&Value::Null, &50.0.into()), Bool::Undefined);
        assert_eq!(op.evaluate(&Value::Undefined, &50.0.into()), Bool::Undefined);
        assert_eq!(op.evaluate(&true.into(), &false.into()), Bool::Undefined);
        assert_eq!(
            ComparisonOp::LessOrEqual.evaluate(&50.0.into(), &50.0.into()),
            Bool::True
        );
    }

    #[test]
    fn test_arithmetic() {
        let add = ArithmeticOp::Add;
        assert_eq!(add.evaluate(&1.0.into(), &"2".into()), Value::Number(3.0));
        assert_eq!(add.evaluate(&Value::Undefined, &1.0.into()), Value::Undefined);
        assert_eq!(add.evaluate(&Value::Null, &1.0.into()), Value::Null);
        assert_eq!(add.evaluate(&Value::Null, &Value::Undefined), Value::Undefined);
        assert_eq!(add.evaluate(&"x".into(), &1.0.into()), Value::Undefined);
        assert_eq!(
            ArithmeticOp::Modulo.evaluate(&7.0.into(), &4.0.into()),
            Value::Number(3.0)
        );
    }

    #[test]
    fn test_types() {
        assert!(QueryType::Number.accepts(QueryType::Any));
        assert!(QueryType::Number.accepts(QueryType::Null));
        assert!(!QueryType::Number.accepts(QueryType::String));
        assert_eq!(
            QueryType::Number.unify(QueryType::Null),
            Some(QueryType::Number)
        );
        assert_eq!(QueryType::Number.unify(QueryType::String), None);
    }
}
