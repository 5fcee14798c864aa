//! Functions which can be called from conditions.

use super::{
    value::{Bool, QueryType, Value},
    CompilerFlags,
};
use crate::message::Message;

pub enum Implementation {
    /// Called with the evaluated arguments.
    Values(fn(&[Value]) -> Value),
    /// Called with the unparsed argument text and the message.
    Raw(fn(&str, &Message) -> Value),
}

pub struct Builtin {
    pub name: &'static str,
    pub params: &'static [QueryType],
    /// Number of trailing parameters which may be omitted.
    pub optional: usize,
    /// The last parameter may be repeated.
    pub variadic: bool,
    pub returns: QueryType,
    /// Flags required for the builtin to be available.
    pub requires: CompilerFlags,
    pub implementation: Implementation,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

impl Builtin {
    pub fn takes_raw_args(&self) -> bool {
        matches!(self.implementation, Implementation::Raw(_))
    }

    pub fn min_args(&self) -> usize {
        self.params.len() - self.optional
    }

    pub fn max_args(&self) -> Option<usize> {
        if self.variadic {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// The expected type of the n-th argument.
    pub fn param(&self, n: usize) -> QueryType {
        match self.params.get(n) {
            Some(param) => *param,
            None => self.params.last().copied().unwrap_or(QueryType::Any),
        }
    }

    pub fn call(&self, args: &[Value], message: &Message, raw: &str) -> Value {
        match self.implementation {
            Implementation::Values(f) => f(args),
            Implementation::Raw(f) => f(raw, message),
        }
    }
}

use QueryType::{Any, Bool as BoolType, Number, String as StringType};

const fn values(
    name: &'static str,
    params: &'static [QueryType],
    returns: QueryType,
    f: fn(&[Value]) -> Value,
) -> Builtin {
    Builtin {
        name,
        params,
        optional: 0,
        variadic: false,
        returns,
        requires: CompilerFlags::NONE,
        implementation: Implementation::Values(f),
    }
}

const BUILTINS: &[Builtin] = &[
    // math
    values("abs", &[Number], Number, |args| math(args, f64::abs)),
    values("exp", &[Number], Number, |args| math(args, f64::exp)),
    values("power", &[Number, Number], Number, power),
    values("square", &[Number], Number, |args| math(args, |n| n * n)),
    values("ceiling", &[Number], Number, |args| math(args, f64::ceil)),
    values("floor", &[Number], Number, |args| math(args, f64::floor)),
    values("sign", &[Number], Number, |args| math(args, sign)),
    values("sqrt", &[Number], Number, |args| math(args, f64::sqrt)),
    // type checks
    values("as_number", &[Any], Number, |args| match args[0].to_number() {
        Value::Number(n) => Value::Number(n),
        _ => Value::Undefined,
    }),
    values("is_bool", &[Any], BoolType, |args| {
        matches!(args[0], Value::Bool(b) if b.is_defined()).into()
    }),
    values("is_defined", &[Any], BoolType, |args| {
        args[0].is_defined().into()
    }),
    values("is_null", &[Any], BoolType, |args| {
        matches!(args[0], Value::Null).into()
    }),
    values("is_number", &[Any], BoolType, |args| {
        matches!(args[0], Value::Number(_)).into()
    }),
    values("is_string", &[Any], BoolType, |args| {
        matches!(args[0], Value::String(_)).into()
    }),
    // strings
    Builtin {
        name: "concat",
        params: &[StringType, StringType],
        optional: 0,
        variadic: true,
        returns: StringType,
        requires: CompilerFlags::NONE,
        implementation: Implementation::Values(concat),
    },
    values("length", &[StringType], Number, |args| match &args[0] {
        Value::String(s) => Value::Number(s.chars().count() as f64),
        _ => Value::Undefined,
    }),
    values("lower", &[StringType], StringType, |args| match &args[0] {
        Value::String(s) => Value::String(s.to_lowercase()),
        _ => Value::Undefined,
    }),
    values("upper", &[StringType], StringType, |args| match &args[0] {
        Value::String(s) => Value::String(s.to_uppercase()),
        _ => Value::Undefined,
    }),
    Builtin {
        name: "substring",
        params: &[StringType, Number, Number],
        optional: 1,
        variadic: false,
        returns: StringType,
        requires: CompilerFlags::NONE,
        implementation: Implementation::Values(substring),
    },
    values("index_of", &[StringType, StringType], Number, |args| {
        match (&args[0], &args[1]) {
            (Value::String(s), Value::String(needle)) => Value::Number(match s.find(needle.as_str()) {
                Some(index) => s[..index].chars().count() as f64,
                None => -1.0,
            }),
            _ => Value::Undefined,
        }
    }),
    values("starts_with", &[StringType, StringType], BoolType, |args| {
        strings(args, |s, other| s.starts_with(other))
    }),
    values("ends_with", &[StringType, StringType], BoolType, |args| {
        strings(args, |s, other| s.ends_with(other))
    }),
    values("contains", &[StringType, StringType], BoolType, |args| {
        strings(args, |s, other| s.contains(other))
    }),
    // body queries
    Builtin {
        name: "twin_change_includes",
        params: &[],
        optional: 0,
        variadic: false,
        returns: BoolType,
        requires: CompilerFlags::TWIN_CHANGE_INCLUDES,
        implementation: Implementation::Raw(twin_change_includes),
    },
];

/// Find a builtin by its case insensitive name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS
        .iter()
        .find(|builtin| builtin.name.eq_ignore_ascii_case(name))
}

fn math(args: &[Value], f: fn(f64) -> f64) -> Value {
    match args[0].to_number() {
        Value::Number(n) => {
            let result = f(n);
            if result.is_finite() {
                Value::Number(result)
            } else {
                Value::Undefined
            }
        }
        other => other,
    }
}

fn sign(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n.signum()
    }
}

fn power(args: &[Value]) -> Value {
    match (args[0].to_number(), args[1].to_number()) {
        (Value::Number(base), Value::Number(exp)) => {
            let result = base.powf(exp);
            if result.is_finite() {
                Value::Number(result)
            } else {
                Value::Undefined
            }
        }
        (Value::Undefined, _) | (_, Value::Undefined) => Value::Undefined,
        _ => Value::Null,
    }
}

fn strings<F>(args: &[Value], f: F) -> Value
where
    F: Fn(&str, &str) -> bool,
{
    match (&args[0], &args[1]) {
        (Value::String(a), Value::String(b)) => f(a, b).into(),
        _ => Value::Undefined,
    }
}

fn concat(args: &[Value]) -> Value {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            _ => return Value::Undefined,
        }
    }
    Value::String(result)
}

fn substring(args: &[Value]) -> Value {
    let (s, start) = match (&args[0], args[1].as_number()) {
        (Value::String(s), Some(start)) => (s, start),
        _ => return Value::Undefined,
    };

    let chars = s.chars().count();
    if start < 0.0 || start.trunc() as usize > chars {
        return Value::Undefined;
    }
    let start = start.trunc() as usize;

    let len = match args.get(2).map(Value::as_number) {
        None => chars - start,
        Some(Some(len)) if len >= 0.0 => (len.trunc() as usize).min(chars - start),
        Some(_) => return Value::Undefined,
    };

    Value::String(s.chars().skip(start).take(len).collect())
}

/// A segment of a body query path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// Parse a path like `a.b[0].c`, or `a['b c']`.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, String> {
    let mut segments = vec![];
    let mut chars = path.chars().peekable();
    let mut field = String::new();

    fn flush(field: &mut String, segments: &mut Vec<Segment>) {
        if !field.is_empty() {
            segments.push(Segment::Field(std::mem::take(field)));
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if field.is_empty() && !matches!(segments.last(), Some(Segment::Index(_))) {
                    return Err(format!("Empty path segment in: {path}"));
                }
                flush(&mut field, &mut segments);
            }
            '[' => {
                flush(&mut field, &mut segments);
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => inner.push(c),
                        None => return Err(format!("Missing ']' in: {path}")),
                    }
                }
                let inner = inner.trim();
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('\'') && inner.ends_with('\''))
                        || (inner.starts_with('"') && inner.ends_with('"')));
                if quoted {
                    segments.push(Segment::Field(inner[1..inner.len() - 1].to_string()));
                } else {
                    let index = inner
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid index '{inner}' in: {path}"))?;
                    segments.push(Segment::Index(index));
                }
            }
            c => field.push(c),
        }
    }
    flush(&mut field, &mut segments);

    if segments.is_empty() {
        Err("Empty path".into())
    } else {
        Ok(segments)
    }
}

/// Find the value at the path in the JSON body.
pub fn query<'a>(body: &'a serde_json::Value, path: &[Segment]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(body, |value, segment| match segment {
        Segment::Field(name) => value.get(name.as_str()),
        Segment::Index(index) => value.get(*index),
    })
}

/// Evaluate a body query against the message.
pub fn body_query(path: &[Segment], message: &Message) -> Value {
    match message.json_body() {
        Some(body) => query(&body, path).map_or(Value::Undefined, Value::from),
        None => Value::Undefined,
    }
}

/// Check if a twin change notification includes the property path.
fn twin_change_includes(raw: &str, message: &Message) -> Value {
    let path = match parse_path(raw) {
        Ok(path) => path,
        Err(_) => return Value::Undefined,
    };
    match message.json_body() {
        Some(body) => Bool::from(query(&body, &path).is_some()).into(),
        None => Value::Undefined,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let builtin = lookup(name).unwrap();
        builtin.call(&args, &Message::telemetry(""), "")
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("ABS").is_some());
        assert!(lookup("Starts_With").is_some());
        assert!(lookup("nope").is_none());
        assert!(lookup("twin_change_includes").unwrap().takes_raw_args());
        assert_eq!(lookup("concat").unwrap().max_args(), None);
        assert_eq!(lookup("substring").unwrap().min_args(), 2);
    }

    #[test]
    fn test_math() {
        assert_eq!(call("abs", vec![(-2.0).into()]), Value::Number(2.0));
        assert_eq!(call("abs", vec!["-2".into()]), Value::Number(2.0));
        assert_eq!(call("abs", vec![Value::Null]), Value::Null);
        assert_eq!(call("abs", vec![Value::Undefined]), Value::Undefined);
        assert_eq!(call("sqrt", vec![(-1.0).into()]), Value::Undefined);
        assert_eq!(call("sign", vec![0.0.into()]), Value::Number(0.0));
        assert_eq!(call("sign", vec![(-3.0).into()]), Value::Number(-1.0));
        assert_eq!(
            call("power", vec![2.0.into(), 10.0.into()]),
            Value::Number(1024.0)
        );
        assert_eq!(call("ceiling", vec![1.2.into()]), Value::Number(2.0));
    }

    #[test]
    fn test_types() {
        assert_eq!(call("is_defined", vec![Value::Undefined]), false.into());
        assert_eq!(call("is_defined", vec![Value::Null]), true.into());
        assert_eq!(call("is_null", vec![Value::Null]), true.into());
        assert_eq!(call("is_string", vec!["a".into()]), true.into());
        assert_eq!(call("is_number", vec!["1".into()]), false.into());
        assert_eq!(call("as_number", vec!["1".into()]), Value::Number(1.0));
        assert_eq!(call("as_number", vec!["x".into()]), Value::Undefined);
        assert_eq!(call("is_bool", vec![true.into()]), true.into());
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            call("concat", vec!["a".into(), "b".into(), "c".into()]),
            "abc".into()
        );
        assert_eq!(
            call("concat", vec!["a".into(), Value::Undefined]),
            Value::Undefined
        );
        assert_eq!(call("length", vec!["äbc".into()]), Value::Number(3.0));
        assert_eq!(call("upper", vec!["abc".into()]), "ABC".into());
        assert_eq!(
            call("substring", vec!["hello".into(), 1.0.into()]),
            "ello".into()
        );
        assert_eq!(
            call("substring", vec!["hello".into(), 1.0.into(), 2.0.into()]),
            "el".into()
        );
        assert_eq!(
            call("substring", vec!["hello".into(), 1.0.into(), 10.0.into()]),
            "ello".into()
        );
        assert_eq!(
            call("substring", vec!["hello".into(), 6.0.into()]),
            Value::Undefined
        );
        assert_eq!(
            call("index_of", vec!["hello".into(), "l".into()]),
            Value::Number(2.0)
        );
        assert_eq!(
            call("index_of", vec!["hello".into(), "x".into()]),
            Value::Number(-1.0)
        );
        assert_eq!(
            call("starts_with", vec!["hello".into(), "he".into()]),
            true.into()
        );
        assert_eq!(
            call("contains", vec!["hello".into(), Value::Null]),
            Value::Undefined
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            parse_path("a.b[0]['c d']"),
            Ok(vec![
                Segment::Field("a".into()),
                Segment::Field("b".into()),
                Segment::Index(0),
                Segment::Field("c d".into()),
            ])
        );
        assert_eq!(
            parse_path("a[1].b"),
            Ok(vec![
                Segment::Field("a".into()),
                Segment::Index(1),
                Segment::Field("b".into()),
            ])
        );
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[x]").is_err());
        assert!(parse_path("a[0").is_err());
        assert!(parse_path("").is_err());

        let body = json!({"a": {"b": [{"c d": 42}]}});
        let path = parse_path("a.b[0]['c d']").unwrap();
        assert_eq!(query(&body, &path), Some(&json!(42)));
    }

    #[test]
    fn test_twin_change_includes() {
        let message = Message::telemetry(
            json!({"properties": {"desired": {"telemetry": {"interval": 5}}}}).to_string(),
        );
        let builtin = lookup("twin_change_includes").unwrap();
        assert_eq!(
            builtin.call(&[], &message, "properties.desired.telemetry"),
            true.into()
        );
        assert_eq!(
            builtin.call(&[], &message, "properties.reported"),
            false.into()
        );
    }
}
