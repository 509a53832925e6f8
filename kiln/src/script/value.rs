//! Script values and the conversions between them.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::FunctionDef;
use super::interp::Scope;

pub type Props = IndexMap<Rc<str>, Value>;

/// A script value. Arrays, objects and functions have reference semantics.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<RefCell<List>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Function>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Class {
    #[default]
    Plain,
    /// Created by one of the error constructors
    Error,
}

#[derive(Debug, Default)]
pub struct Object {
    pub props: Props,
    pub class: Class,
}

impl Drop for Object {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.props).into_values().collect());
    }
}

/// Array storage.
#[derive(Debug, Default)]
pub struct List(pub Vec<Value>);

impl Deref for List {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for List {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl Drop for List {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

/// Drop container values without recursing, so that very deep nesting
/// cannot overflow the stack.
fn release(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => {
                if let Ok(cell) = Rc::try_unwrap(items) {
                    let mut list = cell.into_inner();
                    pending.append(&mut list.0);
                }
            }
            Value::Object(object) => {
                if let Ok(cell) = Rc::try_unwrap(object) {
                    let mut object = cell.into_inner();
                    pending.extend(std::mem::take(&mut object.props).into_values());
                }
            }
            _ => {}
        }
    }
}

pub enum Function {
    Closure { def: Rc<FunctionDef>, scope: Rc<Scope> },
    /// A built-in, dispatched by name
    Native(&'static str),
    /// A built-in prototype method together with the value it was read from
    Method { receiver: Value, name: Rc<str> },
}

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Closure { def, .. } => def.name.as_deref().unwrap_or("").to_string(),
            Function::Native(name) => name.rsplit('.').next().unwrap_or(*name).to_string(),
            Function::Method { name, .. } => name.to_string(),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => match items.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => f.write_str("[Array]"),
            },
            Value::Object(object) => match object.try_borrow() {
                Ok(object) => f.debug_map().entries(object.props.iter()).finish(),
                Err(_) => f.write_str("[Object]"),
            },
            Value::Function(function) => fmt::Debug::fmt(function, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

/// Nesting beyond this is treated like a cycle when stringifying.
const MAX_STRINGIFY_DEPTH: usize = 256;

impl Value {
    pub fn new_array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(List(items))))
    }

    pub fn new_object(props: Props) -> Value {
        Value::Object(Rc::new(RefCell::new(Object {
            props,
            class: Class::Plain,
        })))
    }

    /// An error object as the `Error` constructors build it.
    pub fn new_error(name: &str, message: &str) -> Value {
        let mut props = Props::new();
        props.insert("name".into(), Value::from(name));
        props.insert("message".into(), Value::from(message));
        Value::Object(Rc::new(RefCell::new(Object {
            props,
            class: Class::Error,
        })))
    }

    /// Convert parsed JSON into a script value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::new_array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::new_object(
                map.iter()
                    .map(|(key, value)| (Rc::from(key.as_str()), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_) | Value::Function(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) | Value::Object(_) => string_to_number(&self.to_js_string()),
            Value::Function(_) => f64::NAN,
        }
    }

    /// JavaScript `ToString`.
    pub fn to_js_string(&self) -> Rc<str> {
        match self {
            Value::String(s) => s.clone(),
            other => {
                let mut out = String::new();
                other.write_js_string(&mut out, &mut Vec::new());
                out.into()
            }
        }
    }

    /// What `<%= %>` and `<%- %>` emit: nothing for `undefined`/`null`.
    pub fn to_output_string(&self) -> Rc<str> {
        match self {
            Value::Undefined | Value::Null => "".into(),
            other => other.to_js_string(),
        }
    }

    fn write_js_string(&self, out: &mut String, seen: &mut Vec<*const ()>) {
        match self {
            Value::Undefined => out.push_str("undefined"),
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&number_to_string(*n)),
            Value::String(s) => out.push_str(s),
            Value::Array(items) => {
                let id = Rc::as_ptr(items) as *const ();
                if seen.contains(&id) || seen.len() >= MAX_STRINGIFY_DEPTH {
                    return;
                }
                seen.push(id);
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_nullish() {
                        item.write_js_string(out, seen);
                    }
                }
                seen.pop();
            }
            Value::Object(object) => {
                let object = object.borrow();
                match object.class {
                    Class::Error => {
                        let name = object
                            .props
                            .get("name")
                            .map(|v| v.to_js_string())
                            .unwrap_or_else(|| "Error".into());
                        let message = object
                            .props
                            .get("message")
                            .map(|v| v.to_js_string())
                            .unwrap_or_else(|| "".into());
                        out.push_str(&name);
                        if !message.is_empty() {
                            out.push_str(": ");
                            out.push_str(&message);
                        }
                    }
                    Class::Plain => out.push_str("[object Object]"),
                }
            }
            Value::Function(function) => {
                out.push_str("function ");
                out.push_str(&function.name());
                out.push_str("() { [native code] }");
            }
        }
    }

    /// Property key form of a value.
    pub fn to_property_key(&self) -> Rc<str> {
        self.to_js_string()
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::String(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// `ToPrimitive` for the operators: containers become their string form.
    pub fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Function(_) => {
                Value::String(self.to_js_string())
            }
            other => other.clone(),
        }
    }

    /// Convert to JSON the way `JSON.stringify` does. Returns `None` for
    /// values JSON cannot represent (`undefined`, functions).
    pub fn to_json(&self) -> Result<Option<serde_json::Value>, &'static str> {
        self.to_json_inner(&mut Vec::new())
    }

    fn to_json_inner(
        &self,
        seen: &mut Vec<*const ()>,
    ) -> Result<Option<serde_json::Value>, &'static str> {
        let json = match self {
            Value::Undefined | Value::Function(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => {
                let id = Rc::as_ptr(items) as *const ();
                enter(seen, id)?;
                let mut out = Vec::new();
                for item in items.borrow().iter() {
                    out.push(item.to_json_inner(seen)?.unwrap_or(serde_json::Value::Null));
                }
                seen.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(object) => {
                let id = Rc::as_ptr(object) as *const ();
                enter(seen, id)?;
                let mut out = serde_json::Map::new();
                for (key, value) in object.borrow().props.iter() {
                    if let Some(json) = value.to_json_inner(seen)? {
                        out.insert(key.to_string(), json);
                    }
                }
                seen.pop();
                serde_json::Value::Object(out)
            }
        };
        Ok(Some(json))
    }
}

fn enter(seen: &mut Vec<*const ()>, id: *const ()) -> Result<(), &'static str> {
    if seen.contains(&id) {
        return Err("TypeError: Converting circular structure to JSON");
    }
    if seen.len() >= MAX_STRINGIFY_DEPTH {
        return Err("RangeError: Maximum call stack size exceeded");
    }
    seen.push(id);
    Ok(())
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        // -0 serializes as 0
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// JavaScript `Number.prototype.toString()` for radix 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }
    // Rust's shortest exponent form is `1.5e21` / `1e-7`; JS wants `1.5e+21`.
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

/// JavaScript `StringToNumber`.
pub fn string_to_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return 0.0;
    }
    let radix = match text.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&text[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match text {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let valid = text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid {
        return f64::NAN;
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

/// JavaScript `Number.prototype.toFixed`. Exact ties round away from zero.
pub fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    let exact = format!("{:.*}", digits + 30, n.abs());
    let (int_part, frac_part) = exact.split_once('.').unwrap_or((&exact, ""));
    let (kept, rest) = frac_part.split_at(digits.min(frac_part.len()));

    let mut number: Vec<u8> = int_part.bytes().chain(kept.bytes()).collect();
    if rest.as_bytes().first().is_some_and(|d| *d >= b'5') {
        increment_decimal(&mut number);
    }
    let split = number.len() - digits;
    let mut out = String::with_capacity(number.len() + 2);
    if n < 0.0 {
        out.push('-');
    }
    out.push_str(std::str::from_utf8(&number[..split]).unwrap_or("0"));
    if digits > 0 {
        out.push('.');
        out.push_str(std::str::from_utf8(&number[split..]).unwrap_or(""));
    }
    out
}

fn increment_decimal(digits: &mut Vec<u8>) {
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return;
        }
    }
    digits.insert(0, b'1');
}

/// `Number.prototype.toLocaleString()` in the `en-US` shape: grouped
/// thousands and at most three fraction digits.
pub fn to_locale_string(n: f64) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    let fixed = to_fixed(n, 3);
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let negative_zero = grouped == "0" && frac_part.is_empty();
    let mut out = String::new();
    if !negative_zero {
        out.push_str(sign);
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// ECMAScript `ToInt32`, for the bitwise operators.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Canonical array index for a property key, if it is one.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_javascript() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(123456789012.5), "123456789012.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn to_fixed_rounds_ties_up() {
        assert_eq!(to_fixed(1299.99, 2), "1299.99");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(9.995, 2), "9.99");
        assert_eq!(to_fixed(99.5, 0), "100");
        assert_eq!(to_fixed(-1.5, 0), "-2");
        assert_eq!(to_fixed(42.0, 0), "42");
    }

    #[test]
    fn locale_strings_group_thousands() {
        assert_eq!(to_locale_string(1234567.891), "1,234,567.891");
        assert_eq!(to_locale_string(1000.0), "1,000");
        assert_eq!(to_locale_string(-999.5), "-999.5");
        assert_eq!(to_locale_string(0.0), "0");
    }

    #[test]
    fn string_conversion_rules() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("12px").is_nan());
        assert_eq!(Value::Null.to_output_string().as_ref(), "");
        assert_eq!(Value::Bool(true).to_js_string().as_ref(), "true");
    }

    #[test]
    fn loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn arrays_join_with_commas_and_skip_cycles() {
        let inner = Rc::new(RefCell::new(List(vec![Value::Number(1.0), Value::Null])));
        let array = Value::Array(inner.clone());
        inner.borrow_mut().push(array.clone());
        assert_eq!(array.to_js_string().as_ref(), "1,,");
        assert_eq!(
            array.to_json(),
            Err("TypeError: Converting circular structure to JSON")
        );
        inner.borrow_mut().clear();
    }

    #[test]
    fn deeply_nested_values_drop_without_recursion() {
        let mut value = Value::new_array(Vec::new());
        for _ in 0..200_000 {
            value = Value::new_array(vec![value]);
        }
        drop(value);
    }

    #[test]
    fn json_round_trip_keeps_key_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null, "x"]});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), Ok(Some(json)));
    }

    #[test]
    fn integral_numbers_serialize_without_fraction() {
        assert_eq!(Value::Number(3.0).to_json(), Ok(Some(serde_json::json!(3))));
        assert_eq!(Value::Number(f64::NAN).to_json(), Ok(Some(serde_json::Value::Null)));
    }
}
