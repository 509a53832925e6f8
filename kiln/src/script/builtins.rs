//! Built-in globals and the methods of the primitive and container types.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;

use serde::Serialize;

use super::interp::{Abrupt, Flow, Interp, describe_value, enumerable_keys, own_entries};
use super::lexer::Loc;
use super::value::{
    Class, Function, List, Props, Value, number_to_string, string_to_number, to_fixed,
    to_locale_string, to_uint32,
};

const GLOBAL_FUNCTIONS: &[&str] = &[
    "Object",
    "Array",
    "Number",
    "String",
    "Boolean",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "URIError",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "encodeURI",
    "decodeURIComponent",
    "decodeURI",
];

const ERROR_TYPES: &[&str] = &[
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "URIError",
];

const STATIC_FUNCTIONS: &[&str] = &[
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.assign",
    "Object.fromEntries",
    "Object.freeze",
    "Array.isArray",
    "Array.from",
    "Array.of",
    "Number.isInteger",
    "Number.isSafeInteger",
    "Number.isFinite",
    "Number.isNaN",
    "Number.parseFloat",
    "Number.parseInt",
    "String.fromCharCode",
];

const MATH_FUNCTIONS: &[&str] = &[
    "Math.abs",
    "Math.acos",
    "Math.asin",
    "Math.atan",
    "Math.atan2",
    "Math.cbrt",
    "Math.ceil",
    "Math.cos",
    "Math.exp",
    "Math.floor",
    "Math.hypot",
    "Math.log",
    "Math.log10",
    "Math.log2",
    "Math.max",
    "Math.min",
    "Math.pow",
    "Math.random",
    "Math.round",
    "Math.sign",
    "Math.sin",
    "Math.sqrt",
    "Math.tan",
    "Math.trunc",
];

const CONSOLE_FUNCTIONS: &[&str] = &[
    "console.log",
    "console.info",
    "console.warn",
    "console.error",
    "console.debug",
];

const ARRAY_METHODS: &[&str] = &[
    "at",
    "concat",
    "entries",
    "every",
    "fill",
    "filter",
    "find",
    "findIndex",
    "findLast",
    "findLastIndex",
    "flat",
    "flatMap",
    "forEach",
    "includes",
    "indexOf",
    "join",
    "keys",
    "lastIndexOf",
    "map",
    "pop",
    "push",
    "reduce",
    "reduceRight",
    "reverse",
    "shift",
    "slice",
    "some",
    "sort",
    "splice",
    "toString",
    "unshift",
    "values",
];

const STRING_METHODS: &[&str] = &[
    "at",
    "charAt",
    "charCodeAt",
    "codePointAt",
    "concat",
    "endsWith",
    "includes",
    "indexOf",
    "lastIndexOf",
    "localeCompare",
    "padEnd",
    "padStart",
    "repeat",
    "replace",
    "replaceAll",
    "slice",
    "split",
    "startsWith",
    "substr",
    "substring",
    "toLocaleLowerCase",
    "toLocaleUpperCase",
    "toLowerCase",
    "toString",
    "toUpperCase",
    "trim",
    "trimEnd",
    "trimStart",
    "valueOf",
];

const NUMBER_METHODS: &[&str] = &[
    "toFixed",
    "toLocaleString",
    "toPrecision",
    "toString",
    "valueOf",
];

const BOOLEAN_METHODS: &[&str] = &["toString", "valueOf"];

const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString", "valueOf"];

const FUNCTION_METHODS: &[&str] = &["apply", "call", "toString"];

fn native(name: &'static str) -> Value {
    Value::Function(Rc::new(Function::Native(name)))
}

fn namespace(functions: &[&'static str]) -> Props {
    functions
        .iter()
        .map(|name| {
            let key = name.split_once('.').map_or(*name, |(_, key)| key);
            (Rc::from(key), native(*name))
        })
        .collect()
}

/// Look up a global name.
pub(crate) fn global(name: &str) -> Option<Value> {
    let value = match name {
        "undefined" => Value::Undefined,
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        "Math" => {
            let mut props = namespace(MATH_FUNCTIONS);
            for (key, value) in [
                ("PI", std::f64::consts::PI),
                ("E", std::f64::consts::E),
                ("LN2", std::f64::consts::LN_2),
                ("LN10", std::f64::consts::LN_10),
                ("LOG2E", std::f64::consts::LOG2_E),
                ("LOG10E", std::f64::consts::LOG10_E),
                ("SQRT2", std::f64::consts::SQRT_2),
                ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
            ] {
                props.insert(key.into(), Value::Number(value));
            }
            Value::new_object(props)
        }
        "JSON" => Value::new_object(namespace(&["JSON.stringify", "JSON.parse"])),
        "console" => Value::new_object(namespace(CONSOLE_FUNCTIONS)),
        _ => {
            let found = GLOBAL_FUNCTIONS.iter().find(|known| **known == name)?;
            native(*found)
        }
    };
    Some(value)
}

/// Properties of a function value: statics of the built-in constructors,
/// `name`, `length`, and the `Function.prototype` methods.
pub(crate) fn function_member(target: &Value, function: &Rc<Function>, key: &Rc<str>) -> Value {
    if let Function::Native(owner) = &**function {
        if let Some(name) = STATIC_FUNCTIONS
            .iter()
            .find(|name| name.split_once('.') == Some((*owner, &**key)))
        {
            return native(*name);
        }
        if let Some(n) = number_constant(owner, key) {
            return Value::Number(n);
        }
    }
    match &**key {
        "name" => Value::from(function.name()),
        "length" => match &**function {
            Function::Closure { def, .. } => Value::Number(def.params.len() as f64),
            _ => Value::Number(0.0),
        },
        _ => method(target, key).unwrap_or_default(),
    }
}

fn number_constant(owner: &str, key: &str) -> Option<f64> {
    if owner != "Number" {
        return None;
    }
    let n = match key {
        "MAX_SAFE_INTEGER" => 9_007_199_254_740_991.0,
        "MIN_SAFE_INTEGER" => -9_007_199_254_740_991.0,
        "EPSILON" => f64::EPSILON,
        "MAX_VALUE" => f64::MAX,
        "MIN_VALUE" => 5e-324,
        "POSITIVE_INFINITY" => f64::INFINITY,
        "NEGATIVE_INFINITY" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ => return None,
    };
    Some(n)
}

/// The built-in method `name` of `receiver`, bound to it.
pub(crate) fn method(receiver: &Value, name: &Rc<str>) -> Option<Value> {
    let known: &[&str] = match receiver {
        Value::Array(_) => ARRAY_METHODS,
        Value::String(_) => STRING_METHODS,
        Value::Number(_) => NUMBER_METHODS,
        Value::Bool(_) => BOOLEAN_METHODS,
        Value::Object(_) => OBJECT_METHODS,
        Value::Function(_) => FUNCTION_METHODS,
        Value::Undefined | Value::Null => return None,
    };
    known.contains(&&**name).then(|| {
        Value::Function(Rc::new(Function::Method {
            receiver: receiver.clone(),
            name: name.clone(),
        }))
    })
}

/// The UTF-16 code unit at `index`, as a one-unit string.
pub(crate) fn char_at(s: &str, index: usize) -> Option<Value> {
    let unit = s.encode_utf16().nth(index)?;
    Some(Value::from(String::from_utf16_lossy(&[unit])))
}

pub(crate) fn instance_of(value: &Value, function: &Rc<Function>) -> bool {
    let Function::Native(name) = &**function else {
        return false;
    };
    match (*name, value) {
        ("Array", Value::Array(_)) => true,
        ("Object", Value::Array(_) | Value::Object(_) | Value::Function(_)) => true,
        (name, Value::Object(object)) if ERROR_TYPES.contains(&name) => {
            let object = object.borrow();
            object.class == Class::Error
                && (name == "Error"
                    || object
                        .props
                        .get("name")
                        .is_some_and(|n| &*n.to_js_string() == name))
        }
        _ => false,
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// `ToIntegerOrInfinity`, with NaN as zero.
fn integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() { 0.0 } else { n.trunc() }
}

/// Resolve a possibly negative index argument against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = integer(value);
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn callable(interp: &Interp<'_>, value: Value, loc: Loc) -> Flow<Value> {
    if matches!(value, Value::Function(_)) {
        return Ok(value);
    }
    let message = format!("{} is not a function", describe_value(&value));
    Err(interp.type_error(&message, loc))
}

fn error_from_message(interp: &Interp<'_>, message: &str, loc: Loc) -> Abrupt {
    match message.split_once(": ") {
        Some((name, message)) => interp.throw_error(name, message, loc),
        None => interp.throw_error("Error", message, loc),
    }
}

/// Call a free-standing built-in such as `parseInt` or `Math.max`.
pub(crate) fn call_native(
    interp: &mut Interp<'_>,
    name: &str,
    _this: Value,
    args: Vec<Value>,
    loc: Loc,
) -> Flow<Value> {
    if let Some(function) = name.strip_prefix("Math.") {
        return Ok(Value::Number(math(function, &args)));
    }
    if let Some(level) = name.strip_prefix("console.") {
        console(level, &args);
        return Ok(Value::Undefined);
    }
    let value = match name {
        "Object" => match arg(&args, 0) {
            value @ (Value::Object(_) | Value::Array(_) | Value::Function(_)) => value,
            _ => Value::new_object(Props::new()),
        },
        "Array" | "Error" | "TypeError" | "RangeError" | "SyntaxError" | "ReferenceError"
        | "URIError" => return construct(interp, name, args, loc),
        "Number" => Value::Number(args.first().map_or(0.0, Value::to_number)),
        "String" => Value::String(args.first().map_or_else(|| "".into(), Value::to_js_string)),
        "Boolean" => Value::Bool(arg(&args, 0).truthy()),
        "parseInt" | "Number.parseInt" => Value::Number(parse_int(
            &arg(&args, 0).to_js_string(),
            &arg(&args, 1),
        )),
        "parseFloat" | "Number.parseFloat" => {
            Value::Number(parse_float(&arg(&args, 0).to_js_string()))
        }
        "isNaN" => Value::Bool(arg(&args, 0).to_number().is_nan()),
        "isFinite" => Value::Bool(arg(&args, 0).to_number().is_finite()),
        "encodeURIComponent" => Value::from(encode_uri(&arg(&args, 0).to_js_string(), false)),
        "encodeURI" => Value::from(encode_uri(&arg(&args, 0).to_js_string(), true)),
        "decodeURIComponent" | "decodeURI" => match decode_uri(&arg(&args, 0).to_js_string()) {
            Some(text) => Value::from(text),
            None => return Err(interp.throw_error("URIError", "URI malformed", loc)),
        },
        "JSON.stringify" => return json_stringify(interp, &args, loc),
        "JSON.parse" => {
            let text = arg(&args, 0).to_js_string();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Value::from_json(&json),
                Err(err) => return Err(interp.throw_error("SyntaxError", &err.to_string(), loc)),
            }
        }
        "Object.keys" => Value::new_array(enumerable_keys(&arg(&args, 0))),
        "Object.values" | "Object.entries" => {
            let mut entries = Props::new();
            own_entries(&arg(&args, 0), &mut entries);
            let items = entries
                .into_iter()
                .map(|(key, value)| {
                    if name == "Object.values" {
                        value
                    } else {
                        Value::new_array(vec![Value::String(key), value])
                    }
                })
                .collect();
            Value::new_array(items)
        }
        "Object.assign" => {
            let target = arg(&args, 0);
            let Value::Object(object) = &target else {
                return Err(interp.type_error("Cannot convert undefined or null to object", loc));
            };
            for source in args.iter().skip(1) {
                let mut entries = Props::new();
                own_entries(source, &mut entries);
                for value in entries.values() {
                    interp.note_store(&target, value);
                }
                object.borrow_mut().props.extend(entries);
            }
            target.clone()
        }
        "Object.fromEntries" => {
            let mut props = Props::new();
            for entry in interp.iterate(&arg(&args, 0), loc)? {
                let Value::Array(pair) = &entry else {
                    let message = format!(
                        "Iterator value {} is not an entry object",
                        describe_value(&entry)
                    );
                    return Err(interp.type_error(&message, loc));
                };
                let pair = pair.borrow();
                let key = pair.first().cloned().unwrap_or_default().to_property_key();
                props.insert(key, pair.get(1).cloned().unwrap_or_default());
            }
            Value::new_object(props)
        }
        "Object.freeze" => arg(&args, 0),
        "Array.isArray" => Value::Bool(matches!(arg(&args, 0), Value::Array(_))),
        "Array.of" => Value::new_array(args),
        "Array.from" => return array_from(interp, &args, loc),
        "Number.isInteger" => Value::Bool(
            matches!(arg(&args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
        ),
        "Number.isSafeInteger" => Value::Bool(matches!(
            arg(&args, 0),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0
        )),
        "Number.isFinite" => {
            Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_finite()))
        }
        "Number.isNaN" => Value::Bool(matches!(arg(&args, 0), Value::Number(n) if n.is_nan())),
        "String.fromCharCode" => {
            let units: Vec<u16> = args
                .iter()
                .map(|code| (to_uint32(code.to_number()) & 0xFFFF) as u16)
                .collect();
            Value::from(String::from_utf16_lossy(&units))
        }
        other => {
            let message = format!("{other} is not a function");
            return Err(interp.type_error(&message, loc));
        }
    };
    Ok(value)
}

/// `new Name(...)` for the built-in constructors.
pub(crate) fn construct(
    interp: &mut Interp<'_>,
    name: &str,
    args: Vec<Value>,
    loc: Loc,
) -> Flow<Value> {
    match name {
        "Array" => {
            if let [Value::Number(len)] = args[..] {
                if len < 0.0 || len.fract() != 0.0 || len > f64::from(u32::MAX) {
                    return Err(interp.range_error("Invalid array length", loc));
                }
                interp.check_items(len as usize, loc)?;
                return Ok(Value::new_array(vec![Value::Undefined; len as usize]));
            }
            Ok(Value::new_array(args))
        }
        "Object" => call_native(interp, name, Value::Undefined, args, loc),
        "Number" | "String" | "Boolean" => call_native(interp, name, Value::Undefined, args, loc),
        name if ERROR_TYPES.contains(&name) => {
            let message = match args.first() {
                Some(Value::Undefined) | None => "".into(),
                Some(message) => message.to_js_string(),
            };
            Ok(Value::new_error(name, &message))
        }
        other => {
            let message = format!("{other} is not a constructor");
            Err(interp.type_error(&message, loc))
        }
    }
}

/// Call a bound prototype method.
pub(crate) fn call_method(
    interp: &mut Interp<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    loc: Loc,
) -> Flow<Value> {
    match receiver {
        Value::Array(items) => array_method(interp, receiver, items, name, args, loc),
        Value::String(s) => string_method(interp, s, name, args, loc),
        Value::Number(n) => number_method(interp, *n, name, &args, loc),
        Value::Bool(b) => Ok(match name {
            "toString" => Value::from(if *b { "true" } else { "false" }),
            _ => Value::Bool(*b),
        }),
        Value::Object(object) => Ok(match name {
            "hasOwnProperty" => {
                let key = arg(&args, 0).to_property_key();
                Value::Bool(object.borrow().props.contains_key(&*key))
            }
            "toString" => Value::String(receiver.to_js_string()),
            _ => receiver.clone(),
        }),
        Value::Function(_) => match name {
            "call" => {
                let mut args = args.into_iter();
                let this = args.next().unwrap_or_default();
                interp.call(receiver, this, args.collect(), loc)
            }
            "apply" => {
                let this = arg(&args, 0);
                let list = match arg(&args, 1) {
                    Value::Undefined | Value::Null => Vec::new(),
                    other => interp.iterate(&other, loc)?,
                };
                interp.call(receiver, this, list, loc)
            }
            _ => Ok(Value::String(receiver.to_js_string())),
        },
        Value::Undefined | Value::Null => Ok(Value::Undefined),
    }
}

fn math(function: &str, args: &[Value]) -> f64 {
    let x = args.first().map_or(f64::NAN, Value::to_number);
    let y = || args.get(1).map_or(f64::NAN, Value::to_number);
    match function {
        "abs" => x.abs(),
        "acos" => x.acos(),
        "asin" => x.asin(),
        "atan" => x.atan(),
        "atan2" => x.atan2(y()),
        "cbrt" => x.cbrt(),
        "ceil" => x.ceil(),
        "cos" => x.cos(),
        "exp" => x.exp(),
        "floor" => x.floor(),
        "hypot" => args
            .iter()
            .map(|v| v.to_number())
            .fold(0.0, |acc: f64, n| acc.hypot(n)),
        "log" => x.ln(),
        "log10" => x.log10(),
        "log2" => x.log2(),
        "max" => args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
        }),
        "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
        }),
        "pow" => {
            let y = y();
            if y.is_nan() || (x.abs() == 1.0 && y.is_infinite()) {
                f64::NAN
            } else {
                x.powf(y)
            }
        }
        "random" => {
            let bits = RandomState::new().build_hasher().finish();
            (bits >> 11) as f64 / (1u64 << 53) as f64
        }
        "round" => {
            // halves round towards +Infinity
            let floor = x.floor();
            if x - floor >= 0.5 { floor + 1.0 } else { floor }
        }
        "sign" => {
            if x.is_nan() || x == 0.0 { x } else { x.signum() }
        }
        "sin" => x.sin(),
        "sqrt" => x.sqrt(),
        "tan" => x.tan(),
        "trunc" => x.trunc(),
        _ => f64::NAN,
    }
}

fn console(level: &str, args: &[Value]) {
    let line = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.to_string(),
            Value::Array(_) | Value::Object(_) => match value.to_json() {
                Ok(Some(json)) => json.to_string(),
                _ => value.to_js_string().to_string(),
            },
            other => other.to_js_string().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    match level {
        "error" => tracing::error!(target: "kiln::console", "{line}"),
        "warn" => tracing::warn!(target: "kiln::console", "{line}"),
        "debug" => tracing::debug!(target: "kiln::console", "{line}"),
        _ => tracing::info!(target: "kiln::console", "{line}"),
    }
}

fn json_stringify(interp: &mut Interp<'_>, args: &[Value], loc: Loc) -> Flow<Value> {
    let json = match arg(args, 0).to_json() {
        Ok(Some(json)) => json,
        Ok(None) => return Ok(Value::Undefined),
        Err(message) => return Err(error_from_message(interp, message, loc)),
    };
    let indent = match arg(args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        json.serialize(&mut serializer)
            .map(|()| String::from_utf8_lossy(&buf).into_owned())
    };
    match text {
        Ok(text) => {
            interp.check_length(text.len(), loc)?;
            Ok(Value::from(text))
        }
        Err(err) => Err(interp.type_error(&err.to_string(), loc)),
    }
}

fn array_from(interp: &mut Interp<'_>, args: &[Value], loc: Loc) -> Flow<Value> {
    let source = arg(args, 0);
    let items = match &source {
        Value::Array(_) | Value::String(_) => interp.iterate(&source, loc)?,
        Value::Object(object) => {
            // array-like: `{ length: n }`
            let len = object.borrow().props.get("length").map_or(0.0, integer);
            let len = len.max(0.0) as usize;
            interp.check_items(len, loc)?;
            let object = object.borrow();
            (0..len)
                .map(|index| {
                    object
                        .props
                        .get(index.to_string().as_str())
                        .cloned()
                        .unwrap_or_default()
                })
                .collect()
        }
        _ => Vec::new(),
    };
    let mapper = arg(args, 1);
    if matches!(mapper, Value::Undefined) {
        return Ok(Value::new_array(items));
    }
    let mapper = callable(interp, mapper, loc)?;
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        out.push(interp.call(
            &mapper,
            Value::Undefined,
            vec![item, Value::Number(index as f64)],
            loc,
        )?);
    }
    Ok(Value::new_array(out))
}

fn item_at(items: &Rc<RefCell<List>>, index: usize) -> Option<Value> {
    items.borrow().get(index).cloned()
}

/// `SameValueZero`, used by `includes`.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

fn array_method(
    interp: &mut Interp<'_>,
    receiver: &Value,
    items: &Rc<RefCell<List>>,
    name: &str,
    args: Vec<Value>,
    loc: Loc,
) -> Flow<Value> {
    let len = items.borrow().len();
    let value = match name {
        "at" => {
            let index = integer(&arg(&args, 0));
            let index = if index < 0.0 { len as f64 + index } else { index };
            if index < 0.0 {
                Value::Undefined
            } else {
                item_at(items, index as usize).unwrap_or_default()
            }
        }
        "push" => {
            interp.check_items(len + args.len(), loc)?;
            for value in &args {
                interp.note_store(receiver, value);
            }
            let mut items = items.borrow_mut();
            items.extend(args);
            Value::Number(items.len() as f64)
        }
        "pop" => items.borrow_mut().pop().unwrap_or_default(),
        "shift" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
        "unshift" => {
            interp.check_items(len + args.len(), loc)?;
            for value in &args {
                interp.note_store(receiver, value);
            }
            let mut items = items.borrow_mut();
            items.splice(0..0, args).for_each(drop);
            Value::Number(items.len() as f64)
        }
        "slice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let end = relative_index(&arg(&args, 1), len, len);
            let items = items.borrow();
            Value::new_array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "splice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let delete = match args.len() {
                0 => 0,
                1 => len - start,
                _ => (integer(&args[1]).max(0.0) as usize).min(len - start),
            };
            let inserted: Vec<Value> = args.iter().skip(2).cloned().collect();
            interp.check_items(len - delete + inserted.len(), loc)?;
            for value in &inserted {
                interp.note_store(receiver, value);
            }
            let removed: Vec<Value> = items
                .borrow_mut()
                .splice(start..start + delete, inserted)
                .collect();
            Value::new_array(removed)
        }
        "concat" => {
            let mut out = items.borrow().to_vec();
            for value in args {
                match &value {
                    Value::Array(other) => out.extend(other.borrow().iter().cloned()),
                    _ => out.push(value),
                }
                interp.check_items(out.len(), loc)?;
            }
            Value::new_array(out)
        }
        "join" | "toString" => {
            let separator = match arg(&args, 0) {
                Value::Undefined => ",".into(),
                other if name == "join" => other.to_js_string(),
                _ => ",".into(),
            };
            let mut out = String::new();
            for index in 0..len {
                if index > 0 {
                    out.push_str(&separator);
                }
                if let Some(item) = item_at(items, index) {
                    if !item.is_nullish() {
                        out.push_str(&item.to_js_string());
                    }
                }
                interp.check_length(out.len(), loc)?;
            }
            Value::from(out)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            receiver.clone()
        }
        "indexOf" | "lastIndexOf" | "includes" => {
            let needle = arg(&args, 0);
            let snapshot = items.borrow().to_vec();
            let position = match name {
                "includes" => {
                    let from = relative_index(&arg(&args, 1), len, 0);
                    return Ok(Value::Bool(
                        snapshot[from..].iter().any(|item| same_value_zero(item, &needle)),
                    ));
                }
                "indexOf" => {
                    let from = relative_index(&arg(&args, 1), len, 0);
                    snapshot[from..]
                        .iter()
                        .position(|item| item.strict_equals(&needle))
                        .map(|index| index + from)
                }
                _ => snapshot.iter().rposition(|item| item.strict_equals(&needle)),
            };
            Value::Number(position.map_or(-1.0, |index| index as f64))
        }
        "fill" => {
            let value = arg(&args, 0);
            let start = relative_index(&arg(&args, 1), len, 0);
            let end = relative_index(&arg(&args, 2), len, len);
            interp.note_store(receiver, &value);
            for slot in items.borrow_mut().iter_mut().take(end).skip(start) {
                *slot = value.clone();
            }
            receiver.clone()
        }
        "flat" => {
            let depth = match arg(&args, 0) {
                Value::Undefined => 1.0,
                other => integer(&other).min(64.0),
            };
            let mut out = Vec::new();
            flatten(&items.borrow(), depth, &mut out);
            interp.check_items(out.len(), loc)?;
            Value::new_array(out)
        }
        "keys" => Value::new_array((0..len).map(|index| Value::Number(index as f64)).collect()),
        "values" => Value::new_array(items.borrow().to_vec()),
        "entries" => Value::new_array(
            items
                .borrow()
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    Value::new_array(vec![Value::Number(index as f64), item.clone()])
                })
                .collect(),
        ),
        "sort" => {
            let comparator = match arg(&args, 0) {
                Value::Undefined => None,
                other => Some(callable(interp, other, loc)?),
            };
            let snapshot = items.borrow().to_vec();
            let sorted = merge_sort(snapshot, &mut |a: &Value, b: &Value| {
                sort_order(interp, comparator.as_ref(), a, b, loc)
            })?;
            *items.borrow_mut() = List(sorted);
            receiver.clone()
        }
        "reduce" | "reduceRight" => {
            let reducer = callable(interp, arg(&args, 0), loc)?;
            let mut order: Vec<usize> = (0..len).collect();
            if name == "reduceRight" {
                order.reverse();
            }
            let mut order = order.into_iter();
            let mut accumulator = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match order.next().and_then(|index| item_at(items, index)) {
                    Some(first) => first,
                    None => {
                        return Err(interp.type_error(
                            "Reduce of empty array with no initial value",
                            loc,
                        ));
                    }
                },
            };
            for index in order {
                let Some(item) = item_at(items, index) else {
                    continue;
                };
                accumulator = interp.call(
                    &reducer,
                    Value::Undefined,
                    vec![accumulator, item, Value::Number(index as f64), receiver.clone()],
                    loc,
                )?;
            }
            accumulator
        }
        _ => return iterate_with_callback(interp, receiver, items, name, &args, loc),
    };
    Ok(value)
}

/// The array methods that visit each item with a callback.
fn iterate_with_callback(
    interp: &mut Interp<'_>,
    receiver: &Value,
    items: &Rc<RefCell<List>>,
    name: &str,
    args: &[Value],
    loc: Loc,
) -> Flow<Value> {
    let callback = callable(interp, arg(args, 0), loc)?;
    let this = arg(args, 1);
    let len = items.borrow().len();
    let order: Box<dyn Iterator<Item = usize>> = match name {
        "findLast" | "findLastIndex" => Box::new((0..len).rev()),
        _ => Box::new(0..len),
    };
    let mut out = Vec::new();
    for index in order {
        let Some(item) = item_at(items, index) else {
            continue;
        };
        let result = interp.call(
            &callback,
            this.clone(),
            vec![item.clone(), Value::Number(index as f64), receiver.clone()],
            loc,
        )?;
        match name {
            "map" => out.push(result),
            "flatMap" => match &result {
                Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                _ => out.push(result),
            },
            "filter" => {
                if result.truthy() {
                    out.push(item);
                }
            }
            "find" | "findLast" if result.truthy() => return Ok(item),
            "findIndex" | "findLastIndex" if result.truthy() => {
                return Ok(Value::Number(index as f64));
            }
            "some" if result.truthy() => return Ok(Value::Bool(true)),
            "every" if !result.truthy() => return Ok(Value::Bool(false)),
            _ => {}
        }
        interp.check_items(out.len(), loc)?;
    }
    Ok(match name {
        "map" | "filter" | "flatMap" => Value::new_array(out),
        "findIndex" | "findLastIndex" => Value::Number(-1.0),
        "some" => Value::Bool(false),
        "every" => Value::Bool(true),
        _ => Value::Undefined,
    })
}

fn flatten(items: &[Value], depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => flatten(&inner.borrow(), depth - 1.0, out),
            other => out.push(other.clone()),
        }
    }
}

fn sort_order(
    interp: &mut Interp<'_>,
    comparator: Option<&Value>,
    a: &Value,
    b: &Value,
    loc: Loc,
) -> Flow<Ordering> {
    // undefined sorts last and never reaches the comparator
    match (a, b) {
        (Value::Undefined, Value::Undefined) => return Ok(Ordering::Equal),
        (Value::Undefined, _) => return Ok(Ordering::Greater),
        (_, Value::Undefined) => return Ok(Ordering::Less),
        _ => {}
    }
    match comparator {
        Some(comparator) => {
            let n = interp
                .call(comparator, Value::Undefined, vec![a.clone(), b.clone()], loc)?
                .to_number();
            Ok(if n < 0.0 {
                Ordering::Less
            } else if n > 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            })
        }
        None => Ok(a.to_js_string().encode_utf16().cmp(b.to_js_string().encode_utf16())),
    }
}

/// Stable merge sort with a comparator that can fail.
fn merge_sort(
    mut items: Vec<Value>,
    compare: &mut dyn FnMut(&Value, &Value) -> Flow<Ordering>,
) -> Flow<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if compare(a, b)? == Ordering::Greater {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|index| index + from)
}

fn rfind_units(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// Expand `$&` and `$$` in a replacement string.
fn expand_replacement(replacement: &str, matched: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('&') => {
                    chars.next();
                    out.push_str(matched);
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

fn string_method(
    interp: &mut Interp<'_>,
    s: &Rc<str>,
    name: &str,
    args: Vec<Value>,
    loc: Loc,
) -> Flow<Value> {
    let units = utf16(s);
    let len = units.len();
    let text = |range: &[u16]| Value::from(String::from_utf16_lossy(range));
    let value = match name {
        "at" => {
            let index = integer(&arg(&args, 0));
            let index = if index < 0.0 { len as f64 + index } else { index };
            if index < 0.0 || index >= len as f64 {
                Value::Undefined
            } else {
                text(&units[index as usize..index as usize + 1])
            }
        }
        "charAt" => {
            let index = integer(&arg(&args, 0));
            if index < 0.0 || index >= len as f64 {
                Value::from("")
            } else {
                text(&units[index as usize..index as usize + 1])
            }
        }
        "charCodeAt" => {
            let index = integer(&arg(&args, 0));
            if index < 0.0 || index >= len as f64 {
                Value::Number(f64::NAN)
            } else {
                Value::Number(f64::from(units[index as usize]))
            }
        }
        "codePointAt" => {
            let index = integer(&arg(&args, 0));
            if index < 0.0 || index >= len as f64 {
                Value::Undefined
            } else {
                let rest = &units[index as usize..];
                let code = char::decode_utf16(rest.iter().copied())
                    .next()
                    .map_or(u32::from(rest[0]), |c| c.map_or(u32::from(rest[0]), u32::from));
                Value::Number(f64::from(code))
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for value in &args {
                out.push_str(&value.to_js_string());
            }
            interp.check_length(out.len(), loc)?;
            Value::from(out)
        }
        "includes" | "indexOf" => {
            let needle = utf16(&arg(&args, 0).to_js_string());
            let from = (integer(&arg(&args, 1)).max(0.0) as usize).min(len);
            let found = find_units(&units, &needle, from);
            if name == "includes" {
                Value::Bool(found.is_some())
            } else {
                Value::Number(found.map_or(-1.0, |index| index as f64))
            }
        }
        "lastIndexOf" => {
            let needle = utf16(&arg(&args, 0).to_js_string());
            Value::Number(rfind_units(&units, &needle).map_or(-1.0, |index| index as f64))
        }
        "startsWith" => {
            let needle = utf16(&arg(&args, 0).to_js_string());
            let from = (integer(&arg(&args, 1)).max(0.0) as usize).min(len);
            Value::Bool(units[from..].starts_with(&needle))
        }
        "endsWith" => {
            let needle = utf16(&arg(&args, 0).to_js_string());
            let end = relative_index(&arg(&args, 1), len, len).min(len);
            Value::Bool(units[..end].ends_with(&needle))
        }
        "localeCompare" => {
            let other = arg(&args, 0).to_js_string();
            Value::Number(match (**s).cmp(&*other) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        "padStart" | "padEnd" => {
            let target = integer(&arg(&args, 0)).max(0.0) as usize;
            let filler = match arg(&args, 1) {
                Value::Undefined => " ".into(),
                other => other.to_js_string(),
            };
            let filler = utf16(&filler);
            if target <= len || filler.is_empty() {
                Value::String(s.clone())
            } else {
                interp.check_length(target, loc)?;
                let pad: Vec<u16> = filler.iter().copied().cycle().take(target - len).collect();
                let mut out = String::from_utf16_lossy(&pad);
                if name == "padStart" {
                    out.push_str(s);
                } else {
                    out.insert_str(0, s);
                }
                Value::from(out)
            }
        }
        "repeat" => {
            let count = integer(&arg(&args, 0));
            if count < 0.0 || count.is_infinite() {
                let message = format!("Invalid count value: {}", number_to_string(count));
                return Err(interp.range_error(&message, loc));
            }
            interp.check_length(s.len().saturating_mul(count as usize), loc)?;
            Value::from(s.repeat(count as usize))
        }
        "replace" | "replaceAll" => {
            let pattern = arg(&args, 0).to_js_string();
            let replacement = arg(&args, 1);
            let mut out = String::with_capacity(s.len());
            let mut rest: &str = s;
            let mut offset = 0;
            loop {
                let Some(found) = rest.find(&*pattern) else {
                    break;
                };
                out.push_str(&rest[..found]);
                let with = match &replacement {
                    Value::Function(_) => {
                        let position = s[..offset + found].encode_utf16().count();
                        interp
                            .call(
                                &replacement,
                                Value::Undefined,
                                vec![
                                    Value::String(pattern.clone()),
                                    Value::Number(position as f64),
                                    Value::String(s.clone()),
                                ],
                                loc,
                            )?
                            .to_js_string()
                            .to_string()
                    }
                    other => expand_replacement(&other.to_js_string(), &pattern),
                };
                out.push_str(&with);
                interp.check_length(out.len(), loc)?;
                let skip = found + pattern.len();
                offset += skip;
                rest = &rest[skip..];
                if pattern.is_empty() {
                    // step over one character so an empty pattern terminates
                    match rest.chars().next() {
                        Some(c) if name == "replaceAll" => {
                            out.push(c);
                            offset += c.len_utf8();
                            rest = &rest[c.len_utf8()..];
                        }
                        _ => break,
                    }
                }
                if name == "replace" {
                    break;
                }
            }
            out.push_str(rest);
            Value::from(out)
        }
        "slice" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let end = relative_index(&arg(&args, 1), len, len);
            text(&units[start..end.max(start)])
        }
        "substring" => {
            let clamp = |value: &Value, default: usize| match value {
                Value::Undefined => default,
                other => (integer(other).max(0.0) as usize).min(len),
            };
            let a = clamp(&arg(&args, 0), 0);
            let b = clamp(&arg(&args, 1), len);
            text(&units[a.min(b)..a.max(b)])
        }
        "substr" => {
            let start = relative_index(&arg(&args, 0), len, 0);
            let count = match arg(&args, 1) {
                Value::Undefined => len - start,
                other => (integer(&other).max(0.0) as usize).min(len - start),
            };
            text(&units[start..start + count])
        }
        "split" => {
            let limit = match arg(&args, 1) {
                Value::Undefined => usize::MAX,
                other => to_uint32(other.to_number()) as usize,
            };
            let parts: Vec<Value> = match arg(&args, 0) {
                Value::Undefined => vec![Value::String(s.clone())],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        s.chars().map(|c| Value::from(c.to_string())).collect()
                    } else {
                        s.split(&*separator).map(Value::from).collect()
                    }
                }
            };
            interp.check_items(parts.len(), loc)?;
            Value::new_array(parts.into_iter().take(limit).collect())
        }
        "toLowerCase" | "toLocaleLowerCase" => Value::from(s.to_lowercase()),
        "toUpperCase" | "toLocaleUpperCase" => Value::from(s.to_uppercase()),
        "trim" => Value::from(s.trim_matches(is_js_whitespace)),
        "trimStart" => Value::from(s.trim_start_matches(is_js_whitespace)),
        "trimEnd" => Value::from(s.trim_end_matches(is_js_whitespace)),
        _ => Value::String(s.clone()),
    };
    Ok(value)
}

fn number_method(
    interp: &mut Interp<'_>,
    n: f64,
    name: &str,
    args: &[Value],
    loc: Loc,
) -> Flow<Value> {
    let value = match name {
        "toFixed" => {
            let digits = integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(interp.range_error(
                    "toFixed() digits argument must be between 0 and 100",
                    loc,
                ));
            }
            Value::from(to_fixed(n, digits as usize))
        }
        "toLocaleString" => Value::from(to_locale_string(n)),
        "toPrecision" => match arg(args, 0) {
            Value::Undefined => Value::from(number_to_string(n)),
            precision => {
                let precision = integer(&precision);
                if !(1.0..=100.0).contains(&precision) {
                    return Err(interp.range_error(
                        "toPrecision() argument must be between 1 and 100",
                        loc,
                    ));
                }
                Value::from(to_precision(n, precision as usize))
            }
        },
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10.0,
                other => integer(&other),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Err(interp.range_error("toString() radix must be between 2 and 36", loc));
            }
            Value::from(to_radix_string(n, radix as u32))
        }
        _ => Value::Number(n),
    };
    Ok(value)
}

/// `Number.prototype.toPrecision`.
fn to_precision(n: f64, precision: usize) -> String {
    if !n.is_finite() {
        return number_to_string(n);
    }
    if n == 0.0 {
        return to_fixed(0.0, precision - 1);
    }
    let scientific = format!("{:.*e}", precision - 1, n);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -6 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{}", exponent.abs());
    }
    let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
    format!("{n:.decimals$}")
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return number_to_string(n);
    }
    let negative = n < 0.0;
    let n = n.abs();
    let mut int_part = n.trunc();
    let mut digits = Vec::new();
    loop {
        let digit = (int_part % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        int_part = (int_part / f64::from(radix)).trunc();
        if int_part < 1.0 {
            break;
        }
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(digits.iter().rev());
    let mut fraction = n.fract();
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..52 {
            fraction *= f64::from(radix);
            let digit = fraction.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            fraction = fraction.fract();
            if fraction == 0.0 {
                break;
            }
        }
    }
    out
}

/// Global `parseInt`.
fn parse_int(text: &str, radix: &Value) -> f64 {
    let text = text.trim_start_matches(is_js_whitespace);
    let (negative, text) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut radix = match radix {
        Value::Undefined => 0,
        other => to_uint32(other.to_number()) as i32,
    };
    let has_hex_prefix = matches!(text.get(..2), Some("0x" | "0X"));
    let text = if (radix == 0 || radix == 16) && has_hex_prefix {
        radix = 16;
        &text[2..]
    } else {
        text
    };
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0;
    let mut any = false;
    for c in text.chars() {
        let Some(digit) = c.to_digit(radix as u32) else {
            break;
        };
        value = value * f64::from(radix) + f64::from(digit);
        any = true;
    }
    if !any {
        return f64::NAN;
    }
    if negative { -value } else { value }
}

/// Global `parseFloat`: the longest numeric prefix.
fn parse_float(text: &str) -> f64 {
    let text = text.trim_start_matches(is_js_whitespace);
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return string_to_number(&text[..end + "Infinity".len()]);
    }
    let digits_from = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };
    let int_end = digits_from(end);
    let mut number_end = int_end;
    if bytes.get(int_end) == Some(&b'.') {
        number_end = digits_from(int_end + 1);
    }
    let mantissa_digits = text[end..number_end].bytes().filter(u8::is_ascii_digit).count();
    if mantissa_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(number_end), Some(b'e' | b'E')) {
        let mut exponent = number_end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = digits_from(exponent);
        if exponent_end > exponent {
            number_end = exponent_end;
        }
    }
    text[..number_end].parse().unwrap_or(f64::NAN)
}

fn encode_uri(text: &str, keep_reserved: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let unreserved = c.is_ascii_alphanumeric() || "-_.!~*'()".contains(c);
        let reserved = keep_reserved && ";,/?:@&=+$#".contains(c);
        if unreserved || reserved {
            out.push(c);
            continue;
        }
        let mut buf = [0; 4];
        for byte in c.encode_utf8(&mut buf).bytes() {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_uri(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut at = 0;
    while at < bytes.len() {
        if bytes[at] == b'%' {
            let hex = text.get(at + 1..at + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            at += 3;
        } else {
            out.push(bytes[at]);
            at += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_follows_prefix_rules() {
        assert_eq!(parse_int("  42px", &Value::Undefined), 42.0);
        assert_eq!(parse_int("-0x1F", &Value::Undefined), -31.0);
        assert_eq!(parse_int("101", &Value::Number(2.0)), 5.0);
        assert!(parse_int("px", &Value::Undefined).is_nan());
        assert!(parse_int("1", &Value::Number(40.0)).is_nan());
    }

    #[test]
    fn parse_float_takes_the_longest_prefix() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float(" -.5"), -0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("2e"), 2.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn uri_components_round_trip() {
        let encoded = encode_uri("a b&c/é", false);
        assert_eq!(encoded, "a%20b%26c%2F%C3%A9");
        assert_eq!(decode_uri(&encoded).as_deref(), Some("a b&c/é"));
        assert_eq!(encode_uri("/a?b=c d", true), "/a?b=c%20d");
        assert_eq!(decode_uri("%E0%A4%A"), None);
    }

    #[test]
    fn math_round_goes_up_on_halves() {
        assert_eq!(math("round", &[Value::Number(2.5)]), 3.0);
        assert_eq!(math("round", &[Value::Number(-2.5)]), -2.0);
        assert_eq!(math("round", &[Value::Number(0.49999999999999994)]), 0.0);
        assert_eq!(math("max", &[]), f64::NEG_INFINITY);
        assert!(math("min", &[Value::Number(1.0), Value::Number(f64::NAN)]).is_nan());
    }

    #[test]
    fn precision_and_radix_formatting() {
        assert_eq!(to_precision(123.456, 4), "123.5");
        assert_eq!(to_precision(0.000123, 2), "0.00012");
        assert_eq!(to_precision(123456.0, 2), "1.2e+5");
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
    }

    #[test]
    fn replacement_patterns_expand() {
        assert_eq!(expand_replacement("[$&]", "x"), "[x]");
        assert_eq!(expand_replacement("$$1", "x"), "$1");
    }
}
