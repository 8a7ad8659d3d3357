//! Methods callable on strings, lists, dicts, arrays and frames.
//!
//! Only the names listed here can be bound; anything else is an
//! `AttributeError` at lookup time.

use std::rc::Rc;

use super::builtins::{self, Args};
use super::error::ScriptError;
use super::format;
use super::interpreter::{Interpreter, normalize_index};
use super::plotting;
use super::value::{Column, Dict, Frame, Value, py_cmp, py_eq};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "title", "capitalize", "strip", "lstrip", "rstrip", "replace", "split",
    "join", "startswith", "endswith", "format", "count", "find", "zfill", "center", "ljust",
    "rjust",
];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "index", "count", "sort", "reverse", "copy", "clear",
    "remove",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &["keys", "values", "items", "get", "update", "copy", "pop", "setdefault"];
const ARRAY_METHODS: &[&str] = &[
    "mean", "sum", "min", "max", "std", "median", "tolist", "cumsum", "round", "copy", "argmax",
    "argmin", "plot",
];
const FRAME_METHODS: &[&str] = &["plot", "head", "tail", "copy", "sort_values"];

fn methods_for(receiver: &Value) -> &'static [&'static str] {
    match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Frame(_) => FRAME_METHODS,
        _ => &[],
    }
}

/// Bind `name` to `receiver` if it is an allowed method.
pub fn bind(receiver: &Value, name: &str) -> Option<Value> {
    methods_for(receiver)
        .iter()
        .find(|m| **m == name)
        .map(|m| Value::Method(Box::new(receiver.clone()), m))
}

pub fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &'static str,
    args: Args,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Str(s) => str_method(interp, s, name, &args),
        Value::List(_) => list_method(interp, receiver, name, &args),
        Value::Tuple(items) => sequence_query(items, name, &args, "tuple"),
        Value::Dict(_) => dict_method(interp, receiver, name, &args),
        Value::Array(items) => array_method(interp, items, name, args),
        Value::Frame(frame) => {
            let frame = frame.borrow().clone();
            frame_method(interp, &frame, name, args)
        }
        other => Err(ScriptError::attribute(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn string_arg<'a>(args: &'a Args, index: usize, name: &str) -> Result<&'a str, ScriptError> {
    let value = args.require(index, name)?;
    value.as_str().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{}() argument must be str, not {}",
            args.name(),
            value.type_name()
        ))
    })
}

fn optional_chars(args: &Args) -> Result<Option<Vec<char>>, ScriptError> {
    match args.get(0, "chars") {
        None => Ok(None),
        Some(_) => Ok(Some(string_arg(args, 0, "chars")?.chars().collect())),
    }
}

fn pad_to(s: &str, args: &Args, align: char) -> Result<String, ScriptError> {
    let width = args.integer(0, "width")?.unwrap_or(0).max(0) as usize;
    let fill = match args.get(1, "fillchar") {
        None => ' ',
        Some(_) => {
            let fill = string_arg(args, 1, "fillchar")?;
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ScriptError::type_error(
                        "The fill character must be exactly one character long",
                    ));
                }
            }
        }
    };
    let len = s.chars().count();
    if width <= len {
        return Ok(s.to_string());
    }
    let total = width - len;
    let (left, right) = match align {
        '<' => (0, total),
        '>' => (total, 0),
        _ => (total / 2, total - total / 2),
    };
    let fill = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    Ok(format!("{}{}{}", fill(left), s, fill(right)))
}

fn str_method(interp: &mut Interpreter<'_>, s: &str, name: &str, args: &Args) -> Result<Value, ScriptError> {
    let text = match name {
        "upper" => s.to_uppercase(),
        "lower" => s.to_lowercase(),
        "title" => title_case(s),
        "capitalize" => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = optional_chars(args)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            match name {
                "strip" => s.trim_matches(matches).to_string(),
                "lstrip" => s.trim_start_matches(matches).to_string(),
                _ => s.trim_end_matches(matches).to_string(),
            }
        }
        "replace" => {
            let old = string_arg(args, 0, "old")?;
            let new = string_arg(args, 1, "new")?;
            let count = args.integer(2, "count")?.unwrap_or(-1);
            let occurrences = if old.is_empty() { s.chars().count() + 1 } else { s.matches(old).count() };
            interp
                .meter()
                .check_len(s.len() + occurrences.saturating_mul(new.len()))?;
            if count < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, count as usize)
            }
        }
        "split" => {
            let maxsplit = args.integer(1, "maxsplit")?.unwrap_or(-1);
            let parts: Vec<Value> = match args.get(0, "sep") {
                None => {
                    let words = s.split_whitespace().map(Value::str);
                    if maxsplit < 0 {
                        words.collect()
                    } else {
                        split_whitespace_n(s, maxsplit as usize)
                    }
                }
                Some(_) => {
                    let sep = string_arg(args, 0, "sep")?;
                    if sep.is_empty() {
                        return Err(ScriptError::value("empty separator"));
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(Value::str).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep).map(Value::str).collect()
                    }
                }
            };
            return Ok(Value::list(parts));
        }
        "join" => {
            let items = args.require(0, "iterable")?.iter_values(interp.max_len())?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )));
                    }
                }
            }
            let total = parts.iter().map(String::len).sum::<usize>() + s.len() * parts.len();
            interp.meter().check_len(total)?;
            parts.join(s)
        }
        "startswith" | "endswith" => {
            let candidates = match args.require(0, "prefix")? {
                Value::Tuple(options) => options.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                _ => vec![string_arg(args, 0, "prefix")?.to_string()],
            };
            let hit = candidates.iter().any(|c| {
                if name == "startswith" { s.starts_with(c.as_str()) } else { s.ends_with(c.as_str()) }
            });
            return Ok(Value::Bool(hit));
        }
        "format" => format::str_format(s, args.positional(), args.keywords())?,
        "count" => {
            let sub = string_arg(args, 0, "sub")?;
            let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
            return Ok(Value::Num(n as f64));
        }
        "find" => {
            let sub = string_arg(args, 0, "sub")?;
            let index = s.find(sub).map(|byte| s[..byte].chars().count() as f64).unwrap_or(-1.0);
            return Ok(Value::Num(index));
        }
        "zfill" => {
            let width = args.integer(0, "width")?.unwrap_or(0).max(0) as usize;
            interp.meter().check_len(width)?;
            let len = s.chars().count();
            if width <= len {
                s.to_string()
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                format!("{}{}{}", sign, "0".repeat(width - len), digits)
            }
        }
        "center" | "ljust" | "rjust" => {
            let width = args.integer(0, "width")?.unwrap_or(0).max(0) as usize;
            interp.meter().check_len(width)?;
            let align = match name {
                "ljust" => '<',
                "rjust" => '>',
                _ => '^',
            };
            pad_to(s, args, align)?
        }
        _ => return Err(unknown(name, "str")),
    };
    interp.meter().check_len(text.len())?;
    Ok(Value::str(text))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

fn split_whitespace_n(s: &str, maxsplit: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == maxsplit {
            parts.push(Value::str(rest));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::str(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn unknown(name: &str, type_name: &str) -> ScriptError {
    ScriptError::attribute(format!("'{}' object has no attribute '{}'", type_name, name))
}

fn sequence_query(items: &[Value], name: &str, args: &Args, type_name: &str) -> Result<Value, ScriptError> {
    let needle = args.require(0, "value")?;
    match name {
        "index" => items
            .iter()
            .position(|v| py_eq(v, needle))
            .map(|i| Value::Num(i as f64))
            .ok_or_else(|| ScriptError::value(format!("{} is not in {}", needle.repr(), type_name))),
        "count" => Ok(Value::Num(items.iter().filter(|v| py_eq(v, needle)).count() as f64)),
        _ => Err(unknown(name, type_name)),
    }
}

fn list_method(interp: &mut Interpreter<'_>, receiver: &Value, name: &str, args: &Args) -> Result<Value, ScriptError> {
    let Value::List(items) = receiver else {
        return Err(unknown(name, receiver.type_name()));
    };
    match name {
        "append" => {
            let value = args.positional().first().cloned().ok_or_else(|| {
                ScriptError::type_error("list.append() takes exactly one argument (0 given)")
            })?;
            interp.meter().check_len(items.borrow().len() + 1)?;
            interp.check_nesting(std::slice::from_ref(&value), Some(receiver))?;
            interp.meter().allocate(1)?;
            items.borrow_mut().push(value);
        }
        "extend" => {
            let extra = args.require(0, "iterable")?.iter_values(interp.max_len())?;
            interp.meter().check_len(items.borrow().len() + extra.len())?;
            interp.meter().charge(extra.len())?;
            interp.check_nesting(&extra, Some(receiver))?;
            interp.meter().allocate(extra.len())?;
            items.borrow_mut().extend(extra);
        }
        "insert" => {
            let index = args.integer(0, "index")?.unwrap_or(0);
            let value = args.positional().get(1).cloned().ok_or_else(|| {
                ScriptError::type_error("insert expected 2 arguments")
            })?;
            interp.check_nesting(std::slice::from_ref(&value), Some(receiver))?;
            interp.meter().allocate(1)?;
            let mut items = items.borrow_mut();
            interp.meter().check_len(items.len() + 1)?;
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, value);
        }
        "pop" => {
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(ScriptError::index("pop from empty list"));
            }
            let index = args.integer(0, "index")?.unwrap_or(-1);
            let at = normalize_index(index, items.len())
                .ok_or_else(|| ScriptError::index("pop index out of range"))?;
            return Ok(items.remove(at));
        }
        "index" | "count" => return sequence_query(&items.borrow(), name, args, "list"),
        "sort" => {
            let current = items.borrow().to_vec();
            let reverse = args.flag("reverse", false)?;
            let keyed = builtins::with_keys(interp, current, args.kw("key"))?;
            let sorted = builtins::sort_keyed(keyed, reverse)?;
            *items.borrow_mut() = sorted.into();
        }
        "reverse" => items.borrow_mut().reverse(),
        "copy" => return Ok(Value::list(items.borrow().to_vec())),
        "clear" => items.borrow_mut().clear(),
        "remove" => {
            let needle = args.require(0, "value")?;
            let mut items = items.borrow_mut();
            let at = items
                .iter()
                .position(|v| py_eq(v, needle))
                .ok_or_else(|| ScriptError::value("list.remove(x): x not in list"))?;
            items.remove(at);
        }
        _ => return Err(unknown(name, "list")),
    }
    Ok(Value::None)
}

fn dict_method(interp: &mut Interpreter<'_>, receiver: &Value, name: &str, args: &Args) -> Result<Value, ScriptError> {
    let Value::Dict(dict) = receiver else {
        return Err(unknown(name, receiver.type_name()));
    };
    match name {
        "keys" => Ok(Value::list(dict.borrow().keys().cloned().collect())),
        "values" => Ok(Value::list(dict.borrow().values().cloned().collect())),
        "items" => {
            let pairs: Vec<Value> = dict
                .borrow()
                .entries()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect();
            interp.check_nesting(&pairs, None)?;
            Ok(Value::list(pairs))
        }
        "get" => {
            let key = args.require(0, "key")?;
            let found = dict.borrow().get(key).cloned();
            Ok(found.or_else(|| args.get(1, "default").cloned()).unwrap_or(Value::None))
        }
        "update" => {
            let mut updates: Vec<(Value, Value)> = Vec::new();
            if let Some(other) = args.get(0, "other") {
                match other {
                    Value::Dict(other) => updates.extend(other.borrow().entries().iter().cloned()),
                    _ => {
                        return Err(ScriptError::type_error(format!(
                            "'{}' object is not a mapping",
                            other.type_name()
                        )));
                    }
                }
            }
            updates.extend(
                args.keywords()
                    .iter()
                    .map(|(k, v)| (Value::str(k), v.clone())),
            );
            interp.meter().charge(updates.len())?;
            let flat: Vec<Value> = updates.iter().flat_map(|(k, v)| [k.clone(), v.clone()]).collect();
            interp.check_nesting(&flat, Some(receiver))?;
            interp.meter().allocate(flat.len())?;
            let mut dict = dict.borrow_mut();
            for (k, v) in updates {
                dict.insert(k, v)?;
            }
            Ok(Value::None)
        }
        "copy" => {
            let copy: Dict = dict.borrow().clone();
            Ok(Value::dict(copy))
        }
        "pop" => {
            let key = args.require(0, "key")?;
            let removed = dict.borrow_mut().remove(key);
            match removed {
                Some(value) => Ok(value),
                None => args
                    .positional()
                    .get(1)
                    .cloned()
                    .ok_or_else(|| ScriptError::key(key.repr())),
            }
        }
        "setdefault" => {
            let key = args.require(0, "key")?;
            let existing = dict.borrow().get(key).cloned();
            match existing {
                Some(value) => Ok(value),
                None => {
                    let default = args.positional().get(1).cloned().unwrap_or(Value::None);
                    interp.check_nesting(&[key.clone(), default.clone()], Some(receiver))?;
                    interp.meter().allocate(2)?;
                    dict.borrow_mut().insert(key.clone(), default.clone())?;
                    Ok(default)
                }
            }
        }
        _ => Err(unknown(name, "dict")),
    }
}

fn arg_extreme(items: &[f64], largest: bool) -> Result<Value, ScriptError> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in items.iter().copied().enumerate() {
        let better = match best {
            None => true,
            Some((_, b)) => (largest && v > b) || (!largest && v < b),
        };
        if better {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| Value::Num(i as f64))
        .ok_or_else(|| ScriptError::value("attempt to get argmax of an empty sequence"))
}

fn array_method(
    interp: &mut Interpreter<'_>,
    items: &Rc<Vec<f64>>,
    name: &str,
    args: Args,
) -> Result<Value, ScriptError> {
    interp.meter().charge(items.len())?;
    match name {
        "mean" => Ok(Value::Num(builtins::mean(items))),
        "sum" => Ok(Value::Num(items.iter().sum())),
        "min" => builtins::reduce(items, "minimum", f64::min).map(Value::Num),
        "max" => builtins::reduce(items, "maximum", f64::max).map(Value::Num),
        "std" => {
            let ddof = args.integer(0, "ddof")?.unwrap_or(0).max(0) as usize;
            Ok(Value::Num(builtins::std_dev(items, ddof)))
        }
        "median" => Ok(Value::Num(builtins::median(items))),
        "tolist" => Ok(Value::list(items.iter().map(|n| Value::Num(*n)).collect())),
        "cumsum" => Ok(Value::array(builtins::cumsum(items))),
        "round" => {
            let decimals = args.integer(0, "decimals")?.unwrap_or(0);
            Ok(Value::array(
                items.iter().map(|n| builtins::round_to(*n, decimals)).collect(),
            ))
        }
        "copy" => Ok(Value::array(items.as_ref().clone())),
        "argmax" => arg_extreme(items, true),
        "argmin" => arg_extreme(items, false),
        "plot" => {
            let frame = Frame {
                columns: vec![(String::new(), Column::Numbers(Rc::clone(items)))],
            };
            plotting::frame_plot(interp, &frame, args)
        }
        _ => Err(unknown(name, "ndarray")),
    }
}

/// Rows of `frame` in the order given by `order`.
pub fn take_rows(frame: &Frame, order: &[usize]) -> Frame {
    let columns = frame
        .columns
        .iter()
        .map(|(name, column)| {
            let column = match column {
                Column::Numbers(items) => Column::Numbers(Rc::new(order.iter().map(|i| items[*i]).collect())),
                Column::Labels(items) => Column::Labels(Rc::new(order.iter().map(|i| items[*i].clone()).collect())),
            };
            (name.clone(), column)
        })
        .collect();
    Frame { columns }
}

fn frame_method(interp: &mut Interpreter<'_>, frame: &Frame, name: &str, args: Args) -> Result<Value, ScriptError> {
    match name {
        "plot" => plotting::frame_plot(interp, frame, args),
        "head" | "tail" => {
            let n = args.integer(0, "n")?.unwrap_or(5).max(0) as usize;
            let rows = frame.rows();
            let sliced = if name == "head" {
                frame.rows_slice(0, n)
            } else {
                frame.rows_slice(rows.saturating_sub(n), rows)
            };
            Ok(Value::frame(sliced))
        }
        "copy" => Ok(Value::frame(frame.clone())),
        "sort_values" => {
            let by = args.require(0, "by")?.py_str();
            let ascending = args.flag("ascending", true)?;
            let column = frame
                .column(&by)
                .ok_or_else(|| ScriptError::key(format!("'{}'", by)))?
                .to_value();
            let keys = column.iter_values(interp.max_len())?;
            interp.meter().charge(keys.len())?;
            let mut order: Vec<usize> = (0..keys.len()).collect();
            let mut failure = None;
            order.sort_by(|a, b| {
                let ordering = py_cmp(&keys[*a], &keys[*b]).unwrap_or_else(|e| {
                    failure.get_or_insert(e);
                    std::cmp::Ordering::Equal
                });
                if ascending { ordering } else { ordering.reverse() }
            });
            if let Some(err) = failure {
                return Err(err);
            }
            Ok(Value::frame(take_rows(frame, &order)))
        }
        _ => Err(unknown(name, "DataFrame")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{InterruptHandle, ResourceLimits, SandboxEnvironment};
    use crate::script::interpreter::Meter;
    use crate::script::parse_program;

    fn eval(source: &str) -> Result<Value, ScriptError> {
        let program = parse_program(source)?;
        let mut env = SandboxEnvironment::new();
        let meter = Meter::new(&ResourceLimits::default(), InterruptHandle::new());
        Interpreter::new(&mut env, meter).run(&program)?;
        Ok(env.lookup("result").unwrap())
    }

    fn repr(source: &str) -> String {
        eval(source).unwrap().repr()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(repr("result = 'monthly sales'.title()"), "'Monthly Sales'");
        assert_eq!(repr("result = '  x  '.strip()"), "'x'");
        assert_eq!(repr("result = 'a,b,,c'.split(',')"), "['a', 'b', '', 'c']");
        assert_eq!(repr("result = ' a  b '.split()"), "['a', 'b']");
        assert_eq!(repr("result = ', '.join(['x', 'y'])"), "'x, y'");
        assert_eq!(repr("result = 'Q{}: {:.1f}'.format(1, 2.26)"), "'Q1: 2.3'");
        assert_eq!(repr("result = '7'.zfill(3)"), "'007'");
        assert_eq!(repr("result = 'ab'.center(6, '*')"), "'**ab**'");
        assert!(eval("result = ', '.join([1, 2])").is_err());
    }

    #[test]
    fn test_list_methods_mutate_in_place() {
        let value = eval("result = [3, 1]\nresult.append(2)\nresult.sort()\nresult.insert(0, 9)\nresult.remove(1)")
            .unwrap();
        assert_eq!(value.repr(), "[9, 2, 3]");
        assert_eq!(repr("xs = [1, 2, 3]\nresult = xs.pop()"), "3");
        assert!(eval("xs = []\nresult = xs.pop()").is_err());
    }

    #[test]
    fn test_dict_methods() {
        assert_eq!(repr("d = {'a': 1}\nresult = d.get('b', 5)"), "5");
        assert_eq!(repr("d = {'a': 1}\nd.update(b=2)\nresult = list(d.items())"), "[('a', 1), ('b', 2)]");
        assert_eq!(repr("d = {'a': 1}\nresult = d.pop('a')"), "1");
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(repr("result = np.array([3, 1, 2]).argmax()"), "0");
        assert_eq!(repr("result = np.array([1, 2, 3]).mean()"), "2");
        assert_eq!(repr("result = np.array([1.26, 2.5]).round(1)"), "[1.3 2.5]");
        assert_eq!(repr("result = np.array([1, 2]).tolist()"), "[1, 2]");
    }

    #[test]
    fn test_frame_methods() {
        let value = eval(
            "df = pd.DataFrame({'name': ['b', 'a', 'c'], 'v': [2, 1, 3]})\nresult = df.sort_values('v', ascending=False).head(2)",
        )
        .unwrap();
        let Value::Frame(frame) = value else { panic!("expected a frame") };
        let frame = frame.borrow();
        assert_eq!(frame.rows(), 2);
        assert_eq!(frame.column("name").unwrap().to_value().repr(), "['c', 'b']");
    }

    #[test]
    fn test_unknown_methods_do_not_bind() {
        assert!(bind(&Value::str("x"), "encode").is_none());
        assert!(bind(&Value::list(vec![]), "append").is_some());
        assert!(eval("result = 'x'.__len__()").is_err());
    }
}
