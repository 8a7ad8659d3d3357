//! Builtin functions and the `np` / `pd` namespaces.

use std::cmp::Ordering;

use rand::Rng;

use super::ast::BinOp;
use super::error::ScriptError;
use super::interpreter::Interpreter;
use super::value::{Column, Dict, Frame, RangeValue, Value, py_cmp};

/// Arguments of one call, with the callee's name for error messages.
#[derive(Debug, Clone)]
pub struct Args {
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(name: &'static str, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            name,
            positional,
            keywords,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keywords(&self) -> &[(String, Value)] {
        &self.keywords
    }

    /// Positional `index` or keyword `name`; an explicit `None` counts as absent.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        match self.positional.get(index) {
            Some(Value::None) => None,
            Some(value) => Some(value),
            None => self.kw(name),
        }
    }

    pub fn kw(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .filter(|v| !matches!(v, Value::None))
    }

    /// The first of several keyword spellings that is present.
    pub fn kw_any(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|name| self.kw(name))
    }

    pub fn require(&self, index: usize, name: &str) -> Result<&Value, ScriptError> {
        self.get(index, name).ok_or_else(|| {
            ScriptError::type_error(format!(
                "{}() missing required argument: '{}'",
                self.name, name
            ))
        })
    }

    pub fn max_positional(&self, max: usize) -> Result<(), ScriptError> {
        if self.positional.len() > max {
            return Err(ScriptError::type_error(format!(
                "{}() takes at most {} positional arguments ({} given)",
                self.name,
                max,
                self.positional.len()
            )));
        }
        Ok(())
    }

    /// Reject keywords outside `allowed`.
    pub fn allow_keywords(&self, allowed: &[&str]) -> Result<(), ScriptError> {
        match self.keywords.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((k, _)) => Err(ScriptError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.name, k
            ))),
            None => Ok(()),
        }
    }

    pub fn no_keywords(&self) -> Result<(), ScriptError> {
        self.allow_keywords(&[])
    }

    pub fn number(&self, index: usize, name: &str) -> Result<Option<f64>, ScriptError> {
        match self.get(index, name) {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "{}() argument '{}' must be a number, not '{}'",
                    self.name,
                    name,
                    value.type_name()
                ))
            }),
        }
    }

    pub fn integer(&self, index: usize, name: &str) -> Result<Option<i64>, ScriptError> {
        self.get(index, name).map(Value::as_index).transpose()
    }

    pub fn text(&self, name: &str) -> Result<Option<String>, ScriptError> {
        match self.kw(name) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.to_string())),
            Some(other) => Err(ScriptError::type_error(format!(
                "{}() argument '{}' must be a string, not '{}'",
                self.name,
                name,
                other.type_name()
            ))),
        }
    }

    pub fn flag(&self, name: &str, default: bool) -> Result<bool, ScriptError> {
        self.kw(name).map(Value::truthy).transpose().map(|v| v.unwrap_or(default))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Range,
    Len,
    Str,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Dict,
    Min,
    Max,
    Sum,
    Abs,
    Round,
    Print,
    Zip,
    Enumerate,
    Sorted,
    Reversed,
}

impl Builtin {
    const ALL: [Builtin; 19] = [
        Self::Range,
        Self::Len,
        Self::Str,
        Self::Int,
        Self::Float,
        Self::Bool,
        Self::List,
        Self::Tuple,
        Self::Dict,
        Self::Min,
        Self::Max,
        Self::Sum,
        Self::Abs,
        Self::Round,
        Self::Print,
        Self::Zip,
        Self::Enumerate,
        Self::Sorted,
        Self::Reversed,
    ];

    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Len => "len",
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Print => "print",
            Self::Zip => "zip",
            Self::Enumerate => "enumerate",
            Self::Sorted => "sorted",
            Self::Reversed => "reversed",
        }
    }
}

pub fn call_builtin(interp: &mut Interpreter<'_>, func: Builtin, args: Args) -> Result<Value, ScriptError> {
    let limit = interp.max_len();
    match func {
        Builtin::Range => {
            args.no_keywords()?;
            args.max_positional(3)?;
            let bounds = args
                .positional()
                .iter()
                .map(Value::as_index)
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(ScriptError::type_error("range expected at least 1 argument, got 0")),
            };
            if step == 0 {
                return Err(ScriptError::value("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(RangeValue { start, stop, step }))
        }
        Builtin::Len => {
            args.no_keywords()?;
            let value = args.require(0, "obj")?;
            value.len().map(|n| Value::Num(n as f64)).ok_or_else(|| {
                ScriptError::type_error(format!(
                    "object of type '{}' has no len()",
                    value.type_name()
                ))
            })
        }
        Builtin::Str => {
            args.max_positional(1)?;
            let text = args.get(0, "object").map(Value::py_str).unwrap_or_default();
            interp.meter().check_len(text.len())?;
            Ok(Value::str(text))
        }
        Builtin::Int => {
            args.max_positional(1)?;
            match args.get(0, "x") {
                None => Ok(Value::Num(0.0)),
                Some(Value::Str(s)) => s
                    .trim()
                    .replace('_', "")
                    .parse::<i64>()
                    .map(|n| Value::Num(n as f64))
                    .map_err(|_| {
                        ScriptError::value(format!("invalid literal for int() with base 10: '{}'", s))
                    }),
                Some(value) => match value.as_f64() {
                    Some(n) if n.is_finite() => Ok(Value::Num(n.trunc())),
                    Some(_) => Err(ScriptError::value("cannot convert float NaN or infinity to integer")),
                    None => Err(ScriptError::type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        value.type_name()
                    ))),
                },
            }
        }
        Builtin::Float => {
            args.max_positional(1)?;
            match args.get(0, "x") {
                None => Ok(Value::Num(0.0)),
                Some(Value::Str(s)) => parse_float(s)
                    .map(Value::Num)
                    .ok_or_else(|| ScriptError::value(format!("could not convert string to float: '{}'", s))),
                Some(value) => value.as_f64().map(Value::Num).ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "float() argument must be a string or a number, not '{}'",
                        value.type_name()
                    ))
                }),
            }
        }
        Builtin::Bool => {
            args.max_positional(1)?;
            match args.positional().first() {
                None => Ok(Value::Bool(false)),
                Some(value) => Ok(Value::Bool(value.truthy()?)),
            }
        }
        Builtin::List | Builtin::Tuple => {
            args.no_keywords()?;
            args.max_positional(1)?;
            let items = match args.get(0, "iterable") {
                None => Vec::new(),
                Some(value) => value.iter_values(limit)?,
            };
            interp.meter().charge(items.len())?;
            Ok(if func == Builtin::List {
                Value::list(items)
            } else {
                Value::tuple(items)
            })
        }
        Builtin::Dict => {
            args.max_positional(1)?;
            let mut dict = Dict::new();
            match args.get(0, "mapping") {
                None => {}
                Some(Value::Dict(source)) => {
                    for (k, v) in source.borrow().entries() {
                        dict.insert(k.clone(), v.clone())?;
                    }
                }
                Some(pairs) => {
                    for pair in pairs.iter_values(limit)? {
                        let (k, v) = two_items(&pair, "dictionary update sequence element")?;
                        dict.insert(k, v)?;
                    }
                }
            }
            for (k, v) in args.keywords() {
                dict.insert(Value::str(k), v.clone())?;
            }
            Ok(Value::dict(dict))
        }
        Builtin::Min | Builtin::Max => extremum(interp, &args, func == Builtin::Max),
        Builtin::Sum => {
            args.allow_keywords(&["start"])?;
            args.max_positional(2)?;
            let items = args.require(0, "iterable")?.iter_values(limit)?;
            let mut total = args.get(1, "start").cloned().unwrap_or(Value::Num(0.0));
            if matches!(total, Value::Str(_)) {
                return Err(ScriptError::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            interp.meter().charge(items.len())?;
            for item in &items {
                total = interp.binary(BinOp::Add, &total, item)?;
            }
            Ok(total)
        }
        Builtin::Abs => {
            args.no_keywords()?;
            match args.require(0, "x")? {
                Value::Array(items) => Ok(Value::array(items.iter().map(|n| n.abs()).collect())),
                value => value.as_f64().map(|n| Value::Num(n.abs())).ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        value.type_name()
                    ))
                }),
            }
        }
        Builtin::Round => {
            args.max_positional(2)?;
            let digits = args.integer(1, "ndigits")?;
            match args.require(0, "number")? {
                Value::Array(items) => Ok(Value::array(
                    items.iter().map(|n| round_to(*n, digits.unwrap_or(0))).collect(),
                )),
                value => {
                    let n = value.as_f64().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "type {} doesn't define __round__ method",
                            value.type_name()
                        ))
                    })?;
                    if digits.is_none() && !n.is_finite() {
                        return Err(ScriptError::value("cannot convert float NaN or infinity to integer"));
                    }
                    Ok(Value::Num(round_to(n, digits.unwrap_or(0))))
                }
            }
        }
        Builtin::Print => {
            args.allow_keywords(&["sep", "end", "flush"])?;
            let sep = args.text("sep")?.unwrap_or_else(|| " ".to_string());
            let line = args
                .positional()
                .iter()
                .map(Value::py_str)
                .collect::<Vec<_>>()
                .join(&sep);
            tracing::debug!(target: "vizbox::script", output = %line, "Snippet printed");
            Ok(Value::None)
        }
        Builtin::Zip => {
            args.no_keywords()?;
            let columns = args
                .positional()
                .iter()
                .map(|v| v.iter_values(limit))
                .collect::<Result<Vec<_>, _>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            interp.meter().charge(rows * columns.len())?;
            let rows: Vec<Value> = (0..rows)
                .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                .collect();
            interp.check_nesting(&rows, None)?;
            Ok(Value::list(rows))
        }
        Builtin::Enumerate => {
            args.allow_keywords(&["start"])?;
            let items = args.require(0, "iterable")?.iter_values(limit)?;
            let start = args.integer(1, "start")?.unwrap_or(0);
            interp.meter().charge(items.len())?;
            let pairs: Vec<Value> = items
                .into_iter()
                .enumerate()
                .map(|(i, v)| Value::tuple(vec![Value::Num((start + i as i64) as f64), v]))
                .collect();
            interp.check_nesting(&pairs, None)?;
            Ok(Value::list(pairs))
        }
        Builtin::Sorted => {
            args.allow_keywords(&["key", "reverse"])?;
            args.max_positional(1)?;
            let items = args.require(0, "iterable")?.iter_values(limit)?;
            let reverse = args.flag("reverse", false)?;
            let keyed = with_keys(interp, items, args.kw("key"))?;
            Ok(Value::list(sort_keyed(keyed, reverse)?))
        }
        Builtin::Reversed => {
            args.no_keywords()?;
            let mut items = args.require(0, "sequence")?.iter_values(limit)?;
            items.reverse();
            Ok(Value::list(items))
        }
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim().replace('_', "");
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn two_items(value: &Value, what: &str) -> Result<(Value, Value), ScriptError> {
    let items = value.iter_values(2)?;
    match <[Value; 2]>::try_from(items) {
        Ok([a, b]) => Ok((a, b)),
        Err(items) => Err(ScriptError::value(format!(
            "{} has length {}; 2 is required",
            what,
            items.len()
        ))),
    }
}

/// Round half to even at `digits` decimal places, as Python and numpy do.
pub fn round_to(n: f64, digits: i64) -> f64 {
    if !n.is_finite() {
        return n;
    }
    let factor = 10f64.powi(digits.clamp(-300, 300) as i32);
    let scaled = n * factor;
    if !scaled.is_finite() {
        return n;
    }
    scaled.round_ties_even() / factor
}

pub(crate) fn with_keys(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    key: Option<&Value>,
) -> Result<Vec<(Value, Value)>, ScriptError> {
    interp.meter().charge(items.len())?;
    match key {
        None => Ok(items.into_iter().map(|v| (v.clone(), v)).collect()),
        Some(key) => items
            .into_iter()
            .map(|v| {
                let k = interp.call(key.clone(), vec![v.clone()], Vec::new())?;
                Ok((k, v))
            })
            .collect(),
    }
}

pub(crate) fn sort_keyed(mut keyed: Vec<(Value, Value)>, reverse: bool) -> Result<Vec<Value>, ScriptError> {
    let mut failure = None;
    keyed.sort_by(|a, b| {
        let (x, y) = if reverse { (&b.0, &a.0) } else { (&a.0, &b.0) };
        py_cmp(x, y).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(keyed.into_iter().map(|(_, v)| v).collect()),
    }
}

fn extremum(interp: &mut Interpreter<'_>, args: &Args, largest: bool) -> Result<Value, ScriptError> {
    args.allow_keywords(&["key", "default"])?;
    let items = match args.positional() {
        [] => {
            return Err(ScriptError::type_error(format!(
                "{} expected at least 1 argument, got 0",
                args.name()
            )));
        }
        [single] => single.iter_values(interp.max_len())?,
        many => many.to_vec(),
    };
    if items.is_empty() {
        return args.kw("default").cloned().ok_or_else(|| {
            ScriptError::value(format!("{}() arg is an empty sequence", args.name()))
        });
    }
    let keyed = with_keys(interp, items, args.kw("key"))?;
    let mut best: Option<(Value, Value)> = None;
    for (k, v) in keyed {
        let better = match &best {
            None => true,
            Some((best_key, _)) => {
                let ordering = py_cmp(&k, best_key)?;
                if largest { ordering == Ordering::Greater } else { ordering == Ordering::Less }
            }
        };
        if better {
            best = Some((k, v));
        }
    }
    Ok(best.map(|(_, v)| v).unwrap_or(Value::None))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumpyFn {
    Linspace,
    Arange,
    Array,
    Zeros,
    Ones,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Log10,
    Sqrt,
    Abs,
    Sum,
    Mean,
    Median,
    Std,
    Min,
    Max,
    Cumsum,
    Round,
    RandomSeed,
    RandomRand,
    RandomRandn,
    RandomRandint,
    RandomNormal,
    RandomUniform,
    RandomChoice,
}

impl NumpyFn {
    const TOP_LEVEL: [NumpyFn; 21] = [
        Self::Linspace,
        Self::Arange,
        Self::Array,
        Self::Zeros,
        Self::Ones,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Exp,
        Self::Log,
        Self::Log10,
        Self::Sqrt,
        Self::Abs,
        Self::Sum,
        Self::Mean,
        Self::Median,
        Self::Std,
        Self::Min,
        Self::Max,
        Self::Cumsum,
        Self::Round,
    ];

    const RANDOM: [NumpyFn; 7] = [
        Self::RandomSeed,
        Self::RandomRand,
        Self::RandomRandn,
        Self::RandomRandint,
        Self::RandomNormal,
        Self::RandomUniform,
        Self::RandomChoice,
    ];

    pub fn from_name(name: &str) -> Option<NumpyFn> {
        match name {
            "asarray" => Some(Self::Array),
            "absolute" => Some(Self::Abs),
            "amin" => Some(Self::Min),
            "amax" => Some(Self::Max),
            "around" => Some(Self::Round),
            _ => Self::TOP_LEVEL.into_iter().find(|f| f.name() == name),
        }
    }

    /// Functions of `np.random`.
    pub fn from_random_name(name: &str) -> Option<NumpyFn> {
        Self::RANDOM
            .into_iter()
            .find(|f| f.name().strip_prefix("random.") == Some(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linspace => "linspace",
            Self::Arange => "arange",
            Self::Array => "array",
            Self::Zeros => "zeros",
            Self::Ones => "ones",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Std => "std",
            Self::Min => "min",
            Self::Max => "max",
            Self::Cumsum => "cumsum",
            Self::Round => "round",
            Self::RandomSeed => "random.seed",
            Self::RandomRand => "random.rand",
            Self::RandomRandn => "random.randn",
            Self::RandomRandint => "random.randint",
            Self::RandomNormal => "random.normal",
            Self::RandomUniform => "random.uniform",
            Self::RandomChoice => "random.choice",
        }
    }
}

fn numbers_arg(interp: &Interpreter<'_>, args: &Args, index: usize, name: &str) -> Result<Vec<f64>, ScriptError> {
    args.require(index, name)?.to_numbers(interp.max_len())
}

/// Apply `f` to a scalar or to every element of a sequence.
fn map_numbers(
    interp: &mut Interpreter<'_>,
    value: &Value,
    f: impl Fn(f64) -> f64,
) -> Result<Value, ScriptError> {
    match value {
        Value::Num(_) | Value::Bool(_) => Ok(Value::Num(f(value.as_f64().unwrap_or_default()))),
        other => {
            let items = other.to_numbers(interp.max_len())?;
            interp.meter().charge(items.len())?;
            Ok(Value::array(items.into_iter().map(f).collect()))
        }
    }
}

/// Length of a `size=` / shape argument: an integer or a one-element tuple.
fn shape_len(interp: &Interpreter<'_>, value: &Value) -> Result<usize, ScriptError> {
    let n = match value {
        Value::Tuple(items) if items.len() == 1 => items[0].as_index()?,
        Value::List(items) if items.borrow().len() == 1 => items.borrow()[0].as_index()?,
        Value::Tuple(_) | Value::List(_) => {
            return Err(ScriptError::value("only one-dimensional arrays are supported"));
        }
        other => other.as_index()?,
    };
    if n < 0 {
        return Err(ScriptError::value("negative dimensions are not allowed"));
    }
    interp_check_len(interp, n as usize)
}

fn interp_check_len(interp: &Interpreter<'_>, len: usize) -> Result<usize, ScriptError> {
    if len > interp.max_len() {
        return Err(ScriptError::limit(format!(
            "array of {} elements exceeds the limit of {}",
            len,
            interp.max_len()
        )));
    }
    Ok(len)
}

pub(crate) fn reduce(values: &[f64], name: &str, f: impl Fn(f64, f64) -> f64) -> Result<f64, ScriptError> {
    values.iter().copied().reduce(f).ok_or_else(|| {
        ScriptError::value(format!(
            "zero-size array to reduction operation {} which has no identity",
            name
        ))
    })
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation (numpy's default `ddof=0`).
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - ddof) as f64;
    var.sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub(crate) fn cumsum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Draw `size` samples (or one scalar when `size` is absent).
fn sample(
    interp: &mut Interpreter<'_>,
    size: Option<&Value>,
    mut draw: impl FnMut(&mut Interpreter<'_>) -> f64,
) -> Result<Value, ScriptError> {
    match size {
        None => Ok(Value::Num(draw(interp))),
        Some(size) => {
            let n = shape_len(interp, size)?;
            interp.meter().charge(n)?;
            Ok(Value::array((0..n).map(|_| draw(interp)).collect()))
        }
    }
}

fn standard_normal(interp: &mut Interpreter<'_>) -> f64 {
    // Box-Muller; u1 is kept away from zero so ln stays finite.
    let u1: f64 = interp.rng().gen_range(f64::EPSILON..1.0);
    let u2: f64 = interp.rng().gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub fn call_numpy(interp: &mut Interpreter<'_>, func: NumpyFn, args: Args) -> Result<Value, ScriptError> {
    match func {
        NumpyFn::Linspace => {
            let start = args.number(0, "start")?.ok_or_else(|| missing(&args, "start"))?;
            let stop = args.number(1, "stop")?.ok_or_else(|| missing(&args, "stop"))?;
            let num = args.integer(2, "num")?.unwrap_or(50);
            if num < 0 {
                return Err(ScriptError::value(format!(
                    "Number of samples, {}, must be non-negative.",
                    num
                )));
            }
            let num = interp_check_len(interp, num as usize)?;
            let endpoint = args.flag("endpoint", true)?;
            interp.meter().charge(num)?;
            let div = if endpoint { num.saturating_sub(1) } else { num };
            let step = if div == 0 { 0.0 } else { (stop - start) / div as f64 };
            let mut values: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            if endpoint && num > 1 {
                values[num - 1] = stop;
            }
            Ok(Value::array(values))
        }
        NumpyFn::Arange => {
            let first = args.number(0, "start")?.ok_or_else(|| missing(&args, "stop"))?;
            let (start, stop) = match args.number(1, "stop")? {
                Some(stop) => (first, stop),
                None => (0.0, first),
            };
            let step = args.number(2, "step")?.unwrap_or(1.0);
            if step == 0.0 || !step.is_finite() {
                return Err(ScriptError::value("Maximum allowed size exceeded"));
            }
            let count = ((stop - start) / step).ceil();
            if !count.is_finite() {
                return Err(ScriptError::value("arange bounds must be finite"));
            }
            let count = interp_check_len(interp, count.max(0.0) as usize)?;
            interp.meter().charge(count)?;
            Ok(Value::array((0..count).map(|i| start + step * i as f64).collect()))
        }
        NumpyFn::Array => {
            let value = args.require(0, "object")?;
            if let Value::Array(items) = value {
                return Ok(Value::array(items.to_vec()));
            }
            let items = value.iter_values(interp.max_len())?;
            interp.meter().charge(items.len())?;
            if items.iter().all(|v| v.as_f64().is_some()) {
                Ok(Value::array(items.iter().filter_map(Value::as_f64).collect()))
            } else if items.iter().any(|v| matches!(v, Value::List(_) | Value::Tuple(_) | Value::Array(_))) {
                Err(ScriptError::value("only one-dimensional arrays are supported"))
            } else {
                Ok(Value::list(items))
            }
        }
        NumpyFn::Zeros | NumpyFn::Ones => {
            let n = shape_len(interp, args.require(0, "shape")?)?;
            interp.meter().charge(n)?;
            let fill = if func == NumpyFn::Ones { 1.0 } else { 0.0 };
            Ok(Value::array(vec![fill; n]))
        }
        NumpyFn::Sin => map_numbers(interp, args.require(0, "x")?, f64::sin),
        NumpyFn::Cos => map_numbers(interp, args.require(0, "x")?, f64::cos),
        NumpyFn::Tan => map_numbers(interp, args.require(0, "x")?, f64::tan),
        NumpyFn::Exp => map_numbers(interp, args.require(0, "x")?, f64::exp),
        NumpyFn::Log => map_numbers(interp, args.require(0, "x")?, f64::ln),
        NumpyFn::Log10 => map_numbers(interp, args.require(0, "x")?, f64::log10),
        NumpyFn::Sqrt => map_numbers(interp, args.require(0, "x")?, f64::sqrt),
        NumpyFn::Abs => map_numbers(interp, args.require(0, "x")?, f64::abs),
        NumpyFn::Round => {
            let decimals = args.integer(1, "decimals")?.unwrap_or(0);
            map_numbers(interp, args.require(0, "a")?, |n| round_to(n, decimals))
        }
        NumpyFn::Sum => Ok(Value::Num(numbers_arg(interp, &args, 0, "a")?.iter().sum())),
        NumpyFn::Mean => Ok(Value::Num(mean(&numbers_arg(interp, &args, 0, "a")?))),
        NumpyFn::Median => Ok(Value::Num(median(&numbers_arg(interp, &args, 0, "a")?))),
        NumpyFn::Std => {
            let ddof = args.integer(1, "ddof")?.unwrap_or(0).max(0) as usize;
            Ok(Value::Num(std_dev(&numbers_arg(interp, &args, 0, "a")?, ddof)))
        }
        NumpyFn::Min => Ok(Value::Num(reduce(&numbers_arg(interp, &args, 0, "a")?, "minimum", f64::min)?)),
        NumpyFn::Max => Ok(Value::Num(reduce(&numbers_arg(interp, &args, 0, "a")?, "maximum", f64::max)?)),
        NumpyFn::Cumsum => Ok(Value::array(cumsum(&numbers_arg(interp, &args, 0, "a")?))),
        NumpyFn::RandomSeed => {
            let seed = args.integer(0, "seed")?.unwrap_or(0);
            interp.reseed(seed as u64);
            Ok(Value::None)
        }
        NumpyFn::RandomRand => {
            args.max_positional(1)?;
            let size = args.positional().first().cloned();
            sample(interp, size.as_ref(), |i| i.rng().gen_range(0.0..1.0))
        }
        NumpyFn::RandomRandn => {
            args.max_positional(1)?;
            let size = args.positional().first().cloned();
            sample(interp, size.as_ref(), standard_normal)
        }
        NumpyFn::RandomRandint => {
            let first = args.integer(0, "low")?.ok_or_else(|| missing(&args, "low"))?;
            let (low, high) = match args.integer(1, "high")? {
                Some(high) => (first, high),
                None => (0, first),
            };
            if low >= high {
                return Err(ScriptError::value("low >= high"));
            }
            let size = args.get(2, "size").cloned();
            sample(interp, size.as_ref(), |i| i.rng().gen_range(low..high) as f64)
        }
        NumpyFn::RandomNormal => {
            let loc = args.number(0, "loc")?.unwrap_or(0.0);
            let scale = args.number(1, "scale")?.unwrap_or(1.0);
            if scale < 0.0 {
                return Err(ScriptError::value("scale < 0"));
            }
            let size = args.get(2, "size").cloned();
            sample(interp, size.as_ref(), |i| loc + scale * standard_normal(i))
        }
        NumpyFn::RandomUniform => {
            let low = args.number(0, "low")?.unwrap_or(0.0);
            let high = args.number(1, "high")?.unwrap_or(1.0);
            let size = args.get(2, "size").cloned();
            sample(interp, size.as_ref(), |i| {
                let u: f64 = i.rng().gen_range(0.0..1.0);
                low + (high - low) * u
            })
        }
        NumpyFn::RandomChoice => random_choice(interp, &args),
    }
}

fn random_choice(interp: &mut Interpreter<'_>, args: &Args) -> Result<Value, ScriptError> {
    let population = args.require(0, "a")?;
    let pool: Vec<Value> = if let Value::Num(_) = population {
        let n = interp_check_len(interp, population.as_index()?.max(0) as usize)?;
        (0..n).map(|i| Value::Num(i as f64)).collect()
    } else {
        population.iter_values(interp.max_len())?
    };
    if pool.is_empty() {
        return Err(ScriptError::value("a cannot be empty unless no samples are taken"));
    }
    let replace = args.flag("replace", true)?;
    let Some(size) = args.get(1, "size").cloned() else {
        let i = interp.rng().gen_range(0..pool.len());
        return Ok(pool[i].clone());
    };
    let n = shape_len(interp, &size)?;
    interp.meter().charge(n)?;
    let picked: Vec<Value> = if replace {
        (0..n)
            .map(|_| pool[interp.rng().gen_range(0..pool.len())].clone())
            .collect()
    } else {
        if n > pool.len() {
            return Err(ScriptError::value(
                "Cannot take a larger sample than population when 'replace=False'",
            ));
        }
        let mut indices: Vec<usize> = (0..pool.len()).collect();
        for i in 0..n {
            let j = interp.rng().gen_range(i..indices.len());
            indices.swap(i, j);
        }
        indices[..n].iter().map(|i| pool[*i].clone()).collect()
    };
    if picked.iter().all(|v| matches!(v, Value::Num(_))) {
        Ok(Value::array(picked.iter().filter_map(Value::as_f64).collect()))
    } else {
        Ok(Value::list(picked))
    }
}

fn missing(args: &Args, name: &str) -> ScriptError {
    ScriptError::type_error(format!(
        "{}() missing required argument: '{}'",
        args.name(),
        name
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PandasFn {
    DataFrame,
    Series,
}

impl PandasFn {
    pub fn from_name(name: &str) -> Option<PandasFn> {
        match name {
            "DataFrame" => Some(Self::DataFrame),
            "Series" => Some(Self::Series),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DataFrame => "DataFrame",
            Self::Series => "Series",
        }
    }
}

pub fn call_pandas(interp: &mut Interpreter<'_>, func: PandasFn, args: Args) -> Result<Value, ScriptError> {
    let limit = interp.max_len();
    match func {
        PandasFn::DataFrame => {
            args.allow_keywords(&["data", "columns", "index"])?;
            let mut frame = Frame::default();
            match args.get(0, "data") {
                None => {}
                Some(Value::Dict(data)) => {
                    for (key, value) in data.borrow().entries() {
                        let name = key.py_str();
                        let column = Column::from_value(value, limit)?;
                        interp.meter().charge(column.len())?;
                        frame.set_column(&name, column).map_err(|_| {
                            ScriptError::value("All arrays must be of the same length")
                        })?;
                    }
                }
                Some(Value::Frame(source)) => frame = source.borrow().clone(),
                Some(rows) => {
                    let names = match args.kw("columns") {
                        Some(columns) => columns
                            .iter_values(limit)?
                            .iter()
                            .map(Value::py_str)
                            .collect::<Vec<_>>(),
                        None => Vec::new(),
                    };
                    frame = frame_from_rows(&rows.iter_values(limit)?, names, limit)?;
                }
            }
            if let Some(Value::Dict(_)) = args.get(0, "data") {
                if let Some(columns) = args.kw("columns") {
                    let names: Vec<String> = columns.iter_values(limit)?.iter().map(Value::py_str).collect();
                    frame = frame.select(&names)?;
                }
            }
            Ok(Value::frame(frame))
        }
        PandasFn::Series => {
            args.allow_keywords(&["data", "name", "index"])?;
            let data = args.require(0, "data")?;
            Column::from_value(data, limit).map(|c| c.to_value())
        }
    }
}

/// A frame from a list of row lists, with column names `0..n` unless given.
fn frame_from_rows(rows: &[Value], names: Vec<String>, limit: usize) -> Result<Frame, ScriptError> {
    let rows = rows
        .iter()
        .map(|r| r.iter_values(limit))
        .collect::<Result<Vec<_>, _>>()?;
    let width = rows.first().map(Vec::len).unwrap_or(names.len());
    if rows.iter().any(|r| r.len() != width) {
        return Err(ScriptError::value("all rows must have the same number of columns"));
    }
    if !names.is_empty() && names.len() != width {
        return Err(ScriptError::value(format!(
            "{} columns passed, passed data had {} columns",
            names.len(),
            width
        )));
    }
    let mut frame = Frame::default();
    for col in 0..width {
        let name = names.get(col).cloned().unwrap_or_else(|| col.to_string());
        let values = Value::list(rows.iter().map(|r| r[col].clone()).collect());
        frame.set_column(&name, Column::from_value(&values, limit)?)?;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{InterruptHandle, ResourceLimits, SandboxEnvironment};
    use crate::script::interpreter::Meter;
    use crate::script::parse_program;

    fn eval(source: &str) -> Result<Value, ScriptError> {
        let program = parse_program(&format!("result = {}", source))?;
        let mut env = SandboxEnvironment::new();
        let meter = Meter::new(&ResourceLimits::default(), InterruptHandle::new());
        Interpreter::new(&mut env, meter).run(&program)?;
        Ok(env.lookup("result").unwrap())
    }

    fn repr(source: &str) -> String {
        eval(source).unwrap().repr()
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Builtin::from_name("sorted"), Some(Builtin::Sorted));
        assert_eq!(Builtin::from_name("eval"), None);
        assert_eq!(NumpyFn::from_random_name("randn"), Some(NumpyFn::RandomRandn));
        assert_eq!(NumpyFn::from_name("randn"), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(repr("int('42')"), "42");
        assert_eq!(repr("int(3.9)"), "3");
        assert_eq!(repr("float('2.5')"), "2.5");
        assert_eq!(repr("str(7)"), "'7'");
        assert_eq!(repr("list(range(3))"), "[0, 1, 2]");
        assert_eq!(repr("dict(a=1)"), "{'a': 1}");
        assert!(eval("int('x')").is_err());
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(repr("sum([1, 2, 3])"), "6");
        assert_eq!(repr("max([3, 9, 2])"), "9");
        assert_eq!(repr("min(4, 1, 8)"), "1");
        assert_eq!(repr("max(['aa', 'b'], key=len)"), "'aa'");
        assert!(eval("max([])").is_err());
        assert_eq!(repr("max([], default=0)"), "0");
    }

    #[test]
    fn test_round_ties_to_even() {
        assert_eq!(repr("round(2.5)"), "2");
        assert_eq!(repr("round(3.5)"), "4");
        assert_eq!(repr("round(3.14159, 2)"), "3.14");
    }

    #[test]
    fn test_sequences() {
        assert_eq!(repr("list(zip([1, 2, 3], 'ab'))"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(repr("list(enumerate(['x'], start=1))"), "[(1, 'x')]");
        assert_eq!(repr("sorted([3, 1, 2], reverse=True)"), "[3, 2, 1]");
        assert_eq!(repr("list(reversed([1, 2]))"), "[2, 1]");
        assert!(eval("sorted([1, 'a'])").is_err());
    }

    #[test]
    fn test_range_step_zero() {
        assert!(eval("range(0, 10, 0)").is_err());
    }

    #[test]
    fn test_numpy_constructors() {
        assert_eq!(repr("np.linspace(0, 1, 5)"), "[0 0.25 0.5 0.75 1]");
        assert_eq!(repr("np.arange(0, 1, 0.5)"), "[0 0.5]");
        assert_eq!(repr("np.arange(3)"), "[0 1 2]");
        assert_eq!(repr("np.zeros(2)"), "[0 0]");
        assert_eq!(repr("np.cumsum([1, 2, 3])"), "[1 3 6]");
        assert_eq!(repr("np.mean([1, 2, 3, 4])"), "2.5");
    }

    #[test]
    fn test_arange_size_checked_before_allocation() {
        let err = eval("np.arange(0, 1e12)").unwrap_err();
        assert_eq!(err.kind, crate::script::ScriptErrorKind::LimitExceeded);
    }

    #[test]
    fn test_random_is_deterministic_per_execution() {
        let first = repr("np.random.rand(5)");
        let second = repr("np.random.rand(5)");
        assert_eq!(first, second);
        let a = eval("np.random.normal(10, 2, size=200)").unwrap();
        let values = a.to_numbers(1000).unwrap();
        assert_eq!(values.len(), 200);
        let m = mean(&values);
        assert!((m - 10.0).abs() < 1.0);
    }

    #[test]
    fn test_random_choice_without_replacement() {
        let value = eval("np.random.choice(5, size=5, replace=False)").unwrap();
        let mut picked = value.to_numbers(10).unwrap();
        picked.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(picked, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dataframe_from_dict() {
        let value = eval("pd.DataFrame({'x': [1, 2], 'name': ['a', 'b']})").unwrap();
        let Value::Frame(frame) = value else { panic!("expected a frame") };
        assert_eq!(frame.borrow().rows(), 2);
        assert_eq!(frame.borrow().column_names(), vec!["x", "name"]);
        assert!(eval("pd.DataFrame({'x': [1, 2], 'y': [1]})").is_err());
    }

    #[test]
    fn test_std_and_median() {
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 0), 2.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
