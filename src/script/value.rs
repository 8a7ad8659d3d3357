//! Runtime values of the snippet dialect.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use super::builtins::{Builtin, NumpyFn, PandasFn};
use super::error::ScriptError;
use super::plotting::PyplotFn;

/// Library namespaces a snippet can reach through the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Pyplot,
    Numpy,
    NumpyRandom,
    Pandas,
    Matplotlib,
}

impl Namespace {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pyplot => "matplotlib.pyplot",
            Self::Numpy => "numpy",
            Self::NumpyRandom => "numpy.random",
            Self::Pandas => "pandas",
            Self::Matplotlib => "matplotlib",
        }
    }
}

/// `range(start, stop, step)`, kept lazy so large loops cost steps, not memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.stop)
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        (span as u64).div_ceil(step) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> i64 {
        self.start + self.step * index as i64
    }
}

/// Deepest container nesting a snippet may build.
pub const MAX_NESTING: usize = 100;

/// Nodes one structural comparison or display may visit.
const WALK_BUDGET: usize = 1 << 20;

/// Characters `repr` produces before it elides the rest.
const REPR_LIMIT: usize = 1 << 20;

thread_local! {
    static ALLOCATED: Cell<u64> = const { Cell::new(0) };
}

/// Elements created on this thread since the last [`reset_allocations`].
///
/// Snippets run one per worker thread, so this is the running total for
/// the current execution.
pub fn allocated() -> u64 {
    ALLOCATED.with(Cell::get)
}

pub fn reset_allocations() {
    ALLOCATED.with(|count| count.set(0));
}

pub(crate) fn record_allocation(elements: usize) {
    ALLOCATED.with(|count| count.set(count.get().saturating_add(elements as u64)));
}

/// Elements of a list or tuple.
///
/// Dropping takes nested containers apart iteratively, so releasing a deeply
/// nested structure never recurses.
#[derive(Debug, Default)]
pub struct Items(Vec<Value>);

impl Deref for Items {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for Items {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl From<Vec<Value>> for Items {
    fn from(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl Drop for Items {
    fn drop(&mut self) {
        dismantle(std::mem::take(&mut self.0));
    }
}

/// Release `pending` and everything only it keeps alive, without recursion.
fn dismantle(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(list) => {
                if let Ok(cell) = Rc::try_unwrap(list) {
                    pending.append(&mut cell.into_inner());
                }
            }
            Value::Tuple(items) => {
                if let Ok(mut items) = Rc::try_unwrap(items) {
                    pending.append(&mut items);
                }
            }
            Value::Dict(dict) => {
                if let Ok(cell) = Rc::try_unwrap(dict) {
                    cell.into_inner().drain_into(&mut pending);
                }
            }
            Value::Frame(frame) => {
                if let Ok(cell) = Rc::try_unwrap(frame) {
                    cell.into_inner().drain_into(&mut pending);
                }
            }
            Value::Method(receiver, _) => pending.push(*receiver),
            _ => {}
        }
    }
}

/// Insertion-ordered mapping with Python key equality.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| py_eq(k, key))
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        if !key.is_hashable() {
            return Err(ScriptError::type_error(format!(
                "unhashable type: '{}'",
                key.type_name()
            )));
        }
        match self.entries.iter_mut().find(|(k, _)| py_eq(k, &key)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| py_eq(k, key))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    fn drain_into(&mut self, out: &mut Vec<Value>) {
        for (key, value) in self.entries.drain(..) {
            out.push(key);
            out.push(value);
        }
    }
}

impl Drop for Dict {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.drain_into(&mut pending);
        dismantle(pending);
    }
}

/// One column of a [`Frame`].
#[derive(Debug, Clone)]
pub enum Column {
    Numbers(Rc<Vec<f64>>),
    Labels(Rc<Vec<Value>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Numbers(v) => v.len(),
            Self::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a column from a sequence; all-numeric sequences become numbers.
    pub fn from_value(value: &Value, limit: usize) -> Result<Column, ScriptError> {
        match value {
            Value::Array(items) => Ok(Column::Numbers(Rc::clone(items))),
            Value::Str(_) | Value::Num(_) | Value::Bool(_) | Value::None => Err(ScriptError::value(
                "If using all scalar values, you must pass an index",
            )),
            other => {
                let items = other.iter_values(limit)?;
                if items.iter().all(|v| matches!(v, Value::Num(_) | Value::Bool(_))) {
                    Ok(Column::Numbers(Rc::new(
                        items.iter().filter_map(Value::as_f64).collect(),
                    )))
                } else {
                    Ok(Column::Labels(Rc::new(items)))
                }
            }
        }
    }

    /// The column as a snippet value: an array for numbers, a list otherwise.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Numbers(v) => Value::Array(Rc::clone(v)),
            Self::Labels(v) => Value::list(v.as_ref().clone()),
        }
    }

    fn slice(&self, start: usize, end: usize) -> Self {
        match self {
            Self::Numbers(v) => Self::Numbers(Rc::new(v[start..end].to_vec())),
            Self::Labels(v) => Self::Labels(Rc::new(v[start..end].to_vec())),
        }
    }
}

/// A minimal column-oriented table.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: Vec<(String, Column)>,
}

impl Frame {
    pub fn rows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn select(&self, names: &[String]) -> Result<Frame, ScriptError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| ScriptError::key(format!("'{}'", name)))?;
            columns.push((name.clone(), column.clone()));
        }
        Ok(Frame { columns })
    }

    /// Add or replace a column; its length must match the existing rows.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), ScriptError> {
        if !self.columns.is_empty() && column.len() != self.rows() {
            return Err(ScriptError::value(format!(
                "Length of values ({}) does not match length of index ({})",
                column.len(),
                self.rows()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    fn drain_into(&mut self, out: &mut Vec<Value>) {
        for (_, column) in self.columns.drain(..) {
            if let Column::Labels(labels) = column {
                if let Ok(mut labels) = Rc::try_unwrap(labels) {
                    out.append(&mut labels);
                }
            }
        }
    }

    pub fn rows_slice(&self, start: usize, end: usize) -> Frame {
        let end = end.min(self.rows());
        let start = start.min(end);
        Frame {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.slice(start, end)))
                .collect(),
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.drain_into(&mut pending);
        dismantle(pending);
    }
}

/// A value inside a running snippet.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Items>>),
    Tuple(Rc<Items>),
    Dict(Rc<RefCell<Dict>>),
    Range(RangeValue),
    Array(Rc<Vec<f64>>),
    Frame(Rc<RefCell<Frame>>),
    Module(Namespace),
    Builtin(Builtin),
    Numpy(NumpyFn),
    Pandas(PandasFn),
    Pyplot(PyplotFn),
    /// A method bound to its receiver; the name comes from a fixed allow-list.
    Method(Box<Value>, &'static str),
    Figure,
    Axes,
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        record_allocation(s.len());
        Self::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        record_allocation(items.len());
        Self::List(Rc::new(RefCell::new(Items(items))))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        record_allocation(items.len());
        Self::Tuple(Rc::new(Items(items)))
    }

    pub fn dict(dict: Dict) -> Self {
        record_allocation(dict.len() * 2);
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn array(items: Vec<f64>) -> Self {
        record_allocation(items.len());
        Self::Array(Rc::new(items))
    }

    pub fn frame(frame: Frame) -> Self {
        record_allocation(frame.rows() * frame.columns.len());
        Self::Frame(Rc::new(RefCell::new(frame)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Num(n) if n.fract() == 0.0 => "int",
            Self::Num(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Range(_) => "range",
            Self::Array(_) => "ndarray",
            Self::Frame(_) => "DataFrame",
            Self::Module(_) => "module",
            Self::Builtin(_) | Self::Numpy(_) | Self::Pandas(_) | Self::Pyplot(_) => {
                "builtin_function_or_method"
            }
            Self::Method(..) => "method",
            Self::Figure => "Figure",
            Self::Axes => "Axes",
        }
    }

    pub fn is_hashable(&self) -> bool {
        let mut budget = WALK_BUDGET;
        self.hashable_within(0, &mut budget)
    }

    fn hashable_within(&self, depth: usize, budget: &mut usize) -> bool {
        if !spend(budget) {
            return false;
        }
        match self {
            Self::None | Self::Bool(_) | Self::Num(_) | Self::Str(_) => true,
            Self::Tuple(items) if depth < MAX_NESTING => {
                items.iter().all(|item| item.hashable_within(depth + 1, budget))
            }
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// An integral number, for indices and counts.
    pub fn as_index(&self) -> Result<i64, ScriptError> {
        match self.as_f64() {
            Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Ok(n as i64),
            Some(_) => Err(ScriptError::type_error(
                "'float' object cannot be interpreted as an integer",
            )),
            None => Err(ScriptError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                self.type_name()
            ))),
        }
    }

    pub fn truthy(&self) -> Result<bool, ScriptError> {
        Ok(match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Range(r) => !r.is_empty(),
            Self::Array(items) => match items.len() {
                0 => false,
                1 => items[0] != 0.0,
                _ => {
                    return Err(ScriptError::value(
                        "the truth value of an array with more than one element is ambiguous",
                    ));
                }
            },
            Self::Frame(_) => {
                return Err(ScriptError::value("the truth value of a DataFrame is ambiguous"));
            }
            _ => true,
        })
    }

    /// Length of a sized value.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.chars().count()),
            Self::List(items) => Some(items.borrow().len()),
            Self::Tuple(items) => Some(items.len()),
            Self::Dict(d) => Some(d.borrow().len()),
            Self::Range(r) => Some(r.len()),
            Self::Array(items) => Some(items.len()),
            Self::Frame(f) => Some(f.borrow().rows()),
            _ => None,
        }
    }

    /// The items of an iterable, materialized.
    ///
    /// `limit` caps how many items a lazy range may expand to.
    pub fn iter_values(&self, limit: usize) -> Result<Vec<Value>, ScriptError> {
        match self {
            Self::List(items) => Ok(items.borrow().to_vec()),
            Self::Tuple(items) => Ok(items.to_vec()),
            Self::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Self::Dict(d) => Ok(d.borrow().keys().cloned().collect()),
            Self::Range(r) => {
                if r.len() > limit {
                    return Err(ScriptError::limit(format!(
                        "range of {} elements exceeds the limit of {}",
                        r.len(),
                        limit
                    )));
                }
                Ok((0..r.len()).map(|i| Value::Num(r.get(i) as f64)).collect())
            }
            Self::Array(items) => Ok(items.iter().map(|n| Value::Num(*n)).collect()),
            Self::Frame(f) => Ok(f.borrow().column_names().into_iter().map(Value::str).collect()),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Numbers from a scalar or a numeric sequence.
    pub fn to_numbers(&self, limit: usize) -> Result<Vec<f64>, ScriptError> {
        match self {
            Self::Num(_) | Self::Bool(_) => Ok(vec![self.as_f64().unwrap_or_default()]),
            Self::Array(items) => Ok(items.as_ref().clone()),
            Self::Frame(_) => Err(ScriptError::type_error("expected a column, got a DataFrame")),
            other => other
                .iter_values(limit)?
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        ScriptError::type_error(format!(
                            "expected numbers, found '{}'",
                            v.type_name()
                        ))
                    })
                })
                .collect(),
        }
    }

    /// `str(value)`.
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    ///
    /// Containers nested past [`MAX_NESTING`] print as `...`, and output is
    /// cut off once it grows past a fixed size.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if out.len() > REPR_LIMIT {
            return;
        }
        let nested = matches!(self, Self::List(_) | Self::Tuple(_) | Self::Dict(_));
        if nested && depth >= MAX_NESTING {
            out.push_str("...");
            return;
        }
        match self {
            Self::List(items) => {
                out.push('[');
                write_items(out, &items.borrow(), depth);
                out.push(']');
            }
            Self::Tuple(items) => {
                out.push('(');
                write_items(out, items, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.borrow().entries().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if out.len() > REPR_LIMIT {
                        out.push_str("...");
                        break;
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            other => out.push_str(&other.scalar_repr()),
        }
    }

    fn scalar_repr(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Num(n) => format_number(*n),
            Self::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::List(_) => "[...]".to_string(),
            Self::Tuple(_) => "(...)".to_string(),
            Self::Dict(_) => "{...}".to_string(),
            Self::Range(r) if r.step == 1 => format!("range({}, {})", r.start, r.stop),
            Self::Range(r) => format!("range({}, {}, {})", r.start, r.stop, r.step),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(|n| format_number(*n)).collect();
                format!("[{}]", parts.join(" "))
            }
            Self::Frame(f) => {
                let f = f.borrow();
                format!("<DataFrame {} rows x {} columns>", f.rows(), f.columns.len())
            }
            Self::Module(ns) => format!("<module '{}'>", ns.name()),
            Self::Builtin(b) => format!("<built-in function {}>", b.name()),
            Self::Numpy(f) => format!("<function numpy.{}>", f.name()),
            Self::Pandas(f) => format!("<function pandas.{}>", f.name()),
            Self::Pyplot(f) => format!("<function pyplot.{}>", f.name()),
            Self::Method(recv, name) => format!("<bound method {}.{}>", recv.type_name(), name),
            Self::Figure => "<Figure>".to_string(),
            Self::Axes => "<Axes>".to_string(),
        }
    }
}

/// Check that `items` may be stored one level inside `container`.
///
/// Fails when the result would nest deeper than [`MAX_NESTING`], or when an
/// item reaches `container` itself. Returns how many elements the walk
/// looked at.
pub fn check_nesting(items: &[Value], container: Option<&Value>) -> Result<usize, ScriptError> {
    let mut walk = NestingWalk {
        target: container.and_then(container_id),
        heights: HashMap::new(),
        visited: 0,
    };
    for item in items {
        walk.height(item, MAX_NESTING - 1)?;
    }
    Ok(walk.visited)
}

fn container_id(value: &Value) -> Option<*const ()> {
    match value {
        Value::List(rc) => Some(Rc::as_ptr(rc) as *const ()),
        Value::Tuple(rc) => Some(Rc::as_ptr(rc) as *const ()),
        Value::Dict(rc) => Some(Rc::as_ptr(rc) as *const ()),
        Value::Frame(rc) => Some(Rc::as_ptr(rc) as *const ()),
        _ => None,
    }
}

struct NestingWalk {
    target: Option<*const ()>,
    heights: HashMap<*const (), usize>,
    visited: usize,
}

impl NestingWalk {
    /// Container height of `value`, failing once it passes `room`.
    fn height(&mut self, value: &Value, room: usize) -> Result<usize, ScriptError> {
        let Some(id) = container_id(value) else {
            return match value {
                Value::Method(receiver, _) => self.height(receiver, room),
                _ => Ok(0),
            };
        };
        if self.target == Some(id) {
            return Err(ScriptError::limit(format!(
                "a {} cannot contain itself",
                value.type_name()
            )));
        }
        if let Some(&height) = self.heights.get(&id) {
            return if height > room { Err(too_deep()) } else { Ok(height) };
        }
        if room == 0 {
            return Err(too_deep());
        }

        let mut deepest = 0;
        match value {
            Value::List(items) => {
                let items = items.borrow();
                self.visited += items.len();
                for item in items.iter() {
                    deepest = deepest.max(self.height(item, room - 1)?);
                }
            }
            Value::Tuple(items) => {
                self.visited += items.len();
                for item in items.iter() {
                    deepest = deepest.max(self.height(item, room - 1)?);
                }
            }
            Value::Dict(d) => {
                let d = d.borrow();
                self.visited += d.len();
                for (key, item) in d.entries() {
                    deepest = deepest.max(self.height(key, room - 1)?);
                    deepest = deepest.max(self.height(item, room - 1)?);
                }
            }
            Value::Frame(f) => {
                for (_, column) in &f.borrow().columns {
                    if let Column::Labels(labels) = column {
                        self.visited += labels.len();
                        for item in labels.iter() {
                            deepest = deepest.max(self.height(item, room - 1)?);
                        }
                    }
                }
            }
            _ => {}
        }
        self.heights.insert(id, deepest + 1);
        Ok(deepest + 1)
    }
}

fn too_deep() -> ScriptError {
    ScriptError::limit(format!("containers nested deeper than {} levels", MAX_NESTING))
}

fn write_items(out: &mut String, items: &[Value], depth: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        if out.len() > REPR_LIMIT {
            out.push_str("...");
            break;
        }
        item.write_repr(out, depth + 1);
    }
}

/// Take one node from a walk budget; `false` once it is spent.
fn spend(budget: &mut usize) -> bool {
    match budget.checked_sub(1) {
        Some(left) => {
            *budget = left;
            true
        }
        None => false,
    }
}

/// Python-style number display: integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `a == b`.
///
/// Structures too deep or too large to compare within a fixed walk compare
/// unequal.
pub fn py_eq(a: &Value, b: &Value) -> bool {
    let mut budget = WALK_BUDGET;
    eq_within(a, b, 0, &mut budget)
}

fn eq_within(a: &Value, b: &Value, depth: usize, budget: &mut usize) -> bool {
    if !spend(budget) {
        return false;
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y)
                || (depth < MAX_NESTING && seq_eq(&x.borrow(), &y.borrow(), depth, budget))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            Rc::ptr_eq(x, y) || (depth < MAX_NESTING && seq_eq(x, y, depth, budget))
        }
        (Value::Array(x), Value::Array(y)) => x == y,
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        (Value::Figure, Value::Figure) | (Value::Axes, Value::Axes) => true,
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize, budget: &mut usize) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq_within(x, y, depth + 1, budget))
}

/// Ordering used by `<`, `min`, `max` and `sorted`.
pub fn py_cmp(a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    let mut budget = WALK_BUDGET;
    cmp_within(a, b, 0, &mut budget)
}

fn cmp_within(a: &Value, b: &Value, depth: usize, budget: &mut usize) -> Result<Ordering, ScriptError> {
    let sequences = matches!(
        (a, b),
        (Value::List(_), Value::List(_)) | (Value::Tuple(_), Value::Tuple(_))
    );
    if !spend(budget) || (sequences && depth >= MAX_NESTING) {
        return Err(ScriptError::limit("comparison exceeds the nesting limit"));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => seq_cmp(&x.borrow(), &y.borrow(), depth, budget),
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y, depth, budget),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
            _ => Err(ScriptError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn seq_cmp(a: &[Value], b: &[Value], depth: usize, budget: &mut usize) -> Result<Ordering, ScriptError> {
    for (x, y) in a.iter().zip(b) {
        match cmp_within(x, y, depth + 1, budget)? {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_display() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "nan");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_repr_of_containers() {
        let v = Value::list(vec![Value::Num(1.0), Value::str("a"), Value::None]);
        assert_eq!(v.repr(), "[1, 'a', None]");
        assert_eq!(Value::tuple(vec![Value::Bool(true)]).repr(), "(True,)");
        assert_eq!(Value::str("x").py_str(), "x");
    }

    #[test]
    fn test_range_len() {
        assert_eq!(RangeValue { start: 0, stop: 10, step: 3 }.len(), 4);
        assert_eq!(RangeValue { start: 10, stop: 0, step: -2 }.len(), 5);
        assert_eq!(RangeValue { start: 5, stop: 0, step: 1 }.len(), 0);
    }

    #[test]
    fn test_range_expansion_is_capped() {
        let big = Value::Range(RangeValue { start: 0, stop: 1_000_000, step: 1 });
        assert!(big.iter_values(1000).is_err());
        assert_eq!(big.len(), Some(1_000_000));
    }

    #[test]
    fn test_bool_and_number_equality() {
        assert!(py_eq(&Value::Bool(true), &Value::Num(1.0)));
        assert!(!py_eq(&Value::str("1"), &Value::Num(1.0)));
    }

    #[test]
    fn test_ordering_rejects_mixed_types() {
        let err = py_cmp(&Value::str("a"), &Value::Num(1.0)).unwrap_err();
        assert!(err.message.contains("'str' and 'int'"));
        assert_eq!(
            py_cmp(&Value::tuple(vec![Value::Num(1.0), Value::Num(2.0)]), &Value::tuple(vec![Value::Num(1.0), Value::Num(3.0)])).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_dict_keys_must_be_hashable() {
        let mut d = Dict::new();
        d.insert(Value::str("a"), Value::Num(1.0)).unwrap();
        d.insert(Value::str("a"), Value::Num(2.0)).unwrap();
        assert_eq!(d.len(), 1);
        assert!(d.insert(Value::list(vec![]), Value::None).is_err());
    }

    #[test]
    fn test_array_truthiness_is_ambiguous() {
        assert!(Value::array(vec![1.0, 2.0]).truthy().is_err());
        assert!(Value::array(vec![1.0]).truthy().unwrap());
    }
}
