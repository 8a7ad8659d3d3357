//! Tree-walking evaluator for parsed snippets.
//!
//! Every statement, loop iteration, comprehension element and call goes
//! through [`Meter::tick`], which is where the executor's interrupt handle and
//! the step budget are enforced. A snippet has no way to run code that does
//! not pass through the meter, so a tripped handle always stops it.

use std::rc::Rc;

use rand::rngs::StdRng;

use super::ast::{BinOp, CmpOp, Expr, FStringPart, Program, Stmt, StmtKind, Subscript, Target, UnaryOp};
use super::builtins::{self, Args};
use super::error::{ScriptError, ScriptErrorKind};
use super::format;
use super::methods;
use super::plotting::{self, PyplotFn};
use super::value::{self, Column, Dict, Frame, Namespace, RangeValue, Value, py_cmp, py_eq};
use crate::render::Figure;
use crate::sandbox::{InterruptHandle, ResourceLimits, SandboxEnvironment};

/// Counts interpreter steps and elements, and polls the interrupt handle.
///
/// Elements are counted per worker thread by the value constructors (see
/// [`value::allocated`]); creating a meter starts the count from zero.
#[derive(Debug)]
pub struct Meter {
    steps: u64,
    budget: u64,
    max_len: usize,
    max_total_elements: u64,
    interrupt: InterruptHandle,
}

impl Meter {
    pub fn new(limits: &ResourceLimits, interrupt: InterruptHandle) -> Self {
        value::reset_allocations();
        Self {
            steps: 0,
            budget: limits.step_budget,
            max_len: limits.max_collection_len,
            max_total_elements: limits.max_total_elements,
            interrupt,
        }
    }

    pub fn tick(&mut self) -> Result<(), ScriptError> {
        if self.interrupt.is_tripped() {
            return Err(ScriptError::interrupted());
        }
        self.steps += 1;
        if self.steps > self.budget {
            return Err(ScriptError::limit(format!(
                "step budget of {} exhausted",
                self.budget
            )));
        }
        self.check_allocations()
    }

    /// Count `elements` stored outside the value constructors, such as list
    /// appends and figure artists.
    pub fn allocate(&mut self, elements: usize) -> Result<(), ScriptError> {
        value::record_allocation(elements);
        self.check_allocations()
    }

    fn check_allocations(&self) -> Result<(), ScriptError> {
        let total = value::allocated();
        if total > self.max_total_elements {
            return Err(ScriptError::limit(format!(
                "{} elements allocated, over the per-execution limit of {}",
                total, self.max_total_elements
            )));
        }
        Ok(())
    }

    /// Tick for an operation that touches `units` elements at once.
    pub fn charge(&mut self, units: usize) -> Result<(), ScriptError> {
        self.steps = self.steps.saturating_add((units / 1024) as u64);
        self.tick()
    }

    /// Fail if a collection of `len` elements would exceed the size cap.
    pub fn check_len(&self, len: usize) -> Result<(), ScriptError> {
        if len > self.max_len {
            return Err(ScriptError::limit(format!(
                "collection of {} elements exceeds the limit of {}",
                len, self.max_len
            )));
        }
        Ok(())
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn allocated(&self) -> u64 {
        value::allocated()
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Interpreter<'env> {
    env: &'env mut SandboxEnvironment,
    meter: Meter,
    loop_depth: usize,
}

impl<'env> Interpreter<'env> {
    pub fn new(env: &'env mut SandboxEnvironment, meter: Meter) -> Self {
        Self {
            env,
            meter,
            loop_depth: 0,
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        self.exec_block(program).map(|_| ())
    }

    pub fn steps_used(&self) -> u64 {
        self.meter.steps()
    }

    pub fn meter(&mut self) -> &mut Meter {
        &mut self.meter
    }

    pub fn max_len(&self) -> usize {
        self.meter.max_len()
    }

    pub fn figure(&mut self) -> &mut Figure {
        self.env.figure_mut()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.env.rng()
    }

    pub fn reseed(&mut self, seed: u64) {
        self.env.reseed(seed);
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in body {
            let flow = self
                .meter
                .tick()
                .and_then(|_| self.exec(&stmt.kind))
                .map_err(|e| e.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, kind: &StmtKind) -> Result<Flow, ScriptError> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign(target, expr) => {
                let value = self.eval(expr)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign(name, op, expr) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(expr)?;
                let updated = match (&current, op) {
                    (Value::List(items), BinOp::Add) => {
                        let extra = rhs.iter_values(self.max_len())?;
                        self.meter.check_len(items.borrow().len() + extra.len())?;
                        self.check_nesting(&extra, Some(&current))?;
                        self.meter.allocate(extra.len())?;
                        items.borrow_mut().extend(extra);
                        current.clone()
                    }
                    _ => self.binary(*op, &current, &rhs)?,
                };
                self.env.assign(name, updated);
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                self.loop_depth += 1;
                let result = self.exec_for(target, &iterable, body);
                self.loop_depth -= 1;
                result?;
            }
            StmtKind::While { condition, body } => {
                self.loop_depth += 1;
                let result = self.exec_while(condition, body);
                self.loop_depth -= 1;
                result?;
            }
            StmtKind::If { branches, orelse } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.truthy()? {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::Import(module) => {
                return Err(ScriptError::new(
                    ScriptErrorKind::ImportError,
                    format!(
                        "import of '{}' is not allowed; plt, np and pd are already available",
                        module
                    ),
                ));
            }
            StmtKind::Pass => {}
            StmtKind::Break | StmtKind::Continue if self.loop_depth == 0 => {
                return Err(ScriptError::syntax("'break' or 'continue' outside loop"));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, target: &Target, iterable: &Value, body: &[Stmt]) -> Result<(), ScriptError> {
        if let Value::Range(range) = iterable {
            for i in 0..range.len() {
                self.meter.tick()?;
                self.assign(target, Value::Num(range.get(i) as f64))?;
                if let Flow::Break = self.exec_block(body)? {
                    break;
                }
            }
            return Ok(());
        }

        for item in iterable.iter_values(self.max_len())? {
            self.meter.tick()?;
            self.assign(target, item)?;
            if let Flow::Break = self.exec_block(body)? {
                break;
            }
        }
        Ok(())
    }

    fn exec_while(&mut self, condition: &Expr, body: &[Stmt]) -> Result<(), ScriptError> {
        loop {
            self.meter.tick()?;
            if !self.eval(condition)?.truthy()? {
                return Ok(());
            }
            if let Flow::Break = self.exec_block(body)? {
                return Ok(());
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => self.env.assign(name, value),
            Target::Tuple(names) => {
                let items = value.iter_values(self.max_len())?;
                if items.len() < names.len() {
                    return Err(ScriptError::value(format!(
                        "not enough values to unpack (expected {}, got {})",
                        names.len(),
                        items.len()
                    )));
                }
                if items.len() > names.len() {
                    return Err(ScriptError::value(format!(
                        "too many values to unpack (expected {})",
                        names.len()
                    )));
                }
                for (name, item) in names.iter().zip(items) {
                    self.env.assign(name, item);
                }
            }
            Target::Item { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.set_item(&object, index, value)?;
            }
        }
        Ok(())
    }

    fn set_item(&mut self, object: &Value, index: Value, value: Value) -> Result<(), ScriptError> {
        if matches!(object, Value::List(_) | Value::Dict(_) | Value::Frame(_)) {
            self.check_nesting(&[index.clone(), value.clone()], Some(object))?;
            self.meter.allocate(1)?;
        }
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let i = position(&index, len, "list assignment")?;
                items[i] = value;
            }
            Value::Dict(dict) => dict.borrow_mut().insert(index, value)?,
            Value::Frame(frame) => {
                let name = index
                    .as_str()
                    .ok_or_else(|| ScriptError::type_error("DataFrame columns are assigned by name"))?
                    .to_string();
                let rows = frame.borrow().rows();
                let column = match value.as_f64() {
                    Some(n) if rows > 0 => Column::Numbers(Rc::new(vec![n; rows])),
                    _ => Column::from_value(&value, self.max_len())?,
                };
                self.meter.allocate(column.len())?;
                frame.borrow_mut().set_column(&name, column)?;
            }
            Value::Array(_) => {
                return Err(ScriptError::type_error(
                    "array item assignment is not supported; build a new array instead",
                ));
            }
            other => {
                return Err(ScriptError::type_error(format!(
                    "'{}' object does not support item assignment",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        self.env
            .lookup(name)
            .ok_or_else(|| ScriptError::name(format!("name '{}' is not defined", name)))
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::FString(parts) => self.eval_fstring(parts),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let items = self.eval_all(items)?;
                self.check_nesting(&items, None)?;
                Ok(Value::list(items))
            }
            Expr::Tuple(items) => {
                let items = self.eval_all(items)?;
                self.check_nesting(&items, None)?;
                Ok(Value::tuple(items))
            }
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    self.check_nesting(&[key.clone(), value.clone()], None)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::ListComp {
                element,
                target,
                iter,
                condition,
            } => {
                let iterable = self.eval(iter)?;
                let condition = condition.as_deref();
                let mut out = Vec::new();
                if let Value::Range(range) = iterable {
                    for i in 0..range.len() {
                        let item = Value::Num(range.get(i) as f64);
                        self.comprehension_step(target, item, element, condition, &mut out)?;
                    }
                } else {
                    for item in iterable.iter_values(self.max_len())? {
                        self.comprehension_step(target, item, element, condition, &mut out)?;
                    }
                }
                self.check_nesting(&out, None)?;
                Ok(Value::list(out))
            }
            Expr::Attr(object, name) => {
                let object = self.eval(object)?;
                self.get_attr(&object, name)
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let args = self.eval_all(args)?;
                let mut keywords: Vec<(String, Value)> = Vec::with_capacity(kwargs.len());
                for (name, expr) in kwargs {
                    if keywords.iter().any(|(n, _)| n == name) {
                        return Err(ScriptError::syntax(format!(
                            "keyword argument repeated: {}",
                            name
                        )));
                    }
                    let value = self.eval(expr)?;
                    keywords.push((name.clone(), value));
                }
                self.call(callee, args, keywords)
            }
            Expr::Subscript(object, subscript) => {
                let object = self.eval(object)?;
                match subscript.as_ref() {
                    Subscript::Index(index) => {
                        let index = self.eval(index)?;
                        self.index(&object, &index)
                    }
                    Subscript::Slice(lower, upper) => {
                        let lower = lower.as_ref().map(|e| self.eval(e)).transpose()?;
                        let upper = upper.as_ref().map(|e| self.eval(e)).transpose()?;
                        self.slice(&object, lower, upper)
                    }
                }
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                self.unary(*op, &operand)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, &left, &right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? { self.eval(right) } else { Ok(left) }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.truthy()? { Ok(left) } else { self.eval(right) }
            }
            Expr::IfElse {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.truthy()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    /// Fail if storing `items` inside `container` would nest too deeply or
    /// make it contain itself. The walk is charged to the meter.
    pub fn check_nesting(&mut self, items: &[Value], container: Option<&Value>) -> Result<(), ScriptError> {
        let visited = value::check_nesting(items, container)?;
        self.meter.charge(visited)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        self.meter.check_len(exprs.len())?;
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn comprehension_step(
        &mut self,
        target: &Target,
        item: Value,
        element: &Expr,
        condition: Option<&Expr>,
        out: &mut Vec<Value>,
    ) -> Result<(), ScriptError> {
        self.meter.tick()?;
        self.assign(target, item)?;
        if let Some(condition) = condition {
            if !self.eval(condition)?.truthy()? {
                return Ok(());
            }
        }
        let value = self.eval(element)?;
        out.push(value);
        self.meter.check_len(out.len())
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> Result<Value, ScriptError> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field { expr, spec } => {
                    let value = self.eval(expr)?;
                    let text = match spec {
                        Some(spec) => format::format_value(&value, spec)?,
                        None => value.py_str(),
                    };
                    out.push_str(&text);
                }
            }
            self.meter.check_len(out.len())?;
        }
        Ok(Value::str(out))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Value) -> Result<Value, ScriptError> {
        if op == UnaryOp::Not {
            return Ok(Value::Bool(!operand.truthy()?));
        }
        let sign = if op == UnaryOp::Neg { -1.0 } else { 1.0 };
        match operand {
            Value::Array(items) => {
                self.meter.charge(items.len())?;
                Ok(Value::array(items.iter().map(|n| n * sign).collect()))
            }
            other => match other.as_f64() {
                Some(n) => Ok(Value::Num(n * sign)),
                None => Err(ScriptError::type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    if op == UnaryOp::Neg { "-" } else { "+" },
                    other.type_name()
                ))),
            },
        }
    }

    pub fn binary(&mut self, op: BinOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
        match (left, right) {
            (Value::Array(_), _) | (_, Value::Array(_)) => self.array_binary(op, left, right),
            (Value::Str(a), Value::Str(b)) if op == BinOp::Add => {
                self.meter.check_len(a.len() + b.len())?;
                Ok(Value::str(format!("{}{}", a, b)))
            }
            (Value::Str(template), args) if op == BinOp::Mod => {
                let args = match args {
                    Value::Tuple(items) => items.to_vec(),
                    other => vec![other.clone()],
                };
                Ok(Value::str(format::percent_format(template, &args)?))
            }
            (Value::Str(s), n) if op == BinOp::Mul && n.as_f64().is_some() => {
                let count = self.repeat_count(s.len(), n)?;
                Ok(Value::str(s.repeat(count)))
            }
            (n, Value::Str(s)) if op == BinOp::Mul && n.as_f64().is_some() => {
                let count = self.repeat_count(s.len(), n)?;
                Ok(Value::str(s.repeat(count)))
            }
            (Value::List(a), Value::List(b)) if op == BinOp::Add => {
                let mut items = a.borrow().to_vec();
                items.extend(b.borrow().iter().cloned());
                self.meter.check_len(items.len())?;
                Ok(Value::list(items))
            }
            (Value::Tuple(a), Value::Tuple(b)) if op == BinOp::Add => {
                let mut items = a.to_vec();
                items.extend(b.iter().cloned());
                self.meter.check_len(items.len())?;
                Ok(Value::tuple(items))
            }
            (Value::List(items), n) | (n, Value::List(items))
                if op == BinOp::Mul && n.as_f64().is_some() =>
            {
                let items = items.borrow().to_vec();
                let count = self.repeat_count(items.len(), n)?;
                Ok(Value::list(repeat(&items, count)))
            }
            (Value::Tuple(items), n) | (n, Value::Tuple(items))
                if op == BinOp::Mul && n.as_f64().is_some() =>
            {
                let count = self.repeat_count(items.len(), n)?;
                Ok(Value::tuple(repeat(items, count)))
            }
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => arithmetic(op, a, b).map(Value::Num),
                _ => Err(ScriptError::type_error(format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))),
            },
        }
    }

    fn repeat_count(&mut self, unit: usize, count: &Value) -> Result<usize, ScriptError> {
        let count = count.as_index()?.max(0) as usize;
        let total = unit.saturating_mul(count);
        self.meter.check_len(total)?;
        self.meter.charge(total)?;
        Ok(count)
    }

    fn array_operand(&self, value: &Value, op: &str, other: &Value) -> Result<Vec<f64>, ScriptError> {
        match value {
            Value::Array(items) => Ok(items.as_ref().clone()),
            Value::Num(_) | Value::Bool(_) | Value::List(_) | Value::Tuple(_) | Value::Range(_) => {
                value.to_numbers(self.max_len())
            }
            _ => Err(ScriptError::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op,
                value.type_name(),
                other.type_name()
            ))),
        }
    }

    fn array_binary(&mut self, op: BinOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
        let a = self.array_operand(left, op.symbol(), right)?;
        let b = self.array_operand(right, op.symbol(), left)?;
        let len = broadcast_len(a.len(), b.len())?;
        self.meter.charge(len)?;
        Ok(Value::array(
            (0..len)
                .map(|i| elementwise(op, pick(&a, i), pick(&b, i)))
                .collect(),
        ))
    }

    pub fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
        let result = match op {
            CmpOp::In => self.contains(right, left)?,
            CmpOp::NotIn => !self.contains(right, left)?,
            CmpOp::Is => is_same(left, right),
            CmpOp::IsNot => !is_same(left, right),
            _ if matches!(left, Value::Array(_)) || matches!(right, Value::Array(_)) => {
                return self.array_compare(op, left, right);
            }
            _ => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => ordered(op, a, b),
                _ => match op {
                    CmpOp::Eq => py_eq(left, right),
                    CmpOp::NotEq => !py_eq(left, right),
                    _ => {
                        let ordering = py_cmp(left, right)?;
                        ordered(op, ordering as i8 as f64, 0.0)
                    }
                },
            },
        };
        Ok(Value::Bool(result))
    }

    fn array_compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
        let a = self.array_operand(left, "comparison", right)?;
        let b = self.array_operand(right, "comparison", left)?;
        let len = broadcast_len(a.len(), b.len())?;
        self.meter.charge(len)?;
        Ok(Value::list(
            (0..len)
                .map(|i| Value::Bool(ordered(op, pick(&a, i), pick(&b, i))))
                .collect(),
        ))
    }

    fn contains(&mut self, container: &Value, item: &Value) -> Result<bool, ScriptError> {
        Ok(match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => haystack.contains(needle.as_ref()),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    )));
                }
            },
            Value::List(items) => items.borrow().iter().any(|v| py_eq(v, item)),
            Value::Tuple(items) => items.iter().any(|v| py_eq(v, item)),
            Value::Dict(dict) => dict.borrow().get(item).is_some(),
            Value::Range(range) => match item.as_f64() {
                Some(n) if n.fract() == 0.0 => {
                    let offset = n as i64 - range.start;
                    let steps = offset / range.step;
                    offset % range.step == 0 && steps >= 0 && (steps as usize) < range.len()
                }
                _ => false,
            },
            Value::Array(items) => match item.as_f64() {
                Some(n) => {
                    self.meter.charge(items.len())?;
                    items.iter().any(|v| *v == n)
                }
                None => false,
            },
            Value::Frame(frame) => match item.as_str() {
                Some(name) => frame.borrow().column(name).is_some(),
                None => false,
            },
            other => {
                return Err(ScriptError::type_error(format!(
                    "argument of type '{}' is not iterable",
                    other.type_name()
                )));
            }
        })
    }

    pub fn index(&mut self, object: &Value, index: &Value) -> Result<Value, ScriptError> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let i = position(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = position(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = position(index, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Range(range) => {
                let i = position(index, range.len(), "range object")?;
                Ok(Value::Num(range.get(i) as f64))
            }
            Value::Dict(dict) => dict
                .borrow()
                .get(index)
                .cloned()
                .ok_or_else(|| ScriptError::key(index.repr())),
            Value::Array(items) => self.index_array(items, index),
            Value::Frame(frame) => self.index_frame(&frame.borrow(), index),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn index_array(&mut self, items: &[f64], index: &Value) -> Result<Value, ScriptError> {
        match index {
            Value::Num(_) | Value::Bool(_) => {
                let i = position(index, items.len(), "array")?;
                Ok(Value::Num(items[i]))
            }
            Value::List(_) | Value::Tuple(_) | Value::Array(_) => {
                let selector = index.iter_values(self.max_len())?;
                self.meter.charge(selector.len())?;
                if let Some(mask) = as_mask(&selector) {
                    if mask.len() != items.len() {
                        return Err(ScriptError::index(format!(
                            "boolean index did not match indexed array; dimension is {} but boolean dimension is {}",
                            items.len(),
                            mask.len()
                        )));
                    }
                    return Ok(Value::array(
                        items
                            .iter()
                            .zip(mask)
                            .filter(|(_, keep)| *keep)
                            .map(|(n, _)| *n)
                            .collect(),
                    ));
                }
                let mut picked = Vec::with_capacity(selector.len());
                for selected in &selector {
                    picked.push(items[position(selected, items.len(), "array")?]);
                }
                Ok(Value::array(picked))
            }
            _ => Err(ScriptError::index(
                "only integers, slices and boolean arrays are valid indices",
            )),
        }
    }

    fn index_frame(&mut self, frame: &Frame, index: &Value) -> Result<Value, ScriptError> {
        match index {
            Value::Str(name) => frame
                .column(name)
                .map(Column::to_value)
                .ok_or_else(|| ScriptError::key(index.repr())),
            Value::List(_) | Value::Tuple(_) => {
                let selector = index.iter_values(self.max_len())?;
                if let Some(mask) = as_mask(&selector) {
                    if mask.len() != frame.rows() {
                        return Err(ScriptError::value(format!(
                            "Item wrong length {} instead of {}",
                            mask.len(),
                            frame.rows()
                        )));
                    }
                    self.meter.charge(frame.rows() * frame.columns.len())?;
                    return Ok(Value::frame(filter_rows(frame, &mask)));
                }
                let names = selector
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| ScriptError::key(v.repr()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::frame(frame.select(&names)?))
            }
            other => Err(ScriptError::key(other.repr())),
        }
    }

    fn slice(
        &mut self,
        object: &Value,
        lower: Option<Value>,
        upper: Option<Value>,
    ) -> Result<Value, ScriptError> {
        let len = object.len().ok_or_else(|| {
            ScriptError::type_error(format!(
                "'{}' object is not subscriptable",
                object.type_name()
            ))
        })?;
        let (start, end) = slice_bounds(lower, upper, len)?;
        self.meter.charge(end - start)?;
        match object {
            Value::List(items) => Ok(Value::list(items.borrow()[start..end].to_vec())),
            Value::Tuple(items) => Ok(Value::tuple(items[start..end].to_vec())),
            Value::Str(s) => Ok(Value::str(
                s.chars().skip(start).take(end - start).collect::<String>(),
            )),
            Value::Array(items) => Ok(Value::array(items[start..end].to_vec())),
            Value::Range(range) => Ok(Value::Range(RangeValue {
                start: range.get(start),
                stop: range.get(end),
                step: range.step,
            })),
            Value::Frame(frame) => Ok(Value::frame(frame.borrow().rows_slice(start, end))),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub fn get_attr(&mut self, object: &Value, name: &str) -> Result<Value, ScriptError> {
        if name.starts_with('_') {
            return Err(ScriptError::attribute(format!(
                "access to '{}' is not allowed",
                name
            )));
        }
        let found = match object {
            Value::Module(namespace) => module_attr(*namespace, name),
            Value::Figure => PyplotFn::figure_method(name).map(Value::Pyplot),
            Value::Axes => PyplotFn::axes_method(name).map(Value::Pyplot),
            Value::Array(items) => array_attr(items, name).or_else(|| methods::bind(object, name)),
            Value::Frame(frame) => {
                methods::bind(object, name).or_else(|| frame_attr(&frame.borrow(), name))
            }
            _ => methods::bind(object, name),
        };
        found.ok_or_else(|| match object {
            Value::Module(namespace) => ScriptError::attribute(format!(
                "module '{}' has no attribute '{}'",
                namespace.name(),
                name
            )),
            other => ScriptError::attribute(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            )),
        })
    }

    pub fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        self.meter.tick()?;
        match callee {
            Value::Builtin(func) => builtins::call_builtin(self, func, Args::new(func.name(), args, kwargs)),
            Value::Numpy(func) => builtins::call_numpy(self, func, Args::new(func.name(), args, kwargs)),
            Value::Pandas(func) => builtins::call_pandas(self, func, Args::new(func.name(), args, kwargs)),
            Value::Pyplot(func) => plotting::call_pyplot(self, func, Args::new(func.name(), args, kwargs)),
            Value::Method(receiver, name) => {
                methods::call_method(self, &receiver, name, Args::new(name, args, kwargs))
            }
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

/// Resolve a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&index).then_some(index as usize)
}

fn position(index: &Value, len: usize, what: &str) -> Result<usize, ScriptError> {
    let i = index.as_index().map_err(|_| {
        ScriptError::type_error(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        ))
    })?;
    normalize_index(i, len).ok_or_else(|| ScriptError::index(format!("{} index out of range", what)))
}

/// Python slice clamping: out-of-range bounds shrink to the sequence.
pub fn slice_bounds(
    lower: Option<Value>,
    upper: Option<Value>,
    len: usize,
) -> Result<(usize, usize), ScriptError> {
    let clamp = |bound: Option<Value>, default: usize| -> Result<usize, ScriptError> {
        match bound {
            None | Some(Value::None) => Ok(default),
            Some(bound) => {
                let i = bound.as_index().map_err(|_| {
                    ScriptError::type_error("slice indices must be integers or None")
                })?;
                let len = len as i64;
                let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
                Ok(i as usize)
            }
        }
    };
    let start = clamp(lower, 0)?;
    let end = clamp(upper, len)?;
    Ok((start, end.max(start)))
}

fn as_mask(values: &[Value]) -> Option<Vec<bool>> {
    if values.is_empty() {
        return None;
    }
    values
        .iter()
        .map(|v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })
        .collect()
}

fn filter_rows(frame: &Frame, mask: &[bool]) -> Frame {
    let keep = |i: &usize| mask[*i];
    let columns = frame
        .columns
        .iter()
        .map(|(name, column)| {
            let column = match column {
                Column::Numbers(items) => Column::Numbers(Rc::new(
                    (0..items.len()).filter(keep).map(|i| items[i]).collect(),
                )),
                Column::Labels(items) => Column::Labels(Rc::new(
                    (0..items.len()).filter(keep).map(|i| items[i].clone()).collect(),
                )),
            };
            (name.clone(), column)
        })
        .collect();
    Frame { columns }
}

fn repeat(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn zero_division(message: &str) -> ScriptError {
    ScriptError::new(ScriptErrorKind::ZeroDivisionError, message)
}

/// Python's `%`: the result takes the sign of the divisor.
pub fn python_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

/// Scalar arithmetic with Python's error behaviour.
pub fn arithmetic(op: BinOp, a: f64, b: f64) -> Result<f64, ScriptError> {
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("integer modulo by zero"));
            }
            python_mod(a, b)
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ScriptError::value(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            a.powf(b)
        }
    })
}

/// Array arithmetic follows numpy: no exceptions, IEEE results instead.
fn elementwise(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod if b == 0.0 => f64::NAN,
        BinOp::Mod => python_mod(a, b),
        BinOp::Pow => a.powf(b),
    }
}

fn ordered(op: CmpOp, a: f64, b: f64) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Is | CmpOp::In => a == b,
        CmpOp::NotEq | CmpOp::IsNot | CmpOp::NotIn => a != b,
        CmpOp::Lt => a < b,
        CmpOp::LtE => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::GtE => a >= b,
    }
}

fn broadcast_len(a: usize, b: usize) -> Result<usize, ScriptError> {
    match (a, b) {
        _ if a == b => Ok(a),
        (1, n) | (n, 1) => Ok(n),
        _ => Err(ScriptError::value(format!(
            "operands could not be broadcast together with shapes ({},) ({},)",
            a, b
        ))),
    }
}

fn pick(values: &[f64], i: usize) -> f64 {
    if values.len() == 1 { values[0] } else { values[i] }
}

fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Frame(x), Value::Frame(y)) => Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::None, Value::None) => true,
        (Value::None, _) | (_, Value::None) => false,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        _ => py_eq(a, b),
    }
}

fn module_attr(namespace: Namespace, name: &str) -> Option<Value> {
    match namespace {
        Namespace::Pyplot => PyplotFn::from_name(name).map(Value::Pyplot),
        Namespace::Numpy => match name {
            "pi" => Some(Value::Num(std::f64::consts::PI)),
            "e" => Some(Value::Num(std::f64::consts::E)),
            "nan" => Some(Value::Num(f64::NAN)),
            "inf" => Some(Value::Num(f64::INFINITY)),
            "random" => Some(Value::Module(Namespace::NumpyRandom)),
            _ => builtins::NumpyFn::from_name(name).map(Value::Numpy),
        },
        Namespace::NumpyRandom => builtins::NumpyFn::from_random_name(name).map(Value::Numpy),
        Namespace::Pandas => builtins::PandasFn::from_name(name).map(Value::Pandas),
        Namespace::Matplotlib => match name {
            "pyplot" => Some(Value::Module(Namespace::Pyplot)),
            "use" => Some(Value::Pyplot(PyplotFn::Use)),
            _ => None,
        },
    }
}

fn array_attr(items: &Rc<Vec<f64>>, name: &str) -> Option<Value> {
    match name {
        "shape" => Some(Value::tuple(vec![Value::Num(items.len() as f64)])),
        "size" => Some(Value::Num(items.len() as f64)),
        "ndim" => Some(Value::Num(1.0)),
        "T" => Some(Value::Array(Rc::clone(items))),
        _ => None,
    }
}

fn frame_attr(frame: &Frame, name: &str) -> Option<Value> {
    match name {
        "columns" => Some(Value::list(
            frame.column_names().into_iter().map(Value::str).collect(),
        )),
        "shape" => Some(Value::tuple(vec![
            Value::Num(frame.rows() as f64),
            Value::Num(frame.columns.len() as f64),
        ])),
        "index" => Some(Value::Range(RangeValue {
            start: 0,
            stop: frame.rows() as i64,
            step: 1,
        })),
        "empty" => Some(Value::Bool(frame.rows() == 0)),
        other => frame.column(other).map(Column::to_value),
    }
}
