//! The global scope a snippet runs in.
//!
//! A snippet can only name what is listed in [`ALLOWED_GLOBALS`] plus the
//! variables it assigns itself. There is no `open`, `eval`, `__import__`,
//! `os` or `sys`: those names simply do not exist, so a snippet that
//! reaches for them faults with a `NameError` before anything happens.

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::render::Figure;
use crate::script::builtins::Builtin;
use crate::script::plotting::PyplotFn;
use crate::script::value::{Namespace, Value};

/// Seed of `np.random` at the start of every execution.
pub const RANDOM_SEED: u64 = 0x5EED_0F_5EED;

/// Every name visible to a snippet before it assigns anything.
pub const ALLOWED_GLOBALS: &[&str] = &[
    // builtins
    "range", "len", "str", "int", "float", "bool", "list", "tuple", "dict", "min", "max", "sum",
    "abs", "round", "print", "zip", "enumerate", "sorted", "reversed",
    // library namespaces
    "plt", "np", "numpy", "pd", "pandas", "matplotlib",
    // pylab-style plotting functions
    "plot", "scatter", "bar", "barh", "hist", "pie", "title", "xlabel", "ylabel", "grid", "legend",
];

fn global_value(name: &str) -> Option<Value> {
    if let Some(builtin) = Builtin::from_name(name) {
        return Some(Value::Builtin(builtin));
    }
    if let Some(func) = PyplotFn::pylab(name) {
        return Some(Value::Pyplot(func));
    }
    let namespace = match name {
        "plt" => Namespace::Pyplot,
        "np" | "numpy" => Namespace::Numpy,
        "pd" | "pandas" => Namespace::Pandas,
        "matplotlib" => Namespace::Matplotlib,
        _ => return None,
    };
    Some(Value::Module(namespace))
}

/// Per-execution scope: allow-listed globals, snippet locals, the figure
/// being drawn and the random generator behind `np.random`.
///
/// Built fresh for every execution and dropped afterward.
pub struct SandboxEnvironment {
    globals: HashMap<&'static str, Value>,
    locals: HashMap<String, Value>,
    figure: Figure,
    rng: StdRng,
}

impl Default for SandboxEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxEnvironment {
    pub fn new() -> Self {
        let globals = ALLOWED_GLOBALS
            .iter()
            .filter_map(|name| global_value(name).map(|value| (*name, value)))
            .collect();
        Self {
            globals,
            locals: HashMap::new(),
            figure: Figure::new(),
            rng: StdRng::seed_from_u64(RANDOM_SEED),
        }
    }

    /// Resolve a name: snippet locals shadow globals.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    pub fn assign(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn figure(&self) -> &Figure {
        &self.figure
    }

    pub fn figure_mut(&mut self) -> &mut Figure {
        &mut self.figure
    }

    /// Hand the drawn figure to render capture, leaving a blank one.
    pub fn take_figure(&mut self) -> Figure {
        std::mem::take(&mut self.figure)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_allowed_name_resolves() {
        let env = SandboxEnvironment::new();
        for name in ALLOWED_GLOBALS {
            assert!(env.lookup(name).is_some(), "{} should resolve", name);
        }
        assert_eq!(env.globals.len(), ALLOWED_GLOBALS.len());
    }

    #[test]
    fn test_dangerous_names_are_absent() {
        let env = SandboxEnvironment::new();
        for name in ["open", "eval", "exec", "__import__", "os", "sys", "subprocess", "globals", "getattr", "compile", "input"] {
            assert!(env.lookup(name).is_none(), "{} must not resolve", name);
        }
    }

    #[test]
    fn test_locals_shadow_globals() {
        let mut env = SandboxEnvironment::new();
        env.assign("len", Value::Num(3.0));
        assert!(matches!(env.lookup("len"), Some(Value::Num(_))));
        assert!(matches!(SandboxEnvironment::new().lookup("len"), Some(Value::Builtin(_))));
    }

    #[test]
    fn test_fresh_environments_share_nothing() {
        let mut first = SandboxEnvironment::new();
        first.assign("x", Value::Num(1.0));
        let second = SandboxEnvironment::new();
        assert!(second.lookup("x").is_none());
        assert!(second.figure().is_empty());
    }
}
