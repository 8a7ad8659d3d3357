//! The snippet dialect: a small Python-flavoured language for drawing charts.
//!
//! Source goes through [`layout`] (logical lines and indentation), then
//! [`parser`] (nom grammar) into an [`ast::Program`], which the
//! [`Interpreter`] walks against a [`SandboxEnvironment`]. The interpreter
//! owns no I/O: its only side effects are artists recorded on the
//! environment's figure and `print` output routed to `tracing`.
//!
//! [`SandboxEnvironment`]: crate::sandbox::SandboxEnvironment

pub mod ast;
pub mod builtins;
mod error;
pub mod format;
pub mod interpreter;
mod layout;
pub mod methods;
mod parser;
pub mod plotting;
pub mod value;

pub use error::{ScriptError, ScriptErrorKind};
pub use interpreter::{Interpreter, Meter};
pub use parser::{parse_expression, parse_program};
pub use value::Value;
