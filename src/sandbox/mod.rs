//! Isolated execution of visualization snippets.
//!
//! The sandbox does not rely on the classifier for safety. A snippet can only
//! reach the names in [`ALLOWED_GLOBALS`]; there is no file, network,
//! process or import machinery for it to find.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SandboxExecutor                            │
//! │                                                                   │
//! │   acquire render lock ─▶ spawn worker ─▶ await under deadline     │
//! │            │                  │                  │                │
//! │            │                  ▼                  ▼                │
//! │            │      ┌────────────────────┐   trip interrupt,        │
//! │            │      │ worker thread      │   join within grace      │
//! │            │      │  parse             │                          │
//! │            │      │  SandboxEnvironment│                          │
//! │            │      │  Interpreter+Meter │                          │
//! │            │      └────────────────────┘                          │
//! │            ▼                                                      │
//! │   render capture ─▶ teardown (clear surface, release lock)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Limits
//!
//! | Limit | Source | Effect |
//! |-------|--------|--------|
//! | Deadline | `VIZ_EXECUTION_TIMEOUT_SECS` | `TimedOut` |
//! | Step budget | `VIZ_STEP_BUDGET` | `Faulted` (`LimitExceeded`) |
//! | Collection size | `VIZ_MAX_COLLECTION_LEN` | `Faulted` (`LimitExceeded`) |
//! | Raster size | `VIZ_MAX_RASTER_WIDTH/HEIGHT` | figure scaled down |

mod environment;
mod error;
mod executor;
mod limits;

pub use environment::{ALLOWED_GLOBALS, RANDOM_SEED, SandboxEnvironment};
pub use error::SandboxError;
pub use executor::{ExecutionOutcome, ExecutionResult, ExecutionTrace, SandboxExecutor, SandboxState};
pub use limits::{InterruptHandle, ResourceLimits};
