//! Test utilities for rebind
//!
//! Shared by the unit tests of `rebind-core` and the integration tests in
//! its `tests/` directory: ready-made programs, a reference interpreter
//! for behavioral comparison, and one-time logging setup.

pub mod fixtures;
pub mod interpreter;
pub mod logging;
pub mod program;

pub use interpreter::{Interpreter, InterpreterError, RuntimeValue, Trace};
pub use logging::init_test_logging;
pub use program::TestProgram;
