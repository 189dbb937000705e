pub mod args;
pub mod coercion;
pub mod interpreter;
pub mod traits;

pub mod builtins;
pub mod reference;

pub use interpreter::{Interpreter, StandardEvaluator};
pub use traits::{EvaluationContext, FormulaEvaluator, Function};

pub mod engine;
