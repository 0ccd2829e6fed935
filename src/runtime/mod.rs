pub mod environment;
pub mod error;
pub mod input;
pub mod interpreter;
pub mod platform;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::{Interpreter, RuntimeState, Signal};
pub use platform::{Console, ScriptedConsole, StdConsole};
pub use value::Value;
