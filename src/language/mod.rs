pub mod ast;
pub mod context;
pub mod errors;
pub mod passes;
pub mod scope;
pub mod span;
pub mod symbols;
pub mod types;

pub use context::Context;
