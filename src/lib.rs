#![allow(clippy::collapsible_if)]

pub mod diagnostics;
pub mod language;
pub mod logging;
pub mod runtime;
pub mod session;

pub use session::{ImportResolver, Session, SessionError, SessionOptions};

#[cfg(test)]
mod tests;
