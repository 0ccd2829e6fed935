//! The surface a shell drives: run the semantic pipeline, execute checked
//! programs and keep declarations alive between interactive inputs.

use crate::language::{
    ast::{Item, Program},
    errors::{Diagnostic, Diagnostics, ErrorCode},
    passes::{run_pipeline, Mode, PipelineOptions},
    Context,
};
use crate::runtime::{
    interpreter::{Interpreter, RuntimeState, DEFAULT_MAX_CALL_DEPTH},
    platform::{default_console, Console},
    RuntimeError, RuntimeResult, Value,
};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, instrument};

/// Loads the program named by an `import` item.
pub trait ImportResolver {
    fn load(&mut self, file: &str) -> Result<Program, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub pipeline: PipelineOptions,
    pub max_call_depth: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pipeline: PipelineOptions::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("input rejected with {} diagnostic(s)", .0.len())]
    Rejected(Diagnostics),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub struct Session {
    options: SessionOptions,
    ctx: Context,
    runtime: RuntimeState,
    console: Box<dyn Console>,
    resolver: Option<Box<dyn ImportResolver>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self::with_console(options, default_console())
    }

    pub fn with_console(options: SessionOptions, console: Box<dyn Console>) -> Self {
        Self {
            options,
            ctx: Context::new(),
            runtime: RuntimeState::new(),
            console,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ImportResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn is_stopped(&self) -> bool {
        self.runtime.is_stopped()
    }

    /// Runs the semantic pipeline over `program`, decorating it in place.
    #[instrument(level = "debug", skip_all)]
    pub fn run(&mut self, program: &mut Program) -> Diagnostics {
        let mut diags = Diagnostics::default();
        let mut seen = HashSet::new();
        self.inline_imports(program, &mut seen, &mut diags);
        if !diags.is_empty() {
            if self.options.pipeline.mode == Mode::Interactive {
                diags.errors.truncate(1);
            }
            return diags;
        }
        run_pipeline(&mut self.ctx, program, &self.options.pipeline)
    }

    /// Interprets a program that `run` accepted.
    pub fn execute(&mut self, program: &Program) -> RuntimeResult<()> {
        Interpreter::new(&self.ctx, &mut self.runtime, self.console.as_mut())
            .with_max_call_depth(self.options.max_call_depth)
            .run(program)
    }

    /// One interactive input: check it in isolation against everything
    /// declared so far, then execute it.
    pub fn eval(&mut self, item: Item) -> Result<(), SessionError> {
        if self.runtime.is_stopped() {
            return Err(RuntimeError::Stopped.into());
        }
        let mut program = Program::new(vec![item]);
        let batch = self.options.pipeline;
        self.options.pipeline.mode = Mode::Interactive;
        let diags = self.run(&mut program);
        self.options.pipeline = batch;
        if !diags.is_empty() {
            return Err(SessionError::Rejected(diags));
        }
        self.execute(&program)?;
        Ok(())
    }

    /// Runs the pipeline and, when it reports nothing, the program itself.
    pub fn run_program(&mut self, mut program: Program) -> Result<(), SessionError> {
        let diags = self.run(&mut program);
        if !diags.is_empty() {
            return Err(SessionError::Rejected(diags));
        }
        self.execute(&program)?;
        Ok(())
    }

    /// Current value of a global variable.
    pub fn global(&self, name: &str) -> Option<Value> {
        let id = self.ctx.scopes.lookup_from(self.ctx.scopes.global(), name)?;
        self.runtime.global(id)
    }

    /// Forgets every declaration and binding, including a previous `stop`.
    pub fn reset(&mut self) {
        debug!("resetting session");
        self.ctx = Context::new();
        self.runtime = RuntimeState::new();
    }

    fn inline_imports(&mut self, program: &mut Program, seen: &mut HashSet<String>, diags: &mut Diagnostics) {
        for item in &mut program.items {
            let Item::Import(import) = item else {
                continue;
            };
            if import.unit.is_some() || !seen.insert(import.file.clone()) {
                continue;
            }
            let loaded = match self.resolver.as_mut() {
                Some(resolver) => resolver.load(&import.file),
                None => Err("no import resolver configured".to_string()),
            };
            match loaded {
                Ok(mut unit) => {
                    debug!(file = %import.file, "inlining import");
                    self.inline_imports(&mut unit, seen, diags);
                    import.unit = Some(Box::new(unit));
                }
                Err(reason) => diags.push(
                    Diagnostic::new(ErrorCode::ImportFailed, import.span)
                        .arg(&import.file)
                        .arg(reason),
                ),
            }
        }
    }
}
