//! Ordered semantic passes over a parsed program.
//!
//! Every pass decorates the tree in place and reports into one shared
//! `Diagnostics` list; the driver decides how far to run and whether the
//! first error aborts the input.

pub mod resolve;
pub mod rewrite;
pub mod typecheck;
pub mod validate;
pub mod walk;

use crate::language::{ast::Program, errors::Diagnostics, Context};
use tracing::{debug, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Rewrite = 1,
    Resolve = 2,
    Validate = 3,
    Check = 4,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Rewrite, Phase::Resolve, Phase::Validate, Phase::Check];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Whole program; every diagnostic is collected.
    Batch,
    /// One shell input; the first diagnostic aborts and rolls back.
    Interactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub last_phase: Phase,
    pub mode: Mode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            last_phase: Phase::Check,
            mode: Mode::Batch,
        }
    }
}

impl PipelineOptions {
    pub fn interactive() -> Self {
        Self {
            mode: Mode::Interactive,
            ..Self::default()
        }
    }

    pub fn until(last_phase: Phase) -> Self {
        Self {
            last_phase,
            ..Self::default()
        }
    }
}

fn run_phase(phase: Phase, ctx: &mut Context, program: &mut Program, diags: &mut Diagnostics) {
    match phase {
        Phase::Rewrite => rewrite::rewrite_program(ctx, program, diags),
        Phase::Resolve => resolve::resolve_program(ctx, program, diags),
        Phase::Validate => validate::validate_program(ctx, program, diags),
        Phase::Check => typecheck::check_program(ctx, program, diags),
    }
}

/// Runs every phase up to `options.last_phase`.
///
/// In interactive mode the context is journaled: a failing input leaves no
/// declaration or instantiation behind and only its first diagnostic is
/// reported.
#[instrument(level = "debug", skip_all, fields(mode = ?options.mode, last = ?options.last_phase))]
pub fn run_pipeline(ctx: &mut Context, program: &mut Program, options: &PipelineOptions) -> Diagnostics {
    let mut diags = Diagnostics::default();
    let interactive = options.mode == Mode::Interactive;
    if interactive {
        ctx.begin_journal();
    }
    for phase in Phase::ALL {
        if phase > options.last_phase {
            break;
        }
        run_phase(phase, ctx, program, &mut diags);
        debug!(?phase, errors = diags.len(), "phase finished");
        if interactive && !diags.is_empty() {
            break;
        }
    }
    if interactive {
        if diags.is_empty() {
            ctx.commit();
        } else {
            ctx.rollback();
            diags.errors.truncate(1);
        }
    }
    diags
}

#[cfg(test)]
mod tests;
