//! `loom-core`: lexer, parser, compiler, value model, and bytecode VM for
//! the loom scripting language.
//!
//! The crate is organised the way the pipeline runs: [`lexer`] turns source
//! text into tokens, [`parser`] turns tokens into an [`ast`], [`compiler`]
//! lowers the AST into [`bytecode`] plus side tables, and [`vm`] executes
//! it against the [`value`] model. [`driver`] wires the four stages
//! together for a front-end (REPL or file runner) to call.

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod driver;
pub mod errors;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod value;
pub mod vm;

pub use errors::Error;

/// Test utilities shared across the crate's `#[cfg(test)]` modules.
#[cfg(test)]
pub(crate) mod test_utils {
    /// Initialise a tracing subscriber for tests that want to see log output.
    /// Safe to call multiple times; later calls are no-ops.
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
