//! Finds the repositories that depend on a package and records how they use one of its components.

use std::io::Write;
use std::io::{stderr, stdout};
use used_by::{Host, run};

/// Host backed by the real process streams.
#[derive(Debug, Clone, Default)]
struct RealHost;

impl Host for RealHost {
    fn output(&mut self) -> impl Write {
        stdout()
    }

    fn error(&mut self) -> impl Write {
        stderr()
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}

#[tokio::main]
async fn main() -> Result<(), ohno::AppError> {
    run(&mut RealHost, std::env::args()).await
}
