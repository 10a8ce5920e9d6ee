//! PL/0 driver: reads a whole program from stdin, compiles and runs it,
//! and exits 0 on success or 1 after reporting a fatal error on
//! stderr. No command-line flags and no configuration surface of its
//! own (spec §6): the program reads stdin and writes stdout/stderr.
//! `RUST_LOG` only tunes the ambient operational log level, not the
//! program's behavior.

use std::io::Read;
use std::process::ExitCode;

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new().env().init().ok();

    let mut source = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut source) {
        eprintln!("error: could not read source from stdin: {}", err);
        return ExitCode::FAILURE;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match pl0::run(&source, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.report());
            ExitCode::FAILURE
        }
    }
}
