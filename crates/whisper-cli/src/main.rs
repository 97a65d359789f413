use std::{env, fmt, fs, process::ExitCode};

use whisper_core::{create_runtime, interpret_source_file, make_global_scope, register_thread, EvalResult, HeapPayload, StderrTracer};
use whisper_syntax::{build_packed_syntax_tree, ParseError};

/// Separates the pipeline stages a single run can fail at, the same way
/// the teacher's own `ReplError` keeps parse/compile/runtime failures
/// distinct instead of funneling everything through one string.
#[derive(Debug)]
enum CliError {
    SourceUnreadable(String),
    Parse(ParseError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::SourceUnreadable(message) => write!(f, "{message}"),
            CliError::Parse(error) => write!(f, "parse error: {error}"),
        }
    }
}

impl From<ParseError> for CliError {
    fn from(error: ParseError) -> Self {
        CliError::Parse(error)
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: whisper <source-file>");
        return ExitCode::from(1);
    };

    let source = match read_file(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };

    let tree = match build_packed_syntax_tree(&source).map_err(CliError::from) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(1);
        }
    };

    let runtime = create_runtime();
    let mut ctx = match register_thread(&runtime) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(3);
        }
    };

    if env::var_os("WHISPER_SPEW").is_some() {
        ctx.set_tracer(Box::new(StderrTracer::new()));
    }

    let global = make_global_scope(&mut ctx);
    let scope = global.current(&ctx);
    let result = interpret_source_file(&mut ctx, tree.root(), scope);

    match result {
        EvalResult::Value(_) | EvalResult::Void => ExitCode::from(0),
        EvalResult::Exc { exception, .. } => {
            if let HeapPayload::Exception(data) = &ctx.heap.get(exception).payload {
                eprintln!("uncaught exception: {} ({})", data.message, data.kind);
            }
            ExitCode::from(2)
        }
        EvalResult::Error(message) => {
            eprintln!("error: {message}");
            ExitCode::from(3)
        }
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    fs::read_to_string(file_path).map_err(|err| format!("could not read {file_path}: {err}"))
}
