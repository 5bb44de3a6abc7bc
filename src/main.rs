use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use env_logger::Env;

use cubifier::config::Args;
use cubifier::diagnostics::LogSink;
use cubifier::error::Error;
use cubifier::io::process_file;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = err.print();
            return code;
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_filter())).init();

    match process_file(&args.file, &LogSink) {
        Ok(_) => ExitCode::SUCCESS,
        Err(Error::UnrecognizedDialect(first_line)) => {
            log::error!("unrecognized G-code format, first line: {first_line:?}");
            ExitCode::FAILURE
        }
        // conversion failures leave the input untouched; not a batch abort
        Err(err) => {
            log::error!("{err}");
            ExitCode::SUCCESS
        }
    }
}
