//! xlsmconv CLI
//!
//! 起動ディレクトリの`src/`にある.xlsmを選択し、保護とマクロを取り除いた.xlsxを
//! `converted/<timestamp>/`に出力する対話ツール。

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xlsmconv::{
    print_failure, run, AppConfig, ConverterBuilder, Prompter, DEFAULT_OUTPUT_ROOT,
    DEFAULT_SOURCE_DIR,
};

#[derive(Parser, Debug)]
#[command(name = "xlsmconv")]
#[command(about = "Convert a macro-enabled workbook (.xlsm) to .xlsx and remove sheet/workbook protection")]
#[command(version)]
#[command(after_help = "With no options the fixed layout is used: workbooks are read from ./src \
and written to ./converted/<timestamp>/ under the current directory.")]
struct Cli {
    /// Directory scanned for .xlsm files
    #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
    src_dir: PathBuf,

    /// Root directory for timestamped output directories
    #[arg(long, default_value = DEFAULT_OUTPUT_ROOT)]
    out_dir: PathBuf,

    /// Do not wait for Enter before exiting
    #[arg(long)]
    no_pause: bool,

    /// Show debug logs on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "xlsmconv=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let converter = match ConverterBuilder::new().build() {
        Ok(converter) => converter,
        Err(e) => {
            let _ = print_failure(&mut io::stderr(), &e);
            return ExitCode::FAILURE;
        }
    };
    let mut config = AppConfig::new(converter);
    config.source_dir = cli.src_dir;
    config.output_root = cli.out_dir;

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let code = match run(&config, &mut prompter) {
        Ok(outcome) => {
            tracing::debug!(?outcome, "run finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = ?e, "run failed");
            let _ = print_failure(&mut io::stderr(), &e);
            ExitCode::FAILURE
        }
    };

    if !cli.no_pause {
        let _ = prompter.pause();
    }
    code
}
