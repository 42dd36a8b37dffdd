//! expirefiles - expire unused files on shared multi-user storage
//!
//! Command line entry point.
//!
//! # Execution Flow
//!
//! 1. Resolve the caller's role (root or `support` group member => admin)
//! 2. Register the subcommands that role may use and parse the arguments
//! 3. Initialize logging: stderr always, plus a daily rolling file under
//!    `<target>/.expirefiles/logs/` for administrators
//! 4. Run the command on a current-thread tokio runtime
//! 5. Log the run metrics and map any error to an exit code

use anyhow::Result;
use expirefiles::cli::commands::{self, Console, Context};
use expirefiles::cli::{self, Invocation, Role};
use expirefiles::error::exit_code_for;
use expirefiles::metrics::Metrics;
use expirefiles::services::SystemIdentity;
use expirefiles::{APP_NAME, VERSION};
use std::process::ExitCode;

fn main() -> ExitCode {
    let identity = SystemIdentity::new();
    let role = Role::resolve(&identity);

    let args: Vec<String> = std::env::args().collect();
    let invocation = match cli::parse_invocation(&role, &args) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    // Keep the guard alive so the file writer flushes on exit
    let _guard = match expirefiles::logging::setup_logging(
        invocation.log_dir(&role).as_deref(),
        APP_NAME,
        invocation.verbose,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            return ExitCode::from(exit_code_for(&e));
        }
    };

    tracing::info!("Starting {} v{} as {:?}", APP_NAME, VERSION, role);

    let program = args.first().map_or(APP_NAME, String::as_str).to_string();
    match run(&identity, &role, &invocation, program) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("ERROR: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn run(identity: &SystemIdentity, role: &Role, invocation: &Invocation, program: String) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let metrics = Metrics::new();
    let ctx = Context::new(identity, &metrics, program);

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    let mut console = Console {
        out: &mut stdout,
        err: &mut stderr,
    };

    let result = runtime.block_on(commands::run(&ctx, role, &invocation.command, &mut console));
    metrics.log_summary();
    result
}
