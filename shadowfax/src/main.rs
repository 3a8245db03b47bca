//! shadowfax binary entry point

use std::process::ExitCode;

use clap::Parser;

use shadowfax::{Args, Config, app};
use shared::{Subsystem, logging, subsystem_debug, subsystem_warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before parsing so PROXY_PORT/PORT from .env apply
    let dotenv_result = dotenv::dotenv();

    let args = Args::parse();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("shadowfax: cannot determine working directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let config = Config::from_args(&args, project_root);

    if let Err(e) = logging::init_tracing(Some(&config.log_level)) {
        eprintln!("shadowfax: {e}");
        return ExitCode::FAILURE;
    }

    match dotenv_result {
        Ok(path) => subsystem_debug!(Subsystem::Shadowfax, "Loaded {}", path.display()),
        Err(e) => subsystem_warn!(Subsystem::Shadowfax, "⚠️ No .env loaded: {}", e),
    }

    match app::run(config).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            logging::log_error(Subsystem::Shadowfax, "Startup", &e);
            ExitCode::FAILURE
        }
    }
}
