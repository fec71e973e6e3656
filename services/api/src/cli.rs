use crate::replay::{run_autosave_replay, run_progress, AutosaveArgs, ProgressArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use provider_portal::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Provider Portal",
    about = "Run the provider registration portal or inspect its form engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print registration progress for a JSON file of form values
    Progress(ProgressArgs),
    /// Replay timed form edits through the draft autosave controller
    Autosave(AutosaveArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// User id allowed to review registrations (repeatable)
    #[arg(long = "admin")]
    pub(crate) admins: Vec<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Progress(args) => run_progress(args),
        Command::Autosave(args) => run_autosave_replay(args).await,
    }
}
