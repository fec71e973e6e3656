mod cli;
mod infra;
mod replay;
mod routes;
mod server;

use provider_portal::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
