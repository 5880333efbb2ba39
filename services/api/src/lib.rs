mod cli;
mod demo;
mod dialogue;
mod infra;
mod routes;
mod server;

use triage_engine::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
