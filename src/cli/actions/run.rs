use super::{rotate, server, Action};
use crate::cli::telemetry;
use anyhow::Result;

pub(super) async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Server(args) => server::execute(args).await,
        Action::Rotate(args) => rotate::execute(&args),
    };

    telemetry::shutdown_tracer();

    result
}
