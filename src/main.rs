use github_workflow_ls::{Backend, Config};
use std::error::Error;
use tower_lsp::{LspService, Server};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Sync + Send>> {
    // stdout carries the protocol, so logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env();
    tracing::info!("Starting with {:?}", config);

    // Create the transport for stdin/stdout communication
    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());

    let (service, socket) = LspService::new(|client| Backend::new(client, config));
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
