use changebank::JwtValidator;
use changebank::middleware::{AuthConfig, app_routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,changebank=debug")),
        )
        .init();

    let config = AuthConfig::from_env()?;
    let port = config.port();

    let client = config.client();
    let validator = JwtValidator::with_jwks(
        client.metadata_resolver(),
        reqwest::Client::new(),
        client.config().issuer().as_str(),
        client.config().client_id(),
    );
    tracing::info!(
        issuer = %client.config().issuer(),
        client_id = client.config().client_id(),
        "Configured identity provider"
    );

    let app = app_routes(config, validator);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Listening on http://localhost:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
