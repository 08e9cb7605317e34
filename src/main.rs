use anyhow::{Context, Result};
use chrono::Utc;

use nsp_token_manager::auth::{CredentialResolver, HttpTokenAcquirer, TokenLifecycleManager};
use nsp_token_manager::config::{self, Command, Settings};
use nsp_token_manager::http_client::{self, VerifyOutcome};
use nsp_token_manager::logging;
use nsp_token_manager::schedule::ActiveWindow;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log settings)
    let settings = Settings::load()?;
    logging::init(&settings.log)?;

    tracing::debug!(config = %settings.config_path.display(), "NSP token manager starting");

    let store = settings.load_store()?;
    let verify_ssl = config::verify_ssl(&store)?;

    if let Command::Refresh { force } = settings.command {
        let window = ActiveWindow::from_store(&store)?;
        if !force && !window.contains(Utc::now()) {
            println!("# Outside of active hours ({}). Nothing to do.", window);
            return Ok(());
        }
    }

    let acquirer = HttpTokenAcquirer::new(verify_ssl)?;
    let manager = TokenLifecycleManager::new(
        settings.config_path.clone(),
        acquirer,
        CredentialResolver::from_env(),
    )
    .with_lock_timeout(settings.lock_timeout);

    let token = manager
        .get_valid_token()
        .await
        .context("Failed to obtain a valid token")?;

    match settings.command {
        Command::Token { raw: true } => println!("{}", token.access_token),
        Command::Token { raw: false } => {
            println!("server: {}", token.server);
            println!("token: {}...", token.preview());
        }
        Command::Refresh { .. } => {
            println!("# Successfully obtained token: {}...", token.preview());
        }
        Command::Verify => verify(&token.server, &token.access_token, verify_ssl).await?,
    }

    Ok(())
}

/// Probe the token against the NSP API and report the result
async fn verify(server: &str, token: &str, verify_ssl: bool) -> Result<()> {
    let client = http_client::build_client(verify_ssl)?;

    match http_client::verify_token(&client, server, token).await? {
        VerifyOutcome::Valid(user) => {
            println!("Token is valid. API access successful.");
            println!("   User:  {}", user.name.as_deref().unwrap_or("Unknown"));
            println!("   Email: {}", user.email.as_deref().unwrap_or("Unknown"));
            println!("   Roles: {:?}", user.roles);
            Ok(())
        }
        VerifyOutcome::Invalid => {
            anyhow::bail!("Token is invalid or expired (401 Unauthorized)")
        }
        VerifyOutcome::Unexpected { status, body } => {
            let preview: String = body.chars().take(200).collect();
            anyhow::bail!("Unexpected response {}: {}", status, preview)
        }
    }
}
