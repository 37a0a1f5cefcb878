use std::sync::Arc;

use clinic_onboarding::config::WizardConfig;
use clinic_onboarding::error::Result;
use clinic_onboarding::onboarding::{
    OnboardingSession, OnboardingStatus, PersistenceGateway, SettingsProgressStore,
};
use clinic_onboarding::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    if !matches!(command.as_str(), "status" | "reset") {
        eprintln!("Usage: clinic-onboarding [status|reset]");
        std::process::exit(2);
    }

    if let Some(status) = run(&command, WizardConfig::from_env()).await? {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }
    Ok(())
}

/// Open the configured store and run `command` against the persisted attempt.
async fn run(command: &str, config: WizardConfig) -> Result<Option<OnboardingStatus>> {
    config.validate()?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    eprintln!("   Database: {}", config.db_path.display());

    let store = Arc::new(SettingsProgressStore::new(db, config.user_id.clone()));
    let gateway = Arc::new(PersistenceGateway::new(store));
    let mut session = OnboardingSession::new(config, gateway);

    if command == "reset" {
        session.reset().await?;
        eprintln!("Onboarding progress cleared for {}", session.config().user_id);
        return Ok(None);
    }

    if !session.resume(None).await? {
        eprintln!("No onboarding in progress for {}", session.config().user_id);
    }
    Ok(Some(session.status()))
}
