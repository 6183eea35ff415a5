use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cricket_ranked::challenge::ChallengeCoordinator;
use cricket_ranked::config::Config;
use cricket_ranked::coordinator::RankedMatchCoordinator;
use cricket_ranked::db::Database;
use cricket_ranked::engine::Unattached;
use cricket_ranked::metrics;
use cricket_ranked::notify::TracingNotifier;
use cricket_ranked::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    if config.policy.enforcement_enabled {
        tracing::info!("anti-cheat enforcement is on");
    }

    // The chat front end and gameplay engine attach through the library;
    // standalone, notices are logged and matches cannot be played.
    let ranked = RankedMatchCoordinator::new(
        db.clone(),
        Arc::new(Unattached),
        Arc::new(TracingNotifier::default()),
        config.policy.clone(),
        None,
    );
    let challenges = ChallengeCoordinator::new(ranked.clone());

    match ranked.recover_queue().await {
        Ok(n) if n > 0 => tracing::info!("cleared {n} queue entries from previous run"),
        Ok(_) => {}
        Err(e) => tracing::error!("failed to clear queue mirror: {e}"),
    }
    if let Err(e) = challenges.recover().await {
        tracing::error!("failed to expire stored challenges: {e}");
    }

    ranked.spawn_stale_sweep();

    let app = server::router(ranked, challenges);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("ranked backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
