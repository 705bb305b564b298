// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relational_ledger_server::{
    api::router,
    auth::SessionAuth,
    clock::{Clock, SystemClock},
    config::AppConfig,
    keys::{KeyService, DEFAULT_PBKDF2_ITERATIONS},
    ledger::LedgerService,
    providers::paystack::PaystackClient,
    state::AppState,
    storage::LedgerDb,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    let db = match LedgerDb::open(&config.data_dir.join("ledger.redb")) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(error = %e, "failed to open ledger database");
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(LedgerService::new(
        Arc::clone(&db),
        Arc::clone(&clock),
        config.processor_secret.clone(),
    ));
    let keys = Arc::new(KeyService::new(
        Arc::clone(&db),
        Arc::clone(&clock),
        DEFAULT_PBKDF2_ITERATIONS,
    ));
    let session = Arc::new(SessionAuth::new(config.session_secret.clone()));
    let gateway = PaystackClient::new(
        config.processor_base_url.clone(),
        config.processor_secret.clone(),
    )
    .map(Arc::new)
    .ok();

    // Dev convenience: provision a known user/wallet at startup
    if let Ok(email) = env::var("SEED_USER_EMAIL") {
        match ledger.provision_user(&email, None, None, None) {
            Ok((user, wallet)) => tracing::info!(
                user_id = %user.user_id,
                wallet_number = %wallet.wallet_number,
                "seed user ready"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to provision seed user"),
        }
    }

    let state = AppState::new(db, ledger, keys, session, gateway, clock);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Relational Ledger server listening on http://{addr} (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .expect("server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
