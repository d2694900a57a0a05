use std::{future::IntoFuture, pin::pin, process, sync::Arc, time::Duration};

use jairo::{
    application::{
        error::AppError,
        snapshot::SnapshotCell,
        stats::{self, CachedStats, DurableStats},
    },
    config::{self, AssetMode, StatsStrategy},
    infra::{
        assets::AssetSource,
        error::InfraError,
        http::{self, CounterRuntime, HttpState},
        store::StatsStore,
        telemetry,
    },
    presentation::views::render_homepage,
};
use tokio::{signal, sync::oneshot};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli().map_err(AppError::from)?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let store = Arc::new(StatsStore::open(&settings.store.path)?);
    let seed = store.load()?;
    info!(
        target_module = "jairo::startup",
        path = %settings.store.path.display(),
        visits = seed.visits,
        likes = seed.likes,
        "counter store opened"
    );

    let assets = Arc::new(match settings.assets.source {
        AssetMode::Bundled => AssetSource::Bundled,
        AssetMode::Live => AssetSource::Live(settings.assets.live_dir.clone()),
    });

    let (counters, flush_handle) = match settings.stats.strategy {
        StatsStrategy::Cached => {
            let stats = Arc::new(CachedStats::new(Arc::clone(&store), seed));
            let initial = render_homepage(seed)
                .map_err(|err| AppError::unexpected(format!("initial render failed: {err}")))?;
            let snapshot = Arc::new(SnapshotCell::new(initial));

            let flush_stats = Arc::clone(&stats);
            let handle = tokio::spawn(stats::run_flush_loop(
                flush_stats,
                settings.stats.flush_interval,
            ));

            (CounterRuntime::Cached { stats, snapshot }, Some(handle))
        }
        StatsStrategy::Durable => {
            let stats = Arc::new(DurableStats::new(
                Arc::clone(&store),
                settings.stats.like_decrements_visits,
            ));
            (CounterRuntime::Durable { stats }, None)
        }
    };

    let state = HttpState {
        counters: counters.clone(),
        assets,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target_module = "jairo::startup",
        addr = %settings.server.addr,
        strategy = ?settings.stats.strategy,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx));
    let mut server = pin!(server.into_future());

    let result = tokio::select! {
        res = &mut server => {
            res.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = drain_deadline(shutdown_rx, settings.server.graceful_shutdown) => {
            warn!(
                target_module = "jairo::shutdown",
                "graceful shutdown deadline exceeded; dropping in-flight connections"
            );
            Ok(())
        }
    };

    if let Some(handle) = flush_handle {
        handle.abort();
        let _ = handle.await;
    }

    // The flush loop is stopped; write whatever it had not yet persisted.
    if let CounterRuntime::Cached { stats, .. } = &counters {
        match stats.flush() {
            Ok(()) => info!(target_module = "jairo::shutdown", "final counter flush complete"),
            Err(err) => {
                error!(target_module = "jairo::shutdown", error = %err, "final counter flush failed")
            }
        }
    }

    result
}

async fn shutdown_signal(drain_started: oneshot::Sender<()>) {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown signal handler");
    }
    info!(target_module = "jairo::shutdown", "shutdown signal received");
    let _ = drain_started.send(());
}

/// The drain deadline only starts counting once the shutdown signal fires.
async fn drain_deadline(drain_started: oneshot::Receiver<()>, deadline: Duration) {
    let _ = drain_started.await;
    tokio::time::sleep(deadline).await;
}
