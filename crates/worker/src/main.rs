//! Stock decrease worker entry point.

use decrease::BrokerEventPublisher;
use ledger::{InMemoryStockLedger, PostgresStockLedger};
use messaging::{InMemoryBroker, PostgresBroker};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::{Config, ConsumerSet, LogFormat, ServiceInfo};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Spawns the consumers on the backends selected by `DATABASE_URL`.
async fn start_consumers(config: &Config) -> (ConsumerSet, &'static str) {
    let channels = &config.channels;

    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections((config.worker_count + 4) as u32)
                .connect(url)
                .await
                .expect("failed to connect to database");

            let ledger = PostgresStockLedger::new(pool.clone());
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");

            let broker = PostgresBroker::new(pool).with_delay_queue(channels.retry_queue());
            let publisher = BrokerEventPublisher::new(
                broker.clone(),
                &channels.decrease_success,
                &channels.order_process_failed,
            );
            (
                ConsumerSet::spawn(config, ledger, broker, publisher),
                "postgres",
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on in-memory backends");
            let broker = InMemoryBroker::new();
            broker.declare_delay_queue(channels.retry_queue()).await;

            let publisher = BrokerEventPublisher::new(
                broker.clone(),
                &channels.decrease_success,
                &channels.order_process_failed,
            );
            (
                ConsumerSet::spawn(config, InMemoryStockLedger::new(), broker, publisher),
                "memory",
            )
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Start consumers
    let (consumers, backend) = start_consumers(&config).await;

    // 4. Serve health and metrics until a shutdown signal arrives
    let info = ServiceInfo {
        backend,
        workers: config.worker_count,
    };
    let app = worker::create_app(info, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, backend, "starting stock decrease worker");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 5. Let in-flight deliveries finish
    consumers.shutdown().await;
    tracing::info!("worker shut down gracefully");
}
