use std::sync::Arc;

use escrowd_api::app::{build_app, AppServices};
use escrowd_api::config::{Config, NotifyConfig};
use escrowd_api::worker;
use escrowd_engine::{
    DeadlineProcessor, EscalationProcessor, JobProcessor, ReminderProcessor, SchedulingEngine,
    WebhookRouter,
};
use escrowd_ports::{
    ChainRpc, DealApi, DialectNotifier, HttpChainRpc, HttpDealApi, NoopNotifier, Notifier,
};
use escrowd_queue::{DelayedJobStore, RedisJobStore};

const DEFAULT_ACTIONS_BASEURL: &str = "http://127.0.0.1:3000";

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    };

    escrowd_observability::init(&config.log_level);

    let store: Arc<dyn DelayedJobStore> = match RedisJobStore::new(&config.redis_url) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %err, "failed to open queue substrate");
            std::process::exit(1);
        }
    };

    let actions_baseurl = config
        .actions_baseurl
        .clone()
        .unwrap_or_else(|| DEFAULT_ACTIONS_BASEURL.to_string());
    let api: Arc<dyn DealApi> =
        Arc::new(HttpDealApi::new(actions_baseurl).expect("failed to build deals api client"));

    let chain: Option<Arc<dyn ChainRpc>> = config.rpc_url.as_deref().map(|url| {
        Arc::new(HttpChainRpc::new(url).expect("failed to build chain rpc client"))
            as Arc<dyn ChainRpc>
    });

    let notifier: Arc<dyn Notifier> = match &config.notify {
        NotifyConfig::Noop => Arc::new(NoopNotifier),
        NotifyConfig::Dialect { key, base_url } => Arc::new(
            DialectNotifier::new(base_url.clone(), key.clone())
                .expect("failed to build dialect notifier"),
        ),
    };

    let processors: Vec<Arc<dyn JobProcessor>> = vec![
        Arc::new(DeadlineProcessor::new(
            store.clone(),
            api.clone(),
            notifier.clone(),
            config.policy,
        )),
        Arc::new(ReminderProcessor::new(api.clone(), notifier.clone())),
        Arc::new(EscalationProcessor::new(
            api.clone(),
            notifier.clone(),
            config.policy,
        )),
    ];
    let pool = worker::spawn_workers(store.clone(), processors, config.worker_concurrency);

    let engine = SchedulingEngine::new(store.clone());
    let router = WebhookRouter::new(engine, api, chain);
    let services = Arc::new(AppServices {
        webhook_secret: config.webhook_secret.clone(),
        router,
        store,
    });
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");
    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // HTTP is down; drain the workers before exit.
    pool.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
