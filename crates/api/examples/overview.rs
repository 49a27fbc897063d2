//! Print the workloads overview for a namespace, newest first.
//!
//! ```sh
//! KANSO_LOG=debug cargo run -p kanso-api --example overview -- prod
//! ```

use std::str::FromStr;

use kanso_api::{
    InProcApi, KansoApi, ListQuery, MetricQuery, NamespaceQuery, Pagination, SortQuery,
};

fn init_tracing() {
    let env = std::env::var("KANSO_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KANSO_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KANSO_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    init_metrics();

    let ns = match std::env::args().nth(1) {
        Some(one) => NamespaceQuery::one(one),
        None => NamespaceQuery::all(),
    };
    let query = ListQuery {
        sort: SortQuery::parse("d,creationTimestamp"),
        pagination: Pagination::new(10, 0),
        metrics: MetricQuery::standard(),
        ..ListQuery::default()
    };

    let api = InProcApi::connect().await?;
    let overview = api.workloads(&ns, &query).await?;
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(())
}
