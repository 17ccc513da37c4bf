use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use oracle_guard::config::loader::AppConfig;
use oracle_guard::core::health_monitor::HealthMonitor;
use oracle_guard::core::keeper::PriceKeeper;
use oracle_guard::events::base::EventPayload;
use oracle_guard::interfaces::authorizer::RoleRegistry;
use oracle_guard::interfaces::event_sink::{BroadcastEventSink, EventSink, FanoutEventSink, TracingEventSink};
use oracle_guard::observability::metrics::register_metrics;
use oracle_guard::observability::tracing::init_tracing;
use oracle_guard::price_infra::connectors::connector_for;
use oracle_guard::price_infra::feed::PriceFeed;
use oracle_guard::types::ids::OperatorId;
use oracle_guard::utils::task_supervisor::TaskSupervisor;
use oracle_guard::{CircuitBreaker, Clock, OracleAggregator, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("ORACLE_GUARD_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&config.logging)?;
    register_metrics()?;
    tracing::info!(env = %env, sources = config.sources.len(), "Starting oracle guard");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let admin = OperatorId::new();
    let roles = Arc::new(RoleRegistry::with_admin(admin));
    let broadcast = BroadcastEventSink::new(1024);
    let events: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(vec![
        Arc::new(TracingEventSink),
        Arc::new(broadcast.clone()),
    ]));

    let aggregator = Arc::new(OracleAggregator::new(clock.clone(), roles.clone(), events.clone()));
    for source in &config.sources {
        match &source.endpoint {
            Some(endpoint) => aggregator.add_oracle_with_endpoint(
                &admin,
                source.source_id.clone(),
                source.weight_bps,
                source.max_staleness_secs,
                endpoint.clone(),
            )?,
            None => aggregator.add_oracle(
                &admin,
                source.source_id.clone(),
                source.weight_bps,
                source.max_staleness_secs,
            )?,
        }
        if !source.enabled {
            aggregator.set_oracle_active(&admin, &source.source_id, false)?;
        }
    }

    let breaker = Arc::new(CircuitBreaker::new(config.breaker, clock, roles, events)?);

    let mut supervisor = TaskSupervisor::new();
    supervisor.spawn(
        "keeper",
        PriceKeeper::new(
            aggregator.clone(),
            breaker.clone(),
            Duration::from_secs(config.keeper.interval_secs),
        )
        .run(),
    );
    supervisor.spawn(
        "health",
        HealthMonitor::new(
            aggregator.clone(),
            Duration::from_secs(config.health.interval_secs),
            config.health.probe_timeout(),
        )
        .run(),
    );
    for source in config.sources.iter().filter(|s| s.enabled) {
        if let Some(feed) = &source.feed {
            let connector = connector_for(source.source_id.clone(), feed);
            supervisor.spawn(
                format!("feed:{}", source.source_id),
                PriceFeed::new(connector, aggregator.clone(), (&config.feed).into()).run(),
            );
        }
    }

    let mut alerts = broadcast.subscribe();
    supervisor.spawn("breaker-alerts", async move {
        loop {
            match alerts.recv().await {
                Ok(event) => {
                    if let EventPayload::CircuitBreakerTriggered(t) = event.payload {
                        tracing::error!(
                            old_price = %t.old_price,
                            new_price = %t.new_price,
                            deviation_bps = t.deviation_bps,
                            "CRITICAL ALERT: price circuit breaker triggered"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Alert listener lagged"),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut watchdog = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("listening for ctrl-c")?;
                tracing::info!("Shutdown requested");
                break;
            }
            _ = watchdog.tick() => {
                if let Err(e) = supervisor.check_health().await {
                    tracing::error!("{}", e);
                }
            }
        }
    }

    supervisor.shutdown_all().await;
    Ok(())
}
