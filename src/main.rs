use std::sync::Arc;

use anyhow::{Error, Result};
use notification_service::{
    api::{AppState, run_api_server},
    clients::{
        broker::MessageBroker,
        circuit_breaker::CircuitBreaker,
        database::DatabaseClient,
        email::{EmailClient, TemplatedEmailSender},
        health::{EMAIL_PROVIDER_SERVICE, HealthChecker, TEMPLATE_SERVICE},
        rbmq::RabbitMqClient,
        redis::RedisClient,
        template::TemplateServiceClient,
    },
    config::Config,
    consumer::{ConsumerLoop, ShutdownHandle},
    delivery::ImmediateEmailProcessor,
    models::topology::{IMMEDIATE_QUEUE, create_notification_topology},
    publisher::NotificationPublisher,
    utils::init_tracing,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;
    let topology = Arc::new(create_notification_topology());

    let rabbitmq = RabbitMqClient::connect(&config).await?;
    rabbitmq.declare_topology(&topology).await?;
    let broker: Arc<dyn MessageBroker> = Arc::new(rabbitmq);

    let redis = RedisClient::connect(&config).await?;
    let breaker = |service: &str| {
        CircuitBreaker::new(service, redis.connection(), config.circuit_breaker_config())
    };

    let templates =
        TemplateServiceClient::new(&config)?.with_circuit_breaker(breaker(TEMPLATE_SERVICE));
    let email_client =
        EmailClient::new(&config)?.with_circuit_breaker(breaker(EMAIL_PROVIDER_SERVICE));
    let database = DatabaseClient::connect(&config.database_url).await?;

    let processor = ImmediateEmailProcessor::new(
        Arc::new(database),
        Arc::new(TemplatedEmailSender::new(templates, email_client)),
        Arc::new(redis),
    );

    let consumer = ConsumerLoop::new(Arc::clone(&broker), config.consumer_settings())
        .with_queue(IMMEDIATE_QUEUE, Arc::new(processor));

    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(config.clone()),
        publisher: NotificationPublisher::new(Arc::clone(&broker), Arc::clone(&topology)),
        broker,
        fetch_timeout: config.consumer_settings().fetch_timeout,
    });

    let port = config.server_port;
    tokio::spawn(async move {
        if let Err(e) = run_api_server(state, port).await {
            error!(error = %e, "API server exited");
        }
    });

    tokio::spawn(wait_for_shutdown(consumer.shutdown_handle()));

    info!("Notification service ready");
    consumer.run().await;

    Ok(())
}

async fn wait_for_shutdown(shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    shutdown.stop();
}
