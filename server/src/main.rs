use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use server::config::AppConfig;
use server::db::create_pool;
use server::gateway::{GatewayClient, LightningGateway};
use server::lnurl::{HttpPayEndpointResolver, Links, PayEndpointResolver};
use server::middleware::RequestIdMiddleware;
use server::repositories::VoucherStore;
use server::services::{
    CreationService, FundingService, RefundJob, Refunder, TaskSupervisor, WithdrawalService,
};

const DB_POOL_SIZE: u32 = 16;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    server::telemetry::init_telemetry().context("Failed to initialize telemetry")?;

    let config = AppConfig::from_env().context("Invalid configuration")?;
    info!(
        base_url = %config.server.base_url,
        gateway = %server::logging::sanitize::sanitize_url(&config.gateway.url),
        "Starting TipMe voucher server"
    );

    let pool = create_pool(&config.server.database_url, DB_POOL_SIZE)
        .context("Failed to open voucher database")?;
    let store = VoucherStore::new(pool, config.vouchers.absolute_expiry_secs);

    let gateway: Arc<dyn LightningGateway> =
        Arc::new(GatewayClient::new(&config.gateway).context("Failed to build gateway client")?);
    let resolver: Arc<dyn PayEndpointResolver> =
        Arc::new(HttpPayEndpointResolver::new().context("Failed to build LNURL resolver")?);

    let supervisor = TaskSupervisor::new();
    let links = Links::new(&config.server.base_url);
    let refunder = Refunder::new(resolver, gateway.clone());

    let creation = CreationService::new(
        store.clone(),
        gateway.clone(),
        supervisor.clone(),
        config.fees,
        config.vouchers,
        config.payment_wait_timeout,
    );
    let funding = FundingService::new(
        store.clone(),
        gateway.clone(),
        refunder.clone(),
        supervisor.clone(),
        links.clone(),
        config.fees,
        config.vouchers,
        config.payment_wait_timeout,
    );
    let withdrawals = WithdrawalService::new(store.clone(), gateway.clone(), links.clone());

    let refund_job = Arc::new(RefundJob::new(store.clone(), refunder, config.refund_interval));
    let cancel = supervisor.cancellation_token();
    supervisor.spawn_detached("refund-job", async move {
        refund_job.run(cancel).await;
        Ok(())
    });
    info!(
        interval_secs = config.refund_interval.as_secs(),
        "Refund job started"
    );

    let creation = web::Data::new(creation);
    let funding = web::Data::new(funding);
    let withdrawals = web::Data::new(withdrawals);
    let store_data = web::Data::new(store);
    let links_data = web::Data::new(links);

    let bind_addr = config.bind_addr();
    info!(address = %bind_addr.0, port = bind_addr.1, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .wrap(RequestIdMiddleware)
            .app_data(creation.clone())
            .app_data(funding.clone())
            .app_data(withdrawals.clone())
            .app_data(store_data.clone())
            .app_data(links_data.clone())
            .configure(server::configure_routes)
    })
    .bind(bind_addr.clone())
    .with_context(|| format!("Failed to bind to {}:{}", bind_addr.0, bind_addr.1))?
    .run()
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped, cancelling background tasks");
    supervisor.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}
