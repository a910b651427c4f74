//! Liveness probe for load balancers

use actix_web::{get, web, HttpResponse, Responder};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::Serialize;
use std::time::Instant;

use crate::repositories::VoucherStore;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self {
            status: "healthy",
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: "unhealthy",
            latency_ms: None,
            error: Some(error),
        }
    }
}

#[derive(QueryableByName)]
struct Probe {
    #[diesel(sql_type = Integer)]
    #[allow(dead_code)]
    val: i32,
}

/// `GET /health`
///
/// `{"status":"ok"}` with database details while SQLite answers, otherwise
/// 503 with `{"status":"unhealthy"}`.
#[get("/health")]
pub async fn health_check(store: web::Data<VoucherStore>) -> impl Responder {
    let database = check_database_health(&store).await;

    if database.status == "healthy" {
        HttpResponse::Ok().json(HealthResponse {
            status: "ok",
            database,
        })
    } else {
        HttpResponse::ServiceUnavailable().json(HealthResponse {
            status: "unhealthy",
            database,
        })
    }
}

async fn check_database_health(store: &VoucherStore) -> ComponentHealth {
    let start = Instant::now();
    let pool = store.pool().clone();

    let result = web::block(move || {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::sql_query("SELECT 1 AS val")
            .get_result::<Probe>(&mut conn)
            .map_err(|e| e.to_string())
    })
    .await;

    match result {
        Ok(Ok(_)) => ComponentHealth::healthy(start.elapsed().as_millis() as u64),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentHealth::unhealthy(e)
        }
        Err(e) => ComponentHealth::unhealthy(format!("blocking task failed: {}", e)),
    }
}
