// Log-field redaction macros (declared before the modules that use them)
#[macro_export]
macro_rules! log_id {
    ($id:expr) => {
        $crate::logging::sanitize::sanitize_id($id)
    };
}

#[macro_export]
macro_rules! log_hash {
    ($hash:expr) => {
        $crate::logging::sanitize::sanitize_hash($hash)
    };
}

#[macro_export]
macro_rules! log_address {
    ($addr:expr) => {
        $crate::logging::sanitize::sanitize_address($addr)
    };
}

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod lnurl;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod telemetry;

pub use handlers::configure_routes;
