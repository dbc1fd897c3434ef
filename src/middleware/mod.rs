pub mod cors;
pub mod request_logging;

pub use cors::{cors_middleware, CorsConfig, CorsHeaders};
pub use request_logging::{request_logging_middleware, REQUEST_ID_HEADER};
