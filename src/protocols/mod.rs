pub mod http;

pub use http::{HttpProxy, HttpProxyConfig};
