pub mod router;

pub use router::{ProxyRouter, ProxyTarget, RoutePath};
