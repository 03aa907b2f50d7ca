//! Payment gateway adapters.
//!
//! - `HttpPaymentGateway` - the processor's REST API over `reqwest`
//! - `TokenCache` - shared bearer token with single-flight refresh
//! - `MockPaymentGateway` - configurable test double

mod http_gateway;
mod mock_gateway;
mod token_cache;
mod wire;

pub use http_gateway::{HttpGatewayConfig, HttpPaymentGateway};
pub use mock_gateway::{MethodCall, MockPaymentGateway};
pub use token_cache::{IssuedToken, TokenCache, DEFAULT_TOKEN_MARGIN_SECS};
