//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, TraceLayer, outer timeout)
//!     → proxy.rs (route, forward, shape the answer)
//!         → trace.rs (reuse or generate X-Trace-Id)
//!         → uri.rs (downstream path and query)
//!         → headers.rs (drop transport headers and unsafe values)
//!     → Send to client
//! ```

pub mod headers;
pub mod proxy;
pub mod server;
pub mod trace;
pub mod uri;

pub use proxy::ProxyError;
pub use server::{AppState, HttpServer, Workers};
pub use trace::TraceId;
