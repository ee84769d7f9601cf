//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, form fields and uploads)
//!     → views.rs (route handlers)
//!         → dispatch.rs (query style → stream handler)
//!         → qmacro.rs (macro queries over the whole configuration)
//!         → staging.rs (postprocessor uploads)
//!     → response.rs (eager responses, or headers-once streaming)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod qmacro;
pub mod request;
pub mod response;
pub mod server;
pub mod staging;
pub mod views;

pub use request::{QueryForm, RequestUuid, X_REQUEST_ID};
pub use response::ARKIMET_EXCEPTION;
pub use server::{remote_config, HttpServer, ServerState};
