//! Deterministic HTTP interaction replay server.
//!
//! `httpreplay` loads a corpus of previously recorded request/response
//! pairs, groups them by a configurable request *identity* (for example
//! `URL` + `Method`), and serves each identity's responses back in
//! recording order, one per matching live request. When every recorded
//! interaction has been consumed exactly once, the server drains and shuts
//! itself down. This lets a test harness exercise client code against
//! prerecorded traffic without a live backend.
//!
//! ```no_run
//! use httpreplay::server::ReplayServerBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = ReplayServerBuilder::new()
//!     .port(5050)
//!     .trips_dir("recordings/")
//!     .build()?;
//!
//! // Bind errors surface here; afterwards the server runs on its own task.
//! let handle = server.start().await?;
//! handle.wait().await; // resolves once the corpus is exhausted
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod server;
