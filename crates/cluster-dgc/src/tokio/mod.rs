//! Tokio integration for cluster-dgc.
//!
//! Enabled with the `tokio` feature. Provides [`spawn_periodic`] for driving
//! cycles from an async runtime instead of the built-in scheduler thread.
//!
//! ```toml
//! [dependencies]
//! cluster-dgc = { version = "0.3", features = ["tokio"] }
//! ```

mod spawn;

pub use spawn::spawn_periodic;
