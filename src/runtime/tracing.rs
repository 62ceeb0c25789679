//! # Tracing Setup
//!
//! Model operations log through `tracing` with structured fields:
//!
//! - `model`: type name of the model involved
//! - `op`: static operation (`find`, `findAll`, `count`, `removeAll`)
//! - `relation`: role name, on the span of every relation operation
//!
//! Declarations and queries log at `debug`, committed state changes (saved,
//! removed, related) at `info`, failures at `warn`.
//!
//! ```bash
//! RUST_LOG=info cargo run --bin modelkit-demo
//! RUST_LOG=modelkit=debug cargo run --bin modelkit-demo
//! ```

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Call once, at process start.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
