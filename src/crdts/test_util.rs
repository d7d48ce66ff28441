// (c) Copyright 2025 Helsing GmbH. All rights reserved.
mod qc_arbitrary_impls;
#[cfg(test)]
mod qc_arbitrary_ops;

#[cfg(test)]
pub(crate) use qc_arbitrary_ops::Ops;

/// Installs a test-friendly `tracing` subscriber, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call in a process installs anything.
#[cfg(test)]
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
