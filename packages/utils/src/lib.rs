#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod evm_client;
pub mod serde;
pub mod telemetry;

// the test version of init_tracing does not take a config
// since config itself is tested and modified from different parallel tests
// therefore, this only uses the default tracing settings
// it's not gated out because it is used in integration tests of other packages as well
pub fn init_tracing_tests() {
    use std::sync::LazyLock;

    // tests run on parallel threads, so only the first caller installs the subscriber
    static INIT: LazyLock<std::sync::Mutex<bool>> = LazyLock::new(|| std::sync::Mutex::new(false));

    let mut init = INIT.lock().unwrap();

    if !*init {
        *init = true;

        // try_init since another harness in the same binary may have set a global default
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        tracing::debug!("Tracing initialized for tests");
    }
}
