pub mod mock_chain;
pub mod mock_subscriber;

use std::time::Duration;

/// Polls `condition` until it holds, panics after 5 seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    const TIMEOUT: Duration = Duration::from_secs(5);
    const POLL: Duration = Duration::from_millis(10);

    let waited = tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await;

    if waited.is_err() {
        panic!("condition not met within {TIMEOUT:?}");
    }
}
