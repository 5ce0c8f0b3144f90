// Stops the suite from starting new scenarios on Ctrl+C.
//
// Scenarios already running finish and scheduled cleanups are still awaited.

use s3ilm_rs::SuiteCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: SuiteCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received. waiting for running scenario and bucket cleanup.");
                cancellation_token.cancel();
            }
        }
    })
}
