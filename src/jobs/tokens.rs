use crate::state;
use crate::error;

/// applies pending expirations so stale tokens are released without a read
pub async fn sweep(state: state::ArcShared) -> error::Result<()> {
    let cache = state.sec().issuer().cache();
    let before = cache.entry_count();

    cache.run_pending_tasks();

    let after = cache.entry_count();

    tracing::info!("token cache swept. entries {before} -> {after}");

    Ok(())
}
