use futures::future::join_all;
use tracing::error;

use store::RealtimeStore;
use store::path::model_path;

/// True only if `{collection}/{uid}/models/{mid}` exists in every mirror.
///
/// Lookups run concurrently. A failed lookup is logged and counts as a
/// missing record, so storage outages reject postbacks instead of letting
/// them through unchecked.
pub async fn validate_user_and_model(
    store: &dyn RealtimeStore,
    mirrors: &[String],
    uid: &str,
    mid: &str,
) -> bool {
    if mirrors.is_empty() {
        return false;
    }

    let lookups = mirrors.iter().map(|collection| async move {
        let path = match model_path(collection, uid, mid) {
            Ok(path) => path,
            Err(err) => {
                error!(collection, error = %err, "model_lookup_invalid_path");
                return false;
            }
        };
        match store.exists(&path).await {
            Ok(found) => found,
            Err(err) => {
                error!(collection, uid, mid, error = %err, "model_lookup_failed");
                false
            }
        }
    });

    join_all(lookups).await.into_iter().all(|found| found)
}
