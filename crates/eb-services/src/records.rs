//! Paged collection reads and typed decoding.

use eb_core::{Listed, RawRecord, RecordSchema, RepoAgent, Result};
use tracing::{debug, warn};

use crate::context::ClientSettings;
use crate::retry::retry_transient;

/// Every record of `T`'s collection in `repo`, following cursors up to the
/// configured page ceiling.
pub(crate) async fn fetch_all<T: RecordSchema>(
    agent: &dyn RepoAgent,
    repo: &str,
    settings: &ClientSettings,
) -> Result<Vec<Listed<T>>> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..settings.max_pages.max(1) {
        let page = retry_transient(&settings.retry, "list_records", || {
            agent.list_records(repo, T::COLLECTION, settings.page_limit, cursor.clone())
        })
        .await?;
        let exhausted = page.records.is_empty();
        records.extend(decode_records::<T>(page.records));
        match page.cursor {
            Some(next) if !next.is_empty() && !exhausted => cursor = Some(next),
            _ => return Ok(records),
        }
    }
    debug!(repo, collection = %T::COLLECTION, "page ceiling reached, listing truncated");
    Ok(records)
}

/// Decodes raw records, skipping any that do not match the schema.
pub(crate) fn decode_records<T: RecordSchema>(raw: Vec<RawRecord>) -> Vec<Listed<T>> {
    raw.into_iter()
        .filter_map(|record| {
            let uri = record.uri.clone();
            match Listed::<T>::decode(record) {
                Ok(listed) => Some(listed),
                Err(err) => {
                    warn!(uri = %uri, error = %err, "skipping malformed record");
                    None
                }
            }
        })
        .collect()
}
