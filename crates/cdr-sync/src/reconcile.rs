//! Merge one observation into the canonical record for its url.
//!
//! - absent url => insert, with `first_fetch_time` pinned to the observed fetch
//! - same `fetch_time` as stored => redelivery, nothing written
//! - earlier than `first_fetch_time` => revise first-seen time and `pub_date`
//! - later than `fetch_time` => advance latest time and `text`
//!
//! The two revisions are independent and applied in that order. Anything
//! strictly inside the stored range is inert.

use cdr_core::{DocumentRecord, Outcome};
use cdr_storage::{DocumentStore, StoreError};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub record: DocumentRecord,
    pub outcome: Outcome,
}

/// Which field groups an observation revises on an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdatePlan {
    pub revise_first_seen: bool,
    pub advance_latest: bool,
}

impl UpdatePlan {
    pub fn between(stored: &DocumentRecord, observation: &DocumentRecord) -> Self {
        Self {
            revise_first_seen: observation.fetch_time < stored.first_fetch_time,
            advance_latest: observation.fetch_time > stored.fetch_time,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.revise_first_seen && !self.advance_latest
    }
}

pub async fn reconcile(
    store: &dyn DocumentStore,
    observation: &DocumentRecord,
) -> Result<Reconciled, StoreError> {
    let url = observation.url.as_str();

    if !store.exists(url).await? {
        let record = observation.first_observation();
        store.insert(&record).await?;
        info!(url, fetch_time = record.fetch_time, outcome = %Outcome::Created, "new document stored");
        return Ok(Reconciled {
            record,
            outcome: Outcome::Created,
        });
    }

    let image = store.get(url).await?;
    if observation.fetch_time == image.fetch_time {
        info!(url, fetch_time = observation.fetch_time, outcome = %Outcome::Duplicate, "snapshot redelivered");
        return Ok(Reconciled {
            record: image,
            outcome: Outcome::Duplicate,
        });
    }

    let plan = UpdatePlan::between(&image, observation);
    if plan.is_noop() {
        debug!(
            url,
            fetch_time = observation.fetch_time,
            first_fetch_time = image.first_fetch_time,
            latest_fetch_time = image.fetch_time,
            outcome = %Outcome::Unchanged,
            "observation inside known fetch range"
        );
        return Ok(Reconciled {
            record: image,
            outcome: Outcome::Unchanged,
        });
    }

    if plan.revise_first_seen {
        store
            .update_first_seen(url, observation.fetch_time, observation.pub_date)
            .await?;
    }
    if plan.advance_latest {
        store
            .update_latest(url, observation.fetch_time, &observation.text)
            .await?;
    }

    let record = store.get(url).await?;
    info!(
        url,
        fetch_time = observation.fetch_time,
        revised_first_seen = plan.revise_first_seen,
        advanced_latest = plan.advance_latest,
        outcome = %Outcome::Updated,
        "document updated"
    );
    Ok(Reconciled {
        record,
        outcome: Outcome::Updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr_storage::MemoryDocumentStore;

    fn stored(first_fetch_time: u64, fetch_time: u64) -> DocumentRecord {
        DocumentRecord {
            url: "u".to_string(),
            pub_date: 1,
            fetch_time,
            text: "stored".to_string(),
            first_fetch_time,
        }
    }

    fn observed(fetch_time: u64) -> DocumentRecord {
        DocumentRecord::new("u", 9, fetch_time, "observed")
    }

    #[test]
    fn plan_classifies_relative_to_stored_range() {
        let image = stored(100, 200);
        assert_eq!(
            UpdatePlan::between(&image, &observed(50)),
            UpdatePlan {
                revise_first_seen: true,
                advance_latest: false
            }
        );
        assert_eq!(
            UpdatePlan::between(&image, &observed(300)),
            UpdatePlan {
                revise_first_seen: false,
                advance_latest: true
            }
        );
        assert!(UpdatePlan::between(&image, &observed(150)).is_noop());
        assert!(UpdatePlan::between(&image, &observed(100)).is_noop());
    }

    #[tokio::test]
    async fn both_revisions_apply_when_stored_range_is_inverted() {
        // only reachable from data written outside reconcile
        let store = MemoryDocumentStore::with_records([stored(500, 100)]);
        let result = reconcile(&store, &observed(300)).await.expect("reconcile");
        assert_eq!(result.outcome, Outcome::Updated);
        let next = result.record;
        assert_eq!((next.first_fetch_time, next.fetch_time), (300, 300));
        assert_eq!(next.pub_date, 9);
        assert_eq!(next.text, "observed");
    }

    #[tokio::test]
    async fn first_observation_ignores_incoming_first_fetch_time() {
        let store = MemoryDocumentStore::new();
        let mut obs = observed(200);
        obs.first_fetch_time = 7;

        let result = reconcile(&store, &obs).await.expect("reconcile");
        assert_eq!(result.outcome, Outcome::Created);
        assert_eq!(result.record.first_fetch_time, 200);
        assert_eq!(store.snapshot("u").await, Some(result.record));
    }

    #[tokio::test]
    async fn update_returns_fresh_store_read() {
        let store = MemoryDocumentStore::with_records([stored(100, 200)]);
        let result = reconcile(&store, &observed(300)).await.expect("reconcile");
        assert_eq!(result.outcome, Outcome::Updated);
        assert_eq!(Some(result.record.clone()), store.snapshot("u").await);

        let mut expected = stored(100, 300);
        expected.text = "observed".to_string();
        assert_eq!(result.record, expected);
    }
}
