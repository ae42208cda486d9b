//! In-process map from object id to its [`StoredObject`] record.
//!
//! Every method takes the lock for the map operation only; callers do their
//! backend and crypto work with the lock released.

use crate::{
    errors::{StoreError, StoreResult},
    models::object::{Origin, StoredObject},
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::{collections::HashMap, sync::Arc};
use tracing::warn;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_RANDOM_LEN: usize = 6;
const MAX_ID_ATTEMPTS: usize = 16;

/// How long an expired id keeps answering "expired" after the sweeper purged it.
pub const TOMBSTONE_RETENTION_SECS: i64 = 86400;

#[derive(Debug)]
enum Slot {
    /// Id handed out, backend write still in flight.
    Reserved,
    /// Readable object; `claimed` while a delete-after-read download owns it.
    Live {
        object: Arc<StoredObject>,
        claimed: bool,
    },
    /// Purged by the sweeper. Reads answer "expired" once, then forget it.
    Reaped { expires_at: DateTime<Utc> },
}

/// Outcome of [`ObjectIndex::claim`] for a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Long-lived object; serve it and leave it in place.
    Shared(Arc<StoredObject>),
    /// Delete-after-read object now owned by this reader; finish with
    /// [`ObjectIndex::remove`] on success or [`ObjectIndex::release`] on failure.
    Exclusive(Arc<StoredObject>),
    /// The entry was past its expiry and has been removed from the index.
    /// `None` when the sweeper already purged the backend object.
    Expired(Option<Arc<StoredObject>>),
}

#[derive(Debug, Clone, Default)]
pub struct ObjectIndex {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh id for an upload. The id is invisible to readers until
    /// [`ObjectIndex::create`] fills it in.
    pub fn reserve(&self, origin: Origin) -> StoreResult<String> {
        let mut slots = self.slots.lock();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = generate_id(origin);
            if !slots.contains_key(&id) {
                slots.insert(id.clone(), Slot::Reserved);
                return Ok(id);
            }
            warn!("generated id {} already in use, retrying", id);
        }
        Err(StoreError::Crypto(
            "could not generate a unique object id".into(),
        ))
    }

    /// Publish a record under its previously reserved id.
    pub fn create(&self, object: StoredObject) -> Arc<StoredObject> {
        let object = Arc::new(object);
        self.slots.lock().insert(
            object.id.clone(),
            Slot::Live {
                object: object.clone(),
                claimed: false,
            },
        );
        object
    }

    /// Fetch a live record. Reserved and reaped ids are reported as not found.
    pub fn lookup(&self, id: &str) -> StoreResult<Arc<StoredObject>> {
        match self.slots.lock().get(id) {
            Some(Slot::Live { object, .. }) => Ok(object.clone()),
            _ => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Drop an id in any state. Removing an absent id is not an error.
    pub fn remove(&self, id: &str) -> Option<Arc<StoredObject>> {
        match self.slots.lock().remove(id) {
            Some(Slot::Live { object, .. }) => Some(object),
            _ => None,
        }
    }

    /// Observe an object for a download at `now`, applying the expiry and
    /// delete-after-read transitions atomically.
    ///
    /// A claimed delete-after-read object belongs to the reader holding the
    /// claim, even once it passes its expiry, so it reads as not found.
    pub fn claim(&self, id: &str, now: DateTime<Utc>) -> StoreResult<Claim> {
        let mut slots = self.slots.lock();
        let not_found = || StoreError::NotFound(id.to_string());

        let expired = match slots.get(id) {
            None | Some(Slot::Reserved) | Some(Slot::Live { claimed: true, .. }) => {
                return Err(not_found());
            }
            Some(Slot::Reaped { .. }) => true,
            Some(Slot::Live { object, .. }) => object.is_expired_at(now),
        };
        if expired {
            return match slots.remove(id) {
                Some(Slot::Live { object, .. }) => Ok(Claim::Expired(Some(object))),
                _ => Ok(Claim::Expired(None)),
            };
        }

        match slots.get_mut(id) {
            Some(Slot::Live { object, claimed }) if object.is_short_lived => {
                *claimed = true;
                Ok(Claim::Exclusive(object.clone()))
            }
            Some(Slot::Live { object, .. }) => Ok(Claim::Shared(object.clone())),
            _ => Err(not_found()),
        }
    }

    /// Drop `id` only while it still holds `object`. Tombstones and
    /// re-published ids are left alone.
    pub fn remove_live(&self, id: &str, object: &StoredObject) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(id) {
            Some(Slot::Live { object: live, .. }) if live.as_ref() == object => {
                slots.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Give back an exclusive claim after a failed read so a retry can succeed.
    pub fn release(&self, id: &str) {
        if let Some(Slot::Live { claimed, .. }) = self.slots.lock().get_mut(id) {
            *claimed = false;
        }
    }

    /// Turn every unclaimed expired entry into a tombstone and return the
    /// records whose backend objects should now be deleted. Tombstones past
    /// their retention window are dropped.
    pub fn reap_expired(&self, now: DateTime<Utc>) -> Vec<Arc<StoredObject>> {
        let retention = Duration::seconds(TOMBSTONE_RETENTION_SECS);
        let mut slots = self.slots.lock();
        let mut reaped = Vec::new();

        slots.retain(|_, slot| match slot {
            Slot::Reaped { expires_at } => now <= *expires_at + retention,
            _ => true,
        });

        for slot in slots.values_mut() {
            if let Slot::Live {
                object,
                claimed: false,
            } = slot
            {
                if object.is_expired_at(now) {
                    let object = object.clone();
                    *slot = Slot::Reaped {
                        expires_at: object.expires_at,
                    };
                    reaped.push(object);
                }
            }
        }
        reaped
    }

    #[cfg(test)]
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of readable objects.
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Live { .. }))
            .count()
    }
}

/// Case prefix followed by random characters from `[A-Z0-9]`.
fn generate_id(origin: Origin) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_RANDOM_LEN)
        .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("{}{}", origin.id_prefix(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::policy::ExpirationPolicy;
    use std::collections::HashSet;

    fn publish(index: &ObjectIndex, policy: ExpirationPolicy, now: DateTime<Utc>) -> String {
        let id = index.reserve(Origin::Single).unwrap();
        index.create(StoredObject::new(
            id.clone(),
            "a.txt".into(),
            "text/plain".into(),
            policy,
            now,
        ));
        id
    }

    #[test]
    fn test_generated_ids() {
        let index = ObjectIndex::new();
        let id = index.reserve(Origin::Bundle).unwrap();
        assert!(id.starts_with("ZIP-"));
        assert_eq!(id.len(), "ZIP-".len() + ID_RANDOM_LEN);
        assert!(
            id["ZIP-".len()..]
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        );

        let ids: HashSet<String> = (0..500)
            .map(|_| index.reserve(Origin::Single).unwrap())
            .collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_reserved_ids_are_invisible() {
        let index = ObjectIndex::new();
        let id = index.reserve(Origin::Single).unwrap();
        assert!(matches!(index.lookup(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(
            index.claim(&id, Utc::now()),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(index.live_count(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let index = ObjectIndex::new();
        let id = publish(&index, ExpirationPolicy::Store1Hour, Utc::now());
        assert!(index.remove(&id).is_some());
        assert!(index.remove(&id).is_none());
        assert!(index.remove("FILE-NOPE00").is_none());
        assert!(matches!(index.lookup(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_claim_transitions() {
        let index = ObjectIndex::new();
        let now = Utc::now();

        let long = publish(&index, ExpirationPolicy::Store1Day, now);
        assert!(matches!(index.claim(&long, now), Ok(Claim::Shared(_))));
        assert!(matches!(index.claim(&long, now), Ok(Claim::Shared(_))));

        let short = publish(&index, ExpirationPolicy::DeleteAfterFirstDownload, now);
        assert!(matches!(index.claim(&short, now), Ok(Claim::Exclusive(_))));
        // Second reader loses while the first holds the claim
        assert!(matches!(
            index.claim(&short, now),
            Err(StoreError::NotFound(_))
        ));
        index.release(&short);
        assert!(matches!(index.claim(&short, now), Ok(Claim::Exclusive(_))));

        let later = now + Duration::seconds(86401);
        assert!(matches!(
            index.claim(&long, later),
            Ok(Claim::Expired(Some(_)))
        ));
        assert!(matches!(
            index.claim(&long, later),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_reap_leaves_tombstones() {
        let index = ObjectIndex::new();
        let now = Utc::now();
        let short = publish(&index, ExpirationPolicy::DeleteAfterFirstDownload, now);
        let long = publish(&index, ExpirationPolicy::Store1Day, now);

        let later = now + Duration::seconds(301);
        let reaped = index.reap_expired(later);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, short);
        assert_eq!(index.live_count(), 1);
        assert!(index.lookup(&long).is_ok());

        assert!(matches!(index.claim(&short, later), Ok(Claim::Expired(None))));
        assert!(matches!(
            index.claim(&short, later),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_claimed_object_never_expires_under_its_reader() {
        let index = ObjectIndex::new();
        let now = Utc::now();
        let id = publish(&index, ExpirationPolicy::DeleteAfterFirstDownload, now);
        assert!(matches!(index.claim(&id, now), Ok(Claim::Exclusive(_))));

        let later = now + Duration::seconds(301);
        assert!(matches!(
            index.claim(&id, later),
            Err(StoreError::NotFound(_))
        ));
        // The holder still owns the entry
        assert_eq!(index.live_count(), 1);
        assert!(index.remove(&id).is_some());
    }

    #[test]
    fn test_remove_live_spares_tombstones() {
        let index = ObjectIndex::new();
        let now = Utc::now();
        let id = publish(&index, ExpirationPolicy::Store1Hour, now);
        let object = index.lookup(&id).unwrap();

        let later = now + Duration::seconds(3601);
        assert_eq!(index.reap_expired(later).len(), 1);
        assert!(!index.remove_live(&id, &object));
        assert!(matches!(index.claim(&id, later), Ok(Claim::Expired(None))));

        let id = publish(&index, ExpirationPolicy::Store1Hour, now);
        let object = index.lookup(&id).unwrap();
        assert!(index.remove_live(&id, &object));
        assert_eq!(index.slot_count(), 0);
    }

    #[test]
    fn test_reap_skips_claimed_and_drops_old_tombstones() {
        let index = ObjectIndex::new();
        let now = Utc::now();
        let claimed = publish(&index, ExpirationPolicy::DeleteAfterFirstDownload, now);
        let idle = publish(&index, ExpirationPolicy::DeleteAfterFirstDownload, now);
        assert!(matches!(index.claim(&claimed, now), Ok(Claim::Exclusive(_))));

        let later = now + Duration::seconds(301);
        let reaped = index.reap_expired(later);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id, idle);

        let much_later = later + Duration::seconds(TOMBSTONE_RETENTION_SECS + 1);
        assert!(index.reap_expired(much_later).is_empty());
        assert!(matches!(
            index.claim(&idle, much_later),
            Err(StoreError::NotFound(_))
        ));
    }
}
