//! Monotonic internal-ID allocation.

use glacier_core::error::Error;

use crate::keys::{user_id_mapping_key, USERS_SERIAL_COUNTER_KEY};
use crate::state::ServiceState;

impl ServiceState {
    /// Resolve an external user ID to its internal ID, allocating the next
    /// sequential ID on first sight.
    ///
    /// Idempotent under concurrent callers: the mapping is written with NX
    /// semantics, and a lost race falls back to the winner's value. A skipped
    /// counter value is harmless.
    pub async fn get_or_init_internal_id(&self, user_id: &str) -> Result<i64, Error> {
        let mapping_key = user_id_mapping_key(user_id);
        if let Some(raw) = self.kv.get(&mapping_key).await? {
            return parse_internal_id(&mapping_key, &raw);
        }

        let candidate = self.kv.incr(USERS_SERIAL_COUNTER_KEY).await?;
        if self
            .kv
            .set_nx(&mapping_key, &candidate.to_string(), None)
            .await?
        {
            return Ok(candidate);
        }

        match self.kv.get(&mapping_key).await? {
            Some(raw) => parse_internal_id(&mapping_key, &raw),
            None => Err(Error::Storage(format!(
                "mapping at {mapping_key} vanished after losing the allocation race"
            ))),
        }
    }
}

fn parse_internal_id(key: &str, raw: &str) -> Result<i64, Error> {
    raw.parse()
        .map_err(|_| Error::Storage(format!("non-numeric internal id at {key}: {raw}")))
}
