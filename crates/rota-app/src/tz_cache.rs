use std::collections::HashMap;

use chrono_tz::Tz;

use rota_core::error::DomainError;

/// Per-manager cache of zone-name lookups.
///
/// Owned by the manager rather than shared globally, so two managers
/// never contend on a lock and tests get a fresh cache each time.
#[derive(Debug, Default)]
pub struct TzCache {
    cache: HashMap<String, Tz>,
}

impl TzCache {
    pub fn resolve(&mut self, name: &str) -> Result<Tz, DomainError> {
        if let Some(tz) = self.cache.get(name) {
            return Ok(*tz);
        }
        let tz: Tz = name
            .parse()
            .map_err(|_| DomainError::InvalidTimeZone(name.into()))?;
        self.cache.insert(name.to_owned(), tz);
        Ok(tz)
    }
}
