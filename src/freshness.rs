use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

use crate::signature::SigningFields;

pub const AUTH_DATE_FIELD: &str = "auth_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FreshnessError {
    #[error("auth_date missing from init_data")] Missing,
    #[error("auth_date is not a valid timestamp")] Invalid,
    #[error("init_data expired")] Expired,
}

/// Parse the unix-seconds `auth_date` field.
pub fn auth_date(fields: &SigningFields) -> Result<OffsetDateTime, FreshnessError> {
    let raw = fields.get(AUTH_DATE_FIELD).ok_or(FreshnessError::Missing)?;
    let secs: i64 = raw.parse().map_err(|_| FreshnessError::Invalid)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|_| FreshnessError::Invalid)
}

/// Staleness policy applied after a payload has verified. An `auth_date` in
/// the future counts as fresh.
pub fn check_freshness(
    fields: &SigningFields,
    max_age: Duration,
    now: OffsetDateTime,
) -> Result<(), FreshnessError> {
    let issued = auth_date(fields)?;
    let age = now - issued;
    if age.is_positive() && age.unsigned_abs() > max_age {
        return Err(FreshnessError::Expired);
    }
    Ok(())
}
