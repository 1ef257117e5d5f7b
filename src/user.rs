use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signature::SigningFields;

/// Field whose value is the JSON-encoded launching user.
pub const USER_FIELD: &str = "user";

/// The user record embedded in init data. Only `id` is guaranteed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allows_write_to_pm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum UserParseError {
    #[error("no user field in init data")] Absent,
    #[error("user field is not a valid user record: {0}")] Invalid(#[from] serde_json::Error),
}

/// Decode the `user` field of already verified fields.
///
/// Presentation convenience only: a failure here says nothing about whether
/// the payload was authentic.
pub fn parse_user(fields: &SigningFields) -> Result<WebAppUser, UserParseError> {
    let raw = fields.get(USER_FIELD).ok_or(UserParseError::Absent)?;
    Ok(serde_json::from_str(raw)?)
}
