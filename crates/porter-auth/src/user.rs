use chrono::{DateTime, Duration, Local};
use porter_core::UserLevel;
use porter_core::constants::{ANONYMOUS_VALIDITY_DAYS, MIN_AUTH_CODE_LENGTH};
use serde::{Deserialize, Serialize};

use crate::error::{EnrollError, StoreError};

/// One person with an access credential.
///
/// Persisted as a single CSV row; see [`RawRecord`] for the on-disk
/// column order. The auth code is kept private so the length rule in
/// [`User::set_auth_code`] cannot be bypassed.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,

    /// Free-form contact info. Users without any are subject to
    /// automatic expiry 30 days after enrollment.
    pub contact_info: String,

    pub user_level: UserLevel,

    /// Start of validity. Set to the enrollment time by the
    /// authenticator when the enroller leaves it empty.
    pub valid_from: Option<DateTime<Local>>,

    /// End of validity (exclusive).
    pub valid_to: Option<DateTime<Local>>,

    /// Name of the member who enrolled this user.
    pub sponsor: String,

    pub(crate) auth_code: String,
}

impl User {
    #[must_use]
    pub fn new(name: impl Into<String>, user_level: UserLevel) -> Self {
        Self {
            name: name.into(),
            contact_info: String::new(),
            user_level,
            valid_from: None,
            valid_to: None,
            sponsor: String::new(),
            auth_code: String::new(),
        }
    }

    /// Set the credential this user authenticates with.
    ///
    /// # Errors
    /// Returns `EnrollError::CodeTooShort` for codes under 6 characters.
    pub fn set_auth_code(&mut self, code: &str) -> Result<(), EnrollError> {
        if code.len() < MIN_AUTH_CODE_LENGTH {
            return Err(EnrollError::CodeTooShort);
        }
        self.auth_code = code.to_string();
        Ok(())
    }

    #[must_use]
    pub fn auth_code(&self) -> &str {
        &self.auth_code
    }

    /// Check the explicit validity bounds. The end is exclusive: a code
    /// whose `valid_to` equals `now` is already expired.
    #[must_use]
    pub fn in_validity_window(&self, now: DateTime<Local>) -> bool {
        if let Some(from) = self.valid_from
            && now < from
        {
            return false;
        }
        if let Some(to) = self.valid_to
            && now >= to
        {
            return false;
        }
        true
    }

    /// Users without contact info expire 30 days after enrollment.
    #[must_use]
    pub fn anonymous_expired(&self, now: DateTime<Local>) -> bool {
        if !self.contact_info.is_empty() {
            return false;
        }
        match self.valid_from {
            Some(from) => now - from >= Duration::days(ANONYMOUS_VALIDITY_DAYS),
            None => false,
        }
    }
}

/// On-disk representation of a [`User`]: seven string columns in fixed
/// order, timestamps as RFC 3339, empty meaning unbounded.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawRecord {
    name: String,
    contact_info: String,
    user_level: String,
    valid_from: String,
    valid_to: String,
    sponsor: String,
    auth_code: String,
}

fn format_instant(instant: Option<DateTime<Local>>) -> String {
    instant.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn parse_instant(field: &str) -> Result<Option<DateTime<Local>>, StoreError> {
    if field.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(field)
        .map(|t| Some(t.with_timezone(&Local)))
        .map_err(|e| StoreError::BadRecord(format!("bad timestamp '{field}': {e}")))
}

impl From<&User> for RawRecord {
    fn from(user: &User) -> Self {
        RawRecord {
            name: user.name.clone(),
            contact_info: user.contact_info.clone(),
            user_level: user.user_level.to_string(),
            valid_from: format_instant(user.valid_from),
            valid_to: format_instant(user.valid_to),
            sponsor: user.sponsor.clone(),
            auth_code: user.auth_code.clone(),
        }
    }
}

impl TryFrom<RawRecord> for User {
    type Error = StoreError;

    fn try_from(record: RawRecord) -> Result<Self, StoreError> {
        let user_level = record
            .user_level
            .parse::<UserLevel>()
            .map_err(|e| StoreError::BadRecord(e.to_string()))?;
        Ok(User {
            name: record.name,
            contact_info: record.contact_info,
            user_level,
            valid_from: parse_instant(&record.valid_from)?,
            valid_to: parse_instant(&record.valid_to)?,
            sponsor: record.sponsor,
            auth_code: record.auth_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2014, 10, 10, h, m, s).unwrap()
    }

    #[rstest]
    #[case("12345", false)] // one short of the minimum
    #[case("123456", true)]
    #[case("gate1234567", true)]
    fn test_auth_code_length_rule(#[case] code: &str, #[case] accepted: bool) {
        let mut user = User::new("Jon Doe", UserLevel::User);
        assert_eq!(user.set_auth_code(code).is_ok(), accepted);
        if accepted {
            assert_eq!(user.auth_code(), code);
        } else {
            assert_eq!(user.auth_code(), "");
        }
    }

    #[test]
    fn test_validity_window_unbounded() {
        let user = User::new("n", UserLevel::Member);
        assert!(user.in_validity_window(at(3, 0, 0)));
    }

    #[test]
    fn test_validity_window_half_open_end() {
        let mut user = User::new("n", UserLevel::Member);
        user.valid_to = Some(at(13, 0, 0));
        assert!(user.in_validity_window(at(12, 59, 59)));
        // valid_to equal to now is already expired
        assert!(!user.in_validity_window(at(13, 0, 0)));
    }

    #[test]
    fn test_validity_window_start_inclusive() {
        let mut user = User::new("n", UserLevel::Member);
        user.valid_from = Some(at(13, 0, 0));
        assert!(!user.in_validity_window(at(12, 59, 59)));
        assert!(user.in_validity_window(at(13, 0, 0)));
    }

    #[test]
    fn test_anonymous_expiry_after_30_days() {
        let mut user = User::new("", UserLevel::User);
        user.valid_from = Some(at(13, 0, 0));

        assert!(!user.anonymous_expired(at(13, 0, 0) + Duration::days(29)));
        assert!(user.anonymous_expired(at(13, 0, 0) + Duration::days(30)));
    }

    #[test]
    fn test_contact_info_disables_expiry() {
        let mut user = User::new("n", UserLevel::User);
        user.contact_info = "someone@example.net".to_string();
        user.valid_from = Some(at(13, 0, 0));
        assert!(!user.anonymous_expired(at(13, 0, 0) + Duration::days(365)));
    }

    #[test]
    fn test_record_round_trip() {
        let mut user = User::new("Another,user;[]funny\"characters '", UserLevel::User);
        user.contact_info = "user@example.net".to_string();
        user.sponsor = "root".to_string();
        user.valid_from = Some(at(1, 0, 0));
        user.valid_to = Some(at(23, 0, 0));
        user.set_auth_code("other123").unwrap();

        let record = RawRecord::from(&user);
        let back = User::try_from(record).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn test_record_rejects_unknown_level() {
        let record = RawRecord {
            name: "n".into(),
            contact_info: String::new(),
            user_level: "overlord".into(),
            valid_from: String::new(),
            valid_to: String::new(),
            sponsor: String::new(),
            auth_code: "code123".into(),
        };
        assert!(User::try_from(record).is_err());
    }
}
