//! The access policy engine.
//!
//! Evaluates codes against the time/role policy and enrolls new users.
//! Policy windows compare the local wall-clock hour from the injected
//! [`Clock`]:
//!
//! | level        | gate          | upstairs / elevator |
//! |--------------|---------------|---------------------|
//! | member       | always        | always              |
//! | fulltimeuser | 07:00..=23:59 | 07:00..=23:59       |
//! | user         | 11:00..21:59  | 11:00..21:59        |
//! | legacy       | 11:00..21:59  | never               |
//! | hiatus       | never         | never               |

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Timelike};
use tracing::{info, warn};

use porter_core::{Clock, Target, UserLevel, constants::MIN_AUTH_CODE_LENGTH};

use crate::error::{EnrollError, StoreResult};
use crate::store::UserFile;
use crate::user::User;

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied {
        reason: String,
        /// The code itself was good; only the hour was wrong. This is
        /// the branch that may ring the doorbell instead.
        outside_hours: bool,
    },
}

impl Access {
    fn denied(reason: impl Into<String>) -> Self {
        Access::Denied {
            reason: reason.into(),
            outside_hours: false,
        }
    }

    fn denied_outside_hours(reason: impl Into<String>) -> Self {
        Access::Denied {
            reason: reason.into(),
            outside_hours: true,
        }
    }

    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted)
    }

    /// The deny reason, or the empty string for a grant.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Access::Granted => "",
            Access::Denied { reason, .. } => reason,
        }
    }
}

fn in_daytime(now: DateTime<Local>) -> bool {
    (11..22).contains(&now.hour())
}

fn in_extended_hours(now: DateTime<Local>) -> bool {
    (7..=23).contains(&now.hour())
}

struct Inner {
    file: UserFile,
    index: HashMap<String, User>,
}

/// Shared policy engine: code index plus CSV-backed persistence.
///
/// Cheap reads happen on every credential presented at any door; the
/// only writer is the single control terminal. One mutex covers both
/// the index and the file append, so no reader ever sees an enrollment
/// that is on disk but not in memory or vice versa.
pub struct Authenticator {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl Authenticator {
    /// Load the user file and build the code index.
    ///
    /// Users sharing a code with an earlier row are ignored: the first
    /// enrollment owns the code.
    ///
    /// # Errors
    /// Propagates file read errors; a missing file is an empty database.
    pub fn load(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let file = UserFile::new(path.as_ref());
        let users = file.load()?;

        let mut index: HashMap<String, User> = HashMap::with_capacity(users.len());
        for user in users {
            if user.auth_code().len() < MIN_AUTH_CODE_LENGTH {
                warn!(name = %user.name, "ignoring record with short auth code");
                continue;
            }
            if index.contains_key(user.auth_code()) {
                warn!(name = %user.name, "ignoring record with duplicate auth code");
                continue;
            }
            index.insert(user.auth_code().to_string(), user);
        }
        info!(path = %path.as_ref().display(), users = index.len(), "user database loaded");

        Ok(Self {
            clock,
            inner: Mutex::new(Inner { file, index }),
        })
    }

    /// Look up the user owning `code`.
    #[must_use]
    pub fn find_user(&self, code: &str) -> Option<User> {
        self.inner.lock().unwrap().index.get(code).cloned()
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.inner.lock().unwrap().index.len()
    }

    /// Evaluate `code` against the policy for `target`.
    #[must_use]
    pub fn auth_user(&self, code: &str, target: Target) -> Access {
        let now = self.clock.now();
        let inner = self.inner.lock().unwrap();

        let Some(user) = inner.index.get(code) else {
            return Access::denied("Unknown code");
        };

        if !user.in_validity_window(now) || user.anonymous_expired(now) {
            return Access::denied("Code not valid yet/expired");
        }

        match user.user_level {
            UserLevel::Hiatus => Access::denied("User is on hiatus"),
            UserLevel::Member => Access::Granted,
            UserLevel::Fulltimeuser => {
                if in_extended_hours(now) {
                    Access::Granted
                } else {
                    Access::denied_outside_hours("Fulltime user outside daytime 07:00..24:00")
                }
            }
            UserLevel::User => {
                if in_daytime(now) {
                    Access::Granted
                } else {
                    Access::denied_outside_hours("User outside daytime 11:00..22:00")
                }
            }
            UserLevel::Legacy => {
                if !in_daytime(now) {
                    Access::denied_outside_hours("Gate user outside daytime 11:00..22:00")
                } else if target != Target::Gate {
                    Access::denied("Gate user only valid at gate")
                } else {
                    Access::Granted
                }
            }
        }
    }

    /// Check that `code` belongs to a member in good standing, as
    /// required to sponsor an enrollment.
    ///
    /// # Errors
    /// Returns the specific rejection so the control UI can display it.
    pub fn validate_sponsor(&self, code: &str) -> Result<(), EnrollError> {
        let now = self.clock.now();
        let inner = self.inner.lock().unwrap();
        check_sponsor(&inner, code, now).map(|_| ())
    }

    /// Enroll a new user, sponsored by an existing member.
    ///
    /// On success the record is on disk and findable; on any error
    /// neither the file nor the index has changed. The sponsor column is
    /// filled with the sponsoring member's name, and `valid_from`
    /// defaults to now so anonymous records age from their enrollment.
    ///
    /// # Errors
    /// Rejections per [`EnrollError`]; persistence failures wrap the
    /// underlying store error.
    pub fn add_new_user(&self, sponsor_code: &str, mut user: User) -> Result<(), EnrollError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();

        let sponsor = check_sponsor(&inner, sponsor_code, now)?;
        user.sponsor = sponsor.name.clone();

        if user.auth_code().len() < MIN_AUTH_CODE_LENGTH {
            return Err(EnrollError::CodeTooShort);
        }
        if inner.index.contains_key(user.auth_code()) {
            return Err(EnrollError::CodeAlreadyUsed);
        }
        if user.valid_from.is_none() {
            user.valid_from = Some(now);
        }

        // Disk first. A record the file lost must not be honored at the door.
        inner.file.append(&user)?;
        info!(name = %user.name, level = %user.user_level, sponsor = %user.sponsor, "user enrolled");
        inner.index.insert(user.auth_code().to_string(), user);
        Ok(())
    }
}

fn check_sponsor<'a>(
    inner: &'a Inner,
    code: &str,
    now: DateTime<Local>,
) -> Result<&'a User, EnrollError> {
    let sponsor = inner.index.get(code).ok_or(EnrollError::UnknownSponsor)?;
    if sponsor.user_level != UserLevel::Member {
        return Err(EnrollError::SponsorNotMember);
    }
    if !sponsor.in_validity_window(now) || sponsor.anonymous_expired(now) {
        return Err(EnrollError::SponsorNotValid);
    }
    Ok(sponsor)
}
