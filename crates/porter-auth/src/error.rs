use porter_core::constants::MIN_AUTH_CODE_LENGTH;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed user record: {0}")]
    BadRecord(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why an enrollment was rejected. Displayed verbatim on the control
/// terminal's LCD, so messages stay short.
#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("Unknown sponsor code")]
    UnknownSponsor,

    #[error("Sponsor is not a member")]
    SponsorNotMember,

    #[error("Sponsor code not valid")]
    SponsorNotValid,

    #[error("Code too short, need {MIN_AUTH_CODE_LENGTH}")]
    CodeTooShort,

    #[error("Code already in use")]
    CodeAlreadyUsed,

    #[error("Could not save user: {0}")]
    Persist(#[from] StoreError),
}
