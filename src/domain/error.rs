use std::fmt;

use crate::domain::credentials::CredentialKind;

/// Local misuse detected before anything is sent: invalid credential values,
/// duplicate credentials, unusable URLs or a target no credential can serve.
///
/// Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    Empty { field: &'static str },
    DuplicateCredential { kind: CredentialKind },
    NoCredentials,
    NoMatchingCredential { target: String },
    InvalidPrivateKey { reason: String },
    InvalidUrl { input: String, reason: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{field} must not be empty"),
            Self::DuplicateCredential { kind } => {
                write!(f, "only one credential of each type allowed (duplicate {kind})")
            }
            Self::NoCredentials => write!(f, "at least one credential is required"),
            Self::NoMatchingCredential { target } => {
                write!(f, "no configured credential can authenticate {target}")
            }
            Self::InvalidPrivateKey { reason } => write!(f, "invalid private key: {reason}"),
            Self::InvalidUrl { input, reason } => write!(f, "invalid url {input:?}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        let err = ConfigurationError::Empty { field: "api_key" };
        assert_eq!(err.to_string(), "api_key must not be empty");

        let err = ConfigurationError::DuplicateCredential {
            kind: CredentialKind::Basic,
        };
        assert_eq!(
            err.to_string(),
            "only one credential of each type allowed (duplicate basic)"
        );

        let err = ConfigurationError::NoMatchingCredential {
            target: "https://api.nexmo.com/v1/calls".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "no configured credential can authenticate https://api.nexmo.com/v1/calls"
        );

        let err = ConfigurationError::InvalidUrl {
            input: "nope".to_owned(),
            reason: "relative URL without a base".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "invalid url \"nope\": relative URL without a base"
        );
    }
}
