//! Maps tracker HTTP failures onto structured remote errors.
//!
//! The tracker reports most conditions as plain text bodies, so this is the
//! one place that inspects response text.

use boardlink_core::ports::{ConflictKind, RemoteError};
use reqwest::StatusCode;

const CONFLICT_MESSAGES: [(&str, ConflictKind); 5] = [
    ("already exists", ConflictKind::WebhookExists),
    ("member has already voted", ConflictKind::AlreadyVoted),
    ("member has not voted", ConflictKind::NotVoted),
    ("member is already on the card", ConflictKind::MemberAlreadyAssigned),
    ("label is already on the card", ConflictKind::LabelAlreadyAttached),
];

/// Board-level restriction such as a disabled voting power-up. It arrives as
/// a 401 but says nothing about the credential.
const POWER_UP_DENIED: &str = "unauthorized card permission requested";

pub fn classify(status: StatusCode, body: &str) -> RemoteError {
    let message = body.trim().to_owned();
    let lowered = message.to_ascii_lowercase();

    if lowered.contains(POWER_UP_DENIED) {
        return RemoteError::PermissionDenied(message);
    }
    if status == StatusCode::UNAUTHORIZED {
        return RemoteError::CredentialInvalid;
    }
    if let Some((_, kind)) = CONFLICT_MESSAGES.iter().find(|(text, _)| lowered.contains(text)) {
        return RemoteError::Conflict(*kind);
    }

    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Transient(message),
        status if status.is_server_error() => RemoteError::Transient(message),
        status => RemoteError::Rejected { status: status.as_u16(), message },
    }
}

pub fn transport(error: &reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Transient(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_token_is_a_credential_failure() {
        assert_eq!(classify(StatusCode::UNAUTHORIZED, "invalid token"), RemoteError::CredentialInvalid);
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "unauthorized permission requested"),
            RemoteError::CredentialInvalid
        );
    }

    #[test]
    fn disabled_power_up_is_not_a_credential_failure() {
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "unauthorized card permission requested"),
            RemoteError::PermissionDenied(_)
        ));
    }

    #[test]
    fn already_applied_changes_become_conflicts() {
        let cases = [
            ("A webhook with that callback, model, and token already exists", ConflictKind::WebhookExists),
            ("member has already voted on the card", ConflictKind::AlreadyVoted),
            ("member has not voted on the card", ConflictKind::NotVoted),
            ("member is already on the card", ConflictKind::MemberAlreadyAssigned),
            ("that label is already on the card", ConflictKind::LabelAlreadyAttached),
        ];
        for (body, kind) in cases {
            assert_eq!(classify(StatusCode::BAD_REQUEST, body), RemoteError::Conflict(kind), "{body}");
        }
    }

    #[test]
    fn statuses_without_known_text_fall_back_by_class() {
        assert!(matches!(classify(StatusCode::NOT_FOUND, "model not found"), RemoteError::NotFound(_)));
        assert!(matches!(classify(StatusCode::FORBIDDEN, "nope"), RemoteError::PermissionDenied(_)));
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(classify(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "invalid value for idList"),
            RemoteError::Rejected { status: 400, message: "invalid value for idList".to_owned() }
        );
    }
}
