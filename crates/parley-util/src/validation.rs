use thiserror::Error;

pub const MAX_MESSAGE_BODY: usize = 4000;
pub const MAX_CHAT_NAME: usize = 100;
pub const MAX_ATTACHMENTS: usize = 10;
pub const MAX_PARTICIPANTS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("too many items (max {max}, got {got})")]
    TooMany { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
    #[error("invalid format")]
    InvalidFormat,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

pub fn validate_message_body(body: &str) -> Result<(), ValidationError> {
    let len = body.chars().count();
    if len > MAX_MESSAGE_BODY {
        return Err(ValidationError::TooLong { max: MAX_MESSAGE_BODY, got: len });
    }
    Ok(())
}

pub fn validate_chat_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_CHAT_NAME {
        return Err(ValidationError::TooLong { max: MAX_CHAT_NAME, got: len });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Attachments are absolute http(s) URLs.
pub fn validate_attachment(raw: &str) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(raw).map_err(|_| ValidationError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(()),
        _ => Err(ValidationError::InvalidUrl(raw.to_string())),
    }
}

pub fn validate_attachments(list: &[String]) -> Result<(), ValidationError> {
    if list.len() > MAX_ATTACHMENTS {
        return Err(ValidationError::TooMany { max: MAX_ATTACHMENTS, got: list.len() });
    }
    list.iter().try_for_each(|raw| validate_attachment(raw))
}

pub fn validate_participant_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_PARTICIPANTS {
        return Err(ValidationError::TooMany { max: MAX_PARTICIPANTS, got: count });
    }
    Ok(())
}

/// Recipient references are user ids or group chat keys; both are short
/// tokens without whitespace.
pub fn validate_recipient(recipient: &str) -> Result<(), ValidationError> {
    let len = recipient.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 128 {
        return Err(ValidationError::TooLong { max: 128, got: len });
    }
    if recipient.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_must_be_http_urls() {
        assert!(validate_attachment("https://cdn.example.com/a.png").is_ok());
        assert!(validate_attachment("http://example.com/file?x=1").is_ok());
        assert!(matches!(
            validate_attachment("not a url"),
            Err(ValidationError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_attachment("ftp://example.com/a"),
            Err(ValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn attachment_list_is_capped() {
        let list = vec!["https://example.com/a".to_string(); MAX_ATTACHMENTS + 1];
        assert_eq!(
            validate_attachments(&list),
            Err(ValidationError::TooMany { max: MAX_ATTACHMENTS, got: MAX_ATTACHMENTS + 1 })
        );
    }

    #[test]
    fn empty_body_is_allowed_but_huge_is_not() {
        assert!(validate_message_body("").is_ok());
        let long = "x".repeat(MAX_MESSAGE_BODY + 1);
        assert!(matches!(validate_message_body(&long), Err(ValidationError::TooLong { .. })));
    }

    #[test]
    fn chat_names_and_recipients() {
        assert!(validate_chat_name("weekend plans").is_ok());
        assert!(matches!(validate_chat_name("   "), Err(ValidationError::TooShort { .. })));
        assert!(validate_recipient("123456").is_ok());
        assert_eq!(validate_recipient("a b"), Err(ValidationError::InvalidCharacters));
        assert!(matches!(validate_recipient(""), Err(ValidationError::TooShort { .. })));
    }
}
