//! services/client/src/validation.rs
//!
//! Local checks run before a request is built. A failure here means no
//! network call is made.

use docunexus_core::domain::{NewAccount, UploadFile};

/// The only MIME type the document service accepts.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Largest upload accepted, 2 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024;

/// Bounds the query service applies to `query_text`, in characters.
pub const MIN_QUERY_CHARS: usize = 5;
pub const MAX_QUERY_CHARS: usize = 1000;

/// Account field bounds applied by the sign-up endpoint, in characters.
pub const USERNAME_CHARS: (usize, usize) = (3, 20);
pub const PASSWORD_CHARS: (usize, usize) = (8, 20);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Only PDF files can be uploaded (got '{mime_type}')")]
    UnsupportedType { mime_type: String },
    #[error("File is {size} bytes; the limit is 2 MB ({limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
    #[error("File is empty")]
    EmptyFile,
    #[error("Question must be at least {min} characters")]
    QueryTooShort { min: usize },
    #[error("Question must be at most {max} characters")]
    QueryTooLong { max: usize },
    #[error("'{0}' is not an email address")]
    InvalidEmail(String),
    #[error("Username must be {min} to {max} characters")]
    UsernameLength { min: usize, max: usize },
    #[error("Password must be {min} to {max} characters")]
    PasswordLength { min: usize, max: usize },
}

pub fn validate_upload(file: &UploadFile) -> Result<(), ValidationError> {
    let mime_type = file.mime_type.trim().to_ascii_lowercase();
    if mime_type != PDF_MIME_TYPE {
        return Err(ValidationError::UnsupportedType {
            mime_type: file.mime_type.clone(),
        });
    }

    if file.size() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            size: file.size(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    if file.bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    Ok(())
}

/// Returns the trimmed question text when it fits the service's bounds.
pub fn validate_query_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_QUERY_CHARS {
        return Err(ValidationError::QueryTooShort {
            min: MIN_QUERY_CHARS,
        });
    }
    if chars > MAX_QUERY_CHARS {
        return Err(ValidationError::QueryTooLong {
            max: MAX_QUERY_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Checks a registration locally and returns it with email and username
/// trimmed. The password is taken as typed.
pub fn validate_sign_up(account: &NewAccount) -> Result<NewAccount, ValidationError> {
    let email = account.email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !well_formed {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }

    let username = account.username.trim();
    let (min, max) = USERNAME_CHARS;
    if !(min..=max).contains(&username.chars().count()) {
        return Err(ValidationError::UsernameLength { min, max });
    }

    let (min, max) = PASSWORD_CHARS;
    if !(min..=max).contains(&account.password.chars().count()) {
        return Err(ValidationError::PasswordLength { min, max });
    }

    Ok(NewAccount {
        email: email.to_string(),
        username: username.to_string(),
        password: account.password.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(size: usize) -> UploadFile {
        UploadFile::new("paper.pdf", PDF_MIME_TYPE, vec![b'%'; size])
    }

    #[test]
    fn test_validate_upload_size() {
        assert!(validate_upload(&pdf(1024)).is_ok());
        assert!(validate_upload(&pdf(MAX_UPLOAD_BYTES as usize)).is_ok());

        let err = validate_upload(&pdf(5 * 1024 * 1024)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: 5 * 1024 * 1024,
                limit: MAX_UPLOAD_BYTES
            }
        );
        assert!(err.to_string().contains("2 MB"));
    }

    #[test]
    fn test_validate_upload_type() {
        let docx = UploadFile::new(
            "notes.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            vec![1u8; 100],
        );
        assert!(matches!(
            validate_upload(&docx),
            Err(ValidationError::UnsupportedType { .. })
        ));

        let upper = UploadFile::new("paper.pdf", "Application/PDF", vec![1u8; 10]);
        assert!(validate_upload(&upper).is_ok());
    }

    #[test]
    fn test_validate_upload_empty() {
        assert_eq!(validate_upload(&pdf(0)), Err(ValidationError::EmptyFile));
    }

    #[test]
    fn test_validate_query_text() {
        assert_eq!(
            validate_query_text("  What is the total?  ").unwrap(),
            "What is the total?"
        );
        assert_eq!(
            validate_query_text("   hi  "),
            Err(ValidationError::QueryTooShort { min: 5 })
        );
        assert!(matches!(
            validate_query_text(&"x".repeat(1001)),
            Err(ValidationError::QueryTooLong { .. })
        ));
    }

    fn account(email: &str, username: &str, password: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_validate_sign_up() {
        let ok = validate_sign_up(&account(" jane@example.com ", " jane ", "SecurePass123!")).unwrap();
        assert_eq!(ok.email, "jane@example.com");
        assert_eq!(ok.username, "jane");

        assert!(matches!(
            validate_sign_up(&account("jane.example.com", "jane", "SecurePass123!")),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert_eq!(
            validate_sign_up(&account("jane@example.com", "jo", "SecurePass123!")),
            Err(ValidationError::UsernameLength { min: 3, max: 20 })
        );
        assert_eq!(
            validate_sign_up(&account("jane@example.com", "jane", "short")),
            Err(ValidationError::PasswordLength { min: 8, max: 20 })
        );
    }
}
