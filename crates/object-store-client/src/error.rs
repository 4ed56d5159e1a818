//! Error types for the object store client

use std::fmt;

#[derive(Debug)]
pub enum ObjectStoreError {
    NotFound(String),
    Http(Box<reqwest::Error>),
    Status { status: u16, message: String },
    Config(String),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ObjectStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectStoreError::NotFound(key) => write!(f, "Object not found: {}", key),
            ObjectStoreError::Http(err) => write!(f, "HTTP error: {}", err),
            ObjectStoreError::Status { status, message } => {
                write!(f, "Object store returned status {}: {}", status, message)
            }
            ObjectStoreError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ObjectStoreError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ObjectStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ObjectStoreError::Http(err) => Some(err.as_ref()),
            ObjectStoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl ObjectStoreError {
    /// Whether the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound(_))
    }
}

impl From<reqwest::Error> for ObjectStoreError {
    fn from(err: reqwest::Error) -> Self {
        ObjectStoreError::Http(Box::new(err))
    }
}

impl From<std::io::Error> for ObjectStoreError {
    fn from(err: std::io::Error) -> Self {
        ObjectStoreError::Io(Box::new(err))
    }
}

impl From<url::ParseError> for ObjectStoreError {
    fn from(err: url::ParseError) -> Self {
        ObjectStoreError::Config(format!("invalid endpoint URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ObjectStoreError::NotFound("01J9ZQ".to_string());
        assert_eq!(format!("{}", err), "Object not found: 01J9ZQ");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_status_display() {
        let err = ObjectStoreError::Status {
            status: 403,
            message: "AccessDenied: Access Denied".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Object store returned status 403: AccessDenied: Access Denied"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;
        let err = ObjectStoreError::from(std::io::Error::other("disk gone"));
        assert!(err.source().is_some());
    }
}
