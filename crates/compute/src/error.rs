//! Error types for Compute Engine operations.
//!
//! Errors are categorized so callers can tell a transient failure from one
//! that needs operator action, and print advice accordingly.

use thiserror::Error;

/// Categories of Compute Engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connectivity problems talking to the API (transient)
    Network,
    /// Missing or expired credentials, or insufficient IAM permissions
    Auth,
    /// The resource does not exist
    NotFound,
    /// A resource with the same name already exists
    AlreadyExists,
    /// Project quota exhausted
    Quota,
    /// The API rejected an argument
    InvalidArgument,
    /// gcloud is not installed
    GcloudNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication or permission problem",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::Quota => "Quota exceeded",
            Self::InvalidArgument => "Invalid argument",
            Self::GcloudNotFound => "gcloud not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and re-run apply",
            Self::Auth => "Run `gcloud auth login` and check the account's IAM roles",
            Self::NotFound => "The resource may have been deleted outside of this tool; re-run apply",
            Self::AlreadyExists => "Delete the existing resource or pick a different name",
            Self::Quota => "Request a quota increase or choose a smaller machine type",
            Self::InvalidArgument => "Check the topology and configuration values",
            Self::GcloudNotFound => "Install the Google Cloud CLI from https://cloud.google.com/sdk",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during Compute Engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS)
    #[error("network error: {message}")]
    Network {
        /// Message from the failed call
        message: String,
    },

    /// Credentials missing or permission denied
    #[error("authentication error: {message}")]
    Auth {
        /// Message from the failed call
        message: String,
    },

    /// Resource not found
    #[error("resource not found: {name}")]
    NotFound {
        /// Name of the missing resource
        name: String,
    },

    /// Resource already exists
    #[error("resource already exists: {name}")]
    AlreadyExists {
        /// Name of the conflicting resource
        name: String,
    },

    /// Quota exceeded
    #[error("quota exceeded: {message}")]
    Quota {
        /// Message from the failed call
        message: String,
    },

    /// The API rejected an argument
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Message from the failed call
        message: String,
    },

    /// gcloud is not installed or not in PATH
    #[error("gcloud not found. Install it from https://cloud.google.com/sdk")]
    GcloudNotFound,

    /// A resource name does not satisfy the GCE naming rules
    #[error("invalid resource name {name:?}: {rule}")]
    InvalidName {
        /// The rejected name
        name: String,
        /// The rule it breaks
        rule: &'static str,
    },

    /// A resolved property could not be decoded into a request
    #[error("invalid {kind} properties: {message}")]
    InvalidProperties {
        /// Resource kind being decoded
        kind: String,
        /// What was wrong
        message: String,
    },

    /// A CIDR, port or protocol literal could not be parsed
    #[error("invalid {what} {value:?}")]
    Parse {
        /// What was being parsed
        what: &'static str,
        /// The rejected value
        value: String,
    },

    /// The old incarnation of a resource could not be deleted during a replacement
    #[error("cannot replace {kind} {name}: delete failed: {source}")]
    ReplaceBlocked {
        /// Resource kind being replaced
        kind: String,
        /// Name of the resource
        name: String,
        /// Why the delete failed
        source: Box<Error>,
    },

    /// The provider was asked to manage a kind it does not know
    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    /// The API response lacked a field
    #[error("response is missing {field}")]
    MissingField {
        /// Field that was expected
        field: &'static str,
    },

    /// Command execution failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Error::Quota { .. } => ErrorCategory::Quota,
            Error::InvalidArgument { .. } | Error::InvalidName { .. } => ErrorCategory::InvalidArgument,
            Error::GcloudNotFound => ErrorCategory::GcloudNotFound,
            Error::ReplaceBlocked { source, .. } => source.category(),
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from gcloud command output.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_gcloud_output(stderr: &str, resource_name: Option<&str>) -> Self {
        let stderr_lower = stderr.to_lowercase();
        let name = || resource_name.unwrap_or("unknown").to_string();

        // Already exists is checked first: its message often also says "conflict"
        if stderr_lower.contains("already exists") {
            return Error::AlreadyExists { name: name() };
        }

        if stderr_lower.contains("was not found")
            || stderr_lower.contains("not found")
            || stderr_lower.contains("notfound")
        {
            return Error::NotFound { name: name() };
        }

        if stderr_lower.contains("quota") || stderr_lower.contains("exceeded limit") {
            return Error::Quota {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("permission")
            || stderr_lower.contains("reauthentication")
            || stderr_lower.contains("credentials")
            || stderr_lower.contains("gcloud auth login")
            || stderr_lower.contains("forbidden")
        {
            return Error::Auth {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("unable to connect")
            || stderr_lower.contains("connection")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("temporarily unavailable")
            || stderr_lower.contains("name resolution")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("invalid value")
            || stderr_lower.contains("invalid argument")
            || stderr_lower.contains("badrequest")
        {
            return Error::InvalidArgument {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "gcloud command failed{}",
                resource_name
                    .map(|n| format!(" for {n}"))
                    .unwrap_or_default()
            ),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for Compute Engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Quota.is_retryable());
        assert!(!ErrorCategory::AlreadyExists.is_retryable());
    }

    #[test]
    fn test_from_gcloud_output_already_exists() {
        let err = Error::from_gcloud_output(
            "ERROR: (gcloud.compute.networks.create) Could not fetch resource:\n - The resource 'projects/p/global/networks/cks-network' already exists",
            Some("cks-network"),
        );
        assert_eq!(err.category(), ErrorCategory::AlreadyExists);
        assert_eq!(err.to_string(), "resource already exists: cks-network");
    }

    #[test]
    fn test_from_gcloud_output_not_found() {
        let err = Error::from_gcloud_output(
            "ERROR: (gcloud.compute.instances.delete) The resource 'projects/p/zones/z/instances/master' was not found",
            Some("master"),
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_gcloud_output_quota() {
        let err = Error::from_gcloud_output("Quota 'CPUS' exceeded.  Limit: 8.0 in region europe-west1.", None);
        assert_eq!(err.category(), ErrorCategory::Quota);
    }

    #[test]
    fn test_from_gcloud_output_auth() {
        let err = Error::from_gcloud_output(
            "ERROR: (gcloud.compute.networks.create) You do not currently have an active account selected. Please run: $ gcloud auth login",
            None,
        );
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_from_gcloud_output_network() {
        let err = Error::from_gcloud_output("Unable to connect to compute.googleapis.com", None);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_gcloud_output_fallback() {
        let err = Error::from_gcloud_output("something odd", Some("worker"));
        assert!(matches!(err, Error::CommandFailed { ref message, .. } if message == "gcloud command failed for worker"));
    }
}
