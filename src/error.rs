//! Defines error types.

/// The error type for bridge operations.
///
/// Errors are values here: capture failures travel back to the embedding runtime
/// through the normal completion path as [`crate::CaptureOutcome::Error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates an error of `kind` with a human-readable `message`.
    pub fn new<S: ToString>(kind: ErrorKind, message: S) -> Self {
        Error {
            kind,
            message: message.to_string(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error code reported to the embedding runtime.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", &self.kind)
        } else {
            write!(f, "{}: {}", &self.kind, &self.message)
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            message: String::new(),
        }
    }
}

/// A list of general categories of bridge error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// no handler can service the capture action
    NoDeviceAvailable,
    /// the platform failed to start the capture action
    LaunchFailed,
    /// the user or an external actor declined
    Cancelled,
    /// the result carried no image
    NoImage,
    /// the image payload is malformed
    DecodeFailure,
    /// another request is outstanding on the same channel
    AlreadyPending,
    /// the method is not implemented
    NotImplemented,
    /// an internal error has occured
    Internal,
}

impl ErrorKind {
    /// Error code understood by the runtime side of the channel.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NoDeviceAvailable => "NO_CAMERA",
            ErrorKind::LaunchFailed => "CAMERA_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::NoImage => "NO_IMAGE",
            ErrorKind::DecodeFailure => "DECODE_FAILURE",
            ErrorKind::AlreadyPending => "ALREADY_PENDING",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NoDeviceAvailable => f.write_str("no camera is available"),
            ErrorKind::LaunchFailed => f.write_str("failed to open the camera"),
            ErrorKind::Cancelled => f.write_str("the capture was cancelled"),
            ErrorKind::NoImage => f.write_str("no image was returned"),
            ErrorKind::DecodeFailure => f.write_str("the image payload is malformed"),
            ErrorKind::AlreadyPending => f.write_str("a request is already pending"),
            ErrorKind::NotImplemented => f.write_str("not implemented"),
            ErrorKind::Internal => f.write_str("an internal error has occured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message_when_present() {
        let bare: Error = ErrorKind::NoImage.into();
        assert_eq!(bare.to_string(), "no image was returned");

        let err = Error::new(ErrorKind::LaunchFailed, "activity not found");
        assert_eq!(err.to_string(), "failed to open the camera: activity not found");
        assert_eq!(err.code(), "CAMERA_ERROR");
    }

    #[test]
    fn runtime_codes_match_the_channel_contract() {
        assert_eq!(ErrorKind::NoDeviceAvailable.code(), "NO_CAMERA");
        assert_eq!(ErrorKind::Cancelled.code(), "CANCELLED");
        assert_eq!(ErrorKind::NoImage.code(), "NO_IMAGE");
    }
}
