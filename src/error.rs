use serde_json::Value;
use thiserror::Error;

/// Named kinds for the numeric error codes the Untis server reports in
/// JSON-RPC `error` objects.
///
/// The table is closed; codes the server may add in the future fall back to
/// [`ErrorKind::UnknownErrorCode`] with the raw code preserved on the
/// [`UntisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidSchool,
    NoSpecifiedUser,
    InvalidPassword,
    NoRight,
    LockedAccess,
    RequiredAuthentication,
    AuthenticationError,
    NoPublicAccess,
    InvalidClientTime,
    InvalidUserStatus,
    InvalidUserRole,
    InvalidTimeTableType,
    InvalidElementId,
    InvalidPersonType,
    InvalidDate,
    UnspecifiedError,
    TooManyResults,
    UnknownErrorCode,
}

impl ErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "-8500" => Self::InvalidSchool,
            "-8502" => Self::NoSpecifiedUser,
            "-8504" => Self::InvalidPassword,
            "-8509" => Self::NoRight,
            "-8511" => Self::LockedAccess,
            "-8520" => Self::RequiredAuthentication,
            "-8521" => Self::AuthenticationError,
            "-8523" => Self::NoPublicAccess,
            "-8524" => Self::InvalidClientTime,
            "-8525" => Self::InvalidUserStatus,
            "-8526" => Self::InvalidUserRole,
            "-7001" => Self::InvalidTimeTableType,
            "-7002" => Self::InvalidElementId,
            "-7003" => Self::InvalidPersonType,
            "-7004" => Self::InvalidDate,
            "-8998" => Self::UnspecifiedError,
            "-6003" => Self::TooManyResults,
            _ => Self::UnknownErrorCode,
        }
    }
}

/// An application-level error reported by the server in the `error` field of
/// a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} (code {code}): {message}")]
pub struct UntisError {
    pub kind: ErrorKind,
    /// The raw wire code, kept even when it maps to a named kind.
    pub code: String,
    /// The human-readable message the server attached.
    pub message: String,
}

impl UntisError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: ErrorKind::from_code(&code),
            code,
            message: message.into(),
        }
    }

    /// Builds the typed error from a wire `error` object. The server is not
    /// consistent about whether `code` arrives as a JSON number or a string.
    pub(crate) fn from_wire(error: &Value) -> Self {
        let code = match error.get("code") {
            Some(Value::String(code)) => code.clone(),
            Some(Value::Number(code)) => code.to_string(),
            _ => String::new(),
        };
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Self::new(code, message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_code_in_the_table_maps_to_its_kind() {
        let table = [
            ("-8500", ErrorKind::InvalidSchool),
            ("-8502", ErrorKind::NoSpecifiedUser),
            ("-8504", ErrorKind::InvalidPassword),
            ("-8509", ErrorKind::NoRight),
            ("-8511", ErrorKind::LockedAccess),
            ("-8520", ErrorKind::RequiredAuthentication),
            ("-8521", ErrorKind::AuthenticationError),
            ("-8523", ErrorKind::NoPublicAccess),
            ("-8524", ErrorKind::InvalidClientTime),
            ("-8525", ErrorKind::InvalidUserStatus),
            ("-8526", ErrorKind::InvalidUserRole),
            ("-7001", ErrorKind::InvalidTimeTableType),
            ("-7002", ErrorKind::InvalidElementId),
            ("-7003", ErrorKind::InvalidPersonType),
            ("-7004", ErrorKind::InvalidDate),
            ("-8998", ErrorKind::UnspecifiedError),
            ("-6003", ErrorKind::TooManyResults),
        ];
        for (code, kind) in table {
            assert_eq!(UntisError::new(code, "").kind, kind, "code {code}");
        }
    }

    #[test]
    fn unrecognized_code_falls_back_and_keeps_the_code() {
        let error = UntisError::new("-1234", "something new");
        assert_eq!(error.kind, ErrorKind::UnknownErrorCode);
        assert_eq!(error.code, "-1234");
        assert!(error.to_string().contains("-1234"));
        assert!(error.to_string().contains("something new"));
    }

    #[test]
    fn wire_code_may_be_number_or_string() {
        let from_number = UntisError::from_wire(&json!({
            "code": -8504,
            "message": "bad password",
        }));
        assert_eq!(from_number.kind, ErrorKind::InvalidPassword);
        assert_eq!(from_number.code, "-8504");
        assert_eq!(from_number.message, "bad password");

        let from_string = UntisError::from_wire(&json!({
            "code": "-8504",
            "message": "bad password",
        }));
        assert_eq!(from_string, from_number);
    }
}
