//! Conversions from external infrastructure errors into domain errors.

use semestra_domain::SemestraError;

/// Error newtype that keeps conversions on the infrastructure side and
/// can be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SemestraError);

impl From<InfraError> for SemestraError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SemestraError> for InfraError {
    fn from(value: SemestraError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error -> SemestraError */
/* -------------------------------------------------------------------------- */

impl From<rusqlite::Error> for InfraError {
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let mapped = match value {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        SemestraError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        SemestraError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        SemestraError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        SemestraError::Database("foreign key constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, _) => SemestraError::Database(format!(
                        "constraint violation: {}",
                        message
                    )),
                    _ => SemestraError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                SemestraError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                SemestraError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                SemestraError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                SemestraError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidQuery => SemestraError::Database("invalid SQL query".into()),
            other => SemestraError::Database(other.to_string()),
        };

        InfraError(mapped)
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error -> SemestraError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(SemestraError::Database(format!("connection pool error: {}", value)))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error -> SemestraError */
/* -------------------------------------------------------------------------- */

impl From<reqwest::Error> for InfraError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return InfraError(SemestraError::Network("HTTP request timed out".into()));
        }

        if value.is_connect() {
            return InfraError(SemestraError::Network("HTTP connection failure".into()));
        }

        if let Some(status) = value.status() {
            let code = status.as_u16();
            let message = format!(
                "HTTP {} {}",
                code,
                status.canonical_reason().unwrap_or("unknown status")
            );

            let mapped = match code {
                401 | 403 => SemestraError::Auth(message),
                404 => SemestraError::NotFound(message),
                429 => SemestraError::Network(message),
                400..=499 => SemestraError::InvalidInput(message),
                _ => SemestraError::Network(message),
            };
            return InfraError(mapped);
        }

        InfraError(SemestraError::Network(value.to_string()))
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error -> SemestraError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(SemestraError::Database(format!("stored JSON is invalid: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use rusqlite::Error as SqlError;

    use super::*;

    #[test]
    fn sqlite_unique_violation_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            Some("UNIQUE constraint failed".into()),
        );

        let mapped: SemestraError = InfraError::from(err).into();
        match mapped {
            SemestraError::Database(msg) => assert!(msg.contains("unique constraint")),
            other => panic!("expected database error, got {:?}", other),
        }
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: SemestraError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, SemestraError::NotFound(_)));
    }

    #[test]
    fn busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );
        let mapped: SemestraError = InfraError::from(err).into();
        match mapped {
            SemestraError::Database(msg) => assert!(msg.contains("busy")),
            other => panic!("expected database error, got {:?}", other),
        }
    }
}
