// src/db/error.rs

use serde::Serialize;
use thiserror::Error;

/// Общая ошибка сервиса. Категории соответствуют HTTP-статусам,
/// которыми внешний слой отвечает клиенту.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tokio_rusqlite::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::Auth(_) => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Storage(_) | ServiceError::Unexpected(_) => 500,
        }
    }
}

/// Нарушение уникального индекса (или PK) в SQLite.
/// Именно оно — авторитетный сигнал конфликта: проверка "сначала
/// почитать, потом вставить" проигрывает гонку двух запросов.
fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
        }
        _ => false,
    }
}

/// Превращает ошибку вставки в Conflict с читаемым сообщением,
/// если упали на уникальном индексе; иначе оставляет Storage.
pub(crate) fn conflict_or_storage(err: tokio_rusqlite::Error, msg: &str) -> ServiceError {
    if is_constraint_violation(&err) {
        ServiceError::Conflict(msg.to_string())
    } else {
        ServiceError::Storage(err)
    }
}

/// Единый конверт ответа: `{ success, message?, data? }`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        }
    }

    pub fn error(err: &ServiceError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::Validation("x".into()).status_code(), 400);
        assert_eq!(ServiceError::Auth("x".into()).status_code(), 401);
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ServiceError::Conflict("x".into()).status_code(), 409);
        assert_eq!(ServiceError::Unexpected("x".into()).status_code(), 500);
    }

    #[test]
    fn test_envelope_shape() {
        let ok = ApiResponse::ok(serde_json::json!({"n": 1}));
        let v = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(v["success"], true);
        assert!(v.get("message").is_none());

        let err = ServiceError::Conflict("already reported".into());
        let body = ApiResponse::<serde_json::Value>::error(&err);
        let v = serde_json::to_value(&body).expect("serialize");
        assert_eq!(v["success"], false);
        assert_eq!(v["message"], "already reported");
        assert!(v.get("data").is_none());
    }
}
