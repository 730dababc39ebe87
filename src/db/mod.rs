// src/db/mod.rs
//
// Модули хранилища и доменной логики:
// - схема + миграции,
// - репозитории per-entity (users / contacts / spam_reports / sessions),
// - чистый скоринг и резолвер видимости поверх них.

pub mod auth;
pub mod cache;
pub mod contact;
pub mod error;
pub mod handler;
pub mod migrations;
pub mod monitoring;
pub mod schema;
pub mod scoring;
pub mod search;
pub mod spam;
pub mod user;
pub mod validate;

use uuid::Uuid;

/// Текущее время в unix-секундах; все timestamps в базе — такие.
pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// BLOB(16) -> Uuid с ошибкой конверсии в терминах rusqlite.
pub(crate) fn uuid_from_blob(idx: usize, blob: Vec<u8>) -> rusqlite::Result<Uuid> {
    Uuid::from_slice(&blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Blob, Box::new(e))
    })
}

pub(crate) fn opt_uuid_from_blob(
    idx: usize,
    blob: Option<Vec<u8>>,
) -> rusqlite::Result<Option<Uuid>> {
    match blob {
        Some(b) => Ok(Some(uuid_from_blob(idx, b)?)),
        None => Ok(None),
    }
}
