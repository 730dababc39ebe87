// src/db/auth.rs
//
// Пароли: argon2id (PHC-строка, соль внутри). Сессии: непрозрачный
// случайный токен в таблице sessions с явным сроком жизни.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use tokio_rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::error::ServiceError;
use crate::db::{now_ts, uuid_from_blob};

/// Срок жизни сессии по умолчанию — 7 дней.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// CPU-тяжёлая операция; сервисный слой уводит её в spawn_blocking.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::Unexpected(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ServiceError::Unexpected(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// 32 случайных байта, base64url без набивки.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: i64,
    pub expires_at: i64,
}

pub struct SessionRepo {
    conn: Arc<Connection>,
}

impl SessionRepo {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    pub async fn create(&self, user_id: Uuid, ttl_secs: i64) -> Result<Session, ServiceError> {
        let session = Session {
            token: generate_token(),
            user_id,
            issued_at: now_ts(),
            expires_at: now_ts() + ttl_secs,
        };

        let inserted = session.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO sessions (token, user_id, issued_at, expires_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        inserted.token,
                        inserted.user_id.as_bytes().to_vec(),
                        inserted.issued_at,
                        inserted.expires_at,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(session)
    }

    pub async fn find(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        let token = token.to_string();
        let session = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT token, user_id, issued_at, expires_at FROM sessions WHERE token = ?1",
                )?;
                let mut rows = stmt.query(params![token])?;
                if let Some(row) = rows.next()? {
                    let user_blob: Vec<u8> = row.get(1)?;
                    Ok(Some(Session {
                        token: row.get(0)?,
                        user_id: uuid_from_blob(1, user_blob)?,
                        issued_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    }))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(session)
    }

    /// Подчистка протухших сессий; зовётся по случаю (на логине),
    /// фонового планировщика здесь нет.
    pub async fn delete_expired(&self) -> Result<usize, ServiceError> {
        let now = now_ts();
        let deleted = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
                Ok(n)
            })
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::setup_migrations;
    use crate::db::user::{NewUser, UserRepo};

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("Passw0rd!").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Passw0rd!", &hash).expect("verify"));
        assert!(!verify_password("wrong", &hash).expect("verify wrong"));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 байта -> 43 символа base64url без '='
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    async fn setup_test_db() -> Arc<Connection> {
        let conn = Connection::open_in_memory().await.expect("open in-memory db");
        setup_migrations(&conn).await.expect("migrations");
        Arc::new(conn)
    }

    #[tokio::test]
    async fn test_session_create_find_expire() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let sessions = SessionRepo::new(Arc::clone(&conn));

        let user = users
            .create(NewUser {
                name: "John Smith".to_string(),
                phone_number: "+12345678901".to_string(),
                email: None,
                password_hash: "$argon2id$stub".to_string(),
            })
            .await
            .expect("user");

        let fresh = sessions
            .create(user.id, DEFAULT_SESSION_TTL_SECS)
            .await
            .expect("fresh session");
        let stale = sessions.create(user.id, -10).await.expect("stale session");

        let found = sessions.find(&fresh.token).await.expect("find").expect("exists");
        assert_eq!(found.user_id, user.id);
        assert!(found.expires_at > now_ts());

        let deleted = sessions.delete_expired().await.expect("cleanup");
        assert_eq!(deleted, 1);
        assert!(sessions.find(&stale.token).await.expect("find").is_none());
        assert!(sessions.find(&fresh.token).await.expect("find").is_some());
    }
}
