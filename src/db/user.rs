// src/db/user.rs

use std::sync::Arc;

use serde::Serialize;
use tokio_rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::error::{conflict_or_storage, ServiceError};
use crate::db::{now_ts, uuid_from_blob};

/// Зарегистрированный пользователь. Единственный владелец номера телефона.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    /// Argon2id-хэш; наружу не сериализуется никогда.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Данные для регистрации (пароль уже захэширован снаружи).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub password_hash: String,
}

const USER_COLUMNS: &str =
    "id, name, phone_number, email, password_hash, is_active, last_login_at, created_at, updated_at";

pub struct UserRepo {
    conn: Arc<Connection>,
}

impl UserRepo {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let id_blob: Vec<u8> = row.get(0)?;
        Ok(User {
            id: uuid_from_blob(0, id_blob)?,
            name: row.get(1)?,
            phone_number: row.get(2)?,
            email: row.get(3)?,
            password_hash: row.get(4)?,
            is_active: row.get::<_, i64>(5)? != 0,
            last_login_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Вставка нового пользователя. Дубликат телефона или email
    /// упирается в уникальный индекс и приходит обратно как Conflict.
    pub async fn create(&self, input: NewUser) -> Result<User, ServiceError> {
        let user = User {
            id: Uuid::now_v7(),
            name: input.name,
            phone_number: input.phone_number,
            email: input.email,
            password_hash: input.password_hash,
            is_active: true,
            last_login_at: None,
            created_at: now_ts(),
            updated_at: now_ts(),
        };

        let inserted = user.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO users (
                        id, name, phone_number, email, password_hash,
                        is_active, last_login_at, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        inserted.id.as_bytes().to_vec(),
                        inserted.name,
                        inserted.phone_number,
                        inserted.email,
                        inserted.password_hash,
                        inserted.is_active as i64,
                        inserted.last_login_at,
                        inserted.created_at,
                        inserted.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| {
                conflict_or_storage(e, "user with this phone number or email already exists")
            })?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id.as_bytes().to_vec()])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_user(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(user)
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, ServiceError> {
        let phone = phone.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![phone])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_user(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(user)
    }

    /// Вариант для резолвера: только активные аккаунты.
    pub async fn find_active_by_phone(&self, phone: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .find_by_phone(phone)
            .await?
            .filter(|u| u.is_active))
    }

    /// Поиск по подстроке имени (без учёта регистра), исключая самого
    /// запрашивающего. Только активные, имя по возрастанию.
    pub async fn search_by_name(
        &self,
        query: &str,
        exclude: Uuid,
        cap: i64,
    ) -> Result<Vec<User>, ServiceError> {
        let pattern = format!("%{}%", query);
        let users = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {USER_COLUMNS} FROM users
                       WHERE name LIKE ?1 AND is_active = 1 AND id != ?2
                       ORDER BY name ASC
                       LIMIT ?3"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![pattern, exclude.as_bytes().to_vec(), cap])?;
                let mut users = Vec::new();
                while let Some(row) = rows.next()? {
                    users.push(Self::row_to_user(row)?);
                }
                Ok(users)
            })
            .await?;
        Ok(users)
    }

    /// Частичное обновление профиля. Отсутствующие поля не трогаем
    /// (COALESCE), email-конфликт отдаём как Conflict.
    pub async fn update_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User, ServiceError> {
        let now = now_ts();
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE users
                       SET name = COALESCE(?1, name),
                           email = COALESCE(?2, email),
                           updated_at = ?3
                       WHERE id = ?4"#,
                    params![name, email, now, id.as_bytes().to_vec()],
                )?;
                Ok(n)
            })
            .await
            .map_err(|e| conflict_or_storage(e, "user with this email already exists"))?;

        if changed == 0 {
            return Err(ServiceError::NotFound("user not found".to_string()));
        }
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("user not found".to_string()))
    }

    pub async fn set_password_hash(&self, id: Uuid, hash: String) -> Result<(), ServiceError> {
        let now = now_ts();
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                    params![hash, now, id.as_bytes().to_vec()],
                )?;
                Ok(n)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound("user not found".to_string()));
        }
        Ok(())
    }

    pub async fn touch_last_login(&self, id: Uuid) -> Result<(), ServiceError> {
        let now = now_ts();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                    params![now, id.as_bytes().to_vec()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
