// src/db/contact.rs

use std::sync::Arc;

use serde::Serialize;
use tokio_rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::error::{conflict_or_storage, ServiceError};
use crate::db::{now_ts, opt_uuid_from_blob, uuid_from_blob};

/// Запись адресной книги. Принадлежит ровно одному владельцу;
/// номер может указывать на зарегистрированного пользователя, а может
/// и нет — флаги is_registered / registered_user_id производные и
/// пересчитываются сервисным слоем при каждой записи.
#[derive(Debug, Clone, Serialize)]
pub struct ContactEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub is_registered: bool,
    pub registered_user_id: Option<Uuid>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

/// "Кто записал этот номер и под каким именем" — для деталей номера.
/// Наружу уходят только имена, ни телефонов, ни email добавившего.
#[derive(Debug, Clone, Serialize)]
pub struct KnownAs {
    pub name: String,
    pub added_by: String,
}

const CONTACT_COLUMNS: &str = "id, owner_id, name, phone_number, email, is_registered, registered_user_id, created_at, updated_at";

pub struct ContactRepo {
    conn: Arc<Connection>,
}

impl ContactRepo {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<ContactEntry> {
        let id_blob: Vec<u8> = row.get(0)?;
        let owner_blob: Vec<u8> = row.get(1)?;
        let reg_blob: Option<Vec<u8>> = row.get(6)?;
        Ok(ContactEntry {
            id: uuid_from_blob(0, id_blob)?,
            owner_id: uuid_from_blob(1, owner_blob)?,
            name: row.get(2)?,
            phone_number: row.get(3)?,
            email: row.get(4)?,
            is_registered: row.get::<_, i64>(5)? != 0,
            registered_user_id: opt_uuid_from_blob(6, reg_blob)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Вставка. Пара (владелец, номер) уникальна на уровне индекса:
    /// проигравший гонку дубликат получает Conflict, без
    /// предварительного чтения.
    pub async fn insert(
        &self,
        owner_id: Uuid,
        input: ContactInput,
        registered_user_id: Option<Uuid>,
    ) -> Result<ContactEntry, ServiceError> {
        let entry = ContactEntry {
            id: Uuid::now_v7(),
            owner_id,
            name: input.name,
            phone_number: input.phone_number,
            email: input.email,
            is_registered: registered_user_id.is_some(),
            registered_user_id,
            created_at: now_ts(),
            updated_at: now_ts(),
        };

        let inserted = entry.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO contacts (
                        id, owner_id, name, phone_number, email,
                        is_registered, registered_user_id, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        inserted.id.as_bytes().to_vec(),
                        inserted.owner_id.as_bytes().to_vec(),
                        inserted.name,
                        inserted.phone_number,
                        inserted.email,
                        inserted.is_registered as i64,
                        inserted.registered_user_id.map(|u| u.as_bytes().to_vec()),
                        inserted.created_at,
                        inserted.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| conflict_or_storage(e, "contact with this phone number already exists"))?;

        Ok(entry)
    }

    /// Чтение одной записи, ограниченное владельцем: чужой id
    /// неотличим от несуществующего.
    pub async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<ContactEntry>, ServiceError> {
        let entry = self
            .conn
            .call(move |conn| {
                let sql =
                    format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1 AND owner_id = ?2");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows =
                    stmt.query(params![id.as_bytes().to_vec(), owner_id.as_bytes().to_vec()])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_entry(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(entry)
    }

    /// Страница контактов владельца + общее количество.
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(i64, Vec<ContactEntry>), ServiceError> {
        let page = self
            .conn
            .call(move |conn| {
                let owner = owner_id.as_bytes().to_vec();
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM contacts WHERE owner_id = ?1",
                    params![owner.clone()],
                    |r| r.get(0),
                )?;

                let sql = format!(
                    r#"SELECT {CONTACT_COLUMNS} FROM contacts
                       WHERE owner_id = ?1
                       ORDER BY name ASC
                       LIMIT ?2 OFFSET ?3"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![owner, limit, offset])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push(Self::row_to_entry(row)?);
                }
                Ok((total, entries))
            })
            .await?;
        Ok(page)
    }

    /// Полное обновление записи (семантика PUT). Смена номера может
    /// упереться в уникальную пару — тогда Conflict.
    pub async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: ContactInput,
        registered_user_id: Option<Uuid>,
    ) -> Result<ContactEntry, ServiceError> {
        let now = now_ts();
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE contacts
                       SET name = ?1,
                           phone_number = ?2,
                           email = ?3,
                           is_registered = ?4,
                           registered_user_id = ?5,
                           updated_at = ?6
                       WHERE id = ?7 AND owner_id = ?8"#,
                    params![
                        input.name,
                        input.phone_number,
                        input.email,
                        registered_user_id.is_some() as i64,
                        registered_user_id.map(|u| u.as_bytes().to_vec()),
                        now,
                        id.as_bytes().to_vec(),
                        owner_id.as_bytes().to_vec(),
                    ],
                )?;
                Ok(n)
            })
            .await
            .map_err(|e| conflict_or_storage(e, "contact with this phone number already exists"))?;

        if changed == 0 {
            return Err(ServiceError::NotFound("contact not found".to_string()));
        }
        self.get(owner_id, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("contact not found".to_string()))
    }

    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM contacts WHERE id = ?1 AND owner_id = ?2",
                    params![id.as_bytes().to_vec(), owner_id.as_bytes().to_vec()],
                )?;
                Ok(n)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound("contact not found".to_string()));
        }
        Ok(())
    }

    /// Есть ли у владельца запись с этим номером. На этом держится
    /// правило взаимной видимости email.
    pub async fn find_by_owner_and_phone(
        &self,
        owner_id: Uuid,
        phone: &str,
    ) -> Result<Option<ContactEntry>, ServiceError> {
        let phone = phone.to_string();
        let entry = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE owner_id = ?1 AND phone_number = ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![owner_id.as_bytes().to_vec(), phone])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_entry(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(entry)
    }

    /// Все чужие записи с данным номером (страницей, имя по возрастанию).
    pub async fn find_by_phone_excluding_owner(
        &self,
        phone: &str,
        excluded_owner: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ContactEntry>, ServiceError> {
        let phone = phone.to_string();
        let entries = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {CONTACT_COLUMNS} FROM contacts
                       WHERE phone_number = ?1 AND owner_id != ?2
                       ORDER BY name ASC
                       LIMIT ?3 OFFSET ?4"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![
                    phone,
                    excluded_owner.as_bytes().to_vec(),
                    limit,
                    offset
                ])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push(Self::row_to_entry(row)?);
                }
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// Поиск по подстроке имени, чужие книжки (записи запрашивающего
    /// исключены), имя по возрастанию.
    pub async fn search_by_name(
        &self,
        query: &str,
        excluded_owner: Uuid,
        cap: i64,
    ) -> Result<Vec<ContactEntry>, ServiceError> {
        let pattern = format!("%{}%", query);
        let entries = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {CONTACT_COLUMNS} FROM contacts
                       WHERE name LIKE ?1 AND owner_id != ?2
                       ORDER BY name ASC
                       LIMIT ?3"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows =
                    stmt.query(params![pattern, excluded_owner.as_bytes().to_vec(), cap])?;
                let mut entries = Vec::new();
                while let Some(row) = rows.next()? {
                    entries.push(Self::row_to_entry(row)?);
                }
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// Под какими именами номер записан по всем книжкам: пары
    /// (имя записи, имя владельца книжки).
    pub async fn known_as(&self, phone: &str) -> Result<Vec<KnownAs>, ServiceError> {
        let phone = phone.to_string();
        let pairs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT c.name, u.name
                       FROM contacts c
                       JOIN users u ON u.id = c.owner_id
                       WHERE c.phone_number = ?1
                       ORDER BY u.name ASC"#,
                )?;
                let mut rows = stmt.query(params![phone])?;
                let mut pairs = Vec::new();
                while let Some(row) = rows.next()? {
                    pairs.push(KnownAs {
                        name: row.get(0)?,
                        added_by: row.get(1)?,
                    });
                }
                Ok(pairs)
            })
            .await?;
        Ok(pairs)
    }
}
