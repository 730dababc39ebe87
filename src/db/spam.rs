// src/db/spam.rs
//
// Журнал жалоб: одна строка на пару (номер, автор). Закрытие жалобы —
// отдельное явное действие; закрытые строки выпадают из текущего
// скоринга, но остаются в статистике.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::error::{conflict_or_storage, ServiceError};
use crate::db::scoring::{self, RiskTier};
use crate::db::{now_ts, opt_uuid_from_blob, uuid_from_blob};

/// Закрытый набор причин.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamReason {
    Robocall,
    Scam,
    Telemarketing,
    Harassment,
    Other,
}

impl SpamReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpamReason::Robocall => "robocall",
            SpamReason::Scam => "scam",
            SpamReason::Telemarketing => "telemarketing",
            SpamReason::Harassment => "harassment",
            SpamReason::Other => "other",
        }
    }
}

impl FromStr for SpamReason {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "robocall" => Ok(SpamReason::Robocall),
            "scam" => Ok(SpamReason::Scam),
            "telemarketing" => Ok(SpamReason::Telemarketing),
            "harassment" => Ok(SpamReason::Harassment),
            "other" => Ok(SpamReason::Other),
            _ => Err(ServiceError::Validation("invalid spam reason".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpamReport {
    pub id: Uuid,
    pub phone_number: String,
    pub reported_by: Uuid,
    pub reason: SpamReason,
    pub description: Option<String>,
    pub is_resolved: bool,
    pub resolved_at: Option<i64>,
    pub resolved_by: Option<Uuid>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasonCount {
    pub reason: SpamReason,
    pub count: i64,
}

/// Сводка по номеру: всего жалоб (включая закрытые), разбивка по
/// причинам и текущая вероятность (по незакрытым).
#[derive(Debug, Clone, Serialize)]
pub struct SpamStats {
    pub total_reports: i64,
    pub reports_by_reason: Vec<ReasonCount>,
    pub spam_likelihood: u8,
}

/// Позиция "горячего" списка: ранжируем по числу жалоб в окне,
/// вероятность считаем по всем незакрытым за всё время.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingNumber {
    pub phone_number: String,
    pub report_count: i64,
    pub spam_likelihood: u8,
    pub risk_level: RiskTier,
}

const REPORT_COLUMNS: &str = "id, phone_number, reported_by, reason, description, is_resolved, resolved_at, resolved_by, created_at, updated_at";

pub struct SpamRepo {
    conn: Arc<Connection>,
}

impl SpamRepo {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<SpamReport> {
        let id_blob: Vec<u8> = row.get(0)?;
        let reporter_blob: Vec<u8> = row.get(2)?;
        let reason_str: String = row.get(3)?;
        let reason = SpamReason::from_str(&reason_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let resolved_blob: Option<Vec<u8>> = row.get(7)?;
        Ok(SpamReport {
            id: uuid_from_blob(0, id_blob)?,
            phone_number: row.get(1)?,
            reported_by: uuid_from_blob(2, reporter_blob)?,
            reason,
            description: row.get(4)?,
            is_resolved: row.get::<_, i64>(5)? != 0,
            resolved_at: row.get(6)?,
            resolved_by: opt_uuid_from_blob(7, resolved_blob)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Новая жалоба. Повторная от того же автора на тот же номер
    /// отклоняется уникальным индексом — это и есть сигнал Conflict.
    pub async fn insert(
        &self,
        phone: &str,
        reported_by: Uuid,
        reason: SpamReason,
        description: Option<String>,
    ) -> Result<SpamReport, ServiceError> {
        let report = SpamReport {
            id: Uuid::now_v7(),
            phone_number: phone.to_string(),
            reported_by,
            reason,
            description,
            is_resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at: now_ts(),
            updated_at: now_ts(),
        };

        let inserted = report.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO spam_reports (
                        id, phone_number, reported_by, reason, description,
                        is_resolved, resolved_at, resolved_by, created_at, updated_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        inserted.id.as_bytes().to_vec(),
                        inserted.phone_number,
                        inserted.reported_by.as_bytes().to_vec(),
                        inserted.reason.as_str(),
                        inserted.description,
                        inserted.is_resolved as i64,
                        inserted.resolved_at,
                        inserted.resolved_by.map(|u| u.as_bytes().to_vec()),
                        inserted.created_at,
                        inserted.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| conflict_or_storage(e, "you have already reported this phone number"))?;

        Ok(report)
    }

    /// Сколько незакрытых жалоб на номер — вход скоринга.
    pub async fn count_unresolved(&self, phone: &str) -> Result<i64, ServiceError> {
        let phone = phone.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM spam_reports WHERE phone_number = ?1 AND is_resolved = 0",
                    params![phone],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }

    /// Жалобы на номер не старше `since_ts` (любой статус).
    pub async fn count_since(&self, phone: &str, since_ts: i64) -> Result<i64, ServiceError> {
        let phone = phone.to_string();
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM spam_reports WHERE phone_number = ?1 AND created_at >= ?2",
                    params![phone, since_ts],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }

    pub async fn stats(&self, phone: &str) -> Result<SpamStats, ServiceError> {
        let phone = phone.to_string();
        let stats = self
            .conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM spam_reports WHERE phone_number = ?1",
                    params![phone.clone()],
                    |r| r.get(0),
                )?;

                let mut stmt = conn.prepare(
                    r#"SELECT reason, COUNT(*)
                       FROM spam_reports
                       WHERE phone_number = ?1
                       GROUP BY reason
                       ORDER BY COUNT(*) DESC, reason ASC"#,
                )?;
                let mut rows = stmt.query(params![phone.clone()])?;
                let mut by_reason = Vec::new();
                while let Some(row) = rows.next()? {
                    let reason_str: String = row.get(0)?;
                    let reason = SpamReason::from_str(&reason_str).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            0,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    by_reason.push(ReasonCount {
                        reason,
                        count: row.get(1)?,
                    });
                }

                let unresolved: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM spam_reports WHERE phone_number = ?1 AND is_resolved = 0",
                    params![phone],
                    |r| r.get(0),
                )?;

                Ok(SpamStats {
                    total_reports: total,
                    reports_by_reason: by_reason,
                    spam_likelihood: scoring::likelihood(unresolved as u64),
                })
            })
            .await?;
        Ok(stats)
    }

    pub async fn find_by_phone_and_reporter(
        &self,
        phone: &str,
        reported_by: Uuid,
    ) -> Result<Option<SpamReport>, ServiceError> {
        let phone = phone.to_string();
        let report = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {REPORT_COLUMNS} FROM spam_reports WHERE phone_number = ?1 AND reported_by = ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![phone, reported_by.as_bytes().to_vec()])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_report(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(report)
    }

    /// Жалобы автора, свежие сверху.
    pub async fn list_for_reporter(
        &self,
        reported_by: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(i64, Vec<SpamReport>), ServiceError> {
        let page = self
            .conn
            .call(move |conn| {
                let reporter = reported_by.as_bytes().to_vec();
                let total: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM spam_reports WHERE reported_by = ?1",
                    params![reporter.clone()],
                    |r| r.get(0),
                )?;

                let sql = format!(
                    r#"SELECT {REPORT_COLUMNS} FROM spam_reports
                       WHERE reported_by = ?1
                       ORDER BY created_at DESC
                       LIMIT ?2 OFFSET ?3"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![reporter, limit, offset])?;
                let mut reports = Vec::new();
                while let Some(row) = rows.next()? {
                    reports.push(Self::row_to_report(row)?);
                }
                Ok((total, reports))
            })
            .await?;
        Ok(page)
    }

    /// Автор может удалить собственную жалобу; чужая неотличима
    /// от несуществующей.
    pub async fn delete_own(&self, reported_by: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM spam_reports WHERE id = ?1 AND reported_by = ?2",
                    params![id.as_bytes().to_vec(), reported_by.as_bytes().to_vec()],
                )?;
                Ok(n)
            })
            .await?;
        if changed == 0 {
            return Err(ServiceError::NotFound("spam report not found".to_string()));
        }
        Ok(())
    }

    /// Закрытие жалобы: флаг + время + кто закрыл. Из незакрытого
    /// счётчика строка уходит, из истории — нет.
    pub async fn resolve(&self, id: Uuid, resolved_by: Uuid) -> Result<SpamReport, ServiceError> {
        let now = now_ts();
        let resolved = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    r#"UPDATE spam_reports
                       SET is_resolved = 1, resolved_at = ?1, resolved_by = ?2, updated_at = ?1
                       WHERE id = ?3 AND is_resolved = 0"#,
                    params![now, resolved_by.as_bytes().to_vec(), id.as_bytes().to_vec()],
                )?;
                if n > 0 {
                    return Ok(Some(true));
                }
                // Либо жалобы нет, либо она уже закрыта
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM spam_reports WHERE id = ?1)",
                    params![id.as_bytes().to_vec()],
                    |r| r.get(0),
                )?;
                Ok(if exists { Some(false) } else { None })
            })
            .await?;

        match resolved {
            Some(true) => self
                .find_by_id(id)
                .await?
                .ok_or_else(|| ServiceError::NotFound("spam report not found".to_string())),
            Some(false) => Err(ServiceError::Conflict(
                "spam report is already resolved".to_string(),
            )),
            None => Err(ServiceError::NotFound("spam report not found".to_string())),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<SpamReport>, ServiceError> {
        let report = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {REPORT_COLUMNS} FROM spam_reports WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id.as_bytes().to_vec()])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(Self::row_to_report(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(report)
    }

    /// Топ номеров по числу жалоб в скользящем окне. Окно ранжирования
    /// и окно скоринга — разные: вероятность каждой позиции считается
    /// по незакрытым жалобам за всё время.
    pub async fn trending(
        &self,
        window_days: i64,
        top_n: i64,
    ) -> Result<Vec<TrendingNumber>, ServiceError> {
        let cutoff = now_ts() - window_days * 86_400;
        let trending = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT phone_number, COUNT(*) AS cnt
                       FROM spam_reports
                       WHERE created_at >= ?1
                       GROUP BY phone_number
                       ORDER BY cnt DESC, phone_number ASC
                       LIMIT ?2"#,
                )?;
                let mut rows = stmt.query(params![cutoff, top_n])?;
                let mut ranked: Vec<(String, i64)> = Vec::new();
                while let Some(row) = rows.next()? {
                    ranked.push((row.get(0)?, row.get(1)?));
                }

                let mut unresolved_stmt = conn.prepare(
                    "SELECT COUNT(*) FROM spam_reports WHERE phone_number = ?1 AND is_resolved = 0",
                )?;
                let mut out = Vec::with_capacity(ranked.len());
                for (phone, cnt) in ranked {
                    let unresolved: i64 =
                        unresolved_stmt.query_row(params![phone.clone()], |r| r.get(0))?;
                    let likelihood = scoring::likelihood(unresolved as u64);
                    out.push(TrendingNumber {
                        phone_number: phone,
                        report_count: cnt,
                        spam_likelihood: likelihood,
                        risk_level: RiskTier::from_likelihood(likelihood),
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(trending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::setup_migrations;
    use crate::db::user::{NewUser, UserRepo};

    async fn setup_test_db() -> Arc<Connection> {
        let conn = Connection::open_in_memory().await.expect("open in-memory db");
        setup_migrations(&conn).await.expect("migrations");
        Arc::new(conn)
    }

    async fn add_user(repo: &UserRepo, phone: &str) -> Uuid {
        repo.create(NewUser {
            name: format!("Reporter {phone}"),
            phone_number: phone.to_string(),
            email: None,
            password_hash: "$argon2id$stub".to_string(),
        })
        .await
        .expect("create user")
        .id
    }

    #[tokio::test]
    async fn test_duplicate_report_is_conflict() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let repo = SpamRepo::new(Arc::clone(&conn));
        let reporter = add_user(&users, "+12345678901").await;

        repo.insert("+18005551234", reporter, SpamReason::Scam, None)
            .await
            .expect("first report");

        let err = repo
            .insert(
                "+18005551234",
                reporter,
                SpamReason::Robocall,
                Some("again".to_string()),
            )
            .await
            .expect_err("duplicate pair");
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Осталась ровно одна строка
        let (total, _) = repo.list_for_reporter(reporter, 0, 10).await.expect("list");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_resolve_lifecycle() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let repo = SpamRepo::new(Arc::clone(&conn));
        let a = add_user(&users, "+12345678901").await;
        let b = add_user(&users, "+12345678902").await;
        let moderator = add_user(&users, "+12345678903").await;

        let report = repo
            .insert("+18005551234", a, SpamReason::Scam, None)
            .await
            .expect("report a");
        repo.insert("+18005551234", b, SpamReason::Robocall, None)
            .await
            .expect("report b");

        assert_eq!(repo.count_unresolved("+18005551234").await.expect("count"), 2);

        let resolved = repo.resolve(report.id, moderator).await.expect("resolve");
        assert!(resolved.is_resolved);
        assert_eq!(resolved.resolved_by, Some(moderator));
        assert!(resolved.resolved_at.is_some());

        // Незакрытых стало меньше, история не уменьшилась
        assert_eq!(repo.count_unresolved("+18005551234").await.expect("count"), 1);
        let stats = repo.stats("+18005551234").await.expect("stats");
        assert_eq!(stats.total_reports, 2);
        assert_eq!(stats.spam_likelihood, 25);

        // Повторное закрытие — Conflict
        let err = repo.resolve(report.id, moderator).await.expect_err("again");
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stats_breakdown() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let repo = SpamRepo::new(Arc::clone(&conn));

        for (i, reason) in [SpamReason::Scam, SpamReason::Scam, SpamReason::Robocall]
            .into_iter()
            .enumerate()
        {
            let reporter = add_user(&users, &format!("+1234567890{i}")).await;
            repo.insert("+18005551234", reporter, reason, None)
                .await
                .expect("report");
        }

        let stats = repo.stats("+18005551234").await.expect("stats");
        assert_eq!(stats.total_reports, 3);
        assert_eq!(stats.spam_likelihood, 50);
        assert_eq!(stats.reports_by_reason.len(), 2);
        assert_eq!(stats.reports_by_reason[0].reason, SpamReason::Scam);
        assert_eq!(stats.reports_by_reason[0].count, 2);
    }

    #[tokio::test]
    async fn test_trending_ranked_by_window_count() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let repo = SpamRepo::new(Arc::clone(&conn));

        // +1800...01 — три жалобы, +1800...02 — две, +1800...03 — одна
        let mut reporters = Vec::new();
        for i in 0..3 {
            reporters.push(add_user(&users, &format!("+1234567891{i}")).await);
        }
        for (idx, phone) in ["+18005550001", "+18005550002", "+18005550003"]
            .iter()
            .enumerate()
        {
            for reporter in reporters.iter().take(3 - idx) {
                repo.insert(phone, *reporter, SpamReason::Telemarketing, None)
                    .await
                    .expect("report");
            }
        }

        let trending = repo.trending(7, 10).await.expect("trending");
        assert_eq!(trending.len(), 3);
        assert_eq!(trending[0].phone_number, "+18005550001");
        assert_eq!(trending[0].report_count, 3);
        assert_eq!(trending[0].spam_likelihood, 50);
        assert_eq!(trending[1].report_count, 2);
        assert_eq!(trending[2].report_count, 1);

        // top_n ограничивает размер списка
        let capped = repo.trending(7, 2).await.expect("trending capped");
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_own_only() {
        let conn = setup_test_db().await;
        let users = UserRepo::new(Arc::clone(&conn));
        let repo = SpamRepo::new(Arc::clone(&conn));
        let author = add_user(&users, "+12345678901").await;
        let stranger = add_user(&users, "+12345678902").await;

        let report = repo
            .insert("+18005551234", author, SpamReason::Other, None)
            .await
            .expect("report");

        let err = repo
            .delete_own(stranger, report.id)
            .await
            .expect_err("stranger cannot delete");
        assert!(matches!(err, ServiceError::NotFound(_)));

        repo.delete_own(author, report.id).await.expect("author deletes");
        assert_eq!(repo.count_unresolved("+18005551234").await.expect("count"), 0);
    }
}
