// src/db/handler.rs
//
// Сервисный фасад: проверка входа, аутентификация, пересчёт
// производных флагов и склейка репозиториев с резолвером. Это всё,
// что внешний HTTP-слой должен звать; сам HTTP живёт не здесь.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::db::auth::{self, SessionRepo, DEFAULT_SESSION_TTL_SECS};
use crate::db::cache::CacheHandler;
use crate::db::contact::{ContactEntry, ContactInput, ContactRepo};
use crate::db::error::ServiceError;
use crate::db::migrations::setup_migrations;
use crate::db::monitoring::{measure_db_operation, SPAM_REPORT_COUNTER};
use crate::db::scoring::{self, RiskTier};
use crate::db::search::{NumberDetails, Resolver, SearchResult};
use crate::db::spam::{SpamReason, SpamReport, SpamRepo, SpamStats, TrendingNumber};
use crate::db::user::{NewUser, User, UserRepo};
use crate::db::{now_ts, validate};

/// Ёмкость кэша "номер -> личность".
const IDENTITY_CACHE_CAPACITY: usize = 256;

/// Окно "горячего" списка и его размер.
const TRENDING_WINDOW_DAYS: i64 = 7;
const TRENDING_TOP_N: i64 = 10;

/// Окно "свежих жалоб" в проверке номера.
const RECENT_REPORTS_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// Контакт с приклеенным скорингом его номера.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredContact {
    #[serde(flatten)]
    pub contact: ContactEntry,
    pub spam_likelihood: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactPage {
    pub contacts: Vec<ScoredContact>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpamReportInput {
    pub phone_number: String,
    pub reason: SpamReason,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPage {
    pub reports: Vec<SpamReport>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsOutcome {
    pub phone_number: String,
    pub spam_stats: SpamStats,
    pub user_reported: bool,
    pub user_report: Option<SpamReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub phone_number: String,
    pub spam_likelihood: u8,
    pub is_spam: bool,
    pub recent_reports: i64,
    pub user_reported: bool,
    pub risk_level: RiskTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Name,
    Phone,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub pagination: Pagination,
}

pub struct CallerDb {
    conn: Arc<Connection>,
    cache: CacheHandler,
    session_ttl: i64,
}

impl CallerDb {
    pub async fn open(path: &str) -> Result<Self, ServiceError> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, ServiceError> {
        setup_migrations(&conn).await?;
        Ok(Self {
            conn: Arc::new(conn),
            cache: CacheHandler::new(IDENTITY_CACHE_CAPACITY),
            session_ttl: DEFAULT_SESSION_TTL_SECS,
        })
    }

    pub fn with_session_ttl(mut self, ttl_secs: i64) -> Self {
        self.session_ttl = ttl_secs;
        self
    }

    fn users(&self) -> UserRepo {
        UserRepo::new(Arc::clone(&self.conn))
    }

    fn contacts(&self) -> ContactRepo {
        ContactRepo::new(Arc::clone(&self.conn))
    }

    fn spam(&self) -> SpamRepo {
        SpamRepo::new(Arc::clone(&self.conn))
    }

    fn sessions(&self) -> SessionRepo {
        SessionRepo::new(Arc::clone(&self.conn))
    }

    fn resolver(&self) -> Resolver {
        Resolver::new(Arc::clone(&self.conn), self.cache.clone())
    }

    // ---------------------- Аутентификация ----------------------

    pub async fn register(&self, input: RegisterInput) -> Result<AuthOutcome, ServiceError> {
        validate::validate_user_name(&input.name)?;
        validate::validate_phone(&input.phone_number)?;
        if let Some(ref email) = input.email {
            validate::validate_email(email)?;
        }
        validate::validate_password(&input.password)?;

        // Хэширование тяжёлое — не держим им воркеры рантайма
        let password = input.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
            .await
            .map_err(|e| ServiceError::Unexpected(format!("hashing task failed: {e}")))??;

        let user = self
            .users()
            .create(NewUser {
                name: input.name,
                phone_number: input.phone_number,
                email: input.email,
                password_hash,
            })
            .await?;

        self.users().touch_last_login(user.id).await?;
        let session = self.sessions().create(user.id, self.session_ttl).await?;
        info!("registered user {} ({})", user.id, user.phone_number);

        let user = self
            .users()
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| ServiceError::Unexpected("user vanished after registration".to_string()))?;
        Ok(AuthOutcome {
            user,
            token: session.token,
        })
    }

    pub async fn login(&self, phone: &str, password: &str) -> Result<AuthOutcome, ServiceError> {
        validate::validate_phone(phone)?;

        let user = match self.users().find_by_phone(phone).await? {
            Some(u) => u,
            None => {
                warn!("login failed: unknown phone");
                return Err(ServiceError::Auth("invalid credentials".to_string()));
            }
        };
        if !user.is_active {
            return Err(ServiceError::Auth("account is deactivated".to_string()));
        }

        let hash = user.password_hash.clone();
        let candidate = password.to_string();
        let ok = tokio::task::spawn_blocking(move || auth::verify_password(&candidate, &hash))
            .await
            .map_err(|e| ServiceError::Unexpected(format!("hashing task failed: {e}")))??;
        if !ok {
            warn!("login failed: bad password for {}", user.id);
            return Err(ServiceError::Auth("invalid credentials".to_string()));
        }

        // Заодно подчищаем протухшие сессии
        self.sessions().delete_expired().await?;
        self.users().touch_last_login(user.id).await?;
        let session = self.sessions().create(user.id, self.session_ttl).await?;
        info!("user {} logged in", user.id);

        let user = self
            .users()
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| ServiceError::Unexpected("user vanished after login".to_string()))?;
        Ok(AuthOutcome {
            user,
            token: session.token,
        })
    }

    /// Токен -> живой активный пользователь; всё остальное — AuthError.
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let session = self
            .sessions()
            .find(token)
            .await?
            .ok_or_else(|| ServiceError::Auth("invalid token".to_string()))?;
        if session.expires_at <= now_ts() {
            return Err(ServiceError::Auth("token expired".to_string()));
        }
        let user = self
            .users()
            .find_by_id(session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ServiceError::Auth("invalid or inactive user".to_string()))?;
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        user: &User,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<User, ServiceError> {
        if let Some(ref n) = name {
            validate::validate_user_name(n)?;
        }
        if let Some(ref e) = email {
            validate::validate_email(e)?;
        }
        let updated = self.users().update_profile(user.id, name, email).await?;
        // Резолвер не должен отдавать устаревший профиль из кэша
        self.cache.invalidate(&updated.phone_number);
        Ok(updated)
    }

    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate::validate_password(new_password)?;

        let hash = user.password_hash.clone();
        let candidate = current.to_string();
        let ok = tokio::task::spawn_blocking(move || auth::verify_password(&candidate, &hash))
            .await
            .map_err(|e| ServiceError::Unexpected(format!("hashing task failed: {e}")))??;
        if !ok {
            return Err(ServiceError::Auth("invalid credentials".to_string()));
        }

        let next = new_password.to_string();
        let new_hash = tokio::task::spawn_blocking(move || auth::hash_password(&next))
            .await
            .map_err(|e| ServiceError::Unexpected(format!("hashing task failed: {e}")))??;
        self.users().set_password_hash(user.id, new_hash).await?;
        info!("user {} changed password", user.id);
        Ok(())
    }

    // ---------------------- Контакты ----------------------

    /// Производные флаги записи: кто (если кто-то) владеет номером.
    /// Пересчитывается явно на каждой записи, а не в хуке хранилища.
    async fn registration_target(&self, phone: &str) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.users().find_by_phone(phone).await?.map(|u| u.id))
    }

    async fn score_contact(&self, contact: ContactEntry) -> Result<ScoredContact, ServiceError> {
        let unresolved = self.spam().count_unresolved(&contact.phone_number).await?;
        Ok(ScoredContact {
            contact,
            spam_likelihood: scoring::likelihood(unresolved as u64),
        })
    }

    pub async fn add_contact(
        &self,
        user: &User,
        input: ContactInput,
    ) -> Result<ScoredContact, ServiceError> {
        validate::validate_contact_name(&input.name)?;
        validate::validate_phone(&input.phone_number)?;
        if let Some(ref email) = input.email {
            validate::validate_email(email)?;
        }

        let target = self.registration_target(&input.phone_number).await?;
        let entry = self.contacts().insert(user.id, input, target).await?;
        self.score_contact(entry).await
    }

    pub async fn list_contacts(
        &self,
        user: &User,
        page: i64,
        limit: i64,
    ) -> Result<ContactPage, ServiceError> {
        validate::validate_limit(limit)?;
        let page = page.max(1);
        let offset = (page - 1) * limit;

        let (total, entries) = self.contacts().list_for_owner(user.id, offset, limit).await?;
        let mut contacts = Vec::with_capacity(entries.len());
        for entry in entries {
            contacts.push(self.score_contact(entry).await?);
        }
        Ok(ContactPage {
            contacts,
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub async fn get_contact(&self, user: &User, id: Uuid) -> Result<ScoredContact, ServiceError> {
        let entry = self
            .contacts()
            .get(user.id, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("contact not found".to_string()))?;
        self.score_contact(entry).await
    }

    /// Обновление записи. Флаги регистрации пересчитываются всегда:
    /// если номер успел зарегистрироваться после создания записи,
    /// любое изменение полей подтянет is_registered/registered_user_id.
    pub async fn update_contact(
        &self,
        user: &User,
        id: Uuid,
        input: ContactInput,
    ) -> Result<ScoredContact, ServiceError> {
        validate::validate_contact_name(&input.name)?;
        validate::validate_phone(&input.phone_number)?;
        if let Some(ref email) = input.email {
            validate::validate_email(email)?;
        }

        let target = self.registration_target(&input.phone_number).await?;
        let entry = self.contacts().update(user.id, id, input, target).await?;
        self.score_contact(entry).await
    }

    pub async fn delete_contact(&self, user: &User, id: Uuid) -> Result<(), ServiceError> {
        self.contacts().delete(user.id, id).await
    }

    // ---------------------- Жалобы ----------------------

    pub async fn report_spam(
        &self,
        user: &User,
        input: SpamReportInput,
    ) -> Result<SpamReport, ServiceError> {
        validate::validate_phone(&input.phone_number)?;
        validate::validate_description(input.description.as_deref())?;

        let report = measure_db_operation(
            "report_spam",
            self.spam()
                .insert(&input.phone_number, user.id, input.reason, input.description),
        )
        .await?;

        SPAM_REPORT_COUNTER
            .with_label_values(&[report.reason.as_str()])
            .inc();
        info!(
            "user {} reported {} as {}",
            user.id,
            report.phone_number,
            report.reason.as_str()
        );
        Ok(report)
    }

    pub async fn my_reports(
        &self,
        user: &User,
        page: i64,
        limit: i64,
    ) -> Result<ReportPage, ServiceError> {
        validate::validate_limit(limit)?;
        let page = page.max(1);
        let offset = (page - 1) * limit;
        let (total, reports) = self.spam().list_for_reporter(user.id, offset, limit).await?;
        Ok(ReportPage {
            reports,
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub async fn delete_report(&self, user: &User, id: Uuid) -> Result<(), ServiceError> {
        self.spam().delete_own(user.id, id).await
    }

    pub async fn spam_stats(&self, user: &User, phone: &str) -> Result<StatsOutcome, ServiceError> {
        validate::validate_phone(phone)?;
        let stats = self.spam().stats(phone).await?;
        let own = self.spam().find_by_phone_and_reporter(phone, user.id).await?;
        Ok(StatsOutcome {
            phone_number: phone.to_string(),
            spam_stats: stats,
            user_reported: own.is_some(),
            user_report: own,
        })
    }

    pub async fn check_number(&self, user: &User, phone: &str) -> Result<CheckOutcome, ServiceError> {
        validate::validate_phone(phone)?;

        let unresolved = self.spam().count_unresolved(phone).await?;
        let likelihood = scoring::likelihood(unresolved as u64);
        let recent_cutoff = now_ts() - RECENT_REPORTS_WINDOW_DAYS * 86_400;
        let recent = self.spam().count_since(phone, recent_cutoff).await?;
        let own = self.spam().find_by_phone_and_reporter(phone, user.id).await?;

        Ok(CheckOutcome {
            phone_number: phone.to_string(),
            spam_likelihood: likelihood,
            is_spam: scoring::is_spam(likelihood),
            recent_reports: recent,
            user_reported: own.is_some(),
            risk_level: RiskTier::from_likelihood(likelihood),
        })
    }

    pub async fn trending(&self) -> Result<Vec<TrendingNumber>, ServiceError> {
        measure_db_operation(
            "trending",
            self.spam().trending(TRENDING_WINDOW_DAYS, TRENDING_TOP_N),
        )
        .await
    }

    /// Закрытие жалобы (модерация). Ролей здесь нет: любой активный
    /// аутентифицированный пользователь может закрыть жалобу, id
    /// закрывшего пишется в строку.
    pub async fn resolve_report(&self, user: &User, id: Uuid) -> Result<SpamReport, ServiceError> {
        let resolved = self.spam().resolve(id, user.id).await?;
        info!("report {} resolved by {}", id, user.id);
        Ok(resolved)
    }

    // ---------------------- Поиск ----------------------

    pub async fn search(
        &self,
        user: &User,
        query: &str,
        search_type: SearchType,
        page: i64,
        limit: i64,
    ) -> Result<SearchPage, ServiceError> {
        validate::validate_search_query(query)?;
        validate::validate_limit(limit)?;
        let page = page.max(1);
        let offset = (page - 1) * limit;

        let results = match search_type {
            SearchType::Phone => {
                measure_db_operation(
                    "search_by_phone",
                    self.resolver().search_by_phone(user, query, offset, limit),
                )
                .await?
            }
            SearchType::Name => {
                measure_db_operation(
                    "search_by_name",
                    self.resolver().search_by_name(user, query, limit),
                )
                .await?
            }
        };

        let total = results.len() as i64;
        Ok(SearchPage {
            results,
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub async fn number_details(
        &self,
        user: &User,
        phone: &str,
    ) -> Result<NumberDetails, ServiceError> {
        validate::validate_phone(phone)?;
        self.resolver().details(user, phone).await
    }
}
