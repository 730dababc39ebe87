// src/lib.rs
//
// callerdb: определитель номера и краудсорсинговые жалобы на спам
// поверх SQLite. Пользователи, адресные книги, журнал жалоб, скоринг
// и резолвер видимости; HTTP-слой живёт снаружи и зовёт CallerDb.

pub mod db;

pub use db::auth::DEFAULT_SESSION_TTL_SECS;
pub use db::contact::{ContactEntry, ContactInput, KnownAs};
pub use db::error::{ApiResponse, ServiceError};
pub use db::handler::{
    AuthOutcome, CallerDb, CheckOutcome, ContactPage, Pagination, RegisterInput, ReportPage,
    ScoredContact, SearchPage, SearchType, SpamReportInput, StatsOutcome,
};
pub use db::monitoring::gather_metrics;
pub use db::scoring::{is_spam, likelihood, RiskTier};
pub use db::search::{NumberDetails, RegisteredSummary, SearchResult, SearchSource};
pub use db::spam::{ReasonCount, SpamReason, SpamReport, SpamStats, TrendingNumber};
pub use db::user::User;
