// src/db/search.rs
//
// Резолвер видимости: кого показать по запросу и что именно показать.
// Правило email одно на все пути: email зарегистрированного
// пользователя виден запрашивающему, только если номер запрашивающего
// лежит в адресной книге самого пользователя.

use std::sync::Arc;

use serde::Serialize;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::db::cache::CacheHandler;
use crate::db::contact::{ContactRepo, KnownAs};
use crate::db::error::ServiceError;
use crate::db::scoring;
use crate::db::spam::{SpamRepo, SpamStats};
use crate::db::user::{User, UserRepo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    RegisteredUser,
    Contact,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub is_registered_user: bool,
    pub spam_likelihood: u8,
    pub source: SearchSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredSummary {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NumberDetails {
    pub phone_number: String,
    pub is_registered_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_user: Option<RegisteredSummary>,
    pub spam_stats: SpamStats,
    pub email: Option<String>,
    /// Кросс-пользовательское раскрытие: "у кого записан и как".
    /// Только имена, никаких телефонов/email добавивших.
    pub contacts: Vec<KnownAs>,
}

pub struct Resolver {
    conn: Arc<Connection>,
    cache: CacheHandler,
}

impl Resolver {
    pub fn new(conn: Arc<Connection>, cache: CacheHandler) -> Self {
        Self { conn, cache }
    }

    /// Активный зарегистрированный владелец номера, через LRU-кэш.
    /// Кэшируются только попадания; запись сбрасывается при изменении
    /// профиля (см. handler).
    async fn registered_identity(&self, phone: &str) -> Result<Option<User>, ServiceError> {
        if let Some(user) = self.cache.get_identity(phone) {
            return Ok(Some(user));
        }
        let users = UserRepo::new(Arc::clone(&self.conn));
        let found = users.find_active_by_phone(phone).await?;
        if let Some(ref user) = found {
            self.cache.put_identity(phone.to_string(), user.clone());
        }
        Ok(found)
    }

    /// Взаимная видимость: у цели в книжке есть номер запрашивающего?
    async fn email_visible(&self, target: &User, requester: &User) -> Result<bool, ServiceError> {
        let contacts = ContactRepo::new(Arc::clone(&self.conn));
        Ok(contacts
            .find_by_owner_and_phone(target.id, &requester.phone_number)
            .await?
            .is_some())
    }

    /// Поиск по точному номеру.
    ///
    /// Если номером владеет активный пользователь — ровно один
    /// результат (дубликаты из чужих книжек не показываем). Иначе —
    /// чужие записи с этим номером, без email, страницей.
    pub async fn search_by_phone(
        &self,
        requester: &User,
        phone: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let spam = SpamRepo::new(Arc::clone(&self.conn));

        if let Some(target) = self.registered_identity(phone).await? {
            let email = if self.email_visible(&target, requester).await? {
                target.email.clone()
            } else {
                None
            };
            let likelihood = scoring::likelihood(spam.count_unresolved(phone).await? as u64);
            return Ok(vec![SearchResult {
                id: target.id,
                name: target.name.clone(),
                phone_number: target.phone_number.clone(),
                email,
                is_registered_user: true,
                spam_likelihood: likelihood,
                source: SearchSource::RegisteredUser,
            }]);
        }

        let contacts = ContactRepo::new(Arc::clone(&self.conn));
        let entries = contacts
            .find_by_phone_excluding_owner(phone, requester.id, offset, limit)
            .await?;
        // Номер один и тот же — скоринг считаем один раз
        let likelihood = scoring::likelihood(spam.count_unresolved(phone).await? as u64);
        Ok(entries
            .into_iter()
            .map(|e| SearchResult {
                id: e.id,
                name: e.name,
                phone_number: e.phone_number,
                email: None, // незарегистрированные email не раскрывают
                is_registered_user: false,
                spam_likelihood: likelihood,
                source: SearchSource::Contact,
            })
            .collect())
    }

    /// Поиск по подстроке имени: два источника, каждый с потолком
    /// floor(limit/2), зарегистрированные впереди, суммарно не больше
    /// limit. Дедупликации между источниками нет: человек может прийти
    /// дважды с разными source — поведение сохранено сознательно.
    pub async fn search_by_name(
        &self,
        requester: &User,
        query: &str,
        limit: i64,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let users = UserRepo::new(Arc::clone(&self.conn));
        let contacts = ContactRepo::new(Arc::clone(&self.conn));
        let spam = SpamRepo::new(Arc::clone(&self.conn));

        let cap = limit / 2;
        let registered = users.search_by_name(query, requester.id, cap).await?;
        let entries = contacts.search_by_name(query, requester.id, cap).await?;

        let mut results = Vec::with_capacity(registered.len() + entries.len());
        for user in registered {
            let email = if self.email_visible(&user, requester).await? {
                user.email.clone()
            } else {
                None
            };
            let likelihood =
                scoring::likelihood(spam.count_unresolved(&user.phone_number).await? as u64);
            results.push(SearchResult {
                id: user.id,
                name: user.name,
                phone_number: user.phone_number,
                email,
                is_registered_user: true,
                spam_likelihood: likelihood,
                source: SearchSource::RegisteredUser,
            });
        }
        for entry in entries {
            let likelihood =
                scoring::likelihood(spam.count_unresolved(&entry.phone_number).await? as u64);
            results.push(SearchResult {
                id: entry.id,
                name: entry.name,
                phone_number: entry.phone_number,
                email: None,
                is_registered_user: false,
                spam_likelihood: likelihood,
                source: SearchSource::Contact,
            });
        }

        results.truncate(limit as usize);
        Ok(results)
    }

    /// Детали по номеру: регистрация, полная статистика жалоб,
    /// условный email и список "у кого записан как".
    pub async fn details(
        &self,
        requester: &User,
        phone: &str,
    ) -> Result<NumberDetails, ServiceError> {
        let spam = SpamRepo::new(Arc::clone(&self.conn));
        let contacts = ContactRepo::new(Arc::clone(&self.conn));

        let registered = self.registered_identity(phone).await?;
        let email = match &registered {
            Some(target) => {
                if self.email_visible(target, requester).await? {
                    target.email.clone()
                } else {
                    None
                }
            }
            None => None,
        };
        let spam_stats = spam.stats(phone).await?;
        let known = contacts.known_as(phone).await?;

        Ok(NumberDetails {
            phone_number: phone.to_string(),
            is_registered_user: registered.is_some(),
            registered_user: registered.map(|t| RegisteredSummary {
                id: t.id,
                name: t.name,
                email: email.clone(),
            }),
            spam_stats,
            email,
            contacts: known,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contact::ContactInput;
    use crate::db::migrations::setup_migrations;
    use crate::db::spam::SpamReason;
    use crate::db::user::NewUser;

    struct Fixture {
        conn: Arc<Connection>,
        resolver: Resolver,
    }

    impl Fixture {
        async fn new() -> Self {
            let conn = Connection::open_in_memory().await.expect("open in-memory db");
            setup_migrations(&conn).await.expect("migrations");
            let conn = Arc::new(conn);
            let resolver = Resolver::new(Arc::clone(&conn), CacheHandler::new(16));
            Self { conn, resolver }
        }

        async fn user(&self, name: &str, phone: &str, email: Option<&str>) -> User {
            UserRepo::new(Arc::clone(&self.conn))
                .create(NewUser {
                    name: name.to_string(),
                    phone_number: phone.to_string(),
                    email: email.map(|e| e.to_string()),
                    password_hash: "$argon2id$stub".to_string(),
                })
                .await
                .expect("create user")
        }

        async fn contact(&self, owner: &User, name: &str, phone: &str, registered: Option<Uuid>) {
            ContactRepo::new(Arc::clone(&self.conn))
                .insert(
                    owner.id,
                    ContactInput {
                        name: name.to_string(),
                        phone_number: phone.to_string(),
                        email: None,
                    },
                    registered,
                )
                .await
                .expect("insert contact");
        }

        async fn report(&self, reporter: &User, phone: &str) {
            SpamRepo::new(Arc::clone(&self.conn))
                .insert(phone, reporter.id, SpamReason::Scam, None)
                .await
                .expect("insert report");
        }
    }

    #[tokio::test]
    async fn test_phone_search_prefers_registered_identity() {
        let f = Fixture::new().await;
        let alice = f.user("Alice", "+12345678901", Some("alice@example.com")).await;
        let bob = f.user("Bob", "+12345678902", None).await;
        // У Боба Алиса записана — но раз номер зарегистрирован,
        // показываем одну запись-личность, без дублей из книжек
        f.contact(&bob, "Alice W.", "+12345678901", Some(alice.id)).await;

        let results = f
            .resolver
            .search_by_phone(&bob, "+12345678901", 0, 20)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, SearchSource::RegisteredUser);
        assert_eq!(results[0].id, alice.id);
        assert!(results[0].is_registered_user);
    }

    #[tokio::test]
    async fn test_phone_search_falls_back_to_contacts_without_email() {
        let f = Fixture::new().await;
        let bob = f.user("Bob", "+12345678902", None).await;
        let carol = f.user("Carol", "+12345678903", None).await;
        let dave = f.user("Dave", "+12345678904", None).await;

        // Номер не зарегистрирован, записан у Кэрол и Дейва и у самого Боба
        f.contact(&bob, "My plumber", "+15550001111", None).await;
        f.contact(&carol, "Plumber Joe", "+15550001111", None).await;
        f.contact(&dave, "Joe", "+15550001111", None).await;

        let results = f
            .resolver
            .search_by_phone(&bob, "+15550001111", 0, 20)
            .await
            .expect("search");
        // Собственная запись Боба исключена
        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.source, SearchSource::Contact);
            assert!(!r.is_registered_user);
            assert!(r.email.is_none());
        }
    }

    #[tokio::test]
    async fn test_email_visibility_is_one_directional() {
        let f = Fixture::new().await;
        // A записала номер B к себе; обратное неверно
        let a = f.user("Anna", "+12345678901", Some("anna@example.com")).await;
        let b = f.user("Boris", "+12345678902", Some("boris@example.com")).await;
        f.contact(&a, "Boris", "+12345678902", Some(b.id)).await;

        // B ищет номер A: номера B в книжке A... есть! -> email A виден
        let results = f
            .resolver
            .search_by_phone(&b, "+12345678901", 0, 20)
            .await
            .expect("search");
        assert_eq!(results[0].email.as_deref(), Some("anna@example.com"));

        // A ищет номер B: номера A в книжке B нет -> email B скрыт
        let results = f
            .resolver
            .search_by_phone(&a, "+12345678902", 0, 20)
            .await
            .expect("search");
        assert_eq!(results[0].email, None);
    }

    #[tokio::test]
    async fn test_name_search_merges_both_sources_without_dedup() {
        let f = Fixture::new().await;
        let requester = f.user("Requester", "+12345678900", None).await;
        let john = f.user("John Smith", "+12345678901", None).await;
        let keeper = f.user("Keeper", "+12345678902", None).await;
        // Джон записан и у keeper — имя совпадает с зарегистрированным
        f.contact(&keeper, "John Smith", "+12345678901", Some(john.id)).await;

        let results = f
            .resolver
            .search_by_name(&requester, "john", 20)
            .await
            .expect("search");
        // Без дедупликации: один и тот же человек из двух источников
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, SearchSource::RegisteredUser);
        assert_eq!(results[1].source, SearchSource::Contact);
        assert_eq!(results[0].phone_number, results[1].phone_number);
    }

    #[tokio::test]
    async fn test_name_search_caps_each_source_at_half_limit() {
        let f = Fixture::new().await;
        let requester = f.user("Requester", "+12345678900", None).await;
        for i in 0..5 {
            f.user(&format!("Smith {i}"), &format!("+1234567891{i}"), None).await;
        }
        let keeper = f.user("Keeper", "+12345678999", None).await;
        for i in 0..5 {
            f.contact(&keeper, &format!("Smith c{i}"), &format!("+1555000111{i}"), None)
                .await;
        }

        let results = f
            .resolver
            .search_by_name(&requester, "smith", 4)
            .await
            .expect("search");
        assert_eq!(results.len(), 4);
        let registered = results
            .iter()
            .filter(|r| r.source == SearchSource::RegisteredUser)
            .count();
        assert_eq!(registered, 2);
    }

    #[tokio::test]
    async fn test_search_results_carry_likelihood() {
        let f = Fixture::new().await;
        let requester = f.user("Requester", "+12345678900", None).await;
        let target = f.user("Target", "+18005551234", None).await;
        for i in 0..3 {
            let reporter = f.user(&format!("R{i}"), &format!("+1234567891{i}"), None).await;
            f.report(&reporter, "+18005551234").await;
        }
        let _ = target;

        let results = f
            .resolver
            .search_by_phone(&requester, "+18005551234", 0, 20)
            .await
            .expect("search");
        assert_eq!(results[0].spam_likelihood, 50);
    }

    #[tokio::test]
    async fn test_details_disclose_who_saved_the_number() {
        let f = Fixture::new().await;
        let requester = f.user("Requester", "+12345678900", None).await;
        let anna = f.user("Anna", "+12345678901", None).await;
        let boris = f.user("Boris", "+12345678902", None).await;
        f.contact(&anna, "Joe Plumber", "+15550001111", None).await;
        f.contact(&boris, "Плиточник Жора", "+15550001111", None).await;
        f.report(&anna, "+15550001111").await;

        let details = f
            .resolver
            .details(&requester, "+15550001111")
            .await
            .expect("details");
        assert!(!details.is_registered_user);
        assert!(details.registered_user.is_none());
        assert_eq!(details.email, None);
        assert_eq!(details.spam_stats.total_reports, 1);
        assert_eq!(details.spam_stats.spam_likelihood, 25);
        assert_eq!(details.contacts.len(), 2);
        assert_eq!(details.contacts[0].added_by, "Anna");
        assert_eq!(details.contacts[0].name, "Joe Plumber");
    }

    #[tokio::test]
    async fn test_inactive_identity_is_invisible() {
        let f = Fixture::new().await;
        let requester = f.user("Requester", "+12345678900", None).await;
        let ghost = f.user("Ghost", "+12345678901", None).await;

        // Деактивируем напрямую в хранилище
        f.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET is_active = 0 WHERE id = ?1",
                    tokio_rusqlite::params![ghost.id.as_bytes().to_vec()],
                )?;
                Ok(())
            })
            .await
            .expect("deactivate");

        let results = f
            .resolver
            .search_by_phone(&requester, "+12345678901", 0, 20)
            .await
            .expect("search");
        assert!(results.is_empty());
    }
}
