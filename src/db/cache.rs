// src/db/cache.rs

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::db::user::User;

/// Тип кэша "номер -> зарегистрированный пользователь" для горячего
/// пути поиска (каждый результат поиска дергает lookup по номеру)
pub type IdentityCache = LruCache<String, User>;

/// Структура для управления кэшем (можно расширить, если понадобится
/// многоуровневое кэширование)
#[derive(Clone)]
pub struct CacheHandler {
    pub identity_cache: Arc<Mutex<IdentityCache>>,
}

impl CacheHandler {
    /// Создаёт новый кэш с заданной ёмкостью
    pub fn new(capacity: usize) -> Self {
        Self {
            identity_cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity must be nonzero"),
            ))),
        }
    }

    /// Пытается получить пользователя по номеру из кэша
    pub fn get_identity(&self, phone: &str) -> Option<User> {
        let mut cache = self.identity_cache.lock().unwrap();
        cache.get(phone).cloned()
    }

    /// Добавляет или обновляет запись в кэше
    pub fn put_identity(&self, phone: String, user: User) {
        let mut cache = self.identity_cache.lock().unwrap();
        cache.put(phone, user);
    }

    /// Сбрасывает запись после изменения профиля, чтобы резолвер
    /// не отдавал устаревший email/имя
    pub fn invalidate(&self, phone: &str) {
        let mut cache = self.identity_cache.lock().unwrap();
        cache.pop(phone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_user(phone: &str) -> User {
        User {
            id: Uuid::now_v7(),
            name: "Cached User".to_string(),
            phone_number: phone.to_string(),
            email: None,
            password_hash: "$argon2id$stub".to_string(),
            is_active: true,
            last_login_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = CacheHandler::new(4);
        assert!(cache.get_identity("+12345678901").is_none());

        cache.put_identity("+12345678901".to_string(), sample_user("+12345678901"));
        let hit = cache.get_identity("+12345678901").expect("cache hit");
        assert_eq!(hit.phone_number, "+12345678901");

        cache.invalidate("+12345678901");
        assert!(cache.get_identity("+12345678901").is_none());
    }

    #[test]
    fn test_lru_evicts_oldest() {
        let cache = CacheHandler::new(2);
        cache.put_identity("+11111111111".to_string(), sample_user("+11111111111"));
        cache.put_identity("+12222222222".to_string(), sample_user("+12222222222"));
        cache.put_identity("+13333333333".to_string(), sample_user("+13333333333"));

        assert!(cache.get_identity("+11111111111").is_none());
        assert!(cache.get_identity("+13333333333").is_some());
    }
}
