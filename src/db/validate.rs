// src/db/validate.rs
//
// Проверки входных данных. Всё, что не прошло, отсекается здесь
// и до репозиториев не доходит.

use crate::db::error::ServiceError;

fn validation(msg: &str) -> ServiceError {
    ServiceError::Validation(msg.to_string())
}

/// E.164: необязательный '+', первая цифра 1-9, всего 2..=15 цифр.
pub fn validate_phone(phone: &str) -> Result<(), ServiceError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let ok = digits.len() >= 2
        && digits.len() <= 15
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !digits.starts_with('0');
    if ok {
        Ok(())
    } else {
        Err(validation(
            "phone number must be in E.164 format (e.g., +1234567890)",
        ))
    }
}

pub fn validate_user_name(name: &str) -> Result<(), ServiceError> {
    let len = name.chars().count();
    if len < 2 || len > 100 {
        return Err(validation("name must be between 2 and 100 characters"));
    }
    Ok(())
}

pub fn validate_contact_name(name: &str) -> Result<(), ServiceError> {
    let len = name.chars().count();
    if len < 1 || len > 100 {
        return Err(validation("name must be between 1 and 100 characters"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ServiceError> {
    let len = email.chars().count();
    if len < 5 || len > 255 {
        return Err(validation("email must be between 5 and 255 characters"));
    }
    // Без полноценного RFC-парсера: local@domain, в домене есть точка.
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.len() < 3 || !domain.contains('.') {
        return Err(validation("invalid email format"));
    }
    Ok(())
}

/// Минимум 8 символов, хотя бы одна строчная, одна заглавная и одна цифра.
pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < 8 {
        return Err(validation("password must be at least 8 characters long"));
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(validation(
            "password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), ServiceError> {
    if let Some(d) = description {
        if d.chars().count() > 1000 {
            return Err(validation("description must be less than 1000 characters"));
        }
    }
    Ok(())
}

pub fn validate_search_query(q: &str) -> Result<(), ServiceError> {
    let len = q.chars().count();
    if len < 1 || len > 100 {
        return Err(validation(
            "search query must be between 1 and 100 characters",
        ));
    }
    Ok(())
}

pub fn validate_limit(limit: i64) -> Result<(), ServiceError> {
    if limit < 1 || limit > 50 {
        return Err(validation("limit must be between 1 and 50"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_accepts_e164() {
        assert!(validate_phone("+12345678901").is_ok());
        assert!(validate_phone("12345678901").is_ok());
        assert!(validate_phone("+79161234567").is_ok());
    }

    #[test]
    fn test_phone_rejects_garbage() {
        assert!(validate_phone("").is_err());
        assert!(validate_phone("+").is_err());
        assert!(validate_phone("+0123456").is_err()); // ведущий ноль
        assert!(validate_phone("8 (916) 123-45-67").is_err());
        assert!(validate_phone("+1234567890123456").is_err()); // 16 цифр
        assert!(validate_phone("abc").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Passw0rd").is_ok());
        assert!(validate_password("short1A").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("@b.com").is_err());
        assert!(validate_email("ab").is_err());
    }

    #[test]
    fn test_limits() {
        assert!(validate_limit(1).is_ok());
        assert!(validate_limit(50).is_ok());
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(51).is_err());
    }
}
