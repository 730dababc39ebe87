// src/db/scoring.rs
//
// Чистая шкала "сколько жалоб -> насколько похоже на спам".
// Ступени грубые намеренно (заглушка под будущую модель), но пороги
// зафиксированы: на них завязаны сохранённые ожидания и тесты.

use serde::{Deserialize, Serialize};

/// Вероятность спама в процентах по числу НЕзакрытых жалоб.
pub fn likelihood(unresolved_reports: u64) -> u8 {
    match unresolved_reports {
        0 => 0,
        1..=2 => 25,
        3..=5 => 50,
        6..=10 => 75,
        _ => 100,
    }
}

/// Номер считается спамом начиная с этого порога вероятности.
pub const SPAM_THRESHOLD: u8 = 75;

pub fn is_spam(likelihood: u8) -> bool {
    likelihood >= SPAM_THRESHOLD
}

/// Качественная ступень риска, производная от вероятности.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskTier {
    pub fn from_likelihood(likelihood: u8) -> Self {
        match likelihood {
            0 => RiskTier::Safe,
            1..=25 => RiskTier::Low,
            26..=50 => RiskTier::Medium,
            51..=75 => RiskTier::High,
            _ => RiskTier::VeryHigh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::VeryHigh => "very_high",
        }
    }
}
