use crate::config::taxonomy::Taxonomy;
use crate::config::toml_config::SavingsConfig;
use crate::domain::model::{CategoryCounts, Impact, SavingsEstimate};

/// 每則訊息節省的處理時間與人力成本
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsModel {
    pub minutes_per_message: f64,
    pub hourly_rate: f64,
    pub currency: String,
}

impl SavingsModel {
    pub fn from_config(config: &SavingsConfig) -> Self {
        Self {
            minutes_per_message: config.minutes_per_message,
            hourly_rate: config.hourly_rate,
            currency: config.currency.clone(),
        }
    }

    pub fn hours_for(&self, count: usize) -> f64 {
        count as f64 * self.minutes_per_message / 60.0
    }

    pub fn estimate(&self, count: usize) -> SavingsEstimate {
        let hours_per_month = self.hours_for(count);
        let money_per_month = hours_per_month * self.hourly_rate;
        SavingsEstimate {
            hours_per_month,
            money_per_month,
            hours_per_year: hours_per_month * 12.0,
            money_per_year: money_per_month * 12.0,
        }
    }

    pub fn format_hours(&self, hours: f64) -> String {
        format!("{:.1} hours", hours)
    }

    /// 例如 "INR 12,000"
    pub fn format_money(&self, amount: f64) -> String {
        format!("{} {}", self.currency, group_thousands(amount.round() as i64))
    }
}

impl Default for SavingsModel {
    fn default() -> Self {
        Self::from_config(&SavingsConfig::default())
    }
}

pub fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as u32
}

pub fn impact_for(percentage: u32) -> Impact {
    if percentage > 20 {
        Impact::High
    } else if percentage > 10 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

/// 可自動化分類佔總量的百分比，上限 100
pub fn automation_score(counts: &CategoryCounts, taxonomy: &Taxonomy) -> u8 {
    let total = counts.total();
    if total == 0 {
        return 0;
    }
    let automatable: usize = taxonomy
        .automatable
        .iter()
        .map(|label| counts.get(label))
        .sum();
    percentage(automatable, total).min(100) as u8
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
