//! Industry category taxonomies.
//!
//! Each taxonomy is an ordered list of labels ending with the catch-all
//! [`CATCH_ALL`], plus the subset of labels considered automatable for that
//! industry.

use crate::utils::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CATCH_ALL: &str = "Other";
pub const DEFAULT_INDUSTRY: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub key: String,
    pub categories: Vec<String>,
    pub automatable: Vec<String>,
}

impl Taxonomy {
    pub fn new(key: &str, categories: &[&str], automatable: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            automatable: automatable.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.categories.iter().any(|c| c == label)
    }

    pub fn is_automatable(&self, label: &str) -> bool {
        self.automatable.iter().any(|c| c == label)
    }

    pub fn catch_all(&self) -> &str {
        self.categories
            .last()
            .map(String::as_str)
            .unwrap_or(CATCH_ALL)
    }

    pub fn validate(&self) -> Result<()> {
        let field = format!("industries.{}", self.key);
        if self.categories.len() < 2 {
            return Err(AuditError::ConfigValidationError {
                field,
                message: "A taxonomy needs at least one category besides \"Other\"".to_string(),
            });
        }
        if self.catch_all() != CATCH_ALL {
            return Err(AuditError::ConfigValidationError {
                field,
                message: format!("The last category must be \"{}\"", CATCH_ALL),
            });
        }
        for (i, category) in self.categories.iter().enumerate() {
            if category.trim().is_empty() {
                return Err(AuditError::ConfigValidationError {
                    field,
                    message: "Category labels cannot be empty".to_string(),
                });
            }
            // 報表字型只有 WinAnsi，其餘字元會變成 '?'
            if let Some(c) = category.chars().find(|c| !is_latin1_printable(*c)) {
                return Err(AuditError::ConfigValidationError {
                    field,
                    message: format!(
                        "Category \"{}\" contains {:?}, which the PDF report cannot render",
                        category, c
                    ),
                });
            }
            if self.categories[..i].contains(category) {
                return Err(AuditError::ConfigValidationError {
                    field,
                    message: format!("Duplicate category \"{}\"", category),
                });
            }
        }
        if let Some(unknown) = self.automatable.iter().find(|a| !self.contains(a)) {
            return Err(AuditError::ConfigValidationError {
                field,
                message: format!("Automatable label \"{}\" is not one of the categories", unknown),
            });
        }
        Ok(())
    }
}

fn is_latin1_printable(c: char) -> bool {
    matches!(c as u32, 0x20..=0x7E | 0xA0..=0xFF)
}

#[derive(Debug, Clone)]
pub struct TaxonomyRegistry {
    taxonomies: BTreeMap<String, Taxonomy>,
    default_key: String,
}

impl TaxonomyRegistry {
    pub fn builtin() -> Self {
        let taxonomies = builtin_taxonomies()
            .into_iter()
            .map(|t| (t.key.clone(), t))
            .collect();
        Self {
            taxonomies,
            default_key: DEFAULT_INDUSTRY.to_string(),
        }
    }

    /// 以設定檔的產業定義覆蓋或新增內建分類
    pub fn with_overrides<I>(mut self, overrides: I, default_key: &str) -> Result<Self>
    where
        I: IntoIterator<Item = Taxonomy>,
    {
        for taxonomy in overrides {
            taxonomy.validate()?;
            self.taxonomies.insert(taxonomy.key.clone(), taxonomy);
        }
        let default_key = default_key.trim().to_lowercase();
        if !self.taxonomies.contains_key(&default_key) {
            return Err(AuditError::InvalidConfigValueError {
                field: "default_industry".to_string(),
                value: default_key,
                reason: "No taxonomy is defined for this industry".to_string(),
            });
        }
        self.default_key = default_key;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Taxonomy> {
        self.taxonomies.get(key)
    }

    pub fn default_taxonomy(&self) -> &Taxonomy {
        // default_key 在建構時已確認存在
        &self.taxonomies[&self.default_key]
    }

    /// 依產業選擇器取得分類；未知或空白時退回預設分類
    pub fn resolve(&self, industry: Option<&str>) -> &Taxonomy {
        industry
            .map(|s| s.trim().to_lowercase())
            .and_then(|key| self.taxonomies.get(&key))
            .unwrap_or_else(|| self.default_taxonomy())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.taxonomies.keys().map(String::as_str).collect()
    }
}

impl Default for TaxonomyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_taxonomies() -> Vec<Taxonomy> {
    vec![
        Taxonomy::new(
            "general",
            &[
                "Order Status",
                "Refund/Return",
                "Payment Issue",
                "Billing Inquiry",
                "Technical Support",
                "Account Access",
                "Shipping/Delivery",
                "Sales Lead",
                "Vendor Communication",
                "HR/Admin",
                "Feedback/Complaint",
                CATCH_ALL,
            ],
            &[
                "Order Status",
                "Refund/Return",
                "Payment Issue",
                "Billing Inquiry",
                "Technical Support",
                "Account Access",
                "Shipping/Delivery",
            ],
        ),
        Taxonomy::new(
            "ecommerce",
            &[
                "Order Status",
                "Shipping/Delivery",
                "Refund/Return",
                "Payment Issue",
                "Product Inquiry",
                "Discount/Promotion",
                "Account Access",
                "Feedback/Complaint",
                CATCH_ALL,
            ],
            &[
                "Order Status",
                "Shipping/Delivery",
                "Refund/Return",
                "Payment Issue",
                "Product Inquiry",
                "Account Access",
            ],
        ),
        Taxonomy::new(
            "saas",
            &[
                "Technical Support",
                "Bug Report",
                "Billing Inquiry",
                "Account Access",
                "Feature Request",
                "Onboarding",
                "Cancellation",
                "Sales Lead",
                CATCH_ALL,
            ],
            &[
                "Technical Support",
                "Billing Inquiry",
                "Account Access",
                "Onboarding",
            ],
        ),
        Taxonomy::new(
            "hr",
            &[
                "Leave Request",
                "Payroll Query",
                "Access/Permissions",
                "Software Issue",
                "Onboarding",
                "Policy Question",
                "Recruitment",
                CATCH_ALL,
            ],
            &[
                "Leave Request",
                "Payroll Query",
                "Access/Permissions",
                "Software Issue",
                "Policy Question",
            ],
        ),
        Taxonomy::new(
            "healthcare",
            &[
                "Appointment Scheduling",
                "Prescription Refill",
                "Billing Inquiry",
                "Insurance Query",
                "Test Results",
                "Medical Records",
                CATCH_ALL,
            ],
            &[
                "Appointment Scheduling",
                "Prescription Refill",
                "Billing Inquiry",
                "Insurance Query",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_taxonomies_are_valid() {
        let registry = TaxonomyRegistry::builtin();
        for key in registry.keys() {
            let taxonomy = registry.get(key).unwrap();
            taxonomy.validate().unwrap();
            assert_eq!(taxonomy.catch_all(), CATCH_ALL);
        }
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let registry = TaxonomyRegistry::builtin();
        assert_eq!(registry.resolve(Some("ecommerce")).key, "ecommerce");
        assert_eq!(registry.resolve(Some("  SaaS ")).key, "saas");
        assert_eq!(registry.resolve(Some("aerospace")).key, "general");
        assert_eq!(registry.resolve(None).key, "general");
    }

    #[test]
    fn test_override_must_end_with_other() {
        let bad = Taxonomy::new("legal", &["Contract Review", "Billing Inquiry"], &[]);
        let result = TaxonomyRegistry::builtin().with_overrides(vec![bad], "general");
        assert!(result.is_err());
    }

    #[test]
    fn test_override_rejects_unknown_automatable_label() {
        let bad = Taxonomy::new("legal", &["Contract Review", CATCH_ALL], &["Order Status"]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_override_rejects_labels_outside_latin1() {
        let bad = Taxonomy::new("retail", &["配送查詢", CATCH_ALL], &[]);
        assert!(bad.validate().is_err());

        let accented = Taxonomy::new("cafe", &["Café Booking", CATCH_ALL], &["Café Booking"]);
        accented.validate().unwrap();
    }

    #[test]
    fn test_override_can_change_default() {
        let legal = Taxonomy::new(
            "legal",
            &["Contract Review", "Case Update", CATCH_ALL],
            &["Case Update"],
        );
        let registry = TaxonomyRegistry::builtin()
            .with_overrides(vec![legal], "legal")
            .unwrap();
        assert_eq!(registry.resolve(Some("unknown")).key, "legal");
        assert!(registry.resolve(None).is_automatable("Case Update"));
    }
}
