use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 每個分類標籤的出現次數
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryCounts(BTreeMap<String, usize>);

impl CategoryCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, label: &str) {
        self.add(label, 1);
    }

    pub fn add(&mut self, label: &str, n: usize) {
        if n == 0 {
            return;
        }
        *self.0.entry(label.to_string()).or_insert(0) += n;
    }

    pub fn get(&self, label: &str) -> usize {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// 依次數由大到小排序，次數相同時依名稱排序以保持輸出穩定
    pub fn sorted_desc(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> =
            self.0.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn most_common(&self, n: usize) -> Vec<(&str, usize)> {
        let mut entries = self.sorted_desc();
        entries.truncate(n);
        entries
    }
}

impl FromIterator<(String, usize)> for CategoryCounts {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        let mut counts = CategoryCounts::new();
        for (label, n) in iter {
            counts.add(&label, n);
        }
        counts
    }
}

/// Which fallback tier produced a batch's counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    BatchSuccess,
    PerItemFallback,
    DefaultBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
    pub tier: ClassificationTier,
    /// 批次成功但模型漏掉的項目，改以單筆分類補上
    pub fallback_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub counts: CategoryCounts,
    pub batches: Vec<BatchReport>,
}

impl ClassificationOutcome {
    pub fn tier_count(&self, tier: ClassificationTier) -> usize {
        self.batches.iter().filter(|b| b.tier == tier).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    AiGenerated,
    Templated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub items: Vec<String>,
    pub source: RecommendationSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavingsEstimate {
    pub hours_per_month: f64,
    pub money_per_month: f64,
    pub hours_per_year: f64,
    pub money_per_year: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::High => "High",
            Impact::Medium => "Medium",
            Impact::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub count: usize,
    pub percentage: u32,
    pub automation_potential: Impact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub area: String,
    pub count: usize,
    pub percentage: u32,
    pub impact: Impact,
}

/// 一次稽核請求的彙整結果，建立後不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub industry: String,
    pub total_messages: usize,
    pub categories: Vec<CategoryShare>,
    pub top_opportunities: Vec<Opportunity>,
    pub savings: SavingsEstimate,
    pub automation_score: u8,
    pub recommendations: Vec<String>,
    pub recommendation_source: RecommendationSource,
    pub currency: String,
}

/// 上傳後暫存在磁碟上的檔案
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub stored_path: PathBuf,
    pub content_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_extracted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}
