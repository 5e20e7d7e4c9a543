//! Batched message classification against an industry taxonomy.
//!
//! Every fragment ends up contributing exactly one count: via the batch
//! response, via a single-item fallback call, or via the catch-all bucket when
//! the batch request itself fails.

use crate::config::taxonomy::{Taxonomy, TaxonomyRegistry, CATCH_ALL};
use crate::config::toml_config::AuditConfig;
use crate::core::lenient::{lenient_decode, lenient_decode_list};
use crate::domain::model::{
    BatchReport, CategoryCounts, ClassificationOutcome, ClassificationTier, CompletionRequest,
};
use crate::domain::ports::CompletionClient;
use serde_json::Value;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a business operations expert. You classify business \
messages (emails, support tickets, chats, form submissions) into exactly one category each. \
Always answer in the exact format requested.";

const SINGLE_ITEM_MAX_TOKENS: u32 = 20;

/// (message, category) pairs used as few-shot examples when the category
/// exists in the active taxonomy.
const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    ("Hi, where is my order #4521? It was supposed to arrive yesterday.", "Order Status"),
    ("I was charged twice for the same invoice this month.", "Payment Issue"),
    ("The package tracking hasn't updated in five days.", "Shipping/Delivery"),
    ("I can't log in, the password reset link never arrives.", "Account Access"),
    ("I'd like to return these shoes, they are the wrong size.", "Refund/Return"),
    ("The export button crashes the app every time I click it.", "Bug Report"),
    ("Can I take leave from 12th to 15th next month?", "Leave Request"),
    ("I need to reschedule my appointment with Dr. Rao.", "Appointment Scheduling"),
    ("We are interested in a quote for 50 seats of your product.", "Sales Lead"),
];

const GENERIC_EXAMPLE: (&str, &str) = ("Thanks for the update, have a great weekend!", CATCH_ALL);

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub batch_size: usize,
    pub max_fragments: usize,
    pub max_fragment_chars: usize,
    pub max_tokens: u32,
}

impl ClassifierSettings {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            batch_size: config.classifier.batch_size.max(1),
            max_fragments: config.classifier.max_fragments,
            max_fragment_chars: config.classifier.max_fragment_chars,
            max_tokens: config.llm.classify_max_tokens,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self::from_config(&AuditConfig::default())
    }
}

pub struct BatchClassifier {
    client: Arc<dyn CompletionClient>,
    taxonomies: Arc<TaxonomyRegistry>,
    settings: ClassifierSettings,
}

impl BatchClassifier {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        taxonomies: Arc<TaxonomyRegistry>,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            client,
            taxonomies,
            settings,
        }
    }

    pub fn taxonomies(&self) -> &TaxonomyRegistry {
        &self.taxonomies
    }

    pub async fn classify(&self, fragments: &[String], industry: Option<&str>) -> ClassificationOutcome {
        let taxonomy = self.taxonomies.resolve(industry);

        let cleaned: Vec<&str> = fragments
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .take(self.settings.max_fragments)
            .collect();

        let mut counts = CategoryCounts::new();
        if cleaned.is_empty() {
            tracing::warn!("📝 No non-empty messages to classify, defaulting to a single \"Other\"");
            counts.increment(taxonomy.catch_all());
            return ClassificationOutcome {
                counts,
                batches: Vec::new(),
            };
        }

        let batch_count = cleaned.len().div_ceil(self.settings.batch_size);
        tracing::info!(
            "🤖 Classifying {} messages in {} batches (industry: {})",
            cleaned.len(),
            batch_count,
            taxonomy.key
        );

        let mut batches = Vec::with_capacity(batch_count);
        for (index, batch) in cleaned.chunks(self.settings.batch_size).enumerate() {
            let report = self.classify_batch(index, batch, taxonomy, &mut counts).await;
            tracing::debug!(
                "Batch {}/{}: {} messages via {:?} ({} single-item fallbacks)",
                index + 1,
                batch_count,
                report.size,
                report.tier,
                report.fallback_items
            );
            batches.push(report);
        }

        ClassificationOutcome { counts, batches }
    }

    async fn classify_batch(
        &self,
        index: usize,
        batch: &[&str],
        taxonomy: &Taxonomy,
        counts: &mut CategoryCounts,
    ) -> BatchReport {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_batch_prompt(batch, taxonomy, self.settings.max_fragment_chars),
            max_tokens: self.settings.max_tokens,
        };

        let raw = match self.client.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Batch {} request failed, counting {} messages as \"{}\": {}",
                    index + 1,
                    batch.len(),
                    taxonomy.catch_all(),
                    e
                );
                counts.add(taxonomy.catch_all(), batch.len());
                return BatchReport {
                    index,
                    size: batch.len(),
                    tier: ClassificationTier::DefaultBucket,
                    fallback_items: 0,
                };
            }
        };

        let assigned = match lenient_decode_list(&raw) {
            Ok(decoded) => assign_items(&decoded.items, batch.len()),
            Err(e) => {
                tracing::warn!("⚠️ Batch {} response unusable ({}), classifying one by one", index + 1, e);
                vec![None; batch.len()]
            }
        };

        if assigned.iter().all(Option::is_none) {
            for fragment in batch {
                let label = self.classify_single(fragment, taxonomy).await;
                counts.increment(label);
            }
            return BatchReport {
                index,
                size: batch.len(),
                tier: ClassificationTier::PerItemFallback,
                fallback_items: batch.len(),
            };
        }

        let mut fallback_items = 0;
        for (fragment, label) in batch.iter().zip(assigned) {
            let resolved = match label {
                Some(label) => resolve_category(&label, taxonomy),
                None => {
                    fallback_items += 1;
                    self.classify_single(fragment, taxonomy).await
                }
            };
            counts.increment(resolved);
        }

        BatchReport {
            index,
            size: batch.len(),
            tier: ClassificationTier::BatchSuccess,
            fallback_items,
        }
    }

    async fn classify_single<'t>(&self, fragment: &str, taxonomy: &'t Taxonomy) -> &'t str {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_single_prompt(fragment, taxonomy, self.settings.max_fragment_chars),
            max_tokens: SINGLE_ITEM_MAX_TOKENS,
        };

        match self.client.complete(&request).await {
            Ok(raw) => resolve_category(&single_label(&raw), taxonomy),
            Err(e) => {
                tracing::debug!("Single-item classification failed: {}", e);
                taxonomy.catch_all()
            }
        }
    }
}

/// 將模型回傳的項目對應到批次中的位置（優先用 index，否則依順序）
fn assign_items(items: &[Value], batch_len: usize) -> Vec<Option<String>> {
    let mut assigned: Vec<Option<String>> = vec![None; batch_len];

    for (position, item) in items.iter().enumerate() {
        let Some(label) = item_label(item) else {
            continue;
        };
        let slot = match item.get("index").and_then(index_value) {
            Some(i) if (1..=batch_len).contains(&i) => i - 1,
            Some(_) => continue,
            None if position < batch_len => position,
            None => continue,
        };
        if assigned[slot].is_none() {
            assigned[slot] = Some(label);
        }
    }

    assigned
}

fn index_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn item_label(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("category")
            .or_else(|| map.get("label"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// 單筆回覆可能是純文字，也可能是 {"category": "..."}
fn single_label(raw: &str) -> String {
    if let Ok((value, _)) = lenient_decode(raw) {
        if let Some(label) = item_label(&value) {
            return label;
        }
    }
    raw.lines().next().unwrap_or_default().to_string()
}

/// 將模型給的標籤對應到分類：完全相符 → 不分大小寫相符 → 子字串 → "Other"
pub fn resolve_category<'t>(label: &str, taxonomy: &'t Taxonomy) -> &'t str {
    let cleaned = label
        .trim()
        .trim_start_matches("Category:")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*' || c == '`')
        .trim();
    if cleaned.is_empty() {
        return taxonomy.catch_all();
    }

    if let Some(exact) = taxonomy.categories.iter().find(|c| c.as_str() == cleaned) {
        return exact;
    }

    let lower = cleaned.to_lowercase();
    let found = taxonomy
        .categories
        .iter()
        .find(|c| c.to_lowercase() == lower)
        .or_else(|| {
            taxonomy
                .categories
                .iter()
                .find(|c| lower.contains(&c.to_lowercase()))
        });

    match found {
        Some(category) => category,
        None => taxonomy.catch_all(),
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn one_line(text: &str, max_chars: usize) -> String {
    truncate_chars(text, max_chars)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn category_list(taxonomy: &Taxonomy) -> String {
    taxonomy
        .categories
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

fn few_shot_block(taxonomy: &Taxonomy) -> String {
    let mut examples: Vec<(&str, &str)> = FEW_SHOT_EXAMPLES
        .iter()
        .copied()
        .filter(|(_, category)| taxonomy.contains(category))
        .take(3)
        .collect();
    examples.push(GENERIC_EXAMPLE);

    examples
        .iter()
        .map(|(message, category)| format!("Message: \"{}\"\nCategory: {}", message, category))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_batch_prompt(batch: &[&str], taxonomy: &Taxonomy, max_chars: usize) -> String {
    let numbered = batch
        .iter()
        .enumerate()
        .map(|(i, fragment)| format!("{}. {}", i + 1, one_line(fragment, max_chars)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Classify each message below into exactly ONE of these categories:\n{}\n\n\
         Examples:\n{}\n\n\
         Messages:\n{}\n\n\
         Respond with a JSON array containing one object per message, in this format:\n\
         [{{\"index\": 1, \"category\": \"<category name>\", \"confidence\": 0.95}}]\n\
         Use the category names exactly as listed. Do not add any text outside the JSON array.",
        category_list(taxonomy),
        few_shot_block(taxonomy),
        numbered
    )
}

pub fn build_single_prompt(fragment: &str, taxonomy: &Taxonomy, max_chars: usize) -> String {
    format!(
        "Classify this business message into exactly ONE of these categories:\n{}\n\n\
         Message:\n{}\n\n\
         Reply with the category name only.",
        category_list(taxonomy),
        one_line(fragment, max_chars)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{AuditError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockClient<F> {
        respond: F,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl<F> MockClient<F>
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync,
    {
        fn new(respond: F) -> Arc<Self> {
            Arc::new(Self {
                respond,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<F> CompletionClient for MockClient<F>
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync,
    {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.user.clone());
            (self.respond)(request)
        }
    }

    fn is_batch(request: &CompletionRequest) -> bool {
        request.user.contains("Messages:\n")
    }

    /// 依據編號訊息的內容產生批次回覆
    fn numbered_messages(request: &CompletionRequest) -> Vec<(usize, String)> {
        request
            .user
            .lines()
            .filter_map(|line| {
                let (num, text) = line.split_once(". ")?;
                Some((num.parse().ok()?, text.to_string()))
            })
            .collect()
    }

    fn keyword_batch_response(request: &CompletionRequest) -> String {
        let items: Vec<Value> = numbered_messages(request)
            .into_iter()
            .map(|(i, text)| {
                let category = if text.contains("order") { "Order Status" } else { "Other" };
                serde_json::json!({"index": i, "category": category, "confidence": 0.9})
            })
            .collect();
        serde_json::to_string(&items).unwrap()
    }

    fn classifier(client: Arc<dyn CompletionClient>) -> BatchClassifier {
        BatchClassifier::new(
            client,
            Arc::new(TaxonomyRegistry::builtin()),
            ClassifierSettings::default(),
        )
    }

    fn fragments(n: usize, text: &str) -> Vec<String> {
        (0..n).map(|i| format!("{} {}", text, i)).collect()
    }

    #[tokio::test]
    async fn test_empty_input_counts_single_other() {
        let client = MockClient::new(|_: &CompletionRequest| Ok("[]".to_string()));
        let outcome = classifier(client.clone())
            .classify(&["   ".to_string(), "\n".to_string()], Some("general"))
            .await;

        assert_eq!(outcome.counts, vec![("Other".to_string(), 1)].into_iter().collect());
        assert!(outcome.batches.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_batches_of_ten_and_automation_example() {
        let client = MockClient::new(|req: &CompletionRequest| Ok(keyword_batch_response(req)));
        let mut input = fragments(10, "where is my order");
        input.extend(fragments(15, "thanks for the newsletter"));

        let outcome = classifier(client.clone()).classify(&input, Some("general")).await;

        assert_eq!(outcome.batches.len(), 3);
        assert_eq!(outcome.tier_count(ClassificationTier::BatchSuccess), 3);
        assert_eq!(outcome.counts.get("Order Status"), 10);
        assert_eq!(outcome.counts.get("Other"), 15);
        assert_eq!(outcome.counts.total(), 25);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_unparsable_batch_falls_back_per_item() {
        let client = MockClient::new(|req: &CompletionRequest| {
            if is_batch(req) {
                Ok("Sorry, I can only classify one message at a time.".to_string())
            } else {
                Ok("order status".to_string())
            }
        });
        let input = fragments(7, "where is my order");

        let outcome = classifier(client.clone()).classify(&input, None).await;

        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].tier, ClassificationTier::PerItemFallback);
        assert_eq!(outcome.counts.get("Order Status"), 7);
        assert_eq!(outcome.counts.total(), 7);
        assert_eq!(client.calls(), 1 + 7);
    }

    #[tokio::test]
    async fn test_request_failure_uses_default_bucket() {
        let client = MockClient::new(|_: &CompletionRequest| {
            Err(AuditError::CompletionError {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let input = fragments(12, "where is my order");

        let outcome = classifier(client.clone()).classify(&input, Some("ecommerce")).await;

        assert_eq!(outcome.tier_count(ClassificationTier::DefaultBucket), 2);
        assert_eq!(outcome.counts.get("Other"), 12);
        assert_eq!(outcome.counts.len(), 1);
        // 批次失敗時不再逐筆呼叫
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_item_failures_count_as_other() {
        let client = MockClient::new(|req: &CompletionRequest| {
            if is_batch(req) {
                Ok("not json".to_string())
            } else {
                Err(AuditError::CompletionError {
                    status: 500,
                    message: "boom".to_string(),
                })
            }
        });
        let outcome = classifier(client).classify(&fragments(3, "hello"), None).await;
        assert_eq!(outcome.counts.get("Other"), 3);
        assert_eq!(outcome.batches[0].tier, ClassificationTier::PerItemFallback);
    }

    #[tokio::test]
    async fn test_unknown_labels_are_coerced_to_other() {
        let client = MockClient::new(|req: &CompletionRequest| {
            let items: Vec<Value> = numbered_messages(req)
                .into_iter()
                .map(|(i, _)| {
                    let category = match i % 3 {
                        0 => "Alien Abduction",
                        1 => "refund/return",
                        _ => "Category: Payment Issue",
                    };
                    serde_json::json!({"index": i, "category": category})
                })
                .collect();
            Ok(format!("```json\n{}\n```", serde_json::to_string(&items).unwrap()))
        });

        let outcome = classifier(client).classify(&fragments(9, "msg"), Some("general")).await;
        let taxonomy = TaxonomyRegistry::builtin();
        let general = taxonomy.resolve(Some("general"));

        assert_eq!(outcome.counts.get("Refund/Return"), 3);
        assert_eq!(outcome.counts.get("Payment Issue"), 3);
        assert_eq!(outcome.counts.get("Other"), 3);
        assert!(outcome.counts.labels().all(|label| general.contains(label)));
    }

    #[tokio::test]
    async fn test_nested_list_response_is_accepted() {
        let client = MockClient::new(|req: &CompletionRequest| {
            let items = keyword_batch_response(req);
            Ok(format!("{{\"classifications\": {}}}", items))
        });
        let outcome = classifier(client).classify(&fragments(4, "my order"), None).await;
        assert_eq!(outcome.batches[0].tier, ClassificationTier::BatchSuccess);
        assert_eq!(outcome.counts.get("Order Status"), 4);
    }

    #[tokio::test]
    async fn test_missing_items_are_classified_individually() {
        let client = MockClient::new(|req: &CompletionRequest| {
            if is_batch(req) {
                Ok(r#"[{"index": 1, "category": "Order Status"}, {"index": 1, "category": "Other"}, {"index": 99, "category": "Other"}]"#.to_string())
            } else {
                Ok("Billing Inquiry".to_string())
            }
        });
        let outcome = classifier(client.clone()).classify(&fragments(3, "x"), None).await;

        assert_eq!(outcome.batches[0].tier, ClassificationTier::BatchSuccess);
        assert_eq!(outcome.batches[0].fallback_items, 2);
        assert_eq!(outcome.counts.get("Order Status"), 1);
        assert_eq!(outcome.counts.get("Billing Inquiry"), 2);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_input_is_capped_at_max_fragments() {
        let client = MockClient::new(|req: &CompletionRequest| Ok(keyword_batch_response(req)));
        let mut input = fragments(250, "order");
        input.insert(0, "   ".to_string());

        let outcome = classifier(client.clone()).classify(&input, None).await;

        assert_eq!(outcome.counts.total(), 200);
        assert_eq!(outcome.batches.len(), 20);
        assert_eq!(client.calls(), 20);
    }

    #[tokio::test]
    async fn test_long_fragments_are_truncated_in_prompt() {
        let client = MockClient::new(|req: &CompletionRequest| Ok(keyword_batch_response(req)));
        let long = format!("{}{}", "a".repeat(500), "TAILMARKER");

        classifier(client.clone()).classify(&[long], None).await;

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&"a".repeat(500)));
        assert!(!prompts[0].contains("TAILMARKER"));
    }

    #[test]
    fn test_resolve_category_rules() {
        let registry = TaxonomyRegistry::builtin();
        let general = registry.resolve(Some("general"));

        assert_eq!(resolve_category("Order Status", general), "Order Status");
        assert_eq!(resolve_category("ORDER STATUS", general), "Order Status");
        assert_eq!(resolve_category("\"Billing Inquiry\".", general), "Billing Inquiry");
        assert_eq!(resolve_category("This is a Technical Support issue", general), "Technical Support");
        // 只比對「標籤包含分類名」，反方向不算
        assert_eq!(resolve_category("Refund", general), "Other");
        assert_eq!(resolve_category("Weather", general), "Other");
        assert_eq!(resolve_category("", general), "Other");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_batch_prompt_lists_taxonomy_and_examples() {
        let registry = TaxonomyRegistry::builtin();
        let hr = registry.resolve(Some("hr"));
        let prompt = build_batch_prompt(&["line one\nline two"], hr, 500);

        assert!(prompt.contains("- Leave Request"));
        assert!(prompt.contains("- Other"));
        assert!(prompt.contains("Category: Leave Request"));
        assert!(!prompt.contains("Category: Order Status"));
        assert!(prompt.contains("1. line one line two"));
        assert!(prompt.contains("\"confidence\""));
    }
}
