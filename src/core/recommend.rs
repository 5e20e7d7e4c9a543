//! Turns category counts into short, actionable automation recommendations.

use crate::config::taxonomy::Taxonomy;
use crate::core::lenient::lenient_decode_list;
use crate::core::savings::{percentage, SavingsModel};
use crate::domain::model::{CategoryCounts, CompletionRequest, RecommendationSource, Recommendations};
use crate::domain::ports::CompletionClient;
use crate::utils::error::{AuditError, Result};
use serde_json::Value;
use std::sync::Arc;

pub const MAX_RECOMMENDATIONS: usize = 7;
const TOP_CATEGORIES: usize = 5;
const TEMPLATE_MIN_PERCENT: u32 = 5;
const TEMPLATE_HOURS_PERCENT: u32 = 15;

const SYSTEM_PROMPT: &str = "You are an AI automation consultant. You give specific, \
actionable recommendations for automating business communication workflows.";

const GENERIC_RECOMMENDATION: &str = "Message volume is spread across many categories. \
Start with an AI triage agent that tags and routes incoming messages to the right team.";

pub struct RecommendationGenerator {
    client: Arc<dyn CompletionClient>,
    savings: SavingsModel,
    max_tokens: u32,
}

impl RecommendationGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, savings: SavingsModel, max_tokens: u32) -> Self {
        Self {
            client,
            savings,
            max_tokens,
        }
    }

    pub async fn recommend(
        &self,
        counts: &CategoryCounts,
        total: usize,
        taxonomy: &Taxonomy,
    ) -> Recommendations {
        if total == 0 || counts.is_empty() {
            return self.templated(counts, total);
        }

        match self.ai_recommendations(counts, total, taxonomy).await {
            Ok(items) => {
                tracing::info!("💡 Generated {} AI recommendations", items.len());
                Recommendations {
                    items,
                    source: RecommendationSource::AiGenerated,
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ AI recommendations unavailable, using templates: {}", e);
                self.templated(counts, total)
            }
        }
    }

    async fn ai_recommendations(
        &self,
        counts: &CategoryCounts,
        total: usize,
        taxonomy: &Taxonomy,
    ) -> Result<Vec<String>> {
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(counts, total, taxonomy),
            max_tokens: self.max_tokens,
        };

        let raw = self.client.complete(&request).await?;
        let decoded = lenient_decode_list(&raw)?;

        let items: Vec<String> = decoded
            .items
            .iter()
            .filter_map(recommendation_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_RECOMMENDATIONS)
            .collect();

        if items.is_empty() {
            return Err(AuditError::DecodeError {
                message: "model returned an empty recommendation list".to_string(),
            });
        }
        Ok(items)
    }

    /// 依百分比門檻產生固定句型的建議
    pub fn templated(&self, counts: &CategoryCounts, total: usize) -> Recommendations {
        let mut items = Vec::new();

        for (category, count) in counts.most_common(TOP_CATEGORIES) {
            let pct = percentage(count, total);
            if pct <= TEMPLATE_MIN_PERCENT {
                continue;
            }
            let mut sentence = format!(
                "Automate \"{}\" handling ({}% of messages) with an AI agent that drafts replies and routes exceptions to your team.",
                category, pct
            );
            if pct > TEMPLATE_HOURS_PERCENT {
                sentence.push_str(&format!(
                    " Estimated saving: {:.1} hours per month.",
                    self.savings.hours_for(count)
                ));
            }
            items.push(sentence);
        }

        if items.is_empty() {
            items.push(GENERIC_RECOMMENDATION.to_string());
        }
        items.truncate(MAX_RECOMMENDATIONS);

        Recommendations {
            items,
            source: RecommendationSource::Templated,
        }
    }
}

fn recommendation_text(item: &Value) -> Option<&str> {
    match item {
        Value::String(s) => Some(s),
        Value::Object(map) => ["recommendation", "text", "action"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }
}

fn build_prompt(counts: &CategoryCounts, total: usize, taxonomy: &Taxonomy) -> String {
    let breakdown = counts
        .most_common(TOP_CATEGORIES)
        .into_iter()
        .map(|(category, count)| {
            format!(
                "- {}: {} messages ({}%)",
                category,
                count,
                percentage(count, total)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Industry: {}\nTotal messages analyzed: {}\n\nTop categories by volume:\n{}\n\n\
         Give up to {} specific, actionable recommendations for automating these workflows \
         with AI agents. Each recommendation should be one or two sentences.\n\
         Respond with a JSON array of strings only, for example:\n\
         [\"Deploy an order-tracking agent that answers status questions automatically.\"]",
        taxonomy.key, total, breakdown, MAX_RECOMMENDATIONS
    )
}
