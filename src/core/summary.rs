use crate::config::taxonomy::Taxonomy;
use crate::core::savings::{automation_score, impact_for, percentage, SavingsModel};
use crate::domain::model::{
    AuditSummary, CategoryCounts, CategoryShare, Impact, Opportunity, RecommendationSource,
    Recommendations,
};
use serde::Serialize;

pub const TOP_OPPORTUNITIES: usize = 5;

/// 由分類結果組出一次稽核的彙整
pub fn build_summary(
    counts: &CategoryCounts,
    taxonomy: &Taxonomy,
    savings: &SavingsModel,
    recommendations: Recommendations,
) -> AuditSummary {
    let total = counts.total();

    let categories = counts
        .sorted_desc()
        .into_iter()
        .map(|(name, count)| CategoryShare {
            name: name.to_string(),
            count,
            percentage: percentage(count, total),
            automation_potential: if taxonomy.is_automatable(name) {
                Impact::High
            } else {
                Impact::Medium
            },
        })
        .collect();

    let top_opportunities = counts
        .most_common(TOP_OPPORTUNITIES)
        .into_iter()
        .map(|(area, count)| {
            let pct = percentage(count, total);
            Opportunity {
                area: area.to_string(),
                count,
                percentage: pct,
                impact: impact_for(pct),
            }
        })
        .collect();

    AuditSummary {
        industry: taxonomy.key.clone(),
        total_messages: total,
        categories,
        top_opportunities,
        savings: savings.estimate(total),
        automation_score: automation_score(counts, taxonomy),
        recommendations: recommendations.items,
        recommendation_source: recommendations.source,
        currency: savings.currency.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityView {
    pub area: String,
    pub count: usize,
    pub potential_saving: String,
    pub impact: &'static str,
}

/// `audit_results` 區塊，金額與時數已格式化成字串
#[derive(Debug, Clone, Serialize)]
pub struct AuditResultsView {
    pub industry: String,
    pub time_saved_monthly: String,
    pub time_saved_annually: String,
    pub cost_reduction_monthly: String,
    pub cost_reduction_annually: String,
    pub automation_score: String,
    pub category_breakdown: CategoryCounts,
    pub top_opportunities: Vec<OpportunityView>,
    pub recommendations: Vec<String>,
    pub recommendation_source: RecommendationSource,
}

impl AuditResultsView {
    pub fn from_summary(summary: &AuditSummary, savings: &SavingsModel) -> Self {
        Self {
            industry: summary.industry.clone(),
            time_saved_monthly: savings.format_hours(summary.savings.hours_per_month),
            time_saved_annually: savings.format_hours(summary.savings.hours_per_year),
            cost_reduction_monthly: savings.format_money(summary.savings.money_per_month),
            cost_reduction_annually: savings.format_money(summary.savings.money_per_year),
            automation_score: format!("{}/100", summary.automation_score),
            category_breakdown: summary
                .categories
                .iter()
                .map(|c| (c.name.clone(), c.count))
                .collect(),
            top_opportunities: summary
                .top_opportunities
                .iter()
                .map(|o| OpportunityView {
                    area: o.area.clone(),
                    count: o.count,
                    potential_saving: format!("{}%", o.percentage),
                    impact: o.impact.as_str(),
                })
                .collect(),
            recommendations: summary.recommendations.clone(),
            recommendation_source: summary.recommendation_source,
        }
    }
}
