//! Fixed-layout PDF report.
//!
//! Rendering happens in two steps. [`ReportRenderer::layout`] turns an
//! [`AuditSummary`] into styled text lines (tables are fixed-width Courier
//! rows), then [`ReportRenderer::render`] paginates those lines onto US-letter
//! pages and writes the document with `lopdf`.

use crate::core::savings::SavingsModel;
use crate::domain::model::AuditSummary;
use crate::utils::error::{AuditError, Result};
use chrono::NaiveDateTime;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 60.0;
const FOOTER_Y: f32 = 30.0;

const PROSE_WIDTH: usize = 92;
const TABLE_RULE_WIDTH: usize = 72;

pub const REPORT_TITLE: &str = "AI AUTOMATION AUDIT";
pub const CATEGORY_TABLE_HEADING: &str = "CATEGORY BREAKDOWN";

pub const NEXT_STEPS: [&str; 5] = [
    "Review this report with your operations and technology teams",
    "Prioritize the top 2-3 opportunities with highest ROI potential",
    "Schedule a consultation to discuss custom agent development",
    "Begin pilot implementation of the highest-impact automation solution",
    "Monitor KPIs (response time, resolution rate, cost per ticket) for 30 days",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Subtitle,
    Heading,
    Body,
    Mono,
    Small,
    Blank,
}

impl LineStyle {
    /// (字型資源名稱, 字級, 行高)
    fn metrics(&self) -> (&'static str, f32, f32) {
        match self {
            LineStyle::Title => ("F2", 22.0, 30.0),
            LineStyle::Subtitle => ("F1", 12.0, 18.0),
            LineStyle::Heading => ("F2", 12.0, 20.0),
            LineStyle::Body => ("F1", 10.0, 13.0),
            LineStyle::Mono => ("F3", 9.0, 12.0),
            LineStyle::Small => ("F1", 8.0, 11.0),
            LineStyle::Blank => ("F1", 10.0, 8.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }

    fn blank() -> Self {
        Self::new(LineStyle::Blank, "")
    }
}

pub struct ReportRenderer {
    savings: SavingsModel,
}

impl ReportRenderer {
    pub fn new(savings: SavingsModel) -> Self {
        Self { savings }
    }

    pub fn layout(&self, summary: &AuditSummary, generated_at: NaiveDateTime) -> Vec<ReportLine> {
        let mut lines = vec![
            ReportLine::new(LineStyle::Title, REPORT_TITLE),
            ReportLine::new(LineStyle::Subtitle, "AI Automation Opportunity Audit Report"),
            ReportLine::new(
                LineStyle::Small,
                format!("Generated on {}", generated_at.format("%B %d, %Y at %I:%M %p")),
            ),
            ReportLine::new(LineStyle::Small, format!("Industry profile: {}", summary.industry)),
            ReportLine::blank(),
        ];

        let annual_hours = self.savings.format_hours(summary.savings.hours_per_year);
        let annual_money = self.savings.format_money(summary.savings.money_per_year);

        lines.push(ReportLine::new(LineStyle::Heading, "EXECUTIVE SUMMARY"));
        let executive = format!(
            "This audit analyzed {} business messages and communications. The analysis found an \
             automation score of {}/100, indicating {} potential for AI-powered automation in your \
             operations. Implementing the recommendations could save approximately {} of manual \
             work and {} annually.",
            summary.total_messages,
            summary.automation_score,
            potential_level(summary.automation_score),
            annual_hours,
            annual_money
        );
        push_wrapped(&mut lines, LineStyle::Body, &executive, "");
        lines.push(ReportLine::blank());

        lines.push(ReportLine::new(LineStyle::Heading, "KEY METRICS"));
        let metrics = [
            ("Messages Analyzed", summary.total_messages.to_string()),
            ("Automation Score", format!("{}/100", summary.automation_score)),
            (
                "Monthly Time Saved",
                self.savings.format_hours(summary.savings.hours_per_month),
            ),
            ("Annual Time Saved", annual_hours),
            (
                "Monthly Cost Savings",
                self.savings.format_money(summary.savings.money_per_month),
            ),
            ("Annual Cost Savings", annual_money),
        ];
        for (label, value) in metrics {
            lines.push(ReportLine::new(
                LineStyle::Mono,
                format!("{:<32}{:>24}", label, value),
            ));
        }
        lines.push(ReportLine::blank());

        if !summary.categories.is_empty() {
            lines.push(ReportLine::new(LineStyle::Heading, CATEGORY_TABLE_HEADING));
            lines.push(ReportLine::new(
                LineStyle::Body,
                "Distribution of analyzed messages by category:",
            ));
            lines.push(ReportLine::new(
                LineStyle::Mono,
                format!(
                    "{:<30} {:>6} {:>11}  {}",
                    "Category", "Count", "Percentage", "Automation Potential"
                ),
            ));
            lines.push(ReportLine::new(LineStyle::Mono, "-".repeat(TABLE_RULE_WIDTH)));
            for share in &summary.categories {
                lines.push(ReportLine::new(
                    LineStyle::Mono,
                    format!(
                        "{:<30} {:>6} {:>11}  {}",
                        share.name,
                        share.count,
                        format!("{}%", share.percentage),
                        share.automation_potential.as_str()
                    ),
                ));
            }
            lines.push(ReportLine::blank());
        }

        if !summary.top_opportunities.is_empty() {
            lines.push(ReportLine::new(LineStyle::Heading, "TOP AUTOMATION OPPORTUNITIES"));
            push_wrapped(
                &mut lines,
                LineStyle::Body,
                "These are the highest-impact areas where AI automation can deliver immediate ROI:",
                "",
            );
            for (i, opportunity) in summary.top_opportunities.iter().enumerate() {
                let text = format!(
                    "{}. {}: {} messages ({}% of total volume) | Impact: {}",
                    i + 1,
                    opportunity.area,
                    opportunity.count,
                    opportunity.percentage,
                    opportunity.impact.as_str()
                );
                push_wrapped(&mut lines, LineStyle::Body, &text, "    ");
            }
            lines.push(ReportLine::blank());
        }

        if !summary.recommendations.is_empty() {
            lines.push(ReportLine::new(LineStyle::Heading, "RECOMMENDATIONS"));
            push_wrapped(
                &mut lines,
                LineStyle::Body,
                "Based on the analysis, here are specific, actionable strategies tailored to your data:",
                "",
            );
            for (i, recommendation) in summary.recommendations.iter().enumerate() {
                let text = format!("{}. {}", i + 1, recommendation);
                push_wrapped(&mut lines, LineStyle::Body, &text, "    ");
            }
            lines.push(ReportLine::blank());
        }

        lines.push(ReportLine::new(LineStyle::Heading, "NEXT STEPS"));
        for (i, step) in NEXT_STEPS.iter().enumerate() {
            push_wrapped(&mut lines, LineStyle::Body, &format!("{}. {}", i + 1, step), "    ");
        }
        lines.push(ReportLine::blank());
        lines.push(ReportLine::blank());

        lines.push(ReportLine::new(
            LineStyle::Small,
            "This report is confidential and prepared exclusively for the recipient organization.",
        ));
        lines.push(ReportLine::new(
            LineStyle::Small,
            "Figures are estimates based on the analyzed sample and the configured handling time and hourly rate.",
        ));

        lines
    }

    /// 依行高分頁；每頁開頭的空行會被略過
    pub fn paginate(&self, lines: Vec<ReportLine>) -> Vec<Vec<ReportLine>> {
        let available = PAGE_HEIGHT - 2.0 * MARGIN;
        let mut pages: Vec<Vec<ReportLine>> = Vec::new();
        let mut current: Vec<ReportLine> = Vec::new();
        let mut used = 0.0;

        for line in lines {
            let (_, _, height) = line.style.metrics();
            if used + height > available && !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                used = 0.0;
            }
            if current.is_empty() && line.style == LineStyle::Blank {
                continue;
            }
            used += height;
            current.push(line);
        }
        if !current.is_empty() || pages.is_empty() {
            pages.push(current);
        }
        pages
    }

    pub fn render(&self, summary: &AuditSummary, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
        let pages = self.paginate(self.layout(summary, generated_at));
        let bytes = write_pdf(&pages)?;
        tracing::info!(
            "📄 Rendered report: {} pages, {} bytes",
            pages.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}

fn potential_level(score: u8) -> &'static str {
    if score > 60 {
        "significant"
    } else if score > 30 {
        "moderate"
    } else {
        "some"
    }
}

fn push_wrapped(lines: &mut Vec<ReportLine>, style: LineStyle, text: &str, indent: &str) {
    for (i, chunk) in wrap(text, PROSE_WIDTH).into_iter().enumerate() {
        let text = if i == 0 { chunk } else { format!("{}{}", indent, chunk) };
        lines.push(ReportLine::new(style, text));
    }
}

/// 以空白斷行；超過寬度的單字自成一行
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Helvetica/Courier 使用 WinAnsiEncoding，無法表示的字元改成 '?'
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            c if (c as u32) < 0x80 => c as u8,
            c if (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

fn font(doc: &mut Document, base_font: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn text_operations(text: &str, font_name: &str, size: f32, x: f32, y: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font_name.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

fn write_pdf(pages: &[Vec<ReportLine>]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let mono = font(&mut doc, "Courier");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => mono,
        },
    });

    let page_count = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(page_count);

    for (index, page) in pages.iter().enumerate() {
        let mut operations = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        for line in page {
            let (font_name, size, height) = line.style.metrics();
            y -= height;
            if line.style == LineStyle::Blank || line.text.is_empty() {
                continue;
            }
            operations.extend(text_operations(&line.text, font_name, size, MARGIN, y));
        }

        let footer = format!("Page {} of {}", index + 1, page_count);
        operations.extend(text_operations(
            &footer,
            "F1",
            8.0,
            PAGE_WIDTH - MARGIN - 50.0,
            FOOTER_Y,
        ));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.0_f32.into(), 0.0_f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| AuditError::ReportError {
        message: format!("Failed to serialize PDF: {}", e),
    })?;
    Ok(buffer)
}
