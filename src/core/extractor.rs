//! Turns an uploaded file into an ordered list of text fragments.

use crate::utils::error::{AuditError, Result};
use calamine::{open_workbook_auto, Reader};
use image::ImageDecoder;
use std::path::Path;

/// 表頭含有這些字的欄位視為訊息內容
const TEXT_COLUMN_KEYWORDS: &[&str] = &[
    "message",
    "subject",
    "description",
    "body",
    "text",
    "content",
    "comment",
    "note",
    "query",
    "issue",
    "feedback",
    "email",
    "ticket",
    "request",
    "complaint",
    "summary",
    "details",
];

const SAMPLE_ROWS: usize = 20;
const MIN_TEXT_CHARS: usize = 10;
const FIELD_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
    Pdf,
    Text,
    Email,
    Image,
    Unsupported,
}

impl FileKind {
    /// 副檔名可帶或不帶前導點，大小寫不拘
    pub fn from_extension(extension: &str) -> Self {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => FileKind::Csv,
            "xlsx" | "xls" => FileKind::Spreadsheet,
            "pdf" => FileKind::Pdf,
            "txt" => FileKind::Text,
            "eml" => FileKind::Email,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" => FileKind::Image,
            _ => FileKind::Unsupported,
        }
    }
}

pub struct ContentExtractor;

impl ContentExtractor {
    /// 失敗時記錄警告並回傳空清單
    pub fn extract(path: &Path, extension: &str) -> Vec<String> {
        match Self::try_extract(path, extension) {
            Ok(fragments) => fragments,
            Err(e) => {
                tracing::warn!("⚠️ Could not extract {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn try_extract(path: &Path, extension: &str) -> Result<Vec<String>> {
        let kind = FileKind::from_extension(extension);
        tracing::debug!("Extracting {} as {:?}", path.display(), kind);

        let fragments = match kind {
            FileKind::Csv => read_csv(path)?,
            FileKind::Spreadsheet => read_spreadsheet(path)?,
            FileKind::Pdf => read_pdf(path)?,
            FileKind::Text => read_text(path)?,
            FileKind::Email => read_email(path)?,
            FileKind::Image => describe_image(path)?,
            FileKind::Unsupported => vec![format!("Unsupported file type: {}", file_name(path))],
        };

        Ok(fragments
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_csv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

    Ok(table_fragments(&headers, &rows))
}

fn read_spreadsheet(path: &Path) -> Result<Vec<String>> {
    let mut workbook = open_workbook_auto(path)?;
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    let Some(headers) = rows.next() else {
        return Ok(Vec::new());
    };
    let rows: Vec<Vec<String>> = rows.collect();

    Ok(table_fragments(&headers, &rows))
}

/// 每列挑選出的欄位以 " | " 串接成一個片段
pub fn table_fragments(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    let columns = select_columns(headers, rows);
    tracing::debug!("Selected columns {:?} of {:?}", columns, headers);

    rows.iter()
        .filter_map(|row| {
            let values: Vec<&str> = columns
                .iter()
                .filter_map(|&i| row.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect();
            (!values.is_empty()).then(|| values.join(FIELD_SEPARATOR))
        })
        .collect()
}

/// 關鍵字表頭 → 抽樣判斷為文字的欄位 → 排除 id/num 欄位後的全部
pub fn select_columns(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    let by_keyword: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(_, h)| TEXT_COLUMN_KEYWORDS.iter().any(|k| h.contains(k)))
        .map(|(i, _)| i)
        .collect();
    if !by_keyword.is_empty() {
        return by_keyword;
    }

    let by_sample: Vec<usize> = (0..headers.len())
        .filter(|&i| looks_like_text_column(rows, i))
        .collect();
    if !by_sample.is_empty() {
        return by_sample;
    }

    lowered
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.contains("id") && !h.contains("num"))
        .map(|(i, _)| i)
        .collect()
}

fn looks_like_text_column(rows: &[Vec<String>], column: usize) -> bool {
    let samples: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .take(SAMPLE_ROWS)
        .collect();
    if samples.is_empty() {
        return false;
    }

    let text_like = samples
        .iter()
        .filter(|v| v.parse::<f64>().is_err() && v.chars().count() > MIN_TEXT_CHARS)
        .count();
    text_like * 2 > samples.len()
}

fn read_pdf(path: &Path) -> Result<Vec<String>> {
    let doc = lopdf::Document::load(path)?;
    if doc.is_encrypted() {
        return Err(AuditError::ValidationError {
            message: "PDF is password protected".to_string(),
        });
    }

    let mut lines = Vec::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => lines.extend(text.lines().map(str::to_string)),
            Err(e) => tracing::debug!("Skipping page {} of {}: {}", page_number, path.display(), e),
        }
    }
    Ok(lines)
}

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_text(path: &Path) -> Result<Vec<String>> {
    Ok(read_lossy(path)?.lines().map(str::to_string).collect())
}

/// 主旨放第一個，其後是標頭區塊之後的內文行
fn read_email(path: &Path) -> Result<Vec<String>> {
    let raw = read_lossy(path)?;
    let mut lines = raw.lines();

    let mut subject: Option<String> = None;
    let mut in_subject = false;
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            // 折行的標頭
            if in_subject {
                if let Some(s) = subject.as_mut() {
                    s.push(' ');
                    s.push_str(line.trim());
                }
            }
            continue;
        }
        in_subject = false;
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("subject") {
                subject = Some(value.trim().to_string());
                in_subject = true;
            }
        }
    }

    let body = lines.filter(|line| !is_mime_noise(line)).map(str::to_string);
    Ok(subject.into_iter().chain(body).collect())
}

fn is_mime_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("--")
        || trimmed
            .split_once(':')
            .is_some_and(|(name, _)| name.to_ascii_lowercase().starts_with("content-"))
}

fn describe_image(path: &Path) -> Result<Vec<String>> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f).to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    // 只讀檔頭，不解碼像素
    let decoder = reader.into_decoder()?;
    let (width, height) = decoder.dimensions();

    Ok(vec![
        format!("Image file: {}", file_name(path)),
        format!("Format: {}", format),
        format!("Size: {}x{} pixels", width, height),
        format!("Mode: {}", color_mode(decoder.color_type())),
        "Note: text inside images is not extracted (no OCR)".to_string(),
    ])
}

fn color_mode(color: image::ColorType) -> String {
    match color {
        image::ColorType::L8 | image::ColorType::L16 => "L".to_string(),
        image::ColorType::La8 | image::ColorType::La16 => "LA".to_string(),
        image::ColorType::Rgb8 | image::ColorType::Rgb16 | image::ColorType::Rgb32F => {
            "RGB".to_string()
        }
        image::ColorType::Rgba8 | image::ColorType::Rgba16 | image::ColorType::Rgba32F => {
            "RGBA".to_string()
        }
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_extension(".CSV"), FileKind::Csv);
        assert_eq!(FileKind::from_extension("xls"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_extension(".jpeg"), FileKind::Image);
        assert_eq!(FileKind::from_extension(".docx"), FileKind::Unsupported);
    }

    #[test]
    fn test_select_columns_by_keyword() {
        let headers = strings(&["ticket_id", "Customer Message", "Subject", "amount"]);
        let rows = vec![strings(&["1", "Where is my order?", "Order", "20"])];
        assert_eq!(select_columns(&headers, &rows), vec![1, 2]);
    }

    #[test]
    fn test_select_columns_by_sampling() {
        let headers = strings(&["col_a", "col_b", "col_c"]);
        let rows = vec![
            strings(&["42", "I was charged twice this month", "ok"]),
            strings(&["43", "The app crashes when I upload a file", "ok"]),
            strings(&["44", "", "ok"]),
        ];
        assert_eq!(select_columns(&headers, &rows), vec![1]);
    }

    #[test]
    fn test_select_columns_excludes_ids_as_last_resort() {
        let headers = strings(&["ID", "Order Number", "Status", "Region"]);
        let rows = vec![strings(&["1", "1001", "open", "EU"])];
        assert_eq!(select_columns(&headers, &rows), vec![2, 3]);
    }

    #[test]
    fn test_table_fragments_join_and_skip_empty_rows() {
        let headers = strings(&["id", "subject", "body"]);
        let rows = vec![
            strings(&["1", "Refund", "Please refund my order"]),
            strings(&["2", "", ""]),
            strings(&["3", "Login"]),
        ];
        assert_eq!(
            table_fragments(&headers, &rows),
            strings(&["Refund | Please refund my order", "Login"])
        );
    }

    #[test]
    fn test_email_subject_first_then_body() {
        let mut file = tempfile::Builder::new().suffix(".eml").tempfile().unwrap();
        write!(
            file,
            "From: a@example.com\r\nSubject: Refund for order\r\n  #4521\r\nTo: support@example.com\r\n\r\nHi team,\r\n\r\nI still have not received my refund.\r\n"
        )
        .unwrap();

        let fragments = ContentExtractor::try_extract(file.path(), ".eml").unwrap();
        assert_eq!(
            fragments,
            strings(&["Refund for order #4521", "Hi team,", "I still have not received my refund."])
        );
    }

    #[test]
    fn test_unsupported_extension_single_fragment() {
        let file = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let fragments = ContentExtractor::extract(file.path(), ".docx");
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].starts_with("Unsupported file type: "));
        assert!(fragments[0].ends_with(".docx"));
    }

    #[test]
    fn test_corrupt_pdf_is_error_but_extract_swallows_it() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"this is not a pdf").unwrap();

        assert!(ContentExtractor::try_extract(file.path(), ".pdf").is_err());
        assert!(ContentExtractor::extract(file.path(), ".pdf").is_empty());
    }

    #[test]
    fn test_color_mode_names() {
        assert_eq!(color_mode(image::ColorType::Rgb8), "RGB");
        assert_eq!(color_mode(image::ColorType::La8), "LA");
    }
}
