//! Message formatting shared by publishers.

use chrono::FixedOffset;

use crate::models::PaperRecord;
use crate::utils::truncate_chars;

/// Presentation settings for outgoing messages
#[derive(Debug, Clone)]
pub struct MessageStyle {
    /// Card / message heading
    pub heading: String,
    /// Offset used when rendering the publication time
    pub offset: FixedOffset,
    /// Summaries longer than this are cut; 0 omits the summary
    pub summary_max_chars: usize,
}

impl Default for MessageStyle {
    fn default() -> Self {
        Self {
            heading: "New Paper Notification".to_string(),
            offset: beijing_offset(),
            summary_max_chars: 600,
        }
    }
}

impl MessageStyle {
    /// Style with a UTC offset given in hours; out-of-range values fall back to UTC
    pub fn with_offset_hours(mut self, hours: i32) -> Self {
        self.offset = FixedOffset::east_opt(hours * 3600).unwrap_or_else(utc_offset);
        self
    }

    /// Publication time rendered in the configured offset
    pub fn published_time(&self, record: &PaperRecord) -> String {
        record
            .published_at
            .with_timezone(&self.offset)
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string()
    }

    /// Summary cut to the configured length, or `None` when it should be omitted
    pub fn summary(&self, record: &PaperRecord) -> Option<String> {
        if self.summary_max_chars == 0 || !record.has_summary() {
            return None;
        }
        Some(truncate_chars(record.summary.trim(), self.summary_max_chars))
    }
}

fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(utc_offset)
}

fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset is valid")
}

/// Plain-text rendering of a record
pub fn format_text(record: &PaperRecord, style: &MessageStyle) -> String {
    let mut lines = vec![
        style.heading.clone(),
        format!("Title: {}", record.title),
    ];
    if !record.authors.is_empty() {
        lines.push(format!("Authors: {}", record.author_line()));
    }
    if let Some(summary) = style.summary(record) {
        lines.push(format!("Summary: {}", summary));
    }
    lines.push(format!("Published: {}", style.published_time(record)));
    lines.push(format!("Link: {}", record.url));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperRecordBuilder;
    use chrono::{TimeZone, Utc};

    fn record() -> PaperRecord {
        PaperRecordBuilder::new(
            "2412.01234",
            "Sparse Attention at Scale",
            "https://arxiv.org/abs/2412.01234",
            Utc.with_ymd_and_hms(2024, 12, 22, 11, 19, 22).unwrap(),
        )
        .authors(["Ada Lovelace", "Alan Turing"])
        .summary("We study sparse attention in very large models.")
        .build()
    }

    #[test]
    fn test_published_time_uses_offset() {
        let style = MessageStyle::default();
        assert_eq!(style.published_time(&record()), "2024-12-22 19:19:22 +08:00");

        let utc = MessageStyle::default().with_offset_hours(0);
        assert_eq!(utc.published_time(&record()), "2024-12-22 11:19:22 +00:00");
    }

    #[test]
    fn test_format_text_includes_title_and_url() {
        let text = format_text(&record(), &MessageStyle::default());
        assert!(text.starts_with("New Paper Notification\n"));
        assert!(text.contains("Title: Sparse Attention at Scale"));
        assert!(text.contains("Authors: Ada Lovelace, Alan Turing"));
        assert!(text.contains("Link: https://arxiv.org/abs/2412.01234"));
    }

    #[test]
    fn test_summary_can_be_omitted() {
        let style = MessageStyle {
            summary_max_chars: 0,
            ..MessageStyle::default()
        };
        assert!(!format_text(&record(), &style).contains("Summary:"));

        let short = MessageStyle {
            summary_max_chars: 10,
            ..MessageStyle::default()
        };
        assert_eq!(short.summary(&record()).unwrap(), "We study …");
    }
}
