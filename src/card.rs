//! SVG progress card, suitable for embedding in a GitHub readme.

use std::fmt::Write;

use chrono::DateTime;

use crate::books::BookSummary;

const CARD_WIDTH: usize = 400;
const HEADER_HEIGHT: usize = 40;
const BOOK_HEIGHT: usize = 65;
const PADDING: usize = 16;

const STYLE: &str = r##"  .card { fill: #ffffff; stroke: #e1e4e8; stroke-width: 1; rx: 6; }
  .header { fill: #24292f; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; font-size: 14px; font-weight: 600; }
  .book-title { fill: #24292f; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; font-size: 12px; }
  .percentage { fill: #57606a; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; font-size: 11px; }
  .date { fill: #8b949e; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Helvetica, Arial, sans-serif; font-size: 10px; }
  .progress-bg { fill: #e1e4e8; rx: 3; }
  .progress-fill { fill: #2da44e; rx: 3; }"##;

/// Render the "Currently Reading" card for a pre-selected list of books.
pub fn render_progress_card(books: &[BookSummary]) -> String {
    let card_height = if books.is_empty() {
        HEADER_HEIGHT + 40
    } else {
        HEADER_HEIGHT + books.len() * BOOK_HEIGHT + PADDING
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CARD_WIDTH}" height="{card_height}" viewBox="0 0 {CARD_WIDTH} {card_height}">"#
    );
    let _ = writeln!(svg, "<style>\n{STYLE}\n</style>");
    let _ = writeln!(
        svg,
        r#"<rect class="card" x="0.5" y="0.5" width="{}" height="{}"/>"#,
        CARD_WIDTH - 1,
        card_height - 1
    );
    let _ = writeln!(
        svg,
        r#"<text class="header" x="{PADDING}" y="26">Currently Reading</text>"#
    );
    let _ = writeln!(
        svg,
        r##"<line x1="{PADDING}" y1="{HEADER_HEIGHT}" x2="{}" y2="{HEADER_HEIGHT}" stroke="#e1e4e8" stroke-width="1"/>"##,
        CARD_WIDTH - PADDING
    );

    if books.is_empty() {
        let _ = writeln!(
            svg,
            r##"<text class="book-title" x="{PADDING}" y="{}" fill="#57606a">No books in progress</text>"##,
            HEADER_HEIGHT + 25
        );
    } else {
        for (i, book) in books.iter().enumerate() {
            let y = HEADER_HEIGHT + i * BOOK_HEIGHT + 20;
            let title = escape_xml(&ellipsize(book.display_name(), 40));
            let percentage = (book.percentage * 100.0).clamp(0.0, 100.0);
            let bar_width = CARD_WIDTH - PADDING * 2 - 50;
            let fill_width = (bar_width as f64 * percentage / 100.0) as usize;
            let last_updated = format_date(book.timestamp);

            let _ = writeln!(
                svg,
                r#"<text class="book-title" x="{PADDING}" y="{y}">{title}</text>"#
            );
            let _ = writeln!(
                svg,
                r#"<text class="percentage" x="{}" y="{y}" text-anchor="end">{percentage:.0}%</text>"#,
                CARD_WIDTH - PADDING
            );
            let _ = writeln!(
                svg,
                r#"<rect class="progress-bg" x="{PADDING}" y="{}" width="{bar_width}" height="6"/>"#,
                y + 8
            );
            let _ = writeln!(
                svg,
                r#"<rect class="progress-fill" x="{PADDING}" y="{}" width="{fill_width}" height="6"/>"#,
                y + 8
            );
            let _ = writeln!(
                svg,
                r#"<text class="date" x="{PADDING}" y="{}">Last read: {last_updated}</text>"#,
                y + 26
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

fn format_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y").to_string())
        .unwrap_or_default()
}

fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, percentage: f64, timestamp: i64) -> BookSummary {
        BookSummary {
            canonical_hash: "hash".to_string(),
            progress: "pos".to_string(),
            percentage,
            device: "boox".to_string(),
            timestamp,
            filename: None,
            label: Some(title.to_string()),
            linked_hashes: vec![],
        }
    }

    #[test]
    fn empty_card_has_placeholder() {
        let svg = render_progress_card(&[]);
        assert!(svg.contains("No books in progress"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn renders_title_percentage_and_date() {
        let svg = render_progress_card(&[book("Moby-Dick", 0.42, 1700000000)]);
        assert!(svg.contains("Moby-Dick"));
        assert!(svg.contains("42%"));
        assert!(svg.contains("Last read: Nov 14, 2023"));
    }

    #[test]
    fn titles_are_escaped_and_ellipsized() {
        let svg = render_progress_card(&[book("Tom & Jerry <3", 0.1, 0)]);
        assert!(svg.contains("Tom &amp; Jerry &lt;3"));

        let long = "x".repeat(50);
        let svg = render_progress_card(&[book(&long, 0.1, 0)]);
        assert!(svg.contains(&format!("{}...", "x".repeat(37))));
        assert!(!svg.contains(&long));
    }

    #[test]
    fn percentage_is_clamped() {
        let svg = render_progress_card(&[book("a", 2.0, 0)]);
        assert!(svg.contains(">100%<"));
    }
}
