//! HTML rendering of the digest email.

use super::{DigestBucket, REVIEW_BUCKET, URGENT_BUCKET};
use crate::types::OpenTask;
use chrono::NaiveDate;
use std::fmt::Write;

/// Rows shown per bucket; the count chip still reports the full size.
pub const MAX_ROWS_PER_BUCKET: usize = 80;

const MUTED: &str = "color:#6b7280";
const BORDER: &str = "1px solid #e5e7eb";

/// Escape text for HTML element content and single- or double-quoted
/// attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Web link to a thread, or `#` when the id is empty.
pub fn thread_link(thread_id: &str) -> String {
    if thread_id.is_empty() {
        "#".to_string()
    } else {
        format!(
            "https://mail.google.com/mail/u/0/#inbox/{}",
            urlencoding::encode(thread_id)
        )
    }
}

/// Render the digest. Every bucket gets a count chip; only non-empty buckets
/// get a section.
pub fn render_digest(buckets: &[DigestBucket], today: NaiveDate) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<div style=\"font-family:ui-sans-serif,system-ui;line-height:1.35;color:#111827\">\n\
         <h2 style=\"margin:0 0 6px\">Daily Action Digest</h2>\n\
         <div style=\"{MUTED};margin-bottom:10px\">{}</div>\n",
        today.format("%B %d, %Y")
    );

    html.push_str(&format!(
        "<div style=\"margin:10px 0 4px\"><b>Bucket review</b> <span style=\"{MUTED}\">(counts)</span></div>\n<div>"
    ));
    for bucket in buckets {
        let _ = write!(
            html,
            "<span style=\"display:inline-block;margin:0 8px 8px 0;padding:6px 10px;border:{BORDER};border-radius:999px;background:#f8fafc\"><b>{}:</b> {}</span>",
            escape_html(&bucket.label),
            bucket.tasks.len()
        );
    }
    html.push_str("</div>\n");

    for bucket in buckets.iter().filter(|b| !b.tasks.is_empty()) {
        render_section(&mut html, bucket);
    }

    let _ = write!(
        html,
        "<p style=\"{MUTED};margin-top:10px;font-size:12px\">Generated locally. Click \"Open\" to jump to the thread.</p>\n</div>\n"
    );
    html
}

fn render_section(html: &mut String, bucket: &DigestBucket) {
    let open_attr = if bucket.key == URGENT_BUCKET || bucket.key == REVIEW_BUCKET {
        " open"
    } else {
        ""
    };
    let _ = write!(
        html,
        "<details{open_attr} style=\"margin:10px 0;border:{BORDER};border-radius:14px;background:#ffffff\">\n\
         <summary style=\"padding:10px 12px;cursor:pointer;background:#f8fafc;border-radius:14px\"><b>{}</b> <span style=\"{MUTED}\">({})</span></summary>\n\
         <div style=\"padding:10px 12px\">\n\
         <table cellpadding=\"8\" cellspacing=\"0\" style=\"border-collapse:collapse;width:100%;border:{BORDER}\">\n\
         <thead><tr style=\"background:#f8fafc\"><th align=\"left\">ID</th><th align=\"left\">Priority</th><th align=\"left\">Task + Subject</th><th align=\"left\">Due</th><th align=\"left\">Link</th></tr></thead>\n\
         <tbody>\n",
        escape_html(&bucket.label),
        bucket.tasks.len()
    );
    for task in bucket.tasks.iter().take(MAX_ROWS_PER_BUCKET) {
        render_row(html, task);
    }
    html.push_str("</tbody>\n</table>\n</div>\n</details>\n");
}

fn render_row(html: &mut String, open: &OpenTask) {
    let task = &open.task;
    let due = task.due_date.as_deref().unwrap_or("—");
    let subject = open.thread_subject.as_deref().unwrap_or("—");
    let _ = writeln!(
        html,
        "<tr><td>{}</td><td>{}</td><td>{}<div style=\"{MUTED};font-size:12px;margin-top:2px\">{}</div></td><td>{}</td><td><a href=\"{}\">Open</a></td></tr>",
        task.id,
        escape_html(&task.priority),
        escape_html(&task.title),
        escape_html(subject),
        escape_html(due),
        escape_html(&thread_link(&task.thread_id)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{group_and_sort, DigestConfig};
    use crate::config::Config;
    use crate::types::{TaskRecord, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn task(id: i64, priority: &str, title: &str, bucket: &str) -> OpenTask {
        OpenTask {
            task: TaskRecord {
                id,
                task_key: format!("key-{id}"),
                provider: "gmail".to_string(),
                thread_id: format!("18c{id}"),
                created_at: Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap(),
                status: TaskStatus::Open,
                priority: priority.to_string(),
                title: title.to_string(),
                due_date: None,
                notes: None,
            },
            thread_subject: Some("Invoice <1023> & co".to_string()),
            thread_bucket: Some(bucket.to_string()),
        }
    }

    fn render(tasks: Vec<OpenTask>) -> String {
        let config = DigestConfig::from_config(&Config::default());
        render_digest(&group_and_sort(tasks, &config, today()), today())
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href='x'>&\"</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&quot;&lt;/a&gt;");
    }

    #[test]
    fn renders_header_chips_and_non_empty_sections() {
        let html = render(vec![task(7, "high", "Confirm <remittance>", "payment")]);

        assert!(html.contains("Daily Action Digest"));
        assert!(html.contains("October 16, 2026"));
        assert!(html.contains("<b>Payments / Receivables:</b> 1"));
        assert!(html.contains("<b>Audit / Evidence Requests:</b> 0"));
        assert_eq!(html.matches("<details").count(), 1);
        assert!(html.contains("Confirm &lt;remittance&gt;"));
        assert!(html.contains("Invoice &lt;1023&gt; &amp; co"));
        assert!(html.contains("https://mail.google.com/mail/u/0/#inbox/18c7"));
        assert!(!html.contains("<remittance>"));
    }

    #[test]
    fn urgent_and_review_sections_start_open() {
        let html = render(vec![
            task(1, "urgent", "Renew cert", "expiry"),
            task(2, "normal", "Review thread", "other"),
            task(3, "high", "Send PBC list", "audit"),
        ]);
        assert_eq!(html.matches("<details open").count(), 2);
        assert_eq!(html.matches("<details").count(), 3);
    }

    #[test]
    fn rows_are_capped_per_bucket() {
        let tasks = (1..=85).map(|i| task(i, "high", &format!("Pay {i}"), "payment")).collect();
        let html = render(tasks);
        assert_eq!(html.matches("<tr><td>").count(), MAX_ROWS_PER_BUCKET);
        assert!(html.contains("<b>Payments / Receivables:</b> 85"));
    }

    #[test]
    fn empty_digest_has_only_chips() {
        let html = render(vec![]);
        assert!(!html.contains("<details"));
        assert!(html.contains("<b>Urgent (next 72h):</b> 0"));
    }

    #[test]
    fn empty_thread_id_links_nowhere() {
        assert_eq!(thread_link(""), "#");
    }
}
