//! Message texts. All output is Telegram HTML (`parse_mode=HTML`); guest
//! supplied text is escaped so it can never open or close a tag.

use rsvp_schemas::GuestRecord;

pub const START_TEXT: &str = "<b>Welcome! 💍</b>\n\n\
Here is what I can do:\n\
1. Send every new RSVP to this chat automatically\n\
2. Show the guest list: /guests\n\n\
Thank you for trusting me with such an important mission 🤍";

pub const NO_CONFIRMATIONS_TEXT: &str = "No one has confirmed attendance yet 😢";

pub const STORE_FAILURE_TEXT: &str =
    "Could not load the guest list right now. Please try again in a minute.";

const NONE: &str = "None";

/// Notification for one RSVP record.
///
/// ```text
/// 💌 <b>New RSVP</b>
/// 👤 Guest: Anna
/// ✅ Attending: Yes
/// 💑 Partner: Ivan
/// 📝 Wishes: None
/// ```
pub fn notification_text(record: &GuestRecord) -> String {
    let attending = if record.attending { "Yes" } else { "No" };
    let partner = record
        .partner_trimmed()
        .map(escape_html)
        .unwrap_or_else(|| NONE.to_string());
    let wishes = record
        .wishes_trimmed()
        .map(escape_html)
        .unwrap_or_else(|| NONE.to_string());

    format!(
        "💌 <b>New RSVP</b>\n\
         👤 Guest: {}\n\
         ✅ Attending: {attending}\n\
         💑 Partner: {partner}\n\
         📝 Wishes: {wishes}",
        escape_html(record.name.trim()),
    )
}

/// One summary line: `<index>) <name>[ + <partner>][. Wishes: <wishes>]`.
pub fn summary_line(index: usize, record: &GuestRecord) -> String {
    let mut line = format!("{index}) {}", escape_html(record.name.trim()));
    if let Some(p) = record.partner_trimmed() {
        line.push_str(" + ");
        line.push_str(&escape_html(p));
    }
    if let Some(w) = record.wishes_trimmed() {
        line.push_str(". Wishes: ");
        line.push_str(&escape_html(w));
    }
    line
}

/// Reply for the `guests` command. `attending` must already be filtered and
/// ordered; numbering starts at 1.
pub fn guest_summary(attending: &[GuestRecord]) -> String {
    if attending.is_empty() {
        return NO_CONFIRMATIONS_TEXT.to_string();
    }

    let mut lines = Vec::with_capacity(attending.len() + 1);
    lines.push("📋 <b>Guests:</b>".to_string());
    lines.extend(
        attending
            .iter()
            .enumerate()
            .map(|(i, r)| summary_line(i + 1, r)),
    );
    lines.join("\n")
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
