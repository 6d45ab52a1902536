//! MIME decomposition of fetched messages.

use chrono::{DateTime, NaiveDateTime, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use tracing::warn;

pub const DEFAULT_SUBJECT: &str = "(no subject)";
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub from: String,
    pub subject: String,
    pub received_at: String,
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<ParsedAttachment>,
}

/// Split a raw RFC 822 message into headers, bodies and attachments.
///
/// Multipart messages are walked depth-first. A leaf is an attachment when
/// its disposition says so or it carries a filename; attachments with an
/// empty payload are dropped. Otherwise the first `text/plain` and the
/// first `text/html` leaves become the bodies. Undecodable bytes are
/// replaced rather than failing the message.
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let mail = match mailparse::parse_mail(raw) {
        Ok(mail) => mail,
        Err(e) => {
            warn!("Unparseable message, keeping raw text: {}", e);
            return ParsedMessage {
                subject: DEFAULT_SUBJECT.to_string(),
                received_at: now(),
                body_text: String::from_utf8_lossy(raw).into_owned(),
                ..Default::default()
            };
        }
    };

    let subject = mail
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    let from = mail.headers.get_first_value("From").unwrap_or_default();
    let received_at = normalize_date(mail.headers.get_first_value("Date").as_deref());

    let mut walk = Walk::default();
    if mail.ctype.mimetype.starts_with("multipart/") {
        walk.visit(&mail);
    } else if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        walk.html = Some(decode_text(&mail));
    } else {
        walk.text = Some(decode_text(&mail));
    }

    ParsedMessage {
        from,
        subject,
        received_at,
        body_text: walk.text.unwrap_or_default(),
        body_html: walk.html.unwrap_or_default(),
        attachments: walk.attachments,
    }
}

#[derive(Default)]
struct Walk {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<ParsedAttachment>,
}

impl Walk {
    fn visit(&mut self, part: &ParsedMail<'_>) {
        if !part.subparts.is_empty() {
            for sub in &part.subparts {
                self.visit(sub);
            }
            return;
        }

        let mime = part.ctype.mimetype.to_ascii_lowercase();
        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if disposition.disposition == DispositionType::Attachment || filename.is_some() {
            let data = match part.get_body_raw() {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping undecodable attachment: {}", e);
                    return;
                }
            };
            if data.is_empty() {
                return;
            }
            self.attachments.push(ParsedAttachment {
                filename: filename.unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
                mime_type: mime,
                data,
            });
            return;
        }

        match mime.as_str() {
            "text/plain" if self.text.is_none() => self.text = Some(decode_text(part)),
            "text/html" if self.html.is_none() => self.html = Some(decode_text(part)),
            _ => {}
        }
    }
}

/// Charset-aware decode, falling back to lossy UTF-8 of the transfer-decoded
/// bytes.
fn decode_text(part: &ParsedMail<'_>) -> String {
    match part.get_body() {
        Ok(text) => text,
        Err(_) => part
            .get_body_raw()
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default(),
    }
}

/// RFC 2822 `Date` header to `YYYY-MM-DD HH:MM:SS` UTC, matching the
/// database's `datetime('now')` format. Missing or unparseable dates fall
/// back to the current time.
fn normalize_date(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .and_then(|s| {
            DateTime::parse_from_rfc2822(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        })
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(now)
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn multipart_with_attachments(subject: &str, names: &[&str]) -> Vec<u8> {
        let mut raw = format!(
            "From: Sales <sales@example.com>\r\n\
             To: board@example.com\r\n\
             Subject: {}\r\n\
             Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
             \r\n\
             --XYZ\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Plain body\r\n\
             --XYZ\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <p>Html body</p>\r\n",
            subject
        );
        for name in names {
            raw.push_str(&format!(
                "--XYZ\r\n\
                 Content-Type: application/pdf; name=\"{0}\"\r\n\
                 Content-Disposition: attachment; filename=\"{0}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 \r\n\
                 JVBERi0xLjQK\r\n",
                name
            ));
        }
        raw.push_str("--XYZ--\r\n");
        raw.into_bytes()
    }

    #[test]
    fn multipart_splits_bodies_and_attachments() {
        let raw = multipart_with_attachments("Acme Deal", &["quote.pdf", "terms.pdf"]);
        let msg = parse_message(&raw);

        assert_eq!(msg.subject, "Acme Deal");
        assert!(msg.from.contains("sales@example.com"));
        assert_eq!(msg.received_at, "2025-07-01 08:52:37");
        assert_eq!(msg.body_text.trim(), "Plain body");
        assert_eq!(msg.body_html.trim(), "<p>Html body</p>");
        assert_eq!(msg.attachments.len(), 2);
        assert_eq!(msg.attachments[0].filename, "quote.pdf");
        assert_eq!(msg.attachments[0].mime_type, "application/pdf");
        assert_eq!(msg.attachments[0].data, b"%PDF-1.4\n");
    }

    #[test]
    fn missing_subject_gets_placeholder() {
        let raw = b"From: a@example.com\r\nContent-Type: text/plain\r\n\r\nhello\r\n";
        let msg = parse_message(raw);
        assert_eq!(msg.subject, DEFAULT_SUBJECT);
        assert_eq!(msg.body_text.trim(), "hello");
        assert!(msg.body_html.is_empty());
    }

    #[test]
    fn single_part_html_goes_to_html_body() {
        let raw = b"Subject: Hi\r\nContent-Type: text/html\r\n\r\n<b>hi</b>\r\n";
        let msg = parse_message(raw);
        assert!(msg.body_text.is_empty());
        assert_eq!(msg.body_html.trim(), "<b>hi</b>");
    }

    #[test]
    fn empty_and_unnamed_attachments() {
        let raw = b"Subject: Files\r\n\
            Content-Type: multipart/mixed; boundary=\"B\"\r\n\
            \r\n\
            --B\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            first\r\n\
            --B\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            second\r\n\
            --B\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment\r\n\
            \r\n\
            payload\r\n\
            --B\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment; filename=\"empty.bin\"\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            \r\n\
            --B--\r\n";
        let msg = parse_message(raw);

        assert_eq!(msg.body_text.trim(), "first");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, DEFAULT_ATTACHMENT_NAME);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut raw = b"Subject: Bytes\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nok ".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(b"\r\n");
        let msg = parse_message(&raw);
        assert!(msg.body_text.starts_with("ok "));
    }

    #[test]
    fn unparseable_date_falls_back_to_now() {
        let normalized = normalize_date(Some("not a date"));
        assert_eq!(normalized.len(), "2025-01-01 00:00:00".len());
        assert_eq!(normalize_date(Some("Mon, 2 Jun 2025 09:00:00 +0000")), "2025-06-02 09:00:00");
    }
}
