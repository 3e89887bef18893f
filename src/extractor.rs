use crate::models::{EmailMessage, SenderDomain};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Headers consulted for the sender, most authoritative first.
const SENDER_HEADERS: [&str; 3] = ["from", "sender", "return-path"];

/// Derives the sender domain used as the attestation key.
///
/// The first of `From`, `Sender` and `Return-Path` that yields a parseable
/// mailbox wins. Extraction is a pure function of the message bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomainExtractor;

impl DomainExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, message: &EmailMessage) -> Result<SenderDomain, ExtractionError> {
        let headers = parse_headers(message.as_str());
        if headers.is_empty() {
            return Err(ExtractionError::MalformedMessage(
                "no header section found".to_string(),
            ));
        }

        let mut seen_sender_header = false;
        for name in SENDER_HEADERS {
            let Some((_, value)) = headers.iter().find(|(key, _)| key == name) else {
                continue;
            };
            seen_sender_header = true;

            if let Some(domain) = mailbox_address(value)
                .as_deref()
                .and_then(address_domain)
                .and_then(|raw| SenderDomain::parse(raw).ok())
            {
                log::debug!("Sender domain {domain} taken from {name} header");
                return Ok(domain);
            }
            log::debug!("Unparseable {name} header, trying next sender header");
        }

        let reason = if seen_sender_header {
            "sender headers contain no parseable address"
        } else {
            "no From, Sender or Return-Path header"
        };
        Err(ExtractionError::MalformedMessage(reason.to_string()))
    }
}

/// Parse the header block into (lower-cased name, unfolded value) pairs,
/// preserving order. Parsing stops at the first empty line.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation of previous header
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        // mbox envelope separator
        if index == 0 && line.starts_with("From ") {
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            let is_field_name = !key.is_empty()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_graphic() && b != b':');
            if is_field_name {
                headers.push((key.to_lowercase(), value.trim().to_string()));
            }
        }
    }

    headers
}

/// Return the addr-spec of the first mailbox in an address header value.
///
/// Handles `Name <user@host>`, bare addresses, quoted display names,
/// comments, source routes and group syntax.
fn mailbox_address(value: &str) -> Option<String> {
    let cleaned = strip_comments(value);

    if let Some(inner) = angle_address(&cleaned) {
        // Drop obsolete source route: <@relay.example:user@host>
        let addr = match inner.rfind(':') {
            Some(pos) if inner.starts_with('@') => &inner[pos + 1..],
            _ => inner.as_str(),
        };
        let addr = addr.trim();
        return if addr.is_empty() {
            None
        } else {
            Some(addr.to_string())
        };
    }

    for part in split_unquoted(&cleaned, ',') {
        let mut candidate = part.as_str();
        // Group syntax: "Team: a@b.com, c@d.com;"
        if let Some(pos) = find_unquoted(candidate, ':') {
            candidate = &candidate[pos + 1..];
        }
        let candidate = candidate.trim().trim_end_matches(';').trim();
        if candidate.contains('@') && !candidate.contains(char::is_whitespace) {
            return Some(candidate.to_string());
        }
    }

    None
}

/// Domain part of an addr-spec; the local part must be present.
fn address_domain(addr: &str) -> Option<&str> {
    let at = addr.rfind('@')?;
    if at == 0 {
        return None;
    }
    let domain = addr[at + 1..].trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

/// Contents of the first `<...>` outside quoted strings.
fn angle_address(value: &str) -> Option<String> {
    let start = find_unquoted(value, '<')?;
    let rest = &value[start + 1..];
    let end = rest.find('>')?;
    Some(rest[..end].to_string())
}

fn find_unquoted(value: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (pos, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == target && !in_quotes => return Some(pos),
            _ => {}
        }
    }
    None
}

fn split_unquoted(value: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = value;
    while let Some(pos) = find_unquoted(rest, separator) {
        parts.push(rest[..pos].to_string());
        rest = &rest[pos + separator.len_utf8()..];
    }
    parts.push(rest.to_string());
    parts
}

/// Remove RFC 5322 comments, honouring nesting, quoted strings and escapes.
fn strip_comments(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            escaped = false;
            if depth == 0 {
                out.push(c);
            }
            continue;
        }
        match c {
            '\\' if in_quotes || depth > 0 => {
                escaped = true;
                if depth == 0 {
                    out.push(c);
                }
            }
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}
