use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DOMAIN_REGEX: Regex = Regex::new(
        r"(?i)^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?)*\.([a-z]{2,63}|xn--[a-z0-9\-]{1,59})$"
    )
    .unwrap();
}

const MAX_DOMAIN_LEN: usize = 253;

/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Normalize a raw domain string into its canonical lower-case ASCII form.
    ///
    /// Surrounding whitespace and angle brackets are stripped, a trailing root
    /// dot is dropped and internationalized names are converted to punycode.
    /// Address literals (`[10.0.0.1]`, bare IPs) are not domains and yield `None`.
    pub fn normalize(raw: &str) -> Option<String> {
        let trimmed = raw
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
            .trim()
            .trim_end_matches('.');

        if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.len() > MAX_DOMAIN_LEN {
            return None;
        }

        // Host::parse percent-decodes; only letters, digits, '-' and '.' may
        // pass in ASCII
        let allowed = |c: char| !c.is_ascii() || c.is_ascii_alphanumeric() || c == '-' || c == '.';
        if !trimmed.chars().all(allowed) {
            return None;
        }

        let ascii = match url::Host::parse(trimmed) {
            Ok(url::Host::Domain(domain)) => domain,
            _ => return None,
        };

        if !Self::labels_preserved(trimmed, &ascii) {
            return None;
        }

        if Self::is_valid_domain(&ascii) {
            Some(ascii.to_lowercase())
        } else {
            None
        }
    }

    /// The ASCII form must keep every label of the input: ASCII labels only
    /// change case and non-ASCII labels become punycode. IDNA mapping that
    /// folds a label onto plain ASCII (fullwidth letters, ideographic dots)
    /// would name a different domain than the sender wrote.
    fn labels_preserved(input: &str, ascii: &str) -> bool {
        let input_labels: Vec<&str> = input.split('.').collect();
        let ascii_labels: Vec<&str> = ascii.split('.').collect();
        input_labels.len() == ascii_labels.len()
            && input_labels
                .iter()
                .zip(&ascii_labels)
                .all(|(original, converted)| {
                    if original.is_ascii() {
                        original.eq_ignore_ascii_case(converted)
                    } else {
                        converted.starts_with("xn--")
                    }
                })
    }

    /// Syntax check for an already-ASCII domain name
    pub fn is_valid_domain(domain: &str) -> bool {
        domain.len() <= MAX_DOMAIN_LEN && DOMAIN_REGEX.is_match(domain)
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[&str]) -> bool {
        let domain_lower = domain.to_lowercase();

        domain_list.iter().any(|pattern| {
            let pattern_lower = pattern.to_lowercase();
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{pattern_lower}"))
        })
    }

    /// Registrable root of a domain, e.g. "mail.example.co.uk" -> "example.co.uk"
    pub fn root_domain(domain: &str) -> String {
        let parts: Vec<&str> = domain.split('.').collect();
        if parts.len() < 2 {
            return domain.to_string();
        }

        let common_two_part_tlds = [
            "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg",
            "co.nz", "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au",
        ];

        let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        if parts.len() >= 3 && common_two_part_tlds.contains(&last_two.as_str()) {
            return format!("{}.{}", parts[parts.len() - 3], last_two);
        }

        last_two
    }
}
