use super::{Scorer, ScoringError};
use crate::domain_utils::DomainUtils;
use crate::extractor::{parse_headers, DomainExtractor};
use crate::models::{EmailMessage, ScoreResult};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref URL_REGEX: Regex = Regex::new(r#"(?i)\bhttps?://[^\s"'<>()]+"#).unwrap();
}

struct ContentRule {
    name: &'static str,
    pattern: Regex,
    weight: f64,
}

/// Local rules engine. Each matched indicator contributes its weight and the
/// weights are combined as independent evidence: `1 - Π(1 - w)`.
pub struct HeuristicScorer {
    content_rules: Vec<ContentRule>,
    extractor: DomainExtractor,
}

const BRANDS: [&str; 12] = [
    "paypal",
    "microsoft",
    "office365",
    "apple",
    "amazon",
    "google",
    "netflix",
    "docusign",
    "wetransfer",
    "dhl",
    "fedex",
    "wellsfargo",
];

const SHORTENERS: [&str; 10] = [
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "rb.gy",
    "cutt.ly",
    "shorturl.at",
    "tiny.cc",
];

const HIGH_RISK_TLDS: [&str; 8] = ["tk", "ml", "ga", "cf", "gq", "xyz", "top", "zip"];

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicScorer {
    pub fn new() -> Self {
        let content_rules = vec![
            ContentRule {
                name: "urgency language",
                pattern: Regex::new(
                    r"(?i)(urgent|immediately|act now|within 24 hours|expires today|final notice|last chance)",
                )
                .unwrap(),
                weight: 0.25,
            },
            ContentRule {
                name: "credential request",
                pattern: Regex::new(
                    r"(?i)(verify (your )?(account|identity)|confirm (your )?(password|login|identity)|account (has been )?(suspended|locked|disabled)|reset your password|sign in to restore)",
                )
                .unwrap(),
                weight: 0.35,
            },
            ContentRule {
                name: "financial lure",
                pattern: Regex::new(
                    r"(?i)(payment (failed|declined)|update (your )?billing|wire transfer|gift cards?|outstanding invoice|refund pending)",
                )
                .unwrap(),
                weight: 0.25,
            },
        ];

        Self {
            content_rules,
            extractor: DomainExtractor::new(),
        }
    }

    /// Names of all indicators present in the message, in a stable order.
    pub fn indicators(&self, message: &EmailMessage) -> Vec<(&'static str, f64)> {
        let raw = message.as_str();
        let headers = parse_headers(raw);
        let header = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        };

        let body = body_of(raw);
        let text = format!("{}\n{}", header("subject"), body);
        let sender_domain = self.extractor.extract(message).ok();
        let sender_root = sender_domain
            .as_ref()
            .map(|d| DomainUtils::root_domain(d.as_str()));

        let mut found = Vec::new();

        for rule in &self.content_rules {
            if rule.pattern.is_match(&text) {
                found.push((rule.name, rule.weight));
            }
        }

        let link_hosts: Vec<String> = URL_REGEX
            .find_iter(body)
            .filter_map(|m| Url::parse(m.as_str()).ok())
            .filter_map(|url| url.host().map(|h| h.to_string().to_lowercase()))
            .collect();

        if link_hosts
            .iter()
            .any(|host| host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('['))
        {
            found.push(("link to raw IP address", 0.4));
        }

        if link_hosts
            .iter()
            .any(|host| DomainUtils::matches_domain_list(host, &SHORTENERS))
        {
            found.push(("shortened link", 0.2));
        }

        if let Some(root) = &sender_root {
            let mismatched = link_hosts.iter().any(|host| {
                DomainUtils::is_valid_domain(host) && &DomainUtils::root_domain(host) != root
            });
            if mismatched {
                found.push(("links point away from sender domain", 0.3));
            }
        }

        let display_name = header("from")
            .split('<')
            .next()
            .unwrap_or("")
            .to_lowercase();
        let impersonated = BRANDS.iter().any(|brand| {
            display_name.contains(brand)
                && !sender_root
                    .as_deref()
                    .map(|root| root.contains(brand))
                    .unwrap_or(false)
        });
        if impersonated {
            found.push(("display name impersonates a brand", 0.45));
        }

        let reply_to_domain = header("reply-to")
            .rsplit('@')
            .next()
            .filter(|_| header("reply-to").contains('@'))
            .and_then(DomainUtils::normalize);
        if let (Some(reply_to), Some(root)) = (reply_to_domain, &sender_root) {
            if &DomainUtils::root_domain(&reply_to) != root {
                found.push(("reply-to differs from sender", 0.2));
            }
        }

        let auth = header("authentication-results").to_lowercase();
        if ["spf=fail", "dkim=fail", "dmarc=fail"]
            .iter()
            .any(|marker| auth.contains(marker))
        {
            found.push(("sender authentication failed", 0.3));
        }

        match &sender_domain {
            None => found.push(("sender cannot be attributed", 0.15)),
            Some(domain) => {
                let tld = domain.as_str().rsplit('.').next().unwrap_or("");
                if HIGH_RISK_TLDS.contains(&tld) {
                    found.push(("high-risk top-level domain", 0.2));
                }
            }
        }

        found
    }
}

/// Everything after the first blank line, whichever line ending it uses.
fn body_of(raw: &str) -> &str {
    let crlf = raw.find("\r\n\r\n").map(|pos| (pos, pos + 4));
    let lf = raw.find("\n\n").map(|pos| (pos, pos + 2));
    crlf.into_iter()
        .chain(lf)
        .min_by_key(|(separator, _)| *separator)
        .map(|(_, start)| &raw[start..])
        .unwrap_or("")
}

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn score(&self, message: &EmailMessage) -> Result<ScoreResult, ScoringError> {
        let indicators = self.indicators(message);

        let clean = indicators
            .iter()
            .fold(1.0_f64, |acc, (_, weight)| acc * (1.0 - weight));
        let score = ((1.0 - clean) * 1000.0).round() / 1000.0;

        let explanation = if indicators.is_empty() {
            "No phishing indicators detected".to_string()
        } else {
            let names: Vec<&str> = indicators.iter().map(|(name, _)| *name).collect();
            format!("Phishing indicators: {}", names.join("; "))
        };

        log::debug!("Heuristic score {score:.3} from {} indicators", indicators.len());
        ScoreResult::new(score.clamp(0.0, 1.0), explanation)
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
