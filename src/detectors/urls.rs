//! URL/domain detector.
//!
//! Extracts every link the message carries (scheme'd URLs, bare
//! `www.` hosts, shortener paths, raw IP hosts) and scores each one on
//! structural phishing indicators. The per-message score is the mean
//! of the per-URL scores, lifted when more than one URL is suspicious.

use crate::detectors::{Detector, DetectorId, DetectorResult, SignalPayload};
use crate::message::Message;
use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use url::Url;

/// TLDs with disproportionate phishing abuse rates.
pub const SUSPICIOUS_TLDS: &[&str] = &[
    "xyz", "top", "club", "online", "site", "fun", "space", "info", "stream", "gq", "cf", "ga",
    "ml", "tk", "pw", "su", "icu", "work", "loan", "date", "faith", "review", "science", "trade",
    "webcam", "bid",
];

const URL_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "goo.gl",
    "t.co",
    "is.gd",
    "buff.ly",
    "rebrand.ly",
    "tiny.cc",
    "ow.ly",
    "cutt.ly",
    "short.io",
    "shorturl.at",
    "s.id",
    "v.gd",
];

/// Well-known domains used for look-alike comparison.
const LEGITIMATE_DOMAINS: &[&str] = &[
    "google.com",
    "microsoft.com",
    "apple.com",
    "amazon.com",
    "facebook.com",
    "twitter.com",
    "linkedin.com",
    "instagram.com",
    "youtube.com",
    "paypal.com",
    "paypal.co.uk",
    "amazon.co.uk",
    "netflix.com",
    "dropbox.com",
    "github.com",
    "adobe.com",
    "chase.com",
    "wellsfargo.com",
    "bankofamerica.com",
];

/// Public suffixes that occupy two host labels, so the registrable
/// domain needs three.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "co.jp", "co.nz", "co.za", "co.in", "com.au", "net.au",
    "org.au", "com.br", "com.mx", "com.cn", "com.sg", "com.hk",
];

const COMMON_BRANDS: &[&str] = &[
    "paypal",
    "microsoft",
    "apple",
    "google",
    "amazon",
    "facebook",
    "netflix",
    "chase",
    "wellsfargo",
    "bankofamerica",
    "americanexpress",
];

lazy_static! {
    static ref EXTRACT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap(),
        Regex::new(r#"\bwww\.[^\s<>"')\]]+"#).unwrap(),
        Regex::new(r"\b(?:bit\.ly|tinyurl\.com|goo\.gl|t\.co|is\.gd)/[A-Za-z0-9]+").unwrap(),
        Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(?::\d+)?/[^\s]*").unwrap(),
    ];
    static ref MISLEADING_PATH: Regex = RegexBuilder::new(
        r"/(login|signin|account|secure|verify|authenticate|webscr|update|confirm)"
    )
    .case_insensitive(true)
    .build()
    .unwrap();
    static ref IPV4_HOST: Regex = Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap();
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlAnalysis {
    pub url: String,
    /// Registrable domain, lowercased. Two host labels, or three over
    /// a multi-label public suffix such as `co.uk`.
    pub domain: String,
    pub tld: String,
    pub indicators: Vec<String>,
    pub score: f64,
    pub is_suspicious: bool,
    pub is_shortened: bool,
    pub is_ip_address: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UrlReport {
    pub urls_found: Vec<String>,
    pub analyses: Vec<UrlAnalysis>,
    pub suspicious_count: usize,
    pub overall_score: f64,
}

pub struct UrlDetector;

impl UrlDetector {
    pub fn new() -> Self {
        Self
    }

    /// Pull every URL out of the text, normalize missing schemes, and
    /// drop anything the `url` crate refuses to parse. Order is
    /// preserved and duplicates removed.
    pub fn extract_urls(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for pattern in EXTRACT_PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                found.push(m.as_str().trim_end_matches(['.', ',', ';']).to_string());
            }
        }

        let mut unique = Vec::new();
        for raw in found {
            let candidate = if raw.starts_with("http://") || raw.starts_with("https://") {
                raw
            } else {
                format!("http://{raw}")
            };
            match Url::parse(&candidate) {
                Ok(parsed) if parsed.host_str().is_some() => {
                    if !unique.contains(&candidate) {
                        unique.push(candidate);
                    }
                }
                _ => continue,
            }
        }
        unique
    }

    /// Registrable-domain approximation: the last two host labels, or
    /// three when the last two form a multi-label public suffix (so
    /// `www.paypal.co.uk` yields `paypal.co.uk`, not `co.uk`).
    fn registrable_domain(host: &str) -> String {
        let host = host.to_lowercase();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() >= 3 {
            let last_two = labels[labels.len() - 2..].join(".");
            if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
                return labels[labels.len() - 3..].join(".");
            }
        }
        if labels.len() >= 2 {
            labels[labels.len() - 2..].join(".")
        } else {
            host
        }
    }

    pub fn analyze_url(&self, raw: &str) -> Option<UrlAnalysis> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let domain = Self::registrable_domain(&host);
        let tld = domain.rsplit('.').next().unwrap_or("").to_string();
        let brand_label = domain.split('.').next().unwrap_or("").to_string();

        let mut analysis = UrlAnalysis {
            url: raw.to_string(),
            domain: domain.clone(),
            tld: tld.clone(),
            indicators: Vec::new(),
            score: 0.0,
            is_suspicious: false,
            is_shortened: false,
            is_ip_address: false,
        };

        if IPV4_HOST.is_match(&host) {
            analysis.is_ip_address = true;
            analysis
                .indicators
                .push("Uses IP address instead of domain name".to_string());
            analysis.score += 0.3;
        }

        if URL_SHORTENERS.contains(&domain.as_str()) {
            analysis.is_shortened = true;
            analysis
                .indicators
                .push("Uses URL shortening service".to_string());
            analysis.score += 0.2;
        }

        if SUSPICIOUS_TLDS.contains(&tld.as_str()) {
            analysis
                .indicators
                .push(format!("Uses suspicious TLD (.{tld})"));
            analysis.score += 0.25;
        }

        // host labels beyond registrable domain + one subdomain level
        if !analysis.is_ip_address && host.matches('.').count() > 3 {
            analysis.indicators.push("Excessive subdomains".to_string());
            analysis.score += 0.2;
        }

        // Brand name embedded in a domain that is not the brand's own.
        let is_known_good = LEGITIMATE_DOMAINS.contains(&domain.as_str());
        if !analysis.is_ip_address && !is_known_good {
            for brand in COMMON_BRANDS {
                if brand_label.contains(brand) {
                    analysis
                        .indicators
                        .push(format!("Potential {brand} impersonation"));
                    analysis.score += 0.35;

                    if brand_label.chars().any(|c| c.is_ascii_digit()) {
                        analysis
                            .indicators
                            .push("Uses numbers to replace letters in brand name".to_string());
                        analysis.score += 0.25;
                    }
                    break;
                }
            }

            // Look-alike scoring against the known-good set.
            for legit in LEGITIMATE_DOMAINS {
                let similarity = strsim::normalized_levenshtein(&domain, legit);
                if similarity > 0.7 && similarity < 0.99 && domain != *legit {
                    analysis.indicators.push(format!("Appears to mimic {legit}"));
                    analysis.score += 0.3;
                    break;
                }
            }
        }

        if host.contains('_') || host.contains('@') {
            analysis
                .indicators
                .push("Contains unusual characters in domain".to_string());
            analysis.score += 0.15;
        }

        // Credential-phish path on a domain that does not carry the brand.
        if MISLEADING_PATH.is_match(parsed.path()) {
            let path_lower = parsed.path().to_lowercase();
            for brand in COMMON_BRANDS {
                if path_lower.contains(brand) && !domain.contains(brand) {
                    analysis
                        .indicators
                        .push(format!("Path suggests {brand} but domain does not match"));
                    analysis.score += 0.25;
                    break;
                }
            }
        }

        analysis.score = analysis.score.min(1.0);
        analysis.is_suspicious = analysis.score >= 0.4;
        Some(analysis)
    }

    pub fn analyze_text(&self, text: &str) -> UrlReport {
        let urls = self.extract_urls(text);
        let analyses: Vec<UrlAnalysis> =
            urls.iter().filter_map(|u| self.analyze_url(u)).collect();

        let suspicious_count = analyses.iter().filter(|a| a.is_suspicious).count();
        let mut overall_score = if analyses.is_empty() {
            0.0
        } else {
            analyses.iter().map(|a| a.score).sum::<f64>() / analyses.len() as f64
        };
        if suspicious_count > 1 {
            overall_score = (overall_score * (1.0 + suspicious_count as f64 * 0.1)).min(1.0);
        }

        UrlReport {
            urls_found: urls,
            analyses,
            suspicious_count,
            overall_score,
        }
    }
}

impl Default for UrlDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for UrlDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Urls
    }

    async fn evaluate(&self, message: &Message) -> Result<DetectorResult> {
        let report = self.analyze_text(&message.content);
        log::debug!(
            "urls: {} found, {} suspicious, score {:.3}",
            report.urls_found.len(),
            report.suspicious_count,
            report.overall_score
        );
        Ok(DetectorResult::new(
            DetectorId::Urls,
            report.overall_score,
            SignalPayload::Urls(report),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_and_dedupe() {
        let d = UrlDetector::new();
        let urls = d.extract_urls(
            "Visit https://example.com/a and www.example.org, \
             then https://example.com/a again.",
        );
        assert_eq!(
            urls,
            vec![
                "https://example.com/a".to_string(),
                "http://www.example.org".to_string(),
            ]
        );
    }

    #[test]
    fn test_ip_and_shortener_flagged() {
        let d = UrlDetector::new();
        let ip = d.analyze_url("http://192.168.10.5/login").unwrap();
        assert!(ip.is_ip_address);
        assert!(ip.score >= 0.3);

        let short = d.analyze_url("http://bit.ly/3xYz").unwrap();
        assert!(short.is_shortened);
    }

    #[test]
    fn test_suspicious_tld_scored() {
        let d = UrlDetector::new();
        let a = d.analyze_url("http://promo-deals.xyz/claim").unwrap();
        assert!(a
            .indicators
            .iter()
            .any(|i| i.contains("suspicious TLD")));
    }

    #[test]
    fn test_brand_impersonation_in_domain() {
        let d = UrlDetector::new();
        let a = d.analyze_url("https://paypal-secure-login.xyz/verify").unwrap();
        assert!(a
            .indicators
            .iter()
            .any(|i| i.contains("paypal impersonation")));
        assert!(a.is_suspicious);

        let legit = d.analyze_url("https://www.paypal.com/signin").unwrap();
        assert!(!legit
            .indicators
            .iter()
            .any(|i| i.contains("impersonation")));
    }

    #[test]
    fn test_multi_label_tld_keeps_brand_label() {
        let d = UrlDetector::new();
        let a = d.analyze_url("https://www.paypal.co.uk/myaccount").unwrap();
        assert_eq!(a.domain, "paypal.co.uk");
        assert!(a.indicators.is_empty(), "indicators: {:?}", a.indicators);

        let not_brand = d.analyze_url("https://paypal-refund.co.uk/verify").unwrap();
        assert_eq!(not_brand.domain, "paypal-refund.co.uk");
        assert!(not_brand
            .indicators
            .iter()
            .any(|i| i.contains("paypal impersonation")));
    }

    #[test]
    fn test_lookalike_domain_flagged() {
        let d = UrlDetector::new();
        let a = d.analyze_url("https://paypaI.com/account").unwrap();
        assert!(
            a.indicators.iter().any(|i| i.starts_with("Appears to mimic")),
            "indicators: {:?}",
            a.indicators
        );
    }

    #[test]
    fn test_misleading_path() {
        let d = UrlDetector::new();
        let a = d
            .analyze_url("http://cdn-host.example.com/paypal/login")
            .unwrap();
        assert!(a
            .indicators
            .iter()
            .any(|i| i.contains("Path suggests paypal")));
    }

    #[tokio::test]
    async fn test_multi_url_uplift() {
        let d = UrlDetector::new();
        let single = d.analyze_text("see http://offer.xyz/a");
        let multi = d.analyze_text(
            "see http://offer.xyz/login?verify=paypal and http://192.0.2.1/paypal/confirm",
        );
        assert!(multi.overall_score >= single.overall_score);
        assert!(multi.overall_score <= 1.0);

        let msg = Message::new("a@b.com", "s", "no links here");
        let result = d.evaluate(&msg).await.unwrap();
        assert_eq!(result.score, 0.0);
    }
}
