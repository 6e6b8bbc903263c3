//! Suspicious-domain extraction.
//!
//! Post-processes the URL detector's per-URL output, together with any
//! brand-impersonation judgment, into one record per flagged domain. A
//! domain is flagged when its TLD is on the known-bad list, or when a
//! brand judgment names a brand the domain does not belong to. Both
//! indicator tags are recorded when both apply.

use crate::detectors::urls::{UrlReport, SUSPICIOUS_TLDS};
use crate::detectors::BrandJudgment;
use serde::Serialize;
use std::collections::BTreeMap;

/// Fixed severity assigned to every flagged domain.
pub const SUSPICIOUS_DOMAIN_SEVERITY: f64 = 0.8;

pub const TAG_SUSPICIOUS_TLD: &str = "Suspicious TLD";
pub const TAG_IMPERSONATION: &str = "Impersonation";

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousDomain {
    pub domain: String,
    /// First URL that referenced the domain.
    pub url: String,
    pub score: f64,
    pub indicators: Vec<String>,
}

pub fn extract_suspicious_domains(
    url_report: Option<&UrlReport>,
    judgment: Option<&BrandJudgment>,
) -> Vec<SuspiciousDomain> {
    let Some(report) = url_report else {
        return Vec::new();
    };

    let mut flagged: BTreeMap<String, SuspiciousDomain> = BTreeMap::new();
    for analysis in &report.analyses {
        let mut tags = Vec::new();

        if SUSPICIOUS_TLDS.contains(&analysis.tld.as_str()) {
            tags.push(TAG_SUSPICIOUS_TLD.to_string());
        }

        if let Some(judgment) = judgment {
            let belongs_to_brand = judgment.legitimate_domains.iter().any(|legit| {
                analysis.domain == *legit || analysis.domain.ends_with(&format!(".{legit}"))
            });
            if !belongs_to_brand {
                tags.push(TAG_IMPERSONATION.to_string());
            }
        }

        if tags.is_empty() {
            continue;
        }

        let entry = flagged
            .entry(analysis.domain.clone())
            .or_insert_with(|| SuspiciousDomain {
                domain: analysis.domain.clone(),
                url: analysis.url.clone(),
                score: SUSPICIOUS_DOMAIN_SEVERITY,
                indicators: Vec::new(),
            });
        for tag in tags {
            if !entry.indicators.contains(&tag) {
                entry.indicators.push(tag);
            }
        }
    }

    flagged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::urls::UrlDetector;

    fn report_for(text: &str) -> UrlReport {
        UrlDetector::new().analyze_text(text)
    }

    fn paypal_judgment() -> BrandJudgment {
        BrandJudgment {
            brand: "PayPal".to_string(),
            confidence: 0.8,
            legitimate_domains: vec!["paypal.com".to_string(), "paypal.co.uk".to_string()],
            matched_patterns: vec![],
        }
    }

    #[test]
    fn test_bad_tld_and_brand_mismatch_yield_both_tags_once() {
        let report = report_for("click http://paypal-verify.xyz/login now");
        let judgment = paypal_judgment();
        let domains = extract_suspicious_domains(Some(&report), Some(&judgment));

        assert_eq!(domains.len(), 1);
        let record = &domains[0];
        assert_eq!(record.domain, "paypal-verify.xyz");
        assert_eq!(record.score, SUSPICIOUS_DOMAIN_SEVERITY);
        assert!(record.indicators.contains(&TAG_SUSPICIOUS_TLD.to_string()));
        assert!(record.indicators.contains(&TAG_IMPERSONATION.to_string()));
        assert_eq!(record.indicators.len(), 2);
    }

    #[test]
    fn test_duplicate_urls_collapse_to_one_record() {
        let report = report_for("see http://deals.xyz/a and http://deals.xyz/b");
        let domains = extract_suspicious_domains(Some(&report), None);
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].domain, "deals.xyz");
        assert_eq!(domains[0].indicators, vec![TAG_SUSPICIOUS_TLD.to_string()]);
    }

    #[test]
    fn test_multi_label_tld_brand_domain_not_flagged() {
        let report = report_for("log in at https://www.paypal.co.uk/myaccount");
        let judgment = paypal_judgment();
        let domains = extract_suspicious_domains(Some(&report), Some(&judgment));
        assert!(domains.is_empty(), "flagged: {domains:?}");
    }

    #[test]
    fn test_brand_domain_not_flagged_by_judgment() {
        let report = report_for("pay at https://www.paypal.com/checkout");
        let judgment = paypal_judgment();
        let domains = extract_suspicious_domains(Some(&report), Some(&judgment));
        assert!(domains.is_empty());
    }

    #[test]
    fn test_safe_tld_without_judgment_not_flagged() {
        let report = report_for("docs at https://example.com/manual");
        assert!(extract_suspicious_domains(Some(&report), None).is_empty());
        assert!(extract_suspicious_domains(None, None).is_empty());
    }
}
