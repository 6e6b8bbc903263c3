//! Explanation builder.
//!
//! Converts raw detector outputs into a deduplicated, priority-ordered
//! list of human-readable reasons and a single recommended action.
//! URL/domain and brand-impersonation reasons rank ahead of generic
//! tactic reasons; the list is truncated and never empty.

use crate::detectors::{DetectorResult, SignalPayload};

/// Maximum number of reasons returned.
pub const MAX_REASONS: usize = 5;

const FALLBACK_SUSPICIOUS: &str = "Combination of subtle factors indicates potential phishing";
const FALLBACK_LEGITIMATE: &str = "No suspicious indicators detected";

fn tactic_reason(tactic: &str) -> String {
    match tactic {
        "urgency" => "Creates a false sense of urgency".to_string(),
        "fear" => "Uses fear tactics to manipulate".to_string(),
        "reward" => "Exploits desire for rewards or financial gain".to_string(),
        "curiosity" => "Exploits natural curiosity to encourage clicking".to_string(),
        "authority" => "Impersonates authority figures to increase compliance".to_string(),
        other => format!("Uses {} manipulation tactic", other.replace('_', " ")),
    }
}

/// Build the ranked reason list. Reasons come in two tiers: evidence
/// tied to URLs, domains, or an impersonated brand first, generic
/// tactic observations second. Duplicates are dropped by string
/// identity, first occurrence wins.
pub fn build_reasons(results: &[DetectorResult], suspicious: bool) -> Vec<String> {
    let mut priority: Vec<String> = Vec::new();
    let mut generic: Vec<String> = Vec::new();

    for result in results {
        match &result.payload {
            SignalPayload::Urls(report) => {
                if report.suspicious_count > 0 {
                    priority.push(format!(
                        "Contains {} suspicious URL{}",
                        report.suspicious_count,
                        if report.suspicious_count == 1 { "" } else { "s" }
                    ));
                }
            }
            SignalPayload::Knowledge(report) => {
                if let Some(judgment) = &report.brand_judgment {
                    priority.push(format!("Impersonates {}", judgment.brand));
                }
                for tactic in report.tactics_matched.keys().take(2) {
                    generic.push(tactic_reason(tactic));
                }
            }
            SignalPayload::BrandVisual(report) => {
                if let Some(brand) = &report.impersonated_brand {
                    priority.push(format!(
                        "Found {brand} logo in a message from an unrelated domain"
                    ));
                }
            }
            SignalPayload::Tactics(report) => {
                for tactic in report.tactics_detected.keys() {
                    generic.push(tactic_reason(tactic));
                }
                if !report.sender_issues.is_empty() {
                    generic.push(format!(
                        "Sender address raises red flags: {}",
                        report.sender_issues.join(", ")
                    ));
                }
            }
            SignalPayload::Llm(judgment) => {
                for technique in judgment.techniques_detected.iter().take(2) {
                    generic.push(format!("Shows patterns of {technique}"));
                }
            }
        }
    }

    let mut reasons: Vec<String> = Vec::new();
    for reason in priority.into_iter().chain(generic) {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
        if reasons.len() == MAX_REASONS {
            break;
        }
    }

    if reasons.is_empty() {
        reasons.push(if suspicious {
            FALLBACK_SUSPICIOUS.to_string()
        } else {
            FALLBACK_LEGITIMATE.to_string()
        });
    }

    reasons
}

/// Single recommendation string, first matching rule wins:
/// named impersonated brand, then urgency/fear as the primary tactic,
/// then suspicious URLs, then a generic caution.
pub fn build_recommendation(results: &[DetectorResult], suspicious: bool) -> String {
    if !suspicious {
        return "This message appears legitimate, but always verify sensitive requests \
                through official channels."
            .to_string();
    }

    let mut impersonated_brand: Option<String> = None;
    let mut primary_tactic: Option<String> = None;
    let mut suspicious_urls = 0usize;

    for result in results {
        match &result.payload {
            SignalPayload::Knowledge(report) => {
                if impersonated_brand.is_none() {
                    impersonated_brand = report.brand_judgment.as_ref().map(|j| j.brand.clone());
                }
            }
            SignalPayload::BrandVisual(report) => {
                if impersonated_brand.is_none() {
                    impersonated_brand = report.impersonated_brand.clone();
                }
            }
            SignalPayload::Tactics(report) => {
                primary_tactic = report.primary_tactic.clone();
            }
            SignalPayload::Urls(report) => {
                suspicious_urls = report.suspicious_count;
            }
            SignalPayload::Llm(_) => {}
        }
    }

    if let Some(brand) = impersonated_brand {
        return format!(
            "This message appears to be impersonating {brand}. Do not interact with it or \
             click any links. If you need to verify information, visit the official {brand} \
             website directly by typing the address in your browser."
        );
    }

    match primary_tactic.as_deref() {
        Some("urgency") => {
            return "This message uses urgency tactics to pressure you into action. \
                    Legitimate organizations rarely use these tactics. Take time to verify \
                    before responding."
                .to_string()
        }
        Some("fear") => {
            return "This message uses fear tactics to manipulate you. Contact the purported \
                    sender through official channels to verify the message's legitimacy."
                .to_string()
        }
        _ => {}
    }

    if suspicious_urls > 0 {
        return "This message contains suspicious links. Do not click on them. If you need \
                to visit the website, type the official address directly in your browser."
            .to_string();
    }

    "This message shows signs of being a phishing attempt. Exercise caution and verify \
     through official channels before taking any action."
        .to_string()
}
