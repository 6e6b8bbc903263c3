//! Brand and tactic knowledge records.
//!
//! Ships with a built-in default set and can be overridden from a YAML
//! file. The knowledge detector retrieves from this; nothing here runs
//! per-message logic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandRecord {
    /// Domains the brand legitimately sends from.
    pub domains: Vec<String>,
    /// Phrases whose presence suggests the message talks about this brand.
    pub indicators: Vec<String>,
    /// Subject lines commonly seen in phishing runs against this brand.
    #[serde(default)]
    pub common_subjects: Vec<String>,
    /// Sender-address fragments typical of impersonation attempts.
    #[serde(default)]
    pub suspicious_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub brands: BTreeMap<String, BrandRecord>,
    /// Tactic name -> indicator phrases matched by substring.
    pub tactics: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl KnowledgeBase {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read knowledge base: {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("invalid knowledge base: {}", path.display()))
            }
            None => Ok(Self::builtin()),
        }
    }

    pub fn builtin() -> Self {
        let mut brands = BTreeMap::new();

        brands.insert(
            "Microsoft".to_string(),
            BrandRecord {
                domains: strings(&["microsoft.com", "office.com", "outlook.com", "live.com"]),
                indicators: strings(&["microsoft 365", "office 365", "azure", "outlook", "microsoft account"]),
                common_subjects: strings(&[
                    "your microsoft account password will expire",
                    "microsoft 365 subscription",
                ]),
                suspicious_patterns: strings(&["microsoft-", "-microsoft", "msft-", "micros0ft"]),
            },
        );
        brands.insert(
            "PayPal".to_string(),
            BrandRecord {
                domains: strings(&["paypal.com", "paypal.co.uk"]),
                indicators: strings(&["paypal account", "paypal", "transaction", "payment on hold"]),
                common_subjects: strings(&[
                    "unusual activity in your paypal account",
                    "your paypal account has been limited",
                ]),
                suspicious_patterns: strings(&["paypal-", "-paypal", "paypa1", "pay-pal"]),
            },
        );
        brands.insert(
            "Amazon".to_string(),
            BrandRecord {
                domains: strings(&["amazon.com", "amazon.co.uk", "amazonses.com"]),
                indicators: strings(&["amazon order", "amazon prime", "your delivery", "amazon"]),
                common_subjects: strings(&[
                    "problem with your amazon order",
                    "your amazon prime membership",
                ]),
                suspicious_patterns: strings(&["amazon-", "-amazon", "amaz0n"]),
            },
        );
        brands.insert(
            "Apple".to_string(),
            BrandRecord {
                domains: strings(&["apple.com", "icloud.com"]),
                indicators: strings(&["apple id", "icloud", "itunes", "apple"]),
                common_subjects: strings(&[
                    "your apple id was used to sign in",
                    "your apple id has been locked",
                ]),
                suspicious_patterns: strings(&["apple-", "-apple", "appleid-"]),
            },
        );
        brands.insert(
            "Google".to_string(),
            BrandRecord {
                domains: strings(&["google.com", "gmail.com", "googlemail.com"]),
                indicators: strings(&["google account", "gmail", "sign-in attempt", "google"]),
                common_subjects: strings(&["sign-in attempt requires verification"]),
                suspicious_patterns: strings(&["google-", "-google", "g00gle"]),
            },
        );
        brands.insert(
            "Bank of America".to_string(),
            BrandRecord {
                domains: strings(&["bankofamerica.com", "bofa.com"]),
                indicators: strings(&["bank of america", "checking account", "online banking"]),
                common_subjects: strings(&["we've limited your access"]),
                suspicious_patterns: strings(&["bankofamerica-", "bofa-"]),
            },
        );
        brands.insert(
            "Chase".to_string(),
            BrandRecord {
                domains: strings(&["chase.com", "jpmorgan.com"]),
                indicators: strings(&["chase account", "chase bank", "chase credit card"]),
                common_subjects: strings(&["your chase account has been locked"]),
                suspicious_patterns: strings(&["chase-", "-chase"]),
            },
        );
        brands.insert(
            "Wells Fargo".to_string(),
            BrandRecord {
                domains: strings(&["wellsfargo.com"]),
                indicators: strings(&["wells fargo", "wells fargo account"]),
                common_subjects: strings(&["your wells fargo account has been temporarily suspended"]),
                suspicious_patterns: strings(&["wellsfargo-", "wells-fargo"]),
            },
        );

        let mut tactics = BTreeMap::new();
        tactics.insert(
            "urgency".to_string(),
            strings(&[
                "urgent",
                "immediately",
                "act now",
                "asap",
                "expires today",
                "last chance",
                "limited time",
                "within 24 hours",
            ]),
        );
        tactics.insert(
            "fear".to_string(),
            strings(&[
                "suspicious activity",
                "unauthorized access",
                "account suspended",
                "account locked",
                "security alert",
                "unusual sign-in",
                "compromised",
                "fraudulent",
            ]),
        );
        tactics.insert(
            "reward".to_string(),
            strings(&[
                "congratulations",
                "you have won",
                "claim your prize",
                "free gift",
                "exclusive offer",
            ]),
        );
        tactics.insert(
            "authority".to_string(),
            strings(&[
                "official notice",
                "compliance",
                "security team",
                "system administrator",
                "on behalf of",
            ]),
        );
        tactics.insert(
            "request_for_information".to_string(),
            strings(&[
                "verify your account",
                "confirm your identity",
                "update your payment",
                "password",
                "credit card",
                "social security",
                "billing information",
            ]),
        );

        Self { brands, tactics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_nonempty_and_consistent() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.brands.len() >= 5);
        assert!(kb.tactics.len() >= 4);
        for (name, record) in &kb.brands {
            assert!(!record.domains.is_empty(), "{name} has no domains");
            assert!(!record.indicators.is_empty(), "{name} has no indicators");
        }
    }

    #[test]
    fn test_yaml_round_trip() {
        let kb = KnowledgeBase::builtin();
        let yaml = serde_yaml::to_string(&kb).unwrap();
        let back: KnowledgeBase = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.brands.len(), kb.brands.len());
        assert_eq!(back.tactics.len(), kb.tactics.len());
    }

    #[test]
    fn test_missing_override_file_is_an_error() {
        let err = KnowledgeBase::load(Some(Path::new("/nonexistent/kb.yaml")));
        assert!(err.is_err());
    }
}
