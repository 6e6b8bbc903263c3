//! Manipulation-tactic detector.
//!
//! Scans subject + body against regex families for the psychological
//! tactics phishing leans on (urgency, fear, authority, reward,
//! sensitive-information requests, impersonation wording, pressure,
//! generic greetings, poor grammar). Per-tactic scores are capped and
//! combined with a diminishing-returns product so stacking tactics
//! never pushes the score past 1.0. Also flags structural red flags in
//! the sender address itself.

use crate::detectors::{Detector, DetectorId, DetectorResult, SignalPayload};
use crate::message::Message;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cap applied to any single tactic's score.
const TACTIC_SCORE_CAP: f64 = 0.9;
/// Matched phrases kept per tactic in the payload.
const MAX_PHRASES_PER_TACTIC: usize = 5;

const URGENCY_PATTERNS: &[&str] = &[
    r"\b(urgent|immediately|asap|right away|promptly|time-sensitive)\b",
    r"\b(act now|expir(e|es|ed|ing)|within \d+ (hour|day|minute)s?)\b",
    r"\b(limited time|deadline|running out|last chance)\b",
    r"\b(quick|immediate|prompt) (action|attention|response) (required|needed)\b",
    r"\baccount.{1,20}(suspend|terminat|cancel|clos|block)",
    r"\b(don't|do not) delay\b",
    r"\baction (needed|required)\b",
];

const FEAR_PATTERNS: &[&str] = &[
    r"\b(suspicious|unauthorized|unusual) (activity|access|login|sign-in|transaction)\b",
    r"\bsecurity (issue|problem|concern|violation|breach|incident|alert|warning)\b",
    r"\baccount.{1,20}(compromised|hacked|breached|at risk|vulnerable)\b",
    r"\b(detect|notic|found|identify).{1,20}(suspicious|unusual|unauthorized|strange)\b",
    r"\b(fraud|fraudulent|scam|theft|stolen)\b",
    r"\byour (information|data|identity).{1,20}(risk|danger|exposed|compromised|vulnerable)\b",
    r"\bviolation of.{1,20}(policy|agreement|terms|security)\b",
    r"\blegal.{1,20}(action|consequence|proceeding|notice)\b",
];

const AUTHORITY_PATTERNS: &[&str] = &[
    r"\b(official|authorized|mandatory) (notice|notification|communication|message|alert)\b",
    r"\b(compliance|policy|regulation|requirement)\b",
    r"\b(legal|regulatory|mandatory) (requirement|obligation|compliance|action)\b",
    r"\b(security|management|administrative|executive) team\b",
    r"\b(corporate|company|enterprise|business|organizational) (policy|directive|mandate)\b",
    r"\b(verify|confirm|validate|authenticate).{1,20}(compliance|adherence)\b",
];

const REWARD_PATTERNS: &[&str] = &[
    r"\b(congratulations|winner|won|award|prize|reward|discount|bonus|free|gift)\b",
    r"\b(selected|chosen|exclusive|special) (offer|promotion|deal|discount)\b",
    r"\b(claim|redeem|collect) (your|the) (prize|reward|gift|offer|money)\b",
    r"\byou.{1,20}(won|earned|awarded|granted|entitled to|qualify for)\b",
    r"\b(million|thousand|hundred).{1,30}(dollar|euro|pound|USD|EUR|GBP)\b",
    r"\b(lottery|jackpot|sweepstake|draw|competition)\b",
    r"\blimited.{1,20}(offer|promotion|opportunity|deal)\b",
    r"\b(inheritance|beneficiary|next of kin)\b",
];

const SENSITIVE_REQUEST_PATTERNS: &[&str] = &[
    r"\b(confirm|update|verify|validate|provide).{1,30}(password|username|login|credential)",
    r"\b(SSN|social security|tax ID|passport number|driver'?s license)\b",
    r"\b(credit card|card number|CVV|expiration date|security code)\b",
    r"\b(bank account|routing number|sort code|IBAN|PIN)\b",
    r"\b(personal|private|sensitive|confidential).{1,20}information\b",
    r"\b(click|follow).{1,30}(link|button|attachment).{1,30}(verify|confirm|update|sign in|login)\b",
    r"\b(form|document).{1,30}(fill|complete|submit)\b",
];

const IMPERSONATION_PATTERNS: &[&str] = &[
    r"\b(tech support|customer service|help desk|support team|service team)\b",
    r"\b(IT|technical|system) (department|administrator|admin|team|specialist|support)\b",
    r"\b(account|security|payment|billing) (team|department|specialist|group|division)\b",
    r"\b(automated|system) (message|notification|alert)\b",
    r"\b(copyright|DMCA|intellectual property|legal).{1,30}(violation|infringement|notice)\b",
    r"\b(CEO|CFO|CIO|CTO|founder|executive).{1,30}(request|asking|needs|requires)\b",
];

const PRESSURE_PATTERNS: &[&str] = &[
    r"\b(only|just).{1,10}(few|limited|available).{1,10}(left|remaining)\b",
    r"\b(don't|do not).{1,20}(miss out|lose|wait|hesitate|delay)\b",
    r"\b(guaranteed|promise|assure|ensure).{1,20}(success|result|outcome|benefit)\b",
    r"\b(secret|confidential|private|exclusive).{1,20}(method|technique|approach|strategy|offer)\b",
    r"\b(before|until).{1,10}(too late|expire|end|run out)\b",
    r"\b(must|need to|have to|required to).{1,20}(act|respond|reply|click|follow|complete)\b",
];

const GENERIC_GREETING_PATTERNS: &[&str] = &[
    r"\b(dear|hello|hi|greetings).{1,20}(customer|user|client|member|account holder|valued)\b",
    r"\b(dear|hello|hi|greetings).{1,20}(sir|madam|valued customer)\b",
    r"\b(attention|notice to|alert to).{1,20}(user|customer|client|account holder)\b",
];

const POOR_GRAMMAR_PATTERNS: &[&str] = &[
    r"\bkindly\b",
    r"\bdo the needful\b",
    r"\brevert back\b",
    r"\bpls\b",
    r"\b100% guarantee\b",
    r"\byours? faithfully\b",
    r"\bgreetings of the day\b",
];

/// Structural red flags in the sender address, independent of the text.
const SENDER_PATTERNS: &[(&str, &str)] = &[
    (r"@.*\.(xyz|top|club|online|site|icu|space)\b", "Suspicious TLD"),
    (r"@[^.\s]*-[^.\s]*\.", "Hyphenated domain"),
    (r"@[^.\s]*\d+[^.\s]*\.", "Numeric domain"),
    (
        r"(noreply|no-reply|no\.reply|donotreply|alert|security|verify|support)@",
        "Generic sender",
    ),
    (
        r"@(gmail|yahoo|hotmail|outlook|aol|protonmail)\.(com|net|org)",
        "Consumer mailbox for business communication",
    ),
];

#[derive(Debug, Clone, Serialize)]
pub struct TacticHit {
    pub score: f64,
    pub matches: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TacticsReport {
    /// Tactic name -> hit details, in deterministic order.
    pub tactics_detected: BTreeMap<String, TacticHit>,
    pub manipulative_phrases: Vec<String>,
    /// Tactic with the most raw matches, when any matched.
    pub primary_tactic: Option<String>,
    pub sender_issues: Vec<String>,
    pub sender_score: f64,
}

struct TacticFamily {
    name: &'static str,
    weight: f64,
    patterns: Vec<Regex>,
}

pub struct TacticsDetector {
    families: Vec<TacticFamily>,
    sender_patterns: Vec<(Regex, &'static str)>,
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid tactic pattern: {p}"))
        })
        .collect()
}

impl TacticsDetector {
    pub fn new() -> Result<Self> {
        // Sensitive requests and impersonation wording weigh heaviest,
        // then urgency/fear; grammar tells are the weakest signal.
        let families = vec![
            TacticFamily {
                name: "urgency",
                weight: 0.2,
                patterns: compile_all(URGENCY_PATTERNS)?,
            },
            TacticFamily {
                name: "fear",
                weight: 0.2,
                patterns: compile_all(FEAR_PATTERNS)?,
            },
            TacticFamily {
                name: "authority",
                weight: 0.15,
                patterns: compile_all(AUTHORITY_PATTERNS)?,
            },
            TacticFamily {
                name: "reward",
                weight: 0.15,
                patterns: compile_all(REWARD_PATTERNS)?,
            },
            TacticFamily {
                name: "sensitive_request",
                weight: 0.25,
                patterns: compile_all(SENSITIVE_REQUEST_PATTERNS)?,
            },
            TacticFamily {
                name: "impersonation",
                weight: 0.25,
                patterns: compile_all(IMPERSONATION_PATTERNS)?,
            },
            TacticFamily {
                name: "pressure",
                weight: 0.15,
                patterns: compile_all(PRESSURE_PATTERNS)?,
            },
            TacticFamily {
                name: "generic_greeting",
                weight: 0.15,
                patterns: compile_all(GENERIC_GREETING_PATTERNS)?,
            },
            TacticFamily {
                name: "poor_grammar",
                weight: 0.1,
                patterns: compile_all(POOR_GRAMMAR_PATTERNS)?,
            },
        ];

        let sender_patterns = SENDER_PATTERNS
            .iter()
            .map(|(p, issue)| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, *issue))
                    .with_context(|| format!("invalid sender pattern: {p}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            families,
            sender_patterns,
        })
    }

    pub fn analyze_text(&self, text: &str) -> TacticsReport {
        let mut report = TacticsReport::default();
        let mut best: Option<(&str, usize)> = None;

        for family in &self.families {
            let mut matches: Vec<String> = Vec::new();
            for pattern in &family.patterns {
                for m in pattern.find_iter(text) {
                    matches.push(m.as_str().to_string());
                }
            }
            if matches.is_empty() {
                continue;
            }

            let count = matches.len();
            let score = (count as f64 * family.weight).min(TACTIC_SCORE_CAP);
            matches.truncate(MAX_PHRASES_PER_TACTIC);

            for phrase in &matches {
                let lowered = phrase.to_lowercase();
                if !report
                    .manipulative_phrases
                    .iter()
                    .any(|p| p.to_lowercase() == lowered)
                {
                    report.manipulative_phrases.push(phrase.clone());
                }
            }

            report.tactics_detected.insert(
                family.name.to_string(),
                TacticHit {
                    score,
                    matches,
                    count,
                },
            );

            if best.map_or(true, |(_, c)| count > c) {
                best = Some((family.name, count));
            }
        }

        report.primary_tactic = best.map(|(name, _)| name.to_string());
        report
    }

    fn analyze_sender(&self, sender: &str, report: &mut TacticsReport) {
        for (pattern, issue) in &self.sender_patterns {
            if pattern.is_match(sender) {
                report.sender_score += 0.15;
                report.sender_issues.push(issue.to_string());
            }
        }
        report.sender_score = report.sender_score.min(1.0);
    }

    /// Combined score: diminishing-returns product over all detected
    /// tactic scores, so n weak tactics never outrank one strong one by
    /// simple accumulation.
    fn combined_score(report: &TacticsReport) -> f64 {
        let mut remainder = 1.0;
        for hit in report.tactics_detected.values() {
            remainder *= 1.0 - hit.score;
        }
        1.0 - remainder
    }
}

#[async_trait]
impl Detector for TacticsDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Tactics
    }

    async fn evaluate(&self, message: &Message) -> Result<DetectorResult> {
        let mut report = self.analyze_text(&message.combined_text());
        self.analyze_sender(&message.sender, &mut report);

        let score = Self::combined_score(&report);
        log::debug!(
            "tactics: {} tactic(s), score {:.3}, primary {:?}",
            report.tactics_detected.len(),
            score,
            report.primary_tactic
        );

        Ok(DetectorResult::new(
            DetectorId::Tactics,
            score,
            SignalPayload::Tactics(report),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> TacticsDetector {
        TacticsDetector::new().unwrap()
    }

    #[tokio::test]
    async fn test_clean_message_scores_zero() {
        let msg = Message::new(
            "colleague@example.com",
            "Lunch on Thursday",
            "Want to grab lunch at the usual place this Thursday?",
        );
        let result = detector().evaluate(&msg).await.unwrap();
        assert_eq!(result.score, 0.0);
        if let SignalPayload::Tactics(report) = result.payload {
            assert!(report.tactics_detected.is_empty());
            assert!(report.primary_tactic.is_none());
        } else {
            panic!("wrong payload kind");
        }
    }

    #[tokio::test]
    async fn test_urgency_and_fear_detected() {
        let msg = Message::new(
            "security@paypal-alerts.xyz",
            "Urgent: suspicious activity on your account",
            "We detected unauthorized access. Act now or your account will be suspended. \
             Verify your password immediately.",
        );
        let result = detector().evaluate(&msg).await.unwrap();
        assert!(result.score > 0.5, "score was {}", result.score);

        if let SignalPayload::Tactics(report) = result.payload {
            assert!(report.tactics_detected.contains_key("urgency"));
            assert!(report.tactics_detected.contains_key("fear"));
            assert!(report.primary_tactic.is_some());
            assert!(!report.manipulative_phrases.is_empty());
        } else {
            panic!("wrong payload kind");
        }
    }

    #[test]
    fn test_diminishing_returns_stays_below_one() {
        let d = detector();
        let text = "URGENT act now! Suspicious activity detected. You won a prize. \
                    Kindly verify your password and credit card CVV immediately. \
                    Dear valued customer, do the needful before it is too late. \
                    Limited time offer from the security team.";
        let report = d.analyze_text(text);
        let score = TacticsDetector::combined_score(&report);
        assert!(score > 0.8);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_per_tactic_cap() {
        let d = detector();
        let text = "urgent urgent urgent urgent urgent urgent urgent urgent";
        let report = d.analyze_text(text);
        let hit = report.tactics_detected.get("urgency").unwrap();
        assert!(hit.score <= TACTIC_SCORE_CAP);
        assert!(hit.matches.len() <= MAX_PHRASES_PER_TACTIC);
        assert_eq!(hit.count, 8);
    }

    #[test]
    fn test_sender_red_flags() {
        let d = detector();
        let mut report = TacticsReport::default();
        d.analyze_sender("security@paypal-alerts.xyz", &mut report);
        assert!(report.sender_issues.contains(&"Suspicious TLD".to_string()));
        assert!(report.sender_issues.contains(&"Hyphenated domain".to_string()));
        assert!(report.sender_score > 0.0);
        assert!(report.sender_score <= 1.0);
    }
}
