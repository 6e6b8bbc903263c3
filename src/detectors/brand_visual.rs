//! Brand/logo detector.
//!
//! Looks at the rendered HTML body for brand imagery: `<img>` tags
//! whose filename or alt text matches a known brand's logo
//! fingerprint, plus CSS `background-image` URLs. When the strongest
//! matched brand's imagery is present but the sender domain does not
//! belong to that brand, the message is reported as a possible visual
//! impersonation.

use crate::detectors::{Detector, DetectorId, DetectorResult, SignalPayload};
use crate::message::Message;
use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

struct BrandFingerprint {
    brand: &'static str,
    /// Filename fragments that suggest this brand's logo asset.
    file_tokens: &'static [&'static str],
    /// Keywords expected in alt text or in the brand's own domains.
    keywords: &'static [&'static str],
    domains: &'static [&'static str],
}

const FINGERPRINTS: &[BrandFingerprint] = &[
    BrandFingerprint {
        brand: "Microsoft",
        file_tokens: &["microsoft", "msft", "ms-logo", "office365"],
        keywords: &["microsoft", "windows", "office", "outlook", "azure"],
        domains: &["microsoft.com", "office.com", "outlook.com", "live.com"],
    },
    BrandFingerprint {
        brand: "Apple",
        file_tokens: &["apple", "icloud", "itunes"],
        keywords: &["apple", "iphone", "ipad", "icloud", "apple id"],
        domains: &["apple.com", "icloud.com"],
    },
    BrandFingerprint {
        brand: "Google",
        file_tokens: &["google", "gmail", "gsuite"],
        keywords: &["google", "gmail", "google drive", "android"],
        domains: &["google.com", "gmail.com", "googlemail.com"],
    },
    BrandFingerprint {
        brand: "Amazon",
        file_tokens: &["amazon", "aws", "prime"],
        keywords: &["amazon", "aws", "prime", "alexa"],
        domains: &["amazon.com", "amazonaws.com"],
    },
    BrandFingerprint {
        brand: "PayPal",
        file_tokens: &["paypal", "pay-pal"],
        keywords: &["paypal", "pay pal"],
        domains: &["paypal.com", "paypal.co.uk"],
    },
    BrandFingerprint {
        brand: "Netflix",
        file_tokens: &["netflix"],
        keywords: &["netflix", "streaming"],
        domains: &["netflix.com"],
    },
    BrandFingerprint {
        brand: "Chase",
        file_tokens: &["chase", "jpmorgan"],
        keywords: &["chase", "chase bank"],
        domains: &["chase.com", "jpmorgan.com"],
    },
];

lazy_static! {
    static ref IMG_TAG: Regex = RegexBuilder::new(r"<img\b[^>]*>")
        .case_insensitive(true)
        .build()
        .unwrap();
    static ref SRC_ATTR: Regex = RegexBuilder::new(r#"src\s*=\s*["']([^"']+)["']"#)
        .case_insensitive(true)
        .build()
        .unwrap();
    static ref ALT_ATTR: Regex = RegexBuilder::new(r#"alt\s*=\s*["']([^"']*)["']"#)
        .case_insensitive(true)
        .build()
        .unwrap();
    static ref BACKGROUND_URL: Regex =
        RegexBuilder::new(r#"background(?:-image)?\s*:\s*url\(\s*["']?([^"')]+)["']?\s*\)"#)
            .case_insensitive(true)
            .build()
            .unwrap();
    static ref IMAGE_EXT: Regex = RegexBuilder::new(r"\.(png|jpe?g|svg|gif|webp)(\?|$)")
        .case_insensitive(true)
        .build()
        .unwrap();
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrandMatch {
    pub brand: String,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VisualReport {
    pub images_examined: usize,
    pub brand_matches: Vec<BrandMatch>,
    pub impersonation_detected: bool,
    pub impersonated_brand: Option<String>,
    pub impersonation_confidence: f64,
}

pub struct BrandVisualDetector;

impl BrandVisualDetector {
    pub fn new() -> Self {
        Self
    }

    fn extract_images(html: &str) -> Vec<ImageRef> {
        let mut images = Vec::new();
        for tag in IMG_TAG.find_iter(html) {
            let tag = tag.as_str();
            let src = SRC_ATTR
                .captures(tag)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            if src.is_empty() {
                continue;
            }
            let alt = ALT_ATTR
                .captures(tag)
                .map(|c| c[1].to_lowercase())
                .unwrap_or_default();
            images.push(ImageRef { src, alt });
        }
        for cap in BACKGROUND_URL.captures_iter(html) {
            images.push(ImageRef {
                src: cap[1].to_string(),
                alt: String::new(),
            });
        }
        images
    }

    fn score_image(fp: &BrandFingerprint, image: &ImageRef) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let src_lower = image.src.to_lowercase();

        if IMAGE_EXT.is_match(&src_lower)
            && fp.file_tokens.iter().any(|t| src_lower.contains(t))
        {
            score += 0.4;
            reasons.push(format!("Filename matches {} logo pattern", fp.brand));
        }
        if let Some(keyword) = fp.keywords.iter().find(|k| image.alt.contains(*k)) {
            score += 0.3;
            reasons.push(format!("Alt text mentions {keyword}"));
        }
        (score, reasons)
    }

    pub fn analyze_html(&self, html: &str, sender_domain: Option<&str>) -> VisualReport {
        let images = Self::extract_images(html);
        let mut report = VisualReport {
            images_examined: images.len(),
            ..VisualReport::default()
        };

        let mut strongest: Option<(&BrandFingerprint, f64)> = None;
        for fp in FINGERPRINTS {
            let mut best_score = 0.0;
            let mut best_reasons = Vec::new();
            for image in &images {
                let (score, reasons) = Self::score_image(fp, image);
                if score > best_score {
                    best_score = score;
                    best_reasons = reasons;
                }
            }
            if best_score > 0.3 {
                report.brand_matches.push(BrandMatch {
                    brand: fp.brand.to_string(),
                    score: best_score,
                    reasons: best_reasons,
                });
                if strongest.map_or(true, |(_, s)| best_score > s) {
                    strongest = Some((fp, best_score));
                }
            }
        }

        // Imagery alone is not impersonation; the mismatch with the
        // sender's actual domain is.
        if let (Some((fp, score)), Some(domain)) = (strongest, sender_domain) {
            let legitimate = fp
                .domains
                .iter()
                .any(|d| domain == *d || domain.ends_with(&format!(".{d}")));
            if !legitimate {
                report.impersonation_detected = true;
                report.impersonated_brand = Some(fp.brand.to_string());
                report.impersonation_confidence = score;
            }
        }

        report
    }
}

impl Default for BrandVisualDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for BrandVisualDetector {
    fn id(&self) -> DetectorId {
        DetectorId::BrandVisual
    }

    async fn evaluate(&self, message: &Message) -> Result<DetectorResult> {
        let report = match &message.html_body {
            Some(html) if !html.trim().is_empty() => {
                self.analyze_html(html, message.sender_domain().as_deref())
            }
            _ => VisualReport::default(),
        };

        let score = if report.impersonation_detected {
            report.impersonation_confidence
        } else {
            0.0
        };
        if report.impersonation_detected {
            log::debug!(
                "brand_visual: possible {} impersonation (confidence {:.2})",
                report.impersonated_brand.as_deref().unwrap_or("?"),
                score
            );
        }

        Ok(DetectorResult::new(
            DetectorId::BrandVisual,
            score,
            SignalPayload::BrandVisual(report),
        ))
    }
}
