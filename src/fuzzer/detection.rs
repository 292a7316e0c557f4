// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Layered response classifier.
//!
//! Each payload category has one or more rules. A rule matches on the
//! response body / DOM (content or error signatures) or on console events
//! captured since the probe started. Signals already present in the
//! pre-injection baseline are discounted so a page that always prints
//! "syntax error" does not light up every probe.

use super::payloads::PayloadCategory;
use crate::driver::ConsoleMessage;
use crate::str_utils::{excerpt, window};
use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};

/// Confidence of an indicator absent from the baseline
const NEW_INDICATOR_CONFIDENCE: f64 = 0.9;
/// Confidence of an indicator the baseline already contained
const BASELINE_INDICATOR_CONFIDENCE: f64 = 0.3;
const CONSOLE_CONFIDENCE: f64 = 0.8;
const REFLECTION_CONFIDENCE: f64 = 0.7;

/// Longest evidence excerpt kept around a match
const SNIPPET_RADIUS: usize = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ResponseContent,
    ErrorSignature,
    ConsoleSignal,
}

/// Detection rule for one category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct VulnerabilityRule {
    pub name: String,
    pub category: PayloadCategory,
    pub detection_method: DetectionMethod,
    /// Case-insensitive substrings
    #[serde(default)]
    pub indicators: Vec<String>,
    pub risk_level: RiskLevel,
    /// Unescaped reflection of the raw payload counts as a signal
    #[serde(default)]
    pub reflects_payload: bool,
}

impl VulnerabilityRule {
    pub fn new(
        name: &str,
        category: PayloadCategory,
        detection_method: DetectionMethod,
        indicators: &[&str],
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            detection_method,
            indicators: indicators.iter().map(|i| i.to_lowercase()).collect(),
            risk_level,
            reflects_payload: false,
        }
    }

    pub fn with_reflection(mut self) -> Self {
        self.reflects_payload = true;
        self
    }
}

pub fn default_rules() -> Vec<VulnerabilityRule> {
    use DetectionMethod::*;
    use PayloadCategory::*;

    vec![
        VulnerabilityRule::new(
            "sql-error-signature",
            Sqli,
            ErrorSignature,
            &[
                "sql syntax",
                "you have an error in your sql",
                "unclosed quotation mark",
                "syntax error at or near",
                "sqlstate",
                "sqlite_error",
                "ora-01756",
                "pg_query",
                "mysql_fetch",
            ],
            RiskLevel::Critical,
        ),
        VulnerabilityRule::new("xss-reflection", Xss, ResponseContent, &[], RiskLevel::High)
            .with_reflection(),
        VulnerabilityRule::new("xss-console", Xss, ConsoleSignal, &["lonkero"], RiskLevel::High),
        VulnerabilityRule::new(
            "command-output",
            Cmdi,
            ResponseContent,
            &["uid=", "gid=", "root:x:0:0"],
            RiskLevel::Critical,
        ),
        VulnerabilityRule::new(
            "file-disclosure",
            PathTraversal,
            ResponseContent,
            &["root:x:0:0", "[extensions]", "for 16-bit app support"],
            RiskLevel::High,
        ),
        VulnerabilityRule::new("template-evaluation", Ssti, ResponseContent, &["50337"], RiskLevel::High),
        VulnerabilityRule::new(
            "nosql-error-signature",
            Nosqli,
            ErrorSignature,
            &["mongoerror", "casterror", "bsontype", "$where"],
            RiskLevel::High,
        ),
    ]
}

/// What the classifier looks at for one probe
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub payload: &'a str,
    /// Raw response body of the submit
    pub body: &'a str,
    /// Serialized DOM after the submit settled
    pub dom: &'a str,
    /// Page content before injection
    pub baseline: Option<&'a str>,
    /// Console events since the probe started
    pub console: &'a [ConsoleMessage],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMatch {
    pub rule: String,
    pub category: PayloadCategory,
    pub method: DetectionMethod,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    /// Indicator or payload that fired
    pub signal: String,
    /// Excerpt around the match
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Vulnerable(DetectionMatch),
    /// Signal present but below the confidence threshold
    Ambiguous(DetectionMatch),
    Clean,
}

impl Verdict {
    pub fn is_vulnerable(&self) -> bool {
        matches!(self, Verdict::Vulnerable(_))
    }

    pub fn matched(&self) -> Option<&DetectionMatch> {
        match self {
            Verdict::Vulnerable(m) | Verdict::Ambiguous(m) => Some(m),
            Verdict::Clean => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Vulnerable(_) => "vulnerable",
            Verdict::Ambiguous(_) => "ambiguous",
            Verdict::Clean => "clean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionEngine {
    rules: Vec<VulnerabilityRule>,
    threshold: f64,
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(default_rules(), 0.5)
    }
}

impl DetectionEngine {
    pub fn new(rules: Vec<VulnerabilityRule>, threshold: f64) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut r| {
                r.indicators = r.indicators.iter().map(|i| i.to_lowercase()).collect();
                r
            })
            .collect();
        Self {
            rules,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn rules(&self) -> &[VulnerabilityRule] {
        &self.rules
    }

    /// Classify one probe against the rules of `category`
    pub fn classify(&self, category: PayloadCategory, input: &DetectionInput<'_>) -> Verdict {
        let body_lower = input.body.to_lowercase();
        let dom_lower = input.dom.to_lowercase();
        let baseline_lower = input.baseline.map(str::to_lowercase);

        let mut best: Option<DetectionMatch> = None;

        for rule in self.rules.iter().filter(|r| r.category == category) {
            let candidate = match rule.detection_method {
                DetectionMethod::ResponseContent => {
                    content_match(rule, input, &body_lower, &dom_lower, baseline_lower.as_deref())
                }
                DetectionMethod::ErrorSignature => {
                    content_match(rule, input, &body_lower, "", baseline_lower.as_deref())
                }
                DetectionMethod::ConsoleSignal => console_match(rule, input),
            };

            if let Some(candidate) = candidate {
                let better = match &best {
                    None => true,
                    Some(current) => {
                        candidate.confidence > current.confidence
                            || (candidate.confidence == current.confidence
                                && candidate.risk_level > current.risk_level)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        match best {
            Some(m) if m.confidence >= self.threshold => Verdict::Vulnerable(m),
            Some(m) => Verdict::Ambiguous(m),
            None => Verdict::Clean,
        }
    }
}

fn content_match(
    rule: &VulnerabilityRule,
    input: &DetectionInput<'_>,
    body_lower: &str,
    dom_lower: &str,
    baseline_lower: Option<&str>,
) -> Option<DetectionMatch> {
    let mut best: Option<(f64, String, String)> = None;

    for indicator in rule.indicators.iter().filter(|i| !i.is_empty()) {
        let source = if body_lower.contains(indicator.as_str()) {
            Some(input.body)
        } else if !dom_lower.is_empty() && dom_lower.contains(indicator.as_str()) {
            Some(input.dom)
        } else {
            None
        };
        let Some(source) = source else {
            continue;
        };

        let in_baseline = baseline_lower.is_some_and(|b| b.contains(indicator.as_str()));
        let confidence = if in_baseline {
            BASELINE_INDICATOR_CONFIDENCE
        } else {
            NEW_INDICATOR_CONFIDENCE
        };
        if best.as_ref().map_or(true, |(c, _, _)| confidence > *c) {
            best = Some((confidence, indicator.clone(), snippet(source, indicator)));
        }
    }

    if rule.reflects_payload && !input.payload.is_empty() {
        let reflected = input.body.contains(input.payload) || input.dom.contains(input.payload);
        let in_baseline = input.baseline.is_some_and(|b| b.contains(input.payload));
        if reflected {
            let confidence = if in_baseline {
                BASELINE_INDICATOR_CONFIDENCE
            } else {
                REFLECTION_CONFIDENCE
            };
            if best.as_ref().map_or(true, |(c, _, _)| confidence > *c) {
                let source = if input.body.contains(input.payload) {
                    input.body
                } else {
                    input.dom
                };
                best = Some((confidence, input.payload.to_string(), snippet(source, input.payload)));
            }
        }
    }

    best.map(|(confidence, signal, snippet)| DetectionMatch {
        rule: rule.name.clone(),
        category: rule.category,
        method: rule.detection_method,
        risk_level: rule.risk_level,
        confidence,
        signal,
        snippet,
    })
}

fn console_match(rule: &VulnerabilityRule, input: &DetectionInput<'_>) -> Option<DetectionMatch> {
    for message in input.console {
        let text = message.text.to_lowercase();
        if let Some(indicator) = rule
            .indicators
            .iter()
            .find(|i| !i.is_empty() && text.contains(i.as_str()))
        {
            return Some(DetectionMatch {
                rule: rule.name.clone(),
                category: rule.category,
                method: rule.detection_method,
                risk_level: rule.risk_level,
                confidence: CONSOLE_CONFIDENCE,
                signal: indicator.clone(),
                snippet: format!("[{}] {}", message.level, message.text),
            });
        }
    }
    None
}

/// Excerpt of `source` around the first case-insensitive occurrence of `needle`
fn snippet(source: &str, needle: &str) -> String {
    let lower = source.to_lowercase();
    match lower.find(&needle.to_lowercase()) {
        // lowercase can shift byte offsets for non-ASCII input; window clamps to char boundaries
        Some(pos) => window(source, pos, pos + needle.len(), SNIPPET_RADIUS).to_string(),
        None => excerpt(source, SNIPPET_RADIUS * 2),
    }
}
