//! Regex-based bulk link rewriting driven by named profiles.
//!
//! Profiles are persisted as a JSON string and use JavaScript regex
//! conventions: `flags` such as `"gi"`, and `$1`, `$<name>`, `$&`, `` $` ``
//! and `$'` in replacement templates. Flags map onto [`RegexBuilder`];
//! templates are expanded per match by [`ReplacementTemplate`].

use std::fmt;

use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::Document;
use crate::error::{ConfigError, RuleError};

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReplacementRule {
    pub id: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReplacementProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<LinkReplacementRule>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Parse a serialized profile set. Blank input means no profiles.
pub fn parse_profiles(config: &str) -> Result<Vec<LinkReplacementProfile>, ConfigError> {
    if config.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(config).map_err(|e| {
        warn!(error = %e, "Failed to parse link replacement config");
        ConfigError::InvalidLinkReplacement(e)
    })
}

/// Profiles whose name contains `query`, case-insensitively.
pub fn find_profiles<'p>(
    profiles: &'p [LinkReplacementProfile],
    query: &str,
) -> Vec<&'p LinkReplacementProfile> {
    let query = query.to_lowercase();
    profiles
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&query))
        .collect()
}

/// A rule compiled for the `regex` crate.
#[derive(Debug)]
pub struct CompiledRule {
    regex: Regex,
    replacement: ReplacementTemplate,
    global: bool,
}

impl CompiledRule {
    pub fn compile(rule: &LinkReplacementRule) -> Result<Self, RuleError> {
        let flags = match rule.flags.as_deref() {
            None | Some("") => "g",
            Some(flags) => flags,
        };
        let mut builder = RegexBuilder::new(&rule.pattern);
        let mut global = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'u' => {}
                other => {
                    return Err(RuleError::UnsupportedFlag {
                        rule_id: rule.id.clone(),
                        flag: other,
                    })
                }
            }
        }
        let regex = builder.build().map_err(|source| RuleError::InvalidRegex {
            rule_id: rule.id.clone(),
            pattern: rule.pattern.clone(),
            source,
        })?;
        let replacement = ReplacementTemplate::parse(&rule.replacement, &regex);
        Ok(Self {
            regex,
            replacement,
            global,
        })
    }

    /// `None` when the pattern does not match.
    pub fn apply(&self, text: &str) -> Option<String> {
        if !self.regex.is_match(text) {
            return None;
        }
        let limit = if self.global { 0 } else { 1 };
        let replaced = self.regex.replacen(text, limit, |caps: &Captures<'_>| {
            self.replacement.expand(caps, text)
        });
        Some(replaced.into_owned())
    }
}

/// One piece of a parsed replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    /// `$n` / `$nn`; an unmatched group expands to nothing.
    Group(usize),
    /// `$<name>`; an unknown or unmatched name expands to nothing.
    Named(String),
    /// `` $` ``: the text before the match.
    Before,
    /// `$'`: the text after the match.
    After,
}

/// A JavaScript replacement template, resolved against one compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementTemplate {
    parts: Vec<TemplatePart>,
}

impl ReplacementTemplate {
    /// Parse `template` the way `String.prototype.replace` reads it for `regex`.
    ///
    /// `$n` only refers to groups the pattern has, and `$<` is only special when
    /// the pattern has named groups; anything else stays literal.
    pub fn parse(template: &str, regex: &Regex) -> Self {
        let captures_len = regex.captures_len();
        let has_names = regex.capture_names().flatten().next().is_some();
        let chars: Vec<char> = template.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '$' {
                literal.push(chars[i]);
                i += 1;
                continue;
            }
            let (part, consumed) = match chars.get(i + 1) {
                Some('$') => (TemplatePart::Literal("$".to_string()), 2),
                Some('&') => (TemplatePart::Group(0), 2),
                Some('`') => (TemplatePart::Before, 2),
                Some('\'') => (TemplatePart::After, 2),
                Some('<') if has_names => match chars[i + 2..].iter().position(|&c| c == '>') {
                    Some(len) => {
                        let name: String = chars[i + 2..i + 2 + len].iter().collect();
                        (TemplatePart::Named(name), len + 3)
                    }
                    None => (TemplatePart::Literal("$".to_string()), 1),
                },
                Some(d) if d.is_ascii_digit() => {
                    let first = d.to_digit(10).unwrap_or(0) as usize;
                    let two = chars
                        .get(i + 2)
                        .and_then(|c| c.to_digit(10))
                        .map(|second| first * 10 + second as usize)
                        .filter(|&n| n > 0 && n < captures_len);
                    match two {
                        Some(n) => (TemplatePart::Group(n), 3),
                        None if first > 0 && first < captures_len => {
                            (TemplatePart::Group(first), 2)
                        }
                        None => (TemplatePart::Literal("$".to_string()), 1),
                    }
                }
                _ => (TemplatePart::Literal("$".to_string()), 1),
            };
            match part {
                TemplatePart::Literal(text) => literal.push_str(&text),
                part => {
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(part);
                }
            }
            i += consumed;
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }
        Self { parts }
    }

    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Render the template for one match of `haystack`.
    pub fn expand(&self, caps: &Captures<'_>, haystack: &str) -> String {
        let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Group(n) => {
                    out.push_str(caps.get(*n).map_or("", |m| m.as_str()));
                }
                TemplatePart::Named(name) => {
                    out.push_str(caps.name(name).map_or("", |m| m.as_str()));
                }
                TemplatePart::Before => out.push_str(&haystack[..start]),
                TemplatePart::After => out.push_str(&haystack[end..]),
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementOutcome {
    Applied { rules_applied: usize },
    NoMatches,
    ProfileDisabled,
}

impl fmt::Display for ReplacementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementOutcome::Applied { rules_applied } => {
                write!(f, "Replacement applied ({rules_applied} rule(s) matched)")
            }
            ReplacementOutcome::NoMatches => write!(f, "No matches found"),
            ReplacementOutcome::ProfileDisabled => write!(f, "Profile is disabled"),
        }
    }
}

#[derive(Debug)]
pub struct ReplacementReport {
    pub profile: String,
    pub outcome: ReplacementOutcome,
    /// Rules that were skipped because they could not be compiled.
    pub errors: Vec<RuleError>,
}

/// Run every enabled rule of `profile` over `text`, in order.
///
/// Returns the rewritten text (identical to the input unless something matched).
pub fn rewrite_text(text: &str, profile: &LinkReplacementProfile) -> (String, ReplacementReport) {
    let mut report = ReplacementReport {
        profile: profile.name.clone(),
        outcome: ReplacementOutcome::NoMatches,
        errors: Vec::new(),
    };
    if !profile.enabled {
        report.outcome = ReplacementOutcome::ProfileDisabled;
        return (text.to_string(), report);
    }

    let mut content = text.to_string();
    let mut rules_applied = 0;
    for rule in profile.rules.iter().filter(|r| r.enabled) {
        let compiled = match CompiledRule::compile(rule) {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "Skipping invalid link replacement rule");
                report.errors.push(e);
                continue;
            }
        };
        if let Some(replaced) = compiled.apply(&content) {
            debug!(rule = %rule.id, "Link replacement rule matched");
            content = replaced;
            rules_applied += 1;
        }
    }
    if rules_applied > 0 {
        report.outcome = ReplacementOutcome::Applied { rules_applied };
    }
    (content, report)
}

/// Apply `profile` to the document, writing back only when a rule matched.
pub fn apply_link_replacement<D>(
    document: &D,
    profile: &LinkReplacementProfile,
) -> ReplacementReport
where
    D: Document + ?Sized,
{
    let (content, report) = rewrite_text(&document.get_value(), profile);
    if let ReplacementOutcome::Applied { rules_applied } = report.outcome {
        document.set_value(&content);
        info!(profile = %profile.name, rules_applied, "Applied link replacement");
    } else {
        info!(
            profile = %profile.name,
            outcome = %report.outcome,
            "Link replacement left document untouched"
        );
    }
    report
}
