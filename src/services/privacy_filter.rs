//! Privacy filter (C12): three layers of protection around the synthesis
//! pipeline's LLM calls.
//!
//! Layer 1 redacts source documents before they ever reach a prompt.
//! Layer 2 builds an audience-parameterized instruction section appended
//! to the synthesis system prompt. Layer 3 re-scans the LLM's own output
//! for anything that slipped through.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Privacy-filtering intensity requested for one synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceMode {
    /// Minimal filtering; drop markers but keep personal references.
    Me,
    /// Default: preserve factual attributions/decisions, drop casual
    /// remarks about people, omit sentences containing markers.
    Team,
    /// Strict: remove personal references, internal jargon, and anything
    /// revealing internal process.
    Public,
}

impl AudienceMode {
    /// Parses a CLI/config string, defaulting to `team`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "me" => Self::Me,
            "public" => Self::Public,
            _ => Self::Team,
        }
    }
}

/// Per-action counts from one [`redact`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RedactionReport {
    /// Credential-shaped strings redacted.
    pub credentials_redacted: usize,
    /// Internal filesystem paths anonymized.
    pub paths_anonymized: usize,
    /// RFC1918 IPs redacted.
    pub ips_redacted: usize,
    /// Temporal deictic phrases wrapped in `[TEMPORAL: ...]`.
    pub temporal_wrapped: usize,
    /// Delegate-run boilerplate lines stripped.
    pub boilerplate_lines_stripped: usize,
    /// Runs of 3+ blank lines collapsed to 2.
    pub blank_line_runs_collapsed: usize,
}

impl RedactionReport {
    /// Whether this pass found and acted on anything at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.credentials_redacted == 0
            && self.paths_anonymized == 0
            && self.ips_redacted == 0
            && self.temporal_wrapped == 0
            && self.boilerplate_lines_stripped == 0
            && self.blank_line_runs_collapsed == 0
    }
}

/// Result of Layer 3 post-generation validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Human-readable warnings naming what was found and re-redacted.
    pub warnings: Vec<String>,
}

static CREDENTIAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:sk-ant-[a-z0-9-]{10,}|sk-[a-zA-Z0-9]{20,}|ghp_[a-zA-Z0-9]{20,}|gho_[a-zA-Z0-9]{20,}|AKIA[0-9A-Z]{12,}|xox[baprs]-[a-zA-Z0-9-]{10,})\b",
    )
    .expect("credential regex")
});

static CRED_ASSIGNMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|password|passwd|secret|token)\s*[:=]\s*['"]?[^\s'"]{4,}['"]?"#)
        .expect("credential assignment regex")
});

static UNIX_HOME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:Users|home)/[A-Za-z0-9_.-]+/").expect("unix home regex"));

static WINDOWS_HOME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"C:\\Users\\[A-Za-z0-9_.-]+\\").expect("windows home regex"));

static RFC1918_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:10\.\d{1,3}\.\d{1,3}\.\d{1,3}|172\.(?:1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3})\b",
    )
    .expect("rfc1918 regex")
});

static TEMPORAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(today|tonight|this week|this month|currently|right now|at the moment|as of now|these days|recently|lately)\b",
    )
    .expect("temporal regex")
});

static BOILERPLATE_LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(generated (with|by)|co-authored-by|\u{1f916}\s*generated).*$")
        .expect("boilerplate regex")
});

static BLANK_RUN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("blank run regex"));

static BARE_TEMPORAL_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[TEMPORAL:\s*([^]]+)\]").expect("bare temporal marker regex"));

/// Layer 1: redacts `content` before it is ever included in a synthesis
/// prompt. Returns the redacted text plus a count of what was found.
#[must_use]
pub fn redact(content: &str) -> (String, RedactionReport) {
    let mut report = RedactionReport::default();

    let mut text = CREDENTIAL_PATTERN
        .replace_all(content, |_: &regex::Captures<'_>| {
            report.credentials_redacted += 1;
            "[REDACTED]"
        })
        .into_owned();
    text = CRED_ASSIGNMENT_PATTERN
        .replace_all(&text, |_: &regex::Captures<'_>| {
            report.credentials_redacted += 1;
            "[REDACTED]"
        })
        .into_owned();

    text = UNIX_HOME_PATTERN
        .replace_all(&text, |_: &regex::Captures<'_>| {
            report.paths_anonymized += 1;
            "~/"
        })
        .into_owned();
    text = WINDOWS_HOME_PATTERN
        .replace_all(&text, |_: &regex::Captures<'_>| {
            report.paths_anonymized += 1;
            r"~\"
        })
        .into_owned();

    text = RFC1918_PATTERN
        .replace_all(&text, |_: &regex::Captures<'_>| {
            report.ips_redacted += 1;
            "[INTERNAL_IP]"
        })
        .into_owned();

    text = TEMPORAL_PATTERN
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            report.temporal_wrapped += 1;
            format!("[TEMPORAL: {}]", &caps[0])
        })
        .into_owned();

    let mut stripped_lines = Vec::new();
    for line in text.lines() {
        if BOILERPLATE_LINE_PATTERN.is_match(line) {
            report.boilerplate_lines_stripped += 1;
        } else {
            stripped_lines.push(line);
        }
    }
    text = stripped_lines.join("\n");

    let before_blank_collapse = text.clone();
    text = BLANK_RUN_PATTERN.replace_all(&text, "\n\n").into_owned();
    report.blank_line_runs_collapsed = BLANK_RUN_PATTERN.find_iter(&before_blank_collapse).count();

    (text, report)
}

/// Layer 2: the content-filtering instruction section appended to the
/// synthesis system prompt for a given `mode`.
#[must_use]
pub fn prompt_section(mode: AudienceMode) -> String {
    match mode {
        AudienceMode::Me => {
            "## Privacy Mode: Personal\n\
             This article is for personal reference only. Drop any \
             `[TEMPORAL: ...]` markers, replacing them with their inner \
             text, but keep personal references and informal notes as-is."
                .to_string()
        }
        AudienceMode::Team => {
            "## Privacy Mode: Team\n\
             This article will be read by the wider team. Preserve factual \
             attributions and decisions (who decided what, and why). Drop \
             casual asides about specific people's behavior or performance. \
             Omit entire sentences that contain a `[TEMPORAL: ...]` marker \
             rather than guessing at a replacement date."
                .to_string()
        }
        AudienceMode::Public => {
            "## Privacy Mode: Public\n\
             This article may be published externally. Remove all personal \
             references (names, direct quotes attributed to individuals), \
             internal jargon, codenames, and anything revealing internal \
             processes, tooling, or org structure. Omit entire sentences \
             that contain a `[TEMPORAL: ...]` marker."
                .to_string()
        }
    }
}

/// Layer 3: re-scans generated `content` for anything that slipped
/// through redaction, redacts it again, and reports what it found.
/// Any surviving `[TEMPORAL: X]` marker is collapsed to bare `X` — the
/// LLM was asked to remove or rewrite these, and a survivor means that
/// cleanup failed.
#[must_use]
pub fn validate(content: &str) -> (String, ValidationReport) {
    let mut report = ValidationReport::default();

    let mut text = content.to_string();
    if CREDENTIAL_PATTERN.is_match(&text) || CRED_ASSIGNMENT_PATTERN.is_match(&text) {
        report
            .warnings
            .push("credential-shaped text found in generated output; re-redacted".to_string());
        text = CREDENTIAL_PATTERN.replace_all(&text, "[REDACTED]").into_owned();
        text = CRED_ASSIGNMENT_PATTERN
            .replace_all(&text, "[REDACTED]")
            .into_owned();
    }
    if RFC1918_PATTERN.is_match(&text) {
        report
            .warnings
            .push("internal IP address found in generated output; re-redacted".to_string());
        text = RFC1918_PATTERN.replace_all(&text, "[INTERNAL_IP]").into_owned();
    }
    if BARE_TEMPORAL_MARKER_PATTERN.is_match(&text) {
        report.warnings.push(
            "temporal marker survived generation; substituted back to bare text".to_string(),
        );
        text = BARE_TEMPORAL_MARKER_PATTERN
            .replace_all(&text, |caps: &regex::Captures<'_>| caps[1].to_string())
            .into_owned();
    }

    (text, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_known_credential_prefixes() {
        let (text, report) = redact("my key is sk-ant-REDACTED and that's it");
        assert!(text.contains("[REDACTED]"));
        assert_eq!(report.credentials_redacted, 1);
    }

    #[test]
    fn anonymizes_unix_home_paths() {
        let (text, report) = redact("see /Users/alice/projects/notes.md for details");
        assert_eq!(text, "see ~/projects/notes.md for details");
        assert_eq!(report.paths_anonymized, 1);
    }

    #[test]
    fn redacts_rfc1918_addresses() {
        let (text, report) = redact("connect to 192.168.1.42 on the vpn");
        assert_eq!(text, "connect to [INTERNAL_IP] on the vpn");
        assert_eq!(report.ips_redacted, 1);
    }

    #[test]
    fn wraps_temporal_deictics() {
        let (text, report) = redact("we decided this today after the meeting");
        assert!(text.contains("[TEMPORAL: today]"));
        assert_eq!(report.temporal_wrapped, 1);
    }

    #[test]
    fn strips_boilerplate_lines_and_collapses_blank_runs() {
        let input = "Line one\n\nGenerated with Some Tool\n\n\n\nLine two";
        let (text, report) = redact(input);
        assert!(!text.contains("Generated with"));
        assert_eq!(report.boilerplate_lines_stripped, 1);
        assert_eq!(report.blank_line_runs_collapsed, 1);
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn validate_substitutes_surviving_temporal_markers_bare() {
        let (text, report) = validate("we shipped this [TEMPORAL: last week]");
        assert_eq!(text, "we shipped this last week");
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn validate_is_clean_on_already_safe_text() {
        let (text, report) = validate("a perfectly ordinary paragraph");
        assert_eq!(text, "a perfectly ordinary paragraph");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn audience_mode_parse_defaults_to_team() {
        assert_eq!(AudienceMode::parse("me"), AudienceMode::Me);
        assert_eq!(AudienceMode::parse("public"), AudienceMode::Public);
        assert_eq!(AudienceMode::parse("nonsense"), AudienceMode::Team);
    }
}
