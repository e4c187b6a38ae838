//! L3: distinctive functions looked up in a public code-search index.
//!
//! The longest functions make the most distinctive queries. Each query is
//! built from the first lines of a function body with stop words removed.
//! Search quotas are tight, so only a few fragments are sent, identical
//! queries go through the evaluation cache, and a rate-limit response stops
//! the layer instead of burning more requests.

use async_trait::async_trait;
use pbl_guardian_domain::{Layer, Signal, SourceFile};
use regex::Regex;
use tracing::{debug, warn};

use super::round_to;
use super::similarity::{comparable_files, status_for_percentage};
use crate::cache::QueryKey;
use crate::collaborators::CodeFragment;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::{CollaboratorError, DetectorError};
use crate::language::LanguageProfile;

/// Snippets are capped at this many characters before tokenizing.
const MAX_SNIPPET_CHARS: usize = 200;

/// Minimum distinctive tokens for a fragment to be worth a query.
const MIN_QUERY_TOKENS: usize = 3;

#[derive(Debug, Clone)]
pub struct PublicCodeDetector {
    /// Longest functions kept as candidates.
    pub candidates: usize,
    /// Candidates actually searched.
    pub max_queries: usize,
    /// Functions with fewer non-comment body lines are ignored.
    pub min_body_lines: usize,
    /// Body lines used to build the query.
    pub snippet_lines: usize,
    pub max_query_tokens: usize,
}

impl Default for PublicCodeDetector {
    fn default() -> Self {
        PublicCodeDetector {
            candidates: 5,
            max_queries: 3,
            min_body_lines: 4,
            snippet_lines: 6,
            max_query_tokens: 8,
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_meaningful(line: &str, profile: &LanguageProfile) -> bool {
    let t = line.trim();
    !t.is_empty() && !profile.is_line_comment(t) && !matches!(t, "{" | "}" | "};" | "})" | "});")
}

/// Body lines of the function whose definition is at `start`.
fn function_body<'a>(lines: &[&'a str], start: usize, profile: &LanguageProfile) -> Vec<&'a str> {
    let mut body = Vec::new();
    if profile.indentation_blocks {
        let def_indent = indent_of(lines[start]);
        for line in &lines[start + 1..] {
            if line.trim().is_empty() {
                continue;
            }
            if indent_of(line) <= def_indent {
                break;
            }
            body.push(*line);
        }
    } else {
        let mut depth: i64 = 0;
        let mut opened = false;
        for (offset, line) in lines[start..].iter().enumerate() {
            for c in line.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if offset > 0 {
                body.push(*line);
            }
            if opened && depth <= 0 {
                break;
            }
            // A declaration with no body in sight is a prototype.
            if !opened && offset >= 2 {
                return Vec::new();
            }
        }
    }
    body.into_iter()
        .filter(|l| is_meaningful(l, profile))
        .collect()
}

/// Search query from the first body lines, or `None` when too generic.
fn build_query(
    body: &[&str],
    profile: &LanguageProfile,
    snippet_lines: usize,
    max_tokens: usize,
) -> Option<String> {
    let snippet: String = body
        .iter()
        .take(snippet_lines)
        .map(|l| l.trim())
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_SNIPPET_CHARS)
        .collect();
    let tokens: Vec<&str> = snippet
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.len() > 2 && !profile.stop_words.contains(t))
        .collect();
    if tokens.len() < MIN_QUERY_TOKENS {
        return None;
    }
    Some(tokens.into_iter().take(max_tokens).collect::<Vec<_>>().join(" "))
}

impl PublicCodeDetector {
    /// Longest searchable functions across `files`, longest first.
    pub fn extract_fragments(
        &self,
        files: &[SourceFile],
        profile: &LanguageProfile,
    ) -> Vec<CodeFragment> {
        let re = match Regex::new(profile.function_pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(language = profile.name, error = %e, "function pattern does not compile");
                return Vec::new();
            }
        };

        let mut fragments = Vec::new();
        for file in files {
            let lines: Vec<&str> = file.content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                let Some(caps) = re.captures(line) else {
                    continue;
                };
                let name = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .map(|m| m.as_str())
                    .unwrap_or("<anonymous>");
                let body = function_body(&lines, i, profile);
                if body.len() < self.min_body_lines {
                    continue;
                }
                if let Some(query) =
                    build_query(&body, profile, self.snippet_lines, self.max_query_tokens)
                {
                    fragments.push(CodeFragment {
                        path: file.path.clone(),
                        function: name.to_string(),
                        lines: body.len(),
                        query,
                    });
                }
            }
        }
        fragments.sort_by(|a, b| {
            b.lines
                .cmp(&a.lines)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.function.cmp(&b.function))
        });
        fragments.truncate(self.candidates);
        fragments
    }
}

#[async_trait]
impl Detector for PublicCodeDetector {
    fn layer(&self) -> Layer {
        Layer::PublicCode
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let index = ctx
            .collaborators
            .code_search
            .as_ref()
            .ok_or_else(|| DetectorError::unavailable("search credentials not configured"))?;
        let profile = ctx.language_profile().ok_or_else(|| {
            DetectorError::Unavailable(format!("no language profile for {}", ctx.config.language))
        })?;
        let files = comparable_files(ctx)?;
        let fragments = self.extract_fragments(&files, profile);
        if fragments.is_empty() {
            return Err(DetectorError::unavailable("no functions long enough to search"));
        }

        let mut searched = 0usize;
        let mut matched = 0usize;
        let mut found = Vec::new();
        let mut failures = Vec::new();
        let mut stopped: Option<CollaboratorError> = None;

        for fragment in fragments.iter().take(self.max_queries) {
            let key = QueryKey::new("code_search", [index.name(), fragment.query.as_str()]);
            match ctx.cache.get_or_fetch(key, || index.search(fragment)).await {
                Ok(hits) => {
                    searched += 1;
                    debug!(function = %fragment.function, hits = hits.total_count, "code search");
                    if hits.total_count > 0 {
                        matched += 1;
                        found.push(format!(
                            "{}::{} ({} lines) found in {} public files: {}",
                            fragment.path,
                            fragment.function,
                            fragment.lines,
                            hits.total_count,
                            hits.sources.join(", ")
                        ));
                    }
                }
                Err(
                    e @ (CollaboratorError::RateLimited(_) | CollaboratorError::Unauthorized(_)),
                ) => {
                    warn!(error = %e, "code search stopped");
                    stopped = Some(e);
                    break;
                }
                Err(e) => failures.push(format!("{}::{}: {}", fragment.path, fragment.function, e)),
            }
        }

        if searched == 0 {
            let reason = stopped
                .map(|e| e.to_string())
                .or_else(|| failures.first().cloned())
                .unwrap_or_else(|| "no query completed".to_string());
            return Err(DetectorError::ToolFailure(reason));
        }

        let share = matched as f64 / searched as f64 * 100.0;
        let status = status_for_percentage(share, ctx.config.plagiarism_threshold);
        let pct = round_to(share, 1);
        let summary = format!(
            "{} of {} functions found in public code",
            matched, searched
        );
        let mut evidence = vec![format!(
            "Searched {} of {} candidate functions via {}",
            searched,
            fragments.len(),
            index.name()
        )];
        evidence.extend(found);
        evidence.extend(failures.into_iter().map(|f| format!("Search failed: {}", f)));
        if let Some(e) = stopped {
            evidence.push(format!("Search stopped early: {}", e));
        }
        Ok(Signal::new(Layer::PublicCode, status, pct, summary).with_evidence(evidence))
    }
}
