//! L4: stylistic heuristic for machine-generated code.
//!
//! Five per-file features, each a concern value in [0, 1]:
//!
//! - comment density: share of non-blank lines that are comments or docs
//! - doc coverage: share of functions carrying a docstring / doc comment
//! - naming uniformity: long, uniformly descriptive identifiers everywhere
//! - boilerplate: error-handling constructs relative to control blocks
//! - refinement absence: no TODOs, debug prints or other iteration traces
//!
//! A feature that cannot be measured on a file contributes 0.0. The
//! submission score is the line-weighted mean of per-file scores.

use async_trait::async_trait;
use pbl_guardian_domain::{FeatureWeights, Layer, Signal, SignalStatus, SourceFile, SyntheticPolicy};
use regex::Regex;
use tracing::debug;

use super::round_to;
use crate::context::EvaluationContext;
use crate::detector::{Detector, DetectorResult};
use crate::error::DetectorError;
use crate::language::LanguageProfile;

pub const FEATURE_NAMES: [&str; 5] = [
    "comment_density",
    "doc_coverage",
    "naming_uniformity",
    "boilerplate",
    "refinement_absence",
];

const REFINEMENT_MARKERS: &str = r"(?i)\b(?:todo|fixme|xxx|hack)\b|\bprint\(|console\.log|println!|dbg!|System\.out\.print|fmt\.Print|printf\(";
const IDENTIFIER: &str = r"[A-Za-z_][A-Za-z0-9_]*";

/// Identifiers needed before naming can be judged.
const MIN_IDENTIFIERS: usize = 10;
/// Control blocks needed before error-handling density can be judged.
const MIN_BLOCKS: usize = 4;
/// Most suspicious files listed in evidence.
const MAX_LISTED_FILES: usize = 3;

/// A concern value, or why the feature could not be measured.
pub type Feature = Result<f64, String>;

fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("pattern does not compile: {}", e))
}

fn is_comment_line(trimmed: &str, profile: &LanguageProfile, doc: Option<&Regex>) -> bool {
    profile.is_line_comment(trimmed)
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
        || doc.is_some_and(|re| re.is_match(trimmed))
}

fn comment_density(file: &SourceFile, profile: &LanguageProfile) -> Feature {
    let doc = compile(profile.doc_pattern).ok();
    let mut code = 0usize;
    let mut comments = 0usize;
    for line in file.content.lines() {
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        code += 1;
        if is_comment_line(t, profile, doc.as_ref()) {
            comments += 1;
        }
    }
    if code == 0 {
        return Err("no code lines".to_string());
    }
    let ratio = comments as f64 / code as f64;
    Ok(if ratio > 0.40 {
        1.0
    } else if ratio > 0.30 {
        0.5
    } else if ratio > 0.20 {
        0.2
    } else {
        0.0
    })
}

fn is_documented(lines: &[&str], at: usize, profile: &LanguageProfile, doc: &Regex) -> bool {
    if profile.indentation_blocks {
        return lines[at + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| doc.is_match(l));
    }
    // Walk up through the comment and attribute lines above the definition.
    for line in lines[..at].iter().rev() {
        let t = line.trim();
        if doc.is_match(line) {
            return true;
        }
        let attached = t.starts_with('*')
            || t.starts_with("/*")
            || profile.is_line_comment(t)
            || t.starts_with("#[")
            || t.starts_with('@');
        if !attached {
            return false;
        }
    }
    false
}

fn doc_coverage(file: &SourceFile, profile: &LanguageProfile) -> Feature {
    let func = compile(profile.function_pattern)?;
    let doc = compile(profile.doc_pattern)?;
    let lines: Vec<&str> = file.content.lines().collect();
    let defs: Vec<usize> = (0..lines.len()).filter(|&i| func.is_match(lines[i])).collect();
    if defs.len() <= 2 {
        return Ok(0.0);
    }
    let documented = defs
        .iter()
        .filter(|&&i| is_documented(&lines, i, profile, &doc))
        .count();
    let ratio = documented as f64 / defs.len() as f64;
    Ok(if ratio > 0.9 {
        1.0
    } else if ratio > 0.7 {
        0.5
    } else {
        0.0
    })
}

fn naming_uniformity(file: &SourceFile, profile: &LanguageProfile) -> Feature {
    let ident = compile(IDENTIFIER)?;
    let doc = compile(profile.doc_pattern).ok();
    let mut names: Vec<&str> = Vec::new();
    let mut in_docstring = false;
    for line in file.content.lines() {
        let t = line.trim();
        if profile.indentation_blocks && (t.starts_with("\"\"\"") || t.starts_with("'''")) {
            // One-line docstrings open and close on the same line.
            let closes = t.len() >= 6 && (t.ends_with("\"\"\"") || t.ends_with("'''"));
            if !closes {
                in_docstring = !in_docstring;
            }
            continue;
        }
        if in_docstring || t.is_empty() || is_comment_line(t, profile, doc.as_ref()) {
            continue;
        }
        for m in ident.find_iter(line) {
            let name = m.as_str();
            if name.len() >= 3 && !profile.stop_words.contains(&name) && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    if names.len() < MIN_IDENTIFIERS {
        return Err(format!("{} identifiers", names.len()));
    }
    let avg = names.iter().map(|n| n.len()).sum::<usize>() as f64 / names.len() as f64;
    let long_share = names.iter().filter(|n| n.len() > 15).count() as f64 / names.len() as f64;
    Ok(if avg > 12.0 && long_share > 0.3 {
        1.0
    } else if avg > 10.0 {
        0.4
    } else {
        0.0
    })
}

fn boilerplate(file: &SourceFile, profile: &LanguageProfile) -> Feature {
    let blocks = compile(profile.block_pattern)?;
    let handling = compile(profile.error_handling_pattern)?;
    let block_count = file.content.lines().filter(|l| blocks.is_match(l)).count();
    if block_count < MIN_BLOCKS {
        return Err(format!("{} control blocks", block_count));
    }
    let handling_count = file.content.lines().filter(|l| handling.is_match(l)).count();
    let ratio = handling_count as f64 / block_count as f64;
    Ok(if ratio > 0.5 {
        1.0
    } else if ratio > 0.3 {
        0.5
    } else {
        0.0
    })
}

fn refinement_absence(file: &SourceFile, min_lines: usize) -> Feature {
    if file.line_count() < min_lines {
        return Err(format!("{} lines", file.line_count()));
    }
    let markers = compile(REFINEMENT_MARKERS)?;
    Ok(if markers.is_match(&file.content) { 0.0 } else { 1.0 })
}

/// Per-feature values for one file, in [`FEATURE_NAMES`] order.
pub fn extract_features(
    file: &SourceFile,
    profile: &LanguageProfile,
    policy: &SyntheticPolicy,
) -> [Feature; 5] {
    [
        comment_density(file, profile),
        doc_coverage(file, profile),
        naming_uniformity(file, profile),
        boilerplate(file, profile),
        refinement_absence(file, policy.min_refinement_lines),
    ]
}

/// Weighted score of one file. Unmeasurable features count as 0.0.
pub fn file_score(features: &[Feature; 5], weights: &FeatureWeights) -> f64 {
    let w = [
        weights.comment_density,
        weights.doc_coverage,
        weights.naming_uniformity,
        weights.boilerplate,
        weights.refinement_absence,
    ];
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }
    features
        .iter()
        .zip(w)
        .map(|(f, w)| f.as_ref().copied().unwrap_or(0.0) * w)
        .sum::<f64>()
        / total
}

/// Mean of `(value, weight)` pairs; 0.0 when the weights sum to zero.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return 0.0;
    }
    pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total
}

/// L4 signal over the given files. `None` when there are no files.
pub fn evaluate_synthetic(
    files: &[&SourceFile],
    profile: &LanguageProfile,
    policy: &SyntheticPolicy,
) -> Option<Signal> {
    if files.is_empty() {
        return None;
    }

    let mut per_file = Vec::with_capacity(files.len());
    let mut per_feature: [Vec<(f64, f64)>; 5] = Default::default();
    let mut unmeasured = [0usize; 5];
    let mut total_lines = 0usize;

    for file in files {
        let features = extract_features(file, profile, policy);
        let lines = file.line_count();
        total_lines += lines;
        for (i, f) in features.iter().enumerate() {
            match f {
                Ok(v) => per_feature[i].push((*v, lines as f64)),
                Err(reason) => {
                    debug!(path = %file.path, feature = FEATURE_NAMES[i], %reason, "feature not measurable");
                    unmeasured[i] += 1;
                    per_feature[i].push((0.0, lines as f64));
                }
            }
        }
        per_file.push((file.path.as_str(), file_score(&features, &policy.weights), lines));
    }

    let weighted: Vec<(f64, f64)> = per_file.iter().map(|(_, s, l)| (*s, *l as f64)).collect();
    let score = round_to(weighted_mean(&weighted), 3);
    let status = if score >= policy.fail_score {
        SignalStatus::Fail
    } else if score >= policy.warn_score {
        SignalStatus::Warn
    } else {
        SignalStatus::Pass
    };

    let mut evidence = vec![format!(
        "Files analyzed: {} ({} lines)",
        files.len(),
        total_lines
    )];
    for (i, name) in FEATURE_NAMES.iter().enumerate() {
        let mut line = format!("{}: {:.2}", name, weighted_mean(&per_feature[i]));
        if unmeasured[i] > 0 {
            line.push_str(&format!(
                " (not measurable in {} of {} files)",
                unmeasured[i],
                files.len()
            ));
        }
        evidence.push(line);
    }
    if score >= policy.warn_score {
        per_file.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (path, s, _) in per_file.iter().take(MAX_LISTED_FILES) {
            evidence.push(format!("Most suspicious: {} ({:.2})", path, s));
        }
    }

    let summary = format!("Synthetic-origin score {:.2}", score);
    Some(Signal::new(Layer::SyntheticOrigin, status, score, summary).with_evidence(evidence))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticOriginDetector;

#[async_trait]
impl Detector for SyntheticOriginDetector {
    fn layer(&self) -> Layer {
        Layer::SyntheticOrigin
    }

    async fn evaluate(&self, ctx: &EvaluationContext) -> DetectorResult {
        let profile = ctx.language_profile().ok_or_else(|| {
            DetectorError::Unavailable(format!("no language profile for {}", ctx.config.language))
        })?;
        let files = ctx.eligible_files();
        evaluate_synthetic(&files, profile, &ctx.config.synthetic)
            .ok_or_else(|| DetectorError::unavailable("no eligible source files"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> &'static LanguageProfile {
        LanguageProfile::for_language("python").unwrap()
    }

    fn generated_file() -> SourceFile {
        let mut content = String::new();
        for i in 0..4 {
            content.push_str(&format!(
                r#"def calculate_total_price_for_items_{i}(shopping_cart_items):
    """Calculate the total price for all items in the cart."""
    # Initialize the running total accumulator
    running_total_accumulator = 0
    # Iterate over every item in the shopping cart
    for individual_cart_item in shopping_cart_items:
        # Attempt to add the price safely
        try:
            running_total_accumulator += individual_cart_item.price
        except AttributeError:
            # Skip items without a price attribute
            continue
    # Return the computed total value
    return running_total_accumulator

"#
            ));
        }
        SourceFile::new("cart.py", content)
    }

    fn hand_written_file() -> SourceFile {
        SourceFile::new(
            "main.py",
            "import sys\n\ndef main():\n    # TODO handle bad input\n    n = int(sys.argv[1])\n    t = 0\n    for i in range(n):\n        t += i\n    print(t)\n\nmain()\n",
        )
    }

    #[test]
    fn test_generated_style_scores_high() {
        let features = extract_features(&generated_file(), python(), &SyntheticPolicy::default());
        for (name, f) in FEATURE_NAMES.iter().zip(&features) {
            assert_eq!(f.as_ref().ok(), Some(&1.0), "{}", name);
        }
        let signal = evaluate_synthetic(&[&generated_file()], python(), &SyntheticPolicy::default())
            .unwrap();
        assert_eq!(signal.status, SignalStatus::Fail);
        assert_eq!(signal.score, Some(1.0));
        assert!(signal
            .evidence
            .contains(&"Most suspicious: cart.py (1.00)".to_string()));
    }

    #[test]
    fn test_unmeasurable_features_are_neutral() {
        let features = extract_features(&hand_written_file(), python(), &SyntheticPolicy::default());
        assert!(features[2].is_err(), "too few identifiers");
        assert!(features[3].is_err(), "too few blocks");
        assert!(features[4].is_err(), "too short for refinement markers");

        let signal =
            evaluate_synthetic(&[&hand_written_file()], python(), &SyntheticPolicy::default())
                .unwrap();
        assert_eq!(signal.status, SignalStatus::Pass);
        assert!(signal
            .evidence
            .contains(&"boilerplate: 0.00 (not measurable in 1 of 1 files)".to_string()));
    }

    #[test]
    fn test_refinement_markers_clear_the_feature() {
        let mut content = generated_file().content;
        content.push_str("# TODO: switch to decimal prices\n");
        let file = SourceFile::new("cart.py", content);
        assert_eq!(refinement_absence(&file, 30), Ok(0.0));
    }

    #[test]
    fn test_score_is_line_weighted() {
        assert_eq!(weighted_mean(&[(1.0, 30.0), (0.0, 90.0)]), 0.25);
        assert_eq!(weighted_mean(&[]), 0.0);
    }

    #[test]
    fn test_brace_language_doc_comments() {
        let rust = LanguageProfile::for_language("rust").unwrap();
        let file = SourceFile::new(
            "lib.rs",
            "/// Adds.\npub fn add(a: u32, b: u32) -> u32 { a + b }\n\n/// Subtracts.\n#[inline]\npub fn sub(a: u32, b: u32) -> u32 { a - b }\n\n/// Multiplies.\npub fn mul(a: u32, b: u32) -> u32 { a * b }\n",
        );
        assert_eq!(doc_coverage(&file, rust), Ok(1.0));
    }

    #[test]
    fn test_no_files_is_none() {
        assert!(evaluate_synthetic(&[], python(), &SyntheticPolicy::default()).is_none());
    }
}
