//! Text-similarity tools used by the corpus and peer layers.
//!
//! [`FingerprintSimilarity`] is the built-in comparison: token k-grams are
//! hashed, winnowed into a fingerprint set per file, and each subject file
//! is scored by how much of its fingerprint is contained in a source.
//! [`CommandSimilarityTool`] delegates to an external comparison program.

use std::collections::HashSet;

use async_trait::async_trait;
use pbl_guardian_domain::SourceFile;
use regex::Regex;
use tracing::debug;

use super::command::{run_tool, write_files, Scratch, ToolCommand};
use super::{Corpus, SimilarityMatch, SimilarityReport, SimilarityTool};
use crate::error::{CollaboratorError, CollaboratorResult};

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Split source text into comparison tokens. Comments and whitespace are
/// dropped; identifiers are lowercased so trivial renames of case do not
/// hide a copy.
pub fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') || trimmed.starts_with("//") || trimmed.starts_with('*') {
            continue;
        }
        let mut current = String::new();
        for ch in line.chars() {
            if ch.is_alphanumeric() || ch == '_' {
                current.push(ch.to_ascii_lowercase());
            } else {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                if !ch.is_whitespace() {
                    tokens.push(ch.to_string());
                }
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
    }
    tokens
}

/// 64-bit FNV-1a. Stable across processes, unlike `DefaultHasher` seeds.
fn fnv1a(bytes: impl Iterator<Item = u8>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Winnowed fingerprint set of a token stream.
pub fn fingerprint(tokens: &[String], k: usize, window: usize) -> HashSet<u64> {
    let mut selected = HashSet::new();
    if k == 0 || tokens.len() < k {
        return selected;
    }
    let hashes: Vec<u64> = tokens
        .windows(k)
        .map(|gram| fnv1a(gram.iter().flat_map(|t| t.bytes().chain(std::iter::once(0)))))
        .collect();

    if hashes.len() <= window || window == 0 {
        selected.extend(hashes.iter().copied());
        return selected;
    }
    for w in hashes.windows(window) {
        // Rightmost minimum, per the winnowing algorithm.
        let mut min_idx = 0;
        for (i, h) in w.iter().enumerate() {
            if *h <= w[min_idx] {
                min_idx = i;
            }
        }
        selected.insert(w[min_idx]);
    }
    selected
}

/// Share (0-100) of `subject` fingerprints found in `reference`.
pub fn containment(subject: &HashSet<u64>, reference: &HashSet<u64>) -> f64 {
    if subject.is_empty() {
        return 0.0;
    }
    let shared = subject.intersection(reference).count();
    shared as f64 / subject.len() as f64 * 100.0
}

/// Built-in k-gram winnowing comparison.
#[derive(Debug, Clone)]
pub struct FingerprintSimilarity {
    pub k: usize,
    pub window: usize,
}

impl Default for FingerprintSimilarity {
    fn default() -> Self {
        FingerprintSimilarity { k: 5, window: 4 }
    }
}

impl FingerprintSimilarity {
    pub fn new(k: usize, window: usize) -> Self {
        FingerprintSimilarity { k, window }
    }

    fn file_fingerprint(&self, file: &SourceFile) -> HashSet<u64> {
        fingerprint(&tokenize(&file.content), self.k, self.window)
    }

    /// Compare synchronously. Used directly by the peer scan.
    pub fn compare_now(&self, subject: &[SourceFile], corpus: &Corpus) -> SimilarityReport {
        let sources: Vec<(&str, HashSet<u64>)> = corpus
            .sources
            .iter()
            .map(|s| {
                let mut all = HashSet::new();
                for f in &s.files {
                    all.extend(self.file_fingerprint(f));
                }
                (s.id.as_str(), all)
            })
            .collect();

        let mut matches = Vec::new();
        for file in subject {
            let fp = self.file_fingerprint(file);
            if fp.is_empty() {
                continue;
            }
            for (source_id, reference) in &sources {
                let pct = containment(&fp, reference);
                if pct > 0.0 {
                    matches.push(SimilarityMatch {
                        source_id: source_id.to_string(),
                        subject_path: file.path.clone(),
                        percentage: (pct * 10.0).round() / 10.0,
                    });
                }
            }
        }
        SimilarityReport::from_matches(matches)
    }
}

#[async_trait]
impl SimilarityTool for FingerprintSimilarity {
    fn name(&self) -> &str {
        "fingerprint"
    }

    async fn compare(
        &self,
        subject: &[SourceFile],
        corpus: &Corpus,
    ) -> CollaboratorResult<SimilarityReport> {
        Ok(self.compare_now(subject, corpus))
    }
}

// ---------------------------------------------------------------------------
// External comparison tool
// ---------------------------------------------------------------------------

/// Runs an external comparison program over materialized copies of the
/// subject and corpus. `{subject}` and `{corpus}` in the argument list are
/// replaced with directory paths. Output lines mentioning a percentage and
/// "similar" or "match" are parsed into matches.
#[derive(Debug, Clone)]
pub struct CommandSimilarityTool {
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandSimilarityTool {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSimilarityTool {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout_secs: 180,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Extract matches from free-form tool output.
pub fn parse_percentage_lines(
    output: &str,
    subject: &[SourceFile],
    corpus: &Corpus,
) -> CollaboratorResult<Vec<SimilarityMatch>> {
    let pct_re = Regex::new(r"(\d+(?:\.\d+)?)\s*%")
        .map_err(|e| CollaboratorError::Parse(e.to_string()))?;
    let mut matches = Vec::new();
    for line in output.lines() {
        let lower = line.to_ascii_lowercase();
        if !(lower.contains("similar") || lower.contains("match")) {
            continue;
        }
        let Some(pct) = pct_re
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok())
        else {
            continue;
        };
        let source_id = corpus
            .sources
            .iter()
            .find(|s| line.contains(&s.id))
            .map(|s| s.id.clone())
            .unwrap_or_else(|| corpus.id.clone());
        let subject_path = subject
            .iter()
            .find(|f| line.contains(&f.path))
            .map(|f| f.path.clone())
            .unwrap_or_default();
        matches.push(SimilarityMatch {
            source_id,
            subject_path,
            percentage: pct.min(100.0),
        });
    }
    Ok(matches)
}

#[async_trait]
impl SimilarityTool for CommandSimilarityTool {
    fn name(&self) -> &str {
        &self.program
    }

    async fn compare(
        &self,
        subject: &[SourceFile],
        corpus: &Corpus,
    ) -> CollaboratorResult<SimilarityReport> {
        let scratch = Scratch::create()?;
        let subject_dir = scratch.path().join("subject");
        let corpus_dir = scratch.path().join("corpus");
        write_files(&subject_dir, subject)?;
        for source in &corpus.sources {
            write_files(&corpus_dir.join(&source.id), &source.files)?;
        }

        let args = self.args.iter().map(|a| {
            a.replace("{subject}", &subject_dir.to_string_lossy())
                .replace("{corpus}", &corpus_dir.to_string_lossy())
        });
        let cmd = ToolCommand::new(&self.program)
            .args(args)
            .timeout_secs(self.timeout_secs);
        let output = run_tool(&cmd).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let matches = parse_percentage_lines(&combined, subject, corpus)?;
        debug!(tool = %self.program, matches = matches.len(), "comparison finished");
        Ok(SimilarityReport::from_matches(matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CorpusSource;

    const ORIGINAL: &str = r#"
def merge_sorted(left, right):
    result = []
    i = j = 0
    while i < len(left) and j < len(right):
        if left[i] <= right[j]:
            result.append(left[i])
            i += 1
        else:
            result.append(right[j])
            j += 1
    result.extend(left[i:])
    result.extend(right[j:])
    return result
"#;

    const UNRELATED: &str = r#"
class Inventory:
    def __init__(self):
        self.items = {}

    def add(self, sku, qty):
        self.items[sku] = self.items.get(sku, 0) + qty

    def report(self):
        for sku, qty in sorted(self.items.items()):
            print(f"{sku}: {qty}")
"#;

    fn corpus(content: &str) -> Corpus {
        Corpus {
            id: "reference".into(),
            sources: vec![CorpusSource {
                id: "algo-repo".into(),
                files: vec![SourceFile::new("sort.py", content)],
            }],
        }
    }

    #[test]
    fn test_tokenize_drops_comments_and_whitespace() {
        let tokens = tokenize("# header\nx  =  Foo(1)  # trailing\n");
        assert_eq!(tokens[0], "x");
        assert!(tokens.contains(&"foo".to_string()));
        assert!(!tokens.contains(&"header".to_string()));
    }

    #[test]
    fn test_identical_copy_is_full_containment() {
        let tool = FingerprintSimilarity::default();
        let report = tool.compare_now(&[SourceFile::new("src/merge.py", ORIGINAL)], &corpus(ORIGINAL));
        assert_eq!(report.max_percentage, 100.0);
        assert_eq!(report.matches[0].source_id, "algo-repo");
        assert_eq!(report.matches[0].subject_path, "src/merge.py");
    }

    #[test]
    fn test_reformatted_copy_still_matches() {
        let reformatted = ORIGINAL.replace("    ", "\t").replace(" <= ", "<=");
        let commented = format!("# my own work\n{}", reformatted);
        let report = FingerprintSimilarity::default()
            .compare_now(&[SourceFile::new("m.py", commented)], &corpus(ORIGINAL));
        assert!(report.max_percentage > 90.0, "{}", report.max_percentage);
    }

    #[test]
    fn test_unrelated_code_scores_low() {
        let report = FingerprintSimilarity::default()
            .compare_now(&[SourceFile::new("inv.py", UNRELATED)], &corpus(ORIGINAL));
        assert!(report.max_percentage < 20.0, "{}", report.max_percentage);
    }

    #[test]
    fn test_tiny_files_ignored() {
        let report = FingerprintSimilarity::default()
            .compare_now(&[SourceFile::new("x.py", "x = 1")], &corpus("x = 1"));
        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_winnowing_is_deterministic() {
        let tokens = tokenize(ORIGINAL);
        assert_eq!(fingerprint(&tokens, 5, 4), fingerprint(&tokens, 5, 4));
        assert!(!fingerprint(&tokens, 5, 4).is_empty());
    }

    #[test]
    fn test_parse_percentage_lines() {
        let subject = vec![SourceFile::new("src/app.py", "")];
        let out = "Processing...\nsrc/app.py vs algo-repo/sort.py: 67.5% similar\nnothing here 12%\n";
        let matches = parse_percentage_lines(out, &subject, &corpus("")).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].percentage, 67.5);
        assert_eq!(matches[0].source_id, "algo-repo");
        assert_eq!(matches[0].subject_path, "src/app.py");
    }

    #[tokio::test]
    async fn test_command_tool_runs_with_placeholders() {
        let tool = CommandSimilarityTool::new(
            "sh",
            ["-c", "test -d \"$0\" && test -d \"$1\" && echo 'algo-repo: 42% match'", "{subject}", "{corpus}"],
        );
        let report = tool
            .compare(&[SourceFile::new("a.py", "x = 1\n")], &corpus("y = 2\n"))
            .await
            .unwrap();
        assert_eq!(report.max_percentage, 42.0);
    }
}
