//! Per-language lexical conventions used by file selection, fragment
//! extraction and the stylistic heuristic.

/// Lexical profile of a source language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub line_comments: &'static [&'static str],
    pub block_comment: Option<(&'static str, &'static str)>,
    /// Matches the line that opens a function definition.
    pub function_pattern: &'static str,
    /// Matches a documentation comment or docstring opener.
    pub doc_pattern: &'static str,
    /// Matches an error-handling construct (try/except, catch, `?`-less match on Err...).
    pub error_handling_pattern: &'static str,
    /// Matches control-flow block openers, the denominator for error-handling density.
    pub block_pattern: &'static str,
    /// Whether blocks are delimited by indentation rather than braces.
    pub indentation_blocks: bool,
    /// Tokens too common to make a distinctive search query.
    pub stop_words: &'static [&'static str],
}

const PYTHON: LanguageProfile = LanguageProfile {
    name: "python",
    extensions: &["py"],
    line_comments: &["#"],
    block_comment: None,
    function_pattern: r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(",
    doc_pattern: r#"^\s*[rubRUB]?("""|''')"#,
    error_handling_pattern: r"^\s*(?:try\s*:|except\b)",
    block_pattern: r"^\s*(?:if|elif|for|while|with|try)\b",
    indentation_blocks: true,
    stop_words: &[
        "self", "return", "if", "else", "elif", "for", "in", "def", "class", "import", "from",
        "not", "and", "or", "True", "False", "None", "pass", "print",
    ],
};

const RUST: LanguageProfile = LanguageProfile {
    name: "rust",
    extensions: &["rs"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    function_pattern: r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)",
    doc_pattern: r"^\s*(?:///|//!)",
    error_handling_pattern: r"(?:\bmatch\b.*\bErr\b|\.map_err\(|\bErr\(|\.unwrap_or)",
    block_pattern: r"^\s*(?:if|for|while|loop|match)\b",
    indentation_blocks: false,
    stop_words: &[
        "let", "mut", "fn", "pub", "return", "if", "else", "for", "in", "match", "self", "Self",
        "Some", "None", "Ok", "Err", "use", "impl",
    ],
};

const JAVA: LanguageProfile = LanguageProfile {
    name: "java",
    extensions: &["java"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    function_pattern: r"^\s*(?:(?:public|private|protected|static|final|synchronized|abstract)\s+)+[\w<>\[\],\s]+\s+([A-Za-z_]\w*)\s*\([^;]*$",
    doc_pattern: r"^\s*/\*\*",
    error_handling_pattern: r"^\s*(?:try\s*\{|\}?\s*catch\s*\()",
    block_pattern: r"^\s*(?:if|for|while|switch|try)\b",
    indentation_blocks: false,
    stop_words: &[
        "public", "private", "protected", "static", "final", "void", "return", "new", "this",
        "if", "else", "for", "while", "null", "true", "false", "class",
    ],
};

const JAVASCRIPT: LanguageProfile = LanguageProfile {
    name: "javascript",
    extensions: &["js", "jsx", "mjs", "cjs"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    function_pattern: r"^\s*(?:export\s+)?(?:async\s+)?(?:function\s*\*?\s*([A-Za-z_$][\w$]*)|(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>)",
    doc_pattern: r"^\s*/\*\*",
    error_handling_pattern: r"^\s*(?:try\s*\{|\}?\s*catch\s*\(|\.catch\()",
    block_pattern: r"^\s*(?:if|for|while|switch|try)\b",
    indentation_blocks: false,
    stop_words: &[
        "const", "let", "var", "function", "return", "if", "else", "for", "this", "new", "null",
        "undefined", "true", "false", "await", "async",
    ],
};

const TYPESCRIPT: LanguageProfile = LanguageProfile {
    name: "typescript",
    extensions: &["ts", "tsx"],
    ..JAVASCRIPT
};

const C: LanguageProfile = LanguageProfile {
    name: "c",
    extensions: &["c", "h"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    function_pattern: r"^\s*(?:static\s+|inline\s+|extern\s+)*[A-Za-z_][\w\s\*]*\s\**([A-Za-z_]\w*)\s*\([^;]*$",
    doc_pattern: r"^\s*/\*\*",
    error_handling_pattern: r"(?:\bif\s*\(\s*!?\s*\w+\s*(?:==|!=)\s*NULL|\berrno\b|\bperror\()",
    block_pattern: r"^\s*(?:if|for|while|switch)\b",
    indentation_blocks: false,
    stop_words: &[
        "int", "char", "void", "return", "if", "else", "for", "while", "struct", "NULL",
        "sizeof", "const", "unsigned",
    ],
};

const CPP: LanguageProfile = LanguageProfile {
    name: "cpp",
    extensions: &["cpp", "cc", "cxx", "hpp", "hh", "hxx"],
    error_handling_pattern: r"^\s*(?:try\s*\{|\}?\s*catch\s*\()",
    block_pattern: r"^\s*(?:if|for|while|switch|try)\b",
    stop_words: &[
        "int", "char", "void", "return", "if", "else", "for", "while", "auto", "const", "std",
        "nullptr", "this", "new", "class",
    ],
    ..C
};

const GO: LanguageProfile = LanguageProfile {
    name: "go",
    extensions: &["go"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    function_pattern: r"^\s*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*\(",
    doc_pattern: r"^\s*//\s*[A-Z]\w*\s",
    error_handling_pattern: r"\bif\s+err\s*!=\s*nil\b",
    block_pattern: r"^\s*(?:if|for|switch|select)\b",
    indentation_blocks: false,
    stop_words: &[
        "func", "return", "if", "else", "for", "range", "err", "nil", "var", "type", "struct",
        "package", "import",
    ],
};

const PROFILES: [LanguageProfile; 8] = [PYTHON, RUST, JAVA, JAVASCRIPT, TYPESCRIPT, C, CPP, GO];

impl LanguageProfile {
    /// Look up a profile by name or common alias (case-insensitive).
    pub fn for_language(language: &str) -> Option<&'static LanguageProfile> {
        let wanted = match language.trim().to_ascii_lowercase().as_str() {
            "py" | "python3" => "python".to_string(),
            "js" | "node" => "javascript".to_string(),
            "ts" => "typescript".to_string(),
            "c++" | "cxx" => "cpp".to_string(),
            "golang" => "go".to_string(),
            other => other.to_string(),
        };
        PROFILES.iter().find(|p| p.name == wanted)
    }

    /// Whether a file extension belongs to this language.
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Whether a trimmed line is a line comment.
    pub fn is_line_comment(&self, trimmed: &str) -> bool {
        self.line_comments.iter().any(|p| trimmed.starts_with(p))
    }
}
