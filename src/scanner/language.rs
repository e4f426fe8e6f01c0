//! Language classification by extension, with content sniffing as a fallback.

use once_cell::sync::Lazy;
use phf::phf_map;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Java,
    JavaScript,
    Python,
    TypeScript,
}

static EXTENSIONS: phf::Map<&'static str, Language> = phf_map! {
    "py" => Language::Python,
    "pyi" => Language::Python,
    "js" => Language::JavaScript,
    "jsx" => Language::JavaScript,
    "mjs" => Language::JavaScript,
    "cjs" => Language::JavaScript,
    "ts" => Language::TypeScript,
    "tsx" => Language::TypeScript,
    "mts" => Language::TypeScript,
    "cts" => Language::TypeScript,
    "java" => Language::Java,
    "go" => Language::Go,
};

static SHEBANG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#!\s*\S*?(?:/env\s+)?(?:\S*/)?(python[0-9.]*|node|nodejs|deno|ts-node|bun)\b")
        .expect("valid shebang regex")
});

static GO_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^package\s+[A-Za-z_]\w*\s*$").expect("valid go package regex")
});

static GO_FUNC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^func\s").expect("valid go func regex"));

static JAVA_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^package\s+[A-Za-z_][\w.]*\s*;").expect("valid java package regex")
});

static JAVA_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:public\s+|abstract\s+|final\s+)*(?:class|interface|enum|record)\s+[A-Z]\w*")
        .expect("valid java type regex")
});

static PYTHON_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?:def\s+\w+\s*\(.*\)\s*(?:->\s*[^:]+)?:|class\s+\w+\s*(?:\(.*\))?:)\s*$")
        .expect("valid python def regex")
});

/// Bytes inspected when sniffing content.
pub(crate) const SNIFF_LIMIT: usize = 8 * 1024;

impl Language {
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Java,
            Language::Go,
        ]
    }

    /// Detect language from a file extension (without dot, case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Language> {
        if let Some(lang) = EXTENSIONS.get(ext) {
            return Some(*lang);
        }
        EXTENSIONS.get(ext.to_ascii_lowercase().as_str()).copied()
    }

    /// Guess the language of extensionless or unknown files.
    ///
    /// An interpreter line wins; otherwise only strong syntactic signals are
    /// accepted.
    pub fn sniff(content: &[u8]) -> Option<Language> {
        let head = &content[..content.len().min(SNIFF_LIMIT)];
        let text = String::from_utf8_lossy(head);

        if let Some(caps) = SHEBANG.captures(&text) {
            let interpreter = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            return match interpreter {
                "node" | "nodejs" => Some(Language::JavaScript),
                "deno" | "ts-node" | "bun" => Some(Language::TypeScript),
                _ if interpreter.starts_with("python") => Some(Language::Python),
                _ => None,
            };
        }

        if GO_PACKAGE.is_match(&text) && GO_FUNC.is_match(&text) {
            return Some(Language::Go);
        }
        if JAVA_PACKAGE.is_match(&text) && JAVA_TYPE.is_match(&text) {
            return Some(Language::Java);
        }
        if PYTHON_DEF.is_match(&text) {
            return Some(Language::Python);
        }
        None
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
            Language::Java => &["java"],
            Language::Go => &["go"],
        }
    }

    /// Identifier used in artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Go => "go",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Java => "Java",
            Language::Go => "Go",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
