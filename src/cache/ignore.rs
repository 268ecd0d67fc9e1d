use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnoreRule {
    pattern: String,
    negated: bool,
    directory_only: bool,
}

/// Patterns from a `.p4ignore` style file, scoped to the directory holding it.
///
/// Later rules override earlier ones; `!pattern` re-includes a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnorePatterns {
    base: PathBuf,
    rules: Vec<IgnoreRule>,
}

impl IgnorePatterns {
    pub fn parse(base: impl Into<PathBuf>, content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let (negated, line) = match line.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, line),
                };
                let directory_only = line.ends_with('/');
                IgnoreRule {
                    pattern: line.trim_matches('/').to_string(),
                    negated,
                    directory_only,
                }
            })
            .filter(|rule| !rule.pattern.is_empty())
            .collect();
        IgnorePatterns {
            base: base.into(),
            rules,
        }
    }

    /// Load the ignore file at `path`; a missing file ignores nothing.
    pub fn load(path: &Path) -> Result<Self> {
        let base = path.parent().unwrap_or(Path::new("")).to_path_buf();
        if !path.exists() {
            return Ok(IgnorePatterns {
                base,
                rules: Vec::new(),
            });
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ignore file: {}", path.display()))?;
        Ok(Self::parse(base, &content))
    }

    /// Whether `file` is ignored. Files outside the base directory never are.
    pub fn is_ignored(&self, file: &Path) -> bool {
        let Ok(relative) = file.strip_prefix(&self.base) else {
            return false;
        };
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() {
            return false;
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(&segments) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

impl IgnoreRule {
    fn matches(&self, segments: &[String]) -> bool {
        let last = segments.len() - 1;
        if self.pattern.contains('/') {
            // Anchored at the base: match the leading directories or the whole path
            (1..=segments.len()).any(|n| {
                (n <= last || !self.directory_only)
                    && glob_match(&self.pattern, &segments[..n].join("/"))
            })
        } else {
            segments
                .iter()
                .enumerate()
                .any(|(i, name)| {
                    (i < last || !self.directory_only) && glob_match(&self.pattern, name)
                })
        }
    }
}

/// Whole-string match where `*` spans any run of characters and `?` a single one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if *c == '?' || *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
