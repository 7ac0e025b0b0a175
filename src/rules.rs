//! Ignore-rule compiler.
//!
//! Turns the text of a `.workstateignore` file into an ordered [`RuleSet`].
//! The model is allow-by-default: a path is excluded only when the last rule
//! matching it is a plain (non-negated) rule.

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use crate::error::RuleError;
use crate::paths;
use crate::templates::{self, CodeTool};

/// Name of the ignore file at the project root.
pub const IGNORE_FILE: &str = ".workstateignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One compiled line of the ignore file.
#[derive(Debug, Clone)]
pub struct Rule {
    raw: String,
    line: usize,
    negated: bool,
    directory_only: bool,
    anchored: bool,
    /// Pattern ended in `/**`: matches everything strictly below a
    /// directory matching `matcher`, but not that directory itself.
    contents_only: bool,
    matcher: Pattern,
}

impl Rule {
    /// Compile a single non-blank, non-comment line.
    ///
    /// Returns `Ok(None)` for lines that carry no pattern once the markers
    /// are stripped (a lone `!` or `/`).
    pub fn compile(raw: &str, line: usize) -> Result<Option<Self>, RuleError> {
        let mut body = trim_unescaped_end(raw);

        let negated = body.starts_with('!');
        if negated {
            body = &body[1..];
        } else if body.starts_with("\\!") || body.starts_with("\\#") {
            body = &body[1..];
        }

        let directory_only = body.len() > 1 && body.ends_with('/');
        if directory_only {
            body = &body[..body.len() - 1];
        }

        let mut anchored = false;
        if let Some(rest) = body.strip_prefix('/') {
            anchored = true;
            body = rest;
        }

        let mut contents_only = false;
        if let Some(prefix) = body.strip_suffix("/**") {
            if !prefix.is_empty() {
                contents_only = true;
                body = prefix;
            }
        }

        // A slash anywhere but the end anchors the pattern to the root.
        if body.contains('/') || contents_only {
            anchored = true;
        }

        if body.is_empty() {
            return Ok(None);
        }

        let matcher = Pattern::new(&unescape(body)).map_err(|e| RuleError {
            line,
            pattern: raw.to_string(),
            reason: e.msg.to_string(),
        })?;

        Ok(Some(Rule {
            raw: raw.to_string(),
            line,
            negated,
            directory_only,
            anchored,
            contents_only,
            matcher,
        }))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 1-based line number in the source text.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_directory_only(&self) -> bool {
        self.directory_only
    }

    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Does this rule match `rel` (portable, relative to the root)?
    ///
    /// A rule that matches a directory also matches every path below it, so
    /// `!logs/` re-includes `logs/a.log` after an earlier `*.log`.
    pub fn matches(&self, rel: &str, is_dir: bool) -> bool {
        let direct = !self.contents_only && (is_dir || !self.directory_only);
        if direct && self.matches_path(rel) {
            return true;
        }
        proper_ancestors(rel).any(|dir| self.matches_path(dir))
    }

    fn matches_path(&self, path: &str) -> bool {
        if self.anchored {
            self.matcher.matches_with(path, MATCH_OPTIONS)
        } else {
            self.matcher.matches_with(paths::basename(path), MATCH_OPTIONS)
        }
    }
}

/// Trailing whitespace is dropped unless escaped (`foo\ `).
fn trim_unescaped_end(line: &str) -> &str {
    let trimmed = line.trim_end();
    if trimmed.ends_with('\\') && line[trimmed.len()..].starts_with(' ') {
        &line[..trimmed.len() + 1]
    } else {
        trimmed
    }
}

/// Rewrite backslash escapes into glob syntax: an escaped character always
/// stands for itself (`\*` becomes `[*]`).
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped) => out.push_str(&Pattern::escape(escaped.encode_utf8(&mut [0; 4]))),
            None => out.push('\\'),
        }
    }
    out
}

fn proper_ancestors(rel: &str) -> impl Iterator<Item = &str> {
    rel.match_indices('/').map(move |(idx, _)| &rel[..idx])
}

/// Outcome of evaluating a path against a [`RuleSet`].
#[derive(Debug, Clone, Copy)]
pub enum Verdict<'a> {
    /// No rule matched.
    Unmatched,
    /// The last matching rule was negated.
    Included(&'a Rule),
    /// The last matching rule was a plain rule.
    Excluded(&'a Rule),
}

impl Verdict<'_> {
    pub fn is_excluded(&self) -> bool {
        matches!(self, Verdict::Excluded(_))
    }
}

/// Ordered list of compiled rules. Order is significant: the last match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Empty set: every path is included.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile ignore-file text. Blank lines and `#` comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleError`] met; compilation stops there.
    pub fn compile(text: &str) -> Result<Self, RuleError> {
        let mut rules = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Rule::compile(line, idx + 1)? {
                Some(rule) => rules.push(rule),
                None => warn!(line = idx + 1, pattern = line, "ignoring rule with empty pattern"),
            }
        }
        debug!(count = rules.len(), "compiled ignore rules");
        Ok(Self { rules })
    }

    /// Rule set for one of the built-in tool templates.
    pub fn from_template(tool: CodeTool) -> Result<Self, RuleError> {
        Self::compile(templates::template(tool))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate `rel` against every rule; the last match decides.
    pub fn verdict(&self, rel: &str, is_dir: bool) -> Verdict<'_> {
        match self.rules.iter().rev().find(|rule| rule.matches(rel, is_dir)) {
            None => Verdict::Unmatched,
            Some(rule) if rule.negated => Verdict::Included(rule),
            Some(rule) => Verdict::Excluded(rule),
        }
    }

    /// Shorthand for `verdict(..).is_excluded()`.
    pub fn is_excluded(&self, rel: &str, is_dir: bool) -> bool {
        self.verdict(rel, is_dir).is_excluded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(text: &str) -> RuleSet {
        RuleSet::compile(text).unwrap()
    }

    #[test]
    fn test_blank_and_comments_skipped() {
        let set = rules("\n# comment\n   \n*.log\n");
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules()[0].line(), 4);
    }

    #[test]
    fn test_flags() {
        let set = rules("!/build/\n");
        let rule = &set.rules()[0];
        assert!(rule.is_negated());
        assert!(rule.is_directory_only());
        assert!(rule.is_anchored());
        assert_eq!(rule.raw(), "!/build/");
    }

    #[test]
    fn test_basename_rule_matches_any_depth() {
        let set = rules("*.sqlite3\n");
        assert!(set.is_excluded("app.sqlite3", false));
        assert!(set.is_excluded("data/app.sqlite3", false));
        assert!(set.is_excluded("a/b/c/app.sqlite3", false));
        assert!(!set.is_excluded("app.sqlite3.bak", false));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let set = rules("src/*.py\n");
        assert!(set.is_excluded("src/app.py", false));
        assert!(!set.is_excluded("src/pkg/app.py", false));
    }

    #[test]
    fn test_leading_slash_anchors() {
        let set = rules("/secret.txt\n");
        assert!(set.is_excluded("secret.txt", false));
        assert!(!set.is_excluded("nested/secret.txt", false));
    }

    #[test]
    fn test_inner_slash_anchors() {
        let set = rules("doc/notes.md\n");
        assert!(set.is_excluded("doc/notes.md", false));
        assert!(!set.is_excluded("x/doc/notes.md", false));
    }

    #[test]
    fn test_directory_only() {
        let set = rules("build/\n");
        assert!(set.is_excluded("build", true));
        assert!(set.is_excluded("pkg/build", true));
        assert!(!set.is_excluded("build", false));
    }

    #[test]
    fn test_last_match_wins() {
        let set = rules("*.log\n!keep.log\n");
        assert!(set.is_excluded("a.log", false));
        assert!(!set.is_excluded("keep.log", false));
        assert!(matches!(set.verdict("keep.log", false), Verdict::Included(_)));

        let set = rules("!keep.log\n*.log\n");
        assert!(set.is_excluded("keep.log", false));
    }

    #[test]
    fn test_unmatched_is_included() {
        let set = rules("*.log\n");
        assert!(matches!(set.verdict("main.rs", false), Verdict::Unmatched));
        assert!(!RuleSet::empty().is_excluded("anything", false));
    }

    #[test]
    fn test_double_star_prefix() {
        let set = rules("**/cache\n");
        assert!(set.is_excluded("cache", true));
        assert!(set.is_excluded("a/b/cache", true));
    }

    #[test]
    fn test_double_star_middle() {
        let set = rules("a/**/z.txt\n");
        assert!(set.is_excluded("a/z.txt", false));
        assert!(set.is_excluded("a/b/c/z.txt", false));
        assert!(!set.is_excluded("b/z.txt", false));
    }

    #[test]
    fn test_double_star_suffix_matches_contents_only() {
        let set = rules("logs/**\n");
        assert!(!set.is_excluded("logs", true));
        assert!(set.is_excluded("logs/a.txt", false));
        assert!(set.is_excluded("logs/deep/b.txt", false));
        assert!(!set.is_excluded("other/logs/a.txt", false));
    }

    #[test]
    fn test_case_sensitive() {
        let set = rules("*.LOG\n");
        assert!(!set.is_excluded("a.log", false));
        assert!(set.is_excluded("a.LOG", false));
    }

    #[test]
    fn test_escaped_markers() {
        let set = rules("\\#notes\n\\!bang\n");
        assert!(set.is_excluded("#notes", false));
        assert!(set.is_excluded("!bang", false));
        assert!(!set.rules()[1].is_negated());
    }

    #[test]
    fn test_trailing_whitespace_and_crlf() {
        let set = rules("*.tmp   \r\n");
        assert!(set.is_excluded("x.tmp", false));
    }

    #[test]
    fn test_negated_directory_reincludes_contents() {
        let set = rules("*.log\n!logs/\n");
        assert!(!set.is_excluded("logs", true));
        assert!(!set.is_excluded("logs/a.log", false));
        assert!(!set.is_excluded("logs/deep/b.log", false));
        assert!(matches!(set.verdict("logs/a.log", false), Verdict::Included(_)));
        assert!(set.is_excluded("b.log", false));
        assert!(set.is_excluded("other/c.log", false));
    }

    #[test]
    fn test_directory_rule_covers_paths_below() {
        let set = rules("build/\n");
        assert!(set.is_excluded("build/out.o", false));
        assert!(set.is_excluded("pkg/build/deep/out.o", false));
        assert!(!set.is_excluded("builder/out.o", false));

        let set = rules("/vendor\n");
        assert!(set.is_excluded("vendor/lib.rs", false));
        assert!(!set.is_excluded("src/vendor/lib.rs", false));
    }

    #[test]
    fn test_escaped_glob_characters_are_literal() {
        let set = rules("what\\?.txt\nstar\\*\n");
        assert!(set.is_excluded("what?.txt", false));
        assert!(!set.is_excluded("whatx.txt", false));
        assert!(set.is_excluded("star*", false));
        assert!(!set.is_excluded("starry", false));
    }

    #[test]
    fn test_escaped_trailing_space_is_kept() {
        let set = rules("name\\ \n");
        assert!(set.is_excluded("name ", false));
        assert!(!set.is_excluded("name", false));
    }

    #[test]
    fn test_malformed_rule_reports_line() {
        let err = RuleSet::compile("*.log\nfoo**\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.pattern, "foo**");
    }

    #[test]
    fn test_lone_markers_are_skipped() {
        let set = rules("!\n/\n*.o\n");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_from_template() {
        let set = RuleSet::from_template(CodeTool::Python).unwrap();
        assert!(set.is_excluded(".env", false));
        assert!(set.is_excluded("venv", true));
        assert!(!set.is_excluded("src/app.py", false));
    }
}
