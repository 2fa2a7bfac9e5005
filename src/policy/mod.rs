//! Allowlist and path policy for the indexing pipeline.
//!
//! Single source of truth for which repositories and paths are indexable.
//! All policy decisions must go through this module; no other module may
//! hard-code repository names or path patterns.
//!
//! Evaluation is deny-then-allow: a path matching any deny pattern is
//! rejected regardless of allow patterns, and a path matching no allow
//! pattern after passing the deny list is also rejected.

use std::sync::LazyLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Repositories whose default branches are indexed.
pub const ALLOWED_REPOS: &[&str] = &[
    "light-platform/help-center",
    "light-platform/product-docs",
];

/// Default branch whose pushes trigger indexing.
pub const DEFAULT_BRANCH: &str = "main";

/// Deny patterns: build artifacts, lockfiles, IDE metadata, VCS metadata,
/// and changelogs. Evaluated before the allow list.
const DENY_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/.github/**",
    "**/.gitlab/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/*.lock",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/CHANGELOG.md",
];

/// Allow patterns: root README, markdown anywhere, and the docs tree.
const ALLOW_PATTERNS: &[&str] = &["README.md", "**/*.md", "**/*.mdx", "docs/**"];

static DENY_SET: LazyLock<GlobSet> = LazyLock::new(|| build_glob_set(DENY_PATTERNS));
static ALLOW_SET: LazyLock<GlobSet> = LazyLock::new(|| build_glob_set(ALLOW_PATTERNS));

/// Compiles a pattern list into a [`GlobSet`] with `**` spanning segments
/// and `*` stopping at separators. The pattern lists are static and valid;
/// an invalid pattern would be skipped rather than panicking.
fn build_glob_set(patterns: &[&str]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = GlobBuilder::new(pattern).literal_separator(true).build() {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// The outcome of an indexability check, with a human-readable reason
/// on denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDecision {
    /// Whether the `(repo, path)` pair may be indexed.
    pub allowed: bool,
    /// Why: `"ok"` when allowed, otherwise the denial reason.
    pub reason: String,
}

/// Returns `true` if the repository slug is in the static allowlist.
#[must_use]
pub fn is_allowed_repo(repo_slug: &str) -> bool {
    ALLOWED_REPOS.contains(&repo_slug)
}

/// Returns `true` if the path passes the deny list and matches an allow
/// pattern.
#[must_use]
pub fn should_index(path: &str) -> bool {
    let path = path.trim_start_matches('/');
    if DENY_SET.is_match(path) {
        return false;
    }
    ALLOW_SET.is_match(path)
}

/// Validates a `(repo, path)` pair against both the repository allowlist
/// and the path policy. Cannot fail; denial carries a reason.
#[must_use]
pub fn validate_index(repo: &str, path: &str) -> IndexDecision {
    if !is_allowed_repo(repo) {
        return IndexDecision {
            allowed: false,
            reason: format!("repository not in allowlist: {repo}"),
        };
    }

    let trimmed = path.trim_start_matches('/');
    if DENY_SET.is_match(trimmed) {
        return IndexDecision {
            allowed: false,
            reason: format!("path matches deny pattern: {path}"),
        };
    }
    if !ALLOW_SET.is_match(trimmed) {
        return IndexDecision {
            allowed: false,
            reason: format!("path matches no allow pattern: {path}"),
        };
    }

    IndexDecision {
        allowed: true,
        reason: "ok".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const REPO: &str = "light-platform/help-center";

    #[test]
    fn test_allowed_repo() {
        assert!(is_allowed_repo(REPO));
        assert!(!is_allowed_repo("someone-else/help-center"));
        assert!(!is_allowed_repo(""));
    }

    #[test_case("README.md", true; "root readme")]
    #[test_case("docs/currency.md", true; "docs markdown")]
    #[test_case("docs/guides/setup.mdx", true; "nested mdx")]
    #[test_case("guides/billing.md", true; "markdown outside docs")]
    #[test_case("docs/diagram.png", true; "non markdown inside docs tree")]
    #[test_case("src/main.rs", false; "source code")]
    #[test_case("package.json", false; "root config")]
    #[test_case("node_modules/pkg/README.md", false; "deny wins inside node_modules")]
    #[test_case("docs/CHANGELOG.md", false; "changelog denied even in docs")]
    #[test_case("CHANGELOG.md", false; "root changelog denied")]
    #[test_case(".github/workflows/ci.md", false; "vcs host metadata denied")]
    #[test_case("yarn.lock", false; "lockfile denied")]
    #[test_case("sub/Cargo.lock", false; "nested lockfile denied")]
    #[test_case(".idea/notes.md", false; "ide metadata denied")]
    fn test_should_index(path: &str, expected: bool) {
        assert_eq!(should_index(path), expected, "path: {path}");
    }

    #[test]
    fn test_leading_slash_normalized() {
        assert!(should_index("/docs/currency.md"));
    }

    #[test]
    fn test_validate_index_ok() {
        let decision = validate_index(REPO, "docs/currency.md");
        assert!(decision.allowed);
        assert_eq!(decision.reason, "ok");
    }

    #[test]
    fn test_validate_index_bad_repo() {
        let decision = validate_index("evil/repo", "docs/currency.md");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("allowlist"));
    }

    #[test]
    fn test_validate_index_denied_path() {
        let decision = validate_index(REPO, "node_modules/x/README.md");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("deny pattern"));
    }

    #[test]
    fn test_validate_index_unmatched_path() {
        let decision = validate_index(REPO, "src/lib.ts");
        assert!(!decision.allowed);
        assert!(decision.reason.contains("no allow pattern"));
    }

    #[test]
    fn test_deny_beats_allow() {
        // CHANGELOG.md matches the markdown allow pattern but deny wins.
        let decision = validate_index(REPO, "CHANGELOG.md");
        assert!(!decision.allowed);
    }
}
