//! Policy engine
//!
//! Statically inspects a parsed candidate, applies whitelisted rewrites for
//! recoverable warnings and rejects anything that still carries an error.
//! Pure: no I/O, no randomness, same input gives the same output.

use crate::error::PolicyError;
use crate::markers;
use crate::rules::PolicyRuleSet;
use crate::secrets::SecretScanner;
use crate::violation::{has_errors, PolicyRule, Violation};
use forge_artifact::SourceLocation;
use forge_source::{
    AssignmentNode, CallNode, FunctionNode, ImportNode, NodeTree, NodeVisitor, PythonParser,
    SourceParser, StringLiteralNode,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Single-line `NAME = "literal"` (optionally annotated, optionally commented)
const LITERAL_ASSIGNMENT: &str = r#"^(?P<indent>\s*)(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*[A-Za-z_][A-Za-z0-9_\[\], .]*)?=\s*[rRuUbB]?(?:"[^"\n]*"|'[^'\n]*')\s*(?P<comment>#.*)?$"#;

/// Kind of rewrite applied during sanitization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// Credential literal replaced by an environment lookup
    CredentialFromEnv,
    /// `import os` added for the environment lookup
    InsertImport,
}

/// A rewrite applied to a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFix {
    /// What was done
    pub kind: FixKind,
    /// Name the rewrite concerned
    pub subject: String,
    /// Line in the pre-fix source
    pub line: usize,
    /// Human-readable description
    pub description: String,
}

/// Outcome of a successful [`PolicyEngine::sanitize_and_validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Possibly rewritten source
    pub source: String,
    /// Rewrites applied, in line order
    pub applied_fixes: Vec<AppliedFix>,
    /// Remaining violations (warnings and infos only)
    pub violations: Vec<Violation>,
}

impl Sanitized {
    /// Whether any rewrite was applied
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}

/// Guardrail engine
///
/// Cheap to clone; the rule set and parser are shared.
#[derive(Clone)]
pub struct PolicyEngine {
    rules: Arc<PolicyRuleSet>,
    parser: Arc<dyn SourceParser>,
    scanner: SecretScanner,
    literal_assignment: Regex,
}

impl fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rules)
            .field("language", &self.parser.language())
            .finish_non_exhaustive()
    }
}

impl PolicyEngine {
    /// Create engine with the Python parser
    ///
    /// # Errors
    /// `PolicyError::InvalidPattern` if a secret heuristic does not compile.
    pub fn new(rules: Arc<PolicyRuleSet>) -> Result<Self, PolicyError> {
        Self::with_parser(rules, Arc::new(PythonParser::new()))
    }

    /// Create engine with a specific parser
    ///
    /// # Errors
    /// `PolicyError::InvalidPattern` if a secret heuristic does not compile.
    pub fn with_parser(
        rules: Arc<PolicyRuleSet>,
        parser: Arc<dyn SourceParser>,
    ) -> Result<Self, PolicyError> {
        let scanner = SecretScanner::new(&rules.secret_patterns, rules.secret_min_length)?;
        let literal_assignment = Regex::new(LITERAL_ASSIGNMENT)
            .map_err(|e| PolicyError::invalid_pattern("literal_assignment", e))?;

        Ok(Self {
            rules,
            parser,
            scanner,
            literal_assignment,
        })
    }

    /// Rule set in use
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &PolicyRuleSet {
        &self.rules
    }

    /// Parser in use
    #[inline]
    #[must_use]
    pub fn parser(&self) -> &Arc<dyn SourceParser> {
        &self.parser
    }

    /// All violations of a parsed candidate
    ///
    /// Order: tree findings in document order, then missing markers in
    /// declaration order, then long lines, then credential handling.
    #[must_use]
    pub fn check_violations(&self, tree: &NodeTree) -> Vec<Violation> {
        let mut checker = TreeChecker {
            rules: &self.rules,
            scanner: &self.scanner,
            found: Vec::new(),
        };
        tree.walk(&mut checker);
        let mut violations = checker.found;

        for marker in markers::missing(&self.rules.required_markers, tree) {
            violations.push(
                Violation::error(
                    PolicyRule::MissingRequiredMarker,
                    format!("missing required marker `{}`: {}", marker.id, marker.description),
                )
                .with_subject(marker.id.clone()),
            );
        }

        let limit = self.rules.max_line_length;
        for (idx, line) in tree.source().lines().enumerate() {
            let length = line.chars().count();
            if length > limit {
                violations.push(
                    Violation::warning(
                        PolicyRule::LineLength,
                        format!("line is {length} characters, limit is {limit}"),
                    )
                    .at(SourceLocation::new(idx + 1, limit + 1)),
                );
            }
        }

        if let Some(violation) = self.check_credential_handling(tree) {
            violations.push(violation);
        }

        violations
    }

    /// Parse then [`check_violations`](Self::check_violations)
    ///
    /// # Errors
    /// `PolicyError::Unparseable` if the source does not parse.
    pub fn check_source(&self, source: &str) -> Result<Vec<Violation>, PolicyError> {
        let tree = self.parser.parse(source)?;
        Ok(self.check_violations(&tree))
    }

    /// Apply whitelisted rewrites, then reject if any error remains
    ///
    /// # Errors
    /// - `PolicyError::Unparseable` if the source (or, defensively, the
    ///   rewritten source) does not parse
    /// - `PolicyError::Rejected` with the full post-fix violation list if any
    ///   `error` remains
    pub fn sanitize_and_validate(&self, source: &str) -> Result<Sanitized, PolicyError> {
        let tree = self.parser.parse(source)?;
        let violations = self.check_violations(&tree);

        let (fixed, applied_fixes) = if self.rules.auto_fix {
            self.apply_fixes(&tree, &violations)
        } else {
            (source.to_string(), Vec::new())
        };

        let violations = if applied_fixes.is_empty() {
            violations
        } else {
            tracing::debug!("applied {} policy rewrite(s)", applied_fixes.len());
            let fixed_tree = self.parser.parse(&fixed)?;
            self.check_violations(&fixed_tree)
        };

        if has_errors(&violations) {
            let err = PolicyError::Rejected { violations };
            tracing::warn!("{}", err);
            return Err(err);
        }

        Ok(Sanitized {
            source: fixed,
            applied_fixes,
            violations,
        })
    }

    fn check_credential_handling(&self, tree: &NodeTree) -> Option<Violation> {
        let source = tree.source();
        let referenced = self
            .rules
            .credential_rewrites
            .iter()
            .find(|r| source.contains(r.name.as_str()))?;

        let loads_env = tree.has_call("os.getenv")
            || tree.has_call("os.environ.get")
            || source.contains("os.environ[");
        if loads_env {
            return None;
        }

        Some(
            Violation::warning(
                PolicyRule::CredentialHandling,
                format!(
                    "credential `{}` is referenced but never loaded with os.getenv",
                    referenced.name
                ),
            )
            .with_subject(referenced.name.clone())
            .with_suggestion(format!("{} = os.getenv(\"{}\")", referenced.name, referenced.env_var)),
        )
    }

    fn apply_fixes(&self, tree: &NodeTree, violations: &[Violation]) -> (String, Vec<AppliedFix>) {
        let source = tree.source();
        let eol = if source.contains("\r\n") { "\r\n" } else { "\n" };
        let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
        let mut fixed_lines = BTreeSet::new();
        let mut applied = Vec::new();

        for violation in violations {
            if violation.rule != PolicyRule::HardcodedCredential {
                continue;
            }
            let (Some(subject), Some(location)) = (&violation.subject, violation.location) else {
                continue;
            };
            let Some(rewrite) = self.rules.rewrite_for(subject) else {
                continue;
            };
            if !fixed_lines.insert(location.line) {
                continue;
            }
            let Some(line) = lines.get_mut(location.line - 1) else {
                continue;
            };
            let Some(caps) = self.literal_assignment.captures(line) else {
                continue;
            };
            if &caps["name"] != subject {
                continue;
            }

            let mut replacement = format!(
                "{}{} = os.getenv(\"{}\")",
                &caps["indent"], subject, rewrite.env_var
            );
            if let Some(comment) = caps.name("comment") {
                replacement.push_str("  ");
                replacement.push_str(comment.as_str());
            }
            *line = replacement;

            applied.push(AppliedFix {
                kind: FixKind::CredentialFromEnv,
                subject: subject.clone(),
                line: location.line,
                description: format!(
                    "replaced literal `{subject}` with os.getenv(\"{}\")",
                    rewrite.env_var
                ),
            });
        }

        if !applied.is_empty() && !tree.has_import("os", None) {
            let at = header_end(tree, &lines);
            lines.insert(at, "import os".to_string());
            applied.push(AppliedFix {
                kind: FixKind::InsertImport,
                subject: "os".to_string(),
                line: at + 1,
                description: "added `import os` for environment lookups".to_string(),
            });
        }

        if applied.is_empty() {
            return (source.to_string(), applied);
        }

        let mut out = lines.join(eol);
        if source.ends_with('\n') {
            out.push_str(eol);
        }
        (out, applied)
    }
}

/// Index of the first line after the leading comments (shebang, encoding)
/// and after the last line of any `__future__` import
fn header_end(tree: &NodeTree, lines: &[String]) -> usize {
    let comments_end = lines
        .iter()
        .position(|l| !l.trim_start().starts_with('#'))
        .unwrap_or(lines.len());
    tree.imports()
        .filter(|import| import.from_import && import.module == "__future__")
        .map(|import| import.end_line)
        .max()
        .map_or(comments_end, |future_end| future_end.max(comments_end))
}

struct TreeChecker<'a> {
    rules: &'a PolicyRuleSet,
    scanner: &'a SecretScanner,
    found: Vec<Violation>,
}

impl NodeVisitor for TreeChecker<'_> {
    fn visit_import(&mut self, node: &ImportNode) {
        let mut candidates = vec![node.module.clone()];
        candidates.extend(node.names.iter().map(|n| format!("{}.{}", node.module, n)));

        for module in candidates {
            if self.rules.is_forbidden_import(&module) {
                self.found.push(
                    Violation::error(
                        PolicyRule::ForbiddenImport,
                        format!("forbidden import `{module}`"),
                    )
                    .with_subject(module)
                    .at(node.location)
                    .with_suggestion("remove the import; it is not allowed in generated servers"),
                );
            }
        }
    }

    fn visit_call(&mut self, node: &CallNode) {
        if self.rules.is_forbidden_call(&node.callee) {
            self.found.push(
                Violation::error(
                    PolicyRule::ForbiddenCall,
                    format!("forbidden call `{}()`", node.callee),
                )
                .with_subject(node.callee.clone())
                .at(node.location),
            );
        } else if node.is_attribute() && self.rules.is_forbidden_call(node.name()) {
            self.found.push(
                Violation::warning(
                    PolicyRule::UnsafeAttributeCall,
                    format!(
                        "call to `{}()` shares a name with forbidden `{}`",
                        node.callee,
                        node.name()
                    ),
                )
                .with_subject(node.callee.clone())
                .at(node.location),
            );
        }
    }

    fn visit_string_literal(&mut self, node: &StringLiteralNode) {
        // the literal itself never goes into the message
        if let Some(heuristic) = self.scanner.matches(&node.value) {
            self.found.push(
                Violation::warning(
                    PolicyRule::HardcodedSecret,
                    format!("string literal looks like a secret ({heuristic})"),
                )
                .with_subject(heuristic)
                .at(node.location)
                .with_suggestion("load secrets from environment variables"),
            );
        }
    }

    fn visit_assignment(&mut self, node: &AssignmentNode) {
        let name = node.target.rsplit('.').next().unwrap_or(&node.target);
        if !node.value_is_string || !self.rules.is_credential_name(name) {
            return;
        }

        let suggestion = match self.rules.rewrite_for(name) {
            Some(rewrite) => format!("{} = os.getenv(\"{}\")", node.target, rewrite.env_var),
            None => "load it from an environment variable".to_string(),
        };
        self.found.push(
            Violation::warning(
                PolicyRule::HardcodedCredential,
                format!("credential `{}` is assigned a string literal", node.target),
            )
            .with_subject(node.target.clone())
            .at(node.location)
            .with_suggestion(suggestion),
        );
    }

    fn visit_function(&mut self, node: &FunctionNode) {
        if self.rules.require_async_containment && node.is_async && !node.has_failure_containment
        {
            self.found.push(
                Violation::warning(
                    PolicyRule::MissingFailureContainment,
                    format!("async function `{}` has no try/except", node.name),
                )
                .with_subject(node.name.clone())
                .at(node.location),
            );
        }
    }
}
