use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own sources. Anything else under the package root
// (build output, reference material) is left alone.
const SOURCE_DIRS: [&str; 4] = ["clump", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

// One source policy: a line regex plus a second-stage filter that decides whether a
// matching line really is a violation.
struct Rule {
    pattern: &'static str,
    is_violation: fn(&str) -> bool,
    headline: &'static str,
    advice: &'static str,
}

const RULES: [Rule; 5] = [
    Rule {
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        is_violation: underscore_outside_comments_and_strings,
        headline: "underscore-prefixed variables",
        advice: "Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely.",
    },
    Rule {
        pattern: r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        is_violation: always,
        headline: "forbidden comment patterns",
        advice: "Comments narrating edits are not allowed. Remove them completely rather than commenting them out.",
    },
    Rule {
        pattern: r"(//|/\*).*\*\*",
        is_violation: stars_outside_doc_comments,
        headline: "'**' in regular comments",
        advice: "The '**' pattern is not allowed in regular comments (but is allowed in doc comments).",
    },
    Rule {
        pattern: r"(//|/\*|///).*",
        is_violation: comment_is_all_uppercase,
        headline: "comments with all uppercase alphabetic characters",
        advice: "Comments where all alphabetic characters are uppercase are not allowed.\n   Strongly consider deleting the comment completely.",
    },
    Rule {
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        is_violation: always,
        headline: "#[allow(dead_code)] attributes",
        advice: "#[allow(dead_code)] attributes are not allowed in this project.\n   Either use the code (removing the attribute) or remove it completely.",
    },
];

// Collects the matching lines of one file that survive the rule's filter.
struct ViolationCollector {
    is_violation: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.is_violation)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn always(_: &str) -> bool {
    true
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//") || line.contains("/*")
}

fn is_doc_comment(line: &str) -> bool {
    line.trim_start().starts_with("///")
}

fn underscore_outside_comments_and_strings(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    // Odd segments of a quote split are inside string literals.
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn stars_outside_doc_comments(line: &str) -> bool {
    !is_doc_comment(line) || FORBIDDEN_WORDS.iter().any(|word| line.contains(word))
}

fn comment_is_all_uppercase(line: &str) -> bool {
    let trimmed = line.trim_start();
    let text = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(start) = line.find("/*") {
        let rest = &line[start + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };

    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_rule(rule: &Rule, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();

    for path in files {
        let mut collector = ViolationCollector {
            is_violation: rule.is_violation,
            violations: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;
        if !collector.violations.is_empty() {
            return Err(report(rule, path, &collector.violations).into());
        }
    }
    Ok(())
}

fn report(rule: &Rule, path: &Path, violations: &[String]) -> String {
    let mut message = format!(
        "\n❌ ERROR: Found {} {} in {}:\n",
        violations.len(),
        rule.headline,
        path.display()
    );
    for violation in violations {
        message.push_str(&format!("   {violation}\n"));
    }
    message.push_str(&format!("\n⚠️ {}\n", rule.advice));
    message
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let files = source_files();
    for rule in &RULES {
        if let Err(e) = check_rule(rule, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
