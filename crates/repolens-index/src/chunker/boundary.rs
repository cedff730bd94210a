//! Detection of top-level definition starts in source code.
//!
//! A [`BoundaryDetector`] reports the byte offsets where definitions begin.
//! The code splitter only consumes offsets, so detectors can be swapped
//! without touching the windowing logic.

use std::sync::LazyLock;

use regex::Regex;
use repolens_core::BoundaryMode;
use repolens_walk::Language;
use tree_sitter::Parser;

/// Finds where top-level definitions start in a source file.
pub trait BoundaryDetector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Byte offsets of definition starts, ascending.
    ///
    /// `lang` is the lowercased file extension. Returns `None` when this
    /// detector cannot handle the language, and `Some(vec![])` when it can
    /// but found nothing.
    fn boundaries(&self, source: &str, lang: &str) -> Option<Vec<usize>>;
}

/// Keyword- or brace-style definitions anchored at column 0.
static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:(?:def|class|fn|func|function)\s+[A-Za-z_$][\w$]*\s*\(|[A-Za-z_$][\w$]*\s*\([^)]*\)\s*\{)",
    )
    .expect("definition regex is valid")
});

/// Single-pass regex heuristic; handles every language.
///
/// # Examples
///
/// ```
/// use repolens_index::chunker::{BoundaryDetector, RegexBoundaries};
///
/// let src = "import os\n\ndef a():\n    pass\n\ndef b():\n    pass\n";
/// let starts = RegexBoundaries.boundaries(src, "py").unwrap();
/// assert_eq!(starts, vec![11, 30]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexBoundaries;

impl BoundaryDetector for RegexBoundaries {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn boundaries(&self, source: &str, _lang: &str) -> Option<Vec<usize>> {
        Some(DEFINITION.find_iter(source).map(|m| m.start()).collect())
    }
}

/// tree-sitter top-level definitions for languages with a bundled grammar.
///
/// Comments and attributes directly above a definition stay with it.
///
/// # Examples
///
/// ```
/// use repolens_index::chunker::{BoundaryDetector, SyntaxBoundaries};
///
/// let src = "use std::io;\n\n/// Docs.\nfn a() {}\n\nstruct B;\n";
/// let starts = SyntaxBoundaries.boundaries(src, "rs").unwrap();
/// assert_eq!(starts, vec![14, 35]);
/// assert!(SyntaxBoundaries.boundaries("x: 1", "yaml").is_none());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxBoundaries;

impl BoundaryDetector for SyntaxBoundaries {
    fn name(&self) -> &'static str {
        "syntax"
    }

    fn boundaries(&self, source: &str, lang: &str) -> Option<Vec<usize>> {
        let language = Language::from_extension(lang);
        let grammar = language.tree_sitter_language()?;

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            tracing::debug!(language = %language, error = %e, "grammar failed to load");
            return None;
        }
        let tree = parser.parse(source, None)?;
        let root = tree.root_node();

        let mut starts = Vec::new();
        let mut leading: Option<usize> = None;
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            let kind = child.kind();
            if is_leading_trivia(kind) {
                leading.get_or_insert(child.start_byte());
            } else if is_definition(language, kind) {
                starts.push(leading.take().unwrap_or(child.start_byte()));
            } else {
                leading = None;
            }
        }
        Some(starts)
    }
}

fn is_leading_trivia(kind: &str) -> bool {
    kind.contains("comment") || kind == "attribute_item" || kind == "decorator"
}

fn is_definition(language: Language, kind: &str) -> bool {
    let kinds: &[&str] = match language {
        Language::Rust => &[
            "function_item",
            "struct_item",
            "enum_item",
            "union_item",
            "impl_item",
            "trait_item",
            "mod_item",
            "macro_definition",
            "type_item",
            "const_item",
            "static_item",
        ],
        Language::Python => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        Language::TypeScript | Language::Tsx | Language::JavaScript => &[
            "function_declaration",
            "generator_function_declaration",
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
            "type_alias_declaration",
            "enum_declaration",
            "export_statement",
            "module",
        ],
        Language::Go => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
        ],
        Language::Java => &[
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "record_declaration",
            "annotation_type_declaration",
        ],
        Language::C | Language::Cpp => &[
            "function_definition",
            "struct_specifier",
            "class_specifier",
            "enum_specifier",
            "union_specifier",
            "namespace_definition",
            "template_declaration",
        ],
        Language::Ruby => &["method", "singleton_method", "class", "module"],
        Language::Other => &[],
    };
    kinds.contains(&kind)
}

/// Tries detectors in order; the first one that handles the language wins.
///
/// If none does, no boundaries are reported and the splitter windows the
/// whole file.
///
/// # Examples
///
/// ```
/// use repolens_index::chunker::{BoundaryChain, BoundaryDetector, RegexBoundaries, SyntaxBoundaries};
///
/// let chain = BoundaryChain::new(vec![Box::new(SyntaxBoundaries), Box::new(RegexBoundaries)]);
/// // No grammar for shell scripts, so the regex detector answers.
/// let starts = chain.boundaries("function deploy() {\n  echo hi\n}\n", "sh").unwrap();
/// assert_eq!(starts, vec![0]);
/// ```
pub struct BoundaryChain {
    detectors: Vec<Box<dyn BoundaryDetector>>,
}

impl BoundaryChain {
    /// Chain the given detectors, highest priority first.
    pub fn new(detectors: Vec<Box<dyn BoundaryDetector>>) -> Self {
        Self { detectors }
    }
}

impl BoundaryDetector for BoundaryChain {
    fn name(&self) -> &'static str {
        self.detectors.first().map_or("none", |d| d.name())
    }

    fn boundaries(&self, source: &str, lang: &str) -> Option<Vec<usize>> {
        self.detectors
            .iter()
            .find_map(|d| d.boundaries(source, lang))
    }
}

/// The detector configured by `ingest.code_boundaries`.
pub fn detector_for(mode: BoundaryMode) -> Box<dyn BoundaryDetector> {
    match mode {
        BoundaryMode::Regex => Box::new(RegexBoundaries),
        BoundaryMode::Syntax => Box::new(BoundaryChain::new(vec![
            Box::new(SyntaxBoundaries),
            Box::new(RegexBoundaries),
        ])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_finds_keyword_definitions() {
        let src = "package main\n\nfunc Run(x int) {\n}\n\nfn helper() {}\nclass Foo(Base):\n    pass\n";
        let starts = RegexBoundaries.boundaries(src, "go").unwrap();
        let lines: Vec<&str> = starts
            .iter()
            .map(|&s| src[s..].lines().next().unwrap())
            .collect();
        assert_eq!(
            lines,
            vec!["func Run(x int) {", "fn helper() {}", "class Foo(Base):"]
        );
    }

    #[test]
    fn regex_finds_brace_style_definitions() {
        let src = "#include <stdio.h>\n\nint\nmain(int argc, char **argv) {\n  return 0;\n}\n";
        let starts = RegexBoundaries.boundaries(src, "c").unwrap();
        assert_eq!(starts.len(), 1);
        assert!(src[starts[0]..].starts_with("main("));
    }

    #[test]
    fn regex_ignores_indented_definitions() {
        let src = "class A:\n    def method(self):\n        pass\n";
        let starts = RegexBoundaries.boundaries(src, "py").unwrap();
        assert!(starts.is_empty(), "class without parens and indented def: {starts:?}");
    }

    #[test]
    fn syntax_attaches_decorators_and_comments() {
        let src = "import os\n\n# helper\n@cache\ndef a():\n    pass\n\nclass B:\n    def m(self):\n        pass\n";
        let starts = SyntaxBoundaries.boundaries(src, "py").unwrap();
        assert_eq!(starts.len(), 2);
        assert!(src[starts[0]..].starts_with("# helper"));
        assert!(src[starts[1]..].starts_with("class B"));
    }

    #[test]
    fn syntax_handles_javascript_exports() {
        let src = "const x = 1;\nexport function a() {}\nfunction b() {}\n";
        let starts = SyntaxBoundaries.boundaries(src, "js").unwrap();
        assert_eq!(starts.len(), 2);
        assert!(src[starts[0]..].starts_with("export function a"));
    }

    #[test]
    fn syntax_declines_unknown_languages() {
        assert!(SyntaxBoundaries.boundaries("a: b", "yml").is_none());
        assert!(SyntaxBoundaries.boundaries("echo", "").is_none());
    }

    #[test]
    fn syntax_mode_falls_back_to_regex() {
        let detector = detector_for(BoundaryMode::Syntax);
        assert_eq!(detector.name(), "syntax");
        let starts = detector.boundaries("def a(x):\n  1\n", "sh").unwrap();
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn empty_chain_reports_nothing() {
        let chain = BoundaryChain::new(Vec::new());
        assert_eq!(chain.name(), "none");
        assert!(chain.boundaries("def a(): pass", "py").is_none());
    }
}
