use std::fmt;

/// Programming language of a code file, as far as syntax-aware chunking cares.
///
/// Only languages with a bundled tree-sitter grammar get their own variant;
/// everything else is [`Language::Other`] and is chunked with the regex
/// heuristic.
///
/// # Examples
///
/// ```
/// use repolens_walk::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("PY"), Language::Python);
/// assert_eq!(Language::from_extension("tsx"), Language::Tsx);
/// assert_eq!(Language::from_extension("hpp"), Language::Cpp);
/// assert_eq!(Language::from_extension("yaml"), Language::Other);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Other,
}

impl Language {
    /// Detect language from a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            _ => Language::Other,
        }
    }

    /// Short lowercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Other => "other",
        }
    }

    /// Get the tree-sitter grammar for this language.
    ///
    /// Returns `None` for [`Language::Other`].
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Other => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_language_has_a_grammar() {
        for lang in [
            Language::Rust,
            Language::Python,
            Language::TypeScript,
            Language::Tsx,
            Language::JavaScript,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Ruby,
        ] {
            assert!(lang.tree_sitter_language().is_some(), "{lang}");
        }
        assert!(Language::Other.tree_sitter_language().is_none());
    }

    #[test]
    fn grammars_load_into_a_parser() {
        let mut parser = tree_sitter::Parser::new();
        let grammar = Language::Python.tree_sitter_language().unwrap();
        parser.set_language(&grammar).unwrap();
        let tree = parser.parse("def f():\n    pass\n", None).unwrap();
        assert_eq!(tree.root_node().kind(), "module");
    }

    #[test]
    fn unknown_extensions_are_other() {
        assert_eq!(Language::from_extension(""), Language::Other);
        assert_eq!(Language::from_extension("kt"), Language::Other);
        assert_eq!(Language::from_extension("sh"), Language::Other);
    }
}
