use repolens_core::RankedContext;

const SYSTEM_PROMPT: &str = "\
You are repolens, a senior engineer answering questions about one repository.

Rules:
- Answer only from the retrieved context below; if it does not cover the question, say so
- Cite the file path of every snippet you rely on
- Keep code and markdown formatting exactly as it appears in the context
- Prefer a short working example over a long description
- Call out assumptions and gaps in the context";

/// Build the system prompt for answer composition.
///
/// # Examples
///
/// ```
/// use repolens_answer::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("retrieved context"));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Render ranked contexts as `PATH: .. | LANG: ..` blocks separated by `---`.
///
/// # Examples
///
/// ```
/// use repolens_core::{Metadata, RankedContext};
/// use repolens_answer::prompt::format_context;
///
/// let mut metadata = Metadata::new();
/// metadata.insert("path".into(), "src/lib.rs".into());
/// metadata.insert("lang".into(), "rs".into());
/// let ctx = RankedContext { text: "pub fn run() {}".into(), metadata, score: 0.9 };
///
/// assert_eq!(format_context(&[ctx]), "PATH: src/lib.rs | LANG: rs\npub fn run() {}\n---\n");
/// ```
pub fn format_context(contexts: &[RankedContext]) -> String {
    let mut out = String::new();
    for ctx in contexts {
        out.push_str(&format!(
            "PATH: {} | LANG: {}\n{}\n---\n",
            ctx.path(),
            ctx.lang(),
            ctx.text
        ));
    }
    out
}

/// Build the user prompt: the question followed by its retrieved context.
///
/// # Examples
///
/// ```
/// use repolens_answer::prompt::build_user_prompt;
///
/// let prompt = build_user_prompt("Where is the config loaded?", &[]);
/// assert!(prompt.contains("Where is the config loaded?"));
/// assert!(prompt.contains("(no context retrieved)"));
/// ```
pub fn build_user_prompt(question: &str, contexts: &[RankedContext]) -> String {
    let context = if contexts.is_empty() {
        "(no context retrieved)\n".to_string()
    } else {
        format_context(contexts)
    };
    format!(
        "Question:\n{question}\n\n\
         Retrieved context:\n{context}\n\
         Explain the answer step by step. When code helps, include a minimal example \
         in a fenced block and name the source path it comes from. Leave code and \
         markdown formatting intact."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::Metadata;

    fn ctx(path: &str, lang: &str, text: &str, score: f64) -> RankedContext {
        let mut metadata = Metadata::new();
        metadata.insert("path".into(), path.into());
        metadata.insert("lang".into(), lang.into());
        RankedContext {
            text: text.into(),
            metadata,
            score,
        }
    }

    #[test]
    fn contexts_keep_rank_order() {
        let rendered = format_context(&[
            ctx("b.py", "py", "def b(): pass", 0.9),
            ctx("a.md", "md", "# A", 0.5),
        ]);
        let b = rendered.find("PATH: b.py").unwrap();
        let a = rendered.find("PATH: a.md").unwrap();
        assert!(b < a);
        assert_eq!(rendered.matches("---\n").count(), 2);
    }

    #[test]
    fn missing_metadata_renders_empty_fields() {
        let bare = RankedContext {
            text: "text".into(),
            metadata: Metadata::new(),
            score: 0.1,
        };
        assert_eq!(format_context(&[bare]), "PATH:  | LANG: \ntext\n---\n");
    }

    #[test]
    fn user_prompt_embeds_question_and_context() {
        let prompt = build_user_prompt(
            "How do I log in?",
            &[ctx("src/auth.py", "py", "def login(): ...", 0.8)],
        );
        assert!(prompt.starts_with("Question:\nHow do I log in?"));
        assert!(prompt.contains("PATH: src/auth.py | LANG: py\ndef login(): ..."));
        assert!(!prompt.contains("no context retrieved"));
    }

    #[test]
    fn system_prompt_asks_for_citations() {
        assert!(build_system_prompt().contains("file path"));
    }
}
