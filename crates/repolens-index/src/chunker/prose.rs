use std::sync::LazyLock;

use regex::Regex;

use super::{sliding_window, ChunkParams};

/// A Markdown ATX heading: one to six `#`, whitespace, then text.
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+\S").expect("heading regex is valid"));

/// Split prose at heading lines.
///
/// Each heading starts a block that runs to the next heading; text before
/// the first heading is its own block. Blocks that fit in `max_chars` are
/// kept whole, larger ones are windowed.
///
/// # Examples
///
/// ```
/// use repolens_index::ChunkParams;
/// use repolens_index::chunker::split_prose;
///
/// let params = ChunkParams::new(1200, 200).unwrap();
/// let chunks = split_prose("intro\n# A\nfoo\n## B\nbar", params);
/// assert_eq!(chunks, vec!["intro", "# A\nfoo", "## B\nbar"]);
/// ```
pub fn split_prose(text: &str, params: ChunkParams) -> Vec<String> {
    let mut cuts: Vec<usize> = HEADING.find_iter(text).map(|m| m.start()).collect();
    cuts.insert(0, 0);
    cuts.push(text.len());
    cuts.dedup();

    let mut chunks = Vec::new();
    for span in cuts.windows(2) {
        let block = &text[span[0]..span[1]];
        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() <= params.max_chars() {
            chunks.push(trimmed.to_string());
        } else {
            chunks.extend(sliding_window(block, params));
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(max, overlap).unwrap()
    }

    #[test]
    fn splits_at_headings() {
        let chunks = split_prose("# A\nfoo\n# B\nbar", params(1200, 200));
        assert_eq!(chunks, vec!["# A\nfoo", "# B\nbar"]);
    }

    #[test]
    fn no_headings_is_one_block() {
        let chunks = split_prose("just some text\nover two lines\n", params(1200, 200));
        assert_eq!(chunks, vec!["just some text\nover two lines"]);
    }

    #[test]
    fn non_headings_are_not_cut() {
        let text = "#hashtag\n####### seven\n  # indented\ntext";
        let chunks = split_prose(text, params(1200, 0));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn oversized_section_is_windowed() {
        let body = "x".repeat(50);
        let text = format!("# Small\nok\n# Big\n{body}");
        let chunks = split_prose(&text, params(20, 5));

        assert_eq!(chunks[0], "# Small\nok");
        assert!(chunks.len() > 2);
        assert!(chunks[1].starts_with("# Big"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn blank_sections_are_dropped() {
        let chunks = split_prose("\n\n# A\n\n\n# B\ntext\n", params(1200, 0));
        assert_eq!(chunks, vec!["# A", "# B\ntext"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_prose("", params(10, 0)).is_empty());
    }
}
