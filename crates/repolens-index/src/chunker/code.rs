use super::{sliding_window, BoundaryDetector, ChunkParams};

/// Split source code at definition starts.
///
/// Slices run from one detected start to the next (plus the file start and
/// end). A slice within `max_chars` is kept whole; a larger one, such as a
/// single oversized function, is windowed. Without any detected boundary
/// the whole file is windowed.
///
/// # Examples
///
/// ```
/// use repolens_index::ChunkParams;
/// use repolens_index::chunker::{split_code, RegexBoundaries};
///
/// let src = "def a():\n    return 1\n\ndef b():\n    return 2\n";
/// let params = ChunkParams::new(1200, 200).unwrap();
/// let chunks = split_code(src, "py", params, &RegexBoundaries);
/// assert_eq!(chunks, vec!["def a():\n    return 1", "def b():\n    return 2"]);
/// ```
pub fn split_code(
    text: &str,
    lang: &str,
    params: ChunkParams,
    detector: &dyn BoundaryDetector,
) -> Vec<String> {
    let starts = detector.boundaries(text, lang).unwrap_or_default();
    if starts.is_empty() {
        return sliding_window(text, params);
    }

    let mut cuts: Vec<usize> = std::iter::once(0)
        .chain(
            starts
                .into_iter()
                .filter(|&s| s < text.len() && text.is_char_boundary(s)),
        )
        .chain(std::iter::once(text.len()))
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    for span in cuts.windows(2) {
        let slice = &text[span[0]..span[1]];
        let trimmed = slice.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() <= params.max_chars() {
            chunks.push(trimmed.to_string());
        } else {
            chunks.extend(sliding_window(slice, params));
        }
    }
    chunks
}
