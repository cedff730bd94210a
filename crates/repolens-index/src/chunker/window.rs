use super::ChunkParams;

/// Split `text` into fixed-width character windows.
///
/// Windows are `max_chars` wide and start `step()` characters apart, so
/// consecutive windows share exactly `overlap` characters. The last window
/// is clipped to the end of the text. Windows are trimmed and empty ones
/// dropped.
///
/// # Examples
///
/// ```
/// use repolens_index::ChunkParams;
/// use repolens_index::chunker::sliding_window;
///
/// let params = ChunkParams::new(4, 1).unwrap();
/// assert_eq!(sliding_window("abcdefghij", params), vec!["abcd", "defg", "ghij"]);
/// ```
pub fn sliding_window(text: &str, params: ChunkParams) -> Vec<String> {
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = offsets.len();
    let byte_at = |idx: usize| offsets.get(idx).copied().unwrap_or(text.len());

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + params.max_chars()).min(len);
        let window = text[byte_at(start)..byte_at(end)].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        if end >= len {
            break;
        }
        start += params.step();
    }
    chunks
}
