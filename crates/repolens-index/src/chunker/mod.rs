//! Text chunking: sliding windows, heading-aware prose, and
//! definition-aware code.
//!
//! All lengths are counted in characters (Unicode scalar values). Every
//! returned chunk is a trimmed, non-empty substring of the input.

pub mod boundary;
mod code;
mod prose;
mod window;

use repolens_core::{FileKind, IngestConfig, LensError};

pub use boundary::{detector_for, BoundaryChain, BoundaryDetector, RegexBoundaries, SyntaxBoundaries};
pub use code::split_code;
pub use prose::split_prose;
pub use window::sliding_window;

/// Window size and overlap, in characters.
///
/// # Examples
///
/// ```
/// use repolens_index::ChunkParams;
///
/// let params = ChunkParams::new(100, 20).unwrap();
/// assert_eq!(params.step(), 80);
/// assert!(ChunkParams::new(0, 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_chars: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Create chunking parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] if `max_chars` is zero.
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, LensError> {
        if max_chars == 0 {
            return Err(LensError::Config("max_chars must be at least 1".into()));
        }
        Ok(Self { max_chars, overlap })
    }

    /// Parameters from the `[ingest]` section.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] if `max_chars` is zero.
    pub fn from_config(config: &IngestConfig) -> Result<Self, LensError> {
        Self::new(config.max_chars, config.overlap)
    }

    /// Maximum characters per chunk.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Characters shared by consecutive windows.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows.
    ///
    /// An overlap at or above `max_chars` would never advance, so the step
    /// falls back to a full window.
    pub fn step(&self) -> usize {
        if self.overlap >= self.max_chars {
            self.max_chars
        } else {
            self.max_chars - self.overlap
        }
    }
}

/// Picks the splitting strategy for a file and applies it.
///
/// # Examples
///
/// ```
/// use repolens_core::FileKind;
/// use repolens_index::{ChunkParams, Chunker};
///
/// let chunker = Chunker::new(ChunkParams::new(1200, 200).unwrap());
/// let chunks = chunker.chunk("# A\nfoo\n# B\nbar", FileKind::Doc, "md");
/// assert_eq!(chunks, vec!["# A\nfoo", "# B\nbar"]);
/// ```
pub struct Chunker {
    params: ChunkParams,
    detector: Box<dyn BoundaryDetector>,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("params", &self.params)
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl Chunker {
    /// A chunker using the regex boundary detector for code.
    pub fn new(params: ChunkParams) -> Self {
        Self::with_detector(params, Box::new(RegexBoundaries))
    }

    /// A chunker using a custom boundary detector for code.
    pub fn with_detector(params: ChunkParams, detector: Box<dyn BoundaryDetector>) -> Self {
        Self { params, detector }
    }

    /// Build from the `[ingest]` section, honoring `code_boundaries`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::Config`] if `max_chars` is zero.
    pub fn from_config(config: &IngestConfig) -> Result<Self, LensError> {
        let params = ChunkParams::from_config(config)?;
        Ok(Self::with_detector(params, detector_for(config.code_boundaries)))
    }

    /// The parameters in use.
    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Split `text` with the strategy matching `kind`.
    ///
    /// `lang` is the lowercased file extension; it only matters for code.
    /// Ignored files produce no chunks.
    pub fn chunk(&self, text: &str, kind: FileKind, lang: &str) -> Vec<String> {
        match kind {
            FileKind::Doc => split_prose(text, self.params),
            FileKind::Code => split_code(text, lang, self.params, self.detector.as_ref()),
            FileKind::Ignored => Vec::new(),
        }
    }
}
