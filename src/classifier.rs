/// Screenshot and screen recording recognition by file name.
///
/// A name is organizable when its lowercase form carries one of the capture
/// markers and ends with a known media extension, or when it starts with a
/// `YYYY-MM-DD_` timestamp.
///
/// # Examples
///
/// ```
/// use screensort::classifier::{ArtifactKind, Classifier};
///
/// let classifier = Classifier::default();
/// assert_eq!(
///     classifier.classify("Screenshot 2022-03-14 at 10.00.00 AM.png"),
///     Some(ArtifactKind::Screenshot)
/// );
/// assert_eq!(
///     classifier.classify("Screen Recording 2024-01-02 at 09.00.00.mov"),
///     Some(ArtifactKind::Recording)
/// );
/// assert!(!classifier.is_organizable("notes.txt"));
/// ```
use regex::Regex;
use std::sync::LazyLock;

static LEADING_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_").expect("built-in timestamp pattern is valid")
});

/// Markers that identify a capture, compared against the lowercase name.
pub const DEFAULT_MARKERS: &[&str] = &["screenshot", "screen recording", "simulator screenshot"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3"];

/// What kind of capture a file was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Still captures (PNG, JPEG, GIF).
    Screenshot,
    /// Screen or audio recordings (MOV, MP4, MP3).
    Recording,
    /// Any file named with a leading `YYYY-MM-DD_` timestamp.
    Timestamped,
}

impl ArtifactKind {
    /// Label used in run summaries.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "screenshots",
            ArtifactKind::Recording => "recordings",
            ArtifactKind::Timestamped => "timestamped",
        }
    }
}

/// Decides which file names are eligible for relocation.
#[derive(Debug, Clone)]
pub struct Classifier {
    markers: Vec<String>,
    include_audio: bool,
}

impl Classifier {
    /// Creates a classifier with the default markers.
    ///
    /// `include_audio` enables the extended media set (`mp3`).
    pub fn new(include_audio: bool) -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            include_audio,
        }
    }

    /// Adds a marker, stored lowercase. Blank markers are ignored.
    pub fn add_marker(&mut self, marker: &str) {
        let marker = marker.trim().to_lowercase();
        if !marker.is_empty() && !self.markers.contains(&marker) {
            self.markers.push(marker);
        }
    }

    /// Returns the kind of capture `name` is, if it is one at all.
    ///
    /// Total over all strings: empty names, names without extensions and
    /// uppercase extensions are all handled.
    pub fn classify(&self, name: &str) -> Option<ArtifactKind> {
        let lower = name.to_lowercase();

        if self.markers.iter().any(|marker| lower.contains(marker.as_str())) {
            if let Some(kind) = self.media_kind(&lower) {
                return Some(kind);
            }
        }

        if LEADING_TIMESTAMP.is_match(name) {
            return Some(ArtifactKind::Timestamped);
        }

        None
    }

    pub fn is_organizable(&self, name: &str) -> bool {
        self.classify(name).is_some()
    }

    fn media_kind(&self, lower_name: &str) -> Option<ArtifactKind> {
        let has_extension = |extensions: &[&str]| {
            extensions
                .iter()
                .any(|ext| lower_name.ends_with(&format!(".{ext}")))
        };

        if has_extension(IMAGE_EXTENSIONS) {
            Some(ArtifactKind::Screenshot)
        } else if has_extension(VIDEO_EXTENSIONS)
            || (self.include_audio && has_extension(AUDIO_EXTENSIONS))
        {
            Some(ArtifactKind::Recording)
        } else {
            None
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(false)
    }
}
