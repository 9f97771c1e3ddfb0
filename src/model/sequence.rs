use crate::foundation::error::{SeqcardError, SeqcardResult};

/// Grid pattern drawn behind a beat cell.
///
/// This is a closed two-value enumeration; anything else in input data is a
/// validation error, not an open string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMode {
    Diamond,
    Box,
}

impl GridMode {
    pub fn opposite(self) -> GridMode {
        match self {
            GridMode::Diamond => GridMode::Box,
            GridMode::Box => GridMode::Diamond,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GridMode::Diamond => "diamond",
            GridMode::Box => "box",
        }
    }
}

impl std::str::FromStr for GridMode {
    type Err = SeqcardError;

    fn from_str(s: &str) -> SeqcardResult<Self> {
        match s {
            "diamond" => Ok(GridMode::Diamond),
            "box" => Ok(GridMode::Box),
            other => Err(SeqcardError::validation(format!(
                "unknown grid mode '{other}' (expected 'diamond' or 'box')"
            ))),
        }
    }
}

/// Symbolic (non-raster) payload of one beat.
///
/// The optional `svg` markup is what the external rasterizer consumes; when it
/// is absent or fails to rasterize, the beat renderer falls back to primitive
/// drawing.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PictographData {
    #[serde(default)]
    pub letter: Option<char>,
    #[serde(default = "default_grid_mode")]
    pub grid_mode: GridMode,
    #[serde(default)]
    pub svg: Option<String>,
}

fn default_grid_mode() -> GridMode {
    GridMode::Diamond
}

/// One discrete step of a sequence, rendered as one grid cell.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BeatData {
    pub id: String,
    pub beat_number: u32,
    #[serde(default)]
    pub is_blank: bool,
    #[serde(default)]
    pub pictograph: Option<PictographData>,
    #[serde(default)]
    pub blue_reversal: bool,
    #[serde(default)]
    pub red_reversal: bool,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SequenceMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A full sequence: the unit of one card export. Read-only to the pipeline.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SequenceData {
    pub id: String,
    pub word: String,
    #[serde(default)]
    pub level: Option<u8>,
    pub beats: Vec<BeatData>,
    #[serde(default)]
    pub metadata: SequenceMetadata,
}

impl SequenceData {
    pub fn validate(&self) -> SeqcardResult<()> {
        if self.id.trim().is_empty() {
            return Err(SeqcardError::validation("sequence id must be non-empty"));
        }
        for (i, beat) in self.beats.iter().enumerate() {
            if beat.id.trim().is_empty() {
                return Err(SeqcardError::validation(format!(
                    "beat {i} has an empty id"
                )));
            }
        }
        Ok(())
    }

    /// Start state for the optional leading grid cell. The first non-blank
    /// beat's pictograph doubles as the start pose when present.
    pub fn start_pictograph(&self) -> Option<&PictographData> {
        self.beats
            .iter()
            .find(|b| !b.is_blank)
            .and_then(|b| b.pictograph.as_ref())
    }
}
