use crate::model::sequence::SequenceData;

/// Output encoding for an exported card image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// Options for one export call. Deserializing a partial document merges it
/// with these defaults; the struct is immutable per export.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_start_position: bool,
    pub add_beat_numbers: bool,
    pub add_reversal_symbols: bool,
    pub add_user_info: bool,
    pub add_word: bool,
    pub add_difficulty_level: bool,
    pub combined_grids: bool,
    pub beat_scale: f64,
    pub beat_size: u32,
    pub margin: u32,
    pub red_visible: bool,
    pub blue_visible: bool,
    pub user_name: String,
    pub export_date: String,
    pub notes: String,
    pub format: ImageFormat,
    pub quality: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_start_position: true,
            add_beat_numbers: true,
            add_reversal_symbols: true,
            add_user_info: true,
            add_word: true,
            add_difficulty_level: true,
            combined_grids: false,
            beat_scale: 1.0,
            beat_size: 144,
            margin: 50,
            red_visible: true,
            blue_visible: true,
            user_name: "Anonymous".to_string(),
            export_date: today_m_d_yyyy(),
            notes: String::new(),
            format: ImageFormat::Png,
            quality: 1.0,
        }
    }
}

/// Today's date as `M-D-YYYY`, without leading zeros.
pub fn today_m_d_yyyy() -> String {
    use chrono::Datelike;
    let now = chrono::Local::now();
    format!("{}-{}-{}", now.month(), now.day(), now.year())
}

/// Outcome of tier-1 validation. When `valid` is false no canvas work begins.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn push(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.valid = false;
    }
}

pub const MAX_SEQUENCE_LENGTH: usize = 64;
pub const MAX_DIMENSION: u32 = 16_384;
pub const MAX_MEMORY_MB: f64 = 200.0;

/// Validate options against a sequence before any rendering work.
pub fn validate_options(sequence: &SequenceData, options: &ExportOptions) -> ValidationReport {
    let mut report = ValidationReport {
        valid: true,
        errors: Vec::new(),
    };

    if !(0.1..=5.0).contains(&options.beat_scale) || !options.beat_scale.is_finite() {
        report.push("Beat scale must be between 0.1 and 5");
    }
    if !(1..=1000).contains(&options.beat_size) {
        report.push("Beat size must be between 1 and 1000 pixels");
    }
    if options.margin > 200 {
        report.push("Margin must be between 0 and 200 pixels");
    }
    if !(0.0..=1.0).contains(&options.quality) || !options.quality.is_finite() {
        report.push("Quality must be between 0 and 1");
    }
    if sequence.beats.len() > MAX_SEQUENCE_LENGTH {
        report.push(format!(
            "Sequence exceeds the maximum length of {MAX_SEQUENCE_LENGTH} beats"
        ));
    }
    if options.add_word && sequence.word.trim().is_empty() {
        report.push("A sequence word is required when add_word is enabled");
    }
    if options.add_user_info && options.user_name.trim().is_empty() {
        report.push("A user name is required when add_user_info is enabled");
    }

    report
}

/// Static description of what the export pipeline supports.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ExportCapabilities {
    pub max_sequence_length: usize,
    pub supported_formats: Vec<&'static str>,
    pub max_dimension: u32,
    pub max_memory_mb: f64,
    pub feature_flags: Vec<&'static str>,
}

pub fn export_capabilities() -> ExportCapabilities {
    ExportCapabilities {
        max_sequence_length: MAX_SEQUENCE_LENGTH,
        supported_formats: vec!["PNG", "JPEG"],
        max_dimension: MAX_DIMENSION,
        max_memory_mb: MAX_MEMORY_MB,
        feature_flags: vec![
            "include_start_position",
            "add_beat_numbers",
            "add_reversal_symbols",
            "add_user_info",
            "add_word",
            "add_difficulty_level",
            "combined_grids",
        ],
    }
}
