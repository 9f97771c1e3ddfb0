use crate::foundation::error::{SeqcardError, SeqcardResult};

/// Grid shape for a sequence image: `columns * rows` cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GridShape {
    pub columns: u32,
    pub rows: u32,
}

impl GridShape {
    pub fn cell_count(self) -> u32 {
        self.columns * self.rows
    }
}

/// Derived layout for one export. Recomputed per export call, never mutated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutData {
    pub columns: u32,
    pub rows: u32,
    pub beat_size: u32,
    pub include_start_position: bool,
    pub additional_height_top: u32,
    pub additional_height_bottom: u32,
}

/// Pick the grid shape for `beat_count` beats, plus one leading cell when a
/// start position is included.
///
/// Deterministic: among candidate column counts the shape with the fewest
/// wasted cells and the most even aspect wins; ties prefer wider-than-tall.
pub fn calculate_layout(beat_count: usize, include_start_position: bool) -> GridShape {
    let total = (beat_count + usize::from(include_start_position)).max(1) as u32;

    let mut best = GridShape {
        columns: total,
        rows: 1,
    };
    let mut best_score = u32::MAX;
    for columns in 1..=total {
        let rows = total.div_ceil(columns);
        let waste = columns * rows - total;
        let skew = columns.abs_diff(rows);
        let score = waste + skew;
        let better = score < best_score
            || (score == best_score && columns >= rows && best.columns < best.rows);
        if better {
            best = GridShape { columns, rows };
            best_score = score;
        }
    }
    best
}

/// Overall pixel dimensions for a grid shape at a given beat size and scale.
pub fn calculate_image_dimensions(
    shape: GridShape,
    total_additional_height: u32,
    beat_size: u32,
    beat_scale: f64,
) -> SeqcardResult<(u32, u32)> {
    if shape.columns == 0 || shape.rows == 0 {
        return Err(SeqcardError::validation(
            "grid shape must have positive columns and rows",
        ));
    }
    if beat_size == 0 {
        return Err(SeqcardError::validation("beat size must be positive"));
    }
    if !beat_scale.is_finite() || beat_scale <= 0.0 {
        return Err(SeqcardError::validation("beat scale must be positive"));
    }

    let cell = scaled_beat_size(beat_size, beat_scale);
    let width = (shape.columns * cell).max(1);
    let height = (shape.rows * cell + total_additional_height).max(1);
    Ok((width, height))
}

/// Beat cell edge length in device pixels after scaling. Always >= 1.
pub fn scaled_beat_size(beat_size: u32, beat_scale: f64) -> u32 {
    ((beat_size as f64) * beat_scale).round().max(1.0) as u32
}
