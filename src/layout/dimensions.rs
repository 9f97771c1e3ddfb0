use crate::export::options::ExportOptions;

/// Base reserved band heights at `beat_scale = 1.0`, in pixels.
const WORD_BAND_PX: f64 = 300.0;
const FOOTER_BAND_PX: f64 = 150.0;

/// Reserved-text-area scale tiers by beat count. Short sequences get a
/// proportionally smaller band so a one-beat card is not mostly whitespace.
pub fn beat_count_tier_factor(beat_count: usize) -> f64 {
    match beat_count {
        0 | 1 => 1.0 / 2.3,
        2 => 1.0 / 1.5,
        _ => 1.0,
    }
}

/// Extra vertical space reserved above and below the beat grid for the word
/// title and the user-info footer. Zero for disabled text features.
pub fn determine_additional_heights(
    options: &ExportOptions,
    beat_count: usize,
    beat_scale: f64,
) -> (u32, u32) {
    let tier = beat_count_tier_factor(beat_count);

    let top = if options.add_word || options.add_difficulty_level {
        (WORD_BAND_PX * beat_scale * tier).round().max(0.0) as u32
    } else {
        0
    };
    let bottom = if options.add_user_info {
        (FOOTER_BAND_PX * beat_scale * tier).round().max(0.0) as u32
    } else {
        0
    };
    (top, bottom)
}
