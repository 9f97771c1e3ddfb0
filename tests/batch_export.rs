use seqcard::export::cancel::CancelToken;
use seqcard::model::sequence::{BeatData, GridMode, PictographData, SequenceMetadata};
use seqcard::{BatchExporter, ExportOptions, ExportStage, SequenceData};

const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="12" height="12">
    <rect x="1" y="1" width="10" height="10" fill="#447744"/>
</svg>"##;

fn sequence(id: &str) -> SequenceData {
    SequenceData {
        id: id.to_string(),
        word: "AB".to_string(),
        level: Some(1),
        beats: (1..=2)
            .map(|n| BeatData {
                id: format!("{id}-{n}"),
                beat_number: n,
                is_blank: false,
                pictograph: Some(PictographData {
                    letter: Some('A'),
                    grid_mode: GridMode::Box,
                    svg: Some(SVG.to_string()),
                }),
                blue_reversal: false,
                red_reversal: false,
            })
            .collect(),
        metadata: SequenceMetadata::default(),
    }
}

fn options() -> ExportOptions {
    let mut opts = ExportOptions::default();
    opts.beat_size = 32;
    opts
}

#[test]
fn five_item_batch_with_one_failure_finishes_with_four_successes() {
    let mut sequences: Vec<_> = (0..5).map(|i| sequence(&format!("s{i}"))).collect();
    // The third item fails validation: word overlay requested with no word.
    sequences[2].word = String::new();

    let mut exporter = BatchExporter::default();
    let result = exporter
        .export_sequences_as_images(
            "it-batch",
            &sequences,
            &options(),
            &CancelToken::new(),
            None,
        )
        .unwrap();

    assert_eq!(result.success_count, 4);
    assert_eq!(result.failure_count, 1);
    assert!(!result.cancelled);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("s2"));
    assert_eq!(result.blobs.len(), 4);
    assert_eq!(
        exporter.tracker_mut().snapshot("it-batch").unwrap().stage,
        ExportStage::Completed
    );
}

#[test]
fn progress_reports_every_item_then_the_final_phase() {
    let sequences: Vec<_> = (0..4).map(|i| sequence(&format!("s{i}"))).collect();
    let mut exporter = BatchExporter::default();

    let mut seen = Vec::new();
    let mut cb = |current: usize, total: usize, message: &str| {
        seen.push((current, total, message.to_string()));
    };
    exporter
        .export_sequences_as_images(
            "it-progress",
            &sequences,
            &options(),
            &CancelToken::new(),
            Some(&mut cb),
        )
        .unwrap();

    assert_eq!(seen.len(), 5);
    for (i, (current, total, _)) in seen.iter().take(4).enumerate() {
        assert_eq!(*current, i + 1);
        assert_eq!(*total, 4);
    }
    assert!(seen[4].2.contains("finalizing"));
}

#[test]
fn cancellation_stops_future_items_and_keeps_counts_consistent() {
    let sequences: Vec<_> = (0..6).map(|i| sequence(&format!("s{i}"))).collect();
    let mut exporter = BatchExporter::default();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut cb = move |current: usize, _total: usize, _message: &str| {
        if current == 3 {
            trigger.cancel();
        }
    };
    let result = exporter
        .export_sequences_as_images("it-cancel", &sequences, &options(), &cancel, Some(&mut cb))
        .unwrap();

    assert!(result.cancelled);
    let processed = result.success_count + result.failure_count;
    assert_eq!(processed, 3);
    assert_eq!(result.blobs.len(), result.success_count);
    assert_eq!(
        exporter.tracker_mut().snapshot("it-cancel").unwrap().stage,
        ExportStage::Cancelled
    );
}

#[test]
fn batch_to_directory_writes_page_files() {
    let sequences: Vec<_> = (0..2).map(|i| sequence(&format!("s{i}"))).collect();
    let dir = std::env::temp_dir().join(format!("seqcard-it-{}", std::process::id()));

    let mut exporter = BatchExporter::default();
    let result = exporter
        .export_sequences_to_dir(
            "it-dir",
            &sequences,
            &options(),
            &dir,
            "word card",
            &CancelToken::new(),
            None,
        )
        .unwrap();

    assert_eq!(result.success_count, 2);
    let mut names: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("word_card_page_001"));
    assert!(names[0].ends_with(".png"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn empty_batch_completes_cleanly() {
    let mut exporter = BatchExporter::default();
    let result = exporter
        .export_sequences_as_images("it-empty", &[], &options(), &CancelToken::new(), None)
        .unwrap();
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 0);
    assert!(!result.cancelled);
}
