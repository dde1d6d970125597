use pano_photo::synthetic::{blank_view, render_view};
use pano_pipeline::*;
use pano_photo::StitchStatus;
use pano_runtime::ProgressType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn pipeline() -> StitcherPipeline {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    StitcherPipeline::new(PipelineConfig::default().with_threads(3).with_poll_timeout(Duration::from_millis(20)))
        .unwrap()
}

fn write_views(dir: &Path) -> Vec<PathBuf> {
    let frames = [
        render_view(5, -0.3, 0.0, 240, 180, 220.0),
        render_view(5, 0.0, 0.0, 240, 180, 220.0),
        render_view(5, 0.3, 0.0, 240, 180, 220.0),
        blank_view(240, 180, 90),
    ];
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let path = dir.join(format!("img{i}.png"));
            frame.save(&path).unwrap();
            path
        })
        .collect()
}

fn matching() -> MatchingOptions {
    MatchingOptions::default().with_match_threshold(30)
}

fn load(p: &StitcherPipeline, paths: Vec<PathBuf>, matching: MatchingOptions) -> StitcherData {
    p.run_loading(paths, LoadingOptions::default(), matching).get().unwrap()
}

#[test]
fn loads_and_groups_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = write_views(dir.path());
    paths.push(dir.path().join("missing.png"));

    let p = pipeline();
    let data = load(&p, paths, matching());
    assert_eq!(data.images.len(), 4);
    assert_eq!(data.panos.len(), 1);
    assert_eq!(data.panos[0].ids(), &[0, 1, 2]);
    assert!(!data.matches.is_empty());

    let report = p.progress();
    assert_eq!(report.kind, ProgressType::MatchingImages);
    assert_eq!(report.tasks_done, report.num_tasks);
}

#[test]
fn matching_type_controls_grouping() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_views(dir.path());
    let p = pipeline();

    let none = load(&p, paths.clone(), matching().with_matching_type(MatchingType::None));
    assert_eq!(none.images.len(), 4);
    assert!(none.panos.is_empty() && none.matches.is_empty());
    assert!(!none.images[0].has_keypoints());

    let single = load(&p, paths, matching().with_matching_type(MatchingType::SinglePano));
    assert_eq!(single.panos.len(), 1);
    assert_eq!(single.panos[0].ids(), &[0, 1, 2, 3]);
}

#[test]
fn stitches_exports_and_caches_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_views(dir.path());
    let p = pipeline();
    let mut data = load(&p, paths, matching());

    let export_path = dir.path().join("out").join("pano.jpg");
    let options = StitchingOptions::new(0).with_full_res(true).with_export_path(&export_path);
    let result = p.run_stitching(Arc::new(data.clone()), options).get().unwrap();
    assert_eq!(result.status, StitchStatus::Success);
    assert!(result.full_res);
    assert_eq!(result.export_path.as_deref(), Some(export_path.as_path()));
    assert!(export_path.exists());

    let crop = result.auto_crop.expect("auto crop");
    assert!(!crop.is_full());
    let pano = result.pano.as_ref().expect("pano");
    let rect = crop.to_crop(pano.width(), pano.height()).expect("crop rect");
    let mask = result.mask.as_ref().expect("mask");
    assert!(rect.area() > 0);
    assert!(mask.get_pixel(rect.start.0, rect.start.1)[0] > 0);
    assert!(mask.get_pixel(rect.end.0, rect.end.1)[0] > 0);

    data.apply_stitch_result(&result);
    assert!(data.panos[0].cameras.is_some());
    assert!(data.panos[0].exported);
    assert_eq!(data.panos[0].crop, Some(crop));

    // Cached cameras skip estimation and give the same canvas.
    let again = p.run_stitching(Arc::new(data), StitchingOptions::new(0).with_full_res(true)).get().unwrap();
    assert_eq!(again.status, StitchStatus::Success);
    assert_eq!(again.pano.map(|i| i.dimensions()), Some(pano.dimensions()));
}

#[test]
fn missing_pano_is_invalid_input() {
    let p = pipeline();
    let err = p
        .run_stitching(Arc::new(StitcherData::default()), StitchingOptions::new(3))
        .get()
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[test]
fn export_crops_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crop.png");
    let pano = render_view(3, 0.0, 0.0, 100, 80, 90.0);
    let crop = pano_core::RatioRect {
        start: (0.25, 0.25),
        end: (0.75, 0.75),
    };
    let p = pipeline();
    let result = p.run_export(pano, ExportOptions::new(4, &path).with_crop(crop)).get().unwrap();
    assert_eq!(result.pano_id, 4);
    assert_eq!(result.export_path.as_deref(), Some(path.as_path()));
    let written = image::open(&path).unwrap();
    assert_eq!((written.width(), written.height()), (50, 40));
}

#[test]
fn inpainting_fills_outside_mask() {
    let pano = image::RgbImage::from_pixel(20, 10, image::Rgb([10, 120, 200]));
    let mask = image::GrayImage::from_fn(20, 10, |x, _| image::Luma([if (8..12).contains(&x) { 0 } else { 255 }]));
    let p = pipeline();
    let result = p.run_inpainting(pano.clone(), mask, InpaintingOptions::default()).get().unwrap();
    assert_eq!(result.pixels_inpainted, 40);
    for (got, want) in result.pano.pixels().zip(pano.pixels()) {
        for c in 0..3 {
            assert!((got[c] as i32 - want[c] as i32).abs() <= 1);
        }
    }
}

#[test]
fn new_request_cancels_loading() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_views(dir.path());
    let p = pipeline();

    let many: Vec<PathBuf> = paths.iter().cycle().take(40).cloned().collect();
    let first = p.run_loading(many, LoadingOptions::default(), matching());
    let first_progress = Arc::clone(first.progress());
    let second = p.run_loading(paths, LoadingOptions::default(), matching());

    assert!(first_progress.is_cancelled());
    assert_eq!(first_progress.report().kind, ProgressType::Cancelling);
    let err = first.get().err().expect("cancelled loading must not resolve");
    assert!(err.is_cancelled(), "unexpected error {err}");
    let data = second.get().unwrap();
    assert_eq!(data.panos.len(), 1);
}

#[test]
fn cancel_stops_stitching() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_views(dir.path());
    let p = pipeline();
    let mut data = load(&p, paths, matching());
    let shared = Arc::new(data.clone());
    let out = dir.path().join("out").join("pano.png");

    let task = p.run_stitching(shared, StitchingOptions::new(0).with_full_res(true).with_export_path(out.clone()));
    p.cancel();
    assert!(task.progress().is_cancelled());
    assert_eq!(task.progress().report().kind, ProgressType::Cancelling);
    match task.get() {
        Ok(result) => {
            data.apply_stitch_result(&result);
            panic!("cancelled stitch resolved to {:?}", result.status);
        }
        Err(e) => assert!(e.is_cancelled(), "unexpected error {e}"),
    }
    assert!(!data.panos[0].exported);
    assert!(data.panos[0].cameras.is_none());
    assert_eq!(p.progress(), pano_runtime::ProgressReport::default());
}
