use panorama::photo::synthetic::render_view;
use panorama::photo::StitchStatus;
use panorama::pipeline::{
    load_options, save_options, LoadingOptions, MatchingOptions, Options, OptionsLoad, PipelineConfig,
    StitcherPipeline, StitchingOptions,
};
use std::sync::Arc;

#[test]
fn detect_stitch_and_export() {
    panorama::init_logging();
    assert!(panorama::init_thread_pool(Some(2)).is_ok());

    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = [-0.25, 0.0, 0.25]
        .iter()
        .enumerate()
        .map(|(i, &yaw)| {
            let path = dir.path().join(format!("shot{i}.png"));
            render_view(21, yaw, 0.0, 240, 180, 220.0).save(&path).unwrap();
            path
        })
        .collect();

    let options = Options::default();
    save_options(dir.path(), &options).unwrap();
    let OptionsLoad::Loaded(options) = load_options(dir.path()) else {
        panic!("options not reloaded");
    };

    let pipeline = StitcherPipeline::new(PipelineConfig::default()).unwrap();
    let matching = MatchingOptions::default().with_match_threshold(30);
    let mut data = pipeline.run_loading(paths, LoadingOptions::default(), matching).get().unwrap();
    assert_eq!(data.panos.len(), 1);
    assert_eq!(data.panos[0].len(), 3);

    let export_path = dir.path().join("pano.jpg");
    let stitching = StitchingOptions::new(0)
        .with_full_res(true)
        .with_export_path(&export_path)
        .with_stitch(options.stitch.clone());
    let result = pipeline.run_stitching(Arc::new(data.clone()), stitching).get().unwrap();
    assert_eq!(result.status, StitchStatus::Success);
    assert!(export_path.exists());

    data.apply_stitch_result(&result);
    assert!(data.panos[0].exported);
    assert!(data.panos[0].cameras.is_some());
}
