use image::{Rgb, RgbImage};
use pano_imgproc::{convert_rgb_to_gray, convert_rgb_to_gray_in_pool};
use rayon::ThreadPoolBuilder;

fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]))
}

#[test]
fn single_thread_pool_matches_global_pool() {
    let pool = ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let rgb = gradient(300, 200);
    assert_eq!(convert_rgb_to_gray_in_pool(&rgb, Some(&pool)), convert_rgb_to_gray(&rgb));
}

#[test]
fn concurrent_conversions_in_shared_pool() {
    let pool = ThreadPoolBuilder::new().num_threads(3).build().unwrap();
    let rgb = RgbImage::from_pixel(120, 80, Rgb([100, 150, 200]));
    let grays: Vec<_> = std::thread::scope(|s| {
        let jobs: Vec<_> = (0..4).map(|_| s.spawn(|| convert_rgb_to_gray_in_pool(&rgb, Some(&pool)))).collect();
        jobs.into_iter().map(|j| j.join().unwrap()).collect()
    });
    // (77*100 + 150*150 + 29*200) >> 8 = 140
    for gray in grays {
        assert!(gray.pixels().all(|p| p[0] == 140));
    }
}
