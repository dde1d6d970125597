use image::{GrayImage, Luma, Rgb, RgbImage};
use pano_imgproc::*;

#[test]
fn test_resize_functional() {
    let mut img = GrayImage::new(100, 100);
    img.put_pixel(50, 50, Luma([255]));

    let up = resize(&img, 200, 200, Interpolation::Linear);
    assert_eq!(up.dimensions(), (200, 200));

    let down = resize(&img, 50, 50, Interpolation::Area);
    assert_eq!(down.dimensions(), (50, 50));
}

#[test]
fn test_resize_rgb() {
    let mut img = RgbImage::new(10, 10);
    img.put_pixel(5, 5, Rgb([255, 128, 64]));
    let resized = resize_rgb(&img, 20, 20, Interpolation::Linear);
    assert_eq!(resized.dimensions(), (20, 20));
    assert!(resized.pixels().any(|p| p[0] > 0));
}

#[test]
fn test_seam_mask_dilate_and_intersect() {
    let mut seam = GrayImage::new(10, 10);
    for y in 0..10 {
        for x in 0..5 {
            seam.put_pixel(x, y, Luma([255]));
        }
    }
    let coverage = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 8 { 255 } else { 0 }]));

    let kernel = create_morph_kernel(MorphShape::Rectangle, 3, 3);
    let grown = mask_and(&dilate(&seam, &kernel, 1), &coverage);
    assert_eq!(grown.get_pixel(5, 3)[0], 255);
    assert_eq!(grown.get_pixel(6, 3)[0], 0);
    assert_eq!(count_nonzero(&grown), 60);
}

#[test]
fn test_blend_pyramid_roundtrip_on_rgb() {
    let img = RgbImage::from_fn(33, 21, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8]));
    let float = FloatImage::from_rgb(&img);
    let pyramid = laplacian_pyramid(&float, 4);
    let back = collapse_laplacian(&pyramid).unwrap().to_rgb();
    assert_eq!(back, img);
}
