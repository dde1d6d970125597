//! Wave correction: levels the horizon of a rotated camera set.

use super::CameraParams;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveDirection {
    Horizontal,
    Vertical,
}

/// Horizontal when the cameras spread more sideways than up and down.
pub fn detect_wave_direction(cameras: &[CameraParams]) -> WaveDirection {
    let spread = |row: usize| {
        let values = cameras.iter().map(|c| c.rotation[row][2]);
        let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
        let min = values.fold(f64::INFINITY, f64::min);
        max - min
    };
    if spread(0) >= spread(1) {
        WaveDirection::Horizontal
    } else {
        WaveDirection::Vertical
    }
}

/// Rotates the whole camera set so the cameras' x axes lie in one plane,
/// which straightens the horizon (or the vertical for a vertical pano).
pub fn wave_correct(cameras: &mut [CameraParams], direction: WaveDirection) {
    if cameras.len() < 2 {
        return;
    }
    let rotations: Vec<Matrix3<f64>> = cameras.iter().map(CameraParams::r).collect();

    let mut moment = Matrix3::zeros();
    for r in &rotations {
        let col = r.column(0).into_owned();
        moment += col * col.transpose();
    }
    let eigen = SymmetricEigen::new(moment);
    let pick = match direction {
        WaveDirection::Horizontal => eigen.eigenvalues.imin(),
        WaveDirection::Vertical => eigen.eigenvalues.imax(),
    };
    let mut rg1: Vector3<f64> = eigen.eigenvectors.column(pick).into_owned();

    let img_k: Vector3<f64> = rotations.iter().map(|r| r.column(2).into_owned()).sum();
    let mut rg0 = rg1.cross(&img_k);
    let norm = rg0.norm();
    if norm <= f64::EPSILON {
        return;
    }
    rg0 /= norm;
    let rg2 = rg0.cross(&rg1);

    let conf: f64 = match direction {
        WaveDirection::Horizontal => rotations.iter().map(|r| rg0.dot(&r.column(0))).sum(),
        WaveDirection::Vertical => -rotations.iter().map(|r| rg1.dot(&r.column(0))).sum::<f64>(),
    };
    if conf < 0.0 {
        rg0 = -rg0;
        rg1 = -rg1;
    }

    let correction = Matrix3::from_rows(&[rg0.transpose(), rg1.transpose(), rg2.transpose()]);
    for (camera, r) in cameras.iter_mut().zip(&rotations) {
        camera.set_r(&(correction * r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn cameras_with(rotations: &[Matrix3<f64>]) -> Vec<CameraParams> {
        rotations
            .iter()
            .map(|r| {
                let mut c = CameraParams::default();
                c.set_r(r);
                c
            })
            .collect()
    }

    #[test]
    fn levels_tilted_horizontal_sweep() {
        let tilt = Rotation3::from_euler_angles(0.2, 0.0, 0.0).into_inner();
        let sweep: Vec<Matrix3<f64>> = [-0.4, 0.0, 0.4]
            .iter()
            .map(|&a| tilt * Rotation3::from_euler_angles(0.0, a, 0.0).into_inner())
            .collect();
        let mut cameras = cameras_with(&sweep);
        assert_eq!(detect_wave_direction(&cameras), WaveDirection::Horizontal);

        wave_correct(&mut cameras, WaveDirection::Horizontal);
        for c in &cameras {
            let r = c.r();
            assert!(r[(1, 0)].abs() < 1e-9, "x axis left the horizontal plane");
            assert!((r.determinant() - 1.0).abs() < 1e-9);
            assert!(r[(0, 0)] > 0.0);
        }
    }

    #[test]
    fn vertical_sweep_is_detected() {
        let sweep: Vec<Matrix3<f64>> = [-0.5, 0.0, 0.5]
            .iter()
            .map(|&a| Rotation3::from_euler_angles(a, 0.0, 0.0).into_inner())
            .collect();
        assert_eq!(detect_wave_direction(&cameras_with(&sweep)), WaveDirection::Vertical);
    }

    #[test]
    fn single_camera_untouched() {
        let r = Rotation3::from_euler_angles(0.1, 0.2, 0.3).into_inner();
        let mut cameras = cameras_with(&[r]);
        wave_correct(&mut cameras, WaveDirection::Horizontal);
        assert_eq!(cameras[0].r(), r);
    }
}
