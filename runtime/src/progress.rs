use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Phase of a long-running request.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProgressType {
    #[default]
    None,
    LoadingImages,
    DetectingKeypoints,
    MatchingImages,
    StitchingPano,
    StitchFindFeatures,
    StitchMatchFeatures,
    StitchEstimateHomography,
    StitchBundleAdjustment,
    StitchSeamsPrepare,
    StitchSeamsFind,
    StitchCompose,
    StitchBlend,
    AutoCrop,
    Export,
    Inpainting,
    Cancelling,
}

impl ProgressType {
    const ALL: [ProgressType; 17] = [
        ProgressType::None,
        ProgressType::LoadingImages,
        ProgressType::DetectingKeypoints,
        ProgressType::MatchingImages,
        ProgressType::StitchingPano,
        ProgressType::StitchFindFeatures,
        ProgressType::StitchMatchFeatures,
        ProgressType::StitchEstimateHomography,
        ProgressType::StitchBundleAdjustment,
        ProgressType::StitchSeamsPrepare,
        ProgressType::StitchSeamsFind,
        ProgressType::StitchCompose,
        ProgressType::StitchBlend,
        ProgressType::AutoCrop,
        ProgressType::Export,
        ProgressType::Inpainting,
        ProgressType::Cancelling,
    ];

    fn from_u8(v: u8) -> Self {
        Self::ALL.get(v as usize).copied().unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressType::None => "",
            ProgressType::LoadingImages => "Loading images",
            ProgressType::DetectingKeypoints => "Detecting keypoints",
            ProgressType::MatchingImages => "Matching images",
            ProgressType::StitchingPano => "Stitching pano",
            ProgressType::StitchFindFeatures => "Finding features",
            ProgressType::StitchMatchFeatures => "Matching features",
            ProgressType::StitchEstimateHomography => "Estimating homography",
            ProgressType::StitchBundleAdjustment => "Bundle adjustment",
            ProgressType::StitchSeamsPrepare => "Preparing seams",
            ProgressType::StitchSeamsFind => "Finding seams",
            ProgressType::StitchCompose => "Composing pano",
            ProgressType::StitchBlend => "Blending",
            ProgressType::AutoCrop => "Auto crop",
            ProgressType::Export => "Exporting",
            ProgressType::Inpainting => "Inpainting",
            ProgressType::Cancelling => "Cancelling",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub kind: ProgressType,
    pub tasks_done: usize,
    pub num_tasks: usize,
}

impl ProgressReport {
    /// Percentage in `[0, 100]`; 0 while no tasks are scheduled.
    pub fn percent(&self) -> u32 {
        if self.num_tasks == 0 {
            return 0;
        }
        ((self.tasks_done.min(self.num_tasks) * 100) / self.num_tasks) as u32
    }
}

/// Shared, sticky cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lock-free progress counters of one request.
///
/// `tasks_done` never exceeds `num_tasks`, and once cancelled the monitor
/// stays cancelled. The phase of a cancelled monitor can only move to
/// [`ProgressType::Cancelling`], so late resets from unwinding work do not
/// hide the cancellation.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    kind: AtomicU8,
    tasks_done: AtomicUsize,
    num_tasks: AtomicUsize,
    cancel: CancellationToken,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, kind: ProgressType, num_tasks: usize) {
        self.set_task_type(kind);
        self.num_tasks.store(num_tasks, Ordering::SeqCst);
        self.tasks_done.store(0, Ordering::SeqCst);
    }

    pub fn set_task_type(&self, kind: ProgressType) {
        if self.is_cancelled() && kind != ProgressType::Cancelling {
            return;
        }
        self.kind.store(kind as u8, Ordering::SeqCst);
    }

    pub fn set_num_tasks(&self, num_tasks: usize) {
        self.num_tasks.store(num_tasks, Ordering::SeqCst);
        let _ = self
            .tasks_done
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| {
                (done > num_tasks).then_some(num_tasks)
            });
    }

    pub fn notify_task_done(&self) {
        let total = self.num_tasks.load(Ordering::SeqCst);
        let _ = self
            .tasks_done
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| {
                (done < total).then_some(done + 1)
            });
    }

    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            kind: ProgressType::from_u8(self.kind.load(Ordering::SeqCst)),
            tasks_done: self.tasks_done.load(Ordering::SeqCst),
            num_tasks: self.num_tasks.load(Ordering::SeqCst),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_never_exceeds_total() {
        let p = ProgressMonitor::new();
        p.reset(ProgressType::LoadingImages, 2);
        for _ in 0..5 {
            p.notify_task_done();
        }
        let r = p.report();
        assert_eq!((r.tasks_done, r.num_tasks), (2, 2));
        assert_eq!(r.percent(), 100);
        assert_eq!(r.kind, ProgressType::LoadingImages);

        p.set_num_tasks(1);
        assert_eq!(p.report().tasks_done, 1);
    }

    #[test]
    fn cancellation_is_sticky() {
        let p = ProgressMonitor::new();
        let token = p.token();
        assert!(!p.is_cancelled());
        token.cancel();
        assert!(p.is_cancelled());
        p.reset(ProgressType::Export, 3);
        assert!(p.is_cancelled());
    }

    #[test]
    fn cancelled_phase_survives_late_resets() {
        let p = ProgressMonitor::new();
        p.reset(ProgressType::StitchBlend, 4);
        p.cancel();
        p.set_task_type(ProgressType::Cancelling);
        p.reset(ProgressType::Export, 1);
        p.set_task_type(ProgressType::AutoCrop);
        let r = p.report();
        assert_eq!(r.kind, ProgressType::Cancelling);
        assert_eq!(r.kind.label(), "Cancelling");
        assert_eq!((r.tasks_done, r.num_tasks), (0, 1));
    }

    #[test]
    fn type_roundtrips_through_atomic() {
        let p = ProgressMonitor::new();
        for kind in ProgressType::ALL {
            p.set_task_type(kind);
            assert_eq!(p.report().kind, kind);
        }
        assert_eq!(ProgressReport { kind: ProgressType::None, tasks_done: 0, num_tasks: 0 }.percent(), 0);
    }
}
