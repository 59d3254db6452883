//! Throttled centre-of-view ray query that decides which artwork is being looked at.

use std::time::{Duration, Instant};

use rapier3d::parry::query::Ray;
use rapier3d::prelude::Real;

use crate::artwork::ArtworkId;
use crate::scene::Scene;

pub const DEFAULT_GAZE_INTERVAL: Duration = Duration::from_millis(500);

/// What the detector may query. The scene is the real one; tests substitute.
pub trait GazeTargets {
    fn has_targets(&self) -> bool;
    fn nearest_artwork(&self, ray: &Ray) -> Option<ArtworkId>;
}

impl GazeTargets for Scene {
    fn has_targets(&self) -> bool {
        !self.hit_testable().is_empty()
    }

    fn nearest_artwork(&self, ray: &Ray) -> Option<ArtworkId> {
        self.nearest_hit(ray, Real::MAX).and_then(|hit| hit.artwork)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GazeChange {
    Unchanged,
    Show(ArtworkId),
    Hide,
}

#[derive(Clone, Debug)]
pub struct GazeDetector {
    interval: Duration,
    last_poll: Option<Instant>,
    displayed: Option<ArtworkId>,
    polls: u64,
}

impl GazeDetector {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            displayed: None,
            polls: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn displayed(&self) -> Option<ArtworkId> {
        self.displayed
    }

    /// Number of ray queries actually run.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Runs a query when the interval has passed since the previous one; the
    /// first call always queries. An empty target set leaves the clock alone.
    pub fn update<T: GazeTargets + ?Sized>(
        &mut self,
        now: Instant,
        ray: &Ray,
        targets: &T,
    ) -> GazeChange {
        if !targets.has_targets() {
            return GazeChange::Unchanged;
        }
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.interval {
                return GazeChange::Unchanged;
            }
        }
        self.last_poll = Some(now);
        self.polls += 1;

        match targets.nearest_artwork(ray) {
            Some(artwork) if self.displayed != Some(artwork) => {
                self.displayed = Some(artwork);
                GazeChange::Show(artwork)
            }
            Some(_) => GazeChange::Unchanged,
            None if self.displayed.is_some() => {
                self.displayed = None;
                GazeChange::Hide
            }
            None => GazeChange::Unchanged,
        }
    }
}

impl Default for GazeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_GAZE_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::math::{Point, Vector};
    use std::cell::Cell;

    struct Scripted {
        answer: Cell<Option<ArtworkId>>,
        queries: Cell<u32>,
        populated: bool,
    }

    impl Scripted {
        fn new(answer: Option<usize>) -> Self {
            Self {
                answer: Cell::new(answer.map(ArtworkId)),
                queries: Cell::new(0),
                populated: true,
            }
        }
    }

    impl GazeTargets for Scripted {
        fn has_targets(&self) -> bool {
            self.populated
        }

        fn nearest_artwork(&self, _ray: &Ray) -> Option<ArtworkId> {
            self.queries.set(self.queries.get() + 1);
            self.answer.get()
        }
    }

    fn ray() -> Ray {
        Ray::new(Point::origin(), Vector::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn first_update_queries_immediately() {
        let targets = Scripted::new(Some(1));
        let mut gaze = GazeDetector::default();
        let change = gaze.update(Instant::now(), &ray(), &targets);
        assert_eq!(change, GazeChange::Show(ArtworkId(1)));
        assert_eq!(targets.queries.get(), 1);
    }

    #[test]
    fn queries_inside_the_interval_are_cached() {
        let targets = Scripted::new(Some(1));
        let mut gaze = GazeDetector::default();
        let start = Instant::now();
        gaze.update(start, &ray(), &targets);
        targets.answer.set(Some(ArtworkId(2)));
        let change = gaze.update(start + Duration::from_millis(499), &ray(), &targets);
        assert_eq!(change, GazeChange::Unchanged);
        assert_eq!(gaze.displayed(), Some(ArtworkId(1)));
        assert_eq!(targets.queries.get(), 1);

        let change = gaze.update(start + Duration::from_millis(501), &ray(), &targets);
        assert_eq!(change, GazeChange::Show(ArtworkId(2)));
        assert_eq!(targets.queries.get(), 2);
    }

    #[test]
    fn same_target_shows_once() {
        let targets = Scripted::new(Some(3));
        let mut gaze = GazeDetector::default();
        let start = Instant::now();
        let mut shows = 0;
        for step in 0..6 {
            let now = start + Duration::from_millis(600 * step);
            if let GazeChange::Show(_) = gaze.update(now, &ray(), &targets) {
                shows += 1;
            }
        }
        assert_eq!(shows, 1);
        assert_eq!(gaze.polls(), 6);
    }

    #[test]
    fn losing_the_target_hides_once() {
        let targets = Scripted::new(Some(0));
        let mut gaze = GazeDetector::default();
        let start = Instant::now();
        gaze.update(start, &ray(), &targets);
        targets.answer.set(None);
        let first = gaze.update(start + Duration::from_secs(1), &ray(), &targets);
        let second = gaze.update(start + Duration::from_secs(2), &ray(), &targets);
        assert_eq!(first, GazeChange::Hide);
        assert_eq!(second, GazeChange::Unchanged);
        assert_eq!(gaze.displayed(), None);
    }

    #[test]
    fn empty_target_set_does_not_consume_the_interval() {
        let mut targets = Scripted::new(Some(4));
        targets.populated = false;
        let mut gaze = GazeDetector::default();
        let start = Instant::now();
        assert_eq!(gaze.update(start, &ray(), &targets), GazeChange::Unchanged);
        assert_eq!(gaze.polls(), 0);

        targets.populated = true;
        let change = gaze.update(start + Duration::from_millis(10), &ray(), &targets);
        assert_eq!(change, GazeChange::Show(ArtworkId(4)));
    }
}
