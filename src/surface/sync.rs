// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use tracing::{debug, instrument, trace};

use crate::audio::HistoryWindow;
use crate::view::Drawable;

/// Result of asking the presenter for the next image.
pub enum Acquire<I> {
    /// A `suboptimal` image can still be presented, the swapchain is recreated after it.
    Image {
        slot: usize,
        image: I,
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface and must be recreated.
    Outdated,
    /// No image right now (e.g. timeout), try again next frame.
    Unavailable,
}

/// The GPU-facing half of a frame: images, recording targets and completion fences.
pub trait Presenter {
    type Image;
    type Target;
    type Fence;

    /// Number of frames that may be in flight, one fence slot each.
    fn slot_count(&self) -> usize;
    fn acquire(&mut self) -> Acquire<Self::Image>;
    /// Blocks until the work behind `fence` has completed.
    fn wait(&mut self, fence: Self::Fence);
    fn begin(&mut self, image: &Self::Image, width: u32, height: u32) -> Self::Target;
    fn submit(&mut self, target: Self::Target) -> Self::Fence;
    fn present(&mut self, image: Self::Image);
    fn recreate(&mut self, width: u32, height: u32);
    /// Current size of the presentation surface, zero while minimized.
    fn surface_extent(&self) -> (u32, u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Skipped,
}

/// Drives ACQUIRE, WAIT_PRIOR, RECORD, SUBMIT and PRESENT for every frame.
///
/// A slot is never recorded into before the fence of its previous submission
/// has been waited on. Resizes are only recorded and applied at the top of the
/// next frame, once every slot is idle.
pub struct FrameSynchronizer<P: Presenter> {
    presenter: P,
    fences: Vec<Option<P::Fence>>,
    drawables: Vec<Box<dyn Drawable<P::Target>>>,
    width: u32,
    height: u32,
    pending_resize: Option<(u32, u32)>,
}

impl<P: Presenter> FrameSynchronizer<P> {
    pub fn new(presenter: P, width: u32, height: u32) -> FrameSynchronizer<P> {
        let fences = (0..presenter.slot_count()).map(|_| None).collect();
        FrameSynchronizer {
            presenter,
            fences,
            drawables: Vec::new(),
            width,
            height,
            pending_resize: None,
        }
    }

    /// Drawables record in registration order.
    pub fn add_drawable(&mut self, drawable: Box<dyn Drawable<P::Target>>) {
        self.drawables.push(drawable);
    }

    pub fn process_audio(&mut self, history: &HistoryWindow) {
        for drawable in &mut self.drawables {
            drawable.process_audio(history);
        }
    }

    pub fn notify_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.pending_resize = Some((width, height));
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[instrument(skip(self))]
    pub fn render_frame(&mut self, dt: f32) -> FrameOutcome {
        if let Some((width, height)) = self.pending_resize.take() {
            self.recreate(width, height);
        }

        let (slot, image, suboptimal) = match self.presenter.acquire() {
            Acquire::Image {
                slot,
                image,
                suboptimal,
            } => (slot, image, suboptimal),
            Acquire::Outdated => {
                debug!("Surface outdated, recreating before the next frame");
                self.schedule_recreate();
                return FrameOutcome::Skipped;
            }
            Acquire::Unavailable => {
                trace!("No image available, skipping frame");
                return FrameOutcome::Skipped;
            }
        };
        if slot >= self.fences.len() {
            self.fences.resize_with(slot + 1, || None);
        }

        if let Some(fence) = self.fences[slot].take() {
            self.presenter.wait(fence);
        }

        let mut target = self.presenter.begin(&image, self.width, self.height);
        for drawable in &mut self.drawables {
            drawable.render(dt, &mut target);
        }

        self.fences[slot] = Some(self.presenter.submit(target));
        self.presenter.present(image);
        if suboptimal {
            trace!("Presented a suboptimal image");
            self.schedule_recreate();
        }
        FrameOutcome::Presented
    }

    /// Recreates at the surface's current extent on the next frame. A resize
    /// notified in the meantime takes precedence.
    fn schedule_recreate(&mut self) {
        let (width, height) = self.presenter.surface_extent();
        if self.pending_resize.is_none() && width > 0 && height > 0 {
            self.pending_resize = Some((width, height));
        }
    }

    fn recreate(&mut self, width: u32, height: u32) {
        self.wait_idle();
        self.presenter.recreate(width, height);
        self.fences = (0..self.presenter.slot_count()).map(|_| None).collect();
        self.width = width;
        self.height = height;
        debug!("Swapchain recreated at {width}x{height}");
    }

    /// Waits for every submitted frame to complete.
    pub fn wait_idle(&mut self) {
        for fence in self.fences.iter_mut().filter_map(Option::take) {
            self.presenter.wait(fence);
        }
    }
}

impl<P: Presenter> Drop for FrameSynchronizer<P> {
    fn drop(&mut self) {
        self.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::view::mesh::{LineMesh, MeshParams};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Wait(usize),
        Begin(usize, u32, u32),
        Draw(&'static str, usize),
        Submit(usize),
        Present(usize),
        Recreate(u32, u32),
    }

    enum Scripted {
        Outdated,
        Unavailable,
        Suboptimal,
    }

    struct FakeTarget {
        slot: usize,
        width: u32,
        height: u32,
    }

    struct FakePresenter {
        log: Rc<RefCell<Vec<Event>>>,
        slots: usize,
        next: usize,
        in_flight: Vec<bool>,
        script: VecDeque<Scripted>,
        extent: (u32, u32),
    }

    impl FakePresenter {
        fn new(slots: usize, log: &Rc<RefCell<Vec<Event>>>) -> FakePresenter {
            FakePresenter {
                log: log.clone(),
                slots,
                next: 0,
                in_flight: vec![false; slots],
                script: VecDeque::new(),
                extent: (800, 600),
            }
        }
    }

    impl Presenter for FakePresenter {
        type Image = usize;
        type Target = FakeTarget;
        type Fence = usize;

        fn slot_count(&self) -> usize {
            self.slots
        }

        fn acquire(&mut self) -> Acquire<usize> {
            let suboptimal = match self.script.pop_front() {
                Some(Scripted::Outdated) => return Acquire::Outdated,
                Some(Scripted::Unavailable) => return Acquire::Unavailable,
                Some(Scripted::Suboptimal) => true,
                None => false,
            };
            let slot = self.next;
            self.next = (self.next + 1) % self.slots;
            Acquire::Image {
                slot,
                image: slot,
                suboptimal,
            }
        }

        fn wait(&mut self, fence: usize) {
            self.in_flight[fence] = false;
            self.log.borrow_mut().push(Event::Wait(fence));
        }

        fn begin(&mut self, image: &usize, width: u32, height: u32) -> FakeTarget {
            assert!(!self.in_flight[*image], "recording into busy slot {image}");
            self.log.borrow_mut().push(Event::Begin(*image, width, height));
            FakeTarget {
                slot: *image,
                width,
                height,
            }
        }

        fn submit(&mut self, target: FakeTarget) -> usize {
            self.in_flight[target.slot] = true;
            self.log.borrow_mut().push(Event::Submit(target.slot));
            target.slot
        }

        fn present(&mut self, image: usize) {
            self.log.borrow_mut().push(Event::Present(image));
        }

        fn recreate(&mut self, width: u32, height: u32) {
            assert!(self.in_flight.iter().all(|f| !f), "recreated while busy");
            self.next = 0;
            self.log.borrow_mut().push(Event::Recreate(width, height));
        }

        fn surface_extent(&self) -> (u32, u32) {
            self.extent
        }
    }

    struct Named {
        name: &'static str,
        log: Rc<RefCell<Vec<Event>>>,
        processed: Rc<RefCell<usize>>,
    }

    impl Drawable<FakeTarget> for Named {
        fn process_audio(&mut self, history: &HistoryWindow) {
            *self.processed.borrow_mut() += history.count();
        }

        fn render(&mut self, _dt: f32, target: &mut FakeTarget) {
            assert!(target.width > 0 && target.height > 0);
            self.log.borrow_mut().push(Event::Draw(self.name, target.slot));
        }
    }

    fn setup(slots: usize) -> (FrameSynchronizer<FakePresenter>, Rc<RefCell<Vec<Event>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sync = FrameSynchronizer::new(FakePresenter::new(slots, &log), 800, 600);
        (sync, log)
    }

    #[test]
    fn waits_on_a_slot_before_recording_into_it() {
        let (mut sync, log) = setup(2);
        for _ in 0..6 {
            assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);
        }
        let log = log.borrow();
        assert_eq!(
            &log[..8],
            &[
                Event::Begin(0, 800, 600),
                Event::Submit(0),
                Event::Present(0),
                Event::Begin(1, 800, 600),
                Event::Submit(1),
                Event::Present(1),
                Event::Wait(0),
                Event::Begin(0, 800, 600),
            ]
        );
        assert_eq!(log.iter().filter(|e| matches!(e, Event::Wait(_))).count(), 4);
    }

    #[test]
    fn drawables_render_in_registration_order() {
        let (mut sync, log) = setup(3);
        let processed = Rc::new(RefCell::new(0));
        for name in ["grid", "trace"] {
            sync.add_drawable(Box::new(Named {
                name,
                log: log.clone(),
                processed: processed.clone(),
            }));
        }
        let mut history = HistoryWindow::new(4);
        history.push(Default::default());
        sync.process_audio(&history);
        assert_eq!(*processed.borrow(), 2);

        sync.render_frame(0.016);
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Begin(0, 800, 600),
                Event::Draw("grid", 0),
                Event::Draw("trace", 0),
                Event::Submit(0),
                Event::Present(0),
            ]
        );
    }

    #[test]
    fn resize_is_applied_at_the_next_frame() {
        let (mut sync, log) = setup(3);
        sync.render_frame(0.016);
        sync.render_frame(0.016);
        sync.notify_resize(1024, 768);
        assert_eq!(sync.width(), 800);

        for _ in 0..4 {
            assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);
        }
        assert_eq!((sync.width(), sync.height()), (1024, 768));

        let log = log.borrow();
        let recreate = log
            .iter()
            .position(|e| *e == Event::Recreate(1024, 768))
            .unwrap();
        // Both in-flight frames were waited on first.
        assert!(log[..recreate].contains(&Event::Wait(0)));
        assert!(log[..recreate].contains(&Event::Wait(1)));
        assert_eq!(log[recreate + 1], Event::Begin(0, 1024, 768));
        assert!(
            log[recreate..]
                .iter()
                .all(|e| !matches!(e, Event::Begin(_, w, h) if (*w, *h) != (1024, 768)))
        );
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let (mut sync, log) = setup(2);
        sync.notify_resize(0, 600);
        sync.notify_resize(640, 0);
        sync.render_frame(0.016);
        assert!(
            !log.borrow()
                .iter()
                .any(|e| matches!(e, Event::Recreate(..)))
        );
        assert_eq!(sync.width(), 800);
    }

    #[test]
    fn outdated_surface_skips_and_recreates() {
        let (mut sync, log) = setup(2);
        sync.render_frame(0.016);
        sync.presenter.script.push_back(Scripted::Outdated);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Skipped);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);

        let log = log.borrow();
        assert_eq!(
            &log[3..],
            &[
                Event::Wait(0),
                Event::Recreate(800, 600),
                Event::Begin(0, 800, 600),
                Event::Submit(0),
                Event::Present(0),
            ]
        );
    }

    #[test]
    fn unavailable_image_skips_without_touching_slots() {
        let (mut sync, log) = setup(2);
        sync.presenter.script.push_back(Scripted::Unavailable);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Skipped);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn outdated_surface_recreates_at_the_current_extent() {
        let (mut sync, log) = setup(2);
        sync.presenter.extent = (640, 480);
        sync.presenter.script.push_back(Scripted::Outdated);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Skipped);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);
        assert_eq!((sync.width(), sync.height()), (640, 480));
        assert_eq!(log.borrow()[0], Event::Recreate(640, 480));
    }

    #[test]
    fn suboptimal_image_is_presented_then_recreated() {
        let (mut sync, log) = setup(2);
        sync.presenter.extent = (1024, 768);
        sync.presenter.script.push_back(Scripted::Suboptimal);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Presented);

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Begin(0, 800, 600),
                Event::Submit(0),
                Event::Present(0),
                Event::Wait(0),
                Event::Recreate(1024, 768),
                Event::Begin(0, 1024, 768),
                Event::Submit(0),
                Event::Present(0),
            ]
        );
    }

    #[test]
    fn minimized_surface_is_not_recreated() {
        let (mut sync, log) = setup(2);
        sync.presenter.extent = (0, 0);
        sync.presenter.script.push_back(Scripted::Outdated);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Skipped);
        sync.presenter.script.push_back(Scripted::Unavailable);
        assert_eq!(sync.render_frame(0.016), FrameOutcome::Skipped);
        assert!(log.borrow().is_empty());
    }

    struct MeshDrawable {
        mesh: LineMesh,
        segments: Rc<RefCell<Vec<usize>>>,
    }

    impl Drawable<FakeTarget> for MeshDrawable {
        fn process_audio(&mut self, history: &HistoryWindow) {
            self.mesh.add_history(history);
        }

        fn render(&mut self, _dt: f32, _target: &mut FakeTarget) {
            self.mesh.build(1.0);
            self.segments.borrow_mut().push(self.mesh.segment_count());
        }
    }

    #[test]
    fn skipped_frames_do_not_duplicate_history_in_the_mesh() {
        let (mut sync, _log) = setup(2);
        let segments = Rc::new(RefCell::new(Vec::new()));
        sync.add_drawable(Box::new(MeshDrawable {
            mesh: LineMesh::new(
                MeshParams {
                    length_threshold: 8.0,
                    min_width_factor: 0.05,
                },
                100,
            ),
            segments: segments.clone(),
        }));

        let mut history = HistoryWindow::new(100);
        for i in 0..100 {
            history.push(AudioFrame {
                left: i as f32,
                right: (i % 2) as f32,
            });
        }
        for _ in 0..5 {
            sync.presenter.script.push_back(Scripted::Unavailable);
        }
        for _ in 0..6 {
            sync.process_audio(&history);
            sync.render_frame(0.016);
        }
        assert_eq!(*segments.borrow(), vec![99]);
    }

    #[test]
    fn drop_waits_for_in_flight_frames() {
        let (mut sync, log) = setup(3);
        sync.render_frame(0.016);
        sync.render_frame(0.016);
        drop(sync);
        let log = log.borrow();
        assert_eq!(&log[log.len() - 2..], &[Event::Wait(0), Event::Wait(1)]);
    }
}
