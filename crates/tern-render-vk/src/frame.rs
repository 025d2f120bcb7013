// SPDX-License-Identifier: CEPL-1.0
//! Steady-state frame ordering, kept apart from the GPU calls.
//!
//! The scheduler drives a [`FrameDevice`] through one frame:
//! wait on the slot fence, acquire, reset the fence, refresh uniforms,
//! record, submit and present. Frame slots rotate round-robin; the
//! render-complete semaphore follows the acquired image, not the slot.

use ash::vk;
use tracing::{error, warn};

use crate::error::VkError;

/// The GPU operations a frame is made of.
pub trait FrameDevice {
    /// Blocks until the slot's previous submission has finished.
    fn wait_fence(&mut self, slot: usize) -> Result<(), vk::Result>;
    fn reset_fence(&mut self, slot: usize) -> Result<(), vk::Result>;
    /// Acquires an image, signaling the slot's image-available semaphore.
    /// `Ok((index, suboptimal))`.
    fn acquire(&mut self, slot: usize) -> Result<(u32, bool), vk::Result>;
    fn update_uniforms(&mut self, slot: usize);
    fn record(&mut self, slot: usize, image: u32) -> Result<(), vk::Result>;
    /// Waits on the slot's image-available semaphore, signals the image's
    /// render-complete semaphore and the slot's fence.
    fn submit(&mut self, slot: usize, image: u32) -> Result<(), vk::Result>;
    /// Waits on the image's render-complete semaphore. `Ok(true)` means
    /// suboptimal.
    fn present(&mut self, image: u32) -> Result<bool, vk::Result>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain is stale and must be rebuilt.
    Recreate,
    /// Something failed and was logged; nothing else to do.
    Abandoned,
}

#[derive(Debug)]
pub struct FrameScheduler {
    frames: usize,
    slot: usize,
}

impl FrameScheduler {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: frames.max(1),
            slot: 0,
        }
    }

    /// Slot the next frame will use.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn render_frame(&mut self, dev: &mut impl FrameDevice) -> Result<FrameOutcome, VkError> {
        let slot = self.slot;

        if let Err(result) = dev.wait_fence(slot) {
            return fail("vkWaitForFences", result);
        }

        // The fence is reset only once an image is in hand, so a frame that
        // bails out here leaves it signaled for the next use of the slot.
        let image = match dev.acquire(slot) {
            Ok((image, _suboptimal)) => image,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(FrameOutcome::Recreate),
            Err(result) => return fail("vkAcquireNextImageKHR", result),
        };

        if let Err(result) = dev.reset_fence(slot) {
            return fail("vkResetFences", result);
        }

        dev.update_uniforms(slot);

        if let Err(result) = dev.record(slot, image) {
            // the fence is already reset; rebuilding the sync objects is the
            // only way to get a signaled one back
            fail("command buffer recording", result)?;
            return Ok(FrameOutcome::Recreate);
        }
        if let Err(result) = dev.submit(slot, image) {
            fail("vkQueueSubmit", result)?;
            return Ok(FrameOutcome::Recreate);
        }

        let outcome = match dev.present(image) {
            Ok(false) => FrameOutcome::Presented,
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => FrameOutcome::Recreate,
            Err(result) => {
                fail("vkQueuePresentKHR", result)?;
                FrameOutcome::Abandoned
            }
        };

        self.slot = (self.slot + 1) % self.frames;
        Ok(outcome)
    }
}

/// Device loss is returned; anything else is logged and the frame dropped.
fn fail(call: &'static str, result: vk::Result) -> Result<FrameOutcome, VkError> {
    if result == vk::Result::ERROR_DEVICE_LOST {
        return Err(VkError::Call { call, result });
    }
    if result == vk::Result::TIMEOUT {
        warn!("{call} timed out; frame skipped");
    } else {
        error!("{call} failed: {result}; frame abandoned");
    }
    Ok(FrameOutcome::Abandoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Uniforms(usize),
        Record { slot: usize, image: u32 },
        Submit { wait: usize, signal: u32, fence: usize },
        Present { wait: u32 },
    }

    /// Models fences and a rotating swapchain closely enough to check
    /// ordering.
    struct FakeDevice {
        events: Vec<Event>,
        signaled: Vec<bool>,
        executing: Vec<bool>,
        images: u32,
        next_image: u32,
        acquire_error: Option<vk::Result>,
        wait_error: Option<vk::Result>,
        present_result: Result<bool, vk::Result>,
    }

    impl FakeDevice {
        fn new(frames: usize, images: u32) -> Self {
            Self {
                events: Vec::new(),
                signaled: vec![true; frames],
                executing: vec![false; frames],
                images,
                next_image: 0,
                acquire_error: None,
                wait_error: None,
                present_result: Ok(false),
            }
        }

        fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
            self.events.iter().filter(|e| pred(e)).count()
        }
    }

    impl FrameDevice for FakeDevice {
        fn wait_fence(&mut self, slot: usize) -> Result<(), vk::Result> {
            self.events.push(Event::Wait(slot));
            if let Some(err) = self.wait_error {
                return Err(err);
            }
            if self.executing[slot] {
                // GPU finishes the work the fence guards
                self.executing[slot] = false;
                self.signaled[slot] = true;
            }
            assert!(self.signaled[slot], "wait on unsignaled fence would hang");
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> Result<(), vk::Result> {
            self.events.push(Event::Reset(slot));
            self.signaled[slot] = false;
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<(u32, bool), vk::Result> {
            self.events.push(Event::Acquire(slot));
            if let Some(err) = self.acquire_error {
                return Err(err);
            }
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok((image, false))
        }

        fn update_uniforms(&mut self, slot: usize) {
            self.events.push(Event::Uniforms(slot));
        }

        fn record(&mut self, slot: usize, image: u32) -> Result<(), vk::Result> {
            assert!(!self.executing[slot], "recording into a command buffer in flight");
            self.events.push(Event::Record { slot, image });
            Ok(())
        }

        fn submit(&mut self, slot: usize, image: u32) -> Result<(), vk::Result> {
            self.events.push(Event::Submit {
                wait: slot,
                signal: image,
                fence: slot,
            });
            self.executing[slot] = true;
            Ok(())
        }

        fn present(&mut self, image: u32) -> Result<bool, vk::Result> {
            self.events.push(Event::Present { wait: image });
            self.present_result
        }
    }

    #[test]
    fn frame_runs_in_order() {
        let mut dev = FakeDevice::new(2, 3);
        let mut sched = FrameScheduler::new(2);
        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            dev.events,
            vec![
                Event::Wait(0),
                Event::Acquire(0),
                Event::Reset(0),
                Event::Uniforms(0),
                Event::Record { slot: 0, image: 0 },
                Event::Submit {
                    wait: 0,
                    signal: 0,
                    fence: 0
                },
                Event::Present { wait: 0 },
            ]
        );
        assert_eq!(sched.slot(), 1);
    }

    #[test]
    fn third_frame_waits_for_first_fence_before_recording() {
        let mut dev = FakeDevice::new(2, 3);
        let mut sched = FrameScheduler::new(2);
        for _ in 0..3 {
            sched.render_frame(&mut dev).unwrap();
        }

        let third_record = dev
            .events
            .iter()
            .rposition(|e| matches!(e, Event::Record { .. }))
            .unwrap();
        let second_submit = dev
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Submit { .. }))
            .map(|(i, _)| i)
            .nth(1)
            .unwrap();
        let window = &dev.events[second_submit..third_record];
        let wait = window.iter().position(|e| *e == Event::Wait(0)).unwrap();
        let reset = window.iter().position(|e| *e == Event::Reset(0)).unwrap();
        assert!(wait < reset);
    }

    #[test]
    fn render_complete_semaphore_follows_image_not_slot() {
        let mut dev = FakeDevice::new(2, 3);
        let mut sched = FrameScheduler::new(2);
        for _ in 0..6 {
            sched.render_frame(&mut dev).unwrap();
        }

        let submits: Vec<(usize, u32)> = dev
            .events
            .iter()
            .filter_map(|e| match *e {
                Event::Submit { wait, signal, .. } => Some((wait, signal)),
                _ => None,
            })
            .collect();
        let presents: Vec<u32> = dev
            .events
            .iter()
            .filter_map(|e| match *e {
                Event::Present { wait } => Some(wait),
                _ => None,
            })
            .collect();

        assert_eq!(submits.len(), presents.len());
        for ((_, signal), wait) in submits.iter().zip(&presents) {
            assert_eq!(signal, wait);
        }
        // slot 0 rendered images 0 and 2, so slot and image really differ
        assert!(submits.iter().any(|&(slot, image)| slot as u32 != image));
    }

    #[test]
    fn hundred_draws_cycle_slots_without_device_loss() {
        let mut dev = FakeDevice::new(2, 3);
        let mut sched = FrameScheduler::new(2);
        for _ in 0..100 {
            assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Presented);
        }
        assert_eq!(sched.slot(), 100 % 2);
        assert_eq!(dev.count(|e| *e == Event::Wait(0)), 50);
        assert_eq!(dev.count(|e| *e == Event::Wait(1)), 50);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut dev = FakeDevice::new(2, 3);
        dev.acquire_error = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let mut sched = FrameScheduler::new(2);

        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Recreate);
        assert_eq!(dev.events, vec![Event::Wait(0), Event::Acquire(0)]);
        assert_eq!(dev.count(|e| matches!(e, Event::Submit { .. })), 0);
        assert_eq!(sched.slot(), 0);
        // fence untouched, so the retry does not hang
        assert!(dev.signaled[0]);

        dev.acquire_error = None;
        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Presented);
    }

    #[test]
    fn other_acquire_failures_abandon_the_frame() {
        let mut dev = FakeDevice::new(2, 3);
        dev.acquire_error = Some(vk::Result::ERROR_SURFACE_LOST_KHR);
        let mut sched = FrameScheduler::new(2);
        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Abandoned);
        assert_eq!(dev.count(|e| matches!(e, Event::Record { .. })), 0);
    }

    #[test]
    fn suboptimal_present_requests_recreation_and_advances() {
        let mut dev = FakeDevice::new(2, 3);
        dev.present_result = Ok(true);
        let mut sched = FrameScheduler::new(2);
        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Recreate);
        assert_eq!(sched.slot(), 1);

        dev.present_result = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert_eq!(sched.render_frame(&mut dev).unwrap(), FrameOutcome::Recreate);
    }

    #[test]
    fn device_lost_is_an_error() {
        let mut dev = FakeDevice::new(2, 3);
        dev.wait_error = Some(vk::Result::ERROR_DEVICE_LOST);
        let mut sched = FrameScheduler::new(2);
        let err = sched.render_frame(&mut dev).unwrap_err();
        assert!(err.is_device_lost());
    }
}
