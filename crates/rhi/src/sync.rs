//! Frame synchronization primitives.
//!
//! # Overview
//!
//! The engine renders with a fixed set of [`MAX_FRAMES_IN_FLIGHT`]
//! frame slots. Each slot carries an image-available semaphore, a
//! render-finished semaphore, and an in-flight fence created
//! pre-signaled so the very first tick does not deadlock. Slot
//! primitives live for the whole run; swapchain rebuilds never touch
//! them.
//!
//! Because the number of swapchain images need not equal the number of
//! frame slots, the [`ImageFenceTable`] records which slot most
//! recently rendered into each image. Before a slot reuses an image it
//! waits on that earlier slot's fence, even when it is not its own.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;

/// Number of frames that can be processed concurrently.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// RAII wrapper for a Vulkan semaphore.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// RAII wrapper for a Vulkan fence.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `signaled` - If true, the fence starts signaled. In-flight
    ///   fences start signaled so the first wait on each slot returns
    ///   immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self, RhiError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Returns the fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout_ns` - Timeout in nanoseconds (`u64::MAX` for no timeout)
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails or times out.
    pub fn wait(&self, timeout_ns: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns)?;
        }
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device.handle().reset_fences(&fences)?;
        }
        Ok(())
    }

    /// Returns whether the fence is currently signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if the status query fails.
    pub fn is_signaled(&self) -> Result<bool, RhiError> {
        let status = unsafe { self.device.handle().get_fence_status(self.fence)? };
        Ok(status)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Records which frame slot most recently rendered into each swapchain
/// image.
///
/// Pure bookkeeping over indices; holds no Vulkan handles. An entry of
/// `None` means no slot has touched that image yet, so no wait is
/// required before reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFenceTable {
    bindings: Vec<Option<usize>>,
}

impl ImageFenceTable {
    /// Creates a table for `image_count` swapchain images with every
    /// entry unbound.
    pub fn new(image_count: usize) -> Self {
        Self {
            bindings: vec![None; image_count],
        }
    }

    /// Records that `slot` is rendering into `image_index`.
    pub fn bind(&mut self, image_index: usize, slot: usize) {
        self.bindings[image_index] = Some(slot);
    }

    /// Hands `image_index` to `slot`, first invoking `wait_on` with the
    /// prior owning slot if a different slot's submission may still be
    /// rendering into the image.
    ///
    /// The wait is a closure so the deferral decision stays independent
    /// of real fences. `wait_on` must not return until the prior slot's
    /// submission has retired.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `wait_on`.
    pub fn claim<E>(
        &mut self,
        image_index: usize,
        slot: usize,
        mut wait_on: impl FnMut(usize) -> Result<(), E>,
    ) -> Result<(), E> {
        if let Some(prior_slot) = self.bound_slot(image_index) {
            if prior_slot != slot {
                wait_on(prior_slot)?;
            }
        }
        self.bind(image_index, slot);
        Ok(())
    }

    /// Returns the slot bound to `image_index`, if any.
    #[inline]
    pub fn bound_slot(&self, image_index: usize) -> Option<usize> {
        self.bindings.get(image_index).copied().flatten()
    }

    /// Resizes the table to a new image count, clearing all bindings.
    ///
    /// Called after a swapchain rebuild: the old images no longer
    /// exist, so stale bindings must not trigger waits for the new
    /// ones.
    pub fn resize(&mut self, image_count: usize) {
        self.bindings.clear();
        self.bindings.resize(image_count, None);
    }

    /// Returns the number of tracked images.
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if the table tracks no images.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Synchronization primitives for all frame slots, plus the per-image
/// fence binding table.
///
/// Created once at startup and destroyed with the renderer. A
/// swapchain rebuild only calls [`FrameSyncSet::reset_image_bindings`];
/// the semaphores and fences are never recreated.
pub struct FrameSyncSet {
    /// Per-slot semaphore signaled when an image is available.
    image_available: Vec<Semaphore>,
    /// Per-slot semaphore signaled when rendering is finished.
    render_finished: Vec<Semaphore>,
    /// Per-slot fence signaled when the slot's submission retires.
    in_flight: Vec<Fence>,
    /// Which slot last rendered into each swapchain image.
    image_table: ImageFenceTable,
}

impl FrameSyncSet {
    /// Creates synchronization primitives for [`MAX_FRAMES_IN_FLIGHT`]
    /// slots and a binding table for `image_count` swapchain images.
    ///
    /// All in-flight fences start signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive creation fails.
    pub fn new(device: Arc<Device>, image_count: usize) -> Result<Self, RhiError> {
        let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut render_finished = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut in_flight = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            image_available.push(Semaphore::new(device.clone())?);
            render_finished.push(Semaphore::new(device.clone())?);
            in_flight.push(Fence::new(device.clone(), true)?);
        }

        info!(
            "Frame synchronization created for {} slot(s), {} swapchain image(s)",
            MAX_FRAMES_IN_FLIGHT, image_count
        );

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            image_table: ImageFenceTable::new(image_count),
        })
    }

    /// Returns the image-available semaphore for a frame slot.
    #[inline]
    pub fn image_available(&self, slot: usize) -> &Semaphore {
        &self.image_available[slot]
    }

    /// Returns the render-finished semaphore for a frame slot.
    #[inline]
    pub fn render_finished(&self, slot: usize) -> &Semaphore {
        &self.render_finished[slot]
    }

    /// Returns the in-flight fence for a frame slot.
    #[inline]
    pub fn in_flight(&self, slot: usize) -> &Fence {
        &self.in_flight[slot]
    }

    /// Waits for any earlier slot still rendering into `image_index`,
    /// then binds the image to `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence wait fails.
    pub fn claim_image(&mut self, image_index: usize, slot: usize) -> Result<(), RhiError> {
        let in_flight = &self.in_flight;
        self.image_table.claim(image_index, slot, |prior_slot| {
            debug!(
                "Image {} still owned by slot {}, waiting before handing to slot {}",
                image_index, prior_slot, slot
            );
            in_flight[prior_slot].wait(u64::MAX)
        })
    }

    /// Clears and resizes the image binding table after a swapchain
    /// rebuild.
    pub fn reset_image_bindings(&mut self, image_count: usize) {
        self.image_table.resize(image_count);
    }

    /// Returns the image binding table.
    #[inline]
    pub fn image_table(&self) -> &ImageFenceTable {
        &self.image_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_starts_unbound() {
        let table = ImageFenceTable::new(3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.bound_slot(0), None);
        assert_eq!(table.bound_slot(2), None);
    }

    #[test]
    fn table_records_and_replaces_bindings() {
        let mut table = ImageFenceTable::new(3);
        table.bind(1, 0);
        assert_eq!(table.bound_slot(1), Some(0));
        assert_eq!(table.bound_slot(0), None);

        table.bind(1, 1);
        assert_eq!(table.bound_slot(1), Some(1));
    }

    #[test]
    fn table_resize_clears_stale_bindings() {
        let mut table = ImageFenceTable::new(2);
        table.bind(0, 0);
        table.bind(1, 1);

        table.resize(4);
        assert_eq!(table.len(), 4);
        for image in 0..4 {
            assert_eq!(table.bound_slot(image), None);
        }
    }

    #[test]
    fn table_lookup_out_of_range_is_none() {
        let table = ImageFenceTable::new(2);
        assert_eq!(table.bound_slot(5), None);
    }

    /// Fake fence that stays unsignaled until explicitly triggered.
    struct TriggerFence {
        signaled: bool,
        waits: usize,
    }

    impl TriggerFence {
        fn new() -> Self {
            Self {
                signaled: false,
                waits: 0,
            }
        }

        fn trigger(&mut self) {
            self.signaled = true;
        }

        fn wait(&mut self) -> Result<(), &'static str> {
            self.waits += 1;
            if self.signaled {
                Ok(())
            } else {
                Err("waited on an unsignaled fence with no trigger pending")
            }
        }
    }

    #[test]
    fn cross_slot_reuse_requires_waiting_on_prior_owner() {
        // Two slots alternating over a single image: before slot 1 may
        // use the image, the claim must wait on slot 0's fence, and
        // vice versa on the next round.
        let mut table = ImageFenceTable::new(1);
        let mut waited_on: Vec<usize> = Vec::new();

        for tick in 0..4usize {
            let slot = tick % MAX_FRAMES_IN_FLIGHT;
            table
                .claim(0, slot, |prior| {
                    waited_on.push(prior);
                    Ok::<(), ()>(())
                })
                .unwrap();
        }

        assert_eq!(waited_on, vec![0, 1, 0]);
    }

    #[test]
    fn claim_defers_until_prior_fence_triggers() {
        // Slot 0 submits into image 0 and its fence stays unsignaled.
        let mut table = ImageFenceTable::new(2);
        let mut fence = TriggerFence::new();
        table.claim(0, 0, |_| fence.wait()).unwrap();
        assert_eq!(fence.waits, 0);

        // Slot 1 acquiring the same image must not proceed while the
        // fence is unsignaled.
        let blocked = table.claim(0, 1, |prior| {
            assert_eq!(prior, 0);
            fence.wait()
        });
        assert!(blocked.is_err());
        assert_eq!(fence.waits, 1);
        // A failed wait must not rebind the image
        assert_eq!(table.bound_slot(0), Some(0));

        // Once the fence triggers, the same claim goes through and the
        // image changes hands.
        fence.trigger();
        table.claim(0, 1, |_| fence.wait()).unwrap();
        assert_eq!(fence.waits, 2);
        assert_eq!(table.bound_slot(0), Some(1));
    }

    #[test]
    fn same_slot_reacquire_needs_no_cross_wait() {
        let mut table = ImageFenceTable::new(2);
        table.bind(0, 0);

        // Slot 0 acquiring image 0 again waits only on its own fence,
        // which the per-slot wait at the top of the tick already covers.
        let mut waited = false;
        table
            .claim(0, 0, |_| {
                waited = true;
                Ok::<(), ()>(())
            })
            .unwrap();
        assert!(!waited);
        assert_eq!(table.bound_slot(0), Some(0));
    }

    #[test]
    fn slot_fence_cycle_bounds_outstanding_submissions() {
        // Replay the tick sequence against fake slot fences: wait on
        // the slot fence (retiring its submission), claim the image
        // (retiring the prior owner's), then reset and submit. The
        // number of unretired submissions must never exceed the slot
        // count.
        let image_count = 3;
        let mut table = ImageFenceTable::new(image_count);
        let mut submission_pending = [false; MAX_FRAMES_IN_FLIGHT];
        let mut peak_outstanding = 0usize;

        for tick in 0..12usize {
            let slot = tick % MAX_FRAMES_IN_FLIGHT;

            // Step 1: the slot fence wait retires this slot's prior
            // submission
            submission_pending[slot] = false;

            // Step 3: the cross-image wait retires the prior owner's
            table
                .claim(tick % image_count, slot, |prior| {
                    submission_pending[prior] = false;
                    Ok::<(), ()>(())
                })
                .unwrap();

            // Steps 5-6: reset the fence and submit
            submission_pending[slot] = true;

            let outstanding = submission_pending.iter().filter(|p| **p).count();
            peak_outstanding = peak_outstanding.max(outstanding);
        }

        assert_eq!(peak_outstanding, MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn two_slots_bound_at_most() {
        // With MAX_FRAMES_IN_FLIGHT slots cycling over many images, the
        // set of distinct slots in the table never exceeds the slot
        // count.
        let mut table = ImageFenceTable::new(4);
        for tick in 0..16usize {
            let slot = tick % MAX_FRAMES_IN_FLIGHT;
            let image = tick % 4;
            table.bind(image, slot);

            let mut slots: Vec<usize> = (0..4).filter_map(|i| table.bound_slot(i)).collect();
            slots.sort_unstable();
            slots.dedup();
            assert!(slots.len() <= MAX_FRAMES_IN_FLIGHT);
        }
    }
}
