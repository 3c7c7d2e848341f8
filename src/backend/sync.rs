// Synchronization primitives
//
// Fences and semaphores for CPU-GPU and GPU-GPU sync, one set per frame in
// flight.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait on each frame returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device,
        };

        unsafe {
            let d = &sync.device.device;
            sync.image_available = d
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create image-available semaphore")?;
            sync.render_finished = d
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create render-finished semaphore")?;
            sync.in_flight_fence = d
                .create_fence(&fence_info, None)
                .context("Failed to create in-flight fence")?;
        }

        Ok(sync)
    }

    /// Block until the GPU has finished the last submission using this frame
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
                .context("Failed to wait for in-flight fence")
        }
    }

    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .reset_fences(&[self.in_flight_fence])
                .context("Failed to reset in-flight fence")
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        // Destroying null handles is a no-op
        unsafe {
            let d = &self.device.device;
            d.destroy_semaphore(self.image_available, None);
            d.destroy_semaphore(self.render_finished, None);
            d.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Round-robin index over the frames in flight
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    current: usize,
}

impl FrameCursor {
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_starts_at_first_frame() {
        assert_eq!(FrameCursor::default().current(), 0);
    }

    #[test]
    fn cursor_wraps_after_last_frame() {
        let mut cursor = FrameCursor::default();
        let mut seen = Vec::new();
        for _ in 0..(MAX_FRAMES_IN_FLIGHT * 2 + 1) {
            seen.push(cursor.current());
            cursor.advance();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
        assert!(seen.iter().all(|&i| i < MAX_FRAMES_IN_FLIGHT));
    }
}
