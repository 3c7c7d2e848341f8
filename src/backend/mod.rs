// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every wrapper holds an Arc<VulkanDevice>
// so the device outlives the objects created from it.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{Buffer, UniformBuffer};
pub use commands::CommandPool;
pub use descriptor::Descriptors;
pub use device::VulkanDevice;
pub use image::{Image, Sampler, TexturePixels};
pub use pipeline::{Framebuffers, GraphicsPipeline, PipelineDesc, RenderPass};
pub use swapchain::{AcquiredImage, Swapchain};
pub use sync::{FrameCursor, FrameSync, MAX_FRAMES_IN_FLIGHT};
