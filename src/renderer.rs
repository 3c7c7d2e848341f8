// Renderer - owns every GPU resource and draws frames
//
// FRAME FLOW:
// 1. Wait for the frame slot's fence
// 2. Acquire a swapchain image (skip the frame if out of date)
// 3. Reset the fence, write this slot's uniform buffer
// 4. Record and submit the draw
// 5. Present and advance to the next slot

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::{
    AcquiredImage, Buffer, CommandPool, Descriptors, FrameCursor, FrameSync, Framebuffers,
    GraphicsPipeline, Image, PipelineDesc, RenderPass, Sampler, Swapchain, TexturePixels,
    UniformBuffer, VulkanDevice, MAX_FRAMES_IN_FLIGHT,
};
use crate::camera::UniformBufferObject;
use crate::config::Config;
use crate::mesh::{Mesh, Vertex};

/// All GPU state for drawing one textured mesh.
///
/// IMPORTANT: Field order matters for Drop! Fields are declared in reverse
/// order of creation so they are destroyed newest first, and the device last.
pub struct Renderer {
    frame_sync: Vec<FrameSync>,
    cursor: FrameCursor,
    command_buffers: Vec<vk::CommandBuffer>,
    uniform_buffers: Vec<UniformBuffer>,
    index_count: u32,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    sampler: Sampler,
    texture: Image,
    framebuffers: Framebuffers,
    depth: Image,
    commands: CommandPool,
    pipeline: GraphicsPipeline,
    descriptors: Descriptors,
    render_pass: RenderPass,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        // ─────────────────────────────────────────────────────────────────────
        // Device and presentation
        // ─────────────────────────────────────────────────────────────────────
        let device = VulkanDevice::new(&config.window.title, config.validation_enabled(), window)?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            size.width,
            size.height,
            config.get_present_mode(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Pipeline
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let mut descriptors = Descriptors::new(device.clone())?;

        let vertex_bindings = [Vertex::binding_description()];
        let vertex_attributes = Vertex::attribute_descriptions();
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &config.assets.vertex_shader,
            &config.assets.fragment_shader,
            &PipelineDesc {
                render_pass: render_pass.render_pass,
                extent: swapchain.extent,
                descriptor_set_layout: descriptors.layout,
                vertex_bindings: &vertex_bindings,
                vertex_attributes: &vertex_attributes,
            },
        )?;

        let commands = CommandPool::new(device.clone())?;

        let depth = Image::depth(device.clone(), swapchain.extent)?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            render_pass.render_pass,
            &swapchain.image_views,
            depth.view,
            swapchain.extent,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Assets
        // ─────────────────────────────────────────────────────────────────────
        let pixels = TexturePixels::load(&config.assets.texture)?;
        let texture = Image::texture(device.clone(), &commands, &pixels)?;
        let sampler = Sampler::new(device.clone())?;

        let mesh = Mesh::load_obj(&config.assets.mesh)?;
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            &commands,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            mesh.vertices.as_slice(),
        )
        .context("Failed to create vertex buffer")?;
        let index_buffer = Buffer::device_local_with_data(
            device.clone(),
            &commands,
            vk::BufferUsageFlags::INDEX_BUFFER,
            mesh.indices.as_slice(),
        )
        .context("Failed to create index buffer")?;

        // ─────────────────────────────────────────────────────────────────────
        // Per-frame state
        // ─────────────────────────────────────────────────────────────────────
        let ubo_size = std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize;
        let uniform_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| UniformBuffer::new(device.clone(), ubo_size))
            .collect::<Result<Vec<_>>>()?;

        let buffer_ranges: Vec<_> = uniform_buffers
            .iter()
            .map(|ubo| (ubo.buffer.buffer, ubo_size))
            .collect();
        descriptors.allocate(&buffer_ranges, texture.view, sampler.sampler)?;

        let command_buffers = commands.allocate(MAX_FRAMES_IN_FLIGHT as u32)?;
        let frame_sync = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Renderer ready: {} frames in flight, {} indices",
            MAX_FRAMES_IN_FLIGHT,
            mesh.indices.len()
        );

        Ok(Self {
            frame_sync,
            cursor: FrameCursor::default(),
            command_buffers,
            uniform_buffers,
            index_count: mesh.indices.len() as u32,
            index_buffer,
            vertex_buffer,
            sampler,
            texture,
            framebuffers,
            depth,
            commands,
            pipeline,
            descriptors,
            render_pass,
            swapchain,
            clear_color: config.graphics.clear_color,
            device,
        })
    }

    /// Width over height of the swapchain images
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.swapchain.extent;
        extent.width as f32 / extent.height as f32
    }

    /// Render a single frame. Returns false when the frame was skipped.
    pub fn draw_frame(&mut self, ubo: &UniformBufferObject) -> Result<bool> {
        let frame = self.cursor.current();
        let sync = &self.frame_sync[frame];

        sync.wait()?;

        let image_index = match self
            .swapchain
            .acquire_next_image(u64::MAX, sync.image_available)?
        {
            AcquiredImage::Ready { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Swapchain is suboptimal");
                }
                index
            }
            AcquiredImage::OutOfDate => {
                // Fence stays signaled so the next wait on this slot returns
                log::debug!("Swapchain out of date, skipping frame");
                return Ok(false);
            }
        };

        // Only reset once work is certain to be submitted
        sync.reset()?;

        self.uniform_buffers[frame].write(ubo);

        let cmd = self.command_buffers[frame];
        self.record(cmd, image_index)?;

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    sync.in_flight_fence,
                )
                .context("Failed to submit draw command buffer")?;
        }

        let stale = self.swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        )?;
        if stale {
            log::debug!("Swapchain no longer matches the surface");
        }

        self.cursor.advance();
        Ok(true)
    }

    fn record(&self, cmd: vk::CommandBuffer, image_index: u32) -> Result<()> {
        let device = &self.device.device;
        let frame = self.cursor.current();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.render_pass)
            .framebuffer(self.framebuffers.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline,
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptors.sets[frame]],
                &[],
            );
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before any field is destroyed
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {:?}", e);
        }
    }
}
