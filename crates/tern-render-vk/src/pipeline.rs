// SPDX-License-Identifier: CEPL-1.0
//! Shader loading and the triangle graphics pipeline.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::util::read_spv;
use ash::vk;
use tern_core::AssetPaths;
use tern_render::Vertex;
use tracing::{info, warn};

use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;
use crate::tools;

pub const SHADER_NAME: &str = "triangle";

static EMBEDDED_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
static EMBEDDED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

/// What the pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineTarget {
    RenderPass(vk::RenderPass),
    Dynamic { color: vk::Format, depth: vk::Format },
}

pub struct Pipeline {
    pipeline: DeviceOwned<vk::Pipeline>,
    layout: DeviceOwned<vk::PipelineLayout>,
}

impl Pipeline {
    pub fn new(
        device: &Arc<Device>,
        cache: vk::PipelineCache,
        set_layout: vk::DescriptorSetLayout,
        target: PipelineTarget,
        paths: &AssetPaths,
    ) -> Result<Self, VkError> {
        let vkd = device.raw();

        let layout_ci = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        let layout = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_pipeline_layout(&layout_ci, None) }
                .call("vkCreatePipelineLayout")?,
        );

        // modules only need to outlive pipeline creation
        let vert = shader_module(
            device,
            &load_shader(&paths.shader_binary(SHADER_NAME, "vert"), EMBEDDED_VERT)?,
        )?;
        let frag = shader_module(
            device,
            &load_shader(&paths.shader_binary(SHADER_NAME, "frag"), EMBEDDED_FRAG)?,
        )?;
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: *vert,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: *frag,
                p_name: c"main".as_ptr(),
                ..Default::default()
            },
        ];

        let (binding, attributes) = vertex_layout();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding,
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dynamic_states.len() as u32,
            p_dynamic_states: dynamic_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = rasterization_state();
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let depth_stencil = depth_stencil_state();
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };

        let (render_pass, color_format, depth_format) = match target {
            PipelineTarget::RenderPass(pass) => (pass, vk::Format::UNDEFINED, vk::Format::UNDEFINED),
            PipelineTarget::Dynamic { color, depth } => (vk::RenderPass::null(), color, depth),
        };
        let rendering = vk::PipelineRenderingCreateInfo {
            s_type: vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
            color_attachment_count: 1,
            p_color_attachment_formats: &color_format,
            depth_attachment_format: depth_format,
            stencil_attachment_format: if tools::has_stencil(depth_format) {
                depth_format
            } else {
                vk::Format::UNDEFINED
            },
            ..Default::default()
        };
        let p_next = match target {
            PipelineTarget::RenderPass(_) => std::ptr::null(),
            PipelineTarget::Dynamic { .. } => (&rendering as *const _) as *const std::ffi::c_void,
        };

        let ci = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            p_next,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_depth_stencil_state: &depth_stencil,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout: *layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe { vkd.create_graphics_pipelines(cache, std::slice::from_ref(&ci), None) }
            .map_err(|(_, result)| VkError::Call {
                call: "vkCreateGraphicsPipelines",
                result,
            })?;
        let pipeline = DeviceOwned::new(device.clone(), pipelines[0]);

        info!("graphics pipeline ready ({target:?})");
        Ok(Self { pipeline, layout })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.pipeline.raw()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.raw()
    }
}

/// Reads `<name>.<stage>.spv`. A missing file is only a warning and the
/// copy compiled into the binary is used instead.
pub fn load_shader(path: &Path, embedded: &[u8]) -> Result<Vec<u32>, VkError> {
    match File::open(path) {
        Ok(mut file) => read_spv(&mut file).map_err(|source| VkError::Shader {
            path: path.to_owned(),
            source,
        }),
        Err(err) => {
            warn!("shader {} not loaded ({err}); using the built-in copy", path.display());
            read_spv(&mut Cursor::new(embedded)).map_err(|source| VkError::Shader {
                path: path.to_owned(),
                source,
            })
        }
    }
}

fn shader_module(device: &Arc<Device>, code: &[u32]) -> Result<DeviceOwned<vk::ShaderModule>, VkError> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: std::mem::size_of_val(code),
        p_code: code.as_ptr(),
        ..Default::default()
    };
    let module = unsafe { device.raw().create_shader_module(&ci, None) }
        .call("vkCreateShaderModule")?;
    Ok(DeviceOwned::new(device.clone(), module))
}

/// Binding 0 carries position-only vertices.
pub fn vertex_layout() -> (vk::VertexInputBindingDescription, [vk::VertexInputAttributeDescription; 1]) {
    (
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, position) as u32,
        }],
    )
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    }
}

pub fn depth_stencil_state() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    let keep = vk::StencilOpState {
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };
    vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: vk::TRUE,
        depth_write_enable: vk::TRUE,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        front: keep,
        back: keep,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_position_only() {
        let (binding, attrs) = vertex_layout();
        assert_eq!(binding.stride, 12);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);
    }

    #[test]
    fn depth_test_writes_with_less_or_equal() {
        let ds = depth_stencil_state();
        assert_eq!(ds.depth_test_enable, vk::TRUE);
        assert_eq!(ds.depth_write_enable, vk::TRUE);
        assert_eq!(ds.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(ds.stencil_test_enable, vk::FALSE);
    }

    #[test]
    fn rasterizer_draws_both_faces() {
        let r = rasterization_state();
        assert_eq!(r.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(r.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    }

    #[test]
    fn missing_shader_falls_back_to_embedded() {
        let path = std::env::temp_dir().join("tern-no-such-dir/triangle.vert.spv");
        let code = load_shader(&path, EMBEDDED_VERT).unwrap();
        // SPIR-V magic number
        assert_eq!(code[0], 0x0723_0203);
    }

    #[test]
    fn existing_shader_file_is_preferred_over_embedded() {
        let dir = std::env::temp_dir().join(format!("tern-shader-ok-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("triangle.vert.spv");
        std::fs::write(&path, EMBEDDED_FRAG).unwrap();

        let code = load_shader(&path, EMBEDDED_VERT).unwrap();
        let frag = read_spv(&mut Cursor::new(EMBEDDED_FRAG)).unwrap();
        assert_eq!(code, frag);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn build_places_binaries_next_to_sources() {
        let shaders = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders");
        for (name, embedded) in [("vert", EMBEDDED_VERT), ("frag", EMBEDDED_FRAG)] {
            let path = shaders.join(format!("triangle.{name}.spv"));
            assert!(path.is_file(), "{} missing", path.display());
            assert_eq!(std::fs::read(&path).unwrap(), embedded);
        }
    }

    #[test]
    fn malformed_shader_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("tern-shader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.vert.spv");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(load_shader(&path, EMBEDDED_VERT), Err(VkError::Shader { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
