// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are compiled by build.rs and
// read from disk at startup.

use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

use super::VulkanDevice;

/// Read a compiled SPIR-V file into properly aligned words
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("Failed to open shader file {:?}", path))?;

    // read_spv handles alignment and byte order
    ash::util::read_spv(&mut file)
        .with_context(|| format!("Failed to read SPIR-V from {:?}", path))
}

pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_shader_names_the_file() {
        let err = load_spirv("shaders/does_not_exist.spv").unwrap_err();
        assert!(format!("{:#}", err).contains("does_not_exist.spv"));
    }

    #[test]
    fn reads_words_from_spirv_file() {
        let path = std::env::temp_dir().join("mesh_viewer_shader_words.spv");
        let words: [u32; 3] = [0x0723_0203, 0x0001_0000, 42];
        {
            let mut file = File::create(&path).unwrap();
            for word in words {
                file.write_all(&word.to_le_bytes()).unwrap();
            }
        }

        let loaded = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, words);
    }

    #[test]
    fn truncated_spirv_is_rejected() {
        let path = std::env::temp_dir().join("mesh_viewer_shader_truncated.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23, 0x07, 0x00]).unwrap();

        let result = load_spirv(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
