//! SPIR-V shader loading.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Reinterpret bytes as little-endian SPIR-V words.
///
/// Produces `bytes.len() / 4` words; trailing bytes that do not fill a
/// whole word are dropped.
pub fn spirv_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Read a SPIR-V file into words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(spirv_words(&bytes))
}

/// Owned shader module.
pub struct ShaderModule {
    module: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl ShaderModule {
    /// Create a module from SPIR-V words.
    pub fn from_words(device: &Arc<ash::Device>, words: &[u32]) -> Result<Self> {
        if words.is_empty() {
            return Err(GpuError::ShaderModule("no SPIR-V words".to_string()));
        }

        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        // SAFETY: device is live; the driver validates the code itself.
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|e| GpuError::ShaderModule(e.to_string()))?;

        Ok(Self {
            module,
            device: Arc::clone(device),
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        // SAFETY: modules may be destroyed once pipelines using them are created.
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// Load a shader module from a SPIR-V file.
///
/// A missing or unreadable file yields [`GpuError::ShaderLoad`] naming the path.
pub fn load_shader_module(device: &Arc<ash::Device>, path: &Path) -> Result<ShaderModule> {
    let words = read_spirv(path)?;
    let module = ShaderModule::from_words(device, &words).map_err(|e| match e {
        GpuError::ShaderModule(reason) => {
            GpuError::ShaderModule(format!("{}: {reason}", path.display()))
        }
        other => other,
    })?;
    tracing::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn words_are_little_endian() {
        let bytes = SPIRV_MAGIC.to_le_bytes();
        assert_eq!(spirv_words(&bytes), vec![SPIRV_MAGIC]);
    }

    #[test]
    fn trailing_bytes_are_discarded() {
        for extra in 1..4 {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
            bytes.extend_from_slice(&7u32.to_le_bytes());
            bytes.extend(std::iter::repeat(0xAB).take(extra));

            let words = spirv_words(&bytes);
            assert_eq!(words.len(), bytes.len() / 4);
            assert_eq!(words, vec![SPIRV_MAGIC, 7]);
        }
    }

    #[test]
    fn short_input_yields_no_words() {
        assert!(spirv_words(&[1, 2, 3]).is_empty());
        assert!(spirv_words(&[]).is_empty());
    }

    #[test]
    fn read_truncates_file_contents() {
        let path = std::env::temp_dir().join(format!("spock-shader-{}.spv", std::process::id()));
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2]);
        std::fs::write(&path, &bytes).unwrap();

        let words = read_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(words, vec![SPIRV_MAGIC]);
    }

    #[test]
    fn missing_file_reports_path() {
        let path = Path::new("definitely/not/here/sky.comp.spv");
        let err = read_spirv(path).unwrap_err();

        match &err {
            GpuError::ShaderLoad { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("sky.comp.spv"));
    }
}
