//! Compiled-shader cache keyed by [`PsslKey`].
//!
//! Two binaries with equal keys are assumed bit-identical and compilation
//! is deterministic, so a hit can be handed out as-is.

use std::collections::HashMap;
use std::sync::Arc;

use crate::binary::PsslKey;
use crate::error::ShaderError;
use crate::module::CompiledShader;

#[derive(Debug, Default)]
pub struct ShaderCache {
    entries: HashMap<PsslKey, Arc<CompiledShader>>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PsslKey) -> Option<Arc<CompiledShader>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, shader: Arc<CompiledShader>) {
        self.entries.insert(shader.key, shader);
    }

    /// Look up `key`, compiling and inserting on a miss.
    pub fn get_or_compile<F>(
        &mut self,
        key: PsslKey,
        compile: F,
    ) -> Result<Arc<CompiledShader>, ShaderError>
    where
        F: FnOnce() -> Result<CompiledShader, ShaderError>,
    {
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        let compiled = Arc::new(compile()?);
        self.entries.insert(key, compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::ShaderStage;

    fn dummy(key: PsslKey) -> CompiledShader {
        CompiledShader { key, stage: ShaderStage::Pixel, spirv: vec![0x0723_0203], inputs: vec![] }
    }

    #[test]
    fn get_or_compile_deduplicates() {
        let key = PsslKey { crc32: 1, hash: 2 };
        let mut cache = ShaderCache::new();
        let mut compiles = 0;
        for _ in 0..3 {
            cache
                .get_or_compile(key, || {
                    compiles += 1;
                    Ok(dummy(key))
                })
                .unwrap();
        }
        assert_eq!(compiles, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_compiles_are_not_cached() {
        let key = PsslKey { crc32: 9, hash: 9 };
        let mut cache = ShaderCache::new();
        let err = cache.get_or_compile(key, || {
            Err(ShaderError::UnsupportedStage("LS"))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
    }
}
