use crate::decoder::Decoder;
use crate::error::{CodecError, CodecResult};
use serde_json::{Map, Value};
use std::path::Path;
use wasmtime::{Engine, Instance, Module, Store};

/// Entry-point module every codec directory must provide
pub const CODEC_MODULE_FILE: &str = "codec.wasm";

/// A codec loaded from a `codec.wasm` module.
///
/// Contract with the module:
/// - exports `memory`, `alloc(len: u32) -> u32` and
///   `decode(ptr: u32, len: u32) -> u64`
/// - `decode` returns the output pointer in the high 32 bits and its
///   length in the low 32 bits; the output is a UTF-8 JSON object
/// - no imports; modules run with no ambient capabilities
///
/// Compilation happens once at load; each call gets a fresh store so
/// instances never share state between uplinks.
pub struct WasmDecoder {
    engine: Engine,
    module: Module,
}

impl WasmDecoder {
    /// Load the entry-point module from a codec directory
    pub fn from_dir(dir: &Path) -> CodecResult<Self> {
        let path = dir.join(CODEC_MODULE_FILE);
        if !path.is_file() {
            return Err(CodecError::LoadFailed(format!(
                "no {CODEC_MODULE_FILE} in {}",
                dir.display()
            )));
        }

        let engine = Engine::default();
        let module = Module::from_file(&engine, &path)
            .map_err(|e| CodecError::LoadFailed(format!("{e:#}")))?;

        Ok(Self { engine, module })
    }
}

impl Decoder for WasmDecoder {
    fn decode(&self, payload: &[u8]) -> CodecResult<Map<String, Value>> {
        let mut store = Store::new(&self.engine, ());
        let instance = Instance::new(&mut store, &self.module, &[])
            .map_err(|e| CodecError::LoadFailed(format!("{e:#}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| CodecError::LoadFailed("module exports no memory".to_string()))?;
        let alloc = instance
            .get_typed_func::<u32, u32>(&mut store, "alloc")
            .map_err(|e| CodecError::LoadFailed(format!("{e:#}")))?;
        let decode = instance
            .get_typed_func::<(u32, u32), u64>(&mut store, "decode")
            .map_err(|e| CodecError::LoadFailed(format!("{e:#}")))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::DecodeFailed("payload too large".to_string()))?;
        let ptr = alloc
            .call(&mut store, len)
            .map_err(|e| CodecError::DecodeFailed(format!("{e:#}")))?;
        memory
            .write(&mut store, ptr as usize, payload)
            .map_err(|e| CodecError::DecodeFailed(format!("{e:#}")))?;

        let packed = decode
            .call(&mut store, (ptr, len))
            .map_err(|e| CodecError::DecodeFailed(format!("{e:#}")))?;
        let out_ptr = (packed >> 32) as usize;
        let out_len = (packed & 0xFFFF_FFFF) as usize;
        if out_len == 0 {
            return Err(CodecError::DecodeFailed(
                "codec returned no output".to_string(),
            ));
        }

        let mut buffer = vec![0u8; out_len];
        memory
            .read(&store, out_ptr, &mut buffer)
            .map_err(|e| CodecError::DecodeFailed(format!("{e:#}")))?;

        match serde_json::from_slice(&buffer) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(CodecError::NonObjectOutput),
            Err(e) => Err(CodecError::DecodeFailed(format!(
                "codec output is not valid JSON: {e}"
            ))),
        }
    }
}
