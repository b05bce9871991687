// CLI command handlers
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use orbgfx_pssl::decoder::InstructionDecoder;
use orbgfx_pssl::module::ShaderModule;

fn load_module(shader: &Path, fetch: Option<&Path>) -> Result<ShaderModule> {
    let data = fs::read(shader)
        .with_context(|| format!("Failed to read shader binary: {}", shader.display()))?;
    let fetch_data = fetch
        .map(|path| {
            fs::read(path)
                .with_context(|| format!("Failed to read fetch shader: {}", path.display()))
        })
        .transpose()?;
    ShaderModule::with_fetch(&data, fetch_data.as_deref())
        .context("Failed to parse shader binary")
}

pub fn info_shader(shader: &Path) -> Result<()> {
    let data = fs::read(shader)
        .with_context(|| format!("Failed to read shader binary: {}", shader.display()))?;
    let module = ShaderModule::new(&data).context("Failed to parse shader binary")?;
    let info = module.program_info();
    let header = info.header();

    println!("Shader binary: {}", shader.display());
    println!("  Header offset: {:#x}", info.header_offset());
    println!("  Version: {}", header.version);
    println!(
        "  Stage: {}",
        info.stage().map(|s| s.name()).unwrap_or("unsupported")
    );
    println!("  Code size: {} bytes ({} dwords)", info.code_size_bytes(), info.code_size_dwords());
    println!("  Key: crc32={:#010x} hash={:#018x}", info.key().crc32, info.key().hash);
    println!(
        "  CRC32 check: {}",
        if info.verify_crc32(&data) { "ok" } else { "MISMATCH" }
    );
    println!("  Fetch shader: {}", if info.has_fetch_shader() { "yes" } else { "no" });

    println!("  Input usage slots: {}", info.input_usage_slot_count());
    for slot in info.input_usage_slots() {
        println!(
            "    {:?} api_slot={} start_register=s{}",
            slot.usage_type, slot.api_slot, slot.start_register
        );
    }
    Ok(())
}

pub fn disasm_shader(shader: &Path) -> Result<()> {
    let module = load_module(shader, None)?;

    for instruction in InstructionDecoder::new(module.code()) {
        let instruction = instruction.context("Failed to decode instruction stream")?;
        let words: Vec<String> =
            instruction.words.iter().map(|w| format!("{w:08x}")).collect();
        println!(
            "{:#06x}: {:<8} op {:<3} [{}]",
            instruction.offset,
            format!("{:?}", instruction.encoding),
            instruction.opcode,
            words.join(" ")
        );
    }
    Ok(())
}

pub fn compile_shader(
    shader: &Path,
    fetch: Option<&Path>,
    output: Option<&Path>,
    manifest: bool,
) -> Result<()> {
    let module = load_module(shader, fetch)?;
    let compiled = module.compile().context("Recompilation failed")?;

    let output: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => shader.with_extension("spv"),
    };
    let bytes: Vec<u8> = compiled.spirv.iter().flat_map(|w| w.to_le_bytes()).collect();
    fs::write(&output, bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Compiled {} shader to {} ({} dwords)",
        compiled.stage.name(),
        output.display(),
        compiled.spirv.len()
    );

    if manifest {
        let manifest_path = output.with_extension("json");
        let doc = serde_json::json!({
            "stage": compiled.stage.name(),
            "crc32": compiled.key.crc32,
            "hash": compiled.key.hash,
            "inputs": compiled.inputs,
        });
        fs::write(&manifest_path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
        println!("Wrote manifest to {}", manifest_path.display());
    }
    Ok(())
}
