//! GLSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Parse and validate a GLSL ES fragment shader with naga's GLSL frontend.
///
/// Returns the parsed naga Module on success, or an error carrying the
/// line-numbered source for debugging generated shaders.
pub fn validate_fragment_shader(source: &str) -> Result<naga::Module> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: naga::ShaderStage::Fragment,
        defines: Default::default(),
    };

    let module = frontend
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}\n{}", numbered_source(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered_source(source)))?;

    Ok(module)
}

/// Validate and name which graph/component generated the shader on failure.
pub fn validate_fragment_shader_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_fragment_shader(source).with_context(|| format!("{context} generated invalid GLSL"))
}

fn numbered_source(source: &str) -> String {
    let mut out = String::from("Generated GLSL:\n---\n");
    for (line_num, line) in source.lines().enumerate() {
        out.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    out.push_str("---\n");
    out
}
