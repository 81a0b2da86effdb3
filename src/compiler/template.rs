//! GLSL ES 3.00 fragment-shader skeleton assembly.

pub struct ShaderSections {
    pub uniform_block: String,
    pub function_block: String,
    pub declaration_block: String,
    pub body_block: String,
    /// vec3 expression assigned into `fragColor` with full alpha.
    pub final_color: String,
}

pub fn assemble_fragment_shader(sections: &ShaderSections) -> String {
    let mut out = String::new();
    out.push_str("#version 300 es\n");
    out.push_str("precision highp float;\n");
    out.push_str("precision highp int;\n\n");

    if !sections.uniform_block.is_empty() {
        out.push_str(&sections.uniform_block);
        out.push('\n');
    }

    out.push_str("layout(location = 0) out vec4 fragColor;\n\n");

    if !sections.function_block.trim().is_empty() {
        out.push_str(sections.function_block.trim_end());
        out.push_str("\n\n");
    }

    out.push_str("void main() {\n");
    out.push_str(&sections.declaration_block);
    out.push_str(&sections.body_block);
    out.push_str(&format!(
        "    fragColor = vec4({}, 1.0);\n}}\n",
        sections.final_color
    ));
    out
}
