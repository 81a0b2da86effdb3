use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use shadegraph::{catalog::NodeCatalog, compiler, dsl, validation};

#[derive(Debug, Default, Clone)]
struct Cli {
    graph_json: Option<PathBuf>,
    check: bool,
    uniforms_json: bool,
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--graph-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --graph-json"));
                };
                cli.graph_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--check" => {
                cli.check = true;
                i += 1;
            }
            "--uniforms-json" => {
                cli.uniforms_json = true;
                i += 1;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --graph-json <graph.json>, --check, --uniforms-json)"
                ));
            }
        }
    }
    Ok(cli)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;

    let Some(path) = cli.graph_json else {
        bail!("usage: shadegraph --graph-json <graph.json> [--check] [--uniforms-json]");
    };

    let graph = dsl::load_graph_from_path(&path)?;
    let catalog = NodeCatalog::load_default()?;
    let result = compiler::compile(&catalog, &graph);

    for w in &result.metadata.warnings {
        eprintln!("[warn] {w}");
    }
    if result.has_errors() {
        for e in &result.metadata.errors {
            eprintln!("[error] {e}");
        }
        bail!(
            "graph '{}' failed to compile ({} error(s))",
            graph.name,
            result.metadata.errors.len()
        );
    }

    if cli.check {
        validation::validate_fragment_shader_with_context(
            &result.shader_code,
            &format!("graph '{}'", graph.name),
        )?;
        eprintln!("[check] shader is valid GLSL");
    }

    if cli.uniforms_json {
        println!("{}", serde_json::to_string_pretty(&result.uniforms)?);
    } else {
        print!("{}", result.shader_code);
    }
    Ok(())
}
