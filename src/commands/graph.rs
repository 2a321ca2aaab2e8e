//! `converge graph` - show evaluation order and apply waves

use anyhow::Result;
use colored::Colorize;
use declarative::ResourceGraph;
use std::process::ExitCode;

use crate::Context;
use crate::cli::{GraphArgs, GraphFormat};
use crate::engine::Session;

pub fn run(ctx: &Context, args: GraphArgs) -> Result<ExitCode> {
    let session = Session::load(ctx.manifest.as_deref(), &args.options.set)?;
    let plan = session.plan()?;
    let graph = plan.graph();

    match args.format {
        GraphFormat::Waves => print_waves(graph),
        GraphFormat::Order => {
            for (position, id) in graph.ordered_ids().into_iter().enumerate() {
                println!("{:>4}  {}", position + 1, id);
            }
        }
        GraphFormat::Dot => print!("{}", render_dot(graph)),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_waves(graph: &ResourceGraph) {
    for (level, wave) in graph.waves().iter().enumerate() {
        println!();
        println!(
            "{} {}",
            format!("Wave {}", level + 1).cyan().bold(),
            format!("({} resources)", wave.len()).dimmed()
        );
        for &node in wave {
            let resource = graph.resource(node);
            let mut notes = Vec::new();
            if resource.refresh_only {
                notes.push("refresh only".to_string());
            }
            for &target in graph.notifies(node) {
                notes.push(format!("notifies {}", graph.resource(target).id));
            }
            if notes.is_empty() {
                println!("  {}", resource.id);
            } else {
                println!("  {} {}", resource.id, format!("({})", notes.join(", ")).dimmed());
            }
        }
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Graphviz rendering: require edges solid, notify edges dashed
fn render_dot(graph: &ResourceGraph) -> String {
    let mut out = String::from("digraph converge {\n  rankdir=LR;\n");
    for &node in graph.order() {
        let resource = graph.resource(node);
        let label = quote(&resource.id.to_string());
        if resource.refresh_only {
            out.push_str(&format!("  {label} [style=dashed];\n"));
        } else {
            out.push_str(&format!("  {label};\n"));
        }
    }
    for &node in graph.order() {
        let to = quote(&graph.resource(node).id.to_string());
        for &before in graph.requires(node) {
            let from = quote(&graph.resource(before).id.to_string());
            out.push_str(&format!("  {from} -> {to};\n"));
        }
    }
    for &node in graph.order() {
        let from = quote(&graph.resource(node).id.to_string());
        for &target in graph.notifies(node) {
            let to = quote(&graph.resource(target).id.to_string());
            out.push_str(&format!("  {from} -> {to} [style=dashed, label=notify];\n"));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Resource, ResourceId};
    use std::collections::HashMap;

    #[test]
    fn test_render_dot() {
        let graph = ResourceGraph::build(
            vec![
                Resource::new("package", "cobbler"),
                Resource::new("service", "cobblerd").require(ResourceId::new("package", "cobbler")),
                Resource::new("file", "/etc/cobbler/settings")
                    .require(ResourceId::new("package", "cobbler"))
                    .notify(ResourceId::new("service", "cobblerd")),
            ],
            &HashMap::new(),
        )
        .unwrap();

        let dot = render_dot(&graph);
        assert!(dot.starts_with("digraph converge {"));
        assert!(dot.contains("\"package[cobbler]\" -> \"service[cobblerd]\";"));
        assert!(dot.contains(
            "\"file[/etc/cobbler/settings]\" -> \"service[cobblerd]\" [style=dashed, label=notify];"
        ));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"file[C:\a "b"]"#), r#""file[C:\\a \"b\"]""#);
    }
}
