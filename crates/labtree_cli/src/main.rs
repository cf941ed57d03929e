//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `labtree_core` linkage.
//! - Walk a small tree through insert, rename, undo and save so the whole
//!   stack can be exercised without a front end.
//! - Keep output deterministic for quick local sanity checks.

use labtree_core::{AspectTree, Node, NodeKind, TreeProjection};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

/// Overrides where `demo` writes its log files.
const LOG_DIR_ENV: &str = "LABTREE_LOG_DIR";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("ping") => {
            println!("labtree_core ping={}", labtree_core::ping());
            println!("labtree_core version={}", labtree_core::core_version());
            ExitCode::SUCCESS
        }
        Some("demo") => {
            if let Err(err) =
                labtree_core::init_logging(labtree_core::default_log_level(), demo_log_dir())
            {
                eprintln!("logging disabled: {err}");
            }
            demo(args.get(1).map(String::as_str))
        }
        Some(other) => {
            eprintln!("unknown command `{other}`; expected ping | demo [output.json]");
            ExitCode::FAILURE
        }
    }
}

fn demo(output: Option<&str>) -> ExitCode {
    match run_demo(output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_demo module=cli status=error error={}", err);
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Log directory for `demo`: `$LABTREE_LOG_DIR`, else a folder under the
/// system temp directory.
fn demo_log_dir() -> PathBuf {
    std::env::var_os(LOG_DIR_ENV)
        .map(PathBuf::from)
        .filter(|path| path.is_absolute())
        .unwrap_or_else(|| std::env::temp_dir().join("labtree").join("logs"))
}

fn run_demo(output: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut tree = AspectTree::new(Node::new(NodeKind::Project, "Project"));
    let project = tree.project_root();
    let projection = TreeProjection::attach(&mut tree, project)?;

    let first = tree.create_node(NodeKind::Spreadsheet, "Sheet");
    tree.add_child(project, first)?;
    let second = tree.create_node(NodeKind::Spreadsheet, "Sheet");
    tree.add_child(project, second)?;
    for child in tree.children(project)? {
        println!("child {}", tree.store().path(child)?);
    }

    let top = projection.index(tree.store(), 0, 0, None);
    tree.remove_child(project, first)?;
    println!(
        "after remove: rows={}",
        projection.row_count(tree.store(), top.as_ref())
    );
    tree.undo()?;
    println!(
        "after undo: rows={} redo={:?}",
        projection.row_count(tree.store(), top.as_ref()),
        tree.redo_text()
    );
    for event in projection.drain_events() {
        println!("projection {event:?}");
    }

    match output {
        Some(path) => {
            tree.save(path)?;
            println!("saved {path}");
        }
        None => println!("{}", tree.save_to_string()?),
    }
    Ok(())
}
