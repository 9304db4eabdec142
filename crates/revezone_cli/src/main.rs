//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `revezone_core` linkage.
//! - List a workspace database depth-first with resolved mirror paths.
//! - Start file logging when `REVEZONE_LOG_DIR` is set.
//!
//! Usage: `revezone_cli [<db_path> [storage_root]]`

use revezone_core::{
    init_logging_from_config, open_db, CoreConfig, FileTree, MirrorWriter, NativeFs,
    SqliteTreeRepository, TreeStore,
};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("revezone_core ping={}", revezone_core::ping());
    println!("revezone_core version={}", revezone_core::core_version());

    let mut args = std::env::args_os().skip(1);
    let Some(db_path) = args.next().map(PathBuf::from) else {
        return ExitCode::SUCCESS;
    };
    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("warning: ignoring environment config: {err}");
            CoreConfig::default()
        }
    };
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }
    let storage_root = args.next().map(PathBuf::from).or(config.storage_root);

    match list_tree(db_path, storage_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn list_tree(db_path: PathBuf, storage_root: Option<PathBuf>) -> Result<(), String> {
    let conn = open_db(&db_path).map_err(|err| format!("open {}: {err}", db_path.display()))?;
    let repo = SqliteTreeRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let store = TreeStore::load(repo).map_err(|err| err.to_string())?;
    let mirror = MirrorWriter::new(NativeFs, storage_root);

    println!("nodes={}", store.tree().len());
    for line in render_tree(store.tree(), &mirror) {
        println!("{line}");
    }
    Ok(())
}

fn render_tree(tree: &FileTree, mirror: &MirrorWriter<NativeFs>) -> Vec<String> {
    tree.depth_first()
        .into_iter()
        .map(|(depth, node)| {
            let path = match mirror.resolve(tree, &node.id) {
                Ok(Some(resolved)) => resolved.full_path.display().to_string(),
                Ok(None) => "-".to_string(),
                Err(err) => format!("<{err}>"),
            };
            format!(
                "{}{} [{}] {} {}",
                "  ".repeat(depth),
                node.name,
                node.kind_label(),
                node.id,
                path
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::render_tree;
    use revezone_core::{FileTree, FileType, MirrorWriter, NativeFs, NodeId, TreeNode};
    use std::path::PathBuf;

    #[test]
    fn render_indents_children_and_shows_mirror_path() {
        let mut tree = FileTree::new();
        let work = tree
            .add_node(&NodeId::root(), TreeNode::folder("Work"))
            .unwrap();
        tree.add_node(&work, TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let root = PathBuf::from("/mirror");
        let mirror = MirrorWriter::new(NativeFs, Some(root.clone()));

        let lines = render_tree(&tree, &mirror);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Work [folder]"));
        assert!(lines[1].starts_with("  Notes [note]"));
        assert!(lines[1].ends_with(&root.join("Work").join("Notes.md").display().to_string()));
    }
}
