use revezone_core::{
    FileTree, FileType, MirrorStatus, MirrorWriter, NativeFs, NodeId, SkipReason, TreeNode,
    WriteMode,
};
use std::fs;
use std::path::Path;

fn writer(root: &Path) -> MirrorWriter<NativeFs> {
    MirrorWriter::new(NativeFs, Some(root.to_path_buf()))
}

#[test]
fn create_writes_exact_bytes_under_created_parent() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = FileTree::new();
    let work = tree
        .add_node(&NodeId::root(), TreeNode::folder("Work"))
        .unwrap();
    let notes = tree
        .add_node(&work, TreeNode::file("Notes", FileType::Note))
        .unwrap();
    let mirror = writer(dir.path());
    let content = "# Notes\n\nline with ünïcödé\n";

    let status = mirror
        .create_or_update(&tree, &notes, content, WriteMode::Create)
        .unwrap();
    assert_eq!(status, MirrorStatus::Applied);
    assert_eq!(
        fs::read(dir.path().join("Work").join("Notes.md")).unwrap(),
        content.as_bytes()
    );
    assert_eq!(
        mirror.read(&tree, &notes).unwrap().unwrap(),
        content.as_bytes()
    );
}

#[test]
fn create_only_replaces_the_exact_target() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Notes.excalidraw"), "{}").unwrap();
    let mut tree = FileTree::new();
    let notes = tree
        .add_node(&NodeId::root(), TreeNode::file("Notes", FileType::Note))
        .unwrap();

    writer(dir.path())
        .create_or_update(&tree, &notes, "note", WriteMode::Create)
        .unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("Notes.md")).unwrap(), "note");
    assert_eq!(
        fs::read_to_string(dir.path().join("Notes.excalidraw")).unwrap(),
        "{}"
    );
}

#[test]
fn folder_rename_moves_directory_with_contents() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = FileTree::new();
    let work = tree
        .add_node(&NodeId::root(), TreeNode::folder("Work"))
        .unwrap();
    let notes = tree
        .add_node(&work, TreeNode::file("Notes", FileType::Note))
        .unwrap();
    let mirror = writer(dir.path());
    mirror.create_folder(&tree, &work).unwrap();
    mirror
        .create_or_update(&tree, &notes, "body", WriteMode::Create)
        .unwrap();

    let old = mirror.resolve(&tree, &work).unwrap().unwrap();
    tree.rename_node(&work, "Archive").unwrap();
    let status = mirror.rename(&old, "Archive").unwrap();

    assert_eq!(status, MirrorStatus::Applied);
    assert!(!dir.path().join("Work").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("Archive").join("Notes.md")).unwrap(),
        "body"
    );
    assert_eq!(
        mirror.resolve(&tree, &notes).unwrap().unwrap().full_path,
        dir.path().join("Archive").join("Notes.md")
    );
}

#[test]
fn rename_and_relocate_skip_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = FileTree::new();
    let root = NodeId::root();
    let target = tree.add_node(&root, TreeNode::folder("Target")).unwrap();
    let doc = tree
        .add_node(&root, TreeNode::file("Doc", FileType::Board))
        .unwrap();
    let mirror = writer(dir.path());

    let old = mirror.resolve(&tree, &doc).unwrap().unwrap();
    assert_eq!(
        mirror.rename(&old, "Other").unwrap(),
        MirrorStatus::Skipped(SkipReason::SourceMissing)
    );

    tree.move_node(&doc, &target, None).unwrap();
    let new = mirror.resolve(&tree, &doc).unwrap().unwrap();
    assert_eq!(
        mirror.relocate(&old, &new).unwrap(),
        MirrorStatus::Skipped(SkipReason::SourceMissing)
    );
    assert!(!dir.path().join("Target").exists());
}

#[test]
fn relocate_creates_destination_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = FileTree::new();
    let root = NodeId::root();
    let target = tree.add_node(&root, TreeNode::folder("Target")).unwrap();
    let doc = tree
        .add_node(&root, TreeNode::file("Doc", FileType::Note))
        .unwrap();
    let mirror = writer(dir.path());
    mirror
        .create_or_update(&tree, &doc, "moved", WriteMode::Create)
        .unwrap();

    let old = mirror.resolve(&tree, &doc).unwrap().unwrap();
    tree.move_node(&doc, &target, Some(0)).unwrap();
    let new = mirror.resolve(&tree, &doc).unwrap().unwrap();

    assert_eq!(mirror.relocate(&old, &new).unwrap(), MirrorStatus::Applied);
    assert!(!dir.path().join("Doc.md").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("Target").join("Doc.md")).unwrap(),
        "moved"
    );
}

#[test]
fn folder_removal_is_not_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = FileTree::new();
    let work = tree
        .add_node(&NodeId::root(), TreeNode::folder("Work"))
        .unwrap();
    let mirror = writer(dir.path());
    mirror.create_folder(&tree, &work).unwrap();
    fs::write(dir.path().join("Work").join("stray.txt"), "keep me").unwrap();

    let err = mirror.remove(&tree, &work).unwrap_err();
    assert!(err.is_directory_not_empty(), "{err}");
    assert!(dir.path().join("Work").join("stray.txt").exists());

    fs::remove_file(dir.path().join("Work").join("stray.txt")).unwrap();
    assert_eq!(mirror.remove(&tree, &work).unwrap(), MirrorStatus::Applied);
    assert_eq!(
        mirror.remove(&tree, &work).unwrap(),
        MirrorStatus::Skipped(SkipReason::TargetMissing)
    );
}
