use labtree_core::{
    AspectTree, ChildFilter, Lifecycle, NameHandling, Node, NodeId, NodeKind, TreeConfig,
    TreeError,
};

fn project() -> (AspectTree, NodeId) {
    let tree = AspectTree::new(Node::new(NodeKind::Project, "Project"));
    let root = tree.project_root();
    (tree, root)
}

fn add(tree: &mut AspectTree, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
    let id = tree.create_node(kind, name);
    tree.add_child(parent, id).unwrap();
    id
}

/// `(id, name)` pairs of the whole subtree in pre-order, hidden included.
fn snapshot(tree: &AspectTree, root: NodeId) -> Vec<(NodeId, String)> {
    tree.filtered_children(root, ChildFilter::visible().including_hidden().recursive())
        .unwrap()
        .into_iter()
        .map(|id| (id, tree.node(id).unwrap().name().to_string()))
        .collect()
}

#[test]
fn duplicate_sheet_remove_undo_redo_scenario() {
    let (mut tree, root) = project();
    let a = add(&mut tree, root, NodeKind::Spreadsheet, "Sheet");
    let b = add(&mut tree, root, NodeKind::Spreadsheet, "Sheet");
    assert_eq!(tree.node(a).unwrap().name(), "Sheet");
    assert_eq!(tree.node(b).unwrap().name(), "Sheet 1");

    tree.remove_child(root, a).unwrap();
    assert_eq!(tree.children(root).unwrap(), vec![b]);

    assert!(tree.undo().unwrap());
    assert_eq!(tree.children(root).unwrap(), vec![a, b]);
    assert_eq!(tree.node(a).unwrap().name(), "Sheet");

    assert!(tree.redo().unwrap());
    assert_eq!(tree.children(root).unwrap(), vec![b]);
    assert_eq!(tree.store().lifecycle(a).unwrap(), Lifecycle::HeldByCommand);
}

#[test]
fn move_column_macro_is_undone_by_one_undo() {
    let (mut tree, root) = project();
    let first = add(&mut tree, root, NodeKind::Spreadsheet, "Spreadsheet 1");
    let second = add(&mut tree, root, NodeKind::Spreadsheet, "Spreadsheet 2");
    let column = add(&mut tree, first, NodeKind::Column, "x");
    let before = tree.undo_count();

    tree.begin_macro("move column");
    tree.remove_child(first, column).unwrap();
    tree.add_child(second, column).unwrap();
    tree.end_macro().unwrap();

    assert_eq!(tree.undo_count(), before + 1);
    assert_eq!(tree.undo_text(), Some("move column"));
    assert_eq!(tree.parent(column), Some(second));

    assert!(tree.undo().unwrap());
    assert_eq!(tree.parent(column), Some(first));
    assert!(tree.children(second).unwrap().is_empty());
    assert_eq!(tree.redo_text(), Some("move column"));
}

#[test]
fn undo_all_then_redo_all_reproduces_identities_and_order() {
    let (mut tree, root) = project();
    let folder = add(&mut tree, root, NodeKind::Folder, "Folder");
    let sheet = add(&mut tree, folder, NodeKind::Spreadsheet, "Sheet");
    add(&mut tree, sheet, NodeKind::Column, "x");
    add(&mut tree, sheet, NodeKind::Column, "y");
    let note = add(&mut tree, root, NodeKind::Note, "Note");
    tree.reparent(note, folder, Some(0)).unwrap();
    tree.set_name(sheet, "Data", NameHandling::AutoUnique).unwrap();
    tree.set_comment(folder, "raw\ninput").unwrap();
    tree.set_hidden(note, true).unwrap();

    let expected = snapshot(&tree, root);
    let steps = tree.undo_count();
    while tree.undo().unwrap() {}
    assert!(tree.children(root).unwrap().is_empty());
    assert_eq!(tree.undo_count(), 0);

    for _ in 0..steps {
        assert!(tree.redo().unwrap());
    }
    assert!(!tree.can_redo());
    assert_eq!(snapshot(&tree, root), expected);
    assert_eq!(tree.node(folder).unwrap().comment(), "raw\ninput");
    assert!(tree.node(note).unwrap().is_hidden());
}

#[test]
fn recording_after_undo_releases_the_redo_tail() {
    let (mut tree, root) = project();
    let doomed = add(&mut tree, root, NodeKind::Folder, "Doomed");
    tree.remove_child(root, doomed).unwrap();
    assert!(tree.undo().unwrap());
    assert!(tree.undo().unwrap());
    assert_eq!(tree.store().lifecycle(doomed).unwrap(), Lifecycle::HeldByCommand);

    add(&mut tree, root, NodeKind::Folder, "Other");
    assert!(!tree.can_redo());
    assert!(!tree.store().contains(doomed));
}

#[test]
fn undo_limit_drops_oldest_entries() {
    let config = TreeConfig {
        undo_limit: 2,
        ..TreeConfig::default()
    };
    let mut tree = AspectTree::with_config(Node::new(NodeKind::Project, "Project"), config);
    let root = tree.project_root();
    let removed = add(&mut tree, root, NodeKind::Folder, "A");
    tree.remove_child(root, removed).unwrap();
    add(&mut tree, root, NodeKind::Folder, "B");
    add(&mut tree, root, NodeKind::Folder, "C");

    assert_eq!(tree.undo_count(), 2);
    assert!(!tree.store().contains(removed));

    tree.set_undo_limit(1);
    assert_eq!(tree.undo_count(), 1);
    assert_eq!(tree.undo_text(), Some("Project: add C"));
}

#[test]
fn macros_nest_and_refuse_undo_while_open() {
    let (mut tree, root) = project();
    tree.begin_macro("outer");
    add(&mut tree, root, NodeKind::Folder, "A");
    tree.begin_macro("inner");
    add(&mut tree, root, NodeKind::Folder, "B");
    assert!(!tree.can_undo());
    assert!(!tree.undo().unwrap());
    tree.end_macro().unwrap();
    tree.end_macro().unwrap();
    assert_eq!(tree.end_macro().unwrap_err(), TreeError::NoOpenMacro);

    assert_eq!(tree.undo_count(), 1);
    assert!(tree.undo().unwrap());
    assert!(tree.children(root).unwrap().is_empty());

    tree.begin_macro("nothing");
    tree.end_macro().unwrap();
    assert_eq!(tree.undo_count(), 0);
}

#[test]
fn changed_flag_tracks_execution_undo_and_save() {
    let (mut tree, root) = project();
    assert!(!tree.is_changed());
    add(&mut tree, root, NodeKind::Folder, "A");
    assert!(tree.is_changed());

    tree.mark_saved();
    assert!(tree.undo().unwrap());
    assert!(tree.is_changed());

    tree.mark_saved();
    assert!(tree.redo().unwrap());
    assert!(tree.is_changed());
}

#[test]
fn detached_history_applies_immediately_and_destroys_removed_nodes() {
    let (mut tree, root) = project();
    tree.detach_log();
    let folder = add(&mut tree, root, NodeKind::Folder, "Folder");
    let child = add(&mut tree, folder, NodeKind::Note, "Note");
    assert!(tree.is_changed());
    assert!(!tree.can_undo());
    assert!(!tree.undo().unwrap());

    tree.begin_macro("grouped");
    tree.remove_child(root, folder).unwrap();
    tree.end_macro().unwrap();
    assert!(!tree.store().contains(folder));
    assert!(!tree.store().contains(child));

    tree.attach_log();
    add(&mut tree, root, NodeKind::Folder, "Again");
    assert!(tree.can_undo());
}

#[test]
fn clear_undo_releases_only_command_held_nodes() {
    let (mut tree, root) = project();
    let kept = add(&mut tree, root, NodeKind::Folder, "Kept");
    let removed = add(&mut tree, root, NodeKind::Folder, "Removed");
    tree.remove_child(root, removed).unwrap();

    tree.clear_undo();
    assert_eq!(tree.undo_count(), 0);
    assert!(tree.store().contains(kept));
    assert!(!tree.store().contains(removed));
}

#[test]
fn lowering_the_limit_with_a_redo_tail_keeps_redo_working() {
    let (mut tree, root) = project();
    let folder = add(&mut tree, root, NodeKind::Folder, "F");
    let column = add(&mut tree, folder, NodeKind::Column, "c");
    assert!(tree.undo().unwrap());
    assert!(tree.undo().unwrap());

    tree.set_undo_limit(1);
    assert!(tree.store().contains(folder));
    assert_eq!(tree.redo_text(), Some("Project: add F"));

    assert!(tree.redo().unwrap());
    assert!(tree.redo().unwrap());
    assert!(!tree.can_redo());
    assert_eq!(tree.children(root).unwrap(), vec![folder]);
    assert_eq!(tree.parent(column), Some(folder));
    assert_eq!(tree.undo_count(), 1);
    assert_eq!(tree.undo_text(), Some("F: add c"));
}

#[test]
fn discarding_a_loose_subtree_keeps_nodes_the_history_needs() {
    let (mut tree, root) = project();
    let moved = add(&mut tree, root, NodeKind::Folder, "X");
    tree.remove_child(root, moved).unwrap();

    let loose = tree.create_node(NodeKind::Folder, "Loose");
    tree.add_child(loose, moved).unwrap();
    let scratch = add(&mut tree, loose, NodeKind::Note, "Scratch");
    let inner = add(&mut tree, moved, NodeKind::Note, "Inner");

    tree.discard(loose).unwrap();
    assert!(!tree.store().contains(loose));
    assert!(!tree.store().contains(scratch));
    assert_eq!(tree.store().lifecycle(moved).unwrap(), Lifecycle::HeldByCommand);
    assert!(tree.store().contains(inner));

    assert_eq!(tree.undo_count(), 2);
    assert!(tree.undo().unwrap());
    assert_eq!(tree.children(root).unwrap(), vec![moved]);
    assert_eq!(tree.parent(inner), Some(moved));
}

#[test]
fn failed_undo_leaves_tree_and_history_in_place() {
    let (mut tree, root) = project();
    let moved = add(&mut tree, root, NodeKind::Folder, "Moved");
    tree.begin_macro("swap");
    tree.remove_child(root, moved).unwrap();
    let fresh = add(&mut tree, root, NodeKind::Folder, "Fresh");
    tree.end_macro().unwrap();
    let steps = tree.undo_count();

    let loose = tree.create_node(NodeKind::Folder, "Loose");
    tree.add_child(loose, moved).unwrap();

    assert_eq!(
        tree.undo().unwrap_err(),
        TreeError::AlreadyOwned {
            child: moved,
            parent: loose
        }
    );
    assert_eq!(tree.undo_count(), steps);
    assert!(!tree.can_redo());
    assert_eq!(tree.undo_text(), Some("swap"));
    assert_eq!(tree.children(root).unwrap(), vec![fresh]);

    tree.remove_child(loose, moved).unwrap();
    assert!(tree.undo().unwrap());
    assert_eq!(tree.children(root).unwrap(), vec![moved]);
}
