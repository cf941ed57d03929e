use labtree_core::serialize::{
    Element, ProjectDocument, ATTR_CREATION_TIME, ATTR_NAME, ATTR_UUID,
};
use labtree_core::{
    AspectTree, ChildFilter, Node, NodeId, NodeKind, SerializeError, TreeConfig,
};

fn add(tree: &mut AspectTree, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
    let id = tree.create_node(kind, name);
    tree.add_child(parent, id).unwrap();
    id
}

fn sample() -> AspectTree {
    let mut tree = AspectTree::new(Node::new(NodeKind::Project, "Project"));
    let root = tree.project_root();
    let folder = add(&mut tree, root, NodeKind::Folder, "Raw");
    let sheet = add(&mut tree, folder, NodeKind::Spreadsheet, "Sheet");
    add(&mut tree, sheet, NodeKind::Column, "t");
    let hidden = add(&mut tree, sheet, NodeKind::Column, "scratch");
    tree.set_hidden(hidden, true).unwrap();
    tree.set_comment(sheet, "line one\nC:\\data\\new").unwrap();
    tree.set_caption_spec(sheet, "%n (%t)").unwrap();
    tree
}

fn describe(tree: &AspectTree) -> Vec<(String, String, String, String, bool)> {
    let root = tree.project_root();
    std::iter::once(root)
        .chain(
            tree.filtered_children(root, ChildFilter::visible().including_hidden().recursive())
                .unwrap(),
        )
        .map(|id| {
            let node = tree.node(id).unwrap();
            (
                tree.store().path(id).unwrap(),
                node.comment().to_string(),
                node.caption_spec().to_string(),
                node.creation_time().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                node.is_hidden(),
            )
        })
        .collect()
}

#[test]
fn save_then_load_restores_tree_without_history() {
    let tree = sample();
    let text = tree.save_to_string().unwrap();

    let loaded = AspectTree::load_from_str(&text, TreeConfig::default()).unwrap();
    assert!(loaded.warnings.is_empty());
    assert_eq!(describe(&loaded.tree), describe(&tree));
    assert!(!loaded.tree.can_undo());
    assert!(!loaded.tree.is_changed());

    let original_uuid = tree
        .node(tree.children(tree.project_root()).unwrap()[0])
        .unwrap()
        .uuid();
    let loaded_root = loaded.tree.project_root();
    let loaded_folder = loaded.tree.children(loaded_root).unwrap()[0];
    assert_eq!(loaded.tree.node(loaded_folder).unwrap().uuid(), original_uuid);
}

#[test]
fn saved_document_uses_kind_tags_and_escaped_comment() {
    let text = sample().save_to_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["format_version"], 1);
    assert_eq!(value["root"]["tag"], "project");
    let sheet = &value["root"]["children"][0]["children"][0];
    assert_eq!(sheet["tag"], "spreadsheet");
    assert_eq!(sheet["attributes"]["caption_spec"], "%n (%t)");
    assert_eq!(sheet["children"][0]["tag"], "comment");
    assert_eq!(
        sheet["children"][0]["text"],
        "line one\\nC:\\\\data\\\\new"
    );
    assert_eq!(sheet["children"][2]["attributes"]["hidden"], "1");

    let created = sheet["attributes"]["creation_time"].as_str().unwrap();
    let parts: Vec<&str> = created.split([' ', ':']).collect();
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[4].len(), 3);
}

#[test]
fn recoverable_problems_become_warnings() {
    let mut root = Element::new("project").with_attribute(ATTR_NAME, "Project");
    root.attributes.insert(
        ATTR_CREATION_TIME.to_string(),
        "2023-15-06 08:30:00:000".to_string(),
    );
    root.children.push(Element::new("folder"));
    root.children.push(Element::new("legacyWidget"));
    let text = ProjectDocument::new(root).to_json().unwrap();

    let loaded = AspectTree::load_from_str(&text, TreeConfig::default()).unwrap();
    assert_eq!(
        loaded.warnings,
        vec![
            "Attribute 'name' is missing or empty.".to_string(),
            "Invalid creation time for ''. Using current time.".to_string(),
            "Unknown element 'legacyWidget' skipped.".to_string(),
        ]
    );
    let tree = loaded.tree;
    let children = tree.children(tree.project_root()).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(tree.node(children[0]).unwrap().name(), "1");
    assert_eq!(
        tree.node(tree.project_root())
            .unwrap()
            .creation_time()
            .format("%Y-%m-%d")
            .to_string(),
        "2023-06-15"
    );
}

#[test]
fn unrecoverable_documents_fail() {
    assert!(matches!(
        AspectTree::load_from_str("not json", TreeConfig::default()),
        Err(SerializeError::Json(_))
    ));
    let text = ProjectDocument::new(Element::new("plotArea")).to_json().unwrap();
    assert!(matches!(
        AspectTree::load_from_str(&text, TreeConfig::default()),
        Err(SerializeError::UnknownRootElement(tag)) if tag == "plotArea"
    ));
}

#[test]
fn import_is_one_undoable_insertion() {
    let source = sample();
    let raw = source.children(source.project_root()).unwrap()[0];
    let element = source.export_subtree(raw).unwrap();

    let mut target = sample();
    let root = target.project_root();
    let before = target.undo_count();
    let imported = target.import_element(root, &element).unwrap();

    assert!(imported.warnings.is_empty());
    assert_eq!(target.node(imported.node).unwrap().name(), "Raw 1");
    assert_eq!(target.store().path(imported.node).unwrap(), "Project/Raw 1");
    assert_eq!(
        target
            .filtered_children(imported.node, ChildFilter::visible().including_hidden().recursive())
            .unwrap()
            .len(),
        3
    );
    assert_eq!(target.undo_count(), before + 1);
    assert_ne!(
        target.node(imported.node).unwrap().uuid(),
        source.node(raw).unwrap().uuid()
    );

    assert!(target.undo().unwrap());
    assert_eq!(target.children(root).unwrap().len(), 1);
}

#[test]
fn save_to_file_clears_changed_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");
    let mut tree = sample();
    assert!(tree.is_changed());

    tree.save(&path).unwrap();
    assert!(!tree.is_changed());

    let loaded = AspectTree::load(&path, TreeConfig::default()).unwrap();
    assert_eq!(describe(&loaded.tree), describe(&tree));

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        AspectTree::load(&missing, TreeConfig::default()),
        Err(SerializeError::Io { .. })
    ));
}

#[test]
fn duplicate_names_and_uuids_are_reported() {
    let uuid = "67e55044-10b1-426f-9247-bb680e5fe0c8";
    let created = "2024-09-03 10:00:00:000";
    let folder = || {
        Element::new("folder")
            .with_attribute(ATTR_NAME, "Dup")
            .with_attribute(ATTR_CREATION_TIME, created)
            .with_attribute(ATTR_UUID, uuid)
    };
    let mut root = Element::new("project")
        .with_attribute(ATTR_NAME, "Project")
        .with_attribute(ATTR_CREATION_TIME, created);
    root.children.push(folder());
    root.children.push(folder());
    let text = ProjectDocument::new(root).to_json().unwrap();

    let loaded = AspectTree::load_from_str(&text, TreeConfig::default()).unwrap();
    assert_eq!(
        loaded.warnings,
        vec![
            "Duplicate uuid for 'Dup'. Assigning a new one.".to_string(),
            "Duplicate name 'Dup' among the children of 'Project'.".to_string(),
        ]
    );
    let tree = loaded.tree;
    let children = tree.children(tree.project_root()).unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(tree.node(children[0]).unwrap().uuid().to_string(), uuid);
    assert_ne!(
        tree.node(children[0]).unwrap().uuid(),
        tree.node(children[1]).unwrap().uuid()
    );
}
