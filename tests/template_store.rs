use std::path::Path;

use fallwatch::{
    import_local_templates, Characteristic, FeatureImage, FilesystemTemplateStore,
    KNeighborsClassifier, PoseClassifier, PoseLabel, SqliteTemplateStore, TemplateStore,
};

fn write_template(root: &Path, characteristic: &str, pose: &str, name: &str, value: u8) {
    let dir = root.join(characteristic).join(pose);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), FeatureImage::uniform(value).encode_png().unwrap()).unwrap();
}

fn local_tree(root: &Path) {
    write_template(root, "edge", "falling", "f1.png", 200);
    write_template(root, "edge", "upright", "u1.png", 10);
    write_template(root, "foreground", "lying", "l1.png", 120);
    // Same bytes as f1.png under another name.
    write_template(root, "edge", "falling", "f1_copy.png", 200);
    // Unknown pose and characteristic directories are ignored.
    write_template(root, "edge", "crawling", "c1.png", 50);
    write_template(root, "depth", "upright", "d1.png", 60);
    // Unreadable image.
    std::fs::write(root.join("foreground").join("lying").join("broken.png"), b"nope").unwrap();
}

#[test]
fn imports_tree_into_sqlite_and_survives_reopen() {
    let tree = tempfile::tempdir().unwrap();
    local_tree(tree.path());
    let db_dir = tempfile::tempdir().unwrap();
    let db_path = db_dir.path().join("templates.db");

    {
        let mut store = SqliteTemplateStore::open(&db_path).unwrap();
        let report = import_local_templates(&mut store, tree.path()).unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected, 1);

        // A second import finds nothing new.
        let again = import_local_templates(&mut store, tree.path()).unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.duplicates, 4);
    }

    let store = SqliteTemplateStore::open(&db_path).unwrap();
    let records = store.list_templates().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.content_hash.len() == 64));

    let library = store.load_templates().unwrap();
    let edge = KNeighborsClassifier::new(library.training_set(Characteristic::Edge).clone(), 1);
    assert_eq!(edge.classify(Some(&FeatureImage::uniform(200))), PoseLabel::Falling);
    assert_eq!(edge.classify(Some(&FeatureImage::uniform(10))), PoseLabel::Upright);
    assert_eq!(
        library
            .training_set(Characteristic::Foreground)
            .examples(PoseLabel::Lying)
            .len(),
        1
    );
}

#[test]
fn filesystem_store_reads_the_same_layout() {
    let tree = tempfile::tempdir().unwrap();
    local_tree(tree.path());

    let store = FilesystemTemplateStore::open(tree.path()).unwrap();
    let records = store.list_templates().unwrap();
    // f1, f1_copy, u1 (edge) and l1 plus the unreadable file (foreground).
    assert_eq!(records.len(), 5);

    // Unreadable templates are skipped when decoding.
    let library = store.load_templates().unwrap();
    assert_eq!(library.len(), 4);
    assert_eq!(
        library
            .training_set(Characteristic::Edge)
            .examples(PoseLabel::Falling)
            .len(),
        2
    );
}

#[test]
fn import_requires_an_existing_directory() {
    let mut store = SqliteTemplateStore::open_in_memory().unwrap();
    assert!(import_local_templates(&mut store, Path::new("/nonexistent/templates")).is_err());
}
