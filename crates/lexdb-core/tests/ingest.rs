use std::fs;

use lexdb_core::data_processor::{ChunkingConfig, DataProcessor};
use serde_json::json;

#[test]
fn directory_of_txt_files_becomes_documents() {
    let tmp = tempfile::tempdir().expect("tmp");
    let root = tmp.path();
    fs::create_dir_all(root.join("tools/fire")).expect("mkdir");
    fs::write(root.join("tools/fire/flint.txt"), "Strike flint on steel.").expect("write");
    fs::write(root.join("notes.txt"), "Loose notes.").expect("write");
    fs::write(root.join("image.png"), [0u8, 1, 2]).expect("write");

    let docs = DataProcessor::new().process_directory(root, "homestead").expect("process");
    assert_eq!(docs.len(), 2);

    let flint = docs.iter().find(|d| d.id == "tools/fire/flint.txt").expect("flint");
    assert_eq!(flint.namespace, "homestead");
    assert_eq!(flint.content, "Strike flint on steel.");
    assert_eq!(flint.meta.get("category"), Some(&json!("/tools/fire")));

    let notes = docs.iter().find(|d| d.id == "notes.txt").expect("notes");
    assert_eq!(notes.meta.get("category"), Some(&json!("/misc")));
}

#[test]
fn chunked_files_get_indexed_ids() {
    let tmp = tempfile::tempdir().expect("tmp");
    fs::write(tmp.path().join("long.txt"), "first paragraph here\n\nsecond paragraph here").expect("write");

    let processor = DataProcessor::with_chunking(ChunkingConfig { max_words: 5, overlap_percent: 0.0 });
    let docs = processor.process_directory(tmp.path(), "document").expect("process");
    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["long.txt:0", "long.txt:1"]);
    assert_eq!(docs[1].meta.get("chunk_index"), Some(&json!(1)));
    assert_eq!(docs[1].meta.get("total_chunks"), Some(&json!(2)));
}
