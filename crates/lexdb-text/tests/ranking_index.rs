use lexdb_core::error::{Error, Result};
use lexdb_core::traits::RankingIndex;
use lexdb_core::types::{IndexEntry, IndexOp, KeywordQuery};
use lexdb_text::TantivyRankingIndex;

const MEM: usize = 20_000_000;

fn entry(row: u64, id: &str, content: &str) -> IndexEntry {
    IndexEntry { row, id: id.to_string(), namespace: "document".to_string(), content: content.to_string() }
}

fn query(text: &str, all: bool) -> KeywordQuery {
    KeywordQuery { text: text.to_string(), namespace: "document".to_string(), all_terms_must_match: all }
}

fn ids(index: &TantivyRankingIndex, q: &KeywordQuery) -> Vec<String> {
    let mut ids: Vec<String> = index.search(q).expect("search").into_iter().map(|m| m.id).collect();
    ids.sort();
    ids
}

fn seeded() -> TantivyRankingIndex {
    let index = TantivyRankingIndex::in_memory(MEM).expect("index");
    index
        .apply(
            &[
                IndexOp::Insert(entry(1, "d1", "the cat sat")),
                IndexOp::Insert(entry(2, "d2", "the dog sat")),
                IndexOp::Insert(entry(3, "d3", "the cat ran")),
            ],
            1,
        )
        .expect("apply");
    index
}

#[test]
fn or_is_default_and_and_is_opt_in() {
    let index = seeded();
    assert_eq!(ids(&index, &query("cat sat", false)), vec!["d1", "d2", "d3"]);
    assert_eq!(ids(&index, &query("cat sat", true)), vec!["d1"]);
}

#[test]
fn scores_are_descending_and_positive() {
    let index = TantivyRankingIndex::in_memory(MEM).expect("index");
    index
        .apply(
            &[IndexOp::Insert(entry(1, "weak", "cat dog bird fish horse cow")), IndexOp::Insert(entry(2, "strong", "cat cat cat"))],
            1,
        )
        .expect("apply");
    let hits = index.search(&query("cat", false)).expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "strong");
    assert!(hits[0].score > hits[1].score);
    assert!(hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn stemming_matches_inflections() {
    let index = TantivyRankingIndex::in_memory(MEM).expect("index");
    index.apply(&[IndexOp::Insert(entry(1, "d1", "she was running home"))], 1).expect("apply");
    assert_eq!(ids(&index, &query("runs", false)), vec!["d1"]);
}

#[test]
fn empty_and_stopword_queries_match_nothing() {
    let index = seeded();
    assert!(index.search(&query("", false)).expect("empty").is_empty());
    assert!(index.search(&query("   ", true)).expect("blank").is_empty());
    assert!(index.search(&query("the", false)).expect("stopword").is_empty());
}

#[test]
fn malformed_syntax_is_tolerated() {
    let index = seeded();
    assert_eq!(ids(&index, &query("cat AND (", false)), vec!["d1", "d3"]);
}

#[test]
fn only_content_is_searchable() {
    let index = seeded();
    assert!(index.search(&query("id:d2", false)).expect("id field").is_empty());
    assert!(index.search(&query("namespace:document", false)).expect("namespace field").is_empty());
    assert!(index.search(&query("row:2", false)).expect("row field").is_empty());
    assert_eq!(ids(&index, &query("content:dog", false)), vec!["d2"]);
}

#[test]
fn searches_are_scoped_to_namespace() {
    let index = seeded();
    let other = IndexEntry { row: 4, id: "d1".into(), namespace: "other".into(), content: "cat".into() };
    index.apply(&[IndexOp::Insert(other)], 2).expect("apply");
    let q = KeywordQuery { text: "cat".into(), namespace: "other".into(), all_terms_must_match: false };
    let hits = index.search(&q).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(ids(&index, &query("cat", false)), vec!["d1", "d3"]);
    assert!(index.search(&query("namespace:other cat", true)).expect("field syntax").is_empty());
}

#[test]
fn namespace_clause_does_not_change_scores() {
    let index = seeded();
    let other = IndexEntry { row: 4, id: "x".into(), namespace: "other".into(), content: "the cat sat".into() };
    index.apply(&[IndexOp::Insert(other)], 2).expect("apply");
    let here = index.search(&query("cat", false)).expect("here");
    let q = KeywordQuery { text: "cat".into(), namespace: "other".into(), all_terms_must_match: false };
    let there = index.search(&q).expect("there");
    let d1 = here.iter().find(|m| m.id == "d1").expect("d1");
    assert!((d1.score - there[0].score).abs() < 1e-6);
}

#[test]
fn remove_and_replace_by_row() {
    let index = seeded();
    index
        .apply(&[IndexOp::Remove(entry(1, "d1", "the cat sat")), IndexOp::Insert(entry(1, "d1", "a bird sang"))], 2)
        .expect("update");
    index.apply(&[IndexOp::Remove(entry(3, "d3", "the cat ran"))], 3).expect("delete");
    assert!(index.search(&query("cat", false)).expect("cat").is_empty());
    assert_eq!(ids(&index, &query("bird", false)), vec!["d1"]);

    let entries = index.entries().expect("entries");
    assert_eq!(entries, vec![entry(1, "d1", "a bird sang"), entry(2, "d2", "the dog sat")]);
    assert_eq!(index.num_entries().expect("count"), 2);
}

#[test]
fn undo_of_an_in_call_overwrite_leaves_the_index_empty() {
    let index = TantivyRankingIndex::in_memory(MEM).expect("index");
    let first = entry(1, "d1", "the cat sat");
    let second = entry(1, "d1", "a bird sang");
    let ops = [IndexOp::Insert(first.clone()), IndexOp::Remove(first), IndexOp::Insert(second)];
    index.apply(&ops, 1).expect("apply");
    assert_eq!(ids(&index, &query("bird", false)), vec!["d1"]);

    index.apply(&IndexOp::undo(&ops), 0).expect("undo");
    assert_eq!(index.num_entries().expect("count"), 0);
    assert!(index.search(&query("cat bird", false)).expect("search").is_empty());
    assert_eq!(index.generation().expect("generation"), 0);
}

#[test]
fn generation_travels_with_each_commit() {
    let index = TantivyRankingIndex::in_memory(MEM).expect("index");
    assert_eq!(index.generation().expect("fresh"), 0);
    index.apply(&[IndexOp::Insert(entry(1, "d1", "cat"))], 7).expect("apply");
    assert_eq!(index.generation().expect("after apply"), 7);
    index.apply(&[], 9).expect("empty apply");
    assert_eq!(index.generation().expect("no-op keeps generation"), 7);
    index.clear(8).expect("clear");
    assert_eq!(index.generation().expect("after clear"), 8);
}

#[test]
fn clear_drops_everything() {
    let index = seeded();
    index.clear(2).expect("clear");
    assert_eq!(index.num_entries().expect("count"), 0);
    assert!(index.search(&query("cat", false)).expect("search").is_empty());
}

#[test]
fn replace_all_commits_once_and_keeps_old_contents_on_error() {
    let index = seeded();
    let mut failing = vec![
        Ok(vec![entry(10, "n1", "a bird sang")]),
        Err(Error::Storage("page read failed".into())),
    ]
    .into_iter();
    assert!(index.replace_all(&mut failing, 5).is_err());
    assert_eq!(ids(&index, &query("cat", false)), vec!["d1", "d3"]);
    assert!(index.search(&query("bird", false)).expect("bird").is_empty());
    assert_eq!(index.generation().expect("generation"), 1);

    let mut pages = vec![Ok(vec![entry(10, "n1", "a bird sang")]), Ok(vec![entry(11, "n2", "the bird flew")])].into_iter();
    let pages: &mut dyn Iterator<Item = Result<Vec<IndexEntry>>> = &mut pages;
    assert_eq!(index.replace_all(pages, 5).expect("replace"), 2);
    assert_eq!(ids(&index, &query("bird", false)), vec!["n1", "n2"]);
    assert!(index.search(&query("cat", false)).expect("cat").is_empty());
    assert_eq!(index.generation().expect("generation"), 5);
}

#[test]
fn ensure_index_exists_is_idempotent_on_disk() {
    let tmp = tempfile::tempdir().expect("tmp");
    let dir = tmp.path().join("index");
    {
        let index = TantivyRankingIndex::ensure_index_exists(&dir, MEM).expect("create");
        index.apply(&[IndexOp::Insert(entry(1, "d1", "the cat sat"))], 3).expect("apply");
    }
    let reopened = TantivyRankingIndex::ensure_index_exists(&dir, MEM).expect("reopen");
    assert_eq!(reopened.num_entries().expect("count"), 1);
    assert_eq!(reopened.generation().expect("generation"), 3);
    assert_eq!(ids(&reopened, &query("cat", true)), vec!["d1"]);
}
