use serde_json::json;

use lexdb_core::error::Error;
use lexdb_core::types::{Document, ResultDocument};
use lexdb_retrieval::{KeywordRetriever, QueryOptions};
use lexdb_store::DocumentStore;

fn retriever(docs: &[Document]) -> KeywordRetriever {
    let store = DocumentStore::open_in_memory().expect("store");
    store.write_documents(docs, None, None).expect("write");
    KeywordRetriever::new(store)
}

fn ids(results: &[ResultDocument]) -> Vec<&str> { results.iter().map(|r| r.document.id.as_str()).collect() }

fn cats() -> Vec<Document> {
    vec![
        Document::new("d1", "the cat sat").with_meta("lang", "en"),
        Document::new("d2", "the dog sat").with_meta("lang", "en"),
        Document::new("d3", "the cat ran").with_meta("lang", "fr"),
    ]
}

#[test]
fn cat_example() {
    let r = retriever(&cats());
    let results = r.query("cat", &QueryOptions::default()).expect("query");
    let mut got = ids(&results);
    got.sort();
    assert_eq!(got, vec!["d1", "d3"]);
    assert!(results.iter().all(|res| res.score > 0.5 && res.score < 1.0));

    let filtered = r.query("cat", &QueryOptions::default().with_filters(json!({"lang": "en"}))).expect("filtered");
    assert_eq!(ids(&filtered), vec!["d1"]);

    let all = r.query("cat sat", &QueryOptions::default().with_all_terms_must_match(true)).expect("and");
    assert_eq!(ids(&all), vec!["d1"]);
}

#[test]
fn scaling_preserves_order() {
    let r = retriever(&[
        Document::new("weak", "cat dog bird fish horse cow"),
        Document::new("mid", "cat cat dog"),
        Document::new("strong", "cat cat cat"),
    ]);
    let scaled = r.query("cat", &QueryOptions::default()).expect("scaled");
    let raw = r.query("cat", &QueryOptions::default().with_scale_score(false)).expect("raw");
    assert_eq!(ids(&scaled), ids(&raw));
    assert_eq!(ids(&scaled)[0], "strong");
    assert!(scaled.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(scaled.iter().all(|res| res.score > 0.0 && res.score < 1.0));
}

#[test]
fn top_k_applies_after_filtering() {
    let docs: Vec<Document> = (0..12)
        .map(|i| {
            let lang = if i % 3 == 0 { "en" } else { "de" };
            Document::new(format!("doc-{:02}", i), "keyword text").with_meta("lang", lang)
        })
        .collect();
    let r = retriever(&docs);

    let en = r.query("keyword", &QueryOptions::default().with_top_k(3).with_filters(json!({"lang": "en"}))).expect("en");
    assert_eq!(en.len(), 3);
    assert!(en.iter().all(|res| res.document.meta.get("lang") == Some(&json!("en"))));

    assert_eq!(r.query("keyword", &QueryOptions::default().with_top_k(5)).expect("five").len(), 5);
    assert_eq!(r.query("keyword", &QueryOptions::default().with_top_k(0)).expect("all").len(), 12);
    assert_eq!(r.query("keyword", &QueryOptions::default().with_top_k(100)).expect("more").len(), 12);
}

#[test]
fn empty_intersections_and_queries() {
    let r = retriever(&cats());
    let none = r.query("dog", &QueryOptions::default().with_filters(json!({"lang": "fr"}))).expect("none");
    assert!(none.is_empty());
    assert!(r.query("", &QueryOptions::default()).expect("empty").is_empty());
    assert!(r.query("zebra", &QueryOptions::default()).expect("miss").is_empty());
}

#[test]
fn malformed_filters_fail_before_ranking() {
    let r = retriever(&cats());
    let err = r.query("cat", &QueryOptions::default().with_filters(json!(["lang"]))).expect_err("bad filter");
    assert!(matches!(err, Error::InvalidFilter(_)));
}

#[test]
fn ignored_options_do_not_change_results() {
    let r = retriever(&cats());
    let mut opts = QueryOptions::default();
    opts.custom_query = Some("SELECT 1".into());
    opts.headers = Some([("x".to_string(), "y".to_string())].into_iter().collect());
    assert_eq!(r.query("cat", &opts).expect("query").len(), 2);
}

#[test]
fn namespaces_scope_queries() {
    let r = retriever(&cats());
    r.store().write_documents(&[Document::new("d1", "a cat in another place")], Some("other"), None).expect("other");
    let other = r.query("cat", &QueryOptions::default().with_namespace("other")).expect("other");
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].document.content, "a cat in another place");
    assert_eq!(r.query("cat", &QueryOptions::default()).expect("default").len(), 2);
}

#[test]
fn batch_queries_are_independent() {
    let r = retriever(&cats());
    let opts = QueryOptions::default();
    let batch = r.query_batch(&["cat", "dog", "zebra"], &opts).expect("batch");
    assert_eq!(batch.len(), 3);
    for (text, results) in ["cat", "dog", "zebra"].iter().zip(&batch) {
        assert_eq!(results, &r.query(text, &opts).expect("single"));
    }
    assert_eq!(ids(&batch[1]), vec!["d2"]);
    assert!(batch[2].is_empty());
}

#[test]
fn results_reflect_later_writes() {
    let r = retriever(&cats());
    r.store().delete_documents(None, Some(&["d1".to_string()]), None).expect("delete");
    r.store().write_documents(&[Document::new("d2", "now a cat")], None, None).expect("update");
    let mut got = ids(&r.query("cat", &QueryOptions::default()).expect("query")).into_iter().map(String::from).collect::<Vec<_>>();
    got.sort();
    assert_eq!(got, vec!["d2", "d3"]);
}

#[test]
fn raw_scores_with_all_terms_then_delete() {
    let r = retriever(&cats());
    let opts = QueryOptions::default().with_all_terms_must_match(true).with_scale_score(false);
    let results = r.query("cat", &opts).expect("query");
    let mut got = ids(&results);
    got.sort();
    assert_eq!(got, vec!["d1", "d3"]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.iter().all(|res| res.score > 0.0));

    r.store().delete_documents(None, Some(&["d3".to_string()]), None).expect("delete");
    assert_eq!(ids(&r.query("cat", &opts).expect("after delete")), vec!["d1"]);
}

#[test]
fn top_k_keeps_the_best_filtered_matches() {
    let r = retriever(&[
        Document::new("a", "cat cat cat cat").with_meta("lang", "de"),
        Document::new("b", "cat cat cat dog").with_meta("lang", "en"),
        Document::new("c", "cat cat dog dog").with_meta("lang", "en"),
        Document::new("d", "cat dog dog dog").with_meta("lang", "en"),
    ]);
    let en = r.query("cat", &QueryOptions::default().with_top_k(2).with_filters(json!({"lang": "en"}))).expect("en");
    assert_eq!(ids(&en), vec!["b", "c"]);
    let any = r.query("cat", &QueryOptions::default().with_top_k(2)).expect("any");
    assert_eq!(ids(&any), vec!["a", "b"]);
}

#[test]
fn field_syntax_searches_content_only() {
    let r = retriever(&cats());
    assert!(r.query("id:d2", &QueryOptions::default()).expect("id").is_empty());
    assert!(r.query("namespace:other", &QueryOptions::default()).expect("namespace").is_empty());
    assert_eq!(ids(&r.query("content:dog", &QueryOptions::default()).expect("content")), vec!["d2"]);
}
