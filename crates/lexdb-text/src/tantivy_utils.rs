use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED, STRING};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use lexdb_core::error::{Error, Result};

pub const TOKENIZER_NAME: &str = "en_stem_stop";

const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
];

/// Handles to the shadow index fields.
#[derive(Debug, Clone, Copy)]
pub struct ShadowFields {
	pub row: Field,
	pub id: Field,
	pub namespace: Field,
	pub content: Field,
}

impl ShadowFields {
	pub fn from_schema(schema: &Schema) -> Result<Self> {
		let field = |name: &str| schema.get_field(name).map_err(|e| Error::IndexSync(format!("index schema lacks '{}': {}", name, e)));
		Ok(Self { row: field("row")?, id: field("id")?, namespace: field("namespace")?, content: field("content")? })
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_u64_field("row", INDEXED | STORED | FAST);
	schema_builder.add_text_field("id", STORED);
	schema_builder.add_text_field("namespace", STRING | STORED);
	let content_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let content_options = TextOptions::default().set_indexing_options(content_indexing).set_stored();
	schema_builder.add_text_field("content", content_options);
	schema_builder.build()
}

/// Lowercasing, stop-word removing, English-stemming analyzer for `content`.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(40))
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.filter(Stemmer::new(Language::English))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
