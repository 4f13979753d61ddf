use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

use lexdb_core::error::{Error, Result};
use lexdb_core::traits::RankingIndex;
use lexdb_core::types::{IndexEntry, IndexOp, KeywordQuery, RawMatch};

use crate::tantivy_utils::{build_schema, register_tokenizer, ShadowFields, TOKENIZER_NAME};

fn index_err<E: std::fmt::Display>(e: E) -> Error { Error::IndexSync(e.to_string()) }

/// Tantivy-backed shadow of the document table.
///
/// One writer is held for the lifetime of the index; every `apply` stages
/// its operations and commits them as one unit, rolling back on failure.
/// The sync generation travels in the commit payload.
pub struct TantivyRankingIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: ShadowFields,
}

impl TantivyRankingIndex {
	/// Volatile index, used for `redb://:memory:` stores and tests.
	pub fn in_memory(writer_memory_bytes: usize) -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()), writer_memory_bytes)
	}

	/// Open the index in `index_dir`, creating the directory and schema when
	/// absent. Calling it on an existing index leaves it untouched.
	pub fn ensure_index_exists(index_dir: &Path, writer_memory_bytes: usize) -> Result<Self> {
		std::fs::create_dir_all(index_dir).map_err(index_err)?;
		let directory = MmapDirectory::open(index_dir).map_err(index_err)?;
		let index = Index::open_or_create(directory, build_schema()).map_err(index_err)?;
		info!(dir = %index_dir.display(), "ranking index ready");
		Self::from_index(index, writer_memory_bytes)
	}

	fn from_index(index: Index, writer_memory_bytes: usize) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ShadowFields::from_schema(&index.schema())?;
		let writer: IndexWriter = index.writer_with_num_threads(1, writer_memory_bytes).map_err(index_err)?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(index_err)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>> {
		self.writer.lock().map_err(|_| Error::IndexSync("index writer lock poisoned".into()))
	}

	fn add_entry(&self, writer: &IndexWriter, entry: &IndexEntry) -> Result<()> {
		writer
			.add_document(doc!(
				self.fields.row => entry.row,
				self.fields.id => entry.id.clone(),
				self.fields.namespace => entry.namespace.clone(),
				self.fields.content => entry.content.clone(),
			))
			.map_err(index_err)?;
		Ok(())
	}

	fn stage(&self, writer: &IndexWriter, ops: &[IndexOp]) -> Result<()> {
		for op in ops {
			match op {
				IndexOp::Remove(entry) => {
					writer.delete_term(Term::from_field_u64(self.fields.row, entry.row));
				}
				IndexOp::Insert(entry) => self.add_entry(writer, entry)?,
			}
		}
		Ok(())
	}

	fn stage_replacement(&self, writer: &IndexWriter, pages: &mut dyn Iterator<Item = Result<Vec<IndexEntry>>>) -> Result<u64> {
		writer.delete_query(Box::new(AllQuery)).map_err(index_err)?;
		let mut total = 0u64;
		for page in pages {
			let page = page?;
			for entry in &page { self.add_entry(writer, entry)?; }
			total += page.len() as u64;
		}
		Ok(total)
	}

	/// Commit staged work with `generation` as payload; roll back on failure.
	fn commit(&self, writer: &mut IndexWriter, generation: u64) -> Result<()> {
		let committed = match writer.prepare_commit() {
			Ok(mut prepared) => {
				prepared.set_payload(&generation.to_string());
				prepared.commit()
			}
			Err(e) => Err(e),
		};
		if let Err(e) = committed {
			Self::rollback(writer);
			return Err(index_err(e));
		}
		if let Err(e) = self.reader.reload() {
			warn!(error = %e, "index reader reload failed; searches may lag");
		}
		Ok(())
	}

	fn rollback(writer: &mut IndexWriter) {
		if let Err(rb) = writer.rollback() { warn!(error = %rb, "index rollback failed"); }
	}

	/// Query terms as the content analyzer produces them, first occurrence only.
	fn analyze(&self, text: &str) -> Result<Vec<String>> {
		let mut analyzer = self
			.index
			.tokenizers()
			.get(TOKENIZER_NAME)
			.ok_or_else(|| Error::IndexSync(format!("tokenizer '{}' is not registered", TOKENIZER_NAME)))?;
		let mut stream = analyzer.token_stream(text);
		let mut terms: Vec<String> = Vec::new();
		while stream.advance() {
			let term = &stream.token().text;
			if !terms.contains(term) { terms.push(term.clone()); }
		}
		Ok(terms)
	}

	fn entry_from_doc(&self, doc: &TantivyDocument) -> Option<IndexEntry> {
		let text = |field: tantivy::schema::Field| doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string);
		Some(IndexEntry {
			row: doc.get_first(self.fields.row).and_then(|v| v.as_u64())?,
			id: text(self.fields.id)?,
			namespace: text(self.fields.namespace)?,
			content: text(self.fields.content)?,
		})
	}
}

impl RankingIndex for TantivyRankingIndex {
	fn apply(&self, ops: &[IndexOp], generation: u64) -> Result<()> {
		if ops.is_empty() { return Ok(()); }
		let mut writer = self.lock_writer()?;
		if let Err(e) = self.stage(&writer, ops) {
			Self::rollback(&mut writer);
			return Err(e);
		}
		self.commit(&mut writer, generation)?;
		debug!(ops = ops.len(), generation, "index operations committed");
		Ok(())
	}

	fn replace_all(&self, pages: &mut dyn Iterator<Item = Result<Vec<IndexEntry>>>, generation: u64) -> Result<u64> {
		let mut writer = self.lock_writer()?;
		let total = match self.stage_replacement(&writer, pages) {
			Ok(total) => total,
			Err(e) => {
				Self::rollback(&mut writer);
				return Err(e);
			}
		};
		self.commit(&mut writer, generation)?;
		debug!(entries = total, generation, "index contents replaced");
		Ok(total)
	}

	fn generation(&self) -> Result<u64> {
		let metas = self.index.load_metas().map_err(index_err)?;
		match metas.payload {
			None => Ok(0),
			Some(payload) => payload
				.parse()
				.map_err(|_| Error::IndexSync(format!("unreadable sync generation '{}'", payload))),
		}
	}

	fn search(&self, query: &KeywordQuery) -> Result<Vec<RawMatch>> {
		let terms = self.analyze(&query.text)?;
		if terms.is_empty() { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let limit = searcher.num_docs() as usize;
		if limit == 0 { return Ok(Vec::new()); }

		// Only `content` is searchable; the namespace clause filters without scoring.
		let occur = if query.all_terms_must_match { Occur::Must } else { Occur::Should };
		let content_clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|term| {
				let term = Term::from_field_text(self.fields.content, term);
				(occur, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let namespace = TermQuery::new(Term::from_field_text(self.fields.namespace, &query.namespace), IndexRecordOption::Basic);
		let scoped = BooleanQuery::new(vec![
			(Occur::Must, Box::new(BooleanQuery::new(content_clauses)) as Box<dyn Query>),
			(Occur::Must, Box::new(ConstScoreQuery::new(Box::new(namespace), 0.0))),
		]);

		// BM25 scores from tantivy are already "higher is more relevant".
		let top_docs = searcher.search(&scoped, &TopDocs::with_limit(limit)).map_err(index_err)?;
		let mut matches = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(index_err)?;
			let Some(id) = doc.get_first(self.fields.id).and_then(|v| v.as_str()) else { continue };
			matches.push(RawMatch { id: id.to_string(), score: f64::from(score) });
		}
		debug!(query = %query.text, terms = terms.len(), hits = matches.len(), "ranked query executed");
		Ok(matches)
	}

	fn entries(&self) -> Result<Vec<IndexEntry>> {
		let searcher = self.reader.searcher();
		let addrs = searcher.search(&AllQuery, &DocSetCollector).map_err(index_err)?;
		let mut entries = Vec::with_capacity(addrs.len());
		for addr in addrs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(index_err)?;
			let entry = self.entry_from_doc(&doc).ok_or_else(|| Error::IndexSync("index entry lacks a stored field".into()))?;
			entries.push(entry);
		}
		entries.sort_by_key(|e| e.row);
		Ok(entries)
	}

	fn num_entries(&self) -> Result<u64> { Ok(self.reader.searcher().num_docs()) }
}
