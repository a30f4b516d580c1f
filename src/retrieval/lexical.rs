//! Lexical search adapter (C1): BM25 query and facet aggregations against
//! an OpenSearch-compatible inverted index, reached over its REST API via
//! a pooled `reqwest::Client` (the only HTTP client any repo in this corpus
//! reaches for — there is no native OpenSearch SDK in the stack).

use crate::domain::Chunk;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const INDEX_NAME: &str = "chunks";

pub struct LexicalAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl LexicalAdapter {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client build must not fail with a static config");
        Self { client, base_url }
    }

    /// Multi-field match on `title` (weight 2) and `text` (weight 1), with
    /// conjunctive term filters over `lang`/`tags`. Degrades to an empty
    /// list on any backend error or timeout (spec §4.1) — lexical failures
    /// never propagate to the caller.
    pub async fn search_lexical(
        &self,
        query: &str,
        size: usize,
        filters: &HashMap<String, String>,
    ) -> Vec<(Chunk, f64)> {
        match self.search_lexical_inner(query, size, filters).await {
            Ok(chunks) => chunks,
            Err(_) => {
                log::warn!("lexical search failed, degrading to empty result");
                Vec::new()
            }
        }
    }

    async fn search_lexical_inner(
        &self,
        query: &str,
        size: usize,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<(Chunk, f64)>, reqwest::Error> {
        let body = search_body(query, size, filters);
        let url = format!("{}/{}/_search", self.base_url, INDEX_NAME);

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(r) if r.status().as_u16() == 404 => {
                // Index missing: attempt lazy creation from the published
                // mapping, then retry once (spec §4.1).
                let _ = self.create_index_if_missing().await;
                self.client.post(&url).json(&body).send().await?
            }
            Ok(r) => r,
            Err(e) => return Err(e),
        };

        let resp = resp.error_for_status()?;
        let parsed: Value = resp.json().await?;
        Ok(parse_hits(&parsed))
    }

    async fn create_index_if_missing(&self) -> Result<(), reqwest::Error> {
        let url = format!("{}/{}", self.base_url, INDEX_NAME);
        let mapping = json!({
            "mappings": {
                "properties": {
                    "doc_id": { "type": "keyword" },
                    "chunk_id": { "type": "keyword" },
                    "title": { "type": "text" },
                    "text": { "type": "text" },
                    "url": { "type": "keyword" },
                    "section": { "type": "keyword" },
                    "lang": { "type": "keyword" },
                    "tags": { "type": "keyword" }
                }
            }
        });
        self.client.put(&url).json(&mapping).send().await?;
        Ok(())
    }

    /// `{field → {value → count}}` aggregation over `lang` and `tags`,
    /// respecting the same filters as `search_lexical`.
    pub async fn facets(
        &self,
        filters: &HashMap<String, String>,
    ) -> HashMap<String, HashMap<String, u64>> {
        match self.facets_inner(filters).await {
            Ok(facets) => facets,
            Err(_) => {
                log::warn!("facets query failed, degrading to empty result");
                HashMap::new()
            }
        }
    }

    async fn facets_inner(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<HashMap<String, HashMap<String, u64>>, reqwest::Error> {
        let url = format!("{}/{}/_search", self.base_url, INDEX_NAME);
        let body = json!({
            "size": 0,
            "query": filter_query(filters),
            "aggs": {
                "lang": { "terms": { "field": "lang", "size": 50 } },
                "tags": { "terms": { "field": "tags", "size": 50 } }
            }
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        let resp = resp.error_for_status()?;
        let parsed: Value = resp.json().await?;

        let mut facets = HashMap::new();
        for field in ["lang", "tags"] {
            let mut counts = HashMap::new();
            if let Some(buckets) = parsed["aggregations"][field]["buckets"].as_array() {
                for bucket in buckets {
                    if let (Some(key), Some(count)) =
                        (bucket["key"].as_str(), bucket["doc_count"].as_u64())
                    {
                        counts.insert(key.to_string(), count);
                    }
                }
            }
            facets.insert(field.to_string(), counts);
        }
        Ok(facets)
    }
}

fn search_body(query: &str, size: usize, filters: &HashMap<String, String>) -> Value {
    json!({
        "size": size,
        "query": {
            "bool": {
                "must": {
                    "multi_match": {
                        "query": query,
                        "fields": ["title^2", "text"],
                        "type": "best_fields"
                    }
                },
                "filter": filter_clauses(filters)
            }
        }
    })
}

fn filter_query(filters: &HashMap<String, String>) -> Value {
    json!({ "bool": { "filter": filter_clauses(filters) } })
}

fn filter_clauses(filters: &HashMap<String, String>) -> Vec<Value> {
    filters
        .iter()
        .map(|(field, value)| json!({ "term": { field: value } }))
        .collect()
}

fn parse_hits(parsed: &Value) -> Vec<(Chunk, f64)> {
    let hits = match parsed["hits"]["hits"].as_array() {
        Some(h) => h,
        None => return Vec::new(),
    };

    hits.iter()
        .filter_map(|hit| {
            let source = hit.get("_source")?;
            let score = hit["_score"].as_f64().unwrap_or(0.0);
            let chunk = Chunk {
                doc_id: source["doc_id"].as_str()?.to_string(),
                chunk_id: source["chunk_id"].as_str()?.to_string(),
                title: source["title"].as_str().unwrap_or("").to_string(),
                text: source["text"].as_str().unwrap_or("").to_string(),
                url: source["url"].as_str().unwrap_or("").to_string(),
                section: source["section"].as_str().unwrap_or("").to_string(),
                lang: source["lang"].as_str().unwrap_or("").to_string(),
                tags: source["tags"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect::<HashSet<_>>()
                    })
                    .unwrap_or_default(),
                tokens: 0,
                embedding: None,
            };
            Some((chunk, score))
        })
        .collect()
}

/// Parse the `"k1:v1,k2:v2"` filter grammar used by the `search`/`ask`
/// query parameters into a conjunctive filter map.
pub fn parse_filters(raw: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return map,
    };
    for pair in raw.split(',') {
        if let Some((k, v)) = pair.split_once(':') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}
