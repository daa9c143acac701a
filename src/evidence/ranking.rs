use std::collections::HashSet;

use crate::core::types::{EvidenceChunk, EvidenceQuery};

fn is_stopword(value: &str) -> bool {
    matches!(
        value,
        "und"
            | "oder"
            | "der"
            | "die"
            | "das"
            | "den"
            | "dem"
            | "des"
            | "ein"
            | "eine"
            | "einer"
            | "eines"
            | "für"
            | "mit"
            | "von"
            | "vom"
            | "zum"
            | "zur"
            | "auf"
            | "aus"
            | "bei"
            | "ist"
            | "sind"
            | "wie"
            | "welche"
            | "welcher"
            | "werden"
            | "wird"
            | "im"
            | "in"
            | "an"
            | "the"
            | "and"
            | "for"
            | "with"
            | "what"
    )
}

pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|value: char| !value.is_alphanumeric())
        .map(|value| value.trim().to_lowercase())
        .filter(|value| value.chars().count() > 2)
        .filter(|value| !is_stopword(value))
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Share of query terms found in the chunk. Substring matching keeps German
/// compounds ("Angebotsunterlagen") reachable from their parts.
pub fn score_chunk(terms: &[String], content_lower: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let matched = terms
        .iter()
        .filter(|term| content_lower.contains(term.as_str()))
        .count();
    matched as f64 / terms.len() as f64
}

/// Ranks `chunks` per query and merges the rankings round-robin so every
/// query contributes its best hits before any query contributes its second.
/// Falls back to stored order when no query matches anything.
pub fn rank_chunks(
    chunks: &[EvidenceChunk],
    queries: &[EvidenceQuery],
    max_total: usize,
) -> Vec<EvidenceChunk> {
    if max_total == 0 || chunks.is_empty() {
        return vec![];
    }
    let lowered = chunks
        .iter()
        .map(|chunk| chunk.content.to_lowercase())
        .collect::<Vec<_>>();

    let per_query = queries
        .iter()
        .map(|query| {
            let terms = query_terms(&query.query);
            let mut scored = lowered
                .iter()
                .enumerate()
                .map(|(idx, content)| (idx, score_chunk(&terms, content)))
                .filter(|(_, score)| *score > 0.0)
                .collect::<Vec<_>>();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            scored.into_iter().map(|(idx, _)| idx).collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let mut selected = Vec::new();
    let mut seen_ids = HashSet::new();
    let longest = per_query.iter().map(Vec::len).max().unwrap_or(0);
    'outer: for rank in 0..longest {
        for ranking in &per_query {
            let Some(idx) = ranking.get(rank) else {
                continue;
            };
            let chunk = &chunks[*idx];
            if seen_ids.insert(chunk.id.as_str()) {
                selected.push(chunk.clone());
                if selected.len() >= max_total {
                    break 'outer;
                }
            }
        }
    }

    if selected.is_empty() {
        let mut fallback = Vec::new();
        let mut seen_ids = HashSet::new();
        for chunk in chunks {
            if seen_ids.insert(chunk.id.as_str()) {
                fallback.push(chunk.clone());
            }
            if fallback.len() >= max_total {
                break;
            }
        }
        return fallback;
    }
    selected
}
