use crate::core::types::{EvidenceChunk, EvidenceSet, SourceKind};

pub const MAX_CHUNK_CHARS: usize = 1_200;
pub const MAX_CONTEXT_CHARS: usize = 24_000;

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}

fn locator(chunk: &EvidenceChunk) -> String {
    match chunk.source_kind {
        SourceKind::RfpPdf => {
            let document = chunk.document.as_deref().unwrap_or("RFP");
            match (chunk.page, chunk.paragraph) {
                (Some(page), Some(paragraph)) => format!("PDF {document} S.{page} ¶{paragraph}"),
                (Some(page), None) => format!("PDF {document} S.{page}"),
                _ => format!("PDF {document} ohne Seitenangabe"),
            }
        }
        SourceKind::WebPage => match chunk.url.as_deref() {
            Some(url) => format!("Web {url}"),
            None => "Web ohne URL".to_string(),
        },
    }
}

/// Renders the chunks as `[chunk:<id>] (<locator>) <content>` lines, each
/// chunk capped at `MAX_CHUNK_CHARS` and the block at `MAX_CONTEXT_CHARS`.
pub fn build_evidence_context(evidence: &EvidenceSet) -> String {
    build_evidence_context_bounded(evidence, MAX_CHUNK_CHARS, MAX_CONTEXT_CHARS)
}

pub fn build_evidence_context_bounded(
    evidence: &EvidenceSet,
    max_chunk_chars: usize,
    max_total_chars: usize,
) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for chunk in evidence.chunks() {
        let content = chunk.content.split_whitespace().collect::<Vec<_>>().join(" ");
        let line = format!(
            "[chunk:{}] ({}) {}\n",
            chunk.id,
            locator(chunk),
            truncate_chars(&content, max_chunk_chars)
        );
        let line_chars = line.chars().count();
        if used + line_chars > max_total_chars {
            break;
        }
        used += line_chars;
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{build_evidence_context_bounded, truncate_chars};
    use crate::core::types::{EvidenceChunk, EvidenceSet, SourceKind};

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("Größe", 3), "Grö…");
        assert_eq!(truncate_chars("kurz", 10), "kurz");
    }

    #[test]
    fn context_stops_at_total_budget() {
        let chunks = (0..5)
            .map(|idx| EvidenceChunk {
                id: format!("c{idx}"),
                content: "x".repeat(50),
                source_kind: SourceKind::WebPage,
                document: None,
                page: None,
                paragraph: None,
                url: Some("https://example.org".to_string()),
            })
            .collect::<Vec<_>>();
        let context = build_evidence_context_bounded(&EvidenceSet::from_chunks(chunks), 100, 200);
        assert!(context.starts_with("[chunk:c0] (Web https://example.org)"));
        assert_eq!(context.lines().count(), 2);
    }
}
