use cairn::chunker::{chunk_id, chunk_markdown, estimate_tokens};
use cairn::config::ChunkingConfig;

fn default_config() -> ChunkingConfig {
    ChunkingConfig {
        max_tokens: 512,
        overlap_tokens: 50,
        respect_headers: true,
    }
}

/// A daily-log style document of roughly 1200 estimated tokens with a code
/// fence and some CJK prose.
fn sample_document() -> String {
    let mut doc = String::from("# Daily log\n\n");
    for i in 0..60 {
        doc.push_str(&format!(
            "- {i:02}: reviewed the deploy checklist and noted follow-ups for the team\n"
        ));
    }
    doc.push_str("\n## Snippet\n\n```bash\n");
    for i in 0..8 {
        doc.push_str(&format!("kubectl rollout status deploy/api-{i}\n"));
    }
    doc.push_str("```\n\n## 笔记\n\n");
    for _ in 0..20 {
        doc.push_str("今天和团队讨论了发布流程，决定周五之前完成迁移。\n");
    }
    doc
}

#[test]
fn long_document_respects_token_budget() {
    let doc = sample_document();
    assert!(estimate_tokens(&doc) > 1000);

    let chunks = chunk_markdown(&doc, "memory/2025-03-07.md", &default_config());
    assert!(chunks.len() >= 3);
    for chunk in &chunks {
        assert!(
            estimate_tokens(&chunk.text) <= 512,
            "chunk over budget: {} tokens",
            estimate_tokens(&chunk.text)
        );
        assert!(chunk.start_line >= 1 && chunk.start_line <= chunk.end_line);
        assert_eq!(chunk.id(), chunk_id(&chunk.path, chunk.start_line, chunk.end_line));
    }
}

#[test]
fn fence_stays_in_one_chunk() {
    let doc = sample_document();
    let chunks = chunk_markdown(&doc, "log.md", &default_config());
    let with_fence: Vec<_> = chunks.iter().filter(|c| c.text.contains("```")).collect();
    assert!(!with_fence.is_empty());
    for chunk in with_fence {
        assert_eq!(chunk.text.matches("```").count(), 2, "fence split: {}", chunk.text);
    }
}

#[test]
fn rechunking_is_byte_identical() {
    let doc = sample_document();
    let first = chunk_markdown(&doc, "log.md", &default_config());
    let second = chunk_markdown(&doc, "log.md", &default_config());
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.id(), b.id());
        assert_eq!(a.text, b.text);
        assert_eq!(a.hash, b.hash);
    }
}

#[test]
fn editing_one_section_keeps_other_chunk_ids() {
    let doc = "# One\nalpha\n\n# Two\nbeta\n";
    let edited = "# One\nalpha\n\n# Two\nbeta gamma\n";
    let before = chunk_markdown(doc, "n.md", &default_config());
    let after = chunk_markdown(edited, "n.md", &default_config());

    assert_eq!(before[0].id(), after[0].id());
    assert_eq!(before[0].hash, after[0].hash);
    assert_eq!(before[1].id(), after[1].id());
    assert_ne!(before[1].hash, after[1].hash);
}
