//! Markdown-aware splitting of source text into embeddable chunks.
//!
//! An ATX heading (`#` through `######`) opens a new chunk titled after
//! the heading; anything before the first heading lands in an "Intro"
//! chunk. A chunk that comes out too short keeps absorbing the sections
//! after it, so the embedding backend is never fed lone fragments.

/// A chunk shorter than this pulls the following section into itself.
const MIN_CHUNK_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub title: String,
    pub content: String,
    pub index: usize,
}

/// Deterministic: the same input always produces the same chunk list,
/// which is what makes re-embedding an unchanged source idempotent.
pub fn chunk_text(input: &str) -> Vec<Chunk> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut title = String::from("Intro");
    let mut body: Vec<&str> = Vec::new();

    for line in input.lines() {
        if let Some(next) = heading_title(line) {
            push_section(&mut sections, std::mem::replace(&mut title, next), &body);
            body.clear();
        } else {
            body.push(line);
        }
    }
    push_section(&mut sections, title, &body);

    merge_undersized(sections)
}

fn push_section(sections: &mut Vec<(String, String)>, title: String, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        sections.push((title, content));
    }
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let level = trimmed.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let title = trimmed[level..].trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn merge_undersized(sections: Vec<(String, String)>) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();

    for (title, content) in sections {
        let absorb = chunks
            .last()
            .is_some_and(|prev| prev.content.len() < MIN_CHUNK_CHARS);
        if absorb && let Some(prev) = chunks.last_mut() {
            prev.content.push_str("\n\n");
            prev.content.push_str(&content);
        } else {
            let index = chunks.len();
            chunks.push(Chunk { title, content, index });
        }
    }

    chunks
}
