#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 900,
            overlap_chars: 150,
        }
    }
}

pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let cleaned = text.replace("\r\n", "\n");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Vec::new();
    }

    let max_chars = config.max_chars.max(1);
    // overlap must stay below the window size or the cursor stops advancing
    let overlap = config.overlap_chars.min(max_chars - 1);

    let chars: Vec<char> = cleaned.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap);
    }

    chunks
}
