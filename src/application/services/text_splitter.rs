use std::collections::VecDeque;

use crate::domain::DomainError;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter: tries paragraph, line and word boundaries in turn,
/// then merges pieces into chunks of at most `chunk_size` characters that overlap by
/// up to `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DomainError> {
        if chunk_size == 0 {
            return Err(DomainError::validation("chunk size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DomainError::validation(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>| {
                if window.is_empty() {
                    0
                } else {
                    separator_len
                }
            };

            if total + len + joined_len(&window) > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joined_len(&window) > self.chunk_size)
                {
                    let Some(first) = window.front() else { break };
                    let removed =
                        char_len(first) + if window.len() > 1 { separator_len } else { 0 };
                    total = total.saturating_sub(removed);
                    window.pop_front();
                }
            }

            total += len + joined_len(&window);
            window.push_back(piece);
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (idx, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (*separator, &separators[idx + 1..]);
        }
    }
    ("", &[])
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|i| format!("word{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = TextSplitter::default().split("Rolls over at 4 months.");
        assert_eq!(chunks, vec!["Rolls over at 4 months."]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(TextSplitter::default().split(" \n\n ").is_empty());
    }

    #[test]
    fn chunks_respect_size_and_cover_all_words() {
        let text = words(400);
        let splitter = TextSplitter::new(200, 40).unwrap();
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 200));
        for word in text.split(' ') {
            assert!(chunks.iter().any(|chunk| chunk.contains(word)), "{word} missing");
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = TextSplitter::new(100, 30).unwrap();
        let chunks = splitter.split(&words(60));
        for pair in chunks.windows(2) {
            let last_word = pair[0].rsplit(' ').next().unwrap();
            assert!(pair[1].contains(last_word), "no overlap between {pair:?}");
        }
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = TextSplitter::new(100, 10).unwrap().split(&text);
        assert_eq!(chunks, vec!["a".repeat(60), "b".repeat(60)]);
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let chunks = TextSplitter::new(50, 0).unwrap().split(&"x".repeat(120));
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![50, 50, 20]);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
