use super::*;

fn document(text: &str) -> Document {
    Document {
        source: "test.txt".to_string(),
        text: text.to_string(),
    }
}

/// Deterministic, non-repeating text of exactly `len` characters
fn sample_text(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + u8::try_from(i % 26).expect("fits in u8")))
        .collect()
}

#[test]
fn empty_document_yields_no_chunks() {
    let doc = document("");
    let config = ChunkingConfig::default();

    assert_eq!(chunk_document(&doc, &config).count(), 0);
}

#[test]
fn short_document_yields_single_chunk() {
    let doc = document("A short note about the topic.");
    let config = ChunkingConfig::default();

    let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, doc.text);
    assert_eq!(chunks[0].source, "test.txt");
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].char_offset, 0);
}

#[test]
fn document_of_exactly_chunk_size_is_one_chunk() {
    let doc = document(&sample_text(1000));
    let config = ChunkingConfig::default();

    assert_eq!(chunk_document(&doc, &config).count(), 1);
}

#[test]
fn twenty_five_hundred_characters_make_three_chunks() {
    let doc = document(&sample_text(2500));
    let config = ChunkingConfig::default();

    let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].char_offset, 0);
    assert_eq!(chunks[1].char_offset, 800);
    assert_eq!(chunks[2].char_offset, 1600);
    assert_eq!(chunks[2].text.chars().count(), 900);
}

#[test]
fn chunk_count_matches_formula() {
    let configs = [
        ChunkingConfig::default(),
        ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 3,
        },
        ChunkingConfig {
            chunk_size: 7,
            chunk_overlap: 0,
        },
        ChunkingConfig {
            chunk_size: 5,
            chunk_overlap: 4,
        },
    ];

    for config in configs {
        for len in 1..=2 * config.chunk_size + 13 {
            let doc = document(&sample_text(len));
            let count = chunk_document(&doc, &config).count();

            let c = config.chunk_size;
            let o = config.chunk_overlap;
            let expected = if len <= c {
                1
            } else {
                (len - o).div_ceil(c - o)
            };

            assert_eq!(count, expected, "len {} with {:?}", len, config);
            assert_eq!(count, config.expected_chunk_count(len));
        }
    }
}

#[test]
fn chunks_respect_size_and_overlap() {
    let doc = document(&sample_text(3333));
    let config = ChunkingConfig::default();

    let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();

    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= config.chunk_size);
    }

    for pair in chunks.windows(2) {
        let previous: Vec<char> = pair[0].text.chars().collect();
        let tail: String = previous[previous.len() - config.chunk_overlap..]
            .iter()
            .collect();
        let head: String = pair[1].text.chars().take(config.chunk_overlap).collect();
        assert_eq!(tail, head);
        assert_eq!(pair[1].chunk_index, pair[0].chunk_index + 1);
    }
}

#[test]
fn reassembly_reconstructs_document() {
    let config = ChunkingConfig {
        chunk_size: 40,
        chunk_overlap: 15,
    };

    for len in [1, 39, 40, 41, 64, 65, 66, 500] {
        let doc = document(&sample_text(len));
        let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();
        assert_eq!(reassemble(&chunks, &config), doc.text, "len {}", len);
    }
}

#[test]
fn multibyte_text_is_split_on_char_boundaries() {
    let text = "héllo wörld ünïcödé 日本語のテキスト ".repeat(20);
    let doc = document(&text);
    let config = ChunkingConfig {
        chunk_size: 25,
        chunk_overlap: 5,
    };

    let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();

    assert_eq!(chunks.len(), config.expected_chunk_count(text.chars().count()));
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 25);
    }
    assert_eq!(reassemble(&chunks, &config), text);
}

#[test]
fn iterator_is_restartable() {
    let doc = document(&sample_text(2500));
    let config = ChunkingConfig::default();

    let mut chunks = chunk_document(&doc, &config);
    let first = chunks.next().expect("has a first chunk");
    let restarted = chunks.clone();

    let rest: Vec<Chunk> = chunks.collect();
    let again: Vec<Chunk> = restarted.collect();
    assert_eq!(rest, again);

    let from_scratch: Vec<Chunk> = chunk_document(&doc, &config).collect();
    assert_eq!(from_scratch[0], first);
    assert_eq!(&from_scratch[1..], rest.as_slice());
}

#[test]
fn chunk_documents_keeps_sources_apart() {
    let documents = vec![
        Document {
            source: "a.txt".to_string(),
            text: sample_text(1500),
        },
        Document {
            source: "b.txt".to_string(),
            text: sample_text(300),
        },
    ];
    let config = ChunkingConfig::default();

    let chunks = chunk_documents(&documents, &config);

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].source, "a.txt");
    assert_eq!(chunks[1].source, "a.txt");
    assert_eq!(chunks[2].source, "b.txt");
    assert_eq!(chunks[2].chunk_index, 0);
    assert_eq!(chunks[2].char_offset, 0);
}

#[test]
fn overlap_not_smaller_than_size_still_terminates() {
    let doc = document(&sample_text(12));
    let config = ChunkingConfig {
        chunk_size: 4,
        chunk_overlap: 9,
    };

    let chunks: Vec<Chunk> = chunk_document(&doc, &config).collect();
    assert_eq!(chunks.len(), 9);
}
