//! Unit tests for range splitting and chunk walking

use registry_pull::range::{Chunk, Direction, Range, RangeError};

#[test]
fn test_split_is_an_exact_cover() {
    let range = Range::new(901000001, 901002501);
    let chunks = range.split(500).unwrap();

    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[0].start(), range.start());
    assert_eq!(chunks[4].end(), range.end());
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start());
    }
    let covered: u64 = chunks.iter().map(Chunk::len).sum();
    assert_eq!(covered, range.len());
}

#[test]
fn test_split_is_deterministic() {
    let range = Range::new(901000001, 901000734);
    assert_eq!(range.split(100).unwrap(), range.split(100).unwrap());
}

#[test]
fn test_last_chunk_may_be_short() {
    let chunks = Range::new(1, 12).split(5).unwrap();
    let sizes: Vec<u64> = chunks.iter().map(Chunk::len).collect();
    assert_eq!(sizes, vec![5, 5, 1]);
    assert_eq!(chunks.iter().map(Chunk::id).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_descending_split() {
    let range = Range::new(901000100, 901000000);
    assert_eq!(range.direction(), Direction::Descending);

    let chunks = range.split(40).unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!((chunks[0].start(), chunks[0].end()), (901000100, 901000060));
    assert_eq!((chunks[2].start(), chunks[2].end()), (901000020, 901000000));

    let ids: Vec<i64> = chunks[2].ids().collect();
    assert_eq!(ids.first(), Some(&901000020));
    assert_eq!(ids.last(), Some(&901000001));
}

#[test]
fn test_invalid_splits() {
    assert_eq!(
        Range::new(1, 10).split(0),
        Err(RangeError::ZeroChunkSize)
    );
    assert!(matches!(
        Range::new(5, 5).split(10),
        Err(RangeError::Empty { start: 5, end: 5 })
    ));
}

#[test]
fn test_walk_from_cursor() {
    let chunk = Chunk::new(0, 901000001, 901000101);
    assert_eq!(chunk.ids_from(901000050).len(), 51);
    assert_eq!(chunk.ids_from(chunk.end()).count(), 0);
    assert_eq!(chunk.processed_at(901000050), 49);
    assert!(chunk.is_valid_cursor(chunk.end()));
    assert!(!chunk.is_valid_cursor(901000101 + 1));
}
