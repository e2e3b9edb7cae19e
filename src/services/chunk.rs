//! Batch chunker: splits an entity or id list into bounded-size chunks for
//! queue messages and Graph batch requests.

/// Splits `items` into chunks of at most `chunk_size`, preserving order.
/// The last chunk may be shorter. Callers guarantee a positive chunk size
/// (settings validation rejects a zero batch limit).
pub fn split_list<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size.max(1)));
    let mut current = Vec::new();

    for item in items {
        current.push(item);
        if current.len() >= chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_exact_multiple() {
        let chunks = split_list(vec![1, 2, 3, 4], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn test_split_with_remainder() {
        let chunks = split_list(vec![1, 2, 3, 4, 5], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_split_chunk_larger_than_input() {
        let chunks = split_list(vec![1, 2], 10);
        assert_eq!(chunks, vec![vec![1, 2]]);
    }

    #[test]
    fn test_split_empty() {
        let chunks: Vec<Vec<i32>> = split_list(vec![], 3);
        assert!(chunks.is_empty());
    }

    proptest! {
        #[test]
        fn prop_split_preserves_order_and_bounds(
            items in proptest::collection::vec(any::<u32>(), 0..200),
            chunk_size in 1usize..50,
        ) {
            let chunks = split_list(items.clone(), chunk_size);

            // Every chunk respects the bound and only the last may be short
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.len() <= chunk_size);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.len(), chunk_size);
                }
            }

            // Flattening restores the input exactly
            let flattened: Vec<u32> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
