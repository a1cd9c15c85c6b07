//! Expands keyword × locality terms into an ordered work list and partitions
//! it into contiguous per-worker chunks.

use leadharvest_common::Query;

/// Cross product of localities × keywords, locality-major, matching the order
/// queries were issued historically.
pub fn expand(keywords: &[String], localities: &[String]) -> Vec<Query> {
    let mut queries = Vec::with_capacity(keywords.len() * localities.len().max(1));
    if localities.is_empty() {
        for keyword in keywords {
            queries.push(Query::new(keyword));
        }
        return queries;
    }
    for locality in localities {
        for keyword in keywords {
            queries.push(Query::with_locality(keyword, locality));
        }
    }
    queries
}

/// Partition `queries` into exactly `workers` contiguous chunks of size
/// `ceil(len / workers)`. Every query lands in exactly one chunk with order
/// preserved; trailing chunks may be empty when there are fewer queries than
/// workers.
pub fn chunk(queries: Vec<Query>, workers: usize) -> Vec<Vec<Query>> {
    let workers = workers.max(1);
    let chunk_size = queries.len().div_ceil(workers).max(1);

    let mut chunks: Vec<Vec<Query>> = queries
        .chunks(chunk_size)
        .map(|c| c.to_vec())
        .collect();
    chunks.resize_with(workers, Vec::new);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queries(n: usize) -> Vec<Query> {
        (0..n).map(|i| Query::new(&format!("q{i}"))).collect()
    }

    #[test]
    fn expand_is_locality_major() {
        let keywords = vec!["MRF dealer".to_string(), "MRF tyre dealer".to_string()];
        let localities = vec!["Jaipur".to_string(), "Kota".to_string()];

        let out = expand(&keywords, &localities);
        let terms: Vec<String> = out.iter().map(Query::term).collect();
        assert_eq!(
            terms,
            vec![
                "MRF dealer Jaipur",
                "MRF tyre dealer Jaipur",
                "MRF dealer Kota",
                "MRF tyre dealer Kota",
            ]
        );
    }

    #[test]
    fn chunking_is_a_total_partition() {
        for (len, workers) in [(10, 3), (9, 3), (1, 4), (0, 2), (7, 1), (5, 5)] {
            let original = queries(len);
            let chunks = chunk(original.clone(), workers);

            assert_eq!(chunks.len(), workers);
            let flattened: Vec<Query> = chunks.into_iter().flatten().collect();
            assert_eq!(flattened, original, "len={len} workers={workers}");
        }
    }

    #[test]
    fn fewer_queries_than_workers_leaves_trailing_chunks_empty() {
        let chunks = chunk(queries(2), 5);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[1].len(), 1);
        assert!(chunks[2..].iter().all(Vec::is_empty));
    }

    #[test]
    fn chunk_sizes_are_ceiling_divided() {
        let chunks = chunk(queries(10), 3);
        assert_eq!(chunks[0].len(), 4);
        assert_eq!(chunks[1].len(), 4);
        assert_eq!(chunks[2].len(), 2);
    }
}
