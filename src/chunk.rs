//! Fixed-size batching for provider calls with a per-call account limit.

/// Hard provider limit on accounts per create/delete call.
pub const MEMBER_BATCH_LIMIT: usize = 50;

/// Lazy iterator over consecutive groups of at most `size` items.
///
/// The final group may be shorter; the source is consumed exactly once.
pub struct Chunked<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Chunked<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let group: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        (!group.is_empty()).then_some(group)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (
            lower.div_ceil(self.size),
            upper.map(|upper| upper.div_ceil(self.size)),
        )
    }
}

/// Split `items` into groups of `size`; a zero size is treated as one.
pub fn chunked<I: IntoIterator>(items: I, size: usize) -> Chunked<I::IntoIter> {
    Chunked {
        inner: items.into_iter(),
        size: size.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_preserve_order_and_reconstruct_input() {
        let items: Vec<u32> = (0..7).collect();
        let groups: Vec<Vec<u32>> = chunked(items.clone(), 3).collect();
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        let flat: Vec<u32> = groups.into_iter().flatten().collect();
        assert_eq!(flat, items);
    }

    #[test]
    fn group_count_is_ceiling_of_len_over_size() {
        for (len, size) in [(0usize, 5usize), (1, 5), (5, 5), (6, 5), (100, 50), (101, 50)] {
            let groups: Vec<Vec<usize>> = chunked(0..len, size).collect();
            assert_eq!(groups.len(), len.div_ceil(size), "len={len} size={size}");
            if let Some((last, full)) = groups.split_last() {
                assert!(full.iter().all(|group| group.len() == size));
                assert!(!last.is_empty() && last.len() <= size);
            }
        }
    }

    #[test]
    fn sixty_accounts_split_into_fifty_and_ten() {
        let sizes: Vec<usize> = chunked(0..60, MEMBER_BATCH_LIMIT)
            .map(|group| group.len())
            .collect();
        assert_eq!(sizes, vec![50, 10]);
    }

    #[test]
    fn source_is_pulled_lazily() {
        let mut pulled = 0;
        let source = std::iter::from_fn(|| {
            pulled += 1;
            Some(pulled)
        });
        let first = chunked(source, 4).next();
        assert_eq!(first, Some(vec![1, 2, 3, 4]));
        assert_eq!(pulled, 4);
    }

    #[test]
    fn zero_size_behaves_like_one() {
        let groups: Vec<Vec<char>> = chunked(['a', 'b'], 0).collect();
        assert_eq!(groups, vec![vec!['a'], vec!['b']]);
    }
}
