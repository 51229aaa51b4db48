/// One stripe touched by a transfer: the stripe id, the offset of the
/// transfer inside the stripe, and the byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeInfo {
    pub id: u64,
    pub off: u64,
    pub len: u64,
}

/// Split a transfer at `(off, len)` into per-stripe pieces. Only the
/// first stripe can start at a non-zero intra-stripe offset and only
/// the last can end short of the stripe size.
pub fn stripe_layout(stripe_size: u64, off: u64, len: u64) -> Vec<StripeInfo> {
    if len == 0 {
        return Vec::new();
    }

    let first_id = off / stripe_size;
    let last_id = (off + len - 1) / stripe_size;
    let count = (last_id - first_id + 1) as usize;

    let mut stripes = Vec::with_capacity(count);
    let first_off = off % stripe_size;
    stripes.push(StripeInfo {
        id: first_id,
        off: first_off,
        len: if count == 1 {
            len
        } else {
            stripe_size - first_off
        },
    });

    for id in first_id + 1..last_id {
        stripes.push(StripeInfo {
            id,
            off: 0,
            len: stripe_size,
        });
    }

    if count > 1 {
        stripes.push(StripeInfo {
            id: last_id,
            off: 0,
            len: (off + len - 1) % stripe_size + 1,
        });
    }

    stripes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64, off: u64, len: u64) -> StripeInfo {
        StripeInfo { id, off, len }
    }

    #[test]
    fn test_single_stripe() {
        // all in one stripe, starting at 0
        assert_eq!(stripe_layout(1024, 0, 500), vec![info(0, 0, 500)]);
        // all in one stripe, starting at 500
        assert_eq!(stripe_layout(1024, 500, 500), vec![info(0, 500, 500)]);
        // taking exactly one stripe
        assert_eq!(stripe_layout(1024, 0, 1024), vec![info(0, 0, 1024)]);
    }

    #[test]
    fn test_stripe_boundaries() {
        // one stripe + 1 byte
        assert_eq!(
            stripe_layout(1024, 0, 1025),
            vec![info(0, 0, 1024), info(1, 0, 1)]
        );
        // exactly two stripes
        assert_eq!(
            stripe_layout(1024, 0, 2048),
            vec![info(0, 0, 1024), info(1, 0, 1024)]
        );
        // spanning two stripes
        assert_eq!(
            stripe_layout(1024, 500, 1000),
            vec![info(0, 500, 524), info(1, 0, 476)]
        );
        // starting on the second stripe, one byte on the fourth
        assert_eq!(
            stripe_layout(1024, 1024, 2049),
            vec![info(1, 0, 1024), info(2, 0, 1024), info(3, 0, 1)]
        );
    }

    #[test]
    fn test_empty_transfer() {
        assert!(stripe_layout(1024, 0, 0).is_empty());
        assert!(stripe_layout(1024, 4096, 0).is_empty());
    }

    #[test]
    fn test_layout_invariants() {
        for stripe_size in [1, 7, 100, 1000, 4096] {
            for off in [0, 1, 99, 100, 101, 999, 5000] {
                for len in [1, 2, 99, 100, 101, 1000, 10_000] {
                    let stripes = stripe_layout(stripe_size, off, len);

                    let total: u64 = stripes.iter().map(|s| s.len).sum();
                    assert_eq!(total, len);

                    assert_eq!(stripes[0].off, off % stripe_size);
                    for (i, s) in stripes.iter().enumerate() {
                        assert_eq!(s.id, stripes[0].id + i as u64);
                        assert!(s.off + s.len <= stripe_size);
                        if i > 0 {
                            assert_eq!(s.off, 0);
                        }
                    }
                    if stripes.len() > 1 {
                        let last = stripes[stripes.len() - 1];
                        assert_eq!(last.len, (off + len - 1) % stripe_size + 1);
                    }
                }
            }
        }
    }
}
