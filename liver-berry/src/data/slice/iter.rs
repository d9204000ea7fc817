use crate::Idx2d;

/// 行优先索引迭代器.
///
/// 与 `(0..h).flat_map(|i| (0..w).map(move |j| (i, j)))` 等价,
/// 但占用的空间更小.
#[derive(Debug)]
pub(crate) struct PosIter {
    cur_h: usize,
    cur_w: usize,
    h: usize,
    w: usize,
}

impl PosIter {
    #[inline]
    pub(crate) fn new((h, w): Idx2d) -> Self {
        Self {
            cur_h: 0,
            cur_w: 0,
            h,
            w,
        }
    }
}

impl Iterator for PosIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        if self.h == 0 || self.w == 0 || self.cur_h == self.h {
            return None;
        }
        let ret_pos = (self.cur_h, self.cur_w);
        if self.cur_w + 1 == self.w {
            self.cur_w = 0;
            self.cur_h += 1;
        } else {
            self.cur_w += 1;
        }
        Some(ret_pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.h == 0 || self.w == 0 {
            0
        } else {
            (self.h - self.cur_h) * self.w - self.cur_w
        };
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::PosIter;
    use crate::Idx2d;

    fn pos_iter_builtin((h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
        (0..h).flat_map(move |first| (0..w).map(move |second| (first, second)))
    }

    #[test]
    fn test_pos_iter_matches_nested_ranges() {
        for i in 0..=4 {
            for j in 0..=4 {
                let tup = (i, j);
                assert!(Iterator::eq(pos_iter_builtin(tup), PosIter::new(tup)));
            }
        }
    }

    #[test]
    fn test_pos_iter_size_hint() {
        let mut it = PosIter::new((2, 3));
        assert_eq!(it.size_hint(), (6, Some(6)));
        it.next();
        it.next();
        it.next();
        assert_eq!(it.size_hint(), (3, Some(3)));
        assert_eq!(PosIter::new((0, 5)).size_hint(), (0, Some(0)));
    }
}
