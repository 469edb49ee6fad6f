use std::collections::HashMap;

use crate::{BufferError, NetBuf};

/// A side index from `(category_tag, type_code)` to the ordered byte offsets
/// at which objects of that kind start within a [`NetBuf`].
///
/// Built once over a byte range by [`fill_tlp_list`] and consumed
/// immediately — typically within the same serialise/verify call that built
/// it. A list stamps the buffer's generation at build time and every lookup
/// re-checks it; once the buffer has been mutated again the list refuses to
/// answer rather than silently returning stale offsets.
#[derive(Debug, Clone)]
pub struct TlpList {
    built_generation: u64,
    offsets: HashMap<(u8, u16), Vec<usize>>,
}

impl TlpList {
    /// Look up the offsets recorded for `(category, type_code)`, or an
    /// empty slice if none were seen. Fails if `buf` has mutated since this
    /// list was built.
    pub fn get<'a>(&'a self, buf: &NetBuf, category: u8, type_code: u16) -> Result<&'a [usize], BufferError> {
        self.check_fresh(buf)?;
        Ok(self.offsets.get(&(category, type_code)).map_or(&[][..], Vec::as_slice))
    }

    /// All `(category, type_code, offset)` triples recorded, in the order
    /// objects were scanned (ascending offset within each bucket, buckets
    /// unordered).
    pub fn iter_all(&self, buf: &NetBuf) -> Result<impl Iterator<Item = (u8, u16, usize)> + '_, BufferError> {
        self.check_fresh(buf)?;
        Ok(self
            .offsets
            .iter()
            .flat_map(|(&(cat, ty), offs)| offs.iter().map(move |&o| (cat, ty, o))))
    }

    fn check_fresh(&self, buf: &NetBuf) -> Result<(), BufferError> {
        if buf.generation() != self.built_generation {
            return Err(BufferError::StaleTlpList { built: self.built_generation, now: buf.generation() });
        }
        Ok(())
    }
}

/// Walk `[start, end)` of `buf` object by object, recording the offset of
/// each object's header under `(category, type_code)`.
///
/// `header_len_fn` receives the raw 4-byte header word (peeked, not
/// consumed) and returns the *total* span of the object including header
/// and any tail padding; the scan advances by exactly that many bytes, so
/// an incorrect length here desynchronises the rest of the walk the same
/// way it would on the wire. `category_fn`/`type_fn` extract the dispatch
/// key from the same header word.
pub fn fill_tlp_list(
    buf: &NetBuf,
    start: usize,
    end: usize,
    header_len_fn: impl Fn(u32) -> usize,
    category_fn: impl Fn(u32) -> u8,
    type_fn: impl Fn(u32) -> u16,
) -> Result<TlpList, BufferError> {
    let mut offsets: HashMap<(u8, u16), Vec<usize>> = HashMap::new();
    let mut pos = start;
    while pos < end {
        let header = buf.peek_u32_at(pos)?;
        let span = header_len_fn(header);
        if span == 0 {
            break;
        }
        let category = category_fn(header);
        let type_code = type_fn(header);
        offsets.entry((category, type_code)).or_default().push(pos);
        pos += span;
    }
    Ok(TlpList { built_generation: buf.generation(), offsets })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(category: u8, type_code: u16, span: u16) -> u32 {
        (u32::from(category) << 28) | (u32::from(type_code) << 12) | u32::from(span)
    }

    #[test]
    fn scans_consecutive_objects() {
        let mut buf = NetBuf::new(16);
        buf.write_u32(header(0, 10, 4)).unwrap();
        buf.write_u32(header(0, 11, 8)).unwrap();
        buf.write_u32(0).unwrap();
        buf.write_u32(header(1, 10, 4)).unwrap();

        let list = fill_tlp_list(
            &buf,
            0,
            16,
            |h| (h & 0xFFF) as usize,
            |h| (h >> 28) as u8,
            |h| ((h >> 12) & 0xFFFF) as u16,
        )
        .unwrap();

        assert_eq!(list.get(&buf, 0, 10).unwrap(), &[0]);
        assert_eq!(list.get(&buf, 0, 11).unwrap(), &[4]);
        assert_eq!(list.get(&buf, 1, 10).unwrap(), &[12]);
        assert!(list.get(&buf, 9, 9).unwrap().is_empty());
    }

    #[test]
    fn stale_list_refuses_lookup() {
        let mut buf = NetBuf::new(8);
        buf.write_u32(header(0, 1, 4)).unwrap();
        buf.write_u32(header(0, 2, 4)).unwrap();
        let list =
            fill_tlp_list(&buf, 0, 8, |h| (h & 0xFFF) as usize, |h| (h >> 28) as u8, |h| ((h >> 12) & 0xFFFF) as u16)
                .unwrap();
        buf.set_position(0).unwrap();
        buf.write_u8(0xAB).unwrap();
        assert!(matches!(list.get(&buf, 0, 1), Err(BufferError::StaleTlpList { .. })));
    }
}
