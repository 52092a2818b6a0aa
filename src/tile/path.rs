//! Tile Path Encoding (C2SP tlog-tiles)
//!
//! `tile_index_segment` is a pure function, built once per path and never
//! parsed back (Design Note "tile path is write-only"): nothing in this
//! crate recovers a tile index from a path string.

/// Encode a tile index as zero-padded 3-digit segments separated by `/`,
/// with every segment but the last prefixed with `x` — e.g. `7` → `"007"`,
/// `1234` → `"x001/234"`.
pub fn tile_index_segment(index: u64) -> String {
    let mut groups = Vec::new();
    let mut rem = index;
    loop {
        groups.push(format!("{:03}", rem % 1000));
        rem /= 1000;
        if rem == 0 {
            break;
        }
    }
    groups.reverse();
    let last = groups.pop().expect("at least one group");
    let mut parts: Vec<String> = groups.iter().map(|g| format!("x{g}")).collect();
    parts.push(last);
    parts.join("/")
}

/// Full path for a hash tile at `level`/`index`, optionally partial with
/// width `1..=255`.
pub fn hash_tile_path(level: u32, index: u64, partial_width: Option<u8>) -> String {
    let base = format!("tile/{level}/{}", tile_index_segment(index));
    match partial_width {
        Some(w) => format!("{base}.p/{w}"),
        None => base,
    }
}

/// Full path for an entry tile at `index`, optionally partial.
pub fn entry_tile_path(index: u64, partial_width: Option<u8>) -> String {
    let base = format!("tile/entries/{}", tile_index_segment(index));
    match partial_width {
        Some(w) => format!("{base}.p/{w}"),
        None => base,
    }
}
