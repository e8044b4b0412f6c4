//! Disk image format conversion (§4.H "Format conversion", §6).
//!
//! DSK/DO/PO/NIB/WOZ → the internal BDSK bitstream container, plus the
//! reverse (BDSK → DSK) used by the §8 round-trip property. The DOS/ProDOS
//! sector interleave tables and the 6-and-2 GCR encode/decode tables are
//! carried over verbatim from the teacher's `a2rs/src/disk.rs`
//! (`DOS_SECTOR_ORDER`, `PRODOS_SECTOR_ORDER`, `WRITE_TABLE`,
//! `encode_6and2`); the NIB/WOZ paths and the BDSK container itself are new,
//! grounded on §6's literal byte layouts.

use crate::error::{MiiError, Result};
use super::track::{SectorEntry, SectorMap, Track, MAX_TRACK_BYTES};
use super::drive::PHYSICAL_TRACKS;

pub const SECTORS_PER_TRACK: usize = 16;
pub const BYTES_PER_SECTOR: usize = 256;
pub const BYTES_PER_DSK_TRACK: usize = SECTORS_PER_TRACK * BYTES_PER_SECTOR;
pub const DSK_SIZE: usize = PHYSICAL_TRACKS * BYTES_PER_DSK_TRACK;
pub const NIB_TRACK_SIZE: usize = MAX_TRACK_BYTES;
pub const NIB_SIZE: usize = PHYSICAL_TRACKS * NIB_TRACK_SIZE;

pub const DOS_SECTOR_ORDER: [usize; 16] =
    [0, 7, 14, 6, 13, 5, 12, 4, 11, 3, 10, 2, 9, 1, 8, 15];
pub const PRODOS_SECTOR_ORDER: [usize; 16] =
    [0, 8, 1, 9, 2, 10, 3, 11, 4, 12, 5, 13, 6, 14, 7, 15];

const WRITE_TABLE: [u8; 64] = [
    0x96, 0x97, 0x9A, 0x9B, 0x9D, 0x9E, 0x9F, 0xA6,
    0xA7, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, 0xB2, 0xB3,
    0xB4, 0xB5, 0xB6, 0xB7, 0xB9, 0xBA, 0xBB, 0xBC,
    0xBD, 0xBE, 0xBF, 0xCB, 0xCD, 0xCE, 0xCF, 0xD3,
    0xD6, 0xD7, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE,
    0xDF, 0xE5, 0xE6, 0xE7, 0xE9, 0xEA, 0xEB, 0xEC,
    0xED, 0xEE, 0xEF, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6,
    0xF7, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF,
];

fn decode_table() -> [u8; 256] {
    let mut t = [0u8; 256];
    for (i, &code) in WRITE_TABLE.iter().enumerate() {
        t[code as usize] = i as u8;
    }
    t
}

/// §6 sector map selection: files ending `.po`/`.PO` use the ProDOS
/// interleave, everything else DOS 3.3.
pub fn sector_order_for_path(path: &str) -> &'static [usize; 16] {
    if path.to_ascii_lowercase().ends_with(".po") {
        &PRODOS_SECTOR_ORDER
    } else {
        &DOS_SECTOR_ORDER
    }
}

/// 6-and-2 GCR encode of one 256-byte sector, producing 343 nibbles
/// (86 auxiliary + 256 main + 1 checksum), verbatim from the teacher's
/// `Disk2InterfaceCard::encode_6and2`.
fn encode_6and2(data: &[u8; BYTES_PER_SECTOR]) -> Vec<u8> {
    let mut aux = [0u8; 86];
    let mut nib = [0u8; 256];
    let mut result = Vec::with_capacity(343);

    for i in 0..86 {
        let a = ((data[i] & 0x01) << 1) | ((data[i] & 0x02) >> 1);
        let b = if i + 86 < 256 {
            ((data[i + 86] & 0x01) << 3) | ((data[i + 86] & 0x02) << 1)
        } else {
            0
        };
        let c = if i + 172 < 256 {
            ((data[i + 172] & 0x01) << 5) | ((data[i + 172] & 0x02) << 3)
        } else {
            0
        };
        aux[85 - i] = a | b | c;
    }
    for i in 0..256 {
        nib[i] = data[i] >> 2;
    }

    let mut checksum = 0u8;
    for i in (0..86).rev() {
        let val = aux[i];
        result.push(WRITE_TABLE[(val ^ checksum) as usize & 0x3F]);
        checksum = val;
    }
    for &val in nib.iter() {
        result.push(WRITE_TABLE[(val ^ checksum) as usize & 0x3F]);
        checksum = val;
    }
    result.push(WRITE_TABLE[checksum as usize & 0x3F]);
    result
}

/// Inverse of `encode_6and2`: 343 nibbles back to 256 data bytes.
fn decode_6and2(encoded: &[u8]) -> Option<[u8; BYTES_PER_SECTOR]> {
    if encoded.len() < 343 {
        return None;
    }
    let table = decode_table();
    let mut aux = [0u8; 86];
    let mut data = [0u8; 256];
    let mut prev = 0u8;
    for i in 0..86 {
        let code = encoded[i];
        if code < 0x96 {
            return None;
        }
        let val = table[code as usize];
        aux[i] = val ^ prev;
        prev = aux[i];
    }
    for i in 0..256 {
        let code = encoded[86 + i];
        if code < 0x96 {
            return None;
        }
        let val = table[code as usize];
        data[i] = val ^ prev;
        prev = data[i];
    }
    for i in 0..256 {
        let aux_idx = i % 86;
        let bit_pos = i / 86;
        let aux_bits = (aux[aux_idx] >> (bit_pos * 2)) & 0x03;
        data[i] = (data[i] << 2) | aux_bits;
    }
    Some(data)
}

/// §4.H "DSK / DO / PO" track encode: one physical track's worth of 16
/// sectors written as `D5 AA 96` address field / `D5 AA AD` data field with
/// the documented sync gaps.
pub fn dsk_track_to_bdsk(dsk_track: &[u8], track_num: u8, sector_order: &[usize; 16]) -> Track {
    let mut buf = [0u8; NIB_TRACK_SIZE];
    let mut pos = 0usize;
    let volume = 254u8;

    let mut push = |buf: &mut [u8; NIB_TRACK_SIZE], pos: &mut usize, b: u8| {
        if *pos < NIB_TRACK_SIZE {
            buf[*pos] = b;
            *pos += 1;
        }
    };

    for _ in 0..48 {
        push(&mut buf, &mut pos, 0xFF);
    }

    for logical_sector in 0..SECTORS_PER_TRACK {
        let phys_sector = sector_order[logical_sector];
        let offset = phys_sector * BYTES_PER_SECTOR;
        let sector_data: [u8; BYTES_PER_SECTOR] =
            dsk_track[offset..offset + BYTES_PER_SECTOR].try_into().unwrap();

        push(&mut buf, &mut pos, 0xD5);
        push(&mut buf, &mut pos, 0xAA);
        push(&mut buf, &mut pos, 0x96);
        push(&mut buf, &mut pos, (volume >> 1) | 0xAA);
        push(&mut buf, &mut pos, volume | 0xAA);
        push(&mut buf, &mut pos, (track_num >> 1) | 0xAA);
        push(&mut buf, &mut pos, track_num | 0xAA);
        let s = logical_sector as u8;
        push(&mut buf, &mut pos, (s >> 1) | 0xAA);
        push(&mut buf, &mut pos, s | 0xAA);
        let checksum = volume ^ track_num ^ s;
        push(&mut buf, &mut pos, (checksum >> 1) | 0xAA);
        push(&mut buf, &mut pos, checksum | 0xAA);
        push(&mut buf, &mut pos, 0xDE);
        push(&mut buf, &mut pos, 0xAA);
        push(&mut buf, &mut pos, 0xEB);
        for _ in 0..6 {
            push(&mut buf, &mut pos, 0xFF);
        }

        push(&mut buf, &mut pos, 0xD5);
        push(&mut buf, &mut pos, 0xAA);
        push(&mut buf, &mut pos, 0xAD);
        for byte in encode_6and2(&sector_data) {
            push(&mut buf, &mut pos, byte);
        }
        push(&mut buf, &mut pos, 0xDE);
        push(&mut buf, &mut pos, 0xAA);
        push(&mut buf, &mut pos, 0xEB);
        for _ in 0..27 {
            push(&mut buf, &mut pos, 0xFF);
        }
    }

    let mut track = Track::from_bits(buf, (NIB_TRACK_SIZE * 8) as u32);
    track.map = Some(scan_sector_map(track.bytes(), Some(track_num)));
    track
}

/// Scans a nibble track for `D5 AA 96` address fields and records each
/// sector's byte position (used to build §3 `sector_map`).
fn scan_sector_map(track: &[u8; NIB_TRACK_SIZE], _track_num: Option<u8>) -> SectorMap {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + 10 < NIB_TRACK_SIZE {
        if track[pos] == 0xD5 && track[pos + 1] == 0xAA && track[pos + 2] == 0x96 {
            let sector_odd = track[pos + 5];
            let sector_even = track[pos + 6];
            let sector = ((sector_odd & 0x55) << 1) | (sector_even & 0x55);
            entries.push(SectorEntry {
                sector,
                bit_position: (pos as u32) * 8,
                dsk_byte_offset: None,
            });
            pos += 11;
        } else {
            pos += 1;
        }
    }
    SectorMap { entries }
}

/// Decodes one BDSK track's GCR stream back into 16 logical sectors,
/// reordering via `sector_order` (§8 round-trip property).
pub fn bdsk_track_to_dsk(track: &Track, sector_order: &[usize; 16]) -> Result<[u8; BYTES_PER_DSK_TRACK]> {
    let bytes = track.bytes();
    let mut out = [0u8; BYTES_PER_DSK_TRACK];
    let mut found = [false; SECTORS_PER_TRACK];

    let mut pos = 0usize;
    while pos + 10 < NIB_TRACK_SIZE {
        if bytes[pos] == 0xD5 && bytes[pos + 1] == 0xAA && bytes[pos + 2] == 0x96 {
            let sector_odd = bytes[pos + 5];
            let sector_even = bytes[pos + 6];
            let logical_sector = (((sector_odd & 0x55) << 1) | (sector_even & 0x55)) as usize;

            let mut data_pos = pos + 11;
            while data_pos + 350 < NIB_TRACK_SIZE {
                if bytes[data_pos] == 0xD5 && bytes[data_pos + 1] == 0xAA && bytes[data_pos + 2] == 0xAD
                {
                    if let Some(data) = decode_6and2(&bytes[data_pos + 3..]) {
                        if logical_sector < SECTORS_PER_TRACK {
                            let phys = sector_order[logical_sector];
                            out[phys * BYTES_PER_SECTOR..(phys + 1) * BYTES_PER_SECTOR]
                                .copy_from_slice(&data);
                            found[logical_sector] = true;
                        }
                    }
                    break;
                }
                data_pos += 1;
            }
            pos = data_pos;
        } else {
            pos += 1;
        }
    }

    if found.iter().any(|&f| !f) {
        return Err(MiiError::ImageFormat {
            path: String::new(),
            reason: "track incomplete: not all 16 sectors found".into(),
        });
    }
    Ok(out)
}

/// NIB: raw nibble stream, already the track's on-media bytes. §4.H notes
/// incomplete tracks are reported but still converted.
pub fn nib_track_to_bdsk(nib_track: &[u8]) -> (Track, bool) {
    let mut buf = [0u8; NIB_TRACK_SIZE];
    let n = nib_track.len().min(NIB_TRACK_SIZE);
    buf[..n].copy_from_slice(&nib_track[..n]);
    let has_address_marker = nib_track.windows(3).any(|w| w == [0xD5, 0xAA, 0x96]);
    (Track::from_bits(buf, (NIB_TRACK_SIZE * 8) as u32), has_address_marker)
}

/// WOZ chunk header: `{id: [u8;4], size_le: u32}`.
struct Chunk<'a> {
    id: [u8; 4],
    data: &'a [u8],
}

fn parse_chunks(body: &[u8]) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos + 8 <= body.len() {
        let id = [body[pos], body[pos + 1], body[pos + 2], body[pos + 3]];
        let size = u32::from_le_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]]) as usize;
        let start = pos + 8;
        let end = (start + size).min(body.len());
        chunks.push(Chunk { id, data: &body[start..end] });
        pos = end;
    }
    chunks
}

/// Parses a WOZ1/WOZ2 image (§6 "WOZ reading") into 160 quarter-track
/// `Track`s (`None` where TMAP has no mapping).
pub fn woz_to_tracks(data: &[u8]) -> Result<Vec<Option<Track>>> {
    if data.len() < 12 {
        return Err(MiiError::ImageFormat {
            path: String::new(),
            reason: "WOZ file too short for header".into(),
        });
    }
    let is_woz2 = &data[0..4] == b"WOZ2";
    let is_woz1 = &data[0..4] == b"WOZ1";
    if !is_woz1 && !is_woz2 {
        return Err(MiiError::ImageFormat {
            path: String::new(),
            reason: "missing WOZ1/WOZ2 magic".into(),
        });
    }

    let chunks = parse_chunks(&data[12..]);
    let tmap = chunks
        .iter()
        .find(|c| &c.id == b"TMAP")
        .ok_or_else(|| MiiError::ImageFormat {
            path: String::new(),
            reason: "WOZ file missing TMAP chunk".into(),
        })?;
    let trks = chunks
        .iter()
        .find(|c| &c.id == b"TRKS")
        .ok_or_else(|| MiiError::ImageFormat {
            path: String::new(),
            reason: "WOZ file missing TRKS chunk".into(),
        })?;

    let mut out: Vec<Option<Track>> = vec![None; 160];

    if is_woz2 {
        for qt in 0..160 {
            let phys = tmap.data.get(qt).copied().unwrap_or(0xFF);
            if phys == 0xFF {
                continue;
            }
            let entry_off = phys as usize * 8;
            if entry_off + 8 > trks.data.len() {
                continue;
            }
            let start_block = u16::from_le_bytes([trks.data[entry_off], trks.data[entry_off + 1]]);
            let bit_count = u32::from_le_bytes([
                trks.data[entry_off + 4],
                trks.data[entry_off + 5],
                trks.data[entry_off + 6],
                trks.data[entry_off + 7],
            ]);
            let byte_off = start_block as usize * 512;
            let nbytes = ((bit_count as usize) + 7) / 8;
            let mut buf = [0u8; NIB_TRACK_SIZE];
            if byte_off + nbytes <= data.len() && nbytes <= NIB_TRACK_SIZE {
                buf[..nbytes].copy_from_slice(&data[byte_off..byte_off + nbytes]);
            }
            out[qt] = Some(Track::from_bits(buf, bit_count));
        }
    } else {
        // WOZ1: 35 fixed 6656-byte TRKS entries, trailing
        // {byte_count_le, bit_count_le} at offsets 6646/6648.
        for qt in 0..160 {
            let phys = tmap.data.get(qt).copied().unwrap_or(0xFF);
            if phys == 0xFF {
                continue;
            }
            let entry_off = phys as usize * 6656;
            if entry_off + 6650 > trks.data.len() {
                continue;
            }
            let bit_count = u16::from_le_bytes([trks.data[entry_off + 6648], trks.data[entry_off + 6649]]) as u32;
            let mut buf = [0u8; NIB_TRACK_SIZE];
            buf.copy_from_slice(&trks.data[entry_off..entry_off + NIB_TRACK_SIZE]);
            out[qt] = Some(Track::from_bits(buf, bit_count));
        }
    }

    Ok(out)
}

/// §6 BDSK container.
pub const BDSK_MAGIC: [u8; 4] = *b"BDSK";
pub const BDSK_VERSION: u16 = 1;
pub const BDSK_HEADER_LEN: usize = 8;
pub const BDSK_RECORD_LEN: usize = 4 + NIB_TRACK_SIZE;
pub const BDSK_FILE_LEN: usize = BDSK_HEADER_LEN + PHYSICAL_TRACKS * BDSK_RECORD_LEN;

pub fn bdsk_header() -> [u8; BDSK_HEADER_LEN] {
    let mut h = [0u8; BDSK_HEADER_LEN];
    h[0..4].copy_from_slice(&BDSK_MAGIC);
    h[4..6].copy_from_slice(&BDSK_VERSION.to_le_bytes());
    h[6..8].copy_from_slice(&(PHYSICAL_TRACKS as u16).to_le_bytes());
    h
}

pub fn encode_bdsk_record(track: &Track) -> Vec<u8> {
    let mut rec = Vec::with_capacity(BDSK_RECORD_LEN);
    rec.extend_from_slice(&track.bit_count().to_le_bytes());
    rec.extend_from_slice(track.bytes());
    rec
}

pub fn decode_bdsk_record(rec: &[u8]) -> Option<Track> {
    if rec.len() < BDSK_RECORD_LEN {
        return None;
    }
    let bit_count = u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]);
    let mut data = [0u8; NIB_TRACK_SIZE];
    data.copy_from_slice(&rec[4..4 + NIB_TRACK_SIZE]);
    Some(Track::from_bits(data, bit_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dsk_track(track_num: u8) -> Vec<u8> {
        let mut t = vec![0u8; BYTES_PER_DSK_TRACK];
        for (i, b) in t.iter_mut().enumerate() {
            *b = (track_num as usize).wrapping_add(i) as u8;
        }
        t
    }

    #[test]
    fn dsk_round_trips_through_bdsk_track() {
        let track_num = 3u8;
        let dsk_track = sample_dsk_track(track_num);
        let bdsk_track = dsk_track_to_bdsk(&dsk_track, track_num, &DOS_SECTOR_ORDER);
        let decoded = bdsk_track_to_dsk(&bdsk_track, &DOS_SECTOR_ORDER).unwrap();
        assert_eq!(decoded.as_slice(), dsk_track.as_slice());
    }

    #[test]
    fn bdsk_container_header_matches_spec() {
        let header = bdsk_header();
        assert_eq!(&header[0..4], b"BDSK");
        assert_eq!(u16::from_le_bytes([header[4], header[5]]), 1);
        assert_eq!(u16::from_le_bytes([header[6], header[7]]), 35);
    }

    #[test]
    fn bdsk_file_length_matches_spec_literal() {
        assert_eq!(BDSK_FILE_LEN, 232_988);
    }

    #[test]
    fn bdsk_record_round_trips() {
        let track = dsk_track_to_bdsk(&sample_dsk_track(0), 0, &DOS_SECTOR_ORDER);
        let rec = encode_bdsk_record(&track);
        let back = decode_bdsk_record(&rec).unwrap();
        assert_eq!(back.bit_count(), track.bit_count());
        assert_eq!(back.bytes(), track.bytes());
    }

    #[test]
    fn po_extension_selects_prodos_order() {
        assert_eq!(sector_order_for_path("disk.po") as *const _, &PRODOS_SECTOR_ORDER as *const _);
        assert_eq!(sector_order_for_path("disk.DSK") as *const _, &DOS_SECTOR_ORDER as *const _);
    }
}
