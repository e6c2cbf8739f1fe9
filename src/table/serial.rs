//! Binary serialization of the term table.
//!
//! The format is version-tagged and little-endian: a `TTBL` magic, the
//! staging cursor and lifecycle flags, the row-id buffer, the explicit term
//! map (written sorted by hash so identical tables produce identical
//! bytes), the rectangular adhoc recipe block, the per-rank count arrays,
//! and a trailing CRC32 of everything before it. Deserializing the output
//! of [`TermTable::write`] yields a table indistinguishable from the
//! original.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::error::{Result, SigilError};
use crate::row::{RowId, RANK_COUNT};
use crate::table::{PackedRowIdSequence, RowIdSequenceKind, TermTable, ADHOC_RECIPE_CELLS};

const MAGIC: [u8; 4] = *b"TTBL";
const VERSION: u32 = 1;

impl TermTable {
    /// Serialize the table to a byte stream.
    pub fn write<W: Write>(&self, output: &mut W) -> Result<()> {
        let mut buf: Vec<u8> = Vec::new();

        buf.write_all(&MAGIC)?;
        buf.write_u32::<LittleEndian>(VERSION)?;

        buf.write_u64::<LittleEndian>(u64::from(self.start))?;
        let flags = u8::from(self.set_row_counts_called) | (u8::from(self.sealed) << 1);
        buf.write_u8(flags)?;

        buf.write_u64::<LittleEndian>(self.row_ids.len() as u64)?;
        for id in &self.row_ids {
            buf.write_u64::<LittleEndian>(id.pack())?;
        }

        let mut terms: Vec<(u64, PackedRowIdSequence)> = self
            .term_hash_to_rows
            .iter()
            .map(|(hash, sequence)| (*hash, *sequence))
            .collect();
        terms.sort_unstable_by_key(|(hash, _)| *hash);
        buf.write_u64::<LittleEndian>(terms.len() as u64)?;
        for (hash, sequence) in &terms {
            buf.write_u64::<LittleEndian>(*hash)?;
            write_sequence(&mut buf, sequence)?;
        }

        for cell in &self.adhoc_recipes {
            write_sequence(&mut buf, cell)?;
        }

        for counts in [
            &self.explicit_row_counts,
            &self.adhoc_row_counts,
            &self.shared_row_counts,
        ] {
            buf.write_u64::<LittleEndian>(RANK_COUNT as u64)?;
            for count in counts.iter() {
                buf.write_u64::<LittleEndian>(*count)?;
            }
        }
        buf.write_u64::<LittleEndian>(self.fact_row_count)?;

        let checksum = crc32fast::hash(&buf);
        output.write_all(&buf)?;
        output.write_u32::<LittleEndian>(checksum)?;
        Ok(())
    }

    /// Reconstruct a table previously serialized with [`TermTable::write`].
    pub fn read<R: Read>(input: &mut R) -> Result<TermTable> {
        let mut reader = ChecksumReader::new(input);

        let mut magic = [0u8; 4];
        reader.read_exact_checked(&mut magic)?;
        if magic != MAGIC {
            return Err(SigilError::corrupt(format!("bad magic {magic:02x?}")));
        }
        let version = reader.read_u32_checked()?;
        if version != VERSION {
            return Err(SigilError::corrupt(format!(
                "unsupported version {version}, expected {VERSION}"
            )));
        }

        let start = reader.read_u64_checked()?;
        let flags = reader.read_u8_checked()?;
        if flags & !0b11 != 0 {
            return Err(SigilError::corrupt(format!("unknown flag bits {flags:#04x}")));
        }

        let row_id_count = reader.read_u64_checked()? as usize;
        let mut row_ids = Vec::with_capacity(row_id_count.min(1 << 20));
        for _ in 0..row_id_count {
            row_ids.push(RowId::unpack(reader.read_u64_checked()?)?);
        }
        if start as usize > row_ids.len() {
            return Err(SigilError::corrupt(format!(
                "staging cursor {start} beyond row id buffer of {}",
                row_ids.len()
            )));
        }

        let term_count = reader.read_u64_checked()? as usize;
        let mut term_hash_to_rows = ahash::AHashMap::with_capacity(term_count.min(1 << 20));
        for _ in 0..term_count {
            let hash = reader.read_u64_checked()?;
            let sequence = read_sequence(&mut reader, row_ids.len())?;
            if term_hash_to_rows.insert(hash, sequence).is_some() {
                return Err(SigilError::corrupt(format!(
                    "duplicate term hash {hash:#018x}"
                )));
            }
        }

        let mut adhoc_recipes = Vec::with_capacity(ADHOC_RECIPE_CELLS);
        for _ in 0..ADHOC_RECIPE_CELLS {
            adhoc_recipes.push(read_sequence(&mut reader, row_ids.len())?);
        }

        let mut rank_arrays = [[0u64; RANK_COUNT]; 3];
        for counts in &mut rank_arrays {
            let len = reader.read_u64_checked()? as usize;
            if len != RANK_COUNT {
                return Err(SigilError::corrupt(format!(
                    "rank array of {len} entries, expected {RANK_COUNT}"
                )));
            }
            for count in counts.iter_mut() {
                *count = reader.read_u64_checked()?;
            }
        }
        let fact_row_count = reader.read_u64_checked()?;

        let computed = reader.finalize();
        let stored = reader
            .into_inner()
            .read_u32::<LittleEndian>()
            .map_err(eof_to_corrupt)?;
        if stored != computed {
            return Err(SigilError::corrupt(format!(
                "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        debug!(
            "read term table: {} explicit terms, {} row ids",
            term_hash_to_rows.len(),
            row_ids.len()
        );

        Ok(TermTable {
            set_row_counts_called: flags & 0b01 != 0,
            sealed: flags & 0b10 != 0,
            start: start as u32,
            term_hash_to_rows,
            adhoc_recipes,
            row_ids,
            explicit_row_counts: rank_arrays[0],
            adhoc_row_counts: rank_arrays[1],
            shared_row_counts: rank_arrays[2],
            fact_row_count,
        })
    }
}

fn write_sequence<W: Write>(output: &mut W, sequence: &PackedRowIdSequence) -> io::Result<()> {
    output.write_u32::<LittleEndian>(sequence.start())?;
    output.write_u32::<LittleEndian>(sequence.end())?;
    output.write_u32::<LittleEndian>(sequence.kind().as_u32())
}

fn read_sequence<R: Read>(
    reader: &mut ChecksumReader<R>,
    row_id_count: usize,
) -> Result<PackedRowIdSequence> {
    let start = reader.read_u32_checked()?;
    let end = reader.read_u32_checked()?;
    let kind = RowIdSequenceKind::from_u32(reader.read_u32_checked()?)?;
    if start > end || end as usize > row_id_count {
        return Err(SigilError::corrupt(format!(
            "row id sequence [{start}, {end}) outside buffer of {row_id_count}"
        )));
    }
    Ok(PackedRowIdSequence::new(start, end, kind))
}

fn eof_to_corrupt(error: io::Error) -> SigilError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        SigilError::corrupt("truncated input")
    } else {
        SigilError::Io(error)
    }
}

/// Reader adapter that folds every byte it yields into a CRC32.
struct ChecksumReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> ChecksumReader<R> {
    fn new(inner: R) -> Self {
        ChecksumReader {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn read_exact_checked(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(eof_to_corrupt)?;
        self.hasher.update(buf);
        Ok(())
    }

    fn read_u8_checked(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_checked(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32_checked(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_checked(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_checked(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_checked(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn build_table() -> TermTable {
        let mut table = TermTable::new();

        table.open_term().unwrap();
        table.add_row_id(RowId::new(0, 3)).unwrap();
        table.add_row_id(RowId::new(0, 4)).unwrap();
        table.close_term(0xDEAD).unwrap();

        table.open_term().unwrap();
        table.add_row_id(RowId::new(3, 1)).unwrap();
        table.close_term(0xBEEF).unwrap();

        table.open_term().unwrap();
        table.add_row_id(RowId::new(0, 0)).unwrap();
        table.add_row_id(RowId::new(0, 0)).unwrap();
        table.add_row_id(RowId::new(0, 0)).unwrap();
        table.close_adhoc_term(30, 2).unwrap();

        table.set_row_counts(0, 5, 3).unwrap();
        table.set_row_counts(3, 1, 0).unwrap();
        table.set_fact_row_count(2).unwrap();
        table
    }

    #[test]
    fn test_round_trip_preserves_sealed_table() {
        let mut table = build_table();
        table.seal().unwrap();

        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let restored = TermTable::read(&mut buf.as_slice()).unwrap();

        assert_eq!(restored, table);
        assert!(restored.is_sealed());

        let term = Term::new(0xDEAD, 20, 1);
        assert_eq!(
            restored.get_rows(&term).unwrap(),
            table.get_rows(&term).unwrap()
        );
        assert_eq!(
            restored.get_total_row_count(0).unwrap(),
            table.get_total_row_count(0).unwrap()
        );
    }

    #[test]
    fn test_round_trip_preserves_unsealed_table() {
        let table = build_table();

        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let restored = TermTable::read(&mut buf.as_slice()).unwrap();

        assert_eq!(restored, table);
        assert!(!restored.is_sealed());
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let mut table = build_table();
        table.seal().unwrap();

        let mut first = Vec::new();
        table.write(&mut first).unwrap();
        let restored = TermTable::read(&mut first.as_slice()).unwrap();
        let mut second = Vec::new();
        restored.write(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_adhoc_derivation_stable_across_round_trip() {
        let mut table = build_table();
        table.seal().unwrap();

        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let restored = TermTable::read(&mut buf.as_slice()).unwrap();

        let rows = table.get_rows(&Term::new(0x42, 30, 2)).unwrap();
        for variant in 0..5 {
            assert_eq!(
                table
                    .get_row_id_adhoc(0x42, rows.start() as usize, variant)
                    .unwrap(),
                restored
                    .get_row_id_adhoc(0x42, rows.start() as usize, variant)
                    .unwrap()
            );
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        build_table().write(&mut buf).unwrap();
        buf[0] = b'X';

        assert!(matches!(
            TermTable::read(&mut buf.as_slice()),
            Err(SigilError::CorruptTable(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut buf = Vec::new();
        build_table().write(&mut buf).unwrap();
        buf[4] = 0xFF;

        assert!(matches!(
            TermTable::read(&mut buf.as_slice()),
            Err(SigilError::CorruptTable(_))
        ));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let mut buf = Vec::new();
        build_table().write(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);

        assert!(matches!(
            TermTable::read(&mut buf.as_slice()),
            Err(SigilError::CorruptTable(_))
        ));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let mut buf = Vec::new();
        build_table().write(&mut buf).unwrap();
        let index = buf.len() - 6;
        buf[index] ^= 0xFF;

        assert!(matches!(
            TermTable::read(&mut buf.as_slice()),
            Err(SigilError::CorruptTable(_))
        ));
    }

    #[test]
    fn test_empty_table_round_trip() {
        let table = TermTable::new();
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        let restored = TermTable::read(&mut buf.as_slice()).unwrap();
        assert_eq!(restored, table);
    }
}
