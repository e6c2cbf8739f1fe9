//! Integration tests for term table construction, sealing, and round trip.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use sigil::prelude::*;
use sigil::row::{MAX_RANK, RANK_COUNT};
use tempfile::TempDir;

#[test]
fn test_explicit_term_round_trip_through_file() -> Result<()> {
    let mut table = TermTable::new();

    let row_a = RowId::new(0, 0);
    let row_b = RowId::new(0, 1);
    table.open_term()?;
    table.add_row_id(row_a)?;
    table.add_row_id(row_b)?;
    table.close_term(0xDEAD)?;
    table.set_row_counts(0, 2, 0)?;
    table.seal()?;

    let term = Term::new(0xDEAD, 20, 1);
    let rows = table.get_rows(&term)?;
    assert_eq!(rows.kind(), RowIdSequenceKind::Explicit);
    assert_eq!(rows.len(), 2);
    assert_eq!(table.get_row_id_explicit(rows.start() as usize)?, row_a);
    assert_eq!(table.get_row_id_explicit(rows.start() as usize + 1)?, row_b);

    // Write to disk, reconstruct, and repeat the queries.
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("terms.ttbl");
    let mut file = File::create(&path)?;
    table.write(&mut file)?;
    file.sync_all()?;

    let mut file = File::open(&path)?;
    let restored = TermTable::read(&mut file)?;

    let rows = restored.get_rows(&term)?;
    assert_eq!(rows.kind(), RowIdSequenceKind::Explicit);
    assert_eq!(rows.len(), 2);
    assert_eq!(restored.get_row_id_explicit(rows.start() as usize)?, row_a);
    assert_eq!(
        restored.get_row_id_explicit(rows.start() as usize + 1)?,
        row_b
    );
    assert_eq!(
        restored.get_total_row_count(0)?,
        table.get_total_row_count(0)?
    );
    Ok(())
}

#[test]
fn test_treatment_driven_build() -> Result<()> {
    let treatment = PrivateSharedRank0::new(0.1, 10.0)?;
    let words: &[(&str, IdfX10)] = &[
        ("engine", 4),
        ("query", 12),
        ("signature", 25),
        ("quorum", 41),
    ];

    let mut table = TermTable::new();
    let mut next_index = [0u32; RANK_COUNT];
    let mut expected: Vec<(Term, Vec<RowId>)> = Vec::new();

    for (text, idf) in words {
        let term = Term::from_text(text, *idf);
        let config = treatment.get_treatment(&term);

        table.open_term()?;
        let mut rows = Vec::new();
        for entry in config.iter() {
            for _ in 0..entry.row_count {
                let rank = entry.rank as usize;
                let row = RowId::new(entry.rank, next_index[rank]);
                next_index[rank] += 1;
                table.add_row_id(row)?;
                rows.push(row);
            }
        }
        table.close_term(term.hash())?;
        expected.push((term, rows));
    }

    table.set_row_counts(0, u64::from(next_index[0]), 8)?;
    table.seal()?;

    // Every explicit term resolves to exactly the rows its treatment
    // prescribed, in insertion order.
    for (term, rows) in &expected {
        let sequence = table.get_rows(term)?;
        assert_eq!(sequence.kind(), RowIdSequenceKind::Explicit);
        assert_eq!(sequence.len(), rows.len());
        assert_eq!(
            sequence.len(),
            treatment.get_treatment(term).total_row_count()
        );
        for (offset, row) in rows.iter().enumerate() {
            assert_eq!(
                table.get_row_id_explicit(sequence.start() as usize + offset)?,
                *row
            );
        }
    }

    // The per-rank accounting identity holds at every rank.
    for rank in 0..=MAX_RANK {
        let total = table.get_total_row_count(rank)?;
        let parts = table.explicit_row_count(rank)?
            + table.adhoc_row_count(rank)?
            + table.shared_row_count(rank)?
            + if rank == 0 { table.fact_row_count()? } else { 0 };
        assert_eq!(total, parts);
    }
    Ok(())
}

#[test]
fn test_duplicate_term_not_visible() -> Result<()> {
    let mut table = TermTable::new();

    table.open_term()?;
    table.add_row_id(RowId::new(0, 0))?;
    table.close_term(0xFEED)?;

    table.open_term()?;
    table.add_row_id(RowId::new(0, 1))?;
    let err = table.close_term(0xFEED).unwrap_err();
    assert!(matches!(err, SigilError::DuplicateTerm(0xFEED)));

    table.seal()?;
    let rows = table.get_rows(&Term::new(0xFEED, 10, 1))?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        table.get_row_id_explicit(rows.start() as usize)?,
        RowId::new(0, 0)
    );
    Ok(())
}

#[test]
fn test_adhoc_fallback_end_to_end() -> Result<()> {
    let mut table = TermTable::new();

    // One recipe cell of three rank-0 rows; no explicit entries.
    table.open_term()?;
    for _ in 0..3 {
        table.add_row_id(RowId::new(0, 0))?;
    }
    table.close_adhoc_term(30, 2)?;
    table.set_row_counts(0, 0, 3)?;
    table.seal()?;

    let term = Term::new(0x42, 30, 2);
    let rows = table.get_rows(&term)?;
    assert_eq!(rows.kind(), RowIdSequenceKind::Adhoc);
    assert_eq!(rows.len(), 3);

    let mut indexes = Vec::new();
    for variant in 0..3 {
        let row = table.get_row_id_adhoc(term.hash(), rows.start() as usize, variant)?;
        assert_eq!(row.rank(), 0);
        assert!(u64::from(row.index()) < table.get_total_row_count(0)?);
        indexes.push(row.index());
    }
    indexes.sort_unstable();
    indexes.dedup();
    assert_eq!(indexes.len(), 3);

    // Different hashes land on different probe sequences more often than
    // not, but every hash stays inside the adhoc band.
    for hash in [0x1u64, 0x9E37, 0xFFFF_FFFF_FFFF_FFFF] {
        let row = table.get_row_id_adhoc(hash, rows.start() as usize, 0)?;
        assert!(u64::from(row.index()) < 3);
    }
    Ok(())
}

#[test]
fn test_serialized_artifact_is_reproducible() -> Result<()> {
    let build = || -> Result<TermTable> {
        let mut table = TermTable::new();
        for (hash, index) in [(0xAAu64, 0u32), (0xBB, 1), (0xCC, 2)] {
            table.open_term()?;
            table.add_row_id(RowId::new(0, index))?;
            table.close_term(hash)?;
        }
        table.set_row_counts(0, 3, 0)?;
        table.set_fact_row_count(1)?;
        table.seal()?;
        Ok(table)
    };

    let mut first = Vec::new();
    build()?.write(&mut first)?;
    let mut second = Vec::new();
    build()?.write(&mut second)?;

    // Two independent builds of the same corpus serialize byte-for-byte
    // identically.
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_corrupt_file_rejected() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("terms.ttbl");

    let mut table = TermTable::new();
    table.set_row_counts(0, 1, 1)?;
    table.seal()?;

    let mut file = File::create(&path)?;
    table.write(&mut file)?;

    // Flip one payload byte in place.
    use std::io::{Read, Write};
    let mut file = File::options().read(true).write(true).open(&path)?;
    file.seek(SeekFrom::Start(12))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(12))?;
    file.write_all(&byte)?;
    file.seek(SeekFrom::Start(0))?;

    assert!(matches!(
        TermTable::read(&mut file),
        Err(SigilError::CorruptTable(_))
    ));
    Ok(())
}
