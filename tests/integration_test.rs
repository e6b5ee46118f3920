use arrayfile::file_record::{layout, RECORD_BYTES};
use arrayfile::{
    transcode_path, AccessMethod, ArrayFileSpec, Architecture, BinaryEncoding, ErrorKind, FileManager, KernelError,
    PoolConfig,
};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn spec(encoding: BinaryEncoding) -> ArrayFileSpec {
    ArrayFileSpec {
        internal_name: "INTEGRATION TEST".into(),
        encoding,
        comments: vec!["Produced by the integration suite.".into(), "Second line.".into()],
        ..ArrayFileSpec::default()
    }
}

fn ramp(n: usize, scale: f64) -> Vec<f64> {
    (0..n).map(|i| (i as f64 - 3.0) * scale).collect()
}

/// Create a closed file holding `arrays` arrays of 50 words each.
fn make_file(fm: &mut FileManager, path: &Path, encoding: BinaryEncoding, arrays: usize) {
    let h = fm.create_array_file(path, &spec(encoding)).unwrap();
    for i in 0..arrays {
        let values = [i as f64 * 86400.0, (i + 1) as f64 * 86400.0];
        fm.add_array(h, &format!("SEGMENT {i}"), &values, &[399, 3, 1, 2], &ramp(50, 1.25 + i as f64))
            .unwrap();
    }
    fm.close(h).unwrap();
}

fn scratch_dir() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    (dir, path)
}

#[test]
fn test_create_reopen_and_list() {
    let (_dir, root) = scratch_dir();
    let path = root.join("two.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::BigIeee, 2);

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert!(h > 0);
    let entry = fm.info(h).unwrap();
    assert_eq!(entry.encoding, BinaryEncoding::BigIeee);
    assert_eq!(entry.method, AccessMethod::Read);

    let fr = fm.read_file_record(h).unwrap();
    assert_eq!(fr.internal_name, "INTEGRATION TEST");
    assert_eq!(fr.fward, 3);
    assert!(fr.labelled);

    let arrays = fm.list_arrays(h).unwrap();
    assert_eq!(arrays.len(), 2);
    assert_eq!(arrays[1].name, "SEGMENT 1");
    assert_eq!(arrays[1].values, [86400.0, 172800.0]);
    assert_eq!(arrays[0].len(), 50);
    assert_eq!(fm.read_array(h, &arrays[1].descriptor()).unwrap(), ramp(50, 2.25));
    assert_eq!(
        fm.read_comments(h).unwrap(),
        ["Produced by the integration suite.", "Second line."]
    );
    fm.close(h).unwrap();
}

#[test]
fn test_summary_chain_grows_past_one_record() {
    let (_dir, root) = scratch_dir();
    let path = root.join("many.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::LtlIeee, 30);

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    let chain = fm.summary_chain(h).unwrap();
    assert_eq!(chain.len(), 2);
    let arrays = fm.list_arrays(h).unwrap();
    assert_eq!(arrays.len(), 30);
    assert_eq!(arrays[29].name, "SEGMENT 29");
    assert_eq!(arrays[29].record, chain[1]);
    assert_eq!(fm.read_array(h, &arrays[29].descriptor()).unwrap(), ramp(50, 30.25));
    let second = fm.read_summary(h, chain[1]).unwrap();
    assert_eq!(second.prev as u32, chain[0]);
}

#[test]
fn test_open_rules() {
    let (_dir, root) = scratch_dir();
    let path = root.join("rules.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::native(), 1);

    let a = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    let b = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert_eq!(a, b);
    assert_eq!(fm.open_count(), 1);

    let err = fm.open(&path, AccessMethod::Write, Architecture::Daf).unwrap_err();
    assert!(matches!(err, KernelError::OpenConflict { method: AccessMethod::Write, .. }));
    let err = fm.open_new(&path, Architecture::Daf, BinaryEncoding::BigIeee).unwrap_err();
    assert!(matches!(err, KernelError::OpenConflict { .. }));
    fm.close(a).unwrap();

    let err = fm.open_new(&path, Architecture::Daf, BinaryEncoding::BigIeee).unwrap_err();
    assert!(matches!(err, KernelError::FileExists(_)));
    let w = fm.open(&path, AccessMethod::Write, Architecture::Daf).unwrap();
    let err = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    fm.close(w).unwrap();

    let missing = root.join("missing.bsp");
    assert!(matches!(
        fm.open(&missing, AccessMethod::Write, Architecture::Daf),
        Err(KernelError::FileNotFound(_))
    ));
}

#[test]
fn test_find_by_name_ignores_blanks_and_case() {
    let (_dir, root) = scratch_dir();
    let path = root.join("name.ext");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::native(), 1);
    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    let text = path.to_string_lossy().to_string();
    assert_eq!(fm.find_by_name(&text), Some(h));
    assert_eq!(fm.find_by_name(&format!("   {text}")), Some(h));
    assert_eq!(fm.find_by_name(&text.to_uppercase()), Some(h));
    assert_eq!(fm.find_by_name(""), None);
    fm.close(h).unwrap();
    assert_eq!(fm.find_by_name(&text), None);
}

#[test]
fn test_twenty_one_files_through_twenty_units() {
    let (_dir, root) = scratch_dir();
    let config = PoolConfig { file_table_size: 21, unit_pool_size: 20, ..PoolConfig::default() };
    let mut fm = FileManager::new(config).unwrap();

    let paths: Vec<PathBuf> = (0..21).map(|i| root.join(format!("f{i:02}.bsp"))).collect();
    for p in &paths {
        make_file(&mut fm, p, BinaryEncoding::native(), 1);
    }
    assert_eq!(fm.open_count(), 0);

    let handles: Vec<_> = paths
        .iter()
        .map(|p| fm.open(p, AccessMethod::Read, Architecture::Daf).unwrap())
        .collect();
    // The last open recycled the unit of the first, least recently used, file.
    assert_eq!(fm.unit_of(handles[0]), None);
    assert_eq!(fm.info(handles[0]).unwrap().unit, None);
    assert!(fm.unit_of(handles[20]).is_some());
    assert_eq!(fm.free_units(), 0);

    for h in &handles {
        let arrays = fm.list_arrays(*h).unwrap();
        assert_eq!(fm.read_array(*h, &arrays[0].descriptor()).unwrap(), ramp(50, 1.25));
    }

    let extra = root.join("extra.bsp");
    let err = fm.open_new(&extra, Architecture::Daf, BinaryEncoding::native()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);
    assert!(!extra.exists());

    for h in handles {
        fm.close(h).unwrap();
    }
    assert_eq!(fm.free_units(), 20);
}

#[test]
fn test_close_releases_units() {
    let (_dir, root) = scratch_dir();
    let path = root.join("release.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::native(), 1);
    let before = fm.free_units();
    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert_eq!(fm.free_units(), before - 1);
    fm.close(h).unwrap();
    assert!(fm.free_units() >= before);
    fm.close(h).unwrap();
}

#[test]
fn test_transcode_round_trip_every_encoding() {
    let (_dir, root) = scratch_dir();
    let source = root.join("source.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &source, BinaryEncoding::BigIeee, 27);

    let h = fm.open(&source, AccessMethod::Read, Architecture::Daf).unwrap();
    let original = fm.content_digest(h).unwrap();
    fm.close(h).unwrap();

    for (i, target) in BinaryEncoding::ALL.iter().enumerate() {
        let there = root.join(format!("there{i}.bsp"));
        let back = root.join(format!("back{i}.bsp"));
        let report = transcode_path(&mut fm, &source, &there, *target).unwrap();
        assert_eq!(report.summary_records, 2);
        assert_eq!(report.comment_records, 1);
        assert!(report.data_words >= 27 * 50);

        let t = fm.open(&there, AccessMethod::Read, Architecture::Daf).unwrap();
        assert_eq!(fm.info(t).unwrap().encoding, *target);
        assert_eq!(fm.content_digest(t).unwrap(), original, "digest differs in {target}");
        fm.close(t).unwrap();

        transcode_path(&mut fm, &there, &back, BinaryEncoding::BigIeee).unwrap();
        let b = fm.open(&back, AccessMethod::Read, Architecture::Daf).unwrap();
        assert_eq!(fm.content_digest(b).unwrap(), original);
        fm.close(b).unwrap();
    }
    assert_eq!(fm.open_count(), 0);
}

#[test]
fn test_transcode_copies_only_live_words() {
    let (_dir, root) = scratch_dir();
    let source = root.join("live.bsp");
    let dest = root.join("live-vax.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &source, BinaryEncoding::LtlIeee, 1);

    transcode_path(&mut fm, &source, &dest, BinaryEncoding::VaxGfloat).unwrap();
    let bytes = std::fs::read(&dest).unwrap();
    // Record 1 file record, 2 comments, 3 summary, 4 names, 5 data.
    assert_eq!(bytes.len(), 5 * RECORD_BYTES);
    let data = &bytes[4 * RECORD_BYTES..];
    assert!(data[50 * 8..].iter().all(|b| *b == 0));
    assert_eq!(&bytes[layout::DAF_FORMAT], b"VAX-GFLT");
}

#[test]
fn test_failed_transcode_leaves_nothing_behind() {
    let (_dir, root) = scratch_dir();
    let source = root.join("huge.bsp");
    let dest = root.join("huge-vax.bsp");
    let mut fm = FileManager::default();
    let h = fm.create_array_file(&source, &spec(BinaryEncoding::LtlIeee)).unwrap();
    fm.add_array(h, "HUGE", &[0.0, 1.0], &[1, 2, 3, 4], &[1.0, 1.0e300]).unwrap();
    fm.close(h).unwrap();

    let err = transcode_path(&mut fm, &source, &dest, BinaryEncoding::VaxDfloat).unwrap_err();
    assert!(matches!(err, KernelError::Codec(_)));
    assert!(!dest.exists());
    assert_eq!(fm.open_count(), 0);

    std::fs::write(&dest, b"keep me").unwrap();
    let err = transcode_path(&mut fm, &source, &dest, BinaryEncoding::BigIeee).unwrap_err();
    assert!(matches!(err, KernelError::FileExists(_)));
    assert_eq!(std::fs::read(&dest).unwrap(), b"keep me");
}

#[test]
fn test_format_errors_on_open() {
    let (_dir, root) = scratch_dir();
    let path = root.join("format.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::LtlIeee, 1);

    let err = fm.open(&path, AccessMethod::Read, Architecture::Das).unwrap_err();
    assert!(matches!(err, KernelError::ArchitectureMismatch { expected: Architecture::Das, .. }));
    assert_eq!(fm.open_count(), 0);

    let pristine = std::fs::read(&path).unwrap();

    // Label removed: the probe word still identifies the file.
    let mut legacy = pristine.clone();
    legacy[layout::DAF_FORMAT].fill(b' ');
    std::fs::write(&path, &legacy).unwrap();
    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert_eq!(fm.info(h).unwrap().encoding, BinaryEncoding::LtlIeee);
    assert!(!fm.read_file_record(h).unwrap().labelled);
    fm.close(h).unwrap();

    // Neither label nor probe word.
    legacy[layout::DAF_PROBE].fill(0);
    std::fs::write(&path, &legacy).unwrap();
    let err = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap_err();
    assert!(matches!(err, KernelError::UnknownEncoding { .. }));

    // Text-mode transfer damage.
    let mut damaged = pristine.clone();
    damaged[layout::FTP.start + 7] = b'\n';
    std::fs::write(&path, &damaged).unwrap();
    let err = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap_err();
    assert!(matches!(err, KernelError::FtpCorrupted { .. }));
    assert_eq!(fm.free_units(), fm.config().unit_pool_size);
}

#[test]
fn test_bounds_and_read_only() {
    let (_dir, root) = scratch_dir();
    let path = root.join("bounds.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::native(), 1);

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    let free = fm.read_file_record(h).unwrap().free as u64;
    assert_eq!(fm.read_data(h, free - 1, 1).unwrap().len(), 1);
    let err = fm.read_data(h, free - 1, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert!(matches!(fm.read_summary(h, 1), Err(KernelError::AddressOutOfBounds { .. })));
    assert!(matches!(fm.write_data(h, free, &[1.0]), Err(KernelError::ReadOnly { .. })));
    assert!(matches!(fm.write_raw_record(h, 9, &[0; 8]), Err(KernelError::ReadOnly { .. })));
    fm.close(h).unwrap();

    let w = fm.open(&path, AccessMethod::Write, Architecture::Daf).unwrap();
    let err = fm.write_data(w, free - 1, &[1.0]).unwrap_err();
    assert!(matches!(err, KernelError::AddressOutOfBounds { .. }));
    assert!(matches!(fm.write_raw_record(w, 1, &[0; 8]), Err(KernelError::AddressOutOfBounds { .. })));
    fm.close(w).unwrap();
}

#[test]
fn test_extreme_addresses_are_out_of_bounds() {
    let (_dir, root) = scratch_dir();
    let path = root.join("extreme.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::native(), 1);
    let size = std::fs::metadata(&path).unwrap().len();

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert!(matches!(fm.read_data(h, u64::MAX, 2), Err(KernelError::AddressOutOfBounds { .. })));
    assert!(matches!(fm.read_data(h, u64::MAX, 0), Err(KernelError::AddressOutOfBounds { .. })));
    assert!(matches!(fm.read_raw_data(h, u64::MAX - 1, 8), Err(KernelError::AddressOutOfBounds { .. })));
    fm.close(h).unwrap();

    let w = fm.open(&path, AccessMethod::Write, Architecture::Daf).unwrap();
    assert!(matches!(fm.write_data(w, u64::MAX, &[1.0]), Err(KernelError::AddressOutOfBounds { .. })));
    let past = i32::MAX as u64 + 1;
    assert!(matches!(fm.write_data(w, past, &[1.0]), Err(KernelError::AddressOutOfBounds { .. })));
    let straddle = i32::MAX as u64;
    assert!(matches!(fm.write_data(w, straddle, &[1.0, 2.0]), Err(KernelError::AddressOutOfBounds { .. })));
    fm.close(w).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
}

#[test]
fn test_corrupted_descriptor_is_a_format_error() {
    let (_dir, root) = scratch_dir();
    let path = root.join("corrupt.bsp");
    let mut fm = FileManager::default();
    make_file(&mut fm, &path, BinaryEncoding::BigIeee, 1);

    let w = fm.open(&path, AccessMethod::Write, Architecture::Daf).unwrap();
    let first_summary = fm.read_file_record(w).unwrap().fward as u32;
    let mut rec = fm.read_raw_record(w, first_summary).unwrap();
    // begin and end of descriptor 1: the last two integers after its two doubles.
    rec[56..60].copy_from_slice(&(-5i32).to_be_bytes());
    rec[60..64].copy_from_slice(&i32::MAX.to_be_bytes());
    fm.write_raw_record(w, first_summary, &rec).unwrap();
    fm.close(w).unwrap();

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    let err = fm.content_digest(h).unwrap_err();
    assert!(matches!(err, KernelError::MalformedSummary { record, .. } if record == first_summary));
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(fm.list_arrays(h).is_err());
    fm.close(h).unwrap();
}

#[test]
fn test_invalid_file_records_are_refused() {
    let (_dir, root) = scratch_dir();
    let path = root.join("pointers.bsp");
    let mut fm = FileManager::default();
    let h = fm.create_array_file(&path, &spec(BinaryEncoding::LtlIeee)).unwrap();
    let fr = fm.read_file_record(h).unwrap();

    let mut bad = fr.clone();
    bad.free = i32::MIN;
    assert!(matches!(fm.write_file_record(h, &bad), Err(KernelError::MalformedFileRecord { .. })));
    bad = fr.clone();
    bad.fward = 1;
    assert!(matches!(fm.write_file_record(h, &bad), Err(KernelError::MalformedFileRecord { .. })));
    assert_eq!(fm.read_summary(h, fr.fward as u32).unwrap().descriptors.len(), 0);
    assert_eq!(fm.read_file_record(h).unwrap(), fr);

    // An array that would run past the last addressable word is refused
    // before anything is written.
    let mut full = fr.clone();
    full.free = i32::MAX - 1;
    fm.write_file_record(h, &full).unwrap();
    let err = fm.add_array(h, "TOO FAR", &[0.0, 1.0], &[1, 2, 3, 4], &ramp(5, 1.0)).unwrap_err();
    assert!(matches!(err, KernelError::MalformedFileRecord { .. }));
    fm.close(h).unwrap();

    let h = fm.open(&path, AccessMethod::Read, Architecture::Daf).unwrap();
    assert_eq!(fm.read_file_record(h).unwrap().free, i32::MAX - 1);
    fm.close(h).unwrap();
}

#[test]
fn test_close_and_delete() {
    let (_dir, root) = scratch_dir();
    let path = root.join("doomed.bsp");
    let mut fm = FileManager::default();
    let h = fm.create_array_file(&path, &spec(BinaryEncoding::VaxDfloat)).unwrap();
    assert!(path.exists());
    fm.close_and_delete(h).unwrap();
    assert!(!path.exists());
    fm.close_and_delete(h).unwrap();
    assert_eq!(fm.open_count(), 0);
}

#[test]
fn test_locked_units_survive_pressure() {
    let (_dir, root) = scratch_dir();
    let config = PoolConfig { file_table_size: 10, unit_pool_size: 4, reserved_units: 1, scratch_units: 1, ..PoolConfig::default() };
    let mut fm = FileManager::new(config).unwrap();
    let paths: Vec<PathBuf> = (0..6).map(|i| root.join(format!("l{i}.bsp"))).collect();
    for p in &paths {
        make_file(&mut fm, p, BinaryEncoding::native(), 1);
    }
    let handles: Vec<_> = paths.iter().map(|p| fm.open(p, AccessMethod::Read, Architecture::Daf).unwrap()).collect();

    let unit = fm.lock_unit(handles[0]).unwrap();
    fm.lock_unit(handles[1]).unwrap();
    let err = fm.lock_unit(handles[2]).unwrap_err();
    assert!(matches!(err, KernelError::LockFailed { locked: 2, lockable: 2, .. }));

    for h in &handles[2..] {
        fm.read_file_record(*h).unwrap();
    }
    assert_eq!(fm.unit_of(handles[0]), Some(unit));
    assert_eq!(fm.handle_of(unit), Some(handles[0]));

    let scratch = fm.open_scratch(Architecture::Daf, BinaryEncoding::native()).unwrap();
    for h in &handles[2..] {
        fm.read_file_record(*h).unwrap();
    }
    assert!(fm.unit_of(scratch).is_some());
    fm.unlock_unit(handles[0]);
    fm.close(scratch).unwrap();
}

#[test]
fn test_scratch_array_file() {
    let mut fm = FileManager::default();
    let h = fm.open_scratch(Architecture::Daf, BinaryEncoding::VaxGfloat).unwrap();
    let shape = arrayfile::summary::ArrayShape::new(1, 3).unwrap();
    let fr = arrayfile::file_record::FileRecord::new("DAF/TEMP", shape, "SCRATCH", BinaryEncoding::VaxGfloat);
    fm.write_file_record(h, &fr).unwrap();
    fm.write_summary(h, 2, &Default::default()).unwrap();
    fm.write_names(h, 3, &Default::default()).unwrap();
    fm.add_array(h, "TEMP", &[5.0], &[7], &[1.0, 2.0, 3.0]).unwrap();
    let arrays = fm.list_arrays(h).unwrap();
    assert_eq!(arrays[0].ints, [7]);
    assert_eq!(fm.read_array(h, &arrays[0].descriptor()).unwrap(), [1.0, 2.0, 3.0]);
    fm.close(h).unwrap();
}
