use mhpf::archive::{export_ids, pack_directory, scan_archive, unpack_archive, PackOptions};
use mhpf::header::PackHeader;
use mhpf::index::{IdMap, UnmappedPolicy};
use mhpf::io_stream::{DirSource, PackEntry, PackWriter};
use mhpf::layout::padded_size;
use mhpf::MhpfError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_tree(root: &Path, files: &[(&str, Vec<u8>)]) {
    for (name, data) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

fn example_tree(root: &Path) -> IdMap {
    write_tree(root, &[
        ("a.txt", vec![b'A'; 3000]),
        ("sub/b.txt", b"ten bytes!".to_vec()),
    ]);
    IdMap::from_json(br#"{"5": "a.txt", "2": "sub/b.txt"}"#).unwrap()
}

fn header_of(path: &Path) -> PackHeader {
    PackHeader::read(fs::File::open(path).unwrap()).unwrap()
}

#[test]
fn test_two_file_example() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let ids = example_tree(&src);
    let pck = work.path().join("out.pck");

    let summary = pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();
    assert_eq!(summary.resources, 2);

    let header = header_of(&pck);
    assert_eq!(header.num_resources, 2);
    assert_eq!(header.content_region_size, 6144);
    assert_eq!(header.pack_index, 31);
    assert_eq!(u64::from(header.total_size), fs::metadata(&pck).unwrap().len());

    let report = scan_archive(&pck).unwrap();
    let order: Vec<_> = report.entries.iter().map(|e| (e.identifier, e.name.as_str())).collect();
    assert_eq!(order, vec![(2, "sub/b.txt"), (5, "a.txt")]);
    assert_eq!(report.entries[0].content_offset, 59392);
    assert_eq!(report.entries[1].content_offset, 59392 + 2048);
    assert!(report.issues.is_empty());
}

#[test]
fn test_pack_unpack_roundtrip() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("empty.bin", Vec::new()),
        ("exact.bin", vec![7u8; 2048]),
        ("levels/one/map.dat", (0..10_000u32).map(|i| (i % 251) as u8).collect()),
        ("levels/two/readme.txt", b"hello".to_vec()),
        ("textures/x.tex", vec![0xFF; 4097]),
    ];
    write_tree(&src, &files);
    let ids = IdMap::from_entries(files.iter().enumerate().map(|(i, (n, _))| (100 - i as u32, *n))).unwrap();

    let pck = work.path().join("data.pck");
    pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();

    let out = work.path().join("out");
    assert_eq!(unpack_archive(&pck, &out).unwrap(), files.len());
    for (name, data) in &files {
        assert_eq!(&fs::read(out.join(name)).unwrap(), data, "{name} differs");
    }
}

#[test]
fn test_padding_invariant() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let sizes = [1usize, 2047, 2048, 2049, 0, 6000];
    let files: Vec<(String, Vec<u8>)> =
        sizes.iter().enumerate().map(|(i, &s)| (format!("f{i}"), vec![i as u8 + 1; s])).collect();
    let borrowed: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
    write_tree(&src, &borrowed);
    let ids = IdMap::from_entries(files.iter().enumerate().map(|(i, (n, _))| (i as u32, n.as_str()))).unwrap();

    let pck = work.path().join("p.pck");
    pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();
    let report = scan_archive(&pck).unwrap();

    for pair in report.entries.windows(2) {
        let gap = u64::from(pair[1].content_offset - pair[0].content_offset);
        assert_eq!(gap, padded_size(u64::from(pair[0].raw_size)));
    }
    let total: u64 = report.entries.iter().map(|e| padded_size(u64::from(e.raw_size))).sum();
    assert_eq!(total, u64::from(report.header.content_region_size));

    // Padding bytes are real zeros.
    let bytes = fs::read(&pck).unwrap();
    for e in &report.entries {
        let start = (e.content_offset + e.raw_size) as usize;
        let end = e.content_offset as usize + padded_size(u64::from(e.raw_size)) as usize;
        assert!(bytes[start..end].iter().all(|&b| b == 0));
    }
}

#[test]
fn test_pack_is_deterministic() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let ids = example_tree(&src);

    let first = work.path().join("1.pck");
    let second = work.path().join("2.pck");
    pack_directory(&src, &first, &ids, &PackOptions::default()).unwrap();
    pack_directory(&src, &second, &ids, &PackOptions::default()).unwrap();
    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn test_ids_export_repacks_identically() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let ids = example_tree(&src);
    let opts = PackOptions { pack_index: 7, ..PackOptions::default() };

    let original = work.path().join("orig.pck");
    pack_directory(&src, &original, &ids, &opts).unwrap();

    let unpacked = work.path().join("unpacked");
    unpack_archive(&original, &unpacked).unwrap();
    let exported = export_ids(&original).unwrap();
    assert_eq!(exported, ids);

    let json = exported.to_json_pretty().unwrap();
    let reloaded = IdMap::from_json(json.as_bytes()).unwrap();
    let repacked = work.path().join("again.pck");
    pack_directory(&unpacked, &repacked, &reloaded, &opts).unwrap();

    assert_eq!(fs::read(original).unwrap(), fs::read(repacked).unwrap());
}

#[test]
fn test_unmapped_file_policy() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let mut ids = example_tree(&src);
    write_tree(&src, &[("stray.bin", vec![1, 2, 3])]);
    let pck = work.path().join("x.pck");

    let err = pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap_err();
    assert!(matches!(err, MhpfError::MissingIdentifier { ref path } if path == "stray.bin"));
    assert!(!pck.exists(), "failed pack must not leave an archive");
    let leftovers: Vec<_> = fs::read_dir(work.path()).unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let lossy = PackOptions { unmapped: UnmappedPolicy::Drop, ..PackOptions::default() };
    assert_eq!(pack_directory(&src, &pck, &ids, &lossy).unwrap().resources, 2);

    ids.insert("stray.bin".into(), 1).unwrap();
    assert_eq!(pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap().resources, 3);
    assert_eq!(scan_archive(&pck).unwrap().entries[0].name, "stray.bin");
}

#[test]
fn test_truncated_archive_rejected() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let ids = example_tree(&src);
    let pck = work.path().join("t.pck");
    pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();

    let bytes = fs::read(&pck).unwrap();
    fs::write(&pck, &bytes[..60_000]).unwrap();
    assert!(matches!(scan_archive(&pck), Err(MhpfError::Truncated { .. })));

    let out = work.path().join("out");
    assert!(matches!(unpack_archive(&pck, &out), Err(MhpfError::Truncated { .. })));
}

#[test]
fn test_bad_magic_rejected() {
    let work = tempdir().unwrap();
    let pck = work.path().join("bad.pck");
    let mut bytes = vec![0u8; 60_000];
    bytes[..4].copy_from_slice(b"LSPK");
    fs::write(&pck, bytes).unwrap();
    assert!(matches!(scan_archive(&pck), Err(MhpfError::Format(_))));
}

#[test]
fn test_unsafe_names_not_extracted() {
    let mut files = BTreeMap::new();
    files.insert("../escape.txt".to_string(), b"gotcha".to_vec());
    let entries = vec![PackEntry { identifier: 1, name: "../escape.txt".into(), raw_size: 6 }];
    let bytes = PackWriter::new(Vec::new(), entries).unwrap().write_all(&files).unwrap();

    let work = tempdir().unwrap();
    let pck = work.path().join("evil.pck");
    fs::write(&pck, bytes).unwrap();

    let out = work.path().join("out");
    assert!(matches!(unpack_archive(&pck, &out), Err(MhpfError::Format(_))));
    assert!(!work.path().join("escape.txt").exists());
}

#[test]
fn test_empty_directory_packs() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    fs::create_dir_all(&src).unwrap();
    let pck = work.path().join("empty.pck");

    pack_directory(&src, &pck, &IdMap::new(), &PackOptions::default()).unwrap();
    let header = header_of(&pck);
    assert_eq!(header.num_resources, 0);
    assert_eq!(header.total_size, 59392);
    assert_eq!(unpack_archive(&pck, work.path().join("out")).unwrap(), 0);
}

#[cfg(unix)]
#[test]
fn test_colon_in_name_roundtrips() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    write_tree(&src, &[("level:1.dat", b"stage one".to_vec()), ("maps/x:y.bin", vec![3u8; 2100])]);
    let ids = IdMap::from_json(br#"{"1": "level:1.dat", "2": "maps/x:y.bin"}"#).unwrap();

    let pck = work.path().join("colon.pck");
    assert_eq!(pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap().resources, 2);

    let out = work.path().join("out");
    assert_eq!(unpack_archive(&pck, &out).unwrap(), 2);
    assert_eq!(fs::read(out.join("level:1.dat")).unwrap(), b"stage one");
    assert_eq!(fs::read(out.join("maps/x:y.bin")).unwrap(), vec![3u8; 2100]);
}

#[test]
fn test_drive_prefixed_name_is_a_format_error() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    fs::create_dir_all(&src).unwrap();
    let entries = vec![PackEntry { identifier: 1, name: "C:/boot.ini".into(), raw_size: 0 }];

    let err = PackWriter::new(Vec::new(), entries)
        .unwrap()
        .write_all(&DirSource::new(&src))
        .unwrap_err();
    assert!(matches!(err, MhpfError::Format(_)));
}

#[cfg(unix)]
#[test]
fn test_symlinked_file_is_packed() {
    let work = tempdir().unwrap();
    let src = work.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(work.path().join("real.bin"), b"linked content").unwrap();
    std::os::unix::fs::symlink("../real.bin", src.join("link.bin")).unwrap();
    let ids = IdMap::from_json(br#"{"1": "link.bin"}"#).unwrap();

    let pck = work.path().join("link.pck");
    assert_eq!(pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap().resources, 1);

    let out = work.path().join("out");
    unpack_archive(&pck, &out).unwrap();
    assert_eq!(fs::read(out.join("link.bin")).unwrap(), b"linked content");
}

#[cfg(unix)]
#[test]
fn test_output_permissions_match_a_plain_create() {
    use std::os::unix::fs::PermissionsExt;

    let work = tempdir().unwrap();
    let src = work.path().join("src");
    let ids = example_tree(&src);
    let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;

    let plain = work.path().join("plain.bin");
    fs::File::create(&plain).unwrap();
    let pck = work.path().join("new.pck");
    pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();
    assert_eq!(mode(&pck), mode(&plain));

    fs::set_permissions(&pck, fs::Permissions::from_mode(0o640)).unwrap();
    pack_directory(&src, &pck, &ids, &PackOptions::default()).unwrap();
    assert_eq!(mode(&pck), 0o640);
}

#[test]
fn test_exported_ids_keep_stored_names() {
    let mut files = BTreeMap::new();
    files.insert("dir\\file.bin".to_string(), b"win".to_vec());
    let entries = vec![PackEntry { identifier: 4, name: "dir\\file.bin".into(), raw_size: 3 }];
    let bytes = PackWriter::new(Vec::new(), entries).unwrap().write_all(&files).unwrap();

    let work = tempdir().unwrap();
    let pck = work.path().join("win.pck");
    fs::write(&pck, bytes).unwrap();

    let ids = export_ids(&pck).unwrap();
    let names: Vec<_> = scan_archive(&pck).unwrap().entries.into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["dir\\file.bin"]);
    assert_eq!(ids.get(&names[0]), Some(4));
}
