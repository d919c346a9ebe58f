// Whole-database checks against files written by StoreBuilder and then
// corrupted byte-by-byte.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use oorandom::Rand64;

use boltcheck::cli::{CheckOrchestrator, CheckOutcome, FileStoreOpener, TextReporter};
use boltcheck::consts::{OFF_PAGE_COUNT, OFF_PAGE_FLAGS, OFF_PAGE_ID, PAGE_HEADER_SIZE};
use boltcheck::{
    CheckError, CheckOptions, Meta, ReadableKvStringer, Store, StoreBuilder, StoreOptions,
};

const PS: u32 = 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("boltcheck-db-{prefix}-{pid}-{t}-{id}"))
}

fn db_path(prefix: &str) -> Result<PathBuf> {
    let root = unique_root(prefix);
    fs::create_dir_all(&root)?;
    Ok(root.join("my.db"))
}

fn check_all(path: &Path) -> Result<Vec<CheckError>> {
    let store = Store::open_ro(path, &StoreOptions::default())?;
    store.view(|tx| {
        let opts = CheckOptions::new().with_kv_stringer(ReadableKvStringer);
        Ok(tx.check(opts)?.collect())
    })
}

fn patch(path: &Path, off: u64, bytes: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new().write(true).open(path)?;
    f.seek(SeekFrom::Start(off))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    Ok(())
}

fn page_off(pgid: u64) -> u64 {
    pgid * PS as u64
}

/// Absolute file offset of `needle` inside page `pgid`.
fn find_in_page(path: &Path, pgid: u64, needle: &[u8]) -> Result<u64> {
    let data = fs::read(path)?;
    let start = page_off(pgid) as usize;
    let page = &data[start..start + PS as usize];
    let pos = page
        .windows(needle.len())
        .position(|w| w == needle)
        .ok_or_else(|| anyhow::anyhow!("needle not found in page {}", pgid))?;
    Ok((start + pos) as u64)
}

fn kinds(errs: &[CheckError]) -> Vec<&'static str> {
    errs.iter().map(|e| e.kind()).collect()
}

#[test]
fn fresh_store_is_clean() -> Result<()> {
    let path = db_path("clean")?;
    let mut b = StoreBuilder::new(PS).free_pages(3).bucket(b"empty");
    for i in 0..500u32 {
        b = b.put(b"widgets", format!("key-{:05}", i).as_bytes(), &[0xAB; 20]);
    }
    let sum = b.put(b"small", b"k", b"v").write(&path)?;
    assert!(sum.hwm > 20);

    assert!(check_all(&path)?.is_empty());

    let mut orch = CheckOrchestrator::new(
        FileStoreOpener::default(),
        TextReporter::new(Vec::new()),
    );
    let outcome = orch.run(&path, None);
    assert!(outcome.is_clean(), "outcome: {:?}", outcome);
    assert_eq!(String::from_utf8(orch.into_reporter().into_inner())?, "OK\n");
    Ok(())
}

#[test]
fn dropped_free_page_is_unreachable_unfreed() -> Result<()> {
    let path = db_path("unfreed")?;
    let sum = StoreBuilder::new(PS)
        .free_pages(3)
        .put(b"b", b"k1", b"v1")
        .write(&path)?;

    // count 3 → 2: последняя свободная страница выпадает из free-list
    let mut cnt = [0u8; 2];
    LittleEndian::write_u16(&mut cnt, 2);
    patch(&path, page_off(sum.freelist) + OFF_PAGE_COUNT as u64, &cnt)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![CheckError::UnreachableUnfreed {
            page: sum.free_pages[2]
        }]
    );
    assert_eq!(
        errs[0].to_string(),
        format!("page {}: unreachable unfreed", sum.free_pages[2])
    );
    Ok(())
}

#[test]
fn bucket_root_on_freelist_is_reachable_freed() -> Result<()> {
    let path = db_path("reachable-freed")?;
    let sum = StoreBuilder::new(PS)
        .free_pages(3)
        .put(b"a", b"k1", b"v1")
        .put(b"b", b"k1", b"v1")
        .write(&path)?;
    let root_b = sum.bucket_roots[&b"b".to_vec()];

    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, root_b);
    patch(&path, page_off(sum.freelist) + 16 + 2 * 8, &id)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![
            CheckError::ReachableFreed { page: root_b },
            CheckError::UnreachableUnfreed {
                page: sum.free_pages[2]
            },
        ]
    );
    Ok(())
}

#[test]
fn duplicate_freelist_entry_is_already_freed() -> Result<()> {
    let path = db_path("double-free")?;
    let sum = StoreBuilder::new(PS)
        .free_pages(3)
        .put(b"b", b"k1", b"v1")
        .write(&path)?;

    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, sum.free_pages[0]);
    patch(&path, page_off(sum.freelist) + 16 + 2 * 8, &id)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![
            CheckError::AlreadyFreed {
                page: sum.free_pages[0]
            },
            CheckError::UnreachableUnfreed {
                page: sum.free_pages[2]
            },
        ]
    );
    Ok(())
}

#[test]
fn swapped_leaf_key_breaks_order() -> Result<()> {
    let path = db_path("key-order")?;
    let sum = StoreBuilder::new(PS)
        .put(b"kv", b"k1", b"xx")
        .put(b"kv", b"k2", b"xx")
        .put(b"kv", b"k3", b"xx")
        .write(&path)?;
    let root = sum.bucket_roots[&b"kv".to_vec()];

    let off = find_in_page(&path, root, b"k1")?;
    patch(&path, off, b"k9")?;

    let errs = check_all(&path)?;
    assert_eq!(errs.len(), 1, "{:?}", errs);
    assert_eq!(
        errs[0].to_string(),
        format!(
            "key[1]=k2 on leaf page({root}) needs to be > (found <) than previous element k9. Stack: [{root}]"
        )
    );
    Ok(())
}

#[test]
fn child_key_outside_parent_range_is_reported() -> Result<()> {
    let path = db_path("key-range")?;
    let mut b = StoreBuilder::new(PS);
    for i in 0..200u32 {
        b = b.put(b"big", format!("key-{:05}", i).as_bytes(), &[1; 20]);
    }
    let sum = b.write(&path)?;
    let root = sum.bucket_roots[&b"big".to_vec()];

    // первый лист: последний ключ поднимаем выше границы следующего ребёнка
    let store = Store::open_ro(&path, &StoreOptions::default())?;
    let (first_leaf, needle) = store.view(|tx| {
        let p = tx.page(root)?;
        assert!(p.is_branch());
        let first_leaf = p.branch_element(0)?.pgid;
        let leaf = tx.page(first_leaf)?;
        let last = leaf.leaf_element(leaf.count() as usize - 1)?;
        Ok((first_leaf, last.key.to_vec()))
    })?;
    store.close();

    let off = find_in_page(&path, first_leaf, &needle)?;
    patch(&path, off, b"key-9")?;

    let errs = check_all(&path)?;
    assert!(kinds(&errs).contains(&"key_above_bound"), "{:?}", errs);
    assert!(errs.iter().all(|e| e.page() == Some(first_leaf)));
    Ok(())
}

#[test]
fn first_key_below_parent_separator_is_reported() -> Result<()> {
    let path = db_path("key-below")?;
    let mut b = StoreBuilder::new(PS);
    for i in 0..200u32 {
        b = b.put(b"big", format!("key-{:05}", i).as_bytes(), &[1; 20]);
    }
    let sum = b.write(&path)?;
    let root = sum.bucket_roots[&b"big".to_vec()];

    let store = Store::open_ro(&path, &StoreOptions::default())?;
    let (second_leaf, separator) = store.view(|tx| {
        let sep = tx.page(root)?.branch_element(1)?;
        Ok((sep.pgid, sep.key.to_vec()))
    })?;
    store.close();

    // "key-00022" → "key-!0022": меньше разделителя в родителе
    let off = find_in_page(&path, second_leaf, &separator)?;
    patch(&path, off + 4, b"!")?;
    let mut lowered = separator.clone();
    lowered[4] = b'!';

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![CheckError::KeyBelowAncestor {
            page: second_leaf,
            page_kind: "leaf",
            index: 0,
            key: String::from_utf8(lowered)?,
            ancestor: String::from_utf8(separator)?,
            stack: vec![root, second_leaf],
        }]
    );
    Ok(())
}

#[test]
fn stored_page_id_must_match_its_slot() -> Result<()> {
    let path = db_path("header-id")?;
    let sum = StoreBuilder::new(PS).put(b"b", b"k", b"v").write(&path)?;
    let root_b = sum.bucket_roots[&b"b".to_vec()];

    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, 999);
    patch(&path, page_off(root_b) + OFF_PAGE_ID as u64, &id)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![CheckError::HeaderIdMismatch {
            page: root_b,
            found: 999
        }]
    );
    assert_eq!(
        errs[0].to_string(),
        format!("page {}: header id mismatch: found 999", root_b)
    );
    Ok(())
}

#[test]
fn leaf_key_past_page_span_is_malformed() -> Result<()> {
    let path = db_path("malformed")?;
    let sum = StoreBuilder::new(PS).put(b"b", b"k", b"v").write(&path)?;
    let root_b = sum.bucket_roots[&b"b".to_vec()];

    // leaf-элемент 0: [flags u32][pos u32][ksize u32][vsize u32]
    patch(
        &path,
        page_off(root_b) + PAGE_HEADER_SIZE as u64 + 8,
        &u32::MAX.to_le_bytes(),
    )?;

    let errs = check_all(&path)?;
    assert_eq!(errs.len(), 1, "{:?}", errs);
    match &errs[0] {
        CheckError::Malformed { page, detail } => {
            assert_eq!(*page, root_b);
            assert!(detail.contains("key of leaf element 0"), "{}", detail);
            assert!(detail.contains("exceeds page span"), "{}", detail);
        }
        other => panic!("unexpected finding {:?}", other),
    }
    Ok(())
}

#[test]
fn two_buckets_sharing_a_root_is_multiple_references() -> Result<()> {
    let path = db_path("multi-ref")?;
    let sum = StoreBuilder::new(PS)
        .put(b"bucket-a", b"k", b"v")
        .put(b"bucket-b", b"k", b"v")
        .write(&path)?;
    let root_a = sum.bucket_roots[&b"bucket-a".to_vec()];
    let root_b = sum.bucket_roots[&b"bucket-b".to_vec()];

    let off = find_in_page(&path, sum.root, b"bucket-b")?;
    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, root_a);
    patch(&path, off + 8, &id)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![
            CheckError::MultipleReferences {
                page: root_a,
                stack: vec![root_a]
            },
            CheckError::UnreachableUnfreed { page: root_b },
        ]
    );
    Ok(())
}

#[test]
fn unknown_page_flags_are_invalid_type() -> Result<()> {
    let path = db_path("invalid-type")?;
    let sum = StoreBuilder::new(PS).put(b"b", b"k", b"v").write(&path)?;
    let root_b = sum.bucket_roots[&b"b".to_vec()];

    let mut flags = [0u8; 2];
    LittleEndian::write_u16(&mut flags, 0x20);
    patch(&path, page_off(root_b) + OFF_PAGE_FLAGS as u64, &flags)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![CheckError::InvalidType {
            page: root_b,
            page_type: "unknown<20>".into(),
            stack: vec![root_b]
        }]
    );
    Ok(())
}

#[test]
fn bucket_root_past_hwm_is_out_of_bounds() -> Result<()> {
    let path = db_path("oob")?;
    let sum = StoreBuilder::new(PS)
        .put(b"bucket-a", b"k", b"v")
        .put(b"bucket-b", b"k", b"v")
        .write(&path)?;
    let root_b = sum.bucket_roots[&b"bucket-b".to_vec()];

    let off = find_in_page(&path, sum.root, b"bucket-b")?;
    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, sum.hwm + 3);
    patch(&path, off + 8, &id)?;

    let errs = check_all(&path)?;
    assert_eq!(
        kinds(&errs),
        vec!["out_of_bounds", "unreadable", "unreachable_unfreed"]
    );
    assert_eq!(errs[0].page(), Some(sum.hwm + 3));
    assert_eq!(errs[2].page(), Some(root_b));
    Ok(())
}

#[test]
fn hwm_past_end_of_file_is_reported_once() -> Result<()> {
    let path = db_path("hwm")?;
    let sum = StoreBuilder::new(PS).put(b"b", b"k", b"v").write(&path)?;

    let mut data = fs::read(&path)?;
    for id in [0u64, 1] {
        let off = page_off(id) as usize;
        let buf = &mut data[off..off + PS as usize];
        let mut m = Meta::decode(buf)?;
        m.pgid += 10;
        m.encode(id, buf);
    }
    fs::write(&path, &data)?;

    let errs = check_all(&path)?;
    assert_eq!(
        errs,
        vec![CheckError::HwmBeyondFile {
            hwm: sum.hwm + 10,
            file_pages: sum.hwm
        }]
    );
    Ok(())
}

#[test]
fn corrupt_store_through_orchestrator() -> Result<()> {
    let path = db_path("orch-corrupt")?;
    let sum = StoreBuilder::new(PS)
        .free_pages(3)
        .put(b"b", b"k", b"v")
        .write(&path)?;
    let mut cnt = [0u8; 2];
    LittleEndian::write_u16(&mut cnt, 1);
    patch(&path, page_off(sum.freelist) + OFF_PAGE_COUNT as u64, &cnt)?;

    let mut orch = CheckOrchestrator::new(
        FileStoreOpener::default(),
        TextReporter::new(Vec::new()),
    );
    let outcome = orch.run(&path, None);
    assert!(matches!(outcome, CheckOutcome::Corrupt { count: 2 }));
    let out = String::from_utf8(orch.into_reporter().into_inner())?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!("page {}: unreachable unfreed", sum.free_pages[1]),
            format!("page {}: unreachable unfreed", sum.free_pages[2]),
            "2 errors found".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn repeated_checks_agree() -> Result<()> {
    let path = db_path("idempotent")?;
    let sum = StoreBuilder::new(PS)
        .free_pages(2)
        .put(b"a", b"k1", b"v")
        .put(b"b", b"k1", b"v")
        .write(&path)?;
    let mut id = [0u8; 8];
    LittleEndian::write_u64(&mut id, sum.bucket_roots[&b"a".to_vec()]);
    patch(&path, page_off(sum.freelist) + 16, &id)?;

    let first = check_all(&path)?;
    let second = check_all(&path)?;
    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn random_stores_are_clean() -> Result<()> {
    let mut rng = Rand64::new(0xB01C_u128);
    for round in 0..4 {
        let path = db_path(&format!("random-{round}"))?;
        let mut b = StoreBuilder::new(PS).free_pages((rng.rand_u64() % 40) as usize);
        let buckets = 1 + rng.rand_u64() % 5;
        for _ in 0..800 {
            let bucket = format!("bucket-{}", rng.rand_u64() % buckets);
            let klen = 1 + (rng.rand_u64() % 32) as usize;
            let key: Vec<u8> = (0..klen).map(|_| rng.rand_u64() as u8).collect();
            let vlen = match rng.rand_u64() % 50 {
                0 => 2 * PS as usize + (rng.rand_u64() % 512) as usize,
                _ => (rng.rand_u64() % 100) as usize,
            };
            let value = vec![0x5A; vlen];
            b = b.put(bucket.as_bytes(), &key, &value);
        }
        b.write(&path)?;

        let errs = check_all(&path)?;
        assert!(errs.is_empty(), "round {round}: {:?}", errs);

        // то же самое без mmap
        let store = Store::open_ro(
            &path,
            &StoreOptions {
                mmap: false,
                ..StoreOptions::default()
            },
        )?;
        let n = store.view(|tx| Ok(tx.check(CheckOptions::new())?.count()))?;
        assert_eq!(n, 0);
    }
    Ok(())
}
