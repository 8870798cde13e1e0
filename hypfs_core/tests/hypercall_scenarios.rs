//! End-to-end hypercall behaviour against a populated tree
//!
//! These tests drive [`Hypfs::do_hypfs_op`] the way a guest would: path and
//! data buffers live in a simulated guest address space and every result is
//! the raw signed return value.

use hypfs_abi::{DirRecords, DomainId, Errno, GuestAddr, HypercallArgs, HypfsOp, MAX_PATHLEN};
use hypfs_core::{
    Caller, EntryId, HypercallEvent, Hypfs, ManifestEntry, SimulatedGuestMemory, Tree,
    TreeError, TreeManifest,
};
use std::io::Write;

struct Guest {
    caller: Caller,
    mem: SimulatedGuestMemory,
}

impl Guest {
    fn control() -> Self {
        Self {
            caller: Caller::control(),
            mem: SimulatedGuestMemory::new(),
        }
    }

    fn unprivileged() -> Self {
        Self {
            caller: Caller::guest(DomainId(9)),
            mem: SimulatedGuestMemory::new(),
        }
    }

    fn call(&mut self, fs: &Hypfs, op: HypfsOp, path: &str, buf: GuestAddr, buf_len: u64) -> i64 {
        let mut bytes = path.as_bytes().to_vec();
        bytes.push(0);
        let path_addr = self.mem.map_readonly(&bytes);
        let args = HypercallArgs {
            cmd: op.code(),
            path: path_addr,
            path_len: bytes.len() as u64,
            buf,
            buf_len,
        };
        let ret = fs.do_hypfs_op(self.caller, &mut self.mem, args);
        self.mem.unmap_region(path_addr);
        ret
    }

    /// Reads with a buffer of exactly `len` bytes and returns (ret, bytes)
    fn read(&mut self, fs: &Hypfs, op: HypfsOp, path: &str, len: usize) -> (i64, Vec<u8>) {
        let buf = self.mem.map_region(len);
        let ret = self.call(fs, op, path, buf, len as u64);
        let bytes = self.mem.read(buf, len).unwrap();
        self.mem.unmap_region(buf);
        (ret, bytes)
    }
}

fn errno(ret: i64) -> Errno {
    Errno::from_code(i32::try_from(-ret).unwrap()).unwrap()
}

/// `/a -> "x"`, `/b/c -> "yy"`
fn scenario_tree() -> Tree {
    let mut tree = Tree::new();
    tree.new_string_leaf(EntryId::ROOT, "a", "x").unwrap();
    let b = tree.new_dir(EntryId::ROOT, "b", None).unwrap();
    tree.new_string_leaf(b, "c", "yy").unwrap();
    tree
}

#[test]
fn test_read_contents_negotiation() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    let ret = guest.call(&fs, HypfsOp::ReadContents, "/b/c", GuestAddr::NULL, 0);
    assert_eq!(ret, 3);

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadContents, "/b/c", 3);
    assert_eq!(ret, 0);
    assert_eq!(bytes, b"yy\0");
}

#[test]
fn test_read_dir_root_listing() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    let need = guest.call(&fs, HypfsOp::ReadDir, "/", GuestAddr::NULL, 0);
    assert_eq!(need, 32);

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadDir, "/", need as usize);
    assert_eq!(ret, 0);
    let records: Vec<_> = DirRecords::new(&bytes).map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!((records[0].name, records[0].is_dir()), ("a", false));
    assert_eq!(records[0].header.content_len, 2);
    assert_eq!((records[1].name, records[1].is_dir()), ("b", true));
    assert_eq!(records[1].header.content_len, 16);
}

#[test]
fn test_read_dir_single_child() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadDir, "/b", 16);
    assert_eq!(ret, 0);
    let records: Vec<_> = DirRecords::new(&bytes).map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "c");
    assert!(!records[0].is_dir());
    assert_eq!(records[0].header.off_next, 0);
}

#[test]
fn test_duplicate_insert_keeps_size() {
    let mut tree = scenario_tree();
    let before = tree.content_size(EntryId::ROOT);
    assert_eq!(
        tree.new_string_leaf(EntryId::ROOT, "a", "again"),
        Err(TreeError::AlreadyExists("a".to_string()))
    );
    assert_eq!(tree.content_size(EntryId::ROOT), before);
}

#[test]
fn test_repeated_reads_are_identical() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    let first = guest.read(&fs, HypfsOp::ReadDir, "/", 64);
    let second = guest.read(&fs, HypfsOp::ReadDir, "/", 64);
    assert_eq!(first, second);

    let first = guest.read(&fs, HypfsOp::ReadContents, "/a", 8);
    let second = guest.read(&fs, HypfsOp::ReadContents, "/a", 8);
    assert_eq!(first, second);
}

#[test]
fn test_long_values_round_trip() {
    let mut tree = Tree::new();
    let values: Vec<String> = [0usize, 1, 3, 4, 255, MAX_PATHLEN - 1]
        .iter()
        .map(|len| "v".repeat(*len))
        .collect();
    for (i, value) in values.iter().enumerate() {
        tree.new_string_leaf(EntryId::ROOT, &format!("leaf{}", i), value.as_str())
            .unwrap();
    }
    let fs = Hypfs::new(tree);
    let mut guest = Guest::control();

    for (i, value) in values.iter().enumerate() {
        let path = format!("/leaf{}", i);
        let (ret, bytes) = guest.read(&fs, HypfsOp::ReadContents, &path, value.len() + 1);
        assert_eq!(ret, 0);
        assert_eq!(&bytes[..value.len()], value.as_bytes());
        assert_eq!(bytes[value.len()], 0);
    }
}

#[test]
fn test_boundary_errors() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    let ret = guest.call(&fs, HypfsOp::ReadContents, "relative", GuestAddr::NULL, 0);
    assert_eq!(errno(ret), Errno::NotFound);

    let ret = guest.call(&fs, HypfsOp::ReadContents, "/b", GuestAddr::NULL, 0);
    assert_eq!(errno(ret), Errno::IsDirectory);

    let ret = guest.call(&fs, HypfsOp::ReadDir, "/a", GuestAddr::NULL, 0);
    assert_eq!(errno(ret), Errno::NotADirectory);

    let long = format!("/{}", "p".repeat(MAX_PATHLEN));
    let ret = guest.call(&fs, HypfsOp::ReadContents, &long, GuestAddr::NULL, 0);
    assert_eq!(errno(ret), Errno::InvalidArgument);
}

#[test]
fn test_unprivileged_caller_sees_nothing() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::unprivileged();

    for op in [HypfsOp::GetVersion, HypfsOp::ReadContents, HypfsOp::ReadDir] {
        let ret = guest.call(&fs, op, "/a", GuestAddr::NULL, 0);
        assert_eq!(errno(ret), Errno::PermissionDenied);
    }
    assert_eq!(
        fs.audit_log().count_events(|e| matches!(
            e,
            HypercallEvent::Rejected {
                errno: Errno::PermissionDenied,
                ..
            }
        )),
        3
    );
}

#[cfg(feature = "writable")]
#[test]
fn test_write_then_read_back() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();
    let root_size = fs.with_tree(|t| t.content_size(EntryId::ROOT));

    let data = guest.mem.map_readonly(b"zzz\0");
    let ret = guest.call(&fs, HypfsOp::WriteContents, "/a", data, 4);
    assert_eq!(ret, 0);

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadContents, "/a", 4);
    assert_eq!(ret, 0);
    assert_eq!(bytes, b"zzz\0");
    assert_eq!(fs.with_tree(|t| t.content_size(EntryId::ROOT)), root_size);

    // The parent's record reports the new leaf size
    let (_, listing) = guest.read(&fs, HypfsOp::ReadDir, "/", 32);
    let first = DirRecords::new(&listing).next().unwrap().unwrap();
    assert_eq!(first.header.content_len, 4);
}

#[test]
fn test_registration_after_boot() {
    let fs = Hypfs::new(scenario_tree());
    let mut guest = Guest::control();

    fs.with_tree_mut(|tree| {
        let b = tree.get_entry("/b").unwrap();
        tree.new_string_leaf(b, "d", "late").unwrap();
    });

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadContents, "/b/d", 5);
    assert_eq!(ret, 0);
    assert_eq!(bytes, b"late\0");
}

#[test]
fn test_manifest_file_boot() {
    let manifest = TreeManifest::new(vec![
        ManifestEntry::leaf("/a", "x"),
        ManifestEntry::leaf("/b/c", "yy"),
        ManifestEntry::readonly_leaf("/buildinfo/version", "1.0"),
    ]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(manifest.to_json().unwrap().as_bytes()).unwrap();

    let loaded = TreeManifest::from_file(file.path()).unwrap();
    assert_eq!(loaded, manifest);

    let fs = Hypfs::new(Tree::from_manifest(&loaded).unwrap());
    let mut guest = Guest::control();

    let (ret, bytes) = guest.read(&fs, HypfsOp::ReadContents, "/buildinfo/version", 4);
    assert_eq!(ret, 0);
    assert_eq!(bytes, b"1.0\0");

    #[cfg(feature = "writable")]
    {
        let data = guest.mem.map_readonly(b"2.0\0");
        let ret = guest.call(&fs, HypfsOp::WriteContents, "/buildinfo/version", data, 4);
        assert_eq!(errno(ret), Errno::AccessDenied);
    }
}

#[test]
fn test_manifest_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = TreeManifest::from_file(dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.errno(), Errno::Io);
}
