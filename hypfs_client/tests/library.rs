//! Client library against an in-process filesystem
//!
//! Every test runs the full path: handle, bounce buffers, hypercall
//! dispatch, tree, and decoding back into owned results.

use hypfs_abi::{DomainId, Errno, HypfsOp, HYPFS_VERSION};
use hypfs_client::errno::{clear_last_error, last_error};
use hypfs_client::{
    ClientConfig, DirentRef, HypfsError, HypfsHandle, LoopbackTransport, WalkEntry,
};
use hypfs_core::{Caller, EntryId, HypercallEvent, Hypfs, ManifestEntry, Tree, TreeManifest};
use hypfs_log::{LogLevel, Logger, MemoryLogger};
use std::sync::Arc;

/// `/a -> "x"`, `/b/c -> "yy"`, plus a read-only leaf and an empty directory
fn sample_tree() -> Tree {
    let mut tree = Tree::new();
    tree.new_string_leaf(EntryId::ROOT, "a", "x").unwrap();
    let b = tree.new_dir(EntryId::ROOT, "b", None).unwrap();
    tree.new_string_leaf(b, "c", "yy").unwrap();
    tree.new_dir(EntryId::ROOT, "empty", None).unwrap();
    tree.new_readonly_string_leaf(EntryId::ROOT, "ro", "fixed").unwrap();
    tree
}

fn connect(fs: &Arc<Hypfs>, caller: Caller) -> (HypfsHandle<LoopbackTransport>, Arc<MemoryLogger>) {
    let logger = Arc::new(MemoryLogger::new());
    let handle = HypfsHandle::open(
        LoopbackTransport::new(Arc::clone(fs), caller),
        Some(logger.clone() as Arc<dyn Logger>),
        0,
    );
    (handle, logger)
}

fn control() -> (Arc<Hypfs>, HypfsHandle<LoopbackTransport>, Arc<MemoryLogger>) {
    let fs = Arc::new(Hypfs::new(sample_tree()));
    let (handle, logger) = connect(&fs, Caller::control());
    (fs, handle, logger)
}

#[test]
fn test_reads_and_listing() {
    let (_fs, mut handle, _) = control();

    assert_eq!(handle.read("/a").unwrap(), "x");
    assert_eq!(handle.read("/b/c").unwrap(), "yy");

    let listing = handle.read_dir("/").unwrap();
    let entries: Vec<DirentRef<'_>> = listing.iter().collect();
    assert_eq!(
        entries,
        vec![
            DirentRef { name: "a", is_dir: false },
            DirentRef { name: "b", is_dir: true },
            DirentRef { name: "empty", is_dir: true },
            DirentRef { name: "ro", is_dir: false },
        ]
    );
    assert_eq!(handle.transport().outstanding_buffers(), 0);
}

#[test]
fn test_single_child_listing() {
    let (_fs, mut handle, _) = control();
    let listing = handle.read_dir("/b").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing.get(0), Some(DirentRef { name: "c", is_dir: false }));
    assert_eq!(listing.name_region(), "c\0");
}

#[test]
fn test_empty_directory() {
    let (_fs, mut handle, _) = control();
    let listing = handle.read_dir("/empty").unwrap();
    assert!(listing.is_empty());
    assert_eq!(handle.transport().outstanding_buffers(), 0);
}

#[test]
fn test_missing_path_reports_not_found() {
    let (_fs, mut handle, logger) = control();
    clear_last_error();

    let err = handle.read("/nope").unwrap_err();
    assert_eq!(err, HypfsError::Hypervisor(Errno::NotFound));
    assert_eq!(last_error(), Some(Errno::NotFound));
    assert!(logger.has_entry(|e| e.level == LogLevel::Warn
        && e.field("path") == Some("/nope")
        && e.field("errno") == Some("2")));
    assert_eq!(handle.transport().outstanding_buffers(), 0);
}

#[test]
fn test_kind_errors() {
    let (_fs, mut handle, _) = control();
    assert_eq!(
        handle.read("/b").unwrap_err(),
        HypfsError::Hypervisor(Errno::IsDirectory)
    );
    assert_eq!(
        handle.read_dir("/a").unwrap_err(),
        HypfsError::Hypervisor(Errno::NotADirectory)
    );
    assert_eq!(last_error(), Some(Errno::NotADirectory));
    assert_eq!(
        handle.read("relative").unwrap_err(),
        HypfsError::Hypervisor(Errno::NotFound)
    );
}

#[test]
fn test_large_value_needs_second_round() {
    let mut tree = sample_tree();
    let big = "v".repeat(5000);
    tree.new_string_leaf(EntryId::ROOT, "big", big.clone()).unwrap();
    let fs = Arc::new(Hypfs::new(tree));
    let (mut handle, logger) = connect(&fs, Caller::control());

    assert_eq!(handle.read("/big").unwrap(), big);
    assert!(logger.has_entry(|e| e.level == LogLevel::Debug && e.field("need") == Some("5001")));
    assert_eq!(
        fs.audit_log().count_events(|e| matches!(
            e,
            HypercallEvent::Completed { op, .. } if op == "read_contents"
        )),
        2
    );
    assert_eq!(handle.transport().outstanding_buffers(), 0);
}

#[test]
fn test_small_initial_buffer() {
    let fs = Arc::new(Hypfs::new(sample_tree()));
    let config = ClientConfig {
        initial_buffer_size: 1,
        max_negotiation_rounds: 2,
    };
    let transport = LoopbackTransport::new(Arc::clone(&fs), Caller::control());
    let mut handle = HypfsHandle::open_with_config(transport, None, 0, config).unwrap();

    assert_eq!(handle.read("/b/c").unwrap(), "yy");
    assert_eq!(handle.read_dir("/").unwrap().len(), 4);
}

#[test]
fn test_empty_directory_with_tiny_buffer() {
    let fs = Arc::new(Hypfs::new(sample_tree()));
    for initial_buffer_size in [1, 4, 12] {
        let config = ClientConfig {
            initial_buffer_size,
            max_negotiation_rounds: 2,
        };
        let transport = LoopbackTransport::new(Arc::clone(&fs), Caller::control());
        let mut handle = HypfsHandle::open_with_config(transport, None, 0, config).unwrap();

        let listing = handle.read_dir("/empty").unwrap();
        assert!(listing.is_empty(), "buffer of {} bytes", initial_buffer_size);
        assert_eq!(handle.walk("/").unwrap().len(), 5);
        assert_eq!(handle.transport().outstanding_buffers(), 0);
    }
}

#[test]
fn test_long_path_never_reaches_hypervisor() {
    let (fs, mut handle, _) = control();
    let path = format!("/{}", "n".repeat(2000));

    let err = handle.read(&path).unwrap_err();
    assert_eq!(err, HypfsError::NameTooLong { len: 2002 });
    assert_eq!(last_error(), Some(Errno::NameTooLong));
    assert!(fs.audit_log().is_empty());
}

#[test]
fn test_unprivileged_domain() {
    let fs = Arc::new(Hypfs::new(sample_tree()));
    let (mut handle, _) = connect(&fs, Caller::guest(DomainId(5)));

    assert_eq!(
        handle.read("/a").unwrap_err(),
        HypfsError::Hypervisor(Errno::PermissionDenied)
    );
    assert_eq!(
        handle.version().unwrap_err(),
        HypfsError::Hypervisor(Errno::PermissionDenied)
    );
    assert_eq!(last_error(), Some(Errno::PermissionDenied));

    let (mut hardware, _) = connect(&fs, Caller::hardware(DomainId(1)));
    assert_eq!(hardware.read("/a").unwrap(), "x");
}

#[test]
fn test_version() {
    let (_fs, mut handle, _) = control();
    assert_eq!(handle.version().unwrap(), HYPFS_VERSION as u64);
}

#[test]
fn test_walk() {
    let (_fs, mut handle, _) = control();
    let walked = handle.walk("/").unwrap();
    let expected = vec![
        WalkEntry { depth: 0, path: "/a".to_string(), is_dir: false },
        WalkEntry { depth: 0, path: "/b".to_string(), is_dir: true },
        WalkEntry { depth: 1, path: "/b/c".to_string(), is_dir: false },
        WalkEntry { depth: 0, path: "/empty".to_string(), is_dir: true },
        WalkEntry { depth: 0, path: "/ro".to_string(), is_dir: false },
    ];
    assert_eq!(walked, expected);

    assert_eq!(
        handle.walk("/b").unwrap(),
        vec![WalkEntry { depth: 0, path: "/b/c".to_string(), is_dir: false }]
    );
    assert_eq!(handle.transport().outstanding_buffers(), 0);
}

#[test]
fn test_repeated_reads_are_stable() {
    let (_fs, mut handle, _) = control();
    let first = handle.read_dir("/").unwrap();
    let second = handle.read_dir("/").unwrap();
    assert_eq!(first, second);
    assert_eq!(handle.read("/a").unwrap(), handle.read("/a").unwrap());
}

#[test]
fn test_handles_are_independent() {
    let fs = Arc::new(Hypfs::new(sample_tree()));
    let (mut first, _) = connect(&fs, Caller::control());
    let (mut second, _) = connect(&fs, Caller::guest(DomainId(3)));

    assert_ne!(first.id(), second.id());
    assert!(second.read("/a").is_err());
    assert_eq!(first.read("/a").unwrap(), "x");
}

#[test]
fn test_tree_from_manifest() {
    let manifest = TreeManifest::new(vec![
        ManifestEntry::dir("/buildinfo"),
        ManifestEntry::readonly_leaf("/buildinfo/changeset", "abcdef"),
        ManifestEntry::leaf("/params/loglvl", "warning"),
    ]);
    let fs = Arc::new(Hypfs::new(Tree::from_manifest(&manifest).unwrap()));
    let (mut handle, _) = connect(&fs, Caller::control());

    assert_eq!(handle.read("/buildinfo/changeset").unwrap(), "abcdef");
    let names: Vec<String> = handle
        .read_dir("/")
        .unwrap()
        .iter()
        .map(|d| d.name.to_string())
        .collect();
    assert_eq!(names, vec!["buildinfo", "params"]);
}

#[cfg(feature = "writable")]
mod writes {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let (fs, mut handle, _) = control();
        let before = fs.with_tree(|t| t.content_size(t.root()));

        handle.write("/a", "zzz").unwrap();
        assert_eq!(handle.read("/a").unwrap(), "zzz");

        let after = fs.with_tree(|t| t.content_size(t.root()));
        assert_eq!(before, after);
        assert_eq!(handle.transport().outstanding_buffers(), 0);
    }

    #[test]
    fn test_write_is_audited() {
        let (fs, mut handle, _) = control();
        handle.write("/b/c", "a longer value").unwrap();
        assert_eq!(handle.read("/b/c").unwrap(), "a longer value");
        assert!(fs.audit_log().has_event(|e| matches!(
            e,
            HypercallEvent::Completed { op, ret: 0, .. } if op == HypfsOp::WriteContents.name()
        )));
    }

    #[test]
    fn test_write_rejections() {
        let (_fs, mut handle, _) = control();
        assert_eq!(
            handle.write("/ro", "new").unwrap_err(),
            HypfsError::Hypervisor(Errno::AccessDenied)
        );
        assert_eq!(handle.read("/ro").unwrap(), "fixed");

        assert_eq!(
            handle.write("/b", "x").unwrap_err(),
            HypfsError::Hypervisor(Errno::IsDirectory)
        );
        assert_eq!(
            handle.write("/nope", "x").unwrap_err(),
            HypfsError::Hypervisor(Errno::NotFound)
        );
        assert_eq!(last_error(), Some(Errno::NotFound));
        assert_eq!(handle.transport().outstanding_buffers(), 0);
    }

    #[test]
    fn test_guest_cannot_write() {
        let fs = Arc::new(Hypfs::new(sample_tree()));
        let (mut handle, _) = connect(&fs, Caller::guest(DomainId(2)));
        assert_eq!(
            handle.write("/a", "zzz").unwrap_err(),
            HypfsError::Hypervisor(Errno::PermissionDenied)
        );
        let value = fs.with_tree(|t| {
            let id = t.get_entry("/a").unwrap();
            t.entry(id).unwrap().value().map(str::to_string)
        });
        assert_eq!(value, Some("x".to_string()));
    }
}
