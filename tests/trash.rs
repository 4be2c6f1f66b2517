mod common;

use common::{HookedFs, Sandbox, UID};
use fileops_core::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

fn stored(report: &BatchReport, index: usize) -> PathBuf {
    match &report.outcomes[index].status {
        OutcomeStatus::Succeeded {
            destination: Some(path),
        } => path.clone(),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn trash_and_restore_round_trip() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.home.join("file.txt"), b"precious bytes\n");
    let trash = sandbox.trash();

    let report = trash
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap();

    let files = sandbox.home_trash().join("files/file.txt");
    let info = sandbox.home_trash().join("info/file.txt.trashinfo");
    assert_eq!(stored(&report, 0), files);
    assert!(!original.exists());
    assert_eq!(
        std::fs::read_to_string(&info).unwrap(),
        format!(
            "[Trash Info]\nPath={}\nDeletionDate=2024-05-17T08:30:05\n",
            original.display()
        )
    );

    let entries = trash.list_entries(&sandbox.root).unwrap().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_path, original);
    assert_eq!(entries[0].size_bytes, Some(15));
    assert!(entries[0].deleted_at.is_some());

    let report = trash
        .restore(entries, OperationChannel::detached())
        .await
        .unwrap();
    assert!(report.all_succeeded());
    assert_eq!(std::fs::read(&original).unwrap(), b"precious bytes\n");
    assert!(!files.exists());
    assert!(!info.exists());
}

#[tokio::test]
async fn special_characters_survive_the_record() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.home.join("my docs/100% sure #1.txt"), b"x");
    let trash = sandbox.trash();

    trash
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap();

    let record = std::fs::read_to_string(sandbox.home_trash().join("info/100% sure #1.txt.trashinfo")).unwrap();
    assert!(record.contains("/my%20docs/100%25%20sure%20%231.txt\n"));
    let entries = trash.list_entries(&sandbox.root).unwrap().entries();
    assert_eq!(entries[0].original_path, original);
}

#[tokio::test]
async fn same_base_names_are_disambiguated_and_stay_paired() {
    let sandbox = Sandbox::new();
    let first = sandbox.write(&sandbox.home.join("a/note.txt"), b"first");
    let second = sandbox.write(&sandbox.home.join("b/note.txt"), b"second");
    let trash = sandbox.trash();

    for path in [&first, &second] {
        let report = trash
            .move_to_trash(vec![path.clone()], OperationChannel::detached())
            .await
            .unwrap();
        assert!(report.all_succeeded());
    }

    let files = sandbox.home_trash().join("files");
    let info = sandbox.home_trash().join("info");
    assert_eq!(std::fs::read(files.join("note.txt")).unwrap(), b"first");
    assert_eq!(std::fs::read(files.join("note (2).txt")).unwrap(), b"second");
    assert!(std::fs::read_to_string(info.join("note.txt.trashinfo"))
        .unwrap()
        .contains(&format!("Path={}\n", first.display())));
    assert!(std::fs::read_to_string(info.join("note (2).txt.trashinfo"))
        .unwrap()
        .contains(&format!("Path={}\n", second.display())));

    let mut originals: Vec<_> = trash
        .list_entries(&sandbox.root)
        .unwrap()
        .entries()
        .into_iter()
        .map(|entry| (entry.name, entry.original_path))
        .collect();
    originals.sort();
    assert_eq!(
        originals,
        vec![
            ("note (2).txt".to_string(), second),
            ("note.txt".to_string(), first),
        ]
    );
}

#[tokio::test]
async fn concurrent_batches_never_share_a_name() {
    let sandbox = Sandbox::new();
    let trash = sandbox.trash();
    let left: Vec<PathBuf> = (0..4)
        .map(|n| sandbox.write(&sandbox.home.join(format!("left{n}/same.txt")), b"l"))
        .collect();
    let right: Vec<PathBuf> = (0..4)
        .map(|n| sandbox.write(&sandbox.home.join(format!("right{n}/same.txt")), b"r"))
        .collect();

    let (a, b) = tokio::join!(
        trash.move_to_trash(left, OperationChannel::detached()),
        trash.move_to_trash(right, OperationChannel::detached()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.all_succeeded() && b.all_succeeded());

    let mut names: Vec<PathBuf> = (0..4).flat_map(|i| [stored(&a, i), stored(&b, i)]).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
    assert_eq!(trash.list_entries(&sandbox.root).unwrap().entries().len(), 8);
}

#[tokio::test]
async fn foreign_volume_uses_the_per_user_trash() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.foreign.join("file.txt"), b"data");
    let trash = sandbox.trash();

    let report = trash
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap();

    let trash_root = sandbox.foreign.join(format!(".Trash-{UID}"));
    assert_eq!(stored(&report, 0), trash_root.join("files/file.txt"));
    assert!(trash_root.join("info/file.txt.trashinfo").is_file());
    let mode = std::fs::metadata(trash_root.join("files")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    assert!(!sandbox.home_trash().join("files/file.txt").exists());

    let listing = trash.list_all_entries().unwrap();
    let entries = listing.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_path, original);
}

#[tokio::test]
async fn sticky_shared_trash_is_used_on_foreign_volumes() {
    let sandbox = Sandbox::new();
    let shared = sandbox.foreign.join(".Trash");
    std::fs::create_dir(&shared).unwrap();
    std::fs::set_permissions(&shared, std::fs::Permissions::from_mode(0o1777)).unwrap();
    let original = sandbox.write(&sandbox.foreign.join("file.txt"), b"data");

    let report = sandbox
        .trash()
        .move_to_trash(vec![original], OperationChannel::detached())
        .await
        .unwrap();

    assert_eq!(stored(&report, 0), shared.join(format!("{UID}/files/file.txt")));
}

#[tokio::test]
async fn restore_into_a_vanished_directory_leaves_the_entry_alone() {
    let sandbox = Sandbox::new();
    let dir = sandbox.home.join("project");
    let original = sandbox.write(&dir.join("file.txt"), b"data");
    let trash = sandbox.trash();
    trash
        .move_to_trash(vec![original], OperationChannel::detached())
        .await
        .unwrap();
    std::fs::remove_dir(&dir).unwrap();

    let entries = trash.list_entries(&sandbox.root).unwrap().entries();
    let report = trash
        .restore(entries.clone(), OperationChannel::detached())
        .await
        .unwrap();

    assert!(matches!(
        &report.outcomes[0].status,
        OutcomeStatus::Failed(CoreError::DestinationMissing(path)) if *path == dir
    ));
    assert!(!dir.exists());
    assert_eq!(trash.list_entries(&sandbox.root).unwrap().entries(), entries);
}

#[tokio::test]
async fn restore_never_overwrites() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.home.join("file.txt"), b"old");
    let trash = sandbox.trash();
    trash
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap();
    sandbox.write(&original, b"new");

    let entries = trash.list_entries(&sandbox.root).unwrap().entries();
    let report = trash.restore(entries, OperationChannel::detached()).await.unwrap();

    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Failed(CoreError::NameConflict(_))
    ));
    assert_eq!(std::fs::read(&original).unwrap(), b"new");
    assert!(sandbox.home_trash().join("files/file.txt").exists());
}

#[tokio::test]
async fn missing_user_id_aborts_the_whole_batch() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.home.join("file.txt"), b"data");
    let mut environment = sandbox.environment();
    environment.remove("UID");
    let trash = sandbox.trash_with(sandbox.engine(), environment);

    let err = trash
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::MissingEnvironmentIdentifier(_)));
    assert!(err.is_configuration());
    assert!(original.exists());
    assert!(!sandbox.home_trash().exists());
}

#[tokio::test]
async fn unusable_paths_are_reported_per_path() {
    let sandbox = Sandbox::new();
    let trash = sandbox.trash();
    let inside = sandbox.write(&sandbox.home.join("inside.txt"), b"x");
    let report = trash
        .move_to_trash(vec![inside], OperationChannel::detached())
        .await
        .unwrap();
    let already = stored(&report, 0);
    let fine = sandbox.write(&sandbox.home.join("fine.txt"), b"x");

    let report = trash
        .move_to_trash(
            vec![sandbox.home.join("missing.txt"), already.clone(), fine],
            OperationChannel::detached(),
        )
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Skipped(SkipReason::MissingPath(_))
    ));
    assert!(matches!(
        &report.outcomes[1].status,
        OutcomeStatus::Skipped(SkipReason::AlreadyTrashed(path)) if *path == already
    ));
    assert!(report.outcomes[2].status.is_success());
}

#[tokio::test]
async fn failed_metadata_write_keeps_the_source() {
    let sandbox = Sandbox::new();
    let original = sandbox.write(&sandbox.home.join("file.txt"), b"data");
    sandbox.write(&sandbox.home_trash().join("info"), b"not a directory");

    let report = sandbox
        .trash()
        .move_to_trash(vec![original.clone()], OperationChannel::detached())
        .await
        .unwrap();

    assert!(matches!(report.outcomes[0].status, OutcomeStatus::Failed(_)));
    assert_eq!(std::fs::read(&original).unwrap(), b"data");
    assert!(!sandbox.home_trash().join("files/file.txt").exists());
}

#[tokio::test]
async fn failed_copy_fallback_leaves_nothing_in_the_trash() {
    let sandbox = Sandbox::new();
    let docs = sandbox.home.join("docs");
    sandbox.write(&docs.join("a.txt"), b"a");
    sandbox.write(&docs.join("b.txt"), b"b");

    let fs = Arc::new(HookedFs::unreadable(docs.join("b.txt")).with_cross_device_renames());
    let trash = sandbox.trash_with(sandbox.engine_with(fs, sandbox.drives()), sandbox.environment());
    let report = trash
        .move_to_trash(vec![docs.clone()], OperationChannel::detached())
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[0].status,
        OutcomeStatus::Failed(CoreError::PermissionDenied(_))
    ));
    assert_eq!(std::fs::read(docs.join("a.txt")).unwrap(), b"a");
    assert_eq!(std::fs::read(docs.join("b.txt")).unwrap(), b"b");
    for sub in ["files", "info"] {
        let left = std::fs::read_dir(sandbox.home_trash().join(sub)).unwrap().count();
        assert_eq!(left, 0, "{sub}");
    }
    assert!(trash.list_entries(&sandbox.root).unwrap().iter().next().is_none());
}

#[tokio::test]
async fn orphans_are_listed_separately_and_only_purged_on_request() {
    let sandbox = Sandbox::new();
    let trash = sandbox.trash();
    let kept = sandbox.write(&sandbox.home.join("kept.txt"), b"k");
    trash
        .move_to_trash(vec![kept], OperationChannel::detached())
        .await
        .unwrap();

    let home_trash = sandbox.home_trash();
    let stray = sandbox.write(&home_trash.join("files/stray.bin"), b"s");
    let lonely = sandbox.write(
        &home_trash.join("info/lonely.txt.trashinfo"),
        b"[Trash Info]\nPath=/nowhere/lonely.txt\nDeletionDate=2024-01-01T00:00:00\n",
    );
    sandbox.write(&home_trash.join("files/broken.txt"), b"b");
    let broken = sandbox.write(&home_trash.join("info/broken.txt.trashinfo"), b"garbage");

    let listing = trash.list_entries(&sandbox.root).unwrap();
    assert_eq!(listing.entries().len(), 1);
    let orphans = listing.orphans();
    assert_eq!(orphans.len(), 3);
    let reasons: Vec<_> = orphans.iter().map(|o| (o.name.as_str(), o.info_path.is_some())).collect();
    assert!(reasons.contains(&("stray.bin", false)));
    assert!(reasons.contains(&("lonely.txt", true)));
    assert!(reasons.contains(&("broken.txt", true)));

    // Listing twice rescans and deletes nothing.
    assert_eq!(listing.iter().count(), 4);
    assert!(stray.exists() && lonely.exists() && broken.exists());

    let report = trash
        .purge_orphans(&sandbox.root, OperationChannel::detached())
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 3);
    assert!(!stray.exists() && !lonely.exists() && !broken.exists());
    assert!(!home_trash.join("files/broken.txt").exists());
    assert_eq!(trash.list_entries(&sandbox.root).unwrap().entries().len(), 1);
}

#[tokio::test]
async fn relative_record_paths_resolve_against_the_volume() {
    let sandbox = Sandbox::new();
    let trash_root = sandbox.foreign.join(format!(".Trash-{UID}"));
    sandbox.write(&trash_root.join("files/a b.jpg"), b"img");
    sandbox.write(
        &trash_root.join("info/a b.jpg.trashinfo"),
        b"[Trash Info]\nPath=photos/a%20b.jpg\nDeletionDate=2024-01-01T00:00:00\n",
    );

    let entries = sandbox.trash().list_entries(&sandbox.foreign).unwrap().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_path, sandbox.foreign.join("photos/a b.jpg"));
}

#[tokio::test]
async fn purge_and_empty_delete_permanently() {
    let sandbox = Sandbox::new();
    let trash = sandbox.trash();
    let paths: Vec<PathBuf> = ["one.txt", "two.txt", "dir/three.txt"]
        .iter()
        .map(|name| sandbox.write(&sandbox.home.join(name), b"x"))
        .collect();
    trash
        .move_to_trash(
            vec![paths[0].clone(), paths[1].clone(), sandbox.home.join("dir")],
            OperationChannel::detached(),
        )
        .await
        .unwrap();

    let one: Vec<TrashEntry> = trash
        .list_entries(&sandbox.root)
        .unwrap()
        .entries()
        .into_iter()
        .filter(|entry| entry.original_path == paths[0])
        .collect();
    let report = trash.purge(one, OperationChannel::detached()).await.unwrap();
    assert!(report.all_succeeded());
    assert!(!sandbox.home_trash().join("files/one.txt").exists());
    assert!(!sandbox.home_trash().join("info/one.txt.trashinfo").exists());

    sandbox.write(&sandbox.home_trash().join("files/orphan"), b"o");
    let report = trash
        .empty_trash(&sandbox.root, OperationChannel::detached())
        .await
        .unwrap();
    assert_eq!(report.len(), 3);
    assert!(report.all_succeeded());
    assert_eq!(std::fs::read_dir(sandbox.home_trash().join("files")).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(sandbox.home_trash().join("info")).unwrap().count(), 0);
}
