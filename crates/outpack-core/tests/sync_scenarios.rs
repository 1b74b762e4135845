use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use outpack_core::{FileMapping, LocationDriver, LocationKind, Packet, PacketId, PathDriver, Root};

fn drivers_for(pairs: &[(&str, &Path)]) -> HashMap<String, Box<dyn LocationDriver>> {
    pairs
        .iter()
        .map(|(name, path)| {
            let driver: Box<dyn LocationDriver> = Box::new(PathDriver::open(*path).unwrap());
            ((*name).to_string(), driver)
        })
        .collect()
}

/// Scenario S3: pulling metadata from a location with several packets
/// replicates the full set and records them under that location's own
/// membership table, leaving `local` untouched.
#[tokio::test]
async fn s3_pull_metadata_replicates_the_full_closure() {
    let up_dir = tempfile::tempdir().unwrap();
    let up_path = up_dir.path().join("up");
    let mut up = Root::init(up_path.clone(), Some("archive".to_string()), true, false).unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        let staging = up_path.join(format!("work-{i}"));
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("a"), format!("content-{i}").as_bytes()).unwrap();
        let packet = Packet::new(&mut up, staging, "data", None, BTreeMap::new());
        ids.push(packet.end(true).unwrap());
    }

    let dn_dir = tempfile::tempdir().unwrap();
    let dn_path = dn_dir.path().join("dn");
    let mut dn = Root::init(dn_path.clone(), Some("archive".to_string()), true, false).unwrap();
    dn.config_mut()
        .add_location("up", LocationKind::parse(&up_path.to_string_lossy()).unwrap())
        .unwrap();
    dn.write_config().unwrap();

    let drivers = drivers_for(&[("up", &up_path)]);
    let dn_root_path = dn.path().to_path_buf();
    let dn_config = dn.config().clone();
    outpack_core::pull_metadata(&dn_root_path, &dn_config, dn.index_mut(), &drivers, &["up".to_string()])
        .await
        .unwrap();

    let up_ids: BTreeSet<_> = up.index().all_metadata().keys().cloned().collect();
    let dn_ids: BTreeSet<_> = dn.index().all_metadata().keys().cloned().collect();
    assert_eq!(up_ids, dn_ids);
    assert_eq!(dn.index().location("up").unwrap().len(), 3);
    assert!(dn.index().location("local").is_none());
    for id in &ids {
        assert!(dn.index().metadata(id).is_some());
    }
}

/// Scenario S4: two locations vouching for the same packet id with
/// different content must never both be believed; the cross-check rejects
/// the second location outright rather than silently overwriting the first.
#[tokio::test]
async fn s4_conflicting_metadata_aborts_the_pull() {
    let fixed_id = PacketId::generate_at(chrono::Utc::now(), [9, 9, 9, 9]);

    let a_dir = tempfile::tempdir().unwrap();
    let a_path = a_dir.path().join("a");
    let mut a = Root::init(a_path.clone(), Some("archive".to_string()), true, false).unwrap();
    let staging_a = a_path.join("work");
    fs::create_dir_all(&staging_a).unwrap();
    fs::write(staging_a.join("out"), b"from-a").unwrap();
    Packet::new(&mut a, staging_a, "data", Some(fixed_id.clone()), BTreeMap::new())
        .end(true)
        .unwrap();

    let b_dir = tempfile::tempdir().unwrap();
    let b_path = b_dir.path().join("b");
    let mut b = Root::init(b_path.clone(), Some("archive".to_string()), true, false).unwrap();
    let staging_b = b_path.join("work");
    fs::create_dir_all(&staging_b).unwrap();
    fs::write(staging_b.join("out"), b"from-b").unwrap();
    Packet::new(&mut b, staging_b, "data", Some(fixed_id.clone()), BTreeMap::new())
        .end(true)
        .unwrap();

    let us_dir = tempfile::tempdir().unwrap();
    let us_path = us_dir.path().join("us");
    let mut us = Root::init(us_path.clone(), Some("archive".to_string()), true, false).unwrap();
    us.config_mut()
        .add_location("a", LocationKind::parse(&a_path.to_string_lossy()).unwrap())
        .unwrap();
    us.config_mut()
        .add_location("b", LocationKind::parse(&b_path.to_string_lossy()).unwrap())
        .unwrap();
    us.write_config().unwrap();

    let drivers = drivers_for(&[("a", &a_path), ("b", &b_path)]);
    let us_root_path = us.path().to_path_buf();
    let us_config = us.config().clone();

    outpack_core::pull_metadata(&us_root_path, &us_config, us.index_mut(), &drivers, &["a".to_string()])
        .await
        .unwrap();
    assert!(us.index().metadata(&fixed_id).is_some());

    let err = outpack_core::pull_metadata(&us_root_path, &us_config, us.index_mut(), &drivers, &["b".to_string()])
        .await
        .unwrap_err();
    match err {
        outpack_sync::SyncError::ConflictingMetadata { location, ids } => {
            assert_eq!(location, "b");
            assert!(ids.contains(&fixed_id));
        }
        other => panic!("expected ConflictingMetadata, got {other:?}"),
    }
}

/// Scenario S5: a corrupted archive copy is detected and rejected, and the
/// pull still succeeds by falling back to an equivalent-content copy found
/// under a different packet.
#[tokio::test]
async fn s5_archive_corruption_falls_back_to_another_copy() {
    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("src");
    let mut src = Root::init(src_path.clone(), Some("archive".to_string()), false, false).unwrap();

    let content = b"duplicate-content\n";
    let staging1 = src_path.join("work1");
    fs::create_dir_all(&staging1).unwrap();
    fs::write(staging1.join("a.txt"), content).unwrap();
    let id1 = Packet::new(&mut src, staging1, "data", None, BTreeMap::new())
        .end(true)
        .unwrap();

    let staging2 = src_path.join("work2");
    fs::create_dir_all(&staging2).unwrap();
    fs::write(staging2.join("b.txt"), content).unwrap();
    Packet::new(&mut src, staging2, "data", None, BTreeMap::new())
        .end(true)
        .unwrap();

    let archived_a = src_path.join("archive").join("data").join(id1.as_str()).join("a.txt");
    fs::write(&archived_a, b"truncat").unwrap();

    let dst_dir = tempfile::tempdir().unwrap();
    let dst_path = dst_dir.path().join("dst");
    let mut dst = Root::init(dst_path.clone(), Some("archive".to_string()), false, false).unwrap();
    dst.config_mut()
        .add_location("src", LocationKind::parse(&src_path.to_string_lossy()).unwrap())
        .unwrap();
    dst.write_config().unwrap();

    let drivers = drivers_for(&[("src", &src_path)]);
    let dst_root_path = dst.path().to_path_buf();
    let dst_config = dst.config().clone();
    let file_store = dst.file_store().cloned();
    let archive = dst.archive().cloned();

    outpack_core::pull_metadata(&dst_root_path, &dst_config, dst.index_mut(), &drivers, &["src".to_string()])
        .await
        .unwrap();

    let newly = outpack_core::pull_packets(
        &dst_root_path,
        &dst_config,
        dst.index_mut(),
        &drivers,
        &[id1.clone()],
        Some(false),
        None,
        file_store.as_ref(),
        archive.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(newly, vec![id1.clone()]);

    let pulled = dst_path.join("archive").join("data").join(id1.as_str()).join("a.txt");
    assert_eq!(fs::read(pulled).unwrap(), content.to_vec());
}

/// Scenario S6: pushing a dependency chain uploads every packet the first
/// time and nothing the second time, since the target already has them all.
#[tokio::test]
async fn s6_push_plan_shrinks_to_nothing_on_second_push() {
    let root_dir = tempfile::tempdir().unwrap();
    let root_path = root_dir.path().join("root");
    let mut root = Root::init(root_path.clone(), Some("archive".to_string()), true, false).unwrap();

    let mut previous: Option<PacketId> = None;
    for i in 0..4 {
        let staging = root_path.join(format!("work-{i}"));
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("out"), format!("step-{i}").as_bytes()).unwrap();
        let mut packet = Packet::new(&mut root, staging, "data", None, BTreeMap::new());
        if let Some(prev) = &previous {
            packet
                .use_dependency(
                    &prev.to_string(),
                    vec![FileMapping {
                        here: "prev".to_string(),
                        there: "out".to_string(),
                    }],
                )
                .unwrap();
        }
        previous = Some(packet.end(true).unwrap());
    }
    let head = previous.unwrap();

    let remote_dir = tempfile::tempdir().unwrap();
    let remote_path = remote_dir.path().join("remote");
    Root::init(remote_path.clone(), Some("archive".to_string()), true, false).unwrap();

    let drivers = drivers_for(&[("remote", &remote_path)]);
    let root_path_buf = root.path().to_path_buf();
    let hash_algorithm = root.config().core.hash_algorithm;

    let plan1 = outpack_core::push(
        &root_path_buf,
        root.index(),
        hash_algorithm,
        root.file_store(),
        root.archive(),
        &drivers,
        "remote",
        &[head.clone()],
    )
    .await
    .unwrap();
    assert_eq!(plan1.packets.len(), 4);

    let plan2 = outpack_core::push(
        &root_path_buf,
        root.index(),
        hash_algorithm,
        root.file_store(),
        root.archive(),
        &drivers,
        "remote",
        &[head.clone()],
    )
    .await
    .unwrap();
    assert!(plan2.packets.is_empty());
}
