// 文件模型差分测试
//
// 以参照模型（整文件重写）为基准，对随机变更序列、
// 搜索、撤销重做与保存做逐步比对

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use bedit::core::model::{ChangeLog, Direction, FileModel, OpenMode, TrivialFileModel};
use bedit::fsutil;

const READ_BUFFER_SIZE: usize = 4 * 1024;

/// 两个模型的长度与每个读取窗口是否一致
fn equal(model: &FileModel, trivial: &TrivialFileModel) -> bool {
    if model.length() != trivial.length() {
        return false;
    }

    let mut buf1 = [0u8; READ_BUFFER_SIZE];
    let mut buf2 = [0u8; READ_BUFFER_SIZE];
    let mut off = 0;

    loop {
        match (model.get(off, &mut buf1), trivial.get(off, &mut buf2)) {
            (Some(n1), Some(n2)) => {
                if n1 != n2 || buf1[..n1] != buf2[..n2] {
                    return false;
                }

                off += n1 as u64;
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    original: PathBuf,
    model_file: PathBuf,
    trivial_file: PathBuf,
}

fn make_fixture(len: u64, seed: u64) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");

    let original = dir.path().join("file_model.org");
    let model_file = dir.path().join("file_model.bin");
    let trivial_file = dir.path().join("trivial_file_model.bin");

    fsutil::random_file_seeded(&original, len, seed).expect("random file");
    fsutil::copy(&original, &model_file).expect("copy");
    fsutil::copy(&original, &trivial_file).expect("copy");

    assert!(fsutil::diff(&original, &model_file).expect("diff"));
    assert!(fsutil::diff(&original, &trivial_file).expect("diff"));

    Fixture {
        _dir: dir,
        original,
        model_file,
        trivial_file,
    }
}

fn random_data(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// 对两个模型执行同一随机变更，返回执行后应有的长度
fn perform_random_change(rng: &mut StdRng, model: &mut FileModel, trivial: &mut TrivialFileModel) {
    const MAX_CHANGE_SIZE: u64 = 2048;

    loop {
        let length = trivial.length();
        let mut len = rng.gen_range(0..=MAX_CHANGE_SIZE);
        let off = if length > 0 { rng.gen_range(0..length) } else { 0 };

        match rng.gen_range(0..3u32) {
            0 => {
                // Modify
                if length == 0 {
                    continue;
                }
                len = len.min(length - off);

                let data = random_data(rng, len as usize);
                assert!(trivial.modify(off, &data), "trivial modify failed");
                let res = model.modify(off, &data);
                assert!(res.is_success(), "[Modify] [offset = {off}, length = {len}] {res}");
            }
            1 => {
                // Add
                let data = random_data(rng, len as usize);
                assert!(trivial.add(off, &data), "trivial add failed");
                let res = model.add(off, &data);
                assert!(res.is_success(), "[Add] [offset = {off}, length = {len}] {res}");
            }
            _ => {
                // Remove
                if length == 0 {
                    continue;
                }
                len = len.min(length - off);

                assert!(trivial.remove(off, len), "trivial remove failed");
                let res = model.remove(off, len);
                assert!(res.is_success(), "[Remove] [offset = {off}, length = {len}] {res}");
            }
        }

        return;
    }
}

/// 从参照模型取一段真实内容作针，两个方向、两个模型比对搜索结果
fn perform_search(
    rng: &mut StdRng,
    model: &FileModel,
    trivial: &TrivialFileModel,
) {
    const MIN_SEARCH: u64 = 16;
    const MAX_SEARCH: u64 = 512;

    let length = trivial.length();
    let mut needlelen = rng.gen_range(MIN_SEARCH..=MAX_SEARCH).min(length);
    let pos = rng.gen_range(0..length);
    needlelen = needlelen.min(length - pos);
    if needlelen == 0 {
        return;
    }

    let mut needle = vec![0u8; needlelen as usize];
    assert_eq!(trivial.get(pos, &mut needle), Some(needlelen as usize));

    let forward_off = rng.gen_range(0..=pos);
    let backward_off = rng.gen_range(pos..length);

    for (dir, off) in [
        (Direction::Forward, forward_off),
        (Direction::Backward, backward_off),
    ] {
        let expected = trivial.find(off, dir, &needle);
        assert!(expected.is_some(), "needle not found in trivial model");

        let got = model.find(off, dir, &needle);
        assert_eq!(
            got, expected,
            "positions differ (dir = {dir:?}, offset = {off}, length = {needlelen})"
        );
    }
}

#[test]
fn test_random_changes_against_trivial_model() {
    const NUMBER_CHANGES: usize = 300;
    const NUMBER_SEARCHES: usize = 200;

    let fixture = make_fixture(200_000, 42);
    let mut rng = StdRng::seed_from_u64(43);

    let mut model = FileModel::new(true);
    model
        .open(&fixture.model_file, OpenMode::ReadWrite)
        .expect("open model");

    let mut trivial = TrivialFileModel::new();
    trivial.open(&fixture.trivial_file).expect("open trivial");

    // 逐笔变更、逐笔比对
    for _ in 0..NUMBER_CHANGES {
        perform_random_change(&mut rng, &mut model, &mut trivial);
        assert!(equal(&model, &trivial), "models diverged");
    }

    // 随机搜索
    if trivial.length() > 0 {
        for _ in 0..NUMBER_SEARCHES {
            perform_search(&mut rng, &model, &trivial);
        }
    }

    // 全部撤销后与初始文件一致
    let nchanges = model.nchange();
    assert_eq!(nchanges, NUMBER_CHANGES);
    for _ in 0..nchanges {
        let res = model.undo();
        assert!(res.is_success(), "[Undo] {res}");
    }
    model.save().expect("save after undos");
    assert!(fsutil::diff(&fixture.original, &fixture.model_file).expect("diff"));

    // 全部重做后与参照模型一致
    for _ in 0..nchanges {
        let res = model.redo();
        assert!(res.is_success(), "[Redo] {res}");
    }
    model.save().expect("save after redos");
    assert!(fsutil::diff(&fixture.model_file, &fixture.trivial_file).expect("diff"));

    // 日志落盘再重放：在初始文件副本上复现相同内容
    let changes_file = fixture.original.with_extension("changes");
    model.changes().save(&changes_file).expect("save changes");
    replay_changes(&changes_file, &fixture);

    // 清空
    if trivial.length() > 0 {
        let length = trivial.length();
        assert!(trivial.remove(0, length));
        assert!(model.remove(0, length).is_success());
        model.save().expect("save after remove all");
        assert!(fsutil::diff(&fixture.model_file, &fixture.trivial_file).expect("diff"));
    }

    // 重新填入随机内容
    let data = random_data(&mut rng, 150_000);
    assert!(trivial.add(0, &data));
    assert!(model.add(0, &data).is_success());
    model.save().expect("save after refill");
    assert!(fsutil::diff(&fixture.model_file, &fixture.trivial_file).expect("diff"));
}

/// 装载日志并在初始文件副本上重放，结果应与参照模型一致
fn replay_changes(changes_file: &Path, fixture: &Fixture) {
    let mut changes = ChangeLog::new();
    changes.load(changes_file).expect("load changes");

    let replay_file = fixture.original.with_extension("replay");
    fsutil::copy(&fixture.original, &replay_file).expect("copy");

    let mut model = FileModel::new(true);
    model
        .open(&replay_file, OpenMode::ReadWrite)
        .expect("open replay");

    for i in 0..changes.size() {
        let chg = changes.get(i).expect("change");
        let res = match (chg.kind, chg.new.as_deref()) {
            (bedit::ChangeKind::Modify, Some(new)) => model.modify(chg.off, new),
            (bedit::ChangeKind::Add, Some(new)) => model.add(chg.off, new),
            (bedit::ChangeKind::Remove, _) => model.remove(chg.off, chg.len),
            _ => panic!("change {i} has no payload"),
        };
        assert!(res.is_success(), "replay change {i}: {res}");
    }

    model.save().expect("save replay");
    assert!(fsutil::diff(&replay_file, &fixture.trivial_file).expect("diff"));
}

// ========== 影子模型性质测试 ==========

#[derive(Debug, Clone)]
enum Op {
    Modify { off: u64, data: Vec<u8> },
    Add { off: u64, data: Vec<u8> },
    Remove { off: u64, len: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let data = proptest::collection::vec(any::<u8>(), 1..64);

    prop_oneof![
        (any::<u64>(), data.clone()).prop_map(|(off, data)| Op::Modify { off, data }),
        (any::<u64>(), data).prop_map(|(off, data)| Op::Add { off, data }),
        (any::<u64>(), 1..256u64).prop_map(|(off, len)| Op::Remove { off, len }),
    ]
}

/// 把任意偏移折算进当前有效范围
fn clamp_off(off: u64, limit: u64) -> u64 {
    if limit == 0 {
        0
    } else {
        off % limit
    }
}

fn apply_to_shadow(op: &Op, shadow: &mut Vec<u8>) {
    match op {
        Op::Modify { off, data } => {
            let len = shadow.len() as u64;
            if len == 0 {
                return;
            }
            let off = clamp_off(*off, len);
            let n = (data.len() as u64).min(len - off) as usize;
            shadow[off as usize..off as usize + n].copy_from_slice(&data[..n]);
        }
        Op::Add { off, data } => {
            let off = clamp_off(*off, shadow.len() as u64 + 1);
            shadow.splice(off as usize..off as usize, data.iter().copied());
        }
        Op::Remove { off, len } => {
            let total = shadow.len() as u64;
            if total == 0 {
                return;
            }
            let off = clamp_off(*off, total);
            let end = (off + len).min(total);
            shadow.drain(off as usize..end as usize);
        }
    }
}

fn apply_to_model(op: &Op, model: &mut FileModel) {
    match op {
        Op::Modify { off, data } => {
            let len = model.length();
            if len == 0 {
                return;
            }
            let off = clamp_off(*off, len);
            let n = (data.len() as u64).min(len - off) as usize;
            assert!(model.modify(off, &data[..n]).is_success());
        }
        Op::Add { off, data } => {
            let off = clamp_off(*off, model.length() + 1);
            assert!(model.add(off, data).is_success());
        }
        Op::Remove { off, len } => {
            if model.length() == 0 {
                return;
            }
            let off = clamp_off(*off, model.length());
            assert!(model.remove(off, *len).is_success());
        }
    }
}

fn model_contents(model: &FileModel) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in model.chunks() {
        out.extend_from_slice(chunk);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// 任意操作序列下与 Vec<u8> 影子模型保持一致，
    /// 撤销到底回到初始内容，重做到底回到最终内容
    #[test]
    fn prop_model_matches_shadow(
        initial in proptest::collection::vec(any::<u8>(), 0..2048),
        ops in proptest::collection::vec(op_strategy(), 0..40),
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shadow.bin");
        std::fs::write(&path, &initial).expect("write fixture");

        let mut model = FileModel::new(true);
        model.open(&path, OpenMode::ReadWrite).expect("open");

        let mut shadow = initial.clone();

        for op in &ops {
            apply_to_shadow(op, &mut shadow);
            apply_to_model(op, &mut model);

            prop_assert_eq!(model.length(), shadow.len() as u64);
            prop_assert_eq!(&model_contents(&model), &shadow);
        }

        let final_contents = shadow.clone();

        // 撤销到底
        let applied = model.nchange();
        for _ in 0..applied {
            prop_assert!(model.undo().is_success());
        }
        prop_assert_eq!(&model_contents(&model), &initial);

        // 重做到底
        for _ in 0..applied {
            prop_assert!(model.redo().is_success());
        }
        prop_assert_eq!(&model_contents(&model), &final_contents);

        // 保存后磁盘内容与影子一致
        model.save().expect("save");
        prop_assert_eq!(&std::fs::read(&path).expect("read"), &final_contents);
    }
}
